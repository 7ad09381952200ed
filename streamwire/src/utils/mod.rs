//! Utility functions and supporting infrastructure.
//!
//! Provides bit-level I/O, big-endian byte serialization, CRC calculation,
//! error types and clock handling shared by the codec and the packetizer.

pub mod bitstream_io;
pub mod byteorder;
pub mod crc;
pub mod errors;
pub mod timing;
