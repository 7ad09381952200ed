//! Framing layer of a media-streaming transport stack.
//!
//! ## Technical Overview
//!
//! Two independent subsystems sharing the same approach of typed wire
//! structures that write themselves through a bit-level writer.
//!
//! ### Command Messages
//!
//! RPC-style messages of the stream-control protocol. Each message body is
//! a sequence of AMF0 typed values: the command name, a transaction id and
//! any number of arguments. Bodies are decoded against the length declared
//! by the outer message header.
//!
//! ### Audio Transport
//!
//! AAC access units are prefixed with a 7-byte ADTS header, wrapped in a PES
//! packet and sliced across fixed-size MPEG-TS packets:
//!
//! - first packet: transport header, adaptation field with PCR, PES header
//! - following packets: transport header and payload only
//! - every packet: exactly the configured size, with 4-bit continuity counting
//!
//! PAT and PMT sections are emitted ahead of the first media packet and
//! repeated on a fixed access-unit interval.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use streamwire::process::packetize::{AacPacketizer, PacketizerConfig};
//! use streamwire::process::psi::PsiManager;
//! use streamwire::process::{EncodedFrame, MpegTsPacket};
//! use streamwire::structs::command::Command;
//!
//! // Command message body
//! let mut connect = Command::new("connect", 1);
//! connect.push(3.0)?;
//! let body = connect.encode_body();
//! let decoded = Command::decode_body(&body)?;
//! assert_eq!(decoded.name(), "connect");
//!
//! // Audio packetization
//! let mut packetizer = AacPacketizer::new(PacketizerConfig::default(), PsiManager::default())?;
//! packetizer.set_audio_info(48000, true)?;
//!
//! let access_unit = [0u8; 371];
//! let mut packets = Vec::new();
//! packetizer.write_frame(
//!     &EncodedFrame::new(&access_unit, 0),
//!     &mut |packet: MpegTsPacket| packets.push(packet),
//! )?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// Stateful pipelines producing transport packets.
///
/// 1. **Packetization** ([`process::packetize`]): ADTS framing and slicing of
///    access units into fixed-size packets.
///
/// 2. **Structural tables** ([`process::psi`]): PAT/PMT emission policy.
///
/// 3. **Batching** ([`process::batch`]): grouping of packets into datagrams.
pub mod process;

/// Wire structures.
///
/// - **AMF0 values** ([`structs::amf`]): Typed value codec
/// - **Command messages** ([`structs::command`]): Name, transaction id, arguments
/// - **ADTS** ([`structs::adts`]): Audio sub-header and sampling-rate table
/// - **Transport header** ([`structs::ts_header`]): Packet header and parsed view
/// - **Adaptation field** ([`structs::adaptation_field`]): Flags and PCR
/// - **PES** ([`structs::pes`]): Elementary stream header and PTS
/// - **PSI** ([`structs::psi`]): PAT/PMT sections
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): Bit-level reading/writing
/// - **Byte order** ([`utils::byteorder`]): Big-endian serialization
/// - **CRC** ([`utils::crc`]): CRC-32/MPEG-2 for table sections
/// - **Error Handling** ([`utils::errors`]): Error types
/// - **Timing** ([`utils::timing`]): Reference clock, PTS and PCR units
pub mod utils;
