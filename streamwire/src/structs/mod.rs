//! Data structures representing wire format components.
//!
//! Contains the AMF0 typed values and command messages of the stream-control
//! protocol, and the headers that make up a transport stream: ADTS audio
//! headers, transport packet headers, adaptation fields, PES headers and PSI
//! sections. Each structure knows how to write itself, and where inspection
//! needs it, how to read itself back.

pub mod adaptation_field;
pub mod adts;
pub mod amf;
pub mod command;
pub mod pes;
pub mod psi;
pub mod ts_header;
