//! Packetized elementary stream header.
//!
//! Written at the start of every payload unit, directly after the transport
//! header and adaptation field of the first packet. Only the PTS is carried:
//!
//! ```text
//! packet_start_code_prefix  24  0x000001
//! stream_id                  8
//! PES_packet_length         16  bytes following this field, 0 if unbounded
//! '10' + flags               8  0x80
//! PTS_DTS_flags + flags      8  0x80 (PTS only)
//! PES_header_data_length     8  5
//! '0010' PTS[32..30] '1' PTS[29..15] '1' PTS[14..0] '1'   40
//! ```

use std::io;

use streamwire_macros::ToBytes;

use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::byteorder::WriteBytesBe;
use crate::utils::errors::TsError;
use crate::utils::timing::{TIMESTAMP_MASK, micros_to_pts};

pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Header length with a PTS and no other optional fields.
pub const PES_HEADER_SIZE: usize = 14;

const PTS_SIZE: u8 = 5;

/// Bytes after PES_packet_length that precede the payload.
const OPTIONAL_HEADER_SIZE: usize = 3 + PTS_SIZE as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PesType {
    Audio = 0xC0,
    Video = 0xE0,
}

#[derive(ToBytes)]
struct FixedPart {
    start_code: [u8; 3],
    stream_id: u8,
    packet_length: u16,
    flags: u8,
    pts_dts_flags: u8,
    header_data_length: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PesHeader {
    pub stream_id: u8,
    /// PES_packet_length; 0 when the payload is too long to express.
    pub packet_length: u16,
    /// 90 kHz presentation timestamp, 33 bits.
    pub pts: u64,
}

impl PesHeader {
    pub fn new(pes_type: PesType, payload_len: usize, presentation_time_us: u64) -> Self {
        let length = payload_len + OPTIONAL_HEADER_SIZE;

        Self {
            stream_id: pes_type as u8,
            packet_length: u16::try_from(length).unwrap_or(0),
            pts: micros_to_pts(presentation_time_us),
        }
    }

    pub fn size(&self) -> usize {
        PES_HEADER_SIZE
    }

    pub fn write(&self, dst: &mut Vec<u8>) -> io::Result<()> {
        FixedPart {
            start_code: PES_START_CODE,
            stream_id: self.stream_id,
            packet_length: self.packet_length,
            flags: 0x80,
            pts_dts_flags: 0x80,
            header_data_length: PTS_SIZE,
        }
        .write_be(dst);

        let pts = self.pts & TIMESTAMP_MASK;
        let mut writer = BsIoVecWriter::from_vec(dst);
        writer.put_n(4, 0b0010u8)?;
        writer.put_n(3, pts >> 30)?;
        writer.put(true)?;
        writer.put_n(15, (pts >> 15) & 0x7FFF)?;
        writer.put(true)?;
        writer.put_n(15, pts & 0x7FFF)?;
        writer.put(true)?;
        writer.finish()?;

        Ok(())
    }

    pub fn read(bytes: &[u8]) -> Result<Self, TsError> {
        if bytes.len() < PES_HEADER_SIZE {
            return Err(TsError::InsufficientData(bytes.len()));
        }

        if bytes[..3] != PES_START_CODE {
            return Err(TsError::InvalidPesStartCode(u32::from_be_bytes([
                0, bytes[0], bytes[1], bytes[2],
            ])));
        }

        let mut reader = BsIoSliceReader::from_slice(&bytes[9..PES_HEADER_SIZE]);
        reader.skip_n(4)?;
        let high: u64 = reader.get_n(3)?;
        reader.skip_n(1)?;
        let mid: u64 = reader.get_n(15)?;
        reader.skip_n(1)?;
        let low: u64 = reader.get_n(15)?;

        Ok(Self {
            stream_id: bytes[3],
            packet_length: u16::from_be_bytes([bytes[4], bytes[5]]),
            pts: (high << 30) | (mid << 15) | low,
        })
    }
}
