//! Transport packet header.
//!
//! ```text
//! sync_byte                      8  0x47
//! transport_error_indicator      1
//! payload_unit_start_indicator   1
//! transport_priority             1
//! PID                           13
//! transport_scrambling_control   2
//! adaptation_field_control       2
//! continuity_counter             4
//! ```

use std::io;

use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::errors::TsError;

pub const TS_SYNC_BYTE: u8 = 0x47;

/// Standard transport packet length.
pub const TS_PACKET_SIZE: usize = 188;

pub const TS_HEADER_SIZE: usize = 4;

pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1FFF;
pub const MAX_PID: u16 = 0x1FFF;

/// Presence of adaptation field and payload in a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdaptationFieldControl {
    Reserved = 0b00,
    Payload = 0b01,
    Adaptation = 0b10,
    AdaptationPayload = 0b11,
}

impl AdaptationFieldControl {
    pub fn has_adaptation_field(self) -> bool {
        matches!(self, Self::Adaptation | Self::AdaptationPayload)
    }

    pub fn has_payload(self) -> bool {
        matches!(self, Self::Payload | Self::AdaptationPayload)
    }
}

impl From<u8> for AdaptationFieldControl {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0b01 => Self::Payload,
            0b10 => Self::Adaptation,
            0b11 => Self::AdaptationPayload,
            _ => Self::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_control: AdaptationFieldControl,
    pub continuity_counter: u8,
}

impl TsHeader {
    pub fn new(
        pid: u16,
        payload_unit_start: bool,
        adaptation_field_control: AdaptationFieldControl,
        continuity_counter: u8,
    ) -> Self {
        Self {
            transport_error: false,
            payload_unit_start,
            transport_priority: false,
            pid,
            scrambling_control: 0,
            adaptation_field_control,
            continuity_counter,
        }
    }

    pub fn write(&self, writer: &mut BsIoVecWriter) -> io::Result<()> {
        writer.put_n(8, TS_SYNC_BYTE)?;
        writer.put(self.transport_error)?;
        writer.put(self.payload_unit_start)?;
        writer.put(self.transport_priority)?;
        writer.put_n(13, self.pid & MAX_PID)?;
        writer.put_n(2, self.scrambling_control & 0b11)?;
        writer.put_n(2, self.adaptation_field_control as u8)?;
        writer.put_n(4, self.continuity_counter & 0xF)?;

        Ok(())
    }

    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self, TsError> {
        if reader.available()? < (TS_HEADER_SIZE as u64) << 3 {
            return Err(TsError::InsufficientData((reader.available()? >> 3) as usize));
        }

        let sync: u8 = reader.get_n(8)?;
        if sync != TS_SYNC_BYTE {
            return Err(TsError::InvalidSyncByte(sync));
        }

        Ok(Self {
            transport_error: reader.get()?,
            payload_unit_start: reader.get()?,
            transport_priority: reader.get()?,
            pid: reader.get_n(13)?,
            scrambling_control: reader.get_n(2)?,
            adaptation_field_control: reader.get_n::<u8>(2)?.into(),
            continuity_counter: reader.get_n(4)?,
        })
    }
}

/// Parsed view of one transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsPacketView<'a> {
    pub header: TsHeader,
    /// Adaptation field bytes after the length byte.
    pub adaptation_field: Option<&'a [u8]>,
    pub payload: &'a [u8],
}

impl<'a> TsPacketView<'a> {
    pub fn parse(packet: &'a [u8]) -> Result<Self, TsError> {
        let mut reader = BsIoSliceReader::from_slice(packet);
        let header = TsHeader::read(&mut reader)?;

        let mut offset = TS_HEADER_SIZE;
        let adaptation_field = if header.adaptation_field_control.has_adaptation_field() {
            let length = *packet
                .get(offset)
                .ok_or(TsError::InsufficientData(packet.len()))? as usize;
            let available = packet.len() - offset - 1;
            if length > available {
                return Err(TsError::AdaptationFieldTooLong { length, available });
            }
            let field = &packet[offset + 1..offset + 1 + length];
            offset += 1 + length;
            Some(field)
        } else {
            None
        };

        let payload = if header.adaptation_field_control.has_payload() {
            &packet[offset..]
        } else {
            &[]
        };

        Ok(Self {
            header,
            adaptation_field,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout() {
        let header = TsHeader::new(0x0101, true, AdaptationFieldControl::AdaptationPayload, 5);

        let mut out = Vec::new();
        let mut writer = BsIoVecWriter::from_vec(&mut out);
        header.write(&mut writer).unwrap();
        writer.finish().unwrap();

        assert_eq!(out, [0x47, 0x41, 0x01, 0x35]);

        let mut reader = BsIoSliceReader::from_slice(&out);
        assert_eq!(TsHeader::read(&mut reader).unwrap(), header);
    }

    #[test]
    fn bad_sync_byte() {
        let mut reader = BsIoSliceReader::from_slice(&[0x48, 0, 0, 0]);
        assert!(matches!(
            TsHeader::read(&mut reader),
            Err(TsError::InvalidSyncByte(0x48))
        ));
    }

    #[test]
    fn view_splits_adaptation_field() {
        let mut packet = vec![0x47, 0x40, 0x00, 0x30, 0x02, 0x10, 0xFF];
        packet.extend_from_slice(&[0xAB; 4]);

        let view = TsPacketView::parse(&packet).unwrap();
        assert_eq!(view.header.pid, PID_PAT);
        assert_eq!(view.adaptation_field, Some(&[0x10, 0xFF][..]));
        assert_eq!(view.payload, &[0xAB; 4]);
    }

    #[test]
    fn view_rejects_oversized_adaptation_field() {
        let packet = [0x47, 0x00, 0x00, 0x20, 0x09, 0x00];
        assert!(matches!(
            TsPacketView::parse(&packet),
            Err(TsError::AdaptationFieldTooLong { length: 9, available: 1 })
        ));
    }
}
