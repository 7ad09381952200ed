//! Adaptation field carried ahead of the payload of selected packets.
//!
//! Only the flags byte, the optional PCR and stuffing are produced; OPCR,
//! splice countdown, private data and extensions are never set. Stuffing is
//! how a packet whose payload falls short of the packet size is filled.

use std::io;

use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::errors::TsError;
use crate::utils::timing::Pcr;

/// Length byte plus flags byte.
pub const ADAPTATION_FIELD_MIN_SIZE: usize = 2;

pub const PCR_SIZE: usize = 6;

/// Largest adaptation field, length byte included.
pub const ADAPTATION_FIELD_MAX_SIZE: usize = 1 + u8::MAX as usize;

const STUFFING_BYTE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdaptationField {
    pub discontinuity: bool,
    pub random_access: bool,
    pub pcr: Option<Pcr>,
    /// 0xFF bytes after the optional fields.
    pub stuffing: usize,
}

impl AdaptationField {
    pub fn with_pcr(pcr: Pcr) -> Self {
        Self {
            pcr: Some(pcr),
            ..Default::default()
        }
    }

    /// Encoded size including the adaptation_field_length byte.
    pub fn size(&self) -> usize {
        ADAPTATION_FIELD_MIN_SIZE + if self.pcr.is_some() { PCR_SIZE } else { 0 } + self.stuffing
    }

    pub fn write(&self, writer: &mut BsIoVecWriter) -> io::Result<()> {
        writer.put_n(8, (self.size() - 1) as u8)?;

        writer.put(self.discontinuity)?;
        writer.put(self.random_access)?;
        writer.put(false)?; // elementary_stream_priority_indicator
        writer.put(self.pcr.is_some())?;
        writer.put_n(4, 0u8)?; // OPCR, splicing point, private data, extension

        if let Some(pcr) = self.pcr {
            writer.put_n(33, pcr.base)?;
            writer.put_reserved(6)?;
            writer.put_n(9, pcr.extension)?;
        }

        for _ in 0..self.stuffing {
            writer.put_n(8, STUFFING_BYTE)?;
        }

        Ok(())
    }

    /// Writes an adaptation field of exactly `size` bytes carrying nothing
    /// but padding.
    ///
    /// One byte is a bare adaptation_field_length of 0. Longer fields have a
    /// cleared flags byte followed by stuffing.
    pub fn write_padding(writer: &mut BsIoVecWriter, size: usize) -> io::Result<()> {
        match size {
            0 => Ok(()),
            1 => writer.put_n(8, 0u8),
            _ => Self {
                stuffing: size - ADAPTATION_FIELD_MIN_SIZE,
                ..Default::default()
            }
            .write(writer),
        }
    }

    /// Reads an adaptation field body, `adaptation_field_length` byte excluded.
    pub fn read(body: &[u8]) -> Result<Self, TsError> {
        if body.is_empty() {
            return Ok(Self::default());
        }

        let mut reader = BsIoSliceReader::from_slice(body);
        let discontinuity = reader.get()?;
        let random_access = reader.get()?;
        reader.skip_n(1)?;
        let pcr_flag = reader.get()?;
        reader.skip_n(4)?;

        let pcr = if pcr_flag {
            if body.len() < 1 + PCR_SIZE {
                return Err(TsError::InsufficientData(body.len()));
            }
            let base = reader.get_n(33)?;
            reader.skip_n(6)?;
            Some(Pcr {
                base,
                extension: reader.get_n(9)?,
            })
        } else {
            None
        };

        let parsed = 1 + if pcr.is_some() { PCR_SIZE } else { 0 };
        Ok(Self {
            discontinuity,
            random_access,
            pcr,
            stuffing: body.len() - parsed,
        })
    }
}
