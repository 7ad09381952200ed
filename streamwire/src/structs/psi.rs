//! Program-specific information sections.
//!
//! Only the two tables needed to describe a single-program stream are
//! built: the program association table (PAT, PID 0) and the program map
//! table (PMT). Both are single-section tables closed by CRC-32/MPEG-2.

use std::io;

use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::crc::Crc32;
use crate::utils::errors::TsError;

pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;

pub const STREAM_TYPE_AAC_ADTS: u8 = 0x0F;
pub const STREAM_TYPE_H264: u8 = 0x1B;
pub const STREAM_TYPE_H265: u8 = 0x24;

const CRC_SIZE: usize = 4;

/// Bytes of the common long-form header following section_length.
const SYNTAX_HEADER_SIZE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramAssociationTable {
    pub transport_stream_id: u16,
    pub version: u8,
    /// (program_number, program_map_PID) pairs.
    pub programs: Vec<(u16, u16)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryStream {
    pub stream_type: u8,
    pub pid: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramMapTable {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub streams: Vec<ElementaryStream>,
}

fn write_syntax_header(
    writer: &mut BsIoVecWriter,
    table_id: u8,
    section_length: usize,
    table_id_extension: u16,
    version: u8,
) -> io::Result<()> {
    writer.put_n(8, table_id)?;
    writer.put(true)?; // section_syntax_indicator
    writer.put(false)?;
    writer.put_reserved(2)?;
    writer.put_n(12, section_length as u16)?;
    writer.put_n(16, table_id_extension)?;
    writer.put_reserved(2)?;
    writer.put_n(5, version & 0x1F)?;
    writer.put(true)?; // current_next_indicator
    writer.put_n(8, 0u8)?; // section_number
    writer.put_n(8, 0u8)?; // last_section_number

    Ok(())
}

/// Fields of the long-form header needed by the table readers.
struct SyntaxHeader {
    table_id_extension: u16,
    version: u8,
}

/// Validates table_id, length and CRC of `section`, returning the header
/// and the table body between last_section_number and the CRC.
fn read_syntax_header<'a>(
    section: &'a [u8],
    expected: u8,
    crc: &Crc32,
) -> Result<(SyntaxHeader, &'a [u8]), TsError> {
    let mut reader = BsIoSliceReader::from_slice(section);
    if reader.available()? < 24 {
        return Err(TsError::InsufficientData(section.len()));
    }

    let table_id: u8 = reader.get_n(8)?;
    if table_id != expected {
        return Err(TsError::UnexpectedTableId { table_id, expected });
    }
    reader.skip_n(4)?;
    let section_length: u16 = reader.get_n(12)?;

    let total = 3 + section_length as usize;
    if section.len() < total || (section_length as usize) < SYNTAX_HEADER_SIZE + CRC_SIZE {
        return Err(TsError::InsufficientData(section.len()));
    }

    let remainder = crc.checksum(&section[..total]);
    if remainder != 0 {
        return Err(TsError::SectionCrcMismatch(remainder));
    }

    let table_id_extension = reader.get_n(16)?;
    reader.skip_n(2)?;
    let version = reader.get_n(5)?;

    Ok((
        SyntaxHeader {
            table_id_extension,
            version,
        },
        &section[3 + SYNTAX_HEADER_SIZE..total - CRC_SIZE],
    ))
}

fn append_crc(section: &mut Vec<u8>, crc: &Crc32) {
    let sum = crc.checksum(section);
    section.extend_from_slice(&sum.to_be_bytes());
}

impl ProgramAssociationTable {
    pub fn section_length(&self) -> usize {
        SYNTAX_HEADER_SIZE + 4 * self.programs.len() + CRC_SIZE
    }

    /// Complete section from table_id through CRC.
    pub fn to_section(&self, crc: &Crc32) -> io::Result<Vec<u8>> {
        let mut section = Vec::with_capacity(3 + self.section_length());
        let mut writer = BsIoVecWriter::from_vec(&mut section);

        write_syntax_header(
            &mut writer,
            TABLE_ID_PAT,
            self.section_length(),
            self.transport_stream_id,
            self.version,
        )?;

        for &(program_number, pid) in &self.programs {
            writer.put_n(16, program_number)?;
            writer.put_reserved(3)?;
            writer.put_n(13, pid)?;
        }
        writer.finish()?;

        append_crc(&mut section, crc);
        Ok(section)
    }

    /// Parses a complete section starting at table_id.
    pub fn read(section: &[u8], crc: &Crc32) -> Result<Self, TsError> {
        let (header, body) = read_syntax_header(section, TABLE_ID_PAT, crc)?;

        let mut reader = BsIoSliceReader::from_slice(body);
        let mut programs = Vec::with_capacity(body.len() / 4);
        while reader.available()? >= 32 {
            let program_number = reader.get_n(16)?;
            reader.skip_n(3)?;
            programs.push((program_number, reader.get_n(13)?));
        }

        Ok(Self {
            transport_stream_id: header.table_id_extension,
            version: header.version,
            programs,
        })
    }
}

impl ProgramMapTable {
    pub fn section_length(&self) -> usize {
        SYNTAX_HEADER_SIZE + 4 + 5 * self.streams.len() + CRC_SIZE
    }

    pub fn to_section(&self, crc: &Crc32) -> io::Result<Vec<u8>> {
        let mut section = Vec::with_capacity(3 + self.section_length());
        let mut writer = BsIoVecWriter::from_vec(&mut section);

        write_syntax_header(
            &mut writer,
            TABLE_ID_PMT,
            self.section_length(),
            self.program_number,
            self.version,
        )?;

        writer.put_reserved(3)?;
        writer.put_n(13, self.pcr_pid)?;
        writer.put_reserved(4)?;
        writer.put_n(12, 0u16)?; // program_info_length

        for stream in &self.streams {
            writer.put_n(8, stream.stream_type)?;
            writer.put_reserved(3)?;
            writer.put_n(13, stream.pid)?;
            writer.put_reserved(4)?;
            writer.put_n(12, 0u16)?; // ES_info_length
        }
        writer.finish()?;

        append_crc(&mut section, crc);
        Ok(section)
    }

    pub fn read(section: &[u8], crc: &Crc32) -> Result<Self, TsError> {
        let (header, body) = read_syntax_header(section, TABLE_ID_PMT, crc)?;

        let mut reader = BsIoSliceReader::from_slice(body);
        reader.skip_n(3)?;
        let pcr_pid = reader.get_n(13)?;
        reader.skip_n(4)?;
        let program_info_length: u32 = reader.get_n(12)?;
        reader.skip_n(program_info_length << 3)?;

        let mut streams = Vec::new();
        while reader.available()? >= 40 {
            let stream_type = reader.get_n(8)?;
            reader.skip_n(3)?;
            let pid = reader.get_n(13)?;
            reader.skip_n(4)?;
            let es_info_length: u32 = reader.get_n(12)?;
            reader.skip_n(es_info_length << 3)?;
            streams.push(ElementaryStream { stream_type, pid });
        }

        Ok(Self {
            program_number: header.table_id_extension,
            version: header.version,
            pcr_pid,
            streams,
        })
    }
}
