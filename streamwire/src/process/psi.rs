use log::{debug, trace};

use crate::process::{ContinuityCounter, MpegTsPacket, PacketSink};
use crate::structs::psi::{
    ElementaryStream, ProgramAssociationTable, ProgramMapTable, STREAM_TYPE_AAC_ADTS,
};
use crate::structs::ts_header::{AdaptationFieldControl, PID_PAT, TS_HEADER_SIZE, TsHeader};
use crate::utils::bitstream_io::BsIoVecWriter;
use crate::utils::crc::{CRC_PSI_SECTION_ALG, Crc32};
use crate::utils::errors::PacketizeError;

static PSI_CRC: Crc32 = Crc32::new(&CRC_PSI_SECTION_ALG);

/// Source of the structural tables and of the PID media is sent on.
///
/// The packetizer calls [`emit_configuration`](PsiProvider::emit_configuration)
/// once before its first media packet and
/// [`emit_configuration_if_due`](PsiProvider::emit_configuration_if_due) for
/// every access unit; when tables are repeated is up to the implementation.
pub trait PsiProvider {
    fn audio_pid(&self) -> u16;

    fn emit_configuration(
        &mut self,
        packet_size: usize,
        sink: &mut dyn PacketSink,
    ) -> Result<(), PacketizeError>;

    fn emit_configuration_if_due(
        &mut self,
        packet_size: usize,
        sink: &mut dyn PacketSink,
    ) -> Result<(), PacketizeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiConfig {
    pub transport_stream_id: u16,
    pub program_number: u16,
    pub pmt_pid: u16,
    pub audio_pid: u16,
    /// Access units between table repetitions; 0 disables repetition.
    pub table_interval: usize,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            transport_stream_id: 1,
            program_number: 1,
            pmt_pid: 0x1000,
            audio_pid: 0x0101,
            table_interval: 40,
        }
    }
}

/// Single-program PAT/PMT source for an AAC elementary stream.
#[derive(Debug)]
pub struct PsiManager {
    config: PsiConfig,
    pat_counter: ContinuityCounter,
    pmt_counter: ContinuityCounter,
    units_since_tables: usize,
}

impl Default for PsiManager {
    fn default() -> Self {
        Self::new(PsiConfig::default())
    }
}

impl PsiManager {
    pub fn new(config: PsiConfig) -> Self {
        Self {
            config,
            pat_counter: ContinuityCounter::default(),
            pmt_counter: ContinuityCounter::default(),
            units_since_tables: 0,
        }
    }

    pub fn config(&self) -> &PsiConfig {
        &self.config
    }

    pub fn pat(&self) -> ProgramAssociationTable {
        ProgramAssociationTable {
            transport_stream_id: self.config.transport_stream_id,
            version: 0,
            programs: vec![(self.config.program_number, self.config.pmt_pid)],
        }
    }

    pub fn pmt(&self) -> ProgramMapTable {
        ProgramMapTable {
            program_number: self.config.program_number,
            version: 0,
            pcr_pid: self.config.audio_pid,
            streams: vec![ElementaryStream {
                stream_type: STREAM_TYPE_AAC_ADTS,
                pid: self.config.audio_pid,
            }],
        }
    }
}

fn check_section_fits(section: &[u8], packet_size: usize) -> Result<(), PacketizeError> {
    if TS_HEADER_SIZE + 1 + section.len() > packet_size {
        return Err(PacketizeError::SectionTooLarge {
            section: section.len(),
            packet_size,
        });
    }
    Ok(())
}

/// Wraps one section in a packet: header, pointer_field, section, 0xFF fill.
fn section_packet(
    pid: u16,
    counter: &mut ContinuityCounter,
    section: &[u8],
    packet_size: usize,
) -> Result<MpegTsPacket, PacketizeError> {
    check_section_fits(section, packet_size)?;

    let mut buffer = Vec::with_capacity(packet_size);
    let mut writer = BsIoVecWriter::from_vec(&mut buffer);
    TsHeader::new(pid, true, AdaptationFieldControl::Payload, counter.advance())
        .write(&mut writer)?;
    writer.put_n(8, 0u8)?; // pointer_field
    writer.finish()?;

    buffer.extend_from_slice(section);
    buffer.resize(packet_size, 0xFF);

    Ok(MpegTsPacket {
        buffer,
        is_config: true,
    })
}

impl PsiProvider for PsiManager {
    fn audio_pid(&self) -> u16 {
        self.config.audio_pid
    }

    fn emit_configuration(
        &mut self,
        packet_size: usize,
        sink: &mut dyn PacketSink,
    ) -> Result<(), PacketizeError> {
        let pat_section = self.pat().to_section(&PSI_CRC)?;
        let pmt_section = self.pmt().to_section(&PSI_CRC)?;
        // Both must fit before either counter moves.
        check_section_fits(&pat_section, packet_size)?;
        check_section_fits(&pmt_section, packet_size)?;

        let pat = section_packet(PID_PAT, &mut self.pat_counter, &pat_section, packet_size)?;
        let pmt = section_packet(
            self.config.pmt_pid,
            &mut self.pmt_counter,
            &pmt_section,
            packet_size,
        )?;

        trace!(
            "Emitting PAT/PMT (PMT PID {:#06X}, audio PID {:#06X})",
            self.config.pmt_pid, self.config.audio_pid
        );
        sink.send(pat);
        sink.send(pmt);
        self.units_since_tables = 0;

        Ok(())
    }

    fn emit_configuration_if_due(
        &mut self,
        packet_size: usize,
        sink: &mut dyn PacketSink,
    ) -> Result<(), PacketizeError> {
        if self.config.table_interval == 0 {
            return Ok(());
        }

        self.units_since_tables += 1;
        if self.units_since_tables >= self.config.table_interval {
            debug!("Repeating PSI tables after {} access units", self.units_since_tables);
            self.emit_configuration(packet_size, sink)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::ts_header::{TS_PACKET_SIZE, TsPacketView};

    fn collect(manager: &mut PsiManager, due: bool) -> Vec<MpegTsPacket> {
        let mut packets = Vec::new();
        let mut sink = |packet: MpegTsPacket| packets.push(packet);
        if due {
            manager.emit_configuration_if_due(TS_PACKET_SIZE, &mut sink).unwrap();
        } else {
            manager.emit_configuration(TS_PACKET_SIZE, &mut sink).unwrap();
        }
        packets
    }

    #[test]
    fn configuration_is_pat_then_pmt() {
        let mut manager = PsiManager::default();
        let packets = collect(&mut manager, false);

        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| p.is_config && p.len() == TS_PACKET_SIZE));

        let pat = TsPacketView::parse(&packets[0].buffer).unwrap();
        assert_eq!(pat.header.pid, PID_PAT);
        assert!(pat.header.payload_unit_start);
        assert_eq!(pat.payload[0], 0); // pointer_field
        assert_eq!(
            &pat.payload[1..17],
            &PsiManager::default().pat().to_section(&PSI_CRC).unwrap()[..]
        );
        assert!(pat.payload[17..].iter().all(|&b| b == 0xFF));

        let pmt = TsPacketView::parse(&packets[1].buffer).unwrap();
        assert_eq!(pmt.header.pid, 0x1000);
    }

    #[test]
    fn tables_repeat_on_interval() {
        let mut manager = PsiManager::new(PsiConfig {
            table_interval: 3,
            ..Default::default()
        });

        assert!(collect(&mut manager, true).is_empty());
        assert!(collect(&mut manager, true).is_empty());
        let repeated = collect(&mut manager, true);
        assert_eq!(repeated.len(), 2);
        assert!(collect(&mut manager, true).is_empty());
    }

    #[test]
    fn table_counters_advance_per_pid() {
        let mut manager = PsiManager::default();
        collect(&mut manager, false);
        let second = collect(&mut manager, false);

        for packet in &second {
            let view = TsPacketView::parse(&packet.buffer).unwrap();
            assert_eq!(view.header.continuity_counter, 1);
        }
    }

    #[test]
    fn zero_interval_never_repeats() {
        let mut manager = PsiManager::new(PsiConfig {
            table_interval: 0,
            ..Default::default()
        });
        for _ in 0..100 {
            assert!(collect(&mut manager, true).is_empty());
        }
    }

    #[test]
    fn section_must_fit_packet() {
        let mut manager = PsiManager::default();
        let mut sink = |_packet: MpegTsPacket| {};
        assert!(matches!(
            manager.emit_configuration(16, &mut sink),
            Err(PacketizeError::SectionTooLarge { section: 16, packet_size: 16 })
        ));
    }

    #[test]
    fn oversized_pmt_leaves_counters_untouched() {
        let mut manager = PsiManager::default();
        let pat_len = manager.pat().to_section(&PSI_CRC).unwrap().len();
        let pmt_len = manager.pmt().to_section(&PSI_CRC).unwrap().len();
        assert!(pmt_len > pat_len);

        // Room for the PAT but not the PMT.
        let mut sink = |_packet: MpegTsPacket| {};
        assert!(
            manager
                .emit_configuration(TS_HEADER_SIZE + 1 + pat_len, &mut sink)
                .is_err()
        );

        let packets = collect(&mut manager, false);
        for packet in &packets {
            let view = TsPacketView::parse(&packet.buffer).unwrap();
            assert_eq!(view.header.continuity_counter, 0);
        }
    }
}
