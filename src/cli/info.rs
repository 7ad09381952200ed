use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, warn};

use streamwire::structs::adaptation_field::AdaptationField;
use streamwire::structs::pes::{PES_START_CODE, PesHeader};
use streamwire::structs::psi::{
    ProgramAssociationTable, ProgramMapTable, STREAM_TYPE_AAC_ADTS, STREAM_TYPE_H264,
    STREAM_TYPE_H265,
};
use streamwire::structs::ts_header::{PID_NULL, PID_PAT, TS_HEADER_SIZE, TsPacketView};
use streamwire::utils::crc::Crc32;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;
use crate::timestamp::pts_str;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing transport stream: {}", args.input.display());

    if args.packet_size <= TS_HEADER_SIZE {
        bail!("Packet size {} is too small", args.packet_size);
    }

    let mut input_reader = InputReader::new(&args.input)?;
    let mut context = AnalysisContext::new(args.packet_size, cli.strict);

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Analyzing packets...");
        context.pb = Some(pb);
    }

    let packet_size = args.packet_size;
    let mut pending = Vec::new();
    input_reader.process_chunks(64 * 1024, |chunk| {
        pending.extend_from_slice(chunk);
        let whole = pending.len() / packet_size * packet_size;

        for packet in pending[..whole].chunks_exact(packet_size) {
            context.process_packet(packet)?;
        }
        pending.drain(..whole);

        Ok(true)
    })?;

    if !pending.is_empty() {
        warn!("Ignoring {} trailing bytes", pending.len());
    }

    if let Some(ref pb) = context.pb {
        pb.finish_and_clear();
    }

    if context.packet_count == 0 {
        println!("No transport packets found in the file.");
        return Ok(());
    }

    context.display();
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PidKind {
    Pat,
    Pmt { program_number: u16 },
    Stream { stream_type: u8 },
    Null,
}

impl fmt::Display for PidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidKind::Pat => write!(f, "PAT"),
            PidKind::Pmt { program_number } => write!(f, "PMT (program {program_number})"),
            PidKind::Stream { stream_type } => match *stream_type {
                STREAM_TYPE_AAC_ADTS => write!(f, "AAC (ADTS)"),
                STREAM_TYPE_H264 => write!(f, "H.264"),
                STREAM_TYPE_H265 => write!(f, "H.265"),
                other => write!(f, "stream type {other:#04X}"),
            },
            PidKind::Null => write!(f, "null packets"),
        }
    }
}

#[derive(Debug, Default)]
struct PidStats {
    packets: u64,
    unit_starts: u64,
    adaptation_fields: u64,
    pcrs: u64,
    discontinuities: u64,
    last_cc: Option<u8>,
    first_pts: Option<u64>,
    last_pts: Option<u64>,
}

struct AnalysisContext {
    packet_size: usize,
    strict: bool,
    crc: Crc32,
    pids: BTreeMap<u16, PidStats>,
    kinds: BTreeMap<u16, PidKind>,
    packet_count: u64,
    invalid_packets: u64,
    pb: Option<ProgressBar>,
}

impl AnalysisContext {
    fn new(packet_size: usize, strict: bool) -> Self {
        let mut kinds = BTreeMap::new();
        kinds.insert(PID_PAT, PidKind::Pat);
        kinds.insert(PID_NULL, PidKind::Null);

        Self {
            packet_size,
            strict,
            crc: Crc32::default(),
            pids: BTreeMap::new(),
            kinds,
            packet_count: 0,
            invalid_packets: 0,
            pb: None,
        }
    }

    fn process_packet(&mut self, packet: &[u8]) -> Result<()> {
        let index = self.packet_count;
        self.packet_count += 1;

        if self.packet_count.is_multiple_of(1000) {
            if let Some(ref pb) = self.pb {
                pb.set_message(format!("Analyzing packets...      {}", self.packet_count));
                pb.tick();
            }
        }

        let view = match TsPacketView::parse(packet) {
            Ok(view) => view,
            Err(e) => {
                if self.strict {
                    bail!("Packet {index}: {e}");
                }
                warn!("Skipping packet {index}: {e}");
                self.invalid_packets += 1;
                return Ok(());
            }
        };

        let header = view.header;
        let adaptation_field = match view.adaptation_field {
            Some(body) => Some(AdaptationField::read(body)?),
            None => None,
        };
        let discontinuity = adaptation_field.is_some_and(|field| field.discontinuity);

        let stats = self.pids.entry(header.pid).or_default();
        stats.packets += 1;
        if header.payload_unit_start {
            stats.unit_starts += 1;
        }
        if let Some(field) = adaptation_field {
            stats.adaptation_fields += 1;
            if field.pcr.is_some() {
                stats.pcrs += 1;
            }
        }

        if header.adaptation_field_control.has_payload() && header.pid != PID_NULL {
            let cc = header.continuity_counter;
            if let Some(last) = stats.last_cc {
                let expected = (last + 1) & 0xF;
                if cc != expected && !discontinuity {
                    stats.discontinuities += 1;
                    if self.strict {
                        bail!(
                            "Continuity error on PID {:#06X} at packet {index}: expected {expected}, got {cc}",
                            header.pid
                        );
                    }
                    warn!(
                        "Continuity error on PID {:#06X} at packet {index}: expected {expected}, got {cc}",
                        header.pid
                    );
                }
            }
            stats.last_cc = Some(cc);
        }

        if !header.payload_unit_start {
            return Ok(());
        }

        match self.kinds.get(&header.pid).copied() {
            Some(PidKind::Pat) => self.read_pat(view.payload),
            Some(PidKind::Pmt { .. }) => self.read_pmt(view.payload),
            _ => {
                if view.payload.starts_with(&PES_START_CODE) {
                    if let Ok(pes) = PesHeader::read(view.payload) {
                        let stats = self.pids.entry(header.pid).or_default();
                        stats.first_pts.get_or_insert(pes.pts);
                        stats.last_pts = Some(pes.pts);
                    }
                }
            }
        }

        Ok(())
    }

    fn read_pat(&mut self, payload: &[u8]) {
        let Some(section) = section_after_pointer(payload) else {
            return;
        };

        match ProgramAssociationTable::read(section, &self.crc) {
            Ok(pat) => {
                for (program_number, pid) in pat.programs {
                    // program 0 points at the network information table
                    if program_number != 0 {
                        self.kinds.insert(pid, PidKind::Pmt { program_number });
                    }
                }
            }
            Err(e) => debug!("Unreadable PAT section: {e}"),
        }
    }

    fn read_pmt(&mut self, payload: &[u8]) {
        let Some(section) = section_after_pointer(payload) else {
            return;
        };

        match ProgramMapTable::read(section, &self.crc) {
            Ok(pmt) => {
                for stream in pmt.streams {
                    self.kinds.insert(
                        stream.pid,
                        PidKind::Stream {
                            stream_type: stream.stream_type,
                        },
                    );
                }
            }
            Err(e) => debug!("Unreadable PMT section: {e}"),
        }
    }

    fn display(&self) {
        let total_bytes = self.packet_count * self.packet_size as u64;
        let size_mb = total_bytes as f64 / (1024.0 * 1024.0);

        println!("Transport Stream Information");
        println!("============================");
        println!();
        println!("  Packet size               {} bytes", self.packet_size);
        println!("  Packets                   {}", self.packet_count);
        println!("  Size                      {size_mb:.2} MB ({total_bytes} bytes)");
        if self.invalid_packets > 0 {
            println!("  Invalid packets           {}", self.invalid_packets);
        }
        println!();

        for (pid, stats) in &self.pids {
            match self.kinds.get(pid) {
                Some(kind) => println!("PID {pid:#06X}  {kind}"),
                None => println!("PID {pid:#06X}"),
            }
            println!("  Packets                   {}", stats.packets);
            println!("  Unit starts               {}", stats.unit_starts);
            println!("  Adaptation fields         {}", stats.adaptation_fields);
            if stats.pcrs > 0 {
                println!("  PCRs                      {}", stats.pcrs);
            }
            println!("  CC discontinuities        {}", stats.discontinuities);
            if let (Some(first), Some(last)) = (stats.first_pts, stats.last_pts) {
                println!(
                    "  PTS range                 {} - {}",
                    pts_str(first),
                    pts_str(last)
                );
            }
            println!();
        }
    }
}

/// Section bytes following the pointer_field of a unit-start payload.
fn section_after_pointer(payload: &[u8]) -> Option<&[u8]> {
    let pointer = *payload.first()? as usize;
    payload.get(1 + pointer..)
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamwire::process::packetize::{AacPacketizer, PacketizerConfig};
    use streamwire::process::psi::PsiManager;
    use streamwire::process::{EncodedFrame, MpegTsPacket};
    use streamwire::structs::ts_header::TS_PACKET_SIZE;

    fn stream() -> Vec<MpegTsPacket> {
        let mut packetizer =
            AacPacketizer::new(PacketizerConfig::default(), PsiManager::default()).unwrap();

        let mut packets = Vec::new();
        for i in 0..3 {
            packetizer
                .write_frame(
                    &EncodedFrame::new(&[0u8; 300], i * 21_333),
                    &mut |packet: MpegTsPacket| packets.push(packet),
                )
                .unwrap();
        }
        packets
    }

    #[test]
    fn tables_label_pids() {
        let mut context = AnalysisContext::new(TS_PACKET_SIZE, true);
        for packet in stream() {
            context.process_packet(&packet.buffer).unwrap();
        }

        assert_eq!(context.packet_count, 8);
        assert_eq!(context.kinds.get(&0x1000), Some(&PidKind::Pmt { program_number: 1 }));
        assert_eq!(
            context.kinds.get(&0x0101),
            Some(&PidKind::Stream {
                stream_type: STREAM_TYPE_AAC_ADTS
            })
        );

        let audio = &context.pids[&0x0101];
        assert_eq!(audio.packets, 6);
        assert_eq!(audio.unit_starts, 3);
        assert_eq!(audio.pcrs, 3);
        assert_eq!(audio.discontinuities, 0);
        assert_eq!(audio.first_pts, Some(0));
        assert_eq!(audio.last_pts, Some(3_839));
    }

    #[test]
    fn dropped_packet_is_a_discontinuity() {
        let packets = stream();

        let mut lenient = AnalysisContext::new(TS_PACKET_SIZE, false);
        for packet in packets.iter().filter(|p| p.buffer != packets[3].buffer) {
            lenient.process_packet(&packet.buffer).unwrap();
        }
        assert_eq!(lenient.pids[&0x0101].discontinuities, 1);

        let mut strict = AnalysisContext::new(TS_PACKET_SIZE, true);
        let result: Result<()> = packets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 3)
            .try_for_each(|(_, p)| strict.process_packet(&p.buffer));
        assert!(result.is_err());
    }

    #[test]
    fn bad_sync_counted() {
        let mut context = AnalysisContext::new(TS_PACKET_SIZE, false);
        context.process_packet(&[0u8; TS_PACKET_SIZE]).unwrap();
        assert_eq!(context.invalid_packets, 1);
        assert!(context.pids.is_empty());
    }
}
