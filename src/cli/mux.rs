use std::io::Write;

use anyhow::{Context, Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{info, warn};

use streamwire::process::batch::DatagramBatcher;
use streamwire::process::packetize::AacPacketizer;
use streamwire::process::psi::PsiManager;
use streamwire::process::{EncodedFrame, MpegTsPacket, PacketSink};
use streamwire::structs::adts::{AdtsFrames, AdtsHeader, PROFILE_AAC_LC, SAMPLES_PER_FRAME};

use super::command::{Cli, MuxArgs};
use crate::config::{MuxProfile, MuxSettings};
use crate::input::{InputReader, create_output};
use crate::timestamp::{frame_time_us, time_str};

/// Datagrams waiting to be written to the output.
#[derive(Debug, Default)]
struct Datagrams(Vec<MpegTsPacket>);

impl PacketSink for Datagrams {
    fn send(&mut self, packet: MpegTsPacket) {
        self.0.push(packet);
    }
}

pub fn cmd_mux(args: &MuxArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    let profile = match &args.profile {
        Some(path) => MuxProfile::load(path)?,
        None => MuxProfile::default(),
    };
    let settings = MuxSettings::resolve(&profile, args)?;

    info!(
        "Muxing {} -> {} ({}-byte packets, audio PID {:#06X}, PMT PID {:#06X})",
        args.input.display(),
        args.output.display(),
        settings.packetizer.packet_size,
        settings.psi.audio_pid,
        settings.psi.pmt_pid
    );

    let mut input = InputReader::new(&args.input)?;
    let mut context = MuxContext::new(&settings, create_output(&args.output)?, cli.strict)?;

    if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template(
            "{spinner:.green} {pos} frames\n{msg} | elapsed: {elapsed_precise}",
        )?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        context.pb = Some(pb);
    }

    let mut pending = Vec::new();
    input.process_chunks(64 * 1024, |chunk| {
        pending.extend_from_slice(chunk);
        let consumed = context.process_frames(&pending)?;
        pending.drain(..consumed);
        Ok(true)
    })?;

    if !pending.is_empty() {
        if cli.strict {
            bail!("{} trailing bytes do not form a complete ADTS frame", pending.len());
        }
        warn!("Ignoring {} trailing bytes", pending.len());
    }

    context.finish()
}

struct MuxContext {
    packetizer: AacPacketizer<PsiManager>,
    batcher: DatagramBatcher<Datagrams>,
    output: Box<dyn Write>,
    strict: bool,
    pb: Option<ProgressBar>,

    packet_size: usize,
    frame_count: u64,
    media_packets: usize,
    config_packets: usize,
    bytes_written: usize,
    sample_rate: u32,
}

impl MuxContext {
    fn new(settings: &MuxSettings, output: Box<dyn Write>, strict: bool) -> Result<Self> {
        let packetizer =
            AacPacketizer::new(settings.packetizer, PsiManager::new(settings.psi))?;

        let batcher = DatagramBatcher::new(
            settings.datagram_size,
            settings.packetizer.packet_size,
            Datagrams::default(),
        );

        Ok(Self {
            packetizer,
            batcher,
            output,
            strict,
            pb: None,
            packet_size: settings.packetizer.packet_size,
            frame_count: 0,
            media_packets: 0,
            config_packets: 0,
            bytes_written: 0,
            sample_rate: 0,
        })
    }

    /// Packetizes every complete frame in `data`, returning the bytes consumed.
    fn process_frames(&mut self, data: &[u8]) -> Result<usize> {
        let mut consumed = 0;

        loop {
            let rest = &data[consumed..];
            match AdtsFrames::new(rest).next() {
                None => break,
                Some(Ok((header, payload))) => {
                    self.mux_frame(&header, payload)?;
                    consumed += header.frame_length as usize;
                }
                Some(Err(e)) => {
                    if self.strict {
                        return Err(e).context(format!("ADTS frame {}", self.frame_count));
                    }
                    warn!("Resyncing after frame {}: {e}", self.frame_count);
                    consumed += 1 + next_sync(&rest[1..]).unwrap_or(rest.len() - 1);
                }
            }
        }

        self.write_datagrams()?;
        Ok(consumed)
    }

    fn mux_frame(&mut self, header: &AdtsHeader, payload: &[u8]) -> Result<()> {
        let audio = header.audio_config()?;
        if self.frame_count == 0 || *self.packetizer.audio_config() != audio {
            info!(
                "Audio configuration: profile {}, {} Hz, {} channel(s)",
                audio.profile(),
                audio.sample_rate(),
                audio.channels()
            );
            if audio.profile() != PROFILE_AAC_LC {
                warn!("Input is not AAC LC (ADTS profile {})", audio.profile());
            }
            if self.frame_count > 0 && self.strict {
                bail!("Audio configuration changed at frame {}", self.frame_count);
            }
            self.sample_rate = audio.sample_rate();
            self.packetizer.set_audio_config(audio);
        }

        let pts = frame_time_us(self.frame_count, SAMPLES_PER_FRAME, self.sample_rate);
        let frame = EncodedFrame::new(payload, pts);
        self.media_packets += self.packetizer.write_frame(&frame, &mut self.batcher)?;
        self.frame_count += 1;

        if let Some(ref pb) = self.pb {
            pb.set_position(self.frame_count);
        }

        Ok(())
    }

    fn write_datagrams(&mut self) -> Result<()> {
        for datagram in self.batcher.output_mut().0.drain(..) {
            if datagram.is_config {
                self.config_packets += datagram.len() / self.packet_size;
            }
            self.output.write_all(&datagram.buffer)?;
            self.bytes_written += datagram.len();
        }

        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        self.batcher.flush();
        self.write_datagrams()?;
        self.output.flush()?;

        if let Some(ref pb) = self.pb {
            pb.finish_and_clear();
        }

        let duration = if self.sample_rate > 0 {
            frame_time_us(self.frame_count, SAMPLES_PER_FRAME, self.sample_rate) as f64 / 1e6
        } else {
            0.0
        };

        println!("Mux Summary");
        println!("  Frames                    {}", self.frame_count);
        println!("  Duration                  {}", time_str(duration));
        println!("  Media packets             {}", self.media_packets);
        println!("  Table packets             {}", self.config_packets);
        println!("  Bytes written             {}", self.bytes_written);
        println!();

        Ok(())
    }
}

/// Offset of the next candidate ADTS sync word in `data`.
fn next_sync(data: &[u8]) -> Option<usize> {
    data.windows(2)
        .position(|w| w[0] == 0xFF && w[1] & 0xF0 == 0xF0)
}
