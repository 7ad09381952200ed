use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use streamwire::process::packetize::PacketizerConfig;
use streamwire::process::psi::PsiConfig;
use streamwire::structs::ts_header::TS_PACKET_SIZE;

use crate::cli::command::MuxArgs;

/// Default write size: seven 188-byte packets.
pub const DEFAULT_DATAGRAM_SIZE: usize = 1316;

/// Optional overrides for `mux`, read from YAML.
///
/// ```yaml
/// packet_size: 188
/// transport_stream_id: 1
/// program_number: 1
/// pmt_pid: 0x1000
/// audio_pid: 0x0101
/// table_interval: 40
/// datagram_size: 1316
/// ```
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MuxProfile {
    pub packet_size: Option<usize>,
    pub transport_stream_id: Option<u16>,
    pub program_number: Option<u16>,
    pub pmt_pid: Option<u16>,
    pub audio_pid: Option<u16>,
    pub table_interval: Option<usize>,
    pub datagram_size: Option<usize>,
}

impl MuxProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open profile {}", path.display()))?;
        serde_yaml_ng::from_reader(BufReader::new(file))
            .with_context(|| format!("Invalid profile {}", path.display()))
    }
}

/// Effective mux settings after merging defaults, profile and flags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MuxSettings {
    pub packetizer: PacketizerConfig,
    pub psi: PsiConfig,
    pub datagram_size: usize,
}

impl MuxSettings {
    pub fn resolve(profile: &MuxProfile, args: &MuxArgs) -> Result<Self> {
        let defaults = PsiConfig::default();

        let settings = Self {
            packetizer: PacketizerConfig {
                packet_size: args
                    .packet_size
                    .or(profile.packet_size)
                    .unwrap_or(TS_PACKET_SIZE),
            },
            psi: PsiConfig {
                transport_stream_id: profile
                    .transport_stream_id
                    .unwrap_or(defaults.transport_stream_id),
                program_number: profile.program_number.unwrap_or(defaults.program_number),
                pmt_pid: args.pmt_pid.or(profile.pmt_pid).unwrap_or(defaults.pmt_pid),
                audio_pid: args
                    .audio_pid
                    .or(profile.audio_pid)
                    .unwrap_or(defaults.audio_pid),
                table_interval: args
                    .table_interval
                    .or(profile.table_interval)
                    .unwrap_or(defaults.table_interval),
            },
            datagram_size: args
                .datagram_size
                .or(profile.datagram_size)
                .unwrap_or(DEFAULT_DATAGRAM_SIZE),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        for (name, pid) in [("PMT", self.psi.pmt_pid), ("audio", self.psi.audio_pid)] {
            if pid == 0 || pid >= 0x1FFF {
                bail!("{name} PID {pid:#06X} is reserved");
            }
        }

        if self.psi.pmt_pid == self.psi.audio_pid {
            bail!(
                "PMT and audio streams cannot share PID {:#06X}",
                self.psi.pmt_pid
            );
        }

        if self.psi.program_number == 0 {
            bail!("Program number 0 is reserved for the network PID");
        }

        Ok(())
    }
}
