use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (streamwire ",
    env!("STREAMWIRE_VERSION"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Debug, ClapParser)]
#[command(
    name         = env!("CARGO_PKG_NAME"),
    version      = env!("CARGO_PKG_VERSION"),
    long_version = LONG_VERSION,
    author       = env!("CARGO_PKG_AUTHORS"),
    about        = "Tools for muxing AAC into MPEG-TS and inspecting AMF0 command messages",
    long_about   = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Packetize an ADTS AAC stream into MPEG-TS.
    Mux(MuxArgs),

    /// Print transport stream information
    Info(InfoArgs),

    /// Encode or decode AMF0 command message bodies.
    Amf(AmfArgs),
}

#[derive(Debug, Args)]
pub struct MuxArgs {
    /// Input ADTS stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output transport stream (use "-" for stdout).
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,

    /// YAML mux profile; command-line flags take precedence.
    #[arg(long, value_name = "YAML")]
    pub profile: Option<PathBuf>,

    /// Transport packet size in bytes [default: 188].
    #[arg(long, value_name = "BYTES")]
    pub packet_size: Option<usize>,

    /// PID carrying the audio stream [default: 0x0101].
    #[arg(long, value_name = "PID", value_parser = parse_pid)]
    pub audio_pid: Option<u16>,

    /// PID carrying the program map table [default: 0x1000].
    #[arg(long, value_name = "PID", value_parser = parse_pid)]
    pub pmt_pid: Option<u16>,

    /// Access units between PAT/PMT repetitions, 0 to send them once [default: 40].
    #[arg(long, value_name = "FRAMES")]
    pub table_interval: Option<usize>,

    /// Bytes per output write, rounded down to whole packets [default: 1316].
    #[arg(long, value_name = "BYTES")]
    pub datagram_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Input transport stream (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Transport packet size in bytes.
    #[arg(long, value_name = "BYTES", default_value_t = 188)]
    pub packet_size: usize,
}

#[derive(Debug, Args)]
pub struct AmfArgs {
    #[command(subcommand)]
    pub command: AmfCommands,
}

#[derive(Debug, Subcommand)]
pub enum AmfCommands {
    /// Build a command message body from a YAML document.
    Encode(AmfEncodeArgs),

    /// Print a command message body as YAML.
    Decode(AmfDecodeArgs),
}

#[derive(Debug, Args)]
pub struct AmfEncodeArgs {
    /// YAML document with `name`, `transaction_id` and `arguments`.
    #[arg(value_name = "YAML")]
    pub input: PathBuf,

    /// Output body (use "-" for stdout).
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct AmfDecodeArgs {
    /// Command message body (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Body length declared by the message header; defaults to the input size.
    #[arg(long, value_name = "BYTES")]
    pub length: Option<usize>,
}

/// Accepts decimal or 0x-prefixed hexadecimal PIDs.
fn parse_pid(value: &str) -> Result<u16, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => value.parse(),
    }
    .map_err(|e| format!("invalid PID {value}: {e}"))?;

    if parsed == 0 || parsed >= 0x1FFF {
        return Err(format!("PID {parsed:#06X} is reserved"));
    }

    Ok(parsed)
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    /// Disable logging output.
    Off,
    /// No output except errors.
    Error,
    /// Show warnings and errors.
    Warn,
    /// Show info, warnings and errors (default).
    Info,
    /// Show debug, info, warnings and errors.
    Debug,
    /// Show all log messages including trace.
    Trace,
}

impl LogLevel {
    /// Convert LogLevel to log::LevelFilter
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_parsing() {
        assert_eq!(parse_pid("257"), Ok(0x0101));
        assert_eq!(parse_pid("0x1000"), Ok(0x1000));
        assert!(parse_pid("0").is_err());
        assert!(parse_pid("0x1FFF").is_err());
        assert!(parse_pid("pid").is_err());
    }

    #[test]
    fn mux_flags() {
        let cli = Cli::try_parse_from([
            "streamwired",
            "mux",
            "in.aac",
            "-o",
            "out.ts",
            "--audio-pid",
            "0x100",
            "--table-interval",
            "0",
        ])
        .unwrap();

        let Commands::Mux(args) = cli.command else {
            panic!("expected mux");
        };
        assert_eq!(args.audio_pid, Some(0x100));
        assert_eq!(args.table_interval, Some(0));
        assert_eq!(args.packet_size, None);
    }
}
