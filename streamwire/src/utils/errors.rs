use std::io;

/// Reason an AMF0 value could not be decoded.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    #[error("unknown type marker {0:#04X}")]
    UnknownMarker(u8),

    #[error("object-end marker outside an object")]
    MisplacedObjectEnd,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("containers nested too deeply")]
    NestingTooDeep,

    #[error("stream ended inside {0}")]
    Truncated(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum AmfError {
    #[error("Malformed AMF0 value: {0}")]
    MalformedValue(Malformed),

    #[error("AMF0 body truncated: {consumed} bytes consumed of {declared} declared")]
    TruncatedStream { declared: usize, consumed: usize },

    #[error("AMF0 {what} of {len} bytes exceeds its {max}-byte length field")]
    ValueTooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum AdtsError {
    #[error("Unsupported sampling rate {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported ADTS profile {0}, the field holds 0-3")]
    UnsupportedProfile(u8),

    #[error("Unsupported channel count {0}, ADTS channel configuration must be 1-7")]
    UnsupportedChannelCount(u8),

    #[error("ADTS frame_length exceeds 13 bits: {length} > {max}")]
    FrameTooLong { length: usize, max: usize },

    #[error("Invalid ADTS sync word. Read {0:#05X}")]
    InvalidSyncWord(u16),

    #[error("Invalid ADTS sampling_frequency_index {0}")]
    InvalidSamplingIndex(u8),

    #[error("ADTS frame_length {0} is shorter than its header")]
    FrameTooShort(u16),

    #[error("Insufficient data for ADTS header")]
    InsufficientData,

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PacketizeError {
    #[error(
        "Packet size {packet_size} leaves no room for payload after {overhead} bytes of headers"
    )]
    PacketCapacityExhausted { packet_size: usize, overhead: usize },

    #[error("Packet size {packet_size} exceeds {max}, the most an adaptation field can pad")]
    PacketTooLarge { packet_size: usize, max: usize },

    #[error("Frame length {length} exceeds the {available} bytes supplied")]
    InvalidFrameLength { length: i64, available: usize },

    #[error("PSI section of {section} bytes does not fit a {packet_size}-byte packet")]
    SectionTooLarge { section: usize, packet_size: usize },

    #[error(transparent)]
    Adts(#[from] AdtsError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum TsError {
    #[error("Invalid transport sync byte. Read {0:#04X}, expected 0x47")]
    InvalidSyncByte(u8),

    #[error("adaptation_field_length {length} exceeds the {available} bytes left in the packet")]
    AdaptationFieldTooLong { length: usize, available: usize },

    #[error("Invalid PES start code. Read {0:#08X}, expected 0x000001")]
    InvalidPesStartCode(u32),

    #[error("Insufficient data for transport packet: {0} bytes")]
    InsufficientData(usize),

    #[error("Unexpected table_id {table_id:#04X}, expected {expected:#04X}")]
    UnexpectedTableId { table_id: u8, expected: u8 },

    #[error("PSI section CRC mismatch, remainder {0:#010X}")]
    SectionCrcMismatch(u32),

    #[error(transparent)]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_reason_is_part_of_message() {
        assert_eq!(Malformed::UnknownMarker(0x11).to_string(), "unknown type marker 0x11");

        let err = AmfError::MalformedValue(Malformed::UnknownMarker(0x11));
        assert_eq!(err.to_string(), "Malformed AMF0 value: unknown type marker 0x11");
    }
}
