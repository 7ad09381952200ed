//! ADTS framing for AAC access units.
//!
//! Each raw access unit is prefixed with a 7-byte header:
//!
//! ```text
//! syncword                 12  0xFFF
//! id                        1  0 = MPEG-4
//! layer                     2  0
//! protection_absent         1  1 = no CRC
//! profile                   2  audio object type - 1 (1 = AAC LC)
//! sampling_frequency_index  4
//! private_bit               1  0
//! channel_configuration     3
//! original/copy, home       2  0
//! copyright id bit/start    2  0
//! frame_length             13  header + payload
//! buffer_fullness          11  0x7FF = variable bitrate
//! raw_data_blocks           2  number of raw blocks - 1
//! ```

use std::io;

use log::trace;

use crate::utils::bitstream_io::{BsIoSliceReader, BsIoVecWriter};
use crate::utils::errors::AdtsError;

pub const ADTS_SYNC_WORD: u16 = 0xFFF;

/// Header length without CRC.
pub const ADTS_HEADER_SIZE: usize = 7;

/// Header length when `protection_absent` is clear.
pub const ADTS_HEADER_SIZE_WITH_CRC: usize = 9;

/// Largest value of the 13-bit frame_length field.
pub const MAX_FRAME_LENGTH: usize = (1 << 13) - 1;

/// Buffer fullness value signalling variable bitrate.
pub const BUFFER_FULLNESS_VBR: u16 = 0x7FF;

/// AAC Main, written as audio object type minus one.
pub const PROFILE_AAC_MAIN: u8 = 0;

/// AAC LC, written as audio object type minus one.
pub const PROFILE_AAC_LC: u8 = 1;

/// Largest value of the 2-bit profile field.
pub const MAX_PROFILE: u8 = 3;

/// Supported sampling rates, indexed by sampling_frequency_index.
/// Indices 13-15 are reserved.
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Samples per AAC frame, used to derive timestamps of ADTS input.
pub const SAMPLES_PER_FRAME: u64 = 1024;

pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|index| index as u8)
}

pub fn sampling_frequency(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(index as usize).copied()
}

/// Profile, sample rate and channel configuration of the audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    profile: u8,
    sample_rate: u32,
    channels: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            profile: PROFILE_AAC_LC,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

impl AudioConfig {
    /// Validates the rate against the sampling frequency table and the channel
    /// count against ADTS channel configurations 1-7.
    pub fn new(sample_rate: u32, channels: u8) -> Result<Self, AdtsError> {
        if sampling_frequency_index(sample_rate).is_none() {
            return Err(AdtsError::UnsupportedSampleRate(sample_rate));
        }

        if !(1..=7).contains(&channels) {
            return Err(AdtsError::UnsupportedChannelCount(channels));
        }

        Ok(Self {
            profile: PROFILE_AAC_LC,
            sample_rate,
            channels,
        })
    }

    /// Replaces the AAC LC default with another ADTS profile.
    pub fn with_profile(self, profile: u8) -> Result<Self, AdtsError> {
        if profile > MAX_PROFILE {
            return Err(AdtsError::UnsupportedProfile(profile));
        }
        Ok(Self { profile, ..self })
    }

    pub fn with_stereo(sample_rate: u32, stereo: bool) -> Result<Self, AdtsError> {
        Self::new(sample_rate, if stereo { 2 } else { 1 })
    }

    pub fn profile(&self) -> u8 {
        self.profile
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn sampling_frequency_index(&self) -> Result<u8, AdtsError> {
        sampling_frequency_index(self.sample_rate)
            .ok_or(AdtsError::UnsupportedSampleRate(self.sample_rate))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub mpeg2: bool,
    pub protection_absent: bool,
    pub profile: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    pub frame_length: u16,
    pub buffer_fullness: u16,
    pub raw_data_blocks: u8,
}

impl AdtsHeader {
    /// Header for one access unit of `payload_len` bytes.
    pub fn for_payload(config: &AudioConfig, payload_len: usize) -> Result<Self, AdtsError> {
        let sampling_frequency_index = config.sampling_frequency_index()?;

        let frame_length = payload_len + ADTS_HEADER_SIZE;
        if frame_length > MAX_FRAME_LENGTH {
            return Err(AdtsError::FrameTooLong {
                length: frame_length,
                max: MAX_FRAME_LENGTH,
            });
        }

        Ok(Self {
            mpeg2: false,
            protection_absent: true,
            profile: config.profile,
            sampling_frequency_index,
            channel_configuration: config.channels,
            frame_length: frame_length as u16,
            buffer_fullness: BUFFER_FULLNESS_VBR,
            raw_data_blocks: 0,
        })
    }

    pub fn header_size(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE_WITH_CRC
        }
    }

    /// Raw access unit length following the header.
    pub fn payload_len(&self) -> usize {
        (self.frame_length as usize).saturating_sub(self.header_size())
    }

    pub fn sample_rate(&self) -> Option<u32> {
        sampling_frequency(self.sampling_frequency_index)
    }

    /// Writes the fixed and variable header parts (CRC-less form).
    pub fn write(&self, writer: &mut BsIoVecWriter) -> io::Result<()> {
        writer.put_n(12, ADTS_SYNC_WORD)?;
        writer.put(self.mpeg2)?;
        writer.put_n(2, 0u8)?; // layer
        writer.put(true)?; // protection_absent
        writer.put_n(2, self.profile)?;
        writer.put_n(4, self.sampling_frequency_index)?;
        writer.put(false)?; // private_bit
        writer.put_n(3, self.channel_configuration)?;
        writer.put_n(4, 0u8)?; // original/copy, home, copyright id bit/start
        writer.put_n(13, self.frame_length)?;
        writer.put_n(11, self.buffer_fullness)?;
        writer.put_n(2, self.raw_data_blocks)?;

        Ok(())
    }

    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self, AdtsError> {
        if reader.available()? < (ADTS_HEADER_SIZE as u64) << 3 {
            return Err(AdtsError::InsufficientData);
        }

        let sync: u16 = reader.get_n(12)?;
        if sync != ADTS_SYNC_WORD {
            return Err(AdtsError::InvalidSyncWord(sync));
        }

        let mpeg2 = reader.get()?;
        reader.skip_n(2)?;
        let protection_absent = reader.get()?;
        let profile = reader.get_n(2)?;
        let sampling_frequency_index = reader.get_n(4)?;
        reader.skip_n(1)?;
        let channel_configuration = reader.get_n(3)?;
        reader.skip_n(4)?;

        let header = Self {
            mpeg2,
            protection_absent,
            profile,
            sampling_frequency_index,
            channel_configuration,
            frame_length: reader.get_n(13)?,
            buffer_fullness: reader.get_n(11)?,
            raw_data_blocks: reader.get_n(2)?,
        };

        if !header.protection_absent {
            reader.skip_n(16).map_err(|_| AdtsError::InsufficientData)?;
        }

        if header.sample_rate().is_none() {
            return Err(AdtsError::InvalidSamplingIndex(header.sampling_frequency_index));
        }

        if (header.frame_length as usize) < header.header_size() {
            return Err(AdtsError::FrameTooShort(header.frame_length));
        }

        Ok(header)
    }

    /// Audio configuration described by this header.
    pub fn audio_config(&self) -> Result<AudioConfig, AdtsError> {
        let sample_rate = self
            .sample_rate()
            .ok_or(AdtsError::InvalidSamplingIndex(self.sampling_frequency_index))?;
        AudioConfig::new(sample_rate, self.channel_configuration)?.with_profile(self.profile)
    }
}

/// Prefixes a raw access unit with its ADTS header.
///
/// The configuration is validated before anything is written, so an
/// unsupported rate never produces a partial header.
pub fn frame_access_unit(payload: &[u8], config: &AudioConfig) -> Result<Vec<u8>, AdtsError> {
    let header = AdtsHeader::for_payload(config, payload.len())?;

    let mut framed = Vec::with_capacity(header.frame_length as usize);
    let mut writer = BsIoVecWriter::from_vec(&mut framed);
    header.write(&mut writer)?;
    writer.finish()?;
    framed.extend_from_slice(payload);

    trace!(
        "ADTS frame: {} Hz, {} ch, frame_length {}",
        config.sample_rate(),
        config.channels(),
        header.frame_length
    );

    Ok(framed)
}

/// Splits a buffer of concatenated ADTS frames into headers and raw payloads.
pub struct AdtsFrames<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> AdtsFrames<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Bytes not yet consumed, including a trailing partial frame.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }
}

impl<'a> Iterator for AdtsFrames<'a> {
    type Item = Result<(AdtsHeader, &'a [u8]), AdtsError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.remaining();
        if rest.len() < ADTS_HEADER_SIZE {
            return None;
        }

        let mut reader = BsIoSliceReader::from_slice(rest);
        let header = match AdtsHeader::read(&mut reader) {
            Ok(header) => header,
            Err(AdtsError::InsufficientData) => return None,
            Err(e) => {
                // Skip to the end so a corrupt stream does not loop forever.
                self.offset = self.data.len();
                return Some(Err(e));
            }
        };

        let frame_length = header.frame_length as usize;
        if rest.len() < frame_length {
            return None;
        }

        self.offset += frame_length;
        Some(Ok((header, &rest[header.header_size()..frame_length])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_bytes_44100_stereo() {
        let config = AudioConfig::with_stereo(44100, true).unwrap();
        let framed = frame_access_unit(&[0xAA; 100], &config).unwrap();

        assert_eq!(framed.len(), 107);
        assert_eq!(&framed[..7], &[0xFF, 0xF1, 0x50, 0x80, 0x0D, 0x7F, 0xFC]);
        assert!(framed[7..].iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn header_bytes_48000_mono() {
        let config = AudioConfig::with_stereo(48000, false).unwrap();
        let framed = frame_access_unit(&[0; 9], &config).unwrap();

        // index 3, channel configuration 1, frame_length 16
        assert_eq!(&framed[..7], &[0xFF, 0xF1, 0x4C, 0x40, 0x02, 0x1F, 0xFC]);
    }

    #[test]
    fn sampling_index_table() {
        assert_eq!(sampling_frequency_index(96000), Some(0));
        assert_eq!(sampling_frequency_index(44100), Some(4));
        assert_eq!(sampling_frequency_index(7350), Some(12));
        assert_eq!(sampling_frequency_index(99999), None);
        assert_eq!(sampling_frequency(13), None);
    }

    #[test]
    fn unsupported_rate_is_rejected_up_front() {
        let err = AudioConfig::new(99999, 2).unwrap_err();
        assert!(matches!(err, AdtsError::UnsupportedSampleRate(99999)));

        let err = AudioConfig::new(44100, 0).unwrap_err();
        assert!(matches!(err, AdtsError::UnsupportedChannelCount(0)));
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let config = AudioConfig::default();
        let err = frame_access_unit(&vec![0; MAX_FRAME_LENGTH], &config).unwrap_err();
        assert!(matches!(err, AdtsError::FrameTooLong { .. }));
    }

    #[test]
    fn written_header_reads_back() {
        let config = AudioConfig::new(22050, 6).unwrap();
        let framed = frame_access_unit(&[1, 2, 3], &config).unwrap();

        let mut reader = BsIoSliceReader::from_slice(&framed);
        let header = AdtsHeader::read(&mut reader).unwrap();
        assert_eq!(header, AdtsHeader::for_payload(&config, 3).unwrap());
        assert_eq!(header.audio_config().unwrap(), config);
        assert_eq!(header.payload_len(), 3);
    }

    #[test]
    fn input_profile_is_carried() {
        let main = AudioConfig::default().with_profile(PROFILE_AAC_MAIN).unwrap();
        let framed = frame_access_unit(&[0xAA; 100], &main).unwrap();
        assert_eq!(&framed[..7], &[0xFF, 0xF1, 0x10, 0x80, 0x0D, 0x7F, 0xFC]);

        let mut reader = BsIoSliceReader::from_slice(&framed);
        let header = AdtsHeader::read(&mut reader).unwrap();
        assert_eq!(header.profile, PROFILE_AAC_MAIN);
        assert_eq!(header.audio_config().unwrap(), main);

        assert!(matches!(
            AudioConfig::default().with_profile(4),
            Err(AdtsError::UnsupportedProfile(4))
        ));
    }

    #[test]
    fn frames_iterator_splits_stream() {
        let config = AudioConfig::default();
        let mut stream = frame_access_unit(&[1; 10], &config).unwrap();
        stream.extend(frame_access_unit(&[2; 20], &config).unwrap());
        stream.extend_from_slice(&[0xFF, 0xF1, 0x50]);

        let mut frames = AdtsFrames::new(&stream);
        let (_, first) = frames.next().unwrap().unwrap();
        let (_, second) = frames.next().unwrap().unwrap();
        assert_eq!(first, &[1; 10]);
        assert_eq!(second, &[2; 20]);
        assert!(frames.next().is_none());
        assert_eq!(frames.remaining().len(), 3);
    }

    #[test]
    fn frames_iterator_reports_bad_sync() {
        let mut frames = AdtsFrames::new(&[0x00; 16]);
        assert!(matches!(
            frames.next(),
            Some(Err(AdtsError::InvalidSyncWord(0)))
        ));
        assert!(frames.next().is_none());
    }
}
