use log::{debug, trace, warn};

use crate::process::psi::PsiProvider;
use crate::process::{ContinuityCounter, EncodedFrame, MpegTsPacket, PacketSink};
use crate::structs::adaptation_field::{ADAPTATION_FIELD_MAX_SIZE, AdaptationField};
use crate::structs::adts::{AudioConfig, frame_access_unit};
use crate::structs::pes::{PES_HEADER_SIZE, PesHeader, PesType};
use crate::structs::ts_header::{AdaptationFieldControl, TS_HEADER_SIZE, TS_PACKET_SIZE, TsHeader};
use crate::utils::bitstream_io::BsIoVecWriter;
use crate::utils::errors::PacketizeError;
use crate::utils::timing::{MonotonicClock, Pcr, ReferenceClock};

/// Largest packet whose payload shortfall an adaptation field can always pad.
pub const MAX_PACKET_SIZE: usize = TS_HEADER_SIZE + ADAPTATION_FIELD_MAX_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketizerConfig {
    /// Fixed length of every emitted packet.
    pub packet_size: usize,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        Self {
            packet_size: TS_PACKET_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No packet emitted yet; tables go out ahead of the first media packet.
    #[default]
    AwaitingConfig,
    Streaming,
}

/// Frames AAC access units with ADTS headers and slices them into
/// fixed-size transport packets on the audio PID of `P`.
///
/// The first packet of every access unit carries an adaptation field with
/// the current reference clock and the PES header; the rest carry payload
/// only. A packet whose slice is shorter than its capacity is padded with
/// adaptation field stuffing, so payload bytes are never followed by fill.
/// Continuity counting runs for the lifetime of the packetizer.
pub struct AacPacketizer<P: PsiProvider, C: ReferenceClock = MonotonicClock> {
    config: PacketizerConfig,
    audio: AudioConfig,
    psi: P,
    clock: C,
    counter: ContinuityCounter,
    state: StreamState,
}

impl<P: PsiProvider> AacPacketizer<P> {
    pub fn new(config: PacketizerConfig, psi: P) -> Result<Self, PacketizeError> {
        Self::with_clock(config, psi, MonotonicClock::default())
    }
}

impl<P: PsiProvider, C: ReferenceClock> AacPacketizer<P, C> {
    pub fn with_clock(config: PacketizerConfig, psi: P, clock: C) -> Result<Self, PacketizeError> {
        let overhead =
            TS_HEADER_SIZE + AdaptationField::with_pcr(Pcr::default()).size() + PES_HEADER_SIZE;
        if config.packet_size <= overhead {
            return Err(PacketizeError::PacketCapacityExhausted {
                packet_size: config.packet_size,
                overhead,
            });
        }
        if config.packet_size > MAX_PACKET_SIZE {
            return Err(PacketizeError::PacketTooLarge {
                packet_size: config.packet_size,
                max: MAX_PACKET_SIZE,
            });
        }

        Ok(Self {
            config,
            audio: AudioConfig::default(),
            psi,
            clock,
            counter: ContinuityCounter::default(),
            state: StreamState::default(),
        })
    }

    /// Sets the rate and channel layout written into every ADTS header.
    pub fn set_audio_info(&mut self, sample_rate: u32, stereo: bool) -> Result<(), PacketizeError> {
        self.audio = AudioConfig::with_stereo(sample_rate, stereo)?;
        Ok(())
    }

    pub fn set_audio_config(&mut self, audio: AudioConfig) {
        self.audio = audio;
    }

    pub fn audio_config(&self) -> &AudioConfig {
        &self.audio
    }

    pub fn config(&self) -> &PacketizerConfig {
        &self.config
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Counter value the next media packet will carry.
    pub fn continuity_counter(&self) -> u8 {
        self.counter.value()
    }

    pub fn psi(&self) -> &P {
        &self.psi
    }

    pub fn psi_mut(&mut self) -> &mut P {
        &mut self.psi
    }

    /// Packetizes one access unit into `sink`.
    ///
    /// Returns the number of media packets emitted. Frames flagged invalid
    /// or with a non-positive length are skipped without emitting anything,
    /// tables included.
    pub fn write_frame<S: PacketSink>(
        &mut self,
        frame: &EncodedFrame,
        sink: &mut S,
    ) -> Result<usize, PacketizeError> {
        if !frame.valid || frame.length <= 0 {
            debug!(
                "Skipping frame (valid: {}, length: {})",
                frame.valid, frame.length
            );
            return Ok(0);
        }

        let length = usize::try_from(frame.length)
            .ok()
            .filter(|&length| length <= frame.data.len())
            .ok_or(PacketizeError::InvalidFrameLength {
                length: frame.length,
                available: frame.data.len(),
            })?;

        let framed = frame_access_unit(&frame.data[..length], &self.audio)?;

        let packet_size = self.config.packet_size;
        if self.state == StreamState::AwaitingConfig {
            self.psi.emit_configuration(packet_size, &mut *sink)?;
            debug!("Stream configuration sent, streaming");
            self.state = StreamState::Streaming;
        } else {
            self.psi.emit_configuration_if_due(packet_size, &mut *sink)?;
        }

        let presentation_time_us = u64::try_from(frame.presentation_time_us).unwrap_or_else(|_| {
            warn!(
                "Negative presentation time {} us clamped to 0",
                frame.presentation_time_us
            );
            0
        });

        let pid = self.psi.audio_pid();
        let mut offset = 0;
        let mut packets = 0;

        while offset < framed.len() {
            let first = offset == 0;

            let adaptation_field =
                first.then(|| AdaptationField::with_pcr(Pcr::from_micros(self.clock.now_us())));
            let pes =
                first.then(|| PesHeader::new(PesType::Audio, framed.len(), presentation_time_us));

            let overhead = TS_HEADER_SIZE
                + adaptation_field.map_or(0, |field| field.size())
                + pes.map_or(0, |header| header.size());
            let capacity = packet_size
                .checked_sub(overhead)
                .filter(|&capacity| capacity > 0)
                .ok_or(PacketizeError::PacketCapacityExhausted {
                    packet_size,
                    overhead,
                })?;

            let end = framed.len().min(offset + capacity);
            let chunk = &framed[offset..end];
            let padding = capacity - chunk.len();

            // The first packet grows its own field, later ones gain a padding-only one.
            let adaptation_field =
                adaptation_field.map(|field| AdaptationField { stuffing: padding, ..field });
            let afc = if adaptation_field.is_some() || padding > 0 {
                AdaptationFieldControl::AdaptationPayload
            } else {
                AdaptationFieldControl::Payload
            };
            let cc = self.counter.advance();

            let mut buffer = Vec::with_capacity(packet_size);
            let mut writer = BsIoVecWriter::from_vec(&mut buffer);
            TsHeader::new(pid, first, afc, cc).write(&mut writer)?;
            match &adaptation_field {
                Some(field) => field.write(&mut writer)?,
                None => AdaptationField::write_padding(&mut writer, padding)?,
            }
            writer.finish()?;

            if let Some(header) = &pes {
                header.write(&mut buffer)?;
            }
            buffer.extend_from_slice(chunk);
            debug_assert_eq!(buffer.len(), packet_size);

            trace!(
                "PID {pid:#06X} cc {cc:2} payload {:3} bytes{}",
                chunk.len(),
                if first { " (unit start)" } else { "" }
            );

            sink.send(MpegTsPacket {
                buffer,
                is_config: false,
            });

            offset = end;
            packets += 1;
        }

        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::psi::PsiManager;
    use crate::structs::adts::ADTS_HEADER_SIZE;
    use crate::structs::ts_header::TsPacketView;
    use crate::utils::errors::AdtsError;

    type TestPacketizer = AacPacketizer<PsiManager, fn() -> u64>;

    fn clock() -> u64 {
        1_000_001
    }

    fn packetizer(packet_size: usize) -> TestPacketizer {
        AacPacketizer::with_clock(
            PacketizerConfig { packet_size },
            PsiManager::default(),
            clock as fn() -> u64,
        )
        .unwrap()
    }

    fn run(packetizer: &mut TestPacketizer, frame: &EncodedFrame) -> Vec<MpegTsPacket> {
        let mut packets = Vec::new();
        packetizer
            .write_frame(frame, &mut |packet: MpegTsPacket| packets.push(packet))
            .unwrap();
        packets
    }

    fn media(packets: &[MpegTsPacket]) -> Vec<&MpegTsPacket> {
        packets.iter().filter(|p| !p.is_config).collect()
    }

    #[test]
    fn five_hundred_byte_unit_spans_three_packets() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let raw: Vec<u8> = (0..500 - ADTS_HEADER_SIZE).map(|i| i as u8).collect();

        let packets = run(&mut packetizer, &EncodedFrame::new(&raw, 0));
        let media = media(&packets);
        assert_eq!(media.len(), 3);

        let first = TsPacketView::parse(&media[0].buffer).unwrap();
        assert_eq!(first.payload.len() - PES_HEADER_SIZE, 162);
        let second = TsPacketView::parse(&media[1].buffer).unwrap();
        assert_eq!(second.payload.len(), 184);
    }

    #[test]
    fn tables_precede_first_media_packet() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        assert_eq!(packetizer.state(), StreamState::AwaitingConfig);

        let packets = run(&mut packetizer, &EncodedFrame::new(&[0x11; 50], 0));
        assert_eq!(packetizer.state(), StreamState::Streaming);

        assert!(packets[0].is_config);
        assert!(packets[1].is_config);
        assert!(packets[2..].iter().all(|p| !p.is_config));

        let second = run(&mut packetizer, &EncodedFrame::new(&[0x11; 50], 0));
        assert!(second.iter().all(|p| !p.is_config));
    }

    #[test]
    fn every_packet_has_fixed_size() {
        for packet_size in [TS_PACKET_SIZE, 204, 64] {
            let mut packetizer = packetizer(packet_size);
            for len in [1, 100, 161, 162, 163, 1000] {
                let packets = run(&mut packetizer, &EncodedFrame::new(&vec![0u8; len], 0));
                assert!(packets.iter().all(|p| p.len() == packet_size));
            }
        }
    }

    /// Transport payloads of the media packets, PES header stripped.
    fn elementary_stream(packets: &[MpegTsPacket]) -> Vec<u8> {
        let mut elementary = Vec::new();
        for packet in media(packets) {
            let view = TsPacketView::parse(&packet.buffer).unwrap();
            if view.header.payload_unit_start {
                elementary.extend_from_slice(&view.payload[PES_HEADER_SIZE..]);
            } else {
                elementary.extend_from_slice(view.payload);
            }
        }
        elementary
    }

    #[test]
    fn payload_reassembles_in_order() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let raw: Vec<u8> = (0..1500u32).map(|i| (i * 7) as u8).collect();

        let packets = run(&mut packetizer, &EncodedFrame::new(&raw, 40_000));
        let first = TsPacketView::parse(&media(&packets)[0].buffer).unwrap();
        let pes = PesHeader::read(first.payload).unwrap();
        assert_eq!(pes.pts, 3_600);
        assert_eq!(pes.packet_length as usize - 8, raw.len() + ADTS_HEADER_SIZE);

        let elementary = elementary_stream(&packets);
        assert_eq!(elementary.len(), raw.len() + ADTS_HEADER_SIZE);
        assert_eq!(&elementary[..2], &[0xFF, 0xF1]);
        assert_eq!(&elementary[ADTS_HEADER_SIZE..], &raw[..]);
    }

    #[test]
    fn transport_payloads_carry_no_fill() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        // 162 + 183 leaves a single byte of shortfall in the second packet.
        for len in [1, 100, 155, 300, 338, 500, 1000] {
            let raw = vec![0xAAu8; len];
            let packets = run(&mut packetizer, &EncodedFrame::new(&raw, 0));

            let elementary = elementary_stream(&packets);
            assert_eq!(elementary.len(), len + ADTS_HEADER_SIZE, "unit of {len} bytes");
            assert_eq!(&elementary[ADTS_HEADER_SIZE..], &raw[..]);
            assert!(packets.iter().all(|p| p.len() == TS_PACKET_SIZE));
        }
    }

    #[test]
    fn single_packet_unit_pads_its_adaptation_field() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let packets = run(&mut packetizer, &EncodedFrame::new(&[0x11; 50], 0));
        let media = media(&packets);
        assert_eq!(media.len(), 1);

        let view = TsPacketView::parse(&media[0].buffer).unwrap();
        let field = AdaptationField::read(view.adaptation_field.unwrap()).unwrap();
        assert_eq!(field.pcr, Some(Pcr::from_micros(1_000_001)));
        assert_eq!(field.stuffing, 162 - 57);
        assert_eq!(view.payload.len(), PES_HEADER_SIZE + 57);
    }

    #[test]
    fn short_last_packet_gets_padding_field() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        // 162 bytes in the first packet, 138 left for the second.
        let packets = run(&mut packetizer, &EncodedFrame::new(&[0u8; 300 - ADTS_HEADER_SIZE], 0));
        let media = media(&packets);
        assert_eq!(media.len(), 2);

        let last = TsPacketView::parse(&media[1].buffer).unwrap();
        assert_eq!(
            last.header.adaptation_field_control,
            AdaptationFieldControl::AdaptationPayload
        );
        let field = AdaptationField::read(last.adaptation_field.unwrap()).unwrap();
        assert_eq!(field.pcr, None);
        assert_eq!(field.stuffing, 184 - 138 - 2);
        assert_eq!(last.payload.len(), 138);
    }

    #[test]
    fn headers_only_on_first_packet() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let packets = run(&mut packetizer, &EncodedFrame::new(&[0u8; 800], 0));

        for (i, packet) in media(&packets).into_iter().enumerate() {
            let view = TsPacketView::parse(&packet.buffer).unwrap();
            assert_eq!(view.header.payload_unit_start, i == 0);
            if i == 0 {
                let field = AdaptationField::read(view.adaptation_field.unwrap()).unwrap();
                assert_eq!(field.pcr, Some(Pcr::from_micros(1_000_001)));
                assert!(PesHeader::read(view.payload).is_ok());
            } else if let Some(body) = view.adaptation_field {
                assert_eq!(AdaptationField::read(body).unwrap().pcr, None);
            }
        }
    }

    #[test]
    fn continuity_counter_persists_across_frames() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let mut counters = Vec::new();

        for _ in 0..10 {
            let packets = run(&mut packetizer, &EncodedFrame::new(&[0u8; 300], 0));
            for packet in media(&packets) {
                let view = TsPacketView::parse(&packet.buffer).unwrap();
                counters.push(view.header.continuity_counter);
            }
        }

        assert_eq!(counters.len(), 20);
        for (i, &cc) in counters.iter().enumerate() {
            assert_eq!(cc as usize, i % 16);
        }
        assert_eq!(packetizer.continuity_counter(), 4);
    }

    #[test]
    fn empty_and_invalid_frames_are_skipped() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);

        let mut frame = EncodedFrame::new(&[0u8; 10], 0);
        frame.length = -1;
        assert!(run(&mut packetizer, &frame).is_empty());

        frame.length = 0;
        assert!(run(&mut packetizer, &frame).is_empty());

        frame.length = 10;
        frame.valid = false;
        assert!(run(&mut packetizer, &frame).is_empty());

        assert_eq!(packetizer.state(), StreamState::AwaitingConfig);
        assert_eq!(packetizer.continuity_counter(), 0);
    }

    #[test]
    fn length_beyond_data_is_rejected() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let mut frame = EncodedFrame::new(&[0u8; 10], 0);
        frame.length = 11;

        let mut emitted = 0;
        let result = packetizer.write_frame(&frame, &mut |_: MpegTsPacket| emitted += 1);
        assert!(matches!(
            result,
            Err(PacketizeError::InvalidFrameLength { length: 11, available: 10 })
        ));
        assert_eq!(emitted, 0);
    }

    #[test]
    fn unsupported_rate_rejected_before_framing() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        assert!(matches!(
            packetizer.set_audio_info(99999, true),
            Err(PacketizeError::Adts(AdtsError::UnsupportedSampleRate(99999)))
        ));

        // The previous valid configuration is kept.
        assert_eq!(packetizer.audio_config().sample_rate(), 44100);
    }

    #[test]
    fn packet_too_small_for_headers() {
        let result = AacPacketizer::new(PacketizerConfig { packet_size: 26 }, PsiManager::default());
        assert!(matches!(
            result,
            Err(PacketizeError::PacketCapacityExhausted { packet_size: 26, overhead: 26 })
        ));
    }

    #[test]
    fn packet_too_large_for_padding() {
        let result = AacPacketizer::new(
            PacketizerConfig {
                packet_size: MAX_PACKET_SIZE + 1,
            },
            PsiManager::default(),
        );
        assert!(matches!(result, Err(PacketizeError::PacketTooLarge { max: 260, .. })));
    }

    #[test]
    fn negative_pts_clamped() {
        let mut packetizer = packetizer(TS_PACKET_SIZE);
        let packets = run(&mut packetizer, &EncodedFrame::new(&[0u8; 10], -5));
        let view = TsPacketView::parse(&media(&packets)[0].buffer).unwrap();
        assert_eq!(PesHeader::read(view.payload).unwrap().pts, 0);
    }
}
