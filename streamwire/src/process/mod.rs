/// Transport packetization of AAC access units.
///
/// Provides the [`AacPacketizer`](packetize::AacPacketizer), which frames each
/// access unit with an ADTS header and slices it across fixed-size packets.
pub mod packetize;

/// Structural tables describing the stream.
///
/// Provides the [`PsiProvider`](psi::PsiProvider) seam used by the packetizer
/// and the default single-program [`PsiManager`](psi::PsiManager).
pub mod psi;

/// Grouping of packets into datagram-sized payloads.
pub mod batch;

/// One emitted transport packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpegTsPacket {
    pub buffer: Vec<u8>,
    /// Set for structural-table packets, clear for media packets.
    pub is_config: bool,
}

impl MpegTsPacket {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl AsRef<[u8]> for MpegTsPacket {
    fn as_ref(&self) -> &[u8] {
        &self.buffer
    }
}

/// Receiver of emitted packets.
///
/// Packets are handed over synchronously and in emission order. A sink that
/// needs backpressure blocks inside [`send`](PacketSink::send).
pub trait PacketSink {
    fn send(&mut self, packet: MpegTsPacket);
}

impl<F: FnMut(MpegTsPacket)> PacketSink for F {
    fn send(&mut self, packet: MpegTsPacket) {
        self(packet)
    }
}

/// 4-bit continuity counter of one PID.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuityCounter(u8);

impl ContinuityCounter {
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Returns the value for the next packet and moves on, wrapping at 16.
    pub fn advance(&mut self) -> u8 {
        let current = self.0;
        self.0 = (self.0 + 1) & 0xF;
        current
    }
}

/// One encoded access unit handed over by the encoder.
#[derive(Debug, Clone, Copy)]
pub struct EncodedFrame<'a> {
    pub data: &'a [u8],
    /// Bytes of `data` belonging to the access unit. Non-positive lengths
    /// make the frame a no-op.
    pub length: i64,
    pub presentation_time_us: i64,
    pub valid: bool,
}

impl<'a> EncodedFrame<'a> {
    pub fn new(data: &'a [u8], presentation_time_us: i64) -> Self {
        Self {
            data,
            length: data.len() as i64,
            presentation_time_us,
            valid: true,
        }
    }
}

#[test]
fn continuity_counter_wraps() {
    let mut counter = ContinuityCounter::default();
    let values: Vec<u8> = (0..18).map(|_| counter.advance()).collect();

    assert_eq!(&values[..3], &[0, 1, 2]);
    assert_eq!(&values[14..], &[14, 15, 0, 1]);
    assert_eq!(counter.value(), 2);
}
