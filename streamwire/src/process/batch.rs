use log::{trace, warn};

use crate::process::{MpegTsPacket, PacketSink};

/// Largest whole number of packets that fits `size_limit`, in bytes.
///
/// A 1500-byte budget holds seven 188-byte packets, so 1316.
pub fn datagram_payload_size(size_limit: usize, packet_size: usize) -> usize {
    if packet_size == 0 {
        return 0;
    }
    (size_limit / packet_size) * packet_size
}

/// Groups consecutive packets into datagram payloads.
///
/// A batch never mixes table packets with media packets; it is handed to
/// the inner sink when full, when the packet kind changes, or on
/// [`flush`](DatagramBatcher::flush).
pub struct DatagramBatcher<S: PacketSink> {
    output: S,
    limit: usize,
    pending: Vec<u8>,
    pending_config: bool,
}

impl<S: PacketSink> DatagramBatcher<S> {
    pub fn new(size_limit: usize, packet_size: usize, output: S) -> Self {
        let mut limit = datagram_payload_size(size_limit, packet_size);
        if limit == 0 {
            warn!(
                "Datagram limit {size_limit} is below the {packet_size}-byte packet size, sending one packet per datagram"
            );
            limit = packet_size;
        }

        Self {
            output,
            limit,
            pending: Vec::with_capacity(limit),
            pending_config: false,
        }
    }

    /// Payload size of a full batch.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        trace!(
            "Flushing {} byte datagram ({})",
            self.pending.len(),
            if self.pending_config { "tables" } else { "media" }
        );
        let buffer = std::mem::replace(&mut self.pending, Vec::with_capacity(self.limit));
        self.output.send(MpegTsPacket {
            buffer,
            is_config: self.pending_config,
        });
    }

    pub fn output_mut(&mut self) -> &mut S {
        &mut self.output
    }

    /// Flushes what is pending and returns the inner sink.
    pub fn into_inner(mut self) -> S {
        self.flush();
        self.output
    }
}

impl<S: PacketSink> PacketSink for DatagramBatcher<S> {
    fn send(&mut self, packet: MpegTsPacket) {
        if !self.pending.is_empty()
            && (packet.is_config != self.pending_config
                || self.pending.len() + packet.len() > self.limit)
        {
            self.flush();
        }

        self.pending_config = packet.is_config;
        self.pending.extend_from_slice(&packet.buffer);

        if self.pending.len() >= self.limit {
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::ts_header::TS_PACKET_SIZE;

    fn packet(fill: u8, is_config: bool) -> MpegTsPacket {
        MpegTsPacket {
            buffer: vec![fill; TS_PACKET_SIZE],
            is_config,
        }
    }

    #[test]
    fn payload_size_is_whole_packets() {
        assert_eq!(datagram_payload_size(1500, 188), 1316);
        assert_eq!(datagram_payload_size(1316, 188), 1316);
        assert_eq!(datagram_payload_size(100, 188), 0);
        assert_eq!(datagram_payload_size(1500, 0), 0);
    }

    #[test]
    fn full_batches_flush_immediately() {
        let mut datagrams = Vec::new();
        let mut batcher =
            DatagramBatcher::new(1500, TS_PACKET_SIZE, |d: MpegTsPacket| datagrams.push(d));

        for i in 0..10 {
            batcher.send(packet(i, false));
        }
        assert_eq!(batcher.pending_len(), 3 * TS_PACKET_SIZE);
        batcher.flush();
        drop(batcher);

        assert_eq!(datagrams.len(), 2);
        assert_eq!(datagrams[0].len(), 1316);
        assert_eq!(datagrams[1].len(), 3 * TS_PACKET_SIZE);
        assert_eq!(datagrams[1].buffer[0], 7);
    }

    #[test]
    fn kind_change_splits_batch() {
        let mut datagrams = Vec::new();
        let mut batcher =
            DatagramBatcher::new(1500, TS_PACKET_SIZE, |d: MpegTsPacket| datagrams.push(d));

        batcher.send(packet(0, true));
        batcher.send(packet(1, true));
        batcher.send(packet(2, false));
        drop(batcher.into_inner());

        assert_eq!(datagrams.len(), 2);
        assert!(datagrams[0].is_config);
        assert_eq!(datagrams[0].len(), 2 * TS_PACKET_SIZE);
        assert!(!datagrams[1].is_config);
        assert_eq!(datagrams[1].len(), TS_PACKET_SIZE);
    }

    #[test]
    fn tiny_limit_sends_single_packets() {
        let mut count = 0;
        let mut batcher = DatagramBatcher::new(50, TS_PACKET_SIZE, |_: MpegTsPacket| count += 1);
        assert_eq!(batcher.limit(), TS_PACKET_SIZE);

        batcher.send(packet(0, false));
        batcher.send(packet(1, false));
        assert_eq!(batcher.pending_len(), 0);
        drop(batcher);

        assert_eq!(count, 2);
    }
}
