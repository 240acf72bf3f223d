//! In-order delivery engine (spec §4.2). Pure state machine: no sockets, no
//! files — `handle_packet` returns what the transport loop should do next.
//! Mirrors the dispatch shape of `TCB::on_segment` in the teacher crate's
//! `tcp/tcb.rs`, generalized from TCP sequence/ack fields to this protocol's
//! byte-offset segments and explicit SACK blocks.

use std::collections::BTreeMap;

use crate::config::EOF_MARKER;
use crate::wire::SackBlock;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub packets_received: u64,
    pub duplicate_packets: u64,
    pub out_of_order_packets: u64,
    pub bytes_written: u64,
}

/// What the caller must do in response to a decoded datagram.
#[derive(Debug, Clone)]
pub struct HandleOutcome {
    /// Newly in-order bytes to append to the output sink, in order.
    pub to_write: Vec<u8>,
    /// Cumulative offset and SACK blocks to acknowledge with.
    pub ack: (u32, Vec<SackBlock>),
    /// How many copies of that ACK to send (the EOF handshake bursts 3; the
    /// ordinary case sends 1).
    pub ack_copies: u32,
    /// Set once the EOF sentinel has been delivered in order.
    pub complete: bool,
}

#[derive(Debug)]
pub struct ReceiverEngine {
    recv_base: u32,
    buffer: BTreeMap<u32, Vec<u8>>,
    sack_blocks: Vec<SackBlock>,
    complete: bool,
    stats: Stats,
}

impl ReceiverEngine {
    pub fn new() -> Self {
        ReceiverEngine {
            recv_base: 0,
            buffer: BTreeMap::new(),
            sack_blocks: Vec::new(),
            complete: false,
            stats: Stats::default(),
        }
    }

    pub fn recv_base(&self) -> u32 {
        self.recv_base
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    /// Recompute SACK blocks: fold contiguous runs of buffered offsets past
    /// `recv_base` into at most two (start, end) pairs (spec §4.2 "SACK
    /// synthesis").
    fn resync_sack_blocks(&mut self) {
        self.sack_blocks.clear();

        let mut iter = self.buffer.range(self.recv_base + 1..);
        let Some((&first_offset, first_payload)) = iter.next() else {
            return;
        };

        let mut current_start = first_offset;
        let mut current_end = first_offset + first_payload.len() as u32;

        for (&offset, payload) in iter {
            if offset == current_end {
                current_end = offset + payload.len() as u32;
            } else {
                self.sack_blocks.push(SackBlock {
                    start: current_start,
                    end: current_end,
                });
                if self.sack_blocks.len() == 2 {
                    return;
                }
                current_start = offset;
                current_end = offset + payload.len() as u32;
            }
        }
        self.sack_blocks.push(SackBlock {
            start: current_start,
            end: current_end,
        });
        self.sack_blocks.truncate(2);
    }

    fn cumulative_ack(&self, copies: u32) -> HandleOutcome {
        HandleOutcome {
            to_write: Vec::new(),
            ack: (self.recv_base, self.sack_blocks.clone()),
            ack_copies: copies,
            complete: self.complete,
        }
    }

    fn finish(&mut self, eof_offset: u32) -> HandleOutcome {
        self.complete = true;
        let final_ack = eof_offset + EOF_MARKER.len() as u32;
        HandleOutcome {
            to_write: Vec::new(),
            ack: (final_ack, Vec::new()),
            ack_copies: 3,
            complete: true,
        }
    }

    /// Drain the buffer of any run now contiguous with `recv_base`, writing
    /// each segment's bytes in order. Returns the concatenated bytes and,
    /// if an EOF entry was drained, the offset it occupied.
    fn drain_buffer(&mut self) -> (Vec<u8>, Option<u32>) {
        let mut written = Vec::new();
        loop {
            let Some(payload) = self.buffer.get(&self.recv_base) else {
                break;
            };
            if payload.as_slice() == EOF_MARKER {
                let eof_offset = self.recv_base;
                self.buffer.remove(&eof_offset);
                return (written, Some(eof_offset));
            }
            let payload = self.buffer.remove(&self.recv_base).unwrap();
            self.stats.bytes_written += payload.len() as u64;
            self.recv_base += payload.len() as u32;
            written.extend_from_slice(&payload);
        }
        (written, None)
    }

    pub fn handle_packet(&mut self, offset: u32, payload: &[u8]) -> HandleOutcome {
        self.stats.packets_received += 1;

        if payload == EOF_MARKER {
            if offset == self.recv_base {
                return self.finish(offset);
            }
            self.buffer.insert(offset, payload.to_vec());
            self.resync_sack_blocks();
            return self.cumulative_ack(1);
        }

        if offset == self.recv_base {
            self.stats.bytes_written += payload.len() as u64;
            self.recv_base += payload.len() as u32;
            let mut to_write = payload.to_vec();

            let (more, eof_offset) = self.drain_buffer();
            to_write.extend_from_slice(&more);

            if let Some(eof_offset) = eof_offset {
                let mut outcome = self.finish(eof_offset);
                outcome.to_write = to_write;
                return outcome;
            }

            self.resync_sack_blocks();
            let mut outcome = self.cumulative_ack(1);
            outcome.to_write = to_write;
            outcome
        } else if offset < self.recv_base {
            self.stats.duplicate_packets += 1;
            self.cumulative_ack(1)
        } else if self.buffer.contains_key(&offset) {
            self.stats.duplicate_packets += 1;
            self.cumulative_ack(1)
        } else {
            self.buffer.insert(offset, payload.to_vec());
            self.stats.out_of_order_packets += 1;
            self.resync_sack_blocks();
            self.cumulative_ack(1)
        }
    }

    /// ACK to send on the final burst after completion (spec §4.2).
    pub fn final_ack(&self) -> (u32, Vec<SackBlock>) {
        (self.recv_base, Vec::new())
    }
}

impl Default for ReceiverEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_order_delivery_writes_immediately() {
        let mut engine = ReceiverEngine::new();
        let out = engine.handle_packet(0, b"hello");
        assert_eq!(out.to_write, b"hello");
        assert_eq!(out.ack.0, 5);
        assert!(out.ack.1.is_empty());
        assert!(!out.complete);
    }

    #[test]
    fn out_of_order_segment_is_buffered_and_sacked() {
        let mut engine = ReceiverEngine::new();
        let out = engine.handle_packet(5, b"world");
        assert!(out.to_write.is_empty());
        assert_eq!(out.ack.0, 0);
        assert_eq!(out.ack.1, vec![SackBlock { start: 5, end: 10 }]);
    }

    #[test]
    fn filling_the_hole_drains_buffer_in_one_pass() {
        let mut engine = ReceiverEngine::new();
        engine.handle_packet(5, b"world");
        let out = engine.handle_packet(0, b"hello");
        assert_eq!(out.to_write, b"helloworld");
        assert_eq!(out.ack.0, 10);
        assert!(out.ack.1.is_empty());
    }

    #[test]
    fn reverse_order_twenty_segments_drain_in_one_pass() {
        let mut engine = ReceiverEngine::new();
        let chunk = b"0123456789";
        for i in (1..20).rev() {
            engine.handle_packet(i * 10, chunk);
        }
        let out = engine.handle_packet(0, chunk);
        assert_eq!(out.to_write.len(), 200);
        assert_eq!(out.ack.0, 200);
    }

    #[test]
    fn duplicate_in_order_segment_is_idempotent() {
        let mut engine = ReceiverEngine::new();
        engine.handle_packet(0, b"hello");
        let before_base = engine.recv_base();
        let out = engine.handle_packet(0, b"hello");
        assert!(out.to_write.is_empty());
        assert_eq!(engine.recv_base(), before_base);
        assert_eq!(engine.stats().duplicate_packets, 1);
    }

    #[test]
    fn eof_at_recv_base_completes_transfer() {
        let mut engine = ReceiverEngine::new();
        let out = engine.handle_packet(0, b"EOF");
        assert!(out.complete);
        assert_eq!(out.ack.0, 3);
        assert_eq!(out.ack_copies, 3);
    }

    #[test]
    fn eof_out_of_order_is_buffered_then_drained() {
        let mut engine = ReceiverEngine::new();
        engine.handle_packet(5, b"EOF");
        let out = engine.handle_packet(0, b"hello");
        assert!(out.complete);
        assert_eq!(out.ack.0, 8);
    }

    #[test]
    fn sack_blocks_are_capped_at_two_and_disjoint() {
        let mut engine = ReceiverEngine::new();
        engine.handle_packet(10, b"aaaa");
        engine.handle_packet(20, b"bbbb");
        let out = engine.handle_packet(30, b"cccc");
        assert_eq!(out.ack.1.len(), 2);
    }
}
