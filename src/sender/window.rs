//! Sender byte accounting and transmit pacing (spec §4.3, §4.5).
//!
//! Generalizes the teacher crate's `TCB` retransmission queue (`tcp/tcb.rs`:
//! `Segment`, `SendSpace`, `process_ack`) from a TCP sequence-number/ack
//! pair to this protocol's explicit byte-offset `window` map plus SACK
//! block tracking, following `original_source/part1/p1_server.py`'s
//! `window` / `sacked_packets` / `dup_ack_count` bookkeeping.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EOF_MARKER;
use crate::wire::SackBlock;

#[derive(Debug, Clone)]
struct Segment {
    len: u32,
    is_eof: bool,
    last_send: Instant,
    retransmitted: bool,
}

impl Segment {
    fn end(&self, offset: u32) -> u32 {
        offset + self.len
    }
}

/// Outcome of processing an incoming cumulative ACK.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckEffect {
    pub is_new: bool,
    pub bytes_acked: u32,
    pub rtt_sample: Option<Duration>,
    pub eof_acked: bool,
}

#[derive(Debug)]
pub struct SendWindow {
    file: Arc<Vec<u8>>,
    file_size: u32,
    send_base: u32,
    next_seq: u32,
    segments: BTreeMap<u32, Segment>,
    sacked: HashSet<u32>,
    sack_blocks: Vec<SackBlock>,
    dup_ack_count: HashMap<u32, u32>,
    eof_sent: bool,
}

impl SendWindow {
    pub fn new(file: Arc<Vec<u8>>) -> Self {
        let file_size = file.len() as u32;
        SendWindow {
            file,
            file_size,
            send_base: 0,
            next_seq: 0,
            segments: BTreeMap::new(),
            sacked: HashSet::new(),
            sack_blocks: Vec::new(),
            dup_ack_count: HashMap::new(),
            eof_sent: false,
        }
    }

    pub fn file_size(&self) -> u32 {
        self.file_size
    }

    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn is_complete(&self) -> bool {
        self.send_base > self.file_size
    }

    pub fn bytes_in_flight(&self) -> u32 {
        self.segments.values().map(|s| s.len).sum()
    }

    pub fn payload(&self, offset: u32) -> &[u8] {
        let seg = &self.segments[&offset];
        if seg.is_eof {
            EOF_MARKER
        } else {
            &self.file[offset as usize..(offset + seg.len) as usize]
        }
    }

    /// Cut and record as many new segments as `cap` (bytes-in-flight
    /// ceiling) allows, plus the EOF pseudo-segment once all file bytes
    /// have been assigned (spec §4.3). Returns the offsets newly admitted,
    /// in send order — caller is responsible for actually transmitting
    /// `payload(offset)` for each.
    pub fn admit(&mut self, cap: u32, now: Instant) -> Vec<u32> {
        let mut admitted = Vec::new();
        let mut usable = cap.saturating_sub(self.bytes_in_flight());

        while usable > 0 && self.next_seq < self.file_size {
            let remaining = self.file_size - self.next_seq;
            let size = remaining.min(crate::config::MSS as u32).min(usable);
            if size == 0 {
                break;
            }
            let offset = self.next_seq;
            self.segments.insert(
                offset,
                Segment {
                    len: size,
                    is_eof: false,
                    last_send: now,
                    retransmitted: false,
                },
            );
            self.next_seq += size;
            usable -= size;
            admitted.push(offset);
        }

        if self.next_seq == self.file_size && !self.eof_sent {
            let offset = self.file_size;
            self.segments.insert(
                offset,
                Segment {
                    len: EOF_MARKER.len() as u32,
                    is_eof: true,
                    last_send: now,
                    retransmitted: false,
                },
            );
            self.next_seq = offset + EOF_MARKER.len() as u32;
            self.eof_sent = true;
            admitted.push(offset);
        }

        admitted
    }

    pub fn eof_sent(&self) -> bool {
        self.eof_sent
    }

    fn recompute_sacked(&mut self) {
        self.sacked.clear();
        for block in &self.sack_blocks {
            for (&offset, seg) in self.segments.iter() {
                // Full containment only (spec §9 open question (a)): a
                // segment extending past the SACK block's end is not
                // considered SACKed even if it starts inside the block.
                if offset >= block.start && seg.end(offset) <= block.end {
                    self.sacked.insert(offset);
                }
            }
        }
    }

    pub fn is_sacked(&self, offset: u32) -> bool {
        self.sacked.contains(&offset)
    }

    pub fn payload_exists(&self, offset: u32) -> bool {
        self.segments.contains_key(&offset)
    }

    pub fn sack_blocks(&self) -> &[SackBlock] {
        &self.sack_blocks
    }

    /// Record a retransmission: refresh `last_send` and invalidate this
    /// segment for RTT sampling (Karn's rule, spec §4.4/§9).
    pub fn mark_retransmitted(&mut self, offset: u32, now: Instant) {
        if let Some(seg) = self.segments.get_mut(&offset) {
            seg.last_send = now;
            seg.retransmitted = true;
        }
    }

    /// Process a cumulative ACK carrying `sack_blocks`. Advances
    /// `send_base`, prunes acknowledged segments, and returns an RTT
    /// sample candidate when one is available under Karn's rule.
    pub fn handle_cumulative_ack(
        &mut self,
        ack: u32,
        sack_blocks: Vec<SackBlock>,
        now: Instant,
    ) -> AckEffect {
        self.sack_blocks = sack_blocks;
        self.recompute_sacked();

        if ack <= self.send_base {
            return AckEffect::default();
        }

        let rtt_sample = self
            .segments
            .range(self.send_base..ack)
            .find(|(offset, seg)| !seg.retransmitted && !self.sacked.contains(*offset))
            .map(|(_, seg)| now.duration_since(seg.last_send));

        let bytes_acked = ack - self.send_base;
        self.send_base = ack;
        self.segments.retain(|&offset, _| offset >= self.send_base);
        self.sacked.retain(|&offset| offset >= self.send_base);
        self.dup_ack_count.clear();

        AckEffect {
            is_new: true,
            bytes_acked,
            rtt_sample,
            eof_acked: self.eof_sent && self.send_base > self.file_size,
        }
    }

    /// Record a duplicate ACK (cumulative value equal to `send_base`).
    /// Returns the running count for this ACK value.
    pub fn record_duplicate_ack(&mut self) -> u32 {
        let count = self.dup_ack_count.entry(self.send_base).or_insert(0);
        *count += 1;
        *count
    }

    /// Offsets whose retransmit timer has expired and that are not
    /// currently SACKed (spec §4.5 "Timeout").
    pub fn timeout_candidates(&self, now: Instant, rto: Duration) -> Vec<u32> {
        self.segments
            .iter()
            .filter(|(offset, seg)| {
                !self.sacked.contains(*offset) && now.duration_since(seg.last_send) > rto
            })
            .map(|(&offset, _)| offset)
            .collect()
    }

    /// Offsets lying before the first SACK block, or in a hole between
    /// consecutive SACK blocks, gated by `now - last_send > rto/2` (spec
    /// §4.5 "SACK-driven selective retransmit").
    pub fn sack_hole_candidates(&self, now: Instant, rto: Duration) -> Vec<u32> {
        if self.sack_blocks.is_empty() {
            return Vec::new();
        }
        let mut sorted_blocks = self.sack_blocks.to_vec();
        sorted_blocks.sort_by_key(|b| b.start);
        let half_rto = rto / 2;

        let mut candidates = Vec::new();
        let first_start = sorted_blocks[0].start;
        for (&offset, seg) in self.segments.range(self.send_base..) {
            if offset >= first_start {
                break;
            }
            if !self.sacked.contains(&offset) && now.duration_since(seg.last_send) > half_rto {
                candidates.push(offset);
            }
        }

        for pair in sorted_blocks.windows(2) {
            let (hole_start, hole_end) = (pair[0].end, pair[1].start);
            for (&offset, seg) in self.segments.range(hole_start..hole_end) {
                if !self.sacked.contains(&offset) && now.duration_since(seg.last_send) > half_rto {
                    candidates.push(offset);
                }
            }
        }

        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(file_size: usize) -> SendWindow {
        SendWindow::new(Arc::new(vec![0u8; file_size]))
    }

    #[test]
    fn admission_respects_cap_and_mss() {
        let mut w = window(5000);
        let now = Instant::now();
        let admitted = w.admit(2000, now);
        // 2 full MSS segments (1180 each) then a partial one.
        assert_eq!(admitted, vec![0, 1180]);
        assert_eq!(w.bytes_in_flight(), 2360);
    }

    #[test]
    fn eof_admitted_exactly_once_at_file_end() {
        let mut w = window(10);
        let now = Instant::now();
        w.admit(1000, now);
        assert!(w.eof_sent());
        assert_eq!(w.next_seq(), 13);
        let admitted_again = w.admit(1000, now);
        assert!(admitted_again.is_empty());
    }

    #[test]
    fn cumulative_ack_prunes_window_and_clears_dup_counts() {
        let mut w = window(3000);
        let now = Instant::now();
        w.admit(3000, now);
        w.record_duplicate_ack();
        let effect = w.handle_cumulative_ack(1180, Vec::new(), now);
        assert!(effect.is_new);
        assert_eq!(effect.bytes_acked, 1180);
        assert_eq!(w.send_base(), 1180);
        assert!(w.segments.contains_key(&1180));
        assert!(!w.segments.contains_key(&0));
    }

    #[test]
    fn retransmitted_segment_never_yields_rtt_sample() {
        let mut w = window(1000);
        let now = Instant::now();
        w.admit(1000, now);
        w.mark_retransmitted(0, now);
        let effect = w.handle_cumulative_ack(1000, Vec::new(), now);
        assert!(effect.rtt_sample.is_none());
    }

    #[test]
    fn sack_requires_full_containment() {
        let mut w = window(3000);
        let now = Instant::now();
        w.admit(3000, now);
        // Segment at 1180 has length up to 1180 but block only covers half.
        w.handle_cumulative_ack(
            0,
            vec![SackBlock {
                start: 1180,
                end: 1180 + 100,
            }],
            now,
        );
        assert!(!w.is_sacked(1180));
    }

    #[test]
    fn timeout_candidates_exclude_sacked_segments() {
        let mut w = window(3000);
        let t0 = Instant::now();
        w.admit(3000, t0);
        w.handle_cumulative_ack(
            0,
            vec![SackBlock {
                start: 1180,
                end: 2360,
            }],
            t0,
        );
        assert!(w.is_sacked(1180));
        let later = t0 + Duration::from_secs(10);
        let candidates = w.timeout_candidates(later, Duration::from_millis(100));
        assert!(!candidates.contains(&1180));
        assert!(candidates.contains(&0));
    }
}
