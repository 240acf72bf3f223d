//! Unified per-transfer sender state: window + RTT estimator + (variant B)
//! congestion controller. This is the object the sender mutex guards (spec
//! §5) — `tick` drives admission, `handle_ack` drives the ACK path, and
//! `timeout_scan` drives the retransmit timer, mirroring the three
//! responsibilities the teacher crate folds into `TCB::on_tick` /
//! `TCB::on_segment` in `tcp/tcb.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{Variant, EOF_MARKER, TRIPLE_DUP_ACK_THRESHOLD, VARIANT_A_SACK_RETRANSMIT_CAP};
use crate::wire::SackBlock;

use super::congestion::{CongestionController, Phase};
use super::rtt::RttEstimator;
use super::window::SendWindow;

#[derive(Debug, Default, Clone, Copy)]
pub struct Stats {
    pub segments_sent: u64,
    pub retransmits: u64,
    pub fast_retransmits: u64,
    pub timeouts: u64,
}

/// Outcome of feeding one incoming ACK datagram to the sender.
#[derive(Debug, Default)]
pub struct AckOutcome {
    pub retransmit: Vec<u32>,
    pub complete: bool,
}

pub struct SenderCore {
    window: SendWindow,
    rtt: RttEstimator,
    congestion: Option<CongestionController>,
    sws: u32,
    variant: Variant,
    stats: Stats,
    start: Instant,
    /// (elapsed, cwnd) samples taken on every congestion-window change,
    /// variant B only (spec §9 supplemented cwnd trace).
    cwnd_trace: Vec<(Duration, u32)>,
}

impl SenderCore {
    pub fn new(file: Arc<Vec<u8>>, variant: Variant, sws: u32) -> Self {
        let congestion = match variant {
            Variant::A => None,
            Variant::B => Some(CongestionController::new()),
        };
        SenderCore {
            window: SendWindow::new(file),
            rtt: RttEstimator::new(variant.rto_bounds()),
            congestion,
            sws,
            variant,
            stats: Stats::default(),
            start: Instant::now(),
            cwnd_trace: Vec::new(),
        }
    }

    pub fn cwnd_trace(&self) -> &[(Duration, u32)] {
        &self.cwnd_trace
    }

    fn record_cwnd_sample(&mut self, now: Instant) {
        if let Some(cc) = &self.congestion {
            self.cwnd_trace.push((now.duration_since(self.start), cc.cwnd()));
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn is_complete(&self) -> bool {
        self.window.is_complete()
    }

    pub fn rto(&self) -> Duration {
        self.rtt.rto()
    }

    /// Current congestion-window-or-fixed-SWS cap (spec §4.3).
    fn cap(&self) -> u32 {
        match &self.congestion {
            Some(cc) => cc.cwnd(),
            None => self.sws,
        }
    }

    /// cwnd/ssthresh/phase snapshot, for the variant-B trace log. `None`
    /// under variant A.
    pub fn congestion_snapshot(&self) -> Option<(u32, u32, Phase)> {
        self.congestion
            .as_ref()
            .map(|cc| (cc.cwnd(), cc.ssthresh(), cc.phase()))
    }

    /// Admission pass: cut and record any newly admissible segments,
    /// returning their offsets for the caller to transmit.
    pub fn tick(&mut self, now: Instant) -> Vec<u32> {
        let admitted = self.window.admit(self.cap(), now);
        self.stats.segments_sent += admitted.len() as u64;
        if !admitted.is_empty() {
            self.record_cwnd_sample(now);
        }
        admitted
    }

    pub fn payload(&self, offset: u32) -> &[u8] {
        self.window.payload(offset)
    }

    pub fn eof_sent(&self) -> bool {
        self.window.eof_sent()
    }

    pub fn send_base(&self) -> u32 {
        self.window.send_base()
    }

    /// Feed one decoded ACK datagram through window/RTT/congestion state.
    pub fn handle_ack(&mut self, ack: u32, sacks: Vec<SackBlock>, now: Instant) -> AckOutcome {
        let send_base = self.window.send_base();

        if ack > send_base {
            let effect = self.window.handle_cumulative_ack(ack, sacks, now);
            if let Some(sample) = effect.rtt_sample {
                self.rtt.sample(sample);
            }
            if let Some(cc) = &mut self.congestion {
                cc.on_new_ack(ack, effect.bytes_acked);
            }
            self.record_cwnd_sample(now);
            return AckOutcome {
                retransmit: Vec::new(),
                complete: effect.eof_acked,
            };
        }

        if ack < send_base {
            // Stale ACK from a reordered or duplicated datagram; the
            // cumulative value no longer matches send_base, so it does not
            // count toward dup_ack_count (spec §4.5).
            return AckOutcome::default();
        }

        // Duplicate ACK: cumulative value equals send_base.
        self.window.handle_cumulative_ack(send_base, sacks, now);
        let count = self.window.record_duplicate_ack();

        let mut retransmit = Vec::new();
        if count == TRIPLE_DUP_ACK_THRESHOLD {
            if !self.window.is_sacked(send_base) && self.window.payload_exists(send_base) {
                retransmit.push(send_base);
            }

            let mut holes = self.window.sack_hole_candidates(now, self.rtt.rto());
            holes.retain(|offset| *offset != send_base);
            if self.variant == Variant::A {
                holes.truncate(VARIANT_A_SACK_RETRANSMIT_CAP);
            }
            retransmit.extend(holes);

            if let Some(cc) = &mut self.congestion {
                cc.on_triple_dup_ack(self.window.next_seq());
            }
            self.stats.fast_retransmits += 1;
        } else if count > TRIPLE_DUP_ACK_THRESHOLD {
            if let Some(cc) = &mut self.congestion {
                cc.on_additional_dup_ack();
            }
        }

        for &offset in &retransmit {
            self.window.mark_retransmitted(offset, now);
        }
        self.stats.retransmits += retransmit.len() as u64;

        AckOutcome {
            retransmit,
            complete: false,
        }
    }

    /// Timeout scan: any segment whose timer has expired and isn't SACKed
    /// is retransmitted; a timeout is a congestion event under variant B.
    pub fn timeout_scan(&mut self, now: Instant) -> Vec<u32> {
        let expired = self.window.timeout_candidates(now, self.rtt.rto());
        if expired.is_empty() {
            return expired;
        }

        self.rtt.backoff();
        if let Some(cc) = &mut self.congestion {
            cc.on_timeout();
        }
        for &offset in &expired {
            self.window.mark_retransmitted(offset, now);
        }
        self.stats.timeouts += expired.len() as u64;
        expired
    }
}

/// True if `payload` is the EOF sentinel rather than file bytes.
pub fn is_eof_payload(payload: &[u8]) -> bool {
    payload == EOF_MARKER
}
