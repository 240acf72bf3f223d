//! TCP-Reno-style congestion control for variant B (spec §4.6). A tagged
//! union for the controller's phase, generalized from the teacher crate's
//! boolean `in_slow_start`/`in_fast_recovery` flags in `tcp/tcb.rs`
//! (`congestion_control`) — those flags admit a state no transition table
//! reaches (slow start *and* fast recovery at once); an enum cannot.

use crate::config::MSS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SlowStart,
    CongestionAvoidance,
    FastRecovery { recovery_point: u32 },
}

#[derive(Debug)]
pub struct CongestionController {
    cwnd: u32,
    ssthresh: u32,
    phase: Phase,
}

impl CongestionController {
    pub fn new() -> Self {
        CongestionController {
            cwnd: MSS as u32,
            ssthresh: 64_000,
            phase: Phase::SlowStart,
        }
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// A new cumulative ACK (not a duplicate) landed, acknowledging
    /// `bytes_acked` fresh bytes up to `ack`.
    pub fn on_new_ack(&mut self, ack: u32, bytes_acked: u32) {
        match self.phase {
            Phase::FastRecovery { recovery_point } => {
                if ack >= recovery_point {
                    self.cwnd = self.ssthresh;
                    self.phase = Phase::CongestionAvoidance;
                }
            }
            Phase::SlowStart => {
                self.cwnd += bytes_acked;
                if self.cwnd >= self.ssthresh {
                    self.phase = Phase::CongestionAvoidance;
                }
            }
            Phase::CongestionAvoidance => {
                let growth = (MSS as u64 * bytes_acked as u64) / self.cwnd.max(1) as u64;
                self.cwnd += growth.max(1) as u32;
            }
        }
    }

    /// The 3rd duplicate ACK for the current `send_base` landed —
    /// fast retransmit the hole and enter Fast Recovery.
    pub fn on_triple_dup_ack(&mut self, next_seq: u32) {
        self.ssthresh = (self.cwnd / 2).max(2 * MSS as u32);
        self.cwnd = self.ssthresh + 3 * MSS as u32;
        self.phase = Phase::FastRecovery {
            recovery_point: next_seq,
        };
    }

    /// A 4th, 5th, ... duplicate ACK while already in Fast Recovery.
    pub fn on_additional_dup_ack(&mut self) {
        if matches!(self.phase, Phase::FastRecovery { .. }) {
            self.cwnd += MSS as u32;
        }
    }

    /// RTO expired: halve (floored) into slow start.
    pub fn on_timeout(&mut self) {
        self.ssthresh = (self.cwnd / 2).max(2 * MSS as u32);
        self.cwnd = MSS as u32;
        self.phase = Phase::SlowStart;
    }
}

impl Default for CongestionController {
    fn default() -> Self {
        Self::new()
    }
}
