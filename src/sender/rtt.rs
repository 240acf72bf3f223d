//! RTT/RTO estimation (spec §4.4). Jacobson/Karn algorithm, generalized
//! from the teacher crate's `tcp/tcb.rs` `compute_rto` (itself SRTT/RTTVAR
//! with α=1/8, β=1/4) to this protocol's variant-dependent RTO bounds and
//! exponential timeout backoff, following both
//! `original_source/part1/p1_server.py` and `part2/p2_server.py`'s
//! `update_rto`.

use std::time::Duration;

const ALPHA: f64 = 0.125;
const BETA: f64 = 0.25;

#[derive(Debug)]
pub struct RttEstimator {
    srtt: Option<Duration>,
    rttvar: Duration,
    rto: Duration,
    bounds: (Duration, Duration),
}

impl RttEstimator {
    pub fn new(bounds: (Duration, Duration)) -> Self {
        RttEstimator {
            srtt: None,
            rttvar: Duration::ZERO,
            rto: bounds.0,
            bounds,
        }
    }

    pub fn rto(&self) -> Duration {
        self.rto
    }

    fn clamp(&self, rto: Duration) -> Duration {
        rto.clamp(self.bounds.0, self.bounds.1)
    }

    /// Fold in a fresh RTT sample (already filtered for Karn's rule by the
    /// caller — retransmitted segments must never reach here).
    pub fn sample(&mut self, r: Duration) {
        match self.srtt {
            None => {
                self.srtt = Some(r);
                self.rttvar = r / 2;
            }
            Some(srtt) => {
                let diff = if r > srtt { r - srtt } else { srtt - r };
                self.rttvar = self.rttvar.mul_f64(1.0 - BETA) + diff.mul_f64(BETA);
                self.srtt = Some(srtt.mul_f64(1.0 - ALPHA) + r.mul_f64(ALPHA));
            }
        }
        let srtt = self.srtt.unwrap();
        self.rto = self.clamp(srtt + self.rttvar * 4);
    }

    /// Exponential backoff on timeout, preserving the estimator for the
    /// next valid sample (spec §4.4 "On timeout retransmit, double rto").
    pub fn backoff(&mut self) {
        self.rto = self.clamp(self.rto * 2);
    }
}
