use std::time::Duration;

/// Maximum payload a single data segment may carry.
pub const MSS: usize = 1180;

/// Header size shared by data segments and ACKs.
pub const HEADER_SIZE: usize = 20;

/// Largest datagram the wire codec ever emits (header + MSS).
pub const MAX_DATAGRAM: usize = HEADER_SIZE + MSS;

pub const EOF_MARKER: &[u8] = b"EOF";

pub const REQUEST_BYTE_VARIANT_A: u8 = b'1';
pub const REQUEST_BYTE_VARIANT_B: u8 = b'R';

pub const REQUEST_RETRIES: u32 = 5;
pub const REQUEST_RETRY_TIMEOUT: Duration = Duration::from_secs(2);

pub const RECEIVER_READ_DEADLINE: Duration = Duration::from_millis(500);
pub const RECEIVER_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
pub const FINAL_ACK_BURST: usize = 5;
pub const FINAL_ACK_SPACING: Duration = Duration::from_millis(50);

pub const SENDER_POLL_INTERVAL: Duration = Duration::from_micros(100);
pub const SENDER_RECV_DEADLINE: Duration = Duration::from_millis(100);
pub const EOF_GRACE: Duration = Duration::from_secs(10);
pub const POST_COMPLETE_LINGER: Duration = Duration::from_millis(200);

pub const TRIPLE_DUP_ACK_THRESHOLD: u32 = 3;

/// Per-invocation cap on SACK-hole retransmits in variant A (§4.5, §9
/// open question (b) — an arbitrary throttle variant B drops entirely).
pub const VARIANT_A_SACK_RETRANSMIT_CAP: usize = 3;

/// Which congestion-control discipline paces the sender's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Fixed static send window (SWS), no congestion control.
    A,
    /// TCP Reno-style congestion window replaces the fixed SWS.
    B,
}

impl Variant {
    pub fn request_byte(self) -> u8 {
        match self {
            Variant::A => REQUEST_BYTE_VARIANT_A,
            Variant::B => REQUEST_BYTE_VARIANT_B,
        }
    }

    pub fn from_request_byte(byte: u8) -> Option<Self> {
        match byte {
            REQUEST_BYTE_VARIANT_A => Some(Variant::A),
            REQUEST_BYTE_VARIANT_B => Some(Variant::B),
            _ => None,
        }
    }

    pub fn rto_bounds(self) -> (Duration, Duration) {
        match self {
            Variant::A => (Duration::from_millis(100), Duration::from_secs(2)),
            Variant::B => (Duration::from_millis(200), Duration::from_secs(60)),
        }
    }
}
