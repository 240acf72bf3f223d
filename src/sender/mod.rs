mod congestion;
mod core;
mod rtt;
mod transport;
mod window;

pub use core::{AckOutcome, SenderCore, Stats as SenderStats};
pub use transport::{run, SenderConfig};
