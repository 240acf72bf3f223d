mod engine;
mod transport;

pub use engine::{HandleOutcome, ReceiverEngine, Stats as ReceiverStats};
pub use transport::{run, ReceiverConfig};
