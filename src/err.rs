#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid server address: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("input file not found: {0}")]
    MissingInputFile(std::path::PathBuf),

    #[error("failed to connect to server after {0} request retries")]
    RequestRetriesExhausted(u32),

    #[error("no progress {0:?} after EOF; abandoning transfer")]
    EofGraceExhausted(std::time::Duration),

    #[error("idle for {0:?} with no data from sender; abandoning transfer")]
    IdleTimeout(std::time::Duration),
}
