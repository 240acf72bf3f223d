use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rudp::config::{Variant, MSS};
use rudp::sender::{run, SenderConfig};

/// Reliable-UDP bulk sender: waits for a single request, then streams
/// `data.txt` to the requester under sliding-window ARQ.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Local address to bind and listen for a connection request on.
    server_ip: String,

    /// Local port to bind.
    server_port: u16,

    /// Fixed send window size in bytes (variant A only; ignored under
    /// variant B, where the congestion window paces transmission).
    sws_bytes: Option<u32>,

    /// Selects the congestion-control discipline.
    #[arg(long, value_enum, default_value = "a")]
    variant: CliVariant,

    /// Optional path to append a CSV cwnd/ssthresh/phase trace to
    /// (variant B only).
    #[arg(long)]
    cwnd_trace: Option<PathBuf>,

    /// Input file to transfer.
    #[arg(long, default_value = "data.txt")]
    input: PathBuf,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum CliVariant {
    A,
    B,
}

impl From<CliVariant> for Variant {
    fn from(v: CliVariant) -> Self {
        match v {
            CliVariant::A => Variant::A,
            CliVariant::B => Variant::B,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let bind_addr: SocketAddr = match format!("{}:{}", args.server_ip, args.server_port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid bind address");
            std::process::exit(1);
        }
    };

    let variant: Variant = args.variant.into();
    let sws = args.sws_bytes.unwrap_or(16 * MSS as u32);

    let cfg = SenderConfig {
        bind_addr,
        input_path: args.input,
        variant,
        sws,
        cwnd_trace_path: args.cwnd_trace,
    };

    if let Err(e) = run(cfg) {
        tracing::error!(error = %e, "sender exited with an error");
        std::process::exit(1);
    }
}
