use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use rudp::config::Variant;
use rudp::receiver::{run, ReceiverConfig};

/// Reliable-UDP bulk receiver: requests a transfer from a sender and
/// writes the reassembled byte stream to `{prefix}received_data.txt`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sender address to request a transfer from.
    server_ip: String,

    /// Sender port.
    server_port: u16,

    /// Output filename prefix, to let multiple receivers run against the
    /// same sender without clobbering each other's output.
    prefix: Option<String>,

    /// Selects the congestion-control discipline the sender expects.
    #[arg(long, value_enum, default_value = "a")]
    variant: CliVariant,
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

    let server_addr: SocketAddr = match format!("{}:{}", args.server_ip, args.server_port).parse()
    {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "invalid server address");
            std::process::exit(1);
        }
    };

    let cfg = ReceiverConfig {
        server_addr,
        prefix: args.prefix.unwrap_or_default(),
        variant: args.variant.into(),
    };

    if let Err(e) = run(cfg) {
        tracing::error!(error = %e, "receiver exited with an error");
        std::process::exit(1);
    }
}
