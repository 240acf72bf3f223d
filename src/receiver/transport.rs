//! Receiver transport loop (spec §4.2, §5). Single-threaded: one socket, one
//! blocking receive loop with a bounded read deadline, driving the in-order
//! delivery engine and an output sink. Grounded in the teacher crate's
//! connect/read loop shape (`src/bin/client.rs`) and in the original
//! Python receiver's `run()` (`part1/p1_client.py`, `part2/p2_client.py`).

use std::fs::File;
use std::io::Write;
use std::net::{SocketAddr, UdpSocket};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{
    self, RECEIVER_IDLE_TIMEOUT, RECEIVER_READ_DEADLINE, REQUEST_RETRIES, REQUEST_RETRY_TIMEOUT,
    Variant,
};
use crate::err::Error;
use crate::wire::{decode_data, encode_ack};

use super::engine::{ReceiverEngine, Stats};

pub struct ReceiverConfig {
    pub server_addr: SocketAddr,
    pub prefix: String,
    pub variant: Variant,
}

/// Send the request byte and await the first data segment, retrying up to
/// `REQUEST_RETRIES` times on timeout (spec §4.2 "Initiation").
fn connect(socket: &UdpSocket, cfg: &ReceiverConfig) -> Result<Vec<u8>, Error> {
    socket.set_read_timeout(Some(REQUEST_RETRY_TIMEOUT))?;

    let mut buf = [0u8; config::MAX_DATAGRAM];
    for attempt in 1..=REQUEST_RETRIES {
        debug!(attempt, "sending connection request");
        socket.send_to(&[cfg.variant.request_byte()], cfg.server_addr)?;

        match socket.recv_from(&mut buf) {
            Ok((n, from)) if from == cfg.server_addr => {
                info!("request acknowledged by server");
                return Ok(buf[..n].to_vec());
            }
            Ok(_) => continue,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(Error::RequestRetriesExhausted(REQUEST_RETRIES))
}

fn send_ack(socket: &UdpSocket, addr: SocketAddr, ack: &(u32, Vec<crate::wire::SackBlock>), copies: u32) {
    let packet = encode_ack(ack.0, &ack.1);
    for _ in 0..copies {
        let _ = socket.send_to(&packet, addr);
    }
}

fn final_ack_burst(socket: &UdpSocket, addr: SocketAddr, engine: &ReceiverEngine) {
    let (cum, sacks) = engine.final_ack();
    let packet = encode_ack(cum, &sacks);
    for _ in 0..config::FINAL_ACK_BURST {
        let _ = socket.send_to(&packet, addr);
        std::thread::sleep(config::FINAL_ACK_SPACING);
    }
}

#[allow(clippy::too_many_arguments)]
fn dispatch(
    engine: &mut ReceiverEngine,
    socket: &UdpSocket,
    addr: SocketAddr,
    output: &mut File,
    offset: u32,
    payload: &[u8],
) -> Result<bool, Error> {
    let outcome = engine.handle_packet(offset, payload);
    if !outcome.to_write.is_empty() {
        output.write_all(&outcome.to_write)?;
        output.flush()?;
    }
    send_ack(socket, addr, &outcome.ack, outcome.ack_copies);
    Ok(outcome.complete)
}

pub fn run(cfg: ReceiverConfig) -> Result<Stats, Error> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    let first_packet = connect(&socket, &cfg)?;

    let output_path = format!("{}received_data.txt", cfg.prefix);
    let mut output = File::create(&output_path)?;
    info!(path = %output_path, "receiving file");

    let mut engine = ReceiverEngine::new();

    if let Some((offset, payload)) = decode_data(&first_packet) {
        if dispatch(&mut engine, &socket, cfg.server_addr, &mut output, offset, payload)? {
            final_ack_burst(&socket, cfg.server_addr, &engine);
            info!("transfer complete");
            return Ok(engine.stats());
        }
    }

    socket.set_read_timeout(Some(RECEIVER_READ_DEADLINE))?;
    let mut last_activity = Instant::now();
    let mut buf = [0u8; config::MAX_DATAGRAM];

    loop {
        match socket.recv_from(&mut buf) {
            Ok((n, from)) if from == cfg.server_addr => {
                last_activity = Instant::now();
                let Some((offset, payload)) = decode_data(&buf[..n]) else {
                    continue;
                };
                if dispatch(&mut engine, &socket, cfg.server_addr, &mut output, offset, payload)? {
                    final_ack_burst(&socket, cfg.server_addr, &engine);
                    break;
                }
            }
            Ok(_) => continue,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if last_activity.elapsed() > RECEIVER_IDLE_TIMEOUT {
                    warn!("idle timeout waiting for sender");
                    return Err(Error::IdleTimeout(RECEIVER_IDLE_TIMEOUT));
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let stats = engine.stats();
    info!(
        bytes_written = stats.bytes_written,
        packets = stats.packets_received,
        duplicates = stats.duplicate_packets,
        out_of_order = stats.out_of_order_packets,
        "transfer complete"
    );
    Ok(stats)
}
