//! Sender transport loop (spec §4.3, §4.7, §5). Two threads share a single
//! mutex-guarded `SenderCore`: a receive thread performs blocking ACK reads
//! with a bounded deadline, and the main thread alternates admission and
//! timeout scanning. Grounded in the teacher crate's single `segment_loop`
//! (`src/lib.rs`) and the original Python sender's threading split
//! (`original_source/part1/p1_server.py`, `part2/p2_server.py`: a reader
//! thread plus a main send loop).

use std::fs::{self, File};
use std::io::Write;
use std::net::{SocketAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::{
    self, Variant, EOF_GRACE, POST_COMPLETE_LINGER, SENDER_POLL_INTERVAL, SENDER_RECV_DEADLINE,
};
use crate::err::Error;
use crate::wire::{decode_ack, encode_data};

use super::core::{is_eof_payload, SenderCore, Stats};

pub struct SenderConfig {
    pub bind_addr: SocketAddr,
    pub input_path: PathBuf,
    pub variant: Variant,
    /// Fixed send window size in bytes (variant A only; ignored for B).
    pub sws: u32,
    /// When set (variant B), each congestion-state change is appended here
    /// as a CSV row (spec §9 supplemented cwnd trace).
    pub cwnd_trace_path: Option<PathBuf>,
}

/// Block until a request datagram carrying the expected variant byte
/// arrives, returning the requester's address (spec §4.2 "Initiation",
/// server side).
fn await_request(socket: &UdpSocket, variant: Variant) -> Result<SocketAddr, Error> {
    let mut buf = [0u8; 1];
    loop {
        let (n, from) = socket.recv_from(&mut buf)?;
        if n == 1 && buf[0] == variant.request_byte() {
            return Ok(from);
        }
    }
}

fn append_cwnd_trace(trace: &Mutex<Option<File>>, elapsed_ms: u128, core: &SenderCore) {
    let Some((cwnd, ssthresh, phase)) = core.congestion_snapshot() else {
        return;
    };
    let mut guard = trace.lock().unwrap();
    if let Some(file) = guard.as_mut() {
        let _ = writeln!(file, "{elapsed_ms},{cwnd},{ssthresh},{phase:?}");
    }
}

fn receive_loop(
    socket: UdpSocket,
    addr: SocketAddr,
    core: Arc<Mutex<SenderCore>>,
    trace: Arc<Mutex<Option<File>>>,
    start: Instant,
    complete: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
) {
    let mut buf = [0u8; config::MAX_DATAGRAM];
    loop {
        if stop.load(Ordering::Acquire) {
            return;
        }
        match socket.recv_from(&mut buf) {
            Ok((n, from)) if from == addr => {
                let Some((ack, sacks)) = decode_ack(&buf[..n]) else {
                    continue;
                };
                let now = Instant::now();
                let mut guard = core.lock().unwrap();
                let outcome = guard.handle_ack(ack, sacks, now);
                for &offset in &outcome.retransmit {
                    let packet = encode_data(offset, guard.payload(offset));
                    let _ = socket.send_to(&packet, addr);
                    debug!(offset, "retransmitted on duplicate ACK");
                }
                append_cwnd_trace(&trace, now.duration_since(start).as_millis(), &guard);
                if outcome.complete {
                    complete.store(true, Ordering::Release);
                    return;
                }
            }
            Ok(_) => continue,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                if complete.load(Ordering::Acquire) {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "receive thread exiting on socket error");
                return;
            }
        }
    }
}

pub fn run(cfg: SenderConfig) -> Result<Stats, Error> {
    if !cfg.input_path.is_file() {
        return Err(Error::MissingInputFile(cfg.input_path));
    }
    let file = Arc::new(fs::read(&cfg.input_path)?);
    info!(bytes = file.len(), path = %cfg.input_path.display(), "loaded input file");

    let socket = UdpSocket::bind(cfg.bind_addr)?;
    info!(addr = %cfg.bind_addr, "waiting for a connection request");
    let client_addr = await_request(&socket, cfg.variant)?;
    info!(client = %client_addr, variant = ?cfg.variant, "accepted connection");

    let core = Arc::new(Mutex::new(SenderCore::new(file, cfg.variant, cfg.sws)));
    let complete = Arc::new(AtomicBool::new(false));
    let stop = Arc::new(AtomicBool::new(false));
    let trace = Arc::new(Mutex::new(
        cfg.cwnd_trace_path
            .as_ref()
            .map(File::create)
            .transpose()?,
    ));
    if let Some(file) = trace.lock().unwrap().as_mut() {
        let _ = writeln!(file, "elapsed_ms,cwnd,ssthresh,phase");
    }

    let start = Instant::now();

    socket.set_read_timeout(Some(SENDER_RECV_DEADLINE))?;
    let receive_socket = socket.try_clone()?;
    let receive_handle = {
        let core = core.clone();
        let trace = trace.clone();
        let complete = complete.clone();
        let stop = stop.clone();
        thread::spawn(move || receive_loop(receive_socket, client_addr, core, trace, start, complete, stop))
    };

    let mut last_progress = Instant::now();
    let mut eof_sent_at: Option<Instant> = None;
    let mut last_send_base = 0u32;
    let mut abort: Option<Error> = None;

    loop {
        let now = Instant::now();
        {
            let mut guard = core.lock().unwrap();
            let admitted = guard.tick(now);
            for &offset in &admitted {
                let payload = guard.payload(offset);
                if is_eof_payload(payload) {
                    debug!(offset, "sending EOF pseudo-segment");
                }
                let packet = encode_data(offset, payload);
                let _ = socket.send_to(&packet, client_addr);
            }

            let expired = guard.timeout_scan(now);
            for &offset in &expired {
                let packet = encode_data(offset, guard.payload(offset));
                let _ = socket.send_to(&packet, client_addr);
                debug!(offset, "retransmitted on timeout");
            }

            append_cwnd_trace(&trace, now.duration_since(start).as_millis(), &guard);

            if guard.eof_sent() && eof_sent_at.is_none() {
                eof_sent_at = Some(now);
            }
            let send_base = guard.send_base();
            if send_base != last_send_base {
                last_send_base = send_base;
                last_progress = now;
            }
        }

        if complete.load(Ordering::Acquire) {
            break;
        }

        if eof_sent_at.is_some() && now.duration_since(last_progress) > EOF_GRACE {
            warn!("no progress after EOF; abandoning transfer");
            abort = Some(Error::EofGraceExhausted(EOF_GRACE));
            break;
        }

        thread::sleep(SENDER_POLL_INTERVAL);
    }

    stop.store(true, Ordering::Release);
    thread::sleep(POST_COMPLETE_LINGER);
    let _ = receive_handle.join();

    if let Some(err) = abort {
        return Err(err);
    }

    let stats = core.lock().unwrap().stats();
    info!(
        segments_sent = stats.segments_sent,
        retransmits = stats.retransmits,
        fast_retransmits = stats.fast_retransmits,
        timeouts = stats.timeouts,
        "transfer complete"
    );
    Ok(stats)
}
