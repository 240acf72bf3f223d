//! Shared test scaffolding: an in-process UDP relay that sits between a
//! sender and a receiver so integration tests can inject loss, duplication,
//! and delay without touching protocol code. Mirrors the "thin loss shim"
//! approach the original Python harness used for its own experiments
//! (`original_source/part1/p1_exp.py` drives client/server pairs with
//! scripted network conditions).

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rudp::config::MAX_DATAGRAM;
use rudp::wire::{decode_ack, decode_data};

/// Per-direction fault applied to a forwarded datagram.
pub enum Fault {
    Forward,
    Drop,
    Delay(Duration),
}

pub type FaultFn = Box<dyn Fn(&[u8]) -> Fault + Send>;

pub fn forward_all() -> FaultFn {
    Box::new(|_| Fault::Forward)
}

/// Bind an ephemeral port, read it back, and release it immediately so a
/// test can hand the same port number to a `SenderConfig` a moment later.
pub fn pick_port() -> u16 {
    UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Drop every datagram whose decoded data offset is in `offsets`, but only
/// the first `times` occurrences of each — simulating a single lost
/// segment that a later retransmission successfully delivers.
pub fn drop_offsets_once(offsets: Vec<u32>) -> FaultFn {
    let remaining: Mutex<std::collections::HashMap<u32, u32>> =
        Mutex::new(offsets.into_iter().map(|o| (o, 1)).collect());
    Box::new(move |datagram: &[u8]| {
        if let Some((offset, _)) = decode_data(datagram) {
            let mut remaining = remaining.lock().unwrap();
            if let Some(count) = remaining.get_mut(&offset) {
                if *count > 0 {
                    *count -= 1;
                    return Fault::Drop;
                }
            }
        }
        Fault::Forward
    })
}

/// Drop the EOF pseudo-segment (`payload == "EOF"`) the first `times` times
/// it is forwarded.
pub fn drop_eof_times(times: u32) -> FaultFn {
    let remaining = Mutex::new(times);
    Box::new(move |datagram: &[u8]| {
        if let Some((_, payload)) = decode_data(datagram) {
            if payload == b"EOF" {
                let mut remaining = remaining.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Fault::Drop;
                }
            }
        }
        Fault::Forward
    })
}

/// Drop the first ACK carrying cumulative value `ack_value` — simulating
/// the one pending ACK for a segment going missing so the sender must
/// time out and retransmit (spec boundary scenario 3).
pub fn drop_ack_value_once(ack_value: u32) -> FaultFn {
    let dropped = Mutex::new(false);
    Box::new(move |datagram: &[u8]| {
        if let Some((cum, _)) = decode_ack(datagram) {
            if cum == ack_value {
                let mut dropped = dropped.lock().unwrap();
                if !*dropped {
                    *dropped = true;
                    return Fault::Drop;
                }
            }
        }
        Fault::Forward
    })
}

/// Delay the very first data segment's delivery, so at least one later
/// segment overtakes it at the receiver (spec boundary scenario 5).
pub fn delay_first_segment(delay: Duration) -> FaultFn {
    let fired = Mutex::new(false);
    Box::new(move |datagram: &[u8]| {
        if let Some((offset, _)) = decode_data(datagram) {
            if offset == 0 {
                let mut fired = fired.lock().unwrap();
                if !*fired {
                    *fired = true;
                    return Fault::Delay(delay);
                }
            }
        }
        Fault::Forward
    })
}

/// A relay that receivers connect to in place of the real sender. Forwards
/// datagrams bidirectionally, applying `to_sender` / `to_receiver` faults.
pub struct Relay {
    pub client_facing_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl Relay {
    pub fn start(sender_addr: SocketAddr, to_sender: FaultFn, to_receiver: FaultFn) -> Relay {
        let client_facing = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender_facing = UdpSocket::bind("127.0.0.1:0").unwrap();
        client_facing
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        sender_facing
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let client_facing_addr = client_facing.local_addr().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let client_addr: Arc<Mutex<Option<SocketAddr>>> = Arc::new(Mutex::new(None));

        let h1 = {
            let sock = client_facing.try_clone().unwrap();
            let out = sender_facing.try_clone().unwrap();
            let stop = stop.clone();
            let client_addr = client_addr.clone();
            thread::spawn(move || {
                let mut buf = [0u8; MAX_DATAGRAM];
                while !stop.load(Ordering::Acquire) {
                    let Ok((n, from)) = sock.recv_from(&mut buf) else {
                        continue;
                    };
                    *client_addr.lock().unwrap() = Some(from);
                    forward(&out, sender_addr, &buf[..n], &to_sender);
                }
            })
        };

        let h2 = {
            let sock = sender_facing.try_clone().unwrap();
            let out = client_facing.try_clone().unwrap();
            let stop = stop.clone();
            let client_addr = client_addr.clone();
            thread::spawn(move || {
                let mut buf = [0u8; MAX_DATAGRAM];
                while !stop.load(Ordering::Acquire) {
                    let Ok((n, _from)) = sock.recv_from(&mut buf) else {
                        continue;
                    };
                    let Some(dst) = *client_addr.lock().unwrap() else {
                        continue;
                    };
                    forward(&out, dst, &buf[..n], &to_receiver);
                }
            })
        };

        Relay {
            client_facing_addr,
            stop,
            handles: vec![h1, h2],
        }
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Release);
        for h in self.handles.drain(..) {
            let _ = h.join();
        }
    }
}

fn forward(socket: &UdpSocket, dst: SocketAddr, datagram: &[u8], fault: &FaultFn) {
    match fault(datagram) {
        Fault::Forward => {
            let _ = socket.send_to(datagram, dst);
        }
        Fault::Drop => {}
        Fault::Delay(d) => {
            let socket = socket.try_clone().unwrap();
            let datagram = datagram.to_vec();
            thread::spawn(move || {
                thread::sleep(d);
                let _ = socket.send_to(&datagram, dst);
            });
        }
    }
}
