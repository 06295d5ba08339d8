//! Single-threaded event loop mode (§5: "a build-time or config flag...
//! must not change observable semantics, only latency/CPU trade-offs").
//!
//! One thread, non-blocking sockets, round-robin polling: accept, frame
//! parsing, dedup, journal write, and the stats deadline all run inline
//! with no cross-thread handoff at all. There is no ring buffer here:
//! with a single thread there is nothing to hand work off to.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup::DedupFilter;
use crate::error::{DigitsError, Result};
use crate::frame::{FrameEvent, FrameParser};
use crate::stats::Stats;

const POLL_IDLE: Duration = Duration::from_millis(1);
const REPORT_PERIOD: Duration = Duration::from_secs(10);

struct Client {
    stream: TcpStream,
    parser: FrameParser,
    halted: bool,
}

/// Runs the server to completion on the calling thread. Returns once a
/// `terminate` line is received or `stop` is externally set (e.g. by a
/// signal handler installed by the caller).
pub fn run(config: Config, stop: Arc<AtomicBool>) -> Result<()> {
    run_with_bound_hook(config, stop, |_addr| {})
}

/// Same as [`run`], but invokes `on_bound` with the listener's actual
/// address once bound - used by tests that need `config.port == 0` to
/// resolve to a real port before connecting.
pub fn run_with_bound_hook(
    config: Config,
    stop: Arc<AtomicBool>,
    on_bound: impl FnOnce(SocketAddr),
) -> Result<()> {
    let journal_path = config.journal_path();
    let file = File::create(&journal_path)
        .map_err(|source| DigitsError::JournalOpen { path: journal_path.clone(), source })?;
    let mut writer = BufWriter::new(file);
    let mut filter = DedupFilter::new();
    let stats = Stats::new();

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).map_err(|source| DigitsError::Bind { addr, source })?;
    listener.set_nonblocking(true)?;
    let bound_addr = listener.local_addr().map_err(DigitsError::Io)?;
    info!(%bound_addr, "single-threaded server listening");
    on_bound(bound_addr);

    let mut clients: HashMap<usize, Client> = HashMap::new();
    let mut next_id: usize = 0;
    let mut deadline = Instant::now() + REPORT_PERIOD;

    while !stop.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, "accepted connection");
                stream.set_nonblocking(true)?;
                let _ = stream.set_nodelay(true);
                clients.insert(next_id, Client { stream, parser: FrameParser::new(), halted: false });
                next_id += 1;
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => warn!(%err, "accept failed"),
        }

        let mut batch_received: u64 = 0;
        let mut batch_duplicates: u64 = 0;
        let mut to_remove = Vec::new();

        for (&id, client) in clients.iter_mut() {
            if client.halted {
                to_remove.push(id);
                continue;
            }

            let mut buf = [0u8; 4096];
            match client.stream.read(&mut buf) {
                Ok(0) => to_remove.push(id),
                Ok(n) => {
                    let parser = &mut client.parser;
                    let halted = parser.feed(&buf[..n], |event| match event {
                        FrameEvent::ValidDigits(frame) => {
                            batch_received += 1;
                            if let Some(value) = parse_digits(&frame) {
                                if filter.test_and_set(value) {
                                    let _ = writer.write_all(&frame).and_then(|_| writer.write_all(b"\n"));
                                } else {
                                    batch_duplicates += 1;
                                }
                            }
                        }
                        FrameEvent::Terminate => {
                            stop.store(true, Ordering::Release);
                        }
                        FrameEvent::InvalidFrame => {
                            warn!("invalid frame, closing connection");
                        }
                    });
                    if halted {
                        client.halted = true;
                        to_remove.push(id);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
                Err(_) => to_remove.push(id),
            }
        }

        for id in to_remove {
            clients.remove(&id);
        }

        if batch_received > 0 {
            let _ = writer.flush();
            stats.add(batch_received, batch_duplicates);
        }

        let now = Instant::now();
        if now >= deadline {
            let (received, duplicates) = stats.tick();
            println!("received {received} numbers, {duplicates} duplicates");
            deadline += REPORT_PERIOD;
        }

        std::thread::sleep(POLL_IDLE);
    }

    let _ = writer.flush();
    Ok(())
}

fn parse_digits(frame: &[u8; 9]) -> Option<u32> {
    let mut value: u32 = 0;
    for &b in frame {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (b - b'0') as u32;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn parse_digits_rejects_non_digit_bytes() {
        assert_eq!(parse_digits(b"000000123"), Some(123));
        assert_eq!(parse_digits(b"0000000!0"), None);
    }

    #[test]
    fn journals_unique_values_and_stops_on_terminate() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            port: 0,
            journal_directory: dir.path().to_path_buf(),
            single_threaded: true,
            ..Config::default()
        };
        let stop = Arc::new(AtomicBool::new(false));

        let (addr_tx, addr_rx) = mpsc::channel();
        let run_stop = stop.clone();
        let handle = thread::spawn(move || {
            run_with_bound_hook(config, run_stop, move |addr| {
                let _ = addr_tx.send(addr);
            })
        });

        let addr = addr_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"000000001\n000000001\nterminate\n").unwrap();
        drop(stream);

        handle.join().unwrap().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("numbers.log")).unwrap();
        assert_eq!(contents, "000000001\n");
    }
}
