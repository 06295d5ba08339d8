//! Acceptor and Concurrency Gate (C7, §4.7).
//!
//! One dedicated acceptor thread owns the listening socket and hands
//! accepted connections to a fixed pool of worker threads through a
//! shared queue - `std::sync::mpsc::Receiver` is single-consumer only,
//! so the pool shares it behind a mutex.

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use socket2::{SockRef, TcpKeepalive};
use tracing::{debug, info, warn};

use crate::connection::handle_connection;
use crate::journal::JournalProducer;

/// Registry of live connections so shutdown can force-close idle
/// blocking reads rather than waiting for clients to disconnect.
#[derive(Default)]
pub struct ConnectionRegistry {
    streams: Mutex<Vec<TcpStream>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, stream: &TcpStream) {
        if let Ok(clone) = stream.try_clone() {
            self.streams.lock().unwrap().push(clone);
        }
    }

    /// Force every registered connection to stop, unblocking any thread
    /// parked in a blocking `read`.
    pub fn shutdown_all(&self) {
        for stream in self.streams.lock().unwrap().drain(..) {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    let sock_ref = SockRef::from(stream);
    let keepalive = TcpKeepalive::new().with_time(std::time::Duration::from_secs(60));
    let _ = sock_ref.set_tcp_keepalive(&keepalive);
}

/// Spawns the acceptor thread and `worker_count` long-lived worker
/// threads. Returns their join handles; the caller waits on them as
/// part of server shutdown (C8).
pub fn spawn(
    listener: TcpListener,
    worker_count: usize,
    producer: Arc<JournalProducer>,
    registry: Arc<ConnectionRegistry>,
    shutdown_flag: Arc<AtomicBool>,
) -> Vec<thread::JoinHandle<()>> {
    let (tx, rx) = mpsc::channel::<TcpStream>();
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::with_capacity(worker_count + 1);

    let accept_shutdown = shutdown_flag.clone();
    let accept_registry = registry.clone();
    handles.push(thread::spawn(move || {
        listener
            .set_nonblocking(false)
            .expect("listener must support blocking accept");
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if accept_shutdown.load(Ordering::Acquire) {
                        let _ = stream.shutdown(std::net::Shutdown::Both);
                        break;
                    }
                    debug!(%addr, "accepted connection");
                    tune_socket(&stream);
                    accept_registry.register(&stream);
                    if tx.send(stream).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    if accept_shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    warn!(%err, "accept failed");
                }
            }
        }
        info!("acceptor thread stopped");
    }));

    for worker_id in 0..worker_count {
        let rx = rx.clone();
        let producer = producer.clone();
        let shutdown_flag = shutdown_flag.clone();
        handles.push(thread::spawn(move || loop {
            let stream = {
                let rx = rx.lock().unwrap();
                rx.recv()
            };
            match stream {
                Ok(stream) => handle_connection(stream, &producer, &shutdown_flag),
                Err(_) => break,
            }
            if shutdown_flag.load(Ordering::Acquire) {
                break;
            }
        }));
        debug!(worker_id, "worker thread started");
    }

    handles
}
