//! Server Lifecycle (C8, §4.8) and the embeddable [`ServerHandle`].

use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::info;

use crate::acceptor::{self, ConnectionRegistry};
use crate::config::Config;
use crate::error::{DigitsError, Result};
use crate::journal::{self, JournalProducer};
use crate::ring::{MpscRing, Notifier};
use crate::stats::{self, Stats};

/// A running server instance. Dropping or calling [`ServerHandle::stop`]
/// begins the shutdown sequence; [`ServerHandle::join`] blocks until
/// every thread has exited.
pub struct ServerHandle {
    stop: Arc<AtomicBool>,
    registry: Arc<ConnectionRegistry>,
    local_addr: std::net::SocketAddr,
    threads: Vec<thread::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Begins graceful shutdown (§4.8 steps 1-4): stop accepting new
    /// connections, unblock the acceptor's blocking accept, and force
    /// every live connection closed so workers unwind.
    pub fn stop(&self) {
        // The stop flag may already be set (e.g. a client sent
        // `terminate`); still perform the unblocking steps below, since
        // whichever side observes the flag first is the one responsible
        // for kicking the acceptor loose. Both steps are idempotent.
        self.stop.store(true, Ordering::Release);
        // Unblock the acceptor's blocking `accept()` with a throwaway
        // local connection; it observes the stop flag and exits.
        let _ = TcpStream::connect(self.local_addr);
        self.registry.shutdown_all();
    }

    /// Waits for every spawned thread to finish (§4.8 steps 5-7:
    /// consumer drains remaining claims, stats reporter stops, journal
    /// is flushed and closed when `self` is dropped).
    pub fn join(mut self) {
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Runs the full startup sequence from `config` and returns a handle to
/// the running server. Any failure here is startup-fatal (§4.8 step 0).
pub fn start(config: Config) -> Result<ServerHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let notifier = Arc::new(Notifier::new());
    let stats = Arc::new(Stats::new());
    let registry = Arc::new(ConnectionRegistry::new());

    let ring = Arc::new(MpscRing::new(config.ring_capacity)?);

    let journal_path = config.journal_path();
    let consumer_thread = journal::spawn_consumer(
        ring.clone(),
        notifier.clone(),
        stats.clone(),
        stop.clone(),
        config.wait_strategy,
        &journal_path,
    )?;

    let stats_thread = stats::spawn_reporter(stats.clone(), stop.clone());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .map_err(|source| DigitsError::Bind { addr, source })?;
    let local_addr = listener.local_addr().map_err(DigitsError::Io)?;

    let producer = Arc::new(JournalProducer::new(ring.clone(), notifier.clone(), stop.clone()));

    info!(%local_addr, worker_count = config.worker_count, "server listening");

    let mut threads = acceptor::spawn(listener, config.worker_count, producer, registry.clone(), stop.clone());
    threads.push(consumer_thread);
    threads.push(stats_thread);

    Ok(ServerHandle { stop, registry, local_addr, threads })
}

/// Installs a Ctrl-C/SIGTERM handler that triggers graceful shutdown,
/// then blocks until the server has fully stopped (§4.8: the
/// process-level entry point behavior used by `main`). Dispatches to the
/// single busy-poll thread of [`crate::single_threaded::run`] when
/// `config.single_threaded` is set (§5) - same observable behavior,
/// different concurrency model.
pub fn run_until_signal(config: Config) -> Result<()> {
    if config.single_threaded {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_signal = stop.clone();
        ctrlc::set_handler(move || {
            stop_for_signal.store(true, Ordering::Release);
        })
        .map_err(|err| DigitsError::config(format!("failed to install signal handler: {err}")))?;
        return crate::single_threaded::run(config, stop);
    }

    let handle = start(config)?;
    let stop_for_signal = handle.stop.clone();
    ctrlc::set_handler(move || {
        stop_for_signal.store(true, Ordering::Release);
    })
    .map_err(|err| DigitsError::config(format!("failed to install signal handler: {err}")))?;

    // ctrlc only flips the flag; this thread still owns unblocking the
    // acceptor and connection registry, so poll for the flag here too.
    while !handle.stop.load(Ordering::Acquire) {
        thread::sleep(std::time::Duration::from_millis(100));
    }
    handle.stop();
    handle.join();
    Ok(())
}
