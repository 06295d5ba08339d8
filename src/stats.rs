//! Statistics Reporter (C4, §4.4).
//!
//! `add` is called only from the journal consumer thread; the periodic
//! flush runs on its own timer thread, so the `period_*` pair is behind a
//! short critical section while `total_*` is plain atomics safe for
//! either side to read.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const REPORT_PERIOD: Duration = Duration::from_secs(10);
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct PeriodCounts {
    received: u64,
    duplicates: u64,
}

pub struct Stats {
    period: Mutex<PeriodCounts>,
    total_received: AtomicU64,
    total_duplicates: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            period: Mutex::new(PeriodCounts::default()),
            total_received: AtomicU64::new(0),
            total_duplicates: AtomicU64::new(0),
        }
    }

    /// Fold a batch's counts into the current period (§4.2 "end of batch").
    pub fn add(&self, received: u64, duplicates: u64) {
        debug_assert!(duplicates <= received);
        let mut period = self.period.lock();
        period.received += received;
        period.duplicates += duplicates;
    }

    /// Atomically swap-and-zero the period counters, fold them into the
    /// running totals, and return the just-ended period's counts.
    fn tick(&self) -> (u64, u64) {
        let (received, duplicates) = {
            let mut period = self.period.lock();
            let counts = (period.received, period.duplicates);
            period.received = 0;
            period.duplicates = 0;
            counts
        };
        self.total_received.fetch_add(received, Ordering::Relaxed);
        self.total_duplicates.fetch_add(duplicates, Ordering::Relaxed);
        (received, duplicates)
    }

    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_received.load(Ordering::Relaxed),
            self.total_duplicates.load(Ordering::Relaxed),
        )
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the fixed-rate 10s reporting tick on its own thread until `stop`
/// is set. First tick fires at t=10s, not at startup (§4.4); a late tick
/// does not push the next one's deadline out (drift is absorbed, not
/// accumulated).
pub fn spawn_reporter(stats: Arc<Stats>, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut deadline = Instant::now() + REPORT_PERIOD;
        while !stop.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < deadline {
                thread::sleep((deadline - now).min(SHUTDOWN_POLL));
                continue;
            }
            let (received, duplicates) = stats.tick();
            println!("received {received} numbers, {duplicates} duplicates");
            deadline += REPORT_PERIOD;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_never_exceed_received() {
        let stats = Stats::new();
        stats.add(10, 3);
        stats.add(5, 5);
        let (r, d) = stats.totals();
        assert_eq!(r, 0); // totals only update on tick()
        assert_eq!(d, 0);
        let (period_r, period_d) = stats.tick();
        assert_eq!(period_r, 15);
        assert_eq!(period_d, 8);
        assert!(period_d <= period_r);
    }

    #[test]
    fn tick_resets_period_but_keeps_totals() {
        let stats = Stats::new();
        stats.add(10, 2);
        stats.tick();
        let (total_r, total_d) = stats.totals();
        assert_eq!((total_r, total_d), (10, 2));

        stats.add(4, 1);
        let (period_r, period_d) = stats.tick();
        assert_eq!((period_r, period_d), (4, 1));
        assert_eq!(stats.totals(), (14, 3));
    }

    #[test]
    fn heartbeat_tick_with_no_traffic_is_zero_not_absent() {
        let stats = Stats::new();
        assert_eq!(stats.tick(), (0, 0));
    }
}
