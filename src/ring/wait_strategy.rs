//! Wait strategies for the journal consumer (§4.2).
//!
//! Controls how the consumer idles when the ring has nothing published.
//! Producers never consult this - they block on claim only when the ring
//! is physically full.

use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStrategy {
    Block,
    Sleep,
    Yield,
    Busy,
}

impl FromStr for WaitStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(WaitStrategy::Block),
            "sleep" => Ok(WaitStrategy::Sleep),
            "yield" => Ok(WaitStrategy::Yield),
            "busy" => Ok(WaitStrategy::Busy),
            _ => Err(()),
        }
    }
}

/// Wakes a single idling consumer when a producer publishes. Shared
/// between the ring's producers (signal side) and its one consumer
/// (wait side).
pub struct Notifier {
    mutex: Mutex<()>,
    condvar: Condvar,
    spin_budget: AtomicU32,
}

const SPIN_BEFORE_PARK: u32 = 100;
const BLOCK_POLL: Duration = Duration::from_micros(200);
const SLEEP_DURATION: Duration = Duration::from_micros(50);

impl Notifier {
    pub fn new() -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            spin_budget: AtomicU32::new(0),
        }
    }

    /// Wake whatever consumer is parked waiting for new data.
    pub fn notify(&self) {
        self.condvar.notify_all();
    }

    /// Idle for one iteration under the given strategy. Callers loop this
    /// themselves, re-checking their own wake condition (new data, or
    /// shutdown) between calls.
    pub fn idle(&self, strategy: WaitStrategy) {
        match strategy {
            WaitStrategy::Busy => {
                std::hint::spin_loop();
            }
            WaitStrategy::Yield => {
                thread::yield_now();
            }
            WaitStrategy::Sleep => {
                thread::sleep(SLEEP_DURATION);
            }
            WaitStrategy::Block => {
                let spins = self.spin_budget.fetch_add(1, Ordering::Relaxed);
                if spins < SPIN_BEFORE_PARK {
                    std::hint::spin_loop();
                } else {
                    let mut guard = self.mutex.lock();
                    self.condvar.wait_for(&mut guard, BLOCK_POLL);
                    self.spin_budget.store(0, Ordering::Relaxed);
                }
            }
        }
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn parses_spec_names_case_insensitively() {
        assert_eq!(WaitStrategy::from_str("Block"), Ok(WaitStrategy::Block));
        assert_eq!(WaitStrategy::from_str("SLEEP"), Ok(WaitStrategy::Sleep));
        assert_eq!(WaitStrategy::from_str("yield"), Ok(WaitStrategy::Yield));
        assert_eq!(WaitStrategy::from_str("busy"), Ok(WaitStrategy::Busy));
        assert!(WaitStrategy::from_str("bogus").is_err());
    }

    #[test]
    fn notify_wakes_a_blocked_waiter() {
        let notifier = Arc::new(Notifier::new());
        let n = notifier.clone();
        let handle = thread::spawn(move || {
            n.idle(WaitStrategy::Block);
        });
        thread::sleep(Duration::from_millis(5));
        notifier.notify();
        handle.join().unwrap();
    }
}
