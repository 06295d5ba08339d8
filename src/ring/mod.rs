//! Lock-free MPSC ring buffer backing the journal pipeline (§3, §4.2-4.3).

pub mod mpsc;
pub mod wait_strategy;

pub use mpsc::{DigitSlot, MpscRing};
pub use wait_strategy::{Notifier, WaitStrategy};
