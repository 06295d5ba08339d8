//! Journal Writer and Producer API (C2, C3, §4.2-§4.3).
//!
//! One consumer thread owns the ring's read cursor, the dedup filter, and
//! the journal file. Connection-handling threads never touch the file or
//! the filter directly; they only claim ring slots through
//! [`JournalProducer`].

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{error, warn};

use crate::dedup::DedupFilter;
use crate::error::{DigitsError, Result};
use crate::ring::{DigitSlot, MpscRing, Notifier, WaitStrategy};
use crate::stats::Stats;

/// Producer-side handle shared by every connection-handling thread.
///
/// Claims one ring slot per call, writes it, and publishes it - no
/// batching API is exposed here since each valid frame is one message
/// (§4.3).
pub struct JournalProducer {
    ring: Arc<MpscRing>,
    notifier: Arc<Notifier>,
    stop: Arc<AtomicBool>,
}

impl JournalProducer {
    pub fn new(ring: Arc<MpscRing>, notifier: Arc<Notifier>, stop: Arc<AtomicBool>) -> Self {
        Self { ring, notifier, stop }
    }

    /// Submit one validated 9-digit frame to the journal pipeline.
    ///
    /// During a graceful shutdown in progress, new claims are refused
    /// (§4.3 "stop accepting new work, finish in-flight claims") - the
    /// caller treats this the same as a full ring and drops the
    /// connection rather than blocking indefinitely.
    pub fn write(&self, frame: [u8; 9]) -> Result<()> {
        if self.stop.load(Ordering::Acquire) {
            return Err(DigitsError::RingFull);
        }

        let seq = loop {
            if let Some(seq) = self.ring.try_claim(1) {
                break seq;
            }
            if self.stop.load(Ordering::Acquire) {
                return Err(DigitsError::RingFull);
            }
            thread::yield_now();
        };

        self.ring.write_slot(seq, DigitSlot { bytes: frame });
        self.ring.publish(seq);
        self.notifier.notify();
        Ok(())
    }
}

/// Parses a 9-ASCII-digit frame into its numeric value. Returns `None`
/// if any byte isn't an ASCII digit - frames reaching the ring have
/// already been validated by C5, so this should never fail in practice.
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

/// Runs the single journal-consumer thread until `stop` is observed and
/// the ring has been fully drained. Owns the dedup filter and the
/// journal file exclusively; no other thread touches either.
pub fn spawn_consumer(
    ring: Arc<MpscRing>,
    notifier: Arc<Notifier>,
    stats: Arc<Stats>,
    stop: Arc<AtomicBool>,
    wait_strategy: WaitStrategy,
    journal_path: &Path,
) -> Result<thread::JoinHandle<()>> {
    let file = File::create(journal_path)
        .map_err(|source| DigitsError::JournalOpen { path: journal_path.to_path_buf(), source })?;
    let mut writer = BufWriter::new(file);
    let mut filter = DedupFilter::new();

    let handle = thread::spawn(move || {
        let mut cursor: u64 = 0;
        loop {
            let high_water_mark = ring.published_high_water_mark();

            if high_water_mark == cursor {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                notifier.idle(wait_strategy);
                continue;
            }

            let mut batch_received: u64 = 0;
            let mut batch_duplicates: u64 = 0;

            while cursor < high_water_mark {
                cursor += 1;
                let slot = ring.read_slot(cursor - 1);
                batch_received += 1;

                let Some(value) = parse_digits(&slot.bytes) else {
                    warn!("dropping unparseable frame reaching the journal consumer");
                    continue;
                };

                if filter.test_and_set(value) {
                    if let Err(err) = writer.write_all(&slot.bytes).and_then(|_| writer.write_all(b"\n"))
                    {
                        error!(%err, "journal write failed, dropping batch remainder");
                        break;
                    }
                } else {
                    batch_duplicates += 1;
                }
            }

            if let Err(err) = writer.flush() {
                error!(%err, "journal flush failed");
            }

            ring.advance_consumer(cursor);
            stats.add(batch_received, batch_duplicates);

            if stop.load(Ordering::Acquire) && ring.published_high_water_mark() == cursor {
                break;
            }
        }
    });

    Ok(handle)
}
