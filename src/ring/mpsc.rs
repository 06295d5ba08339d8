//! Lock-free MPSC ring buffer (§3 "Producer→consumer channel", §4.3).
//!
//! Many network workers claim and publish slots concurrently; one journal
//! consumer drains them. Claiming uses a CAS loop over a shared cursor;
//! publication is tracked with a per-slot availability bitfield using the
//! even/odd round-flip encoding from the LMAX Disruptor, which lets the
//! consumer find the highest *contiguous* published sequence without
//! scanning for holes left by producers that claimed out of order.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{DigitsError, Result};

/// One ring slot: the 9 payload octets of a digit-line message (§3).
#[derive(Clone, Copy)]
pub struct DigitSlot {
    pub bytes: [u8; 9],
}

impl Default for DigitSlot {
    fn default() -> Self {
        Self { bytes: [0u8; 9] }
    }
}

pub struct MpscRing {
    buffer: Box<[DigitSlot]>,
    mask: usize,
    index_shift: u32,
    claim_cursor: AtomicU64,
    consumer_cursor: AtomicU64,
    /// Bitfield tracking published slots, one bit per slot, packed 64 to
    /// a word. A bit's value alternates with each wraparound of the ring
    /// so the consumer can tell "published this round" from "not yet
    /// published" without clearing the array on wrap.
    available: Box<[AtomicU64]>,
}

impl MpscRing {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 64 || !capacity.is_power_of_two() {
            return Err(DigitsError::config(
                "ring capacity must be a power of two and at least 64",
            ));
        }

        let buffer = (0..capacity).map(|_| DigitSlot::default()).collect::<Vec<_>>().into_boxed_slice();
        let words = capacity / 64;
        let available = (0..words).map(|_| AtomicU64::new(!0)).collect::<Vec<_>>().into_boxed_slice();

        Ok(Self {
            buffer,
            mask: capacity - 1,
            index_shift: capacity.trailing_zeros(),
            claim_cursor: AtomicU64::new(0),
            consumer_cursor: AtomicU64::new(0),
            available,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Try to claim `count` contiguous slots starting at the returned
    /// sequence. Returns `None` if the ring has no space right now; the
    /// caller (the producer API) decides how to wait.
    pub fn try_claim(&self, count: u64) -> Option<u64> {
        loop {
            let current = self.claim_cursor.load(Ordering::Relaxed);
            let next = current + count;
            let consumer_seq = self.consumer_cursor.load(Ordering::Acquire);
            let in_flight = next - consumer_seq;

            if in_flight > self.buffer.len() as u64 {
                return None;
            }

            match self.claim_cursor.compare_exchange_weak(
                current,
                next,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(current),
                Err(_) => std::hint::spin_loop(),
            }
        }
    }

    /// Write a claimed slot. Caller must own `sequence` via `try_claim`.
    pub fn write_slot(&self, sequence: u64, value: DigitSlot) {
        let idx = (sequence as usize) & self.mask;
        // SAFETY: the claim protocol gives the caller exclusive access to
        // this slot until it publishes.
        unsafe {
            let slot_ptr = self.buffer.as_ptr().add(idx) as *mut DigitSlot;
            std::ptr::write_volatile(slot_ptr, value);
        }
    }

    fn indices(&self, sequence: u64) -> (usize, usize) {
        let slot_index = (sequence as usize) & self.mask;
        (slot_index >> 6, slot_index & 63)
    }

    fn round_flag(&self, sequence: u64) -> u64 {
        (sequence >> self.index_shift) & 1
    }

    /// Mark `sequence` as published. Flips the tracking bit rather than
    /// setting it, encoding which wraparound round published it.
    pub fn publish(&self, sequence: u64) {
        let (word, bit) = self.indices(sequence);
        self.available[word].fetch_xor(1u64 << bit, Ordering::Release);
    }

    /// Highest sequence number published contiguously from the
    /// consumer's current position - the "batch boundary" the consumer
    /// processes up to before updating statistics (§4.2).
    pub fn published_high_water_mark(&self) -> u64 {
        let prev = self.consumer_cursor.load(Ordering::Relaxed);
        let claimed = self.claim_cursor.load(Ordering::Acquire);

        if prev >= claimed {
            return prev;
        }

        let mut flag = self.round_flag(prev);
        let (mut word, mut bit) = self.indices(prev);
        let mut bits = self.available[word].load(Ordering::Acquire) >> bit;
        let mut highest = prev;

        loop {
            if (bits & 1) != flag {
                return highest.saturating_sub(1);
            }
            highest += 1;
            if highest >= claimed {
                return claimed;
            }
            if bit < 63 {
                bit += 1;
                bits >>= 1;
            } else {
                (word, _) = self.indices(highest);
                bits = self.available[word].load(Ordering::Acquire);
                bit = 0;
                if word == 0 {
                    flag ^= 1;
                }
            }
        }
    }

    pub fn read_slot(&self, sequence: u64) -> DigitSlot {
        let idx = (sequence as usize) & self.mask;
        // SAFETY: caller only reads sequences up to `published_high_water_mark`.
        unsafe { std::ptr::read_volatile(self.buffer.as_ptr().add(idx)) }
    }

    pub fn advance_consumer(&self, sequence: u64) {
        self.consumer_cursor.store(sequence, Ordering::Release);
    }
}

unsafe impl Send for MpscRing {}
unsafe impl Sync for MpscRing {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_publish_read_round_trip() {
        let ring = MpscRing::new(64).unwrap();
        let seq = ring.try_claim(1).unwrap();
        ring.write_slot(seq, DigitSlot { bytes: *b"000000001" });
        ring.publish(seq);
        assert_eq!(ring.published_high_water_mark(), 1);
        let slot = ring.read_slot(seq);
        assert_eq!(&slot.bytes, b"000000001");
        ring.advance_consumer(1);
    }

    #[test]
    fn full_ring_rejects_claim() {
        let ring = MpscRing::new(64).unwrap();
        for _ in 0..64 {
            ring.try_claim(1).unwrap();
        }
        assert!(ring.try_claim(1).is_none());
    }

    #[test]
    fn out_of_order_publish_does_not_advance_high_water_mark_past_a_hole() {
        let ring = MpscRing::new(64).unwrap();
        let a = ring.try_claim(1).unwrap();
        let b = ring.try_claim(1).unwrap();
        ring.write_slot(b, DigitSlot { bytes: *b"000000002" });
        ring.publish(b);
        // `a` not yet published: high water mark must not jump to `b`.
        assert_eq!(ring.published_high_water_mark(), 0);
        ring.write_slot(a, DigitSlot { bytes: *b"000000001" });
        ring.publish(a);
        assert_eq!(ring.published_high_water_mark(), 2);
    }

    #[test]
    fn wraps_around_the_ring() {
        let ring = MpscRing::new(64).unwrap();
        for round in 0..4 {
            for i in 0..64u64 {
                let seq = ring.try_claim(1).unwrap();
                assert_eq!(seq, round * 64 + i);
                ring.write_slot(seq, DigitSlot::default());
                ring.publish(seq);
            }
            assert_eq!(ring.published_high_water_mark(), (round + 1) * 64);
            ring.advance_consumer((round + 1) * 64);
        }
    }
}
