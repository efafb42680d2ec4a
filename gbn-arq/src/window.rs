//! Go-Back-N send window.
//!
//! [`Window`] records up to [`WINDOW_SIZE`] in-flight frames in transmission
//! order and answers the one question ACK processing needs: how many of them
//! does a cumulative `Ack(n)` cover?
//!
//! # Sequence-number layout
//!
//! ```text
//!    base               next_seq
//!      │                    │
//!  ────┼────────────────────┼──────────────▶ seq space (mod 8)
//!      │ <── in flight ───▶ │ <── sendable ─▶
//! ```
//!
//! `next_seq` and `outstanding` are derived from `base` and the in-flight
//! queue, so they cannot drift from it.  Because entries are pushed with
//! consecutive sequence numbers, "is `n` in the window" is a modular range
//! check and the number of frames `Ack(n)` covers is a subtraction.
//!
//! This module only manages state; all channel I/O is the caller's
//! responsibility.

use std::collections::VecDeque;

use crate::frame::Frame;
use crate::seq::{in_range, seq_add, seq_distance, WINDOW_SIZE};

/// A single in-flight frame occupying one slot of the window.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub seq: u8,
    /// Index of the source chunk the frame carries.
    pub chunk: u64,
    /// The frame as first transmitted; retransmissions reuse it.
    pub frame: Frame,
    /// Total number of times this frame has been transmitted.
    pub tx_count: u32,
}

#[derive(Debug)]
pub struct Window {
    /// Sequence number of the oldest unacknowledged frame (left window edge).
    base: u8,
    /// In-flight frames ordered by sequence number (front = oldest).
    in_flight: VecDeque<InFlight>,
}

impl Default for Window {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Window {
    pub fn new(base: u8) -> Self {
        Self {
            base,
            in_flight: VecDeque::with_capacity(WINDOW_SIZE),
        }
    }

    pub fn base(&self) -> u8 {
        self.base
    }

    /// Sequence number the next new frame must carry.
    pub fn next_seq(&self) -> u8 {
        seq_add(self.base, self.in_flight.len())
    }

    /// Number of frames awaiting acknowledgement.
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_full(&self) -> bool {
        self.in_flight.len() >= WINDOW_SIZE
    }

    /// Place a just-transmitted frame at the back of the window.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if the window is full or `entry.seq` is not
    /// [`Window::next_seq`].
    pub fn push(&mut self, entry: InFlight) {
        debug_assert!(
            !self.is_full(),
            "push on a full window ({} / {WINDOW_SIZE})",
            self.in_flight.len()
        );
        debug_assert_eq!(entry.seq, self.next_seq(), "window sequence gap");
        self.in_flight.push_back(entry);
    }

    /// How many frames, counted from the front, `Ack(ack)` covers.
    ///
    /// `None` when `ack` names no in-flight frame.
    pub fn covered_by(&self, ack: u8) -> Option<usize> {
        in_range(self.base, self.in_flight.len(), ack).then(|| seq_distance(self.base, ack) + 1)
    }

    /// Remove `count` frames from the front, advancing `base` past each.
    pub fn release(&mut self, count: usize) -> Vec<InFlight> {
        let count = count.min(self.in_flight.len());
        let released: Vec<InFlight> = self.in_flight.drain(..count).collect();
        self.base = seq_add(self.base, released.len());
        released
    }

    /// Drop every in-flight frame and restart the window at `base`.
    pub fn reset(&mut self, base: u8) {
        self.in_flight.clear();
        self.base = base;
    }

    /// Iterate over all in-flight frames from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = &InFlight> {
        self.in_flight.iter()
    }

    /// Bump the transmission count of every in-flight frame.
    ///
    /// Call this immediately after retransmitting the entire window.
    pub fn on_retransmit(&mut self) {
        for entry in self.in_flight.iter_mut() {
            entry.tx_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(w: &mut Window, first_chunk: u64, n: usize) {
        for i in 0..n {
            let seq = w.next_seq();
            w.push(InFlight {
                seq,
                chunk: first_chunk + i as u64,
                frame: Frame::data(seq, b"x").unwrap(),
                tx_count: 1,
            });
        }
    }

    #[test]
    fn initial_state() {
        let w = Window::new(0);
        assert_eq!(w.base(), 0);
        assert_eq!(w.next_seq(), 0);
        assert_eq!(w.outstanding(), 0);
        assert!(!w.is_full());
    }

    #[test]
    fn push_advances_next_seq_not_base() {
        let mut w = Window::new(0);
        fill(&mut w, 0, 3);
        assert_eq!(w.base(), 0);
        assert_eq!(w.next_seq(), 3);
        assert_eq!(w.outstanding(), 3);
    }

    #[test]
    fn window_full_at_window_size() {
        let mut w = Window::new(0);
        fill(&mut w, 0, WINDOW_SIZE);
        assert!(w.is_full());
        assert_eq!(w.next_seq(), 7);
    }

    #[test]
    fn cumulative_ack_covers_prefix() {
        let mut w = Window::new(0);
        fill(&mut w, 0, 5);
        assert_eq!(w.covered_by(0), Some(1));
        assert_eq!(w.covered_by(3), Some(4));
        assert_eq!(w.covered_by(4), Some(5));
        assert_eq!(w.covered_by(5), None);
    }

    #[test]
    fn ack_for_base_minus_one_is_outside_full_window() {
        let mut w = Window::new(2);
        fill(&mut w, 2, WINDOW_SIZE);
        // window 2,3,4,5,6,7,0; only 1 is outside
        for seq in [2, 3, 4, 5, 6, 7, 0] {
            assert!(w.covered_by(seq).is_some(), "seq {seq}");
        }
        assert_eq!(w.covered_by(1), None);
    }

    #[test]
    fn release_slides_base_across_wrap() {
        let mut w = Window::new(6);
        fill(&mut w, 6, 4); // 6,7,0,1
        let covered = w.covered_by(0).unwrap();
        assert_eq!(covered, 3);
        let released = w.release(covered);
        assert_eq!(released.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![6, 7, 0]);
        assert_eq!(w.base(), 1);
        assert_eq!(w.outstanding(), 1);
        assert_eq!(w.next_seq(), 2);
    }

    #[test]
    fn reset_discards_in_flight() {
        let mut w = Window::new(0);
        fill(&mut w, 0, 4);
        w.reset(5);
        assert_eq!(w.outstanding(), 0);
        assert_eq!(w.base(), 5);
        assert_eq!(w.next_seq(), 5);
    }

    #[test]
    fn on_retransmit_increments_tx_count() {
        let mut w = Window::new(0);
        fill(&mut w, 0, 2);
        w.on_retransmit();
        assert!(w.entries().all(|e| e.tx_count == 2));
    }

    #[test]
    fn empty_window_covers_nothing() {
        let w = Window::new(3);
        for seq in 0..8 {
            assert_eq!(w.covered_by(seq), None);
        }
    }
}
