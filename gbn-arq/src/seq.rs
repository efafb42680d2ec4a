//! Protocol constants and modular sequence-number arithmetic.
//!
//! Sequence numbers live in `[0, MAX_SEQ)` and wrap.  Go-Back-N is only
//! correct while the sequence space is strictly larger than the send window;
//! otherwise a retransmitted old frame is indistinguishable from a new one.
//! That requirement is checked at compile time below.

/// Size of the sequence-number space.
pub const MAX_SEQ: u8 = 8;

/// Maximum number of unacknowledged frames the sender may have in flight.
pub const WINDOW_SIZE: usize = 7;

const _: () = assert!(WINDOW_SIZE < MAX_SEQ as usize);

/// `seq + n` in sequence space.
#[inline]
pub fn seq_add(seq: u8, n: usize) -> u8 {
    ((seq as usize + n) % MAX_SEQ as usize) as u8
}

/// The sequence number immediately before `seq`.
#[inline]
pub fn seq_prev(seq: u8) -> u8 {
    (seq + MAX_SEQ - 1) % MAX_SEQ
}

/// Forward distance from `from` to `to`, in `[0, MAX_SEQ)`.
///
/// `seq_distance(6, 1) == 3` because 6 → 7 → 0 → 1.
#[inline]
pub fn seq_distance(from: u8, to: u8) -> usize {
    ((to + MAX_SEQ - from) % MAX_SEQ) as usize
}

/// Sequence number carried by the chunk at `index` in the source.
#[inline]
pub fn seq_for_chunk(index: u64) -> u8 {
    (index % MAX_SEQ as u64) as u8
}

/// `true` when `seq` is one of the `len` sequence numbers starting at `base`.
#[inline]
pub fn in_range(base: u8, len: usize, seq: u8) -> bool {
    seq < MAX_SEQ && seq_distance(base, seq) < len
}
