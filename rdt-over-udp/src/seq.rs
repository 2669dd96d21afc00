//! Modulo-64 sequence-number arithmetic.
//!
//! Sequence and acknowledgement numbers wrap at [`SEQ_NUM_BOUND`].  The
//! window is far smaller than the sequence space, so "is X inside the
//! outstanding range" is answered by walking forward from the oldest
//! outstanding number.

use crate::segment::SEQ_NUM_BOUND;

/// `seq + n` in the sequence space.
#[inline]
pub fn seq_add(seq: u8, n: usize) -> u8 {
    ((usize::from(seq) + n) % usize::from(SEQ_NUM_BOUND)) as u8
}

/// `seq - 1` in the sequence space.
#[inline]
pub fn seq_prev(seq: u8) -> u8 {
    seq_add(seq, usize::from(SEQ_NUM_BOUND) - 1)
}

/// Forward distance from `from` to `to`, in `0..SEQ_NUM_BOUND`.
#[inline]
pub fn seq_distance(from: u8, to: u8) -> u8 {
    (to % SEQ_NUM_BOUND + SEQ_NUM_BOUND - from % SEQ_NUM_BOUND) % SEQ_NUM_BOUND
}

/// Sequence number of the `index`-th segment of a transfer.
#[inline]
pub fn seq_of(index: usize) -> u8 {
    (index % usize::from(SEQ_NUM_BOUND)) as u8
}

/// `true` when walking forward from `front` reaches `seq` no later than
/// `back`.  Handles windows that straddle the wrap point.
#[inline]
pub fn seq_in_range(seq: u8, front: u8, back: u8) -> bool {
    seq_distance(front, seq) <= seq_distance(front, back)
}
