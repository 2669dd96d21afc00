//! Go-Back-N send-side state machine.
//!
//! [`GbnSender`] splits an outbound buffer into [`MAX_PAYLOAD_LEN`] chunks
//! and keeps a sliding window of up to `window_size` of them in flight.
//!
//! # Protocol contract
//!
//! - At most `window_size` segments are unacknowledged at once, and they are
//!   always contiguous in sequence space (the window never has a gap).
//! - ACKs are **cumulative**: `ack_num = K` confirms every outstanding
//!   segment up to and including sequence number `K`.
//! - An ACK is only honoured when `ack_num` falls inside the outstanding
//!   range, walking forward modulo 64 from the oldest segment.
//! - On timeout the caller retransmits the **whole** window (go back N).
//!
//! ```text
//!    base                next
//!      │                   │
//!  ────┼───────────────────┼──────────────────▶ chunk index
//!      │ <── in flight ──▶ │ <── not sent ──▶
//! ```
//!
//! `base` and `next` are chunk indices that only grow; the sequence number
//! on the wire is `index mod 64`.  This module only manages state; all
//! socket I/O is the caller's responsibility.

use std::collections::VecDeque;

use crate::segment::{Segment, SegmentError, MAX_PAYLOAD_LEN};
use crate::seq::{seq_in_range, seq_of};
use crate::state::SenderState;

/// Default number of segments allowed in flight.
pub const WIN_SIZE: usize = 6;

/// How one inbound datagram affected the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// `acked` segments left the front of the window.
    Advanced { ack_num: u8, acked: usize },
    /// Decoded fine but the ACK flag is absent.
    NotAnAck { seq_num: u8 },
    /// ACK for a sequence number outside the outstanding range.
    OutOfWindow { ack_num: u8 },
    /// Failed to decode.
    Malformed(SegmentError),
}

/// Go-Back-N send-side state for one transfer.
#[derive(Debug)]
pub struct GbnSender<'a> {
    data: &'a [u8],
    /// Index of the oldest unacknowledged chunk.
    base: usize,
    /// Index of the next chunk to place in the window.
    next: usize,
    /// Total number of data chunks.
    total: usize,
    window_size: usize,
    /// In-flight segments, oldest first.
    window: VecDeque<Segment>,
    state: SenderState,
}

impl<'a> GbnSender<'a> {
    /// Create a sender for `data` with a window of `window_size` segments.
    pub fn new(data: &'a [u8], window_size: usize) -> Self {
        assert!(window_size >= 1, "window_size must be at least 1");
        Self {
            data,
            base: 0,
            next: 0,
            total: data.len().div_ceil(MAX_PAYLOAD_LEN),
            window_size,
            window: VecDeque::with_capacity(window_size),
            state: SenderState::FillingWindow,
        }
    }

    /// Top the window up with new chunks; returns how many were added.
    pub fn fill_window(&mut self) -> usize {
        let mut added = 0;
        while self.window.len() < self.window_size && self.next < self.total {
            let start = self.next * MAX_PAYLOAD_LEN;
            let end = (start + MAX_PAYLOAD_LEN).min(self.data.len());
            self.window
                .push_back(Segment::data(seq_of(self.next), &self.data[start..end]));
            self.next += 1;
            added += 1;
        }
        self.state = if self.window.is_empty() {
            SenderState::AllAcked
        } else {
            SenderState::AwaitingAcks
        };
        added
    }

    /// In-flight segments from oldest to newest.
    ///
    /// The caller transmits all of them on every pass of the outer loop.
    pub fn window(&self) -> impl Iterator<Item = &Segment> {
        self.window.iter()
    }

    /// Decode and process a raw datagram received while awaiting ACKs.
    pub fn on_datagram(&mut self, raw: &[u8]) -> AckOutcome {
        match Segment::decode(raw) {
            Ok(segment) => self.on_ack(&segment),
            Err(e) => AckOutcome::Malformed(e),
        }
    }

    /// Process a decoded segment as a cumulative ACK.
    pub fn on_ack(&mut self, segment: &Segment) -> AckOutcome {
        if !segment.ack {
            return AckOutcome::NotAnAck {
                seq_num: segment.seq_num,
            };
        }
        let ack_num = segment.ack_num;
        let (Some(front), Some(back)) = (self.window.front(), self.window.back()) else {
            return AckOutcome::OutOfWindow { ack_num };
        };
        if !seq_in_range(ack_num, front.seq_num, back.seq_num) {
            return AckOutcome::OutOfWindow { ack_num };
        }

        let mut acked = 0;
        while let Some(front) = self.window.pop_front() {
            self.base += 1;
            acked += 1;
            if front.seq_num == ack_num {
                break;
            }
        }
        if self.all_acked() {
            self.state = SenderState::AllAcked;
        }
        AckOutcome::Advanced { ack_num, acked }
    }

    /// The ACK wait timed out: go back to filling (and resending) the window.
    pub fn on_timeout(&mut self) {
        if !self.window.is_empty() {
            self.state = SenderState::FillingWindow;
        }
    }

    /// FIN for the sequence number after the last chunk.
    ///
    /// Moves the machine into [`SenderState::SendingFin`].
    pub fn fin(&mut self) -> Segment {
        debug_assert!(self.all_acked(), "FIN before all data was acknowledged");
        self.state = SenderState::SendingFin;
        Segment::fin(seq_of(self.next))
    }

    /// `true` when `segment` acknowledges the FIN.
    pub fn is_fin_ack(&self, segment: &Segment) -> bool {
        segment.ack && segment.ack_num == seq_of(self.next)
    }

    pub fn close(&mut self) {
        self.state = SenderState::Closed;
    }

    /// `true` once every data chunk has been acknowledged.
    pub fn all_acked(&self) -> bool {
        self.base == self.total
    }

    pub fn window_is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.window.len()
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn next(&self) -> usize {
        self.next
    }

    pub fn total_segments(&self) -> usize {
        self.total
    }

    pub fn state(&self) -> SenderState {
        self.state
    }
}
