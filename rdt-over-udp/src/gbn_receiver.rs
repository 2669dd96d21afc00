//! Go-Back-N receive-side state machine.
//!
//! [`GbnReceiver`] implements the receiver side of Go-Back-N:
//!
//! - Only the **next expected** segment is accepted; its payload is appended
//!   to the reassembly buffer and `expected` advances modulo 64.
//! - Out-of-order, duplicate, and malformed datagrams are **discarded**
//!   without buffering.
//! - After every datagram (accepted or not) the caller sends back the
//!   cumulative ACK from [`GbnReceiver::ack`], which always names the last
//!   sequence number accepted in order.  A sender that sees the same ACK
//!   repeatedly will eventually time out and resend its window.
//! - An in-order FIN is acknowledged and ends the transfer.
//!
//! This module only manages state; all socket I/O is the caller's
//! responsibility.

use crate::segment::{Segment, SegmentError};
use crate::seq::{seq_add, seq_prev};
use crate::state::ReceiverState;

/// How one inbound datagram was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// In-order data; payload appended.
    Accepted { seq_num: u8, len: usize },
    /// Decoded fine but not the expected sequence number.
    OutOfOrder { seq_num: u8 },
    /// Failed to decode.
    Malformed(SegmentError),
    /// In-order FIN; the transfer is complete.
    Finished { seq_num: u8 },
}

/// Go-Back-N receive-side state for one transfer.
#[derive(Debug)]
pub struct GbnReceiver {
    /// Next sequence number that will be accepted.
    expected: u8,
    /// Sequence number carried by every outbound ACK.
    last_ack: u8,
    /// In-order payload bytes delivered so far.
    buffer: Vec<u8>,
    state: ReceiverState,
}

impl Default for GbnReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl GbnReceiver {
    /// A receiver expecting sequence number 0.
    ///
    /// Until something is accepted the ACK names 63, the number "before" 0.
    pub fn new() -> Self {
        Self {
            expected: 0,
            last_ack: seq_prev(0),
            buffer: Vec::new(),
            state: ReceiverState::AwaitingSegment,
        }
    }

    /// Decode and process a raw datagram.
    pub fn on_datagram(&mut self, raw: &[u8]) -> Delivery {
        match Segment::decode(raw) {
            Ok(segment) => self.on_segment(segment),
            Err(e) => {
                self.state = ReceiverState::AwaitingSegment;
                Delivery::Malformed(e)
            }
        }
    }

    /// Process a decoded segment.
    pub fn on_segment(&mut self, segment: Segment) -> Delivery {
        debug_assert!(!self.is_done(), "segment fed to a finished receiver");

        let seq_num = segment.seq_num;
        if seq_num != self.expected {
            self.state = ReceiverState::AwaitingSegment;
            return Delivery::OutOfOrder { seq_num };
        }

        self.last_ack = seq_num;
        self.expected = seq_add(seq_num, 1);

        if segment.fin {
            self.state = ReceiverState::Done;
            return Delivery::Finished { seq_num };
        }

        let payload = segment.into_payload();
        let len = payload.len();
        self.buffer.extend_from_slice(&payload);
        self.state = ReceiverState::AckSent;
        Delivery::Accepted { seq_num, len }
    }

    /// Cumulative ACK for the last in-order segment.
    pub fn ack(&self) -> Segment {
        Segment::ack_for(self.last_ack)
    }

    pub fn ack_number(&self) -> u8 {
        self.last_ack
    }

    pub fn expected(&self) -> u8 {
        self.expected
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == ReceiverState::Done
    }

    /// Bytes reassembled so far.
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_data(self) -> Vec<u8> {
        self.buffer
    }
}
