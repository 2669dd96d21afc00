//! Finite-state-machine types for the two transfer roles.
//!
//! Transitions live in [`crate::gbn_sender`] and [`crate::gbn_receiver`];
//! keeping the states here lets the drivers log and assert on them without
//! reaching into either machine.

use std::fmt;

/// States of one outbound transfer.
///
/// ```text
///  FILLING_WINDOW ──window full / no data left──▶ AWAITING_ACKS
///        ▲                                             │
///        └──────── window drained / timeout ───────────┤
///                                                      │ all data acked
///                                                      ▼
///  CLOSED ◀──FIN acked / retries spent── SENDING_FIN ◀── ALL_ACKED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    #[default]
    FillingWindow,
    AwaitingAcks,
    AllAcked,
    SendingFin,
    Closed,
}

/// States of one inbound transfer.
///
/// ```text
///  AWAITING_SEGMENT ──in-order data──▶ ACK_SENT ──▶ AWAITING_SEGMENT
///        │
///        └── in-order FIN ──▶ DONE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    #[default]
    AwaitingSegment,
    AckSent,
    Done,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FillingWindow => "FILLING_WINDOW",
            Self::AwaitingAcks => "AWAITING_ACKS",
            Self::AllAcked => "ALL_ACKED",
            Self::SendingFin => "SENDING_FIN",
            Self::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingSegment => "AWAITING_SEGMENT",
            Self::AckSent => "ACK_SENT",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}
