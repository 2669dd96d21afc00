//! `rdt-over-udp` — Go-Back-N reliable data transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐   DATA / FIN    ┌──────────────┐
//!  │  GbnSender   │────────────────▶│ GbnReceiver  │
//!  └──────┬───────┘                 └──────┬───────┘
//!         │      cumulative ACKs           │
//!         │◀───────────────────────────────┘
//!         │
//!  ┌──────▼───────────────────────────────────┐
//!  │                RdtSocket                 │
//!  │  (one state machine per send/recv call)  │
//!  └──────┬───────────────────────────────────┘
//!         │ fixed-size datagrams
//!  ┌──────▼──────┐      ┌─────────────┐
//!  │  Transport  │◀─────│  Simulator  │  (fault injection)
//!  └─────────────┘      └─────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`segment`]      — wire format and checksum
//! - [`seq`]          — modulo-64 sequence arithmetic
//! - [`timer`]        — timeout and retry budget
//! - [`socket`]       — transport trait and UDP implementation
//! - [`simulator`]    — lossy/corrupting transport for testing
//! - [`state`]        — finite-state-machine types
//! - [`gbn_sender`]   — GBN outbound window state machine
//! - [`gbn_receiver`] — GBN inbound cumulative-ACK state machine
//! - [`rdt`]          — drives both machines over a transport

pub mod gbn_receiver;
pub mod gbn_sender;
pub mod rdt;
pub mod segment;
pub mod seq;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod timer;

pub use rdt::{RdtError, RdtSocket, TransferStats};
pub use segment::{Segment, SegmentError};
pub use socket::{Socket, Transport, TransportError};
pub use timer::RetryPolicy;
