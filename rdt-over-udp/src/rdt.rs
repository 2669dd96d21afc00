//! Connectionless reliable data transfer over a [`Transport`].
//!
//! # Architecture
//!
//! ```text
//!  Application
//!      │  send_to(data, dest) / recv_from()
//!      ▼
//!  RdtSocket<T>
//!    ├── GbnSender   (one per send_to call: window, base/next, FIN)
//!    ├── GbnReceiver (one per recv_from call: expected, cumulative ACK)
//!    ├── RetryPolicy (shared timeout + retry budget)
//!    └── T: Transport (UDP socket, or a fault-injecting simulator)
//! ```
//!
//! There is no connection: every call builds a fresh state machine, runs it
//! to completion and throws it away.  One transfer direction at a time per
//! socket, which `&mut self` enforces.
//!
//! ```ignore
//! let socket = Socket::bind("127.0.0.1:0".parse()?).await?;
//! let mut rdt = RdtSocket::new(socket);
//! rdt.send_to(b"hello", peer).await?;
//! let (reply, from) = rdt.recv_from().await?;
//! ```

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

use crate::gbn_receiver::{Delivery, GbnReceiver};
use crate::gbn_sender::{AckOutcome, GbnSender, WIN_SIZE};
use crate::segment::{Segment, SEGMENT_LEN};
use crate::socket::{Transport, TransportError};
use crate::timer::{RetryPolicy, Tick};

// One spare byte so an oversized datagram is seen as the wrong size instead
// of being silently truncated into a plausible segment.
const RECV_BUF_LEN: usize = SEGMENT_LEN + 1;

/// Which half of the protocol gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Send,
    Receive,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Send => f.write_str("send"),
            Phase::Receive => f.write_str("receive"),
        }
    }
}

/// Errors surfaced by [`RdtSocket::send_to`] and [`RdtSocket::recv_from`].
///
/// Malformed segments, unexpected ACKs and individual timeouts are absorbed
/// by retransmission and never show up here.
#[derive(Error, Debug)]
pub enum RdtError {
    /// The retry budget ran out before the transfer completed.
    #[error("connection aborted: {phase} timed out {retries} times in a row")]
    ConnectionAborted { phase: Phase, retries: u32 },
    /// The transport itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Counters for the most recent transfer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Data and FIN segments put on the wire, first sends and resends alike.
    pub segments_sent: u64,
    /// Segments sent again because their window was resent.
    pub retransmissions: u64,
    /// Receives that hit the deadline (idle waits before a transfer excluded).
    pub timeouts: u64,
    /// Datagrams that failed to decode.
    pub malformed: u64,
    /// Decoded datagrams that were not useful: stray ACKs, out-of-order data.
    pub unexpected: u64,
    /// ACKs sent by the receiver.
    pub acks_sent: u64,
}

/// Reliable, connectionless datagram socket using Go-Back-N.
pub struct RdtSocket<T> {
    transport: T,
    policy: RetryPolicy,
    window_size: usize,
    stats: TransferStats,
}

impl<T: Transport> RdtSocket<T> {
    /// Wrap `transport` with the default policy and window.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            policy: RetryPolicy::default(),
            window_size: WIN_SIZE,
            stats: TransferStats::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the window size.
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero or does not leave room in the 64-entry
    /// sequence space to tell consecutive windows apart.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        assert!(
            (1..64).contains(&window_size),
            "window_size must be in 1..64, got {window_size}"
        );
        self.window_size = window_size;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Counters from the last `send_to` / `recv_from` call.
    pub fn last_stats(&self) -> TransferStats {
        self.stats
    }

    /// Reliably deliver `data` to `dest`.
    ///
    /// Returns once every data segment is acknowledged and the FIN exchange
    /// has either been confirmed or given up on.  The close is best effort:
    /// an unconfirmed FIN is logged, not reported, because the receiver
    /// never retransmits its final ACK.
    pub async fn send_to(&mut self, data: &[u8], dest: SocketAddr) -> Result<(), RdtError> {
        let mut stats = TransferStats::default();
        let result = self.run_sender(data, dest, &mut stats).await;
        self.stats = stats;
        result
    }

    /// Block until a complete message terminated by a FIN has arrived.
    ///
    /// An idle socket waits indefinitely for the first datagram; once a
    /// transfer has started, more than `max_retries` consecutive timeouts
    /// abort it and no partial data is returned.
    pub async fn recv_from(&mut self) -> Result<(Vec<u8>, SocketAddr), RdtError> {
        let mut stats = TransferStats::default();
        let result = self.run_receiver(&mut stats).await;
        self.stats = stats;
        result
    }

    async fn run_sender(
        &self,
        data: &[u8],
        dest: SocketAddr,
        stats: &mut TransferStats,
    ) -> Result<(), RdtError> {
        let mut sender = GbnSender::new(data, self.window_size);
        let mut retries = self.policy.counter();
        log::info!(
            "[rdt:send] ready to send {} bytes ({} segments) to {dest}",
            data.len(),
            sender.total_segments()
        );

        while !sender.all_acked() {
            let added = sender.fill_window();
            stats.retransmissions += (sender.in_flight() - added) as u64;

            // Go-Back-N: every pass puts the whole window on the wire.
            for segment in sender.window() {
                self.transport.send_to(&segment.encode(), dest).await?;
                stats.segments_sent += 1;
                log::debug!(
                    "[rdt:send] → DATA seq={} len={}",
                    segment.seq_num,
                    segment.payload().len()
                );
            }

            while !sender.window_is_empty() {
                let (raw, from) = match self
                    .transport
                    .recv_timeout(RECV_BUF_LEN, self.policy.timeout)
                    .await
                {
                    Ok(received) => received,
                    Err(TransportError::Timeout) => {
                        stats.timeouts += 1;
                        match retries.on_timeout() {
                            Tick::Exhausted(n) => {
                                log::warn!(
                                    "[rdt:send] gave up after {n} timeouts, base={} of {}",
                                    sender.base(),
                                    sender.total_segments()
                                );
                                return Err(RdtError::ConnectionAborted {
                                    phase: Phase::Send,
                                    retries: n,
                                });
                            }
                            Tick::Retry(_) | Tick::Idle => {
                                log::info!(
                                    "[rdt:send] timed out, count={}; resending {} segment(s)",
                                    retries.count(),
                                    sender.in_flight()
                                );
                                sender.on_timeout();
                                break;
                            }
                        }
                    }
                    Err(e) => return Err(e.into()),
                };

                if from != dest {
                    stats.unexpected += 1;
                    log::debug!("[rdt:send] ignoring datagram from {from}");
                    continue;
                }

                match sender.on_datagram(&raw) {
                    AckOutcome::Advanced { ack_num, acked } => {
                        retries.on_receipt();
                        log::debug!(
                            "[rdt:send] ← ACK #{ack_num} (slid {acked}, base={})",
                            sender.base()
                        );
                    }
                    AckOutcome::OutOfWindow { ack_num } => {
                        retries.on_receipt();
                        stats.unexpected += 1;
                        log::debug!("[rdt:send] duplicate or unexpected ACK #{ack_num}");
                    }
                    AckOutcome::NotAnAck { seq_num } => {
                        retries.on_receipt();
                        stats.unexpected += 1;
                        log::debug!("[rdt:send] unexpected segment #{seq_num}, ignored");
                    }
                    AckOutcome::Malformed(e) => {
                        stats.malformed += 1;
                        log::debug!("[rdt:send] corrupted ACK ignored: {e}");
                    }
                }
            }
        }

        self.finish(&mut sender, dest, stats).await?;
        log::info!("[rdt:send] all sent");
        Ok(())
    }

    /// Best-effort FIN exchange once all data is acknowledged.
    ///
    /// Every FIN that is not answered by its own ACK costs one attempt,
    /// whether the reply timed out, was corrupted or acknowledged something
    /// else.  A peer that has already moved on to its next transfer answers
    /// with a stale ACK, so at most `max_retries + 1` FINs go out.
    async fn finish(
        &self,
        sender: &mut GbnSender<'_>,
        dest: SocketAddr,
        stats: &mut TransferStats,
    ) -> Result<(), RdtError> {
        let fin = sender.fin();
        let encoded = fin.encode();
        let mut failures = self.policy.counter();

        loop {
            self.transport.send_to(&encoded, dest).await?;
            stats.segments_sent += 1;
            log::debug!("[rdt:send] → FIN seq={}", fin.seq_num);

            match self
                .transport
                .recv_timeout(RECV_BUF_LEN, self.policy.timeout)
                .await
            {
                Ok((raw, from)) => match Segment::decode(&raw) {
                    Ok(reply) if from == dest && sender.is_fin_ack(&reply) => {
                        log::debug!("[rdt:send] ← ACK of FIN");
                        break;
                    }
                    Ok(reply) => {
                        stats.unexpected += 1;
                        log::debug!("[rdt:send] stale reply to FIN: ack={}", reply.ack_num);
                    }
                    Err(e) => {
                        stats.malformed += 1;
                        log::debug!("[rdt:send] corrupted reply to FIN: {e}");
                    }
                },
                Err(TransportError::Timeout) => stats.timeouts += 1,
                Err(e) => return Err(e.into()),
            }

            if let Tick::Exhausted(n) = failures.on_timeout() {
                log::warn!("[rdt:send] FIN not acknowledged after {n} attempts; closing anyway");
                break;
            }
        }

        sender.close();
        Ok(())
    }

    async fn run_receiver(
        &self,
        stats: &mut TransferStats,
    ) -> Result<(Vec<u8>, SocketAddr), RdtError> {
        let mut receiver = GbnReceiver::new();
        let mut retries = self.policy.idle_counter();
        log::info!("[rdt:recv] ready to receive");

        loop {
            let (raw, from) = match self
                .transport
                .recv_timeout(RECV_BUF_LEN, self.policy.timeout)
                .await
            {
                Ok(received) => received,
                Err(TransportError::Timeout) => match retries.on_timeout() {
                    Tick::Idle => continue,
                    Tick::Retry(n) => {
                        stats.timeouts += 1;
                        log::info!("[rdt:recv] timed out, count={n}");
                        continue;
                    }
                    Tick::Exhausted(n) => {
                        stats.timeouts += 1;
                        log::warn!(
                            "[rdt:recv] gave up after {n} timeouts, expected #{}",
                            receiver.expected()
                        );
                        return Err(RdtError::ConnectionAborted {
                            phase: Phase::Receive,
                            retries: n,
                        });
                    }
                },
                Err(e) => return Err(e.into()),
            };
            retries.on_receipt();

            match receiver.on_datagram(&raw) {
                Delivery::Accepted { seq_num, len } => {
                    log::debug!("[rdt:recv] ← DATA #{seq_num} len={len} accepted");
                }
                Delivery::OutOfOrder { seq_num } => {
                    stats.unexpected += 1;
                    log::debug!(
                        "[rdt:recv] ← #{seq_num} discarded, expected #{}",
                        receiver.expected()
                    );
                }
                Delivery::Malformed(e) => {
                    stats.malformed += 1;
                    log::debug!("[rdt:recv] corrupted segment discarded: {e}");
                }
                Delivery::Finished { seq_num } => {
                    log::debug!("[rdt:recv] ← FIN #{seq_num}");
                }
            }

            self.transport.send_to(&receiver.ack().encode(), from).await?;
            stats.acks_sent += 1;
            log::debug!("[rdt:recv] → ACK #{}", receiver.ack_number());

            if receiver.is_done() {
                log::info!(
                    "[rdt:recv] receipt finished: {} bytes from {from}",
                    receiver.data().len()
                );
                return Ok((receiver.into_data(), from));
            }
        }
    }
}
