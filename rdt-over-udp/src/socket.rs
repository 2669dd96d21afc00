//! Datagram transport abstraction.
//!
//! The protocol core only needs two things from the network: fire-and-forget
//! sends and a receive bounded by a deadline.  [`Transport`] captures that
//! contract; [`Socket`] is a thin wrapper around `tokio::net::UdpSocket`
//! that implements it, and [`crate::simulator::Simulator`] wraps any other
//! transport to inject faults.  All protocol logic lives elsewhere; this
//! module owns only byte I/O.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;

/// Errors that can arise from transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Nothing arrived before the deadline.
    #[error("receive timed out")]
    Timeout,
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An unreliable, connectionless datagram endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one datagram to `dest`.  Delivery is not guaranteed.
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError>;

    /// Wait for the next datagram; returns its length and source address.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError>;

    /// Receive at most `max_bytes`, giving up with
    /// [`TransportError::Timeout`] after `timeout`.
    async fn recv_timeout(
        &self,
        max_bytes: usize,
        timeout: Duration,
    ) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let mut buf = vec![0u8; max_bytes];
        let received = tokio::time::timeout(timeout, self.recv_from(&mut buf)).await;
        match received {
            Ok(Ok((n, addr))) => {
                buf.truncate(n);
                Ok((buf, addr))
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Err(TransportError::Timeout),
        }
    }
}

/// An async UDP socket.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

#[async_trait]
impl Transport for Socket {
    async fn send_to(&self, buf: &[u8], dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(buf, dest).await?;
        Ok(())
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        Ok(self.inner.recv_from(buf).await?)
    }
}
