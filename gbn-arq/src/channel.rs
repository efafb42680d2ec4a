//! Datagram channel abstraction.
//!
//! The protocol engines need exactly two things from the network: a
//! best-effort `send` and a `recv` bounded by a timeout.  The bounded wait is
//! the only suspension point of either engine and doubles as the sender's
//! retransmission timer.
//!
//! [`UdpChannel`] is the production implementation, a thin wrapper around
//! `tokio::net::UdpSocket`.  [`crate::simulator::SimChannel`] is the
//! in-memory one used by tests.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};

use crate::frame::FRAME_LEN;

/// Room for one frame plus slack, so oversized datagrams are seen as such
/// instead of being silently truncated by the kernel.
const RECV_BUF: usize = FRAME_LEN * 4;

/// Errors that can arise from channel operations.  A timeout is not one.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not resolve {0}")]
    Unresolved(String),
}

/// Outcome of a bounded receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recv {
    Datagram(Vec<u8>),
    Timeout,
}

/// A datagram transport with best-effort send and timed receive.
pub trait Channel: Send {
    /// Hand one datagram to the transport.  Success says nothing about delivery.
    fn send(&mut self, datagram: &[u8]) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Wait at most `wait` for the next datagram.
    fn recv(&mut self, wait: Duration) -> impl Future<Output = Result<Recv, ChannelError>> + Send;
}

/// A UDP endpoint that listens on one address and sends to a fixed peer.
///
/// The peer is typically a network emulator relaying frames between client
/// and server, so datagrams are accepted from any source address.
#[derive(Debug)]
pub struct UdpChannel {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    peer: SocketAddr,
    inner: UdpSocket,
}

impl UdpChannel {
    /// Bind to `listen` and direct every send to `peer`.
    ///
    /// Passing port `0` in `listen` lets the OS choose an ephemeral port.
    pub async fn bind(listen: SocketAddr, peer: SocketAddr) -> Result<Self, ChannelError> {
        let inner = UdpSocket::bind(listen).await?;
        let local_addr = inner.local_addr()?;
        log::debug!("[gbn:udp] bound {local_addr}, peer {peer}");
        Ok(Self {
            local_addr,
            peer,
            inner,
        })
    }

    /// Resolve `host:port` to the first IPv4 address, falling back to any.
    pub async fn resolve(host: &str, port: u16) -> Result<SocketAddr, ChannelError> {
        let target = format!("{host}:{port}");
        let addrs: Vec<SocketAddr> = lookup_host(target.as_str()).await?.collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .copied()
            .ok_or(ChannelError::Unresolved(target))
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Redirect subsequent sends.
    pub fn set_peer(&mut self, peer: SocketAddr) {
        log::debug!("[gbn:udp] {} now sending to {peer}", self.local_addr);
        self.peer = peer;
    }
}

impl Channel for UdpChannel {
    async fn send(&mut self, datagram: &[u8]) -> Result<(), ChannelError> {
        self.inner.send_to(datagram, self.peer).await?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> Result<Recv, ChannelError> {
        let mut buf = vec![0u8; RECV_BUF];
        match tokio::time::timeout(wait, self.inner.recv_from(&mut buf)).await {
            Ok(Ok((n, _from))) => {
                buf.truncate(n);
                Ok(Recv::Datagram(buf))
            }
            Ok(Err(e)) => Err(ChannelError::Io(e)),
            Err(_elapsed) => Ok(Recv::Timeout),
        }
    }
}
