//! UDP transport for discovery and the sample stream.
//!
//! [`UdpTransport`] wraps a [`tokio::net::UdpSocket`] with error mapping
//! consistent with the rest of the transport layer. It deliberately does
//! **not** implement the [`Transport`](netsdr_core::Transport) trait:
//! that trait models the stream-oriented control connection, while UDP is
//! connectionless and datagram-based.
//!
//! Used for:
//! - discovery broadcasts (query out, descriptor replies in)
//! - the I/Q data stream from a running unit

use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;

use netsdr_core::error::{Error, Result};

/// UDP transport for datagram-based communication with a unit.
#[derive(Debug)]
pub struct UdpTransport {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// The local address the socket is bound to.
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind to a local address.
    ///
    /// Use `"0.0.0.0:0"` for any available port, or a fixed port like
    /// `"0.0.0.0:50000"` when the unit streams to a well-known port.
    pub async fn bind(addr: &str) -> Result<Self> {
        tracing::debug!(addr = %addr, "Binding UDP socket");

        let socket = UdpSocket::bind(addr).await.map_err(|e| {
            tracing::error!(addr = %addr, error = %e, "Failed to bind UDP socket");
            Error::Io(e)
        })?;

        let local_addr = socket.local_addr().map_err(Error::Io)?;
        tracing::debug!(local_addr = %local_addr, "UDP socket bound");

        Ok(Self { socket, local_addr })
    }

    /// Bind to a specific port on all interfaces.
    pub async fn bind_port(port: u16) -> Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port)).await
    }

    /// The local address this socket is bound to.
    ///
    /// Useful when binding to port 0 to discover the assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a datagram to the specified address.
    ///
    /// The entire slice is sent as one datagram; it arrives in full or
    /// not at all.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> Result<()> {
        tracing::trace!(
            local = %self.local_addr,
            remote = %addr,
            bytes = data.len(),
            "Sending datagram"
        );

        self.socket.send_to(data, addr).await.map_err(|e| {
            tracing::error!(local = %self.local_addr, remote = %addr, error = %e, "Datagram send failed");
            Error::Io(e)
        })?;

        Ok(())
    }

    /// Receive a datagram with timeout. Returns `(bytes_read, source_addr)`.
    ///
    /// The buffer should hold an entire datagram; excess bytes are
    /// discarded by the socket layer. 8192 bytes comfortably covers the
    /// unit's largest data packets.
    pub async fn recv_from(&self, buf: &mut [u8], timeout: Duration) -> Result<(usize, SocketAddr)> {
        let result = tokio::time::timeout(timeout, self.socket.recv_from(buf)).await;

        match result {
            Ok(Ok((n, src))) => {
                tracing::trace!(local = %self.local_addr, remote = %src, bytes = n, "Received datagram");
                Ok((n, src))
            }
            Ok(Err(e)) => {
                tracing::error!(local = %self.local_addr, error = %e, "Datagram receive failed");
                Err(Error::Io(e))
            }
            Err(_) => Err(Error::Timeout),
        }
    }

    /// Receive a datagram with timeout, ignoring the source address.
    pub async fn recv(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let (n, _src) = self.recv_from(buf, timeout).await?;
        Ok(n)
    }

    /// Receive a datagram without a deadline.
    ///
    /// Used by the stream receive loop, which is cancelled by aborting
    /// its task rather than by a per-read timeout.
    pub async fn recv_blocking(&self, buf: &mut [u8]) -> Result<usize> {
        let (n, _src) = self.socket.recv_from(buf).await.map_err(Error::Io)?;
        Ok(n)
    }

    /// Enable or disable broadcast on this socket.
    ///
    /// Must be enabled before sending the discovery query to
    /// `255.255.255.255`.
    pub fn set_broadcast(&self, enable: bool) -> Result<()> {
        tracing::debug!(local = %self.local_addr, enable = enable, "Setting broadcast");
        self.socket.set_broadcast(enable).map_err(Error::Io)
    }

    /// Connect this socket to a specific remote address.
    ///
    /// After connecting, datagrams from other sources are filtered by the
    /// OS. Used on the data socket so only the unit being driven can feed
    /// the sample stream. No handshake is performed.
    pub async fn connect(&self, addr: SocketAddr) -> Result<()> {
        tracing::debug!(local = %self.local_addr, remote = %addr, "Connecting UDP socket");
        self.socket.connect(addr).await.map_err(Error::Io)
    }
}
