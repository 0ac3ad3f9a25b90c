//! Transport trait for the control connection.
//!
//! The [`Transport`] trait abstracts over the byte stream carrying control
//! frames to a receiver. The production implementation is a TCP socket
//! (`netsdr-transport`); tests substitute a `MockTransport` from
//! `netsdr-test-harness` so the protocol engine can be exercised without
//! hardware on the network.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a receiver's control port.
///
/// Implementations handle buffering and error mapping at the socket layer.
/// Framing (length prefixes, item codes) is handled by the protocol engine
/// that consumes this trait.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the unit.
    ///
    /// Implementations must not return until every byte has been handed to
    /// the underlying socket (looping over partial writes as needed) or an
    /// error has occurred.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the unit into the provided buffer.
    ///
    /// Returns the number of bytes actually read, which may be fewer than
    /// a full frame; callers reassemble. Waits up to `timeout` for data;
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if none
    /// arrives within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport connection.
    ///
    /// After `close()`, subsequent `send()` and `receive()` calls return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
