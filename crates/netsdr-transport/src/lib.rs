//! Transport implementations for netsdr.
//!
//! This crate provides the concrete socket layers the driver runs on:
//!
//! - [`TcpTransport`]: the stream-oriented control connection, implementing
//!   the [`Transport`](netsdr_core::Transport) trait from `netsdr-core`
//! - [`UdpTransport`]: datagram sockets for discovery broadcasts and the
//!   I/Q sample stream
//!
//! # Example
//!
//! ```no_run
//! use netsdr_transport::TcpTransport;
//! use netsdr_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let mut transport = TcpTransport::connect("192.168.1.50:50000").await?;
//!
//! // Send an encoded control frame.
//! transport.send(&[0x0D, 0x00, 0x20, 0x00, 0x00, 0, 0, 0, 0, 0, 0, 0, 0]).await?;
//!
//! // Receive response bytes.
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::TcpTransport;
pub use udp::UdpTransport;
