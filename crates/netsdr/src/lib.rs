//! # netsdr -- Network SDR Receiver Control for Rust
//!
//! `netsdr` is an asynchronous driver for NetSDR-family networked
//! software-defined-radio receivers. It discovers units on the LAN,
//! drives the binary command/response control protocol over TCP, and
//! streams I/Q samples from the UDP data channel into a pull-based
//! interface for host DSP pipelines.
//!
//! ## Quick Start
//!
//! Add `netsdr` to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! netsdr = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! Connect to a unit, tune it, and pull samples:
//!
//! ```no_run
//! use netsdr::NetSdrBuilder;
//!
//! #[tokio::main]
//! async fn main() -> netsdr_core::Result<()> {
//!     let source = NetSdrBuilder::new()
//!         .host("192.168.1.50")
//!         .build()
//!         .await?;
//!
//!     let applied = source.set_center_freq(0, 7_074_000).await?;
//!     println!("tuned to {} Hz", applied);
//!
//!     source.start().await?;
//!     let block = source.read_samples(4096).await?;
//!     println!("{} samples, {} gaps", block.len(), block.drop_events);
//!     source.stop().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The driver is organized as a workspace of focused crates:
//!
//! | Crate                 | Purpose                                         |
//! |-----------------------|-------------------------------------------------|
//! | `netsdr-core`         | Traits ([`SdrSource`], `Transport`), types, errors |
//! | `netsdr-transport`    | TCP control and UDP data/discovery sockets      |
//! | **`netsdr`**          | This crate: codec, transactions, discovery, streaming, the source façade |
//! | `netsdr-test-harness` | Mock transport and a fake unit for tests        |
//!
//! Within this crate:
//!
//! - [`frame`] -- pure control-frame codec (no I/O)
//! - [`datagram`] -- pure sample-packet parser
//! - [`transaction`] -- serialized command/response exchanges
//! - [`discovery`] -- LAN enumeration, usable before any source exists
//! - [`stream`] -- the data-channel receive loop and sample queue
//! - [`source`] -- [`NetSdrSource`], the [`SdrSource`] implementation
//! - [`caps`] -- static capability tables
//!
//! ## Protocol constraints
//!
//! The control protocol carries no transaction IDs: responses are
//! matched to requests by item code + channel alone, so exactly one
//! transaction may be outstanding per connection. The driver enforces
//! this by serializing concurrent callers rather than pretending the
//! wire supports more; see [`transaction::TransactionChannel`].
//!
//! Sample loss on the data channel is detected only through sequence
//! gaps and is never fatal: gaps are counted and surfaced through
//! [`stream::StreamStats`] and
//! [`SampleBlock::drop_events`](netsdr_core::SampleBlock).

pub mod builder;
pub mod caps;
pub mod datagram;
pub mod discovery;
pub mod frame;
pub mod source;
pub mod stream;
pub mod transaction;

pub use builder::NetSdrBuilder;
pub use discovery::{discover, DiscoveredDevice};
pub use source::{NetSdrSource, ReconfigPolicy};
pub use stream::{OverflowPolicy, StreamReceiver, StreamStats};
pub use transaction::TransactionChannel;

// Re-export the core contract so `use netsdr::SdrSource` works without a
// separate netsdr-core dependency.
pub use netsdr_core::{Error, GainMode, IqSample, MetaRange, Result, SampleBlock, SdrSource};
