//! netsdr-core: Core traits, types, and error definitions for netsdr.
//!
//! This crate defines the backend-agnostic abstractions the driver
//! implements. Host pipelines depend on these types without pulling in
//! the protocol engine or any socket code.
//!
//! # Key types
//!
//! - [`SdrSource`] -- the tunable-receiver contract
//! - [`Transport`] -- byte-level control channel
//! - [`Error`] / [`Result`] -- error handling
//! - [`SampleBlock`] / [`IqSample`] -- decoded stream data

pub mod error;
pub mod source;
pub mod transport;
pub mod types;

// Re-export key types at crate root for ergonomic `use netsdr_core::*`.
pub use error::{Error, Result};
pub use source::SdrSource;
pub use transport::Transport;
pub use types::{GainMode, IqSample, MetaRange, Range, SampleBlock};
