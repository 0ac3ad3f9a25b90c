//! netsdr-test-harness: Test utilities for the netsdr driver.
//!
//! This crate provides [`MockTransport`] for deterministic unit testing
//! of the protocol engine without a unit on the network, and
//! [`FakeDevice`], a real TCP + UDP fake receiver that speaks the wire
//! protocol for integration tests.

pub mod fake_device;
pub mod mock_transport;

pub use fake_device::{FakeDevice, FakeDeviceOptions};
pub use mock_transport::MockTransport;
