//! `NetSdrBuilder` -- fluent builder for constructing [`NetSdrSource`]s.
//!
//! Separates configuration (addresses, channel count, timeouts, stream
//! policies) from construction, so a source arrives fully validated and
//! connected or not at all.
//!
//! # Example
//!
//! ```no_run
//! use netsdr::NetSdrBuilder;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let source = NetSdrBuilder::new()
//!     .host("192.168.1.50")
//!     .channels(2)
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::Transport;

use crate::caps;
use crate::discovery::DiscoveredDevice;
use crate::source::{NetSdrSource, ReconfigPolicy};
use crate::stream::{OverflowPolicy, StreamReceiver, DEFAULT_QUEUE_CAPACITY};
use crate::transaction::TransactionChannel;

/// Default control TCP port.
const DEFAULT_CONTROL_PORT: u16 = 50000;

/// Default local endpoint the unit streams samples to.
const DEFAULT_DATA_BIND: &str = "0.0.0.0:50000";

/// Default control connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default per-transaction timeout.
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

/// Fluent builder for [`NetSdrSource`].
///
/// Every knob has a sensible default; the minimum viable configuration
/// is a host address.
pub struct NetSdrBuilder {
    host: Option<String>,
    control_port: u16,
    data_bind: String,
    nchan: usize,
    connect_timeout: Duration,
    command_timeout: Duration,
    retries: u32,
    queue_capacity: usize,
    overflow: OverflowPolicy,
    reconfig: ReconfigPolicy,
}

impl NetSdrBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        NetSdrBuilder {
            host: None,
            control_port: DEFAULT_CONTROL_PORT,
            data_bind: DEFAULT_DATA_BIND.to_string(),
            nchan: 1,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retries: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
            reconfig: ReconfigPolicy::default(),
        }
    }

    /// Set the unit's IP address or hostname.
    pub fn host(mut self, host: &str) -> Self {
        self.host = Some(host.to_string());
        self
    }

    /// Set the control TCP port (default: 50000).
    pub fn control_port(mut self, port: u16) -> Self {
        self.control_port = port;
        self
    }

    /// Set the local endpoint the unit streams samples to
    /// (default: `0.0.0.0:50000`). Tests use port 0.
    pub fn data_bind(mut self, bind: &str) -> Self {
        self.data_bind = bind.to_string();
        self
    }

    /// Set the number of receive channels to drive (default: 1).
    pub fn channels(mut self, nchan: usize) -> Self {
        self.nchan = nchan;
        self
    }

    /// Set the control connect timeout (default: 5 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-transaction timeout (default: 1 s).
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set extra attempts after a timed-out transaction (default: 0).
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the sample queue bound in samples (default: 262144).
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set what the receive loop does when the host pulls too slowly
    /// (default: [`OverflowPolicy::DropOldest`]).
    pub fn overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }

    /// Set how setters behave while the unit is streaming
    /// (default: [`ReconfigPolicy::Live`]).
    pub fn reconfig_policy(mut self, policy: ReconfigPolicy) -> Self {
        self.reconfig = policy;
        self
    }

    /// Configure the builder from a discovered unit: host, control port,
    /// and channel count are taken from the descriptor.
    pub fn device(mut self, device: &DiscoveredDevice) -> Self {
        self.host = Some(device.ip.to_string());
        self.control_port = device.port;
        self.nchan = device.channels.clamp(1, caps::MAX_CHANNELS);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.nchan == 0 || self.nchan > caps::MAX_CHANNELS {
            return Err(Error::InvalidParameter(format!(
                "channel count {} outside 1..={}",
                self.nchan,
                caps::MAX_CHANNELS
            )));
        }
        Ok(())
    }

    /// Connect to the unit and build the source.
    ///
    /// Fails with [`Error::InvalidParameter`] on bad configuration and
    /// [`Error::Connect`] when the unit is unreachable -- construction
    /// failures are reported before the source exists.
    pub async fn build(self) -> Result<NetSdrSource> {
        self.validate()?;
        let host = self
            .host
            .as_deref()
            .ok_or_else(|| Error::InvalidParameter("no host configured".into()))?;

        let addr = format!("{}:{}", host, self.control_port);
        let control = TransactionChannel::connect(&addr, self.connect_timeout)
            .await?
            .with_retries(self.retries);

        Ok(self.assemble(control))
    }

    /// Build the source over a pre-established transport.
    ///
    /// This is the test seam: a mock transport or an accepted stream
    /// takes the place of the TCP connection.
    pub fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<NetSdrSource> {
        self.validate()?;
        let control = TransactionChannel::from_transport(transport).with_retries(self.retries);
        Ok(self.assemble(control))
    }

    fn assemble(self, control: TransactionChannel) -> NetSdrSource {
        let stream = StreamReceiver::new(self.queue_capacity, self.overflow);
        NetSdrSource::new(
            control,
            stream,
            self.nchan,
            self.command_timeout,
            self.data_bind,
            self.reconfig,
        )
    }
}

impl Default for NetSdrBuilder {
    fn default() -> Self {
        Self::new()
    }
}
