//! The `SdrSource` trait -- the tunable-receiver contract.
//!
//! Host pipelines program against `dyn SdrSource` so the same scheduling
//! and demodulation code works with any receiver backend that implements
//! the contract. The `netsdr` crate provides the NetSDR-family
//! implementation.
//!
//! Setters return the value the unit actually applied, which may differ
//! from the requested value when the hardware clamps to its own limits.
//! Getters read the driver's cached channel state and normally do not
//! touch the network.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{GainMode, MetaRange, SampleBlock};

/// Unified asynchronous interface to a multi-channel receiver.
///
/// Channels are indexed `0..num_channels()`. All setters and getters take
/// a channel index; range and capability queries are answered from static
/// device tables and are synchronous.
#[async_trait]
pub trait SdrSource: Send + Sync {
    /// Number of independently tunable receive channels.
    fn num_channels(&self) -> usize;

    /// Begin streaming: push the cached channel configuration to the unit,
    /// then start the sample stream.
    async fn start(&self) -> Result<()>;

    /// Stop streaming. The control connection stays open so the unit can
    /// be reconfigured and restarted.
    async fn stop(&self) -> Result<()>;

    /// Pull up to `n` samples from the stream, blocking until enough have
    /// arrived or the receiver stops.
    async fn read_samples(&self, n: usize) -> Result<SampleBlock>;

    /// Set the sample rate in Hz. Returns the applied rate.
    async fn set_sample_rate(&self, chan: usize, rate: u32) -> Result<u32>;

    /// Get the cached sample rate in Hz.
    async fn sample_rate(&self, chan: usize) -> Result<u32>;

    /// Sample rates supported by the unit.
    fn sample_rate_range(&self) -> MetaRange;

    /// Tune the center frequency in Hz. Returns the applied frequency.
    async fn set_center_freq(&self, chan: usize, freq_hz: u64) -> Result<u64>;

    /// Get the cached center frequency in Hz.
    async fn center_freq(&self, chan: usize) -> Result<u64>;

    /// Tunable frequency span of the unit.
    fn freq_range(&self, chan: usize) -> MetaRange;

    /// Set the frequency correction in ppm. Returns the applied value.
    async fn set_freq_corr(&self, chan: usize, ppm: f64) -> Result<f64>;

    /// Get the cached frequency correction in ppm.
    async fn freq_corr(&self, chan: usize) -> Result<f64>;

    /// Names of the unit's gain stages, in signal-path order.
    fn gain_stages(&self, chan: usize) -> Vec<String>;

    /// Overall gain span of the unit.
    fn gain_range(&self, chan: usize) -> MetaRange;

    /// Gain span of a named stage.
    fn stage_gain_range(&self, chan: usize, stage: &str) -> Result<MetaRange>;

    /// Switch between AGC and manual gain. Returns the applied mode.
    async fn set_gain_mode(&self, chan: usize, mode: GainMode) -> Result<GainMode>;

    /// Get the cached gain mode.
    async fn gain_mode(&self, chan: usize) -> Result<GainMode>;

    /// Set the overall gain in dB. Returns the applied gain.
    async fn set_gain(&self, chan: usize, gain_db: f64) -> Result<f64>;

    /// Get the cached overall gain in dB.
    async fn gain(&self, chan: usize) -> Result<f64>;

    /// Set the gain of a named stage in dB. Returns the applied gain.
    async fn set_stage_gain(&self, chan: usize, stage: &str, gain_db: f64) -> Result<f64>;

    /// Get the cached gain of a named stage in dB.
    async fn stage_gain(&self, chan: usize, stage: &str) -> Result<f64>;

    /// Names of the unit's antenna ports.
    fn antennas(&self, chan: usize) -> Vec<String>;

    /// Select an antenna port by name. Returns the applied selection.
    async fn set_antenna(&self, chan: usize, antenna: &str) -> Result<String>;

    /// Get the cached antenna selection.
    async fn antenna(&self, chan: usize) -> Result<String>;

    /// Set the analog bandwidth in Hz. Returns the applied bandwidth.
    async fn set_bandwidth(&self, chan: usize, bw_hz: u32) -> Result<u32>;

    /// Get the cached analog bandwidth in Hz.
    async fn bandwidth(&self, chan: usize) -> Result<u32>;

    /// Bandwidths supported by the unit.
    fn bandwidth_range(&self, chan: usize) -> MetaRange;
}
