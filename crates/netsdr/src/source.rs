//! `NetSdrSource` -- the receiver controller façade.
//!
//! Combines the transaction engine, the stream receiver, and the
//! per-channel state cache behind the [`SdrSource`] trait. Every setter
//! follows the same protocol: validate the channel, build the command,
//! run the transaction, decode the value the unit **applied** (the unit
//! may clamp a request to its own limits and is authoritative), cache it,
//! and return it.
//!
//! Getters answer from the cache without a network round trip once a
//! value has been confirmed. A never-confirmed entry is stale: the getter
//! issues a read transaction (empty-payload command) to populate it.
//! `start()` pushes the whole cached configuration to the unit before
//! streaming begins, so the cache and the hardware agree from the first
//! sample on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use netsdr_core::error::{Error, Result};
use netsdr_core::source::SdrSource;
use netsdr_core::types::{GainMode, MetaRange, SampleBlock};

use crate::caps;
use crate::frame::{self, CommandFrame, ControlItem, ResponseFrame};
use crate::stream::{StreamReceiver, StreamStats};
use crate::transaction::TransactionChannel;

/// What a setter does when the unit is already streaming.
///
/// The hardware accepts parameter writes mid-stream; whether the host
/// wants a transient pause around them is a policy choice, not something
/// the driver guesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconfigPolicy {
    /// Apply the change while the stream keeps running.
    #[default]
    Live,
    /// Idle the unit around the change, then resume streaming.
    PauseResume,
}

/// Cached state of one receive channel.
///
/// `None` means the value has never been confirmed by the unit; the
/// first getter (or the `start()` sync) fills it in.
#[derive(Debug, Clone, Default)]
struct ChannelState {
    freq_hz: Option<u64>,
    freq_corr_ppm: Option<f64>,
    gains_db: [Option<f64>; caps::GAIN_STAGES.len()],
    gain_mode: Option<GainMode>,
    antenna: Option<u8>,
    bandwidth_hz: Option<u32>,
    sample_rate_hz: Option<u32>,
}

/// A connected NetSDR-family receiver.
///
/// Constructed via [`NetSdrBuilder`](crate::builder::NetSdrBuilder). The
/// source owns the control channel, the stream receiver, and the state
/// table exclusively; multiple sources drive multiple units without
/// cross-interference.
pub struct NetSdrSource {
    control: TransactionChannel,
    stream: StreamReceiver,
    channels: Mutex<Vec<ChannelState>>,
    nchan: usize,
    command_timeout: Duration,
    /// Local endpoint the unit streams samples to.
    data_bind: String,
    reconfig: ReconfigPolicy,
    streaming: AtomicBool,
}

impl NetSdrSource {
    /// Assemble a source from its parts. Called by the builder.
    pub(crate) fn new(
        control: TransactionChannel,
        stream: StreamReceiver,
        nchan: usize,
        command_timeout: Duration,
        data_bind: String,
        reconfig: ReconfigPolicy,
    ) -> Self {
        NetSdrSource {
            control,
            stream,
            channels: Mutex::new(vec![ChannelState::default(); nchan]),
            nchan,
            command_timeout,
            data_bind,
            reconfig,
            streaming: AtomicBool::new(false),
        }
    }

    /// Number of receive channels this source was constructed with.
    pub fn num_channels(&self) -> usize {
        self.nchan
    }

    /// Whether the unit is currently streaming samples.
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// The data socket's local address while streaming. Tests use this
    /// to aim a fake unit's sample stream.
    pub fn data_addr(&self) -> Option<std::net::SocketAddr> {
        self.stream.data_addr()
    }

    /// Stream-health counters (drops, duplicates, overflow).
    pub fn stream_stats(&self) -> StreamStats {
        self.stream.stats()
    }

    fn check_chan(&self, chan: usize) -> Result<()> {
        if chan >= self.nchan {
            return Err(Error::InvalidParameter(format!(
                "channel {} out of range (unit has {})",
                chan, self.nchan
            )));
        }
        Ok(())
    }

    /// Run a transaction and fail on NAK.
    async fn transact_ack(&self, cmd: &CommandFrame) -> Result<ResponseFrame> {
        let resp = self.control.transact(cmd, self.command_timeout).await?;
        if !resp.is_ack() {
            return Err(Error::Unsupported(format!(
                "unit rejected {:?} on channel {}",
                cmd.item, cmd.channel
            )));
        }
        Ok(resp)
    }

    /// Idle the unit before a mid-stream reconfiguration when the policy
    /// asks for it. Returns whether a resume is owed.
    async fn pause_for_reconfig(&self) -> Result<bool> {
        if self.reconfig == ReconfigPolicy::PauseResume && self.is_streaming() {
            self.transact_ack(&frame::set_receiver_state(false)).await?;
            return Ok(true);
        }
        Ok(false)
    }

    async fn resume_after_reconfig(&self, paused: bool) -> Result<()> {
        if paused {
            self.transact_ack(&frame::set_receiver_state(true)).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Start / stop
    // -----------------------------------------------------------------------

    /// Push the cached configuration to the unit, open the data socket,
    /// and command the unit to stream.
    ///
    /// Channels that were never configured are synced with the family
    /// defaults, so the unit and the cache agree before the first sample.
    /// Starting an already-streaming source is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }

        tracing::debug!(nchan = self.nchan, "Starting source: initial parameter sync");
        for chan in 0..self.nchan {
            self.sync_channel(chan).await?;
        }

        // Bind the data socket before the unit starts sending so the
        // head of the stream is not lost.
        self.stream.start(&self.data_bind).await?;
        if let Err(e) = self.transact_ack(&frame::set_receiver_state(true)).await {
            self.stream.stop().await;
            return Err(e);
        }

        self.streaming.store(true, Ordering::SeqCst);
        tracing::info!("Source streaming");
        Ok(())
    }

    /// Command the unit to idle and stop the stream receiver.
    ///
    /// The control connection stays open for reconfiguration and a later
    /// `start()`. Stopping an idle source is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if !self.is_streaming() {
            return Ok(());
        }

        self.transact_ack(&frame::set_receiver_state(false)).await?;
        self.stream.stop().await;
        self.streaming.store(false, Ordering::SeqCst);
        tracing::info!("Source idle");
        Ok(())
    }

    /// Pull up to `n` samples from the stream.
    pub async fn read_samples(&self, n: usize) -> Result<SampleBlock> {
        self.stream.pull(n).await
    }

    /// Stop streaming (best effort) and close the control connection.
    pub async fn disconnect(&self) -> Result<()> {
        if self.is_streaming() {
            // The unit may already be gone; still tear down our side.
            let _ = self.transact_ack(&frame::set_receiver_state(false)).await;
            self.stream.stop().await;
            self.streaming.store(false, Ordering::SeqCst);
        }
        self.control.disconnect().await
    }

    /// Push one channel's cached (or default) configuration as commands,
    /// re-caching every applied value.
    async fn sync_channel(&self, chan: usize) -> Result<()> {
        let snapshot = {
            let channels = self.channels.lock().await;
            channels[chan].clone()
        };
        let c = chan as u8;

        let freq = snapshot.freq_hz.unwrap_or(caps::DEFAULT_FREQ_HZ);
        let applied = frame::parse_frequency(
            &self.transact_ack(&frame::set_frequency(c, freq)).await?,
        )?;
        self.channels.lock().await[chan].freq_hz = Some(applied);

        let corr = snapshot.freq_corr_ppm.unwrap_or(0.0);
        let applied = frame::parse_freq_corr(
            &self
                .transact_ack(&frame::set_freq_corr(c, frame::ppm_to_centi(corr)))
                .await?,
        )?;
        self.channels.lock().await[chan].freq_corr_ppm = Some(frame::centi_to_ppm(applied));

        let mode = snapshot.gain_mode.unwrap_or(GainMode::Manual);
        let applied = frame::parse_gain_mode(
            &self.transact_ack(&frame::set_gain_mode(c, mode)).await?,
        )?;
        self.channels.lock().await[chan].gain_mode = Some(applied);

        for (stage, cached) in snapshot.gains_db.iter().enumerate() {
            let gain = cached.unwrap_or(0.0);
            let (applied_stage, tenths) = frame::parse_gain(
                &self
                    .transact_ack(&frame::set_gain(c, stage as u8, frame::db_to_tenths(gain)))
                    .await?,
            )?;
            self.channels.lock().await[chan].gains_db[applied_stage as usize] =
                Some(frame::tenths_to_db(tenths));
        }

        let antenna = snapshot.antenna.unwrap_or(0);
        let applied = frame::parse_antenna(
            &self.transact_ack(&frame::set_antenna(c, antenna)).await?,
        )?;
        self.channels.lock().await[chan].antenna = Some(applied);

        let bw = snapshot.bandwidth_hz.unwrap_or(caps::DEFAULT_BANDWIDTH_HZ);
        let applied = frame::parse_bandwidth(
            &self.transact_ack(&frame::set_bandwidth(c, bw)).await?,
        )?;
        self.channels.lock().await[chan].bandwidth_hz = Some(applied);

        let rate = snapshot
            .sample_rate_hz
            .unwrap_or(caps::DEFAULT_SAMPLE_RATE_HZ);
        let applied = frame::parse_sample_rate(
            &self.transact_ack(&frame::set_sample_rate(c, rate)).await?,
        )?;
        self.channels.lock().await[chan].sample_rate_hz = Some(applied);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Setters: build command, transact, cache the applied value
    // -----------------------------------------------------------------------

    /// Tune the center frequency in Hz. Returns the frequency the unit
    /// applied, which is also what later getters report.
    pub async fn set_center_freq(&self, chan: usize, freq_hz: u64) -> Result<u64> {
        self.check_chan(chan)?;
        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_frequency(chan as u8, freq_hz))
            .await?;
        let applied = frame::parse_frequency(&resp)?;
        self.channels.lock().await[chan].freq_hz = Some(applied);
        self.resume_after_reconfig(paused).await?;
        tracing::debug!(chan, freq_hz = applied, "Center frequency set");
        Ok(applied)
    }

    /// Set the frequency correction in ppm. Returns the applied value.
    pub async fn set_freq_corr(&self, chan: usize, ppm: f64) -> Result<f64> {
        self.check_chan(chan)?;
        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_freq_corr(chan as u8, frame::ppm_to_centi(ppm)))
            .await?;
        let applied = frame::centi_to_ppm(frame::parse_freq_corr(&resp)?);
        self.channels.lock().await[chan].freq_corr_ppm = Some(applied);
        self.resume_after_reconfig(paused).await?;
        Ok(applied)
    }

    /// Switch between AGC and manual gain. Returns the applied mode.
    pub async fn set_gain_mode(&self, chan: usize, mode: GainMode) -> Result<GainMode> {
        self.check_chan(chan)?;
        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_gain_mode(chan as u8, mode))
            .await?;
        let applied = frame::parse_gain_mode(&resp)?;
        self.channels.lock().await[chan].gain_mode = Some(applied);
        self.resume_after_reconfig(paused).await?;
        Ok(applied)
    }

    /// Set the overall gain in dB (maps to the RF stage). Returns the
    /// applied gain.
    pub async fn set_gain(&self, chan: usize, gain_db: f64) -> Result<f64> {
        self.set_stage_gain(chan, caps::GAIN_STAGES[0], gain_db).await
    }

    /// Set a named stage's gain in dB. Returns the applied gain.
    pub async fn set_stage_gain(&self, chan: usize, stage: &str, gain_db: f64) -> Result<f64> {
        self.check_chan(chan)?;
        let stage_idx = caps::stage_index(stage)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown gain stage '{}'", stage)))?;

        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_gain(
                chan as u8,
                stage_idx,
                frame::db_to_tenths(gain_db),
            ))
            .await?;
        let (applied_stage, tenths) = frame::parse_gain(&resp)?;
        let applied = frame::tenths_to_db(tenths);
        {
            let mut channels = self.channels.lock().await;
            if let Some(slot) = channels[chan].gains_db.get_mut(applied_stage as usize) {
                *slot = Some(applied);
            }
        }
        self.resume_after_reconfig(paused).await?;
        tracing::debug!(chan, stage, gain_db = applied, "Gain set");
        Ok(applied)
    }

    /// Select an antenna port by name. Returns the applied selection.
    pub async fn set_antenna(&self, chan: usize, antenna: &str) -> Result<String> {
        self.check_chan(chan)?;
        let port = caps::antenna_index(antenna)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown antenna '{}'", antenna)))?;

        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_antenna(chan as u8, port))
            .await?;
        let applied = frame::parse_antenna(&resp)?;
        self.channels.lock().await[chan].antenna = Some(applied);
        self.resume_after_reconfig(paused).await?;

        caps::antenna_name(applied)
            .map(str::to_string)
            .ok_or_else(|| {
                Error::MalformedFrame(format!("unit reported unknown antenna port {}", applied))
            })
    }

    /// Set the analog bandwidth in Hz. Returns the applied bandwidth.
    pub async fn set_bandwidth(&self, chan: usize, bw_hz: u32) -> Result<u32> {
        self.check_chan(chan)?;
        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_bandwidth(chan as u8, bw_hz))
            .await?;
        let applied = frame::parse_bandwidth(&resp)?;
        self.channels.lock().await[chan].bandwidth_hz = Some(applied);
        self.resume_after_reconfig(paused).await?;
        Ok(applied)
    }

    /// Set the output sample rate in Hz. Returns the applied rate.
    pub async fn set_sample_rate(&self, chan: usize, rate: u32) -> Result<u32> {
        self.check_chan(chan)?;
        let paused = self.pause_for_reconfig().await?;
        let resp = self
            .transact_ack(&frame::set_sample_rate(chan as u8, rate))
            .await?;
        let applied = frame::parse_sample_rate(&resp)?;
        self.channels.lock().await[chan].sample_rate_hz = Some(applied);
        self.resume_after_reconfig(paused).await?;
        Ok(applied)
    }

    // -----------------------------------------------------------------------
    // Getters: cache first, read transaction only for stale entries
    // -----------------------------------------------------------------------

    /// The cached center frequency in Hz.
    pub async fn center_freq(&self, chan: usize) -> Result<u64> {
        self.check_chan(chan)?;
        if let Some(v) = self.channels.lock().await[chan].freq_hz {
            return Ok(v);
        }
        let resp = self
            .transact_ack(&frame::read_item(ControlItem::Frequency, chan as u8))
            .await?;
        let v = frame::parse_frequency(&resp)?;
        self.channels.lock().await[chan].freq_hz = Some(v);
        Ok(v)
    }

    /// The cached frequency correction in ppm.
    pub async fn freq_corr(&self, chan: usize) -> Result<f64> {
        self.check_chan(chan)?;
        if let Some(v) = self.channels.lock().await[chan].freq_corr_ppm {
            return Ok(v);
        }
        let resp = self
            .transact_ack(&frame::read_item(ControlItem::FreqCorrection, chan as u8))
            .await?;
        let v = frame::centi_to_ppm(frame::parse_freq_corr(&resp)?);
        self.channels.lock().await[chan].freq_corr_ppm = Some(v);
        Ok(v)
    }

    /// The cached gain mode.
    pub async fn gain_mode(&self, chan: usize) -> Result<GainMode> {
        self.check_chan(chan)?;
        if let Some(v) = self.channels.lock().await[chan].gain_mode {
            return Ok(v);
        }
        let resp = self
            .transact_ack(&frame::read_item(ControlItem::GainMode, chan as u8))
            .await?;
        let v = frame::parse_gain_mode(&resp)?;
        self.channels.lock().await[chan].gain_mode = Some(v);
        Ok(v)
    }

    /// The cached overall gain in dB (the RF stage).
    pub async fn gain(&self, chan: usize) -> Result<f64> {
        self.stage_gain(chan, caps::GAIN_STAGES[0]).await
    }

    /// The cached gain of a named stage in dB.
    pub async fn stage_gain(&self, chan: usize, stage: &str) -> Result<f64> {
        self.check_chan(chan)?;
        let stage_idx = caps::stage_index(stage)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown gain stage '{}'", stage)))?;

        if let Some(v) = self.channels.lock().await[chan].gains_db[stage_idx as usize] {
            return Ok(v);
        }
        let resp = self
            .transact_ack(&frame::read_gain(chan as u8, stage_idx))
            .await?;
        let (applied_stage, tenths) = frame::parse_gain(&resp)?;
        let v = frame::tenths_to_db(tenths);
        if let Some(slot) = self.channels.lock().await[chan]
            .gains_db
            .get_mut(applied_stage as usize)
        {
            *slot = Some(v);
        }
        Ok(v)
    }

    /// The cached antenna selection.
    pub async fn antenna(&self, chan: usize) -> Result<String> {
        self.check_chan(chan)?;
        let cached = self.channels.lock().await[chan].antenna;
        let port = match cached {
            Some(p) => p,
            None => {
                let resp = self
                    .transact_ack(&frame::read_item(ControlItem::Antenna, chan as u8))
                    .await?;
                let p = frame::parse_antenna(&resp)?;
                self.channels.lock().await[chan].antenna = Some(p);
                p
            }
        };
        caps::antenna_name(port).map(str::to_string).ok_or_else(|| {
            Error::MalformedFrame(format!("unit reported unknown antenna port {}", port))
        })
    }

    /// The cached analog bandwidth in Hz.
    pub async fn bandwidth(&self, chan: usize) -> Result<u32> {
        self.check_chan(chan)?;
        if let Some(v) = self.channels.lock().await[chan].bandwidth_hz {
            return Ok(v);
        }
        let resp = self
            .transact_ack(&frame::read_item(ControlItem::Bandwidth, chan as u8))
            .await?;
        let v = frame::parse_bandwidth(&resp)?;
        self.channels.lock().await[chan].bandwidth_hz = Some(v);
        Ok(v)
    }

    /// The cached sample rate in Hz.
    pub async fn sample_rate(&self, chan: usize) -> Result<u32> {
        self.check_chan(chan)?;
        if let Some(v) = self.channels.lock().await[chan].sample_rate_hz {
            return Ok(v);
        }
        let resp = self
            .transact_ack(&frame::read_item(ControlItem::SampleRate, chan as u8))
            .await?;
        let v = frame::parse_sample_rate(&resp)?;
        self.channels.lock().await[chan].sample_rate_hz = Some(v);
        Ok(v)
    }
}

#[async_trait]
impl SdrSource for NetSdrSource {
    fn num_channels(&self) -> usize {
        self.nchan
    }

    async fn start(&self) -> Result<()> {
        NetSdrSource::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        NetSdrSource::stop(self).await
    }

    async fn read_samples(&self, n: usize) -> Result<SampleBlock> {
        NetSdrSource::read_samples(self, n).await
    }

    async fn set_sample_rate(&self, chan: usize, rate: u32) -> Result<u32> {
        NetSdrSource::set_sample_rate(self, chan, rate).await
    }

    async fn sample_rate(&self, chan: usize) -> Result<u32> {
        NetSdrSource::sample_rate(self, chan).await
    }

    fn sample_rate_range(&self) -> MetaRange {
        caps::sample_rates()
    }

    async fn set_center_freq(&self, chan: usize, freq_hz: u64) -> Result<u64> {
        NetSdrSource::set_center_freq(self, chan, freq_hz).await
    }

    async fn center_freq(&self, chan: usize) -> Result<u64> {
        NetSdrSource::center_freq(self, chan).await
    }

    fn freq_range(&self, _chan: usize) -> MetaRange {
        caps::freq_range()
    }

    async fn set_freq_corr(&self, chan: usize, ppm: f64) -> Result<f64> {
        NetSdrSource::set_freq_corr(self, chan, ppm).await
    }

    async fn freq_corr(&self, chan: usize) -> Result<f64> {
        NetSdrSource::freq_corr(self, chan).await
    }

    fn gain_stages(&self, _chan: usize) -> Vec<String> {
        caps::GAIN_STAGES.iter().map(|s| s.to_string()).collect()
    }

    fn gain_range(&self, _chan: usize) -> MetaRange {
        caps::gain_range()
    }

    fn stage_gain_range(&self, _chan: usize, stage: &str) -> Result<MetaRange> {
        caps::stage_gain_range(stage)
            .ok_or_else(|| Error::InvalidParameter(format!("unknown gain stage '{}'", stage)))
    }

    async fn set_gain_mode(&self, chan: usize, mode: GainMode) -> Result<GainMode> {
        NetSdrSource::set_gain_mode(self, chan, mode).await
    }

    async fn gain_mode(&self, chan: usize) -> Result<GainMode> {
        NetSdrSource::gain_mode(self, chan).await
    }

    async fn set_gain(&self, chan: usize, gain_db: f64) -> Result<f64> {
        NetSdrSource::set_gain(self, chan, gain_db).await
    }

    async fn gain(&self, chan: usize) -> Result<f64> {
        NetSdrSource::gain(self, chan).await
    }

    async fn set_stage_gain(&self, chan: usize, stage: &str, gain_db: f64) -> Result<f64> {
        NetSdrSource::set_stage_gain(self, chan, stage, gain_db).await
    }

    async fn stage_gain(&self, chan: usize, stage: &str) -> Result<f64> {
        NetSdrSource::stage_gain(self, chan, stage).await
    }

    fn antennas(&self, _chan: usize) -> Vec<String> {
        caps::ANTENNAS.iter().map(|a| a.to_string()).collect()
    }

    async fn set_antenna(&self, chan: usize, antenna: &str) -> Result<String> {
        NetSdrSource::set_antenna(self, chan, antenna).await
    }

    async fn antenna(&self, chan: usize) -> Result<String> {
        NetSdrSource::antenna(self, chan).await
    }

    async fn set_bandwidth(&self, chan: usize, bw_hz: u32) -> Result<u32> {
        NetSdrSource::set_bandwidth(self, chan, bw_hz).await
    }

    async fn bandwidth(&self, chan: usize) -> Result<u32> {
        NetSdrSource::bandwidth(self, chan).await
    }

    fn bandwidth_range(&self, _chan: usize) -> MetaRange {
        caps::bandwidths()
    }
}
