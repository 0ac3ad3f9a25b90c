//! Core types used throughout the netsdr workspace.
//!
//! These types are protocol-agnostic: they describe tunable parameters,
//! capability ranges, and decoded sample data without reference to the
//! wire encoding used to carry them.

use std::fmt;
use std::str::FromStr;

/// Gain control mode of a receive channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GainMode {
    /// The unit's AGC sets the gain; manual gain commands are ignored
    /// until manual mode is restored.
    Auto,
    /// Gain follows the values set through the gain commands.
    Manual,
}

impl GainMode {
    /// Returns `true` for [`GainMode::Auto`].
    pub fn is_auto(&self) -> bool {
        matches!(self, GainMode::Auto)
    }
}

impl fmt::Display for GainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GainMode::Auto => write!(f, "auto"),
            GainMode::Manual => write!(f, "manual"),
        }
    }
}

/// Error returned when a string cannot be parsed into a [`GainMode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGainModeError(String);

impl fmt::Display for ParseGainModeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown gain mode: '{}'. Expected: auto, manual", self.0)
    }
}

impl std::error::Error for ParseGainModeError {}

impl FromStr for GainMode {
    type Err = ParseGainModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" | "agc" => Ok(GainMode::Auto),
            "manual" => Ok(GainMode::Manual),
            _ => Err(ParseGainModeError(s.to_string())),
        }
    }
}

/// A single complex baseband sample.
///
/// Decoded from the unit's 16-bit interleaved I/Q wire format into
/// normalized floats in the range [-1.0, 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqSample {
    /// In-phase component.
    pub i: f32,
    /// Quadrature component.
    pub q: f32,
}

impl IqSample {
    /// Scale factor between the wire's signed 16-bit integers and the
    /// normalized float representation.
    pub const SCALE: f32 = 1.0 / 32768.0;

    /// Decode a sample from raw signed 16-bit I and Q values.
    pub fn from_raw(i: i16, q: i16) -> Self {
        IqSample {
            i: i as f32 * Self::SCALE,
            q: q as f32 * Self::SCALE,
        }
    }
}

/// A contiguous, ordered run of decoded samples handed to the host.
///
/// Produced by the stream receiver's `pull`; consumed exactly once.
/// `drop_events` reports how many sequence gaps were observed since the
/// previous pull, so continuity is always visible to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    /// Decoded samples in arrival order.
    pub samples: Vec<IqSample>,
    /// Sequence-gap events observed since the previous pull.
    pub drop_events: u64,
    /// Set when the block is shorter than requested because the receiver
    /// stopped while the pull was waiting.
    pub underrun: bool,
}

impl SampleBlock {
    /// Number of samples in the block.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the block contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// A contiguous span of valid values for a tunable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    /// Lowest valid value.
    pub min: f64,
    /// Highest valid value.
    pub max: f64,
    /// Granularity between valid values; 0.0 means continuous.
    pub step: f64,
}

impl Range {
    /// Create a continuous range.
    pub fn new(min: f64, max: f64) -> Self {
        Range {
            min,
            max,
            step: 0.0,
        }
    }

    /// Create a stepped range.
    pub fn with_step(min: f64, max: f64, step: f64) -> Self {
        Range { min, max, step }
    }

    /// Whether `value` falls inside this span (step is not checked).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp `value` into this span.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.step > 0.0 {
            write!(f, "[{}, {}] step {}", self.min, self.max, self.step)
        } else {
            write!(f, "[{}, {}]", self.min, self.max)
        }
    }
}

/// A capability table: one or more [`Range`]s describing the valid values
/// of a parameter (frequency, gain, bandwidth, sample rate).
///
/// Multiple spans model units whose tuning is split across bands or whose
/// rates form a discrete list (each list entry a zero-width span).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaRange {
    ranges: Vec<Range>,
}

impl MetaRange {
    /// Create a capability table from its spans.
    pub fn new(ranges: Vec<Range>) -> Self {
        MetaRange { ranges }
    }

    /// A table holding a single continuous span.
    pub fn single(min: f64, max: f64) -> Self {
        MetaRange {
            ranges: vec![Range::new(min, max)],
        }
    }

    /// A table of discrete values (each a zero-width span).
    pub fn discrete(values: &[f64]) -> Self {
        MetaRange {
            ranges: values.iter().map(|&v| Range::new(v, v)).collect(),
        }
    }

    /// The individual spans of this table.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Lowest value across all spans.
    pub fn min(&self) -> f64 {
        self.ranges
            .iter()
            .map(|r| r.min)
            .fold(f64::INFINITY, f64::min)
    }

    /// Highest value across all spans.
    pub fn max(&self) -> f64 {
        self.ranges
            .iter()
            .map(|r| r.max)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Whether any span contains `value`.
    pub fn contains(&self, value: f64) -> bool {
        self.ranges.iter().any(|r| r.contains(value))
    }

    /// Clamp `value` to the nearest point covered by the table.
    pub fn clamp(&self, value: f64) -> f64 {
        if self.contains(value) {
            return value;
        }
        let mut best = self.min();
        let mut best_dist = f64::INFINITY;
        for r in &self.ranges {
            let candidate = r.clamp(value);
            let dist = (candidate - value).abs();
            if dist < best_dist {
                best = candidate;
                best_dist = dist;
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_mode_display_and_parse() {
        assert_eq!(GainMode::Auto.to_string(), "auto");
        assert_eq!(GainMode::Manual.to_string(), "manual");
        assert_eq!("auto".parse::<GainMode>().unwrap(), GainMode::Auto);
        assert_eq!("AGC".parse::<GainMode>().unwrap(), GainMode::Auto);
        assert_eq!("Manual".parse::<GainMode>().unwrap(), GainMode::Manual);
        assert!("fast".parse::<GainMode>().is_err());
    }

    #[test]
    fn iq_sample_from_raw() {
        let s = IqSample::from_raw(16384, -16384);
        assert_eq!(s.i, 0.5);
        assert_eq!(s.q, -0.5);

        let full = IqSample::from_raw(i16::MIN, 0);
        assert_eq!(full.i, -1.0);
        assert_eq!(full.q, 0.0);
    }

    #[test]
    fn sample_block_len() {
        let block = SampleBlock {
            samples: vec![IqSample::from_raw(0, 0); 3],
            drop_events: 0,
            underrun: false,
        };
        assert_eq!(block.len(), 3);
        assert!(!block.is_empty());

        let empty = SampleBlock {
            samples: Vec::new(),
            drop_events: 1,
            underrun: true,
        };
        assert!(empty.is_empty());
    }

    #[test]
    fn range_contains_and_clamp() {
        let r = Range::new(100.0, 200.0);
        assert!(r.contains(100.0));
        assert!(r.contains(200.0));
        assert!(!r.contains(99.9));
        assert_eq!(r.clamp(50.0), 100.0);
        assert_eq!(r.clamp(250.0), 200.0);
        assert_eq!(r.clamp(150.0), 150.0);
    }

    #[test]
    fn range_display() {
        assert_eq!(Range::new(1.0, 2.0).to_string(), "[1, 2]");
        assert_eq!(Range::with_step(0.0, 30.0, 10.0).to_string(), "[0, 30] step 10");
    }

    #[test]
    fn meta_range_min_max() {
        let mr = MetaRange::new(vec![Range::new(10.0, 20.0), Range::new(30.0, 40.0)]);
        assert_eq!(mr.min(), 10.0);
        assert_eq!(mr.max(), 40.0);
        assert!(mr.contains(15.0));
        assert!(!mr.contains(25.0));
    }

    #[test]
    fn meta_range_clamp_to_nearest_span() {
        let mr = MetaRange::new(vec![Range::new(10.0, 20.0), Range::new(30.0, 40.0)]);
        // Inside a span: unchanged.
        assert_eq!(mr.clamp(35.0), 35.0);
        // In the hole: nearest edge wins.
        assert_eq!(mr.clamp(21.0), 20.0);
        assert_eq!(mr.clamp(29.0), 30.0);
        // Below and above everything.
        assert_eq!(mr.clamp(0.0), 10.0);
        assert_eq!(mr.clamp(99.0), 40.0);
    }

    #[test]
    fn meta_range_discrete() {
        let mr = MetaRange::discrete(&[32_000.0, 64_000.0, 128_000.0]);
        assert_eq!(mr.ranges().len(), 3);
        assert!(mr.contains(64_000.0));
        assert!(!mr.contains(48_000.0));
        assert_eq!(mr.clamp(48_000.0), 32_000.0);
        assert_eq!(mr.clamp(100_000.0), 128_000.0);
    }
}
