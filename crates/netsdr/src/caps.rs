//! Static capability tables for the supported receiver family.
//!
//! Range queries answer from these tables without a transaction; the unit
//! itself stays authoritative for what a command actually applies (it may
//! clamp), so nothing here is used to pre-reject values.

use netsdr_core::types::{MetaRange, Range};

/// Most channels any unit in the family exposes.
pub const MAX_CHANNELS: usize = 2;

/// Gain stage names, in signal-path order.
pub const GAIN_STAGES: [&str; 2] = ["RF", "IF"];

/// Antenna port names, indexed by the wire's port byte.
pub const ANTENNAS: [&str; 2] = ["RX1", "RX2"];

/// Channel defaults applied until the host configures otherwise.
pub const DEFAULT_FREQ_HZ: u64 = 10_000_000;
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 256_000;
pub const DEFAULT_BANDWIDTH_HZ: u32 = 500_000;

/// Tunable frequency span.
pub fn freq_range() -> MetaRange {
    MetaRange::single(100e3, 2e9)
}

/// Output sample rates the unit's decimator can produce.
pub fn sample_rates() -> MetaRange {
    MetaRange::discrete(&[
        32_000.0, 64_000.0, 128_000.0, 256_000.0, 500_000.0, 1_000_000.0, 2_000_000.0,
    ])
}

/// Selectable analog bandwidths.
pub fn bandwidths() -> MetaRange {
    MetaRange::discrete(&[10e3, 50e3, 200e3, 500e3, 1.6e6, 8e6])
}

/// Overall gain span. The unnamed gain maps to the RF stage, so this is
/// the RF attenuator's range.
pub fn gain_range() -> MetaRange {
    MetaRange::new(vec![Range::with_step(-30.0, 0.0, 10.0)])
}

/// Gain span of a named stage, if the stage exists.
pub fn stage_gain_range(stage: &str) -> Option<MetaRange> {
    match stage {
        "RF" => Some(MetaRange::new(vec![Range::with_step(-30.0, 0.0, 10.0)])),
        "IF" => Some(MetaRange::new(vec![Range::with_step(0.0, 24.0, 6.0)])),
        _ => None,
    }
}

/// The wire index of a gain stage name.
pub fn stage_index(stage: &str) -> Option<u8> {
    GAIN_STAGES.iter().position(|s| *s == stage).map(|i| i as u8)
}

/// The wire index of an antenna port name.
pub fn antenna_index(antenna: &str) -> Option<u8> {
    ANTENNAS.iter().position(|a| *a == antenna).map(|i| i as u8)
}

/// The antenna port name for a wire index.
pub fn antenna_name(index: u8) -> Option<&'static str> {
    ANTENNAS.get(index as usize).copied()
}
