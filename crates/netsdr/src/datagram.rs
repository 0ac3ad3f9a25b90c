//! Data-channel packet parser.
//!
//! Sample datagrams are `[sequence:u16 LE][interleaved i16 LE I/Q pairs]`.
//! This is a pure parser with no I/O; the stream receiver feeds it raw
//! UDP datagrams and takes care of sequence tracking.

use netsdr_core::error::{Error, Result};
use netsdr_core::types::IqSample;

/// Data packet header size: the 2-byte sequence field.
pub const DATA_HEADER_LEN: usize = 2;

/// Bytes per complex sample on the wire (i16 I + i16 Q).
pub const BYTES_PER_SAMPLE: usize = 4;

/// A parsed sample datagram.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket {
    /// Continuity counter. Wraps at `u16::MAX`; gaps signal loss.
    pub sequence: u16,
    /// Decoded samples in wire order.
    pub samples: Vec<IqSample>,
}

/// Parse a sample datagram.
///
/// The payload after the sequence field must be a whole number of I/Q
/// pairs; anything else indicates a damaged or foreign datagram.
pub fn parse_data_packet(data: &[u8]) -> Result<DataPacket> {
    if data.len() < DATA_HEADER_LEN {
        return Err(Error::MalformedFrame(format!(
            "data packet too short: {} bytes",
            data.len()
        )));
    }
    let payload = &data[DATA_HEADER_LEN..];
    if payload.len() % BYTES_PER_SAMPLE != 0 {
        return Err(Error::MalformedFrame(format!(
            "sample payload length {} is not a whole number of I/Q pairs",
            payload.len()
        )));
    }

    let sequence = u16::from_le_bytes([data[0], data[1]]);
    let count = payload.len() / BYTES_PER_SAMPLE;
    let mut samples = Vec::with_capacity(count);
    for pair in payload.chunks_exact(BYTES_PER_SAMPLE) {
        let i = i16::from_le_bytes([pair[0], pair[1]]);
        let q = i16::from_le_bytes([pair[2], pair[3]]);
        samples.push(IqSample::from_raw(i, q));
    }

    Ok(DataPacket { sequence, samples })
}

/// Encode a sample datagram from raw i16 I/Q pairs.
///
/// The inverse of [`parse_data_packet`], used by the fake device in the
/// test harness to synthesize a stream.
pub fn encode_data_packet(sequence: u16, iq: &[(i16, i16)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_HEADER_LEN + iq.len() * BYTES_PER_SAMPLE);
    buf.extend_from_slice(&sequence.to_le_bytes());
    for &(i, q) in iq {
        buf.extend_from_slice(&i.to_le_bytes());
        buf.extend_from_slice(&q.to_le_bytes());
    }
    buf
}
