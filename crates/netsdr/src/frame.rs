//! Binary control-frame codec.
//!
//! Pure encode/decode for the unit's command and response frames, with no
//! I/O. Commands are `[length:u16][item:u16][channel:u8][payload]` and
//! responses add a status byte after the channel. All multi-byte fields
//! are little-endian; the length prefix counts the entire frame.
//!
//! Per-item builders (`set_frequency`, `read_item`, ...) and parsers
//! (`parse_frequency`, ...) sit on top of the generic framing so the
//! controller never touches raw byte layouts.

use netsdr_core::error::{Error, Result};
use netsdr_core::types::GainMode;

/// Command frame header size: length (2) + item (2) + channel (1).
pub const CMD_HEADER_LEN: usize = 5;

/// Response frame header size: command header + status (1).
pub const RESP_HEADER_LEN: usize = 6;

/// Upper bound on a sane frame length. Anything larger is treated as
/// protocol desync rather than a frame worth buffering.
pub const MAX_FRAME_LEN: usize = 8192;

/// Control item codes -- the opcode set of the control protocol.
///
/// Codes are fixed by the device firmware; the payload layout of each
/// item is documented on its builder below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ControlItem {
    /// Streaming run/idle state. Payload: `u8` (0 = idle, 1 = run).
    ReceiverState = 0x0018,
    /// Center frequency. Payload: `u64` Hz.
    Frequency = 0x0020,
    /// Antenna port selection. Payload: `u8` port index.
    Antenna = 0x0030,
    /// Gain control mode. Payload: `u8` (0 = manual, 1 = auto).
    GainMode = 0x0038,
    /// Stage gain. Payload: `u8` stage index + `i16` tenths of dB.
    Gain = 0x0040,
    /// Analog bandwidth. Payload: `u32` Hz.
    Bandwidth = 0x0044,
    /// Output sample rate. Payload: `u32` Hz.
    SampleRate = 0x00B8,
    /// Frequency correction. Payload: `i32` hundredths of ppm.
    FreqCorrection = 0x00BA,
}

impl ControlItem {
    /// The wire code of this item.
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Look up an item from its wire code.
    pub fn from_code(code: u16) -> Option<ControlItem> {
        match code {
            0x0018 => Some(ControlItem::ReceiverState),
            0x0020 => Some(ControlItem::Frequency),
            0x0030 => Some(ControlItem::Antenna),
            0x0038 => Some(ControlItem::GainMode),
            0x0040 => Some(ControlItem::Gain),
            0x0044 => Some(ControlItem::Bandwidth),
            0x00B8 => Some(ControlItem::SampleRate),
            0x00BA => Some(ControlItem::FreqCorrection),
            _ => None,
        }
    }
}

/// Response status marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The unit accepted the command; the payload carries the applied
    /// value (which may have been clamped to the hardware's limits).
    Ack,
    /// The item or value is not supported by this unit.
    Nak,
}

/// A command frame ready to be written to the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    /// Control item this command addresses.
    pub item: ControlItem,
    /// Receive channel index.
    pub channel: u8,
    /// Item-specific payload. Empty payload = read request.
    pub payload: Vec<u8>,
}

impl CommandFrame {
    /// Create a command frame.
    pub fn new(item: ControlItem, channel: u8, payload: Vec<u8>) -> Self {
        CommandFrame {
            item,
            channel,
            payload,
        }
    }

    /// Whether this is a read request (empty payload).
    pub fn is_read(&self) -> bool {
        self.payload.is_empty()
    }

    /// Encode to wire bytes. The length prefix always equals the header
    /// size plus the payload size.
    pub fn encode(&self) -> Vec<u8> {
        let len = CMD_HEADER_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&(len as u16).to_le_bytes());
        buf.extend_from_slice(&self.item.code().to_le_bytes());
        buf.push(self.channel);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a command frame from an exact wire buffer.
    ///
    /// Used by the fake device in the test harness; the driver itself
    /// only decodes responses.
    pub fn decode(data: &[u8]) -> Result<CommandFrame> {
        if data.len() < CMD_HEADER_LEN {
            return Err(Error::MalformedFrame(format!(
                "command frame too short: {} bytes, header is {}",
                data.len(),
                CMD_HEADER_LEN
            )));
        }
        let declared = u16::from_le_bytes([data[0], data[1]]) as usize;
        if declared != data.len() {
            return Err(Error::MalformedFrame(format!(
                "length prefix {} disagrees with buffer length {}",
                declared,
                data.len()
            )));
        }
        let code = u16::from_le_bytes([data[2], data[3]]);
        let item = ControlItem::from_code(code).ok_or(Error::UnknownOpcode(code))?;
        Ok(CommandFrame {
            item,
            channel: data[4],
            payload: data[CMD_HEADER_LEN..].to_vec(),
        })
    }
}

/// A response frame read from the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    /// Control item this response answers.
    pub item: ControlItem,
    /// Receive channel index.
    pub channel: u8,
    /// ACK/NAK marker.
    pub status: Status,
    /// Applied value, encoded per the item's layout. Empty for NAK.
    pub payload: Vec<u8>,
}

impl ResponseFrame {
    /// Build an ACK response carrying the applied value.
    pub fn ack(item: ControlItem, channel: u8, payload: Vec<u8>) -> Self {
        ResponseFrame {
            item,
            channel,
            status: Status::Ack,
            payload,
        }
    }

    /// Build a NAK response.
    pub fn nak(item: ControlItem, channel: u8) -> Self {
        ResponseFrame {
            item,
            channel,
            status: Status::Nak,
            payload: Vec::new(),
        }
    }

    /// Whether the unit accepted the command.
    pub fn is_ack(&self) -> bool {
        self.status == Status::Ack
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let len = RESP_HEADER_LEN + self.payload.len();
        let mut buf = Vec::with_capacity(len);
        buf.extend_from_slice(&(len as u16).to_le_bytes());
        buf.extend_from_slice(&self.item.code().to_le_bytes());
        buf.push(self.channel);
        buf.push(match self.status {
            Status::Ack => 0x00,
            Status::Nak => 0x01,
        });
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode a response frame from an exact wire buffer.
    ///
    /// Fails with [`Error::MalformedFrame`] when the length prefix
    /// disagrees with the buffer or the status byte is unrecognized, and
    /// [`Error::UnknownOpcode`] when the item code is outside the set.
    pub fn decode(data: &[u8]) -> Result<ResponseFrame> {
        if data.len() < RESP_HEADER_LEN {
            return Err(Error::MalformedFrame(format!(
                "response frame too short: {} bytes, header is {}",
                data.len(),
                RESP_HEADER_LEN
            )));
        }
        let declared = u16::from_le_bytes([data[0], data[1]]) as usize;
        if declared != data.len() {
            return Err(Error::MalformedFrame(format!(
                "length prefix {} disagrees with buffer length {}",
                declared,
                data.len()
            )));
        }
        let code = u16::from_le_bytes([data[2], data[3]]);
        let item = ControlItem::from_code(code).ok_or(Error::UnknownOpcode(code))?;
        let status = match data[5] {
            0x00 => Status::Ack,
            0x01 => Status::Nak,
            other => {
                return Err(Error::MalformedFrame(format!(
                    "unrecognized status byte 0x{:02X}",
                    other
                )));
            }
        };
        Ok(ResponseFrame {
            item,
            channel: data[4],
            status,
            payload: data[RESP_HEADER_LEN..].to_vec(),
        })
    }
}

/// Read the declared total length of the frame starting at `buf[0]`.
///
/// Returns `None` until the 2-byte prefix has arrived. Used by the
/// transaction channel to know when reassembly is complete, and rejects
/// nonsense prefixes (below the header size or above [`MAX_FRAME_LEN`])
/// as [`Error::MalformedFrame`].
pub fn declared_len(buf: &[u8]) -> Result<Option<usize>> {
    if buf.len() < 2 {
        return Ok(None);
    }
    let declared = u16::from_le_bytes([buf[0], buf[1]]) as usize;
    if declared < RESP_HEADER_LEN || declared > MAX_FRAME_LEN {
        return Err(Error::MalformedFrame(format!(
            "implausible length prefix {}",
            declared
        )));
    }
    Ok(Some(declared))
}

// ---------------------------------------------------------------------------
// Value conversions
// ---------------------------------------------------------------------------

/// Convert a gain in dB to the wire's tenths-of-dB representation.
pub fn db_to_tenths(db: f64) -> i16 {
    (db * 10.0).round() as i16
}

/// Convert the wire's tenths-of-dB representation to dB.
pub fn tenths_to_db(tenths: i16) -> f64 {
    tenths as f64 / 10.0
}

/// Convert a frequency correction in ppm to hundredths of ppm.
pub fn ppm_to_centi(ppm: f64) -> i32 {
    (ppm * 100.0).round() as i32
}

/// Convert hundredths of ppm to ppm.
pub fn centi_to_ppm(centi: i32) -> f64 {
    centi as f64 / 100.0
}

// ---------------------------------------------------------------------------
// Per-item command builders
// ---------------------------------------------------------------------------

/// Build a read request for any item: empty payload, the unit replies
/// with its current value.
pub fn read_item(item: ControlItem, channel: u8) -> CommandFrame {
    CommandFrame::new(item, channel, Vec::new())
}

/// Set the streaming run state. The run flag is unit-global; the channel
/// byte is 0 by convention.
pub fn set_receiver_state(run: bool) -> CommandFrame {
    CommandFrame::new(ControlItem::ReceiverState, 0, vec![u8::from(run)])
}

/// Set the center frequency in Hz.
pub fn set_frequency(channel: u8, freq_hz: u64) -> CommandFrame {
    CommandFrame::new(
        ControlItem::Frequency,
        channel,
        freq_hz.to_le_bytes().to_vec(),
    )
}

/// Select an antenna port by index.
pub fn set_antenna(channel: u8, port: u8) -> CommandFrame {
    CommandFrame::new(ControlItem::Antenna, channel, vec![port])
}

/// Set the gain control mode.
pub fn set_gain_mode(channel: u8, mode: GainMode) -> CommandFrame {
    CommandFrame::new(
        ControlItem::GainMode,
        channel,
        vec![u8::from(mode.is_auto())],
    )
}

/// Set a gain stage's value in tenths of dB.
pub fn set_gain(channel: u8, stage: u8, tenths_db: i16) -> CommandFrame {
    let mut payload = Vec::with_capacity(3);
    payload.push(stage);
    payload.extend_from_slice(&tenths_db.to_le_bytes());
    CommandFrame::new(ControlItem::Gain, channel, payload)
}

/// Build a read request for one gain stage.
///
/// Unlike the other items, a gain read must say which stage it wants, so
/// the request carries the stage index alone.
pub fn read_gain(channel: u8, stage: u8) -> CommandFrame {
    CommandFrame::new(ControlItem::Gain, channel, vec![stage])
}

/// Set the analog bandwidth in Hz.
pub fn set_bandwidth(channel: u8, bw_hz: u32) -> CommandFrame {
    CommandFrame::new(
        ControlItem::Bandwidth,
        channel,
        bw_hz.to_le_bytes().to_vec(),
    )
}

/// Set the output sample rate in Hz.
pub fn set_sample_rate(channel: u8, rate_hz: u32) -> CommandFrame {
    CommandFrame::new(
        ControlItem::SampleRate,
        channel,
        rate_hz.to_le_bytes().to_vec(),
    )
}

/// Set the frequency correction in hundredths of ppm.
pub fn set_freq_corr(channel: u8, centi_ppm: i32) -> CommandFrame {
    CommandFrame::new(
        ControlItem::FreqCorrection,
        channel,
        centi_ppm.to_le_bytes().to_vec(),
    )
}

// ---------------------------------------------------------------------------
// Per-item response parsers
// ---------------------------------------------------------------------------

fn expect_item(resp: &ResponseFrame, item: ControlItem, width: usize) -> Result<&[u8]> {
    if resp.item != item {
        return Err(Error::Transaction(format!(
            "expected {:?} response, got {:?}",
            item, resp.item
        )));
    }
    if resp.payload.len() != width {
        return Err(Error::MalformedFrame(format!(
            "{:?} payload is {} bytes, expected {}",
            item,
            resp.payload.len(),
            width
        )));
    }
    Ok(&resp.payload)
}

/// Parse the applied run state from a ReceiverState ACK.
pub fn parse_receiver_state(resp: &ResponseFrame) -> Result<bool> {
    let p = expect_item(resp, ControlItem::ReceiverState, 1)?;
    Ok(p[0] != 0)
}

/// Parse the applied frequency in Hz from a Frequency ACK.
pub fn parse_frequency(resp: &ResponseFrame) -> Result<u64> {
    let p = expect_item(resp, ControlItem::Frequency, 8)?;
    Ok(u64::from_le_bytes([
        p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7],
    ]))
}

/// Parse the applied antenna port from an Antenna ACK.
pub fn parse_antenna(resp: &ResponseFrame) -> Result<u8> {
    let p = expect_item(resp, ControlItem::Antenna, 1)?;
    Ok(p[0])
}

/// Parse the applied gain mode from a GainMode ACK.
pub fn parse_gain_mode(resp: &ResponseFrame) -> Result<GainMode> {
    let p = expect_item(resp, ControlItem::GainMode, 1)?;
    Ok(if p[0] != 0 {
        GainMode::Auto
    } else {
        GainMode::Manual
    })
}

/// Parse the applied (stage, tenths-of-dB) pair from a Gain ACK.
pub fn parse_gain(resp: &ResponseFrame) -> Result<(u8, i16)> {
    let p = expect_item(resp, ControlItem::Gain, 3)?;
    Ok((p[0], i16::from_le_bytes([p[1], p[2]])))
}

/// Parse the applied bandwidth in Hz from a Bandwidth ACK.
pub fn parse_bandwidth(resp: &ResponseFrame) -> Result<u32> {
    let p = expect_item(resp, ControlItem::Bandwidth, 4)?;
    Ok(u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
}

/// Parse the applied sample rate in Hz from a SampleRate ACK.
pub fn parse_sample_rate(resp: &ResponseFrame) -> Result<u32> {
    let p = expect_item(resp, ControlItem::SampleRate, 4)?;
    Ok(u32::from_le_bytes([p[0], p[1], p[2], p[3]]))
}

/// Parse the applied correction in hundredths of ppm from a
/// FreqCorrection ACK.
pub fn parse_freq_corr(resp: &ResponseFrame) -> Result<i32> {
    let p = expect_item(resp, ControlItem::FreqCorrection, 4)?;
    Ok(i32::from_le_bytes([p[0], p[1], p[2], p[3]]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// Echo a command back as an ACK response, the way a permissive
    /// device would.
    fn echo(cmd: &CommandFrame) -> ResponseFrame {
        ResponseFrame::ack(cmd.item, cmd.channel, cmd.payload.clone())
    }

    #[test]
    fn item_codes_round_trip() {
        for item in [
            ControlItem::ReceiverState,
            ControlItem::Frequency,
            ControlItem::Antenna,
            ControlItem::GainMode,
            ControlItem::Gain,
            ControlItem::Bandwidth,
            ControlItem::SampleRate,
            ControlItem::FreqCorrection,
        ] {
            assert_eq!(ControlItem::from_code(item.code()), Some(item));
        }
        assert_eq!(ControlItem::from_code(0x0BAD), None);
    }

    #[test]
    fn command_length_prefix_invariant() {
        let cmd = set_frequency(1, 146_000_000);
        let bytes = cmd.encode();
        let declared = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        assert_eq!(declared, bytes.len());
        assert_eq!(declared, CMD_HEADER_LEN + 8);
    }

    #[test]
    fn command_decode_round_trip() {
        let cmd = set_gain(1, 0, -125);
        let decoded = CommandFrame::decode(&cmd.encode()).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn response_encode_decode_round_trip() {
        let resp = ResponseFrame::ack(ControlItem::SampleRate, 1, 500_000u32.to_le_bytes().to_vec());
        let decoded = ResponseFrame::decode(&resp.encode()).unwrap();
        assert_eq!(decoded, resp);
        assert!(decoded.is_ack());
    }

    #[test]
    fn nak_round_trip() {
        let resp = ResponseFrame::nak(ControlItem::Bandwidth, 0);
        let decoded = ResponseFrame::decode(&resp.encode()).unwrap();
        assert_eq!(decoded.status, Status::Nak);
        assert!(decoded.payload.is_empty());
        assert!(!decoded.is_ack());
    }

    #[test]
    fn frequency_value_round_trip() {
        let cmd = set_frequency(0, 146_000_000);
        let applied = parse_frequency(&echo(&cmd)).unwrap();
        assert_eq!(applied, 146_000_000);
    }

    #[test]
    fn sample_rate_value_round_trip() {
        let cmd = set_sample_rate(0, 2_000_000);
        assert_eq!(parse_sample_rate(&echo(&cmd)).unwrap(), 2_000_000);
    }

    #[test]
    fn bandwidth_value_round_trip() {
        let cmd = set_bandwidth(1, 1_500_000);
        assert_eq!(parse_bandwidth(&echo(&cmd)).unwrap(), 1_500_000);
    }

    #[test]
    fn gain_value_round_trip() {
        let cmd = set_gain(0, 1, db_to_tenths(-12.5));
        let (stage, tenths) = parse_gain(&echo(&cmd)).unwrap();
        assert_eq!(stage, 1);
        assert_eq!(tenths_to_db(tenths), -12.5);
    }

    #[test]
    fn gain_mode_value_round_trip() {
        let auto = set_gain_mode(0, GainMode::Auto);
        assert_eq!(parse_gain_mode(&echo(&auto)).unwrap(), GainMode::Auto);

        let manual = set_gain_mode(0, GainMode::Manual);
        assert_eq!(parse_gain_mode(&echo(&manual)).unwrap(), GainMode::Manual);
    }

    #[test]
    fn antenna_value_round_trip() {
        let cmd = set_antenna(1, 1);
        assert_eq!(parse_antenna(&echo(&cmd)).unwrap(), 1);
    }

    #[test]
    fn freq_corr_value_round_trip() {
        let cmd = set_freq_corr(0, ppm_to_centi(-3.25));
        assert_eq!(centi_to_ppm(parse_freq_corr(&echo(&cmd)).unwrap()), -3.25);
    }

    #[test]
    fn receiver_state_round_trip() {
        let run = set_receiver_state(true);
        assert!(parse_receiver_state(&echo(&run)).unwrap());
        let idle = set_receiver_state(false);
        assert!(!parse_receiver_state(&echo(&idle)).unwrap());
    }

    #[test]
    fn read_request_has_empty_payload() {
        let cmd = read_item(ControlItem::Frequency, 1);
        assert!(cmd.is_read());
        let bytes = cmd.encode();
        assert_eq!(bytes.len(), CMD_HEADER_LEN);
    }

    #[test]
    fn reject_truncated_response() {
        let err = ResponseFrame::decode(&[0x06, 0x00, 0x20]).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn reject_length_prefix_mismatch() {
        let mut bytes = ResponseFrame::ack(ControlItem::Antenna, 0, vec![1]).encode();
        // Append garbage so the buffer outgrows the declared length.
        bytes.push(0xFF);
        let err = ResponseFrame::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn reject_unknown_opcode() {
        let mut bytes = ResponseFrame::ack(ControlItem::Antenna, 0, vec![1]).encode();
        // Overwrite the item code with an unassigned value.
        bytes[2] = 0xAD;
        bytes[3] = 0x0B;
        let err = ResponseFrame::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownOpcode(0x0BAD)));
    }

    #[test]
    fn reject_bad_status_byte() {
        let mut bytes = ResponseFrame::ack(ControlItem::Antenna, 0, vec![1]).encode();
        bytes[5] = 0x7F;
        let err = ResponseFrame::decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn reject_wrong_payload_width() {
        let resp = ResponseFrame::ack(ControlItem::Frequency, 0, vec![0x01, 0x02]);
        let err = parse_frequency(&resp).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame(_)));
    }

    #[test]
    fn reject_wrong_item_in_parser() {
        let resp = ResponseFrame::ack(ControlItem::Antenna, 0, vec![1]);
        let err = parse_frequency(&resp).unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
    }

    #[test]
    fn declared_len_incomplete_prefix() {
        assert_eq!(declared_len(&[]).unwrap(), None);
        assert_eq!(declared_len(&[0x08]).unwrap(), None);
    }

    #[test]
    fn declared_len_reads_prefix() {
        let bytes = ResponseFrame::ack(ControlItem::Antenna, 0, vec![1]).encode();
        assert_eq!(declared_len(&bytes).unwrap(), Some(bytes.len()));
        // The prefix is readable before the rest of the frame arrives.
        assert_eq!(declared_len(&bytes[..3]).unwrap(), Some(bytes.len()));
    }

    #[test]
    fn declared_len_rejects_nonsense() {
        // Below the response header size.
        assert!(declared_len(&[0x02, 0x00]).is_err());
        // Above the frame-length ceiling.
        assert!(declared_len(&[0xFF, 0xFF]).is_err());
    }

    #[test]
    fn conversion_helpers() {
        assert_eq!(db_to_tenths(10.0), 100);
        assert_eq!(db_to_tenths(-0.55), -6); // rounds away from zero
        assert_eq!(tenths_to_db(-300), -30.0);
        assert_eq!(ppm_to_centi(1.5), 150);
        assert_eq!(centi_to_ppm(-25), -0.25);
    }
}
