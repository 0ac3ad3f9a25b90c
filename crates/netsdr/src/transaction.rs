//! Control-channel transaction engine.
//!
//! A transaction is one command frame paired with exactly one response
//! frame. The protocol carries no transaction IDs -- responses are
//! correlated to requests solely by item code + channel -- so only one
//! exchange may be outstanding per control connection. [`TransactionChannel`]
//! enforces that by funneling every exchange through one async mutex:
//! concurrent callers queue and their byte streams never interleave.
//!
//! Channel states map onto the implementation as follows: Disconnected is
//! a missing transport, Connected/Idle is a present transport with the
//! mutex free, and AwaitingResponse is the span where a caller holds the
//! mutex inside [`transact`](TransactionChannel::transact).
//!
//! A timed-out or failed exchange leaves the connection usable; the
//! caller may retry or treat the parameter as unchanged.

use std::time::Duration;

use tokio::sync::Mutex;

use netsdr_core::error::{Error, Result};
use netsdr_core::transport::Transport;
use netsdr_transport::TcpTransport;

use crate::frame::{self, CommandFrame, ResponseFrame};

/// Read chunk size for response reassembly.
const READ_CHUNK: usize = 512;

/// Guarded connection state: the transport plus any bytes read beyond the
/// last complete frame.
struct Inner {
    transport: Option<Box<dyn Transport>>,
    /// Bytes received but not yet consumed as a frame. Partial frames
    /// survive here across reads; stale non-matching frames are dropped
    /// during correlation.
    rx_buf: Vec<u8>,
}

/// The control-channel transaction engine.
///
/// Owns the control transport exclusively. Cloneable handles are not
/// provided; share a `TransactionChannel` behind whatever ownership the
/// caller chooses (the source façade holds it directly).
pub struct TransactionChannel {
    inner: Mutex<Inner>,
    /// Extra attempts after a timed-out exchange. 0 = fail on first
    /// timeout.
    retries: u32,
}

impl TransactionChannel {
    /// Connect to a unit's control port.
    ///
    /// Fails with [`Error::Connect`] on refusal or connect timeout.
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let transport = TcpTransport::connect_with_timeout(addr, timeout).await?;
        Ok(Self::from_transport(Box::new(transport)))
    }

    /// Wrap an existing transport (mock or pre-connected stream).
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        TransactionChannel {
            inner: Mutex::new(Inner {
                transport: Some(transport),
                rx_buf: Vec::new(),
            }),
            retries: 0,
        }
    }

    /// Set the number of retry attempts after a timed-out exchange.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Whether a control connection is currently established.
    pub async fn is_connected(&self) -> bool {
        let inner = self.inner.lock().await;
        inner
            .transport
            .as_ref()
            .map(|t| t.is_connected())
            .unwrap_or(false)
    }

    /// Perform one command/response exchange.
    ///
    /// Writes the full encoded frame, then reassembles response bytes
    /// until a complete frame per the length prefix has arrived, matching
    /// on item + channel. Frames for other item/channel pairs are logged
    /// and discarded. The whole exchange is bounded by `timeout`.
    ///
    /// Concurrent callers are serialized; a second caller blocks until
    /// the first completes.
    pub async fn transact(
        &self,
        cmd: &CommandFrame,
        timeout: Duration,
    ) -> Result<ResponseFrame> {
        let mut inner = self.inner.lock().await;

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!(attempt, item = ?cmd.item, "Retrying transaction");
            }

            match exchange(&mut inner, cmd, timeout).await {
                Err(Error::Timeout) if attempt < self.retries => continue,
                other => return other,
            }
        }

        Err(Error::Timeout)
    }

    /// Close the control connection. Idempotent.
    pub async fn disconnect(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(mut transport) = inner.transport.take() {
            tracing::debug!("Closing control channel");
            transport.close().await?;
        }
        inner.rx_buf.clear();
        Ok(())
    }
}

/// One write + reassemble-until-matching-frame cycle.
async fn exchange(
    inner: &mut Inner,
    cmd: &CommandFrame,
    timeout: Duration,
) -> Result<ResponseFrame> {
    let transport = inner.transport.as_mut().ok_or(Error::NotConnected)?;

    let encoded = cmd.encode();
    tracing::trace!(item = ?cmd.item, channel = cmd.channel, bytes = encoded.len(), "Sending command");

    // The transport loops over partial writes internally; a send error is
    // a transaction failure, not a dead channel.
    transport
        .send(&encoded)
        .await
        .map_err(|e| match e {
            Error::NotConnected | Error::ConnectionLost => e,
            other => Error::Transaction(format!("command write failed: {}", other)),
        })?;

    let deadline = tokio::time::Instant::now() + timeout;
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        // Consume every complete frame already buffered before reading
        // more from the socket.
        while let Some(total) = frame::declared_len(&inner.rx_buf).map_err(|e| {
            // Length prefix is nonsense: the byte stream is desynced.
            // Drop the buffer so the next transaction starts clean.
            inner.rx_buf.clear();
            e
        })? {
            if inner.rx_buf.len() < total {
                break;
            }

            let frame_bytes: Vec<u8> = inner.rx_buf.drain(..total).collect();
            match ResponseFrame::decode(&frame_bytes) {
                Ok(resp) if resp.item == cmd.item && resp.channel == cmd.channel => {
                    tracing::trace!(item = ?resp.item, channel = resp.channel, status = ?resp.status, "Response received");
                    return Ok(resp);
                }
                Ok(resp) => {
                    // Stale or unsolicited frame; the protocol gives us
                    // no way to route it, so log and drop.
                    tracing::debug!(
                        item = ?resp.item,
                        channel = resp.channel,
                        "Discarding non-matching response frame"
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Discarding undecodable frame");
                    return Err(e);
                }
            }
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout);
        }

        let n = transport.receive(&mut chunk, remaining).await?;
        inner.rx_buf.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::frame::{parse_frequency, parse_sample_rate, set_frequency, set_sample_rate};
    use netsdr_core::types::GainMode;

    /// One scripted step of the test transport's receive side.
    enum Step {
        /// Deliver these bytes.
        Chunk(Vec<u8>),
        /// Report a receive timeout.
        TimeOut,
    }

    /// Transport that replays scripted receive steps, one per call.
    ///
    /// Lets tests exercise fragment reassembly and timeout recovery
    /// deterministically without a socket.
    struct ScriptedTransport {
        sent: Vec<Vec<u8>>,
        steps: std::collections::VecDeque<Step>,
        connected: bool,
    }

    impl ScriptedTransport {
        fn new(steps: Vec<Step>) -> Self {
            ScriptedTransport {
                sent: Vec::new(),
                steps: steps.into(),
                connected: true,
            }
        }

        fn replay(chunks: Vec<Vec<u8>>) -> Self {
            Self::new(chunks.into_iter().map(Step::Chunk).collect())
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, data: &[u8]) -> Result<()> {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            self.sent.push(data.to_vec());
            Ok(())
        }

        async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
            if !self.connected {
                return Err(Error::NotConnected);
            }
            match self.steps.pop_front() {
                Some(Step::Chunk(chunk)) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                Some(Step::TimeOut) | None => Err(Error::Timeout),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.connected = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn transact_whole_response() {
        let cmd = set_frequency(0, 7_100_000);
        let resp = ResponseFrame::ack(cmd.item, 0, cmd.payload.clone());

        let channel = TransactionChannel::from_transport(Box::new(ScriptedTransport::replay(
            vec![resp.encode()],
        )));

        let got = channel.transact(&cmd, TIMEOUT).await.unwrap();
        assert_eq!(parse_frequency(&got).unwrap(), 7_100_000);
    }

    #[tokio::test]
    async fn transact_reassembles_fragmented_response() {
        let cmd = set_frequency(1, 146_000_000);
        let resp_bytes = ResponseFrame::ack(cmd.item, 1, cmd.payload.clone()).encode();

        // The response arrives in two fragments split mid-payload.
        let split = resp_bytes.len() / 2;
        let channel = TransactionChannel::from_transport(Box::new(ScriptedTransport::replay(
            vec![resp_bytes[..split].to_vec(), resp_bytes[split..].to_vec()],
        )));

        let got = channel.transact(&cmd, TIMEOUT).await.unwrap();
        assert_eq!(parse_frequency(&got).unwrap(), 146_000_000);
    }

    #[tokio::test]
    async fn transact_skips_non_matching_frame() {
        let cmd = set_sample_rate(0, 500_000);
        // A stale frequency frame for another channel precedes the real
        // response in the same chunk.
        let stale = ResponseFrame::ack(
            crate::frame::ControlItem::Frequency,
            1,
            7_000_000u64.to_le_bytes().to_vec(),
        );
        let real = ResponseFrame::ack(cmd.item, 0, cmd.payload.clone());

        let mut wire = stale.encode();
        wire.extend_from_slice(&real.encode());

        let channel =
            TransactionChannel::from_transport(Box::new(ScriptedTransport::replay(vec![wire])));

        let got = channel.transact(&cmd, TIMEOUT).await.unwrap();
        assert_eq!(parse_sample_rate(&got).unwrap(), 500_000);
    }

    #[tokio::test]
    async fn transact_times_out_and_channel_survives() {
        let cmd = set_frequency(0, 7_100_000);
        let resp = ResponseFrame::ack(cmd.item, 0, cmd.payload.clone());

        // Nothing arrives for the first exchange; the response shows up
        // for the second.
        let channel = TransactionChannel::from_transport(Box::new(ScriptedTransport::new(vec![
            Step::TimeOut,
            Step::Chunk(resp.encode()),
        ])));

        let result = channel.transact(&cmd, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(Error::Timeout)));
        // The connection is still up after a timeout; a retry succeeds.
        assert!(channel.is_connected().await);

        let got = channel.transact(&cmd, TIMEOUT).await.unwrap();
        assert_eq!(parse_frequency(&got).unwrap(), 7_100_000);
    }

    #[tokio::test]
    async fn transact_fails_on_undecodable_frame() {
        let cmd = set_frequency(0, 7_100_000);
        // Correct length prefix, unknown item code.
        let mut bad = ResponseFrame::ack(cmd.item, 0, cmd.payload.clone()).encode();
        bad[2] = 0xAD;
        bad[3] = 0x0B;

        let channel =
            TransactionChannel::from_transport(Box::new(ScriptedTransport::replay(vec![bad])));

        let result = channel.transact(&cmd, TIMEOUT).await;
        assert!(matches!(result, Err(Error::UnknownOpcode(0x0BAD))));
        // Desync is not fatal to the connection.
        assert!(channel.is_connected().await);
    }

    #[tokio::test]
    async fn transact_retries_after_timeout() {
        let cmd = crate::frame::set_gain_mode(0, GainMode::Auto);
        let resp = ResponseFrame::ack(cmd.item, 0, cmd.payload.clone());

        // First attempt times out, the retry is answered.
        let channel = TransactionChannel::from_transport(Box::new(ScriptedTransport::new(vec![
            Step::TimeOut,
            Step::Chunk(resp.encode()),
        ])))
        .with_retries(1);

        let got = channel.transact(&cmd, TIMEOUT).await.unwrap();
        assert_eq!(got.item, cmd.item);

        // With no retry budget the same script fails.
        let resp2 = ResponseFrame::ack(cmd.item, 0, cmd.payload.clone());
        let strict = TransactionChannel::from_transport(Box::new(ScriptedTransport::new(vec![
            Step::TimeOut,
            Step::Chunk(resp2.encode()),
        ])));
        let result = strict.transact(&cmd, TIMEOUT).await;
        assert!(matches!(result, Err(Error::Timeout)));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let channel =
            TransactionChannel::from_transport(Box::new(ScriptedTransport::replay(vec![])));
        assert!(channel.is_connected().await);

        channel.disconnect().await.unwrap();
        assert!(!channel.is_connected().await);
        channel.disconnect().await.unwrap();

        let cmd = set_frequency(0, 1_000_000);
        let result = channel.transact(&cmd, TIMEOUT).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn concurrent_transactions_are_serialized() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        // A byte-accurate fake control server: reads exact frames and
        // answers each with an ACK echo. If two command byte streams
        // interleaved, frame decoding on the server would fail.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            for _ in 0..2 {
                let mut prefix = [0u8; 2];
                stream.read_exact(&mut prefix).await.unwrap();
                let total = u16::from_le_bytes(prefix) as usize;
                let mut rest = vec![0u8; total - 2];
                stream.read_exact(&mut rest).await.unwrap();

                let mut frame_bytes = prefix.to_vec();
                frame_bytes.extend_from_slice(&rest);
                let cmd = CommandFrame::decode(&frame_bytes).unwrap();
                let resp = ResponseFrame::ack(cmd.item, cmd.channel, cmd.payload.clone());
                stream.write_all(&resp.encode()).await.unwrap();
                stream.flush().await.unwrap();
            }
        });

        let transport = TcpTransport::connect(&addr).await.unwrap();
        let channel = Arc::new(TransactionChannel::from_transport(Box::new(transport)));

        let c1 = Arc::clone(&channel);
        let c2 = Arc::clone(&channel);
        let t1 = tokio::spawn(async move {
            c1.transact(&set_frequency(0, 14_200_000), Duration::from_secs(2))
                .await
        });
        let t2 = tokio::spawn(async move {
            c2.transact(&set_sample_rate(0, 1_000_000), Duration::from_secs(2))
                .await
        });

        let r1 = t1.await.unwrap().unwrap();
        let r2 = t2.await.unwrap().unwrap();

        // Each caller got the response for its own item -- never
        // cross-assigned.
        assert_eq!(parse_frequency(&r1).unwrap(), 14_200_000);
        assert_eq!(parse_sample_rate(&r2).unwrap(), 1_000_000);

        server.await.unwrap();
    }
}
