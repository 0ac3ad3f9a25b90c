//! A fake NetSDR-family unit for integration tests.
//!
//! [`FakeDevice`] binds real loopback sockets and speaks the actual wire
//! protocol: it answers discovery queries with a descriptor, serves the
//! TCP control port (ACK-echoing commands like a permissive unit, with
//! hooks for clamping and NAK), and can blast sample datagrams with an
//! explicit sequence plan so loss and duplication scenarios are
//! reproducible.
//!
//! The fake never initiates anything on its own: sample streaming is
//! driven by the test via [`stream_packets`](FakeDevice::stream_packets),
//! which keeps timing deterministic.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use netsdr::datagram::encode_data_packet;
use netsdr::discovery::{query_datagram, reply_datagram, DISCOVERY_MAGIC};
use netsdr::frame::{CommandFrame, ControlItem, ResponseFrame};
use netsdr_core::error::Result;
use netsdr_transport::UdpTransport;

/// Behavior knobs for the fake unit.
#[derive(Debug, Clone)]
pub struct FakeDeviceOptions {
    /// Product name reported in the discovery descriptor.
    pub name: String,
    /// Serial number reported in the discovery descriptor.
    pub serial: String,
    /// Channel count reported in the discovery descriptor.
    pub channels: usize,
    /// Clamp frequency commands to at most this value, emulating a unit
    /// that applies its own tuning limit.
    pub clamp_freq_max: Option<u64>,
    /// NAK bandwidth writes, emulating a unit without that filter bank.
    pub nak_bandwidth: bool,
}

impl Default for FakeDeviceOptions {
    fn default() -> Self {
        FakeDeviceOptions {
            name: "NetSDR".to_string(),
            serial: "NS-TEST-1".to_string(),
            channels: 1,
            clamp_freq_max: None,
            nak_bandwidth: false,
        }
    }
}

/// A running fake unit on loopback sockets.
pub struct FakeDevice {
    control_addr: SocketAddr,
    discovery_addr: SocketAddr,
    commands: Arc<Mutex<Vec<CommandFrame>>>,
    running: Arc<AtomicBool>,
    control_task: JoinHandle<()>,
    discovery_task: JoinHandle<()>,
}

impl FakeDevice {
    /// Bind the fake's sockets and start serving.
    pub async fn spawn(options: FakeDeviceOptions) -> Result<FakeDevice> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let control_addr = listener.local_addr()?;

        let discovery_socket = UdpTransport::bind("127.0.0.1:0").await?;
        let discovery_addr = discovery_socket.local_addr();

        let commands = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(false));

        let control_task = {
            let options = options.clone();
            let commands = Arc::clone(&commands);
            let running = Arc::clone(&running);
            tokio::spawn(async move {
                // Serve clients one at a time; a dropped connection just
                // waits for the next accept.
                loop {
                    match listener.accept().await {
                        Ok((stream, peer)) => {
                            tracing::debug!(peer = %peer, "Fake unit: control client connected");
                            serve_control(stream, &options, &commands, &running).await;
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "Fake unit: accept failed");
                            break;
                        }
                    }
                }
            })
        };

        let discovery_task = {
            let options = options.clone();
            let port = control_addr.port();
            tokio::spawn(async move {
                serve_discovery(discovery_socket, &options, port).await;
            })
        };

        Ok(FakeDevice {
            control_addr,
            discovery_addr,
            commands,
            running,
            control_task,
            discovery_task,
        })
    }

    /// The fake's control endpoint.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// The fake's discovery endpoint, for `discover_at`.
    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    /// Whether the last ReceiverState command set the unit running.
    pub fn is_streaming(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Every command frame the control plane has received, in order.
    pub async fn received_commands(&self) -> Vec<CommandFrame> {
        self.commands.lock().await.clone()
    }

    /// Send one sample datagram per entry of `sequences` to `target`.
    ///
    /// Each packet carries `samples_per_packet` I/Q pairs whose I value
    /// encodes (sequence, index) as `seq * 100 + index`, so ordering is
    /// checkable on the receiving side.
    pub async fn stream_packets(
        &self,
        target: SocketAddr,
        sequences: &[u16],
        samples_per_packet: usize,
    ) -> Result<()> {
        let socket = UdpTransport::bind("127.0.0.1:0").await?;
        for &seq in sequences {
            let iq: Vec<(i16, i16)> = (0..samples_per_packet)
                .map(|k| {
                    let v = (seq as i16) * 100 + k as i16;
                    (v, -v)
                })
                .collect();
            socket.send_to(&encode_data_packet(seq, &iq), target).await?;
            // Let datagrams land in order on loopback.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        Ok(())
    }

    /// Stop serving and release the sockets.
    pub async fn shutdown(self) {
        self.control_task.abort();
        self.discovery_task.abort();
        let _ = self.control_task.await;
        let _ = self.discovery_task.await;
    }
}

/// Answer discovery queries with this unit's descriptor.
async fn serve_discovery(socket: UdpTransport, options: &FakeDeviceOptions, control_port: u16) {
    let mut buf = [0u8; 256];
    loop {
        let (n, src) = match socket.recv_from(&mut buf, Duration::from_secs(3600)).await {
            Ok(r) => r,
            Err(_) => continue,
        };
        if n < 5 || &buf[..4] != DISCOVERY_MAGIC || buf[..n] != query_datagram()[..] {
            continue;
        }

        let port = control_port.to_string();
        let channels = options.channels.to_string();
        let reply = reply_datagram(&[
            ("name", options.name.as_str()),
            ("serial", options.serial.as_str()),
            ("ip", "127.0.0.1"),
            ("port", port.as_str()),
            ("channels", channels.as_str()),
            ("version", "1.07"),
        ]);
        let _ = socket.send_to(&reply, src).await;
    }
}

/// Serve one control connection: read frames, answer like the hardware.
async fn serve_control(
    mut stream: TcpStream,
    options: &FakeDeviceOptions,
    commands: &Arc<Mutex<Vec<CommandFrame>>>,
    running: &Arc<AtomicBool>,
) {
    // Stored item state for read requests:
    // (item code, channel, gain stage) -> payload.
    let mut state: HashMap<(u16, u8, u8), Vec<u8>> = HashMap::new();

    loop {
        let mut prefix = [0u8; 2];
        if stream.read_exact(&mut prefix).await.is_err() {
            break;
        }
        let total = u16::from_le_bytes(prefix) as usize;
        if total < 2 || total > 8192 {
            tracing::debug!(total, "Fake unit: implausible frame length, closing");
            break;
        }
        let mut rest = vec![0u8; total - 2];
        if stream.read_exact(&mut rest).await.is_err() {
            break;
        }

        let mut frame_bytes = prefix.to_vec();
        frame_bytes.extend_from_slice(&rest);
        let cmd = match CommandFrame::decode(&frame_bytes) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(error = %e, "Fake unit: undecodable command, closing");
                break;
            }
        };

        if cmd.item == ControlItem::ReceiverState && !cmd.payload.is_empty() {
            running.store(cmd.payload[0] != 0, Ordering::SeqCst);
        }

        commands.lock().await.push(cmd.clone());

        let resp = respond(&mut state, options, &cmd);
        if stream.write_all(&resp.encode()).await.is_err() {
            break;
        }
        let _ = stream.flush().await;
    }
}

/// Build the response the hardware would give for one command.
fn respond(
    state: &mut HashMap<(u16, u8, u8), Vec<u8>>,
    options: &FakeDeviceOptions,
    cmd: &CommandFrame,
) -> ResponseFrame {
    // NAK hook applies to writes only; reads still answer.
    if options.nak_bandwidth && cmd.item == ControlItem::Bandwidth && !cmd.payload.is_empty() {
        return ResponseFrame::nak(cmd.item, cmd.channel);
    }

    let stage = if cmd.item == ControlItem::Gain {
        *cmd.payload.first().unwrap_or(&0)
    } else {
        0
    };
    let key = (cmd.item.code(), cmd.channel, stage);

    let is_read = match cmd.item {
        ControlItem::Gain => cmd.payload.len() <= 1,
        _ => cmd.payload.is_empty(),
    };

    let payload = if is_read {
        state
            .get(&key)
            .cloned()
            .unwrap_or_else(|| default_payload(cmd.item, stage))
    } else {
        let mut applied = cmd.payload.clone();
        if cmd.item == ControlItem::Frequency {
            if let Some(max) = options.clamp_freq_max {
                let req = u64::from_le_bytes(applied[..8].try_into().expect("8-byte payload"));
                if req > max {
                    applied = max.to_le_bytes().to_vec();
                }
            }
        }
        state.insert(key, applied.clone());
        applied
    };

    ResponseFrame::ack(cmd.item, cmd.channel, payload)
}

/// Zeroed read-answer of the correct width for an item.
fn default_payload(item: ControlItem, stage: u8) -> Vec<u8> {
    match item {
        ControlItem::ReceiverState => vec![0],
        ControlItem::Frequency => vec![0; 8],
        ControlItem::Antenna => vec![0],
        ControlItem::GainMode => vec![0],
        ControlItem::Gain => vec![stage, 0, 0],
        ControlItem::Bandwidth => vec![0; 4],
        ControlItem::SampleRate => vec![0; 4],
        ControlItem::FreqCorrection => vec![0; 4],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netsdr::frame::{self, parse_frequency};
    use netsdr_transport::TcpTransport;

    #[tokio::test]
    async fn fake_acks_commands_over_tcp() {
        let fake = FakeDevice::spawn(FakeDeviceOptions::default()).await.unwrap();

        let mut transport = TcpTransport::connect(&fake.control_addr().to_string())
            .await
            .unwrap();

        use netsdr_core::transport::Transport;
        let cmd = frame::set_frequency(0, 7_100_000);
        transport.send(&cmd.encode()).await.unwrap();

        let mut buf = [0u8; 64];
        let n = transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        let resp = ResponseFrame::decode(&buf[..n]).unwrap();
        assert_eq!(parse_frequency(&resp).unwrap(), 7_100_000);

        let log = fake.received_commands().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].item, ControlItem::Frequency);

        fake.shutdown().await;
    }

    #[tokio::test]
    async fn fake_tracks_run_state() {
        let fake = FakeDevice::spawn(FakeDeviceOptions::default()).await.unwrap();
        assert!(!fake.is_streaming());

        let mut transport = TcpTransport::connect(&fake.control_addr().to_string())
            .await
            .unwrap();

        use netsdr_core::transport::Transport;
        transport
            .send(&frame::set_receiver_state(true).encode())
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        transport
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();

        assert!(fake.is_streaming());
        fake.shutdown().await;
    }

    #[tokio::test]
    async fn fake_streams_explicit_sequence_plan() {
        let fake = FakeDevice::spawn(FakeDeviceOptions::default()).await.unwrap();

        let receiver = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        fake.stream_packets(receiver.local_addr(), &[1, 2], 4)
            .await
            .unwrap();

        let mut buf = [0u8; 256];
        let n = receiver.recv(&mut buf, Duration::from_secs(1)).await.unwrap();
        let pkt = netsdr::datagram::parse_data_packet(&buf[..n]).unwrap();
        assert_eq!(pkt.sequence, 1);
        assert_eq!(pkt.samples.len(), 4);

        fake.shutdown().await;
    }
}
