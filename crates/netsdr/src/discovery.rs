//! LAN discovery of NetSDR-family units.
//!
//! Units answer a broadcast query datagram on UDP port 48321 with a
//! descriptor reply: the discovery magic followed by ASCII `key=value`
//! pairs identifying the unit. This module sends the query, collects all
//! distinct replies arriving before the deadline, and returns them as
//! [`DiscoveredDevice`]s.
//!
//! Discovery is usable before any source is constructed, for CLI and UI
//! device listings.
//!
//! # Usage
//!
//! ```no_run
//! use netsdr::discovery;
//! use std::time::Duration;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let units = discovery::discover(Duration::from_secs(2)).await?;
//! for unit in &units {
//!     println!("{} ({}) at {}", unit.name, unit.serial, unit.control_addr());
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use netsdr_core::error::{Error, Result};
use netsdr_transport::UdpTransport;

/// Default discovery port.
pub const DISCOVERY_PORT: u16 = 48321;

/// Magic prefix of all discovery datagrams.
pub const DISCOVERY_MAGIC: &[u8; 4] = b"NSDR";

/// Datagram type byte: query from the host.
const MSG_QUERY: u8 = 0x01;

/// Datagram type byte: descriptor reply from a unit.
const MSG_REPLY: u8 = 0x02;

/// Default control port reported by units that omit the `port` key.
const DEFAULT_CONTROL_PORT: u16 = 50000;

/// A unit discovered on the local network.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Product name (e.g. "NetSDR").
    pub name: String,
    /// Unit serial number.
    pub serial: String,
    /// IP address of the unit.
    pub ip: IpAddr,
    /// Control TCP port (typically 50000).
    pub port: u16,
    /// Number of receive channels the unit advertises.
    pub channels: usize,
    /// Firmware version string.
    pub firmware_version: String,
}

impl DiscoveredDevice {
    /// The unit's control endpoint as a `host:port` string.
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// The discovery query datagram.
pub fn query_datagram() -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.extend_from_slice(DISCOVERY_MAGIC);
    buf.push(MSG_QUERY);
    buf
}

/// Encode a descriptor reply datagram.
///
/// Used by the fake device in the test harness; real units build the
/// equivalent in firmware.
pub fn reply_datagram(fields: &[(&str, &str)]) -> Vec<u8> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ");
    let mut buf = Vec::with_capacity(5 + body.len());
    buf.extend_from_slice(DISCOVERY_MAGIC);
    buf.push(MSG_REPLY);
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Broadcast a query and collect descriptor replies until `timeout`.
///
/// Returns all unique units discovered, deduplicated by serial number.
/// An empty network yields an empty vector, not an error.
pub async fn discover(timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    let target: SocketAddr = SocketAddr::from(([255, 255, 255, 255], DISCOVERY_PORT));
    discover_at(target, timeout).await
}

/// Send the query to a specific address and collect replies until
/// `timeout`.
///
/// This variant lets tests point discovery at a loopback fake instead of
/// the broadcast address.
pub async fn discover_at(target: SocketAddr, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
    let socket = UdpTransport::bind("0.0.0.0:0").await?;
    socket.set_broadcast(true)?;

    tracing::debug!(target = %target, timeout_ms = timeout.as_millis(), "Sending discovery query");
    socket.send_to(&query_datagram(), target).await?;

    let mut devices: HashMap<String, DiscoveredDevice> = HashMap::new();
    let mut buf = [0u8; 2048];

    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match socket.recv_from(&mut buf, remaining).await {
            Ok((n, src)) => match parse_descriptor(&buf[..n], src.ip()) {
                Ok(device) => {
                    tracing::debug!(
                        name = %device.name,
                        serial = %device.serial,
                        ip = %device.ip,
                        "Discovered unit"
                    );
                    devices.entry(device.serial.clone()).or_insert(device);
                }
                Err(_) => {
                    // Not a descriptor reply (could be our own query
                    // looped back) -- ignore.
                }
            },
            Err(Error::Timeout) => break,
            Err(e) => {
                tracing::trace!(error = %e, "Discovery recv error");
            }
        }
    }

    let result: Vec<DiscoveredDevice> = devices.into_values().collect();
    tracing::debug!(count = result.len(), "Discovery complete");
    Ok(result)
}

/// Parse a single datagram as a descriptor reply.
///
/// The datagram must start with the magic and reply type byte; the rest
/// is ASCII `key=value` pairs separated by whitespace.
fn parse_descriptor(data: &[u8], src_ip: IpAddr) -> Result<DiscoveredDevice> {
    if data.len() < 5 || &data[..4] != DISCOVERY_MAGIC {
        return Err(Error::MalformedFrame("not a discovery datagram".into()));
    }
    if data[4] != MSG_REPLY {
        return Err(Error::MalformedFrame("not a descriptor reply".into()));
    }

    let body = std::str::from_utf8(&data[5..])
        .map_err(|_| Error::MalformedFrame("descriptor body is not valid UTF-8".into()))?;

    let mut kv: HashMap<&str, &str> = HashMap::new();
    for token in body.split_whitespace() {
        if let Some(eq_pos) = token.find('=') {
            kv.insert(&token[..eq_pos], &token[eq_pos + 1..]);
        }
    }

    let name = kv.get("name").copied().unwrap_or_default().to_string();
    let serial = kv.get("serial").copied().unwrap_or_default().to_string();
    let port = kv
        .get("port")
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_CONTROL_PORT);
    let channels = kv
        .get("channels")
        .and_then(|c| c.parse().ok())
        .unwrap_or(1);
    let firmware_version = kv.get("version").copied().unwrap_or_default().to_string();

    // Prefer the IP the unit reports about itself; fall back to the
    // datagram's source address.
    let ip = kv
        .get("ip")
        .and_then(|s| s.parse().ok())
        .unwrap_or(src_ip);

    Ok(DiscoveredDevice {
        name,
        serial,
        ip,
        port,
        channels,
        firmware_version,
    })
}
