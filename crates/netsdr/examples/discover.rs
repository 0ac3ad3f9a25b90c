//! LAN discovery example.
//!
//! Broadcasts a discovery query and lists every unit that answers, then
//! connects to the first one and prints its configuration.
//!
//! # Requirements
//!
//! - A NetSDR-family unit on the same LAN
//! - UDP port 48321 accessible (not blocked by a firewall)
//!
//! # Usage
//!
//! ```sh
//! cargo run -p netsdr --example discover
//! ```

use std::time::Duration;

use netsdr::{discovery, NetSdrBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("Searching for units on the LAN (2 seconds)...\n");

    let devices = discovery::discover(Duration::from_secs(2)).await?;

    if devices.is_empty() {
        println!("No units found on the network.");
        println!("\nTroubleshooting:");
        println!("  - Verify the unit is powered on and connected to the LAN");
        println!("  - Check that UDP port 48321 is not blocked by a firewall");
        println!("  - Ensure your computer is on the same subnet as the unit");
        return Ok(());
    }

    println!("Found {} unit(s):\n", devices.len());
    for (i, device) in devices.iter().enumerate() {
        println!("  [{}] {} (S/N: {})", i + 1, device.name, device.serial);
        println!("      Control: {}", device.control_addr());
        println!("      Channels: {}", device.channels);
        println!("      Firmware: {}", device.firmware_version);
        println!();
    }

    // Connect to the first discovered unit.
    let device = &devices[0];
    println!("Connecting to {} at {}...", device.name, device.control_addr());

    let source = NetSdrBuilder::new().device(device).build().await?;

    println!("Connected. {} channel(s).\n", source.num_channels());
    for chan in 0..source.num_channels() {
        let freq = source.center_freq(chan).await?;
        let rate = source.sample_rate(chan).await?;
        let antenna = source.antenna(chan).await?;
        println!(
            "  channel {}: {:.6} MHz, {} sps, antenna {}",
            chan,
            freq as f64 / 1e6,
            rate,
            antenna
        );
    }

    source.disconnect().await?;
    Ok(())
}
