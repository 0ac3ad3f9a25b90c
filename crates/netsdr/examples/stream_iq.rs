//! Sample streaming example.
//!
//! Connects to a unit, tunes it, starts the sample stream, and pulls
//! blocks while printing a running power estimate and the stream-health
//! counters.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p netsdr --example stream_iq -- 192.168.1.50
//! ```

use netsdr::NetSdrBuilder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let host = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.50".to_string());

    println!("Connecting to {}...", host);
    let source = NetSdrBuilder::new().host(&host).build().await?;

    let freq = source.set_center_freq(0, 7_074_000).await?;
    let rate = source.set_sample_rate(0, 256_000).await?;
    println!("Tuned to {:.6} MHz at {} sps", freq as f64 / 1e6, rate);

    source.start().await?;
    println!("Streaming; pulling 10 blocks of 16384 samples...\n");

    for n in 0..10 {
        let block = source.read_samples(16_384).await?;

        let power: f32 = block
            .samples
            .iter()
            .map(|s| s.i * s.i + s.q * s.q)
            .sum::<f32>()
            / block.len().max(1) as f32;

        println!(
            "block {:2}: {:5} samples, avg power {:.6}, gaps since last pull: {}",
            n,
            block.len(),
            power,
            block.drop_events
        );
    }

    let stats = source.stream_stats();
    println!(
        "\nstream health: {} packets, {} samples, {} gap events ({} packets lost), {} duplicates",
        stats.packets, stats.samples, stats.drop_events, stats.lost_packets, stats.duplicates
    );

    source.stop().await?;
    source.disconnect().await?;
    Ok(())
}
