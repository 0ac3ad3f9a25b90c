//! Sample-stream receiver for the UDP data channel.
//!
//! [`StreamReceiver`] owns the data socket and a dedicated receive task.
//! The task is the sole writer of a bounded sample queue; the host's
//! [`pull`](StreamReceiver::pull) is the sole reader. Continuity is
//! tracked per packet through the 16-bit sequence field: a gap is counted
//! as a drop event (never fatal), a duplicate or stale packet is
//! discarded.
//!
//! Receiver states map onto the implementation as follows: Stopped is no
//! spawned task, Running is a live task, and the Starting/Stopping
//! transients are the bodies of [`start`](StreamReceiver::start) and
//! [`stop`](StreamReceiver::stop).
//!
//! # Overflow policy
//!
//! When the host does not pull fast enough the queue would grow without
//! bound, so the writer applies an explicit [`OverflowPolicy`]:
//!
//! - [`OverflowPolicy::DropOldest`] (default): evict the oldest unread
//!   samples and count them in [`StreamStats::overflow_dropped`]
//! - [`OverflowPolicy::Block`]: the receive task waits for the host,
//!   pushing backpressure into the OS socket buffer

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use netsdr_core::error::{Error, Result};
use netsdr_core::types::{IqSample, SampleBlock};
use netsdr_transport::UdpTransport;

use crate::datagram;

/// Default bounded-queue capacity in samples (one second at 256 ksps).
pub const DEFAULT_QUEUE_CAPACITY: usize = 262_144;

/// What the receive task does when the sample queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest unread samples to make room, counting them in
    /// [`StreamStats::overflow_dropped`].
    #[default]
    DropOldest,
    /// Wait for the host to pull before accepting more datagrams.
    Block,
}

/// Counters describing stream health. All values are cumulative since
/// `start()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Datagrams accepted.
    pub packets: u64,
    /// Samples decoded and queued.
    pub samples: u64,
    /// Sequence-gap events (each gap counts once regardless of width).
    pub drop_events: u64,
    /// Packets the gaps account for.
    pub lost_packets: u64,
    /// Duplicate or stale datagrams discarded.
    pub duplicates: u64,
    /// Samples evicted by [`OverflowPolicy::DropOldest`].
    pub overflow_dropped: u64,
}

/// State shared between the receive task and the pulling host.
struct Shared {
    /// The bounded sample queue. Held only for non-blocking operations.
    queue: std::sync::Mutex<VecDeque<IqSample>>,
    /// Wakes the puller when samples arrive or the stream stops.
    data_ready: Notify,
    /// Wakes a blocked writer (Block policy) when the host pulls.
    space_ready: Notify,
    /// Cleared by `stop()`; the puller and writer both watch it.
    running: AtomicBool,
    capacity: usize,
    policy: OverflowPolicy,

    packets: AtomicU64,
    samples: AtomicU64,
    drop_events: AtomicU64,
    lost_packets: AtomicU64,
    duplicates: AtomicU64,
    overflow_dropped: AtomicU64,
    /// Drop events not yet attributed to a pull.
    unread_drop_events: AtomicU64,
}

/// Receives the UDP sample stream and feeds the host's pulls.
pub struct StreamReceiver {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

impl StreamReceiver {
    /// Create a stopped receiver with the given queue bound and policy.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        StreamReceiver {
            shared: Arc::new(Shared {
                queue: std::sync::Mutex::new(VecDeque::new()),
                data_ready: Notify::new(),
                space_ready: Notify::new(),
                running: AtomicBool::new(false),
                capacity,
                policy,
                packets: AtomicU64::new(0),
                samples: AtomicU64::new(0),
                drop_events: AtomicU64::new(0),
                lost_packets: AtomicU64::new(0),
                duplicates: AtomicU64::new(0),
                overflow_dropped: AtomicU64::new(0),
                unread_drop_events: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
            local_addr: std::sync::Mutex::new(None),
        }
    }

    /// Bind the data socket and spawn the receive loop.
    ///
    /// `bind_addr` is the local endpoint the unit streams to, e.g.
    /// `"0.0.0.0:50000"` (or port 0 in tests, with [`data_addr`]
    /// reporting the assigned port). Starting an already-running
    /// receiver is a no-op.
    ///
    /// [`data_addr`]: StreamReceiver::data_addr
    pub async fn start(&self, bind_addr: &str) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        let socket = UdpTransport::bind(bind_addr).await?;
        let local = socket.local_addr();
        *self.local_addr.lock().expect("addr lock") = Some(local);

        // Reset continuity bookkeeping from any previous run; cumulative
        // counters are reset too so stats describe this run.
        {
            let mut q = self.shared.queue.lock().expect("queue lock");
            q.clear();
        }
        self.shared.packets.store(0, Ordering::Relaxed);
        self.shared.samples.store(0, Ordering::Relaxed);
        self.shared.drop_events.store(0, Ordering::Relaxed);
        self.shared.lost_packets.store(0, Ordering::Relaxed);
        self.shared.duplicates.store(0, Ordering::Relaxed);
        self.shared.overflow_dropped.store(0, Ordering::Relaxed);
        self.shared.unread_drop_events.store(0, Ordering::Relaxed);

        self.shared.running.store(true, Ordering::SeqCst);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            receive_loop(socket, shared).await;
        });
        *task = Some(handle);

        tracing::debug!(addr = %local, "Sample stream receiver started");
        Ok(())
    }

    /// The data socket's local address while running.
    pub fn data_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("addr lock")
    }

    /// Whether the receive loop is running.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Pull up to `n` samples, blocking until enough have arrived or the
    /// receiver stops.
    ///
    /// While running, the returned block holds exactly `n` samples in
    /// arrival order. After `stop()`, whatever remains in the queue is
    /// returned with `underrun` set; once drained, further pulls fail
    /// with [`Error::StreamClosed`]. A pull blocked mid-wait is woken
    /// promptly by `stop()`.
    pub async fn pull(&self, n: usize) -> Result<SampleBlock> {
        loop {
            {
                let mut q = self.shared.queue.lock().expect("queue lock");
                let running = self.shared.running.load(Ordering::SeqCst);

                if q.len() >= n || !running {
                    if q.is_empty() && !running {
                        return Err(Error::StreamClosed);
                    }
                    let take = n.min(q.len());
                    let samples: Vec<IqSample> = q.drain(..take).collect();
                    drop(q);

                    self.shared.space_ready.notify_one();
                    let drop_events =
                        self.shared.unread_drop_events.swap(0, Ordering::Relaxed);
                    return Ok(SampleBlock {
                        underrun: samples.len() < n,
                        samples,
                        drop_events,
                    });
                }
            }

            self.shared.data_ready.notified().await;
        }
    }

    /// Signal the receive loop to exit, join it, and close the socket.
    ///
    /// Safe to call from any task, including while a `pull` is blocked;
    /// the pull returns promptly. Idempotent.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;

        self.shared.running.store(false, Ordering::SeqCst);
        // Wake both sides: a blocked pull and (Block policy) a blocked
        // writer.
        self.shared.data_ready.notify_one();
        self.shared.space_ready.notify_one();

        if let Some(handle) = task.take() {
            // The loop blocks in socket recv with no deadline; abort it
            // and let the socket close on drop.
            handle.abort();
            let _ = handle.await;
            tracing::debug!("Sample stream receiver stopped");
        }

        *self.local_addr.lock().expect("addr lock") = None;
    }

    /// Snapshot of the stream-health counters.
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            packets: self.shared.packets.load(Ordering::Relaxed),
            samples: self.shared.samples.load(Ordering::Relaxed),
            drop_events: self.shared.drop_events.load(Ordering::Relaxed),
            lost_packets: self.shared.lost_packets.load(Ordering::Relaxed),
            duplicates: self.shared.duplicates.load(Ordering::Relaxed),
            overflow_dropped: self.shared.overflow_dropped.load(Ordering::Relaxed),
        }
    }
}

/// The dedicated receive loop: sole writer of the sample queue.
async fn receive_loop(socket: UdpTransport, shared: Arc<Shared>) {
    let mut buf = [0u8; 8192];
    let mut last_seq: Option<u16> = None;

    while shared.running.load(Ordering::SeqCst) {
        let n = match socket.recv_blocking(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                tracing::trace!(error = %e, "Data socket recv error");
                continue;
            }
        };

        let packet = match datagram::parse_data_packet(&buf[..n]) {
            Ok(p) => p,
            Err(e) => {
                tracing::trace!(error = %e, "Ignoring undecodable datagram");
                continue;
            }
        };

        // Continuity check. `ahead` is how far past the expected counter
        // this packet landed: 0 = in order, small = gap (packets lost),
        // huge = stale or duplicate (it wrapped "backwards").
        if let Some(last) = last_seq {
            let expected = last.wrapping_add(1);
            let ahead = packet.sequence.wrapping_sub(expected);
            if ahead == 0 {
                // In order.
            } else if ahead < 0x8000 {
                tracing::debug!(
                    expected,
                    got = packet.sequence,
                    lost = ahead,
                    "Sample stream gap"
                );
                shared.drop_events.fetch_add(1, Ordering::Relaxed);
                shared.unread_drop_events.fetch_add(1, Ordering::Relaxed);
                shared.lost_packets.fetch_add(ahead as u64, Ordering::Relaxed);
            } else {
                shared.duplicates.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        }
        last_seq = Some(packet.sequence);

        shared.packets.fetch_add(1, Ordering::Relaxed);
        shared
            .samples
            .fetch_add(packet.samples.len() as u64, Ordering::Relaxed);

        enqueue(&shared, packet.samples).await;
        shared.data_ready.notify_one();
    }
}

/// Append samples to the queue, applying the overflow policy.
async fn enqueue(shared: &Shared, samples: Vec<IqSample>) {
    match shared.policy {
        OverflowPolicy::DropOldest => {
            let mut q = shared.queue.lock().expect("queue lock");
            q.extend(samples);
            if q.len() > shared.capacity {
                let excess = q.len() - shared.capacity;
                q.drain(..excess);
                shared
                    .overflow_dropped
                    .fetch_add(excess as u64, Ordering::Relaxed);
                tracing::trace!(excess, "Sample queue overflow, oldest dropped");
            }
        }
        OverflowPolicy::Block => {
            let needed = samples.len();
            loop {
                {
                    let mut q = shared.queue.lock().expect("queue lock");
                    if q.len() + needed <= shared.capacity
                        || !shared.running.load(Ordering::SeqCst)
                    {
                        q.extend(samples);
                        return;
                    }
                }
                shared.space_ready.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::datagram::encode_data_packet;

    /// Fixture: a started receiver plus a sender socket aimed at it.
    async fn started_receiver(
        capacity: usize,
        policy: OverflowPolicy,
    ) -> (StreamReceiver, UdpTransport, SocketAddr) {
        let receiver = StreamReceiver::new(capacity, policy);
        receiver.start("127.0.0.1:0").await.unwrap();
        let addr = receiver.data_addr().unwrap();
        let sender = UdpTransport::bind("127.0.0.1:0").await.unwrap();
        (receiver, sender, addr)
    }

    fn ramp(start: i16, count: usize) -> Vec<(i16, i16)> {
        (0..count as i16).map(|k| (start + k, -(start + k))).collect()
    }

    #[tokio::test]
    async fn pull_returns_samples_in_arrival_order() {
        let (receiver, sender, addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;

        sender
            .send_to(&encode_data_packet(0, &ramp(0, 4)), addr)
            .await
            .unwrap();
        sender
            .send_to(&encode_data_packet(1, &ramp(4, 4)), addr)
            .await
            .unwrap();

        let block = receiver.pull(8).await.unwrap();
        assert_eq!(block.len(), 8);
        assert!(!block.underrun);
        assert_eq!(block.drop_events, 0);
        for (k, s) in block.samples.iter().enumerate() {
            assert_eq!(s.i, k as f32 * IqSample::SCALE, "sample {}", k);
        }

        receiver.stop().await;
    }

    #[tokio::test]
    async fn sequence_gap_counts_one_drop_event() {
        let (receiver, sender, addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;

        // Sequence 1, 2, 4, 5 -- packet 3 never arrives.
        for seq in [1u16, 2, 4, 5] {
            sender
                .send_to(&encode_data_packet(seq, &ramp(seq as i16 * 10, 2)), addr)
                .await
                .unwrap();
        }

        // All four delivered packets' samples arrive, in order, none
        // duplicated.
        let block = receiver.pull(8).await.unwrap();
        assert_eq!(block.len(), 8);
        assert_eq!(block.drop_events, 1);
        let expected: Vec<i16> = [10, 11, 20, 21, 40, 41, 50, 51].to_vec();
        for (s, want) in block.samples.iter().zip(&expected) {
            assert_eq!(s.i, *want as f32 * IqSample::SCALE);
        }

        let stats = receiver.stats();
        assert_eq!(stats.packets, 4);
        assert_eq!(stats.drop_events, 1);
        assert_eq!(stats.lost_packets, 1);
        assert_eq!(stats.duplicates, 0);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn duplicate_packet_is_discarded() {
        let (receiver, sender, addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;

        let pkt = encode_data_packet(7, &ramp(0, 3));
        sender.send_to(&pkt, addr).await.unwrap();
        sender.send_to(&pkt, addr).await.unwrap(); // retransmit
        sender
            .send_to(&encode_data_packet(8, &ramp(3, 3)), addr)
            .await
            .unwrap();

        let block = receiver.pull(6).await.unwrap();
        assert_eq!(block.len(), 6);
        assert_eq!(block.drop_events, 0);
        for (k, s) in block.samples.iter().enumerate() {
            assert_eq!(s.i, k as f32 * IqSample::SCALE);
        }

        let stats = receiver.stats();
        assert_eq!(stats.duplicates, 1);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn sequence_wrap_is_not_a_gap() {
        let (receiver, sender, addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;

        sender
            .send_to(&encode_data_packet(0xFFFF, &ramp(0, 2)), addr)
            .await
            .unwrap();
        sender
            .send_to(&encode_data_packet(0x0000, &ramp(2, 2)), addr)
            .await
            .unwrap();

        let block = receiver.pull(4).await.unwrap();
        assert_eq!(block.len(), 4);
        assert_eq!(block.drop_events, 0);
        assert_eq!(receiver.stats().drop_events, 0);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn stop_wakes_blocked_pull() {
        let (receiver, _sender, _addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;
        let receiver = Arc::new(receiver);

        let puller = Arc::clone(&receiver);
        let pull_task = tokio::spawn(async move {
            // Nothing is being sent; this blocks until stop().
            puller.pull(1024).await
        });

        // Give the pull time to block.
        tokio::time::sleep(Duration::from_millis(50)).await;
        receiver.stop().await;

        let result = tokio::time::timeout(Duration::from_millis(500), pull_task)
            .await
            .expect("pull did not return after stop")
            .unwrap();

        // The queue was empty, so the wakeup reports termination.
        assert!(matches!(result, Err(Error::StreamClosed)));
    }

    #[tokio::test]
    async fn stop_drains_remaining_samples_with_underrun() {
        let (receiver, sender, addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;

        sender
            .send_to(&encode_data_packet(0, &ramp(0, 4)), addr)
            .await
            .unwrap();

        // Wait for the samples to be queued before stopping.
        let first = receiver.pull(4).await.unwrap();
        assert_eq!(first.len(), 4);

        sender
            .send_to(&encode_data_packet(1, &ramp(4, 4)), addr)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        receiver.stop().await;

        // Short read with the underrun marker, then StreamClosed.
        let block = receiver.pull(100).await.unwrap();
        assert_eq!(block.len(), 4);
        assert!(block.underrun);

        let result = receiver.pull(1).await;
        assert!(matches!(result, Err(Error::StreamClosed)));
    }

    #[tokio::test]
    async fn drop_oldest_evicts_and_counts() {
        // Queue bounded to 8 samples.
        let (receiver, sender, addr) = started_receiver(8, OverflowPolicy::DropOldest).await;

        sender
            .send_to(&encode_data_packet(0, &ramp(0, 8)), addr)
            .await
            .unwrap();
        sender
            .send_to(&encode_data_packet(1, &ramp(8, 4)), addr)
            .await
            .unwrap();

        // Let both datagrams land.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let block = receiver.pull(8).await.unwrap();
        // The four oldest samples were evicted; the block starts at 4.
        assert_eq!(block.len(), 8);
        assert_eq!(block.samples[0].i, 4.0 * IqSample::SCALE);
        assert_eq!(receiver.stats().overflow_dropped, 4);

        receiver.stop().await;
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let (receiver, sender, addr) =
            started_receiver(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::DropOldest).await;

        sender
            .send_to(&encode_data_packet(0, &ramp(0, 2)), addr)
            .await
            .unwrap();
        let block = receiver.pull(2).await.unwrap();
        assert_eq!(block.len(), 2);

        receiver.stop().await;
        assert!(!receiver.is_running());

        // A second start binds a fresh socket and resets counters.
        receiver.start("127.0.0.1:0").await.unwrap();
        assert!(receiver.is_running());
        assert_eq!(receiver.stats().packets, 0);

        let addr2 = receiver.data_addr().unwrap();
        sender
            .send_to(&encode_data_packet(9, &ramp(50, 2)), addr2)
            .await
            .unwrap();
        let block = receiver.pull(2).await.unwrap();
        assert_eq!(block.samples[0].i, 50.0 * IqSample::SCALE);

        receiver.stop().await;
    }
}
