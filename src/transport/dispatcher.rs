//! Delivery worker
//!
//! Drains a bounded channel of inbound packets into
//! [`SessionRouter::deliver_packet`]:
//!
//! ```text
//! socket task ──► mpsc::Sender<InboundPacket> ──► DeliveryWorker ──► SessionRouter
//! ```
//!
//! One worker per transport. Workers for different transports run
//! concurrently against the same router.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::router::{DeliveryStatus, SessionRouter};
use crate::stats::DeliveryStats;
use crate::types::{MediaType, PacketTime};

/// A packet read from a transport
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub media_type: MediaType,
    pub data: Bytes,
    pub packet_time: PacketTime,
}

impl InboundPacket {
    pub fn new(media_type: MediaType, data: Bytes) -> Self {
        Self {
            media_type,
            data,
            packet_time: PacketTime::unknown(),
        }
    }

    pub fn with_packet_time(mut self, packet_time: PacketTime) -> Self {
        self.packet_time = packet_time;
        self
    }
}

/// Delivery outcome counters, shared with whoever reports on the worker
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    delivered: AtomicU64,
    unknown_ssrc: AtomicU64,
    packet_errors: AtomicU64,
}

impl DeliveryCounters {
    fn record(&self, status: DeliveryStatus) {
        let counter = match status {
            DeliveryStatus::Ok => &self.delivered,
            DeliveryStatus::UnknownSsrc => &self.unknown_ssrc,
            DeliveryStatus::PacketError => &self.packet_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            unknown_ssrc: self.unknown_ssrc.load(Ordering::Relaxed),
            packet_errors: self.packet_errors.load(Ordering::Relaxed),
        }
    }
}

/// Feeds one transport's packets to the router
pub struct DeliveryWorker {
    router: Arc<SessionRouter>,
    receiver: mpsc::Receiver<InboundPacket>,
    counters: Arc<DeliveryCounters>,
}

impl DeliveryWorker {
    /// Create a worker and the sender its transport writes into
    pub fn new(router: Arc<SessionRouter>, capacity: usize) -> (Self, mpsc::Sender<InboundPacket>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = Self {
            router,
            receiver,
            counters: Arc::new(DeliveryCounters::default()),
        };
        (worker, sender)
    }

    pub fn counters(&self) -> Arc<DeliveryCounters> {
        Arc::clone(&self.counters)
    }

    /// Run until every sender is dropped
    pub async fn run(mut self) -> DeliveryStats {
        self.drain().await;
        tracing::debug!("Delivery channel closed");
        self.counters.snapshot()
    }

    /// Run until every sender is dropped or `shutdown` resolves
    pub async fn run_until<F>(mut self, shutdown: F) -> DeliveryStats
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
            }
            _ = self.drain() => {
                tracing::debug!("Delivery channel closed");
            }
        }

        let stats = self.counters.snapshot();
        tracing::info!(
            delivered = stats.delivered,
            unknown_ssrc = stats.unknown_ssrc,
            packet_errors = stats.packet_errors,
            "Delivery worker stopped"
        );
        stats
    }

    async fn drain(&mut self) {
        while let Some(packet) = self.receiver.recv().await {
            let status =
                self.router
                    .deliver_packet(packet.media_type, &packet.data, packet.packet_time);
            if status != DeliveryStatus::Ok {
                tracing::trace!(status = ?status, length = packet.data.len(), "Packet not delivered");
            }
            self.counters.record(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot;

    use super::*;
    use crate::protocol::RtpPacketBuilder;
    use crate::router::{Direction, RouterConfig, StreamConfig};
    use crate::testing::{MockCongestionController, MockStream};
    use crate::types::MediaKind;

    fn router() -> Arc<SessionRouter> {
        let congestion = Arc::new(MockCongestionController::new());
        Arc::new(SessionRouter::new(RouterConfig::default(), congestion).unwrap())
    }

    fn rtp(ssrc: u32, seq: u16) -> Bytes {
        RtpPacketBuilder::new(96, seq, 0, ssrc).payload(&[0; 8]).build()
    }

    #[tokio::test]
    async fn test_run_counts_outcomes() {
        let router = router();
        let stream = Arc::new(MockStream::new(MediaKind::Video));
        router
            .create_stream(Direction::Receive, StreamConfig::video(0xA), stream.clone())
            .unwrap();

        let (worker, sender) = DeliveryWorker::new(Arc::clone(&router), 16);
        let handle = tokio::spawn(worker.run());

        for seq in 0..5 {
            sender.send(InboundPacket::new(MediaType::Any, rtp(0xA, seq))).await.unwrap();
        }
        sender.send(InboundPacket::new(MediaType::Any, rtp(0xB, 0))).await.unwrap();
        sender
            .send(InboundPacket::new(MediaType::Any, Bytes::from_static(&[0x80, 96, 0])))
            .await
            .unwrap();
        drop(sender);

        let stats = handle.await.unwrap();
        assert_eq!(
            stats,
            DeliveryStats {
                delivered: 5,
                unknown_ssrc: 1,
                packet_errors: 1,
            }
        );
        assert_eq!(stream.rtp_count(), 5);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let router = router();
        let (worker, sender) = DeliveryWorker::new(router, 4);
        let counters = worker.counters();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(worker.run_until(async {
            let _ = shutdown_rx.await;
        }));

        sender
            .send(InboundPacket::new(MediaType::Audio, rtp(0xC, 1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counters.snapshot().unknown_ssrc, 1);

        shutdown_tx.send(()).unwrap();
        let stats = handle.await.unwrap();
        assert_eq!(stats.total(), 1);
        // Stopped on the signal, not on channel close
        assert!(sender.is_closed());
    }

    #[tokio::test]
    async fn test_parallel_workers_share_router() {
        let router = router();
        let streams: Vec<_> = (0..4u32)
            .map(|i| {
                let stream = Arc::new(MockStream::new(MediaKind::Video));
                router
                    .create_stream(Direction::Receive, StreamConfig::video(i + 1), stream.clone())
                    .unwrap();
                stream
            })
            .collect();

        let mut handles = Vec::new();
        for i in 0..4u32 {
            let (worker, sender) = DeliveryWorker::new(Arc::clone(&router), 8);
            handles.push(tokio::spawn(worker.run()));
            tokio::spawn(async move {
                for seq in 0..50 {
                    let packet = InboundPacket::new(MediaType::Video, rtp(i + 1, seq))
                        .with_packet_time(PacketTime::from_us(1_000 * seq as i64));
                    if sender.send(packet).await.is_err() {
                        break;
                    }
                }
            });
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().delivered, 50);
        }
        for stream in &streams {
            assert_eq!(stream.rtp_count(), 50);
        }
    }
}
