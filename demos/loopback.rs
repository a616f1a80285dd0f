//! Loopback session demo
//!
//! Run with: cargo run --example loopback [PACKETS]
//!
//! Wires one video receive pipeline (with RTX) into a session router,
//! then feeds it synthetic traffic through a delivery worker:
//!
//! - media packets on the primary SSRC, with every tenth one "lost"
//! - RTX retransmissions of the lost packets
//! - packets for an SSRC nobody registered
//!
//! Set `RUST_LOG=rtp_router=trace` to see per-packet routing decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use rtp_router::fec::UlpfecReceiver;
use rtp_router::ntp::RemoteNtpEstimator;
use rtp_router::payload::{PayloadSpecifics, PayloadTypeRegistry};
use rtp_router::pipeline::{
    BandwidthEstimator, DecodeBuffer, MediaPacket, RemoteNtp, RtcpModule, RttStats, SinkError,
};
use rtp_router::protocol::{PacketHeader, RtpHeaderParser, RtpPacketBuilder};
use rtp_router::router::{CongestionController, SentPacket};
use rtp_router::stats::ReceiveStatistics;
use rtp_router::{
    Collaborators, DeliveryWorker, Direction, InboundPacket, MediaType, NetworkState,
    PacketError, PacketTime, PipelineConfig, ReceivePipeline, RouterConfig, SessionRouter,
    StreamConfig, SystemClock,
};

const MEDIA_SSRC: u32 = 0x0000_1000;
const RTX_SSRC: u32 = 0x0000_1001;
const STRANGER_SSRC: u32 = 0x0000_BEEF;
const VP8_PT: u8 = 96;
const RTX_PT: u8 = 97;

/// Congestion controller with fixed estimates
struct FixedCongestion;

impl CongestionController for FixedCongestion {
    fn set_bwe_bitrates(&self, min_bps: u32, start_bps: Option<u32>, max_bps: Option<u32>) {
        tracing::info!(min_bps = min_bps, start_bps = ?start_bps, max_bps = ?max_bps, "BWE bitrates");
    }

    fn signal_network_state(&self, state: NetworkState) {
        tracing::info!(state = ?state, "Congestion controller network state");
    }

    fn on_sent_packet(&self, _packet: SentPacket) {}

    fn available_send_bandwidth_bps(&self) -> u32 {
        1_000_000
    }

    fn receive_bandwidth_bps(&self) -> u32 {
        1_000_000
    }

    fn pacer_queuing_delay_ms(&self) -> i64 {
        0
    }
}

#[derive(Default)]
struct ByteCountingEstimator {
    bytes: AtomicU64,
}

impl BandwidthEstimator for ByteCountingEstimator {
    fn incoming_packet(&self, _arrival_time_ms: i64, payload_size: usize, _header: &PacketHeader) {
        self.bytes.fetch_add(payload_size as u64, Ordering::Relaxed);
    }
}

#[derive(Default)]
struct PrintingDecodeBuffer {
    frames: AtomicU64,
}

impl DecodeBuffer for PrintingDecodeBuffer {
    fn insert_packet(&self, packet: MediaPacket) -> Result<(), SinkError> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            ssrc = packet.header.ssrc,
            sequence_number = packet.header.sequence_number,
            payload_len = packet.payload.len(),
            in_order = packet.in_order,
            "Decode buffer received packet"
        );
        Ok(())
    }
}

/// RTCP module that accepts everything and never measures RTT
struct SilentRtcp;

impl RtcpModule for SilentRtcp {
    fn incoming_rtcp_packet(&self, _packet: &[u8]) -> Result<(), PacketError> {
        Ok(())
    }

    fn rtt(&self, _remote_ssrc: u32) -> Option<RttStats> {
        None
    }

    fn remote_ntp(&self) -> Option<RemoteNtp> {
        None
    }
}

fn media_packet(seq: u16) -> Bytes {
    RtpPacketBuilder::new(VP8_PT, seq, u32::from(seq) * 3000, MEDIA_SSRC)
        .marker(true)
        .payload(&[seq as u8; 120])
        .build()
}

fn rtx_packet(rtx_seq: u16, original_seq: u16) -> Bytes {
    let mut body = original_seq.to_be_bytes().to_vec();
    body.extend_from_slice(&[original_seq as u8; 120]);
    RtpPacketBuilder::new(RTX_PT, rtx_seq, u32::from(original_seq) * 3000, RTX_SSRC)
        .marker(true)
        .payload(&body)
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let count: u16 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 200,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rtp_router=info".parse()?)
                .add_directive("loopback=debug".parse()?),
        )
        .init();

    let clock = Arc::new(SystemClock::new());
    let registry = Arc::new(PayloadTypeRegistry::new());
    registry.register_receive_payload(VP8_PT, PayloadSpecifics::video("VP8"));
    registry.set_rtx_ssrc(RTX_SSRC);
    registry.set_rtx_payload_type(RTX_PT, VP8_PT);
    registry.set_use_rtx_payload_mapping_on_restore(true);

    let bandwidth = Arc::new(ByteCountingEstimator::default());
    let decode_buffer = Arc::new(PrintingDecodeBuffer::default());
    let statistics = Arc::new(ReceiveStatistics::new(clock.clone()));

    let deps = Collaborators {
        clock: clock.clone(),
        parser: Arc::new(RtpHeaderParser::new()),
        registry,
        statistics: statistics.clone(),
        bandwidth: bandwidth.clone(),
        decode_buffer: decode_buffer.clone(),
        fec: Arc::new(UlpfecReceiver::new()),
        ntp: Arc::new(RemoteNtpEstimator::new(clock)),
        rtcp: Arc::new(SilentRtcp),
    };

    let pipeline = Arc::new(ReceivePipeline::new(
        PipelineConfig::with_remote_ssrc(MEDIA_SSRC),
        deps,
    ));
    pipeline.set_nack_status(true, 100);
    pipeline.start_receive();

    let router = Arc::new(SessionRouter::new(RouterConfig::default(), Arc::new(FixedCongestion))?);
    let handle = router.create_stream(
        Direction::Receive,
        StreamConfig::video(MEDIA_SSRC).rtx_ssrc(RTX_SSRC),
        pipeline.clone(),
    )?;

    let (worker, sender) = DeliveryWorker::new(Arc::clone(&router), 64);
    let worker = tokio::spawn(worker.run_until(async {
        let _ = tokio::signal::ctrl_c().await;
    }));

    let mut lost = Vec::new();
    for seq in 0..count {
        if seq % 10 == 9 {
            lost.push(seq);
            continue;
        }
        sender
            .send(InboundPacket::new(MediaType::Video, media_packet(seq)))
            .await?;
    }
    for (rtx_seq, seq) in lost.iter().enumerate() {
        sender
            .send(InboundPacket::new(MediaType::Any, rtx_packet(rtx_seq as u16, *seq)))
            .await?;
    }
    for seq in 0..5 {
        let stray = RtpPacketBuilder::new(VP8_PT, seq, 0, STRANGER_SSRC).build();
        sender
            .send(InboundPacket::new(MediaType::Any, stray).with_packet_time(PacketTime::unknown()))
            .await?;
    }
    drop(sender);

    let delivery = worker.await?;
    router.destroy_stream(handle)?;

    println!(
        "Delivery: delivered={} unknown_ssrc={} packet_errors={}",
        delivery.delivered, delivery.unknown_ssrc, delivery.packet_errors
    );
    println!(
        "Pipeline: decoded={} payload_bytes={} retransmitted={}",
        decode_buffer.frames.load(Ordering::Relaxed),
        bandwidth.bytes.load(Ordering::Relaxed),
        lost.len(),
    );
    if let Some(counters) = statistics.data_counters(MEDIA_SSRC) {
        println!(
            "Media SSRC: packets={} bytes={} jitter={}",
            counters.packets,
            counters.bytes,
            statistics
                .statistician(MEDIA_SSRC)
                .map_or(0, |s| s.jitter()),
        );
    }
    let stats = router.get_stats();
    println!(
        "Call: send_bw={} recv_bw={} rtt={:?}",
        stats.send_bandwidth_bps, stats.recv_bandwidth_bps, stats.rtt_ms
    );

    Ok(())
}
