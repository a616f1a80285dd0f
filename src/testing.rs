//! Test doubles shared by unit tests

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::SimulatedClock;
use crate::error::PacketError;
use crate::fec::UlpfecReceiver;
use crate::ntp::RemoteNtpEstimator;
use crate::payload::{PayloadSpecifics, PayloadTypeRegistry};
use crate::pipeline::{
    BandwidthEstimator, Collaborators, DecodeBuffer, MediaPacket, PipelineConfig, ReceivePipeline,
    RemoteNtp, RtcpModule, RttStats, SinkError,
};
use crate::protocol::{PacketHeader, RtpHeaderParser};
use crate::router::{CongestionController, MediaStream, RtpState, SentPacket, StreamId};
use crate::stats::ReceiveStatistics;
use crate::types::{MediaKind, NetworkState, PacketTime};

pub const MEDIA_PT: u8 = 96;
pub const RED_PT: u8 = 116;
pub const FEC_PT: u8 = 117;

/// Stream recording everything the router hands it
pub struct MockStream {
    kind: MediaKind,
    accept: bool,
    stopped: AtomicBool,
    delivery_delay: Mutex<Option<Duration>>,
    rtp: Mutex<Vec<Vec<u8>>>,
    rtcp: Mutex<Vec<Vec<u8>>>,
    network_states: Mutex<Vec<NetworkState>>,
    sync_peer: Mutex<Option<Option<StreamId>>>,
    rtt_ms: Option<i64>,
    rtp_states: Vec<RtpState>,
}

impl MockStream {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            accept: true,
            stopped: AtomicBool::new(false),
            delivery_delay: Mutex::new(None),
            rtp: Mutex::new(Vec::new()),
            rtcp: Mutex::new(Vec::new()),
            network_states: Mutex::new(Vec::new()),
            sync_peer: Mutex::new(None),
            rtt_ms: None,
            rtp_states: Vec::new(),
        }
    }

    /// Stream refusing every packet
    pub fn rejecting(kind: MediaKind) -> Self {
        Self {
            accept: false,
            ..Self::new(kind)
        }
    }

    pub fn with_rtt(mut self, rtt_ms: Option<i64>) -> Self {
        self.rtt_ms = rtt_ms;
        self
    }

    pub fn with_rtp_states(mut self, states: Vec<RtpState>) -> Self {
        self.rtp_states = states;
        self
    }

    pub fn set_delivery_delay(&self, delay: Duration) {
        *self.delivery_delay.lock() = Some(delay);
    }

    pub fn rtp_count(&self) -> usize {
        self.rtp.lock().len()
    }

    pub fn rtcp_count(&self) -> usize {
        self.rtcp.lock().len()
    }

    pub fn network_states(&self) -> Vec<NetworkState> {
        self.network_states.lock().clone()
    }

    /// `None` until the router assigns a peer
    pub fn sync_peer(&self) -> Option<Option<StreamId>> {
        *self.sync_peer.lock()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl MediaStream for MockStream {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn deliver_rtp(&self, packet: &[u8], _packet_time: PacketTime) -> Result<(), PacketError> {
        if self.is_stopped() {
            return Err(PacketError::NotReceiving);
        }
        let delay = *self.delivery_delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if !self.accept {
            return Err(PacketError::DeliveryFailed);
        }
        self.rtp.lock().push(packet.to_vec());
        Ok(())
    }

    fn deliver_rtcp(&self, packet: &[u8]) -> Result<(), PacketError> {
        if !self.accept {
            return Err(PacketError::Rtcp("rejected".into()));
        }
        self.rtcp.lock().push(packet.to_vec());
        Ok(())
    }

    fn signal_network_state(&self, state: NetworkState) {
        self.network_states.lock().push(state);
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn set_sync_peer(&self, audio: Option<StreamId>) {
        *self.sync_peer.lock() = Some(audio);
    }

    fn rtt_ms(&self) -> Option<i64> {
        self.rtt_ms
    }

    fn rtp_states(&self) -> Vec<RtpState> {
        self.rtp_states.clone()
    }
}

/// Congestion controller recording its inputs
pub struct MockCongestionController {
    bitrates: Mutex<Vec<(u32, Option<u32>, Option<u32>)>>,
    network_states: Mutex<Vec<NetworkState>>,
    sent_packets: Mutex<Vec<SentPacket>>,
}

impl MockCongestionController {
    pub fn new() -> Self {
        Self {
            bitrates: Mutex::new(Vec::new()),
            network_states: Mutex::new(Vec::new()),
            sent_packets: Mutex::new(Vec::new()),
        }
    }

    pub fn bitrates(&self) -> Vec<(u32, Option<u32>, Option<u32>)> {
        self.bitrates.lock().clone()
    }

    pub fn network_states(&self) -> Vec<NetworkState> {
        self.network_states.lock().clone()
    }

    pub fn sent_packets(&self) -> Vec<SentPacket> {
        self.sent_packets.lock().clone()
    }
}

impl CongestionController for MockCongestionController {
    fn set_bwe_bitrates(&self, min_bps: u32, start_bps: Option<u32>, max_bps: Option<u32>) {
        self.bitrates.lock().push((min_bps, start_bps, max_bps));
    }

    fn signal_network_state(&self, state: NetworkState) {
        self.network_states.lock().push(state);
    }

    fn on_sent_packet(&self, packet: SentPacket) {
        self.sent_packets.lock().push(packet);
    }

    fn available_send_bandwidth_bps(&self) -> u32 {
        1_000_000
    }

    fn receive_bandwidth_bps(&self) -> u32 {
        800_000
    }

    fn pacer_queuing_delay_ms(&self) -> i64 {
        15
    }
}

/// Records (arrival time, payload size, SSRC) of every estimator call
#[derive(Default)]
pub struct MockBandwidthEstimator {
    calls: Mutex<Vec<(i64, usize, u32)>>,
}

impl MockBandwidthEstimator {
    pub fn calls(&self) -> Vec<(i64, usize, u32)> {
        self.calls.lock().clone()
    }
}

impl BandwidthEstimator for MockBandwidthEstimator {
    fn incoming_packet(&self, arrival_time_ms: i64, payload_size: usize, header: &PacketHeader) {
        self.calls
            .lock()
            .push((arrival_time_ms, payload_size, header.ssrc));
    }
}

/// Decode buffer keeping every packet it accepts
#[derive(Default)]
pub struct RecordingDecodeBuffer {
    packets: Mutex<Vec<MediaPacket>>,
    reject: AtomicBool,
}

impl RecordingDecodeBuffer {
    pub fn packets(&self) -> Vec<MediaPacket> {
        self.packets.lock().clone()
    }

    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

impl DecodeBuffer for RecordingDecodeBuffer {
    fn insert_packet(&self, packet: MediaPacket) -> Result<(), SinkError> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(SinkError("full".into()));
        }
        self.packets.lock().push(packet);
        Ok(())
    }
}

/// RTCP module with scripted RTT and sender report
#[derive(Default)]
pub struct MockRtcpModule {
    reject: bool,
    received: Mutex<Vec<Vec<u8>>>,
    rtt: Mutex<Option<RttStats>>,
    remote_ntp: Mutex<Option<RemoteNtp>>,
}

impl MockRtcpModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn set_rtt(&self, rtt: RttStats) {
        *self.rtt.lock() = Some(rtt);
    }

    pub fn set_remote_ntp(&self, ntp: RemoteNtp) {
        *self.remote_ntp.lock() = Some(ntp);
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().len()
    }
}

impl RtcpModule for MockRtcpModule {
    fn incoming_rtcp_packet(&self, packet: &[u8]) -> Result<(), PacketError> {
        self.received.lock().push(packet.to_vec());
        if self.reject {
            return Err(PacketError::Rtcp("malformed compound packet".into()));
        }
        Ok(())
    }

    fn rtt(&self, _remote_ssrc: u32) -> Option<RttStats> {
        *self.rtt.lock()
    }

    fn remote_ntp(&self) -> Option<RemoteNtp> {
        *self.remote_ntp.lock()
    }
}

/// Real collaborators wired around a simulated clock
pub struct PipelineHarness {
    pub clock: Arc<SimulatedClock>,
    pub parser: Arc<RtpHeaderParser>,
    pub registry: Arc<PayloadTypeRegistry>,
    pub statistics: Arc<ReceiveStatistics>,
    pub bandwidth: Arc<MockBandwidthEstimator>,
    pub decode_buffer: Arc<RecordingDecodeBuffer>,
    pub fec: Arc<UlpfecReceiver>,
    pub ntp: Arc<RemoteNtpEstimator>,
    pub rtcp: Arc<MockRtcpModule>,
}

impl PipelineHarness {
    /// VP8 on 96, RED on 116, ULPFEC on 117
    pub fn new() -> Self {
        let clock = Arc::new(SimulatedClock::new(10_000));
        let registry = Arc::new(PayloadTypeRegistry::new());
        registry.register_receive_payload(MEDIA_PT, PayloadSpecifics::video("VP8"));
        registry.register_receive_payload(RED_PT, PayloadSpecifics::video("red"));
        registry.register_receive_payload(FEC_PT, PayloadSpecifics::video("ulpfec"));

        Self {
            parser: Arc::new(RtpHeaderParser::new()),
            registry,
            statistics: Arc::new(ReceiveStatistics::new(clock.clone())),
            bandwidth: Arc::new(MockBandwidthEstimator::default()),
            decode_buffer: Arc::new(RecordingDecodeBuffer::default()),
            fec: Arc::new(UlpfecReceiver::new()),
            ntp: Arc::new(RemoteNtpEstimator::new(clock.clone())),
            rtcp: Arc::new(MockRtcpModule::new()),
            clock,
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            clock: self.clock.clone(),
            parser: self.parser.clone(),
            registry: self.registry.clone(),
            statistics: self.statistics.clone(),
            bandwidth: self.bandwidth.clone(),
            decode_buffer: self.decode_buffer.clone(),
            fec: self.fec.clone(),
            ntp: self.ntp.clone(),
            rtcp: self.rtcp.clone(),
        }
    }

    /// Started pipeline receiving `remote_ssrc`
    pub fn pipeline(&self, remote_ssrc: u32) -> ReceivePipeline {
        let pipeline = ReceivePipeline::new(
            PipelineConfig::with_remote_ssrc(remote_ssrc),
            self.collaborators(),
        );
        pipeline.start_receive();
        pipeline
    }
}
