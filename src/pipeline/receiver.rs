//! Per-stream receive engine
//!
//! ```text
//!  insert(raw) ──► parse ──► BWE ──► classify ──┬─ Plain ─► decode buffer
//!                                    ▲          ├─ Red ───► FEC recoverer ─┐
//!                                    │          └─ Rtx ───► restore ───────┤
//!                                    └──────────── worklist ◄──────────────┘
//! ```
//!
//! Packets unwrapped from RED, rebuilt by FEC or restored from RTX go back
//! through classification as "recovered" items. Recovered items skip
//! bandwidth estimation, statistics and retransmission classification; only
//! the wire packet is accounted, after its whole worklist has drained.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::collaborators::{Collaborators, MediaPacket, RtcpModule};
use super::config::PipelineConfig;
use super::state::{ReceiveState, RestorationGuard};
use crate::error::PacketError;
use crate::fec::FecPacketCounter;
use crate::payload::EncapsulationKind;
use crate::protocol::constants::DEFAULT_MAX_REORDERING_THRESHOLD;
use crate::protocol::{read_ssrc, ExtensionType, PacketHeader};
use crate::router::{MediaStream, StreamId};
use crate::types::{MediaKind, NetworkState, PacketTime};

/// FEC ratios reported when a pipeline goes away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FecSummary {
    /// ULPFEC packets as a percentage of RED packets
    pub received_fec_percent: Option<u64>,
    /// Recovered media packets as a percentage of ULPFEC packets
    pub recovered_percent_of_fec: Option<u64>,
}

impl From<FecPacketCounter> for FecSummary {
    fn from(counter: FecPacketCounter) -> Self {
        Self {
            received_fec_percent: (counter.num_packets > 0)
                .then(|| counter.num_fec_packets * 100 / counter.num_packets),
            recovered_percent_of_fec: (counter.num_fec_packets > 0)
                .then(|| counter.num_recovered_packets * 100 / counter.num_fec_packets),
        }
    }
}

/// A packet waiting in the worklist
struct WorkItem<'a> {
    packet: Bytes,
    /// Header and in-order flag, already known for the wire packet
    parsed: Option<(PacketHeader, bool)>,
    /// Held while a restored RTX packet is processed
    restoration: Option<RestorationGuard<'a>>,
}

impl WorkItem<'_> {
    fn recovered(packet: Bytes) -> Self {
        Self {
            packet,
            parsed: None,
            restoration: None,
        }
    }
}

/// Receive pipeline for one remote media stream
pub struct ReceivePipeline {
    config: PipelineConfig,
    deps: Collaborators,
    simulcast_rtcp: RwLock<Vec<Arc<dyn RtcpModule>>>,
    state: Mutex<ReceiveState>,
}

impl ReceivePipeline {
    /// Create a stopped pipeline
    pub fn new(config: PipelineConfig, deps: Collaborators) -> Self {
        tracing::debug!(
            ssrc = config.remote_ssrc,
            kind = %config.kind,
            "Receive pipeline created"
        );

        Self {
            config,
            deps,
            simulcast_rtcp: RwLock::new(Vec::new()),
            state: Mutex::new(ReceiveState::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn start_receive(&self) {
        self.state.lock().receiving = true;
    }

    pub fn stop_receive(&self) {
        self.state.lock().receiving = false;
    }

    pub fn is_receiving(&self) -> bool {
        self.state.lock().receiving
    }

    /// Process one RTP packet from the wire
    pub fn insert(&self, raw: &[u8], packet_time: PacketTime) -> Result<(), PacketError> {
        if !self.state.lock().receiving {
            return Err(PacketError::NotReceiving);
        }

        let mut header = match self.deps.parser.parse(raw) {
            Ok(header) => header,
            Err(e) => {
                tracing::info!(
                    ssrc = ?read_ssrc(raw),
                    length = raw.len(),
                    error = %e,
                    "Incoming packet: invalid RTP header"
                );
                return Err(e.into());
            }
        };
        header.payload_type_frequency = self.config.payload_frequency;

        let payload_length = raw.len() - header.header_length;
        let now_ms = self.deps.clock.now_ms();
        let arrival_time_ms = packet_time.as_ms().unwrap_or(now_ms);
        self.log_packet_periodically(&header, now_ms);

        self.deps
            .bandwidth
            .incoming_packet(arrival_time_ms, payload_length, &header);

        let in_order = self
            .deps
            .statistics
            .is_packet_in_order(header.ssrc, header.sequence_number);
        self.deps.registry.set_incoming_payload_type(&header);

        let result = self.process(WorkItem {
            packet: Bytes::copy_from_slice(raw),
            parsed: Some((header.clone(), in_order)),
            restoration: None,
        });

        // Accounted after dispatch so the first packet of a stream is included
        let retransmitted = self.is_packet_retransmitted(&header, in_order);
        self.deps
            .statistics
            .incoming_packet(&header, raw.len(), retransmitted);

        result
    }

    /// Process one RTCP packet
    pub fn insert_rtcp(&self, raw: &[u8]) -> Result<(), PacketError> {
        if !self.state.lock().receiving {
            return Err(PacketError::NotReceiving);
        }

        let simulcast = self.simulcast_rtcp.read().clone();
        for module in &simulcast {
            if let Err(e) = module.incoming_rtcp_packet(raw) {
                tracing::debug!(
                    ssrc = self.config.remote_ssrc,
                    error = %e,
                    "Simulcast RTCP module rejected packet"
                );
            }
        }

        self.deps.rtcp.incoming_rtcp_packet(raw)?;

        let rtt_ms = match self.deps.rtcp.rtt(self.config.remote_ssrc) {
            Some(rtt) if rtt.last_ms > 0 => rtt.last_ms,
            // Waiting for a valid RTT
            _ => return Ok(()),
        };
        let Some(ntp) = self.deps.rtcp.remote_ntp() else {
            // Waiting for a sender report
            return Ok(());
        };

        self.deps
            .ntp
            .update_rtcp_timestamp(rtt_ms, ntp.ntp_secs, ntp.ntp_frac, ntp.rtp_timestamp);
        Ok(())
    }

    /// Drain the worklist seeded with `first`; returns the first error seen
    fn process<'a>(&'a self, first: WorkItem<'a>) -> Result<(), PacketError> {
        let mut worklist = VecDeque::from([first]);
        let mut result = Ok(());

        while let Some(item) = worklist.pop_front() {
            if let Err(e) = self.dispatch(item, &mut worklist) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }

    fn dispatch<'a>(
        &'a self,
        item: WorkItem<'a>,
        worklist: &mut VecDeque<WorkItem<'a>>,
    ) -> Result<(), PacketError> {
        let WorkItem {
            packet,
            parsed,
            restoration: _restoration,
        } = item;

        let (header, in_order) = match parsed {
            Some(parsed) => parsed,
            None => {
                let mut header = self.deps.parser.parse(&packet)?;
                header.payload_type_frequency = self.config.payload_frequency;
                let in_order = self
                    .deps
                    .statistics
                    .is_packet_in_order(header.ssrc, header.sequence_number);
                (header, in_order)
            }
        };

        match self.deps.registry.classify(&header) {
            EncapsulationKind::Plain => self.forward_media(&packet, header, in_order),
            EncapsulationKind::Red { fec_payload_type } => {
                self.handle_red(&packet, &header, fec_payload_type, in_order, worklist)
            }
            EncapsulationKind::Rtx {
                associated_payload_type,
            } => self.handle_rtx(&packet, &header, associated_payload_type, worklist),
        }
    }

    fn forward_media(
        &self,
        packet: &Bytes,
        header: PacketHeader,
        in_order: bool,
    ) -> Result<(), PacketError> {
        let specifics = self
            .deps
            .registry
            .payload_specifics(header.payload_type)
            .ok_or(PacketError::UnknownPayloadType(header.payload_type))?;
        self.deps
            .registry
            .set_last_media_payload_type(header.payload_type);

        self.state.lock().last_csrcs.clone_from(&header.csrcs);

        let payload = packet.slice(header.header_length..packet.len() - header.padding_length);
        let media = MediaPacket {
            ntp_time_ms: self.deps.ntp.estimate(header.timestamp),
            rotation: header.extensions.video_rotation.unwrap_or_default(),
            header,
            payload,
            specifics,
            in_order,
        };

        self.deps.decode_buffer.insert_packet(media).map_err(|e| {
            tracing::debug!(ssrc = self.config.remote_ssrc, error = %e, "Decode buffer rejected packet");
            PacketError::DeliveryFailed
        })
    }

    fn handle_red<'a>(
        &self,
        packet: &Bytes,
        header: &PacketHeader,
        fec_payload_type: Option<u8>,
        in_order: bool,
        worklist: &mut VecDeque<WorkItem<'a>>,
    ) -> Result<(), PacketError> {
        if fec_payload_type.is_some() && packet.get(header.header_length).copied() == fec_payload_type {
            self.deps
                .statistics
                .fec_packet_received(header, packet.len());
            self.notify_fec_packet(header, in_order);
        }

        self.deps
            .fec
            .add_received_red_packet(header, packet, fec_payload_type)
            .map_err(|e| {
                tracing::debug!(ssrc = header.ssrc, error = %e, "FEC recoverer rejected RED packet");
                PacketError::FecRejected
            })?;

        for recovered in self.deps.fec.process_received_fec() {
            worklist.push_back(WorkItem::recovered(recovered));
        }
        Ok(())
    }

    /// Tell the decoder a FEC packet arrived so it does not NACK for it
    fn notify_fec_packet(&self, header: &PacketHeader, in_order: bool) {
        let Some(payload_type) = self.deps.registry.last_media_payload_type() else {
            tracing::warn!(ssrc = header.ssrc, "Failed to get last media payload type");
            return;
        };
        let Some(specifics) = self.deps.registry.payload_specifics(payload_type) else {
            tracing::warn!(
                ssrc = header.ssrc,
                payload_type = payload_type,
                "Failed to get payload specifics"
            );
            return;
        };

        let mut placeholder = header.clone();
        placeholder.payload_type = payload_type;
        placeholder.padding_length = 0;

        let media = MediaPacket {
            ntp_time_ms: self.deps.ntp.estimate(header.timestamp),
            rotation: header.extensions.video_rotation.unwrap_or_default(),
            header: placeholder,
            payload: Bytes::new(),
            specifics,
            in_order,
        };

        if let Err(e) = self.deps.decode_buffer.insert_packet(media) {
            tracing::debug!(ssrc = header.ssrc, error = %e, "Decode buffer rejected FEC placeholder");
        }
    }

    fn handle_rtx<'a>(
        &'a self,
        packet: &Bytes,
        header: &PacketHeader,
        associated_payload_type: Option<u8>,
        worklist: &mut VecDeque<WorkItem<'a>>,
    ) -> Result<(), PacketError> {
        let length = packet.len();

        if header.header_length + header.padding_length == length {
            // Keep-alive padding, nothing to restore
            tracing::trace!(ssrc = header.ssrc, "Dropping empty RTX packet");
            return Ok(());
        }
        // RtpHeaderParser already rejects this; other HeaderParser impls may not
        if length < header.header_length {
            return Err(PacketError::InvalidRtxHeader);
        }

        let capacity = self.config.restoration_capacity;
        if length > capacity {
            return Err(PacketError::ReconstructionOverflow { length, capacity });
        }

        let Some(associated_payload_type) = associated_payload_type else {
            tracing::warn!(ssrc = header.ssrc, "Incoming RTX packet: no associated payload type");
            return Err(PacketError::InvalidRtxHeader);
        };

        let Some(guard) = RestorationGuard::claim(&self.state) else {
            tracing::warn!(ssrc = header.ssrc, "Multiple RTX headers detected, dropping packet");
            return Err(PacketError::MultipleConcurrentRtx);
        };

        let restored = self
            .deps
            .registry
            .restore_rtx_packet(
                packet,
                header,
                self.config.remote_ssrc,
                associated_payload_type,
                capacity,
            )
            .map_err(|e| {
                tracing::warn!(ssrc = header.ssrc, error = %e, "Incoming RTX packet: invalid RTP header");
                PacketError::InvalidRtxHeader
            })?;

        worklist.push_back(WorkItem {
            packet: restored.freeze(),
            parsed: None,
            restoration: Some(guard),
        });
        Ok(())
    }

    fn is_packet_retransmitted(&self, header: &PacketHeader, in_order: bool) -> bool {
        // Retransmissions arrive on the RTX SSRC instead
        if self.deps.registry.rtx_enabled() {
            return false;
        }
        let min_rtt_ms = self
            .deps
            .rtcp
            .rtt(self.config.remote_ssrc)
            .map_or(0, |rtt| rtt.min_ms);

        !in_order
            && self
                .deps
                .statistics
                .is_retransmit_of_old_packet(header, min_rtt_ms)
    }

    fn log_packet_periodically(&self, header: &PacketHeader, now_ms: i64) {
        let interval_ms = self.config.packet_log_interval.as_millis() as i64;
        if !self.state.lock().should_log_packet(now_ms, interval_ms) {
            return;
        }

        tracing::info!(
            ssrc = header.ssrc,
            payload_type = header.payload_type,
            sequence_number = header.sequence_number,
            timestamp = header.timestamp,
            header_length = header.header_length,
            padding_length = header.padding_length,
            transmission_time_offset = ?header.extensions.transmission_time_offset,
            absolute_send_time = ?header.extensions.absolute_send_time,
            "Packet received"
        );
    }

    /// Enable or disable NACK; disabling restores the default reordering window
    pub fn set_nack_status(&self, enable: bool, max_reordering_threshold: u16) {
        let threshold = if enable {
            max_reordering_threshold
        } else {
            DEFAULT_MAX_REORDERING_THRESHOLD
        };
        self.state.lock().nack_enabled = enable;
        self.deps.statistics.set_max_reordering_threshold(threshold);
    }

    pub fn nack_enabled(&self) -> bool {
        self.state.lock().nack_enabled
    }

    pub fn set_receive_timestamp_offset_status(&self, enable: bool, id: u8) -> bool {
        if enable {
            self.deps
                .parser
                .register_extension(ExtensionType::TransmissionTimeOffset, id)
        } else {
            self.deps
                .parser
                .deregister_extension(ExtensionType::TransmissionTimeOffset)
        }
    }

    pub fn set_receive_absolute_send_time_status(&self, enable: bool, id: u8) -> bool {
        self.toggle_extension(ExtensionType::AbsoluteSendTime, enable, id, |state, on| {
            state.receiving_ast_enabled = on
        })
    }

    pub fn set_receive_video_rotation_status(&self, enable: bool, id: u8) -> bool {
        self.toggle_extension(ExtensionType::VideoRotation, enable, id, |state, on| {
            state.receiving_cvo_enabled = on
        })
    }

    pub fn set_receive_transport_sequence_number(&self, enable: bool, id: u8) -> bool {
        self.toggle_extension(
            ExtensionType::TransportSequenceNumber,
            enable,
            id,
            |state, on| state.receiving_tsn_enabled = on,
        )
    }

    /// Register or deregister `kind`, recording the flag only on success
    fn toggle_extension(
        &self,
        kind: ExtensionType,
        enable: bool,
        id: u8,
        set_flag: impl Fn(&mut ReceiveState, bool),
    ) -> bool {
        if enable {
            if !self.deps.parser.register_extension(kind, id) {
                return false;
            }
            set_flag(&mut *self.state.lock(), true);
            true
        } else {
            set_flag(&mut *self.state.lock(), false);
            self.deps.parser.deregister_extension(kind)
        }
    }

    pub fn receiving_absolute_send_time_enabled(&self) -> bool {
        self.state.lock().receiving_ast_enabled
    }

    pub fn receiving_video_rotation_enabled(&self) -> bool {
        self.state.lock().receiving_cvo_enabled
    }

    pub fn receiving_transport_sequence_number_enabled(&self) -> bool {
        self.state.lock().receiving_tsn_enabled
    }

    /// Install simulcast RTCP modules; the first entry is the primary module
    /// and is skipped
    pub fn register_rtcp_modules(&self, modules: &[Arc<dyn RtcpModule>]) {
        let mut simulcast = self.simulcast_rtcp.write();
        simulcast.clear();
        simulcast.extend(modules.iter().skip(1).cloned());
    }

    pub fn is_fec_enabled(&self) -> bool {
        self.deps.registry.ulpfec_payload_type().is_some()
    }

    pub fn remote_ssrc(&self) -> u32 {
        self.config.remote_ssrc
    }

    /// CSRCs of the last media packet forwarded
    pub fn csrcs(&self) -> Vec<u32> {
        self.state.lock().last_csrcs.clone()
    }

    pub fn network_state(&self) -> NetworkState {
        self.state.lock().network_state
    }

    pub fn sync_peer(&self) -> Option<StreamId> {
        self.state.lock().sync_peer
    }

    pub fn fec_packet_counter(&self) -> FecPacketCounter {
        self.deps.fec.packet_counter()
    }

    pub fn fec_summary(&self) -> FecSummary {
        self.fec_packet_counter().into()
    }
}

impl Drop for ReceivePipeline {
    fn drop(&mut self) {
        let summary = self.fec_summary();
        if let Some(percent) = summary.received_fec_percent {
            tracing::info!(
                ssrc = self.config.remote_ssrc,
                percent = percent,
                "Received FEC packets in percent"
            );
        }
        if let Some(percent) = summary.recovered_percent_of_fec {
            tracing::info!(
                ssrc = self.config.remote_ssrc,
                percent = percent,
                "Recovered media packets in percent of FEC"
            );
        }
    }
}

impl MediaStream for ReceivePipeline {
    fn kind(&self) -> MediaKind {
        self.config.kind
    }

    fn deliver_rtp(&self, packet: &[u8], packet_time: PacketTime) -> Result<(), PacketError> {
        self.insert(packet, packet_time)
    }

    fn deliver_rtcp(&self, packet: &[u8]) -> Result<(), PacketError> {
        self.insert_rtcp(packet)
    }

    fn signal_network_state(&self, state: NetworkState) {
        tracing::debug!(ssrc = self.config.remote_ssrc, state = ?state, "Network state changed");
        self.state.lock().network_state = state;
    }

    fn stop(&self) {
        self.stop_receive();
    }

    fn set_sync_peer(&self, audio: Option<StreamId>) {
        self.state.lock().sync_peer = audio;
    }
}
