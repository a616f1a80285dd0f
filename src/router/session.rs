//! Session router
//!
//! Owns the send and receive stream registries and routes every inbound
//! packet of a session:
//!
//! ```text
//!                    ┌─ RTCP ─► every matching receive + send stream
//! deliver_packet ────┤
//!                    └─ RTP ──► receive registry[SSRC] ─► stream
//! ```
//!
//! Lock order is network state, then a registry write lock. Delivery only
//! takes a registry read lock long enough to clone the stream handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::config::{BitrateConfig, RouterConfig, RtcpFanout, StreamConfig};
use super::congestion::{CongestionController, SentPacket};
use super::registry::StreamRegistry;
use super::stream::{Direction, MediaStream, RtpState, StreamHandle, StreamId};
use super::sync::{self, SyncGroupState};
use crate::error::{RegistryError, Result};
use crate::protocol::constants::RTP_HEADER_MIN_LEN;
use crate::protocol::{is_rtcp, read_ssrc};
use crate::stats::CallStats;
use crate::types::{MediaType, NetworkState, PacketTime};

/// Result of delivering one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// A stream accepted the packet
    Ok,
    /// No receive stream claims the SSRC
    UnknownSsrc,
    /// Malformed, or rejected by every stream it reached
    PacketError,
}

/// Session-level routing table
pub struct SessionRouter {
    rtcp_fanout: RtcpFanout,
    network_state: Mutex<NetworkState>,
    receive: RwLock<StreamRegistry>,
    send: RwLock<StreamRegistry>,
    bitrate: Mutex<BitrateConfig>,
    congestion: Arc<dyn CongestionController>,
    suspended_rtp_states: Mutex<HashMap<u32, RtpState>>,
    next_stream_id: AtomicU64,
}

impl SessionRouter {
    /// Create a router and hand the initial bitrates to `congestion`
    pub fn new(config: RouterConfig, congestion: Arc<dyn CongestionController>) -> Result<Self> {
        let bitrate = config.bitrate;
        bitrate.validate()?;

        congestion.set_bwe_bitrates(
            bitrate.min_bitrate_bps,
            bitrate.start_bitrate_bps,
            bitrate.max_bitrate_bps,
        );

        Ok(Self {
            rtcp_fanout: config.rtcp_fanout,
            network_state: Mutex::new(NetworkState::Up),
            receive: RwLock::new(StreamRegistry::new()),
            send: RwLock::new(StreamRegistry::new()),
            bitrate: Mutex::new(bitrate),
            congestion,
            suspended_rtp_states: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(1),
        })
    }

    fn registry(&self, direction: Direction) -> &RwLock<StreamRegistry> {
        match direction {
            Direction::Send => &self.send,
            Direction::Receive => &self.receive,
        }
    }

    /// Register a stream under its primary SSRC and RTX alias
    ///
    /// Fails with [`RegistryError::DuplicateSsrc`] if either SSRC is already
    /// claimed in `direction`; nothing is registered in that case.
    pub fn create_stream(
        &self,
        direction: Direction,
        config: StreamConfig,
        stream: Arc<dyn MediaStream>,
    ) -> Result<StreamHandle> {
        let id = StreamId(self.next_stream_id.fetch_add(1, Ordering::Relaxed));
        let sync_group = config.sync_group.clone();
        let (ssrc, rtx_ssrc, kind) = (config.ssrc, config.rtx_ssrc, config.kind);

        {
            let network = self.network_state.lock();
            let mut registry = self.registry(direction).write();

            if let Err(e) = registry.insert(id, config, Arc::clone(&stream)) {
                tracing::error!(direction = %direction, ssrc = ssrc, error = %e, "Failed to create stream");
                return Err(e.into());
            }
            if *network == NetworkState::Down {
                stream.signal_network_state(NetworkState::Down);
            }
        }

        tracing::info!(
            stream_id = %id,
            direction = %direction,
            kind = %kind,
            ssrc = ssrc,
            rtx_ssrc = ?rtx_ssrc,
            "Stream created"
        );

        if direction == Direction::Receive {
            if let Some(group) = sync_group {
                self.configure_sync(&group);
            }
        }

        Ok(StreamHandle { id, direction })
    }

    /// Stop a stream and remove every registry entry mapping to it
    pub fn destroy_stream(&self, handle: StreamHandle) -> Result<()> {
        let unknown = || {
            tracing::error!(stream_id = %handle.id, direction = %handle.direction, "Destroying unknown stream");
            RegistryError::UnknownStream(handle.id)
        };

        let stream = self
            .registry(handle.direction)
            .read()
            .get(handle.id)
            .map(|r| Arc::clone(&r.stream))
            .ok_or_else(unknown)?;

        // Later inserts fail before the SSRCs disappear from the registry
        stream.stop();

        let registration = self
            .registry(handle.direction)
            .write()
            .remove(handle.id)
            .ok_or_else(unknown)?;

        tracing::info!(
            stream_id = %handle.id,
            direction = %handle.direction,
            ssrc = registration.config.ssrc,
            "Stream destroyed"
        );

        match handle.direction {
            Direction::Send => {
                let states = registration.stream.rtp_states();
                if !states.is_empty() {
                    let mut suspended = self.suspended_rtp_states.lock();
                    for state in states {
                        suspended.insert(state.ssrc, state);
                    }
                }
            }
            Direction::Receive => {
                if let Some(group) = &registration.config.sync_group {
                    self.configure_sync(group);
                }
            }
        }

        Ok(())
    }

    /// Route one inbound packet
    pub fn deliver_packet(
        &self,
        media_type: MediaType,
        packet: &[u8],
        packet_time: PacketTime,
    ) -> DeliveryStatus {
        if is_rtcp(packet) {
            self.deliver_rtcp(media_type, packet)
        } else {
            self.deliver_rtp(media_type, packet, packet_time)
        }
    }

    fn deliver_rtcp(&self, media_type: MediaType, packet: &[u8]) -> DeliveryStatus {
        let receivers = self.receive.read().streams_matching(media_type);
        let senders = match self.rtcp_fanout {
            RtcpFanout::All => self.send.read().streams_matching(media_type),
            RtcpFanout::ReceiveOnly => Vec::new(),
        };

        let accepted = receivers
            .iter()
            .chain(senders.iter())
            .filter(|stream| stream.deliver_rtcp(packet).is_ok())
            .count();

        tracing::debug!(
            receive_streams = receivers.len(),
            send_streams = senders.len(),
            accepted = accepted,
            "RTCP delivered"
        );

        if accepted > 0 {
            DeliveryStatus::Ok
        } else {
            DeliveryStatus::PacketError
        }
    }

    fn deliver_rtp(&self, media_type: MediaType, packet: &[u8], packet_time: PacketTime) -> DeliveryStatus {
        if packet.len() < RTP_HEADER_MIN_LEN {
            return DeliveryStatus::PacketError;
        }
        let Some(ssrc) = read_ssrc(packet) else {
            return DeliveryStatus::PacketError;
        };

        let target = self.receive.read().lookup(ssrc);
        let stream = match target {
            Some((stream, kind)) if media_type.matches(kind) => stream,
            _ => {
                tracing::debug!(ssrc = ssrc, media_type = ?media_type, "Unknown SSRC");
                return DeliveryStatus::UnknownSsrc;
            }
        };

        match stream.deliver_rtp(packet, packet_time) {
            Ok(()) => DeliveryStatus::Ok,
            Err(e) => {
                tracing::trace!(ssrc = ssrc, error = %e, "Stream rejected RTP packet");
                DeliveryStatus::PacketError
            }
        }
    }

    /// Broadcast a network state change
    ///
    /// The network lock is held for the whole broadcast so a concurrently
    /// created stream observes either the old state followed by this
    /// broadcast or the new state at creation.
    pub fn set_network_state(&self, state: NetworkState) {
        let mut network = self.network_state.lock();
        *network = state;

        tracing::info!(state = ?state, "Network state changed");

        self.congestion.signal_network_state(state);

        let senders = self.send.read().streams();
        for stream in &senders {
            stream.signal_network_state(state);
        }
        let receivers = self.receive.read().streams();
        for stream in &receivers {
            stream.signal_network_state(state);
        }
    }

    pub fn network_state(&self) -> NetworkState {
        *self.network_state.lock()
    }

    /// Update bitrate limits; returns whether anything changed
    ///
    /// An unset start keeps the current one. The merged limits must still
    /// satisfy `min <= start <= max`, and are what the congestion controller
    /// receives.
    pub fn set_bitrate_config(&self, config: BitrateConfig) -> Result<bool> {
        let mut current = self.bitrate.lock();
        let merged = BitrateConfig {
            start_bitrate_bps: config.start_bitrate_bps.or(current.start_bitrate_bps),
            ..config
        };
        if let Err(e) = merged.validate() {
            tracing::error!(error = %e, "Rejected bitrate config");
            return Err(e.into());
        }

        if *current == merged {
            return Ok(false);
        }
        *current = merged;

        tracing::info!(
            min_bps = merged.min_bitrate_bps,
            start_bps = ?merged.start_bitrate_bps,
            max_bps = ?merged.max_bitrate_bps,
            "Bitrate config updated"
        );
        self.congestion.set_bwe_bitrates(
            merged.min_bitrate_bps,
            merged.start_bitrate_bps,
            merged.max_bitrate_bps,
        );
        Ok(true)
    }

    /// Effective bitrate limits
    pub fn bitrate_config(&self) -> BitrateConfig {
        *self.bitrate.lock()
    }

    /// Pair the audio and video receive streams of `group`
    pub fn configure_sync(&self, group: &str) -> SyncGroupState {
        let (state, assignments) = sync::resolve(&mut self.receive.write(), group);

        for assignment in assignments {
            assignment.stream.set_sync_peer(assignment.audio);
        }

        tracing::debug!(
            sync_group = group,
            audio = ?state.audio,
            video = ?state.video,
            ambiguous = state.ambiguous,
            "Sync group configured"
        );
        state
    }

    /// Bandwidth and worst send-stream RTT
    pub fn get_stats(&self) -> CallStats {
        let senders = self.send.read().streams();
        let rtt_ms = senders
            .iter()
            .filter_map(|stream| stream.rtt_ms())
            .filter(|rtt| *rtt > 0)
            .max();

        CallStats {
            send_bandwidth_bps: self.congestion.available_send_bandwidth_bps(),
            recv_bandwidth_bps: self.congestion.receive_bandwidth_bps(),
            pacer_delay_ms: self.congestion.pacer_queuing_delay_ms(),
            rtt_ms,
        }
    }

    pub fn on_sent_packet(&self, packet: SentPacket) {
        self.congestion.on_sent_packet(packet);
    }

    /// RTP state left behind by a destroyed send stream using `ssrc`
    pub fn suspended_rtp_state(&self, ssrc: u32) -> Option<RtpState> {
        self.suspended_rtp_states.lock().get(&ssrc).copied()
    }

    /// Stream registered under `handle`
    pub fn stream(&self, handle: StreamHandle) -> Option<Arc<dyn MediaStream>> {
        self.registry(handle.direction)
            .read()
            .get(handle.id)
            .map(|r| Arc::clone(&r.stream))
    }

    /// Stream owning `ssrc` in `direction`
    pub fn stream_for_ssrc(&self, direction: Direction, ssrc: u32) -> Option<StreamId> {
        self.registry(direction).read().owner_of(ssrc)
    }

    pub fn stream_count(&self, direction: Direction) -> usize {
        self.registry(direction).read().len()
    }
}
