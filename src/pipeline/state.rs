//! Receive pipeline state
//!
//! Everything here is mutated only under the pipeline's own mutex, and that
//! mutex is never held across a call into a collaborator.

use parking_lot::Mutex;

use crate::router::StreamId;
use crate::types::NetworkState;

/// Mutable per-pipeline state
#[derive(Debug)]
pub struct ReceiveState {
    /// Whether inserts are accepted
    pub receiving: bool,

    /// An RTX restoration is in flight
    pub restoration_buffer_in_use: bool,

    /// Local time of the last periodic header log
    pub last_packet_log_ms: Option<i64>,

    /// Last network state signalled by the router
    pub network_state: NetworkState,

    /// NACK enabled on this stream
    pub nack_enabled: bool,

    /// Video rotation extension enabled
    pub receiving_cvo_enabled: bool,

    /// Absolute send time extension enabled
    pub receiving_ast_enabled: bool,

    /// Transport sequence number extension enabled
    pub receiving_tsn_enabled: bool,

    /// CSRCs of the last forwarded media packet
    pub last_csrcs: Vec<u32>,

    /// Audio stream paired for playout sync
    pub sync_peer: Option<StreamId>,
}

impl ReceiveState {
    pub fn new() -> Self {
        Self {
            receiving: false,
            restoration_buffer_in_use: false,
            last_packet_log_ms: None,
            network_state: NetworkState::Up,
            nack_enabled: false,
            receiving_cvo_enabled: false,
            receiving_ast_enabled: false,
            receiving_tsn_enabled: false,
            last_csrcs: Vec::new(),
            sync_peer: None,
        }
    }

    /// Whether a header log is due at `now_ms`; records the log time if so
    pub fn should_log_packet(&mut self, now_ms: i64, interval_ms: i64) -> bool {
        let due = match self.last_packet_log_ms {
            Some(last) => now_ms - last > interval_ms,
            None => true,
        };
        if due {
            self.last_packet_log_ms = Some(now_ms);
        }
        due
    }

    /// Claim the restoration buffer; false if already claimed
    pub fn try_claim_restoration(&mut self) -> bool {
        if self.restoration_buffer_in_use {
            return false;
        }
        self.restoration_buffer_in_use = true;
        true
    }
}

impl Default for ReceiveState {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the restoration buffer when the restored packet is done
#[derive(Debug)]
pub struct RestorationGuard<'a> {
    state: &'a Mutex<ReceiveState>,
}

impl<'a> RestorationGuard<'a> {
    /// Claim the buffer, or `None` if a restoration is already in flight
    pub fn claim(state: &'a Mutex<ReceiveState>) -> Option<Self> {
        if state.lock().try_claim_restoration() {
            Some(Self { state })
        } else {
            None
        }
    }
}

impl Drop for RestorationGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().restoration_buffer_in_use = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state() {
        let state = ReceiveState::new();
        assert!(!state.receiving);
        assert!(!state.restoration_buffer_in_use);
        assert_eq!(state.network_state, NetworkState::Up);
        assert!(state.last_packet_log_ms.is_none());
    }

    #[test]
    fn test_packet_log_interval() {
        let mut state = ReceiveState::new();
        assert!(state.should_log_packet(1_000, 10_000));
        assert!(!state.should_log_packet(5_000, 10_000));
        assert!(!state.should_log_packet(11_000, 10_000));
        assert!(state.should_log_packet(11_001, 10_000));
    }

    #[test]
    fn test_restoration_guard_releases_on_drop() {
        let state = Mutex::new(ReceiveState::new());

        let guard = RestorationGuard::claim(&state).unwrap();
        assert!(state.lock().restoration_buffer_in_use);
        assert!(RestorationGuard::claim(&state).is_none());

        drop(guard);
        assert!(!state.lock().restoration_buffer_in_use);
        assert!(RestorationGuard::claim(&state).is_some());
    }
}
