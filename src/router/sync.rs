//! Audio/video sync group resolution
//!
//! A sync group pairs one audio receive stream with one video receive
//! stream for playout synchronization. Only the first pair in a group is
//! synchronized; extra streams are left unsynced and the group is flagged.

use std::sync::Arc;

use super::registry::StreamRegistry;
use super::stream::{MediaStream, StreamId};
use crate::types::MediaKind;

/// Outcome of configuring one sync group
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncGroupState {
    /// Audio stream the group synchronizes against
    pub audio: Option<StreamId>,
    /// Video stream paired with `audio`
    pub video: Option<StreamId>,
    /// Video streams in the group left without a sync peer
    pub unsynced_video: Vec<StreamId>,
    /// More than one audio or video stream competes in the group
    pub ambiguous: bool,
}

/// Sync peer to hand to a video stream once the registry lock is released
pub(crate) struct SyncAssignment {
    pub stream: Arc<dyn MediaStream>,
    pub audio: Option<StreamId>,
}

/// Pick the group's audio stream and pair it with the first video stream
///
/// The chosen audio stream is remembered in the registry so later calls
/// keep it while it stays registered.
pub(crate) fn resolve(registry: &mut StreamRegistry, group: &str) -> (SyncGroupState, Vec<SyncAssignment>) {
    let mut state = SyncGroupState::default();

    let audio = match registry.sync_audio(group) {
        Some(mapped) => Some(mapped),
        None => {
            let mut candidates = registry.in_sync_group(group, MediaKind::Audio).map(|(id, _)| id);
            let first = candidates.next();
            if candidates.next().is_some() {
                tracing::warn!(
                    sync_group = group,
                    "Attempting to sync more than one audio stream within the same sync group"
                );
                state.ambiguous = true;
            }
            first
        }
    };
    if let Some(audio) = audio {
        registry.set_sync_audio(group, audio);
    }
    state.audio = audio;

    let mut assignments = Vec::new();
    for (index, (id, registration)) in registry.in_sync_group(group, MediaKind::Video).enumerate() {
        if index == 1 {
            tracing::warn!(
                sync_group = group,
                "Attempting to sync more than one audio/video pair within the same sync group"
            );
            state.ambiguous = true;
        }

        let peer = if index == 0 { audio } else { None };
        match peer {
            Some(_) => state.video = Some(id),
            None => state.unsynced_video.push(id),
        }
        assignments.push(SyncAssignment {
            stream: Arc::clone(&registration.stream),
            audio: peer,
        });
    }

    (state, assignments)
}
