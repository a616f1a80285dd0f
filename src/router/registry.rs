//! Per-direction stream registry
//!
//! Maps every claimed SSRC (primary and RTX alias) to the stream that owns
//! it. Each SSRC names at most one stream; a registration claims all of its
//! SSRCs or none of them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::config::StreamConfig;
use super::stream::{MediaStream, StreamId};
use crate::error::RegistryError;
use crate::types::{MediaKind, MediaType};

/// One registered stream
#[derive(Clone)]
pub struct Registration {
    pub config: StreamConfig,
    pub stream: Arc<dyn MediaStream>,
}

/// Streams of one direction, keyed by SSRC
#[derive(Default)]
pub struct StreamRegistry {
    by_ssrc: HashMap<u32, StreamId>,
    /// Ordered by creation
    streams: BTreeMap<StreamId, Registration>,
    /// Sync group to the audio stream chosen for it
    sync_groups: HashMap<String, StreamId>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every SSRC of `config` for `id`
    pub fn insert(
        &mut self,
        id: StreamId,
        config: StreamConfig,
        stream: Arc<dyn MediaStream>,
    ) -> Result<(), RegistryError> {
        if config.rtx_ssrc == Some(config.ssrc) {
            return Err(RegistryError::DuplicateSsrc(config.ssrc));
        }
        if let Some(ssrc) = config.ssrcs().find(|ssrc| self.by_ssrc.contains_key(ssrc)) {
            return Err(RegistryError::DuplicateSsrc(ssrc));
        }

        for ssrc in config.ssrcs() {
            self.by_ssrc.insert(ssrc, id);
        }
        self.streams.insert(id, Registration { config, stream });
        Ok(())
    }

    /// Remove `id` and every SSRC mapped to it; clears its sync mapping
    pub fn remove(&mut self, id: StreamId) -> Option<Registration> {
        let registration = self.streams.remove(&id)?;
        self.by_ssrc.retain(|_, owner| *owner != id);
        self.sync_groups.retain(|_, audio| *audio != id);
        Some(registration)
    }

    pub fn get(&self, id: StreamId) -> Option<&Registration> {
        self.streams.get(&id)
    }

    /// Stream owning `ssrc`, with its kind
    pub fn lookup(&self, ssrc: u32) -> Option<(Arc<dyn MediaStream>, MediaKind)> {
        let id = self.by_ssrc.get(&ssrc)?;
        self.streams
            .get(id)
            .map(|r| (Arc::clone(&r.stream), r.config.kind))
    }

    pub fn owner_of(&self, ssrc: u32) -> Option<StreamId> {
        self.by_ssrc.get(&ssrc).copied()
    }

    /// Every stream, in creation order
    pub fn streams(&self) -> Vec<Arc<dyn MediaStream>> {
        self.streams.values().map(|r| Arc::clone(&r.stream)).collect()
    }

    /// Streams whose kind matches the media type hint
    pub fn streams_matching(&self, media_type: MediaType) -> Vec<Arc<dyn MediaStream>> {
        self.streams
            .values()
            .filter(|r| media_type.matches(r.config.kind))
            .map(|r| Arc::clone(&r.stream))
            .collect()
    }

    /// Registrations of `kind` in `group`, in creation order
    pub fn in_sync_group<'a>(
        &'a self,
        group: &'a str,
        kind: MediaKind,
    ) -> impl Iterator<Item = (StreamId, &'a Registration)> + 'a {
        self.streams
            .iter()
            .filter(move |(_, r)| r.config.kind == kind && r.config.sync_group.as_deref() == Some(group))
            .map(|(id, r)| (*id, r))
    }

    pub fn sync_audio(&self, group: &str) -> Option<StreamId> {
        self.sync_groups.get(group).copied()
    }

    pub fn set_sync_audio(&mut self, group: &str, audio: StreamId) {
        self.sync_groups.insert(group.to_string(), audio);
    }

    /// Number of registered streams
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Number of claimed SSRCs
    pub fn ssrc_count(&self) -> usize {
        self.by_ssrc.len()
    }
}
