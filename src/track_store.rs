// src/track_store.rs
//
// Per-track state keyed by the external tracker's id.
//
// The two dedup flags (`has_crossed`, `enrichment_dispatched`) only ever go
// false → true, and only through `mark_*`, which report whether THIS call made
// the transition. The store is owned by the frame loop alone (`&mut self`), so
// a check-and-set can never be split between two callers.

use std::collections::HashMap;
use tracing::debug;

use crate::geometry::Point;

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    track_id: u32,
    object_type: String,
    last_position: Point,
    has_crossed: bool,
    enrichment_dispatched: bool,
    first_seen_frame: u64,
    last_seen_frame: u64,
}

impl Track {
    fn new(track_id: u32, object_type: &str, frame_id: u64) -> Self {
        Self {
            track_id,
            object_type: object_type.to_string(),
            last_position: Point::default(),
            has_crossed: false,
            enrichment_dispatched: false,
            first_seen_frame: frame_id,
            last_seen_frame: frame_id,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Label assigned when the track was first observed.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn last_position(&self) -> Point {
        self.last_position
    }

    pub fn has_crossed(&self) -> bool {
        self.has_crossed
    }

    pub fn enrichment_dispatched(&self) -> bool {
        self.enrichment_dispatched
    }

    pub fn first_seen_frame(&self) -> u64 {
        self.first_seen_frame
    }

    pub fn last_seen_frame(&self) -> u64 {
        self.last_seen_frame
    }
}

#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: HashMap<u32, Track>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing entry, or a fresh one with both flags cleared.
    pub fn get_or_create(&mut self, track_id: u32, object_type: &str, frame_id: u64) -> &Track {
        self.tracks.entry(track_id).or_insert_with(|| {
            debug!("🆕 New track #{} ({})", track_id, object_type);
            Track::new(track_id, object_type, frame_id)
        })
    }

    /// Unconditional overwrite. Returns false for an unknown id.
    pub fn update_position(&mut self, track_id: u32, position: Point, frame_id: u64) -> bool {
        match self.tracks.get_mut(&track_id) {
            Some(track) => {
                track.last_position = position;
                track.last_seen_frame = track.last_seen_frame.max(frame_id);
                true
            }
            None => false,
        }
    }

    /// True only for the call that flips `has_crossed`.
    pub fn mark_crossed(&mut self, track_id: u32) -> bool {
        match self.tracks.get_mut(&track_id) {
            Some(track) if !track.has_crossed => {
                track.has_crossed = true;
                true
            }
            _ => false,
        }
    }

    /// True only for the call that flips `enrichment_dispatched`.
    pub fn mark_enrichment_dispatched(&mut self, track_id: u32) -> bool {
        match self.tracks.get_mut(&track_id) {
            Some(track) if !track.enrichment_dispatched => {
                track.enrichment_dispatched = true;
                true
            }
            _ => false,
        }
    }

    /// Drop tracks last seen before `older_than_frame`. Returns how many went.
    pub fn prune(&mut self, older_than_frame: u64) -> usize {
        let before = self.tracks.len();
        self.tracks.retain(|id, track| {
            let keep = track.last_seen_frame >= older_than_frame;
            if !keep {
                debug!(
                    "🗑️  Pruning track #{} ({}) - seen frames {}..={}",
                    id, track.object_type, track.first_seen_frame(), track.last_seen_frame
                );
            }
            keep
        });
        before - self.tracks.len()
    }

    pub fn get(&self, track_id: u32) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================
