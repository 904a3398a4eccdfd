//! Track registry and render snapshot handoff.
//!
//! The registry is owned by the sequencer thread, which is its sole
//! writer. The render thread never sees the registry itself; it reads an
//! immutable [`RenderSnapshot`] published through an `ArcSwap` pointer
//! swap. Superseded snapshots are parked until no render reference can
//! remain, so disposing a track never frees memory under an in-flight
//! callback, and deallocation always happens on the control plane.

use crate::track::{Track, TrackId};
use crate::{Error, Result};
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

/// Immutable view of the registry for one or more render cycles.
#[derive(Debug)]
pub struct RenderSnapshot {
    tracks: Vec<Arc<Track>>,
    generation: u64,
}

impl RenderSnapshot {
    pub fn empty() -> Self {
        Self {
            tracks: Vec::new(),
            generation: 0,
        }
    }

    #[inline]
    pub fn tracks(&self) -> &[Arc<Track>] {
        &self.tracks
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Registry of live tracks plus the snapshot publication point.
pub struct TrackRegistry {
    /// id → track index, shared read-only with the engine facade for
    /// position queries. Written only by the sequencer.
    index: Arc<DashMap<TrackId, Arc<Track>>>,

    /// Latest published snapshot; the render thread does one wait-free
    /// load per callback.
    published: Arc<ArcSwap<RenderSnapshot>>,

    /// Superseded snapshots awaiting reclamation.
    retired: Vec<Arc<RenderSnapshot>>,

    generation: u64,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self {
            index: Arc::new(DashMap::new()),
            published: Arc::new(ArcSwap::from_pointee(RenderSnapshot::empty())),
            retired: Vec::new(),
            generation: 0,
        }
    }

    /// Shared read-only index handle for the engine facade.
    pub fn index_handle(&self) -> Arc<DashMap<TrackId, Arc<Track>>> {
        Arc::clone(&self.index)
    }

    /// Publication point handle for the render side.
    pub fn snapshot_handle(&self) -> Arc<ArcSwap<RenderSnapshot>> {
        Arc::clone(&self.published)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, id: TrackId) -> Option<Arc<Track>> {
        self.index.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Register a track. Ids are never reused while a track is alive.
    pub fn insert(&mut self, track: Arc<Track>) -> Result<()> {
        let id = track.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateTrack(id));
        }
        self.index.insert(id, track);
        self.publish();
        Ok(())
    }

    /// Remove a track from the registry. The backing memory stays alive
    /// until every snapshot referencing it has been reclaimed.
    pub fn remove(&mut self, id: TrackId) -> Option<Arc<Track>> {
        let removed = self.index.remove(&id).map(|(_, track)| track);
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Any track Playing or Paused keeps the pipeline running.
    pub fn any_active(&self) -> bool {
        self.index.iter().any(|entry| entry.value().is_active())
    }

    /// Tracks whose non-looping source ran out since the last sweep.
    pub fn finished_ids(&self) -> Vec<TrackId> {
        self.index
            .iter()
            .filter(|entry| entry.value().is_finished())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Rebuild and atomically publish a snapshot of the current index,
    /// retiring the previous one.
    pub fn publish(&mut self) {
        self.generation += 1;
        let tracks = self
            .index
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        let next = Arc::new(RenderSnapshot {
            tracks,
            generation: self.generation,
        });
        let previous = self.published.swap(next);
        self.retired.push(previous);
        self.reclaim();
    }

    /// Drop retired snapshots that no render reference can still reach.
    ///
    /// A retired snapshot with strong count 1 is held only by us: the
    /// swap removed the publication reference and any callback guard has
    /// been released. Dropping it here keeps deallocation off the render
    /// thread.
    pub fn reclaim(&mut self) {
        self.retired
            .retain(|snapshot| Arc::strong_count(snapshot) > 1);
    }

    #[cfg(test)]
    fn retired_len(&self) -> usize {
        self.retired.len()
    }
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use std::sync::Weak;

    fn make_track(id: u64) -> Arc<Track> {
        let source = Arc::new(MemorySource::silence(100, 44_100, 1));
        Arc::new(Track::new(TrackId(id), source, false, 1.0))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut registry = TrackRegistry::new();
        registry.insert(make_track(1)).unwrap();
        registry.insert(make_track(2)).unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get(TrackId(1)).is_some());
        assert!(registry.get(TrackId(3)).is_none());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = TrackRegistry::new();
        registry.insert(make_track(1)).unwrap();
        assert!(matches!(
            registry.insert(make_track(1)),
            Err(Error::DuplicateTrack(TrackId(1)))
        ));
    }

    #[test]
    fn test_publish_bumps_generation() {
        let mut registry = TrackRegistry::new();
        let handle = registry.snapshot_handle();
        assert_eq!(handle.load().generation(), 0);

        registry.insert(make_track(1)).unwrap();
        let gen_after_insert = handle.load().generation();
        assert!(gen_after_insert > 0);
        assert_eq!(handle.load().tracks().len(), 1);

        registry.remove(TrackId(1));
        assert!(handle.load().generation() > gen_after_insert);
        assert!(handle.load().tracks().is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = TrackRegistry::new();
        let handle = registry.snapshot_handle();
        registry.insert(make_track(1)).unwrap();
        let generation = handle.load().generation();

        assert!(registry.remove(TrackId(9)).is_none());
        assert_eq!(handle.load().generation(), generation);
    }

    #[test]
    fn test_disposed_track_outlives_held_snapshot() {
        let mut registry = TrackRegistry::new();
        let handle = registry.snapshot_handle();

        registry.insert(make_track(1)).unwrap();

        // A render callback is holding the published snapshot
        let in_flight = handle.load_full();
        let weak: Weak<Track> = Arc::downgrade(&registry.get(TrackId(1)).unwrap());

        let track = registry.remove(TrackId(1)).unwrap();
        drop(track);

        // Track memory must survive while the old snapshot is in use
        assert!(weak.upgrade().is_some());
        assert!(registry.retired_len() > 0);

        drop(in_flight);
        registry.reclaim();
        assert_eq!(registry.retired_len(), 0);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_finished_sweep() {
        let mut registry = TrackRegistry::new();
        registry.insert(make_track(1)).unwrap();
        registry.insert(make_track(2)).unwrap();
        assert!(registry.finished_ids().is_empty());

        let track = registry.get(TrackId(2)).unwrap();
        track.mark_playing();
        let mut dst = [0.0f32; 256];
        while !track.advance(&mut dst, 256).newly_stopped {}

        assert_eq!(registry.finished_ids(), vec![TrackId(2)]);
    }
}
