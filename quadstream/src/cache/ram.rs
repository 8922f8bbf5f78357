//! Bounded in-memory quad cache.
//!
//! Capacity is enforced by an explicit [`RamQuadCache::purge`] rather than on
//! insert: the caller knows which quads are protected at that moment. Among
//! unprotected quads, the ones farthest from the camera's zoom level go
//! first, then the least recently used.

use std::collections::{HashMap, HashSet};

use crate::tile::{Quad, TileId};

#[derive(Debug)]
struct CacheEntry {
    quad: Quad,
    last_used: u64,
}

/// Quad store keyed by quad root id.
#[derive(Debug, Default)]
pub struct RamQuadCache {
    entries: HashMap<TileId, CacheEntry>,
    /// Logical clock for recency; bumped on every insert and touch.
    clock: u64,
}

impl RamQuadCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a quad. The quad counts as just used.
    pub fn insert(&mut self, quad: Quad) -> Option<Quad> {
        self.clock += 1;
        let entry = CacheEntry {
            quad,
            last_used: self.clock,
        };
        self.entries
            .insert(entry.quad.id, entry)
            .map(|old| old.quad)
    }

    pub fn get(&self, id: &TileId) -> Option<&Quad> {
        self.entries.get(id).map(|e| &e.quad)
    }

    pub fn contains(&self, id: &TileId) -> bool {
        self.entries.contains_key(id)
    }

    /// Marks quads as used now. Unknown ids are ignored.
    pub fn touch<'a, I>(&mut self, ids: I)
    where
        I: IntoIterator<Item = &'a TileId>,
    {
        self.clock += 1;
        let now = self.clock;
        for id in ids {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.last_used = now;
            }
        }
    }

    pub fn remove(&mut self, id: &TileId) -> Option<Quad> {
        self.entries.remove(id).map(|e| e.quad)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TileId> {
        self.entries.keys()
    }

    /// Recency stamp of a quad, larger is more recent.
    pub fn last_used(&self, id: &TileId) -> Option<u64> {
        self.entries.get(id).map(|e| e.last_used)
    }

    /// Evicts unprotected quads until at most `capacity` remain.
    ///
    /// Returns the evicted quads in eviction order. Protected quads are never
    /// evicted, so the cache may stay above capacity when everything left is
    /// protected.
    pub fn purge(
        &mut self,
        capacity: usize,
        protected: &HashSet<TileId>,
        camera_zoom: u8,
    ) -> Vec<Quad> {
        if self.entries.len() <= capacity {
            return Vec::new();
        }
        let excess = self.entries.len() - capacity;

        let mut candidates: Vec<(u8, u64, TileId)> = self
            .entries
            .iter()
            .filter(|(id, _)| !protected.contains(id))
            .map(|(id, e)| (id.zoom.abs_diff(camera_zoom), e.last_used, *id))
            .collect();
        // Farthest zoom first, then oldest
        candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let evicted: Vec<Quad> = candidates
            .into_iter()
            .take(excess)
            .filter_map(|(_, _, id)| self.entries.remove(&id))
            .map(|e| e.quad)
            .collect();

        if self.entries.len() > capacity {
            tracing::warn!(
                len = self.entries.len(),
                capacity,
                "RAM quad cache over capacity, remaining quads are all protected"
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::tile::TileLayer;

    fn quad(zoom: u8, x: u32, y: u32) -> Quad {
        let id = TileId::new(zoom, x, y);
        let tiles = id
            .children()
            .iter()
            .map(|c| TileLayer::good(*c, Bytes::from_static(b"px")))
            .collect();
        Quad::new(id, tiles)
    }

    fn ids(quads: Vec<Quad>) -> Vec<TileId> {
        quads.into_iter().map(|q| q.id).collect()
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = RamQuadCache::new();
        assert!(cache.insert(quad(3, 1, 1)).is_none());
        assert!(cache.insert(quad(3, 1, 1)).is_some());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&TileId::new(3, 1, 1)).is_some());
    }

    #[test]
    fn test_purge_under_capacity_is_noop() {
        let mut cache = RamQuadCache::new();
        cache.insert(quad(3, 0, 0));
        assert!(cache.purge(5, &HashSet::new(), 3).is_empty());
    }

    #[test]
    fn test_purge_evicts_least_recently_used() {
        let mut cache = RamQuadCache::new();
        for x in 0..5 {
            cache.insert(quad(5, x, 0));
        }
        cache.touch(&[TileId::new(5, 0, 0)]);

        let evicted = ids(cache.purge(3, &HashSet::new(), 5));
        assert_eq!(evicted, vec![TileId::new(5, 1, 0), TileId::new(5, 2, 0)]);
        assert!(cache.contains(&TileId::new(5, 0, 0)));
    }

    #[test]
    fn test_purge_prefers_far_zoom_levels() {
        let mut cache = RamQuadCache::new();
        cache.insert(quad(2, 0, 0));
        cache.insert(quad(9, 0, 0));
        cache.insert(quad(10, 0, 0));
        // The zoom 10 quad is newest but farthest from the camera at zoom 3
        let evicted = ids(cache.purge(2, &HashSet::new(), 3));
        assert_eq!(evicted, vec![TileId::new(10, 0, 0)]);
    }

    #[test]
    fn test_desired_quad_never_evicted() {
        let mut cache = RamQuadCache::new();
        let desired = TileId::new(6, 0, 0);
        cache.insert(quad(6, 0, 0));
        for x in 1..=100 {
            cache.insert(quad(6, x, 0));
        }
        // The desired quad is the least recently used entry
        let protected: HashSet<TileId> = [desired].into_iter().collect();
        let evicted = ids(cache.purge(100, &protected, 6));

        assert_eq!(evicted, vec![TileId::new(6, 1, 0)]);
        assert!(cache.contains(&desired));
        assert_eq!(cache.len(), 100);
    }

    #[test]
    fn test_all_protected_stays_over_capacity() {
        let mut cache = RamQuadCache::new();
        cache.insert(quad(4, 0, 0));
        cache.insert(quad(4, 1, 0));
        let protected: HashSet<TileId> = cache.ids().copied().collect();
        assert!(cache.purge(1, &protected, 4).is_empty());
        assert_eq!(cache.len(), 2);
    }
}
