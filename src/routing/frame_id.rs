//! Flood-suppression cache for link-state/routing frames (spec §4.10,
//! §8 "FrameId cache correctness").

use heapless::Deque;

use crate::time::Rand;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameId(pub u16);

const CACHE_CAPACITY: usize = 16;

/// Ring of the last 16 seen frame ids. `generate` draws ids until it finds
/// one not already cached, guaranteeing `contains(id)` holds immediately
/// after `generate` returns it (spec §8).
pub struct FrameIdCache {
    seen: Deque<FrameId, CACHE_CAPACITY>,
}

impl FrameIdCache {
    pub fn new() -> Self {
        Self { seen: Deque::new() }
    }

    pub fn contains(&self, id: FrameId) -> bool {
        self.seen.iter().any(|&seen| seen == id)
    }

    /// Inserts `id`, evicting the oldest entry if the cache is full.
    pub fn insert(&mut self, id: FrameId) {
        if self.seen.is_full() {
            self.seen.pop_front();
        }
        let _ = self.seen.push_back(id);
    }

    pub fn generate(&mut self, rand: &mut impl Rand) -> FrameId {
        loop {
            let candidate = FrameId(rand.gen_u16(0, u16::MAX));
            if !self.contains(candidate) {
                self.insert(candidate);
                return candidate;
            }
        }
    }
}

impl Default for FrameIdCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::test_support::DeterministicRand;

    #[test]
    fn generated_id_is_immediately_cached() {
        let mut cache = FrameIdCache::new();
        let mut rand = DeterministicRand::new(1);
        let id = cache.generate(&mut rand);
        assert!(cache.contains(id));
    }

    #[test]
    fn oldest_entry_evicted_once_full() {
        let mut cache = FrameIdCache::new();
        for i in 0..CACHE_CAPACITY as u16 {
            cache.insert(FrameId(i));
        }
        assert!(cache.contains(FrameId(0)));
        cache.insert(FrameId(999));
        assert!(!cache.contains(FrameId(0)));
        assert!(cache.contains(FrameId(999)));
    }
}
