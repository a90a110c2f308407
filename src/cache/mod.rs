//! In-process scan state: which player sits at each leaderboard slot, and
//! where each region's history scan currently points.

use crate::models::{GlobalPlace, PlayerId, Region};
use std::collections::HashMap;

/// (region, rank) → player. Filled by leaderboard fetches, never shrinks.
#[derive(Debug, Default, Clone)]
pub struct PlayerCache {
    players: HashMap<GlobalPlace, PlayerId>,
}

impl PlayerCache {
    /// Write `ids` at ranks 0..N of `region`. Last write wins per slot;
    /// slots beyond N keep whatever an earlier, longer leaderboard put there.
    pub fn merge(&mut self, region: Region, ids: &[PlayerId]) -> usize {
        for (rank, id) in ids.iter().enumerate() {
            self.players.insert(GlobalPlace::new(region, rank as u32), *id);
        }
        ids.len()
    }

    pub fn lookup(&self, place: GlobalPlace) -> Option<PlayerId> {
        self.players.get(&place).copied()
    }

    pub fn contains(&self, place: GlobalPlace) -> bool {
        self.players.contains_key(&place)
    }

    pub fn region_len(&self, region: Region) -> usize {
        self.players.keys().filter(|p| p.region == region).count()
    }

    /// Number of cached slots across all regions.
    pub fn total(&self) -> usize {
        self.players.len()
    }

    /// Next slot to scan after `place`, wrapping to rank 0 of the same region.
    pub fn successor(&self, place: GlobalPlace) -> GlobalPlace {
        let next = GlobalPlace::new(place.region, place.rank + 1);
        if self.contains(next) {
            next
        } else {
            GlobalPlace::first(place.region)
        }
    }
}

/// Current history-scan position for each configured seed place.
///
/// Every `fetch_last_match` entry walks its own cursor, starting at its seed
/// and staying within the seed's region. Entries with the same seed share one.
#[derive(Debug, Default, Clone)]
pub struct ScanCursors {
    cursors: HashMap<GlobalPlace, u32>,
}

impl ScanCursors {
    /// Where the scan seeded at `seed` points now; `seed` itself until first set.
    pub fn current(&self, seed: GlobalPlace) -> GlobalPlace {
        match self.cursors.get(&seed) {
            Some(&rank) => GlobalPlace::new(seed.region, rank),
            None => seed,
        }
    }

    pub fn set(&mut self, seed: GlobalPlace, place: GlobalPlace) {
        debug_assert_eq!(seed.region, place.region);
        self.cursors.insert(seed, place.rank);
    }

    /// Load `(seed, position)` pairs saved by an earlier run.
    pub fn restore(&mut self, saved: impl IntoIterator<Item = (GlobalPlace, GlobalPlace)>) -> usize {
        let mut n = 0;
        for (seed, place) in saved {
            self.set(seed, place);
            n += 1;
        }
        n
    }

    pub fn get(&self, seed: GlobalPlace) -> Option<GlobalPlace> {
        self.cursors.get(&seed).map(|&rank| GlobalPlace::new(seed.region, rank))
    }
}

/// Everything the task handler mutates between tasks. Owned by the scheduler.
#[derive(Debug, Default, Clone)]
pub struct ScanState {
    pub players: PlayerCache,
    pub cursors: ScanCursors,
}
