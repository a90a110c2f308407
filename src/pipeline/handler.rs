//! One task in, one effect out: fetch → extract → store.

use crate::cache::ScanState;
use crate::error::HarvestError;
use crate::models::{GlobalPlace, MatchId, Region, Task};
use crate::scraper::MatchSource;
use crate::scraper::parsers::{extract_last_match, extract_leaderboard, extract_match_summary};
use crate::storage::MatchStore;
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

/// What a successful task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    Seeded {
        region: Region,
        players: usize,
    },
    Scanned {
        place: GlobalPlace,
        match_id: MatchId,
        /// True if the match was new and has been written.
        stored: bool,
        next: GlobalPlace,
    },
    Stored {
        match_id: MatchId,
        inserted: bool,
    },
}

pub struct TaskHandler<S, R> {
    pub(super) source: S,
    pub(super) store: R,
}

impl<S: MatchSource, R: MatchStore> TaskHandler<S, R> {
    pub fn new(source: S, store: R) -> Self {
        Self { source, store }
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    pub async fn handle(&self, task: &Task, state: &mut ScanState) -> Result<TaskReport, HarvestError> {
        match *task {
            Task::FetchGrandmasters(region) => self.fetch_grandmasters(region, state).await,
            Task::FetchLastMatch(seed) => self.fetch_last_match(seed, state).await,
            Task::FetchMatch { region, played_at, match_id } => {
                self.fetch_match(region, played_at, match_id).await
            }
        }
    }

    async fn fetch_grandmasters(
        &self,
        region: Region,
        state: &mut ScanState,
    ) -> Result<TaskReport, HarvestError> {
        let html = self.source.fetch_leaderboard(region).await?;
        let ids = extract_leaderboard(&html)?;
        let players = state.players.merge(region, &ids);
        info!(
            "{}: {} players on leaderboard ({} slots cached)",
            region,
            players,
            state.players.total()
        );
        Ok(TaskReport::Seeded { region, players })
    }

    /// Which slot the scan seeded at `seed` should visit now.
    fn resolve_place(&self, seed: GlobalPlace, state: &ScanState) -> Result<GlobalPlace, HarvestError> {
        let place = state.cursors.current(seed);
        if state.players.contains(place) {
            return Ok(place);
        }
        if state.players.region_len(place.region) == 0 {
            return Err(HarvestError::Logic(place));
        }
        // Seed or saved cursor beyond the leaderboard now cached.
        let restart = GlobalPlace::first(place.region);
        warn!("{}: cursor {} beyond cached leaderboard, restarting at {}", seed, place, restart);
        if state.players.contains(restart) {
            Ok(restart)
        } else {
            Err(HarvestError::Logic(restart))
        }
    }

    /// Scan one slot, then move its cursor on whatever the outcome, except
    /// when the store is down: that slot is scanned again after reconnecting.
    async fn fetch_last_match(
        &self,
        seed: GlobalPlace,
        state: &mut ScanState,
    ) -> Result<TaskReport, HarvestError> {
        let place = self.resolve_place(seed, state)?;

        let scanned = match self.scan_place(place, state).await {
            Err(e) if e.is_store() => return Err(e),
            other => other,
        };

        let next = state.players.successor(place);
        self.store.persist_cursor(seed, next)?;
        state.cursors.set(seed, next);

        let (match_id, stored) = scanned?;
        Ok(TaskReport::Scanned { place, match_id, stored, next })
    }

    async fn scan_place(
        &self,
        place: GlobalPlace,
        state: &ScanState,
    ) -> Result<(MatchId, bool), HarvestError> {
        let player = state.players.lookup(place).ok_or(HarvestError::Logic(place))?;
        let html = self.source.fetch_match_history(player).await?;
        let (match_id, played_at) = extract_last_match(&html, 0)?;
        debug!("{}: player {} last played match {} at {}", place, player, match_id, played_at);

        let stored = self.store_if_new(place.region, played_at, match_id).await?;
        Ok((match_id, stored))
    }

    async fn store_if_new(
        &self,
        region: Region,
        played_at: NaiveDateTime,
        match_id: MatchId,
    ) -> Result<bool, HarvestError> {
        if self.store.match_exists(match_id)? {
            debug!("match {} already stored", match_id);
            return Ok(false);
        }
        match self.fetch_match(region, played_at, match_id).await? {
            TaskReport::Stored { inserted, .. } => Ok(inserted),
            _ => Ok(false),
        }
    }

    async fn fetch_match(
        &self,
        region: Region,
        played_at: NaiveDateTime,
        match_id: MatchId,
    ) -> Result<TaskReport, HarvestError> {
        let html = self.source.fetch_match_summary(match_id).await?;
        let record = extract_match_summary(&html, match_id, region, played_at)?;
        let inserted = self.store.insert_match(&record)?;
        if inserted {
            info!(
                "match {} ({}): {} beat {}",
                match_id, region, record.winner.name, record.loser.name
            );
        }
        Ok(TaskReport::Stored { match_id, inserted })
    }
}
