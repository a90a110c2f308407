use crate::error::StoreError;
use crate::models::{GlobalPlace, MatchId, MatchRecord, PlayerId, PlayerRef, Region};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS matches (
    match_id     BIGINT    PRIMARY KEY,
    played_at    TIMESTAMP NOT NULL,
    region       VARCHAR   NOT NULL,
    winner_id    BIGINT    NOT NULL,
    winner_name  VARCHAR   NOT NULL,
    loser_id     BIGINT    NOT NULL,
    loser_name   VARCHAR   NOT NULL,
    scraped_at   TIMESTAMP NOT NULL
);

-- One history-scan cursor per configured seed place
CREATE TABLE IF NOT EXISTS scan_cursors (
    region            VARCHAR   NOT NULL,
    seed_rank         INTEGER   NOT NULL,
    leaderboard_rank  INTEGER   NOT NULL,
    updated_at        TIMESTAMP NOT NULL,
    PRIMARY KEY (region, seed_rank)
);

-- Refreshed from matches by record_stats()
CREATE TABLE IF NOT EXISTS player_stats (
    player_id    BIGINT    PRIMARY KEY,
    name         VARCHAR   NOT NULL,
    region       VARCHAR   NOT NULL,
    wins         BIGINT    NOT NULL,
    losses       BIGINT    NOT NULL,
    last_played  TIMESTAMP NOT NULL,
    updated_at   TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_matches_played ON matches (played_at);
CREATE INDEX IF NOT EXISTS idx_matches_region ON matches (region);
CREATE INDEX IF NOT EXISTS idx_matches_scraped ON matches (scraped_at);
"#;

/// Recompute the rows of every player with a match scraped at or after the
/// watermark (bound twice, after `updated_at`).
const REBUILD_STATS: &str = r#"
INSERT OR REPLACE INTO player_stats
    (player_id, name, region, wins, losses, last_played, updated_at)
SELECT
    player_id,
    arg_max(name, played_at),
    arg_max(region, played_at),
    SUM(win),
    SUM(loss),
    MAX(played_at),
    CAST(? AS TIMESTAMP)
FROM (
    SELECT winner_id AS player_id, winner_name AS name, region, played_at, 1 AS win, 0 AS loss
    FROM matches
    UNION ALL
    SELECT loser_id, loser_name, region, played_at, 0, 1
    FROM matches
)
WHERE player_id IN (
    SELECT winner_id FROM matches WHERE scraped_at >= CAST(? AS TIMESTAMP)
    UNION
    SELECT loser_id FROM matches WHERE scraped_at >= CAST(? AS TIMESTAMP)
)
GROUP BY player_id
"#;

// ── Store trait ───────────────────────────────────────────────────────────────

/// Persistence operations the harvest loop depends on.
pub trait MatchStore {
    fn match_exists(&self, id: MatchId) -> Result<bool, StoreError>;
    /// Returns false when the match was already stored.
    fn insert_match(&self, record: &MatchRecord) -> Result<bool, StoreError>;
    fn reconnect(&self) -> Result<(), StoreError>;
    fn record_stats(&self) -> Result<(), StoreError>;
    /// Save where the scan seeded at `seed` points now.
    fn persist_cursor(&self, seed: GlobalPlace, place: GlobalPlace) -> Result<(), StoreError>;
    /// Every saved `(seed, position)` pair.
    fn load_cursors(&self) -> Result<Vec<(GlobalPlace, GlobalPlace)>, StoreError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerStanding {
    pub player_id: i64,
    pub name: String,
    pub region: String,
    pub wins: i64,
    pub losses: i64,
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    /// `None` for in-memory databases.
    path: Option<PathBuf>,
    /// `None` after a failed reconnect, until the next one succeeds.
    conn: Mutex<Option<Connection>>,
    /// Matches scraped before this are already reflected in `player_stats`.
    stats_since: Mutex<NaiveDateTime>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Open {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let conn = Self::connect(Some(path))?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(Some(conn)),
            stats_since: Mutex::new(DateTime::<Utc>::UNIX_EPOCH.naive_utc()),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            path: None,
            conn: Mutex::new(Some(Self::connect(None)?)),
            stats_since: Mutex::new(DateTime::<Utc>::UNIX_EPOCH.naive_utc()),
        })
    }

    fn connect(path: Option<&Path>) -> Result<Connection, StoreError> {
        let conn = match path {
            Some(p) => Connection::open(p),
            None => Connection::open_in_memory(),
        };
        conn.map_err(|e| StoreError::Open {
            path: path.map_or_else(|| ":memory:".to_string(), |p| p.display().to_string()),
            reason: e.to_string(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, duckdb::Error>,
    ) -> Result<T, StoreError> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(StoreError::Disconnected)?;
        Ok(f(conn)?)
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        info!("Running migrations…");
        self.with_conn(|conn| {
            conn.execute_batch(DDL)?;
            conn.execute_batch(INDEXES)?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
                params![Utc::now().naive_utc()],
            )
        })?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Reporting ─────────────────────────────────────────────────────────────

    pub fn match_count(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0)))
    }

    pub fn player_count(&self) -> Result<i64, StoreError> {
        self.with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM player_stats", [], |r| r.get(0)))
    }

    pub fn played_range(&self) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT MIN(played_at), MAX(played_at) FROM matches", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
        })
    }

    pub fn region_counts(&self) -> Result<Vec<(Region, i64)>, StoreError> {
        let rows = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT region, COUNT(*) FROM matches GROUP BY region ORDER BY region")?;
            stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows
            .into_iter()
            .filter_map(|(region, n)| Region::from_str_opt(&region).map(|r| (r, n)))
            .collect())
    }

    pub fn top_players(&self, limit: usize) -> Result<Vec<PlayerStanding>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT player_id, name, region, wins, losses FROM player_stats
                 ORDER BY wins DESC, losses ASC, player_id ASC LIMIT ?",
            )?;
            stmt.query_map(params![limit as i64], |r| {
                Ok(PlayerStanding {
                    player_id: r.get(0)?,
                    name: r.get(1)?,
                    region: r.get(2)?,
                    wins: r.get(3)?,
                    losses: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
        })
    }

    pub fn list_matches(&self) -> Result<Vec<MatchRecord>, StoreError> {
        let raw = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT match_id, played_at, region, winner_id, winner_name, loser_id, loser_name
                 FROM matches ORDER BY played_at, match_id",
            )?;
            stmt.query_map([], |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, NaiveDateTime>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()
        })?;

        let mut out = Vec::with_capacity(raw.len());
        for (match_id, played_at, region, winner_id, winner_name, loser_id, loser_name) in raw {
            let Some(region) = Region::from_str_opt(&region) else {
                warn!("match {}: unknown region {:?}, skipped", match_id, region);
                continue;
            };
            out.push(MatchRecord {
                match_id: MatchId(match_id),
                played_at,
                winner: PlayerRef { id: PlayerId(winner_id), name: winner_name },
                loser: PlayerRef { id: PlayerId(loser_id), name: loser_name },
                region,
            });
        }
        Ok(out)
    }
}

impl MatchStore for Repository {
    fn match_exists(&self, id: MatchId) -> Result<bool, StoreError> {
        let n: i64 = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM matches WHERE match_id = ?",
                params![id.0],
                |r| r.get(0),
            )
        })?;
        Ok(n > 0)
    }

    /// Primary key on match_id turns a racing duplicate into a no-op.
    fn insert_match(&self, m: &MatchRecord) -> Result<bool, StoreError> {
        let n = self.with_conn(|conn| {
            conn.execute(
                r#"INSERT INTO matches
                       (match_id, played_at, region, winner_id, winner_name, loser_id, loser_name, scraped_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (match_id) DO NOTHING"#,
                params![
                    m.match_id.0,
                    m.played_at,
                    m.region.as_str(),
                    m.winner.id.0,
                    m.winner.name,
                    m.loser.id.0,
                    m.loser.name,
                    Utc::now().naive_utc(),
                ],
            )
        })?;
        Ok(n > 0)
    }

    /// Drop the current handle, then open a fresh one and probe it.
    fn reconnect(&self) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        guard.take();

        let fresh = Self::connect(self.path.as_deref())?;
        fresh.execute_batch("SELECT 1")?;
        *guard = Some(fresh);
        info!("Store connection re-established");
        Ok(())
    }

    /// Refresh stats for players touched since the last successful call.
    /// The first call after opening rebuilds every row.
    fn record_stats(&self) -> Result<(), StoreError> {
        let since = *self.stats_since.lock().map_err(|_| StoreError::Poisoned)?;
        let started = Utc::now().naive_utc();

        let refreshed = self.with_conn(|conn| {
            let fresh: i64 = conn.query_row(
                "SELECT COUNT(*) FROM matches WHERE scraped_at >= ?",
                params![since],
                |r| r.get(0),
            )?;
            if fresh == 0 {
                return Ok(0);
            }
            conn.execute(REBUILD_STATS, params![started, since, since])
        })?;

        *self.stats_since.lock().map_err(|_| StoreError::Poisoned)? = started;
        if refreshed > 0 {
            debug!("player_stats: {} rows refreshed", refreshed);
        }
        Ok(())
    }

    fn persist_cursor(&self, seed: GlobalPlace, place: GlobalPlace) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                r#"INSERT INTO scan_cursors (region, seed_rank, leaderboard_rank, updated_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT (region, seed_rank) DO UPDATE SET
                       leaderboard_rank = excluded.leaderboard_rank,
                       updated_at       = excluded.updated_at"#,
                params![
                    seed.region.as_str(),
                    i64::from(seed.rank),
                    i64::from(place.rank),
                    Utc::now().naive_utc(),
                ],
            )
        })?;
        Ok(())
    }

    fn load_cursors(&self) -> Result<Vec<(GlobalPlace, GlobalPlace)>, StoreError> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT region, seed_rank, leaderboard_rank FROM scan_cursors
                 ORDER BY region, seed_rank",
            )?;
            stmt.query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?, r.get::<_, i64>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows
            .into_iter()
            .filter_map(|(region, seed, rank)| {
                let region = Region::from_str_opt(&region)?;
                let seed = u32::try_from(seed).ok()?;
                let rank = u32::try_from(rank).ok()?;
                Some((GlobalPlace::new(region, seed), GlobalPlace::new(region, rank)))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, ts};
    use tokio_test::{assert_err, assert_ok};

    fn repo() -> Repository {
        let repo = Repository::open_in_memory().unwrap();
        repo.run_migrations().unwrap();
        repo
    }

    #[test]
    fn test_insert_and_exists() {
        let repo = repo();
        let m = record(7001, Region::Us, (1, "alpha"), (2, "beta"));

        assert!(!repo.match_exists(MatchId(7001)).unwrap());
        assert!(repo.insert_match(&m).unwrap());
        assert!(repo.match_exists(MatchId(7001)).unwrap());
        assert_eq!(repo.list_matches().unwrap(), vec![m]);
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let repo = repo();
        let m = record(7001, Region::Us, (1, "alpha"), (2, "beta"));
        assert_ok!(repo.insert_match(&m));
        assert_ok!(repo.insert_match(&m));
        assert_eq!(repo.match_count().unwrap(), 1);
    }

    #[test]
    fn test_cursor_upsert_per_seed() {
        let repo = repo();
        let eu = GlobalPlace::first(Region::Eu);
        let us_top = GlobalPlace::first(Region::Us);
        let us_mid = GlobalPlace::new(Region::Us, 50);

        repo.persist_cursor(eu, GlobalPlace::new(Region::Eu, 3)).unwrap();
        repo.persist_cursor(us_top, GlobalPlace::new(Region::Us, 1)).unwrap();
        repo.persist_cursor(us_mid, GlobalPlace::new(Region::Us, 51)).unwrap();
        repo.persist_cursor(eu, GlobalPlace::new(Region::Eu, 4)).unwrap();

        assert_eq!(
            repo.load_cursors().unwrap(),
            vec![
                (eu, GlobalPlace::new(Region::Eu, 4)),
                (us_top, GlobalPlace::new(Region::Us, 1)),
                (us_mid, GlobalPlace::new(Region::Us, 51)),
            ]
        );
    }

    #[test]
    fn test_record_stats_tallies_wins_and_losses() {
        let repo = repo();
        repo.insert_match(&record(1, Region::Us, (10, "ten"), (20, "twenty"))).unwrap();
        repo.insert_match(&record(2, Region::Us, (10, "ten"), (30, "thirty"))).unwrap();
        repo.insert_match(&record(3, Region::Eu, (20, "twenty"), (10, "ten"))).unwrap();

        repo.record_stats().unwrap();
        // idempotent
        repo.record_stats().unwrap();

        assert_eq!(repo.player_count().unwrap(), 3);
        let top = repo.top_players(10).unwrap();
        assert_eq!(top[0].player_id, 10);
        assert_eq!((top[0].wins, top[0].losses), (2, 1));
        assert_eq!(top[1].player_id, 20);
        assert_eq!((top[1].wins, top[1].losses), (1, 1));
        assert_eq!(top[2].player_id, 30);
        assert_eq!((top[2].wins, top[2].losses), (0, 1));
    }

    #[test]
    fn test_record_stats_refreshes_only_new_players() {
        let repo = repo();
        repo.insert_match(&record(1, Region::Us, (10, "ten"), (20, "twenty"))).unwrap();
        repo.record_stats().unwrap();
        let stamp = |id: i64| -> NaiveDateTime {
            repo.with_conn(|conn| {
                conn.query_row(
                    "SELECT updated_at FROM player_stats WHERE player_id = ?",
                    params![id],
                    |r| r.get(0),
                )
            })
            .unwrap()
        };
        let ten_before = stamp(10);

        repo.insert_match(&record(2, Region::Us, (20, "twenty"), (30, "thirty"))).unwrap();
        repo.record_stats().unwrap();

        assert_eq!(repo.player_count().unwrap(), 3);
        assert_eq!(stamp(10), ten_before);
        let top = repo.top_players(10).unwrap();
        let twenty = top.iter().find(|p| p.player_id == 20).unwrap();
        assert_eq!((twenty.wins, twenty.losses), (1, 1));
    }

    #[test]
    fn test_region_counts_and_range() {
        let repo = repo();
        let mut early = record(1, Region::Us, (1, "a"), (2, "b"));
        early.played_at = ts(2017, 1, 1, 10, 0, 0);
        let mut late = record(2, Region::Eu, (3, "c"), (4, "d"));
        late.played_at = ts(2017, 2, 1, 10, 0, 0);
        repo.insert_match(&early).unwrap();
        repo.insert_match(&late).unwrap();

        assert_eq!(repo.region_counts().unwrap(), vec![(Region::Eu, 1), (Region::Us, 1)]);
        assert_eq!(
            repo.played_range().unwrap(),
            (Some(ts(2017, 1, 1, 10, 0, 0)), Some(ts(2017, 2, 1, 10, 0, 0)))
        );
    }

    #[test]
    fn test_reconnect_file_backed() {
        let dir = std::env::temp_dir().join(format!("gm_harvest_test_{}", std::process::id()));
        let path = dir.join("reconnect.duckdb");
        let _ = std::fs::remove_file(&path);

        let repo = Repository::open(&path).unwrap();
        repo.run_migrations().unwrap();
        repo.insert_match(&record(5, Region::Eu, (1, "a"), (2, "b"))).unwrap();

        assert_ok!(repo.reconnect());
        assert!(repo.match_exists(MatchId(5)).unwrap());

        drop(repo);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_queries_fail_without_schema() {
        let repo = Repository::open_in_memory().unwrap();
        assert_err!(repo.match_exists(MatchId(1)));
    }
}
