//! Test fixtures: synthetic pages in the site's grid markup, plus in-memory
//! stand-ins for the HTTP source and the store.

use crate::error::{StoreError, TransportError};
use crate::models::{GlobalPlace, MatchId, MatchRecord, PlayerId, PlayerRef, Region};
use crate::scraper::MatchSource;
use crate::scraper::cleaner::format_played_at;
use crate::storage::MatchStore;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use std::fmt::Write;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .and_then(|date| date.and_hms_opt(h, mi, s))
        .expect("valid fixture timestamp")
}

pub fn record(id: i64, region: Region, winner: (i64, &str), loser: (i64, &str)) -> MatchRecord {
    MatchRecord {
        match_id: MatchId(id),
        played_at: ts(2017, 3, 1, 12, 0, 0),
        winner: PlayerRef { id: PlayerId(winner.0), name: winner.1.to_string() },
        loser: PlayerRef { id: PlayerId(loser.0), name: loser.1.to_string() },
        region,
    }
}

// ── Pages ─────────────────────────────────────────────────────────────────────

/// Rankings grid: rank | rating | player link | games.
pub fn leaderboard_html(ids: &[i64]) -> String {
    let mut rows = String::new();
    for (i, id) in ids.iter().enumerate() {
        let class = if i % 2 == 0 { "rgRow" } else { "rgAltRow" };
        write!(
            rows,
            r#"<tr class="{class}" id="ctl00_MainContent_RadGridRankings_ctl00__{i}">
                <td>{rank}</td><td>rating</td>
                <td><a href="/Player/Profile?PlayerID={id}">Player{id}</a></td>
                <td>games</td>
            </tr>"#,
            rank = i + 1,
        )
        .unwrap();
    }
    format!(
        r#"<html><body><table class="rgMasterTable"><thead><tr><th>Rank</th></tr></thead>
        <tbody>{rows}</tbody></table></body></html>"#
    )
}

/// Match history grid: replay id in column 0, timestamp in column 7.
pub fn history_html(matches: &[(i64, NaiveDateTime)]) -> String {
    let mut rows = String::new();
    for (i, (id, when)) in matches.iter().enumerate() {
        write!(
            rows,
            r#"<tr class="rgRow" id="ctl00_MainContent_RadGridMatchHistory_ctl00__{i}">
                <td>{id}</td><td>map</td><td>length</td><td>hero</td>
                <td>level</td><td>result</td><td>change</td><td>{when}</td>
            </tr>"#,
            when = format_played_at(when),
        )
        .unwrap();
    }
    format!(r#"<html><body><table class="rgMasterTable"><tbody>{rows}</tbody></table></body></html>"#)
}

/// Scoreboard: five rows, separator, five rows. Each player is (id, name, score).
pub fn summary_html(team_a: &[(i64, &str, i64)], team_b: &[(i64, &str, i64)]) -> String {
    let row = |(id, name, score): &(i64, &str, i64)| {
        format!(
            r#"<tr><td>hero</td><td>talents</td>
                <td><a href="/Player/Profile?PlayerID={id}">{name}</a></td>
                <td>kills</td><td>{score}</td></tr>"#
        )
    };
    let a: String = team_a.iter().map(row).collect();
    let b: String = team_b.iter().map(row).collect();
    format!(
        r#"<html><body><div id="summary"><table class="scoreboard"><tbody>
        {a}<tr class="separator"><td colspan="5">vs</td></tr>{b}
        </tbody></table></div></body></html>"#
    )
}

// ── Fake source ───────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeSource {
    pub leaderboards: HashMap<Region, String>,
    pub histories: HashMap<PlayerId, String>,
    pub summaries: HashMap<MatchId, String>,
    /// Every requested page, in order: "leaderboard:us", "history:101", "summary:9001".
    pub requests: Mutex<Vec<String>>,
}

impl FakeSource {
    fn serve(&self, key: String, page: Option<&String>) -> Result<String, TransportError> {
        self.requests.lock().unwrap().push(key.clone());
        page.cloned().ok_or(TransportError::Status { url: key, status: 404 })
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MatchSource for FakeSource {
    async fn fetch_leaderboard(&self, region: Region) -> Result<String, TransportError> {
        self.serve(format!("leaderboard:{region}"), self.leaderboards.get(&region))
    }

    async fn fetch_match_history(&self, player: PlayerId) -> Result<String, TransportError> {
        self.serve(format!("history:{player}"), self.histories.get(&player))
    }

    async fn fetch_match_summary(&self, match_id: MatchId) -> Result<String, TransportError> {
        self.serve(format!("summary:{match_id}"), self.summaries.get(&match_id))
    }
}

// ── Fake store ────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeStoreState {
    pub matches: HashMap<MatchId, MatchRecord>,
    /// seed → current position
    pub cursors: HashMap<GlobalPlace, GlobalPlace>,
    pub connected: bool,
    /// Upcoming insert_match calls that fail and drop the connection.
    pub failing_inserts: usize,
    /// Upcoming reconnect attempts that fail.
    pub failing_reconnects: usize,
    /// Upcoming persist_cursor calls that fail and drop the connection.
    pub failing_cursor_writes: usize,
    pub reconnect_attempts: usize,
    pub stats_calls: usize,
    /// Call log: "exists:1", "insert:1", "reconnect", "stats", "cursor:us#0=us#1".
    pub log: Vec<String>,
}

pub struct FakeStore {
    pub state: Mutex<FakeStoreState>,
    /// Cancelled once `stats_calls` reaches `stop_after_stats`.
    stop: Option<(CancellationToken, usize)>,
    /// Scripted outcomes for record_stats, consumed front to back.
    stats_script: Mutex<VecDeque<bool>>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeStoreState { connected: true, ..Default::default() }),
            stop: None,
            stats_script: Mutex::new(VecDeque::new()),
        }
    }
}

impl FakeStore {
    pub fn stopping_after(token: CancellationToken, stats_calls: usize) -> Self {
        Self { stop: Some((token, stats_calls)), ..Self::default() }
    }

    pub fn script_stats(&self, outcomes: &[bool]) {
        self.stats_script.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut FakeStoreState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn log(&self) -> Vec<String> {
        self.with_state(|s| s.log.clone())
    }

    fn online(s: &FakeStoreState) -> Result<(), StoreError> {
        if s.connected { Ok(()) } else { Err(StoreError::Disconnected) }
    }
}

impl MatchStore for FakeStore {
    fn match_exists(&self, id: MatchId) -> Result<bool, StoreError> {
        self.with_state(|s| {
            s.log.push(format!("exists:{id}"));
            Self::online(s)?;
            Ok(s.matches.contains_key(&id))
        })
    }

    fn insert_match(&self, record: &MatchRecord) -> Result<bool, StoreError> {
        self.with_state(|s| {
            s.log.push(format!("insert:{}", record.match_id));
            Self::online(s)?;
            if s.failing_inserts > 0 {
                s.failing_inserts -= 1;
                s.connected = false;
                return Err(StoreError::Disconnected);
            }
            Ok(s.matches.insert(record.match_id, record.clone()).is_none())
        })
    }

    fn reconnect(&self) -> Result<(), StoreError> {
        self.with_state(|s| {
            s.log.push("reconnect".to_string());
            s.reconnect_attempts += 1;
            if s.failing_reconnects > 0 {
                s.failing_reconnects -= 1;
                return Err(StoreError::Disconnected);
            }
            s.connected = true;
            Ok(())
        })
    }

    fn record_stats(&self) -> Result<(), StoreError> {
        let scripted = self.stats_script.lock().unwrap().pop_front();
        let calls = self.with_state(|s| {
            s.log.push("stats".to_string());
            s.stats_calls += 1;
            s.stats_calls
        });
        if let Some((token, limit)) = &self.stop {
            if calls >= *limit {
                token.cancel();
            }
        }
        self.with_state(|s| {
            Self::online(s)?;
            if scripted == Some(false) {
                s.connected = false;
                return Err(StoreError::Disconnected);
            }
            Ok(())
        })
    }

    fn persist_cursor(&self, seed: GlobalPlace, place: GlobalPlace) -> Result<(), StoreError> {
        self.with_state(|s| {
            s.log.push(format!("cursor:{seed}={place}"));
            Self::online(s)?;
            if s.failing_cursor_writes > 0 {
                s.failing_cursor_writes -= 1;
                s.connected = false;
                return Err(StoreError::Disconnected);
            }
            s.cursors.insert(seed, place);
            Ok(())
        })
    }

    fn load_cursors(&self) -> Result<Vec<(GlobalPlace, GlobalPlace)>, StoreError> {
        self.with_state(|s| {
            Self::online(s)?;
            Ok(s.cursors.iter().map(|(&seed, &place)| (seed, place)).collect())
        })
    }
}
