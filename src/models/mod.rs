use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Region ────────────────────────────────────────────────────────────────────

/// Leaderboard partition. The site addresses them by numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Us,
    Eu,
}

impl Region {
    pub const ALL: [Region; 2] = [Region::Us, Region::Eu];

    /// Value of the `Region` query parameter.
    pub fn code(self) -> u8 {
        match self {
            Region::Us => 1,
            Region::Eu => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Us => "us",
            Region::Eu => "eu",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "us" => Some(Region::Us),
            "eu" => Some(Region::Eu),
            _ => None,
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Identifiers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub i64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Scan coordinate ───────────────────────────────────────────────────────────

/// A (region, leaderboard rank) slot. Rank is 0-based in page order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalPlace {
    pub region: Region,
    pub rank: u32,
}

impl GlobalPlace {
    pub fn new(region: Region, rank: u32) -> Self {
        Self { region, rank }
    }

    pub fn first(region: Region) -> Self {
        Self::new(region, 0)
    }
}

impl fmt::Display for GlobalPlace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.region, self.rank)
    }
}

// ── Match record ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: PlayerId,
    pub name: String,
}

/// Normalized outcome of one match, written once to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub played_at: NaiveDateTime,
    pub winner: PlayerRef,
    pub loser: PlayerRef,
    pub region: Region,
}

/// Flat row shape for CSV export.
#[derive(Debug, Serialize)]
pub struct MatchRow<'a> {
    pub match_id: i64,
    pub played_at: NaiveDateTime,
    pub region: &'a str,
    pub winner_id: i64,
    pub winner_name: &'a str,
    pub loser_id: i64,
    pub loser_name: &'a str,
}

impl<'a> From<&'a MatchRecord> for MatchRow<'a> {
    fn from(m: &'a MatchRecord) -> Self {
        Self {
            match_id: m.match_id.0,
            played_at: m.played_at,
            region: m.region.as_str(),
            winner_id: m.winner.id.0,
            winner_name: &m.winner.name,
            loser_id: m.loser.id.0,
            loser_name: &m.loser.name,
        }
    }
}

// ── Tasks ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Refresh the region's leaderboard into the player cache.
    FetchGrandmasters(Region),
    /// Scan the most recent match of the player under the region's cursor.
    /// The place is the seed used until a cursor has been persisted.
    FetchLastMatch(GlobalPlace),
    FetchMatch {
        region: Region,
        played_at: NaiveDateTime,
        match_id: MatchId,
    },
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::FetchGrandmasters(region) => write!(f, "fetch-grandmasters({})", region),
            Task::FetchLastMatch(place) => write!(f, "fetch-last-match({})", place),
            Task::FetchMatch { region, match_id, .. } => {
                write!(f, "fetch-match({}, {})", region, match_id)
            }
        }
    }
}

/// Serialized task entry as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskSpec {
    FetchGrandmasters {
        region: Region,
    },
    FetchLastMatch {
        region: Region,
        #[serde(default)]
        rank: u32,
    },
    /// One-off backfill of a known replay.
    FetchMatch {
        region: Region,
        match_id: i64,
        played_at: NaiveDateTime,
    },
}

impl From<&TaskSpec> for Task {
    fn from(spec: &TaskSpec) -> Self {
        match *spec {
            TaskSpec::FetchGrandmasters { region } => Task::FetchGrandmasters(region),
            TaskSpec::FetchLastMatch { region, rank } => {
                Task::FetchLastMatch(GlobalPlace::new(region, rank))
            }
            TaskSpec::FetchMatch { region, match_id, played_at } => Task::FetchMatch {
                region,
                played_at,
                match_id: MatchId(match_id),
            },
        }
    }
}
