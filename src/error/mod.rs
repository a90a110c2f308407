//! Failure taxonomy of the harvest engine.
//!
//! Every component raises its own error type; they meet in [`HarvestError`],
//! which the scheduler matches once through [`HarvestError::recovery`].

use crate::models::GlobalPlace;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no {0} found in document")]
    MissingMarker(&'static str),

    #[error("{what} row {row} has no column {column}")]
    MissingCell {
        what: &'static str,
        row: usize,
        column: usize,
    },

    #[error("{what} row {row} has no player link")]
    MissingPlayerLink { what: &'static str, row: usize },

    #[error("scoreboard has {found} rows, expected at least {expected}")]
    ShortScoreboard { found: usize, expected: usize },

    #[error("not a number: {0:?}")]
    BadNumber(String),

    #[error("bad timestamp {raw:?}: {reason}")]
    BadTimestamp { raw: String, reason: String },

    #[error("winner and loser are the same player ({0})")]
    SamePlayer(i64),

    #[error("invalid selector {0:?}")]
    Selector(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("could not open store at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("store connection lost")]
    Disconnected,

    #[error("store lock poisoned")]
    Poisoned,
}

/// What the scheduler does after a failed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Network,
    Parse,
    Store,
}

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// Cursor points at a slot no leaderboard fetch has filled.
    #[error("no player cached at {0}; fetch the leaderboard first")]
    Logic(GlobalPlace),
}

impl HarvestError {
    pub fn recovery(&self) -> Recovery {
        match self {
            HarvestError::Transport(_) => Recovery::Network,
            HarvestError::Extraction(_) | HarvestError::Logic(_) => Recovery::Parse,
            HarvestError::Store(_) => Recovery::Store,
        }
    }

    pub fn is_store(&self) -> bool {
        self.recovery() == Recovery::Store
    }
}
