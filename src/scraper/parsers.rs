//! HTML → domain record extraction.
//!
//! Everything here is tied to the site's grid markup: row classes, positional
//! row ids and fixed column offsets. When the layout changes these constants
//! are the place to look first.

use crate::error::ExtractionError;
use crate::models::{MatchId, MatchRecord, PlayerId, PlayerRef, Region};
use chrono::NaiveDateTime;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::cleaner::{normalise_text, parse_cell_int, parse_played_at, player_id_from_href};

// ── Markup constants ──────────────────────────────────────────────────────────

pub const LEADERBOARD_ROWS: &str = "tr.rgRow, tr.rgAltRow";
pub const LEADERBOARD_PLAYER_COLUMN: usize = 2;

pub const HISTORY_MATCH_ID_COLUMN: usize = 0;
pub const HISTORY_PLAYED_AT_COLUMN: usize = 7;

pub const SCOREBOARD_ROWS: &str = "table.scoreboard > tbody > tr";
pub const SCOREBOARD_PLAYER_COLUMN: usize = 2;
pub const SCOREBOARD_SCORE_COLUMN: usize = 4;
pub const TEAM_SIZE: usize = 5;
/// Two teams plus the separator row between them.
pub const SCOREBOARD_MIN_ROWS: usize = TEAM_SIZE * 2 + 1;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn selector(s: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(s).map_err(|e| ExtractionError::Selector(format!("{s}: {e:?}")))
}

/// Direct `<td>` children of a row, so nested tables don't shift offsets.
fn cells<'a>(row: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect()
}

fn cell<'a>(
    cells: &[ElementRef<'a>],
    what: &'static str,
    row: usize,
    column: usize,
) -> Result<ElementRef<'a>, ExtractionError> {
    cells
        .get(column)
        .copied()
        .ok_or(ExtractionError::MissingCell { what, row, column })
}

fn text_of(el: ElementRef<'_>) -> String {
    normalise_text(&el.text().collect::<String>())
}

/// First profile link inside a cell: (player id, link text).
fn player_link(
    cell: ElementRef<'_>,
    what: &'static str,
    row: usize,
) -> Result<(PlayerId, String), ExtractionError> {
    let a_sel = selector("a[href]")?;
    cell.select(&a_sel)
        .find_map(|a| {
            let id = a.value().attr("href").and_then(player_id_from_href)?;
            Some((PlayerId(id), text_of(a)))
        })
        .ok_or(ExtractionError::MissingPlayerLink { what, row })
}

// ── Leaderboard page ──────────────────────────────────────────────────────────

/// Player ids in rank order, one per leaderboard row.
pub fn extract_leaderboard(html: &str) -> Result<Vec<PlayerId>, ExtractionError> {
    let doc = Html::parse_document(html);
    let row_sel = selector(LEADERBOARD_ROWS)?;

    let mut ids = Vec::new();
    for (i, tr) in doc.select(&row_sel).enumerate() {
        let tds = cells(tr);
        let td = cell(&tds, "leaderboard", i, LEADERBOARD_PLAYER_COLUMN)?;
        let (id, _name) = player_link(td, "leaderboard", i)?;
        ids.push(id);
    }

    if ids.is_empty() {
        return Err(ExtractionError::MissingMarker("leaderboard row"));
    }

    debug!("leaderboard: {} players", ids.len());
    Ok(ids)
}

// ── Match history page ────────────────────────────────────────────────────────

/// Match id and timestamp of the `cursor_index`-th history row (0 = newest).
pub fn extract_last_match(
    html: &str,
    cursor_index: usize,
) -> Result<(MatchId, NaiveDateTime), ExtractionError> {
    let doc = Html::parse_document(html);
    // Grid rows carry ids ending in "__<n>".
    let row_sel = selector(&format!("tr[id$=\"__{cursor_index}\"]"))?;

    let tr = doc
        .select(&row_sel)
        .next()
        .ok_or(ExtractionError::MissingMarker("match history row"))?;
    let tds = cells(tr);

    let id_cell = cell(&tds, "history", cursor_index, HISTORY_MATCH_ID_COLUMN)?;
    let when_cell = cell(&tds, "history", cursor_index, HISTORY_PLAYED_AT_COLUMN)?;

    let match_id = MatchId(parse_cell_int(&text_of(id_cell))?);
    let played_at = parse_played_at(&text_of(when_cell))?;

    Ok((match_id, played_at))
}

// ── Match summary page ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ScoredPlayer {
    score: i64,
    name: String,
    id: PlayerId,
}

fn scored_player(tr: ElementRef<'_>, row: usize) -> Result<ScoredPlayer, ExtractionError> {
    let tds = cells(tr);
    let player_td = cell(&tds, "scoreboard", row, SCOREBOARD_PLAYER_COLUMN)?;
    let score_td = cell(&tds, "scoreboard", row, SCOREBOARD_SCORE_COLUMN)?;

    let (id, name) = player_link(player_td, "scoreboard", row)?;
    let score = parse_cell_int(&text_of(score_td))?;
    Ok(ScoredPlayer { score, name, id })
}

/// Build the match record from the scoreboard.
///
/// The page does not say which team won. The tracked statistic is monotonic
/// with the outcome for the two boundary players, so the ten players are
/// sorted by (score, name) and the lowest is taken as the loser, the highest
/// as the winner. Revisit if the scoreboard columns move.
pub fn extract_match_summary(
    html: &str,
    match_id: MatchId,
    region: Region,
    played_at: NaiveDateTime,
) -> Result<MatchRecord, ExtractionError> {
    let doc = Html::parse_document(html);
    let row_sel = selector(SCOREBOARD_ROWS)?;

    let rows: Vec<ElementRef<'_>> = doc.select(&row_sel).collect();
    if rows.is_empty() {
        return Err(ExtractionError::MissingMarker("scoreboard"));
    }
    if rows.len() < SCOREBOARD_MIN_ROWS {
        return Err(ExtractionError::ShortScoreboard {
            found: rows.len(),
            expected: SCOREBOARD_MIN_ROWS,
        });
    }

    let first_team = 0..TEAM_SIZE;
    let second_team = TEAM_SIZE + 1..SCOREBOARD_MIN_ROWS;

    let mut players = first_team
        .chain(second_team)
        .map(|i| scored_player(rows[i], i))
        .collect::<Result<Vec<_>, _>>()?;
    players.sort();

    let (Some(loser), Some(winner)) = (players.first(), players.last()) else {
        return Err(ExtractionError::MissingMarker("scoreboard player"));
    };
    if winner.id == loser.id {
        return Err(ExtractionError::SamePlayer(winner.id.0));
    }

    debug!(
        "match {}: {} ({}) beat {} ({})",
        match_id, winner.name, winner.score, loser.name, loser.score
    );

    Ok(MatchRecord {
        match_id,
        played_at,
        winner: PlayerRef { id: winner.id, name: winner.name.clone() },
        loser: PlayerRef { id: loser.id, name: loser.name.clone() },
        region,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
