pub mod cleaner;
pub mod http_client;
pub mod parsers;

use crate::config::ScraperConfig;
use crate::error::TransportError;
use crate::models::{MatchId, PlayerId, Region};
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

use self::http_client::HttpClient;

const LEADERBOARD_PATH: &str = "Rankings";
const MATCH_HISTORY_PATH: &str = "Player/MatchHistory";
const MATCH_SUMMARY_PATH: &str = "Player/MatchSummaryContainer";

// ── Source trait ──────────────────────────────────────────────────────────────

/// The three pages the harvester reads. Returns raw HTML.
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_leaderboard(&self, region: Region) -> Result<String, TransportError>;
    async fn fetch_match_history(&self, player: PlayerId) -> Result<String, TransportError>;
    async fn fetch_match_summary(&self, match_id: MatchId) -> Result<String, TransportError>;
}

// ── Site scraper ──────────────────────────────────────────────────────────────

pub struct SiteScraper {
    client: HttpClient,
    base_url: Url,
    game_mode: String,
    league: String,
}

impl SiteScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        // Trailing slash so relative joins keep any base path.
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: Url::parse(&base)
                .with_context(|| format!("Invalid base url {:?}", config.base_url))?,
            game_mode: config.game_mode.clone(),
            league: config.league.clone(),
        })
    }

    fn page_url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, TransportError> {
        let mut url = self.base_url.join(path)?;
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        Ok(url)
    }

    /// e.g. /Rankings?Region=1&GameMode=4&League=Grandmaster
    pub fn leaderboard_url(&self, region: Region) -> Result<Url, TransportError> {
        self.page_url(
            LEADERBOARD_PATH,
            &[
                ("Region", region.code().to_string()),
                ("GameMode", self.game_mode.clone()),
                ("League", self.league.clone()),
            ],
        )
    }

    pub fn match_history_url(&self, player: PlayerId) -> Result<Url, TransportError> {
        self.page_url(MATCH_HISTORY_PATH, &[("PlayerID", player.to_string())])
    }

    pub fn match_summary_url(&self, match_id: MatchId) -> Result<Url, TransportError> {
        self.page_url(MATCH_SUMMARY_PATH, &[("ReplayID", match_id.to_string())])
    }
}

#[async_trait]
impl MatchSource for SiteScraper {
    async fn fetch_leaderboard(&self, region: Region) -> Result<String, TransportError> {
        let url = self.leaderboard_url(region)?;
        debug!("Fetching {} leaderboard", region);
        self.client.get_text(url).await
    }

    async fn fetch_match_history(&self, player: PlayerId) -> Result<String, TransportError> {
        let url = self.match_history_url(player)?;
        debug!("Fetching match history of player {}", player);
        self.client.get_text(url).await
    }

    async fn fetch_match_summary(&self, match_id: MatchId) -> Result<String, TransportError> {
        let url = self.match_summary_url(match_id)?;
        debug!("Fetching summary of match {}", match_id);
        self.client.get_text(url).await
    }
}
