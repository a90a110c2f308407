use crate::models::{Region, Task, TaskSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_accept_language")]
    pub accept_language: String,

    /// `GameMode` query value of the leaderboard page.
    #[serde(default = "default_game_mode")]
    pub game_mode: String,

    #[serde(default = "default_league")]
    pub league: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Scheduler loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    /// Pause after every task.
    #[serde(default = "default_task_delay_ms")]
    pub task_delay_ms: u64,

    /// Pause after a network or extraction failure.
    #[serde(default = "default_error_delay_ms")]
    pub error_delay_ms: u64,

    /// Pause after a store failure, before reconnecting.
    #[serde(default = "default_store_error_delay_ms")]
    pub store_error_delay_ms: u64,

    /// Interval between reconnect attempts.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_tasks")]
    pub tasks: Vec<TaskSpec>,
}

impl SchedulerConfig {
    pub fn task_delay(&self) -> Duration {
        Duration::from_millis(self.task_delay_ms)
    }
    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }
    pub fn store_error_delay(&self) -> Duration {
        Duration::from_millis(self.store_error_delay_ms)
    }

    pub fn task_list(&self) -> Vec<Task> {
        self.tasks.iter().map(Task::from).collect()
    }
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://www.hotslogs.com".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_user_agent() -> String {
    "gm-harvest/0.1 (grandmaster leaderboard and match history archiver)".to_string()
}
fn default_accept_language() -> String {
    "en-US,en".to_string()
}
fn default_game_mode() -> String {
    "4".to_string()
}
fn default_league() -> String {
    "Grandmaster".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/harvest.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_task_delay_ms() -> u64 {
    3_000
}
fn default_error_delay_ms() -> u64 {
    10_000
}
fn default_store_error_delay_ms() -> u64 {
    60_000
}
fn default_reconnect_delay_ms() -> u64 {
    15_000
}
/// Seed both leaderboards, then four history scans per region, each walking
/// from its own starting rank, alternating between regions.
fn default_tasks() -> Vec<TaskSpec> {
    let mut tasks: Vec<TaskSpec> = Region::ALL
        .iter()
        .map(|&region| TaskSpec::FetchGrandmasters { region })
        .collect();
    for rank in [0, 25, 50, 75] {
        tasks.extend(
            Region::ALL
                .iter()
                .map(|&region| TaskSpec::FetchLastMatch { region, rank }),
        );
    }
    tasks
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            jitter_ms: default_jitter_ms(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
            game_mode: default_game_mode(),
            league: default_league(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            task_delay_ms: default_task_delay_ms(),
            error_delay_ms: default_error_delay_ms(),
            store_error_delay_ms: default_store_error_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            tasks: default_tasks(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from file + environment overrides
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("HARVEST").separator("__"))
            .build()?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;

        if app_cfg.scheduler.tasks.is_empty() {
            anyhow::bail!("scheduler.tasks is empty; nothing to do");
        }
        Ok(app_cfg)
    }
}
