mod cache;
mod config;
mod error;
mod models;
mod pipeline;
mod scraper;
mod storage;
#[cfg(test)]
mod testing;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::models::MatchRow;
use crate::pipeline::{Scheduler, TaskHandler};
use crate::scraper::SiteScraper;
use crate::storage::Repository;

#[derive(Parser)]
#[command(name = "gm-harvest", about = "Grandmaster leaderboard and match history harvester", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run the task loop until Ctrl-C
    Run,

    /// Run every configured task once, then exit
    Once,

    /// Show database statistics
    Stats {
        /// Print as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Write every stored match to a CSV file
    Export {
        #[arg(short, long, default_value = "matches.csv")]
        out: PathBuf,
    },

    /// Apply schema migrations without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "gm_harvest=info,warn",
        1 => "gm_harvest=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = AppConfig::load()?;

    match cli.command {
        Command::Run => {
            let _t = utils::Timer::start("Harvest loop");
            let mut scheduler = build_scheduler(&config)?;
            let cancel = CancellationToken::new();

            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, finishing up");
                    trigger.cancel();
                }
            });

            let stats = scheduler.run(&cancel).await;
            info!(
                "Done: {} tasks, {} failures, {} reconnects",
                stats.tasks_run, stats.failures, stats.reconnects
            );
        }

        Command::Once => {
            let _t = utils::Timer::start("Single pass");
            let mut scheduler = build_scheduler(&config)?;
            let stats = scheduler.run_pass(&CancellationToken::new()).await;
            info!("Done: {} tasks, {} failures", stats.tasks_run, stats.failures);
        }

        Command::Stats { json } => {
            let repo = open_repo(&config)?;
            let matches = repo.match_count()?;
            let players = repo.player_count()?;
            let (first, last) = repo.played_range()?;
            let regions = repo.region_counts()?;
            let top = repo.top_players(10)?;

            if json {
                let by_region: serde_json::Map<_, _> = regions
                    .iter()
                    .map(|(r, n)| (r.to_string(), json!(n)))
                    .collect();
                let report = json!({
                    "matches": matches,
                    "players": players,
                    "first_played": first,
                    "last_played": last,
                    "by_region": by_region,
                    "top_players": top,
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }

            println!("─────────────────────────────────");
            println!("  GM Harvest — Database Stats");
            println!("─────────────────────────────────");
            println!("  Matches  : {}", utils::fmt_number(matches));
            println!("  Players  : {}", utils::fmt_number(players));
            for (region, n) in &regions {
                println!("    {:<6} : {}", region, utils::fmt_number(*n));
            }
            println!("  From     : {}", utils::or_dash(first));
            println!("  To       : {}", utils::or_dash(last));
            println!("─────────────────────────────────");
            if !top.is_empty() {
                println!("  Top players by wins:");
                for p in &top {
                    println!(
                        "  {:>8}  {:<20} {:<3} {:>4}W {:>4}L  {:>5.1}%",
                        p.player_id,
                        p.name,
                        p.region,
                        p.wins,
                        p.losses,
                        utils::win_rate(p.wins, p.losses)
                    );
                }
                println!("─────────────────────────────────");
            }
        }

        Command::Export { out } => {
            let _t = utils::Timer::start("CSV export");
            let repo = open_repo(&config)?;
            let matches = repo.list_matches()?;

            let mut writer = csv::Writer::from_path(&out)
                .with_context(|| format!("Cannot create {}", out.display()))?;
            for record in &matches {
                writer.serialize(MatchRow::from(record))?;
            }
            writer.flush()?;
            info!("Wrote {} matches to {:?}", matches.len(), out);
        }

        Command::Migrate => {
            Repository::open(&config.storage.db_path)?.run_migrations()?;
            println!("Migrations applied.");
        }
    }

    Ok(())
}

fn open_repo(config: &AppConfig) -> Result<Repository> {
    let repo = Repository::open(&config.storage.db_path)
        .with_context(|| format!("Cannot open store at {}", config.storage.db_path.display()))?;
    if config.storage.run_migrations {
        repo.run_migrations()?;
    }
    Ok(repo)
}

fn build_scheduler(config: &AppConfig) -> Result<Scheduler<SiteScraper, Repository>> {
    let repo = open_repo(config)?;

    let scraper = SiteScraper::new(&config.scraper)?;
    let tasks = config.scheduler.task_list();
    info!("{} tasks configured against {}", tasks.len(), config.scraper.base_url);

    let mut scheduler = Scheduler::new(
        TaskHandler::new(scraper, repo),
        tasks,
        config.scheduler.clone(),
    );
    match scheduler.restore_cursors() {
        Ok(0) => {}
        Ok(n) => info!("Restored {} scan cursors", n),
        Err(e) => warn!("Could not restore scan cursors, starting from the seeds: {}", e),
    }
    Ok(scheduler)
}
