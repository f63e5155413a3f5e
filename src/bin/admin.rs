//! CLI administration tool for linkcache.
//!
//! Operates directly on the configured stores, without going through the
//! HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Run one click flush cycle now
//! cargo run --bin admin -- flush
//!
//! # Show the durable record for a code
//! cargo run --bin admin -- link c1c1c1c
//!
//! # Check database connection
//! cargo run --bin admin -- db check
//! ```
//!
//! # Environment Variables
//!
//! Same as the server; see [`linkcache::config`].

use linkcache::config::{self, Config};
use linkcache::domain::click_flusher::ClickFlusher;
use linkcache::domain::repositories::LinkRepository;
use linkcache::infrastructure::cache::RedisCache;
use linkcache::infrastructure::persistence::PgLinkRepository;
use linkcache::server::connect_database;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;

/// CLI tool for managing linkcache.
#[derive(Parser)]
#[command(name = "admin")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
enum Commands {
    /// Move volatile click counters into the database once
    Flush,

    /// Show a stored link
    Link {
        /// Short code to look up
        code: String,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Database operation subcommands.
#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = config::load_from_env()?;

    let pool = connect_database(&config).await?;
    let links = Arc::new(PgLinkRepository::new(Arc::new(pool)));

    match cli.command {
        Commands::Flush => handle_flush(&config, links).await?,
        Commands::Link { code } => handle_link(links, &code).await?,
        Commands::Db { action } => handle_db_action(action, links).await?,
    }

    Ok(())
}

/// Runs a single flush cycle and prints its report.
async fn handle_flush(config: &Config, links: Arc<PgLinkRepository>) -> Result<()> {
    println!("{}", "Flushing click counters...".bright_blue().bold());

    let Some(cache) = connect_flush_cache(config).await? else {
        println!(
            "{}",
            "  Redis is not configured; counters live in the server process only".yellow()
        );
        return Ok(());
    };

    let flusher = ClickFlusher::new(Arc::new(cache), links, config.flusher_settings());
    let report = flusher.flush_once().await;

    println!();
    println!(
        "  Keys scanned:   {}",
        report.keys_scanned.to_string().bright_white()
    );
    println!(
        "  Keys flushed:   {}",
        report.keys_flushed.to_string().bright_green().bold()
    );
    println!(
        "  Clicks flushed: {}",
        report.clicks_flushed.to_string().bright_green().bold()
    );

    if report.keys_lost > 0 {
        println!(
            "  Clicks lost:    {} {}",
            report.clicks_lost.to_string().red().bold(),
            format!("({} keys)", report.keys_lost).bright_black()
        );
    }

    if report.keys_uncertain > 0 {
        println!(
            "  Uncertain:      {} {}",
            report.keys_uncertain.to_string().yellow().bold(),
            "(extraction timed out)".bright_black()
        );
    }

    if report.aborted {
        println!();
        println!("{}", "Scan aborted, cache unreachable".red().bold());
    }

    println!();
    Ok(())
}

/// Connects to the configured Redis instance.
///
/// Returns `Ok(None)` when Redis is not configured. Unlike the server, an
/// unreachable Redis is an error here.
async fn connect_flush_cache(config: &Config) -> Result<Option<RedisCache>> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        return Ok(None);
    };

    let cache = RedisCache::connect(redis_url, config.cache_ttl_seconds)
        .await
        .map_err(|e| anyhow::anyhow!("Redis connection failed: {}", e))?;

    Ok(Some(cache))
}

/// Prints the durable record for `code`.
async fn handle_link(links: Arc<PgLinkRepository>, code: &str) -> Result<()> {
    let link = links
        .find_by_code(code)
        .await
        .map_err(|e| anyhow::anyhow!("Database error: {}", e))?
        .with_context(|| format!("No link with code '{}'", code))?;

    let expiry = if link.is_expired() {
        "expired".red()
    } else {
        "active".green()
    };

    println!("{}", "Link".bright_blue().bold());
    println!();
    println!("  Code:    {}", link.code.cyan());
    println!("  Target:  {}", link.target_url.bright_white());
    println!(
        "  Created: {}",
        link.created_at.format("%Y-%m-%d %H:%M").to_string().bright_black()
    );
    println!(
        "  Expires: {} ({})",
        link.expires_at.format("%Y-%m-%d %H:%M").to_string().bright_black(),
        expiry
    );
    println!(
        "  Clicks:  {}",
        link.click_count.to_string().bright_green().bold()
    );
    println!();

    Ok(())
}

/// Handles database diagnostic commands.
async fn handle_db_action(action: DbAction, links: Arc<PgLinkRepository>) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "Checking database connection...".bright_blue());

            links
                .ping()
                .await
                .map_err(|e| anyhow::anyhow!("Database check failed: {}", e))?;

            println!("{}", "Database connection OK".green().bold());
        }
    }

    Ok(())
}
