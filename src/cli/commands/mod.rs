//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod feed;
mod helpers;
mod history;
mod init;
mod jobs;
mod search;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "umrahfare")]
#[command(about = "Umrah hotel, flight and package price aggregator")]
#[command(version)]
pub struct Cli {
    /// Data directory (holds the database and umrahfare.toml)
    #[arg(long, short = 'd', global = true)]
    data_dir: Option<PathBuf>,

    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, database and a starter config
    Init,

    /// Search every configured source for offers
    Search(SearchArgs),

    /// Offers for one hotel or package, grouped by source
    Compare {
        /// Hotel or package name
        name: String,
        /// City to search in
        #[arg(long, default_value = "Makkah")]
        city: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Price history of a stored offer
    History {
        /// Offer ID
        offer_id: String,
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Partner price feeds
    Feed {
        #[command(subcommand)]
        command: FeedCommands,
    },

    /// Scheduled refresh jobs
    Jobs {
        #[command(subcommand)]
        command: JobCommands,
    },

    /// Run the job scheduler until interrupted
    Daemon {
        /// Run every job once at startup
        #[arg(long)]
        run_now: bool,
    },
}

#[derive(clap::Args)]
pub struct SearchArgs {
    /// City (Makkah or Madinah; aliases like "Mecca" are accepted)
    #[arg(long)]
    pub city: Option<String>,
    /// Offer kind: hotel, flight or package
    #[arg(long)]
    pub kind: Option<String>,
    /// Check-in date (YYYY-MM-DD)
    #[arg(long)]
    pub check_in: Option<NaiveDate>,
    /// Check-out date (YYYY-MM-DD)
    #[arg(long)]
    pub check_out: Option<NaiveDate>,
    /// Minimum price in IDR
    #[arg(long)]
    pub min_price: Option<f64>,
    /// Maximum price in IDR
    #[arg(long)]
    pub max_price: Option<f64>,
    /// Minimum star rating
    #[arg(long)]
    pub min_stars: Option<u8>,
    /// Only query these sources (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<String>,
    /// Sort by: price, stars, distance or updated
    #[arg(long, default_value = "price")]
    pub sort: String,
    /// Maximum offers to return
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
    /// Skip caches and query every source
    #[arg(long)]
    pub refresh: bool,
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum FeedCommands {
    /// Submit a feed from a JSON file
    Submit {
        /// Partner ID
        #[arg(long)]
        partner: String,
        /// JSON file with the feed request
        file: PathBuf,
    },
    /// Replace a pending feed from a JSON file
    Update {
        #[arg(long)]
        partner: String,
        feed_id: String,
        file: PathBuf,
    },
    /// Delete a pending feed
    Delete {
        #[arg(long)]
        partner: String,
        feed_id: String,
    },
    /// List a partner's feeds
    List {
        #[arg(long)]
        partner: String,
        /// Filter by status: pending, approved or rejected
        #[arg(long)]
        status: Option<String>,
    },
    /// Feeds awaiting review
    Pending {
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Approve a pending feed
    Approve {
        /// Admin ID
        #[arg(long)]
        admin: String,
        feed_id: String,
    },
    /// Reject a pending feed
    Reject {
        #[arg(long)]
        admin: String,
        feed_id: String,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List jobs and their schedules
    List {
        #[arg(long)]
        json: bool,
    },
    /// Run a job now
    Run {
        /// Job name (api_refresh, ota_scraping, partner_sync, cache_cleanup, history_snapshot)
        name: String,
    },
}

/// Parse arguments, load configuration and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
        use_cwd: cli.cwd,
    };
    let (settings, config) = load_settings_with_options(options)?;
    tracing::debug!(
        "Config {} loaded, database {}",
        &config.hash()[..12],
        settings.database_path.display()
    );

    match cli.command {
        Commands::Init => init::cmd_init(&settings, &config).await,
        Commands::Search(args) => search::cmd_search(&settings, &config, args).await,
        Commands::Compare { name, city, json } => {
            search::cmd_compare(&settings, &config, &name, &city, json).await
        }
        Commands::History {
            offer_id,
            limit,
            json,
        } => history::cmd_history(&settings, &config, &offer_id, limit, json).await,
        Commands::Feed { command } => match command {
            FeedCommands::Submit { partner, file } => {
                feed::cmd_feed_submit(&settings, &config, &partner, &file).await
            }
            FeedCommands::Update {
                partner,
                feed_id,
                file,
            } => feed::cmd_feed_update(&settings, &config, &partner, &feed_id, &file).await,
            FeedCommands::Delete { partner, feed_id } => {
                feed::cmd_feed_delete(&settings, &config, &partner, &feed_id).await
            }
            FeedCommands::List { partner, status } => {
                feed::cmd_feed_list(&settings, &config, &partner, status.as_deref()).await
            }
            FeedCommands::Pending { limit } => {
                feed::cmd_feed_pending(&settings, &config, limit).await
            }
            FeedCommands::Approve { admin, feed_id } => {
                feed::cmd_feed_approve(&settings, &config, &admin, &feed_id).await
            }
            FeedCommands::Reject {
                admin,
                feed_id,
                reason,
            } => feed::cmd_feed_reject(&settings, &config, &admin, &feed_id, &reason).await,
        },
        Commands::Jobs { command } => match command {
            JobCommands::List { json } => jobs::cmd_jobs_list(&settings, &config, json).await,
            JobCommands::Run { name } => jobs::cmd_jobs_run(&settings, &config, &name).await,
        },
        Commands::Daemon { run_now } => jobs::cmd_daemon(&settings, &config, run_now).await,
    }
}
