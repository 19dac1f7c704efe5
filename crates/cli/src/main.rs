//! calsync CLI — the main entry point.
//!
//! Commands:
//! - `process`  — Analyze new feed posts and sync events to the calendar
//! - `history`  — Show recent decisions
//! - `details`  — Show every stored decision for one post
//! - `reset`    — Forget one post, or all of them
//! - `report`   — Write a static HTML report
//! - `validate` — Check calendar credentials and permissions

use clap::{Parser, Subcommand};

mod commands;
mod report;
mod wiring;

#[derive(Parser)]
#[command(
    name = "calsync",
    about = "calsync — sync event announcements from an RSS feed into a calendar",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Process new posts from the RSS feed
    Process {
        /// Feed URL (defaults to feed.url from the config)
        #[arg(short, long)]
        feed: Option<String>,

        /// Analyze and record decisions without touching the calendar
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Maximum number of posts to process
        #[arg(short, long)]
        limit: Option<usize>,

        /// Number of posts analyzed at once
        #[arg(short, long, default_value_t = 1)]
        concurrency: usize,

        /// Send every post to the full analysis
        #[arg(long)]
        skip_prefilter: bool,
    },

    /// Show recent processing history
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Show full details for a processed post
    Details {
        /// Post id to look up
        post_id: String,
    },

    /// Reset processing history for one post, or all posts
    Reset {
        /// Post id to reset (omit to clear all history)
        post_id: Option<String>,

        /// Do not ask for confirmation before clearing everything
        #[arg(short, long)]
        yes: bool,
    },

    /// Generate a static HTML report of processing history
    Report {
        #[arg(short, long, default_value = "report.html")]
        output: std::path::PathBuf,

        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },

    /// Validate Google Calendar access
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Process {
            feed,
            dry_run,
            limit,
            concurrency,
            skip_prefilter,
        } => {
            let options = commands::process::ProcessOptions {
                feed,
                dry_run,
                limit,
                concurrency,
                skip_prefilter,
            };
            commands::process::run(options).await?
        }
        Commands::History { limit } => commands::history::run(limit).await?,
        Commands::Details { post_id } => commands::details::run(&post_id).await?,
        Commands::Reset { post_id, yes } => commands::reset::run(post_id.as_deref(), yes).await?,
        Commands::Report { output, limit } => commands::report::run(&output, limit).await?,
        Commands::Validate => commands::validate::run().await?,
    }

    Ok(())
}
