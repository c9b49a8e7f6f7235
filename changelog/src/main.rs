//! V8 Changelog CLI Entry Point
//!
//! Seeds and queries the release cache. Every command prints JSON to stdout
//! and commits the store before exiting; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use clog_store::Backend;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use v8_clog::{ChangeLog, ClogConfig, Milestone, ReleaseRef};

#[derive(Parser)]
#[command(name = "v8-clog")]
#[command(about = "V8 release, feature and commit changelog")]
#[command(version)]
struct Args {
    /// JSON configuration file; flags override its values
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Storage backend (json or kv)
    #[arg(long, env = "CLOG_BACKEND")]
    backend: Option<Backend>,

    /// Directory holding the collections
    #[arg(long, env = "CLOG_DATA_DIR")]
    data_dir: Option<String>,

    /// Read commits from a local V8 clone instead of gitiles
    #[arg(long, env = "CLOG_GIT_DIR")]
    git_dir: Option<PathBuf>,

    /// Only count commits touching the public API headers
    #[arg(long)]
    api_only: bool,

    /// Concurrent commit log requests per wave
    #[arg(long, env = "CLOG_FAN_OUT")]
    fan_out: Option<usize>,

    /// Earliest milestone tracked
    #[arg(long)]
    floor: Option<Milestone>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store the latest release, then backfill from the floor to a few
    /// milestones past it
    Seed {
        /// Milestones past the current stable one to include
        #[arg(long, default_value_t = 3)]
        ahead: Milestone,
    },
    /// The current stable release
    Latest,
    /// One release by milestone (114) or version (11.4)
    Release {
        id: ReleaseRef,
        /// Stable date to use when the release is not stored yet
        #[arg(long)]
        stable_date: Option<String>,
        /// Attach features and changes
        #[arg(long)]
        full: bool,
    },
    /// Releases in a range, without features or changes
    Range {
        start: ReleaseRef,
        end: Option<ReleaseRef>,
    },
    /// Fully populated releases in a range, fetching what is missing
    Backfill {
        start: ReleaseRef,
        end: Option<ReleaseRef>,
    },
    /// Every tag with its milestones
    Tags,
    /// Releases carrying a tag
    Tag { name: String },
}

impl Args {
    fn load_config(&self) -> anyhow::Result<ClogConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => ClogConfig::default(),
        };

        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(dir) = &self.data_dir {
            config.data_prefix = format!("{}/", dir.trim_end_matches('/'));
        }
        if let Some(git_dir) = &self.git_dir {
            config.git_dir = Some(git_dir.clone());
        }
        if self.api_only {
            config.path_filter = Some("include/".to_string());
        }
        if let Some(fan_out) = self.fan_out {
            config.fan_out = fan_out;
        }
        if let Some(floor) = self.floor {
            config.floor = floor;
        }

        Ok(config)
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = args.load_config()?;
    let changelog = ChangeLog::from_config(&config)
        .await
        .context("Failed to open changelog")?;

    match args.command {
        Command::Seed { ahead } => {
            let latest = changelog.get_latest().await?;
            tracing::info!("Latest stable release is {}", latest.version);

            let releases = changelog
                .get_all_data(config.floor, Some(latest.milestone + ahead))
                .await?;
            tracing::info!("Seeded {} releases", releases.len());

            let metas: Vec<_> = releases.iter().map(|r| r.meta()).collect();
            print_json(&metas)?;
        }
        Command::Latest => print_json(&changelog.get_latest().await?)?,
        Command::Release {
            id,
            stable_date,
            full,
        } => {
            let mut release = changelog.get_release(id, stable_date).await?;
            if full {
                changelog.resolve(&mut release).await?;
            }
            print_json(&release)?;
        }
        Command::Range { start, end } => {
            let releases = changelog
                .get_range(start.milestone(), end.map(ReleaseRef::milestone))
                .await?;
            print_json(&releases)?;
        }
        Command::Backfill { start, end } => {
            let releases = changelog
                .get_all_data(start.milestone(), end.map(ReleaseRef::milestone))
                .await?;
            print_json(&releases)?;
        }
        Command::Tags => print_json(&changelog.get_tags().await?)?,
        Command::Tag { name } => print_json(&changelog.get_by_tag(&name).await?)?,
    }

    changelog.commit().await.context("Failed to commit store")?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "v8_clog=info,clog_store=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(args).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
