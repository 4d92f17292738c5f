use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use humansize::{format_size, BINARY};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use ftp_sync::config::{Config, SyncPair};
use ftp_sync::sync::{
    BatchReport, Direction, Outcome, PairStatus, PatcherRegistry, RunMode, Runner, SyncDecision,
};

#[derive(Parser)]
#[command(name = "ftp-sync")]
#[command(about = "Keep local files in sync with copies on an FTP server", long_about = None)]
struct Cli {
    /// Config file (YAML, JSON or TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Give up on a pair after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Maximum pairs synced at once
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync one pair, picking the direction from what changed
    Sync {
        #[arg(short, long)]
        name: String,
    },
    /// Sync every pair
    SyncAll,
    /// Push one pair's local file to the remote, whatever changed
    SyncTo {
        #[arg(short, long)]
        name: String,
    },
    /// Pull one pair's remote file over the local one, whatever changed
    SyncFrom {
        #[arg(short, long)]
        name: String,
    },
    /// Push every pair
    SyncAllTo,
    /// Pull every pair
    SyncAllFrom,
    /// Show what a sync would do, without writing anything
    Status {
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List configured pairs
    List,
    /// Forget a pair's last-sync record
    Reset {
        #[arg(short, long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let patchers = PatcherRegistry::with_builtins();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(&config_path, &patchers)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs.max(1);
    }
    if let Some(secs) = cli.timeout {
        config.timeout = Some(Duration::from_secs(secs));
    }

    if let Commands::List = cli.command {
        list_pairs(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let runner = Runner::from_config(&config, patchers).context("Failed to open state directory")?;
    if let Commands::Reset { name } = &cli.command {
        runner.engine().reset(config.pair(name)?).await?;
        println!("{} {}  record cleared", "=".cyan(), name.bold());
        return Ok(ExitCode::SUCCESS);
    }

    let (pairs, mode) = select(&config, &cli.command)?;
    let report = runner.run_all(&pairs, mode).await;
    runner.close().await;
    print_report(&report);

    Ok(if report.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Map a subcommand to the pairs it covers and how to run them.
fn select(config: &Config, command: &Commands) -> Result<(Vec<SyncPair>, RunMode)> {
    let one = |name: &str| -> Result<Vec<SyncPair>> { Ok(vec![config.pair(name)?.clone()]) };
    let all = config.pairs.clone();
    Ok(match command {
        Commands::Sync { name } => (one(name.as_str())?, RunMode::Auto),
        Commands::SyncAll => (all, RunMode::Auto),
        Commands::SyncTo { name } => (one(name.as_str())?, RunMode::Forced(Direction::LocalToRemote)),
        Commands::SyncFrom { name } => (one(name.as_str())?, RunMode::Forced(Direction::RemoteToLocal)),
        Commands::SyncAllTo => (all, RunMode::Forced(Direction::LocalToRemote)),
        Commands::SyncAllFrom => (all, RunMode::Forced(Direction::RemoteToLocal)),
        Commands::Status { name: Some(name) } => (one(name.as_str())?, RunMode::Plan),
        Commands::Status { name: None } => (all, RunMode::Plan),
        Commands::List | Commands::Reset { .. } => (Vec::new(), RunMode::Plan),
    })
}

fn list_pairs(config: &Config) {
    for pair in &config.pairs {
        println!(
            "{}  {} <-> {}:{}  (patcher: {})",
            pair.name.bold(),
            pair.local.display(),
            pair.connection,
            pair.remote,
            pair.patcher.as_deref().unwrap_or("none")
        );
    }
}

fn print_report(report: &BatchReport) {
    for entry in &report.reports {
        let line = match &entry.result {
            Ok(PairStatus::Outcome(Outcome::Synced(transfer))) => format!(
                "{} {}  {} ({})",
                "✓".green(),
                entry.pair.bold(),
                transfer.direction,
                format_size(transfer.bytes, BINARY)
            ),
            Ok(PairStatus::Outcome(Outcome::Skipped)) => {
                format!("{} {}  up to date", "=".cyan(), entry.pair.bold())
            }
            Ok(PairStatus::Planned(decision @ SyncDecision::Conflict(_))) => {
                format!("{} {}  {}", "!".yellow(), entry.pair.bold(), decision)
            }
            Ok(PairStatus::Planned(decision)) => {
                format!("{} {}  {}", "?".cyan(), entry.pair.bold(), decision)
            }
            Err(e) => format!(
                "{} {}  [{}] {}",
                "✗".red(),
                entry.pair.bold(),
                e.kind().name(),
                e
            ),
        };
        println!("{}", line);
    }
    let failed = report.failed();
    if failed > 0 {
        eprintln!("{}", format!("{} of {} pairs failed", failed, report.reports.len()).red());
    }
}
