//! agriai - classify crop and weed images from the command line
//!
//! Scans are kept in a short-lived local log: every history entry and report
//! expires after the configured TTL (two minutes by default).
//!
//! Uses XDG Base Directory specification for file locations:
//! - Store: $XDG_DATA_HOME/agriai/store.db (~/.local/share/agriai/store.db)
//! - Config: $XDG_CONFIG_HOME/agriai/config.toml (~/.config/agriai/config.toml)
//! - Logs: $XDG_STATE_HOME/agriai/ (~/.local/state/agriai/)

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use agriai_core::export::export_report;
use agriai_core::format::{expires_in, format_countdown, format_relative_time};
use agriai_core::retention::Sweep;
use agriai_core::{
    Classifier, Clock, Config, GeminiService, HistoryEntry, HistoryFeed, ImagePayload,
    ReportEntry, ReportFeed, ScanPipeline, SqliteStore, Sweeper, SystemClock,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "agriai")]
#[command(about = "Classify crops and weeds with a short-lived local scan log")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify an image file and record the result
    Scan {
        /// Image to classify (jpg, png, webp, heic)
        image: PathBuf,

        /// Print the recorded report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent scans
    History {
        /// Delete the whole scan history
        #[arg(long)]
        clear: bool,

        /// Skip the confirmation prompt when clearing
        #[arg(short, long, requires = "clear")]
        yes: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List analysis reports
    Reports {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one report in full
    Show {
        /// Report id, or its last six characters
        id: String,
    },

    /// Export a report to a Markdown document
    Export {
        /// Report id, or its last six characters
        id: String,

        /// Output directory (default: from config, else the current directory)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Purge expired entries from the local store
    Sweep,

    /// Keep sweeping in the background and print feed changes
    Watch {
        /// Stop after this many seconds (default: until Ctrl-C)
        #[arg(short, long)]
        duration: Option<u64>,
    },
}

/// Feeds opened against the local store
struct Feeds {
    store: Arc<SqliteStore>,
    history: Arc<HistoryFeed>,
    reports: Arc<ReportFeed>,
    clock: Arc<dyn Clock>,
}

impl Feeds {
    fn open(config: &Config) -> Result<Self> {
        let store_path = Config::store_path();
        tracing::debug!(path = %store_path.display(), "Opening store");
        let store = SqliteStore::open(&store_path, config.retention.storage_quota_bytes)
            .with_context(|| format!("failed to open store at {}", store_path.display()))?;
        let store = Arc::new(store);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Ok(Self {
            history: Arc::new(HistoryFeed::open(
                store.clone(),
                clock.clone(),
                &config.retention,
            )),
            reports: Arc::new(ReportFeed::open(
                store.clone(),
                clock.clone(),
                &config.retention,
            )),
            store,
            clock,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard =
        agriai_core::logging::init(&config.logging).context("failed to initialize logging")?;

    let feeds = Feeds::open(&config)?;

    match args.command {
        Command::Scan { image, json } => cmd_scan(&config, feeds, &image, json).await,
        Command::History { clear, yes, json } => {
            if clear {
                cmd_clear_history(&feeds, yes)
            } else {
                cmd_history(&config, &feeds, json)
            }
        }
        Command::Reports { json } => cmd_reports(&config, &feeds, json),
        Command::Show { id } => cmd_show(&config, &feeds, &id),
        Command::Export { id, out } => cmd_export(&config, &feeds, &id, out),
        Command::Sweep => cmd_sweep(&feeds),
        Command::Watch { duration } => cmd_watch(&config, feeds, duration).await,
    }
}

async fn cmd_scan(config: &Config, feeds: Feeds, image: &Path, json: bool) -> Result<()> {
    let payload = ImagePayload::from_path(image)
        .with_context(|| format!("failed to read image {}", image.display()))?;

    let service =
        GeminiService::new(&config.classifier).context("classifier is not configured")?;
    let pipeline = ScanPipeline::new(
        Classifier::new(Arc::new(service)),
        feeds.history,
        feeds.reports,
        feeds.clock,
    );

    println!("Analyzing {}...", image.display());
    let outcome = pipeline.scan(&payload).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
        return Ok(());
    }

    let verdict = &outcome.verdict;
    println!();
    println!(
        "Classification:  {} ({}% confidence)",
        verdict.classification, verdict.confidence
    );
    if let Some(type_name) = &verdict.type_name {
        println!("Type:            {}", type_name);
    }
    println!();
    println!("{}", verdict.summary.as_deref().unwrap_or(&verdict.explanation));

    if !verdict.solutions.is_empty() {
        println!();
        println!("Solutions:");
        for solution in &verdict.solutions {
            println!("  - {}", solution);
        }
    }
    if !verdict.drone_actions.is_empty() {
        println!();
        println!("Drone actions:");
        for action in &verdict.drone_actions {
            println!("  - {}", action);
        }
    }

    // Appends never fail loudly; reload from the store to see what landed
    let saved = pipeline
        .reports()
        .load_and_prune()
        .iter()
        .any(|r| r.id == outcome.report.id);

    println!();
    if saved {
        println!(
            "Report #{} saved (expires in {})",
            outcome.report.short_id(),
            format_countdown(config.retention.ttl())
        );
    } else {
        eprintln!(
            "Warning: report #{} could not be saved to the local store (see logs in {})",
            outcome.report.short_id(),
            Config::state_dir().display()
        );
    }

    Ok(())
}

fn cmd_history(config: &Config, feeds: &Feeds, json: bool) -> Result<()> {
    let entries = feeds.history.entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No scans in history.");
        return Ok(());
    }

    println!("Recent scans ({}):", entries.len());
    let now = feeds.clock.now();
    for entry in &entries {
        print_history_row(entry, config.retention.ttl(), now);
    }

    Ok(())
}

fn print_history_row(entry: &HistoryEntry, ttl: Duration, now: chrono::DateTime<chrono::Utc>) {
    println!(
        "  {:<8} {:>3}%  {:<10} expires in {}  {}",
        entry.verdict.classification.as_str(),
        entry.verdict.confidence,
        format_relative_time(entry.timestamp, now),
        format_countdown(expires_in(entry.timestamp, ttl, now)),
        entry.verdict.type_name.as_deref().unwrap_or("")
    );
}

fn cmd_clear_history(feeds: &Feeds, yes: bool) -> Result<()> {
    if !yes && !confirm("Clear all scan history? [y/N] ")? {
        println!("Cancelled.");
        return Ok(());
    }

    feeds.history.clear();
    println!("Scan history cleared.");
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed to read confirmation")?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes" | "YES"))
}

fn cmd_reports(config: &Config, feeds: &Feeds, json: bool) -> Result<()> {
    let reports = feeds.reports.entries();

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if reports.is_empty() {
        println!("No reports yet. Scan an image to generate one.");
        return Ok(());
    }

    println!("Reports ({}):", reports.len());
    let now = feeds.clock.now();
    for report in &reports {
        print_report_row(report, config.retention.ttl(), now);
    }

    Ok(())
}

fn print_report_row(report: &ReportEntry, ttl: Duration, now: chrono::DateTime<chrono::Utc>) {
    println!(
        "  #{}  {:<8} {:>3}%  {:<6} expires in {}",
        report.short_id(),
        report.classification.as_str(),
        report.confidence,
        report.status.as_str(),
        format_countdown(expires_in(report.timestamp, ttl, now))
    );
}

fn find_report(feeds: &Feeds, id: &str) -> Result<ReportEntry> {
    feeds
        .reports
        .find(id)
        .with_context(|| format!("no live report for '{}'", id))
}

fn cmd_show(config: &Config, feeds: &Feeds, id: &str) -> Result<()> {
    let report = find_report(feeds, id)?;
    let document =
        agriai_core::export::render_report(&report, config.retention.ttl(), feeds.clock.now());
    print!("{}", document);
    Ok(())
}

fn cmd_export(config: &Config, feeds: &Feeds, id: &str, out: Option<PathBuf>) -> Result<()> {
    let report = find_report(feeds, id)?;
    let dir = out.unwrap_or_else(|| config.export.output_dir());

    let path = export_report(&report, &dir, feeds.clock.now(), config.retention.ttl())
        .context("failed to export report")?;
    println!("Exported report #{} to {}", report.short_id(), path.display());
    Ok(())
}

fn cmd_sweep(feeds: &Feeds) -> Result<()> {
    let history_removed = feeds.history.sweep();
    let reports_removed = feeds.reports.sweep();

    println!("Sweep complete:");
    println!(
        "  History: {} removed, {} remaining",
        history_removed,
        feeds.history.entries().len()
    );
    println!(
        "  Reports: {} removed, {} remaining",
        reports_removed,
        feeds.reports.entries().len()
    );
    println!(
        "  Store:   {} of {} bytes used",
        feeds.store.used_bytes()?,
        feeds.store.quota()
    );
    Ok(())
}

async fn cmd_watch(config: &Config, feeds: Feeds, duration: Option<u64>) -> Result<()> {
    let mut history_rx = feeds.history.subscribe();
    let mut reports_rx = feeds.reports.subscribe();

    let sweeper = Sweeper::start(
        vec![
            feeds.history.clone() as Arc<dyn Sweep>,
            feeds.reports.clone() as Arc<dyn Sweep>,
        ],
        config.retention.sweep_interval(),
    );

    println!(
        "Watching {} scan(s) and {} report(s); sweeping every {}s. Press Ctrl-C to stop.",
        feeds.history.entries().len(),
        feeds.reports.entries().len(),
        config.retention.sweep_interval().as_secs()
    );

    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = history_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = history_rx.borrow_and_update().len();
                println!("History now holds {} scan(s)", count);
            }
            changed = reports_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = reports_rx.borrow_and_update().len();
                println!("Reports now hold {} report(s)", count);
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    sweeper.shutdown().await;
    println!("Stopped watching.");
    Ok(())
}
