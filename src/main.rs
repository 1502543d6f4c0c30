use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use magpie::config::ConfigResolver;
use magpie::download::retry::RetryPolicy;
use magpie::download::{Downloader, FsSink};
use magpie::errlog::ErrorLogger;
use magpie::net::{NetworkHub, ReqwestFetch};
use magpie::notify::TerminalNotifier;
use magpie::orchestrator::Orchestrator;
use magpie::page::Page;
use magpie::platforms::InteractionEvent;
use magpie::storage::file::default_store_dir;
use magpie::storage::{JsonFileStore, KvStore};

/// Magpie: interaction-driven media capture for social feeds.
///
/// Detects like/bookmark controls in a captured page, resolves the
/// original-quality media around them, and downloads it with
/// template-driven filenames.
#[derive(Parser)]
#[command(name = "magpie", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture pipeline over a saved page snapshot
    Capture {
        /// Path to the captured page markup
        #[arg(long)]
        page: PathBuf,

        /// The URL the page was captured from
        #[arg(long)]
        url: String,

        /// Cookie header captured with the page (needed for video replay)
        #[arg(long)]
        cookies: Option<String>,

        /// File of observed resource URLs, one per line
        #[arg(long)]
        resources: Option<PathBuf>,

        /// CSS selector of the control(s) to click; defaults to every
        /// recognized interaction control on the page
        #[arg(long)]
        target: Option<String>,

        /// Download directory (default: ~/Downloads/magpie)
        #[arg(long)]
        downloads: Option<PathBuf>,
    },

    /// Show (or clear) the failure journal
    Logs {
        /// Clear the journal instead of printing it
        #[arg(long)]
        clear: bool,
    },

    /// Show current settings and journal size
    Status,

    /// Write a settings key (value is parsed as JSON, else stored as a
    /// string)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("magpie=info")),
        )
        .init();

    let cli = Cli::parse();

    let store_dir = std::env::var("MAGPIE_STORE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_store_dir());
    let store: Arc<dyn KvStore> = Arc::new(JsonFileStore::open(&store_dir)?);

    match cli.command {
        Commands::Capture {
            page,
            url,
            cookies,
            resources,
            target,
            downloads,
        } => {
            let source = std::fs::read_to_string(&page)
                .with_context(|| format!("Failed to read {}", page.display()))?;
            let mut snapshot = Page::parse(&url, &source)?;
            if let Some(cookies) = cookies {
                snapshot.set_cookies(&cookies);
            }
            if let Some(path) = resources {
                let listing = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                for line in listing.lines().map(str::trim).filter(|l| !l.is_empty()) {
                    snapshot.record_resource(line);
                }
            }

            let download_dir = downloads
                .or_else(|| std::env::var("MAGPIE_DOWNLOAD_DIR").map(PathBuf::from).ok())
                .unwrap_or_else(FsSink::default_dir);
            let sink = Arc::new(FsSink::new(&download_dir)?);
            let http = Arc::new(ReqwestFetch::new()?);
            let notifier = Arc::new(TerminalNotifier::new(true));
            let downloader = Arc::new(Downloader::new(
                sink,
                http.clone(),
                RetryPolicy::default(),
                notifier.clone(),
            ));

            let mut orchestrator = Orchestrator::new(
                store,
                downloader,
                notifier,
                NetworkHub::new(),
                http,
                snapshot.url_str(),
            )
            .await?;

            let targets = match target.as_deref() {
                Some(selector) => snapshot.select_all(selector),
                None => recognized_controls(&snapshot),
            };
            if targets.is_empty() {
                println!("No interaction controls found on the page.");
                return Ok(());
            }

            println!(
                "Simulating {} interaction(s) from {}...",
                targets.len(),
                snapshot.url_str(),
            );
            let pb = ProgressBar::new(targets.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  Capture [{bar:30}] {pos}/{len}")
                    .expect("valid template"),
            );

            let mut handled = 0usize;
            for node in targets {
                if orchestrator
                    .handle_click(&snapshot, InteractionEvent::new(node))
                    .await
                    .is_some()
                {
                    handled += 1;
                }
                pb.inc(1);
            }
            pb.finish_and_clear();

            info!(handled, "capture run finished");
            println!(
                "{}",
                format!("Handled {handled} interaction(s); files in {}", download_dir.display())
                    .bold()
            );
            println!("Run `magpie logs` to inspect any failures.");
        }

        Commands::Logs { clear } => {
            let errlog = ErrorLogger::new(store);
            if clear {
                errlog.clear().await?;
                println!("Failure journal cleared.");
                return Ok(());
            }
            let entries = errlog.recent().await?;
            if entries.is_empty() {
                println!("No failures recorded.");
                return Ok(());
            }
            println!("{}", format!("=== Failure journal ({}) ===", entries.len()).bold());
            for entry in entries {
                println!(
                    "  {} {} {} {} ({} retries)",
                    entry.timestamp.dimmed(),
                    entry.platform.yellow(),
                    entry.action,
                    entry.url,
                    entry.retry_count,
                );
                println!("      {}", entry.error.red());
            }
        }

        Commands::Status => {
            let config = ConfigResolver::new(store.clone());
            let switches = config.switches().await?;
            let formats = config.filename_formats().await?;

            println!("Settings store: {}", store_dir.display());
            println!(
                "Twitter: {}",
                if switches.twitter { "on".green() } else { "off".red() }
            );
            println!(
                "Pixiv: {}",
                if switches.pixiv { "on".green() } else { "off".red() }
            );
            println!(
                "Notifications: {}",
                if config.notifications_enabled().await? {
                    "on".green()
                } else {
                    "off".red()
                }
            );
            println!("Proxy domain: {}", config.proxy_domain().await?);
            println!("Twitter filename tokens: {:?}", formats.twitter);
            println!("Pixiv filename tokens: {:?}", formats.pixiv);

            let entries = ErrorLogger::new(store).recent().await?;
            println!("Recorded failures: {}", entries.len());
        }

        Commands::Set { key, value } => {
            let parsed = serde_json::from_str(&value)
                .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
            let config = ConfigResolver::new(store);
            config.set(&key, parsed).await?;
            println!("{key} updated.");
        }
    }

    Ok(())
}

/// Every control on the page either platform would recognize.
fn recognized_controls(page: &Page) -> Vec<ego_tree::NodeId> {
    let mut found = Vec::new();
    for selector in [
        r#"[data-testid="like"]"#,
        r#"[data-ga4-label="bookmark_button"]"#,
        r#"[class*="bookmark"]"#,
    ] {
        for node in page.select_all(selector) {
            if !found.contains(&node) {
                found.push(node);
            }
        }
    }
    found
}
