//! Odysseus CLI
//!
//! An autonomous agent that browses the web to learn about a concept.

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use odysseus::console::{self, Tone};
use odysseus::search::{BraveSearch, DuckDuckGoSearch, SearchBackend};
use odysseus::settings::{self, Overrides};
use odysseus::{ChatClient, Explorer, HttpFetcher, SearchProvider, SuggestionMode};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Odysseus - explore the web and learn about a concept
#[derive(Parser, Debug)]
#[command(name = "odysseus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Concept to start exploring from
    #[arg(trailing_var_arg = true)]
    concept: Vec<String>,

    /// Start from this URL instead of a search
    #[arg(long)]
    url: Option<String>,

    /// Model identifier
    #[arg(short, long)]
    model: Option<String>,

    /// Maximum number of pages to explore
    #[arg(long)]
    max_pages: Option<u32>,

    /// Directory where run directories are created
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Search backend
    #[arg(long, value_enum)]
    search: Option<SearchBackend>,

    /// What to do with suggested new directions
    #[arg(long, value_enum, default_value_t = SuggestionMode::Off)]
    suggestions: SuggestionMode,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Where the run starts
enum Start {
    Concept(String),
    Url(String),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let env = |key: &str| std::env::var(key).ok();
    let home = settings::odysseus_home(env);
    let file = settings::load_settings_file(home.as_deref())
        .await
        .context("Failed to read config file")?;
    let settings = settings::resolve(
        file,
        Overrides {
            model: cli.model.clone(),
            search: cli.search,
            log_dir: cli.log_dir.clone(),
            max_pages: cli.max_pages,
        },
        env,
    );
    let credentials = settings::credentials(settings.search, env).context("Missing credentials")?;

    let start = match (cli.url.as_deref(), cli.concept.join(" ").trim()) {
        (Some(url), _) => Start::Url(url.to_string()),
        (None, concept) if !concept.is_empty() => Start::Concept(concept.to_string()),
        (None, _) => Start::Concept(prompt_concept()?),
    };

    let run_dir = run_directory(&settings.log_dir);
    let config = settings.to_config(run_dir.clone(), cli.suggestions);

    let model = Arc::new(ChatClient::new(
        credentials.openai_api_key,
        &settings.base_url,
        &settings.model,
    )?);
    let search: Arc<dyn SearchProvider> = match settings.search {
        SearchBackend::Brave => Arc::new(BraveSearch::new(
            credentials.brave_api_key.unwrap_or_default(),
        )?),
        SearchBackend::DuckDuckGo => Arc::new(DuckDuckGoSearch::new()?),
    };
    let fetcher = Arc::new(HttpFetcher::new()?);

    let explorer = Explorer::new(config, model, search, fetcher)
        .await
        .with_context(|| format!("Cannot create run directory {}", run_dir.display()))?;
    info!("Run directory: {}", explorer.run_dir().display());

    let cancel = explorer.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            console::status(Tone::Warn, "\nStopping after the current step...");
            cancel.cancel();
        }
    });

    let report = match start {
        Start::Url(url) => {
            console::status(Tone::Accent, &format!("Starting exploration from {}", url));
            explorer.explore_url(&url).await?
        }
        Start::Concept(concept) => {
            console::status(Tone::Accent, &format!("Starting exploration of \"{}\"", concept));
            explorer.explore_concept(&concept).await?
        }
    };

    console::status(
        Tone::Success,
        &format!(
            "Exploration finished ({}): {} pages visited, {} memories recorded.",
            report.outcome,
            report.visited.len(),
            report.memories.len()
        ),
    );
    if let Some(path) = &report.summary_path {
        console::status(Tone::Info, &format!("Session summary: {}", path.display()));
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// `{log_dir}/run_odysseus_{timestamp}`
fn run_directory(log_dir: &Path) -> PathBuf {
    log_dir.join(format!(
        "run_odysseus_{}",
        Local::now().format("%Y-%m-%d_%H-%M-%S")
    ))
}

/// Ask for a concept on stdin.
fn prompt_concept() -> anyhow::Result<String> {
    print!("What concept would you like to explore? ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let concept = line.trim().to_string();
    if concept.is_empty() {
        bail!("No concept given");
    }
    Ok(concept)
}
