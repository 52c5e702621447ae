use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod checkpoint;
mod config;
mod error;
mod export;
mod extractor;
mod fetcher;
mod models;
mod orchestrator;
mod query;

use checkpoint::{CheckpointStore, JsonCheckpointStore};
use config::{Config, ConfigOverrides};
use fetcher::ProxyFetcher;
use models::{BatchPlan, BatchRequest, CancelFlag, QueryLogic, SearchCriteria};
use orchestrator::Scraper;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one search and export the extracted emails as CSV
    Scrape {
        /// Profession to search for
        #[arg(short, long)]
        profession: String,

        /// City the search is scoped to
        #[arg(short, long)]
        city: String,

        /// State the search is scoped to
        #[arg(short, long)]
        state: String,

        /// Site to restrict the search to (repeatable)
        #[arg(long = "site")]
        sites: Vec<String>,

        /// Email domain to target (repeatable)
        #[arg(long = "email-domain")]
        email_domains: Vec<String>,

        /// How multiple email domains combine: OR or AND
        #[arg(long, default_value = "OR")]
        logic: String,

        /// Result pages to walk (overrides configuration)
        #[arg(long)]
        pages: Option<u32>,

        /// Path of the CSV file to write (defaults to <profession>_<state>_emails.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Process a JSON batch plan of profession/state/city combinations
    Batch {
        /// Path to the batch plan JSON file
        #[arg(short, long)]
        input: PathBuf,

        /// Directory the per-(profession, state) CSV files are written to
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Start the API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(config::build_config(&cli.overrides)?);

    match cli.command {
        Commands::Scrape {
            profession,
            city,
            state,
            sites,
            email_domains,
            logic,
            pages,
            output,
        } => {
            let criteria = SearchCriteria {
                sites,
                email_domains,
                profession,
                city,
                state,
                logic: QueryLogic::parse(&logic),
                page_limit: pages.unwrap_or(config.page_limit),
            };
            run_scrape(config, criteria, output).await?;
        }
        Commands::Batch { input, output_dir } => {
            run_batch(config, input, output_dir).await?;
        }
        Commands::Serve { port } => {
            info!("Starting API server on port {}", port);
            api::start_api_server(config, port)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
        }
    }

    Ok(())
}

async fn run_scrape(
    config: Arc<Config>,
    criteria: SearchCriteria,
    output: Option<PathBuf>,
) -> Result<()> {
    let fetcher = ProxyFetcher::new(config.clone())?;
    let scraper = Scraper::new(config, fetcher);

    let result = scraper.scrape(&criteria).await;
    if !result.succeeded {
        bail!(
            "Scrape rejected: {}",
            result.error_reason.unwrap_or_else(|| "unknown".to_string())
        );
    }
    if let Some(reason) = &result.error_reason {
        warn!("No emails collected; last fetch failure: {}", reason);
    }

    let path = output.unwrap_or_else(|| {
        PathBuf::from(export::csv_file_name(&criteria.profession, &criteria.state))
    });
    export::write_csv_file(
        &path,
        &result.emails,
        &criteria.profession,
        &criteria.state,
        None,
    )?;
    info!(
        "Scrape finished: {} emails written to {}",
        result.emails.len(),
        path.display()
    );

    Ok(())
}

async fn run_batch(config: Arc<Config>, input: PathBuf, output_dir: PathBuf) -> Result<()> {
    let plan_data = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read batch plan {}", input.display()))?;
    let plan: BatchPlan = serde_json::from_str(&plan_data)
        .with_context(|| format!("Invalid batch plan {}", input.display()))?;

    std::fs::create_dir_all(&output_dir)?;

    let checkpoint = JsonCheckpointStore::new(output_dir.join(".serp-leads-checkpoint.json"));
    recover_previous_run(&checkpoint, &output_dir)?;

    let request = BatchRequest {
        tasks: plan.tasks(),
        sites: plan.sites.unwrap_or_else(|| config.default_sites.clone()),
        email_domains: plan
            .email_domains
            .unwrap_or_else(|| config.default_email_domains.clone()),
        page_limit: plan.page_limit.unwrap_or(config.page_limit),
    };
    if request.tasks.is_empty() {
        bail!("Batch plan contains no tasks");
    }
    info!(
        "Loaded batch plan: {} tasks across {} sites",
        request.tasks.len(),
        request.sites.len()
    );

    // First Ctrl-C requests a cooperative stop between tasks; completed work
    // is kept and checkpointed.
    let cancel = CancelFlag::new();
    let cancel_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current task then stopping.");
            cancel_signal.cancel();
        }
    });

    let progress_bar = indicatif::ProgressBar::new(request.tasks.len() as u64);
    progress_bar.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    let fetcher = ProxyFetcher::new(config.clone())?;
    let scraper = Scraper::new(config, fetcher);

    let bar = progress_bar.clone();
    let outcome = scraper
        .run_batch(
            &request,
            move |_percent, task| {
                bar.set_message(format!("{} / {} / {}", task.profession, task.state, task.city));
                bar.inc(1);
            },
            &cancel,
            &checkpoint,
        )
        .await;
    progress_bar.finish_with_message(if outcome.cancelled {
        "Batch cancelled"
    } else {
        "Batch complete"
    });

    let mut total = 0;
    for (profession, states) in &outcome.results {
        for (state, emails) in states {
            let path = output_dir.join(export::csv_file_name(profession, state));
            export::write_csv_file(&path, emails, profession, state, Some(&outcome.attribution))?;
            total += emails.len();
        }
    }

    let failed = outcome.history.iter().filter(|r| !r.succeeded).count();
    info!(
        "Batch finished: {} tasks processed ({} without results), {} emails exported.",
        outcome.history.len(),
        failed,
        total
    );

    if outcome.cancelled {
        warn!("Run was cancelled; checkpoint kept for recovery.");
    } else {
        checkpoint.clear()?;
    }

    Ok(())
}

/// Exports the emails of an interrupted previous run, if a checkpoint exists.
fn recover_previous_run(checkpoint: &JsonCheckpointStore, output_dir: &std::path::Path) -> Result<()> {
    let Some(recovered) = checkpoint.load()? else {
        return Ok(());
    };
    info!(
        "Found checkpoint from {} with {} emails for {} / {}.",
        recovered.date,
        recovered.emails.len(),
        recovered.profession,
        recovered.state
    );
    if recovered.emails.is_empty() {
        return Ok(());
    }
    let name = format!(
        "recovered_{}",
        export::csv_file_name(&recovered.profession, &recovered.state)
    );
    let path = output_dir.join(name);
    export::write_csv_file(
        &path,
        &recovered.emails,
        &recovered.profession,
        &recovered.state,
        None,
    )?;
    info!("Recovered emails written to {}", path.display());
    Ok(())
}
