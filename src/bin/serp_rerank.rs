//! CLI binary for serp-rerank.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serp_rerank::{compare, export, keywords, summary, ExperimentConfig, RunOptions, Runner};
use serp_search::Provider;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Compare LLM re-ranking of search results against the engines' own rankings.
#[derive(Parser)]
#[command(name = "serp-rerank", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "SERP_RERANK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search, normalise and re-rank every keyword, appending to the run log.
    Run {
        /// Keyword list, one per line. Overrides `keywords_file`.
        #[arg(short, long)]
        keywords_file: Option<PathBuf>,

        /// Process at most this many pending keywords.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Candidates kept per keyword. Overrides `top_n`.
        #[arg(short, long)]
        top: Option<usize>,

        /// Run log name; `{results_dir}/{run_name}.jsonl`. Reusing a name resumes.
        #[arg(short, long)]
        run_name: Option<String>,

        /// Collect traditional rankings only.
        #[arg(long)]
        no_rerank: bool,

        /// Re-run keywords whose latest record failed.
        #[arg(long)]
        retry_failed: bool,

        /// Provider priority override, e.g. `--provider searxng --provider bing`.
        #[arg(short, long = "provider")]
        providers: Vec<Provider>,
    },

    /// Print a pre vs post summary for a run log or exported JSON.
    Summarize {
        /// `.jsonl` run log or `.json` export.
        file: PathBuf,
    },

    /// Join AI ranks from one run with traditional ranks from another.
    Compare {
        /// Run whose post-LLM ranks are compared.
        #[arg(long)]
        ai: PathBuf,

        /// Run whose engine ranks are the baseline (often a `--no-rerank` run).
        #[arg(long)]
        traditional: PathBuf,

        /// Write comparison rows to this CSV.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Re-export nested JSON, flat CSV and unique domains from a run log.
    Export {
        /// `.jsonl` run log.
        log: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Local overrides first; dotenvy never replaces a variable already set.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("serp_rerank=info,serp_search=info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = ExperimentConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            keywords_file,
            limit,
            top,
            run_name,
            no_rerank,
            retry_failed,
            providers,
        } => {
            if let Some(path) = keywords_file {
                config.keywords_file = path;
            }
            if let Some(top) = top {
                config.top_n = top;
            }
            if no_rerank {
                config.rerank.enabled = false;
            }
            if !providers.is_empty() {
                config.search.providers = providers;
            }
            config.validate()?;
            let run_name = run_name.unwrap_or_else(|| default_run_name(&config));
            let options = RunOptions {
                limit,
                retry_failed,
            };
            run(&config, &run_name, &options).await
        }
        Command::Summarize { file } => {
            let run = export::load_run(&file)?;
            print!("{}", summary::render_report(&summary::summarize(&run.records), &run.runs));
            Ok(())
        }
        Command::Compare {
            ai,
            traditional,
            out,
        } => {
            let ai_records = export::load_records(&ai)?;
            let traditional_records = export::load_records(&traditional)?;
            let comparison = compare::compare(
                &ai_records,
                &traditional_records,
                config.comparison.not_ranked_rank,
            );
            if let Some(path) = out {
                compare::write_rows_csv(&comparison.rows, &path)?;
                info!(rows = comparison.rows.len(), path = %path.display(), "comparison rows written");
            }
            print!("{}", compare::render_aggregates(&comparison.aggregates));
            Ok(())
        }
        Command::Export { log } => {
            let paths = export::export_all(&log)?;
            println!("{}", paths.json.display());
            println!("{}", paths.csv.display());
            println!("{}", paths.domains.display());
            Ok(())
        }
    }
}

async fn run(config: &ExperimentConfig, run_name: &str, options: &RunOptions) -> anyhow::Result<()> {
    let keywords = keywords::load_keywords(&config.keywords_file)?;
    let mut runner = Runner::from_config(config, run_name)?;

    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, stopping after the current keyword...");
            cancel_clone.cancel();
        }
    });

    let report = runner.run(&keywords, options, &cancel).await?;
    let paths = export::export_all(&report.log_path)?;

    println!("\nRun {} ({})", run_name, report.run_id);
    println!("  processed:        {}", report.processed);
    println!("  already complete: {}", report.already_complete);
    for (status, count) in &report.by_status {
        println!("  {status:<17} {count}");
    }
    if report.cancelled {
        println!("  cancelled; rerun the same command to resume");
    }
    println!("  log:  {}", report.log_path.display());
    println!("  json: {}", paths.json.display());
    println!("  csv:  {}", paths.csv.display());
    Ok(())
}

/// `{treatment}_{date}` for re-ranked runs, `baseline_{date}` otherwise.
fn default_run_name(config: &ExperimentConfig) -> String {
    let date = chrono::Utc::now().format("%Y%m%d");
    if config.rerank.enabled {
        format!("{}_{date}", config.rerank.treatment)
    } else {
        format!("baseline_{date}")
    }
}
