mod render;

use anyhow::{Context, Result};
use citeflow_core::{
    ConfigLoader, DRAFT_ERROR_FALLBACK, ResearchItem, ResearchWorkflow, RunReport,
    TelemetryOptions, WorkflowState, init_telemetry, persist_trace,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "citeflow",
    version,
    about = "Search the web and draft a cited answer"
)]
struct Cli {
    /// Path to a citeflow.toml configuration file.
    #[arg(long, global = true, env = "CITEFLOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Research a query and draft an answer.
    Ask(AskArgs),
    /// Validate configuration and report which API keys are available.
    Check,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Query to research.
    query: String,

    /// Override the configured model name.
    #[arg(long)]
    model: Option<String>,

    /// Override the configured number of search results.
    #[arg(long)]
    max_results: Option<u32>,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Skip the short conclusion (saves one model call).
    #[arg(long)]
    no_conclusion: bool,

    /// Directory to write the run trace into.
    #[arg(long)]
    trace_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    session_id: &'a str,
    elapsed_ms: u64,
    query: &'a str,
    research_data: &'a [ResearchItem],
    drafted_answer: Option<&'a str>,
    messages: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    conclusion: Option<&'a str>,
}

impl<'a> JsonReport<'a> {
    fn new(report: &'a RunReport, conclusion: Option<&'a str>) -> Self {
        Self {
            session_id: &report.session_id,
            elapsed_ms: report.elapsed.as_millis() as u64,
            query: report.state.query(),
            research_data: report.state.research_data(),
            drafted_answer: report.state.drafted_answer(),
            messages: report.state.messages(),
            conclusion,
        }
    }
}

/// Answer worth summarising: a real draft built from research, not a fallback.
fn conclusion_input(state: &WorkflowState) -> Option<&str> {
    if state.research_data().is_empty() {
        return None;
    }
    state
        .drafted_answer()
        .filter(|answer| *answer != DRAFT_ERROR_FALLBACK)
}

fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to read .env file");
        }
    }

    let cli = Cli::parse();
    let mut config = ConfigLoader::load(cli.config.clone())?;

    init_telemetry(TelemetryOptions::default().with_default_level(&config.logging.level))?;

    let rt = Runtime::new()?;
    rt.block_on(async move {
        match cli.command {
            Command::Ask(args) => {
                if let Some(model) = &args.model {
                    config.model.name = model.clone();
                }
                if let Some(max_results) = args.max_results {
                    config.search.max_results = max_results;
                }
                ConfigLoader::validate(&config)?;
                ask_command(config, args).await?
            }
            Command::Check => check_command(&config),
        }
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}

async fn ask_command(config: citeflow_core::Config, args: AskArgs) -> Result<()> {
    let query = args.query.trim();
    info!(%query, "starting research run");

    let workflow = ResearchWorkflow::from_config(config)?;
    let report = workflow.run_with_report(query).await?;

    if let Some(dir) = &args.trace_dir {
        match persist_trace(dir, &report.session_id, &report.trace) {
            Ok(path) => info!(path = %path.display(), "trace written"),
            Err(err) => warn!(error = %err, "failed to persist trace"),
        }
    }

    let conclusion = match conclusion_input(&report.state) {
        Some(answer) if !args.no_conclusion => {
            let model = workflow.model();
            let model_name = &workflow.config().model.name;
            Some(render::conclusion(model.as_ref(), model_name, answer).await)
        }
        _ => None,
    };

    match args.format {
        OutputFormat::Text => {
            print!(
                "{}",
                render::render_text(
                    &report.state,
                    &report.trace,
                    report.elapsed,
                    conclusion.as_deref()
                )
            );
        }
        OutputFormat::Json => {
            let payload = JsonReport::new(&report, conclusion.as_deref());
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
    }

    Ok(())
}

fn check_command(config: &citeflow_core::Config) {
    println!(
        "search: depth={} max_results={}",
        config.search.depth.as_str(),
        config.search.max_results
    );
    println!("model: {}", config.model.name);
    println!(
        "retry: attempts={} backoff={}ms..{}ms",
        config.retry.max_attempts, config.retry.backoff_base_ms, config.retry.backoff_max_ms
    );
    println!(
        "research: content_truncation_length={}",
        config.research.content_truncation_length
    );

    for (label, result) in [
        (config.search.api_key_env.as_str(), config.search_api_key()),
        (config.model.api_key_env.as_str(), config.model_api_key()),
    ] {
        match result {
            Ok(_) => println!("{label}: set"),
            Err(err) => println!("{label}: {err}"),
        }
    }
}
