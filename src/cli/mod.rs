//! Command-line interface for the conductor.
//!
//! Provides commands for starting runs, resuming interrupted runs,
//! inspecting run records and their checkpoint history, and showing the
//! resolved configuration.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{
    HttpContentDrafter, HttpKeywordResearch, HttpPracticeDirectory, JsonEndpoint, WebhookNotifier,
};
use crate::config::{self, ResolvedConfig};
use crate::core::{Conductor, ConductorResult, RunRequest};
use crate::stages::Providers;
use crate::store::{RunStore, SqliteRunStore};

/// conductor - multi-agent content production pipeline
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline for a practice
    Run {
        /// Practice ID
        #[arg(short, long, env = "CONDUCTOR_PRACTICE")]
        practice: String,

        /// Organization that owns the practice
        #[arg(short, long, env = "CONDUCTOR_ORGANIZATION")]
        organization: String,

        /// Record the run as started by a scheduler
        #[arg(long)]
        scheduled: bool,
    },

    /// Resume an interrupted run from its last checkpoint
    Resume {
        /// Run ID to resume
        run_id: String,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the checkpoint history of a run
    Checkpoints {
        /// Run ID (UUID)
        run_id: String,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                practice,
                organization,
                scheduled,
            } => start_run(practice, organization, scheduled).await,
            Commands::Resume { run_id } => resume_run(&run_id).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Checkpoints { run_id } => show_checkpoints(&run_id).await,
            Commands::Config => show_config(),
        }
    }
}

fn parse_run_id(run_id_str: &str) -> Result<Uuid> {
    Uuid::parse_str(run_id_str).with_context(|| format!("Invalid run ID: {}", run_id_str))
}

async fn open_store(cfg: &ResolvedConfig) -> Result<SqliteRunStore> {
    SqliteRunStore::open(&cfg.database)
        .await
        .with_context(|| format!("Failed to open run store at {}", cfg.database.display()))
}

fn provider_endpoint(
    cfg: &ResolvedConfig,
    url: &Option<String>,
    key: &str,
) -> Result<JsonEndpoint> {
    let url = url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .with_context(|| format!("providers.{} is not configured", key))?;

    Ok(JsonEndpoint::new(url, cfg.providers.timeout())?
        .with_token(cfg.providers.token())
        .with_retry(cfg.providers.retry.clone()))
}

/// Wire a conductor from the resolved configuration
async fn build_conductor(cfg: &ResolvedConfig) -> Result<Conductor> {
    let providers = &cfg.providers;
    let directory = provider_endpoint(
        cfg,
        &providers.practice_directory_url,
        "practice_directory_url",
    )?;
    let research = provider_endpoint(cfg, &providers.research_url, "research_url")?;
    let drafting = provider_endpoint(cfg, &providers.drafting_url, "drafting_url")?;

    let store = open_store(cfg).await?;
    let providers = Providers {
        directory: Arc::new(HttpPracticeDirectory::new(directory)),
        research: Arc::new(HttpKeywordResearch::new(research)),
        drafter: Arc::new(HttpContentDrafter::new(drafting)),
    };

    let mut conductor = Conductor::new(Arc::new(store), providers, cfg.pipeline.clone())?;
    if let Some(url) = &cfg.notifications.webhook_url {
        conductor = conductor.with_notifier(Arc::new(WebhookNotifier::new(
            url.clone(),
            cfg.notifications.token(),
        )));
    }
    Ok(conductor)
}

/// Print the result as JSON; a failed run exits non-zero
fn report(result: &ConductorResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);

    if !result.is_completed() {
        eprintln!(
            "\n[Run {} failed: {}]",
            result.run_id,
            result.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
    eprintln!("\n[Run {} completed successfully]", result.run_id);
    Ok(())
}

async fn start_run(practice: String, organization: String, scheduled: bool) -> Result<()> {
    let cfg = config::config()?;
    let conductor = build_conductor(cfg).await?;

    let mut request = RunRequest::new(practice, organization);
    if scheduled {
        request = request.scheduled();
    }

    let result = conductor.run_request(request).await?;
    report(&result)
}

async fn resume_run(run_id_str: &str) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;
    let cfg = config::config()?;
    let conductor = build_conductor(cfg).await?;

    let result = conductor.resume(run_id).await?;
    report(&result)
}

async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;
    let store = open_store(config::config()?).await?;
    let run = store
        .get(run_id)
        .await?
        .with_context(|| format!("Run not found: {}", run_id))?;

    println!("Run ID: {}", run.id);
    println!("Practice: {} (organization {})", run.practice_id, run.organization_id);
    println!("Agent: {} {}", run.agent, run.graph_version);
    println!("Trigger: {}", run.trigger);
    println!("Status: {}", run.status);
    println!("Stage: {}", run.stage);
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    if let Some(error) = &run.error {
        println!("Error: {}", error);
    }
    if let Some(result) = &run.result {
        println!("\nResult:");
        println!("{}", serde_json::to_string_pretty(result)?);
    }

    Ok(())
}

async fn list_runs(limit: usize) -> Result<()> {
    let store = open_store(config::config()?).await?;
    let runs = store.list_recent(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<11} {:<13} {:<20}",
        "RUN ID", "PRACTICE", "STATUS", "STAGE", "STARTED"
    );
    println!("{}", "-".repeat(104));

    for run in runs {
        println!(
            "{:<38} {:<20} {:<11} {:<13} {:<20}",
            run.id,
            run.practice_id,
            run.status.as_str(),
            run.stage.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn show_checkpoints(run_id_str: &str) -> Result<()> {
    let run_id = parse_run_id(run_id_str)?;
    let store = open_store(config::config()?).await?;
    let history = store.checkpoints(run_id).await?;

    if history.is_empty() {
        println!("No checkpoints recorded");
        return Ok(());
    }

    println!("{:<5} {:<13} {:<18} {:<30}", "SEQ", "STAGE", "HASH", "RECORDED");
    println!("{}", "-".repeat(68));
    for checkpoint in history {
        println!(
            "{:<5} {:<13} {:<18} {:<30}",
            checkpoint.seq,
            checkpoint.stage.as_str(),
            checkpoint.snapshot_hash,
            checkpoint.recorded_at.to_rfc3339()
        );
    }

    Ok(())
}

fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let unset = || "(not set)".to_string();

    let config_file = cfg
        .config_file
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(none - using defaults)".to_string());
    let token_state = if cfg.providers.token().is_some() {
        "set"
    } else {
        "unset"
    };

    println!("Config file: {}", config_file);
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Database: {}", cfg.database.display());
    println!();
    println!("Pipeline:");
    println!("  Graph version:           {}", cfg.pipeline.graph_version);
    println!("  Max topics:              {}", cfg.pipeline.max_topics);
    println!("  Ghostwriter concurrency: {}", cfg.pipeline.ghostwriter_concurrency);
    println!("  Draft timeout:           {}s", cfg.pipeline.draft_timeout_seconds);
    println!("  Stale after:             {} days", cfg.pipeline.stale_after_days);
    println!("  Dormant after:           {} days", cfg.pipeline.dormant_after_days);
    println!();
    println!("Providers:");
    println!(
        "  Practice directory: {}",
        cfg.providers.practice_directory_url.clone().unwrap_or_else(unset)
    );
    println!(
        "  Research:           {}",
        cfg.providers.research_url.clone().unwrap_or_else(unset)
    );
    println!(
        "  Drafting:           {}",
        cfg.providers.drafting_url.clone().unwrap_or_else(unset)
    );
    println!("  Token:              ${} ({})", cfg.providers.token_env, token_state);
    println!("  Timeout:            {}s", cfg.providers.timeout_seconds);
    println!("  Retry attempts:     {}", cfg.providers.retry.max_attempts);
    println!();
    println!("Notifications:");
    println!(
        "  Webhook: {}",
        cfg.notifications.webhook_url.clone().unwrap_or_else(unset)
    );

    Ok(())
}
