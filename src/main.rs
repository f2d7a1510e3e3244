use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use adbrain_core::config::AppConfig;
use adbrain_core::types::CampaignParams;
use adbrain_engine::pipeline::{self, GENERATORS};
use adbrain_engine::{ArchiveStatus, RunOutcome, WorkflowEngine};
use adbrain_store::SqliteArchive;

#[derive(Parser)]
#[command(name = "adbrain", version, about = "Workflow engine for AI-generated advertising campaigns")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "adbrain.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the campaign pipeline once
    Run {
        /// Campaign topic
        #[arg(long)]
        topic: String,
        /// Brand name
        #[arg(long)]
        brand: String,
        /// Total budget in dollars
        #[arg(long, default_value = "10000")]
        budget: f64,
        /// Target market region
        #[arg(long, default_value = "Global")]
        region: String,
        /// JSON file with the audience profile
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Skip the budget optimization agent
        #[arg(long)]
        no_budget: bool,
        /// Skip the personalization agent
        #[arg(long)]
        no_personalization: bool,
        /// Print the full execution record as JSON
        #[arg(long)]
        json: bool,
    },
    /// List archived campaigns
    Campaigns {
        /// Maximum number of campaigns to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show one archived campaign as JSON
    Show {
        /// Campaign id
        id: String,
    },
    /// Print the pipeline descriptor and visualization as JSON
    Graph,
    /// Check provider credentials and chain order
    Providers,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("adbrain=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "adbrain", &mut std::io::stdout());
        return Ok(());
    }

    let config = AppConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run {
            topic,
            brand,
            budget,
            region,
            profile,
            no_budget,
            no_personalization,
            json,
        } => {
            let mut params = CampaignParams::new(topic, brand)
                .with_budget(budget)
                .with_region(region);
            if let Some(path) = profile {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading profile {}", path.display()))?;
                params = params.with_profile(
                    serde_json::from_str(&text).context("profile is not valid JSON")?,
                );
            }
            params.include_budget = !no_budget;
            params.include_personalization = !no_personalization;

            let mut engine = WorkflowEngine::from_config(&config)?;
            if config.storage.enabled {
                let archive = SqliteArchive::open(&config.storage_path())?;
                engine = engine.with_archive(Arc::new(archive));
            }

            let cancel = CancellationToken::new();
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                warn!("Cancelling run after the current node...");
                cancel_clone.cancel();
            });

            let outcome = engine
                .run_with_cancel(pipeline::PIPELINE_ID, params, cancel)
                .await?;

            if json {
                let value = serde_json::json!({
                    "record": outcome.record.as_ref(),
                    "archive": outcome.archive,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Commands::Campaigns { limit } => {
            let archive = SqliteArchive::open(&config.storage_path())?;
            let campaigns = archive.list(limit)?;
            if campaigns.is_empty() {
                println!("No archived campaigns.");
            }
            for c in campaigns {
                println!(
                    "{}  {}  {:<16} {:<28} ${:.0}{}",
                    c.archived_at.format("%Y-%m-%d %H:%M"),
                    c.id,
                    c.brand,
                    c.topic,
                    c.budget,
                    if c.synthesized { "  [synthesized]" } else { "" },
                );
            }
        }
        Commands::Show { id } => {
            let archive = SqliteArchive::open(&config.storage_path())?;
            match archive.get(&id)? {
                Some(campaign) => println!("{}", serde_json::to_string_pretty(&campaign)?),
                None => anyhow::bail!("No campaign with id {}", id),
            }
        }
        Commands::Graph => {
            let engine = WorkflowEngine::from_config(&config)?;
            let value = serde_json::json!({
                "descriptor": engine.descriptor(pipeline::PIPELINE_ID)?,
                "visualization": engine.visualization(pipeline::PIPELINE_ID)?,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Commands::Providers => {
            let mut providers = config.provider_configs();
            providers.sort_by_key(|p| p.priority);
            for p in providers {
                let credential = if p.resolved_api_key().is_some() {
                    "key set"
                } else {
                    "no key"
                };
                println!(
                    "{:>3}  {:<14} {:<12} {:<40} {}",
                    p.priority,
                    p.name,
                    p.provider_kind(),
                    p.model_id,
                    credential
                );
            }
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn print_outcome(outcome: &RunOutcome) {
    let record = &outcome.record;
    let ctx = &record.context;

    println!("Execution {}", record.execution_id);
    println!("  status:   {}", record.status);
    println!("  elapsed:  {} ms", record.elapsed_ms());
    if record.cancelled {
        println!("  cancelled before completion");
    }
    if record.fallback_used {
        println!("  result:   synthesized fallback (live pipeline did not produce a blueprint)");
    }

    println!("  agents:   {}", ctx.active_agents.join(" → "));
    for (node_id, label) in GENERATORS {
        if let Some(provider) = ctx.providers_used.get(node_id) {
            println!("    {:<22} via {}", label, provider);
        }
    }

    if let Some(blueprint) = &ctx.blueprint {
        let score = |key: &str| blueprint.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
        println!("  viral potential:    {:.2}/10", score("viral_potential"));
        println!("  breakthrough:       {:.0}%", score("breakthrough_probability") * 100.0);
        println!("  launch readiness:   {:.2}/10", score("launch_readiness"));
        if let Some(level) = blueprint.get("autonomy_level").and_then(|v| v.as_str()) {
            println!("  autonomy:           {}", level);
        }
    }

    match &outcome.archive {
        ArchiveStatus::Archived(id) => info!(campaign_id = %id, "Campaign archived"),
        ArchiveStatus::Failed(e) => warn!(error = %e, "Campaign was not archived"),
        ArchiveStatus::Disabled => {}
    }
}
