//! Switchboard CLI - inspect registries, plans and delegation paths

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchboard::delegation::{DelegationResolver, FirstOption};
use switchboard::dispatch::{Dispatcher, EchoRunner};
use switchboard::pipeline::{Pipeline, StaticRouter};
use switchboard::planning::{apply_reorder_policies, build_plan, RouterOutput, TaskIntent};
use switchboard::queue::{
    handler_fn, ExecutionQueue, JobFilter, JobQueue, JobStatus, JobStore, QueueEvent,
    SqliteJobStore,
};
use switchboard::registry::{Catalog, SpecialistRegistry};
use switchboard::{HeapConfig, HeapError};

#[derive(Parser)]
#[command(name = "switchboard")]
#[command(about = "Inspect and dry-run Switchboard specialist routing")]
#[command(version)]
struct Cli {
    /// JSON config file (caps, depth limit, queue concurrency)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON specialist catalog (default: built-in catalog)
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// SQLite URL for job records (default: in memory)
    #[arg(long, global = true, env = "SWITCHBOARD_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the specialists visible to the router
    Registry {
        /// Dump every entry as JSON instead
        #[arg(long)]
        json: bool,
    },

    /// Reorder a routing decision and build its plan
    Plan {
        #[command(flatten)]
        decision: DecisionArgs,
    },

    /// Build a plan and narrow its delegators to leaves
    Resolve {
        #[command(flatten)]
        decision: DecisionArgs,
    },

    /// Walk the registry taking the first option at each step
    Path {
        /// Start below this node instead of the root
        #[arg(long)]
        from: Option<String>,

        /// Stop as soon as a leaf is reached
        #[arg(long)]
        stop_at_leaf: bool,
    },

    /// Route, resolve and dispatch with an echo runner, recorded as a job
    Run {
        #[command(flatten)]
        decision: DecisionArgs,

        /// Keep running later levels after a failure
        #[arg(long)]
        no_halt: bool,
    },

    /// List recorded jobs
    Jobs {
        /// Only jobs in this status
        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(clap::Args)]
struct DecisionArgs {
    /// Router output file (JSON, optionally fenced or wrapped in prose)
    #[arg(short, long)]
    decision: PathBuf,

    /// Task text, used for intent inference when no actions are given
    #[arg(short, long, default_value = "")]
    task: String,

    /// Structured actions, e.g. create_agent,create_workflow
    #[arg(long, value_delimiter = ',')]
    actions: Vec<String>,
}

impl DecisionArgs {
    fn load(&self) -> Result<(RouterOutput, TaskIntent)> {
        let raw = std::fs::read_to_string(&self.decision)
            .with_context(|| format!("reading {}", self.decision.display()))?;
        let output = RouterOutput::parse(&raw)?;
        let intent = TaskIntent::infer(Some(self.actions.as_slice()), &self.task);
        Ok((output, intent))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchboard=info,switchboard_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let registry = load_registry(cli.catalog.as_deref(), &config)?;

    match cli.command {
        Commands::Registry { json } => run_registry(&registry, json),
        Commands::Plan { decision } => run_plan(&registry, &decision),
        Commands::Resolve { decision } => run_resolve(registry, &config, &decision).await,
        Commands::Path { from, stop_at_leaf } => {
            run_path(registry, &config, from.as_deref(), stop_at_leaf)
        }
        Commands::Run { decision, no_halt } => {
            let store = open_store(cli.database_url.as_deref()).await?;
            run_pipeline(registry, config, store, &decision, no_halt).await
        }
        Commands::Jobs { status, limit } => {
            let store = open_store(cli.database_url.as_deref()).await?;
            run_jobs(store, status.as_deref(), limit).await
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<HeapConfig> {
    let base = match path {
        Some(path) => HeapConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => HeapConfig::default(),
    };
    Ok(base.overlay(|key| std::env::var(key).ok())?)
}

fn load_registry(path: Option<&Path>, config: &HeapConfig) -> Result<Arc<SpecialistRegistry>> {
    let catalog = match path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => Catalog::builtin(),
    };
    Ok(Arc::new(catalog.into_registry(config.registry_caps())))
}

async fn open_store(database_url: Option<&str>) -> Result<Option<Arc<dyn JobStore>>> {
    match database_url {
        Some(url) => {
            let store = SqliteJobStore::connect(url)
                .await
                .with_context(|| format!("opening job store {}", url))?;
            Ok(Some(Arc::new(store)))
        }
        None => Ok(None),
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_registry(registry: &SpecialistRegistry, as_json: bool) -> Result<()> {
    if as_json {
        return print_json(registry);
    }

    println!("{} specialists, {} at top level", registry.len(), registry.top_level_ids().len());
    for summary in registry.top_level_view() {
        println!(
            "  {:<28} {:<9} {:>3} tools  {}",
            summary.id,
            summary.kind.as_str(),
            summary.tool_count,
            summary.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn run_plan(registry: &SpecialistRegistry, decision: &DecisionArgs) -> Result<()> {
    let (output, intent) = decision.load()?;
    let reordered = apply_reorder_policies(&output.priority_order, &intent);
    let plan = build_plan(&reordered, registry);
    print_json(&json!({
        "reordered": reordered,
        "plan": plan,
    }))
}

async fn run_resolve(
    registry: Arc<SpecialistRegistry>,
    config: &HeapConfig,
    decision: &DecisionArgs,
) -> Result<()> {
    let (output, intent) = decision.load()?;
    let reordered = apply_reorder_policies(&output.priority_order, &intent);
    let plan = build_plan(&reordered, &registry);

    let resolver = DelegationResolver::new(registry.clone(), config);
    let task = if output.refined_task.is_empty() {
        decision.task.as_str()
    } else {
        output.refined_task.as_str()
    };
    let expanded = resolver
        .expand_to_leaves(&plan.to_steps(), task, &FirstOption)
        .await?;

    print_json(&json!({
        "plan": plan,
        "resolved": build_plan(&expanded, &registry),
    }))
}

fn run_path(
    registry: Arc<SpecialistRegistry>,
    config: &HeapConfig,
    from: Option<&str>,
    stop_at_leaf: bool,
) -> Result<()> {
    let resolver = DelegationResolver::new(registry, config);
    let first = |options: &[String], _depth: usize| options.first().cloned();
    let path = match from {
        Some(start) => resolver.search_path_from(start, &first, stop_at_leaf)?,
        None => resolver.search_path(&first)?,
    };
    println!("{}", path.join(" -> "));
    Ok(())
}

async fn run_pipeline(
    registry: Arc<SpecialistRegistry>,
    config: HeapConfig,
    store: Option<Arc<dyn JobStore>>,
    decision: &DecisionArgs,
    no_halt: bool,
) -> Result<()> {
    let (output, intent) = decision.load()?;
    let dispatcher = Dispatcher::new(ExecutionQueue::from_config(&config), Arc::new(EchoRunner))
        .with_halt_on_failure(!no_halt);
    let pipeline = Arc::new(
        Pipeline::new(
            registry,
            &config,
            Arc::new(StaticRouter(output)),
            Arc::new(FirstOption),
            Arc::new(EchoRunner),
        )
        .with_dispatcher(dispatcher),
    );

    let executor = ExecutionQueue::new(1);
    let jobs = match store {
        Some(store) => JobQueue::with_store(executor, store),
        None => JobQueue::new(executor),
    };
    jobs.register(
        "pipeline",
        handler_fn(move |payload: Value| {
            let pipeline = pipeline.clone();
            async move {
                let task = payload["task"].as_str().unwrap_or_default().to_string();
                let report = pipeline.run(&task, &intent).await?;
                Ok::<_, HeapError>(serde_json::to_value(report)?)
            }
        }),
    );

    let mut events = jobs.subscribe();
    let id = jobs
        .enqueue_typed("pipeline", json!({ "task": decision.task }))
        .await?;
    loop {
        match events.recv().await? {
            QueueEvent::Completed { job_id }
            | QueueEvent::Failed { job_id, .. }
            | QueueEvent::Cancelled { job_id }
                if job_id == id =>
            {
                break
            }
            _ => {}
        }
    }

    let job = jobs
        .get_job(id)
        .await?
        .with_context(|| format!("job {} vanished", id))?;
    tracing::info!(job_id = %id, status = job.status.as_str(), "pipeline job settled");
    print_json(&job)
}

async fn run_jobs(
    store: Option<Arc<dyn JobStore>>,
    status: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let Some(store) = store else {
        anyhow::bail!("listing jobs needs --database-url or SWITCHBOARD_DATABASE_URL");
    };

    let mut filter = JobFilter::all();
    if let Some(status) = status {
        let status: JobStatus = status.parse().map_err(anyhow::Error::msg)?;
        filter = filter.with_status(status);
    }
    if let Some(limit) = limit {
        filter = filter.with_limit(limit);
    }

    for job in store.list(&filter).await? {
        println!(
            "{}  {:<10} {:<9} {}",
            job.id,
            job.job_type,
            job.status.as_str(),
            job.enqueued_at.to_rfc3339()
        );
    }
    Ok(())
}
