//! artifex CLI — operator interface to the artifact pipeline.

use std::str::FromStr;
use std::sync::Arc;

use artifex::artifact::ArtifactType;
use artifex::config::Config;
use artifex::event::EventBus;
use artifex::llm::{RigGenerator, anthropic_client};
use artifex::model::{GenerationOptions, NewArtifactJob};
use artifex::retrieval::StaticRetriever;
use artifex::service::JobService;
use artifex::store::JobStore;
use artifex::worker::{Worker, WorkerConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[derive(Parser)]
#[command(name = "artifex", about = "Study-artifact generation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run worker processes against the job queue
    Serve {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 2)]
        workers: usize,
    },
    /// Artifact job operations
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
}

#[derive(Subcommand)]
enum JobAction {
    /// Submit a new artifact job
    Submit {
        /// Owner of the request
        user: String,
        /// Notebook the artifact is generated from
        notebook: String,
        /// Artifact type: quiz, flashcards, or mindmap
        artifact_type: String,
        /// Study content (or @path to read a file)
        content: String,
        /// Target number of questions/cards
        #[arg(long)]
        items: Option<u32>,
        /// Requested difficulty
        #[arg(long)]
        difficulty: Option<String>,
        /// Topic to emphasise
        #[arg(long)]
        focus: Option<String>,
        /// Token budget override
        #[arg(long)]
        budget: Option<u32>,
    },
    /// List a user's recent jobs
    List {
        user: String,
        /// Maximum jobs to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show a job
    Show {
        /// Job ID (full UUID or prefix)
        id: String,
        /// User owning the job (needed for prefix search)
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    match cli.command {
        Command::Serve { workers } => cmd_serve(workers).await,
        Command::Job { action } => {
            let db_path =
                std::env::var("ARTIFEX_DB").unwrap_or_else(|_| "artifex.db".to_string());
            let store = Arc::new(JobStore::open(&db_path)?);
            // The notebook RAG service is an external collaborator; in the
            // CLI the submitted content is the whole corpus.
            let service = Arc::new(JobService::new(store, Arc::new(StaticRetriever::passthrough())));

            match action {
                JobAction::Submit {
                    user,
                    notebook,
                    artifact_type,
                    content,
                    items,
                    difficulty,
                    focus,
                    budget,
                } => {
                    cmd_job_submit(
                        &service,
                        user,
                        notebook,
                        artifact_type,
                        content,
                        items,
                        difficulty,
                        focus,
                        budget,
                    )
                    .await
                }
                JobAction::List { user, limit } => cmd_job_list(&service, user, limit),
                JobAction::Show { id, user } => cmd_job_show(&service, id, user),
            }
        }
    }
}

async fn cmd_serve(workers: usize) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let store = Arc::new(JobStore::open(&config.db_path)?);
    let service = Arc::new(JobService::new(store, Arc::new(StaticRetriever::passthrough())));
    let events = Arc::new(EventBus::default());

    let client = anthropic_client(&config.anthropic_api_key)
        .map_err(|e| anyhow::anyhow!("failed to create Anthropic client: {e}"))?;
    let provider = Arc::new(RigGenerator::new(client, config.model.clone()));

    // Print terminal-state notifications as they arrive.
    let mut notifications = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = notifications.recv().await {
            println!(
                "[{}] job {} ({})",
                event.event_type(),
                event.job_id,
                event.artifact_type
            );
        }
    });

    let mut handles = Vec::new();
    let mut shutdowns = Vec::new();
    for i in 0..workers {
        let worker = Worker::new(
            format!("worker-{i}"),
            Arc::clone(&service),
            provider.clone(),
            Arc::clone(&events),
            WorkerConfig::default(),
        );
        shutdowns.push(worker.shutdown_handle());
        handles.push(tokio::spawn(async move { worker.run().await }));
    }

    tokio::signal::ctrl_c().await.ok();
    for shutdown in &shutdowns {
        shutdown.notify_one();
    }
    for handle in handles {
        handle.await.ok();
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_job_submit(
    service: &JobService,
    user: String,
    notebook: String,
    artifact_type: String,
    content: String,
    items: Option<u32>,
    difficulty: Option<String>,
    focus: Option<String>,
    budget: Option<u32>,
) -> anyhow::Result<()> {
    let artifact_type = ArtifactType::from_str(&artifact_type)
        .map_err(|_| anyhow::anyhow!("invalid artifact type: {artifact_type}"))?;

    let content = match content.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => content,
    };

    let mut new = NewArtifactJob::new(user, notebook, artifact_type, content).options(
        GenerationOptions {
            item_count: items,
            difficulty,
            focus,
            max_depth: None,
        },
    );
    if let Some(budget) = budget {
        new = new.token_budget(budget);
    }

    let job = service.create_job(new).await?;
    println!("{} (status: {})", job.id, job.status);
    Ok(())
}

fn cmd_job_list(service: &JobService, user: String, limit: u32) -> anyhow::Result<()> {
    let jobs = service.list_recent(&user, limit)?;

    if jobs.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<12}  {:<10}  {:>4}  {:>8}  CREATED",
        "ID", "TYPE", "STATUS", "PROG", "TOKENS"
    );
    println!("{}", "-".repeat(70));
    for job in &jobs {
        println!(
            "{:<8}  {:<12}  {:<10}  {:>3}%  {:>8}  {}",
            job.id.to_string(),
            job.artifact_type.to_string(),
            job.status.to_string(),
            job.progress,
            job.tokens_used,
            job.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("\n{} job(s)", jobs.len());
    Ok(())
}

fn cmd_job_show(service: &JobService, id_str: String, user: Option<String>) -> anyhow::Result<()> {
    // Support prefix matching — find the job whose ID starts with the input.
    let job = if id_str.len() < 36 {
        let Some(user) = user else {
            anyhow::bail!("prefix search needs --user");
        };
        let jobs = service.list_recent(&user, 100)?;
        let mut matches: Vec<_> = jobs
            .into_iter()
            .filter(|job| job.id.0.to_string().starts_with(&id_str))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no job matching prefix '{id_str}'"),
            1 => matches.remove(0),
            n => anyhow::bail!("{n} jobs match prefix '{id_str}' — be more specific"),
        }
    } else {
        let uuid = uuid::Uuid::parse_str(&id_str)?;
        service.get(artifex::model::JobId(uuid))?
    };

    println!("ID:           {}", job.id.0);
    println!("User:         {}", job.user_id);
    println!("Notebook:     {}", job.notebook_id);
    println!("Type:         {}", job.artifact_type);
    println!("Status:       {}", job.status);
    println!("Progress:     {}%", job.progress);
    println!(
        "Worker:       {}",
        job.worker_id.as_deref().unwrap_or("-")
    );
    println!("Tokens:       {}/{}", job.tokens_used, job.token_budget);
    println!("Retries:      {}", job.retry_count);
    println!("Created:      {}", job.created_at);
    println!("Updated:      {}", job.updated_at);
    if let Some(started) = job.started_at {
        println!("Started:      {started}");
    }
    if let Some(completed) = job.completed_at {
        println!("Completed:    {completed}");
    }
    if let Some(ref plan) = job.plan {
        println!("---");
        println!("Plan:         {}", serde_json::to_string_pretty(plan)?);
    }
    if let Some(ref result) = job.result {
        println!("---");
        println!("Result:       {}", serde_json::to_string_pretty(result)?);
    }
    if let Some(ref error) = job.error {
        println!("---");
        println!("Error:        {error}");
    }
    Ok(())
}
