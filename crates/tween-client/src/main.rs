//! `tween` command line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tween_client::{plan, ClientConfig, Orchestrator, Strategy};
use tween_media::{recompose_repository, FfmpegRunner, FrameSelection};
use tween_models::{Position, TaskId};
use tween_queue::{InterpolationQueue, QueueConfig};
use tween_store::FrameStore;

#[derive(Parser)]
#[command(name = "tween")]
#[command(about = "Repair videos by synthesizing missing frames", long_about = None)]
struct Cli {
    /// Frame repository directory
    #[arg(short, long, default_value = ".", global = true)]
    repo: PathBuf,

    /// Kill ffmpeg after this many seconds
    #[arg(long, global = true)]
    ffmpeg_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a video into frames, audio and metadata
    Decompose {
        video: PathBuf,
    },

    /// Encode the repository (or an inclusive range of it) into a video
    Recompose {
        output: PathBuf,

        #[arg(long, requires = "last")]
        first: Option<Position>,

        #[arg(long, requires = "first")]
        last: Option<Position>,
    },

    /// Synthesize frames at the given positions
    Interpolate {
        #[arg(required = true)]
        positions: Vec<Position>,

        /// batched or progressive
        #[arg(long)]
        strategy: Option<Strategy>,

        /// Seconds to wait for each task's result
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Recompose each repaired range into this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,

        #[arg(long, env = "REDIS_URL")]
        redis_url: Option<String>,
    },

    /// Print the order targets would be synthesized in, without running it
    Schedule {
        #[arg(required = true)]
        positions: Vec<Position>,
    },

    /// Duplicate one frame onto another position
    Copy {
        source: Position,
        target: Position,
    },

    /// List committed frames
    List,

    /// Inspect or manage the shared task queue
    Queue {
        #[arg(long, env = "REDIS_URL")]
        redis_url: Option<String>,

        #[command(subcommand)]
        command: QueueCommand,
    },
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Number of queued tasks
    Pending,

    /// Ids of queued tasks, next to run first
    Tasks,

    /// Drop every queued task
    Purge,

    /// Report where a task stands
    Status { task_id: String },

    /// Withdraw a queued or running task
    Cancel { task_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required for rediss:// brokers)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_logging()?;

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if cli.ffmpeg_timeout.is_some() {
        config.ffmpeg_timeout = cli.ffmpeg_timeout;
    }
    let runner = match config.ffmpeg_timeout {
        Some(secs) => FfmpegRunner::new().with_timeout(secs),
        None => FfmpegRunner::new(),
    };

    match cli.command {
        Commands::Decompose { video } => {
            let store = FrameStore::create(&cli.repo).await?;
            let decomposition = tween_media::decompose(&video, &store, &runner)
                .await
                .with_context(|| format!("Failed to decompose {}", video.display()))?;
            println!("{}", serde_json::to_string_pretty(&decomposition)?);
        }

        Commands::Recompose { output, first, last } => {
            let store = FrameStore::open(&cli.repo).await?;
            let selection = match first.zip(last) {
                Some((first, last)) => FrameSelection::Range { first, last },
                None => FrameSelection::All,
            };
            let recomposition = recompose_repository(&store, selection, &output, &runner).await?;
            println!("{}", serde_json::to_string_pretty(&recomposition)?);
        }

        Commands::Interpolate {
            positions,
            strategy,
            timeout_secs,
            output_dir,
            redis_url,
        } => {
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            if let Some(secs) = timeout_secs {
                config.result_timeout = Duration::from_secs(secs);
            }
            if output_dir.is_some() {
                config.output_dir = output_dir;
            }

            let store = FrameStore::open(&cli.repo).await?;
            let queue = open_queue(redis_url)?;
            let orchestrator = Orchestrator::new(store, queue, config);

            let reports = orchestrator.interpolate(&positions).await?;
            let failed = reports.iter().filter(|r| !r.is_success()).count();
            for report in &reports {
                match &report.outcome {
                    Ok(summary) => println!(
                        "{}..={}: {} frames from ({}, {})",
                        report.first,
                        report.last,
                        summary.frames_written,
                        summary.left,
                        summary.right
                    ),
                    Err(e) => println!("{}..={}: failed: {}", report.first, report.last, e),
                }
            }
            if failed > 0 {
                bail!("{} of {} runs failed", failed, reports.len());
            }
        }

        Commands::Schedule { positions } => {
            let store = FrameStore::open(&cli.repo).await?;
            for step in plan(&store, &positions).await? {
                println!("{}", step);
            }
        }

        Commands::Copy { source, target } => {
            let store = FrameStore::open(&cli.repo).await?;
            let generation = store.copy(source, target).await?;
            info!(%source, %target, %generation, "Copied frame");
        }

        Commands::List => {
            let store = FrameStore::open(&cli.repo).await?;
            for position in store.list().await? {
                match store.record(position).await? {
                    Some(record) => println!(
                        "{}\t{}\t{}",
                        position, record.provenance, record.generation
                    ),
                    None => println!("{}", position),
                }
            }
        }

        Commands::Queue { redis_url, command } => {
            let queue = open_queue(redis_url)?;
            match command {
                QueueCommand::Pending => println!("{}", queue.pending().await?),
                QueueCommand::Tasks => {
                    for task_id in queue.queued_task_ids().await? {
                        println!("{}", task_id);
                    }
                }
                QueueCommand::Purge => println!("{}", queue.purge().await?),
                QueueCommand::Status { task_id } => {
                    let task_id = TaskId::from_string(task_id);
                    println!("{}\t{}", task_id, queue.status(&task_id).await?);
                }
                QueueCommand::Cancel { task_id } => {
                    let task_id = TaskId::from_string(task_id);
                    let previous = queue.cancel(&task_id).await?;
                    if previous.is_finished() {
                        println!("{}\talready {}", task_id, previous);
                    } else {
                        println!("{}\tcancelled (was {})", task_id, previous);
                    }
                }
            }
        }
    }

    Ok(())
}

fn open_queue(redis_url: Option<String>) -> Result<InterpolationQueue> {
    let mut config = QueueConfig::from_env();
    if let Some(url) = redis_url {
        config.redis_url = url;
    }
    InterpolationQueue::new(config).context("Failed to create task queue")
}

fn init_logging() -> Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("tween=info".parse()?);

    // stdout carries command output
    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    }
    Ok(())
}
