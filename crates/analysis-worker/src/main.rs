//! Coach - chess game analysis worker and admin CLI.
//!
//! `coach worker` runs the worker pool against the configured database; the
//! other subcommands submit games, inspect jobs and ask for even-move
//! replies.

use analysis_worker::{
    AnalysisService, AnnotationStore, CoachConfig, GameSource, JobQueue, SqliteStore, SystemClock,
    WorkerPool,
};
use chess_analysis::{
    AdaptiveResponseSelector, EnginePool, MoveAnalyzer, PositionEvaluator, ProcessFactory,
};
use chess_core::FenParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Coach - analyzes chess games with a UCI engine.
#[derive(Parser)]
#[command(name = "coach")]
#[command(about = "Analyzes chess games with a UCI engine")]
struct Args {
    /// Path to the TOML configuration file [default: coach.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to SQLite database, overriding the configuration
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker pool until interrupted
    Worker {
        /// Number of workers (and engine processes)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Store a game and queue it for analysis
    Submit {
        game_id: String,
        /// Moves in UCI or SAN, space separated
        #[arg(long)]
        moves: String,
        /// Start position, defaults to the standard one
        #[arg(long)]
        fen: Option<String>,
        #[arg(long, default_value = "0")]
        priority: i64,
        /// Restart analysis of a finished game
        #[arg(long)]
        force: bool,
    },
    /// Show a job's status and progress
    Status { game_id: String },
    /// Cancel a queued or running job
    Cancel { game_id: String },
    /// Requeue a running job that stopped making progress
    Requeue { game_id: String },
    /// Print a game's annotations and motifs as JSON lines
    Annotations { game_id: String },
    /// Pick a reply that restores the evaluation before the player's move
    EvenMove {
        #[arg(long)]
        fen: String,
        /// Evaluation shift caused by the player's move, engine's perspective
        #[arg(long, allow_hyphen_values = true)]
        eval_change: i32,
        #[arg(long, default_value = "10")]
        skill: u8,
        #[arg(long, default_value = "500")]
        movetime_ms: u64,
    },
}

struct Runtime {
    store: Arc<SqliteStore>,
    evaluator: Arc<PositionEvaluator>,
    config: CoachConfig,
}

impl Runtime {
    fn open(config: CoachConfig) -> anyhow::Result<Self> {
        let store = Arc::new(SqliteStore::open(
            &config.database,
            config.queue.policy(),
            Arc::new(SystemClock),
        )?);
        // Engines are spawned on first use, one per worker at most.
        let factory = Arc::new(ProcessFactory::new(config.engine.settings()));
        let pool = Arc::new(EnginePool::new(factory, config.queue.workers.max(1)));
        let evaluator = Arc::new(PositionEvaluator::new(pool, config.engine.max_respawns));
        Ok(Self {
            store,
            evaluator,
            config,
        })
    }

    fn service(&self) -> AnalysisService {
        let selector = AdaptiveResponseSelector::new(self.evaluator.clone(), self.config.even_move);
        AnalysisService::new(self.store.clone(), self.store.clone(), Arc::new(selector))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(CoachConfig::default_path);
    let mut config = CoachConfig::load(&config_path)?;
    if let Some(db) = args.db {
        config.database = db;
    }
    tracing::debug!("Database: {:?}", config.database);

    match args.command {
        Command::Worker { workers } => {
            if let Some(n) = workers {
                config.queue.workers = n;
            }
            run_worker(Runtime::open(config)?).await
        }
        Command::Submit {
            game_id,
            moves,
            fen,
            priority,
            force,
        } => {
            let runtime = Runtime::open(config)?;
            let moves: Vec<&str> = moves.split_whitespace().collect();
            let start = fen.as_deref().unwrap_or(FenParser::STARTPOS);
            let plies = runtime.store.save_game(&game_id, start, &moves)?;
            let report = runtime.service().trigger_analysis(&game_id, priority, force)?;
            tracing::info!(game_id = %game_id, plies, "game submitted");
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Status { game_id } => {
            let runtime = Runtime::open(config)?;
            match runtime.service().get_status(&game_id)? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => anyhow::bail!("no analysis job for game {}", game_id),
            }
            Ok(())
        }
        Command::Cancel { game_id } => {
            let runtime = Runtime::open(config)?;
            match runtime.service().cancel(&game_id)? {
                Some(status) => println!("{}: {}", game_id, status),
                None => anyhow::bail!("no analysis job for game {}", game_id),
            }
            Ok(())
        }
        Command::Requeue { game_id } => {
            let runtime = Runtime::open(config)?;
            if runtime.service().force_requeue(&game_id)? {
                println!("{}: requeued", game_id);
            } else {
                println!("{}: not analyzing, nothing to requeue", game_id);
            }
            Ok(())
        }
        Command::Annotations { game_id } => {
            let runtime = Runtime::open(config)?;
            let service = runtime.service();
            for annotation in service.annotations(&game_id)? {
                println!("{}", serde_json::to_string(&annotation)?);
            }
            for motif in service.motifs(&game_id)? {
                println!("{}", serde_json::to_string(&motif)?);
            }
            Ok(())
        }
        Command::EvenMove {
            fen,
            eval_change,
            skill,
            movetime_ms,
        } => {
            let runtime = Runtime::open(config)?;
            let choice = tokio::task::spawn_blocking(move || {
                runtime
                    .service()
                    .get_even_move(&fen, eval_change, skill, Duration::from_millis(movetime_ms))
            })
            .await??;
            let output = serde_json::json!({
                "move": choice.mv.to_uci(),
                "target": choice.target,
                "resulting_eval": choice.resulting_eval,
                "fallback": choice.fallback.map(|reason| reason.to_string()),
            });
            println!("{}", output);
            Ok(())
        }
    }
}

async fn run_worker(runtime: Runtime) -> anyhow::Result<()> {
    let settings = runtime.config.queue.pool_settings();
    tracing::info!("Starting coach worker");
    tracing::info!("Database: {:?}", runtime.config.database);
    tracing::info!("Workers: {}", settings.workers);

    let analyzer = Arc::new(MoveAnalyzer::new(
        runtime.evaluator.clone(),
        runtime.config.analysis.analyzer_config(),
    ));
    let queue: Arc<dyn JobQueue> = runtime.store.clone();
    let store: Arc<dyn AnnotationStore> = runtime.store.clone();
    let games: Arc<dyn GameSource> = runtime.store.clone();
    let pool = WorkerPool::start(&settings, queue, store, games, analyzer)?;

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    tokio::task::spawn_blocking(move || pool.shutdown()).await?;

    tracing::info!("Worker shutdown complete");
    Ok(())
}
