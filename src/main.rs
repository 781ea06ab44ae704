//! Agora - entry point
//!
//! Sets up logging and the async runtime, wires the decision stack
//! together, populates a world and runs the step engine.

use agora::core::config::Config;
use agora::core::error::Result;
use agora::decision::cache::ResponseCache;
use agora::decision::client::{
    DecisionClient, DecisionService, HttpDecisionService, OfflineDecisionService,
};
use agora::decision::coordinator::DecisionCoordinator;
use agora::decision::rate_limit::RateLimiter;
use agora::simulation::StepEngine;
use agora::world::metrics::MetricsCollector;
use agora::world::World;

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;

#[derive(Parser)]
#[command(name = "agora", about = "Society simulation driven by an external decision service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the society simulation
    Run {
        /// Number of actors to simulate
        #[arg(long, short, default_value_t = 50)]
        actors: usize,

        /// Number of simulation steps
        #[arg(long, short, default_value_t = 1_000)]
        steps: u64,

        /// Configuration file path (TOML)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the decision service entirely; every decision comes from
        /// the deterministic fallback generator
        #[arg(long)]
        offline: bool,

        /// Output directory for snapshots
        #[arg(long, short, default_value = "./results")]
        output: String,
    },
    /// Run a small offline demo scenario
    Demo {
        #[arg(long, default_value_t = 10)]
        actors: usize,

        #[arg(long, default_value_t = 20)]
        steps: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("agora=info")),
        )
        .init();

    let cli = Cli::parse();
    let rt = Runtime::new()?;

    match cli.command {
        Command::Run {
            actors,
            steps,
            config,
            seed,
            offline,
            output,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::default(),
            };
            config.actors.count = actors;
            config.step.max_steps = steps;
            if let Some(seed) = seed {
                config.step.seed = seed;
            }
            config.output.directory = output;
            config.validate()?;

            let service: Arc<dyn DecisionService> = if offline {
                Arc::new(OfflineDecisionService)
            } else {
                match HttpDecisionService::from_env(&config.decision.model) {
                    Ok(service) => Arc::new(service),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "no decision service configured; using rule-based fallback decisions"
                        );
                        Arc::new(OfflineDecisionService)
                    }
                }
            };

            rt.block_on(run_simulation(config, service))
        }
        Command::Demo { actors, steps } => {
            let mut config = Config::default();
            config.actors.count = actors;
            config.step.max_steps = steps;
            config.step.autosave_interval = 0;
            // Offline demo: fail into the fallback path immediately.
            config.decision.max_retries = 1;
            config.decision.base_backoff_ms = 1;
            config.validate()?;
            rt.block_on(run_simulation(config, Arc::new(OfflineDecisionService)))
        }
    }
}

async fn run_simulation(config: Config, service: Arc<dyn DecisionService>) -> Result<()> {
    let metrics = Arc::new(MetricsCollector::new());
    let cache = Arc::new(ResponseCache::new(config.decision.cache_capacity));
    let limiter = Arc::new(RateLimiter::new(
        config.decision.rate_limit_per_second,
        config.decision.burst,
    ));
    let client = Arc::new(DecisionClient::new(service, metrics.clone(), &config.decision));
    let coordinator =
        DecisionCoordinator::new(&config.decision, client, cache, limiter, metrics.clone());

    let mut world = World::new(&config);
    let mut rng = ChaCha8Rng::seed_from_u64(config.step.seed);
    world.populate(&config, &mut rng);

    tracing::info!(
        actors = config.actors.count,
        steps = config.step.max_steps,
        seed = config.step.seed,
        "simulation starting"
    );

    let mut engine = StepEngine::new(config.clone(), world, coordinator, metrics.clone());
    engine.run().await?;

    let final_path = std::path::Path::new(&config.output.directory).join("final_snapshot.json");
    engine.snapshot().save(&final_path)?;

    let snapshot = metrics.snapshot();
    println!("Run complete at tick {}.", engine.world().tick);
    println!(
        "  decisions: {} cache-hit, {} live, {} fallback ({:.0}% fallback)",
        snapshot.decisions_cache_hit,
        snapshot.decisions_live,
        snapshot.decisions_fallback,
        snapshot.fallback_rate() * 100.0
    );
    println!("  mean decision latency: {:.1} ms", snapshot.mean_latency_ms);
    println!("  actions: {:?}", snapshot.actions);
    println!("  snapshot: {}", final_path.display());
    Ok(())
}
