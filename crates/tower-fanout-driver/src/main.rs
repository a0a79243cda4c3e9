//! Repeats fan-out dispatches against a simulated dependency and times them.
//!
//! Runs the race strategy ("version 1") and then the drain strategy
//! ("version 2"), one request at a time, printing how long each request took
//! to resolve.
//!
//! ```bash
//! fanout-driver --runs 100 --strategy drain --seed 7
//! RUST_LOG=tower_fanout=debug fanout-driver --runs 5
//! ```

mod summary;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::time::{Duration, Instant};
use tower::Layer;
use tower_fanout::{
    DependencyName, DispatcherLayer, FanInStrategy, Request, SimulatedDependency, DEFAULT_DEPENDENCIES,
    DEFAULT_ERROR_INTERVAL, DEFAULT_MAX_DEPTH, DEFAULT_MAX_LATENCY, DEFAULT_RECURSE_INTERVAL,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::summary::{truncate_to_millis, RunSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StrategyArg {
    Race,
    Drain,
    Both,
}

impl StrategyArg {
    fn strategies(self) -> &'static [FanInStrategy] {
        match self {
            StrategyArg::Race => &[FanInStrategy::Race],
            StrategyArg::Drain => &[FanInStrategy::Drain],
            StrategyArg::Both => &[FanInStrategy::Race, FanInStrategy::Drain],
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "fanout-driver", version, about)]
struct Args {
    /// Requests to dispatch per strategy
    #[arg(long, default_value_t = 1000)]
    runs: u64,

    /// Fan-in strategy to exercise
    #[arg(long, value_enum, default_value_t = StrategyArg::Both)]
    strategy: StrategyArg,

    /// Upper bound (exclusive) of each simulated call's latency
    #[arg(long, default_value_t = DEFAULT_MAX_LATENCY.as_millis() as u64)]
    max_latency_ms: u64,

    /// One call in N fails (0 disables failures)
    #[arg(long, default_value_t = DEFAULT_ERROR_INTERVAL)]
    error_interval: u32,

    /// One failure in N is retryable
    #[arg(long, default_value_t = DEFAULT_RECURSE_INTERVAL)]
    recurse_interval: u32,

    /// Deepest retry depth before giving up
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH, conflicts_with = "unlimited_depth")]
    max_depth: u32,

    /// Retry without a depth limit
    #[arg(long)]
    unlimited_depth: bool,

    /// Seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Let abandoned calls run to completion instead of cancelling them
    #[arg(long)]
    leak_abandoned: bool,

    /// Dependency labels, one fan-out slot each
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_DEPENDENCIES.map(String::from))]
    labels: Vec<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut dependency = SimulatedDependency::builder()
        .max_latency(Duration::from_millis(args.max_latency_ms))
        .error_interval(args.error_interval)
        .recurse_interval(args.recurse_interval);
    if let Some(seed) = args.seed {
        dependency = dependency.seed(seed);
    }
    let dependency = dependency.build();

    for (version, strategy) in args.strategy.strategies().iter().enumerate() {
        println!("Running version {} ({})", version + 1, strategy);

        let dispatcher = build_layer(&args, *strategy).layer(dependency.clone());
        let mut summary = RunSummary::default();

        for id in 1..=args.runs {
            let start = Instant::now();
            let outcome = dispatcher.dispatch(Request::new(id)).await;
            let elapsed = start.elapsed();

            match &outcome {
                Ok(report) if report.retried() => {
                    info!(request_id = id, attempts = report.attempts, "succeeded after retry")
                }
                Ok(_) => {}
                Err(err) => warn!(request_id = id, "{}", err),
            }
            summary.record(&outcome, elapsed);

            println!("Duration: {:?}", truncate_to_millis(elapsed));
            println!("=======================");
        }

        println!("{}: {}", strategy, summary);
    }

    Ok(())
}

fn build_layer(args: &Args, strategy: FanInStrategy) -> DispatcherLayer {
    let builder = DispatcherLayer::builder()
        .name(format!("driver-{}", strategy))
        .strategy(strategy)
        .dependencies(args.labels.iter().map(String::as_str))
        .cancel_abandoned(!args.leak_abandoned)
        .on_dependency_success(|depth, dependency, elapsed| {
            info!("{}", success_line(depth, dependency, elapsed));
        });

    if args.unlimited_depth {
        builder.unlimited_depth().build()
    } else {
        builder.max_depth(args.max_depth).build()
    }
}

fn success_line(depth: u32, dependency: &DependencyName, elapsed: Duration) -> String {
    format!(
        "{} {}: success in {:?}",
        depth,
        dependency,
        truncate_to_millis(elapsed)
    )
}

fn init_logging(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .context("failed to initialize logging")?;

    Ok(())
}
