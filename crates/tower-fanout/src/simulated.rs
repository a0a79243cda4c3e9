//! A stand-in downstream dependency with random latency and random failures.
//!
//! Each call sleeps for a uniformly drawn latency in `[0, max_latency)`, then
//! fails with probability `1 / error_interval`. A failure is `Recurse` with
//! probability `1 / recurse_interval` and `Normal` otherwise.
//!
//! # Deterministic runs
//!
//! With a seed, every draw for a call comes from an RNG seeded by the seed
//! and the call's identity (request ID, depth, dependency label), so a call
//! behaves the same no matter how its siblings get scheduled:
//!
//! ```rust
//! use tower_fanout::SimulatedDependency;
//! use std::time::Duration;
//!
//! let dependency = SimulatedDependency::builder()
//!     .max_latency(Duration::from_millis(50))
//!     .error_interval(4)
//!     .recurse_interval(2)
//!     .seed(42)
//!     .build();
//! ```

use crate::error::DependencyError;
use crate::request::DependencyRequest;
use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::Service;

/// Default upper bound (exclusive) of the simulated latency.
pub const DEFAULT_MAX_LATENCY: Duration = Duration::from_millis(300);

/// Default failure denominator: one call in ten fails.
pub const DEFAULT_ERROR_INTERVAL: u32 = 10;

/// Default recurse denominator: one failure in three is `Recurse`.
pub const DEFAULT_RECURSE_INTERVAL: u32 = 3;

#[derive(Debug, Clone)]
struct SimulatedConfig {
    max_latency: Duration,
    error_interval: u32,
    recurse_interval: u32,
    seed: Option<u64>,
}

/// What one call will do, drawn before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Draw {
    latency: Duration,
    failure: Option<bool>,
}

impl SimulatedConfig {
    fn rng_for(&self, req: &DependencyRequest) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(call_seed(
                seed,
                req.request_id,
                req.depth,
                req.dependency.as_str(),
            )),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    fn draw(&self, rng: &mut impl Rng) -> Draw {
        let max_ms = self.max_latency.as_millis() as u64;
        let latency = if max_ms > 0 {
            Duration::from_millis(rng.random_range(0..max_ms))
        } else {
            Duration::ZERO
        };

        // `Some(true)` means the failure is Recurse
        let failure = one_in(rng, self.error_interval).then(|| one_in(rng, self.recurse_interval));

        Draw { latency, failure }
    }
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a over the little-endian seed, request ID and depth, then the
/// label bytes. Fixed so a seeded run replays the same on every platform and
/// toolchain.
fn call_seed(seed: u64, request_id: u64, depth: u32, label: &str) -> u64 {
    seed.to_le_bytes()
        .into_iter()
        .chain(request_id.to_le_bytes())
        .chain(depth.to_le_bytes())
        .chain(label.bytes())
        .fold(FNV_OFFSET_BASIS, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
}

/// Returns `true` with probability `1 / interval`; never for an interval of 0.
fn one_in(rng: &mut impl Rng, interval: u32) -> bool {
    interval > 0 && rng.random_ratio(1, interval)
}

/// Simulated dependency service.
///
/// Honors the request's cancellation token: a cancelled call stops sleeping
/// and returns [`DependencyError::Cancelled`].
#[derive(Debug, Clone)]
pub struct SimulatedDependency {
    config: Arc<SimulatedConfig>,
}

impl SimulatedDependency {
    /// A simulated dependency with the default latency and failure rates.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a builder for configuring the simulated dependency.
    pub fn builder() -> SimulatedDependencyBuilder {
        SimulatedDependencyBuilder::new()
    }
}

impl Default for SimulatedDependency {
    fn default() -> Self {
        Self::new()
    }
}

impl Service<DependencyRequest> for SimulatedDependency {
    type Response = Duration;
    type Error = DependencyError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: DependencyRequest) -> Self::Future {
        let config = Arc::clone(&self.config);

        Box::pin(async move {
            let draw = config.draw(&mut config.rng_for(&req));
            let cause = req.call_site();
            let start = Instant::now();

            tokio::select! {
                biased;

                _ = req.cancel.cancelled() => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(call = %cause, "simulated call cancelled");

                    return Err(DependencyError::Cancelled { cause });
                }
                _ = tokio::time::sleep(draw.latency) => {}
            }

            match draw.failure {
                None => Ok(start.elapsed()),
                Some(true) => Err(DependencyError::Recurse { cause }),
                Some(false) => Err(DependencyError::Normal { cause }),
            }
        })
    }
}

/// Builder for [`SimulatedDependency`].
pub struct SimulatedDependencyBuilder {
    config: SimulatedConfig,
}

impl Default for SimulatedDependencyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDependencyBuilder {
    /// Create a new builder.
    ///
    /// Defaults:
    /// - max_latency: 300ms
    /// - error_interval: 10
    /// - recurse_interval: 3
    /// - no seed (fresh entropy per call)
    pub fn new() -> Self {
        Self {
            config: SimulatedConfig {
                max_latency: DEFAULT_MAX_LATENCY,
                error_interval: DEFAULT_ERROR_INTERVAL,
                recurse_interval: DEFAULT_RECURSE_INTERVAL,
                seed: None,
            },
        }
    }

    /// Upper bound (exclusive) of the simulated latency, at millisecond resolution.
    pub fn max_latency(mut self, max_latency: Duration) -> Self {
        self.config.max_latency = max_latency;
        self
    }

    /// One call in `interval` fails. `0` disables failures, `1` fails every call.
    pub fn error_interval(mut self, interval: u32) -> Self {
        self.config.error_interval = interval;
        self
    }

    /// One failure in `interval` is `Recurse`, the rest are `Normal`.
    ///
    /// `0` makes every failure `Normal`, `1` makes every failure `Recurse`.
    pub fn recurse_interval(mut self, interval: u32) -> Self {
        self.config.recurse_interval = interval;
        self
    }

    /// Seed the draws so runs are reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Build the [`SimulatedDependency`].
    pub fn build(self) -> SimulatedDependency {
        SimulatedDependency {
            config: Arc::new(self.config),
        }
    }
}
