use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::dispatch::{dispatch_pass, ProgressCallback, ProgressTracker};
use crate::driver::DohPool;
use crate::error::{ConfigError, RunError};
use crate::stats::{aggregate_endpoint, rank_endpoints, RunResult, ScoreNorm};
use crate::targets::build_targets;
use crate::transport::{EndpointTarget, Mode, ProbeOutcome, RunConfig};

/// Cooperative cancellation handle shared with in-flight probe tasks.
/// Setting it stops new probes from being issued; probes already in
/// flight finish or time out on their own.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
	pub fn cancel(&self) {
		self.0.store(true, Ordering::Relaxed);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Relaxed)
	}
}

/// Execute a full measurement run: build targets, dispatch every pass,
/// pool the retained outcomes, and rank the endpoints.
///
/// Per-probe failures are data and never abort the run. The only abort
/// conditions are configuration errors (before any probe) and systemic
/// local failure, which surfaces as `RunError::Aborted` carrying the
/// partial result.
pub async fn run(
	config: &RunConfig,
	progress_cb: Option<ProgressCallback<'_>>,
	cancel: CancelFlag,
) -> Result<RunResult, RunError> {
	let targets = build_targets(
		&config.providers, &config.extra_udp, &config.extra_doh, config.doh_only,
	)?;
	if targets.is_empty() {
		return Err(ConfigError::NoEndpoints.into());
	}

	let passes = config.passes.max(1);
	let pool = DohPool::build(&targets, config.keepalive, config.pool_size, config.timeout)
		.map_err(|e| RunError::Aborted {
			reason: format!("failed to build DoH client pool: {}", e),
			partial: RunResult::empty(config.mode, passes),
		})?;
	debug!(doh_clients = pool.len(), "built DoH client pool");
	let pool = Arc::new(pool);

	let per_pass = targets.len() * config.domains.len() * config.qtypes.len();
	let mut tracker = ProgressTracker::new(per_pass * passes as usize, config.timeout);
	let mut rng = match config.seed {
		Some(seed) => StdRng::seed_from_u64(seed),
		None => StdRng::from_entropy(),
	};

	let mut collected: Vec<ProbeOutcome> = Vec::with_capacity(per_pass * passes as usize);
	for pass in 1..=passes {
		if cancel.is_cancelled() {
			info!(pass, "run cancelled, aggregating collected outcomes");
			break;
		}
		debug!(pass, passes, probes = per_pass, "starting pass");
		let report = dispatch_pass(
			&targets, &config.domains, &config.qtypes, pass, config,
			pool.clone(), &mut tracker, progress_cb, &cancel, &mut rng,
		).await;

		let systemic = !report.outcomes.is_empty()
			&& report.local_failures == report.outcomes.len();
		collected.extend(report.outcomes);

		if systemic {
			warn!(pass, "every probe failed to open a local socket, aborting");
			return Err(RunError::Aborted {
				reason: "unable to open any local socket".to_string(),
				partial: finalize(&targets, &collected, config, passes),
			});
		}
	}

	Ok(finalize(&targets, &collected, config, passes))
}

/// Number of leading passes excluded from aggregation.
fn discarded_passes(config: &RunConfig, passes: u32) -> u32 {
	if config.mode == Mode::Warm && passes > 1 {
		config.warmup_discard.min(passes - 1)
	} else {
		0
	}
}

/// Pool retained outcomes per endpoint and rank the aggregates.
fn finalize(
	targets: &[EndpointTarget],
	outcomes: &[ProbeOutcome],
	config: &RunConfig,
	passes: u32,
) -> RunResult {
	let discard = discarded_passes(config, passes);
	let norm = ScoreNorm::from_timeout(config.timeout);

	let mut stats = Vec::with_capacity(targets.len());
	for target in targets {
		let retained: Vec<&ProbeOutcome> = outcomes.iter()
			.filter(|o| o.pass_index > discard && o.unit.endpoint == *target)
			.collect();
		stats.push(aggregate_endpoint(target, &retained, &norm));
	}

	RunResult {
		endpoints: rank_endpoints(stats),
		mode: config.mode,
		passes,
		retained_passes: passes - discard,
	}
}
