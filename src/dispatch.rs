use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

use crate::classify::{classify, RawProbe};
use crate::driver::{doh_probe, udp_probe, DohPool};
use crate::run::CancelFlag;
use crate::transport::{
	EndpointTarget, ProbeOutcome, ProbeUnit, QType, RunConfig, Transport, TransportDetail,
};

/// Smoothing factor for the running-average latency in progress events.
const PROGRESS_EMA_ALPHA: f64 = 0.2;

/// Progress snapshot emitted after each completed probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
	pub done: usize,
	pub total: usize,
	pub avg_latency_ms: f64,
	pub eta_s: f64,
}

pub type ProgressCallback<'a> = &'a (dyn Fn(&ProgressEvent) + Send + Sync);

/// Running progress state across all passes of a run.
///
/// `done` is strictly increasing and never exceeds `total`. Failed
/// probes are sampled at the timeout penalty so the average does not
/// flatter a struggling run.
pub struct ProgressTracker {
	done: usize,
	total: usize,
	ema_ms: Option<f64>,
	timeout_penalty_ms: f64,
}

impl ProgressTracker {
	pub fn new(total: usize, timeout: Duration) -> Self {
		ProgressTracker {
			done: 0,
			total,
			ema_ms: None,
			timeout_penalty_ms: timeout.as_secs_f64() * 1000.0,
		}
	}

	fn record(&mut self, latency_ms: Option<f64>) -> ProgressEvent {
		self.done += 1;
		let sample = latency_ms.unwrap_or(self.timeout_penalty_ms);
		let avg = match self.ema_ms {
			Some(ema) => PROGRESS_EMA_ALPHA * sample + (1.0 - PROGRESS_EMA_ALPHA) * ema,
			None => sample,
		};
		self.ema_ms = Some(avg);
		let remaining = self.total.saturating_sub(self.done);
		ProgressEvent {
			done: self.done,
			total: self.total,
			avg_latency_ms: avg,
			eta_s: remaining as f64 * (avg / 1000.0),
		}
	}
}

/// Outcomes of one dispatched pass, plus the count of probes that could
/// not open a local socket (systemic-abort signal).
pub struct PassReport {
	pub outcomes: Vec<ProbeOutcome>,
	pub local_failures: usize,
}

struct ProbeDone {
	outcome: ProbeOutcome,
	socket_unavailable: bool,
}

/// Fan out the endpoints x domains x qtypes cross-product for one pass
/// under the configured concurrency ceiling.
///
/// Probe tasks report back over a channel; the collection loop here is
/// the only place progress state is updated and the callback invoked, so
/// a slow callback never blocks probe dispatch. Dispatch order is
/// shuffled per pass to avoid bursts against a single server.
pub async fn dispatch_pass(
	targets: &[EndpointTarget],
	domains: &[String],
	qtypes: &[QType],
	pass_index: u32,
	config: &RunConfig,
	pool: Arc<DohPool>,
	tracker: &mut ProgressTracker,
	progress_cb: Option<ProgressCallback<'_>>,
	cancel: &CancelFlag,
	rng: &mut StdRng,
) -> PassReport {
	let mut units: Vec<ProbeUnit> = Vec::with_capacity(
		targets.len() * domains.len() * qtypes.len(),
	);
	for endpoint in targets {
		for domain in domains {
			for &qtype in qtypes {
				units.push(ProbeUnit {
					endpoint: endpoint.clone(),
					domain: domain.clone(),
					qtype,
				});
			}
		}
	}
	units.shuffle(rng);
	debug!(pass = pass_index, probes = units.len(), "dispatching pass");

	let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
	let (tx, mut rx) = mpsc::unbounded_channel::<ProbeDone>();

	for unit in units {
		let sem = semaphore.clone();
		let tx = tx.clone();
		let pool = pool.clone();
		let cancel = cancel.clone();
		let timeout = config.timeout;
		let edns_payload = config.edns_payload;
		let keepalive = config.keepalive;

		tokio::spawn(async move {
			let _permit = sem.acquire().await.unwrap();
			// Cancelled units are simply never issued
			if cancel.is_cancelled() {
				return;
			}
			let raw = execute_unit(&unit, timeout, edns_payload, keepalive, &pool).await;
			let socket_unavailable = raw.socket_unavailable;
			let outcome = into_outcome(unit, pass_index, raw);
			let _ = tx.send(ProbeDone { outcome, socket_unavailable });
		});
	}
	drop(tx);

	let mut outcomes = Vec::new();
	let mut local_failures = 0;
	while let Some(done) = rx.recv().await {
		if done.socket_unavailable {
			local_failures += 1;
		}
		let event = tracker.record(done.outcome.latency_ms);
		if let Some(cb) = progress_cb {
			cb(&event);
		}
		outcomes.push(done.outcome);
	}

	PassReport { outcomes, local_failures }
}

async fn execute_unit(
	unit: &ProbeUnit,
	timeout: Duration,
	edns_payload: u16,
	keepalive: bool,
	pool: &DohPool,
) -> RawProbe {
	match unit.endpoint.transport {
		Transport::Udp => match unit.endpoint.sock_addr {
			Some(addr) => udp_probe(addr, &unit.domain, unit.qtype, timeout, edns_payload).await,
			None => RawProbe::transport_error(),
		},
		Transport::Doh => match pool.client_for(&unit.endpoint.address) {
			Some(client) => {
				doh_probe(
					client, &unit.endpoint.address, &unit.domain,
					unit.qtype, timeout, edns_payload, keepalive,
				).await
			}
			None => RawProbe::transport_error(),
		},
	}
}

fn into_outcome(unit: ProbeUnit, pass_index: u32, raw: RawProbe) -> ProbeOutcome {
	let kind = classify(&raw);
	ProbeOutcome {
		unit,
		pass_index,
		latency_ms: raw.latency_ms,
		kind,
		response_size: raw.response_size,
		detail: TransportDetail {
			truncated: raw.truncated,
			tcp_fallback_used: raw.tcp_fallback,
			connection_reused: raw.connection_reused,
		},
		http_version: raw.http_version,
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use rand::SeedableRng;

	use super::*;
	use crate::driver::testutil::spawn_udp_responder;
	use crate::targets::build_targets;
	use crate::transport::OutcomeKind;

	#[tokio::test]
	async fn test_dispatch_yields_one_outcome_per_unit() {
		let addr = spawn_udp_responder(false).await;
		let targets = build_targets(&[], &[addr.to_string()], &[], false).unwrap();
		let domains = vec!["example.com".to_string(), "example.org".to_string()];
		let qtypes = vec![QType::A];
		let config = RunConfig {
			timeout: Duration::from_secs(2),
			concurrency: 4,
			..RunConfig::default()
		};
		let pool = Arc::new(DohPool::build(&targets, true, 4, config.timeout).unwrap());
		let mut tracker = ProgressTracker::new(2, config.timeout);
		let mut rng = StdRng::seed_from_u64(1);

		let report = dispatch_pass(
			&targets, &domains, &qtypes, 1, &config, pool,
			&mut tracker, None, &CancelFlag::default(), &mut rng,
		).await;

		assert_eq!(report.outcomes.len(), 2);
		assert_eq!(report.local_failures, 0);
		for outcome in &report.outcomes {
			assert_eq!(outcome.kind, OutcomeKind::Success);
			assert_eq!(outcome.pass_index, 1);
		}
		// Exactly one outcome per domain
		let mut probed: Vec<&str> = report.outcomes.iter()
			.map(|o| o.unit.domain.as_str())
			.collect();
		probed.sort();
		assert_eq!(probed, vec!["example.com", "example.org"]);
	}

	#[tokio::test]
	async fn test_progress_is_monotonic() {
		let addr = spawn_udp_responder(false).await;
		let targets = build_targets(&[], &[addr.to_string()], &[], false).unwrap();
		let domains: Vec<String> = (0..4).map(|i| format!("host{}.example.com", i)).collect();
		let qtypes = vec![QType::A];
		let config = RunConfig {
			timeout: Duration::from_secs(2),
			concurrency: 2,
			..RunConfig::default()
		};
		let pool = Arc::new(DohPool::build(&targets, true, 4, config.timeout).unwrap());
		let mut tracker = ProgressTracker::new(4, config.timeout);
		let mut rng = StdRng::seed_from_u64(2);

		let events: Mutex<Vec<ProgressEvent>> = Mutex::new(Vec::new());
		let cb = |ev: &ProgressEvent| {
			events.lock().unwrap().push(*ev);
		};

		dispatch_pass(
			&targets, &domains, &qtypes, 1, &config, pool,
			&mut tracker, Some(&cb), &CancelFlag::default(), &mut rng,
		).await;

		let events = events.into_inner().unwrap();
		assert_eq!(events.len(), 4);
		for (i, ev) in events.iter().enumerate() {
			assert_eq!(ev.done, i + 1);
			assert!(ev.done <= ev.total);
			assert!(ev.avg_latency_ms >= 0.0);
			assert!(ev.eta_s >= 0.0);
		}
		assert_eq!(events.last().unwrap().eta_s, 0.0);
	}

	#[tokio::test]
	async fn test_cancelled_units_produce_no_outcome() {
		let addr = spawn_udp_responder(false).await;
		let targets = build_targets(&[], &[addr.to_string()], &[], false).unwrap();
		let domains = vec!["example.com".to_string()];
		let qtypes = vec![QType::A];
		let config = RunConfig::default();
		let pool = Arc::new(DohPool::build(&targets, true, 4, config.timeout).unwrap());
		let mut tracker = ProgressTracker::new(1, config.timeout);
		let mut rng = StdRng::seed_from_u64(3);

		let cancel = CancelFlag::default();
		cancel.cancel();
		let report = dispatch_pass(
			&targets, &domains, &qtypes, 1, &config, pool,
			&mut tracker, None, &cancel, &mut rng,
		).await;
		assert!(report.outcomes.is_empty());
	}

	#[test]
	fn test_tracker_counts_failures_at_penalty() {
		let mut tracker = ProgressTracker::new(2, Duration::from_secs(2));
		let first = tracker.record(None);
		assert_eq!(first.avg_latency_ms, 2000.0);
		let second = tracker.record(Some(100.0));
		assert!(second.avg_latency_ms < first.avg_latency_ms);
		assert_eq!(second.done, 2);
	}
}
