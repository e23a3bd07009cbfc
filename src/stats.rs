use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use crate::transport::{EndpointTarget, Mode, OutcomeKind, ProbeOutcome};

/// Share of the score driven by success rate. Reliability dominates: a
/// fast but flaky resolver must not outrank a reliably adequate one.
pub const WEIGHT_SUCCESS: f64 = 0.60;
/// Share driven by tail latency (p95).
pub const WEIGHT_TAIL: f64 = 0.25;
/// Share driven by latency consistency (jitter).
pub const WEIGHT_JITTER: f64 = 0.15;

/// Per-outcome-kind probe counts for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
	pub success: usize,
	pub nxdomain: usize,
	pub servfail: usize,
	pub timeout: usize,
	pub http_error: usize,
	pub parse_error: usize,
	pub transport_error: usize,
}

impl OutcomeCounts {
	pub fn record(&mut self, kind: OutcomeKind) {
		match kind {
			OutcomeKind::Success => self.success += 1,
			OutcomeKind::NxDomain => self.nxdomain += 1,
			OutcomeKind::ServFail => self.servfail += 1,
			OutcomeKind::Timeout => self.timeout += 1,
			OutcomeKind::HttpError => self.http_error += 1,
			OutcomeKind::ParseError => self.parse_error += 1,
			OutcomeKind::TransportError => self.transport_error += 1,
		}
	}

	pub fn get(&self, kind: OutcomeKind) -> usize {
		match kind {
			OutcomeKind::Success => self.success,
			OutcomeKind::NxDomain => self.nxdomain,
			OutcomeKind::ServFail => self.servfail,
			OutcomeKind::Timeout => self.timeout,
			OutcomeKind::HttpError => self.http_error,
			OutcomeKind::ParseError => self.parse_error,
			OutcomeKind::TransportError => self.transport_error,
		}
	}

	pub fn sum(&self) -> usize {
		self.success + self.nxdomain + self.servfail + self.timeout
			+ self.http_error + self.parse_error + self.transport_error
	}
}

/// Aggregate statistics and score for one endpoint, rebuilt fresh from
/// the retained outcome set.
#[derive(Debug, Clone)]
pub struct EndpointStats {
	pub endpoint: EndpointTarget,
	pub n_total: usize,
	pub counts: OutcomeCounts,
	/// Fraction of probes classified Success, 0..1.
	pub success_rate: f64,
	pub p50_ms: Option<f64>,
	pub p95_ms: Option<f64>,
	pub avg_ms: Option<f64>,
	/// Sample standard deviation of successful latencies; 0 with fewer
	/// than 2 successes.
	pub jitter_ms: f64,
	/// Fractions of all probes, 0..1.
	pub truncation_rate: f64,
	pub tcp_fallback_rate: f64,
	pub connection_reuse_rate: f64,
	/// p95 of response sizes in bytes, over probes that carried a body.
	pub resp_size_p95: Option<f64>,
	/// Most common negotiated HTTP version among DoH responses.
	pub http_version_mode: Option<String>,
	pub score: f64,
}

/// Final ranked result of a run.
#[derive(Debug, Clone)]
pub struct RunResult {
	/// Sorted by score descending, p50 ascending, provider ascending.
	pub endpoints: Vec<EndpointStats>,
	pub mode: Mode,
	pub passes: u32,
	pub retained_passes: u32,
}

impl RunResult {
	pub fn empty(mode: Mode, passes: u32) -> Self {
		RunResult { endpoints: Vec::new(), mode, passes, retained_passes: 0 }
	}

	pub fn aggregation_label(&self) -> &'static str {
		if self.mode == Mode::Warm && self.passes > 1 { "warm" } else { "mixed" }
	}
}

/// Calculate the p-th percentile of a sorted slice with linear
/// interpolation between closest ranks.
pub fn percentile(sorted_values: &[f64], p: f64) -> Option<f64> {
	if sorted_values.is_empty() {
		return None;
	}
	if p <= 0.0 {
		return Some(sorted_values[0]);
	}
	if p >= 100.0 {
		return Some(sorted_values[sorted_values.len() - 1]);
	}
	let k = (sorted_values.len() - 1) as f64 * (p / 100.0);
	let floor = k.floor() as usize;
	let ceil = (floor + 1).min(sorted_values.len() - 1);
	if floor == ceil {
		return Some(sorted_values[floor]);
	}
	let d0 = sorted_values[floor] * (ceil as f64 - k);
	let d1 = sorted_values[ceil] * (k - floor as f64);
	Some(d0 + d1)
}

/// Calculate the arithmetic mean of a slice of values.
pub fn mean(values: &[f64]) -> Option<f64> {
	if values.is_empty() {
		return None;
	}
	let sum: f64 = values.iter().sum();
	Some(sum / values.len() as f64)
}

/// Calculate the sample standard deviation (n - 1 denominator).
/// Undefined below two values.
pub fn stddev_sample(values: &[f64]) -> Option<f64> {
	if values.len() < 2 {
		return None;
	}
	let avg = mean(values)?;
	let variance = values.iter()
		.map(|v| (v - avg).powi(2))
		.sum::<f64>() / (values.len() - 1) as f64;
	Some(variance.sqrt())
}

/// Normalization baseline for the latency and jitter score components.
///
/// Components scale against the run's probe timeout -- the worst latency
/// a successful probe can exhibit -- so a lone fast endpoint still
/// scores near 100 and scores are comparable across runs sharing a
/// timeout.
#[derive(Debug, Clone, Copy)]
pub struct ScoreNorm {
	pub latency_ceiling_ms: f64,
}

impl ScoreNorm {
	pub fn from_timeout(timeout: Duration) -> Self {
		ScoreNorm {
			latency_ceiling_ms: (timeout.as_secs_f64() * 1000.0).max(1.0),
		}
	}
}

/// Compute the 0-100 quality score from success rate (0..1), tail
/// latency, and jitter.
///
/// Each latency-ish component maps to [0, 1] as 1 - value/ceiling and is
/// weighted by the constants above. Monotonic: more successes never
/// lower the score, higher p95 or jitter never raise it. Zero successes
/// score 0.
pub fn compute_score(
	success_rate: f64,
	p95_ms: Option<f64>,
	jitter_ms: f64,
	norm: &ScoreNorm,
) -> f64 {
	if success_rate <= 0.0 {
		return 0.0;
	}
	let p95 = match p95_ms {
		Some(v) => v,
		None => return 0.0,
	};
	let tail = 1.0 - (p95 / norm.latency_ceiling_ms).clamp(0.0, 1.0);
	let stable = 1.0 - (jitter_ms / norm.latency_ceiling_ms).clamp(0.0, 1.0);
	100.0 * (WEIGHT_SUCCESS * success_rate + WEIGHT_TAIL * tail + WEIGHT_JITTER * stable)
}

/// Reduce one endpoint's retained outcomes to summary statistics and a
/// score. Percentiles and jitter cover successful latencies only; rate
/// fields cover all probes.
pub fn aggregate_endpoint(
	endpoint: &EndpointTarget,
	outcomes: &[&ProbeOutcome],
	norm: &ScoreNorm,
) -> EndpointStats {
	let n_total = outcomes.len();
	let mut counts = OutcomeCounts::default();
	let mut ok_latencies: Vec<f64> = Vec::new();
	let mut sizes: Vec<f64> = Vec::new();
	let mut truncated = 0usize;
	let mut tcp_fallback = 0usize;
	let mut reused = 0usize;
	let mut versions: HashMap<String, usize> = HashMap::new();

	for outcome in outcomes {
		counts.record(outcome.kind);
		if outcome.kind == OutcomeKind::Success {
			if let Some(latency) = outcome.latency_ms {
				ok_latencies.push(latency);
			}
		}
		if let Some(size) = outcome.response_size {
			if size > 0 {
				sizes.push(size as f64);
			}
		}
		if outcome.detail.truncated {
			truncated += 1;
		}
		if outcome.detail.tcp_fallback_used {
			tcp_fallback += 1;
		}
		if outcome.detail.connection_reused {
			reused += 1;
		}
		if let Some(version) = &outcome.http_version {
			*versions.entry(version.clone()).or_insert(0) += 1;
		}
	}

	ok_latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
	sizes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

	let p50_ms = percentile(&ok_latencies, 50.0);
	let p95_ms = percentile(&ok_latencies, 95.0);
	let avg_ms = mean(&ok_latencies);
	let jitter_ms = stddev_sample(&ok_latencies).unwrap_or(0.0);

	debug_assert_eq!(counts.sum(), n_total);

	let rate = |count: usize| {
		if n_total > 0 { count as f64 / n_total as f64 } else { 0.0 }
	};
	let success_rate = rate(counts.success);

	// Deterministic modal version: highest count, name breaks ties
	let mut version_list: Vec<(String, usize)> = versions.into_iter().collect();
	version_list.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
	let http_version_mode = version_list.into_iter().next().map(|(v, _)| v);

	let score = compute_score(success_rate, p95_ms, jitter_ms, norm);

	EndpointStats {
		endpoint: endpoint.clone(),
		n_total,
		counts,
		success_rate,
		p50_ms,
		p95_ms,
		avg_ms,
		jitter_ms,
		truncation_rate: rate(truncated),
		tcp_fallback_rate: rate(tcp_fallback),
		connection_reuse_rate: rate(reused),
		resp_size_p95: percentile(&sizes, 95.0),
		http_version_mode,
		score,
	}
}

/// Order endpoints for the final report: score descending, then p50
/// ascending (absent latencies last), then provider name ascending.
/// A deterministic total order keeps output stable and diffable.
pub fn rank_endpoints(mut stats: Vec<EndpointStats>) -> Vec<EndpointStats> {
	stats.sort_by(|a, b| {
		b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal)
			.then_with(|| {
				let a_p50 = a.p50_ms.unwrap_or(f64::INFINITY);
				let b_p50 = b.p50_ms.unwrap_or(f64::INFINITY);
				a_p50.partial_cmp(&b_p50).unwrap_or(Ordering::Equal)
			})
			.then_with(|| a.endpoint.provider.cmp(&b.endpoint.provider))
	});
	stats
}
