use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use hickory_proto::rr::RecordType;

use crate::error::ConfigError;

/// Wire transport used to reach a resolver endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
	Udp,
	Doh,
}

impl Transport {
	pub fn label(&self) -> &'static str {
		match self {
			Transport::Udp => "UDP",
			Transport::Doh => "DoH",
		}
	}
}

/// DNS query type probed against each endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QType {
	A,
	Aaaa,
	Https,
	Svcb,
	Ns,
	Mx,
	Txt,
}

impl QType {
	pub fn record_type(&self) -> RecordType {
		match self {
			QType::A => RecordType::A,
			QType::Aaaa => RecordType::AAAA,
			QType::Https => RecordType::HTTPS,
			QType::Svcb => RecordType::SVCB,
			QType::Ns => RecordType::NS,
			QType::Mx => RecordType::MX,
			QType::Txt => RecordType::TXT,
		}
	}

	pub fn label(&self) -> &'static str {
		match self {
			QType::A => "A",
			QType::Aaaa => "AAAA",
			QType::Https => "HTTPS",
			QType::Svcb => "SVCB",
			QType::Ns => "NS",
			QType::Mx => "MX",
			QType::Txt => "TXT",
		}
	}
}

impl FromStr for QType {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_uppercase().as_str() {
			"A" => Ok(QType::A),
			"AAAA" => Ok(QType::Aaaa),
			"HTTPS" => Ok(QType::Https),
			"SVCB" => Ok(QType::Svcb),
			"NS" => Ok(QType::Ns),
			"MX" => Ok(QType::Mx),
			"TXT" => Ok(QType::Txt),
			other => Err(ConfigError::UnknownQType(other.to_string())),
		}
	}
}

/// Parse a comma-separated QTYPE list, deduplicating while preserving
/// order. An empty list falls back to A.
pub fn parse_qtypes(csv: &str) -> Result<Vec<QType>, ConfigError> {
	let mut out: Vec<QType> = Vec::new();
	for token in csv.split(',') {
		let token = token.trim();
		if token.is_empty() {
			continue;
		}
		let qtype: QType = token.parse()?;
		if !out.contains(&qtype) {
			out.push(qtype);
		}
	}
	if out.is_empty() {
		out.push(QType::A);
	}
	Ok(out)
}

/// Aggregation mode. Warm excludes the configured warm-up passes from
/// final statistics when more than one pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Mixed,
	Warm,
}

impl FromStr for Mode {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"mixed" => Ok(Mode::Mixed),
			"warm" => Ok(Mode::Warm),
			other => Err(ConfigError::UnknownMode(other.to_string())),
		}
	}
}

/// A probe endpoint: one provider-labelled resolver address on one
/// transport. Identity is (provider, transport, address).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointTarget {
	pub provider: String,
	pub transport: Transport,
	/// Display form: an IP literal (optionally with port) for UDP, an
	/// https URL for DoH.
	pub address: String,
	/// Socket address for UDP targets, filled in during validation.
	pub sock_addr: Option<SocketAddr>,
}

impl EndpointTarget {
	pub fn new(provider: &str, transport: Transport, address: &str) -> Self {
		EndpointTarget {
			provider: provider.to_string(),
			transport,
			address: address.to_string(),
			sock_addr: None,
		}
	}
}

/// One probe: endpoint x domain x query type. Never mutated after
/// creation.
#[derive(Debug, Clone)]
pub struct ProbeUnit {
	pub endpoint: EndpointTarget,
	pub domain: String,
	pub qtype: QType,
}

/// Classified result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
	Success,
	NxDomain,
	ServFail,
	Timeout,
	HttpError,
	ParseError,
	TransportError,
}

/// Transport-level observations attached to an outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportDetail {
	pub truncated: bool,
	pub tcp_fallback_used: bool,
	pub connection_reused: bool,
}

/// Result of one dispatched probe. Produced exactly once per unit and
/// owned by the aggregator once emitted.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
	pub unit: ProbeUnit,
	/// 1-based pass number this outcome was collected in.
	pub pass_index: u32,
	/// Wall-clock latency. Absent when no response arrived at all.
	pub latency_ms: Option<f64>,
	pub kind: OutcomeKind,
	pub response_size: Option<usize>,
	pub detail: TransportDetail,
	/// Negotiated HTTP version for DoH probes (e.g. "HTTP/2.0").
	pub http_version: Option<String>,
}

/// Full configuration for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
	/// Curated provider endpoints, an immutable per-run value.
	pub providers: Vec<EndpointTarget>,
	/// Domains to probe, already sampled by the caller.
	pub domains: Vec<String>,
	pub qtypes: Vec<QType>,
	pub timeout: Duration,
	pub seed: Option<u64>,
	pub edns_payload: u16,
	pub mode: Mode,
	pub passes: u32,
	/// Number of leading passes excluded from aggregation in warm mode.
	pub warmup_discard: u32,
	pub keepalive: bool,
	pub doh_only: bool,
	pub extra_udp: Vec<String>,
	pub extra_doh: Vec<String>,
	/// Maximum concurrent in-flight probes.
	pub concurrency: usize,
	/// Maximum idle connections kept per DoH endpoint.
	pub pool_size: usize,
}

impl Default for RunConfig {
	fn default() -> Self {
		RunConfig {
			providers: Vec::new(),
			domains: Vec::new(),
			qtypes: vec![QType::A],
			timeout: Duration::from_secs_f64(2.5),
			seed: None,
			edns_payload: 1232,
			mode: Mode::Mixed,
			passes: 1,
			warmup_discard: 1,
			keepalive: true,
			doh_only: false,
			extra_udp: Vec::new(),
			extra_doh: Vec::new(),
			concurrency: 32,
			pool_size: 4,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_qtypes_default_list() {
		let qtypes = parse_qtypes("A,AAAA,HTTPS").unwrap();
		assert_eq!(qtypes, vec![QType::A, QType::Aaaa, QType::Https]);
	}

	#[test]
	fn test_parse_qtypes_dedup_and_case() {
		let qtypes = parse_qtypes("a, A ,aaaa").unwrap();
		assert_eq!(qtypes, vec![QType::A, QType::Aaaa]);
	}

	#[test]
	fn test_parse_qtypes_empty_falls_back_to_a() {
		let qtypes = parse_qtypes("").unwrap();
		assert_eq!(qtypes, vec![QType::A]);
	}

	#[test]
	fn test_parse_qtypes_unknown() {
		assert!(parse_qtypes("A,BOGUS").is_err());
	}

	#[test]
	fn test_mode_from_str() {
		assert_eq!("mixed".parse::<Mode>().unwrap(), Mode::Mixed);
		assert_eq!("WARM".parse::<Mode>().unwrap(), Mode::Warm);
		assert!("cold".parse::<Mode>().is_err());
	}
}
