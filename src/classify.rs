use hickory_proto::op::ResponseCode;

use crate::transport::OutcomeKind;

/// Everything a transport driver can observe about one probe, before
/// classification. Drivers fill the facets they saw; `classify` reduces
/// them to a single outcome kind.
#[derive(Debug, Clone, Default)]
pub struct RawProbe {
	/// Wall-clock latency, present whenever a response of any kind
	/// arrived.
	pub latency_ms: Option<f64>,
	pub response_size: Option<usize>,
	pub truncated: bool,
	pub tcp_fallback: bool,
	pub connection_reused: bool,
	pub http_version: Option<String>,
	/// A local socket could not be opened at all. Feeds systemic-abort
	/// detection in the run controller.
	pub socket_unavailable: bool,
	pub transport_error: bool,
	pub timed_out: bool,
	/// HTTP status of a DoH exchange, whatever it was.
	pub http_status: Option<u16>,
	/// Response bytes arrived but did not parse as DNS wire format.
	pub malformed: bool,
	pub rcode: Option<ResponseCode>,
}

impl RawProbe {
	pub fn transport_error() -> Self {
		RawProbe { transport_error: true, ..RawProbe::default() }
	}

	pub fn socket_unavailable() -> Self {
		RawProbe { socket_unavailable: true, transport_error: true, ..RawProbe::default() }
	}

	pub fn timed_out() -> Self {
		RawProbe { timed_out: true, ..RawProbe::default() }
	}
}

/// Map a raw driver result to its outcome kind.
///
/// The precedence when several facets are set is fixed and total, since
/// it feeds the failure-breakdown percentages of the comprehensive
/// report: transport failure, then timeout, then HTTP error, then parse
/// error, then SERVFAIL, then NXDOMAIN, then success. Rcodes outside
/// {NoError, NXDOMAIN, SERVFAIL} (REFUSED and friends) classify with the
/// server-failure class. A raw result recording no response facets at
/// all counts as a transport failure.
pub fn classify(raw: &RawProbe) -> OutcomeKind {
	if raw.transport_error || raw.socket_unavailable {
		return OutcomeKind::TransportError;
	}
	if raw.timed_out {
		return OutcomeKind::Timeout;
	}
	if let Some(status) = raw.http_status {
		if !(200..300).contains(&status) {
			return OutcomeKind::HttpError;
		}
	}
	if raw.malformed {
		return OutcomeKind::ParseError;
	}
	match raw.rcode {
		Some(ResponseCode::NoError) => OutcomeKind::Success,
		Some(ResponseCode::NXDomain) => OutcomeKind::NxDomain,
		Some(_) => OutcomeKind::ServFail,
		None => OutcomeKind::TransportError,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_success() {
		let raw = RawProbe {
			latency_ms: Some(12.0),
			rcode: Some(ResponseCode::NoError),
			..RawProbe::default()
		};
		assert_eq!(classify(&raw), OutcomeKind::Success);
	}

	#[test]
	fn test_rcode_mapping() {
		let nx = RawProbe { rcode: Some(ResponseCode::NXDomain), ..RawProbe::default() };
		assert_eq!(classify(&nx), OutcomeKind::NxDomain);

		let sf = RawProbe { rcode: Some(ResponseCode::ServFail), ..RawProbe::default() };
		assert_eq!(classify(&sf), OutcomeKind::ServFail);

		// Other error rcodes land in the server-failure class
		let refused = RawProbe { rcode: Some(ResponseCode::Refused), ..RawProbe::default() };
		assert_eq!(classify(&refused), OutcomeKind::ServFail);
	}

	#[test]
	fn test_transport_beats_everything() {
		let raw = RawProbe {
			transport_error: true,
			timed_out: true,
			http_status: Some(502),
			malformed: true,
			rcode: Some(ResponseCode::ServFail),
			..RawProbe::default()
		};
		assert_eq!(classify(&raw), OutcomeKind::TransportError);
	}

	#[test]
	fn test_timeout_beats_http_error() {
		let raw = RawProbe {
			timed_out: true,
			http_status: Some(500),
			..RawProbe::default()
		};
		assert_eq!(classify(&raw), OutcomeKind::Timeout);
	}

	#[test]
	fn test_http_error_beats_parse_error() {
		let raw = RawProbe {
			http_status: Some(404),
			malformed: true,
			..RawProbe::default()
		};
		assert_eq!(classify(&raw), OutcomeKind::HttpError);
	}

	#[test]
	fn test_http_2xx_is_not_http_error() {
		let raw = RawProbe {
			http_status: Some(200),
			rcode: Some(ResponseCode::NoError),
			..RawProbe::default()
		};
		assert_eq!(classify(&raw), OutcomeKind::Success);
	}

	#[test]
	fn test_parse_error_beats_rcode() {
		let raw = RawProbe {
			malformed: true,
			rcode: Some(ResponseCode::NoError),
			..RawProbe::default()
		};
		assert_eq!(classify(&raw), OutcomeKind::ParseError);
	}

	#[test]
	fn test_no_facets_is_transport_error() {
		assert_eq!(classify(&RawProbe::default()), OutcomeKind::TransportError);
	}
}
