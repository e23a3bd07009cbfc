use std::io::Write;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use crate::dispatch::ProgressEvent;
use crate::stats::{EndpointStats, RunResult};
use crate::transport::{Mode, OutcomeKind, RunConfig, Transport};

/// Print a one-line description of the run scope before probing starts.
pub fn print_run_header(config: &RunConfig) {
	let qtypes: Vec<&str> = config.qtypes.iter().map(|q| q.label()).collect();
	let servers = if config.doh_only {
		config.providers.iter().filter(|t| t.transport == Transport::Doh).count()
			+ config.extra_doh.len()
	} else {
		config.providers.len() + config.extra_udp.len() + config.extra_doh.len()
	};
	let keepalive = if config.keepalive { "on" } else { "off" };
	println!(
		"Run: mode={}, passes={}, qtypes={}, domains={}, servers={}, timeout={:.1}s, edns_payload={}, DoH_keepalive={}",
		if config.mode == Mode::Warm { "warm" } else { "mixed" },
		config.passes,
		qtypes.join("/"),
		config.domains.len(),
		servers,
		config.timeout.as_secs_f64(),
		config.edns_payload,
		keepalive,
	);
}

/// Format a duration in seconds as "SSs" or "MMmSSs".
fn format_duration(seconds: f64) -> String {
	let seconds = seconds.max(0.0) as u64;
	if seconds < 60 {
		format!("{:02}s", seconds)
	} else {
		format!("{:02}m{:02}s", seconds / 60, seconds % 60)
	}
}

fn status_line(event: &ProgressEvent) -> String {
	let pct = if event.total == 0 {
		0
	} else {
		event.done * 100 / event.total
	};
	format!(
		"Progress {}/{} ({}%) | avg {:.0}ms | ETA {}",
		event.done, event.total, pct, event.avg_latency_ms,
		format_duration(event.eta_s),
	)
}

/// Rewrite the in-place progress line on stdout.
pub fn print_status(event: &ProgressEvent) {
	let mut stdout = std::io::stdout();
	let _ = write!(stdout, "\r{}          ", status_line(event));
	let _ = stdout.flush();
}

fn fmt_ms(value: Option<f64>) -> String {
	match value {
		Some(v) => format!("{:.0}", v),
		None => "—".to_string(),
	}
}

fn fmt_pct(fraction: f64) -> String {
	format!("{:.0}%", fraction * 100.0)
}

fn fmt_kb(bytes: Option<f64>) -> String {
	match bytes {
		Some(b) => format!("{:.1}", b / 1024.0),
		None => "—".to_string(),
	}
}

fn count_pct(stats: &EndpointStats, kind: OutcomeKind) -> String {
	if stats.n_total == 0 {
		return "—".to_string();
	}
	fmt_pct(stats.counts.get(kind) as f64 / stats.n_total as f64)
}

/// Compact per-endpoint annotation: fallback behavior for UDP, HTTP
/// version and reuse estimate for DoH.
fn notes_for(stats: &EndpointStats) -> String {
	let mut parts: Vec<String> = Vec::new();
	match stats.endpoint.transport {
		Transport::Udp => {
			if stats.tcp_fallback_rate >= 0.01 {
				parts.push(format!("tcpfb {}", fmt_pct(stats.tcp_fallback_rate)));
			}
			if stats.truncation_rate >= 0.01 {
				parts.push(format!("trunc {}", fmt_pct(stats.truncation_rate)));
			}
		}
		Transport::Doh => {
			if let Some(version) = &stats.http_version_mode {
				parts.push(version.clone());
			}
			if stats.connection_reuse_rate > 0.0 {
				parts.push(format!("reuse~{}", fmt_pct(stats.connection_reuse_rate)));
			}
		}
	}
	if parts.is_empty() {
		"—".to_string()
	} else {
		parts.join(", ")
	}
}

/// Print the ranked summary table.
pub fn print_summary_table(result: &RunResult) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Rank", "Score", "Provider", "Proto", "Mode",
		"Success", "p50", "p95", "Jitter", "Timeout", "Notes",
	]);

	for (i, stats) in result.endpoints.iter().enumerate() {
		table.add_row(vec![
			format!("{}", i + 1),
			format!("{:05.1}", stats.score),
			stats.endpoint.provider.clone(),
			stats.endpoint.transport.label().to_string(),
			result.aggregation_label().to_string(),
			fmt_pct(stats.success_rate),
			fmt_ms(stats.p50_ms),
			fmt_ms(stats.p95_ms),
			format!("{:.0}", stats.jitter_ms),
			count_pct(stats, OutcomeKind::Timeout),
			notes_for(stats),
		]);
	}

	println!("{table}");
}

/// Print the comprehensive drilldown table: failure breakdown, transport
/// detail rates, and response sizes per endpoint.
pub fn print_comprehensive_table(result: &RunResult) {
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec![
		"Rank", "Score", "Provider", "Proto", "Endpoint", "Mode", "N",
		"Success", "p50", "p95", "Avg", "Jitter", "Timeout",
		"NX", "SF", "HTTPerr", "ParseErr", "TransportErr",
		"Trunc", "TCPfb", "RespKB p95", "HTTPver", "Reuse~",
	]);

	for (i, stats) in result.endpoints.iter().enumerate() {
		let udp = stats.endpoint.transport == Transport::Udp;
		table.add_row(vec![
			format!("{}", i + 1),
			format!("{:05.1}", stats.score),
			stats.endpoint.provider.clone(),
			stats.endpoint.transport.label().to_string(),
			stats.endpoint.address.clone(),
			result.aggregation_label().to_string(),
			stats.n_total.to_string(),
			fmt_pct(stats.success_rate),
			fmt_ms(stats.p50_ms),
			fmt_ms(stats.p95_ms),
			fmt_ms(stats.avg_ms),
			format!("{:.0}", stats.jitter_ms),
			count_pct(stats, OutcomeKind::Timeout),
			count_pct(stats, OutcomeKind::NxDomain),
			count_pct(stats, OutcomeKind::ServFail),
			if udp { "—".to_string() } else { count_pct(stats, OutcomeKind::HttpError) },
			count_pct(stats, OutcomeKind::ParseError),
			count_pct(stats, OutcomeKind::TransportError),
			if udp { fmt_pct(stats.truncation_rate) } else { "—".to_string() },
			if udp { fmt_pct(stats.tcp_fallback_rate) } else { "—".to_string() },
			fmt_kb(stats.resp_size_p95),
			stats.http_version_mode.clone().unwrap_or_else(|| "—".to_string()),
			if udp { "—".to_string() } else { fmt_pct(stats.connection_reuse_rate) },
		]);
	}

	println!("{table}");
}

/// Write the full per-endpoint statistics to a CSV file.
pub fn write_csv(path: &str, result: &RunResult) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;

	writer.write_record([
		"rank", "provider", "transport", "address", "mode", "score",
		"n_total", "success", "nxdomain", "servfail", "timeout",
		"http_error", "parse_error", "transport_error",
		"success_rate", "p50_ms", "p95_ms", "avg_ms", "jitter_ms",
		"truncation_rate", "tcp_fallback_rate", "connection_reuse_rate",
		"resp_size_p95_bytes", "http_version",
	])?;

	for (i, stats) in result.endpoints.iter().enumerate() {
		let c = &stats.counts;
		writer.write_record([
			(i + 1).to_string(),
			stats.endpoint.provider.clone(),
			stats.endpoint.transport.label().to_string(),
			stats.endpoint.address.clone(),
			result.aggregation_label().to_string(),
			format!("{:.2}", stats.score),
			stats.n_total.to_string(),
			c.success.to_string(),
			c.nxdomain.to_string(),
			c.servfail.to_string(),
			c.timeout.to_string(),
			c.http_error.to_string(),
			c.parse_error.to_string(),
			c.transport_error.to_string(),
			format!("{:.4}", stats.success_rate),
			stats.p50_ms.map(|v| format!("{:.2}", v)).unwrap_or_default(),
			stats.p95_ms.map(|v| format!("{:.2}", v)).unwrap_or_default(),
			stats.avg_ms.map(|v| format!("{:.2}", v)).unwrap_or_default(),
			format!("{:.2}", stats.jitter_ms),
			format!("{:.4}", stats.truncation_rate),
			format!("{:.4}", stats.tcp_fallback_rate),
			format!("{:.4}", stats.connection_reuse_rate),
			stats.resp_size_p95.map(|v| format!("{:.0}", v)).unwrap_or_default(),
			stats.http_version_mode.clone().unwrap_or_default(),
		])?;
	}

	writer.flush()?;
	println!("\nResults written to: {}", path);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_format_duration() {
		assert_eq!(format_duration(0.0), "00s");
		assert_eq!(format_duration(42.7), "42s");
		assert_eq!(format_duration(60.0), "01m00s");
		assert_eq!(format_duration(125.0), "02m05s");
		assert_eq!(format_duration(-5.0), "00s");
	}

	#[test]
	fn test_status_line() {
		let line = status_line(&ProgressEvent {
			done: 12,
			total: 40,
			avg_latency_ms: 45.2,
			eta_s: 2.0,
		});
		assert_eq!(line, "Progress 12/40 (30%) | avg 45ms | ETA 02s");
	}

	#[test]
	fn test_status_line_empty_run() {
		let line = status_line(&ProgressEvent {
			done: 0,
			total: 0,
			avg_latency_ms: 0.0,
			eta_s: 0.0,
		});
		assert!(line.starts_with("Progress 0/0 (0%)"));
	}

	#[test]
	fn test_fmt_helpers() {
		assert_eq!(fmt_ms(Some(29.7)), "30");
		assert_eq!(fmt_ms(None), "—");
		assert_eq!(fmt_pct(0.75), "75%");
		assert_eq!(fmt_kb(Some(2048.0)), "2.0");
	}
}
