use std::collections::HashSet;
use std::net::SocketAddr;

use crate::error::ConfigError;
use crate::transport::{EndpointTarget, Transport};

/// Return the curated list of well-known resolver endpoints probed by
/// default.
pub fn default_targets() -> Vec<EndpointTarget> {
	vec![
		EndpointTarget::new("Cloudflare", Transport::Udp, "1.1.1.1"),
		EndpointTarget::new("Cloudflare", Transport::Doh, "https://cloudflare-dns.com/dns-query"),
		EndpointTarget::new("Google", Transport::Udp, "8.8.8.8"),
		EndpointTarget::new("Google", Transport::Doh, "https://dns.google/dns-query"),
		// Many NextDNS DoH deployments require a config path; customize with --doh
		EndpointTarget::new("NextDNS", Transport::Udp, "45.90.28.0"),
		EndpointTarget::new("NextDNS", Transport::Udp, "45.90.30.0"),
		EndpointTarget::new("NextDNS", Transport::Doh, "https://dns.nextdns.io"),
		EndpointTarget::new("Quad9", Transport::Udp, "9.9.9.9"),
		EndpointTarget::new("Quad9", Transport::Doh, "https://dns.quad9.net/dns-query"),
		EndpointTarget::new("Quad9-ECS", Transport::Doh, "https://dns11.quad9.net/dns-query"),
		EndpointTarget::new("Mullvad", Transport::Udp, "194.242.2.2"),
		EndpointTarget::new("Mullvad", Transport::Doh, "https://dns.mullvad.net/dns-query"),
		EndpointTarget::new("AdGuard", Transport::Udp, "94.140.14.14"),
		EndpointTarget::new("AdGuard", Transport::Doh, "https://dns.adguard.com/dns-query"),
		EndpointTarget::new("LibreDNS", Transport::Doh, "https://doh.libredns.gr/dns-query"),
		EndpointTarget::new("OpenDNS", Transport::Udp, "208.67.222.222"),
	]
}

/// Parse a UDP resolver address string into a socket address.
///
/// Supports formats:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
pub fn parse_udp_address(input: &str) -> Result<SocketAddr, ConfigError> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(ConfigError::InvalidUdpAddress(input.to_string()));
	}

	if trimmed.starts_with('[') {
		// Bracketed IPv6 with port: [::1]:53
		trimmed.parse()
			.map_err(|_| ConfigError::InvalidUdpAddress(input.to_string()))
	} else if trimmed.contains("::") || trimmed.matches(':').count() > 1 {
		// Bare IPv6 address without port
		let ip = trimmed.parse()
			.map_err(|_| ConfigError::InvalidUdpAddress(input.to_string()))?;
		Ok(SocketAddr::new(ip, 53))
	} else if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		// IPv4 with port (e.g. "8.8.8.8:5353")
		Ok(addr)
	} else {
		// Plain IPv4 without port
		let ip = trimmed.parse()
			.map_err(|_| ConfigError::InvalidUdpAddress(input.to_string()))?;
		Ok(SocketAddr::new(ip, 53))
	}
}

fn validate_doh_url(url: &str) -> Result<(), ConfigError> {
	let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidDohUrl {
		url: url.to_string(),
		reason: e.to_string(),
	})?;
	if parsed.scheme() != "https" {
		return Err(ConfigError::DohSchemeNotHttps(url.to_string()));
	}
	Ok(())
}

/// Build the validated, ordered target list for one run.
///
/// Combines the provider list with user-supplied extras (provider
/// "Custom"), deduplicates by (provider, transport, address), drops UDP
/// targets when `doh_only` is set, and validates every address up front.
/// Invalid entries fail the whole run rather than being dropped.
pub fn build_targets(
	providers: &[EndpointTarget],
	extra_udp: &[String],
	extra_doh: &[String],
	doh_only: bool,
) -> Result<Vec<EndpointTarget>, ConfigError> {
	let mut combined: Vec<EndpointTarget> = providers.to_vec();
	for ip in extra_udp {
		combined.push(EndpointTarget::new("Custom", Transport::Udp, ip));
	}
	for url in extra_doh {
		combined.push(EndpointTarget::new("Custom", Transport::Doh, url));
	}

	let mut seen: HashSet<(String, Transport, String)> = HashSet::new();
	let mut out = Vec::new();
	for mut target in combined {
		if doh_only && target.transport == Transport::Udp {
			continue;
		}
		let key = (target.provider.clone(), target.transport, target.address.clone());
		if !seen.insert(key) {
			continue;
		}
		match target.transport {
			Transport::Udp => {
				target.sock_addr = Some(parse_udp_address(&target.address)?);
			}
			Transport::Doh => validate_doh_url(&target.address)?,
		}
		out.push(target);
	}
	Ok(out)
}

/// Read system resolver addresses from /etc/resolv.conf (Unix only).
///
/// Entries that do not parse as resolver addresses (e.g. scoped IPv6)
/// are skipped. Returns an empty vec on non-Unix platforms or if the
/// file cannot be read.
pub fn system_resolver_ips() -> Vec<String> {
	let content = match std::fs::read_to_string("/etc/resolv.conf") {
		Ok(c) => c,
		Err(_) => return Vec::new(),
	};
	let mut ips = Vec::new();
	for line in content.lines() {
		let trimmed = line.trim();
		if !trimmed.starts_with("nameserver") {
			continue;
		}
		let parts: Vec<&str> = trimmed.split_whitespace().collect();
		if parts.len() >= 2 && parse_udp_address(parts[1]).is_ok() {
			ips.push(parts[1].to_string());
		}
	}
	ips
}

/// Fold system resolvers into the provider list: defaults that match a
/// system resolver are annotated "(current)", and system resolvers not
/// already listed are appended under provider "System".
pub fn merge_system_resolvers(providers: &mut Vec<EndpointTarget>, system_ips: &[String]) {
	for target in providers.iter_mut() {
		if target.transport == Transport::Udp && system_ips.iter().any(|ip| ip == &target.address) {
			target.provider = format!("{} (current)", target.provider);
		}
	}
	for ip in system_ips {
		let listed = providers.iter()
			.any(|t| t.transport == Transport::Udp && &t.address == ip);
		if !listed {
			providers.push(EndpointTarget::new("System", Transport::Udp, ip));
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_ipv4_no_port() {
		let addr = parse_udp_address("1.1.1.1").unwrap();
		assert_eq!(addr.port(), 53);
		assert_eq!(addr.ip().to_string(), "1.1.1.1");
	}

	#[test]
	fn test_parse_ipv4_with_port() {
		let addr = parse_udp_address("8.8.8.8:5353").unwrap();
		assert_eq!(addr.port(), 5353);
	}

	#[test]
	fn test_parse_ipv6_bare() {
		let addr = parse_udp_address("2606:4700::1111").unwrap();
		assert_eq!(addr.port(), 53);
	}

	#[test]
	fn test_parse_ipv6_bracketed() {
		let addr = parse_udp_address("[2606:4700::1111]:853").unwrap();
		assert_eq!(addr.port(), 853);
	}

	#[test]
	fn test_parse_invalid_address() {
		assert!(parse_udp_address("not-an-ip").is_err());
		assert!(parse_udp_address("").is_err());
	}

	#[test]
	fn test_defaults_cover_both_transports() {
		let defaults = default_targets();
		assert!(defaults.iter().any(|t| t.transport == Transport::Udp));
		assert!(defaults.iter().any(|t| t.transport == Transport::Doh));
	}

	#[test]
	fn test_build_targets_validates_and_parses() {
		let targets = build_targets(&default_targets(), &[], &[], false).unwrap();
		for t in &targets {
			match t.transport {
				Transport::Udp => assert!(t.sock_addr.is_some()),
				Transport::Doh => assert!(t.address.starts_with("https://")),
			}
		}
	}

	#[test]
	fn test_build_targets_appends_customs() {
		let targets = build_targets(
			&[],
			&["9.9.9.10".to_string()],
			&["https://example.com/dns-query".to_string()],
			false,
		).unwrap();
		assert_eq!(targets.len(), 2);
		assert!(targets.iter().all(|t| t.provider == "Custom"));
	}

	#[test]
	fn test_build_targets_dedup() {
		let providers = vec![
			EndpointTarget::new("Cloudflare", Transport::Udp, "1.1.1.1"),
			EndpointTarget::new("Cloudflare", Transport::Udp, "1.1.1.1"),
		];
		let targets = build_targets(&providers, &[], &[], false).unwrap();
		assert_eq!(targets.len(), 1);
	}

	#[test]
	fn test_build_targets_doh_only() {
		let targets = build_targets(&default_targets(), &["1.0.0.1".to_string()], &[], true).unwrap();
		assert!(targets.iter().all(|t| t.transport == Transport::Doh));
	}

	#[test]
	fn test_build_targets_rejects_bad_udp() {
		let err = build_targets(&[], &["nonsense".to_string()], &[], false);
		assert!(err.is_err());
	}

	#[test]
	fn test_build_targets_rejects_non_https_doh() {
		let err = build_targets(&[], &[], &["http://dns.example/dns-query".to_string()], false);
		assert!(matches!(err, Err(ConfigError::DohSchemeNotHttps(_))));
	}

	#[test]
	fn test_build_targets_rejects_bad_url() {
		let err = build_targets(&[], &[], &["not a url".to_string()], false);
		assert!(matches!(err, Err(ConfigError::InvalidDohUrl { .. })));
	}

	#[test]
	fn test_merge_system_resolvers() {
		let mut providers = vec![
			EndpointTarget::new("Cloudflare", Transport::Udp, "1.1.1.1"),
			EndpointTarget::new("Google", Transport::Udp, "8.8.8.8"),
		];
		let system = vec!["8.8.8.8".to_string(), "192.168.1.1".to_string()];
		merge_system_resolvers(&mut providers, &system);

		assert_eq!(providers[0].provider, "Cloudflare");
		assert_eq!(providers[1].provider, "Google (current)");
		assert_eq!(providers.len(), 3);
		assert_eq!(providers[2].provider, "System");
		assert_eq!(providers[2].address, "192.168.1.1");
	}
}
