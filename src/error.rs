use thiserror::Error;

use crate::stats::RunResult;

/// Configuration problems detected before any probe is sent.
///
/// These are always fatal: invalid targets are rejected up front rather
/// than silently dropped from the run.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("invalid UDP resolver address '{0}'")]
	InvalidUdpAddress(String),

	#[error("invalid DoH endpoint URL '{url}': {reason}")]
	InvalidDohUrl { url: String, reason: String },

	#[error("DoH endpoint '{0}' must use an https:// URL")]
	DohSchemeNotHttps(String),

	#[error("unknown query type '{0}'")]
	UnknownQType(String),

	#[error("unknown mode '{0}' (expected 'mixed' or 'warm')")]
	UnknownMode(String),

	#[error("no endpoints left to probe")]
	NoEndpoints,
}

/// Errors that end a run.
///
/// Per-probe failures are never errors -- they are recorded as outcomes
/// and folded into statistics. Only configuration problems and systemic
/// failures (no local sockets at all) surface here.
#[derive(Debug, Error)]
pub enum RunError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Systemic failure mid-run. Carries whatever partial result had been
	/// accumulated before the abort.
	#[error("run aborted: {reason}")]
	Aborted { reason: String, partial: RunResult },
}
