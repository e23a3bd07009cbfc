mod classify;
mod cli;
mod dispatch;
mod dns;
mod domains;
mod driver;
mod error;
mod output;
mod run;
mod stats;
mod targets;
mod transport;

use std::time::Duration;

use anyhow::ensure;
use clap::Parser;

use crate::cli::Cli;
use crate::dispatch::ProgressEvent;
use crate::error::RunError;
use crate::run::CancelFlag;
use crate::transport::{Mode, RunConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();
	ensure!(cli.timeout > 0.0, "timeout must be positive");

	let mode: Mode = cli.mode.parse()?;
	let qtypes = transport::parse_qtypes(&cli.qtypes)?;

	// Curated defaults, annotated with whatever the host currently uses
	let mut providers = targets::default_targets();
	if !cli.no_system {
		let system_ips = targets::system_resolver_ips();
		targets::merge_system_resolvers(&mut providers, &system_ips);
	}

	let domains = domains::pick_domains(cli.domains, cli.seed);

	let config = RunConfig {
		providers,
		domains,
		qtypes,
		timeout: Duration::from_secs_f64(cli.timeout),
		seed: cli.seed,
		edns_payload: cli.edns_payload,
		mode,
		passes: cli.passes.max(1),
		warmup_discard: cli.warmup_discard,
		keepalive: !cli.no_keepalive,
		doh_only: cli.doh_only,
		extra_udp: cli.udp.clone(),
		extra_doh: cli.doh.clone(),
		concurrency: cli.concurrency,
		pool_size: cli.pool_size,
	};

	output::print_run_header(&config);

	let cancel = CancelFlag::default();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				cancel.cancel();
			}
		});
	}

	let progress = |event: &ProgressEvent| output::print_status(event);
	let result = match run::run(&config, Some(&progress), cancel).await {
		Ok(result) => result,
		Err(RunError::Aborted { reason, partial }) => {
			eprintln!("\nrun aborted: {}", reason);
			partial
		}
		Err(e) => return Err(e.into()),
	};
	println!("\n");

	if cli.comprehensive {
		output::print_comprehensive_table(&result);
	} else {
		output::print_summary_table(&result);
	}

	if let Some(path) = &cli.output {
		output::write_csv(path, &result)?;
	}

	Ok(())
}
