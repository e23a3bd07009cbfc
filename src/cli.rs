use clap::Parser;

/// DNS responsiveness measurement tool (UDP + DoH)
#[derive(Parser, Debug)]
#[command(name = "dnsmeter", version)]
#[command(about = "Measure and rank DNS resolver responsiveness over UDP and DoH")]
pub struct Cli {
	/// Run only DNS-over-HTTPS tests
	#[arg(long = "doh-only", alias = "dohnly")]
	pub doh_only: bool,

	/// Disable HTTP keep-alive (use a new connection per DoH query)
	#[arg(long = "no-keepalive")]
	pub no_keepalive: bool,

	/// Print the comprehensive drilldown table instead of the summary
	#[arg(long)]
	pub comprehensive: bool,

	/// Aggregation mode; 'warm' excludes warm-up passes when --passes > 1
	#[arg(long, default_value = "mixed")]
	pub mode: String,

	/// Number of passes to run over the same probe set
	#[arg(long, default_value = "1")]
	pub passes: u32,

	/// Leading passes excluded from aggregation in warm mode
	#[arg(long = "warmup-discard", default_value = "1")]
	pub warmup_discard: u32,

	/// Comma-separated query types to test
	#[arg(long, default_value = "A,AAAA,HTTPS")]
	pub qtypes: String,

	/// EDNS0 UDP payload size advertised in queries
	#[arg(long = "edns-payload", default_value = "1232")]
	pub edns_payload: u16,

	/// Add a UDP DNS server IP (repeatable)
	#[arg(long = "udp")]
	pub udp: Vec<String>,

	/// Add a DoH server URL (repeatable)
	#[arg(long = "doh")]
	pub doh: Vec<String>,

	/// Number of random domains to test
	#[arg(long, default_value = "10")]
	pub domains: usize,

	/// Timeout per query in seconds
	#[arg(short = 't', long, default_value = "2.5")]
	pub timeout: f64,

	/// Random seed for domain selection and dispatch order
	#[arg(short = 's', long)]
	pub seed: Option<u64>,

	/// Maximum concurrent in-flight probes
	#[arg(short = 'c', long, default_value = "32")]
	pub concurrency: usize,

	/// Maximum idle connections kept per DoH endpoint
	#[arg(long = "pool-size", default_value = "4")]
	pub pool_size: usize,

	/// Skip system resolvers from /etc/resolv.conf
	#[arg(long = "no-system")]
	pub no_system: bool,

	/// Output CSV file path
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,
}
