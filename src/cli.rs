use std::net::Ipv4Addr;
use std::time::Duration;

use clap::{ArgAction, Parser};

use crate::output::{default_output_name, OutputPaths};
use crate::transport::{CheckConfig, LowResolverPolicy};

/// Sort domains into CDN-fronted and origin-exposed
#[derive(Parser, Debug)]
#[command(name = "cdn-check")]
#[command(about = "Classify domains as behind a CDN or not using DNS observations")]
pub struct Cli {
	/// File containing domains to check (one per line)
	#[arg(short = 'd', long = "domain-file")]
	pub domain_file: String,

	/// File containing known CDN CNAME substrings (one per line)
	#[arg(short = 'c', long = "cname-file", default_value = "cdn_cname")]
	pub cname_file: String,

	/// File containing candidate DNS resolver addresses (one per line)
	#[arg(short = 'r', long = "resolver-file")]
	pub resolver_file: String,

	/// Extra CDN provider ranges, lines of "provider cidr"
	#[arg(long = "cdn-ranges")]
	pub cdn_ranges: Option<String>,

	/// Output file for domains not using a CDN
	#[arg(short = 'o', long = "output")]
	pub output: Option<String>,

	/// Output file for origin IPs of domains not using a CDN
	#[arg(long = "output-ips")]
	pub output_ips: Option<String>,

	/// Output file for domains using a CDN
	#[arg(long = "output-cdn")]
	pub output_cdn: Option<String>,

	/// Output file for domain:ip records
	#[arg(long = "output-info")]
	pub output_info: Option<String>,

	/// Query timeout in milliseconds
	#[arg(short = 't', long = "timeout", default_value = "2000")]
	pub timeout: u64,

	/// Retries after a failed query to a single resolver
	#[arg(long = "retries", default_value = "1")]
	pub retries: u32,

	/// Number of concurrent domain workers
	#[arg(short = 'w', long = "workers", default_value = "64")]
	pub workers: usize,

	/// Maximum concurrent canary queries during resolver validation
	#[arg(long = "validate-concurrency", default_value = "128")]
	pub validate_concurrency: usize,

	/// Maximum resolvers sampled per domain for the prefix probe
	#[arg(long = "sample-size", default_value = "30")]
	pub sample_size: usize,

	/// Distinct /24 prefixes at which a domain counts as CDN-fronted
	#[arg(long = "prefix-threshold", default_value = "4")]
	pub prefix_threshold: usize,

	/// Minimum number of valid resolvers for a trustworthy run
	#[arg(long = "min-resolvers", default_value = "20")]
	pub min_resolvers: usize,

	/// What to do when fewer than --min-resolvers resolvers are valid
	#[arg(long = "on-low-resolvers", value_enum, default_value = "warn")]
	pub on_low_resolvers: LowResolverPolicy,

	/// Hostname used to validate resolvers
	#[arg(long = "canary-domain", default_value = "public1.114dns.com")]
	pub canary_domain: String,

	/// Address the canary hostname must resolve to
	#[arg(long = "canary-ip", default_value = "114.114.114.114")]
	pub canary_ip: Ipv4Addr,

	/// Per-domain deadline in seconds [default: enough for every query to time out]
	#[arg(long = "domain-timeout")]
	pub domain_timeout: Option<u64>,

	/// Random seed for reproducible resolver sampling
	#[arg(short = 's', long = "seed")]
	pub seed: Option<u64>,

	/// Increase log verbosity (-v info, -vv debug)
	#[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
	pub verbose: u8,
}

impl Cli {
	pub fn check_config(&self) -> CheckConfig {
		let mut config = CheckConfig {
			timeout: Duration::from_millis(self.timeout),
			retries: self.retries,
			workers: self.workers,
			validate_concurrency: self.validate_concurrency,
			sample_size: self.sample_size,
			prefix_threshold: self.prefix_threshold,
			min_resolvers: self.min_resolvers,
			low_resolver_policy: self.on_low_resolvers,
			canary_domain: self.canary_domain.clone(),
			canary_ip: self.canary_ip,
			domain_timeout: Duration::ZERO,
			seed: self.seed,
		};
		config.domain_timeout = match self.domain_timeout {
			Some(secs) => Duration::from_secs(secs),
			None => config.default_domain_timeout(),
		};
		config
	}

	/// Output paths, filling unset ones with timestamped defaults
	pub fn output_paths(&self, timestamp: &str) -> OutputPaths {
		let pick = |flag: &Option<String>, prefix: &str| {
			flag.clone().unwrap_or_else(|| default_output_name(prefix, timestamp))
		};
		OutputPaths {
			no_cdn_domains: pick(&self.output, "no_cdn_domains"),
			no_cdn_ips: pick(&self.output_ips, "no_cdn_ips"),
			use_cdn_domains: pick(&self.output_cdn, "use_cdn_domains"),
			domain_info: pick(&self.output_info, "domain_info"),
		}
	}
}
