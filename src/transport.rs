use std::collections::BTreeSet;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::dns::INSPECT_ATTEMPTS;

/// Headroom added to the query budget for the default per-domain deadline
const DEADLINE_SLACK: Duration = Duration::from_secs(10);

/// Configuration for a single DNS resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
	pub label: String,
	pub addr: SocketAddr,
}

/// What to do when fewer resolvers than the viability threshold survive validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LowResolverPolicy {
	/// Print a warning and keep going with the resolvers that passed
	Warn,
	/// Stop before any domain is classified
	Abort,
}

/// Run configuration shared by the validation and classification phases
#[derive(Debug, Clone)]
pub struct CheckConfig {
	/// Per-query timeout
	pub timeout: Duration,
	/// Extra attempts after the first one for a single-resolver query
	pub retries: u32,
	/// Size of the domain classification worker pool
	pub workers: usize,
	/// Maximum concurrent canary queries during validation
	pub validate_concurrency: usize,
	/// Maximum number of resolvers sampled for the prefix-diversity probe
	pub sample_size: usize,
	/// Distinct /24 prefix count at which a domain counts as CDN-fronted
	pub prefix_threshold: usize,
	/// Trusted pool size below which the run is considered degraded
	pub min_resolvers: usize,
	pub low_resolver_policy: LowResolverPolicy,
	pub canary_domain: String,
	pub canary_ip: Ipv4Addr,
	/// Deadline for one domain's classification. Running out during the
	/// prefix probe ends the probe early; the verdict uses what was seen.
	pub domain_timeout: Duration,
	pub seed: Option<u64>,
}

impl CheckConfig {
	/// Longest time one domain can spend on queries when every one times out:
	/// the inspection attempts plus every sampled resolver with its retries.
	pub fn query_budget(&self) -> Duration {
		let queries = INSPECT_ATTEMPTS + self.sample_size * (self.retries as usize + 1);
		self.timeout.saturating_mul(queries as u32)
	}

	/// Per-domain deadline that fits the full query budget
	pub fn default_domain_timeout(&self) -> Duration {
		self.query_budget() + DEADLINE_SLACK
	}
}

impl Default for CheckConfig {
	fn default() -> Self {
		let mut config = CheckConfig {
			timeout: Duration::from_millis(2000),
			retries: 1,
			workers: 64,
			validate_concurrency: 128,
			sample_size: 30,
			prefix_threshold: 4,
			min_resolvers: 20,
			low_resolver_policy: LowResolverPolicy::Warn,
			canary_domain: "public1.114dns.com".to_string(),
			canary_ip: Ipv4Addr::new(114, 114, 114, 114),
			domain_timeout: Duration::ZERO,
			seed: None,
		};
		config.domain_timeout = config.default_domain_timeout();
		config
	}
}

/// Why a domain was judged to sit behind a CDN
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CdnEvidence {
	/// An A record falls inside a known provider range
	ProviderRange(String),
	/// A CNAME target contains a known CDN pattern
	CnamePattern(String),
	/// Number of distinct /24 prefixes seen across sampled resolvers
	PrefixDiversity(usize),
}

impl fmt::Display for CdnEvidence {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CdnEvidence::ProviderRange(p) => write!(f, "provider range ({})", p),
			CdnEvidence::CnamePattern(p) => write!(f, "cname pattern ({})", p),
			CdnEvidence::PrefixDiversity(n) => write!(f, "{} distinct /24 prefixes", n),
		}
	}
}

/// Terminal classification of one domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
	UsesCdn(CdnEvidence),
	NoCdn { origin_ips: BTreeSet<Ipv4Addr> },
	Unresolvable,
}

/// Everything one classification contributes to the shared result sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainReport {
	pub domain: String,
	pub verdict: Verdict,
	/// A records observed for the domain, resolver addresses removed
	pub records: BTreeSet<Ipv4Addr>,
}

impl DomainReport {
	pub fn unresolvable(domain: &str) -> Self {
		DomainReport {
			domain: domain.to_string(),
			verdict: Verdict::Unresolvable,
			records: BTreeSet::new(),
		}
	}
}
