use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::dns::DnsBackend;
use crate::lists::read_list_file;
use crate::transport::{CheckConfig, ResolverConfig};

/// Parse a resolver address string into a ResolverConfig.
///
/// Supports formats:
///   "1.1.1.1"              -- IPv4, default port 53
///   "1.1.1.1:53"           -- IPv4 with explicit port
///   "2606:4700::1111"      -- bare IPv6, default port 53
///   "[2606:4700::1111]:53" -- bracketed IPv6 with port
pub fn parse_resolver(input: &str) -> Result<ResolverConfig> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(anyhow!("empty resolver address"));
	}

	let addr: SocketAddr = if trimmed.starts_with('[') {
		trimmed.parse()
			.map_err(|e| anyhow!("invalid bracketed IPv6 address '{}': {}", trimmed, e))?
	} else if trimmed.contains("::") || trimmed.matches(':').count() > 1 {
		let ip = trimmed.parse()
			.map_err(|e| anyhow!("invalid IPv6 address '{}': {}", trimmed, e))?;
		SocketAddr::new(ip, 53)
	} else if let Ok(addr) = trimmed.parse::<SocketAddr>() {
		addr
	} else {
		let ip = trimmed.parse()
			.map_err(|e| anyhow!("invalid IP address '{}': {}", trimmed, e))?;
		SocketAddr::new(ip, 53)
	};

	let label = format!("{}", addr.ip());
	Ok(ResolverConfig { label, addr })
}

/// Read candidate resolvers from a file, one per line.
///
/// A missing file is an error. Entries that do not parse as an address are
/// dropped with a warning; public resolver lists are rarely clean.
pub fn read_resolver_file(path: &str) -> Result<Vec<ResolverConfig>> {
	let mut resolvers = Vec::new();
	let mut seen = HashSet::new();
	for line in read_list_file(path)? {
		match parse_resolver(&line) {
			Ok(resolver) => {
				if seen.insert(resolver.addr) {
					resolvers.push(resolver);
				}
			}
			Err(e) => warn!("skipping resolver entry: {}", e),
		}
	}
	Ok(resolvers)
}

/// Resolvers that answered the canary query correctly.
///
/// Fixed once validation finishes; shared read-only by every domain task.
#[derive(Debug, Clone, Default)]
pub struct TrustedPool {
	resolvers: Vec<ResolverConfig>,
	ips: HashSet<IpAddr>,
}

impl TrustedPool {
	pub fn new(resolvers: Vec<ResolverConfig>) -> Self {
		let ips = resolvers.iter().map(|r| r.addr.ip()).collect();
		TrustedPool { resolvers, ips }
	}

	pub fn resolvers(&self) -> &[ResolverConfig] {
		&self.resolvers
	}

	pub fn len(&self) -> usize {
		self.resolvers.len()
	}

	pub fn is_empty(&self) -> bool {
		self.resolvers.is_empty()
	}

	/// True if `ip` belongs to one of the trusted resolvers
	pub fn contains_ip(&self, ip: IpAddr) -> bool {
		self.ips.contains(&ip)
	}
}

/// Probe a single resolver with the canary query.
async fn is_trusted<B: DnsBackend>(
	backend: &B,
	resolver: &ResolverConfig,
	config: &CheckConfig,
) -> bool {
	match backend.lookup_a(&config.canary_domain, resolver.addr).await {
		Ok(addrs) => {
			let trusted = addrs.contains(&config.canary_ip);
			if !trusted {
				debug!("{} gave a wrong canary answer: {:?}", resolver.addr, addrs);
			}
			trusted
		}
		Err(e) => {
			debug!("{} failed the canary query: {}", resolver.addr, e);
			false
		}
	}
}

/// Validate every candidate concurrently and keep the ones that pass.
///
/// The surviving resolvers keep their input order. Only the collecting loop
/// writes to the pool, after each task hands its result back.
pub async fn validate_resolvers<B>(
	backend: Arc<B>,
	candidates: &[ResolverConfig],
	config: &CheckConfig,
) -> TrustedPool
where
	B: DnsBackend + 'static,
{
	info!("validating {} candidate resolvers against {}", candidates.len(), config.canary_domain);

	let semaphore = Arc::new(Semaphore::new(config.validate_concurrency.max(1)));
	let mut handles = Vec::new();

	for resolver in candidates {
		let sem = semaphore.clone();
		let backend = backend.clone();
		let resolver = resolver.clone();
		let config = config.clone();

		handles.push(tokio::spawn(async move {
			let _permit = sem.acquire_owned().await.ok()?;
			let trusted = is_trusted(backend.as_ref(), &resolver, &config).await;
			trusted.then_some(resolver)
		}));
	}

	let mut trusted = Vec::new();
	for handle in handles {
		match handle.await {
			Ok(Some(resolver)) => trusted.push(resolver),
			Ok(None) => {}
			Err(e) => warn!("resolver validation task failed: {}", e),
		}
	}

	info!("{}/{} resolvers passed validation", trusted.len(), candidates.len());
	TrustedPool::new(trusted)
}
