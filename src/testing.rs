//! Scripted DNS backend for exercising the check logic without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::dns::{DnsBackend, Inspection, QueryError};
use crate::transport::ResolverConfig;

#[derive(Default)]
pub struct ScriptedBackend {
	/// Inspection answers by domain; missing domains fail
	pub inspections: HashMap<String, Inspection>,
	/// A answers by (domain, resolver ip)
	pub answers: HashMap<(String, IpAddr), Vec<Ipv4Addr>>,
	/// Answer used when no per-resolver entry exists
	pub fallback: HashMap<String, Vec<Ipv4Addr>>,
	/// Resolvers that always time out
	pub dead: HashSet<IpAddr>,
	/// Answers handed out in call order, ahead of everything else
	pub sequence: Mutex<VecDeque<Vec<Ipv4Addr>>>,
	/// Time every lookup and inspection takes before answering
	pub delay: Duration,
	lookups: AtomicUsize,
}

impl ScriptedBackend {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn lookups(&self) -> usize {
		self.lookups.load(Ordering::SeqCst)
	}

	pub fn with_inspection(mut self, domain: &str, cnames: &[&str], addrs: &[Ipv4Addr]) -> Self {
		self.inspections.insert(domain.to_string(), Inspection {
			cnames: cnames.iter().map(|s| s.to_string()).collect(),
			addrs: addrs.to_vec(),
			cdn_provider: None,
		});
		self
	}

	pub fn with_answer(mut self, domain: &str, resolver: IpAddr, addrs: &[Ipv4Addr]) -> Self {
		self.answers.insert((domain.to_string(), resolver), addrs.to_vec());
		self
	}

	pub fn with_fallback(mut self, domain: &str, addrs: &[Ipv4Addr]) -> Self {
		self.fallback.insert(domain.to_string(), addrs.to_vec());
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn with_sequence(self, answers: Vec<Vec<Ipv4Addr>>) -> Self {
		if let Ok(mut seq) = self.sequence.lock() {
			seq.extend(answers);
		}
		self
	}
}

impl DnsBackend for ScriptedBackend {
	async fn lookup_a(
		&self,
		domain: &str,
		resolver: SocketAddr,
	) -> Result<Vec<Ipv4Addr>, QueryError> {
		self.lookups.fetch_add(1, Ordering::SeqCst);
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		if self.dead.contains(&resolver.ip()) {
			return Err(QueryError::Timeout(resolver));
		}
		if let Some(next) = self.sequence.lock().unwrap().pop_front() {
			return Ok(next);
		}
		let scripted = self.answers.get(&(domain.to_string(), resolver.ip()))
			.or_else(|| self.fallback.get(domain));
		Ok(scripted.cloned().unwrap_or_default())
	}

	async fn inspect(
		&self,
		domain: &str,
		_pool: &[ResolverConfig],
	) -> Result<Inspection, QueryError> {
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		self.inspections.get(domain)
			.cloned()
			.ok_or_else(|| QueryError::Malformed(format!("no scripted answer for {}", domain)))
	}
}

/// Resolver address for index `i` in a synthetic pool
pub fn resolver_ip(i: usize) -> IpAddr {
	IpAddr::V4(Ipv4Addr::new(203, 0, (i / 200) as u8, (i % 200) as u8 + 1))
}

/// A synthetic pool of `n` resolvers
pub fn resolver_pool(n: usize) -> Vec<ResolverConfig> {
	(0..n)
		.map(|i| {
			let addr = SocketAddr::new(resolver_ip(i), 53);
			ResolverConfig { label: addr.ip().to_string(), addr }
		})
		.collect()
}
