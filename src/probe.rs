use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};

use tracing::debug;

use crate::dns::{DnsBackend, QueryError};
use crate::transport::ResolverConfig;

/// The /24 network of an address, written as its first three octets ("a.b.c")
pub fn network_prefix(ip: Ipv4Addr) -> String {
	let [a, b, c, _] = ip.octets();
	format!("{}.{}.{}", a, b, c)
}

/// What one resolver reported for a domain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentProbe {
	pub prefixes: BTreeSet<String>,
	pub addrs: BTreeSet<Ipv4Addr>,
}

/// Ask one resolver for the domain's A records and reduce them to /24 prefixes.
///
/// Some resolvers answer with their own address when they cannot resolve a
/// name; such an answer carries no information and yields an empty probe.
/// Query failures are returned to the caller, which should treat them as
/// "nothing learned" and move on to another resolver.
pub async fn probe_segments<B: DnsBackend>(
	backend: &B,
	domain: &str,
	resolver: &ResolverConfig,
) -> Result<SegmentProbe, QueryError> {
	let addrs = backend.lookup_a(domain, resolver.addr).await?;

	if addrs.iter().any(|ip| IpAddr::V4(*ip) == resolver.addr.ip()) {
		debug!("{} echoed its own address for {}, ignoring", resolver.addr, domain);
		return Ok(SegmentProbe::default());
	}

	Ok(SegmentProbe {
		prefixes: addrs.iter().map(|ip| network_prefix(*ip)).collect(),
		addrs: addrs.into_iter().collect(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{resolver_ip, resolver_pool, ScriptedBackend};

	#[test]
	fn test_network_prefix() {
		assert_eq!(network_prefix(Ipv4Addr::new(1, 2, 3, 4)), "1.2.3");
		assert_eq!(network_prefix(Ipv4Addr::new(192, 168, 0, 255)), "192.168.0");
	}

	#[tokio::test]
	async fn test_prefixes_are_deduplicated() {
		let pool = resolver_pool(1);
		let backend = ScriptedBackend::new().with_answer("app.example.com", resolver_ip(0), &[
			Ipv4Addr::new(10, 1, 1, 1),
			Ipv4Addr::new(10, 1, 1, 2),
			Ipv4Addr::new(10, 1, 2, 1),
		]);

		let probe = probe_segments(&backend, "app.example.com", &pool[0]).await.unwrap();
		let prefixes: Vec<&str> = probe.prefixes.iter().map(String::as_str).collect();
		assert_eq!(prefixes, vec!["10.1.1", "10.1.2"]);
		assert_eq!(probe.addrs.len(), 3);
	}

	#[tokio::test]
	async fn test_self_echo_is_empty_not_error() {
		let pool = resolver_pool(1);
		let own = match resolver_ip(0) {
			IpAddr::V4(ip) => ip,
			IpAddr::V6(_) => unreachable!(),
		};
		let backend = ScriptedBackend::new().with_answer(
			"app.example.com", resolver_ip(0), &[Ipv4Addr::new(10, 1, 1, 1), own],
		);

		let probe = probe_segments(&backend, "app.example.com", &pool[0]).await.unwrap();
		assert_eq!(probe, SegmentProbe::default());
	}

	#[tokio::test]
	async fn test_failure_is_returned() {
		let pool = resolver_pool(1);
		let mut backend = ScriptedBackend::new();
		backend.dead.insert(resolver_ip(0));

		let result = probe_segments(&backend, "app.example.com", &pool[0]).await;
		assert!(matches!(result, Err(QueryError::Timeout(_))));
	}
}
