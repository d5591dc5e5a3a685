use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

use crate::dns::DnsBackend;
use crate::probe::probe_segments;
use crate::resolver::TrustedPool;
use crate::transport::{CdnEvidence, CheckConfig, DomainReport, Verdict};

/// First CDN pattern found as a substring of any CNAME target
pub fn matching_cdn_pattern<'a>(cnames: &[String], patterns: &'a [String]) -> Option<&'a str> {
	cnames.iter()
		.find_map(|cname| patterns.iter().find(|p| cname.contains(p.as_str())))
		.map(String::as_str)
}

/// Choose up to `count` distinct indices in `0..len`, uniformly without replacement.
pub fn sample_indices<R: Rng + ?Sized>(rng: &mut R, len: usize, count: usize) -> Vec<usize> {
	rand::seq::index::sample(rng, len, count.min(len)).into_vec()
}

/// Sampling RNG for one domain.
///
/// Derived from the run seed and the domain name, so a domain draws the same
/// resolvers no matter which worker picks it up or when.
fn sampler_for(seed: u64, domain: &str) -> StdRng {
	let mut hasher = DefaultHasher::new();
	domain.hash(&mut hasher);
	StdRng::seed_from_u64(seed ^ hasher.finish())
}

fn not_a_resolver(pool: &TrustedPool) -> impl Fn(&Ipv4Addr) -> bool + '_ {
	move |ip| !pool.contains_ip(IpAddr::V4(*ip))
}

/// Classify one domain.
///
/// The rules run in a fixed order and the first one that applies decides:
///
/// 1. no A records: unresolvable
/// 2. an A record inside a known provider range: CDN
/// 3. A records but no CNAME: no CDN, the A records are the origin
/// 4. a CNAME containing a known CDN pattern: CDN
/// 5. otherwise sample resolvers from the pool and count distinct /24
///    prefixes; reaching `prefix_threshold` means CDN, else no CDN
///
/// Observed A records are reported for every resolvable domain, whatever the
/// verdict. Resolver sampling uses `config.seed` (0 when unset).
///
/// `config.domain_timeout` bounds the whole call. Hitting it during
/// inspection makes the domain unresolvable; hitting it during the probe
/// ends sampling and rule 5 is applied to what was gathered.
pub async fn classify<B: DnsBackend>(
	backend: &B,
	domain: &str,
	patterns: &[String],
	pool: &TrustedPool,
	config: &CheckConfig,
) -> DomainReport {
	let deadline = Instant::now() + config.domain_timeout;

	let inspection = match timeout_at(deadline, backend.inspect(domain, pool.resolvers())).await {
		Ok(Ok(inspection)) => inspection,
		Ok(Err(e)) => {
			debug!("{}: inspection failed: {}", domain, e);
			return DomainReport::unresolvable(domain);
		}
		Err(_) => {
			warn!("{}: inspection ran past the domain deadline, skipping", domain);
			return DomainReport::unresolvable(domain);
		}
	};

	if inspection.addrs.is_empty() {
		debug!("{}: no A records", domain);
		return DomainReport::unresolvable(domain);
	}

	let records: BTreeSet<Ipv4Addr> = inspection.addrs.iter()
		.copied()
		.filter(not_a_resolver(pool))
		.collect();
	let report = |verdict| DomainReport {
		domain: domain.to_string(),
		verdict,
		records: records.clone(),
	};

	if let Some(provider) = inspection.cdn_provider {
		return report(Verdict::UsesCdn(CdnEvidence::ProviderRange(provider)));
	}

	// Every address was a resolver echoing itself
	if records.is_empty() {
		debug!("{}: only resolver addresses in the answer", domain);
		return DomainReport::unresolvable(domain);
	}

	if inspection.cnames.is_empty() {
		return report(Verdict::NoCdn { origin_ips: records.clone() });
	}

	if let Some(pattern) = matching_cdn_pattern(&inspection.cnames, patterns) {
		return report(Verdict::UsesCdn(CdnEvidence::CnamePattern(pattern.to_string())));
	}

	let picks = {
		let mut rng = sampler_for(config.seed.unwrap_or_default(), domain);
		sample_indices(&mut rng, pool.len(), config.sample_size)
	};

	let mut prefixes = BTreeSet::new();
	let mut seen = records.clone();
	for (done, idx) in picks.iter().enumerate() {
		let resolver = &pool.resolvers()[*idx];
		match timeout_at(deadline, probe_segments(backend, domain, resolver)).await {
			Ok(Ok(probe)) => {
				prefixes.extend(probe.prefixes);
				seen.extend(probe.addrs.into_iter().filter(not_a_resolver(pool)));
			}
			Ok(Err(e)) => {
				debug!("{}: probe via {} failed: {}", domain, resolver.addr, e);
				continue;
			}
			Err(_) => {
				warn!(
					"{}: domain deadline reached after {}/{} sampled resolvers",
					domain, done, picks.len(),
				);
				break;
			}
		}
		if prefixes.len() >= config.prefix_threshold {
			break;
		}
	}

	debug!("{}: {} distinct prefixes across sampled resolvers", domain, prefixes.len());
	if prefixes.len() >= config.prefix_threshold {
		report(Verdict::UsesCdn(CdnEvidence::PrefixDiversity(prefixes.len())))
	} else {
		report(Verdict::NoCdn { origin_ips: seen })
	}
}
