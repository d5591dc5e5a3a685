use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use crate::transport::{CdnEvidence, DomainReport, Verdict};

/// The four output collections, accumulated from per-domain reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSets {
	pub no_cdn_domains: BTreeSet<String>,
	pub no_cdn_ips: BTreeSet<Ipv4Addr>,
	pub use_cdn_domains: BTreeSet<String>,
	pub domain_ip_records: BTreeSet<(String, Ipv4Addr)>,
	/// CDN verdicts counted by kind of evidence
	pub cdn_evidence: BTreeMap<&'static str, usize>,
}

fn evidence_kind(evidence: &CdnEvidence) -> &'static str {
	match evidence {
		CdnEvidence::ProviderRange(_) => "provider range",
		CdnEvidence::CnamePattern(_) => "cname pattern",
		CdnEvidence::PrefixDiversity(_) => "prefix diversity",
	}
}

impl ResultSets {
	/// Fold one report in. Unresolvable reports leave every set untouched.
	pub fn merge(&mut self, report: DomainReport) {
		let DomainReport { domain, verdict, records } = report;
		match verdict {
			Verdict::Unresolvable => return,
			Verdict::UsesCdn(evidence) => {
				if self.no_cdn_domains.contains(&domain) {
					return;
				}
				*self.cdn_evidence.entry(evidence_kind(&evidence)).or_default() += 1;
				self.use_cdn_domains.insert(domain.clone());
			}
			Verdict::NoCdn { origin_ips } => {
				if self.use_cdn_domains.contains(&domain) {
					return;
				}
				self.no_cdn_ips.extend(origin_ips);
				self.no_cdn_domains.insert(domain.clone());
			}
		}
		for ip in records {
			self.domain_ip_records.insert((domain.clone(), ip));
		}
	}

	/// `domain:ip` lines for the record file
	pub fn domain_info_lines(&self) -> Vec<String> {
		self.domain_ip_records.iter()
			.map(|(domain, ip)| format!("{}:{}", domain, ip))
			.collect()
	}
}
