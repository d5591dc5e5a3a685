use std::net::Ipv4Addr;

use anyhow::{anyhow, Result};

use crate::lists::read_list_file;

/// An IPv4 network in CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
	network: u32,
	prefix_len: u8,
}

impl Ipv4Cidr {
	/// Parse "a.b.c.d/n". Host bits below the prefix are masked off.
	pub fn parse(input: &str) -> Result<Self> {
		let (addr, len) = input.trim().split_once('/')
			.ok_or_else(|| anyhow!("missing prefix length in '{}'", input))?;
		let addr: Ipv4Addr = addr.parse()
			.map_err(|e| anyhow!("invalid network address '{}': {}", addr, e))?;
		let prefix_len: u8 = len.parse()
			.map_err(|e| anyhow!("invalid prefix length '{}': {}", len, e))?;
		if prefix_len > 32 {
			return Err(anyhow!("prefix length {} out of range", prefix_len));
		}
		Ok(Ipv4Cidr {
			network: u32::from(addr) & mask(prefix_len),
			prefix_len,
		})
	}

	pub fn contains(&self, ip: Ipv4Addr) -> bool {
		u32::from(ip) & mask(self.prefix_len) == self.network
	}
}

fn mask(prefix_len: u8) -> u32 {
	match prefix_len {
		0 => 0,
		n => u32::MAX << (32 - n as u32),
	}
}

/// Known CDN provider address ranges
#[derive(Debug, Clone, Default)]
pub struct CdnRanges {
	entries: Vec<(String, Ipv4Cidr)>,
}

impl CdnRanges {
	/// Ranges published by the large CDN providers
	pub fn builtin() -> Self {
		let mut ranges = CdnRanges::default();
		for (provider, cidrs) in BUILTIN_RANGES {
			for cidr in *cidrs {
				// Table entries are static and well-formed
				if let Ok(net) = Ipv4Cidr::parse(cidr) {
					ranges.entries.push((provider.to_string(), net));
				}
			}
		}
		ranges
	}

	/// Read extra ranges from a file.
	///
	/// Each line is either `provider cidr` or a bare `cidr`, which is
	/// attributed to "custom".
	pub fn read_file(path: &str) -> Result<Self> {
		let mut ranges = CdnRanges::default();
		for line in read_list_file(path)? {
			let mut fields = line.split_whitespace();
			let (provider, cidr) = match (fields.next(), fields.next()) {
				(Some(provider), Some(cidr)) => (provider, cidr),
				(Some(cidr), None) => ("custom", cidr),
				_ => continue,
			};
			let net = Ipv4Cidr::parse(cidr)
				.map_err(|e| anyhow!("bad range in '{}': {}", path, e))?;
			ranges.entries.push((provider.to_string(), net));
		}
		Ok(ranges)
	}

	pub fn extend(&mut self, other: CdnRanges) {
		self.entries.extend(other.entries);
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Name of the provider owning `ip`, if any
	pub fn provider_for(&self, ip: Ipv4Addr) -> Option<&str> {
		self.entries.iter()
			.find(|(_, net)| net.contains(ip))
			.map(|(provider, _)| provider.as_str())
	}
}

const BUILTIN_RANGES: &[(&str, &[&str])] = &[
	("cloudflare", &[
		"173.245.48.0/20", "103.21.244.0/22", "103.22.200.0/22",
		"103.31.4.0/22", "141.101.64.0/18", "108.162.192.0/18",
		"190.93.240.0/20", "188.114.96.0/20", "197.234.240.0/22",
		"198.41.128.0/17", "162.158.0.0/15", "104.16.0.0/13",
		"104.24.0.0/14", "172.64.0.0/13", "131.0.72.0/22",
	]),
	("cloudfront", &[
		"13.32.0.0/15", "13.224.0.0/14", "13.249.0.0/16",
		"18.64.0.0/14", "18.160.0.0/15", "52.84.0.0/15",
		"54.182.0.0/16", "54.192.0.0/16", "54.230.0.0/16",
		"54.239.128.0/18", "99.84.0.0/16", "143.204.0.0/16",
		"205.251.192.0/19",
	]),
	("fastly", &[
		"23.235.32.0/20", "43.249.72.0/22", "103.244.50.0/24",
		"103.245.222.0/23", "103.245.224.0/24", "104.156.80.0/20",
		"140.248.64.0/18", "140.248.128.0/17", "146.75.0.0/17",
		"151.101.0.0/16", "157.52.64.0/18", "167.82.0.0/17",
		"172.111.64.0/18", "185.31.16.0/22", "199.27.72.0/21",
		"199.232.0.0/16",
	]),
	("akamai", &[
		"23.32.0.0/11", "23.192.0.0/11", "2.16.0.0/13",
		"104.64.0.0/10", "184.24.0.0/13", "96.16.0.0/15",
	]),
	("incapsula", &[
		"199.83.128.0/21", "198.143.32.0/19", "149.126.72.0/21",
		"103.28.248.0/22", "45.64.64.0/22", "185.11.124.0/22",
		"192.230.64.0/18", "107.154.0.0/16", "45.60.0.0/16",
		"45.223.0.0/16",
	]),
	("sucuri", &[
		"192.88.134.0/23", "185.93.228.0/22", "66.248.200.0/22",
		"208.109.0.0/22",
	]),
];
