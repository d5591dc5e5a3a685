use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RData, RecordType};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::cdn_ranges::CdnRanges;
use crate::transport::{CheckConfig, ResolverConfig};

/// Number of resolvers tried by an inspection before giving up
pub const INSPECT_ATTEMPTS: usize = 5;

/// Failure of a single DNS exchange
#[derive(Debug, Error)]
pub enum QueryError {
	#[error("invalid domain name '{0}'")]
	InvalidName(String),
	#[error("query to {0} timed out")]
	Timeout(SocketAddr),
	#[error("socket error talking to {addr}: {source}")]
	Io {
		addr: SocketAddr,
		#[source]
		source: std::io::Error,
	},
	#[error("malformed DNS message: {0}")]
	Malformed(String),
	#[error("{addr} answered {rcode}")]
	Rcode { addr: SocketAddr, rcode: ResponseCode },
	#[error("no resolvers available")]
	NoResolvers,
}

impl QueryError {
	/// Whether sending the same question again could succeed
	pub fn is_retryable(&self) -> bool {
		!matches!(self, QueryError::InvalidName(_) | QueryError::NoResolvers)
	}
}

/// Records extracted from a parsed DNS response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
	pub rcode: ResponseCode,
	/// CNAME targets in answer order, without the trailing dot
	pub cnames: Vec<String>,
	pub addrs: Vec<Ipv4Addr>,
}

/// One round of inspection for a domain: its CNAME chain, A records and
/// whether any A record sits inside a known CDN provider range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
	pub cnames: Vec<String>,
	pub addrs: Vec<Ipv4Addr>,
	pub cdn_provider: Option<String>,
}

/// The DNS capabilities the classifier depends on.
///
/// `lookup_a` asks exactly one resolver (with the configured retries).
/// `inspect` may spread its attempts over the whole trusted pool.
pub trait DnsBackend: Send + Sync {
	fn lookup_a(
		&self,
		domain: &str,
		resolver: SocketAddr,
	) -> impl Future<Output = Result<Vec<Ipv4Addr>, QueryError>> + Send;

	fn inspect(
		&self,
		domain: &str,
		pool: &[ResolverConfig],
	) -> impl Future<Output = Result<Inspection, QueryError>> + Send;
}

/// Build an A query message for the given domain.
///
/// Returns the serialized query bytes ready to send over UDP.
pub fn build_query(domain: &str, txid: u16) -> Result<Vec<u8>, QueryError> {
	let name = Name::from_ascii(domain)
		.map_err(|_| QueryError::InvalidName(domain.to_string()))?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, RecordType::A));

	message.to_vec()
		.map_err(|e| QueryError::Malformed(format!("failed to serialize query: {}", e)))
}

/// Parse a DNS response, validating the transaction ID and collecting
/// the A and CNAME records from the answer section.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<DnsAnswer, QueryError> {
	let message = Message::from_vec(bytes)
		.map_err(|e| QueryError::Malformed(e.to_string()))?;

	if message.id() != expected_txid {
		return Err(QueryError::Malformed(format!(
			"txid mismatch: expected {}, got {}",
			expected_txid, message.id()
		)));
	}

	if message.message_type() != MessageType::Response {
		return Err(QueryError::Malformed("received a query instead of a response".to_string()));
	}

	let mut cnames = Vec::new();
	let mut addrs = Vec::new();
	for record in message.answers() {
		match record.data() {
			RData::A(a) => addrs.push(a.0),
			RData::CNAME(cname) => {
				let target = cname.0.to_ascii();
				cnames.push(target.trim_end_matches('.').to_string());
			}
			_ => {}
		}
	}

	Ok(DnsAnswer {
		rcode: message.response_code(),
		cnames,
		addrs,
	})
}

/// Send a single A query over UDP and wait for the matching response.
///
/// Creates a dedicated socket per query so concurrent tasks never read each
/// other's responses.
async fn send_udp_query(
	resolver: SocketAddr,
	domain: &str,
	timeout: Duration,
) -> Result<DnsAnswer, QueryError> {
	let txid: u16 = rand::random();
	let query_bytes = build_query(domain, txid)?;

	let bind_addr = if resolver.is_ipv4() {
		"0.0.0.0:0"
	} else {
		"[::]:0"
	};
	let socket = UdpSocket::bind(bind_addr).await
		.map_err(|source| QueryError::Io { addr: resolver, source })?;

	let start = Instant::now();
	socket.send_to(&query_bytes, resolver).await
		.map_err(|source| QueryError::Io { addr: resolver, source })?;

	// Receive with timeout, retry recv on txid mismatch
	let mut buf = vec![0u8; 4096];
	let max_reads = 3;
	for _ in 0..max_reads {
		let elapsed = start.elapsed();
		if elapsed >= timeout {
			break;
		}
		let remaining = timeout - elapsed;

		match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
			Ok(Ok((len, _src))) => match parse_response(&buf[..len], txid) {
				Ok(answer) => return Ok(answer),
				Err(e) => {
					debug!("discarding response from {}: {}", resolver, e);
					continue;
				}
			},
			Ok(Err(source)) => return Err(QueryError::Io { addr: resolver, source }),
			Err(_) => break,
		}
	}

	Err(QueryError::Timeout(resolver))
}

/// Query one resolver for A records, retrying transient failures.
///
/// NXDOMAIN is an answer, not a failure: it yields an empty record list.
pub async fn query_a(
	resolver: SocketAddr,
	domain: &str,
	timeout: Duration,
	retries: u32,
) -> Result<DnsAnswer, QueryError> {
	let mut last_err = QueryError::Timeout(resolver);
	for attempt in 0..=retries {
		match send_udp_query(resolver, domain, timeout).await {
			Ok(answer) => match answer.rcode {
				ResponseCode::NoError | ResponseCode::NXDomain => return Ok(answer),
				rcode => last_err = QueryError::Rcode { addr: resolver, rcode },
			},
			Err(e) if e.is_retryable() => last_err = e,
			Err(e) => return Err(e),
		}
		debug!("{} via {} failed on attempt {}: {}", domain, resolver, attempt + 1, last_err);
	}
	Err(last_err)
}

/// Plain UDP implementation of the DNS capabilities
pub struct UdpDnsClient {
	timeout: Duration,
	retries: u32,
	ranges: CdnRanges,
}

impl UdpDnsClient {
	pub fn new(config: &CheckConfig, ranges: CdnRanges) -> Self {
		UdpDnsClient {
			timeout: config.timeout,
			retries: config.retries,
			ranges,
		}
	}
}

impl DnsBackend for UdpDnsClient {
	async fn lookup_a(
		&self,
		domain: &str,
		resolver: SocketAddr,
	) -> Result<Vec<Ipv4Addr>, QueryError> {
		let answer = query_a(resolver, domain, self.timeout, self.retries).await?;
		Ok(answer.addrs)
	}

	async fn inspect(
		&self,
		domain: &str,
		pool: &[ResolverConfig],
	) -> Result<Inspection, QueryError> {
		if pool.is_empty() {
			return Err(QueryError::NoResolvers);
		}

		// Each attempt goes to a different, randomly chosen resolver
		let order = {
			let mut rng = rand::thread_rng();
			rand::seq::index::sample(&mut rng, pool.len(), INSPECT_ATTEMPTS.min(pool.len()))
				.into_vec()
		};

		let mut last_err = QueryError::NoResolvers;
		for idx in order {
			let resolver = pool[idx].addr;
			match query_a(resolver, domain, self.timeout, 0).await {
				Ok(answer) => {
					let cdn_provider = answer.addrs.iter()
						.find_map(|ip| self.ranges.provider_for(*ip))
						.map(str::to_string);
					return Ok(Inspection {
						cnames: answer.cnames,
						addrs: answer.addrs,
						cdn_provider,
					});
				}
				Err(e) if e.is_retryable() => last_err = e,
				Err(e) => return Err(e),
			}
		}
		Err(last_err)
	}
}
