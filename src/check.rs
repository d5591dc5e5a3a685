use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::classify::classify;
use crate::dns::DnsBackend;
use crate::resolver::{validate_resolvers, TrustedPool};
use crate::results::ResultSets;
use crate::transport::{CheckConfig, DomainReport, LowResolverPolicy, ResolverConfig, Verdict};

/// Outcome of the classification phase
#[derive(Debug, Default)]
pub struct RunOutcome {
	pub results: ResultSets,
	/// Domains that produced no verdict
	pub skipped: Vec<String>,
}

/// Phase one: build the trusted pool and apply the low-count policy.
///
/// Returns an error only when the pool is too small and the policy is abort.
pub async fn run_validation<B>(
	backend: Arc<B>,
	candidates: &[ResolverConfig],
	config: &CheckConfig,
) -> Result<TrustedPool>
where
	B: DnsBackend + 'static,
{
	println!("Validating {} resolvers...", candidates.len());
	let pool = validate_resolvers(backend, candidates, config).await;
	println!("  {}/{} resolvers answered the canary correctly", pool.len(), candidates.len());

	if pool.len() < config.min_resolvers {
		let message = if pool.is_empty() {
			format!("no valid resolvers (fewer than {}), every domain will be skipped", config.min_resolvers)
		} else {
			format!(
				"only {} valid resolvers (fewer than {}), results may be inaccurate",
				pool.len(), config.min_resolvers,
			)
		};
		match config.low_resolver_policy {
			LowResolverPolicy::Warn => {
				warn!("{}", message);
				println!("Warning: {}", message);
			}
			LowResolverPolicy::Abort => return Err(anyhow!(message)),
		}
	}

	Ok(pool)
}

/// Phase two: classify every domain on a fixed-size worker pool.
///
/// Domains are fed through a bounded queue. Workers send their reports to a
/// single aggregator task, which owns the result sets, so no worker ever
/// touches shared results directly. Returns after every domain is done.
pub async fn run_classification<B>(
	backend: Arc<B>,
	domains: Vec<String>,
	patterns: Arc<Vec<String>>,
	pool: Arc<TrustedPool>,
	config: &CheckConfig,
) -> Result<RunOutcome>
where
	B: DnsBackend + 'static,
{
	let workers = config.workers.max(1);
	println!("Classifying {} domains with {} workers...", domains.len(), workers);

	// Fix the sampling seed once for the whole run
	let mut config = config.clone();
	config.seed = Some(config.seed.unwrap_or_else(rand::random));
	let config = Arc::new(config);

	let (job_tx, job_rx) = mpsc::channel::<String>(workers * 2);
	let job_rx = Arc::new(Mutex::new(job_rx));
	let (report_tx, mut report_rx) = mpsc::unbounded_channel::<DomainReport>();

	let aggregator = tokio::spawn(async move {
		let mut outcome = RunOutcome::default();
		while let Some(report) = report_rx.recv().await {
			if report.verdict == Verdict::Unresolvable {
				outcome.skipped.push(report.domain);
			} else {
				outcome.results.merge(report);
			}
		}
		outcome
	});

	let mut handles = Vec::new();
	for worker_id in 0..workers {
		let backend = backend.clone();
		let patterns = patterns.clone();
		let pool = pool.clone();
		let config = config.clone();
		let job_rx = job_rx.clone();
		let report_tx = report_tx.clone();

		handles.push(tokio::spawn(async move {
			loop {
				let next = job_rx.lock().await.recv().await;
				let Some(domain) = next else { break };

				// classify enforces the per-domain deadline itself
				let report = classify(
					backend.as_ref(), &domain, &patterns, &pool, &config,
				).await;

				match &report.verdict {
					Verdict::UsesCdn(evidence) => info!("{}: uses CDN ({})", domain, evidence),
					Verdict::NoCdn { origin_ips } => {
						info!("{}: no CDN, {} origin ip(s)", domain, origin_ips.len())
					}
					Verdict::Unresolvable => info!("{}: unresolvable, skipped", domain),
				}

				if report_tx.send(report).is_err() {
					break;
				}
			}
			debug!("worker {} finished", worker_id);
		}));
	}
	drop(report_tx);

	for domain in domains {
		if job_tx.send(domain).await.is_err() {
			break;
		}
	}
	drop(job_tx);

	for handle in handles {
		if let Err(e) = handle.await {
			warn!("classification worker failed: {}", e);
		}
	}

	aggregator.await
		.map_err(|e| anyhow!("result aggregation task failed: {}", e))
}
