mod cdn_ranges;
mod check;
mod classify;
mod cli;
mod dns;
mod lists;
mod output;
mod probe;
mod resolver;
mod results;
#[cfg(test)]
mod testing;
mod transport;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cdn_ranges::CdnRanges;
use crate::cli::Cli;
use crate::dns::UdpDnsClient;

fn init_logging(verbose: u8) {
	let level = match verbose {
		0 => "warn",
		1 => "info",
		_ => "debug",
	};
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
		.with_writer(std::io::stderr)
		.init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	init_logging(cli.verbose);

	// Output names share one timestamp taken at startup
	let paths = cli.output_paths(&output::run_timestamp());
	let config = cli.check_config();

	// Every input list must load before any network traffic
	let domains = lists::read_list_file(&cli.domain_file)?;
	let patterns = lists::read_list_file(&cli.cname_file)?;
	let candidates = resolver::read_resolver_file(&cli.resolver_file)?;
	let mut ranges = CdnRanges::builtin();
	if let Some(path) = &cli.cdn_ranges {
		ranges.extend(CdnRanges::read_file(path)?);
	}

	output::print_config_summary(
		domains.len(), patterns.len(), candidates.len(), ranges.len(), &config,
	);

	let backend = Arc::new(UdpDnsClient::new(&config, ranges));

	// Validation must finish before classification: it fixes the pool
	let pool = check::run_validation(backend.clone(), &candidates, &config).await?;
	let trusted = pool.len();
	println!();

	let outcome = check::run_classification(
		backend, domains, Arc::new(patterns), Arc::new(pool), &config,
	).await?;

	output::print_results_table(&outcome, trusted, candidates.len());

	// Origin IPs are also echoed to the console
	for ip in &outcome.results.no_cdn_ips {
		println!("{}", ip);
	}

	output::write_results(&paths, &outcome.results)?;

	Ok(())
}
