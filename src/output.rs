use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};

use anyhow::{anyhow, Result};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::check::RunOutcome;
use crate::results::ResultSets;
use crate::transport::CheckConfig;

/// Destinations of the four result files
#[derive(Debug, Clone)]
pub struct OutputPaths {
	pub no_cdn_domains: String,
	pub no_cdn_ips: String,
	pub use_cdn_domains: String,
	pub domain_info: String,
}

/// Current local time as YYYYMMDDHHmm, in UTC if the local offset is unknown
pub fn run_timestamp() -> String {
	let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
	let format = format_description!("[year][month][day][hour][minute]");
	now.format(format).unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Default file name for a result set, e.g. `no_cdn_ips202610181530.txt`
pub fn default_output_name(prefix: &str, timestamp: &str) -> String {
	format!("{}{}.txt", prefix, timestamp)
}

/// Print a summary of the run configuration before starting.
pub fn print_config_summary(
	domain_count: usize,
	pattern_count: usize,
	resolver_count: usize,
	range_count: usize,
	config: &CheckConfig,
) {
	println!("CDN Check Configuration");
	println!("=======================");
	println!("Domains:        {}", domain_count);
	println!("CNAME patterns: {}", pattern_count);
	println!("CDN ranges:     {}", range_count);
	println!("Resolvers:      {}", resolver_count);
	println!("Canary:         {} -> {}", config.canary_domain, config.canary_ip);
	println!("Timeout:        {} ms", config.timeout.as_millis());
	println!("Retries:        {}", config.retries);
	println!("Workers:        {}", config.workers);
	println!("Sample size:    {}", config.sample_size);
	println!("Prefix limit:   {}", config.prefix_threshold);
	println!("Domain limit:   {} s", config.domain_timeout.as_secs());
	if let Some(seed) = config.seed {
		println!("Seed:           {}", seed);
	}
	println!();
}

/// Print the classification results as a formatted table.
pub fn print_results_table(outcome: &RunOutcome, trusted: usize, candidates: usize) {
	let results = &outcome.results;
	let mut table = Table::new();
	table.load_preset(UTF8_FULL);
	table.set_content_arrangement(ContentArrangement::Dynamic);
	table.set_header(vec!["Result", "Count"]);

	table.add_row(vec![
		"Trusted resolvers".to_string(),
		format!("{}/{}", trusted, candidates),
	]);
	table.add_row(vec!["No CDN domains".to_string(), results.no_cdn_domains.len().to_string()]);
	table.add_row(vec!["No CDN origin IPs".to_string(), results.no_cdn_ips.len().to_string()]);
	table.add_row(vec!["CDN domains".to_string(), results.use_cdn_domains.len().to_string()]);
	for (kind, count) in &results.cdn_evidence {
		table.add_row(vec![format!("  by {}", kind), count.to_string()]);
	}
	table.add_row(vec!["Domain:IP records".to_string(), results.domain_ip_records.len().to_string()]);
	table.add_row(vec!["Skipped (no answer)".to_string(), outcome.skipped.len().to_string()]);

	println!("\nCDN Check Results");
	println!("=================\n");
	println!("{table}");
}

/// Write one entry per line, truncating any existing file.
///
/// Nothing is written for an empty list. Returns whether a file was created.
pub fn write_list<I, T>(path: &str, entries: I) -> Result<bool>
where
	I: IntoIterator<Item = T>,
	T: Display,
{
	let mut entries = entries.into_iter().peekable();
	if entries.peek().is_none() {
		return Ok(false);
	}

	let file = File::create(path)
		.map_err(|e| anyhow!("failed to create output file '{}': {}", path, e))?;
	let mut writer = BufWriter::new(file);
	for entry in entries {
		writeln!(writer, "{}", entry)
			.map_err(|e| anyhow!("failed to write '{}': {}", path, e))?;
	}
	writer.flush()
		.map_err(|e| anyhow!("failed to write '{}': {}", path, e))?;
	Ok(true)
}

/// Write all four result files and report where they went.
pub fn write_results(paths: &OutputPaths, results: &ResultSets) -> Result<()> {
	let written = [
		(&paths.no_cdn_domains, write_list(&paths.no_cdn_domains, &results.no_cdn_domains)?),
		(&paths.no_cdn_ips, write_list(&paths.no_cdn_ips, &results.no_cdn_ips)?),
		(&paths.use_cdn_domains, write_list(&paths.use_cdn_domains, &results.use_cdn_domains)?),
		(&paths.domain_info, write_list(&paths.domain_info, results.domain_info_lines())?),
	];

	println!();
	for (path, created) in written {
		if created {
			println!("Results written to: {}", path);
		}
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::{DomainReport, Verdict};
	use std::net::Ipv4Addr;

	#[test]
	fn test_timestamp_shape() {
		let stamp = run_timestamp();
		assert_eq!(stamp.len(), 12, "unexpected timestamp {}", stamp);
		assert!(stamp.chars().all(|c| c.is_ascii_digit()));
	}

	#[test]
	fn test_default_output_name() {
		assert_eq!(default_output_name("no_cdn_ips", "202610181530"), "no_cdn_ips202610181530.txt");
	}

	#[test]
	fn test_empty_list_writes_nothing() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("empty.txt");
		let path = path.to_str().unwrap();
		let created = write_list(path, Vec::<String>::new()).unwrap();
		assert!(!created);
		assert!(!std::path::Path::new(path).exists());
	}

	#[test]
	fn test_write_results_files() {
		let dir = tempfile::tempdir().unwrap();
		let path = |name: &str| dir.path().join(name).to_str().unwrap().to_string();
		let paths = OutputPaths {
			no_cdn_domains: path("no_cdn_domains.txt"),
			no_cdn_ips: path("no_cdn_ips.txt"),
			use_cdn_domains: path("use_cdn_domains.txt"),
			domain_info: path("domain_info.txt"),
		};

		let origin = Ipv4Addr::new(198, 51, 100, 1);
		let mut results = ResultSets::default();
		results.merge(DomainReport {
			domain: "origin.example.com".to_string(),
			verdict: Verdict::NoCdn { origin_ips: [origin].into_iter().collect() },
			records: [origin].into_iter().collect(),
		});

		write_results(&paths, &results).unwrap();

		let read = |p: &str| std::fs::read_to_string(p).unwrap();
		assert_eq!(read(&paths.no_cdn_domains), "origin.example.com\n");
		assert_eq!(read(&paths.no_cdn_ips), "198.51.100.1\n");
		assert_eq!(read(&paths.domain_info), "origin.example.com:198.51.100.1\n");
		assert!(!std::path::Path::new(&paths.use_cdn_domains).exists());
	}

	#[test]
	fn test_existing_file_is_truncated() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("list.txt");
		std::fs::write(&path, "stale\nstale\nstale\n").unwrap();
		let path = path.to_str().unwrap();

		write_list(path, ["fresh"]).unwrap();
		assert_eq!(std::fs::read_to_string(path).unwrap(), "fresh\n");
	}
}
