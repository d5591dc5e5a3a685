use std::collections::HashSet;

use anyhow::{anyhow, Result};

/// Drop empty entries and repeats, keeping the first occurrence of each value
/// in its original position.
pub fn unique_non_empty<I, S>(items: I) -> Vec<String>
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	let mut seen = HashSet::new();
	let mut unique = Vec::new();
	for item in items {
		let value = item.as_ref();
		if value.is_empty() {
			continue;
		}
		if seen.insert(value.to_string()) {
			unique.push(value.to_string());
		}
	}
	unique
}

/// Read a newline-separated list, one entry per line.
///
/// Lines are trimmed (which also takes care of CRLF endings). Blank lines and
/// lines starting with '#' are skipped, and duplicates are removed.
pub fn read_list_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)
		.map_err(|e| anyhow!("failed to read list file '{}': {}", path, e))?;
	let entries = content.lines()
		.map(str::trim)
		.filter(|line| !line.starts_with('#'));
	Ok(unique_non_empty(entries))
}
