//! Versioned snapshots under one index directory:
//!
//! ```text
//! <index_dir>/CURRENT    name of the active snapshot
//! <index_dir>/v000001/   a complete LanceDB snapshot (items + meta)
//! <index_dir>/v000002/
//! ```
//!
//! A build writes a new `vNNNNNN` directory, then replaces `CURRENT` with a
//! rename. The index directory itself never moves, so a reader always finds
//! either the previous or the new snapshot.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use assessrec_core::error::{Error, Result};

pub const CURRENT_FILE: &str = "CURRENT";

/// Active snapshot name, or `None` before the first successful build.
pub fn current_version(index_dir: &Path) -> Result<Option<String>> {
	match fs::read_to_string(index_dir.join(CURRENT_FILE)) {
		Ok(raw) => {
			let name = raw.trim();
			if parse_version(name).is_none() {
				return Err(Error::storage(format!("{} names no snapshot: {:?}", CURRENT_FILE, name)));
			}
			Ok(Some(name.to_string()))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(e.into()),
	}
}

pub fn version_dir(index_dir: &Path, version: &str) -> PathBuf {
	index_dir.join(version)
}

/// One past the highest snapshot number present. Call with the build lock held.
pub fn next_version(index_dir: &Path) -> Result<String> {
	let next = list_versions(index_dir)?.into_iter().map(|(n, _)| n).max().map_or(1, |n| n + 1);
	Ok(format!("v{:06}", next))
}

/// Atomically point `CURRENT` at `version`.
pub fn set_current(index_dir: &Path, version: &str) -> Result<()> {
	let mut tmp = tempfile::NamedTempFile::new_in(index_dir)?;
	writeln!(tmp, "{}", version)?;
	tmp.as_file().sync_all()?;
	tmp.persist(index_dir.join(CURRENT_FILE)).map_err(|e| Error::Io(e.error))?;
	debug!(index_dir = %index_dir.display(), version, "active snapshot switched");
	Ok(())
}

/// Remove snapshots other than the active one and the `keep_previous` newest
/// before it. Snapshots newer than the active one are leftovers of failed
/// builds. Call with the build lock held.
pub fn prune(index_dir: &Path, keep_previous: usize) -> Result<Vec<String>> {
	let Some(current) = current_version(index_dir)?.and_then(|v| parse_version(&v)) else {
		return Ok(Vec::new());
	};
	let mut older: Vec<(u64, String)> = Vec::new();
	let mut removed = Vec::new();
	for (n, name) in list_versions(index_dir)? {
		if n < current {
			older.push((n, name));
		} else if n > current {
			fs::remove_dir_all(index_dir.join(&name))?;
			removed.push(name);
		}
	}
	older.sort();
	let drop_count = older.len().saturating_sub(keep_previous);
	for (_, name) in older.into_iter().take(drop_count) {
		fs::remove_dir_all(index_dir.join(&name))?;
		removed.push(name);
	}
	if !removed.is_empty() {
		debug!(index_dir = %index_dir.display(), removed = ?removed, "pruned old snapshots");
	}
	Ok(removed)
}

/// Snapshot directories present, unordered.
pub fn list_versions(index_dir: &Path) -> Result<Vec<(u64, String)>> {
	let entries = match fs::read_dir(index_dir) {
		Ok(entries) => entries,
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
		Err(e) => return Err(e.into()),
	};
	let mut out = Vec::new();
	for entry in entries {
		let entry = entry?;
		if !entry.file_type()?.is_dir() {
			continue;
		}
		let name = entry.file_name().to_string_lossy().into_owned();
		if let Some(n) = parse_version(&name) {
			out.push((n, name));
		}
	}
	Ok(out)
}

fn parse_version(name: &str) -> Option<u64> {
	let digits = name.strip_prefix('v')?;
	if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
		return None;
	}
	digits.parse().ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn versions_count_up_and_pointer_switches() -> Result<()> {
		let tmp = tempfile::tempdir()?;
		let root = tmp.path();
		assert_eq!(current_version(root)?, None);
		assert_eq!(next_version(root)?, "v000001");

		fs::create_dir(root.join("v000001"))?;
		set_current(root, "v000001")?;
		assert_eq!(current_version(root)?.as_deref(), Some("v000001"));
		assert_eq!(next_version(root)?, "v000002");
		Ok(())
	}

	#[test]
	fn prune_keeps_current_and_recent_history() -> Result<()> {
		let tmp = tempfile::tempdir()?;
		let root = tmp.path();
		for n in 1..=5 {
			fs::create_dir(root.join(format!("v{:06}", n)))?;
		}
		fs::create_dir(root.join("not-a-snapshot"))?;
		set_current(root, "v000004")?;

		let mut removed = prune(root, 1)?;
		removed.sort();
		assert_eq!(removed, vec!["v000001", "v000002", "v000005"]);
		let mut left: Vec<String> = list_versions(root)?.into_iter().map(|(_, n)| n).collect();
		left.sort();
		assert_eq!(left, vec!["v000003", "v000004"]);
		assert!(root.join("not-a-snapshot").is_dir());
		Ok(())
	}

	#[test]
	fn garbage_pointer_is_a_storage_error() -> Result<()> {
		let tmp = tempfile::tempdir()?;
		fs::write(tmp.path().join(CURRENT_FILE), "../etc\n")?;
		assert!(matches!(current_version(tmp.path()), Err(Error::Storage(_))));
		Ok(())
	}
}
