use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use assessrec_core::error::Result;

/// Exclusive advisory lock held for the duration of an index build.
/// Released on drop.
pub struct BuildLock {
	file: File,
	path: PathBuf,
}

impl BuildLock {
	/// Blocks until no other process is building into the same index directory.
	pub fn acquire(index_dir: &Path) -> Result<Self> {
		let path = lock_path(index_dir);
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)?;
		}
		let file = OpenOptions::new().create(true).truncate(true).read(true).write(true).open(&path)?;
		file.lock()?;
		debug!(lock = %path.display(), "build lock acquired");
		Ok(Self { file, path })
	}

	pub fn path(&self) -> &Path { &self.path }
}

impl Drop for BuildLock {
	fn drop(&mut self) {
		let _ = self.file.unlock();
	}
}

/// `<parent>/<name>.lock`, next to the index directory rather than inside it.
pub fn lock_path(index_dir: &Path) -> PathBuf {
	sibling(index_dir, "lock")
}

fn sibling(index_dir: &Path, suffix: &str) -> PathBuf {
	let name = index_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "index".to_string());
	let parent = index_dir.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
	parent.join(format!("{}.{}", name, suffix))
}
