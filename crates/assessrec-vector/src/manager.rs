//! Index lifecycle: load a persisted store, or build one from the catalog.
//!
//! Every build lands in a fresh snapshot directory and is published by
//! switching the `CURRENT` pointer (see [`crate::active`]), so the index
//! directory is never missing while a reader resolves it. Builders serialize
//! on a lock file next to the index directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use assessrec_core::catalog::CatalogLoader;
use assessrec_core::config::{Config, Settings};
use assessrec_core::error::{Error, Result};
use assessrec_core::traits::Embedder;

use crate::active;
use crate::lock::BuildLock;
use crate::store::{catalog_fingerprint, EmbeddingStore, StoreMeta};
use crate::table::{read_items, read_meta, write_snapshot};

/// Snapshots kept behind the active one, for readers still loading them.
const KEEP_PREVIOUS: usize = 1;
/// Reads retried when `CURRENT` moves underneath them.
const READ_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
	pub index_dir: PathBuf,
	pub present: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(flatten)]
	pub meta: Option<StoreMeta>,
}

#[derive(Debug, Clone)]
pub struct IndexManager {
	index_dir: PathBuf,
	catalog_path: PathBuf,
	loader: CatalogLoader,
	build_on_demand: bool,
}

impl IndexManager {
	pub fn new(index_dir: impl Into<PathBuf>, catalog_path: impl Into<PathBuf>, loader: CatalogLoader) -> Self {
		Self { index_dir: index_dir.into(), catalog_path: catalog_path.into(), loader, build_on_demand: true }
	}

	pub fn from_config(config: &Config, settings: &Settings) -> Self {
		Self::new(config.index_dir(settings), config.catalog_path(settings), CatalogLoader::new(settings.catalog.clone()))
			.with_build_on_demand(settings.index.build_on_demand)
	}

	pub fn with_build_on_demand(mut self, enabled: bool) -> Self {
		self.build_on_demand = enabled;
		self
	}

	pub fn with_loader(mut self, loader: CatalogLoader) -> Self {
		self.loader = loader;
		self
	}

	pub fn index_dir(&self) -> &Path { &self.index_dir }

	pub fn catalog_path(&self) -> &Path { &self.catalog_path }

	/// Reads only the meta table; never embeds or loads vectors.
	pub async fn status(&self) -> Result<IndexStatus> {
		let active = self.read_active_meta().await?;
		let (version, meta) = match active {
			Some((version, meta)) => (Some(version), Some(meta)),
			None => (None, None),
		};
		Ok(IndexStatus { index_dir: self.index_dir.clone(), present: meta.is_some(), version, meta })
	}

	/// Load the persisted store if it matches `embedder`, otherwise build one
	/// when building on demand is allowed.
	pub async fn open(&self, embedder: Arc<dyn Embedder>) -> Result<EmbeddingStore> {
		if let Some(store) = self.load_active(&embedder).await? {
			self.warn_if_stale(store.meta());
			return Ok(store);
		}
		let reason = match self.read_active_meta().await? {
			Some((_, meta)) => format!("index at {} was built with '{}', active embedder is '{}'", self.index_dir.display(), meta.embedder_id, embedder.embedder_id()),
			None => format!("no index at {}", self.index_dir.display()),
		};
		if !self.build_on_demand {
			return Err(Error::index_unavailable(format!("{}; run `assessrec build`", reason)));
		}
		info!("{}; building on demand", reason);
		self.build(embedder, true).await
	}

	/// Build from the catalog and publish it as the active snapshot.
	/// Vectors of unchanged items are reused from the active snapshot when it
	/// was built by the same embedder.
	pub async fn rebuild(&self, embedder: Arc<dyn Embedder>) -> Result<EmbeddingStore> {
		self.build(embedder, false).await
	}

	/// True when the catalog on disk no longer matches what `meta` was built
	/// from. A missing catalog is not stale.
	pub fn is_stale(&self, meta: &StoreMeta) -> Result<bool> {
		if !self.catalog_path.exists() {
			return Ok(false);
		}
		let loader = match meta.catalog_limit {
			Some(limit) => self.loader.clone().with_limit(limit),
			None => self.loader.clone(),
		};
		let items = loader.load(&self.catalog_path)?;
		Ok(catalog_fingerprint(&items) != meta.catalog_fingerprint)
	}

	async fn build(&self, embedder: Arc<dyn Embedder>, only_if_missing: bool) -> Result<EmbeddingStore> {
		let _lock = self.acquire_lock().await?;
		if only_if_missing {
			if let Some(store) = self.load_active(&embedder).await? {
				info!(index_dir = %self.index_dir.display(), "index appeared while waiting for the build lock");
				return Ok(store);
			}
		}

		let items = self.loader.load(&self.catalog_path)?;
		let previous = match self.load_active(&embedder).await {
			Ok(previous) => previous,
			Err(e) => {
				warn!(error = %e, "existing index unreadable; embedding everything");
				None
			}
		};
		let store = EmbeddingStore::build_with_reuse(items, embedder, previous.as_ref())?.with_catalog_limit(self.loader.limit());
		drop(previous);

		fs::create_dir_all(&self.index_dir)?;
		let version = active::next_version(&self.index_dir)?;
		let dir = active::version_dir(&self.index_dir, &version);
		if let Err(e) = write_snapshot(&dir, &store).await {
			let _ = fs::remove_dir_all(&dir);
			return Err(e);
		}
		active::set_current(&self.index_dir, &version)?;
		if let Err(e) = active::prune(&self.index_dir, KEEP_PREVIOUS) {
			warn!(index_dir = %self.index_dir.display(), error = %e, "could not prune old snapshots");
		}
		info!(index_dir = %self.index_dir.display(), version, items = store.len(), embedder = %store.meta().embedder_id, "index built");
		Ok(store)
	}

	async fn acquire_lock(&self) -> Result<BuildLock> {
		let dir = self.index_dir.clone();
		tokio::task::spawn_blocking(move || BuildLock::acquire(&dir))
			.await
			.map_err(|e| Error::build(format!("build lock task failed: {}", e)))?
	}

	async fn read_active_meta(&self) -> Result<Option<(String, StoreMeta)>> {
		let mut attempt = 0;
		loop {
			attempt += 1;
			let Some(version) = active::current_version(&self.index_dir)? else {
				return Ok(None);
			};
			let dir = active::version_dir(&self.index_dir, &version);
			match snapshot_meta(&dir).await {
				Ok(meta) => return Ok(Some((version, meta))),
				Err(e) if attempt < READ_ATTEMPTS && self.moved_from(&version)? => {
					debug!(version, error = %e, "active snapshot changed during read; retrying");
				}
				Err(e) => return Err(e),
			}
		}
	}

	/// `Ok(None)` when there is no index or it belongs to another embedder.
	async fn load_active(&self, embedder: &Arc<dyn Embedder>) -> Result<Option<EmbeddingStore>> {
		let mut attempt = 0;
		loop {
			attempt += 1;
			let Some(version) = active::current_version(&self.index_dir)? else {
				return Ok(None);
			};
			let dir = active::version_dir(&self.index_dir, &version);
			match load_snapshot(&dir, embedder).await {
				Ok(found) => return Ok(found),
				Err(e) if attempt < READ_ATTEMPTS && self.moved_from(&version)? => {
					debug!(version, error = %e, "active snapshot changed during load; retrying");
				}
				Err(e) => return Err(e),
			}
		}
	}

	fn moved_from(&self, version: &str) -> Result<bool> {
		Ok(active::current_version(&self.index_dir)?.as_deref() != Some(version))
	}

	fn warn_if_stale(&self, meta: &StoreMeta) {
		match self.is_stale(meta) {
			Ok(true) => warn!(catalog = %self.catalog_path.display(), "catalog changed since the index was built; run `assessrec build` to refresh"),
			Ok(false) => {}
			Err(e) => warn!(error = %e, "could not read catalog to check index freshness"),
		}
	}
}

async fn snapshot_meta(dir: &Path) -> Result<StoreMeta> {
	read_meta(dir).await?.ok_or_else(|| Error::index_unavailable(format!("snapshot {} has no meta", dir.display())))
}

async fn load_snapshot(dir: &Path, embedder: &Arc<dyn Embedder>) -> Result<Option<EmbeddingStore>> {
	let meta = snapshot_meta(dir).await?;
	if meta.embedder_id != embedder.embedder_id() {
		return Ok(None);
	}
	let rows = read_items(dir).await?;
	if rows.items.len() != meta.item_count {
		return Err(Error::index_unavailable(format!("index meta says {} items but {} rows were read", meta.item_count, rows.items.len())));
	}
	let store = EmbeddingStore::from_parts(rows.items, rows.vectors, rows.content_hashes, meta, Arc::clone(embedder))?;
	info!(snapshot = %dir.display(), items = store.len(), "index loaded");
	Ok(Some(store))
}
