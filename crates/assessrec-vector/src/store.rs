//! In-memory embedding store: one vector per catalog item, searched exactly.
//!
//! Scores are cosine similarity, higher is more similar. Ties keep corpus
//! insertion order, so the same store and query always give the same list.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use assessrec_core::error::{Error, Result};
use assessrec_core::traits::{Embedder, Retriever};
use assessrec_core::types::{Candidate, CatalogItem};

const EMBED_BATCH: usize = 64;

/// What a store was built from. Persisted next to the vectors.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StoreMeta {
	pub embedder_id: String,
	pub dim: usize,
	pub item_count: usize,
	pub catalog_fingerprint: String,
	pub built_at: String,
	/// Row limit the catalog was loaded with, when the build used one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub catalog_limit: Option<usize>,
}

pub struct EmbeddingStore {
	items: Vec<Arc<CatalogItem>>,
	vectors: Vec<Vec<f32>>,
	norms: Vec<f32>,
	content_hashes: Vec<String>,
	meta: StoreMeta,
	embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for EmbeddingStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EmbeddingStore").field("items", &self.items.len()).field("meta", &self.meta).finish()
	}
}

impl EmbeddingStore {
	/// Embed every item's source text. Fails with `Error::Build` on an empty corpus
	/// or an item with blank text.
	pub fn build(items: Vec<CatalogItem>, embedder: Arc<dyn Embedder>) -> Result<Self> {
		Self::build_with_reuse(items, embedder, None)
	}

	/// Like [`EmbeddingStore::build`], but copies vectors out of `previous` for
	/// items whose content hash is unchanged, provided it was built by the same
	/// embedder.
	pub fn build_with_reuse(items: Vec<CatalogItem>, embedder: Arc<dyn Embedder>, previous: Option<&EmbeddingStore>) -> Result<Self> {
		if items.is_empty() {
			return Err(Error::build("cannot build an index from an empty catalog"));
		}
		if let Some(blank) = items.iter().find(|it| it.source_text.trim().is_empty()) {
			return Err(Error::build(format!("item '{}' has no text to embed", blank.name)));
		}
		let dim = embedder.dim();
		let hashes: Vec<String> = items.iter().map(content_hash).collect();

		let reusable: HashMap<&str, &Vec<f32>> = match previous {
			Some(prev) if prev.meta.embedder_id == embedder.embedder_id() => {
				prev.content_hashes.iter().map(String::as_str).zip(prev.vectors.iter()).collect()
			}
			_ => HashMap::new(),
		};

		let mut vectors: Vec<Option<Vec<f32>>> = hashes.iter().map(|h| reusable.get(h.as_str()).map(|v| (*v).clone())).collect();
		let pending: Vec<usize> = vectors.iter().enumerate().filter(|(_, v)| v.is_none()).map(|(i, _)| i).collect();
		info!(items = items.len(), reused = items.len() - pending.len(), to_embed = pending.len(), embedder = embedder.embedder_id(), "building embedding store");

		if !pending.is_empty() {
			let pb = ProgressBar::new(pending.len() as u64);
			let style = ProgressStyle::default_bar()
				.template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} items ({percent}%)")
				.map(|s| s.progress_chars("#>-"))
				.unwrap_or_else(|_| ProgressStyle::default_bar());
			pb.set_style(style);
			for chunk in pending.chunks(EMBED_BATCH) {
				let texts: Vec<String> = chunk.iter().map(|&i| items[i].source_text.clone()).collect();
				let embedded = embedder.embed_batch(&texts)?;
				if embedded.len() != chunk.len() {
					return Err(Error::build(format!("embedder returned {} vectors for {} texts", embedded.len(), chunk.len())));
				}
				for (&i, v) in chunk.iter().zip(embedded) {
					vectors[i] = Some(v);
				}
				pb.inc(chunk.len() as u64);
			}
			pb.finish_and_clear();
		}

		let vectors: Vec<Vec<f32>> = vectors.into_iter().flatten().collect();
		let meta = StoreMeta {
			embedder_id: embedder.embedder_id().to_string(),
			dim,
			item_count: items.len(),
			catalog_fingerprint: catalog_fingerprint(&items),
			built_at: Utc::now().to_rfc3339(),
			catalog_limit: None,
		};
		let items = items.into_iter().map(Arc::new).collect();
		Self::from_parts(items, vectors, hashes, meta, embedder).map_err(|e| match e {
			Error::IndexUnavailable(msg) => Error::build(msg),
			other => other,
		})
	}

	/// Reassemble a store from persisted rows. Refuses a mismatched embedder.
	pub fn from_parts(items: Vec<Arc<CatalogItem>>, vectors: Vec<Vec<f32>>, content_hashes: Vec<String>, meta: StoreMeta, embedder: Arc<dyn Embedder>) -> Result<Self> {
		if meta.embedder_id != embedder.embedder_id() {
			return Err(Error::index_unavailable(format!("index was built with '{}' but the active embedder is '{}'", meta.embedder_id, embedder.embedder_id())));
		}
		if items.len() != vectors.len() || items.len() != content_hashes.len() {
			return Err(Error::index_unavailable(format!("index is inconsistent: {} items, {} vectors, {} hashes", items.len(), vectors.len(), content_hashes.len())));
		}
		if let Some((i, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != embedder.dim()) {
			return Err(Error::index_unavailable(format!("vector {} has dimension {}, expected {}", i, v.len(), embedder.dim())));
		}
		let norms = vectors.iter().map(|v| l2_norm(v)).collect();
		Ok(Self { items, vectors, norms, content_hashes, meta, embedder })
	}

	/// Top `k` items for `query`, best first. Blank queries are rejected before
	/// the embedder is called.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
		if query.trim().is_empty() {
			return Err(Error::invalid_query("query must not be empty"));
		}
		if k == 0 {
			return Ok(Vec::new());
		}
		let q = self.embedder.embed_one(query)?;
		self.search_vec(&q, k)
	}

	pub fn search_vec(&self, q: &[f32], k: usize) -> Result<Vec<Candidate>> {
		if q.len() != self.meta.dim {
			return Err(Error::embedding(format!("query vector has dimension {}, store expects {}", q.len(), self.meta.dim)));
		}
		let q_norm = l2_norm(q);
		let mut scored: Vec<(usize, f32)> = self
			.vectors
			.iter()
			.zip(&self.norms)
			.enumerate()
			.map(|(i, (v, &n))| (i, cosine(q, q_norm, v, n)))
			.collect();
		// Stable sort: equal scores stay in insertion order.
		scored.sort_by(|a, b| b.1.total_cmp(&a.1));
		scored.truncate(k);
		debug!(k, returned = scored.len(), "store search");
		Ok(scored.into_iter().map(|(i, score)| Candidate { item: Arc::clone(&self.items[i]), score }).collect())
	}

	/// Record that the catalog was loaded with a row limit.
	pub fn with_catalog_limit(mut self, limit: Option<usize>) -> Self {
		self.meta.catalog_limit = limit;
		self
	}

	pub fn len(&self) -> usize { self.items.len() }

	pub fn is_empty(&self) -> bool { self.items.is_empty() }

	pub fn meta(&self) -> &StoreMeta { &self.meta }

	pub fn items(&self) -> &[Arc<CatalogItem>] { &self.items }

	pub fn vectors(&self) -> &[Vec<f32>] { &self.vectors }

	pub fn content_hashes(&self) -> &[String] { &self.content_hashes }

	pub fn embedder(&self) -> &Arc<dyn Embedder> { &self.embedder }
}

impl Retriever for EmbeddingStore {
	fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Candidate>> {
		self.search(query, k)
	}
}

/// Hash of everything that feeds an item's vector. Unchanged hash means the
/// stored vector can be reused.
pub fn content_hash(item: &CatalogItem) -> String {
	blake3::hash(item.source_text.as_bytes()).to_hex().to_string()
}

/// Order-sensitive digest of the whole catalog, used to notice a stale index.
pub fn catalog_fingerprint(items: &[CatalogItem]) -> String {
	let mut hasher = blake3::Hasher::new();
	for item in items {
		let ty = item.test_type.as_ref().map(|t| t.code()).unwrap_or("");
		for field in [item.name.as_str(), item.url.as_str(), ty, item.source_text.as_str()] {
			hasher.update(field.as_bytes());
			hasher.update(&[0]);
		}
		hasher.update(b"\n");
	}
	hasher.finalize().to_hex().to_string()
}

fn l2_norm(v: &[f32]) -> f32 {
	v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
	if a_norm == 0.0 || b_norm == 0.0 {
		return 0.0;
	}
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	dot / (a_norm * b_norm)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_of_zero_vector_is_zero() {
		assert_eq!(cosine(&[0.0, 0.0], 0.0, &[1.0, 0.0], 1.0), 0.0);
	}

	#[test]
	fn fingerprint_changes_with_order() {
		let a = CatalogItem { name: "A".into(), url: "u/a".into(), test_type: None, source_text: "a".into() };
		let b = CatalogItem { name: "B".into(), url: "u/b".into(), test_type: None, source_text: "b".into() };
		assert_ne!(catalog_fingerprint(&[a.clone(), b.clone()]), catalog_fingerprint(&[b, a]));
	}
}
