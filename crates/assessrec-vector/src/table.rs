//! LanceDB connection and snapshot read/write.
//!
//! A snapshot is a directory holding two tables: `items` (one row per catalog
//! item with its vector) and `meta` (key/value build information).
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::{Array, ArrayRef, FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::ExecutableQuery;
use lancedb::{connect, Connection};
use tracing::debug;

use assessrec_core::error::{Error, Result};
use assessrec_core::types::{CatalogItem, TestType};

use crate::schema::{build_items_schema, build_meta_schema, ITEMS_TABLE, META_BUILT_AT, META_CATALOG_LIMIT, META_DIM, META_EMBEDDER_ID, META_FINGERPRINT, META_ITEM_COUNT, META_TABLE};
use crate::store::{EmbeddingStore, StoreMeta};

/// Rows read back from an `items` table, already in insertion order.
#[derive(Debug, Default)]
pub struct SnapshotRows {
	pub items: Vec<Arc<CatalogItem>>,
	pub vectors: Vec<Vec<f32>>,
	pub content_hashes: Vec<String>,
}

pub(crate) fn storage_err(e: impl std::fmt::Display) -> Error {
	Error::storage(e.to_string())
}

pub async fn open_db(dir: &Path) -> Result<Connection> {
	connect(dir.to_string_lossy().as_ref()).execute().await.map_err(storage_err)
}

async fn has_table(conn: &Connection, name: &str) -> Result<bool> {
	let names = conn.table_names().execute().await.map_err(storage_err)?;
	Ok(names.iter().any(|n| n == name))
}

/// Write `store` as a fresh snapshot into `dir`. The directory should be new.
pub async fn write_snapshot(dir: &Path, store: &EmbeddingStore) -> Result<()> {
	std::fs::create_dir_all(dir)?;
	let conn = open_db(dir).await?;

	let items_batch = items_to_record_batch(store)?;
	let schema = items_batch.schema();
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(items_batch)].into_iter(), schema));
	conn.create_table(ITEMS_TABLE, reader).execute().await.map_err(storage_err)?;

	let meta = store.meta();
	let mut entries = vec![
		(META_EMBEDDER_ID, meta.embedder_id.clone()),
		(META_DIM, meta.dim.to_string()),
		(META_ITEM_COUNT, meta.item_count.to_string()),
		(META_FINGERPRINT, meta.catalog_fingerprint.clone()),
		(META_BUILT_AT, meta.built_at.clone()),
	];
	if let Some(limit) = meta.catalog_limit {
		entries.push((META_CATALOG_LIMIT, limit.to_string()));
	}
	let meta_batch = RecordBatch::try_new(
		build_meta_schema(),
		vec![
			Arc::new(StringArray::from_iter_values(entries.iter().map(|(k, _)| *k))),
			Arc::new(StringArray::from_iter_values(entries.iter().map(|(_, v)| v.as_str()))),
		],
	)
	.map_err(storage_err)?;
	let reader = Box::new(RecordBatchIterator::new(vec![Ok(meta_batch)].into_iter(), build_meta_schema()));
	conn.create_table(META_TABLE, reader).execute().await.map_err(storage_err)?;
	debug!(dir = %dir.display(), items = store.len(), "snapshot written");
	Ok(())
}

fn items_to_record_batch(store: &EmbeddingStore) -> Result<RecordBatch> {
	let dim = i32::try_from(store.meta().dim).map_err(storage_err)?;
	let items = store.items();
	let positions: Vec<i32> = (0..items.len()).map(|i| i as i32).collect();
	let names: Vec<&str> = items.iter().map(|it| it.name.as_str()).collect();
	let urls: Vec<&str> = items.iter().map(|it| it.url.as_str()).collect();
	let types: Vec<Option<&str>> = items.iter().map(|it| it.test_type.as_ref().map(|t| t.code())).collect();
	let texts: Vec<&str> = items.iter().map(|it| it.source_text.as_str()).collect();
	let hashes: Vec<&str> = store.content_hashes().iter().map(String::as_str).collect();
	let vectors = store.vectors().iter().map(|v| Some(v.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
	let columns: Vec<ArrayRef> = vec![
		Arc::new(Int32Array::from(positions)),
		Arc::new(StringArray::from(names)),
		Arc::new(StringArray::from(urls)),
		Arc::new(StringArray::from(types)),
		Arc::new(StringArray::from(texts)),
		Arc::new(StringArray::from(hashes)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
	];
	RecordBatch::try_new(build_items_schema(dim), columns).map_err(storage_err)
}

/// Build metadata of the snapshot in `dir`, or `None` when there is none.
pub async fn read_meta(dir: &Path) -> Result<Option<StoreMeta>> {
	if !dir.is_dir() {
		return Ok(None);
	}
	let conn = open_db(dir).await?;
	if !has_table(&conn, META_TABLE).await? || !has_table(&conn, ITEMS_TABLE).await? {
		return Ok(None);
	}
	let table = conn.open_table(META_TABLE).execute().await.map_err(storage_err)?;
	let mut stream = table.query().execute().await.map_err(storage_err)?;
	let mut kv = HashMap::new();
	while let Some(batch) = stream.try_next().await.map_err(storage_err)? {
		let keys = string_column(&batch, "key")?;
		let values = string_column(&batch, "value")?;
		for i in 0..batch.num_rows() {
			kv.insert(keys.value(i).to_string(), values.value(i).to_string());
		}
	}
	let get = |key: &str| kv.get(key).cloned().ok_or_else(|| Error::storage(format!("meta key '{}' missing", key)));
	let parse_usize = |key: &str| get(key)?.parse::<usize>().map_err(|e| Error::storage(format!("meta key '{}': {}", key, e)));
	Ok(Some(StoreMeta {
		embedder_id: get(META_EMBEDDER_ID)?,
		dim: parse_usize(META_DIM)?,
		item_count: parse_usize(META_ITEM_COUNT)?,
		catalog_fingerprint: get(META_FINGERPRINT)?,
		built_at: get(META_BUILT_AT)?,
		catalog_limit: kv.contains_key(META_CATALOG_LIMIT).then(|| parse_usize(META_CATALOG_LIMIT)).transpose()?,
	}))
}

/// All item rows in `dir`, sorted back into insertion order.
pub async fn read_items(dir: &Path) -> Result<SnapshotRows> {
	let conn = open_db(dir).await?;
	let table = conn.open_table(ITEMS_TABLE).execute().await.map_err(storage_err)?;
	let mut stream = table.query().execute().await.map_err(storage_err)?;
	let mut rows: Vec<(i32, CatalogItem, String, Vec<f32>)> = Vec::new();
	while let Some(batch) = stream.try_next().await.map_err(storage_err)? {
		let positions = batch
			.column_by_name("position")
			.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
			.ok_or_else(|| Error::storage("items.position column missing"))?;
		let names = string_column(&batch, "name")?;
		let urls = string_column(&batch, "url")?;
		let types = string_column(&batch, "test_type")?;
		let texts = string_column(&batch, "source_text")?;
		let hashes = string_column(&batch, "content_hash")?;
		let vectors = batch
			.column_by_name("vector")
			.and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
			.ok_or_else(|| Error::storage("items.vector column missing"))?;
		for i in 0..batch.num_rows() {
			if vectors.is_null(i) {
				return Err(Error::storage(format!("item row {} has no vector", positions.value(i))));
			}
			let values = vectors.value(i);
			let vector = values
				.as_primitive_opt::<Float32Type>()
				.ok_or_else(|| Error::storage("items.vector is not float32"))?
				.values()
				.to_vec();
			let test_type = if types.is_null(i) { None } else { TestType::parse(types.value(i)) };
			let item = CatalogItem {
				name: names.value(i).to_string(),
				url: urls.value(i).to_string(),
				test_type,
				source_text: texts.value(i).to_string(),
			};
			rows.push((positions.value(i), item, hashes.value(i).to_string(), vector));
		}
	}
	rows.sort_by_key(|(pos, ..)| *pos);
	let mut out = SnapshotRows::default();
	for (_, item, hash, vector) in rows {
		out.items.push(Arc::new(item));
		out.content_hashes.push(hash);
		out.vectors.push(vector);
	}
	Ok(out)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| Error::storage(format!("{} column missing or not utf8", name)))
}
