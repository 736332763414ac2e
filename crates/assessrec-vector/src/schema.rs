use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ITEMS_TABLE: &str = "items";
pub const META_TABLE: &str = "meta";

pub const META_EMBEDDER_ID: &str = "embedder_id";
pub const META_DIM: &str = "dim";
pub const META_ITEM_COUNT: &str = "item_count";
pub const META_FINGERPRINT: &str = "catalog_fingerprint";
pub const META_BUILT_AT: &str = "built_at";
pub const META_CATALOG_LIMIT: &str = "catalog_limit";

/// One row per catalog item. `position` is the corpus insertion order and is
/// what search tie-breaking relies on after a reload.
pub fn build_items_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("position", DataType::Int32, false),
		Field::new("name", DataType::Utf8, false),
		Field::new("url", DataType::Utf8, false),
		Field::new("test_type", DataType::Utf8, true),
		Field::new("source_text", DataType::Utf8, false),
		Field::new("content_hash", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
	]))
}
