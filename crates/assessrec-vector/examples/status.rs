use std::path::PathBuf;

use assessrec_vector::IndexManager;
use assessrec_core::catalog::CatalogLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let index_dir = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("data/index"));
	let manager = IndexManager::new(index_dir.clone(), "data/catalog.csv", CatalogLoader::default());
	let status = manager.status().await?;
	match &status.meta {
		Some(meta) => println!(
			"index {} ({}): items={} embedder={} dim={} built_at={}",
			index_dir.display(),
			status.version.as_deref().unwrap_or("?"),
			meta.item_count,
			meta.embedder_id,
			meta.dim,
			meta.built_at
		),
		None => println!("no index at {}", index_dir.display()),
	}
	Ok(())
}
