use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use assessrec_core::catalog::CatalogLoader;
use assessrec_core::config::{Config, Settings};
use assessrec_core::traits::Embedder;
use assessrec_embed::embedder_from_settings;
use assessrec_core::types::{Recommendation, RecommendResponse};
use assessrec_recommend::{validate_query, Recommender};
use assessrec_vector::IndexManager;

#[derive(Parser, Debug)]
#[command(name = "assessrec", about = "Recommend catalog assessments for a hiring query")]
struct Cli {
    /// Directory holding config.toml; relative data paths resolve against it
    #[arg(long, global = true, env = "APP_BASE_DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed the catalog and replace the persisted index
    Build {
        /// Catalog CSV file or directory of CSV files
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Index directory to write
        #[arg(long)]
        index: Option<PathBuf>,
        /// Only index the first N usable rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print what the persisted index was built from, as JSON
    Status,
    /// Recommend assessments for a free-text query
    Recommend {
        query: String,
        /// Number of recommendations (defaults to retrieval.default_top_k)
        #[arg(long)]
        top_k: Option<i64>,
        /// Print the response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lance=warn,lancedb=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn load_config(base_dir: Option<PathBuf>) -> anyhow::Result<(Config, Settings)> {
    let config = match base_dir {
        Some(dir) => Config::load_from(&dir),
        None => Config::load(),
    }
    .context("loading configuration")?;
    let settings = config.settings().context("validating configuration")?;
    Ok((config, settings))
}

fn embedder(config: &Config, settings: &Settings) -> anyhow::Result<Arc<dyn Embedder>> {
    embedder_from_settings(&settings.embedding, config.model_dir(settings)).context("loading embedder")
}

/// Validates before touching the embedder or the index, so a bad request
/// never triggers a model load or an on-demand build.
async fn recommend(config: &Config, settings: &Settings, query: &str, top_k: Option<i64>) -> anyhow::Result<Vec<Recommendation>> {
    let top_k = top_k.unwrap_or(settings.retrieval.default_top_k);
    validate_query(query, top_k)?;
    let store = IndexManager::from_config(config, settings).open(embedder(config, settings)?).await?;
    let recommender = Recommender::from_settings(store, settings);
    Ok(recommender.recommend(query, top_k)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let (config, settings) = load_config(cli.base_dir)?;

    match cli.command {
        Command::Build { catalog, index, limit } => {
            let mut loader = CatalogLoader::new(settings.catalog.clone());
            if let Some(n) = limit {
                loader = loader.with_limit(n);
            }
            let manager = IndexManager::new(
                index.unwrap_or_else(|| config.index_dir(&settings)),
                catalog.unwrap_or_else(|| config.catalog_path(&settings)),
                loader,
            );
            let store = manager.rebuild(embedder(&config, &settings)?).await?;
            let meta = store.meta();
            info!(items = meta.item_count, embedder = %meta.embedder_id, index_dir = %manager.index_dir().display(), "build complete");
            println!("indexed {} assessments into {}", meta.item_count, manager.index_dir().display());
        }
        Command::Status => {
            let status = IndexManager::from_config(&config, &settings).status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Recommend { query, top_k, json } => {
            let recs = recommend(&config, &settings, &query, top_k).await?;
            if json {
                let response = RecommendResponse { recommendations: recs };
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else if recs.is_empty() {
                println!("no matching assessments");
            } else {
                for (i, r) in recs.iter().enumerate() {
                    let ty = if r.test_type.is_empty() { "-" } else { r.test_type.as_str() };
                    println!("{:>2}. [{}] {:.4}  {}\n    {}", i + 1, ty, r.score, r.name, r.url);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessrec_core::error::Error;

    /// MiniLM pointed at a model that does not exist, no index, no building.
    fn strict_config(dir: &std::path::Path) -> anyhow::Result<(Config, Settings)> {
        std::fs::write(
            dir.join("config.toml"),
            "[embedding]\nbackend = \"minilm\"\nmodel_dir = \"no-such-model\"\n\n[index]\nbuild_on_demand = false\n\n[data]\nindex_dir = \"index\"\n",
        )?;
        load_config(Some(dir.to_path_buf()))
    }

    fn client_error(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<Error>(), Some(Error::InvalidQuery(_)))
    }

    #[tokio::test]
    async fn bad_requests_fail_before_embedder_or_index() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let (config, settings) = strict_config(tmp.path())?;

        let err = recommend(&config, &settings, "   ", None).await.unwrap_err();
        assert!(client_error(&err), "unexpected error: {:#}", err);
        let err = recommend(&config, &settings, "java developer", Some(0)).await.unwrap_err();
        assert!(client_error(&err), "unexpected error: {:#}", err);
        assert!(!tmp.path().join("index").exists());
        Ok(())
    }

    #[tokio::test]
    async fn valid_request_reaches_the_embedder() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let (config, settings) = strict_config(tmp.path())?;
        let err = recommend(&config, &settings, "java developer", None).await.unwrap_err();
        assert!(!client_error(&err));
        assert!(format!("{:#}", err).contains("loading embedder"), "unexpected error: {:#}", err);
        Ok(())
    }
}
