//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_INDEX__BUILD_ON_DEMAND`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against the directory the config files were read from.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::TestType;

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
    env_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let base_dir = env::current_dir()?;
        Self::load_from(&base_dir)
    }

    /// Load `config.toml` and the env-specific overlay from `base_dir`. Missing files are fine.
    pub fn load_from(base_dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base_dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base_dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base_dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base_dir.join("config.test.toml"))),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: base_dir.to_path_buf(), env_name })
    }

    /// Wrap an explicit figment; relative paths resolve against `base_dir`.
    pub fn from_figment(figment: Figment, base_dir: &Path, env_name: &str) -> Self {
        Self { figment, base_dir: base_dir.to_path_buf(), env_name: env_name.to_string() }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn base_dir(&self) -> &Path { &self.base_dir }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        if fake_embeddings_forced() {
            settings.embedding.backend = EmbeddingBackend::Hashed;
        }
        settings.validate()?;
        self.validate_for_env(&settings)?;
        Ok(settings)
    }

    fn validate_for_env(&self, settings: &Settings) -> Result<()> {
        match self.env_name.as_str() {
            "prod" | "production" => {
                if settings.embedding.backend == EmbeddingBackend::Hashed {
                    return Err(Error::InvalidConfig(
                        "production must not serve the hashed test embedder".to_string(),
                    ));
                }
            }
            "dev" | "development" | "test" | "testing" => {}
            _ => {}
        }
        Ok(())
    }

    pub fn catalog_path(&self, settings: &Settings) -> PathBuf {
        resolve_with_base(&self.base_dir, &settings.data.catalog_csv)
    }

    pub fn index_dir(&self, settings: &Settings) -> PathBuf {
        resolve_with_base(&self.base_dir, &settings.data.index_dir)
    }

    pub fn model_dir(&self, settings: &Settings) -> Option<PathBuf> {
        settings.embedding.model_dir.as_ref().map(|p| resolve_with_base(&self.base_dir, p))
    }
}

/// `APP_USE_FAKE_EMBEDDINGS=1` swaps in the hashed embedder regardless of config.
pub fn fake_embeddings_forced() -> bool {
    env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub retrieval: RetrievalSettings,
    pub selector: SelectorSettings,
    pub index: IndexSettings,
    pub embedding: EmbeddingSettings,
    pub catalog: CatalogSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// A CSV file, or a directory whose `*.csv` files are read in name order.
    pub catalog_csv: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { catalog_csv: "data/catalog.csv".to_string(), index_dir: "data/index".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Candidates pulled from the store before rebalancing.
    pub over_fetch: usize,
    pub default_top_k: i64,
}

impl Default for RetrievalSettings {
    fn default() -> Self { Self { over_fetch: 30, default_top_k: crate::types::DEFAULT_TOP_K } }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    /// Bucket keys in priority order; the first one also receives unknown types.
    pub type_order: Vec<String>,
}

impl Default for SelectorSettings {
    fn default() -> Self { Self { type_order: vec!["K".to_string(), "P".to_string(), "A".to_string()] } }
}

impl SelectorSettings {
    pub fn bucket_keys(&self) -> Vec<TestType> {
        self.type_order.iter().filter_map(|code| TestType::parse(code)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub build_on_demand: bool,
}

impl Default for IndexSettings {
    fn default() -> Self { Self { build_on_demand: true } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// all-MiniLM-L6-v2 sentence embeddings via candle.
    Minilm,
    /// Feature-hashed bag of words; deterministic and model-free.
    Hashed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub backend: EmbeddingBackend,
    pub model_dir: Option<String>,
    pub max_len: usize,
    pub batch_size: usize,
    pub hashed_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { backend: EmbeddingBackend::Minilm, model_dir: None, max_len: 256, batch_size: 32, hashed_dim: 384 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub enrich_keywords: bool,
    pub keywords: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        let keywords = ["java", "python", "sql", "c++", ".net", "data science", "javascript", "automata"];
        Self { enrich_keywords: true, keywords: keywords.iter().map(|k| k.to_string()).collect() }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.over_fetch == 0 {
            return Err(Error::InvalidConfig("retrieval.over_fetch must be at least 1".to_string()));
        }
        if self.retrieval.default_top_k < 1 {
            return Err(Error::InvalidConfig("retrieval.default_top_k must be at least 1".to_string()));
        }
        if self.selector.type_order.is_empty() {
            return Err(Error::InvalidConfig("selector.type_order must name at least one type".to_string()));
        }
        if let Some(bad) = self.selector.type_order.iter().find(|c| TestType::parse(c).is_none()) {
            return Err(Error::InvalidConfig(format!("selector.type_order has a blank entry: {:?}", bad)));
        }
        if self.embedding.hashed_dim == 0 || self.embedding.batch_size == 0 || self.embedding.max_len == 0 {
            return Err(Error::InvalidConfig("embedding sizes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
