//! Catalog loading: CSV rows from the scraper become immutable `CatalogItem`s.
//!
//! Bad rows never abort a load. They are skipped with a warning, and only a
//! load that ends with no usable rows is an error.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::CatalogSettings;
use crate::error::{Error, Result};
use crate::types::{CatalogItem, TestType};

/// One raw CSV row. Accepts both the scraper's headers and the normalized ones.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    #[serde(default, alias = "Assessment Name")]
    name: Option<String>,
    #[serde(default, alias = "URL")]
    url: Option<String>,
    #[serde(default, alias = "Test Type")]
    test_type: Option<String>,
    #[serde(default, alias = "Description")]
    description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogLoader {
    settings: CatalogSettings,
    limit: Option<usize>,
}

impl CatalogLoader {
    pub fn new(settings: CatalogSettings) -> Self { Self { settings, limit: None } }

    /// Keep only the first `limit` usable rows.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn limit(&self) -> Option<usize> { self.limit }

    /// Load from a single CSV file or from every `*.csv` under a directory.
    pub fn load(&self, path: &Path) -> Result<Vec<CatalogItem>> {
        let files = if path.is_dir() { list_csv_files(path) } else { vec![path.to_path_buf()] };
        if files.is_empty() {
            return Err(Error::build(format!("no .csv files found under {}", path.display())));
        }
        let mut items = Vec::new();
        for file in &files {
            self.load_file(file, &mut items)?;
            if self.limit.is_some_and(|lim| items.len() >= lim) { break; }
        }
        if let Some(lim) = self.limit { items.truncate(lim); }
        if items.is_empty() {
            return Err(Error::build(format!("catalog {} has no usable rows", path.display())));
        }
        info!(items = items.len(), files = files.len(), "catalog loaded");
        Ok(items)
    }

    fn load_file(&self, file: &Path, items: &mut Vec<CatalogItem>) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(file)
            .map_err(|e| Error::build(format!("cannot read {}: {}", file.display(), e)))?;
        let mut skipped = 0usize;
        for (row_index, record) in reader.deserialize::<CatalogRow>().enumerate() {
            // Header is line 1.
            let line = row_index + 2;
            let row = match record {
                Ok(row) => row,
                Err(e) => {
                    warn!(file = %file.display(), line, error = %e, "skipping malformed catalog row");
                    skipped += 1;
                    continue;
                }
            };
            match self.row_to_item(row) {
                Some(item) => items.push(item),
                None => {
                    warn!(file = %file.display(), line, "skipping catalog row without name or url");
                    skipped += 1;
                }
            }
            if self.limit.is_some_and(|lim| items.len() >= lim) { break; }
        }
        debug!(file = %file.display(), skipped, "catalog file read");
        Ok(())
    }

    fn row_to_item(&self, row: CatalogRow) -> Option<CatalogItem> {
        let name = non_blank(row.name)?;
        let url = non_blank(row.url)?;
        let test_type = row.test_type.as_deref().and_then(TestType::parse);
        let description = non_blank(row.description).filter(|d| !d.eq_ignore_ascii_case("n/a"));
        let source_text = match description {
            Some(desc) if self.settings.enrich_keywords => enrich_description(&name, &desc, &self.settings.keywords),
            Some(desc) => desc,
            None => name.clone(),
        };
        Some(CatalogItem { name, url, test_type, source_text })
    }
}

/// Append keywords that appear in the product name but not in its description,
/// so products like "Core Java (Advanced)" match queries that only say "java".
pub fn enrich_description(name: &str, description: &str, keywords: &[String]) -> String {
    let name_lower = name.to_lowercase();
    let desc_lower = description.to_lowercase();
    let extra: Vec<&str> = keywords
        .iter()
        .map(String::as_str)
        .filter(|k| name_lower.contains(k) && !desc_lower.contains(k))
        .collect();
    if extra.is_empty() {
        description.to_string()
    } else {
        format!("{} Keywords: {}", description, extra.join(" "))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn list_csv_files(root: &Path) -> Vec<PathBuf> {
    let mut csv_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .collect();
    csv_files.sort();
    csv_files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn enrich_appends_missing_name_keywords() {
        let out = enrich_description("Core Java (Advanced Level)", "Measures OOP knowledge.", &kw(&["java", "sql"]));
        assert_eq!(out, "Measures OOP knowledge. Keywords: java");
    }

    #[test]
    fn enrich_leaves_description_alone_when_keyword_present() {
        let out = enrich_description("Java 8", "Tests Java 8 features.", &kw(&["java"]));
        assert_eq!(out, "Tests Java 8 features.");
    }
}
