use std::fs;
use tempfile::TempDir;

use assessrec_core::catalog::CatalogLoader;
use assessrec_core::config::{CatalogSettings, Config, EmbeddingBackend, Settings};
use assessrec_core::types::TestType;
use assessrec_core::Error;
use figment::providers::{Format, Serialized, Toml};
use figment::Figment;

const SCRAPER_CSV: &str = "\
Assessment Name,URL,Description,Test Type
Core Java (Advanced Level),https://example.test/core-java,Measures object oriented design knowledge.,K
OPQ32r,https://example.test/opq32r,Personality questionnaire for workplace behaviour.,P
Verify Numerical,https://example.test/verify-num,N/A,A
";

#[test]
fn load_scraper_headers_with_enrichment() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.csv");
    fs::write(&path, SCRAPER_CSV).unwrap();

    let items = CatalogLoader::new(CatalogSettings::default()).load(&path).expect("load");

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].name, "Core Java (Advanced Level)");
    assert_eq!(items[0].test_type, Some(TestType::Knowledge));
    assert!(items[0].source_text.ends_with("Keywords: java"), "got {}", items[0].source_text);
    assert_eq!(items[1].test_type, Some(TestType::Personality));
    // "N/A" descriptions fall back to the product name
    assert_eq!(items[2].source_text, "Verify Numerical");
}

#[test]
fn load_normalized_headers_and_missing_type() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.csv");
    fs::write(&path, "name,url,test_type,description\nSQL Server,https://example.test/sql,,Query writing.\n").unwrap();

    let items = CatalogLoader::new(CatalogSettings::default()).load(&path).expect("load");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].test_type, None);
    assert_eq!(items[0].source_text, "Query writing. Keywords: sql");
}

#[test]
fn malformed_rows_are_skipped_not_fatal() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.csv");
    let body = "\
name,url,test_type,description
Good One,https://example.test/1,K,First product.
Too,Many,Fields,In,This,Row
,https://example.test/no-name,P,Nameless row.
Good Two,https://example.test/2,P,Second product.
";
    fs::write(&path, body).unwrap();

    let items = CatalogLoader::new(CatalogSettings::default()).load(&path).expect("load");

    let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Good One", "Good Two"]);
}

#[test]
fn empty_catalog_is_a_build_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("catalog.csv");
    fs::write(&path, "name,url,test_type,description\n").unwrap();

    let err = CatalogLoader::new(CatalogSettings::default()).load(&path).unwrap_err();
    assert!(matches!(err, Error::Build(_)), "got {err:?}");
}

#[test]
fn unreadable_catalog_is_a_build_error() {
    let tmp = TempDir::new().unwrap();
    let err = CatalogLoader::new(CatalogSettings::default())
        .load(&tmp.path().join("missing.csv"))
        .unwrap_err();
    assert!(matches!(err, Error::Build(_)), "got {err:?}");
}

#[test]
fn directory_of_csv_files_with_limit() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.csv"), "name,url,test_type,description\nA1,https://x/a1,K,alpha\nA2,https://x/a2,K,bravo\n").unwrap();
    fs::write(tmp.path().join("b.csv"), "name,url,test_type,description\nB1,https://x/b1,P,charlie\n").unwrap();
    fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

    let all = CatalogLoader::new(CatalogSettings::default()).load(tmp.path()).expect("load dir");
    assert_eq!(all.len(), 3);

    let limited = CatalogLoader::new(CatalogSettings::default()).with_limit(2).load(tmp.path()).expect("load limited");
    let names: Vec<&str> = limited.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["A1", "A2"]);
}

#[test]
fn settings_defaults_and_overrides() {
    let tmp = TempDir::new().unwrap();
    let figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(
        r#"
        [retrieval]
        over_fetch = 40

        [selector]
        type_order = ["P", "K"]

        [data]
        index_dir = "idx"
        "#,
    ));
    let config = Config::from_figment(figment, tmp.path(), "dev");
    let settings = config.settings().expect("settings");

    assert_eq!(settings.retrieval.over_fetch, 40);
    assert_eq!(settings.retrieval.default_top_k, 10);
    assert_eq!(settings.selector.bucket_keys(), vec![TestType::Personality, TestType::Knowledge]);
    assert!(settings.index.build_on_demand);
    assert_eq!(config.index_dir(&settings), tmp.path().join("idx"));
}

#[test]
fn settings_reject_empty_type_order() {
    let tmp = TempDir::new().unwrap();
    let figment = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::string("[selector]\ntype_order = []\n"));
    let err = Config::from_figment(figment, tmp.path(), "dev").settings().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn production_refuses_hashed_embedder() {
    let tmp = TempDir::new().unwrap();
    let figment = Figment::from(Serialized::defaults(Settings::default()))
        .merge(Toml::string("[embedding]\nbackend = \"hashed\"\n"));
    let dev = Config::from_figment(figment.clone(), tmp.path(), "dev").settings().expect("dev ok");
    assert_eq!(dev.embedding.backend, EmbeddingBackend::Hashed);

    let err = Config::from_figment(figment, tmp.path(), "prod").settings().unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}
