//! Domain types shared by the store, the selector and the front ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub const DEFAULT_TOP_K: i64 = 10;

/// Assessment kind as published in the catalog's "Test Type" column.
///
/// The letters follow the catalog legend; anything else is kept verbatim in
/// `Other` so it can still be shown, and is bucketed by the selector's
/// fallback rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum TestType {
    Ability,
    Biodata,
    Competencies,
    Development,
    Exercises,
    Knowledge,
    Personality,
    Simulations,
    Other(String),
}

impl TestType {
    /// Parse a raw column value. Blank input means "missing" and yields `None`.
    ///
    /// Multi-code values ("K P", "C,P") resolve to their first recognised code.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() { return None; }
        if let Some(t) = Self::from_code(raw) { return Some(t); }
        raw.split(|c: char| c.is_whitespace() || c == ',' || c == '/' || c == ';')
            .filter(|tok| !tok.is_empty())
            .find_map(Self::from_code)
            .or_else(|| Some(Self::Other(raw.to_string())))
    }

    fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "A" => Some(Self::Ability),
            "B" => Some(Self::Biodata),
            "C" => Some(Self::Competencies),
            "D" => Some(Self::Development),
            "E" => Some(Self::Exercises),
            "K" => Some(Self::Knowledge),
            "P" => Some(Self::Personality),
            "S" => Some(Self::Simulations),
            _ => None,
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Ability => "A",
            Self::Biodata => "B",
            Self::Competencies => "C",
            Self::Development => "D",
            Self::Exercises => "E",
            Self::Knowledge => "K",
            Self::Personality => "P",
            Self::Simulations => "S",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.code()) }
}

impl From<TestType> for String {
    fn from(t: TestType) -> Self { t.code().to_string() }
}

/// One assessment product. Immutable once loaded; a rebuild replaces the whole corpus.
///
/// - `name`/`url`: display fields, `url` doubles as the item identity
/// - `test_type`: `None` when the catalog row left it blank
/// - `source_text`: the text that gets vectorized
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogItem {
    pub name: String,
    pub url: String,
    pub test_type: Option<TestType>,
    pub source_text: String,
}

impl CatalogItem {
    /// Identity used for de-duplication: the url, or the name when the url is blank.
    pub fn identity(&self) -> &str {
        if self.url.trim().is_empty() { &self.name } else { &self.url }
    }
}

/// A retrieved item with its cosine similarity to the query. Higher is better.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub item: Arc<CatalogItem>,
    pub score: f32,
}

/// `top_k` left out means "use the service's configured default".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,
}

/// Formatted recommendation handed to callers verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    pub url: String,
    pub test_type: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommendations: Vec<Recommendation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_letter_codes_case_insensitively() {
        assert_eq!(TestType::parse("K"), Some(TestType::Knowledge));
        assert_eq!(TestType::parse(" p "), Some(TestType::Personality));
        assert_eq!(TestType::parse("a"), Some(TestType::Ability));
    }

    #[test]
    fn blank_type_is_missing() {
        assert_eq!(TestType::parse(""), None);
        assert_eq!(TestType::parse("   "), None);
    }

    #[test]
    fn multi_code_takes_first_recognised() {
        assert_eq!(TestType::parse("K P"), Some(TestType::Knowledge));
        assert_eq!(TestType::parse("X, P"), Some(TestType::Personality));
    }

    #[test]
    fn unknown_type_is_kept_verbatim() {
        let t = TestType::parse("Knowledge & Skills").expect("some");
        assert_eq!(t, TestType::Other("Knowledge & Skills".to_string()));
        assert_eq!(t.code(), "Knowledge & Skills");
    }

    #[test]
    fn identity_falls_back_to_name() {
        let item = CatalogItem { name: "Java 8".into(), url: " ".into(), test_type: None, source_text: "x".into() };
        assert_eq!(item.identity(), "Java 8");
    }

    #[test]
    fn request_top_k_is_optional() {
        let req: RecommendRequest = serde_json::from_str(r#"{"query":"java developer"}"#).expect("json");
        assert_eq!(req.top_k, None);
        let req: RecommendRequest = serde_json::from_str(r#"{"query":"java","top_k":4}"#).expect("json");
        assert_eq!(req.top_k, Some(4));
    }
}
