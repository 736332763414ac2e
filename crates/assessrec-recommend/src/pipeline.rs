use std::collections::HashSet;

use tracing::{debug, info};

use assessrec_core::config::Settings;
use assessrec_core::error::{Error, Result};
use assessrec_core::traits::Retriever;
use assessrec_core::types::{Candidate, RecommendRequest, RecommendResponse, Recommendation, DEFAULT_TOP_K};

use crate::balance::RebalancingSelector;

pub const DEFAULT_OVER_FETCH: usize = 30;

/// Query in, balanced recommendations out. Holds no mutable state; one
/// instance serves any number of requests.
pub struct Recommender<R: Retriever> {
    retriever: R,
    selector: RebalancingSelector,
    over_fetch: usize,
    default_top_k: i64,
}

/// Reject a blank query or a non-positive `top_k`. Needs no index, so callers
/// can run it before opening one.
pub fn validate_query(query: &str, top_k: i64) -> Result<usize> {
    if query.trim().is_empty() {
        return Err(Error::invalid_query("query must not be empty"));
    }
    if top_k <= 0 {
        return Err(Error::invalid_query(format!("top_k must be positive, got {}", top_k)));
    }
    usize::try_from(top_k).map_err(|_| Error::invalid_query("top_k out of range"))
}

impl<R: Retriever> Recommender<R> {
    pub fn new(retriever: R, selector: RebalancingSelector, over_fetch: usize) -> Self {
        Self { retriever, selector, over_fetch, default_top_k: DEFAULT_TOP_K }
    }

    pub fn from_settings(retriever: R, settings: &Settings) -> Self {
        Self::new(retriever, RebalancingSelector::new(settings.selector.bucket_keys()), settings.retrieval.over_fetch)
            .with_default_top_k(settings.retrieval.default_top_k)
    }

    /// `top_k` used when a request leaves it out.
    pub fn with_default_top_k(mut self, top_k: i64) -> Self {
        self.default_top_k = top_k;
        self
    }

    pub fn default_top_k(&self) -> i64 { self.default_top_k }

    pub fn retriever(&self) -> &R { &self.retriever }

    /// Validate, over-fetch, de-duplicate, rebalance and format.
    pub fn recommend(&self, query: &str, top_k: i64) -> Result<Vec<Recommendation>> {
        let top_k = validate_query(query, top_k)?;
        let fetch = self.over_fetch.max(top_k);

        let candidates = dedupe(self.retriever.retrieve(query, fetch)?);
        let picked = self.selector.select(&candidates, top_k);
        debug!(fetched = candidates.len(), picked = picked.len(), fetch, top_k, "rebalanced");
        info!(query, results = picked.len(), "recommendations ready");
        Ok(picked.iter().map(|c| format_candidate(c, query)).collect())
    }

    pub fn handle(&self, request: &RecommendRequest) -> Result<RecommendResponse> {
        let recommendations = self.recommend(&request.query, request.top_k.unwrap_or(self.default_top_k))?;
        Ok(RecommendResponse { recommendations })
    }
}

/// Keep the first (best-scored) occurrence of each item identity.
fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates.into_iter().filter(|c| seen.insert(c.item.identity().to_string())).collect()
}

fn format_candidate(c: &Candidate, query: &str) -> Recommendation {
    Recommendation {
        name: c.item.name.clone(),
        url: c.item.url.clone(),
        test_type: c.item.test_type.as_ref().map(|t| t.code().to_string()).unwrap_or_default(),
        score: round4(c.score as f64),
        reason: format!("Recommended due to strong relevance to '{}'", query),
    }
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}
