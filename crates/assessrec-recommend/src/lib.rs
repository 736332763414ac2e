//! Recommendation pipeline: retrieve, de-duplicate, rebalance across test
//! types, format.

pub mod balance;
pub mod pipeline;

pub use balance::RebalancingSelector;
pub use pipeline::{validate_query, Recommender, DEFAULT_OVER_FETCH};
