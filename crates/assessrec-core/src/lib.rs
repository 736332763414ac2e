//! assessrec-core
//!
//! Domain types, the error taxonomy, configuration and catalog loading shared
//! by the embedding, vector and recommendation crates.

pub mod catalog;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
