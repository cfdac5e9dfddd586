//! Canonical domains and dense per-keyword ranking.

pub mod domain;
pub mod rank;

pub use domain::registrable_domain;
pub use rank::{normalize, truncate};
