//! Seams core library: co-change mining, clustering, and transactional
//! complexity scoring.
//!
//! A run flows through four stages. [`history::normalize`] turns raw change
//! records into a canonical [`history::Timeline`], [`coupling::aggregate`]
//! counts co-changes per time window, [`cluster`] builds candidate
//! decompositions from blended [`similarity`] signals, and [`score`] rates
//! each decomposition against access traces. [`pipeline::AnalysisContext`]
//! strings the stages together for one codebase.

pub mod artifacts;
pub mod cluster;
pub mod config;
pub mod coupling;
pub mod error;
pub mod extract;
pub mod history;
pub mod pipeline;
pub mod progress;
pub mod score;
pub mod similarity;
pub mod store;
pub mod types;
