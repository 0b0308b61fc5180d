//! Provider fraud-risk core: shared-patient provider graphs, fraud-ring
//! detection and explainable composite risk scores over a claims store.

pub mod address;
pub mod anomaly;
pub mod cache;
pub mod centrality;
pub mod community;
pub mod config;
pub mod error;
pub mod graph;
pub mod graph_builder;
pub mod insights;
pub mod model;
pub mod rng;
pub mod scoring;
pub mod signals;
pub mod store;
pub mod types;
