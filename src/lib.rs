//! Flood-risk monitoring service.
//!
//! For every registered location: fetch recent and forecast precipitation,
//! reduce it to a trailing 24h sum and a next-3h sum, ask a generative model
//! to classify flood risk, and append the observation and the assessment to
//! PostgreSQL.

pub mod analysis;
pub mod assess;
pub mod config;
pub mod db;
pub mod ingest;
pub mod locations;
pub mod logging;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod retry;
