//! Single-shot monitoring run.
//!
//! Usage:
//!   cargo run --bin floodrisk_service
//!
//! Environment (or `.env`):
//!   GEMINI_API_KEY, DB_HOST, DB_NAME, DB_USER, DB_PASS, DB_PORT
//!
//! Optional `floodrisk.toml` (or `FLOODRISK_CONFIG`) tunes caching, retries
//! and logging. Exits non-zero only when the run cannot start: invalid
//! configuration or an unreachable location registry. Per-location failures
//! are logged and do not affect the exit status.

use floodrisk_service::assess::{GeminiClient, RiskAssessor};
use floodrisk_service::config;
use floodrisk_service::ingest::OpenMeteoSource;
use floodrisk_service::ingest::http_cache::{CachedHttpClient, ResponseCache};
use floodrisk_service::locations::{LocationRegistry, PgLocationRegistry};
use floodrisk_service::logging::{self, Component};
use floodrisk_service::persist::PgPersistence;
use floodrisk_service::pipeline::PipelineRunner;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🌧  Flood-risk monitoring run starting");

    let config = config::load()?;
    logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    );

    // Boundaries are built once and shared by every location in the run.
    let cache = ResponseCache::new(&config.weather.cache_dir, config.weather.cache_ttl);
    let http = CachedHttpClient::new(config.weather.timeout, cache, config.weather.retry)?;
    let source = OpenMeteoSource::new(http, &config.weather.base_url);

    let model = GeminiClient::new(&config.model.api_key, &config.model.name, config.model.timeout)?;
    let assessor = RiskAssessor::new(Box::new(model), config.model.retry);

    let gateway = PgPersistence::new(config.db.clone());
    let registry = PgLocationRegistry::new(config.db.clone());

    let locations = registry.try_list_monitored_locations().map_err(|e| {
        logging::error(Component::Registry, None, &e.to_string());
        e
    })?;
    logging::info(
        Component::Registry,
        None,
        &format!("{} locations to monitor", locations.len()),
    );

    let runner = PipelineRunner::new(&source, &assessor, &gateway);
    let summary = runner.run(&locations);

    println!(
        "🏁 Run finished: {} completed, {} failed, {} observations and {} insights saved",
        summary.completed(),
        summary.failed(),
        summary.observations_saved(),
        summary.insights_saved()
    );
    Ok(())
}
