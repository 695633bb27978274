/// Location registry for the flood-risk monitoring service.
///
/// The set of monitored municipalities lives in the `cidades` table and is
/// read once per run. This is the single source of truth for location ids;
/// the output tables reference it.

use postgres::Row;

use crate::config::DbConfig;
use crate::db;
use crate::logging::{self, Component};
use crate::model::{Location, PipelineError};

const SELECT_LOCATIONS: &str = "
    SELECT id_cidade::int4,
           nome_cidade,
           uf,
           latitude::float8,
           longitude::float8,
           altitude::float8,
           timezone,
           risco_hidro_base::float8
    FROM cidades
    ORDER BY id_cidade";

// ---------------------------------------------------------------------------
// Registry trait
// ---------------------------------------------------------------------------

/// Source of the locations monitored in a run.
pub trait LocationRegistry {
    /// Read all monitored locations, reporting storage failures.
    fn try_list_monitored_locations(&self) -> Result<Vec<Location>, PipelineError>;

    /// Read all monitored locations. Storage failures are logged and produce
    /// an empty list, so the run degrades to doing nothing.
    fn list_monitored_locations(&self) -> Vec<Location> {
        match self.try_list_monitored_locations() {
            Ok(locations) => locations,
            Err(err) => {
                logging::error(Component::Registry, None, &err.to_string());
                Vec::new()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL registry
// ---------------------------------------------------------------------------

/// Reads the `cidades` table, one connection per call.
pub struct PgLocationRegistry {
    db: DbConfig,
}

impl PgLocationRegistry {
    pub fn new(db: DbConfig) -> Self {
        Self { db }
    }
}

impl LocationRegistry for PgLocationRegistry {
    fn try_list_monitored_locations(&self) -> Result<Vec<Location>, PipelineError> {
        let unavailable = |e: postgres::Error| PipelineError::RegistryUnavailable(e.to_string());

        let mut client = db::connect(&self.db).map_err(unavailable)?;
        let rows = client.query(SELECT_LOCATIONS, &[]).map_err(unavailable)?;

        let mut locations = Vec::with_capacity(rows.len());
        for row in &rows {
            let location = location_from_row(row).map_err(unavailable)?;
            match validate_location(&location) {
                Ok(()) => locations.push(location),
                Err(reason) => logging::warn(
                    Component::Registry,
                    Some(&location.id.to_string()),
                    &format!("Skipping {}: {}", location.label(), reason),
                ),
            }
        }

        logging::debug(
            Component::Registry,
            None,
            &format!("Loaded {} monitored locations", locations.len()),
        );
        Ok(locations)
    }
}

fn location_from_row(row: &Row) -> Result<Location, postgres::Error> {
    Ok(Location {
        id: row.try_get(0)?,
        name: row.try_get(1)?,
        region: row.try_get(2)?,
        latitude: row.try_get(3)?,
        longitude: row.try_get(4)?,
        altitude: row.try_get(5)?,
        timezone: row.try_get(6)?,
        baseline_risk: row.try_get(7)?,
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks the attributes the weather provider needs.
///
/// A location with out-of-range coordinates or no timezone would only fail
/// later at the provider, with a less useful error.
pub fn validate_location(location: &Location) -> Result<(), String> {
    if !location.latitude.is_finite() || !(-90.0..=90.0).contains(&location.latitude) {
        return Err(format!("latitude {} out of range", location.latitude));
    }
    if !location.longitude.is_finite() || !(-180.0..=180.0).contains(&location.longitude) {
        return Err(format!("longitude {} out of range", location.longitude));
    }
    if location.timezone.trim().is_empty() {
        return Err("timezone is empty".to_string());
    }
    if location.name.trim().is_empty() {
        return Err("name is empty".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
