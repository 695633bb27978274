/// PostgreSQL connection helpers.
///
/// The pipeline is sequential, so every registry read and every insert opens
/// its own connection and drops it when done. There is no pool; introducing
/// parallelism across locations would need one.

use postgres::{Client, NoTls};

use crate::config::DbConfig;

// ---------------------------------------------------------------------------
// Table names (kept compatible with the existing store)
// ---------------------------------------------------------------------------

pub const LOCATIONS_TABLE: &str = "cidades";
pub const OBSERVATIONS_TABLE: &str = "historico_clima";
pub const INSIGHTS_TABLE: &str = "insights_gemini";

pub const ALL_TABLES: &[&str] = &[LOCATIONS_TABLE, OBSERVATIONS_TABLE, INSIGHTS_TABLE];

/// Build driver settings from the resolved configuration.
pub fn pg_config(db: &DbConfig) -> postgres::Config {
    let mut config = postgres::Config::new();
    config
        .host(&db.host)
        .dbname(&db.name)
        .user(&db.user)
        .password(&db.password)
        .port(db.port)
        .application_name("floodrisk_service");
    config
}

/// Open a fresh connection.
pub fn connect(db: &DbConfig) -> Result<Client, postgres::Error> {
    pg_config(db).connect(NoTls)
}

/// Open a connection and check that the given tables exist.
///
/// Returns a human-readable error naming the missing tables and the DDL file
/// that creates them.
pub fn connect_and_verify(db: &DbConfig, tables: &[&str]) -> Result<Client, String> {
    let mut client = connect(db).map_err(|e| {
        format!(
            "Cannot connect to PostgreSQL at {}:{} (database '{}'): {}",
            db.host, db.port, db.name, e
        )
    })?;

    let mut missing = Vec::new();
    for table in tables {
        let row = client
            .query_one("SELECT to_regclass($1) IS NOT NULL", &[table])
            .map_err(|e| format!("Cannot inspect table '{}': {}", table, e))?;
        let exists: bool = row.get(0);
        if !exists {
            missing.push(*table);
        }
    }

    if !missing.is_empty() {
        return Err(format!(
            "Missing tables: {}. Apply sql/001_schema.sql first.",
            missing.join(", ")
        ));
    }

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for table in ALL_TABLES {
            assert!(seen.insert(*table), "duplicate table name '{}'", table);
        }
    }

    #[test]
    fn test_pg_config_carries_connection_settings() {
        let db = DbConfig {
            host: "db.internal".to_string(),
            name: "enchentes".to_string(),
            user: "monitor".to_string(),
            password: "secret".to_string(),
            port: 6543,
        };
        let config = pg_config(&db);
        assert_eq!(config.get_dbname(), Some("enchentes"));
        assert_eq!(config.get_user(), Some("monitor"));
        assert_eq!(config.get_ports(), &[6543]);
    }
}
