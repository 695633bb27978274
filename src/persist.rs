/// Append-only persistence of observations and insights.
///
/// Each save is a single INSERT whose timestamp is assigned by the server
/// (`CURRENT_TIMESTAMP`). The two writes for a location are independent: a
/// failed insight insert does not remove the observation row, and neither
/// blocks other locations. Re-running within the same hour appends
/// duplicates; these tables are history, not current state.
///
/// Parameters are cast explicitly (`$2::float8`) so the inserts work whether
/// the columns are `DOUBLE PRECISION` or `NUMERIC`.

use std::time::Duration;

use crate::config::DbConfig;
use crate::db::{self, INSIGHTS_TABLE, OBSERVATIONS_TABLE};
use crate::model::{HourlyPoint, PipelineError, RiskAssessment};
use crate::retry::{CircuitBreaker, RetryPolicy};

const INSERT_OBSERVATION: &str = "
    INSERT INTO historico_clima
        (id_cidade, data_hora, precipitacao, probabilidade_chuva, codigo_wmo)
    VALUES ($1::int4, CURRENT_TIMESTAMP, $2::float8, $3::float8, $4::int4)";

const INSERT_INSIGHT: &str = "
    INSERT INTO insights_gemini
        (id_cidade, data_geracao, nivel_risco, mensagem_alerta, recomendacao)
    VALUES ($1::int4, CURRENT_TIMESTAMP, $2::text, $3::text, $4::text)";

// ---------------------------------------------------------------------------
// Gateway trait
// ---------------------------------------------------------------------------

pub trait PersistenceGateway {
    fn save_observation(&self, location_id: i32, hour: &HourlyPoint) -> Result<(), PipelineError>;

    fn save_insight(&self, location_id: i32, assessment: &RiskAssessment) -> Result<(), PipelineError>;
}

// ---------------------------------------------------------------------------
// PostgreSQL gateway
// ---------------------------------------------------------------------------

/// Inserts over a fresh connection per call, under a bounded retry policy and
/// a circuit breaker shared by both tables.
pub struct PgPersistence {
    db: DbConfig,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl PgPersistence {
    pub fn new(db: DbConfig) -> Self {
        Self {
            db,
            retry: RetryPolicy::storage_default(),
            breaker: CircuitBreaker::new("storage", 3, Duration::from_secs(30)),
        }
    }

    fn insert(
        &self,
        table: &str,
        sql: &str,
        params: &[&(dyn postgres::types::ToSql + Sync)],
    ) -> Result<(), PipelineError> {
        self.breaker
            .call(&self.retry, is_transient_pg, |_| -> Result<(), postgres::Error> {
                let mut client = db::connect(&self.db)?;
                client.execute(sql, params)?;
                Ok(())
            })
            .map_err(|e| PipelineError::PersistenceFailure {
                table: table.to_string(),
                reason: e.to_string(),
            })
    }
}

impl PersistenceGateway for PgPersistence {
    fn save_observation(&self, location_id: i32, hour: &HourlyPoint) -> Result<(), PipelineError> {
        self.insert(
            OBSERVATIONS_TABLE,
            INSERT_OBSERVATION,
            &[
                &location_id,
                &hour.precipitation,
                &hour.probability,
                &hour.weather_code,
            ],
        )
    }

    fn save_insight(&self, location_id: i32, assessment: &RiskAssessment) -> Result<(), PipelineError> {
        self.insert(
            INSIGHTS_TABLE,
            INSERT_INSIGHT,
            &[
                &location_id,
                &assessment.risk_level.as_str(),
                &assessment.alert_message,
                &assessment.recommendation,
            ],
        )
    }
}

/// Connection-level failures and a few retryable server states.
/// Constraint violations, type errors and the like are not retried, and
/// neither are client-side failures such as parameter serialization or
/// column conversion.
pub fn is_transient_pg(err: &postgres::Error) -> bool {
    let io_failure = std::error::Error::source(err).is_some_and(|source| source.is::<std::io::Error>());
    is_transient_failure(err.code().map(|state| state.code()), err.is_closed(), io_failure)
}

/// Decision behind `is_transient_pg`. Server errors are judged by SQLSTATE;
/// errors without one are retried only when the connection itself failed.
pub fn is_transient_failure(sqlstate: Option<&str>, connection_closed: bool, io_failure: bool) -> bool {
    match sqlstate {
        Some(code) => is_transient_sqlstate(code),
        None => connection_closed || io_failure,
    }
}

/// SQLSTATE classes worth another attempt: connection exceptions (08xxx),
/// serialization / deadlock (40001, 40P01), shutdown (57P01-57P03) and
/// too many connections (53300).
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "40001" | "40P01" | "57P01" | "57P02" | "57P03" | "53300")
}
