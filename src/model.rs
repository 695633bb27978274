//! Core data types for the flood-risk monitoring service.
//!
//! This module defines the shared domain model imported by all other modules.
//! It contains no I/O: only types, label conversions, and the error taxonomy
//! used at every per-location boundary.

use std::fmt;

// ---------------------------------------------------------------------------
// Window constants
// ---------------------------------------------------------------------------

/// Number of past hours summed into the trailing accumulation.
pub const PAST_WINDOW_HOURS: usize = 24;

/// Number of forecast hours summed into the near-term forecast.
pub const FORECAST_WINDOW_HOURS: usize = 3;

/// Offset of the hour stored as the "current" observation.
pub const REPRESENTATIVE_OFFSET: usize = PAST_WINDOW_HOURS;

/// Minimum series length the aggregator can work with (offsets 0..=26).
pub const MIN_SERIES_HOURS: usize = PAST_WINDOW_HOURS + FORECAST_WINDOW_HOURS;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A monitored municipality, as stored in the registry table.
///
/// Immutable for the duration of a run; the registry is read once and the
/// snapshot handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub id: i32,
    pub name: String,
    /// Two-letter state / region code, e.g. "SP".
    pub region: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level, in metres.
    pub altitude: f64,
    /// IANA timezone name passed to the weather provider.
    pub timezone: String,
    /// Static hydrological risk score supplied by the operators.
    pub baseline_risk: f64,
}

impl Location {
    /// "Name-RG" label used in prompts and log lines.
    pub fn label(&self) -> String {
        format!("{}-{}", self.name, self.region)
    }
}

// ---------------------------------------------------------------------------
// Hourly series
// ---------------------------------------------------------------------------

/// One hour of provider data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlyPoint {
    /// Precipitation in millimetres, never negative.
    pub precipitation: f64,
    /// Precipitation probability in percent, within [0, 100].
    pub probability: f64,
    /// WMO weather interpretation code.
    pub weather_code: i32,
}

impl HourlyPoint {
    /// Builds a point, clamping values into their documented ranges.
    pub fn new(precipitation: f64, probability: f64, weather_code: i32) -> Self {
        let precipitation = if precipitation.is_finite() {
            precipitation.max(0.0)
        } else {
            0.0
        };
        let probability = if probability.is_finite() {
            probability.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            precipitation,
            probability,
            weather_code,
        }
    }
}

/// Hourly data for one location, indexed by hour offset from series start.
///
/// With `past_days=1` and `forecast_days=1`, offsets 0–23 are yesterday and
/// offset 24 onwards is today in the location's timezone.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HourlySeries {
    /// Local hour labels as returned by the provider (e.g. "2024-05-01T13:00").
    pub times: Vec<String>,
    pub points: Vec<HourlyPoint>,
}

impl HourlySeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Hour label at `offset`, if the provider sent one.
    pub fn time_at(&self, offset: usize) -> Option<&str> {
        self.times.get(offset).map(String::as_str)
    }
}

/// The two precipitation sums the assessment is based on, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub accumulated_24h: f64,
    pub forecast_3h: f64,
}

// ---------------------------------------------------------------------------
// Risk assessment
// ---------------------------------------------------------------------------

/// Flood risk categories, in ascending order of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 4] = [
        RiskLevel::Low,
        RiskLevel::Moderate,
        RiskLevel::High,
        RiskLevel::Critical,
    ];

    /// Label written to the insights table. The existing store and its
    /// consumers use the Portuguese labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Baixo",
            RiskLevel::Moderate => "Moderado",
            RiskLevel::High => "Alto",
            RiskLevel::Critical => "Crítico",
        }
    }

    /// Parses a model-supplied label. Accepts the Portuguese labels (with or
    /// without the accent on "Crítico") and the English names, ignoring case
    /// and surrounding whitespace. Anything else is `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "baixo" | "low" => Some(RiskLevel::Low),
            "moderado" | "moderate" => Some(RiskLevel::Moderate),
            "alto" | "high" => Some(RiskLevel::High),
            "crítico" | "critico" | "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated model answer for one location.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub alert_message: String,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can arise while running the pipeline.
///
/// Everything except `Config` (and `RegistryUnavailable` when raised by the
/// entry point) is scoped to a single location and caught by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The location list could not be read.
    RegistryUnavailable(String),
    /// The weather fetch failed after exhausting retries, or the body could
    /// not be decoded.
    /// `status` is the last HTTP status seen, when the provider answered.
    SourceUnavailable {
        location: String,
        status: Option<u16>,
        reason: String,
    },
    /// The hourly series was shorter than the aggregation window.
    InsufficientData { required: usize, actual: usize },
    /// The model reply could not be turned into a valid assessment.
    MalformedAssessment { reason: String, raw: String },
    /// The model could not be reached (after retries, or breaker open).
    ModelUnavailable(String),
    /// A storage write failed.
    PersistenceFailure { table: String, reason: String },
    /// Missing or invalid configuration.
    Config(String),
}

impl PipelineError {
    /// Short machine-friendly name of the variant, used in log lines and
    /// run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::RegistryUnavailable(_) => "RegistryUnavailable",
            PipelineError::SourceUnavailable { .. } => "SourceUnavailable",
            PipelineError::InsufficientData { .. } => "InsufficientData",
            PipelineError::MalformedAssessment { .. } => "MalformedAssessment",
            PipelineError::ModelUnavailable(_) => "ModelUnavailable",
            PipelineError::PersistenceFailure { .. } => "PersistenceFailure",
            PipelineError::Config(_) => "Config",
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::RegistryUnavailable(msg) => {
                write!(f, "Registry unavailable: {}", msg)
            }
            PipelineError::SourceUnavailable { location, reason, .. } => {
                write!(f, "Weather source unavailable for {}: {}", location, reason)
            }
            PipelineError::InsufficientData { required, actual } => write!(
                f,
                "Insufficient data: series has {} hours, {} required",
                actual, required
            ),
            PipelineError::MalformedAssessment { reason, .. } => {
                write!(f, "Malformed assessment: {}", reason)
            }
            PipelineError::ModelUnavailable(msg) => write!(f, "Model unavailable: {}", msg),
            PipelineError::PersistenceFailure { table, reason } => {
                write!(f, "Persistence failure on {}: {}", table, reason)
            }
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
