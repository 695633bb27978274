/// Run logging for the flood-risk monitoring service.
///
/// Every line carries a component tag (`WX`, `AI`, `DB`, ...) and, when it
/// concerns one location, that location's id or label. The console gets a
/// compact operator view; the optional log file gets every line with a UTC
/// timestamp, which is what scheduled runs should be configured with.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use crate::model::PipelineError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Parses a level name from configuration ("debug", "info", "warn", "error").
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Registry,
    Weather,
    Model,
    Database,
    System,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Registry => write!(f, "REG"),
            Component::Weather => write!(f, "WX"),
            Component::Model => write!(f, "AI"),
            Component::Database => write!(f, "DB"),
            Component::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Part of normal operation: a short provider series, a rambling model.
    Expected,
    /// Points at a broken deployment: bad credentials, schema, or request.
    Unexpected,
    /// Could be either, e.g. an upstream outage that outlasted the retries.
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Process-wide sink. Nothing is written until `init_logger` runs, which
/// keeps unit tests quiet.
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

struct Logger {
    min_level: LogLevel,
    log_file: Option<String>,
    /// Full timestamped lines on the console instead of the compact view.
    console_timestamps: bool,
}

impl Logger {

    fn log(&self, level: LogLevel, component: Component, location: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");

        let location_part = location.map(|s| format!(" [{}]", s)).unwrap_or_default();
        let log_entry = format!(
            "{} {} {}{}: {}",
            timestamp, level, component, location_part, message
        );

        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", log_entry),
                LogLevel::Warning => eprintln!("   {}", log_entry),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", component, location_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", component, location_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {} // file only
            }
        }

        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("   ⚠ cannot append to {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

fn dispatch(level: LogLevel, component: Component, location: Option<&str>, message: &str) {
    let guard = LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(logger) = guard.as_ref() {
        logger.log(level, component, location, message);
    }
}

// ---------------------------------------------------------------------------
// Entry Points
// ---------------------------------------------------------------------------

/// Install the process-wide logger. Calling it again replaces the settings.
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    let logger = Logger {
        min_level,
        log_file: log_file.map(String::from),
        console_timestamps,
    };
    let mut slot = LOGGER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    *slot = Some(logger);
}

pub fn info(component: Component, location: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, component, location, message);
}

pub fn warn(component: Component, location: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, component, location, message);
}

pub fn error(component: Component, location: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, component, location, message);
}

/// Console output only when timestamps are on; always goes to the file.
pub fn debug(component: Component, location: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, component, location, message);
}

// ---------------------------------------------------------------------------
// Pipeline Failures
// ---------------------------------------------------------------------------

/// Classify a per-location pipeline failure.
///
/// Short series and unparseable model replies happen in normal operation and
/// are not a sign of a broken deployment. Storage and registry failures are.
pub fn classify_failure(err: &PipelineError) -> FailureType {
    match err {
        PipelineError::InsufficientData { .. } => FailureType::Expected,
        PipelineError::MalformedAssessment { .. } => FailureType::Expected,
        // A 4xx other than throttling means the request itself is wrong.
        PipelineError::SourceUnavailable { status, .. } => match status {
            Some(code) if (400..500).contains(code) && !matches!(code, 408 | 429) => {
                FailureType::Unexpected
            }
            _ => FailureType::Unknown,
        },
        PipelineError::ModelUnavailable(_) => FailureType::Unknown,
        PipelineError::PersistenceFailure { .. }
        | PipelineError::RegistryUnavailable(_)
        | PipelineError::Config(_) => FailureType::Unexpected,
    }
}

/// Map a pipeline failure to the component it originated from
pub fn component_for(err: &PipelineError) -> Component {
    match err {
        PipelineError::RegistryUnavailable(_) => Component::Registry,
        PipelineError::SourceUnavailable { .. } | PipelineError::InsufficientData { .. } => {
            Component::Weather
        }
        PipelineError::MalformedAssessment { .. } | PipelineError::ModelUnavailable(_) => {
            Component::Model
        }
        PipelineError::PersistenceFailure { .. } => Component::Database,
        PipelineError::Config(_) => Component::System,
    }
}

/// Log a per-location failure with automatic classification.
///
/// Malformed model output is logged together with the raw reply so operators
/// can see what the model actually said.
pub fn log_location_failure(location: &str, stage: &str, err: &PipelineError) {
    let failure_type = classify_failure(err);
    let component = component_for(err);

    let message = format!("{} failed [{}]: {}", stage, failure_type, err);
    let level = match failure_type {
        FailureType::Unexpected => LogLevel::Error,
        FailureType::Expected | FailureType::Unknown => LogLevel::Warning,
    };
    dispatch(level, component, Some(location), &message);

    if let PipelineError::MalformedAssessment { raw, .. } = err {
        warn(component, Some(location), &format!("Raw model reply: {}", raw));
    }
}

/// One line per run; escalates to error when nothing completed.
pub fn log_run_summary(total: usize, completed: usize, failed: usize) {
    let message = format!(
        "Run complete: {}/{} locations completed, {} failed",
        completed, total, failed
    );

    if failed == 0 {
        info(Component::System, None, &message);
    } else if completed == 0 {
        error(Component::System, None, &message);
    } else {
        warn(Component::System, None, &message);
    }
}
