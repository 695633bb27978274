//! Per-location monitoring pipeline.
//!
//! Each location moves through
//!
//! ```text
//! Fetching -> Aggregating -> Persisting(observation) -> Assessing -> Persisting(insight) -> Done
//! ```
//!
//! and any stage may end in `Failed`. A failure is logged and the runner
//! moves on to the next location; nothing is retried here and nothing is
//! rolled back. The observation is written as soon as aggregation succeeds,
//! so it survives a later model failure. A failed observation insert does
//! not stop the assessment.

use crate::analysis::aggregate;
use crate::assess::RiskAssessor;
use crate::ingest::WeatherSource;
use crate::locations::LocationRegistry;
use crate::logging::{self, Component};
use crate::model::{Location, PipelineError, RiskAssessment};
use crate::persist::PersistenceGateway;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetching,
    Aggregating,
    Assessing,
    Persisting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    Running(Stage),
    Done,
    Failed { stage: Stage, error: PipelineError },
}

impl LocationState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, LocationState::Running(_))
    }
}

/// What happened to one location in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationOutcome {
    pub location_id: i32,
    pub location_label: String,
    pub state: LocationState,
    /// Stages entered, in order.
    pub trace: Vec<Stage>,
    pub observation_saved: bool,
    pub insight_saved: bool,
    pub assessment: Option<RiskAssessment>,
    /// Failures that did not end processing (a failed observation insert).
    pub warnings: Vec<PipelineError>,
}

impl LocationOutcome {
    fn new(location: &Location) -> Self {
        Self {
            location_id: location.id,
            location_label: location.label(),
            state: LocationState::Running(Stage::Fetching),
            trace: Vec::new(),
            observation_saved: false,
            insight_saved: false,
            assessment: None,
            warnings: Vec::new(),
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.state = LocationState::Running(stage);
        self.trace.push(stage);
    }

    fn fail(mut self, error: PipelineError) -> Self {
        let stage = match self.state {
            LocationState::Running(stage) => stage,
            _ => Stage::Fetching,
        };
        logging::log_location_failure(&self.location_label, stage_name(stage), &error);
        self.state = LocationState::Failed { stage, error };
        self
    }

    pub fn is_done(&self) -> bool {
        self.state == LocationState::Done
    }
}

fn stage_name(stage: Stage) -> &'static str {
    match stage {
        Stage::Fetching => "Weather fetch",
        Stage::Aggregating => "Aggregation",
        Stage::Assessing => "Risk assessment",
        Stage::Persisting => "Persistence",
    }
}

/// Results of one run across all locations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub outcomes: Vec<LocationOutcome>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn completed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_done()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.completed()
    }

    pub fn observations_saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.observation_saved).count()
    }

    pub fn insights_saved(&self) -> usize {
        self.outcomes.iter().filter(|o| o.insight_saved).count()
    }

    pub fn outcome_for(&self, location_id: i32) -> Option<&LocationOutcome> {
        self.outcomes.iter().find(|o| o.location_id == location_id)
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Wires the injected boundaries together. Holds no state between locations.
pub struct PipelineRunner<'a> {
    source: &'a dyn WeatherSource,
    assessor: &'a RiskAssessor,
    gateway: &'a dyn PersistenceGateway,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(
        source: &'a dyn WeatherSource,
        assessor: &'a RiskAssessor,
        gateway: &'a dyn PersistenceGateway,
    ) -> Self {
        Self {
            source,
            assessor,
            gateway,
        }
    }

    /// Read the registry (degrading to an empty list on failure) and run.
    pub fn run_from_registry(&self, registry: &dyn LocationRegistry) -> RunSummary {
        let locations = registry.list_monitored_locations();
        if locations.is_empty() {
            logging::warn(Component::Registry, None, "No locations to monitor");
        }
        self.run(&locations)
    }

    /// Process every location in order.
    pub fn run(&self, locations: &[Location]) -> RunSummary {
        let outcomes: Vec<LocationOutcome> = locations
            .iter()
            .map(|location| self.process_location(location))
            .collect();

        let summary = RunSummary { outcomes };
        if summary.total() > 0 {
            logging::log_run_summary(summary.total(), summary.completed(), summary.failed());
        }
        summary
    }

    /// Run one location to a terminal state. Never panics on a boundary
    /// failure; every error ends up in the outcome.
    pub fn process_location(&self, location: &Location) -> LocationOutcome {
        let mut outcome = LocationOutcome::new(location);
        let label = location.label();
        let id = location.id.to_string();

        logging::info(
            Component::System,
            Some(&id),
            &format!("--- MONITORING: {} ---", location.name.to_uppercase()),
        );

        outcome.enter(Stage::Fetching);
        let series = match self.source.fetch_series(location) {
            Ok(series) => series,
            Err(err) => return outcome.fail(err),
        };

        outcome.enter(Stage::Aggregating);
        let (totals, representative) = match aggregate(&series) {
            Ok(result) => result,
            Err(err) => return outcome.fail(err),
        };
        logging::info(
            Component::Weather,
            Some(&id),
            &format!(
                "Accumulated 24h: {:.2} mm | Forecast 3h: {:.2} mm",
                totals.accumulated_24h, totals.forecast_3h
            ),
        );
        if let Some(hour) = series.time_at(crate::model::REPRESENTATIVE_OFFSET) {
            logging::debug(Component::Weather, Some(&id), &format!("Representative hour: {}", hour));
        }

        outcome.enter(Stage::Persisting);
        match self.gateway.save_observation(location.id, &representative) {
            Ok(()) => outcome.observation_saved = true,
            Err(err) => {
                logging::log_location_failure(&label, "Observation insert", &err);
                outcome.warnings.push(err);
            }
        }

        outcome.enter(Stage::Assessing);
        let assessment = match self.assessor.assess(location, &totals) {
            Ok(assessment) => assessment,
            Err(err) => return outcome.fail(err),
        };
        logging::info(Component::Model, Some(&id), &format!("Risk: {}", assessment.risk_level));
        logging::info(Component::Model, Some(&id), &format!("Alert: {}", assessment.alert_message));
        logging::info(Component::Model, Some(&id), &format!("Action: {}", assessment.recommendation));

        outcome.enter(Stage::Persisting);
        let saved = self.gateway.save_insight(location.id, &assessment);
        outcome.assessment = Some(assessment);
        if let Err(err) = saved {
            return outcome.fail(err);
        }
        outcome.insight_saved = true;
        logging::info(Component::Database, Some(&id), "Assessment persisted");

        outcome.state = LocationState::Done;
        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assess::{ModelError, TextModel};
    use crate::model::{HourlyPoint, HourlySeries, RiskLevel};
    use crate::retry::RetryPolicy;
    use std::cell::RefCell;

    struct FixedSource {
        hours: usize,
    }

    impl WeatherSource for FixedSource {
        fn fetch_series(&self, _location: &Location) -> Result<HourlySeries, PipelineError> {
            Ok(HourlySeries {
                times: Vec::new(),
                points: vec![HourlyPoint::new(1.0, 40.0, 61); self.hours],
            })
        }
    }

    struct FixedModel(&'static str);

    impl TextModel for FixedModel {
        fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            Ok(self.0.to_string())
        }
    }

    #[derive(Default)]
    struct RecordingGateway {
        observations: RefCell<Vec<i32>>,
        insights: RefCell<Vec<i32>>,
        fail_observations: bool,
    }

    impl PersistenceGateway for RecordingGateway {
        fn save_observation(&self, location_id: i32, _hour: &HourlyPoint) -> Result<(), PipelineError> {
            if self.fail_observations {
                return Err(PipelineError::PersistenceFailure {
                    table: "historico_clima".to_string(),
                    reason: "disk full".to_string(),
                });
            }
            self.observations.borrow_mut().push(location_id);
            Ok(())
        }

        fn save_insight(&self, location_id: i32, _assessment: &RiskAssessment) -> Result<(), PipelineError> {
            self.insights.borrow_mut().push(location_id);
            Ok(())
        }
    }

    fn location(id: i32) -> Location {
        Location {
            id,
            name: format!("Cidade {}", id),
            region: "MG".to_string(),
            latitude: -19.9,
            longitude: -43.9,
            altitude: 850.0,
            timezone: "America/Sao_Paulo".to_string(),
            baseline_risk: 0.3,
        }
    }

    fn assessor(reply: &'static str) -> RiskAssessor {
        RiskAssessor::new(Box::new(FixedModel(reply)), RetryPolicy::none())
    }

    const GOOD: &str = r#"{"nivel_risco":"Moderado","mensagem_alerta":"Chuva","recomendacao":"Atenção"}"#;

    #[test]
    fn test_successful_location_walks_every_stage() {
        let source = FixedSource { hours: 48 };
        let assessor = assessor(GOOD);
        let gateway = RecordingGateway::default();
        let runner = PipelineRunner::new(&source, &assessor, &gateway);

        let outcome = runner.process_location(&location(1));

        assert_eq!(outcome.state, LocationState::Done);
        assert_eq!(
            outcome.trace,
            vec![
                Stage::Fetching,
                Stage::Aggregating,
                Stage::Persisting,
                Stage::Assessing,
                Stage::Persisting
            ]
        );
        assert!(outcome.observation_saved && outcome.insight_saved);
        assert_eq!(
            outcome.assessment.map(|a| a.risk_level),
            Some(RiskLevel::Moderate)
        );
    }

    #[test]
    fn test_short_series_fails_before_any_persistence() {
        let source = FixedSource { hours: 20 };
        let assessor = assessor(GOOD);
        let gateway = RecordingGateway::default();
        let runner = PipelineRunner::new(&source, &assessor, &gateway);

        let outcome = runner.process_location(&location(1));

        assert!(matches!(
            outcome.state,
            LocationState::Failed {
                stage: Stage::Aggregating,
                error: PipelineError::InsufficientData { actual: 20, .. }
            }
        ));
        assert!(gateway.observations.borrow().is_empty());
        assert!(gateway.insights.borrow().is_empty());
    }

    #[test]
    fn test_observation_failure_does_not_block_insight() {
        let source = FixedSource { hours: 48 };
        let assessor = assessor(GOOD);
        let gateway = RecordingGateway {
            fail_observations: true,
            ..RecordingGateway::default()
        };
        let runner = PipelineRunner::new(&source, &assessor, &gateway);

        let outcome = runner.process_location(&location(3));

        assert_eq!(outcome.state, LocationState::Done);
        assert!(!outcome.observation_saved);
        assert!(outcome.insight_saved);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_failed_state_is_terminal() {
        let failed = LocationState::Failed {
            stage: Stage::Assessing,
            error: PipelineError::ModelUnavailable("down".to_string()),
        };
        assert!(failed.is_terminal());
        assert!(LocationState::Done.is_terminal());
        assert!(!LocationState::Running(Stage::Fetching).is_terminal());
    }

    #[test]
    fn test_empty_location_list_is_a_no_op() {
        let source = FixedSource { hours: 48 };
        let assessor = assessor(GOOD);
        let gateway = RecordingGateway::default();
        let runner = PipelineRunner::new(&source, &assessor, &gateway);

        let summary = runner.run(&[]);
        assert_eq!(summary.total(), 0);
        assert!(gateway.observations.borrow().is_empty());
    }
}
