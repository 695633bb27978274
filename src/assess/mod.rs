//! Flood-risk assessment via a generative-text model.
//!
//! `RiskAssessor` formats the prompt, calls the injected `TextModel` under a
//! retry policy and circuit breaker, and validates the reply. Transport
//! failures are retried; a reply that arrives but does not satisfy the
//! contract is not. Only transport and API-status failures count against the
//! breaker: an answer without usable text is a malformed assessment for that
//! location, not an outage.

pub mod gemini;
pub mod parse;
pub mod prompt;

use std::fmt;
use std::time::Duration;

use crate::model::{Aggregate, Location, PipelineError, RiskAssessment};
use crate::retry::{CircuitBreaker, RetryPolicy};

pub use gemini::GeminiClient;
pub use parse::parse_assessment;
pub use prompt::build_prompt;

// ---------------------------------------------------------------------------
// Model boundary
// ---------------------------------------------------------------------------

/// Errors from a model call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Connection, timeout, or body read failure.
    Transport(String),
    /// Non-2xx response from the API.
    Api { status: u16, message: String },
    /// The API answered but the envelope had no usable text. `raw` is the
    /// response body as received.
    Format { reason: String, raw: String },
    MissingApiKey,
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Transport(_) => true,
            ModelError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            ModelError::Format { .. } | ModelError::MissingApiKey => false,
        }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::Transport(msg) => write!(f, "Request failed: {}", msg),
            ModelError::Api { status, message } => {
                write!(f, "API error (status {}): {}", status, message)
            }
            ModelError::Format { reason, .. } => write!(f, "Format error: {}", reason),
            ModelError::MissingApiKey => write!(f, "GEMINI_API_KEY not set"),
        }
    }
}

impl std::error::Error for ModelError {}

/// Text in, text out. `Send + Sync` so an assessor can be shared across
/// threads.
pub trait TextModel: Send + Sync {
    fn generate(&self, prompt: &str) -> Result<String, ModelError>;
}

// ---------------------------------------------------------------------------
// Assessor
// ---------------------------------------------------------------------------

pub struct RiskAssessor {
    model: Box<dyn TextModel>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
}

impl RiskAssessor {
    /// Assessor with the default model retry policy and a breaker that opens
    /// after three consecutive failed calls for one minute.
    pub fn new(model: Box<dyn TextModel>, retry: RetryPolicy) -> Self {
        Self::with_breaker(
            model,
            retry,
            CircuitBreaker::new("model", 3, Duration::from_secs(60)),
        )
    }

    pub fn with_breaker(model: Box<dyn TextModel>, retry: RetryPolicy, breaker: CircuitBreaker) -> Self {
        Self {
            model,
            retry,
            breaker,
        }
    }

    /// Ask the model for a raw reply for this location.
    pub fn request(&self, location: &Location, aggregate: &Aggregate) -> Result<String, PipelineError> {
        let prompt = build_prompt(location, aggregate);
        let reply = self
            .breaker
            .call(&self.retry, ModelError::is_transient, |_| {
                // The model answered: an unusable envelope is a completed call.
                match self.model.generate(&prompt) {
                    Err(ModelError::Format { reason, raw }) => Ok(Err((reason, raw))),
                    other => other.map(Ok),
                }
            })
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;

        reply.map_err(|(reason, raw)| PipelineError::MalformedAssessment { reason, raw })
    }

    /// Classify flood risk for a location. Returns a complete assessment or
    /// an error; never a partial record.
    pub fn assess(&self, location: &Location, aggregate: &Aggregate) -> Result<RiskAssessment, PipelineError> {
        let raw = self.request(location, aggregate)?;
        parse_assessment(&raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RiskLevel;
    use std::sync::{Arc, Mutex};

    type Prompts = Arc<Mutex<Vec<String>>>;

    /// Replays canned replies and records prompts.
    struct ScriptedModel {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        prompts: Prompts,
    }

    impl TextModel for ScriptedModel {
        fn generate(&self, prompt: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Err(ModelError::Api {
                    status: 400,
                    message: "script exhausted".to_string(),
                });
            }
            replies.remove(0)
        }
    }

    fn calls(prompts: &Prompts) -> usize {
        prompts.lock().unwrap().len()
    }

    fn assessor(replies: Vec<Result<String, ModelError>>) -> (RiskAssessor, Prompts) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let model = ScriptedModel {
            replies: Mutex::new(replies),
            prompts: Arc::clone(&prompts),
        };
        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::ZERO,
        };
        (RiskAssessor::new(Box::new(model), retry), prompts)
    }

    fn location() -> Location {
        Location {
            id: 7,
            name: "Porto Alegre".to_string(),
            region: "RS".to_string(),
            latitude: -30.0346,
            longitude: -51.2177,
            altitude: 10.0,
            timezone: "America/Sao_Paulo".to_string(),
            baseline_risk: 0.7,
        }
    }

    fn aggregate() -> Aggregate {
        Aggregate {
            accumulated_24h: 120.0,
            forecast_3h: 30.0,
        }
    }

    #[test]
    fn test_assess_returns_parsed_assessment() {
        let (assessor, prompts) = assessor(vec![Ok(
            r#"{"nivel_risco":"Crítico","mensagem_alerta":"Rio acima da cota","recomendacao":"Evacuar"}"#
                .to_string(),
        )]);
        let result = assessor.assess(&location(), &aggregate()).expect("valid reply");

        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(calls(&prompts), 1);
        assert!(prompts.lock().unwrap()[0].contains("Porto Alegre-RS"));
    }

    #[test]
    fn test_transient_model_failure_is_retried() {
        let (assessor, prompts) = assessor(vec![
            Err(ModelError::Api {
                status: 503,
                message: "overloaded".to_string(),
            }),
            Ok(r#"{"nivel_risco":"Baixo","mensagem_alerta":"Tempo seco","recomendacao":"Nada a fazer"}"#
                .to_string()),
        ]);
        let result = assessor.assess(&location(), &aggregate()).expect("second attempt");
        assert_eq!(result.risk_level, RiskLevel::Low);
        assert_eq!(calls(&prompts), 2);
    }

    #[test]
    fn test_permanent_model_failure_is_model_unavailable() {
        let (assessor, prompts) = assessor(vec![Err(ModelError::Api {
            status: 400,
            message: "API key not valid".to_string(),
        })]);
        let err = assessor.assess(&location(), &aggregate()).expect_err("bad key");
        assert!(matches!(err, PipelineError::ModelUnavailable(msg) if msg.contains("400")));
        assert_eq!(calls(&prompts), 1, "4xx is not retried");
    }

    #[test]
    fn test_malformed_reply_is_not_retried() {
        let (assessor, prompts) = assessor(vec![Ok("não sei".to_string())]);
        let err = assessor.assess(&location(), &aggregate()).expect_err("malformed");
        assert!(matches!(err, PipelineError::MalformedAssessment { .. }));
        assert_eq!(calls(&prompts), 1);
    }

    #[test]
    fn test_breaker_stops_calling_after_repeated_failures() {
        let failures = (0..9)
            .map(|_| Err(ModelError::Transport("connection reset".to_string())))
            .collect();
        let (assessor, prompts) = assessor(failures);

        for _ in 0..3 {
            assert!(assessor.assess(&location(), &aggregate()).is_err());
        }
        let calls_before = calls(&prompts);
        assert_eq!(calls_before, 9, "three calls of three attempts each");

        let err = assessor.assess(&location(), &aggregate()).expect_err("breaker open");
        assert!(matches!(err, PipelineError::ModelUnavailable(msg) if msg.contains("open")));
        assert_eq!(calls(&prompts), calls_before, "open breaker skips the model");
    }

    #[test]
    fn test_model_error_transience() {
        assert!(ModelError::Transport("timeout".to_string()).is_transient());
        assert!(ModelError::Api { status: 429, message: String::new() }.is_transient());
        assert!(!ModelError::Api { status: 403, message: String::new() }.is_transient());
        assert!(!ModelError::MissingApiKey.is_transient());
    }

    fn safety_block() -> ModelError {
        ModelError::Format {
            reason: "candidate has no text (finishReason: SAFETY)".to_string(),
            raw: r#"{"candidates":[{"finishReason":"SAFETY"}]}"#.to_string(),
        }
    }

    #[test]
    fn test_empty_reply_is_malformed_and_keeps_body() {
        let (assessor, prompts) = assessor(vec![Err(safety_block())]);
        let err = assessor.assess(&location(), &aggregate()).expect_err("no text");

        match err {
            PipelineError::MalformedAssessment { reason, raw } => {
                assert!(reason.contains("SAFETY"));
                assert_eq!(raw, r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
            }
            other => panic!("expected MalformedAssessment, got {:?}", other),
        }
        assert_eq!(calls(&prompts), 1, "empty reply is not retried");
    }

    #[test]
    fn test_empty_replies_do_not_open_breaker() {
        let good = r#"{"nivel_risco":"Moderado","mensagem_alerta":"Chuva forte","recomendacao":"Monitorar"}"#;
        let (assessor, prompts) = assessor(vec![
            Err(safety_block()),
            Err(safety_block()),
            Err(safety_block()),
            Ok(good.to_string()),
        ]);

        for _ in 0..3 {
            assert!(matches!(
                assessor.assess(&location(), &aggregate()),
                Err(PipelineError::MalformedAssessment { .. })
            ));
        }
        let result = assessor
            .assess(&location(), &aggregate())
            .expect("breaker stays closed after empty replies");
        assert_eq!(result.risk_level, RiskLevel::Moderate);
        assert_eq!(calls(&prompts), 4);
    }

    #[test]
    fn test_assessor_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RiskAssessor>();
        assert_send_sync::<GeminiClient>();
    }
}
