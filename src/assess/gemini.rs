//! Raw reqwest client for the Gemini `generateContent` endpoint.
//!
//! Single request/response, text only. The client is constructed once per
//! process from configuration and injected into the assessor.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ModelError, TextModel};

/// Generative Language API root.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<OutgoingPart<'a>>,
}

#[derive(Debug, Serialize)]
struct OutgoingPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<IncomingPart>,
}

#[derive(Debug, Deserialize)]
pub struct IncomingPart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Client ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct GeminiClient {
    client: reqwest::blocking::Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> Result<Self, ModelError> {
        Self::with_api_base(DEFAULT_API_BASE, api_key, model, timeout)
    }

    pub fn with_api_base(
        api_base: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        if api_key.trim().is_empty() {
            return Err(ModelError::MissingApiKey);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }
}

impl TextModel for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, ModelError> {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![OutgoingPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        extract_text(&text)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn extract_text(body: &str) -> Result<String, ModelError> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format_error(e.to_string(), body))?;

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| format_error("no candidates in response".to_string(), body))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_string());
        return Err(format_error(
            format!("candidate has no text (finishReason: {})", reason),
            body,
        ));
    }
    Ok(text)
}

fn format_error(reason: String, body: &str) -> ModelError {
    ModelError::Format {
        reason,
        raw: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_joins_parts_of_first_candidate() {
        let body = r#"{
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": "{\"nivel_risco\":"}, {"text": "\"Baixo\"}"}]},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        assert_eq!(
            extract_text(body).expect("text"),
            "{\"nivel_risco\":\"Baixo\"}"
        );
    }

    #[test]
    fn test_extract_text_without_candidates_is_format_error() {
        let err = extract_text(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
            .expect_err("no candidates");
        match &err {
            ModelError::Format { raw, .. } => assert!(raw.contains("blockReason")),
            other => panic!("expected format error, got {:?}", other),
        }
        assert!(!err.is_transient());
    }

    #[test]
    fn test_extract_text_reports_finish_reason_when_empty() {
        let body = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        match extract_text(body) {
            Err(ModelError::Format { reason, raw }) => {
                assert!(reason.contains("MAX_TOKENS"));
                assert_eq!(raw, body);
            }
            other => panic!("expected format error, got {:?}", other),
        }
    }

    #[test]
    fn test_request_body_wire_format() {
        let body = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![OutgoingPart { text: "olá" }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };
        let json = serde_json::to_value(&body).expect("serialize");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "olá");
        assert_eq!(json["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_endpoint_uses_model_name() {
        let client = GeminiClient::with_api_base(
            "https://example.invalid/v1beta/",
            "key",
            "gemini-2.5-flash-lite",
            Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(
            client.endpoint(),
            "https://example.invalid/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let err = GeminiClient::new(" ", "m", Duration::from_secs(1)).expect_err("blank key");
        assert!(matches!(err, ModelError::MissingApiKey));
    }
}
