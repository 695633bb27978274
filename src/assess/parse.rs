//! Model reply parsing.
//!
//! A reply is accepted only if some normalization of it decodes into the
//! assessment contract: an object with string fields `nivel_risco`,
//! `mensagem_alerta` and `recomendacao`, all non-empty, and a risk level that
//! is one of the four known labels. Normalizers are tried in order and the
//! first candidate that satisfies the contract wins.
//!
//! Nothing partial is ever returned: a reply either yields a complete
//! `RiskAssessment` or a `MalformedAssessment` carrying the raw text.

use serde::Deserialize;

use crate::model::{PipelineError, RiskAssessment, RiskLevel};

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Wire shape of a model answer. Extra keys are ignored; the English key
/// names are accepted as aliases.
#[derive(Debug, Deserialize)]
struct AssessmentContract {
    #[serde(alias = "risk_level")]
    nivel_risco: String,
    #[serde(alias = "alert_message")]
    mensagem_alerta: String,
    #[serde(alias = "recommendation")]
    recomendacao: String,
}

/// Decode and validate one candidate JSON text.
pub fn decode_contract(candidate: &str) -> Result<RiskAssessment, String> {
    let contract: AssessmentContract =
        serde_json::from_str(candidate).map_err(|e| format!("invalid JSON: {}", e))?;

    let risk_level = RiskLevel::from_label(&contract.nivel_risco)
        .ok_or_else(|| format!("unknown risk level '{}'", contract.nivel_risco))?;

    let alert_message = contract.mensagem_alerta.trim();
    if alert_message.is_empty() {
        return Err("mensagem_alerta is empty".to_string());
    }
    let recommendation = contract.recomendacao.trim();
    if recommendation.is_empty() {
        return Err("recomendacao is empty".to_string());
    }

    Ok(RiskAssessment {
        risk_level,
        alert_message: alert_message.to_string(),
        recommendation: recommendation.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Normalizers
// ---------------------------------------------------------------------------

/// Ways of recovering a JSON candidate from a noisy reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalizer {
    /// The trimmed reply as-is.
    Strict,
    /// The reply with Markdown code-fence markup removed.
    FenceStripped,
    /// The first balanced `{ ... }` span in the reply.
    EmbeddedObject,
}

pub const NORMALIZERS: [Normalizer; 3] = [
    Normalizer::Strict,
    Normalizer::FenceStripped,
    Normalizer::EmbeddedObject,
];

impl Normalizer {
    pub fn name(&self) -> &'static str {
        match self {
            Normalizer::Strict => "strict",
            Normalizer::FenceStripped => "fence-stripped",
            Normalizer::EmbeddedObject => "embedded-object",
        }
    }

    /// Candidate text for this strategy, or `None` if it does not apply.
    pub fn apply(&self, raw: &str) -> Option<String> {
        let candidate = match self {
            Normalizer::Strict => raw.trim().to_string(),
            Normalizer::FenceStripped => strip_code_fences(raw),
            Normalizer::EmbeddedObject => extract_embedded_object(raw)?.to_string(),
        };
        if candidate.is_empty() {
            None
        } else {
            Some(candidate)
        }
    }
}

/// Remove ```` ```json ```` / ```` ``` ```` markers wherever they appear.
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for line in raw.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("```") {
            // Fence line, possibly with a language tag; keep anything after
            // the tag on a single-line fence such as ```json {"a":1}```.
            let rest = rest
                .trim_start_matches(|c: char| c.is_ascii_alphabetic())
                .trim();
            let rest = rest.strip_suffix("```").unwrap_or(rest);
            out.push_str(rest);
        } else {
            out.push_str(line.strip_suffix("```").unwrap_or(line));
        }
        out.push('\n');
    }
    out.trim().to_string()
}

/// Find the first balanced JSON object, honouring braces inside strings.
pub fn extract_embedded_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&raw[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Turn a raw model reply into a validated assessment.
pub fn parse_assessment(raw: &str) -> Result<RiskAssessment, PipelineError> {
    let mut tried: Vec<String> = Vec::new();
    let mut reasons: Vec<String> = Vec::new();

    for normalizer in NORMALIZERS {
        let Some(candidate) = normalizer.apply(raw) else {
            continue;
        };
        if tried.contains(&candidate) {
            continue;
        }
        match decode_contract(&candidate) {
            Ok(assessment) => return Ok(assessment),
            Err(reason) => reasons.push(format!("{}: {}", normalizer.name(), reason)),
        }
        tried.push(candidate);
    }

    let reason = if reasons.is_empty() {
        "empty reply".to_string()
    } else {
        reasons.join("; ")
    };

    Err(PipelineError::MalformedAssessment {
        reason,
        raw: raw.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
