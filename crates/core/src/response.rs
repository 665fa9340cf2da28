//! Parsing of structured model replies.
//!
//! Every request kind has exactly one parse function here. They all accept the raw text a model
//! returned (possibly wrapped in markdown code fences or surrounded by prose) and either produce a
//! fully validated value or a [`PayloadError`]. Callers decide the fallback; nothing here logs.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::question::{Difficulty, Question};

/// Tolerance on the sum of question weights.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("model returned an empty response")]
    Empty,
    #[error("model response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("model response is missing or has invalid fields: {0}")]
    Invalid(String),
}

/// Score and feedback for one answer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Evaluation {
    pub score: u8,
    pub feedback: String,
}

/// What the judge wants to do about a weak answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remediation {
    Hint(String),
    FollowUp {
        question: String,
        answer_key: Option<String>,
    },
}

/// Strips markdown code fences and any prose outside the outermost JSON object or array.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        // Drop the info string (e.g. `json`) on the opening fence line.
        text = match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest,
        };
        if let Some(end) = text.rfind("```") {
            text = &text[..end];
        }
        text = text.trim();
    }

    let open = text.find(['{', '[']);
    let close = text.rfind(['}', ']']);
    match (open, close) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, PayloadError> {
    let body = strip_code_fence(raw);
    if body.is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

fn non_empty(field: &str, value: Option<String>) -> Result<String, PayloadError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PayloadError::Invalid(format!("'{field}' is missing or empty"))),
    }
}

#[derive(Deserialize)]
struct QuestionPayload {
    question: Option<String>,
    answer_key: Option<String>,
    difficulty: Option<String>,
}

/// Parses a generated question. An unrecognised difficulty falls back to the band that was asked for.
pub fn parse_question(raw: &str, requested: Difficulty) -> Result<Question, PayloadError> {
    let payload: QuestionPayload = parse_payload(raw)?;
    let text = non_empty("question", payload.question)?;
    let answer_key = non_empty("answer_key", payload.answer_key)?;
    let difficulty = payload
        .difficulty
        .and_then(|d| d.parse().ok())
        .unwrap_or(requested);
    Ok(Question {
        text,
        answer_key,
        difficulty,
    })
}

#[derive(Deserialize)]
struct EvaluationPayload {
    score: Option<Value>,
    feedback: Option<String>,
}

fn normalize_score(value: &Value) -> Option<u8> {
    let score = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches("/10").trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    Some(score.round().clamp(0.0, 10.0) as u8)
}

pub fn parse_evaluation(raw: &str) -> Result<Evaluation, PayloadError> {
    let payload: EvaluationPayload = parse_payload(raw)?;
    let score = payload
        .score
        .as_ref()
        .and_then(normalize_score)
        .ok_or_else(|| PayloadError::Invalid("'score' is missing or not a number".to_string()))?;
    let feedback = non_empty("feedback", payload.feedback)?;
    Ok(Evaluation { score, feedback })
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RemediationPayload {
    Hint {
        content: Option<String>,
    },
    #[serde(alias = "follow-up", alias = "followup")]
    FollowUp {
        content: Option<String>,
        #[serde(default)]
        answer_key: Option<String>,
    },
}

pub fn parse_remediation(raw: &str) -> Result<Remediation, PayloadError> {
    let payload: RemediationPayload = parse_payload(raw)?;
    match payload {
        RemediationPayload::Hint { content } => Ok(Remediation::Hint(non_empty("content", content)?)),
        RemediationPayload::FollowUp {
            content,
            answer_key,
        } => Ok(Remediation::FollowUp {
            question: non_empty("content", content)?,
            answer_key: answer_key
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
        }),
    }
}

#[derive(Deserialize)]
struct WeightsPayload {
    weights: Vec<f64>,
}

/// Parses per-question weights, requiring exactly `expected_len` non-negative entries summing to 1.
pub fn parse_weights(raw: &str, expected_len: usize) -> Result<Vec<f64>, PayloadError> {
    let payload: WeightsPayload = parse_payload(raw)?;
    let weights = payload.weights;
    if weights.len() != expected_len {
        return Err(PayloadError::Invalid(format!(
            "expected {expected_len} weights, got {}",
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(PayloadError::Invalid(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(PayloadError::Invalid(format!(
            "weights sum to {sum:.3}, expected 1.0"
        )));
    }
    Ok(weights)
}

#[derive(Deserialize)]
struct SummaryPayload {
    summary: Option<String>,
}

pub fn parse_summary(raw: &str) -> Result<String, PayloadError> {
    let payload: SummaryPayload = parse_payload(raw)?;
    non_empty("summary", payload.summary)
}
