//! Strict validation of classification responses
//!
//! The service is asked for a JSON object, but nothing guarantees it sends
//! one. [`parse_verdict`] turns the raw text into a [`Verdict`] or says
//! exactly what was wrong with it.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{Classification, Verdict};

/// Why a response could not be turned into a verdict
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    /// Not a JSON object, or a field had the wrong type
    #[error("malformed response: {0}")]
    Malformed(String),

    /// A required field was absent
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// `classification` was not Crop, Weed or Unknown
    #[error("invalid classification: {0:?}")]
    InvalidClassification(String),

    /// `confidence` was not a number between 0 and 100
    #[error("confidence out of range: {0}")]
    InvalidConfidence(f64),
}

/// Wire shape of the response; everything optional so presence is checked
/// explicitly rather than by serde defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVerdict {
    classification: Option<String>,
    confidence: Option<f64>,
    explanation: Option<String>,
    type_name: Option<String>,
    summary: Option<String>,
    ai_reasoning: Option<String>,
    growth_info: Option<String>,
    solutions: Option<Vec<String>>,
    drone_actions: Option<Vec<String>>,
}

/// Validate a classification response body.
pub fn parse_verdict(text: &str) -> Result<Verdict, VerdictError> {
    let raw: RawVerdict =
        serde_json::from_str(text.trim()).map_err(|e| VerdictError::Malformed(e.to_string()))?;

    let classification = raw
        .classification
        .ok_or(VerdictError::MissingField("classification"))?;
    let classification = classification
        .parse::<Classification>()
        .map_err(|_| VerdictError::InvalidClassification(classification))?;

    let confidence = raw
        .confidence
        .ok_or(VerdictError::MissingField("confidence"))?;
    if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
        return Err(VerdictError::InvalidConfidence(confidence));
    }

    let explanation = raw
        .explanation
        .ok_or(VerdictError::MissingField("explanation"))?;

    Ok(Verdict {
        classification,
        confidence: confidence.round() as u8,
        explanation,
        type_name: raw.type_name,
        summary: raw.summary,
        ai_reasoning: raw.ai_reasoning,
        growth_info: raw.growth_info,
        solutions: raw.solutions.unwrap_or_default(),
        drone_actions: raw.drone_actions.unwrap_or_default(),
    })
}
