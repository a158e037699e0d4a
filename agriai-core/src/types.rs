//! Core domain types for agriai
//!
//! A scan produces one [`Verdict`] from the classification service. That
//! verdict is recorded twice: once as a lightweight [`HistoryEntry`] in the
//! scan log and once as a richer [`ReportEntry`] in the report feed. Both
//! records are short-lived and carry the instant they were created so the
//! retention layer can expire them.
//!
//! Persisted field names are camelCase and timestamps are epoch milliseconds,
//! matching the layout existing local stores already hold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Classification
// ============================================

/// What the classification service decided the main subject is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Classification {
    /// A beneficial plant intended for harvest
    Crop,
    /// An unwanted plant competing for resources
    Weed,
    /// Not a plant, or too unclear to tell
    Unknown,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Crop => "Crop",
            Classification::Weed => "Weed",
            Classification::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Classification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Crop" => Ok(Classification::Crop),
            "Weed" => Ok(Classification::Weed),
            "Unknown" => Ok(Classification::Unknown),
            _ => Err(format!("unknown classification: {}", s)),
        }
    }
}

// ============================================
// Verdict
// ============================================

/// Structured result of classifying one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub classification: Classification,
    /// 0-100
    pub confidence: u8,
    /// One sentence for a non-expert
    pub explanation: String,
    /// Scientific and common name, e.g. "Zea mays (Maize)"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Visual reasoning behind the classification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_info: Option<String>,
    /// Agronomic recommendations, or photo tips when the result is unknown
    #[serde(default)]
    pub solutions: Vec<String>,
    /// Drone-based interventions or monitoring tasks
    #[serde(default)]
    pub drone_actions: Vec<String>,
}

pub const FALLBACK_EXPLANATION: &str =
    "An error occurred while connecting to the AI service. Please check your connection and try again.";

impl Verdict {
    /// Verdict shown when the classification service could not be reached or
    /// its answer could not be understood.
    pub fn fallback() -> Self {
        Self {
            classification: Classification::Unknown,
            confidence: 0,
            explanation: FALLBACK_EXPLANATION.to_string(),
            type_name: None,
            summary: None,
            ai_reasoning: None,
            growth_info: None,
            solutions: vec![
                "Check internet connection".to_string(),
                "Try capturing the image again".to_string(),
            ],
            drone_actions: Vec::new(),
        }
    }
}

// ============================================
// History
// ============================================

/// One line of the scan log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Image as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        id: String,
        timestamp: DateTime<Utc>,
        verdict: Verdict,
        image_data: Option<String>,
    ) -> Self {
        Self {
            id,
            timestamp,
            verdict,
            image_data,
        }
    }
}

// ============================================
// Reports
// ============================================

/// Processing state of a report.
///
/// Classification completes before a report is written, so every report is
/// created `Ready`. `Processing` is kept so stored reports from a staged
/// pipeline still deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportStatus {
    Processing,
    Ready,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Processing => "Processing",
            ReportStatus::Ready => "Ready",
        }
    }
}

/// Full agronomic analysis derived from a single scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Image as a data URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub classification: Classification,
    pub confidence: u8,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Older readers look for recommendations here; always mirrors `solutions`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_info: Option<String>,
    #[serde(default)]
    pub solutions: Vec<String>,
    #[serde(default)]
    pub drone_actions: Vec<String>,
}

impl ReportEntry {
    /// Build a ready report from a finished verdict.
    pub fn from_verdict(
        id: String,
        timestamp: DateTime<Utc>,
        verdict: &Verdict,
        image: Option<String>,
    ) -> Self {
        Self {
            id,
            timestamp,
            image,
            classification: verdict.classification,
            confidence: verdict.confidence,
            status: ReportStatus::Ready,
            summary: verdict.summary.clone(),
            explanation: Some(verdict.explanation.clone()),
            recommendations: Some(verdict.solutions.clone()),
            type_name: verdict.type_name.clone(),
            ai_reasoning: verdict.ai_reasoning.clone(),
            growth_info: verdict.growth_info.clone(),
            solutions: verdict.solutions.clone(),
            drone_actions: verdict.drone_actions.clone(),
        }
    }

    /// Last six characters of the id, as shown in listings
    pub fn short_id(&self) -> &str {
        tail(&self.id, 6)
    }
}

/// Returns at most the last `n` characters of `s`.
pub(crate) fn tail(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}
