//! Crop/weed classification
//!
//! The actual model runs remotely. This module wraps it behind the
//! [`VisionService`] trait and turns whatever comes back into a [`Verdict`].
//!
//! ## Failure policy
//!
//! A scan must always produce a result the user can read:
//! - [`Classifier::try_classify`] reports transport and validation failures
//! - [`Classifier::classify`] never fails; it logs the error and returns
//!   [`Verdict::fallback`]

mod client;
mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::Error;
use crate::image::ImagePayload;
use crate::types::Verdict;

pub use client::{response_schema, GeminiService};
pub use schema::{parse_verdict, VerdictError};

/// Instruction sent with every image.
pub const AGRONOMY_PROMPT: &str = r#"You are an agricultural expert AI specializing in precision farming and agronomy.
Analyze the provided image and classify the main subject as either a "Crop" (a beneficial plant intended for harvest) or a "Weed" (an unwanted plant competing for resources).

If the image is not a plant or it's too unclear, classify as "Unknown".

Provide the following structured analysis:
1. Classification & Confidence (0-100).
2. Type Name: Scientific name and common name (e.g., "Zea mays (Maize)").
3. Explanation: A simple 1-sentence explanation for a non-expert.
4. Summary: A concise status summary (e.g., "Healthy crop identified" or "Invasive broadleaf weed detected").
5. AI Reasoning: Detailed technical visual reasoning for the classification (leaf shape, venation, growth pattern).
6. Growth Info: Biological facts, growth habits, or risks associated with this plant.
7. Solutions: 3 actionable agronomic solutions or recommendations.
8. Drone Actions: 3 specific drone-based interventions, monitoring tasks, or spectral analysis suggestions.

If classification is "Unknown", provide tips on taking better photos in the solutions."#;

/// A remote vision-language model.
///
/// Returns the model's raw text answer for one image and prompt.
#[async_trait]
pub trait VisionService: Send + Sync {
    async fn generate(&self, image: &ImagePayload, prompt: &str) -> crate::error::Result<String>;
}

/// Why a classification attempt produced no verdict
#[derive(Error, Debug)]
pub enum ClassifyError {
    /// The service could not be reached or answered with an error
    #[error(transparent)]
    Transport(#[from] Error),

    /// The service answered, but not with a valid verdict
    #[error(transparent)]
    Invalid(#[from] VerdictError),
}

/// Classifies images through an injected [`VisionService`]
#[derive(Clone)]
pub struct Classifier {
    service: Arc<dyn VisionService>,
}

impl Classifier {
    pub fn new(service: Arc<dyn VisionService>) -> Self {
        Self { service }
    }

    /// Classify an image, reporting why it failed if it did.
    pub async fn try_classify(&self, image: &ImagePayload) -> Result<Verdict, ClassifyError> {
        let text = self.service.generate(image, AGRONOMY_PROMPT).await?;
        Ok(parse_verdict(&text)?)
    }

    /// Classify an image, substituting the fallback verdict on any failure.
    pub async fn classify(&self, image: &ImagePayload) -> Verdict {
        match self.try_classify(image).await {
            Ok(verdict) => {
                tracing::info!(
                    classification = %verdict.classification,
                    confidence = verdict.confidence,
                    "Image classified"
                );
                verdict
            }
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed, using fallback verdict");
                Verdict::fallback()
            }
        }
    }
}
