//! HTTP client for the Gemini `generateContent` API
//!
//! Sends one inline image plus the agronomy prompt and asks for a JSON body
//! shaped by [`response_schema`]. Only transport concerns live here; turning
//! the returned text into a verdict is [`super::schema`]'s job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ClassifierConfig;
use crate::error::{Error, Result};
use crate::image::ImagePayload;

use super::VisionService;

/// HTTP client for a Gemini-compatible vision model
pub struct GeminiService {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
}

impl GeminiService {
    /// Create a new client from configuration
    ///
    /// Returns an error if the configuration is invalid or no API key is available.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        config.validate()?;

        let api_key = config.resolved_api_key().ok_or_else(|| {
            Error::Config(
                "classifier.api_key is not set (or export GEMINI_API_KEY)".to_string(),
            )
        })?;

        let base_url = config.endpoint.trim_end_matches('/').to_string();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&api_key)
                .map_err(|e| Error::Config(format!("invalid api_key: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            model: config.model.clone(),
        })
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait]
impl VisionService for GeminiService {
    async fn generate(&self, image: &ImagePayload, prompt: &str) -> Result<String> {
        let url = self.generate_url();
        let data = image.to_base64();

        let request_body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type(),
                            data: &data,
                        },
                    },
                    Part::Text { text: prompt },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        };

        tracing::debug!(model = %self.model, bytes = image.bytes().len(), "Sending image for classification");

        let response = self
            .http_client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::Classifier(format!("HTTP request failed: {}", e)))?;

        let status = response.status();

        if status.is_success() {
            let result: GenerateContentResponse = response
                .json()
                .await
                .map_err(|e| Error::Classifier(format!("failed to parse response: {}", e)))?;
            result
                .text()
                .ok_or_else(|| Error::Classifier("response contained no text".to_string()))
        } else {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            Err(Error::Classifier(format!(
                "API error ({}): {}",
                status, error_text
            )))
        }
    }
}

/// JSON schema the model is asked to follow.
pub fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "classification": { "type": "STRING", "enum": ["Crop", "Weed", "Unknown"] },
            "confidence": { "type": "NUMBER" },
            "explanation": { "type": "STRING" },
            "typeName": { "type": "STRING" },
            "summary": { "type": "STRING" },
            "aiReasoning": { "type": "STRING" },
            "growthInfo": { "type": "STRING" },
            "solutions": { "type": "ARRAY", "items": { "type": "STRING" } },
            "droneActions": { "type": "ARRAY", "items": { "type": "STRING" } }
        },
        "required": [
            "classification", "confidence", "explanation", "typeName", "summary",
            "aiReasoning", "growthInfo", "solutions", "droneActions"
        ]
    })
}

/// Request body for POST /v1beta/models/{model}:generateContent
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text { text: &'a str },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

/// Response from POST /v1beta/models/{model}:generateContent
#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}
