// src/enrichment/description.rs
//
// Vision-model description of a crop.
//
// The service is picked once at start-up. Callers never check "is a service
// configured?" per call: the no-op `FallbackDescriber` answers `Unavailable`
// and the worker treats it like any other outcome.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::types::{DescriptionConfig, DescriptionProvider};

pub const UNAVAILABLE: &str = "description service unavailable";
pub const NO_DESCRIPTION: &str = "no description returned";
pub const LOOKUP_FAILED: &str = "description lookup failed";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone, PartialEq)]
pub enum DescriptionOutcome {
    Described(String),
    Unavailable,
    NoDescription,
    Failed(String),
}

impl DescriptionOutcome {
    /// Text stored with the result. Never empty.
    pub fn into_text(self) -> String {
        match self {
            Self::Described(text) => text,
            Self::Unavailable => UNAVAILABLE.to_string(),
            Self::NoDescription => NO_DESCRIPTION.to_string(),
            Self::Failed(_) => LOOKUP_FAILED.to_string(),
        }
    }

    fn from_text(text: Option<String>) -> Self {
        match text.map(|t| t.trim().to_string()) {
            Some(t) if !t.is_empty() => Self::Described(t),
            _ => Self::NoDescription,
        }
    }
}

#[async_trait]
pub trait DescriptionService: Send + Sync {
    fn name(&self) -> &str;

    /// Describe a JPEG image. Failures are reported in the outcome.
    async fn describe(&self, jpeg: &[u8]) -> DescriptionOutcome;
}

// ============================================================================
// FALLBACK
// ============================================================================

pub struct FallbackDescriber;

#[async_trait]
impl DescriptionService for FallbackDescriber {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn describe(&self, _jpeg: &[u8]) -> DescriptionOutcome {
        DescriptionOutcome::Unavailable
    }
}

// ============================================================================
// GEMINI
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

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
    /// Text parts of the first candidate, joined.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: Vec<&str> = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text.join(""))
        }
    }
}

pub struct GeminiDescriber {
    http_client: reqwest::Client,
    url: String,
    api_key: String,
    prompt: String,
}

impl GeminiDescriber {
    pub fn new(config: &DescriptionConfig, api_key: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let base = config
            .endpoint
            .as_deref()
            .unwrap_or(GEMINI_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            http_client,
            url: format!("{}/v1beta/models/{}:generateContent", base, config.model),
            api_key,
            prompt: config.prompt.clone(),
        })
    }
}

#[async_trait]
impl DescriptionService for GeminiDescriber {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn describe(&self, jpeg: &[u8]) -> DescriptionOutcome {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: &self.prompt },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: base64::engine::general_purpose::STANDARD.encode(jpeg),
                        },
                    },
                ],
            }],
        };

        let response = match self
            .http_client
            .post(&self.url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => return DescriptionOutcome::Failed(format!("Connection error: {}", e)),
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return DescriptionOutcome::Failed(format!("HTTP {}: {}", status, body));
        }

        match response.json::<GenerateContentResponse>().await {
            Ok(parsed) => DescriptionOutcome::from_text(parsed.text()),
            Err(e) => DescriptionOutcome::Failed(format!("Parse error: {}", e)),
        }
    }
}

// ============================================================================
// GENERIC HTTP
// ============================================================================

#[derive(Debug, Serialize)]
struct DescribeRequest<'a> {
    prompt: &'a str,
    mime_type: &'static str,
    image_base64: String,
}

#[derive(Debug, Deserialize)]
struct DescribeResponse {
    description: Option<String>,
}

/// Self-hosted vision endpoint: `{prompt, mime_type, image_base64}` in,
/// `{description}` out.
pub struct HttpDescriber {
    http_client: reqwest::Client,
    url: String,
    prompt: String,
}

impl HttpDescriber {
    pub fn new(config: &DescriptionConfig, url: String) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            url,
            prompt: config.prompt.clone(),
        })
    }
}

#[async_trait]
impl DescriptionService for HttpDescriber {
    fn name(&self) -> &str {
        "http"
    }

    async fn describe(&self, jpeg: &[u8]) -> DescriptionOutcome {
        let request = DescribeRequest {
            prompt: &self.prompt,
            mime_type: "image/jpeg",
            image_base64: base64::engine::general_purpose::STANDARD.encode(jpeg),
        };

        match self.http_client.post(&self.url).json(&request).send().await {
            Ok(resp) if resp.status().is_success() => match resp.json::<DescribeResponse>().await {
                Ok(parsed) => DescriptionOutcome::from_text(parsed.description),
                Err(e) => DescriptionOutcome::Failed(format!("Parse error: {}", e)),
            },
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                DescriptionOutcome::Failed(format!("HTTP {}: {}", status, body))
            }
            Err(e) => DescriptionOutcome::Failed(format!("Connection error: {}", e)),
        }
    }
}

// ============================================================================
// SELECTION
// ============================================================================

/// Pick the service once. Anything missing degrades to the fallback with a
/// warning instead of stopping the process.
pub fn build_description_service(config: &DescriptionConfig) -> Arc<dyn DescriptionService> {
    let service: Result<Arc<dyn DescriptionService>> = match config.provider {
        DescriptionProvider::Disabled => {
            info!("⚪ Description lookup disabled in config");
            return Arc::new(FallbackDescriber);
        }
        DescriptionProvider::Gemini => match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                GeminiDescriber::new(config, key).map(|d| Arc::new(d) as Arc<dyn DescriptionService>)
            }
            _ => {
                warn!(
                    "⚠️  {} is not set. Running without AI descriptions.",
                    config.api_key_env
                );
                return Arc::new(FallbackDescriber);
            }
        },
        DescriptionProvider::Http => match config.endpoint.clone() {
            Some(url) => {
                HttpDescriber::new(config, url).map(|d| Arc::new(d) as Arc<dyn DescriptionService>)
            }
            None => {
                warn!("⚠️  description.endpoint missing for http provider. Running without AI descriptions.");
                return Arc::new(FallbackDescriber);
            }
        },
    };

    match service {
        Ok(service) => {
            info!("✓ Description service ready: {}", service.name());
            service
        }
        Err(e) => {
            warn!("❌ Failed to initialize description service: {}. Proceeding without AI.", e);
            Arc::new(FallbackDescriber)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_text_is_never_empty() {
        assert_eq!(DescriptionOutcome::Unavailable.into_text(), UNAVAILABLE);
        assert_eq!(DescriptionOutcome::NoDescription.into_text(), NO_DESCRIPTION);
        assert_eq!(
            DescriptionOutcome::Failed("boom".to_string()).into_text(),
            LOOKUP_FAILED
        );
        assert_eq!(
            DescriptionOutcome::Described("a freight wagon".to_string()).into_text(),
            "a freight wagon"
        );
    }

    #[test]
    fn test_blank_text_counts_as_no_description() {
        assert_eq!(
            DescriptionOutcome::from_text(Some("   ".to_string())),
            DescriptionOutcome::NoDescription
        );
        assert_eq!(DescriptionOutcome::from_text(None), DescriptionOutcome::NoDescription);
        assert_eq!(
            DescriptionOutcome::from_text(Some(" grey locomotive \n".to_string())),
            DescriptionOutcome::Described("grey locomotive".to_string())
        );
    }

    #[test]
    fn test_gemini_response_text_extraction() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "A red "}, {"text": "signal box."}], "role": "model"}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text().as_deref(), Some("A red signal box."));

        let blocked: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(blocked.text(), None);

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::Text { text: "describe" },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: "AAAA".to_string(),
                        },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/jpeg"
        );
    }

    #[tokio::test]
    async fn test_disabled_provider_selects_fallback() {
        let config = DescriptionConfig {
            provider: DescriptionProvider::Disabled,
            ..DescriptionConfig::default()
        };
        let service = build_description_service(&config);
        assert_eq!(service.name(), "fallback");
        assert_eq!(service.describe(&[1, 2, 3]).await, DescriptionOutcome::Unavailable);
    }

    #[test]
    fn test_missing_api_key_selects_fallback() {
        let config = DescriptionConfig {
            provider: DescriptionProvider::Gemini,
            api_key_env: "RAILWAY_WATCH_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..DescriptionConfig::default()
        };
        assert_eq!(build_description_service(&config).name(), "fallback");
    }

    #[tokio::test]
    async fn test_unreachable_http_endpoint_reports_failure() {
        let config = DescriptionConfig {
            provider: DescriptionProvider::Http,
            endpoint: Some("http://127.0.0.1:9/describe".to_string()),
            timeout_secs: 2,
            ..DescriptionConfig::default()
        };
        let service = build_description_service(&config);
        assert_eq!(service.name(), "http");
        assert!(matches!(
            service.describe(&[0xFF, 0xD8]).await,
            DescriptionOutcome::Failed(_)
        ));
    }
}
