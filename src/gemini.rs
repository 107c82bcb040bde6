//! Gemini image generation client.

use crate::config::Config;
use crate::encoder::{EncodedImage, SelectedImage};
use crate::error::{PosterError, Result};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Default Gemini REST endpoint.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
/// Default image-capable model.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

/// Something that turns a prompt and an image into a generated image.
#[async_trait]
pub trait PosterGenerator: Send + Sync {
    /// Returns the base64 payload of the first generated image, or `None` if the
    /// service answered without one.
    async fn generate(&self, prompt: &str, image: &SelectedImage) -> Result<Option<String>>;
}

/// Where the service credential comes from.
#[derive(Debug, Clone)]
pub enum Credential {
    /// Read from this environment variable on every call.
    Env(String),
    /// A fixed key.
    Key(String),
}

impl Credential {
    fn resolve(&self) -> Result<String> {
        match self {
            Self::Env(var) => std::env::var(var)
                .ok()
                .filter(|key| !key.is_empty())
                .ok_or_else(|| PosterError::MissingCredential(var.clone())),
            Self::Key(key) => Ok(key.clone()),
        }
    }
}

/// Builder for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiClientBuilder {
    api_base: String,
    model: String,
    credential: Credential,
}

impl Default for GeminiClientBuilder {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            credential: Credential::Env("API_KEY".to_string()),
        }
    }
}

impl GeminiClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL, e.g. a local mock in tests.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Uses a fixed API key instead of the environment.
    pub fn api_key(self, key: impl Into<String>) -> Self {
        self.credential(Credential::Key(key.into()))
    }

    pub fn build(self) -> GeminiClient {
        GeminiClient {
            client: reqwest::Client::new(),
            api_base: self.api_base.trim_end_matches('/').to_string(),
            model: self.model,
            credential: self.credential,
        }
    }
}

/// Stateless client for the `generateContent` endpoint.
pub struct GeminiClient {
    client: reqwest::Client,
    api_base: String,
    model: String,
    credential: Credential,
}

impl GeminiClient {
    pub fn builder() -> GeminiClientBuilder {
        GeminiClientBuilder::new()
    }

    /// Builds a client from the service configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::builder()
            .api_base(&config.api_base)
            .model(&config.model)
            .credential(Credential::Env(config.credential_var.clone()))
            .build()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    async fn send(
        &self,
        api_key: &str,
        body: &GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        tracing::info!(model = %self.model, "sending request to Gemini");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .context("request to Gemini failed")?;

        let status = response.status();
        let text = response.text().await.context("failed to read Gemini response")?;

        if !status.is_success() {
            anyhow::bail!("API error {}: {}", status, text);
        }

        serde_json::from_str(&text).context("malformed Gemini response")
    }
}

#[async_trait]
impl PosterGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, image: &SelectedImage) -> Result<Option<String>> {
        let api_key = self.credential.resolve()?;

        let encoded = image.encode();
        let body = GenerateContentRequest::new(prompt, encoded);

        match self.send(&api_key, &body).await {
            Ok(response) => {
                response.log_feedback();
                Ok(response.into_first_image())
            }
            Err(e) => {
                tracing::error!(error = ?e, "error generating content");
                Err(PosterError::Generation)
            }
        }
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<String>,
}

impl GenerateContentRequest {
    /// Prompt text first, then the image.
    fn new(prompt: &str, image: EncodedImage) -> Self {
        let parts = vec![
            RequestPart::Text {
                text: prompt.to_string(),
            },
            RequestPart::InlineData {
                inline_data: InlineData {
                    mime_type: image.mime_type,
                    data: image.data,
                },
            },
        ];

        Self {
            contents: vec![RequestContent { parts }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

impl GenerateContentResponse {
    /// First inline-data part of the first candidate, in part order.
    fn into_first_image(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .find_map(|part| part.inline_data)
            .map(|inline| inline.data)
    }

    fn log_feedback(&self) {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            tracing::warn!(reason, "prompt blocked by Gemini");
        }
        if let Some(reason) = self
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .filter(|r| *r != "STOP")
        {
            tracing::warn!(reason, "unusual finish reason from Gemini");
        }
    }
}
