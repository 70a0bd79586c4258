// src/caption.rs
//! Caption rewriting: provider abstraction + prompt template + fallback.
//! A failed generation never fails the request; the caller gets a marked fallback.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CaptionConfig;
use crate::storage::MetadataRecord;

pub const CAPTION_FALLBACK_PREFIX: &str = "Failed to generate new caption. ";

/// Trait object used by the orchestrator (and swapped for doubles in tests).
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynTextGenerator = Arc<dyn TextGenerator>;

/// Fixed template: quote the original, keep its essence, credit the author.
pub fn caption_prompt(original_caption: &str, username: &str) -> String {
    format!(
        "Based on this social media caption: '{original_caption}', write a new engaging caption \
         that keeps the essence of the original but is unique. Include credit to @{username} at the end."
    )
}

/// Ask the generator for a new caption; on failure fall back to the marked original.
pub async fn rewrite_caption(generator: &dyn TextGenerator, record: &MetadataRecord) -> String {
    let original = record.caption_or_empty();
    let prompt = caption_prompt(original, &record.username);
    match generator.generate(&prompt).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!(target: "transform", provider = generator.provider_name(), "empty caption from generator");
            format!("{CAPTION_FALLBACK_PREFIX}{original}")
        }
        Err(e) => {
            warn!(target: "transform", provider = generator.provider_name(), error = %e, "caption generation failed");
            format!("{CAPTION_FALLBACK_PREFIX}{original}")
        }
    }
}

/// Factory: build a generator according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock generator.
/// * Else if `config.enabled==false`, returns a disabled generator (always falls back).
/// * Else builds the real provider.
pub fn build_text_generator(config: &CaptionConfig) -> Result<DynTextGenerator> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Ok(Arc::new(MockGenerator {
            fixed: "Fresh take (mock)".to_string(),
        }));
    }
    if !config.enabled {
        return Ok(Arc::new(DisabledGenerator));
    }
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGenerator::new(config)?)),
        other => bail!("unsupported caption provider: {other}"),
    }
}

/// OpenAI Chat Completions.
pub struct OpenAiGenerator {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &CaptionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("repost-relay/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .context("building openai http client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    async fn generate_impl(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            bail!("OPENAI_API_KEY not configured");
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("openai request")?
            .error_for_status()
            .context("openai status")?;
        let body: Resp = resp.json().await.context("openai response body")?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("openai returned no content"))
    }
}

impl TextGenerator for OpenAiGenerator {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.generate_impl(prompt))
    }
    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

/// Always fails; used when caption generation is disabled.
pub struct DisabledGenerator;

impl TextGenerator for DisabledGenerator {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Err(anyhow!("caption generation disabled")) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Returns a fixed caption; for local runs and tests.
#[derive(Clone)]
pub struct MockGenerator {
    pub fixed: String,
}

impl TextGenerator for MockGenerator {
    fn generate<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
