//! Narrative synthesis provider.
//!
//! The orchestrator can hand retrieved, attributed passages to an LLM and
//! ask for a consolidated narrative. This module hides the provider behind
//! [`SynthesisProvider`]; with the `disabled` provider every operation
//! still returns its full structured output, just without the narrative.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::SynthesisConfig;

/// Text-to-text synthesis. `generate` takes a fully assembled prompt and
/// returns the model's narrative.
#[async_trait]
pub trait SynthesisProvider: Send + Sync {
    fn model_name(&self) -> &str;
    fn is_enabled(&self) -> bool {
        true
    }
    async fn generate(&self, prompt: &str) -> Result<String>;
}

pub fn create_provider(config: &SynthesisConfig) -> Result<Box<dyn SynthesisProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSynthesis)),
        "gemini" => Ok(Box::new(GeminiSynthesis::new(config)?)),
        other => bail!("Unknown synthesis provider: {}", other),
    }
}

/// No-op synthesis. Operations detect it and skip the narrative field.
pub struct DisabledSynthesis;

#[async_trait]
impl SynthesisProvider for DisabledSynthesis {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Synthesis provider is disabled")
    }
}

/// Gemini `generateContent` adapter with the same retry policy as the
/// embedding providers.
pub struct GeminiSynthesis {
    model: String,
    api_key: String,
    config: SynthesisConfig,
}

impl GeminiSynthesis {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", config.api_key_env))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl SynthesisProvider for GeminiSynthesis {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0.4,
                "maxOutputTokens": 2048,
            }
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()?;

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_generate_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "Gemini API error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("Gemini API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Synthesis failed after retries")))
    }
}

fn parse_generate_response(json: &serde_json::Value) -> Result<String> {
    let text = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .and_then(|p| p.first())
        .and_then(|p| p.get("text"))
        .and_then(|t| t.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidate text"))?;
    Ok(text.trim().to_string())
}
