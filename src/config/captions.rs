// src/config/captions.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_temperature() -> f32 {
    0.8
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "openai" (case-insensitive)
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            endpoint: default_endpoint(),
        }
    }
}

impl CaptionConfig {
    /// Normalize provider, resolve an "ENV" key and clamp sampling params.
    pub fn resolved(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" => {
                    if self.enabled {
                        env::var("OPENAI_API_KEY")
                            .map_err(|_| anyhow::anyhow!("Missing OPENAI_API_KEY env var"))?
                    } else {
                        env::var("OPENAI_API_KEY").unwrap_or_default()
                    }
                }
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = default_temperature();
        }
        if self.max_tokens == 0 {
            self.max_tokens = default_max_tokens();
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_key_is_kept_and_params_sanitized() {
        let cfg = CaptionConfig {
            enabled: true,
            provider: " OpenAI ".into(),
            api_key: "sk-test".into(),
            temperature: 9.0,
            max_tokens: 0,
            ..CaptionConfig::default()
        }
        .resolved()
        .unwrap();
        assert_eq!(cfg.provider, "openai");
        assert_eq!(cfg.api_key, "sk-test");
        assert_eq!(cfg.temperature, 0.8);
        assert_eq!(cfg.max_tokens, 1000);
    }

    #[test]
    fn unknown_provider_with_env_key_is_rejected() {
        let cfg = CaptionConfig {
            provider: "claude".into(),
            ..CaptionConfig::default()
        };
        assert!(cfg.resolved().is_err());
    }

    #[serial_test::serial]
    #[test]
    fn enabled_env_key_requires_variable() {
        env::remove_var("OPENAI_API_KEY");
        let cfg = CaptionConfig {
            enabled: true,
            ..CaptionConfig::default()
        };
        assert!(cfg.clone().resolved().is_err());

        env::set_var("OPENAI_API_KEY", "sk-from-env");
        assert_eq!(cfg.resolved().unwrap().api_key, "sk-from-env");
        env::remove_var("OPENAI_API_KEY");
    }
}
