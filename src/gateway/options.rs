// Keypool — Per-request options
//
// Resolution order for each generation parameter: explicit option, then the
// call profile configured for the request's sequence tag, then the config
// default. Unset fields are `None`, so an explicit 0.0 temperature is kept.

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;

/// Caller-supplied knobs for one `Gateway::request`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Attempt ceiling for this request; `None` or 0 uses the configured one.
    pub max_retries: Option<u32>,
    /// External sequence number; selects a call profile and, when sticky
    /// assignment is on, the credential tried first.
    pub sequence_tag: Option<u64>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_sequence_tag(mut self, tag: u64) -> Self {
        self.sequence_tag = Some(tag);
        self
    }

    /// Fill every unset parameter from the tag's profile or the config.
    pub(crate) fn resolve(&self, config: &GatewayConfig) -> ResolvedCall {
        let profile = self.sequence_tag.and_then(|tag| config.profile(tag));

        let model = self
            .model
            .clone()
            .or_else(|| profile.and_then(|p| p.model.clone()))
            .unwrap_or_else(|| config.default_model.clone());
        let temperature = self
            .temperature
            .or_else(|| profile.and_then(|p| p.temperature))
            .unwrap_or(config.default_temperature);
        let max_tokens = self
            .max_tokens
            .or_else(|| profile.and_then(|p| p.max_tokens))
            .unwrap_or(config.default_max_tokens);
        let retry_ceiling = self
            .max_retries
            .filter(|n| *n > 0)
            .unwrap_or(config.max_retries);

        ResolvedCall {
            model,
            temperature,
            max_tokens,
            retry_ceiling,
        }
    }
}

/// Fully-resolved parameters for one request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedCall {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub retry_ceiling: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallProfile;

    fn config_with_profile() -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.profiles.insert(
            "2".to_string(),
            CallProfile {
                model: Some("mixtral-8x7b".to_string()),
                temperature: None,
                max_tokens: Some(2500),
            },
        );
        config
    }

    #[test]
    fn test_defaults_without_tag() {
        let config = config_with_profile();
        let call = RequestOptions::new().resolve(&config);
        assert_eq!(call.model, "llama-3.3-70b-versatile");
        assert_eq!(call.temperature, 0.7);
        assert_eq!(call.max_tokens, 2000);
        assert_eq!(call.retry_ceiling, 3);
    }

    #[test]
    fn test_profile_fills_unset_fields() {
        let config = config_with_profile();
        let call = RequestOptions::new().with_sequence_tag(2).resolve(&config);
        assert_eq!(call.model, "mixtral-8x7b");
        assert_eq!(call.max_tokens, 2500);
        assert_eq!(call.temperature, 0.7, "Profile without temperature falls back to config");
    }

    #[test]
    fn test_explicit_values_beat_profile() {
        let config = config_with_profile();
        let call = RequestOptions::new()
            .with_sequence_tag(2)
            .with_model("llama-3.1-8b-instant")
            .with_temperature(0.0)
            .with_max_retries(7)
            .resolve(&config);
        assert_eq!(call.model, "llama-3.1-8b-instant");
        assert_eq!(call.temperature, 0.0, "Explicit zero temperature is honored");
        assert_eq!(call.max_tokens, 2500);
        assert_eq!(call.retry_ceiling, 7);
    }

    #[test]
    fn test_zero_retries_uses_configured_ceiling() {
        let call = RequestOptions::new()
            .with_max_retries(0)
            .resolve(&GatewayConfig::default());
        assert_eq!(call.retry_ceiling, 3);
    }

    #[test]
    fn test_deserialize_partial_options() {
        let opts: RequestOptions =
            serde_json::from_str(r#"{"sequence_tag": 4, "temperature": 0.8}"#).unwrap();
        assert_eq!(opts.sequence_tag, Some(4));
        assert_eq!(opts.temperature, Some(0.8));
        assert!(opts.model.is_none());
    }
}
