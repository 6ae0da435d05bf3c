//! Ollama client used by the LLM-backed oracles.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{OracleError, OracleResult};

/// Configuration for the Ollama client (`[llm]` in the config file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

/// Client for the Ollama REST API.
#[derive(Clone)]
pub struct OllamaClient {
    config: OllamaConfig,
    available: bool,
    /// Models available locally after `ping()`.
    available_models: Vec<String>,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Self {
        Self {
            config,
            available: false,
            available_models: Vec::new(),
        }
    }

    /// Create a client and ping the server; fails if it is unreachable.
    pub fn connect(config: OllamaConfig) -> OracleResult<Self> {
        let mut client = Self::new(config);
        if !client.ping() {
            return Err(OracleError::Unavailable {
                url: client.config.base_url.clone(),
            });
        }
        if !client.has_model() {
            tracing::warn!(model = %client.config.model, "model not pulled; requests may fail");
        }
        Ok(client)
    }

    /// Query `/api/tags` for availability and the local model list.
    pub fn ping(&mut self) -> bool {
        let url = format!("{}/api/tags", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();

        match agent.get(&url).call() {
            Ok(resp) => {
                if resp.status() != 200 {
                    self.available = false;
                    return false;
                }
                self.available = true;

                if let Ok(body) = resp.into_string() {
                    if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
                        self.available_models = json["models"]
                            .as_array()
                            .map(|arr| {
                                arr.iter()
                                    .filter_map(|m| m["name"].as_str().map(|s| s.to_string()))
                                    .collect()
                            })
                            .unwrap_or_default();
                    }
                }
                true
            }
            Err(_) => {
                self.available = false;
                self.available_models.clear();
                false
            }
        }
    }

    /// Whether the configured model is locally available.
    pub fn has_model(&self) -> bool {
        let target = &self.config.model;
        self.available_models
            .iter()
            .any(|m| m == target || m.split(':').next() == Some(target))
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Generate a completion from a prompt, asking for JSON output.
    pub fn generate(&self, prompt: &str, system: Option<&str>) -> OracleResult<String> {
        if !self.available {
            return Err(OracleError::Unavailable {
                url: self.config.base_url.clone(),
            });
        }

        let url = format!("{}/api/generate", self.config.base_url);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build();

        let mut body = serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
        });
        if let Some(sys) = system {
            body["system"] = serde_json::Value::String(sys.to_string());
        }

        let resp = agent
            .post(&url)
            .send_json(body)
            .map_err(|e: ureq::Error| OracleError::RequestFailed {
                message: e.to_string(),
            })?;

        let json: serde_json::Value = resp.into_json().map_err(|e| OracleError::ParseError {
            message: e.to_string(),
        })?;

        tracing::trace!(model = %self.config.model, "ollama completion received");
        json["response"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| OracleError::ParseError {
                message: "missing 'response' field".into(),
            })
    }
}

impl std::fmt::Debug for OllamaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaClient")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .field("available", &self.available)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_unreachable_returns_false() {
        let config = OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        let mut client = OllamaClient::new(config);
        assert!(!client.ping());
        assert!(!client.is_available());
    }

    #[test]
    fn connect_unreachable_is_unavailable() {
        let config = OllamaConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        assert!(matches!(
            OllamaClient::connect(config),
            Err(OracleError::Unavailable { .. })
        ));
    }

    #[test]
    fn generate_when_unavailable_returns_error() {
        let client = OllamaClient::new(OllamaConfig::default());
        assert!(matches!(
            client.generate("test", None),
            Err(OracleError::Unavailable { .. })
        ));
    }

    #[test]
    fn default_config_values() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.timeout_secs, 120);
    }
}
