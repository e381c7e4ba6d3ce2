//! Oracle client — unified interface for Ollama and OpenAI-compatible
//! backends.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::OracleError;
use crate::types::{OracleRequest, OracleResponse};
use vivarium_core::config::OracleConfig;

/// Provider backend for oracle inference.
#[derive(Debug, Clone)]
pub enum OracleProvider {
    /// Ollama running locally.
    Ollama {
        /// Base URL of the Ollama server.
        base_url: String,
    },
    /// OpenAI-compatible API (also works with Anthropic, Together, etc.).
    OpenAiCompatible {
        /// Base URL of the API.
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No backend — every call fails, triggering deterministic fallbacks.
    None,
}

impl OracleProvider {
    /// Build a provider from configuration. Unknown provider names map to
    /// [`OracleProvider::None`].
    #[must_use]
    pub fn from_config(config: &OracleConfig) -> Self {
        match config.provider.as_str() {
            "ollama" => Self::Ollama {
                base_url: config.base_url.clone(),
            },
            "openai" => Self::OpenAiCompatible {
                base_url: config.base_url.clone(),
                api_key: config.api_key.clone(),
            },
            other => {
                if other != "none" {
                    warn!(provider = other, "unknown oracle provider, running without one");
                }
                Self::None
            }
        }
    }
}

/// The oracle client that routes requests to the configured backend.
pub struct OracleClient {
    provider: OracleProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl OracleClient {
    /// Create a new oracle client.
    #[must_use]
    pub fn new(provider: OracleProvider, model: impl Into<String>, max_retries: u32) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries,
        }
    }

    /// Create a client with no backend (all calls fail).
    #[must_use]
    pub fn none() -> Self {
        Self {
            provider: OracleProvider::None,
            http: Client::new(),
            model: String::new(),
            max_retries: 0,
        }
    }

    /// Build a client from configuration.
    #[must_use]
    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(
            OracleProvider::from_config(config),
            config.model.clone(),
            config.max_retries,
        )
    }

    /// Whether a real backend is configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, OracleProvider::None)
    }

    /// Generate a response.
    ///
    /// # Errors
    ///
    /// Returns an error when no backend is configured or every retry
    /// failed; the caller falls back to deterministic text on error.
    pub async fn generate(&self, request: &OracleRequest) -> Result<OracleResponse, OracleError> {
        match &self.provider {
            OracleProvider::None => Err(OracleError::Unavailable(
                "no oracle backend configured".into(),
            )),
            OracleProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            OracleProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    /// Generate using Ollama's API.
    async fn generate_ollama(
        &self,
        base_url: &str,
        request: &OracleRequest,
    ) -> Result<OracleResponse, OracleError> {
        let url = format!("{base_url}/api/generate");
        let body = json!({
            "model": self.model,
            "prompt": format!("{}\n\n{}", request.system, request.user),
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            }
        });

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, total = self.max_retries + 1, "retrying oracle call");
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .json(&body)
                .timeout(Duration::from_millis(request.timeout_ms))
                .send()
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    if resp.status().is_success() {
                        let json: serde_json::Value = resp
                            .json()
                            .await
                            .map_err(|e| OracleError::ParseError(e.to_string()))?;
                        let text = json["response"].as_str().unwrap_or("").to_string();
                        return Ok(OracleResponse {
                            text,
                            latency_ms,
                            model: self.model.clone(),
                        });
                    }
                    last_error = format!(
                        "HTTP {}: {}",
                        resp.status(),
                        resp.text().await.unwrap_or_default()
                    );
                    warn!("ollama returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() {
                        warn!(timeout_ms = request.timeout_ms, "ollama request timed out");
                    } else {
                        warn!("ollama request failed: {last_error}");
                    }
                }
            }
        }

        Err(OracleError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    /// Generate using an OpenAI-compatible API.
    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &OracleRequest,
    ) -> Result<OracleResponse, OracleError> {
        let url = format!("{base_url}/v1/chat/completions");
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, total = self.max_retries + 1, "retrying oracle call");
            }

            let start = Instant::now();
            let result = self
                .http
                .post(&url)
                .header("Authorization", format!("Bearer {api_key}"))
                .json(&body)
                .timeout(Duration::from_millis(request.timeout_ms))
                .send()
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(resp) => {
                    if resp.status().is_success() {
                        let json: serde_json::Value = resp
                            .json()
                            .await
                            .map_err(|e| OracleError::ParseError(e.to_string()))?;
                        let text = json["choices"][0]["message"]["content"]
                            .as_str()
                            .unwrap_or("")
                            .to_string();
                        return Ok(OracleResponse {
                            text,
                            latency_ms,
                            model: self.model.clone(),
                        });
                    }
                    last_error = format!("HTTP {}", resp.status());
                    warn!("openai-compatible API returned error: {last_error}");
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!("openai-compatible request failed: {last_error}");
                }
            }
        }

        Err(OracleError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }
}
