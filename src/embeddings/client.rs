//! Embedding API clients for remote providers

use futures::stream::StreamExt;
use futures::stream::{
    self,
};
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::errors::Result;
use crate::errors::TaxoMatchError;

/// Supported embedding providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hash-based term-frequency vectors, no model required
    #[default]
    Hash,
    /// Local sentence encoder (all-MiniLM-L6-v2) - requires `neural` feature
    Neural,
    /// `OpenAI` embeddings API
    OpenAI,
    /// Ollama local embeddings
    Ollama,
}

impl EmbeddingProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Neural => "neural",
            Self::OpenAI => "openai",
            Self::Ollama => "ollama",
        }
    }

    pub const fn is_remote(self) -> bool {
        matches!(self, Self::OpenAI | Self::Ollama)
    }
}

impl std::fmt::Display for EmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client for generating embeddings from HTTP providers
pub struct EmbeddingClient {
    provider: EmbeddingProvider,
    model: String,
    endpoint: url::Url,
    api_key: Option<String>,
    client: Client,
    concurrency: usize,
}

impl EmbeddingClient {
    /// Create a new embedding client
    ///
    /// # Errors
    /// - Provider is not a remote provider
    /// - Endpoint is not a valid URL
    /// - HTTP client build errors (invalid configuration)
    pub fn new(
        provider: EmbeddingProvider,
        model: String,
        endpoint: &str,
        api_key: Option<String>,
    ) -> Result<Self> {
        if !provider.is_remote() {
            return Err(TaxoMatchError::ConfigError(format!(
                "{provider} is not an HTTP embedding provider"
            )));
        }

        // Trailing slash so `join` appends instead of replacing the last segment
        let base = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{endpoint}/")
        };
        let endpoint = url::Url::parse(&base).map_err(|e| {
            TaxoMatchError::ConfigError(format!("Invalid embeddings endpoint {endpoint}: {e}"))
        })?;

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| TaxoMatchError::HttpError(e.to_string()))?;

        Ok(Self {
            provider,
            model,
            endpoint,
            api_key,
            client,
            concurrency: 16,
        })
    }

    pub const fn provider(&self) -> EmbeddingProvider {
        self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate embeddings for multiple texts, preserving order
    ///
    /// # Errors
    /// - API request failures (network errors, timeouts, authentication failures)
    /// - Invalid API responses (malformed JSON, missing vectors)
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.provider {
            EmbeddingProvider::OpenAI => self.generate_batch_openai(texts).await,
            EmbeddingProvider::Ollama => {
                // Ollama embeds one prompt per request
                // Futures are built up front so the stream carries no borrowing closure
                let requests: Vec<_> = texts.iter().map(|text| self.generate_ollama(text)).collect();
                let results: Vec<Result<Vec<f32>>> = stream::iter(requests)
                    .buffered(self.concurrency.min(texts.len().max(1)))
                    .collect()
                    .await;
                results.into_iter().collect()
            }
            EmbeddingProvider::Hash | EmbeddingProvider::Neural => Err(
                TaxoMatchError::ConfigError(format!("{} is not remote", self.provider)),
            ),
        }
    }

    fn url(&self, path: &str) -> Result<url::Url> {
        self.endpoint
            .join(path)
            .map_err(|e| TaxoMatchError::ConfigError(format!("Invalid endpoint path {path}: {e}")))
    }

    /// Generate embeddings in batch using `OpenAI` API
    async fn generate_batch_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| TaxoMatchError::ConfigError("OpenAI API key not provided".to_string()))?;

        #[derive(Serialize)]
        struct OpenAIBatchRequest<'a> {
            input: &'a [String],
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct OpenAIResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            index: usize,
            embedding: Vec<f32>,
        }

        let url = self.url("embeddings")?;
        debug!("Calling OpenAI batch embeddings API: {} items", texts.len());

        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(&OpenAIBatchRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| TaxoMatchError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TaxoMatchError::EmbeddingError(format!(
                "OpenAI API error ({status}): {error_text}"
            )));
        }

        let mut result: OpenAIResponse = response.json().await.map_err(|e| {
            TaxoMatchError::EmbeddingError(format!("Failed to parse response: {e}"))
        })?;

        if result.data.len() != texts.len() {
            return Err(TaxoMatchError::EmbeddingError(format!(
                "OpenAI returned {} embeddings for {} inputs",
                result.data.len(),
                texts.len()
            )));
        }

        result.data.sort_by_key(|d| d.index);
        Ok(result.data.into_iter().map(|d| d.embedding).collect())
    }

    /// Generate embedding using Ollama API
    async fn generate_ollama(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            embedding: Vec<f32>,
        }

        let url = self.url("api/embeddings")?;
        debug!("Calling Ollama embeddings API: {}", url);

        let response = self
            .client
            .post(url)
            .json(&OllamaRequest {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| TaxoMatchError::HttpError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TaxoMatchError::EmbeddingError(format!(
                "Ollama API error ({status}): {error_text}"
            )));
        }

        let result: OllamaResponse = response.json().await.map_err(|e| {
            TaxoMatchError::EmbeddingError(format!("Failed to parse response: {e}"))
        })?;

        Ok(result.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parses_lowercase() {
        let provider: EmbeddingProvider = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(provider, EmbeddingProvider::OpenAI);
        assert_eq!(EmbeddingProvider::default(), EmbeddingProvider::Hash);
        assert!(EmbeddingProvider::Ollama.is_remote());
        assert!(!EmbeddingProvider::Neural.is_remote());
    }

    #[test]
    fn test_local_provider_rejected_by_http_client() {
        let result = EmbeddingClient::new(
            EmbeddingProvider::Hash,
            "hash-tfidf-v1".to_string(),
            "http://localhost:11434",
            None,
        );
        assert!(matches!(result, Err(TaxoMatchError::ConfigError(_))));
    }

    #[test]
    fn test_endpoint_join_keeps_base_path() {
        let client = EmbeddingClient::new(
            EmbeddingProvider::OpenAI,
            "text-embedding-3-small".to_string(),
            "https://api.openai.com/v1",
            Some("key".to_string()),
        )
        .unwrap();
        assert_eq!(
            client.url("embeddings").unwrap().as_str(),
            "https://api.openai.com/v1/embeddings"
        );
    }

    #[tokio::test]
    #[ignore = "Requires a running Ollama instance"]
    async fn test_ollama_embedding() {
        let client = EmbeddingClient::new(
            EmbeddingProvider::Ollama,
            "nomic-embed-text".to_string(),
            "http://localhost:11434",
            None,
        )
        .unwrap();

        let embeddings = client
            .generate_batch(&["Brake pads".to_string()])
            .await
            .unwrap();
        assert_eq!(embeddings.len(), 1);
        assert!(!embeddings[0].is_empty());
    }
}
