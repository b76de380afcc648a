//! Query backend
//!
//! The loader treats the query service as opaque: given a query name and its
//! parameters it yields a JSON value or an error. [`HttpBackend`] talks to the
//! service over HTTP:
//!
//! ```json
//! POST <endpoint>
//! { "queryKey": "getX", "params": [] }
//!
//! { "status": "success", "data": 42 }
//! { "status": "error", "message": "unknown query" }
//! ```

use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use crate::types::{QueryEnvelope, QueryRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Executes a single query. Timeouts, retries and cancellation are applied by
/// the caller.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    async fn execute(&self, query_key: &str, params: &Value) -> Result<Value>;
}

/// HTTP implementation of [`QueryBackend`]
#[derive(Clone)]
pub struct HttpBackend {
    http_client: Client,
    endpoint: Url,
}

impl HttpBackend {
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let http_client = Client::builder()
            .build()
            .map_err(|e| LoaderError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    /// Use a preconfigured reqwest client (proxies, TLS roots, default headers)
    pub fn with_client(config: &LoaderConfig, http_client: Client) -> Result<Self> {
        Ok(Self {
            http_client,
            endpoint: config.endpoint_url()?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl QueryBackend for HttpBackend {
    async fn execute(&self, query_key: &str, params: &Value) -> Result<Value> {
        let body = QueryRequest { query_key, params };
        debug!("POST {} query={}", self.endpoint, query_key);

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoaderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(LoaderError::InvalidResponse("empty body".to_string()));
        }

        let envelope: QueryEnvelope = serde_json::from_str(&text)?;
        envelope.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_creation() {
        let backend = HttpBackend::new(&LoaderConfig::new("http://localhost:8080")).unwrap();
        assert_eq!(backend.endpoint().as_str(), "http://localhost:8080/api/query");
    }

    #[test]
    fn test_backend_invalid_url() {
        let result = HttpBackend::new(&LoaderConfig::new("not-a-valid-url"));
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_relative_url() {
        let result = HttpBackend::new(&LoaderConfig::new("/relative/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_backend_with_client() {
        let client = Client::builder().build().unwrap();
        let backend =
            HttpBackend::with_client(&LoaderConfig::new("http://localhost:8080"), client).unwrap();
        assert_eq!(backend.endpoint().path(), "/api/query");
    }
}
