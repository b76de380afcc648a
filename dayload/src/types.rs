//! Common types for dayload

use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Body posted to the query endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest<'a> {
    pub query_key: &'a str,
    pub params: &'a Value,
}

/// Application-level envelope returned by the query endpoint
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryEnvelope {
    Success {
        #[serde(default)]
        data: Value,
    },
    Error {
        message: String,
    },
}

impl QueryEnvelope {
    pub fn into_result(self) -> Result<Value> {
        match self {
            Self::Success { data } => Ok(data),
            Self::Error { message } => Err(LoaderError::Server(message)),
        }
    }
}

/// Terminal status handed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Error,
    Aborted,
}

/// Caller-facing `{status, data | message}` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: FetchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status == FetchStatus::Success
    }
}

impl From<Result<Arc<Value>>> for FetchResponse {
    fn from(result: Result<Arc<Value>>) -> Self {
        match result {
            Ok(data) => Self {
                status: FetchStatus::Success,
                data: Some(Value::clone(&data)),
                message: None,
            },
            Err(LoaderError::Aborted) => Self {
                status: FetchStatus::Aborted,
                data: None,
                message: Some(LoaderError::Aborted.to_string()),
            },
            Err(e) => Self {
                status: FetchStatus::Error,
                data: None,
                message: Some(e.to_string()),
            },
        }
    }
}

/// Loader statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoaderStats {
    pub memory_hits: u64,
    pub store_hits: u64,
    pub misses: u64,
    pub dedup_joins: u64,
    pub network_calls: u64,
    pub retries: u64,
    pub failures: u64,
    pub aborts: u64,
    pub active_requests: usize,
    pub queued_requests: usize,
    pub in_flight: usize,
}

impl LoaderStats {
    /// Share of lookups served from either cache tier, in percent
    pub fn hit_rate(&self) -> f64 {
        let hits = self.memory_hits + self.store_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_shape() {
        let params = json!([1, "a"]);
        let body = serde_json::to_value(QueryRequest {
            query_key: "getX",
            params: &params,
        })
        .unwrap();
        assert_eq!(body, json!({"queryKey": "getX", "params": [1, "a"]}));
    }

    #[test]
    fn test_envelope_success() {
        let env: QueryEnvelope = serde_json::from_str(r#"{"status":"success","data":42}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), json!(42));
    }

    #[test]
    fn test_envelope_success_without_data() {
        let env: QueryEnvelope = serde_json::from_str(r#"{"status":"success"}"#).unwrap();
        assert_eq!(env.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_envelope_error() {
        let env: QueryEnvelope =
            serde_json::from_str(r#"{"status":"error","message":"bad sql"}"#).unwrap();
        assert_eq!(
            env.into_result().unwrap_err(),
            LoaderError::Server("bad sql".into())
        );
    }

    #[test]
    fn test_envelope_unknown_status_rejected() {
        assert!(serde_json::from_str::<QueryEnvelope>(r#"{"status":"pending"}"#).is_err());
    }

    #[test]
    fn test_fetch_response_serialization() {
        let ok = FetchResponse::from(Ok(Arc::new(json!({"n": 1}))));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "success", "data": {"n": 1}})
        );

        let aborted = FetchResponse::from(Err(LoaderError::Aborted));
        assert_eq!(aborted.status, FetchStatus::Aborted);

        let failed = FetchResponse::from(Err(LoaderError::Server("boom".into())));
        assert_eq!(failed.status, FetchStatus::Error);
        assert_eq!(failed.message.as_deref(), Some("Server error: boom"));
        assert!(!failed.is_success());
    }

    #[test]
    fn test_hit_rate() {
        let stats = LoaderStats {
            memory_hits: 2,
            store_hits: 1,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 75.0);
        assert_eq!(LoaderStats::default().hit_rate(), 0.0);
    }
}
