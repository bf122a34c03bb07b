//! Elasticsearch over HTTP (feature `http`)

use std::time::Duration;

use serde_json::Value as Json;

use super::{BackendError, RawResults, SearchBackend, parse_search_response};
use crate::execution::SearchRequest;

/// Blocking client posting to `{url}/{index}/_search`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    url: String,
    client: reqwest::blocking::Client,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl SearchBackend for HttpBackend {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<RawResults, BackendError> {
        let endpoint = format!("{}/{}/_search", self.url, index);
        let resp = self
            .client
            .post(&endpoint)
            .json(&request.to_body())
            .send()
            .map_err(|e| BackendError::Connection(format!("{endpoint}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let json: Json = resp
            .json()
            .map_err(|e| BackendError::Parse(e.to_string()))?;
        parse_search_response(&json, request)
    }
}
