//! Search backends
//!
//! A backend runs a [`SearchRequest`] against a named index and reports raw
//! hits, the total match count and facet buckets. Connection and protocol
//! failures are errors; zero hits is a normal result.

mod memory;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::HttpBackend;
pub use memory::InMemoryBackend;

use indexmap::IndexMap;
use serde_json::Value as Json;
use thiserror::Error;

use crate::Document;
use crate::execution::{FacetRequest, SearchRequest};

pub trait SearchBackend: Send + Sync {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<RawResults, BackendError>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("could not reach search backend: {0}")]
    Connection(String),
    #[error("search backend rejected the query ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("unreadable search response: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub document: Document,
    pub score: Option<f32>,
}

impl RawHit {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            score: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetBucket {
    pub key: String,
    pub doc_count: u64,
    /// Buckets of the next pivot field within this one.
    pub children: Vec<FacetBucket>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResults {
    pub hits: Vec<RawHit>,
    /// Matches reported by the backend, before paging.
    pub total: u64,
    /// Buckets per facet request name.
    pub facets: IndexMap<String, Vec<FacetBucket>>,
}

/// Read an Elasticsearch search response.
pub fn parse_search_response(response: &Json, request: &SearchRequest) -> Result<RawResults, BackendError> {
    let hits_obj = response
        .get("hits")
        .ok_or_else(|| BackendError::Parse("response has no 'hits'".to_string()))?;

    // `total` is a bare number on old servers and `{ "value": n }` on new ones.
    let total = match hits_obj.get("total") {
        Some(Json::Number(n)) => n.as_u64(),
        Some(obj) => obj.get("value").and_then(Json::as_u64),
        None => None,
    }
    .ok_or_else(|| BackendError::Parse("response has no hit total".to_string()))?;

    let mut hits = Vec::new();
    if let Some(items) = hits_obj.get("hits").and_then(Json::as_array) {
        for item in items {
            let document = match item.get("_source").or_else(|| item.get("fields")) {
                Some(Json::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                Some(_) => return Err(BackendError::Parse("hit source is not an object".to_string())),
                None => Document::new(),
            };
            let score = item.get("_score").and_then(Json::as_f64).map(|s| s as f32);
            hits.push(RawHit { document, score });
        }
    }

    let mut facets = IndexMap::new();
    if let Some(aggs) = response.get("aggregations") {
        for facet in &request.facets {
            if let Some(agg) = aggs.get(&facet.name) {
                facets.insert(facet.name.clone(), parse_buckets(agg, facet, 1));
            }
        }
    }

    Ok(RawResults { hits, total, facets })
}

fn parse_buckets(agg: &Json, facet: &FacetRequest, depth: usize) -> Vec<FacetBucket> {
    let Some(buckets) = agg.get("buckets").and_then(Json::as_array) else {
        return Vec::new();
    };
    buckets
        .iter()
        .map(|bucket| {
            let key = match bucket.get("key") {
                Some(Json::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let children = facet
                .fields
                .get(depth)
                .and_then(|next| bucket.get(next))
                .map(|sub| parse_buckets(sub, facet, depth + 1))
                .unwrap_or_default();
            FacetBucket {
                key,
                doc_count: bucket.get("doc_count").and_then(Json::as_u64).unwrap_or(0),
                children,
            }
        })
        .collect()
}
