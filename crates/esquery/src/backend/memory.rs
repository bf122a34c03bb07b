//! In-process backend over plain documents
//!
//! Evaluates compiled queries the way an analyzed index would answer them
//! closely enough for tests and demos: exact terms, numeric-aware ranges,
//! case-insensitive wildcard/prefix/fuzzy matching, terms facets, sorting
//! and paging. Every document scores 1.0.

use std::cmp::Ordering;
use std::sync::Mutex;

use indexmap::IndexMap;
use serde_json::Value as Json;

use super::{BackendError, FacetBucket, RawHit, RawResults, SearchBackend};
use crate::Document;
use crate::execution::{FacetRequest, SearchRequest};
use crate::node::SortDirection;
use crate::query::{BoolQuery, EsQuery, RangeQuery, max_edits};

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    indexes: IndexMap<String, Vec<Document>>,
    offline: bool,
    last_request: Mutex<Option<SearchRequest>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, index: &str, document: Document) {
        self.indexes.entry(index.to_string()).or_default().push(document);
    }

    pub fn with_documents(mut self, index: &str, documents: impl IntoIterator<Item = Document>) -> Self {
        for doc in documents {
            self.add_document(index, doc);
        }
        self
    }

    /// Fail every search with a connection error.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// The most recent request this backend received.
    pub fn last_request(&self) -> Option<SearchRequest> {
        self.last_request.lock().ok().and_then(|guard| guard.clone())
    }
}

impl SearchBackend for InMemoryBackend {
    fn search(&self, index: &str, request: &SearchRequest) -> Result<RawResults, BackendError> {
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        if self.offline {
            return Err(BackendError::Connection(format!("index '{index}' is offline")));
        }

        let documents = self.indexes.get(index).map(Vec::as_slice).unwrap_or_default();
        let mut matched: Vec<&Document> = documents
            .iter()
            .filter(|doc| matches(&request.query, doc))
            .filter(|doc| request.filter.as_ref().is_none_or(|f| matches(f, doc)))
            .collect();

        let total = matched.len() as u64;
        let facets = request
            .facets
            .iter()
            .map(|facet| (facet.name.clone(), facet_buckets(&matched, facet, 0)))
            .collect();

        if !request.sort.is_empty() {
            matched.sort_by(|a, b| {
                for key in &request.sort {
                    let ord = compare_field(a, b, &key.field, key.direction);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let hits = matched
            .into_iter()
            .skip(request.from.unwrap_or(0))
            .take(request.size)
            .map(|doc| RawHit {
                document: project(doc, &request.fields),
                score: Some(1.0),
            })
            .collect();

        Ok(RawResults { hits, total, facets })
    }
}

// ============ Query evaluation ============

fn matches(query: &EsQuery, doc: &Document) -> bool {
    match query {
        EsQuery::MatchAll => true,
        EsQuery::MatchNone => false,
        EsQuery::Term { field, value, .. } => field_values(doc, field).iter().any(|v| v == value),
        EsQuery::Range(range) => field_values(doc, &range.field).iter().any(|v| in_range(v, range)),
        EsQuery::Wildcard { field, pattern, .. } => {
            let pattern = pattern.to_lowercase();
            field_values(doc, field)
                .iter()
                .any(|v| wildcard_match(&pattern, &v.to_lowercase()))
        }
        EsQuery::Prefix { field, value, .. } => {
            let prefix = value.to_lowercase();
            field_values(doc, field)
                .iter()
                .any(|v| v.to_lowercase().starts_with(&prefix))
        }
        EsQuery::Fuzzy {
            field,
            value,
            min_similarity,
            ..
        } => {
            let target = value.to_lowercase();
            let allowed = max_edits(*min_similarity, target.chars().count());
            field_values(doc, field)
                .iter()
                .any(|v| edit_distance(&v.to_lowercase(), &target) <= allowed)
        }
        EsQuery::Missing { field } => field_values(doc, field).iter().all(|v| v.is_empty()),
        EsQuery::Bool(b) => matches_bool(b, doc),
    }
}

fn matches_bool(b: &BoolQuery, doc: &Document) -> bool {
    if !b.must.iter().all(|q| matches(q, doc)) {
        return false;
    }
    if b.must_not.iter().any(|q| matches(q, doc)) {
        return false;
    }
    // Without must clauses at least one should clause has to hold.
    b.should.is_empty() || !b.must.is_empty() || b.should.iter().any(|q| matches(q, doc))
}

fn in_range(value: &str, range: &RangeQuery) -> bool {
    let lower_ok = range.from.as_deref().is_none_or(|from| match compare_values(value, from) {
        Ordering::Greater => true,
        Ordering::Equal => range.include_lower,
        Ordering::Less => false,
    });
    let upper_ok = range.to.as_deref().is_none_or(|to| match compare_values(value, to) {
        Ordering::Less => true,
        Ordering::Equal => range.include_upper,
        Ordering::Greater => false,
    });
    lower_ok && upper_ok
}

/// Numeric when both sides parse as numbers, lexicographic otherwise.
fn compare_values(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Documents without the field sort last in either direction.
fn compare_field(a: &Document, b: &Document, field: &str, direction: SortDirection) -> Ordering {
    let a = field_values(a, field).into_iter().next();
    let b = field_values(b, field).into_iter().next();
    match (a, b) {
        (Some(x), Some(y)) => match direction {
            SortDirection::Ascending => compare_values(&x, &y),
            SortDirection::Descending => compare_values(&y, &x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// String forms of a document field; arrays contribute each element.
fn field_values(doc: &Document, field: &str) -> Vec<String> {
    match doc.get(field) {
        None | Some(Json::Null) => Vec::new(),
        Some(Json::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        Some(value) => scalar_string(value).into_iter().collect(),
    }
}

fn scalar_string(value: &Json) -> Option<String> {
    match value {
        Json::String(s) => Some(s.clone()),
        Json::Bool(b) => Some(b.to_string()),
        Json::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `*` matches any run, `?` any single character.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            row[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1);
        }
        prev = row;
    }
    prev[b.len()]
}

// ============ Facets and projection ============

fn facet_buckets(docs: &[&Document], facet: &FacetRequest, depth: usize) -> Vec<FacetBucket> {
    let Some(field) = facet.fields.get(depth) else {
        return Vec::new();
    };
    let mut groups: IndexMap<String, Vec<&Document>> = IndexMap::new();
    for &doc in docs {
        for value in field_values(doc, field) {
            groups.entry(value).or_default().push(doc);
        }
    }
    let min_count = u64::from(facet.min_count.unwrap_or(1));
    let mut buckets: Vec<FacetBucket> = groups
        .into_iter()
        .filter(|(_, members)| members.len() as u64 >= min_count)
        .map(|(key, members)| FacetBucket {
            key,
            doc_count: members.len() as u64,
            children: facet_buckets(&members, facet, depth + 1),
        })
        .collect();
    buckets.sort_by(|a, b| b.doc_count.cmp(&a.doc_count).then_with(|| a.key.cmp(&b.key)));
    buckets
}

fn project(doc: &Document, fields: &[String]) -> Document {
    if fields.is_empty() {
        return doc.clone();
    }
    doc.iter()
        .filter(|(key, _)| fields.iter().any(|f| f.eq_ignore_ascii_case(key)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::SortField;
    use serde_json::json;

    fn doc(value: Json) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn request(query: EsQuery) -> SearchRequest {
        SearchRequest {
            query,
            filter: None,
            fields: Vec::new(),
            sort: Vec::new(),
            from: None,
            size: 100,
            facets: Vec::new(),
        }
    }

    fn backend() -> InMemoryBackend {
        InMemoryBackend::new().with_documents(
            "items",
            [
                doc(json!({ "title": "Red Shoes", "price": 5, "color": "red" })),
                doc(json!({ "title": "Blue Shoes", "price": 15, "color": "blue" })),
                doc(json!({ "title": "Red Hat", "price": 25, "color": "red", "summary": "" })),
            ],
        )
    }

    #[test]
    fn ranges_compare_numerically() {
        let query = EsQuery::Range(RangeQuery {
            field: "price".into(),
            from: Some("10".into()),
            ..Default::default()
        });
        let raw = backend().search("items", &request(query)).unwrap();
        assert_eq!(raw.total, 2);
    }

    #[test]
    fn wildcards_ignore_case() {
        let raw = backend()
            .search("items", &request(EsQuery::wildcard("title", "*shoes*")))
            .unwrap();
        assert_eq!(raw.total, 2);
        assert!(wildcard_match("r?d*", "red hat"));
        assert!(!wildcard_match("*x", "red"));
    }

    #[test]
    fn missing_covers_absent_and_empty() {
        let raw = backend()
            .search("items", &request(EsQuery::Missing { field: "summary".into() }))
            .unwrap();
        assert_eq!(raw.total, 3);
    }

    #[test]
    fn paging_after_sort_keeps_total() {
        let mut req = request(EsQuery::MatchAll);
        req.sort = vec![SortField {
            field: "price".into(),
            direction: SortDirection::Descending,
        }];
        req.from = Some(1);
        req.size = 1;
        let raw = backend().search("items", &req).unwrap();
        assert_eq!(raw.total, 3);
        assert_eq!(raw.hits.len(), 1);
        assert_eq!(raw.hits[0].document["price"], json!(15));
    }

    #[test]
    fn facets_count_matched_documents() {
        let mut req = request(EsQuery::MatchAll);
        req.facets = vec![FacetRequest {
            name: "color".into(),
            fields: vec!["color".into()],
            min_count: None,
        }];
        let raw = backend().search("items", &req).unwrap();
        let buckets = &raw.facets["color"];
        assert_eq!(buckets[0].key, "red");
        assert_eq!(buckets[0].doc_count, 2);
    }

    #[test]
    fn fuzzy_allows_small_edits() {
        let query = EsQuery::Fuzzy {
            field: "color".into(),
            value: "rad".into(),
            min_similarity: 0.5,
            boost: 1.0,
        };
        let raw = backend().search("items", &request(query)).unwrap();
        assert_eq!(raw.total, 2);
    }

    #[test]
    fn offline_backend_reports_connection_error() {
        let err = backend().offline().search("items", &request(EsQuery::MatchAll)).unwrap_err();
        assert!(matches!(err, BackendError::Connection(_)));
    }
}
