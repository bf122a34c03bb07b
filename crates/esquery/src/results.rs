//! Result materialization
//!
//! Raw hits are security-filtered first, then post-processed by the virtual
//! field translators that took part in the query, then deserialized into the
//! caller's type. The scalar directive recorded during mapping decides what
//! shape comes back (see [`apply_scalar_method`]).

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as Json};

use crate::Document;
use crate::backend::{FacetBucket, RawHit, RawResults};
use crate::error::{Result, SearchError};
use crate::execution::{DATASOURCE_FIELD, SCORE_FIELD, UNIQUE_ID_FIELD};
use crate::fields::FieldNameTranslator;
use crate::mapper::CompiledQuery;
use crate::methods::{FacetQuery, QueryMethod};

// ============ Collaborators ============

/// Decides whether a stored item may be shown to the current caller.
pub trait SecurityCheck: Send + Sync {
    fn is_visible(&self, unique_id: &str, datasource: Option<&str>) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl SecurityCheck for AllowAll {
    fn is_visible(&self, _unique_id: &str, _datasource: Option<&str>) -> bool {
        true
    }
}

/// Turns raw facet buckets into categorized counts.
pub trait FacetProcessor: Send + Sync {
    fn process(
        &self,
        raw: &IndexMap<String, Vec<FacetBucket>>,
        queries: &[FacetQuery],
        names: &dyn FieldNameTranslator,
    ) -> FacetResults;
}

// ============ Output types ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetValue {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetCategory {
    pub name: String,
    pub values: Vec<FacetValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FacetResults {
    pub categories: Vec<FacetCategory>,
}

impl FacetResults {
    pub fn category(&self, name: &str) -> Option<&FacetCategory> {
        self.categories.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit<T> {
    pub score: f32,
    pub item: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResults<T> {
    pub hits: Vec<SearchHit<T>>,
    /// Matches after security filtering, before paging.
    pub total: u64,
    pub facets: FacetResults,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum QueryOutput<T> {
    Bool(bool),
    Count(u64),
    /// `None` only for the `OrDefault` variants.
    Element(Option<T>),
    Results(SearchResults<T>),
    Facets(FacetResults),
}

impl<T> QueryOutput<T> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            QueryOutput::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            QueryOutput::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn into_element(self) -> Option<T> {
        match self {
            QueryOutput::Element(item) => item,
            _ => None,
        }
    }

    pub fn into_results(self) -> Option<SearchResults<T>> {
        match self {
            QueryOutput::Results(results) => Some(results),
            _ => None,
        }
    }

    pub fn into_facets(self) -> Option<FacetResults> {
        match self {
            QueryOutput::Facets(facets) => Some(facets),
            QueryOutput::Results(results) => Some(results.facets),
            _ => None,
        }
    }
}

// ============ Security ============

/// Drop hits the check rejects and lower the total by the same amount.
/// Hits without a stored identity are kept.
pub fn apply_security(mut raw: RawResults, check: &dyn SecurityCheck) -> RawResults {
    let before = raw.hits.len();
    raw.hits.retain(|hit| {
        let Some(unique_id) = hit.document.get(UNIQUE_ID_FIELD).and_then(Json::as_str) else {
            return true;
        };
        let datasource = hit.document.get(DATASOURCE_FIELD).and_then(Json::as_str);
        check.is_visible(unique_id, datasource)
    });
    let removed = before - raw.hits.len();
    if removed > 0 {
        log::debug!("security check removed {removed} of {before} hits");
    }
    raw.total = raw.total.saturating_sub(removed as u64);
    raw
}

// ============ Processed results ============

/// Security-filtered hits plus what is needed to map them.
pub struct ProcessedResults<'a> {
    hits: Vec<RawHit>,
    total: u64,
    facets: IndexMap<String, Vec<FacetBucket>>,
    compiled: &'a CompiledQuery,
    names: &'a dyn FieldNameTranslator,
}

impl<'a> ProcessedResults<'a> {
    /// `security` is `None` when checks are disabled.
    pub fn new(
        raw: RawResults,
        compiled: &'a CompiledQuery,
        names: &'a dyn FieldNameTranslator,
        security: Option<&dyn SecurityCheck>,
    ) -> Self {
        let raw = match security {
            Some(check) => apply_security(raw, check),
            None => raw,
        };
        Self {
            hits: raw.hits,
            total: raw.total,
            facets: raw.facets,
            compiled,
            names,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn raw_facets(&self) -> &IndexMap<String, Vec<FacetBucket>> {
        &self.facets
    }

    pub fn any(&self) -> bool {
        self.total > 0
    }

    pub fn element_at<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let hit = self.hits.get(index).ok_or(SearchError::IndexOutOfRange {
            index,
            len: self.hits.len(),
        })?;
        self.map(&hit.document)
    }

    pub fn element_at_or_default<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>> {
        self.hits.get(index).map(|hit| self.map(&hit.document)).transpose()
    }

    pub fn first<T: DeserializeOwned>(&self) -> Result<T> {
        self.first_or_default()?.ok_or(SearchError::NoElements)
    }

    pub fn first_or_default<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.hits.first().map(|hit| self.map(&hit.document)).transpose()
    }

    pub fn last<T: DeserializeOwned>(&self) -> Result<T> {
        self.last_or_default()?.ok_or(SearchError::NoElements)
    }

    pub fn last_or_default<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.hits.last().map(|hit| self.map(&hit.document)).transpose()
    }

    pub fn single<T: DeserializeOwned>(&self) -> Result<T> {
        match (self.total, self.hits.first()) {
            (0, _) | (_, None) => Err(SearchError::NoElements),
            (1, Some(hit)) => self.map(&hit.document),
            _ => Err(SearchError::MoreThanOneElement),
        }
    }

    /// Default unless exactly one document matched.
    pub fn single_or_default<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match (self.total, self.hits.first()) {
            (1, Some(hit)) => self.map(&hit.document).map(Some),
            _ => Ok(None),
        }
    }

    pub fn search_hits<T: DeserializeOwned>(&self) -> Result<Vec<SearchHit<T>>> {
        self.hits
            .iter()
            .map(|hit| {
                let score = hit
                    .score
                    .or_else(|| hit.document.get(SCORE_FIELD).and_then(Json::as_f64).map(|s| s as f32))
                    .unwrap_or(-1.0);
                Ok(SearchHit {
                    score,
                    item: self.map(&hit.document)?,
                })
            })
            .collect()
    }

    pub fn search_results<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.hits.iter().map(|hit| self.map(&hit.document)).collect()
    }

    fn map<T: DeserializeOwned>(&self, document: &Document) -> Result<T> {
        map_document(
            document,
            self.compiled.single_select(),
            self.compiled,
            self.names,
        )
    }
}

/// Deserialize one document into `T`.
///
/// Translators engaged by the query rewrite the document first. Keys are
/// matched case-insensitively, each stored field may feed several property
/// names, and a lone `Select` restricts the fields that are read.
pub fn map_document<T: DeserializeOwned>(
    document: &Document,
    select: Option<&[String]>,
    compiled: &CompiledQuery,
    names: &dyn FieldNameTranslator,
) -> Result<T> {
    let document = compiled
        .virtual_field_processors
        .iter()
        .fold(document.clone(), |doc, processor| processor.translate_field_result(doc, names));

    let lowered: Document = document
        .into_iter()
        .map(|(key, value)| (key.to_lowercase(), value))
        .collect();

    let field_names: Vec<String> = match select {
        Some(selected) => {
            let selected: Vec<String> = selected.iter().map(|f| f.to_lowercase()).collect();
            lowered.keys().filter(|k| selected.contains(k)).cloned().collect()
        }
        None => lowered.keys().cloned().collect(),
    };

    let mut object = Map::new();
    for (field, properties) in names.map_document_fields(&field_names) {
        let Some(value) = lowered.get(&field) else {
            continue;
        };
        for property in properties {
            object.entry(property).or_insert_with(|| value.clone());
        }
    }
    Ok(serde_json::from_value(Json::Object(object))?)
}

/// Reduce processed results according to the first output directive.
pub fn apply_scalar_method<T: DeserializeOwned>(
    results: &ProcessedResults<'_>,
    facet_processor: &dyn FacetProcessor,
) -> Result<QueryOutput<T>> {
    let compiled = results.compiled;
    let Some(method) = compiled.methods.iter().find(|m| m.is_output()) else {
        return Err(SearchError::NoScalarMethod(
            compiled.methods.iter().map(|m| m.kind().to_string()).collect(),
        ));
    };

    Ok(match method {
        QueryMethod::All => QueryOutput::Bool(true),
        QueryMethod::Any => QueryOutput::Bool(results.any()),
        QueryMethod::Count { .. } => QueryOutput::Count(results.total()),
        QueryMethod::ElementAt {
            index,
            allow_default: false,
        } => QueryOutput::Element(Some(results.element_at(*index)?)),
        QueryMethod::ElementAt { index, .. } => QueryOutput::Element(results.element_at_or_default(*index)?),
        QueryMethod::First { allow_default: false } => QueryOutput::Element(Some(results.first()?)),
        QueryMethod::First { .. } => QueryOutput::Element(results.first_or_default()?),
        QueryMethod::Last { allow_default: false } => QueryOutput::Element(Some(results.last()?)),
        QueryMethod::Last { .. } => QueryOutput::Element(results.last_or_default()?),
        QueryMethod::Single { allow_default: false } => QueryOutput::Element(Some(results.single()?)),
        QueryMethod::Single { .. } => QueryOutput::Element(results.single_or_default()?),
        QueryMethod::GetResults => QueryOutput::Results(SearchResults {
            hits: results.search_hits()?,
            total: results.total(),
            facets: facet_processor.process(results.raw_facets(), &compiled.facet_queries, results.names),
        }),
        QueryMethod::GetFacets => QueryOutput::Facets(facet_processor.process(
            results.raw_facets(),
            &compiled.facet_queries,
            results.names,
        )),
        other => return Err(SearchError::NoScalarMethod(vec![other.kind().to_string()])),
    })
}

// ============ Facets ============

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFacetProcessor;

impl FacetProcessor for DefaultFacetProcessor {
    fn process(
        &self,
        raw: &IndexMap<String, Vec<FacetBucket>>,
        queries: &[FacetQuery],
        names: &dyn FieldNameTranslator,
    ) -> FacetResults {
        let mut categories = Vec::new();
        for query in queries {
            let key = query.key();
            let Some(buckets) = raw.get(&key) else {
                log::debug!("no facet buckets returned for '{key}'");
                continue;
            };

            let mut values = if query.is_pivot() {
                let mut flat = Vec::new();
                flatten_pivot(buckets, "", &mut flat);
                flat
            } else {
                buckets
                    .iter()
                    .map(|b| FacetValue {
                        name: b.key.clone(),
                        count: b.doc_count,
                    })
                    .collect()
            };

            if let Some(min) = query.min_count {
                values.retain(|v| v.count >= u64::from(min));
            }
            if let Some(allowed) = &query.filter_values
                && !allowed.is_empty()
            {
                values.retain(|v| allowed.contains(&v.name));
            }

            let name = if query.is_pivot() {
                names.strip_field_list(&query.field_names)
            } else {
                names.strip_known_extensions(&key)
            };
            categories.push(FacetCategory { name, values });
        }
        FacetResults { categories }
    }
}

/// Nested buckets become `parent/child` entries; top-level buckets only
/// name their children.
fn flatten_pivot(buckets: &[FacetBucket], parent: &str, out: &mut Vec<FacetValue>) {
    for bucket in buckets {
        if !parent.is_empty() {
            out.push(FacetValue {
                name: format!("{parent}/{}", bucket.key),
                count: bucket.doc_count,
            });
        }
        if !bucket.children.is_empty() {
            flatten_pivot(&bucket.children, &bucket.key, out);
        }
    }
}
