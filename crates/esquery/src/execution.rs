//! Search request construction
//!
//! Turns a [`CompiledQuery`] into the concrete request a backend runs:
//! paging from `Skip`/`Take`, sort from `OrderBy`, stored fields from
//! `Select`, facet aggregations, and the culture filter.

use serde_json::{Map, Value as Json, json};

use crate::mapper::CompiledQuery;
use crate::methods::{FacetQuery, QueryMethod};
use crate::node::SortDirection;
use crate::query::EsQuery;
use crate::settings::{SearchSettings, language_code};

/// Stored field carrying the item identity checked by security.
pub const UNIQUE_ID_FIELD: &str = "_uniqueid";
/// Stored field naming the item's data source.
pub const DATASOURCE_FIELD: &str = "_datasource";
pub const LANGUAGE_FIELD: &str = "_language";
pub const SCORE_FIELD: &str = "score";

#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FacetRequest {
    pub name: String,
    /// More than one field means a pivot: each field nests inside the previous.
    pub fields: Vec<String>,
    pub min_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: EsQuery,
    pub filter: Option<EsQuery>,
    /// Stored fields to return; empty means whole documents.
    pub fields: Vec<String>,
    pub sort: Vec<SortField>,
    pub from: Option<usize>,
    pub size: usize,
    pub facets: Vec<FacetRequest>,
}

/// Build the request for `compiled` in `culture`.
pub fn build_request(compiled: &CompiledQuery, settings: &SearchSettings, culture: &str) -> SearchRequest {
    let mut filter = compiled.filter.clone();
    if settings.needs_language_filter(culture) {
        let language = EsQuery::term(LANGUAGE_FIELD, language_code(culture));
        filter = Some(match filter {
            Some(existing) => existing.and(language),
            None => language,
        });
    }

    let methods = &compiled.methods;
    let mut fields: Vec<String> = Vec::new();
    let mut sort = Vec::new();
    let mut from = None;
    let mut take = None;

    for method in methods {
        match method {
            QueryMethod::Select { field_names } => {
                fields.extend(field_names.iter().map(|f| f.to_lowercase()));
            }
            QueryMethod::OrderBy {
                field, direction, ..
            } => sort.push(SortField {
                field: field.clone(),
                direction: *direction,
            }),
            QueryMethod::Skip { count } => *from.get_or_insert(0) += count,
            QueryMethod::Take { count } => *take.get_or_insert(0) += count,
            _ => {}
        }
    }

    if !fields.is_empty() && settings.security_checks {
        fields.push(UNIQUE_ID_FIELD.to_string());
        fields.push(DATASOURCE_FIELD.to_string());
    }
    if !fields.is_empty() && compiled.has_method("GetResults") {
        fields.push(SCORE_FIELD.to_string());
    }

    let lone_count_or_any = methods.len() == 1
        && matches!(methods[0], QueryMethod::Count { .. } | QueryMethod::Any);
    let size = if lone_count_or_any {
        0
    } else {
        take.unwrap_or(settings.max_results)
    };

    let wants_facets = compiled.has_method("GetFacets") || compiled.has_method("GetResults");
    let facets = if wants_facets {
        compiled.facet_queries.iter().filter_map(facet_request).collect()
    } else {
        if !compiled.facet_queries.is_empty() {
            log::warn!(
                "{} facet queries ignored: no GetFacets or GetResults directive",
                compiled.facet_queries.len()
            );
        }
        Vec::new()
    };

    SearchRequest {
        query: compiled.query.clone(),
        filter,
        fields,
        sort,
        from,
        size,
        facets,
    }
}

fn facet_request(facet: &FacetQuery) -> Option<FacetRequest> {
    if facet.field_names.is_empty() {
        return None;
    }
    Some(FacetRequest {
        name: facet.key(),
        fields: facet.field_names.clone(),
        min_count: facet.min_count,
    })
}

impl SearchRequest {
    /// Elasticsearch search body.
    pub fn to_body(&self) -> Json {
        let mut body = Map::new();
        let query = match &self.filter {
            Some(filter) => json!({
                "bool": { "must": [self.query.to_dsl()], "filter": [filter.to_dsl()] }
            }),
            None => self.query.to_dsl(),
        };
        body.insert("query".into(), query);
        if let Some(from) = self.from {
            body.insert("from".into(), json!(from));
        }
        body.insert("size".into(), json!(self.size));
        if !self.fields.is_empty() {
            body.insert("_source".into(), json!(self.fields));
        }
        if !self.sort.is_empty() {
            let sort: Vec<Json> = self
                .sort
                .iter()
                .map(|s| {
                    let order = match s.direction {
                        SortDirection::Ascending => "asc",
                        SortDirection::Descending => "desc",
                    };
                    json!({ s.field.clone(): { "order": order } })
                })
                .collect();
            body.insert("sort".into(), Json::Array(sort));
        }
        if !self.facets.is_empty() {
            let mut aggs = Map::new();
            for facet in &self.facets {
                aggs.insert(facet.name.clone(), terms_agg(&facet.fields, facet.min_count));
            }
            body.insert("aggs".into(), Json::Object(aggs));
        }
        Json::Object(body)
    }
}

/// Terms aggregation on `fields[0]`, with the rest nested under it by name.
fn terms_agg(fields: &[String], min_count: Option<u32>) -> Json {
    let Some((field, rest)) = fields.split_first() else {
        return json!({});
    };
    let mut terms = Map::new();
    terms.insert("field".into(), json!(field));
    if let Some(min) = min_count {
        terms.insert("min_doc_count".into(), json!(min));
    }
    let mut agg = Map::new();
    agg.insert("terms".into(), Json::Object(terms));
    if let Some(next) = rest.first() {
        agg.insert("aggs".into(), json!({ next.clone(): terms_agg(rest, min_count) }));
    }
    Json::Object(agg)
}
