//! esquery - LINQ-style query trees to Elasticsearch
//!
//! Translates a declarative query tree into an Elasticsearch query plus
//! execution directives, runs it against a backend and materializes typed
//! results.
//!
//! ## Quick Start
//!
//! ```ignore
//! use esquery::build::*;
//! use esquery::{InMemoryBackend, SearchIndex, SearchSettings, SortDirection};
//!
//! let index = SearchIndex::new("web", SearchSettings::default(), Arc::new(backend));
//!
//! let node = queryable("items")
//!     .where_(gt(typed_field("price", ValueType::Int), constant(10)))
//!     .order_by("price", SortDirection::Descending)
//!     .take(20)
//!     .get_results();
//!
//! let results = index.execute::<Product>(&node)?.into_results();
//! ```
//!
//! ## Pipeline
//!
//! - [`optimize`]: constant folding, boost propagation, predicate merging
//! - [`QueryMapper`]: tree → [`EsQuery`] plus directives ([`CompiledQuery`])
//! - [`build_request`]: directives → paging, sort, stored fields, facets
//! - [`SearchBackend`]: runs the request ([`InMemoryBackend`], `HttpBackend`)
//! - [`results`]: security filtering, document mapping, scalar reduction
//!
//! ## Virtual fields
//!
//! Field keys registered in a [`FieldQueryTranslatorMap`] are rewritten into
//! comparisons on real index fields, and get to post-process each returned
//! document:
//!
//! ```ignore
//! let mut translators = FieldQueryTranslatorMap::new();
//! translators.register("headline", Arc::new(AliasFieldTranslator::new("headline", "title")));
//! let index = index.with_translators(translators);
//! ```

pub mod backend;
mod error;
mod execution;
mod fields;
mod index;
mod mapper;
mod methods;
mod node;
pub mod notation;
mod optimize;
mod query;
pub mod results;
mod settings;
mod translators;

/// A stored document: field name to value, in index order.
pub type Document = indexmap::IndexMap<String, serde_json::Value>;

// ============ Primary Public API ============

pub use error::{Result, SearchError};
pub use index::SearchIndex;
pub use settings::{SearchSettings, language_code};

// ============ Query Trees ============

pub use node::build;
pub use node::{
    AggregateNode, AggregateOp, BetweenNode, BinaryNode, ConstantNode, FacetNode, FieldNode, Inclusion,
    LikeNode, QueryNode, SortDirection, Value, ValueType,
};
pub use optimize::optimize;

// ============ Translation ============

pub use fields::{
    DefaultFieldNameTranslator, DefaultValueFormatter, FieldNameTranslator, IndexValueFormatter,
    format_field_name, normalize_id,
};
pub use mapper::{CompiledQuery, IndexParameters, QueryMapper};
pub use methods::{ComparisonType, FacetQuery, QueryMethod};
pub use query::{BoolQuery, EsQuery, RangeQuery};
pub use translators::{
    AliasFieldTranslator, FieldComparison, FieldQueryResult, FieldQueryTranslator, FieldQueryTranslatorMap,
};

// ============ Execution ============

#[cfg(feature = "http")]
pub use backend::HttpBackend;
pub use backend::{BackendError, InMemoryBackend, RawResults, SearchBackend};
pub use execution::{FacetRequest, SearchRequest, SortField, build_request};
pub use results::{
    AllowAll, DefaultFacetProcessor, FacetProcessor, FacetResults, QueryOutput, SearchHit, SearchResults,
    SecurityCheck,
};
