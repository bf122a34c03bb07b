//! Search index facade
//!
//! Ties the pipeline together for one named index:
//! optimize → map → build request → backend → security → materialize.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::backend::SearchBackend;
use crate::error::Result;
use crate::execution::{SearchRequest, build_request};
use crate::fields::DefaultFieldNameTranslator;
use crate::translators::FieldQueryTranslatorMap;
use crate::mapper::{CompiledQuery, IndexParameters, QueryMapper};
use crate::node::QueryNode;
use crate::optimize::optimize;
use crate::results::{
    AllowAll, DefaultFacetProcessor, FacetProcessor, ProcessedResults, QueryOutput, SecurityCheck,
    apply_scalar_method,
};
use crate::settings::SearchSettings;

/// A queryable index backed by a [`SearchBackend`]
///
/// # Example
///
/// ```ignore
/// let index = SearchIndex::new("sitecore_web_index", SearchSettings::default(), backend)
///     .with_culture("da-DK");
///
/// let node = queryable("items").where_(eq(field("template"), constant("page"))).count();
/// let count = index.execute::<serde_json::Value>(&node)?.as_count();
/// ```
pub struct SearchIndex {
    name: String,
    settings: SearchSettings,
    backend: Arc<dyn SearchBackend>,
    mapper: QueryMapper,
    security: Arc<dyn SecurityCheck>,
    facet_processor: Arc<dyn FacetProcessor>,
    /// Culture the caller searches in; documents in other languages are filtered out.
    culture: String,
}

impl SearchIndex {
    pub fn new(name: impl Into<String>, settings: SearchSettings, backend: Arc<dyn SearchBackend>) -> Self {
        let names = DefaultFieldNameTranslator::new(settings.field_name_formats.clone());
        let parameters = IndexParameters::default().with_field_name_translator(Arc::new(names));
        Self {
            name: name.into(),
            culture: settings.default_language.clone(),
            settings,
            backend,
            mapper: QueryMapper::new(parameters),
            security: Arc::new(AllowAll),
            facet_processor: Arc::new(DefaultFacetProcessor),
        }
    }

    /// Replace the mapping parameters wholesale. This also replaces the field
    /// name translator built from `settings.field_name_formats`; use
    /// [`SearchIndex::with_translators`] to keep it.
    pub fn with_parameters(mut self, parameters: IndexParameters) -> Self {
        self.mapper = QueryMapper::new(parameters);
        self
    }

    /// Register virtual field translators, keeping the other parameters.
    pub fn with_translators(self, translators: FieldQueryTranslatorMap) -> Self {
        let parameters = self.mapper.parameters().clone().with_translators(translators);
        self.with_parameters(parameters)
    }

    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    pub fn with_security(mut self, security: Arc<dyn SecurityCheck>) -> Self {
        self.security = security;
        self
    }

    pub fn with_facet_processor(mut self, processor: Arc<dyn FacetProcessor>) -> Self {
        self.facet_processor = processor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn parameters(&self) -> &IndexParameters {
        self.mapper.parameters()
    }

    /// Optimize and map a tree.
    pub fn compile(&self, node: &QueryNode) -> Result<CompiledQuery> {
        let optimized = optimize(node);
        log::trace!("optimized query: {optimized}");
        let compiled = self.mapper.map_query(&optimized)?;
        log::debug!("compiled query: {compiled}");
        Ok(compiled)
    }

    pub fn request_for(&self, compiled: &CompiledQuery) -> SearchRequest {
        build_request(compiled, &self.settings, &self.culture)
    }

    /// Compile and run a tree ending in an output directive (`Count`,
    /// `First`, `GetResults`, ...).
    pub fn execute<T: DeserializeOwned>(&self, node: &QueryNode) -> Result<QueryOutput<T>> {
        let compiled = self.compile(node)?;
        self.execute_compiled(&compiled)
    }

    pub fn execute_compiled<T: DeserializeOwned>(&self, compiled: &CompiledQuery) -> Result<QueryOutput<T>> {
        let names = self.parameters().field_name_translator.clone();
        let processed = ProcessedResults::new(self.run(compiled)?, compiled, names.as_ref(), self.security_check());
        apply_scalar_method(&processed, self.facet_processor.as_ref())
    }

    /// Run a tree and map every returned hit, ignoring output directives.
    pub fn find_elements<T: DeserializeOwned>(&self, node: &QueryNode) -> Result<Vec<T>> {
        let compiled = self.compile(node)?;
        let names = self.parameters().field_name_translator.clone();
        let processed = ProcessedResults::new(self.run(&compiled)?, &compiled, names.as_ref(), self.security_check());
        processed.search_results()
    }

    /// Parse notation text, then [`execute`](Self::execute) it.
    pub fn query<T: DeserializeOwned>(&self, text: &str) -> Result<QueryOutput<T>> {
        let node = crate::notation::parse(text)?;
        self.execute(&node)
    }

    fn run(&self, compiled: &CompiledQuery) -> Result<crate::backend::RawResults> {
        let request = self.request_for(compiled);
        log::debug!("search {}: {}", self.name, request.to_body());
        let raw = self.backend.search(&self.name, &request).inspect_err(|e| {
            log::error!("search on '{}' failed: {e}", self.name);
        })?;
        log::debug!("search {} returned {} of {} hits", self.name, raw.hits.len(), raw.total);
        Ok(raw)
    }

    fn security_check(&self) -> Option<&dyn SecurityCheck> {
        self.settings.security_checks.then_some(self.security.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::fields::FieldNameTranslator;
    use crate::translators::AliasFieldTranslator;
    use crate::node::build::*;
    use serde_json::{Value as Json, json};

    fn backend() -> Arc<InMemoryBackend> {
        let docs = [
            json!({ "_uniqueid": "1", "title": "Home", "_language": "en" }),
            json!({ "_uniqueid": "2", "title": "About", "_language": "en" }),
            json!({ "_uniqueid": "3", "title": "Om os", "_language": "da" }),
        ];
        Arc::new(InMemoryBackend::new().with_documents(
            "web",
            docs.into_iter().map(|d| serde_json::from_value(d).unwrap()),
        ))
    }

    #[test]
    fn culture_filter_applies_to_other_languages() {
        let backend = backend();
        let index = SearchIndex::new("web", SearchSettings::default(), backend.clone()).with_culture("da");
        let out = index.execute::<Json>(&queryable("items").count()).unwrap();
        assert_eq!(out.as_count(), Some(1));
        assert!(backend.last_request().unwrap().filter.is_some());
    }

    #[test]
    fn regional_cultures_match_their_language() {
        let backend = backend();
        let index = SearchIndex::new("web", SearchSettings::default(), backend.clone()).with_culture("en-US");
        let out = index.execute::<Json>(&queryable("items").count()).unwrap();
        assert_eq!(out.as_count(), Some(3));
        assert_eq!(backend.last_request().unwrap().filter, None);

        let index = SearchIndex::new("web", SearchSettings::default(), backend.clone()).with_culture("da-DK");
        let out = index.execute::<Json>(&queryable("items").count()).unwrap();
        assert_eq!(out.as_count(), Some(1));
        assert_eq!(
            backend.last_request().unwrap().filter,
            Some(crate::query::EsQuery::term("_language", "da"))
        );
    }

    #[test]
    fn translators_keep_configured_field_formats() {
        let settings = SearchSettings {
            field_name_formats: vec!["{0}_t".to_string()],
            ..SearchSettings::default()
        };
        let mut translators = FieldQueryTranslatorMap::new();
        translators.register("headline", Arc::new(AliasFieldTranslator::new("headline", "title")));
        let index = SearchIndex::new("web", settings, backend()).with_translators(translators);

        let names = &index.parameters().field_name_translator;
        assert_eq!(names.strip_known_extensions("title_t"), "title");
        assert!(index.parameters().field_query_translators.get_translator("headline").is_some());
    }

    #[test]
    fn backend_errors_propagate() {
        let backend = Arc::new(InMemoryBackend::new().offline());
        let index = SearchIndex::new("web", SearchSettings::default(), backend);
        let err = index.execute::<Json>(&queryable("items").any()).unwrap_err();
        assert!(matches!(err, crate::error::SearchError::Backend(_)));
    }

    #[test]
    fn query_accepts_notation() {
        let index = SearchIndex::new("web", SearchSettings::default(), backend());
        let out = index
            .query::<Json>(r#"any(queryable("items"), eq(field("title"), "About"))"#)
            .unwrap();
        assert_eq!(out.as_bool(), Some(true));
    }
}
