//! Virtual field translators
//!
//! A virtual field is a logical field name with no literal backing in the
//! index. A translator registered under its (lowercase) name intercepts
//! comparisons on it and expands them into real field comparisons, and gets
//! a chance to rewrite result documents on the way back out.

use std::collections::HashMap;
use std::sync::Arc;

use crate::Document;
use crate::fields::FieldNameTranslator;
use crate::methods::{ComparisonType, QueryMethod};
use crate::node::Value;

/// One real-field comparison produced by a translator.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldComparison {
    pub field: String,
    pub value: Value,
    pub comparison: ComparisonType,
}

impl FieldComparison {
    pub fn new(field: impl Into<String>, value: impl Into<Value>, comparison: ComparisonType) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            comparison,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldQueryResult {
    pub field_comparisons: Vec<FieldComparison>,
    /// Extra directives merged into the mapper state.
    pub query_methods: Vec<QueryMethod>,
}

pub trait FieldQueryTranslator: Send + Sync {
    fn name(&self) -> &str;

    /// Expand a comparison on the virtual field. `None` means "not mine,
    /// compile normally".
    fn translate_field_query(
        &self,
        field_key: &str,
        value: Option<&str>,
        comparison: ComparisonType,
        names: &dyn FieldNameTranslator,
    ) -> Option<FieldQueryResult>;

    /// Post-process a result document. Identity by default.
    fn translate_field_result(&self, document: Document, _names: &dyn FieldNameTranslator) -> Document {
        document
    }
}

/// Closure signature accepted by [`FieldQueryTranslatorMap::register_fn`].
pub type TranslateFn = dyn Fn(&str, Option<&str>, ComparisonType, &dyn FieldNameTranslator) -> Option<FieldQueryResult>
    + Send
    + Sync
    + 'static;

struct FnTranslator {
    name: String,
    func: Box<TranslateFn>,
}

impl FieldQueryTranslator for FnTranslator {
    fn name(&self) -> &str {
        &self.name
    }

    fn translate_field_query(
        &self,
        field_key: &str,
        value: Option<&str>,
        comparison: ComparisonType,
        names: &dyn FieldNameTranslator,
    ) -> Option<FieldQueryResult> {
        (self.func)(field_key, value, comparison, names)
    }
}

/// Translators keyed by lowercase field name
#[derive(Default, Clone)]
pub struct FieldQueryTranslatorMap {
    translators: HashMap<String, Arc<dyn FieldQueryTranslator>>,
}

impl FieldQueryTranslatorMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, field_key: &str, translator: Arc<dyn FieldQueryTranslator>) {
        self.translators.insert(field_key.to_lowercase(), translator);
    }

    /// Register a closure as the translator for `field_key`.
    pub fn register_fn<F>(&mut self, field_key: &str, func: F)
    where
        F: Fn(&str, Option<&str>, ComparisonType, &dyn FieldNameTranslator) -> Option<FieldQueryResult>
            + Send
            + Sync
            + 'static,
    {
        let translator = FnTranslator {
            name: field_key.to_lowercase(),
            func: Box::new(func),
        };
        self.register(field_key, Arc::new(translator));
    }

    pub fn get_translator(&self, field_key: &str) -> Option<Arc<dyn FieldQueryTranslator>> {
        self.translators.get(&field_key.to_lowercase()).cloned()
    }

    pub fn len(&self) -> usize {
        self.translators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translators.is_empty()
    }
}

impl std::fmt::Debug for FieldQueryTranslatorMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.translators.keys().collect();
        keys.sort();
        f.debug_struct("FieldQueryTranslatorMap")
            .field("fields", &keys)
            .finish()
    }
}

/// Redirects a logical field to a stored one, keeping value and comparison.
/// On the way back the stored field is copied to the logical name.
#[derive(Debug, Clone)]
pub struct AliasFieldTranslator {
    alias: String,
    target: String,
}

impl AliasFieldTranslator {
    pub fn new(alias: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            target: target.into(),
        }
    }
}

impl FieldQueryTranslator for AliasFieldTranslator {
    fn name(&self) -> &str {
        &self.alias
    }

    fn translate_field_query(
        &self,
        _field_key: &str,
        value: Option<&str>,
        comparison: ComparisonType,
        names: &dyn FieldNameTranslator,
    ) -> Option<FieldQueryResult> {
        let value = value.map_or(Value::Null, |v| Value::String(v.to_string()));
        Some(FieldQueryResult {
            field_comparisons: vec![FieldComparison {
                field: names.index_field_name(&self.target),
                value,
                comparison,
            }],
            query_methods: Vec::new(),
        })
    }

    fn translate_field_result(&self, mut document: Document, names: &dyn FieldNameTranslator) -> Document {
        let stored = names.index_field_name(&self.target);
        let logical = names.index_field_name(&self.alias);
        if let Some(value) = document.get(&stored).cloned() {
            document.entry(logical).or_insert(value);
        }
        document
    }
}
