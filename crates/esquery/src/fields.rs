//! Field naming and value formatting
//!
//! Every field name that reaches a compiled query passes through
//! [`format_field_name`] exactly once; every literal passes through an
//! [`IndexValueFormatter`]. Both are collaborator seams: the defaults below
//! match how documents are written by the stock indexing pipeline.

use indexmap::IndexMap;

use crate::node::Value;

/// Lowercase, then replace spaces with underscores. Idempotent.
pub fn format_field_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

pub trait FieldNameTranslator: Send + Sync {
    /// Name of the field as stored in the index.
    fn index_field_name(&self, name: &str) -> String {
        format_field_name(name)
    }

    /// Property names a stored field may populate on a result type.
    fn type_field_names(&self, field_name: &str) -> Vec<String>;

    /// Map each document field to its candidate property names.
    fn map_document_fields(&self, field_names: &[String]) -> IndexMap<String, Vec<String>> {
        field_names
            .iter()
            .map(|f| (f.clone(), self.type_field_names(f)))
            .collect()
    }

    /// Remove type-specific prefixes/suffixes from an index field name.
    fn strip_known_extensions(&self, field_name: &str) -> String;

    /// Strip every field and join the distinct results with `,`.
    fn strip_field_list(&self, field_names: &[String]) -> String {
        let mut seen: Vec<String> = Vec::new();
        for name in field_names {
            let stripped = self.strip_known_extensions(name);
            if !seen.contains(&stripped) {
                seen.push(stripped);
            }
        }
        seen.join(",")
    }
}

#[derive(Debug, Clone, Default)]
pub struct DefaultFieldNameTranslator {
    /// Name formats such as `{0}_t` or `_s_{0}`; `{0}` marks the field name.
    pub field_name_formats: Vec<String>,
}

impl DefaultFieldNameTranslator {
    pub fn new(field_name_formats: Vec<String>) -> Self {
        Self { field_name_formats }
    }
}

impl FieldNameTranslator for DefaultFieldNameTranslator {
    fn type_field_names(&self, field_name: &str) -> Vec<String> {
        let mut names = vec![field_name.to_string()];
        if !field_name.starts_with('_') {
            let spaced = field_name.replace('_', " ").trim().to_string();
            if spaced != field_name {
                names.push(spaced);
            }
        }
        names
    }

    fn strip_known_extensions(&self, field_name: &str) -> String {
        let mut name = field_name.to_string();
        // Single-underscore names are system fields and keep their shape.
        if name.starts_with('_') && !name.starts_with("__") {
            return name;
        }
        for format in &self.field_name_formats {
            let affix = format.replace("{0}", "");
            if affix.is_empty() || name.len() <= affix.len() {
                continue;
            }
            if let Some(rest) = name.strip_suffix(affix.as_str()) {
                name = rest.to_string();
            } else if let Some(rest) = name.strip_prefix(affix.as_str()) {
                name = rest.to_string();
            }
        }
        name
    }
}

/// Converts literals to their stored representation before they are
/// embedded in a query. `None` means the value has no stored form.
pub trait IndexValueFormatter: Send + Sync {
    fn format_value(&self, value: &Value) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueFormatter;

impl IndexValueFormatter for DefaultValueFormatter {
    fn format_value(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Id(id) => Some(normalize_id(id)),
        }
    }
}

/// `{1A2B-...}` → `1a2b...`: braces and hyphens dropped, lowercased.
pub fn normalize_id(id: &str) -> String {
    id.chars()
        .filter(|c| !matches!(c, '{' | '}' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}
