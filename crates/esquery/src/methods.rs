//! Directives extracted from the tree during mapping
//!
//! Shaping nodes contribute no boolean query. Instead each one leaves a
//! `QueryMethod` (or a `FacetQuery`) behind, and these are applied when the
//! request is built and when results are materialized.

use std::fmt;

use crate::node::{SortDirection, ValueType};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryMethod {
    All,
    Any,
    Cast { target_type: String },
    Count { is_long: bool },
    ElementAt { index: usize, allow_default: bool },
    First { allow_default: bool },
    Last { allow_default: bool },
    Single { allow_default: bool },
    Max { allow_default: bool },
    Min { allow_default: bool },
    OrderBy {
        field: String,
        field_type: ValueType,
        direction: SortDirection,
    },
    Select { field_names: Vec<String> },
    Skip { count: usize },
    Take { count: usize },
    GetResults,
    GetFacets,
}

impl QueryMethod {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryMethod::All => "All",
            QueryMethod::Any => "Any",
            QueryMethod::Cast { .. } => "Cast",
            QueryMethod::Count { .. } => "Count",
            QueryMethod::ElementAt { .. } => "ElementAt",
            QueryMethod::First { .. } => "First",
            QueryMethod::Last { .. } => "Last",
            QueryMethod::Single { .. } => "Single",
            QueryMethod::Max { .. } => "Max",
            QueryMethod::Min { .. } => "Min",
            QueryMethod::OrderBy { .. } => "OrderBy",
            QueryMethod::Select { .. } => "Select",
            QueryMethod::Skip { .. } => "Skip",
            QueryMethod::Take { .. } => "Take",
            QueryMethod::GetResults => "GetResults",
            QueryMethod::GetFacets => "GetFacets",
        }
    }

    /// Picks the output shape of an execution. `Max` and `Min` are recorded
    /// but never shape the output.
    pub fn is_output(&self) -> bool {
        matches!(
            self,
            QueryMethod::All
                | QueryMethod::Any
                | QueryMethod::Count { .. }
                | QueryMethod::ElementAt { .. }
                | QueryMethod::First { .. }
                | QueryMethod::Last { .. }
                | QueryMethod::Single { .. }
                | QueryMethod::GetResults
                | QueryMethod::GetFacets
        )
    }
}

impl fmt::Display for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMethod::Cast { target_type } => write!(f, "Cast({target_type})"),
            QueryMethod::Count { is_long } => {
                write!(f, "{}", if *is_long { "LongCount" } else { "Count" })
            }
            QueryMethod::ElementAt {
                index,
                allow_default,
            } => {
                let suffix = if *allow_default { "OrDefault" } else { "" };
                write!(f, "ElementAt{suffix}({index})")
            }
            QueryMethod::First { allow_default }
            | QueryMethod::Last { allow_default }
            | QueryMethod::Single { allow_default }
            | QueryMethod::Max { allow_default }
            | QueryMethod::Min { allow_default } => {
                let suffix = if *allow_default { "OrDefault" } else { "" };
                write!(f, "{}{suffix}", self.kind())
            }
            QueryMethod::OrderBy {
                field, direction, ..
            } => {
                let dir = match direction {
                    SortDirection::Ascending => "asc",
                    SortDirection::Descending => "desc",
                };
                write!(f, "OrderBy({field} {dir})")
            }
            QueryMethod::Select { field_names } => write!(f, "Select({})", field_names.join(", ")),
            QueryMethod::Skip { count } => write!(f, "Skip({count})"),
            QueryMethod::Take { count } => write!(f, "Take({count})"),
            other => f.write_str(other.kind()),
        }
    }
}

/// A facet request recorded by `FacetOn` / `FacetPivotOn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetQuery {
    /// `None` for pivot facets; their name is derived from the fields.
    pub category_name: Option<String>,
    /// Index-formatted field names, outermost first.
    pub field_names: Vec<String>,
    pub min_count: Option<u32>,
    pub filter_values: Option<Vec<String>>,
}

impl FacetQuery {
    /// Name the facet is requested and reported under.
    pub fn key(&self) -> String {
        match &self.category_name {
            Some(name) => name.clone(),
            None => self.field_names.join(","),
        }
    }

    pub fn is_pivot(&self) -> bool {
        self.category_name.is_none()
    }
}

/// Comparison kind handed to and returned from virtual field translators.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComparisonType {
    Equal,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    /// Anything else a translator may produce; the mapper rejects it.
    Other(String),
}

impl ComparisonType {
    /// The same comparison with its operands swapped (`10 < x` is `x > 10`).
    pub fn mirrored(&self) -> ComparisonType {
        match self {
            ComparisonType::LessThan => ComparisonType::GreaterThan,
            ComparisonType::LessThanOrEqual => ComparisonType::GreaterThanOrEqual,
            ComparisonType::GreaterThan => ComparisonType::LessThan,
            ComparisonType::GreaterThanOrEqual => ComparisonType::LessThanOrEqual,
            other => other.clone(),
        }
    }
}

impl fmt::Display for ComparisonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComparisonType::Equal => f.write_str("Equal"),
            ComparisonType::LessThan => f.write_str("LessThan"),
            ComparisonType::LessThanOrEqual => f.write_str("LessThanOrEqual"),
            ComparisonType::GreaterThan => f.write_str("GreaterThan"),
            ComparisonType::GreaterThanOrEqual => f.write_str("GreaterThanOrEqual"),
            ComparisonType::Other(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexSet;

    #[test]
    fn methods_dedup_by_value() {
        let mut set = IndexSet::new();
        set.insert(QueryMethod::Take { count: 10 });
        set.insert(QueryMethod::Skip { count: 5 });
        set.insert(QueryMethod::Take { count: 10 });
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn only_result_shaping_methods_are_output() {
        assert!(QueryMethod::Count { is_long: false }.is_output());
        assert!(QueryMethod::GetFacets.is_output());
        assert!(!QueryMethod::Max { allow_default: false }.is_output());
        assert!(!QueryMethod::Min { allow_default: true }.is_output());
        assert!(!QueryMethod::Take { count: 1 }.is_output());
    }

    #[test]
    fn pivot_facet_key_joins_fields() {
        let facet = FacetQuery {
            category_name: None,
            field_names: vec!["category".into(), "brand".into()],
            min_count: None,
            filter_values: None,
        };
        assert!(facet.is_pivot());
        assert_eq!(facet.key(), "category,brand");
    }

    #[test]
    fn mirrored_swaps_direction_only() {
        assert_eq!(
            ComparisonType::LessThan.mirrored(),
            ComparisonType::GreaterThan
        );
        assert_eq!(ComparisonType::Equal.mirrored(), ComparisonType::Equal);
    }

    #[test]
    fn display_marks_default_variants() {
        assert_eq!(
            QueryMethod::First {
                allow_default: true
            }
            .to_string(),
            "FirstOrDefault"
        );
        assert_eq!(QueryMethod::Skip { count: 5 }.to_string(), "Skip(5)");
    }
}
