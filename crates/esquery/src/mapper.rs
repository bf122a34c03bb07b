//! Compile an optimized node tree into a backend query
//!
//! One pass, one fresh [`MapperState`]. Predicate nodes compile to
//! [`EsQuery`] values; shaping nodes leave a [`QueryMethod`] or
//! [`FacetQuery`] in the state and hand back whatever their source compiles
//! to. Comparisons on registered virtual fields are expanded by their
//! translator before anything reaches the index.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::error::{Result, SearchError};
use crate::fields::{
    DefaultFieldNameTranslator, DefaultValueFormatter, FieldNameTranslator, IndexValueFormatter,
    format_field_name,
};
use crate::methods::{ComparisonType, FacetQuery, QueryMethod};
use crate::node::{
    AggregateNode, AggregateOp, BetweenNode, BinaryNode, ConstantNode, FacetNode, FieldNode,
    LikeNode, QueryNode, Value, ValueType,
};
use crate::query::{EsQuery, RangeQuery};
use crate::translators::{FieldQueryTranslator, FieldQueryTranslatorMap};

/// Collaborators the mapper consults for names, values and virtual fields.
#[derive(Clone)]
pub struct IndexParameters {
    pub value_formatter: Arc<dyn IndexValueFormatter>,
    pub field_name_translator: Arc<dyn FieldNameTranslator>,
    pub field_query_translators: FieldQueryTranslatorMap,
}

impl Default for IndexParameters {
    fn default() -> Self {
        Self {
            value_formatter: Arc::new(DefaultValueFormatter),
            field_name_translator: Arc::new(DefaultFieldNameTranslator::default()),
            field_query_translators: FieldQueryTranslatorMap::new(),
        }
    }
}

impl IndexParameters {
    pub fn with_field_name_translator(mut self, translator: Arc<dyn FieldNameTranslator>) -> Self {
        self.field_name_translator = translator;
        self
    }

    pub fn with_translators(mut self, translators: FieldQueryTranslatorMap) -> Self {
        self.field_query_translators = translators;
        self
    }
}

impl fmt::Debug for IndexParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexParameters")
            .field("field_query_translators", &self.field_query_translators)
            .finish_non_exhaustive()
    }
}

/// Everything a single mapping pass produced.
#[derive(Clone)]
pub struct CompiledQuery {
    pub query: EsQuery,
    pub filter: Option<EsQuery>,
    /// Directives, outermost first, deduplicated by value.
    pub methods: Vec<QueryMethod>,
    pub virtual_field_processors: Vec<Arc<dyn FieldQueryTranslator>>,
    pub facet_queries: Vec<FacetQuery>,
}

impl CompiledQuery {
    pub fn has_method(&self, kind: &str) -> bool {
        self.methods.iter().any(|m| m.kind() == kind)
    }

    /// The `Select` directive, when exactly one is present.
    pub fn single_select(&self) -> Option<&[String]> {
        let mut selects = self.methods.iter().filter_map(|m| match m {
            QueryMethod::Select { field_names } => Some(field_names.as_slice()),
            _ => None,
        });
        match (selects.next(), selects.next()) {
            (Some(fields), None) => Some(fields),
            _ => None,
        }
    }

    /// Human-readable plan: query, filter, directives, facets, translators.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "query:   {}", self.query)?;
        match &self.filter {
            Some(filter) => writeln!(out, "filter:  {filter}")?,
            None => writeln!(out, "filter:  (none)")?,
        }
        if self.methods.is_empty() {
            writeln!(out, "methods: (none)")?;
        } else {
            let methods: Vec<String> = self.methods.iter().map(ToString::to_string).collect();
            writeln!(out, "methods: {}", methods.join(", "))?;
        }
        for facet in &self.facet_queries {
            write!(out, "facet:   {} on [{}]", facet.key(), facet.field_names.join(", "))?;
            if let Some(min) = facet.min_count {
                write!(out, " min_count={min}")?;
            }
            if let Some(values) = &facet.filter_values {
                write!(out, " filter=[{}]", values.join(", "))?;
            }
            writeln!(out)?;
        }
        for processor in &self.virtual_field_processors {
            writeln!(out, "virtual: {}", processor.name())?;
        }
        Ok(())
    }
}

impl fmt::Display for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dump(f)
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let processors: Vec<&str> = self.virtual_field_processors.iter().map(|p| p.name()).collect();
        f.debug_struct("CompiledQuery")
            .field("query", &self.query)
            .field("filter", &self.filter)
            .field("methods", &self.methods)
            .field("virtual_field_processors", &processors)
            .field("facet_queries", &self.facet_queries)
            .finish()
    }
}

/// Accumulator for one mapping pass
#[derive(Default)]
struct MapperState {
    filter: Option<EsQuery>,
    methods: IndexSet<QueryMethod>,
    facet_queries: Vec<FacetQuery>,
    virtual_field_processors: Vec<Arc<dyn FieldQueryTranslator>>,
}

impl MapperState {
    fn add_filter(&mut self, query: EsQuery) {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(query),
            None => query,
        });
    }

    fn add_processor(&mut self, translator: Arc<dyn FieldQueryTranslator>) {
        if !self
            .virtual_field_processors
            .iter()
            .any(|p| Arc::ptr_eq(p, &translator))
        {
            self.virtual_field_processors.push(translator);
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryMapper {
    parameters: IndexParameters,
}

impl QueryMapper {
    pub fn new(parameters: IndexParameters) -> Self {
        Self { parameters }
    }

    pub fn parameters(&self) -> &IndexParameters {
        &self.parameters
    }

    pub fn map_query(&self, root: &QueryNode) -> Result<CompiledQuery> {
        let mut state = MapperState::default();
        let query = self.handle(root, &mut state)?;
        log::trace!("mapped {} to {query}", root.kind());
        Ok(CompiledQuery {
            query,
            filter: state.filter,
            methods: state.methods.into_iter().collect(),
            virtual_field_processors: state.virtual_field_processors,
            facet_queries: state.facet_queries,
        })
    }

    fn handle(&self, node: &QueryNode, state: &mut MapperState) -> Result<EsQuery> {
        match node {
            // ============ Strip and descend ============
            QueryNode::Aggregate(agg) => self.strip_aggregate(agg, state),
            QueryNode::ElementAt {
                source,
                index,
                allow_default,
            } => {
                state.methods.insert(QueryMethod::ElementAt {
                    index: *index,
                    allow_default: *allow_default,
                });
                self.handle(source, state)
            }
            QueryNode::Cast {
                source,
                target_type,
            } => {
                state.methods.insert(QueryMethod::Cast {
                    target_type: target_type.clone(),
                });
                self.handle(source, state)
            }
            QueryNode::OrderBy {
                source,
                field,
                field_type,
                direction,
            } => {
                state.methods.insert(QueryMethod::OrderBy {
                    field: format_field_name(field),
                    field_type: *field_type,
                    direction: *direction,
                });
                self.handle(source, state)
            }
            QueryNode::Select {
                source,
                field_names,
            } => {
                state.methods.insert(QueryMethod::Select {
                    field_names: field_names.clone(),
                });
                self.handle(source, state)
            }
            QueryNode::Skip { source, count } => {
                state.methods.insert(QueryMethod::Skip { count: *count });
                self.handle(source, state)
            }
            QueryNode::Take { source, count } => {
                state.methods.insert(QueryMethod::Take { count: *count });
                self.handle(source, state)
            }
            QueryNode::GetResults { source } => {
                state.methods.insert(QueryMethod::GetResults);
                self.handle(source, state)
            }
            QueryNode::GetFacets { source } => {
                state.methods.insert(QueryMethod::GetFacets);
                self.handle(source, state)
            }
            QueryNode::FacetOn(facet) => {
                let field = facet
                    .fields
                    .first()
                    .map(|f| format_field_name(f))
                    .unwrap_or_default();
                state.facet_queries.push(FacetQuery {
                    category_name: Some(field.clone()),
                    field_names: vec![field],
                    min_count: facet.min_count,
                    filter_values: facet.filter_values.clone(),
                });
                self.handle(&facet.source, state)
            }
            QueryNode::FacetPivotOn(facet) => {
                state.facet_queries.push(pivot_facet(facet));
                self.handle(&facet.source, state)
            }
            QueryNode::Filter { source, predicate } => {
                let filter = self.handle(predicate, state)?;
                state.add_filter(filter);
                self.handle(source, state)
            }
            QueryNode::Where { source, predicate } => {
                let predicate = self.handle(predicate, state)?;
                let source = self.handle(source, state)?;
                // `and` already drops a MatchAll side.
                Ok(predicate.and(source))
            }

            // ============ Compile ============
            QueryNode::Equal(b) => self.handle_comparison(b, ComparisonType::Equal, state),
            QueryNode::GreaterThan(b) => self.handle_comparison(b, ComparisonType::GreaterThan, state),
            QueryNode::GreaterThanOrEqual(b) => {
                self.handle_comparison(b, ComparisonType::GreaterThanOrEqual, state)
            }
            QueryNode::LessThan(b) => self.handle_comparison(b, ComparisonType::LessThan, state),
            QueryNode::LessThanOrEqual(b) => {
                self.handle_comparison(b, ComparisonType::LessThanOrEqual, state)
            }
            QueryNode::Between(between) => self.handle_between(between),
            QueryNode::Contains(b) => {
                let (field, value) = self.string_operands(node, b)?;
                let pattern = format!("*{}*", value.to_lowercase());
                Ok(apply_boost(EsQuery::wildcard(field, pattern), b.boost))
            }
            QueryNode::EndsWith(b) => {
                let (field, value) = self.string_operands(node, b)?;
                Ok(apply_boost(EsQuery::wildcard(field, format!("*{value}")), b.boost))
            }
            QueryNode::StartsWith(b) => {
                let (field, value) = self.string_operands(node, b)?;
                Ok(apply_boost(EsQuery::prefix(field, value), b.boost))
            }
            QueryNode::WildcardMatch(b) => {
                let (field, value) = self.string_operands(node, b)?;
                Ok(apply_boost(EsQuery::wildcard(field, value), b.boost))
            }
            QueryNode::Like(like) => self.handle_like(like),
            QueryNode::Matches(_) => Err(SearchError::NotImplemented(
                "Matches expression is not supported (no regex queries)".to_string(),
            )),
            QueryNode::Field(field) => handle_bool_field(field),
            QueryNode::Constant(constant) => handle_constant(constant),
            QueryNode::MatchAll => Ok(EsQuery::MatchAll),
            QueryNode::MatchNone => Ok(EsQuery::MatchNone),
            QueryNode::And(left, right) => {
                let left = self.handle(left, state)?;
                if left.is_match_none() {
                    return Ok(left);
                }
                Ok(left.and(self.handle(right, state)?))
            }
            QueryNode::Or(left, right) => {
                if let Some(field) = null_or_empty_check(left, right) {
                    return Ok(EsQuery::Missing {
                        field: format_field_name(field),
                    });
                }
                let left = self.handle(left, state)?;
                if left.is_match_all() {
                    return Ok(left);
                }
                Ok(left.or(self.handle(right, state)?))
            }
            QueryNode::Not(operand) => Ok(self.handle(operand, state)?.not()),

            QueryNode::NotEqual(_)
            | QueryNode::Boost { .. }
            | QueryNode::Negate(_)
            | QueryNode::Custom(_) => Err(SearchError::UnsupportedNode(node.kind())),
        }
    }

    fn strip_aggregate(&self, agg: &AggregateNode, state: &mut MapperState) -> Result<EsQuery> {
        let method = match agg.op {
            AggregateOp::First { allow_default } => QueryMethod::First { allow_default },
            AggregateOp::Last { allow_default } => QueryMethod::Last { allow_default },
            AggregateOp::Single { allow_default } => QueryMethod::Single { allow_default },
            AggregateOp::Max { allow_default } => QueryMethod::Max { allow_default },
            AggregateOp::Min { allow_default } => QueryMethod::Min { allow_default },
            AggregateOp::Count { is_long } => QueryMethod::Count { is_long },
            AggregateOp::Any => QueryMethod::Any,
            AggregateOp::All => QueryMethod::All,
        };
        state.methods.insert(method);
        let source = self.handle(&agg.source, state)?;
        // Optimized trees always carry MatchAll here.
        if matches!(*agg.predicate, QueryNode::MatchAll) {
            return Ok(source);
        }
        Ok(self.handle(&agg.predicate, state)?.and(source))
    }

    fn handle_comparison(
        &self,
        node: &BinaryNode,
        comparison: ComparisonType,
        state: &mut MapperState,
    ) -> Result<EsQuery> {
        let (field, value, mirrored) = comparison_operands(node)?;
        let comparison = if mirrored {
            comparison.mirrored()
        } else {
            comparison
        };

        if let Some(query) = self.process_as_virtual_field(field, value, node.boost, &comparison, state)? {
            return Ok(query);
        }

        let field_name = format_field_name(&field.key);
        self.compile_comparison(&field_name, value, &comparison, node.boost)
    }

    /// Offer the comparison to a registered translator. `None` when no
    /// translator claims the field.
    fn process_as_virtual_field(
        &self,
        field: &FieldNode,
        value: &Value,
        boost: f32,
        comparison: &ComparisonType,
        state: &mut MapperState,
    ) -> Result<Option<EsQuery>> {
        let Some(translator) = self.parameters.field_query_translators.get_translator(&field.key) else {
            return Ok(None);
        };
        let formatted = self.parameters.value_formatter.format_value(value);
        let names = self.parameters.field_name_translator.as_ref();
        let Some(result) =
            translator.translate_field_query(&field.key, formatted.as_deref(), comparison.clone(), names)
        else {
            return Ok(None);
        };
        log::debug!(
            "virtual field '{}' expanded by {} into {} comparison(s)",
            field.key,
            translator.name(),
            result.field_comparisons.len()
        );

        let mut query = EsQuery::MatchAll;
        for tuple in &result.field_comparisons {
            let field_name = names.index_field_name(&tuple.field);
            let compiled = self.compile_comparison(&field_name, &tuple.value, &tuple.comparison, boost)?;
            query = query.and(compiled);
        }
        for method in result.query_methods {
            state.methods.insert(method);
        }
        state.add_processor(translator);
        Ok(Some(query))
    }

    /// Term or range query on an already formatted field name.
    fn compile_comparison(
        &self,
        field: &str,
        value: &Value,
        comparison: &ComparisonType,
        boost: f32,
    ) -> Result<EsQuery> {
        let formatted = self.parameters.value_formatter.format_value(value);
        let query = match comparison {
            ComparisonType::Equal => EsQuery::term(field, formatted.unwrap_or_default()),
            ComparisonType::Other(name) => return Err(SearchError::UnknownComparison(name.clone())),
            range => {
                let bound = formatted.ok_or_else(|| SearchError::InvalidComparison {
                    field: field.to_string(),
                    reason: format!("{range} needs a non-null value"),
                })?;
                let mut q = RangeQuery {
                    field: field.to_string(),
                    ..Default::default()
                };
                match range {
                    ComparisonType::GreaterThan => q.from = Some(bound),
                    ComparisonType::GreaterThanOrEqual => {
                        q.from = Some(bound);
                        q.include_lower = true;
                    }
                    ComparisonType::LessThan => q.to = Some(bound),
                    _ => {
                        q.to = Some(bound);
                        q.include_upper = true;
                    }
                }
                EsQuery::Range(q)
            }
        };
        Ok(apply_boost(query, boost))
    }

    fn handle_between(&self, node: &BetweenNode) -> Result<EsQuery> {
        let field = format_field_name(&node.field);
        let bound = |value: &Value, which: &str| {
            self.parameters
                .value_formatter
                .format_value(value)
                .ok_or_else(|| SearchError::InvalidComparison {
                    field: field.clone(),
                    reason: format!("Between needs a non-null {which} bound"),
                })
        };
        let from = bound(&node.from, "lower")?;
        let to = bound(&node.to, "upper")?;
        Ok(EsQuery::Range(RangeQuery {
            field: field.clone(),
            from: Some(from),
            to: Some(to),
            include_lower: node.inclusion.includes_lower(),
            include_upper: node.inclusion.includes_upper(),
            boost: None,
        }))
    }

    fn handle_like(&self, node: &LikeNode) -> Result<EsQuery> {
        let (QueryNode::Field(field), QueryNode::Constant(constant)) = (&*node.left, &*node.right) else {
            return Err(SearchError::UnsupportedContext {
                node: "Like",
                reason: "expected a field compared with a constant".to_string(),
            });
        };
        Ok(EsQuery::Fuzzy {
            field: format_field_name(&field.key),
            value: self
                .parameters
                .value_formatter
                .format_value(&constant.value)
                .unwrap_or_default(),
            min_similarity: node.min_similarity,
            boost: node.boost,
        })
    }

    /// Field name and formatted string value for a string-matching node.
    fn string_operands(&self, node: &QueryNode, b: &BinaryNode) -> Result<(String, String)> {
        let (QueryNode::Field(field), QueryNode::Constant(constant)) = (&*b.left, &*b.right) else {
            return Err(SearchError::UnsupportedContext {
                node: node.kind(),
                reason: "expected a field compared with a constant".to_string(),
            });
        };
        let value = self
            .parameters
            .value_formatter
            .format_value(&constant.value)
            .ok_or_else(|| SearchError::InvalidComparison {
                field: field.key.clone(),
                reason: format!("{} needs a non-null value", node.kind()),
            })?;
        Ok((format_field_name(&field.key), value))
    }
}

fn apply_boost(query: EsQuery, boost: f32) -> EsQuery {
    if (boost - 1.0).abs() > f32::EPSILON {
        query.with_boost(boost)
    } else {
        query
    }
}

/// Field and constant of a comparison, plus whether the field sat on the right.
fn comparison_operands(node: &BinaryNode) -> Result<(&FieldNode, &Value, bool)> {
    match (&*node.left, &*node.right) {
        (QueryNode::Field(field), QueryNode::Constant(c)) => Ok((field, &c.value, false)),
        (QueryNode::Constant(c), QueryNode::Field(field)) => Ok((field, &c.value, true)),
        (left, right) => Err(SearchError::UnsupportedContext {
            node: "comparison",
            reason: format!(
                "expected a field and a constant, found {} and {}",
                left.kind(),
                right.kind()
            ),
        }),
    }
}

fn handle_bool_field(field: &FieldNode) -> Result<EsQuery> {
    if field.field_type != ValueType::Bool {
        return Err(SearchError::UnsupportedContext {
            node: "Field",
            reason: format!(
                "field '{}' of type {} used as a predicate",
                field.key,
                field.field_type.name()
            ),
        });
    }
    Ok(EsQuery::term(format_field_name(&field.key), "true"))
}

fn handle_constant(constant: &ConstantNode) -> Result<EsQuery> {
    match (&constant.value, constant.value_type) {
        (_, ValueType::Queryable) => Ok(EsQuery::MatchAll),
        (Value::Bool(true), ValueType::Bool) => Ok(EsQuery::MatchAll),
        (Value::Bool(false), ValueType::Bool) => Ok(EsQuery::MatchNone),
        _ => Err(SearchError::UnsupportedNode("Constant")),
    }
}

/// `field == "" || field == null` on one field: the key, if it matches.
// Workaround for a known limitation: fields indexed with only a stop word also
// read as missing. Requiring one key on both sides is stricter than needed.
fn null_or_empty_check<'a>(left: &'a QueryNode, right: &'a QueryNode) -> Option<&'a str> {
    let (QueryNode::Equal(l), QueryNode::Equal(r)) = (left, right) else {
        return None;
    };
    let (QueryNode::Field(lf), QueryNode::Constant(lc)) = (&*l.left, &*l.right) else {
        return None;
    };
    let (QueryNode::Field(rf), QueryNode::Constant(rc)) = (&*r.left, &*r.right) else {
        return None;
    };
    let empty = matches!(&lc.value, Value::String(s) if s.is_empty());
    (empty && rc.value.is_null() && lf.key == rf.key).then_some(lf.key.as_str())
}

fn pivot_facet(facet: &FacetNode) -> FacetQuery {
    FacetQuery {
        category_name: None,
        field_names: facet.fields.iter().map(|f| format_field_name(f)).collect(),
        min_count: facet.min_count,
        filter_values: facet.filter_values.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build::*;
    use crate::node::{Inclusion, SortDirection};
    use crate::optimize::optimize;
    use crate::translators::{FieldComparison, FieldQueryResult};

    fn mapper() -> QueryMapper {
        QueryMapper::new(IndexParameters::default())
    }

    fn compile(node: QueryNode) -> CompiledQuery {
        mapper().map_query(&optimize(&node)).unwrap()
    }

    #[test]
    fn equal_compiles_to_term() {
        let compiled = compile(eq(field("status"), constant("published")));
        assert_eq!(compiled.query, EsQuery::term("status", "published"));
        assert!(compiled.filter.is_none());
        assert!(compiled.methods.is_empty());
    }

    #[test]
    fn field_names_are_formatted() {
        let compiled = compile(eq(field("Page Title"), constant("Home")));
        assert_eq!(compiled.query, EsQuery::term("page_title", "Home"));
    }

    #[test]
    fn mirrored_comparison_flips_range() {
        let compiled = compile(lt(constant(10), field("price")));
        let EsQuery::Range(range) = compiled.query else {
            panic!("expected range");
        };
        assert_eq!(range.from.as_deref(), Some("10"));
        assert!(!range.include_lower);
        assert!(range.to.is_none());
    }

    #[test]
    fn boost_applies_only_when_not_one() {
        let boosted = compile(eq(field("title").boosted(2.0), constant("x")));
        assert_eq!(boosted.query, EsQuery::term("title", "x").with_boost(2.0));
        let plain = compile(eq(field("title").boosted(1.0), constant("x")));
        assert_eq!(plain.query, EsQuery::term("title", "x"));
    }

    #[test]
    fn between_respects_inclusion() {
        let compiled = compile(between("Price", 10, 20, Inclusion::Lower));
        let EsQuery::Range(range) = compiled.query else {
            panic!("expected range");
        };
        assert_eq!(range.field, "price");
        assert!(range.include_lower);
        assert!(!range.include_upper);
    }

    #[test]
    fn string_matches_compile_to_patterns() {
        assert_eq!(
            compile(contains(field("Title"), constant("Foo"))).query,
            EsQuery::wildcard("title", "*foo*")
        );
        assert_eq!(
            compile(ends_with(field("title"), constant("Bar"))).query,
            EsQuery::wildcard("title", "*Bar")
        );
        assert_eq!(
            compile(starts_with(field("title"), constant("Ba"))).query,
            EsQuery::prefix("title", "Ba")
        );
    }

    #[test]
    fn like_compiles_to_fuzzy() {
        let compiled = compile(like(field("name"), constant("jon"), 0.5));
        assert!(matches!(
            compiled.query,
            EsQuery::Fuzzy { ref field, min_similarity, .. } if field == "name" && min_similarity == 0.5
        ));
    }

    #[test]
    fn matches_is_not_implemented() {
        let err = mapper()
            .map_query(&matches(field("name"), constant("^a.*")))
            .unwrap_err();
        assert!(matches!(err, SearchError::NotImplemented(_)));
    }

    #[test]
    fn bool_field_requires_bool_type() {
        assert_eq!(
            compile(typed_field("Is Active", ValueType::Bool)).query,
            EsQuery::term("is_active", "true")
        );
        let err = mapper().map_query(&field("title")).unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedContext { .. }));
    }

    #[test]
    fn null_or_empty_becomes_missing() {
        let node = or(
            eq(field("Title"), constant("")),
            eq(field("Title"), constant(Value::Null)),
        );
        assert_eq!(
            compile(node).query,
            EsQuery::Missing {
                field: "title".into()
            }
        );
    }

    #[test]
    fn null_or_empty_on_different_fields_stays_or() {
        let node = or(
            eq(field("title"), constant("")),
            eq(field("summary"), constant(Value::Null)),
        );
        assert!(matches!(compile(node).query, EsQuery::Bool(_)));
    }

    #[test]
    fn filters_accumulate_with_and() {
        let node = queryable("items")
            .filter(eq(field("lang"), constant("en")))
            .filter(eq(field("type"), constant("page")));
        let compiled = compile(node);
        assert!(compiled.query.is_match_all());
        let Some(EsQuery::Bool(filter)) = compiled.filter else {
            panic!("expected bool filter");
        };
        assert_eq!(filter.must.len(), 2);
    }

    #[test]
    fn shaping_nodes_become_methods_outermost_first() {
        let node = queryable("items")
            .where_(gt(field("price"), constant(10)))
            .order_by("Sort Order", SortDirection::Descending)
            .skip(5)
            .take(20);
        let compiled = compile(node);
        assert_eq!(
            compiled.methods,
            vec![
                QueryMethod::Take { count: 20 },
                QueryMethod::Skip { count: 5 },
                QueryMethod::OrderBy {
                    field: "sort_order".into(),
                    field_type: ValueType::String,
                    direction: SortDirection::Descending,
                },
            ]
        );
        assert!(matches!(compiled.query, EsQuery::Range(_)));
    }

    #[test]
    fn duplicate_directives_collapse() {
        let node = queryable("items").take(10).take(10);
        assert_eq!(compile(node).methods, vec![QueryMethod::Take { count: 10 }]);
    }

    #[test]
    fn facets_record_formatted_fields() {
        let node = queryable("items")
            .facet_on("Product Type", Some(2))
            .facet_pivot_on(["Category", "Brand"], None)
            .get_facets();
        let compiled = compile(node);
        assert_eq!(compiled.facet_queries.len(), 2);
        assert!(compiled.facet_queries.iter().any(|f| f.key() == "product_type"));
        assert!(compiled.facet_queries.iter().any(|f| f.key() == "category,brand"));
        assert_eq!(compiled.methods, vec![QueryMethod::GetFacets]);
    }

    #[test]
    fn virtual_field_expands_into_ranges() {
        let mut translators = FieldQueryTranslatorMap::new();
        translators.register_fn("Year", |_, value, _, _| {
            let year = value?.to_string();
            Some(FieldQueryResult {
                field_comparisons: vec![
                    FieldComparison::new("Created Date", format!("{year}0101"), ComparisonType::GreaterThanOrEqual),
                    FieldComparison::new("Created Date", format!("{year}1231"), ComparisonType::LessThanOrEqual),
                ],
                query_methods: vec![QueryMethod::Take { count: 1 }],
            })
        });
        let mapper = QueryMapper::new(IndexParameters::default().with_translators(translators));
        let compiled = mapper
            .map_query(&eq(typed_field("year", ValueType::Int), constant(2020)))
            .unwrap();

        let EsQuery::Bool(b) = &compiled.query else {
            panic!("expected bool, got {}", compiled.query);
        };
        assert_eq!(b.must.len(), 2);
        assert!(b.must.iter().all(|q| matches!(q, EsQuery::Range(r) if r.field == "created_date")));
        assert_eq!(compiled.methods, vec![QueryMethod::Take { count: 1 }]);
        assert_eq!(compiled.virtual_field_processors.len(), 1);
    }

    #[test]
    fn virtual_field_with_unknown_comparison_fails() {
        let mut translators = FieldQueryTranslatorMap::new();
        translators.register_fn("near", |_, value, _, _| {
            Some(FieldQueryResult {
                field_comparisons: vec![FieldComparison::new(
                    "location",
                    value.unwrap_or_default(),
                    ComparisonType::Other("GeoDistance".into()),
                )],
                query_methods: Vec::new(),
            })
        });
        let mapper = QueryMapper::new(IndexParameters::default().with_translators(translators));
        let err = mapper
            .map_query(&eq(field("near"), constant("1,2")))
            .unwrap_err();
        assert!(matches!(err, SearchError::UnknownComparison(ref name) if name == "GeoDistance"));
    }

    #[test]
    fn declining_translator_falls_back_to_term() {
        let mut translators = FieldQueryTranslatorMap::new();
        translators.register_fn("status", |_, _, _, _| None);
        let mapper = QueryMapper::new(IndexParameters::default().with_translators(translators));
        let compiled = mapper
            .map_query(&eq(field("status"), constant("draft")))
            .unwrap();
        assert_eq!(compiled.query, EsQuery::term("status", "draft"));
        assert!(compiled.virtual_field_processors.is_empty());
    }

    #[test]
    fn and_short_circuits_on_compiled_match_none() {
        // Unoptimized: the right side would fail if it were compiled.
        let node = and(QueryNode::MatchNone, matches(field("name"), constant("x")));
        assert_eq!(mapper().map_query(&node).unwrap().query, EsQuery::MatchNone);
    }

    #[test]
    fn unsupported_nodes_name_their_kind() {
        let err = mapper()
            .map_query(&QueryNode::Custom("geo".into()))
            .unwrap_err();
        assert!(matches!(err, SearchError::UnsupportedNode("Custom")));
    }

    #[test]
    fn range_with_null_bound_is_rejected() {
        let err = mapper()
            .map_query(&gt(field("price"), constant(Value::Null)))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidComparison { .. }));
    }

    #[test]
    fn dump_lists_plan() {
        let compiled = compile(queryable("items").where_(eq(field("a"), constant("b"))).take(3));
        let text = compiled.to_string();
        assert!(text.contains("query:"));
        assert!(text.contains("Take(3)"));
    }
}
