//! Query node tree
//!
//! The declarative form of a search query plus its shaping directives.
//! A tree is built once (by a front-end, the [`build`] helpers, or the
//! [`notation`](crate::notation) parser), consumed by
//! [`optimize`](crate::optimize::optimize) and then by
//! [`QueryMapper::map_query`](crate::mapper::QueryMapper::map_query).
//!
//! Three families of nodes live in the same enum:
//! - predicates and comparisons (`Equal`, `And`, `Contains`, ...)
//! - terminal/aggregate nodes (`Aggregate`, `ElementAt`) that wrap a source
//! - shaping directives (`OrderBy`, `Skip`, `FacetOn`, ...) that never change
//!   which documents match

use serde::{Deserialize, Serialize};

/// A literal carried by a constant node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Item identifier (GUID-like), normalised on the way into the index.
    Id(String),
}

impl Value {
    /// The static type a bare literal of this kind carries.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Object,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Id(_) => ValueType::Id,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Id(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Static type of a field or constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    String,
    Int,
    Float,
    Bool,
    Id,
    Object,
    /// A closed-over queryable source (the collection being searched).
    Queryable,
}

impl ValueType {
    pub fn name(self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Int => "int",
            ValueType::Float => "float",
            ValueType::Bool => "bool",
            ValueType::Id => "id",
            ValueType::Object => "object",
            ValueType::Queryable => "queryable",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "string" => ValueType::String,
            "int" => ValueType::Int,
            "float" => ValueType::Float,
            "bool" => ValueType::Bool,
            "id" => ValueType::Id,
            "object" => ValueType::Object,
            "queryable" => ValueType::Queryable,
            _ => return None,
        })
    }
}

/// Which bounds of a `Between` range are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Inclusion {
    Both,
    Lower,
    Upper,
    Neither,
}

impl Inclusion {
    pub fn includes_lower(self) -> bool {
        matches!(self, Inclusion::Both | Inclusion::Lower)
    }

    pub fn includes_upper(self) -> bool {
        matches!(self, Inclusion::Both | Inclusion::Upper)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    /// Logical field name as written by the caller (not yet index-formatted).
    pub key: String,
    pub field_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantNode {
    pub value: Value,
    pub value_type: ValueType,
}

/// Two operands plus the boost the comparison carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryNode {
    pub left: Box<QueryNode>,
    pub right: Box<QueryNode>,
    pub boost: f32,
}

impl BinaryNode {
    pub fn new(left: QueryNode, right: QueryNode) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            boost: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LikeNode {
    pub left: Box<QueryNode>,
    pub right: Box<QueryNode>,
    pub min_similarity: f32,
    pub boost: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetweenNode {
    pub field: String,
    pub from: Value,
    pub to: Value,
    pub inclusion: Inclusion,
}

/// The scalar operation a terminal node performs once results are in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateOp {
    First { allow_default: bool },
    Last { allow_default: bool },
    Single { allow_default: bool },
    Max { allow_default: bool },
    Min { allow_default: bool },
    Count { is_long: bool },
    Any,
    All,
}

impl AggregateOp {
    pub fn name(self) -> &'static str {
        match self {
            AggregateOp::First { .. } => "First",
            AggregateOp::Last { .. } => "Last",
            AggregateOp::Single { .. } => "Single",
            AggregateOp::Max { .. } => "Max",
            AggregateOp::Min { .. } => "Min",
            AggregateOp::Count { .. } => "Count",
            AggregateOp::Any => "Any",
            AggregateOp::All => "All",
        }
    }
}

/// Terminal node: `op` applied to `source`, optionally narrowed by `predicate`.
///
/// After optimization `predicate` is always `MatchAll`; any real predicate
/// has been folded into `source`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateNode {
    pub op: AggregateOp,
    pub source: Box<QueryNode>,
    pub predicate: Box<QueryNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetNode {
    pub source: Box<QueryNode>,
    pub fields: Vec<String>,
    pub min_count: Option<u32>,
    pub filter_values: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    // === Predicates and comparisons ===
    Field(FieldNode),
    Constant(ConstantNode),
    Equal(BinaryNode),
    NotEqual(BinaryNode),
    GreaterThan(BinaryNode),
    GreaterThanOrEqual(BinaryNode),
    LessThan(BinaryNode),
    LessThanOrEqual(BinaryNode),
    Contains(BinaryNode),
    StartsWith(BinaryNode),
    EndsWith(BinaryNode),
    WildcardMatch(BinaryNode),
    /// Regular-expression match. Kept in the tree, rejected by the mapper.
    Matches(BinaryNode),
    Like(LikeNode),
    Between(BetweenNode),
    And(Box<QueryNode>, Box<QueryNode>),
    Or(Box<QueryNode>, Box<QueryNode>),
    Not(Box<QueryNode>),
    MatchAll,
    MatchNone,
    /// Boost decoration for the enclosing comparison; stripped by the optimizer.
    Boost {
        operand: Box<QueryNode>,
        boost: f32,
    },
    /// Arithmetic negation of a value expression.
    Negate(Box<QueryNode>),
    /// Provider-specific extension point; no provider logic is attached.
    Custom(String),

    // === Terminal / aggregate ===
    Aggregate(AggregateNode),
    ElementAt {
        source: Box<QueryNode>,
        index: usize,
        allow_default: bool,
    },

    // === Shaping directives ===
    Where {
        source: Box<QueryNode>,
        predicate: Box<QueryNode>,
    },
    /// Non-scoring constraint routed to the request's filter clause.
    Filter {
        source: Box<QueryNode>,
        predicate: Box<QueryNode>,
    },
    OrderBy {
        source: Box<QueryNode>,
        field: String,
        field_type: ValueType,
        direction: SortDirection,
    },
    Skip {
        source: Box<QueryNode>,
        count: usize,
    },
    Take {
        source: Box<QueryNode>,
        count: usize,
    },
    Select {
        source: Box<QueryNode>,
        field_names: Vec<String>,
    },
    Cast {
        source: Box<QueryNode>,
        target_type: String,
    },
    FacetOn(FacetNode),
    FacetPivotOn(FacetNode),
    GetResults {
        source: Box<QueryNode>,
    },
    GetFacets {
        source: Box<QueryNode>,
    },
}

impl QueryNode {
    /// Variant name, as reported in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryNode::Field(_) => "Field",
            QueryNode::Constant(_) => "Constant",
            QueryNode::Equal(_) => "Equal",
            QueryNode::NotEqual(_) => "NotEqual",
            QueryNode::GreaterThan(_) => "GreaterThan",
            QueryNode::GreaterThanOrEqual(_) => "GreaterThanOrEqual",
            QueryNode::LessThan(_) => "LessThan",
            QueryNode::LessThanOrEqual(_) => "LessThanOrEqual",
            QueryNode::Contains(_) => "Contains",
            QueryNode::StartsWith(_) => "StartsWith",
            QueryNode::EndsWith(_) => "EndsWith",
            QueryNode::WildcardMatch(_) => "WildcardMatch",
            QueryNode::Matches(_) => "Matches",
            QueryNode::Like(_) => "Like",
            QueryNode::Between(_) => "Between",
            QueryNode::And(..) => "And",
            QueryNode::Or(..) => "Or",
            QueryNode::Not(_) => "Not",
            QueryNode::MatchAll => "MatchAll",
            QueryNode::MatchNone => "MatchNone",
            QueryNode::Boost { .. } => "Boost",
            QueryNode::Negate(_) => "Negate",
            QueryNode::Custom(_) => "Custom",
            QueryNode::Aggregate(agg) => agg.op.name(),
            QueryNode::ElementAt { .. } => "ElementAt",
            QueryNode::Where { .. } => "Where",
            QueryNode::Filter { .. } => "Filter",
            QueryNode::OrderBy { .. } => "OrderBy",
            QueryNode::Skip { .. } => "Skip",
            QueryNode::Take { .. } => "Take",
            QueryNode::Select { .. } => "Select",
            QueryNode::Cast { .. } => "Cast",
            QueryNode::FacetOn(_) => "FacetOn",
            QueryNode::FacetPivotOn(_) => "FacetPivotOn",
            QueryNode::GetResults { .. } => "GetResults",
            QueryNode::GetFacets { .. } => "GetFacets",
        }
    }

    /// Statically known truth value of a predicate, if any.
    pub fn bool_value(&self) -> Option<bool> {
        match self {
            QueryNode::MatchAll => Some(true),
            QueryNode::MatchNone => Some(false),
            QueryNode::Constant(ConstantNode {
                value: Value::Bool(b),
                value_type: ValueType::Bool,
            }) => Some(*b),
            _ => None,
        }
    }

    // === Fluent shaping (reads like the front-end's method chain) ===

    pub fn where_(self, predicate: QueryNode) -> Self {
        QueryNode::Where {
            source: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    pub fn filter(self, predicate: QueryNode) -> Self {
        QueryNode::Filter {
            source: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    pub fn order_by(self, field: impl Into<String>, direction: SortDirection) -> Self {
        QueryNode::OrderBy {
            source: Box::new(self),
            field: field.into(),
            field_type: ValueType::String,
            direction,
        }
    }

    pub fn skip(self, count: usize) -> Self {
        QueryNode::Skip {
            source: Box::new(self),
            count,
        }
    }

    pub fn take(self, count: usize) -> Self {
        QueryNode::Take {
            source: Box::new(self),
            count,
        }
    }

    pub fn select<I, S>(self, field_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::Select {
            source: Box::new(self),
            field_names: field_names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn cast(self, target_type: impl Into<String>) -> Self {
        QueryNode::Cast {
            source: Box::new(self),
            target_type: target_type.into(),
        }
    }

    pub fn aggregate(self, op: AggregateOp, predicate: QueryNode) -> Self {
        QueryNode::Aggregate(AggregateNode {
            op,
            source: Box::new(self),
            predicate: Box::new(predicate),
        })
    }

    pub fn first(self) -> Self {
        self.aggregate(AggregateOp::First { allow_default: false }, QueryNode::MatchAll)
    }

    pub fn first_or_default(self) -> Self {
        self.aggregate(AggregateOp::First { allow_default: true }, QueryNode::MatchAll)
    }

    pub fn count(self) -> Self {
        self.aggregate(AggregateOp::Count { is_long: false }, QueryNode::MatchAll)
    }

    pub fn any(self) -> Self {
        self.aggregate(AggregateOp::Any, QueryNode::MatchAll)
    }

    pub fn element_at(self, index: usize, allow_default: bool) -> Self {
        QueryNode::ElementAt {
            source: Box::new(self),
            index,
            allow_default,
        }
    }

    pub fn facet_on(self, field: impl Into<String>, min_count: Option<u32>) -> Self {
        QueryNode::FacetOn(FacetNode {
            source: Box::new(self),
            fields: vec![field.into()],
            min_count,
            filter_values: None,
        })
    }

    pub fn facet_pivot_on<I, S>(self, fields: I, min_count: Option<u32>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        QueryNode::FacetPivotOn(FacetNode {
            source: Box::new(self),
            fields: fields.into_iter().map(Into::into).collect(),
            min_count,
            filter_values: None,
        })
    }

    pub fn get_results(self) -> Self {
        QueryNode::GetResults {
            source: Box::new(self),
        }
    }

    pub fn get_facets(self) -> Self {
        QueryNode::GetFacets {
            source: Box::new(self),
        }
    }

    /// Wrap this node (normally a field) in a boost decoration.
    pub fn boosted(self, boost: f32) -> Self {
        QueryNode::Boost {
            operand: Box::new(self),
            boost,
        }
    }
}

/// Helper functions for building predicate nodes
pub mod build {
    use super::*;

    /// String-typed field reference
    pub fn field(key: impl Into<String>) -> QueryNode {
        typed_field(key, ValueType::String)
    }

    pub fn typed_field(key: impl Into<String>, field_type: ValueType) -> QueryNode {
        QueryNode::Field(FieldNode {
            key: key.into(),
            field_type,
        })
    }

    /// Constant whose static type follows from the literal
    pub fn constant(value: impl Into<Value>) -> QueryNode {
        let value = value.into();
        let value_type = value.value_type();
        QueryNode::Constant(ConstantNode { value, value_type })
    }

    pub fn id(value: impl Into<String>) -> QueryNode {
        constant(Value::Id(value.into()))
    }

    /// The closed-over collection being searched
    pub fn queryable(name: impl Into<String>) -> QueryNode {
        QueryNode::Constant(ConstantNode {
            value: Value::String(name.into()),
            value_type: ValueType::Queryable,
        })
    }

    pub fn eq(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::Equal(BinaryNode::new(left, right))
    }

    pub fn ne(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::NotEqual(BinaryNode::new(left, right))
    }

    pub fn gt(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::GreaterThan(BinaryNode::new(left, right))
    }

    pub fn gte(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::GreaterThanOrEqual(BinaryNode::new(left, right))
    }

    pub fn lt(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::LessThan(BinaryNode::new(left, right))
    }

    pub fn lte(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::LessThanOrEqual(BinaryNode::new(left, right))
    }

    pub fn contains(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::Contains(BinaryNode::new(left, right))
    }

    pub fn starts_with(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::StartsWith(BinaryNode::new(left, right))
    }

    pub fn ends_with(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::EndsWith(BinaryNode::new(left, right))
    }

    pub fn wildcard(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::WildcardMatch(BinaryNode::new(left, right))
    }

    pub fn matches(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::Matches(BinaryNode::new(left, right))
    }

    pub fn like(left: QueryNode, right: QueryNode, min_similarity: f32) -> QueryNode {
        QueryNode::Like(LikeNode {
            left: Box::new(left),
            right: Box::new(right),
            min_similarity,
            boost: 1.0,
        })
    }

    pub fn between(
        field: impl Into<String>,
        from: impl Into<Value>,
        to: impl Into<Value>,
        inclusion: Inclusion,
    ) -> QueryNode {
        QueryNode::Between(BetweenNode {
            field: field.into(),
            from: from.into(),
            to: to.into(),
            inclusion,
        })
    }

    pub fn and(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: QueryNode, right: QueryNode) -> QueryNode {
        QueryNode::Or(Box::new(left), Box::new(right))
    }

    pub fn not(operand: QueryNode) -> QueryNode {
        QueryNode::Not(Box::new(operand))
    }
}
