//! Display for query trees, in the call notation

use std::fmt::{self, Display};

use crate::node::{AggregateNode, AggregateOp, BinaryNode, ConstantNode, FacetNode, Inclusion, QueryNode, SortDirection, Value, ValueType};

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write_float(f, x.to_string()),
            Value::String(s) => write!(f, "{}", Quoted(s)),
            Value::Id(s) => write!(f, "id({})", Quoted(s)),
        }
    }
}

impl Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Field(field) if field.field_type == ValueType::String => {
                write!(f, "field({})", Quoted(&field.key))
            }
            QueryNode::Field(field) => write!(f, "field({}, {})", Quoted(&field.key), field.field_type.name()),
            QueryNode::Constant(constant) => write_constant(f, constant),
            QueryNode::Equal(b) => write_binary(f, "eq", b),
            QueryNode::NotEqual(b) => write_binary(f, "ne", b),
            QueryNode::GreaterThan(b) => write_binary(f, "gt", b),
            QueryNode::GreaterThanOrEqual(b) => write_binary(f, "gte", b),
            QueryNode::LessThan(b) => write_binary(f, "lt", b),
            QueryNode::LessThanOrEqual(b) => write_binary(f, "lte", b),
            QueryNode::Contains(b) => write_binary(f, "contains", b),
            QueryNode::StartsWith(b) => write_binary(f, "starts_with", b),
            QueryNode::EndsWith(b) => write_binary(f, "ends_with", b),
            QueryNode::WildcardMatch(b) => write_binary(f, "wildcard", b),
            QueryNode::Matches(b) => write_binary(f, "matches", b),
            QueryNode::Like(like) => {
                write!(f, "like({}, {}, similarity={}", like.left, like.right, F32(like.min_similarity))?;
                if like.boost != 1.0 {
                    write!(f, ", boost={}", F32(like.boost))?;
                }
                f.write_str(")")
            }
            QueryNode::Between(between) => {
                let inclusion = match between.inclusion {
                    Inclusion::Both => "both",
                    Inclusion::Lower => "lower",
                    Inclusion::Upper => "upper",
                    Inclusion::Neither => "neither",
                };
                write!(
                    f,
                    "between({}, {}, {}, {inclusion})",
                    Quoted(&between.field),
                    between.from,
                    between.to
                )
            }
            QueryNode::And(l, r) => write!(f, "and({l}, {r})"),
            QueryNode::Or(l, r) => write!(f, "or({l}, {r})"),
            QueryNode::Not(x) => write!(f, "not({x})"),
            QueryNode::MatchAll => f.write_str("match_all()"),
            QueryNode::MatchNone => f.write_str("match_none()"),
            QueryNode::Boost { operand, boost } => write!(f, "boost({operand}, {})", F32(*boost)),
            QueryNode::Negate(x) => write!(f, "negate({x})"),
            QueryNode::Custom(name) => write!(f, "custom({})", Quoted(name)),
            QueryNode::Aggregate(agg) => write_aggregate(f, agg),
            QueryNode::ElementAt {
                source,
                index,
                allow_default,
            } => {
                write!(f, "element_at({source}, {index}")?;
                if *allow_default {
                    f.write_str(", or_default=true")?;
                }
                f.write_str(")")
            }
            QueryNode::Where { source, predicate } => write!(f, "where({source}, {predicate})"),
            QueryNode::Filter { source, predicate } => write!(f, "filter({source}, {predicate})"),
            QueryNode::OrderBy {
                source,
                field,
                field_type,
                direction,
            } => {
                let direction = match direction {
                    SortDirection::Ascending => "asc",
                    SortDirection::Descending => "desc",
                };
                write!(f, "order_by({source}, {}, {direction}", Quoted(field))?;
                if *field_type != ValueType::String {
                    write!(f, ", type={}", field_type.name())?;
                }
                f.write_str(")")
            }
            QueryNode::Skip { source, count } => write!(f, "skip({source}, {count})"),
            QueryNode::Take { source, count } => write!(f, "take({source}, {count})"),
            QueryNode::Select { source, field_names } => write!(f, "select({source}, {})", StrList(field_names)),
            QueryNode::Cast { source, target_type } => write!(f, "cast({source}, {})", Quoted(target_type)),
            QueryNode::FacetOn(facet) => write_facet(f, "facet_on", facet),
            QueryNode::FacetPivotOn(facet) => write_facet(f, "facet_pivot_on", facet),
            QueryNode::GetResults { source } => write!(f, "get_results({source})"),
            QueryNode::GetFacets { source } => write!(f, "get_facets({source})"),
        }
    }
}

fn write_constant(f: &mut fmt::Formatter<'_>, constant: &ConstantNode) -> fmt::Result {
    match (&constant.value, constant.value_type) {
        (Value::String(name), ValueType::Queryable) => write!(f, "queryable({})", Quoted(name)),
        (value, ty) if value.value_type() == ty => write!(f, "{value}"),
        (value, ty) => write!(f, "constant({value}, {})", ty.name()),
    }
}

fn write_binary(f: &mut fmt::Formatter<'_>, name: &str, node: &BinaryNode) -> fmt::Result {
    write!(f, "{name}({}, {}", node.left, node.right)?;
    if node.boost != 1.0 {
        write!(f, ", boost={}", F32(node.boost))?;
    }
    f.write_str(")")
}

fn write_aggregate(f: &mut fmt::Formatter<'_>, agg: &AggregateNode) -> fmt::Result {
    write!(f, "{}({}", agg.op.name().to_lowercase(), agg.source)?;
    if !matches!(*agg.predicate, QueryNode::MatchAll) {
        write!(f, ", {}", agg.predicate)?;
    }
    match agg.op {
        AggregateOp::Count { is_long: true } => f.write_str(", long=true")?,
        AggregateOp::First { allow_default: true }
        | AggregateOp::Last { allow_default: true }
        | AggregateOp::Single { allow_default: true }
        | AggregateOp::Max { allow_default: true }
        | AggregateOp::Min { allow_default: true } => f.write_str(", or_default=true")?,
        _ => {}
    }
    f.write_str(")")
}

fn write_facet(f: &mut fmt::Formatter<'_>, name: &str, facet: &FacetNode) -> fmt::Result {
    write!(f, "{name}({}, ", facet.source)?;
    match facet.fields.as_slice() {
        [single] if name == "facet_on" => write!(f, "{}", Quoted(single))?,
        fields => write!(f, "{}", StrList(fields))?,
    }
    if let Some(min) = facet.min_count {
        write!(f, ", min_count={min}")?;
    }
    if let Some(values) = &facet.filter_values {
        write!(f, ", filter={}", StrList(values))?;
    }
    f.write_str(")")
}

/// Floats always carry a decimal point so they read back as floats.
fn write_float(f: &mut fmt::Formatter<'_>, digits: String) -> fmt::Result {
    if digits.contains('.') || digits.contains("inf") || digits.contains("NaN") {
        f.write_str(&digits)
    } else {
        write!(f, "{digits}.0")
    }
}

struct F32(f32);

impl Display for F32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_float(f, self.0.to_string())
    }
}

struct Quoted<'a>(&'a str);

impl Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.0.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\t' => f.write_str("\\t")?,
                '\r' => f.write_str("\\r")?,
                '\0' => f.write_str("\\0")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("\"")
    }
}

struct StrList<'a>(&'a [String]);

impl Display for StrList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", Quoted(item))?;
        }
        f.write_str("]")
    }
}
