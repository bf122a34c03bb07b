//! Lowering from parsed terms to query nodes

use super::NotationError;
use super::parse::Term;
use crate::node::build;
use crate::node::{
    AggregateOp, BetweenNode, BinaryNode, ConstantNode, FacetNode, Inclusion, LikeNode, QueryNode,
    SortDirection, Value, ValueType,
};

type Result<T> = std::result::Result<T, NotationError>;

fn invalid(message: impl Into<String>) -> NotationError {
    NotationError::Invalid(message.into())
}

pub(super) fn lower(term: &Term) -> Result<QueryNode> {
    match term {
        Term::Literal(value) => Ok(build::constant(value.clone())),
        Term::Call { name, args, kwargs } => lower_call(&Call { name, args, kwargs }),
        Term::List(_) => Err(invalid("a list cannot be used as a query node")),
        Term::Ident(name) => Err(invalid(format!("unexpected identifier '{name}'"))),
    }
}

struct Call<'a> {
    name: &'a str,
    args: &'a [Term],
    kwargs: &'a [(String, Term)],
}

impl Call<'_> {
    fn arity(&self, min: usize, max: usize) -> Result<()> {
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{min} to {max}")
            };
            return Err(invalid(format!(
                "{}() expects {expected} positional arguments, got {n}",
                self.name
            )));
        }
        Ok(())
    }

    fn keywords(&self, allowed: &[&str]) -> Result<()> {
        for (key, _) in self.kwargs {
            if !allowed.contains(&key.as_str()) {
                return Err(invalid(format!("{}() has no keyword '{key}'", self.name)));
            }
        }
        Ok(())
    }

    fn shape(&self, min: usize, max: usize, keywords: &[&str]) -> Result<()> {
        self.arity(min, max)?;
        self.keywords(keywords)
    }

    fn node(&self, i: usize) -> Result<QueryNode> {
        lower(&self.args[i])
    }

    fn boxed(&self, i: usize) -> Result<Box<QueryNode>> {
        self.node(i).map(Box::new)
    }

    fn value(&self, i: usize) -> Result<Value> {
        value_of(&self.args[i]).ok_or_else(|| self.wrong(i, "a literal value"))
    }

    fn string(&self, i: usize) -> Result<String> {
        match &self.args[i] {
            Term::Literal(Value::String(s)) => Ok(s.clone()),
            _ => Err(self.wrong(i, "a string")),
        }
    }

    fn strings(&self, i: usize) -> Result<Vec<String>> {
        strings_of(&self.args[i]).ok_or_else(|| self.wrong(i, "a list of strings"))
    }

    fn count(&self, i: usize) -> Result<usize> {
        match &self.args[i] {
            Term::Literal(Value::Int(n)) => usize::try_from(*n).map_err(|_| self.wrong(i, "a non-negative integer")),
            _ => Err(self.wrong(i, "a non-negative integer")),
        }
    }

    fn ident(&self, i: usize) -> Result<&str> {
        match &self.args[i] {
            Term::Ident(name) => Ok(name),
            _ => Err(self.wrong(i, "an identifier")),
        }
    }

    fn kwarg(&self, key: &str) -> Option<&Term> {
        self.kwargs.iter().find(|(k, _)| k == key).map(|(_, t)| t)
    }

    fn kw_bool(&self, key: &str) -> Result<bool> {
        match self.kwarg(key) {
            None => Ok(false),
            Some(Term::Literal(Value::Bool(b))) => Ok(*b),
            Some(_) => Err(invalid(format!("{}(): '{key}' must be true or false", self.name))),
        }
    }

    fn kw_f32(&self, key: &str, default: f32) -> Result<f32> {
        match self.kwarg(key) {
            None => Ok(default),
            Some(Term::Literal(Value::Float(x))) => Ok(*x as f32),
            Some(Term::Literal(Value::Int(n))) => Ok(*n as f32),
            Some(_) => Err(invalid(format!("{}(): '{key}' must be a number", self.name))),
        }
    }

    fn kw_u32(&self, key: &str) -> Result<Option<u32>> {
        match self.kwarg(key) {
            None => Ok(None),
            Some(Term::Literal(Value::Int(n))) => u32::try_from(*n)
                .map(Some)
                .map_err(|_| invalid(format!("{}(): '{key}' is out of range", self.name))),
            Some(_) => Err(invalid(format!("{}(): '{key}' must be an integer", self.name))),
        }
    }

    fn kw_strings(&self, key: &str) -> Result<Option<Vec<String>>> {
        self.kwarg(key)
            .map(|t| strings_of(t).ok_or_else(|| invalid(format!("{}(): '{key}' must be a list of strings", self.name))))
            .transpose()
    }

    fn wrong(&self, i: usize, expected: &str) -> NotationError {
        invalid(format!("{}(): argument {} must be {expected}", self.name, i + 1))
    }
}

fn value_of(term: &Term) -> Option<Value> {
    match term {
        Term::Literal(v) => Some(v.clone()),
        Term::Call { name, args, kwargs } if name == "id" && kwargs.is_empty() => match args.as_slice() {
            [Term::Literal(Value::String(s))] => Some(Value::Id(s.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn strings_of(term: &Term) -> Option<Vec<String>> {
    let Term::List(items) = term else {
        return None;
    };
    items
        .iter()
        .map(|item| match item {
            Term::Literal(Value::String(s)) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

fn value_type(call: &Call<'_>, name: &str) -> Result<ValueType> {
    ValueType::from_name(name).ok_or_else(|| invalid(format!("{}(): unknown type '{name}'", call.name)))
}

fn lower_call(call: &Call<'_>) -> Result<QueryNode> {
    match call.name {
        // ============ Leaves ============
        "field" => {
            call.shape(1, 2, &[])?;
            let field_type = match call.args.get(1) {
                Some(_) => value_type(call, call.ident(1)?)?,
                None => ValueType::String,
            };
            Ok(build::typed_field(call.string(0)?, field_type))
        }
        "queryable" => {
            call.shape(1, 1, &[])?;
            Ok(build::queryable(call.string(0)?))
        }
        "id" => {
            call.shape(1, 1, &[])?;
            Ok(build::id(call.string(0)?))
        }
        "constant" => {
            call.shape(1, 2, &[])?;
            let value = call.value(0)?;
            let value_type = match call.args.get(1) {
                Some(_) => value_type(call, call.ident(1)?)?,
                None => value.value_type(),
            };
            Ok(QueryNode::Constant(ConstantNode { value, value_type }))
        }
        "custom" => {
            call.shape(1, 1, &[])?;
            Ok(QueryNode::Custom(call.string(0)?))
        }
        "match_all" => {
            call.shape(0, 0, &[])?;
            Ok(QueryNode::MatchAll)
        }
        "match_none" => {
            call.shape(0, 0, &[])?;
            Ok(QueryNode::MatchNone)
        }

        // ============ Comparisons ============
        "eq" | "ne" | "gt" | "gte" | "lt" | "lte" | "contains" | "starts_with" | "ends_with" | "wildcard"
        | "matches" => lower_binary(call),
        "like" => {
            call.shape(2, 2, &["similarity", "boost"])?;
            Ok(QueryNode::Like(LikeNode {
                left: call.boxed(0)?,
                right: call.boxed(1)?,
                min_similarity: call.kw_f32("similarity", 0.5)?,
                boost: call.kw_f32("boost", 1.0)?,
            }))
        }
        "between" => {
            call.shape(3, 4, &[])?;
            let inclusion = match call.args.get(3) {
                None => Inclusion::Both,
                Some(_) => match call.ident(3)? {
                    "both" => Inclusion::Both,
                    "lower" => Inclusion::Lower,
                    "upper" => Inclusion::Upper,
                    "neither" => Inclusion::Neither,
                    other => return Err(invalid(format!("between(): unknown inclusion '{other}'"))),
                },
            };
            Ok(QueryNode::Between(BetweenNode {
                field: call.string(0)?,
                from: call.value(1)?,
                to: call.value(2)?,
                inclusion,
            }))
        }

        // ============ Logic ============
        "and" | "or" => {
            call.shape(2, 2, &[])?;
            let (l, r) = (call.boxed(0)?, call.boxed(1)?);
            Ok(if call.name == "and" {
                QueryNode::And(l, r)
            } else {
                QueryNode::Or(l, r)
            })
        }
        "not" => {
            call.shape(1, 1, &[])?;
            Ok(QueryNode::Not(call.boxed(0)?))
        }
        "negate" => {
            call.shape(1, 1, &[])?;
            Ok(QueryNode::Negate(call.boxed(0)?))
        }
        "boost" => {
            call.shape(2, 2, &[])?;
            let boost = match call.value(1)? {
                Value::Float(x) => x as f32,
                Value::Int(n) => n as f32,
                _ => return Err(call.wrong(1, "a number")),
            };
            Ok(QueryNode::Boost {
                operand: call.boxed(0)?,
                boost,
            })
        }

        // ============ Terminal ============
        "first" | "last" | "single" | "max" | "min" | "count" | "any" | "all" => lower_aggregate(call),
        "element_at" => {
            call.shape(2, 2, &["or_default"])?;
            Ok(QueryNode::ElementAt {
                source: call.boxed(0)?,
                index: call.count(1)?,
                allow_default: call.kw_bool("or_default")?,
            })
        }

        // ============ Shaping ============
        "where" | "filter" => {
            call.shape(2, 2, &[])?;
            let (source, predicate) = (call.boxed(0)?, call.boxed(1)?);
            Ok(if call.name == "where" {
                QueryNode::Where { source, predicate }
            } else {
                QueryNode::Filter { source, predicate }
            })
        }
        "order_by" => {
            call.shape(3, 3, &["type"])?;
            let direction = match call.ident(2)? {
                "asc" => SortDirection::Ascending,
                "desc" => SortDirection::Descending,
                other => return Err(invalid(format!("order_by(): unknown direction '{other}'"))),
            };
            let field_type = match call.kwarg("type") {
                None => ValueType::String,
                Some(Term::Ident(name)) => value_type(call, name)?,
                Some(_) => return Err(invalid("order_by(): 'type' must be a type name")),
            };
            Ok(QueryNode::OrderBy {
                source: call.boxed(0)?,
                field: call.string(1)?,
                field_type,
                direction,
            })
        }
        "skip" | "take" => {
            call.shape(2, 2, &[])?;
            let (source, count) = (call.boxed(0)?, call.count(1)?);
            Ok(if call.name == "skip" {
                QueryNode::Skip { source, count }
            } else {
                QueryNode::Take { source, count }
            })
        }
        "select" => {
            call.shape(2, 2, &[])?;
            Ok(QueryNode::Select {
                source: call.boxed(0)?,
                field_names: call.strings(1)?,
            })
        }
        "cast" => {
            call.shape(2, 2, &[])?;
            Ok(QueryNode::Cast {
                source: call.boxed(0)?,
                target_type: call.string(1)?,
            })
        }
        "facet_on" | "facet_pivot_on" => {
            call.shape(2, 2, &["min_count", "filter"])?;
            let fields = match &call.args[1] {
                Term::Literal(Value::String(s)) if call.name == "facet_on" => vec![s.clone()],
                _ => call.strings(1)?,
            };
            let facet = FacetNode {
                source: call.boxed(0)?,
                fields,
                min_count: call.kw_u32("min_count")?,
                filter_values: call.kw_strings("filter")?,
            };
            Ok(if call.name == "facet_on" {
                QueryNode::FacetOn(facet)
            } else {
                QueryNode::FacetPivotOn(facet)
            })
        }
        "get_results" => {
            call.shape(1, 1, &[])?;
            Ok(QueryNode::GetResults { source: call.boxed(0)? })
        }
        "get_facets" => {
            call.shape(1, 1, &[])?;
            Ok(QueryNode::GetFacets { source: call.boxed(0)? })
        }
        other => Err(invalid(format!("unknown function '{other}'"))),
    }
}

fn lower_binary(call: &Call<'_>) -> Result<QueryNode> {
    call.shape(2, 2, &["boost"])?;
    let node = BinaryNode {
        boost: call.kw_f32("boost", 1.0)?,
        ..BinaryNode::new(call.node(0)?, call.node(1)?)
    };
    Ok(match call.name {
        "eq" => QueryNode::Equal(node),
        "ne" => QueryNode::NotEqual(node),
        "gt" => QueryNode::GreaterThan(node),
        "gte" => QueryNode::GreaterThanOrEqual(node),
        "lt" => QueryNode::LessThan(node),
        "lte" => QueryNode::LessThanOrEqual(node),
        "contains" => QueryNode::Contains(node),
        "starts_with" => QueryNode::StartsWith(node),
        "ends_with" => QueryNode::EndsWith(node),
        "wildcard" => QueryNode::WildcardMatch(node),
        _ => QueryNode::Matches(node),
    })
}

fn lower_aggregate(call: &Call<'_>) -> Result<QueryNode> {
    let op = match call.name {
        "count" => {
            call.shape(1, 2, &["long"])?;
            AggregateOp::Count {
                is_long: call.kw_bool("long")?,
            }
        }
        "any" | "all" => {
            call.shape(1, 2, &[])?;
            if call.name == "any" {
                AggregateOp::Any
            } else {
                AggregateOp::All
            }
        }
        name => {
            call.shape(1, 2, &["or_default"])?;
            let allow_default = call.kw_bool("or_default")?;
            match name {
                "first" => AggregateOp::First { allow_default },
                "last" => AggregateOp::Last { allow_default },
                "single" => AggregateOp::Single { allow_default },
                "max" => AggregateOp::Max { allow_default },
                _ => AggregateOp::Min { allow_default },
            }
        }
    };
    let predicate = match call.args.get(1) {
        Some(_) => call.node(1)?,
        None => QueryNode::MatchAll,
    };
    Ok(call.node(0)?.aggregate(op, predicate))
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;
    use crate::node::build::*;

    #[test]
    fn lowers_shaping_chain() {
        let node = parse(r#"take(skip(where(queryable("items"), gt(field("price", int), 10)), 5), 20)"#).unwrap();
        let expected = queryable("items")
            .where_(gt(typed_field("price", ValueType::Int), constant(10)))
            .skip(5)
            .take(20);
        assert_eq!(node, expected);
    }

    #[test]
    fn comparison_boost_keyword() {
        let node = parse(r#"eq(field("title"), "home", boost=2.0)"#).unwrap();
        let QueryNode::Equal(binary) = node else {
            panic!("expected Equal");
        };
        assert_eq!(binary.boost, 2.0);
    }

    #[test]
    fn ids_in_value_positions() {
        let node = parse(r#"between("parent", id("{ABC}"), id("{DEF}"), neither)"#).unwrap();
        assert_eq!(
            node,
            between("parent", Value::Id("{ABC}".into()), Value::Id("{DEF}".into()), Inclusion::Neither)
        );
    }

    #[test]
    fn aggregate_with_predicate_and_default() {
        let node = parse(r#"first(queryable("items"), eq(field("a"), 1), or_default=true)"#).unwrap();
        assert_eq!(
            node,
            queryable("items").aggregate(
                AggregateOp::First { allow_default: true },
                eq(field("a"), constant(1))
            )
        );
    }

    #[test]
    fn facets_accept_filters() {
        let node = parse(r#"facet_on(queryable("items"), "color", min_count=2, filter=["red"])"#).unwrap();
        let QueryNode::FacetOn(facet) = node else {
            panic!("expected FacetOn");
        };
        assert_eq!(facet.fields, vec!["color"]);
        assert_eq!(facet.min_count, Some(2));
        assert_eq!(facet.filter_values, Some(vec!["red".to_string()]));
    }

    #[test]
    fn arity_errors_name_the_function() {
        let err = parse(r#"eq(field("a"))"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "eq() expects 2 positional arguments, got 1"
        );
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(parse("frobnicate()"), Err(NotationError::Invalid(_))));
        assert!(matches!(
            parse(r#"first(queryable("items"), bogus=true)"#),
            Err(NotationError::Invalid(_))
        ));
        assert!(matches!(parse("skip(queryable(\"x\"), -1)"), Err(NotationError::Invalid(_))));
    }
}
