//! Query optimizer
//!
//! A single bottom-up rewrite that normalizes a node tree before mapping:
//! - constant-folds And/Or/Not over statically known predicates
//! - collapses double negation and rewrites `NotEqual` as `Not(Equal)`
//! - folds terminal predicates into their source
//! - strips `Boost` decorations onto the comparison they enclose
//!
//! The pass never changes which documents match; when a node cannot be
//! simplified it is rebuilt with optimized children.

use crate::node::{
    AggregateNode, BinaryNode, ConstantNode, FacetNode, LikeNode, QueryNode, ValueType,
};

/// Traversal state threaded through one optimization call.
#[derive(Debug, Clone, Default)]
pub struct OptimizerState {
    /// Boost of a `Boost`-wrapped field, consumed by the comparison enclosing it.
    pub boost: Option<f32>,
}

/// Optimize a query tree.
pub fn optimize(root: &QueryNode) -> QueryNode {
    let mut state = OptimizerState::default();
    let optimized = visit(root, &mut state);
    log::trace!("optimized {} -> {}", root.kind(), optimized.kind());
    optimized
}

fn visit(node: &QueryNode, state: &mut OptimizerState) -> QueryNode {
    match node {
        QueryNode::Field(_)
        | QueryNode::Between(_)
        | QueryNode::StartsWith(_)
        | QueryNode::EndsWith(_)
        | QueryNode::Matches(_)
        | QueryNode::Custom(_)
        | QueryNode::MatchAll
        | QueryNode::MatchNone => node.clone(),

        QueryNode::Constant(ConstantNode {
            value_type: ValueType::Queryable,
            ..
        }) => QueryNode::MatchAll,
        QueryNode::Constant(_) => node.clone(),

        QueryNode::And(left, right) => {
            let left = visit(left, state);
            let right = visit(right, state);
            fold_and(left, right)
        }
        QueryNode::Or(left, right) => {
            let left = visit(left, state);
            let right = visit(right, state);
            fold_or(left, right)
        }
        QueryNode::Not(operand) => visit_not(operand, state),
        QueryNode::NotEqual(b) => visit_not(&QueryNode::Equal(b.clone()), state),

        QueryNode::Equal(_)
        | QueryNode::GreaterThan(_)
        | QueryNode::GreaterThanOrEqual(_)
        | QueryNode::LessThan(_)
        | QueryNode::LessThanOrEqual(_)
        | QueryNode::Contains(_)
        | QueryNode::WildcardMatch(_)
        | QueryNode::Like(_) => visit_boostable(node, state, None),

        QueryNode::Boost { operand, boost } => match operand.as_ref() {
            // Picked up by the enclosing comparison.
            QueryNode::Field(_) => {
                state.boost = Some(*boost);
                visit(operand, state)
            }
            _ => {
                state.boost = None;
                visit_boostable(operand, state, Some(*boost))
            }
        },
        QueryNode::Negate(operand) => QueryNode::Negate(Box::new(visit(operand, state))),

        QueryNode::Aggregate(agg) => visit_aggregate(agg, state),
        QueryNode::ElementAt {
            source,
            index,
            allow_default,
        } => QueryNode::ElementAt {
            source: Box::new(visit(source, state)),
            index: *index,
            allow_default: *allow_default,
        },

        QueryNode::Where { source, predicate } => visit_where(source, predicate, state),
        QueryNode::Filter { source, predicate } => {
            let source = visit(source, state);
            let predicate = visit(predicate, state);
            QueryNode::Filter {
                source: Box::new(source),
                predicate: Box::new(predicate),
            }
        }
        QueryNode::OrderBy {
            source,
            field,
            field_type,
            direction,
        } => QueryNode::OrderBy {
            source: Box::new(visit(source, state)),
            field: field.clone(),
            field_type: *field_type,
            direction: *direction,
        },
        QueryNode::Skip { source, count } => QueryNode::Skip {
            source: Box::new(visit(source, state)),
            count: *count,
        },
        QueryNode::Take { source, count } => QueryNode::Take {
            source: Box::new(visit(source, state)),
            count: *count,
        },
        QueryNode::Select {
            source,
            field_names,
        } => QueryNode::Select {
            source: Box::new(visit(source, state)),
            field_names: field_names.clone(),
        },
        QueryNode::Cast {
            source,
            target_type,
        } => QueryNode::Cast {
            source: Box::new(visit(source, state)),
            target_type: target_type.clone(),
        },
        QueryNode::FacetOn(facet) => QueryNode::FacetOn(visit_facet(facet, state)),
        QueryNode::FacetPivotOn(facet) => QueryNode::FacetPivotOn(visit_facet(facet, state)),
        QueryNode::GetResults { source } => QueryNode::GetResults {
            source: Box::new(visit(source, state)),
        },
        QueryNode::GetFacets { source } => QueryNode::GetFacets {
            source: Box::new(visit(source, state)),
        },
    }
}

/// Rebuild a comparison. `inherited` is the boost of a `Boost` wrapping the
/// comparison itself; a boost on its field operand wins over it. Nodes that
/// take no boost are visited normally and the boost is dropped.
fn visit_boostable(node: &QueryNode, state: &mut OptimizerState, inherited: Option<f32>) -> QueryNode {
    match node {
        QueryNode::Equal(b) => QueryNode::Equal(visit_comparison(b, state, inherited)),
        QueryNode::GreaterThan(b) => QueryNode::GreaterThan(visit_comparison(b, state, inherited)),
        QueryNode::GreaterThanOrEqual(b) => {
            QueryNode::GreaterThanOrEqual(visit_comparison(b, state, inherited))
        }
        QueryNode::LessThan(b) => QueryNode::LessThan(visit_comparison(b, state, inherited)),
        QueryNode::LessThanOrEqual(b) => {
            QueryNode::LessThanOrEqual(visit_comparison(b, state, inherited))
        }
        QueryNode::Contains(b) => QueryNode::Contains(visit_comparison(b, state, inherited)),
        QueryNode::WildcardMatch(b) => {
            QueryNode::WildcardMatch(visit_comparison(b, state, inherited))
        }
        QueryNode::Like(like) => {
            state.boost = None;
            let left = visit(&like.left, state);
            let right = visit(&like.right, state);
            QueryNode::Like(LikeNode {
                left: Box::new(left),
                right: Box::new(right),
                min_similarity: like.min_similarity,
                boost: take_boost(state, inherited, like.boost),
            })
        }
        _ => visit(node, state),
    }
}

fn visit_comparison(node: &BinaryNode, state: &mut OptimizerState, inherited: Option<f32>) -> BinaryNode {
    state.boost = None;
    let left = visit(&node.left, state);
    let right = visit(&node.right, state);
    BinaryNode {
        left: Box::new(left),
        right: Box::new(right),
        boost: take_boost(state, inherited, node.boost),
    }
}

fn take_boost(state: &mut OptimizerState, inherited: Option<f32>, own: f32) -> f32 {
    state.boost.take().or(inherited).unwrap_or(own)
}

fn visit_not(operand: &QueryNode, state: &mut OptimizerState) -> QueryNode {
    let operand = visit(operand, state);
    if let QueryNode::Not(inner) = operand {
        return *inner;
    }
    match operand.bool_value() {
        Some(true) => QueryNode::MatchNone,
        Some(false) => QueryNode::MatchAll,
        None => QueryNode::Not(Box::new(operand)),
    }
}

/// And over already-optimized operands.
pub(crate) fn fold_and(left: QueryNode, right: QueryNode) -> QueryNode {
    match (left.bool_value(), right.bool_value()) {
        (None, None) => QueryNode::And(Box::new(left), Box::new(right)),
        (Some(l), Some(r)) => {
            if l && r {
                QueryNode::MatchAll
            } else {
                QueryNode::MatchNone
            }
        }
        (Some(false), None) | (None, Some(false)) => QueryNode::MatchNone,
        (Some(true), None) => right,
        (None, Some(true)) => left,
    }
}

/// Or over already-optimized operands.
pub(crate) fn fold_or(left: QueryNode, right: QueryNode) -> QueryNode {
    match (left.bool_value(), right.bool_value()) {
        (None, None) => QueryNode::Or(Box::new(left), Box::new(right)),
        (Some(l), Some(r)) => {
            if l || r {
                QueryNode::MatchAll
            } else {
                QueryNode::MatchNone
            }
        }
        (Some(true), None) | (None, Some(true)) => QueryNode::MatchAll,
        (Some(false), None) => right,
        (None, Some(false)) => left,
    }
}

fn visit_aggregate(node: &AggregateNode, state: &mut OptimizerState) -> QueryNode {
    let source = visit(&node.source, state);
    let predicate = visit(&node.predicate, state);
    let source = if predicate.bool_value() == Some(true) {
        source
    } else {
        fold_and(source, predicate)
    };
    QueryNode::Aggregate(AggregateNode {
        op: node.op,
        source: Box::new(source),
        predicate: Box::new(QueryNode::MatchAll),
    })
}

fn visit_where(source: &QueryNode, predicate: &QueryNode, state: &mut OptimizerState) -> QueryNode {
    let source = visit(source, state);
    let predicate = visit(predicate, state);
    match predicate.bool_value() {
        Some(true) => source,
        Some(false) => QueryNode::MatchNone,
        None => match source.bool_value() {
            Some(true) => predicate,
            Some(false) => QueryNode::MatchNone,
            None => QueryNode::Where {
                source: Box::new(source),
                predicate: Box::new(predicate),
            },
        },
    }
}

fn visit_facet(node: &FacetNode, state: &mut OptimizerState) -> FacetNode {
    FacetNode {
        source: Box::new(visit(&node.source, state)),
        fields: node.fields.clone(),
        min_count: node.min_count,
        filter_values: node.filter_values.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::build::*;
    use crate::node::{AggregateOp, Inclusion, SortDirection};

    fn status_published() -> QueryNode {
        eq(field("status"), constant("published"))
    }

    #[test]
    fn and_with_match_all_keeps_other_side() {
        let node = and(QueryNode::MatchAll, status_published());
        assert_eq!(optimize(&node), optimize(&status_published()));
    }

    #[test]
    fn and_with_match_none_is_match_none() {
        let node = and(status_published(), QueryNode::MatchNone);
        assert_eq!(optimize(&node), QueryNode::MatchNone);
    }

    #[test]
    fn or_with_known_true_is_match_all() {
        let node = or(status_published(), constant(true));
        assert_eq!(optimize(&node), QueryNode::MatchAll);
    }

    #[test]
    fn or_with_known_false_keeps_other_side() {
        let node = or(QueryNode::MatchNone, status_published());
        assert_eq!(optimize(&node), status_published());
    }

    #[test]
    fn double_negation_collapses() {
        let node = not(not(status_published()));
        assert_eq!(optimize(&node), status_published());
    }

    #[test]
    fn not_inverts_known_values() {
        assert_eq!(optimize(&not(QueryNode::MatchAll)), QueryNode::MatchNone);
        assert_eq!(optimize(&not(constant(false))), QueryNode::MatchAll);
    }

    #[test]
    fn not_equal_becomes_negated_equal() {
        let node = ne(field("status"), constant("draft"));
        assert_eq!(
            optimize(&node),
            not(eq(field("status"), constant("draft")))
        );
    }

    #[test]
    fn queryable_constant_becomes_match_all() {
        assert_eq!(optimize(&queryable("items")), QueryNode::MatchAll);
    }

    #[test]
    fn where_over_whole_collection_is_just_the_predicate() {
        let node = queryable("items").where_(status_published());
        assert_eq!(optimize(&node), status_published());
    }

    #[test]
    fn where_with_false_predicate_is_match_none() {
        let node = queryable("items")
            .where_(status_published())
            .where_(constant(false));
        assert_eq!(optimize(&node), QueryNode::MatchNone);
    }

    #[test]
    fn terminal_predicate_is_folded_into_source() {
        let node = queryable("items")
            .where_(status_published())
            .aggregate(
                AggregateOp::First {
                    allow_default: false,
                },
                gt(field("price"), constant(10)),
            );
        match optimize(&node) {
            QueryNode::Aggregate(agg) => {
                assert_eq!(*agg.predicate, QueryNode::MatchAll);
                assert_eq!(
                    *agg.source,
                    and(status_published(), gt(field("price"), constant(10)))
                );
            }
            other => panic!("expected aggregate, got {}", other.kind()),
        }
    }

    #[test]
    fn count_with_match_none_predicate_folds_to_match_none() {
        let node = queryable("items").aggregate(
            AggregateOp::Count { is_long: false },
            QueryNode::MatchNone,
        );
        match optimize(&node) {
            QueryNode::Aggregate(agg) => assert_eq!(*agg.source, QueryNode::MatchNone),
            other => panic!("expected aggregate, got {}", other.kind()),
        }
    }

    #[test]
    fn boost_is_carried_onto_enclosing_comparison() {
        let node = eq(field("title").boosted(2.5), constant("home"));
        match optimize(&node) {
            QueryNode::Equal(b) => {
                assert_eq!(b.boost, 2.5);
                assert_eq!(*b.left, field("title"));
            }
            other => panic!("expected Equal, got {}", other.kind()),
        }
    }

    #[test]
    fn boost_survives_a_second_pass() {
        let node = contains(field("title").boosted(3.0), constant("news"));
        let once = optimize(&node);
        assert_eq!(optimize(&once), once);
    }

    #[test]
    fn boost_on_unboostable_node_stays_put() {
        let node = and(
            between("price", 1, 5, Inclusion::Both).boosted(5.0),
            eq(field("status"), constant("x")),
        );
        assert_eq!(
            optimize(&node),
            and(
                between("price", 1, 5, Inclusion::Both),
                eq(field("status"), constant("x"))
            )
        );
    }

    #[test]
    fn boost_around_conjunction_does_not_reach_its_children() {
        let node = and(status_published(), gt(field("price"), constant(10))).boosted(4.0);
        assert_eq!(
            optimize(&node),
            and(status_published(), gt(field("price"), constant(10)))
        );
    }

    #[test]
    fn boost_around_comparison_applies_to_it_only() {
        let node = or(
            eq(field("title"), constant("home")).boosted(2.0),
            eq(field("status"), constant("x")),
        );
        match optimize(&node) {
            QueryNode::Or(left, right) => {
                assert!(matches!(*left, QueryNode::Equal(ref b) if b.boost == 2.0));
                assert!(matches!(*right, QueryNode::Equal(ref b) if b.boost == 1.0));
            }
            other => panic!("expected Or, got {}", other.kind()),
        }
    }

    #[test]
    fn shaping_nodes_are_rebuilt_around_optimized_source() {
        let node = queryable("items")
            .where_(and(constant(true), status_published()))
            .order_by("Title", SortDirection::Descending)
            .take(3);
        let expected = status_published()
            .order_by("Title", SortDirection::Descending)
            .take(3);
        assert_eq!(optimize(&node), expected);
    }
}
