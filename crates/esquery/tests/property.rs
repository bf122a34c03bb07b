use esquery::backend::{RawHit, RawResults};
use esquery::build::*;
use esquery::notation::parse;
use esquery::results::apply_security;
use esquery::{
    Document, EsQuery, IndexParameters, QueryMapper, QueryNode, SecurityCheck, SortDirection, ValueType,
    format_field_name, optimize,
};
use proptest::prelude::*;
use serde_json::json;

fn arb_field() -> impl Strategy<Value = QueryNode> {
    prop_oneof![
        Just(field("Title")),
        Just(field("status")),
        Just(typed_field("price", ValueType::Int)),
        Just(typed_field("rating", ValueType::Float)),
    ]
}

fn arb_constant() -> impl Strategy<Value = QueryNode> {
    prop_oneof![
        "[a-z ]{0,6}".prop_map(constant),
        (-1000i64..1000).prop_map(constant),
        (-400i32..400).prop_map(|n| constant(f64::from(n) / 4.0)),
        Just(constant(true)),
        Just(id("{6F1D-22AB}")),
    ]
}

fn arb_comparison() -> impl Strategy<Value = QueryNode> {
    (arb_field(), arb_constant(), 0usize..7, prop_oneof![Just(1.0f32), Just(2.5f32)]).prop_map(
        |(f, c, op, boost)| {
            let f = if boost == 1.0 { f } else { f.boosted(boost) };
            match op {
                0 => eq(f, c),
                1 => ne(f, c),
                2 => gt(f, c),
                3 => lte(c, f),
                4 => contains(f, c),
                5 => starts_with(f, c),
                _ => like(f, c, 0.75),
            }
        },
    )
}

fn arb_predicate() -> impl Strategy<Value = QueryNode> {
    let leaf = prop_oneof![
        4 => arb_comparison(),
        1 => Just(QueryNode::MatchAll),
        1 => Just(QueryNode::MatchNone),
        1 => prop::bool::ANY.prop_map(constant),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| and(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| or(l, r)),
            inner.prop_map(not),
        ]
    })
}

fn arb_query() -> impl Strategy<Value = QueryNode> {
    (arb_predicate(), arb_predicate(), 0usize..50, 1usize..50, prop::bool::ANY).prop_map(
        |(predicate, filter, skip, take, desc)| {
            let direction = if desc {
                SortDirection::Descending
            } else {
                SortDirection::Ascending
            };
            queryable("items")
                .where_(predicate)
                .filter(filter)
                .order_by("price", direction)
                .skip(skip)
                .take(take)
                .get_results()
        },
    )
}

struct EvenIdsVisible;

impl SecurityCheck for EvenIdsVisible {
    fn is_visible(&self, unique_id: &str, _datasource: Option<&str>) -> bool {
        unique_id.parse::<u32>().is_ok_and(|n| n % 2 == 0)
    }
}

proptest! {
    #[test]
    fn optimize_is_idempotent(node in arb_query()) {
        let once = optimize(&node);
        prop_assert_eq!(optimize(&once), once);
    }

    #[test]
    fn notation_round_trips(node in arb_query()) {
        let text = node.to_string();
        let reparsed = parse(&text).expect("printed notation should parse");
        prop_assert_eq!(reparsed, node);
    }

    #[test]
    fn mapping_is_deterministic(node in arb_predicate()) {
        let mapper = QueryMapper::new(IndexParameters::default());
        let optimized = optimize(&node);
        // Unsupported shapes (ranges against booleans and the like) fail the same way twice.
        match (mapper.map_query(&optimized), mapper.map_query(&optimized)) {
            (Ok(a), Ok(b)) => {
                prop_assert_eq!(a.query, b.query);
                prop_assert_eq!(a.methods, b.methods);
            }
            (Err(a), Err(b)) => prop_assert_eq!(a.to_string(), b.to_string()),
            _ => prop_assert!(false, "mapping outcome changed between runs"),
        }
    }

    #[test]
    fn match_none_absorbs_conjunctions(node in arb_predicate()) {
        let mapper = QueryMapper::new(IndexParameters::default());
        let compiled = mapper.map_query(&optimize(&and(node, QueryNode::MatchNone)));
        prop_assert_eq!(compiled.expect("match_none always maps").query, EsQuery::MatchNone);
    }

    #[test]
    fn field_name_formatting_is_idempotent(name in "[A-Za-z _]{0,12}") {
        let once = format_field_name(&name);
        prop_assert_eq!(format_field_name(&once), once.clone());
        prop_assert!(!once.contains(' '));
    }

    #[test]
    fn security_removes_exactly_the_hidden_hits(ids in prop::collection::vec(prop::option::of(0u32..100), 0..20), extra in 0u64..50) {
        let hits: Vec<RawHit> = ids
            .iter()
            .map(|id| {
                let value = match id {
                    Some(n) => json!({ "_uniqueid": n.to_string() }),
                    None => json!({ "title": "anonymous" }),
                };
                RawHit::new(serde_json::from_value::<Document>(value).unwrap())
            })
            .collect();
        let total = hits.len() as u64 + extra;
        let hidden = ids.iter().filter(|id| matches!(id, Some(n) if n % 2 == 1)).count() as u64;

        let filtered = apply_security(
            RawResults { hits, total, facets: Default::default() },
            &EvenIdsVisible,
        );
        prop_assert_eq!(filtered.total, total - hidden);
        prop_assert_eq!(filtered.hits.len() as u64, ids.len() as u64 - hidden);
    }
}
