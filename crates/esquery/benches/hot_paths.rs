use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use esquery::build::*;
use esquery::{
    Document, IndexParameters, InMemoryBackend, QueryMapper, QueryNode, SearchIndex, SearchSettings, SortDirection,
    ValueType, optimize,
};
use serde_json::{Value as Json, json};

fn wide_predicate(width: usize) -> QueryNode {
    (0..width)
        .map(|i| {
            or(
                eq(field(format!("Field {i}")), constant(format!("value {i}"))),
                and(
                    gt(typed_field("price", ValueType::Int), constant(i as i64)),
                    not(contains(field("title"), constant("draft"))),
                ),
            )
        })
        .reduce(and)
        .unwrap_or(QueryNode::MatchAll)
}

fn shaped_query(width: usize) -> QueryNode {
    queryable("items")
        .where_(wide_predicate(width))
        .filter(eq(field("_language"), constant("en")))
        .order_by("price", SortDirection::Descending)
        .skip(10)
        .take(20)
        .facet_on("category", Some(1))
        .get_results()
}

fn seeded_index() -> SearchIndex {
    let docs = (0..5_000).map(|n| {
        serde_json::from_value::<Document>(json!({
            "_uniqueid": n.to_string(),
            "title": format!("item {n}"),
            "price": n % 500,
            "category": format!("c{}", n % 12),
        }))
        .unwrap()
    });
    let backend = InMemoryBackend::new().with_documents("items", docs);
    SearchIndex::new("items", SearchSettings::default(), Arc::new(backend))
}

fn bench_optimize(c: &mut Criterion) {
    let node = shaped_query(32);
    c.bench_function("optimize_wide_query", |b| b.iter(|| optimize(black_box(&node))));
}

fn bench_map(c: &mut Criterion) {
    let mapper = QueryMapper::new(IndexParameters::default());
    let optimized = optimize(&shaped_query(32));
    c.bench_function("map_wide_query", |b| {
        b.iter(|| mapper.map_query(black_box(&optimized)).unwrap())
    });
}

fn bench_execute(c: &mut Criterion) {
    let index = seeded_index();
    let node = queryable("items")
        .where_(lt(typed_field("price", ValueType::Int), constant(100)))
        .order_by("price", SortDirection::Ascending)
        .take(50)
        .get_results();
    c.bench_function("execute_in_memory", |b| {
        b.iter(|| index.execute::<Json>(black_box(&node)).unwrap())
    });
}

criterion_group!(benches, bench_optimize, bench_map, bench_execute);
criterion_main!(benches);
