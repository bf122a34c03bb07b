//! Backend query object
//!
//! `EsQuery` is what every mapper step returns. The mapper only composes
//! these values (`and`, `or`, `not`) and checks for the two trivial cases;
//! rendering to the Elasticsearch query DSL happens in [`EsQuery::to_dsl`].

use std::fmt;

use serde_json::{Map, Value as Json, json};

#[derive(Debug, Clone, PartialEq)]
pub enum EsQuery {
    MatchAll,
    MatchNone,
    Term {
        field: String,
        value: String,
        boost: Option<f32>,
    },
    Range(RangeQuery),
    Wildcard {
        field: String,
        pattern: String,
        boost: Option<f32>,
    },
    Prefix {
        field: String,
        value: String,
        boost: Option<f32>,
    },
    Fuzzy {
        field: String,
        value: String,
        min_similarity: f32,
        boost: f32,
    },
    /// Field absent (or empty) on the document.
    Missing {
        field: String,
    },
    Bool(BoolQuery),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RangeQuery {
    pub field: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub include_lower: bool,
    pub include_upper: bool,
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolQuery {
    pub must: Vec<EsQuery>,
    pub should: Vec<EsQuery>,
    pub must_not: Vec<EsQuery>,
}

impl BoolQuery {
    fn only_must(&self) -> bool {
        self.should.is_empty() && self.must_not.is_empty()
    }

    fn only_should(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }
}

impl EsQuery {
    pub fn term(field: impl Into<String>, value: impl Into<String>) -> Self {
        EsQuery::Term {
            field: field.into(),
            value: value.into(),
            boost: None,
        }
    }

    pub fn wildcard(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        EsQuery::Wildcard {
            field: field.into(),
            pattern: pattern.into(),
            boost: None,
        }
    }

    pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> Self {
        EsQuery::Prefix {
            field: field.into(),
            value: value.into(),
            boost: None,
        }
    }

    /// Trivially true: matches every document.
    pub fn is_match_all(&self) -> bool {
        matches!(self, EsQuery::MatchAll)
    }

    pub fn is_match_none(&self) -> bool {
        matches!(self, EsQuery::MatchNone)
    }

    /// Attach a boost to leaf queries; compound queries are returned unchanged.
    pub fn with_boost(self, boost: f32) -> Self {
        match self {
            EsQuery::Term { field, value, .. } => EsQuery::Term {
                field,
                value,
                boost: Some(boost),
            },
            EsQuery::Range(range) => EsQuery::Range(RangeQuery {
                boost: Some(boost),
                ..range
            }),
            EsQuery::Wildcard { field, pattern, .. } => EsQuery::Wildcard {
                field,
                pattern,
                boost: Some(boost),
            },
            EsQuery::Prefix { field, value, .. } => EsQuery::Prefix {
                field,
                value,
                boost: Some(boost),
            },
            EsQuery::Fuzzy {
                field,
                value,
                min_similarity,
                ..
            } => EsQuery::Fuzzy {
                field,
                value,
                min_similarity,
                boost,
            },
            other => other,
        }
    }

    pub fn and(self, other: EsQuery) -> EsQuery {
        match (self, other) {
            (EsQuery::MatchNone, _) | (_, EsQuery::MatchNone) => EsQuery::MatchNone,
            (EsQuery::MatchAll, q) | (q, EsQuery::MatchAll) => q,
            (EsQuery::Bool(mut l), EsQuery::Bool(r)) if l.only_must() && r.only_must() => {
                l.must.extend(r.must);
                EsQuery::Bool(l)
            }
            (EsQuery::Bool(mut l), q) if l.only_must() => {
                l.must.push(q);
                EsQuery::Bool(l)
            }
            (l, q) => EsQuery::Bool(BoolQuery {
                must: vec![l, q],
                ..Default::default()
            }),
        }
    }

    pub fn or(self, other: EsQuery) -> EsQuery {
        match (self, other) {
            (EsQuery::MatchAll, _) | (_, EsQuery::MatchAll) => EsQuery::MatchAll,
            (EsQuery::MatchNone, q) | (q, EsQuery::MatchNone) => q,
            (EsQuery::Bool(mut l), EsQuery::Bool(r)) if l.only_should() && r.only_should() => {
                l.should.extend(r.should);
                EsQuery::Bool(l)
            }
            (EsQuery::Bool(mut l), q) if l.only_should() => {
                l.should.push(q);
                EsQuery::Bool(l)
            }
            (l, q) => EsQuery::Bool(BoolQuery {
                should: vec![l, q],
                ..Default::default()
            }),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> EsQuery {
        match self {
            EsQuery::MatchAll => EsQuery::MatchNone,
            EsQuery::MatchNone => EsQuery::MatchAll,
            EsQuery::Bool(b) if b.must.is_empty() && b.should.is_empty() && b.must_not.len() == 1 => {
                b.must_not.into_iter().next().unwrap_or(EsQuery::MatchNone)
            }
            q => EsQuery::Bool(BoolQuery {
                must_not: vec![q],
                ..Default::default()
            }),
        }
    }

    /// Render as Elasticsearch query DSL.
    pub fn to_dsl(&self) -> Json {
        match self {
            EsQuery::MatchAll => json!({ "match_all": {} }),
            EsQuery::MatchNone => json!({ "match_none": {} }),
            EsQuery::Term {
                field,
                value,
                boost,
            } => leaf("term", field, "value", json!(value), *boost),
            EsQuery::Range(range) => {
                let mut body = Map::new();
                if let Some(from) = &range.from {
                    let key = if range.include_lower { "gte" } else { "gt" };
                    body.insert(key.into(), json!(from));
                }
                if let Some(to) = &range.to {
                    let key = if range.include_upper { "lte" } else { "lt" };
                    body.insert(key.into(), json!(to));
                }
                if let Some(boost) = range.boost {
                    body.insert("boost".into(), json!(boost));
                }
                json!({ "range": { range.field.clone(): body } })
            }
            EsQuery::Wildcard {
                field,
                pattern,
                boost,
            } => leaf("wildcard", field, "value", json!(pattern), *boost),
            EsQuery::Prefix {
                field,
                value,
                boost,
            } => leaf("prefix", field, "value", json!(value), *boost),
            EsQuery::Fuzzy {
                field,
                value,
                min_similarity,
                boost,
            } => json!({
                "fuzzy": {
                    field.clone(): {
                        "value": value,
                        "fuzziness": max_edits(*min_similarity, value.chars().count()),
                        "boost": boost,
                    }
                }
            }),
            EsQuery::Missing { field } => json!({
                "bool": { "must_not": [ { "exists": { "field": field } } ] }
            }),
            EsQuery::Bool(b) => {
                let mut body = Map::new();
                for (key, clauses) in [
                    ("must", &b.must),
                    ("should", &b.should),
                    ("must_not", &b.must_not),
                ] {
                    if !clauses.is_empty() {
                        body.insert(
                            key.into(),
                            Json::Array(clauses.iter().map(EsQuery::to_dsl).collect()),
                        );
                    }
                }
                json!({ "bool": body })
            }
        }
    }
}

fn leaf(kind: &str, field: &str, key: &str, value: Json, boost: Option<f32>) -> Json {
    let mut body = Map::new();
    body.insert(key.into(), value);
    if let Some(boost) = boost {
        body.insert("boost".into(), json!(boost));
    }
    json!({ kind: { field: body } })
}

/// Edit distance allowed for a fuzzy match, Lucene style: similarities below
/// one scale with term length, values of one or more are edit counts. Capped at 2.
pub fn max_edits(min_similarity: f32, term_len: usize) -> usize {
    if min_similarity >= 1.0 {
        (min_similarity as usize).min(2)
    } else {
        (((1.0 - f64::from(min_similarity)) * term_len as f64) as usize).min(2)
    }
}

impl fmt::Display for EsQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dsl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_drops_match_all_and_absorbs_match_none() {
        let term = EsQuery::term("status", "published");
        assert_eq!(EsQuery::MatchAll.and(term.clone()), term);
        assert_eq!(term.clone().and(EsQuery::MatchNone), EsQuery::MatchNone);
    }

    #[test]
    fn and_flattens_must_clauses() {
        let q = EsQuery::term("a", "1")
            .and(EsQuery::term("b", "2"))
            .and(EsQuery::term("c", "3"));
        match q {
            EsQuery::Bool(b) => assert_eq!(b.must.len(), 3),
            other => panic!("expected bool, got {other}"),
        }
    }

    #[test]
    fn or_flattens_should_clauses() {
        let q = EsQuery::term("a", "1")
            .or(EsQuery::term("b", "2"))
            .or(EsQuery::term("c", "3"));
        match q {
            EsQuery::Bool(b) => {
                assert_eq!(b.should.len(), 3);
                assert!(b.must.is_empty());
            }
            other => panic!("expected bool, got {other}"),
        }
    }

    #[test]
    fn double_not_unwraps() {
        let term = EsQuery::term("a", "1");
        assert_eq!(term.clone().not().not(), term);
        assert_eq!(EsQuery::MatchAll.not(), EsQuery::MatchNone);
    }

    #[test]
    fn range_renders_exclusive_and_inclusive_bounds() {
        let q = EsQuery::Range(RangeQuery {
            field: "price".into(),
            from: Some("10".into()),
            to: Some("20".into()),
            include_lower: false,
            include_upper: true,
            boost: None,
        });
        assert_eq!(
            q.to_dsl(),
            json!({ "range": { "price": { "gt": "10", "lte": "20" } } })
        );
    }

    #[test]
    fn term_renders_boost_only_when_set() {
        assert_eq!(
            EsQuery::term("status", "published").to_dsl(),
            json!({ "term": { "status": { "value": "published" } } })
        );
        assert_eq!(
            EsQuery::term("status", "published").with_boost(2.0).to_dsl(),
            json!({ "term": { "status": { "value": "published", "boost": 2.0 } } })
        );
    }

    #[test]
    fn fuzzy_edits_follow_term_length() {
        assert_eq!(max_edits(0.5, 4), 2);
        assert_eq!(max_edits(0.75, 4), 1);
        assert_eq!(max_edits(0.9, 3), 0);
        assert_eq!(max_edits(1.0, 10), 1);
    }
}
