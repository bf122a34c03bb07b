//! Textual notation for query trees
//!
//! Every node prints as a call, e.g.
//! `take(skip(where(queryable("items"), gt(field("price", int), 10)), 5), 20)`.
//! [`parse`] reads the same form back; printing then parsing yields an equal
//! tree for finite numeric literals.

mod lower;
mod parse;
mod pretty;

pub use parse::ParseError;

use thiserror::Error;

use crate::node::QueryNode;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotationError {
    #[error("{0}")]
    Syntax(#[from] ParseError),
    #[error("{0}")]
    Invalid(String),
}

/// Parse notation text into a query tree.
pub fn parse(text: &str) -> Result<QueryNode, NotationError> {
    let term = parse::parse_term(text)?;
    lower::lower(&term)
}
