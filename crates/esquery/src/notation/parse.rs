//! Parser for the call notation
//!
//! Produces a loose [`Term`] tree; arity and argument kinds are checked when
//! the terms are lowered to query nodes.

use winnow::ascii::{digit1, multispace0};
use winnow::combinator::{alt, delimited, opt, preceded, separated, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use crate::node::Value;

type PResult<T> = winnow::ModalResult<T>;

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (line {}, column {}, offset {})",
            self.message, self.line, self.column, self.offset
        )
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Term {
    Call {
        name: String,
        args: Vec<Term>,
        kwargs: Vec<(String, Term)>,
    },
    List(Vec<Term>),
    Ident(String),
    Literal(Value),
}

enum Arg {
    Positional(Term),
    Keyword(String, Term),
}

pub(super) fn parse_term(input: &str) -> Result<Term, ParseError> {
    let input = input.trim();
    let mut stream = input;
    match term.parse_next(&mut stream) {
        Ok(parsed) => {
            if stream.trim().is_empty() {
                Ok(parsed)
            } else {
                let offset = trailing_input_offset(input, stream);
                Err(build_parse_error(
                    "unexpected trailing input".to_string(),
                    input,
                    offset,
                ))
            }
        }
        Err(e) => {
            let offset = input.len().saturating_sub(stream.len());
            Err(build_parse_error(format!("{:?}", e), input, offset))
        }
    }
}

fn build_parse_error(message: String, input: &str, offset: usize) -> ParseError {
    let (line, column) = offset_to_line_column(input, offset);
    ParseError {
        message,
        offset,
        line,
        column,
    }
}

fn offset_to_line_column(input: &str, offset: usize) -> (usize, usize) {
    let bounded = offset.min(input.len());
    let mut line = 1usize;
    let mut column = 1usize;

    for ch in input[..bounded].chars() {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }

    (line, column)
}

fn trailing_input_offset(input: &str, trailing: &str) -> usize {
    let base = input.len().saturating_sub(trailing.len());
    let non_ws = trailing
        .char_indices()
        .find(|(_, ch)| !ch.is_whitespace())
        .map(|(idx, _)| idx)
        .unwrap_or(0);
    base + non_ws
}

// ============ Terms ============

fn term(input: &mut &str) -> PResult<Term> {
    preceded(
        ws,
        alt((list, number.map(Term::Literal), string_lit.map(Term::Literal), call_or_ident)),
    )
    .parse_next(input)
}

/// `name(args)` is a call; a bare `true`, `false` or `null` is a literal.
fn call_or_ident(input: &mut &str) -> PResult<Term> {
    let name = ident_str.parse_next(input)?;
    let args: Option<Vec<Arg>> = opt(preceded(
        ws,
        delimited(
            '(',
            (ws, opt(call_args), ws).map(|(_, args, _)| args.unwrap_or_default()),
            ')',
        ),
    ))
    .parse_next(input)?;

    let Some(all_args) = args else {
        return Ok(match name.as_str() {
            "true" => Term::Literal(Value::Bool(true)),
            "false" => Term::Literal(Value::Bool(false)),
            "null" => Term::Literal(Value::Null),
            _ => Term::Ident(name),
        });
    };

    let mut args = Vec::new();
    let mut kwargs = Vec::new();
    for arg in all_args {
        match arg {
            Arg::Positional(t) => args.push(t),
            Arg::Keyword(k, t) => kwargs.push((k, t)),
        }
    }
    Ok(Term::Call { name, args, kwargs })
}

fn call_args(input: &mut &str) -> PResult<Vec<Arg>> {
    terminated(
        separated(1.., call_arg, (ws, ',', ws)),
        opt((ws, ',')), // trailing comma
    )
    .parse_next(input)
}

fn call_arg(input: &mut &str) -> PResult<Arg> {
    alt((
        // keyword arg: name=term
        (ws, ident_str, ws, '=', ws, term).map(|(_, name, _, _, _, t)| Arg::Keyword(name, t)),
        term.map(Arg::Positional),
    ))
    .parse_next(input)
}

fn list(input: &mut &str) -> PResult<Term> {
    delimited(
        ('[', ws),
        opt(terminated(
            separated(1.., term, (ws, ',', ws)),
            opt((ws, ',')),
        ))
        .map(|items| items.unwrap_or_default()),
        (ws, ']'),
    )
    .map(Term::List)
    .parse_next(input)
}

fn ident_str(input: &mut &str) -> PResult<String> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .map(str::to_string)
        .parse_next(input)
}

// ============ Literals ============

fn number(input: &mut &str) -> PResult<Value> {
    alt((float_lit, int_lit)).parse_next(input)
}

fn int_lit(input: &mut &str) -> PResult<Value> {
    (opt('-'), digit1)
        .take()
        .try_map(|s: &str| s.parse::<i64>())
        .map(Value::Int)
        .parse_next(input)
}

fn float_lit(input: &mut &str) -> PResult<Value> {
    (opt('-'), digit1, '.', digit1)
        .take()
        .try_map(|s: &str| s.parse::<f64>())
        .map(Value::Float)
        .parse_next(input)
}

fn string_lit(input: &mut &str) -> PResult<Value> {
    alt((
        delimited('"', string_contents('"'), '"'),
        delimited('\'', string_contents('\''), '\''),
    ))
    .map(Value::String)
    .parse_next(input)
}

fn string_contents<'a>(quote: char) -> impl FnMut(&mut &'a str) -> PResult<String> {
    move |input: &mut &'a str| {
        let mut result = String::new();
        loop {
            let Some(c) = input.chars().next() else {
                return Err(ErrMode::Backtrack(ContextError::new()));
            };
            if c == quote {
                break;
            } else if c == '\\' {
                *input = &input[1..];
                let Some(escaped) = input.chars().next() else {
                    return Err(ErrMode::Backtrack(ContextError::new()));
                };
                let unescaped = match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    _ => escaped, // quotes, backslash and unknown escapes pass through
                };
                result.push(unescaped);
                *input = &input[escaped.len_utf8()..];
            } else {
                result.push(c);
                *input = &input[c.len_utf8()..];
            }
        }
        Ok(result)
    }
}

fn ws(input: &mut &str) -> PResult<()> {
    multispace0.void().parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals() {
        assert_eq!(parse_term("42").unwrap(), Term::Literal(Value::Int(42)));
        assert_eq!(parse_term("-1.5").unwrap(), Term::Literal(Value::Float(-1.5)));
        assert_eq!(parse_term("null").unwrap(), Term::Literal(Value::Null));
        assert_eq!(
            parse_term(r#""a\"b""#).unwrap(),
            Term::Literal(Value::String("a\"b".into()))
        );
    }

    #[test]
    fn identifiers_starting_with_keywords_stay_identifiers() {
        assert_eq!(parse_term("true_ish").unwrap(), Term::Ident("true_ish".into()));
    }

    #[test]
    fn parses_calls_with_keywords() {
        let parsed = parse_term(r#"first(queryable("items"), or_default=true)"#).unwrap();
        let Term::Call { name, args, kwargs } = parsed else {
            panic!("expected call");
        };
        assert_eq!(name, "first");
        assert_eq!(args.len(), 1);
        assert_eq!(kwargs, vec![("or_default".to_string(), Term::Literal(Value::Bool(true)))]);
    }

    #[test]
    fn parses_lists_with_trailing_comma() {
        let parsed = parse_term(r#"["a", "b",]"#).unwrap();
        assert!(matches!(parsed, Term::List(ref items) if items.len() == 2));
    }

    #[test]
    fn trailing_input_reports_position() {
        let err = parse_term("match_all() junk").unwrap_err();
        assert_eq!(err.message, "unexpected trailing input");
        assert_eq!(err.column, 13);
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(parse_term(r#"field("title)"#).is_err());
    }
}
