//! Structured parse errors with source excerpts.

use crate::{
    grammar::{Grammar, GrammarError, SymbolID},
    lexer::{Token, UnconsumedInputError},
    table::Action,
};
use indexmap::IndexMap;

/// Any failure a parse call can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    UnconsumedInput(#[from] UnconsumedInputError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A syntax error: the parser had no action for the received symbol.
///
/// `expected` lists every lookahead the state would have shifted or
/// accepted, with end of input rendered as `END`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub expected: Vec<String>,
    pub received: String,
}

pub(crate) fn syntax_error<V>(
    grammar: &Grammar<V>,
    row: &IndexMap<SymbolID, Action>,
    token: &Token,
    source: &str,
) -> ParseError {
    let expected = expected_symbols(grammar, row);
    let received = grammar.symbol_name(token.symbol).to_owned();
    let message = format!(
        "unexpected {} at line {}, expected one of: {}\n{}",
        received,
        token.line,
        expected.join(", "),
        excerpt(source, token.offset),
    );
    ParseError {
        message,
        line: token.line,
        expected,
        received,
    }
}

pub(crate) fn nonassoc_error<V>(
    grammar: &Grammar<V>,
    row: &IndexMap<SymbolID, Action>,
    token: &Token,
    source: &str,
) -> ParseError {
    let expected = expected_symbols(grammar, row);
    let received = grammar.symbol_name(token.symbol).to_owned();
    let message = format!(
        "{} is non-associative and cannot be chained (line {})\n{}",
        received,
        token.line,
        excerpt(source, token.offset),
    );
    ParseError {
        message,
        line: token.line,
        expected,
        received,
    }
}

fn expected_symbols<V>(grammar: &Grammar<V>, row: &IndexMap<SymbolID, Action>) -> Vec<String> {
    let mut expected: Vec<String> = Vec::new();
    for (symbol, action) in row {
        let name = match action {
            Action::Shift(_) => grammar.symbol_name(*symbol),
            Action::Accept(_) => "END",
            Action::Reduce(..) if *symbol == SymbolID::DEFAULT => "END",
            _ => continue,
        };
        if !expected.iter().any(|seen| seen == name) {
            expected.push(name.to_owned());
        }
    }
    expected
}

/// Render the line containing `offset` with a caret under the offending
/// column. Context further than a few columns from the caret is elided.
fn excerpt(source: &str, offset: usize) -> String {
    const LEAD: usize = 5;
    const TAIL: usize = 10;

    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line_end = source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i);
    let line = source[line_start..line_end].trim_end_matches('\r');

    let col = source[line_start..offset].chars().count();
    let chars: Vec<char> = line.chars().collect();
    let start = col.saturating_sub(LEAD);
    let end = chars.len().min(col + TAIL).max(start);

    let lead = if start > 0 { "... " } else { "" };
    let tail = if end < chars.len() { " ..." } else { "" };
    let shown: String = chars[start..end].iter().collect();
    let pad = " ".repeat(lead.len() + (col - start));
    format!("{}{}{}\n{}^", lead, shown, tail, pad)
}

#[cfg(test)]
mod tests {
    use super::excerpt;

    #[test]
    fn caret_sits_under_the_offending_column() {
        let rendered = excerpt("a, b-", 4);
        assert_eq!(rendered, "a, b-\n    ^");
    }

    #[test]
    fn long_leading_context_is_elided() {
        let rendered = excerpt("abcdefghijkl-mn", 12);
        assert_eq!(rendered, "... hijkl-mn\n         ^");
    }

    #[test]
    fn long_trailing_context_is_elided() {
        let rendered = excerpt("ab-cdefghijklmnopqr", 2);
        assert_eq!(rendered, "ab-cdefghijk ...\n  ^");
    }

    #[test]
    fn offsets_point_into_the_right_line() {
        let rendered = excerpt("one\ntwo\nthr-ee\nfour", 11);
        assert_eq!(rendered, "thr-ee\n   ^");
    }

    #[test]
    fn end_of_input_clamps_past_the_last_column() {
        let rendered = excerpt("abc", 7);
        assert_eq!(rendered, "abc\n   ^");
    }
}
