//! Longest-match scanning over the grammar's terminal rule sets.

use crate::grammar::{Grammar, Matcher, RuleKind, SymbolID};

/// A token produced by the scanner, or substituted by an error hook.
#[derive(Debug, Clone)]
pub struct Token {
    pub symbol: SymbolID,
    pub text: String,
    pub offset: usize,
    pub line: usize,
}

impl Token {
    pub fn new(symbol: SymbolID, text: impl Into<String>, offset: usize, line: usize) -> Self {
        Self {
            symbol,
            text: text.into(),
            offset,
            line,
        }
    }

    pub(crate) fn end(offset: usize, line: usize) -> Self {
        Self {
            symbol: SymbolID::END,
            text: String::new(),
            offset,
            line,
        }
    }

    pub fn is_end(&self) -> bool {
        self.symbol == SymbolID::END
    }
}

/// Cursor over a source string, yielding one token per call.
///
/// At each position every terminal rule set is tried anchored at the
/// cursor; the longest match wins and equal lengths go to the earliest
/// declaration. Skip-marked matches advance the cursor and the line
/// counter without being delivered.
pub struct TokenStream<'a, V> {
    grammar: &'a Grammar<V>,
    source: &'a str,
    cursor: usize,
    line: usize,
}

impl<'a, V> TokenStream<'a, V> {
    pub(crate) fn new(grammar: &'a Grammar<V>, source: &'a str) -> Self {
        Self {
            grammar,
            source,
            cursor: 0,
            line: 1,
        }
    }

    /// The next non-skipped token, or the `END` sentinel at end of input.
    pub(crate) fn next_token(&mut self) -> Result<Token, UnconsumedInputError> {
        loop {
            let rest = &self.source[self.cursor..];
            if rest.is_empty() {
                return Ok(Token::end(self.cursor, self.line));
            }

            let mut best: Option<(usize, SymbolID, bool)> = None;
            for (symbol, rule) in self.grammar.terminals() {
                let RuleKind::Terminal { matcher, skip, .. } = &rule.kind else {
                    continue;
                };
                let len = match matcher {
                    Matcher::Literal(text) => rest.starts_with(text.as_str()).then(|| text.len()),
                    Matcher::Pattern(re) => re.find(rest).map(|m| m.end()),
                };
                // Zero-length matches are ignored: a nullable pattern can
                // never produce a token.
                if let Some(len) = len.filter(|len| *len > 0) {
                    if best.map_or(true, |(best_len, ..)| len > best_len) {
                        best = Some((len, symbol, *skip));
                    }
                }
            }

            let Some((len, symbol, skip)) = best else {
                return Err(UnconsumedInputError {
                    suffix: clip_suffix(rest),
                    line: self.line,
                });
            };

            let offset = self.cursor;
            let line = self.line;
            let text = &rest[..len];
            self.line += text.bytes().filter(|b| *b == b'\n').count();
            self.cursor += len;

            if skip {
                tracing::trace!("skip {:?} at {}", text, offset);
                continue;
            }
            tracing::trace!(
                "token {} {:?} at {} (line {})",
                self.grammar.symbol_name(symbol),
                text,
                offset,
                line
            );
            return Ok(Token::new(symbol, text, offset, line));
        }
    }
}

fn clip_suffix(rest: &str) -> String {
    const MAX: usize = 30;
    let mut end = rest.len().min(MAX);
    while !rest.is_char_boundary(end) {
        end -= 1;
    }
    match rest[..end].find('\n') {
        Some(nl) => rest[..nl].to_owned(),
        None => rest[..end].to_owned(),
    }
}

/// The scanner found no terminal matching at the cursor before the end of
/// input.
#[derive(Debug, thiserror::Error)]
#[error("no terminal matches input at line {line}: {suffix:?}")]
pub struct UnconsumedInputError {
    pub suffix: String,
    pub line: usize,
}
