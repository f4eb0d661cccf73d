//! The table-driven shift/reduce engine.

use crate::{
    error::{self, Error, ParseError},
    grammar::{Grammar, GrammarError, RuleID, RuleKind, SymbolID},
    lexer::{Token, TokenStream},
    table::{Action, ParseTable, StateID},
};

impl<V> Grammar<V> {
    /// Force parse-table synthesis now instead of at the first parse, so
    /// grammar errors surface immediately.
    pub fn compile(&self) -> Result<(), GrammarError> {
        self.parse_table().map(|_| ())
    }

    pub(crate) fn parse_table(&self) -> Result<&ParseTable, GrammarError> {
        self.table
            .get_or_try_init(|| ParseTable::synthesize(self, self.start))
    }
}

impl<V: From<String>> Grammar<V> {
    /// Parse `input`, applying reduction actions bottom-up into a single
    /// value.
    ///
    /// The parse table is synthesized on the first call and memoized;
    /// grammar errors therefore surface here rather than at definition
    /// time, unless [`Grammar::compile`] forced the build earlier.
    pub fn parse(&self, input: &str) -> Result<V, Error> {
        self.parse_with(input, |_, _| None)
    }

    /// Parse with an error hook.
    ///
    /// On a syntax error the hook receives the structured error and the
    /// offending token and may return a substitute token, which is retried
    /// against the same state; the lexer then continues after the original
    /// token's span. Returning `None` propagates the error.
    pub fn parse_with<F>(&self, input: &str, mut hook: F) -> Result<V, Error>
    where
        F: FnMut(&ParseError, &Token) -> Option<Token>,
    {
        let table = self.parse_table()?;
        run(self, table, input, &mut hook)
    }

    /// Parse against `start` instead of the grammar's start symbol.
    ///
    /// A development aid: the table for the override is rebuilt on every
    /// call and never cached.
    pub fn parse_from(&self, input: &str, start: &str) -> Result<V, Error> {
        let symbol = self
            .symbol(start)
            .ok_or_else(|| GrammarError::UndefinedStart(start.to_owned()))?;
        let table = ParseTable::synthesize(self, symbol)?;
        run(self, &table, input, &mut |_, _| None)
    }

    fn token_value(&self, token: Token) -> V {
        let rule = self.rule(self.set(token.symbol).rules[0]);
        match &rule.kind {
            RuleKind::Terminal {
                action: Some(f), ..
            } => f(&token.text),
            _ => V::from(token.text),
        }
    }
}

fn run<V: From<String>>(
    grammar: &Grammar<V>,
    table: &ParseTable,
    input: &str,
    hook: &mut dyn FnMut(&ParseError, &Token) -> Option<Token>,
) -> Result<V, Error> {
    let mut states: Vec<StateID> = vec![table.initial];
    let mut values: Vec<V> = Vec::new();
    let mut tokens = TokenStream::new(grammar, input);
    let mut token = tokens.next_token()?;

    loop {
        let state = *states.last().expect("state stack is never empty");
        let row = table.row(state);
        let action = row
            .get(&token.symbol)
            .or_else(|| row.get(&SymbolID::DEFAULT))
            .copied();

        match action {
            Some(Action::Shift(next)) => {
                tracing::trace!(
                    "shift {} {:?}",
                    grammar.symbol_name(token.symbol),
                    token.text
                );
                values.push(grammar.token_value(token));
                states.push(next);
                token = tokens.next_token()?;
            }

            Some(Action::Reduce(rule, _)) | Some(Action::Accept(rule)) => {
                let accepting = matches!(action, Some(Action::Accept(_)));
                let (lhs, arity) = match rule {
                    RuleID::START => (SymbolID::START, 1),
                    rule => {
                        let rule = grammar.rule(rule);
                        (rule.lhs, rule.parts().len())
                    }
                };
                if states.len() <= arity {
                    // The table cannot pop past the initial state on any
                    // input it produced itself; a hook-substituted token
                    // stream can get here.
                    let err = error::syntax_error(grammar, row, &token, input);
                    return Err(err.into());
                }

                let uncovered = states[states.len() - 1 - arity];
                let target = if accepting && uncovered == table.initial {
                    None
                } else {
                    match table.row(uncovered).get(&lhs).copied() {
                        Some(Action::Goto(next)) => Some(next),
                        _ => {
                            // The default reduce fired on a lookahead with
                            // no continuation. Report against the state
                            // that chose the reduce.
                            let err = error::syntax_error(grammar, row, &token, input);
                            match hook(&err, &token) {
                                Some(substitute) => {
                                    token = substitute;
                                    continue;
                                }
                                None => return Err(err.into()),
                            }
                        }
                    }
                };

                tracing::trace!(
                    "reduce {} popping {} value(s)",
                    grammar.symbol_name(lhs),
                    arity
                );
                let args = values.split_off(values.len() - arity);
                let result = apply(grammar, rule, args);
                states.truncate(states.len() - arity);
                match target {
                    None => return Ok(result),
                    Some(next) => {
                        values.push(result);
                        states.push(next);
                    }
                }
            }

            Some(Action::Fail) => {
                let err = error::nonassoc_error(grammar, row, &token, input);
                match hook(&err, &token) {
                    Some(substitute) => token = substitute,
                    None => return Err(err.into()),
                }
            }

            // Lexed tokens never hit a `Goto`: those entries are keyed by
            // nonterminals only. A hook-substituted token naming a
            // nonterminal can, and is rejected like any unshiftable symbol.
            None | Some(Action::Goto(_)) => {
                if matches!(action, Some(Action::Goto(_))) {
                    debug_assert!(
                        !grammar.set(token.symbol).terminal,
                        "goto hit under a terminal lookahead"
                    );
                }
                let err = error::syntax_error(grammar, row, &token, input);
                match hook(&err, &token) {
                    Some(substitute) => token = substitute,
                    None => return Err(err.into()),
                }
            }
        }
    }
}

fn apply<V>(grammar: &Grammar<V>, rule: RuleID, mut args: Vec<V>) -> V {
    match rule {
        RuleID::START => args.pop().expect("wrapper reduces exactly one value"),
        rule => match &grammar.rule(rule).kind {
            RuleKind::Production { action, .. } => action(args),
            RuleKind::Terminal { .. } => unreachable!("terminal rules are consumed by shifts"),
        },
    }
}
