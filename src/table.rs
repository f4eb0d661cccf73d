//! Parse-table synthesis.
//!
//! The table is built by a depth-first walk over the productions reachable
//! from the start symbol. Every partially matched production has a state
//! identified by `(rule, dot)`; alternatives expanded from the same source
//! state merge their transitions into it, so a state holds every valid
//! continuation of the prefixes that reach it. Reduce entries live under
//! the reserved default lookahead and apply to any symbol not shifted
//! from the state.

use crate::grammar::{Assoc, Grammar, GrammarError, RuleID, SymbolID};
use crate::util::DisplayFn;
use indexmap::{IndexMap, IndexSet};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StateID {
    rule: RuleID,
    dot: u16,
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.rule, self.dot)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Shift(StateID),
    Goto(StateID),
    Reduce(RuleID, u16),
    Accept(RuleID),
    /// Explicit reject inserted when a nonassociative terminal loses a
    /// shift/reduce conflict.
    Fail,
}

#[derive(Debug)]
pub(crate) struct ParseTable {
    pub(crate) states: IndexMap<StateID, IndexMap<SymbolID, Action>>,
    pub(crate) initial: StateID,
}

impl ParseTable {
    pub(crate) fn synthesize<V>(
        grammar: &Grammar<V>,
        start: SymbolID,
    ) -> Result<Self, GrammarError> {
        Builder {
            grammar,
            states: IndexMap::new(),
            visited: IndexSet::new(),
        }
        .build(start)
    }

    pub(crate) fn row(&self, state: StateID) -> &IndexMap<SymbolID, Action> {
        &self.states[&state]
    }

    pub(crate) fn display<'g, V>(&'g self, grammar: &'g Grammar<V>) -> impl fmt::Display + 'g {
        DisplayFn(move |f: &mut fmt::Formatter<'_>| {
            for (i, (id, row)) in self.states.iter().enumerate() {
                if i > 0 {
                    writeln!(f)?;
                }
                writeln!(f, "#### state {}", id)?;
                for (symbol, action) in row {
                    let name = if *symbol == SymbolID::DEFAULT {
                        "$default"
                    } else {
                        grammar.symbol_name(*symbol)
                    };
                    match action {
                        Action::Shift(next) => writeln!(f, "- {} => shift({})", name, next)?,
                        Action::Goto(next) => writeln!(f, "- {} => goto({})", name, next)?,
                        Action::Reduce(rule, prec) => {
                            writeln!(f, "- {} => reduce({}, prec {})", name, rule, prec)?
                        }
                        Action::Accept(rule) => writeln!(f, "- {} => accept({})", name, rule)?,
                        Action::Fail => writeln!(f, "- {} => fail", name)?,
                    }
                }
            }
            Ok(())
        })
    }
}

struct Builder<'g, V> {
    grammar: &'g Grammar<V>,
    states: IndexMap<StateID, IndexMap<SymbolID, Action>>,
    visited: IndexSet<(StateID, SymbolID)>,
}

impl<'g, V> Builder<'g, V> {
    fn build(mut self, start: SymbolID) -> Result<ParseTable, GrammarError> {
        let initial = if self.grammar.set(start).terminal {
            // The start symbol is a terminal: wrap it in the reserved
            // `START := [<start>]` rule so there is something to reduce.
            let initial = StateID {
                rule: RuleID::START,
                dot: 0,
            };
            self.walk(initial, RuleID::START, &[start], 0, 0, true)?;
            initial
        } else {
            let initial = StateID {
                rule: self.grammar.set(start).rules[0],
                dot: 0,
            };
            self.expand(initial, start, true)?;
            initial
        };

        self.resolve_conflicts();
        tracing::debug!("synthesized parse table: {} states", self.states.len());

        let table = ParseTable {
            states: self.states,
            initial,
        };
        tracing::trace!("parse table:\n{}", table.display(self.grammar));
        Ok(table)
    }

    /// Expand every alternative of `symbol` from `state`. Alternatives
    /// share the source state, merging the transitions on their first
    /// components into it.
    fn expand(
        &mut self,
        state: StateID,
        symbol: SymbolID,
        accepting: bool,
    ) -> Result<(), GrammarError> {
        if !self.visited.insert((state, symbol)) {
            return Ok(());
        }
        let grammar = self.grammar;
        for &rule in &grammar.set(symbol).rules {
            self.walk(state, rule, grammar.rule(rule).parts(), 0, 0, accepting)?;
        }
        Ok(())
    }

    /// Walk one production left to right from `dot`, threading the
    /// highest terminal precedence seen so far into its reduce entry.
    fn walk(
        &mut self,
        state: StateID,
        rule: RuleID,
        parts: &[SymbolID],
        dot: usize,
        prec: u16,
        accepting: bool,
    ) -> Result<(), GrammarError> {
        if dot == parts.len() {
            self.insert_reduce(state, rule, prec)?;
            if accepting {
                self.row_mut(state)
                    .entry(SymbolID::END)
                    .or_insert(Action::Accept(rule));
            }
            return Ok(());
        }

        let symbol = parts[dot];
        let minted = StateID {
            rule,
            dot: (dot + 1) as u16,
        };

        if self.grammar.set(symbol).terminal {
            let next = match self.row_mut(state).get(&symbol).copied() {
                Some(Action::Shift(next)) => next,
                _ => {
                    self.row_mut(state).insert(symbol, Action::Shift(minted));
                    minted
                }
            };
            let prec = prec.max(self.grammar.terminal_prec(symbol).0);
            self.walk(next, rule, parts, dot + 1, prec, accepting)
        } else {
            let next = match self.row_mut(state).get(&symbol).copied() {
                Some(Action::Goto(next)) => next,
                _ => {
                    self.row_mut(state).insert(symbol, Action::Goto(minted));
                    minted
                }
            };
            self.expand(state, symbol, false)?;
            self.walk(next, rule, parts, dot + 1, prec, accepting)
        }
    }

    fn insert_reduce(
        &mut self,
        state: StateID,
        rule: RuleID,
        prec: u16,
    ) -> Result<(), GrammarError> {
        match self.row_mut(state).get(&SymbolID::DEFAULT).copied() {
            None => {
                self.row_mut(state)
                    .insert(SymbolID::DEFAULT, Action::Reduce(rule, prec));
                Ok(())
            }
            Some(Action::Reduce(existing, _)) if existing == rule => Ok(()),
            Some(Action::Reduce(existing, _)) => Err(GrammarError::ReduceReduce {
                first: self.rule_name(existing),
                second: self.rule_name(rule),
            }),
            Some(_) => Ok(()),
        }
    }

    fn rule_name(&self, rule: RuleID) -> String {
        if rule == RuleID::START {
            format!("START := [{}]", self.grammar.symbol_name(self.grammar.start))
        } else {
            self.grammar.rule(rule).display(self.grammar).to_string()
        }
    }

    fn row_mut(&mut self, state: StateID) -> &mut IndexMap<SymbolID, Action> {
        self.states.entry(state).or_default()
    }

    /// Decide every shift/default-reduce conflict by precedence, then by
    /// the shifted terminal's associativity.
    fn resolve_conflicts(&mut self) {
        let grammar = self.grammar;
        for row in self.states.values_mut() {
            let Some(&Action::Reduce(_, reduce_prec)) = row.get(&SymbolID::DEFAULT) else {
                continue;
            };
            let shifts: Vec<(SymbolID, u16, Assoc)> = row
                .iter()
                .filter_map(|(symbol, action)| match action {
                    Action::Shift(_) => {
                        let (prec, assoc) = grammar.terminal_prec(*symbol);
                        Some((*symbol, prec, assoc))
                    }
                    _ => None,
                })
                .collect();

            for (symbol, shift_prec, assoc) in shifts {
                if reduce_prec > shift_prec {
                    row.shift_remove(&symbol);
                } else if reduce_prec == shift_prec {
                    match assoc {
                        Assoc::Left => {
                            row.shift_remove(&symbol);
                        }
                        Assoc::Right => {}
                        Assoc::Nonassoc => {
                            row.insert(symbol, Action::Fail);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{lit, sym, Grammar};
    use crate::value::Value;

    fn infix(assoc: Assoc) -> Grammar<Value> {
        Grammar::define(|g| {
            g.pattern("int", "[0-9]+")?;
            g.literal("-")?.prec(1).assoc(assoc);
            g.rule("expr", [sym("expr"), lit("-"), sym("expr")], Value::List)?;
            g.rule_value("expr", [sym("int")])?;
            g.start("expr");
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn left_assoc_drops_the_shift() {
        let grammar = infix(Assoc::Left);
        let table = ParseTable::synthesize(&grammar, grammar.start_symbol()).unwrap();
        let minus = grammar.symbol("-").unwrap();

        // The state that completed `expr - expr` must reduce on a further
        // `-` rather than shift it.
        let conflicted = table
            .states
            .values()
            .find(|row| {
                matches!(row.get(&SymbolID::DEFAULT), Some(Action::Reduce(_, 1)))
            })
            .unwrap();
        assert!(!conflicted.contains_key(&minus));
    }

    #[test]
    fn right_assoc_keeps_the_shift() {
        let grammar = infix(Assoc::Right);
        let table = ParseTable::synthesize(&grammar, grammar.start_symbol()).unwrap();
        let minus = grammar.symbol("-").unwrap();

        let conflicted = table
            .states
            .values()
            .find(|row| {
                matches!(row.get(&SymbolID::DEFAULT), Some(Action::Reduce(_, 1)))
            })
            .unwrap();
        assert!(matches!(conflicted.get(&minus), Some(Action::Shift(_))));
    }

    #[test]
    fn nonassoc_marks_the_entry_as_failing() {
        let grammar = infix(Assoc::Nonassoc);
        let table = ParseTable::synthesize(&grammar, grammar.start_symbol()).unwrap();
        let minus = grammar.symbol("-").unwrap();

        assert!(table
            .states
            .values()
            .any(|row| matches!(row.get(&minus), Some(Action::Fail))));
    }

    #[test]
    fn reduce_reduce_conflicts_name_both_rules() {
        let grammar = Grammar::<Value>::define(|g| {
            g.pattern("id", "[a-z]+")?;
            g.rule("list", [sym("list"), sym("id")], Value::List)?;
            g.rule_value("list", [sym("id")])?;
            g.rule_value("prog", [sym("list")])?;
            g.rule_value("prog", [sym("id")])?;
            g.start("prog");
            Ok(())
        })
        .unwrap();

        let err = ParseTable::synthesize(&grammar, grammar.start_symbol()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("list := [id]"), "{}", message);
        assert!(message.contains("prog := [id]"), "{}", message);
    }

    #[test]
    fn table_dump_lists_every_action_kind() {
        let grammar = infix(Assoc::Nonassoc);
        let table = ParseTable::synthesize(&grammar, grammar.start_symbol()).unwrap();
        let dump = table.display(&grammar).to_string();
        assert!(dump.contains("shift("), "{}", dump);
        assert!(dump.contains("goto("), "{}", dump);
        assert!(dump.contains("reduce("), "{}", dump);
        assert!(dump.contains("accept("), "{}", dump);
        assert!(dump.contains("fail"), "{}", dump);
    }

    #[test]
    fn terminal_start_symbols_are_wrapped() {
        let grammar = Grammar::<Value>::define(|g| {
            g.pattern("int", "[0-9]+")?;
            g.start("int");
            Ok(())
        })
        .unwrap();

        let table = ParseTable::synthesize(&grammar, grammar.start_symbol()).unwrap();
        let int = grammar.symbol("int").unwrap();
        assert!(matches!(
            table.row(table.initial).get(&int),
            Some(Action::Shift(_))
        ));
    }
}
