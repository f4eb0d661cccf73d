//! Grammar types.

use crate::{table::ParseTable, util::DisplayFn, value::Value};
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::{fmt, rc::Rc};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolID {
    raw: u32,
}

impl SymbolID {
    /// Reserved terminal symbol that means the end of input.
    pub(crate) const END: Self = Self::new(u32::MAX);
    /// Reserved nonterminal wrapping a terminal start symbol.
    pub(crate) const START: Self = Self::new(u32::MAX - 1);
    /// Reserved lookahead key for the default-reduce entry of a state.
    pub(crate) const DEFAULT: Self = Self::new(u32::MAX - 2);

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

impl fmt::Display for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::END => f.write_str("END"),
            Self::START => f.write_str("START"),
            Self::DEFAULT => f.write_str("$default"),
            Self { raw } => write!(f, "SymbolID({})", raw),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleID {
    raw: u32,
}

impl RuleID {
    /// Reserved ID for the synthesized `START := [<start>]` wrapper used
    /// when the user start symbol is itself a terminal.
    pub(crate) const START: Self = Self::new(u32::MAX);

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

impl fmt::Display for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::START => f.write_str("START"),
            Self { raw } => fmt::Display::fmt(&raw, f),
        }
    }
}

/// Tie-break direction for equal-precedence shift/reduce conflicts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Assoc {
    Left,
    #[default]
    Right,
    Nonassoc,
}

/// One component of a production, as written in the grammar definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Sym(String),
    Lit(String),
}

/// Reference another rule set by name.
pub fn sym(name: &str) -> Part {
    Part::Sym(name.to_owned())
}

/// A literal string terminal. Implicitly declares a terminal rule set
/// named by the literal text if none exists.
pub fn lit(text: &str) -> Part {
    Part::Lit(text.to_owned())
}

pub(crate) type TokenAction<V> = Rc<dyn Fn(&str) -> V>;
pub(crate) type ReduceAction<V> = Rc<dyn Fn(Vec<V>) -> V>;

#[derive(Debug)]
pub(crate) enum Matcher {
    Literal(String),
    Pattern(Regex),
}

pub(crate) enum RuleKind<V> {
    Terminal {
        matcher: Matcher,
        action: Option<TokenAction<V>>,
        prec: u16,
        assoc: Assoc,
        skip: bool,
    },
    Production {
        parts: Vec<SymbolID>,
        action: ReduceAction<V>,
    },
}

/// A resolved production rule.
pub struct Rule<V> {
    pub(crate) lhs: SymbolID,
    pub(crate) kind: RuleKind<V>,
}

impl<V> Rule<V> {
    /// The right-hand side. Empty both for epsilon rules and for terminal
    /// rules, which have no symbol components.
    pub(crate) fn parts(&self) -> &[SymbolID] {
        match &self.kind {
            RuleKind::Production { parts, .. } => parts,
            RuleKind::Terminal { .. } => &[],
        }
    }

    pub(crate) fn display<'g>(&'g self, grammar: &'g Grammar<V>) -> impl fmt::Display + 'g {
        DisplayFn(move |f: &mut fmt::Formatter<'_>| {
            write!(f, "{} := [", grammar.symbol_name(self.lhs))?;
            match &self.kind {
                RuleKind::Terminal { matcher, .. } => match matcher {
                    Matcher::Literal(text) => write!(f, "{:?}", text)?,
                    Matcher::Pattern(re) => write!(f, "/{}/", re.as_str())?,
                },
                RuleKind::Production { parts, .. } => {
                    for (i, part) in parts.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        f.write_str(grammar.symbol_name(*part))?;
                    }
                }
            }
            f.write_str("]")
        })
    }
}

impl<V> fmt::Debug for Rule<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Rule");
        d.field("lhs", &self.lhs);
        match &self.kind {
            RuleKind::Terminal {
                matcher,
                prec,
                assoc,
                skip,
                ..
            } => {
                d.field("matcher", matcher)
                    .field("prec", prec)
                    .field("assoc", assoc)
                    .field("skip", skip);
            }
            RuleKind::Production { parts, .. } => {
                d.field("parts", parts);
            }
        }
        d.finish_non_exhaustive()
    }
}

/// All rules sharing a name. Alternatives keep the order the user wrote
/// them in: the lexer tries terminal sets in declaration order and the
/// table builder walks alternatives in that order.
#[derive(Debug)]
pub struct RuleSet {
    pub(crate) name: String,
    pub(crate) rules: Vec<RuleID>,
    pub(crate) terminal: bool,
}

/// An immutable grammar, ready to parse.
///
/// Built once through [`Grammar::define`]; the parse table is synthesized
/// on the first parse and memoized on the grammar.
pub struct Grammar<V = Value> {
    pub(crate) sets: IndexMap<SymbolID, RuleSet>,
    pub(crate) rules: IndexMap<RuleID, Rule<V>>,
    pub(crate) start: SymbolID,
    pub(crate) table: OnceCell<ParseTable>,
}

impl<V> fmt::Debug for Grammar<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("sets", &self.sets)
            .field("rules", &self.rules)
            .field("start", &self.start)
            .finish_non_exhaustive()
    }
}

impl<V> Grammar<V> {
    /// Define a grammar using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarError>
    where
        F: FnOnce(&mut GrammarDef<V>) -> Result<(), GrammarError>,
    {
        let mut def = GrammarDef {
            sets: IndexMap::new(),
            rules: Vec::new(),
            start: None,
        };

        f(&mut def)?;

        def.finish()
    }

    /// Look up a symbol by the name it was declared under.
    pub fn symbol(&self, name: &str) -> Option<SymbolID> {
        self.sets
            .iter()
            .find_map(|(id, set)| (set.name == name).then_some(*id))
    }

    pub fn symbol_name(&self, id: SymbolID) -> &str {
        match id {
            SymbolID::END | SymbolID::DEFAULT => "END",
            SymbolID::START => "START",
            id => &self.sets[&id].name,
        }
    }

    pub fn start_symbol(&self) -> SymbolID {
        self.start
    }

    pub(crate) fn set(&self, id: SymbolID) -> &RuleSet {
        &self.sets[&id]
    }

    pub(crate) fn rule(&self, id: RuleID) -> &Rule<V> {
        &self.rules[&id]
    }

    /// Terminal rule sets in declaration order, paired with their single rule.
    pub(crate) fn terminals(&self) -> impl Iterator<Item = (SymbolID, &Rule<V>)> + '_ {
        self.sets
            .iter()
            .filter(|(_, set)| set.terminal)
            .map(|(id, set)| (*id, &self.rules[&set.rules[0]]))
    }

    /// The precedence and associativity of a terminal rule set.
    pub(crate) fn terminal_prec(&self, id: SymbolID) -> (u16, Assoc) {
        match &self.rules[&self.set(id).rules[0]].kind {
            RuleKind::Terminal { prec, assoc, .. } => (*prec, *assoc),
            RuleKind::Production { .. } => (0, Assoc::default()),
        }
    }
}

impl<V> fmt::Display for Grammar<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terminals: ")?;
        for (i, (_, set)) in self.sets.iter().filter(|(_, s)| s.terminal).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", set.name)?;
        }
        write!(f, "\nnonterminals: ")?;
        for (i, (_, set)) in self.sets.iter().filter(|(_, s)| !s.terminal).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", set.name)?;
        }
        writeln!(f, "\nstart: {}", self.symbol_name(self.start))?;
        writeln!(f, "rules:")?;
        for (id, rule) in &self.rules {
            writeln!(f, "  [{:02}] {}", id, rule.display(self))?;
        }
        Ok(())
    }
}

struct ProtoRule<V> {
    lhs: String,
    parts: Vec<Part>,
    matcher: Option<Matcher>,
    token_action: Option<TokenAction<V>>,
    reduce_action: Option<ReduceAction<V>>,
    prec: u16,
    assoc: Assoc,
    skip: bool,
}

/// The contextual values for building a `Grammar`.
pub struct GrammarDef<V> {
    sets: IndexMap<String, Vec<usize>>,
    rules: Vec<ProtoRule<V>>,
    start: Option<String>,
}

impl<V> GrammarDef<V> {
    /// Append a production to the rule set `name`, with a reduction action
    /// combining the component values into one.
    ///
    /// An empty `parts` declares an epsilon rule; its action is called
    /// with no values and the rule reduces without consuming input.
    pub fn rule<I>(
        &mut self,
        name: &str,
        parts: I,
        action: impl Fn(Vec<V>) -> V + 'static,
    ) -> Result<(), GrammarError>
    where
        I: IntoIterator<Item = Part>,
    {
        if !verify_ident(name) {
            return Err(GrammarError::InvalidName(name.to_owned()));
        }
        if let Some(indices) = self.sets.get(name) {
            if let Some(matcher) = &self.rules[indices[0]].matcher {
                return Err(match matcher {
                    Matcher::Pattern(_) => GrammarError::PatternInNonterminal(name.to_owned()),
                    Matcher::Literal(_) => GrammarError::TerminalAlternative(name.to_owned()),
                });
            }
        }

        let index = self.rules.len();
        self.rules.push(ProtoRule {
            lhs: name.to_owned(),
            parts: parts.into_iter().collect(),
            matcher: None,
            token_action: None,
            reduce_action: Some(Rc::new(action)),
            prec: 0,
            assoc: Assoc::default(),
            skip: false,
        });
        self.sets.entry(name.to_owned()).or_default().push(index);
        Ok(())
    }

    /// Append a production whose action returns its single reduced value.
    pub fn rule_value<I>(&mut self, name: &str, parts: I) -> Result<(), GrammarError>
    where
        I: IntoIterator<Item = Part>,
    {
        self.rule(name, parts, |mut args: Vec<V>| {
            assert_eq!(args.len(), 1, "value preset expects exactly one component");
            args.pop().unwrap()
        })
    }

    /// Declare a literal terminal; the rule set is named by the literal
    /// text itself.
    pub fn literal(&mut self, text: &str) -> Result<TerminalRef<'_, V>, GrammarError> {
        self.declare_terminal(text, Matcher::Literal(text.to_owned()))
    }

    /// Declare a regex terminal under `name`. The pattern is compiled
    /// immediately, anchored to match only at the cursor.
    pub fn pattern(
        &mut self,
        name: &str,
        pattern: &str,
    ) -> Result<TerminalRef<'_, V>, GrammarError> {
        if !verify_ident(name) {
            return Err(GrammarError::InvalidName(name.to_owned()));
        }
        let re =
            Regex::new(&format!(r"\A(?:{})", pattern)).map_err(|source| {
                GrammarError::InvalidPattern {
                    name: name.to_owned(),
                    source,
                }
            })?;
        self.declare_terminal(name, Matcher::Pattern(re))
    }

    /// Specify the start symbol. May be called before the rule set exists.
    pub fn start(&mut self, name: &str) {
        self.start.replace(name.to_owned());
    }

    fn declare_terminal(
        &mut self,
        name: &str,
        matcher: Matcher,
    ) -> Result<TerminalRef<'_, V>, GrammarError> {
        if self.sets.contains_key(name) {
            return Err(GrammarError::Redeclared(name.to_owned()));
        }
        let index = self.rules.len();
        self.rules.push(ProtoRule {
            lhs: name.to_owned(),
            parts: Vec::new(),
            matcher: Some(matcher),
            token_action: None,
            reduce_action: None,
            prec: 0,
            assoc: Assoc::default(),
            skip: false,
        });
        self.sets.insert(name.to_owned(), vec![index]);
        Ok(TerminalRef {
            rule: &mut self.rules[index],
        })
    }

    fn finish(mut self) -> Result<Grammar<V>, GrammarError> {
        // Literal components referencing no declared rule set implicitly
        // declare one, appended after all explicit declarations.
        let mut implicit = Vec::new();
        for rule in &self.rules {
            for part in &rule.parts {
                if let Part::Lit(text) = part {
                    if !self.sets.contains_key(text) && !implicit.contains(text) {
                        implicit.push(text.clone());
                    }
                }
            }
        }
        for text in implicit {
            let index = self.rules.len();
            self.rules.push(ProtoRule {
                lhs: text.clone(),
                parts: Vec::new(),
                matcher: Some(Matcher::Literal(text.clone())),
                token_action: None,
                reduce_action: None,
                prec: 0,
                assoc: Assoc::default(),
                skip: false,
            });
            self.sets.insert(text, vec![index]);
        }

        let symbol_of = |sets: &IndexMap<String, Vec<usize>>, name: &str| {
            sets.get_index_of(name).map(|i| SymbolID::new(i as u32))
        };

        let start = match &self.start {
            Some(name) => symbol_of(&self.sets, name)
                .ok_or_else(|| GrammarError::UndefinedStart(name.clone()))?,
            None => {
                if self.sets.is_empty() {
                    return Err(GrammarError::EmptyGrammar);
                }
                SymbolID::new(0)
            }
        };

        let mut sets: IndexMap<SymbolID, RuleSet> = IndexMap::new();
        for (i, (name, indices)) in self.sets.iter().enumerate() {
            let id = SymbolID::new(i as u32);
            let terminal = indices.len() == 1 && self.rules[indices[0]].matcher.is_some();
            sets.insert(
                id,
                RuleSet {
                    name: name.clone(),
                    rules: indices.iter().map(|i| RuleID::new(*i as u32)).collect(),
                    terminal,
                },
            );
        }

        let mut rules: IndexMap<RuleID, Rule<V>> = IndexMap::new();
        for (index, proto) in self.rules.into_iter().enumerate() {
            let lhs = symbol_of(&self.sets, &proto.lhs).unwrap();
            let kind = match proto.matcher {
                Some(matcher) => RuleKind::Terminal {
                    matcher,
                    action: proto.token_action,
                    prec: proto.prec,
                    assoc: proto.assoc,
                    skip: proto.skip,
                },
                None => {
                    let mut parts = Vec::with_capacity(proto.parts.len());
                    for part in &proto.parts {
                        let name = match part {
                            Part::Sym(name) | Part::Lit(name) => name,
                        };
                        let id = symbol_of(&self.sets, name)
                            .ok_or_else(|| GrammarError::UndefinedSymbol(name.clone()))?;
                        parts.push(id);
                    }
                    RuleKind::Production {
                        parts,
                        action: proto
                            .reduce_action
                            .expect("production rules always carry an action"),
                    }
                }
            };
            rules.insert(RuleID::new(index as u32), Rule { lhs, kind });
        }

        tracing::debug!(
            "resolved grammar: {} rule sets, {} rules",
            sets.len(),
            rules.len()
        );

        Ok(Grammar {
            sets,
            rules,
            start,
            table: OnceCell::new(),
        })
    }
}

/// Handle to a freshly declared terminal, for chaining configuration.
pub struct TerminalRef<'a, V> {
    rule: &'a mut ProtoRule<V>,
}

impl<'a, V> TerminalRef<'a, V> {
    /// Set the precedence used in shift/reduce conflict resolution.
    pub fn prec(self, prec: u16) -> Self {
        self.rule.prec = prec;
        self
    }

    /// Set the associativity used to break equal-precedence conflicts.
    pub fn assoc(self, assoc: Assoc) -> Self {
        self.rule.assoc = assoc;
        self
    }

    /// Install a custom token action applied to the matched text.
    pub fn map(self, f: impl Fn(&str) -> V + 'static) -> Self {
        self.rule.token_action = Some(Rc::new(f));
        self
    }

    /// Matches are consumed by the lexer but never delivered to the parser.
    pub fn skip(self) -> Self {
        self.rule.skip = true;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarError {
    #[error("`{0}` is not a valid rule name")]
    InvalidName(String),

    #[error("terminal `{0}` conflicts with an existing rule set")]
    Redeclared(String),

    #[error("`{0}` is a literal terminal and cannot take alternatives")]
    TerminalAlternative(String),

    #[error("regex terminal `{0}` cannot appear in a nonterminal rule set")]
    PatternInNonterminal(String),

    #[error("invalid pattern for `{name}`")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule `{0}` is referenced but never defined")]
    UndefinedSymbol(String),

    #[error("start rule `{0}` is not defined")]
    UndefinedStart(String),

    #[error("grammar defines no rules")]
    EmptyGrammar,

    #[error("reduce/reduce conflict between {first} and {second}")]
    ReduceReduce { first: String, second: String },
}

fn verify_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first == '_' || unicode_ident::is_xid_start(first) => {}
        _ => return false,
    }
    chars.all(unicode_ident::is_xid_continue)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_literals_resolve() {
        let grammar = Grammar::<Value>::define(|g| {
            g.rule("prog", [lit("a"), lit("b")], Value::List)?;
            g.start("prog");
            Ok(())
        })
        .unwrap();

        let a = grammar.symbol("a").unwrap();
        assert!(grammar.set(a).terminal);
        assert!(grammar.symbol("b").is_some());
        assert!(!grammar.set(grammar.symbol("prog").unwrap()).terminal);
    }

    #[test]
    fn undefined_symbol_is_reported() {
        let err = Grammar::<Value>::define(|g| {
            g.rule_value("prog", [sym("missing")])?;
            g.start("prog");
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedSymbol(name) if name == "missing"));
    }

    #[test]
    fn undefined_start_is_reported() {
        let err = Grammar::<Value>::define(|g| {
            g.literal("a")?;
            g.start("prog");
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::UndefinedStart(name) if name == "prog"));
    }

    #[test]
    fn pattern_rejects_nonterminal_alternative() {
        let err = Grammar::<Value>::define(|g| {
            g.pattern("int", "[0-9]+")?;
            g.rule_value("int", [lit("x")])?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::PatternInNonterminal(name) if name == "int"));
    }

    #[test]
    fn invalid_pattern_is_immediate() {
        let err = Grammar::<Value>::define(|g| {
            g.pattern("broken", "[")?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::InvalidPattern { name, .. } if name == "broken"));
    }

    #[test]
    fn rule_names_are_validated() {
        let err = Grammar::<Value>::define(|g| {
            g.rule_value("1bad", [lit("a")])?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::InvalidName(name) if name == "1bad"));
    }

    #[test]
    fn redeclared_terminal_is_rejected() {
        let err = Grammar::<Value>::define(|g| {
            g.literal("+")?;
            g.literal("+")?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarError::Redeclared(name) if name == "+"));
    }
}
