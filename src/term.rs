use crate::symbol::{Sym, SymbolStore};
use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use smallvec::SmallVec;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

/// Unique identifier for a node in the term store.
/// Structurally equal nodes share an id, so equality is id equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Get the raw u32 value (for debugging/display).
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A graph node, a rule variable, or a structured functor value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// Named resource.
    Iri(Sym),
    /// Anonymous resource, identified by its label.
    Blank(Sym),
    /// Literal value, stored by lexical form.
    Literal(Sym),
    /// Variable slot in a binding environment.
    Var(u32),
    /// Structured value: a name applied to arguments. Used for builtin calls
    /// in rule bodies and heads, and as opaque objects in deductions.
    Functor(Sym, SmallVec<[TermId; 4]>),
}

impl Term {
    pub fn is_var(&self) -> bool {
        matches!(self, Term::Var(_))
    }
}

/// Numeric view of a literal, used by arithmetic and comparison builtins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn parse(text: &str) -> Option<Number> {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Number::Int(i));
        }
        text.parse::<f64>().ok().map(Number::Float)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    pub fn lexical(self) -> String {
        match self {
            Number::Int(i) => i.to_string(),
            Number::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
        }
    }
}

/// Number of shards for hashcons maps (power of 2 for fast modulo).
const NUM_SHARDS: usize = 16;

/// Thread-safe node store with hashconsing.
///
/// Owns the symbol interner, so every node constructor takes plain strings.
/// Node ids are never freed for the lifetime of the store.
pub struct TermStore {
    symbols: SymbolStore,
    nodes: RwLock<Vec<Term>>,
    shards: [RwLock<HashMap<Term, TermId>>; NUM_SHARDS],
    next_id: AtomicU32,
}

impl TermStore {
    pub fn new() -> Self {
        let shards = std::array::from_fn(|_| RwLock::new(HashMap::new()));
        Self {
            symbols: SymbolStore::new(),
            nodes: RwLock::new(Vec::new()),
            shards,
            next_id: AtomicU32::new(0),
        }
    }

    pub fn symbols(&self) -> &SymbolStore {
        &self.symbols
    }

    fn intern(&self, term: Term) -> TermId {
        let shard = &self.shards[Self::shard_index(&term)];

        {
            let map = shard.read();
            if let Some(&id) = map.get(&term) {
                return id;
            }
        }

        let mut map = shard.write();
        if let Some(&id) = map.get(&term) {
            return id;
        }

        let id = TermId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut nodes = self.nodes.write();
            let idx = id.0 as usize;
            if nodes.len() <= idx {
                nodes.resize(idx + 1, Term::Var(0));
            }
            nodes[idx] = term.clone();
        }
        map.insert(term, id);
        id
    }

    pub fn iri(&self, iri: &str) -> TermId {
        let sym = self.symbols.intern(iri);
        self.intern(Term::Iri(sym))
    }

    pub fn blank(&self, label: &str) -> TermId {
        let sym = self.symbols.intern(label);
        self.intern(Term::Blank(sym))
    }

    pub fn literal(&self, lexical: &str) -> TermId {
        let sym = self.symbols.intern(lexical);
        self.intern(Term::Literal(sym))
    }

    pub fn number(&self, value: Number) -> TermId {
        self.literal(&value.lexical())
    }

    pub fn int(&self, value: i64) -> TermId {
        self.number(Number::Int(value))
    }

    pub fn var(&self, index: u32) -> TermId {
        self.intern(Term::Var(index))
    }

    pub fn functor(&self, name: &str, args: SmallVec<[TermId; 4]>) -> TermId {
        let sym = self.symbols.intern(name);
        self.functor_sym(sym, args)
    }

    pub fn functor_sym(&self, name: Sym, args: SmallVec<[TermId; 4]>) -> TermId {
        self.intern(Term::Functor(name, args))
    }

    /// Resolve a TermId to its node.
    /// Returns None if the TermId did not come from this store.
    pub fn resolve(&self, id: TermId) -> Option<Term> {
        let nodes = self.nodes.read();
        nodes.get(id.0 as usize).cloned()
    }

    pub fn is_var(&self, id: TermId) -> Option<u32> {
        match self.resolve(id)? {
            Term::Var(idx) => Some(idx),
            _ => None,
        }
    }

    pub fn is_literal(&self, id: TermId) -> bool {
        matches!(self.resolve(id), Some(Term::Literal(_)))
    }

    pub fn is_blank(&self, id: TermId) -> bool {
        matches!(self.resolve(id), Some(Term::Blank(_)))
    }

    pub fn is_functor(&self, id: TermId) -> bool {
        matches!(self.resolve(id), Some(Term::Functor(..)))
    }

    pub fn functor_parts(&self, id: TermId) -> Option<(Sym, SmallVec<[TermId; 4]>)> {
        match self.resolve(id)? {
            Term::Functor(name, args) => Some((name, args)),
            _ => None,
        }
    }

    /// Lexical text of an IRI, blank label or literal.
    pub fn label(&self, id: TermId) -> Option<String> {
        let sym = match self.resolve(id)? {
            Term::Iri(s) | Term::Blank(s) | Term::Literal(s) | Term::Functor(s, _) => s,
            Term::Var(_) => return None,
        };
        self.symbols.resolve(sym).map(str::to_owned)
    }

    pub fn number_value(&self, id: TermId) -> Option<Number> {
        match self.resolve(id)? {
            Term::Literal(sym) => Number::parse(self.symbols.resolve(sym)?),
            _ => None,
        }
    }

    /// True if the node contains no variables.
    pub fn is_ground(&self, id: TermId) -> bool {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            match self.resolve(current) {
                Some(Term::Var(_)) | None => return false,
                Some(Term::Functor(_, args)) => stack.extend(args.iter().copied()),
                Some(_) => {}
            }
        }
        true
    }

    /// Rebuild a node with each variable replaced by `f(index)`.
    /// Ground nodes come back unchanged.
    pub fn map_vars(&self, id: TermId, f: &mut impl FnMut(u32) -> TermId) -> TermId {
        match self.resolve(id) {
            Some(Term::Var(idx)) => f(idx),
            Some(Term::Functor(name, args)) => {
                let mut changed = false;
                let mapped: SmallVec<[TermId; 4]> = args
                    .iter()
                    .map(|&arg| {
                        let out = self.map_vars(arg, f);
                        changed |= out != arg;
                        out
                    })
                    .collect();
                if changed {
                    self.intern(Term::Functor(name, mapped))
                } else {
                    id
                }
            }
            _ => id,
        }
    }

    /// Shift every variable index by `offset`.
    pub fn offset_vars(&self, id: TermId, offset: u32) -> TermId {
        if offset == 0 {
            return id;
        }
        self.map_vars(id, &mut |idx| self.var(idx + offset))
    }

    /// Collect the distinct variable indices of a node, in first-seen order.
    pub fn collect_vars(&self, id: TermId, out: &mut SmallVec<[u32; 8]>) {
        match self.resolve(id) {
            Some(Term::Var(idx)) => {
                if !out.contains(&idx) {
                    out.push(idx);
                }
            }
            Some(Term::Functor(_, args)) => {
                for arg in args {
                    self.collect_vars(arg, out);
                }
            }
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_index(term: &Term) -> usize {
        let mut hasher = FxHasher::default();
        term.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }
}

impl Default for TermStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a node for logs and test output.
pub fn format_term(id: TermId, terms: &TermStore) -> String {
    fn render(id: TermId, terms: &TermStore, out: &mut String) {
        let symbols = terms.symbols();
        match terms.resolve(id) {
            Some(Term::Iri(s)) => out.push_str(symbols.resolve(s).unwrap_or("?iri")),
            Some(Term::Blank(s)) => {
                out.push_str("_:");
                out.push_str(symbols.resolve(s).unwrap_or(""));
            }
            Some(Term::Literal(s)) => {
                out.push('"');
                out.push_str(symbols.resolve(s).unwrap_or(""));
                out.push('"');
            }
            Some(Term::Var(idx)) => {
                out.push('?');
                out.push_str(&idx.to_string());
            }
            Some(Term::Functor(name, args)) => {
                out.push_str(symbols.resolve(name).unwrap_or("?functor"));
                out.push('(');
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    render(*arg, terms, out);
                }
                out.push(')');
            }
            None => out.push_str("<unknown>"),
        }
    }

    let mut out = String::new();
    render(id, terms, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    // ===== HASHCONSING =====

    #[test]
    fn same_iri_same_id() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let b = terms.iri("ex:a");
        assert_eq!(a, b, "Equal IRIs must share a TermId");
    }

    #[test]
    fn kinds_with_same_text_differ() {
        let terms = TermStore::new();
        let iri = terms.iri("x");
        let blank = terms.blank("x");
        let lit = terms.literal("x");
        assert_ne!(iri, blank);
        assert_ne!(iri, lit);
        assert_ne!(blank, lit);
    }

    #[test]
    fn functors_hashcons_structurally() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let one = terms.int(1);
        let f1 = terms.functor("pair", smallvec![a, one]);
        let f2 = terms.functor("pair", smallvec![a, one]);
        let f3 = terms.functor("pair", smallvec![one, a]);
        assert_eq!(f1, f2);
        assert_ne!(f1, f3, "Argument order matters");
    }

    // ===== QUERIES =====

    #[test]
    fn groundness() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let v = terms.var(0);
        let ground = terms.functor("f", smallvec![a]);
        let open = terms.functor("f", smallvec![a, v]);
        assert!(terms.is_ground(a));
        assert!(!terms.is_ground(v));
        assert!(terms.is_ground(ground));
        assert!(!terms.is_ground(open));
    }

    #[test]
    fn number_parsing() {
        let terms = TermStore::new();
        assert_eq!(terms.number_value(terms.int(42)), Some(Number::Int(42)));
        assert_eq!(
            terms.number_value(terms.literal("2.5")),
            Some(Number::Float(2.5))
        );
        assert_eq!(terms.number_value(terms.literal("abc")), None);
        assert_eq!(terms.number_value(terms.iri("5")), None, "IRIs are not numbers");
    }

    #[test]
    fn float_lexical_keeps_decimal_point() {
        assert_eq!(Number::Float(3.0).lexical(), "3.0");
        assert_eq!(Number::Int(3).lexical(), "3");
    }

    // ===== VARIABLE RENAMING =====

    #[test]
    fn offset_vars_shifts_nested() {
        let terms = TermStore::new();
        let a = terms.iri("ex:a");
        let f = terms.functor("f", smallvec![terms.var(0), a, terms.var(2)]);
        let shifted = terms.offset_vars(f, 10);
        let expected = terms.functor("f", smallvec![terms.var(10), a, terms.var(12)]);
        assert_eq!(shifted, expected);
    }

    #[test]
    fn map_vars_on_ground_is_identity() {
        let terms = TermStore::new();
        let f = terms.functor("f", smallvec![terms.iri("ex:a")]);
        assert_eq!(terms.offset_vars(f, 3), f);
    }

    #[test]
    fn collect_vars_first_seen_order() {
        let terms = TermStore::new();
        let f = terms.functor("f", smallvec![terms.var(3), terms.var(1), terms.var(3)]);
        let mut vars = SmallVec::new();
        terms.collect_vars(f, &mut vars);
        assert_eq!(vars.as_slice(), &[3, 1]);
    }

    // ===== FORMATTING =====

    #[test]
    fn format_nodes() {
        let terms = TermStore::new();
        let f = terms.functor(
            "sum",
            smallvec![terms.var(0), terms.int(2), terms.blank("b0")],
        );
        assert_eq!(format_term(f, &terms), "sum(?0, \"2\", _:b0)");
        assert_eq!(format_term(terms.iri("ex:a"), &terms), "ex:a");
    }
}
