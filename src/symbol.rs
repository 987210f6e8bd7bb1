use lasso::{Spur, ThreadedRodeo};

/// Interned lexical form of a node or functor name.
pub type Sym = Spur;

/// Thread-safe interner for IRIs, blank node labels, literal lexical forms
/// and functor names.
///
/// The same string always interns to the same `Sym`, so node comparison
/// never touches string data.
pub struct SymbolStore {
    rodeo: ThreadedRodeo,
}

impl SymbolStore {
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Intern a lexical form, returning the existing symbol if already known.
    pub fn intern(&self, text: &str) -> Sym {
        self.rodeo.get_or_intern(text)
    }

    /// Look up a symbol without interning it.
    pub fn get(&self, text: &str) -> Option<Sym> {
        self.rodeo.get(text)
    }

    pub fn resolve(&self, sym: Sym) -> Option<&str> {
        self.rodeo.try_resolve(&sym)
    }

    /// True if the symbol's text begins with `prefix`.
    pub fn has_prefix(&self, sym: Sym, prefix: &str) -> bool {
        self.resolve(sym)
            .map(|text| text.starts_with(prefix))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}
