use indexmap::IndexMap;

use crate::value::{SymbolId, Value};

/// Storage behind a symbol: name, current value and property list.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// `None` for anonymous symbols made by `box`.
    pub name: Option<Box<str>>,
    pub value: Value,
    /// List of `(key . value)` cells.
    pub props: Value,
    /// Transient and anonymous symbols are not reachable by name.
    pub interned: bool,
}

/// Well-known symbol IDs, pre-interned at startup.
/// These must match the order of `WELL_KNOWN` below.
pub mod sym {
    use crate::value::SymbolId;

    pub const NIL: SymbolId = SymbolId(0);
    pub const T: SymbolId = SymbolId(1);
    pub const QUOTE: SymbolId = SymbolId(2);
    pub const AT: SymbolId = SymbolId(3);
    pub const AT2: SymbolId = SymbolId(4);
    pub const AT3: SymbolId = SymbolId(5);
    pub const MSG: SymbolId = SymbolId(6);
    pub const ERR: SymbolId = SymbolId(7);
    pub const BYE: SymbolId = SymbolId(8);

    /// Symbols whose value may never change.
    pub fn is_protected(id: SymbolId) -> bool {
        id == NIL || id == T
    }
}

const WELL_KNOWN: [&str; 9] = ["NIL", "T", "quote", "@", "@@", "@@@", "*Msg", "*Err", "*Bye"];

/// Canonical name -> symbol mapping. Two `intern` calls with equal names
/// always return the same SymbolId, so symbols compare by identity.
pub struct SymbolTable {
    index: IndexMap<Box<str>, SymbolId>,
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = SymbolTable {
            index: IndexMap::new(),
            symbols: Vec::new(),
        };
        for name in WELL_KNOWN {
            table.intern(name);
        }
        table.get_mut(sym::T).value = Value::T;
        table
    }

    /// Return the symbol named `name`, creating it on first use.
    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.index.get(name) {
            return id;
        }
        let id = self.push(Some(name), true);
        self.index.insert(name.into(), id);
        id
    }

    /// A named symbol that is never entered in the index (a long string).
    pub fn transient(&mut self, name: &str) -> SymbolId {
        self.push(Some(name), false)
    }

    /// A string value: NIL when empty, an immediate when short, otherwise
    /// a fresh transient symbol.
    pub fn string(&mut self, s: &str) -> Value {
        if s.is_empty() {
            return Value::NIL;
        }
        match Value::text(s) {
            Some(v) => v,
            None => Value::symbol(self.transient(s)),
        }
    }

    /// A fresh symbol without a name.
    pub fn anonymous(&mut self) -> SymbolId {
        self.push(None, false)
    }

    fn push(&mut self, name: Option<&str>, interned: bool) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.map(Into::into),
            value: Value::NIL,
            props: Value::NIL,
            interned,
        });
        id
    }

    /// Look up a symbol by name, without interning.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.index.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> Option<&str> {
        self.get(id).name.as_deref()
    }

    #[inline]
    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    #[inline]
    pub fn value(&self, id: SymbolId) -> Value {
        self.get(id).value
    }

    #[inline]
    pub fn set_value(&mut self, id: SymbolId, val: Value) {
        self.get_mut(id).value = val;
    }

    /// Interned symbols in creation order.
    pub fn interned(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.index.values().copied()
    }

    /// Total number of symbols, including transient and anonymous ones.
    pub fn count(&self) -> usize {
        self.symbols.len()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_symbols_have_fixed_ids() {
        let mut table = SymbolTable::new();
        for (i, name) in WELL_KNOWN.iter().enumerate() {
            assert_eq!(table.intern(name), SymbolId(i as u32));
        }
        assert_eq!(table.value(sym::NIL), Value::NIL);
        assert_eq!(table.value(sym::T), Value::T);
        assert!(sym::is_protected(sym::NIL) && !sym::is_protected(sym::QUOTE));
    }

    #[test]
    fn intern_is_idempotent_and_distinguishes_names() {
        let mut table = SymbolTable::new();
        let a = table.intern("alpha");
        let b = table.intern("beta");
        assert_eq!(table.intern("alpha"), a);
        assert_ne!(a, b);
        assert_eq!(table.name(a), Some("alpha"));
        assert_eq!(table.value(a), Value::NIL);
    }

    #[test]
    fn transient_and_anonymous_symbols_stay_out_of_the_index() {
        let mut table = SymbolTable::new();
        let t = table.transient("a long string");
        assert_eq!(table.lookup("a long string"), None);
        assert_ne!(table.intern("a long string"), t);
        let b = table.anonymous();
        assert_eq!(table.name(b), None);
        assert!(!table.get(b).interned);
    }

    #[test]
    fn interned_iterates_in_creation_order() {
        let mut table = SymbolTable::new();
        table.intern("zeta");
        table.intern("alpha");
        let names: Vec<_> = table.interned().filter_map(|id| table.name(id)).collect();
        assert_eq!(&names[names.len() - 2..], ["zeta", "alpha"]);
        assert_eq!(names[0], "NIL");
    }
}
