use std::fmt;

/// Index of a cell in the heap. Stands in for the cell's address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(pub u32);

/// Index of a symbol in the symbol table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Index of a native function in the installed primitive table.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimId(pub u32);

// Tag layout of the value word (low bits first):
//
//   ..00  cell       index << 2
//   ..10  number     signed integer << 2
//   .001  symbol     index << 3
//   .011  primitive  index << 3
//   .101  text       up to 7 bytes << 8, length in bits 3..6
//   .111  reserved
const TAG2_MASK: u64 = 0b11;
const TAG3_MASK: u64 = 0b111;
const CELL_TAG: u64 = 0b00;
const NUM_TAG: u64 = 0b10;
const SYM_TAG: u64 = 0b001;
const PRIM_TAG: u64 = 0b011;
const TEXT_TAG: u64 = 0b101;

/// Bits available to a numeric immediate (word size minus the two tag bits).
pub const NUM_BITS: u32 = 62;
/// Smallest integer that survives `boxed`/`unboxed`.
pub const NUM_MIN: i64 = -(1 << (NUM_BITS - 1));
/// Largest integer that survives `boxed`/`unboxed`.
pub const NUM_MAX: i64 = (1 << (NUM_BITS - 1)) - 1;
/// Longest string (in bytes) stored inline as a short text.
pub const TEXT_MAX: usize = 7;

/// The universal handle: one machine word, either a cell index, a symbol
/// index, a primitive index or an immediate (number or short text).
/// Copy semantics; cell and symbol contents live in their tables.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Value(u64);

static_assertions::assert_eq_size!(Value, u64);

/// Decoded view of a value word, for matching.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Kind {
    Cell(CellId),
    Number(i64),
    Symbol(SymbolId),
    Text(ShortText),
    Primitive(PrimId),
}

impl Value {
    /// Empty list and false. Symbol 0 of every table.
    pub const NIL: Value = Value::symbol(SymbolId(0));
    /// Canonical true. Symbol 1 of every table.
    pub const T: Value = Value::symbol(SymbolId(1));
    pub const ZERO: Value = Value::boxed(0);
    pub const ONE: Value = Value::boxed(1);

    #[inline(always)]
    pub const fn cell(id: CellId) -> Value {
        Value(((id.0 as u64) << 2) | CELL_TAG)
    }

    #[inline(always)]
    pub const fn symbol(id: SymbolId) -> Value {
        Value(((id.0 as u64) << 3) | SYM_TAG)
    }

    #[inline(always)]
    pub const fn primitive(id: PrimId) -> Value {
        Value(((id.0 as u64) << 3) | PRIM_TAG)
    }

    /// Shift-encode an integer. `n` must lie in `NUM_MIN..=NUM_MAX`;
    /// use `try_boxed` when that is not already known.
    #[inline(always)]
    pub const fn boxed(n: i64) -> Value {
        Value(((n << 2) as u64) | NUM_TAG)
    }

    pub fn try_boxed(n: i64) -> Option<Value> {
        (NUM_MIN..=NUM_MAX).contains(&n).then(|| Value::boxed(n))
    }

    /// Decode a numeric immediate. Meaningless for other kinds.
    #[inline(always)]
    pub const fn unboxed(self) -> i64 {
        (self.0 as i64) >> 2
    }

    /// Pack a non-empty string of at most `TEXT_MAX` bytes into the word.
    pub fn text(s: &str) -> Option<Value> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > TEXT_MAX {
            return None;
        }
        let mut payload = 0u64;
        for (i, &b) in bytes.iter().enumerate() {
            payload |= (b as u64) << (8 * i);
        }
        Some(Value((payload << 8) | ((bytes.len() as u64) << 3) | TEXT_TAG))
    }

    /// The raw word, for hashing and diagnostics.
    pub fn word(self) -> u64 {
        self.0
    }

    pub fn kind(self) -> Kind {
        match self.0 & TAG2_MASK {
            CELL_TAG => Kind::Cell(CellId((self.0 >> 2) as u32)),
            NUM_TAG => Kind::Number(self.unboxed()),
            _ => match self.0 & TAG3_MASK {
                SYM_TAG => Kind::Symbol(SymbolId((self.0 >> 3) as u32)),
                PRIM_TAG => Kind::Primitive(PrimId((self.0 >> 3) as u32)),
                TEXT_TAG => Kind::Text(ShortText::decode(self.0)),
                _ => unreachable!("reserved tag in value word {:#x}", self.0),
            },
        }
    }

    #[inline]
    pub fn is_nil(self) -> bool {
        self == Value::NIL
    }

    #[inline]
    pub fn is_t(self) -> bool {
        self == Value::T
    }

    #[inline]
    pub fn is_cell(self) -> bool {
        self.0 & TAG2_MASK == CELL_TAG
    }

    #[inline]
    pub fn is_num(self) -> bool {
        self.0 & TAG2_MASK == NUM_TAG
    }

    #[inline]
    pub fn is_sym(self) -> bool {
        self.0 & TAG3_MASK == SYM_TAG
    }

    #[inline]
    pub fn is_text(self) -> bool {
        self.0 & TAG3_MASK == TEXT_TAG
    }

    #[inline]
    pub fn is_prim(self) -> bool {
        self.0 & TAG3_MASK == PRIM_TAG
    }

    /// Everything but a cell.
    #[inline]
    pub fn is_atom(self) -> bool {
        !self.is_cell()
    }

    /// A cell or NIL.
    #[inline]
    pub fn is_list(self) -> bool {
        self.is_cell() || self.is_nil()
    }

    pub fn as_cell(self) -> Option<CellId> {
        match self.kind() {
            Kind::Cell(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_num(self) -> Option<i64> {
        self.is_num().then(|| self.unboxed())
    }

    pub fn as_sym(self) -> Option<SymbolId> {
        match self.kind() {
            Kind::Symbol(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_prim(self) -> Option<PrimId> {
        match self.kind() {
            Kind::Primitive(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_text(self) -> Option<ShortText> {
        match self.kind() {
            Kind::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Lisp truth: anything but NIL.
    pub fn from_bool(b: bool) -> Value {
        if b {
            Value::T
        } else {
            Value::NIL
        }
    }
}

/// A short string unpacked from a text immediate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ShortText {
    bytes: [u8; TEXT_MAX],
    len: u8,
}

impl ShortText {
    fn decode(word: u64) -> ShortText {
        let len = ((word >> 3) & 0b111) as u8;
        let payload = word >> 8;
        let mut bytes = [0u8; TEXT_MAX];
        for (i, b) in bytes.iter_mut().enumerate().take(len as usize) {
            *b = (payload >> (8 * i)) as u8;
        }
        ShortText { bytes, len }
    }

    pub fn as_str(&self) -> &str {
        // Only whole `&str`s are ever packed, so the bytes are valid UTF-8.
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl fmt::Debug for ShortText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Kind::Cell(id) => write!(f, "Cell({})", id.0),
            Kind::Number(n) => write!(f, "Num({})", n),
            Kind::Symbol(id) if id.0 == 0 => write!(f, "NIL"),
            Kind::Symbol(id) if id.0 == 1 => write!(f, "T"),
            Kind::Symbol(id) => write!(f, "Sym({})", id.0),
            Kind::Text(t) => write!(f, "Text({:?})", t.as_str()),
            Kind::Primitive(id) => write!(f, "Prim({})", id.0),
        }
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellId({})", self.0)
    }
}

impl fmt::Debug for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymbolId({})", self.0)
    }
}

impl fmt::Debug for PrimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrimId({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boxing_covers_the_range_ends() {
        for n in [NUM_MIN, NUM_MIN + 1, -1, 0, 1, NUM_MAX - 1, NUM_MAX] {
            let v = Value::boxed(n);
            assert!(v.is_num());
            assert_eq!(v.unboxed(), n);
            assert_eq!(v.kind(), Kind::Number(n));
        }
        assert_eq!(Value::try_boxed(NUM_MAX + 1), None);
        assert_eq!(Value::try_boxed(NUM_MIN - 1), None);
    }

    #[test]
    fn tags_are_disjoint() {
        let values = [
            Value::cell(CellId(12)),
            Value::boxed(12),
            Value::symbol(SymbolId(12)),
            Value::primitive(PrimId(12)),
            Value::text("ab").unwrap(),
        ];
        for (i, a) in values.iter().enumerate() {
            for (j, b) in values.iter().enumerate() {
                assert_eq!(i == j, a == b);
            }
        }
        assert!(values[0].is_cell() && !values[0].is_num() && !values[0].is_sym());
        assert!(values[1].is_num() && !values[1].is_cell());
        assert!(values[2].is_sym() && !values[2].is_text() && !values[2].is_prim());
        assert!(values[3].is_prim() && !values[3].is_sym());
        assert!(values[4].is_text() && !values[4].is_sym());
    }

    #[test]
    fn singletons_are_symbols_zero_and_one() {
        assert_eq!(Value::NIL.as_sym(), Some(SymbolId(0)));
        assert_eq!(Value::T.as_sym(), Some(SymbolId(1)));
        assert!(Value::NIL.is_list() && Value::NIL.is_atom());
    }

    #[test]
    fn short_text_packs_up_to_seven_bytes() {
        let v = Value::text("abcdefg").unwrap();
        assert_eq!(v.as_text().unwrap().as_str(), "abcdefg");
        assert_eq!(Value::text("é").unwrap().as_text().unwrap().as_str(), "é");
        assert_eq!(Value::text("abcdefgh"), None);
        assert_eq!(Value::text(""), None);
    }

    proptest! {
        #[test]
        fn unbox_inverts_box(n in NUM_MIN..=NUM_MAX) {
            prop_assert_eq!(Value::boxed(n).unboxed(), n);
            prop_assert_eq!(Value::try_boxed(n).map(Value::unboxed), Some(n));
        }

        #[test]
        fn cell_and_symbol_indices_round_trip(i in 0u32..u32::MAX) {
            prop_assert_eq!(Value::cell(CellId(i)).as_cell(), Some(CellId(i)));
            prop_assert_eq!(Value::symbol(SymbolId(i)).as_sym(), Some(SymbolId(i)));
        }
    }
}
