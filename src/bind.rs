use crate::symbol::SymbolTable;
use crate::value::{SymbolId, Value};

/// A saved symbol value, restored when the frame is popped.
#[derive(Debug, Clone, Copy)]
pub struct BindFrame {
    pub sym: SymbolId,
    pub saved: Value,
}

/// Handle for the frame pushed by one `bind` call.
#[must_use = "a binding must be undone with unbind or unbind_to"]
#[derive(Debug, PartialEq, Eq)]
pub struct BindMark(usize);

impl BindMark {
    /// Stack depth just below the frame.
    pub fn depth(&self) -> usize {
        self.0
    }
}

/// Dynamic binding stack. Frames are strictly LIFO.
#[derive(Default)]
pub struct BindStack {
    frames: Vec<BindFrame>,
}

impl BindStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the current value of `sym` and assign `val`.
    pub fn bind(&mut self, symbols: &mut SymbolTable, sym: SymbolId, val: Value) -> BindMark {
        let mark = BindMark(self.frames.len());
        self.frames.push(BindFrame {
            sym,
            saved: symbols.value(sym),
        });
        symbols.set_value(sym, val);
        mark
    }

    /// Restore and pop exactly the frame `mark` refers to, which must be on top.
    pub fn unbind(&mut self, symbols: &mut SymbolTable, mark: BindMark) {
        assert_eq!(
            mark.0 + 1,
            self.frames.len(),
            "binding frames unwound out of order"
        );
        self.unbind_to(symbols, mark.0);
    }

    /// Restore and pop every frame above `depth`, newest first.
    /// A no-op when the stack is already at or below `depth`.
    pub fn unbind_to(&mut self, symbols: &mut SymbolTable, depth: usize) {
        while self.frames.len() > depth {
            if let Some(frame) = self.frames.pop() {
                symbols.set_value(frame.sym, frame.saved);
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbind_restores_the_previous_value() {
        let mut symbols = SymbolTable::new();
        let mut stack = BindStack::new();
        let x = symbols.intern("x");
        symbols.set_value(x, Value::boxed(1));

        let mark = stack.bind(&mut symbols, x, Value::boxed(2));
        assert_eq!(symbols.value(x), Value::boxed(2));
        stack.unbind(&mut symbols, mark);
        assert_eq!(symbols.value(x), Value::boxed(1));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn unbind_to_restores_nested_rebindings_of_one_symbol() {
        let mut symbols = SymbolTable::new();
        let mut stack = BindStack::new();
        let x = symbols.intern("x");
        let y = symbols.intern("y");

        let outer = stack.bind(&mut symbols, x, Value::boxed(1));
        let _ = stack.bind(&mut symbols, y, Value::boxed(2));
        let _ = stack.bind(&mut symbols, x, Value::boxed(3));
        assert_eq!(symbols.value(x), Value::boxed(3));

        stack.unbind_to(&mut symbols, outer.depth());
        assert_eq!(symbols.value(x), Value::NIL);
        assert_eq!(symbols.value(y), Value::NIL);

        // idempotent
        stack.unbind_to(&mut symbols, outer.depth());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn unbinding_below_the_top_panics() {
        let mut symbols = SymbolTable::new();
        let mut stack = BindStack::new();
        let x = symbols.intern("x");
        let first = stack.bind(&mut symbols, x, Value::ONE);
        let _second = stack.bind(&mut symbols, x, Value::ZERO);
        stack.unbind(&mut symbols, first);
    }
}
