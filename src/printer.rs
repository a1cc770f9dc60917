use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use crate::eval::Machine;
use crate::symbol::sym;
use crate::value::{CellId, Kind, Value};

/// Nesting beyond this prints as `...`.
const MAX_PRINT_DEPTH: usize = 1000;

/// How a printed list ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpineEnd {
    /// An atom, `NIL` for a proper list.
    Tail(Value),
    /// The last cdr points back at the cell with this position.
    Cycle(usize),
}

/// Renders values as text. In readable mode strings are quoted and symbol
/// names escaped so that the reader gets the same value back.
struct Printer<'a> {
    m: &'a Machine,
    readable: bool,
    /// Spine cells of the lists currently being printed.
    active: HashSet<CellId>,
    out: String,
}

impl<'a> Printer<'a> {
    fn new(m: &'a Machine, readable: bool) -> Self {
        Printer {
            m,
            readable,
            active: HashSet::new(),
            out: String::new(),
        }
    }

    fn print(&mut self, val: Value, depth: usize) {
        if depth > MAX_PRINT_DEPTH {
            self.out.push_str("...");
            return;
        }
        match val.kind() {
            Kind::Number(n) => {
                let _ = write!(self.out, "{}", n);
            }
            Kind::Text(t) => self.print_name(t.as_str(), false),
            Kind::Symbol(id) => {
                let m = self.m;
                let s = m.symbols.get(id);
                match &s.name {
                    Some(name) => self.print_name(name, s.interned),
                    None => {
                        let _ = write!(self.out, "${}", id.0);
                    }
                }
            }
            Kind::Primitive(_) => {
                let m = self.m;
                let name = m.primitive_name(val).unwrap_or("?");
                let _ = write!(self.out, "#<subr {}>", name);
            }
            Kind::Cell(id) => self.print_cell(id, depth),
        }
    }

    fn print_cell(&mut self, id: CellId, depth: usize) {
        if self.active.contains(&id) {
            self.out.push_str("...");
            return;
        }
        let m = self.m;
        let heap = &m.heap;
        if heap.car(id) == Value::symbol(sym::QUOTE) {
            self.out.push('\'');
            self.active.insert(id);
            self.print(heap.cdr(id), depth + 1);
            self.active.remove(&id);
            return;
        }

        let (spine, end) = self.walk_spine(id);
        for &cell in &spine {
            self.active.insert(cell);
        }
        self.out.push('(');
        for (i, &cell) in spine.iter().enumerate() {
            if i > 0 {
                self.out.push(' ');
            }
            if end == SpineEnd::Cycle(i) && i > 0 {
                self.out.push_str(". (");
            }
            self.print(heap.car(cell), depth + 1);
        }
        match end {
            SpineEnd::Cycle(0) => self.out.push_str(" .)"),
            SpineEnd::Cycle(_) => self.out.push_str(" .))"),
            SpineEnd::Tail(tail) if tail.is_nil() => self.out.push(')'),
            SpineEnd::Tail(tail) => {
                self.out.push_str(" . ");
                self.print(tail, depth + 1);
                self.out.push(')');
            }
        }
        for cell in spine {
            self.active.remove(&cell);
        }
    }

    /// The cells of the list starting at `id`, up to the first atom, the
    /// first repeated cell or the first cell of an enclosing list.
    fn walk_spine(&self, id: CellId) -> (Vec<CellId>, SpineEnd) {
        let heap = &self.m.heap;
        let mut spine = vec![id];
        let mut index = HashMap::from([(id, 0)]);
        let mut x = heap.cdr(id);
        loop {
            match x.as_cell() {
                Some(next) => {
                    if let Some(&i) = index.get(&next) {
                        return (spine, SpineEnd::Cycle(i));
                    }
                    if self.active.contains(&next) {
                        return (spine, SpineEnd::Tail(x));
                    }
                    index.insert(next, spine.len());
                    spine.push(next);
                    x = heap.cdr(next);
                }
                None => return (spine, SpineEnd::Tail(x)),
            }
        }
    }

    fn print_name(&mut self, name: &str, interned: bool) {
        if !self.readable {
            self.out.push_str(name);
        } else if interned {
            self.print_symbol(name);
        } else {
            self.print_string(name);
        }
    }

    fn print_symbol(&mut self, name: &str) {
        let digits = name.strip_prefix(|c| c == '-' || c == '+').unwrap_or(name);
        let numeric = !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
        for (i, c) in name.chars().enumerate() {
            let special = c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '"' | '\'' | '\\');
            if special || (i == 0 && (numeric || c == '#' || name == ".")) {
                self.out.push('\\');
            }
            self.out.push(c);
        }
    }

    fn print_string(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' | '\\' | '^' => {
                    self.out.push('\\');
                    self.out.push(c);
                }
                '\x7f' => self.out.push_str("^?"),
                c if (c as u32) < 0x20 => {
                    self.out.push('^');
                    self.out.push((c as u8 + 0x40) as char);
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }
}

impl Machine {
    /// Readable text of `v`: strings quoted, symbol names escaped.
    pub fn print_string(&self, v: Value) -> String {
        let mut p = Printer::new(self, true);
        p.print(v, 0);
        p.out
    }

    /// Plain text of `v`, as `prin` writes it.
    pub fn prin_string(&self, v: Value) -> String {
        let mut p = Printer::new(self, false);
        p.print(v, 0);
        p.out
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::config::Config;
    use crate::eval::Machine;
    use crate::value::Value;

    fn machine() -> Machine {
        Machine::new(Config::default()).unwrap()
    }

    #[test]
    fn atoms_print_in_readable_and_plain_form() {
        let mut m = machine();
        assert_eq!(m.print_string(Value::boxed(-12)), "-12");
        assert_eq!(m.print_string(Value::NIL), "NIL");
        assert_eq!(m.print_string(Value::T), "T");
        let s = m.mk_str("a \"quoted\" string");
        assert_eq!(m.print_string(s), "\"a \\\"quoted\\\" string\"");
        assert_eq!(m.prin_string(s), "a \"quoted\" string");
        let odd = m.intern("12");
        assert_eq!(m.print_string(odd), "\\12");
        let plus = m.intern("+");
        let f = m.val(plus);
        assert_eq!(m.print_string(f), "#<subr +>");
    }

    #[test]
    fn circular_structures_print_finitely() {
        let mut m = machine();
        let v = m.eval_str("(circ 1 2 3)").unwrap();
        assert_eq!(m.print_string(v), "(1 2 3 .)");
        let v = m.eval_str("(let L (list 1 2) (set L L) L)").unwrap();
        assert_eq!(m.print_string(v), "(... 2)");
    }

    #[rstest]
    #[case("(cons 0 (circ 1 2))", "(0 . (1 2 .))")]
    #[case("(cons 'a 'b (circ 'c))", "(a b . (c .))")]
    #[case("(list 1 (circ 2 3) 4)", "(1 (2 3 .) 4)")]
    fn cycles_past_the_head_print_as_a_dotted_tail(#[case] src: &str, #[case] expected: &str) {
        let mut m = machine();
        let v = m.eval_str(src).unwrap();
        let text = m.print_string(v);
        assert_eq!(text, expected);
        let back = m.eval_str(&format!("'{}", text)).unwrap();
        assert_eq!(m.print_string(back), expected);
        assert!(m.equal(back, v));
    }

    #[test]
    fn cdr_into_an_enclosing_list_prints_as_ellipsis() {
        let mut m = machine();
        let v = m
            .eval_str("(let (L (list 1 2) M (list 3)) (con M L) (set (cdr L) M) L)")
            .unwrap();
        assert_eq!(m.print_string(v), "(1 (3 . ...))");
    }

    #[test]
    fn long_lists_print_in_linear_time() {
        let mut m = machine();
        let v = m.eval_str("(make (do 100000 (link 1)))").unwrap();
        let text = m.print_string(v);
        assert_eq!(text.len(), 200_001);
        assert!(text.starts_with("(1 1 ") && text.ends_with(" 1)"));
    }

    #[test]
    fn anonymous_symbols_print_with_their_number() {
        let mut m = machine();
        let b = m.eval_str("(box)").unwrap();
        assert!(m.print_string(b).starts_with('$'));
    }
}
