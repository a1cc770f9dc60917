use std::cmp::Ordering;
use std::collections::HashSet;

use super::PrimitiveTable;
use crate::error::Result;
use crate::eval::Machine;
use crate::value::{CellId, Kind, Value};

pub(super) fn register(table: &mut PrimitiveTable) {
    table
        .register("atom", atom)
        .register("pair", pair)
        .register("lst?", lstq)
        .register("num?", numq)
        .register("sym?", symq)
        .register("str?", strq)
        .register("box?", boxq)
        .register("==", eq)
        .register("n==", neq)
        .register("=", equal)
        .register("<>", nequal)
        .register("<", lt)
        .register(">", gt)
        .register("<=", le)
        .register(">=", ge)
        .register("=0", eq0)
        .register("n0", n0)
        .register("=T", eqt)
        .register("lt0", lt0)
        .register("gt0", gt0)
        .register("ge0", ge0);
}

/// Position in the total order NIL < numbers < symbols < lists < T.
fn rank(v: Value) -> u8 {
    if v.is_nil() {
        0
    } else if v.is_t() {
        4
    } else if v.is_num() {
        1
    } else if v.is_cell() {
        3
    } else {
        2
    }
}

impl Machine {
    /// Structural equality. Numbers by value, interned symbols by identity,
    /// strings by name, cells by contents; cycles compare equal where they
    /// line up.
    pub fn equal(&self, a: Value, b: Value) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            if a == b {
                continue;
            }
            match (a.as_cell(), b.as_cell()) {
                (Some(ca), Some(cb)) => {
                    if seen.insert((ca, cb)) {
                        pending.push((self.heap.cdr(ca), self.heap.cdr(cb)));
                        pending.push((self.heap.car(ca), self.heap.car(cb)));
                    }
                }
                (None, None) if self.same_name(a, b) => {}
                _ => return false,
            }
        }
        true
    }

    /// Two distinct symbolic atoms are equal when at least one is a string
    /// and their names agree.
    fn same_name(&self, a: Value, b: Value) -> bool {
        let interned = |v: Value| v.as_sym().map_or(false, |id| self.symbols.get(id).interned);
        if interned(a) && interned(b) {
            return false;
        }
        match (self.name_of(a), self.name_of(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    /// Total order used by `<`, `sort`, `max` and friends.
    pub fn compare(&self, a: Value, b: Value) -> Ordering {
        let mut seen: HashSet<(CellId, CellId)> = HashSet::new();
        // Cars are popped before their cdrs.
        let mut pending = vec![(a, b)];
        while let Some((a, b)) = pending.pop() {
            if a == b {
                continue;
            }
            let (ra, rb) = (rank(a), rank(b));
            if ra != rb {
                return ra.cmp(&rb);
            }
            let o = match (a.kind(), b.kind()) {
                (Kind::Number(x), Kind::Number(y)) => x.cmp(&y),
                (Kind::Cell(ca), Kind::Cell(cb)) => {
                    if seen.insert((ca, cb)) {
                        pending.push((self.heap.cdr(ca), self.heap.cdr(cb)));
                        pending.push((self.heap.car(ca), self.heap.car(cb)));
                    }
                    Ordering::Equal
                }
                _ => self.sort_name(a).cmp(&self.sort_name(b)),
            };
            if o != Ordering::Equal {
                return o;
            }
        }
        Ordering::Equal
    }

    fn sort_name(&self, v: Value) -> String {
        self.name_of(v)
            .or_else(|| self.primitive_name(v).map(str::to_string))
            .unwrap_or_default()
    }

    /// A named symbol that is not interned, or a short string.
    pub(crate) fn is_str(&self, v: Value) -> bool {
        match v.kind() {
            Kind::Text(_) => true,
            Kind::Symbol(id) => {
                let s = self.symbols.get(id);
                !s.interned && s.name.is_some()
            }
            _ => false,
        }
    }
}

fn arg1(m: &mut Machine, ex: Value) -> Result<Value> {
    m.eval_car(m.cdr(ex))
}

/// (atom 'any) -> flg
fn atom(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(Value::from_bool(arg1(m, ex)?.is_atom()))
}

/// (pair 'any) -> any
fn pair(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    Ok(if v.is_cell() { v } else { Value::NIL })
}

/// (lst? 'any) -> flg
fn lstq(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(Value::from_bool(arg1(m, ex)?.is_list()))
}

/// (num? 'any) -> num | NIL
fn numq(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    Ok(if v.is_num() { v } else { Value::NIL })
}

/// (sym? 'any) -> flg
fn symq(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    Ok(Value::from_bool(v.is_sym() || v.is_text()))
}

/// (str? 'any) -> flg
fn strq(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    Ok(Value::from_bool(m.is_str(v)))
}

/// (box? 'any) -> sym | NIL
fn boxq(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let anonymous = v.as_sym().map_or(false, |id| m.symbols.get(id).name.is_none());
    Ok(if anonymous { v } else { Value::NIL })
}

fn all_pairs(m: &mut Machine, ex: Value, test: impl Fn(&Machine, Value, Value) -> bool) -> Result<bool> {
    let args = m.eval_args(ex)?;
    let m: &Machine = m;
    Ok(args.windows(2).all(|w| test(m, w[0], w[1])))
}

/// (== 'any ..) -> flg
fn eq(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |_, a, b| a == b).map(Value::from_bool)
}

/// (n== 'any ..) -> flg
fn neq(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |_, a, b| a == b).map(|b| Value::from_bool(!b))
}

/// (= 'any ..) -> flg
fn equal(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |m, a, b| m.equal(a, b)).map(Value::from_bool)
}

/// (<> 'any ..) -> flg
fn nequal(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |m, a, b| m.equal(a, b)).map(|b| Value::from_bool(!b))
}

/// (< 'any ..) -> flg
fn lt(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |m, a, b| m.compare(a, b) == Ordering::Less).map(Value::from_bool)
}

/// (> 'any ..) -> flg
fn gt(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |m, a, b| m.compare(a, b) == Ordering::Greater).map(Value::from_bool)
}

/// (<= 'any ..) -> flg
fn le(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |m, a, b| m.compare(a, b) != Ordering::Greater).map(Value::from_bool)
}

/// (>= 'any ..) -> flg
fn ge(m: &mut Machine, ex: Value) -> Result<Value> {
    all_pairs(m, ex, |m, a, b| m.compare(a, b) != Ordering::Less).map(Value::from_bool)
}

/// (=0 'any) -> 0 | NIL
fn eq0(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    Ok(if v == Value::ZERO { v } else { Value::NIL })
}

/// (n0 'any) -> flg
fn n0(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(Value::from_bool(arg1(m, ex)? != Value::ZERO))
}

/// (=T 'any) -> flg
fn eqt(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(Value::from_bool(arg1(m, ex)?.is_t()))
}

fn num_test(m: &mut Machine, ex: Value, test: fn(i64) -> bool) -> Result<Value> {
    let v = arg1(m, ex)?;
    Ok(match v.as_num() {
        Some(n) if test(n) => v,
        _ => Value::NIL,
    })
}

/// (lt0 'any) -> num | NIL
fn lt0(m: &mut Machine, ex: Value) -> Result<Value> {
    num_test(m, ex, |n| n < 0)
}

/// (gt0 'any) -> num | NIL
fn gt0(m: &mut Machine, ex: Value) -> Result<Value> {
    num_test(m, ex, |n| n > 0)
}

/// (ge0 'any) -> num | NIL
fn ge0(m: &mut Machine, ex: Value) -> Result<Value> {
    num_test(m, ex, |n| n >= 0)
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use rstest::rstest;

    use crate::config::Config;
    use crate::eval::Machine;
    use crate::value::Value;

    fn machine() -> Machine {
        Machine::new(Config::default()).unwrap()
    }

    #[test]
    fn strings_equal_by_name_symbols_by_identity() {
        let mut m = machine();
        let a = m.mk_str("a long transient name");
        let b = m.mk_str("a long transient name");
        assert_ne!(a, b);
        assert!(m.equal(a, b));
        let s = m.intern("abc");
        let t = m.mk_str("abc");
        assert!(m.equal(s, t));
        let x = m.intern("x");
        let y = m.intern("y");
        assert!(!m.equal(x, y));
    }

    #[test]
    fn equality_terminates_on_circular_lists() {
        let mut m = machine();
        assert_eq!(m.eval_str("(= (circ 1 2) (circ 1 2))").unwrap(), Value::T);
        assert_eq!(m.eval_str("(= (circ 1 2) (circ 1 3))").unwrap(), Value::NIL);
    }

    #[test]
    fn order_puts_nil_first_and_t_last() {
        let mut m = machine();
        let sym = m.intern("a");
        let list = m.list(&[Value::ONE]).unwrap();
        let ordered = [Value::NIL, Value::boxed(-5), Value::boxed(3), sym, list, Value::T];
        for w in ordered.windows(2) {
            assert_eq!(m.compare(w[0], w[1]), Ordering::Less);
        }
        assert_eq!(m.eval_str("(< 1 2 3)").unwrap(), Value::T);
        assert_eq!(m.eval_str("(> 1 2)").unwrap(), Value::NIL);
        assert_eq!(m.eval_str("(< 'abc 'abd)").unwrap(), Value::T);
    }

    #[test]
    fn deep_car_nesting_compares_without_recursion() {
        let mut m = machine();
        m.eval_str("(setq A NIL B NIL) (do 300000 (setq A (list A) B (list B)))")
            .unwrap();
        assert_eq!(m.eval_str("(= A B)").unwrap(), Value::T);
        assert_eq!(m.eval_str("(< A B)").unwrap(), Value::NIL);
        m.eval_str("(setq B (list B))").unwrap();
        assert_eq!(m.eval_str("(= A B)").unwrap(), Value::NIL);
        assert_eq!(m.eval_str("(< A B)").unwrap(), Value::T);
    }

    #[rstest]
    #[case("(< '(1 2) '(1 3))", "T")]
    #[case("(< '(1 2) '(1 2 3))", "T")]
    #[case("(> '((1) 5) '((2) 0))", "NIL")]
    #[case("(< '(a . 1) '(a . 2))", "T")]
    #[case("(= '(1 (2 3) . 4) '(1 (2 3) . 4))", "T")]
    #[case("(= '(1 (2 3)) '(1 (2 4)))", "NIL")]
    fn lists_compare_element_by_element(#[case] src: &str, #[case] expected: &str) {
        let mut m = machine();
        let v = m.eval_str(src).unwrap();
        assert_eq!(m.print_string(v), expected);
    }

    #[test]
    fn type_predicates() {
        let mut m = machine();
        assert_eq!(m.eval_str("(atom 'a)").unwrap(), Value::T);
        assert_eq!(m.eval_str("(pair 1)").unwrap(), Value::NIL);
        assert_eq!(m.eval_str("(str? \"x\")").unwrap(), Value::T);
        assert_eq!(m.eval_str("(str? 'x)").unwrap(), Value::NIL);
        assert_eq!(m.eval_str("(sym? \"x\")").unwrap(), Value::T);
        assert_eq!(m.eval_str("(num? 'x)").unwrap(), Value::NIL);
        assert_ne!(m.eval_str("(box? (box))").unwrap(), Value::NIL);
        assert_eq!(m.eval_str("(=0 0)").unwrap(), Value::ZERO);
        assert_eq!(m.eval_str("(lt0 -1)").unwrap(), Value::boxed(-1));
    }
}
