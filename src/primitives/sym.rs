use std::collections::HashSet;

use super::PrimitiveTable;
use crate::error::{ErrorKind, LispError, Result};
use crate::eval::Machine;
use crate::symbol::sym;
use crate::value::{CellId, Kind, Value};

pub(super) fn register(table: &mut PrimitiveTable) {
    table
        .register("intern", intern)
        .register("name", name)
        .register("val", val)
        .register_special("zero", zero)
        .register_special("one", one)
        .register_special("on", on)
        .register_special("off", off)
        .register("box", box_)
        .register("get", get)
        .register("put", put)
        .register("getl", getl)
        .register("pack", pack)
        .register("chop", chop)
        .register("char", char_)
        .register("glue", glue)
        .register("lowc", lowc)
        .register("uppc", uppc)
        .register("sym", sym_)
        .register("all", all);
}

impl Machine {
    /// Property `key` of a symbol; element `key` of a list when `key` is a
    /// number, otherwise the value of the association for `key`.
    pub fn get(&self, v: Value, key: Value) -> Value {
        match v.kind() {
            Kind::Symbol(id) => self
                .list_items(self.symbols.get(id).props)
                .into_iter()
                .find(|&p| self.car(p) == key)
                .map_or(Value::NIL, |p| self.cdr(p)),
            Kind::Cell(_) => match key.as_num() {
                Some(n) if n > 0 => self.list_items(v).get(n as usize - 1).copied().unwrap_or(Value::NIL),
                Some(_) => Value::NIL,
                None => self
                    .list_items(v)
                    .into_iter()
                    .find(|&e| e.is_cell() && self.car(e) == key)
                    .map_or(Value::NIL, |e| self.cdr(e)),
            },
            _ => Value::NIL,
        }
    }

    /// Set property `key` of symbol `s`. NIL removes the property.
    pub fn put(&mut self, s: Value, key: Value, val: Value) -> Result<Value> {
        let id = s
            .as_sym()
            .ok_or_else(|| LispError::new(ErrorKind::SymExpected, None, Some(s)))?;
        if id == sym::NIL {
            return Err(LispError::new(ErrorKind::Protected, None, Some(s)));
        }
        let props = self.symbols.get(id).props;
        let existing = self
            .list_items(props)
            .into_iter()
            .find(|&p| self.car(p) == key);
        match (existing.and_then(Value::as_cell), val.is_nil()) {
            (Some(cell), false) => self.heap.set_cdr(cell, val),
            (Some(cell), true) => {
                let mut kept = Vec::new();
                for p in self.list_items(props) {
                    if p.as_cell() != Some(cell) {
                        kept.push(p);
                    }
                }
                self.symbols.get_mut(id).props = self.list(&kept)?;
            }
            (None, false) => {
                let entry = self.cons(key, val)?;
                let props = self.cons(entry, props)?;
                self.symbols.get_mut(id).props = props;
            }
            (None, true) => {}
        }
        Ok(val)
    }

    /// The printed characters of atoms, flattened out of lists. A list
    /// met again inside itself contributes nothing the second time.
    fn pack_into(&self, v: Value, out: &mut String) {
        enum Step {
            Enter(Value),
            Leave(CellId),
        }
        let mut active = HashSet::new();
        let mut work = vec![Step::Enter(v)];
        while let Some(step) = work.pop() {
            match step {
                Step::Leave(id) => {
                    active.remove(&id);
                }
                Step::Enter(v) => match v.as_cell() {
                    Some(id) => {
                        if !active.insert(id) {
                            continue;
                        }
                        work.push(Step::Leave(id));
                        work.extend(self.list_items(v).into_iter().rev().map(Step::Enter));
                    }
                    None if v.is_nil() => {}
                    None => out.push_str(&self.prin_string(v)),
                },
            }
        }
    }
}

fn arg1(m: &mut Machine, ex: Value) -> Result<Value> {
    m.eval_car(m.cdr(ex))
}

/// (intern 'any) -> sym
fn intern(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let mut name = String::new();
    m.pack_into(v, &mut name);
    if name.is_empty() {
        return Ok(Value::NIL);
    }
    Ok(m.intern(&name))
}

/// (name 'sym) -> str
fn name(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    if !(v.is_sym() || v.is_text()) {
        return Err(LispError::new(ErrorKind::SymExpected, Some(ex), Some(v)));
    }
    let name = m.name_of(v).unwrap_or_default();
    Ok(m.mk_str(&name))
}

/// (val 'var) -> any
fn val(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let id = m.need_sym(ex, v)?;
    Ok(m.symbols.value(id))
}

fn set_each(m: &mut Machine, ex: Value, val: Value) -> Result<Value> {
    for var in m.list_items(m.cdr(ex)) {
        m.set_var(ex, var, val)?;
    }
    Ok(val)
}

/// (zero var ..) -> 0
fn zero(m: &mut Machine, ex: Value) -> Result<Value> {
    set_each(m, ex, Value::ZERO)
}

/// (one var ..) -> 1
fn one(m: &mut Machine, ex: Value) -> Result<Value> {
    set_each(m, ex, Value::ONE)
}

/// (on var ..) -> T
fn on(m: &mut Machine, ex: Value) -> Result<Value> {
    set_each(m, ex, Value::T)
}

/// (off var ..) -> NIL
fn off(m: &mut Machine, ex: Value) -> Result<Value> {
    set_each(m, ex, Value::NIL)
}

/// (box 'any) -> sym
fn box_(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let id = m.symbols.anonymous();
    m.symbols.set_value(id, v);
    Ok(Value::symbol(id))
}

/// (get 'sym1|lst ['sym2|cnt ..]) -> any
fn get(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let Some((&first, keys)) = args.split_first() else {
        return Ok(Value::NIL);
    };
    Ok(keys.iter().fold(first, |v, &key| m.get(v, key)))
}

/// (put 'sym1|lst ['sym2|cnt ..] 'any 'any) -> any
fn put(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let [first, path @ .., key, val] = &args[..] else {
        return Err(LispError::new(ErrorKind::Arg, Some(ex), None));
    };
    let target = path.iter().fold(*first, |v, &k| m.get(v, k));
    if !target.is_sym() {
        return Err(LispError::new(ErrorKind::SymExpected, Some(ex), Some(target)));
    }
    m.put(target, *key, *val)
}

/// (getl 'sym) -> lst
fn getl(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let id = m.need_sym(ex, v)?;
    let mut out = Vec::new();
    for p in m.list_items(m.symbols.get(id).props) {
        let (key, val) = (m.car(p), m.cdr(p));
        out.push(m.cons(val, key)?);
    }
    m.list(&out)
}

/// (pack 'any ..) -> str
fn pack(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let mut s = String::new();
    for v in args {
        m.pack_into(v, &mut s);
    }
    Ok(m.mk_str(&s))
}

/// (chop 'any) -> lst
fn chop(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    if v.is_cell() {
        return Ok(v);
    }
    let mut s = String::new();
    m.pack_into(v, &mut s);
    let chars: Vec<Value> = s
        .chars()
        .map(|c| m.mk_str(c.encode_utf8(&mut [0; 4])))
        .collect();
    m.list(&chars)
}

/// (char 'cnt) -> sym
/// (char 'sym) -> cnt
fn char_(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    if v.is_nil() {
        return Ok(Value::ZERO);
    }
    if let Some(n) = v.as_num() {
        let c = u32::try_from(n)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| LispError::new(ErrorKind::Arg, Some(ex), Some(v)))?;
        return Ok(m.mk_str(c.encode_utf8(&mut [0; 4])));
    }
    let name = m.name_of(v).unwrap_or_default();
    Ok(Value::boxed(name.chars().next().map_or(0, |c| c as i64)))
}

/// (glue 'any 'lst) -> str
fn glue(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let sep = m.eval_car(x)?;
    let l = m.eval_car(m.cdr(x))?;
    if !l.is_cell() {
        return Ok(l);
    }
    let mut sep_text = String::new();
    m.pack_into(sep, &mut sep_text);
    let parts: Vec<String> = m
        .list_items(l)
        .into_iter()
        .map(|v| {
            let mut s = String::new();
            m.pack_into(v, &mut s);
            s
        })
        .collect();
    Ok(m.mk_str(&parts.join(&sep_text)))
}

fn map_case(m: &mut Machine, ex: Value, f: fn(&str) -> String) -> Result<Value> {
    let v = arg1(m, ex)?;
    if !m.is_str(v) {
        return Ok(v);
    }
    let name = m.name_of(v).unwrap_or_default();
    Ok(m.mk_str(&f(&name)))
}

/// (lowc 'any) -> any
fn lowc(m: &mut Machine, ex: Value) -> Result<Value> {
    map_case(m, ex, str::to_lowercase)
}

/// (uppc 'any) -> any
fn uppc(m: &mut Machine, ex: Value) -> Result<Value> {
    map_case(m, ex, str::to_uppercase)
}

/// (sym 'any) -> str
fn sym_(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let s = m.print_string(v);
    Ok(m.mk_str(&s))
}

/// (all) -> lst
fn all(m: &mut Machine, _ex: Value) -> Result<Value> {
    let syms: Vec<Value> = m.symbols.interned().map(Value::symbol).collect();
    m.list(&syms)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::eval::Machine;
    use crate::value::Value;

    #[rstest]
    #[case("(pack 'a \"bc\" 12 '(d e))", "\"abc12de\"")]
    #[case("(pack)", "NIL")]
    #[case("(chop 'abc)", "(\"a\" \"b\" \"c\")")]
    #[case("(chop 123)", "(\"1\" \"2\" \"3\")")]
    #[case("(char 65)", "\"A\"")]
    #[case("(char \"A\")", "65")]
    #[case("(glue \",\" '(a b c))", "\"a,b,c\"")]
    #[case("(uppc \"abc\")", "\"ABC\"")]
    #[case("(lowc 'ABC)", "ABC")]
    #[case("(sym '(a \"b\"))", "\"(a \\\"b\\\")\"")]
    #[case("(name 'abc)", "\"abc\"")]
    #[case("(== 'abc (intern \"abc\"))", "T")]
    fn string_primitives(#[case] src: &str, #[case] expected: &str) {
        let mut m = Machine::new(Config::default()).unwrap();
        let v = m.eval_str(src).unwrap();
        assert_eq!(m.print_string(v), expected);
    }

    #[rstest]
    #[case("(let L (list 1 2) (set L L) (pack L))", "\"2\"")]
    #[case("(let L (list 1) (set L L) (pack 'a L 'b))", "\"ab\"")]
    #[case("(let L (list 'a 'b) (set L L) (intern L))", "b")]
    #[case("(let L (list \"x\" 'y) (set (cdr L) L) (glue \"-\" L))", "\"x-x\"")]
    fn self_containing_lists_pack_finitely(#[case] src: &str, #[case] expected: &str) {
        let mut m = Machine::new(Config::default()).unwrap();
        let v = m.eval_str(src).unwrap();
        assert_eq!(m.print_string(v), expected);
    }

    #[test]
    fn deeply_nested_lists_pack() {
        let mut m = Machine::new(Config::default()).unwrap();
        let v = m
            .eval_str("(let A 'z (do 300000 (setq A (list A))) (pack 'a A))")
            .unwrap();
        assert_eq!(m.print_string(v), "\"az\"");
    }

    #[test]
    fn properties_are_set_read_and_removed() {
        let mut m = Machine::new(Config::default()).unwrap();
        m.eval_str("(put 'X 'color 'red) (put 'X 'size 3)").unwrap();
        assert_eq!(m.eval_str("(get 'X 'size)").unwrap(), Value::boxed(3));
        let color = m.eval_str("(get 'X 'color)").unwrap();
        assert_eq!(m.print_string(color), "red");
        m.eval_str("(put 'X 'color NIL)").unwrap();
        assert!(m.eval_str("(get 'X 'color)").unwrap().is_nil());
        let l = m.eval_str("(getl 'X)").unwrap();
        assert_eq!(m.print_string(l), "((3 . size))");
    }

    #[test]
    fn nested_get_and_put_follow_the_path() {
        let mut m = Machine::new(Config::default()).unwrap();
        m.eval_str("(put 'A 'inner 'B) (put 'A 'inner 'k 42)").unwrap();
        assert_eq!(m.eval_str("(get 'B 'k)").unwrap(), Value::boxed(42));
        assert_eq!(m.eval_str("(get 'A 'inner 'k)").unwrap(), Value::boxed(42));
        assert_eq!(m.eval_str("(get '(a b c) 2)").unwrap(), m.intern("b"));
    }

    #[test]
    fn flag_setters_refuse_protected_symbols() {
        let mut m = Machine::new(Config::default()).unwrap();
        assert_eq!(m.eval_str("(on A B)").unwrap(), Value::T);
        assert_eq!(m.eval_str("B").unwrap(), Value::T);
        assert_eq!(m.eval_str("(zero A)").unwrap(), Value::ZERO);
        assert_eq!(m.eval_str("(off T)").unwrap_err().kind(), Some(ErrorKind::Protected));
    }

    #[test]
    fn box_makes_fresh_anonymous_symbols() {
        let mut m = Machine::new(Config::default()).unwrap();
        let a = m.eval_str("(box 1)").unwrap();
        let b = m.eval_str("(box 1)").unwrap();
        assert_ne!(a, b);
        assert_eq!(m.val(a), Value::ONE);
    }
}
