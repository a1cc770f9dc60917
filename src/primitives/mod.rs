//! Native functions and the table that installs them.
//!
//! A native receives the whole application cell `ex`; its arguments are
//! `cdr(ex)`, unevaluated. It evaluates what it needs, checks types with
//! the `need_*` helpers on `Machine`, and signals errors through `Result`.

mod flow;
mod io;
mod list;
mod num;
mod pred;
mod sym;

use crate::error::Result;
use crate::eval::Machine;
use crate::value::Value;

/// Signature of every native function.
pub type NativeFn = fn(&mut Machine, Value) -> Result<Value>;

/// How a primitive treats its argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Evaluates each argument once and keeps no reference to the
    /// application structure.
    Eager,
    /// Decides itself what to evaluate (control forms, binding forms).
    Special,
}

/// One registered native.
#[derive(Clone)]
pub struct Primitive {
    pub name: String,
    pub func: NativeFn,
    pub evaluation: Evaluation,
}

/// Ordered list of natives to install into a machine. Later entries with
/// the same name win, since each one is installed with `init_sym`.
#[derive(Clone, Default)]
pub struct PrimitiveTable {
    entries: Vec<Primitive>,
}

impl PrimitiveTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The core primitives.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        flow::register(&mut table);
        list::register(&mut table);
        pred::register(&mut table);
        num::register(&mut table);
        sym::register(&mut table);
        io::register(&mut table);
        table
    }

    /// Add a native that evaluates its arguments.
    pub fn register(&mut self, name: &str, func: NativeFn) -> &mut Self {
        self.push(name, func, Evaluation::Eager)
    }

    /// Add a native that controls evaluation of its own arguments.
    pub fn register_special(&mut self, name: &str, func: NativeFn) -> &mut Self {
        self.push(name, func, Evaluation::Special)
    }

    fn push(&mut self, name: &str, func: NativeFn, evaluation: Evaluation) -> &mut Self {
        self.entries.push(Primitive {
            name: name.to_string(),
            func,
            evaluation,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|p| p.name.as_str())
    }

    pub(crate) fn into_entries(self) -> Vec<Primitive> {
        self.entries
    }
}

impl Machine {
    /// Name under which a primitive was installed.
    pub fn primitive_name(&self, v: Value) -> Option<&str> {
        let id = v.as_prim()?;
        self.prims.get(id.0 as usize).map(|p| p.name.as_str())
    }

    /// Evaluate every argument of `ex`.
    pub(crate) fn eval_args(&mut self, ex: Value) -> Result<Vec<Value>> {
        let mut args = Vec::new();
        let mut x = self.cdr(ex);
        while x.is_cell() {
            args.push(self.eval_car(x)?);
            x = self.cdr(x);
        }
        Ok(args)
    }

    /// Evaluate every argument of `ex` as a number. NIL anywhere makes the
    /// whole result `None`, as arithmetic on NIL yields NIL.
    pub(crate) fn num_args(&mut self, ex: Value) -> Result<Option<Vec<i64>>> {
        let mut nums = Vec::new();
        let mut nil = false;
        for v in self.eval_args(ex)? {
            if v.is_nil() {
                nil = true;
            } else {
                nums.push(self.need_num(ex, v)?);
            }
        }
        Ok((!nil).then_some(nums))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{ErrorKind, LispError};

    fn add2(m: &mut Machine, ex: Value) -> Result<Value> {
        let x = m.cdr(ex);
        let a = m.arg_num(ex, x)?;
        let b = m.arg_num(ex, m.cdr(x))?;
        m.boxed(ex, a + b)
    }

    #[test]
    fn registered_native_is_callable_by_name() {
        let mut table = PrimitiveTable::builtin();
        table.register("add2", add2);
        let mut m = Machine::with_primitives(Config::default(), table).unwrap();
        assert_eq!(m.eval_str("(add2 3 4)").unwrap(), Value::boxed(7));
        let err = m.eval_str("(add2 3 \"x\")").unwrap_err();
        assert!(matches!(
            err,
            LispError::Error {
                kind: ErrorKind::NumExpected,
                ..
            }
        ));
    }

    #[test]
    fn later_registration_wins() {
        fn one(_: &mut Machine, _: Value) -> Result<Value> {
            Ok(Value::ONE)
        }
        fn zero(_: &mut Machine, _: Value) -> Result<Value> {
            Ok(Value::ZERO)
        }
        let mut table = PrimitiveTable::new();
        table.register("f", one).register("f", zero);
        let mut m = Machine::with_primitives(Config::default(), table).unwrap();
        assert_eq!(m.eval_str("(f)").unwrap(), Value::ZERO);
    }

    #[test]
    fn builtin_table_has_no_protected_names() {
        let table = PrimitiveTable::builtin();
        assert!(table.names().all(|n| n != "NIL" && n != "T"));
        assert!(table.names().any(|n| n == "quote"));
    }
}
