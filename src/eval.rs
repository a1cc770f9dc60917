use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::bind::BindStack;
use crate::catch::CatchFrame;
use crate::config::Config;
use crate::error::{ErrorKind, LispError, Result};
use crate::heap::{Heap, HeapStats};
use crate::io::{InFrame, OutFrame};
use crate::primitives::{Evaluation, Primitive, PrimitiveTable};
use crate::symbol::{sym, SymbolTable};
use crate::value::{CellId, Kind, PrimId, SymbolId, Value};

/// Symbol-to-symbol hops allowed when resolving a function position.
const MAX_INDIRECTION: usize = 64;

/// Evaluated arguments of an `@` lambda, consumed by `next`, `arg` and `rest`.
pub(crate) struct VarFrame {
    pub args: Vec<Value>,
    /// Index of the next argument; the current one is `pos - 1`.
    pub pos: usize,
}

/// A list under construction by `make`.
pub(crate) struct MakeFrame {
    pub head: Value,
    pub tail: Option<CellId>,
}

/// The interpreter. All state lives here: heap, symbols, the binding,
/// catch and I/O stacks, and the installed primitives.
pub struct Machine {
    pub heap: Heap,
    pub symbols: SymbolTable,
    pub(crate) prims: Vec<Primitive>,
    pub(crate) binds: BindStack,
    pub(crate) catches: Vec<CatchFrame>,
    pub(crate) stdin: InFrame,
    pub(crate) ins: Vec<InFrame>,
    pub(crate) stdout: OutFrame,
    pub(crate) outs: Vec<OutFrame>,
    pub(crate) varargs: Vec<VarFrame>,
    pub(crate) makes: Vec<MakeFrame>,
    pub(crate) rng: StdRng,
    /// What `apply` wraps arguments with; the `quote` primitive once installed.
    quote: Value,
    depth: usize,
    pub(crate) config: Config,
}

impl Machine {
    /// A machine with the builtin primitives.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_primitives(config, PrimitiveTable::builtin())
    }

    /// A machine with `table` installed, one `init_sym` per entry, in order.
    pub fn with_primitives(config: Config, table: PrimitiveTable) -> Result<Self> {
        let heap = Heap::new(config.segment_cells, config.max_segments)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut m = Machine {
            heap,
            symbols: SymbolTable::new(),
            prims: Vec::new(),
            binds: BindStack::new(),
            catches: Vec::new(),
            stdin: InFrame::stdin(),
            ins: Vec::new(),
            stdout: OutFrame::Stdout,
            outs: Vec::new(),
            varargs: Vec::new(),
            makes: Vec::new(),
            rng,
            quote: Value::symbol(sym::QUOTE),
            depth: 0,
            config,
        };
        for prim in table.into_entries() {
            m.install(prim)?;
        }
        info!(
            "machine ready: {} symbols, {} primitives, {} cells",
            m.symbols.count(),
            m.prims.len(),
            m.heap.stats().total
        );
        Ok(m)
    }

    fn install(&mut self, prim: Primitive) -> Result<PrimId> {
        let id = PrimId(self.prims.len() as u32);
        let val = Value::primitive(id);
        self.init_sym(&prim.name, val)?;
        if &*prim.name == "quote" {
            self.quote = val;
        }
        self.prims.push(prim);
        Ok(id)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    // === symbols ===

    /// The interned symbol named `name`.
    pub fn intern(&mut self, name: &str) -> Value {
        Value::symbol(self.symbols.intern(name))
    }

    /// Intern `name` and set its value in one step. Used for primitives
    /// and for constants installed by extension modules.
    pub fn init_sym(&mut self, name: &str, val: Value) -> Result<Value> {
        let id = self.symbols.intern(name);
        if sym::is_protected(id) {
            return Err(LispError::new(
                ErrorKind::Protected,
                None,
                Some(Value::symbol(id)),
            ));
        }
        self.symbols.set_value(id, val);
        Ok(Value::symbol(id))
    }

    /// A string value; see `SymbolTable::string`.
    pub fn mk_str(&mut self, s: &str) -> Value {
        self.symbols.string(s)
    }

    /// The name of a symbol or string. NIL, anonymous symbols and
    /// non-symbols have none.
    pub fn name_of(&self, v: Value) -> Option<String> {
        match v.kind() {
            Kind::Text(t) => Some(t.as_str().to_string()),
            Kind::Symbol(id) if id != sym::NIL => self.symbols.name(id).map(str::to_string),
            _ => None,
        }
    }

    /// Value of a symbol; NIL for other kinds.
    pub fn val(&self, v: Value) -> Value {
        v.as_sym().map_or(Value::NIL, |id| self.symbols.value(id))
    }

    /// Assign a variable, refusing NIL and T.
    pub fn set_var(&mut self, ex: Value, var: Value, val: Value) -> Result<Value> {
        let id = self.need_var(ex, var)?;
        self.symbols.set_value(id, val);
        Ok(val)
    }

    /// Bind `id` to `val` until the binding stack is unwound below this point.
    pub(crate) fn bind_var(&mut self, id: SymbolId, val: Value) {
        let _ = self.binds.bind(&mut self.symbols, id, val);
    }

    pub(crate) fn unbind_to(&mut self, depth: usize) {
        self.binds.unbind_to(&mut self.symbols, depth);
    }

    /// Conditionals record a non-NIL test result in `@`.
    pub(crate) fn set_at(&mut self, v: Value) {
        if !v.is_nil() {
            self.symbols.set_value(sym::AT, v);
        }
    }

    // === cells ===

    pub fn cons(&mut self, car: Value, cdr: Value) -> Result<Value> {
        self.heap.cons(car, cdr)
    }

    pub fn list(&mut self, values: &[Value]) -> Result<Value> {
        self.heap.list(values)
    }

    /// Head of a cell; NIL for atoms.
    #[inline]
    pub fn car(&self, v: Value) -> Value {
        v.as_cell().map_or(Value::NIL, |id| self.heap.car(id))
    }

    /// Tail of a cell; NIL for atoms.
    #[inline]
    pub fn cdr(&self, v: Value) -> Value {
        v.as_cell().map_or(Value::NIL, |id| self.heap.cdr(id))
    }

    /// The elements of a list, stopping at the end of the spine or
    /// after one lap of a circular list.
    pub fn list_items(&self, list: Value) -> Vec<Value> {
        let mut items = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut x = list;
        while let Some(id) = x.as_cell() {
            if !seen.insert(id) {
                break;
            }
            items.push(self.heap.car(id));
            x = self.heap.cdr(id);
        }
        items
    }

    // === argument checks ===

    pub fn need_num(&self, ex: Value, v: Value) -> Result<i64> {
        v.as_num()
            .ok_or_else(|| LispError::new(ErrorKind::NumExpected, Some(ex), Some(v)))
    }

    pub fn need_sym(&self, ex: Value, v: Value) -> Result<SymbolId> {
        v.as_sym()
            .ok_or_else(|| LispError::new(ErrorKind::SymExpected, Some(ex), Some(v)))
    }

    /// A symbol whose value may be changed.
    pub fn need_var(&self, ex: Value, v: Value) -> Result<SymbolId> {
        let id = v
            .as_sym()
            .ok_or_else(|| LispError::new(ErrorKind::VarExpected, Some(ex), Some(v)))?;
        if sym::is_protected(id) {
            return Err(LispError::new(ErrorKind::Protected, Some(ex), Some(v)));
        }
        Ok(id)
    }

    pub fn need_pair(&self, ex: Value, v: Value) -> Result<CellId> {
        v.as_cell()
            .ok_or_else(|| LispError::new(ErrorKind::PairExpected, Some(ex), Some(v)))
    }

    /// A cell or NIL.
    pub fn need_lst(&self, ex: Value, v: Value) -> Result<Value> {
        if v.is_list() {
            Ok(v)
        } else {
            Err(LispError::new(ErrorKind::ListExpected, Some(ex), Some(v)))
        }
    }

    /// Box `n`, or signal an overflow if it does not fit.
    pub fn boxed(&self, ex: Value, n: i64) -> Result<Value> {
        Value::try_boxed(n).ok_or_else(|| LispError::new(ErrorKind::Overflow, Some(ex), None))
    }

    /// Evaluate the first element of `x`.
    pub fn eval_car(&mut self, x: Value) -> Result<Value> {
        self.eval(self.car(x))
    }

    /// Evaluate the first element of `x` as a number.
    pub fn arg_num(&mut self, ex: Value, x: Value) -> Result<i64> {
        let v = self.eval_car(x)?;
        self.need_num(ex, v)
    }

    /// Evaluate the first element of `x` as a symbol.
    pub fn arg_sym(&mut self, ex: Value, x: Value) -> Result<SymbolId> {
        let v = self.eval_car(x)?;
        self.need_sym(ex, v)
    }

    // === evaluation ===

    pub fn eval(&mut self, x: Value) -> Result<Value> {
        match x.kind() {
            Kind::Number(_) | Kind::Text(_) | Kind::Primitive(_) => Ok(x),
            Kind::Symbol(id) => Ok(self.symbols.value(id)),
            Kind::Cell(_) => {
                if self.depth >= self.config.max_depth {
                    return Err(LispError::new(ErrorKind::StackOverflow, Some(x), None));
                }
                self.depth += 1;
                let result = self.eval_cell(x);
                self.depth -= 1;
                result
            }
        }
    }

    /// Evaluate each expression of `prg` in order; the result is the last one.
    pub fn run(&mut self, prg: Value) -> Result<Value> {
        let mut result = Value::NIL;
        let mut x = prg;
        while let Some(id) = x.as_cell() {
            result = self.eval(self.heap.car(id))?;
            x = self.heap.cdr(id);
        }
        Ok(result)
    }

    fn eval_cell(&mut self, ex: Value) -> Result<Value> {
        let head = self.car(ex);
        let f = match head.kind() {
            Kind::Number(_) => return Ok(ex),
            Kind::Primitive(_) => head,
            Kind::Symbol(_) => self.resolve_fn(ex, head)?,
            Kind::Cell(_) => {
                let v = self.eval(head)?;
                self.resolve_fn(ex, v)?
            }
            Kind::Text(_) => {
                return Err(LispError::new(ErrorKind::Undefined, Some(ex), Some(head)))
            }
        };
        match f.kind() {
            Kind::Primitive(id) => {
                let func = self.primitive(ex, id)?.func;
                func(self, ex)
            }
            Kind::Cell(_) => self.eval_lambda(ex, f),
            _ => Err(LispError::new(ErrorKind::Undefined, Some(ex), Some(head))),
        }
    }

    fn primitive(&self, ex: Value, id: PrimId) -> Result<&Primitive> {
        self.prims.get(id.0 as usize).ok_or_else(|| {
            LispError::new(ErrorKind::Undefined, Some(ex), Some(Value::primitive(id)))
        })
    }

    /// Follow symbol values until something callable (or not) turns up.
    fn resolve_fn(&self, ex: Value, head: Value) -> Result<Value> {
        let mut f = head;
        for _ in 0..MAX_INDIRECTION {
            match f.as_sym() {
                Some(_) if f.is_nil() => break,
                Some(id) => f = self.symbols.value(id),
                None => return Ok(f),
            }
        }
        Err(LispError::new(ErrorKind::Undefined, Some(ex), Some(head)))
    }

    fn eval_lambda(&mut self, ex: Value, f: Value) -> Result<Value> {
        let binds = self.binds.depth();
        let args = self.varargs.len();
        let body = self.cdr(f);
        let result = self
            .bind_params(ex, self.car(f), self.cdr(ex))
            .and_then(|()| self.run(body));
        self.unbind_to(binds);
        self.varargs.truncate(args);
        result
    }

    /// Bind lambda parameters to the arguments of `ex`. Arguments are all
    /// evaluated before the first binding takes effect.
    fn bind_params(&mut self, ex: Value, params: Value, mut args: Value) -> Result<()> {
        let mut pending = Vec::new();
        let mut p = params;
        while let Some(cell) = p.as_cell() {
            let id = self.need_var(ex, self.heap.car(cell))?;
            let v = self.eval(self.car(args))?;
            pending.push((id, v));
            args = self.cdr(args);
            p = self.heap.cdr(cell);
        }
        let mut rest = None;
        if p == Value::symbol(sym::AT) {
            let mut vals = Vec::new();
            for a in self.list_items(args) {
                vals.push(self.eval(a)?);
            }
            rest = Some(vals);
        } else if !p.is_nil() {
            let id = self.need_var(ex, p)?;
            pending.push((id, args));
        }
        for (id, v) in pending {
            self.bind_var(id, v);
        }
        if let Some(args) = rest {
            self.varargs.push(VarFrame { args, pos: 0 });
        }
        Ok(())
    }

    /// Apply `f` to already evaluated arguments.
    pub fn apply(&mut self, f: Value, args: &[Value]) -> Result<Value> {
        let fun = self.resolve_fn(f, f)?;
        match fun.kind() {
            Kind::Primitive(id) => self.apply_primitive(fun, id, args),
            Kind::Cell(_) => self.apply_lambda(fun, args),
            _ => Err(LispError::new(ErrorKind::Undefined, None, Some(f))),
        }
    }

    /// Call a primitive through a temporary application `(f 'a1 'a2 ...)`.
    /// Eager primitives only evaluate their arguments, so the temporary
    /// cells are unreferenced afterwards and go back to the free list.
    /// Error paths keep them, since the error may point into them.
    fn apply_primitive(&mut self, f: Value, id: PrimId, args: &[Value]) -> Result<Value> {
        let prim = self.primitive(f, id)?;
        let (func, evaluation) = (prim.func, prim.evaluation);
        let mut temps = Vec::with_capacity(2 * args.len() + 1);
        let mut tail = Value::NIL;
        for &a in args.iter().rev() {
            let quoted = self.cons(self.quote, a)?;
            tail = self.cons(quoted, tail)?;
            temps.extend([quoted, tail]);
        }
        let ex = self.cons(f, tail)?;
        temps.push(ex);

        let result = func(self, ex);
        if result.is_ok() && evaluation == Evaluation::Eager {
            for cell in temps.into_iter().filter_map(Value::as_cell) {
                self.heap.release(cell);
            }
        }
        result
    }

    fn apply_lambda(&mut self, f: Value, args: &[Value]) -> Result<Value> {
        let binds = self.binds.depth();
        let nargs = self.varargs.len();
        let body = self.cdr(f);
        let result = self
            .bind_values(f, self.car(f), args)
            .and_then(|()| self.run(body));
        self.unbind_to(binds);
        self.varargs.truncate(nargs);
        result
    }

    fn bind_values(&mut self, ex: Value, params: Value, args: &[Value]) -> Result<()> {
        let mut pending = Vec::new();
        let mut p = params;
        let mut i = 0;
        while let Some(cell) = p.as_cell() {
            let id = self.need_var(ex, self.heap.car(cell))?;
            pending.push((id, args.get(i).copied().unwrap_or(Value::NIL)));
            i += 1;
            p = self.heap.cdr(cell);
        }
        let remaining = &args[i.min(args.len())..];
        let mut rest = None;
        if p == Value::symbol(sym::AT) {
            rest = Some(remaining.to_vec());
        } else if !p.is_nil() {
            let id = self.need_var(ex, p)?;
            let list = self.list(remaining)?;
            pending.push((id, list));
        }
        for (id, v) in pending {
            self.bind_var(id, v);
        }
        if let Some(args) = rest {
            self.varargs.push(VarFrame { args, pos: 0 });
        }
        Ok(())
    }

    // === sources and sinks ===

    /// The current output frame.
    pub fn out(&mut self) -> &mut OutFrame {
        match self.outs.last_mut() {
            Some(out) => out,
            None => &mut self.stdout,
        }
    }

    /// The current input frame.
    pub fn input(&mut self) -> &mut InFrame {
        match self.ins.last_mut() {
            Some(input) => input,
            None => &mut self.stdin,
        }
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.out().write_str(s)
    }

    pub fn push_output(&mut self, out: OutFrame) {
        self.outs.push(out);
    }

    /// Pop the innermost output frame; the standard output frame stays.
    pub fn pop_output(&mut self) -> Option<OutFrame> {
        self.outs.pop()
    }

    pub fn push_input(&mut self, input: InFrame) {
        self.ins.push(input);
    }

    pub fn pop_input(&mut self) -> Option<InFrame> {
        self.ins.pop()
    }

    /// Read and evaluate every expression in `src`; the result is the last value.
    pub fn eval_str(&mut self, src: &str) -> Result<Value> {
        self.eval_frame(InFrame::from_text(src))
    }

    /// Read and evaluate a source file.
    pub fn load(&mut self, path: &str) -> Result<Value> {
        let frame = InFrame::open(path)?;
        self.eval_frame(frame)
    }

    fn eval_frame(&mut self, frame: InFrame) -> Result<Value> {
        let level = self.ins.len();
        self.ins.push(frame);
        let result = self.eval_input();
        self.ins.truncate(level);
        result
    }

    /// Evaluate expressions from the current input until it runs dry.
    pub(crate) fn eval_input(&mut self) -> Result<Value> {
        let mut last = Value::NIL;
        while let Some(x) = self.read()? {
            last = self.eval(x)?;
        }
        Ok(last)
    }

    /// Render an error the classic way: the offending expression on one
    /// line, then the offending value and the message.
    pub fn describe(&self, err: &LispError) -> String {
        match err {
            LispError::Error { ex, x, msg, .. } => {
                let mut s = String::new();
                if let Some(ex) = ex {
                    s.push_str("!? ");
                    s.push_str(&self.print_string(*ex));
                    s.push('\n');
                }
                if let Some(x) = x {
                    s.push_str(&self.print_string(*x));
                    s.push_str(" -- ");
                }
                s.push_str(msg);
                s
            }
            LispError::Throw { tag, .. } => {
                format!("{} -- {}", self.print_string(*tag), err)
            }
            _ => err.to_string(),
        }
    }
}
