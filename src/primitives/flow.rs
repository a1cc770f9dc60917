use log::warn;

use super::PrimitiveTable;
use crate::error::{ErrorKind, LispError, Result};
use crate::eval::{MakeFrame, Machine};
use crate::symbol::sym;
use crate::value::Value;

pub(super) fn register(table: &mut PrimitiveTable) {
    table
        .register_special("quote", quote)
        .register_special("setq", setq)
        .register("set", set)
        .register_special("de", de)
        .register("def", def)
        .register_special("let", let_)
        .register_special("use", use_)
        .register_special("bind", bind)
        .register_special("if", if_)
        .register_special("ifn", ifn)
        .register_special("when", when)
        .register_special("unless", unless)
        .register_special("cond", cond)
        .register_special("nond", nond)
        .register_special("case", case)
        .register_special("and", and)
        .register_special("or", or)
        .register("not", not)
        .register_special("nand", nand)
        .register_special("nor", nor)
        .register("xor", xor)
        .register_special("while", while_)
        .register_special("until", until)
        .register_special("loop", loop_)
        .register_special("do", do_)
        .register_special("for", for_)
        .register_special("prog", prog)
        .register_special("prog1", prog1)
        .register_special("prog2", prog2)
        .register("run", run)
        .register("eval", eval)
        .register("apply", apply)
        .register_special("catch", catch)
        .register("throw", throw)
        .register_special("finally", finally)
        .register("quit", quit)
        .register("bye", bye)
        .register_special("nil", nil)
        .register_special("t", t)
        .register("args", args)
        .register("next", next)
        .register("arg", arg)
        .register("rest", rest)
        .register_special("make", make)
        .register("link", link)
        .register("yoke", yoke)
        .register("chain", chain);
}

/// (quote . any) -> any
fn quote(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(m.cdr(ex))
}

/// (setq var 'any ..) -> any
fn setq(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut x = m.cdr(ex);
    let mut val = Value::NIL;
    while x.is_cell() {
        let var = m.car(x);
        m.need_var(ex, var)?;
        x = m.cdr(x);
        val = m.eval_car(x)?;
        m.set_var(ex, var, val)?;
        x = m.cdr(x);
    }
    Ok(val)
}

/// (set 'var 'any ..) -> any
///
/// A cell in place of `var` has its car replaced.
fn set(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let mut val = Value::NIL;
    for pair in args.chunks(2) {
        val = pair.get(1).copied().unwrap_or(Value::NIL);
        match pair[0].as_cell() {
            Some(cell) => m.heap.set_car(cell, val),
            None => {
                m.set_var(ex, pair[0], val)?;
            }
        }
    }
    Ok(val)
}

/// (de sym . any) -> sym
fn de(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let s = m.car(x);
    let id = m.need_var(ex, s)?;
    let def = m.cdr(x);
    let old = m.symbols.value(id);
    if !old.is_nil() && !m.equal(old, def) {
        warn!("{} redefined", m.print_string(s));
    }
    m.symbols.set_value(id, def);
    Ok(s)
}

/// (def 'sym 'any) -> sym
/// (def 'sym 'key 'any) -> sym
fn def(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let s = args.first().copied().unwrap_or(Value::NIL);
    let id = m.need_var(ex, s)?;
    match args[1..] {
        [key, val] => {
            m.put(s, key, val)?;
        }
        [val] => m.symbols.set_value(id, val),
        _ => return Err(LispError::new(ErrorKind::Arg, Some(ex), None)),
    }
    Ok(s)
}

/// (let sym 'any . prg) -> any
/// (let (sym 'any ..) . prg) -> any
fn let_(m: &mut Machine, ex: Value) -> Result<Value> {
    let depth = m.binds.depth();
    let result = let_body(m, ex);
    m.unbind_to(depth);
    result
}

fn let_body(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let spec = m.car(x);
    if spec.is_cell() {
        let mut y = spec;
        while y.is_cell() {
            let id = m.need_var(ex, m.car(y))?;
            y = m.cdr(y);
            let val = m.eval_car(y)?;
            m.bind_var(id, val);
            y = m.cdr(y);
        }
        m.run(m.cdr(x))
    } else {
        let id = m.need_var(ex, spec)?;
        let y = m.cdr(x);
        let val = m.eval_car(y)?;
        m.bind_var(id, val);
        m.run(m.cdr(y))
    }
}

/// (use sym . prg) -> any
/// (use (sym ..) . prg) -> any
fn use_(m: &mut Machine, ex: Value) -> Result<Value> {
    let depth = m.binds.depth();
    let x = m.cdr(ex);
    let spec = m.car(x);
    let result = save_vars(m, ex, spec).and_then(|()| m.run(m.cdr(x)));
    m.unbind_to(depth);
    result
}

/// Bind each symbol in `spec` to its own value, so the body's changes are undone.
fn save_vars(m: &mut Machine, ex: Value, spec: Value) -> Result<()> {
    let vars = if spec.is_cell() {
        m.list_items(spec)
    } else {
        vec![spec]
    };
    for var in vars {
        let id = m.need_var(ex, var)?;
        m.bind_var(id, m.symbols.value(id));
    }
    Ok(())
}

/// (bind 'sym|lst . prg) -> any
fn bind(m: &mut Machine, ex: Value) -> Result<Value> {
    let depth = m.binds.depth();
    let x = m.cdr(ex);
    let result = bind_body(m, ex, x);
    m.unbind_to(depth);
    result
}

fn bind_body(m: &mut Machine, ex: Value, x: Value) -> Result<Value> {
    let spec = m.eval_car(x)?;
    if spec.is_cell() {
        for item in m.list_items(spec) {
            if item.is_cell() {
                let id = m.need_var(ex, m.car(item))?;
                m.bind_var(id, m.cdr(item));
            } else {
                let id = m.need_var(ex, item)?;
                m.bind_var(id, m.symbols.value(id));
            }
        }
    } else if !spec.is_nil() {
        let id = m.need_var(ex, spec)?;
        m.bind_var(id, m.symbols.value(id));
    }
    m.run(m.cdr(x))
}

/// (if 'any1 any2 . prg) -> any
fn if_(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let test = m.eval_car(x)?;
    let x = m.cdr(x);
    if test.is_nil() {
        m.run(m.cdr(x))
    } else {
        m.set_at(test);
        m.eval_car(x)
    }
}

/// (ifn 'any1 any2 . prg) -> any
fn ifn(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let test = m.eval_car(x)?;
    let x = m.cdr(x);
    if test.is_nil() {
        m.eval_car(x)
    } else {
        m.set_at(test);
        m.run(m.cdr(x))
    }
}

/// (when 'any . prg) -> any
fn when(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let test = m.eval_car(x)?;
    if test.is_nil() {
        return Ok(Value::NIL);
    }
    m.set_at(test);
    m.run(m.cdr(x))
}

/// (unless 'any . prg) -> any
fn unless(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let test = m.eval_car(x)?;
    if !test.is_nil() {
        m.set_at(test);
        return Ok(Value::NIL);
    }
    m.run(m.cdr(x))
}

/// (cond ('any1 . prg1) ('any2 . prg2) ..) -> any
fn cond(m: &mut Machine, ex: Value) -> Result<Value> {
    for clause in m.list_items(m.cdr(ex)) {
        let test = m.eval_car(clause)?;
        if !test.is_nil() {
            m.set_at(test);
            return m.run(m.cdr(clause));
        }
    }
    Ok(Value::NIL)
}

/// (nond ('any1 . prg1) ('any2 . prg2) ..) -> any
fn nond(m: &mut Machine, ex: Value) -> Result<Value> {
    for clause in m.list_items(m.cdr(ex)) {
        let test = m.eval_car(clause)?;
        if test.is_nil() {
            return m.run(m.cdr(clause));
        }
        m.set_at(test);
    }
    Ok(Value::NIL)
}

/// (case 'any (any1 . prg1) (any2 . prg2) ..) -> any
fn case(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let key = m.eval_car(x)?;
    m.set_at(key);
    for clause in m.list_items(m.cdr(x)) {
        let pat = m.car(clause);
        let hit = pat.is_t()
            || m.equal(pat, key)
            || (pat.is_cell() && m.list_items(pat).into_iter().any(|p| m.equal(p, key)));
        if hit {
            return m.run(m.cdr(clause));
        }
    }
    Ok(Value::NIL)
}

/// (and 'any ..) -> any
fn and(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut val = Value::T;
    for x in m.list_items(m.cdr(ex)) {
        val = m.eval(x)?;
        if val.is_nil() {
            return Ok(Value::NIL);
        }
        m.set_at(val);
    }
    Ok(val)
}

/// (or 'any ..) -> any
fn or(m: &mut Machine, ex: Value) -> Result<Value> {
    for x in m.list_items(m.cdr(ex)) {
        let val = m.eval(x)?;
        if !val.is_nil() {
            m.set_at(val);
            return Ok(val);
        }
    }
    Ok(Value::NIL)
}

/// (not 'any) -> flg
fn not(m: &mut Machine, ex: Value) -> Result<Value> {
    let val = m.eval_car(m.cdr(ex))?;
    if val.is_nil() {
        return Ok(Value::T);
    }
    m.set_at(val);
    Ok(Value::NIL)
}

/// (nand 'any ..) -> flg
fn nand(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(Value::from_bool(and(m, ex)?.is_nil()))
}

/// (nor 'any ..) -> flg
fn nor(m: &mut Machine, ex: Value) -> Result<Value> {
    Ok(Value::from_bool(or(m, ex)?.is_nil()))
}

/// (xor 'any 'any) -> flg
fn xor(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let a = m.eval_car(x)?;
    let b = m.eval_car(m.cdr(x))?;
    Ok(Value::from_bool(a.is_nil() != b.is_nil()))
}

/// (while 'any . prg) -> any
fn while_(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let (test, prg) = (m.car(x), m.cdr(x));
    let mut result = Value::NIL;
    loop {
        let v = m.eval(test)?;
        if v.is_nil() {
            return Ok(result);
        }
        m.set_at(v);
        result = m.run(prg)?;
    }
}

/// (until 'any . prg) -> any
fn until(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let (test, prg) = (m.car(x), m.cdr(x));
    let mut result = Value::NIL;
    loop {
        let v = m.eval(test)?;
        if !v.is_nil() {
            m.set_at(v);
            return Ok(result);
        }
        result = m.run(prg)?;
    }
}

/// Outcome of one pass over a loop body.
enum Step {
    Next(Value),
    Exit(Value),
}

/// Run a loop body once. `(NIL 'any . prg)` exits when `any` is NIL and
/// `(T 'any . prg)` when it is not; the exit value is the result of `prg`.
fn loop_body(m: &mut Machine, body: Value) -> Result<Step> {
    let mut last = Value::NIL;
    let mut x = body;
    while let Some(id) = x.as_cell() {
        let clause = m.heap.car(id);
        let head = m.car(clause);
        if clause.is_cell() && (head.is_nil() || head.is_t()) {
            let y = m.cdr(clause);
            let v = m.eval_car(y)?;
            if v.is_nil() == head.is_nil() {
                if !v.is_nil() {
                    m.set_at(v);
                }
                return m.run(m.cdr(y)).map(Step::Exit);
            }
            m.set_at(v);
            last = v;
        } else {
            last = m.eval(clause)?;
        }
        x = m.heap.cdr(id);
    }
    Ok(Step::Next(last))
}

/// (loop ['any | (NIL 'any . prg) | (T 'any . prg) ..]) -> any
fn loop_(m: &mut Machine, ex: Value) -> Result<Value> {
    let body = m.cdr(ex);
    loop {
        if let Step::Exit(v) = loop_body(m, body)? {
            return Ok(v);
        }
    }
}

/// (do 'flg|num ['any | (NIL 'any . prg) | (T 'any . prg) ..]) -> any
fn do_(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let count = m.eval_car(x)?;
    let body = m.cdr(x);
    let mut result = Value::NIL;
    if count.is_nil() {
        return Ok(result);
    }
    let mut n = match count.as_num() {
        Some(n) => Some(n),
        None if count.is_t() => None,
        None => return Err(LispError::new(ErrorKind::NumExpected, Some(ex), Some(count))),
    };
    loop {
        if let Some(left) = n.as_mut() {
            if *left <= 0 {
                return Ok(result);
            }
            *left -= 1;
        }
        match loop_body(m, body)? {
            Step::Exit(v) => return Ok(v),
            Step::Next(v) => result = v,
        }
    }
}

/// (for sym 'num ['any | (NIL 'any . prg) | (T 'any . prg) ..]) -> any
/// (for sym|(sym2 . sym) 'lst ['any | (NIL 'any . prg) | (T 'any . prg) ..]) -> any
/// (for (sym 'any1 'any2 [. prg]) ['any | (NIL 'any . prg) | (T 'any . prg) ..]) -> any
fn for_(m: &mut Machine, ex: Value) -> Result<Value> {
    let depth = m.binds.depth();
    let result = for_body(m, ex);
    m.unbind_to(depth);
    result
}

fn for_body(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let first = m.car(x);
    let mut result = Value::NIL;

    if first.is_cell() && m.cdr(first).is_cell() {
        // (sym 'init 'cond . step)
        let var = m.need_var(ex, m.car(first))?;
        let y = m.cdr(first);
        let init = m.eval_car(y)?;
        let (test, step) = (m.car(m.cdr(y)), m.cdr(m.cdr(y)));
        let body = m.cdr(x);
        m.bind_var(var, init);
        loop {
            let v = m.eval(test)?;
            if v.is_nil() {
                return Ok(result);
            }
            m.set_at(v);
            match loop_body(m, body)? {
                Step::Exit(v) => return Ok(v),
                Step::Next(v) => result = v,
            }
            m.run(step)?;
        }
    }

    let (counter, var) = if first.is_cell() {
        (
            Some(m.need_var(ex, m.car(first))?),
            m.need_var(ex, m.cdr(first))?,
        )
    } else {
        (None, m.need_var(ex, first)?)
    };
    let y = m.cdr(x);
    let source = m.eval_car(y)?;
    let body = m.cdr(y);
    m.bind_var(var, Value::NIL);
    if let Some(counter) = counter {
        m.bind_var(counter, Value::ZERO);
    }

    let items: Box<dyn Iterator<Item = Value>> = match source.as_num() {
        Some(n) if counter.is_none() => Box::new((1..=n).map(Value::boxed)),
        _ => Box::new(m.need_lst(ex, source).map(|l| m.list_items(l))?.into_iter()),
    };
    for (i, item) in items.enumerate() {
        m.symbols.set_value(var, item);
        if let Some(counter) = counter {
            m.symbols.set_value(counter, Value::boxed(i as i64 + 1));
        }
        match loop_body(m, body)? {
            Step::Exit(v) => return Ok(v),
            Step::Next(v) => result = v,
        }
    }
    Ok(result)
}

/// (prog . prg) -> any
fn prog(m: &mut Machine, ex: Value) -> Result<Value> {
    m.run(m.cdr(ex))
}

/// (prog1 'any1 . prg) -> any1
fn prog1(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let val = m.eval_car(x)?;
    m.set_at(val);
    m.run(m.cdr(x))?;
    Ok(val)
}

/// (prog2 'any1 'any2 . prg) -> any2
fn prog2(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    m.eval_car(x)?;
    let x = m.cdr(x);
    let val = m.eval_car(x)?;
    m.set_at(val);
    m.run(m.cdr(x))?;
    Ok(val)
}

/// (run 'any) -> any
fn run(m: &mut Machine, ex: Value) -> Result<Value> {
    let prg = m.eval_car(m.cdr(ex))?;
    if prg.is_cell() {
        m.run(prg)
    } else {
        m.eval(prg)
    }
}

/// (eval 'any) -> any
fn eval(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.eval_car(m.cdr(ex))?;
    m.eval(x)
}

/// (apply 'fun 'lst ['any ..]) -> any
fn apply(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let f = args.first().copied().unwrap_or(Value::NIL);
    let lst = m.need_lst(ex, args.get(1).copied().unwrap_or(Value::NIL))?;
    let mut vals: Vec<Value> = args.iter().skip(2).copied().collect();
    vals.extend(m.list_items(lst));
    m.apply(f, &vals)
}

/// (catch 'any . prg) -> any
fn catch(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let tag = m.eval_car(x)?;
    let prg = m.cdr(x);
    m.catch(Some(tag), Value::NIL, |m| m.run(prg))
}

/// (throw 'sym 'any)
fn throw(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let tag = m.eval_car(x)?;
    let val = m.eval_car(m.cdr(x))?;
    m.throw(ex, tag, val)
}

/// (finally exe . prg) -> any
fn finally(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let (fin, prg) = (m.car(x), m.cdr(x));
    m.catch(None, fin, |m| m.run(prg))
}

/// (quit ['any ['any]])
fn quit(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let msg = m.eval_car(x)?;
    let y = m.cdr(x);
    let culprit = if y.is_cell() {
        Some(m.eval_car(y)?)
    } else {
        None
    };
    let text = m.prin_string(msg);
    Err(LispError::with_msg(ErrorKind::Quit, None, culprit, text))
}

/// (bye ['cnt])
fn bye(m: &mut Machine, ex: Value) -> Result<Value> {
    let code = m.eval_car(m.cdr(ex))?;
    let code = if code.is_nil() {
        0
    } else {
        m.need_num(ex, code)?
    };
    let hook = m.symbols.value(sym::BYE);
    m.run(hook)?;
    Err(LispError::Bye(code as i32))
}

/// (nil . prg) -> NIL
fn nil(m: &mut Machine, ex: Value) -> Result<Value> {
    m.run(m.cdr(ex))?;
    Ok(Value::NIL)
}

/// (t . prg) -> T
fn t(m: &mut Machine, ex: Value) -> Result<Value> {
    m.run(m.cdr(ex))?;
    Ok(Value::T)
}

/// (args) -> flg
fn args(m: &mut Machine, _ex: Value) -> Result<Value> {
    let more = m.varargs.last().map_or(false, |f| f.pos < f.args.len());
    Ok(Value::from_bool(more))
}

/// (next) -> any
fn next(m: &mut Machine, _ex: Value) -> Result<Value> {
    Ok(match m.varargs.last_mut() {
        Some(frame) => {
            let v = frame.args.get(frame.pos).copied().unwrap_or(Value::NIL);
            frame.pos = (frame.pos + 1).min(frame.args.len() + 1);
            v
        }
        None => Value::NIL,
    })
}

/// (arg ['cnt]) -> any
fn arg(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let n = if x.is_cell() { Some(m.arg_num(ex, x)?) } else { None };
    let Some(frame) = m.varargs.last() else {
        return Ok(Value::NIL);
    };
    let index = match n {
        None => frame.pos.checked_sub(1),
        Some(n) if n > 0 => Some(frame.pos + n as usize - 1),
        Some(_) => None,
    };
    Ok(index
        .and_then(|i| frame.args.get(i).copied())
        .unwrap_or(Value::NIL))
}

/// (rest) -> lst
fn rest(m: &mut Machine, _ex: Value) -> Result<Value> {
    let remaining = match m.varargs.last() {
        Some(frame) => frame.args.get(frame.pos..).unwrap_or(&[]).to_vec(),
        None => Vec::new(),
    };
    m.list(&remaining)
}

/// (make .. [(link 'any ..)] ..) -> any
fn make(m: &mut Machine, ex: Value) -> Result<Value> {
    let level = m.makes.len();
    m.makes.push(MakeFrame {
        head: Value::NIL,
        tail: None,
    });
    let result = m.run(m.cdr(ex));
    let head = m.makes.get(level).map_or(Value::NIL, |f| f.head);
    m.makes.truncate(level);
    result.map(|_| head)
}

fn not_making(ex: Value) -> LispError {
    LispError::new(ErrorKind::NotMaking, Some(ex), None)
}

/// (link 'any ..) -> any
fn link(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    if m.makes.is_empty() {
        return Err(not_making(ex));
    }
    let mut last = Value::NIL;
    for v in args {
        let cell = m.heap.cons(v, Value::NIL)?;
        let Some(frame) = m.makes.last_mut() else {
            return Err(not_making(ex));
        };
        match frame.tail {
            Some(tail) => m.heap.set_cdr(tail, cell),
            None => frame.head = cell,
        }
        frame.tail = cell.as_cell();
        last = v;
    }
    Ok(last)
}

/// (yoke 'any ..) -> any
fn yoke(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let mut last = Value::NIL;
    for v in args {
        let Some(head) = m.makes.last().map(|f| f.head) else {
            return Err(not_making(ex));
        };
        let cell = m.heap.cons(v, head)?;
        if let Some(frame) = m.makes.last_mut() {
            frame.head = cell;
            if frame.tail.is_none() {
                frame.tail = cell.as_cell();
            }
        }
        last = v;
    }
    Ok(last)
}

/// (chain 'lst ..) -> lst
fn chain(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    if m.makes.is_empty() {
        return Err(not_making(ex));
    }
    let mut last = Value::NIL;
    for lst in args {
        last = lst;
        let Some(first) = lst.as_cell() else {
            continue;
        };
        let end = m.last_cell(first);
        if let Some(frame) = m.makes.last_mut() {
            match frame.tail {
                Some(tail) => m.heap.set_cdr(tail, lst),
                None => frame.head = lst,
            }
            frame.tail = Some(end);
        }
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::eval::Machine;
    use crate::value::Value;

    fn eval(src: &str) -> String {
        let mut m = Machine::new(Config::default()).unwrap();
        let v = m.eval_str(src).unwrap();
        m.print_string(v)
    }

    #[test]
    fn conditionals_set_at() {
        assert_eq!(eval("(if (+ 1 2) @ 0)"), "3");
        assert_eq!(eval("(cond ((member 2 (1 2 3)) @))"), "(2 3)");
        assert_eq!(eval("(and 1 2 3)"), "3");
        assert_eq!(eval("(or NIL 7)"), "7");
        assert_eq!(eval("(case 3 (1 'one) ((2 3) 'few) (T 'many))"), "few");
    }

    #[test]
    fn loops_exit_through_nil_and_t_clauses() {
        assert_eq!(eval("(let N 0 (loop (inc 'N) (T (= N 5) N)))"), "5");
        assert_eq!(eval("(let S 0 (for I 4 (setq S (+ S I))))"), "10");
        assert_eq!(eval("(make (for (I . X) '(a b) (link (cons I X))))"), "((1 . a) (2 . b))");
        assert_eq!(eval("(make (for (I 1 (> 4 I) (inc 'I)) (link I)))"), "(1 2 3)");
        assert_eq!(eval("(let N 0 (do 3 (inc 'N)))"), "3");
        assert_eq!(eval("(let N 0 (while (> 3 N) (inc 'N)))"), "3");
    }

    #[test]
    fn let_restores_bindings_on_error() {
        let mut m = Machine::new(Config::default()).unwrap();
        m.eval_str("(setq X 1)").unwrap();
        let err = m.eval_str("(let X 2 (car X))").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::ListExpected));
        assert_eq!(m.eval_str("X").unwrap(), Value::ONE);
    }

    #[test]
    fn varargs_are_walked_with_next_and_rest() {
        assert_eq!(
            eval("(de f @ (make (while (args) (link (next))))) (f 1 2 3)"),
            "(1 2 3)"
        );
        assert_eq!(eval("(de g (A . @) (rest)) (g 1 2 3)"), "(2 3)");
        assert_eq!(eval("(de h @ (next) (arg)) (h 'x 'y)"), "x");
    }

    #[test]
    fn make_builds_with_link_yoke_and_chain() {
        assert_eq!(eval("(make (link 2 3) (yoke 1) (chain (list 4 5)) (link 6))"), "(1 2 3 4 5 6)");
        let mut m = Machine::new(Config::default()).unwrap();
        let err = m.eval_str("(link 1)").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotMaking));
    }

    #[test]
    fn throw_without_catch_is_tag_not_found() {
        let mut m = Machine::new(Config::default()).unwrap();
        let err = m.eval_str("(throw 'nowhere 1)").unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::TagNotFound));
        assert_eq!(eval("(catch 'ok (throw 'ok 42))"), "42");
        assert_eq!(eval("(catch T (throw 'any 7))"), "7");
    }
}
