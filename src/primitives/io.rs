use super::PrimitiveTable;
use crate::error::Result;
use crate::eval::Machine;
use crate::io::{InFrame, OutFrame};
use crate::value::Value;

pub(super) fn register(table: &mut PrimitiveTable) {
    table
        .register("prin", prin)
        .register("prinl", prinl)
        .register("print", print)
        .register("println", println)
        .register("printsp", printsp)
        .register("space", space)
        .register("read", read)
        .register("line", line)
        .register_special("in", in_)
        .register_special("out", out)
        .register("load", load)
        .register("flush", flush);
}

/// Write each argument without quoting; the result is the last one.
fn prin_args(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut last = Value::NIL;
    for v in m.eval_args(ex)? {
        let s = m.prin_string(v);
        m.write_str(&s)?;
        last = v;
    }
    Ok(last)
}

/// Write each argument in readable form, separated by spaces.
fn print_args(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut last = Value::NIL;
    for (i, v) in m.eval_args(ex)?.into_iter().enumerate() {
        if i > 0 {
            m.write_str(" ")?;
        }
        let s = m.print_string(v);
        m.write_str(&s)?;
        last = v;
    }
    Ok(last)
}

/// (prin 'any ..) -> any
fn prin(m: &mut Machine, ex: Value) -> Result<Value> {
    prin_args(m, ex)
}

/// (prinl 'any ..) -> any
fn prinl(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = prin_args(m, ex)?;
    m.write_str("\n")?;
    Ok(v)
}

/// (print 'any ..) -> any
fn print(m: &mut Machine, ex: Value) -> Result<Value> {
    print_args(m, ex)
}

/// (println 'any ..) -> any
fn println(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = print_args(m, ex)?;
    m.write_str("\n")?;
    Ok(v)
}

/// (printsp 'any ..) -> any
fn printsp(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = print_args(m, ex)?;
    m.write_str(" ")?;
    Ok(v)
}

/// (space ['cnt]) -> cnt
fn space(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = m.eval_car(m.cdr(ex))?;
    let n = if v.is_nil() { 1 } else { m.need_num(ex, v)? };
    for _ in 0..n.max(0) {
        m.write_str(" ")?;
    }
    m.boxed(ex, n)
}

/// (read) -> any
fn read(m: &mut Machine, _ex: Value) -> Result<Value> {
    Ok(m.read()?.unwrap_or(Value::NIL))
}

/// (line ['flg]) -> lst|str
fn line(m: &mut Machine, ex: Value) -> Result<Value> {
    let as_string = !m.eval_car(m.cdr(ex))?.is_nil();
    let input = m.input();
    if input.peek()?.is_none() {
        return Ok(Value::NIL);
    }
    let mut bytes = Vec::new();
    while let Some(b) = input.next_byte()? {
        if b == b'\n' {
            break;
        }
        bytes.push(b);
    }
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    let text = String::from_utf8_lossy(&bytes).into_owned();
    if as_string {
        return Ok(m.mk_str(&text));
    }
    let chars: Vec<Value> = text
        .chars()
        .map(|c| m.mk_str(c.encode_utf8(&mut [0; 4])))
        .collect();
    m.list(&chars)
}

/// A file name argument; NIL names the standard stream.
fn file_name(m: &mut Machine, v: Value) -> Option<String> {
    if v.is_nil() {
        None
    } else {
        Some(m.prin_string(v))
    }
}

/// (in 'any . prg) -> any
fn in_(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let name = m.eval_car(x)?;
    let frame = match file_name(m, name) {
        Some(path) => InFrame::open(&path)?,
        None => InFrame::stdin(),
    };
    let level = m.ins.len();
    m.push_input(frame);
    let result = m.run(m.cdr(x));
    m.ins.truncate(level);
    result
}

/// (out 'any . prg) -> any
fn out(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let name = m.eval_car(x)?;
    let frame = match file_name(m, name) {
        Some(path) => match path.strip_prefix('+') {
            Some(path) => OutFrame::create(path, true)?,
            None => OutFrame::create(&path, false)?,
        },
        None => OutFrame::Stdout,
    };
    let level = m.outs.len();
    m.push_output(frame);
    let result = m.run(m.cdr(x));
    let mut flushed = Ok(());
    while m.outs.len() > level {
        if let Some(mut frame) = m.pop_output() {
            flushed = flushed.and(frame.flush_frame());
        }
    }
    let v = result?;
    flushed?;
    Ok(v)
}

/// (load 'any ..) -> any
fn load(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut last = Value::NIL;
    for v in m.eval_args(ex)? {
        last = match file_name(m, v) {
            Some(path) => m.load(&path)?,
            None => m.eval_input()?,
        };
    }
    Ok(last)
}

/// (flush) -> flg
fn flush(m: &mut Machine, _ex: Value) -> Result<Value> {
    m.out().flush_frame()?;
    Ok(Value::T)
}
