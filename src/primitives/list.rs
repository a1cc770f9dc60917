use std::cmp::Ordering;
use std::collections::HashSet;

use super::PrimitiveTable;
use crate::error::Result;
use crate::eval::Machine;
use crate::value::{CellId, Kind, Value};

pub(super) fn register(table: &mut PrimitiveTable) {
    table
        .register("car", car)
        .register("cdr", cdr)
        .register("caar", caar)
        .register("cadr", cadr)
        .register("cdar", cdar)
        .register("cddr", cddr)
        .register("caddr", caddr)
        .register("cdddr", cdddr)
        .register("cons", cons)
        .register("list", list)
        .register("length", length)
        .register("circ", circ)
        .register("circ?", circq)
        .register("append", append)
        .register("reverse", reverse)
        .register("last", last)
        .register("nth", nth)
        .register("member", member)
        .register("memq", memq)
        .register("assoc", assoc)
        .register("asoq", asoq)
        .register("delete", delete)
        .register("delq", delq)
        .register("head", head)
        .register("tail", tail)
        .register("con", con)
        .register("conc", conc)
        .register("copy", copy)
        .register("index", index)
        .register("push", push)
        .register("pop", pop)
        .register("mapc", mapc)
        .register("mapcar", mapcar)
        .register("filter", filter)
        .register("find", find)
        .register("sort", sort)
        .register("heap", heap);
}

impl Machine {
    /// The spine cells of a list, one lap at most.
    pub(crate) fn tails(&self, list: Value) -> Vec<CellId> {
        let mut cells = Vec::new();
        let mut seen = HashSet::new();
        let mut x = list;
        while let Some(id) = x.as_cell() {
            if !seen.insert(id) {
                break;
            }
            cells.push(id);
            x = self.heap.cdr(id);
        }
        cells
    }

    /// The last spine cell reachable from `id`, stopping before a cycle closes.
    pub(crate) fn last_cell(&self, id: CellId) -> CellId {
        let mut seen = HashSet::from([id]);
        let mut cur = id;
        loop {
            match self.heap.cdr(cur).as_cell() {
                Some(next) if seen.insert(next) => cur = next,
                _ => return cur,
            }
        }
    }

    /// Number of elements, `None` for a circular list. Atoms measure the
    /// characters of their name or digits.
    pub fn length(&self, v: Value) -> Option<usize> {
        match v.kind() {
            Kind::Cell(_) => {
                let mut seen = HashSet::new();
                let mut x = v;
                while let Some(id) = x.as_cell() {
                    if !seen.insert(id) {
                        return None;
                    }
                    x = self.heap.cdr(id);
                }
                Some(seen.len())
            }
            Kind::Number(n) => Some(n.unsigned_abs().to_string().len()),
            _ => Some(self.name_of(v).map_or(0, |s| s.chars().count())),
        }
    }
}

fn arg1(m: &mut Machine, ex: Value) -> Result<Value> {
    m.eval_car(m.cdr(ex))
}

/// Walk `path` (innermost step last, as in the name `cadr`) from the argument.
fn cxr(m: &mut Machine, ex: Value, path: &str) -> Result<Value> {
    let mut v = arg1(m, ex)?;
    for step in path.bytes().rev() {
        m.need_lst(ex, v)?;
        v = if step == b'a' { m.car(v) } else { m.cdr(v) };
    }
    Ok(v)
}

/// (car 'lst) -> any
fn car(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "a")
}

/// (cdr 'lst) -> any
fn cdr(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "d")
}

fn caar(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "aa")
}

fn cadr(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "ad")
}

fn cdar(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "da")
}

fn cddr(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "dd")
}

fn caddr(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "add")
}

fn cdddr(m: &mut Machine, ex: Value) -> Result<Value> {
    cxr(m, ex, "ddd")
}

/// (cons 'any ['any ..]) -> lst
fn cons(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut args = m.eval_args(ex)?;
    let mut result = if args.len() > 1 {
        args.pop().unwrap_or(Value::NIL)
    } else {
        Value::NIL
    };
    for &v in args.iter().rev() {
        result = m.cons(v, result)?;
    }
    Ok(result)
}

/// (list 'any ..) -> lst
fn list(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    m.list(&args)
}

/// (length 'any) -> cnt | T
fn length(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    match m.length(v) {
        Some(n) => m.boxed(ex, n as i64),
        None => Ok(Value::T),
    }
}

/// (circ 'any ..) -> lst
fn circ(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let l = m.list(&args)?;
    if let Some(first) = l.as_cell() {
        let end = m.last_cell(first);
        m.heap.set_cdr(end, l);
    }
    Ok(l)
}

/// (circ? 'any) -> lst | NIL
fn circq(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let mut seen = HashSet::new();
    let mut x = v;
    while let Some(id) = x.as_cell() {
        if !seen.insert(id) {
            return Ok(x);
        }
        x = m.heap.cdr(id);
    }
    Ok(Value::NIL)
}

/// (append 'lst ..) -> lst
fn append(m: &mut Machine, ex: Value) -> Result<Value> {
    let mut args = m.eval_args(ex)?;
    let mut result = args.pop().unwrap_or(Value::NIL);
    for &l in args.iter().rev() {
        let items = m.list_items(l);
        for &v in items.iter().rev() {
            result = m.cons(v, result)?;
        }
    }
    Ok(result)
}

/// (reverse 'lst) -> lst
fn reverse(m: &mut Machine, ex: Value) -> Result<Value> {
    let l = arg1(m, ex)?;
    let mut result = Value::NIL;
    for v in m.list_items(l) {
        result = m.cons(v, result)?;
    }
    Ok(result)
}

/// (last 'lst) -> any
fn last(m: &mut Machine, ex: Value) -> Result<Value> {
    let l = arg1(m, ex)?;
    Ok(match l.as_cell() {
        Some(id) => m.heap.car(m.last_cell(id)),
        None => Value::NIL,
    })
}

/// (nth 'lst 'cnt ..) -> lst
fn nth(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let mut v = args.first().copied().unwrap_or(Value::NIL);
    for (i, &n) in args.iter().skip(1).enumerate() {
        let n = m.need_num(ex, n)?;
        if i > 0 {
            v = m.car(v);
        }
        if n <= 0 {
            return Ok(Value::NIL);
        }
        for _ in 1..n {
            v = m.cdr(v);
        }
    }
    Ok(v)
}

fn find_tail(m: &Machine, key: Value, l: Value, test: fn(&Machine, Value, Value) -> bool) -> Value {
    m.tails(l)
        .into_iter()
        .find(|&id| test(m, key, m.heap.car(id)))
        .map_or(Value::NIL, Value::cell)
}

fn args2(m: &mut Machine, ex: Value) -> Result<(Value, Value)> {
    let x = m.cdr(ex);
    let a = m.eval_car(x)?;
    let b = m.eval_car(m.cdr(x))?;
    Ok((a, b))
}

/// (member 'any 'lst) -> lst | NIL
fn member(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    Ok(find_tail(m, key, l, |m, a, b| m.equal(a, b)))
}

/// (memq 'any 'lst) -> lst | NIL
fn memq(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    Ok(find_tail(m, key, l, |_, a, b| a == b))
}

fn find_assoc(m: &Machine, key: Value, l: Value, test: fn(&Machine, Value, Value) -> bool) -> Value {
    m.list_items(l)
        .into_iter()
        .find(|&entry| entry.is_cell() && test(m, key, m.car(entry)))
        .unwrap_or(Value::NIL)
}

/// (assoc 'any 'lst) -> lst | NIL
fn assoc(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    Ok(find_assoc(m, key, l, |m, a, b| m.equal(a, b)))
}

/// (asoq 'any 'lst) -> lst | NIL
fn asoq(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    Ok(find_assoc(m, key, l, |_, a, b| a == b))
}

/// A copy of `l` without its first element matching `key`; the tail after
/// the match is shared.
fn remove_first(m: &mut Machine, key: Value, l: Value, test: fn(&Machine, Value, Value) -> bool) -> Result<Value> {
    let cells = m.tails(l);
    let r: &Machine = m;
    let Some(pos) = cells.iter().position(|&id| test(r, key, r.heap.car(id))) else {
        return Ok(l);
    };
    let mut result = m.heap.cdr(cells[pos]);
    for &id in cells[..pos].iter().rev() {
        result = m.cons(m.heap.car(id), result)?;
    }
    Ok(result)
}

/// (delete 'any 'lst) -> lst
fn delete(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    remove_first(m, key, l, |m, a, b| m.equal(a, b))
}

/// (delq 'any 'lst) -> lst
fn delq(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    remove_first(m, key, l, |_, a, b| a == b)
}

/// (head 'cnt 'lst) -> lst
fn head(m: &mut Machine, ex: Value) -> Result<Value> {
    let (n, l) = args2(m, ex)?;
    let n = m.need_num(ex, n)?;
    let items = m.list_items(l);
    let keep = if n >= 0 {
        (n as usize).min(items.len())
    } else {
        items.len().saturating_sub(n.unsigned_abs() as usize)
    };
    m.list(&items[..keep])
}

/// (tail 'cnt 'lst) -> lst
fn tail(m: &mut Machine, ex: Value) -> Result<Value> {
    let (n, l) = args2(m, ex)?;
    let n = m.need_num(ex, n)?;
    let cells = m.tails(l);
    let skip = if n >= 0 {
        cells.len().saturating_sub(n as usize)
    } else {
        (n.unsigned_abs() as usize).min(cells.len())
    };
    Ok(cells.get(skip).map_or(Value::NIL, |&id| Value::cell(id)))
}

/// (con 'lst 'any) -> any
fn con(m: &mut Machine, ex: Value) -> Result<Value> {
    let (l, v) = args2(m, ex)?;
    let id = m.need_pair(ex, l)?;
    m.heap.set_cdr(id, v);
    Ok(v)
}

/// (conc 'lst ..) -> lst
fn conc(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let mut result = Value::NIL;
    let mut end: Option<CellId> = None;
    for l in args {
        match end {
            Some(e) => m.heap.set_cdr(e, l),
            None => result = l,
        }
        if let Some(first) = l.as_cell() {
            end = Some(m.last_cell(first));
        }
    }
    Ok(result)
}

/// (copy 'any) -> any
fn copy(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = arg1(m, ex)?;
    let cells = m.tails(v);
    let Some(&last) = cells.last() else {
        return Ok(v);
    };
    // a cell after the last spine cell means the list closes on itself
    let end = m.heap.cdr(last);
    let mut result = if end.is_cell() { Value::NIL } else { end };
    for &id in cells.iter().rev() {
        result = m.cons(m.heap.car(id), result)?;
    }
    Ok(result)
}

/// (index 'any 'lst) -> cnt | NIL
fn index(m: &mut Machine, ex: Value) -> Result<Value> {
    let (key, l) = args2(m, ex)?;
    match m.list_items(l).into_iter().position(|v| m.equal(key, v)) {
        Some(i) => m.boxed(ex, i as i64 + 1),
        None => Ok(Value::NIL),
    }
}

/// (push 'var 'any ..) -> any
fn push(m: &mut Machine, ex: Value) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let var = args.first().copied().unwrap_or(Value::NIL);
    let id = m.need_var(ex, var)?;
    let mut last = Value::NIL;
    for &v in args.iter().skip(1) {
        let cell = m.cons(v, m.symbols.value(id))?;
        m.symbols.set_value(id, cell);
        last = v;
    }
    Ok(last)
}

/// (pop 'var) -> any
fn pop(m: &mut Machine, ex: Value) -> Result<Value> {
    let var = arg1(m, ex)?;
    let id = m.need_var(ex, var)?;
    let l = m.symbols.value(id);
    let Some(cell) = l.as_cell() else {
        return Ok(Value::NIL);
    };
    m.symbols.set_value(id, m.heap.cdr(cell));
    Ok(m.heap.car(cell))
}

/// Evaluate `(fun 'lst ..)` arguments into the function and the element
/// rows it is applied to, one row per element of the first list.
fn map_rows(m: &mut Machine, ex: Value) -> Result<(Value, Vec<Vec<Value>>)> {
    let args = m.eval_args(ex)?;
    let f = args.first().copied().unwrap_or(Value::NIL);
    let lists: Vec<Vec<Value>> = args.iter().skip(1).map(|&l| m.list_items(l)).collect();
    let n = lists.first().map_or(0, Vec::len);
    let rows = (0..n)
        .map(|i| {
            lists
                .iter()
                .map(|l| l.get(i).copied().unwrap_or(Value::NIL))
                .collect()
        })
        .collect();
    Ok((f, rows))
}

/// (mapc 'fun 'lst ..) -> any
fn mapc(m: &mut Machine, ex: Value) -> Result<Value> {
    let (f, rows) = map_rows(m, ex)?;
    let mut result = Value::NIL;
    for row in rows {
        result = m.apply(f, &row)?;
    }
    Ok(result)
}

/// (mapcar 'fun 'lst ..) -> lst
fn mapcar(m: &mut Machine, ex: Value) -> Result<Value> {
    let (f, rows) = map_rows(m, ex)?;
    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(m.apply(f, &row)?);
    }
    m.list(&results)
}

/// (filter 'fun 'lst ..) -> lst
fn filter(m: &mut Machine, ex: Value) -> Result<Value> {
    let (f, rows) = map_rows(m, ex)?;
    let mut kept = Vec::new();
    for row in rows {
        if !m.apply(f, &row)?.is_nil() {
            kept.push(row[0]);
        }
    }
    m.list(&kept)
}

/// (find 'fun 'lst ..) -> any
fn find(m: &mut Machine, ex: Value) -> Result<Value> {
    let (f, rows) = map_rows(m, ex)?;
    for row in rows {
        if !m.apply(f, &row)?.is_nil() {
            return Ok(row[0]);
        }
    }
    Ok(Value::NIL)
}

fn before(m: &mut Machine, f: Option<Value>, a: Value, b: Value) -> Result<bool> {
    match f {
        Some(f) => Ok(!m.apply(f, &[a, b])?.is_nil()),
        None => Ok(m.compare(a, b) == Ordering::Less),
    }
}

/// Stable merge sort with a fallible ordering.
fn merge_sort(m: &mut Machine, mut items: Vec<Value>, f: Option<Value>) -> Result<Vec<Value>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let right = items.split_off(items.len() / 2);
    let left = merge_sort(m, items, f)?;
    let right = merge_sort(m, right, f)?;
    let mut out = Vec::with_capacity(left.len() + right.len());
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if before(m, f, right[j], left[i])? {
            out.push(right[j]);
            j += 1;
        } else {
            out.push(left[i]);
            i += 1;
        }
    }
    out.extend_from_slice(&left[i..]);
    out.extend_from_slice(&right[j..]);
    Ok(out)
}

/// (sort 'lst ['fun]) -> lst
fn sort(m: &mut Machine, ex: Value) -> Result<Value> {
    let (l, f) = args2(m, ex)?;
    let l = m.need_lst(ex, l)?;
    let cells = m.tails(l);
    let items: Vec<Value> = cells.iter().map(|&id| m.heap.car(id)).collect();
    let f = (!f.is_nil()).then_some(f);
    let sorted = merge_sort(m, items, f)?;
    for (&id, v) in cells.iter().zip(sorted) {
        m.heap.set_car(id, v);
    }
    Ok(l)
}

/// (heap ['flg]) -> cnt
fn heap(m: &mut Machine, ex: Value) -> Result<Value> {
    let free = !arg1(m, ex)?.is_nil();
    let stats = m.heap_stats();
    let n = if free { stats.free } else { stats.total };
    m.boxed(ex, n as i64)
}
