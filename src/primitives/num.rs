use std::cmp::Ordering;

use rand::Rng;

use super::PrimitiveTable;
use crate::error::{ErrorKind, LispError, Result};
use crate::eval::Machine;
use crate::value::{Value, NUM_MAX, NUM_MIN};

pub(super) fn register(table: &mut PrimitiveTable) {
    table
        .register("+", add)
        .register("-", sub)
        .register("*", mul)
        .register("/", div)
        .register("%", rem)
        .register("abs", abs)
        .register("max", max)
        .register("min", min)
        .register("inc", inc)
        .register("dec", dec)
        .register(">>", shift)
        .register("&", bit_and)
        .register("|", bit_or)
        .register("x|", bit_xor)
        .register("rand", rand)
        .register("seed", seed);
}

fn overflow(ex: Value) -> LispError {
    LispError::new(ErrorKind::Overflow, Some(ex), None)
}

/// Fold the numeric arguments of `ex` with a checked operation. Any NIL
/// argument makes the result NIL.
fn fold(m: &mut Machine, ex: Value, op: impl Fn(i64, i64) -> Result<Option<i64>>) -> Result<Value> {
    let Some(nums) = m.num_args(ex)? else {
        return Ok(Value::NIL);
    };
    let Some((&first, rest)) = nums.split_first() else {
        return Ok(Value::NIL);
    };
    let mut acc = first;
    for &n in rest {
        acc = op(acc, n)?.ok_or_else(|| overflow(ex))?;
    }
    m.boxed(ex, acc)
}

/// (+ 'num ..) -> num
fn add(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| Ok(a.checked_add(b)))
}

/// (- 'num ..) -> num
fn sub(m: &mut Machine, ex: Value) -> Result<Value> {
    let Some(nums) = m.num_args(ex)? else {
        return Ok(Value::NIL);
    };
    match nums[..] {
        [] => Ok(Value::NIL),
        [n] => m.boxed(ex, n.checked_neg().ok_or_else(|| overflow(ex))?),
        [first, ref rest @ ..] => {
            let mut acc = first;
            for &n in rest {
                acc = acc.checked_sub(n).ok_or_else(|| overflow(ex))?;
            }
            m.boxed(ex, acc)
        }
    }
}

/// (* 'num ..) -> num
fn mul(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| Ok(a.checked_mul(b)))
}

/// (/ 'num ..) -> num
fn div(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| {
        if b == 0 {
            return Err(LispError::new(ErrorKind::DivZero, Some(ex), None));
        }
        Ok(a.checked_div(b))
    })
}

/// (% 'num ..) -> num
fn rem(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| {
        if b == 0 {
            return Err(LispError::new(ErrorKind::DivZero, Some(ex), None));
        }
        Ok(a.checked_rem(b))
    })
}

/// (abs 'num) -> num
fn abs(m: &mut Machine, ex: Value) -> Result<Value> {
    let v = m.eval_car(m.cdr(ex))?;
    if v.is_nil() {
        return Ok(v);
    }
    let n = m.need_num(ex, v)?;
    m.boxed(ex, n.abs())
}

fn extreme(m: &mut Machine, ex: Value, keep: Ordering) -> Result<Value> {
    let args = m.eval_args(ex)?;
    let mut best = Value::NIL;
    for (i, v) in args.into_iter().enumerate() {
        if i == 0 || m.compare(v, best) == keep {
            best = v;
        }
    }
    Ok(best)
}

/// (max 'any ..) -> any
fn max(m: &mut Machine, ex: Value) -> Result<Value> {
    extreme(m, ex, Ordering::Greater)
}

/// (min 'any ..) -> any
fn min(m: &mut Machine, ex: Value) -> Result<Value> {
    extreme(m, ex, Ordering::Less)
}

/// Shared body of `inc` and `dec`. A number argument is stepped and
/// returned; a variable is stepped in place.
fn step(m: &mut Machine, ex: Value, sign: i64) -> Result<Value> {
    let x = m.cdr(ex);
    let target = m.eval_car(x)?;
    let y = m.cdr(x);
    let delta = if y.is_cell() {
        let d = m.eval_car(y)?;
        if d.is_nil() {
            return Ok(Value::NIL);
        }
        m.need_num(ex, d)?
    } else {
        1
    };
    let delta = delta.checked_mul(sign).ok_or_else(|| overflow(ex))?;
    if target.is_nil() {
        return Ok(Value::NIL);
    }
    if let Some(n) = target.as_num() {
        return m.boxed(ex, n.checked_add(delta).ok_or_else(|| overflow(ex))?);
    }
    let id = m.need_var(ex, target)?;
    let cur = m.symbols.value(id);
    if cur.is_nil() {
        return Ok(Value::NIL);
    }
    let n = m.need_num(ex, cur)?;
    let v = m.boxed(ex, n.checked_add(delta).ok_or_else(|| overflow(ex))?)?;
    m.symbols.set_value(id, v);
    Ok(v)
}

/// (inc 'num|var ['num]) -> num
fn inc(m: &mut Machine, ex: Value) -> Result<Value> {
    step(m, ex, 1)
}

/// (dec 'num|var ['num]) -> num
fn dec(m: &mut Machine, ex: Value) -> Result<Value> {
    step(m, ex, -1)
}

/// (>> 'cnt 'num) -> num
fn shift(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let cnt = m.arg_num(ex, x)?;
    let v = m.eval_car(m.cdr(x))?;
    if v.is_nil() {
        return Ok(v);
    }
    let n = m.need_num(ex, v)?;
    let shifted = if cnt >= 0 {
        n >> cnt.min(63)
    } else {
        let k = cnt.unsigned_abs().min(63) as u32;
        n.checked_mul(1i64 << k).ok_or_else(|| overflow(ex))?
    };
    m.boxed(ex, shifted)
}

/// (& 'num ..) -> num
fn bit_and(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| Ok(Some(a & b)))
}

/// (| 'num ..) -> num
fn bit_or(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| Ok(Some(a | b)))
}

/// (x| 'num ..) -> num
fn bit_xor(m: &mut Machine, ex: Value) -> Result<Value> {
    fold(m, ex, |a, b| Ok(Some(a ^ b)))
}

/// (rand ['cnt1 'cnt2] | ['T]) -> cnt | flg
fn rand(m: &mut Machine, ex: Value) -> Result<Value> {
    let x = m.cdr(ex);
    let first = m.eval_car(x)?;
    if first.is_t() {
        return Ok(Value::from_bool(m.rng.gen()));
    }
    if first.is_nil() {
        return Ok(Value::boxed(m.rng.gen_range(NUM_MIN..=NUM_MAX)));
    }
    let lo = m.need_num(ex, first)?;
    let hi = m.arg_num(ex, m.cdr(x))?;
    if hi < lo {
        return Err(LispError::new(ErrorKind::Arg, Some(ex), Some(Value::boxed(hi))));
    }
    Ok(Value::boxed(m.rng.gen_range(lo..=hi)))
}

/// (seed 'any) -> cnt
fn seed(m: &mut Machine, ex: Value) -> Result<Value> {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let v = m.eval_car(m.cdr(ex))?;
    let n = match v.as_num() {
        Some(n) => n as u64,
        None => m
            .print_string(v)
            .bytes()
            .fold(0u64, |h, b| h.wrapping_mul(31).wrapping_add(u64::from(b))),
    };
    m.rng = StdRng::seed_from_u64(n);
    Ok(Value::boxed((n as i64) >> 3))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::eval::Machine;
    use crate::value::{Value, NUM_MAX};

    fn machine() -> Machine {
        Machine::new(Config {
            seed: Some(7),
            ..Config::default()
        })
        .unwrap()
    }

    #[rstest]
    #[case("(+ 1 2 3)", 6)]
    #[case("(- 10 4 3)", 3)]
    #[case("(- 5)", -5)]
    #[case("(* 2 3 4)", 24)]
    #[case("(/ 7 2)", 3)]
    #[case("(/ -7 2)", -3)]
    #[case("(% 7 3)", 1)]
    #[case("(% -7 3)", -1)]
    #[case("(abs -4)", 4)]
    #[case("(max 3 9 2)", 9)]
    #[case("(min 3 9 2)", 2)]
    #[case("(inc 5)", 6)]
    #[case("(dec 5 2)", 3)]
    #[case("(>> 1 8)", 4)]
    #[case("(>> -2 1)", 4)]
    #[case("(& 6 3)", 2)]
    #[case("(| 6 3)", 7)]
    #[case("(x| 6 3)", 5)]
    fn arithmetic(#[case] src: &str, #[case] expected: i64) {
        let mut m = machine();
        assert_eq!(m.eval_str(src).unwrap(), Value::boxed(expected));
    }

    #[test]
    fn nil_arguments_make_nil() {
        let mut m = machine();
        assert!(m.eval_str("(+ 1 NIL)").unwrap().is_nil());
        assert!(m.eval_str("(* NIL 2)").unwrap().is_nil());
        assert!(m.eval_str("(inc NIL)").unwrap().is_nil());
    }

    #[test]
    fn errors_are_signalled() {
        let mut m = machine();
        assert_eq!(m.eval_str("(/ 1 0)").unwrap_err().kind(), Some(ErrorKind::DivZero));
        assert_eq!(m.eval_str("(+ 1 'a)").unwrap_err().kind(), Some(ErrorKind::NumExpected));
        let src = format!("(+ {} 1)", NUM_MAX);
        assert_eq!(m.eval_str(&src).unwrap_err().kind(), Some(ErrorKind::Overflow));
    }

    #[test]
    fn inc_updates_a_variable() {
        let mut m = machine();
        m.eval_str("(setq N 10)").unwrap();
        assert_eq!(m.eval_str("(inc 'N 5)").unwrap(), Value::boxed(15));
        assert_eq!(m.eval_str("N").unwrap(), Value::boxed(15));
    }

    #[test]
    fn rand_stays_in_range_and_is_reproducible() {
        let mut m = machine();
        for _ in 0..100 {
            let n = m.eval_str("(rand 3 5)").unwrap().as_num().unwrap();
            assert!((3..=5).contains(&n));
        }
        let a = m.eval_str("(seed 42) (rand 1 1000000)").unwrap();
        let b = m.eval_str("(seed 42) (rand 1 1000000)").unwrap();
        assert_eq!(a, b);
    }
}
