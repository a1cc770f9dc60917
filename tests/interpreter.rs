use rstest::{fixture, rstest};

use plisp::bind::BindStack;
use plisp::heap::Heap;
use plisp::io::OutFrame;
use plisp::symbol::{sym, SymbolTable};
use plisp::{Config, ErrorKind, LispError, Machine, PrimitiveTable, Value};

#[fixture]
fn machine() -> Machine {
    Machine::new(Config {
        seed: Some(7),
        ..Config::default()
    })
    .unwrap()
}

fn show(m: &mut Machine, src: &str) -> String {
    let v = m.eval_str(src).unwrap();
    m.print_string(v)
}

#[rstest]
#[case("0")]
#[case("-17")]
#[case("123456789")]
fn numbers_evaluate_to_themselves(mut machine: Machine, #[case] src: &str) {
    assert_eq!(show(&mut machine, src), src);
}

#[rstest]
#[case("(+ 1 2 3)", "6")]
#[case("(let X 3 (* X X))", "9")]
#[case("(de fact (N) (if (=0 N) 1 (* N (fact (dec N))))) (fact 10)", "3628800")]
#[case("(mapcar '((X) (* X 10)) (1 2 3))", "(10 20 30)")]
#[case("(make (for I 3 (link I)))", "(1 2 3)")]
#[case("(sort (3 1 2))", "(1 2 3)")]
#[case("(catch 'done (for I 10 (when (= I 4) (throw 'done I))))", "4")]
#[case("(pack \"ab\" 'c 12)", "\"abc12\"")]
fn programs_evaluate(mut machine: Machine, #[case] src: &str, #[case] expected: &str) {
    assert_eq!(show(&mut machine, src), expected);
}

#[test]
fn bindings_restore_in_reverse_order() {
    let mut symbols = SymbolTable::new();
    let mut stack = BindStack::new();
    let x = symbols.intern("X");
    symbols.set_value(x, Value::boxed(1));

    let outer = stack.bind(&mut symbols, x, Value::boxed(2));
    let inner = stack.bind(&mut symbols, x, Value::boxed(3));
    assert_eq!(symbols.value(x), Value::boxed(3));
    stack.unbind(&mut symbols, inner);
    assert_eq!(symbols.value(x), Value::boxed(2));
    stack.unbind(&mut symbols, outer);
    assert_eq!(symbols.value(x), Value::boxed(1));
    assert_eq!(stack.depth(), 0);
}

#[rstest]
fn throw_unwinds_to_the_matching_catch(mut machine: Machine) {
    let m = &mut machine;
    let (a, b, c) = (m.intern("A"), m.intern("B"), m.intern("C"));
    let outer = m.intern("outer");
    let inner = m.intern("inner");
    let mut inner_returned = false;

    let v = m
        .catch(Some(outer), Value::NIL, |m| {
            m.catch(Some(inner), Value::NIL, |m| {
                let v = m.eval_str("(let (A 10 B 20) (bind '((C . 30)) (throw 'outer 'done)))")?;
                inner_returned = true;
                Ok(v)
            })
        })
        .unwrap();

    assert_eq!(m.print_string(v), "done");
    assert!(!inner_returned);
    for s in [a, b, c] {
        assert!(m.val(s).is_nil());
    }
    assert_eq!(m.catch_depth(), 0);
}

#[rstest]
fn errors_are_caught_by_message(mut machine: Machine) {
    assert_eq!(show(&mut machine, "(catch '(NIL) (apply '+ 5))"), "\"List expected\"");
    assert_eq!(show(&mut machine, "(catch '(\"Div\") (/ 1 0))"), "\"Div\"");
    assert_eq!(show(&mut machine, "*Msg"), "\"Div/0\"");
    let err = machine.eval_str("(catch '(\"Undefined\") (+ 1 'x))").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NumExpected));
}

#[rstest]
fn throw_without_a_catch_is_an_error(mut machine: Machine) {
    let err = machine.eval_str("(throw 'nowhere 1)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::TagNotFound));
    assert_eq!(machine.catch_depth(), 0);
}

#[rstest]
fn circular_lists_have_length_t_and_print_finitely(mut machine: Machine) {
    assert_eq!(show(&mut machine, "(length (circ 1 2 3))"), "T");
    assert_eq!(show(&mut machine, "(circ 1 2 3)"), "(1 2 3 .)");
}

fn add2(m: &mut Machine, ex: Value) -> plisp::Result<Value> {
    let x = m.cdr(ex);
    let a = m.arg_num(ex, x)?;
    let b = m.arg_num(ex, m.cdr(x))?;
    m.boxed(ex, a + b)
}

#[test]
fn host_primitives_are_installed_by_name() {
    let mut table = PrimitiveTable::builtin();
    table.register("add2", add2);
    let mut m = Machine::with_primitives(Config::default(), table).unwrap();
    assert_eq!(show(&mut m, "(add2 3 4)"), "7");
    assert_eq!(show(&mut m, "(apply 'add2 (20 22))"), "42");
    let err = m.eval_str("(add2 3 \"x\")").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NumExpected));
}

#[rstest]
#[case(1)]
#[case(8)]
#[case(64)]
fn heap_grows_once_past_a_full_segment(#[case] n: usize) {
    let mut heap = Heap::new(n, None).unwrap();
    let cells: Vec<Value> = (0..=n)
        .map(|i| heap.cons(Value::boxed(i as i64), Value::NIL).unwrap())
        .collect();
    let stats = heap.stats();
    assert_eq!(stats.growths, 1);
    assert_eq!(stats.total, 2 * n);
    let distinct: std::collections::HashSet<_> = cells.iter().collect();
    assert_eq!(distinct.len(), n + 1);
}

#[test]
fn heap_exhaustion_is_not_caught() {
    let mut m = Machine::new(Config {
        segment_cells: 64,
        max_segments: Some(1),
        ..Config::default()
    })
    .unwrap();
    let err = m
        .protect(|m| m.eval_str("(catch '(NIL) (make (loop (link 1))))"))
        .unwrap_err();
    assert!(matches!(err, LispError::HeapExhausted { .. }));
    assert!(err.is_fatal());
    assert_eq!(m.catch_depth(), 0);
}

#[rstest]
fn protect_restores_bindings_and_records_the_message(mut machine: Machine) {
    let m = &mut machine;
    let x = m.intern("X");
    m.eval_str("(setq X 1)").unwrap();
    let err = m.protect(|m| m.eval_str("(let X 2 (+ X 'a))")).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NumExpected));
    assert_eq!(m.val(x), Value::boxed(1));
    let msg = m.symbols.value(sym::MSG);
    assert_eq!(m.prin_string(msg), "Number expected");
    assert_eq!(m.describe(&err), "!? (+ X 'a)\na -- Number expected");
}

#[rstest]
fn finally_runs_on_the_way_out(mut machine: Machine) {
    let m = &mut machine;
    m.push_output(OutFrame::Buffer(Vec::new()));
    let err = m.eval_str("(finally (prin \"cleanup\") (prin \"body \") (quit \"stop\" 3))").unwrap_err();
    let out = m.pop_output().unwrap().into_text();
    assert_eq!(out, "body cleanup");
    assert_eq!(err.kind(), Some(ErrorKind::Quit));
    assert_eq!(m.describe(&err), "3 -- stop");
}

#[rstest]
fn deep_recursion_reports_stack_overflow() {
    let mut m = Machine::new(Config {
        max_depth: 50,
        ..Config::default()
    })
    .unwrap();
    let err = m.eval_str("(de f (N) (f (inc N))) (f 0)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::StackOverflow));
    assert_eq!(m.eval_str("(+ 1 1)").unwrap(), Value::boxed(2));
}

#[rstest]
fn default_config_recovers_from_runaway_recursion(mut machine: Machine) {
    let err = machine.eval_str("(de f (N) (f N)) (f 1)").unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::StackOverflow));
    assert_eq!(show(&mut machine, "(+ 1 1)"), "2");
}

#[rstest]
fn deeply_nested_source_is_a_read_error(mut machine: Machine) {
    let src = format!("'{}{}", "(".repeat(200_000), ")".repeat(200_000));
    let err = machine.eval_str(&src).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Read));
    assert_eq!(show(&mut machine, "(+ 1 2)"), "3");
}

#[rstest]
fn seeded_machines_draw_the_same_numbers() {
    let draw = || {
        let mut m = Machine::new(Config {
            seed: Some(42),
            ..Config::default()
        })
        .unwrap();
        let v = m.eval_str("(list (rand 1 100) (rand 1 100) (rand 1 100))").unwrap();
        m.print_string(v)
    };
    assert_eq!(draw(), draw());
}
