//! The six numbered end-to-end scenarios from the specification, run
//! through the public `oakscript` API, plus the container round-trip case.

use oakscript::{Container, OakVm, RuntimeError};
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

/// A `Write` sink that stays accessible after the VM that owns it is gone,
/// so a test can assert on the captured bytes.
#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.borrow().clone()).unwrap()
    }
}

fn run_capturing(source: &str) -> Result<String, RuntimeError> {
    let container = oakscript::compile(source).expect("compile should succeed");
    let buf = SharedBuf::default();
    let mut vm = OakVm::with_writer(container, Box::new(buf.clone())).unwrap();
    vm.run()?;
    Ok(buf.text())
}

fn lines(text: &str) -> Vec<&str> {
    text.lines().collect()
}

#[test]
fn scenario_1_arithmetic_precedence() {
    let out = run_capturing("print 1 + 2 * 3\n").unwrap();
    assert_eq!(lines(&out), vec!["7"]);
}

#[test]
fn scenario_2_while_loop_countdown() {
    let src = "x = 10\nwhile x > 0 do\n  print x\n  x = x - 1\nend\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(
        lines(&out),
        vec!["10", "9", "8", "7", "6", "5", "4", "3", "2", "1"]
    );
}

#[test]
fn scenario_3_for_loop() {
    let out = run_capturing("for i = 1 to 5 do print i end\n").unwrap();
    assert_eq!(lines(&out), vec!["1", "2", "3", "4", "5"]);
}

#[test]
fn scenario_4_recursive_factorial() {
    let src = "function f(n) if n <= 1 then return 1 else return n * f(n-1) end end\nprint f(5)\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["120"]);
}

#[test]
fn scenario_5_try_catch_division_by_zero() {
    let src = "try\n print 10 / 0\ncatch\n print \"caught\"\nend\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["caught"]);
}

#[test]
fn scenario_6_string_plus_int_coercion() {
    let out = run_capturing("print \"hi \" + 42\n").unwrap();
    assert_eq!(lines(&out), vec!["hi 42"]);
}

/// "A compiled container from scenario 4, written to disk and re-executed
/// via `runbytecode`, must print `120`."
#[test]
fn compiled_factorial_round_trips_through_disk() {
    let src = "function f(n) if n <= 1 then return 1 else return n * f(n-1) end end\nprint f(5)\n";
    let container = oakscript::compile(src).unwrap();
    let bytes = container.to_bytes();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("factorial.oakc");
    std::fs::write(&path, &bytes).unwrap();

    let loaded_bytes = std::fs::read(&path).unwrap();
    let loaded = Container::from_bytes(&loaded_bytes).unwrap();

    let buf = SharedBuf::default();
    let mut vm = OakVm::with_writer(loaded, Box::new(buf.clone())).unwrap();
    vm.run().unwrap();
    assert_eq!(lines(&buf.text()), vec!["120"]);
}

/// Determinism: running the same no-I/O source twice yields identical
/// output.
#[test]
fn determinism_across_two_runs() {
    let src = "for i = 1 to 20 do\n  if i % 3 == 0 then print i end\nend\n";
    let first = run_capturing(src).unwrap();
    let second = run_capturing(src).unwrap();
    assert_eq!(first, second);
}

/// `break` exits exactly the innermost loop; an outer loop keeps running.
#[test]
fn break_exits_only_the_innermost_loop() {
    let src = "for i = 1 to 3 do\n  for j = 1 to 3 do\n    if j == 2 then break end\n    print i * 10 + j\n  end\nend\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["11", "21", "31"]);
}

/// `continue` jumps back to the loop header rather than exiting it.
#[test]
fn continue_skips_to_next_iteration() {
    let src = "for i = 1 to 5 do\n  if i % 2 == 0 then continue end\n  print i\nend\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["1", "3", "5"]);
}

/// `finally` runs exactly once on the normal exit path, and the thrown
/// value is observable in `catch` even after a `finally` block runs.
#[test]
fn try_catch_finally_runs_finally_exactly_once() {
    let src = "try\n  throw \"boom\"\ncatch e\n  print \"caught: \" + e\nfinally\n  print \"cleanup\"\nend\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["caught: boom", "cleanup"]);
}

/// An uncaught error still runs an intervening `finally` before
/// propagating, and operand/call stacks are restored rather than left
/// imbalanced.
#[test]
fn uncaught_division_error_propagates_as_a_runtime_error() {
    let err = run_capturing("print 1 / 0\n").unwrap_err();
    assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
}

#[test]
fn switch_dispatches_to_the_matching_case_or_default() {
    let src = "function classify(n)\n  switch n\n  case 1\n    return \"one\"\n  case 2\n    return \"two\"\n  default\n    return \"other\"\n  end\nend\nprint classify(2)\nprint classify(9)\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["two", "other"]);
}

#[test]
fn for_in_range_iterates_half_open() {
    let out = run_capturing("for i in 1..5 do print i end\n").unwrap();
    assert_eq!(lines(&out), vec!["1", "2", "3", "4"]);
}

#[test]
fn ternary_expression_selects_a_branch() {
    let out = run_capturing("x = 3\nprint x > 0 ? \"pos\" : \"nonpos\"\n").unwrap();
    assert_eq!(lines(&out), vec!["pos"]);
}

#[test]
fn logical_and_or_short_circuit() {
    // `false and (throws)` must never evaluate its right operand.
    let src = "function boom()\n  throw \"should not run\"\nend\nprint false and boom()\nprint true or boom()\n";
    let out = run_capturing(src).unwrap();
    assert_eq!(lines(&out), vec!["false", "true"]);
}

#[test]
fn const_reassignment_is_a_compile_error() {
    let err = oakscript::compile("const x = 1\nx = 2\n").unwrap_err();
    assert!(format!("{err}").contains("const"));
}

#[test]
fn duplicate_const_declaration_is_a_compile_error() {
    let err = oakscript::compile("const x = 1\nconst x = 2\n").unwrap_err();
    assert!(format!("{err}").contains("const"));
}

#[test]
fn while_and_for_accept_an_omitted_do() {
    let out = run_capturing("x = 3\nwhile x > 0\n  print x\n  x = x - 1\nend\n").unwrap();
    assert_eq!(lines(&out), vec!["3", "2", "1"]);
    let out = run_capturing("for i = 1 to 3\n  print i\nend\n").unwrap();
    assert_eq!(lines(&out), vec!["1", "2", "3"]);
}

#[test]
fn break_outside_loop_is_a_compile_error() {
    let err = oakscript::compile("break\n").unwrap_err();
    assert!(format!("{err}").contains("break"));
}
