//! End-to-end scenarios: source in, stdout and result out

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use alien_runtime::{InterpretResult, Vm};
use rstest::rstest;

#[derive(Clone, Default)]
struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn run_program(source: &str) -> (InterpretResult, String) {
    let buffer = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(buffer.clone()));
    let result = vm.interpret(source);
    let output = String::from_utf8(buffer.0.borrow().clone()).unwrap();
    (result, output)
}

fn run_ok(source: &str) -> String {
    let (result, output) = run_program(source);
    assert_eq!(result, InterpretResult::Ok, "program failed; output: {output}");
    output
}

// ========== Arithmetic and printing ==========

#[test]
fn test_arith() {
    assert_eq!(run_ok("func main() { print 1 + 2 * 3; }"), "7\n");
}

#[rstest]
#[case("print 10 - 4;", "6\n")]
#[case("print 15 / 4;", "3.75\n")]
#[case("print -(2 + 3);", "-5\n")]
#[case("print 0.5 + 0.25;", "0.75\n")]
#[case("print \"ab\" + \"cd\";", "abcd\n")]
#[case("print 1 < 2;", "true\n")]
#[case("print 2 <= 1;", "false\n")]
#[case("print 3 > 2;", "true\n")]
#[case("print 3 >= 4;", "false\n")]
#[case("print !nil;", "true\n")]
#[case("print nil;", "nil\n")]
fn test_expression_output(#[case] stmt: &str, #[case] expected: &str) {
    let source = format!("func main() {{ {stmt} }}");
    assert_eq!(run_ok(&source), expected);
}

// ========== Equality ==========

#[rstest]
#[case("1 == 1", "true")]
#[case("1 == 2", "false")]
#[case("1 != 2", "true")]
#[case("nil == nil", "true")]
#[case("\"a\" == \"a\"", "true")]
#[case("\"a\" == \"b\"", "false")]
#[case("1 == \"1\"", "false")]
#[case("true == 1", "false")]
#[case("nil == false", "false")]
fn test_equality(#[case] expr: &str, #[case] expected: &str) {
    let source = format!("func main() {{ print {expr}; }}");
    assert_eq!(run_ok(&source), format!("{expected}\n"));
}

#[test]
fn test_instances_compare_by_identity() {
    let output = run_ok(
        "class C { }
         func main() {
             var a = C();
             var b = C();
             print a == b;
             print a == a;
         }",
    );
    assert_eq!(output, "false\ntrue\n");
}

// ========== Control flow ==========

#[test]
fn test_for_loop_sum() {
    let output = run_ok(
        "func main() {
             var s = 0;
             for (var i = 0; i < 5; i = i + 1) { s = s + i; }
             print s;
         }",
    );
    assert_eq!(output, "10\n");
}

#[test]
fn test_while_loop() {
    let output = run_ok(
        "func main() {
             var n = 3;
             while (n > 0) { print n; n = n - 1; }
         }",
    );
    assert_eq!(output, "3\n2\n1\n");
}

#[test]
fn test_if_else_branches() {
    let output = run_ok(
        "func main() {
             if (1 < 2) { print \"then\"; } else { print \"else\"; }
             if (1 > 2) { print \"then\"; } else { print \"else\"; }
             if (nil) { print \"unreachable\"; }
         }",
    );
    assert_eq!(output, "then\nelse\n");
}

#[test]
fn test_recursion() {
    let output = run_ok(
        "func fib(n) {
             if (n < 2) { return n; }
             return fib(n - 1) + fib(n - 2);
         }
         func main() { print fib(10); }",
    );
    assert_eq!(output, "55\n");
}

// ========== Short-circuit evaluation ==========

#[test]
fn test_short_circuit_skips_side_effects() {
    let output = run_ok(
        "var g = 0;
         func side() { g = g + 1; return true; }
         func main() {
             false and side();
             true or side();
             print g;
             true and side();
             false or side();
             print g;
         }",
    );
    assert_eq!(output, "0\n2\n");
}

#[rstest]
#[case("print 1 and 2;", "2\n")]
#[case("print nil and 2;", "nil\n")]
#[case("print 1 or 2;", "1\n")]
#[case("print false or \"x\";", "x\n")]
fn test_logical_yields_operand(#[case] stmt: &str, #[case] expected: &str) {
    let source = format!("func main() {{ {stmt} }}");
    assert_eq!(run_ok(&source), expected);
}

// ========== Variables and scope ==========

#[test]
fn test_assignment_is_an_expression() {
    let output = run_ok(
        "var a;
         var b;
         func main() { a = b = 3; print a; print b; }",
    );
    assert_eq!(output, "3\n3\n");
}

#[test]
fn test_shadowing() {
    let output = run_ok(
        "func main() {
             var x = 2;
             { var x = 3; print x; }
             print x;
         }",
    );
    assert_eq!(output, "3\n2\n");
}

#[test]
fn test_block_local_is_gone_after_block() {
    let (result, output) = run_program("func main() { { var a = 1; } print a; }");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert_eq!(output, "");
}

#[test]
fn test_global_reassignment_from_function() {
    let output = run_ok("var x = 1; func main() { x = x + 41; print x; }");
    assert_eq!(output, "42\n");
}

// ========== Classes and methods ==========

#[test]
fn test_class_with_this() {
    let output = run_ok(
        "class Counter {
             func init(x) { this.x = x; }
             func inc() { this.x = this.x + 1; }
         }
         func main() {
             var c = Counter(41);
             c.inc();
             print c.x;
         }",
    );
    assert_eq!(output, "42\n");
}

#[test]
fn test_bound_method() {
    let output = run_ok(
        "class G { func g() { return 7; } }
         func main() { var m = G().g; print m(); }",
    );
    assert_eq!(output, "7\n");
}

#[test]
fn test_init_returns_receiver_on_early_return() {
    let output = run_ok(
        "class P { func init() { this.x = 7; return; } }
         func main() { print P().x; }",
    );
    assert_eq!(output, "7\n");
}

#[test]
fn test_set_property_yields_value() {
    let output = run_ok(
        "class C { }
         func main() { var c = C(); print c.x = 5; print c.x; }",
    );
    assert_eq!(output, "5\n5\n");
}

#[test]
fn test_method_recursion_through_this() {
    let output = run_ok(
        "class T {
             func down(n) {
                 if (n > 0) { return this.down(n - 1); }
                 return n;
             }
         }
         func main() { print T().down(5); }",
    );
    assert_eq!(output, "0\n");
}

#[test]
fn test_print_object_forms() {
    let output = run_ok(
        "class C { }
         func f() { }
         func main() { print C; print C(); print f; }",
    );
    assert_eq!(output, "[class] C\n[instance] -> [class] C\n[func] f\n");
}

// ========== Runtime errors ==========

#[rstest]
#[case::add_mixed("func main() { print 1 + \"a\"; }")]
#[case::negate_string("func main() { print -\"a\"; }")]
#[case::compare_strings("func main() { print \"a\" < \"b\"; }")]
#[case::undefined_global("func main() { print missing; }")]
#[case::assign_undefined("func main() { missing = 1; }")]
#[case::arity_mismatch("func f(a) { } func main() { f(); }")]
#[case::call_non_callable("func main() { var x = 1; x(); }")]
#[case::property_on_number("func main() { var x = 1; print x.y; }")]
#[case::undefined_property("class C { } func main() { print C().missing; }")]
#[case::class_args_without_init("class C { } func main() { C(1); }")]
#[case::missing_main("var x = 1;")]
fn test_runtime_errors(#[case] source: &str) {
    let (result, output) = run_program(source);
    assert_eq!(result, InterpretResult::RuntimeError);
    assert_eq!(output, "", "no stdout expected before the error");
}

// ========== Stack discipline ==========

#[test]
fn test_stack_balanced_after_calls() {
    let buffer = SharedBuf::default();
    let mut vm = Vm::with_output(Box::new(buffer));
    let result = vm.interpret(
        "func twice(x) { return x + x; }
         func main() {
             var total = 0;
             for (var i = 0; i < 10; i = i + 1) { total = total + twice(i); }
             print total;
         }",
    );
    assert_eq!(result, InterpretResult::Ok);
    // only the script's return value remains
    assert_eq!(vm.stack_size(), 1);
    assert_eq!(vm.frame_depth(), 0);
}
