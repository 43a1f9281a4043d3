//! Compiler lowering checked through the disassembler

use alien_runtime::heap::{Heap, ObjRef};
use alien_runtime::{disassemble, Compiler, Lexer, Obj, Parser};
use pretty_assertions::assert_eq;

fn compile_source(source: &str) -> (ObjRef, Heap) {
    let (tokens, diagnostics) = Lexer::new(source).tokenize();
    assert!(diagnostics.is_empty(), "lex errors: {diagnostics:?}");
    let (program, diagnostics) = Parser::new(tokens).parse();
    assert!(diagnostics.is_empty(), "parse errors: {diagnostics:?}");
    let mut heap = Heap::new();
    let script = Compiler::new(&mut heap)
        .compile(&program)
        .expect("compile failed");
    (script, heap)
}

/// Find a compiled function by name in the script's constant pool
fn function_named(heap: &Heap, script: ObjRef, name: &str) -> ObjRef {
    heap.function(script)
        .chunk
        .constants
        .iter()
        .filter_map(|constant| constant.as_obj())
        .find(|&obj| matches!(heap.get(obj), Obj::Function(f) if f.name == name))
        .unwrap_or_else(|| panic!("no function named {name}"))
}

#[test]
fn test_if_lowering() {
    let (script, heap) = compile_source("func main() { if (true) { print 1; } }");
    let main = function_named(&heap, script, "main");
    let listing = disassemble(&heap.function(main).chunk, &heap);
    assert_eq!(
        listing,
        "=== Constants ===\n\
         0: 1\n\
         \n\
         === Instructions ===\n\
         0000  True\n\
         0001  JumpIfFalse 8 (-> 0012)\n\
         0004  Pop\n\
         0005  Constant 0 (1)\n\
         0008  Print\n\
         0009  Jump 1 (-> 0013)\n\
         0012  Pop\n\
         0013  Nil\n\
         0014  Return\n"
    );
}

#[test]
fn test_block_locals_lowering() {
    let (script, heap) =
        compile_source("func main() { var a = 1; { var b = a; print b; } print a; }");
    let main = function_named(&heap, script, "main");
    let listing = disassemble(&heap.function(main).chunk, &heap);
    // slot 0 is the function itself; `a` is slot 1, `b` slot 2, and the
    // block's local is popped on exit
    assert_eq!(
        listing,
        "=== Constants ===\n\
         0: 1\n\
         \n\
         === Instructions ===\n\
         0000  Constant 0 (1)\n\
         0003  GetLocal 1\n\
         0006  GetLocal 2\n\
         0009  Print\n\
         0010  Pop\n\
         0011  GetLocal 1\n\
         0014  Print\n\
         0015  Nil\n\
         0016  Return\n"
    );
}

#[test]
fn test_while_lowering_jumps_back_to_condition() {
    let (script, heap) = compile_source("func main() { while (false) { print 1; } }");
    let main = function_named(&heap, script, "main");
    let listing = disassemble(&heap.function(main).chunk, &heap);
    assert_eq!(
        listing,
        "=== Constants ===\n\
         0: 1\n\
         \n\
         === Instructions ===\n\
         0000  False\n\
         0001  JumpIfFalse 8 (-> 0012)\n\
         0004  Pop\n\
         0005  Constant 0 (1)\n\
         0008  Print\n\
         0009  Loop 12 (-> 0000)\n\
         0012  Pop\n\
         0013  Nil\n\
         0014  Return\n"
    );
}

#[test]
fn test_self_recursion_goes_through_slot_zero() {
    let (script, heap) = compile_source("func f() { return f; } func main() { }");
    let f = function_named(&heap, script, "f");
    let listing = disassemble(&heap.function(f).chunk, &heap);
    // the function finds itself in slot 0, not through a global
    assert!(listing.contains("GetLocal 0"));
    assert!(!listing.contains("GetGlobal"));
}

#[test]
fn test_method_this_is_slot_zero_and_params_follow() {
    let (script, heap) = compile_source(
        "class C { func set(v) { this.x = v; } } func main() { }",
    );
    let class = heap
        .function(script)
        .chunk
        .constants
        .iter()
        .filter_map(|constant| constant.as_obj())
        .find(|&obj| matches!(heap.get(obj), Obj::Class(_)))
        .expect("class constant missing");
    let Obj::Class(class) = heap.get(class) else {
        panic!("expected class")
    };
    let set = class.find_method("set").expect("method missing");
    let listing = disassemble(&heap.function(set).chunk, &heap);
    assert_eq!(
        listing,
        "=== Constants ===\n\
         0: x\n\
         \n\
         === Instructions ===\n\
         0000  GetLocal 0\n\
         0003  GetLocal 1\n\
         0006  SetProperty 0 (x)\n\
         0009  Pop\n\
         0010  Nil\n\
         0011  Return\n"
    );
}

#[test]
fn test_initializer_returns_slot_zero() {
    let (script, heap) = compile_source("class C { func init() { } } func main() { }");
    let class = heap
        .function(script)
        .chunk
        .constants
        .iter()
        .filter_map(|constant| constant.as_obj())
        .find(|&obj| matches!(heap.get(obj), Obj::Class(_)))
        .expect("class constant missing");
    let Obj::Class(class) = heap.get(class) else {
        panic!("expected class")
    };
    let init = class.find_method("init").expect("init missing");
    let listing = disassemble(&heap.function(init).chunk, &heap);
    assert_eq!(
        listing,
        "=== Instructions ===\n\
         0000  GetLocal 0\n\
         0003  Return\n"
    );
}

#[test]
fn test_global_access_compiles_to_named_lookup() {
    let (script, heap) = compile_source("var g = 1; func main() { print g; }");
    let main = function_named(&heap, script, "main");
    let listing = disassemble(&heap.function(main).chunk, &heap);
    assert!(listing.contains("GetGlobal 0 (g)"));
}
