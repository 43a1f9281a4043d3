//! Stack-based virtual machine
//!
//! Executes chunks with a value stack and call frames. The collector gets
//! a chance to run before every instruction; roots are the stack, the
//! global table, and the function of every active frame.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::bytecode::{disassemble_instruction, Opcode};
use crate::compiler::Compiler;
use crate::heap::{BoundMethod, Heap, Instance, Obj, ObjRef};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::value::{RuntimeError, Value};

/// Outcome of interpreting one source program
///
/// Only the first-hit category is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpretResult {
    Ok,
    ParseError,
    CompileError,
    RuntimeError,
}

/// Record of a single active invocation
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// The function being executed
    function: ObjRef,
    /// Stack offset of the frame's slot 0 (the callee or the receiver)
    stack_start: usize,
    /// Instruction pointer into the function's chunk
    ip: usize,
}

/// Virtual machine state
pub struct Vm {
    /// Operand stack
    stack: Vec<Value>,
    /// Call frames; the top entry is the running function
    frames: Vec<CallFrame>,
    /// Global variables
    globals: HashMap<String, Value>,
    /// Object registry and collector
    heap: Heap,
    /// Writer for `print` output (defaults to stdout)
    output: Box<dyn Write>,
    /// Dump the stack and the current instruction before each step
    trace: bool,
}

impl Vm {
    /// Create a VM that prints to stdout
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// Create a VM with a custom `print` writer
    ///
    /// Used by tests and embedders to capture program output.
    pub fn with_output(output: Box<dyn Write>) -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::new(),
            globals: HashMap::new(),
            heap: Heap::new(),
            output,
            trace: false,
        }
    }

    /// Enable or disable the execution trace on stderr
    pub fn set_trace(&mut self, trace: bool) {
        self.trace = trace;
    }

    /// Run a source program through the whole pipeline
    ///
    /// Diagnostics and runtime errors are written to stderr; the return
    /// value carries the first-hit error category.
    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        self.stack.clear();
        self.frames.clear();

        let (tokens, mut diagnostics) = Lexer::new(source).tokenize();
        let (program, parse_diagnostics) = Parser::new(tokens).parse();
        diagnostics.extend(parse_diagnostics);
        if !diagnostics.is_empty() {
            for diagnostic in &diagnostics {
                eprintln!("{diagnostic}");
            }
            return InterpretResult::ParseError;
        }

        let mut compiler = Compiler::new(&mut self.heap);
        let script = match compiler.compile(&program) {
            Ok(script) => script,
            Err(diagnostics) => {
                for diagnostic in &diagnostics {
                    eprintln!("{diagnostic}");
                }
                return InterpretResult::CompileError;
            }
        };

        self.stack.push(Value::Obj(script));
        self.frames.push(CallFrame {
            function: script,
            stack_start: 0,
            ip: 0,
        });

        match self.run() {
            Ok(()) => InterpretResult::Ok,
            Err(error) => {
                eprintln!("{error}");
                InterpretResult::RuntimeError
            }
        }
    }

    // ── Dispatch loop ────────────────────────────────────────────────────

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            self.collect_garbage();
            if self.trace {
                self.trace_instruction();
            }

            let byte = self.read_byte();
            let opcode = Opcode::try_from(byte).map_err(RuntimeError::UnknownOpcode)?;
            match opcode {
                Opcode::Nil => self.stack.push(Value::Nil),
                Opcode::True => self.stack.push(Value::Bool(true)),
                Opcode::False => self.stack.push(Value::Bool(false)),
                Opcode::Constant => {
                    let value = self.read_constant();
                    self.stack.push(value);
                }
                Opcode::Pop => {
                    self.pop();
                }
                Opcode::Print => {
                    let value = self.pop();
                    let text = self.heap.format_value(&value);
                    writeln!(self.output, "{text}")?;
                }
                Opcode::Not => {
                    let value = self.pop();
                    self.stack.push(Value::Bool(value.is_falsy()));
                }
                Opcode::Negate => {
                    let Value::Number(n) = self.peek(0) else {
                        return Err(RuntimeError::NegateNonNumber);
                    };
                    let n = *n;
                    self.pop();
                    self.stack.push(Value::Number(-n));
                }
                Opcode::Add => {
                    if matches!(self.peek(1), Value::Number(_))
                        && matches!(self.peek(0), Value::Number(_))
                    {
                        let (a, b) = self.pop_number_pair();
                        self.stack.push(Value::Number(a + b));
                    } else if matches!(self.peek(1), Value::Str(_))
                        && matches!(self.peek(0), Value::Str(_))
                    {
                        let Value::Str(b) = self.pop() else {
                            unreachable!("operand kind changed under us")
                        };
                        let Value::Str(a) = self.pop() else {
                            unreachable!("operand kind changed under us")
                        };
                        self.stack.push(Value::Str(a + &b));
                    } else {
                        return Err(RuntimeError::AddOperands);
                    }
                }
                Opcode::Subtract => self.binary_number_op("-", |a, b| Value::Number(a - b))?,
                Opcode::Multiply => self.binary_number_op("*", |a, b| Value::Number(a * b))?,
                Opcode::Divide => self.binary_number_op("/", |a, b| Value::Number(a / b))?,
                Opcode::Greater => self.binary_number_op(">", |a, b| Value::Bool(a > b))?,
                Opcode::Less => self.binary_number_op("<", |a, b| Value::Bool(a < b))?,
                Opcode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a == b));
                }
                Opcode::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip += offset;
                }
                Opcode::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    // the condition is left on the stack for the branch to pop
                    if self.peek(0).is_falsy() {
                        self.frame_mut().ip += offset;
                    }
                }
                Opcode::JumpIfTrue => {
                    let offset = self.read_u16() as usize;
                    if !self.peek(0).is_falsy() {
                        self.frame_mut().ip += offset;
                    }
                }
                Opcode::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frame_mut().ip -= offset;
                }
                Opcode::Call => {
                    let arg_count = self.read_byte() as usize;
                    let callee = self.peek(arg_count).clone();
                    self.call_value(callee, arg_count)?;
                }
                Opcode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("return with no active frame");
                    self.stack.truncate(frame.stack_start);
                    self.stack.push(result);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                }
                Opcode::GetLocal => {
                    let slot = self.read_u16() as usize;
                    let index = self.frame().stack_start + slot;
                    let value = self.stack[index].clone();
                    self.stack.push(value);
                }
                Opcode::SetLocal => {
                    let slot = self.read_u16() as usize;
                    let index = self.frame().stack_start + slot;
                    // assignment is an expression, so the value stays put
                    let value = self.peek(0).clone();
                    self.stack[index] = value;
                }
                Opcode::GetGlobal => {
                    let name = self.read_string_constant();
                    match self.globals.get(&name) {
                        Some(value) => {
                            let value = value.clone();
                            self.stack.push(value);
                        }
                        None => return Err(RuntimeError::UndefinedVariable(name)),
                    }
                }
                Opcode::SetGlobal => {
                    let name = self.read_string_constant();
                    if !self.globals.contains_key(&name) {
                        return Err(RuntimeError::UndefinedVariable(name));
                    }
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                }
                Opcode::DefineGlobal => {
                    let name = self.read_string_constant();
                    let value = self.peek(0).clone();
                    self.globals.insert(name, value);
                    self.pop();
                }
                Opcode::GetProperty => self.get_property()?,
                Opcode::SetProperty => self.set_property()?,
            }
        }
    }

    // ── Calls ────────────────────────────────────────────────────────────

    /// Dispatch `CALL` by the callee's object kind
    fn call_value(&mut self, callee: Value, arg_count: usize) -> Result<(), RuntimeError> {
        let Value::Obj(obj) = callee else {
            return Err(RuntimeError::NotCallable);
        };
        match self.heap.get(obj) {
            Obj::Function(_) => self.call(obj, arg_count),
            Obj::Class(class) => {
                let init = class.find_method("init");
                let instance = self.heap.alloc(Obj::Instance(Instance {
                    class: obj,
                    fields: HashMap::new(),
                }));
                // the class on the stack becomes the callee frame's slot 0,
                // which is where `this` and the implicit init return live
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = Value::Obj(instance);
                match init {
                    Some(init) => self.call(init, arg_count),
                    None if arg_count != 0 => Err(RuntimeError::ArityMismatch {
                        expected: 0,
                        got: arg_count,
                    }),
                    None => Ok(()),
                }
            }
            Obj::BoundMethod(bound) => {
                let method = bound.method;
                let receiver = bound.receiver.clone();
                let slot = self.stack.len() - arg_count - 1;
                self.stack[slot] = receiver;
                self.call(method, arg_count)
            }
            Obj::Instance(_) => Err(RuntimeError::NotCallable),
        }
    }

    /// Push a frame for a function call
    fn call(&mut self, function: ObjRef, arg_count: usize) -> Result<(), RuntimeError> {
        let arity = self.heap.function(function).arity;
        if arity != arg_count {
            return Err(RuntimeError::ArityMismatch {
                expected: arity,
                got: arg_count,
            });
        }
        self.frames.push(CallFrame {
            function,
            stack_start: self.stack.len() - arg_count - 1,
            ip: 0,
        });
        Ok(())
    }

    // ── Properties ───────────────────────────────────────────────────────

    /// Field lookup first; a miss binds a method over the receiver
    fn get_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string_constant();
        let Value::Obj(obj) = self.peek(0) else {
            return Err(RuntimeError::NotAnInstance);
        };
        let obj = *obj;
        let (field, class) = match self.heap.get(obj) {
            Obj::Instance(instance) => (instance.fields.get(&name).cloned(), instance.class),
            _ => return Err(RuntimeError::NotAnInstance),
        };

        if let Some(field) = field {
            self.pop();
            self.stack.push(field);
            return Ok(());
        }

        let method = match self.heap.get(class) {
            Obj::Class(class) => class.find_method(&name),
            other => unreachable!("instance class handle is not a class: {other:?}"),
        };
        let Some(method) = method else {
            return Err(RuntimeError::UndefinedProperty(name));
        };
        let bound = self.heap.alloc(Obj::BoundMethod(BoundMethod {
            method,
            receiver: Value::Obj(obj),
        }));
        self.pop();
        self.stack.push(Value::Obj(bound));
        Ok(())
    }

    fn set_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string_constant();
        let Value::Obj(obj) = self.peek(1) else {
            return Err(RuntimeError::NotAnInstance);
        };
        let obj = *obj;
        if !matches!(self.heap.get(obj), Obj::Instance(_)) {
            return Err(RuntimeError::NotAnInstance);
        }
        let value = self.pop();
        self.pop();
        match self.heap.get_mut(obj) {
            Obj::Instance(instance) => {
                instance.fields.insert(name, value.clone());
            }
            other => unreachable!("checked instance changed kind: {other:?}"),
        }
        // a set expression yields the assigned value
        self.stack.push(value);
        Ok(())
    }

    // ── Garbage collection ───────────────────────────────────────────────

    fn collect_garbage(&mut self) {
        if !self.heap.should_collect() {
            return;
        }
        let mut roots: Vec<ObjRef> = Vec::new();
        roots.extend(self.stack.iter().filter_map(Value::as_obj));
        roots.extend(self.globals.values().filter_map(Value::as_obj));
        roots.extend(self.frames.iter().map(|frame| frame.function));
        self.heap.collect(roots);
    }

    // ── Frame and stack plumbing ─────────────────────────────────────────

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active frame")
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        self.frames.last_mut().expect("no active frame")
    }

    fn read_byte(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("no active frame");
        let function = self.heap.function(frame.function);
        let byte = function.chunk.code[frame.ip];
        frame.ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_u16() as usize;
        let frame = self.frame();
        self.heap.function(frame.function).chunk.constants[index].clone()
    }

    /// Read a constant the compiler guarantees to be a name
    fn read_string_constant(&mut self) -> String {
        match self.read_constant() {
            Value::Str(name) => name,
            other => panic!("name constant is not a string: {other:?}"),
        }
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    fn peek(&self, depth: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - depth]
    }

    /// Pop two number operands; the caller has already checked the kinds
    fn pop_number_pair(&mut self) -> (f64, f64) {
        let Value::Number(b) = self.pop() else {
            unreachable!("operand kind changed under us")
        };
        let Value::Number(a) = self.pop() else {
            unreachable!("operand kind changed under us")
        };
        (a, b)
    }

    fn binary_number_op<F>(&mut self, op: &'static str, apply: F) -> Result<(), RuntimeError>
    where
        F: FnOnce(f64, f64) -> Value,
    {
        if !matches!(self.peek(0), Value::Number(_)) || !matches!(self.peek(1), Value::Number(_)) {
            return Err(RuntimeError::NumberOperands(op));
        }
        let (a, b) = self.pop_number_pair();
        self.stack.push(apply(a, b));
        Ok(())
    }

    fn trace_instruction(&mut self) {
        let mut stack_line = String::new();
        for value in &self.stack {
            stack_line.push('[');
            stack_line.push_str(&self.heap.format_value(value));
            stack_line.push(']');
        }
        eprintln!("{stack_line}");
        let frame = self.frame();
        let function = self.heap.function(frame.function);
        let mut offset = frame.ip;
        eprintln!(
            "{}",
            disassemble_instruction(&function.chunk, &self.heap, &mut offset)
        );
    }

    // ── Inspection ───────────────────────────────────────────────────────

    /// Current value-stack depth
    pub fn stack_size(&self) -> usize {
        self.stack.len()
    }

    /// Number of active call frames
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// Look up a global by name
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// The VM's heap, for rendering values and checking object counts
    pub fn heap(&self) -> &Heap {
        &self.heap
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared byte buffer standing in for stdout
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

    #[test]
    fn test_arithmetic_precedence() {
        let (result, output) = run_program("func main() { print 1 + 2 * 3; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "7\n");
    }

    #[test]
    fn test_grouping_overrides_precedence() {
        let (result, output) = run_program("func main() { print (1 + 2) * 3; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "9\n");
    }

    #[test]
    fn test_unary_and_comparison() {
        let (result, output) = run_program("func main() { print !(1 > 2); print -3; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "true\n-3\n");
    }

    #[test]
    fn test_globals_define_and_assign() {
        let (result, output) =
            run_program("var x = 1; func main() { x = x + 41; print x; }");
        assert_eq!(result, InterpretResult::Ok);
        assert_eq!(output, "42\n");
    }

    #[test]
    fn test_missing_main_is_runtime_error() {
        let (result, output) = run_program("var x = 1;");
        assert_eq!(result, InterpretResult::RuntimeError);
        assert_eq!(output, "");
    }

    #[test]
    fn test_stack_is_level_after_run() {
        let buffer = SharedBuf::default();
        let mut vm = Vm::with_output(Box::new(buffer));
        let result = vm.interpret("func main() { var a = 1; a = a + 1; print a; }");
        assert_eq!(result, InterpretResult::Ok);
        // the script frame's return leaves exactly its result
        assert_eq!(vm.stack_size(), 1);
        assert_eq!(vm.frame_depth(), 0);
    }

    #[test]
    fn test_parse_error_result() {
        let (result, _) = run_program("func main( { }");
        assert_eq!(result, InterpretResult::ParseError);
    }

    #[test]
    fn test_compile_error_result() {
        let (result, _) =
            run_program("class C { func init() { return 1; } } func main() { }");
        assert_eq!(result, InterpretResult::CompileError);
    }
}
