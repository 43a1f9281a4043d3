//! AST to bytecode compiler
//!
//! Lowers a parsed program into chunks. Each function body gets its own
//! chunk; the top-level declarations land in the script chunk, which ends
//! by calling `main`. Functions and classes are registered with the heap
//! the moment they are built so they predate any possible collection.

mod expr;
mod stmt;

use crate::ast::{FuncDecl, Program};
use crate::bytecode::{Chunk, Opcode};
use crate::diagnostic::Diagnostic;
use crate::heap::{Function, Heap, Obj, ObjRef};
use crate::value::Value;

/// A local variable slot: its name and the scope depth it was declared at
#[derive(Debug, Clone)]
struct Local {
    name: String,
    depth: usize,
}

/// Compiler state
pub struct Compiler<'h> {
    /// Object registry; compiled functions and classes are allocated here
    heap: &'h mut Heap,
    /// Chunk stack. The bottom entry is the script chunk; compiling a
    /// function body pushes a fresh chunk on top.
    chunks: Vec<Chunk>,
    /// Local variables, innermost last
    locals: Vec<Local>,
    /// Current scope depth (0 = global)
    scope_depth: usize,
    /// The class whose methods are being compiled, if any
    current_class: Option<ObjRef>,
    /// Whether the function being compiled is an `init` method
    in_initializer: bool,
    /// Line of the statement currently being lowered, for emission errors
    current_line: u32,
    /// Collected diagnostics
    diagnostics: Vec<Diagnostic>,
}

impl<'h> Compiler<'h> {
    /// Create a compiler that registers objects with the given heap
    pub fn new(heap: &'h mut Heap) -> Self {
        Self {
            heap,
            chunks: vec![Chunk::new()],
            locals: Vec::new(),
            scope_depth: 0,
            current_class: None,
            in_initializer: false,
            current_line: 0,
            diagnostics: Vec::new(),
        }
    }

    /// Compile a program into the script function
    ///
    /// The script chunk defines every global and then calls `main`.
    pub fn compile(&mut self, program: &Program) -> Result<ObjRef, Vec<Diagnostic>> {
        for decl in &program.decls {
            self.compile_stmt(decl);
        }

        // epilogue: invoke main and halt on its return
        let main = self.string_constant("main");
        self.emit(Opcode::GetGlobal);
        self.emit_u16(main);
        self.emit(Opcode::Call);
        self.emit_u8(0);
        self.emit(Opcode::Nil);
        self.emit(Opcode::Return);

        if !self.diagnostics.is_empty() {
            return Err(std::mem::take(&mut self.diagnostics));
        }

        let chunk = self.chunks.pop().expect("script chunk missing");
        Ok(self.heap.alloc(Obj::Function(Function {
            name: "script".to_string(),
            arity: 0,
            chunk,
        })))
    }

    /// Compile a function or method body into its own chunk
    ///
    /// Slot 0 of the new frame is named `this` for methods and after the
    /// function itself otherwise, which is what makes self-recursion work
    /// without a global lookup. The body block's scope is absorbed into
    /// the function scope so parameters are visible. No `Pop`s are emitted
    /// on exit: the locals live in the callee's frame, not the caller's.
    fn compile_function(&mut self, decl: &FuncDecl) -> ObjRef {
        self.scope_depth += 1;
        self.chunks.push(Chunk::new());
        let enclosing_locals = std::mem::take(&mut self.locals);
        let was_initializer = self.in_initializer;
        self.in_initializer = self.current_class.is_some() && decl.name == "init";

        let slot_zero = if self.current_class.is_some() {
            "this".to_string()
        } else {
            decl.name.clone()
        };
        self.add_local(slot_zero);
        for param in &decl.params {
            self.add_local(param.clone());
        }

        for stmt in &decl.body {
            self.compile_stmt(stmt);
        }

        // synthetic return: an initializer yields its receiver
        if self.in_initializer {
            self.emit(Opcode::GetLocal);
            self.emit_u16(0);
        } else {
            self.emit(Opcode::Nil);
        }
        self.emit(Opcode::Return);

        self.in_initializer = was_initializer;
        self.locals = enclosing_locals;
        self.scope_depth -= 1;

        let chunk = self.chunks.pop().expect("function chunk missing");
        self.heap.alloc(Obj::Function(Function {
            name: decl.name.clone(),
            arity: decl.params.len(),
            chunk,
        }))
    }

    // ── Scopes and locals ────────────────────────────────────────────────

    fn begin_scope(&mut self) {
        self.scope_depth += 1;
    }

    /// Close the current scope, popping its locals off the runtime stack
    fn end_scope(&mut self) {
        while self
            .locals
            .last()
            .is_some_and(|local| local.depth == self.scope_depth)
        {
            self.locals.pop();
            self.emit(Opcode::Pop);
        }
        self.scope_depth -= 1;
    }

    fn add_local(&mut self, name: String) {
        self.locals.push(Local {
            name,
            depth: self.scope_depth,
        });
    }

    /// Resolve a name against the locals, innermost first
    ///
    /// `None` means the name is global.
    fn resolve_local(&self, name: &str) -> Option<usize> {
        self.locals
            .iter()
            .rposition(|local| local.name == name)
    }

    // ── Emission helpers ─────────────────────────────────────────────────

    fn current(&mut self) -> &mut Chunk {
        self.chunks.last_mut().expect("no active chunk")
    }

    fn emit(&mut self, opcode: Opcode) {
        self.current().emit(opcode);
    }

    fn emit_u8(&mut self, byte: u8) {
        self.current().emit_u8(byte);
    }

    fn emit_u16(&mut self, value: u16) {
        self.current().emit_u16(value);
    }

    fn add_constant(&mut self, value: Value) -> u16 {
        self.current().add_constant(value)
    }

    fn string_constant(&mut self, name: &str) -> u16 {
        self.add_constant(Value::Str(name.to_string()))
    }

    /// Emit a jump with a placeholder operand, returning the operand offset
    fn emit_jump(&mut self, opcode: Opcode) -> usize {
        self.emit(opcode);
        let offset = self.current().current_offset();
        self.emit_u16(0xFFFF);
        offset
    }

    /// Back-patch a forward jump to land here
    fn patch_jump(&mut self, offset: usize) {
        if !self.current().patch_jump(offset) {
            let line = self.current_line;
            self.error(line, "Too much code to jump over.");
        }
    }

    /// Emit a backward jump to `loop_start`
    fn emit_loop(&mut self, loop_start: usize) {
        self.emit(Opcode::Loop);
        // +2 skips the operand itself
        let offset = self.current().current_offset() + 2 - loop_start;
        if offset > u16::MAX as usize {
            let line = self.current_line;
            self.error(line, "Loop body too large.");
            self.emit_u16(0);
            return;
        }
        self.emit_u16(offset as u16);
    }

    fn error(&mut self, line: u32, message: &str) {
        self.diagnostics.push(Diagnostic::error(message, line));
    }
}
