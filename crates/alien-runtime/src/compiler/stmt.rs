//! Statement lowering

use super::Compiler;
use crate::ast::{ClassDecl, ForStmt, FuncDecl, IfStmt, ReturnStmt, Stmt, VarDecl, WhileStmt};
use crate::bytecode::Opcode;
use crate::heap::{Class, Obj};
use crate::value::Value;
use std::collections::HashMap;

impl Compiler<'_> {
    pub(super) fn compile_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Class(decl) => self.compile_class(decl),
            Stmt::Func(decl) => self.compile_func(decl),
            Stmt::Var(decl) => self.compile_var(decl),
            Stmt::Const(decl) => {
                self.error(decl.line, "const declarations are not supported.");
            }
            Stmt::Block(stmts) => self.compile_block(stmts),
            Stmt::If(stmt) => self.compile_if(stmt),
            Stmt::While(stmt) => self.compile_while(stmt),
            Stmt::For(stmt) => self.compile_for(stmt),
            Stmt::Print(expr) => {
                self.compile_expr(expr);
                self.emit(Opcode::Print);
            }
            Stmt::Return(stmt) => self.compile_return(stmt),
            Stmt::Expr(expr) => {
                self.compile_expr(expr);
                self.emit(Opcode::Pop);
            }
        }
    }

    fn compile_class(&mut self, decl: &ClassDecl) {
        self.current_line = decl.line;
        let class = self.heap.alloc(Obj::Class(Class {
            name: decl.name.clone(),
            methods: HashMap::new(),
        }));
        self.current_class = Some(class);
        for method in &decl.methods {
            let compiled = self.compile_function(method);
            match self.heap.get_mut(class) {
                Obj::Class(class) => class.add_method(method.name.clone(), compiled),
                other => unreachable!("method owner is not a class: {other:?}"),
            }
        }
        self.current_class = None;

        let index = self.add_constant(Value::Obj(class));
        self.emit(Opcode::Constant);
        self.emit_u16(index);
        let name = self.string_constant(&decl.name);
        self.emit(Opcode::DefineGlobal);
        self.emit_u16(name);
    }

    fn compile_func(&mut self, decl: &FuncDecl) {
        self.current_line = decl.line;
        let function = self.compile_function(decl);
        let index = self.add_constant(Value::Obj(function));
        self.emit(Opcode::Constant);
        self.emit_u16(index);
        let name = self.string_constant(&decl.name);
        self.emit(Opcode::DefineGlobal);
        self.emit_u16(name);
    }

    fn compile_var(&mut self, decl: &VarDecl) {
        self.current_line = decl.line;
        match &decl.initializer {
            Some(initializer) => self.compile_expr(initializer),
            None => self.emit(Opcode::Nil),
        }
        if self.scope_depth == 0 {
            let name = self.string_constant(&decl.name);
            self.emit(Opcode::DefineGlobal);
            self.emit_u16(name);
        } else {
            // the initializer's value stays in the slot the local names
            self.add_local(decl.name.clone());
        }
    }

    pub(super) fn compile_block(&mut self, stmts: &[Stmt]) {
        self.begin_scope();
        for stmt in stmts {
            self.compile_stmt(stmt);
        }
        self.end_scope();
    }

    fn compile_if(&mut self, stmt: &IfStmt) {
        self.current_line = stmt.line;
        self.compile_expr(&stmt.condition);
        let then_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit(Opcode::Pop);
        self.compile_block(&stmt.then_branch);
        let else_jump = self.emit_jump(Opcode::Jump);
        self.patch_jump(then_jump);
        self.emit(Opcode::Pop);
        if let Some(else_branch) = &stmt.else_branch {
            self.compile_block(else_branch);
        }
        self.patch_jump(else_jump);
    }

    fn compile_while(&mut self, stmt: &WhileStmt) {
        self.current_line = stmt.line;
        let loop_start = self.current().current_offset();
        self.compile_expr(&stmt.condition);
        let exit_jump = self.emit_jump(Opcode::JumpIfFalse);
        self.emit(Opcode::Pop);
        self.compile_block(&stmt.body);
        self.emit_loop(loop_start);
        self.patch_jump(exit_jump);
        self.emit(Opcode::Pop);
    }

    fn compile_for(&mut self, stmt: &ForStmt) {
        self.current_line = stmt.line;
        // the initializer gets its own scope
        self.begin_scope();
        if let Some(initializer) = &stmt.initializer {
            self.compile_stmt(initializer);
        }
        let loop_start = self.current().current_offset();
        let exit_jump = stmt.condition.as_ref().map(|condition| {
            self.compile_expr(condition);
            let exit = self.emit_jump(Opcode::JumpIfFalse);
            self.emit(Opcode::Pop);
            exit
        });
        self.compile_block(&stmt.body);
        if let Some(increment) = &stmt.increment {
            self.compile_expr(increment);
            self.emit(Opcode::Pop);
        }
        self.emit_loop(loop_start);
        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit(Opcode::Pop);
        }
        self.end_scope();
    }

    fn compile_return(&mut self, stmt: &ReturnStmt) {
        self.current_line = stmt.line;
        if self.in_initializer {
            if stmt.value.is_some() {
                self.error(stmt.line, "Cannot return a value from an initializer.");
            }
            // an early return from init still yields the receiver
            self.emit(Opcode::GetLocal);
            self.emit_u16(0);
        } else if let Some(value) = &stmt.value {
            self.compile_expr(value);
        } else {
            self.emit(Opcode::Nil);
        }
        self.emit(Opcode::Return);
    }
}
