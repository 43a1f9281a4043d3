//! Expression lowering
//!
//! Standard postfix emission: operands first, operator last. An
//! expression's code always leaves exactly one value on the stack.

use super::Compiler;
use crate::ast::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::bytecode::Opcode;
use crate::value::Value;

impl Compiler<'_> {
    pub(super) fn compile_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(value) => {
                let index = self.add_constant(Value::Number(*value));
                self.emit(Opcode::Constant);
                self.emit_u16(index);
            }
            Expr::Str(value) => {
                let index = self.add_constant(Value::Str(value.clone()));
                self.emit(Opcode::Constant);
                self.emit_u16(index);
            }
            Expr::Bool(true) => self.emit(Opcode::True),
            Expr::Bool(false) => self.emit(Opcode::False),
            Expr::Nil => self.emit(Opcode::Nil),
            Expr::This => {
                // the receiver sits in slot 0 of the frame
                self.emit(Opcode::GetLocal);
                self.emit_u16(0);
            }
            Expr::Grouping(inner) => self.compile_expr(inner),
            Expr::Unary { op, operand } => {
                self.compile_expr(operand);
                self.emit(match op {
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::Negate => Opcode::Negate,
                });
            }
            Expr::Binary { left, op, right } => {
                self.compile_expr(left);
                self.compile_expr(right);
                self.compile_binary_op(*op);
            }
            Expr::Logical { left, op, right } => self.compile_logical(*op, left, right),
            Expr::Variable { name } => match self.resolve_local(name) {
                Some(slot) => {
                    self.emit(Opcode::GetLocal);
                    self.emit_u16(slot as u16);
                }
                None => {
                    let index = self.string_constant(name);
                    self.emit(Opcode::GetGlobal);
                    self.emit_u16(index);
                }
            },
            Expr::Assign { name, line, value } => {
                self.current_line = *line;
                let slot = self.resolve_local(name);
                self.compile_expr(value);
                match slot {
                    Some(slot) => {
                        self.emit(Opcode::SetLocal);
                        self.emit_u16(slot as u16);
                    }
                    None => {
                        let index = self.string_constant(name);
                        self.emit(Opcode::SetGlobal);
                        self.emit_u16(index);
                    }
                }
            }
            Expr::Get { object, name } => {
                self.compile_expr(object);
                let index = self.string_constant(name);
                self.emit(Opcode::GetProperty);
                self.emit_u16(index);
            }
            Expr::Set {
                object,
                name,
                value,
            } => {
                self.compile_expr(object);
                self.compile_expr(value);
                let index = self.string_constant(name);
                self.emit(Opcode::SetProperty);
                self.emit_u16(index);
            }
            Expr::Call { callee, line, args } => {
                self.current_line = *line;
                self.compile_expr(callee);
                for arg in args {
                    self.compile_expr(arg);
                }
                if args.len() > u8::MAX as usize {
                    self.error(*line, "Cannot have more than 255 arguments.");
                }
                self.emit(Opcode::Call);
                self.emit_u8(args.len().min(u8::MAX as usize) as u8);
            }
        }
    }

    /// `>=` and `<=` have no opcode of their own; they negate the
    /// complementary comparison.
    fn compile_binary_op(&mut self, op: BinaryOp) {
        match op {
            BinaryOp::Add => self.emit(Opcode::Add),
            BinaryOp::Subtract => self.emit(Opcode::Subtract),
            BinaryOp::Multiply => self.emit(Opcode::Multiply),
            BinaryOp::Divide => self.emit(Opcode::Divide),
            BinaryOp::Equal => self.emit(Opcode::Equal),
            BinaryOp::NotEqual => {
                self.emit(Opcode::Equal);
                self.emit(Opcode::Not);
            }
            BinaryOp::Greater => self.emit(Opcode::Greater),
            BinaryOp::GreaterEqual => {
                self.emit(Opcode::Less);
                self.emit(Opcode::Not);
            }
            BinaryOp::Less => self.emit(Opcode::Less),
            BinaryOp::LessEqual => {
                self.emit(Opcode::Greater);
                self.emit(Opcode::Not);
            }
        }
    }

    /// Short-circuit lowering. The left value is left on the stack across
    /// the jump; when the right side runs it replaces the left value, so
    /// the unconsumed operand becomes the expression's result.
    fn compile_logical(&mut self, op: LogicalOp, left: &Expr, right: &Expr) {
        self.compile_expr(left);
        let jump = self.emit_jump(match op {
            LogicalOp::And => Opcode::JumpIfFalse,
            LogicalOp::Or => Opcode::JumpIfTrue,
        });
        self.emit(Opcode::Pop);
        self.compile_expr(right);
        self.patch_jump(jump);
    }
}
