//! Bytecode disassembler
//!
//! Converts a chunk back to a human-readable listing for debugging and
//! tests.

use super::{Chunk, Opcode};
use crate::heap::Heap;
use std::fmt::Write;

/// Disassemble a whole chunk
///
/// # Format
/// ```text
/// === Constants ===
/// 0: 42
///
/// === Instructions ===
/// 0000  Constant 0
/// 0003  Print
/// ```
pub fn disassemble(chunk: &Chunk, heap: &Heap) -> String {
    let mut output = String::new();

    if !chunk.constants.is_empty() {
        writeln!(output, "=== Constants ===").unwrap();
        for (index, constant) in chunk.constants.iter().enumerate() {
            writeln!(output, "{}: {}", index, heap.format_value(constant)).unwrap();
        }
        writeln!(output).unwrap();
    }

    writeln!(output, "=== Instructions ===").unwrap();
    let mut offset = 0;
    while offset < chunk.code.len() {
        let line = disassemble_instruction(chunk, heap, &mut offset);
        writeln!(output, "{line}").unwrap();
    }

    output
}

/// Disassemble the instruction at `offset`, advancing past its operands
pub fn disassemble_instruction(chunk: &Chunk, heap: &Heap, offset: &mut usize) -> String {
    let start = *offset;
    let byte = chunk.code[start];
    *offset += 1;

    let opcode = match Opcode::try_from(byte) {
        Ok(opcode) => opcode,
        Err(_) => return format!("{start:04}  <invalid opcode: {byte:#04x}>"),
    };

    match opcode {
        Opcode::Nil
        | Opcode::True
        | Opcode::False
        | Opcode::Print
        | Opcode::Equal
        | Opcode::Greater
        | Opcode::Less
        | Opcode::Add
        | Opcode::Subtract
        | Opcode::Multiply
        | Opcode::Divide
        | Opcode::Not
        | Opcode::Negate
        | Opcode::Return
        | Opcode::Pop => format!("{start:04}  {opcode:?}"),

        // constant-pool operands render the referenced value
        Opcode::Constant
        | Opcode::GetGlobal
        | Opcode::SetGlobal
        | Opcode::GetProperty
        | Opcode::SetProperty
        | Opcode::DefineGlobal => {
            let index = read_u16(chunk, offset);
            let constant = heap.format_value(&chunk.constants[index as usize]);
            format!("{start:04}  {opcode:?} {index} ({constant})")
        }

        Opcode::GetLocal | Opcode::SetLocal => {
            let slot = read_u16(chunk, offset);
            format!("{start:04}  {opcode:?} {slot}")
        }

        Opcode::Call => {
            let arg_count = chunk.code[*offset];
            *offset += 1;
            format!("{start:04}  Call {arg_count}")
        }

        Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
            let jump = read_u16(chunk, offset) as usize;
            let target = *offset + jump;
            format!("{start:04}  {opcode:?} {jump} (-> {target:04})")
        }

        Opcode::Loop => {
            let jump = read_u16(chunk, offset) as usize;
            let target = *offset - jump;
            format!("{start:04}  Loop {jump} (-> {target:04})")
        }
    }
}

fn read_u16(chunk: &Chunk, offset: &mut usize) -> u16 {
    let value = chunk.read_u16(*offset);
    *offset += 2;
    value
}
