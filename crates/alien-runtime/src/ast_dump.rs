//! AST to JSON dumper
//!
//! Diagnostic back-end for the `alien-ast` tool. The root object is
//! `{"Program": [...]}`; node kinds outside the supported set render as
//! empty objects.

use crate::ast::{Expr, Program, Stmt};
use serde_json::{json, Value as Json};

/// Render a parsed program as a JSON tree
pub fn program_to_json(program: &Program) -> Json {
    let decls: Vec<Json> = program.decls.iter().map(stmt_to_json).collect();
    json!({ "Program": decls })
}

fn stmt_to_json(stmt: &Stmt) -> Json {
    match stmt {
        Stmt::Func(decl) => json!({
            "Func": {
                "name": decl.name,
                "parameters": decl.params,
                "body": block_to_json(&decl.body),
            }
        }),
        Stmt::Var(decl) => match &decl.initializer {
            Some(initializer) => json!({
                "Var": { "name": decl.name, "initializer": expr_to_json(initializer) }
            }),
            None => json!({ "Var": { "name": decl.name } }),
        },
        Stmt::Block(stmts) => block_to_json(stmts),
        Stmt::If(stmt) => {
            let mut node = json!({
                "condition": expr_to_json(&stmt.condition),
                "then": block_to_json(&stmt.then_branch),
            });
            if let Some(else_branch) = &stmt.else_branch {
                node["else"] = block_to_json(else_branch);
            }
            json!({ "If": node })
        }
        Stmt::While(stmt) => json!({
            "While": {
                "condition": expr_to_json(&stmt.condition),
                "body": block_to_json(&stmt.body),
            }
        }),
        Stmt::Return(stmt) => match &stmt.value {
            Some(value) => json!({ "Return": expr_to_json(value) }),
            None => json!({ "Return": {} }),
        },
        Stmt::Expr(expr) => json!({ "Exprstmt": expr_to_json(expr) }),
        // not emitted by this dumper
        Stmt::Class(_) | Stmt::Const(_) | Stmt::For(_) | Stmt::Print(_) => json!({}),
    }
}

fn block_to_json(stmts: &[Stmt]) -> Json {
    let stmts: Vec<Json> = stmts.iter().map(stmt_to_json).collect();
    json!({ "Block": stmts })
}

fn expr_to_json(expr: &Expr) -> Json {
    match expr {
        Expr::Assign { name, value, .. } => json!({
            "Assign": { "name": name, "value": expr_to_json(value) }
        }),
        Expr::Binary { left, op, right } => json!({
            "Binary": {
                "left": expr_to_json(left),
                "operator": op.symbol(),
                "right": expr_to_json(right),
            }
        }),
        Expr::Logical { left, op, right } => json!({
            "Logical": {
                "left": expr_to_json(left),
                "operator": op.symbol(),
                "right": expr_to_json(right),
            }
        }),
        Expr::Unary { op, operand } => json!({
            "Unary": { "operator": op.symbol(), "right": expr_to_json(operand) }
        }),
        Expr::Call { callee, args, .. } => {
            let args: Vec<Json> = args.iter().map(expr_to_json).collect();
            json!({ "Call": { "callee": expr_to_json(callee), "arguments": args } })
        }
        Expr::Grouping(inner) => json!({ "Grouping": expr_to_json(inner) }),
        Expr::Variable { name } => json!({ "Variable": { "name": name } }),
        Expr::Number(value) => json!({ "Number": value }),
        Expr::Str(value) => json!({ "String": value }),
        Expr::Bool(true) => json!({ "Literal": "true" }),
        Expr::Bool(false) => json!({ "Literal": "false" }),
        Expr::Nil => json!({ "Literal": "nil" }),
        // not emitted by this dumper
        Expr::Get { .. } | Expr::Set { .. } | Expr::This => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn dump(source: &str) -> Json {
        let (tokens, diagnostics) = Lexer::new(source).tokenize();
        assert!(diagnostics.is_empty());
        let (program, diagnostics) = Parser::new(tokens).parse();
        assert!(diagnostics.is_empty(), "parse failed: {diagnostics:?}");
        program_to_json(&program)
    }

    #[test]
    fn test_program_root() {
        let json = dump("var x = 1;");
        assert!(json["Program"].is_array());
        assert_eq!(json["Program"][0]["Var"]["name"], "x");
        assert_eq!(json["Program"][0]["Var"]["initializer"]["Number"], 1.0);
    }

    #[test]
    fn test_function_shape() {
        let json = dump("func add(a, b) { return a + b; }");
        let func = &json["Program"][0]["Func"];
        assert_eq!(func["name"], "add");
        assert_eq!(func["parameters"], json!(["a", "b"]));
        let ret = &func["body"]["Block"][0]["Return"];
        assert_eq!(ret["Binary"]["operator"], "+");
        assert_eq!(ret["Binary"]["left"]["Variable"]["name"], "a");
    }

    #[test]
    fn test_literals_and_logical() {
        let json = dump("func main() { var ok = true and nil; }");
        let body = &json["Program"][0]["Func"]["body"]["Block"];
        let logical = &body[0]["Var"]["initializer"]["Logical"];
        assert_eq!(logical["operator"], "and");
        assert_eq!(logical["left"]["Literal"], "true");
        assert_eq!(logical["right"]["Literal"], "nil");
    }
}
