//! Escape/lifetime analysis: a linear per-function walk with a scope stack
//! of freed-sets catching use-after-free, plus a conservative stack-size
//! estimate summing every branch's locals (not just the live path).

use cz_ast::{Block, Expr, FunctionDecl, Item, Module, Stmt, Type};
use cz_diagnostics::{Diagnostic, DiagnosticEngine, DiagnosticKind, Span};
use std::collections::HashSet;

const STACK_WARN_BYTES: u64 = 1024 * 1024;
const STACK_ERROR_BYTES: u64 = 2 * 1024 * 1024;

struct FreedStack {
    scopes: Vec<HashSet<String>>,
}

impl FreedStack {
    fn new() -> Self {
        Self { scopes: vec![HashSet::new()] }
    }

    fn push(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop(&mut self) {
        self.scopes.pop();
    }

    fn mark_freed(&mut self, name: &str) {
        if let Some(top) = self.scopes.last_mut() {
            top.insert(name.to_string());
        }
    }

    fn is_freed(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|s| s.contains(name))
    }
}

pub fn analyze_module(module: &Module, engine: &mut DiagnosticEngine, file: &str) {
    for item in &module.items {
        if let Item::Function(f) = item {
            if f.unsafe_body.is_some() {
                continue;
            }
            analyze_function(f, engine, file);
            check_stack_size(f, engine, file);
        }
    }
}

fn analyze_function(f: &FunctionDecl, engine: &mut DiagnosticEngine, file: &str) {
    let mut stack = FreedStack::new();
    walk_block(&f.body, &mut stack, engine, file);
}

fn walk_block(block: &Block, stack: &mut FreedStack, engine: &mut DiagnosticEngine, file: &str) {
    stack.push();
    for stmt in &block.statements {
        walk_stmt(stmt, stack, engine, file);
    }
    stack.pop();
}

fn walk_stmt(stmt: &Stmt, stack: &mut FreedStack, engine: &mut DiagnosticEngine, file: &str) {
    match stmt {
        Stmt::VarDecl { init, .. } => {
            if let Some(init) = init {
                walk_expr(init, stack, engine, file);
            }
        }
        Stmt::Assign { target, value, .. } | Stmt::CompoundAssign { target, value, .. } => {
            walk_expr(target, stack, engine, file);
            walk_expr(value, stack, engine, file);
        }
        Stmt::If { cond, then_block, elseif_arms, else_block, .. } => {
            walk_expr(cond, stack, engine, file);
            walk_block(then_block, stack, engine, file);
            for (arm_cond, arm_block) in elseif_arms {
                walk_expr(arm_cond, stack, engine, file);
                walk_block(arm_block, stack, engine, file);
            }
            if let Some(else_block) = else_block {
                walk_block(else_block, stack, engine, file);
            }
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, stack, engine, file);
            walk_block(body, stack, engine, file);
        }
        Stmt::ForIn { collection, body, .. } => {
            walk_expr(collection, stack, engine, file);
            walk_block(body, stack, engine, file);
        }
        Stmt::RepeatN { count, body, .. } => {
            walk_expr(count, stack, engine, file);
            walk_block(body, stack, engine, file);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                walk_expr(value, stack, engine, file);
            }
        }
        Stmt::Free { target, pos, .. } => {
            walk_expr(target, stack, engine, file);
            if let Expr::Identifier { name, .. } = target {
                if stack.is_freed(name) {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::UseAfterFree,
                        format!("`{name}` has already been freed"),
                        Span::new(file.to_string(), pos.line, pos.column, name.len()),
                    ));
                }
                stack.mark_freed(name);
            }
        }
        Stmt::Discard { value, .. } | Stmt::Expr { expr: value, .. } => {
            walk_expr(value, stack, engine, file);
        }
        Stmt::Assert { cond, message, .. } => {
            walk_expr(cond, stack, engine, file);
            if let Some(message) = message {
                walk_expr(message, stack, engine, file);
            }
        }
        Stmt::Log { args, .. } => {
            for arg in args {
                walk_expr(arg, stack, engine, file);
            }
        }
        Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Todo { .. } | Stmt::Fixme { .. } | Stmt::UnsafeBlock { .. } | Stmt::Run { .. } => {}
    }
}

fn walk_expr(expr: &Expr, stack: &FreedStack, engine: &mut DiagnosticEngine, file: &str) {
    match expr {
        Expr::Identifier { name, pos, .. } => {
            if stack.is_freed(name) {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::UseAfterFree,
                    format!("use of freed value `{name}`"),
                    Span::new(file.to_string(), pos.line, pos.column, name.len()),
                ));
            }
        }
        Expr::Field { receiver, .. } => walk_expr(receiver, stack, engine, file),
        Expr::Index { receiver, index, .. } => {
            walk_expr(receiver, stack, engine, file);
            walk_expr(index, stack, engine, file);
        }
        Expr::Slice { receiver, start, end, .. } => {
            walk_expr(receiver, stack, engine, file);
            if let Some(start) = start {
                walk_expr(start, stack, engine, file);
            }
            if let Some(end) = end {
                walk_expr(end, stack, engine, file);
            }
        }
        Expr::Unary { operand, .. } => walk_expr(operand, stack, engine, file),
        Expr::Binary { left, right, .. } => {
            walk_expr(left, stack, engine, file);
            walk_expr(right, stack, engine, file);
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, stack, engine, file);
            for arg in args {
                walk_expr(arg, stack, engine, file);
            }
        }
        Expr::MutArg { inner, .. } => walk_expr(inner, stack, engine, file),
        Expr::StaticMethodCall { args, .. } => {
            for arg in args {
                walk_expr(arg, stack, engine, file);
            }
        }
        Expr::MethodCall { receiver, args, .. } => {
            walk_expr(receiver, stack, engine, file);
            for arg in args {
                walk_expr(arg, stack, engine, file);
            }
        }
        Expr::StructLiteral { fields, .. } | Expr::NewHeap { fields, .. } => {
            for (_, value) in fields {
                walk_expr(value, stack, engine, file);
            }
        }
        Expr::ArrayLiteral { elements, .. } | Expr::NewArray { elements, .. } => {
            for e in elements {
                walk_expr(e, stack, engine, file);
            }
        }
        Expr::MapLiteral { entries, .. } | Expr::NewMap { entries, .. } => {
            for (k, v) in entries {
                walk_expr(k, stack, engine, file);
                walk_expr(v, stack, engine, file);
            }
        }
        Expr::PairLiteral { left, right, .. } => {
            walk_expr(left, stack, engine, file);
            walk_expr(right, stack, engine, file);
        }
        Expr::Cast { value, .. } | Expr::NullCheck { value, .. } | Expr::IsCheck { value, .. } | Expr::TypeOf { value, .. } | Expr::ImplicitCast { value, .. } => {
            walk_expr(value, stack, engine, file);
        }
        Expr::SafeCast { value, fallback, .. } => {
            walk_expr(value, stack, engine, file);
            walk_expr(fallback, stack, engine, file);
        }
        Expr::Clone { value, .. } => walk_expr(value, stack, engine, file),
        Expr::Literal { .. } | Expr::SizeOf { .. } | Expr::DirectiveExpr { .. } => {}
    }
}

/// Conservative upper bound: parameter sizes plus every local declared in
/// every branch of every `if`, since at runtime the compiler's stack frame
/// must accommodate the widest possible path, not just the one taken.
fn check_stack_size(f: &FunctionDecl, engine: &mut DiagnosticEngine, file: &str) {
    let mut total: u64 = f.params.iter().map(|p| type_size(&p.ty, &mut HashSet::new())).sum();
    total += block_size(&f.body);

    if total >= STACK_ERROR_BYTES {
        engine.emit(Diagnostic::new(
            DiagnosticKind::StackOverflow,
            format!("function `{}` may use {total} bytes of stack, exceeding the 2 MiB limit", f.name),
            Span::new(file.to_string(), f.pos.line, f.pos.column, f.name.len()),
        ));
    } else if total >= STACK_WARN_BYTES {
        engine.emit(Diagnostic::new(
            DiagnosticKind::StackWarning,
            format!("function `{}` may use {total} bytes of stack", f.name),
            Span::new(file.to_string(), f.pos.line, f.pos.column, f.name.len()),
        ));
    }
}

fn block_size(block: &Block) -> u64 {
    block.statements.iter().map(stmt_size).sum()
}

fn stmt_size(stmt: &Stmt) -> u64 {
    match stmt {
        Stmt::VarDecl { ty, .. } => type_size(ty, &mut HashSet::new()),
        Stmt::If { then_block, elseif_arms, else_block, .. } => {
            let mut total = block_size(then_block);
            for (_, arm_block) in elseif_arms {
                total += block_size(arm_block);
            }
            if let Some(else_block) = else_block {
                total += block_size(else_block);
            }
            total
        }
        Stmt::While { body, .. } | Stmt::RepeatN { body, .. } | Stmt::ForIn { body, .. } => block_size(body),
        _ => 0,
    }
}

/// `seen` guards against infinite recursion through a struct referencing
/// itself (directly or via a field chain); such a reference contributes 0,
/// matching an unknown named struct's fallback size.
fn type_size(ty: &Type, seen: &mut HashSet<String>) -> u64 {
    match ty {
        Type::Named(name) => match name.as_str() {
            "i8" | "u8" | "bool" => 1,
            "i16" | "u16" => 2,
            "i32" | "u32" | "f32" => 4,
            "i64" | "u64" | "f64" => 8,
            other => {
                if !seen.insert(other.to_string()) {
                    0
                } else {
                    8
                }
            }
        },
        Type::Pointer(_) | Type::Slice(_) | Type::Map(_, _) | Type::Varargs(_) | Type::Any => 8,
        Type::Nullable(inner) => type_size(inner, seen),
        Type::Array(inner, cz_ast::ArraySize::Literal(n)) => *n as u64 * type_size(inner, seen),
        Type::Array(_, cz_ast::ArraySize::Inferred) => 8,
        Type::Pair(l, r) => type_size(l, seen) + type_size(r, seen),
        Type::String => 24,
        Type::Void => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl_collector::collect;
    use cz_parser::Parser;

    fn analyze(src: &str) -> DiagnosticEngine {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        collect(&mut module, &mut engine, "t.cz");
        engine.drain();
        analyze_module(&module, &mut engine, "t.cz");
        engine
    }

    #[test]
    fn use_after_free_is_detected() {
        let engine = analyze("struct Foo { x: i32 }\nfn main() -> i32 { p: Foo* = new Foo { x: 1 }\n free p\n log p\n return 0 }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::UseAfterFree));
    }

    #[test]
    fn double_free_is_detected() {
        let engine = analyze("struct Foo { x: i32 }\nfn main() -> i32 { p: Foo* = new Foo { x: 1 }\n free p\n free p\n return 0 }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::UseAfterFree));
    }

    #[test]
    fn large_array_triggers_stack_warning() {
        let engine = analyze("fn f() -> void { big: i64[200000] = [1] }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::StackWarning || d.kind == DiagnosticKind::StackOverflow));
    }
}
