//! Type checker: two-pass scope-stack walk of every function body. Performs
//! name resolution, type compatibility, mutability, exhaustive-return and
//! interface-conformance checking, and overload resolution.

use crate::decl_collector::{type_tag, DeclTable, GLOBAL_RECEIVER};
use cz_ast::{BinOp, Block, CompoundOp, Expr, FunctionDecl, Item, Literal, Module, Param, Stmt, Type};
use cz_diagnostics::{Diagnostic, DiagnosticEngine, DiagnosticKind, Span};
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Binding {
    ty: Type,
    mutable: bool,
}

struct Scope {
    bindings: HashMap<String, Binding>,
}

struct TypeEnv<'a> {
    scopes: Vec<Scope>,
    loop_depth: u32,
    table: &'a DeclTable,
    file: String,
    inferred: HashMap<cz_ast::NodeId, Type>,
    return_type: Type,
}

impl<'a> TypeEnv<'a> {
    fn new(table: &'a DeclTable, file: String) -> Self {
        Self {
            scopes: vec![Scope { bindings: HashMap::new() }],
            loop_depth: 0,
            table,
            file,
            inferred: HashMap::new(),
            return_type: Type::Void,
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope { bindings: HashMap::new() });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str, ty: Type, mutable: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.bindings.insert(name.to_string(), Binding { ty, mutable });
        }
    }

    fn lookup(&self, name: &str) -> Option<&Binding> {
        self.scopes.iter().rev().find_map(|scope| scope.bindings.get(name))
    }
}

/// A per-module output of type checking: every expression's inferred type,
/// keyed by node id, for the code generator to consult.
pub struct TypeCheckResult {
    pub inferred: HashMap<cz_ast::NodeId, Type>,
}

pub fn check_module(module: &Module, table: &DeclTable, engine: &mut DiagnosticEngine, file: &str) -> TypeCheckResult {
    check_interface_conformance(table, engine, file);
    check_main_signature(module, engine, file);

    let mut inferred = HashMap::new();
    for item in &module.items {
        if let Item::Function(f) = item {
            if f.unsafe_body.is_some() {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::UnsafeCFunction,
                    format!("function `{}` has a raw `#unsafe` body", f.name),
                    Span::new(file.to_string(), f.pos.line, f.pos.column, f.name.len()),
                ));
                continue;
            }
            let mut env = TypeEnv::new(table, file.to_string());
            check_function(f, &mut env, engine);
            inferred.extend(env.inferred);
        }
    }
    TypeCheckResult { inferred }
}

fn check_function(f: &FunctionDecl, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine) {
    if f.receiver.is_some() && matches!(f.name.as_str(), "init" | "fini") && !f.params.is_empty() {
        engine.emit(Diagnostic::new(
            DiagnosticKind::MismatchedSignature,
            format!("`{}` may only take `self`, found {} additional parameter(s)", f.name, f.params.len()),
            Span::new(env.file.clone(), f.pos.line, f.pos.column, f.name.len()),
        ));
    }
    env.return_type = f.return_type.clone();
    env.push_scope();
    if let Some(receiver) = &f.receiver {
        env.declare("self", receiver.clone(), false);
    }
    for p in &f.params {
        env.declare(&p.name, p.ty.clone(), p.mutable);
    }
    check_block(&f.body, env, engine);

    if !matches!(f.return_type, Type::Void) && !block_always_returns(&f.body) {
        engine.emit(Diagnostic::new(
            DiagnosticKind::MissingReturn,
            format!("function `{}` does not return on every path", f.name),
            Span::new(env.file.clone(), f.pos.line, f.pos.column, f.name.len()),
        ));
    }
    env.pop_scope();
}

/// Structural exhaustive-return check: a terminating `if` counts only when
/// every branch, including an explicit `else`, returns. `while`/`for`/`repeat`
/// never count since their bodies may not execute.
fn block_always_returns(block: &Block) -> bool {
    block.statements.iter().any(stmt_always_returns)
}

fn stmt_always_returns(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } => true,
        Stmt::If { then_block, elseif_arms, else_block, .. } => {
            let Some(else_block) = else_block else { return false };
            block_always_returns(then_block)
                && elseif_arms.iter().all(|(_, b)| block_always_returns(b))
                && block_always_returns(else_block)
        }
        _ => false,
    }
}

fn check_block(block: &Block, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine) {
    env.push_scope();
    for stmt in &block.statements {
        check_stmt(stmt, env, engine);
    }
    env.pop_scope();
}

fn check_stmt(stmt: &Stmt, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine) {
    match stmt {
        Stmt::VarDecl { name, ty, mutable, init, pos, .. } => {
            if let Some(init_expr) = init {
                let init_ty = infer(init_expr, env, engine);
                if !compatible(env.table, ty, &init_ty) {
                    engine.emit(type_mismatch(env, *pos, ty, &init_ty));
                }
            }
            env.declare(name, ty.clone(), *mutable);
        }
        Stmt::Assign { target, value, pos, .. } => {
            let value_ty = infer(value, env, engine);
            let target_ty = infer(target, env, engine);
            if let Expr::Identifier { name, .. } = target {
                match env.lookup(name) {
                    Some(binding) if !binding.mutable => {
                        engine.emit(Diagnostic::new(
                            DiagnosticKind::MutabilityViolation,
                            format!("cannot assign to immutable binding `{name}`"),
                            Span::new(env.file.clone(), pos.line, pos.column, name.len()),
                        ));
                    }
                    None => {
                        engine.emit(Diagnostic::new(
                            DiagnosticKind::UndeclaredIdentifier,
                            format!("undeclared identifier `{name}`"),
                            Span::new(env.file.clone(), pos.line, pos.column, name.len()),
                        ));
                    }
                    _ => {}
                }
            }
            if !compatible(env.table, &target_ty, &value_ty) {
                engine.emit(type_mismatch(env, *pos, &target_ty, &value_ty));
            }
        }
        Stmt::CompoundAssign { target, op, value, pos, .. } => {
            let target_ty = infer(target, env, engine);
            let value_ty = infer(value, env, engine);
            check_compound_op(*op, &target_ty, &value_ty, env, *pos, engine);
        }
        Stmt::If { cond, then_block, elseif_arms, else_block, pos, .. } => {
            require_bool(cond, env, engine, *pos);
            check_block(then_block, env, engine);
            for (arm_cond, arm_block) in elseif_arms {
                require_bool(arm_cond, env, engine, *pos);
                check_block(arm_block, env, engine);
            }
            if let Some(else_block) = else_block {
                check_block(else_block, env, engine);
            }
        }
        Stmt::While { cond, body, pos, .. } => {
            require_bool(cond, env, engine, *pos);
            env.loop_depth += 1;
            check_block(body, env, engine);
            env.loop_depth -= 1;
        }
        Stmt::ForIn { item, mutable, collection, body, pos, .. } => {
            let collection_ty = infer(collection, env, engine);
            let element = match &collection_ty {
                Type::Array(inner, _) => Some((*inner.clone(), true)),
                Type::Slice(inner) | Type::Varargs(inner) => Some((*inner.clone(), false)),
                _ => {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        "for-in collection must be an array, slice or varargs".to_string(),
                        Span::new(env.file.clone(), pos.line, pos.column, 1),
                    ));
                    None
                }
            };
            if let Some((elem_ty, allows_mut)) = element {
                if *mutable && !allows_mut {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::MutabilityViolation,
                        "only array-backed for-in items may be declared `mut`".to_string(),
                        Span::new(env.file.clone(), pos.line, pos.column, 1),
                    ));
                }
                env.push_scope();
                env.declare(item, elem_ty, *mutable);
                for stmt in &body.statements {
                    check_stmt(stmt, env, engine);
                }
                env.pop_scope();
            } else {
                check_block(body, env, engine);
            }
        }
        Stmt::RepeatN { count, body, pos, .. } => {
            let ty = infer(count, env, engine);
            if !is_integer(&ty) {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "repeat count must be an integer type".to_string(),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            }
            env.loop_depth += 1;
            check_block(body, env, engine);
            env.loop_depth -= 1;
        }
        Stmt::Break { level, pos, .. } | Stmt::Continue { level, pos, .. } => {
            if env.loop_depth == 0 {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::Parse,
                    "break/continue outside of a loop".to_string(),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            } else if *level > env.loop_depth {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::Parse,
                    format!("break/continue level {level} exceeds loop nesting depth {}", env.loop_depth),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            }
        }
        Stmt::Return { value, pos, .. } => {
            if let Some(value) = value {
                let value_ty = infer(value, env, engine);
                if is_stack_address(value) {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::ReturnStackReference,
                        "cannot return the address of a stack-local value".to_string(),
                        Span::new(env.file.clone(), pos.line, pos.column, 1),
                    ));
                }
                if matches!(env.return_type, Type::Void) {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::VoidFunctionReturnsValue,
                        "void function returns a value".to_string(),
                        Span::new(env.file.clone(), pos.line, pos.column, 1),
                    ));
                } else if !compatible(env.table, &env.return_type, &value_ty) {
                    engine.emit(type_mismatch(env, *pos, &env.return_type.clone(), &value_ty));
                }
            }
        }
        Stmt::Free { target, .. } => {
            infer(target, env, engine);
        }
        Stmt::Discard { value, .. } | Stmt::Expr { expr: value, .. } => {
            infer(value, env, engine);
        }
        Stmt::Assert { cond, message, pos, .. } => {
            require_bool(cond, env, engine, *pos);
            if let Some(message) = message {
                infer(message, env, engine);
            }
        }
        Stmt::Log { args, .. } => {
            for arg in args {
                infer(arg, env, engine);
            }
        }
        Stmt::Todo { .. } | Stmt::Fixme { .. } | Stmt::UnsafeBlock { .. } | Stmt::Run { .. } => {}
    }
}

fn require_bool(expr: &Expr, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine, pos: cz_ast::Position) {
    let ty = infer(expr, env, engine);
    if !matches!(ty, Type::Named(ref n) if n == "bool") {
        engine.emit(Diagnostic::new(
            DiagnosticKind::TypeMismatch,
            "condition must be of type `bool`".to_string(),
            Span::new(env.file.clone(), pos.line, pos.column, 1),
        ));
    }
}

fn check_compound_op(
    op: CompoundOp,
    target_ty: &Type,
    value_ty: &Type,
    env: &TypeEnv<'_>,
    pos: cz_ast::Position,
    engine: &mut DiagnosticEngine,
) {
    if target_ty.is_pointer_like() {
        engine.emit(Diagnostic::new(
            DiagnosticKind::PointerArithmeticForbidden,
            format!("compound assignment `{op:?}=` is not permitted on a pointer"),
            Span::new(env.file.clone(), pos.line, pos.column, 1),
        ));
        return;
    }
    if !compatible(env.table, target_ty, value_ty) {
        engine.emit(type_mismatch(env, pos, target_ty, value_ty));
    }
}

fn is_stack_address(expr: &Expr) -> bool {
    matches!(expr, Expr::Unary { op: cz_ast::UnaryOp::Ref, operand, .. } if matches!(**operand, Expr::Identifier { .. }))
}

fn is_integer(ty: &Type) -> bool {
    matches!(ty, Type::Named(name) if matches!(name.as_str(), "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64"))
}

fn is_float(ty: &Type) -> bool {
    matches!(ty, Type::Named(name) if matches!(name.as_str(), "f32" | "f64"))
}

fn is_numeric(ty: &Type) -> bool {
    is_integer(ty) || is_float(ty)
}

fn is_bool(ty: &Type) -> bool {
    matches!(ty, Type::Named(name) if name == "bool")
}

/// Deep structural compatibility per the type-compatibility rules: reflexive
/// on named types, element-wise on pointer/nullable/array/slice/map, `null`
/// compatible with any pointer-like or struct type — but not a bare
/// primitive named type, which `DeclTable` distinguishes from a struct name.
fn compatible(table: &DeclTable, target: &Type, source: &Type) -> bool {
    match (target, source) {
        (a, b) if a == b => true,
        (_, Type::Nullable(inner)) if matches!(**inner, Type::Void) => {
            target.is_pointer_like() || matches!(target, Type::Named(name) if table.structs.contains_key(name))
        }
        (Type::Nullable(a), Type::Nullable(b)) | (Type::Pointer(a), Type::Pointer(b)) => compatible(table, a, b),
        (Type::Nullable(a), Type::Pointer(b)) => compatible(table, a, b),
        (Type::Array(a, sa), Type::Array(b, sb)) => sa == sb && compatible(table, a, b),
        (Type::Slice(a), Type::Slice(b)) => compatible(table, a, b),
        (Type::Map(ka, va), Type::Map(kb, vb)) => compatible(table, ka, kb) && compatible(table, va, vb),
        (Type::Pair(la, ra), Type::Pair(lb, rb)) => compatible(table, la, lb) && compatible(table, ra, rb),
        (a, b) if is_numeric(a) && is_numeric(b) => numeric_widens(a, b),
        _ => false,
    }
}

/// Implicit widening: signs agree and target size >= source size. Literal
/// fit-in-range widening is handled at the call site via `Literal::Int`.
fn numeric_widens(target: &Type, source: &Type) -> bool {
    let (Type::Named(t), Type::Named(s)) = (target, source) else { return false };
    let rank = |n: &str| match n {
        "i8" | "u8" => 1,
        "i16" | "u16" => 2,
        "i32" | "u32" | "f32" => 4,
        "i64" | "u64" | "f64" => 8,
        _ => 0,
    };
    let signed = |n: &str| n.starts_with('i') || n.starts_with('f');
    signed(t) == signed(s) && rank(t) >= rank(s)
}

fn type_mismatch(env: &TypeEnv<'_>, pos: cz_ast::Position, expected: &Type, found: &Type) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::TypeMismatch,
        format!("expected `{}`, found `{}`", type_tag(expected), type_tag(found)),
        Span::new(env.file.clone(), pos.line, pos.column, 1),
    )
}

fn infer(expr: &Expr, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine) -> Type {
    let ty = infer_inner(expr, env, engine);
    env.inferred.insert(expr.id(), ty.clone());
    ty
}

fn infer_inner(expr: &Expr, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine) -> Type {
    match expr {
        Expr::Literal { value, .. } => literal_type(value),
        Expr::Identifier { name, pos, .. } => match env.lookup(name) {
            Some(binding) => binding.ty.clone(),
            None => {
                let candidates: Vec<String> = env.scopes.iter().flat_map(|s| s.bindings.keys().cloned()).collect();
                let suggestions = cz_diagnostics::fuzzy::find_similar_names(name, &candidates, 1);
                let mut diag = Diagnostic::new(
                    DiagnosticKind::UndeclaredIdentifier,
                    format!("undeclared identifier `{name}`"),
                    Span::new(env.file.clone(), pos.line, pos.column, name.len()),
                );
                if let Some(s) = suggestions.first() {
                    diag = diag.with_help(format!("did you mean `{s}`?"));
                }
                engine.emit(diag);
                Type::Any
            }
        },
        Expr::Field { receiver, name, pos, .. } => {
            let recv_ty = infer(receiver, env, engine);
            field_type(env, &recv_ty, name, *pos, engine)
        }
        Expr::Index { receiver, index, pos, .. } => {
            let recv_ty = infer(receiver, env, engine);
            let index_ty = infer(index, env, engine);
            if !is_integer(&index_ty) {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "index must be an integer type".to_string(),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            }
            check_literal_bounds(&recv_ty, index, env, *pos, engine);
            match &recv_ty {
                Type::Array(inner, _) | Type::Slice(inner) | Type::Varargs(inner) => *inner.clone(),
                _ => {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::TypeMismatch,
                        "indexed expression must be an array, slice or varargs".to_string(),
                        Span::new(env.file.clone(), pos.line, pos.column, 1),
                    ));
                    Type::Any
                }
            }
        }
        Expr::Slice { receiver, .. } => infer(receiver, env, engine),
        Expr::Unary { op, operand, pos, .. } => {
            let ty = infer(operand, env, engine);
            match op {
                cz_ast::UnaryOp::Neg | cz_ast::UnaryOp::BitNot => ty,
                cz_ast::UnaryOp::Not => {
                    if !is_bool(&ty) {
                        engine.emit(Diagnostic::new(
                            DiagnosticKind::TypeMismatch,
                            "`!` requires a `bool` operand".to_string(),
                            Span::new(env.file.clone(), pos.line, pos.column, 1),
                        ));
                    }
                    Type::Named("bool".to_string())
                }
                cz_ast::UnaryOp::Ref => Type::Pointer(Box::new(ty)),
                cz_ast::UnaryOp::Deref => ty.inner().cloned().unwrap_or(Type::Any),
            }
        }
        Expr::Binary { op, left, right, pos, .. } => check_binary(*op, left, right, *pos, env, engine),
        Expr::Call { callee, args, .. } => {
            for arg in args {
                infer(arg, env, engine);
            }
            match &**callee {
                Expr::Identifier { name, pos, .. } => resolve_call(env, GLOBAL_RECEIVER, name, args, *pos, engine),
                _ => {
                    infer(callee, env, engine);
                    Type::Any
                }
            }
        }
        Expr::MutArg { inner, .. } => infer(inner, env, engine),
        Expr::StaticMethodCall { type_name, method, args, pos, .. } => {
            for arg in args {
                infer(arg, env, engine);
            }
            resolve_call(env, type_name, method, args, *pos, engine)
        }
        Expr::MethodCall { receiver, method, args, pos, .. } => {
            let recv_ty = infer(receiver, env, engine);
            for arg in args {
                infer(arg, env, engine);
            }
            resolve_call(env, &type_tag(&recv_ty), method, args, *pos, engine)
        }
        Expr::StructLiteral { type_name, fields, pos, .. } => {
            for (_, value) in fields {
                infer(value, env, engine);
            }
            match env.table.structs.get(type_name) {
                Some(_) => Type::Named(type_name.clone()),
                None => {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::UndefinedStruct,
                        format!("undefined struct `{type_name}`"),
                        Span::new(env.file.clone(), pos.line, pos.column, type_name.len()),
                    ));
                    Type::Any
                }
            }
        }
        Expr::ArrayLiteral { elements, .. } => {
            let element_ty = elements.first().map(|e| infer(e, env, engine)).unwrap_or(Type::Any);
            for e in elements.iter().skip(1) {
                infer(e, env, engine);
            }
            Type::Array(Box::new(element_ty), cz_ast::ArraySize::Inferred)
        }
        Expr::MapLiteral { entries, .. } => {
            let (k, v) = entries
                .first()
                .map(|(k, v)| (infer(k, env, engine), infer(v, env, engine)))
                .unwrap_or((Type::Any, Type::Any));
            Type::Map(Box::new(k), Box::new(v))
        }
        Expr::PairLiteral { left, right, .. } => {
            Type::Pair(Box::new(infer(left, env, engine)), Box::new(infer(right, env, engine)))
        }
        Expr::NewHeap { type_name, fields, .. } => {
            for (_, value) in fields {
                infer(value, env, engine);
            }
            Type::Pointer(Box::new(Type::Named(type_name.clone())))
        }
        Expr::NewArray { elements, .. } => {
            let element_ty = elements.first().map(|e| infer(e, env, engine)).unwrap_or(Type::Any);
            for e in elements.iter().skip(1) {
                infer(e, env, engine);
            }
            Type::Pointer(Box::new(Type::Array(Box::new(element_ty), cz_ast::ArraySize::Inferred)))
        }
        Expr::NewMap { key_type, value_type, entries, .. } => {
            for (k, v) in entries {
                infer(k, env, engine);
                infer(v, env, engine);
            }
            Type::Pointer(Box::new(Type::Map(Box::new(key_type.clone()), Box::new(value_type.clone()))))
        }
        Expr::Cast { target, value, .. } => {
            infer(value, env, engine);
            target.clone()
        }
        Expr::SafeCast { target, value, fallback, .. } => {
            infer(value, env, engine);
            infer(fallback, env, engine);
            target.clone()
        }
        Expr::Clone { type_hint, value, .. } => {
            let inner = type_hint.clone().unwrap_or_else(|| infer(value, env, engine));
            Type::Pointer(Box::new(inner))
        }
        Expr::NullCheck { value, .. } => infer(value, env, engine).inner().cloned().unwrap_or(Type::Any),
        Expr::IsCheck { value, .. } => {
            infer(value, env, engine);
            Type::Named("bool".to_string())
        }
        Expr::TypeOf { value, .. } => {
            infer(value, env, engine);
            Type::String
        }
        Expr::SizeOf { .. } => Type::Named("u64".to_string()),
        Expr::DirectiveExpr { directive, .. } => match directive {
            cz_ast::Directive::Line => Type::Named("i32".to_string()),
            cz_ast::Directive::Debug => Type::Named("bool".to_string()),
            _ => Type::String,
        },
        Expr::ImplicitCast { target, .. } => target.clone(),
    }
}

fn literal_type(value: &Literal) -> Type {
    match value {
        Literal::Int(_) => Type::Named("i32".to_string()),
        Literal::Float(_) => Type::Named("f64".to_string()),
        Literal::Str(_) => Type::String,
        Literal::Bool(_) => Type::Named("bool".to_string()),
        Literal::Null => Type::Nullable(Box::new(Type::Void)),
        Literal::Char(_) => Type::Named("u8".to_string()),
    }
}

fn field_type(env: &mut TypeEnv<'_>, recv_ty: &Type, name: &str, pos: cz_ast::Position, engine: &mut DiagnosticEngine) -> Type {
    let struct_name = match recv_ty {
        Type::Named(n) => n.clone(),
        Type::Pointer(inner) | Type::Nullable(inner) => match &**inner {
            Type::Named(n) => n.clone(),
            _ => return Type::Any,
        },
        _ => return Type::Any,
    };
    match env.table.structs.get(&struct_name) {
        Some(decl) => match decl.fields.iter().find(|f| f.name == name) {
            Some(field) => field.ty.clone(),
            None => {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::FieldNotFound,
                    format!("struct `{struct_name}` has no field `{name}`"),
                    Span::new(env.file.clone(), pos.line, pos.column, name.len()),
                ));
                Type::Any
            }
        },
        None => Type::Any,
    }
}

fn check_literal_bounds(recv_ty: &Type, index: &Expr, env: &TypeEnv<'_>, pos: cz_ast::Position, engine: &mut DiagnosticEngine) {
    if let (Type::Array(_, cz_ast::ArraySize::Literal(size)), Expr::Literal { value: Literal::Int(i), .. }) = (recv_ty, index) {
        if *i < 0 || *i as usize >= *size {
            engine.emit(Diagnostic::new(
                DiagnosticKind::ArrayIndexOutOfBounds,
                format!("index {i} is out of bounds for array of size {size}"),
                Span::new(env.file.clone(), pos.line, pos.column, 1),
            ));
        }
    }
}

fn check_binary(op: BinOp, left: &Expr, right: &Expr, pos: cz_ast::Position, env: &mut TypeEnv<'_>, engine: &mut DiagnosticEngine) -> Type {
    let lt = infer(left, env, engine);
    let rt = infer(right, env, engine);

    if matches!(op, BinOp::Add | BinOp::Sub) && (lt.is_pointer_like() || rt.is_pointer_like()) {
        let both_pointers = lt.is_pointer_like() && rt.is_pointer_like();
        let one_numeric = (lt.is_pointer_like() && is_numeric(&rt)) || (rt.is_pointer_like() && is_numeric(&lt));
        if both_pointers || one_numeric {
            engine.emit(Diagnostic::new(
                DiagnosticKind::PointerArithmeticForbidden,
                "pointer arithmetic is forbidden".to_string(),
                Span::new(env.file.clone(), pos.line, pos.column, 1),
            ));
            return Type::Any;
        }
    }

    if matches!(op, BinOp::Div | BinOp::Mod) {
        if let Expr::Literal { value: Literal::Int(0), .. } = right {
            engine.emit(Diagnostic::new(
                DiagnosticKind::DivisionByZero,
                "division by the literal 0".to_string(),
                Span::new(env.file.clone(), pos.line, pos.column, 1),
            ));
        }
    }

    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            if !is_numeric(&lt) || !is_numeric(&rt) {
                engine.emit(type_mismatch(env, pos, &lt, &rt));
            }
            lt
        }
        BinOp::Eq | BinOp::Ne => {
            if disjoint_family(&lt, &rt) {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "comparison between unrelated type families".to_string(),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            }
            Type::Named("bool".to_string())
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            if !is_numeric(&lt) || !is_numeric(&rt) {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "ordering comparison requires numeric operands".to_string(),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            }
            Type::Named("bool".to_string())
        }
        BinOp::And | BinOp::Or => {
            if !is_bool(&lt) || !is_bool(&rt) {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::TypeMismatch,
                    "logical operator requires `bool` operands".to_string(),
                    Span::new(env.file.clone(), pos.line, pos.column, 1),
                ));
            }
            Type::Named("bool".to_string())
        }
    }
}

fn disjoint_family(a: &Type, b: &Type) -> bool {
    let family = |t: &Type| -> u8 {
        if is_numeric(t) {
            0
        } else if is_bool(t) {
            1
        } else if t.is_pointer_like() {
            2
        } else {
            3
        }
    };
    family(a) != family(b) && family(a) != 3 && family(b) != 3
}

/// Resolves a call to one overload: exact signature match first, a lone
/// survivor as fallback, otherwise ambiguous.
fn resolve_call(
    env: &mut TypeEnv<'_>,
    receiver: &str,
    name: &str,
    args: &[Expr],
    pos: cz_ast::Position,
    engine: &mut DiagnosticEngine,
) -> Type {
    let Some(overloads) = env.table.lookup_overloads(receiver, name) else {
        engine.emit(Diagnostic::new(
            DiagnosticKind::UndefinedFunction,
            format!("undefined function `{name}`"),
            Span::new(env.file.clone(), pos.line, pos.column, name.len()),
        ));
        return Type::Any;
    };

    let arg_tags: Vec<String> = args.iter().map(|a| env.inferred.get(&a.id()).map(type_tag).unwrap_or_default()).collect();
    let exact = overloads
        .iter()
        .find(|o| o.param_types.len() == arg_tags.len() && o.param_types.iter().map(type_tag).eq(arg_tags.iter().cloned()));

    let chosen = if let Some(exact) = exact {
        Some(exact)
    } else if overloads.len() == 1 {
        Some(&overloads[0])
    } else {
        None
    };

    match chosen {
        Some(sig) => {
            check_mut_arg_requirements(env, name, &sig.param_types.clone(), &sig.param_mutable.clone(), args, engine);
            sig.return_type.clone()
        }
        None => {
            engine.emit(Diagnostic::new(
                DiagnosticKind::AmbiguousOrUnmatchedOverload,
                format!("no overload of `{name}` matches the given arguments"),
                Span::new(env.file.clone(), pos.line, pos.column, name.len()),
            ));
            Type::Any
        }
    }
}

/// A parameter declared `mut T*` requires the call site to use the
/// `mut_arg` expression form (`mut expr`) for the corresponding argument.
fn check_mut_arg_requirements(
    env: &TypeEnv<'_>,
    name: &str,
    param_types: &[Type],
    param_mutable: &[bool],
    args: &[Expr],
    engine: &mut DiagnosticEngine,
) {
    for ((ty, mutable), arg) in param_types.iter().zip(param_mutable.iter()).zip(args.iter()) {
        if *mutable && ty.is_pointer_like() && !matches!(arg, Expr::MutArg { .. }) {
            let arg_pos = arg.pos();
            engine.emit(Diagnostic::new(
                DiagnosticKind::MutabilityViolation,
                format!("call to `{name}` requires `mut` on the argument for its `mut {}` parameter", type_tag(ty)),
                Span::new(env.file.clone(), arg_pos.line, arg_pos.column, 1),
            ));
        }
    }
}

/// A global `main` (no receiver) must take no parameters and return `i32`,
/// matching the signature `emit_main_wrapper` assumes when it calls
/// `main_main()` and returns its result as the process exit status. A file
/// with no `main` at all is valid (library/std modules never declare one).
fn check_main_signature(module: &Module, engine: &mut DiagnosticEngine, file: &str) {
    for item in &module.items {
        let Item::Function(f) = item else { continue };
        if f.name != "main" || f.receiver.is_some() {
            continue;
        }
        let valid = f.params.is_empty() && matches!(f.return_type, Type::Named(ref n) if n == "i32");
        if !valid {
            engine.emit(Diagnostic::new(
                DiagnosticKind::InvalidMainSignature,
                "`main` must take no parameters and return `i32`".to_string(),
                Span::new(file.to_string(), f.pos.line, f.pos.column, f.name.len()),
            ));
        }
    }
}

fn check_interface_conformance(table: &DeclTable, engine: &mut DiagnosticEngine, file: &str) {
    for (struct_name, s) in &table.structs {
        let Some(implements) = &s.implements else { continue };
        let Some(iface) = table.interfaces.get(implements) else {
            engine.emit(Diagnostic::new(
                DiagnosticKind::UndefinedStruct,
                format!("struct `{struct_name}` implements undefined interface `{implements}`"),
                Span::new(file.to_string(), s.pos.line, s.pos.column, struct_name.len()),
            ));
            continue;
        };

        for field in &iface.fields {
            let matches = s.fields.iter().any(|f| f.name == field.name && type_tag(&f.ty) == type_tag(&field.ty));
            if !matches {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::MissingField,
                    format!("struct `{struct_name}` is missing field `{}` required by `{implements}`", field.name),
                    Span::new(file.to_string(), s.pos.line, s.pos.column, struct_name.len()),
                ));
            }
        }

        for method in &iface.methods {
            let satisfied = table.lookup_overloads(struct_name, &method.name).map(|overloads| {
                overloads.iter().any(|o| {
                    let params_match = o.param_types.len() == method.params.len()
                        && o.param_types.iter().zip(&method.params).all(|(a, b)| type_tag(a) == type_tag(&b.ty));
                    params_match && type_tag(&o.return_type) == type_tag(&method.return_type)
                })
            }).unwrap_or(false);
            if !satisfied {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::MissingMethod,
                    format!("struct `{struct_name}` is missing method `{}` required by `{implements}`", method.name),
                    Span::new(file.to_string(), s.pos.line, s.pos.column, struct_name.len()),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl_collector::collect;
    use cz_parser::Parser;

    fn check(src: &str) -> DiagnosticEngine {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        let table = collect(&mut module, &mut engine, "t.cz");
        engine.drain();
        check_module(&module, &table, &mut engine, "t.cz");
        engine
    }

    #[test]
    fn immutable_assignment_is_rejected() {
        let engine = check("fn main() -> i32 { x: i32 = 3\n x = 4\n return 0 }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MutabilityViolation));
    }

    #[test]
    fn missing_return_is_flagged() {
        let engine = check("fn f() -> i32 { x: i32 = 1 }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MissingReturn));
    }

    #[test]
    fn out_of_bounds_literal_index() {
        let engine = check("fn main() -> i32 { mut a: i32[3] = [1, 2, 3]\n a[3] = 0\n return 0 }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::ArrayIndexOutOfBounds));
    }

    #[test]
    fn returning_value_from_void_function_is_flagged() {
        let engine = check("fn f() { return 1 }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::VoidFunctionReturnsValue));
    }

    #[test]
    fn return_type_mismatch_is_flagged() {
        let engine = check("fn f() -> i32 { return true }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn main_with_wrong_signature_is_rejected() {
        let engine = check("fn main(x: i32) -> i32 { return x }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::InvalidMainSignature));
    }

    #[test]
    fn main_with_correct_signature_is_accepted() {
        let engine = check("fn main() -> i32 { return 0 }\n");
        assert!(!engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::InvalidMainSignature));
    }

    #[test]
    fn missing_mut_arg_at_call_site_is_rejected() {
        let engine = check(
            "struct Foo { x: i32 }\n\
             fn takes(mut p: Foo*) -> void { }\n\
             fn main() -> i32 { f: Foo* = new Foo{x: 1}\n takes(f)\n return 0 }\n",
        );
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MutabilityViolation));
    }

    #[test]
    fn mut_arg_at_call_site_is_accepted() {
        let engine = check(
            "struct Foo { x: i32 }\n\
             fn takes(mut p: Foo*) -> void { }\n\
             fn main() -> i32 { f: Foo* = new Foo{x: 1}\n takes(mut f)\n return 0 }\n",
        );
        assert!(!engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MutabilityViolation));
    }

    #[test]
    fn null_assigned_to_primitive_is_rejected() {
        let engine = check("fn f() { x: i32 = null\n }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn null_assigned_to_struct_pointer_is_accepted() {
        let engine = check("struct Foo { x: i32 }\nfn f() { x: Foo* = null\n }\n");
        assert!(!engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn init_with_extra_params_is_rejected() {
        let engine = check("struct Foo { x: i32 }\nfn (Foo) init(extra: i32) -> void { }\n");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MismatchedSignature));
    }

    #[test]
    fn init_with_only_self_is_accepted() {
        let engine = check("struct Foo { x: i32 }\nfn (Foo) init() -> void { }\n");
        assert!(!engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MismatchedSignature));
    }
}
