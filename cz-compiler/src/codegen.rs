//! C code generator. Builds a single translation unit as a string buffer:
//! includes, type declarations, spliced runtime, forward declarations, then
//! function bodies with explicit scope-exit cleanup sequences.

use crate::decl_collector::{type_tag, DeclTable, GLOBAL_RECEIVER};
use cz_ast::{ArraySize, BinOp, Block, CompoundOp, Expr, FunctionDecl, Item, Literal, Module, Stmt, Type, UnaryOp};
use std::collections::{HashMap, HashSet};

pub struct CodegenOptions {
    pub debug: bool,
}

pub struct CodeGen<'a> {
    table: &'a DeclTable,
    options: CodegenOptions,
    buf: String,
    indent: usize,
    loop_labels: Vec<String>,
    loop_counter: u32,
    /// Heap-owning locals declared in the current scope stack, innermost last.
    /// Every `{ ... }` block — function body, `if`/`elseif`/`else` arm,
    /// `while`/`for`/`repeat` body — pushes its own frame here.
    scopes: Vec<Vec<(String, Type)>>,
    /// `scopes.len()` at the point each active loop's own body scope was
    /// pushed, parallel to `loop_labels`; lets `break`/`continue` free every
    /// scope opened since loop entry, not just the innermost one.
    loop_scope_base: Vec<usize>,
}

impl<'a> CodeGen<'a> {
    pub fn new(table: &'a DeclTable, options: CodegenOptions) -> Self {
        Self {
            table,
            options,
            buf: String::new(),
            indent: 0,
            loop_labels: Vec::new(),
            loop_counter: 0,
            scopes: Vec::new(),
            loop_scope_base: Vec::new(),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.indent {
            self.buf.push_str("    ");
        }
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    fn raw(&mut self, text: impl AsRef<str>) {
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    /// Emits the full translation unit for `module`; `runtime_sources` is the
    /// pre-joined splice of string/fmt/os/allocator runtime files in the
    /// order the language defines (see `cz_runtime::splice`).
    pub fn emit_module(&mut self, module: &Module, runtime_sources: &str) -> String {
        let allocator = self.allocator_name(module);
        self.emit_includes();
        self.emit_debug_flag();
        if allocator == "debug" {
            self.emit_allocator_tracking_helpers();
        }
        self.emit_type_decls();
        self.line(format!("#define CZ_ALLOCATOR_{} 1", allocator.to_uppercase()));
        self.raw(runtime_sources);
        self.emit_forward_decls(module);

        for item in &module.items {
            if let Item::Function(f) = item {
                self.emit_function(f);
            }
        }

        self.emit_main_wrapper(module);
        std::mem::take(&mut self.buf)
    }

    fn emit_includes(&mut self) {
        for header in ["stdint.h", "stdbool.h", "stdio.h", "stdlib.h", "string.h", "time.h"] {
            self.line(format!("#include <{header}>"));
        }
        self.raw("");
    }

    /// `--debug` forces the debug allocator regardless of `#alloc`; otherwise
    /// the source's `#alloc` directive wins, defaulting to `default`.
    fn allocator_name(&self, module: &Module) -> &'static str {
        if self.options.debug {
            return "debug";
        }
        let declared = module.items.iter().find_map(|i| match i {
            Item::AllocatorMacro(a) => Some(a.name.as_str()),
            _ => None,
        });
        match declared {
            Some("debug") => "debug",
            Some("arena") => "arena",
            _ => "default",
        }
    }

    fn emit_debug_flag(&mut self) {
        self.line(format!("static const int debug_flag = {};", self.options.debug as i32));
        self.raw("");
    }

    fn emit_allocator_tracking_helpers(&mut self) {
        self.line("static size_t cz_alloc_bytes_total = 0;");
        self.line("static size_t cz_alloc_count = 0;");
        self.line("static void *cz_debug_alloc(size_t size) {");
        self.indent += 1;
        self.line("cz_alloc_bytes_total += size;");
        self.line("cz_alloc_count += 1;");
        self.line("return malloc(size);");
        self.indent -= 1;
        self.line("}");
        self.raw("");
    }

    /// Struct/enum/interface typedefs. A field whose type is a pointer back
    /// to the declaring struct is emitted as `struct Name*`, never expanded,
    /// so the struct need not be complete at that point.
    fn emit_type_decls(&mut self) {
        let mut names: Vec<&String> = self.table.structs.keys().collect();
        names.sort();
        for name in &names {
            self.line(format!("typedef struct {name} {name};"));
        }
        let mut enum_names: Vec<&String> = self.table.enums.keys().collect();
        enum_names.sort();
        for name in &enum_names {
            self.line(format!("typedef int {name};"));
        }
        self.raw("");

        for name in &names {
            let s = &self.table.structs[*name];
            self.line(format!("struct {name} {{"));
            self.indent += 1;
            for field in &s.fields {
                let decl = c_member_decl(&field.ty, &field.name, *name);
                self.line(format!("{decl};"));
            }
            self.indent -= 1;
            self.line("};");
        }
        self.raw("");

        for name in &enum_names {
            let e = &self.table.enums[*name];
            self.line(format!("enum {{"));
            self.indent += 1;
            for (i, value) in e.values.iter().enumerate() {
                self.line(format!("{name}_{value} = {i},"));
            }
            self.indent -= 1;
            self.line(format!("}};"));
        }
        self.raw("");

        let discovered = discover_map_pair_types(self.table);
        let mut discovered_names: Vec<&String> = discovered.keys().collect();
        discovered_names.sort();
        for key in discovered_names {
            let ty = &discovered[key];
            let c_name = c_type(ty);
            match ty {
                Type::Map(k, v) => {
                    self.line("typedef struct {".to_string());
                    self.indent += 1;
                    self.line(format!("{}* keys;", c_type(k)));
                    self.line(format!("{}* values;", c_type(v)));
                    self.line("size_t len;".to_string());
                    self.line("size_t cap;".to_string());
                    self.indent -= 1;
                    self.line(format!("}} {c_name};"));
                }
                Type::Pair(l, r) => {
                    self.line("typedef struct {".to_string());
                    self.indent += 1;
                    self.line(format!("{} first;", c_type(l)));
                    self.line(format!("{} second;", c_type(r)));
                    self.indent -= 1;
                    self.line(format!("}} {c_name};"));
                }
                _ => {}
            }
        }
        self.raw("");
    }

    fn emit_forward_decls(&mut self, module: &Module) {
        for item in &module.items {
            if let Item::Function(f) = item {
                if let Some(sig) = self.lookup_sig(f) {
                    let decl = self.function_signature(f, &sig.c_name);
                    self.line(format!("{decl};"));
                }
            }
        }
        self.raw("");
    }

    fn lookup_sig(&self, f: &FunctionDecl) -> Option<crate::decl_collector::FunctionSig> {
        let receiver = f.receiver.as_ref().map(type_tag).unwrap_or_else(|| GLOBAL_RECEIVER.to_string());
        self.table
            .lookup_overloads(&receiver, &f.name)?
            .iter()
            .find(|o| o.param_types.len() == f.params.len() && o.param_types.iter().map(type_tag).eq(f.params.iter().map(|p| type_tag(&p.ty))))
            .cloned()
    }

    fn function_signature(&self, f: &FunctionDecl, c_name: &str) -> String {
        let ret = c_type(&f.return_type);
        let mut params = Vec::new();
        if let Some(receiver) = &f.receiver {
            params.push(c_member_decl(receiver, "self", ""));
        }
        for p in &f.params {
            params.push(c_member_decl(&p.ty, &p.name, ""));
        }
        if params.is_empty() {
            format!("{ret} {c_name}(void)")
        } else {
            format!("{ret} {c_name}({})", params.join(", "))
        }
    }

    fn emit_function(&mut self, f: &FunctionDecl) {
        let Some(sig) = self.lookup_sig(f) else { return };

        if f.unsafe_body.is_some() {
            // Unsafe functions only emit a forward declaration; their
            // definition is expected to come from a spliced runtime file.
            return;
        }

        let decl = self.function_signature(f, &sig.c_name);
        self.line(format!("{decl} {{"));
        self.indent += 1;
        self.scopes.push(Vec::new());
        if let Some(receiver) = &f.receiver {
            self.scopes.last_mut().unwrap().push(("self".to_string(), receiver.clone()));
        }
        for p in &f.params {
            if p.mutable {
                self.scopes.last_mut().unwrap().push((p.name.clone(), p.ty.clone()));
            }
        }
        self.emit_block_body(&f.body);
        if !matches!(f.return_type, Type::Void) {
            // fallthrough with no explicit return is a type-checker error;
            // codegen assumes a well-typed program and does not synthesize one.
        } else if !block_ends_in_return(&f.body) {
            self.emit_scope_cleanup();
        }
        self.scopes.pop();
        self.indent -= 1;
        self.line("}");
        self.raw("");
    }

    fn emit_block_body(&mut self, block: &Block) {
        for stmt in &block.statements {
            self.emit_stmt(stmt);
        }
    }

    /// Pushes a fresh scope for a `{ ... }` body, emits its statements, and
    /// frees the scope's heap locals at the block's own natural fall-through
    /// exit. A block whose last statement already jumps (`return`/`break`/
    /// `continue`) skips this — that jump already freed everything it needs
    /// to via `emit_cleanup_from`, and freeing again here would double-free.
    fn emit_scoped_block(&mut self, block: &Block) {
        self.scopes.push(Vec::new());
        self.emit_block_body(block);
        if !block_exits_early(block) {
            self.emit_scope_cleanup();
        }
        self.scopes.pop();
    }

    /// Frees heap locals in the innermost scope only, in reverse declaration
    /// order. Used at a block's own natural exit.
    fn emit_scope_cleanup(&mut self) {
        if let Some(top) = self.scopes.len().checked_sub(1) {
            self.emit_cleanup_from(top);
        }
    }

    /// Frees heap locals across every scope from `base` to the innermost,
    /// innermost scope first. Used where control leaves several scopes at
    /// once: `return` (exits the whole function) and `break`/`continue`
    /// (exit every block opened since the relevant loop was entered).
    fn emit_cleanup_from(&mut self, base: usize) {
        let snapshot: Vec<Vec<(String, Type)>> = self.scopes.get(base..).map(<[_]>::to_vec).unwrap_or_default();
        for scope in snapshot.iter().rev() {
            for (name, ty) in scope.iter().rev() {
                if matches!(ty, Type::Pointer(_)) {
                    self.line(format!("free({name});"));
                }
            }
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl { name, ty, init, mutable, .. } => {
                let decl = c_member_decl(ty, name, "");
                match init {
                    Some(value) => self.line(format!("{decl} = {};", self.expr(value))),
                    None => self.line(format!("{decl};")),
                }
                if *mutable && matches!(ty, Type::Pointer(_)) {
                    if let Some(scope) = self.scopes.last_mut() {
                        scope.push((name.clone(), ty.clone()));
                    }
                }
            }
            Stmt::Assign { target, value, .. } => {
                self.line(format!("{} = {};", self.expr(target), self.expr(value)));
            }
            Stmt::CompoundAssign { target, op, value, .. } => {
                let op = match op {
                    CompoundOp::Add => "+=",
                    CompoundOp::Sub => "-=",
                    CompoundOp::Mul => "*=",
                    CompoundOp::Div => "/=",
                    CompoundOp::Mod => "%=",
                };
                self.line(format!("{} {op} {};", self.expr(target), self.expr(value)));
            }
            Stmt::If { cond, then_block, elseif_arms, else_block, .. } => {
                self.line(format!("if ({}) {{", self.expr(cond)));
                self.indent += 1;
                self.emit_scoped_block(then_block);
                self.indent -= 1;
                for (arm_cond, arm_block) in elseif_arms {
                    self.line(format!("}} else if ({}) {{", self.expr(arm_cond)));
                    self.indent += 1;
                    self.emit_scoped_block(arm_block);
                    self.indent -= 1;
                }
                if let Some(else_block) = else_block {
                    self.line("} else {");
                    self.indent += 1;
                    self.emit_scoped_block(else_block);
                    self.indent -= 1;
                }
                self.line("}");
            }
            Stmt::While { cond, body, .. } => {
                let label = self.push_loop_label();
                self.line(format!("while ({}) {{", self.expr(cond)));
                self.indent += 1;
                self.emit_scoped_block(body);
                self.indent -= 1;
                self.line("}");
                self.emit_loop_labels(&label);
                self.pop_loop_label();
            }
            Stmt::ForIn { index, item, collection, body, .. } => {
                let label = self.push_loop_label();
                let coll = self.expr(collection);
                let idx = index.clone().unwrap_or_else(|| "cz_i".to_string());
                self.line(format!("for (size_t {idx} = 0; {idx} < (size_t)({coll}).len; {idx}++) {{"));
                self.indent += 1;
                self.line(format!("__auto_type {item} = ({coll}).data[{idx}];"));
                self.emit_scoped_block(body);
                self.indent -= 1;
                self.line("}");
                self.emit_loop_labels(&label);
                self.pop_loop_label();
            }
            Stmt::RepeatN { count, body, .. } => {
                let label = self.push_loop_label();
                self.line(format!("for (long cz_rep = 0; cz_rep < (long)({}); cz_rep++) {{", self.expr(count)));
                self.indent += 1;
                self.emit_scoped_block(body);
                self.indent -= 1;
                self.line("}");
                self.emit_loop_labels(&label);
                self.pop_loop_label();
            }
            Stmt::Break { level, .. } => self.emit_loop_jump("break", *level),
            Stmt::Continue { level, .. } => self.emit_loop_jump("continue", *level),
            Stmt::Return { value, .. } => match value {
                Some(value) => {
                    let rendered = self.expr(value);
                    self.emit_cleanup_from(0);
                    self.line(format!("return {rendered};"));
                }
                None => {
                    self.emit_cleanup_from(0);
                    self.line("return;");
                }
            },
            Stmt::Free { target, .. } => {
                let rendered = self.expr(target);
                self.line(format!("free({rendered});"));
                if let Expr::Identifier { name, .. } = target {
                    for scope in self.scopes.iter_mut().rev() {
                        if scope.iter().any(|(n, _)| n == name) {
                            scope.retain(|(n, _)| n != name);
                            break;
                        }
                    }
                }
            }
            Stmt::Discard { value, .. } | Stmt::Expr { expr: value, .. } => {
                self.line(format!("{};", self.expr(value)));
            }
            Stmt::Assert { cond, message, .. } => {
                let msg = message.as_ref().map(|m| self.expr(m)).unwrap_or_else(|| "\"assertion failed\"".to_string());
                self.line(format!("if (!({})) {{ fprintf(stderr, \"%s\\n\", {msg}); abort(); }}", self.expr(cond)));
            }
            Stmt::Log { args, .. } => {
                for arg in args {
                    let rendered = self.expr(arg);
                    self.line(format!("cz_log({rendered});"));
                }
            }
            Stmt::Todo { message, .. } => {
                let msg = message.clone().unwrap_or_else(|| "not implemented".to_string());
                self.line(format!("{{ fprintf(stderr, \"TODO: %s\\n\", \"{msg}\"); abort(); }}"));
            }
            Stmt::Fixme { .. } => {}
            Stmt::UnsafeBlock { raw_c, .. } => self.raw(raw_c),
            Stmt::Run { .. } => {}
        }
    }

    fn push_loop_label(&mut self) -> String {
        self.loop_counter += 1;
        let label = format!("cz_loop_{}", self.loop_counter);
        self.loop_labels.push(label.clone());
        self.loop_scope_base.push(self.scopes.len());
        label
    }

    fn pop_loop_label(&mut self) {
        self.loop_labels.pop();
        self.loop_scope_base.pop();
    }

    /// `goto` targets for a multi-level `break L`/`continue L`; emitted
    /// immediately after the loop body so nested loops can jump out cleanly.
    fn emit_loop_labels(&mut self, label: &str) {
        self.line(format!("goto {label}_after; {label}_continue: ; {label}_after: ;"));
    }

    fn emit_loop_jump(&mut self, kind: &str, level: u32) {
        let idx = self.loop_labels.len().saturating_sub(level.max(1) as usize);
        if let Some(&base) = self.loop_scope_base.get(idx) {
            self.emit_cleanup_from(base);
        }
        if level <= 1 {
            self.line(format!("{kind};"));
            return;
        }
        match self.loop_labels.get(idx) {
            Some(label) => {
                let label = label.clone();
                let suffix = if kind == "break" { "after" } else { "continue" };
                self.line(format!("goto {label}_{suffix};"));
            }
            None => self.line(format!("{kind};")),
        }
    }

    fn emit_main_wrapper(&mut self, module: &Module) {
        let has_main = module.items.iter().any(|i| matches!(i, Item::Function(f) if f.name == "main" && f.receiver.is_none()));
        if !has_main {
            return;
        }
        self.line("int main(void) {");
        self.indent += 1;
        self.line("int cz_status = main_main();");
        if self.allocator_name(module) == "debug" {
            self.line("fprintf(stderr, \"alloc: %zu bytes, %zu allocations\\n\", cz_alloc_bytes_total, cz_alloc_count);");
        }
        self.line("return cz_status;");
        self.indent -= 1;
        self.line("}");
    }

    fn expr(&self, expr: &Expr) -> String {
        match expr {
            Expr::Literal { value, .. } => literal(value),
            Expr::Identifier { name, .. } => name.clone(),
            Expr::Field { receiver, name, .. } => {
                let op = if self.pointer_receiver(receiver) { "->" } else { "." };
                format!("({}){op}{name}", self.expr(receiver))
            }
            Expr::Index { receiver, index, .. } => format!("({}).data[{}]", self.expr(receiver), self.expr(index)),
            Expr::Slice { receiver, start, end, .. } => {
                let start = start.as_ref().map(|s| self.expr(s)).unwrap_or_else(|| "0".to_string());
                let end = end.as_ref().map(|e| self.expr(e)).unwrap_or_else(|| format!("({}).len", self.expr(receiver)));
                format!("cz_slice({}, {start}, {end})", self.expr(receiver))
            }
            Expr::Unary { op, operand, .. } => {
                let c_op = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                    UnaryOp::Ref => "&",
                    UnaryOp::Deref => "*",
                };
                format!("({c_op}({}))", self.expr(operand))
            }
            Expr::Binary { op, left, right, .. } => self.binary(*op, left, right),
            Expr::Call { callee, args, .. } => {
                format!("{}({})", self.expr(callee), self.args(args))
            }
            Expr::MutArg { inner, .. } => format!("(&{})", self.expr(inner)),
            Expr::StaticMethodCall { type_name, method, args, .. } => {
                format!("{type_name}_{method}({})", self.args(args))
            }
            Expr::MethodCall { receiver, method, args, .. } => {
                let recv = if self.pointer_receiver(receiver) { self.expr(receiver) } else { format!("(&{})", self.expr(receiver)) };
                let mut all_args = vec![recv];
                all_args.extend(args.iter().map(|a| self.expr(a)));
                format!("{method}({})", all_args.join(", "))
            }
            Expr::StructLiteral { type_name, fields, .. } => self.compound_literal(type_name, fields),
            Expr::ArrayLiteral { elements, .. } => {
                let items: Vec<String> = elements.iter().map(|e| self.expr(e)).collect();
                format!("{{ {} }}", items.join(", "))
            }
            Expr::MapLiteral { entries, .. } => {
                let items: Vec<String> = entries.iter().map(|(k, v)| format!("{{ {}, {} }}", self.expr(k), self.expr(v))).collect();
                format!("{{ {} }}", items.join(", "))
            }
            Expr::PairLiteral { left, right, .. } => format!("{{ {}, {} }}", self.expr(left), self.expr(right)),
            Expr::NewHeap { type_name, fields, .. } => {
                let literal = self.compound_literal(type_name, fields);
                format!("cz_heap_dup(&({type_name}){literal}, sizeof({type_name}))")
            }
            Expr::NewArray { elements, .. } => {
                let items: Vec<String> = elements.iter().map(|e| self.expr(e)).collect();
                format!("cz_array_new((void*[]){{ {} }}, {})", items.join(", "), items.len())
            }
            Expr::NewMap { entries, .. } => {
                format!("cz_map_new({})", entries.len().max(1))
            }
            Expr::Cast { target, value, .. } => format!("(({})({}))", c_type(target), self.expr(value)),
            Expr::SafeCast { target, value, fallback, .. } => {
                format!("cz_safe_cast_{}({}, {})", type_tag(target), self.expr(value), self.expr(fallback))
            }
            Expr::Clone { type_hint, value, .. } => {
                let ty = type_hint.as_ref().map(c_type).unwrap_or_else(|| "void".to_string());
                format!("cz_heap_dup(&({}), sizeof({ty}))", self.expr(value))
            }
            Expr::NullCheck { value, .. } => format!("cz_null_check({})", self.expr(value)),
            Expr::IsCheck { value, ty, .. } => format!("cz_is_type({}, \"{}\")", self.expr(value), type_tag(ty)),
            Expr::TypeOf { value, .. } => format!("cz_typeof({})", self.expr(value)),
            Expr::SizeOf { ty, .. } => format!("sizeof({})", c_type(ty)),
            Expr::DirectiveExpr { directive, .. } => match directive {
                cz_ast::Directive::File => "__FILE__".to_string(),
                cz_ast::Directive::Line => "__LINE__".to_string(),
                cz_ast::Directive::Function => "__func__".to_string(),
                cz_ast::Directive::Debug => "debug_flag".to_string(),
            },
            Expr::ImplicitCast { target, value, .. } => format!("(({})({}))", c_type(target), self.expr(value)),
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter().map(|a| self.expr(a)).collect::<Vec<_>>().join(", ")
    }

    fn compound_literal(&self, type_name: &str, fields: &[(String, Expr)]) -> String {
        let items: Vec<String> = fields.iter().map(|(name, value)| format!(".{name} = {}", self.expr(value))).collect();
        format!("({type_name}){{ {} }}", items.join(", "))
    }

    /// Approximates whether a receiver expression is already pointer-typed;
    /// without full type information at this layer, identifiers named with
    /// the codegen's own `self` convention or explicit `&`/`*` forms decide.
    fn pointer_receiver(&self, receiver: &Expr) -> bool {
        matches!(receiver, Expr::Unary { op: UnaryOp::Ref, .. } | Expr::NewHeap { .. } | Expr::Call { .. })
    }

    fn binary(&self, op: BinOp, left: &Expr, right: &Expr) -> String {
        let l = self.expr(left);
        let r = self.expr(right);
        match op {
            BinOp::Add => format!("({l} + {r})"),
            BinOp::Sub => format!("({l} - {r})"),
            BinOp::Mul => format!("({l} * {r})"),
            BinOp::Div => format!("({l} / {r})"),
            BinOp::Mod => format!("({l} % {r})"),
            BinOp::Eq => format!("({l} == {r})"),
            BinOp::Ne => format!("({l} != {r})"),
            BinOp::Lt => format!("({l} < {r})"),
            BinOp::Le => format!("({l} <= {r})"),
            BinOp::Gt => format!("({l} > {r})"),
            BinOp::Ge => format!("({l} >= {r})"),
            BinOp::And => format!("({l} && {r})"),
            BinOp::Or => format!("({{ __auto_type cz_t = ({l}); cz_t ? cz_t : ({r}); }})"),
        }
    }
}

fn literal(value: &Literal) -> String {
    match value {
        Literal::Int(n) => n.to_string(),
        Literal::Float(f) => format!("{f}"),
        Literal::Str(s) => format!("{:?}", s),
        Literal::Bool(b) => if *b { "true".to_string() } else { "false".to_string() },
        Literal::Null => "NULL".to_string(),
        Literal::Char(c) => format!("'{}'", c.escape_default()),
    }
}

fn c_type(ty: &Type) -> String {
    match ty {
        Type::Named(name) => name.clone(),
        Type::String => "cz_string".to_string(),
        Type::Void => "void".to_string(),
        Type::Any => "void*".to_string(),
        Type::Pointer(inner) | Type::Nullable(inner) => format!("{}*", c_type(inner)),
        Type::Slice(inner) | Type::Varargs(inner) => format!("cz_slice_{}", type_tag(inner)),
        Type::Array(inner, _) => c_type(inner),
        Type::Map(k, v) => format!("cz_map_{}_{}", type_tag(k), type_tag(v)),
        Type::Pair(l, r) => format!("cz_pair_{}_{}", type_tag(l), type_tag(r)),
    }
}

fn c_member_decl(ty: &Type, name: &str, _owner: &str) -> String {
    match ty {
        Type::Array(inner, ArraySize::Literal(n)) => format!("{} {name}[{n}]", c_type(inner)),
        Type::Array(inner, ArraySize::Inferred) => format!("{}* {name}", c_type(inner)),
        _ => format!("{} {name}", c_type(ty)),
    }
}

fn block_ends_in_return(block: &Block) -> bool {
    matches!(block.statements.last(), Some(Stmt::Return { .. }))
}

/// A block ending in `return`/`break`/`continue` has already emitted its own
/// cleanup for every scope it needs to exit; a block-level `emit_scoped_block`
/// skips its own natural-exit cleanup in that case to avoid freeing twice.
fn block_exits_early(block: &Block) -> bool {
    matches!(block.statements.last(), Some(Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. }))
}

/// Dry-run pass discovering every distinct map/pair type instantiated in any
/// function body, so their backing C struct types are declared once.
fn discover_map_pair_types(table: &DeclTable) -> HashMap<String, Type> {
    let mut found = HashMap::new();
    let mut seen_names = HashSet::new();
    for overloads in table.functions.values() {
        for sig in overloads {
            for ty in sig.param_types.iter().chain(std::iter::once(&sig.return_type)) {
                collect_map_pair(ty, &mut found, &mut seen_names);
            }
        }
    }
    found
}

fn collect_map_pair(ty: &Type, found: &mut HashMap<String, Type>, seen: &mut HashSet<String>) {
    match ty {
        Type::Map(_, _) | Type::Pair(_, _) => {
            let tag = type_tag(ty);
            if seen.insert(tag.clone()) {
                found.insert(tag, ty.clone());
            }
        }
        Type::Pointer(inner) | Type::Nullable(inner) | Type::Slice(inner) | Type::Varargs(inner) | Type::Array(inner, _) => {
            collect_map_pair(inner, found, seen)
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decl_collector::collect;
    use cz_diagnostics::DiagnosticEngine;
    use cz_parser::Parser;

    fn generate(src: &str) -> String {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        let table = collect(&mut module, &mut engine, "t.cz");
        let mut gen = CodeGen::new(&table, CodegenOptions { debug: false });
        gen.emit_module(&module, "")
    }

    #[test]
    fn emits_main_wrapper() {
        let c = generate("fn main() -> i32 { return 0 }\n");
        assert!(c.contains("int main(void)"));
        assert!(c.contains("main_main()"));
    }

    #[test]
    fn struct_gets_typedef() {
        let c = generate("struct Point { x: i32, y: i32 }\nfn f() -> void { }\n");
        assert!(c.contains("typedef struct Point Point;"));
        assert!(c.contains("struct Point {"));
    }

    #[test]
    fn overloaded_function_gets_suffixed_c_name() {
        let c = generate("fn add(a: u8, b: u8) -> u8 { return a + b }\nfn add(a: f32, b: f32) -> f32 { return a + b }\n");
        assert!(c.contains("add_u8_u8"));
        assert!(c.contains("add_f32_f32"));
    }

    #[test]
    fn pair_type_gets_real_typedef() {
        let c = generate("fn f(p: pair[i32, i32]) -> void { }\n");
        assert!(c.contains("} cz_pair_i32_i32;"));
        assert!(c.contains("i32 first;"));
        assert!(c.contains("i32 second;"));
    }

    #[test]
    fn map_type_gets_real_typedef() {
        let c = generate("fn f(m: map[i32]i32) -> void { }\n");
        assert!(c.contains("} cz_map_i32_i32;"));
        assert!(c.contains("i32* keys;"));
        assert!(c.contains("i32* values;"));
    }

    #[test]
    fn return_inside_if_does_not_double_free_after_the_block() {
        let c = generate(
            "struct Foo { x: i32 }\n\
             fn f(flag: bool) -> i32 {\n\
             if flag { mut p: Foo* = new Foo{x: 1}\n return 1 }\n\
             return 0\n\
             }\n",
        );
        assert_eq!(c.matches("free(p)").count(), 1);
    }

    #[test]
    fn break_frees_loop_local_heap_variable() {
        let c = generate(
            "struct Foo { x: i32 }\n\
             fn f() -> void {\n\
             while true { mut q: Foo* = new Foo{x: 1}\n break }\n\
             }\n",
        );
        assert_eq!(c.matches("free(q)").count(), 1);
    }

    #[test]
    fn continue_frees_loop_local_heap_variable() {
        let c = generate(
            "struct Foo { x: i32 }\n\
             fn f() -> void {\n\
             while true { mut q: Foo* = new Foo{x: 1}\n continue }\n\
             }\n",
        );
        assert_eq!(c.matches("free(q)").count(), 1);
    }

    #[test]
    fn heap_local_in_if_body_freed_once_on_fallthrough() {
        let c = generate(
            "struct Foo { x: i32 }\n\
             fn f(flag: bool) -> void {\n\
             if flag { mut p: Foo* = new Foo{x: 1}\n }\n\
             }\n",
        );
        assert_eq!(c.matches("free(p)").count(), 1);
    }
}
