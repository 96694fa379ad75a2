//! Declaration collection: registers structs/enums/interfaces/aliases and
//! function overload sets, expands generics, enforces single-type variance,
//! and assigns every function's final `c_name`.

use cz_ast::{EnumDecl, FunctionDecl, GenericParam, InterfaceDecl, Item, Module, NodeId, StructDecl, Type};
use cz_diagnostics::{Diagnostic, DiagnosticEngine, DiagnosticKind, Span};
use std::collections::HashMap;

pub const GLOBAL_RECEIVER: &str = "__global__";

#[derive(Debug, Clone)]
pub struct FunctionSig {
    pub node_id: NodeId,
    pub name: String,
    pub receiver: Option<Type>,
    pub param_types: Vec<Type>,
    /// Per-position `mut` flag from the declaration; a `true` entry for a
    /// pointer-typed parameter requires a `mut_arg` at every call site.
    pub param_mutable: Vec<bool>,
    pub return_type: Type,
    pub c_name: String,
    pub is_overloaded: bool,
    pub is_generic_instance: bool,
    pub generic_concrete_type: Option<Type>,
}

#[derive(Debug, Default)]
pub struct DeclTable {
    pub structs: HashMap<String, StructDecl>,
    pub interfaces: HashMap<String, InterfaceDecl>,
    pub enums: HashMap<String, EnumDecl>,
    pub type_aliases: HashMap<String, Type>,
    /// Keyed `(receiver_type_or_"__global__", name)`.
    pub functions: HashMap<(String, String), Vec<FunctionSig>>,
}

impl DeclTable {
    pub fn lookup_overloads(&self, receiver: &str, name: &str) -> Option<&[FunctionSig]> {
        self.functions.get(&(receiver.to_string(), name.to_string())).map(Vec::as_slice)
    }
}

/// Canonical, compact string for a type, used both for signature equality
/// and for generated C-name suffixes.
pub fn type_tag(ty: &Type) -> String {
    match ty {
        Type::Named(name) => name.clone(),
        Type::String => "string".to_string(),
        Type::Void => "void".to_string(),
        Type::Any => "any".to_string(),
        Type::Nullable(inner) => format!("{}_opt", type_tag(inner)),
        Type::Pointer(inner) => format!("{}_ptr", type_tag(inner)),
        Type::Slice(inner) => format!("{}_slice", type_tag(inner)),
        Type::Varargs(inner) => format!("{}_varargs", type_tag(inner)),
        Type::Array(inner, _) => format!("{}_arr", type_tag(inner)),
        Type::Map(k, v) => format!("map_{}_{}", type_tag(k), type_tag(v)),
        Type::Pair(l, r) => format!("pair_{}_{}", type_tag(l), type_tag(r)),
    }
}

fn receiver_key(receiver: &Option<Type>) -> String {
    match receiver {
        Some(ty) => type_tag(ty),
        None => GLOBAL_RECEIVER.to_string(),
    }
}

pub fn collect(module: &mut Module, engine: &mut DiagnosticEngine, file: &str) -> DeclTable {
    let mut table = DeclTable::default();
    check_module_name(module, engine, file);

    for item in &module.items {
        match item {
            Item::Struct(s) => register_struct(&mut table, s, engine, file),
            Item::Interface(i) => register_interface(&mut table, i, engine, file),
            Item::Enum(e) => register_enum(&mut table, e, engine, file),
            Item::TypeAlias(t) => {
                if table.type_aliases.insert(t.alias.clone(), t.target.clone()).is_some() {
                    engine.emit(Diagnostic::new(
                        DiagnosticKind::DuplicateAlias,
                        format!("alias `{}` is already declared", t.alias),
                        Span::new(file.to_string(), t.pos.line, t.pos.column, t.alias.len()),
                    ));
                }
            }
            Item::AllocatorMacro(_) | Item::Function(_) => {}
        }
    }

    // Expand generics in place, replacing each generic original with its
    // monomorphized copies. Non-generic functions pass through unchanged.
    let mut expanded_items = Vec::with_capacity(module.items.len());
    for item in std::mem::take(&mut module.items) {
        match item {
            Item::Function(f) if !f.generics.is_empty() => {
                for instance in expand_generics(&f) {
                    expanded_items.push(Item::Function(instance));
                }
            }
            other => expanded_items.push(other),
        }
    }
    module.items = expanded_items;

    // Register functions (now fully expanded) into overload sets.
    for item in &module.items {
        if let Item::Function(f) = item {
            register_function(&mut table, f, engine, file);
        }
    }

    enforce_single_type_variance(&mut table, engine, file);
    assign_c_names(&mut table);

    table
}

/// `#module name` is optional; when absent, a (non-fatal) warning nudges the
/// author to add one. When present, the name must be a valid lowercase
/// identifier so it matches the file it names.
fn check_module_name(module: &Module, engine: &mut DiagnosticEngine, file: &str) {
    match &module.name {
        None => {
            engine.emit(Diagnostic::new(
                DiagnosticKind::MissingModuleDeclaration,
                "file has no `#module` declaration".to_string(),
                Span::new(file.to_string(), module.pos.line, module.pos.column, 0),
            ));
        }
        Some(name) => {
            let valid = !name.is_empty()
                && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
                && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::InvalidModuleName,
                    format!("`{name}` is not a valid module name"),
                    Span::new(file.to_string(), module.pos.line, module.pos.column, name.len()),
                ));
            }
        }
    }
}

fn register_struct(table: &mut DeclTable, s: &StructDecl, engine: &mut DiagnosticEngine, file: &str) {
    if table.structs.insert(s.name.clone(), s.clone()).is_some() {
        engine.emit(Diagnostic::new(
            DiagnosticKind::DuplicateDeclaration,
            format!("struct `{}` is already declared", s.name),
            Span::new(file.to_string(), s.pos.line, s.pos.column, s.name.len()),
        ));
    }
    if !s.name.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        engine.emit(Diagnostic::new(
            DiagnosticKind::InvalidStructName,
            format!("struct `{}` should start with an uppercase letter", s.name),
            Span::new(file.to_string(), s.pos.line, s.pos.column, s.name.len()),
        ));
    }
}

fn register_interface(table: &mut DeclTable, i: &InterfaceDecl, engine: &mut DiagnosticEngine, file: &str) {
    if table.interfaces.insert(i.name.clone(), i.clone()).is_some() {
        engine.emit(Diagnostic::new(
            DiagnosticKind::DuplicateDeclaration,
            format!("interface `{}` is already declared", i.name),
            Span::new(file.to_string(), i.pos.line, i.pos.column, i.name.len()),
        ));
    }
    if i.methods.is_empty() {
        engine.emit(Diagnostic::new(
            DiagnosticKind::UselessInterface,
            format!("interface `{}` declares no methods", i.name),
            Span::new(file.to_string(), i.pos.line, i.pos.column, i.name.len()),
        ));
    }
}

fn register_enum(table: &mut DeclTable, e: &EnumDecl, engine: &mut DiagnosticEngine, file: &str) {
    if table.enums.insert(e.name.clone(), e.clone()).is_some() {
        engine.emit(Diagnostic::new(
            DiagnosticKind::DuplicateDeclaration,
            format!("enum `{}` is already declared", e.name),
            Span::new(file.to_string(), e.pos.line, e.pos.column, e.name.len()),
        ));
    }
    for value in &e.values {
        if value.chars().any(|c| c.is_ascii_lowercase()) {
            engine.emit(Diagnostic::new(
                DiagnosticKind::EnumValueNotUppercase,
                format!("enum value `{}` should be uppercase", value),
                Span::new(file.to_string(), e.pos.line, e.pos.column, value.len()),
            ));
        }
    }
}

/// Substitutes every generic parameter name appearing as `Type::Named` in
/// parameters and the return type with its concrete type; the body is left
/// untouched, matching the collector's stated scope.
fn expand_generics(f: &FunctionDecl) -> Vec<FunctionDecl> {
    let combos = cartesian_product(&f.generics);
    combos
        .into_iter()
        .map(|substitution| {
            let mut instance = f.clone();
            for param in &mut instance.params {
                param.ty = substitute(&param.ty, &substitution);
            }
            instance.return_type = substitute(&instance.return_type, &substitution);
            instance.generics = Vec::new();
            instance
        })
        .collect()
}

fn cartesian_product(generics: &[GenericParam]) -> Vec<Vec<(String, Type)>> {
    let mut combos: Vec<Vec<(String, Type)>> = vec![Vec::new()];
    for g in generics {
        let mut next = Vec::new();
        for combo in &combos {
            for concrete in &g.concrete_types {
                let mut extended = combo.clone();
                extended.push((g.name.clone(), concrete.clone()));
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

fn substitute(ty: &Type, substitution: &[(String, Type)]) -> Type {
    match ty {
        Type::Named(name) => substitution
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, concrete)| concrete.clone())
            .unwrap_or_else(|| ty.clone()),
        Type::Nullable(inner) => Type::Nullable(Box::new(substitute(inner, substitution))),
        Type::Pointer(inner) => Type::Pointer(Box::new(substitute(inner, substitution))),
        Type::Slice(inner) => Type::Slice(Box::new(substitute(inner, substitution))),
        Type::Varargs(inner) => Type::Varargs(Box::new(substitute(inner, substitution))),
        Type::Array(inner, size) => Type::Array(Box::new(substitute(inner, substitution)), size.clone()),
        Type::Map(k, v) => Type::Map(Box::new(substitute(k, substitution)), Box::new(substitute(v, substitution))),
        Type::Pair(l, r) => Type::Pair(Box::new(substitute(l, substitution)), Box::new(substitute(r, substitution))),
        Type::String | Type::Void | Type::Any => ty.clone(),
    }
}

fn register_function(table: &mut DeclTable, f: &FunctionDecl, engine: &mut DiagnosticEngine, file: &str) {
    let receiver = receiver_key(&f.receiver);
    let param_types: Vec<Type> = f.params.iter().map(|p| p.ty.clone()).collect();
    let param_mutable: Vec<bool> = f.params.iter().map(|p| p.mutable).collect();
    let key = (receiver, f.name.clone());
    let entry = table.functions.entry(key).or_default();

    let duplicate = entry.iter().any(|existing| {
        existing.param_types.len() == param_types.len()
            && existing.param_types.iter().zip(&param_types).all(|(a, b)| type_tag(a) == type_tag(b))
    });
    if duplicate {
        engine.emit(Diagnostic::new(
            DiagnosticKind::DuplicateDeclaration,
            format!("function `{}` is already declared with this signature", f.name),
            Span::new(file.to_string(), f.pos.line, f.pos.column, f.name.len()),
        ));
        return;
    }

    entry.push(FunctionSig {
        node_id: f.id,
        name: f.name.clone(),
        receiver: f.receiver.clone(),
        param_types,
        param_mutable,
        return_type: f.return_type.clone(),
        c_name: String::new(),
        is_overloaded: false,
        is_generic_instance: false,
        generic_concrete_type: None,
    });
}

/// All parameter positions that differ between any two overloads in a set
/// must vary as the same (from-type → to-type) pair, judged against the
/// first-registered overload as the baseline.
fn enforce_single_type_variance(table: &mut DeclTable, engine: &mut DiagnosticEngine, file: &str) {
    for ((_, name), overloads) in table.functions.iter() {
        if overloads.len() < 2 {
            continue;
        }
        let baseline = &overloads[0];
        for candidate in &overloads[1..] {
            if candidate.param_types.len() != baseline.param_types.len() {
                continue;
            }
            let mut change: Option<(String, String)> = None;
            let mut consistent = true;
            for (a, b) in baseline.param_types.iter().zip(&candidate.param_types) {
                let (ta, tb) = (type_tag(a), type_tag(b));
                if ta == tb {
                    continue;
                }
                match &change {
                    None => change = Some((ta, tb)),
                    Some((from, to)) if *from == ta && *to == tb => {}
                    Some(_) => {
                        consistent = false;
                        break;
                    }
                }
            }
            if !consistent {
                engine.emit(Diagnostic::new(
                    DiagnosticKind::MismatchedSignature,
                    format!("overloads of `{}` vary inconsistently across parameter positions", name),
                    Span::new(file.to_string(), 0, 0, 0),
                ));
            }
        }
    }
}

fn assign_c_names(table: &mut DeclTable) {
    for ((receiver, name), overloads) in table.functions.iter_mut() {
        let is_overloaded = overloads.len() > 1;
        for sig in overloads.iter_mut() {
            sig.is_overloaded = is_overloaded;
            let base_name = if name == "main" && receiver == GLOBAL_RECEIVER {
                "main_main".to_string()
            } else {
                name.clone()
            };
            let with_receiver = if receiver == GLOBAL_RECEIVER {
                base_name
            } else {
                format!("{receiver}_{base_name}")
            };
            sig.c_name = if is_overloaded {
                let suffix: Vec<String> = sig.param_types.iter().map(type_tag).collect();
                format!("{with_receiver}_{}", suffix.join("_"))
            } else {
                with_receiver
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cz_parser::Parser;

    fn collect_src(src: &str) -> (Module, DeclTable) {
        let mut p = Parser::new("t.cz", src, std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        let table = collect(&mut module, &mut engine, "t.cz");
        (module, table)
    }

    #[test]
    fn overload_c_names_carry_param_suffix() {
        let (_, table) = collect_src(
            "fn add(a: u8, b: u8) -> u8 { return a + b }\nfn add(a: f32, b: f32) -> f32 { return a + b }\n",
        );
        let overloads = table.lookup_overloads(GLOBAL_RECEIVER, "add").unwrap();
        assert_eq!(overloads.len(), 2);
        assert!(overloads.iter().any(|o| o.c_name == "add_u8_u8"));
        assert!(overloads.iter().any(|o| o.c_name == "add_f32_f32"));
    }

    #[test]
    fn generic_function_expands_to_one_copy_per_concrete_type() {
        let (module, table) = collect_src("fn id[T in {i32, f32}](x: T) -> T { return x }\n");
        assert!(module.items.iter().all(|i| !matches!(i, Item::Function(f) if !f.generics.is_empty())));
        let overloads = table.lookup_overloads(GLOBAL_RECEIVER, "id").unwrap();
        assert_eq!(overloads.len(), 2);
        assert!(overloads.iter().any(|o| o.c_name == "id_i32"));
        assert!(overloads.iter().any(|o| o.c_name == "id_f32"));
    }

    #[test]
    fn main_gets_renamed() {
        let (_, table) = collect_src("fn main() -> i32 { return 0 }\n");
        let overloads = table.lookup_overloads(GLOBAL_RECEIVER, "main").unwrap();
        assert_eq!(overloads[0].c_name, "main_main");
    }

    #[test]
    fn duplicate_struct_is_rejected() {
        let mut p = Parser::new("t.cz", "struct Foo { x: i32 }\nstruct Foo { y: i32 }\n", std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        collect(&mut module, &mut engine, "t.cz");
        assert!(engine.has_errors());
    }

    #[test]
    fn missing_module_declaration_warns_without_failing() {
        let mut p = Parser::new("t.cz", "fn main() -> i32 { return 0 }\n", std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        collect(&mut module, &mut engine, "t.cz");
        assert!(!engine.has_errors());
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::MissingModuleDeclaration));
    }

    #[test]
    fn invalid_module_name_is_rejected() {
        let mut p = Parser::new("t.cz", "#module NotSnakeCase\nfn main() -> i32 { return 0 }\n", std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        collect(&mut module, &mut engine, "t.cz");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::InvalidModuleName));
    }

    #[test]
    fn lowercase_struct_name_is_rejected() {
        let mut p = Parser::new("t.cz", "struct foo { x: i32 }\n", std::env::temp_dir()).unwrap();
        let mut module = p.parse_module().unwrap();
        let mut engine = DiagnosticEngine::new();
        collect(&mut module, &mut engine, "t.cz");
        assert!(engine.diagnostics().iter().any(|d| d.kind == DiagnosticKind::InvalidStructName));
    }
}
