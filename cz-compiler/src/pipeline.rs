//! Phase-by-phase orchestration: parse, resolve imports, collect
//! declarations, type-check, analyze lifetimes, generate C. Halts after the
//! first phase that records any error diagnostic.

use crate::codegen::{CodeGen, CodegenOptions};
use crate::decl_collector::{self, DeclTable};
use crate::lifetime_analyzer;
use crate::module_resolver::{ModuleError, ModuleResolver};
use crate::type_checker;
use cz_ast::Module;
use cz_diagnostics::{Diagnostic, DiagnosticEngine};
use cz_parser::{ParseError, Parser};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Module(#[from] ModuleError),
    #[error("compilation failed with {0} error(s)")]
    Diagnostics(usize),
}

pub struct CompileOutput {
    pub c_source: String,
    pub diagnostics: Vec<Diagnostic>,
}

pub struct PipelineOptions {
    pub std_root: std::path::PathBuf,
    pub debug: bool,
    pub allow_run: bool,
}

/// Runs every phase in order, stopping at the first one that produces an
/// error diagnostic. Warnings from every completed phase are carried through
/// to the final result regardless of where the pipeline stops.
pub fn compile(path: &Path, options: PipelineOptions) -> Result<CompileOutput, CompileError> {
    let mut all_diagnostics = Vec::new();
    let source = std::fs::read_to_string(path)?;
    let cwd = path.parent().map(Path::to_path_buf).unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    let mut parser = Parser::new(path.to_string_lossy().into_owned(), &source, cwd)?;
    if !options.allow_run {
        parser = parser.deny_run_blocks();
    }
    let mut module: Module = parser.parse_module()?;

    let mut resolver = ModuleResolver::new(options.std_root.clone());
    resolver.resolve_imports(&module)?;
    for import in &module.imports {
        resolver.mark_used(&import.dotted());
    }
    for dotted in resolver.unused_imports() {
        all_diagnostics.push(Diagnostic::new(
            cz_diagnostics::DiagnosticKind::UnusedImport,
            format!("unused import `{dotted}`"),
            cz_diagnostics::Span::new(path.to_string_lossy().into_owned(), 0, 0, 0),
        ));
    }

    let file = path.to_string_lossy().into_owned();
    let mut engine = DiagnosticEngine::new();
    let table: DeclTable = decl_collector::collect(&mut module, &mut engine, &file);
    all_diagnostics.extend(engine.drain());
    if has_errors(&all_diagnostics) {
        return Err(CompileError::Diagnostics(error_count(&all_diagnostics)));
    }

    type_checker::check_module(&module, &table, &mut engine, &file);
    all_diagnostics.extend(engine.drain());
    if has_errors(&all_diagnostics) {
        return Err(CompileError::Diagnostics(error_count(&all_diagnostics)));
    }

    lifetime_analyzer::analyze_module(&module, &mut engine, &file);
    all_diagnostics.extend(engine.drain());
    if has_errors(&all_diagnostics) {
        return Err(CompileError::Diagnostics(error_count(&all_diagnostics)));
    }

    let mut gen = CodeGen::new(&table, CodegenOptions { debug: options.debug });
    let runtime = cz_runtime::splice();
    let c_source = gen.emit_module(&module, &runtime);

    Ok(CompileOutput { c_source, diagnostics: all_diagnostics })
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == cz_diagnostics::Severity::Error)
}

fn error_count(diagnostics: &[Diagnostic]) -> usize {
    diagnostics.iter().filter(|d| d.severity == cz_diagnostics::Severity::Error).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_source(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn hello_world_compiles_to_c_with_main() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(&dir, "main.cz", "fn main() -> i32 { return 0 }\n");
        let options = PipelineOptions { std_root: dir.path().join("std"), debug: false, allow_run: false };
        let output = compile(&path, options).unwrap();
        assert!(output.c_source.contains("int main(void)"));
    }

    #[test]
    fn type_error_halts_before_codegen() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_source(&dir, "main.cz", "fn main() -> i32 { return undeclared_name }\n");
        let options = PipelineOptions { std_root: dir.path().join("std"), debug: false, allow_run: false };
        let err = compile(&path, options).unwrap_err();
        assert!(matches!(err, CompileError::Diagnostics(_)));
    }
}
