//! Import resolution: maps `import cz.<path>` to a file under the standard
//! library root, parses and caches it, and tracks per-import `used` flags so
//! the declaration collector can later emit `UnusedImport` warnings.

use cz_ast::Module;
use cz_parser::ParseError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module `{dotted}` not found at {path:?}")]
    NotFound { dotted: String, path: PathBuf },
    #[error("failed to read module `{dotted}`: {source}")]
    Io {
        dotted: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse module `{dotted}`: {source}")]
    Parse {
        dotted: String,
        #[source]
        source: ParseError,
    },
}

pub struct ResolvedModule {
    pub module: Module,
    pub source: String,
    pub path: PathBuf,
}

/// The built-in `string` module, always visible even without an explicit import.
pub const BUILTIN_STRING: &str = "string";

pub struct ModuleResolver {
    std_root: PathBuf,
    cache: HashMap<String, ResolvedModule>,
    used: HashMap<String, bool>,
}

impl ModuleResolver {
    pub fn new(std_root: impl Into<PathBuf>) -> Self {
        Self {
            std_root: std_root.into(),
            cache: HashMap::new(),
            used: HashMap::new(),
        }
    }

    /// Resolves every import of `module`, plus the always-loaded `string`
    /// builtin. Imports that fail to resolve are surfaced as `ModuleError`
    /// immediately — resolution is not itself fault-tolerant (unlike type
    /// checking, which accumulates diagnostics across a whole pass).
    pub fn resolve_imports(&mut self, module: &Module) -> Result<(), ModuleError> {
        self.ensure_loaded(BUILTIN_STRING)?;
        for import in &module.imports {
            let dotted = import.dotted();
            self.used.entry(dotted.clone()).or_insert(false);
            self.ensure_loaded(&dotted)?;
        }
        Ok(())
    }

    fn ensure_loaded(&mut self, dotted: &str) -> Result<(), ModuleError> {
        if self.cache.contains_key(dotted) {
            return Ok(());
        }
        let path = self.dotted_to_path(dotted);
        let source = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ModuleError::NotFound { dotted: dotted.to_string(), path: path.clone() }
            } else {
                ModuleError::Io { dotted: dotted.to_string(), source: e }
            }
        })?;
        let cwd = path.parent().map(Path::to_path_buf).unwrap_or_else(|| self.std_root.clone());
        let mut parser = cz_parser::Parser::new(path.to_string_lossy().into_owned(), &source, cwd)
            .map_err(|e| ModuleError::Parse { dotted: dotted.to_string(), source: e })?;
        let parsed = parser
            .parse_module()
            .map_err(|e| ModuleError::Parse { dotted: dotted.to_string(), source: e })?;
        self.cache.insert(dotted.to_string(), ResolvedModule { module: parsed, source, path });
        Ok(())
    }

    /// `cz.fmt` -> `src/std/fmt.cz` (leaf); `cz.a.b` -> `src/std/a/b.cz` (nested).
    fn dotted_to_path(&self, dotted: &str) -> PathBuf {
        let mut segments: Vec<&str> = dotted.split('.').collect();
        if segments.first() == Some(&"cz") {
            segments.remove(0);
        }
        let mut path = self.std_root.clone();
        if let Some((leaf, dirs)) = segments.split_last() {
            for dir in dirs {
                path.push(dir);
            }
            path.push(format!("{leaf}.cz"));
        }
        path
    }

    pub fn mark_used(&mut self, dotted: &str) {
        self.used.insert(dotted.to_string(), true);
    }

    pub fn unused_imports(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .used
            .iter()
            .filter(|(_, used)| !**used)
            .map(|(dotted, _)| dotted.clone())
            .collect();
        names.sort();
        names
    }

    pub fn get(&self, dotted: &str) -> Option<&ResolvedModule> {
        self.cache.get(dotted)
    }

    pub fn loaded_modules(&self) -> impl Iterator<Item = (&String, &ResolvedModule)> {
        self.cache.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_module_path() {
        let r = ModuleResolver::new("src/std");
        assert_eq!(r.dotted_to_path("cz.fmt"), PathBuf::from("src/std/fmt.cz"));
    }

    #[test]
    fn nested_module_path() {
        let r = ModuleResolver::new("src/std");
        assert_eq!(r.dotted_to_path("cz.collections.vec"), PathBuf::from("src/std/collections/vec.cz"));
    }

    #[test]
    fn unused_imports_default_to_unused() {
        let mut r = ModuleResolver::new("src/std");
        r.used.insert("cz.fmt".to_string(), false);
        r.used.insert("cz.io".to_string(), true);
        assert_eq!(r.unused_imports(), vec!["cz.fmt".to_string()]);
    }
}
