//! # Module loader
//!
//! `spec.md` §4.F, §3.5. Resolves `import` paths to a shared [`Module`] per
//! canonical absolute path, detects import cycles, and hands evaluated
//! modules to [`crate::eval`]. Grounded on the teacher's single-file
//! compilation model, generalized here to the multi-module graph the
//! teacher's notation language never needed.

use crate::ast::{Program, TopDecl};
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::source::{FileId, SourceMap, Span};
use crate::value::Scope;
use log::debug;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Loaded,
    Evaluating,
    Evaluated,
}

pub struct Module {
    pub path: String,
    pub file: FileId,
    pub program: Program,
    pub scope: Scope,
    pub exports: BTreeMap<String, String>,
    pub state: ModuleState,
}

/// Owns the module cache for one compilation (§3.5, §5 "shared resources").
pub struct Loader<'a> {
    sources: &'a mut SourceMap,
    modules: BTreeMap<String, Module>,
    /// Cycle-detection stack of canonical paths currently being loaded.
    in_progress: Vec<String>,
}

impl<'a> Loader<'a> {
    pub fn new(sources: &'a mut SourceMap) -> Self {
        Self { sources, modules: BTreeMap::new(), in_progress: Vec::new() }
    }

    pub fn modules(&self) -> &BTreeMap<String, Module> {
        &self.modules
    }

    pub fn modules_mut(&mut self) -> &mut BTreeMap<String, Module> {
        &mut self.modules
    }

    /// Resolve an import path per §4.F.2: `std:X`, absolute `/...`, or
    /// relative to `from_dir` with lexical `.`/`..` normalization.
    pub fn resolve_path(path: &str, from_dir: &str) -> String {
        if path.starts_with("std:") {
            return path.to_string();
        }
        let joined = if let Some(rest) = path.strip_prefix('/') {
            format!("/{rest}")
        } else if from_dir.is_empty() {
            path.to_string()
        } else {
            format!("{from_dir}/{path}")
        };
        normalize_lexically(&joined)
    }

    /// Load (or fetch from cache) the module at `canonical_path`, returning
    /// its export table. `span` is the importing `import` statement's span,
    /// used to anchor any `ModuleNotFound`/`CircularImport` diagnostic.
    pub fn load(
        &mut self,
        canonical_path: &str,
        span: Span,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> BTreeMap<String, String> {
        if let Some(existing) = self.modules.get(canonical_path) {
            if existing.state == ModuleState::Evaluating {
                let chain = self.in_progress.join(" -> ");
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::CircularImport,
                    format!("circular import detected: {chain} -> {canonical_path}"),
                    span,
                ));
                return existing.exports.clone();
            }
            return existing.exports.clone();
        }

        let text = match self.read_source(canonical_path) {
            Some(t) => t,
            None => {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::ModuleNotFound,
                    format!("module not found: {canonical_path}"),
                    span,
                ));
                return BTreeMap::new();
            }
        };

        debug!("loading module {canonical_path}");
        let file = self.sources.add_file(canonical_path, &text);
        let parse_result = crate::parser::parse(&text, file);
        diagnostics.extend(parse_result.diagnostics);
        let program = parse_result.program;

        for decl in &program.body {
            if !matches!(decl, TopDecl::Fn(_) | TopDecl::Const(_) | TopDecl::Enum(_)) {
                diagnostics.push(Diagnostic::error(
                    DiagnosticCode::TopLevelExecutionInImport,
                    "only fn, const, enum, and import declarations are allowed in an imported module",
                    decl.span(),
                ));
            }
        }

        self.in_progress.push(canonical_path.to_string());
        self.modules.insert(
            canonical_path.to_string(),
            Module {
                path: canonical_path.to_string(),
                file,
                program,
                scope: Scope::root(),
                exports: BTreeMap::new(),
                state: ModuleState::Evaluating,
            },
        );

        let exports = crate::eval::evaluate_module(self, canonical_path, diagnostics);

        self.in_progress.pop();
        if let Some(module) = self.modules.get_mut(canonical_path) {
            module.exports = exports.clone();
            module.state = ModuleState::Evaluated;
        }
        debug!("finished module {canonical_path}");
        exports
    }

    fn read_source(&self, canonical_path: &str) -> Option<String> {
        if let Some(name) = canonical_path.strip_prefix("std:") {
            return crate::stdlib::source_for(name).map(str::to_string);
        }
        std::fs::read_to_string(canonical_path).ok()
    }
}

/// Lexically collapses `.`/`..` segments in a `/`-joined path without
/// touching the filesystem (§4.F.2).
fn normalize_lexically(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_paths_are_not_rewritten() {
        assert_eq!(Loader::resolve_path("std:core", "/proj"), "std:core");
    }

    #[test]
    fn relative_paths_join_and_normalize() {
        assert_eq!(Loader::resolve_path("../lib/a.mfs", "/proj/songs"), "/proj/lib/a.mfs");
    }

    #[test]
    fn absolute_paths_pass_through_normalization() {
        assert_eq!(Loader::resolve_path("/a/./b/../c.mfs", "/proj"), "/a/c.mfs");
    }
}
