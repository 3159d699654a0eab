//! Library import resolution: depth-first descent over the import graph
//! with a completed cache, an in-progress set for cycle detection, and a
//! dependency-first output order. Transpilation of each library is injected
//! as a callback so this crate stays independent of the generator.

use pine_ast::{ImportInfo, Program};
use pine_lexer::Lexer;
use pine_parser::Parser;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Library '{key}' not found at {path}: {source}")]
    LibraryNotFound {
        key: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cyclic import detected at '{key}'")]
    CyclicImport { key: String },

    #[error("Failed to parse library '{key}': {message}")]
    Parse { key: String, message: String },

    #[error("Failed to transpile library '{key}': {message}")]
    Transpile { key: String, message: String },
}

/// One transpiled library module.
#[derive(Debug, Clone)]
pub struct TranspiledLibrary {
    /// `publisher/name/version`
    pub key: String,
    /// `publisher_name_vversion`, the emitted module name
    pub module_name: String,
    pub code: String,
    /// Keys of the libraries this one imports, in source order
    pub dependencies: Vec<String>,
}

/// Filesystem access for library sources. Injected so tests and embedders
/// can resolve from memory.
pub trait LibraryFs {
    fn read(&self, relative_path: &str) -> std::io::Result<String>;
}

/// Disk-backed library source tree rooted at a base path.
pub struct DiskFs {
    base: PathBuf,
}

impl DiskFs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl LibraryFs for DiskFs {
    fn read(&self, relative_path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.base.join(relative_path))
    }
}

/// Callback transpiling one library source; the error string is wrapped
/// into `ResolverError::Transpile`.
pub type TranspileFn<'a> = dyn FnMut(&str, &ImportInfo) -> Result<String, String> + 'a;

pub struct Resolver<'f> {
    fs: &'f dyn LibraryFs,
    cache: HashMap<String, TranspiledLibrary>,
    in_progress: HashSet<String>,
}

impl<'f> Resolver<'f> {
    pub fn new(fs: &'f dyn LibraryFs) -> Self {
        Self {
            fs,
            cache: HashMap::new(),
            in_progress: HashSet::new(),
        }
    }

    /// Resolve a unit's imports into an ordered list of transpiled
    /// libraries, each appearing after all of its dependencies. The order is
    /// stable under source order and idempotent on a warm cache.
    pub fn resolve(
        &mut self,
        imports: &[ImportInfo],
        transpile: &mut TranspileFn<'_>,
    ) -> Result<Vec<TranspiledLibrary>, ResolverError> {
        let mut order: Vec<String> = vec![];
        for import in imports {
            self.resolve_one(import, transpile, &mut order)?;
        }

        Ok(order
            .iter()
            .map(|key| {
                // SAFETY: every key in order was inserted into the cache
                self.cache.get(key).cloned().unwrap()
            })
            .collect())
    }

    fn resolve_one(
        &mut self,
        import: &ImportInfo,
        transpile: &mut TranspileFn<'_>,
        order: &mut Vec<String>,
    ) -> Result<(), ResolverError> {
        let key = import.key();

        if self.cache.contains_key(&key) {
            debug!(key = %key, "library cache hit");
            self.mark_in_order(&key, order);
            return Ok(());
        }

        if self.in_progress.contains(&key) {
            return Err(ResolverError::CyclicImport { key });
        }
        self.in_progress.insert(key.clone());

        let path = import.file_name();
        let source = self
            .fs
            .read(&path)
            .map_err(|source| ResolverError::LibraryNotFound {
                key: key.clone(),
                path: path.clone(),
                source,
            })?;

        let dependencies = parse_imports(&key, &source)?;

        // Dependencies first, then the library itself (post-order)
        for dependency in &dependencies {
            self.resolve_one(dependency, transpile, order)?;
        }

        let code = transpile(&source, import).map_err(|message| ResolverError::Transpile {
            key: key.clone(),
            message,
        })?;

        debug!(key = %key, deps = dependencies.len(), "library transpiled");

        self.cache.insert(
            key.clone(),
            TranspiledLibrary {
                key: key.clone(),
                module_name: import.module_name(),
                code,
                dependencies: dependencies.iter().map(ImportInfo::key).collect(),
            },
        );
        self.in_progress.remove(&key);
        order.push(key);

        Ok(())
    }

    /// Append a cached key to the order, dependencies first.
    fn mark_in_order(&self, key: &str, order: &mut Vec<String>) {
        if order.iter().any(|k| k == key) {
            return;
        }
        if let Some(lib) = self.cache.get(key) {
            let dependencies = lib.dependencies.clone();
            for dependency in &dependencies {
                self.mark_in_order(dependency, order);
            }
        }
        order.push(key.to_string());
    }
}

fn parse_imports(key: &str, source: &str) -> Result<Vec<ImportInfo>, ResolverError> {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    if let Some(first) = lex_errors.first() {
        return Err(ResolverError::Parse {
            key: key.to_string(),
            message: first.to_string(),
        });
    }

    let (statements, parse_errors) = Parser::new(tokens).parse();
    if let Some(first) = parse_errors.first() {
        return Err(ResolverError::Parse {
            key: key.to_string(),
            message: first.to_string(),
        });
    }

    let program = Program::new(statements);
    Ok(program.imports().into_iter().cloned().collect())
}
