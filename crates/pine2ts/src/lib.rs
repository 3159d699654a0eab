//! Facade over the transpiler pipeline: lexer -> parser -> analyzer ->
//! generator, with library resolution layered on top. `transpile` throws on
//! parse errors; `transpile_with_result` never does.

// Re-export the pipeline crates for embedders
pub use pine_analyzer as analyzer;
pub use pine_ast as ast;
pub use pine_codegen as codegen;
pub use pine_lexer as lexer;
pub use pine_parser as parser;
pub use pine_resolver as resolver;

use pine_analyzer::analyze;
use pine_ast::Program;
use pine_codegen::{GeneratedCode, GeneratorOptions, OutputFormat};
use pine_lexer::Lexer;
use pine_parser::Parser;
use pine_resolver::{DiskFs, Resolver, ResolverError, TranspiledLibrary};
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Parse(String),

    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// A collected lexer/parser/semantic diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub line: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TranspileOptions {
    /// Diagnostic label used in error messages
    pub filename: Option<String>,
    pub format: OutputFormat,
    pub include_imports: bool,
    /// Root of the library source tree for import resolution
    pub library_base_path: Option<PathBuf>,
    /// Reserved; the core never emits sourcemaps
    pub sourcemap: bool,
}

impl Default for TranspileOptions {
    fn default() -> Self {
        Self {
            filename: None,
            format: OutputFormat::Function,
            include_imports: true,
            library_base_path: None,
            sourcemap: false,
        }
    }
}

/// Structured transpilation outcome: parse errors empty the code, semantic
/// errors accompany a best-effort translation.
#[derive(Debug, Clone)]
pub struct TranspileResult {
    pub code: String,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<String>,
}

/// A unit plus its resolved library dependencies, dependencies first.
#[derive(Debug, Clone)]
pub struct ProjectOutput {
    pub main: String,
    pub libraries: Vec<TranspiledLibrary>,
}

fn parse_unit(source: &str) -> (Program, Vec<Diagnostic>) {
    let (tokens, lex_errors) = Lexer::new(source).tokenize();
    let (statements, parse_errors) = Parser::new(tokens).parse();

    let mut diagnostics: Vec<Diagnostic> = lex_errors
        .iter()
        .map(|e| Diagnostic {
            message: e.to_string(),
            line: Some(e.line()),
        })
        .collect();
    diagnostics.extend(parse_errors.iter().map(|e| Diagnostic {
        message: e.to_string(),
        line: Some(e.line()),
    }));

    (Program::new(statements), diagnostics)
}

fn generator_options(options: &TranspileOptions) -> GeneratorOptions {
    GeneratorOptions {
        include_imports: options.include_imports,
        format: options.format,
    }
}

fn generate_unit(program: &Program, options: &TranspileOptions) -> GeneratedCode {
    let analysis = analyze(program);
    pine_codegen::generate(program, &analysis, &generator_options(options))
}

/// Transpile a source unit, raising on any parse error.
pub fn transpile(source: &str, options: &TranspileOptions) -> Result<String, Error> {
    let (program, parse_diagnostics) = parse_unit(source);

    if let Some(first) = parse_diagnostics.first() {
        let label = options.filename.as_deref().unwrap_or("<input>");
        return Err(Error::Parse(format!("{}: {}", label, first.message)));
    }

    Ok(generate_unit(&program, options).code)
}

/// Transpile a source unit without throwing: parse errors return an empty
/// code string and the error list; semantic errors are reported alongside a
/// best-effort translation.
pub fn transpile_with_result(source: &str, options: &TranspileOptions) -> TranspileResult {
    let (program, parse_diagnostics) = parse_unit(source);

    if !parse_diagnostics.is_empty() {
        return TranspileResult {
            code: String::new(),
            errors: parse_diagnostics,
            warnings: vec![],
        };
    }

    let analysis = analyze(&program);
    let errors = analysis
        .errors
        .iter()
        .map(|e| Diagnostic {
            message: format!("{:?}: {}", e.kind, e.message),
            line: None,
        })
        .collect();

    let generated = pine_codegen::generate(&program, &analysis, &generator_options(options));

    TranspileResult {
        code: generated.code,
        errors,
        warnings: generated.warnings,
    }
}

/// Transpile a unit and every library it imports, recursively. Libraries
/// are resolved from `library_base_path` (or the current directory) and
/// returned dependency-first.
pub fn transpile_with_libraries(
    source: &str,
    options: &TranspileOptions,
) -> Result<ProjectOutput, Error> {
    let (program, parse_diagnostics) = parse_unit(source);
    if let Some(first) = parse_diagnostics.first() {
        let label = options.filename.as_deref().unwrap_or("<input>");
        return Err(Error::Parse(format!("{}: {}", label, first.message)));
    }

    let imports: Vec<_> = program.imports().into_iter().cloned().collect();
    let libraries = if imports.is_empty() {
        vec![]
    } else {
        let base = options
            .library_base_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let fs = DiskFs::new(base);
        let mut resolver = Resolver::new(&fs);

        let lib_options = options.clone();
        resolver.resolve(&imports, &mut |lib_source, info| {
            let mut unit_options = lib_options.clone();
            unit_options.filename = Some(info.key());
            transpile(lib_source, &unit_options).map_err(|e| e.to_string())
        })?
    };

    let main = generate_unit(&program, options).code;
    Ok(ProjectOutput { main, libraries })
}
