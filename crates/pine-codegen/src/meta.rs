//! Pre-codegen metadata collection: one walk over the top-level statements
//! gathering the indicator/library declaration, input definitions, imports,
//! user types and methods, and user function names. Everything here is
//! consumed by the emission pass and by API callers inspecting a unit.

use crate::mappings::{self, InputType};
use pine_ast::{Argument, Expr, ImportInfo, Literal, MethodParam, Program, Stmt, TypeField};
use serde::Serialize;

/// A declared `input.*` call, in source order.
#[derive(Debug, Clone, Serialize)]
pub struct InputDefinition {
    pub name: String,
    pub input_type: InputType,
    /// Default value as an emitted TypeScript literal
    pub defval: String,
    pub title: Option<String>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LibraryInfo {
    pub name: String,
    pub overlay: bool,
}

#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub exported: bool,
    pub fields: Vec<TypeField>,
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub name: String,
    pub exported: bool,
    pub params: Vec<MethodParam>,
    pub body: Vec<Stmt>,
}

/// Per-unit program metadata.
#[derive(Debug, Clone, Default)]
pub struct ProgramMeta {
    pub title: String,
    pub overlay: bool,
    pub is_library: bool,
    pub library_info: Option<LibraryInfo>,
    pub inputs: Vec<InputDefinition>,
    pub imports: Vec<ImportInfo>,
    /// Declaration order preserved; keyed lookups walk the list
    pub types: Vec<TypeInfo>,
    /// (bound type, method), in source order
    pub methods: Vec<(String, MethodInfo)>,
    /// User function names declared at the top level
    pub functions: Vec<String>,
}

impl ProgramMeta {
    pub fn type_info(&self, name: &str) -> Option<&TypeInfo> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn methods_of(&self, type_name: &str) -> Vec<&MethodInfo> {
        self.methods
            .iter()
            .filter(|(bound, _)| bound == type_name)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn has_method(&self, type_name: &str, method: &str) -> bool {
        self.methods
            .iter()
            .any(|(bound, m)| bound == type_name && m.name == method)
    }

    pub fn input(&self, name: &str) -> Option<&InputDefinition> {
        self.inputs.iter().find(|i| i.name == name)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }
}

/// Collect unit metadata. Non-fatal oddities (a duplicate input name, an
/// unrecognized input member) are pushed onto `warnings`.
pub fn collect(program: &Program, warnings: &mut Vec<String>) -> ProgramMeta {
    let mut meta = ProgramMeta {
        title: "Indicator".to_string(),
        ..ProgramMeta::default()
    };

    for stmt in &program.statements {
        match stmt {
            Stmt::Expression(Expr::Call { callee, args, .. }) => {
                match callee.dotted_name().as_deref() {
                    Some("indicator") => collect_indicator(&mut meta, args),
                    Some("library") => collect_library(&mut meta, args),
                    _ => {}
                }
            }
            Stmt::VarDecl {
                name,
                initializer: Some(init),
                ..
            } => {
                if let Some(input) = extract_input(name, init, warnings) {
                    // Duplicates by name are ignored after the first
                    if meta.input(&input.name).is_none() {
                        meta.inputs.push(input);
                    } else {
                        warnings.push(format!("Duplicate input '{}' ignored", name));
                    }
                }
            }
            Stmt::Import(info) => meta.imports.push(info.clone()),
            Stmt::TypeDecl {
                name,
                fields,
                exported,
            } => meta.types.push(TypeInfo {
                name: name.clone(),
                exported: *exported,
                fields: fields.clone(),
            }),
            Stmt::MethodDecl {
                name,
                bound_type,
                params,
                body,
                exported,
            } => meta.methods.push((
                bound_type.clone(),
                MethodInfo {
                    name: name.clone(),
                    exported: *exported,
                    params: params.clone(),
                    body: body.clone(),
                },
            )),
            Stmt::FunctionDecl { name, .. } => meta.functions.push(name.clone()),
            _ => {}
        }
    }

    if meta.is_library {
        if let Some(info) = &meta.library_info {
            meta.title = info.name.clone();
            meta.overlay = info.overlay;
        }
    }

    meta
}

fn arg_by<'a>(args: &'a [Argument], name: &str, position: usize) -> Option<&'a Expr> {
    for arg in args {
        if let Argument::Named { name: arg_name, value } = arg {
            if arg_name == name {
                return Some(value);
            }
        }
    }
    args.iter()
        .filter_map(|a| match a {
            Argument::Positional(expr) => Some(expr),
            Argument::Named { .. } => None,
        })
        .nth(position)
}

fn string_value(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn number_value(expr: &Expr) -> Option<f64> {
    match expr {
        Expr::Literal(Literal::Number(n)) => Some(*n),
        Expr::Unary {
            op: pine_ast::UnOp::Neg,
            expr,
        } => number_value(expr).map(|n| -n),
        _ => None,
    }
}

fn bool_value(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal(Literal::Bool(b)) => Some(*b),
        _ => None,
    }
}

fn collect_indicator(meta: &mut ProgramMeta, args: &[Argument]) {
    if let Some(title) = arg_by(args, "title", 0).and_then(string_value) {
        meta.title = title;
    }
    if let Some(overlay) = arg_by(args, "overlay", 1).and_then(bool_value) {
        meta.overlay = overlay;
    }
}

fn collect_library(meta: &mut ProgramMeta, args: &[Argument]) {
    meta.is_library = true;
    let name = arg_by(args, "title", 0)
        .and_then(string_value)
        .unwrap_or_else(|| "Library".to_string());
    let overlay = arg_by(args, "overlay", 1).and_then(bool_value).unwrap_or(false);
    meta.library_info = Some(LibraryInfo { name, overlay });
}

/// Recognize `name = input.<t>(...)` / `name = input(...)` declarations.
fn extract_input(name: &str, init: &Expr, warnings: &mut Vec<String>) -> Option<InputDefinition> {
    let (callee, args) = match init {
        Expr::Call { callee, args, .. } => (callee, args),
        _ => return None,
    };

    let input_type = match callee.dotted_name().as_deref() {
        Some("input") => None, // inferred from the default value below
        Some(dotted) => match dotted.strip_prefix("input.") {
            Some(member) => match mappings::input_type(member) {
                Some(t) => Some(t),
                None => {
                    warnings.push(format!(
                        "Unsupported input kind 'input.{}' for '{}'",
                        member, name
                    ));
                    return None;
                }
            },
            None => return None,
        },
        None => return None,
    };

    let defval_expr = arg_by(args, "defval", 0);

    // Bare input() infers its kind from the default value
    let input_type = input_type.or_else(|| defval_expr.map(infer_input_type))?;

    let defval = match defval_expr {
        Some(expr) => input_default_literal(input_type, expr),
        None => default_for(input_type).to_string(),
    };

    let title = arg_by(args, "title", 1).and_then(|e| string_value(e));
    let min = args_named_number(args, "minval");
    let max = args_named_number(args, "maxval");
    let step = args_named_number(args, "step");

    let options = args.iter().find_map(|arg| match arg {
        Argument::Named { name, value } if name == "options" => match value {
            Expr::Array(elements) => Some(
                elements
                    .iter()
                    .filter_map(|e| match e {
                        Expr::Literal(Literal::String(s)) => Some(s.clone()),
                        Expr::Literal(Literal::Number(n)) => Some(n.to_string()),
                        _ => None,
                    })
                    .collect::<Vec<_>>(),
            ),
            _ => None,
        },
        _ => None,
    });

    Some(InputDefinition {
        name: name.to_string(),
        input_type,
        defval,
        title,
        min,
        max,
        step,
        options,
    })
}

fn args_named_number(args: &[Argument], name: &str) -> Option<f64> {
    args.iter().find_map(|arg| match arg {
        Argument::Named { name: n, value } if n == name => number_value(value),
        _ => None,
    })
}

fn infer_input_type(defval: &Expr) -> InputType {
    match defval {
        Expr::Variable(name) if mappings::SOURCE_NAMES.contains(&name.as_str()) => {
            InputType::Source
        }
        Expr::Literal(Literal::Bool(_)) => InputType::Bool,
        Expr::Literal(Literal::String(_)) => InputType::String,
        Expr::Literal(Literal::HexColor(_)) => InputType::Color,
        Expr::MemberAccess { object, .. }
            if matches!(object.as_ref(), Expr::Variable(n) if n == "color") =>
        {
            InputType::Color
        }
        _ => InputType::Float,
    }
}

fn default_for(input_type: InputType) -> &'static str {
    match input_type {
        InputType::Int | InputType::Float => "0",
        InputType::Bool => "false",
        InputType::String => "\"\"",
        InputType::Color => "\"#000000\"",
        InputType::Source => "\"close\"",
    }
}

/// Render an input default as a TypeScript literal.
fn input_default_literal(input_type: InputType, expr: &Expr) -> String {
    match input_type {
        InputType::Source => match expr {
            Expr::Variable(name) if mappings::SOURCE_NAMES.contains(&name.as_str()) => {
                format!("\"{}\"", name)
            }
            Expr::Literal(Literal::String(s)) => format!("\"{}\"", s),
            _ => "\"close\"".to_string(),
        },
        InputType::Color => match expr {
            Expr::Literal(Literal::HexColor(hex)) => format!("\"{}\"", hex),
            Expr::MemberAccess { object, member }
                if matches!(object.as_ref(), Expr::Variable(n) if n == "color") =>
            {
                mappings::color_hex(member)
                    .map(|hex| format!("\"{}\"", hex))
                    .unwrap_or_else(|| "\"#000000\"".to_string())
            }
            _ => "\"#000000\"".to_string(),
        },
        _ => match expr {
            Expr::Literal(Literal::Number(n)) => crate::format_number(*n),
            Expr::Literal(Literal::Bool(b)) => b.to_string(),
            Expr::Literal(Literal::String(s)) => format!("\"{}\"", s),
            Expr::Unary {
                op: pine_ast::UnOp::Neg,
                expr,
            } => match number_value(expr) {
                Some(n) => crate::format_number(-n),
                None => default_for(input_type).to_string(),
            },
            _ => default_for(input_type).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pine_lexer::Lexer;
    use pine_parser::Parser;

    fn collect_source(source: &str) -> (ProgramMeta, Vec<String>) {
        let (tokens, _) = Lexer::new(source).tokenize();
        let (stmts, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        let mut warnings = vec![];
        let meta = collect(&Program::new(stmts), &mut warnings);
        (meta, warnings)
    }

    #[test]
    fn test_indicator_metadata() {
        let (meta, _) = collect_source(r#"indicator(title="My MA", overlay=true)"#);
        assert_eq!(meta.title, "My MA");
        assert!(meta.overlay);
        assert!(!meta.is_library);
    }

    #[test]
    fn test_positional_title() {
        let (meta, _) = collect_source(r#"indicator("RSI")"#);
        assert_eq!(meta.title, "RSI");
    }

    #[test]
    fn test_default_title() {
        let (meta, _) = collect_source("x = close\n");
        assert_eq!(meta.title, "Indicator");
    }

    #[test]
    fn test_library_metadata() {
        let (meta, _) = collect_source(r#"library("MathLib", true)"#);
        assert!(meta.is_library);
        let info = meta.library_info.as_ref().unwrap();
        assert_eq!(info.name, "MathLib");
        assert!(info.overlay);
    }

    #[test]
    fn test_input_collection() {
        let source = "len = input.int(9, minval=1)\nsrc = input(close)\nshow = input.bool(true, \"Show\")\n";
        let (meta, _) = collect_source(source);
        assert_eq!(meta.inputs.len(), 3);

        assert_eq!(meta.inputs[0].name, "len");
        assert_eq!(meta.inputs[0].input_type, InputType::Int);
        assert_eq!(meta.inputs[0].defval, "9");
        assert_eq!(meta.inputs[0].min, Some(1.0));

        assert_eq!(meta.inputs[1].input_type, InputType::Source);
        assert_eq!(meta.inputs[1].defval, "\"close\"");

        assert_eq!(meta.inputs[2].input_type, InputType::Bool);
        assert_eq!(meta.inputs[2].title.as_deref(), Some("Show"));
    }

    #[test]
    fn test_duplicate_input_ignored() {
        let source = "len = input.int(9)\nlen = input.int(14)\n";
        let (meta, warnings) = collect_source(source);
        assert_eq!(meta.inputs.len(), 1);
        assert_eq!(meta.inputs[0].defval, "9");
        assert!(!warnings.is_empty());
    }

    #[test]
    fn test_types_and_methods() {
        let source = "type Point\n    float x\nmethod norm(Point this) => this.x\n";
        let (meta, _) = collect_source(source);
        assert!(meta.type_info("Point").is_some());
        assert!(meta.has_method("Point", "norm"));
        assert!(!meta.has_method("Point", "other"));
    }

    #[test]
    fn test_functions_and_imports() {
        let source = "import acme/MathLib/1 as m\nf(x) => x * 2\n";
        let (meta, _) = collect_source(source);
        assert_eq!(meta.imports.len(), 1);
        assert!(meta.is_function("f"));
    }

    #[test]
    fn test_color_input_default() {
        let (meta, _) = collect_source("c = input.color(color.red, \"Line\")\n");
        assert_eq!(meta.inputs[0].defval, "\"#FF0000\"");
    }
}
