//! Semantic analysis for parsed PineScript programs: scope resolution,
//! builtin recognition, arity checks, loop-control checks, and the
//! inference side tables the code generator consumes.

use pine_ast::{Argument, Expr, Program, Stmt};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

pub mod builtins;
pub mod inference;

pub use builtins::{builtin_arity, is_builtin_variable, is_immutable, is_namespace, Arity};

/// Closed set of semantic error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UndefinedVariable,
    DuplicateDeclaration,
    ConstReassignment,
    WrongArgumentCount,
    BreakOutsideLoop,
    ContinueOutsideLoop,
}

#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct SemanticError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SemanticError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Result of analyzing one compilation unit.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub valid: bool,
    pub errors: Vec<SemanticError>,
    /// Names ever reassigned with `:=`
    pub reassigned: HashSet<String>,
    /// Reassigned names whose RHS references their own prior bar value
    pub recursive: HashSet<String>,
}

/// Analyze a program: all errors are collected in one pass; the analyzer
/// never stops at the first problem.
pub fn analyze(program: &Program) -> Analysis {
    let mut analyzer = Analyzer::new(program);
    analyzer.run(program);

    let reassigned = inference::reassigned_variables(program);
    let recursive = inference::recursive_variables(program);

    Analysis {
        valid: analyzer.errors.is_empty(),
        errors: analyzer.errors,
        reassigned,
        recursive,
    }
}

struct Analyzer {
    scopes: Vec<HashSet<String>>,
    errors: Vec<SemanticError>,
    loop_depth: usize,
    /// User type names (`Point.new` resolves through these)
    user_types: HashSet<String>,
    /// Import aliases and library names behave like namespaces
    import_names: HashSet<String>,
}

impl Analyzer {
    fn new(program: &Program) -> Self {
        // Hoist type names and import aliases: both may be referenced before
        // their declaring line in valid scripts, and the generator emits them
        // ahead of the body anyway.
        let mut user_types = HashSet::new();
        let mut import_names = HashSet::new();
        for stmt in &program.statements {
            match stmt {
                Stmt::TypeDecl { name, .. } => {
                    user_types.insert(name.clone());
                }
                Stmt::Import(info) => {
                    import_names.insert(info.local_name().to_string());
                }
                _ => {}
            }
        }

        Self {
            scopes: vec![HashSet::new()],
            errors: vec![],
            loop_depth: 0,
            user_types,
            import_names,
        }
    }

    fn run(&mut self, program: &Program) {
        for stmt in &program.statements {
            self.check_stmt(stmt);
        }
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(SemanticError::new(kind, message));
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashSet::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Declare a name in the current scope. Shadowing an outer scope is
    /// allowed; redeclaring within the same scope is not.
    fn declare(&mut self, name: &str) {
        // SAFETY: scopes always has at least the global scope
        let scope = self.scopes.last_mut().unwrap();
        if !scope.insert(name.to_string()) {
            self.error(
                ErrorKind::DuplicateDeclaration,
                format!("Variable '{}' is already declared in this scope", name),
            );
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn resolves(&self, name: &str) -> bool {
        self.is_declared(name)
            || builtins::is_builtin_variable(name)
            || builtins::is_namespace(name)
            || builtins::is_builtin_function(name)
            || self.user_types.contains(name)
            || self.import_names.contains(name)
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl {
                name, initializer, ..
            } => {
                if let Some(init) = initializer {
                    self.check_expr(init);
                }
                self.declare(name);
            }
            Stmt::Assignment { target, value } => {
                self.check_expr(value);
                match target {
                    Expr::Variable(name) => {
                        if builtins::is_immutable(name) {
                            self.error(
                                ErrorKind::ConstReassignment,
                                format!("Cannot reassign built-in '{}'", name),
                            );
                        } else if !self.is_declared(name) {
                            self.error(
                                ErrorKind::UndefinedVariable,
                                format!("Cannot reassign undeclared variable '{}'", name),
                            );
                        }
                    }
                    other => self.check_expr(other),
                }
            }
            Stmt::TupleAssignment { names, value } => {
                self.check_expr(value);
                for name in names {
                    self.declare(name);
                }
            }
            Stmt::Expression(expr) => self.check_expr(expr),
            Stmt::If {
                condition,
                then_branch,
                else_if_branches,
                else_branch,
            } => {
                self.check_expr(condition);
                self.check_block(then_branch);
                for (cond, branch) in else_if_branches {
                    self.check_expr(cond);
                    self.check_block(branch);
                }
                if let Some(branch) = else_branch {
                    self.check_block(branch);
                }
            }
            Stmt::For {
                var_name,
                from,
                to,
                step,
                body,
            } => {
                self.check_expr(from);
                self.check_expr(to);
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.push_scope();
                self.declare(var_name);
                self.loop_depth += 1;
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.loop_depth -= 1;
                self.pop_scope();
            }
            Stmt::ForIn {
                index_var,
                item_var,
                collection,
                body,
            } => {
                self.check_expr(collection);
                self.push_scope();
                if let Some(index) = index_var {
                    self.declare(index);
                }
                self.declare(item_var);
                self.loop_depth += 1;
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.loop_depth -= 1;
                self.pop_scope();
            }
            Stmt::While { condition, body } => {
                self.check_expr(condition);
                self.push_scope();
                self.loop_depth += 1;
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.loop_depth -= 1;
                self.pop_scope();
            }
            Stmt::Break => {
                if self.loop_depth == 0 {
                    self.error(ErrorKind::BreakOutsideLoop, "'break' used outside of a loop");
                }
            }
            Stmt::Continue => {
                if self.loop_depth == 0 {
                    self.error(
                        ErrorKind::ContinueOutsideLoop,
                        "'continue' used outside of a loop",
                    );
                }
            }
            Stmt::TypeDecl { fields, .. } => {
                for field in fields {
                    if let Some(default) = &field.default_value {
                        self.check_expr(default);
                    }
                }
            }
            Stmt::MethodDecl { params, body, .. } => {
                self.push_scope();
                self.declare("this");
                for param in params {
                    self.declare(&param.name);
                    if let Some(default) = &param.default_value {
                        self.check_expr(default);
                    }
                }
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.pop_scope();
            }
            Stmt::FunctionDecl { name, params, body, .. } => {
                self.declare(name);
                self.push_scope();
                for param in params {
                    self.declare(&param.name);
                    if let Some(default) = &param.default_value {
                        self.check_expr(default);
                    }
                }
                for stmt in body {
                    self.check_stmt(stmt);
                }
                self.pop_scope();
            }
            Stmt::Import(_) => {}
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) {
        self.push_scope();
        for stmt in stmts {
            self.check_stmt(stmt);
        }
        self.pop_scope();
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Variable(name) => {
                if !self.resolves(name) {
                    self.error(
                        ErrorKind::UndefinedVariable,
                        format!("Undefined variable '{}'", name),
                    );
                }
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            Expr::Unary { expr, .. } => self.check_expr(expr),
            Expr::Call { callee, args, .. } => self.check_call(callee, args),
            Expr::HistoryAccess { expr, offset } => {
                self.check_expr(expr);
                self.check_expr(offset);
            }
            Expr::MemberAccess { object, .. } => {
                // Namespace members (ta.sma, barstate.isfirst) and members of
                // resolvable objects are fine; only the base is resolved.
                self.check_expr(object);
            }
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.check_expr(condition);
                self.check_expr(then_expr);
                self.check_expr(else_expr);
            }
            Expr::Array(elements) => {
                for element in elements {
                    self.check_expr(element);
                }
            }
            Expr::Switch {
                scrutinee,
                cases,
                default,
            } => {
                if let Some(scrutinee) = scrutinee {
                    self.check_expr(scrutinee);
                }
                for case in cases {
                    self.check_expr(&case.pattern);
                    self.check_expr(&case.result);
                }
                if let Some(default) = default {
                    self.check_expr(default);
                }
            }
            Expr::Literal(_) => {}
        }
    }

    fn check_call(&mut self, callee: &Expr, args: &[Argument]) {
        // Arity check against the builtin registry. Named arguments never
        // count toward the mismatch; their values are still resolved below.
        if let Some(name) = callee.dotted_name() {
            let positional = args
                .iter()
                .filter(|a| matches!(a, Argument::Positional(_)))
                .count();
            let has_named = args.iter().any(|a| matches!(a, Argument::Named { .. }));

            if let Some(arity) = builtins::builtin_arity(&name) {
                if !has_named && positional < arity.required {
                    self.error(
                        ErrorKind::WrongArgumentCount,
                        format!(
                            "'{}' expects at least {} argument(s), got {}",
                            name, arity.required, positional
                        ),
                    );
                }
            }

            // For a dotted builtin the base namespace needs no resolution;
            // for a plain name, resolve it as usual.
            if let Expr::Variable(base) = callee {
                if !self.resolves(base) {
                    self.error(
                        ErrorKind::UndefinedVariable,
                        format!("Undefined function '{}'", base),
                    );
                }
            } else if let Expr::MemberAccess { object, .. } = callee {
                if let Expr::Variable(base) = object.as_ref() {
                    if !self.resolves(base) {
                        self.error(
                            ErrorKind::UndefinedVariable,
                            format!("Undefined namespace '{}'", base),
                        );
                    }
                } else {
                    self.check_expr(object);
                }
            }
        } else {
            self.check_expr(callee);
        }

        for arg in args {
            self.check_expr(arg.value());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pine_lexer::Lexer;
    use pine_parser::Parser;

    fn analyze_source(source: &str) -> Analysis {
        let (tokens, _) = Lexer::new(source).tokenize();
        let (stmts, errors) = Parser::new(tokens).parse();
        assert!(errors.is_empty(), "parse errors: {:?}", errors);
        analyze(&Program::new(stmts))
    }

    fn kinds(analysis: &Analysis) -> Vec<ErrorKind> {
        analysis.errors.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_clean_program() {
        let analysis = analyze_source("x = close\ny = ta.sma(x, 14)\nplot(y)\n");
        assert!(analysis.valid, "errors: {:?}", analysis.errors);
    }

    #[test]
    fn test_undefined_variable() {
        let analysis = analyze_source("x = undefined_var\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::UndefinedVariable]);
    }

    #[test]
    fn test_const_reassignment() {
        let analysis = analyze_source("close := 20\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::ConstReassignment]);
    }

    #[test]
    fn test_reassign_unknown() {
        let analysis = analyze_source("ghost := 1\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::UndefinedVariable]);
    }

    #[test]
    fn test_wrong_argument_count() {
        let analysis = analyze_source("x = ta.sma(close)\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::WrongArgumentCount]);
    }

    #[test]
    fn test_named_args_skip_arity() {
        let analysis = analyze_source(r#"indicator(title="MA")"#);
        assert!(analysis.valid, "errors: {:?}", analysis.errors);
    }

    #[test]
    fn test_break_outside_loop() {
        let analysis = analyze_source("break\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::BreakOutsideLoop]);
    }

    #[test]
    fn test_continue_outside_loop() {
        let analysis = analyze_source("continue\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::ContinueOutsideLoop]);
    }

    #[test]
    fn test_break_inside_loop_ok() {
        let analysis = analyze_source("for i = 0 to 10\n    break\n");
        assert!(analysis.valid);
    }

    #[test]
    fn test_duplicate_declaration() {
        let analysis = analyze_source("x = 1\nx = 2\n");
        assert_eq!(kinds(&analysis), vec![ErrorKind::DuplicateDeclaration]);
    }

    #[test]
    fn test_shadowing_in_nested_scope_allowed() {
        let analysis = analyze_source("x = 1\nif close > open\n    x = 2\n");
        assert!(analysis.valid, "errors: {:?}", analysis.errors);
    }

    #[test]
    fn test_reassignment_without_var_allowed() {
        // Phase-1 leniency
        let analysis = analyze_source("x = 1\nx := 2\n");
        assert!(analysis.valid);
    }

    #[test]
    fn test_failure_set_one_of_each() {
        // Each failure kind is reported exactly once
        let source = "x = undefined_var\nclose := 20\ny = ta.sma(close)\nbreak\n";
        let analysis = analyze_source(source);
        assert!(!analysis.valid);

        let kinds = kinds(&analysis);
        for expected in [
            ErrorKind::UndefinedVariable,
            ErrorKind::ConstReassignment,
            ErrorKind::WrongArgumentCount,
            ErrorKind::BreakOutsideLoop,
        ] {
            assert_eq!(
                kinds.iter().filter(|&&k| k == expected).count(),
                1,
                "expected exactly one {:?} in {:?}",
                expected,
                kinds
            );
        }
    }

    #[test]
    fn test_user_function_call_resolves() {
        let analysis = analyze_source("f(x) => x * 2\ny = f(close)\n");
        assert!(analysis.valid, "errors: {:?}", analysis.errors);
    }

    #[test]
    fn test_user_type_and_method() {
        let source = "type Point\n    float x\n    float y\nmethod norm(Point this) => this.x\np = Point.new()\nq = p.norm()\n";
        let analysis = analyze_source(source);
        assert!(analysis.valid, "errors: {:?}", analysis.errors);
    }

    #[test]
    fn test_import_alias_is_namespace() {
        let analysis = analyze_source("import acme/MathLib/1 as m\nx = m.double(close)\n");
        assert!(analysis.valid, "errors: {:?}", analysis.errors);
    }

    #[test]
    fn test_analysis_side_tables() {
        let source = "mg = 0.0\nmg := mg[1] + 1\nx = 1\nx := 2\n";
        let analysis = analyze_source(source);
        assert!(analysis.reassigned.contains("mg"));
        assert!(analysis.reassigned.contains("x"));
        assert!(analysis.recursive.contains("mg"));
        assert!(!analysis.recursive.contains("x"));
    }
}
