//! Statement translation: declarations, reassignments (including the
//! recursive-formula rewrite into a per-bar loop), control flow, and user
//! function bodies.

use crate::expr::Mode;
use crate::{sanitize_identifier, Generator};
use pine_ast::{DeclKind, Expr, Literal, Stmt, UnOp};
use tracing::debug;

/// Display calls the generator skips with a warning.
const SKIPPED_DISPLAY_FUNCTIONS: [&str; 8] = [
    "hline",
    "bgcolor",
    "barcolor",
    "plotshape",
    "plotchar",
    "plotarrow",
    "plotcandle",
    "plotbar",
];

impl Generator<'_> {
    pub(crate) fn gen_stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.gen_stmt(stmt);
        }
    }

    pub(crate) fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::VarDecl {
                name,
                type_annotation,
                initializer,
                kind,
            } => self.gen_var_decl(name, type_annotation.as_deref(), initializer.as_ref(), *kind),
            Stmt::Assignment { target, value } => self.gen_assignment(target, value),
            Stmt::TupleAssignment { names, value } => {
                let value_code = self.gen_expr(value);
                let any_reassigned = names.iter().any(|n| self.analysis.reassigned.contains(n));
                let bound: Vec<String> = names.iter().map(|n| self.bind(n)).collect();
                let keyword = if any_reassigned { "let" } else { "const" };
                self.write_line(&format!(
                    "{} [{}] = {};",
                    keyword,
                    bound.join(", "),
                    value_code
                ));
            }
            Stmt::Expression(expr) => self.gen_expression_stmt(expr),
            Stmt::If {
                condition,
                then_branch,
                else_if_branches,
                else_branch,
            } => {
                let condition_code = self.gen_expr(condition);
                self.write_line(&format!("if ({}) {{", condition_code));
                self.gen_block(then_branch);
                for (else_if_condition, branch) in else_if_branches {
                    let code = self.gen_expr(else_if_condition);
                    self.write_line(&format!("}} else if ({}) {{", code));
                    self.gen_block(branch);
                }
                if let Some(branch) = else_branch {
                    self.write_line("} else {");
                    self.gen_block(branch);
                }
                self.write_line("}");
            }
            Stmt::For {
                var_name,
                from,
                to,
                step,
                body,
            } => self.gen_for(var_name, from, to, step.as_ref(), body),
            Stmt::ForIn {
                index_var,
                item_var,
                collection,
                body,
            } => {
                let collection_code = self.gen_expr(collection);
                self.push_scope();
                match index_var {
                    Some(index) => {
                        let index_name = self.bind(index);
                        let item_name = self.bind(item_var);
                        self.write_line(&format!(
                            "for (const [{}, {}] of {}.entries()) {{",
                            index_name, item_name, collection_code
                        ));
                    }
                    None => {
                        let item_name = self.bind(item_var);
                        self.write_line(&format!(
                            "for (const {} of {}) {{",
                            item_name, collection_code
                        ));
                    }
                }
                self.indent += 1;
                self.gen_stmts(body);
                self.indent -= 1;
                self.pop_scope();
                self.write_line("}");
            }
            Stmt::While { condition, body } => {
                let condition_code = self.gen_expr(condition);
                self.write_line(&format!("while ({}) {{", condition_code));
                self.gen_block(body);
                self.write_line("}");
            }
            Stmt::Break => self.write_line("break;"),
            Stmt::Continue => self.write_line("continue;"),
            Stmt::FunctionDecl {
                name, params, body, ..
            } => self.gen_function(name, params, body),
            // Emitted ahead of the body from the collected metadata
            Stmt::TypeDecl { .. } | Stmt::MethodDecl { .. } | Stmt::Import(_) => {}
        }
    }

    fn gen_block(&mut self, stmts: &[Stmt]) {
        self.push_scope();
        self.indent += 1;
        self.gen_stmts(stmts);
        self.indent -= 1;
        self.pop_scope();
    }

    fn gen_var_decl(
        &mut self,
        name: &str,
        type_annotation: Option<&str>,
        initializer: Option<&Expr>,
        _kind: DeclKind,
    ) {
        // Input declarations were captured into the inputs record
        if self.meta.input(name).is_some() && matches!(initializer, Some(init) if is_input_call(init))
        {
            return;
        }

        // `p = plot(...)` binds the name to the plot id for later fill()
        if let Some(Expr::Call { callee, args, .. }) = initializer {
            if callee.dotted_name().as_deref() == Some("plot") {
                let id = self.gen_plot(args);
                self.plot_vars.insert(name.to_string(), id);
                return;
            }
        }

        let reassigned = self.analysis.reassigned.contains(name);
        let emitted = self.bind(name);

        let Some(init) = initializer else {
            // Declaration without initializer: typed default, NaN otherwise
            let default = type_annotation
                .and_then(crate::mappings::primitive_type)
                .map(|(_, default)| default)
                .unwrap_or("NaN");
            self.write_line(&format!("let {} = {};", emitted, default));
            return;
        };

        // A reassigned numeric seed becomes a constant series so later
        // assignments can flow through series methods
        if reassigned {
            if let Expr::Literal(Literal::Number(n)) = init {
                self.series_vars.insert(name.to_string());
                self.write_line(&format!(
                    "let {} = Series.fromScalar(bars, {});",
                    emitted,
                    crate::format_number(*n)
                ));
                return;
            }
        }

        if self.is_series_expr(init) {
            self.series_vars.insert(name.to_string());
        }
        if let Some(type_name) = self.static_type_of(init) {
            self.var_types.insert(name.to_string(), type_name);
        }

        let keyword = if reassigned { "let" } else { "const" };
        let init_code = self.gen_expr(init);
        self.write_line(&format!("{} {} = {};", keyword, emitted, init_code));
    }

    fn gen_assignment(&mut self, target: &Expr, value: &Expr) {
        match target {
            Expr::Variable(name) => {
                if self.analysis.recursive.contains(name.as_str()) {
                    self.gen_recursive_assignment(name, value);
                    return;
                }

                let emitted = match self.lookup(name) {
                    Some(emitted) => emitted,
                    None => {
                        // Best-effort for code the analyzer already flagged
                        let emitted = self.bind(name);
                        self.write_line(&format!("let {} = NaN;", emitted));
                        emitted
                    }
                };

                if self.is_series_expr(value) {
                    self.series_vars.insert(name.clone());
                }
                let value_code = self.gen_expr(value);
                self.write_line(&format!("{} = {};", emitted, value_code));
            }
            _ => {
                let target_code = self.gen_expr(target);
                let value_code = self.gen_expr(value);
                self.write_line(&format!("{} = {};", target_code, value_code));
            }
        }
    }

    /// The recursive-formula rewrite: `x := rhs(x[k], ...)` becomes a value
    /// array filled bar by bar, with the previous element as the carry, then
    /// a rebinding of `x` as a series over the array.
    fn gen_recursive_assignment(&mut self, name: &str, value: &Expr) {
        let emitted = match self.lookup(name) {
            Some(emitted) => emitted,
            None => {
                let emitted = self.bind(name);
                self.write_line(&format!("let {} = Series.fromScalar(bars, NaN);", emitted));
                emitted
            }
        };

        let values_name = format!("{}Values", emitted);
        let prev_name = format!("{}Prev", emitted);

        self.write_line(&format!(
            "const {} = new Array(bars.length).fill(NaN);",
            values_name
        ));
        self.write_line("for (let i = 0; i < bars.length; i++) {");
        self.indent += 1;
        self.write_line(&format!(
            "const {} = i > 0 ? {}[i - 1] : NaN;",
            prev_name, values_name
        ));

        let rhs = self.expr(
            value,
            Mode::Rec {
                var: name,
                prev: &prev_name,
            },
        );
        self.write_line(&format!("{}[i] = {};", values_name, rhs));

        self.indent -= 1;
        self.write_line("}");
        self.write_line(&format!(
            "{} = Series.fromArray(bars, {});",
            emitted, values_name
        ));

        self.series_vars.insert(name.to_string());
    }

    fn gen_expression_stmt(&mut self, expr: &Expr) {
        if let Expr::Call { callee, args, .. } = expr {
            match callee.dotted_name().as_deref() {
                // Collected during the metadata prescan
                Some("indicator") | Some("library") => return,
                Some("plot") => {
                    self.gen_plot(args);
                    return;
                }
                Some("fill") => {
                    self.gen_fill(args);
                    return;
                }
                Some(name) if SKIPPED_DISPLAY_FUNCTIONS.contains(&name) => {
                    debug!(function = name, "skipping unsupported display function");
                    self.warnings
                        .push(format!("Display function '{}' is not supported; skipped", name));
                    return;
                }
                Some(name) if name == "input" || name.starts_with("input.") => {
                    self.warnings.push(format!(
                        "'{}' outside a declaration has no effect; skipped",
                        name
                    ));
                    return;
                }
                _ => {}
            }
        }

        let code = self.gen_expr(expr);
        self.write_line(&format!("{};", code));
    }

    fn gen_for(
        &mut self,
        var_name: &str,
        from: &Expr,
        to: &Expr,
        step: Option<&Expr>,
        body: &[Stmt],
    ) {
        let from_code = self.gen_expr(from);
        let to_code = self.gen_expr(to);

        self.push_scope();
        let loop_var = self.bind(var_name);

        match step {
            None => self.write_line(&format!(
                "for (let {v} = {}; {v} <= {}; {v}++) {{",
                from_code,
                to_code,
                v = loop_var
            )),
            Some(step) => {
                let descending = is_negative_literal(step);
                let step_code = self.gen_expr(step);
                let comparison = if descending { ">=" } else { "<=" };
                self.write_line(&format!(
                    "for (let {v} = {}; {v} {} {}; {v} += {}) {{",
                    from_code,
                    comparison,
                    to_code,
                    step_code,
                    v = loop_var
                ));
            }
        }

        self.indent += 1;
        self.gen_stmts(body);
        self.indent -= 1;
        self.pop_scope();
        self.write_line("}");
    }

    /// A user function. The last expression statement in the body is its
    /// return value.
    pub(crate) fn gen_function(&mut self, name: &str, params: &[pine_ast::FunctionParam], body: &[Stmt]) {
        let fn_name = sanitize_identifier(name);

        self.push_scope();
        let mut rendered_params = Vec::with_capacity(params.len());
        for param in params {
            let bound = self.bind(&param.name);
            match &param.default_value {
                Some(default) => {
                    let default_code = self.gen_expr(default);
                    rendered_params.push(format!("{} = {}", bound, default_code));
                }
                None => rendered_params.push(bound),
            }
        }

        self.write_line(&format!("function {}({}) {{", fn_name, rendered_params.join(", ")));
        self.indent += 1;

        if let Some((last, init)) = body.split_last() {
            self.gen_stmts(init);
            match last {
                Stmt::Expression(expr) => {
                    let code = self.gen_expr(expr);
                    self.write_line(&format!("return {};", code));
                }
                other => self.gen_stmt(other),
            }
        }

        self.indent -= 1;
        self.pop_scope();
        self.write_line("}");
    }
}

fn is_input_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { callee, .. } => callee
            .dotted_name()
            .is_some_and(|name| name == "input" || name.starts_with("input.")),
        _ => false,
    }
}

fn is_negative_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(Literal::Number(n)) => *n < 0.0,
        Expr::Unary {
            op: UnOp::Neg,
            expr,
        } => matches!(expr.as_ref(), Expr::Literal(Literal::Number(n)) if *n > 0.0),
        _ => false,
    }
}
