//! Inference passes over the parsed program: which names are ever
//! reassigned, and which reassignments reference their own prior bar value.
//! Both are side tables consumed by the code generator; neither produces
//! errors.

use pine_ast::{Expr, Program, Stmt};
use std::collections::HashSet;

/// Names that appear on the left of `:=` anywhere in the program.
pub fn reassigned_variables(program: &Program) -> HashSet<String> {
    let mut names = HashSet::new();
    visit_statements(&program.statements, &mut |stmt| {
        if let Stmt::Assignment {
            target: Expr::Variable(name),
            ..
        } = stmt
        {
            names.insert(name.clone());
        }
    });
    names
}

/// Names `x` where some `x := rhs` has `rhs` containing a history access
/// whose base is `x` itself (`x[k]`). These formulas must be rewritten into
/// per-bar loops.
pub fn recursive_variables(program: &Program) -> HashSet<String> {
    let mut names = HashSet::new();
    visit_statements(&program.statements, &mut |stmt| {
        if let Stmt::Assignment {
            target: Expr::Variable(name),
            value,
        } = stmt
        {
            if references_own_history(value, name) {
                names.insert(name.clone());
            }
        }
    });
    names
}

/// Does `expr` contain `name[k]` anywhere?
pub fn references_own_history(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::HistoryAccess { expr: base, offset } => {
            matches!(base.as_ref(), Expr::Variable(base_name) if base_name == name)
                || references_own_history(base, name)
                || references_own_history(offset, name)
        }
        Expr::Binary { left, right, .. } => {
            references_own_history(left, name) || references_own_history(right, name)
        }
        Expr::Unary { expr, .. } => references_own_history(expr, name),
        Expr::Call { callee, args, .. } => {
            references_own_history(callee, name)
                || args.iter().any(|arg| references_own_history(arg.value(), name))
        }
        Expr::MemberAccess { object, .. } => references_own_history(object, name),
        Expr::Ternary {
            condition,
            then_expr,
            else_expr,
        } => {
            references_own_history(condition, name)
                || references_own_history(then_expr, name)
                || references_own_history(else_expr, name)
        }
        Expr::Array(elements) => elements.iter().any(|e| references_own_history(e, name)),
        Expr::Switch {
            scrutinee,
            cases,
            default,
        } => {
            scrutinee
                .as_deref()
                .is_some_and(|s| references_own_history(s, name))
                || cases.iter().any(|case| {
                    references_own_history(&case.pattern, name)
                        || references_own_history(&case.result, name)
                })
                || default
                    .as_deref()
                    .is_some_and(|d| references_own_history(d, name))
        }
        Expr::Literal(_) | Expr::Variable(_) => false,
    }
}

/// Apply `f` to every statement, descending into all nested bodies.
fn visit_statements(stmts: &[Stmt], f: &mut impl FnMut(&Stmt)) {
    for stmt in stmts {
        f(stmt);
        match stmt {
            Stmt::If {
                then_branch,
                else_if_branches,
                else_branch,
                ..
            } => {
                visit_statements(then_branch, f);
                for (_, branch) in else_if_branches {
                    visit_statements(branch, f);
                }
                if let Some(branch) = else_branch {
                    visit_statements(branch, f);
                }
            }
            Stmt::For { body, .. }
            | Stmt::ForIn { body, .. }
            | Stmt::While { body, .. }
            | Stmt::FunctionDecl { body, .. }
            | Stmt::MethodDecl { body, .. } => visit_statements(body, f),
            _ => {}
        }
    }
}
