//! `plot(...)` / `fill(...)` translation: value streams become `const
//! plotN` locals, and the compile-time-extractable arguments (title, color,
//! width, display, visibility, offset) become config entries surfaced in
//! the returned object.

use crate::mappings;
use crate::Generator;
use pine_ast::{Argument, Expr, Literal, UnOp};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PlotConfig {
    pub id: String,
    pub title: Option<String>,
    pub color: Option<String>,
    pub line_width: u32,
    pub display: Option<String>,
    /// Emitted boolean expression, not data; rendered verbatim into the
    /// config literal
    pub visible: Option<String>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FillConfig {
    pub id: String,
    pub plot1: String,
    pub plot2: String,
    pub color: Option<String>,
    pub title: Option<String>,
    pub visible: Option<String>,
}

fn positional(args: &[Argument], index: usize) -> Option<&Expr> {
    args.iter()
        .filter_map(|a| match a {
            Argument::Positional(expr) => Some(expr),
            Argument::Named { .. } => None,
        })
        .nth(index)
}

fn named<'a>(args: &'a [Argument], name: &str) -> Option<&'a Expr> {
    args.iter().find_map(|a| match a {
        Argument::Named { name: n, value } if n == name => Some(value),
        _ => None,
    })
}

fn named_or<'a>(args: &'a [Argument], name: &str, index: usize) -> Option<&'a Expr> {
    named(args, name).or_else(|| positional(args, index))
}

fn string_literal(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn integer_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Literal(Literal::Number(n)) if n.fract() == 0.0 => Some(*n as i64),
        Expr::Unary {
            op: UnOp::Neg,
            expr,
        } => integer_literal(expr).map(|n| -n),
        _ => None,
    }
}

/// Compile-time color resolution: named color constants, hex literals, and
/// the first resolvable branch of a ternary. Anything else is dropped.
pub(crate) fn resolve_color(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Literal(Literal::HexColor(hex)) => Some(hex.clone()),
        Expr::MemberAccess { object, member }
            if matches!(object.as_ref(), Expr::Variable(n) if n == "color") =>
        {
            mappings::color_hex(member).map(str::to_string)
        }
        Expr::Ternary {
            then_expr,
            else_expr,
            ..
        } => resolve_color(then_expr).or_else(|| resolve_color(else_expr)),
        _ => None,
    }
}

fn display_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::MemberAccess { object, member }
            if matches!(object.as_ref(), Expr::Variable(n) if n == "display") =>
        {
            match member.as_str() {
                "all" | "none" | "data_window" | "status_line" | "pane" => Some(member.clone()),
                _ => None,
            }
        }
        _ => None,
    }
}

impl Generator<'_> {
    /// Translate one `plot(...)` call. Returns the sequential plot id; ids
    /// are assigned in source order even when the call sits in dead code.
    pub(crate) fn gen_plot(&mut self, args: &[Argument]) -> String {
        let id = format!("plot{}", self.plot_counter);
        self.plot_counter += 1;

        let value_code = match named_or(args, "series", 0) {
            Some(expr) => {
                let code = self.gen_expr(expr);
                if self.is_series_expr(expr) {
                    code
                } else {
                    format!("Series.fromScalar(bars, {})", code)
                }
            }
            None => {
                self.warnings
                    .push(format!("'{}' has no value argument", id));
                "Series.fromScalar(bars, NaN)".to_string()
            }
        };

        // Plots inside nested blocks are hoisted so the result object can
        // still reference them
        if self.indent > 1 {
            self.hoisted_plots.push(id.clone());
            self.write_line(&format!("{} = {};", id, value_code));
        } else {
            self.write_line(&format!("const {} = {};", id, value_code));
        }

        let title = named_or(args, "title", 1).and_then(string_literal);
        let color = named_or(args, "color", 2).and_then(|expr| resolve_color(expr));

        let line_width = match named_or(args, "linewidth", 3).and_then(integer_literal) {
            Some(width @ 1..=4) => width as u32,
            Some(width) => {
                self.warnings.push(format!(
                    "Plot line width {} out of range 1-4, using default",
                    width
                ));
                2
            }
            None => 2,
        };

        let mut display = None;
        let mut visible = None;
        if let Some(display_expr) = named(args, "display") {
            if let Some(name) = display_name(display_expr) {
                display = Some(name);
            } else if let Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } = display_expr
            {
                // `cond ? display.all : display.none` lowers to a runtime
                // visibility flag
                let then_all = display_name(then_expr).as_deref() == Some("all");
                let else_none = display_name(else_expr).as_deref() == Some("none");
                if then_all && else_none {
                    visible = Some(self.gen_expr(condition));
                }
            }
        }

        let offset = match named(args, "offset") {
            Some(expr) => match integer_literal(expr) {
                Some(offset) => Some(offset),
                None => {
                    self.warnings.push(format!(
                        "'{}' offset is not an integer literal and was ignored",
                        id
                    ));
                    None
                }
            },
            None => None,
        };

        self.plot_configs.push(PlotConfig {
            id: id.clone(),
            title,
            color,
            line_width,
            display,
            visible,
            offset,
        });
        self.plot_ids.push(id.clone());

        id
    }

    /// Translate one `fill(plotA, plotB, ...)` call referencing two prior
    /// plot ids.
    pub(crate) fn gen_fill(&mut self, args: &[Argument]) {
        let id = format!("fill{}", self.fill_counter);
        self.fill_counter += 1;

        let plot_ref = |gen: &Self, expr: Option<&Expr>| -> Option<String> {
            match expr? {
                Expr::Variable(name) => gen.plot_vars.get(name).cloned(),
                _ => None,
            }
        };

        let plot1 = plot_ref(self, positional(args, 0));
        let plot2 = plot_ref(self, positional(args, 1));

        let (plot1, plot2) = match (plot1, plot2) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                self.warnings.push(
                    "fill() arguments must reference plot variables; call skipped".to_string(),
                );
                return;
            }
        };

        let mut color = None;
        let mut visible = None;
        if let Some(color_expr) = named_or(args, "color", 2) {
            if let Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } = color_expr
            {
                // `cond ? c : na` drives visibility, with c as the color
                if matches!(else_expr.as_ref(), Expr::Literal(Literal::Na)) {
                    visible = Some(self.gen_expr(condition));
                    color = resolve_color(then_expr);
                } else {
                    color = resolve_color(color_expr);
                }
            } else {
                color = resolve_color(color_expr);
            }
        }

        let title = named(args, "title").and_then(string_literal);

        self.fill_configs.push(FillConfig {
            id,
            plot1,
            plot2,
            color,
            title,
            visible,
        });
    }
}
