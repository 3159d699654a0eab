//! Expression translation. Two modes share one walk: `Normal` emits
//! series-object code (method dispatch on `Series`), `Rec` emits per-bar
//! scalar code for the body of a recursive-formula loop, where series reads
//! become `.get(i)` and the variable's own history becomes the `xPrev`
//! carry.

use crate::mappings;
use crate::{format_number, sanitize_identifier, ts_quote, Generator};
use pine_ast::{Argument, BinOp, Expr, Literal, SwitchCase, UnOp};

/// Bar-fed series available in every generated unit.
pub(crate) const BAR_SERIES: [&str; 9] = [
    "open", "high", "low", "close", "volume", "hl2", "hlc3", "ohlc4", "hlcc4",
];

/// Time-component series, emitted into the prelude on demand.
pub(crate) const TIME_COMPONENTS: [&str; 7] = [
    "year", "month", "dayofmonth", "dayofweek", "hour", "minute", "second",
];

#[derive(Clone, Copy)]
pub(crate) enum Mode<'a> {
    Normal,
    Rec { var: &'a str, prev: &'a str },
}

impl Generator<'_> {
    pub(crate) fn gen_expr(&mut self, expr: &Expr) -> String {
        self.expr(expr, Mode::Normal)
    }

    /// Is the expression series-valued? The rule from one place: bar series,
    /// known series variables, `ta.*` calls (and bare names mapping to
    /// them), user function calls, binaries with a series operand, and
    /// ternaries with a series branch. History access itself is scalar.
    pub(crate) fn is_series_expr(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Variable(name) => {
                BAR_SERIES.contains(&name.as_str())
                    || TIME_COMPONENTS.contains(&name.as_str())
                    || name == "time"
                    || self.series_vars.contains(name)
            }
            Expr::Call { callee, args, .. } => match callee.dotted_name() {
                Some(dotted) => {
                    if dotted.starts_with("ta.") || dotted.starts_with("taCore.") {
                        true
                    } else if dotted == "nz" {
                        args.first().is_some_and(|a| self.is_series_expr(a.value()))
                    } else if mappings::runtime_function(&dotted)
                        .is_some_and(|mapped| mapped.starts_with("ta."))
                    {
                        true
                    } else {
                        // User function results are heuristically series
                        self.meta.is_function(&dotted)
                    }
                }
                None => false,
            },
            Expr::Binary { left, right, .. } => {
                self.is_series_expr(left) || self.is_series_expr(right)
            }
            Expr::Unary { expr, .. } => self.is_series_expr(expr),
            Expr::Ternary {
                then_expr,
                else_expr,
                ..
            } => {
                self.is_series_expr(then_expr)
                    || self.is_series_expr(else_expr)
                    || self.na_call_heuristic(then_expr, else_expr).is_some()
            }
            Expr::Switch { cases, default, .. } => {
                cases.iter().any(|case| self.is_series_expr(&case.result))
                    || default.as_deref().is_some_and(|d| self.is_series_expr(d))
            }
            // expr[k] evaluates to a value k bars back: scalar category
            Expr::HistoryAccess { .. } => false,
            _ => false,
        }
    }

    /// The documented heuristic: one branch `na`, the other a function call
    /// whose series-ness the rules cannot see. Returns which branch to
    /// assume series-valued.
    fn na_call_heuristic(&self, then_expr: &Expr, else_expr: &Expr) -> Option<bool> {
        let then_na = matches!(then_expr, Expr::Literal(Literal::Na));
        let else_na = matches!(else_expr, Expr::Literal(Literal::Na));
        if then_na && matches!(else_expr, Expr::Call { .. }) && !self.is_series_expr(else_expr) {
            return Some(false); // else branch assumed series
        }
        if else_na && matches!(then_expr, Expr::Call { .. }) && !self.is_series_expr(then_expr) {
            return Some(true); // then branch assumed series
        }
        None
    }

    pub(crate) fn expr(&mut self, expr: &Expr, mode: Mode) -> String {
        match expr {
            Expr::Literal(literal) => self.gen_literal(literal),
            Expr::Variable(name) => self.gen_variable(name, mode),
            Expr::Binary { left, op, right } => self.gen_binary(left, *op, right, mode),
            Expr::Unary { op, expr } => self.gen_unary(*op, expr, mode),
            Expr::Ternary {
                condition,
                then_expr,
                else_expr,
            } => self.gen_ternary(condition, then_expr, else_expr, mode),
            Expr::HistoryAccess { expr, offset } => self.gen_history(expr, offset, mode),
            Expr::MemberAccess { object, member } => self.gen_member(object, member, mode),
            Expr::Call {
                callee,
                type_args,
                args,
            } => self.gen_call(callee, type_args, args, mode),
            Expr::Array(elements) => {
                let parts: Vec<String> = elements.iter().map(|e| self.expr(e, mode)).collect();
                format!("[{}]", parts.join(", "))
            }
            Expr::Switch {
                scrutinee,
                cases,
                default,
            } => self.gen_switch(scrutinee.as_deref(), cases, default.as_deref(), mode),
        }
    }

    fn gen_literal(&self, literal: &Literal) -> String {
        match literal {
            Literal::Number(n) => format_number(*n),
            Literal::String(s) => ts_quote(s),
            Literal::Bool(b) => b.to_string(),
            Literal::Na => "NaN".to_string(),
            Literal::HexColor(hex) => format!("\"{}\"", hex),
        }
    }

    fn gen_variable(&mut self, name: &str, mode: Mode) -> String {
        if let Mode::Rec { var, prev } = mode {
            if name == var {
                // Bare self-reference collapses to the previous bar carry
                return prev.to_string();
            }
        }

        // Declared names shadow builtins
        if let Some(emitted) = self.lookup(name) {
            if self.series_vars.contains(name) {
                return self.series_read(&emitted, mode);
            }
            return emitted;
        }

        match name {
            "bar_index" => return "i".to_string(),
            "last_bar_index" => return "last_bar_index".to_string(),
            "this" => return "self".to_string(),
            "time" => {
                self.uses_time = true;
                return self.series_read("time", mode);
            }
            _ => {}
        }

        if BAR_SERIES.contains(&name) {
            return self.series_read(name, mode);
        }
        if TIME_COMPONENTS.contains(&name) {
            self.used_time_components.insert(name.to_string());
            return self.series_read(name, mode);
        }

        sanitize_identifier(name)
    }

    /// A series identifier: the series object in normal mode, its value at
    /// bar `i` inside a recursive loop.
    fn series_read(&self, emitted: &str, mode: Mode) -> String {
        match mode {
            Mode::Normal => emitted.to_string(),
            Mode::Rec { .. } => format!("{}.get(i)", emitted),
        }
    }

    fn gen_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, mode: Mode) -> String {
        if let Mode::Rec { .. } = mode {
            // Inside the loop everything is scalar arithmetic
            let left_code = self.expr(left, mode);
            let right_code = self.expr(right, mode);
            return format!(
                "({} {} {})",
                left_code,
                mappings::scalar_operator(op),
                right_code
            );
        }

        let left_series = self.is_series_expr(left);
        let right_series = self.is_series_expr(right);

        if left_series || right_series {
            let method = mappings::series_method(op);
            if left_series {
                let left_code = self.gen_expr(left);
                let right_code = self.gen_expr(right);
                return format!("{}.{}({})", left_code, method, right_code);
            }
            if op.is_commutative() {
                // Swap so the series lands on the receiver side
                let right_code = self.gen_expr(right);
                let left_code = self.gen_expr(left);
                return format!("{}.{}({})", right_code, method, left_code);
            }
            // Scalar on the left of a non-commutative operator: fall back to
            // scalar operators
            self.warnings.push(format!(
                "Non-commutative '{}' with scalar left and series right uses scalar semantics",
                mappings::scalar_operator(op)
            ));
        }

        let left_code = self.gen_expr(left);
        let right_code = self.gen_expr(right);
        format!(
            "({} {} {})",
            left_code,
            mappings::scalar_operator(op),
            right_code
        )
    }

    fn gen_unary(&mut self, op: UnOp, expr: &Expr, mode: Mode) -> String {
        let series = matches!(mode, Mode::Normal) && self.is_series_expr(expr);
        let code = self.expr(expr, mode);
        match op {
            UnOp::Neg if series => format!("{}.neg()", code),
            UnOp::Neg => format!("(-{})", code),
            UnOp::Not => format!("(!{})", code),
        }
    }

    fn gen_ternary(
        &mut self,
        condition: &Expr,
        then_expr: &Expr,
        else_expr: &Expr,
        mode: Mode,
    ) -> String {
        let cond_code = self.expr(condition, mode);

        if let Mode::Rec { .. } = mode {
            let then_code = self.expr(then_expr, mode);
            let else_code = self.expr(else_expr, mode);
            return format!("({} ? {} : {})", cond_code, then_code, else_code);
        }

        let mut then_series = self.is_series_expr(then_expr);
        let mut else_series = self.is_series_expr(else_expr);

        if let Some(then_assumed) = self.na_call_heuristic(then_expr, else_expr) {
            self.warnings.push(
                "Ambiguous series-ness in ternary: na branch paired with a call, assuming series"
                    .to_string(),
            );
            if then_assumed {
                then_series = true;
            } else {
                else_series = true;
            }
        }

        let mut then_code = self.gen_expr(then_expr);
        let mut else_code = self.gen_expr(else_expr);

        // Balance mixed series/scalar branches: the scalar side becomes a
        // constant series of the same length
        if then_series && !else_series {
            else_code = format!("Series.fromScalar(bars, {})", else_code);
        } else if else_series && !then_series {
            then_code = format!("Series.fromScalar(bars, {})", then_code);
        }

        format!("({} ? {} : {})", cond_code, then_code, else_code)
    }

    fn gen_history(&mut self, base: &Expr, offset: &Expr, mode: Mode) -> String {
        if let Mode::Rec { var, prev } = mode {
            if matches!(base, Expr::Variable(name) if name == var) {
                return prev.to_string();
            }
            // Another series' history: take its offset series at bar i
            let series_code = self.gen_history(base, offset, Mode::Normal);
            return format!("{}.get(i)", series_code);
        }

        let base_code = self.gen_expr(base);
        let offset_code = self.gen_expr(offset);
        format!("{}.offset({})", base_code, offset_code)
    }

    fn gen_member(&mut self, object: &Expr, member: &str, mode: Mode) -> String {
        if let Expr::Variable(base) = object {
            match base.as_str() {
                "color" => {
                    if let Some(hex) = mappings::color_hex(member) {
                        return format!("\"{}\"", hex);
                    }
                }
                "barstate" => {
                    return match member {
                        "isfirst" => "(i === 0)".to_string(),
                        "islast" | "islastconfirmedhistory" => {
                            "(i === bars.length - 1)".to_string()
                        }
                        "isconfirmed" | "isnew" => "true".to_string(),
                        "isrealtime" => "false".to_string(),
                        _ => format!("barstate.{}", member),
                    };
                }
                "syminfo" => {
                    self.uses_syminfo = true;
                    return format!("syminfo.{}", member);
                }
                "timeframe" => {
                    self.uses_timeframe = true;
                    return format!("timeframe.{}", member);
                }
                "math" => {
                    return match member {
                        "pi" => "Math.PI".to_string(),
                        "e" => "Math.E".to_string(),
                        _ => format!("math.{}", member),
                    };
                }
                "display" => return format!("\"{}\"", member),
                _ => {
                    if let Some(import) = self
                        .meta
                        .imports
                        .iter()
                        .find(|imp| imp.local_name() == base)
                    {
                        return format!("{}.{}", import.module_name(), member);
                    }
                }
            }
        }

        let object_code = self.expr(object, mode);
        format!("{}.{}", object_code, member)
    }

    /// Static user type of an expression, for method-call lowering.
    pub(crate) fn static_type_of(&self, expr: &Expr) -> Option<String> {
        match expr {
            Expr::Variable(name) => self.var_types.get(name).cloned(),
            Expr::Call { callee, .. } => match callee.dotted_name() {
                Some(dotted) => {
                    let type_name = dotted.strip_suffix(".new")?;
                    self.meta
                        .type_info(type_name)
                        .map(|info| info.name.clone())
                }
                None => None,
            },
            _ => None,
        }
    }

    fn gen_args(&mut self, args: &[Argument], mode: Mode) -> Vec<String> {
        // Values are emitted in the order given; the runtime signatures are
        // positional
        args.iter().map(|arg| self.expr(arg.value(), mode)).collect()
    }

    fn gen_call(
        &mut self,
        callee: &Expr,
        type_args: &[String],
        args: &[Argument],
        mode: Mode,
    ) -> String {
        let dotted = callee.dotted_name();

        if let Some(name) = dotted.as_deref() {
            match name {
                "na" => {
                    self.uses_na = true;
                    let arg_list = self.gen_args(args, mode);
                    return format!("na({})", arg_list.join(", "));
                }
                "nz" => {
                    self.uses_nz = true;
                    let arg_list = self.gen_args(args, mode);
                    return format!("nz({})", arg_list.join(", "));
                }
                "runtime.error" => {
                    let arg_list = self.gen_args(args, mode);
                    let message = arg_list
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "\"runtime error\"".to_string());
                    return format!("(() => {{ throw new Error({}); }})()", message);
                }
                "array.new" if !type_args.is_empty() => {
                    let arg_list = self.gen_args(args, mode);
                    let size = arg_list.first().cloned().unwrap_or_else(|| "0".to_string());
                    let fill = arg_list.get(1).cloned().unwrap_or_else(|| "null".to_string());
                    return format!("new Array({}).fill({})", size, fill);
                }
                _ => {}
            }

            // Resolve the runtime name: dotted namespace builtins pass
            // through, bare legacy names gain their namespace, and
            // `Type.new` stays a factory call
            let runtime_name = match name.split_once('.') {
                Some((base, _)) => {
                    let namespaced = pine_analyzer::is_namespace(base)
                        || self.meta.type_info(base).is_some();
                    if namespaced {
                        name.to_string()
                    } else {
                        String::new()
                    }
                }
                None => mappings::runtime_function(name)
                    .map(str::to_string)
                    .unwrap_or_default(),
            };

            if !runtime_name.is_empty() {
                // Inside a recursive loop, ta-family calls compute over the
                // full series and are read at bar i; scalar math passes
                // through with rewritten arguments
                if let Mode::Rec { .. } = mode {
                    if self.is_series_call(&runtime_name) {
                        let series_code = self.gen_call(callee, type_args, args, Mode::Normal);
                        return format!("{}.get(i)", series_code);
                    }
                }

                let mut arg_list = self.gen_args(args, mode);

                // The runtime vwma needs the volume series spelled out
                if runtime_name == "ta.vwma" && arg_list.len() == 2 {
                    arg_list.push("volume".to_string());
                }

                return format!("{}({})", runtime_name, arg_list.join(", "));
            }

            // Import alias calls route to the emitted module name
            if let Expr::MemberAccess { object, member } = callee {
                if let Expr::Variable(base) = object.as_ref() {
                    if let Some(module_name) = self
                        .meta
                        .imports
                        .iter()
                        .find(|imp| imp.local_name() == base)
                        .map(|imp| imp.module_name())
                    {
                        let arg_list = self.gen_args(args, mode);
                        return format!("{}.{}({})", module_name, member, arg_list.join(", "));
                    }
                }
            }

            // User functions (series-valued by heuristic)
            if self.meta.is_function(name) {
                if let Mode::Rec { .. } = mode {
                    let series_code = self.gen_call(callee, type_args, args, Mode::Normal);
                    return format!("{}.get(i)", series_code);
                }
                let arg_list = self.gen_args(args, Mode::Normal);
                return format!("{}({})", sanitize_identifier(name), arg_list.join(", "));
            }
        }

        // Method-call lowering also applies to non-builtin callees
        if let Expr::MemberAccess { object, member } = callee {
            if let Some(type_name) = self.static_type_of(object) {
                if self.meta.has_method(&type_name, member) {
                    let object_code = self.expr(object, mode);
                    let mut lowered = vec![object_code];
                    lowered.extend(self.gen_args(args, mode));
                    return format!("{}.{}({})", type_name, member, lowered.join(", "));
                }
            }
        }

        // Unknown callee: pass through unchanged; the runtime surfaces the
        // error if the name does not exist
        let callee_code = self.expr(callee, mode);
        let arg_list = self.gen_args(args, mode);
        format!("{}({})", callee_code, arg_list.join(", "))
    }

    /// Does this call name resolve to something dotted under `ta.`?
    fn is_series_call(&self, name: &str) -> bool {
        name.starts_with("ta.")
            || name.starts_with("taCore.")
            || mappings::runtime_function(name).is_some_and(|mapped| mapped.starts_with("ta."))
    }

    /// Lower a switch expression to an immediately invoked block returning a
    /// value. With a scrutinee each case returns; without one the case
    /// values become an if/else-if ladder.
    fn gen_switch(
        &mut self,
        scrutinee: Option<&Expr>,
        cases: &[SwitchCase],
        default: Option<&Expr>,
        mode: Mode,
    ) -> String {
        let mut out = String::new();

        match scrutinee {
            Some(scrutinee) => {
                let scrutinee_code = self.expr(scrutinee, mode);
                out.push_str(&format!("(() => {{ switch ({}) {{", scrutinee_code));
                for case in cases {
                    let pattern = self.expr(&case.pattern, mode);
                    let result = self.expr(&case.result, mode);
                    out.push_str(&format!(" case {}: return {};", pattern, result));
                }
                if let Some(default) = default {
                    let default_code = self.expr(default, mode);
                    out.push_str(&format!(" default: return {};", default_code));
                }
                out.push_str(" } })()");
            }
            None => {
                out.push_str("(() => {");
                for case in cases {
                    let condition = self.expr(&case.pattern, mode);
                    let result = self.expr(&case.result, mode);
                    out.push_str(&format!(" if ({}) return {};", condition, result));
                }
                if let Some(default) = default {
                    let default_code = self.expr(default, mode);
                    out.push_str(&format!(" return {};", default_code));
                }
                out.push_str(" })()");
            }
        }

        out
    }
}
