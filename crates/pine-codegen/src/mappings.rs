//! Static mapper tables: source built-in names to runtime names and
//! compile-time constants. Pure lookups, no state.

use pine_ast::BinOp;

/// Bare function names carried over from older scripts, mapped to their
/// namespaced runtime form (`sma` -> `ta.sma`). Unknown names pass through
/// unchanged at the call site.
pub fn runtime_function(name: &str) -> Option<&'static str> {
    let mapped = match name {
        // Technical analysis
        "sma" => "ta.sma",
        "ema" => "ta.ema",
        "rma" => "ta.rma",
        "wma" => "ta.wma",
        "vwma" => "ta.vwma",
        "hma" => "ta.hma",
        "alma" => "ta.alma",
        "swma" => "ta.swma",
        "rsi" => "ta.rsi",
        "atr" => "ta.atr",
        "tr" => "ta.tr",
        "cci" => "ta.cci",
        "mfi" => "ta.mfi",
        "mom" => "ta.mom",
        "roc" => "ta.roc",
        "cog" => "ta.cog",
        "dev" => "ta.dev",
        "stdev" => "ta.stdev",
        "variance" => "ta.variance",
        "stoch" => "ta.stoch",
        "macd" => "ta.macd",
        "highest" => "ta.highest",
        "lowest" => "ta.lowest",
        "highestbars" => "ta.highestbars",
        "lowestbars" => "ta.lowestbars",
        "crossover" => "ta.crossover",
        "crossunder" => "ta.crossunder",
        "cross" => "ta.cross",
        "rising" => "ta.rising",
        "falling" => "ta.falling",
        "change" => "ta.change",
        "linreg" => "ta.linreg",
        "correlation" => "ta.correlation",
        "barssince" => "ta.barssince",
        "valuewhen" => "ta.valuewhen",
        "pivothigh" => "ta.pivothigh",
        "pivotlow" => "ta.pivotlow",
        "cum" => "ta.cum",
        "vwap" => "ta.vwap",

        // Math
        "abs" => "math.abs",
        "pow" => "math.pow",
        "sqrt" => "math.sqrt",
        "log" => "math.log",
        "log10" => "math.log10",
        "exp" => "math.exp",
        "sign" => "math.sign",
        "round" => "math.round",
        "floor" => "math.floor",
        "ceil" => "math.ceil",
        "max" => "math.max",
        "min" => "math.min",
        "avg" => "math.avg",
        "sin" => "math.sin",
        "cos" => "math.cos",
        "tan" => "math.tan",
        "asin" => "math.asin",
        "acos" => "math.acos",
        "atan" => "math.atan",

        _ => return None,
    };
    Some(mapped)
}

/// `color.<name>` constants to hex strings.
pub fn color_hex(name: &str) -> Option<&'static str> {
    let hex = match name {
        "green" => "#00FF00",
        "red" => "#FF0000",
        "blue" => "#0000FF",
        "white" => "#FFFFFF",
        "black" => "#000000",
        "yellow" => "#FFFF00",
        "orange" => "#FFA500",
        "purple" => "#800080",
        "gray" => "#808080",
        "silver" => "#C0C0C0",
        "aqua" => "#00FFFF",
        "lime" => "#00FF00",
        "maroon" => "#800000",
        "navy" => "#000080",
        "olive" => "#808000",
        "teal" => "#008080",
        "fuchsia" => "#FF00FF",
        _ => return None,
    };
    Some(hex)
}

/// Input kinds recognized from `input.<member>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Int,
    Float,
    Bool,
    String,
    Color,
    Source,
}

pub fn input_type(member: &str) -> Option<InputType> {
    let typ = match member {
        "int" => InputType::Int,
        "float" => InputType::Float,
        "bool" => InputType::Bool,
        "string" => InputType::String,
        "color" => InputType::Color,
        "source" => InputType::Source,
        _ => return None,
    };
    Some(typ)
}

impl InputType {
    /// TypeScript type for the input field
    pub fn ts_type(&self) -> &'static str {
        match self {
            InputType::Int | InputType::Float => "number",
            InputType::Bool => "boolean",
            InputType::String | InputType::Color => "string",
            InputType::Source => {
                "\"open\" | \"high\" | \"low\" | \"close\" | \"hl2\" | \"hlc3\" | \"ohlc4\" | \"hlcc4\""
            }
        }
    }
}

/// Series method name for a binary operator.
pub fn series_method(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "sub",
        BinOp::Mul => "mul",
        BinOp::Div => "div",
        BinOp::Mod => "mod",
        BinOp::Eq => "eq",
        BinOp::NotEq => "neq",
        BinOp::Less => "lt",
        BinOp::Greater => "gt",
        BinOp::LessEq => "lte",
        BinOp::GreaterEq => "gte",
        BinOp::And => "and",
        BinOp::Or => "or",
    }
}

/// TypeScript scalar operator for a binary operator.
pub fn scalar_operator(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Mod => "%",
        BinOp::Eq => "===",
        BinOp::NotEq => "!==",
        BinOp::Less => "<",
        BinOp::Greater => ">",
        BinOp::LessEq => "<=",
        BinOp::GreaterEq => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

/// PineScript primitive type name to TypeScript type and default literal.
pub fn primitive_type(pine_type: &str) -> Option<(&'static str, &'static str)> {
    let mapped = match pine_type {
        "int" | "float" => ("number", "NaN"),
        "bool" => ("boolean", "false"),
        "string" => ("string", "\"\""),
        "color" => ("string", "\"#000000\""),
        _ => return None,
    };
    Some(mapped)
}

/// The runtime source-series names a `source` input selects over.
pub const SOURCE_NAMES: [&str; 8] = [
    "open", "high", "low", "close", "hl2", "hlc3", "ohlc4", "hlcc4",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_function() {
        assert_eq!(runtime_function("sma"), Some("ta.sma"));
        assert_eq!(runtime_function("pow"), Some("math.pow"));
        assert_eq!(runtime_function("unknown_fn"), None);
    }

    #[test]
    fn test_color_table() {
        assert_eq!(color_hex("green"), Some("#00FF00"));
        assert_eq!(color_hex("blue"), Some("#0000FF"));
        assert_eq!(color_hex("fuchsia"), Some("#FF00FF"));
        assert_eq!(color_hex("mauve"), None);
    }

    #[test]
    fn test_input_types() {
        assert_eq!(input_type("int"), Some(InputType::Int));
        assert_eq!(input_type("source"), Some(InputType::Source));
        assert_eq!(input_type("session"), None);
        assert_eq!(InputType::Int.ts_type(), "number");
    }

    #[test]
    fn test_operator_tables() {
        assert_eq!(series_method(BinOp::Add), "add");
        assert_eq!(series_method(BinOp::GreaterEq), "gte");
        assert_eq!(scalar_operator(BinOp::Eq), "===");
        assert_eq!(scalar_operator(BinOp::And), "&&");
    }
}
