//! Static registry of PineScript built-in names: the variables fed by the
//! runtime, the namespaces, and the required/optional arity of the built-in
//! functions the analyzer knows about.

/// Required/optional argument counts for a builtin function.
/// `optional: None` means the tail is unbounded (display functions and the
/// like take many named-style extras).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arity {
    pub required: usize,
    pub optional: Option<usize>,
}

const fn arity(required: usize, optional: usize) -> Arity {
    Arity {
        required,
        optional: Some(optional),
    }
}

const fn open_arity(required: usize) -> Arity {
    Arity {
        required,
        optional: None,
    }
}

/// Bar-fed and derived variables. Reassigning any of these is a
/// CONST_REASSIGNMENT error.
pub fn is_builtin_variable(name: &str) -> bool {
    matches!(
        name,
        "open"
            | "high"
            | "low"
            | "close"
            | "volume"
            | "hl2"
            | "hlc3"
            | "ohlc4"
            | "hlcc4"
            | "time"
            | "time_close"
            | "year"
            | "month"
            | "dayofmonth"
            | "dayofweek"
            | "hour"
            | "minute"
            | "second"
            | "bar_index"
            | "last_bar_index"
            | "na"
    )
}

/// Namespace objects that may appear as the base of a member access.
pub fn is_namespace(name: &str) -> bool {
    matches!(
        name,
        "ta" | "math"
            | "array"
            | "matrix"
            | "str"
            | "color"
            | "input"
            | "syminfo"
            | "timeframe"
            | "barstate"
            | "chart"
            | "runtime"
            | "display"
            | "shape"
            | "location"
            | "size"
            | "format"
    )
}

/// Names that must not appear on the left of `:=`: the bar variables plus
/// every namespace object.
pub fn is_immutable(name: &str) -> bool {
    is_builtin_variable(name) || is_namespace(name)
}

/// Functions callable without a namespace prefix.
pub fn is_builtin_function(name: &str) -> bool {
    matches!(
        name,
        "na" | "nz"
            | "plot"
            | "fill"
            | "hline"
            | "bgcolor"
            | "barcolor"
            | "plotshape"
            | "plotchar"
            | "plotarrow"
            | "plotcandle"
            | "plotbar"
            | "indicator"
            | "library"
            | "input"
    )
}

/// Required and optional arity for known builtin functions (dotted names
/// included). Unknown names return None and are not arity-checked.
pub fn builtin_arity(name: &str) -> Option<Arity> {
    let arity = match name {
        // Bare helpers and declarations
        "na" => arity(1, 0),
        "nz" => arity(1, 1),
        "indicator" => open_arity(0),
        "library" => open_arity(1),
        "input" => arity(1, 2),
        "runtime.error" => arity(1, 0),

        // Display functions
        "plot" => open_arity(1),
        "fill" => open_arity(2),
        "hline" => open_arity(1),
        "bgcolor" => open_arity(1),
        "barcolor" => open_arity(1),
        "plotshape" => open_arity(1),
        "plotchar" => open_arity(1),
        "plotarrow" => open_arity(1),
        "plotcandle" => open_arity(4),
        "plotbar" => open_arity(4),

        // Inputs
        "input.int" | "input.float" | "input.bool" | "input.string" | "input.color"
        | "input.source" => open_arity(1),

        // Technical analysis
        "ta.sma" | "ta.ema" | "ta.rma" | "ta.wma" | "ta.hma" | "ta.rsi" | "ta.mom"
        | "ta.roc" | "ta.cci" | "ta.wpr" | "ta.cog" | "ta.dev" | "ta.median" | "ta.mode"
        | "ta.rising" | "ta.falling" | "ta.crossover" | "ta.crossunder" | "ta.cross"
        | "ta.correlation" | "ta.mfi" => arity(2, 0),
        "ta.vwma" => arity(2, 1),
        "ta.stdev" | "ta.variance" => arity(2, 1),
        "ta.atr" | "ta.swma" | "ta.barssince" | "ta.cum" | "ta.vwap" => arity(1, 0),
        "ta.tr" => arity(0, 1),
        "ta.change" => arity(1, 1),
        "ta.highest" | "ta.lowest" | "ta.highestbars" | "ta.lowestbars" => arity(1, 1),
        "ta.pivothigh" | "ta.pivotlow" => arity(2, 1),
        "ta.valuewhen" => arity(3, 0),
        "ta.linreg" => arity(3, 0),
        "ta.stoch" => arity(4, 0),
        "ta.macd" => arity(4, 0),
        "ta.bb" | "ta.bbw" => arity(3, 0),
        "ta.kc" | "ta.kcw" => arity(3, 1),
        "ta.sar" => arity(3, 0),
        "ta.supertrend" => arity(2, 0),
        "ta.alma" => arity(4, 1),
        "ta.percentile_linear_interpolation" | "ta.percentile_nearest_rank" => arity(3, 0),

        // Math
        "math.abs" | "math.sqrt" | "math.sign" | "math.exp" | "math.ln" | "math.log10"
        | "math.floor" | "math.ceil" | "math.sin" | "math.cos" | "math.tan" | "math.asin"
        | "math.acos" | "math.atan" | "math.todegrees" | "math.toradians" => arity(1, 0),
        "math.log" => arity(1, 1),
        "math.pow" => arity(2, 0),
        "math.round" => arity(1, 1),
        "math.random" => arity(0, 2),
        "math.max" | "math.min" | "math.avg" => open_arity(2),

        // Arrays
        "array.new" => arity(1, 1),
        "array.new_float" | "array.new_int" | "array.new_bool" | "array.new_string" => {
            arity(0, 2)
        }
        "array.from" => open_arity(0),
        "array.get" | "array.push" | "array.unshift" | "array.remove" | "array.includes"
        | "array.indexof" | "array.concat" | "array.covariance" => arity(2, 0),
        "array.set" | "array.insert" | "array.slice" => arity(3, 0),
        "array.size" | "array.clear" | "array.pop" | "array.shift" | "array.sum"
        | "array.avg" | "array.first" | "array.last" | "array.reverse" | "array.copy"
        | "array.abs" | "array.range" | "array.stdev" | "array.variance" | "array.median"
        | "array.mode" => arity(1, 0),
        "array.min" | "array.max" | "array.sort" | "array.join" => arity(1, 1),
        "array.fill" => arity(2, 2),

        // Matrices
        "matrix.new" => arity(2, 1),
        "matrix.get" => arity(3, 0),
        "matrix.set" => arity(4, 0),
        "matrix.rows" | "matrix.columns" => arity(1, 0),
        "matrix.add_row" | "matrix.add_col" => arity(1, 2),

        // Strings
        "str.tostring" => arity(1, 1),
        "str.tonumber" | "str.length" | "str.upper" | "str.lower" => arity(1, 0),
        "str.format" => open_arity(1),
        "str.contains" | "str.split" | "str.startswith" | "str.endswith" => arity(2, 0),
        "str.replace_all" | "str.replace" => arity(3, 0),

        // Colors
        "color.new" => arity(2, 0),
        "color.rgb" => arity(3, 1),
        "color.from_gradient" => arity(5, 0),
        "color.r" | "color.g" | "color.b" | "color.t" => arity(1, 0),

        _ => return None,
    };
    Some(arity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_variables() {
        assert!(is_builtin_variable("close"));
        assert!(is_builtin_variable("hlcc4"));
        assert!(is_builtin_variable("bar_index"));
        assert!(!is_builtin_variable("my_var"));
    }

    #[test]
    fn test_immutable_includes_namespaces() {
        assert!(is_immutable("close"));
        assert!(is_immutable("ta"));
        assert!(!is_immutable("x"));
    }

    #[test]
    fn test_arities() {
        assert_eq!(builtin_arity("ta.sma"), Some(arity(2, 0)));
        assert_eq!(builtin_arity("ta.vwma"), Some(arity(2, 1)));
        assert_eq!(builtin_arity("nz"), Some(arity(1, 1)));
        assert_eq!(builtin_arity("plot"), Some(open_arity(1)));
        assert_eq!(builtin_arity("ta.something_new"), None);
    }
}
