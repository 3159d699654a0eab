//! Shared PineScript sources for the benchmark suite, from a trivial plot
//! to the recursive McGinley formula that stresses the rewrite path.

pub const SIMPLE: &str = "indicator(\"Simple\")\nplot(close)\n";

pub const MOVING_AVERAGES: &str = r#"indicator("Moving Averages", overlay=true)
fast = input.int(9, minval=1)
slow = input.int(21, minval=1)
src = input(close)
fastMa = ta.ema(src, fast)
slowMa = ta.sma(src, slow)
plot(fastMa, title="Fast", color=color.blue)
plot(slowMa, title="Slow", color=color.orange)
"#;

pub const ROC: &str = r#"indicator("ROC")
length = input.int(9, minval=1)
source = input(close)
roc = 100 * (source - source[length]) / source[length]
plot(roc, title="ROC", color=color.blue)
"#;

pub const MCGINLEY: &str = r#"indicator("McGinley Dynamic")
length = input.int(14, minval=1)
source = close
mg = 0.0
mg := na(mg[1]) ? ta.ema(source, length) : mg[1] + (source - mg[1]) / (length * math.pow(source / mg[1], 4))
plot(mg, color=color.teal, title="McGinley")
"#;

pub const BOLLINGER: &str = r#"indicator("Bollinger Bands", overlay=true)
length = input.int(20, minval=1)
mult = input.float(2.0, minval=0.001, maxval=50)
src = input(close)
basis = ta.sma(src, length)
dev = mult * ta.stdev(src, length)
upper = basis + dev
lower = basis - dev
p1 = plot(upper, title="Upper", color=color.blue)
p2 = plot(lower, title="Lower", color=color.blue)
fill(p1, p2, title="Background")
"#;

pub const SCRIPTS: &[(&str, &str)] = &[
    ("simple", SIMPLE),
    ("moving_averages", MOVING_AVERAGES),
    ("roc", ROC),
    ("mcginley", MCGINLEY),
    ("bollinger", BOLLINGER),
];
