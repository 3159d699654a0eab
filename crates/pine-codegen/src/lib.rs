//! TypeScript code generation from the annotated AST. The `Generator` is a
//! value whose lifetime is one compilation unit: emitted-name tables,
//! series-ness state, plot configs, and helper-usage flags all reset at unit
//! boundaries.

use pine_analyzer::Analysis;
use pine_ast::{Program, Stmt};
use std::collections::{BTreeSet, HashMap, HashSet};

pub mod mappings;
pub mod meta;

mod expr;
mod plots;
mod stmt;

pub use mappings::InputType;
pub use meta::{InputDefinition, LibraryInfo, ProgramMeta};
pub use plots::{FillConfig, PlotConfig};

use expr::TIME_COMPONENTS;
use mappings::InputType as Kind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Function,
    /// Accepted for compatibility; falls back to Function with a warning
    Class,
}

#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub include_imports: bool,
    pub format: OutputFormat,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            include_imports: true,
            format: OutputFormat::Function,
        }
    }
}

/// Output of one generation run.
#[derive(Debug, Clone)]
pub struct GeneratedCode {
    pub code: String,
    pub meta: ProgramMeta,
    pub plot_configs: Vec<PlotConfig>,
    pub fill_configs: Vec<FillConfig>,
    pub warnings: Vec<String>,
}

/// Generate TypeScript for an analyzed program.
pub fn generate(
    program: &Program,
    analysis: &Analysis,
    options: &GeneratorOptions,
) -> GeneratedCode {
    let mut warnings = vec![];
    if options.format == OutputFormat::Class {
        warnings.push("Class output format is not implemented; emitting function form".to_string());
    }
    let meta = meta::collect(program, &mut warnings);

    let mut generator = Generator::new(meta, analysis, options.clone(), warnings);
    let code = generator.run(program);

    GeneratedCode {
        code,
        meta: generator.meta,
        plot_configs: generator.plot_configs,
        fill_configs: generator.fill_configs,
        warnings: generator.warnings,
    }
}

/// Names user bindings must step around: identifiers the generator itself
/// introduces, plus the target language's reserved words. Pine reserves
/// almost none of these, so `class = close > open` is a legal declaration
/// that has to be renamed on the way out.
const RESERVED_NAMES: &[&str] = &[
    // Generator-introduced identifiers
    "bars",
    "inputs",
    "syminfo",
    "timeframe",
    "syminfoParam",
    "timeframeParam",
    "i",
    "na",
    "nz",
    "self",
    "Series",
    "Bar",
    "ta",
    "math",
    "array",
    "matrix",
    "str",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "hl2",
    "hlc3",
    "ohlc4",
    "hlcc4",
    "time",
    "last_bar_index",
    "defaultInputs",
    "defaultSyminfo",
    "defaultTimeframe",
    "IndicatorInputs",
    "SymbolInfo",
    "TimeframeInfo",
    "calculate",
    // ECMAScript reserved words
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "enum",
    "export",
    "extends",
    "false",
    "finally",
    "for",
    "function",
    "if",
    "import",
    "in",
    "instanceof",
    "let",
    "new",
    "null",
    "return",
    "super",
    "switch",
    "this",
    "throw",
    "true",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "yield",
    // Strict-mode and TypeScript reserved words
    "abstract",
    "any",
    "arguments",
    "as",
    "async",
    "await",
    "boolean",
    "declare",
    "eval",
    "get",
    "implements",
    "interface",
    "module",
    "namespace",
    "never",
    "number",
    "object",
    "of",
    "package",
    "private",
    "protected",
    "public",
    "readonly",
    "set",
    "static",
    "string",
    "symbol",
    "type",
    "undefined",
    "unknown",
    // Globals the emitted code relies on
    "NaN",
    "Infinity",
    "Math",
    "Date",
    "Array",
    "Record",
    "Partial",
    "Error",
];

/// Emitted names chosen for one input: the scalar destructured from the
/// inputs record, and the selector series for `source` inputs. Kept so the
/// interface, defaults, destructuring, and body references all agree when a
/// reserved-name collision forces a rename.
pub(crate) struct InputBinding {
    pub(crate) name: String,
    pub(crate) emitted: String,
    pub(crate) series: Option<String>,
}

pub struct Generator<'a> {
    pub(crate) meta: ProgramMeta,
    pub(crate) analysis: &'a Analysis,
    pub(crate) opts: GeneratorOptions,

    pub(crate) body: String,
    pub(crate) indent: usize,

    /// Source name -> emitted name, one map per lexical scope
    pub(crate) scopes: Vec<HashMap<String, String>>,
    pub(crate) used_names: HashSet<String>,
    /// Source names known to hold a series at runtime
    pub(crate) series_vars: HashSet<String>,
    /// Source name -> user type, for method-call lowering
    pub(crate) var_types: HashMap<String, String>,
    /// Source name -> plot id, for fill() references
    pub(crate) plot_vars: HashMap<String, String>,
    pub(crate) input_bindings: Vec<InputBinding>,

    pub(crate) plot_counter: usize,
    pub(crate) fill_counter: usize,
    pub(crate) plot_ids: Vec<String>,
    /// Plot locals declared inside nested blocks, pre-declared before the
    /// body so the result object can reference them
    pub(crate) hoisted_plots: Vec<String>,
    pub(crate) plot_configs: Vec<PlotConfig>,
    pub(crate) fill_configs: Vec<FillConfig>,

    pub(crate) uses_na: bool,
    pub(crate) uses_nz: bool,
    pub(crate) uses_time: bool,
    pub(crate) uses_syminfo: bool,
    pub(crate) uses_timeframe: bool,
    pub(crate) used_time_components: BTreeSet<String>,

    pub(crate) warnings: Vec<String>,
}

impl<'a> Generator<'a> {
    fn new(
        meta: ProgramMeta,
        analysis: &'a Analysis,
        opts: GeneratorOptions,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            meta,
            analysis,
            opts,
            body: String::new(),
            indent: 0,
            scopes: vec![HashMap::new()],
            used_names: HashSet::new(),
            series_vars: HashSet::new(),
            var_types: HashMap::new(),
            plot_vars: HashMap::new(),
            input_bindings: vec![],
            plot_counter: 0,
            fill_counter: 0,
            plot_ids: vec![],
            hoisted_plots: vec![],
            plot_configs: vec![],
            fill_configs: vec![],
            uses_na: false,
            uses_nz: false,
            uses_time: false,
            uses_syminfo: false,
            uses_timeframe: false,
            used_time_components: BTreeSet::new(),
            warnings,
        }
    }

    // ----- name and buffer plumbing -----

    pub(crate) fn write_line(&mut self, line: &str) {
        if line.is_empty() {
            self.body.push('\n');
            return;
        }
        for _ in 0..self.indent {
            self.body.push_str("  ");
        }
        self.body.push_str(line);
        self.body.push('\n');
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    /// Bind a source name in the current scope, picking a unique emitted
    /// name.
    pub(crate) fn bind(&mut self, name: &str) -> String {
        let emitted = self.unique_name(&sanitize_identifier(name));
        self.used_names.insert(emitted.clone());
        // SAFETY: the generator always keeps at least the root scope
        self.scopes
            .last_mut()
            .unwrap()
            .insert(name.to_string(), emitted.clone());
        emitted
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |candidate: &str| {
            self.used_names.contains(candidate) || RESERVED_NAMES.contains(&candidate)
        };
        if !taken(base) {
            return base.to_string();
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{}_{}", base, counter);
            if !taken(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Generate a section into its own buffer without disturbing the body.
    fn capture<F: FnOnce(&mut Self)>(&mut self, indent: usize, f: F) -> String {
        let saved_body = std::mem::take(&mut self.body);
        let saved_indent = std::mem::replace(&mut self.indent, indent);
        f(self);
        self.indent = saved_indent;
        std::mem::replace(&mut self.body, saved_body)
    }

    // ----- top-level assembly -----

    fn run(&mut self, program: &Program) -> String {
        if self.meta.is_library {
            self.run_library(program)
        } else {
            self.run_indicator(program)
        }
    }

    fn run_indicator(&mut self, program: &Program) -> String {
        self.bind_inputs();

        // The body is produced first so the helper flags and the on-demand
        // prelude pieces are known during assembly
        let body = self.capture(1, |gen| gen.gen_stmts(&program.statements));
        let types = self.capture(0, Generator::emit_types);

        let mut out = String::new();
        out.push_str(&self.emit_header());

        if self.uses_na || self.uses_nz {
            out.push_str(&self.emit_helpers());
        }
        out.push_str(&types);
        out.push_str(&self.emit_inputs_section());
        out.push_str(&self.emit_market_records());

        let fn_name = camel_case(&self.meta.title);
        out.push_str(&self.emit_signature(&fn_name));
        out.push_str(&self.emit_destructuring());
        out.push_str(&self.emit_prelude());
        out.push_str(&body);
        out.push_str(&self.emit_return());
        out.push_str("}\n");
        out.push_str(&format!("\nexport const calculate = {};\n", fn_name));

        out
    }

    fn run_library(&mut self, program: &Program) -> String {
        let body = self.capture(0, |gen| {
            for stmt in &program.statements {
                match stmt {
                    Stmt::FunctionDecl {
                        name,
                        params,
                        body,
                        exported,
                    } => {
                        gen.gen_library_function(name, params, body, *exported);
                        gen.write_line("");
                    }
                    Stmt::VarDecl { .. } => gen.gen_stmt(stmt),
                    Stmt::Expression(_) => gen.gen_stmt(stmt),
                    _ => {}
                }
            }
        });
        let types = self.capture(0, Generator::emit_types);

        let mut out = String::new();
        out.push_str(&self.emit_header());
        if self.uses_na || self.uses_nz {
            out.push_str(&self.emit_helpers());
        }
        out.push_str(&types);
        out.push_str(&body);
        out
    }

    fn gen_library_function(
        &mut self,
        name: &str,
        params: &[pine_ast::FunctionParam],
        body: &[Stmt],
        exported: bool,
    ) {
        if exported {
            // The export keyword attaches to the same emission
            let rendered = self.capture(0, |gen| gen.gen_function(name, params, body));
            self.body.push_str("export ");
            self.body.push_str(&rendered);
        } else {
            self.gen_function(name, params, body);
        }
    }

    /// Pre-bind input names so body references resolve: scalars keep their
    /// emitted name, `source` inputs resolve to the selector series. The
    /// chosen names are recorded so the emitted interface, defaults, and
    /// destructuring use the same spelling as the body.
    fn bind_inputs(&mut self) {
        let inputs = self.meta.inputs.clone();
        for input in &inputs {
            let emitted = self.bind(&input.name);
            let series = if input.input_type == Kind::Source {
                let series_name = self.unique_name(&format!("{}Series", emitted));
                self.used_names.insert(series_name.clone());
                // SAFETY: root scope exists for the whole run
                self.scopes
                    .last_mut()
                    .unwrap()
                    .insert(input.name.clone(), series_name.clone());
                self.series_vars.insert(input.name.clone());
                Some(series_name)
            } else {
                None
            };
            self.input_bindings.push(InputBinding {
                name: input.name.clone(),
                emitted,
                series,
            });
        }
    }

    /// The emitted field name chosen for an input during `bind_inputs`.
    fn input_field_name(&self, name: &str) -> String {
        self.input_bindings
            .iter()
            .find(|binding| binding.name == name)
            .map(|binding| binding.emitted.clone())
            .unwrap_or_else(|| sanitize_identifier(name))
    }

    fn emit_header(&self) -> String {
        let mut out = String::new();
        if self.opts.include_imports {
            out.push_str(
                "import { Series, ta, math, array, matrix, str, type Bar } from \"@pine2ts/runtime\";\n",
            );
            for import in &self.meta.imports {
                let module = import.module_name();
                out.push_str(&format!("import * as {} from \"./{}\";\n", module, module));
            }
        } else {
            out.push_str(
                "type Bar = { time: number; open: number; high: number; low: number; close: number; volume: number };\n",
            );
        }
        out.push('\n');
        out
    }

    fn emit_helpers(&self) -> String {
        let mut out = String::new();
        out.push_str("function na(v: number | null | undefined): boolean {\n");
        out.push_str("  return v === null || v === undefined || Number.isNaN(v);\n");
        out.push_str("}\n\n");
        if self.uses_nz {
            out.push_str("function nz(v: number | null | undefined, replacement = 0): number {\n");
            out.push_str("  return na(v) ? replacement : (v as number);\n");
            out.push_str("}\n\n");
        }
        out
    }

    // ----- user types -----

    fn emit_types(&mut self) {
        let types = self.meta.types.clone();
        for type_info in &types {
            let export = if type_info.exported { "export " } else { "" };

            self.write_line(&format!("{}interface {} {{", export, type_info.name));
            self.indent += 1;
            for field in &type_info.fields {
                let (ts_type, _) = self.field_type_and_default(field);
                self.write_line(&format!("{}: {};", sanitize_identifier(&field.name), ts_type));
            }
            self.indent -= 1;
            self.write_line("}");
            self.write_line("");

            self.write_line(&format!("{}const {} = {{", export, type_info.name));
            self.indent += 1;

            // Factory with declared defaults; user-typed fields default to
            // null to avoid recursive construction
            let mut params = Vec::new();
            let mut field_names = Vec::new();
            for field in &type_info.fields {
                let field_name = sanitize_identifier(&field.name);
                let (ts_type, default) = self.field_type_and_default(field);
                params.push(format!("{}: {} = {}", field_name, ts_type, default));
                field_names.push(field_name);
            }
            self.write_line(&format!(
                "new({}): {} {{",
                params.join(", "),
                type_info.name
            ));
            self.indent += 1;
            self.write_line(&format!("return {{ {} }};", field_names.join(", ")));
            self.indent -= 1;
            self.write_line("},");

            let methods: Vec<_> = self
                .meta
                .methods_of(&type_info.name)
                .into_iter()
                .cloned()
                .collect();
            for method in methods {
                self.emit_method(&type_info.name, &method);
            }

            self.indent -= 1;
            self.write_line("};");
            self.write_line("");
        }
    }

    fn emit_method(&mut self, type_name: &str, method: &meta::MethodInfo) {
        self.push_scope();
        let mut params = vec![format!("self: {}", type_name)];
        for param in &method.params {
            let bound = self.bind(&param.name);
            match &param.default_value {
                Some(default) => {
                    let default_code = self.gen_expr(default);
                    params.push(format!("{} = {}", bound, default_code));
                }
                None => params.push(bound),
            }
        }

        self.write_line(&format!("{}({}) {{", method.name, params.join(", ")));
        self.indent += 1;

        if let Some((last, init)) = method.body.split_last() {
            for stmt in init {
                self.gen_stmt(stmt);
            }
            match last {
                Stmt::Expression(expr) => {
                    let code = self.gen_expr(expr);
                    self.write_line(&format!("return {};", code));
                }
                other => self.gen_stmt(other),
            }
        }

        self.indent -= 1;
        self.write_line("},");
        self.pop_scope();
    }

    fn field_type_and_default(&mut self, field: &pine_ast::TypeField) -> (String, String) {
        let annotation = field.type_annotation.as_str();

        if let Some((ts_type, type_default)) = mappings::primitive_type(annotation) {
            let default = match &field.default_value {
                Some(expr) => self.gen_expr(expr),
                None => type_default.to_string(),
            };
            return (ts_type.to_string(), default);
        }

        if self.meta.type_info(annotation).is_some() {
            return (format!("{} | null", annotation), "null".to_string());
        }

        if let Some(inner) = annotation
            .strip_prefix("array<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            let element = mappings::primitive_type(inner)
                .map(|(ts, _)| ts)
                .unwrap_or("any");
            return (format!("{}[]", element), "[]".to_string());
        }

        ("any".to_string(), "null".to_string())
    }

    // ----- inputs, market records, signature -----

    fn emit_inputs_section(&self) -> String {
        if self.meta.inputs.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        out.push_str("export interface IndicatorInputs {\n");
        for input in &self.meta.inputs {
            out.push_str(&format!(
                "  {}?: {};\n",
                self.input_field_name(&input.name),
                input.input_type.ts_type()
            ));
        }
        out.push_str("}\n\n");

        out.push_str("const defaultInputs = {\n");
        for input in &self.meta.inputs {
            out.push_str(&format!(
                "  {}: {},\n",
                self.input_field_name(&input.name),
                input.defval
            ));
        }
        out.push_str("};\n\n");
        out
    }

    fn emit_market_records(&self) -> String {
        let mut out = String::new();
        if self.uses_syminfo {
            out.push_str("interface SymbolInfo {\n  ticker: string;\n  tickerid: string;\n  currency: string;\n  type: string;\n  mintick: number;\n}\n\n");
            out.push_str("const defaultSyminfo: SymbolInfo = {\n  ticker: \"SYM\",\n  tickerid: \"SYM\",\n  currency: \"USD\",\n  type: \"stock\",\n  mintick: 0.01,\n};\n\n");
        }
        if self.uses_timeframe {
            out.push_str("interface TimeframeInfo {\n  period: string;\n  multiplier: number;\n  isintraday: boolean;\n  isdaily: boolean;\n  isweekly: boolean;\n  ismonthly: boolean;\n}\n\n");
            out.push_str("const defaultTimeframe: TimeframeInfo = {\n  period: \"D\",\n  multiplier: 1,\n  isintraday: false,\n  isdaily: true,\n  isweekly: false,\n  ismonthly: false,\n};\n\n");
        }
        out
    }

    fn emit_signature(&self, fn_name: &str) -> String {
        let mut params = vec!["bars: Bar[]".to_string()];

        let needs_market = self.uses_syminfo || self.uses_timeframe;
        if !self.meta.inputs.is_empty() {
            params.push("inputs: IndicatorInputs = {}".to_string());
        } else if needs_market {
            // Placeholder keeps the calculate(bars, inputs, ...) positions
            params.push("_inputs: object = {}".to_string());
        }
        if self.uses_syminfo {
            params.push("syminfoParam: Partial<SymbolInfo> = {}".to_string());
        }
        if self.uses_timeframe {
            params.push("timeframeParam: Partial<TimeframeInfo> = {}".to_string());
        }

        format!("export function {}({}) {{\n", fn_name, params.join(", "))
    }

    fn emit_destructuring(&self) -> String {
        let mut out = String::new();
        if !self.meta.inputs.is_empty() {
            let fields: Vec<String> = self
                .meta
                .inputs
                .iter()
                .map(|input| self.input_field_name(&input.name))
                .collect();
            out.push_str(&format!(
                "  const {{ {} }} = {{ ...defaultInputs, ...inputs }};\n",
                fields.join(", ")
            ));
        }
        if self.uses_syminfo {
            out.push_str("  const syminfo = { ...defaultSyminfo, ...syminfoParam };\n");
        }
        if self.uses_timeframe {
            out.push_str("  const timeframe = { ...defaultTimeframe, ...timeframeParam };\n");
        }
        out
    }

    fn emit_prelude(&self) -> String {
        let mut out = String::new();
        for field in ["open", "high", "low", "close", "volume"] {
            out.push_str(&format!(
                "  const {field} = Series.fromBars(bars, \"{field}\");\n"
            ));
        }
        out.push_str("  const hl2 = high.add(low).div(2);\n");
        out.push_str("  const hlc3 = high.add(low).add(close).div(3);\n");
        out.push_str("  const ohlc4 = open.add(high).add(low).add(close).div(4);\n");
        out.push_str("  const hlcc4 = high.add(low).add(close).add(close).div(4);\n");
        out.push_str("  const last_bar_index = bars.length - 1;\n");

        if self.uses_time {
            out.push_str("  const time = Series.fromArray(bars, bars.map((b) => b.time));\n");
        }
        for component in TIME_COMPONENTS {
            if !self.used_time_components.contains(component) {
                continue;
            }
            let accessor = match component {
                "year" => "new Date(b.time).getUTCFullYear()",
                "month" => "new Date(b.time).getUTCMonth() + 1",
                "dayofmonth" => "new Date(b.time).getUTCDate()",
                "dayofweek" => "new Date(b.time).getUTCDay() + 1",
                "hour" => "new Date(b.time).getUTCHours()",
                "minute" => "new Date(b.time).getUTCMinutes()",
                "second" => "new Date(b.time).getUTCSeconds()",
                _ => continue,
            };
            out.push_str(&format!(
                "  const {} = Series.fromArray(bars, bars.map((b) => {}));\n",
                component, accessor
            ));
        }

        for id in &self.hoisted_plots {
            out.push_str(&format!("  let {} = Series.fromScalar(bars, NaN);\n", id));
        }

        // Runtime selection for source inputs, defaulting to close
        for binding in &self.input_bindings {
            let Some(series) = &binding.series else {
                continue;
            };
            out.push_str(&format!(
                "  const {} = ({{ open, high, low, close, hl2, hlc3, ohlc4, hlcc4 }} as Record<string, Series>)[{}] ?? close;\n",
                series, binding.emitted
            ));
        }

        out.push('\n');
        out
    }

    // ----- result object -----

    fn emit_return(&self) -> String {
        let mut out = String::new();
        out.push_str("\n  return {\n");
        out.push_str(&format!(
            "    metadata: {{ title: {}, overlay: {} }},\n",
            ts_quote(&self.meta.title),
            self.meta.overlay
        ));

        if self.plot_ids.is_empty() {
            out.push_str("    plots: {},\n");
        } else {
            out.push_str("    plots: {\n");
            for id in &self.plot_ids {
                out.push_str(&format!("      {id}: {id}.toPoints(),\n"));
            }
            out.push_str("    },\n");
        }

        out.push_str("    plotConfigs: [\n");
        for config in &self.plot_configs {
            out.push_str(&format!("      {},\n", render_plot_config(config)));
        }
        out.push_str("    ],\n");

        out.push_str("    fillConfigs: [\n");
        for config in &self.fill_configs {
            out.push_str(&format!("      {},\n", render_fill_config(config)));
        }
        out.push_str("    ],\n");

        out.push_str("  };\n");
        out
    }
}

fn render_plot_config(config: &PlotConfig) -> String {
    let mut fields = vec![format!("id: {}", ts_quote(&config.id))];
    if let Some(title) = &config.title {
        fields.push(format!("title: {}", ts_quote(title)));
    }
    if let Some(color) = &config.color {
        fields.push(format!("color: {}", ts_quote(color)));
    }
    fields.push(format!("lineWidth: {}", config.line_width));
    if let Some(display) = &config.display {
        fields.push(format!("display: {}", ts_quote(display)));
    }
    if let Some(visible) = &config.visible {
        fields.push(format!("visible: {}", visible));
    }
    if let Some(offset) = config.offset {
        fields.push(format!("offset: {}", offset));
    }
    format!("{{ {} }}", fields.join(", "))
}

fn render_fill_config(config: &FillConfig) -> String {
    let mut fields = vec![
        format!("id: {}", ts_quote(&config.id)),
        format!("plot1: {}", ts_quote(&config.plot1)),
        format!("plot2: {}", ts_quote(&config.plot2)),
    ];
    if let Some(color) = &config.color {
        fields.push(format!("color: {}", ts_quote(color)));
    }
    if let Some(title) = &config.title {
        fields.push(format!("title: {}", ts_quote(title)));
    }
    if let Some(visible) = &config.visible {
        fields.push(format!("visible: {}", visible));
    }
    format!("{{ {} }}", fields.join(", "))
}

// ----- shared text helpers -----

/// Sanitize a source identifier: non-alphanumerics collapse to single
/// underscores, leading digits gain a prefix, and empty results become
/// `unnamed`.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_underscore = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }

    let mut result = out.trim_matches('_').to_string();
    if result.is_empty() {
        return "unnamed".to_string();
    }
    // SAFETY: checked non-empty above
    if result.chars().next().unwrap().is_ascii_digit() {
        result.insert(0, '_');
    }
    result
}

/// Camel-case a title into the exported function name.
fn camel_case(title: &str) -> String {
    let words: Vec<String> = title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if words.is_empty() {
        return "indicator".to_string();
    }

    let mut out = words[0].clone();
    for word in &words[1..] {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    // SAFETY: out is non-empty when words is non-empty
    if out.chars().next().unwrap().is_ascii_digit() {
        out.insert(0, '_');
    }
    out
}

/// Format a number as a TypeScript literal; whole values drop the fraction.
pub(crate) fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

/// Quote a string as a TypeScript double-quoted literal.
pub(crate) fn ts_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pine_analyzer::analyze;
    use pine_lexer::Lexer;
    use pine_parser::Parser;

    fn transpile(source: &str) -> GeneratedCode {
        let (tokens, lex_errors) = Lexer::new(source).tokenize();
        assert!(lex_errors.is_empty(), "lexer errors: {:?}", lex_errors);
        let (stmts, parse_errors) = Parser::new(tokens).parse();
        assert!(parse_errors.is_empty(), "parse errors: {:?}", parse_errors);
        let program = Program::new(stmts);
        let analysis = analyze(&program);
        generate(&program, &analysis, &GeneratorOptions::default())
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("my var"), "my_var");
        assert_eq!(sanitize_identifier("a--b"), "a_b");
        assert_eq!(sanitize_identifier("9lives"), "_9lives");
        assert_eq!(sanitize_identifier("__x__"), "x");
        assert_eq!(sanitize_identifier("$$$"), "unnamed");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("MA"), "ma");
        assert_eq!(camel_case("My Moving Average"), "myMovingAverage");
        assert_eq!(camel_case(""), "indicator");
        assert_eq!(camel_case("3rd Wave"), "_3rdWave");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(9.0), "9");
        assert_eq!(format_number(3.14), "3.14");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_plain_sma_unit() {
        let source = r#"indicator(title="MA")
len = input.int(9, minval=1)
src = input(close)
out = ta.sma(src, len)
plot(out, color=color.blue, title="MA")
"#;
        let result = transpile(source);
        let code = &result.code;

        assert!(code.contains("export interface IndicatorInputs"), "{}", code);
        assert!(code.contains("len?: number;"), "{}", code);
        assert!(code.contains("\"hlcc4\""), "{}", code);
        assert!(code.contains("len: 9"), "{}", code);
        assert!(code.contains("src: \"close\""), "{}", code);
        assert!(code.contains("const out = ta.sma(srcSeries, len);"), "{}", code);
        assert!(code.contains("const plot0 = out;"), "{}", code);
        assert!(code.contains("plot0: plot0.toPoints()"), "{}", code);

        assert_eq!(result.plot_configs.len(), 1);
        let config = &result.plot_configs[0];
        assert_eq!(config.id, "plot0");
        assert_eq!(config.title.as_deref(), Some("MA"));
        assert_eq!(config.color.as_deref(), Some("#0000FF"));
        assert_eq!(config.line_width, 2);
    }

    #[test]
    fn test_reserved_input_name_renamed_consistently() {
        // "time" belongs to the prelude, so the input is renamed; the
        // interface, defaults, destructuring, and body must agree on the
        // new spelling
        let source = "indicator(\"X\")\ntime = input.int(5, title=\"Offset\")\nplot(close + time)\n";
        let result = transpile(source);
        let code = &result.code;

        assert!(code.contains("time_1?: number;"), "{}", code);
        assert!(code.contains("time_1: 5"), "{}", code);
        assert!(
            code.contains("const { time_1 } = { ...defaultInputs, ...inputs };"),
            "{}",
            code
        );
        assert!(code.contains("close.add(time_1)"), "{}", code);
        assert!(!code.contains("const { time }"), "{}", code);
    }

    #[test]
    fn test_reserved_source_input_selector_uses_bound_names() {
        let source = "indicator(\"X\")\nclose = input(close)\nplot(ta.sma(close, 9))\n";
        let result = transpile(source);
        let code = &result.code;

        // The input collides with the close series; both the scalar and the
        // selector series are renamed together
        assert!(code.contains("const { close_1 } = { ...defaultInputs, ...inputs };"), "{}", code);
        assert!(code.contains("const close_1Series = ("), "{}", code);
        assert!(code.contains("[close_1] ?? close;"), "{}", code);
        assert!(code.contains("ta.sma(close_1Series, 9)"), "{}", code);
    }

    #[test]
    fn test_target_reserved_word_renamed() {
        let result = transpile("class = close > open\nplot(close)\n");
        let code = &result.code;
        assert!(code.contains("const class_1 = close.gt(open);"), "{}", code);
        assert!(!code.contains("const class ="), "{}", code);
    }

    #[test]
    fn test_zero_input_signature() {
        let result = transpile("indicator(\"Bare\")\nplot(close)\n");
        assert!(result.code.contains("export function bare(bars: Bar[]) {"));
        assert!(!result.code.contains("IndicatorInputs"));
    }

    #[test]
    fn test_history_access_uses_offset() {
        let source = "source = close\nlength = 10\nroc = 100 * (source - source[length]) / source[length]\nplot(roc)\n";
        let result = transpile(source);
        assert!(
            result.code.contains(
                "source.sub(source.offset(length)).mul(100).div(source.offset(length))"
            ),
            "{}",
            result.code
        );
        assert!(!result.code.contains(".get(length)"), "{}", result.code);
    }

    #[test]
    fn test_recursive_rewrite() {
        let source = "length = 14\nsource = close\nmg = 0.0\nmg := na(mg[1]) ? ta.ema(source, length) : mg[1] + (source - mg[1]) / (length * math.pow(source / mg[1], 4))\nplot(mg)\n";
        let result = transpile(source);
        let code = &result.code;

        assert!(code.contains("const mgValues = new Array(bars.length).fill(NaN);"), "{}", code);
        assert!(code.contains("for (let i = 0; i < bars.length; i++) {"), "{}", code);
        assert!(code.contains("const mgPrev = i > 0 ? mgValues[i - 1] : NaN;"), "{}", code);
        assert!(code.contains("mgPrev + ((source.get(i) - mgPrev) /"), "{}", code);
        assert!(code.contains("math.pow"), "{}", code);
        assert!(code.contains("mg = Series.fromArray(bars, mgValues);"), "{}", code);
    }

    #[test]
    fn test_non_recursive_reassignment() {
        let result = transpile("x = 10\nx := x + 5\nplot(x)\n");
        let code = &result.code;

        assert!(!code.contains("xValues"), "{}", code);
        assert!(code.contains("let x = Series.fromScalar(bars, 10);"), "{}", code);
        assert!(code.contains("x = x.add(5);"), "{}", code);
    }

    #[test]
    fn test_vwma_gains_volume() {
        let result = transpile("v = ta.vwma(close, 20)\nplot(v)\n");
        assert!(result.code.contains("ta.vwma(close, 20, volume)"), "{}", result.code);
    }

    #[test]
    fn test_switch_lowering_with_scrutinee() {
        let source = "mode = \"a\"\nx = switch mode\n    \"a\" => 1\n    \"b\" => 2\n    => 0\nplot(x)\n";
        let result = transpile(source);
        let code = &result.code;
        assert!(code.contains("(() => { switch (mode) {"), "{}", code);
        assert!(code.contains("case \"a\": return 1;"), "{}", code);
        assert!(code.contains("default: return 0;"), "{}", code);
    }

    #[test]
    fn test_switch_ladder_without_scrutinee() {
        let source = "x = switch\n    close > open => 1\n    => 0\nplot(x)\n";
        let result = transpile(source);
        assert!(result.code.contains("if (close.gt(open)) return 1;"), "{}", result.code);
    }

    #[test]
    fn test_plot_ids_sequential_in_dead_code() {
        let source = "if false\n    plot(close)\nplot(open)\n";
        let result = transpile(source);
        assert_eq!(result.plot_configs.len(), 2);
        assert_eq!(result.plot_configs[0].id, "plot0");
        assert_eq!(result.plot_configs[1].id, "plot1");
    }

    #[test]
    fn test_fill_references_plots() {
        let source = "p1 = plot(high)\np2 = plot(low)\nfill(p1, p2, color=color.green)\n";
        let result = transpile(source);
        assert_eq!(result.fill_configs.len(), 1);
        let fill = &result.fill_configs[0];
        assert_eq!(fill.plot1, "plot0");
        assert_eq!(fill.plot2, "plot1");
        assert_eq!(fill.color.as_deref(), Some("#00FF00"));
    }

    #[test]
    fn test_fill_conditional_color() {
        let source = "p1 = plot(high)\np2 = plot(low)\nshow = true\nfill(p1, p2, color=show ? color.red : na)\n";
        let result = transpile(source);
        let fill = &result.fill_configs[0];
        assert_eq!(fill.color.as_deref(), Some("#FF0000"));
        assert_eq!(fill.visible.as_deref(), Some("show"));
    }

    #[test]
    fn test_display_function_skipped_with_warning() {
        let result = transpile("bgcolor(color.red)\nplot(close)\n");
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("bgcolor")));
        assert!(!result.code.contains("bgcolor"));
    }

    #[test]
    fn test_ternary_balances_scalar_branch() {
        let source = "up = close > open\nx = up ? close : 0\nplot(x)\n";
        let result = transpile(source);
        assert!(
            result.code.contains("Series.fromScalar(bars, 0)"),
            "{}",
            result.code
        );
    }

    #[test]
    fn test_runtime_error_lowering() {
        let source = "if close > open\n    runtime.error(\"bad state\")\nplot(close)\n";
        let result = transpile(source);
        assert!(
            result
                .code
                .contains("(() => { throw new Error(\"bad state\"); })();"),
            "{}",
            result.code
        );
    }

    #[test]
    fn test_array_new_generic() {
        let result = transpile("a = array.new<float>(10, 0)\nb = array.new<int>(3)\nplot(close)\n");
        assert!(result.code.contains("new Array(10).fill(0)"), "{}", result.code);
        assert!(result.code.contains("new Array(3).fill(null)"), "{}", result.code);
    }

    #[test]
    fn test_barstate_constants() {
        let source = "x = barstate.isfirst ? 1 : 0\ny = barstate.isconfirmed ? 1 : 0\nplot(close)\n";
        let result = transpile(source);
        assert!(result.code.contains("(i === 0)"), "{}", result.code);
        assert!(result.code.contains("(true ? 1 : 0)"), "{}", result.code);
    }

    #[test]
    fn test_user_type_emission() {
        let source = "type Point\n    float x\n    float y = 0\nmethod shifted(Point this, float dx) => Point.new(this.x + dx, this.y)\np = Point.new(1, 2)\nq = p.shifted(3)\nplot(close)\n";
        let result = transpile(source);
        let code = &result.code;

        assert!(code.contains("interface Point {"), "{}", code);
        assert!(code.contains("const Point = {"), "{}", code);
        assert!(code.contains("new(x: number = NaN, y: number = 0): Point {"), "{}", code);
        assert!(code.contains("shifted(self: Point, dx) {"), "{}", code);
        assert!(code.contains("return Point.new((self.x + dx), self.y);"), "{}", code);
        // Method call lowering through the static type table
        assert!(code.contains("const q = Point.shifted(p, 3);"), "{}", code);
    }

    #[test]
    fn test_import_alias_rewrites() {
        let source = "import acme/MathLib/2 as m\nx = m.double(close)\nplot(x)\n";
        let result = transpile(source);
        let code = &result.code;
        assert!(code.contains("import * as acme_MathLib_v2 from \"./acme_MathLib_v2\";"), "{}", code);
        assert!(code.contains("acme_MathLib_v2.double(close)"), "{}", code);
    }

    #[test]
    fn test_library_unit() {
        let source = "library(\"Helpers\")\nexport double(x) =>\n    x * 2\nhalf(x) =>\n    x / 2\n";
        let result = transpile(source);
        let code = &result.code;
        assert!(code.contains("export function double("), "{}", code);
        assert!(code.contains("function half("), "{}", code);
        assert!(!code.contains("export function helpers"), "{}", code);
        assert!(result.meta.is_library);
    }

    #[test]
    fn test_helpers_emitted_on_demand() {
        let with_nz = transpile("x = nz(close[1], 0)\nplot(close)\n");
        assert!(with_nz.code.contains("function nz("));
        assert!(with_nz.code.contains("function na("));

        let without = transpile("plot(close)\n");
        assert!(!without.code.contains("function nz("));
        assert!(!without.code.contains("function na("));
    }

    #[test]
    fn test_include_imports_toggle() {
        let source = "plot(close)\n";
        let (tokens, _) = Lexer::new(source).tokenize();
        let (stmts, _) = Parser::new(tokens).parse();
        let program = Program::new(stmts);
        let analysis = analyze(&program);

        let suppressed = generate(
            &program,
            &analysis,
            &GeneratorOptions {
                include_imports: false,
                ..Default::default()
            },
        );
        assert!(!suppressed.code.contains("@pine2ts/runtime"));
        assert!(suppressed.code.contains("type Bar = {"));
    }

    #[test]
    fn test_metadata_in_return() {
        let result = transpile("indicator(title=\"Test\", overlay=true)\nplot(close)\n");
        assert!(result
            .code
            .contains("metadata: { title: \"Test\", overlay: true }"));
    }

    #[test]
    fn test_for_loop_with_step() {
        let source = "total = 0.0\nfor i = 0 to 10 by 2\n    total := total + i\nplot(close)\n";
        let result = transpile(source);
        assert!(
            result.code.contains("for (let i_1 = 0; i_1 <= 10; i_1 += 2) {"),
            "{}",
            result.code
        );
    }

    #[test]
    fn test_time_components_on_demand() {
        let result = transpile("h = hour\nplot(close)\n");
        assert!(result.code.contains("getUTCHours()"), "{}", result.code);
        assert!(!result.code.contains("getUTCFullYear()"), "{}", result.code);
    }

    #[test]
    fn test_syminfo_merge() {
        let result = transpile("t = syminfo.ticker\nplot(close)\n");
        let code = &result.code;
        assert!(code.contains("const syminfo = { ...defaultSyminfo, ...syminfoParam };"), "{}", code);
        assert!(code.contains("syminfo.ticker"), "{}", code);
    }
}
