use clap::Parser;
use pine_lexer::Lexer;
use pine_parser::Parser as PineParser;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Front-end debugging tool: runs a PineScript source through the lexer and
/// parser and dumps the AST as JSON, with recovered diagnostics on stderr.
#[derive(Parser)]
#[command(name = "pine-parser", about = "Dump the AST of a PineScript source as JSON")]
struct Cli {
    /// Source file; standard input when omitted or "-"
    #[arg(value_name = "SOURCE")]
    source: Option<PathBuf>,

    /// Dump the token stream instead of the AST
    #[arg(long)]
    tokens: bool,

    /// Emit compact JSON on one line
    #[arg(long)]
    compact: bool,
}

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(&cli));
}

fn run(cli: &Cli) -> i32 {
    let source = match read_source(cli.source.as_deref()) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("pine-parser: {}", err);
            return 1;
        }
    };

    let (tokens, lex_errors) = Lexer::new(&source).tokenize();
    for err in &lex_errors {
        eprintln!("lex: {}", err);
    }

    if cli.tokens {
        for token in &tokens {
            println!("{:>4}:{:<3} {:?}", token.line, token.column, token.typ);
        }
        return i32::from(!lex_errors.is_empty());
    }

    let (ast, parse_errors) = PineParser::new(tokens).parse();
    for err in &parse_errors {
        eprintln!("parse: {}", err);
    }

    let rendered = if cli.compact {
        serde_json::to_string(&ast)
    } else {
        serde_json::to_string_pretty(&ast)
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(err) => {
            eprintln!("json: {}", err);
            return 1;
        }
    }

    i32::from(!lex_errors.is_empty() || !parse_errors.is_empty())
}

fn read_source(path: Option<&Path>) -> std::io::Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(path),
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
