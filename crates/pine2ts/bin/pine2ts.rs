use clap::Parser;
use pine2ts::{transpile_with_libraries, TranspileOptions};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "pine2ts",
    about = "Transpile PineScript v6 indicators to TypeScript",
    version,
    disable_version_flag = true
)]
struct Cli {
    /// Input PineScript file
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output TypeScript file; generated code goes to stdout when omitted
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Directory to resolve library imports from (defaults to the input's
    /// directory)
    #[arg(long = "lib-path", value_name = "DIR")]
    lib_path: Option<PathBuf>,

    /// Suppress the runtime import header
    #[arg(long = "no-imports")]
    no_imports: bool,

    /// Print version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> eyre::Result<()> {
    let source = fs::read_to_string(&cli.input)
        .map_err(|e| eyre::eyre!("reading {}: {}", cli.input.display(), e))?;

    let lib_path = cli
        .lib_path
        .clone()
        .or_else(|| cli.input.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let options = TranspileOptions {
        filename: Some(cli.input.display().to_string()),
        include_imports: !cli.no_imports,
        library_base_path: Some(lib_path),
        ..Default::default()
    };

    let output = transpile_with_libraries(&source, &options)?;

    match &cli.output {
        Some(path) => {
            fs::write(path, &output.main)
                .map_err(|e| eyre::eyre!("writing {}: {}", path.display(), e))?;

            // Library modules land next to the main output
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            for library in &output.libraries {
                let lib_path = dir.join(format!("{}.ts", library.module_name));
                fs::write(&lib_path, &library.code)
                    .map_err(|e| eyre::eyre!("writing {}: {}", lib_path.display(), e))?;
            }

            if output.libraries.is_empty() {
                println!("Transpiled {} -> {}", cli.input.display(), path.display());
            } else {
                println!(
                    "Transpiled {} -> {} (+{} libraries)",
                    cli.input.display(),
                    path.display(),
                    output.libraries.len()
                );
            }
        }
        None => print!("{}", output.main),
    }

    Ok(())
}
