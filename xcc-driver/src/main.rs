//! xcc compiler driver
//!
//! Runs the staged pipeline: parse, lower to IR, allocate and emit.
//! Each stage must succeed in full before the next begins; static
//! errors are collected and printed together, and no output file is
//! written once anything has failed.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use xcc_common::{CompilerError, ErrorReporter};
use xcc_frontend::Frontend;

#[derive(Parser)]
#[command(name = "xcc")]
#[command(about = "A C-subset compiler targeting x86-64 System V")]
#[command(version)]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Output assembly file (defaults to the input with a .s
    /// extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the IR dump to stdout and continue
    #[arg(long)]
    emit_ir: bool,

    /// Print the parsed AST (debug form) and stop
    #[arg(long)]
    dump_ast: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(Failure::Static(count)) => {
            eprintln!("{count} error(s); no output written");
            ExitCode::from(1)
        }
        Err(Failure::Fatal(err)) => {
            eprintln!("xcc: {err}");
            match err {
                CompilerError::Internal { .. } => ExitCode::from(101),
                _ => ExitCode::from(1),
            }
        }
    }
}

enum Failure {
    /// Diagnostics were reported; count attached
    Static(usize),
    Fatal(CompilerError),
}

impl From<CompilerError> for Failure {
    fn from(err: CompilerError) -> Self {
        Failure::Fatal(err)
    }
}

fn run(cli: &Cli) -> Result<(), Failure> {
    let source = fs::read_to_string(&cli.input).map_err(CompilerError::from)?;
    let filename = cli.input.display().to_string();

    let unit = Frontend::parse_source(&source, &filename)?;
    if cli.dump_ast {
        println!("{unit:#?}");
        return Ok(());
    }

    let module_name = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());

    let mut reporter = ErrorReporter::new();
    let module = xcc_ir::lower_to_ir(&unit, &module_name, &mut reporter)?;

    if reporter.has_errors() {
        reporter.print_diagnostics();
        return Err(Failure::Static(reporter.error_count()));
    }

    if cli.emit_ir {
        print!("{module}");
    }

    log::debug!("IR complete, {} symbols", module.symbols().len());
    let asm = xcc_codegen::generate_assembly(&module)?;

    let output_path = cli.output.clone().unwrap_or_else(|| {
        let mut path = cli.input.clone();
        path.set_extension("s");
        path
    });
    fs::write(&output_path, asm).map_err(CompilerError::from)?;
    log::info!("assembly written to {}", output_path.display());
    Ok(())
}
