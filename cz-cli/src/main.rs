use anyhow::Result;
use clap::{Parser, Subcommand};
use cz_compiler::pipeline::{self, CompileError, PipelineOptions};
use std::path::PathBuf;
use std::process::{Command, ExitCode};

#[derive(Parser)]
#[command(name = "czar")]
#[command(version = "0.1.0")]
#[command(about = "CZar: compiles CZ source to C", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Select the debug allocator and enable `#DEBUG()` output.
    #[arg(long, global = true)]
    debug: bool,

    /// Root directory used to resolve `import` statements.
    #[arg(long, global = true, value_name = "DIR")]
    std_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a .cz file to a single C translation unit.
    Compile {
        input: PathBuf,
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Compile, then invoke the host C compiler on the result.
    Build {
        input: PathBuf,
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Build, then execute the resulting binary.
    Run {
        input: PathBuf,
        #[arg(last = true)]
        args: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let std_root = cli.std_root.clone().unwrap_or_else(|| PathBuf::from("std"));
    let options = PipelineOptions { std_root, debug: cli.debug, allow_run: matches!(cli.command, Commands::Run { .. }) };

    let result = match cli.command {
        Commands::Compile { input, output } => compile_to_file(&input, options, output),
        Commands::Build { input, output } => build(&input, options, output).map(|_| ()),
        Commands::Run { input, args } => run(&input, options, args),
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            if let Some(CompileError::Diagnostics(count)) = err.downcast_ref::<CompileError>() {
                eprintln!("{}", format!("{count} error(s)").as_str());
                return ExitCode::from(1);
            }
            log::error!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn compile_to_file(input: &PathBuf, options: PipelineOptions, output: Option<PathBuf>) -> Result<()> {
    let output_path = output.unwrap_or_else(|| input.with_extension("c"));
    let compiled = pipeline::compile(input, options)?;
    print_diagnostics(&compiled.diagnostics, input);
    std::fs::write(&output_path, compiled.c_source)?;
    println!("wrote {}", output_path.display());
    Ok(())
}

/// Returns the path to the linked binary.
fn build(input: &PathBuf, options: PipelineOptions, output: Option<PathBuf>) -> Result<PathBuf> {
    let c_path = input.with_extension("c");
    let compiled = pipeline::compile(input, options)?;
    print_diagnostics(&compiled.diagnostics, input);
    std::fs::write(&c_path, compiled.c_source)?;

    let bin_path = output.unwrap_or_else(|| input.with_extension(""));
    let cc = std::env::var("CC").unwrap_or_else(|_| "cc".to_string());
    let status = Command::new(&cc).arg(&c_path).arg("-o").arg(&bin_path).arg("-std=c11").status()?;
    if !status.success() {
        anyhow::bail!("{cc} failed to compile {}", c_path.display());
    }
    Ok(bin_path)
}

fn run(input: &PathBuf, options: PipelineOptions, args: Vec<String>) -> Result<()> {
    let bin_path = build(input, options, None)?;
    let status = Command::new(&bin_path).args(&args).status()?;
    if !status.success() {
        anyhow::bail!("{} exited with {status}", bin_path.display());
    }
    Ok(())
}

fn print_diagnostics(diagnostics: &[cz_diagnostics::Diagnostic], input: &PathBuf) {
    let source = std::fs::read_to_string(input).unwrap_or_default();
    for diagnostic in diagnostics {
        eprint!("{}", diagnostic.format_pretty(&source));
    }
}
