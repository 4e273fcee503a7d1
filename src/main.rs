use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use phpjs_compiler::{compile_php, init_tracing, CompileOptions, CompilerError, CompilerResult};

#[derive(Parser, Debug)]
#[command(name = "phpjs", version, about = "Compiles a subset of PHP to JavaScript")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the program whose script class is declared in FILE.
    Compile {
        file: PathBuf,

        /// JSON file with compilation options.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip parsing the generated program.
        #[arg(long)]
        no_verify: bool,

        /// Write the program here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report errors as JSON on stderr.
        #[arg(long)]
        json_errors: bool,
    },
}

fn run_compile(
    file: &PathBuf,
    config: Option<&PathBuf>,
    no_verify: bool,
    output: Option<&PathBuf>,
) -> CompilerResult<()> {
    let mut options = match config {
        Some(path) => CompileOptions::from_file(path)?,
        None => CompileOptions::default(),
    };
    if no_verify {
        options.verify_output = false;
    }
    let program = compile_php(file, options)?;
    match output {
        Some(path) => fs::write(path, &program.js)
            .map_err(|e| CompilerError::from(e).in_file(&path.display().to_string()))?,
        None => print!("{}", program.js),
    }
    Ok(())
}

fn report(err: &CompilerError, json: bool) {
    if json {
        match serde_json::to_string_pretty(err) {
            Ok(text) => eprintln!("{}", text),
            Err(_) => eprintln!("{}", err),
        }
        return;
    }
    eprintln!("error: {}", err);
    for hint in &err.hints {
        eprintln!("  hint: {}", hint);
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Compile {
            file,
            config,
            no_verify,
            output,
            json_errors,
        } => match run_compile(&file, config.as_ref(), no_verify, output.as_ref()) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                report(&err, json_errors);
                ExitCode::FAILURE
            }
        },
    }
}
