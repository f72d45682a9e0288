use std::{
    io::{stdin, stdout, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;

use interpreter::{InterpretError, Interpreter};

/// Exit status when the source has lexical or syntax errors.
const EXIT_STATIC_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;

/// Runs a script, or starts an interactive prompt when no script is given.
#[derive(clap::Parser)]
#[command(version)]
struct Args {
    /// Script to run.
    file: Option<PathBuf>,

    /// Run SOURCE instead of a script file.
    #[arg(short, long, value_name = "SOURCE", conflicts_with = "file")]
    eval: Option<String>,
}

fn run(source: &str, interpreter: &mut Interpreter) -> anyhow::Result<ExitCode> {
    match interpreter.run_source(source) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(InterpretError::Static(errors)) => {
            eprintln!("{errors}");
            Ok(ExitCode::from(EXIT_STATIC_ERROR))
        }
        Err(InterpretError::Runtime(e)) => {
            eprintln!("{e}");
            Ok(ExitCode::from(EXIT_RUNTIME_ERROR))
        }
        Err(e @ InterpretError::Output(_)) => Err(e.into()),
    }
}

fn run_file(path: PathBuf, interpreter: &mut Interpreter) -> anyhow::Result<ExitCode> {
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("Could not read {}", path.display()))?;
    run(&source, interpreter)
}

fn run_prompt(interpreter: &mut Interpreter) -> anyhow::Result<ExitCode> {
    loop {
        print!("> ");
        stdout().flush()?;
        let mut line = String::new();
        if stdin().read_line(&mut line)? == 0 {
            println!();
            return Ok(ExitCode::SUCCESS);
        }
        match interpreter.run_prompt_line(&line) {
            Ok(()) => (),
            Err(InterpretError::Output(e)) => return Err(e.into()),
            Err(e) => eprintln!("{}", e),
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    env_logger::init();
    let args = Args::parse();

    let mut interpreter = Interpreter::default();

    match (args.file, args.eval) {
        (Some(file), _) => run_file(file, &mut interpreter),
        (None, Some(source)) => run(&source, &mut interpreter),
        (None, None) => {
            log::debug!("No script given, starting prompt");
            run_prompt(&mut interpreter)
        }
    }
}
