//! The lia command-line compiler.
//!
//! Processes each source file in order and, when no errors were found,
//! generates the final code into one output file. The exit status is the
//! accumulated error count.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use lia::compiler;
use lia::core::DriverError;
use lia::target;
use lia::{Emitter, Session};

#[derive(Parser)]
#[command(version, about = "Compiles Lia sources to Ases code.")]
struct Args {
    /// Lia source files; `-` reads standard input (at most once)
    #[arg(required = true, value_name = "FILE")]
    inputs: Vec<String>,

    /// Output file name
    #[arg(short, long, default_value = "out.ases")]
    output: PathBuf,

    /// Annotate the output with source line comments
    #[arg(short, long)]
    pretty: bool,

    /// Directory searched by `[import ...]`, usable multiple times
    #[arg(short = 'I', long = "include", value_name = "DIR")]
    include: Vec<PathBuf>,

    /// Code generation backend
    #[arg(short, long, default_value = "ases")]
    target: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(errors) => ExitCode::from(u8::try_from(errors).unwrap_or(u8::MAX)),
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<u32, DriverError> {
    let target = target::by_name(&args.target)
        .ok_or_else(|| DriverError::UnknownTarget(args.target.clone()))?;

    let mut sess = Session::new();
    sess.pretty = args.pretty;
    sess.search_paths = args.include;
    sess.macros.define_value(&mut sess.toks, "TARGET", &args.target);

    let mut from_stdin = false;
    for name in &args.inputs {
        let source = if name == "-" {
            if from_stdin {
                return Err(DriverError::StdinRepeated);
            }
            from_stdin = true;
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        } else {
            fs::read_to_string(name).map_err(|_| DriverError::InputNotFound(name.clone()))?
        };

        compiler::process(&mut sess, name, &source);

        // Generating code from a broken program makes no sense; leave the
        // previous output untouched.
        if sess.errcount > 0 {
            return Ok(sess.errcount);
        }
    }

    let file = File::create(&args.output)
        .map_err(|_| DriverError::OutputUnwritable(args.output.display().to_string()))?;
    let mut file = BufWriter::new(file);
    let mut out = Emitter::new(&mut file);

    let errors = compiler::generate(&mut sess, target, &mut out)?;
    out.flush()?;
    Ok(errors)
}
