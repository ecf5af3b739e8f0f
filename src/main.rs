//! `impc` command-line interface.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{generate, Shell};
use impc::eval::Evaluator;
use impc::{codegen, compile_file, pretty, CompileError, CompilerConfig};
use std::fs;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

#[derive(ClapParser)]
#[command(name = "impc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Imp compiler - check, optimize, and assemble Imp programs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an Imp source file to NASM assembly
    Build {
        /// Input Imp source file
        input: PathBuf,

        /// Output assembly path (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip constant-propagation/algebraic optimization
        #[arg(long)]
        no_optimize: bool,

        /// Also print the pretty-printed (post-optimization) source to stderr
        #[arg(long)]
        keep_pretty: bool,
    },

    /// Parse and type-check a file without emitting anything
    Check {
        /// Input Imp source file
        input: PathBuf,
    },

    /// Print the pretty-printed form of a program
    Pretty {
        /// Input Imp source file
        input: PathBuf,

        /// Skip constant-propagation/algebraic optimization
        #[arg(long)]
        no_optimize: bool,
    },

    /// Run a program with the in-process evaluator
    Eval {
        /// Input Imp source file
        input: PathBuf,

        /// File to read `read(...)` input from (defaults to stdin)
        #[arg(long)]
        input_file: Option<PathBuf>,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            no_optimize,
            keep_pretty,
        } => run_build(&input, output.as_deref(), no_optimize, keep_pretty),
        Commands::Check { input } => run_check(&input),
        Commands::Pretty { input, no_optimize } => run_pretty(&input, no_optimize),
        Commands::Eval { input, input_file } => run_eval(&input, input_file.as_deref()),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "impc", &mut io::stdout());
}

fn run_build(input: &std::path::Path, output: Option<&std::path::Path>, no_optimize: bool, keep_pretty: bool) {
    let config = CompilerConfig::new().with_optimize(!no_optimize);
    let mut program = match compile_file(input, &config) {
        Ok(p) => p,
        Err(e) => fail(&e),
    };

    if keep_pretty {
        eprint!("{}", pretty::print_program(&program));
    }

    let asm = codegen::generate(&mut program);
    match output {
        Some(path) => {
            if let Err(e) = fs::write(path, asm) {
                eprintln!("Error: could not write '{}': {}", path.display(), e);
                process::exit(1);
            }
        }
        None => print!("{}", asm),
    }
}

fn run_check(input: &std::path::Path) {
    match compile_file(input, &CompilerConfig::default()) {
        Ok(_) => println!("OK"),
        Err(e) => fail(&e),
    }
}

fn run_pretty(input: &std::path::Path, no_optimize: bool) {
    let config = CompilerConfig::new().with_optimize(!no_optimize);
    match compile_file(input, &config) {
        Ok(program) => print!("{}", pretty::print_program(&program)),
        Err(e) => fail(&e),
    }
}

fn run_eval(input: &std::path::Path, input_file: Option<&std::path::Path>) {
    let program = match compile_file(input, &CompilerConfig::default()) {
        Ok(p) => p,
        Err(e) => fail(&e),
    };

    let result = match input_file {
        Some(path) => match fs::File::open(path) {
            Ok(file) => run_with_reader(&program, BufReader::new(file)),
            Err(e) => {
                eprintln!("Error: could not read '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => run_with_reader(&program, BufReader::new(io::stdin())),
    };

    match result {
        Ok(written) => {
            for value in written {
                println!("{}", value);
            }
        }
        Err(e) => {
            println!("{}", e);
            process::exit(1);
        }
    }
}

fn run_with_reader<R: io::BufRead>(
    program: &impc::Program,
    mut reader: R,
) -> Result<Vec<impc::eval::Written>, impc::EvalError> {
    let mut evaluator = Evaluator::new(&program.symbols, &mut reader);
    evaluator.run(&program.body)?;
    Ok(evaluator.written)
}

fn fail(err: &CompileError) -> ! {
    println!("{}", err);
    process::exit(1);
}
