//! Mini-C compiler CLI
//!
//! Subcommands for compiling to assembly, inspecting the intermediate
//! representation, and generating shell completions. Diagnostics go to
//! stderr; generated text goes to stdout unless `-o` is given.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};

use minicc::{CompilerConfig, cfg};

#[derive(ClapParser)]
#[command(name = "minicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Mini-C compiler - compile Mini-C programs to target assembly", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Mini-C source file to assembly
    Build {
        /// Input source file
        input: PathBuf,

        /// Output path (defaults to standard output)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Disable the TAC optimizer
        #[arg(long)]
        no_opt: bool,

        /// Omit the TAC echo comments from the assembly
        #[arg(long)]
        no_comments: bool,

        /// Path to a TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Dump the three-address intermediate representation
    Tac {
        /// Input source file
        input: PathBuf,

        /// Run the optimizer before dumping
        #[arg(long)]
        optimize: bool,

        /// Also print the basic-block partition
        #[arg(long)]
        blocks: bool,

        /// Also print the global symbol table
        #[arg(long)]
        symbols: bool,
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
            no_opt,
            no_comments,
            config,
        } => {
            let config = load_config(config.as_deref(), no_opt, no_comments);
            run_build(&input, output.as_deref(), &config);
        }
        Commands::Tac {
            input,
            optimize,
            blocks,
            symbols,
        } => {
            run_tac(&input, optimize, blocks, symbols);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "minicc", &mut io::stdout());
        }
    }
}

fn load_config(path: Option<&Path>, no_opt: bool, no_comments: bool) -> CompilerConfig {
    let mut config = match path {
        Some(path) => match CompilerConfig::from_toml_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error reading config: {}", e);
                process::exit(1);
            }
        },
        None => CompilerConfig::default(),
    };
    if no_opt {
        config = config.with_optimize(false);
    }
    if no_comments {
        config = config.with_comment_tac(false);
    }
    config
}

fn run_build(input: &Path, output: Option<&Path>, config: &CompilerConfig) {
    match minicc::compile_file(input, config) {
        Ok(asm) => match output {
            Some(path) => {
                if let Err(e) = fs::write(path, asm) {
                    eprintln!("Error writing {}: {}", path.display(), e);
                    process::exit(1);
                }
            }
            None => print!("{}", asm),
        },
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_tac(input: &Path, optimize: bool, blocks: bool, symbols: bool) {
    let source = match fs::read_to_string(input) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Cannot open file {}: {}", input.display(), e);
            process::exit(1);
        }
    };

    let config = CompilerConfig::default().with_optimize(optimize);
    let unit = match minicc::build_tac(&source, &config) {
        Ok(unit) => unit,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    print!("{}", unit.tac.format_listing(&unit.syms));

    if blocks {
        let graph = cfg::build(&unit.tac);
        print!("\n{}", graph.format_blocks(&unit.tac, &unit.syms));
    }

    if symbols {
        print!("\n{}", unit.syms.format_globals());
    }
}
