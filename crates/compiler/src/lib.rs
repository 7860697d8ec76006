//! Mini-C compiler library
//!
//! Compiles a C-subset source language (integers, characters, pointers,
//! fixed-size arrays, structs, functions, control flow, `input`/`output`)
//! to textual assembly for a 16-register target machine.
//!
//! Pipeline:
//!
//! 1. [`parser`]: tokenizer and recursive-descent parser producing the
//!    [`ast`]
//! 2. [`tacgen`]: lowers the AST into a doubly-linked list of
//!    three-address instructions, managing symbol tables, scopes, labels
//!    and temporaries
//! 3. [`cfg`]: basic-block partition, control-flow edges, liveness
//! 4. [`opt`]: per-block fixed-point optimizer (constant folding,
//!    constant/copy propagation, dead-code elimination)
//! 5. [`codegen`]: register-allocating assembly emission
//!
//! ```rust
//! use minicc::{CompilerConfig, compile_source};
//!
//! let asm = compile_source(
//!     "int main() { output 6 * 7; return 0; }",
//!     &CompilerConfig::default(),
//! )
//! .unwrap();
//! assert!(asm.contains("OTI"));
//! ```

pub mod ast;
pub mod cfg;
pub mod codegen;
pub mod config;
pub mod opt;
pub mod parser;
pub mod symbols;
pub mod tac;
pub mod tacgen;
pub mod types;

pub use codegen::{CodeGen, CodeGenError};
pub use config::CompilerConfig;
pub use opt::Optimizer;
pub use parser::Parser;
pub use tacgen::{TacProgram, lower};

use std::fs;
use std::path::Path;

/// Parse and lower a source string to TAC, running the optimizer when the
/// configuration asks for it.
pub fn build_tac(source: &str, config: &CompilerConfig) -> Result<TacProgram, String> {
    let mut parser = Parser::new(source).map_err(|e| format!("Parse error: {}", e))?;
    let program = parser.parse().map_err(|e| format!("Parse error: {}", e))?;
    let mut unit = tacgen::lower(&program);
    if config.optimize {
        Optimizer::new(&mut unit)
            .with_max_rounds(config.max_opt_rounds)
            .run();
    }
    Ok(unit)
}

/// Compile a source string to assembly text.
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<String, String> {
    let mut unit = build_tac(source, config)?;
    CodeGen::new(&mut unit, config)
        .generate()
        .map_err(|e| format!("Assembly Generation Error: {}", e))
}

/// Read and compile a source file to assembly text.
pub fn compile_file(input: &Path, config: &CompilerConfig) -> Result<String, String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("Cannot open file {}: {}", input.display(), e))?;
    compile_source(&source, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn compiles_a_complete_program() {
        let asm = compile_source(
            r#"
int square(int n) {
    return n * n;
}

int main() {
    int i;
    for (i = 1; i <= 3; i = i + 1) {
        output square(i);
    }
    return 0;
}
"#,
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(asm.contains("square:"));
        assert!(asm.contains("main:"));
        assert!(asm.contains("\tEND\n"));
    }

    #[test]
    fn parse_errors_are_reported_with_stage_prefix() {
        let err = compile_source("int main() { output 1 }", &CompilerConfig::default())
            .unwrap_err();
        assert!(err.starts_with("Parse error:"), "got: {}", err);
    }

    #[test]
    fn codegen_errors_are_reported_with_stage_prefix() {
        let err = compile_source(
            "struct s { int x; }; int main() { struct s v; input v; }",
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(err.starts_with("Assembly Generation Error:"), "got: {}", err);
    }

    #[test]
    fn optimizer_can_be_disabled() {
        let source = "int main() { int a; a = 2 + 3; output a; }";
        let optimized = compile_source(source, &CompilerConfig::default()).unwrap();
        let plain = compile_source(
            source,
            &CompilerConfig::default().with_optimize(false),
        )
        .unwrap();
        // Unoptimized output still performs the addition at run time.
        assert!(plain.contains("\tADD R"), "asm:\n{}", plain);
        assert!(!optimized.contains("\tADD R"), "asm:\n{}", optimized);
    }

    #[test]
    fn comments_can_be_turned_off() {
        let source = "int main() { output 1; }";
        let with_comments = compile_source(source, &CompilerConfig::default()).unwrap();
        let without = compile_source(
            source,
            &CompilerConfig::default().with_comment_tac(false),
        )
        .unwrap();
        assert!(with_comments.contains("\t# "));
        assert!(!without.contains("\t# "));
    }

    #[test]
    fn compile_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "int main() {{ output 42; return 0; }}").unwrap();
        let asm = compile_file(file.path(), &CompilerConfig::default()).unwrap();
        assert!(asm.contains("\tLOD R5,42\n"));
        assert!(asm.contains("\tOTI\n"));
    }

    #[test]
    fn missing_file_is_a_fatal_error() {
        let err = compile_file(
            Path::new("/nonexistent/input.mc"),
            &CompilerConfig::default(),
        )
        .unwrap_err();
        assert!(err.contains("Cannot open file"), "got: {}", err);
    }
}
