//! Assembly code generation
//!
//! Translates the linearized TAC into textual assembly for the 16-register
//! target machine. The walk is strictly linear; state is limited to the
//! register descriptors and the frame counters, and symbol offsets are
//! assigned on the first visit of their declaring VAR/FORMAL instruction.
//!
//! # Register file
//!
//! R0 flag, R1 instruction pointer, R2 base pointer, R3 jump scratch,
//! R4 temp pointer, R5–R14 general purpose, R15 I/O port. Descriptors track
//! which symbol a general register holds and whether the register is dirty;
//! dirty registers are written back on eviction, before every control-flow
//! point (LABEL/GOTO/IFZ), around calls and returns, and after STORE_PTR.
//!
//! # Frame layout
//!
//! Formals at BP-4, BP-8, …; the saved BP at (BP); the return address at
//! (BP+4); locals from BP+8 upward; the outgoing-argument area above the
//! locals. Globals and text literals live in the `STATIC` area.
//!
//! # Module structure
//!
//! - `state.rs`: the `CodeGen` struct, register file, frame constants
//! - `instr.rs`: per-instruction emission and the allocation discipline
//! - `globals.rs`: prologue/epilogue and the static data section
//! - `error.rs`: error types

mod error;
mod globals;
mod instr;
mod state;

use std::fmt::Write as _;

pub use error::CodeGenError;
pub use state::{CodeGen, RegState};

use state::RegisterFile;

use crate::config::CompilerConfig;
use crate::tacgen::TacProgram;

impl<'a> CodeGen<'a> {
    pub fn new(unit: &'a mut TacProgram, config: &CompilerConfig) -> CodeGen<'a> {
        let TacProgram { tac, syms } = unit;
        CodeGen {
            out: String::new(),
            tac,
            syms,
            regs: RegisterFile::new(),
            tos: 0,
            tof: state::LOCAL_OFF,
            oof: state::FORMAL_OFF,
            oon: 0,
            comment_tac: config.comment_tac,
        }
    }

    /// Generate the whole program: prologue, a jump to `main` when needed,
    /// one emission per TAC instruction in list order, the exit stub and
    /// the static section.
    pub fn generate(mut self) -> Result<String, CodeGenError> {
        self.emit_head()?;
        self.emit_jump_to_main()?;

        let mut cur = self.tac.first();
        while let Some(id) = cur {
            if self.comment_tac {
                let text = self.tac.format_instr(id, self.syms);
                writeln!(self.out, "\n\t# {}", text)?;
            }
            self.emit_instr(id)?;
            cur = self.tac.next_of(id);
        }

        self.emit_tail()?;
        self.emit_static()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opt::Optimizer;
    use crate::parser::Parser;
    use crate::tacgen::lower;

    fn compile(source: &str, optimize: bool) -> String {
        let program = Parser::new(source).unwrap().parse().unwrap();
        let mut unit = lower(&program);
        if optimize {
            Optimizer::new(&mut unit).run();
        }
        let config = CompilerConfig::default();
        CodeGen::new(&mut unit, &config).generate().unwrap()
    }

    #[test]
    fn constant_expression_outputs_through_oti() {
        let asm = compile("int main() { int a; a = 1 + 2 * 3; output a; }", true);
        // Folded to a single constant output: load 7, move to the I/O
        // register, write as integer.
        assert!(asm.contains("\tLOD R5,7\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tLOD R15,R5\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tOTI\n"), "asm:\n{}", asm);
    }

    #[test]
    fn program_scaffolding_is_present() {
        let asm = compile("int main() { return 0; }", true);
        assert!(asm.starts_with("\tLOD R2,STACK\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tSTO (R2),0\n"));
        assert!(asm.contains("\tLOD R4,EXIT\n"));
        assert!(asm.contains("main:\n"));
        assert!(asm.contains("EXIT:\n\tEND\n"));
        assert!(asm.contains("STATIC:\n\tDBN 0,0\nSTACK:\n"));
        // main is the first function; no jump needed.
        assert!(!asm.contains("JMP main"), "asm:\n{}", asm);
    }

    #[test]
    fn jump_to_main_when_another_function_comes_first() {
        let asm = compile(
            "int add(int a, int b) { return a + b; } int main() { output add(2, 3); }",
            false,
        );
        assert!(asm.contains("\tJMP main\n"), "asm:\n{}", asm);
        assert!(asm.contains("add:\n"));
        assert!(asm.contains("\tJMP add\n"));
    }

    #[test]
    fn formals_live_below_the_frame_base() {
        let asm = compile(
            "int add(int a, int b) { return a + b; } int main() { output add(2, 3); }",
            false,
        );
        // a at BP-4, b at BP-8.
        assert!(asm.contains("(R2-4)"), "asm:\n{}", asm);
        assert!(asm.contains("(R2-8)"), "asm:\n{}", asm);
    }

    #[test]
    fn locals_spill_to_frame_slots() {
        let asm = compile("int main() { int x; x = 1; input x; output x; }", false);
        // x gets the first local slot at BP+8; the dirty register is written
        // back when the INPUT reallocates it.
        assert!(asm.contains("(R2+8)"), "asm:\n{}", asm);
    }

    #[test]
    fn globals_live_in_the_static_area() {
        let asm = compile("int g; int main() { g = 5; output g; }", false);
        // Write-back of g goes through the static base in the temp pointer.
        assert!(asm.contains("\tLOD R4,STATIC\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tSTO (R4+0),"), "asm:\n{}", asm);
        assert!(asm.contains("\tDBN 0,4\n"), "asm:\n{}", asm);
    }

    #[test]
    fn comparison_emits_branch_ladder() {
        let asm = compile("int main() { int x; input x; if (x < 3) output 1; }", false);
        assert!(asm.contains("\tSUB R"), "asm:\n{}", asm);
        assert!(asm.contains("\tTST R"), "asm:\n{}", asm);
        assert!(asm.contains("\tLOD R3,R1+40\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tJLZ R3\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tLOD R3,R1+24\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tJEZ L1\n"), "asm:\n{}", asm);
    }

    #[test]
    fn call_sequence_follows_the_convention() {
        let asm = compile(
            "int id(int a) { return a; } int main() { output id(4); }",
            false,
        );
        // Old BP, return address, rebase, jump; result read from R4.
        assert!(asm.contains("\tLOD R4,R1+32\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tLOD R2,R2+"), "asm:\n{}", asm);
        assert!(asm.contains("\tJMP id\n"), "asm:\n{}", asm);
        // Return: restore return address and BP.
        assert!(asm.contains("\tLOD R3,(R2+4)\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tLOD R2,(R2)\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tJMP R3\n"), "asm:\n{}", asm);
    }

    #[test]
    fn string_output_uses_ots_and_static_bytes() {
        let asm = compile(r#"int main() { output "hi\n"; }"#, true);
        assert!(asm.contains("\tOTS\n"), "asm:\n{}", asm);
        assert!(asm.contains("L1:\n\tDBS 104,105,10,0\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tLOD R5,L1\n"), "asm:\n{}", asm);
    }

    #[test]
    fn char_io_uses_character_mnemonics() {
        let asm = compile("int main() { char c; input c; output c; }", false);
        assert!(asm.contains("\tITC\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tOTC\n"), "asm:\n{}", asm);
    }

    #[test]
    fn pointer_ops_compute_and_dereference_addresses() {
        let asm = compile(
            "int main() { int x; int *p; x = 1; p = &x; *p = 9; output *p; }",
            false,
        );
        // &x: BP plus the local offset (R5 still holds x, so the address
        // computation lands in R6).
        assert!(asm.contains("\tLOD R6,R2\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tADD R6,8\n"), "asm:\n{}", asm);
        // Load and store through the pointer register.
        assert!(asm.contains(",(R"), "asm:\n{}", asm);
        assert!(asm.contains("\tSTO (R"), "asm:\n{}", asm);
    }

    #[test]
    fn arrays_reserve_their_full_size() {
        let asm = compile(
            "int main() { int buf[10]; int x; x = 2; output x; }",
            false,
        );
        // buf occupies 40 bytes at BP+8, so x lands at BP+48.
        assert!(asm.contains("(R2+48)"), "asm:\n{}", asm);
    }

    #[test]
    fn dirty_registers_are_written_back_before_labels() {
        let asm = compile(
            "int main() { int x; x = 1; while (x < 5) { x = x + 1; } output x; }",
            false,
        );
        // Every LABEL line must be preceded (somewhere in its run-up since
        // the previous label) by the write-back of x when x was modified.
        // Cheap structural proxy: the loop body modifies x, so a store to
        // x's slot must appear between the body's arithmetic and the
        // back-edge jump.
        let add_pos = asm.find("\tADD R").expect("no ADD");
        let jmp_back = asm[add_pos..].find("\tJMP L1\n").expect("no back edge") + add_pos;
        let body = &asm[add_pos..jmp_back];
        assert!(body.contains("\tSTO (R2+8),"), "asm:\n{}", asm);
    }

    #[test]
    fn switch_dispatch_compiles_to_branches() {
        let asm = compile(
            r#"
int main() {
    int x;
    input x;
    switch (x) {
        case 1: output 10; break;
        case 2: output 20; break;
        default: output 0;
    }
}
"#,
            false,
        );
        // One equality probe per case, a jump to the default label, and the
        // shared break label at the end.
        assert!(asm.contains("\tJEZ L3\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tJEZ L4\n"), "asm:\n{}", asm);
        assert!(asm.contains("\tJMP L2\n"), "asm:\n{}", asm);
        assert!(asm.contains("L1:\n"), "asm:\n{}", asm);
    }

    #[test]
    fn generation_is_deterministic() {
        let source = r#"
int main() {
    int a;
    int b;
    input a;
    b = a * 2 + 1;
    output b;
    return 0;
}
"#;
        assert_eq!(compile(source, true), compile(source, true));
    }

    #[test]
    fn undef_data_is_rejected() {
        // INPUT of a struct variable has no I/O mnemonic.
        let program = Parser::new(
            "struct s { int x; }; int main() { struct s v; input v; }",
        )
        .unwrap()
        .parse()
        .unwrap();
        let mut unit = lower(&program);
        let config = CompilerConfig::default();
        let result = CodeGen::new(&mut unit, &config).generate();
        assert!(result.is_err());
    }
}
