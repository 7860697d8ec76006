//! Program scaffolding and the static data section
//!
//! The prologue points BP at `STACK` and plants `EXIT` as the outermost
//! return address; the epilogue defines `EXIT: END` followed by the static
//! section: every text literal as a `DBS` byte list, then the zero-filled
//! `STATIC` area for globals, then the `STACK` anchor.

use std::fmt::Write as _;

use super::error::CodeGenError;
use super::state::{CodeGen, R_BP, R_TP};
use crate::symbols::{SymId, SymValue};
use crate::tac::TacOp;

impl CodeGen<'_> {
    pub(super) fn emit_head(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "\tLOD R{},STACK", R_BP)?;
        writeln!(self.out, "\tSTO (R{}),0", R_BP)?;
        writeln!(self.out, "\tLOD R{},EXIT", R_TP)?;
        writeln!(self.out, "\tSTO (R{}+4),R{}", R_BP, R_TP)?;
        Ok(())
    }

    /// When the first function in the list is not `main`, jump over the
    /// preceding code.
    pub(super) fn emit_jump_to_main(&mut self) -> Result<(), CodeGenError> {
        let mut cur = self.tac.first();
        while let Some(id) = cur {
            let instr = self.tac.get(id);
            if instr.op == TacOp::Label {
                if let Some(a) = instr.a {
                    if self.syms.sym(a).name == "main" {
                        return Ok(());
                    }
                }
                break;
            }
            cur = self.tac.next_of(id);
        }
        if self.comment_tac {
            writeln!(self.out, "\n\t# Jump to main")?;
        }
        writeln!(self.out, "\tJMP main")?;
        Ok(())
    }

    pub(super) fn emit_tail(&mut self) -> Result<(), CodeGenError> {
        writeln!(self.out, "EXIT:")?;
        writeln!(self.out, "\tEND")?;
        Ok(())
    }

    pub(super) fn emit_static(&mut self) -> Result<(), CodeGenError> {
        for id in self.syms.text_symbols() {
            self.emit_text(id)?;
        }
        writeln!(self.out, "STATIC:")?;
        writeln!(self.out, "\tDBN 0,{}", self.tos)?;
        writeln!(self.out, "STACK:")?;
        Ok(())
    }

    /// One text literal as a null-terminated byte list. The stored text
    /// carries its surrounding quotes and raw escape sequences; both are
    /// resolved here.
    fn emit_text(&mut self, id: SymId) -> Result<(), CodeGenError> {
        let sym = self.syms.sym(id);
        let SymValue::Text(text) = &sym.value else {
            return Ok(());
        };
        let label = sym
            .text_label
            .ok_or_else(|| CodeGenError::Logic("text literal has no label".to_string()))?;

        let mut bytes: Vec<u32> = Vec::new();
        let inner = text
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .unwrap_or(text);
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => bytes.push('\n' as u32),
                    Some('t') => bytes.push('\t' as u32),
                    Some('r') => bytes.push('\r' as u32),
                    Some('\\') => bytes.push('\\' as u32),
                    Some('"') => bytes.push('"' as u32),
                    Some('0') => bytes.push(0),
                    Some(other) => bytes.push(other as u32),
                    None => break,
                }
            } else {
                bytes.push(c as u32);
            }
        }
        bytes.push(0);

        let list = bytes
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.out, "L{}:", label)?;
        writeln!(self.out, "\tDBS {}", list)?;
        Ok(())
    }
}
