//! Per-instruction assembly emission
//!
//! One method per concern: register allocation with the descriptor
//! discipline, write-back, loads, binary/comparison emission, control
//! transfers, the calling convention, and the pointer instructions. The
//! write-back points are fixed: register eviction, every LABEL/GOTO/IFZ,
//! CALL and RETURN, and after STORE_PTR.

use std::fmt::Write as _;

use super::error::CodeGenError;
use super::state::{CodeGen, R_BP, R_IO, R_IP, R_JP, R_TP, RegState, RegisterFile};
use super::state::{FORMAL_OFF, LOCAL_OFF};
use crate::symbols::{Scope, SymId, SymKind};
use crate::tac::{InstrId, TacOp};
use crate::types::DataType;

/// Memory operand relative to a base register: `(R2+8)` or `(R2-4)`.
fn based(base: usize, offset: i32) -> String {
    if offset >= 0 {
        format!("(R{}+{})", base, offset)
    } else {
        format!("(R{}{})", base, offset)
    }
}

impl CodeGen<'_> {
    fn home_offset(&self, var: SymId) -> Result<i32, CodeGenError> {
        self.syms.sym(var).offset.ok_or_else(|| {
            CodeGenError::Logic(format!(
                "variable '{}' has no storage assigned",
                self.syms.sym(var).name
            ))
        })
    }

    /// Store a modified register back to its symbol's home location and mark
    /// it clean. Registers holding constants have no home and are simply
    /// marked clean.
    pub(super) fn write_back(&mut self, r: usize) -> Result<(), CodeGenError> {
        let Some(var) = self.regs.var(r) else {
            return Ok(());
        };
        if self.regs.state(r) != RegState::Modified {
            return Ok(());
        }
        if self.syms.sym(var).kind != SymKind::Var {
            self.regs.mark(r, RegState::Unmodified);
            return Ok(());
        }

        let offset = self.home_offset(var)?;
        if self.syms.sym(var).scope == Scope::Local {
            let slot = based(R_BP, offset);
            writeln!(self.out, "\tSTO {},R{}", slot, r)?;
        } else {
            writeln!(self.out, "\tLOD R{},STATIC", R_TP)?;
            writeln!(self.out, "\tSTO (R{}+{}),R{}", R_TP, offset, r)?;
        }
        self.regs.mark(r, RegState::Unmodified);
        Ok(())
    }

    pub(super) fn write_back_all(&mut self) -> Result<(), CodeGenError> {
        for r in RegisterFile::general() {
            self.write_back(r)?;
        }
        Ok(())
    }

    /// Load a symbol's value into a specific register, without touching the
    /// descriptors.
    fn load(&mut self, r: usize, s: SymId) -> Result<(), CodeGenError> {
        if let Some(src) = self.regs.find(s) {
            writeln!(self.out, "\tLOD R{},R{}", r, src)?;
            return Ok(());
        }

        let sym = self.syms.sym(s);
        match sym.kind {
            SymKind::ConstInt | SymKind::ConstChar => {
                let value = sym.const_value().ok_or_else(|| {
                    CodeGenError::Logic(format!("constant '{}' has no value", sym.name))
                })?;
                writeln!(self.out, "\tLOD R{},{}", r, value)?;
            }
            SymKind::Var => {
                let offset = self.home_offset(s)?;
                if self.syms.sym(s).scope == Scope::Local {
                    let slot = based(R_BP, offset);
                    writeln!(self.out, "\tLOD R{},{}", r, slot)?;
                } else {
                    writeln!(self.out, "\tLOD R{},STATIC", R_TP)?;
                    writeln!(self.out, "\tLOD R{},(R{}+{})", r, R_TP, offset)?;
                }
            }
            SymKind::Text => {
                let label = sym.text_label.ok_or_else(|| {
                    CodeGenError::Logic("text literal has no label".to_string())
                })?;
                writeln!(self.out, "\tLOD R{},L{}", r, label)?;
            }
            _ => {
                return Err(CodeGenError::Logic(format!(
                    "cannot load symbol: {}",
                    sym.display_name()
                )));
            }
        }
        Ok(())
    }

    /// Bring a symbol into a general register, following the spill policy:
    /// already resident (write back first if dirty), else a free register,
    /// else an unmodified one, else a pseudo-random victim.
    pub(super) fn reg_alloc(&mut self, s: SymId) -> Result<usize, CodeGenError> {
        if let Some(r) = self.regs.find(s) {
            if self.regs.state(r) == RegState::Modified {
                self.write_back(r)?;
            }
            return Ok(r);
        }

        if let Some(r) = self.regs.find_free() {
            self.load(r, s)?;
            self.regs.fill(r, s, RegState::Unmodified);
            return Ok(r);
        }

        if let Some(r) = self.regs.find_unmodified() {
            self.load(r, s)?;
            self.regs.fill(r, s, RegState::Unmodified);
            return Ok(r);
        }

        let r = self.regs.random_general();
        self.write_back(r)?;
        self.load(r, s)?;
        self.regs.fill(r, s, RegState::Unmodified);
        Ok(r)
    }

    /// `a = b OP c` for ADD/SUB/MUL/DIV. Returns the result register.
    ///
    /// The left operand's register is pinned (marked modified) while the
    /// right operand is allocated, so the allocator cannot evict it between
    /// the two loads.
    fn emit_bin(
        &mut self,
        op: &str,
        a: SymId,
        b: SymId,
        c: SymId,
    ) -> Result<usize, CodeGenError> {
        let reg_b = self.reg_alloc(b)?;
        let saved = self.regs.state(reg_b);
        self.regs.mark(reg_b, RegState::Modified);

        if let Some(value) = self.syms.sym(c).const_value() {
            writeln!(self.out, "\t{} R{},{}", op, reg_b, value)?;
            self.regs.fill(reg_b, a, RegState::Modified);
            return Ok(reg_b);
        }

        let mut reg_c = self.reg_alloc(c)?;
        self.regs.mark(reg_b, saved);

        // Same variable on both sides: route the right operand through the
        // temp pointer so the instruction sees two registers.
        if reg_b == reg_c {
            writeln!(self.out, "\tLOD R{},R{}", R_TP, reg_c)?;
            reg_c = R_TP;
        }

        writeln!(self.out, "\t{} R{},R{}", op, reg_b, reg_c)?;
        self.regs.fill(reg_b, a, RegState::Modified);
        Ok(reg_b)
    }

    /// The six comparisons: subtract, test, then a fixed IP-relative branch
    /// ladder that leaves 0 or 1 in the result register.
    fn emit_cmp(&mut self, op: TacOp, a: SymId, b: SymId, c: SymId) -> Result<(), CodeGenError> {
        let reg_b = self.emit_bin("SUB", a, b, c)?;
        writeln!(self.out, "\tTST R{}", reg_b)?;

        let (branch, fallthrough_value, taken_value) = match op {
            TacOp::Eq => ("JEZ", 0, 1),
            TacOp::Ne => ("JEZ", 1, 0),
            TacOp::Lt => ("JLZ", 0, 1),
            TacOp::Le => ("JGZ", 1, 0),
            TacOp::Gt => ("JGZ", 0, 1),
            TacOp::Ge => ("JLZ", 1, 0),
            _ => return Err(CodeGenError::Logic("unknown comparison operator".to_string())),
        };

        writeln!(self.out, "\tLOD R{},R{}+40", R_JP, R_IP)?;
        writeln!(self.out, "\t{} R{}", branch, R_JP)?;
        writeln!(self.out, "\tLOD R{},{}", reg_b, fallthrough_value)?;
        writeln!(self.out, "\tLOD R{},R{}+24", R_JP, R_IP)?;
        writeln!(self.out, "\tJMP R{}", R_JP)?;
        writeln!(self.out, "\tLOD R{},{}", reg_b, taken_value)?;

        self.regs.clear(reg_b);
        self.regs.fill(reg_b, a, RegState::Modified);
        Ok(())
    }

    /// Control transfer: write everything back, test the condition if there
    /// is one, clear the descriptors, jump.
    fn emit_cond(
        &mut self,
        op: &str,
        test: Option<SymId>,
        label: &str,
    ) -> Result<(), CodeGenError> {
        self.write_back_all()?;

        if let Some(a) = test {
            let r = match self.regs.find(a) {
                Some(r) => r,
                None => self.reg_alloc(a)?,
            };
            writeln!(self.out, "\tTST R{}", r)?;
        }

        self.regs.clear_all();
        writeln!(self.out, "\t{} {}", op, label)?;
        Ok(())
    }

    /// Call sequence: push old BP and the return address into the outgoing
    /// area, rebase BP, jump; the callee's return value arrives in the temp
    /// pointer register.
    fn emit_call(&mut self, ret: Option<SymId>, func: SymId) -> Result<(), CodeGenError> {
        self.write_back_all()?;
        self.regs.clear_all();

        let slot = self.tof + self.oon;
        writeln!(self.out, "\tSTO (R{}+{}),R{}", R_BP, slot, R_BP)?;
        self.oon += 4;

        // Return address: IP plus the distance to the instruction after the
        // jump (four 8-byte instructions).
        writeln!(self.out, "\tLOD R{},R{}+32", R_TP, R_IP)?;
        let slot = self.tof + self.oon;
        writeln!(self.out, "\tSTO (R{}+{}),R{}", R_BP, slot, R_TP)?;
        self.oon += 4;

        let rebase = self.tof + self.oon - 8;
        writeln!(self.out, "\tLOD R{},R{}+{}", R_BP, R_BP, rebase)?;

        let name = self.syms.sym(func).name.clone();
        writeln!(self.out, "\tJMP {}", name)?;

        if let Some(ret) = ret {
            let r = self.reg_alloc(ret)?;
            writeln!(self.out, "\tLOD R{},R{}", r, R_TP)?;
            self.regs.mark(r, RegState::Modified);
        }

        self.oon = 0;
        Ok(())
    }

    /// Return sequence: value into the temp pointer register, restore the
    /// return address and the caller's BP, jump back.
    fn emit_return(&mut self, value: Option<SymId>) -> Result<(), CodeGenError> {
        self.write_back_all()?;
        self.regs.clear_all();

        if let Some(value) = value {
            self.load(R_TP, value)?;
        }

        writeln!(self.out, "\tLOD R{},(R{}+4)", R_JP, R_BP)?;
        writeln!(self.out, "\tLOD R{},(R{})", R_BP, R_BP)?;
        writeln!(self.out, "\tJMP R{}", R_JP)?;
        Ok(())
    }

    fn operand(
        &self,
        instr_id: InstrId,
        operand: Option<SymId>,
        what: &str,
    ) -> Result<SymId, CodeGenError> {
        operand.ok_or_else(|| {
            CodeGenError::Logic(format!(
                "missing {} operand in '{}'",
                what,
                self.tac.format_instr(instr_id, self.syms)
            ))
        })
    }

    pub(super) fn emit_instr(&mut self, id: InstrId) -> Result<(), CodeGenError> {
        let instr = self.tac.get(id);
        let op = instr.op;
        let (a, b, c) = (instr.a, instr.b, instr.c);

        match op {
            TacOp::Undef => Err(CodeGenError::Logic("cannot translate UNDEF".to_string())),

            TacOp::Add | TacOp::Sub | TacOp::Mul | TacOp::Div => {
                let mnemonic = match op {
                    TacOp::Add => "ADD",
                    TacOp::Sub => "SUB",
                    TacOp::Mul => "MUL",
                    _ => "DIV",
                };
                let a = self.operand(id, a, "destination")?;
                let b = self.operand(id, b, "left")?;
                let c = self.operand(id, c, "right")?;
                self.emit_bin(mnemonic, a, b, c)?;
                Ok(())
            }

            TacOp::Neg => {
                let a = self.operand(id, a, "destination")?;
                let b = self.operand(id, b, "operand")?;
                let zero = self.syms.ephemeral_int(0);
                self.emit_bin("SUB", a, zero, b)?;
                Ok(())
            }

            TacOp::Eq | TacOp::Ne | TacOp::Lt | TacOp::Le | TacOp::Gt | TacOp::Ge => {
                let a = self.operand(id, a, "destination")?;
                let b = self.operand(id, b, "left")?;
                let c = self.operand(id, c, "right")?;
                self.emit_cmp(op, a, b, c)
            }

            TacOp::Copy => {
                let a = self.operand(id, a, "destination")?;
                let b = self.operand(id, b, "source")?;
                let r = self.reg_alloc(b)?;
                self.regs.fill(r, a, RegState::Modified);
                Ok(())
            }

            TacOp::Input => {
                let a = self.operand(id, a, "destination")?;
                let r = self.reg_alloc(a)?;
                match self.syms.sym(a).data_type {
                    DataType::Char => writeln!(self.out, "\tITC")?,
                    DataType::Int => writeln!(self.out, "\tITI")?,
                    other => {
                        return Err(CodeGenError::Logic(format!(
                            "unsupported data type for INPUT: {}",
                            other
                        )));
                    }
                }
                writeln!(self.out, "\tLOD R{},R{}", r, R_IO)?;
                self.regs.mark(r, RegState::Modified);
                Ok(())
            }

            TacOp::Output => {
                let a = self.operand(id, a, "value")?;
                let r = self.reg_alloc(a)?;
                writeln!(self.out, "\tLOD R{},R{}", R_IO, r)?;
                let sym = self.syms.sym(a);
                if sym.kind == SymKind::Text {
                    writeln!(self.out, "\tOTS")?;
                } else if sym.data_type == DataType::Char {
                    writeln!(self.out, "\tOTC")?;
                } else {
                    writeln!(self.out, "\tOTI")?;
                }
                Ok(())
            }

            TacOp::Goto => {
                let a = self.operand(id, a, "target")?;
                let label = self.syms.sym(a).name.clone();
                self.emit_cond("JMP", None, &label)
            }

            TacOp::Ifz => {
                let a = self.operand(id, a, "target")?;
                let b = self.operand(id, b, "condition")?;
                let label = self.syms.sym(a).name.clone();
                self.emit_cond("JEZ", Some(b), &label)
            }

            TacOp::Label => {
                let a = self.operand(id, a, "label")?;
                self.write_back_all()?;
                self.regs.clear_all();
                let name = self.syms.sym(a).name.clone();
                writeln!(self.out, "{}:", name)?;
                Ok(())
            }

            TacOp::Actual => {
                let a = self.operand(id, a, "argument")?;
                let r = self.reg_alloc(a)?;
                let slot = self.tof + self.oon;
                writeln!(self.out, "\tSTO (R{}+{}),R{}", R_BP, slot, r)?;
                self.oon += 4;
                Ok(())
            }

            TacOp::Call => {
                let b = self.operand(id, b, "callee")?;
                self.emit_call(a, b)
            }

            TacOp::BeginFunc => {
                self.tof = LOCAL_OFF;
                self.oof = FORMAL_OFF;
                self.oon = 0;
                Ok(())
            }

            TacOp::Formal => {
                let a = self.operand(id, a, "parameter")?;
                let sym = self.syms.sym_mut(a);
                sym.scope = Scope::Local;
                sym.offset = Some(self.oof);
                self.oof -= 4;
                Ok(())
            }

            TacOp::Var => {
                let a = self.operand(id, a, "variable")?;
                let size = self.syms.sym(a).size();
                if self.syms.sym(a).scope == Scope::Local {
                    self.syms.sym_mut(a).offset = Some(self.tof);
                    self.tof += size;
                } else {
                    self.syms.sym_mut(a).offset = Some(self.tos);
                    self.tos += size;
                }
                Ok(())
            }

            TacOp::Return => self.emit_return(a),

            TacOp::EndFunc => self.emit_return(None),

            TacOp::Addr => {
                let a = self.operand(id, a, "destination")?;
                let b = self.operand(id, b, "variable")?;
                self.emit_addr(a, b)
            }

            TacOp::LoadPtr => {
                let a = self.operand(id, a, "destination")?;
                let b = self.operand(id, b, "pointer")?;
                self.emit_load_ptr(a, b)
            }

            TacOp::StorePtr => {
                let a = self.operand(id, a, "pointer")?;
                let b = self.operand(id, b, "value")?;
                self.emit_store_ptr(a, b)
            }
        }
    }

    /// `a = &b`: compute the effective address into a free or clean
    /// register.
    fn emit_addr(&mut self, a: SymId, b: SymId) -> Result<(), CodeGenError> {
        if let Some(rb) = self.regs.find(b) {
            if self.regs.state(rb) == RegState::Modified {
                self.write_back(rb)?;
            }
        }

        let r = match self.regs.find_free().or_else(|| self.regs.find_unmodified()) {
            Some(r) => r,
            None => {
                let r = RegisterFile::general().start;
                self.write_back(r)?;
                r
            }
        };

        let offset = self.home_offset(b)?;
        if self.syms.sym(b).scope == Scope::Local {
            writeln!(self.out, "\tLOD R{},R{}", r, R_BP)?;
            if offset >= 0 {
                writeln!(self.out, "\tADD R{},{}", r, offset)?;
            } else {
                writeln!(self.out, "\tSUB R{},{}", r, -offset)?;
            }
        } else {
            writeln!(self.out, "\tLOD R{},STATIC", r)?;
            writeln!(self.out, "\tADD R{},{}", r, offset)?;
        }

        self.regs.fill(r, a, RegState::Modified);
        Ok(())
    }

    /// `a = *b`: the destination register must differ from the pointer's.
    fn emit_load_ptr(&mut self, a: SymId, b: SymId) -> Result<(), CodeGenError> {
        let r_ptr = self.reg_alloc(b)?;

        let r_val = match self.regs.find_free() {
            Some(r) => r,
            None => match self.regs.find_unmodified_excluding(r_ptr) {
                Some(r) => {
                    self.regs.clear(r);
                    r
                }
                None => {
                    let r = RegisterFile::general()
                        .find(|&r| r != r_ptr)
                        .ok_or_else(|| {
                            CodeGenError::Logic("no register available for LOAD_PTR".to_string())
                        })?;
                    self.write_back(r)?;
                    self.regs.clear(r);
                    r
                }
            },
        };

        if self.syms.sym(a).data_type == DataType::Char {
            writeln!(self.out, "\tLDC R{},(R{})", r_val, r_ptr)?;
        } else {
            writeln!(self.out, "\tLOD R{},(R{})", r_val, r_ptr)?;
        }
        self.regs.fill(r_val, a, RegState::Modified);
        Ok(())
    }

    /// `*a = b`: after the store, an arbitrary memory cell may have changed,
    /// so every modified variable is written back and all descriptors are
    /// dropped.
    fn emit_store_ptr(&mut self, a: SymId, b: SymId) -> Result<(), CodeGenError> {
        let mut r_ptr = self.reg_alloc(a)?;
        let r_val = self.reg_alloc(b)?;

        // Allocating the value may have evicted the pointer; reload it
        // through the temp pointer register from its home slot.
        if r_ptr == r_val {
            let offset = self.home_offset(a)?;
            if self.syms.sym(a).scope == Scope::Local {
                let slot = based(R_BP, offset);
                writeln!(self.out, "\tLOD R{},{}", R_TP, slot)?;
            } else {
                writeln!(self.out, "\tLOD R{},STATIC", R_TP)?;
                writeln!(self.out, "\tLOD R{},(R{}+{})", R_TP, R_TP, offset)?;
            }
            r_ptr = R_TP;
        }

        if self.syms.sym(b).data_type == DataType::Char {
            writeln!(self.out, "\tSTC (R{}),R{}", r_ptr, r_val)?;
        } else {
            writeln!(self.out, "\tSTO (R{}),R{}", r_ptr, r_val)?;
        }

        for r in RegisterFile::general() {
            if let Some(var) = self.regs.var(r) {
                if self.syms.sym(var).kind == SymKind::Var
                    && self.regs.state(r) == RegState::Modified
                {
                    self.write_back(r)?;
                }
            }
        }
        self.regs.clear_all();
        Ok(())
    }
}
