//! TAC optimizer
//!
//! Four block-local passes run to a bounded fixed point, in order: constant
//! folding, constant propagation, copy propagation, dead-code elimination.
//! Each pass is confined to one basic block; DCE additionally consults the
//! block's live-out set so definitions consumed by later blocks survive.
//! Pointer instructions (ADDR/LOAD_PTR/STORE_PTR) are exempt from operand
//! substitution, and taking a variable's address evicts it from the
//! constant map since writes may reach it through the pointer afterwards.
//!
//! Constants created here are ephemeral: allocated in the symbol arena but
//! never interned or named.

use std::collections::{HashMap, HashSet};

use crate::cfg::{self, BasicBlock};
use crate::symbols::{SymId, SymKind, SymTable};
use crate::tac::{TacList, TacOp};
use crate::tacgen::TacProgram;

pub const DEFAULT_MAX_ROUNDS: u32 = 10;

pub struct Optimizer<'a> {
    tac: &'a mut TacList,
    syms: &'a mut SymTable,
    max_rounds: u32,
}

impl<'a> Optimizer<'a> {
    pub fn new(unit: &'a mut TacProgram) -> Optimizer<'a> {
        Optimizer {
            tac: &mut unit.tac,
            syms: &mut unit.syms,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    fn warning(&self, pass: &str, msg: &str) {
        eprintln!("Optimizer[{}] Warning: {}", pass, msg);
    }

    /// Optimize every basic block of the current list.
    pub fn run(mut self) {
        let graph = cfg::build(self.tac);
        let live = graph.liveness(self.tac, self.syms);
        for mut block in graph.blocks {
            let live_out = &live.live_out[block.id];
            self.optimize_block(&mut block, live_out);
        }
    }

    fn optimize_block(&mut self, block: &mut BasicBlock, live_out: &HashSet<SymId>) {
        for _ in 0..self.max_rounds {
            let mut changed = false;
            changed |= self.constant_folding(block);
            changed |= self.constant_propagation(block);
            changed |= self.copy_propagation(block);
            changed |= self.dead_code_elimination(block, live_out);
            if !changed {
                break;
            }
        }
    }

    fn const_value(&self, sym: Option<SymId>) -> Option<i32> {
        sym.and_then(|id| self.syms.sym(id).const_value())
    }

    /// Rewrite arithmetic, comparison and negation instructions whose
    /// operands are all constants into `COPY a = result`. Division by zero
    /// is left in place with a warning.
    fn constant_folding(&mut self, block: &BasicBlock) -> bool {
        let mut changed = false;
        for id in block.instrs(self.tac) {
            let op = self.tac.get(id).op;
            if op.is_arith() || op.is_comparison() {
                let (Some(val_b), Some(val_c)) = (
                    self.const_value(self.tac.get(id).b),
                    self.const_value(self.tac.get(id).c),
                ) else {
                    continue;
                };
                let result = match op {
                    TacOp::Add => val_b.wrapping_add(val_c),
                    TacOp::Sub => val_b.wrapping_sub(val_c),
                    TacOp::Mul => val_b.wrapping_mul(val_c),
                    TacOp::Div => {
                        if val_c == 0 {
                            self.warning("constant-folding", "division by zero left unfolded");
                            continue;
                        }
                        val_b.wrapping_div(val_c)
                    }
                    TacOp::Eq => (val_b == val_c) as i32,
                    TacOp::Ne => (val_b != val_c) as i32,
                    TacOp::Lt => (val_b < val_c) as i32,
                    TacOp::Le => (val_b <= val_c) as i32,
                    TacOp::Gt => (val_b > val_c) as i32,
                    TacOp::Ge => (val_b >= val_c) as i32,
                    _ => unreachable!(),
                };
                let folded = self.syms.ephemeral_int(result);
                let instr = self.tac.get_mut(id);
                instr.op = TacOp::Copy;
                instr.b = Some(folded);
                instr.c = None;
                changed = true;
            } else if op == TacOp::Neg {
                let Some(val_b) = self.const_value(self.tac.get(id).b) else {
                    continue;
                };
                let folded = self.syms.ephemeral_int(val_b.wrapping_neg());
                let instr = self.tac.get_mut(id);
                instr.op = TacOp::Copy;
                instr.b = Some(folded);
                instr.c = None;
                changed = true;
            }
        }
        changed
    }

    /// Forward pass tracking `var -> constant` facts established by COPYs.
    fn constant_propagation(&mut self, block: &BasicBlock) -> bool {
        let mut changed = false;
        let mut consts: HashMap<SymId, i32> = HashMap::new();

        for id in block.instrs(self.tac) {
            let op = self.tac.get(id).op;
            let pointer_op = op.is_pointer_op();

            if !pointer_op {
                for pick in [OperandSlot::B, OperandSlot::C, OperandSlot::AUse] {
                    if pick == OperandSlot::AUse
                        && !matches!(op, TacOp::Return | TacOp::Output | TacOp::Ifz | TacOp::Actual)
                    {
                        continue;
                    }
                    let operand = pick.read(self.tac, id);
                    let Some(sym) = operand else { continue };
                    if self.syms.sym(sym).kind != SymKind::Var {
                        continue;
                    }
                    if let Some(&value) = consts.get(&sym) {
                        let fresh = self.syms.ephemeral_int(value);
                        pick.write(self.tac, id, fresh);
                        changed = true;
                    }
                }
            }

            let instr = self.tac.get(id);
            let (a, b) = (instr.a, instr.b);
            if op == TacOp::Copy {
                if let Some(a) = a {
                    match self.const_value(b) {
                        Some(value) if self.syms.sym(a).kind == SymKind::Var => {
                            consts.insert(a, value);
                        }
                        _ => {
                            consts.remove(&a);
                        }
                    }
                }
            } else if op.defines_a() {
                if let Some(a) = a {
                    consts.remove(&a);
                }
            }
            // The address escaped; stores through the pointer may change it.
            if op == TacOp::Addr {
                if let Some(b) = b {
                    consts.remove(&b);
                }
            }
        }
        changed
    }

    /// Forward pass tracking `var -> var` copies. A redefinition of `v`
    /// kills every pair with `v` on either side.
    fn copy_propagation(&mut self, block: &BasicBlock) -> bool {
        let mut changed = false;
        let mut copies: HashMap<SymId, SymId> = HashMap::new();

        for id in block.instrs(self.tac) {
            let op = self.tac.get(id).op;
            let pointer_op = op.is_pointer_op();

            if !pointer_op {
                for pick in [OperandSlot::B, OperandSlot::C, OperandSlot::AUse] {
                    if pick == OperandSlot::AUse
                        && !matches!(op, TacOp::Return | TacOp::Output | TacOp::Ifz | TacOp::Actual)
                    {
                        continue;
                    }
                    let Some(sym) = pick.read(self.tac, id) else { continue };
                    if self.syms.sym(sym).kind != SymKind::Var {
                        continue;
                    }
                    if let Some(&source) = copies.get(&sym) {
                        pick.write(self.tac, id, source);
                        changed = true;
                    }
                }
            }

            let instr = self.tac.get(id);
            let (a, b) = (instr.a, instr.b);
            if let Some(a) = a {
                if op.defines_a() {
                    copies.retain(|key, value| *key != a && *value != a);
                    if op == TacOp::Copy {
                        if let Some(b) = b {
                            if self.syms.sym(b).kind == SymKind::Var {
                                copies.insert(a, b);
                            }
                        }
                    }
                }
            }
        }
        changed
    }

    /// Remove computational instructions whose defined symbol is neither
    /// used later in the block nor live-out, and VAR declarations of
    /// variables no other instruction references.
    fn dead_code_elimination(&mut self, block: &mut BasicBlock, live_out: &HashSet<SymId>) -> bool {
        let mut changed = false;
        let ids = block.instrs(self.tac);

        let mut used: HashSet<SymId> = live_out.clone();
        for &id in &ids {
            used.extend(self.tac.uses_of(id, self.syms));
        }

        // Storage answers to the whole program: a VAR may only go away when
        // no instruction anywhere mentions the variable (liveness alone is
        // not enough; a write-only variable still needs its slot).
        let mut referenced: HashSet<SymId> = HashSet::new();
        let mut cur = self.tac.first();
        while let Some(id) = cur {
            let instr = self.tac.get(id);
            if instr.op != TacOp::Var {
                for operand in [instr.a, instr.b, instr.c] {
                    if let Some(s) = operand {
                        referenced.insert(s);
                    }
                }
            }
            cur = self.tac.next_of(id);
        }

        for id in ids {
            let instr = self.tac.get(id);
            let op = instr.op;
            let removable = match op {
                TacOp::Copy | TacOp::Neg => true,
                _ if op.is_arith() || op.is_comparison() => true,
                TacOp::Var => instr
                    .a
                    .map(|a| self.syms.sym(a).kind == SymKind::Var)
                    .unwrap_or(false),
                _ => false,
            };
            if !removable {
                continue;
            }
            let Some(target) = instr.a else { continue };
            if op == TacOp::Var {
                if referenced.contains(&target) {
                    continue;
                }
            } else if used.contains(&target) {
                continue;
            }
            // Keep a sole remaining instruction so the block stays non-empty.
            if block.start == id && block.end == id {
                continue;
            }
            if block.start == id {
                if let Some(next) = self.tac.next_of(id) {
                    block.start = next;
                }
            }
            if block.end == id {
                if let Some(prev) = self.tac.prev_of(id) {
                    block.end = prev;
                }
            }
            self.tac.unlink(id);
            changed = true;
        }
        changed
    }
}

/// Which operand slot a substitution touches.
#[derive(Clone, Copy, PartialEq, Eq)]
enum OperandSlot {
    B,
    C,
    /// The `a` operand of the instructions that read it.
    AUse,
}

impl OperandSlot {
    fn read(self, tac: &TacList, id: crate::tac::InstrId) -> Option<SymId> {
        let instr = tac.get(id);
        match self {
            OperandSlot::B => instr.b,
            OperandSlot::C => instr.c,
            OperandSlot::AUse => instr.a,
        }
    }

    fn write(self, tac: &mut TacList, id: crate::tac::InstrId, sym: SymId) {
        let instr = tac.get_mut(id);
        match self {
            OperandSlot::B => instr.b = Some(sym),
            OperandSlot::C => instr.c = Some(sym),
            OperandSlot::AUse => instr.a = Some(sym),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::tacgen::{TacProgram, lower};

    fn optimized(source: &str) -> TacProgram {
        let program = Parser::new(source).unwrap().parse().unwrap();
        let mut unit = lower(&program);
        Optimizer::new(&mut unit).run();
        unit
    }

    fn listing(unit: &TacProgram) -> String {
        unit.tac.format_listing(&unit.syms)
    }

    #[test]
    fn folds_constant_expression_to_single_output() {
        let unit = optimized("int main() { int a; a = 1 + 2 * 3; output a; }");
        assert_eq!(listing(&unit), "label main\nbegin\noutput 7\nend\n");
    }

    #[test]
    fn comparison_on_constants_becomes_constant_branch() {
        let unit = optimized("int main() { int x; x = 5; if (x == 5) output 1; else output 2; }");
        let text = listing(&unit);
        assert!(text.contains("ifz 1 goto L1"), "listing:\n{}", text);
        assert!(!text.contains("=="), "listing:\n{}", text);
    }

    #[test]
    fn division_by_zero_is_left_unfolded() {
        let unit = optimized("int main() { int a; a = 1 / 0; output a; }");
        let text = listing(&unit);
        assert!(text.contains("1 / 0"), "listing:\n{}", text);
    }

    #[test]
    fn no_foldable_instruction_survives() {
        let unit = optimized(
            "int main() { int a; a = 2 * 3 + 4 / 2 - 1; if (a > 3) output a - a; }",
        );
        let mut cur = unit.tac.first();
        while let Some(id) = cur {
            let instr = unit.tac.get(id);
            if instr.op.is_arith() || instr.op.is_comparison() {
                let b_const = instr.b.and_then(|s| unit.syms.sym(s).const_value());
                let c_const = instr.c.and_then(|s| unit.syms.sym(s).const_value());
                assert!(
                    b_const.is_none() || c_const.is_none(),
                    "foldable instruction survived: {}",
                    unit.tac.format_instr(id, &unit.syms)
                );
            }
            cur = unit.tac.next_of(id);
        }
    }

    #[test]
    fn copy_propagation_kills_stale_pairs() {
        let unit = optimized(
            r#"
int main() {
    int a;
    int b;
    int c;
    input b;
    a = b;
    b = 7;
    c = a;
    output c;
    output b;
}
"#,
        );
        let text = listing(&unit);
        // `c = a` must not rewrite to `c = b`: b was redefined in between,
        // so the first output reads the old b through a, and only the
        // second output sees 7.
        assert!(text.contains("a = b"), "listing:\n{}", text);
        assert!(text.contains("output a"), "listing:\n{}", text);
        assert_eq!(text.matches("output 7").count(), 1, "listing:\n{}", text);
    }

    #[test]
    fn dead_code_and_declarations_are_removed() {
        let unit = optimized("int main() { int unused; unused = 3; output 1; }");
        assert_eq!(listing(&unit), "label main\nbegin\noutput 1\nend\n");
    }

    #[test]
    fn live_out_definitions_survive_block_local_dce() {
        let unit = optimized(
            r#"
int main() {
    int x;
    int y;
    x = 5;
    input y;
    if (y) output x;
}
"#,
        );
        let text = listing(&unit);
        assert!(text.contains("x = 5"), "listing:\n{}", text);
        assert!(text.contains("output x"), "listing:\n{}", text);
    }

    #[test]
    fn address_taken_variables_are_not_propagated() {
        let unit = optimized(
            r#"
int main() {
    int x;
    int *p;
    x = 1;
    p = &x;
    *p = 9;
    output x;
}
"#,
        );
        let text = listing(&unit);
        assert!(text.contains("&x"), "listing:\n{}", text);
        assert!(text.contains("*"), "listing:\n{}", text);
        // x's constant fact dies at the ADDR; the output still reads x.
        assert!(text.contains("output x"), "listing:\n{}", text);
    }

    #[test]
    fn optimizer_is_idempotent_at_fixed_point() {
        let source = r#"
int main() {
    int i;
    int total;
    total = 0;
    for (i = 0; i < 10; i = i + 1) {
        total = total + i * 2;
    }
    output total;
}
"#;
        let program = Parser::new(source).unwrap().parse().unwrap();
        let mut unit = lower(&program);
        Optimizer::new(&mut unit).run();
        let first = listing(&unit);
        Optimizer::new(&mut unit).run();
        let second = listing(&unit);
        assert_eq!(first, second);
    }

    #[test]
    fn remaining_definitions_are_used_or_live_out() {
        let unit = optimized(
            r#"
int main() {
    int a;
    int b;
    input a;
    b = a + 1;
    output b;
    output a;
}
"#,
        );
        let graph = cfg::build(&unit.tac);
        let live = graph.liveness(&unit.tac, &unit.syms);
        for block in &graph.blocks {
            let ids = block.instrs(&unit.tac);
            for (pos, id) in ids.iter().enumerate() {
                let op = unit.tac.get(*id).op;
                let is_assignment =
                    matches!(op, TacOp::Copy | TacOp::Neg) || op.is_arith() || op.is_comparison();
                if !is_assignment {
                    continue;
                }
                let Some(def) = unit.tac.def_of(*id) else { continue };
                let used_later = ids[pos + 1..]
                    .iter()
                    .any(|later| unit.tac.uses_of(*later, &unit.syms).contains(&def));
                assert!(
                    used_later || live.live_out[block.id].contains(&def),
                    "dead definition survived: {}",
                    unit.tac.format_instr(*id, &unit.syms)
                );
            }
        }
    }

    #[test]
    fn links_stay_consistent_after_optimization() {
        let unit = optimized(
            r#"
int main() {
    int x;
    int y;
    x = 2 + 3;
    y = x;
    switch (y) {
        case 5: output 1; break;
        default: output 0;
    }
}
"#,
        );
        unit.tac.verify_links().unwrap();
    }
}
