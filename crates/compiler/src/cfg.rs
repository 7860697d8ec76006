//! Basic blocks and the control-flow graph
//!
//! Leaders are the first instruction, every LABEL, and every instruction
//! following IFZ, GOTO, RETURN or ENDFUNC; ENDFUNC itself is never a leader.
//! Blocks tile the instruction list; edges follow from each block's final
//! instruction. The graph is a read-only view over the list and is rebuilt
//! from scratch whenever the list has been rewritten.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::symbols::{SymId, SymTable};
use crate::tac::{InstrId, TacList, TacOp};

#[derive(Debug)]
pub struct BasicBlock {
    pub id: usize,
    pub start: InstrId,
    pub end: InstrId,
    pub preds: Vec<usize>,
    pub succs: Vec<usize>,
}

impl BasicBlock {
    /// Instruction ids in `start..=end` list order.
    pub fn instrs(&self, tac: &TacList) -> Vec<InstrId> {
        let mut ids = Vec::new();
        let mut cur = Some(self.start);
        while let Some(id) = cur {
            ids.push(id);
            if id == self.end {
                break;
            }
            cur = tac.next_of(id);
        }
        ids
    }
}

#[derive(Debug, Default)]
pub struct Cfg {
    pub blocks: Vec<BasicBlock>,
}

/// Per-block live-variable sets from a backward fixed-point pass.
#[derive(Debug)]
pub struct Liveness {
    pub live_in: Vec<HashSet<SymId>>,
    pub live_out: Vec<HashSet<SymId>>,
}

fn is_leader(tac: &TacList, id: InstrId, prev: Option<InstrId>, first: Option<InstrId>) -> bool {
    if tac.get(id).op == TacOp::EndFunc {
        return false;
    }
    if Some(id) == first {
        return true;
    }
    if tac.get(id).op == TacOp::Label {
        return true;
    }
    if let Some(p) = prev {
        if matches!(
            tac.get(p).op,
            TacOp::Ifz | TacOp::Goto | TacOp::Return | TacOp::EndFunc
        ) {
            return true;
        }
    }
    false
}

pub fn build(tac: &TacList) -> Cfg {
    let mut cfg = Cfg::default();
    if tac.first().is_none() {
        return cfg;
    }

    // First pass: mark leaders.
    let mut leaders: HashSet<InstrId> = HashSet::new();
    let mut cur = tac.first();
    let mut prev: Option<InstrId> = None;
    while let Some(id) = cur {
        if is_leader(tac, id, prev, tac.first()) {
            leaders.insert(id);
        }
        prev = cur;
        cur = tac.next_of(id);
    }

    // Second pass: split at leaders.
    let mut cur = tac.first();
    let mut prev: Option<InstrId> = None;
    while let Some(id) = cur {
        if leaders.contains(&id) {
            if let (Some(open), Some(p)) = (cfg.blocks.last_mut(), prev) {
                open.end = p;
            }
            let block_id = cfg.blocks.len();
            cfg.blocks.push(BasicBlock {
                id: block_id,
                start: id,
                end: id,
                preds: Vec::new(),
                succs: Vec::new(),
            });
        }
        prev = cur;
        cur = tac.next_of(id);
    }
    if let (Some(open), Some(p)) = (cfg.blocks.last_mut(), prev) {
        open.end = p;
    }

    connect_edges(&mut cfg, tac);
    cfg
}

fn connect_edges(cfg: &mut Cfg, tac: &TacList) {
    let block_count = cfg.blocks.len();
    let mut edges: Vec<(usize, usize)> = Vec::new();

    let target_of = |label: SymId, cfg: &Cfg| -> Option<usize> {
        cfg.blocks.iter().find_map(|block| {
            let start = tac.get(block.start);
            if start.op == TacOp::Label && start.a == Some(label) {
                Some(block.id)
            } else {
                None
            }
        })
    };

    for i in 0..block_count {
        let end_id = cfg.blocks[i].end;
        let end = tac.get(end_id);
        match end.op {
            TacOp::Goto => {
                if let Some(target) = end.a.and_then(|label| target_of(label, cfg)) {
                    edges.push((i, target));
                }
            }
            TacOp::Ifz => {
                if let Some(target) = end.a.and_then(|label| target_of(label, cfg)) {
                    edges.push((i, target));
                }
                if i + 1 < block_count {
                    edges.push((i, i + 1));
                }
            }
            TacOp::Return | TacOp::EndFunc => {}
            _ => {
                // Fall through, unless an ENDFUNC separates this block from
                // the next one (no edges between functions).
                if i + 1 < block_count {
                    let next_start = cfg.blocks[i + 1].start;
                    let mut crosses_endfunc = false;
                    let mut cur = tac.next_of(end_id);
                    while let Some(id) = cur {
                        if id == next_start {
                            break;
                        }
                        if tac.get(id).op == TacOp::EndFunc {
                            crosses_endfunc = true;
                            break;
                        }
                        cur = tac.next_of(id);
                    }
                    if !crosses_endfunc {
                        edges.push((i, i + 1));
                    }
                }
            }
        }
    }

    for (from, to) in edges {
        cfg.blocks[from].succs.push(to);
        cfg.blocks[to].preds.push(from);
    }
}

impl Cfg {
    /// Backward live-variable analysis over the graph.
    pub fn liveness(&self, tac: &TacList, syms: &SymTable) -> Liveness {
        let n = self.blocks.len();
        let mut use_sets: Vec<HashSet<SymId>> = vec![HashSet::new(); n];
        let mut def_sets: Vec<HashSet<SymId>> = vec![HashSet::new(); n];

        for (i, block) in self.blocks.iter().enumerate() {
            for id in block.instrs(tac) {
                for u in tac.uses_of(id, syms) {
                    if !def_sets[i].contains(&u) {
                        use_sets[i].insert(u);
                    }
                }
                if let Some(d) = tac.def_of(id) {
                    def_sets[i].insert(d);
                }
            }
        }

        let mut live_in: Vec<HashSet<SymId>> = vec![HashSet::new(); n];
        let mut live_out: Vec<HashSet<SymId>> = vec![HashSet::new(); n];

        let mut changed = true;
        while changed {
            changed = false;
            for i in (0..n).rev() {
                let mut out: HashSet<SymId> = HashSet::new();
                for &s in &self.blocks[i].succs {
                    out.extend(live_in[s].iter().copied());
                }
                let mut inn = use_sets[i].clone();
                for &v in &out {
                    if !def_sets[i].contains(&v) {
                        inn.insert(v);
                    }
                }
                if out != live_out[i] || inn != live_in[i] {
                    live_out[i] = out;
                    live_in[i] = inn;
                    changed = true;
                }
            }
        }

        Liveness { live_in, live_out }
    }

    /// Render the block partition with predecessor/successor lists.
    pub fn format_blocks(&self, tac: &TacList, syms: &SymTable) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "========== Basic Blocks ==========");
        let _ = writeln!(out, "Total blocks: {}", self.blocks.len());
        for block in &self.blocks {
            let _ = writeln!(out, "\nBlock {}:", block.id);
            let fmt_ids = |ids: &[usize]| -> String {
                if ids.is_empty() {
                    "none".to_string()
                } else {
                    ids.iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                }
            };
            let _ = writeln!(out, "  Predecessors: {}", fmt_ids(&block.preds));
            let _ = writeln!(out, "  Successors: {}", fmt_ids(&block.succs));
            let _ = writeln!(out, "  Instructions:");
            for id in block.instrs(tac) {
                let _ = writeln!(out, "    {}", tac.format_instr(id, syms));
            }
        }
        let _ = writeln!(out, "==================================");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::tacgen::lower;

    fn build_from(source: &str) -> (crate::tacgen::TacProgram, Cfg) {
        let program = Parser::new(source).unwrap().parse().unwrap();
        let unit = lower(&program);
        let cfg = build(&unit.tac);
        (unit, cfg)
    }

    #[test]
    fn straight_line_code_is_one_block() {
        let (_, cfg) = build_from("int main() { int a; a = 1; output a; }");
        assert_eq!(cfg.blocks.len(), 1);
        assert!(cfg.blocks[0].succs.is_empty());
        assert!(cfg.blocks[0].preds.is_empty());
    }

    #[test]
    fn block_shape_invariants() {
        let (unit, cfg) = build_from(
            r#"
int main() {
    int i;
    for (i = 0; i < 3; i = i + 1) {
        if (i == 1) continue;
        output i;
    }
    return 0;
}
"#,
        );
        for block in &cfg.blocks {
            let ids = block.instrs(&unit.tac);
            // Only the start may be a LABEL; only the end may be a jump.
            for (pos, id) in ids.iter().enumerate() {
                let op = unit.tac.get(*id).op;
                if op == TacOp::Label {
                    assert_eq!(pos, 0, "LABEL in the middle of block {}", block.id);
                }
                if matches!(op, TacOp::Goto | TacOp::Ifz) {
                    assert_eq!(pos, ids.len() - 1, "jump inside block {}", block.id);
                }
                // A RETURN may only be followed by the closing ENDFUNC,
                // which is never a leader of its own.
                if op == TacOp::Return {
                    for later in &ids[pos + 1..] {
                        assert_eq!(unit.tac.get(*later).op, TacOp::EndFunc);
                    }
                }
            }
            // Predecessors are the inverse of successors.
            for &s in &block.succs {
                assert!(cfg.blocks[s].preds.contains(&block.id));
            }
            for &p in &block.preds {
                assert!(cfg.blocks[p].succs.contains(&block.id));
            }
        }
    }

    #[test]
    fn ifz_blocks_have_branch_and_fallthrough() {
        let (unit, cfg) = build_from("int main() { int x; input x; if (x) output 1; }");
        let ifz_block = cfg
            .blocks
            .iter()
            .find(|b| unit.tac.get(b.end).op == TacOp::Ifz)
            .expect("no IFZ block");
        assert_eq!(ifz_block.succs.len(), 2);
        // The fall-through successor is the next sequential block.
        assert!(ifz_block.succs.contains(&(ifz_block.id + 1)));
    }

    #[test]
    fn goto_blocks_have_single_labeled_successor() {
        let (unit, cfg) = build_from("int main() { while (1) { break; } }");
        for block in &cfg.blocks {
            if unit.tac.get(block.end).op == TacOp::Goto {
                assert_eq!(block.succs.len(), 1);
                let target = &cfg.blocks[block.succs[0]];
                assert_eq!(unit.tac.get(target.start).op, TacOp::Label);
            }
        }
    }

    #[test]
    fn functions_are_not_linked_together() {
        let (unit, cfg) = build_from(
            "int add(int a, int b) { return a + b; } int main() { output add(2, 3); }",
        );
        // Each function contributes exactly one entry block (a block whose
        // start is the function's LABEL and which has no predecessors from
        // another function's code).
        let endfunc_blocks: Vec<_> = cfg
            .blocks
            .iter()
            .filter(|b| unit.tac.get(b.end).op == TacOp::EndFunc)
            .collect();
        assert_eq!(endfunc_blocks.len(), 2);
        for block in endfunc_blocks {
            assert!(block.succs.is_empty(), "function exit has successors");
        }

        // One entry block per function: the blocks starting at the function
        // labels have no predecessors.
        let entry_blocks: Vec<_> = cfg
            .blocks
            .iter()
            .filter(|b| {
                let start = unit.tac.get(b.start);
                start.op == TacOp::Label
                    && start
                        .a
                        .is_some_and(|a| matches!(unit.syms.sym(a).name.as_str(), "add" | "main"))
            })
            .collect();
        assert_eq!(entry_blocks.len(), 2);
        for block in entry_blocks {
            assert!(block.preds.is_empty(), "function entry has predecessors");
        }
    }

    #[test]
    fn liveness_flows_across_blocks() {
        let (unit, cfg) = build_from(
            r#"
int main() {
    int x;
    x = 5;
    if (x) {
        output x;
    }
    return 0;
}
"#,
        );
        let live = cfg.liveness(&unit.tac, &unit.syms);
        // x is defined in the entry block and used in the branch block, so
        // it must be live-out of the block that assigns it.
        let x = unit.syms.lookup("x");
        assert!(x.is_none(), "locals leave scope after lowering");
        // Find the symbol through the COPY instruction instead.
        let mut x_sym = None;
        let mut cur = unit.tac.first();
        while let Some(id) = cur {
            if unit.tac.get(id).op == TacOp::Copy {
                x_sym = unit.tac.get(id).a;
                break;
            }
            cur = unit.tac.next_of(id);
        }
        let x_sym = x_sym.expect("no COPY found");
        let def_block = cfg
            .blocks
            .iter()
            .find(|b| b.instrs(&unit.tac).iter().any(|id| unit.tac.def_of(*id) == Some(x_sym)))
            .expect("definition block");
        assert!(live.live_out[def_block.id].contains(&x_sym));
    }
}
