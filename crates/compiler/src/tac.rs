//! Three-address code
//!
//! The IR is a doubly-linked list of instructions owned by a [`TacList`]
//! arena; `prev`/`next` are [`InstrId`] indices rather than pointers, which
//! keeps deletion O(1) and sidesteps shared-ownership cycles. Construction
//! is bottom-up: combinators produce chains whose `prev` links are set while
//! `next` stays empty, and a final [`TacList::complete`] pass walks the tail
//! chain once to assign the forward links.

use crate::symbols::{SymId, SymKind, SymTable};
use crate::types::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TacOp {
    Undef,
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Neg,
    Copy,
    Goto,
    Ifz,
    BeginFunc,
    EndFunc,
    Label,
    Var,
    Formal,
    Actual,
    Call,
    Return,
    Input,
    Output,
    Addr,
    LoadPtr,
    StorePtr,
}

impl TacOp {
    /// ADD/SUB/MUL/DIV.
    pub fn is_arith(self) -> bool {
        matches!(self, TacOp::Add | TacOp::Sub | TacOp::Mul | TacOp::Div)
    }

    /// The six relational operators producing 0/1.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            TacOp::Eq | TacOp::Ne | TacOp::Lt | TacOp::Le | TacOp::Gt | TacOp::Ge
        )
    }

    /// Whether the `a` operand is defined (written) by this instruction.
    pub fn defines_a(self) -> bool {
        matches!(
            self,
            TacOp::Add
                | TacOp::Sub
                | TacOp::Mul
                | TacOp::Div
                | TacOp::Eq
                | TacOp::Ne
                | TacOp::Lt
                | TacOp::Le
                | TacOp::Gt
                | TacOp::Ge
                | TacOp::Neg
                | TacOp::Copy
                | TacOp::LoadPtr
                | TacOp::Addr
                | TacOp::Input
                | TacOp::Call
        )
    }

    /// Whether the `a` operand is read rather than written.
    pub fn uses_a(self) -> bool {
        matches!(
            self,
            TacOp::Return | TacOp::Output | TacOp::Ifz | TacOp::Actual | TacOp::StorePtr
        )
    }

    /// Pointer instructions keep variable identity; the optimizer must not
    /// substitute their operands.
    pub fn is_pointer_op(self) -> bool {
        matches!(self, TacOp::Addr | TacOp::LoadPtr | TacOp::StorePtr)
    }
}

/// Index of an instruction in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

#[derive(Debug, Clone)]
pub struct Instr {
    pub op: TacOp,
    pub a: Option<SymId>,
    pub b: Option<SymId>,
    pub c: Option<SymId>,
    pub prev: Option<InstrId>,
    pub next: Option<InstrId>,
}

#[derive(Debug, Default)]
pub struct TacList {
    instrs: Vec<Instr>,
    first: Option<InstrId>,
    last: Option<InstrId>,
}

impl TacList {
    pub fn new() -> TacList {
        TacList::default()
    }

    /// Allocate a fresh, unlinked instruction.
    pub fn emit(
        &mut self,
        op: TacOp,
        a: Option<SymId>,
        b: Option<SymId>,
        c: Option<SymId>,
    ) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        self.instrs.push(Instr {
            op,
            a,
            b,
            c,
            prev: None,
            next: None,
        });
        id
    }

    pub fn get(&self, id: InstrId) -> &Instr {
        &self.instrs[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.instrs[id.0 as usize]
    }

    pub fn first(&self) -> Option<InstrId> {
        self.first
    }

    pub fn last(&self) -> Option<InstrId> {
        self.last
    }

    pub fn next_of(&self, id: InstrId) -> Option<InstrId> {
        self.get(id).next
    }

    pub fn prev_of(&self, id: InstrId) -> Option<InstrId> {
        self.get(id).prev
    }

    pub fn set_prev(&mut self, id: InstrId, prev: Option<InstrId>) {
        self.get_mut(id).prev = prev;
    }

    /// Head of a backward-linked chain.
    pub fn head_of(&self, id: InstrId) -> InstrId {
        let mut cur = id;
        while let Some(prev) = self.get(cur).prev {
            cur = prev;
        }
        cur
    }

    /// Concatenate two backward-linked chains: the head of `c2` is linked
    /// after the tail `c1`. Returns the tail of the combined chain.
    pub fn join(&mut self, c1: Option<InstrId>, c2: Option<InstrId>) -> Option<InstrId> {
        match (c1, c2) {
            (None, c2) => c2,
            (c1, None) => c1,
            (Some(c1), Some(c2)) => {
                let head = self.head_of(c2);
                self.get_mut(head).prev = Some(c1);
                Some(c2)
            }
        }
    }

    /// Finalize the list: walk the `prev` chain from `tail` once, assigning
    /// every `next` link, and record the head.
    pub fn complete(&mut self, tail: Option<InstrId>) {
        self.last = tail;
        let mut cur: Option<InstrId> = None;
        let mut prev = tail;
        while let Some(p) = prev {
            self.get_mut(p).next = cur;
            cur = Some(p);
            prev = self.get(p).prev;
        }
        self.first = cur;
    }

    /// Splice an instruction out of the list by rewiring its neighbors. The
    /// removed node keeps its own links, so iteration currently passing
    /// through it remains well-defined.
    pub fn unlink(&mut self, id: InstrId) {
        let (prev, next) = {
            let instr = self.get(id);
            (instr.prev, instr.next)
        };
        if let Some(p) = prev {
            self.get_mut(p).next = next;
        }
        if let Some(n) = next {
            self.get_mut(n).prev = prev;
        }
        if self.first == Some(id) {
            self.first = next;
        }
        if self.last == Some(id) {
            self.last = prev;
        }
    }

    /// The symbol defined by an instruction, if any.
    pub fn def_of(&self, id: InstrId) -> Option<SymId> {
        let instr = self.get(id);
        if instr.op.defines_a() { instr.a } else { None }
    }

    /// Variable symbols read by an instruction: `b` and `c` when they are
    /// variables, plus `a` for the instructions that consume it.
    pub fn uses_of(&self, id: InstrId, syms: &SymTable) -> Vec<SymId> {
        let instr = self.get(id);
        let mut uses = Vec::new();
        let push_var = |operand: Option<SymId>, uses: &mut Vec<SymId>| {
            if let Some(s) = operand {
                if syms.sym(s).kind == SymKind::Var {
                    uses.push(s);
                }
            }
        };
        push_var(instr.b, &mut uses);
        push_var(instr.c, &mut uses);
        if instr.op.uses_a() {
            push_var(instr.a, &mut uses);
        }
        uses
    }

    /// Render one instruction in listing form.
    pub fn format_instr(&self, id: InstrId, syms: &SymTable) -> String {
        let instr = self.get(id);
        let name = |operand: Option<SymId>| -> String {
            operand
                .map(|s| syms.sym(s).display_name())
                .unwrap_or_else(|| "?".to_string())
        };
        let (a, b, c) = (instr.a, instr.b, instr.c);
        match instr.op {
            TacOp::Add => format!("{} = {} + {}", name(a), name(b), name(c)),
            TacOp::Sub => format!("{} = {} - {}", name(a), name(b), name(c)),
            TacOp::Mul => format!("{} = {} * {}", name(a), name(b), name(c)),
            TacOp::Div => format!("{} = {} / {}", name(a), name(b), name(c)),
            TacOp::Eq => format!("{} = ({} == {})", name(a), name(b), name(c)),
            TacOp::Ne => format!("{} = ({} != {})", name(a), name(b), name(c)),
            TacOp::Lt => format!("{} = ({} < {})", name(a), name(b), name(c)),
            TacOp::Le => format!("{} = ({} <= {})", name(a), name(b), name(c)),
            TacOp::Gt => format!("{} = ({} > {})", name(a), name(b), name(c)),
            TacOp::Ge => format!("{} = ({} >= {})", name(a), name(b), name(c)),
            TacOp::Neg => format!("{} = -{}", name(a), name(b)),
            TacOp::Copy => format!("{} = {}", name(a), name(b)),
            TacOp::Goto => format!("goto {}", name(a)),
            TacOp::Ifz => format!("ifz {} goto {}", name(b), name(a)),
            TacOp::Label => format!("label {}", name(a)),
            TacOp::Var => {
                let mut text = format!("var {}", name(a));
                if let Some(sym_id) = a {
                    let sym = syms.sym(sym_id);
                    if let Some(array) = &sym.array {
                        text.push_str(&format!(" : array of {}", array.base_type));
                    } else if sym.data_type == DataType::Struct {
                        text.push_str(" : struct");
                        if let Some(layout) = &sym.layout {
                            text.push_str(&format!(" {}", layout.name));
                        }
                    } else if sym.data_type != DataType::Undef {
                        text.push_str(&format!(" : {}", sym.data_type));
                    }
                }
                text
            }
            TacOp::Formal => format!("formal {}", name(a)),
            TacOp::Actual => format!("actual {}", name(a)),
            TacOp::Call => match a {
                Some(_) => format!("{} = call {}", name(a), name(b)),
                None => format!("call {}", name(b)),
            },
            TacOp::Return => match a {
                Some(_) => format!("return {}", name(a)),
                None => "return".to_string(),
            },
            TacOp::Input => format!("input {}", name(a)),
            TacOp::Output => format!("output {}", name(a)),
            TacOp::BeginFunc => "begin".to_string(),
            TacOp::EndFunc => "end".to_string(),
            TacOp::Addr => format!("{} = &{}", name(a), name(b)),
            TacOp::LoadPtr => format!("{} = *{}", name(a), name(b)),
            TacOp::StorePtr => format!("*{} = {}", name(a), name(b)),
            TacOp::Undef => "undef".to_string(),
        }
    }

    /// Render the whole listing, one instruction per line.
    pub fn format_listing(&self, syms: &SymTable) -> String {
        let mut out = String::new();
        let mut cur = self.first;
        while let Some(id) = cur {
            out.push_str(&self.format_instr(id, syms));
            out.push('\n');
            cur = self.get(id).next;
        }
        out
    }

    /// Check the doubly-linked invariants over the completed list: each
    /// node's neighbor links point back at it, and forward and backward
    /// walks visit the same number of instructions.
    pub fn verify_links(&self) -> Result<(), String> {
        let mut forward = 0usize;
        let mut cur = self.first;
        let mut prev: Option<InstrId> = None;
        while let Some(id) = cur {
            let instr = self.get(id);
            if instr.prev != prev {
                return Err(format!("instruction {:?} has inconsistent prev link", id));
            }
            if let Some(n) = instr.next {
                if self.get(n).prev != Some(id) {
                    return Err(format!("instruction {:?} has inconsistent next link", id));
                }
            }
            forward += 1;
            prev = cur;
            cur = instr.next;
        }

        let mut backward = 0usize;
        let mut cur = self.last;
        while let Some(id) = cur {
            backward += 1;
            cur = self.get(id).prev;
        }

        if forward != backward {
            return Err(format!(
                "forward walk sees {} instructions, backward walk {}",
                forward, backward
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn var(syms: &mut SymTable, name: &str) -> SymId {
        syms.insert_var(name, DataType::Int)
    }

    #[test]
    fn join_and_complete_produce_forward_links() {
        let mut syms = SymTable::new();
        let mut list = TacList::new();
        let a = var(&mut syms, "a");
        let b = var(&mut syms, "b");
        let k = syms.intern_int(1);

        // Two chains built bottom-up: (var a; a = 1) and (var b; b = a).
        let va = list.emit(TacOp::Var, Some(a), None, None);
        let ca = list.emit(TacOp::Copy, Some(a), Some(k), None);
        list.set_prev(ca, Some(va));
        let vb = list.emit(TacOp::Var, Some(b), None, None);
        let cb = list.emit(TacOp::Copy, Some(b), Some(a), None);
        list.set_prev(cb, Some(vb));

        let tail = list.join(Some(ca), Some(cb));
        assert_eq!(tail, Some(cb));
        list.complete(tail);

        assert_eq!(list.first(), Some(va));
        assert_eq!(list.last(), Some(cb));
        list.verify_links().unwrap();

        let order: Vec<InstrId> = {
            let mut ids = Vec::new();
            let mut cur = list.first();
            while let Some(id) = cur {
                ids.push(id);
                cur = list.next_of(id);
            }
            ids
        };
        assert_eq!(order, vec![va, ca, vb, cb]);
    }

    #[test]
    fn join_with_empty_sides() {
        let mut list = TacList::new();
        let solo = list.emit(TacOp::BeginFunc, None, None, None);
        assert_eq!(list.join(None, Some(solo)), Some(solo));
        assert_eq!(list.join(Some(solo), None), Some(solo));
        assert_eq!(list.join(None, None), None);
    }

    #[test]
    fn unlink_rewires_neighbors() {
        let mut syms = SymTable::new();
        let mut list = TacList::new();
        let a = var(&mut syms, "a");
        let one = syms.intern_int(1);

        let i1 = list.emit(TacOp::Var, Some(a), None, None);
        let i2 = list.emit(TacOp::Copy, Some(a), Some(one), None);
        let i3 = list.emit(TacOp::Output, Some(a), None, None);
        list.set_prev(i2, Some(i1));
        list.set_prev(i3, Some(i2));
        list.complete(Some(i3));

        list.unlink(i2);
        assert_eq!(list.next_of(i1), Some(i3));
        assert_eq!(list.prev_of(i3), Some(i1));
        // Iteration through the stale id still reaches the list.
        assert_eq!(list.next_of(i2), Some(i3));
        list.verify_links().unwrap();

        list.unlink(i1);
        assert_eq!(list.first(), Some(i3));
        list.unlink(i3);
        assert_eq!(list.first(), None);
        assert_eq!(list.last(), None);
    }

    #[test]
    fn def_and_use_classification() {
        let mut syms = SymTable::new();
        let mut list = TacList::new();
        let a = var(&mut syms, "a");
        let b = var(&mut syms, "b");
        let k = syms.intern_int(3);

        let add = list.emit(TacOp::Add, Some(a), Some(b), Some(k));
        assert_eq!(list.def_of(add), Some(a));
        assert_eq!(list.uses_of(add, &syms), vec![b]);

        let ret = list.emit(TacOp::Return, Some(a), None, None);
        assert_eq!(list.def_of(ret), None);
        assert_eq!(list.uses_of(ret, &syms), vec![a]);

        let store = list.emit(TacOp::StorePtr, Some(a), Some(b), None);
        assert_eq!(list.def_of(store), None);
        assert_eq!(list.uses_of(store, &syms), vec![b, a]);
    }

    #[test]
    fn listing_is_stable() {
        let mut syms = SymTable::new();
        let mut list = TacList::new();
        let a = var(&mut syms, "a");
        let k = syms.intern_int(7);
        let i1 = list.emit(TacOp::Var, Some(a), None, None);
        let i2 = list.emit(TacOp::Copy, Some(a), Some(k), None);
        list.set_prev(i2, Some(i1));
        list.complete(Some(i2));

        let text = list.format_listing(&syms);
        assert_eq!(text, "var a : int\na = 7\n");
        // Printing is idempotent: a second render yields the same text.
        assert_eq!(list.format_listing(&syms), text);
    }
}
