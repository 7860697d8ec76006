//! TAC construction from the AST
//!
//! [`TacGen`] is the stateful IR builder: it owns the symbol table and the
//! growing instruction arena, hands out temporaries and labels, tracks the
//! lexical loop/switch context stacks, and offers one combinator per source
//! construct. Combinators return the *tail* of the chain they build, with
//! `prev` links set and `next` links still empty; [`TacGen::finish`] runs
//! the final linearization pass.
//!
//! Submodules:
//! - `exprs`: expression combinators producing [`Exp`] fragments
//! - `stmts`: statement and declaration combinators
//! - `lower`: the AST walker driving both
//!
//! Diagnostics are best-effort: errors and warnings go to stderr and
//! building continues.

mod exprs;
mod lower;
mod stmts;

pub use lower::lower;

use crate::symbols::{SymId, SymKind, SymTable};
use crate::tac::{InstrId, TacList, TacOp};
use crate::types::{DataType, Type};

/// Result of lowering a whole program: the completed instruction list and
/// the symbol table it references.
#[derive(Debug)]
pub struct TacProgram {
    pub tac: TacList,
    pub syms: SymTable,
}

/// An expression fragment: the chain computing the value and the symbol
/// holding the result.
#[derive(Debug, Clone)]
pub struct Exp {
    pub code: Option<InstrId>,
    pub place: Option<SymId>,
    pub data_type: DataType,
}

impl Exp {
    /// A fragment with no code and no place, used after a reported error so
    /// lowering can continue.
    pub fn poison() -> Exp {
        Exp {
            code: None,
            place: None,
            data_type: DataType::Undef,
        }
    }
}

struct LoopContext {
    break_label: SymId,
    continue_label: SymId,
    loop_start: Option<SymId>,
    /// Nesting order shared with switch contexts, so `break` can find the
    /// innermost of either kind.
    depth: usize,
}

struct SwitchContext {
    break_label: SymId,
    default_label: SymId,
    /// Case values with their labels, in declaration order.
    cases: Vec<(i32, SymId)>,
    default_seen: bool,
    depth: usize,
}

pub struct TacGen {
    pub(crate) tac: TacList,
    pub(crate) syms: SymTable,
    next_tmp: u32,
    next_label: u32,
    current_func: Option<SymId>,
    loop_stack: Vec<LoopContext>,
    switch_stack: Vec<SwitchContext>,
    next_ctx_depth: usize,
    /// Tail of the global chain every declaration links into.
    tac_last: Option<InstrId>,
}

impl Default for TacGen {
    fn default() -> Self {
        TacGen::new()
    }
}

impl TacGen {
    pub fn new() -> TacGen {
        TacGen {
            tac: TacList::new(),
            syms: SymTable::new(),
            next_tmp: 0,
            next_label: 1,
            current_func: None,
            loop_stack: Vec::new(),
            switch_stack: Vec::new(),
            next_ctx_depth: 0,
            tac_last: None,
        }
    }

    /// Linearize: assign forward links over the single global chain and
    /// return the finished program.
    pub fn finish(mut self) -> TacProgram {
        self.tac.complete(self.tac_last);
        TacProgram {
            tac: self.tac,
            syms: self.syms,
        }
    }

    // ---- diagnostics ----

    pub(crate) fn error(&self, msg: impl AsRef<str>) {
        eprintln!("TAC Error: {}", msg.as_ref());
    }

    pub(crate) fn warning(&self, msg: impl AsRef<str>) {
        eprintln!("TAC Warning: {}", msg.as_ref());
    }

    // ---- symbol management ----

    pub(crate) fn mk_tmp(&mut self, data_type: DataType) -> SymId {
        let name = format!("t{}", self.next_tmp);
        self.next_tmp += 1;
        self.syms.insert_var(&name, data_type)
    }

    /// Fresh `L<n>` label symbol.
    pub(crate) fn mk_label(&mut self) -> SymId {
        let name = format!("L{}", self.next_label);
        self.next_label += 1;
        self.syms.alloc_label(name)
    }

    /// Named label, used for function entry points.
    pub(crate) fn mk_named_label(&mut self, name: &str) -> SymId {
        self.syms.alloc_label(name)
    }

    pub(crate) fn mk_const(&mut self, value: i32) -> SymId {
        self.syms.intern_int(value)
    }

    pub(crate) fn mk_const_char(&mut self, value: char) -> SymId {
        self.syms.intern_char(value)
    }

    /// Text-literal symbol; the stored text keeps its surrounding quotes.
    /// Labels for text share the `L<n>` counter with control-flow labels.
    pub(crate) fn mk_text(&mut self, raw: &str) -> SymId {
        let quoted = format!("\"{}\"", raw);
        if let Some(id) = self.syms.find_text(&quoted) {
            return id;
        }
        let label = self.next_label;
        self.next_label += 1;
        self.syms.insert_text(&quoted, label)
    }

    /// Declare a variable in the current scope, recording pointer, array and
    /// struct shape from the declarator type. Duplicates in the same scope
    /// are reported and the existing symbol reused.
    pub(crate) fn mk_var(&mut self, name: &str, ty: &Type) -> SymId {
        if let Some(existing) = self.syms.declared_in_scope(name) {
            self.error(format!("Variable already declared: {}", name));
            return existing;
        }

        let id = self.syms.insert_var(name, ty.data_type());
        if ty.is_pointer() {
            self.syms.sym_mut(id).is_pointer = true;
        }
        if ty.is_array() {
            let base = ty.array_base().clone();
            let element_size = self.syms.type_size(&base);
            self.syms.sym_mut(id).array = Some(crate::symbols::ArrayInfo {
                dims: ty.array_dims(),
                element_size,
                base_type: base.data_type(),
            });
        }
        if let Type::Struct(struct_name) = ty {
            match self.syms.struct_type(struct_name).cloned() {
                Some(layout) => self.syms.sym_mut(id).layout = Some(layout),
                None => self.error(format!("Unknown struct type: {}", struct_name)),
            }
        }
        id
    }

    /// Resolve a name that must already be a declared variable.
    pub(crate) fn get_var(&mut self, name: &str) -> Option<SymId> {
        match self.syms.lookup(name) {
            None => {
                self.error(format!("Variable not declared: {}", name));
                None
            }
            Some(id) if self.syms.sym(id).kind != SymKind::Var => {
                self.error(format!("Not a variable: {}", name));
                None
            }
            Some(id) => Some(id),
        }
    }

    pub(crate) fn declare_func(&mut self, name: &str, return_type: DataType) -> SymId {
        if let Some(existing) = self.syms.lookup(name) {
            if self.syms.sym(existing).kind == SymKind::Func {
                // Forward declarations make a second sighting legitimate;
                // reuse the symbol and refresh the signature.
                self.syms.sym_mut(existing).param_types.clear();
                self.current_func = Some(existing);
                return existing;
            }
            self.error(format!("Name already used: {}", name));
        }
        let id = self.syms.insert_func(name, return_type);
        self.current_func = Some(id);
        id
    }

    pub(crate) fn enter_scope(&mut self) {
        self.syms.enter_scope();
    }

    pub(crate) fn leave_scope(&mut self) {
        self.syms.leave_scope();
    }

    pub(crate) fn current_func(&self) -> Option<SymId> {
        self.current_func
    }

    pub(crate) fn clear_current_func(&mut self) {
        self.current_func = None;
    }

    // ---- instruction plumbing ----

    pub(crate) fn instr(
        &mut self,
        op: TacOp,
        a: Option<SymId>,
        b: Option<SymId>,
        c: Option<SymId>,
    ) -> InstrId {
        self.tac.emit(op, a, b, c)
    }

    pub(crate) fn join(
        &mut self,
        c1: Option<InstrId>,
        c2: Option<InstrId>,
    ) -> Option<InstrId> {
        self.tac.join(c1, c2)
    }

    /// Link a finished declaration chain onto the global chain.
    pub(crate) fn link_chain(&mut self, tail: Option<InstrId>) {
        let last = self.tac_last;
        self.tac_last = self.tac.join(last, tail);
    }

    // ---- loop and switch contexts ----

    pub(crate) fn begin_while_loop(&mut self) {
        let continue_label = self.mk_label();
        let break_label = self.mk_label();
        let depth = self.next_depth();
        self.loop_stack.push(LoopContext {
            break_label,
            continue_label,
            loop_start: None,
            depth,
        });
    }

    pub(crate) fn begin_for_loop(&mut self) {
        let loop_start = self.mk_label();
        let continue_label = self.mk_label();
        let break_label = self.mk_label();
        let depth = self.next_depth();
        self.loop_stack.push(LoopContext {
            break_label,
            continue_label,
            loop_start: Some(loop_start),
            depth,
        });
    }

    pub(crate) fn leave_loop(&mut self) {
        if self.loop_stack.pop().is_none() {
            self.error("Not in a loop context");
        }
    }

    pub(crate) fn begin_switch(&mut self) {
        let break_label = self.mk_label();
        let default_label = self.mk_label();
        let depth = self.next_depth();
        self.switch_stack.push(SwitchContext {
            break_label,
            default_label,
            cases: Vec::new(),
            default_seen: false,
            depth,
        });
    }

    fn next_depth(&mut self) -> usize {
        self.next_ctx_depth += 1;
        self.next_ctx_depth
    }

    // ---- type checking (warnings only) ----

    pub(crate) fn check_type_compatibility(&self, t1: DataType, t2: DataType) -> bool {
        if t1 == DataType::Undef || t2 == DataType::Undef {
            return true;
        }
        if matches!(t1, DataType::Int | DataType::Char)
            && matches!(t2, DataType::Int | DataType::Char)
        {
            return true;
        }
        t1 == t2
    }

    pub(crate) fn infer_binary_type(&self, t1: DataType, t2: DataType) -> DataType {
        if t1 == DataType::Undef || t2 == DataType::Undef {
            return DataType::Int;
        }
        if t1 == DataType::Int || t2 == DataType::Int {
            return DataType::Int;
        }
        if t1 == DataType::Char && t2 == DataType::Char {
            return DataType::Char;
        }
        DataType::Int
    }

    pub(crate) fn check_assignment_type(&self, var: SymId, exp: &Exp) {
        let var_type = self.syms.sym(var).data_type;
        if !self.check_type_compatibility(var_type, exp.data_type) {
            self.warning(format!(
                "Type mismatch in assignment: {} = {}",
                var_type, exp.data_type
            ));
        }
    }

    pub(crate) fn check_return_type(&self, exp: &Exp) {
        let Some(func) = self.current_func else {
            return;
        };
        let expected = self.syms.sym(func).return_type;
        if !self.check_type_compatibility(expected, exp.data_type) {
            self.warning(format!(
                "Return type mismatch: expected {}, got {}",
                expected, exp.data_type
            ));
        }
    }
}
