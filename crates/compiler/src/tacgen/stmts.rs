//! Statement and declaration combinators
//!
//! All combinators return the tail of a backward-linked chain (or `None`
//! when a reported error produced no code). Function bodies are assembled
//! here and linked onto the global chain by `do_func`.

use super::{Exp, TacGen};
use crate::symbols::{SymId, SymKind};
use crate::tac::{InstrId, TacOp};
use crate::types::{DataType, Type};

impl TacGen {
    /// `type name;`: declare storage in the current scope.
    pub(crate) fn declare_var(&mut self, name: &str, ty: &Type) -> Option<InstrId> {
        let sym = self.mk_var(name, ty);
        Some(self.instr(TacOp::Var, Some(sym), None, None))
    }

    /// A formal parameter: declared like a variable, recorded on the
    /// enclosing function's signature.
    pub(crate) fn declare_para(&mut self, name: &str, ty: &Type) -> Option<InstrId> {
        let sym = self.mk_var(name, ty);
        let data_type = ty.data_type();
        if let Some(func) = self.current_func() {
            self.syms.sym_mut(func).param_types.push(data_type);
        }
        Some(self.instr(TacOp::Formal, Some(sym), None, None))
    }

    /// Wrap a function body: `LABEL name; BEGINFUNC; args; body; ENDFUNC`,
    /// linked onto the global chain.
    pub(crate) fn do_func(
        &mut self,
        func: SymId,
        args: Option<InstrId>,
        code: Option<InstrId>,
    ) -> InstrId {
        let name = self.syms.sym(func).name.clone();
        let label = self.mk_named_label(&name);
        let tlab = self.instr(TacOp::Label, Some(label), None, None);
        let tbegin = self.instr(TacOp::BeginFunc, None, None, None);
        self.tac.set_prev(tbegin, Some(tlab));

        let body = self.join(args, code);
        let inner = self.join(Some(tbegin), body);

        let tend = self.instr(TacOp::EndFunc, None, None, None);
        self.tac.set_prev(tend, inner);

        self.link_chain(Some(tend));
        tend
    }

    /// `var = exp` through a COPY.
    pub(crate) fn do_assign(&mut self, var: Option<SymId>, exp: Exp) -> Option<InstrId> {
        let var = var?;
        if self.syms.sym(var).kind != SymKind::Var {
            self.error("Assignment to non-variable");
            return exp.code;
        }
        let Some(place) = exp.place else {
            return exp.code;
        };

        self.check_assignment_type(var, &exp);

        let copy = self.instr(TacOp::Copy, Some(var), Some(place), None);
        self.tac.set_prev(copy, exp.code);
        Some(copy)
    }

    /// `*ptr = exp` through a STORE_PTR.
    pub(crate) fn do_pointer_assign(&mut self, ptr: Exp, value: Exp) -> Option<InstrId> {
        let (Some(ptr_place), Some(value_place)) = (ptr.place, value.place) else {
            return self.join(ptr.code, value.code);
        };

        let code = self.join(ptr.code, value.code);
        let store = self.instr(TacOp::StorePtr, Some(ptr_place), Some(value_place), None);
        self.tac.set_prev(store, code);
        Some(store)
    }

    pub(crate) fn do_input(&mut self, var: Option<SymId>) -> Option<InstrId> {
        let var = var?;
        if self.syms.sym(var).kind != SymKind::Var {
            self.error("Input to non-variable");
            return None;
        }
        Some(self.instr(TacOp::Input, Some(var), None, None))
    }

    pub(crate) fn do_output(&mut self, sym: Option<SymId>) -> Option<InstrId> {
        let sym = sym?;
        Some(self.instr(TacOp::Output, Some(sym), None, None))
    }

    pub(crate) fn do_return(&mut self, exp: Option<Exp>) -> Option<InstrId> {
        let Some(exp) = exp else {
            if let Some(func) = self.current_func() {
                if self.syms.sym(func).return_type != DataType::Void {
                    self.warning("Non-void function should return a value");
                }
            }
            return Some(self.instr(TacOp::Return, None, None, None));
        };

        self.check_return_type(&exp);
        let ret = self.instr(TacOp::Return, exp.place, None, None);
        self.tac.set_prev(ret, exp.code);
        Some(ret)
    }

    /// `if (exp) stmt`:
    /// cond-code; IFZ Lend; stmt; LABEL Lend.
    pub(crate) fn do_if(&mut self, exp: Exp, stmt: Option<InstrId>) -> Option<InstrId> {
        let Some(place) = exp.place else {
            return self.join(exp.code, stmt);
        };

        let end = self.mk_label();
        let ifz = self.instr(TacOp::Ifz, Some(end), Some(place), None);
        self.tac.set_prev(ifz, exp.code);
        let body = self.join(Some(ifz), stmt);

        let label = self.instr(TacOp::Label, Some(end), None, None);
        self.tac.set_prev(label, body);
        Some(label)
    }

    /// `if (exp) stmt1 else stmt2`:
    /// cond-code; IFZ Lelse; stmt1; GOTO Lend; LABEL Lelse; stmt2; LABEL Lend.
    pub(crate) fn do_if_else(
        &mut self,
        exp: Exp,
        stmt1: Option<InstrId>,
        stmt2: Option<InstrId>,
    ) -> Option<InstrId> {
        let Some(place) = exp.place else {
            let joined = self.join(exp.code, stmt1);
            return self.join(joined, stmt2);
        };

        let else_label = self.mk_label();
        let end_label = self.mk_label();

        let ifz = self.instr(TacOp::Ifz, Some(else_label), Some(place), None);
        self.tac.set_prev(ifz, exp.code);
        let then_code = self.join(Some(ifz), stmt1);

        let goto_end = self.instr(TacOp::Goto, Some(end_label), None, None);
        self.tac.set_prev(goto_end, then_code);

        let telse = self.instr(TacOp::Label, Some(else_label), None, None);
        self.tac.set_prev(telse, Some(goto_end));
        let else_code = self.join(Some(telse), stmt2);

        let tend = self.instr(TacOp::Label, Some(end_label), None, None);
        self.tac.set_prev(tend, else_code);
        Some(tend)
    }

    /// Close a while loop begun with [`TacGen::begin_while_loop`]:
    /// LABEL Lcont; cond-code; IFZ Lbrk; body; GOTO Lcont; LABEL Lbrk.
    pub(crate) fn end_while_loop(&mut self, exp: Exp, stmt: Option<InstrId>) -> Option<InstrId> {
        let result = self.do_while(exp, stmt);
        self.leave_loop();
        result
    }

    fn do_while(&mut self, exp: Exp, stmt: Option<InstrId>) -> Option<InstrId> {
        let Some(ctx) = self.loop_stack.last() else {
            self.error("Not in a loop context");
            return self.join(exp.code, stmt);
        };
        let (break_sym, continue_sym) = (ctx.break_label, ctx.continue_label);
        let Some(place) = exp.place else {
            return self.join(exp.code, stmt);
        };

        let tcont = self.instr(TacOp::Label, Some(continue_sym), None, None);
        let cond = self.join(Some(tcont), exp.code);

        let ifz = self.instr(TacOp::Ifz, Some(break_sym), Some(place), None);
        self.tac.set_prev(ifz, cond);
        let body = self.join(Some(ifz), stmt);

        let goto_cont = self.instr(TacOp::Goto, Some(continue_sym), None, None);
        self.tac.set_prev(goto_cont, body);

        let tbrk = self.instr(TacOp::Label, Some(break_sym), None, None);
        self.tac.set_prev(tbrk, Some(goto_cont));
        Some(tbrk)
    }

    /// Close a for loop begun with [`TacGen::begin_for_loop`]:
    /// init; LABEL Lstart; cond-code; IFZ Lbrk; body; LABEL Lcont; update;
    /// GOTO Lstart; LABEL Lbrk. `continue` targets the update.
    pub(crate) fn end_for_loop(
        &mut self,
        init: Option<InstrId>,
        cond: Exp,
        update: Option<InstrId>,
        body: Option<InstrId>,
    ) -> Option<InstrId> {
        let result = self.do_for(init, cond, update, body);
        self.leave_loop();
        result
    }

    fn do_for(
        &mut self,
        init: Option<InstrId>,
        cond: Exp,
        update: Option<InstrId>,
        body: Option<InstrId>,
    ) -> Option<InstrId> {
        let Some(ctx) = self.loop_stack.last() else {
            self.error("Not in a loop context");
            return None;
        };
        let break_sym = ctx.break_label;
        let continue_sym = ctx.continue_label;
        let Some(start_sym) = ctx.loop_start else {
            self.error("For loop context has no start label");
            return None;
        };
        let Some(place) = cond.place else {
            return self.join(init, body);
        };

        let tstart = self.instr(TacOp::Label, Some(start_sym), None, None);
        let head = self.join(init, Some(tstart));
        let head = self.join(head, cond.code);

        let ifz = self.instr(TacOp::Ifz, Some(break_sym), Some(place), None);
        self.tac.set_prev(ifz, head);
        let loop_body = self.join(Some(ifz), body);

        let tcont = self.instr(TacOp::Label, Some(continue_sym), None, None);
        self.tac.set_prev(tcont, loop_body);
        let upd = self.join(Some(tcont), update);

        let goto_start = self.instr(TacOp::Goto, Some(start_sym), None, None);
        self.tac.set_prev(goto_start, upd);

        let tbrk = self.instr(TacOp::Label, Some(break_sym), None, None);
        self.tac.set_prev(tbrk, Some(goto_start));
        Some(tbrk)
    }

    /// `break` targets the innermost enclosing loop *or* switch.
    pub(crate) fn do_break(&mut self) -> Option<InstrId> {
        let loop_depth = self.loop_stack.last().map(|c| c.depth);
        let switch_depth = self.switch_stack.last().map(|c| c.depth);
        let target = match (loop_depth, switch_depth) {
            (Some(l), Some(s)) if s > l => self.switch_stack.last().map(|c| c.break_label),
            (Some(_), _) => self.loop_stack.last().map(|c| c.break_label),
            (None, Some(_)) => self.switch_stack.last().map(|c| c.break_label),
            (None, None) => None,
        };
        match target {
            Some(label) => Some(self.instr(TacOp::Goto, Some(label), None, None)),
            None => {
                self.error("break statement outside of loop or switch");
                None
            }
        }
    }

    /// `continue` targets the innermost loop's continue label.
    pub(crate) fn do_continue(&mut self) -> Option<InstrId> {
        match self.loop_stack.last() {
            Some(ctx) => {
                let label = ctx.continue_label;
                Some(self.instr(TacOp::Goto, Some(label), None, None))
            }
            None => {
                self.error("continue statement outside of loop");
                None
            }
        }
    }

    /// `case N:`: emit the case label and register it with the active
    /// switch.
    pub(crate) fn do_case(&mut self, value: i32) -> Option<InstrId> {
        if self.switch_stack.is_empty() {
            self.error("case statement outside of switch");
            return None;
        }
        let label = self.mk_label();
        let mut duplicate = false;
        if let Some(ctx) = self.switch_stack.last_mut() {
            if ctx.cases.iter().any(|(v, _)| *v == value) {
                duplicate = true;
            } else {
                ctx.cases.push((value, label));
            }
        }
        if duplicate {
            self.error(format!("Duplicate case value: {}", value));
        }
        Some(self.instr(TacOp::Label, Some(label), None, None))
    }

    /// `default:`: emit the default label recorded by `begin_switch`.
    pub(crate) fn do_default(&mut self) -> Option<InstrId> {
        let Some(ctx) = self.switch_stack.last_mut() else {
            self.error("default statement outside of switch");
            return None;
        };
        ctx.default_seen = true;
        let label = ctx.default_label;
        Some(self.instr(TacOp::Label, Some(label), None, None))
    }

    /// Close a switch begun with [`TacGen::begin_switch`]: cond-code, one
    /// `tmp = cond - case; IFZ Lcase, tmp` pair per recorded case, GOTO to
    /// the default label, the body, then LABEL Lbrk. A switch without a
    /// `default:` defines the default label just before the break label.
    pub(crate) fn end_switch(&mut self, exp: Exp, body: Option<InstrId>) -> Option<InstrId> {
        let Some(ctx) = self.switch_stack.pop() else {
            self.error("Not in a switch context");
            return body;
        };

        let Some(place) = exp.place else {
            let joined = self.join(exp.code, body);
            let tbrk = self.instr(TacOp::Label, Some(ctx.break_label), None, None);
            self.tac.set_prev(tbrk, joined);
            return Some(tbrk);
        };

        let mut code = exp.code;
        for (value, case_label) in &ctx.cases {
            let const_sym = self.mk_const(*value);
            let tmp = self.mk_tmp(exp.data_type);

            let tmp_decl = self.instr(TacOp::Var, Some(tmp), None, None);
            self.tac.set_prev(tmp_decl, code);
            let sub = self.instr(TacOp::Sub, Some(tmp), Some(place), Some(const_sym));
            self.tac.set_prev(sub, Some(tmp_decl));
            let jump = self.instr(TacOp::Ifz, Some(*case_label), Some(tmp), None);
            self.tac.set_prev(jump, Some(sub));
            code = Some(jump);
        }

        let goto_default = self.instr(TacOp::Goto, Some(ctx.default_label), None, None);
        self.tac.set_prev(goto_default, code);

        let mut result = self.join(Some(goto_default), body);
        if !ctx.default_seen {
            let fallback = self.instr(TacOp::Label, Some(ctx.default_label), None, None);
            self.tac.set_prev(fallback, result);
            result = Some(fallback);
        }

        let tbrk = self.instr(TacOp::Label, Some(ctx.break_label), None, None);
        self.tac.set_prev(tbrk, result);
        Some(tbrk)
    }
}
