//! Expression combinators
//!
//! Each combinator returns an [`Exp`] fragment whose `code` tail has `prev`
//! links set. Fragments compose bottom-up; nothing is linked into the global
//! chain until a statement combinator consumes the result.

use super::{Exp, TacGen};
use crate::symbols::SymKind;
use crate::tac::TacOp;
use crate::types::DataType;

impl TacGen {
    pub(crate) fn mk_exp(&self, place: crate::symbols::SymId, data_type: DataType) -> Exp {
        Exp {
            code: None,
            place: Some(place),
            data_type,
        }
    }

    /// `a = b OP c` through a fresh temporary.
    pub(crate) fn do_bin(&mut self, op: TacOp, exp1: Exp, exp2: Exp) -> Exp {
        let (Some(b), Some(c)) = (exp1.place, exp2.place) else {
            return Exp::poison();
        };
        let result_type = self.infer_binary_type(exp1.data_type, exp2.data_type);

        let tmp = self.mk_tmp(result_type);
        let tmp_decl = self.instr(TacOp::Var, Some(tmp), None, None);
        let operands = self.join(exp1.code, exp2.code);
        self.tac.set_prev(tmp_decl, operands);

        let ret = self.instr(op, Some(tmp), Some(b), Some(c));
        self.tac.set_prev(ret, Some(tmp_decl));

        Exp {
            code: Some(ret),
            place: Some(tmp),
            data_type: result_type,
        }
    }

    /// Unary operation preserving the operand type.
    pub(crate) fn do_un(&mut self, op: TacOp, exp: Exp) -> Exp {
        let Some(b) = exp.place else {
            return Exp::poison();
        };
        let result_type = exp.data_type;

        let tmp = self.mk_tmp(result_type);
        let tmp_decl = self.instr(TacOp::Var, Some(tmp), None, None);
        self.tac.set_prev(tmp_decl, exp.code);

        let ret = self.instr(op, Some(tmp), Some(b), None);
        self.tac.set_prev(ret, Some(tmp_decl));

        Exp {
            code: Some(ret),
            place: Some(tmp),
            data_type: result_type,
        }
    }

    /// Call in expression position: the result lands in a fresh temporary.
    ///
    /// Arguments arrive in source order; both their code and their ACTUALs
    /// are emitted last-to-first so the frame math lands formal *i* on
    /// argument *i*.
    pub(crate) fn do_call_ret(&mut self, name: &str, args: Vec<Exp>) -> Exp {
        let return_type = self.check_call(name, &args);

        let ret = self.mk_tmp(return_type);
        let mut code = Some(self.instr(TacOp::Var, Some(ret), None, None));

        for arg in args.iter().rev() {
            code = self.join(code, arg.code);
        }
        for arg in args.iter().rev() {
            let Some(place) = arg.place else { continue };
            let actual = self.instr(TacOp::Actual, Some(place), None, None);
            self.tac.set_prev(actual, code);
            code = Some(actual);
        }

        let callee = self.callee_sym(name);
        let call = self.instr(TacOp::Call, Some(ret), Some(callee), None);
        self.tac.set_prev(call, code);

        Exp {
            code: Some(call),
            place: Some(ret),
            data_type: return_type,
        }
    }

    /// Call in statement position: no result temporary.
    pub(crate) fn do_call(&mut self, name: &str, args: Vec<Exp>) -> Option<crate::tac::InstrId> {
        self.check_call(name, &args);

        let mut code = None;
        for arg in args.iter().rev() {
            code = self.join(code, arg.code);
        }
        for arg in args.iter().rev() {
            let Some(place) = arg.place else { continue };
            let actual = self.instr(TacOp::Actual, Some(place), None, None);
            self.tac.set_prev(actual, code);
            code = Some(actual);
        }

        let callee = self.callee_sym(name);
        let call = self.instr(TacOp::Call, None, Some(callee), None);
        self.tac.set_prev(call, code);
        Some(call)
    }

    /// `&x`: the operand must name a variable.
    pub(crate) fn do_address_of(&mut self, exp: Exp) -> Exp {
        let Some(place) = exp.place else {
            return Exp::poison();
        };
        if self.syms.sym(place).kind != SymKind::Var {
            self.error("Cannot take the address of a non-variable");
            return Exp::poison();
        }

        let tmp = self.mk_tmp(exp.data_type);
        self.syms.sym_mut(tmp).is_pointer = true;
        let tmp_decl = self.instr(TacOp::Var, Some(tmp), None, None);
        self.tac.set_prev(tmp_decl, exp.code);

        let addr = self.instr(TacOp::Addr, Some(tmp), Some(place), None);
        self.tac.set_prev(addr, Some(tmp_decl));

        Exp {
            code: Some(addr),
            place: Some(tmp),
            data_type: exp.data_type,
        }
    }

    /// `*p` in value position.
    pub(crate) fn do_dereference(&mut self, exp: Exp) -> Exp {
        let Some(place) = exp.place else {
            return Exp::poison();
        };

        let tmp = self.mk_tmp(exp.data_type);
        let tmp_decl = self.instr(TacOp::Var, Some(tmp), None, None);
        self.tac.set_prev(tmp_decl, exp.code);

        let load = self.instr(TacOp::LoadPtr, Some(tmp), Some(place), None);
        self.tac.set_prev(load, Some(tmp_decl));

        Exp {
            code: Some(load),
            place: Some(tmp),
            data_type: exp.data_type,
        }
    }

    /// Warn about argument mismatches and report the callee's return type
    /// (int when the callee is unknown).
    fn check_call(&mut self, name: &str, args: &[Exp]) -> DataType {
        let Some(func) = self.syms.lookup(name) else {
            self.warning(format!("Function not declared: {}", name));
            return DataType::Int;
        };
        let sym = self.syms.sym(func);
        if sym.kind != SymKind::Func {
            self.warning(format!("Function not declared: {}", name));
            return DataType::Int;
        }
        let return_type = sym.return_type;
        let param_types = sym.param_types.clone();

        for (i, (arg, param)) in args.iter().zip(param_types.iter()).enumerate() {
            if !self.check_type_compatibility(arg.data_type, *param) {
                self.warning(format!("Type mismatch in function call argument {}", i + 1));
            }
        }
        if args.len() != param_types.len() {
            self.warning(format!("Argument count mismatch in function call to {}", name));
        }
        return_type
    }

    fn callee_sym(&mut self, name: &str) -> crate::symbols::SymId {
        match self.syms.lookup(name) {
            Some(id) if self.syms.sym(id).kind == SymKind::Func => id,
            _ => self.syms.alloc_func_ref(name),
        }
    }
}
