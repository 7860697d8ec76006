//! AST lowering
//!
//! Walks the parsed program and drives the statement/expression combinators.
//! Global variable declarations and function bodies are linked onto the one
//! global chain in source order; [`lower`] finishes with the linearization
//! pass and hands back the completed program.

use super::{Exp, TacGen, TacProgram};
use crate::ast::{Decl, Expr, FuncDecl, Program, Stmt, StructDecl, VarDecl};
use crate::tac::InstrId;
use crate::types::{DataType, Type};

/// Lower a parsed program into a completed TAC list.
pub fn lower(program: &Program) -> TacProgram {
    let mut tacgen = TacGen::new();
    tacgen.lower_program(program);
    tacgen.finish()
}

impl TacGen {
    pub fn lower_program(&mut self, program: &Program) {
        for decl in &program.decls {
            match decl {
                Decl::Var(v) => self.lower_global_var(v),
                Decl::Func(f) => self.lower_func(f),
                Decl::Struct(s) => self.lower_struct(s),
            }
        }
    }

    fn lower_global_var(&mut self, decl: &VarDecl) {
        if decl.init.is_some() {
            self.warning(format!(
                "Initializer on global variable '{}' is ignored",
                decl.name
            ));
        }
        let tail = self.declare_var(&decl.name, &decl.ty);
        self.link_chain(tail);
    }

    fn lower_struct(&mut self, decl: &StructDecl) {
        if self.syms.struct_type(&decl.name).is_some() {
            self.error(format!("Struct already declared: {}", decl.name));
            return;
        }
        let fields: Vec<(String, Type)> = decl
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.ty.clone()))
            .collect();
        let layout = self.syms.layout_struct(&decl.name, &fields);
        self.syms.declare_struct_type(layout);
    }

    fn lower_func(&mut self, decl: &FuncDecl) {
        let func = self.declare_func(&decl.name, decl.ret.data_type());

        let Some(body) = &decl.body else {
            // Forward declaration: record the signature, emit nothing.
            for param in &decl.params {
                let dt = param.ty.data_type();
                self.syms.sym_mut(func).param_types.push(dt);
            }
            self.clear_current_func();
            return;
        };

        self.enter_scope();
        let mut args: Option<InstrId> = None;
        for param in &decl.params {
            let formal = self.declare_para(&param.name, &param.ty);
            args = self.join(args, formal);
        }

        let mut code: Option<InstrId> = None;
        for stmt in body {
            let stmt_code = self.lower_stmt(stmt);
            code = self.join(code, stmt_code);
        }

        self.do_func(func, args, code);
        self.leave_scope();
        self.clear_current_func();
    }

    fn lower_stmt(&mut self, stmt: &Stmt) -> Option<InstrId> {
        match stmt {
            Stmt::VarDecl(decl) => self.lower_local_var(decl),
            Stmt::Expr(expr) => self.lower_expr_stmt(expr),
            Stmt::Block(stmts) => {
                let mut code = None;
                for s in stmts {
                    let stmt_code = self.lower_stmt(s);
                    code = self.join(code, stmt_code);
                }
                code
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_exp = self.lower_expr(cond);
                let then_code = self.lower_stmt(then_branch);
                match else_branch {
                    Some(else_stmt) => {
                        let else_code = self.lower_stmt(else_stmt);
                        self.do_if_else(cond_exp, then_code, else_code)
                    }
                    None => self.do_if(cond_exp, then_code),
                }
            }
            Stmt::While { cond, body } => {
                self.begin_while_loop();
                let cond_exp = self.lower_expr(cond);
                let body_code = self.lower_stmt(body);
                self.end_while_loop(cond_exp, body_code)
            }
            Stmt::For {
                init,
                cond,
                update,
                body,
            } => {
                self.begin_for_loop();
                let init_code = init.as_ref().and_then(|s| self.lower_stmt(s));
                let cond_exp = match cond {
                    Some(c) => self.lower_expr(c),
                    // `for (;;)` runs unconditionally.
                    None => {
                        let one = self.mk_const(1);
                        self.mk_exp(one, DataType::Int)
                    }
                };
                let update_code = update.as_ref().and_then(|e| self.lower_expr(e).code);
                let body_code = self.lower_stmt(body);
                self.end_for_loop(init_code, cond_exp, update_code, body_code)
            }
            Stmt::Return(value) => {
                let exp = value.as_ref().map(|e| self.lower_expr(e));
                self.do_return(exp)
            }
            Stmt::Break => self.do_break(),
            Stmt::Continue => self.do_continue(),
            Stmt::Input(name) => {
                let var = self.get_var(name);
                self.do_input(var)
            }
            Stmt::Output(expr) => {
                let exp = self.lower_expr(expr);
                let out = self.do_output(exp.place);
                self.join(exp.code, out)
            }
            Stmt::Switch { cond, body } => {
                self.begin_switch();
                let cond_exp = self.lower_expr(cond);
                let body_code = self.lower_stmt(body);
                self.end_switch(cond_exp, body_code)
            }
            Stmt::Case(value) => self.do_case(*value),
            Stmt::Default => self.do_default(),
        }
    }

    fn lower_local_var(&mut self, decl: &VarDecl) -> Option<InstrId> {
        let var_tac = self.declare_var(&decl.name, &decl.ty);
        if let Some(init) = &decl.init {
            let exp = self.lower_expr(init);
            let var = self.get_var(&decl.name);
            let assign = self.do_assign(var, exp);
            return self.join(var_tac, assign);
        }
        var_tac
    }

    /// A call in statement position needs no result temporary.
    fn lower_expr_stmt(&mut self, expr: &Expr) -> Option<InstrId> {
        if let Expr::Call { name, args } = expr {
            let arg_exps: Vec<Exp> = args.iter().map(|a| self.lower_expr(a)).collect();
            return self.do_call(name, arg_exps);
        }
        self.lower_expr(expr).code
    }

    fn lower_expr(&mut self, expr: &Expr) -> Exp {
        match expr {
            Expr::ConstInt(value) => {
                let sym = self.mk_const(*value);
                self.mk_exp(sym, DataType::Int)
            }
            Expr::ConstChar(value) => {
                let sym = self.mk_const_char(*value);
                self.mk_exp(sym, DataType::Char)
            }
            Expr::StringLit(text) => {
                let sym = self.mk_text(text);
                self.mk_exp(sym, DataType::Char)
            }
            Expr::Ident(name) => match self.get_var(name) {
                Some(var) => {
                    let dt = self.syms.sym(var).data_type;
                    self.mk_exp(var, dt)
                }
                None => Exp::poison(),
            },
            Expr::Binary { op, left, right } => {
                let left_exp = self.lower_expr(left);
                let right_exp = self.lower_expr(right);
                self.do_bin(*op, left_exp, right_exp)
            }
            Expr::Unary { op, operand } => {
                let operand_exp = self.lower_expr(operand);
                self.do_un(*op, operand_exp)
            }
            Expr::Assign { target, value } => self.lower_assign(target, value),
            Expr::Call { name, args } => {
                let arg_exps: Vec<Exp> = args.iter().map(|a| self.lower_expr(a)).collect();
                self.do_call_ret(name, arg_exps)
            }
            Expr::AddressOf(operand) => {
                let exp = self.lower_expr(operand);
                self.do_address_of(exp)
            }
            Expr::Deref(operand) => {
                let exp = self.lower_expr(operand);
                self.do_dereference(exp)
            }
            Expr::ArrayAccess { .. } => {
                self.warning("Array access is not yet supported in TAC generation");
                Exp::poison()
            }
            Expr::MemberAccess { .. } => {
                self.warning("Member access is not yet supported in TAC generation");
                Exp::poison()
            }
        }
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Exp {
        match target {
            Expr::Ident(name) => {
                let var = self.get_var(name);
                let value_exp = self.lower_expr(value);
                let data_type = var
                    .map(|v| self.syms.sym(v).data_type)
                    .unwrap_or(DataType::Undef);
                let code = self.do_assign(var, value_exp);
                Exp {
                    code,
                    place: var,
                    data_type,
                }
            }
            Expr::Deref(inner) => {
                let ptr_exp = self.lower_expr(inner);
                let value_exp = self.lower_expr(value);
                let place = value_exp.place;
                let data_type = value_exp.data_type;
                let code = self.do_pointer_assign(ptr_exp, value_exp);
                Exp {
                    code,
                    place,
                    data_type,
                }
            }
            _ => {
                self.warning("Complex assignment targets are not yet supported");
                Exp::poison()
            }
        }
    }
}
