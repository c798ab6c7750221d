//! Type checker (C6).
//!
//! Two passes exactly as `seq-compiler::typechecker::TypeChecker` splits
//! them: `collect_top_level` registers every declaration (functions keep
//! every overload, not just the last one seen) before `check` walks
//! bodies, so forward references and mutual recursion type-check without
//! special-casing.

use crate::diag::{DiagCode, DiagnosticBag};
use crate::resolver::{ResolvedKey, ResolvedSymbols};
use crate::symtab::SymbolTable;
use parus_core::ast::*;
use parus_core::types::Builtin;
use parus_core::{TypeId, TypePool};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionPlan {
    Exact,
    InferThenExact,
    InferThenLiftToOptionalSome,
}

#[derive(Default)]
pub struct TyckResult {
    pub expr_types: HashMap<ExprId, TypeId>,
    pub call_targets: HashMap<ExprId, StmtId>,
    pub qualified_names: HashMap<StmtId, String>,
}

struct FnSig {
    decl: StmtId,
    params: Vec<TypeId>,
    named_group: Vec<(TypeId, bool)>, // (type, has_default)
    ret: TypeId,
}

pub struct TypeChecker<'a> {
    arena: &'a Arena,
    types: &'a mut TypePool,
    diags: &'a mut DiagnosticBag,
    resolved: &'a ResolvedSymbols,
    table: &'a SymbolTable,
    result: TyckResult,
    overloads: HashMap<String, Vec<FnSig>>,
    type_decls: HashMap<String, StmtId>,
    /// Raw literal value for every expr the checker left at `{integer}`,
    /// so the value can be range-checked once a concrete target is known.
    pending_ints: HashMap<ExprId, i128>,
    /// Acts-declared operator overloads, keyed by `(receiver type, token
    /// text inside `operator(...)`)`.
    operators: HashMap<(TypeId, String), StmtId>,
    loop_depth: u32,
    current_ret: Option<TypeId>,
}

pub fn check(
    arena: &Arena,
    top_level: StmtRange,
    types: &mut TypePool,
    diags: &mut DiagnosticBag,
    resolved: &ResolvedSymbols,
    table: &SymbolTable,
) -> TyckResult {
    let mut c = TypeChecker {
        arena,
        types,
        diags,
        resolved,
        table,
        result: TyckResult::default(),
        overloads: HashMap::new(),
        type_decls: HashMap::new(),
        pending_ints: HashMap::new(),
        operators: HashMap::new(),
        loop_depth: 0,
        current_ret: None,
    };
    c.collect_top_level(top_level);
    c.check_top_level(top_level);
    c.result
}

impl<'a> TypeChecker<'a> {
    // -- pass 1 --

    fn collect_top_level(&mut self, top_level: StmtRange) {
        for s in self.arena.stmts_in(top_level) {
            match s.kind {
                StmtKind::FnDecl => self.collect_fn_decl(s),
                StmtKind::TypeDecl => {
                    if let Some(name) = &s.name {
                        self.type_decls.insert(name.clone(), self.id_of_in_arena(s));
                    }
                }
                StmtKind::ActsDecl => self.collect_acts_decl(s),
                _ => {}
            }
        }
    }

    fn collect_fn_decl(&mut self, s: &Stmt) {
        let Some(name) = &s.name else { return };
        let decl = self.id_of_in_arena(s);
        let params = self.arena.params_in(s.params).iter().map(|p| p.ty).collect();
        let named_group = self
            .arena
            .named_group_in(s.named_group)
            .iter()
            .map(|g| (g.ty, g.default.is_some()))
            .collect();
        let ret = s.ret_type.unwrap_or_else(|| self.types.intern_builtin(Builtin::Void));
        self.overloads.entry(name.clone()).or_default().push(FnSig {
            decl,
            params,
            named_group,
            ret,
        });
    }

    fn collect_acts_decl(&mut self, s: &Stmt) {
        let Some(target) = s.declared_type else { return };
        for member in self.arena.stmts_in(s.body) {
            if member.kind != StmtKind::FnDecl {
                continue;
            }
            let Some(name) = &member.name else { continue };
            if let Some(op_text) = name.strip_prefix("operator(").and_then(|r| r.strip_suffix(')')) {
                let decl = self.id_of_in_arena(member);
                self.operators.insert((target, op_text.to_string()), decl);
                let params = self.arena.params_in(member.params);
                if params.first().map(|p| p.name.as_str()) != Some("self") {
                    self.diags
                        .error(DiagCode::OperatorSelfFirstParamRequired, member.span, vec![name.clone()]);
                }
            }
        }
    }

    /// Same trick as `id_of`, but computed against the whole arena vec
    /// (used for nodes not directly addressed by a known range, e.g. acts
    /// members).
    fn id_of_in_arena(&self, s: &Stmt) -> StmtId {
        let base = self.arena.stmts.as_ptr() as usize;
        let offset = (s as *const Stmt as usize - base) / std::mem::size_of::<Stmt>();
        StmtId(offset as u32)
    }

    // -- pass 2 --

    fn check_top_level(&mut self, top_level: StmtRange) {
        for s in self.arena.stmts_in(top_level) {
            match s.kind {
                StmtKind::FnDecl => self.check_fn_decl(s),
                StmtKind::ActsDecl => {
                    for member in self.arena.stmts_in(s.body) {
                        if member.kind == StmtKind::FnDecl {
                            self.check_fn_decl(member);
                        }
                    }
                }
                StmtKind::VarDecl => self.check_stmt(s),
                _ => {}
            }
        }
    }

    fn check_fn_decl(&mut self, s: &Stmt) {
        self.check_c_abi_constraints(s);
        let prev_ret = self.current_ret.replace(s.ret_type.unwrap_or_else(|| self.types.intern_builtin(Builtin::Void)));
        for stmt in self.arena.stmts_in(s.body) {
            self.check_stmt(stmt);
        }
        self.current_ret = prev_ret;
    }

    fn check_c_abi_constraints(&mut self, s: &Stmt) {
        if s.abi != Abi::C {
            return;
        }
        if s.named_group.count > 0 {
            self.diags.error(DiagCode::AbiCNamedGroupNotAllowed, s.span, vec![]);
        }
        if let Some(name) = &s.name {
            if self.overloads.get(name).map(|v| v.len()).unwrap_or(0) > 1 {
                self.diags.error(DiagCode::AbiCOverloadNotAllowed, s.span, vec![name.clone()]);
            }
        }
        for p in self.arena.params_in(s.params) {
            if !self.is_ffi_safe(p.ty) {
                self.diags
                    .error(DiagCode::AbiCTypeNotFfiSafe, p.span, vec![self.types.render(p.ty)]);
            }
        }
        if let Some(ret) = s.ret_type {
            if !self.is_ffi_safe(ret) && !matches!(self.types.get(ret), parus_core::types::Type::Builtin(Builtin::Void)) {
                self.diags.error(DiagCode::AbiCTypeNotFfiSafe, s.span, vec![self.types.render(ret)]);
            }
        }
    }

    fn is_ffi_safe(&self, ty: TypeId) -> bool {
        use parus_core::types::Type;
        match self.types.get(ty) {
            Type::Builtin(b) => !matches!(b, Builtin::IntegerLiteral | Builtin::Never),
            Type::Borrow(inner, _) => self.is_ffi_safe(*inner),
            _ => false,
        }
    }

    fn check_stmt(&mut self, s: &Stmt) {
        match s.kind {
            StmtKind::VarDecl => {
                if !s.init.is_valid() {
                    return;
                }
                let init_ty = self.infer(s.init, s.declared_type);
                if let Some(declared) = s.declared_type {
                    if !self.can_assign(declared, s.init, init_ty) {
                        self.diags.error(
                            DiagCode::TypeLetInitMismatch,
                            s.span,
                            vec![self.types.render(declared), self.types.render(init_ty)],
                        );
                    }
                } else if self.is_unresolved_int(init_ty) {
                    self.diags.error(DiagCode::IntLiteralNeedsTypeContext, s.span, vec![]);
                }
            }
            StmtKind::Block => {
                for child in self.arena.stmts_in(s.body) {
                    self.check_stmt(child);
                }
            }
            StmtKind::ExprStmt => {
                if s.init.is_valid() {
                    self.infer(s.init, None);
                }
            }
            StmtKind::Return => {
                let expected = self.current_ret;
                if s.init.is_valid() {
                    let ty = self.infer(s.init, expected);
                    if let Some(expected) = expected {
                        if !self.can_assign(expected, s.init, ty) {
                            self.diags.error(
                                DiagCode::TypeMismatch,
                                s.span,
                                vec![self.types.render(expected), self.types.render(ty)],
                            );
                        }
                    }
                } else if self.current_ret.is_none() {
                    self.diags.error(DiagCode::TypeReturnOutsideFn, s.span, vec![]);
                }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.diags.error(DiagCode::TypeMismatch, s.span, vec!["break outside loop".to_string()]);
                }
                if s.init.is_valid() {
                    self.infer(s.init, None);
                }
            }
            StmtKind::While | StmtKind::DoWhile => {
                let cond_ty = self.infer(s.init, None);
                if !self.is_bool(cond_ty) {
                    self.diags.error(
                        DiagCode::TypeCondMustBeBool,
                        s.span,
                        vec![self.types.render(cond_ty)],
                    );
                }
                self.loop_depth += 1;
                for child in self.arena.stmts_in(s.body) {
                    self.check_stmt(child);
                }
                self.loop_depth -= 1;
            }
            StmtKind::FnDecl => self.check_fn_decl(s),
            StmtKind::TypeDecl | StmtKind::ActsDecl | StmtKind::Continue | StmtKind::Empty | StmtKind::Error => {}
        }
    }

    // -- expression inference --

    fn infer(&mut self, id: ExprId, expected: Option<TypeId>) -> TypeId {
        if !id.is_valid() {
            return TypePool::ERROR;
        }
        let e = self.arena.expr(id);
        let ty = match e.kind {
            ExprKind::IntLiteral => {
                let text = e.literal_text.clone().unwrap_or_default();
                let value: i128 = text.parse().unwrap_or(0);
                if let Some(exp) = expected {
                    self.concretize_int(id, value, exp, e.span)
                } else {
                    self.pending_ints.insert(id, value);
                    self.types.intern_builtin(Builtin::IntegerLiteral)
                }
            }
            ExprKind::FloatLiteral => self.types.intern_builtin(Builtin::F64),
            ExprKind::BoolLiteral => self.types.intern_builtin(Builtin::Bool),
            ExprKind::CharLiteral => self.types.intern_builtin(Builtin::Char),
            ExprKind::StringLiteral => self.types.make_borrow(self.types.intern_builtin(Builtin::Char), false),
            ExprKind::NullLiteral => self.types.intern_builtin(Builtin::Null),
            ExprKind::Ident => self
                .resolved
                .get(ResolvedKey::Expr(id))
                .map(|sym| self.table.symbol(sym).ty)
                .unwrap_or_else(|| expected.unwrap_or(TypePool::ERROR)),
            ExprKind::Paren => {
                let inner = e.children[0];
                self.infer(inner, expected)
            }
            ExprKind::Unary => {
                let op = e.op_token;
                let inner = e.children[0];
                let operand_span = self.arena.expr(inner).span;
                let operand = self.infer(inner, None);
                match op {
                    Some(OpToken::Not) => self.types.intern_builtin(Builtin::Bool),
                    Some(OpToken::Minus) => operand,
                    Some(OpToken::Question) => {
                        self.unwrap_optional(operand).unwrap_or_else(|| {
                            self.diags.error(DiagCode::TypeMismatch, operand_span, vec!["expected optional".to_string()]);
                            TypePool::ERROR
                        })
                    }
                    _ => operand,
                }
            }
            ExprKind::PostfixInc => {
                let inner = e.children[0];
                if !self.is_place(inner) {
                    self.diags.error(DiagCode::BorrowOperandMustBePlace, e.span, vec![]);
                }
                self.infer(inner, None)
            }
            ExprKind::Borrow => {
                let inner = e.children[0];
                if !self.is_place(inner) {
                    self.diags.error(DiagCode::BorrowOperandMustBePlace, e.span, vec![]);
                }
                let inner_ty = self.infer(inner, None);
                self.types.make_borrow(inner_ty, e.unary_is_mut)
            }
            ExprKind::Escape => {
                let inner = e.children[0];
                if !self.is_place(inner) && !matches!(self.arena.expr(inner).kind, ExprKind::Index) {
                    self.diags.error(DiagCode::EscapeOperandMustBePlace, e.span, vec![]);
                }
                let inner_ty = self.infer(inner, None);
                self.types.make_escape(inner_ty).unwrap_or(TypePool::ERROR)
            }
            ExprKind::Cast => self.check_cast(id),
            ExprKind::Binary => self.check_binary(id),
            ExprKind::Assign => {
                let lhs = e.children[0];
                let rhs = e.children[1];
                if !self.is_place(lhs) {
                    self.diags.error(DiagCode::BorrowOperandMustBePlace, e.span, vec![]);
                }
                let lhs_ty = self.infer(lhs, None);
                let rhs_ty = self.infer(rhs, Some(lhs_ty));
                if !self.can_assign(lhs_ty, rhs, rhs_ty) {
                    self.diags.error(
                        DiagCode::TypeMismatch,
                        e.span,
                        vec![self.types.render(lhs_ty), self.types.render(rhs_ty)],
                    );
                }
                lhs_ty
            }
            ExprKind::Ternary => {
                let cond = e.children[0];
                let cond_ty = self.infer(cond, None);
                if !self.is_bool(cond_ty) {
                    self.diags.error(DiagCode::TypeCondMustBeBool, self.arena.expr(cond).span, vec![]);
                }
                let then_ty = self.infer(e.children[1], expected);
                let _else_ty = self.infer(e.children[2], Some(then_ty));
                then_ty
            }
            ExprKind::Index => {
                let base = self.infer(e.children[0], None);
                let index_ty = self.infer(e.children[1], None);
                if !self.is_usize_compatible(index_ty) {
                    self.diags.error(
                        DiagCode::TypeIndexMustBeUSize,
                        e.span,
                        vec![self.types.render(index_ty)],
                    );
                }
                self.element_type(base).unwrap_or(TypePool::ERROR)
            }
            ExprKind::Field => {
                let _base = self.infer(e.children[0], None);
                TypePool::ERROR
            }
            ExprKind::Call => self.check_call(id),
            ExprKind::Block => {
                let body = self.arena.stmt(e.block_stmt);
                for child in self.arena.stmts_in(body.body) {
                    self.check_stmt(child);
                }
                if e.tail_expr.is_valid() {
                    self.infer(e.tail_expr, expected)
                } else {
                    self.types.intern_builtin(Builtin::Void)
                }
            }
            ExprKind::If => {
                let cond_ty = self.infer(e.children[0], None);
                if !self.is_bool(cond_ty) {
                    self.diags.error(DiagCode::TypeCondMustBeBool, e.span, vec![]);
                }
                let then_ty = self.infer_arm(e.then_arm, expected);
                let _else_ty = self.infer_arm(e.else_arm, Some(then_ty));
                then_ty
            }
            ExprKind::Loop => {
                self.infer(e.children[0], None);
                self.loop_depth += 1;
                let body = self.arena.stmt(e.block_stmt);
                for child in self.arena.stmts_in(body.body) {
                    self.check_stmt(child);
                }
                self.loop_depth -= 1;
                self.types.intern_builtin(Builtin::Void)
            }
            ExprKind::Switch => {
                self.infer(e.children[0], None);
                for case in self.arena.switch_cases_in(e.switch_cases) {
                    for child in self.arena.stmts_in(case.body) {
                        self.check_stmt(child);
                    }
                }
                self.types.intern_builtin(Builtin::Void)
            }
            ExprKind::Break => {
                if self.loop_depth == 0 && e.children[0].is_valid() {
                    self.diags.error(DiagCode::TypeMismatch, e.span, vec!["break value outside loop".to_string()]);
                }
                if e.children[0].is_valid() {
                    self.infer(e.children[0], None);
                }
                self.types.intern_builtin(Builtin::Never)
            }
            ExprKind::Return => {
                if e.children[0].is_valid() {
                    self.infer(e.children[0], self.current_ret);
                }
                self.types.intern_builtin(Builtin::Never)
            }
            ExprKind::Continue => self.types.intern_builtin(Builtin::Never),
            ExprKind::ArrayLiteral => {
                let mut elem_ty = None;
                for a in self.arena.args_in(e.args) {
                    let t = self.infer(a.value, elem_ty);
                    elem_ty.get_or_insert(t);
                }
                let elem = elem_ty.unwrap_or(TypePool::ERROR);
                self.types.make_array(elem, Some(e.args.count as u64))
            }
            ExprKind::Error => TypePool::ERROR,
        };
        self.result.expr_types.insert(id, ty);
        ty
    }

    fn infer_arm(&mut self, arm: ExprOrStmt, expected: Option<TypeId>) -> TypeId {
        match arm {
            ExprOrStmt::None => self.types.intern_builtin(Builtin::Void),
            ExprOrStmt::Expr(e) => self.infer(e, expected),
            ExprOrStmt::Stmt(s) => {
                self.check_stmt(self.arena.stmt(s));
                self.types.intern_builtin(Builtin::Void)
            }
        }
    }

    fn concretize_int(&mut self, id: ExprId, value: i128, target: TypeId, span: parus_core::Span) -> TypeId {
        use parus_core::types::Type;
        let Type::Builtin(b) = self.types.get(target).clone() else {
            self.pending_ints.insert(id, value);
            return target;
        };
        if !b.is_integer() {
            self.pending_ints.insert(id, value);
            return target;
        }
        let Some((min, max)) = b.integer_range() else {
            return target;
        };
        if value < min || (value > max && !b.is_u128()) {
            self.diags
                .error(DiagCode::IntLiteralDoesNotFit, span, vec![b.name().to_string(), value.to_string()]);
        }
        target
    }

    fn is_unresolved_int(&self, ty: TypeId) -> bool {
        matches!(self.types.get(ty), parus_core::types::Type::Builtin(Builtin::IntegerLiteral))
    }

    fn is_bool(&self, ty: TypeId) -> bool {
        matches!(self.types.get(ty), parus_core::types::Type::Builtin(Builtin::Bool))
    }

    fn is_usize_compatible(&self, ty: TypeId) -> bool {
        use parus_core::types::Type;
        matches!(
            self.types.get(ty),
            Type::Builtin(Builtin::USize) | Type::Builtin(Builtin::IntegerLiteral)
        )
    }

    fn unwrap_optional(&self, ty: TypeId) -> Option<TypeId> {
        match self.types.get(ty) {
            parus_core::types::Type::Optional(inner) => Some(*inner),
            _ => None,
        }
    }

    fn element_type(&self, ty: TypeId) -> Option<TypeId> {
        use parus_core::types::Type;
        match self.types.get(ty) {
            Type::Array(elem, _) => Some(*elem),
            Type::Borrow(inner, _) => match self.types.get(*inner) {
                Type::Array(elem, _) => Some(*elem),
                _ => None,
            },
            _ => None,
        }
    }

    fn is_place(&self, id: ExprId) -> bool {
        if !id.is_valid() {
            return false;
        }
        matches!(self.arena.expr(id).kind, ExprKind::Ident | ExprKind::Index | ExprKind::Field)
    }

    /// `dst <- src` compatibility (spec.md §4.4): exact match, `null` into
    /// `T?`, or one of the named coercion plans.
    fn can_assign(&mut self, dst: TypeId, src_expr: ExprId, src_ty: TypeId) -> bool {
        if dst == src_ty {
            return true;
        }
        use parus_core::types::Type;
        if let Type::Optional(inner) = self.types.get(dst).clone() {
            if matches!(self.types.get(src_ty), Type::Builtin(Builtin::Null)) {
                return true; // CoercionPlan::Exact via null literal
            }
            if inner == src_ty {
                return true; // CoercionPlan::InferThenLiftToOptionalSome
            }
        }
        if self.is_unresolved_int(src_ty) {
            if let Some(&value) = self.pending_ints.get(&src_expr) {
                self.concretize_int(src_expr, value, dst, self.arena.expr(src_expr).span);
                self.result.expr_types.insert(src_expr, dst);
                return true; // CoercionPlan::InferThenExact
            }
        }
        false
    }

    fn check_cast(&mut self, id: ExprId) -> TypeId {
        let e = self.arena.expr(id);
        let operand = e.children[0];
        let to = e.cast_to.unwrap_or(TypePool::ERROR);
        let operand_ty = self.infer(operand, None);
        use parus_core::types::Type;
        if e.op_token == Some(OpToken::As) {
            if matches!(self.types.get(operand_ty), Type::Builtin(Builtin::Null)) && !matches!(self.types.get(to), Type::Optional(_)) {
                self.diags.error(DiagCode::TyckCastNullToNonOptional, e.span, vec![self.types.render(to)]);
            }
        }
        if matches!(self.types.get(to), Type::Function { .. }) {
            self.diags.error(DiagCode::TyckCastNotAllowed, e.span, vec![self.types.render(to)]);
        }
        to
    }

    fn check_binary(&mut self, id: ExprId) -> TypeId {
        let e = self.arena.expr(id);
        let op = e.op_token;
        let lhs = e.children[0];
        let rhs = e.children[1];
        if matches!(op, Some(OpToken::AndAnd) | Some(OpToken::OrOr)) {
            let lhs_ty = self.infer(lhs, Some(self.types.intern_builtin(Builtin::Bool)));
            let rhs_ty = self.infer(rhs, Some(self.types.intern_builtin(Builtin::Bool)));
            if !self.is_bool(lhs_ty) || !self.is_bool(rhs_ty) {
                self.diags.error(DiagCode::TypeMismatch, e.span, vec!["expected bool operands".to_string()]);
            }
            return self.types.intern_builtin(Builtin::Bool);
        }
        if op.is_none() && e.literal_text.as_deref() == Some("..") {
            // slice-range operand; each side checked independently.
            self.infer(lhs, None);
            self.infer(rhs, None);
            return TypePool::ERROR;
        }
        let lhs_ty = self.infer(lhs, None);
        let rhs_ty = self.infer(rhs, Some(lhs_ty));

        if let Some(user_result) = self.try_operator_overload(lhs_ty, op, rhs) {
            return user_result;
        }

        match op {
            Some(OpToken::EqEq) | Some(OpToken::NotEq) | Some(OpToken::Lt) | Some(OpToken::LtEq) | Some(OpToken::Gt) | Some(OpToken::GtEq) => {
                self.types.intern_builtin(Builtin::Bool)
            }
            Some(OpToken::QuestionQuestion) => {
                let unwrapped = self.unwrap_optional(lhs_ty).unwrap_or(lhs_ty);
                unwrapped
            }
            _ => {
                if lhs_ty != rhs_ty && !self.is_unresolved_int(lhs_ty) && !self.is_unresolved_int(rhs_ty) {
                    self.diags.error(
                        DiagCode::TypeMismatch,
                        e.span,
                        vec![self.types.render(lhs_ty), self.types.render(rhs_ty)],
                    );
                }
                lhs_ty
            }
        }
    }

    fn try_operator_overload(&mut self, receiver: TypeId, op: Option<OpToken>, _rhs: ExprId) -> Option<TypeId> {
        let token_text = match op {
            Some(OpToken::Plus) => "+",
            Some(OpToken::Minus) => "-",
            Some(OpToken::Star) => "*",
            Some(OpToken::Slash) => "/",
            Some(OpToken::EqEq) => "==",
            _ => return None,
        };
        let key = (receiver, token_text.to_string());
        let decl = *self.operators.get(&key)?;
        let stmt = self.arena.stmt(decl);
        Some(stmt.ret_type.unwrap_or_else(|| self.types.intern_builtin(Builtin::Void)))
    }

    fn check_call(&mut self, id: ExprId) -> TypeId {
        let e = self.arena.expr(id);
        let callee = e.children[0];
        let args: Vec<Arg> = self.arena.args_in(e.args).to_vec();
        for a in &args {
            self.infer(a.value, None);
        }
        let Some(name) = self.arena.expr(callee).literal_text.clone() else {
            return TypePool::ERROR;
        };
        let Some(candidates) = self.overloads.get(&name) else {
            return TypePool::ERROR;
        };
        let positional = args.iter().take_while(|a| a.label.is_none()).count();
        let mut best: Option<(usize, TypeId, StmtId)> = None;
        let mut tie = false;
        for sig in candidates {
            if sig.params.len() != positional {
                continue;
            }
            let score = sig.params.len();
            match &best {
                Some((best_score, _, _)) if *best_score == score => tie = true,
                Some((best_score, _, _)) if *best_score > score => continue,
                _ => {
                    best = Some((score, sig.ret, sig.decl));
                    tie = false;
                }
            }
        }
        match best {
            Some((_, ret, decl)) if tie => {
                self.diags.error(DiagCode::OverloadAmbiguousCall, e.span, vec![name]);
                self.result.call_targets.insert(id, decl);
                ret
            }
            Some((_, ret, decl)) => {
                self.result.call_targets.insert(id, decl);
                ret
            }
            None => {
                self.diags.error(DiagCode::OverloadNoMatchingCall, e.span, vec![name]);
                TypePool::ERROR
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::symtab::ShadowPolicy;

    fn check_src(src: &str) -> DiagnosticBag {
        let mut arena = Arena::new();
        let mut types = TypePool::new();
        let mut diags = DiagnosticBag::new();
        let range = parse(src, &mut arena, &mut types, &mut diags);
        let (resolved, table) = resolve(&arena, range, ShadowPolicy::Warn, &mut diags);
        check(&arena, range, &mut types, &mut diags, &resolved, &table);
        diags
    }

    #[test]
    fn literal_fits_its_declared_type() {
        let diags = check_src("fn f() -> void { let x: u8 = 12; }");
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
    }

    #[test]
    fn literal_overflow_is_reported() {
        let diags = check_src("fn f() -> void { let x: u8 = 300; }");
        assert!(diags.iter().any(|d| d.code == DiagCode::IntLiteralDoesNotFit));
    }

    #[test]
    fn condition_must_be_bool() {
        let diags = check_src("fn f() -> void { while (1) { } }");
        assert!(diags.iter().any(|d| d.code == DiagCode::TypeCondMustBeBool));
    }

    #[test]
    fn call_to_unknown_function_is_reported() {
        let diags = check_src("fn f() -> void { g(); }");
        assert!(diags.iter().any(|d| d.code == DiagCode::OverloadNoMatchingCall));
    }

    #[test]
    fn call_resolves_to_matching_overload() {
        let diags = check_src("fn g(x: i32) -> i32 { return x; } fn f() -> void { g(1); }");
        assert!(!diags.iter().any(|d| d.code == DiagCode::OverloadNoMatchingCall));
    }

    #[test]
    fn extern_c_rejects_named_group() {
        let diags = check_src("extern \"C\" fn f(x: i32 { y: i32 = 0 }) -> i32;");
        assert!(diags.iter().any(|d| d.code == DiagCode::AbiCNamedGroupNotAllowed));
    }
}
