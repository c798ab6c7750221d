//! Name resolver (C5).
//!
//! A pre-order walk over the AST arena with an explicit scope stack,
//! grounded in `seq-compiler::resolver::Resolver`'s own walk shape.
//! Produces a side table keyed by AST node rather than annotating the
//! arena in place, so the arena itself stays a read-only product of the
//! parser.

use crate::diag::{DiagCode, DiagnosticBag};
use crate::symtab::{ShadowPolicy, SymbolId, SymbolKind, SymbolTable};
use parus_core::ast::*;
use parus_core::TypeId;
use std::collections::HashMap;

/// Resolution outcome for every identifier-bearing AST node. Parameters
/// are keyed by `ParamId` directly (already a unique arena index) rather
/// than by owning statement plus offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedKey {
    Expr(ExprId),
    Stmt(StmtId),
    Param(ParamId),
}

#[derive(Default)]
pub struct ResolvedSymbols {
    pub map: HashMap<ResolvedKey, SymbolId>,
}

impl ResolvedSymbols {
    pub fn get(&self, key: ResolvedKey) -> Option<SymbolId> {
        self.map.get(&key).copied()
    }
}

pub struct Resolver<'a> {
    arena: &'a Arena,
    table: SymbolTable,
    resolved: ResolvedSymbols,
    diags: &'a mut DiagnosticBag,
}

/// Resolves every name in `top_level`, returning both the per-node
/// resolution table and the symbol table it was built against — the
/// type checker needs the latter to read back a resolved identifier's
/// declared type.
pub fn resolve(
    arena: &Arena,
    top_level: StmtRange,
    shadow_policy: ShadowPolicy,
    diags: &mut DiagnosticBag,
) -> (ResolvedSymbols, SymbolTable) {
    let mut r = Resolver {
        arena,
        table: SymbolTable::new(shadow_policy),
        resolved: ResolvedSymbols::default(),
        diags,
    };
    // Top-level names are visible to every declaration, including ones
    // written earlier in the file, so they are all registered first.
    for i in top_level.range() {
        r.declare_top_level(StmtId(i as u32));
    }
    for i in top_level.range() {
        r.walk_stmt(StmtId(i as u32));
    }
    (r.resolved, r.table)
}

impl<'a> Resolver<'a> {
    fn declare_top_level(&mut self, stmt_id: StmtId) {
        let s = self.arena.stmt(stmt_id);
        let Some(name) = &s.name else { return };
        let kind = match s.kind {
            StmtKind::FnDecl => SymbolKind::Fn,
            StmtKind::TypeDecl => SymbolKind::Type,
            _ => return,
        };
        let ty = s.declared_type.unwrap_or(TypeId(0));
        let span = s.span;
        let (id, is_dup, _) = self.table.insert(name, kind, ty, span);
        if is_dup {
            self.diags.error(DiagCode::DuplicateDecl, span, vec![name.clone()]);
        }
        self.resolved.map.insert(ResolvedKey::Stmt(stmt_id), id);
    }

    fn report_shadow_or_dup(&mut self, name: &str, span: parus_core::Span, is_dup: bool, is_shadow: bool) {
        if is_dup {
            self.diags.error(DiagCode::DuplicateDecl, span, vec![name.to_string()]);
        } else if is_shadow {
            let code = if self.table.shadow_policy() == ShadowPolicy::Error {
                DiagCode::ShadowingNotAllowed
            } else {
                DiagCode::Shadowing
            };
            self.diags.warning(code, span, vec![name.to_string()]);
        }
    }

    fn walk_stmt(&mut self, stmt_id: StmtId) {
        let s = self.arena.stmt(stmt_id);
        match s.kind {
            StmtKind::VarDecl => {
                if s.init.is_valid() {
                    self.walk_expr(s.init);
                }
                if let Some(name) = &s.name {
                    let ty = s.declared_type.unwrap_or(TypeId(0));
                    let span = s.span;
                    let (id, is_dup, is_shadow) = self.table.insert(name, SymbolKind::Var, ty, span);
                    self.report_shadow_or_dup(name, span, is_dup, is_shadow);
                    self.resolved.map.insert(ResolvedKey::Stmt(stmt_id), id);
                }
            }
            StmtKind::Block => {
                self.table.push_scope();
                for i in s.body.range() {
                    self.walk_stmt(StmtId(i as u32));
                }
                self.table.pop_scope();
            }
            StmtKind::ExprStmt | StmtKind::Return | StmtKind::Break => {
                if s.init.is_valid() {
                    self.walk_expr(s.init);
                }
            }
            StmtKind::FnDecl => self.walk_fn_decl(s),
            StmtKind::TypeDecl => {
                // Field names live in the type's own namespace, not the
                // surrounding scope; nothing further to resolve here.
            }
            StmtKind::ActsDecl => {
                self.table.push_scope();
                for i in s.body.range() {
                    self.walk_stmt(StmtId(i as u32));
                }
                self.table.pop_scope();
            }
            StmtKind::While | StmtKind::DoWhile => {
                self.walk_expr(s.init);
                self.table.push_scope();
                for i in s.body.range() {
                    self.walk_stmt(StmtId(i as u32));
                }
                self.table.pop_scope();
            }
            StmtKind::Continue | StmtKind::Empty | StmtKind::Error => {}
        }
    }

    fn walk_fn_decl(&mut self, s: &Stmt) {
        self.table.push_scope();
        for (i, p) in self.arena.params_in(s.params).iter().enumerate() {
            let (id, is_dup, is_shadow) = self.table.insert(&p.name, SymbolKind::Var, p.ty, p.span);
            self.report_shadow_or_dup(&p.name, p.span, is_dup, is_shadow);
            let param_id = ParamId(s.params.begin + i as u32);
            self.resolved.map.insert(ResolvedKey::Param(param_id), id);
        }
        for g in self.arena.named_group_in(s.named_group) {
            if let Some(default) = g.default {
                self.walk_expr(default);
            }
            let (id, is_dup, is_shadow) = self.table.insert(&g.name, SymbolKind::Var, g.ty, g.span);
            self.report_shadow_or_dup(&g.name, g.span, is_dup, is_shadow);
            let _ = id;
        }
        for i in s.body.range() {
            self.walk_stmt(StmtId(i as u32));
        }
        self.table.pop_scope();
    }

    fn walk_expr(&mut self, id: ExprId) {
        if !id.is_valid() {
            return;
        }
        let e = self.arena.expr(id).clone();
        match e.kind {
            ExprKind::Ident => {
                let name = e.literal_text.as_deref().unwrap_or("");
                match self.table.lookup(name) {
                    Some(sym) => {
                        self.resolved.map.insert(ResolvedKey::Expr(id), sym);
                    }
                    None => {
                        self.diags.error(DiagCode::UndefinedName, e.span, vec![name.to_string()]);
                    }
                }
            }
            ExprKind::Unary | ExprKind::Borrow | ExprKind::Escape | ExprKind::PostfixInc | ExprKind::Cast => {
                self.walk_expr(e.children[0]);
            }
            ExprKind::Binary | ExprKind::Assign | ExprKind::Index => {
                self.walk_expr(e.children[0]);
                self.walk_expr(e.children[1]);
            }
            ExprKind::Ternary => {
                self.walk_expr(e.children[0]);
                self.walk_expr(e.children[1]);
                self.walk_expr(e.children[2]);
            }
            ExprKind::Call => {
                self.walk_expr(e.children[0]);
                for a in self.arena.args_in(e.args).to_vec() {
                    self.walk_expr(a.value);
                }
            }
            ExprKind::Field => {
                self.walk_expr(e.children[0]);
            }
            ExprKind::Block => {
                self.table.push_scope();
                let body_range = self.arena.stmt(e.block_stmt).body;
                for i in body_range.range() {
                    self.walk_stmt(StmtId(i as u32));
                }
                if e.tail_expr.is_valid() {
                    self.walk_expr(e.tail_expr);
                }
                self.table.pop_scope();
            }
            ExprKind::If => {
                self.walk_expr(e.children[0]);
                self.walk_arm(e.then_arm);
                self.walk_arm(e.else_arm);
            }
            ExprKind::Loop => {
                self.walk_expr(e.children[0]);
                self.table.push_scope();
                if let Some(var) = &e.loop_var {
                    let (sym, _, _) = self.table.insert(var, SymbolKind::Var, TypeId(0), e.span);
                    self.resolved.map.insert(ResolvedKey::Expr(id), sym);
                }
                let body_range = self.arena.stmt(e.block_stmt).body;
                for i in body_range.range() {
                    self.walk_stmt(StmtId(i as u32));
                }
                self.table.pop_scope();
            }
            ExprKind::Break | ExprKind::Return => {
                if e.children[0].is_valid() {
                    self.walk_expr(e.children[0]);
                }
            }
            ExprKind::Switch => {
                self.walk_expr(e.children[0]);
                for case in self.arena.switch_cases_in(e.switch_cases).to_vec() {
                    self.table.push_scope();
                    if let Pattern::VariantWithBindings { bindings, .. } = &case.pattern {
                        for b in bindings {
                            self.table.insert(b, SymbolKind::Var, TypeId(0), case.span);
                        }
                    }
                    for i in case.body.range() {
                        self.walk_stmt(StmtId(i as u32));
                    }
                    self.table.pop_scope();
                }
            }
            ExprKind::ArrayLiteral => {
                for a in self.arena.args_in(e.args).to_vec() {
                    self.walk_expr(a.value);
                }
            }
            ExprKind::Paren => self.walk_expr(e.children[0]),
            ExprKind::Error
            | ExprKind::IntLiteral
            | ExprKind::FloatLiteral
            | ExprKind::BoolLiteral
            | ExprKind::CharLiteral
            | ExprKind::StringLiteral
            | ExprKind::NullLiteral
            | ExprKind::Continue => {}
        }
    }

    fn walk_arm(&mut self, arm: ExprOrStmt) {
        match arm {
            ExprOrStmt::None => {}
            ExprOrStmt::Expr(e) => self.walk_expr(e),
            ExprOrStmt::Stmt(s) => {
                self.table.push_scope();
                self.walk_stmt(s);
                self.table.pop_scope();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use parus_core::TypePool;

    fn resolve_src(src: &str) -> (DiagnosticBag, ResolvedSymbols, SymbolTable, Arena) {
        let mut arena = Arena::new();
        let mut types = TypePool::new();
        let mut diags = DiagnosticBag::new();
        let range = parse(src, &mut arena, &mut types, &mut diags);
        let (resolved, table) = resolve(&arena, range, ShadowPolicy::Warn, &mut diags);
        (diags, resolved, table, arena)
    }

    #[test]
    fn resolves_a_parameter_use() {
        let (diags, _resolved, _table, _arena) = resolve_src("fn f(x: i32) -> i32 { x; }");
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
    }

    #[test]
    fn undefined_name_is_reported() {
        let (diags, _resolved, _table, _arena) = resolve_src("fn f() -> void { y; }");
        assert!(diags.iter().any(|d| d.code == DiagCode::UndefinedName));
    }

    #[test]
    fn shadowing_a_param_in_a_block_warns_by_policy() {
        let (diags, _resolved, _table, _arena) = resolve_src("fn f(x: i32) -> void { { let x: i32 = 1; } }");
        assert!(diags.iter().any(|d| d.code == DiagCode::Shadowing));
    }

    #[test]
    fn duplicate_in_same_scope_is_an_error() {
        let (diags, _resolved, _table, _arena) = resolve_src("fn f() -> void { let x: i32 = 1; let x: i32 = 2; }");
        assert!(diags.iter().any(|d| d.code == DiagCode::DuplicateDecl));
    }
}
