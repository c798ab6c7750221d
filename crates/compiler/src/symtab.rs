//! Scoped symbol table (C4).
//!
//! A stack of scopes, each a plain name → id map, grounded in
//! `seq-compiler::resolver`'s own scope handling. `insert` reports back
//! enough for the resolver to emit the right diagnostic instead of
//! throwing from inside the table itself.

use parus_core::{Span, TypeId};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Var,
    Fn,
    Type,
    Field,
    Act,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
    pub depth: u32,
}

/// Shadowing policy for a name re-declared in an inner scope (spec.md
/// §4.3 supplement — duplicate-in-same-scope is always an error
/// regardless of this policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPolicy {
    Allow,
    Warn,
    Error,
}

struct Scope {
    names: HashMap<String, SymbolId>,
}

pub struct SymbolTable {
    symbols: Vec<Symbol>,
    scopes: Vec<Scope>,
    shadow_policy: ShadowPolicy,
}

impl SymbolTable {
    pub fn new(shadow_policy: ShadowPolicy) -> Self {
        SymbolTable {
            symbols: Vec::new(),
            scopes: vec![Scope { names: HashMap::new() }],
            shadow_policy,
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Scope { names: HashMap::new() });
    }

    pub fn pop_scope(&mut self) {
        debug_assert!(self.scopes.len() > 1, "cannot pop the root scope");
        self.scopes.pop();
    }

    pub fn depth(&self) -> u32 {
        self.scopes.len() as u32 - 1
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    /// Inserts `name` into the current scope. Returns the new symbol id
    /// plus whether it duplicates a same-scope binding (always an error
    /// at the call site) and whether it shadows an outer-scope binding
    /// (governed by `shadow_policy`).
    pub fn insert(&mut self, name: &str, kind: SymbolKind, ty: TypeId, span: Span) -> (SymbolId, bool, bool) {
        let depth = self.depth();
        let is_duplicate = self.scopes.last().unwrap().names.contains_key(name);
        let is_shadowing = !is_duplicate && self.lookup(name).is_some();

        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            kind,
            name: name.to_string(),
            ty,
            span,
            depth,
        });
        self.scopes.last_mut().unwrap().names.insert(name.to_string(), id);
        (id, is_duplicate, is_shadowing && self.shadow_policy != ShadowPolicy::Allow)
    }

    /// Looks up `name` from the innermost scope outward.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.scopes.iter().rev().find_map(|s| s.names.get(name).copied())
    }

    pub fn shadow_policy(&self) -> ShadowPolicy {
        self.shadow_policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parus_core::Span;

    #[test]
    fn duplicate_in_same_scope_is_flagged() {
        let mut t = SymbolTable::new(ShadowPolicy::Allow);
        let (_, dup1, _) = t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        let (_, dup2, _) = t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        assert!(!dup1);
        assert!(dup2);
    }

    #[test]
    fn shadowing_in_nested_scope_is_not_a_duplicate() {
        let mut t = SymbolTable::new(ShadowPolicy::Warn);
        t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        t.push_scope();
        let (_, dup, shadow) = t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        assert!(!dup);
        assert!(shadow);
    }

    #[test]
    fn allow_policy_suppresses_shadow_flag() {
        let mut t = SymbolTable::new(ShadowPolicy::Allow);
        t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        t.push_scope();
        let (_, _, shadow) = t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        assert!(!shadow);
    }

    #[test]
    fn lookup_sees_outer_scope_through_inner() {
        let mut t = SymbolTable::new(ShadowPolicy::Allow);
        t.insert("x", SymbolKind::Var, TypeId(0), Span::DUMMY);
        t.push_scope();
        assert!(t.lookup("x").is_some());
        t.pop_scope();
        assert!(t.lookup("x").is_some());
    }

    #[test]
    fn pop_scope_removes_inner_bindings() {
        let mut t = SymbolTable::new(ShadowPolicy::Allow);
        t.push_scope();
        t.insert("y", SymbolKind::Var, TypeId(0), Span::DUMMY);
        t.pop_scope();
        assert!(t.lookup("y").is_none());
    }
}
