//! The AST arena (C2).
//!
//! All parsed nodes live in contiguous, arena-owned vectors; every
//! cross-reference between nodes is a 32-bit index, never a pointer or a
//! `Box`. Child lists ("arg range", "body range", ...) are stored as
//! `(begin, count)` pairs into those same vectors — the parser appends a
//! node's children before appending the node itself, so a node's children
//! always occupy a contiguous run at the time the range is recorded. This
//! is the standard arena-parser trick (no teacher counterpart: the
//! teacher's own AST, `seq-compiler::ast`, is a plain recursive
//! `enum`/`Vec` tree without arena indices — spec.md §3 and §8 property 2
//! require the index-arena shape directly, confirmed by
//! `original_source/compiler/include/gaupel/ty/Type.hpp`'s
//! `TypeId = uint32_t; kInvalidType = 0xFFFF'FFFF` convention, which this
//! module generalizes to every node kind).

use crate::span::Span;
use crate::types::TypeId;

const INVALID: u32 = 0xFFFF_FFFF;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(INVALID);

            pub fn is_valid(self) -> bool {
                self.0 != INVALID
            }

            pub fn index(self) -> usize {
                debug_assert!(self.is_valid());
                self.0 as usize
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::INVALID
            }
        }
    };
}

arena_id!(ExprId);
arena_id!(StmtId);
arena_id!(ParamId);
arena_id!(ArgId);
arena_id!(NamedGroupArgId);
arena_id!(AttrId);
arena_id!(FieldMemberId);
arena_id!(SwitchCaseId);
arena_id!(TypeArgId);

macro_rules! arena_range {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name {
            pub begin: u32,
            pub count: u32,
        }

        impl $name {
            pub const EMPTY: $name = $name { begin: 0, count: 0 };

            pub fn new(begin: u32, count: u32) -> Self {
                $name { begin, count }
            }

            pub fn range(self) -> std::ops::Range<usize> {
                self.begin as usize..(self.begin + self.count) as usize
            }
        }
    };
}

arena_range!(StmtRange);
arena_range!(ArgRange);
arena_range!(ParamRange);
arena_range!(NamedGroupArgRange);
arena_range!(AttrRange);
arena_range!(SwitchCaseRange);
arena_range!(ExprRange);
arena_range!(TypeArgRange);
arena_range!(FieldMemberRange);

/// Operator token recorded on binary/unary/cast expressions, kept
/// uninterpreted text-adjacent so the type checker can do overload lookup
/// by token rather than re-lexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpToken {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Not,
    Amp,
    AmpMut,
    AmpAmp,
    PlusPlusPre,
    PlusPlusPost,
    Question,
    QuestionQuestion,
    As,
    AsOpt,
    AsBang,
    Assign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    Error,
    IntLiteral,
    FloatLiteral,
    BoolLiteral,
    CharLiteral,
    StringLiteral,
    NullLiteral,
    Ident,
    /// `children[0]` is the operand.
    Unary,
    /// `children[0]` = lhs, `children[1]` = rhs.
    Binary,
    /// Non-nesting ternary: `children[0]` = cond, `[1]` = then, `[2]` = else.
    Ternary,
    /// `children[0]` = callee; arguments live in `args`.
    Call,
    /// `children[0]` = base, `children[1]` = index (or range start for a
    /// slice-borrow operand).
    Index,
    /// `children[0]` = base; `literal_text` carries the field name.
    Field,
    /// `children[0]` = operand; `cast_to` is the syntactic target type.
    Cast,
    /// `children[0]` = operand (must be a place, or a slice index for
    /// `&&`); `unary_is_mut` set for `&mut`.
    Borrow,
    /// `children[0]` = operand (must be a place).
    Escape,
    /// `children[0]` = lhs (place), `children[1]` = rhs.
    Assign,
    /// `children[0]` = operand (must be a place).
    PostfixInc,
    /// `block_stmt` names the `Block` statement; `tail_expr` is the
    /// optional tail expression (`ExprId::INVALID` if absent).
    Block,
    /// `children[0]` = condition. `then_arm`/`else_arm` carry the
    /// expression-or-statement dispatch (spec.md §4.3).
    If,
    /// `loop_var` (empty string if none) + `children[0]` = iterator expr;
    /// `block_stmt` is the body statement.
    Loop,
    /// `children[0]` = optional value (`ExprId::INVALID` if bare `break;`).
    Break,
    Continue,
    /// `children[0]` = optional value.
    Return,
    /// `children[0]` = scrutinee; cases live in `switch_cases`.
    Switch,
    /// Elements live in `args` (reusing the arg pool for element exprs).
    ArrayLiteral,
    /// Transparent grouping, kept only for span fidelity.
    Paren,
}

/// Dispatch target for `if`'s arms, which the parser may produce as either
/// an expression or a statement depending on surrounding shape
/// (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOrStmt {
    None,
    Expr(ExprId),
    Stmt(StmtId),
}

impl Default for ExprOrStmt {
    fn default() -> Self {
        ExprOrStmt::None
    }
}

/// An expression node. Every expression carries the same fixed set of
/// slots; `kind` determines which are meaningful (documented per
/// `ExprKind` variant above) — uniform node size over deep inheritance,
/// matching the "tagged variant" design note in spec.md §9.
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    pub op_token: Option<OpToken>,
    pub children: [ExprId; 3],
    pub literal_text: Option<String>,
    pub args: ArgRange,
    pub cast_to: Option<TypeId>,
    pub block_stmt: StmtId,
    pub tail_expr: ExprId,
    pub unary_is_mut: bool,
    pub loop_var: Option<String>,
    pub then_arm: ExprOrStmt,
    pub else_arm: ExprOrStmt,
    pub switch_cases: SwitchCaseRange,
}

impl Expr {
    fn blank(kind: ExprKind, span: Span) -> Self {
        Expr {
            kind,
            span,
            op_token: None,
            children: [ExprId::INVALID; 3],
            literal_text: None,
            args: ArgRange::EMPTY,
            cast_to: None,
            block_stmt: StmtId::INVALID,
            tail_expr: ExprId::INVALID,
            unary_is_mut: false,
            loop_var: None,
            then_arm: ExprOrStmt::None,
            else_arm: ExprOrStmt::None,
            switch_cases: SwitchCaseRange::EMPTY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    Error,
    /// `let` / `set` variable declaration. `is_set` distinguishes the two
    /// surface forms; `is_mut` / `is_static` flag qualifiers; `init` is the
    /// initializer expression (required for `set`).
    VarDecl,
    /// A `{ ... }` block; its statements live in `body`.
    Block,
    /// A bare expression statement; the expression is `init`.
    ExprStmt,
    FnDecl,
    TypeDecl,
    ActsDecl,
    While,
    DoWhile,
    Return,
    Break,
    Continue,
    Empty,
}

/// Linkage / ABI annotations recognized on `fn` and global declarations
/// (spec.md §4.4 C ABI constraints).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abi {
    Default,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Linkage {
    Internal,
    Extern,
    Export,
}

/// Qualifiers on a function declaration (`pure`, `comptime`, plus
/// ABI/linkage already carried separately on `Stmt`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FnQualifiers {
    pub is_pure: bool,
    pub is_comptime: bool,
}

/// A statement node. Same "uniform slots, kind decides meaning" shape as
/// [`Expr`].
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub name: Option<String>,
    pub body: StmtRange,
    pub is_set: bool,
    pub is_mut: bool,
    pub is_static: bool,
    pub init: ExprId,
    pub linkage: Linkage,
    pub abi: Abi,
    pub fn_quals: FnQualifiers,
    pub declared_type: Option<TypeId>,
    pub ret_type: Option<TypeId>,
    pub params: ParamRange,
    pub named_group: NamedGroupArgRange,
    pub attrs: AttrRange,
    /// `type` declaration members. Shares the `FieldMember` pool rather
    /// than overloading `params`, since a type's fields and a function's
    /// parameters are distinct node kinds even though both are `name: T`.
    pub fields: FieldMemberRange,
}

impl Stmt {
    fn blank(kind: StmtKind, span: Span) -> Self {
        Stmt {
            kind,
            span,
            name: None,
            body: StmtRange::EMPTY,
            is_set: false,
            is_mut: false,
            is_static: false,
            init: ExprId::INVALID,
            linkage: Linkage::Internal,
            abi: Abi::Default,
            fn_quals: FnQualifiers::default(),
            declared_type: None,
            ret_type: None,
            params: ParamRange::EMPTY,
            named_group: NamedGroupArgRange::EMPTY,
            attrs: AttrRange::EMPTY,
            fields: FieldMemberRange::EMPTY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
}

/// A call-site argument: `value` alone for positional, `label` set once
/// the positional-then-labeled boundary has been crossed (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct Arg {
    pub label: Option<String>,
    pub value: ExprId,
    pub span: Span,
}

/// A named-group function parameter; `default` is only legal inside a
/// named group (spec.md §4.2, `FnParamDefaultNotAllowedOutsideNamedGroup`).
#[derive(Debug, Clone)]
pub struct NamedGroupArg {
    pub name: String,
    pub ty: TypeId,
    pub default: Option<ExprId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Attr {
    pub name: String,
    pub args: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FieldMember {
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Variant(String),
    VariantWithBindings { name: String, bindings: Vec<String> },
    Wildcard,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    pub pattern: Pattern,
    pub body: StmtRange,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct TypeArg {
    pub ty: TypeId,
    pub span: Span,
}

/// The arena. Owns every node kind in its own `Vec`; all cross-references
/// are the index newtypes above.
#[derive(Debug, Clone, Default)]
pub struct Arena {
    pub exprs: Vec<Expr>,
    pub stmts: Vec<Stmt>,
    pub params: Vec<Param>,
    pub args: Vec<Arg>,
    pub named_group_args: Vec<NamedGroupArg>,
    pub attrs: Vec<Attr>,
    pub field_members: Vec<FieldMember>,
    pub switch_cases: Vec<SwitchCase>,
    pub type_args: Vec<TypeArg>,
}

impl Arena {
    pub fn new() -> Self {
        Arena::default()
    }

    pub fn push_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }

    pub fn push_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        id
    }

    pub fn push_param(&mut self, p: Param) -> ParamId {
        let id = ParamId(self.params.len() as u32);
        self.params.push(p);
        id
    }

    pub fn push_arg(&mut self, a: Arg) -> ArgId {
        let id = ArgId(self.args.len() as u32);
        self.args.push(a);
        id
    }

    pub fn push_named_group_arg(&mut self, a: NamedGroupArg) -> NamedGroupArgId {
        let id = NamedGroupArgId(self.named_group_args.len() as u32);
        self.named_group_args.push(a);
        id
    }

    pub fn push_attr(&mut self, a: Attr) -> AttrId {
        let id = AttrId(self.attrs.len() as u32);
        self.attrs.push(a);
        id
    }

    pub fn push_field_member(&mut self, m: FieldMember) -> FieldMemberId {
        let id = FieldMemberId(self.field_members.len() as u32);
        self.field_members.push(m);
        id
    }

    pub fn push_switch_case(&mut self, c: SwitchCase) -> SwitchCaseId {
        let id = SwitchCaseId(self.switch_cases.len() as u32);
        self.switch_cases.push(c);
        id
    }

    pub fn push_type_arg(&mut self, t: TypeArg) -> TypeArgId {
        let id = TypeArgId(self.type_args.len() as u32);
        self.type_args.push(t);
        id
    }

    /// Records a `(begin, count)` range covering statements pushed since
    /// `begin`, checking the arena invariant (spec.md §8 property 2):
    /// `begin + count <= len(arena.stmts)`.
    pub fn stmt_range(&self, begin: u32) -> StmtRange {
        let count = self.stmts.len() as u32 - begin;
        let r = StmtRange::new(begin, count);
        debug_assert!((r.begin + r.count) as usize <= self.stmts.len());
        r
    }

    pub fn arg_range(&self, begin: u32) -> ArgRange {
        let count = self.args.len() as u32 - begin;
        ArgRange::new(begin, count)
    }

    pub fn param_range(&self, begin: u32) -> ParamRange {
        let count = self.params.len() as u32 - begin;
        ParamRange::new(begin, count)
    }

    pub fn named_group_range(&self, begin: u32) -> NamedGroupArgRange {
        let count = self.named_group_args.len() as u32 - begin;
        NamedGroupArgRange::new(begin, count)
    }

    pub fn attr_range(&self, begin: u32) -> AttrRange {
        let count = self.attrs.len() as u32 - begin;
        AttrRange::new(begin, count)
    }

    pub fn switch_case_range(&self, begin: u32) -> SwitchCaseRange {
        let count = self.switch_cases.len() as u32 - begin;
        SwitchCaseRange::new(begin, count)
    }

    pub fn field_member_range(&self, begin: u32) -> FieldMemberRange {
        let count = self.field_members.len() as u32 - begin;
        FieldMemberRange::new(begin, count)
    }

    pub fn field_members_in(&self, r: FieldMemberRange) -> &[FieldMember] {
        &self.field_members[r.range()]
    }

    pub fn stmts_in(&self, r: StmtRange) -> &[Stmt] {
        &self.stmts[r.range()]
    }

    pub fn args_in(&self, r: ArgRange) -> &[Arg] {
        &self.args[r.range()]
    }

    pub fn params_in(&self, r: ParamRange) -> &[Param] {
        &self.params[r.range()]
    }

    pub fn named_group_in(&self, r: NamedGroupArgRange) -> &[NamedGroupArg] {
        &self.named_group_args[r.range()]
    }

    pub fn switch_cases_in(&self, r: SwitchCaseRange) -> &[SwitchCase] {
        &self.switch_cases[r.range()]
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    // -- blank-node constructors used by the parser --

    pub fn new_expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.push_expr(Expr::blank(kind, span))
    }

    pub fn new_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.push_stmt(Stmt::blank(kind, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sentinel_is_all_ones() {
        assert_eq!(ExprId::INVALID.0, 0xFFFF_FFFF);
        assert!(!ExprId::INVALID.is_valid());
    }

    #[test]
    fn stmt_range_stays_in_bounds() {
        let mut arena = Arena::new();
        let begin = arena.stmts.len() as u32;
        arena.new_stmt(StmtKind::Empty, Span::DUMMY);
        arena.new_stmt(StmtKind::Empty, Span::DUMMY);
        let r = arena.stmt_range(begin);
        assert_eq!(r.count, 2);
        assert!((r.begin + r.count) as usize <= arena.stmts.len());
        assert_eq!(arena.stmts_in(r).len(), 2);
    }

    #[test]
    fn expr_children_default_invalid() {
        let mut arena = Arena::new();
        let id = arena.new_expr(ExprKind::Ident, Span::DUMMY);
        let e = arena.expr(id);
        assert!(e.children.iter().all(|c| !c.is_valid()));
        assert!(!e.tail_expr.is_valid());
    }

    #[test]
    fn arg_range_covers_pushed_args() {
        let mut arena = Arena::new();
        let begin = arena.args.len() as u32;
        let v1 = arena.new_expr(ExprKind::IntLiteral, Span::DUMMY);
        arena.push_arg(Arg {
            label: None,
            value: v1,
            span: Span::DUMMY,
        });
        let v2 = arena.new_expr(ExprKind::IntLiteral, Span::DUMMY);
        arena.push_arg(Arg {
            label: Some("x".to_string()),
            value: v2,
            span: Span::DUMMY,
        });
        let r = arena.arg_range(begin);
        let args = arena.args_in(r);
        assert_eq!(args.len(), 2);
        assert_eq!(args[1].label.as_deref(), Some("x"));
    }
}
