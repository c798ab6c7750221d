//! Orthogonal IR (C8): classical SSA over basic blocks with explicit
//! block parameters instead of phi nodes — callers pass arguments on
//! the branch that targets a block, the target's parameter list says
//! how many and of what type it expects.
//!
//! Grounded in `original_source/compiler/src/oir/oir_builder.cpp` for
//! the lowering shapes (`if`/`while`/`do-while`/`loop`, the SSA-vs-slot
//! local rule) and `original_source/frontend/include/.../OIR.hpp`-style
//! arena layout implied by `oir_builder.cpp`/`oir_verify.cpp`'s use of
//! `Module.values/insts/blocks/funcs/globals`.
//!
//! Two deviations from that C++ shape:
//! - `Inst` is a Rust enum (`InstData`) instead of a `std::variant`
//!   reached through `std::visit`; pattern matching replaces the
//!   `if constexpr` dispatch used throughout the C++ builder.
//! - There is no dedicated float/char constant instruction in this
//!   core's instruction set — float and char literals lower to
//!   `ConstInt` carrying their literal text verbatim, since no
//!   downstream pass other than `const_fold` reads that text, and
//!   `const_fold`'s integer parser simply won't match a `"3.14"` or
//!   char literal, leaving it untouched.

use crate::sir;
use crate::symtab::SymbolId;
use parus_core::{Span, TypeId};
use std::collections::HashMap;

macro_rules! oir_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const INVALID: $name = $name(u32::MAX);

            pub fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::INVALID
            }
        }
    };
}

oir_id!(ValueId);
oir_id!(InstId);
oir_id!(BlockId);
oir_id!(FuncId);
oir_id!(GlobalId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Pure,
    MayReadMem,
    MayWriteMem,
    MayTrap,
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    NullCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    As,
    AsQ,
    AsB,
}

/// A value's definition site: either an instruction result or one of a
/// block's parameters. A block parameter can share `Effect::Pure` with
/// any number of constant-producing instructions, so passes that need
/// to know "is this actually a constant instruction" (`const_fold`,
/// most directly) match on this instead of assuming every pure value
/// traces back to an `Inst`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueDef {
    Inst(InstId),
    BlockParam(BlockId, u32),
}

#[derive(Debug, Clone, Copy)]
pub struct Value {
    pub ty: TypeId,
    pub eff: Effect,
    pub def: ValueDef,
}

#[derive(Debug, Clone)]
pub enum InstData {
    ConstInt(String),
    ConstBool(bool),
    ConstText(String),
    ConstNull,
    AllocaLocal(TypeId),
    Unary { op: UnOp, src: ValueId },
    BinOp { op: BinOp, lhs: ValueId, rhs: ValueId },
    Cast { kind: CastKind, to: TypeId, src: ValueId },
    Load { slot: ValueId },
    Store { slot: ValueId, value: ValueId },
    Call { callee: ValueId, direct_callee: Option<FuncId>, args: Vec<ValueId> },
    Index { base: ValueId, index: ValueId },
    Field { base: ValueId, name: String },
    FuncRef(FuncId),
    GlobalRef(GlobalId),
}

#[derive(Debug, Clone)]
pub struct Inst {
    pub data: InstData,
    pub eff: Effect,
    pub result: Option<ValueId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Ret { value: Option<ValueId> },
    Br { target: BlockId, args: Vec<ValueId> },
    CondBr {
        cond: ValueId,
        then_bb: BlockId,
        then_args: Vec<ValueId>,
        else_bb: BlockId,
        else_args: Vec<ValueId>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub params: Vec<ValueId>,
    pub insts: Vec<InstId>,
    pub term: Option<Terminator>,
}

impl Block {
    pub fn has_term(&self) -> bool {
        self.term.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub ret_ty: TypeId,
    pub entry: BlockId,
    pub blocks: Vec<BlockId>,
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: TypeId,
    pub is_mut: bool,
}

/// Carried over from `sir::EscapeHandleMeta` so the verifier can still
/// reject `HeapBox` storage after SIR→OIR lowering erases everything
/// else about the escape. Reuses `sir::EscapeHandleKind` rather than a
/// second copy of the same four variants.
#[derive(Debug, Clone)]
pub struct EscapeHint {
    pub value: ValueId,
    pub kind: sir::EscapeHandleKind,
}

#[derive(Default)]
pub struct Module {
    pub values: Vec<Value>,
    pub insts: Vec<Inst>,
    pub blocks: Vec<Block>,
    pub funcs: Vec<Function>,
    pub globals: Vec<Global>,
    pub escape_hints: Vec<EscapeHint>,
}

impl Module {
    pub fn add_value(&mut self, v: Value) -> ValueId {
        self.values.push(v);
        ValueId((self.values.len() - 1) as u32)
    }

    pub fn add_inst(&mut self, i: Inst) -> InstId {
        self.insts.push(i);
        InstId((self.insts.len() - 1) as u32)
    }

    pub fn add_block(&mut self, b: Block) -> BlockId {
        self.blocks.push(b);
        BlockId((self.blocks.len() - 1) as u32)
    }

    pub fn add_func(&mut self, f: Function) -> FuncId {
        self.funcs.push(f);
        FuncId((self.funcs.len() - 1) as u32)
    }

    pub fn add_global(&mut self, g: Global) -> GlobalId {
        self.globals.push(g);
        GlobalId((self.globals.len() - 1) as u32)
    }
}

// ---------------------------------------------------------------------
// SIR -> OIR builder
// ---------------------------------------------------------------------

#[derive(Clone, Copy)]
struct Binding {
    is_slot: bool,
    v: ValueId,
}

#[derive(Clone, Copy)]
struct LoopCtx {
    continue_target: BlockId,
    exit_bb: BlockId,
    exit_param: Option<ValueId>,
}

pub fn build(sir: &sir::Module) -> Module {
    let mut module = Module::default();
    let mut value_map = HashMap::new();

    for g in &sir.globals {
        module.add_global(Global {
            name: g.name.clone(),
            ty: g.declared_type,
            is_mut: g.is_mut,
        });
    }

    for f in &sir.funcs {
        let entry = module.add_block(Block::default());
        let func = Function {
            name: f.name.clone(),
            ret_ty: f.ret,
            entry,
            blocks: vec![entry],
        };
        let fid = module.add_func(func);

        let mut fb = FuncBuild {
            module: &mut module,
            sir,
            fid,
            cur_bb: entry,
            env: HashMap::new(),
            env_stack: Vec::new(),
            loops: Vec::new(),
            value_map: &mut value_map,
        };
        fb.push_scope();
        fb.bind_params(f);
        fb.lower_block(f.entry);
        fb.pop_scope();

        if !fb.cur_block().has_term() {
            let rv = fb.emit_const_null(f.ret);
            fb.ret(Some(rv));
        }
    }

    for h in &sir.escape_handles {
        if let Some(&vid) = value_map.get(&h.escape_value) {
            module.escape_hints.push(EscapeHint { value: vid, kind: h.kind });
        }
    }

    module
}

struct FuncBuild<'a> {
    module: &'a mut Module,
    sir: &'a sir::Module,
    fid: FuncId,
    cur_bb: BlockId,

    env: HashMap<SymbolId, Binding>,
    env_stack: Vec<Vec<(SymbolId, Binding)>>,
    loops: Vec<LoopCtx>,

    value_map: &'a mut HashMap<sir::ValueId, ValueId>,
}

impl<'a> FuncBuild<'a> {
    fn cur_block(&self) -> &Block {
        &self.module.blocks[self.cur_bb.0 as usize]
    }

    /// Binds each positional parameter as a parameter of the entry
    /// block, the same mechanism a `br` uses to pass a value into any
    /// other block — a function's incoming arguments are just the
    /// entry block's parameters. Named-group parameters carry no
    /// resolved symbol (see `sir::Lowerer::lower_fn_decl`) and are
    /// skipped; nothing in a function body can reference them by name
    /// at the SIR level yet.
    fn bind_params(&mut self, f: &sir::Func) {
        let begin = f.param_begin as usize;
        let end = begin + f.param_count as usize;
        for p in self.sir.params[begin..end].to_vec() {
            let Some(sym) = p.sym else { continue };
            let pv = self.add_block_param(self.cur_bb, p.ty);
            self.bind(sym, Binding { is_slot: false, v: pv });
        }
    }

    fn push_scope(&mut self) {
        self.env_stack.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        let Some(undo) = self.env_stack.pop() else { return };
        for (sym, binding) in undo.into_iter().rev() {
            self.env.insert(sym, binding);
        }
    }

    fn bind(&mut self, sym: SymbolId, b: Binding) {
        if let Some(scope) = self.env_stack.last_mut() {
            let prev = self.env.get(&sym).copied();
            scope.push((sym, prev.unwrap_or(Binding { is_slot: false, v: ValueId::INVALID })));
        }
        self.env.insert(sym, b);
    }

    fn make_value(&mut self, ty: TypeId, eff: Effect, def: ValueDef) -> ValueId {
        self.module.add_value(Value { ty, eff, def })
    }

    fn new_block(&mut self) -> BlockId {
        self.module.add_block(Block::default())
    }

    fn add_block_param(&mut self, bb: BlockId, ty: TypeId) -> ValueId {
        let idx = self.module.blocks[bb.0 as usize].params.len() as u32;
        let vid = self.make_value(ty, Effect::Pure, ValueDef::BlockParam(bb, idx));
        self.module.blocks[bb.0 as usize].params.push(vid);
        vid
    }

    fn emit_inst(&mut self, data: InstData, eff: Effect, ty: TypeId, span: Span) -> ValueId {
        let inst = Inst { data, eff, result: None, span };
        let iid = self.module.add_inst(inst);
        let result = self.make_value(ty, eff, ValueDef::Inst(iid));
        self.module.insts[iid.0 as usize].result = Some(result);
        self.module.blocks[self.cur_bb.0 as usize].insts.push(iid);
        result
    }

    fn emit_inst_no_result(&mut self, data: InstData, eff: Effect, span: Span) {
        let inst = Inst { data, eff, result: None, span };
        let iid = self.module.add_inst(inst);
        self.module.blocks[self.cur_bb.0 as usize].insts.push(iid);
    }

    fn emit_const_int(&mut self, ty: TypeId, text: String, span: Span) -> ValueId {
        self.emit_inst(InstData::ConstInt(text), Effect::Pure, ty, span)
    }

    fn emit_const_bool(&mut self, ty: TypeId, v: bool, span: Span) -> ValueId {
        self.emit_inst(InstData::ConstBool(v), Effect::Pure, ty, span)
    }

    fn emit_const_text(&mut self, ty: TypeId, text: String, span: Span) -> ValueId {
        self.emit_inst(InstData::ConstText(text), Effect::Pure, ty, span)
    }

    fn emit_const_null(&mut self, ty: TypeId) -> ValueId {
        self.emit_inst(InstData::ConstNull, Effect::Pure, ty, Span::DUMMY)
    }

    fn emit_alloca(&mut self, slot_ty: TypeId, span: Span) -> ValueId {
        self.emit_inst(InstData::AllocaLocal(slot_ty), Effect::MayWriteMem, slot_ty, span)
    }

    fn emit_load(&mut self, ty: TypeId, slot: ValueId, span: Span) -> ValueId {
        self.emit_inst(InstData::Load { slot }, Effect::MayReadMem, ty, span)
    }

    fn emit_store(&mut self, slot: ValueId, value: ValueId, span: Span) {
        self.emit_inst_no_result(InstData::Store { slot, value }, Effect::MayWriteMem, span);
    }

    fn emit_binop(&mut self, ty: TypeId, eff: Effect, op: BinOp, lhs: ValueId, rhs: ValueId, span: Span) -> ValueId {
        self.emit_inst(InstData::BinOp { op, lhs, rhs }, eff, ty, span)
    }

    fn emit_unary(&mut self, ty: TypeId, op: UnOp, src: ValueId, span: Span) -> ValueId {
        self.emit_inst(InstData::Unary { op, src }, Effect::Pure, ty, span)
    }

    fn emit_cast(&mut self, ty: TypeId, eff: Effect, kind: CastKind, to: TypeId, src: ValueId, span: Span) -> ValueId {
        self.emit_inst(InstData::Cast { kind, to, src }, eff, ty, span)
    }

    fn set_term(&mut self, t: Terminator) {
        self.module.blocks[self.cur_bb.0 as usize].term = Some(t);
    }

    fn has_term(&self) -> bool {
        self.cur_block().has_term()
    }

    fn br(&mut self, target: BlockId, args: Vec<ValueId>) {
        self.set_term(Terminator::Br { target, args });
    }

    fn condbr(&mut self, cond: ValueId, then_bb: BlockId, then_args: Vec<ValueId>, else_bb: BlockId, else_args: Vec<ValueId>) {
        self.set_term(Terminator::CondBr { cond, then_bb, then_args, else_bb, else_args });
    }

    fn ret(&mut self, value: Option<ValueId>) {
        self.set_term(Terminator::Ret { value });
    }

    fn enter_block(&mut self, bb: BlockId) {
        self.module.funcs[self.fid.0 as usize].blocks.push(bb);
        self.cur_bb = bb;
    }

    fn read_local(&mut self, sym: SymbolId, want_ty: TypeId, span: Span) -> ValueId {
        match self.env.get(&sym).copied() {
            None => self.emit_const_null(want_ty),
            Some(b) if !b.is_slot => b.v,
            Some(b) => self.emit_load(want_ty, b.v, span),
        }
    }

    fn ensure_slot(&mut self, sym: SymbolId, slot_ty: TypeId, span: Span) -> ValueId {
        if let Some(b) = self.env.get(&sym).copied() {
            if b.is_slot {
                return b.v;
            }
            let slot = self.emit_alloca(slot_ty, span);
            if b.v.is_valid() {
                self.emit_store(slot, b.v, span);
            }
            self.bind(sym, Binding { is_slot: true, v: slot });
            return slot;
        }
        let slot = self.emit_alloca(slot_ty, span);
        self.bind(sym, Binding { is_slot: true, v: slot });
        slot
    }

    fn record(&mut self, sir_vid: sir::ValueId, oir_vid: ValueId) -> ValueId {
        self.value_map.insert(sir_vid, oir_vid);
        oir_vid
    }

    // -------------------------------------------------------------
    // SIR -> OIR expression lowering
    // -------------------------------------------------------------

    fn lower_value(&mut self, vid: sir::ValueId) -> ValueId {
        if !vid.is_valid() {
            return ValueId::INVALID;
        }
        let v = self.sir.values[vid.0 as usize].clone();

        let out = match v.kind {
            sir::ValueKind::IntLit | sir::ValueKind::FloatLit | sir::ValueKind::CharLit => {
                self.emit_const_int(v.ty, v.text.clone().unwrap_or_default(), v.span)
            }
            sir::ValueKind::BoolLit => {
                let b = v.text.as_deref() == Some("true");
                self.emit_const_bool(v.ty, b, v.span)
            }
            sir::ValueKind::StringLit => self.emit_const_text(v.ty, v.text.clone().unwrap_or_default(), v.span),
            sir::ValueKind::NullLit => self.emit_const_null(v.ty),

            sir::ValueKind::Local | sir::ValueKind::Global => {
                let Some(sym) = v.sym else { return self.emit_const_null(v.ty) };
                self.read_local(sym, v.ty, v.span)
            }

            sir::ValueKind::Unary => {
                let src = self.lower_value(v.a);
                match unop_from(v.op) {
                    Some(op) => self.emit_unary(v.ty, op, src, v.span),
                    None => src,
                }
            }

            sir::ValueKind::Binary => {
                let lhs = self.lower_value(v.a);
                let rhs = self.lower_value(v.b);
                match binop_from(v.op) {
                    Some(op) => self.emit_binop(v.ty, Effect::Pure, op, lhs, rhs, v.span),
                    None => lhs,
                }
            }

            sir::ValueKind::Cast => {
                let src = self.lower_value(v.a);
                let (kind, eff) = cast_from(v.op);
                self.emit_cast(v.ty, eff, kind, v.cast_to, src, v.span)
            }

            sir::ValueKind::PostfixInc => {
                // Load, add/sub one, store, yield the pre-increment value
                // (postfix semantics) — there is no dedicated increment
                // instruction, so this expands to the load/binop/store
                // triple a backend would otherwise fuse.
                let Some(sym) = self.sir_root_symbol(v.a) else { return self.lower_value(v.a) };
                let slot = self.ensure_slot(sym, v.ty, v.span);
                let old = self.emit_load(v.ty, slot, v.span);
                let one = self.emit_const_int(v.ty, "1".to_string(), v.span);
                let updated = self.emit_binop(v.ty, Effect::Pure, BinOp::Add, old, one, v.span);
                self.emit_store(slot, updated, v.span);
                old
            }

            sir::ValueKind::Assign => {
                let place = self.sir.values[v.a.0 as usize].clone();
                let rhs = self.lower_value(v.b);
                if place.kind == sir::ValueKind::Local {
                    if let Some(sym) = place.sym {
                        let slot_ty = if place.place_elem_type.0 != 0 { place.place_elem_type } else { place.ty };
                        let slot = self.ensure_slot(sym, slot_ty, v.span);
                        self.emit_store(slot, rhs, v.span);
                    }
                }
                rhs
            }

            sir::ValueKind::BlockExpr => self.lower_block_expr(&v),
            sir::ValueKind::IfExpr => self.lower_if_expr(&v),
            sir::ValueKind::LoopExpr => self.lower_loop_expr(&v),

            // A borrow/escape value's OIR representation is the address
            // of its place — the same slot `ensure_slot` would hand a
            // write. Non-local places (index/field chains) have no
            // dedicated address-of instruction in this core (codegen,
            // which would need one, is out of scope), so they fall back
            // to lowering the underlying value directly.
            sir::ValueKind::Borrow | sir::ValueKind::Escape => {
                match self.sir_root_symbol(v.a) {
                    Some(sym) => self.ensure_slot(sym, v.place_elem_type, v.span),
                    None => self.lower_value(v.a),
                }
            }

            sir::ValueKind::Index => {
                let base = self.lower_value(v.a);
                let index = self.lower_value(v.b);
                self.emit_inst(InstData::Index { base, index }, Effect::MayReadMem, v.ty, v.span)
            }

            sir::ValueKind::Field => {
                let base = self.lower_value(v.a);
                let name = v.text.clone().unwrap_or_default();
                self.emit_inst(InstData::Field { base, name }, Effect::MayReadMem, v.ty, v.span)
            }

            sir::ValueKind::Call => {
                let callee = self.lower_value(v.a);
                let direct_callee = v.callee_decl.and_then(|decl| self.func_for_decl(decl));
                let args: Vec<ValueId> = self.sir.args[v.args.range()]
                    .to_vec()
                    .iter()
                    .map(|a| self.lower_value(a.value))
                    .collect();
                self.emit_inst(InstData::Call { callee, direct_callee, args }, Effect::Call, v.ty, v.span)
            }

            // No dedicated array-constructor instruction exists in this
            // core's OIR (array materialization is a codegen concern) —
            // elements are still lowered for their side effects.
            sir::ValueKind::ArrayLit => {
                for a in self.sir.args[v.args.range()].to_vec() {
                    self.lower_value(a.value);
                }
                self.emit_const_null(v.ty)
            }

            sir::ValueKind::Error => self.emit_const_null(v.ty),
        };

        self.record(vid, out)
    }

    fn func_for_decl(&self, decl: sir::StmtId) -> Option<FuncId> {
        self.sir
            .funcs
            .iter()
            .position(|f| f.origin_stmt == decl)
            .map(|i| FuncId(i as u32))
    }

    fn sir_root_symbol(&self, vid: sir::ValueId) -> Option<SymbolId> {
        if !vid.is_valid() {
            return None;
        }
        let v = &self.sir.values[vid.0 as usize];
        if let Some(sym) = v.origin_sym.or(v.sym) {
            return Some(sym);
        }
        if v.kind == sir::ValueKind::Index || v.kind == sir::ValueKind::Field {
            return self.sir_root_symbol(v.a);
        }
        None
    }

    fn lower_block_expr(&mut self, v: &sir::Value) -> ValueId {
        self.push_scope();
        self.lower_block(v.block);
        let out = if v.tail.is_valid() { self.lower_value(v.tail) } else { self.emit_const_null(v.ty) };
        self.pop_scope();
        out
    }

    fn lower_if_expr(&mut self, v: &sir::Value) -> ValueId {
        let cond = self.lower_value(v.a);

        let then_bb = self.new_block();
        let else_bb = self.new_block();
        let join_bb = self.new_block();
        let join_param = self.add_block_param(join_bb, v.ty);

        self.condbr(cond, then_bb, vec![], else_bb, vec![]);

        self.enter_block(then_bb);
        self.push_scope();
        let then_val = self.lower_value(v.b);
        self.pop_scope();
        if !self.has_term() {
            self.br(join_bb, vec![then_val]);
        }

        self.enter_block(else_bb);
        self.push_scope();
        let else_val = self.lower_value(v.c);
        self.pop_scope();
        if !self.has_term() {
            self.br(join_bb, vec![else_val]);
        }

        self.enter_block(join_bb);
        join_param
    }

    /// `loop (v in iter)` has no iterator protocol in this core, so it
    /// lowers to an unconditional back-edge body that
    /// only `break` can exit — the same shape `while true { ... }` would
    /// produce, with `join_bb` carrying the loop's result value.
    fn lower_loop_expr(&mut self, v: &sir::Value) -> ValueId {
        if v.iter.is_valid() {
            self.lower_value(v.iter);
        }

        let body_bb = self.new_block();
        let join_bb = self.new_block();
        let join_param = self.add_block_param(join_bb, v.ty);

        if !self.has_term() {
            self.br(body_bb, vec![]);
        }

        self.enter_block(body_bb);
        self.loops.push(LoopCtx { continue_target: body_bb, exit_bb: join_bb, exit_param: Some(join_param) });
        self.push_scope();
        self.lower_block(v.block);
        self.pop_scope();
        self.loops.pop();
        if !self.has_term() {
            self.br(body_bb, vec![]);
        }

        self.enter_block(join_bb);
        join_param
    }

    // -------------------------------------------------------------
    // SIR -> OIR statement/block lowering
    // -------------------------------------------------------------

    fn lower_block(&mut self, bid: sir::BlockId) {
        if !bid.is_valid() {
            return;
        }
        let range = self.sir.blocks[bid.0 as usize].range();
        for i in range {
            if self.has_term() {
                break;
            }
            self.lower_stmt(i);
        }
    }

    fn lower_stmt(&mut self, stmt_index: usize) {
        let s = self.sir.stmts[stmt_index].clone();
        match s.kind {
            sir::StmtSirKind::VarDecl => {
                let init = if s.init.is_valid() { self.lower_value(s.init) } else { self.emit_const_null(s.declared_type) };
                let Some(sym) = s.sym else { return };
                if s.is_set || s.is_mut {
                    let slot = self.emit_alloca(s.declared_type, s.span);
                    self.emit_store(slot, init, s.span);
                    self.bind(sym, Binding { is_slot: true, v: slot });
                } else {
                    self.bind(sym, Binding { is_slot: false, v: init });
                }
            }

            sir::StmtSirKind::ExprStmt => {
                if s.expr.is_valid() {
                    self.lower_value(s.expr);
                }
            }

            sir::StmtSirKind::Return => {
                if s.expr.is_valid() {
                    let rv = self.lower_value(s.expr);
                    self.ret(Some(rv));
                } else {
                    self.ret(None);
                }
            }

            sir::StmtSirKind::Break => {
                let Some(ctx) = self.loops.last().copied() else { return };
                let args = match ctx.exit_param {
                    Some(_) if s.expr.is_valid() => vec![self.lower_value(s.expr)],
                    Some(param) => vec![param],
                    None => vec![],
                };
                self.br(ctx.exit_bb, args);
            }

            sir::StmtSirKind::Continue => {
                let Some(ctx) = self.loops.last().copied() else { return };
                self.br(ctx.continue_target, vec![]);
            }

            sir::StmtSirKind::WhileStmt => {
                let cond_bb = self.new_block();
                let body_bb = self.new_block();
                let exit_bb = self.new_block();

                if !self.has_term() {
                    self.br(cond_bb, vec![]);
                }

                self.enter_block(cond_bb);
                let cond = self.lower_value(s.expr);
                self.condbr(cond, body_bb, vec![], exit_bb, vec![]);

                self.enter_block(body_bb);
                self.loops.push(LoopCtx { continue_target: cond_bb, exit_bb, exit_param: None });
                self.push_scope();
                self.lower_block(s.a);
                self.pop_scope();
                self.loops.pop();
                if !self.has_term() {
                    self.br(cond_bb, vec![]);
                }

                self.enter_block(exit_bb);
            }

            sir::StmtSirKind::DoWhileStmt => {
                let body_bb = self.new_block();
                let cond_bb = self.new_block();
                let exit_bb = self.new_block();

                if !self.has_term() {
                    self.br(body_bb, vec![]);
                }

                self.enter_block(body_bb);
                self.loops.push(LoopCtx { continue_target: cond_bb, exit_bb, exit_param: None });
                self.push_scope();
                self.lower_block(s.a);
                self.pop_scope();
                self.loops.pop();
                if !self.has_term() {
                    self.br(cond_bb, vec![]);
                }

                self.enter_block(cond_bb);
                let cond = self.lower_value(s.expr);
                self.condbr(cond, body_bb, vec![], exit_bb, vec![]);

                self.enter_block(exit_bb);
            }

            // Never produced by the SIR lowerer (see sir.rs); kept so
            // this match stays exhaustive against `StmtSirKind`.
            sir::StmtSirKind::IfStmt | sir::StmtSirKind::Switch | sir::StmtSirKind::Error => {}
        }
    }
}

fn unop_from(op: Option<parus_core::ast::OpToken>) -> Option<UnOp> {
    use parus_core::ast::OpToken;
    match op? {
        OpToken::Minus => Some(UnOp::Neg),
        OpToken::Plus => Some(UnOp::Plus),
        OpToken::Not => Some(UnOp::Not),
        _ => None,
    }
}

fn binop_from(op: Option<parus_core::ast::OpToken>) -> Option<BinOp> {
    use parus_core::ast::OpToken;
    match op? {
        OpToken::Plus => Some(BinOp::Add),
        OpToken::Minus => Some(BinOp::Sub),
        OpToken::Star => Some(BinOp::Mul),
        OpToken::Slash => Some(BinOp::Div),
        OpToken::Percent => Some(BinOp::Rem),
        OpToken::Lt => Some(BinOp::Lt),
        OpToken::LtEq => Some(BinOp::Le),
        OpToken::Gt => Some(BinOp::Gt),
        OpToken::GtEq => Some(BinOp::Ge),
        OpToken::EqEq => Some(BinOp::Eq),
        OpToken::NotEq => Some(BinOp::Ne),
        OpToken::AndAnd => Some(BinOp::And),
        OpToken::OrOr => Some(BinOp::Or),
        OpToken::QuestionQuestion => Some(BinOp::NullCoalesce),
        _ => None,
    }
}

fn cast_from(op: Option<parus_core::ast::OpToken>) -> (CastKind, Effect) {
    use parus_core::ast::OpToken;
    match op {
        Some(OpToken::AsOpt) => (CastKind::AsQ, Effect::Pure),
        Some(OpToken::AsBang) => (CastKind::AsB, Effect::MayTrap),
        _ => (CastKind::As, Effect::Pure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::resolver::resolve;
    use crate::sir::{analyze_capabilities, lower as lower_sir};
    use crate::symtab::ShadowPolicy;
    use crate::typecheck::check;
    use crate::DiagnosticBag;
    use parus_core::ast::Arena;
    use parus_core::TypePool;

    fn build_from(src: &str) -> Module {
        let mut arena = Arena::new();
        let mut types = TypePool::new();
        let mut diags = DiagnosticBag::new();
        let range = parse(src, &mut arena, &mut types, &mut diags);
        let (resolved, table) = resolve(&arena, range, ShadowPolicy::Warn, &mut diags);
        let tyck = check(&arena, range, &mut types, &mut diags, &resolved, &table);
        let mut sir_module = lower_sir(&arena, range, &tyck, &resolved);
        analyze_capabilities(&mut sir_module, &types, &mut diags);
        build(&sir_module)
    }

    #[test]
    fn straight_line_function_has_one_block_and_a_ret_terminator() {
        let m = build_from("fn f(x: i32) -> i32 { return x; }");
        assert_eq!(m.funcs.len(), 1);
        let entry = m.funcs[0].entry;
        assert!(m.blocks[entry.0 as usize].has_term());
        assert!(matches!(m.blocks[entry.0 as usize].term, Some(Terminator::Ret { .. })));
    }

    #[test]
    fn if_expr_lowers_to_three_extra_blocks_with_a_join_parameter() {
        let m = build_from("fn f(x: bool) -> i32 { return x ? 1 : 2; }");
        let entry = m.funcs[0].entry;
        // The entry block also carries a param (the `x` argument), so
        // exclude it to isolate the ternary's own join block.
        let joins: Vec<&Block> = m
            .blocks
            .iter()
            .enumerate()
            .filter(|(i, b)| *i as u32 != entry.0 && !b.params.is_empty())
            .map(|(_, b)| b)
            .collect();
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0].params.len(), 1);
    }

    #[test]
    fn mutable_let_becomes_a_slot_with_a_store() {
        let m = build_from("fn f() -> void { let mut x: i32 = 0; set x = 1; }");
        let has_alloca = m.insts.iter().any(|i| matches!(i.data, InstData::AllocaLocal(_)));
        let store_count = m.insts.iter().filter(|i| matches!(i.data, InstData::Store { .. })).count();
        assert!(has_alloca);
        assert_eq!(store_count, 2);
    }

    #[test]
    fn while_loop_has_cond_body_and_exit_blocks() {
        let m = build_from("fn f(x: bool) -> void { while (x) { } }");
        assert!(m.funcs[0].blocks.len() >= 4);
    }
}
