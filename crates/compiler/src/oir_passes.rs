//! Fixed OIR optimization pipeline: `simplify_cfg`, `const_fold`,
//! `local_load_forward`, `dce_pure_insts`, `simplify_cfg` again. Every
//! rewrite goes through one value-substitution table so that folding a
//! value also rewrites every branch argument that referenced it —
//! that shared table is what makes running the pipeline twice converge
//! to a fixed point instead of drifting.
//!
//! Grounded in `original_source/compiler/src/oir/oir_passes.cpp`.

use crate::oir::{BinOp, Block, BlockId, InstData, Module, Terminator, UnOp, ValueDef, ValueId};
use std::collections::{HashMap, HashSet};

pub fn run_passes(module: &mut Module) {
    simplify_cfg(module);
    const_fold(module);
    local_load_forward(module);
    dce_pure_insts(module);
    simplify_cfg(module);
}

// ---------------------------------------------------------------------
// Value substitution
// ---------------------------------------------------------------------

#[derive(Default)]
struct Subst {
    map: HashMap<ValueId, ValueId>,
}

impl Subst {
    fn set(&mut self, from: ValueId, to: ValueId) {
        self.map.insert(from, to);
    }

    /// Follows the substitution chain up to 64 hops, matching the
    /// bound used to resolve aliases downstream of `const_fold` and
    /// `local_load_forward` without risking a cycle hanging the pass.
    fn resolve(&self, mut v: ValueId) -> ValueId {
        for _ in 0..64 {
            match self.map.get(&v) {
                Some(&next) if next != v => v = next,
                _ => return v,
            }
        }
        v
    }
}

fn rewrite_operands(module: &mut Module, subst: &Subst) {
    for inst in module.insts.iter_mut() {
        match &mut inst.data {
            InstData::Unary { src, .. } => *src = subst.resolve(*src),
            InstData::BinOp { lhs, rhs, .. } => {
                *lhs = subst.resolve(*lhs);
                *rhs = subst.resolve(*rhs);
            }
            InstData::Cast { src, .. } => *src = subst.resolve(*src),
            InstData::Load { slot } => *slot = subst.resolve(*slot),
            InstData::Store { slot, value } => {
                *slot = subst.resolve(*slot);
                *value = subst.resolve(*value);
            }
            InstData::Call { callee, args, .. } => {
                *callee = subst.resolve(*callee);
                for a in args.iter_mut() {
                    *a = subst.resolve(*a);
                }
            }
            InstData::Index { base, index } => {
                *base = subst.resolve(*base);
                *index = subst.resolve(*index);
            }
            InstData::Field { base, .. } => *base = subst.resolve(*base),
            InstData::ConstInt(_)
            | InstData::ConstBool(_)
            | InstData::ConstText(_)
            | InstData::ConstNull
            | InstData::AllocaLocal(_)
            | InstData::FuncRef(_)
            | InstData::GlobalRef(_) => {}
        }
    }

    for block in module.blocks.iter_mut() {
        match &mut block.term {
            Some(Terminator::Ret { value: Some(v) }) => *v = subst.resolve(*v),
            Some(Terminator::Br { args, .. }) => {
                for a in args.iter_mut() {
                    *a = subst.resolve(*a);
                }
            }
            Some(Terminator::CondBr { cond, then_args, else_args, .. }) => {
                *cond = subst.resolve(*cond);
                for a in then_args.iter_mut().chain(else_args.iter_mut()) {
                    *a = subst.resolve(*a);
                }
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------
// simplify_cfg: condbr-same-target + unreachable block removal
// ---------------------------------------------------------------------

fn simplify_cfg(module: &mut Module) {
    simplify_condbr_same_target(module);
    remove_unreachable_blocks(module);
}

fn simplify_condbr_same_target(module: &mut Module) {
    for block in module.blocks.iter_mut() {
        let Some(Terminator::CondBr { then_bb, then_args, else_bb, else_args, .. }) = &block.term else { continue };
        if then_bb == else_bb && then_args == else_args {
            block.term = Some(Terminator::Br { target: *then_bb, args: then_args.clone() });
        }
    }
}

fn successors(term: &Terminator) -> Vec<BlockId> {
    match term {
        Terminator::Ret { .. } => vec![],
        Terminator::Br { target, .. } => vec![*target],
        Terminator::CondBr { then_bb, else_bb, .. } => vec![*then_bb, *else_bb],
    }
}

fn remove_unreachable_blocks(module: &mut Module) {
    for fid in 0..module.funcs.len() {
        let entry = module.funcs[fid].entry;
        let mut reachable = HashSet::new();
        let mut stack = vec![entry];
        while let Some(bb) = stack.pop() {
            if !reachable.insert(bb) {
                continue;
            }
            if let Some(term) = module.blocks[bb.0 as usize].term.clone() {
                for s in successors(&term) {
                    stack.push(s);
                }
            }
        }
        module.funcs[fid].blocks.retain(|b| reachable.contains(b));
    }
}

// ---------------------------------------------------------------------
// const_fold
// ---------------------------------------------------------------------

fn parse_int_lit(text: &str) -> Option<i128> {
    let t = text.trim();
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i128::from_str_radix(hex, 16).ok();
    }
    t.parse::<i128>().ok()
}

fn defining_inst(module: &Module, v: ValueId) -> Option<&InstData> {
    let val = module.values.get(v.0 as usize)?;
    match val.def {
        ValueDef::Inst(iid) => module.insts.get(iid.0 as usize).map(|i| &i.data),
        ValueDef::BlockParam(..) => None,
    }
}

fn as_const_int(module: &Module, v: ValueId) -> Option<i128> {
    match defining_inst(module, v)? {
        InstData::ConstInt(text) => parse_int_lit(text),
        _ => None,
    }
}

fn as_const_bool(module: &Module, v: ValueId) -> Option<bool> {
    match defining_inst(module, v)? {
        InstData::ConstBool(b) => Some(*b),
        _ => None,
    }
}

fn is_const_null(module: &Module, v: ValueId) -> bool {
    matches!(defining_inst(module, v), Some(InstData::ConstNull))
}

enum FoldCandidate {
    Unary(UnOp, ValueId),
    Bin(BinOp, ValueId, ValueId),
}

fn const_fold(module: &mut Module) {
    let mut subst = Subst::default();

    for idx in 0..module.insts.len() {
        let result = module.insts[idx].result;
        let candidate = match &module.insts[idx].data {
            InstData::Unary { op, src } => Some(FoldCandidate::Unary(*op, *src)),
            InstData::BinOp { op, lhs, rhs } => Some(FoldCandidate::Bin(*op, *lhs, *rhs)),
            _ => None,
        };

        let replacement = match candidate {
            Some(FoldCandidate::Unary(op, src)) => {
                let Some(n) = as_const_int(module, src) else { continue };
                let folded = match op {
                    UnOp::Neg => -n,
                    UnOp::Plus => n,
                    UnOp::Not => continue,
                };
                fold_int(module, result, folded)
            }
            Some(FoldCandidate::Bin(op, lhs, rhs)) => fold_binop(module, op, lhs, rhs, result),
            None => continue,
        };

        if let (Some(old), Some(new)) = (result, replacement) {
            subst.set(old, new);
        }
    }

    rewrite_operands(module, &subst);
}

fn add_const_inst(module: &mut Module, ty: parus_core::TypeId, data: InstData) -> ValueId {
    let inst = crate::oir::Inst { data, eff: crate::oir::Effect::Pure, result: None, span: parus_core::Span::DUMMY };
    let iid = module.add_inst(inst);
    let vid = module.add_value(crate::oir::Value { ty, eff: crate::oir::Effect::Pure, def: ValueDef::Inst(iid) });
    module.insts[iid.0 as usize].result = Some(vid);
    vid
}

fn fold_int(module: &mut Module, result: Option<ValueId>, n: i128) -> Option<ValueId> {
    let ty = result.and_then(|r| module.values.get(r.0 as usize)).map(|v| v.ty)?;
    Some(add_const_inst(module, ty, InstData::ConstInt(n.to_string())))
}

fn fold_bool(module: &mut Module, result: Option<ValueId>, b: bool) -> Option<ValueId> {
    let ty = result.and_then(|r| module.values.get(r.0 as usize)).map(|v| v.ty)?;
    Some(add_const_inst(module, ty, InstData::ConstBool(b)))
}

fn fold_binop(module: &mut Module, op: BinOp, lhs: ValueId, rhs: ValueId, result: Option<ValueId>) -> Option<ValueId> {
    // `??` folds from either side on a literal null without requiring
    // both operands to be constant — the one non-null branch wins
    // outright.
    if op == BinOp::NullCoalesce {
        if is_const_null(module, lhs) {
            return Some(rhs);
        }
        if !is_const_null(module, lhs) {
            // lhs is known non-null (any other constant, or simply
            // provably not the null sentinel) only when it is itself a
            // constant; otherwise leave the coalesce for a later pass.
            if as_const_int(module, lhs).is_some() || as_const_bool(module, lhs).is_some() {
                return Some(lhs);
            }
        }
        return None;
    }

    if let (Some(a), Some(b)) = (as_const_int(module, lhs), as_const_int(module, rhs)) {
        let folded_int = match op {
            BinOp::Add => Some(a + b),
            BinOp::Sub => Some(a - b),
            BinOp::Mul => Some(a * b),
            BinOp::Div if b != 0 => Some(a / b),
            BinOp::Rem if b != 0 => Some(a % b),
            BinOp::Div | BinOp::Rem => None,
            _ => None,
        };
        if let Some(n) = folded_int {
            return fold_int(module, result, n);
        }
        let folded_bool = match op {
            BinOp::Lt => Some(a < b),
            BinOp::Le => Some(a <= b),
            BinOp::Gt => Some(a > b),
            BinOp::Ge => Some(a >= b),
            BinOp::Eq => Some(a == b),
            BinOp::Ne => Some(a != b),
            _ => None,
        };
        if let Some(bval) = folded_bool {
            return fold_bool(module, result, bval);
        }
    }
    None
}

// ---------------------------------------------------------------------
// local_load_forward
// ---------------------------------------------------------------------

/// Forwards a `Load` to the value most recently `Store`d into the same
/// slot within one block. Any `Call`/`MayWriteMem`/`MayTrap` effect
/// invalidates every tracked slot, since any of those could alias or
/// trap before reaching the load.
fn local_load_forward(module: &mut Module) {
    let mut subst = Subst::default();

    let block_ids: Vec<BlockId> = (0..module.blocks.len() as u32).map(BlockId).collect();
    for bb in block_ids {
        let mut slot_value: HashMap<ValueId, ValueId> = HashMap::new();
        let inst_ids = module.blocks[bb.0 as usize].insts.clone();
        for iid in inst_ids {
            let (data, eff, result) = {
                let inst = &module.insts[iid.0 as usize];
                (inst.data.clone(), inst.eff, inst.result)
            };
            match data {
                InstData::Store { slot, value } => {
                    slot_value.insert(subst.resolve(slot), subst.resolve(value));
                }
                InstData::Load { slot } => {
                    let slot = subst.resolve(slot);
                    if let (Some(val), Some(res)) = (slot_value.get(&slot).copied(), result) {
                        subst.set(res, val);
                    }
                }
                _ if matches!(eff, crate::oir::Effect::Call | crate::oir::Effect::MayWriteMem | crate::oir::Effect::MayTrap) => {
                    slot_value.clear();
                }
                _ => {}
            }
        }
    }

    rewrite_operands(module, &subst);
}

// ---------------------------------------------------------------------
// dce_pure_insts
// ---------------------------------------------------------------------

fn build_use_count(module: &Module) -> HashMap<ValueId, u32> {
    let mut counts = HashMap::new();
    let mut use_ = |v: ValueId| {
        if v.is_valid() {
            *counts.entry(v).or_insert(0) += 1;
        }
    };
    for inst in &module.insts {
        match &inst.data {
            InstData::Unary { src, .. } => use_(*src),
            InstData::BinOp { lhs, rhs, .. } => {
                use_(*lhs);
                use_(*rhs);
            }
            InstData::Cast { src, .. } => use_(*src),
            InstData::Load { slot } => use_(*slot),
            InstData::Store { slot, value } => {
                use_(*slot);
                use_(*value);
            }
            InstData::Call { callee, args, .. } => {
                use_(*callee);
                for a in args {
                    use_(*a);
                }
            }
            InstData::Index { base, index } => {
                use_(*base);
                use_(*index);
            }
            InstData::Field { base, .. } => use_(*base),
            InstData::ConstInt(_)
            | InstData::ConstBool(_)
            | InstData::ConstText(_)
            | InstData::ConstNull
            | InstData::AllocaLocal(_)
            | InstData::FuncRef(_)
            | InstData::GlobalRef(_) => {}
        }
    }
    for block in &module.blocks {
        match &block.term {
            Some(Terminator::Ret { value: Some(v) }) => use_(*v),
            Some(Terminator::Br { args, .. }) => {
                for a in args {
                    use_(*a);
                }
            }
            Some(Terminator::CondBr { cond, then_args, else_args, .. }) => {
                use_(*cond);
                for a in then_args.iter().chain(else_args.iter()) {
                    use_(*a);
                }
            }
            _ => {}
        }
    }
    counts
}

fn dce_pure_insts(module: &mut Module) {
    loop {
        let use_counts = build_use_count(module);
        let mut dead_insts: HashSet<usize> = HashSet::new();

        for (idx, inst) in module.insts.iter().enumerate() {
            if inst.eff != crate::oir::Effect::Pure {
                continue;
            }
            let Some(result) = inst.result else { continue };
            if use_counts.get(&result).copied().unwrap_or(0) == 0 {
                dead_insts.insert(idx);
            }
        }

        if dead_insts.is_empty() {
            break;
        }

        for block in module.blocks.iter_mut() {
            block.insts.retain(|iid| !dead_insts.contains(&(iid.0 as usize)));
        }
    }
}

impl Block {
    pub(crate) fn successors(&self) -> Vec<BlockId> {
        self.term.as_ref().map(successors).unwrap_or_default()
    }
}
