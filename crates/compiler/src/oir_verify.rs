//! Structural verifier for the post-pass OIR: every value id an
//! instruction or terminator references must resolve, every block a
//! function claims must be owned by exactly that function, every
//! terminator's branch targets must exist with argument lists matching
//! target parameter counts and types, and no `HeapBox` escape hint may
//! survive to this point (spec.md's escape-lowering contract requires
//! those to have been rewritten into caller-slot form earlier).
//!
//! Returns a flat `Vec<String>` rather than [`crate::DiagnosticBag`] —
//! unlike the rest of this crate's passes, which report through spans
//! the user's source maps to, a verifier failure here means the
//! compiler produced malformed IR; there is no user-facing span to
//! attach, only a message for whoever is debugging the lowering.
//!
//! Grounded in `original_source/frontend/src/oir/oir_verify.cpp`.

use crate::oir::{Inst, InstData, Module, Terminator, ValueDef, ValueId};
use crate::sir::EscapeHandleKind;
use std::collections::HashSet;

pub fn verify(module: &Module) -> Vec<String> {
    let mut errs = Vec::new();
    check_value_ids(module, &mut errs);
    check_block_ownership(module, &mut errs);
    check_functions(module, &mut errs);
    check_escape_hints(module, &mut errs);
    errs
}

fn check_value_id(module: &Module, v: ValueId, ctx: &str, errs: &mut Vec<String>) {
    if !v.is_valid() {
        errs.push(format!("{ctx}: invalid value id"));
        return;
    }
    if v.0 as usize >= module.values.len() {
        errs.push(format!("{ctx}: value id {} out of range (len {})", v.0, module.values.len()));
    }
}

fn check_value_ids(module: &Module, errs: &mut Vec<String>) {
    for (idx, inst) in module.insts.iter().enumerate() {
        verify_inst_operands(module, idx, inst, errs);
    }
}

fn verify_inst_operands(module: &Module, idx: usize, inst: &Inst, errs: &mut Vec<String>) {
    let ctx = format!("inst[{idx}]");
    match &inst.data {
        InstData::Unary { src, .. } => check_value_id(module, *src, &ctx, errs),
        InstData::BinOp { lhs, rhs, .. } => {
            check_value_id(module, *lhs, &ctx, errs);
            check_value_id(module, *rhs, &ctx, errs);
        }
        InstData::Cast { src, .. } => check_value_id(module, *src, &ctx, errs),
        InstData::Load { slot } => check_value_id(module, *slot, &ctx, errs),
        InstData::Store { slot, value } => {
            check_value_id(module, *slot, &ctx, errs);
            check_value_id(module, *value, &ctx, errs);
        }
        InstData::Call { callee, direct_callee, args } => {
            check_value_id(module, *callee, &ctx, errs);
            for a in args {
                check_value_id(module, *a, &ctx, errs);
            }
            if let Some(fid) = direct_callee {
                if fid.0 as usize >= module.funcs.len() {
                    errs.push(format!("{ctx}: direct_callee {} out of range", fid.0));
                }
            }
        }
        InstData::Index { base, index } => {
            check_value_id(module, *base, &ctx, errs);
            check_value_id(module, *index, &ctx, errs);
        }
        InstData::Field { base, .. } => check_value_id(module, *base, &ctx, errs),
        InstData::FuncRef(fid) => {
            if fid.0 as usize >= module.funcs.len() {
                errs.push(format!("{ctx}: FuncRef {} out of range", fid.0));
            }
        }
        InstData::GlobalRef(gid) => {
            if gid.0 as usize >= module.globals.len() {
                errs.push(format!("{ctx}: GlobalRef {} out of range", gid.0));
            }
        }
        InstData::ConstInt(_) | InstData::ConstBool(_) | InstData::ConstText(_) | InstData::ConstNull | InstData::AllocaLocal(_) => {}
    }

    if let Some(result) = inst.result {
        let val = module.values.get(result.0 as usize);
        match val.map(|v| v.def) {
            Some(ValueDef::Inst(iid)) if iid.0 as usize == idx => {}
            _ => errs.push(format!("{ctx}: result value does not point back to this instruction")),
        }
    }
}

fn check_block_ownership(module: &Module, errs: &mut Vec<String>) {
    let mut owner: HashSet<u32> = HashSet::new();
    for (fid, f) in module.funcs.iter().enumerate() {
        if f.entry.0 as usize >= module.blocks.len() {
            errs.push(format!("func[{fid}]: entry block {} out of range", f.entry.0));
        } else if !f.blocks.contains(&f.entry) {
            errs.push(format!("func[{fid}]: entry block {} not listed in its own block set", f.entry.0));
        }
        for b in &f.blocks {
            if b.0 as usize >= module.blocks.len() {
                errs.push(format!("func[{fid}]: block {} out of range", b.0));
                continue;
            }
            if !owner.insert(b.0) {
                errs.push(format!("func[{fid}]: block {} already owned by another function", b.0));
            }
        }
    }
}

fn check_functions(module: &Module, errs: &mut Vec<String>) {
    for (fid, f) in module.funcs.iter().enumerate() {
        for &bid in &f.blocks {
            if bid.0 as usize >= module.blocks.len() {
                continue;
            }
            let block = &module.blocks[bid.0 as usize];
            let Some(term) = &block.term else {
                errs.push(format!("func[{fid}] block[{}]: missing terminator", bid.0));
                continue;
            };
            verify_terminator(module, fid, bid.0, term, errs);

            for &param in &block.params {
                check_value_id(module, param, &format!("func[{fid}] block[{}] param", bid.0), errs);
            }
            for &iid in &block.insts {
                if iid.0 as usize >= module.insts.len() {
                    errs.push(format!("func[{fid}] block[{}]: inst {} out of range", bid.0, iid.0));
                }
            }
        }
    }
}

fn verify_terminator(module: &Module, fid: usize, bid: u32, term: &Terminator, errs: &mut Vec<String>) {
    let ctx = format!("func[{fid}] block[{bid}]");
    match term {
        Terminator::Ret { value } => {
            if let Some(v) = value {
                check_value_id(module, *v, &ctx, errs);
            }
        }
        Terminator::Br { target, args } => {
            verify_branch(module, &ctx, *target, args, errs);
        }
        Terminator::CondBr { cond, then_bb, then_args, else_bb, else_args } => {
            check_value_id(module, *cond, &ctx, errs);
            verify_branch(module, &ctx, *then_bb, then_args, errs);
            verify_branch(module, &ctx, *else_bb, else_args, errs);
        }
    }
}

fn verify_branch(module: &Module, ctx: &str, target: crate::oir::BlockId, args: &[ValueId], errs: &mut Vec<String>) {
    if target.0 as usize >= module.blocks.len() {
        errs.push(format!("{ctx}: branch target {} out of range", target.0));
        return;
    }
    for a in args {
        check_value_id(module, *a, ctx, errs);
    }
    let target_block = &module.blocks[target.0 as usize];
    if target_block.params.len() != args.len() {
        errs.push(format!(
            "{ctx}: branch to block[{}] passes {} args but target expects {}",
            target.0,
            args.len(),
            target_block.params.len()
        ));
        return;
    }
    for (param, arg) in target_block.params.iter().zip(args.iter()) {
        let param_ty = module.values.get(param.0 as usize).map(|v| v.ty);
        let arg_ty = module.values.get(arg.0 as usize).map(|v| v.ty);
        if let (Some(pt), Some(at)) = (param_ty, arg_ty) {
            if pt != at {
                errs.push(format!(
                    "{ctx}: branch to block[{}] arg type {} does not match param type {}",
                    target.0, at, pt
                ));
            }
        }
    }
}

fn check_escape_hints(module: &Module, errs: &mut Vec<String>) {
    for hint in &module.escape_hints {
        if hint.kind == EscapeHandleKind::HeapBox {
            errs.push(format!("escape hint on value {} still requests HeapBox storage", hint.value.0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oir::{build, Block, Effect, Function, Value};
    use crate::sir;
    use parus_core::TypePool;

    fn empty_module_with_one_bad_branch() -> Module {
        let mut m = Module::default();
        let join = m.add_block(Block::default());
        let entry_idx = m.blocks.len() as u32;
        let entry_block = Block { params: vec![], insts: vec![], term: Some(Terminator::Br { target: crate::oir::BlockId(entry_idx + 5), args: vec![] }) };
        let entry = m.add_block(entry_block);
        m.add_func(Function { name: "f".into(), ret_ty: TypePool::ERROR, entry, blocks: vec![entry, join] });
        m
    }

    #[test]
    fn branch_to_out_of_range_block_is_reported() {
        let m = empty_module_with_one_bad_branch();
        let errs = verify(&m);
        assert!(!errs.is_empty());
    }

    #[test]
    fn well_formed_single_block_function_verifies_clean() {
        let mut m = Module::default();
        let entry = m.add_block(Block { params: vec![], insts: vec![], term: Some(Terminator::Ret { value: None }) });
        m.add_func(Function { name: "f".into(), ret_ty: TypePool::ERROR, entry, blocks: vec![entry] });
        assert!(verify(&m).is_empty());
    }

    #[test]
    fn heap_box_escape_hint_is_rejected() {
        let mut m = Module::default();
        let entry = m.add_block(Block { params: vec![], insts: vec![], term: Some(Terminator::Ret { value: None }) });
        m.add_func(Function { name: "f".into(), ret_ty: TypePool::ERROR, entry, blocks: vec![entry] });
        let vid = m.add_value(Value { ty: TypePool::ERROR, eff: Effect::Pure, def: crate::oir::ValueDef::BlockParam(entry, 0) });
        m.escape_hints.push(crate::oir::EscapeHint { value: vid, kind: EscapeHandleKind::HeapBox });
        let errs = verify(&m);
        assert!(errs.iter().any(|e| e.contains("HeapBox")));
    }

    #[test]
    fn lowering_a_real_function_produces_a_clean_oir_module() {
        use crate::parser::parse;
        use crate::resolver::resolve;
        use crate::sir::{analyze_capabilities, lower as lower_sir};
        use crate::symtab::ShadowPolicy;
        use crate::typecheck::check;
        use crate::DiagnosticBag;
        use parus_core::ast::Arena;

        let mut arena = Arena::new();
        let mut types = TypePool::new();
        let mut diags = DiagnosticBag::new();
        let src = "fn f(x: i32) -> i32 { return x + 1; }";
        let range = parse(src, &mut arena, &mut types, &mut diags);
        let (resolved, table) = resolve(&arena, range, ShadowPolicy::Warn, &mut diags);
        let tyck = check(&arena, range, &mut types, &mut diags, &resolved, &table);
        let mut sir_module = lower_sir(&arena, range, &tyck, &resolved);
        analyze_capabilities(&mut sir_module, &types, &mut diags);
        let oir_module = build(&sir_module);
        assert!(verify(&oir_module).is_empty());
    }
}
