//! The invoke family. Argument registers are gathered according to the
//! callee's parameter descriptors (wides take two slots, the receiver leads
//! for everything but `invoke-static`), then dispatch runs through the mock
//! registries and the index; see [`Vm::dispatch_invoke`].

use anyhow::{anyhow, Context as AnyhowContext, Result};
use dex::{Ins, MethodSig};
use support::descriptor::FieldType;

use super::Progression;
use crate::object::Value;
use crate::{Context, Vm};

/// Read the argument window of an invoke into concrete values. `regs` is the
/// raw register list from the instruction; wide parameters consume two
/// consecutive entries of it.
pub fn gather_args(
    ctx: &Context,
    sig: &MethodSig,
    regs: &[u16],
    has_receiver: bool,
) -> Result<Vec<Value>> {
    let mut args = Vec::with_capacity(sig.params.len() + 1);
    let mut at = 0usize;

    let mut take = |slots: usize| -> Result<u16> {
        let reg = regs
            .get(at)
            .copied()
            .with_context(|| format!("invoke of {} ran out of argument registers", sig.signature))?;
        at += slots;
        Ok(reg)
    };

    if has_receiver {
        let reg = take(1)?;
        args.push(ctx.registers.get(reg)?);
    }

    for param in &sig.params {
        let wide = FieldType::parse(param).map(|t| t.is_wide()).unwrap_or(false);
        if wide {
            let reg = take(2)?;
            args.push(ctx.registers.get_wide(reg)?);
        } else {
            let reg = take(1)?;
            args.push(ctx.registers.get(reg)?);
        }
    }

    Ok(args)
}

pub fn invoke(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    let kind = ins
        .invoke_kind()
        .ok_or_else(|| anyhow!("{:?} is not an invoke", ins.op))?;
    let idx = ins.invoke_target().expect("invoke has a method index");
    let regs = ins.invoke_args().expect("invoke has argument registers");

    let container = vm.index.container(ctx.method.container);
    let sig = container.method_sig(idx as u32)?;
    let trace = container.disassemble(ins);

    let args = gather_args(ctx, &sig, &regs, kind.has_receiver())?;

    let receiver_null = kind.has_receiver()
        && args
            .first()
            .map(|receiver| receiver.is_null())
            .unwrap_or(false);
    if receiver_null {
        return Err(anyhow!("invoke of {} on a null receiver", sig.signature));
    }

    ctx.last_result = vm.dispatch_invoke(kind, &sig, args, &trace)?;

    Ok(Progression::Next)
}
