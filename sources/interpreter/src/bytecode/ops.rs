//! Control flow, allocation, casts and the odd ones out.

use anyhow::{anyhow, Result};
use dex::{decode, Ins, Opcode, Operands};
use tracing::warn;

use super::{operands, Progression};
use crate::object::{Instance, Value};
use crate::{Context, Vm};

pub fn return_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    let value = match (&ins.op, &ins.operands) {
        (Opcode::ReturnVoid, _) => None,
        (Opcode::ReturnWide, Operands::Reg { a }) => Some(ctx.registers.get_wide(*a as u16)?),
        (_, Operands::Reg { a }) => Some(ctx.registers.get(*a as u16)?),
        (op, other) => return Err(anyhow!("unexpected operands {other:?} for {op:?}")),
    };

    Ok(Progression::Return(value))
}

pub fn goto_op(ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Branch { off } => Ok(Progression::JumpRel(*off)))
}

/// Both switch kinds: resolve the payload the offset points at, pick a
/// target, fall through when the key is absent.
pub fn switch_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegBranch { a, off } => {
        let key = ctx.registers.get(*a as u16)?.int()?;
        let payload_pc = (ctx.pc as i64 + *off as i64) as usize;
        let payload = decode(&ctx.code.units, payload_pc)?;

        let target = match &payload.operands {
            Operands::PackedSwitch { first_key, targets } => {
                let idx = (key as i64) - (*first_key as i64);
                if idx >= 0 && (idx as usize) < targets.len() {
                    Some(targets[idx as usize])
                } else {
                    None
                }
            }
            Operands::SparseSwitch { keys, targets } => keys
                .binary_search(&key)
                .ok()
                .map(|idx| targets[idx]),
            _ => return Err(anyhow!("switch target is not a switch payload")),
        };

        Ok(match target {
            Some(off) => Progression::JumpRel(off),
            None => Progression::Next,
        })
    })
}

pub fn if_test(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairBranch { a, b, off } => {
        let lhs = ctx.registers.get(*a as u16)?;
        let rhs = ctx.registers.get(*b as u16)?;

        let taken = match ins.op {
            // eq/ne compare references by identity, numbers by value
            Opcode::IfEq => lhs.ref_eq(&rhs),
            Opcode::IfNe => !lhs.ref_eq(&rhs),
            _ => {
                let lhs = lhs.int()?;
                let rhs = rhs.int()?;
                match ins.op {
                    Opcode::IfLt => lhs < rhs,
                    Opcode::IfGe => lhs >= rhs,
                    Opcode::IfGt => lhs > rhs,
                    Opcode::IfLe => lhs <= rhs,
                    _ => unreachable!(),
                }
            }
        };

        Ok(if taken {
            Progression::JumpRel(*off)
        } else {
            Progression::Next
        })
    })
}

pub fn if_testz(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegBranch { a, off } => {
        let value = ctx.registers.get(*a as u16)?.test_int()?;

        let taken = match ins.op {
            Opcode::IfEqz => value == 0,
            Opcode::IfNez => value != 0,
            Opcode::IfLtz => value < 0,
            Opcode::IfGez => value >= 0,
            Opcode::IfGtz => value > 0,
            Opcode::IfLez => value <= 0,
            _ => unreachable!(),
        };

        Ok(if taken {
            Progression::JumpRel(*off)
        } else {
            Progression::Next
        })
    })
}

pub fn new_instance(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegIdx { a, idx } => {
        let descriptor = vm
            .index
            .container(ctx.method.container)
            .type_desc(*idx)?
            .to_string();

        // Well-known framework classes come pre-shaped from their factory;
        // everything else starts as a bare instance with no fields
        let value = match vm.mocks.factory(&descriptor) {
            Some(factory) => factory(&vm.config),
            None => Value::Object(Instance::new(descriptor)),
        };

        ctx.registers.set(*a as u16, value)?;
        Ok(Progression::Next)
    })
}

/// Nominal cast by descriptor match. The class hierarchy of the application
/// is not modelled, so an instance of a different named class passes with a
/// warning; only casting a primitive is fatal.
pub fn check_cast(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegIdx { a, idx } => {
        let descriptor = vm
            .index
            .container(ctx.method.container)
            .type_desc(*idx)?;
        let value = ctx.registers.get(*a as u16)?;

        match &value {
            Value::Null | Value::Object(_) | Value::Array(_) | Value::Class(_)
            | Value::Exception(_) => {
                if let Value::Object(obj) = &value {
                    let class = &obj.read().class;
                    if class != descriptor && descriptor != "Ljava/lang/Object;" {
                        warn!("check-cast {} as {descriptor} unverifiable", class);
                    }
                }
                Ok(Progression::Next)
            }
            v => Err(anyhow!("check-cast of a primitive value {v}")),
        }
    })
}

pub fn instance_of(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairIdx { a, b, idx } => {
        let descriptor = vm
            .index
            .container(ctx.method.container)
            .type_desc(*idx as u32)?;
        let value = ctx.registers.get(*b as u16)?;

        let result = match &value {
            Value::Object(obj) => obj.read().class == descriptor,
            Value::Array(arr) => {
                descriptor
                    .strip_prefix('[')
                    .map(|elem| arr.read().ty == elem)
                    .unwrap_or(false)
            }
            Value::Class(_) => descriptor == "Ljava/lang/Class;",
            _ => false,
        };

        ctx.registers.set(*a as u16, Value::Int(result as i32))?;
        Ok(Progression::Next)
    })
}

/// No exception unwinding: `throw` traps the frame.
pub fn throw_op(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Reg { a } => {
        let value = ctx.registers.get(*a as u16)?;
        let description = match &value {
            Value::Object(obj) => obj.read().class.clone(),
            v => v.to_string(),
        };

        Err(anyhow!("throw {description}"))
    })
}
