//! Moves, constants, array element access, instance and static field access.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use bytes::Bytes;
use dex::{decode, Ins, Opcode, Operands};
use support::bytes_ext::SafeBuf;
use tracing::warn;

use super::{operands, Progression};
use crate::object::statics::StaticFieldRef;
use crate::object::{Array, Value};
use crate::{Context, Vm};

/// All nine move opcodes. Object moves are plain moves at this level; wide
/// moves transfer a register pair.
pub fn mov(ctx: &mut Context, ins: &Ins, wide: bool) -> Result<Progression> {
    let (dst, src) = match &ins.operands {
        Operands::PairNib { a, b } => (*a as u16, *b as u16),
        Operands::RegPair { a, b } => (*a, *b),
        other => return Err(anyhow!("unexpected operands {other:?} for {:?}", ins.op)),
    };

    if wide {
        let value = ctx.registers.get_wide(src)?;
        ctx.registers.set_wide(dst, value)?;
    } else {
        let value = ctx.registers.get(src)?;
        ctx.registers.set(dst, value)?;
    }

    Ok(Progression::Next)
}

pub fn move_result(ctx: &mut Context, ins: &Ins, wide: bool) -> Result<Progression> {
    operands!(ins, Operands::Reg { a } => {
        let value = ctx
            .last_result
            .take()
            .context("move-result with no pending invoke result")?;

        if wide {
            ctx.registers.set_wide(*a as u16, value)?;
        } else {
            ctx.registers.set(*a as u16, value)?;
        }

        Ok(Progression::Next)
    })
}

/// Without exception unwinding there is never a live exception here; the
/// handler block observes null.
pub fn move_exception(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Reg { a } => {
        ctx.registers.set(*a as u16, Value::Null)?;
        Ok(Progression::Next)
    })
}

pub fn constant(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegLit { a, lit } => {
        ctx.registers.set(*a as u16, Value::Int(*lit as i32))?;
        Ok(Progression::Next)
    })
}

pub fn constant_wide(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegLit { a, lit } => {
        ctx.registers.set_wide(*a as u16, Value::Long(*lit))?;
        Ok(Progression::Next)
    })
}

pub fn const_string(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegIdx { a, idx } => {
        let text = vm
            .index
            .string_in(ctx.method.container, *idx)?
            .to_string();
        ctx.registers.set(*a as u16, Value::string(text))?;
        Ok(Progression::Next)
    })
}

pub fn const_class(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegIdx { a, idx } => {
        let descriptor = vm
            .index
            .container(ctx.method.container)
            .type_desc(*idx)?
            .to_string();
        ctx.registers.set(*a as u16, Value::Class(descriptor))?;
        Ok(Progression::Next)
    })
}

pub fn array_length(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairNib { a, b } => {
        let value = ctx.registers.get(*b as u16)?;
        let array = value
            .as_array()
            .context("array-length on a non-array value")?;
        let len = array.read().values.len() as i32;
        ctx.registers.set(*a as u16, Value::Int(len))?;
        Ok(Progression::Next)
    })
}

pub fn new_array(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairIdx { a, b, idx } => {
        let len = ctx.registers.get(*b as u16)?.int()?;
        if len < 0 {
            return Err(anyhow!("new-array with negative length {len}"));
        }

        let descriptor = vm
            .index
            .container(ctx.method.container)
            .type_desc(*idx as u32)?;
        let element = descriptor
            .strip_prefix('[')
            .context("new-array of a non-array type")?
            .to_string();

        ctx.registers
            .set(*a as u16, Value::Array(Array::new(element, len as usize)))?;
        Ok(Progression::Next)
    })
}

/// `filled-new-array` materialises a small array from argument registers;
/// the result lands in the last-result slot like an invoke result.
pub fn filled_new_array(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    let (regs, idx) = match &ins.operands {
        Operands::Call { args, idx } => {
            (args.iter().map(|a| *a as u16).collect::<Vec<_>>(), *idx as u32)
        }
        Operands::CallRange { first, count, idx } => {
            ((*first..*first + *count as u16).collect(), *idx as u32)
        }
        other => return Err(anyhow!("unexpected operands {other:?} for {:?}", ins.op)),
    };

    let descriptor = vm
        .index
        .container(ctx.method.container)
        .type_desc(idx)?;
    let element = descriptor
        .strip_prefix('[')
        .context("filled-new-array of a non-array type")?
        .to_string();

    let values = regs
        .iter()
        .map(|r| ctx.registers.get(*r))
        .collect::<Result<Vec<_>>>()?;

    ctx.last_result = Some(Value::Array(Array::with_values(element, values)));
    Ok(Progression::Next)
}

/// Resolve the payload the branch offset points at and copy its packed
/// literals into the target array.
pub fn fill_array_data(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegBranch { a, off } => {
        let payload_pc = (ctx.pc as i64 + *off as i64) as usize;
        let payload = decode(&ctx.code.units, payload_pc)?;

        let (width, data) = match payload.operands {
            Operands::FillArray { width, data } => (width, data),
            _ => return Err(anyhow!("fill-array-data target is not an array payload")),
        };

        let value = ctx.registers.get(*a as u16)?;
        let array = value
            .as_array()
            .context("fill-array-data on a non-array value")?;
        let mut array = array.write();

        let count = if width == 0 { 0 } else { data.len() / width as usize };
        if count > array.values.len() {
            return Err(anyhow!(
                "fill-array-data payload has {count} elements, array has {}",
                array.values.len()
            ));
        }

        let mut buf = Bytes::from(data);
        for slot in array.values.iter_mut().take(count) {
            *slot = match width {
                1 => Value::Int(buf.try_get_i8()? as i32),
                2 => Value::Int(buf.try_get_i16_le()? as i32),
                4 => Value::Int(buf.try_get_i32_le()?),
                8 => Value::Long(buf.try_get_i64_le()?),
                w => return Err(anyhow!("unsupported array payload width {w}")),
            };
        }

        Ok(Progression::Next)
    })
}

pub fn array_get(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let value = ctx.registers.get(*b as u16)?;
        if value.is_null() {
            return Err(anyhow!("aget on a null array"));
        }
        let array = value.as_array().context("aget on a non-array value")?;
        let array = array.read();

        let idx = ctx.registers.get(*c as u16)?.int()?;
        let element = array
            .values
            .get(idx.max(0) as usize)
            .filter(|_| idx >= 0)
            .ok_or_else(|| {
                anyhow!("array index {idx} out of bounds (length {})", array.values.len())
            })?
            .clone();

        if ins.op == Opcode::AgetWide {
            ctx.registers.set_wide(*a as u16, element)?;
        } else {
            ctx.registers.set(*a as u16, element)?;
        }

        Ok(Progression::Next)
    })
}

pub fn array_put(ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::Triple { a, b, c } => {
        let value = if ins.op == Opcode::AputWide {
            ctx.registers.get_wide(*a as u16)?
        } else {
            ctx.registers.get(*a as u16)?
        };

        let target = ctx.registers.get(*b as u16)?;
        if target.is_null() {
            return Err(anyhow!("aput on a null array"));
        }
        let array = target.as_array().context("aput on a non-array value")?;
        let mut array = array.write();

        let idx = ctx.registers.get(*c as u16)?.int()?;
        let len = array.values.len();
        let slot = array
            .values
            .get_mut(idx.max(0) as usize)
            .filter(|_| idx >= 0)
            .ok_or_else(|| anyhow!("array index {idx} out of bounds (length {len})"))?;
        *slot = value;

        Ok(Progression::Next)
    })
}

pub fn instance_get(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairIdx { a, b, idx } => {
        let field = vm
            .index
            .container(ctx.method.container)
            .field_ref(*idx as u32)?;

        let receiver = ctx.registers.get(*b as u16)?;
        if receiver.is_null() {
            return Err(anyhow!("iget {} on a null receiver", field.name));
        }
        let object = receiver
            .as_object()
            .context("iget on a non-object value")?;

        // Fields appear on first assignment; reads before that observe the
        // type's zero value
        let value = object
            .read()
            .fields
            .get(&field.name)
            .cloned()
            .unwrap_or_else(|| Array::element_default(&field.descriptor));

        if ins.op == Opcode::IgetWide {
            ctx.registers.set_wide(*a as u16, value)?;
        } else {
            ctx.registers.set(*a as u16, value)?;
        }

        Ok(Progression::Next)
    })
}

pub fn instance_put(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::PairIdx { a, b, idx } => {
        let field = vm
            .index
            .container(ctx.method.container)
            .field_ref(*idx as u32)?;

        let value = if ins.op == Opcode::IputWide {
            ctx.registers.get_wide(*a as u16)?
        } else {
            ctx.registers.get(*a as u16)?
        };

        let receiver = ctx.registers.get(*b as u16)?;
        if receiver.is_null() {
            return Err(anyhow!("iput {} on a null receiver", field.name));
        }
        let object = receiver
            .as_object()
            .context("iput on a non-object value")?;

        object.write().fields.insert(field.name, value);
        Ok(Progression::Next)
    })
}

pub fn static_get(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegIdx { a, idx } => {
        let field = vm
            .index
            .container(ctx.method.container)
            .field_ref(*idx)?;
        let key = StaticFieldRef::new(&field.class, &field.name);

        // Mock overrides (Build.VERSION.SDK_INT and friends) win over the
        // store and never trigger initialisation
        let value = match vm.mocks.static_field(&key) {
            Some(value) => value,
            None => {
                vm.initialise_class(&field.class)?;
                match vm.statics.get_field(&key) {
                    Some(value) => value,
                    None => {
                        warn!("sget of unset static {}->{}", field.class, field.name);
                        Array::element_default(&field.descriptor)
                    }
                }
            }
        };

        if ins.op == Opcode::SgetWide {
            ctx.registers.set_wide(*a as u16, value)?;
        } else {
            ctx.registers.set(*a as u16, value)?;
        }

        Ok(Progression::Next)
    })
}

pub fn static_put(vm: &mut Vm, ctx: &mut Context, ins: &Ins) -> Result<Progression> {
    operands!(ins, Operands::RegIdx { a, idx } => {
        let field = vm
            .index
            .container(ctx.method.container)
            .field_ref(*idx)?;

        let value = if ins.op == Opcode::SputWide {
            ctx.registers.get_wide(*a as u16)?
        } else {
            ctx.registers.get(*a as u16)?
        };

        vm.initialise_class(&field.class)?;
        vm.statics
            .set_field(StaticFieldRef::new(&field.class, &field.name), value);

        Ok(Progression::Next)
    })
}
