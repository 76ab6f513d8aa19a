//! Forward data-flow: given an allocation site, scan ahead for the
//! initialisation that belongs to the allocated value and replay it.
//!
//! The scan stays inside the allocation's basic block: it stops at the
//! first unconditional exit (goto, return, throw), at a reassignment of
//! the allocation register, or at the method end.

use std::rc::Rc;

use anyhow::Result;
use dex::{decode, Opcode, Operands, MethodDef};
use interpreter::object::{Array, Instance, Value};
use interpreter::Vm;
use support::descriptor::FieldType;
use tracing::debug;

use crate::backward::trace_register;

/// Produce a concrete value for the allocation at `alloc_pc` into `reg`, or
/// `None` when the initialisation pattern is not recognised or does not
/// resolve.
pub fn enrich_allocation(
    vm: &mut Vm,
    method: &MethodDef,
    alloc_pc: usize,
    reg: u16,
    depth: usize,
) -> Result<Option<Value>> {
    let index = Rc::clone(&vm.index);
    let Some(trace) = index.trace_map(&method.signature) else {
        return Ok(None);
    };
    let Some(alloc) = trace.get(alloc_pc) else {
        return Ok(None);
    };

    match alloc.ins.op {
        Opcode::NewArray => enrich_array(vm, method, alloc_pc, reg, depth),
        Opcode::NewInstance => enrich_instance(vm, method, alloc_pc, reg, depth),
        _ => Ok(None),
    }
}

fn enrich_array(
    vm: &mut Vm,
    method: &MethodDef,
    alloc_pc: usize,
    reg: u16,
    depth: usize,
) -> Result<Option<Value>> {
    let index = Rc::clone(&vm.index);
    let trace = index.trace_map(&method.signature).expect("checked by caller");
    let alloc = trace.get(alloc_pc).expect("checked by caller");

    let (len_reg, element) = match &alloc.ins.operands {
        Operands::PairIdx { b, idx, .. } => {
            let descriptor = index.container(method.container).type_desc(*idx as u32)?;
            let Some(element) = descriptor.strip_prefix('[') else {
                return Ok(None);
            };
            (*b as u16, element.to_string())
        }
        _ => return Ok(None),
    };

    // The declared length, when it is statically known
    let len = trace_register(vm, method, alloc_pc, len_reg, depth)?
        .value
        .and_then(|v| v.int().ok())
        .filter(|len| *len >= 0)
        .map(|len| len as usize);

    // Sparse element writes observed along the block
    let mut writes: Vec<(usize, Value)> = Vec::new();

    let units = method.code.as_ref().expect("method with a trace has code");

    for (pc, entry) in trace.after(alloc_pc) {
        if let Some((dst, _)) = entry.ins.written_register() {
            if dst == reg {
                break;
            }
        }

        match (&entry.ins.op, &entry.ins.operands) {
            (Opcode::FillArrayData, Operands::RegBranch { a, off }) if *a as u16 == reg => {
                let payload_pc = (pc as i64 + *off as i64) as usize;
                let payload = decode(&units.units, payload_pc)?;
                let Operands::FillArray { width, data } = payload.operands else {
                    return Ok(None);
                };

                return Ok(Some(materialise_packed(&element, width, &data)));
            }

            // aput family with our register as the array operand
            (
                Opcode::Aput
                | Opcode::AputWide
                | Opcode::AputObject
                | Opcode::AputBoolean
                | Opcode::AputByte
                | Opcode::AputChar
                | Opcode::AputShort,
                Operands::Triple { a, b, c },
            ) if *b as u16 == reg => {
                let idx = trace_register(vm, method, pc, *c as u16, depth)?;
                let value = trace_register(vm, method, pc, *a as u16, depth)?;
                match (idx.value.and_then(|v| v.int().ok()), value.value) {
                    (Some(idx), Some(value)) if idx >= 0 => {
                        writes.push((idx as usize, value));
                    }
                    _ => return Ok(None),
                }
            }

            _ => {}
        }

        if entry.ins.ends_block() {
            break;
        }
    }

    if writes.is_empty() && len.is_none() {
        return Ok(None);
    }

    let len = len.unwrap_or_else(|| {
        writes
            .iter()
            .map(|(idx, _)| idx + 1)
            .max()
            .unwrap_or(0)
    });

    let array = Array::new(element, len);
    {
        let mut array = array.write();
        for (idx, value) in writes {
            if idx < array.values.len() {
                array.values[idx] = value;
            }
        }
    }

    Ok(Some(Value::Array(array)))
}

fn materialise_packed(element: &str, width: u16, data: &[u8]) -> Value {
    let mut values = Vec::new();
    match width {
        1 => values.extend(data.iter().map(|b| Value::Int(*b as i8 as i32))),
        2 => values.extend(
            data.chunks_exact(2)
                .map(|c| Value::Int(i16::from_le_bytes([c[0], c[1]]) as i32)),
        ),
        4 => values.extend(
            data.chunks_exact(4)
                .map(|c| Value::Int(i32::from_le_bytes([c[0], c[1], c[2], c[3]]))),
        ),
        8 => values.extend(data.chunks_exact(8).map(|c| {
            Value::Long(i64::from_le_bytes([
                c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7],
            ]))
        })),
        _ => {}
    }

    Value::Array(Array::with_values(element, values))
}

fn enrich_instance(
    vm: &mut Vm,
    method: &MethodDef,
    alloc_pc: usize,
    reg: u16,
    depth: usize,
) -> Result<Option<Value>> {
    let index = Rc::clone(&vm.index);
    let trace = index.trace_map(&method.signature).expect("checked by caller");
    let alloc = trace.get(alloc_pc).expect("checked by caller");

    let descriptor = match &alloc.ins.operands {
        Operands::RegIdx { idx, .. } => index
            .container(method.container)
            .type_desc(*idx)?
            .to_string(),
        _ => return Ok(None),
    };

    let instance = match vm.mocks.factory(&descriptor) {
        Some(factory) => factory(&vm.config),
        None => Value::Object(Instance::new(descriptor.clone())),
    };

    let container = index.container(method.container);
    let mut constructed = false;

    for (pc, entry) in trace.after(alloc_pc) {
        if let Some((dst, _)) = entry.ins.written_register() {
            if dst == reg {
                break;
            }
        }

        match (&entry.ins.op, &entry.ins.operands) {
            // The constructor that belongs to this allocation
            (Opcode::InvokeDirect | Opcode::InvokeDirectRange, _)
            | (Opcode::InvokeVirtual | Opcode::InvokeVirtualRange, _) => {
                let regs = entry.ins.invoke_args().expect("invoke has registers");
                if regs.first().copied() != Some(reg) {
                    continue;
                }

                let idx = entry.ins.invoke_target().expect("invoke has a method index");
                let sig = container.method_sig(idx as u32)?;

                // Resolve the non-receiver arguments backwards at this pc
                let mut args = vec![instance.clone()];
                let mut at = 1usize;
                let mut ok = true;
                for param in &sig.params {
                    let wide =
                        FieldType::parse(param).map(|t| t.is_wide()).unwrap_or(false);
                    let Some(arg_reg) = regs.get(at).copied() else {
                        ok = false;
                        break;
                    };
                    at += if wide { 2 } else { 1 };

                    let info = trace_register(vm, method, pc, arg_reg, depth)?;
                    if !info.resolved {
                        ok = false;
                        break;
                    }
                    args.push(info.value.expect("resolved info carries a value"));
                }

                if !ok {
                    debug!("unresolved argument replaying {} at {pc:#06x}", sig.signature);
                    if sig.name == "<init>" && !constructed {
                        // An unreplayable constructor leaves the whole
                        // object unknown
                        return Ok(None);
                    }
                    continue;
                }

                let kind = entry.ins.invoke_kind().expect("checked above");
                let trace_text = container.disassemble(&entry.ins);
                vm.dispatch_invoke(kind, &sig, args, &trace_text)?;
                if sig.name == "<init>" {
                    constructed = true;
                }
            }

            // Field stores into the fresh object
            (
                Opcode::Iput
                | Opcode::IputWide
                | Opcode::IputObject
                | Opcode::IputBoolean
                | Opcode::IputByte
                | Opcode::IputChar
                | Opcode::IputShort,
                Operands::PairIdx { a, b, idx },
            ) if *b as u16 == reg => {
                let field = container.field_ref(*idx as u32)?;
                let info = trace_register(vm, method, pc, *a as u16, depth)?;
                if let Some(value) = info.value {
                    if let Value::Object(obj) = &instance {
                        obj.write().fields.insert(field.name, value);
                    }
                }
            }

            _ => {}
        }

        if entry.ins.ends_block() {
            break;
        }
    }

    Ok(Some(instance))
}
