//! Backward data-flow: reconstruct what a register held at a pc by walking
//! the trace map in decreasing pc order for the nearest write.

use std::rc::Rc;

use anyhow::Result;
use dex::{Ins, MethodDef, Opcode, Operands};
use interpreter::object::statics::StaticFieldRef;
use interpreter::object::Value;
use interpreter::Vm;
use support::descriptor::FieldType;
use tracing::debug;

use crate::{enrich_allocation, ArgInfo, ArgSource, MAX_RESOLVE_DEPTH};

/// Reconstruct the value `reg` holds on entry to the instruction at `pc`.
///
/// `depth` bounds re-entry through invoke-result resolution; callers start
/// at 0. Exceeded depth reads as unresolved rather than an error.
pub fn trace_register(
    vm: &mut Vm,
    method: &MethodDef,
    pc: usize,
    reg: u16,
    depth: usize,
) -> Result<ArgInfo> {
    let index = Rc::clone(&vm.index);
    let trace = match index.trace_map(&method.signature) {
        Some(trace) => trace,
        None => return Ok(ArgInfo::unresolved(ArgSource::Unknown, "no trace map")),
    };

    for (write_pc, entry) in trace.before(pc) {
        let Some((dst, wide)) = entry.ins.written_register() else {
            continue;
        };

        if wide && dst + 1 == reg {
            return Ok(ArgInfo::unresolved(
                ArgSource::Unknown,
                format!("v{reg} is the high half of a wide pair written at {write_pc:#06x}"),
            ));
        }
        if dst != reg {
            continue;
        }

        debug!(
            "v{reg} at {pc:#06x} defined by {:#06x}: {}",
            write_pc, entry.text
        );

        return resolve_write(vm, method, write_pc, &entry.ins, &entry.text, reg, depth);
    }

    // Never written before this pc: a parameter, if it sits in the trailing
    // parameter window
    if let Some(code) = &method.code {
        let first_param = code.registers.saturating_sub(code.ins);
        if reg >= first_param {
            return Ok(ArgInfo::unresolved(
                ArgSource::Parameter,
                format!("parameter {}", reg - first_param),
            ));
        }
    }

    Ok(ArgInfo::unresolved(
        ArgSource::Unknown,
        format!("no write to v{reg} dominates pc {pc:#06x}"),
    ))
}

fn resolve_write(
    vm: &mut Vm,
    method: &MethodDef,
    write_pc: usize,
    ins: &Ins,
    text: &str,
    reg: u16,
    depth: usize,
) -> Result<ArgInfo> {
    use Opcode::*;

    let index = Rc::clone(&vm.index);

    match ins.op {
        Const4 | Const16 | Const | ConstHigh16 => match &ins.operands {
            Operands::RegLit { lit, .. } => Ok(ArgInfo::resolved(
                Value::Int(*lit as i32),
                ArgSource::Const,
                text,
            )),
            _ => Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
        },
        ConstWide16 | ConstWide32 | ConstWide | ConstWideHigh16 => match &ins.operands {
            Operands::RegLit { lit, .. } => Ok(ArgInfo::resolved(
                Value::Long(*lit),
                ArgSource::Const,
                text,
            )),
            _ => Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
        },
        ConstString | ConstStringJumbo => match &ins.operands {
            Operands::RegIdx { idx, .. } => {
                let s = index.string_in(method.container, *idx)?.to_string();
                Ok(ArgInfo::resolved(
                    Value::string(s),
                    ArgSource::ConstString,
                    text,
                ))
            }
            _ => Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
        },
        ConstClass => match &ins.operands {
            Operands::RegIdx { idx, .. } => {
                let descriptor = index
                    .container(method.container)
                    .type_desc(*idx)?
                    .to_string();
                Ok(ArgInfo::resolved(
                    Value::Class(descriptor),
                    ArgSource::Const,
                    text,
                ))
            }
            _ => Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
        },

        // Moves chain into their source register at an earlier pc
        Move | MoveFrom16 | Move16 | MoveWide | MoveWideFrom16 | MoveWide16 | MoveObject
        | MoveObjectFrom16 | MoveObject16 => {
            let src = match &ins.operands {
                Operands::PairNib { b, .. } => *b as u16,
                Operands::RegPair { b, .. } => *b,
                _ => return Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
            };

            let inner = trace_register(vm, method, write_pc, src, depth)?;
            Ok(ArgInfo {
                source: ArgSource::MoveChain,
                detail: format!("{text} <- {}", inner.detail),
                ..inner
            })
        }

        Sget | SgetWide | SgetObject | SgetBoolean | SgetByte | SgetChar | SgetShort => {
            let field = match &ins.operands {
                Operands::RegIdx { idx, .. } => {
                    index.container(method.container).field_ref(*idx)?
                }
                _ => return Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
            };

            let key = StaticFieldRef::new(&field.class, &field.name);
            let value = vm
                .mocks
                .static_field(&key)
                .or_else(|| vm.statics.get_field(&key));

            Ok(match value {
                Some(value) => ArgInfo::resolved(value, ArgSource::StaticField, text),
                None => ArgInfo::unresolved(ArgSource::StaticField, text),
            })
        }

        // The value is whatever the preceding invoke (or filled-new-array)
        // produced
        MoveResult | MoveResultWide | MoveResultObject => {
            let Some(trace) = index.trace_map(&method.signature) else {
                return Ok(ArgInfo::unresolved(ArgSource::InvokeResult, text));
            };
            let producer = trace
                .before(write_pc)
                .next()
                .map(|(pc, entry)| (pc, entry.clone()));

            let Some((invoke_pc, producer)) = producer else {
                return Ok(ArgInfo::unresolved(ArgSource::InvokeResult, text));
            };

            if matches!(producer.ins.op, FilledNewArray | FilledNewArrayRange) {
                return resolve_filled_array(vm, method, invoke_pc, &producer.ins, text, depth);
            }

            if producer.ins.invoke_kind().is_none() {
                return Ok(ArgInfo::unresolved(
                    ArgSource::InvokeResult,
                    format!("{text}: producer is not an invoke"),
                ));
            }

            match resolve_invoke(vm, method, invoke_pc, &producer.ins, depth + 1)? {
                Some(value) => Ok(ArgInfo::resolved(
                    value,
                    ArgSource::InvokeResult,
                    format!("{text} <- {}", producer.text),
                )),
                None => Ok(ArgInfo::unresolved(
                    ArgSource::InvokeResult,
                    format!("{text} <- {}", producer.text),
                )),
            }
        }

        NewInstance | NewArray => {
            match enrich_allocation(vm, method, write_pc, reg, depth)? {
                Some(value) => Ok(ArgInfo::resolved(value, ArgSource::Allocation, text)),
                None => Ok(ArgInfo::unresolved(ArgSource::Allocation, text)),
            }
        }

        _ => Ok(ArgInfo::unresolved(ArgSource::Unknown, text)),
    }
}

/// Resolve every argument of the invoke at `pc` and, if they all resolve,
/// execute it for the concrete result. `None` means unresolved.
fn resolve_invoke(
    vm: &mut Vm,
    method: &MethodDef,
    pc: usize,
    ins: &Ins,
    depth: usize,
) -> Result<Option<Value>> {
    if depth > MAX_RESOLVE_DEPTH {
        debug!("invoke resolution depth exceeded at {pc:#06x}");
        return Ok(None);
    }

    let index = Rc::clone(&vm.index);
    let container = index.container(method.container);

    let kind = ins.invoke_kind().expect("caller checked this is an invoke");
    let idx = ins.invoke_target().expect("invoke has a method index");
    let regs = ins.invoke_args().expect("invoke has argument registers");

    let sig = container.method_sig(idx as u32)?;
    let trace_text = container.disassemble(ins);

    let mut args = Vec::new();
    let mut at = 0usize;

    let mut widths = Vec::new();
    if kind.has_receiver() {
        widths.push(false);
    }
    for param in &sig.params {
        widths.push(FieldType::parse(param).map(|t| t.is_wide()).unwrap_or(false));
    }

    for wide in widths {
        let Some(reg) = regs.get(at).copied() else {
            return Ok(None);
        };
        at += if wide { 2 } else { 1 };

        let info = trace_register(vm, method, pc, reg, depth)?;
        if !info.resolved {
            debug!("argument v{reg} of {} unresolved: {}", sig.signature, info.detail);
            return Ok(None);
        }
        args.push(info.value.expect("resolved info carries a value"));
    }

    let result = vm.dispatch_invoke(kind, &sig, args, &trace_text)?;
    Ok(Some(result.unwrap_or(Value::Null)))
}

fn resolve_filled_array(
    vm: &mut Vm,
    method: &MethodDef,
    pc: usize,
    ins: &Ins,
    text: &str,
    depth: usize,
) -> Result<ArgInfo> {
    use interpreter::object::Array;

    let index = Rc::clone(&vm.index);
    let descriptor = match &ins.operands {
        Operands::Call { idx, .. } => index
            .container(method.container)
            .type_desc(*idx as u32)?
            .to_string(),
        Operands::CallRange { idx, .. } => index
            .container(method.container)
            .type_desc(*idx as u32)?
            .to_string(),
        _ => return Ok(ArgInfo::unresolved(ArgSource::Allocation, text)),
    };

    let Some(element) = descriptor.strip_prefix('[') else {
        return Ok(ArgInfo::unresolved(ArgSource::Allocation, text));
    };

    let regs: Vec<u16> = match &ins.operands {
        Operands::Call { args, .. } => args.iter().map(|a| *a as u16).collect(),
        Operands::CallRange { first, count, .. } => {
            (*first..*first + *count as u16).collect()
        }
        _ => Vec::new(),
    };
    let mut values = Vec::with_capacity(regs.len());
    for reg in regs {
        let info = trace_register(vm, method, pc, reg, depth)?;
        if !info.resolved {
            return Ok(ArgInfo::unresolved(ArgSource::Allocation, text));
        }
        values.push(info.value.expect("resolved info carries a value"));
    }

    Ok(ArgInfo::resolved(
        Value::Array(Array::with_values(element, values)),
        ArgSource::Allocation,
        text,
    ))
}
