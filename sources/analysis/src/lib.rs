//! Static recovery of call-site arguments.
//!
//! The backward analyzer reconstructs what a register held at a pc; the
//! forward analyzer fills in post-allocation initialisation; the dependency
//! analyzer enumerates what a method body needs before it can run honestly.

use anyhow::{anyhow, Result};
use std::fmt;
use std::rc::Rc;

use dex::MethodDef;
use interpreter::object::Value;
use interpreter::Vm;
use support::descriptor::FieldType;

pub mod backward;
pub mod deps;
pub mod forward;

pub use backward::trace_register;
pub use deps::{analyze_method, MethodDependencies};
pub use forward::enrich_allocation;

/// How deep invoke-result resolution may recurse before giving up.
pub const MAX_RESOLVE_DEPTH: usize = 4;

/// Where a recovered argument came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgSource {
    Const,
    ConstString,
    MoveChain,
    StaticField,
    InvokeResult,
    Parameter,
    Allocation,
    Unknown,
}

impl fmt::Display for ArgSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgSource::Const => "const",
            ArgSource::ConstString => "const-string",
            ArgSource::MoveChain => "move-chain",
            ArgSource::StaticField => "static-field",
            ArgSource::InvokeResult => "invoke-result",
            ArgSource::Parameter => "parameter",
            ArgSource::Allocation => "allocation",
            ArgSource::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// The result of tracing one register backwards from a pc.
#[derive(Debug, Clone)]
pub struct ArgInfo {
    pub resolved: bool,
    pub value: Option<Value>,
    pub source: ArgSource,
    pub detail: String,
}

impl ArgInfo {
    pub fn resolved(value: Value, source: ArgSource, detail: impl Into<String>) -> ArgInfo {
        ArgInfo {
            resolved: true,
            value: Some(value),
            source,
            detail: detail.into(),
        }
    }

    pub fn unresolved(source: ArgSource, detail: impl Into<String>) -> ArgInfo {
        ArgInfo {
            resolved: false,
            value: None,
            source,
            detail: detail.into(),
        }
    }

    /// The value to emulate with: the recovered one, or a null placeholder
    /// for best-effort execution of partially resolved sites.
    pub fn value_or_default(&self) -> Value {
        self.value.clone().unwrap_or(Value::Null)
    }
}

/// Reconstruct every argument of the invoke at `pc` in `caller`, receiver
/// first for instance calls. Unresolved arguments come back tagged, not
/// dropped; the host decides whether to attempt execution anyway.
pub fn recover_call_args(vm: &mut Vm, caller: &MethodDef, pc: usize) -> Result<Vec<ArgInfo>> {
    let index = Rc::clone(&vm.index);
    let trace = index
        .trace_map(&caller.signature)
        .ok_or_else(|| anyhow!("{} has no trace map", caller.signature))?;
    let entry = trace
        .get(pc)
        .ok_or_else(|| anyhow!("{}: no instruction at pc {pc:#06x}", caller.signature))?;

    let kind = entry
        .ins
        .invoke_kind()
        .ok_or_else(|| anyhow!("{}: pc {pc:#06x} is not a call site", caller.signature))?;
    let idx = entry.ins.invoke_target().expect("invoke has a method index");
    let regs = entry.ins.invoke_args().expect("invoke has argument registers");

    let sig = index.container(caller.container).method_sig(idx as u32)?;

    let mut infos = Vec::new();
    let mut at = 0usize;

    let mut next_reg = |wide: bool| -> Result<u16> {
        let reg = regs
            .get(at)
            .copied()
            .ok_or_else(|| anyhow!("{}: call site is short argument registers", sig.signature))?;
        at += if wide { 2 } else { 1 };
        Ok(reg)
    };

    if kind.has_receiver() {
        let reg = next_reg(false)?;
        infos.push(trace_register(vm, caller, pc, reg, 0)?);
    }

    for param in &sig.params {
        let wide = FieldType::parse(param).map(|t| t.is_wide()).unwrap_or(false);
        let reg = next_reg(wide)?;
        infos.push(trace_register(vm, caller, pc, reg, 0)?);
    }

    Ok(infos)
}
