//! Dependency enumeration: what a method body touches before it can run.

use std::collections::BTreeSet;
use std::collections::VecDeque;

use dex::{DexIndex, MethodDef, Opcode, Operands};

/// Everything one walk of a method's trace map surfaces: static fields it
/// reads or writes, classes whose `<clinit>` must run, and callees.
#[derive(Debug, Default, Clone)]
pub struct MethodDependencies {
    pub static_fields: Vec<(String, String)>,
    pub classes_needing_init: Vec<String>,
    pub methods_called: Vec<String>,
}

/// Walk `method`'s trace map once; with `recursive`, transitively analyze
/// callees whose bodies exist in the index, bounded by a seen-set.
pub fn analyze_method(index: &DexIndex, method: &MethodDef, recursive: bool) -> MethodDependencies {
    let mut fields = BTreeSet::new();
    let mut classes = BTreeSet::new();
    let mut methods = BTreeSet::new();

    let mut queue = VecDeque::new();
    let mut seen = BTreeSet::new();

    queue.push_back(method.signature.clone());
    seen.insert(method.signature.clone());

    while let Some(signature) = queue.pop_front() {
        let Some(def) = index.method_by_signature(&signature) else {
            continue;
        };
        let Some(trace) = index.trace_map(&signature) else {
            continue;
        };
        let container = index.container(def.container);

        for (_, entry) in trace.iter() {
            match (&entry.ins.op, &entry.ins.operands) {
                (
                    Opcode::Sget
                    | Opcode::SgetWide
                    | Opcode::SgetObject
                    | Opcode::SgetBoolean
                    | Opcode::SgetByte
                    | Opcode::SgetChar
                    | Opcode::SgetShort
                    | Opcode::Sput
                    | Opcode::SputWide
                    | Opcode::SputObject
                    | Opcode::SputBoolean
                    | Opcode::SputByte
                    | Opcode::SputChar
                    | Opcode::SputShort,
                    Operands::RegIdx { idx, .. },
                ) => {
                    if let Ok(field) = container.field_ref(*idx) {
                        classes.insert(field.class.clone());
                        fields.insert((field.class, field.name));
                    }
                }
                _ => {}
            }

            if entry.ins.invoke_kind().is_some() {
                let idx = entry.ins.invoke_target().expect("invoke has a method index");
                if let Ok(sig) = container.method_sig(idx as u32) {
                    methods.insert(sig.signature.clone());

                    if recursive && !seen.contains(&sig.signature) {
                        let has_body = index
                            .method_by_signature(&sig.signature)
                            .map(|def| def.code.is_some())
                            .unwrap_or(false);
                        if has_body {
                            seen.insert(sig.signature.clone());
                            queue.push_back(sig.signature);
                        }
                    }
                }
            }
        }
    }

    MethodDependencies {
        static_fields: fields.into_iter().collect(),
        classes_needing_init: classes.into_iter().collect(),
        methods_called: methods.into_iter().collect(),
    }
}
