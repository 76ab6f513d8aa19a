//! DEX containers, bytecode decoding and the unified multi-container index.

pub mod build;
pub mod code;
pub mod container;
pub mod error;
pub mod index;
pub mod trace;

pub use code::{decode, Ins, InvokeKind, Opcode, Operands};
pub use container::{CodeItem, Container, FieldRef, MethodFlags, MethodSig};
pub use error::DexError;
pub use index::{DexIndex, MethodDef};
pub use trace::{TraceEntry, TraceMap};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::ContainerBuilder;

    fn two_container_index() -> DexIndex {
        let mut first = ContainerBuilder::new();
        first.string("alpha");
        first.method(
            "LA;",
            "a",
            &[],
            "V",
            MethodFlags::STATIC,
            1,
            0,
            vec![0x000e],
        );

        let mut second = ContainerBuilder::new();
        second.string("beta");
        second.method(
            "LB;",
            "b",
            &[],
            "V",
            MethodFlags::STATIC,
            1,
            0,
            vec![0x000e],
        );

        DexIndex::new(vec![first.finish(), second.finish()])
    }

    #[test]
    fn string_pool_spans_containers() {
        let index = two_container_index();

        let first_len = index.container(0).strings.len();
        let global = index.global_string_index(1, 0);
        assert_eq!(global, first_len);

        // Every local string is reachable through its global index
        for container in 0..index.containers() {
            for local in 0..index.container(container).strings.len() {
                let global = index.global_string_index(container, local as u32);
                assert_eq!(
                    index.string(global),
                    Some(index.container(container).strings[local].as_str())
                );
            }
        }
    }

    #[test]
    fn signature_and_trace_lookups_agree() {
        let mut b = ContainerBuilder::new();
        let callee = b.method(
            "LT;",
            "id",
            &["I"],
            "I",
            MethodFlags::STATIC,
            1,
            1,
            vec![0x000f],
        );
        // invoke-static {v0}, LT;->id(I)I; move-result v0; return v0
        b.method(
            "LT;",
            "caller",
            &[],
            "I",
            MethodFlags::STATIC,
            1,
            0,
            vec![0x1071, callee, 0x0000, 0x000a, 0x000f],
        );

        let index = DexIndex::new(vec![b.finish()]);

        let by_sig = index.method_by_signature("LT;->id(I)I").unwrap();
        let trace = index.trace_map("LT;->caller()I").unwrap();
        let invoke_line = &trace.get(0).unwrap().text;
        let by_trace = index.method_by_trace(invoke_line).unwrap();

        assert_eq!(by_sig.signature, by_trace.signature);
    }

    #[test]
    fn call_sites_found_for_bare_and_full_targets() {
        let mut b = ContainerBuilder::new();
        let callee = b.method(
            "LT;",
            "id",
            &["I"],
            "I",
            MethodFlags::STATIC,
            1,
            1,
            vec![0x000f],
        );
        b.method(
            "LT;",
            "caller",
            &[],
            "I",
            MethodFlags::STATIC,
            1,
            0,
            vec![0x1071, callee, 0x0000, 0x000a, 0x000f],
        );

        let index = DexIndex::new(vec![b.finish()]);

        assert_eq!(
            index.find_all_call_sites("LT;->id(I)I"),
            vec![("LT;->caller()I".to_string(), 0)]
        );
        assert_eq!(
            index.find_all_call_sites("LT;->id"),
            vec![("LT;->caller()I".to_string(), 0)]
        );
        assert!(index.find_all_call_sites("LT;->missing").is_empty());
    }

    #[test]
    fn trace_map_covers_every_pc_with_nonzero_lengths() {
        let mut b = ContainerBuilder::new();
        b.method(
            "LT;",
            "sel",
            &["I"],
            "I",
            MethodFlags::STATIC,
            2,
            1,
            vec![
                // packed-switch v1, +8
                0x012b, 0x0008, 0x0000,
                // const/16 v0, 99; return v0
                0x0013, 0x0063, 0x000f,
                // const/16 v0, 10; return v0 (pad to even payload pc)
                0x0013, 0x000a,
                // payload at pc 8
                0x0100, 0x0001, 0x0000, 0x0000, 0x0006, 0x0000,
            ],
        );

        let index = DexIndex::new(vec![b.finish()]);
        let trace = index.trace_map("LT;->sel(I)I").unwrap();

        let mut expected_pc = 0;
        for (pc, entry) in trace.iter() {
            assert_eq!(pc, expected_pc);
            assert!(entry.len > 0);
            expected_pc += entry.len;
        }
        assert_eq!(expected_pc, 14);
    }
}
