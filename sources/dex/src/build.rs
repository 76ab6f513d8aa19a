//! Programmatic container construction.
//!
//! Tests and tooling need method bodies without hand-crafting a binary DEX
//! file. The builder interns strings, types, protos, fields and methods the
//! way a real container lays them out, so everything downstream (index,
//! trace maps, analyzers, interpreter) exercises the same code paths either
//! way.

use std::collections::HashMap;

use crate::container::{
    ClassDef, CodeItem, Container, EncodedMethod, FieldId, MethodFlags, MethodId, Proto, NO_INDEX,
};

#[derive(Default)]
pub struct ContainerBuilder {
    strings: Vec<String>,
    string_map: HashMap<String, u32>,
    types: Vec<u32>,
    type_map: HashMap<String, u16>,
    protos: Vec<Proto>,
    proto_map: HashMap<String, u16>,
    fields: Vec<FieldId>,
    field_map: HashMap<String, u16>,
    methods: Vec<MethodId>,
    method_map: HashMap<String, u16>,
    // Class descriptor -> bodies, in insertion order
    classes: Vec<(String, Vec<EncodedMethod>)>,
}

impl ContainerBuilder {
    pub fn new() -> ContainerBuilder {
        ContainerBuilder::default()
    }

    /// Intern a string, returning its container-local index.
    pub fn string(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.string_map.get(s) {
            return *idx;
        }

        let idx = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_map.insert(s.to_string(), idx);
        idx
    }

    /// Intern a type descriptor, returning its type index.
    pub fn type_id(&mut self, descriptor: &str) -> u16 {
        if let Some(idx) = self.type_map.get(descriptor) {
            return *idx;
        }

        let string_idx = self.string(descriptor);
        let idx = self.types.len() as u16;
        self.types.push(string_idx);
        self.type_map.insert(descriptor.to_string(), idx);
        idx
    }

    /// Intern a field reference, returning the field index usable in
    /// `iget`/`iput`/`sget`/`sput` operands.
    pub fn field(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        let key = format!("{class}->{name}:{descriptor}");
        if let Some(idx) = self.field_map.get(&key) {
            return *idx;
        }

        let class_idx = self.type_id(class);
        let type_idx = self.type_id(descriptor);
        let name_idx = self.string(name);

        let idx = self.fields.len() as u16;
        self.fields.push(FieldId {
            class_idx,
            type_idx,
            name_idx,
        });
        self.field_map.insert(key, idx);
        idx
    }

    fn proto(&mut self, params: &[&str], ret: &str) -> u16 {
        let key = format!("({}){}", params.concat(), ret);
        if let Some(idx) = self.proto_map.get(&key) {
            return *idx;
        }

        let shorty: String = std::iter::once(shorty_char(ret))
            .chain(params.iter().map(|p| shorty_char(p)))
            .collect();
        let shorty_idx = self.string(&shorty);
        let return_idx = self.type_id(ret) as u32;
        let param_ids = params.iter().map(|p| self.type_id(p)).collect();

        let idx = self.protos.len() as u16;
        self.protos.push(Proto {
            shorty_idx,
            return_idx,
            params: param_ids,
        });
        self.proto_map.insert(key, idx);
        idx
    }

    /// Intern a method reference without a body, returning the method index
    /// usable in `invoke-*` operands. Framework calls resolved by the mock
    /// layer only ever exist in this form.
    pub fn method_ref(&mut self, class: &str, name: &str, params: &[&str], ret: &str) -> u16 {
        let key = format!("{class}->{name}({}){}", params.concat(), ret);
        if let Some(idx) = self.method_map.get(&key) {
            return *idx;
        }

        let class_idx = self.type_id(class);
        let proto_idx = self.proto(params, ret);
        let name_idx = self.string(name);

        let idx = self.methods.len() as u16;
        self.methods.push(MethodId {
            class_idx,
            proto_idx,
            name_idx,
        });
        self.method_map.insert(key, idx);
        idx
    }

    /// Define a method with a body. Parameters occupy the last `ins`
    /// registers of `registers`, wides counting twice.
    #[allow(clippy::too_many_arguments)]
    pub fn method(
        &mut self,
        class: &str,
        name: &str,
        params: &[&str],
        ret: &str,
        flags: MethodFlags,
        registers: u16,
        ins: u16,
        units: Vec<u16>,
    ) -> u16 {
        let idx = self.method_ref(class, name, params, ret);

        let encoded = EncodedMethod {
            method_idx: idx as u32,
            flags,
            code: Some(CodeItem {
                registers,
                ins,
                outs: 0,
                units: units.into(),
            }),
        };

        match self.classes.iter_mut().find(|(c, _)| c == class) {
            Some((_, methods)) => methods.push(encoded),
            None => self.classes.push((class.to_string(), vec![encoded])),
        }

        idx
    }

    pub fn finish(mut self) -> Container {
        let classes = std::mem::take(&mut self.classes)
            .into_iter()
            .map(|(class, methods)| ClassDef {
                type_idx: self.type_id(&class) as u32,
                access_flags: 0,
                superclass_idx: NO_INDEX,
                methods,
            })
            .collect();

        Container {
            strings: self.strings,
            types: self.types,
            protos: self.protos,
            fields: self.fields,
            methods: self.methods,
            classes,
        }
    }
}

fn shorty_char(descriptor: &str) -> char {
    match descriptor.chars().next() {
        Some('L') | Some('[') => 'L',
        Some(c) => c,
        None => 'V',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::DexIndex;

    #[test]
    fn built_methods_index_and_disassemble() {
        let mut b = ContainerBuilder::new();
        // add-int v0, v1, v2; return v0
        b.method(
            "LT;",
            "add",
            &["I", "I"],
            "I",
            MethodFlags::PUBLIC | MethodFlags::STATIC,
            3,
            2,
            vec![0x0090, 0x0201, 0x000f],
        );

        let index = DexIndex::new(vec![b.finish()]);
        let def = index.method_by_signature("LT;->add(II)I").unwrap();
        assert_eq!(def.params, vec!["I", "I"]);
        assert!(def.is_static());

        let trace = index.trace_map("LT;->add(II)I").unwrap();
        assert_eq!(trace.get(0).unwrap().text, "add-int v0, v1, v2");
        assert_eq!(trace.get(2).unwrap().text, "return v0");
    }

    #[test]
    fn interning_is_stable() {
        let mut b = ContainerBuilder::new();
        let a = b.string("hello");
        let c = b.string("hello");
        assert_eq!(a, c);

        let t1 = b.type_id("Ljava/lang/String;");
        let t2 = b.type_id("Ljava/lang/String;");
        assert_eq!(t1, t2);
    }
}
