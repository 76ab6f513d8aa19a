//! The unified view over one or more DEX containers.
//!
//! Multi-DEX archives ship `classes.dex`, `classes2.dex`, ... with disjoint
//! string tables and method id spaces. The index concatenates the string
//! pools behind per-container base offsets and flattens every method body
//! into one signature-keyed table, so the rest of the system never thinks
//! about which container something came from.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::container::{CodeItem, Container, MethodFlags};
use crate::error::DexError;
use crate::trace::TraceMap;

/// One resolvable method. `code` is absent for abstract and native methods
/// and for methods only referenced, never defined, in the indexed containers.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub signature: String,
    pub class: String,
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
    pub flags: MethodFlags,
    pub code: Option<CodeItem>,
    pub container: usize,
}

impl MethodDef {
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodFlags::STATIC)
    }
}

#[derive(Debug, Default)]
pub struct DexIndex {
    containers: Vec<Container>,
    string_bases: Vec<usize>,
    methods: HashMap<String, Rc<MethodDef>>,
    traces: HashMap<String, Rc<TraceMap>>,
}

impl DexIndex {
    pub fn new(containers: Vec<Container>) -> DexIndex {
        let mut string_bases = Vec::with_capacity(containers.len());
        let mut base = 0usize;
        for container in &containers {
            string_bases.push(base);
            base += container.strings.len();
        }

        let mut methods = HashMap::new();
        let mut traces = HashMap::new();

        for (container_id, container) in containers.iter().enumerate() {
            for class in &container.classes {
                for method in &class.methods {
                    let sig = match container.method_sig(method.method_idx) {
                        Ok(sig) => sig,
                        Err(e) => {
                            warn!("skipping method with broken id: {e}");
                            continue;
                        }
                    };

                    if let Some(code) = &method.code {
                        match TraceMap::build(container, &code.units) {
                            Ok(map) => {
                                traces.insert(sig.signature.clone(), Rc::new(map));
                            }
                            Err(e) => {
                                warn!("cannot disassemble {}: {e}", sig.signature);
                            }
                        }
                    }

                    methods.insert(
                        sig.signature.clone(),
                        Rc::new(MethodDef {
                            signature: sig.signature,
                            class: sig.class,
                            name: sig.name,
                            params: sig.params,
                            return_type: sig.return_type,
                            flags: method.flags,
                            code: method.code.clone(),
                            container: container_id,
                        }),
                    );
                }
            }
        }

        DexIndex {
            containers,
            string_bases,
            methods,
            traces,
        }
    }

    pub fn container(&self, id: usize) -> &Container {
        &self.containers[id]
    }

    pub fn containers(&self) -> usize {
        self.containers.len()
    }

    /// Look up a string by its unified (cross-container) index.
    pub fn string(&self, global: usize) -> Option<&str> {
        let container_id = match self
            .string_bases
            .binary_search(&global)
        {
            Ok(exact) => exact,
            Err(insert) => insert.checked_sub(1)?,
        };

        let local = global - self.string_bases[container_id];
        self.containers[container_id]
            .strings
            .get(local)
            .map(|s| s.as_str())
    }

    /// Translate a container-local string index into the unified pool.
    pub fn global_string_index(&self, container: usize, local: u32) -> usize {
        self.string_bases[container] + local as usize
    }

    /// Resolve a container-local string index, as `const-string` sees it.
    pub fn string_in(&self, container: usize, local: u32) -> Result<&str, DexError> {
        self.containers[container]
            .string(local)
            .map_err(|_| DexError::BadStringIndex(local))
    }

    pub fn method_by_signature(&self, sig: &str) -> Option<Rc<MethodDef>> {
        self.methods.get(sig).cloned()
    }

    /// Resolve a method from its trace-text form. Accepts a full invoke line
    /// (`invoke-static {v0, v1}, Lcls;->m(II)I`) or the bare signature; the
    /// signature is always the final whitespace-separated token.
    pub fn method_by_trace(&self, text: &str) -> Option<Rc<MethodDef>> {
        let token = text.trim().rsplit(' ').next()?;
        self.methods.get(token).cloned()
    }

    /// All methods of `class` named `name`, sorted by signature so that
    /// overload ambiguity at least resolves deterministically.
    pub fn find_methods(&self, class: &str, name: &str) -> Vec<Rc<MethodDef>> {
        let mut out: Vec<_> = self
            .methods
            .values()
            .filter(|def| def.class == class && def.name == name)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.signature.cmp(&b.signature));
        out
    }

    pub fn trace_map(&self, sig: &str) -> Option<Rc<TraceMap>> {
        self.traces.get(sig).cloned()
    }

    pub fn methods(&self) -> impl Iterator<Item = &Rc<MethodDef>> {
        self.methods.values()
    }

    /// Every `(caller signature, pc)` at which `target` is invoked. `target`
    /// may be a full signature or the bare `Lcls;->name` form, which matches
    /// all overloads.
    pub fn find_all_call_sites(&self, target: &str) -> Vec<(String, usize)> {
        let matches_target = |sig: &str| {
            if target.contains('(') {
                sig == target
            } else {
                sig.strip_prefix(target)
                    .map(|rest| rest.starts_with('('))
                    .unwrap_or(false)
            }
        };

        let mut sites = Vec::new();
        for (caller, trace) in &self.traces {
            let def = match self.methods.get(caller) {
                Some(def) => def,
                None => continue,
            };
            let container = &self.containers[def.container];

            for (pc, entry) in trace.iter() {
                let Some(idx) = entry.ins.invoke_target() else {
                    continue;
                };

                match container.method_sig(idx as u32) {
                    Ok(sig) if matches_target(&sig.signature) => {
                        sites.push((caller.clone(), pc));
                    }
                    _ => {}
                }
            }
        }

        sites.sort();
        sites
    }
}
