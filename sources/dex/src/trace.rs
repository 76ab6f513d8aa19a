//! Per-method trace maps.
//!
//! A trace map is the ordered `pc -> (disassembly, length)` view of one
//! method body. It serves three customers: the data-flow analyzers walk it
//! forwards and backwards, error reports quote it, and its invoke lines are
//! the normalization-proof lookup keys for methods whose signatures do not
//! survive string round-trips.

use std::collections::BTreeMap;

use crate::code::{decode, Ins};
use crate::container::Container;
use crate::error::DexError;

#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub text: String,
    pub len: usize,
    pub ins: Ins,
}

#[derive(Debug, Default)]
pub struct TraceMap {
    entries: BTreeMap<usize, TraceEntry>,
}

impl TraceMap {
    /// Decode and render every instruction of `units`, including payload
    /// pseudo-instructions, front to back.
    pub fn build(container: &Container, units: &[u16]) -> Result<TraceMap, DexError> {
        let mut entries = BTreeMap::new();
        let mut pc = 0;

        while pc < units.len() {
            let ins = decode(units, pc)?;
            let text = container.disassemble(&ins);
            let len = ins.len;

            entries.insert(pc, TraceEntry { text, len, ins });
            pc += len;
        }

        Ok(TraceMap { entries })
    }

    pub fn get(&self, pc: usize) -> Option<&TraceEntry> {
        self.entries.get(&pc)
    }

    pub fn contains(&self, pc: usize) -> bool {
        self.entries.contains_key(&pc)
    }

    /// Entries with pc strictly less than `pc`, nearest first.
    pub fn before(&self, pc: usize) -> impl Iterator<Item = (usize, &TraceEntry)> {
        self.entries.range(..pc).rev().map(|(k, v)| (*k, v))
    }

    /// Entries with pc strictly greater than `pc`, in program order.
    pub fn after(&self, pc: usize) -> impl Iterator<Item = (usize, &TraceEntry)> {
        self.entries
            .range(pc + 1..)
            .map(|(k, v)| (*k, v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &TraceEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
