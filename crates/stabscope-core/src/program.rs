//! The reconstructed program graph and its lookup indices.

use std::collections::HashMap;

use crate::model::{
    Class, Enum, Function, HeaderFile, Namespace, NonVirtualThunk, SourceFile, Variable,
};
use crate::EntityIndex;

/// The complete reconstructed model of one binary.
///
/// Entity vectors own every record; the maps are lookup indices over them.
/// Entities are appended in symbol-table order, so the vectors are
/// deterministic for a given input. Map iteration order never influences
/// stored state — the maps are only ever probed by key.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgramModel {
    pub namespaces: Vec<Namespace>,
    pub enums: Vec<Enum>,
    pub variables: Vec<Variable>,
    pub classes: Vec<Class>,
    pub thunks: Vec<NonVirtualThunk>,
    pub functions: Vec<Function>,
    pub header_files: Vec<HeaderFile>,
    pub source_files: Vec<SourceFile>,

    /// Qualified name → namespace.
    pub name_to_namespace: HashMap<String, EntityIndex>,
    /// Qualified name → enum.
    pub name_to_enum: HashMap<String, EntityIndex>,
    /// Qualified name → class.
    pub name_to_class: HashMap<String, EntityIndex>,
    /// Thunk address → thunk.
    pub address_to_thunk: HashMap<u64, EntityIndex>,
    /// Demangled name → functions. One entry per compilation unit that
    /// defines the function, hence the multimap.
    pub name_to_function: HashMap<String, Vec<EntityIndex>>,
    /// Mangled name → functions.
    pub mangled_to_function: HashMap<String, Vec<EntityIndex>>,
    /// Variant start address → function.
    pub address_to_function: HashMap<u64, EntityIndex>,
    /// Name → header file.
    pub name_to_header_file: HashMap<String, EntityIndex>,
    /// Name → source file.
    pub name_to_source_file: HashMap<String, EntityIndex>,
}

impl ProgramModel {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a class by qualified name.
    pub fn class_by_name(&self, name: &str) -> Option<&Class> {
        self.name_to_class
            .get(name)
            .and_then(|idx| idx.get())
            .map(|i| &self.classes[i])
    }

    /// Looks up a namespace by qualified name.
    pub fn namespace_by_name(&self, name: &str) -> Option<&Namespace> {
        self.name_to_namespace
            .get(name)
            .and_then(|idx| idx.get())
            .map(|i| &self.namespaces[i])
    }

    /// Looks up the function whose variant starts at `address`.
    pub fn function_at(&self, address: u64) -> Option<&Function> {
        self.address_to_function
            .get(&address)
            .and_then(|idx| idx.get())
            .map(|i| &self.functions[i])
    }

    /// All functions with the given demangled name, in creation order.
    pub fn functions_by_name(&self, name: &str) -> Vec<&Function> {
        self.name_to_function
            .get(name)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|idx| idx.get())
                    .map(|i| &self.functions[i])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Looks up a thunk by address.
    pub fn thunk_at(&self, address: u64) -> Option<&NonVirtualThunk> {
        self.address_to_thunk
            .get(&address)
            .and_then(|idx| idx.get())
            .map(|i| &self.thunks[i])
    }
}
