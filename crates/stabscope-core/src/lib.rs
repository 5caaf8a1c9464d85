//! # stabscope-core
//!
//! Entity model for reconstructed C++ programs. This crate defines the
//! graph a reconstruction produces: namespaces, classes with inheritance
//! and vtables, functions with variants, source and header files. All
//! cross-references are 32-bit indices into owning vectors; there is no
//! shared ownership and no cycle.

pub mod index;
pub mod model;
pub mod program;

pub use index::EntityIndex;
pub use model::{
    BaseClass, BaseVisibility, Class, Enum, Function, FunctionInstruction, FunctionVariant,
    HeaderFile, Namespace, NonVirtualThunk, SourceFile, VTable, VTableEntry, Variable,
    VariableKind,
};
pub use program::ProgramModel;
