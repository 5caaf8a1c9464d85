//! # stabscope-analysis
//!
//! Reconstruction of a C++ program model from a 32-bit Mach-O binary with
//! legacy STABS debug symbols and Itanium C++ ABI RTTI.
//!
//! The passes run sequentially over a [`BinaryImage`]:
//!
//! 1. Patch the image, writing synthetic tag words over the external
//!    relocations of the five well-known Itanium ABI symbols
//! 2. Walk the STABS records: source files (N_SO), functions (N_FUN),
//!    per-include code ranges (N_SOL), non-virtual thunks
//! 3. Decode `__ZTI` typeinfo structures into classes with base-class
//!    offsets, visibility, and virtualness, and `__ZTV` vtables into
//!    primary/secondary slot lists
//! 4. Infer classes (or namespaces) for declaration contexts that carried
//!    no RTTI, and flatten the inheritance lattice into per-class
//!    ancestor lists
//! 5. Classify every vtable slot as first declaration, override, or
//!    implicit inheritance; name pure-virtual slots from their overriders;
//!    and attribute slots to the base class that introduced them
//!
//! Everything is single-threaded and deterministic: entities are created
//! in symbol-table order, and the name maps are only ever probed, never
//! iterated.
//!
//! [`BinaryImage`]: stabscope_formats::BinaryImage

pub mod error;
pub mod patch;
pub mod reconstructor;
pub mod stabs;

mod functions;
mod infer;
mod reason;
mod rtti;
mod vtable;

pub use error::ReconstructError;
pub use patch::SyntheticTag;
pub use reconstructor::{Reconstructor, ReconstructorConfig};
pub use stabs::StabType;
