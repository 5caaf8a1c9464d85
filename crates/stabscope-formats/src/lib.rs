//! # stabscope-formats
//!
//! 32-bit Mach-O container parsing for stabscope. This crate provides:
//! - A from-scratch parser for thin and universal (fat) 32-bit Mach-O
//!   files, in both byte orders (i386 little-endian, PowerPC big-endian)
//! - The [`BinaryImage`] facade the reconstruction core consumes, so tests
//!   and other containers can substitute a synthetic image
//!
//! 64-bit Mach-O files are out of scope and rejected at the magic check.

pub mod error;
pub mod image;
pub mod macho;

pub use error::ParseError;
pub use image::{BinaryImage, Endian, ExternalRelocation, SectionRef, SymbolRecord};
pub use macho::{CpuType, MachImage};
