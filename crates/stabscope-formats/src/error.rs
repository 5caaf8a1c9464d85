//! Error types for Mach-O container parsing.

use thiserror::Error;

/// Error type for Mach-O container parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// I/O error reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither a Mach-O magic nor a fat magic at the start of the file.
    #[error("not a Mach-O file: magic bytes {magic:02x?}")]
    NotMachO { magic: Vec<u8> },

    /// A header, command, or table runs past the end of its slice.
    #[error("{structure} truncated: need {needed} bytes, {available} available")]
    Truncated {
        structure: &'static str,
        needed: usize,
        available: usize,
    },

    /// A header, command, or table fails its structural checks.
    #[error("malformed {structure} at offset {offset:#x}: {reason}")]
    Malformed {
        structure: &'static str,
        offset: u64,
        reason: String,
    },

    /// No LC_DYSYMTAB load command, so the external relocation table
    /// cannot be located.
    #[error("no LC_DYSYMTAB load command")]
    MissingDysymtab,

    /// 64-bit Mach-O files are not supported.
    #[error("64-bit Mach-O is not supported")]
    Unsupported64Bit,

    /// The requested CPU slice is absent from the binary.
    #[error("no {0} slice in this binary")]
    MissingArchitecture(&'static str),
}

impl ParseError {
    /// Unrecognised magic bytes.
    pub fn not_macho(magic: &[u8]) -> Self {
        Self::NotMachO {
            magic: magic.to_vec(),
        }
    }

    /// A structure needing `needed` bytes where only `available` remain.
    pub fn truncated(structure: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            structure,
            needed,
            available,
        }
    }

    /// A structure at `offset` that fails its structural checks.
    pub fn malformed(structure: &'static str, offset: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            structure,
            offset,
            reason: reason.into(),
        }
    }
}
