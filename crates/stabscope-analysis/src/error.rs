//! Error types for reconstruction.
//!
//! Only container failures and, in strict mode, unsupported RTTI shapes
//! surface as errors. Model inconsistencies (base-class size mismatches,
//! vtable slots with no function record, unmatched secondary vtable
//! offsets) are reported as `tracing` warnings with the offending
//! location, and reconstruction keeps the partial result; debug builds
//! additionally assert.

use stabscope_formats::ParseError;
use thiserror::Error;

/// Error type for [`Reconstructor::load`](crate::Reconstructor::load).
#[derive(Error, Debug)]
pub enum ReconstructError {
    /// The container could not be read or parsed.
    #[error(transparent)]
    Format(#[from] ParseError),

    /// A `__vmi_class_type_info` with inheritance flags was found while
    /// strict VMI handling was requested.
    #[error("unsupported typeinfo for {class}: vmi flags {flags:#x}")]
    UnsupportedTypeInfo { class: String, flags: u32 },
}
