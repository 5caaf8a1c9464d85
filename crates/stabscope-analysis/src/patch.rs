//! Relocation patching.
//!
//! Unresolved external references leave zero words in the image, so the
//! RTTI and vtable decoders could not tell a `__class_type_info` vtable
//! pointer from a `__si_class_type_info` one, or a pure-virtual slot from
//! the end of a vtable. Before any decoding, every external relocation
//! against one of the five well-known Itanium ABI symbols is overwritten
//! with a synthetic tag word, making the referent recognisable by value.
//!
//! The tags live at `0x3fff_0000..=0x3fff_0004` and must not collide with
//! a code address in any loaded section.

use std::collections::HashMap;

use stabscope_formats::BinaryImage;
use tracing::{debug, warn};

/// Synthetic value written over a patched reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticTag {
    /// `__cxxabiv1::__enum_type_info` vtable.
    EnumTypeInfo,
    /// `__cxxabiv1::__class_type_info` vtable.
    ClassTypeInfo,
    /// `__cxxabiv1::__si_class_type_info` vtable.
    SiClassTypeInfo,
    /// `__cxxabiv1::__vmi_class_type_info` vtable.
    VmiClassTypeInfo,
    /// `__cxa_pure_virtual`.
    CxaPureVirtual,
}

impl SyntheticTag {
    /// The tag word written into the image.
    pub const fn value(self) -> u32 {
        match self {
            SyntheticTag::EnumTypeInfo => 0x3fff_0000,
            SyntheticTag::ClassTypeInfo => 0x3fff_0001,
            SyntheticTag::SiClassTypeInfo => 0x3fff_0002,
            SyntheticTag::VmiClassTypeInfo => 0x3fff_0003,
            SyntheticTag::CxaPureVirtual => 0x3fff_0004,
        }
    }

    /// Recognises a tag word.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x3fff_0000 => Some(SyntheticTag::EnumTypeInfo),
            0x3fff_0001 => Some(SyntheticTag::ClassTypeInfo),
            0x3fff_0002 => Some(SyntheticTag::SiClassTypeInfo),
            0x3fff_0003 => Some(SyntheticTag::VmiClassTypeInfo),
            0x3fff_0004 => Some(SyntheticTag::CxaPureVirtual),
            _ => None,
        }
    }

    /// Matches the Mach-O symbol names the tags stand in for.
    fn for_symbol(name: &str) -> Option<Self> {
        match name {
            "__ZTVN10__cxxabiv116__enum_type_infoE" => Some(SyntheticTag::EnumTypeInfo),
            "__ZTVN10__cxxabiv117__class_type_infoE" => Some(SyntheticTag::ClassTypeInfo),
            "__ZTVN10__cxxabiv120__si_class_type_infoE" => Some(SyntheticTag::SiClassTypeInfo),
            "__ZTVN10__cxxabiv121__vmi_class_type_infoE" => Some(SyntheticTag::VmiClassTypeInfo),
            "___cxa_pure_virtual" => Some(SyntheticTag::CxaPureVirtual),
            _ => None,
        }
    }
}

/// Patches every external relocation against the five Itanium ABI symbols
/// with its synthetic tag, in the image's natural byte order.
pub fn apply_synthetic_tags(image: &mut impl BinaryImage) {
    let mut tags: HashMap<u32, SyntheticTag> = HashMap::with_capacity(5);
    for (symbol_num, symbol) in image.symbols().iter().enumerate() {
        if let Some(tag) = SyntheticTag::for_symbol(&symbol.name) {
            tags.insert(symbol_num as u32, tag);
        }
    }

    let relocations = image.external_relocations().to_vec();
    let mut patched = 0usize;
    for relocation in &relocations {
        if let Some(&tag) = tags.get(&relocation.symbol_num) {
            if image.patch_u32(relocation.address, tag.value()) {
                patched += 1;
            } else {
                warn!(
                    address = format_args!("{:#x}", relocation.address),
                    ?tag,
                    "relocation address is not file-backed; tag not written"
                );
            }
        }
    }
    debug!(patched, "synthetic tags applied");
}
