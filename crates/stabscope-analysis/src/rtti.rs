//! Itanium RTTI typeinfo decoding.
//!
//! Layouts are the 32-bit `cxxabi.h` structures:
//!
//! ```text
//! __class_type_info      { u32 vfptr; u32 type_name; }
//! __si_class_type_info   { ..class..; u32 base_type; }
//! __vmi_class_type_info  { ..class..; u32 flags; u32 base_count;
//!                          { u32 base_type; u32 offset_flags; } base_info[]; }
//! ```
//!
//! After the relocation patcher has run, the `vfptr` word of every
//! typeinfo carries a [`SyntheticTag`] identifying its dynamic type, so
//! decoding dispatches on that word instead of resolving the ABI vtable
//! addresses.

use stabscope_core::{BaseClass, BaseVisibility};
use stabscope_demangle::Demangle;
use stabscope_formats::{BinaryImage, SymbolRecord};
use tracing::warn;

use crate::error::ReconstructError;
use crate::patch::SyntheticTag;
use crate::Reconstructor;

// __base_class_type_info::__offset_flags_masks
const BASE_VIRTUAL_MASK: u32 = 0x1;
const BASE_PUBLIC_MASK: u32 = 0x2;
const BASE_OFFSET_SHIFT: u32 = 8;

/// Length of the `typeinfo for ` prefix on demangled `__ZTI` symbols.
const TYPEINFO_PREFIX: &str = "typeinfo for ";

/// One raw `base_info` element of a `__vmi_class_type_info`.
#[derive(Debug, Clone, Copy)]
struct RawBaseInfo {
    base_type: u32,
    offset_flags: u32,
}

/// A decoded typeinfo record, dispatched on the patched vfptr tag.
#[derive(Debug)]
enum TypeInfoRecord {
    Enum,
    Class,
    SiClass { base_type: u32 },
    VmiClass { flags: u32, bases: Vec<RawBaseInfo> },
}

impl Reconstructor {
    /// Decodes one `__ZTI` symbol into classes and base-class links.
    pub(crate) fn decode_typeinfo<B: BinaryImage>(
        &mut self,
        image: &B,
        symbol: &SymbolRecord,
    ) -> Result<(), ReconstructError> {
        if !symbol.name.starts_with("__ZTI") {
            return Ok(());
        }
        let Some(demangled) = self.demangler.demangle(&symbol.name) else {
            warn!(name = %symbol.name, "typeinfo symbol does not demangle");
            return Ok(());
        };
        let class_name = demangled
            .strip_prefix(TYPEINFO_PREFIX)
            .unwrap_or(&demangled)
            .to_string();

        // Cross-check against the mangled name behind the type_name
        // pointer.
        if let Some(from_struct) = self.type_name_at(image, symbol.value) {
            if from_struct != class_name {
                warn!(
                    symbol = %class_name,
                    type_name = %from_struct,
                    "typeinfo symbol and type_name disagree"
                );
                debug_assert!(false, "typeinfo symbol and type_name disagree");
            }
        }

        let record = match self.read_typeinfo_record(image, symbol.value, &class_name)? {
            Some(record) => record,
            None => return Ok(()),
        };

        match record {
            TypeInfoRecord::Enum => {
                self.find_or_create_enum(&class_name);
            }
            TypeInfoRecord::Class => {
                self.find_or_create_class(&class_name);
            }
            TypeInfoRecord::SiClass { base_type } => {
                let main_class = self.find_or_create_class(&class_name);
                let Some(base_name) = self.type_name_at(image, u64::from(base_type)) else {
                    warn!(class = %class_name, "si typeinfo base does not resolve");
                    return Ok(());
                };
                // A single base carries neither offset nor visibility.
                let base_class = BaseClass {
                    class: self.find_or_create_class(&base_name),
                    ..Default::default()
                };
                self.model.classes[main_class.index()]
                    .direct_base_classes
                    .push(base_class);
            }
            TypeInfoRecord::VmiClass { flags: _, bases } => {
                let main_class = self.find_or_create_class(&class_name);
                for (position, base_info) in bases.iter().enumerate() {
                    let Some(base_name) =
                        self.type_name_at(image, u64::from(base_info.base_type))
                    else {
                        warn!(class = %class_name, "vmi typeinfo base does not resolve");
                        continue;
                    };

                    let base_offset = base_info.offset_flags >> BASE_OFFSET_SHIFT;
                    debug_assert!(base_offset < 0xffff);

                    let base_class_index = self.find_or_create_class(&base_name);

                    // The distance to the next base bounds this base's
                    // size.
                    if let Some(next) = bases.get(position + 1) {
                        let next_offset = next.offset_flags >> BASE_OFFSET_SHIFT;
                        let size = next_offset.saturating_sub(base_offset);
                        debug_assert!(size < 0xffff);
                        if size > 0 {
                            let base = &mut self.model.classes[base_class_index.index()];
                            if base.size == 0 {
                                base.size = size as u16;
                            } else if u32::from(base.size) != size {
                                // First recorded size wins.
                                warn!(
                                    class = %base.name,
                                    recorded = base.size,
                                    derived = size,
                                    "base class size disagreement"
                                );
                            }
                        }
                    }

                    self.model.classes[main_class.index()]
                        .direct_base_classes
                        .push(BaseClass {
                            class: base_class_index,
                            base_offset: base_offset as u16,
                            visibility: if base_info.offset_flags & BASE_PUBLIC_MASK != 0 {
                                BaseVisibility::Public
                            } else {
                                BaseVisibility::PrivateOrProtected
                            },
                            is_virtual: base_info.offset_flags & BASE_VIRTUAL_MASK != 0,
                        });
                }
            }
        }

        Ok(())
    }

    /// Reads the typeinfo structure at `vaddr`, dispatching on its patched
    /// vfptr word.
    fn read_typeinfo_record<B: BinaryImage>(
        &self,
        image: &B,
        vaddr: u64,
        class_name: &str,
    ) -> Result<Option<TypeInfoRecord>, ReconstructError> {
        let Some(vfptr) = image.read_u32_at(vaddr) else {
            warn!(class = %class_name, "truncated typeinfo");
            return Ok(None);
        };

        let record = match SyntheticTag::from_u32(vfptr) {
            Some(SyntheticTag::EnumTypeInfo) => TypeInfoRecord::Enum,
            Some(SyntheticTag::ClassTypeInfo) => TypeInfoRecord::Class,
            Some(SyntheticTag::SiClassTypeInfo) => {
                let Some(base_type) = image.read_u32_at(vaddr + 8) else {
                    warn!(class = %class_name, "truncated si typeinfo");
                    return Ok(None);
                };
                TypeInfoRecord::SiClass { base_type }
            }
            Some(SyntheticTag::VmiClassTypeInfo) => {
                let (Some(flags), Some(base_count)) =
                    (image.read_u32_at(vaddr + 8), image.read_u32_at(vaddr + 12))
                else {
                    warn!(class = %class_name, "truncated vmi typeinfo");
                    return Ok(None);
                };

                if flags != 0 {
                    if self.config.strict_vmi {
                        return Err(ReconstructError::UnsupportedTypeInfo {
                            class: class_name.to_string(),
                            flags,
                        });
                    }
                    warn!(
                        class = %class_name,
                        flags = format_args!("{flags:#x}"),
                        "vmi typeinfo carries inheritance flags; base offsets may be unreliable"
                    );
                }

                let mut bases = Vec::with_capacity(base_count as usize);
                for i in 0..u64::from(base_count) {
                    let entry = vaddr + 16 + 8 * i;
                    let (Some(base_type), Some(offset_flags)) =
                        (image.read_u32_at(entry), image.read_u32_at(entry + 4))
                    else {
                        warn!(class = %class_name, "truncated vmi base_info array");
                        break;
                    };
                    bases.push(RawBaseInfo {
                        base_type,
                        offset_flags,
                    });
                }
                TypeInfoRecord::VmiClass { flags, bases }
            }
            Some(SyntheticTag::CxaPureVirtual) | None => {
                warn!(
                    class = %class_name,
                    vfptr = format_args!("{vfptr:#x}"),
                    "typeinfo vfptr carries no recognised tag"
                );
                return Ok(None);
            }
        };

        Ok(Some(record))
    }

    /// Resolves the demangled class name of the typeinfo structure at
    /// `typeinfo_addr` via its `type_name` pointer.
    fn type_name_at<B: BinaryImage>(&self, image: &B, typeinfo_addr: u64) -> Option<String> {
        let type_name_ptr = image.read_u32_at(typeinfo_addr + 4)?;
        let mangled = image.cstring_at(u64::from(type_name_ptr))?;
        self.demangler.demangle_type_name(&mangled)
    }
}
