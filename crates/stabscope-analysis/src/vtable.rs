//! Vtable decoding.
//!
//! A `__ZTV` symbol covers the whole vtable group of a class:
//!
//! ```text
//! { i32 offset_to_this; u32 type_info; u32 slots[]; }   // primary, offset_to_this == 0
//! { i32 offset_to_this; u32 type_info; u32 slots[]; }   // secondary, one per base subobject
//! ...
//! ```
//!
//! There is no slot count: a vtable ends at a zero word, at the enclosing
//! section's end, or where the class typeinfo pointer reappears — the
//! word before that reappearance is the next vtable's (negative)
//! `offset_to_this`, and its magnitude is the base offset the secondary
//! vtable serves.
//!
//! GCC emits two destructor slots per vtable (the non-deleting and the
//! deleting destructor); both resolve through the function index like any
//! other slot.

use stabscope_core::{VTable, VTableEntry};
use stabscope_demangle::Demangle;
use stabscope_formats::{BinaryImage, SymbolRecord};
use tracing::warn;

use crate::patch::SyntheticTag;
use crate::Reconstructor;

/// Length of the `vtable for ` prefix on demangled `__ZTV` symbols.
const VTABLE_PREFIX: &str = "vtable for ";

/// Sections whose addresses count as function code.
const CODE_SECTIONS: [&str; 2] = ["__text", "__textcoal_nt"];

impl Reconstructor {
    /// Decodes one `__ZTV` symbol into the owning class's vtable list.
    pub(crate) fn decode_vtable<B: BinaryImage>(&mut self, image: &B, symbol: &SymbolRecord) {
        if !symbol.name.starts_with("__ZTV") {
            return;
        }
        let Some(demangled) = self.demangler.demangle(&symbol.name) else {
            warn!(name = %symbol.name, "vtable symbol does not demangle");
            return;
        };
        let class_name = demangled
            .strip_prefix(VTABLE_PREFIX)
            .unwrap_or(&demangled)
            .to_string();

        let Some(section_end) = image.section_at(symbol.value).map(|s| s.end()) else {
            warn!(class = %class_name, "vtable symbol points outside any section");
            return;
        };

        let base = symbol.value;
        let Some(offset_to_this) = image.read_u32_at(base) else {
            warn!(class = %class_name, "truncated vtable header");
            return;
        };
        debug_assert_eq!(offset_to_this, 0, "primary vtable offset_to_this");
        let Some(type_info_ptr) = image.read_u32_at(base + 4) else {
            warn!(class = %class_name, "truncated vtable header");
            return;
        };

        let class_index = self.find_or_create_class(&class_name);
        if !self.model.classes[class_index.index()].vtables.is_empty() {
            warn!(class = %class_name, "duplicate vtable symbol; keeping the first decode");
            debug_assert!(false, "duplicate vtable symbol");
            return;
        }

        // The class being filled and the lookup tables the slots resolve
        // through are disjoint fields of the model.
        let model = &mut self.model;
        let class = &mut model.classes[class_index.index()];

        class.vtables.push(VTable::default());
        let mut current = 0usize;

        let mut cursor = base + 8;
        loop {
            if cursor + 4 > section_end {
                break; // end of the vtable section
            }
            let Some(word) = image.read_u32_at(cursor) else {
                break;
            };
            if word == 0 {
                break; // end of the whole vtable group
            }

            // The class typeinfo pointer reappearing one word ahead marks
            // a secondary vtable header; the current word is its
            // offset_to_this.
            if cursor + 8 <= section_end && image.read_u32_at(cursor + 4) == Some(type_info_ptr) {
                let negated = -i64::from(word as i32);
                if !(0..0xffff).contains(&negated) {
                    warn!(
                        class = %class_name,
                        offset_to_this = word as i32,
                        "secondary vtable offset out of range"
                    );
                    debug_assert!(false, "secondary vtable offset out of range");
                    break;
                }
                class.vtables.push(VTable {
                    offset: negated as u16,
                    ..Default::default()
                });
                current += 1;
                cursor += 8;
                continue;
            }

            let mut entry = VTableEntry::default();

            // Secondary vtables reach most functions through non-virtual
            // thunks.
            if current >= 1 {
                if let Some(&thunk_index) = model.address_to_thunk.get(&u64::from(word)) {
                    let thunk = &model.thunks[thunk_index.index()];
                    entry.thunk = thunk_index;
                    entry.name = thunk.name.clone();
                    entry.is_dtor = thunk.is_dtor;
                    class.vtables[current].entries.push(entry);
                    cursor += 4;
                    continue;
                }
            }

            if SyntheticTag::from_u32(word) == Some(SyntheticTag::CxaPureVirtual) {
                // Not a function pointer. The name is back-filled by the
                // reasoner from an overriding class.
                entry.is_pure_virtual = true;
                class.vtables[current].entries.push(entry);
                cursor += 4;
                continue;
            }

            let Some(function_section) = image.section_at(u64::from(word)) else {
                break; // unknown entity
            };
            if !CODE_SECTIONS.contains(&function_section.name) {
                break; // address does not belong to a function
            }

            match model.address_to_function.get(&u64::from(word)) {
                Some(&function_index) => {
                    let function = &model.functions[function_index.index()];
                    entry.function = function_index;
                    entry.name = function.name.clone();
                    entry.is_dtor = function.is_ctor_or_dtor;
                    class.vtables[current].entries.push(entry);
                    cursor += 4;
                }
                None => {
                    warn!(
                        class = %class_name,
                        address = format_args!("{word:#x}"),
                        "vtable slot points at code with no function record"
                    );
                    debug_assert!(false, "vtable slot with no function record");
                    break;
                }
            }
        }
    }
}
