//! STABS record types and the first-pass symbol walk.
//!
//! STABS encodes structure positionally: an N_SO pair brackets each
//! compilation unit, N_FUN pairs bracket each function, and N_SOL records
//! between them attribute code ranges to `#include`d files. The walk
//! drives two small state machines over the symbol table in on-disk
//! order:
//!
//! - **SO**: Idle → (non-empty N_SO: push source file, remember the
//!   directory prefix) → Opened → (non-empty N_SO: fix the file name) →
//!   Opened → (empty N_SO: close the address range) → Idle
//! - **FUN**: Idle → (non-empty N_FUN: open function) → Open → (empty
//!   N_FUN: record the size, emit the accumulated N_SOL ranges) → Idle

use stabscope_core::{EntityIndex, SourceFile};
use stabscope_formats::{BinaryImage, SymbolRecord};
use tracing::warn;

// Stab record types (<mach-o/stab.h>).
pub const N_GSYM: u8 = 0x20; // global symbol: name,,NO_SECT,type,0
pub const N_FUN: u8 = 0x24; // procedure: name,,n_sect,linenumber,address
pub const N_STSYM: u8 = 0x26; // static symbol: name,,n_sect,type,address
pub const N_LCSYM: u8 = 0x28; // .lcomm symbol: name,,n_sect,type,address
pub const N_OPT: u8 = 0x3c; // emitted with gcc2_compiled and in gcc source
pub const N_SO: u8 = 0x64; // source file name: name,,n_sect,0,address
pub const N_OSO: u8 = 0x66; // object file name: name,,0,0,st_mtime
pub const N_SOL: u8 = 0x84; // #included file name: name,,n_sect,0,address

/// Private external defined symbol (N_PEXT | N_SECT); carries typeinfo,
/// vtable, and thunk symbols. Not a stab.
pub const N_PEXT_SECT: u8 = 0x1e;

/// Classified symbol record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabType {
    /// N_SO.
    So,
    /// N_SOL.
    Sol,
    /// N_FUN.
    Fun,
    /// N_GSYM.
    Gsym,
    /// N_STSYM.
    Stsym,
    /// N_LCSYM.
    Lcsym,
    /// N_OPT.
    Opt,
    /// N_OSO.
    Oso,
    /// N_PEXT | N_SECT.
    PrivateExtern,
    /// Anything else.
    Other(u8),
}

impl StabType {
    /// Classifies a raw `n_type` byte.
    pub fn from_raw(raw_type: u8) -> Self {
        match raw_type {
            N_SO => StabType::So,
            N_SOL => StabType::Sol,
            N_FUN => StabType::Fun,
            N_GSYM => StabType::Gsym,
            N_STSYM => StabType::Stsym,
            N_LCSYM => StabType::Lcsym,
            N_OPT => StabType::Opt,
            N_OSO => StabType::Oso,
            N_PEXT_SECT => StabType::PrivateExtern,
            other => StabType::Other(other),
        }
    }
}

/// SO state machine: the open compilation unit, if any.
#[derive(Debug, Default)]
pub(crate) struct SoState {
    pub in_block: bool,
    /// Directory prefix from the first N_SO of the block.
    pub prefix: String,
}

impl crate::Reconstructor {
    /// First pass over the symbol table: source files, functions,
    /// include ranges, thunks, and the variable stubs.
    pub(crate) fn walk_stabs<B: BinaryImage>(&mut self, image: &B) {
        let symbols = image.symbols();
        let mut so = SoState::default();
        let mut open_function = EntityIndex::INVALID;
        // N_SOL records accumulate here until the owning function closes,
        // because the ranges can only be bounds-checked once the closing
        // N_FUN has delivered the function size.
        let mut sol_range: Option<(usize, usize)> = None;

        for (position, symbol) in symbols.iter().enumerate() {
            match StabType::from_raw(symbol.raw_type) {
                StabType::PrivateExtern => self.record_thunk(symbol),
                StabType::Gsym => self.record_global_variable(symbol),
                StabType::Fun => {
                    self.record_function(symbol, &mut open_function);
                    if symbol.name.is_empty() {
                        if let Some(function_index) = open_function.get() {
                            if let Some((begin, end)) = sol_range {
                                for sol_symbol in &symbols[begin..end] {
                                    if StabType::from_raw(sol_symbol.raw_type) == StabType::Sol {
                                        self.record_include_range(
                                            sol_symbol,
                                            &so.prefix,
                                            function_index,
                                        );
                                    }
                                }
                            }
                        }
                        sol_range = None;
                        open_function = EntityIndex::INVALID;
                    }
                }
                StabType::Stsym => self.record_static_variable(symbol),
                StabType::Lcsym => self.record_local_common_variable(symbol),
                StabType::So => self.record_source_file(symbol, &mut so),
                StabType::Sol => {
                    let begin = sol_range.map(|(begin, _)| begin).unwrap_or(position);
                    sol_range = Some((begin, position + 1));
                }
                StabType::Opt | StabType::Oso => {}
                _ => {}
            }
        }
    }

    /// SO state machine step.
    fn record_source_file(&mut self, symbol: &SymbolRecord, so: &mut SoState) {
        if !symbol.name.is_empty() {
            if !so.in_block {
                // Step 1/3: the directory prefix opens the unit.
                so.in_block = true;
                so.prefix = symbol.name.clone();
                self.model.source_files.push(SourceFile {
                    address_begin: symbol.value,
                    ..Default::default()
                });
            } else {
                // Step 2/3: the full path; the unit is named by the suffix
                // after the directory prefix.
                let Some(last) = self.model.source_files.len().checked_sub(1) else {
                    return;
                };
                let index = EntityIndex::new(last);
                let source_file = &mut self.model.source_files[last];
                if !symbol.name.starts_with(&so.prefix) {
                    warn!(
                        name = %symbol.name,
                        prefix = %so.prefix,
                        "second N_SO does not extend the directory prefix"
                    );
                    debug_assert!(false, "second N_SO does not extend the directory prefix");
                }
                debug_assert_eq!(source_file.address_begin, symbol.value);

                let name = symbol
                    .name
                    .strip_prefix(so.prefix.as_str())
                    .unwrap_or(&symbol.name)
                    .to_string();
                source_file.name = name.clone();

                match self.model.name_to_source_file.entry(name) {
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(index);
                    }
                    std::collections::hash_map::Entry::Occupied(entry) => {
                        warn!(name = %entry.key(), "duplicate source file name");
                        debug_assert!(false, "duplicate source file name");
                    }
                }
            }
        } else {
            // Step 3/3: close the unit's address range.
            debug_assert!(so.in_block, "empty N_SO outside a block");
            if let Some(source_file) = self.model.source_files.last_mut() {
                debug_assert_ne!(source_file.address_begin, 0);
                source_file.address_end = symbol.value;
            }
            so.in_block = false;
            so.prefix.clear();
        }
    }

    /// Records one N_SOL as a [`FunctionInstruction`] on the open
    /// function's latest variant.
    ///
    /// [`FunctionInstruction`]: stabscope_core::FunctionInstruction
    fn record_include_range(&mut self, symbol: &SymbolRecord, prefix: &str, function_index: usize) {
        use stabscope_core::FunctionInstruction;

        let address = symbol.value;
        {
            let function = &self.model.functions[function_index];
            let Some(variant) = function.variants.last() else {
                return;
            };
            if address < variant.address || address >= variant.address_end() {
                warn!(
                    function = %function.name,
                    address = format_args!("{address:#x}"),
                    "N_SOL address outside the function variant"
                );
                debug_assert!(false, "N_SOL address outside the function variant");
                return;
            }
        }

        let sanitized = symbol
            .name
            .strip_prefix(prefix)
            .unwrap_or(&symbol.name)
            .to_string();

        let Some(current_source) = self.model.source_files.len().checked_sub(1) else {
            return;
        };

        let instruction = if self.model.source_files[current_source].name == sanitized {
            // Back in the compilation unit's own file.
            FunctionInstruction {
                address,
                source_file: EntityIndex::new(current_source),
                ..Default::default()
            }
        } else {
            debug_assert!(!sanitized.ends_with(".cp") && !sanitized.ends_with(".cpp"));
            let header_index = self.find_or_create_header_file(&sanitized);
            let unit = &mut self.model.source_files[current_source];
            if !unit.header_files.contains(&header_index) {
                unit.header_files.push(header_index);
            }
            FunctionInstruction {
                address,
                header_file: header_index,
                ..Default::default()
            }
        };

        if let Some(variant) = self.model.functions[function_index].variants.last_mut() {
            variant.instructions.push(instruction);
        }
    }
}
