//! Function recording from N_FUN pairs, thunk registration, and the
//! data-variable stubs.

use stabscope_core::{EntityIndex, Function, FunctionVariant, NonVirtualThunk};
use stabscope_demangle::{names, Demangle};
use stabscope_formats::SymbolRecord;
use tracing::warn;

use crate::Reconstructor;

/// Length of the `non-virtual thunk to ` prefix on demangled thunks.
const THUNK_PREFIX: &str = "non-virtual thunk to ";

impl Reconstructor {
    /// N_FUN step. A non-empty name opens a function (or appends a
    /// variant); the empty closing record carries the size in its value.
    pub(crate) fn record_function(
        &mut self,
        symbol: &SymbolRecord,
        open_function: &mut EntityIndex,
    ) {
        if symbol.name.is_empty() {
            // Step 2/2: the closing record.
            if let Some(function_index) = open_function.get() {
                if let Some(variant) = self.model.functions[function_index].variants.last_mut() {
                    variant.size = symbol.value as u32;
                }
            }
            return;
        }

        // Step 1/2. Compiler-generated static-init artefacts are skipped.
        if symbol.name.starts_with("_GLOBAL__") || symbol.name.starts_with("_Z41") {
            *open_function = EntityIndex::INVALID;
            return;
        }

        let is_local = symbol.name.ends_with(":f");
        let is_global = symbol.name.ends_with(":F");
        if !is_local && !is_global {
            warn!(name = %symbol.name, "N_FUN name carries no :f/:F suffix");
            debug_assert!(false, "N_FUN name carries no :f/:F suffix");
            *open_function = EntityIndex::INVALID;
            return;
        }

        let mangled = &symbol.name[..symbol.name.len() - 2];
        let partial = self.demangler.partial_demangle(mangled);
        let demangled = partial
            .as_ref()
            .map(|p| p.full.clone())
            .unwrap_or_else(|| mangled.to_string());

        let Some(current) = self.model.source_files.len().checked_sub(1) else {
            warn!(name = %symbol.name, "N_FUN outside an N_SO block");
            *open_function = EntityIndex::INVALID;
            return;
        };
        let current_source = EntityIndex::new(current);

        let variant = FunctionVariant {
            mangled_name: mangled.to_string(),
            address: symbol.value,
            source_line: symbol.desc,
            section: symbol.section,
            ..Default::default()
        };

        // Coalesce per compilation unit: a function already defined in the
        // current unit gains a variant; the same name in another unit gets
        // its own record (inline functions in several units).
        let existing = self.model.name_to_function.get(&demangled).and_then(|candidates| {
            candidates
                .iter()
                .copied()
                .find(|index| self.model.functions[index.index()].source_file == current_source)
        });

        let function_index = match existing {
            Some(function_index) => {
                let function = &mut self.model.functions[function_index.index()];
                debug_assert_eq!(function.is_local_function, is_local);
                function.variants.push(variant);
                function_index
            }
            None => {
                let function_index = EntityIndex::new(self.model.functions.len());
                let mut function = Function {
                    name: demangled.clone(),
                    is_local_function: is_local,
                    is_const: demangled.ends_with("const"),
                    source_file: current_source,
                    variants: vec![variant],
                    ..Default::default()
                };
                if let Some(partial) = partial {
                    function.base_name = partial.base_name;
                    function.decl_context_name = partial.decl_context_name;
                    function.full_name = partial.function_name;
                    function.return_type = partial.return_type;
                    function.is_ctor_or_dtor = partial.is_ctor_or_dtor;
                    function.parameter_types = names::parameter_types(&partial.parameters);
                    function.parameters = partial.parameters;
                }
                self.model.functions.push(function);
                self.model.source_files[current].functions.push(function_index);
                self.model
                    .name_to_function
                    .entry(demangled)
                    .or_default()
                    .push(function_index);
                function_index
            }
        };

        self.model
            .mangled_to_function
            .entry(mangled.to_string())
            .or_default()
            .push(function_index);
        self.model
            .address_to_function
            .entry(symbol.value)
            .or_insert(function_index);

        *open_function = function_index;
    }

    /// Registers a `__ZThn` non-virtual thunk so the vtable decoder can
    /// recognise its address in secondary vtables.
    pub(crate) fn record_thunk(&mut self, symbol: &SymbolRecord) {
        if !symbol.name.starts_with("__ZThn") {
            return;
        }
        let Some(demangled) = self.demangler.demangle(&symbol.name) else {
            warn!(name = %symbol.name, "thunk symbol does not demangle");
            return;
        };
        let name = demangled
            .strip_prefix(THUNK_PREFIX)
            .unwrap_or(&demangled)
            .to_string();

        if self.model.address_to_thunk.contains_key(&symbol.value) {
            warn!(address = format_args!("{:#x}", symbol.value), "duplicate thunk address");
            debug_assert!(false, "duplicate thunk address");
            return;
        }

        let is_dtor = name.contains('~');
        let index = EntityIndex::new(self.model.thunks.len());
        self.model.thunks.push(NonVirtualThunk {
            name,
            address: symbol.value,
            is_dtor,
        });
        self.model.address_to_thunk.insert(symbol.value, index);
    }

    // Data variables are accepted but not reconstructed.
    // TODO: populate Variable records from the :G/:S/:V stab suffixes and
    // attach them to their namespace/class/function parents.

    /// N_GSYM hook.
    pub(crate) fn record_global_variable(&mut self, _symbol: &SymbolRecord) {}

    /// N_STSYM hook.
    pub(crate) fn record_static_variable(&mut self, _symbol: &SymbolRecord) {}

    /// N_LCSYM hook.
    pub(crate) fn record_local_common_variable(&mut self, _symbol: &SymbolRecord) {}
}
