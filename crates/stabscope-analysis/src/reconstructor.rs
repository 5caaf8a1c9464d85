//! The reconstruction driver.

use stabscope_core::{Class, Enum, EntityIndex, HeaderFile, Namespace, ProgramModel};
use stabscope_demangle::{names, ItaniumDemangler};
use stabscope_formats::BinaryImage;

use crate::error::ReconstructError;
use crate::patch;
use crate::stabs;

/// Tunables for a reconstruction run.
#[derive(Debug, Clone, Default)]
pub struct ReconstructorConfig {
    /// Fail on `__vmi_class_type_info` records with inheritance flags
    /// (diamond or repeated inheritance) instead of decoding the bases
    /// with a warning.
    pub strict_vmi: bool,
}

/// Reconstructs a [`ProgramModel`] from a binary image.
///
/// The reconstructor owns the model during the passes and hands it out
/// once the graph is complete. Construction happens through
/// [`Reconstructor::load`].
pub struct Reconstructor {
    pub(crate) model: ProgramModel,
    pub(crate) demangler: ItaniumDemangler,
    pub(crate) config: ReconstructorConfig,
}

impl Reconstructor {
    /// Runs all reconstruction passes over the image.
    pub fn load<B: BinaryImage>(
        image: &mut B,
        config: ReconstructorConfig,
    ) -> Result<ProgramModel, ReconstructError> {
        patch::apply_synthetic_tags(image);

        let mut reconstructor = Reconstructor {
            model: ProgramModel::new(),
            demangler: ItaniumDemangler::new(),
            config,
        };

        reconstructor.walk_stabs(image);
        reconstructor.decode_private_externs(image)?;

        // Not every class has RTTI; the rest are inferred from function
        // declaration contexts.
        reconstructor.generate_classes_from_functions();

        // Ancestor lists must exist before the vtable reasoner runs.
        reconstructor.build_base_class_links();

        reconstructor.process_vtables();

        Ok(reconstructor.model)
    }

    /// Second pass over the symbol table: typeinfo and vtable symbols.
    /// Runs after the STABS walk so every function address resolves.
    fn decode_private_externs<B: BinaryImage>(
        &mut self,
        image: &B,
    ) -> Result<(), ReconstructError> {
        for symbol in image.symbols() {
            if symbol.raw_type == stabs::N_PEXT_SECT {
                self.decode_typeinfo(image, symbol)?;
                self.decode_vtable(image, symbol);
            }
        }
        Ok(())
    }

    /// Finds a header file by name, creating it on first sight.
    pub(crate) fn find_or_create_header_file(&mut self, name: &str) -> EntityIndex {
        if let Some(&index) = self.model.name_to_header_file.get(name) {
            return index;
        }

        let index = EntityIndex::new(self.model.header_files.len());
        self.model.header_files.push(HeaderFile {
            name: name.to_string(),
        });
        self.model
            .name_to_header_file
            .insert(name.to_string(), index);
        index
    }

    /// Finds a namespace by qualified name, creating it (and its parents)
    /// on first sight.
    pub(crate) fn find_or_create_namespace(&mut self, name: &str) -> EntityIndex {
        if let Some(&index) = self.model.name_to_namespace.get(name) {
            return index;
        }

        let index = EntityIndex::new(self.model.namespaces.len());
        self.model.namespaces.push(Namespace {
            name: name.to_string(),
            ..Default::default()
        });
        self.model.name_to_namespace.insert(name.to_string(), index);

        match name.rfind("::") {
            Some(pos) => {
                self.model.namespaces[index.index()].short_name = name[pos + 2..].to_string();
                let parent_index = self.find_or_create_namespace(&name[..pos]);
                self.model.namespaces[index.index()].parent_namespace = parent_index;
                self.model.namespaces[parent_index.index()]
                    .child_namespaces
                    .push(index);
            }
            None => {
                self.model.namespaces[index.index()].short_name = name.to_string();
            }
        }

        index
    }

    /// Finds an enum by name, creating it on first sight.
    pub(crate) fn find_or_create_enum(&mut self, name: &str) -> EntityIndex {
        if let Some(&index) = self.model.name_to_enum.get(name) {
            return index;
        }

        let index = EntityIndex::new(self.model.enums.len());
        self.model.enums.push(Enum {
            name: name.to_string(),
            ..Default::default()
        });
        self.model.name_to_enum.insert(name.to_string(), index);
        index
    }

    /// Finds a class by qualified name, creating it on first sight.
    ///
    /// A new qualified name is decomposed: the part before the last `::`
    /// becomes the parent class if it already is one or looks like one
    /// ([`Self::is_expected_class`]), and a namespace otherwise.
    pub(crate) fn find_or_create_class(&mut self, name: &str) -> EntityIndex {
        if let Some(&index) = self.model.name_to_class.get(name) {
            return index;
        }

        let index = EntityIndex::new(self.model.classes.len());
        self.model.classes.push(Class {
            name: name.to_string(),
            ..Default::default()
        });
        self.model.name_to_class.insert(name.to_string(), index);

        match names::split_qualified(name) {
            Some((parent_name, short_name)) => {
                let parent_name = parent_name.to_string();
                self.model.classes[index.index()].short_name = short_name.to_string();

                if let Some(&parent_class) = self.model.name_to_class.get(&parent_name) {
                    self.model.classes[index.index()].parent_class = parent_class;
                    self.model.classes[parent_class.index()]
                        .child_classes
                        .push(index);
                } else if self.is_expected_class(&parent_name) {
                    let parent_class = self.find_or_create_class(&parent_name);
                    self.model.classes[index.index()].parent_class = parent_class;
                    self.model.classes[parent_class.index()]
                        .child_classes
                        .push(index);
                } else {
                    let parent_namespace = self.find_or_create_namespace(&parent_name);
                    self.model.classes[index.index()].parent_namespace = parent_namespace;
                    self.model.namespaces[parent_namespace.index()]
                        .classes
                        .push(index);
                }
            }
            None => {
                self.model.classes[index.index()].short_name = name.to_string();
            }
        }

        index
    }

    pub(crate) fn is_known_namespace(&self, name: &str) -> bool {
        self.model.name_to_namespace.contains_key(name)
    }

    pub(crate) fn is_known_class(&self, name: &str) -> bool {
        self.model.name_to_class.contains_key(name)
    }

    /// Heuristic for names with no RTTI: does this declaration context
    /// look like a class rather than a namespace?
    pub(crate) fn is_expected_class(&self, name: &str) -> bool {
        if name.contains('<') {
            return true; // template syntax
        }
        if self.has_ctor_or_dtor(name) {
            return true;
        }
        if self.is_function_argument(name) {
            return true;
        }
        if name.ends_with("Class") || name.ends_with("Struct") {
            return true;
        }
        false
    }

    /// True when some recorded function is a constructor or destructor of
    /// `name`. Linear over all functions.
    pub(crate) fn has_ctor_or_dtor(&self, name: &str) -> bool {
        self.model
            .functions
            .iter()
            .any(|function| function.is_ctor_or_dtor && function.decl_context_name == name)
    }

    /// True when `name` occurs as a parameter type of some recorded
    /// function. Linear over all functions.
    pub(crate) fn is_function_argument(&self, name: &str) -> bool {
        self.model
            .functions
            .iter()
            .any(|function| function.parameter_types.iter().any(|t| t == name))
    }
}
