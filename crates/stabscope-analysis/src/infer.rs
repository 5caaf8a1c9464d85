//! Class and namespace inference, and base-class flattening.
//!
//! RTTI only exists for classes with virtual functions, so the remaining
//! declaration contexts are classified here: a context that owns a
//! constructor or destructor, carries template syntax, is used as a
//! parameter type, or is named `...Class`/`...Struct` becomes a class;
//! everything else becomes a namespace.

use stabscope_core::{BaseClass, Class, EntityIndex};
use tracing::warn;

use crate::Reconstructor;

impl Reconstructor {
    /// Promotes unresolved function declaration contexts to classes or
    /// namespaces and links the functions to them.
    pub(crate) fn generate_classes_from_functions(&mut self) {
        let function_count = self.model.functions.len();
        for position in 0..function_count {
            let decl_context = self.model.functions[position].decl_context_name.clone();
            if decl_context.is_empty() {
                continue;
            }
            if self.is_known_namespace(&decl_context) || self.is_known_class(&decl_context) {
                continue;
            }

            let function_index = EntityIndex::new(position);
            let is_ctor_or_dtor = self.model.functions[position].is_ctor_or_dtor;

            if is_ctor_or_dtor || self.is_expected_class(&decl_context) {
                let class_index = self.find_or_create_class(&decl_context);
                self.model.functions[position].parent_class = class_index;
                self.model.classes[class_index.index()]
                    .functions
                    .push(function_index);
            } else {
                let namespace_index = self.find_or_create_namespace(&decl_context);
                self.model.functions[position].parent_namespace = namespace_index;
                self.model.namespaces[namespace_index.index()]
                    .functions
                    .push(function_index);
            }
        }
    }

    /// Flattens every class's direct-base lattice into its
    /// `all_base_classes` list, leaves first, with offsets accumulated
    /// along the path.
    pub(crate) fn build_base_class_links(&mut self) {
        for class_index in 0..self.model.classes.len() {
            let mut all_base_classes = Vec::new();
            collect_base_classes(&self.model.classes, class_index, 0, &mut all_base_classes);
            self.model.classes[class_index].all_base_classes = all_base_classes;

            if !self.verify_base_class_links(class_index) {
                warn!(
                    class = %self.model.classes[class_index].name,
                    "secondary vtable offset matches no ancestor"
                );
                debug_assert!(false, "secondary vtable offset matches no ancestor");
            }
        }
    }

    /// Every secondary vtable must serve some ancestor's offset. The
    /// primary vtable is exempt: a class can have a vtable-less base at a
    /// positive offset.
    fn verify_base_class_links(&self, class_index: usize) -> bool {
        let class = &self.model.classes[class_index];
        let secondary_count = class.vtables.len().saturating_sub(1);
        let match_count = class
            .vtables
            .iter()
            .skip(1)
            .filter(|vtable| {
                class
                    .all_base_classes
                    .iter()
                    .any(|base| base.base_offset == vtable.offset)
            })
            .count();
        match_count == secondary_count
    }
}

/// Depth-first post-order over the direct bases: each ancestor is appended
/// after its own ancestors, with the path offset added in.
fn collect_base_classes(
    classes: &[Class],
    class_index: usize,
    offset_adjustment: u32,
    out: &mut Vec<BaseClass>,
) {
    for base in &classes[class_index].direct_base_classes {
        let Some(base_index) = base.class.get() else {
            continue;
        };

        collect_base_classes(
            classes,
            base_index,
            offset_adjustment + u32::from(base.base_offset),
            out,
        );

        let adjusted = u32::from(base.base_offset) + offset_adjustment;
        debug_assert!(adjusted < 0xffff);
        let mut copy = base.clone();
        copy.base_offset = adjusted as u16;
        out.push(copy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stabscope_core::VTable;

    /// A(4 bytes) <- B; {B at 0, C at 8} <- D. Flattening D must list
    /// A (through B) before B, then C, with adjusted offsets.
    fn diamond_free_lattice() -> Vec<Class> {
        let mut a = Class::default();
        a.name = "A".to_string();

        let mut b = Class::default();
        b.name = "B".to_string();
        b.direct_base_classes = vec![BaseClass {
            class: EntityIndex::new(0),
            base_offset: 0,
            ..Default::default()
        }];

        let mut c = Class::default();
        c.name = "C".to_string();

        let mut d = Class::default();
        d.name = "D".to_string();
        d.direct_base_classes = vec![
            BaseClass {
                class: EntityIndex::new(1),
                base_offset: 0,
                ..Default::default()
            },
            BaseClass {
                class: EntityIndex::new(2),
                base_offset: 8,
                ..Default::default()
            },
        ];

        vec![a, b, c, d]
    }

    #[test]
    fn test_flattening_is_leaves_first_with_adjusted_offsets() {
        let classes = diamond_free_lattice();
        let mut all = Vec::new();
        collect_base_classes(&classes, 3, 0, &mut all);

        let order: Vec<(usize, u16)> = all
            .iter()
            .map(|b| (b.class.index(), b.base_offset))
            .collect();
        // A (reached through B) precedes B; C follows at its own offset.
        assert_eq!(order, vec![(0, 0), (1, 0), (2, 8)]);
    }

    #[test]
    fn test_flattening_accumulates_path_offsets() {
        let mut classes = diamond_free_lattice();
        // Push B's A-subobject to offset 4 inside B.
        classes[1].direct_base_classes[0].base_offset = 4;
        // And B itself to offset 2 inside D.
        classes[3].direct_base_classes[0].base_offset = 2;

        let mut all = Vec::new();
        collect_base_classes(&classes, 3, 0, &mut all);
        let order: Vec<(usize, u16)> = all
            .iter()
            .map(|b| (b.class.index(), b.base_offset))
            .collect();
        assert_eq!(order, vec![(0, 6), (1, 2), (2, 8)]);
    }

    #[test]
    fn test_repeated_ancestor_appears_once_per_path() {
        // D derives from B and C, both deriving from A: A must appear
        // twice, at the two distinct path offsets.
        let mut classes = diamond_free_lattice();
        classes[2].direct_base_classes = vec![BaseClass {
            class: EntityIndex::new(0),
            base_offset: 0,
            ..Default::default()
        }];

        let mut all = Vec::new();
        collect_base_classes(&classes, 3, 0, &mut all);
        let a_offsets: Vec<u16> = all
            .iter()
            .filter(|b| b.class.index() == 0)
            .map(|b| b.base_offset)
            .collect();
        assert_eq!(a_offsets, vec![0, 8]);
    }

    #[test]
    fn test_verify_base_class_links() {
        use crate::reconstructor::ReconstructorConfig;
        use stabscope_core::ProgramModel;
        use stabscope_demangle::ItaniumDemangler;

        let mut reconstructor = Reconstructor {
            model: ProgramModel::new(),
            demangler: ItaniumDemangler::new(),
            config: ReconstructorConfig::default(),
        };
        reconstructor.model.classes = diamond_free_lattice();
        reconstructor.model.classes[3].vtables = vec![
            VTable::default(),
            VTable {
                offset: 8,
                ..Default::default()
            },
        ];

        reconstructor.build_base_class_links();
        assert!(reconstructor.verify_base_class_links(3));

        // An offset served by no ancestor fails verification.
        reconstructor.model.classes[3].vtables[1].offset = 12;
        assert!(!reconstructor.verify_base_class_links(3));
    }
}
