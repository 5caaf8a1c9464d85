//! Vtable slot reasoning.
//!
//! Runs after flattening, in three passes over all classes:
//!
//! 1. Slot-by-slot alignment of every vtable against the vtable of the
//!    base class serving its offset: marks overrides and implicit
//!    inheritance, and back-fills the names of pure-virtual base slots
//!    from their overriders.
//! 2. A two-cursor alignment of the primary vtable against each direct
//!    base's primary vtable, catching overrides the offset-aligned pass
//!    cannot see under multiple inheritance.
//! 3. Attribution of every inherited or overriding primary-vtable slot to
//!    the bottom-most ancestor that first declared it.

use stabscope_core::{Class, EntityIndex, VTableEntry};
use stabscope_demangle::names;
use tracing::warn;

use crate::Reconstructor;

impl Reconstructor {
    /// Runs the three reasoning passes.
    pub(crate) fn process_vtables(&mut self) {
        // Pure-virtual names must exist before overrides and base
        // relationships are resolved from names.
        for class_index in 0..self.model.classes.len() {
            self.process_vtable_overrides_and_pure_virtuals(class_index);
        }
        for class_index in 0..self.model.classes.len() {
            self.process_primary_vtable_overrides(class_index);
        }
        for class_index in 0..self.model.classes.len() {
            self.process_primary_vtable_base_relationships(class_index);
        }
    }

    /// Pass 1: align every vtable with the primary vtable of the base
    /// class serving its offset, then recurse into that base.
    fn process_vtable_overrides_and_pure_virtuals(&mut self, class_index: usize) {
        if self.model.classes[class_index].direct_base_classes.is_empty()
            || self.model.classes[class_index].vtables.is_empty()
        {
            return;
        }

        for vtable_index in 0..self.model.classes[class_index].vtables.len() {
            let offset = self.model.classes[class_index].vtables[vtable_index].offset;
            let Some(base_class_index) = self.model.classes[class_index]
                .base_class_at(offset)
                .and_then(|base| base.class.get())
            else {
                continue;
            };
            if base_class_index == class_index
                || self.model.classes[base_class_index].vtables.is_empty()
            {
                continue;
            }

            {
                let (class, base_class) =
                    class_pair_mut(&mut self.model.classes, class_index, base_class_index);
                let class_name = class.name.clone();
                let base_class_name = base_class.name.clone();
                let vtable = &mut class.vtables[vtable_index];
                let base_vtable = &mut base_class.vtables[0];

                let count = vtable.entries.len();
                let base_count = base_vtable.entries.len();
                // The primary vtable extends its base's; a secondary
                // vtable mirrors its base's exactly.
                debug_assert!(vtable.offset != 0 || count >= base_count);
                debug_assert!(vtable.offset == 0 || count == base_count);

                for slot in 0..count.min(base_count) {
                    let entry = &mut vtable.entries[slot];
                    let base_entry = &mut base_vtable.entries[slot];
                    debug_assert_eq!(entry.is_dtor, base_entry.is_dtor);

                    mark_override(&class_name, entry);
                    fill_pure_virtual_name(&base_class_name, base_entry, &entry.name);
                }
            }

            self.process_vtable_overrides_and_pure_virtuals(base_class_index);
        }
    }

    /// Pass 2: two-cursor alignment of the primary vtable against each
    /// direct base's primary vtable.
    ///
    /// At each step the cursors either find the base slot further down
    /// the derived vtable, find the derived slot further down the base
    /// vtable, or give up on the pair and advance both.
    fn process_primary_vtable_overrides(&mut self, class_index: usize) {
        if self.model.classes[class_index].direct_base_classes.is_empty()
            || self.model.classes[class_index].vtables.is_empty()
        {
            return;
        }

        let class_name = self.model.classes[class_index].name.clone();
        debug_assert_eq!(self.model.classes[class_index].vtables[0].offset, 0);

        let direct_bases: Vec<usize> = self.model.classes[class_index]
            .direct_base_classes
            .iter()
            .filter_map(|base| base.class.get())
            .collect();

        // The derived cursor runs on across base vtables.
        let mut vi = 0usize;

        for base_class_index in direct_bases {
            if self.model.classes[base_class_index].vtables.is_empty() {
                return;
            }
            let base_keys: Vec<(String, bool)> = self.model.classes[base_class_index].vtables[0]
                .entries
                .iter()
                .map(|entry| (entry.name.clone(), entry.is_dtor))
                .collect();

            let vtable = &mut self.model.classes[class_index].vtables[0];
            let count = vtable.entries.len();
            let base_count = base_keys.len();
            let mut bi = 0usize;

            while vi < count && bi < base_count {
                let (vi0, bi0) = (vi, bi);

                // Advance the derived cursor looking for the base slot.
                if let Some(found) =
                    (vi0..count).find(|&i| entry_matches(&vtable.entries[i], &base_keys[bi0]))
                {
                    mark_override(&class_name, &mut vtable.entries[found]);
                    vi = found + 1;
                    bi = bi0 + 1;
                    continue;
                }

                // Advance the base cursor looking for the derived slot.
                if let Some(found) = (bi0 + 1..base_count)
                    .find(|&j| entry_matches(&vtable.entries[vi0], &base_keys[j]))
                {
                    mark_override(&class_name, &mut vtable.entries[vi0]);
                    vi = vi0 + 1;
                    bi = found + 1;
                    continue;
                }

                // No correspondence; advance both.
                vi = vi0 + 1;
                bi = bi0 + 1;
            }
        }
    }

    /// Pass 3: point every non-first-declaration slot of the primary
    /// vtable at the bottom-most ancestor whose primary vtable first
    /// declares a matching slot.
    fn process_primary_vtable_base_relationships(&mut self, class_index: usize) {
        if self.model.classes[class_index].direct_base_classes.is_empty()
            || self.model.classes[class_index].vtables.is_empty()
        {
            return;
        }

        let ancestors: Vec<(usize, usize)> = self.model.classes[class_index]
            .all_base_classes
            .iter()
            .enumerate()
            .filter_map(|(position, base)| base.class.get().map(|index| (position, index)))
            .collect();

        for (ancestor_position, base_class_index) in ancestors {
            if base_class_index == class_index
                || self.model.classes[base_class_index].vtables.is_empty()
            {
                continue;
            }

            let base_keys: Vec<(String, bool)> = self.model.classes[base_class_index].vtables[0]
                .entries
                .iter()
                .filter(|entry| entry.is_first_declaration())
                .map(|entry| (entry.name.clone(), entry.is_dtor))
                .collect();

            let vtable = &mut self.model.classes[class_index].vtables[0];
            for entry in vtable.entries.iter_mut() {
                if entry.all_base_class.is_valid() || entry.is_first_declaration() {
                    continue;
                }
                if base_keys.iter().any(|key| entry_matches(entry, key)) {
                    entry.all_base_class = EntityIndex::new(ancestor_position);
                }
            }
        }
    }
}

/// Marks a slot as override when its name begins with the owning class's
/// name, and as implicit inheritance otherwise.
fn mark_override(class_name: &str, entry: &mut VTableEntry) {
    if !entry.is_pure_virtual && entry.name.starts_with(class_name) {
        debug_assert!(!entry.is_implicit);
        entry.is_override = true;
    } else {
        debug_assert!(!entry.is_override);
        entry.is_implicit = true;
    }
}

/// Back-fills a pure-virtual base slot's name from an overriding slot,
/// requalified with the base class's name. Sibling overrides must agree.
fn fill_pure_virtual_name(base_class_name: &str, base_entry: &mut VTableEntry, entry_name: &str) {
    if entry_name.is_empty() || !base_entry.is_pure_virtual {
        return;
    }
    let expected = names::with_class_name(entry_name, base_class_name);
    if base_entry.name.is_empty() {
        base_entry.name = expected;
    } else if base_entry.name != expected {
        warn!(
            recorded = %base_entry.name,
            derived = %expected,
            "pure virtual slot named differently by two overriders"
        );
        debug_assert!(false, "pure virtual slot named differently by two overriders");
    }
}

/// Two slots correspond when both hold destructors or share the same
/// class-less tail name.
fn entry_matches(entry: &VTableEntry, key: &(String, bool)) -> bool {
    (entry.is_dtor && key.1) || names::tail_name(&entry.name) == names::tail_name(&key.0)
}

/// Mutable references to two distinct classes.
fn class_pair_mut(classes: &mut [Class], first: usize, second: usize) -> (&mut Class, &mut Class) {
    debug_assert_ne!(first, second);
    if first < second {
        let (left, right) = classes.split_at_mut(second);
        (&mut left[first], &mut right[0])
    } else {
        let (left, right) = classes.split_at_mut(first);
        (&mut right[0], &mut left[second])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstructor::ReconstructorConfig;
    use stabscope_core::{BaseClass, ProgramModel, VTable};
    use stabscope_demangle::ItaniumDemangler;

    fn reconstructor_with(classes: Vec<Class>) -> Reconstructor {
        let mut reconstructor = Reconstructor {
            model: ProgramModel::new(),
            demangler: ItaniumDemangler::new(),
            config: ReconstructorConfig::default(),
        };
        reconstructor.model.classes = classes;
        reconstructor.build_base_class_links();
        reconstructor
    }

    fn entry(name: &str) -> VTableEntry {
        VTableEntry {
            name: name.to_string(),
            function: EntityIndex::new(0),
            ..Default::default()
        }
    }

    fn dtor_entry(name: &str) -> VTableEntry {
        VTableEntry {
            is_dtor: true,
            ..entry(name)
        }
    }

    fn pure_entry() -> VTableEntry {
        VTableEntry {
            is_pure_virtual: true,
            ..Default::default()
        }
    }

    /// Base at index 0 with the given primary vtable, derived at index 1.
    fn base_and_derived(
        base_entries: Vec<VTableEntry>,
        derived_entries: Vec<VTableEntry>,
    ) -> Vec<Class> {
        let mut base = Class::default();
        base.name = "Base".to_string();
        base.vtables = vec![VTable {
            entries: base_entries,
            ..Default::default()
        }];

        let mut derived = Class::default();
        derived.name = "Derived".to_string();
        derived.direct_base_classes = vec![BaseClass {
            class: EntityIndex::new(0),
            ..Default::default()
        }];
        derived.vtables = vec![VTable {
            entries: derived_entries,
            ..Default::default()
        }];

        vec![base, derived]
    }

    #[test]
    fn test_overrides_and_implicit_inheritance() {
        let classes = base_and_derived(
            vec![
                dtor_entry("Base::~Base()"),
                entry("Base::f()"),
                entry("Base::g()"),
            ],
            vec![
                dtor_entry("Derived::~Derived()"),
                entry("Derived::f()"),
                entry("Base::g()"),
            ],
        );
        let mut reconstructor = reconstructor_with(classes);
        reconstructor.process_vtables();

        let derived = &reconstructor.model.classes[1];
        assert!(derived.vtables[0].entries[0].is_override);
        assert!(derived.vtables[0].entries[1].is_override);
        assert!(derived.vtables[0].entries[2].is_implicit);

        // The base keeps first declarations.
        let base = &reconstructor.model.classes[0];
        assert!(base.vtables[0].entries.iter().all(|e| e.is_first_declaration()));
    }

    #[test]
    fn test_pure_virtual_name_backfill() {
        let classes = base_and_derived(
            vec![pure_entry()],
            vec![entry("Derived::h()")],
        );
        let mut reconstructor = reconstructor_with(classes);
        reconstructor.process_vtables();

        let base = &reconstructor.model.classes[0];
        assert!(base.vtables[0].entries[0].is_pure_virtual);
        assert_eq!(base.vtables[0].entries[0].name, "Base::h()");

        let derived = &reconstructor.model.classes[1];
        assert!(derived.vtables[0].entries[0].is_override);
    }

    #[test]
    fn test_base_attribution_picks_bottom_most_ancestor() {
        // Grandparent introduces f; Parent overrides it; Derived
        // overrides again. The slot must attribute to the bottom-most
        // ancestor that FIRST declares it: Grandparent.
        let mut grandparent = Class::default();
        grandparent.name = "Grand".to_string();
        grandparent.vtables = vec![VTable {
            entries: vec![entry("Grand::f()")],
            ..Default::default()
        }];

        let mut parent = Class::default();
        parent.name = "Parent".to_string();
        parent.direct_base_classes = vec![BaseClass {
            class: EntityIndex::new(0),
            ..Default::default()
        }];
        parent.vtables = vec![VTable {
            entries: vec![entry("Parent::f()")],
            ..Default::default()
        }];

        let mut derived = Class::default();
        derived.name = "Derived".to_string();
        derived.direct_base_classes = vec![BaseClass {
            class: EntityIndex::new(1),
            ..Default::default()
        }];
        derived.vtables = vec![VTable {
            entries: vec![entry("Derived::f()")],
            ..Default::default()
        }];

        let mut reconstructor = reconstructor_with(vec![grandparent, parent, derived]);
        reconstructor.process_vtables();

        let derived = &reconstructor.model.classes[2];
        // all_base_classes is leaves-first: [Grand, Parent].
        assert_eq!(derived.all_base_classes.len(), 2);
        let attributed = derived.vtables[0].entries[0].all_base_class;
        assert_eq!(attributed, EntityIndex::new(0));
        assert_eq!(
            derived.all_base_classes[attributed.index()].class,
            EntityIndex::new(0)
        );
    }

    #[test]
    fn test_two_cursor_alignment_over_multiple_bases() {
        // Derived : A, B where the primary vtable interleaves a first
        // declaration between the slots inherited from A and B.
        let mut a = Class::default();
        a.name = "A".to_string();
        a.vtables = vec![VTable {
            entries: vec![entry("A::fa()")],
            ..Default::default()
        }];

        let mut b = Class::default();
        b.name = "B".to_string();
        b.vtables = vec![VTable {
            entries: vec![entry("B::fb()")],
            ..Default::default()
        }];

        let mut derived = Class::default();
        derived.name = "Derived".to_string();
        derived.direct_base_classes = vec![
            BaseClass {
                class: EntityIndex::new(0),
                ..Default::default()
            },
            BaseClass {
                class: EntityIndex::new(1),
                base_offset: 4,
                ..Default::default()
            },
        ];
        derived.vtables = vec![VTable {
            entries: vec![
                entry("Derived::fa()"),
                entry("Derived::fresh()"),
                entry("Derived::fb()"),
            ],
            ..Default::default()
        }];

        let mut reconstructor = reconstructor_with(vec![a, b, derived]);
        // Only the two-cursor pass: the offset-aligned pass would also
        // touch slot 0 here.
        reconstructor.process_primary_vtable_overrides(2);

        let derived = &reconstructor.model.classes[2];
        assert!(derived.vtables[0].entries[0].is_override);
        assert!(derived.vtables[0].entries[1].is_first_declaration());
        assert!(derived.vtables[0].entries[2].is_override);
    }

    #[test]
    fn test_entry_matches() {
        let a = entry("Derived::f()");
        assert!(entry_matches(&a, &("Base::f()".to_string(), false)));
        assert!(!entry_matches(&a, &("Base::g()".to_string(), false)));

        let d = dtor_entry("Derived::~Derived()");
        assert!(entry_matches(&d, &("Base::~Base()".to_string(), true)));
    }
}
