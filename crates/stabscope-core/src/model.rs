//! Reconstructed C++ program entities.
//!
//! Every entity lives in an owning vector on
//! [`ProgramModel`](crate::ProgramModel) and refers to other entities by
//! [`EntityIndex`] only. Entities are created during reconstruction and
//! never destroyed; once reconstruction completes the graph is read-only.

use crate::EntityIndex;

/// A C++ namespace.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Namespace {
    /// Fully qualified name, e.g. `a::b::c`.
    pub name: String,
    /// Last path component, e.g. `c` for `a::b::c`.
    pub short_name: String,
    /// Enclosing namespace, if any.
    pub parent_namespace: EntityIndex,
    /// Namespaces nested in this namespace.
    pub child_namespaces: Vec<EntityIndex>,
    /// Classes declared directly in this namespace.
    pub classes: Vec<EntityIndex>,
    /// Free functions declared directly in this namespace.
    pub functions: Vec<EntityIndex>,
    /// Variables declared directly in this namespace.
    pub variables: Vec<EntityIndex>,
    /// Enums declared directly in this namespace.
    pub enums: Vec<EntityIndex>,
}

/// A C++ enum. Exactly one of the parent links is set.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Enum {
    /// Fully qualified name.
    pub name: String,
    /// Enclosing namespace.
    pub parent_namespace: EntityIndex,
    /// Enclosing class.
    pub parent_class: EntityIndex,
    /// Enclosing function.
    pub parent_function: EntityIndex,
}

/// Storage class of a data variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VariableKind {
    /// N_GSYM.
    #[default]
    Global,
    /// N_STSYM.
    Static,
    /// N_LCSYM.
    Local,
}

/// A static or global data variable.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Variable {
    /// Demangled name.
    pub name: String,
    /// Virtual address.
    pub address: u64,
    /// Raw stab description field.
    pub desc: u16,
    /// Section ordinal the variable lives in.
    pub section: u8,
    /// Storage class.
    pub kind: VariableKind,
    /// Enclosing namespace.
    pub parent_namespace: EntityIndex,
    /// Enclosing class.
    pub parent_class: EntityIndex,
    /// Enclosing function.
    pub parent_function: EntityIndex,
}

/// Visibility of a base class in a derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BaseVisibility {
    /// A single base class carries no visibility information.
    #[default]
    Unknown,
    /// Private or protected; the RTTI encoding cannot tell them apart.
    PrivateOrProtected,
    /// Public.
    Public,
}

/// One base class of a derivation.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseClass {
    /// The base class itself.
    pub class: EntityIndex,
    /// Offset of the base subobject in bytes.
    pub base_offset: u16,
    /// Visibility of the derivation.
    pub visibility: BaseVisibility,
    /// Virtual inheritance.
    pub is_virtual: bool,
}

/// One slot of a vtable.
///
/// Exactly one of `function`, `thunk` is set, or `is_pure_virtual` is true.
/// `is_override` and `is_implicit` are mutually exclusive.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VTableEntry {
    /// Demangled function name. Empty for a pure virtual slot until the
    /// reasoner back-fills it from an overrider.
    pub name: String,
    /// The function this slot points at.
    pub function: EntityIndex,
    /// The non-virtual thunk this slot points at (secondary vtables only).
    pub thunk: EntityIndex,
    /// The bottom-most base class this slot overrides or inherits from.
    /// Index into `Class::all_base_classes`.
    pub all_base_class: EntityIndex,
    /// Slot holds a destructor.
    pub is_dtor: bool,
    /// Slot holds `__cxa_pure_virtual`.
    pub is_pure_virtual: bool,
    /// Slot overrides a base class virtual.
    pub is_override: bool,
    /// Slot implicitly inherits a base class virtual.
    pub is_implicit: bool,
}

impl VTableEntry {
    /// True when the owning class introduces this virtual function.
    pub fn is_first_declaration(&self) -> bool {
        !self.is_override && !self.is_implicit
    }
}

/// A vtable. The primary vtable has offset 0; secondary vtables serve base
/// subobjects at positive offsets.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VTable {
    /// Slots in declaration order.
    pub entries: Vec<VTableEntry>,
    /// Base offset this vtable serves, matching `BaseClass::base_offset`.
    pub offset: u16,
}

impl VTable {
    /// Number of slots.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the vtable has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A C++ class or struct.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Class {
    /// Fully qualified name.
    pub name: String,
    /// Last path component, e.g. `c` for `a::b::c`.
    pub short_name: String,
    /// Size in bytes, 0 if unknown.
    pub size: u16,
    /// Primary vtable first, then secondary vtables in layout order.
    pub vtables: Vec<VTable>,
    /// Enclosing namespace.
    pub parent_namespace: EntityIndex,
    /// Enclosing class, for nested classes.
    pub parent_class: EntityIndex,
    /// Direct base classes, first to last.
    pub direct_base_classes: Vec<BaseClass>,
    /// Every ancestor, leaves first, with offsets adjusted to this class's
    /// coordinate system. The top base at offset 0 is the last element.
    pub all_base_classes: Vec<BaseClass>,
    /// Classes nested in this class.
    pub child_classes: Vec<EntityIndex>,
    /// Member functions.
    pub functions: Vec<EntityIndex>,
    /// Static member variables.
    pub variables: Vec<EntityIndex>,
    /// Nested enums.
    pub enums: Vec<EntityIndex>,
}

impl Class {
    /// Finds the ancestor serving the given base offset.
    ///
    /// `all_base_classes` is ordered leaves first, so the scan runs
    /// back-to-front: for shared offsets (offset 0 in particular) the top
    /// base wins.
    pub fn base_class_at(&self, base_offset: u16) -> Option<&BaseClass> {
        self.all_base_classes
            .iter()
            .rev()
            .find(|base| base.base_offset == base_offset)
    }
}

/// A compiler-emitted non-virtual thunk.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NonVirtualThunk {
    /// Demangled target name, without the `non-virtual thunk to` prefix.
    pub name: String,
    /// Virtual address of the thunk.
    pub address: u64,
    /// Thunk forwards to a destructor.
    pub is_dtor: bool,
}

/// A code range attributed to a source or header file inside a function
/// body. Exactly one of the file links is set.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionInstruction {
    /// Start address of the range.
    pub address: u64,
    /// Header file the range comes from.
    pub header_file: EntityIndex,
    /// Source file the range comes from.
    pub source_file: EntityIndex,
}

/// One emitted copy of a function.
///
/// GCC can emit the same logical function at several addresses in one
/// compilation unit (destructor aliases, out-of-line template
/// instantiations), so a [`Function`] holds one variant per emission.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FunctionVariant {
    /// Mangled symbol name.
    pub mangled_name: String,
    /// Start virtual address.
    pub address: u64,
    /// Size in bytes, from the closing N_FUN.
    pub size: u32,
    /// Source line of the definition.
    pub source_line: u16,
    /// Section ordinal.
    pub section: u8,
    /// Per-include-file code ranges from N_SOL records.
    pub instructions: Vec<FunctionInstruction>,
}

impl FunctionVariant {
    /// One-past-the-end address of this variant.
    pub fn address_end(&self) -> u64 {
        self.address + u64::from(self.size)
    }
}

/// A function, free or member.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    /// Full demangled text, e.g. `ns::Foo::bar(int) const`.
    pub name: String,
    /// Base name without trailing template arguments, e.g. `bar`.
    pub base_name: String,
    /// Declaration context, e.g. `ns::Foo` for `ns::Foo::bar`.
    pub decl_context_name: String,
    /// Qualified name without parameters, e.g. `ns::Foo::bar`.
    pub full_name: String,
    /// Parameter list including parentheses, e.g. `(int)`.
    pub parameters: String,
    /// Return type; empty when the mangling does not encode one.
    pub return_type: String,
    /// Parameter types split out of `parameters`.
    pub parameter_types: Vec<String>,
    /// Constructor or destructor.
    pub is_ctor_or_dtor: bool,
    /// Local (static) function, from the `:f` stab suffix.
    pub is_local_function: bool,
    /// Const-qualified member function.
    pub is_const: bool,
    /// Header file the function is declared in, if known.
    pub header_file: EntityIndex,
    /// Source file the function is defined in.
    pub source_file: EntityIndex,
    /// Enclosing namespace.
    pub parent_namespace: EntityIndex,
    /// Enclosing class.
    pub parent_class: EntityIndex,
    /// Classes declared inside this function.
    pub child_classes: Vec<EntityIndex>,
    /// Variables declared inside this function.
    pub variables: Vec<EntityIndex>,
    /// Enums declared inside this function.
    pub enums: Vec<EntityIndex>,
    /// Emitted copies, in symbol order.
    pub variants: Vec<FunctionVariant>,
}

impl Function {
    /// True when the function belongs to a class.
    pub fn is_class_member(&self) -> bool {
        self.parent_class.is_valid()
    }
}

/// A header file seen through N_SOL records.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeaderFile {
    /// Name relative to the compilation directory.
    pub name: String,
}

/// A compilation unit seen through an N_SO block.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceFile {
    /// Name relative to the compilation directory.
    pub name: String,
    /// First address of the unit's code.
    pub address_begin: u64,
    /// One-past-the-end address of the unit's code.
    pub address_end: u64,
    /// Header files included by this unit.
    pub header_files: Vec<EntityIndex>,
    /// Functions defined in this unit.
    pub functions: Vec<EntityIndex>,
    /// Variables defined in this unit.
    pub variables: Vec<EntityIndex>,
    /// Enums defined in this unit.
    pub enums: Vec<EntityIndex>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_declaration() {
        let mut entry = VTableEntry::default();
        assert!(entry.is_first_declaration());
        entry.is_override = true;
        assert!(!entry.is_first_declaration());
        entry.is_override = false;
        entry.is_implicit = true;
        assert!(!entry.is_first_declaration());
    }

    #[test]
    fn test_base_class_at_prefers_top_base() {
        // Leaves-first ordering: the deepest ancestor at offset 0 comes
        // last and must win the lookup.
        let mut class = Class::default();
        class.all_base_classes = vec![
            BaseClass {
                class: EntityIndex::new(1),
                base_offset: 0,
                ..Default::default()
            },
            BaseClass {
                class: EntityIndex::new(2),
                base_offset: 4,
                ..Default::default()
            },
            BaseClass {
                class: EntityIndex::new(3),
                base_offset: 0,
                ..Default::default()
            },
        ];

        let found = class.base_class_at(0).unwrap();
        assert_eq!(found.class, EntityIndex::new(3));
        let found = class.base_class_at(4).unwrap();
        assert_eq!(found.class, EntityIndex::new(2));
        assert!(class.base_class_at(8).is_none());
    }

    #[test]
    fn test_variant_address_end() {
        let variant = FunctionVariant {
            address: 0x1000,
            size: 0x40,
            ..Default::default()
        };
        assert_eq!(variant.address_end(), 0x1040);
    }
}
