//! # stabscope-demangle
//!
//! Itanium C++ demangling for stabscope. The heavy lifting is delegated to
//! the `cpp_demangle` crate; this crate adds the partial-demangle queries
//! the reconstruction needs (base name, declaration context, parameter
//! list, ctor/dtor predicate) by lexing the demangled text with the same
//! template-aware scanners the vtable reasoner uses.
//!
//! Mach-O prepends an extra underscore to every symbol, so mangled names
//! arrive as `__Z...`; the facade strips it before demangling.

pub mod names;

use cpp_demangle::{DemangleOptions, Symbol};

/// The pieces of a demangled function name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialDemangle {
    /// Full demangled text, e.g. `ns::Foo::bar(int) const`.
    pub full: String,
    /// Qualified name without parameters, e.g. `ns::Foo::bar`.
    pub function_name: String,
    /// Base name without template arguments, e.g. `bar`.
    pub base_name: String,
    /// Declaration context, e.g. `ns::Foo`; empty for free functions at
    /// global scope.
    pub decl_context_name: String,
    /// Parameter list including parentheses, e.g. `(int)`.
    pub parameters: String,
    /// Return type; empty unless the mangling encodes one (template
    /// functions).
    pub return_type: String,
    /// Constructor or destructor.
    pub is_ctor_or_dtor: bool,
}

/// An Itanium demangler.
pub trait Demangle {
    /// Demangles a symbol name. Returns `None` when the name is not an
    /// Itanium mangling.
    fn demangle(&self, mangled: &str) -> Option<String>;

    /// Demangles a function symbol and splits the result into its parts.
    /// Returns `None` for non-manglings and for non-function symbols.
    fn partial_demangle(&self, mangled: &str) -> Option<PartialDemangle>;

    /// Demangles a bare type encoding as found behind a typeinfo name
    /// pointer, e.g. `3Foo` or `N2ns3FooE`.
    fn demangle_type_name(&self, type_name: &str) -> Option<String>;
}

/// [`Demangle`] implementation backed by `cpp_demangle`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItaniumDemangler;

impl ItaniumDemangler {
    /// Creates a demangler.
    pub fn new() -> Self {
        ItaniumDemangler
    }
}

/// Strips the Mach-O underscore so `__Z...` becomes `_Z...`.
fn canonical(mangled: &str) -> &str {
    match mangled.strip_prefix('_') {
        Some(rest) if rest.starts_with("_Z") => rest,
        _ => mangled,
    }
}

impl Demangle for ItaniumDemangler {
    fn demangle(&self, mangled: &str) -> Option<String> {
        let symbol = Symbol::new(canonical(mangled)).ok()?;
        symbol.demangle(&DemangleOptions::default()).ok()
    }

    fn partial_demangle(&self, mangled: &str) -> Option<PartialDemangle> {
        let full = self.demangle(mangled)?;
        parse_demangled(&full)
    }

    fn demangle_type_name(&self, type_name: &str) -> Option<String> {
        let symbol = Symbol::new(format!("_ZTS{type_name}")).ok()?;
        let demangled = symbol.demangle(&DemangleOptions::default()).ok()?;
        demangled
            .strip_prefix("typeinfo name for ")
            .map(str::to_owned)
    }
}

/// Splits demangled text into the partial-demangle parts. Returns `None`
/// when the text has no parameter list (not a function).
fn parse_demangled(full: &str) -> Option<PartialDemangle> {
    let bytes = full.as_bytes();
    let close = full.rfind(')')?;

    // Match the parameter list's opening parenthesis backwards from its
    // closing one.
    let mut depth = 0i32;
    let mut open = None;
    for i in (0..=close).rev() {
        match bytes[i] {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    open = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let open = open?;

    let parameters = full[open..=close].to_string();
    let (return_type, qualified) = split_return_type(full[..open].trim_end());

    let (decl_context_name, short) = match names::split_qualified(qualified) {
        Some((parent, short)) => (parent.to_string(), short),
        None => (String::new(), qualified),
    };

    let base_name = names::strip_template_suffix(short).to_string();

    let is_dtor = short.starts_with('~');
    let is_ctor = !decl_context_name.is_empty() && {
        let parent_short = names::split_qualified(&decl_context_name)
            .map(|(_, s)| s)
            .unwrap_or(&decl_context_name);
        names::strip_template_suffix(parent_short) == base_name
    };

    Some(PartialDemangle {
        full: full.to_string(),
        function_name: qualified.to_string(),
        base_name,
        decl_context_name,
        parameters,
        return_type: return_type.to_string(),
        is_ctor_or_dtor: is_ctor || is_dtor,
    })
}

/// Splits a top-level return type off a qualified function name. Plain
/// Itanium function encodings carry none; template functions do.
fn split_return_type(text: &str) -> (&str, &str) {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut split = None;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'<' | b'(' | b'[' => depth += 1,
            b'>' | b')' | b']' => depth -= 1,
            b' ' if depth == 0 => split = Some(i),
            _ => {}
        }
    }
    match split {
        // `operator int` and friends are names, not return types.
        Some(i) if !text[..i].ends_with("operator") => (&text[..i], &text[i + 1..]),
        _ => ("", text),
    }
}
