//! Lexical utilities over demangled C++ names.
//!
//! Qualified names are split with backwards scans that skip template
//! argument lists (and, for function names, parameter lists), so
//! `a::b<c::d>::e` splits into `a::b<c::d>` and `e`, never inside the
//! angle brackets.

/// Byte position just past the `::` separating a qualified name from its
/// last component, or `None` for an unqualified name.
///
/// The scan runs back-to-front and ignores colons inside template
/// argument lists.
pub fn short_name_begin(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    let mut group_count = 0i32;
    for i in (0..bytes.len()).rev() {
        match bytes[i] {
            b'>' => group_count += 1,
            b'<' => group_count -= 1,
            b':' if group_count <= 0 => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Splits `a::b::c` into (`a::b`, `c`). Template argument lists stay
/// intact. Returns `None` for an unqualified name.
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let pos = short_name_begin(name)?;
    if pos < 2 {
        return None;
    }
    Some((&name[..pos - 2], &name[pos..]))
}

/// The function name with its class qualifier stripped:
/// `Foo::bar(Baz::Qux*)` becomes `bar(Baz::Qux*)`.
///
/// Both parameter lists and template argument lists are skipped, so
/// qualifiers inside parameter types do not split the name.
pub fn tail_name(name: &str) -> &str {
    let bytes = name.as_bytes();
    let mut group_count = 0i32;
    for i in (0..bytes.len()).rev() {
        match bytes[i] {
            b')' | b'>' => group_count += 1,
            b'(' | b'<' => group_count -= 1,
            b':' if group_count <= 0 => return &name[i + 1..],
            _ => {}
        }
    }
    name
}

/// Requalifies a function name with a different class:
/// `with_class_name("Derived::f()", "Base")` is `Base::f()`.
pub fn with_class_name(function_name: &str, class_name: &str) -> String {
    let mut result = String::with_capacity(class_name.len() + 2 + function_name.len());
    result.push_str(class_name);
    result.push_str("::");
    result.push_str(tail_name(function_name));
    result
}

/// Strips a trailing template argument list: `bar<int>` becomes `bar`.
/// Operator names are left alone so `operator>` survives.
pub fn strip_template_suffix(name: &str) -> &str {
    if !name.ends_with('>') || name.starts_with("operator") {
        return name;
    }
    let bytes = name.as_bytes();
    let mut depth = 0i32;
    for i in (0..bytes.len()).rev() {
        match bytes[i] {
            b'>' => depth += 1,
            b'<' => {
                depth -= 1;
                if depth == 0 {
                    return &name[..i];
                }
            }
            _ => {}
        }
    }
    name
}

/// Splits a demangled parameter list into parameter types.
///
/// Scans character by character, tracking template-bracket depth; at depth
/// zero a comma separates types and `*`, `&`, `)` end the current type, so
/// `(Foo<A, B>*, signed char&)` yields `Foo<A, B>` and `signed char`.
/// Compounds like `unsigned long` keep their internal space.
pub fn parameter_types(parameters: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    // Set once the current type was ended by `*`/`&`/`)`; the rest of the
    // declarator is skipped until the next comma.
    let mut terminated = false;

    let flush = |current: &mut String, types: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            types.push(trimmed.to_string());
        }
        current.clear();
    };

    for c in parameters.chars() {
        match c {
            '<' => {
                depth += 1;
                if !terminated {
                    current.push(c);
                }
            }
            '>' => {
                depth -= 1;
                if !terminated {
                    current.push(c);
                }
            }
            _ if depth > 0 => {
                if !terminated {
                    current.push(c);
                }
            }
            ',' => {
                flush(&mut current, &mut types);
                terminated = false;
            }
            '*' | '&' | ')' => {
                flush(&mut current, &mut types);
                terminated = true;
            }
            '(' => {}
            _ => {
                if !terminated {
                    current.push(c);
                }
            }
        }
    }
    flush(&mut current, &mut types);

    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("a::b::c"), Some(("a::b", "c")));
        assert_eq!(split_qualified("Foo"), None);
        // Template arguments with qualifiers stay intact.
        assert_eq!(
            split_qualified("Map<K::Part, V>::insert"),
            Some(("Map<K::Part, V>", "insert"))
        );
        assert_eq!(split_qualified("a::b<c::d>"), Some(("a", "b<c::d>")));
    }

    #[test]
    fn test_short_name_begin() {
        assert_eq!(short_name_begin("a::b"), Some(3));
        assert_eq!(short_name_begin("plain"), None);
        assert_eq!(short_name_begin("x<a::b>"), None);
    }

    #[test]
    fn test_tail_name() {
        assert_eq!(tail_name("Foo::bar()"), "bar()");
        assert_eq!(tail_name("free()"), "free()");
        // The class qualifier inside the parameter list is skipped.
        assert_eq!(tail_name("Foo::bar(Baz::Qux*)"), "bar(Baz::Qux*)");
        assert_eq!(tail_name("Tmpl<a::b>::get()"), "get()");
        assert_eq!(tail_name("Foo::~Foo()"), "~Foo()");
    }

    #[test]
    fn test_with_class_name() {
        assert_eq!(with_class_name("Derived::f()", "Base"), "Base::f()");
        assert_eq!(with_class_name("Derived::~Derived()", "Base"), "Base::~Derived()");
    }

    #[test]
    fn test_strip_template_suffix() {
        assert_eq!(strip_template_suffix("bar<int>"), "bar");
        assert_eq!(strip_template_suffix("bar<Foo<int>>"), "bar");
        assert_eq!(strip_template_suffix("bar"), "bar");
        assert_eq!(strip_template_suffix("operator>"), "operator>");
        assert_eq!(strip_template_suffix("operator<<"), "operator<<");
    }

    #[test]
    fn test_parameter_types() {
        assert_eq!(parameter_types(""), Vec::<String>::new());
        assert_eq!(parameter_types("()"), Vec::<String>::new());
        assert_eq!(parameter_types("(int)"), vec!["int"]);
        assert_eq!(
            parameter_types("(int, unsigned long, Foo<A, B>*, signed char&)"),
            vec!["int", "unsigned long", "Foo<A, B>", "signed char"]
        );
        // Double indirection does not produce an empty type.
        assert_eq!(parameter_types("(char**, int)"), vec!["char", "int"]);
        assert_eq!(
            parameter_types("(Foo const&, unsigned short)"),
            vec!["Foo const", "unsigned short"]
        );
    }
}
