use std::collections::HashSet;
use std::sync::LazyLock;

/// Top-level modules sandboxed code may import. Everything else is denied.
pub static ALLOWED_IMPORTS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "math",
        "collections",
        "itertools",
        "functools",
        "operator",
        "string",
        "datetime",
        "decimal",
        "fractions",
        "random",
        "statistics",
        "bisect",
        "heapq",
        "array",
        "copy",
        "json",
        "re",
        "typing",
    ]
    .into_iter()
    .collect()
});

/// Builtins that may not be called, or reached through the builtin namespace.
pub static DENIED_OPERATIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "__import__",
        "eval",
        "exec",
        "compile",
        "open",
        "file",
        "input",
        "raw_input",
        "reload",
        "__builtins__",
        "execfile",
        "exit",
        "quit",
        "breakpoint",
    ]
    .into_iter()
    .collect()
});

/// Attributes that hand out interpreter internals (object graph, frames, globals).
pub static DENIED_ATTRIBUTES: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "__subclasses__",
        "__globals__",
        "__bases__",
        "__base__",
        "__mro__",
        "__code__",
        "__closure__",
        "__builtins__",
        "__getattribute__",
        "__loader__",
        "__spec__",
        "__self__",
        "__dict__",
        "f_globals",
        "f_locals",
        "f_builtins",
        "f_back",
        "gi_frame",
        "cr_frame",
        "ag_frame",
        "tb_frame",
    ]
    .into_iter()
    .collect()
});

/// Builtins returning a symbol table or performing dynamic attribute lookup.
pub static NAMESPACE_ACCESSORS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| ["getattr", "vars", "globals", "locals"].into_iter().collect());

/// The name under which the interpreter exposes its builtin namespace.
pub const BUILTINS_NAME: &str = "__builtins__";

pub fn is_allowed_import(module: &str) -> bool {
    ALLOWED_IMPORTS.contains(module)
}

pub fn is_denied_operation(name: &str) -> bool {
    DENIED_OPERATIONS.contains(name)
}

pub fn is_denied_attribute(name: &str) -> bool {
    DENIED_ATTRIBUTES.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_excludes_host_modules() {
        for module in ["os", "sys", "subprocess", "socket", "pickle", "importlib", "time"] {
            assert!(!is_allowed_import(module), "{module} must not be importable");
        }
        assert!(is_allowed_import("math"));
        assert!(is_allowed_import("collections"));
    }

    #[test]
    fn test_deny_list_covers_dynamic_evaluation() {
        for name in ["eval", "exec", "compile", "__import__", "open", "input", "exit"] {
            assert!(is_denied_operation(name));
        }
        assert!(!is_denied_operation("len"));
        assert!(!is_denied_operation("isinstance"));
    }

    #[test]
    fn test_attribute_deny_list_covers_builtins_module_routes() {
        for attr in ["__self__", "__dict__", "__globals__", "__subclasses__"] {
            assert!(is_denied_attribute(attr), "{attr} must be denied");
        }
        assert!(!is_denied_attribute("__init__"));
        assert!(!is_denied_attribute("append"));
    }
}
