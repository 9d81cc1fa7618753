//! Synthesized Python program that loads the hidden tests, discovers
//! `test_*` callables and reports on them using the line protocol parsed by
//! [`crate::report::parse`].

use crate::error::Result;

const SEARCH_ROOT_TOKEN: &str = "__PYJUDGE_SEARCH_ROOT__";
const TEST_SOURCE_TOKEN: &str = "__PYJUDGE_TEST_SOURCE__";

const TEMPLATE: &str = r#"import contextlib
import inspect
import io
import sys

sys.dont_write_bytecode = True
sys.path.insert(0, __PYJUDGE_SEARCH_ROOT__)

TEST_SOURCE = __PYJUDGE_TEST_SOURCE__


def _emit(line):
    print(line, flush=True)


def _takes_no_arguments(obj):
    try:
        signature = inspect.signature(obj)
    except (TypeError, ValueError):
        return True
    for parameter in signature.parameters.values():
        if parameter.kind in (parameter.VAR_POSITIONAL, parameter.VAR_KEYWORD):
            continue
        if parameter.default is parameter.empty:
            return False
    return True


def _quiet():
    stack = contextlib.ExitStack()
    stack.enter_context(contextlib.redirect_stdout(io.StringIO()))
    stack.enter_context(contextlib.redirect_stderr(io.StringIO()))
    return stack


def _describe(exc, default):
    # Learner code controls both values; keep each to one clean line.
    try:
        with _quiet():
            kind = str(type(exc).__name__).strip()
            text = str(exc).strip()
    except BaseException:
        kind, text = "", ""
    kind = kind.splitlines()[0] if kind else ""
    if not kind.isidentifier():
        kind = "Exception"
    text = text.splitlines()[0].strip() if text else ""
    return kind, text or default


scope = {"__name__": "__tests__"}
try:
    with _quiet():
        exec(compile(TEST_SOURCE, "<tests>", "exec"), scope)
except BaseException as exc:
    _emit("ERROR: Failed to load test code: %s: %s" % _describe(exc, "Unknown error"))
    sys.exit(1)

tests = sorted(
    name for name, obj in scope.items()
    if name.startswith("test_") and callable(obj) and _takes_no_arguments(obj)
)

if not tests:
    _emit("ERROR: No test functions found (functions must start with 'test_')")
    sys.exit(1)

_emit("Found %d test(s)" % len(tests))
passed = 0
failed = 0
for name in tests:
    try:
        with _quiet():
            scope[name]()
    except AssertionError as exc:
        failed += 1
        _emit("FAILED: %s - %s" % (name, _describe(exc, "Assertion failed")[1]))
    except BaseException as exc:
        failed += 1
        _emit("ERROR in %s: %s: %s" % ((name,) + _describe(exc, "Error occurred")))
    else:
        passed += 1
        _emit("PASSED: %s" % name)

_emit("")
_emit("Test Summary: %d passed, %d failed out of %d total" % (passed, failed, len(tests)))
if failed:
    sys.exit(1)
_emit("SUCCESS: All tests passed")
"#;

/// Render the harness around `test_code`.
///
/// `search_root` is the workspace root as the child process sees it. Both
/// values are embedded as string literals, so test code is never spliced into
/// the harness source itself.
pub fn render(test_code: &str, search_root: &str) -> Result<String> {
    let search_root = python_literal(search_root)?;
    let test_source = python_literal(test_code)?;
    Ok(TEMPLATE
        .replacen(SEARCH_ROOT_TOKEN, &search_root, 1)
        .replacen(TEST_SOURCE_TOKEN, &test_source, 1))
}

/// Environment the harness runs with; nothing from the host leaks in.
pub fn environment(search_root: &str) -> Vec<(&'static str, String)> {
    vec![
        ("PYTHONPATH", search_root.to_string()),
        ("PYTHONDONTWRITEBYTECODE", "1".to_string()),
        ("PYTHONUNBUFFERED", "1".to_string()),
        ("PYTHONIOENCODING", "utf-8".to_string()),
    ]
}

/// A JSON string is also a valid Python string literal.
fn python_literal(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_embeds_literals() {
        let program = render("def test_a():\n    assert 1 == 1\n", "/tmp/ws").unwrap();
        assert!(program.contains(r#"sys.path.insert(0, "/tmp/ws")"#));
        assert!(program.contains(r#"TEST_SOURCE = "def test_a():\n    assert 1 == 1\n""#));
        assert!(!program.contains(SEARCH_ROOT_TOKEN));
        assert!(!program.contains(TEST_SOURCE_TOKEN));
    }

    #[test]
    fn test_render_escapes_quotes_and_tokens() {
        let tricky = "s = \"\"\"x\"\"\"\n# __PYJUDGE_SEARCH_ROOT__\n";
        let program = render(tricky, "/ws").unwrap();
        assert!(program.contains(r#"TEST_SOURCE = "s = \"\"\"x\"\"\"\n# __PYJUDGE_SEARCH_ROOT__\n""#));
        assert!(program.contains(r#"sys.path.insert(0, "/ws")"#));
    }

    #[test]
    fn test_render_emits_protocol_lines() {
        let program = render("", "/ws").unwrap();
        for marker in [
            "Found %d test(s)",
            "PASSED: %s",
            "FAILED: %s - %s",
            "ERROR in %s: %s: %s",
            "ERROR: Failed to load test code: %s: %s",
            "Test Summary: %d passed, %d failed out of %d total",
            "SUCCESS: All tests passed",
        ] {
            assert!(program.contains(marker), "missing {marker}");
        }
    }

    #[test]
    fn test_exception_details_are_sanitised() {
        let program = render("", "/ws").unwrap();
        assert!(program.contains("def _describe(exc, default):"));
        assert!(program.contains("if not kind.isidentifier():"));
        // Raw class names never reach the output directly.
        assert!(!program.contains("type(exc).__name__, "));
        assert_eq!(program.matches("_describe(exc, ").count(), 3);
    }

    #[test]
    fn test_environment_is_minimal() {
        let env = environment("/ws");
        let keys: Vec<_> = env.iter().map(|(key, _)| *key).collect();
        assert_eq!(
            keys,
            ["PYTHONPATH", "PYTHONDONTWRITEBYTECODE", "PYTHONUNBUFFERED", "PYTHONIOENCODING"]
        );
        assert_eq!(env[0].1, "/ws");
    }
}
