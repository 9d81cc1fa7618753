use rustpython_ast::Visitor;
use rustpython_parser::{ast, Parse};
use thiserror::Error;
use tracing::debug;

use crate::policy::tables::{
    is_allowed_import, is_denied_attribute, is_denied_operation, BUILTINS_NAME,
    NAMESPACE_ACCESSORS,
};

/// Bracket depth beyond which a submission is refused before parsing.
const MAX_NESTING_DEPTH: usize = 100;

/// A construct the sandbox refuses to run. The `Display` text is shown to learners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Code is nested too deeply (max depth {max})")]
    TooDeep { max: usize },

    #[error("Import of '{module}' is not allowed")]
    Import { module: String },

    #[error("Import from '{module}' is not allowed")]
    ImportFrom { module: String },

    #[error("Relative imports are not allowed")]
    RelativeImport,

    #[error("Use of '{name}' is not allowed")]
    DeniedCall { name: String },

    #[error("Access to __builtins__.{attr} is not allowed")]
    BuiltinsAttribute { attr: String },

    #[error("getattr on __builtins__ is not allowed")]
    GetattrOnBuiltins,

    #[error("vars on __builtins__ is not allowed")]
    VarsOnBuiltins,

    #[error("Indirect access to dangerous builtin '{name}' is not allowed")]
    IndirectAccess { name: String },

    #[error("Access to '{key}' via {accessor} is not allowed")]
    NamespaceLookup { key: String, accessor: String },

    #[error("Access to __builtins__ is not allowed")]
    BuiltinsReference,

    #[error("Access to attribute '{attr}' is not allowed")]
    DeniedAttribute { attr: String },
}

/// Statically check `source`. The first violation found is returned.
pub fn check(source: &str) -> Result<(), PolicyViolation> {
    if nesting_depth(source) > MAX_NESTING_DEPTH {
        return Err(PolicyViolation::TooDeep {
            max: MAX_NESTING_DEPTH,
        });
    }

    let suite = ast::Suite::parse(source, "<submission>")
        .map_err(|e| PolicyViolation::Syntax(e.to_string()))?;

    let mut walker = PolicyWalker::default();
    for stmt in suite {
        walker.visit_stmt(stmt);
        if walker.halted() {
            break;
        }
    }

    match walker.violation {
        Some(violation) => {
            debug!(%violation, "Submission rejected by policy");
            Err(violation)
        }
        None => Ok(()),
    }
}

fn nesting_depth(source: &str) -> usize {
    let mut depth = 0usize;
    let mut max = 0usize;
    for c in source.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                max = max.max(depth);
            }
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}

/// Tree walker that records the first violation and then stops descending.
#[derive(Default)]
struct PolicyWalker {
    violation: Option<PolicyViolation>,
}

impl PolicyWalker {
    fn halted(&self) -> bool {
        self.violation.is_some()
    }

    fn reject(&mut self, violation: PolicyViolation) {
        if self.violation.is_none() {
            self.violation = Some(violation);
        }
    }
}

impl Visitor for PolicyWalker {
    fn visit_stmt(&mut self, node: ast::Stmt) {
        if self.halted() {
            return;
        }
        self.generic_visit_stmt(node)
    }

    fn visit_expr(&mut self, node: ast::Expr) {
        if self.halted() {
            return;
        }
        self.generic_visit_expr(node)
    }

    fn visit_stmt_import(&mut self, node: ast::StmtImport) {
        for alias in &node.names {
            let module = top_level(alias.name.as_str());
            if !is_allowed_import(module) {
                self.reject(PolicyViolation::Import {
                    module: module.to_string(),
                });
                return;
            }
        }
        self.generic_visit_stmt_import(node)
    }

    fn visit_stmt_import_from(&mut self, node: ast::StmtImportFrom) {
        let relative = node.level.as_ref().map_or(0, |level| level.to_u32()) > 0;
        match &node.module {
            Some(module) if !relative => {
                let module = top_level(module.as_str());
                if !is_allowed_import(module) {
                    self.reject(PolicyViolation::ImportFrom {
                        module: module.to_string(),
                    });
                    return;
                }
            }
            _ => {
                self.reject(PolicyViolation::RelativeImport);
                return;
            }
        }
        self.generic_visit_stmt_import_from(node)
    }

    fn visit_expr_call(&mut self, node: ast::ExprCall) {
        if let Some(violation) = inspect_call(&node) {
            self.reject(violation);
            return;
        }
        self.generic_visit_expr_call(node)
    }

    fn visit_expr_attribute(&mut self, node: ast::ExprAttribute) {
        if let Some(violation) = inspect_attribute(&node) {
            self.reject(violation);
            return;
        }
        self.generic_visit_expr_attribute(node)
    }

    fn visit_expr_subscript(&mut self, node: ast::ExprSubscript) {
        if let Some(violation) = inspect_subscript(&node) {
            self.reject(violation);
            return;
        }
        self.generic_visit_expr_subscript(node)
    }

    fn visit_expr_name(&mut self, node: ast::ExprName) {
        let id = node.id.as_str();
        if id == BUILTINS_NAME {
            self.reject(PolicyViolation::BuiltinsReference);
        } else if matches!(node.ctx, ast::ExprContext::Load) && is_denied_operation(id) {
            // Covers aliasing: `f = open`, `[eval][0]`.
            self.reject(PolicyViolation::DeniedCall { name: id.to_string() });
        }
    }

    // The default walks below are empty in rustpython-ast, so each one
    // descends into its child expressions and statements by hand.

    fn visit_keyword(&mut self, node: ast::Keyword) {
        self.visit_expr(node.value);
    }

    fn visit_arguments(&mut self, node: ast::Arguments) {
        let ast::Arguments {
            posonlyargs,
            args,
            vararg,
            kwonlyargs,
            kwarg,
            ..
        } = node;
        for param in posonlyargs.into_iter().chain(args).chain(kwonlyargs) {
            if let Some(default) = param.default {
                self.visit_expr(*default);
            }
            self.visit_arg(param.def);
        }
        for arg in vararg.into_iter().chain(kwarg) {
            self.visit_arg(*arg);
        }
    }

    fn visit_arg(&mut self, node: ast::Arg) {
        if let Some(annotation) = node.annotation {
            self.visit_expr(*annotation);
        }
    }

    fn visit_withitem(&mut self, node: ast::WithItem) {
        self.visit_expr(node.context_expr);
        if let Some(vars) = node.optional_vars {
            self.visit_expr(*vars);
        }
    }

    fn visit_comprehension(&mut self, node: ast::Comprehension) {
        self.visit_expr(node.target);
        self.visit_expr(node.iter);
        for condition in node.ifs {
            self.visit_expr(condition);
        }
    }

    fn visit_match_case(&mut self, node: ast::MatchCase) {
        if self.halted() {
            return;
        }
        self.visit_pattern(node.pattern);
        if let Some(guard) = node.guard {
            self.visit_expr(*guard);
        }
        for stmt in node.body {
            self.visit_stmt(stmt);
        }
    }
}

fn inspect_call(call: &ast::ExprCall) -> Option<PolicyViolation> {
    if let Some(func) = name_of(&call.func) {
        if is_denied_operation(func) {
            return Some(PolicyViolation::DeniedCall {
                name: func.to_string(),
            });
        }

        let target = call.args.first().and_then(name_of);
        match func {
            "getattr" => {
                if target == Some(BUILTINS_NAME) {
                    return Some(PolicyViolation::GetattrOnBuiltins);
                }
                if let Some(attr) = call.args.get(1).and_then(constant_str) {
                    if is_denied_operation(attr) || is_denied_attribute(attr) {
                        return Some(PolicyViolation::IndirectAccess {
                            name: attr.to_string(),
                        });
                    }
                }
            }
            "vars" if target == Some(BUILTINS_NAME) => {
                return Some(PolicyViolation::VarsOnBuiltins);
            }
            _ => {}
        }
    }

    if let ast::Expr::Attribute(attribute) = call.func.as_ref() {
        if name_of(&attribute.value) == Some(BUILTINS_NAME) {
            if attribute.attr.as_str() == "getattr" {
                return Some(PolicyViolation::GetattrOnBuiltins);
            }
            return Some(PolicyViolation::BuiltinsAttribute {
                attr: attribute.attr.as_str().to_string(),
            });
        }
    }

    None
}

fn inspect_attribute(attribute: &ast::ExprAttribute) -> Option<PolicyViolation> {
    let attr = attribute.attr.as_str();

    if name_of(&attribute.value) == Some(BUILTINS_NAME) {
        return Some(PolicyViolation::BuiltinsAttribute {
            attr: attr.to_string(),
        });
    }

    // getattr(...).eval, vars(...).open, globals().exec, anything.__import__
    let dunder = attr.starts_with("__") && attr.ends_with("__");
    if (dunder || accessor_call(&attribute.value).is_some()) && is_denied_operation(attr) {
        return Some(PolicyViolation::IndirectAccess {
            name: attr.to_string(),
        });
    }

    if is_denied_attribute(attr) {
        return Some(PolicyViolation::DeniedAttribute {
            attr: attr.to_string(),
        });
    }

    None
}

fn inspect_subscript(subscript: &ast::ExprSubscript) -> Option<PolicyViolation> {
    let accessor = accessor_call(&subscript.value)?;
    if accessor == "getattr" {
        return None;
    }
    let key = constant_str(&subscript.slice)?;
    if key == BUILTINS_NAME || is_denied_operation(key) {
        return Some(PolicyViolation::NamespaceLookup {
            key: key.to_string(),
            accessor: accessor.to_string(),
        });
    }
    None
}

/// Name of the namespace accessor when `expr` is a call such as `globals()`.
fn accessor_call(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Call(call) => {
            name_of(&call.func).filter(|name| NAMESPACE_ACCESSORS.contains(name))
        }
        _ => None,
    }
}

fn name_of(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Name(name) => Some(name.id.as_str()),
        _ => None,
    }
}

fn constant_str(expr: &ast::Expr) -> Option<&str> {
    match expr {
        ast::Expr::Constant(ast::ExprConstant {
            value: ast::Constant::Str(value),
            ..
        }) => Some(value.as_str()),
        _ => None,
    }
}

fn top_level(module: &str) -> &str {
    module.split('.').next().unwrap_or(module)
}
