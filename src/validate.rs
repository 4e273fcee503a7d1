#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::ast::{
    Callee, ClassDecl, ClassMember, ClassRef, Closure, Expr, ExprKind, MemberName, MethodDecl,
    Param, SourceFile, SourceLocation, Stmt, StmtKind,
};
use crate::visitor::{walk_class, walk_closure, walk_expr, walk_method, VisitMut};

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_PARSE: &str = "PJ-ERR-PARSE";
pub const ERR_UNSUPPORTED: &str = "PJ-ERR-UNSUPPORTED";
pub const ERR_UNKNOWN_IDENTIFIER: &str = "PJ-ERR-UNKNOWN-IDENTIFIER";
pub const ERR_DUPLICATE_DEFINITION: &str = "PJ-ERR-DUPLICATE-DEFINITION";
pub const ERR_UNKNOWN_DEPENDENCY: &str = "PJ-ERR-UNKNOWN-DEPENDENCY";
pub const ERR_ENTRY_POINT: &str = "PJ-ERR-ENTRY-POINT";
pub const ERR_SCRIPT_DEPENDENCY: &str = "PJ-ERR-SCRIPT-DEPENDENCY";
pub const ERR_INVALID_ARGUMENT: &str = "PJ-ERR-INVALID-ARGUMENT";
pub const ERR_IO: &str = "PJ-ERR-IO";
pub const ERR_INTERNAL: &str = "PJ-ERR-INTERNAL";

/// Failure category. Every category aborts the whole compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Parse,
    Unsupported,
    UnknownIdentifier,
    DuplicateDefinition,
    UnknownDependency,
    EntryPoint,
    ScriptDependency,
    InvalidArgument,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Parse => ERR_PARSE,
            ErrorKind::Unsupported => ERR_UNSUPPORTED,
            ErrorKind::UnknownIdentifier => ERR_UNKNOWN_IDENTIFIER,
            ErrorKind::DuplicateDefinition => ERR_DUPLICATE_DEFINITION,
            ErrorKind::UnknownDependency => ERR_UNKNOWN_DEPENDENCY,
            ErrorKind::EntryPoint => ERR_ENTRY_POINT,
            ErrorKind::ScriptDependency => ERR_SCRIPT_DEPENDENCY,
            ErrorKind::InvalidArgument => ERR_INVALID_ARGUMENT,
            ErrorKind::Io => ERR_IO,
            ErrorKind::Internal => ERR_INTERNAL,
        }
    }

    pub fn error_type(self) -> &'static str {
        match self {
            ErrorKind::Parse => "PARSE_ERROR",
            ErrorKind::Unsupported => "UNSUPPORTED_CONSTRUCT",
            ErrorKind::UnknownIdentifier => "UNKNOWN_IDENTIFIER",
            ErrorKind::DuplicateDefinition => "DUPLICATE_DEFINITION",
            ErrorKind::UnknownDependency => "UNKNOWN_DEPENDENCY",
            ErrorKind::EntryPoint => "ENTRY_POINT",
            ErrorKind::ScriptDependency => "SCRIPT_DEPENDENCY",
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::Io => "IO_ERROR",
            ErrorKind::Internal => "COMPILER_INVARIANT_VIOLATION",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GUARANTEES
// ═══════════════════════════════════════════════════════════════════════════════

fn get_guarantee(code: &str) -> &'static str {
    match code {
        ERR_PARSE => "Only syntactically valid sources reach the rewrite pipeline.",
        ERR_UNSUPPORTED => "Every construct that reaches code generation has a faithful translation.",
        ERR_UNKNOWN_IDENTIFIER => "Every referenced class, interface and member is known to the codebase.",
        ERR_DUPLICATE_DEFINITION => "Each fully-qualified name is defined exactly once per compilation.",
        ERR_UNKNOWN_DEPENDENCY => "Every dependency resolves to a stub, a source file or the runtime prelude.",
        ERR_ENTRY_POINT => "Exactly one class implements the script interface.",
        ERR_SCRIPT_DEPENDENCY => "Script constructors only receive runtime API objects.",
        ERR_INVALID_ARGUMENT => "Target AST nodes are well-formed by construction.",
        ERR_IO => "Sources are read completely before compilation.",
        ERR_INTERNAL => "The emitted program is valid JavaScript.",
        _ => "Unknown invariant.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
#[error("{file}:{line}:{column}: [{code}] {message}")]
pub struct CompilerError {
    pub code: String,
    pub error_type: String,
    pub message: String,
    pub guarantee: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub hints: Vec<String>,
}

pub type CompilerResult<T> = Result<T, CompilerError>;

impl CompilerError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompilerError {
            code: kind.code().to_string(),
            error_type: kind.error_type().to_string(),
            message: message.into(),
            guarantee: get_guarantee(kind.code()).to_string(),
            file: String::new(),
            line: 0,
            column: 0,
            hints: vec![],
        }
    }

    pub fn unsupported(message: impl Into<String>, loc: SourceLocation) -> Self {
        Self::new(ErrorKind::Unsupported, message).at(loc)
    }

    pub fn unknown_identifier(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownIdentifier, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn at(mut self, loc: SourceLocation) -> Self {
        self.line = loc.line;
        self.column = loc.column;
        self
    }

    /// Attaches the offending file unless an inner stage already did.
    pub fn in_file(mut self, file: &str) -> Self {
        if self.file.is_empty() {
            self.file = file.to_string();
        }
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.code == kind.code()
    }
}

impl From<std::io::Error> for CompilerError {
    fn from(err: std::io::Error) -> Self {
        CompilerError::new(ErrorKind::Io, err.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECK STAGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Rejects constructs outside the compilable subset.
///
/// Runs after the rewrite pipeline. Returns the first violation in source order.
pub fn check_source(file: &mut SourceFile) -> Option<CompilerError> {
    if let Some(err) = check_top_level(&file.stmts) {
        return Some(err);
    }
    let mut checker = SubsetChecker::default();
    checker.visit_stmts(&mut file.stmts).err()
}

fn check_top_level(stmts: &[Stmt]) -> Option<CompilerError> {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Namespace { body, .. } => {
                if let Some(err) = check_top_level(body) {
                    return Some(err);
                }
            }
            StmtKind::Use(_) | StmtKind::Class(_) | StmtKind::Interface(_) | StmtKind::Nop => {}
            StmtKind::Function { name } => {
                return Some(CompilerError::unsupported(
                    format!("function declarations are not supported ({})", name),
                    stmt.loc,
                ))
            }
            _ => {
                return Some(
                    CompilerError::unsupported(
                        "only namespaces, use statements, classes and interfaces may appear at file level",
                        stmt.loc,
                    )
                    .with_hint("move the code into a method of a class"),
                )
            }
        }
    }
    None
}

#[derive(Default)]
struct SubsetChecker;

impl SubsetChecker {
    fn check_params(&self, params: &[Param]) -> Result<(), CompilerError> {
        for param in params {
            if param.by_ref {
                return Err(CompilerError::unsupported(
                    format!("by-reference parameter ${} is not supported", param.name),
                    param.loc,
                ));
            }
            if param.promoted {
                return Err(CompilerError::unsupported(
                    format!("constructor promotion of ${} is not supported", param.name),
                    param.loc,
                ));
            }
            if param.variadic && param.default.is_some() {
                return Err(CompilerError::unsupported(
                    format!("variadic parameter ${} cannot have a default", param.name),
                    param.loc,
                ));
            }
        }
        Ok(())
    }

    fn check_members(&self, class: &ClassDecl) -> Result<(), CompilerError> {
        let mut seen: HashSet<String> = HashSet::new();
        for member in &class.members {
            let loc = match member {
                ClassMember::TraitUse(_) => {
                    return Err(CompilerError::unsupported(
                        format!("traits are not supported (class {})", class.name),
                        class.loc,
                    ))
                }
                ClassMember::Property(p) => p.loc,
                ClassMember::Const(c) => c.loc,
                ClassMember::Method(m) => m.loc,
            };
            if let ClassMember::Method(m) = member {
                if m.modifiers.is_abstract || m.body.is_none() {
                    return Err(CompilerError::unsupported(
                        format!("abstract method {}::{}() is not supported", class.name, m.name),
                        loc,
                    ));
                }
            }
            let modifiers = member.modifiers();
            if modifiers.is_static && !matches!(member, ClassMember::Const(_)) {
                return Err(CompilerError::unsupported(
                    format!(
                        "static members are not supported ({}::{})",
                        class.name,
                        member.name().unwrap_or_default()
                    ),
                    loc,
                ));
            }
            if let Some(name) = member.name() {
                // Constructors are not stored in a bucket
                if matches!(member, ClassMember::Method(m) if m.is_constructor()) {
                    continue;
                }
                if !seen.insert(name.to_ascii_lowercase()) {
                    return Err(CompilerError::unsupported(
                        format!(
                            "member name {}::{} is declared more than once; properties, constants and methods share one namespace",
                            class.name, name
                        ),
                        loc,
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_class_ref(&self, class: &ClassRef, loc: SourceLocation) -> Result<(), CompilerError> {
        match class {
            ClassRef::Dynamic(_) => Err(CompilerError::unsupported(
                "variable class references are not supported",
                loc,
            )),
            ClassRef::StaticRef => Err(CompilerError::unsupported(
                "late static binding (static::) is not supported",
                loc,
            )),
            _ => Ok(()),
        }
    }

    fn check_member_name(&self, object: &Expr, name: &MemberName, loc: SourceLocation) -> Result<(), CompilerError> {
        // $this with a computed name is reported by the visibility annotator
        if matches!(name, MemberName::Dynamic(_)) && !object.is_this() {
            return Err(CompilerError::unsupported(
                "variable member names are not supported",
                loc,
            ));
        }
        Ok(())
    }
}

impl VisitMut for SubsetChecker {
    fn visit_class(&mut self, class: &mut ClassDecl) -> CompilerResult<()> {
        self.check_members(class)?;
        walk_class(self, class)
    }

    fn visit_method(&mut self, method: &mut MethodDecl) -> CompilerResult<()> {
        self.check_params(&method.params)?;
        if method.by_ref_return {
            return Err(CompilerError::unsupported(
                format!("by-reference return from {} is not supported", method.name),
                method.loc,
            ));
        }
        walk_method(self, method)
    }

    fn visit_closure(&mut self, closure: &mut Closure) -> CompilerResult<()> {
        self.check_params(&closure.params)?;
        if let Some(captured) = closure.uses.iter().find(|u| u.by_ref) {
            return Err(CompilerError::new(
                ErrorKind::Unsupported,
                format!("by-reference capture of ${} is not supported", captured.name),
            ));
        }
        if closure.by_ref_return {
            return Err(CompilerError::new(
                ErrorKind::Unsupported,
                "by-reference closures are not supported",
            ));
        }
        walk_closure(self, closure)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> CompilerResult<()> {
        let loc = expr.loc;
        match &expr.kind {
            ExprKind::DynamicVariable(_) => {
                return Err(CompilerError::unsupported(
                    "variable variables are not supported",
                    loc,
                ))
            }
            ExprKind::AnonymousClass => {
                return Err(CompilerError::unsupported(
                    "anonymous classes are not supported",
                    loc,
                ))
            }
            ExprKind::FuncCall {
                callee: Callee::Dynamic(_),
                ..
            } => {
                return Err(CompilerError::unsupported(
                    "variable function calls are not supported",
                    loc,
                ))
            }
            ExprKind::StaticCall { class, .. } => {
                if !matches!(class, ClassRef::ParentRef) {
                    return Err(CompilerError::unsupported(
                        "static methods are not supported",
                        loc,
                    ));
                }
            }
            ExprKind::StaticPropertyFetch { class, name } => {
                if !matches!(class, ClassRef::ParentRef) {
                    return Err(CompilerError::unsupported(
                        format!("static property ${} is not supported", name),
                        loc,
                    ));
                }
            }
            ExprKind::ClassConstFetch { class, .. } | ExprKind::Instanceof { class, .. } => {
                self.check_class_ref(class, loc)?
            }
            ExprKind::New { class, .. } => self.check_class_ref(class, loc)?,
            ExprKind::PropertyFetch { object, name } | ExprKind::MethodCall { object, name, .. } => {
                self.check_member_name(object, name, loc)?
            }
            _ => {}
        }
        if let ExprKind::FuncCall { args, .. }
        | ExprKind::MethodCall { args, .. }
        | ExprKind::StaticCall { args, .. }
        | ExprKind::New { args, .. } = &expr.kind
        {
            if args.iter().any(|a| a.unpack) {
                return Err(CompilerError::unsupported(
                    "argument unpacking is not supported",
                    loc,
                ));
            }
        }
        walk_expr(self, expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;

    fn check(code: &str) -> Option<CompilerError> {
        let mut file = parse_source(code, "check.php").unwrap();
        check_source(&mut file)
    }

    #[test]
    fn accepts_plain_class() {
        assert!(check("<?php namespace A; class B { public $x = 1; public function f() { return $this->x; } }").is_none());
    }

    #[test]
    fn rejects_top_level_code() {
        let err = check("<?php echo 1;").unwrap();
        assert!(err.is(ErrorKind::Unsupported));
    }

    #[test]
    fn rejects_variable_variables() {
        let err = check("<?php class A { public function f() { $a = 'b'; return $$a; } }").unwrap();
        assert!(err.message.contains("variable variables"));
    }

    #[test]
    fn rejects_static_members() {
        let err = check("<?php class A { public static function f() {} }").unwrap();
        assert!(err.message.contains("static members"));
    }

    #[test]
    fn rejects_abstract_methods() {
        let err = check(
            "<?php abstract class Shape {\n  abstract public function area();\n}\nclass Square extends Shape { public function area() { return 4; } }",
        )
        .unwrap();
        assert!(err.is(ErrorKind::Unsupported));
        assert!(err.message.contains("Shape::area()"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn accepts_abstract_class_with_concrete_methods() {
        assert!(check("<?php abstract class Shape { public function sides() { return 0; } }").is_none());
    }

    #[test]
    fn rejects_member_name_collision() {
        let err = check("<?php class A { public $run; public function run() {} }").unwrap();
        assert!(err.message.contains("share one namespace"));
    }

    #[test]
    fn rejects_by_ref_parameters() {
        let err = check("<?php class A { public function f(&$x) {} }").unwrap();
        assert!(err.message.contains("by-reference parameter"));
    }

    #[test]
    fn rejects_anonymous_class() {
        let err = check("<?php class A { public function f() { return new class {}; } }").unwrap();
        assert!(err.message.contains("anonymous classes"));
    }

    #[test]
    fn reports_location() {
        let err = check("<?php\nclass A {\n  public function f() {\n    return $$a;\n  }\n}").unwrap();
        assert_eq!(err.line, 4);
    }

    #[test]
    fn error_display_carries_code_and_file() {
        let err = CompilerError::new(ErrorKind::DuplicateDefinition, "class A defined twice")
            .in_file("a.php")
            .in_file("b.php");
        assert_eq!(err.file, "a.php");
        assert!(err.to_string().contains("PJ-ERR-DUPLICATE-DEFINITION"));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["errorType"], "DUPLICATE_DEFINITION");
    }
}
