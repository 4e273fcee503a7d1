//! Source AST for the supported PHP subset.
//!
//! Every node carries a source location and an attribute map. Passes communicate
//! through attributes (see [`attr`]) instead of side tables, so a node can be
//! moved between rewrites without losing what earlier passes learned about it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATIONS & ATTRIBUTES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Well-known attribute keys.
pub mod attr {
    /// Fully-qualified name of a class or interface declaration.
    pub const NAMESPACED_NAME: &str = "namespacedName";
    /// Resolved visibility of a member declaration or a `$this` member access.
    pub const VISIBILITY: &str = "visibility";
    /// Whether an assignment to a plain variable is its first in the scope.
    pub const DECLARES: &str = "declares";
    /// Ordered runtime-API interfaces injected into the script constructor.
    pub const SCRIPT_DEPENDENCIES: &str = "scriptDependencies";
    /// Scope must not receive `null` initialisers for undefined reads.
    pub const NO_AUTO_DEFINE: &str = "noAutoDefine";
    /// Variable introduced by a rewrite; never mangled or auto-defined.
    pub const SYNTHETIC: &str = "synthetic";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<String, Value>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.get_bool(key).unwrap_or(false)
    }

    pub fn get_strings(&self, key: &str) -> Option<Vec<String>> {
        self.0.get(key).and_then(Value::as_array).map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAMES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameKind {
    Unqualified,
    Qualified,
    FullyQualified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub parts: Vec<String>,
    pub kind: NameKind,
}

impl Name {
    /// Parses `Foo`, `Foo\Bar` or `\Foo\Bar`.
    pub fn parse(raw: &str) -> Self {
        let fully = raw.starts_with('\\');
        let parts: Vec<String> = raw
            .trim_start_matches('\\')
            .split('\\')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        let kind = if fully {
            NameKind::FullyQualified
        } else if parts.len() > 1 {
            NameKind::Qualified
        } else {
            NameKind::Unqualified
        };
        Self { parts, kind }
    }

    pub fn fully_qualified(joined: &str) -> Self {
        let mut name = Self::parse(joined);
        name.kind = NameKind::FullyQualified;
        name
    }

    /// Backslash-joined name without a leading separator.
    pub fn joined(&self) -> String {
        self.parts.join("\\")
    }

    pub fn first(&self) -> &str {
        self.parts.first().map(String::as_str).unwrap_or("")
    }

    pub fn last(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }

    pub fn is_fully_qualified(&self) -> bool {
        self.kind == NameKind::FullyQualified
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_fully_qualified() {
            write!(f, "\\")?;
        }
        write!(f, "{}", self.joined())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Concat,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    And,
    Or,
    Xor,
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Concat => ".",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Xor => "xor",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Identical => "===",
            BinaryOp::NotIdentical => "!==",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncDec {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastKind {
    Int,
    Float,
    String,
    Bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberName {
    Ident(String),
    Dynamic(Box<Expr>),
}

impl MemberName {
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            MemberName::Ident(name) => Some(name),
            MemberName::Dynamic(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassRef {
    Named(Name),
    SelfRef,
    ParentRef,
    StaticRef,
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Named(Name),
    Dynamic(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: Expr,
    pub unpack: bool,
}

impl Arg {
    pub fn new(value: Expr) -> Self {
        Self {
            value,
            unpack: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayItem {
    pub key: Option<Expr>,
    pub value: Expr,
    pub by_ref: bool,
    pub unpack: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeHint {
    pub name: Name,
    pub nullable: bool,
}

impl TypeHint {
    pub fn is_scalar(&self) -> bool {
        self.name.kind != NameKind::FullyQualified
            && self.name.parts.len() == 1
            && SCALAR_TYPES.contains(&self.name.first().to_ascii_lowercase().as_str())
    }
}

/// Type names that are never resolved against namespaces.
pub const SCALAR_TYPES: &[&str] = &[
    "string", "int", "float", "bool", "array", "callable", "mixed", "object", "iterable", "void",
    "null",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Option<TypeHint>,
    pub default: Option<Expr>,
    pub by_ref: bool,
    pub variadic: bool,
    /// Constructor promotion modifier; always rejected.
    pub promoted: bool,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosureUse {
    pub name: String,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub params: Vec<Param>,
    pub uses: Vec<ClosureUse>,
    pub body: Vec<Stmt>,
    pub by_ref_return: bool,
    pub is_static: bool,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Variable(String),
    DynamicVariable(Box<Expr>),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    Array(Vec<ArrayItem>),
    ArrayDimFetch {
        target: Box<Expr>,
        dim: Option<Box<Expr>>,
    },
    PropertyFetch {
        object: Box<Expr>,
        name: MemberName,
    },
    MethodCall {
        object: Box<Expr>,
        name: MemberName,
        args: Vec<Arg>,
    },
    StaticCall {
        class: ClassRef,
        name: MemberName,
        args: Vec<Arg>,
    },
    StaticPropertyFetch {
        class: ClassRef,
        name: String,
    },
    ClassConstFetch {
        class: ClassRef,
        name: String,
    },
    ConstFetch(Name),
    FuncCall {
        callee: Callee,
        args: Vec<Arg>,
    },
    New {
        class: ClassRef,
        args: Vec<Arg>,
    },
    AnonymousClass,
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    AssignOp {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    IncDec {
        kind: IncDec,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Ternary {
        cond: Box<Expr>,
        then: Option<Box<Expr>>,
        otherwise: Box<Expr>,
    },
    Instanceof {
        expr: Box<Expr>,
        class: ClassRef,
    },
    Cast {
        kind: CastKind,
        expr: Box<Expr>,
    },
    Isset(Vec<Expr>),
    Closure(Closure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

impl Expr {
    pub fn new(kind: ExprKind, loc: SourceLocation) -> Self {
        Self {
            kind,
            loc,
            attrs: Attributes::new(),
        }
    }

    pub fn variable(name: &str, loc: SourceLocation) -> Self {
        Self::new(ExprKind::Variable(name.to_string()), loc)
    }

    /// Variable introduced by a rewrite pass.
    pub fn synthetic_variable(name: &str, loc: SourceLocation) -> Self {
        let mut expr = Self::variable(name, loc);
        expr.attrs.set(attr::SYNTHETIC, true);
        expr
    }

    pub fn is_this(&self) -> bool {
        matches!(&self.kind, ExprKind::Variable(name) if name == "this")
    }

    pub fn variable_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Variable(name) => Some(name),
            _ => None,
        }
    }

    pub fn boxed(self) -> Box<Expr> {
        Box::new(self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct UseItem {
    pub name: Name,
    pub alias: Option<String>,
}

impl UseItem {
    /// The local alias this import introduces.
    pub fn local_name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.name.last())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub types: Vec<Name>,
    pub var: String,
    pub body: Vec<Stmt>,
    pub loc: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ElseIf {
    pub cond: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expression(Expr),
    Echo(Vec<Expr>),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        else_ifs: Vec<ElseIf>,
        otherwise: Option<Vec<Stmt>>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    For {
        init: Vec<Expr>,
        cond: Vec<Expr>,
        step: Vec<Expr>,
        body: Vec<Stmt>,
    },
    Foreach {
        subject: Expr,
        key: Option<Expr>,
        value: Expr,
        by_ref: bool,
        body: Vec<Stmt>,
    },
    Break,
    Continue,
    Throw(Expr),
    Try {
        body: Vec<Stmt>,
        catches: Vec<Catch>,
        finally: Option<Vec<Stmt>>,
    },
    Block(Vec<Stmt>),
    Namespace {
        name: Option<Name>,
        body: Vec<Stmt>,
        braced: bool,
    },
    Use(Vec<UseItem>),
    Class(ClassDecl),
    Interface(InterfaceDecl),
    Function {
        name: String,
    },
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

impl Stmt {
    pub fn new(kind: StmtKind, loc: SourceLocation) -> Self {
        Self {
            kind,
            loc,
            attrs: Attributes::new(),
        }
    }

    pub fn expression(expr: Expr) -> Self {
        let loc = expr.loc;
        Self::new(StmtKind::Expression(expr), loc)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLASS-LIKE DECLARATIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub visibility: Option<Visibility>,
    pub is_static: bool,
    pub is_abstract: bool,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: String,
    pub default: Option<Expr>,
    pub modifiers: Modifiers,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
    pub name: String,
    pub value: Expr,
    pub modifiers: Modifiers,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Param>,
    /// `None` for abstract and interface methods.
    pub body: Option<Vec<Stmt>>,
    pub by_ref_return: bool,
    pub modifiers: Modifiers,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

impl MethodDecl {
    pub fn is_constructor(&self) -> bool {
        self.name.eq_ignore_ascii_case(CONSTRUCTOR_NAME)
    }
}

pub const CONSTRUCTOR_NAME: &str = "__construct";

#[derive(Debug, Clone, PartialEq)]
pub enum ClassMember {
    Property(PropertyDecl),
    Const(ConstDecl),
    Method(MethodDecl),
    TraitUse(Vec<Name>),
}

impl ClassMember {
    pub fn name(&self) -> Option<&str> {
        match self {
            ClassMember::Property(p) => Some(&p.name),
            ClassMember::Const(c) => Some(&c.name),
            ClassMember::Method(m) => Some(&m.name),
            ClassMember::TraitUse(_) => None,
        }
    }

    pub fn attrs(&self) -> Option<&Attributes> {
        match self {
            ClassMember::Property(p) => Some(&p.attrs),
            ClassMember::Const(c) => Some(&c.attrs),
            ClassMember::Method(m) => Some(&m.attrs),
            ClassMember::TraitUse(_) => None,
        }
    }

    pub fn modifiers(&self) -> Modifiers {
        match self {
            ClassMember::Property(p) => p.modifiers,
            ClassMember::Const(c) => c.modifiers,
            ClassMember::Method(m) => m.modifiers,
            ClassMember::TraitUse(_) => Modifiers::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub parent: Option<Name>,
    pub interfaces: Vec<Name>,
    pub members: Vec<ClassMember>,
    pub is_abstract: bool,
    pub is_final: bool,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

impl ClassDecl {
    /// Fully-qualified name if a naming pass has run, else the short name.
    pub fn qualified_name(&self) -> String {
        self.attrs
            .get_str(attr::NAMESPACED_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            ClassMember::Method(method) => Some(method),
            _ => None,
        })
    }

    pub fn constructor(&self) -> Option<&MethodDecl> {
        self.methods().find(|m| m.is_constructor())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub extends: Vec<Name>,
    pub members: Vec<ClassMember>,
    pub loc: SourceLocation,
    pub attrs: Attributes,
}

impl InterfaceDecl {
    pub fn qualified_name(&self) -> String {
        self.attrs
            .get_str(attr::NAMESPACED_NAME)
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }
}

/// One parsed source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub stmts: Vec<Stmt>,
}

impl SourceFile {
    /// Visits every class declaration, wherever it is nested in namespaces.
    pub fn classes(&self) -> Vec<&ClassDecl> {
        fn collect<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a ClassDecl>) {
            for stmt in stmts {
                match &stmt.kind {
                    StmtKind::Class(class) => out.push(class),
                    StmtKind::Namespace { body, .. } => collect(body, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.stmts, &mut out);
        out
    }

    pub fn interfaces(&self) -> Vec<&InterfaceDecl> {
        fn collect<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a InterfaceDecl>) {
            for stmt in stmts {
                match &stmt.kind {
                    StmtKind::Interface(iface) => out.push(iface),
                    StmtKind::Namespace { body, .. } => collect(body, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.stmts, &mut out);
        out
    }
}
