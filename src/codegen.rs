//! Code generation from simplified, annotated source trees to target nodes.
//!
//! Each class becomes a module function taking its parent module:
//!
//! ```text
//! root.App.Child = (function (parent) {
//!     var constants = __copy(parent.__constants, ...);
//!     var extend = function (createClass) {
//!         return parent.__extend(function (inherited) {
//!             // buckets, members, constructor
//!             return createClass({"__public": ..., "__protected": ..., "construct": ...});
//!         });
//!     };
//!     return {"__extend": extend, "__construct": ..., "__constants": constants};
//! })(root.App.Base);
//! ```
//!
//! Instances carry no prototype chain. Every inheritance level writes its
//! members into the same public and protected objects, so later levels
//! override earlier ones; private members live in a fresh object per level.

use indexmap::IndexSet;
use lazy_static::lazy_static;
use std::collections::HashSet;
use tracing::debug_span;

use crate::ast::{
    attr, Arg, Attributes, BinaryOp, Callee, Catch, ClassDecl, ClassMember, ClassRef, Expr, ExprKind,
    InterfaceDecl, MemberName, MethodDecl, Name, Param, SourceLocation, Stmt, StmtKind, UnaryOp,
    Visibility, CONSTRUCTOR_NAME,
};
use crate::intrinsics;
use crate::js_ast::JsNode;
use crate::js_builder::*;
use crate::locator::{runtime_provided, NATIVE_NAMESPACE};
use crate::registry::Registry;
use crate::transform::PARENT_BINDING;
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

pub const ROOT: &str = "root";
pub const BASE_CLASS: &str = "__baseClass";
pub const INSTANCE_CHECK: &str = "__instanceOf";

const PUBLIC: &str = "__public";
const PROTECTED: &str = "__protected";
const PRIVATE: &str = "__private";
const CONSTANTS: &str = "constants";
const EXCEPTION_BINDING: &str = "__exception";

lazy_static! {
    /// Identifiers a translated variable must never shadow.
    static ref RESERVED_NAMES: HashSet<&'static str> = [
        // JavaScript keywords and literals
        "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete",
        "do", "else", "enum", "export", "extends", "false", "finally", "for", "function", "if",
        "implements", "import", "in", "instanceof", "interface", "let", "new", "null", "package",
        "private", "protected", "public", "return", "static", "super", "switch", "this", "throw",
        "true", "try", "typeof", "var", "void", "while", "with", "yield", "await",
        "arguments", "eval", "undefined", "NaN", "Infinity",
        // Globals the generated code relies on
        "root", "parent", "constants", "extend", "construct", "inherited", "createClass",
        "instance", "Math", "String", "Number", "Boolean", "Object", "Array", "PhpArray",
    ]
    .into_iter()
    .collect();
}

/// Variable name in the generated code for a source variable.
pub fn mangle(name: &str) -> String {
    if RESERVED_NAMES.contains(name) || name.starts_with("__") {
        format!("{}$", name)
    } else {
        name.to_string()
    }
}

/// `root.A.B` for `A\B`.
pub fn class_path(qualified: &str) -> CompilerResult<JsNode> {
    let mut segments = vec![ROOT];
    segments.extend(qualified.split('\\').filter(|s| !s.is_empty()));
    path(&segments)
}

/// `JS\document` refers to the global `document`.
fn native_path(name: &Name) -> Option<CompilerResult<JsNode>> {
    if name.parts.len() < 2 || name.parts[0] != NATIVE_NAMESPACE {
        return None;
    }
    let segments: Vec<&str> = name.parts[1..].iter().map(String::as_str).collect();
    Some(path(&segments))
}

fn bucket(vis: Visibility) -> &'static str {
    match vis {
        Visibility::Public => PUBLIC,
        Visibility::Protected => PROTECTED,
        Visibility::Private => PRIVATE,
    }
}

fn annotated_visibility(attrs: &Attributes, what: &str) -> CompilerResult<Visibility> {
    attrs
        .get_str(attr::VISIBILITY)
        .and_then(Visibility::from_str)
        .ok_or_else(|| CompilerError::internal(format!("{} has no resolved visibility", what)))
}

fn locate(err: CompilerError, loc: SourceLocation) -> CompilerError {
    if err.line == 0 {
        err.at(loc)
    } else {
        err
    }
}

fn field(key: &str, value: JsNode) -> (String, JsNode) {
    (key.to_string(), value)
}

#[derive(Default)]
struct FunctionScope {
    /// Variables first assigned inside an expression; declared at the top.
    hoisted: IndexSet<String>,
    constructor: bool,
}

pub struct ClassCompiler<'a> {
    registry: &'a Registry,
    /// Class whose constants the local `constants` binding holds.
    constants_owner: Option<String>,
    scopes: Vec<FunctionScope>,
}

impl<'a> ClassCompiler<'a> {
    pub fn new(registry: &'a Registry, constants_owner: Option<String>) -> Self {
        Self {
            registry,
            constants_owner,
            scopes: Vec::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CLASSES
    // ═══════════════════════════════════════════════════════════════════════════

    fn class_module(&mut self, class: &ClassDecl, name: &str) -> CompilerResult<JsNode> {
        let mut constructor: Option<&MethodDecl> = None;
        let mut level = vec![
            assign_var(PUBLIC, Some(path(&["inherited", PUBLIC])?))?,
            assign_var(PROTECTED, Some(path(&["inherited", PROTECTED])?))?,
            assign_var(PRIVATE, Some(object(vec![])?))?,
            assign_var(
                PARENT_BINDING,
                Some(call(id("__copy")?, vec![id(PROTECTED)?, id(PUBLIC)?])?),
            )?,
            statement(assign(
                member(id(PARENT_BINDING)?, CONSTRUCTOR_NAME)?,
                path(&["inherited", "construct"])?,
            )?)?,
        ];
        let mut constants = Vec::new();

        for member_decl in &class.members {
            match member_decl {
                ClassMember::Method(method) if method.is_constructor() => {
                    constructor = Some(method);
                }
                ClassMember::Method(method) => level.push(self.method(name, method)?),
                ClassMember::Property(prop) => {
                    let vis = annotated_visibility(&prop.attrs, &format!("{}::${}", name, prop.name))?;
                    let value = match &prop.default {
                        Some(default) => self.compile_expr(default).map_err(|e| locate(e, prop.loc))?,
                        None => null(),
                    };
                    level.push(statement(assign(member(id(bucket(vis))?, &prop.name)?, value)?)?);
                }
                ClassMember::Const(constant) => constants.push(constant),
                ClassMember::TraitUse(_) => {
                    return Err(CompilerError::unsupported("traits are not supported", class.loc))
                }
            }
        }

        level.push(statement(assign(
            member(id(PUBLIC)?, INSTANCE_CHECK)?,
            self.instance_hook(name)?,
        )?)?);
        let construct = match constructor {
            Some(method) => {
                let body = method.body.as_deref().unwrap_or_default();
                self.compile_function(&method.params, body, true)
                    .map_err(|e| locate(e, method.loc))?
            }
            None => function_(
                vec![],
                vec![
                    statement(method_call(
                        path(&["inherited", "construct"])?,
                        "apply",
                        vec![null(), id("arguments")?],
                    )?)?,
                    return_(Some(id(PUBLIC)?))?,
                ],
            )?,
        };
        level.push(assign_var("construct", Some(construct))?);
        level.push(return_(Some(call(
            id("createClass")?,
            vec![object(vec![
                field(PUBLIC, id(PUBLIC)?),
                field(PROTECTED, id(PROTECTED)?),
                field("construct", id("construct")?),
            ])?],
        )?))?);

        let mut module = vec![self.constants_table(name, "parent")?];
        for constant in &constants {
            let value = self
                .compile_expr(&constant.value)
                .map_err(|e| locate(e, constant.loc))?;
            module.push(statement(assign(member(id(CONSTANTS)?, &constant.name)?, value)?)?);
        }
        let extend = function_(
            vec![id("createClass")?],
            vec![return_(Some(method_call(
                id("parent")?,
                "__extend",
                vec![function_(vec![id("inherited")?], level)?],
            )?))?],
        )?;
        module.push(assign_var("extend", Some(extend))?);
        let instantiate = function_(
            vec![id("instance")?],
            vec![return_(Some(path(&["instance", "construct"])?))?],
        )?;
        let factory = function_(
            vec![],
            vec![return_(Some(method_call(
                call(id("extend")?, vec![instantiate])?,
                "apply",
                vec![null(), id("arguments")?],
            )?))?],
        )?;
        module.push(return_(Some(object(vec![
            field("__extend", id("extend")?),
            field("__construct", factory),
            field("__constants", id(CONSTANTS)?),
        ])?))?);
        function_(vec![id("parent")?], module)
    }

    /// `var constants = __copy(parent.__constants, root.I.__constants, ...);`
    fn constants_table(&self, name: &str, parent_binding: &str) -> CompilerResult<JsNode> {
        let mut sources = vec![member(id(parent_binding)?, "__constants")?];
        for iface in self.registry.declared_interfaces(name)? {
            if self.registry.interface(&iface).is_some() {
                sources.push(member(class_path(&iface)?, "__constants")?);
            }
        }
        assign_var(CONSTANTS, Some(call(id("__copy")?, sources)?))
    }

    fn method(&mut self, class: &str, method: &MethodDecl) -> CompilerResult<JsNode> {
        if method.name.starts_with("__") {
            return Err(CompilerError::unsupported(
                format!("magic method {}::{} is not supported", class, method.name),
                method.loc,
            ));
        }
        let body = match method.body.as_deref() {
            Some(body) if !method.modifiers.is_abstract => body,
            _ => {
                return Err(CompilerError::unsupported(
                    format!("abstract method {}::{}() is not supported", class, method.name),
                    method.loc,
                ))
            }
        };
        let vis = annotated_visibility(&method.attrs, &format!("{}::{}()", class, method.name))?;
        let function = self
            .compile_function(&method.params, body, false)
            .map_err(|e| locate(e, method.loc))?;
        statement(assign(member(id(bucket(vis))?, &method.name)?, function)?)
    }

    /// `function (name) { return name === "A\\B" || __parent.__instanceOf(name) || ...; }`
    fn instance_hook(&self, name: &str) -> CompilerResult<JsNode> {
        let mut checks = vec![
            binary("===", id("name")?, string(name))?,
            method_call(id(PARENT_BINDING)?, INSTANCE_CHECK, vec![id("name")?])?,
        ];
        for iface in self.registry.declared_interfaces(name)? {
            checks.push(binary("===", id("name")?, string(&iface))?);
        }
        function_(vec![id("name")?], vec![return_(Some(or_(checks)?))?])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FUNCTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn compile_function(
        &mut self,
        params: &[Param],
        body: &[Stmt],
        constructor: bool,
    ) -> CompilerResult<JsNode> {
        self.scopes.push(FunctionScope {
            hoisted: IndexSet::new(),
            constructor,
        });
        let parts = self.function_parts(params, body);
        let scope = self.scopes.pop().unwrap_or_default();
        let (formals, mut stmts) = parts?;
        if constructor {
            stmts.push(return_(Some(id(PUBLIC)?))?);
        }
        let mut all = Vec::with_capacity(scope.hoisted.len() + stmts.len());
        for name in &scope.hoisted {
            all.push(assign_var(name, None)?);
        }
        all.extend(stmts);
        function_(formals, all)
    }

    fn function_parts(
        &mut self,
        params: &[Param],
        body: &[Stmt],
    ) -> CompilerResult<(Vec<JsNode>, Vec<JsNode>)> {
        let mut formals = Vec::new();
        let mut stmts = Vec::new();
        for (index, param) in params.iter().enumerate() {
            let name = mangle(&param.name);
            if param.variadic {
                let rest = call(
                    path(&["Array", "prototype", "slice", "call"])?,
                    vec![id("arguments")?, int(index as i64)],
                )?;
                stmts.push(assign_var(&name, Some(call(id("__toPhpArray")?, vec![rest])?))?);
                continue;
            }
            formals.push(id(&name)?);
            if let Some(default) = &param.default {
                let value = self.compile_expr(default)?;
                stmts.push(if_(
                    binary("===", id(&name)?, undefined())?,
                    vec![statement(assign(id(&name)?, value)?)?],
                    None,
                )?);
            }
        }
        stmts.extend(self.compile_stmts(body)?);
        Ok((formals, stmts))
    }

    fn scope(&mut self) -> CompilerResult<&mut FunctionScope> {
        self.scopes
            .last_mut()
            .ok_or_else(|| CompilerError::internal("assignment outside of a function body"))
    }

    /// The mangled name when `expr` is the first assignment to a plain variable.
    fn declared_variable(&self, expr: &Expr, target: &Expr) -> CompilerResult<Option<String>> {
        let Some(name) = target.variable_name() else {
            return Ok(None);
        };
        if target.attrs.flag(attr::SYNTHETIC) || target.is_this() {
            return Ok(None);
        }
        let declares = expr.attrs.get_bool(attr::DECLARES).ok_or_else(|| {
            CompilerError::internal(format!("assignment to ${} was not annotated", name))
        })?;
        Ok(declares.then(|| mangle(name)))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> CompilerResult<Vec<JsNode>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            out.push(self.compile_stmt(stmt).map_err(|e| locate(e, stmt.loc))?);
        }
        Ok(out)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> CompilerResult<JsNode> {
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                if let ExprKind::Assign { target, value } = &expr.kind {
                    if let Some(name) = self.declared_variable(expr, target)? {
                        let value = self.compile_expr(value)?;
                        return assign_var(&name, Some(value));
                    }
                }
                statement(self.compile_expr(expr)?)
            }
            StmtKind::Echo(exprs) => {
                let args = self.compile_exprs(exprs)?;
                statement(call(id("__echo")?, args)?)
            }
            StmtKind::Return(value) => {
                let in_constructor = self.scopes.last().map_or(false, |s| s.constructor);
                match value {
                    Some(value) => return_(Some(self.compile_expr(value)?)),
                    None if in_constructor => return_(Some(id(PUBLIC)?)),
                    None => return_(None),
                }
            }
            StmtKind::If {
                cond,
                then,
                else_ifs,
                otherwise,
            } => {
                let cond = self.compile_expr(cond)?;
                let then = self.compile_stmts(then)?;
                let mut branches = Vec::with_capacity(else_ifs.len());
                for branch in else_ifs {
                    branches.push((
                        self.compile_expr(&branch.cond)?,
                        self.compile_stmts(&branch.body)?,
                    ));
                }
                let mut tail = match otherwise {
                    Some(body) => Some(block(self.compile_stmts(body)?)?),
                    None => None,
                };
                for (cond, body) in branches.into_iter().rev() {
                    tail = Some(if_(cond, body, tail)?);
                }
                if_(cond, then, tail)
            }
            StmtKind::While { cond, body } => {
                let cond = self.compile_expr(cond)?;
                while_(cond, self.compile_stmts(body)?)
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if cond.len() > 1 {
                    return Err(CompilerError::unsupported(
                        "for loops with more than one condition are not supported",
                        stmt.loc,
                    ));
                }
                let init = self.sequence(init)?;
                let cond = cond.first().map(|c| self.compile_expr(c)).transpose()?;
                let step = self.sequence(step)?;
                for_(init, cond, step, self.compile_stmts(body)?)
            }
            StmtKind::Break => Ok(break_()),
            StmtKind::Continue => Ok(continue_()),
            StmtKind::Throw(value) => throw_(self.compile_expr(value)?),
            StmtKind::Try {
                body,
                catches,
                finally,
            } => {
                let body = self.compile_stmts(body)?;
                let handler = if catches.is_empty() {
                    None
                } else {
                    Some((EXCEPTION_BINDING, self.catch_chain(catches)?))
                };
                let finalizer = match finally {
                    Some(stmts) => Some(self.compile_stmts(stmts)?),
                    None => None,
                };
                try_(body, handler, finalizer)
            }
            StmtKind::Block(body) => block(self.compile_stmts(body)?),
            StmtKind::Nop => Ok(nop()),
            StmtKind::Foreach { .. } => Err(CompilerError::internal(
                "foreach reached code generation without being rewritten",
            )),
            StmtKind::Namespace { .. }
            | StmtKind::Use(_)
            | StmtKind::Class(_)
            | StmtKind::Interface(_)
            | StmtKind::Function { .. } => Err(CompilerError::unsupported(
                "declarations are only allowed at file level",
                stmt.loc,
            )),
        }
    }

    fn sequence(&mut self, exprs: &[Expr]) -> CompilerResult<Option<JsNode>> {
        if exprs.is_empty() {
            return Ok(None);
        }
        let parts = self.compile_exprs(exprs)?;
        Ok(Some(chain(",", parts)?))
    }

    /// One JS handler dispatching on the thrown value:
    /// `if (__instanceOf(__exception, "A")) { var e = __exception; ... } else { throw __exception; }`
    fn catch_chain(&mut self, catches: &[Catch]) -> CompilerResult<Vec<JsNode>> {
        let mut compiled = Vec::with_capacity(catches.len());
        for catch in catches {
            let mut tests = Vec::with_capacity(catch.types.len());
            for ty in &catch.types {
                tests.push(self.instance_check(id(EXCEPTION_BINDING)?, ty)?);
            }
            let mut body = Vec::new();
            if !catch.var.is_empty() {
                body.push(assign_var(&mangle(&catch.var), Some(id(EXCEPTION_BINDING)?))?);
            }
            body.extend(self.compile_stmts(&catch.body)?);
            compiled.push((or_(tests).map_err(|e| locate(e, catch.loc))?, body));
        }
        let mut tail = block(vec![throw_(id(EXCEPTION_BINDING)?)?])?;
        for (test, body) in compiled.into_iter().rev() {
            tail = if_(test, body, Some(tail))?;
        }
        Ok(vec![tail])
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn compile_exprs(&mut self, exprs: &[Expr]) -> CompilerResult<Vec<JsNode>> {
        exprs.iter().map(|e| self.compile_expr(e)).collect()
    }

    fn compile_args(&mut self, args: &[Arg]) -> CompilerResult<Vec<JsNode>> {
        args.iter().map(|a| self.compile_expr(&a.value)).collect()
    }

    pub fn compile_expr(&mut self, expr: &Expr) -> CompilerResult<JsNode> {
        self.expr_inner(expr).map_err(|e| locate(e, expr.loc))
    }

    fn expr_inner(&mut self, expr: &Expr) -> CompilerResult<JsNode> {
        match &expr.kind {
            ExprKind::Variable(name) => {
                if expr.is_this() {
                    id(PUBLIC)
                } else if expr.attrs.flag(attr::SYNTHETIC) {
                    id(name)
                } else {
                    id(&mangle(name))
                }
            }
            ExprKind::Int(value) => Ok(int(*value)),
            ExprKind::Float(value) => Ok(float(*value)),
            ExprKind::String(value) => Ok(string(value)),
            ExprKind::Bool(value) => Ok(boolean(*value)),
            ExprKind::Null => Ok(null()),
            ExprKind::PropertyFetch { object, name } => self.member_access(expr, object, name),
            ExprKind::MethodCall { object, name, args } => {
                let callee = self.member_access(expr, object, name)?;
                call(callee, self.compile_args(args)?)
            }
            ExprKind::ClassConstFetch { class, name } => self.class_constant(class, name),
            ExprKind::ConstFetch(name) => {
                if let Some(native) = native_path(name) {
                    return native;
                }
                intrinsics::constant(&name.joined()).unwrap_or_else(|| {
                    Err(CompilerError::unknown_identifier(format!(
                        "undefined constant {}",
                        name.joined()
                    )))
                })
            }
            ExprKind::FuncCall { callee, args } => {
                let Callee::Named(name) = callee else {
                    return Err(CompilerError::unsupported(
                        "variable function calls are not supported",
                        expr.loc,
                    ));
                };
                let args = self.compile_args(args)?;
                if let Some(native) = native_path(name) {
                    return call(native?, args);
                }
                let function = name.joined();
                if runtime_provided(&function) && !intrinsics::is_intrinsic(&function) {
                    return call(id(&function)?, args);
                }
                intrinsics::compile_call(&function, args).unwrap_or_else(|| {
                    Err(CompilerError::unknown_identifier(format!(
                        "call to undefined function {}()",
                        function
                    )))
                })
            }
            ExprKind::New { class, args } => {
                let name = self.named_class(class)?;
                let args = self.compile_args(args)?;
                if let Some(native) = native_path(name) {
                    return new_(native?, args);
                }
                let qualified = name.joined();
                if self.registry.class(&qualified).is_none() {
                    let what = if self.registry.interface(&qualified).is_some() {
                        "cannot instantiate interface"
                    } else {
                        "unknown class"
                    };
                    return Err(CompilerError::unknown_identifier(format!("{} {}", what, qualified)));
                }
                call(member(class_path(&qualified)?, "__construct")?, args)
            }
            ExprKind::Assign { target, value } => {
                let value = self.compile_expr(value)?;
                if let Some(name) = self.declared_variable(expr, target)? {
                    self.scope()?.hoisted.insert(name.clone());
                    return assign(id(&name)?, value);
                }
                match &target.kind {
                    ExprKind::Variable(_) | ExprKind::PropertyFetch { .. } => {
                        assign(self.compile_expr(target)?, value)
                    }
                    _ => Err(CompilerError::unsupported(
                        "cannot assign to this expression",
                        target.loc,
                    )),
                }
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.compile_expr(left)?;
                let right = self.compile_expr(right)?;
                match op {
                    BinaryOp::Concat => method_call(left, "concat", vec![right]),
                    BinaryOp::Pow => call(path(&["Math", "pow"])?, vec![left, right]),
                    BinaryOp::Identical => call(id("__identical")?, vec![left, right]),
                    BinaryOp::NotIdentical => not(call(id("__identical")?, vec![left, right])?),
                    BinaryOp::Xor => binary("!==", not(left)?, not(right)?),
                    other => binary(other.symbol(), left, right),
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.compile_expr(operand)?;
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                    UnaryOp::Plus => "+",
                    UnaryOp::BitNot => "~",
                };
                unary(symbol, operand)
            }
            ExprKind::Ternary {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.compile_expr(cond)?;
                let otherwise = self.compile_expr(otherwise)?;
                match then {
                    Some(then) => ternary(cond, self.compile_expr(then)?, otherwise),
                    None => or_(vec![cond, otherwise]),
                }
            }
            ExprKind::Instanceof { expr: value, class } => {
                let name = self.named_class(class)?;
                let value = self.compile_expr(value)?;
                self.instance_check(value, name)
            }
            ExprKind::Cast { kind, expr: value } => {
                let value = self.compile_expr(value)?;
                intrinsics::compile_call(intrinsics::cast_function(*kind), vec![value])
                    .unwrap_or_else(|| Err(CompilerError::internal("cast without a conversion")))
            }
            ExprKind::Isset(exprs) => {
                let mut checks = Vec::with_capacity(exprs.len());
                for e in exprs {
                    checks.push(call(id("__isset")?, vec![self.compile_expr(e)?])?);
                }
                and_(checks)
            }
            ExprKind::Closure(closure) => {
                // JavaScript closures capture by reference already; `use` lists are dropped
                self.compile_function(&closure.params, &closure.body, false)
            }
            ExprKind::Array(_)
            | ExprKind::ArrayDimFetch { .. }
            | ExprKind::AssignOp { .. }
            | ExprKind::IncDec { .. }
            | ExprKind::StaticCall { .. }
            | ExprKind::StaticPropertyFetch { .. } => Err(CompilerError::internal(
                "arrays, compound assignments and static access must be rewritten before code generation",
            )),
            ExprKind::DynamicVariable(_) | ExprKind::AnonymousClass => Err(
                CompilerError::unsupported("construct is not supported", expr.loc),
            ),
        }
    }

    fn named_class<'e>(&self, class: &'e ClassRef) -> CompilerResult<&'e Name> {
        match class {
            ClassRef::Named(name) => Ok(name),
            _ => Err(CompilerError::internal(
                "class reference was not resolved to a name",
            )),
        }
    }

    fn member_access(&mut self, access: &Expr, object: &Expr, name: &MemberName) -> CompilerResult<JsNode> {
        if object.is_this() {
            let MemberName::Ident(name) = name else {
                return Err(CompilerError::unsupported(
                    "cannot compile access to this with variable expression",
                    access.loc,
                ));
            };
            let vis = annotated_visibility(&access.attrs, &format!("$this->{}", name))?;
            return member(id(bucket(vis))?, name);
        }
        let object = self.compile_expr(object)?;
        match name {
            MemberName::Ident(name) => member(object, name),
            MemberName::Dynamic(inner) => {
                let property = self.compile_expr(inner)?;
                property_of(object, vec![property])
            }
        }
    }

    fn class_constant(&mut self, class: &ClassRef, constant: &str) -> CompilerResult<JsNode> {
        let name = self.named_class(class)?;
        if constant.eq_ignore_ascii_case("class") {
            return Ok(string(&name.joined()));
        }
        if let Some(native) = native_path(name) {
            return member(native?, constant);
        }
        let qualified = name.joined();
        if !self.registry.contains(&qualified) {
            return Err(CompilerError::unknown_identifier(format!(
                "unknown class {}",
                qualified
            )));
        }
        if !self.registry.has_constant(&qualified, constant) {
            return Err(CompilerError::unknown_identifier(format!(
                "undefined constant {}::{}",
                qualified, constant
            )));
        }
        if self.constants_owner.as_deref() == Some(qualified.as_str()) {
            return member(id(CONSTANTS)?, constant);
        }
        property_of(
            class_path(&qualified)?,
            vec![id("__constants")?, id(constant)?],
        )
    }

    fn instance_check(&self, value: JsNode, class: &Name) -> CompilerResult<JsNode> {
        if let Some(native) = native_path(class) {
            return binary("instanceof", value, native?);
        }
        call(id(INSTANCE_CHECK)?, vec![value, string(&class.joined())])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// `root.A.B = (function (parent) { ... })(root.Parent);`
pub fn compile_class(class: &ClassDecl, registry: &Registry) -> CompilerResult<JsNode> {
    let name = class.qualified_name();
    let _span = debug_span!("compile_class", class = %name).entered();
    let mut compiler = ClassCompiler::new(registry, Some(name.clone()));
    let module = compiler
        .class_module(class, &name)
        .map_err(|e| locate(e, class.loc))?;
    let parent = match &class.parent {
        Some(parent) => {
            let parent = parent.joined();
            if registry.class(&parent).is_none() {
                return Err(CompilerError::unknown_identifier(format!(
                    "{} extends unknown class {}",
                    name, parent
                ))
                .at(class.loc));
            }
            class_path(&parent)?
        }
        None => id(BASE_CLASS)?,
    };
    statement(assign(class_path(&name)?, call(module, vec![parent])?)?)
}

/// `root.I = {"__constants": __copy(root.Parent.__constants)};` followed by one
/// assignment per declared constant.
pub fn compile_interface(iface: &InterfaceDecl, registry: &Registry) -> CompilerResult<Vec<JsNode>> {
    let name = iface.qualified_name();
    let _span = debug_span!("compile_interface", interface = %name).entered();
    let mut sources = Vec::with_capacity(iface.extends.len());
    for parent in &iface.extends {
        let parent = parent.joined();
        if registry.interface(&parent).is_none() {
            return Err(CompilerError::unknown_identifier(format!(
                "{} extends unknown interface {}",
                name, parent
            ))
            .at(iface.loc));
        }
        sources.push(member(class_path(&parent)?, "__constants")?);
    }
    let table = call(id("__copy")?, sources)?;
    let mut out = vec![statement(assign(
        class_path(&name)?,
        object(vec![field("__constants", table)])?,
    )?)?];
    let mut compiler = ClassCompiler::new(registry, None);
    for member_decl in &iface.members {
        match member_decl {
            ClassMember::Const(constant) => {
                let value = compiler
                    .compile_expr(&constant.value)
                    .map_err(|e| locate(e, constant.loc))?;
                let target = property_of(
                    class_path(&name)?,
                    vec![id("__constants")?, id(&constant.name)?],
                )?;
                out.push(statement(assign(target, value)?)?);
            }
            ClassMember::Method(_) => {}
            ClassMember::Property(p) => {
                return Err(CompilerError::new(
                    ErrorKind::Unsupported,
                    format!("interface {} cannot declare property ${}", name, p.name),
                )
                .at(p.loc))
            }
            ClassMember::TraitUse(_) => {
                return Err(CompilerError::unsupported(
                    "traits are not supported",
                    iface.loc,
                ))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "codegen_tests.rs"]
mod tests;
