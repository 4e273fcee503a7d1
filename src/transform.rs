//! Rewrite pipeline.
//!
//! Each pass is a [`Fold`] that consumes the tree and returns a new one. The
//! passes run in a fixed order and every pass relies on the normal form left by
//! the ones before it:
//!
//! 1. name resolution
//! 2. `use` removal
//! 3. `self::` / `parent::` resolution
//! 4. compound assignment and increment desugaring
//! 5. parameter type guards (or plain type stripping for internal stubs)
//! 6. array literal, index and `foreach` desugaring
//! 7. `null` initialisers for variables read before any assignment

use indexmap::IndexSet;
use std::collections::{HashMap, HashSet};
use std::mem;
use tracing::debug;

use crate::ast::{
    attr, Arg, BinaryOp, ClassDecl, ClassRef, Callee, Closure, Expr, ExprKind, InterfaceDecl,
    MemberName, MethodDecl, Name, Param, SourceFile, SourceLocation, Stmt, StmtKind, TypeHint,
    UnaryOp,
};
use crate::validate::{CompilerError, CompilerResult};
use crate::visitor::{
    fold_class_children, fold_closure_children, fold_expr_children, fold_interface_children,
    fold_method_children, fold_stmt_children, walk_expr, walk_stmts, Fold, VisitMut,
};

/// Synthetic local bound to a snapshot of the parent class's members.
pub const PARENT_BINDING: &str = "__parent";

/// Runtime list/map emulation constructed for array literals.
pub const ARRAY_CLASS: &str = "JS\\PhpArray";

/// Error class thrown by parameter guards.
pub const TYPE_ERROR_CLASS: &str = "TypeError";

/// Which variant of the pipeline a file goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    /// User code: parameter types become runtime guards.
    Full,
    /// Internal stubs: parameter types are dropped without guards.
    Reduced,
}

/// Runs the rewrite pipeline over one parsed file.
pub fn simplify(file: SourceFile, pipeline: Pipeline, script_interface: &str) -> CompilerResult<SourceFile> {
    let SourceFile { path, stmts } = file;
    let run = |stmts: Vec<Stmt>| -> CompilerResult<Vec<Stmt>> {
        let stmts = run_pass("resolve-names", &mut NameResolver::default(), stmts)?;
        let stmts = run_pass("remove-use", &mut UseRemover, stmts)?;
        let stmts = run_pass("self-parent", &mut SelfParentRewriter::default(), stmts)?;
        let stmts = run_pass("compound-operators", &mut CompoundOperatorRewriter, stmts)?;
        let stmts = match pipeline {
            Pipeline::Full => run_pass(
                "type-guards",
                &mut TypeGuardRewriter::new(script_interface),
                stmts,
            )?,
            Pipeline::Reduced => run_pass("strip-types", &mut TypeStripper, stmts)?,
        };
        let stmts = run_pass("arrays", &mut ArrayRewriter, stmts)?;
        run_pass("undefined-variables", &mut UndefinedVariableRewriter, stmts)
    };
    let stmts = run(stmts).map_err(|e| e.in_file(&path))?;
    Ok(SourceFile { path, stmts })
}

fn run_pass<F: Fold>(name: &str, folder: &mut F, stmts: Vec<Stmt>) -> CompilerResult<Vec<Stmt>> {
    debug!(pass = name, statements = stmts.len(), "rewrite pass");
    folder.fold_stmts(stmts)
}

fn prepend(body: &mut Vec<Stmt>, mut stmts: Vec<Stmt>) {
    if stmts.is_empty() {
        return;
    }
    stmts.append(body);
    *body = stmts;
}

fn named_class(joined: &str) -> ClassRef {
    ClassRef::Named(Name::fully_qualified(joined))
}

fn call_method(object: Expr, name: &str, args: Vec<Expr>, loc: SourceLocation) -> Expr {
    Expr::new(
        ExprKind::MethodCall {
            object: object.boxed(),
            name: MemberName::Ident(name.to_string()),
            args: args.into_iter().map(Arg::new).collect(),
        },
        loc,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// 1. NAME RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Resolves class, function and constant names to their fully-qualified form
/// and stamps every class-like declaration with `namespacedName`.
#[derive(Default)]
pub struct NameResolver {
    namespace: Option<Name>,
    /// Lowercased alias to import target.
    aliases: HashMap<String, Name>,
    class: Option<String>,
}

impl NameResolver {
    fn qualify(&self, local: &str) -> String {
        match &self.namespace {
            Some(ns) if !ns.parts.is_empty() => format!("{}\\{}", ns.joined(), local),
            _ => local.to_string(),
        }
    }

    pub fn resolve_class(&self, name: &Name) -> Name {
        if name.is_fully_qualified() {
            return name.clone();
        }
        if let Some(target) = self.aliases.get(&name.first().to_ascii_lowercase()) {
            let mut parts = target.parts.clone();
            parts.extend(name.parts.iter().skip(1).cloned());
            return Name::fully_qualified(&parts.join("\\"));
        }
        Name::fully_qualified(&self.qualify(&name.joined()))
    }

    /// Functions and constants: unqualified names refer to the global scope.
    pub fn resolve_function(&self, name: &Name) -> Name {
        match name.kind {
            crate::ast::NameKind::Unqualified => Name::fully_qualified(&name.joined()),
            _ => self.resolve_class(name),
        }
    }

    fn resolve_class_ref(&self, class: ClassRef) -> ClassRef {
        match class {
            ClassRef::Named(name) => ClassRef::Named(self.resolve_class(&name)),
            other => other,
        }
    }

    fn resolve_type(&self, ty: TypeHint) -> TypeHint {
        if ty.is_scalar() {
            return ty;
        }
        if ty.name.parts.len() == 1 && ty.name.first().eq_ignore_ascii_case("self") {
            if let Some(class) = &self.class {
                return TypeHint {
                    name: Name::fully_qualified(class),
                    nullable: ty.nullable,
                };
            }
        }
        TypeHint {
            name: self.resolve_class(&ty.name),
            nullable: ty.nullable,
        }
    }
}

impl Fold for NameResolver {
    fn fold_stmt(&mut self, stmt: Stmt) -> CompilerResult<Vec<Stmt>> {
        match stmt.kind {
            StmtKind::Namespace { name, body, braced } => {
                let saved_ns = mem::replace(&mut self.namespace, name.clone());
                let saved_aliases = mem::take(&mut self.aliases);
                let body = self.fold_stmts(body)?;
                self.namespace = saved_ns;
                self.aliases = saved_aliases;
                Ok(vec![Stmt {
                    kind: StmtKind::Namespace { name, body, braced },
                    ..stmt
                }])
            }
            StmtKind::Use(items) => {
                for item in &items {
                    self.aliases.insert(
                        item.local_name().to_ascii_lowercase(),
                        Name::fully_qualified(&item.name.joined()),
                    );
                }
                Ok(vec![Stmt {
                    kind: StmtKind::Use(items),
                    ..stmt
                }])
            }
            kind => {
                let mut stmt = fold_stmt_children(self, Stmt { kind, ..stmt })?;
                if let StmtKind::Try { catches, .. } = &mut stmt.kind {
                    for catch in catches.iter_mut() {
                        catch.types = catch.types.iter().map(|t| self.resolve_class(t)).collect();
                    }
                }
                Ok(vec![stmt])
            }
        }
    }

    fn fold_class(&mut self, mut class: ClassDecl) -> CompilerResult<ClassDecl> {
        let qualified = self.qualify(&class.name);
        class.attrs.set(attr::NAMESPACED_NAME, qualified.clone());
        class.parent = class.parent.as_ref().map(|p| self.resolve_class(p));
        class.interfaces = class.interfaces.iter().map(|i| self.resolve_class(i)).collect();
        let saved = self.class.replace(qualified);
        let class = fold_class_children(self, class);
        self.class = saved;
        class
    }

    fn fold_interface(&mut self, mut iface: InterfaceDecl) -> CompilerResult<InterfaceDecl> {
        let qualified = self.qualify(&iface.name);
        iface.attrs.set(attr::NAMESPACED_NAME, qualified.clone());
        iface.extends = iface.extends.iter().map(|i| self.resolve_class(i)).collect();
        let saved = self.class.replace(qualified);
        let iface = fold_interface_children(self, iface);
        self.class = saved;
        iface
    }

    fn fold_param(&mut self, mut param: Param) -> CompilerResult<Param> {
        param.ty = param.ty.map(|ty| self.resolve_type(ty));
        param.default = param.default.map(|d| self.fold_expr(d)).transpose()?;
        Ok(param)
    }

    fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
        let Expr { kind, loc, attrs } = fold_expr_children(self, expr)?;
        let kind = match kind {
            ExprKind::New { class, args } => ExprKind::New {
                class: self.resolve_class_ref(class),
                args,
            },
            ExprKind::Instanceof { expr, class } => ExprKind::Instanceof {
                expr,
                class: self.resolve_class_ref(class),
            },
            ExprKind::ClassConstFetch { class, name } => ExprKind::ClassConstFetch {
                class: self.resolve_class_ref(class),
                name,
            },
            ExprKind::StaticCall { class, name, args } => ExprKind::StaticCall {
                class: self.resolve_class_ref(class),
                name,
                args,
            },
            ExprKind::StaticPropertyFetch { class, name } => ExprKind::StaticPropertyFetch {
                class: self.resolve_class_ref(class),
                name,
            },
            ExprKind::FuncCall {
                callee: Callee::Named(name),
                args,
            } => ExprKind::FuncCall {
                callee: Callee::Named(self.resolve_function(&name)),
                args,
            },
            ExprKind::ConstFetch(name) => ExprKind::ConstFetch(self.resolve_function(&name)),
            other => other,
        };
        Ok(Expr { kind, loc, attrs })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 2. USE REMOVAL
// ═══════════════════════════════════════════════════════════════════════════════

struct UseRemover;

impl Fold for UseRemover {
    fn fold_stmt(&mut self, stmt: Stmt) -> CompilerResult<Vec<Stmt>> {
        match stmt.kind {
            StmtKind::Use(_) => Ok(vec![]),
            kind => Ok(vec![fold_stmt_children(self, Stmt { kind, ..stmt })?]),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 3. SELF / PARENT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct SelfParentRewriter {
    class: Option<String>,
    parent: Option<String>,
}

impl SelfParentRewriter {
    fn own(&self, loc: SourceLocation) -> CompilerResult<ClassRef> {
        self.class
            .as_deref()
            .map(named_class)
            .ok_or_else(|| CompilerError::unsupported("self:: used outside of a class", loc))
    }

    fn parent(&self, loc: SourceLocation) -> CompilerResult<ClassRef> {
        self.parent.as_deref().map(named_class).ok_or_else(|| {
            CompilerError::unsupported(
                format!(
                    "parent:: used in {} which has no parent class",
                    self.class.as_deref().unwrap_or("code outside a class")
                ),
                loc,
            )
        })
    }

    fn resolve(&self, class: ClassRef, loc: SourceLocation) -> CompilerResult<ClassRef> {
        match class {
            ClassRef::SelfRef => self.own(loc),
            ClassRef::ParentRef => self.parent(loc),
            other => Ok(other),
        }
    }
}

impl Fold for SelfParentRewriter {
    fn fold_class(&mut self, class: ClassDecl) -> CompilerResult<ClassDecl> {
        let saved_class = self.class.replace(class.qualified_name());
        let saved_parent = mem::replace(&mut self.parent, class.parent.as_ref().map(Name::joined));
        let class = fold_class_children(self, class);
        self.class = saved_class;
        self.parent = saved_parent;
        class
    }

    fn fold_interface(&mut self, iface: InterfaceDecl) -> CompilerResult<InterfaceDecl> {
        let saved_class = self.class.replace(iface.qualified_name());
        let saved_parent = self.parent.take();
        let iface = fold_interface_children(self, iface);
        self.class = saved_class;
        self.parent = saved_parent;
        iface
    }

    fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
        let Expr { kind, loc, attrs } = fold_expr_children(self, expr)?;
        let kind = match kind {
            ExprKind::StaticCall {
                class: ClassRef::ParentRef,
                name,
                args,
            } => {
                self.parent(loc)?;
                ExprKind::MethodCall {
                    object: Expr::synthetic_variable(PARENT_BINDING, loc).boxed(),
                    name,
                    args,
                }
            }
            ExprKind::StaticPropertyFetch {
                class: ClassRef::ParentRef,
                name,
            } => {
                self.parent(loc)?;
                ExprKind::PropertyFetch {
                    object: Expr::synthetic_variable(PARENT_BINDING, loc).boxed(),
                    name: MemberName::Ident(name),
                }
            }
            ExprKind::StaticCall { class, name, args } => ExprKind::StaticCall {
                class: self.resolve(class, loc)?,
                name,
                args,
            },
            ExprKind::StaticPropertyFetch { class, name } => ExprKind::StaticPropertyFetch {
                class: self.resolve(class, loc)?,
                name,
            },
            ExprKind::ClassConstFetch { class, name } => ExprKind::ClassConstFetch {
                class: self.resolve(class, loc)?,
                name,
            },
            ExprKind::New { class, args } => ExprKind::New {
                class: self.resolve(class, loc)?,
                args,
            },
            ExprKind::Instanceof { expr, class } => ExprKind::Instanceof {
                expr,
                class: self.resolve(class, loc)?,
            },
            other => other,
        };
        Ok(Expr { kind, loc, attrs })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 4. COMPOUND OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// `$x op= v` becomes `$x = $x op v`; `++`/`--` in either position become
/// `$x = $x + 1` / `$x = $x - 1`.
struct CompoundOperatorRewriter;

impl Fold for CompoundOperatorRewriter {
    fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
        let Expr { kind, loc, attrs } = fold_expr_children(self, expr)?;
        let kind = match kind {
            ExprKind::AssignOp { op, target, value } => ExprKind::Assign {
                target: target.clone(),
                value: Expr::new(
                    ExprKind::Binary {
                        op,
                        left: target,
                        right: value,
                    },
                    loc,
                )
                .boxed(),
            },
            ExprKind::IncDec { kind, target } => {
                let op = match kind {
                    crate::ast::IncDec::PreInc | crate::ast::IncDec::PostInc => BinaryOp::Add,
                    crate::ast::IncDec::PreDec | crate::ast::IncDec::PostDec => BinaryOp::Sub,
                };
                ExprKind::Assign {
                    target: target.clone(),
                    value: Expr::new(
                        ExprKind::Binary {
                            op,
                            left: target,
                            right: Expr::new(ExprKind::Int(1), loc).boxed(),
                        },
                        loc,
                    )
                    .boxed(),
                }
            }
            other => other,
        };
        Ok(Expr { kind, loc, attrs })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 5. TYPE GUARDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Replaces parameter types with runtime checks that throw `TypeError`.
///
/// The class implementing the script interface keeps its hints: its constructor
/// parameters are injected, and the script-dependency annotator reads them.
struct TypeGuardRewriter {
    script_interface: String,
    class: Option<String>,
    skip: bool,
}

impl TypeGuardRewriter {
    fn new(script_interface: &str) -> Self {
        Self {
            script_interface: script_interface.to_string(),
            class: None,
            skip: false,
        }
    }

    fn guards(&self, owner: &str, params: &mut [Param]) -> Vec<Stmt> {
        let mut guards = Vec::new();
        for (index, param) in params.iter_mut().enumerate() {
            let Some(ty) = param.ty.take() else { continue };
            if param.variadic {
                continue;
            }
            if let Some(guard) = type_guard(param, &ty, index, owner) {
                guards.push(guard);
            }
        }
        guards
    }
}

fn intrinsic_test(function: &str, subject: Expr, loc: SourceLocation) -> Expr {
    Expr::new(
        ExprKind::FuncCall {
            callee: Callee::Named(Name::fully_qualified(function)),
            args: vec![Arg::new(subject)],
        },
        loc,
    )
}

/// Expression that holds when `subject` matches `ty`; `None` for `mixed`.
fn type_test(ty: &TypeHint, subject: Expr, loc: SourceLocation) -> Option<Expr> {
    if ty.is_scalar() {
        let test = match ty.name.first().to_ascii_lowercase().as_str() {
            "string" => "is_string",
            "int" => "is_int",
            "float" => "is_float",
            "bool" => "is_bool",
            "array" | "iterable" => "is_array",
            "callable" => "is_callable",
            "object" => "is_object",
            "null" => "is_null",
            _ => return None,
        };
        return Some(intrinsic_test(test, subject, loc));
    }
    Some(Expr::new(
        ExprKind::Instanceof {
            expr: subject.boxed(),
            class: ClassRef::Named(ty.name.clone()),
        },
        loc,
    ))
}

fn type_guard(param: &Param, ty: &TypeHint, index: usize, owner: &str) -> Option<Stmt> {
    let loc = param.loc;
    let var = || Expr::variable(&param.name, loc);
    let matches = type_test(ty, var(), loc)?;
    let isset = Expr::new(ExprKind::Isset(vec![var()]), loc);
    let not = |e: Expr| {
        Expr::new(
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand: e.boxed(),
            },
            loc,
        )
    };
    let cond = if ty.nullable || param.default.is_some() {
        ExprKind::Binary {
            op: BinaryOp::And,
            left: isset.boxed(),
            right: not(matches).boxed(),
        }
    } else {
        ExprKind::Binary {
            op: BinaryOp::Or,
            left: not(isset).boxed(),
            right: not(matches).boxed(),
        }
    };
    let type_name = if ty.is_scalar() {
        ty.name.joined()
    } else {
        ty.name.to_string()
    };
    let message = format!(
        "Argument {} passed to {}() must be of type {}{}",
        index + 1,
        owner,
        if ty.nullable { "?" } else { "" },
        type_name
    );
    let throw = Stmt::new(
        StmtKind::Throw(Expr::new(
            ExprKind::New {
                class: named_class(TYPE_ERROR_CLASS),
                args: vec![Arg::new(Expr::new(ExprKind::String(message), loc))],
            },
            loc,
        )),
        loc,
    );
    Some(Stmt::new(
        StmtKind::If {
            cond: Expr::new(cond, loc),
            then: vec![throw],
            else_ifs: vec![],
            otherwise: None,
        },
        loc,
    ))
}

impl Fold for TypeGuardRewriter {
    fn fold_class(&mut self, class: ClassDecl) -> CompilerResult<ClassDecl> {
        let is_script = class
            .interfaces
            .iter()
            .any(|i| i.joined() == self.script_interface);
        let saved_skip = mem::replace(&mut self.skip, is_script);
        let saved_class = self.class.replace(class.qualified_name());
        let class = fold_class_children(self, class);
        self.skip = saved_skip;
        self.class = saved_class;
        class
    }

    fn fold_method(&mut self, method: MethodDecl) -> CompilerResult<MethodDecl> {
        let mut method = fold_method_children(self, method)?;
        if self.skip {
            return Ok(method);
        }
        let owner = format!(
            "{}::{}",
            self.class.as_deref().unwrap_or_default(),
            method.name
        );
        let guards = self.guards(&owner, &mut method.params);
        if let Some(body) = method.body.as_mut() {
            prepend(body, guards);
        }
        Ok(method)
    }

    fn fold_closure(&mut self, closure: Closure) -> CompilerResult<Closure> {
        let mut closure = fold_closure_children(self, closure)?;
        if self.skip {
            return Ok(closure);
        }
        let guards = self.guards("{closure}", &mut closure.params);
        prepend(&mut closure.body, guards);
        Ok(closure)
    }
}

/// Reduced-pipeline replacement for [`TypeGuardRewriter`].
struct TypeStripper;

impl Fold for TypeStripper {
    fn fold_param(&mut self, mut param: Param) -> CompilerResult<Param> {
        param.ty = None;
        param.default = param.default.map(|d| self.fold_expr(d)).transpose()?;
        Ok(param)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 6. ARRAYS & FOREACH
// ═══════════════════════════════════════════════════════════════════════════════

struct ArrayRewriter;

impl ArrayRewriter {
    fn literal(&mut self, items: Vec<crate::ast::ArrayItem>, loc: SourceLocation) -> CompilerResult<Expr> {
        let mut acc = Expr::new(
            ExprKind::New {
                class: named_class(ARRAY_CLASS),
                args: vec![],
            },
            loc,
        );
        for item in items {
            if item.by_ref {
                return Err(CompilerError::unsupported(
                    "by-reference array items are not supported",
                    item.value.loc,
                ));
            }
            if item.unpack {
                return Err(CompilerError::unsupported(
                    "array unpacking is not supported",
                    item.value.loc,
                ));
            }
            let value = self.fold_expr(item.value)?;
            acc = match item.key {
                Some(key) => {
                    let key = self.fold_expr(key)?;
                    call_method(acc, "setItemAt", vec![key, value], loc)
                }
                None => call_method(acc, "push", vec![value], loc),
            };
        }
        Ok(acc)
    }

    fn foreach(
        &mut self,
        subject: Expr,
        key: Option<Expr>,
        value: Expr,
        body: Vec<Stmt>,
        loc: SourceLocation,
    ) -> CompilerResult<Stmt> {
        let binding = |expr: &Expr| -> CompilerResult<Param> {
            let name = expr.variable_name().ok_or_else(|| {
                CompilerError::unsupported("foreach bindings must be plain variables", expr.loc)
            })?;
            Ok(Param {
                name: name.to_string(),
                ty: None,
                default: None,
                by_ref: false,
                variadic: false,
                promoted: false,
                loc: expr.loc,
            })
        };
        let mut params = vec![binding(&value)?];
        if let Some(key) = &key {
            params.push(binding(key)?);
        }
        let body = ForeachBody::default().fold_stmts(body)?;
        let mut closure = Closure {
            params,
            uses: vec![],
            body,
            by_ref_return: false,
            is_static: false,
            attrs: Default::default(),
        };
        closure.attrs.set(attr::NO_AUTO_DEFINE, true);
        let callback = Expr::new(ExprKind::Closure(closure), loc);
        Ok(Stmt::new(
            StmtKind::Expression(call_method(subject, "foreach", vec![callback], loc)),
            loc,
        ))
    }
}

impl Fold for ArrayRewriter {
    fn fold_stmt(&mut self, stmt: Stmt) -> CompilerResult<Vec<Stmt>> {
        let stmt = fold_stmt_children(self, stmt)?;
        match stmt.kind {
            StmtKind::Foreach {
                subject,
                key,
                value,
                by_ref,
                body,
            } => {
                if by_ref {
                    return Err(CompilerError::unsupported(
                        "foreach by reference is not supported",
                        stmt.loc,
                    ));
                }
                Ok(vec![self.foreach(subject, key, value, body, stmt.loc)?])
            }
            kind => Ok(vec![Stmt { kind, ..stmt }]),
        }
    }

    fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
        let Expr { kind, loc, attrs } = expr;
        match kind {
            ExprKind::Assign { target, value } => {
                let Expr {
                    kind: target_kind,
                    loc: target_loc,
                    attrs: target_attrs,
                } = *target;
                match target_kind {
                    ExprKind::ArrayDimFetch { target: inner, dim } => {
                        let inner = self.fold_expr(*inner)?;
                        let value = self.fold_expr(*value)?;
                        Ok(match dim {
                            Some(dim) => {
                                let dim = self.fold_expr(*dim)?;
                                call_method(inner, "setItemAt", vec![dim, value], loc)
                            }
                            None => call_method(inner, "push", vec![value], loc),
                        })
                    }
                    kind => {
                        let target = Expr {
                            kind,
                            loc: target_loc,
                            attrs: target_attrs,
                        };
                        Ok(Expr {
                            kind: ExprKind::Assign {
                                target: self.fold_expr(target)?.boxed(),
                                value: self.fold_expr(*value)?.boxed(),
                            },
                            loc,
                            attrs,
                        })
                    }
                }
            }
            ExprKind::Array(items) => self.literal(items, loc),
            kind => {
                let folded = fold_expr_children(self, Expr { kind, loc, attrs })?;
                match folded.kind {
                    ExprKind::ArrayDimFetch { target, dim } => match dim {
                        Some(dim) => Ok(call_method(*target, "getItemAt", vec![*dim], loc)),
                        None => Err(CompilerError::unsupported(
                            "cannot use [] for reading",
                            loc,
                        )),
                    },
                    kind => Ok(Expr { kind, ..folded }),
                }
            }
        }
    }
}

/// Turns a `foreach` body into an iteration callback body: loop-level
/// `continue` returns, `break` returns `false`, and every assignment is
/// marked as not declaring (the enclosing scope owns those variables).
#[derive(Default)]
struct ForeachBody {
    loop_depth: usize,
}

impl Fold for ForeachBody {
    fn fold_stmt(&mut self, stmt: Stmt) -> CompilerResult<Vec<Stmt>> {
        let loc = stmt.loc;
        match stmt.kind {
            StmtKind::Continue if self.loop_depth == 0 => {
                Ok(vec![Stmt::new(StmtKind::Return(None), loc)])
            }
            StmtKind::Break if self.loop_depth == 0 => Ok(vec![Stmt::new(
                StmtKind::Return(Some(Expr::new(ExprKind::Bool(false), loc))),
                loc,
            )]),
            StmtKind::Return(_) => Err(CompilerError::unsupported(
                "return inside foreach is not supported",
                loc,
            )),
            kind @ (StmtKind::While { .. } | StmtKind::For { .. }) => {
                self.loop_depth += 1;
                let folded = fold_stmt_children(self, Stmt { kind, ..stmt });
                self.loop_depth -= 1;
                Ok(vec![folded?])
            }
            kind => Ok(vec![fold_stmt_children(self, Stmt { kind, ..stmt })?]),
        }
    }

    fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
        let mut expr = fold_expr_children(self, expr)?;
        if let ExprKind::Assign { target, .. } = &expr.kind {
            if target.variable_name().is_some() {
                expr.attrs.set(attr::DECLARES, false);
            }
        }
        Ok(expr)
    }

    fn fold_closure(&mut self, closure: Closure) -> CompilerResult<Closure> {
        Ok(closure)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// 7. UNDEFINED VARIABLES
// ═══════════════════════════════════════════════════════════════════════════════

/// Variables referenced and defined in one function scope.
///
/// Iteration callbacks (`noAutoDefine` closures) are transparent: what they
/// read or assign belongs to the enclosing scope, except their own parameters.
/// Other closures only contribute their captured names.
#[derive(Default)]
struct ScopeUsage {
    defined: HashSet<String>,
    referenced: IndexSet<String>,
    transparent: usize,
}

impl VisitMut for ScopeUsage {
    fn visit_expr(&mut self, expr: &mut Expr) -> CompilerResult<()> {
        if expr.attrs.flag(attr::SYNTHETIC) {
            return Ok(());
        }
        match &mut expr.kind {
            ExprKind::Variable(name) => {
                if name.as_str() != "this" {
                    self.referenced.insert(name.clone());
                }
                Ok(())
            }
            ExprKind::Assign { target, value } if target.variable_name().is_some() => {
                let name = target.variable_name().unwrap_or_default().to_string();
                self.visit_expr(value)?;
                if self.transparent == 0 {
                    self.defined.insert(name.clone());
                }
                self.referenced.insert(name);
                Ok(())
            }
            ExprKind::Closure(closure) if closure.attrs.flag(attr::NO_AUTO_DEFINE) => {
                let outer = mem::take(&mut self.referenced);
                self.transparent += 1;
                let walked = walk_stmts(self, &mut closure.body);
                self.transparent -= 1;
                let inner = mem::replace(&mut self.referenced, outer);
                walked?;
                for name in inner {
                    if !closure.params.iter().any(|p| p.name == name) {
                        self.referenced.insert(name);
                    }
                }
                Ok(())
            }
            ExprKind::Closure(closure) => {
                for captured in &closure.uses {
                    self.referenced.insert(captured.name.clone());
                }
                Ok(())
            }
            _ => walk_expr(self, expr),
        }
    }

    fn visit_catch(&mut self, catch: &mut crate::ast::Catch) -> CompilerResult<()> {
        if self.transparent == 0 {
            self.defined.insert(catch.var.clone());
        }
        self.visit_stmts(&mut catch.body)
    }
}

fn null_initialisers(bound: &[String], body: &mut Vec<Stmt>) -> CompilerResult<Vec<Stmt>> {
    let mut usage = ScopeUsage::default();
    usage.defined.extend(bound.iter().cloned());
    usage.visit_stmts(body)?;
    let loc = body.first().map(|s| s.loc).unwrap_or_default();
    Ok(usage
        .referenced
        .into_iter()
        .filter(|name| !usage.defined.contains(name))
        .map(|name| {
            Stmt::expression(Expr::new(
                ExprKind::Assign {
                    target: Expr::variable(&name, loc).boxed(),
                    value: Expr::new(ExprKind::Null, loc).boxed(),
                },
                loc,
            ))
        })
        .collect())
}

struct UndefinedVariableRewriter;

impl Fold for UndefinedVariableRewriter {
    fn fold_method(&mut self, method: MethodDecl) -> CompilerResult<MethodDecl> {
        let mut method = fold_method_children(self, method)?;
        let bound: Vec<String> = method.params.iter().map(|p| p.name.clone()).collect();
        if let Some(body) = method.body.as_mut() {
            let inits = null_initialisers(&bound, body)?;
            prepend(body, inits);
        }
        Ok(method)
    }

    fn fold_closure(&mut self, closure: Closure) -> CompilerResult<Closure> {
        let mut closure = fold_closure_children(self, closure)?;
        if closure.attrs.flag(attr::NO_AUTO_DEFINE) {
            return Ok(closure);
        }
        let bound: Vec<String> = closure
            .params
            .iter()
            .map(|p| p.name.clone())
            .chain(closure.uses.iter().map(|u| u.name.clone()))
            .collect();
        let inits = null_initialisers(&bound, &mut closure.body)?;
        prepend(&mut closure.body, inits);
        Ok(closure)
    }
}

#[cfg(test)]
#[path = "transform_tests.rs"]
mod tests;
