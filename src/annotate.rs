//! Annotation passes that run on simplified, checked trees.
//!
//! They decorate nodes with attributes consumed by the registry and code
//! generation and never change the tree's shape.

use indexmap::IndexSet;
use lazy_static::lazy_static;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::ast::{
    attr, Catch, ClassDecl, ClassMember, ClassRef, Closure, Expr, ExprKind, InterfaceDecl,
    MemberName, MethodDecl, Name, Param, SourceFile, Visibility,
};
use crate::registry::Registry;
use crate::validate::{CompilerError, CompilerResult, ErrorKind};
use crate::visitor::{walk_class, walk_closure, walk_expr, walk_interface, walk_method, VisitMut};

lazy_static! {
    /// Runtime API interfaces a script may receive, mapped to the class that implements them.
    static ref SCRIPT_APIS: HashMap<&'static str, &'static str> = [
        ("Phpjs\\Api\\Console", "Phpjs\\Shim\\Console"),
        ("Phpjs\\Api\\Document", "Phpjs\\Shim\\Document"),
    ]
    .into_iter()
    .collect();
}

pub fn script_api_implementation(api: &str) -> Option<&'static str> {
    SCRIPT_APIS.get(api).copied()
}

/// Runs every pass that only needs the file itself.
pub fn annotate(file: &mut SourceFile, script_interface: &str) -> CompilerResult<()> {
    stamp_member_visibility(file);
    FirstAssignmentAnnotator::default().visit_stmts(&mut file.stmts)?;
    ScriptDependencyAnnotator { script_interface }.visit_stmts(&mut file.stmts)?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEMBER VISIBILITY
// ═══════════════════════════════════════════════════════════════════════════════

fn stamp_members(members: &mut [ClassMember]) {
    for member in members {
        let modifiers = member.modifiers();
        let attrs = match member {
            ClassMember::Property(p) => &mut p.attrs,
            ClassMember::Const(c) => &mut c.attrs,
            ClassMember::Method(m) => &mut m.attrs,
            ClassMember::TraitUse(_) => continue,
        };
        if !attrs.has(attr::VISIBILITY) {
            let vis = modifiers.visibility.unwrap_or(Visibility::Public);
            attrs.set(attr::VISIBILITY, vis.as_str());
        }
    }
}

/// Records each declared member's visibility, defaulting to public.
pub fn stamp_member_visibility(file: &mut SourceFile) {
    struct Stamper;
    impl VisitMut for Stamper {
        fn visit_class(&mut self, class: &mut ClassDecl) -> CompilerResult<()> {
            stamp_members(&mut class.members);
            Ok(())
        }

        fn visit_interface(&mut self, iface: &mut InterfaceDecl) -> CompilerResult<()> {
            stamp_members(&mut iface.members);
            Ok(())
        }
    }
    // Stamper never fails
    let _ = Stamper.visit_stmts(&mut file.stmts);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FIRST ASSIGNMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Marks each assignment to a plain variable with whether it is the first one
/// in its function scope, in source order.
///
/// Assignments already carrying the attribute keep it; the foreach rewrite
/// stamps callback bodies so they assign into the enclosing scope.
#[derive(Default)]
pub struct FirstAssignmentAnnotator {
    frames: Vec<HashSet<String>>,
}

impl FirstAssignmentAnnotator {
    fn with_frame<T>(
        &mut self,
        seeded: impl IntoIterator<Item = String>,
        body: impl FnOnce(&mut Self) -> CompilerResult<T>,
    ) -> CompilerResult<T> {
        self.frames.push(seeded.into_iter().collect());
        let result = body(self);
        self.frames.pop();
        result
    }
}

fn param_names(params: &[Param]) -> Vec<String> {
    params.iter().map(|p| p.name.clone()).collect()
}

impl VisitMut for FirstAssignmentAnnotator {
    fn visit_method(&mut self, method: &mut MethodDecl) -> CompilerResult<()> {
        let seeded = param_names(&method.params);
        self.with_frame(seeded, |this| walk_method(this, method))
    }

    fn visit_closure(&mut self, closure: &mut Closure) -> CompilerResult<()> {
        let mut seeded = param_names(&closure.params);
        seeded.extend(closure.uses.iter().map(|u| u.name.clone()));
        self.with_frame(seeded, |this| walk_closure(this, closure))
    }

    fn visit_catch(&mut self, catch: &mut Catch) -> CompilerResult<()> {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(catch.var.clone());
        }
        self.visit_stmts(&mut catch.body)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> CompilerResult<()> {
        let ExprKind::Assign { target, value } = &mut expr.kind else {
            return walk_expr(self, expr);
        };
        let name = match target.variable_name() {
            Some(name) if !target.attrs.flag(attr::SYNTHETIC) && name != "this" => name.to_string(),
            _ => return walk_expr(self, expr),
        };
        self.visit_expr(value)?;
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let first = frame.insert(name);
        if !expr.attrs.has(attr::DECLARES) {
            expr.attrs.set(attr::DECLARES, first);
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCRIPT DEPENDENCIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Validates the constructor of the script class and records the runtime APIs
/// it receives, in parameter order.
pub struct ScriptDependencyAnnotator<'a> {
    pub script_interface: &'a str,
}

impl VisitMut for ScriptDependencyAnnotator<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> CompilerResult<()> {
        if !class.interfaces.iter().any(|i| i.joined() == self.script_interface) {
            return Ok(());
        }
        let mut apis = Vec::new();
        for member in class.members.iter_mut() {
            let ClassMember::Method(method) = member else {
                continue;
            };
            let is_constructor = method.is_constructor();
            for param in method.params.iter_mut() {
                let hint = param.ty.take();
                if !is_constructor {
                    continue;
                }
                let api = hint
                    .map(|t| t.name.joined())
                    .filter(|name| SCRIPT_APIS.contains_key(name.as_str()))
                    .ok_or_else(|| {
                        CompilerError::new(
                            ErrorKind::ScriptDependency,
                            "script classes can only have dependencies from Phpjs\\Api",
                        )
                        .at(param.loc)
                        .with_hint(format!("parameter ${} of {}", param.name, class.name))
                    })?;
                apis.push(Value::String(api));
            }
        }
        debug!(class = %class.qualified_name(), apis = apis.len(), "script class");
        class.attrs.set(attr::SCRIPT_DEPENDENCIES, Value::Array(apis));
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// $this VISIBILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Stamps every `$this->member` access with the bucket it resolves to.
///
/// Needs the complete registry, so it runs once every dependency is loaded.
pub struct ThisVisibilityAnnotator<'a> {
    registry: &'a Registry,
    class: Option<String>,
}

impl<'a> ThisVisibilityAnnotator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            class: None,
        }
    }
}

impl VisitMut for ThisVisibilityAnnotator<'_> {
    fn visit_class(&mut self, class: &mut ClassDecl) -> CompilerResult<()> {
        let outer = self.class.replace(class.qualified_name());
        let result = walk_class(self, class);
        self.class = outer;
        result
    }

    fn visit_interface(&mut self, iface: &mut InterfaceDecl) -> CompilerResult<()> {
        walk_interface(self, iface)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> CompilerResult<()> {
        let member = match &expr.kind {
            ExprKind::PropertyFetch { object, name } | ExprKind::MethodCall { object, name, .. }
                if object.is_this() =>
            {
                Some(name)
            }
            _ => None,
        };
        if let (Some(name), Some(class)) = (member, self.class.as_deref()) {
            let vis = match name {
                MemberName::Ident(name) => self
                    .registry
                    .get_visibility(class, name)
                    .map_err(|e| e.at(expr.loc))?,
                MemberName::Dynamic(_) => {
                    return Err(CompilerError::unsupported(
                        "cannot compile access to this with variable expression",
                        expr.loc,
                    ))
                }
            };
            expr.attrs.set(attr::VISIBILITY, vis.as_str());
        }
        walk_expr(self, expr)
    }
}

pub fn annotate_this_visibility(file: &mut SourceFile, registry: &Registry) -> CompilerResult<()> {
    ThisVisibilityAnnotator::new(registry)
        .visit_stmts(&mut file.stmts)
        .map_err(|e| e.in_file(&file.path))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEPENDENCY EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Collects every class, interface and function name a file refers to.
#[derive(Default)]
pub struct DependencyCollector {
    names: IndexSet<String>,
}

impl DependencyCollector {
    fn add(&mut self, name: &Name) {
        if !name.parts.is_empty() {
            self.names.insert(name.joined());
        }
    }

    fn add_class_ref(&mut self, class: &ClassRef) {
        if let ClassRef::Named(name) = class {
            self.add(name);
        }
    }

    pub fn into_names(self) -> Vec<String> {
        self.names.into_iter().collect()
    }
}

impl VisitMut for DependencyCollector {
    fn visit_class(&mut self, class: &mut ClassDecl) -> CompilerResult<()> {
        if let Some(parent) = &class.parent {
            self.add(parent);
        }
        for iface in &class.interfaces {
            self.add(iface);
        }
        for api in class.attrs.get_strings(attr::SCRIPT_DEPENDENCIES).unwrap_or_default() {
            if let Some(shim) = script_api_implementation(&api) {
                self.names.insert(shim.to_string());
            }
            self.names.insert(api);
        }
        walk_class(self, class)
    }

    fn visit_interface(&mut self, iface: &mut InterfaceDecl) -> CompilerResult<()> {
        for parent in &iface.extends {
            self.add(parent);
        }
        walk_interface(self, iface)
    }

    fn visit_param(&mut self, param: &mut Param) -> CompilerResult<()> {
        if let Some(ty) = param.ty.as_ref().filter(|t| !t.is_scalar()) {
            self.add(&ty.name);
        }
        if let Some(default) = param.default.as_mut() {
            self.visit_expr(default)?;
        }
        Ok(())
    }

    fn visit_catch(&mut self, catch: &mut Catch) -> CompilerResult<()> {
        for ty in &catch.types {
            self.add(ty);
        }
        self.visit_stmts(&mut catch.body)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> CompilerResult<()> {
        match &expr.kind {
            ExprKind::New { class, .. } | ExprKind::Instanceof { class, .. } => {
                self.add_class_ref(class)
            }
            ExprKind::ClassConstFetch { class, name } if !name.eq_ignore_ascii_case("class") => {
                self.add_class_ref(class)
            }
            ExprKind::FuncCall {
                callee: crate::ast::Callee::Named(name),
                ..
            } => self.add(name),
            _ => {}
        }
        walk_expr(self, expr)
    }
}

pub fn collect_dependencies(file: &mut SourceFile) -> CompilerResult<Vec<String>> {
    let mut collector = DependencyCollector::default();
    collector.visit_stmts(&mut file.stmts)?;
    Ok(collector.into_names())
}

#[cfg(test)]
#[path = "annotate_tests.rs"]
mod tests;
