//! Registry of every class and interface known to one compilation.
//!
//! Entries are added as files are ingested. Lookups are by fully-qualified
//! name without a leading separator.

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::ast::{attr, Attributes, ClassDecl, ClassMember, InterfaceDecl, SourceFile, Visibility};
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassEntry {
    pub name: String,
    pub parent: Option<String>,
    pub interfaces: Vec<String>,
    pub properties: IndexMap<String, Visibility>,
    pub methods: IndexMap<String, Visibility>,
    pub constants: IndexMap<String, Visibility>,
    /// Loaded from the stub directory rather than from user sources.
    pub internal: bool,
}

impl ClassEntry {
    fn own_member(&self, member: &str) -> Option<Visibility> {
        self.properties
            .get(member)
            .or_else(|| self.methods.get(member))
            .copied()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceEntry {
    pub name: String,
    pub extends: Vec<String>,
    pub methods: IndexMap<String, Visibility>,
    pub constants: IndexMap<String, Visibility>,
    pub internal: bool,
}

/// Nested namespace object, one level per namespace segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NamespaceTree(pub BTreeMap<String, NamespaceTree>);

impl NamespaceTree {
    /// Adds every segment of a namespace path.
    pub fn insert(&mut self, namespace: &str) {
        let mut node = self;
        for segment in namespace.split('\\').filter(|s| !s.is_empty()) {
            node = node.0.entry(segment.to_string()).or_default();
        }
    }

    /// Adds the namespace enclosing a declaration; the declared name itself
    /// is not a namespace.
    pub fn insert_declaration(&mut self, qualified: &str) {
        if let Some((namespace, _)) = qualified.trim_start_matches('\\').rsplit_once('\\') {
            self.insert(namespace);
        }
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &NamespaceTree)> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn member_visibility(owner: &str, name: &str, attrs: &Attributes) -> CompilerResult<Visibility> {
    attrs
        .get_str(attr::VISIBILITY)
        .and_then(Visibility::from_str)
        .ok_or_else(|| {
            CompilerError::internal(format!(
                "member {}::{} reached the registry without a resolved visibility",
                owner, name
            ))
        })
}

#[derive(Debug, Default)]
pub struct Registry {
    classes: IndexMap<String, ClassEntry>,
    interfaces: IndexMap<String, InterfaceEntry>,
    visibility_cache: RefCell<HashMap<(String, String), Visibility>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_unique(&self, name: &str) -> CompilerResult<()> {
        if self.contains(name) {
            return Err(CompilerError::new(
                ErrorKind::DuplicateDefinition,
                format!("{} is defined more than once", name),
            ));
        }
        Ok(())
    }

    pub fn add_class(&mut self, class: &ClassDecl, internal: bool) -> CompilerResult<()> {
        let name = class.qualified_name();
        self.ensure_unique(&name).map_err(|e| e.at(class.loc))?;
        let mut entry = ClassEntry {
            name: name.clone(),
            parent: class.parent.as_ref().map(|p| p.joined()),
            interfaces: class.interfaces.iter().map(|i| i.joined()).collect(),
            properties: IndexMap::new(),
            methods: IndexMap::new(),
            constants: IndexMap::new(),
            internal,
        };
        for member in &class.members {
            match member {
                ClassMember::Property(p) => {
                    let vis = member_visibility(&name, &p.name, &p.attrs)?;
                    entry.properties.insert(p.name.clone(), vis);
                }
                ClassMember::Method(m) => {
                    let vis = member_visibility(&name, &m.name, &m.attrs)?;
                    entry.methods.insert(m.name.clone(), vis);
                }
                ClassMember::Const(c) => {
                    let vis = member_visibility(&name, &c.name, &c.attrs)?;
                    entry.constants.insert(c.name.clone(), vis);
                }
                ClassMember::TraitUse(_) => {}
            }
        }
        self.visibility_cache.borrow_mut().clear();
        self.classes.insert(name, entry);
        Ok(())
    }

    pub fn add_interface(&mut self, iface: &InterfaceDecl, internal: bool) -> CompilerResult<()> {
        let name = iface.qualified_name();
        self.ensure_unique(&name).map_err(|e| e.at(iface.loc))?;
        let mut entry = InterfaceEntry {
            name: name.clone(),
            extends: iface.extends.iter().map(|i| i.joined()).collect(),
            methods: IndexMap::new(),
            constants: IndexMap::new(),
            internal,
        };
        for member in &iface.members {
            match member {
                ClassMember::Method(m) => {
                    let vis = member_visibility(&name, &m.name, &m.attrs)?;
                    entry.methods.insert(m.name.clone(), vis);
                }
                ClassMember::Const(c) => {
                    let vis = member_visibility(&name, &c.name, &c.attrs)?;
                    entry.constants.insert(c.name.clone(), vis);
                }
                _ => {}
            }
        }
        self.interfaces.insert(name, entry);
        Ok(())
    }

    /// Registers every declaration of a file and returns the declared names.
    pub fn add_file(&mut self, file: &SourceFile, internal: bool) -> CompilerResult<Vec<String>> {
        let mut declared = Vec::new();
        for iface in file.interfaces() {
            self.add_interface(iface, internal)
                .map_err(|e| e.in_file(&file.path))?;
            declared.push(iface.qualified_name());
        }
        for class in file.classes() {
            self.add_class(class, internal)
                .map_err(|e| e.in_file(&file.path))?;
            declared.push(class.qualified_name());
        }
        Ok(declared)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name) || self.interfaces.contains_key(name)
    }

    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.classes.get(name)
    }

    pub fn interface(&self, name: &str) -> Option<&InterfaceEntry> {
        self.interfaces.get(name)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values()
    }

    pub fn interfaces(&self) -> impl Iterator<Item = &InterfaceEntry> {
        self.interfaces.values()
    }

    fn require_class(&self, name: &str) -> CompilerResult<&ClassEntry> {
        self.classes
            .get(name)
            .ok_or_else(|| CompilerError::unknown_identifier(format!("unknown class {}", name)))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VISIBILITY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Resolves which bucket `$this->member` reads inside `class`.
    ///
    /// Own members report their declared visibility. Inherited public and
    /// protected members keep theirs. A private ancestor member, or a member
    /// found nowhere, resolves to public: it will live on the public object if
    /// it is ever assigned.
    pub fn get_visibility(&self, class: &str, member: &str) -> CompilerResult<Visibility> {
        let key = (class.to_string(), member.to_string());
        if let Some(vis) = self.visibility_cache.borrow().get(&key) {
            return Ok(*vis);
        }
        let vis = self
            .lookup_visibility(class, member)?
            .unwrap_or(Visibility::Public);
        self.visibility_cache.borrow_mut().insert(key, vis);
        Ok(vis)
    }

    fn lookup_visibility(&self, class: &str, member: &str) -> CompilerResult<Option<Visibility>> {
        let mut visited = HashSet::new();
        let mut current = self.require_class(class)?;
        if let Some(vis) = current.own_member(member) {
            return Ok(Some(vis));
        }
        while let Some(parent) = current.parent.as_deref() {
            if !visited.insert(parent.to_string()) {
                return Err(inheritance_cycle(parent));
            }
            current = self.require_class(parent)?;
            match current.own_member(member) {
                Some(Visibility::Private) => return Ok(None),
                Some(vis) => return Ok(Some(vis)),
                None => {}
            }
        }
        Ok(None)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HIERARCHY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Interfaces a class declares, plus everything those interfaces extend.
    pub fn declared_interfaces(&self, class: &str) -> CompilerResult<Vec<String>> {
        let entry = self.require_class(class)?;
        let mut out = IndexSet::new();
        for iface in &entry.interfaces {
            self.collect_interface(iface, &mut out);
        }
        Ok(out.into_iter().collect())
    }

    fn collect_interface(&self, name: &str, out: &mut IndexSet<String>) {
        if !out.insert(name.to_string()) {
            return;
        }
        if let Some(entry) = self.interfaces.get(name) {
            for parent in &entry.extends {
                self.collect_interface(parent, out);
            }
        }
    }

    /// Whether `class` implements `iface`, through its ancestors or interface inheritance.
    pub fn implements(&self, class: &str, iface: &str) -> bool {
        let mut visited = HashSet::new();
        let mut current = self.classes.get(class);
        while let Some(entry) = current {
            if !visited.insert(entry.name.as_str()) {
                return false;
            }
            let mut all = IndexSet::new();
            for i in &entry.interfaces {
                self.collect_interface(i, &mut all);
            }
            if all.contains(iface) {
                return true;
            }
            current = entry.parent.as_deref().and_then(|p| self.classes.get(p));
        }
        false
    }

    pub fn classes_implementing(&self, iface: &str) -> Vec<&str> {
        self.classes
            .values()
            .filter(|c| self.implements(&c.name, iface))
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Whether a constant is visible on a class or interface, including inherited ones.
    pub fn has_constant(&self, owner: &str, constant: &str) -> bool {
        let mut pending = vec![owner.to_string()];
        let mut visited = HashSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(class) = self.classes.get(&name) {
                if class.constants.contains_key(constant) {
                    return true;
                }
                pending.extend(class.parent.iter().cloned());
                pending.extend(class.interfaces.iter().cloned());
            } else if let Some(iface) = self.interfaces.get(&name) {
                if iface.constants.contains_key(constant) {
                    return true;
                }
                pending.extend(iface.extends.iter().cloned());
            }
        }
        false
    }

    /// Classes ordered so that every parent precedes its children.
    pub fn class_order(&self) -> CompilerResult<Vec<&ClassEntry>> {
        let mut done: IndexSet<&str> = IndexSet::new();
        for entry in self.classes.values() {
            let mut chain = Vec::new();
            let mut current = Some(entry);
            while let Some(c) = current {
                if done.contains(c.name.as_str()) {
                    break;
                }
                if chain.contains(&c.name.as_str()) {
                    return Err(inheritance_cycle(&c.name));
                }
                chain.push(c.name.as_str());
                current = match c.parent.as_deref() {
                    Some(parent) => Some(self.require_class(parent).map_err(|e| {
                        e.with_hint(format!("{} extends {}", c.name, parent))
                    })?),
                    None => None,
                };
            }
            for name in chain.into_iter().rev() {
                done.insert(name);
            }
        }
        Ok(done.into_iter().filter_map(|n| self.classes.get(n)).collect())
    }

    /// Interfaces ordered so that every extended interface precedes its children.
    pub fn interface_order(&self) -> CompilerResult<Vec<&InterfaceEntry>> {
        fn visit<'a>(
            registry: &'a Registry,
            name: &'a str,
            stack: &mut Vec<&'a str>,
            done: &mut IndexSet<&'a str>,
        ) -> CompilerResult<()> {
            if done.contains(name) {
                return Ok(());
            }
            if stack.contains(&name) {
                return Err(inheritance_cycle(name));
            }
            let entry = registry.interfaces.get(name).ok_or_else(|| {
                CompilerError::unknown_identifier(format!("unknown interface {}", name))
            })?;
            stack.push(name);
            for parent in &entry.extends {
                visit(registry, parent, stack, done)?;
            }
            stack.pop();
            done.insert(name);
            Ok(())
        }

        let mut done = IndexSet::new();
        for name in self.interfaces.keys() {
            visit(self, name, &mut Vec::new(), &mut done)?;
        }
        Ok(done
            .into_iter()
            .filter_map(|n| self.interfaces.get(n))
            .collect())
    }

    pub fn namespace_tree(&self) -> NamespaceTree {
        let mut tree = NamespaceTree::default();
        for name in self.interfaces.keys().chain(self.classes.keys()) {
            tree.insert_declaration(name);
        }
        tree
    }
}

fn inheritance_cycle(name: &str) -> CompilerError {
    CompilerError::new(
        ErrorKind::Unsupported,
        format!("inheritance cycle through {}", name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::stamp_member_visibility;
    use crate::parse::parse_source;
    use crate::transform::{simplify, Pipeline};

    fn registry_of(code: &str) -> Registry {
        let file = parse_source(code, "r.php").unwrap();
        let mut file = simplify(file, Pipeline::Full, "Phpjs\\ScriptInterface").unwrap();
        stamp_member_visibility(&mut file);
        let mut registry = Registry::new();
        registry.add_file(&file, false).unwrap();
        registry
    }

    const HIERARCHY: &str = "<?php namespace App;
        interface Named { const PREFIX = 'n'; }
        interface Labeled extends Named { }
        class Base implements Labeled {
            public $a; protected $b; private $c;
            protected function helper() {}
        }
        class Child extends Base {
            private $own;
            public function helper() {}
        }
        class GrandChild extends Child { }";

    #[test]
    fn test_namespace_tree_keeps_only_namespaces() {
        let mut tree = NamespaceTree::default();
        for name in ["\\A", "\\A\\B", "\\A\\B\\C", "\\A\\C\\D", "\\A\\B\\C\\D"] {
            tree.insert_declaration(name);
        }
        assert_eq!(
            serde_json::to_value(&tree).unwrap(),
            serde_json::json!({"A": {"B": {"C": {}}, "C": {}}})
        );
    }

    #[test]
    fn test_registry_namespace_tree_omits_declared_names() {
        let registry = registry_of(HIERARCHY);
        assert_eq!(
            serde_json::to_value(registry.namespace_tree()).unwrap(),
            serde_json::json!({"App": {}})
        );
    }

    #[test]
    fn test_visibility_follows_inheritance() {
        let registry = registry_of(HIERARCHY);
        let v = |class: &str, member: &str| registry.get_visibility(class, member).unwrap();
        assert_eq!(v("App\\Base", "b"), Visibility::Protected);
        assert_eq!(v("App\\Base", "c"), Visibility::Private);
        assert_eq!(v("App\\Child", "b"), Visibility::Protected);
        // private members of ancestors are invisible
        assert_eq!(v("App\\Child", "c"), Visibility::Public);
        assert_eq!(v("App\\Child", "own"), Visibility::Private);
        assert_eq!(v("App\\GrandChild", "own"), Visibility::Public);
        // overrides may widen visibility
        assert_eq!(v("App\\Child", "helper"), Visibility::Public);
        assert_eq!(v("App\\GrandChild", "nothing"), Visibility::Public);
    }

    #[test]
    fn test_visibility_is_stable_across_lookups() {
        let registry = registry_of(HIERARCHY);
        let first = registry.get_visibility("App\\GrandChild", "b").unwrap();
        let second = registry.get_visibility("App\\GrandChild", "b").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Visibility::Protected);
    }

    #[test]
    fn test_unknown_class_visibility_is_an_error() {
        let registry = registry_of(HIERARCHY);
        let err = registry.get_visibility("App\\Missing", "x").unwrap_err();
        assert!(err.is(ErrorKind::UnknownIdentifier));
    }

    #[test]
    fn test_duplicate_definitions_are_rejected() {
        let file = parse_source("<?php class A {} class A {}", "d.php").unwrap();
        let mut file = simplify(file, Pipeline::Full, "X").unwrap();
        stamp_member_visibility(&mut file);
        let err = Registry::new().add_file(&file, false).unwrap_err();
        assert!(err.is(ErrorKind::DuplicateDefinition));
        assert_eq!(err.file, "d.php");
    }

    #[test]
    fn test_hierarchy_queries() {
        let registry = registry_of(HIERARCHY);
        assert!(registry.implements("App\\GrandChild", "App\\Named"));
        assert_eq!(
            registry.classes_implementing("App\\Labeled"),
            ["App\\Base", "App\\Child", "App\\GrandChild"]
        );
        assert_eq!(
            registry.declared_interfaces("App\\Base").unwrap(),
            ["App\\Labeled", "App\\Named"]
        );
        assert!(registry.has_constant("App\\GrandChild", "PREFIX"));
        assert!(!registry.has_constant("App\\GrandChild", "MISSING"));
    }

    #[test]
    fn test_declaration_order_puts_parents_first() {
        let registry = registry_of(
            "<?php class C extends B {} class B extends A {} class A {} interface J extends I {} interface I {}",
        );
        let classes: Vec<&str> = registry
            .class_order()
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(classes, ["A", "B", "C"]);
        let interfaces: Vec<&str> = registry
            .interface_order()
            .unwrap()
            .iter()
            .map(|i| i.name.as_str())
            .collect();
        assert_eq!(interfaces, ["I", "J"]);
    }

    #[test]
    fn test_inheritance_cycles_are_rejected() {
        let registry = registry_of("<?php class A extends B {} class B extends A {}");
        assert!(registry.class_order().unwrap_err().is(ErrorKind::Unsupported));
    }
}
