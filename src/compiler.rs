//! Top-level compilation driver.
//!
//! One [`Compiler`] compiles one program. It ingests the entry file, then
//! resolves dependencies from a work-list until every referenced name is known
//! (a name already in the registry is never ingested again, which is what makes
//! cyclic class graphs terminate). Once the codebase is complete it annotates
//! `$this` accesses, checks the entry point, generates code for every
//! declaration and assembles the program.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, debug_span, info, trace};

use crate::annotate::{annotate, annotate_this_visibility, collect_dependencies};
use crate::ast::{attr, ClassDecl, InterfaceDecl, SourceFile};
use crate::codegen::{compile_class, compile_interface};
use crate::config::CompileOptions;
use crate::finalize::{assemble, verify_program, CompiledProgram, ProgramParts};
use crate::locator::{default_chain, DependencyLocator};
use crate::parse::parse_source;
use crate::registry::Registry;
use crate::transform::{simplify, Pipeline};
use crate::validate::{check_source, CompilerError, CompilerResult, ErrorKind};

pub struct Compiler {
    options: CompileOptions,
    locator: Box<dyn DependencyLocator>,
    registry: Registry,
    units: Vec<SourceFile>,
    ingested: HashSet<PathBuf>,
    /// Names already resolved, including the ones provided by the runtime.
    resolved: HashSet<String>,
    /// Pending dependency names with the file that asked for them.
    queue: VecDeque<(String, String)>,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        let locator = default_chain(&options);
        Self::with_locator(options, locator)
    }

    pub fn with_locator(options: CompileOptions, locator: Box<dyn DependencyLocator>) -> Self {
        Self {
            options,
            locator,
            registry: Registry::new(),
            units: Vec::new(),
            ingested: HashSet::new(),
            resolved: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn compile_file(mut self, entry: &Path) -> CompilerResult<CompiledProgram> {
        let _span = debug_span!("compile", entry = %entry.display()).entered();
        self.ingest(entry, Pipeline::Full, false)?;
        self.resolve_dependencies()?;

        for unit in &mut self.units {
            annotate_this_visibility(unit, &self.registry)?;
        }

        let entry_class = self.entry_class()?;
        let parts = self.generate(entry_class)?;
        let program = assemble(&parts)?;
        if self.options.verify_output {
            verify_program(&program.js)?;
        }
        info!(
            entry = %program.entry_class,
            files = self.units.len(),
            declarations = program.declarations.len(),
            "compiled program"
        );
        Ok(program)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INGESTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reads, rewrites, checks and annotates one file, then merges its
    /// declarations into the registry and queues its dependencies.
    fn ingest(&mut self, path: &Path, pipeline: Pipeline, internal: bool) -> CompilerResult<()> {
        let key = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if !self.ingested.insert(key) {
            trace!(path = %path.display(), "already ingested");
            return Ok(());
        }
        let source_path = path.display().to_string();
        let _span = debug_span!("ingest", path = %source_path, internal).entered();

        let code = fs::read_to_string(path).map_err(|e| CompilerError::from(e).in_file(&source_path))?;
        let file = parse_source(&code, &source_path)?;
        let mut file = simplify(file, pipeline, &self.options.script_interface)?;
        if let Some(err) = check_source(&mut file) {
            return Err(err.in_file(&source_path));
        }
        annotate(&mut file, &self.options.script_interface).map_err(|e| e.in_file(&source_path))?;
        let dependencies = collect_dependencies(&mut file).map_err(|e| e.in_file(&source_path))?;

        let declared = self.registry.add_file(&file, internal)?;
        debug!(
            declared = ?declared,
            dependencies = dependencies.len(),
            "ingested"
        );
        self.resolved.extend(declared);
        for name in dependencies {
            if !self.resolved.contains(&name) {
                self.queue.push_back((name, source_path.clone()));
            }
        }
        self.units.push(file);
        Ok(())
    }

    fn resolve_dependencies(&mut self) -> CompilerResult<()> {
        while let Some((name, required_by)) = self.queue.pop_front() {
            if self.resolved.contains(&name) || self.registry.contains(&name) {
                continue;
            }
            let _span = debug_span!("resolve", dependency = %name).entered();
            let located = self
                .locator
                .filename_for(&name)
                .map_err(|e| e.in_file(&required_by))?;
            match located {
                None => trace!("provided by the runtime"),
                Some(path) => {
                    let internal = self.locator.is_internal(&name);
                    let pipeline = if internal {
                        Pipeline::Reduced
                    } else {
                        Pipeline::Full
                    };
                    self.ingest(&path, pipeline, internal)?;
                    if !self.registry.contains(&name) {
                        return Err(CompilerError::new(
                            ErrorKind::UnknownDependency,
                            format!("{} does not declare {}", path.display(), name),
                        )
                        .in_file(&required_by));
                    }
                }
            }
            self.resolved.insert(name);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CODE GENERATION
    // ═══════════════════════════════════════════════════════════════════════════

    fn entry_class(&self) -> CompilerResult<String> {
        let script = &self.options.script_interface;
        let entry = match self.registry.classes_implementing(script).as_slice() {
            [entry] => entry.to_string(),
            [] => {
                return Err(CompilerError::new(
                    ErrorKind::EntryPoint,
                    format!("no class implements {}", script),
                )
                .with_hint("the entry file must declare the script class"))
            }
            many => {
                return Err(CompilerError::new(
                    ErrorKind::EntryPoint,
                    format!(
                        "{} classes implement {}: {}",
                        many.len(),
                        script,
                        many.join(", ")
                    ),
                ))
            }
        };

        let method = &self.options.entry_method;
        let mut current = self.registry.class(&entry);
        let mut seen = HashSet::new();
        while let Some(class) = current {
            if !seen.insert(class.name.as_str()) {
                break;
            }
            if class.methods.contains_key(method.as_str()) {
                return Ok(entry);
            }
            current = class.parent.as_deref().and_then(|p| self.registry.class(p));
        }
        Err(CompilerError::new(
            ErrorKind::EntryPoint,
            format!("{} has no method {}()", entry, method),
        ))
    }

    fn generate(&self, entry_class: String) -> CompilerResult<ProgramParts> {
        let mut classes: HashMap<String, (&ClassDecl, &str)> = HashMap::new();
        let mut interfaces: HashMap<String, (&InterfaceDecl, &str)> = HashMap::new();
        for unit in &self.units {
            for class in unit.classes() {
                classes.insert(class.qualified_name(), (class, unit.path.as_str()));
            }
            for iface in unit.interfaces() {
                interfaces.insert(iface.qualified_name(), (iface, unit.path.as_str()));
            }
        }

        let mut compiled_interfaces = Vec::new();
        for entry in self.registry.interface_order()? {
            let (decl, path) = interfaces.get(&entry.name).ok_or_else(|| {
                CompilerError::internal(format!("interface {} has no declaration", entry.name))
            })?;
            let nodes = compile_interface(decl, &self.registry).map_err(|e| e.in_file(path))?;
            compiled_interfaces.push((entry.name.clone(), nodes));
        }

        let mut compiled_classes = Vec::new();
        for entry in self.registry.class_order()? {
            let (decl, path) = classes.get(&entry.name).ok_or_else(|| {
                CompilerError::internal(format!("class {} has no declaration", entry.name))
            })?;
            let node = compile_class(decl, &self.registry).map_err(|e| e.in_file(path))?;
            compiled_classes.push((entry.name.clone(), node));
        }

        let script_dependencies = classes
            .get(&entry_class)
            .and_then(|(decl, _)| decl.attrs.get_strings(attr::SCRIPT_DEPENDENCIES))
            .unwrap_or_default();

        Ok(ProgramParts {
            namespaces: self.registry.namespace_tree(),
            interfaces: compiled_interfaces,
            classes: compiled_classes,
            entry_class,
            script_dependencies,
            entry_method: self.options.entry_method.clone(),
        })
    }
}

/// Compiles the program whose script class lives in `entry`.
pub fn compile_php(entry: &Path, options: CompileOptions) -> CompilerResult<CompiledProgram> {
    Compiler::new(options.with_entry(entry)).compile_file(entry)
}

#[cfg(test)]
#[path = "compiler_tests.rs"]
mod tests;
