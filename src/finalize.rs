//! Program assembly and output verification.
//!
//! The emitted program is one script: the runtime prelude, the namespace
//! objects, the boxed scalar aliases, every interface and class in dependency
//! order, and finally the construction of the script class followed by a call
//! to its entry method.

use oxc_allocator::Allocator;
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[cfg(feature = "napi")]
use napi_derive::napi;

use crate::annotate::script_api_implementation;
use crate::codegen::{class_path, ROOT};
use crate::js_ast::JsNode;
use crate::js_builder::*;
use crate::js_printer::print;
use crate::registry::NamespaceTree;
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

pub const PRELUDE: &str = include_str!("prelude.js");

/// PHP scalar type names and the JavaScript constructors boxing them.
const BOXED_SCALARS: &[(&str, &str)] = &[
    ("string", "String"),
    ("int", "Number"),
    ("float", "Number"),
    ("bool", "Boolean"),
    ("array", "PhpArray"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct CompiledProgram {
    pub js: String,
    pub entry_class: String,
    /// Interfaces followed by classes, in emission order.
    pub declarations: Vec<String>,
}

/// Everything the assembler needs from the earlier stages.
pub struct ProgramParts {
    pub namespaces: NamespaceTree,
    pub interfaces: Vec<(String, Vec<JsNode>)>,
    pub classes: Vec<(String, JsNode)>,
    pub entry_class: String,
    /// Runtime API interfaces the script class constructor takes, in order.
    pub script_dependencies: Vec<String>,
    pub entry_method: String,
}

fn namespace_object(tree: &NamespaceTree) -> CompilerResult<JsNode> {
    let mut fields = Vec::new();
    for (segment, child) in tree.children() {
        fields.push((segment.clone(), namespace_object(child)?));
    }
    object(fields)
}

/// `root.Main.__construct(root.Phpjs.Shim.Console.__construct(), ...).run();`
fn entry_invocation(parts: &ProgramParts) -> CompilerResult<JsNode> {
    let mut args = Vec::with_capacity(parts.script_dependencies.len());
    for api in &parts.script_dependencies {
        let shim = script_api_implementation(api).ok_or_else(|| {
            CompilerError::new(
                ErrorKind::ScriptDependency,
                format!("no runtime implementation for {}", api),
            )
        })?;
        args.push(method_call(class_path(shim)?, "__construct", vec![])?);
    }
    let instance = method_call(class_path(&parts.entry_class)?, "__construct", args)?;
    statement(method_call(instance, &parts.entry_method, vec![])?)
}

pub fn assemble(parts: &ProgramParts) -> CompilerResult<CompiledProgram> {
    let mut sections = vec![PRELUDE.trim_end().to_string()];

    sections.push(print(&assign_var(
        ROOT,
        Some(namespace_object(&parts.namespaces)?),
    )?)?);

    let boxed = BOXED_SCALARS
        .iter()
        .map(|(name, ctor)| Ok((name.to_string(), id(ctor)?)))
        .collect::<CompilerResult<Vec<_>>>()?;
    sections.push(print(&assign_var("__boxed", Some(object(boxed)?))?)?);

    let mut declarations = Vec::new();
    for (name, nodes) in &parts.interfaces {
        for node in nodes {
            sections.push(print(node)?);
        }
        declarations.push(name.clone());
    }
    for (name, node) in &parts.classes {
        sections.push(print(node)?);
        declarations.push(name.clone());
    }

    sections.push(print(&entry_invocation(parts)?)?);

    let mut js = sections.join("\n\n");
    js.push('\n');
    debug!(
        bytes = js.len(),
        declarations = declarations.len(),
        "assembled program"
    );
    Ok(CompiledProgram {
        js,
        entry_class: parts.entry_class.clone(),
        declarations,
    })
}

/// Parses the program with oxc; a syntax error means the compiler emitted
/// something it should not have.
pub fn verify_program(js: &str) -> CompilerResult<()> {
    let allocator = Allocator::default();
    let source_type = SourceType::default();
    let ret = Parser::new(&allocator, js, source_type).parse();
    if ret.panicked || !ret.errors.is_empty() {
        let details: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
        warn!(errors = details.len(), "generated program failed to parse");
        let mut err = CompilerError::internal("generated JavaScript is not syntactically valid");
        for detail in details {
            err = err.with_hint(detail);
        }
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> ProgramParts {
        let mut namespaces = NamespaceTree::default();
        namespaces.insert_declaration("App\\Main");
        namespaces.insert_declaration("Phpjs\\Shim\\Console");
        ProgramParts {
            namespaces,
            interfaces: vec![],
            classes: vec![],
            entry_class: "App\\Main".to_string(),
            script_dependencies: vec!["Phpjs\\Api\\Console".to_string()],
            entry_method: "run".to_string(),
        }
    }

    #[test]
    fn test_program_layout() {
        let program = assemble(&parts()).unwrap();
        let js = &program.js;
        assert!(js.starts_with("/* phpjs runtime */"));
        let root = js.find("var root = {").unwrap();
        let boxed = js.find("var __boxed = {").unwrap();
        let entry = js
            .find("root.App.Main.__construct(root.Phpjs.Shim.Console.__construct()).run();")
            .unwrap();
        assert!(js.find("function PhpArray()").unwrap() < root);
        assert!(root < boxed && boxed < entry);
        assert!(js.contains("\"Shim\": {}"));
        assert!(!js.contains("\"Main\""));
        assert!(!js.contains("\"Console\""));
        assert!(js.contains("\"array\": PhpArray"));
        assert_eq!(program.entry_class, "App\\Main");
    }

    #[test]
    fn test_assembled_program_parses() {
        let program = assemble(&parts()).unwrap();
        verify_program(&program.js).unwrap();
    }

    #[test]
    fn test_unknown_script_api_is_rejected() {
        let mut parts = parts();
        parts.script_dependencies = vec!["Phpjs\\Api\\Storage".to_string()];
        let err = assemble(&parts).unwrap_err();
        assert!(err.is(ErrorKind::ScriptDependency));
    }

    #[test]
    fn test_verification_reports_syntax_errors() {
        let err = verify_program("var x = ;").unwrap_err();
        assert!(err.is(ErrorKind::Internal));
        assert!(!err.hints.is_empty());
    }
}
