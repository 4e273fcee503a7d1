//! # phpjs compiler
//!
//! Compiles an object-oriented subset of PHP into one self-contained
//! JavaScript program.
//!
//! ## Pipeline
//!
//! 1. **Parse** (`lexer`, `parse`): source text to the source AST.
//! 2. **Simplify** (`transform`): an ordered sequence of rewrite passes that
//!    bring the tree into the normal form code generation expects.
//! 3. **Check** (`validate`): rejects constructs outside the subset.
//! 4. **Annotate** (`annotate`): member visibility, first assignments, script
//!    dependencies, and finally `$this` access buckets once the registry is
//!    complete.
//! 5. **Resolve** (`compiler`, `locator`, `registry`): a work-list over every
//!    referenced name until the codebase is closed.
//! 6. **Generate** (`codegen`, `intrinsics`): target nodes per class, printed
//!    by `js_printer`.
//! 7. **Assemble** (`finalize`): prelude, namespaces, declarations, entry call.
//!
//! Every stage returns [`CompilerResult`]; the first error aborts the run.

#[cfg(feature = "napi")]
use napi_derive::napi;

pub mod annotate;
pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod finalize;
pub mod intrinsics;
pub mod js_ast;
pub mod js_builder;
pub mod js_printer;
pub mod lexer;
pub mod locator;
pub mod logging;
pub mod parse;
pub mod registry;
pub mod transform;
pub mod validate;
pub mod visitor;

pub use compiler::{compile_php, Compiler};
pub use config::CompileOptions;
pub use finalize::CompiledProgram;
pub use logging::init_tracing;
pub use validate::{CompilerError, CompilerResult, ErrorKind};

/// Node entry point: compiles `path` and returns the program text.
///
/// `options` is the same JSON document the CLI reads with `--config`.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_php_native(path: String, options: Option<String>) -> napi::Result<String> {
    let program = match options {
        Some(raw) => CompileOptions::from_json(&raw),
        None => Ok(CompileOptions::default()),
    }
    .and_then(|options| compile_php(std::path::Path::new(&path), options))
    .map_err(|e| napi::Error::from_reason(e.to_string()))?;
    Ok(program.js)
}
