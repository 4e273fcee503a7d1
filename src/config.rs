//! Compilation options.
//!
//! Options come from a JSON file (`--config`) or from the JS host through the
//! native binding. Every field has a default, so `{}` is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::validate::{CompilerError, CompilerResult, ErrorKind};

pub const DEFAULT_SCRIPT_INTERFACE: &str = "Phpjs\\ScriptInterface";
pub const DEFAULT_ENTRY_METHOD: &str = "run";
pub const DEFAULT_FILE_EXTENSION: &str = "php";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Namespace prefix to source directory. The empty prefix matches every name.
    pub source_roots: BTreeMap<String, PathBuf>,
    /// Directory holding the PHP stubs of the runtime classes.
    pub stub_root: PathBuf,
    pub script_interface: String,
    pub entry_method: String,
    pub file_extension: String,
    /// Parse the emitted program before returning it.
    pub verify_output: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            source_roots: BTreeMap::new(),
            stub_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("stubs"),
            script_interface: DEFAULT_SCRIPT_INTERFACE.to_string(),
            entry_method: DEFAULT_ENTRY_METHOD.to_string(),
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            verify_output: true,
        }
    }
}

impl CompileOptions {
    pub fn from_json(raw: &str) -> CompilerResult<Self> {
        serde_json::from_str(raw).map_err(|e| {
            CompilerError::new(ErrorKind::InvalidArgument, format!("invalid options: {}", e))
        })
    }

    pub fn from_file(path: &Path) -> CompilerResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CompilerError::from(e).in_file(&path.display().to_string()))?;
        Self::from_json(&raw).map_err(|e| e.in_file(&path.display().to_string()))
    }

    /// Falls back to the entry file's directory when no source root is configured.
    pub fn with_entry(mut self, entry: &Path) -> Self {
        if self.source_roots.is_empty() {
            let dir = entry
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            self.source_roots.insert(String::new(), dir);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_options_use_defaults() {
        let options = CompileOptions::from_json("{}").unwrap();
        assert_eq!(options, CompileOptions::default());
        assert_eq!(options.entry_method, "run");
        assert!(options.verify_output);
    }

    #[test]
    fn test_fields_are_camel_case() {
        let options = CompileOptions::from_json(
            r#"{"sourceRoots": {"App": "src"}, "entryMethod": "main", "verifyOutput": false}"#,
        )
        .unwrap();
        assert_eq!(options.source_roots["App"], PathBuf::from("src"));
        assert_eq!(options.entry_method, "main");
        assert!(!options.verify_output);
    }

    #[test]
    fn test_entry_directory_is_the_fallback_root() {
        let options = CompileOptions::default().with_entry(Path::new("/work/app/Main.php"));
        assert_eq!(options.source_roots[""], PathBuf::from("/work/app"));
    }

    #[test]
    fn test_malformed_options_are_rejected() {
        let err = CompileOptions::from_json("{\"entryMethod\": 3}").unwrap_err();
        assert!(err.is(ErrorKind::InvalidArgument));
    }
}
