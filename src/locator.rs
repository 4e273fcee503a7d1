//! Maps dependency names to source files.
//!
//! Locators form a chain of responsibility. Each link answers for the names it
//! knows and defers everything else to the next one; the chain always ends
//! with [`NullLocator`], which rejects the name.

use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use tracing::trace;

use crate::config::CompileOptions;
use crate::intrinsics;
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

/// Prefix of names that refer to JavaScript globals.
pub const NATIVE_NAMESPACE: &str = "JS";

pub trait DependencyLocator {
    /// Whether the name is provided by the runtime rather than by user sources.
    fn is_internal(&self, name: &str) -> bool;

    /// The file declaring `name`, or `None` if nothing needs to be compiled for it.
    fn filename_for(&self, name: &str) -> CompilerResult<Option<PathBuf>>;
}

lazy_static! {
    /// Runtime classes and interfaces, relative to the stub directory.
    /// Entries without a file are prelude functions.
    static ref STUBS: Vec<(&'static str, Option<&'static str>)> = vec![
        ("Exception", Some("Exception.php")),
        ("TypeError", Some("TypeError.php")),
        ("Phpjs\\ScriptInterface", Some("Phpjs/ScriptInterface.php")),
        ("Phpjs\\Api\\Console", Some("Phpjs/Api/Console.php")),
        ("Phpjs\\Api\\Document", Some("Phpjs/Api/Document.php")),
        ("Phpjs\\Shim\\Console", Some("Phpjs/Shim/Console.php")),
        ("Phpjs\\Shim\\Document", Some("Phpjs/Shim/Document.php")),
        ("print_r", None),
        ("var_dump", None),
    ];
}

/// Stub classes and builtin functions.
pub struct InternalLocator {
    stub_root: PathBuf,
    next: Box<dyn DependencyLocator>,
}

impl InternalLocator {
    pub fn new(stub_root: impl Into<PathBuf>, next: Box<dyn DependencyLocator>) -> Self {
        Self {
            stub_root: stub_root.into(),
            next,
        }
    }

    fn stub(name: &str) -> Option<Option<&'static str>> {
        STUBS.iter().find(|(n, _)| *n == name).map(|(_, file)| *file)
    }
}

/// Whether the prelude defines `name` under its own identifier, so calls to it
/// need no translation.
pub fn runtime_provided(name: &str) -> bool {
    matches!(InternalLocator::stub(name), Some(None))
}

impl DependencyLocator for InternalLocator {
    fn is_internal(&self, name: &str) -> bool {
        Self::stub(name).is_some() || intrinsics::is_intrinsic(name) || self.next.is_internal(name)
    }

    fn filename_for(&self, name: &str) -> CompilerResult<Option<PathBuf>> {
        if let Some(entry) = Self::stub(name) {
            let Some(file) = entry else {
                return Ok(None);
            };
            let path = self.stub_root.join(file);
            if !path.is_file() {
                return Err(CompilerError::new(
                    ErrorKind::UnknownDependency,
                    format!("stub for {} is missing at {}", name, path.display()),
                ));
            }
            return Ok(Some(path));
        }
        if intrinsics::is_intrinsic(name) {
            return Ok(None);
        }
        self.next.filename_for(name)
    }
}

/// Names under the `JS\` namespace map straight to JavaScript globals.
pub struct NativeLocator {
    next: Box<dyn DependencyLocator>,
}

impl NativeLocator {
    pub fn new(next: Box<dyn DependencyLocator>) -> Self {
        Self { next }
    }

    fn is_native(name: &str) -> bool {
        name.split('\\').next() == Some(NATIVE_NAMESPACE) && name.contains('\\')
    }
}

impl DependencyLocator for NativeLocator {
    fn is_internal(&self, name: &str) -> bool {
        Self::is_native(name) || self.next.is_internal(name)
    }

    fn filename_for(&self, name: &str) -> CompilerResult<Option<PathBuf>> {
        if Self::is_native(name) {
            return Ok(None);
        }
        self.next.filename_for(name)
    }
}

/// One file per class under a source root: `App\Model\User` in root `App`
/// lives at `<dir>/Model/User.php`.
pub struct PrefixLocator {
    /// Longest prefix first.
    roots: Vec<(String, PathBuf)>,
    extension: String,
    next: Box<dyn DependencyLocator>,
}

impl PrefixLocator {
    pub fn new(
        roots: impl IntoIterator<Item = (String, PathBuf)>,
        extension: &str,
        next: Box<dyn DependencyLocator>,
    ) -> Self {
        let mut roots: Vec<(String, PathBuf)> = roots
            .into_iter()
            .map(|(prefix, dir)| (prefix.trim_matches('\\').to_string(), dir))
            .collect();
        roots.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        Self {
            roots,
            extension: extension.trim_start_matches('.').to_string(),
            next,
        }
    }

    fn candidate(&self, prefix: &str, dir: &Path, name: &str) -> Option<PathBuf> {
        let relative = if prefix.is_empty() {
            name
        } else {
            name.strip_prefix(prefix)?.strip_prefix('\\')?
        };
        let mut path = dir.to_path_buf();
        for segment in relative.split('\\') {
            path.push(segment);
        }
        path.set_extension(&self.extension);
        Some(path)
    }
}

impl DependencyLocator for PrefixLocator {
    fn is_internal(&self, name: &str) -> bool {
        self.next.is_internal(name)
    }

    fn filename_for(&self, name: &str) -> CompilerResult<Option<PathBuf>> {
        for (prefix, dir) in &self.roots {
            if let Some(path) = self.candidate(prefix, dir, name) {
                trace!(dependency = name, candidate = %path.display(), "probing");
                if path.is_file() {
                    return Ok(Some(path));
                }
            }
        }
        self.next.filename_for(name)
    }
}

/// End of every chain.
pub struct NullLocator;

impl DependencyLocator for NullLocator {
    fn is_internal(&self, _name: &str) -> bool {
        false
    }

    fn filename_for(&self, name: &str) -> CompilerResult<Option<PathBuf>> {
        Err(CompilerError::new(
            ErrorKind::UnknownDependency,
            format!("cannot locate a definition for {}", name),
        )
        .with_hint("check the source roots and the file naming convention"))
    }
}

/// Internal, native, then source roots.
pub fn default_chain(options: &CompileOptions) -> Box<dyn DependencyLocator> {
    let sources = PrefixLocator::new(
        options.source_roots.clone(),
        &options.file_extension,
        Box::new(NullLocator),
    );
    let native = NativeLocator::new(Box::new(sources));
    Box::new(InternalLocator::new(&options.stub_root, Box::new(native)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<?php").unwrap();
    }

    #[test]
    fn test_longest_prefix_wins() {
        let dir = tempfile::tempdir().unwrap();
        let lib = dir.path().join("lib");
        let app = dir.path().join("app");
        touch(&lib.join("Util/Text.php"));
        touch(&app.join("Lib/Util/Text.php"));
        let locator = PrefixLocator::new(
            vec![
                (String::new(), app.clone()),
                ("Lib".to_string(), lib.clone()),
            ],
            "php",
            Box::new(NullLocator),
        );
        assert_eq!(
            locator.filename_for("Lib\\Util\\Text").unwrap(),
            Some(lib.join("Util/Text.php"))
        );
    }

    #[test]
    fn test_missing_files_fall_through_to_null() {
        let dir = tempfile::tempdir().unwrap();
        let locator = PrefixLocator::new(
            vec![(String::new(), dir.path().to_path_buf())],
            ".php",
            Box::new(NullLocator),
        );
        let err = locator.filename_for("Nowhere\\Thing").unwrap_err();
        assert!(err.is(ErrorKind::UnknownDependency));
        assert!(!locator.is_internal("Nowhere\\Thing"));
    }

    #[test]
    fn test_default_chain_routes_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("App/Model.php"));
        let options = CompileOptions {
            source_roots: [(String::new(), dir.path().to_path_buf())].into_iter().collect(),
            ..CompileOptions::default()
        };
        let chain = default_chain(&options);

        assert!(chain.is_internal("Exception"));
        let stub = chain.filename_for("Exception").unwrap().unwrap();
        assert!(stub.ends_with("Exception.php"));

        assert!(chain.is_internal("strlen"));
        assert_eq!(chain.filename_for("strlen").unwrap(), None);

        assert!(chain.is_internal("JS\\Date"));
        assert_eq!(chain.filename_for("JS\\Date").unwrap(), None);

        assert!(!chain.is_internal("App\\Model"));
        assert_eq!(
            chain.filename_for("App\\Model").unwrap(),
            Some(dir.path().join("App/Model.php"))
        );
    }

    #[test]
    fn test_prelude_entries_need_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let locator = InternalLocator::new(dir.path(), Box::new(NullLocator));

        assert!(locator.is_internal("print_r"));
        assert_eq!(locator.filename_for("print_r").unwrap(), None);
        assert!(locator.is_internal("var_dump"));
        assert_eq!(locator.filename_for("var_dump").unwrap(), None);
        assert!(runtime_provided("var_dump"));
        assert!(!runtime_provided("strlen"));
        assert!(!runtime_provided("Exception"));

        let err = locator.filename_for("Exception").unwrap_err();
        assert!(err.is(ErrorKind::UnknownDependency));
    }
}
