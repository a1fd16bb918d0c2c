//! Front-end configuration.
//!
//! This lives in ehlit-common so that both the semantic core and any driver
//! can reference `CompileOptions` without creating a circular dependency.

use std::path::{Path, PathBuf};

/// Configuration record for a front-end run.
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    /// Path of the root source file. Its directory is the first entry of the
    /// module search list.
    pub source: PathBuf,
    /// Path of the generated import manifest. Its directory is the last entry
    /// of the module search list, so generated manifests can be re-imported.
    pub output_import_file: PathBuf,
}

impl CompileOptions {
    #[must_use]
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_import_file: PathBuf::new(),
        }
    }

    #[must_use]
    pub fn with_output_import_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_import_file = path.into();
        self
    }

    /// Paths to be looked up, in order, when importing a module:
    /// the source file's directory, the current working directory, and the
    /// output import file's directory.
    #[must_use]
    pub fn import_paths(&self) -> Vec<PathBuf> {
        vec![
            dir_of(&self.source),
            std::env::current_dir().unwrap_or_default(),
            dir_of(&self.output_import_file),
        ]
    }
}

fn dir_of(path: &Path) -> PathBuf {
    path.parent().unwrap_or_else(|| Path::new("")).to_path_buf()
}
