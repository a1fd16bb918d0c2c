//! Diagnostic types for the Ehlit front-end.
//!
//! The build pass never aborts on the first problem: nodes report failures
//! through their parent chain, the tree root collects them, and a single
//! [`BuildError`] is raised once the whole pass has finished.

use serde::Serialize;

use crate::position::LineMap;

/// Severity of a reported failure.
///
/// `Warning` does not make a build unsuccessful; everything else does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Warning = 1,
    Error = 2,
    Fatal = 3,
}

/// A single diagnostic, anchored to a byte offset in a source file.
#[derive(Clone, Debug, Serialize)]
pub struct Failure {
    pub severity: Severity,
    /// Byte offset in `file`.
    pub pos: u32,
    pub msg: String,
    /// Source file the failure belongs to, when known.
    pub file: Option<String>,
}

impl Failure {
    #[must_use]
    pub fn new(severity: Severity, pos: u32, msg: String, file: Option<String>) -> Self {
        Self {
            severity,
            pos,
            msg,
            file,
        }
    }

    /// Render as `file:line:col: message` with 1-indexed line and column.
    #[must_use]
    pub fn display_with(&self, lines: &LineMap) -> String {
        let pos = lines.position(self.pos);
        format!(
            "{}:{}:{}: {}",
            self.file.as_deref().unwrap_or("<unknown>"),
            pos.line + 1,
            pos.character + 1,
            self.msg
        )
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.file.as_deref().unwrap_or("<unknown>"),
            self.pos,
            self.msg
        )
    }
}

/// Aggregate of every failure recorded during a whole-tree build.
#[derive(Clone, Debug, Serialize)]
pub struct BuildError {
    pub failures: Vec<Failure>,
    /// Count of non-warning failures.
    pub errors: usize,
    pub warnings: usize,
    pub max_level: Severity,
}

impl BuildError {
    /// Aggregate a non-empty list of failures.
    #[must_use]
    pub fn new(failures: Vec<Failure>) -> Self {
        let mut errors = 0;
        let mut warnings = 0;
        let mut max_level = Severity::Warning;
        for f in &failures {
            if f.severity > max_level {
                max_level = f.severity;
            }
            if f.severity == Severity::Warning {
                warnings += 1;
            } else {
                errors += 1;
            }
        }
        Self {
            failures,
            errors,
            warnings,
            max_level,
        }
    }

    /// Whether the build is unsuccessful: warnings alone do not fail a build.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// One-line human summary of the build outcome.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.warnings == 0 {
            format!("build finished with {} errors", self.errors)
        } else if self.errors == 0 {
            format!("build finished with {} warnings", self.warnings)
        } else {
            format!(
                "build finished with {} errors and {} warnings",
                self.errors, self.warnings
            )
        }
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for failure in &self.failures {
            writeln!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(severity: Severity, msg: &str) -> Failure {
        Failure::new(severity, 0, msg.to_string(), Some("main.eh".to_string()))
    }

    #[test]
    fn test_counts_split_by_severity() {
        let err = BuildError::new(vec![
            failure(Severity::Error, "a"),
            failure(Severity::Warning, "b"),
            failure(Severity::Error, "c"),
        ]);
        assert_eq!(err.errors, 2);
        assert_eq!(err.warnings, 1);
        assert_eq!(err.max_level, Severity::Error);
        assert!(err.has_errors());
    }

    #[test]
    fn test_warnings_alone_do_not_fail() {
        let err = BuildError::new(vec![failure(Severity::Warning, "w")]);
        assert!(!err.has_errors());
        assert_eq!(err.summary(), "build finished with 1 warnings");
    }

    #[test]
    fn test_summary_mentions_both_kinds() {
        let err = BuildError::new(vec![
            failure(Severity::Error, "a"),
            failure(Severity::Warning, "b"),
        ]);
        assert_eq!(err.summary(), "build finished with 1 errors and 1 warnings");
    }

    #[test]
    fn test_rendering_with_line_map() {
        let lines = LineMap::new("int a\nint b\n");
        let f = Failure::new(
            Severity::Error,
            10,
            "oops".to_string(),
            Some("m.eh".to_string()),
        );
        assert_eq!(f.display_with(&lines), "m.eh:2:5: oops");
    }

    #[test]
    fn test_failures_serialize() {
        let f = failure(Severity::Warning, "w");
        let json = serde_json::to_string(&f).expect("failure should serialize");
        assert!(json.contains("\"Warning\""));
    }
}
