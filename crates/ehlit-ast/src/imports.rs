//! Module import and C-header inclusion.
//!
//! The grammar front-end and the C-header reader are collaborators behind
//! the [`ModuleLoader`] seam; this module owns everything around them:
//! locating files on the module search path, parsing each external file at
//! most once per build, splicing the parsed nodes into the tree, and
//! re-reporting parse failures at the inclusion site.

use std::path::{Path, PathBuf};

use ehlit_common::{Failure, Severity};
use tracing::debug;

use crate::arena::Ast;
use crate::build::Builder;
use crate::node::{NodeId, NodeKind};

/// Failures raised by a loader while parsing an external file.
#[derive(Debug, Default)]
pub struct ParseFailures(pub Vec<Failure>);

impl ParseFailures {
    #[must_use]
    pub fn single(severity: Severity, pos: u32, msg: impl Into<String>) -> Self {
        Self(vec![Failure::new(severity, pos, msg.into(), None)])
    }
}

/// The parsing collaborators of the semantic core.
///
/// Implementations allocate the parsed nodes straight into the arena and
/// return the top-level ids; the core then builds them in place.
pub trait ModuleLoader {
    /// Parse an Ehlit module file.
    fn parse_module(&mut self, ast: &mut Ast, path: &Path) -> Result<Vec<NodeId>, ParseFailures>;

    /// Parse the delayed body of a function definition. `have_return_value`
    /// tells the body grammar whether `return` takes an expression.
    fn parse_function_body(
        &mut self,
        ast: &mut Ast,
        contents: &str,
        have_return_value: bool,
    ) -> Result<Vec<NodeId>, ParseFailures>;

    /// Parse a C header into a flat list of declarations.
    fn parse_c_header(&mut self, ast: &mut Ast, header: &str)
    -> Result<Vec<NodeId>, ParseFailures>;
}

/// A loader that fails every request. Useful for embedders that construct
/// trees programmatically and never import.
pub struct NullLoader;

impl ModuleLoader for NullLoader {
    fn parse_module(&mut self, _ast: &mut Ast, path: &Path) -> Result<Vec<NodeId>, ParseFailures> {
        Err(ParseFailures::single(
            Severity::Fatal,
            0,
            format!("{}: no module loader available", path.display()),
        ))
    }

    fn parse_function_body(
        &mut self,
        _ast: &mut Ast,
        _contents: &str,
        _have_return_value: bool,
    ) -> Result<Vec<NodeId>, ParseFailures> {
        Err(ParseFailures::single(
            Severity::Fatal,
            0,
            "no function body grammar available",
        ))
    }

    fn parse_c_header(
        &mut self,
        _ast: &mut Ast,
        header: &str,
    ) -> Result<Vec<NodeId>, ParseFailures> {
        Err(ParseFailures::single(
            Severity::Fatal,
            0,
            format!("{header}: no C header reader available"),
        ))
    }
}

impl Builder<'_> {
    /// Build an import node: locate the module, parse it once, splice and
    /// build its nodes as children of the import.
    pub(crate) fn build_import(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let parsed = match self.locate_and_parse(node) {
            Ok(nodes) => nodes,
            Err(failures) => {
                let pos = self.ast.pos(node);
                for f in failures.0 {
                    self.ast.fail(node, f.severity, pos, f.msg);
                }
                Vec::new()
            }
        };
        for s in parsed {
            let built = self.build(s, node);
            if let NodeKind::Import(inc) = &mut self.ast.node_mut(node).kind {
                inc.syms.push(built);
            }
        }
        node
    }

    fn locate_and_parse(&mut self, node: NodeId) -> Result<Vec<NodeId>, ParseFailures> {
        let lib = match self.ast.kind(node) {
            NodeKind::Import(inc) => inc.lib.clone(),
            _ => return Ok(Vec::new()),
        };
        let lib_path: PathBuf = lib.iter().collect();
        for search in self.import_paths.clone() {
            let full = absolutize(search.join(&lib_path));
            if full.is_dir() {
                if self.imported.contains(&full) {
                    return Ok(Vec::new());
                }
                self.imported.insert(full.clone());
                debug!("importing directory {}", full.display());
                return self.import_dir(&full);
            }
            let mut with_ext = full.into_os_string();
            with_ext.push(".eh");
            let file = PathBuf::from(with_ext);
            if file.is_file() {
                if self.imported.contains(&file) {
                    return Ok(Vec::new());
                }
                self.imported.insert(file.clone());
                debug!("importing module {}", file.display());
                return self.loader.parse_module(self.ast, &file);
            }
        }
        let pos = self.ast.pos(node);
        self.ast
            .error(node, pos, format!("{}: no such file or directory", lib.join("/")));
        Ok(Vec::new())
    }

    /// Recursively import every not-yet-imported file under a directory, in
    /// sorted order.
    fn import_dir(&mut self, dir: &Path) -> Result<Vec<NodeId>, ParseFailures> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(dir) {
            Ok(rd) => rd.flatten().map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort();
        let mut res = Vec::new();
        for full in entries {
            if self.imported.contains(&full) {
                continue;
            }
            self.imported.insert(full.clone());
            if full.is_dir() {
                res.extend(self.import_dir(&full)?);
            } else if full.is_file() {
                res.extend(self.loader.parse_module(self.ast, &full)?);
            }
        }
        Ok(res)
    }

    /// Build an include node: parse the C header once and splice its
    /// declarations. Everything an inclusion registers is stamped with
    /// declaration kind C through the `declare` chain.
    pub(crate) fn build_include(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let lib = match self.ast.kind(node) {
            NodeKind::Include(inc) => inc.lib.join("/"),
            _ => return node,
        };
        let parsed = if self.included.contains(&lib) {
            Ok(Vec::new())
        } else {
            self.included.insert(lib.clone());
            debug!("including C header {lib}");
            self.loader.parse_c_header(self.ast, &lib)
        };
        let parsed = match parsed {
            Ok(nodes) => nodes,
            Err(failures) => {
                let pos = self.ast.pos(node);
                for f in failures.0 {
                    self.ast.fail(node, f.severity, pos, f.msg);
                }
                Vec::new()
            }
        };
        for s in parsed {
            let built = self.build(s, node);
            if let NodeKind::Include(inc) = &mut self.ast.node_mut(node).kind {
                inc.syms.push(built);
            }
        }
        node
    }
}

fn absolutize(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&path))
            .unwrap_or(path)
    }
}
