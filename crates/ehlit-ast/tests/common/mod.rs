//! Shared helpers for the integration suites: a scripted loader standing in
//! for the grammar front-end and the C-header reader, plus tree-building
//! shorthands.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ehlit_ast::{Ast, ModuleLoader, NodeId, ParseFailures, Qualifier, UnparsedContents};
use ehlit_common::{Severity, Span};

pub type Script = Box<dyn FnMut(&mut Ast) -> Vec<NodeId>>;

/// A loader that answers parse requests from pre-registered scripts and
/// records every request it gets.
pub struct ScriptedLoader {
    modules: HashMap<PathBuf, Script>,
    headers: HashMap<String, Script>,
    bodies: HashMap<String, Script>,
    pub module_requests: Vec<PathBuf>,
    pub header_requests: Vec<String>,
    /// `(contents, have_return_value)` of every body parse request.
    pub body_requests: Vec<(String, bool)>,
}

impl ScriptedLoader {
    pub fn new() -> Self {
        ScriptedLoader {
            modules: HashMap::new(),
            headers: HashMap::new(),
            bodies: HashMap::new(),
            module_requests: Vec::new(),
            header_requests: Vec::new(),
            body_requests: Vec::new(),
        }
    }

    pub fn module(mut self, path: impl Into<PathBuf>, script: Script) -> Self {
        self.modules.insert(path.into(), script);
        self
    }

    pub fn header(mut self, name: impl Into<String>, script: Script) -> Self {
        self.headers.insert(name.into(), script);
        self
    }

    pub fn body(mut self, contents: impl Into<String>, script: Script) -> Self {
        self.bodies.insert(contents.into(), script);
        self
    }
}

impl ModuleLoader for ScriptedLoader {
    fn parse_module(&mut self, ast: &mut Ast, path: &Path) -> Result<Vec<NodeId>, ParseFailures> {
        self.module_requests.push(path.to_path_buf());
        match self.modules.get_mut(path) {
            Some(script) => Ok(script(ast)),
            None => Err(ParseFailures::single(
                Severity::Fatal,
                0,
                format!("unexpected module request: {}", path.display()),
            )),
        }
    }

    fn parse_function_body(
        &mut self,
        ast: &mut Ast,
        contents: &str,
        have_return_value: bool,
    ) -> Result<Vec<NodeId>, ParseFailures> {
        self.body_requests
            .push((contents.to_string(), have_return_value));
        match self.bodies.get_mut(contents) {
            Some(script) => Ok(script(ast)),
            None => Err(ParseFailures::single(
                Severity::Fatal,
                0,
                format!("unexpected body request: {contents}"),
            )),
        }
    }

    fn parse_c_header(
        &mut self,
        ast: &mut Ast,
        header: &str,
    ) -> Result<Vec<NodeId>, ParseFailures> {
        self.header_requests.push(header.to_string());
        match self.headers.get_mut(header) {
            Some(script) => Ok(script(ast)),
            None => Err(ParseFailures::single(
                Severity::Fatal,
                0,
                format!("unexpected header request: {header}"),
            )),
        }
    }
}

// =============================================================================
// Tree-building shorthands
// =============================================================================

pub fn type_symbol(ast: &mut Ast, name: &str) -> NodeId {
    let span = Span::at(0);
    let ident = ast.identifier(span, name);
    ast.compound_identifier(span, vec![ident])
}

/// `<type> <name>` without an initialiser.
pub fn named_var(ast: &mut Ast, type_name: &str, name: &str, qualifiers: Qualifier) -> NodeId {
    let span = Span::at(0);
    let typ = type_symbol(ast, type_name);
    let sym = ast.identifier(span, name);
    ast.var_decl(span, typ, Some(sym), None, qualifiers)
}

/// `<type> <name> = <value>` where `value` is any value node.
pub fn named_var_init(
    ast: &mut Ast,
    type_name: &str,
    name: &str,
    qualifiers: Qualifier,
    value: NodeId,
) -> NodeId {
    let span = Span::at(0);
    let typ = type_symbol(ast, type_name);
    let expr = ast.expression(span, vec![value], false);
    let assign = ast.assignment(span, expr);
    let sym = ast.identifier(span, name);
    ast.var_decl(span, typ, Some(sym), Some(assign), qualifiers)
}

/// A function declaration `<ret> <name>(params...)`, optionally variadic.
pub fn fun_declaration(
    ast: &mut Ast,
    name: &str,
    ret: &str,
    params: Vec<NodeId>,
    variadic_type: Option<NodeId>,
) -> NodeId {
    let span = Span::at(0);
    let ret = type_symbol(ast, ret);
    let ftyp = ast.function_type(span, ret, params, variadic_type.is_some(), variadic_type);
    let typ_src = ast.templated_identifier(span, "func", vec![ftyp]);
    let sym = ast.identifier(span, name);
    ast.fun_decl(span, Qualifier::NONE, typ_src, sym)
}

/// A function definition whose body parses lazily from `body_key`.
pub fn fun_definition(
    ast: &mut Ast,
    name: &str,
    ret: &str,
    params: Vec<NodeId>,
    variadic_type: Option<NodeId>,
    body_key: &str,
) -> NodeId {
    let span = Span::at(0);
    let ret = type_symbol(ast, ret);
    let ftyp = ast.function_type(span, ret, params, variadic_type.is_some(), variadic_type);
    let typ_src = ast.templated_identifier(span, "func", vec![ftyp]);
    let sym = ast.identifier(span, name);
    ast.fun_def(
        span,
        Qualifier::NONE,
        typ_src,
        sym,
        UnparsedContents::new(body_key, 0),
    )
}

/// A call `name(args...)` where each arg is a value node, wrapped in a
/// statement. Returns `(call, statement)`.
pub fn call_statement(ast: &mut Ast, name: &str, args: Vec<NodeId>) -> (NodeId, NodeId) {
    let span = Span::at(0);
    let callee = type_symbol(ast, name);
    let args = args
        .into_iter()
        .map(|a| ast.expression(span, vec![a], false))
        .collect();
    let call = ast.function_call(span, callee, args);
    let expr = ast.expression(span, vec![call], false);
    let stmt = ast.statement(span, expr);
    (call, stmt)
}
