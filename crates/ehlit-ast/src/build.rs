//! The build pass.
//!
//! `build` is a depth-first recursive visit that attaches parent edges,
//! registers declarations with their scopes, resolves symbols, coerces
//! values, and rewrites call sites. A node builds at most once: re-entry
//! through the `built` flag is a no-op, so building a tree twice leaves it
//! unchanged.
//!
//! All per-build state (the loader, the module search path, the
//! imported/included sets) lives on [`Builder`]; nothing is process-wide.

use std::path::PathBuf;

use ehlit_common::{BuildError, CompileOptions};
use rustc_hash::FxHashSet;
use tracing::{Level, debug, span};

use crate::arena::Ast;
use crate::imports::ModuleLoader;
use crate::node::{NodeId, NodeKind, RefFlavor};
use crate::scope::Lookup;

/// Per-build context threaded through the traversal.
pub struct Builder<'a> {
    pub ast: &'a mut Ast,
    pub(crate) loader: &'a mut dyn ModuleLoader,
    pub(crate) import_paths: Vec<PathBuf>,
    pub(crate) imported: FxHashSet<PathBuf>,
    pub(crate) included: FxHashSet<String>,
}

/// Build a whole module tree: intern the builtin types, resolve and build
/// every top-level node, and raise the collected failures, if any, as one
/// aggregate error.
pub fn build_ast(
    ast: &mut Ast,
    loader: &mut dyn ModuleLoader,
    options: &CompileOptions,
) -> Result<(), BuildError> {
    Builder::new(ast, loader, options).run()
}

impl<'a> Builder<'a> {
    pub fn new(ast: &'a mut Ast, loader: &'a mut dyn ModuleLoader, options: &CompileOptions) -> Self {
        Builder {
            ast,
            loader,
            import_paths: options.import_paths(),
            imported: FxHashSet::default(),
            included: FxHashSet::default(),
        }
    }

    pub fn run(&mut self) -> Result<(), BuildError> {
        let _span = span!(Level::DEBUG, "build_ast").entered();
        self.ast.failures.clear();
        self.imported.clear();
        self.included.clear();
        self.ast.intern_builtins();
        let root = self.ast.root();
        let decls: Vec<NodeId> = self
            .ast
            .scope_declarations(root)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default();
        for d in decls {
            self.build(d, root);
        }
        let nodes = self.ast.root_nodes().to_vec();
        let mut rebuilt = Vec::with_capacity(nodes.len());
        for n in nodes {
            rebuilt.push(self.build(n, root));
        }
        self.ast.set_root_nodes(rebuilt);
        debug!("build finished with {} failures", self.ast.failures.len());
        if self.ast.failures.is_empty() {
            Ok(())
        } else {
            Err(BuildError::new(std::mem::take(&mut self.ast.failures)))
        }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Build a node under `parent`. Returns the node standing in the tree
    /// afterwards, which differs from the input when the build rewrites it
    /// (a call to a type becomes a cast, a call through containers is
    /// rotated outward).
    pub fn build(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        if self.ast.node(node).built {
            return node;
        }
        match self.ast.kind(node) {
            NodeKind::Root(_) => node,
            NodeKind::Import(_) => self.build_import(node, parent),
            NodeKind::Include(_) => self.build_include(node, parent),

            NodeKind::VarDecl(_) => self.build_var_decl(node, parent),
            NodeKind::FunDecl(_) => self.build_fun_decl(node, parent),
            NodeKind::FunDef(_) => self.build_fun_def(node, parent),
            NodeKind::StructDef(_) | NodeKind::UnionDef(_) => self.build_container_def(node, parent),
            NodeKind::AliasDef(_) => self.build_alias(node, parent),

            NodeKind::BuiltinType(_) => {
                self.mark_built(node, parent);
                node
            }
            NodeKind::ArrayType(_) | NodeKind::ReferenceType(_) => {
                self.mark_built(node, parent);
                if let Some(child) = self.type_node_child(node) {
                    self.build(child, node);
                }
                node
            }
            NodeKind::FunctionType(_) => self.build_function_type(node, parent),

            NodeKind::Identifier(_) => self.build_identifier(node, parent),
            NodeKind::CompoundIdentifier(_) => self.build_compound(node, parent),
            NodeKind::TemplatedIdentifier(_) => self.build_templated(node, parent),
            NodeKind::Reference(_) => self.build_reference(node, parent),
            NodeKind::ArraySymbol(_) => self.build_array_symbol(node, parent),
            NodeKind::ArrayAccess(_) => self.build_array_access(node, parent),

            NodeKind::Number(_)
            | NodeKind::DecimalNumber(_)
            | NodeKind::CharLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::NullLiteral
            | NodeKind::Operator(_) => {
                self.mark_built(node, parent);
                node
            }
            NodeKind::FunctionCall(_) => self.build_function_call(node, parent),
            NodeKind::CastValue(_) => self.build_cast(node, parent),
            NodeKind::Expression(_) => self.build_expression(node, parent),
            NodeKind::InitializationList(_) => self.build_init_list(node, parent),
            NodeKind::Sizeof(_) => self.build_sizeof(node, parent),
            NodeKind::PrefixOp(_) | NodeKind::SuffixOp(_) => self.build_unary(node, parent),

            NodeKind::Statement(_) => self.build_statement(node, parent),
            NodeKind::VariableAssignment(_) => self.build_variable_assignment(node, parent),
            NodeKind::Assignment(_) => self.build_assignment(node, parent),
            NodeKind::Return(_) => self.build_return(node, parent),
            NodeKind::Condition(_) => self.build_condition(node, parent),
            NodeKind::ControlStructure(_) => self.build_control_structure(node, parent),
            NodeKind::SwitchCase(_) => self.build_switch_case(node, parent),
            NodeKind::SwitchCaseTest(_) => self.build_switch_case_test(node, parent),
            NodeKind::SwitchCaseBody(_) => self.build_switch_case_body(node, parent),
        }
    }

    pub(crate) fn mark_built(&mut self, node: NodeId, parent: NodeId) {
        let n = self.ast.node_mut(node);
        n.parent = Some(parent);
        n.built = true;
    }

    fn type_node_child(&self, node: NodeId) -> Option<NodeId> {
        match self.ast.kind(node) {
            NodeKind::ArrayType(a) => Some(a.child),
            NodeKind::ReferenceType(r) => Some(r.child),
            _ => None,
        }
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn build_var_decl(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        self.ast.declare(parent, node);
        let (typ_src, sym, assign) = match self.ast.kind(node) {
            NodeKind::VarDecl(d) => (d.typ_src, d.sym, d.assign),
            _ => return node,
        };
        let typ_src = self.build(typ_src, node);
        if let NodeKind::VarDecl(d) = &mut self.ast.node_mut(node).kind {
            d.typ_src = typ_src;
        }
        self.ast.make_decl_type(node);
        if let Some(sym) = sym {
            self.build(sym, node);
        }
        if let Some(assign) = assign {
            let assign = self.build(assign, node);
            if let NodeKind::VarDecl(d) = &mut self.ast.node_mut(node).kind {
                d.assign = Some(assign);
            }
            let expr = self.ast.assignment_expr(assign);
            let typ = self.ast.decl_type(node);
            self.auto_cast(expr, typ);
        }
        node
    }

    fn build_fun_decl(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        self.ast.declare(parent, node);
        let (typ_src, sym) = match self.ast.kind(node) {
            NodeKind::FunDecl(d) => (d.typ_src, d.sym),
            _ => return node,
        };
        let typ_src = self.build(typ_src, node);
        if let NodeKind::FunDecl(d) = &mut self.ast.node_mut(node).kind {
            d.typ_src = typ_src;
        }
        self.ast.make_decl_type(node);
        self.build(sym, node);
        node
    }

    fn build_fun_def(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        self.ast.declare(parent, node);
        let (typ_src, sym) = match self.ast.kind(node) {
            NodeKind::FunDef(d) => (d.decl.typ_src, d.decl.sym),
            _ => return node,
        };
        let typ_src = self.build(typ_src, node);
        if let NodeKind::FunDef(d) = &mut self.ast.node_mut(node).kind {
            d.decl.typ_src = typ_src;
        }
        self.ast.make_decl_type(node);
        self.build(sym, node);
        // Imported definitions keep their body unparsed; only the signature
        // matters to the importing module.
        if self.ast.is_inside_import(node) {
            return node;
        }
        let ftyp = self.ast.decl_type(node);
        let ret = match self.ast.kind(ftyp) {
            NodeKind::FunctionType(f) => Some(f.ret),
            _ => None,
        };
        let have_return_value = match ret {
            Some(ret) => match self.ast.symbol_canonical(ret) {
                Some(canon) => !self.ast.is_builtin(canon, "@void"),
                None => true,
            },
            None => true,
        };
        let contents = match self.ast.kind(node) {
            NodeKind::FunDef(d) => d.body_str.contents.clone(),
            _ => return node,
        };
        match self
            .loader
            .parse_function_body(self.ast, &contents, have_return_value)
        {
            Ok(stmts) => {
                if let NodeKind::FunDef(d) = &mut self.ast.node_mut(node).kind {
                    d.flow.body = stmts;
                }
                self.build_flow(node);
            }
            Err(failures) => {
                for f in failures.0 {
                    self.ast.fail(node, f.severity, f.pos, f.msg);
                }
            }
        }
        node
    }

    fn build_container_def(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        self.ast.declare(parent, node);
        let (sym, fields) = match self.ast.kind(node) {
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => (c.sym, c.fields.clone()),
            _ => return node,
        };
        self.build(sym, node);
        if let Some(fields) = fields {
            let mut rebuilt = Vec::with_capacity(fields.len());
            for f in fields {
                rebuilt.push(self.build(f, node));
            }
            match &mut self.ast.node_mut(node).kind {
                NodeKind::StructDef(c) | NodeKind::UnionDef(c) => c.fields = Some(rebuilt),
                _ => {}
            }
        }
        node
    }

    fn build_alias(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        // The parent edge goes in early so the declare walk sees the chain.
        self.ast.node_mut(node).parent = Some(parent);
        self.ast.declare(parent, node);
        let src_sym = match self.ast.kind(node) {
            NodeKind::AliasDef(a) => a.src_sym,
            _ => return node,
        };
        let src_sym = self.build(src_sym, node);
        let src = if self.ast.kind(src_sym).is_symbol() {
            self.ast.symbol_canonical(src_sym)
        } else {
            Some(src_sym)
        };
        if let NodeKind::AliasDef(a) = &mut self.ast.node_mut(node).kind {
            a.src_sym = src_sym;
            a.src = src;
        }
        self.mark_built(node, parent);
        node
    }

    fn build_function_type(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let (ret, args, variadic_type) = match self.ast.kind(node) {
            NodeKind::FunctionType(f) => (f.ret, f.args.clone(), f.variadic_type),
            _ => return node,
        };
        let ret = self.build(ret, node);
        let mut rebuilt = Vec::with_capacity(args.len());
        for a in args {
            rebuilt.push(self.build(a, node));
        }
        let variadic_type = variadic_type.map(|v| self.build(v, node));
        if let NodeKind::FunctionType(f) = &mut self.ast.node_mut(node).kind {
            f.ret = ret;
            f.args = rebuilt;
            f.variadic_type = variadic_type;
        }
        node
    }

    // =========================================================================
    // Symbols
    // =========================================================================

    fn build_identifier(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let typ = self.ast.value_type(node);
        self.ast.node_mut(node).ref_offset = self.ast.type_ref_offset(typ);
        node
    }

    fn build_compound(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.resolve_compound(node, parent);
        self.mark_built(node, parent);
        let canonical = self.ast.symbol_solve(node);
        self.ast.set_canonical_cache(node, canonical);
        let elems: Vec<NodeId> = match self.ast.kind(node) {
            NodeKind::CompoundIdentifier(c) => c.elems.to_vec(),
            _ => return node,
        };
        for e in elems {
            self.build(e, node);
        }
        node
    }

    /// Resolve each dotted element: the first through the enclosing scopes,
    /// the rest inside whatever the previous element resolved to. A chain
    /// ending on the virtual `vargs.length` collapses to the synthetic
    /// `@vargs_len` identifier.
    fn resolve_compound(&mut self, node: NodeId, parent: NodeId) {
        let elems: Vec<NodeId> = match self.ast.kind(node) {
            NodeKind::CompoundIdentifier(c) => c.elems.to_vec(),
            _ => return,
        };
        let mut ctx: Option<NodeId> = None;
        for e in &elems {
            let name = self.ast.ident_name(*e).to_string();
            let res = match ctx {
                None => self.ast.find_declaration(parent, &name),
                Some(c) => self.ast.get_inner_declaration(c, &name),
            };
            match res {
                Lookup::Found(decl) => {
                    if let NodeKind::Identifier(ident) = &mut self.ast.node_mut(*e).kind {
                        ident.decl = Some(decl);
                    }
                    ctx = Some(decl);
                }
                Lookup::NotFound => {
                    let pos = self.ast.pos(*e);
                    self.ast
                        .error(parent, pos, format!("use of undeclared identifier {name}"));
                    return;
                }
                Lookup::Forbidden(msg) => {
                    let pos = self.ast.pos(*e);
                    self.ast.error(parent, pos, msg);
                    return;
                }
            }
        }
        if elems.len() >= 2 && self.resolves_to_vargs_length(elems[1]) {
            if let NodeKind::CompoundIdentifier(c) = &mut self.ast.node_mut(node).kind {
                c.elems.remove(0);
            }
            if let NodeKind::Identifier(ident) = &mut self.ast.node_mut(elems[1]).kind {
                ident.name = "@vargs_len".to_string();
            }
        }
    }

    fn resolves_to_vargs_length(&self, elem: NodeId) -> bool {
        let decl = match self.ast.kind(elem) {
            NodeKind::Identifier(i) => i.decl,
            _ => None,
        };
        matches!(
            decl.map(|d| self.ast.kind(d)),
            Some(NodeKind::VarDecl(v)) if v.role == crate::node::VarRole::VargsLength
        )
    }

    fn build_templated(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let canonical = self.ast.symbol_solve(node);
        self.ast.set_canonical_cache(node, canonical);
        let types: Vec<NodeId> = match self.ast.kind(node) {
            NodeKind::TemplatedIdentifier(t) => t.types.clone(),
            _ => return node,
        };
        let mut rebuilt = Vec::with_capacity(types.len());
        for t in types {
            rebuilt.push(self.build(t, node));
        }
        if let NodeKind::TemplatedIdentifier(t) = &mut self.ast.node_mut(node).kind {
            t.types = rebuilt;
        }
        node
    }

    fn build_reference(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let child = match self.ast.kind(node) {
            NodeKind::Reference(r) => r.child,
            _ => return node,
        };
        let child = self.build(child, node);
        let flavor = if self.ast.symbol_is_type(child) {
            RefFlavor::ToType
        } else {
            RefFlavor::ToValue
        };
        if let NodeKind::Reference(r) = &mut self.ast.node_mut(node).kind {
            r.child = child;
            r.flavor = Some(flavor);
        }
        if flavor == RefFlavor::ToValue {
            // Taking the address of a value spends one dereference.
            let off = self.ast.value_ref_offset(child);
            self.ast.set_value_ref_offset(child, off - 1);
        }
        let canonical = self.ast.symbol_solve(node);
        self.ast.set_canonical_cache(node, canonical);
        node
    }

    fn build_array_symbol(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let child = match self.ast.kind(node) {
            NodeKind::ArraySymbol(a) => a.child,
            _ => return node,
        };
        let child = self.build(child, node);
        if let NodeKind::ArraySymbol(a) = &mut self.ast.node_mut(node).kind {
            a.child = child;
        }
        let canonical = self.ast.symbol_solve(node);
        self.ast.set_canonical_cache(node, canonical);
        node
    }

    fn build_array_access(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let (child, idx) = match self.ast.kind(node) {
            NodeKind::ArrayAccess(a) => (a.child, a.idx),
            _ => return node,
        };
        let child = self.build(child, node);
        let canonical = {
            if let NodeKind::ArrayAccess(a) = &mut self.ast.node_mut(node).kind {
                a.child = child;
            }
            self.ast.symbol_solve(node)
        };
        self.ast.set_canonical_cache(node, canonical);
        let idx = self.build(idx, node);
        if let NodeKind::ArrayAccess(a) = &mut self.ast.node_mut(node).kind {
            a.idx = idx;
        }
        node
    }

    // =========================================================================
    // Values
    // =========================================================================

    fn build_expression(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let contents: Vec<NodeId> = match self.ast.kind(node) {
            NodeKind::Expression(e) => e.contents.clone(),
            _ => return node,
        };
        let mut rebuilt = Vec::with_capacity(contents.len());
        for c in contents {
            rebuilt.push(self.build(c, node));
        }
        if let NodeKind::Expression(e) = &mut self.ast.node_mut(node).kind {
            e.contents = rebuilt;
        }
        node
    }

    fn build_init_list(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let contents: Vec<NodeId> = match self.ast.kind(node) {
            NodeKind::InitializationList(l) => l.contents.clone(),
            _ => return node,
        };
        let mut rebuilt = Vec::with_capacity(contents.len());
        for c in contents {
            rebuilt.push(self.build(c, node));
        }
        if let NodeKind::InitializationList(l) = &mut self.ast.node_mut(node).kind {
            l.contents = rebuilt;
        }
        node
    }

    fn build_sizeof(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let sz_typ = match self.ast.kind(node) {
            NodeKind::Sizeof(s) => s.sz_typ,
            _ => return node,
        };
        let sz_typ = self.build(sz_typ, node);
        if let NodeKind::Sizeof(s) = &mut self.ast.node_mut(node).kind {
            s.sz_typ = sz_typ;
        }
        node
    }

    fn build_unary(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let val = match self.ast.kind(node) {
            NodeKind::PrefixOp(u) | NodeKind::SuffixOp(u) => u.val,
            _ => return node,
        };
        let val = self.build(val, node);
        match &mut self.ast.node_mut(node).kind {
            NodeKind::PrefixOp(u) | NodeKind::SuffixOp(u) => u.val = val,
            _ => {}
        }
        node
    }

    // =========================================================================
    // Statements and control flow
    // =========================================================================

    fn build_statement(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let expr = match self.ast.kind(node) {
            NodeKind::Statement(s) => s.expr,
            _ => return node,
        };
        let expr = self.build(expr, node);
        if let NodeKind::Statement(s) = &mut self.ast.node_mut(node).kind {
            s.expr = expr;
        }
        node
    }

    fn build_variable_assignment(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let (var, assign) = match self.ast.kind(node) {
            NodeKind::VariableAssignment(v) => (v.var, v.assign),
            _ => return node,
        };
        let var = self.build(var, node);
        let assign = self.build(assign, node);
        if let NodeKind::VariableAssignment(v) = &mut self.ast.node_mut(node).kind {
            v.var = var;
            v.assign = assign;
        }
        let expr = self.ast.assignment_expr(assign);
        self.auto_cast(expr, var);
        node
    }

    fn build_assignment(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let expr = match self.ast.kind(node) {
            NodeKind::Assignment(a) => a.expr,
            _ => return node,
        };
        let expr = self.build(expr, node);
        if let NodeKind::Assignment(a) = &mut self.ast.node_mut(node).kind {
            a.expr = expr;
        }
        node
    }

    fn build_return(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let expr = match self.ast.kind(node) {
            NodeKind::Return(r) => r.expr,
            _ => return node,
        };
        if let Some(expr) = expr {
            let expr = self.build(expr, node);
            if let NodeKind::Return(r) = &mut self.ast.node_mut(node).kind {
                r.expr = Some(expr);
            }
            if let Some(fun_def) = self.ast.enclosing_fun_def(node) {
                let ftyp = self.ast.decl_type(fun_def);
                if let NodeKind::FunctionType(f) = self.ast.kind(ftyp) {
                    let ret = f.ret;
                    self.auto_cast(expr, ret);
                }
            }
        }
        node
    }

    fn build_condition(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let branches: Vec<NodeId> = match self.ast.kind(node) {
            NodeKind::Condition(c) => c.branches.clone(),
            _ => return node,
        };
        let mut rebuilt = Vec::with_capacity(branches.len());
        for b in branches {
            rebuilt.push(self.build(b, node));
        }
        if let NodeKind::Condition(c) = &mut self.ast.node_mut(node).kind {
            c.branches = rebuilt;
        }
        node
    }

    fn build_control_structure(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        self.build_flow(node);
        let cond = match self.ast.kind(node) {
            NodeKind::ControlStructure(cs) => cs.cond,
            _ => return node,
        };
        if let Some(cond) = cond {
            let cond = self.build(cond, node);
            if let NodeKind::ControlStructure(cs) = &mut self.ast.node_mut(node).kind {
                cs.cond = Some(cond);
            }
        }
        node
    }

    fn build_switch_case(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let (cases, body) = match self.ast.kind(node) {
            NodeKind::SwitchCase(s) => (s.cases.clone(), s.body),
            _ => return node,
        };
        let mut rebuilt = Vec::with_capacity(cases.len());
        for c in cases {
            rebuilt.push(self.build(c, node));
        }
        let body = self.build(body, node);
        if let NodeKind::SwitchCase(s) = &mut self.ast.node_mut(node).kind {
            s.cases = rebuilt;
            s.body = body;
        }
        node
    }

    fn build_switch_case_test(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        let test = match self.ast.kind(node) {
            NodeKind::SwitchCaseTest(t) => t.test,
            _ => return node,
        };
        if let Some(test) = test {
            let test = self.build(test, node);
            if let NodeKind::SwitchCaseTest(t) = &mut self.ast.node_mut(node).kind {
                t.test = Some(test);
            }
        }
        node
    }

    fn build_switch_case_body(&mut self, node: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(node, parent);
        self.build_flow(node);
        node
    }

    // =========================================================================
    // Flow scopes
    // =========================================================================

    /// Build an ordered statement list, rebinding each statement in place.
    /// `do_before` may insert ahead of the cursor while a statement builds;
    /// the cursor then already accounts for the insertion.
    pub(crate) fn build_flow(&mut self, scope: NodeId) {
        if let Some(flow) = self.ast.flow_mut(scope) {
            flow.cursor = 0;
        }
        loop {
            let stmt = match self.ast.flow(scope) {
                Some(flow) if flow.cursor < flow.body.len() => flow.body[flow.cursor],
                _ => break,
            };
            let built = self.build(stmt, scope);
            if let Some(flow) = self.ast.flow_mut(scope) {
                let j = flow.cursor;
                if j < flow.body.len() {
                    flow.body[j] = built;
                }
                flow.cursor = j + 1;
            }
        }
    }

    /// Insert `do_node` immediately before `before` in the nearest enclosing
    /// flow scope. Only ever inserts ahead of the cursor, never behind.
    pub(crate) fn do_before(&mut self, do_node: NodeId, before: NodeId) {
        let mut before = before;
        let mut cur = self.ast.parent(before);
        while let Some(id) = cur {
            if self.ast.kind(id).is_flow_scope()
                && matches!(self.ast.kind(do_node), NodeKind::Statement(_))
            {
                let built = self.build(do_node, id);
                if let Some(flow) = self.ast.flow_mut(id) {
                    if let Some(idx) = flow.body.iter().position(|&s| s == before) {
                        flow.body.insert(idx, built);
                        flow.cursor += 1;
                    }
                }
                return;
            }
            before = id;
            cur = self.ast.parent(id);
        }
    }
}

impl Ast {
    /// Expression carried by an assignment node.
    #[must_use]
    pub fn assignment_expr(&self, id: NodeId) -> NodeId {
        match self.kind(id) {
            NodeKind::Assignment(a) => a.expr,
            _ => id,
        }
    }
}
