//! Scope graph and name lookup.
//!
//! Lookups walk the parent chain from a use site (`find_declaration`), asking
//! each node that exposes names to its parent (`get_declaration`) along the
//! way. Unordered scopes (module root, struct, union, import) search their
//! whole contents before delegating upward, which is what makes forward
//! references legal. Ordered scopes only see what was declared before the
//! lookup.

use smallvec::SmallVec;
use tracing::debug;

use ehlit_common::Span;

use crate::arena::Ast;
use crate::node::{NodeId, NodeKind, VarRole};
use crate::qual::{DeclKind, Qualifier};

/// Outcome of a name lookup.
///
/// `NotFound` means "no opinion, keep searching"; `Forbidden` aborts the
/// search with a diagnostic even though the name exists (private symbols,
/// incomplete structs).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    NotFound,
    Found(NodeId),
    Forbidden(String),
}

impl Lookup {
    #[must_use]
    pub fn found(&self) -> Option<NodeId> {
        match self {
            Lookup::Found(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }
}

impl Ast {
    // =========================================================================
    // Declaration registration
    // =========================================================================

    /// Register a declaration with the innermost enclosing scope, starting
    /// the walk at the declaration's build parent. A C header inclusion
    /// intercepts the walk and stamps the declaration kind.
    pub fn declare(&mut self, from: NodeId, decl: NodeId) {
        let mut cur = Some(from);
        while let Some(id) = cur {
            if matches!(self.kind(id), NodeKind::Include(_)) {
                self.set_decl_kind(decl, DeclKind::C);
            }
            if let Some(scope) = self.scope_mut(id) {
                scope.declarations.push(decl);
                return;
            }
            cur = self.parent(id);
        }
    }

    // =========================================================================
    // Downward lookup
    // =========================================================================

    /// Ask a node whether it exposes `sym` to its parent.
    #[must_use]
    pub fn get_declaration(&self, node: NodeId, sym: &str) -> Lookup {
        match self.kind(node) {
            NodeKind::Import(inc) => {
                for s in &inc.syms {
                    match self.get_declaration(*s, sym) {
                        Lookup::NotFound => {}
                        Lookup::Found(decl) => {
                            // The import boundary gates private symbols
                            // against lookups coming from outside the module.
                            if self
                                .decl_qualifiers(decl)
                                .is_some_and(Qualifier::is_private)
                            {
                                return Lookup::Forbidden(format!(
                                    "accessing to private symbol `{sym}`"
                                ));
                            }
                            return Lookup::Found(decl);
                        }
                        forbidden => return forbidden,
                    }
                }
                Lookup::NotFound
            }
            NodeKind::Include(inc) => {
                for s in &inc.syms {
                    let res = self.get_declaration(*s, sym);
                    if !res.is_not_found() {
                        return res;
                    }
                }
                Lookup::NotFound
            }
            k if k.is_declaration() => {
                if self.decl_name(node) == sym {
                    Lookup::Found(node)
                } else {
                    Lookup::NotFound
                }
            }
            _ => Lookup::NotFound,
        }
    }

    /// Look for `sym` strictly inside a declaration: struct and union fields,
    /// through reference types, and the virtual `vargs.length`.
    pub fn get_inner_declaration(&mut self, decl: NodeId, sym: &str) -> Lookup {
        match self.kind(decl) {
            NodeKind::VarDecl(d) if d.role == VarRole::Vargs && sym == "length" => {
                Lookup::Found(self.make_vargs_length())
            }
            NodeKind::VarDecl(_) | NodeKind::FunDecl(_) | NodeKind::FunDef(_) => {
                let typ = self.decl_type(decl);
                self.get_inner_declaration(typ, sym)
            }
            NodeKind::ReferenceType(r) => {
                let child = r.child;
                self.get_inner_declaration(child, sym)
            }
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => {
                let display = if matches!(self.kind(decl), NodeKind::StructDef(_)) {
                    "struct"
                } else {
                    "union"
                };
                match &c.fields {
                    None => Lookup::Forbidden(format!(
                        "accessing incomplete {display} {}",
                        self.ident_name(c.sym)
                    )),
                    Some(fields) => {
                        for f in fields {
                            let res = self.get_declaration(*f, sym);
                            if !res.is_not_found() {
                                return res;
                            }
                        }
                        Lookup::NotFound
                    }
                }
            }
            _ => Lookup::NotFound,
        }
    }

    /// The virtual `vargs.length` declaration, typed `@int`.
    fn make_vargs_length(&mut self) -> NodeId {
        let span = Span::dummy();
        let int_ident = self.identifier(span, "@int");
        let int_sym = self.compound_identifier(span, vec![int_ident]);
        let name = self.identifier(span, "vargs_len");
        let decl = self.var_decl(span, int_sym, Some(name), None, Qualifier::NONE);
        if let NodeKind::VarDecl(d) = &mut self.node_mut(decl).kind {
            d.role = VarRole::VargsLength;
        }
        decl
    }

    // =========================================================================
    // Upward lookup
    // =========================================================================

    /// Resolve `sym` from a use site, walking the scope chain upward.
    ///
    /// Every scope that misses locally and ends up resolving through its
    /// parent records a not-yet-built result in its predeclarations, so an
    /// emitter knows to write a forward declaration.
    pub fn find_declaration(&mut self, start: NodeId, sym: &str) -> Lookup {
        let mut pending: SmallVec<[NodeId; 4]> = SmallVec::new();
        let mut result = Lookup::NotFound;
        let mut cur = Some(start);
        'search: while let Some(id) = cur {
            if matches!(self.kind(id), NodeKind::FunDef(_)) && sym == "vargs" {
                result = self.resolve_vargs(id);
                break 'search;
            }
            if self.is_scope(id) {
                for n in self.unordered_contents(id) {
                    let res = self.get_declaration(n, sym);
                    if !res.is_not_found() {
                        result = res;
                        break 'search;
                    }
                }
                if let Some(decls) = self.scope_declarations(id) {
                    for d in decls.to_vec() {
                        let res = self.get_declaration(d, sym);
                        if !res.is_not_found() {
                            result = res;
                            break 'search;
                        }
                    }
                }
                if matches!(self.kind(id), NodeKind::Root(_)) {
                    break 'search;
                }
                pending.push(id);
            }
            cur = self.parent(id);
        }
        if let Lookup::Found(decl) = result {
            debug!("resolved '{}' to node {}", sym, decl.0);
            if !self.node(decl).built {
                for scope in pending {
                    if let Some(s) = self.scope_mut(scope) {
                        s.predeclarations.push(decl);
                    }
                }
            }
        } else {
            debug!("lookup of '{}' ended without a declaration", sym);
        }
        result
    }

    fn is_scope(&self, id: NodeId) -> bool {
        matches!(
            self.kind(id),
            NodeKind::Root(_)
                | NodeKind::Import(_)
                | NodeKind::Include(_)
                | NodeKind::FunDef(_)
                | NodeKind::ControlStructure(_)
                | NodeKind::SwitchCaseBody(_)
                | NodeKind::StructDef(_)
                | NodeKind::UnionDef(_)
        )
    }

    /// Syntactic contents an unordered scope searches before its
    /// declarations: the module's top-level nodes, an inclusion's spliced
    /// symbols, a struct or union's fields.
    fn unordered_contents(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Root(r) => r.nodes.clone(),
            NodeKind::Import(i) | NodeKind::Include(i) => i.syms.clone(),
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => c.fields.clone().unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// `vargs` resolves to a virtual array declaration of the function's
    /// variadic element type.
    fn resolve_vargs(&mut self, fun_def: NodeId) -> Lookup {
        let typ = self.decl_type(fun_def);
        let (is_variadic, variadic_type) = match self.kind(typ) {
            NodeKind::FunctionType(f) => (f.is_variadic, f.variadic_type),
            _ => (false, None),
        };
        if !is_variadic {
            return Lookup::Forbidden("use of vargs in a non variadic function".to_string());
        }
        let Some(variadic_type) = variadic_type else {
            return Lookup::NotFound;
        };
        let span = Span::dummy();
        let arr = self.array_symbol(span, variadic_type, None);
        let name = self.identifier(span, "vargs");
        let decl = self.var_decl(span, arr, Some(name), None, Qualifier::NONE);
        if let NodeKind::VarDecl(d) = &mut self.node_mut(decl).kind {
            d.role = VarRole::Vargs;
        }
        Lookup::Found(decl)
    }
}
