//! Type queries over the arena.
//!
//! A value reports its type by walking its declaration, materialising
//! wrapper type nodes (array of, reference to) on the fly. Type equality is
//! structural for builtins (by name) and by identity for everything else,
//! with symbols resolved to their declaration first.

use crate::arena::Ast;
use crate::node::{NodeId, NodeKind, RefFlavor, VarRole};

impl Ast {
    // =========================================================================
    // Declarations
    // =========================================================================

    /// Name a declaration exposes to its scope; empty when it has none.
    #[must_use]
    pub fn decl_name(&self, id: NodeId) -> &str {
        match self.kind(id) {
            NodeKind::VarDecl(d) => d.sym.map_or("", |s| self.ident_name(s)),
            NodeKind::FunDecl(d) => self.ident_name(d.sym),
            NodeKind::FunDef(d) => self.ident_name(d.decl.sym),
            NodeKind::StructDef(d) | NodeKind::UnionDef(d) => self.ident_name(d.sym),
            NodeKind::AliasDef(d) => {
                if d.src.is_none() {
                    ""
                } else {
                    self.ident_name(d.dst)
                }
            }
            NodeKind::BuiltinType(b) => &b.name,
            NodeKind::ArrayType(_) => "@array",
            NodeKind::ReferenceType(_) => "@ref",
            NodeKind::FunctionType(_) => "@func",
            _ => "",
        }
    }

    /// Resolved type of a declaration. Falls back to `@any` while the
    /// declaration's type symbol is unresolved, so ill-formed trees keep
    /// building and surface every diagnostic.
    pub fn decl_type(&mut self, id: NodeId) -> NodeId {
        match self.kind(id) {
            NodeKind::VarDecl(d) if d.role == VarRole::VargsLength => self.builtin("@int"),
            NodeKind::VarDecl(_) | NodeKind::FunDecl(_) | NodeKind::FunDef(_) => {
                if !self.node(id).built {
                    self.make_decl_type(id);
                }
                match self.cached_decl_type(id) {
                    Some(t) => t,
                    None => self.builtin("@any"),
                }
            }
            NodeKind::AliasDef(d) => match d.src {
                None => self.builtin("@any"),
                Some(src) if self.kind(src).is_type() => src,
                Some(src) => self.decl_type(src),
            },
            k if k.is_type() => id,
            _ => self.builtin("@any"),
        }
    }

    /// Resolve and cache the declared type from the declaration's type symbol.
    pub(crate) fn make_decl_type(&mut self, id: NodeId) {
        let typ_src = match self.kind(id) {
            NodeKind::VarDecl(d) => d.typ_src,
            NodeKind::FunDecl(d) => d.typ_src,
            NodeKind::FunDef(d) => d.decl.typ_src,
            _ => return,
        };
        if let Some(canon) = self.symbol_canonical(typ_src) {
            if self.kind(canon).is_type() {
                match &mut self.node_mut(id).kind {
                    NodeKind::VarDecl(d) => d.typ = Some(canon),
                    NodeKind::FunDecl(d) => d.typ = Some(canon),
                    NodeKind::FunDef(d) => d.decl.typ = Some(canon),
                    _ => {}
                }
            }
        }
    }

    fn cached_decl_type(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::VarDecl(d) => d.typ,
            NodeKind::FunDecl(d) => d.typ,
            NodeKind::FunDef(d) => d.decl.typ,
            _ => None,
        }
    }

    // =========================================================================
    // Symbol resolution
    // =========================================================================

    /// Declaration a use-site resolves to, one step. May materialise a
    /// wrapper type node for container symbols.
    pub fn symbol_decl(&mut self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::Identifier(ident) => ident.decl,
            NodeKind::CompoundIdentifier(c) => {
                let last = *c.elems.last()?;
                self.symbol_decl(last)
            }
            NodeKind::TemplatedIdentifier(t) => t.types.first().copied(),
            NodeKind::Reference(r) => {
                let child = r.child;
                let typ = self.value_type(child);
                Some(self.alloc_reference_type(id, typ))
            }
            NodeKind::ArraySymbol(a) => {
                let child = a.child;
                let child_decl = self.symbol_decl(child)?;
                if self.kind(child_decl).is_type() {
                    Some(self.alloc_array_type(id, child_decl))
                } else {
                    None
                }
            }
            NodeKind::ArrayAccess(a) => {
                let child = a.child;
                self.symbol_decl(child)
            }
            NodeKind::FunctionCall(call) => {
                let sym = call.sym;
                self.symbol_decl(sym)
            }
            NodeKind::CastValue(c) => Some(c.typ),
            NodeKind::AliasDef(a) => a.src,
            NodeKind::PrefixOp(u) | NodeKind::SuffixOp(u) => {
                let val = u.val;
                self.symbol_decl(val)
            }
            _ => None,
        }
    }

    /// Like [`Ast::symbol_decl`] but never allocates; used by type equality
    /// where a container symbol can never compare equal to a builtin anyway.
    #[must_use]
    fn symbol_decl_shallow(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::Identifier(ident) => ident.decl,
            NodeKind::CompoundIdentifier(c) => {
                let last = *c.elems.last()?;
                self.symbol_decl_shallow(last)
            }
            NodeKind::TemplatedIdentifier(t) => t.types.first().copied(),
            NodeKind::ArrayAccess(a) => self.symbol_decl_shallow(a.child),
            NodeKind::FunctionCall(call) => self.symbol_decl_shallow(call.sym),
            NodeKind::CastValue(c) => Some(c.typ),
            NodeKind::AliasDef(a) => a.src,
            _ => None,
        }
    }

    /// Final non-symbol declaration reached by following the decl chain.
    /// Cached on symbols once computed.
    pub fn symbol_canonical(&mut self, id: NodeId) -> Option<NodeId> {
        if let Some(cached) = self.canonical_cache(id) {
            return Some(cached);
        }
        let solved = self.symbol_solve(id);
        if solved.is_some() {
            self.set_canonical_cache(id, solved);
        }
        solved
    }

    pub(crate) fn symbol_solve(&mut self, id: NodeId) -> Option<NodeId> {
        if let NodeKind::ArraySymbol(a) = self.kind(id) {
            // An array of T resolves to the array type of whatever T
            // canonically is.
            let child = a.child;
            let canon = self.symbol_canonical(child)?;
            if self.kind(canon).is_type() {
                return Some(self.alloc_array_type(id, canon));
            }
            return None;
        }
        let mut decl = self.symbol_decl(id)?;
        while self.kind(decl).is_symbol() {
            decl = self.symbol_decl(decl)?;
        }
        Some(decl)
    }

    fn canonical_cache(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::CompoundIdentifier(c) => c.canonical,
            NodeKind::TemplatedIdentifier(t) => t.canonical,
            NodeKind::Reference(r) => r.canonical,
            NodeKind::ArraySymbol(a) => a.canonical,
            NodeKind::ArrayAccess(a) => a.canonical,
            NodeKind::AliasDef(a) => a.src,
            _ => None,
        }
    }

    pub(crate) fn set_canonical_cache(&mut self, id: NodeId, canonical: Option<NodeId>) {
        match &mut self.node_mut(id).kind {
            NodeKind::CompoundIdentifier(c) => c.canonical = canonical,
            NodeKind::TemplatedIdentifier(t) => t.canonical = canonical,
            NodeKind::Reference(r) => r.canonical = canonical,
            NodeKind::ArraySymbol(a) => a.canonical = canonical,
            NodeKind::ArrayAccess(a) => a.canonical = canonical,
            _ => {}
        }
    }

    /// Whether a use-site symbol names a type.
    #[must_use]
    pub fn symbol_is_type(&self, id: NodeId) -> bool {
        match self.kind(id) {
            NodeKind::Identifier(ident) => {
                ident.decl.is_some_and(|d| self.symbol_or_type_is_type(d))
            }
            NodeKind::CompoundIdentifier(c) => c
                .elems
                .last()
                .is_some_and(|last| self.symbol_is_type(*last)),
            NodeKind::TemplatedIdentifier(t) => t
                .types
                .first()
                .is_some_and(|first| self.kind(*first).is_type()),
            NodeKind::Reference(r) => self.symbol_is_type(r.child),
            NodeKind::ArraySymbol(a) => self.symbol_is_type(a.child),
            NodeKind::ArrayAccess(a) => self.symbol_is_type(a.child),
            NodeKind::AliasDef(a) => a.src.is_some_and(|s| self.kind(s).is_type()),
            _ => false,
        }
    }

    fn symbol_or_type_is_type(&self, id: NodeId) -> bool {
        if self.kind(id).is_type() {
            return true;
        }
        // An alias that names a type is usable as one.
        matches!(self.kind(id), NodeKind::AliasDef(a) if a.src.is_some_and(|s| self.kind(s).is_type()))
    }

    /// Human-readable spelling of a symbol, for diagnostics.
    #[must_use]
    pub fn symbol_repr(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Identifier(ident) => ident.name.clone(),
            NodeKind::CompoundIdentifier(c) => c
                .elems
                .iter()
                .map(|e| self.ident_name(*e))
                .collect::<Vec<_>>()
                .join("."),
            NodeKind::TemplatedIdentifier(t) => format!("{}<>", t.name),
            NodeKind::Reference(r) => format!("ref {}", self.symbol_repr(r.child)),
            NodeKind::ArraySymbol(a) => format!("{}[]", self.symbol_repr(a.child)),
            NodeKind::ArrayAccess(a) => format!("{}[]", self.symbol_repr(a.child)),
            NodeKind::AliasDef(a) => {
                if self.kind(a.src_sym).is_declaration() {
                    self.decl_name(a.src_sym).to_string()
                } else {
                    self.symbol_repr(a.src_sym)
                }
            }
            _ => String::new(),
        }
    }

    // =========================================================================
    // Value types
    // =========================================================================

    /// Type of a value-producing node. Unresolved values report `@any`.
    pub fn value_type(&mut self, id: NodeId) -> NodeId {
        match self.kind(id) {
            NodeKind::Identifier(ident) => match ident.decl {
                None => self.builtin("@any"),
                Some(d) if self.kind(d).is_type() => d,
                Some(d) => self.decl_type(d),
            },
            NodeKind::CompoundIdentifier(c) => match c.elems.last() {
                Some(last) => {
                    let last = *last;
                    self.value_type(last)
                }
                None => self.builtin("@any"),
            },
            NodeKind::TemplatedIdentifier(t) => match t.types.first() {
                Some(first) => *first,
                None => self.builtin("@any"),
            },
            NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToValue) => {
                let child = r.child;
                if self.symbol_decl(child).is_some() {
                    let inner = self.inner_child(id);
                    match self.symbol_decl(inner) {
                        Some(d) => self.decl_type(d),
                        None => self.builtin("@any"),
                    }
                } else {
                    self.builtin("@any")
                }
            }
            NodeKind::Reference(r) => {
                let child = r.child;
                let child_typ = self.value_type(child);
                self.alloc_reference_type(id, child_typ)
            }
            NodeKind::ArraySymbol(a) => {
                let child = a.child;
                let child_typ = self.value_type(child);
                self.alloc_array_type(id, child_typ)
            }
            NodeKind::ArrayAccess(a) => {
                let child = a.child;
                let child_typ = self.value_type(child);
                match self.type_child(child_typ) {
                    Some(t) => t,
                    None => self.builtin("@any"),
                }
            }
            NodeKind::FunctionCall(call) => {
                let sym = call.sym;
                match self.symbol_decl(sym) {
                    None => self.builtin("@any"),
                    Some(d) => {
                        let typ = self.decl_type(d);
                        if let NodeKind::FunctionType(f) = self.kind(typ) {
                            let ret = f.ret;
                            self.value_type(ret)
                        } else {
                            typ
                        }
                    }
                }
            }
            NodeKind::CastValue(c) => c.typ,
            NodeKind::Expression(e) => match e.contents.first() {
                Some(first) => {
                    let first = *first;
                    self.value_type(first)
                }
                None => self.builtin("@any"),
            },
            NodeKind::Number(_) => self.builtin("@int"),
            NodeKind::DecimalNumber(_) => self.builtin("@float"),
            NodeKind::CharLiteral(_) => self.builtin("@char"),
            NodeKind::StringLiteral(_) => self.builtin("@str"),
            NodeKind::BoolLiteral(_) => self.builtin("@bool"),
            NodeKind::Sizeof(_) => self.builtin("@size"),
            NodeKind::PrefixOp(u) | NodeKind::SuffixOp(u) => {
                let val = u.val;
                self.value_type(val)
            }
            NodeKind::AliasDef(_)
            | NodeKind::VarDecl(_)
            | NodeKind::FunDecl(_)
            | NodeKind::FunDef(_) => self.decl_type(id),
            k if k.is_type() => id,
            _ => self.builtin("@any"),
        }
    }

    fn alloc_reference_type(&mut self, parent: NodeId, child: NodeId) -> NodeId {
        use crate::node::ReferenceType;
        use crate::qual::Qualifier;
        self.alloc_built(
            parent,
            NodeKind::ReferenceType(ReferenceType {
                child,
                qualifiers: Qualifier::NONE,
            }),
        )
    }

    fn alloc_array_type(&mut self, parent: NodeId, child: NodeId) -> NodeId {
        use crate::node::ArrayType;
        self.alloc_built(parent, NodeKind::ArrayType(ArrayType { child }))
    }

    // =========================================================================
    // Reference arithmetic
    // =========================================================================

    /// Referencing level a type carries: one per reference layer.
    #[must_use]
    pub fn type_ref_offset(&self, typ: NodeId) -> i32 {
        match self.kind(typ) {
            NodeKind::ReferenceType(r) => self.type_ref_offset(r.child) + 1,
            _ => 0,
        }
    }

    /// Referencing offset of a value, following the delegation chain: a
    /// compound identifier stores it on its last element, references on
    /// their child (plus one for a type reference), aliases on their name.
    #[must_use]
    pub fn value_ref_offset(&self, id: NodeId) -> i32 {
        match self.kind(id) {
            NodeKind::CompoundIdentifier(c) => match c.elems.last() {
                Some(last) => self.value_ref_offset(*last),
                None => 0,
            },
            NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToValue) => {
                self.value_ref_offset(r.child)
            }
            NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToType) => {
                self.value_ref_offset(r.child) + 1
            }
            NodeKind::AliasDef(a) => self.value_ref_offset(a.dst),
            _ => self.node(id).ref_offset,
        }
    }

    pub fn set_value_ref_offset(&mut self, id: NodeId, v: i32) {
        match self.kind(id) {
            NodeKind::CompoundIdentifier(c) => {
                if let Some(last) = c.elems.last().copied() {
                    self.set_value_ref_offset(last, v);
                }
            }
            NodeKind::Reference(r) if r.flavor.is_some() => {
                let child = r.child;
                self.set_value_ref_offset(child, v - 1);
            }
            NodeKind::AliasDef(a) => {
                let dst = a.dst;
                self.set_value_ref_offset(dst, v);
            }
            _ => self.node_mut(id).ref_offset = v,
        }
    }

    /// Cast attached to a value; a compound identifier stores it on its last
    /// element.
    #[must_use]
    pub fn value_cast(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::CompoundIdentifier(c) => {
                c.elems.last().and_then(|last| self.value_cast(*last))
            }
            _ => self.node(id).cast,
        }
    }

    pub fn set_value_cast(&mut self, id: NodeId, cast: Option<NodeId>) {
        match self.kind(id) {
            NodeKind::CompoundIdentifier(c) => {
                if let Some(last) = c.elems.last().copied() {
                    self.set_value_cast(last, cast);
                }
            }
            _ => self.node_mut(id).cast = cast,
        }
    }

    // =========================================================================
    // The `any` lattice
    // =========================================================================

    /// How many reference steps the `any` representation already provides
    /// for a type: `@str` is pointer-shaped on its own, arrays and
    /// references delegate to their element type.
    #[must_use]
    pub fn any_memory_offset_type(&self, typ: NodeId) -> i32 {
        match self.kind(typ) {
            NodeKind::BuiltinType(b) => {
                if b.name == "@str" {
                    0
                } else {
                    1
                }
            }
            NodeKind::ArrayType(a) => self.any_memory_offset_type(a.child),
            NodeKind::ReferenceType(r) => self.any_memory_offset_type(r.child),
            _ => 1,
        }
    }

    /// `any_memory_offset` seen from a symbol. An array symbol reports 0
    /// while the array *type* delegates to its element; the cast engine
    /// depends on that asymmetry.
    pub fn any_memory_offset_value(&mut self, id: NodeId) -> i32 {
        match self.kind(id) {
            NodeKind::ArraySymbol(_) => 0,
            NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToType) => {
                let child = r.child;
                let typ = self.value_type(child);
                self.any_memory_offset_type(typ)
            }
            NodeKind::CompoundIdentifier(c) => match c.elems.last() {
                Some(last) => {
                    let last = *last;
                    let typ = self.value_type(last);
                    self.any_memory_offset_type(typ)
                }
                None => 1,
            },
            _ => {
                let typ = self.value_type(id);
                self.any_memory_offset_type(typ)
            }
        }
    }

    // =========================================================================
    // Structural helpers
    // =========================================================================

    /// Element type of an indexable type. Indexing a `@str` yields `@char`.
    pub fn type_child(&mut self, typ: NodeId) -> Option<NodeId> {
        match self.kind(typ) {
            NodeKind::ArrayType(a) => Some(a.child),
            NodeKind::ReferenceType(r) => Some(r.child),
            NodeKind::BuiltinType(b) if b.name == "@str" => Some(self.builtin("@char")),
            _ => None,
        }
    }

    /// Strip every outer reference layer of a type.
    #[must_use]
    pub fn strip_reference_type(&self, typ: NodeId) -> NodeId {
        match self.kind(typ) {
            NodeKind::ReferenceType(r) => self.strip_reference_type(r.child),
            _ => typ,
        }
    }

    #[must_use]
    pub fn is_builtin(&self, id: NodeId, name: &str) -> bool {
        matches!(self.kind(id), NodeKind::BuiltinType(b) if b.name == name)
    }

    /// Structural type equality: builtins compare by name (resolving a
    /// symbol right-hand side to its declaration first), everything else by
    /// node identity.
    #[must_use]
    pub fn types_equal(&self, a: NodeId, b: NodeId) -> bool {
        if let NodeKind::BuiltinType(ba) = self.kind(a) {
            let b = if self.kind(b).is_symbol() || matches!(self.kind(b), NodeKind::Identifier(_)) {
                match self.symbol_decl_shallow(b) {
                    Some(d) => d,
                    None => return false,
                }
            } else {
                b
            };
            matches!(self.kind(b), NodeKind::BuiltinType(bb) if ba.name == bb.name)
        } else {
            a == b
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::arena::Ast;
    use crate::node::NodeKind;
    use ehlit_common::Span;

    #[test]
    fn test_builtin_equality_is_by_name() {
        let mut ast = Ast::new(None);
        let a = ast.builtin("@int");
        let b = ast.builtin("@int");
        let c = ast.builtin("@str");
        assert!(ast.types_equal(a, b));
        assert!(!ast.types_equal(a, c));
    }

    #[test]
    fn test_struct_equality_is_by_identity() {
        let mut ast = Ast::new(None);
        let span = Span::at(0);
        let s1_name = ast.identifier(span, "Point");
        let s1 = ast.struct_def(span, s1_name, Some(vec![]));
        let s2_name = ast.identifier(span, "Point");
        let s2 = ast.struct_def(span, s2_name, Some(vec![]));
        assert!(ast.types_equal(s1, s1));
        assert!(!ast.types_equal(s1, s2));
    }

    #[test]
    fn test_any_memory_offset_of_builtins() {
        let mut ast = Ast::new(None);
        let int = ast.builtin("@int");
        let str_t = ast.builtin("@str");
        assert_eq!(ast.any_memory_offset_type(int), 1);
        assert_eq!(ast.any_memory_offset_type(str_t), 0);
    }

    #[test]
    fn test_array_symbol_and_array_type_disagree_on_memory_offset() {
        // The array symbol reports 0 while the array type delegates to its
        // element type; the cast engine depends on this asymmetry.
        let mut ast = Ast::new(None);
        let span = Span::at(0);
        let int = ast.builtin("@int");
        let arr_typ = ast.array_type(span, int);
        assert_eq!(ast.any_memory_offset_type(arr_typ), 1);
        let elem_ident = ast.identifier(span, "@int");
        if let NodeKind::Identifier(i) = &mut ast.node_mut(elem_ident).kind {
            i.decl = Some(int);
        }
        let elem = ast.compound_identifier(span, vec![elem_ident]);
        let arr_sym = ast.array_symbol(span, elem, None);
        assert_eq!(ast.any_memory_offset_value(arr_sym), 0);
    }

    #[test]
    fn test_type_ref_offset_counts_layers() {
        let mut ast = Ast::new(None);
        let span = Span::at(0);
        let int = ast.builtin("@int");
        let r1 = ast.reference_type(span, int);
        let r2 = ast.reference_type(span, r1);
        assert_eq!(ast.type_ref_offset(int), 0);
        assert_eq!(ast.type_ref_offset(r1), 1);
        assert_eq!(ast.type_ref_offset(r2), 2);
        assert_eq!(ast.strip_reference_type(r2), int);
    }

    #[test]
    fn test_string_indexing_yields_char() {
        let mut ast = Ast::new(None);
        let str_t = ast.builtin("@str");
        let child = ast.type_child(str_t).expect("@str should be indexable");
        assert!(ast.is_builtin(child, "@char"));
    }

    #[test]
    fn test_literal_types() {
        let mut ast = Ast::new(None);
        let span = Span::at(0);
        let n = ast.number(span, "42");
        let d = ast.decimal_number(span, "4.2");
        let s = ast.string_literal(span, "x");
        let b = ast.bool_literal(span, true);
        let t = ast.value_type(n);
        assert!(ast.is_builtin(t, "@int"));
        let t = ast.value_type(d);
        assert!(ast.is_builtin(t, "@float"));
        let t = ast.value_type(s);
        assert!(ast.is_builtin(t, "@str"));
        let t = ast.value_type(b);
        assert!(ast.is_builtin(t, "@bool"));
    }
}
