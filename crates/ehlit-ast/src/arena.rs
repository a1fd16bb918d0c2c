//! The tree arena.
//!
//! [`Ast`] owns every node of a module tree, including the nodes spliced in
//! from imported modules and included C headers. Handles are [`NodeId`]
//! indices; parent back-edges and symbol resolution handles are ids as well,
//! so the tree has a single owner and no reference cycles.

use ehlit_common::{Failure, Severity, Span};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::node::*;
use crate::qual::{DeclKind, Qualifier};

/// Builtin type names interned at the start of every build.
pub const BUILTIN_TYPE_NAMES: &[&str] = &[
    "@int", "@int8", "@int16", "@int32", "@int64", "@uint", "@uint8", "@uint16", "@uint32",
    "@uint64", "@float", "@double", "@decimal", "@void", "@bool", "@char", "@size", "@str", "@any",
];

/// A module tree and the arena holding its nodes.
pub struct Ast {
    nodes: Vec<Node>,
    root: NodeId,
    /// Name of the root source file, stamped on recorded failures.
    pub file_name: Option<String>,
    builtins: FxHashMap<String, NodeId>,
    /// Failures collected so far; drained by `build_ast` into a `BuildError`.
    pub failures: Vec<Failure>,
}

impl Ast {
    #[must_use]
    pub fn new(file_name: Option<String>) -> Self {
        let mut ast = Ast {
            nodes: Vec::new(),
            root: NodeId(0),
            file_name,
            builtins: FxHashMap::default(),
            failures: Vec::new(),
        };
        ast.root = ast.alloc(Span::at(0), NodeKind::Root(Root::default()));
        ast
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Top-level nodes of the module, as handed over by the parser.
    pub fn set_root_nodes(&mut self, nodes: Vec<NodeId>) {
        if let NodeKind::Root(root) = &mut self.nodes[self.root.index()].kind {
            root.nodes = nodes;
        }
    }

    #[must_use]
    pub fn root_nodes(&self) -> &[NodeId] {
        match &self.nodes[self.root.index()].kind {
            NodeKind::Root(root) => &root.nodes,
            _ => &[],
        }
    }

    // =========================================================================
    // Node access
    // =========================================================================

    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    #[inline]
    #[must_use]
    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    #[inline]
    #[must_use]
    pub fn pos(&self, id: NodeId) -> u32 {
        self.nodes[id.index()].span.start
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` sits anywhere below an import node. Function definitions
    /// use this to skip body parsing for imported modules.
    #[must_use]
    pub fn is_inside_import(&self, id: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if matches!(self.kind(n), NodeKind::Import(_)) {
                return true;
            }
            cur = self.parent(n);
        }
        false
    }

    /// Nearest enclosing function definition, if any.
    #[must_use]
    pub fn enclosing_fun_def(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            if matches!(self.kind(n), NodeKind::FunDef(_)) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    pub fn alloc(&mut self, span: Span, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node {
            span,
            built: false,
            parent: None,
            ref_offset: 0,
            cast: None,
            kind,
        });
        id
    }

    /// Allocate a node already marked built, attached to `parent`. Used for
    /// the type nodes the query layer materialises on the fly.
    pub(crate) fn alloc_built(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let span = self.span(parent);
        let id = self.alloc(span, kind);
        let node = self.node_mut(id);
        node.built = true;
        node.parent = Some(parent);
        id
    }

    // =========================================================================
    // Constructors (parser-facing)
    // =========================================================================

    pub fn identifier(&mut self, span: Span, name: impl Into<String>) -> NodeId {
        self.alloc(
            span,
            NodeKind::Identifier(Identifier {
                name: name.into(),
                decl: None,
            }),
        )
    }

    pub fn compound_identifier(&mut self, span: Span, elems: Vec<NodeId>) -> NodeId {
        self.alloc(
            span,
            NodeKind::CompoundIdentifier(CompoundIdentifier {
                elems: SmallVec::from_vec(elems),
                qualifiers: Qualifier::NONE,
                canonical: None,
            }),
        )
    }

    pub fn templated_identifier(
        &mut self,
        span: Span,
        name: impl Into<String>,
        types: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            span,
            NodeKind::TemplatedIdentifier(TemplatedIdentifier {
                name: name.into(),
                types,
                qualifiers: Qualifier::NONE,
                canonical: None,
            }),
        )
    }

    pub fn reference(&mut self, span: Span, child: NodeId) -> NodeId {
        self.alloc(
            span,
            NodeKind::Reference(Reference {
                child,
                qualifiers: Qualifier::NONE,
                flavor: None,
                canonical: None,
            }),
        )
    }

    pub fn array_symbol(&mut self, span: Span, child: NodeId, length: Option<NodeId>) -> NodeId {
        self.alloc(
            span,
            NodeKind::ArraySymbol(ArraySymbol {
                child,
                length,
                qualifiers: Qualifier::NONE,
                canonical: None,
            }),
        )
    }

    pub fn array_access(&mut self, span: Span, child: NodeId, idx: NodeId) -> NodeId {
        self.alloc(
            span,
            NodeKind::ArrayAccess(ArrayAccess {
                child,
                idx,
                qualifiers: Qualifier::NONE,
                canonical: None,
            }),
        )
    }

    pub fn number(&mut self, span: Span, text: impl Into<String>) -> NodeId {
        self.alloc(span, NodeKind::Number(Literal { text: text.into() }))
    }

    pub fn decimal_number(&mut self, span: Span, text: impl Into<String>) -> NodeId {
        self.alloc(span, NodeKind::DecimalNumber(Literal { text: text.into() }))
    }

    pub fn char_literal(&mut self, span: Span, text: impl Into<String>) -> NodeId {
        self.alloc(span, NodeKind::CharLiteral(Literal { text: text.into() }))
    }

    pub fn string_literal(&mut self, span: Span, text: impl Into<String>) -> NodeId {
        self.alloc(span, NodeKind::StringLiteral(Literal { text: text.into() }))
    }

    pub fn bool_literal(&mut self, span: Span, value: bool) -> NodeId {
        self.alloc(span, NodeKind::BoolLiteral(BoolLiteral { value }))
    }

    pub fn null_literal(&mut self, span: Span) -> NodeId {
        self.alloc(span, NodeKind::NullLiteral)
    }

    pub fn function_call(&mut self, span: Span, sym: NodeId, args: Vec<NodeId>) -> NodeId {
        self.alloc(span, NodeKind::FunctionCall(FunctionCall { sym, args }))
    }

    pub fn cast_value(&mut self, span: Span, sym: NodeId, args: Vec<NodeId>, typ: NodeId) -> NodeId {
        self.alloc(span, NodeKind::CastValue(CastValue { sym, args, typ }))
    }

    pub fn expression(&mut self, span: Span, contents: Vec<NodeId>, parenthesised: bool) -> NodeId {
        self.alloc(
            span,
            NodeKind::Expression(Expression {
                contents,
                parenthesised,
            }),
        )
    }

    pub fn initialization_list(&mut self, span: Span, contents: Vec<NodeId>) -> NodeId {
        self.alloc(
            span,
            NodeKind::InitializationList(InitializationList { contents }),
        )
    }

    pub fn sizeof(&mut self, span: Span, sz_typ: NodeId) -> NodeId {
        self.alloc(span, NodeKind::Sizeof(Sizeof { sz_typ }))
    }

    pub fn prefix_op(&mut self, span: Span, op: impl Into<String>, val: NodeId) -> NodeId {
        self.alloc(span, NodeKind::PrefixOp(UnaryOp { op: op.into(), val }))
    }

    pub fn suffix_op(&mut self, span: Span, op: impl Into<String>, val: NodeId) -> NodeId {
        self.alloc(span, NodeKind::SuffixOp(UnaryOp { op: op.into(), val }))
    }

    pub fn operator(&mut self, span: Span, op: impl Into<String>) -> NodeId {
        self.alloc(span, NodeKind::Operator(Operator { op: op.into() }))
    }

    pub fn statement(&mut self, span: Span, expr: NodeId) -> NodeId {
        self.alloc(span, NodeKind::Statement(Statement { expr }))
    }

    pub fn variable_assignment(&mut self, span: Span, var: NodeId, assign: NodeId) -> NodeId {
        self.alloc(
            span,
            NodeKind::VariableAssignment(VariableAssignment { var, assign }),
        )
    }

    pub fn assignment(&mut self, span: Span, expr: NodeId) -> NodeId {
        self.alloc(
            span,
            NodeKind::Assignment(Assignment {
                expr,
                operator: None,
            }),
        )
    }

    pub fn return_stmt(&mut self, span: Span, expr: Option<NodeId>) -> NodeId {
        self.alloc(span, NodeKind::Return(Return { expr }))
    }

    pub fn condition(&mut self, span: Span, branches: Vec<NodeId>) -> NodeId {
        self.alloc(span, NodeKind::Condition(Condition { branches }))
    }

    pub fn control_structure(
        &mut self,
        span: Span,
        name: impl Into<String>,
        cond: Option<NodeId>,
        body: Vec<NodeId>,
    ) -> NodeId {
        self.alloc(
            span,
            NodeKind::ControlStructure(ControlStructure {
                name: name.into(),
                cond,
                flow: FlowData {
                    body,
                    cursor: 0,
                },
                scope: ScopeData::default(),
            }),
        )
    }

    pub fn switch_case(&mut self, span: Span, cases: Vec<NodeId>, body: NodeId) -> NodeId {
        self.alloc(span, NodeKind::SwitchCase(SwitchCase { cases, body }))
    }

    pub fn switch_case_test(&mut self, span: Span, test: Option<NodeId>) -> NodeId {
        self.alloc(span, NodeKind::SwitchCaseTest(SwitchCaseTest { test }))
    }

    pub fn switch_case_body(&mut self, span: Span, body: Vec<NodeId>, fallthrough: bool) -> NodeId {
        self.alloc(
            span,
            NodeKind::SwitchCaseBody(SwitchCaseBody {
                flow: FlowData {
                    body,
                    cursor: 0,
                },
                scope: ScopeData::default(),
                fallthrough,
            }),
        )
    }

    pub fn var_decl(
        &mut self,
        span: Span,
        typ_src: NodeId,
        sym: Option<NodeId>,
        assign: Option<NodeId>,
        qualifiers: Qualifier,
    ) -> NodeId {
        self.alloc(
            span,
            NodeKind::VarDecl(VarDecl {
                typ_src,
                sym,
                assign,
                qualifiers,
                decl_kind: DeclKind::Ehlit,
                role: VarRole::Normal,
                typ: None,
            }),
        )
    }

    pub fn fun_decl(
        &mut self,
        span: Span,
        qualifiers: Qualifier,
        typ_src: NodeId,
        sym: NodeId,
    ) -> NodeId {
        self.alloc(
            span,
            NodeKind::FunDecl(FunDecl {
                typ_src,
                sym,
                qualifiers,
                decl_kind: DeclKind::Ehlit,
                typ: None,
            }),
        )
    }

    pub fn fun_def(
        &mut self,
        span: Span,
        qualifiers: Qualifier,
        typ_src: NodeId,
        sym: NodeId,
        body_str: UnparsedContents,
    ) -> NodeId {
        self.alloc(
            span,
            NodeKind::FunDef(FunDef {
                decl: FunDecl {
                    typ_src,
                    sym,
                    qualifiers,
                    decl_kind: DeclKind::Ehlit,
                    typ: None,
                },
                body_str,
                flow: FlowData::default(),
                scope: ScopeData::default(),
                gen_var_count: 0,
            }),
        )
    }

    pub fn struct_def(&mut self, span: Span, sym: NodeId, fields: Option<Vec<NodeId>>) -> NodeId {
        self.alloc(
            span,
            NodeKind::StructDef(ContainerDef {
                sym,
                fields,
                scope: ScopeData::default(),
                decl_kind: DeclKind::Ehlit,
            }),
        )
    }

    pub fn union_def(&mut self, span: Span, sym: NodeId, fields: Option<Vec<NodeId>>) -> NodeId {
        self.alloc(
            span,
            NodeKind::UnionDef(ContainerDef {
                sym,
                fields,
                scope: ScopeData::default(),
                decl_kind: DeclKind::Ehlit,
            }),
        )
    }

    pub fn alias_def(&mut self, span: Span, src_sym: NodeId, dst: NodeId) -> NodeId {
        self.alloc(
            span,
            NodeKind::AliasDef(AliasDef {
                src_sym,
                src: None,
                dst,
                decl_kind: DeclKind::Ehlit,
            }),
        )
    }

    pub fn import(&mut self, span: Span, lib: Vec<String>) -> NodeId {
        self.alloc(
            span,
            NodeKind::Import(Inclusion {
                lib,
                syms: Vec::new(),
                scope: ScopeData::default(),
            }),
        )
    }

    pub fn include(&mut self, span: Span, lib: Vec<String>) -> NodeId {
        self.alloc(
            span,
            NodeKind::Include(Inclusion {
                lib,
                syms: Vec::new(),
                scope: ScopeData::default(),
            }),
        )
    }

    pub fn array_type(&mut self, span: Span, child: NodeId) -> NodeId {
        self.alloc(span, NodeKind::ArrayType(ArrayType { child }))
    }

    pub fn reference_type(&mut self, span: Span, child: NodeId) -> NodeId {
        self.alloc(
            span,
            NodeKind::ReferenceType(ReferenceType {
                child,
                qualifiers: Qualifier::NONE,
            }),
        )
    }

    pub fn function_type(
        &mut self,
        span: Span,
        ret: NodeId,
        args: Vec<NodeId>,
        is_variadic: bool,
        variadic_type: Option<NodeId>,
    ) -> NodeId {
        self.alloc(
            span,
            NodeKind::FunctionType(FunctionType {
                ret,
                args,
                is_variadic,
                variadic_type,
            }),
        )
    }

    // =========================================================================
    // Builtin type interning
    // =========================================================================

    /// Intern the builtin type declarations and the `@func` function-type
    /// declaration into the root scope. Idempotent.
    pub fn intern_builtins(&mut self) {
        if !self.builtins.is_empty() {
            return;
        }
        let span = Span::at(0);
        let any_ident = self.identifier(span, "@any");
        let any_sym = self.compound_identifier(span, vec![any_ident]);
        let func = self.function_type(span, any_sym, Vec::new(), false, None);
        self.builtins.insert("@func".to_string(), func);
        self.push_root_declaration(func);
        for name in BUILTIN_TYPE_NAMES {
            let id = self.alloc(
                span,
                NodeKind::BuiltinType(BuiltinType {
                    name: (*name).to_string(),
                }),
            );
            self.builtins.insert((*name).to_string(), id);
            self.push_root_declaration(id);
        }
    }

    /// Interned builtin type declaration for `name`, creating it on first use.
    pub fn builtin(&mut self, name: &str) -> NodeId {
        if let Some(id) = self.builtins.get(name) {
            return *id;
        }
        let root = self.root;
        let id = self.alloc(
            Span::at(0),
            NodeKind::BuiltinType(BuiltinType {
                name: name.to_string(),
            }),
        );
        {
            let node = self.node_mut(id);
            node.built = true;
            node.parent = Some(root);
        }
        self.builtins.insert(name.to_string(), id);
        self.push_root_declaration(id);
        id
    }

    fn push_root_declaration(&mut self, decl: NodeId) {
        let root = self.root;
        if let NodeKind::Root(r) = &mut self.node_mut(root).kind {
            r.scope.declarations.push(decl);
        }
    }

    // =========================================================================
    // Failure reporting
    // =========================================================================

    /// Report a failure from `from`, bubbling to the root. Crossing a
    /// function definition rebases the position by its body offset, so
    /// diagnostics from lazily parsed bodies land in file coordinates.
    pub fn fail(&mut self, from: NodeId, severity: Severity, pos: u32, msg: String) {
        let mut pos = pos;
        let mut cur = Some(from);
        while let Some(id) = cur {
            if let NodeKind::FunDef(def) = self.kind(id) {
                pos += def.body_str.pos;
            }
            cur = self.parent(id);
        }
        let file = self.file_name.clone();
        self.failures.push(Failure::new(severity, pos, msg, file));
    }

    /// Shorthand for `fail` with severity `Error`.
    pub fn error(&mut self, from: NodeId, pos: u32, msg: String) {
        self.fail(from, Severity::Error, pos, msg);
    }

    /// Shorthand for `fail` with severity `Warning`.
    pub fn warn(&mut self, from: NodeId, pos: u32, msg: String) {
        self.fail(from, Severity::Warning, pos, msg);
    }

    // =========================================================================
    // Generated names
    // =========================================================================

    /// Generate a variable name unique within the nearest function definition
    /// (or the module, outside of one).
    pub fn generate_var_name(&mut self, from: NodeId) -> String {
        let mut cur = Some(from);
        while let Some(id) = cur {
            if let NodeKind::FunDef(def) = &mut self.node_mut(id).kind {
                def.gen_var_count += 1;
                return format!("__gen_fun_{}", def.gen_var_count);
            }
            cur = self.parent(id);
        }
        let root = self.root;
        if let NodeKind::Root(r) = &mut self.node_mut(root).kind {
            r.gen_var_count += 1;
            return format!("__gen_ast_{}", r.gen_var_count);
        }
        String::new()
    }

    // =========================================================================
    // Shared payload projections
    // =========================================================================

    /// Name of an identifier node; empty for other kinds.
    #[must_use]
    pub fn ident_name(&self, id: NodeId) -> &str {
        match self.kind(id) {
            NodeKind::Identifier(ident) => &ident.name,
            _ => "",
        }
    }

    /// Child of a container symbol (reference, array, array access).
    #[must_use]
    pub fn container_child(&self, id: NodeId) -> Option<NodeId> {
        match self.kind(id) {
            NodeKind::Reference(r) => Some(r.child),
            NodeKind::ArraySymbol(a) => Some(a.child),
            NodeKind::ArrayAccess(a) => Some(a.child),
            _ => None,
        }
    }

    /// Deepest non-container child of a container symbol chain.
    #[must_use]
    pub fn inner_child(&self, id: NodeId) -> NodeId {
        let mut cur = id;
        while let Some(child) = self.container_child(cur) {
            cur = child;
        }
        cur
    }

    /// Ordered body of a flow scope.
    pub(crate) fn flow(&self, id: NodeId) -> Option<&FlowData> {
        match self.kind(id) {
            NodeKind::FunDef(def) => Some(&def.flow),
            NodeKind::ControlStructure(cs) => Some(&cs.flow),
            NodeKind::SwitchCaseBody(body) => Some(&body.flow),
            _ => None,
        }
    }

    pub(crate) fn flow_mut(&mut self, id: NodeId) -> Option<&mut FlowData> {
        match &mut self.node_mut(id).kind {
            NodeKind::FunDef(def) => Some(&mut def.flow),
            NodeKind::ControlStructure(cs) => Some(&mut cs.flow),
            NodeKind::SwitchCaseBody(body) => Some(&mut body.flow),
            _ => None,
        }
    }

    /// Scope storage of a declaration container, ordered or unordered.
    pub(crate) fn scope_mut(&mut self, id: NodeId) -> Option<&mut ScopeData> {
        match &mut self.node_mut(id).kind {
            NodeKind::Root(r) => Some(&mut r.scope),
            NodeKind::Import(i) | NodeKind::Include(i) => Some(&mut i.scope),
            NodeKind::FunDef(def) => Some(&mut def.scope),
            NodeKind::ControlStructure(cs) => Some(&mut cs.scope),
            NodeKind::SwitchCaseBody(body) => Some(&mut body.scope),
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => Some(&mut c.scope),
            _ => None,
        }
    }

    /// Declarations registered in a scope so far.
    #[must_use]
    pub fn scope_declarations(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id) {
            NodeKind::Root(r) => Some(&r.scope.declarations),
            NodeKind::Import(i) | NodeKind::Include(i) => Some(&i.scope.declarations),
            NodeKind::FunDef(def) => Some(&def.scope.declarations),
            NodeKind::ControlStructure(cs) => Some(&cs.scope.declarations),
            NodeKind::SwitchCaseBody(body) => Some(&body.scope.declarations),
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => Some(&c.scope.declarations),
            _ => None,
        }
    }

    /// Declarations resolved through a scope before being built.
    #[must_use]
    pub fn scope_predeclarations(&self, id: NodeId) -> Option<&[NodeId]> {
        match self.kind(id) {
            NodeKind::Root(r) => Some(&r.scope.predeclarations),
            NodeKind::Import(i) | NodeKind::Include(i) => Some(&i.scope.predeclarations),
            NodeKind::FunDef(def) => Some(&def.scope.predeclarations),
            NodeKind::ControlStructure(cs) => Some(&cs.scope.predeclarations),
            NodeKind::SwitchCaseBody(body) => Some(&body.scope.predeclarations),
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => Some(&c.scope.predeclarations),
            _ => None,
        }
    }

    /// Stamp the declaration kind on a declaration node. C headers stamp
    /// everything they register so the emitter knows not to mangle it.
    pub(crate) fn set_decl_kind(&mut self, id: NodeId, kind: DeclKind) {
        match &mut self.node_mut(id).kind {
            NodeKind::VarDecl(d) => d.decl_kind = kind,
            NodeKind::FunDecl(d) => d.decl_kind = kind,
            NodeKind::FunDef(d) => d.decl.decl_kind = kind,
            NodeKind::StructDef(d) | NodeKind::UnionDef(d) => d.decl_kind = kind,
            NodeKind::AliasDef(d) => d.decl_kind = kind,
            _ => {}
        }
    }

    /// Declaration kind of a declaration node; `Ehlit` for anything else.
    #[must_use]
    pub fn decl_kind(&self, id: NodeId) -> DeclKind {
        match self.kind(id) {
            NodeKind::VarDecl(d) => d.decl_kind,
            NodeKind::FunDecl(d) => d.decl_kind,
            NodeKind::FunDef(d) => d.decl.decl_kind,
            NodeKind::StructDef(d) | NodeKind::UnionDef(d) => d.decl_kind,
            NodeKind::AliasDef(d) => d.decl_kind,
            _ => DeclKind::Ehlit,
        }
    }

    /// Qualifier bitset of a qualified declaration, if the variant has one.
    #[must_use]
    pub fn decl_qualifiers(&self, id: NodeId) -> Option<Qualifier> {
        match self.kind(id) {
            NodeKind::VarDecl(d) => Some(d.qualifiers),
            NodeKind::FunDecl(d) => Some(d.qualifiers),
            NodeKind::FunDef(d) => Some(d.decl.qualifiers),
            _ => None,
        }
    }
}
