//! The automatic coercion engine.
//!
//! `auto_cast` makes a value binary compatible with a target type or symbol
//! by adjusting its referencing offset and, when `any` is involved on either
//! side, attaching a conversion symbol tree built by `from_any_aligned`.
//!
//! `any` holds every concrete type behind one level of pointer-shaped
//! indirection; `from_any` describes, per type, the most-dereferenced
//! concrete shape that is binary compatible with that representation.

use ehlit_common::Span;
use tracing::debug;

use crate::build::Builder;
use crate::node::{NodeId, NodeKind, RefFlavor};

impl Builder<'_> {
    /// Make `value` binary compatible with `target` (a type or a symbol).
    ///
    /// Containers delegate to the value that actually carries the offset:
    /// expressions fan out to their operands, compound identifiers to their
    /// last element, address-of to its child, casts to their symbol.
    pub fn auto_cast(&mut self, value: NodeId, target: NodeId) {
        match self.ast.kind(value) {
            NodeKind::Expression(e) => {
                let contents = e.contents.clone();
                for c in contents {
                    self.auto_cast(c, target);
                }
            }
            NodeKind::InitializationList(l) => {
                let contents = l.contents.clone();
                // Only an array target makes sense for an initialisation list.
                let elem = match self.ast.kind(target) {
                    NodeKind::ArrayType(a) => a.child,
                    _ => return,
                };
                for c in contents {
                    self.auto_cast(c, elem);
                }
            }
            NodeKind::CompoundIdentifier(c) => {
                if let Some(&last) = c.elems.last() {
                    self.auto_cast(last, target);
                }
            }
            NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToValue) => {
                let child = r.child;
                self.auto_cast(child, target);
            }
            NodeKind::CastValue(cv) => {
                // The written cast wins; only mirror the offset the symbol
                // would have taken, then put its own back.
                let sym = cv.sym;
                let saved = self.ast.value_ref_offset(sym);
                self.auto_cast(sym, target);
                self.ast.node_mut(value).ref_offset = self.ast.value_ref_offset(sym);
                self.ast.set_value_ref_offset(sym, saved);
            }
            NodeKind::PrefixOp(u) | NodeKind::SuffixOp(u) => {
                let val = u.val;
                self.auto_cast(val, target);
            }
            NodeKind::Number(_)
            | NodeKind::DecimalNumber(_)
            | NodeKind::CharLiteral(_)
            | NodeKind::StringLiteral(_)
            | NodeKind::BoolLiteral(_)
            | NodeKind::NullLiteral
            | NodeKind::Operator(_) => {}
            _ => self.auto_cast_value(value, target),
        }
    }

    fn auto_cast_value(&mut self, value: NodeId, target: NodeId) {
        let mut target = target;
        let src_typ = self.ast.value_type(value);
        let mut src = src_typ;
        let mut target_ref_level: i32 = 0;
        let self_typ = self.ast.strip_reference_type(src_typ);
        let raw_target_typ = if self.ast.kind(target).is_type() {
            target
        } else {
            self.ast.value_type(target)
        };
        let target_typ = self.ast.strip_reference_type(raw_target_typ);
        if !self.ast.types_equal(self_typ, target_typ) {
            if self.ast.is_builtin(self_typ, "@any") {
                let cast = self.from_any_aligned(target, src_typ, true, value);
                self.ast.set_value_cast(value, Some(cast));
                src = self.ast.value_type(cast);
                debug!("coerced any value {} into a concrete shape", value.0);
            } else if self.ast.is_builtin(target_typ, "@any") {
                target = self.from_any_aligned(value, target, false, value);
                // Count the references the author wrote around the value;
                // they ask for that much extra indirection.
                let mut parent = self.ast.parent(value);
                if let Some(p) = parent {
                    if matches!(self.ast.kind(p), NodeKind::CompoundIdentifier(_)) {
                        parent = self.ast.parent(p);
                    }
                }
                while let Some(p) = parent {
                    if matches!(self.ast.kind(p), NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToValue))
                    {
                        target_ref_level += 1;
                        parent = self.ast.parent(p);
                    } else {
                        break;
                    }
                }
                if target_ref_level != 0 {
                    target_ref_level -= self.ast.value_ref_offset(target);
                }
            }
        }
        if self.ast.kind(target).is_type()
            || (self.ast.kind(target).is_symbol() && self.ast.symbol_is_type(target))
        {
            target_ref_level += self.context_ref_offset(target);
        } else {
            let target_value_typ = self.ast.value_type(target);
            target_ref_level +=
                self.ast.type_ref_offset(target_value_typ) - self.ast.value_ref_offset(target);
        }
        let offset = self.ast.type_ref_offset(src) - target_ref_level;
        self.ast.set_value_ref_offset(value, offset);
    }

    /// Referencing level a node contributes as a coercion endpoint: a type
    /// counts its reference layers, a symbol its value offset.
    fn context_ref_offset(&mut self, node: NodeId) -> i32 {
        if self.ast.kind(node).is_type() {
            self.ast.type_ref_offset(node)
        } else {
            self.ast.value_ref_offset(node)
        }
    }

    /// Compute the conversion needed to bridge an `any` with `target`.
    ///
    /// Starts from the target type's `from_any` shape, then aligns it: when
    /// casting *from* `any` the tree is peeled down to the target symbol's
    /// referencing offset; when coercing *to* `any` it is reduced to the
    /// minimum referencing the representation needs. Extra references the
    /// author demanded are re-applied on top.
    pub(crate) fn from_any_aligned(
        &mut self,
        target: NodeId,
        source: NodeId,
        is_casting: bool,
        scope: NodeId,
    ) -> NodeId {
        let mut target_ref_count = self.context_ref_offset(source);
        let target_typ = if self.ast.kind(target).is_type() {
            target
        } else {
            self.ast.value_type(target)
        };
        let mut res = self.from_any(target_typ, scope);
        if is_casting {
            // Align the result to the ref offset of the target symbol.
            if !self.ast.kind(target).is_type() {
                let mut remaining = self.ast.value_ref_offset(target);
                while remaining > 0 {
                    match self.ast.kind(res) {
                        NodeKind::Reference(r) => res = r.child,
                        _ => break,
                    }
                    remaining -= 1;
                }
            }
        } else if self.is_type_reference(res) {
            // Reduce to the minimal referencing the conversion needs.
            loop {
                let child = match self.ast.kind(res) {
                    NodeKind::Reference(r) => r.child,
                    _ => break,
                };
                if self.is_type_reference(child) {
                    res = child;
                } else {
                    break;
                }
            }
            if self.ast.any_memory_offset_value(res) == 0 {
                if let NodeKind::Reference(r) = self.ast.kind(res) {
                    res = r.child;
                }
            }
        }
        if target_ref_count != 0 {
            // The author asked for some referencing of their own.
            let res_typ = self.ast.value_type(res);
            target_ref_count -=
                self.ast.value_ref_offset(res) - self.ast.any_memory_offset_type(res_typ);
            while target_ref_count > 0 {
                let wrapped = self.ast.reference(Span::dummy(), res);
                res = self.build(wrapped, scope);
                target_ref_count -= 1;
            }
        }
        res
    }

    fn is_type_reference(&self, id: NodeId) -> bool {
        matches!(self.ast.kind(id), NodeKind::Reference(r) if r.flavor == Some(RefFlavor::ToType))
    }

    /// Symbol tree for the most-dereferenced concrete shape binary
    /// compatible with an `any` holding a value of type `typ`. Fresh symbols
    /// resolve through `scope`.
    pub(crate) fn from_any(&mut self, typ: NodeId, scope: NodeId) -> NodeId {
        let span = Span::dummy();
        match self.ast.kind(typ) {
            NodeKind::BuiltinType(b) => {
                let name = b.name.clone();
                let sym = self.type_name_symbol(&name, scope);
                if name == "@str" {
                    sym
                } else {
                    let wrapped = self.ast.reference(span, sym);
                    self.build(wrapped, scope)
                }
            }
            NodeKind::ArrayType(a) => {
                let child = a.child;
                let elem = match self.ast.kind(child) {
                    NodeKind::ArrayType(_) | NodeKind::ReferenceType(_) => {
                        self.from_any(child, scope)
                    }
                    _ => {
                        let name = self.ast.decl_name(child).to_string();
                        let ident = self.ast.identifier(span, name);
                        self.ast.compound_identifier(span, vec![ident])
                    }
                };
                let arr = self.ast.array_symbol(span, elem, None);
                self.build(arr, scope)
            }
            NodeKind::ReferenceType(r) => {
                let child = r.child;
                if self.ast.any_memory_offset_type(child) == 1
                    && !matches!(self.ast.kind(child), NodeKind::ReferenceType(_))
                {
                    self.from_any(child, scope)
                } else {
                    let inner = self.from_any(child, scope);
                    let wrapped = self.ast.reference(span, inner);
                    self.build(wrapped, scope)
                }
            }
            NodeKind::StructDef(c) | NodeKind::UnionDef(c) => {
                let name = self.ast.ident_name(c.sym).to_string();
                let ident = self.ast.identifier(span, name);
                let sym = self.ast.compound_identifier(span, vec![ident]);
                let wrapped = self.ast.reference(span, sym);
                self.build(wrapped, scope)
            }
            NodeKind::FunctionType(_) => {
                let templated = self.ast.templated_identifier(span, "func", vec![typ]);
                self.build(templated, scope)
            }
            _ => {
                let name = self.ast.decl_name(typ).to_string();
                let ident = self.ast.identifier(span, name);
                let sym = self.ast.compound_identifier(span, vec![ident]);
                let wrapped = self.ast.reference(span, sym);
                self.build(wrapped, scope)
            }
        }
    }

    /// A built compound identifier naming a type, resolved through `scope`.
    fn type_name_symbol(&mut self, name: &str, scope: NodeId) -> NodeId {
        let span = Span::dummy();
        let ident = self.ast.identifier(span, name);
        let sym = self.ast.compound_identifier(span, vec![ident]);
        self.build(sym, scope)
    }
}
