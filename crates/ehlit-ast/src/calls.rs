//! Call-site building and lowering.
//!
//! A function call resolves its callee symbol first. A callee that names a
//! type turns the whole node into a cast. Otherwise the call is rotated out
//! of any container chain around the callee, missing trailing arguments are
//! filled from parameter defaults, every actual is coerced to its parameter
//! type, and calls to native variadic functions are rewritten to materialise
//! their tail into a local array declared just before the call.

use ehlit_common::Span;
use tracing::debug;

use crate::arena::Ast;
use crate::build::Builder;
use crate::node::{NodeId, NodeKind};
use crate::qual::{DeclKind, Qualifier};

impl Builder<'_> {
    pub(crate) fn build_function_call(&mut self, call: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(call, parent);
        let sym = match self.ast.kind(call) {
            NodeKind::FunctionCall(c) => c.sym,
            _ => return call,
        };
        let sym = self.build(sym, call);
        self.ast.set_call_sym(call, sym);
        if self.ast.symbol_is_type(sym) {
            // Calling a type is a cast in disguise.
            let args = self.ast.call_args(call);
            let typ = match self.ast.symbol_canonical(sym) {
                Some(canon) if self.ast.kind(canon).is_type() => canon,
                _ => self.ast.builtin("@any"),
            };
            let span = self.ast.span(call);
            let cast = self.ast.cast_value(span, sym, args, typ);
            debug!("rewrote call node {} into cast node {}", call.0, cast.0);
            return self.build_cast(cast, parent);
        }
        let args = self.ast.call_args(call);
        let mut rebuilt = Vec::with_capacity(args.len());
        for a in args {
            rebuilt.push(self.build(a, call));
        }
        self.ast.set_call_args(call, rebuilt);
        let res = self.reorder(call);
        let sym = match self.ast.kind(call) {
            NodeKind::FunctionCall(c) => c.sym,
            _ => return res,
        };
        let Some(canon) = self.ast.symbol_canonical(sym) else {
            return res;
        };
        let typ = self.ast.decl_type(canon);
        if !matches!(self.ast.kind(typ), NodeKind::FunctionType(_)) {
            let pos = self.ast.pos(call);
            let repr = self.ast.symbol_repr(sym);
            self.ast
                .error(call, pos, format!("calling non function type {repr}"));
            return res;
        }
        self.check_args(call, typ);
        self.auto_cast_args(call, typ);
        res
    }

    pub(crate) fn build_cast(&mut self, cast: NodeId, parent: NodeId) -> NodeId {
        self.mark_built(cast, parent);
        let args = self.ast.call_args(cast);
        let pos = self.ast.pos(cast);
        if args.is_empty() {
            self.ast.error(cast, pos, "cast requires a value".to_string());
        } else if args.len() > 1 {
            self.ast
                .error(cast, pos, "too many values for cast expression".to_string());
        } else {
            let arg = self.build(args[0], cast);
            if let NodeKind::CastValue(c) = &mut self.ast.node_mut(cast).kind {
                c.args[0] = arg;
            }
        }
        cast
    }

    /// Rotate the call out of the container chain around its callee, so the
    /// call becomes the innermost operand and the outer chain the root the
    /// parent keeps. This is what lets the emitter write `(&x)->m(args)`
    /// shapes.
    fn reorder(&mut self, call: NodeId) -> NodeId {
        let mut outer: Option<NodeId> = None;
        loop {
            let sym = match self.ast.kind(call) {
                NodeKind::FunctionCall(c) => c.sym,
                _ => break,
            };
            let Some(child) = self.ast.container_child(sym) else {
                break;
            };
            if outer.is_none() {
                outer = Some(sym);
            }
            let call_parent = self.ast.parent(call);
            self.ast.set_call_sym(call, child);
            self.ast.node_mut(child).parent = Some(call);
            self.ast.set_container_child(sym, call);
            self.ast.node_mut(sym).parent = call_parent;
            self.ast.node_mut(call).parent = Some(sym);
        }
        match outer {
            None => call,
            Some(root) => {
                let sym = match self.ast.kind(call) {
                    NodeKind::FunctionCall(c) => Some(c.sym),
                    _ => None,
                };
                if let Some(sym) = sym {
                    // The symbol must not write ref offsets of its own, they
                    // would conflict with the call's.
                    self.ast.set_value_ref_offset(sym, 0);
                }
                root
            }
        }
    }

    /// Fill missing trailing arguments from parameter defaults and warn on
    /// arity mismatches. Extra arguments are fine on a variadic callee.
    fn check_args(&mut self, call: NodeId, ftyp: NodeId) {
        let (params, is_variadic) = match self.ast.kind(ftyp) {
            NodeKind::FunctionType(f) => (f.args.clone(), f.is_variadic),
            _ => return,
        };
        let mut diff = self.ast.call_args_len(call) as i64 - params.len() as i64;
        let mut i = 0;
        while i < params.len() {
            if i >= self.ast.call_args_len(call) {
                let default = match self.ast.kind(params[i]) {
                    NodeKind::VarDecl(d) => d.assign,
                    _ => None,
                };
                match default {
                    Some(assign) => {
                        let expr = self.ast.assignment_expr(assign);
                        self.ast.push_call_arg(call, expr);
                        diff += 1;
                    }
                    None => break,
                }
            }
            i += 1;
        }
        if diff < 0 || (diff > 0 && !is_variadic) {
            let which = if diff < 0 { "not enough" } else { "too many" };
            let sym = match self.ast.kind(call) {
                NodeKind::FunctionCall(c) => c.sym,
                _ => return,
            };
            let repr = self.ast.symbol_repr(sym);
            let pos = self.ast.pos(call);
            let got = self.ast.call_args_len(call);
            self.ast.warn(
                call,
                pos,
                format!(
                    "{which} arguments for call to {repr}: expected {}, got {got}",
                    params.len()
                ),
            );
        }
    }

    /// Coerce each positional argument to its parameter type, then lower the
    /// variadic tail of a native callee into a counted local array.
    fn auto_cast_args(&mut self, call: NodeId, ftyp: NodeId) {
        let (params, is_variadic, variadic_type) = match self.ast.kind(ftyp) {
            NodeKind::FunctionType(f) => (f.args.clone(), f.is_variadic, f.variadic_type),
            _ => return,
        };
        let sym = match self.ast.kind(call) {
            NodeKind::FunctionCall(c) => c.sym,
            _ => return,
        };
        let fun_decl_kind = match self.ast.symbol_decl(sym) {
            Some(decl) => self.ast.decl_kind(decl),
            None => DeclKind::Ehlit,
        };
        let mut i = 0;
        while i < self.ast.call_args_len(call) && i < params.len() {
            let arg = self.ast.call_arg(call, i);
            let param_typ = self.ast.decl_type(params[i]);
            self.auto_cast(arg, param_typ);
            i += 1;
        }
        if is_variadic && fun_decl_kind == DeclKind::Ehlit {
            // C variadics pass through unmodified; native ones get their
            // tail materialised into an array declared before the call.
            let Some(variadic_type) = variadic_type else {
                return;
            };
            let tail = self.ast.split_call_args(call, i);
            let count = tail.len();
            let name = self.ast.generate_var_name(call);
            debug!("lowering {count} variadic actuals into {name}");
            let span = Span::dummy();
            let init = self.ast.initialization_list(span, tail);
            let init_expr = self.ast.expression(span, vec![init], false);
            let assign = self.ast.assignment(span, init_expr);
            let len = self.ast.number(span, count.to_string());
            let arr = self.ast.array_symbol(span, variadic_type, Some(len));
            let name_ident = self.ast.identifier(span, name.clone());
            let decl = self
                .ast
                .var_decl(span, arr, Some(name_ident), Some(assign), Qualifier::NONE);
            let stmt = self.ast.statement(span, decl);
            self.do_before(stmt, call);
            let count_lit = self.ast.number(span, count.to_string());
            let count_expr = self.ast.expression(span, vec![count_lit], false);
            self.ast.push_call_arg(call, count_expr);
            let arr_ident = self.ast.identifier(span, name);
            let arr_sym = self.ast.compound_identifier(span, vec![arr_ident]);
            let arr_expr = self.ast.expression(span, vec![arr_sym], false);
            self.ast.push_call_arg(call, arr_expr);
        }
    }
}

impl Ast {
    pub(crate) fn set_call_sym(&mut self, call: NodeId, sym: NodeId) {
        match &mut self.node_mut(call).kind {
            NodeKind::FunctionCall(c) => c.sym = sym,
            NodeKind::CastValue(c) => c.sym = sym,
            _ => {}
        }
    }

    /// Actuals of a call or cast node.
    #[must_use]
    pub fn call_args(&self, call: NodeId) -> Vec<NodeId> {
        match self.kind(call) {
            NodeKind::FunctionCall(c) => c.args.clone(),
            NodeKind::CastValue(c) => c.args.clone(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn call_args_len(&self, call: NodeId) -> usize {
        match self.kind(call) {
            NodeKind::FunctionCall(c) => c.args.len(),
            NodeKind::CastValue(c) => c.args.len(),
            _ => 0,
        }
    }

    pub(crate) fn call_arg(&self, call: NodeId, i: usize) -> NodeId {
        match self.kind(call) {
            NodeKind::FunctionCall(c) => c.args[i],
            NodeKind::CastValue(c) => c.args[i],
            _ => call,
        }
    }

    pub(crate) fn set_call_args(&mut self, call: NodeId, args: Vec<NodeId>) {
        match &mut self.node_mut(call).kind {
            NodeKind::FunctionCall(c) => c.args = args,
            NodeKind::CastValue(c) => c.args = args,
            _ => {}
        }
    }

    pub(crate) fn push_call_arg(&mut self, call: NodeId, arg: NodeId) {
        match &mut self.node_mut(call).kind {
            NodeKind::FunctionCall(c) => c.args.push(arg),
            NodeKind::CastValue(c) => c.args.push(arg),
            _ => {}
        }
    }

    /// Split off the call's actuals from `at` onward.
    pub(crate) fn split_call_args(&mut self, call: NodeId, at: usize) -> Vec<NodeId> {
        match &mut self.node_mut(call).kind {
            NodeKind::FunctionCall(c) if at <= c.args.len() => c.args.split_off(at),
            _ => Vec::new(),
        }
    }

    pub(crate) fn set_container_child(&mut self, id: NodeId, child: NodeId) {
        match &mut self.node_mut(id).kind {
            NodeKind::Reference(r) => r.child = child,
            NodeKind::ArraySymbol(a) => a.child = child,
            NodeKind::ArrayAccess(a) => a.child = child,
            _ => {}
        }
    }
}
