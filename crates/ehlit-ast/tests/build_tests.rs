//! End-to-end build scenarios: cross-module imports, private gating, C
//! header inclusion, variadic lowering inside function bodies, and build
//! idempotence.

mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::*;
use ehlit_ast::{Ast, DeclKind, NodeId, NodeKind, Qualifier, build_ast};
use ehlit_common::{CompileOptions, Span};

fn options_in(dir: &std::path::Path) -> CompileOptions {
    CompileOptions::new(dir.join("main.eh"))
}

/// Create `<dir>/<name>.eh` so the import resolver finds it; the scripted
/// loader supplies its contents.
fn touch_module(dir: &std::path::Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(format!("{name}.eh"));
    std::fs::write(&path, "").expect("test module file should be writable");
    path
}

#[test]
fn test_private_symbol_is_rejected_across_modules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = touch_module(dir.path(), "m");
    let mut ast = Ast::new(Some("main.eh".to_string()));
    let span = Span::at(0);
    let import = ast.import(span, vec!["m".to_string()]);
    let secret_use = type_symbol(&mut ast, "secret");
    let y = named_var_init(&mut ast, "@int", "y", Qualifier::NONE, secret_use);
    ast.set_root_nodes(vec![import, y]);

    let mut loader = ScriptedLoader::new().module(
        path,
        Box::new(|ast: &mut Ast| vec![named_var(ast, "@int", "secret", Qualifier::PRIVATE)]),
    );
    let err = build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect_err("touching a private symbol from outside must fail");
    assert_eq!(err.errors, 1);
    assert_eq!(err.failures[0].msg, "accessing to private symbol `secret`");
}

#[test]
fn test_private_symbol_stays_visible_inside_its_module() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = touch_module(dir.path(), "m");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let import = ast.import(span, vec!["m".to_string()]);
    ast.set_root_nodes(vec![import]);

    let mut loader = ScriptedLoader::new().module(
        path,
        Box::new(|ast: &mut Ast| {
            let secret = named_var(ast, "@int", "secret", Qualifier::PRIVATE);
            let secret_use = type_symbol(ast, "secret");
            let p = named_var_init(ast, "@int", "p", Qualifier::NONE, secret_use);
            vec![secret, p]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("a module may use its own private symbols");
}

#[test]
fn test_forward_reference_across_modules() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = touch_module(dir.path(), "a");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let import = ast.import(span, vec!["a".to_string()]);
    let (call, stmt) = call_statement(&mut ast, "f", vec![]);
    ast.set_root_nodes(vec![import, stmt]);

    let exported_f = Rc::new(Cell::new(None::<NodeId>));
    let captured = Rc::clone(&exported_f);
    let mut loader = ScriptedLoader::new().module(
        path,
        Box::new(move |ast: &mut Ast| {
            let f = fun_declaration(ast, "f", "@void", vec![], None);
            captured.set(Some(f));
            vec![f]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("a call into an imported module should resolve");
    let sym = match ast.kind(call) {
        NodeKind::FunctionCall(c) => c.sym,
        other => panic!("expected a call, got {other:?}"),
    };
    let canon = ast
        .symbol_canonical(sym)
        .expect("the callee should resolve");
    assert_eq!(canon, exported_f.get().expect("module a was parsed"));
}

#[test]
fn test_missing_import_is_one_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let import = ast.import(
        span,
        vec!["does".to_string(), "not".to_string(), "exist".to_string()],
    );
    ast.set_root_nodes(vec![import]);
    let mut loader = ScriptedLoader::new();
    let err = build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect_err("a missing module must fail the build");
    assert_eq!(err.errors, 1);
    assert_eq!(
        err.failures[0].msg,
        "does/not/exist: no such file or directory"
    );
}

#[test]
fn test_each_module_parses_at_most_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = touch_module(dir.path(), "m");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let first = ast.import(span, vec!["m".to_string()]);
    let second = ast.import(span, vec!["m".to_string()]);
    ast.set_root_nodes(vec![first, second]);
    let mut loader = ScriptedLoader::new().module(
        path,
        Box::new(|ast: &mut Ast| vec![named_var(ast, "@int", "x", Qualifier::NONE)]),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("duplicate imports are fine");
    assert_eq!(
        loader.module_requests.len(),
        1,
        "the second import must hit the dedup set"
    );
}

#[test]
fn test_imported_function_definitions_skip_body_parsing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = touch_module(dir.path(), "a");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let import = ast.import(span, vec!["a".to_string()]);
    ast.set_root_nodes(vec![import]);
    let mut loader = ScriptedLoader::new().module(
        path,
        Box::new(|ast: &mut Ast| {
            vec![fun_definition(ast, "f", "@void", vec![], None, "never parsed")]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("imported definitions only need their signature");
    assert!(
        loader.body_requests.is_empty(),
        "an imported body must stay unparsed"
    );
}

#[test]
fn test_included_declarations_are_stamped_c_and_not_lowered() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let include = ast.include(span, vec!["stdio.h".to_string()]);
    let fmt_lit = ast.string_literal(span, "x");
    let one = ast.number(span, "1");
    let two = ast.number(span, "2");
    let (call, stmt) = call_statement(&mut ast, "printf", vec![fmt_lit, one, two]);
    ast.set_root_nodes(vec![include, stmt]);

    let printf = Rc::new(Cell::new(None::<NodeId>));
    let captured = Rc::clone(&printf);
    let mut loader = ScriptedLoader::new().header(
        "stdio.h",
        Box::new(move |ast: &mut Ast| {
            let fmt = named_var(ast, "@str", "fmt", Qualifier::NONE);
            let vtype = type_symbol(ast, "@int");
            let f = fun_declaration(ast, "printf", "@int", vec![fmt], Some(vtype));
            captured.set(Some(f));
            vec![f]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("calling into a C header should build");
    let printf = printf.get().expect("the header was parsed");
    assert_eq!(
        ast.decl_kind(printf),
        DeclKind::C,
        "included declarations carry the C kind"
    );
    assert_eq!(
        ast.call_args_len(call),
        3,
        "C variadics pass through unmodified"
    );
}

#[test]
fn test_header_parses_at_most_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let first = ast.include(span, vec!["stdio.h".to_string()]);
    let second = ast.include(span, vec!["stdio.h".to_string()]);
    ast.set_root_nodes(vec![first, second]);
    let mut loader = ScriptedLoader::new().header("stdio.h", Box::new(|_: &mut Ast| vec![]));
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("duplicate includes are fine");
    assert_eq!(loader.header_requests.len(), 1);
}

/// `void log(str fmt, ...int vals)` called as `log("x", 1, 2, 3)` inside a
/// function body: the tail materialises into `int __gen_fun_1[3] = {1,2,3}`
/// right before the call, and the actuals become `("x", 3, __gen_fun_1)`.
#[test]
fn test_variadic_lowering_inside_a_function_body() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let fmt_param = named_var(&mut ast, "@str", "fmt", Qualifier::NONE);
    let vtype = type_symbol(&mut ast, "@int");
    let log = fun_declaration(&mut ast, "log", "@void", vec![fmt_param], Some(vtype));
    let main = fun_definition(&mut ast, "main", "@void", vec![], None, "call log");
    ast.set_root_nodes(vec![log, main]);

    let call_id = Rc::new(Cell::new(None::<NodeId>));
    let captured = Rc::clone(&call_id);
    let mut loader = ScriptedLoader::new().body(
        "call log",
        Box::new(move |ast: &mut Ast| {
            let span = Span::at(0);
            let fmt = ast.string_literal(span, "x");
            let one = ast.number(span, "1");
            let two = ast.number(span, "2");
            let three = ast.number(span, "3");
            let (call, stmt) = call_statement(ast, "log", vec![fmt, one, two, three]);
            captured.set(Some(call));
            vec![stmt]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("the variadic call should lower");
    assert_eq!(
        loader.body_requests,
        vec![("call log".to_string(), false)],
        "a @void function body parses without a return value"
    );
    let call = call_id.get().expect("the body was parsed");

    let body: Vec<NodeId> = match ast.kind(main) {
        NodeKind::FunDef(d) => d.flow.body.clone(),
        other => panic!("expected a function definition, got {other:?}"),
    };
    assert_eq!(body.len(), 2, "the materialising statement is inserted");
    let inserted = match ast.kind(body[0]) {
        NodeKind::Statement(s) => s.expr,
        other => panic!("expected a statement, got {other:?}"),
    };
    match ast.kind(inserted) {
        NodeKind::VarDecl(d) => {
            assert_eq!(ast.ident_name(d.sym.expect("named")), "__gen_fun_1");
            let typ = ast.decl_type(inserted);
            match ast.kind(typ) {
                NodeKind::ArrayType(a) => assert!(ast.is_builtin(a.child, "@int")),
                other => panic!("expected an array type, got {other:?}"),
            }
        }
        other => panic!("expected the generated array declaration, got {other:?}"),
    }
    assert_eq!(ast.call_args_len(call), 3, "declared arity plus two");
    let arr_expr = ast.call_args(call)[2];
    match ast.kind(arr_expr) {
        NodeKind::Expression(e) => {
            assert_eq!(ast.symbol_repr(e.contents[0]), "__gen_fun_1");
        }
        other => panic!("expected an expression, got {other:?}"),
    }
}

/// `vargs.length` inside a variadic function collapses to the synthetic
/// `@vargs_len` identifier; `vargs` itself is an array of the variadic type.
#[test]
fn test_vargs_resolution_and_length_collapse() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let vtype = type_symbol(&mut ast, "@int");
    let log = fun_definition(&mut ast, "log", "@void", vec![], Some(vtype), "use vargs");
    ast.set_root_nodes(vec![log]);

    let len_use = Rc::new(Cell::new(None::<NodeId>));
    let vargs_use = Rc::new(Cell::new(None::<NodeId>));
    let len_captured = Rc::clone(&len_use);
    let vargs_captured = Rc::clone(&vargs_use);
    let mut loader = ScriptedLoader::new().body(
        "use vargs",
        Box::new(move |ast: &mut Ast| {
            let span = Span::at(0);
            let vargs_ident = ast.identifier(span, "vargs");
            let length_ident = ast.identifier(span, "length");
            let chain = ast.compound_identifier(span, vec![vargs_ident, length_ident]);
            len_captured.set(Some(chain));
            let e1 = ast.expression(span, vec![chain], false);
            let s1 = ast.statement(span, e1);
            let vargs_only = type_symbol(ast, "vargs");
            vargs_captured.set(Some(vargs_only));
            let e2 = ast.expression(span, vec![vargs_only], false);
            let s2 = ast.statement(span, e2);
            vec![s1, s2]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("vargs should resolve inside a variadic function");

    let chain = len_use.get().expect("the body was parsed");
    match ast.kind(chain) {
        NodeKind::CompoundIdentifier(c) => {
            assert_eq!(c.elems.len(), 1, "the chain collapses to one element");
            assert_eq!(ast.ident_name(c.elems[0]), "@vargs_len");
        }
        other => panic!("expected a compound identifier, got {other:?}"),
    }
    let vargs_only = vargs_use.get().expect("captured");
    let typ = ast.value_type(vargs_only);
    match ast.kind(typ) {
        NodeKind::ArrayType(a) => assert!(ast.is_builtin(a.child, "@int")),
        other => panic!("vargs should be an array of the variadic type, got {other:?}"),
    }
}

#[test]
fn test_vargs_outside_a_variadic_function_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let f = fun_definition(&mut ast, "f", "@void", vec![], None, "bad vargs");
    ast.set_root_nodes(vec![f]);
    let mut loader = ScriptedLoader::new().body(
        "bad vargs",
        Box::new(|ast: &mut Ast| {
            let span = Span::at(0);
            let use_ = type_symbol(ast, "vargs");
            let e = ast.expression(span, vec![use_], false);
            vec![ast.statement(span, e)]
        }),
    );
    let err = build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect_err("vargs needs a variadic function");
    assert_eq!(
        err.failures[0].msg,
        "use of vargs in a non variadic function"
    );
}

#[test]
fn test_unknown_identifier_keeps_building_and_reports() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let ghost = type_symbol(&mut ast, "ghost");
    let a = named_var_init(&mut ast, "@int", "a", Qualifier::NONE, ghost);
    let b = named_var(&mut ast, "@int", "b", Qualifier::NONE);
    ast.set_root_nodes(vec![a, b]);
    let mut loader = ScriptedLoader::new();
    let err = build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect_err("unknown identifiers are errors");
    assert_eq!(err.failures[0].msg, "use of undeclared identifier ghost");
    let typ = ast.value_type(ghost);
    assert!(
        ast.is_builtin(typ, "@any"),
        "an unresolved value falls back to @any"
    );
    // The rest of the module still built.
    assert!(ast.node(b).built);
}

/// Swapping the order of two mutually referencing top-level declarations
/// resolves to the same canonical declarations.
#[test]
fn test_forward_references_are_order_independent() {
    for swapped in [false, true] {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut ast = Ast::new(None);
        let span = Span::at(0);
        let v = named_var(&mut ast, "S", "v", Qualifier::NONE);
        let s_sym = ast.identifier(span, "S");
        let field = named_var(&mut ast, "@int", "x", Qualifier::NONE);
        let s = ast.struct_def(span, s_sym, Some(vec![field]));
        let nodes = if swapped { vec![s, v] } else { vec![v, s] };
        ast.set_root_nodes(nodes);
        let mut loader = ScriptedLoader::new();
        build_ast(&mut ast, &mut loader, &options_in(dir.path()))
            .expect("forward references inside a module are legal");
        let typ = ast.decl_type(v);
        assert_eq!(typ, s, "the variable's type is the struct (order: swapped={swapped})");
    }
}

/// Building an already-built tree is a no-op: node count and referencing
/// offsets are unchanged by a second pass.
#[test]
fn test_second_build_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let x = named_var(&mut ast, "@any", "x", Qualifier::NONE);
    let x_use = type_symbol(&mut ast, "x");
    let span = Span::at(0);
    let int_sym = type_symbol(&mut ast, "@int");
    let ref_int = ast.reference(span, int_sym);
    let expr = ast.expression(span, vec![x_use], false);
    let assign = ast.assignment(span, expr);
    let y_name = ast.identifier(span, "y");
    let y = ast.var_decl(span, ref_int, Some(y_name), Some(assign), Qualifier::NONE);
    ast.set_root_nodes(vec![x, y]);
    let mut loader = ScriptedLoader::new();
    let options = options_in(dir.path());
    build_ast(&mut ast, &mut loader, &options).expect("first build succeeds");
    let node_count = ast.len();
    let offset = ast.value_ref_offset(x_use);
    let cast = ast.value_cast(x_use);
    build_ast(&mut ast, &mut loader, &options).expect("second build succeeds");
    assert_eq!(ast.len(), node_count, "no nodes appear on a rebuild");
    assert_eq!(ast.value_ref_offset(x_use), offset);
    assert_eq!(ast.value_cast(x_use), cast);
}

/// An alias of a type declares variables and casts like the type itself.
#[test]
fn test_alias_of_a_type_declares_and_casts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let span = Span::at(0);
    let src = type_symbol(&mut ast, "@int");
    let dst = ast.identifier(span, "Number");
    let alias = ast.alias_def(span, src, dst);
    let x = named_var(&mut ast, "Number", "x", Qualifier::NONE);
    let val = ast.decimal_number(span, "4.2");
    let (_, stmt) = call_statement(&mut ast, "Number", vec![val]);
    ast.set_root_nodes(vec![alias, x, stmt]);
    let mut loader = ScriptedLoader::new();
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("aliases stand in for their target");
    let typ = ast.decl_type(x);
    assert!(
        ast.is_builtin(typ, "@int"),
        "the variable's type resolves through the alias"
    );
    let expr = match ast.kind(stmt) {
        NodeKind::Statement(s) => s.expr,
        other => panic!("expected a statement, got {other:?}"),
    };
    let rewritten = match ast.kind(expr) {
        NodeKind::Expression(e) => e.contents[0],
        other => panic!("expected an expression, got {other:?}"),
    };
    match ast.kind(rewritten) {
        NodeKind::CastValue(c) => assert!(ast.is_builtin(c.typ, "@int")),
        other => panic!("calling an aliased type should cast, got {other:?}"),
    }
}

/// Return expressions coerce to the function's return type.
#[test]
fn test_return_value_coerces_to_the_return_type() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut ast = Ast::new(None);
    let v = named_var(&mut ast, "@int", "v", Qualifier::NONE);
    let f = fun_definition(&mut ast, "f", "@any", vec![], None, "return v");
    ast.set_root_nodes(vec![v, f]);
    let v_use = Rc::new(Cell::new(None::<NodeId>));
    let captured = Rc::clone(&v_use);
    let mut loader = ScriptedLoader::new().body(
        "return v",
        Box::new(move |ast: &mut Ast| {
            let span = Span::at(0);
            let use_ = type_symbol(ast, "v");
            captured.set(Some(use_));
            let expr = ast.expression(span, vec![use_], false);
            vec![ast.return_stmt(span, Some(expr))]
        }),
    );
    build_ast(&mut ast, &mut loader, &options_in(dir.path()))
        .expect("returning into any should coerce");
    assert_eq!(
        loader.body_requests,
        vec![("return v".to_string(), true)],
        "a non-void function body parses with a return value"
    );
    let v_use = v_use.get().expect("captured");
    assert_eq!(
        ast.value_ref_offset(v_use),
        -1,
        "an int returned as any is passed by address"
    );
}
