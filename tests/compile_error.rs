//! End-to-end lowering scenarios that should fail, one per error kind in
//! spec §7 that lowering itself can raise (as opposed to `Uncolorable`,
//! which the allocator recovers from internally, and `ParseError`, which
//! belongs to the out-of-scope parser).

mod common;

use cmmc::ast::NodeKind;
use cmmc::error::Error;
use cmmc::function::{Function, LowerCtx};
use cmmc::types::{Signature, Type};
use cmmc::vreg::Global;
use indexmap::IndexMap;

use common::*;

fn empty_ctx() -> (IndexMap<String, Global>, IndexMap<String, Signature>, IndexMap<String, u32>) {
    (IndexMap::new(), IndexMap::new(), IndexMap::new())
}

#[test]
fn referencing_an_undeclared_name_is_a_resolution_error() {
    let source = function("f", type_node(NodeKind::S32), vec![], vec![ret(ident("missing"))]);

    let (globals, signatures, mut strings) = empty_ctx();
    let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
    let err = Function::compile(&source, &mut ctx).unwrap_err();
    assert!(matches!(err, Error::Resolution { ref name } if name == "missing"));
}

#[test]
fn redeclaring_a_parameter_name_as_a_local_is_a_name_conflict() {
    let decl = tagged(
        NodeKind::Colon,
        vec![leaf(NodeKind::Ident, "x"), type_node(NodeKind::S32), number("1")],
    );
    let source = function("f", type_node(NodeKind::Void), vec![param("x", type_node(NodeKind::S32))], vec![decl]);

    let (globals, signatures, mut strings) = empty_ctx();
    let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
    let err = Function::compile(&source, &mut ctx).unwrap_err();
    assert!(matches!(err, Error::NameConflict { ref name } if name == "x"));
}

#[test]
fn calling_with_the_wrong_argument_count_is_an_arity_mismatch() {
    let source = function(
        "f",
        type_node(NodeKind::S32),
        vec![],
        vec![ret(call("callee", vec![number("1")]))],
    );

    let (globals, mut signatures, mut strings) = empty_ctx();
    signatures.insert("callee".to_string(), Signature { ret: Type::s32(), args: vec![] });
    let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
    let err = Function::compile(&source, &mut ctx).unwrap_err();
    assert!(matches!(err, Error::ArityMismatch { ref name, expected: 0, got: 1 } if name == "callee"));
}

#[test]
fn calling_an_undeclared_function_is_a_function_not_found_error() {
    let source = function("f", type_node(NodeKind::Void), vec![], vec![ret(call("ghost", vec![]))]);

    let (globals, signatures, mut strings) = empty_ctx();
    let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
    let err = Function::compile(&source, &mut ctx).unwrap_err();
    assert!(matches!(err, Error::FunctionNotFound { ref name } if name == "ghost"));
}

#[test]
fn assigning_a_pointer_into_an_integer_is_an_implicit_conversion_error() {
    let decl = tagged(
        NodeKind::Colon,
        vec![leaf(NodeKind::Ident, "n"), type_node(NodeKind::S32), ident("p")],
    );
    let source = function(
        "f",
        type_node(NodeKind::Void),
        vec![param("p", pointer_to(type_node(NodeKind::S32)))],
        vec![decl],
    );

    let (globals, signatures, mut strings) = empty_ctx();
    let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
    let err = Function::compile(&source, &mut ctx).unwrap_err();
    assert!(matches!(err, Error::ImplicitConversion { .. }));
}

#[test]
fn taking_the_address_of_a_parameter_fails_because_it_was_never_placed_on_the_stack() {
    let source =
        function("f", pointer_to(type_node(NodeKind::S32)), vec![param("x", type_node(NodeKind::S32))], vec![
            ret(tagged(NodeKind::And, vec![ident("x")])),
        ]);

    let (globals, signatures, mut strings) = empty_ctx();
    let mut ctx = LowerCtx { globals: &globals, signatures: &signatures, strings: &mut strings };
    let err = Function::compile(&source, &mut ctx).unwrap_err();
    assert!(matches!(err, Error::NotOnStack { ref name } if name == "x"));
}
