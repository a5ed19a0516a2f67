use indoc::indoc;
use lyric_object::{LyricObject, Opcode};

use crate::diagnostics::DiagnosticKind;
use crate::error::CompilerError;
use crate::test_utils::{compile_dump, compile_error, compile_object, try_compile};

/// Opcodes of the call at `path`.
fn ops(object: &LyricObject, path: &str) -> Vec<Opcode> {
    let call = object
        .tables()
        .calls
        .iter()
        .find(|c| object.string(c.path) == Some(path))
        .unwrap_or_else(|| panic!("no call `{path}`"));
    let layout = object.proc(call.proc_offset).unwrap();
    object
        .iter_proc(&layout)
        .map(|cell| cell.unwrap().opcode)
        .collect()
}

fn num_checks(object: &LyricObject, path: &str) -> usize {
    let call = object
        .tables()
        .calls
        .iter()
        .find(|c| object.string(c.path) == Some(path))
        .unwrap();
    object.proc(call.proc_offset).unwrap().checks.len()
}

/// Kinds of the diagnostics a failed compile reports.
fn error_kinds(source: &str) -> Vec<DiagnosticKind> {
    match try_compile(source) {
        Ok(_) => panic!("expected compilation to fail"),
        Err(CompilerError::Compile(diagnostics)) => diagnostics.iter().map(|d| d.kind()).collect(),
        Err(other) => panic!("expected located diagnostics, got {other}"),
    }
}

#[test]
fn entry_expression() {
    let source = r#"(Block (Add (Integer :value "1") (Integer :value "1")))"#;
    let object = compile_object(source);

    assert_eq!(object.symbol_count(), 2);
    assert_eq!(object.import_count(), 0);
    insta::assert_snapshot!(compile_dump(source), @r"
    [symbols]
    $entry = Call #0
    $global = Namespace #0

    [types]
    T0 lyric://bootstrap/prelude#Int

    [calls]
    C0 $entry (0 params) -> lyric://bootstrap/prelude#Int
      args=0 locals=0 lexicals=0 checks=0
      0000 I64 1
      0009 I64 1
      0018 I64_ADD
      0019 RETURN
    ");
}

#[test]
fn class_with_implicit_constructor() {
    let source = r#"(Block (DefClass :identifier "Class"))"#;
    let object = compile_object(source);

    assert_eq!(object.symbol_count(), 3);
    assert_eq!(object.import_count(), 1);
    insta::assert_snapshot!(compile_dump(source), @r"
    [symbols]
    $global = Namespace #0
    Class = Class #0
    Class#$ctor = Call #0

    [imports]
    I0 lyric://bootstrap/prelude flags=0x01

    [links]
    L0 I0#Object (Class)
    L1 I0#Object#$ctor (Call)

    [types]
    T0 lyric://bootstrap/prelude#Nil
    T1 #Class

    [calls]
    C0 Class#$ctor (0 params) -> lyric://bootstrap/prelude#Nil
      args=0 locals=0 lexicals=0 checks=0
      0000 SYNTHETIC 1
      0002 CALL_STATIC 0x01 L1 0
      0010 POP
      0011 NIL
      0012 RETURN
    ");
}

#[test]
fn empty_module_has_no_entry() {
    let object = compile_object("(Block)");

    assert_eq!(object.symbol_count(), 1);
    assert!(object.tables().calls.is_empty());
}

#[test]
fn sequence_drops_intermediate_values() {
    let object = compile_object(r#"(Block (Integer :value "1") (Integer :value "2"))"#);

    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::I64, Opcode::Pop, Opcode::I64, Opcode::Return]
    );
}

#[test]
fn val_binding_is_stored_and_loaded() {
    let source = indoc! {r#"
        (Block
          (Val :identifier "x" (Integer :value "2"))
          (Name :identifier "x"))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::I64, Opcode::Store, Opcode::Load, Opcode::Return]
    );
    let dump = compile_dump(source);
    assert!(dump.contains("args=0 locals=1"), "{dump}");
    assert!(dump.contains("STORE 0x02 #0"), "{dump}");
    assert!(dump.contains("LOAD 0x02 #0"), "{dump}");
}

#[test]
fn if_with_else_yields_a_value() {
    let source = indoc! {r#"
        (Block
          (If (True) (Integer :value "1") (Integer :value "2")))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "$entry"),
        vec![
            Opcode::True,
            Opcode::IfFalse,
            Opcode::I64,
            Opcode::Jump,
            Opcode::I64,
            Opcode::Return,
        ]
    );
    assert!(compile_dump(source).contains("$entry (0 params) -> lyric://bootstrap/prelude#Int"));
}

#[test]
fn if_without_else_discards_its_branch() {
    let object = compile_object(r#"(Block (If (True) (Integer :value "1")))"#);

    assert_eq!(
        ops(&object, "$entry"),
        vec![
            Opcode::True,
            Opcode::IfFalse,
            Opcode::I64,
            Opcode::Pop,
            Opcode::Nil,
            Opcode::Return,
        ]
    );
}

#[test]
fn while_loop_with_inplace_update() {
    let source = indoc! {r#"
        (Block
          (Var :identifier "i" (Integer :value "0"))
          (While (IsLt (Name :identifier "i") (Integer :value "3"))
            (InplaceAdd :identifier "i" (Integer :value "1")))
          (Name :identifier "i"))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "$entry"),
        vec![
            Opcode::I64,
            Opcode::Store,
            Opcode::Load,
            Opcode::I64,
            Opcode::I64Cmp,
            Opcode::IfGe,
            Opcode::True,
            Opcode::Jump,
            Opcode::False,
            Opcode::IfFalse,
            Opcode::Load,
            Opcode::I64,
            Opcode::I64Add,
            Opcode::Store,
            Opcode::Jump,
            Opcode::Load,
            Opcode::Return,
        ]
    );
}

#[test]
fn cond_falls_through_to_default() {
    let source = indoc! {r#"
        (Block
          (Cond
            (Case (False) (Integer :value "1"))
            (Integer :value "2")))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "$entry"),
        vec![
            Opcode::False,
            Opcode::IfFalse,
            Opcode::I64,
            Opcode::Jump,
            Opcode::I64,
            Opcode::Return,
        ]
    );
}

#[test]
fn function_result_is_inferred_from_its_body() {
    let source = indoc! {r#"
        (Block
          (Def :identifier "double" (Param :identifier "n" :type "Int")
            (Add (Name :identifier "n") (Name :identifier "n")))
          (Call :identifier "double" (Integer :value "21")))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "double"),
        vec![Opcode::Load, Opcode::Load, Opcode::I64Add, Opcode::Return]
    );
    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::I64, Opcode::CallStatic, Opcode::Return]
    );
    let dump = compile_dump(source);
    assert!(dump.contains("double (1 params) -> lyric://bootstrap/prelude#Int"), "{dump}");
    assert!(dump.contains("$entry (0 params) -> lyric://bootstrap/prelude#Int"), "{dump}");
}

#[test]
fn call_before_definition_returns_any() {
    let source = indoc! {r#"
        (Block
          (Def :identifier "early" (Call :identifier "later"))
          (Def :identifier "later" (Integer :value "1")))
    "#};
    let dump = compile_dump(source);

    assert!(dump.contains("early (0 params) -> lyric://bootstrap/prelude#Any"), "{dump}");
    assert!(dump.contains("later (0 params) -> lyric://bootstrap/prelude#Int"), "{dump}");
}

#[test]
fn class_with_field_constructor_and_method() {
    let source = indoc! {r#"
        (Block
          (DefClass :identifier "Point"
            (Val :identifier "x" :type "Int")
            (Init (Param :identifier "x0" :type "Int")
              (Set :identifier "x" (Name :identifier "x0")))
            (Def :identifier "getX" (Name :identifier "x")))
          (Deref (New :type "Point" (Integer :value "3")) (Call :identifier "getX")))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "Point#$ctor"),
        vec![
            Opcode::Synthetic,
            Opcode::CallStatic,
            Opcode::Pop,
            Opcode::Synthetic,
            Opcode::Load,
            Opcode::Store,
            Opcode::Nil,
            Opcode::Return,
        ]
    );
    assert_eq!(
        ops(&object, "Point#getX"),
        vec![Opcode::Synthetic, Opcode::Load, Opcode::Return]
    );
    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::I64, Opcode::New, Opcode::CallVirtual, Opcode::Return]
    );
}

#[test]
fn try_catch_binds_the_exception() {
    let source = indoc! {r#"
        (Block
          (Try
            (Raise (New :type "Object"))
            (Catch :identifier "e" (Integer :value "1"))))
    "#};
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "$entry"),
        vec![
            Opcode::New,
            Opcode::Raise,
            Opcode::Store,
            Opcode::I64,
            Opcode::Jump,
            Opcode::Return,
        ]
    );
    assert_eq!(num_checks(&object, "$entry"), 1);
    assert!(compile_dump(source).contains("$entry (0 params) -> lyric://bootstrap/prelude#Int"));
}

#[test]
fn namespace_static_is_loaded_by_path() {
    let source = indoc! {r#"
        (Block
          (Namespace :identifier "Geometry"
            (DefStatic :identifier "pi" :type "Float" (Float :value "3.14")))
          (Name :identifier "Geometry.pi"))
    "#};
    let object = compile_object(source);

    assert_eq!(ops(&object, "$entry"), vec![Opcode::Load, Opcode::Return]);
    assert_eq!(
        ops(&object, "Geometry#pi#$init"),
        vec![Opcode::Dbl, Opcode::Return]
    );
}

#[test]
fn using_brings_a_namespace_member_into_scope() {
    let source = indoc! {r##"
        (Block
          (Namespace :identifier "N"
            (Def :identifier "one" (Integer :value "1")))
          (Using :url "#N#one")
          (Call :identifier "one"))
    "##};
    let object = compile_object(source);

    assert_eq!(ops(&object, "$entry"), vec![Opcode::CallStatic, Opcode::Return]);
}

#[test]
fn unreachable_code_is_a_warning() {
    let source = indoc! {r#"
        (Block
          (Def :identifier "f"
            (Return (Integer :value "1"))
            (Integer :value "2")))
    "#};
    let driver = try_compile(source).unwrap();

    let kinds: Vec<_> = driver.diagnostics().iter().map(|d| d.kind()).collect();
    assert_eq!(kinds, vec![DiagnosticKind::UnreachableCode]);
    assert!(!driver.diagnostics().has_errors());
}

#[test]
fn undefined_name_is_located() {
    let source = r#"(Block (Name :identifier "missing"))"#;

    insta::assert_snapshot!(compile_error(source), @"error at 7..35: `missing` is not defined");
}

#[test]
fn assignment_to_val_is_rejected() {
    let source = indoc! {r#"
        (Block
          (Val :identifier "x" (Integer :value "1"))
          (Set :identifier "x" (Integer :value "2")))
    "#};

    assert_eq!(error_kinds(source), vec![DiagnosticKind::NotAssignable]);
}

#[test]
fn mixed_arithmetic_is_rejected() {
    let source = r#"(Block (Add (Integer :value "1") (Float :value "2.0")))"#;

    assert_eq!(error_kinds(source), vec![DiagnosticKind::IncompatibleTypes]);
}

#[test]
fn declared_result_type_is_enforced() {
    let source = r#"(Block (Def :identifier "f" :type "Int" (String :value "s")))"#;

    assert_eq!(error_kinds(source), vec![DiagnosticKind::IncompatibleTypes]);
}

#[test]
fn invalid_integer_literal() {
    let source = r#"(Block (Integer :value "abc"))"#;

    assert_eq!(error_kinds(source), vec![DiagnosticKind::InvalidLiteral]);
}

#[test]
fn try_is_not_an_operand() {
    let source = indoc! {r#"
        (Block
          (Add (Integer :value "1")
            (Try (Integer :value "2") (Catch (Integer :value "3")))))
    "#};

    assert_eq!(error_kinds(source), vec![DiagnosticKind::UnexpectedNode]);
}

#[test]
fn namespaces_only_contain_definitions() {
    let source = r#"(Block (Namespace :identifier "N" (Integer :value "1")))"#;

    assert_eq!(error_kinds(source), vec![DiagnosticKind::UnexpectedNode]);
}

#[test]
fn struct_is_built_with_new() {
    let source = indoc! {r#"
        (Block
          (DefStruct :identifier "Pair"
            (Val :identifier "a" :type "Int")
            (Init (Param :identifier "a0" :type "Int")
              (Set :identifier "a" (Name :identifier "a0"))))
          (New :type "Pair" (Integer :value "1")))
    "#};
    let object = compile_object(source);
    let dump = compile_dump(source);

    assert!(dump.contains("Pair = Struct #0"), "{dump}");
    assert_eq!(
        ops(&object, "Pair#$ctor"),
        vec![
            Opcode::Synthetic,
            Opcode::Load,
            Opcode::Store,
            Opcode::Nil,
            Opcode::Return,
        ]
    );
    assert_eq!(ops(&object, "$entry"), vec![Opcode::I64, Opcode::New, Opcode::Return]);
}

#[test]
fn singleton_is_loaded_by_name() {
    let source = indoc! {r#"
        (Block
          (DefInstance :identifier "Counter"
            (Var :identifier "count" :type "Int")
            (Init (Set :identifier "count" (Integer :value "0")))
            (Def :identifier "current" :type "Int" (Name :identifier "count")))
          (Deref (Name :identifier "Counter") (Call :identifier "current")))
    "#};
    let object = compile_object(source);

    assert!(compile_dump(source).contains("Counter = Instance #0"));
    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::Load, Opcode::CallVirtual, Opcode::Return]
    );
}

#[test]
fn enum_cases_are_fields_of_the_singleton() {
    let source = indoc! {r#"
        (Block
          (DefEnum :identifier "Color"
            (Val :identifier "red" :type "Int")
            (Init (Set :identifier "red" (Integer :value "1"))))
          (Deref (Name :identifier "Color") (Name :identifier "red")))
    "#};
    let object = compile_object(source);

    assert!(compile_dump(source).contains("Color = Enum #0"));
    assert_eq!(ops(&object, "$entry"), vec![Opcode::Load, Opcode::Load, Opcode::Return]);
}

#[test]
fn singletons_cannot_be_constructed() {
    let source = indoc! {r#"
        (Block
          (DefInstance :identifier "Counter")
          (New :type "Counter"))
    "#};

    assert_eq!(error_kinds(source), vec![DiagnosticKind::UnexpectedNode]);
}

#[test]
fn singleton_init_takes_no_parameters() {
    let source = indoc! {r#"
        (Block
          (DefEnum :identifier "Color"
            (Init (Param :identifier "x" :type "Int"))))
    "#};

    assert!(compile_error(source).contains("`Init` of DefEnum `Color` takes no parameters"));
}

#[test]
fn concept_call_dispatches_through_the_action() {
    let source = indoc! {r#"
        (Block
          (DefConcept :identifier "Shape" (DefAction :identifier "area" :type "Int"))
          (DefStruct :identifier "Square" :implements "Shape"
            (Def :identifier "area" :type "Int" (Integer :value "4")))
          (Def :identifier "measure" :type "Int" (Param :identifier "s" :type "Shape")
            (Deref (Name :identifier "s") (Call :identifier "area")))
          (Call :identifier "measure" (New :type "Square")))
    "#};
    let object = compile_object(source);
    let dump = compile_dump(source);

    assert!(dump.contains("Shape = Concept #0"), "{dump}");
    assert!(dump.contains("Shape#area = Action #0"), "{dump}");
    assert_eq!(
        ops(&object, "measure"),
        vec![Opcode::Load, Opcode::CallConcept, Opcode::Return]
    );
    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::New, Opcode::CallStatic, Opcode::Return]
    );
}

#[test]
fn concept_may_be_implemented_before_it_is_defined() {
    let source = indoc! {r#"
        (Block
          (DefClass :identifier "Circle" :implements "Shape"
            (Def :identifier "area" :type "Int" (Integer :value "3")))
          (DefConcept :identifier "Shape" (DefAction :identifier "area" :type "Int")))
    "#};

    assert!(try_compile(source).is_ok());
}

#[test]
fn missing_action_is_reported() {
    let source = indoc! {r#"
        (Block
          (DefConcept :identifier "Shape"
            (DefAction :identifier "scale" (Param :identifier "by" :type "Int")))
          (DefClass :identifier "Blob" :implements "Shape"
            (Def :identifier "scale" (Integer :value "1"))))
    "#};

    assert_eq!(error_kinds(source), vec![DiagnosticKind::UnexpectedNode]);
    assert!(
        compile_error(source)
            .contains("`Blob` does not implement `scale` of `Shape` with 1 parameter(s)")
    );
}

#[test]
fn only_concepts_can_be_implemented() {
    let source = indoc! {r#"
        (Block
          (DefClass :identifier "Base")
          (DefClass :identifier "Derived" :implements "Base"))
    "#};

    assert!(compile_error(source).contains("`Base` is not a concept"));
}

#[test]
fn actions_belong_in_concepts() {
    let source = r#"(Block (Def :identifier "f" (DefAction :identifier "a")))"#;

    assert_eq!(error_kinds(source), vec![DiagnosticKind::UnexpectedNode]);
}

#[test]
fn fundamental_method_is_an_existential_call() {
    let source = r#"(Block (Deref (Integer :value "-3") (Call :identifier "abs")))"#;
    let object = compile_object(source);

    assert_eq!(
        ops(&object, "$entry"),
        vec![Opcode::I64, Opcode::CallExistential, Opcode::Return]
    );
    assert!(compile_dump(source).contains("$entry (0 params) -> lyric://bootstrap/prelude#Int"));
}
