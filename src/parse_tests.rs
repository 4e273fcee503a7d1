use super::parse_source;
use crate::ast::{
    BinaryOp, ClassMember, ClassRef, ExprKind, IncDec, NameKind, StmtKind, Visibility,
};
use crate::validate::ErrorKind;

fn first_method_body(code: &str) -> Vec<crate::ast::Stmt> {
    let file = parse_source(code, "test.php").unwrap();
    let class = file.classes()[0].clone();
    let body = class
        .methods()
        .next()
        .and_then(|m| m.body.clone())
        .unwrap();
    body
}

fn first_expr(code: &str) -> crate::ast::Expr {
    let body = first_method_body(&format!("<?php class T {{ function f() {{ {} }} }}", code));
    match body.into_iter().next().map(|s| s.kind) {
        Some(StmtKind::Expression(expr)) => expr,
        Some(StmtKind::Return(Some(expr))) => expr,
        other => panic!("expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_namespaced_class_header() {
    let file = parse_source(
        "<?php namespace App\\Model;\nuse Lib\\Base as B;\nabstract class User extends B implements \\Countable, Named {}",
        "user.php",
    )
    .unwrap();
    match &file.stmts[0].kind {
        StmtKind::Namespace { name, body, braced } => {
            assert_eq!(name.as_ref().unwrap().joined(), "App\\Model");
            assert!(!braced);
            assert_eq!(body.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
    let class = file.classes()[0];
    assert!(class.is_abstract);
    assert_eq!(class.parent.as_ref().unwrap().joined(), "B");
    assert_eq!(class.interfaces[0].kind, NameKind::FullyQualified);
    assert_eq!(class.interfaces[1].kind, NameKind::Unqualified);
}

#[test]
fn test_members_and_modifiers() {
    let file = parse_source(
        "<?php class A { const X = 1, Y = 2; protected $items = []; private ?int $n; public function __construct(string $name, int ...$rest) {} abstract function g(); }",
        "a.php",
    )
    .unwrap();
    let class = file.classes()[0];
    assert_eq!(class.members.len(), 6);
    match &class.members[2] {
        ClassMember::Property(p) => {
            assert_eq!(p.name, "items");
            assert_eq!(p.modifiers.visibility, Some(Visibility::Protected));
        }
        other => panic!("unexpected {:?}", other),
    }
    let ctor = class.constructor().unwrap();
    assert_eq!(ctor.params[0].ty.as_ref().unwrap().name.joined(), "string");
    assert!(ctor.params[1].variadic);
    match &class.members[5] {
        ClassMember::Method(m) => assert!(m.body.is_none()),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_precedence_concat_below_addition() {
    // PHP 8: "a" . 1 + 2 is "a" . (1 + 2)
    let expr = first_expr("return 'a' . 1 + 2;");
    match expr.kind {
        ExprKind::Binary { op, right, .. } => {
            assert_eq!(op, BinaryOp::Concat);
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_not_binds_looser_than_instanceof() {
    let expr = first_expr("return !$a instanceof Foo;");
    match expr.kind {
        ExprKind::Unary { operand, .. } => {
            assert!(matches!(operand.kind, ExprKind::Instanceof { .. }))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_assignment_is_right_associative() {
    let expr = first_expr("$a = $b = 3;");
    match expr.kind {
        ExprKind::Assign { value, .. } => {
            assert!(matches!(value.kind, ExprKind::Assign { .. }))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_pow_is_right_associative() {
    let expr = first_expr("return 2 ** 3 ** 2;");
    match expr.kind {
        ExprKind::Binary { op, right, .. } => {
            assert_eq!(op, BinaryOp::Pow);
            assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Pow, .. }));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_member_chains_and_static_access() {
    let expr = first_expr("return $this->items[0]->name(parent::X, self::class);");
    match expr.kind {
        ExprKind::MethodCall { object, args, .. } => {
            assert!(matches!(object.kind, ExprKind::ArrayDimFetch { .. }));
            assert!(matches!(
                &args[0].value.kind,
                ExprKind::ClassConstFetch { class: ClassRef::ParentRef, name } if name == "X"
            ));
            assert!(matches!(
                &args[1].value.kind,
                ExprKind::ClassConstFetch { class: ClassRef::SelfRef, name } if name == "class"
            ));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_increments() {
    assert!(matches!(
        first_expr("$i++;").kind,
        ExprKind::IncDec { kind: IncDec::PostInc, .. }
    ));
    assert!(matches!(
        first_expr("--$i;").kind,
        ExprKind::IncDec { kind: IncDec::PreDec, .. }
    ));
}

#[test]
fn test_closure_with_use() {
    let expr = first_expr("return function ($x) use ($y) { return $x + $y; };");
    match expr.kind {
        ExprKind::Closure(c) => {
            assert_eq!(c.params[0].name, "x");
            assert_eq!(c.uses[0].name, "y");
            assert_eq!(c.body.len(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_foreach_with_key() {
    let body = first_method_body(
        "<?php class T { function f() { foreach ($this->list as $k => $v) { continue; } } }",
    );
    match &body[0].kind {
        StmtKind::Foreach { key, by_ref, .. } => {
            assert!(key.is_some());
            assert!(!by_ref);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_try_with_multiple_catches() {
    let body = first_method_body(
        "<?php class T { function f() { try { g(); } catch (A | B $e) { } catch (\\Exception $e) { } finally { } } }",
    );
    match &body[0].kind {
        StmtKind::Try {
            catches, finally, ..
        } => {
            assert_eq!(catches.len(), 2);
            assert_eq!(catches[0].types.len(), 2);
            assert!(finally.is_some());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_dynamic_forms_are_parsed() {
    assert!(matches!(first_expr("return $$name;").kind, ExprKind::DynamicVariable(_)));
    assert!(matches!(
        first_expr("return new $cls();").kind,
        ExprKind::New { class: ClassRef::Dynamic(_), .. }
    ));
}

#[test]
fn test_unmodeled_constructs_are_rejected() {
    for code in [
        "<?php class T { function f() { switch ($a) {} } }",
        "<?php class T { function f() { return $a ?? 1; } }",
        "<?php class T { function f() { return fn($x) => $x; } }",
        "<?php class T { function f() { return clone $a; } }",
        "<?php class T { function f() { g(name: 1); } }",
    ] {
        let err = parse_source(code, "bad.php").unwrap_err();
        assert!(err.is(ErrorKind::Unsupported), "{}: {}", code, err);
        assert_eq!(err.file, "bad.php");
    }
}

#[test]
fn test_parse_error_location() {
    let err = parse_source("<?php\nclass A {\n  function f( {}\n}", "x.php").unwrap_err();
    assert!(err.is(ErrorKind::Parse));
    assert_eq!(err.line, 3);
}
