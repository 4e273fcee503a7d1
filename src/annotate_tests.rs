use super::*;
use crate::ast::{Stmt, StmtKind};
use crate::parse::parse_source;
use crate::transform::{simplify, Pipeline};

const SCRIPT: &str = "Phpjs\\ScriptInterface";

fn prepared(code: &str) -> SourceFile {
    let file = parse_source(code, "a.php").unwrap();
    let mut file = simplify(file, Pipeline::Full, SCRIPT).unwrap();
    annotate(&mut file, SCRIPT).unwrap();
    file
}

fn declares(stmt: &Stmt) -> Option<bool> {
    match &stmt.kind {
        StmtKind::Expression(e) => e.attrs.get_bool(attr::DECLARES),
        _ => None,
    }
}

fn body_of(file: &SourceFile) -> Vec<Stmt> {
    file.classes()[0]
        .methods()
        .next()
        .and_then(|m| m.body.clone())
        .unwrap()
}

#[test]
fn test_members_default_to_public() {
    let file = prepared("<?php class T { var $a; private $b; const C = 1; function f() {} }");
    let class = file.classes()[0];
    let stamped: Vec<&str> = class
        .members
        .iter()
        .map(|m| m.attrs().unwrap().get_str(attr::VISIBILITY).unwrap())
        .collect();
    assert_eq!(stamped, ["public", "private", "public", "public"]);
}

#[test]
fn test_first_assignment_per_scope() {
    let file = prepared("<?php class T { function f($p) { $a = 1; $a = 2; $p = 3; $b = $c = 4; } }");
    let body = body_of(&file);
    assert_eq!(body.len(), 4);
    assert_eq!(declares(&body[0]), Some(true));
    assert_eq!(declares(&body[1]), Some(false));
    // parameters are already defined
    assert_eq!(declares(&body[2]), Some(false));
    let StmtKind::Expression(chained) = &body[body.len() - 1].kind else {
        panic!("expected expression");
    };
    assert_eq!(chained.attrs.get_bool(attr::DECLARES), Some(true));
    match &chained.kind {
        ExprKind::Assign { value, .. } => {
            // the inner assignment is visited first
            assert_eq!(value.attrs.get_bool(attr::DECLARES), Some(true))
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_foreach_callbacks_keep_their_stamps() {
    let file = prepared(
        "<?php class T { function f() { $total = 0; foreach ($this->xs as $x) { $total = $total + $x; $seen = 1; } } }",
    );
    let body = body_of(&file);
    // `$seen = null` is hoisted above everything else
    assert_eq!(declares(&body[0]), Some(true));
    assert_eq!(declares(&body[1]), Some(true));
    let StmtKind::Expression(call) = &body[2].kind else {
        panic!("expected foreach call");
    };
    let ExprKind::MethodCall { args, .. } = &call.kind else {
        panic!("expected foreach call");
    };
    let ExprKind::Closure(closure) = &args[0].value.kind else {
        panic!("expected callback");
    };
    assert!(closure.body.iter().all(|s| declares(s) == Some(false)));
}

#[test]
fn test_closures_open_a_fresh_scope() {
    let file = prepared(
        "<?php class T { function f() { $a = 1; $g = function ($b) use ($a) { $a = 2; $b = 3; $c = 4; }; } }",
    );
    let body = body_of(&file);
    let StmtKind::Expression(assign) = &body[1].kind else {
        panic!("expected assignment");
    };
    let ExprKind::Assign { value, .. } = &assign.kind else {
        panic!("expected assignment");
    };
    let ExprKind::Closure(closure) = &value.kind else {
        panic!("expected closure");
    };
    let stamps: Vec<Option<bool>> = closure.body.iter().map(declares).collect();
    assert_eq!(stamps, [Some(false), Some(false), Some(true)]);
}

#[test]
fn test_script_dependencies_are_recorded_in_order() {
    let file = prepared(
        "<?php namespace App; use Phpjs\\ScriptInterface; use Phpjs\\Api\\Console; use Phpjs\\Api\\Document;
         class Main implements ScriptInterface {
             public function __construct(Document $d, Console $c) {}
             public function run() {}
         }",
    );
    let class = file.classes()[0];
    assert_eq!(
        class.attrs.get_strings(attr::SCRIPT_DEPENDENCIES).unwrap(),
        ["Phpjs\\Api\\Document", "Phpjs\\Api\\Console"]
    );
    assert!(class.constructor().unwrap().params.iter().all(|p| p.ty.is_none()));
}

#[test]
fn test_script_class_without_constructor_has_no_dependencies() {
    let file = prepared(
        "<?php use Phpjs\\ScriptInterface; class Main implements ScriptInterface { public function run() {} }",
    );
    let class = file.classes()[0];
    assert_eq!(
        class.attrs.get_strings(attr::SCRIPT_DEPENDENCIES),
        Some(vec![])
    );
}

#[test]
fn test_script_dependencies_outside_the_api_are_rejected() {
    for ctor in ["Logger $l", "$untyped", "string $s"] {
        let code = format!(
            "<?php use Phpjs\\ScriptInterface; class Main implements ScriptInterface {{ public function __construct({}) {{}} }}",
            ctor
        );
        let file = parse_source(&code, "s.php").unwrap();
        let mut file = simplify(file, Pipeline::Full, SCRIPT).unwrap();
        let err = annotate(&mut file, SCRIPT).unwrap_err();
        assert!(err.is(ErrorKind::ScriptDependency), "{}", ctor);
        assert!(err.message.contains("Phpjs\\Api"));
    }
}

#[test]
fn test_this_accesses_get_their_bucket() {
    let mut file = prepared(
        "<?php class Base { protected $items; private $secret; }
         class Box extends Base {
             private $label;
             public function f() { $this->label = $this->items; $this->secret; $this->size(); }
             public function size() {}
         }",
    );
    let mut registry = Registry::new();
    registry.add_file(&file, false).unwrap();
    annotate_this_visibility(&mut file, &registry).unwrap();
    let box_class = file.classes()[1];
    let body = box_class.methods().next().unwrap().body.clone().unwrap();
    let vis = |e: &Expr| e.attrs.get_str(attr::VISIBILITY).map(str::to_string);
    let StmtKind::Expression(assign) = &body[0].kind else {
        panic!("expected assignment");
    };
    let ExprKind::Assign { target, value } = &assign.kind else {
        panic!("expected assignment");
    };
    assert_eq!(vis(target).as_deref(), Some("private"));
    assert_eq!(vis(value).as_deref(), Some("protected"));
    let StmtKind::Expression(secret) = &body[1].kind else {
        panic!("expected fetch");
    };
    assert_eq!(vis(secret).as_deref(), Some("public"));
    let StmtKind::Expression(call) = &body[2].kind else {
        panic!("expected call");
    };
    assert_eq!(vis(call).as_deref(), Some("public"));
}

#[test]
fn test_this_with_variable_member_is_rejected() {
    let mut file = prepared("<?php class T { public function f($n) { return $this->$n; } }");
    let mut registry = Registry::new();
    registry.add_file(&file, false).unwrap();
    let err = annotate_this_visibility(&mut file, &registry).unwrap_err();
    assert!(err.is(ErrorKind::Unsupported));
    assert!(err.message.contains("variable expression"));
    assert_eq!(err.file, "a.php");
}

#[test]
fn test_dependencies_are_collected_once_in_order() {
    let mut file = prepared(
        "<?php namespace App; use Lib\\Base; use Lib\\Shape;
         class Main extends Base implements \\Phpjs\\ScriptInterface {
             public function __construct(\\Phpjs\\Api\\Console $c) {}
             public function run(Shape $s) {
                 try { $x = new Shape(); } catch (\\Exception $e) { }
                 return $s instanceof Shape ? Base::X : strlen(Main::class);
             }
         }",
    );
    let deps = collect_dependencies(&mut file).unwrap();
    assert_eq!(
        deps,
        [
            "Lib\\Base",
            "Phpjs\\ScriptInterface",
            "Phpjs\\Shim\\Console",
            "Phpjs\\Api\\Console",
            "Lib\\Shape",
            "Exception",
            "strlen",
        ]
    );
}
