use super::*;
use crate::annotate::{annotate, annotate_this_visibility};
use crate::ast::SourceFile;
use crate::js_printer::print;
use crate::parse::parse_source;
use crate::transform::{simplify, Pipeline};
use crate::validate::check_source;

const SCRIPT: &str = "Phpjs\\ScriptInterface";

fn prepare(code: &str) -> (SourceFile, Registry) {
    prepare_file(code, true)
}

fn prepare_file(code: &str, checked: bool) -> (SourceFile, Registry) {
    let file = parse_source(code, "c.php").unwrap();
    let mut file = simplify(file, Pipeline::Full, SCRIPT).unwrap();
    if let Some(err) = check_source(&mut file).filter(|_| checked) {
        panic!("{}", err);
    }
    annotate(&mut file, SCRIPT).unwrap();
    let mut registry = Registry::new();
    registry.add_file(&file, false).unwrap();
    annotate_this_visibility(&mut file, &registry).unwrap();
    (file, registry)
}

fn try_class_js(code: &str, class: &str) -> CompilerResult<String> {
    let (file, registry) = prepare(code);
    let decl = file
        .classes()
        .into_iter()
        .find(|c| c.qualified_name() == class)
        .unwrap();
    print(&compile_class(decl, &registry)?)
}

fn class_js(code: &str, class: &str) -> String {
    try_class_js(code, class).unwrap()
}

fn assert_has(js: &str, fragment: &str) {
    assert!(js.contains(fragment), "missing `{}` in:\n{}", fragment, js);
}

#[test]
fn test_members_land_in_their_buckets() {
    let js = class_js(
        "<?php class Box {
            public $name = 'x';
            private $secret;
            protected function helper() { return $this->secret; }
            public function me() { return $this; }
        }",
        "Box",
    );
    assert!(js.starts_with("root.Box = (function (parent) {"));
    assert!(js.ends_with("})(__baseClass);"));
    assert_has(&js, "__public.name = \"x\";");
    assert_has(&js, "__private.secret = null;");
    assert_has(&js, "__protected.helper = function () {");
    assert_has(&js, "return __private.secret;");
    assert_has(&js, "return __public;");
    assert_has(&js, "var __private = {};");
    assert_has(&js, "var __parent = __copy(__protected, __public);");
    assert_has(&js, "return (name === \"Box\") || __parent.__instanceOf(name);");
}

#[test]
fn test_missing_constructor_delegates_to_parent() {
    let js = class_js("<?php class A {} class B extends A {}", "B");
    assert_has(&js, "inherited.construct.apply(null, arguments);");
    assert!(js.ends_with("})(root.A);"));
    assert_has(&js, "\"__construct\": function () {");
}

#[test]
fn test_constructor_returns_the_public_object() {
    let js = class_js(
        "<?php class A { private $v; public function __construct($v) { if ($v) { return; } $this->v = $v; } }",
        "A",
    );
    assert_has(&js, "var construct = function (v) {");
    assert_has(&js, "if (v) {\n                    return __public;\n                }");
    assert_has(&js, "__private.v = v;\n                return __public;");
}

#[test]
fn test_parent_calls_use_the_snapshot() {
    let js = class_js(
        "<?php class A { public function f() {} } class B extends A { public function __construct() { parent::__construct(); } public function f() { return parent::f(); } }",
        "B",
    );
    assert_has(&js, "__parent.__construct();");
    assert_has(&js, "return __parent.f();");
}

#[test]
fn test_first_assignments_declare_variables() {
    let js = class_js(
        "<?php class A { public function f() { $x = 1; $x = 2; while (($n = $this->next()) !== null) { } } public function next() {} }",
        "A",
    );
    assert_has(&js, "__public.f = function () {\n                var n;\n                var x = 1;\n                x = 2;");
    assert_has(&js, "while (!__identical(n = __public.next(), null)) {}");
}

#[test]
fn test_reserved_names_are_mangled() {
    let js = class_js(
        "<?php class A { public function f($function) { $__x = $function; $root = 1; } }",
        "A",
    );
    assert_has(&js, "function (function$) {");
    assert_has(&js, "var __x$ = function$;");
    assert_has(&js, "var root$ = 1;");
}

#[test]
fn test_operators() {
    let js = class_js(
        "<?php class A { public function f($a, $b) {
            $c = $a . $b;
            $d = $a ** 2;
            $e = ($a xor $b);
            $g = $a ?: $b;
            $h = (int) $a;
            return isset($a, $b) && $a !== $b;
        } }",
        "A",
    );
    assert_has(&js, "var c = a.concat(b);");
    assert_has(&js, "var d = Math.pow(a, 2);");
    assert_has(&js, "var e = !a !== !b;");
    assert_has(&js, "var g = a || b;");
    assert_has(&js, "var h = __intval(a);");
    assert_has(&js, "return (__isset(a) && __isset(b)) && !__identical(a, b);");
}

#[test]
fn test_instanceof_and_class_names() {
    let js = class_js(
        "<?php namespace App; class A { public function f($x) { return $x instanceof Other ? self::class : \\JS\\Math::PI; } }",
        "App\\A",
    );
    assert_has(&js, "root.App.A = (function (parent) {");
    assert_has(&js, "return __instanceOf(x, \"App\\\\Other\") ? \"App\\\\A\" : Math.PI;");
}

#[test]
fn test_class_constants() {
    let js = class_js(
        "<?php interface I { const BASE = 10; } class A implements I { const X = 1; const Y = self::X + self::BASE; } class B { public function f() { return A::Y; } }",
        "A",
    );
    assert_has(&js, "var constants = __copy(parent.__constants, root.I.__constants);");
    assert_has(&js, "constants.X = 1;");
    assert_has(&js, "constants.Y = constants.X + constants.BASE;");
    assert_has(
        &js,
        "return ((name === \"A\") || __parent.__instanceOf(name)) || (name === \"I\");",
    );

    let (file, registry) = prepare(
        "<?php interface I { const BASE = 10; } class A implements I { const X = 1; const Y = self::X + self::BASE; } class B { public function f() { return A::Y; } }",
    );
    let b = print(&compile_class(file.classes()[1], &registry).unwrap()).unwrap();
    assert_has(&b, "return root.A.__constants.Y;");
}

#[test]
fn test_unknown_constants_are_reported() {
    let err = try_class_js("<?php class A { public function f() { return self::NOPE; } }", "A").unwrap_err();
    assert!(err.is(ErrorKind::UnknownIdentifier));
    assert!(err.line > 0);
    let err = try_class_js("<?php class A { public function f() { return UNDEFINED_THING; } }", "A").unwrap_err();
    assert!(err.is(ErrorKind::UnknownIdentifier));
}

#[test]
fn test_catch_clauses_dispatch_on_type() {
    let js = class_js(
        "<?php class A { public function f() {
            try { $this->g(); }
            catch (\\LogicException | \\RuntimeException $e) { return 1; }
            catch (\\Exception $e) { return $e; }
            finally { $this->g(); }
        } public function g() {} }",
        "A",
    );
    assert_has(&js, "catch (__exception) {");
    assert_has(
        &js,
        "if (__instanceOf(__exception, \"LogicException\") || __instanceOf(__exception, \"RuntimeException\")) {",
    );
    assert_has(&js, "} else if (__instanceOf(__exception, \"Exception\")) {");
    assert_has(&js, "var e = __exception;");
    assert_has(&js, "} else {\n                        throw __exception;\n                    }");
    assert_has(&js, "} finally {");
}

#[test]
fn test_parameters_defaults_and_variadics() {
    let js = class_js(
        "<?php class A { public function f($a, $b = 2, ...$rest) { return $rest; } }",
        "A",
    );
    assert_has(&js, "__public.f = function (a, b) {");
    assert_has(&js, "if (b === undefined) {\n                    b = 2;\n                }");
    assert_has(
        &js,
        "var rest = __toPhpArray(Array.prototype.slice.call(arguments, 2));",
    );
}

#[test]
fn test_native_names_map_to_globals() {
    let js = class_js(
        "<?php class A { public function f() { $d = new \\JS\\Date(); \\JS\\console->log(\\JS\\parseInt('4')); return $d instanceof \\JS\\Date; } }",
        "A",
    );
    assert_has(&js, "var d = new Date();");
    assert_has(&js, "console.log(parseInt(\"4\"));");
    assert_has(&js, "return d instanceof Date;");
}

#[test]
fn test_prelude_functions_are_called_by_name() {
    let js = class_js(
        "<?php class A { public function f($x) { var_dump($x); print_r($x, true); return strlen($x); } }",
        "A",
    );
    assert_has(&js, "var_dump(x);");
    assert_has(&js, "print_r(x, true);");
    assert!(!js.contains("strlen("));

    let err = try_class_js("<?php class A { public function f() { nothing_here(); } }", "A").unwrap_err();
    assert!(err.is(ErrorKind::UnknownIdentifier));
    assert!(err.message.contains("nothing_here()"));
}

#[test]
fn test_new_requires_a_known_class() {
    let js = class_js(
        "<?php class P {} class A { public function f() { return new P(1); } }",
        "A",
    );
    assert_has(&js, "return root.P.__construct(1);");
    let err = try_class_js(
        "<?php interface I {} class A { public function f() { return new I(); } }",
        "A",
    )
    .unwrap_err();
    assert!(err.is(ErrorKind::UnknownIdentifier));
    assert!(err.message.contains("interface"));
}

#[test]
fn test_magic_methods_are_rejected() {
    let err = try_class_js("<?php class A { public function __toString() { return ''; } }", "A").unwrap_err();
    assert!(err.is(ErrorKind::Unsupported));
    assert!(err.message.contains("__toString"));
}

#[test]
fn test_abstract_methods_are_rejected() {
    let (file, registry) = prepare_file(
        "<?php abstract class A { abstract protected function f(); public function g() { return $this->f(); } }",
        false,
    );
    let err = compile_class(file.classes()[0], &registry).unwrap_err();
    assert!(err.is(ErrorKind::Unsupported));
    assert!(err.message.contains("A::f()"));
}

#[test]
fn test_interfaces_copy_parent_constants() {
    let (file, registry) = prepare("<?php interface J { const A = 1; } interface I extends J { const B = J::A; }");
    let iface = file.interfaces()[1];
    let out: Vec<String> = compile_interface(iface, &registry)
        .unwrap()
        .iter()
        .map(|n| print(n).unwrap())
        .collect();
    assert_eq!(
        out,
        [
            "root.I = {\n    \"__constants\": __copy(root.J.__constants)\n};",
            "root.I.__constants.B = root.J.__constants.A;",
        ]
    );
}

#[test]
fn test_arrays_compile_to_runtime_calls() {
    let js = class_js(
        "<?php class A { public function f() { $a = ['k' => 1]; $a[] = 2; foreach ($a as $k => $v) { if ($v) { continue; } } return $a['k']; } }",
        "A",
    );
    assert_has(&js, "var a = new PhpArray().setItemAt(\"k\", 1);");
    assert_has(&js, "a.push(2);");
    assert_has(&js, "a.foreach(function (v, k) {");
    assert_has(&js, "return a.getItemAt(\"k\");");
}

#[test]
fn test_mangle() {
    assert_eq!(mangle("value"), "value");
    assert_eq!(mangle("new"), "new$");
    assert_eq!(mangle("__x"), "__x$");
    assert_eq!(mangle("constants"), "constants$");
}
