use super::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn project(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, code) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, code).unwrap();
    }
    dir
}

fn options_for(dir: &TempDir) -> CompileOptions {
    let mut options = CompileOptions::default();
    options
        .source_roots
        .insert("App".to_string(), dir.path().to_path_buf());
    options
}

fn entry(dir: &TempDir) -> PathBuf {
    dir.path().join("Main.php")
}

fn try_compile(files: &[(&str, &str)]) -> CompilerResult<CompiledProgram> {
    let dir = project(files);
    Compiler::new(options_for(&dir)).compile_file(&entry(&dir))
}

fn compile(files: &[(&str, &str)]) -> String {
    try_compile(files).unwrap().js
}

fn assert_has(js: &str, fragment: &str) {
    assert!(js.contains(fragment), "missing `{}` in:\n{}", fragment, js);
}

const HELLO: &str = "<?php
namespace App;

use Phpjs\\ScriptInterface;

class Main implements ScriptInterface
{
    protected $greeting = \"hello\";

    public function __construct()
    {
        $this->greeting = \"hi\";
    }

    public function run()
    {
        return $this->greeting;
    }
}
";

#[test]
fn test_protected_property_goes_through_its_bucket() {
    let js = compile(&[("Main.php", HELLO)]);
    assert_has(&js, "__protected.greeting = \"hello\";");
    assert_has(&js, "__protected.greeting = \"hi\";");
    assert_has(&js, "return __protected.greeting;");
    assert!(!js.contains("var greeting"));
    assert!(js.ends_with("root.App.Main.__construct().run();\n"));
}

#[test]
fn test_program_sections_are_ordered() {
    let program = try_compile(&[("Main.php", HELLO)]).unwrap();
    let js = &program.js;
    let prelude = js.find("function __identical(").unwrap();
    let root = js.find("var root = {").unwrap();
    let iface = js.find("root.Phpjs.ScriptInterface = {").unwrap();
    let class = js.find("root.App.Main = (function (parent) {").unwrap();
    assert!(prelude < root && root < iface && iface < class);
    assert_eq!(program.entry_class, "App\\Main");
    assert_eq!(program.declarations, ["Phpjs\\ScriptInterface", "App\\Main"]);
}

#[test]
fn test_string_concatenation() {
    let js = compile(&[(
        "Main.php",
        "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
            public function run() { $s = \"foo\" . \"bar\" . \"baz\"; return $s; }
        }",
    )]);
    assert_has(&js, "var s = \"foo\".concat(\"bar\").concat(\"baz\");");
}

#[test]
fn test_typed_parameters_are_guarded() {
    let js = compile(&[
        (
            "Main.php",
            "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
                public function run() { $g = new Greeter(); return $g->greet(\"x\"); }
            }",
        ),
        (
            "Greeter.php",
            "<?php namespace App; class Greeter {
                public function greet(string $name) { return \"hi \" . $name; }
            }",
        ),
    ]);
    assert_has(&js, "if (!__isset(name) || !__isType(name, \"string\")) {");
    assert_has(&js, "throw root.TypeError.__construct(");
    assert_has(&js, "root.TypeError = (function (parent) {");
    assert_has(&js, "})(root.Exception);");
    let exception = js.find("root.Exception = (function").unwrap();
    let type_error = js.find("root.TypeError = (function").unwrap();
    assert!(exception < type_error);
}

#[test]
fn test_foreach_over_property() {
    let js = compile(&[(
        "Main.php",
        "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
            protected $items = [1, 2];
            public function run() {
                foreach ($this->items as $item) {
                    $item = $item + 1;
                }
            }
        }",
    )]);
    assert_has(&js, "__protected.items = new PhpArray().push(1).push(2);");
    assert_has(&js, "__protected.items.foreach(function (item) {");
    assert_has(&js, "item = item + 1;");
    assert!(!js.contains("var item"));
}

#[test]
fn test_cyclic_dependencies_are_compiled_once() {
    let js = compile(&[
        (
            "Main.php",
            "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
                public function run() { $a = new A(); return $a->partner(); }
            }",
        ),
        (
            "A.php",
            "<?php namespace App; class A { public function partner() { return new B(); } }",
        ),
        (
            "B.php",
            "<?php namespace App; class B { public function partner() { return new A(); } }",
        ),
    ]);
    assert_eq!(js.matches("root.App.A = (function").count(), 1);
    assert_eq!(js.matches("root.App.B = (function").count(), 1);
}

#[test]
fn test_parents_are_emitted_first() {
    let js = compile(&[
        (
            "Main.php",
            "<?php namespace App; class Main extends Base implements \\Phpjs\\ScriptInterface {}",
        ),
        (
            "Base.php",
            "<?php namespace App; abstract class Base { public function run() { return 1; } }",
        ),
    ]);
    let base = js.find("root.App.Base = (function").unwrap();
    let main = js.find("root.App.Main = (function").unwrap();
    assert!(base < main);
    assert_has(&js, "})(root.App.Base);");
}

#[test]
fn test_script_dependencies_are_constructed() {
    let js = compile(&[(
        "Main.php",
        "<?php
        namespace App;

        use Phpjs\\Api\\Console;
        use Phpjs\\Api\\Document;
        use Phpjs\\ScriptInterface;

        class Main implements ScriptInterface {
            private $console;
            private $document;

            public function __construct(Console $console, Document $document) {
                $this->console = $console;
                $this->document = $document;
            }

            public function run() {
                $this->console->log(\"ready\");
            }
        }",
    )]);
    assert_has(
        &js,
        "root.App.Main.__construct(root.Phpjs.Shim.Console.__construct(), root.Phpjs.Shim.Document.__construct()).run();",
    );
    assert_has(&js, "__private.console.log(\"ready\");");
    assert_has(&js, "root.Phpjs.Shim.Console = (function (parent) {");
    assert_has(&js, "root.Phpjs.Api.Console = {");
    assert_has(&js, "console.log(message);");
}

#[test]
fn test_entry_method_is_configurable() {
    let dir = project(&[(
        "Main.php",
        "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface { public function main() {} }",
    )]);
    let mut options = options_for(&dir);
    options.entry_method = "main".to_string();
    let js = Compiler::new(options).compile_file(&entry(&dir)).unwrap().js;
    assert!(js.ends_with("root.App.Main.__construct().main();\n"));
}

#[test]
fn test_entry_point_cardinality() {
    let err = try_compile(&[("Main.php", "<?php namespace App; class Main { public function run() {} }")])
        .unwrap_err();
    assert!(err.is(ErrorKind::EntryPoint));
    assert!(err.message.contains("no class implements"));

    let err = try_compile(&[(
        "Main.php",
        "<?php namespace App;
        class One implements \\Phpjs\\ScriptInterface { public function run() {} }
        class Two implements \\Phpjs\\ScriptInterface { public function run() {} }",
    )])
    .unwrap_err();
    assert!(err.is(ErrorKind::EntryPoint));
    assert!(err.message.contains("App\\One, App\\Two"));

    let err = try_compile(&[(
        "Main.php",
        "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface { public function start() {} }",
    )])
    .unwrap_err();
    assert!(err.is(ErrorKind::EntryPoint));
    assert!(err.message.contains("run()"));
}

#[test]
fn test_missing_dependency_names_the_requiring_file() {
    let err = try_compile(&[(
        "Main.php",
        "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
            public function run() { return new Missing(); }
        }",
    )])
    .unwrap_err();
    assert!(err.is(ErrorKind::UnknownDependency));
    assert!(err.message.contains("App\\Missing"));
    assert!(err.file.ends_with("Main.php"));
}

#[test]
fn test_file_must_declare_the_dependency() {
    let err = try_compile(&[
        (
            "Main.php",
            "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
                public function run() { return new Helper(); }
            }",
        ),
        ("Helper.php", "<?php namespace App; class Assistant {}"),
    ])
    .unwrap_err();
    assert!(err.is(ErrorKind::UnknownDependency));
    assert!(err.message.contains("does not declare App\\Helper"));
}

#[test]
fn test_duplicate_definitions_are_rejected() {
    let result = try_compile(&[
        (
            "Main.php",
            "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
                public function run() { return new Helper(); }
            }
            class Helper {}",
        ),
        ("Helper.php", "<?php namespace App; class Helper {}"),
    ]);
    // Helper is already known from Main.php, so Helper.php is never read.
    assert!(result.is_ok());

    let err = try_compile(&[
        (
            "Main.php",
            "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
                public function run() { return new Helper(); }
            }",
        ),
        ("Helper.php", "<?php namespace App; class Helper {} class Main {}"),
    ])
    .unwrap_err();
    assert!(err.is(ErrorKind::DuplicateDefinition));
    assert!(err.file.ends_with("Helper.php"));
}

#[test]
fn test_unsupported_constructs_carry_their_location() {
    let err = try_compile(&[(
        "Main.php",
        "<?php namespace App; class Main implements \\Phpjs\\ScriptInterface {
            public function run() {
                $name = 'x';
                return $$name;
            }
        }",
    )])
    .unwrap_err();
    assert!(err.is(ErrorKind::Unsupported));
    assert!(err.file.ends_with("Main.php"));
    assert_eq!(err.line, 4);
}

#[test]
fn test_entry_directory_is_the_default_root() {
    let dir = project(&[
        (
            "Main.php",
            "<?php class Main implements \\Phpjs\\ScriptInterface {
                public function run() { return Helper::NAME; }
            }",
        ),
        ("Helper.php", "<?php class Helper { const NAME = 'helper'; }"),
    ]);
    let js = compile_php(&entry(&dir), CompileOptions::default()).unwrap().js;
    assert_has(&js, "return root.Helper.__constants.NAME;");
    assert_has(&js, "constants.NAME = \"helper\";");
}
