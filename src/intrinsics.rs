//! Builtin PHP functions and constants with a direct JavaScript translation.
//!
//! Intrinsics are resolved by lowercase global name. They are dependencies
//! provided by the runtime, so the locator reports them as internal and never
//! looks for a file.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::ast::CastKind;
use crate::js_ast::JsNode;
use crate::js_builder::*;
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

type Lowering = fn(Vec<JsNode>) -> CompilerResult<JsNode>;

struct Intrinsic {
    min_args: usize,
    max_args: usize,
    lower: Lowering,
}

fn exactly(n: usize, lower: Lowering) -> Intrinsic {
    Intrinsic {
        min_args: n,
        max_args: n,
        lower,
    }
}

fn between(min_args: usize, max_args: usize, lower: Lowering) -> Intrinsic {
    Intrinsic {
        min_args,
        max_args,
        lower,
    }
}

fn runtime(helper: &str, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    call(id(helper)?, args)
}

fn is_type(ty: &str, mut args: Vec<JsNode>) -> CompilerResult<JsNode> {
    args.push(string(ty));
    runtime("__isType", args)
}

fn on_first(method: &str, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    let mut args = args.into_iter();
    let receiver = args
        .next()
        .ok_or_else(|| CompilerError::internal("intrinsic called without a receiver"))?;
    method_call(receiver, method, args.collect())
}

fn length_of(args: Vec<JsNode>) -> CompilerResult<JsNode> {
    let receiver = args
        .into_iter()
        .next()
        .ok_or_else(|| CompilerError::internal("strlen called without an argument"))?;
    member(receiver, "length")
}

fn math(function: &str, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    call(path(&["Math", function])?, args)
}

/// `f(a, b)` becomes `b.method(a)`.
fn on_second(method: &str, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    let mut args = args.into_iter();
    match (args.next(), args.next()) {
        (Some(first), Some(second)) => method_call(second, method, vec![first]),
        _ => Err(CompilerError::internal("intrinsic needs two arguments")),
    }
}

lazy_static! {
    static ref FUNCTIONS: HashMap<&'static str, Intrinsic> = {
        let mut m: HashMap<&'static str, Intrinsic> = HashMap::new();
        // Type checks
        m.insert("is_string", exactly(1, |a| is_type("string", a)));
        m.insert("is_int", exactly(1, |a| is_type("int", a)));
        m.insert("is_integer", exactly(1, |a| is_type("int", a)));
        m.insert("is_float", exactly(1, |a| is_type("float", a)));
        m.insert("is_bool", exactly(1, |a| is_type("bool", a)));
        m.insert("is_array", exactly(1, |a| is_type("array", a)));
        m.insert("is_object", exactly(1, |a| is_type("object", a)));
        m.insert("is_numeric", exactly(1, |a| is_type("numeric", a)));
        m.insert("is_callable", exactly(1, |a| is_type("callable", a)));
        m.insert("is_null", exactly(1, |mut a| binary("===", a.remove(0), null())));
        m.insert("gettype", exactly(1, |a| runtime("__gettype", a)));
        m.insert("empty", exactly(1, |a| runtime("__empty", a)));
        // Conversions
        m.insert("intval", exactly(1, |a| runtime("__intval", a)));
        m.insert("floatval", exactly(1, |a| runtime("__floatval", a)));
        m.insert("strval", exactly(1, |a| runtime("__strval", a)));
        m.insert("boolval", exactly(1, |a| runtime("__boolval", a)));
        // Strings
        m.insert("strlen", exactly(1, length_of));
        m.insert("strtoupper", exactly(1, |a| on_first("toUpperCase", a)));
        m.insert("strtolower", exactly(1, |a| on_first("toLowerCase", a)));
        m.insert("trim", exactly(1, |a| on_first("trim", a)));
        m.insert("ltrim", exactly(1, |a| on_first("trimStart", a)));
        m.insert("rtrim", exactly(1, |a| on_first("trimEnd", a)));
        m.insert("str_repeat", exactly(2, |a| on_first("repeat", a)));
        m.insert("substr", between(2, 3, |a| on_first("substr", a)));
        m.insert("strpos", exactly(2, |a| runtime("__strpos", a)));
        m.insert("str_contains", exactly(2, |a| on_first("includes", a)));
        m.insert("str_starts_with", exactly(2, |a| on_first("startsWith", a)));
        m.insert("str_ends_with", exactly(2, |a| on_first("endsWith", a)));
        m.insert("str_replace", exactly(3, |a| {
            let mut a = a.into_iter();
            match (a.next(), a.next(), a.next()) {
                (Some(search), Some(replace), Some(subject)) => {
                    let parts = method_call(subject, "split", vec![search])?;
                    method_call(parts, "join", vec![replace])
                }
                _ => Err(CompilerError::internal("str_replace needs three arguments")),
            }
        }));
        m.insert("explode", exactly(2, |a| {
            let parts = on_second("split", a)?;
            runtime("__toPhpArray", vec![parts])
        }));
        m.insert("implode", exactly(2, |a| on_second("join", a)));
        // Arrays
        m.insert("count", exactly(1, |a| on_first("count", a)));
        m.insert("in_array", exactly(2, |a| on_second("contains", a)));
        m.insert("array_key_exists", exactly(2, |a| on_second("hasItemAt", a)));
        m.insert("array_keys", exactly(1, |a| on_first("keys", a)));
        m.insert("array_values", exactly(1, |a| on_first("values", a)));
        m.insert("array_push", between(2, usize::MAX, |a| on_first("push", a)));
        // Math
        m.insert("abs", exactly(1, |a| math("abs", a)));
        m.insert("floor", exactly(1, |a| math("floor", a)));
        m.insert("ceil", exactly(1, |a| math("ceil", a)));
        m.insert("round", exactly(1, |a| math("round", a)));
        m.insert("sqrt", exactly(1, |a| math("sqrt", a)));
        m.insert("pow", exactly(2, |a| math("pow", a)));
        m.insert("max", between(1, usize::MAX, |a| math("max", a)));
        m.insert("min", between(1, usize::MAX, |a| math("min", a)));
        m
    };

    static ref CONSTANTS: HashMap<&'static str, fn() -> CompilerResult<JsNode>> = {
        let mut m: HashMap<&'static str, fn() -> CompilerResult<JsNode>> = HashMap::new();
        m.insert("PHP_EOL", || Ok(string("\n")));
        m.insert("PHP_INT_MAX", || Ok(int(9_007_199_254_740_991)));
        m.insert("M_PI", || path(&["Math", "PI"]));
        m
    };
}

pub fn is_intrinsic(name: &str) -> bool {
    FUNCTIONS.contains_key(name.to_ascii_lowercase().as_str()) || CONSTANTS.contains_key(name)
}

/// Lowers a call to a builtin function, or `None` if the name is not one.
pub fn compile_call(name: &str, args: Vec<JsNode>) -> Option<CompilerResult<JsNode>> {
    let lowered = name.to_ascii_lowercase();
    let intrinsic = FUNCTIONS.get(lowered.as_str())?;
    if args.len() < intrinsic.min_args || args.len() > intrinsic.max_args {
        let expected = if intrinsic.min_args == intrinsic.max_args {
            intrinsic.min_args.to_string()
        } else if intrinsic.max_args == usize::MAX {
            format!("at least {}", intrinsic.min_args)
        } else {
            format!("{} to {}", intrinsic.min_args, intrinsic.max_args)
        };
        return Some(Err(CompilerError::new(
            ErrorKind::Unsupported,
            format!(
                "{}() expects {} arguments, {} given",
                lowered,
                expected,
                args.len()
            ),
        )));
    }
    Some((intrinsic.lower)(args))
}

pub fn constant(name: &str) -> Option<CompilerResult<JsNode>> {
    CONSTANTS.get(name).map(|build| build())
}

/// Conversion function applied by a cast.
pub fn cast_function(kind: CastKind) -> &'static str {
    match kind {
        CastKind::Int => "intval",
        CastKind::Float => "floatval",
        CastKind::String => "strval",
        CastKind::Bool => "boolval",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js_printer::print;

    fn lowered(name: &str, args: Vec<JsNode>) -> String {
        print(&compile_call(name, args).unwrap().unwrap()).unwrap()
    }

    fn x() -> JsNode {
        id("x").unwrap()
    }

    #[test]
    fn test_type_checks_go_through_the_runtime() {
        assert_eq!(lowered("is_string", vec![x()]), "__isType(x, \"string\")");
        assert_eq!(lowered("IS_NULL", vec![x()]), "x === null");
    }

    #[test]
    fn test_string_functions_become_methods() {
        assert_eq!(lowered("strlen", vec![x()]), "x.length");
        assert_eq!(lowered("str_repeat", vec![x(), int(3)]), "x.repeat(3)");
        assert_eq!(
            lowered("implode", vec![string(","), x()]),
            "x.join(\",\")"
        );
        assert_eq!(
            lowered("str_replace", vec![string("a"), string("b"), x()]),
            "x.split(\"a\").join(\"b\")"
        );
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(lowered("max", vec![x(), int(1), int(2)]), "Math.max(x, 1, 2)");
    }

    #[test]
    fn test_arity_is_checked() {
        let err = compile_call("strlen", vec![]).unwrap().unwrap_err();
        assert!(err.is(ErrorKind::Unsupported));
        assert!(err.message.contains("expects 1 arguments"));
    }

    #[test]
    fn test_unknown_names_are_not_intrinsics() {
        assert!(compile_call("frobnicate", vec![]).is_none());
        assert!(is_intrinsic("StrLen"));
        assert!(is_intrinsic("PHP_EOL"));
        assert!(!is_intrinsic("php_eol"));
    }

    #[test]
    fn test_casts_use_conversion_functions() {
        let name = cast_function(CastKind::Int);
        assert_eq!(lowered(name, vec![x()]), "__intval(x)");
    }
}
