//! Renders target nodes to JavaScript source text.
//!
//! Printing is a paramorphism: every layer gets the already-printed children and
//! the original node, which decides parenthesization and member-access form.

use crate::js_ast::{try_para, JsNode, JsNodeF};
use crate::validate::{CompilerError, CompilerResult};

const INDENT: &str = "    ";

/// Node kinds that must be parenthesized when they appear as an operand.
const COMPOUND: &[&str] = &["BinaryOp", "TernaryOp", "Assign", "Function", "Object"];

pub fn print(node: &JsNode) -> CompilerResult<String> {
    try_para(node, &mut print_layer)
}

fn indent(text: &str) -> String {
    text.replace('\n', &format!("\n{}", INDENT))
}

fn wrap_if(original: &JsNode, printed: String, tags: &[&str]) -> String {
    if tags.contains(&original.tag()) {
        format!("({})", printed)
    } else {
        printed
    }
}

fn quote(value: &str) -> CompilerResult<String> {
    serde_json::to_string(value)
        .map_err(|e| CompilerError::internal(format!("cannot encode string literal: {}", e)))
}

fn print_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn print_block(stmts: Vec<String>) -> String {
    let body: Vec<String> = stmts.into_iter().filter(|s| !s.is_empty()).collect();
    if body.is_empty() {
        "{}".to_string()
    } else {
        format!("{{\n{}{}\n}}", INDENT, indent(&body.join("\n")))
    }
}

fn expect_block(owner: &str, original: &JsNode, printed: String) -> CompilerResult<String> {
    match original.kind() {
        JsNodeF::Block(_) => Ok(printed),
        other => Err(CompilerError::internal(format!(
            "malformed {}: body is {}, expected Block",
            owner,
            other.tag()
        ))),
    }
}

fn print_layer(original: &JsNode, layer: JsNodeF<String>) -> CompilerResult<String> {
    let out = match (original.kind(), layer) {
        (_, JsNodeF::Identifier(name)) => name,
        (_, JsNodeF::IntLiteral(value)) => value.to_string(),
        (_, JsNodeF::FloatLiteral(value)) => print_float(value),
        (_, JsNodeF::StringLiteral(value)) => quote(&value)?,
        (_, JsNodeF::Assign { target, value }) => format!("{} = {}", target, value),
        (_, JsNodeF::AssignVar { name, value }) => match value {
            Some(value) => format!("var {} = {};", name, value),
            None => format!("var {};", name),
        },
        (
            JsNodeF::BinaryOp {
                left: l, right: r, ..
            },
            JsNodeF::BinaryOp { op, left, right },
        ) => format!(
            "{} {} {}",
            wrap_if(l, left, COMPOUND),
            op,
            wrap_if(r, right, COMPOUND)
        ),
        (JsNodeF::UnaryOp { operand: o, .. }, JsNodeF::UnaryOp { op, operand }) => {
            let operand = wrap_if(o, operand, &["BinaryOp", "TernaryOp", "Assign", "UnaryOp", "Function", "Object"]);
            if op.chars().all(|c| c.is_ascii_alphabetic()) {
                format!("{} {}", op, operand)
            } else {
                format!("{}{}", op, operand)
            }
        }
        (
            JsNodeF::TernaryOp {
                cond: c,
                then: t,
                otherwise: o,
            },
            JsNodeF::TernaryOp {
                cond,
                then,
                otherwise,
            },
        ) => {
            let nested = &["TernaryOp", "Assign", "Function", "Object"];
            format!(
                "{} ? {} : {}",
                wrap_if(c, cond, nested),
                wrap_if(t, then, nested),
                wrap_if(o, otherwise, nested)
            )
        }
        (
            JsNodeF::PropertyOf {
                object: o,
                property: p,
            },
            JsNodeF::PropertyOf { object, property },
        ) => {
            let object = wrap_if(
                o,
                object,
                &[
                    "BinaryOp", "UnaryOp", "TernaryOp", "Assign", "Function", "Object",
                    "IntLiteral", "FloatLiteral",
                ],
            );
            if p.is_identifier() {
                format!("{}.{}", object, property)
            } else {
                format!("{}[{}]", object, property)
            }
        }
        (JsNodeF::Call { callee: c, .. }, JsNodeF::Call { callee, args }) => format!(
            "{}({})",
            wrap_if(
                c,
                callee,
                &["Function", "BinaryOp", "UnaryOp", "TernaryOp", "Assign", "Object", "New"]
            ),
            args.join(", ")
        ),
        (JsNodeF::New { class: c, .. }, JsNodeF::New { class, args }) => format!(
            "new {}({})",
            wrap_if(
                c,
                class,
                &["Call", "Function", "BinaryOp", "UnaryOp", "TernaryOp", "Assign"]
            ),
            args.join(", ")
        ),
        (JsNodeF::Function { body: b, .. }, JsNodeF::Function { params, body }) => format!(
            "function ({}) {}",
            params.join(", "),
            expect_block("Function", b, body)?
        ),
        (_, JsNodeF::Block(stmts)) => print_block(stmts),
        (JsNodeF::Statement(e), JsNodeF::Statement(expr)) => {
            format!("{};", wrap_if(e, expr, &["Function", "Object"]))
        }
        (_, JsNodeF::Object(fields)) => {
            if fields.is_empty() {
                "{}".to_string()
            } else {
                let mut entries = Vec::with_capacity(fields.len());
                for (key, value) in fields {
                    entries.push(format!("{}: {}", quote(&key)?, value));
                }
                format!("{{\n{}{}\n}}", INDENT, indent(&entries.join(",\n")))
            }
        }
        (_, JsNodeF::Return(value)) => match value {
            Some(value) => format!("return {};", value),
            None => "return;".to_string(),
        },
        (
            JsNodeF::If {
                then: t,
                otherwise: o,
                ..
            },
            JsNodeF::If {
                cond,
                then,
                otherwise,
            },
        ) => {
            let mut out = format!("if ({}) {}", cond, expect_block("If", t, then)?);
            if let (Some(branch), Some(printed)) = (o, otherwise) {
                match branch.kind() {
                    JsNodeF::Block(_) | JsNodeF::If { .. } => {
                        out.push_str(" else ");
                        out.push_str(&printed);
                    }
                    other => {
                        return Err(CompilerError::internal(format!(
                            "malformed If: else branch is {}",
                            other.tag()
                        )))
                    }
                }
            }
            out
        }
        (JsNodeF::While { body: b, .. }, JsNodeF::While { cond, body }) => {
            format!("while ({}) {}", cond, expect_block("While", b, body)?)
        }
        (
            JsNodeF::For { body: b, .. },
            JsNodeF::For {
                init,
                cond,
                step,
                body,
            },
        ) => format!(
            "for ({}; {}; {}) {}",
            init.unwrap_or_default(),
            cond.unwrap_or_default(),
            step.unwrap_or_default(),
            expect_block("For", b, body)?
        ),
        (
            JsNodeF::Try { body: b, .. },
            JsNodeF::Try {
                body,
                catch,
                finalizer,
            },
        ) => {
            let mut out = format!("try {}", expect_block("Try", b, body)?);
            if let Some((binding, handler)) = catch {
                out.push_str(&format!(" catch ({}) {}", binding, handler));
            }
            if let Some(finalizer) = finalizer {
                out.push_str(&format!(" finally {}", finalizer));
            }
            out
        }
        (_, JsNodeF::Throw(value)) => format!("throw {};", value),
        (_, JsNodeF::Break) => "break;".to_string(),
        (_, JsNodeF::Continue) => "continue;".to_string(),
        (_, JsNodeF::Nop) => String::new(),
        (orig, layer) => {
            return Err(CompilerError::internal(format!(
                "unknown node kind: {} printed as {}",
                orig.tag(),
                layer.tag()
            )))
        }
    };
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::js_builder::*;

    fn p(node: JsNode) -> String {
        print(&node).unwrap()
    }

    #[test]
    fn bracket_and_dot_access() {
        assert_eq!(p(property_of(id("foo").unwrap(), vec![string("bar")]).unwrap()), "foo[\"bar\"]");
        assert_eq!(p(property_of(id("foo").unwrap(), vec![id("bar").unwrap()]).unwrap()), "foo.bar");
        assert_eq!(p(path(&["root", "App", "Model"]).unwrap()), "root.App.Model");
    }

    #[test]
    fn chained_concat_calls() {
        let foo_bar = method_call(string("foo"), "concat", vec![string("bar")]).unwrap();
        let all = method_call(foo_bar, "concat", vec![string("baz")]).unwrap();
        assert_eq!(p(all), "\"foo\".concat(\"bar\").concat(\"baz\")");
    }

    #[test]
    fn empty_function_prints_inline() {
        assert_eq!(p(function_(vec![], vec![]).unwrap()), "function () {}");
    }

    #[test]
    fn immediately_invoked_function_is_wrapped() {
        let func = function_(
            vec![id("parent").unwrap()],
            vec![return_(Some(id("parent").unwrap())).unwrap()],
        )
        .unwrap();
        let iife = call(func, vec![id("base").unwrap()]).unwrap();
        assert_eq!(
            p(iife),
            "(function (parent) {\n    return parent;\n})(base)"
        );
    }

    #[test]
    fn nested_blocks_are_reindented() {
        let inner = if_(
            id("a").unwrap(),
            vec![statement(call(id("f").unwrap(), vec![]).unwrap()).unwrap()],
            None,
        )
        .unwrap();
        let func = function_(vec![], vec![inner]).unwrap();
        assert_eq!(p(func), "function () {\n    if (a) {\n        f();\n    }\n}");
    }

    #[test]
    fn objects_keep_insertion_order() {
        let obj = object(vec![
            ("b".to_string(), int(1)),
            ("a".to_string(), string("x")),
        ])
        .unwrap();
        assert_eq!(p(obj), "{\n    \"b\": 1,\n    \"a\": \"x\"\n}");
        assert_eq!(p(object(vec![]).unwrap()), "{}");
    }

    #[test]
    fn binary_operands_are_parenthesized() {
        let sum = binary("+", id("a").unwrap(), id("b").unwrap()).unwrap();
        let product = binary("*", sum, id("c").unwrap()).unwrap();
        assert_eq!(p(product), "(a + b) * c");
        let negated = not(binary("===", id("a").unwrap(), null()).unwrap()).unwrap();
        assert_eq!(p(negated), "!(a === null)");
    }

    #[test]
    fn else_if_chains() {
        let inner = if_(id("b").unwrap(), vec![break_()], Some(block(vec![continue_()]).unwrap())).unwrap();
        let outer = if_(id("a").unwrap(), vec![], Some(inner)).unwrap();
        assert_eq!(
            p(outer),
            "if (a) {} else if (b) {\n    break;\n} else {\n    continue;\n}"
        );
    }

    #[test]
    fn statements_and_declarations() {
        let decl = assign_var("x", Some(float(1.0))).unwrap();
        assert_eq!(p(decl), "var x = 1.0;");
        let obj_stmt = statement(object(vec![]).unwrap()).unwrap();
        assert_eq!(p(obj_stmt), "({});");
        let t = try_(
            vec![throw_(new_(id("Error").unwrap(), vec![string("x")]).unwrap()).unwrap()],
            Some(("e", vec![])),
            None,
        )
        .unwrap();
        assert_eq!(p(t), "try {\n    throw new Error(\"x\");\n} catch (e) {}");
    }

    #[test]
    fn strings_are_escaped() {
        assert_eq!(p(string("a\"b\n")), "\"a\\\"b\\n\"");
    }
}
