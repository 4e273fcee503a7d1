//! Smart constructors for target nodes.
//!
//! Every constructor checks the shape of its arguments and returns
//! `PJ-ERR-INVALID-ARGUMENT` instead of building a malformed node.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::js_ast::{JsNode, JsNodeF};
use crate::validate::{CompilerError, CompilerResult};

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
    static ref BINARY_OPERATORS: HashSet<&'static str> = [
        "+", "-", "*", "/", "%", "&&", "||", "&", "|", "^", "<<", ">>", "==", "!=", "===", "!==",
        "<", "<=", ">", ">=", "instanceof", "in", ",",
    ]
    .into_iter()
    .collect();
    static ref UNARY_OPERATORS: HashSet<&'static str> =
        ["!", "-", "+", "~", "typeof", "void"].into_iter().collect();
}

pub fn is_identifier_name(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

fn node(kind: JsNodeF<JsNode>) -> JsNode {
    JsNode::new(kind)
}

fn expect_expression(what: &str, value: &JsNode) -> CompilerResult<()> {
    if value.is_statement() {
        return Err(CompilerError::invalid_argument(format!(
            "{} must be an expression, got {}",
            what,
            value.tag()
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEAVES
// ═══════════════════════════════════════════════════════════════════════════════

pub fn id(name: &str) -> CompilerResult<JsNode> {
    if !is_identifier_name(name) {
        return Err(CompilerError::invalid_argument(format!(
            "'{}' is not a valid identifier",
            name
        )));
    }
    Ok(node(JsNodeF::Identifier(name.to_string())))
}

pub fn int(value: i64) -> JsNode {
    node(JsNodeF::IntLiteral(value))
}

pub fn float(value: f64) -> JsNode {
    node(JsNodeF::FloatLiteral(value))
}

pub fn string(value: &str) -> JsNode {
    node(JsNodeF::StringLiteral(value.to_string()))
}

pub fn null() -> JsNode {
    node(JsNodeF::Identifier("null".to_string()))
}

pub fn undefined() -> JsNode {
    node(JsNodeF::Identifier("undefined".to_string()))
}

pub fn boolean(value: bool) -> JsNode {
    node(JsNodeF::Identifier(if value { "true" } else { "false" }.to_string()))
}

pub fn nop() -> JsNode {
    node(JsNodeF::Nop)
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn assign(target: JsNode, value: JsNode) -> CompilerResult<JsNode> {
    if !matches!(
        target.kind(),
        JsNodeF::Identifier(_) | JsNodeF::PropertyOf { .. }
    ) {
        return Err(CompilerError::invalid_argument(format!(
            "cannot assign to {}",
            target.tag()
        )));
    }
    expect_expression("assigned value", &value)?;
    Ok(node(JsNodeF::Assign { target, value }))
}

pub fn assign_var(name: &str, value: Option<JsNode>) -> CompilerResult<JsNode> {
    if !is_identifier_name(name) {
        return Err(CompilerError::invalid_argument(format!(
            "'{}' is not a valid variable name",
            name
        )));
    }
    if let Some(value) = &value {
        expect_expression("initializer", value)?;
    }
    Ok(node(JsNodeF::AssignVar {
        name: name.to_string(),
        value,
    }))
}

pub fn binary(op: &str, left: JsNode, right: JsNode) -> CompilerResult<JsNode> {
    if !BINARY_OPERATORS.contains(op) {
        return Err(CompilerError::invalid_argument(format!(
            "unknown binary operator '{}'",
            op
        )));
    }
    expect_expression("left operand", &left)?;
    expect_expression("right operand", &right)?;
    Ok(node(JsNodeF::BinaryOp {
        op: op.to_string(),
        left,
        right,
    }))
}

/// Left-folds `operands` pairwise with `op`: `(a op b) op c`.
pub fn chain(op: &str, operands: Vec<JsNode>) -> CompilerResult<JsNode> {
    let mut iter = operands.into_iter();
    let first = iter.next().ok_or_else(|| {
        CompilerError::invalid_argument(format!("'{}' needs at least one operand", op))
    })?;
    iter.try_fold(first, |acc, next| binary(op, acc, next))
}

pub fn or_(operands: Vec<JsNode>) -> CompilerResult<JsNode> {
    chain("||", operands)
}

pub fn and_(operands: Vec<JsNode>) -> CompilerResult<JsNode> {
    chain("&&", operands)
}

pub fn unary(op: &str, operand: JsNode) -> CompilerResult<JsNode> {
    if !UNARY_OPERATORS.contains(op) {
        return Err(CompilerError::invalid_argument(format!(
            "unknown unary operator '{}'",
            op
        )));
    }
    expect_expression("operand", &operand)?;
    Ok(node(JsNodeF::UnaryOp {
        op: op.to_string(),
        operand,
    }))
}

pub fn not(operand: JsNode) -> CompilerResult<JsNode> {
    unary("!", operand)
}

pub fn ternary(cond: JsNode, then: JsNode, otherwise: JsNode) -> CompilerResult<JsNode> {
    expect_expression("condition", &cond)?;
    expect_expression("consequent", &then)?;
    expect_expression("alternate", &otherwise)?;
    Ok(node(JsNodeF::TernaryOp {
        cond,
        then,
        otherwise,
    }))
}

/// `object.p1.p2...`, nesting to the left so `a.b.c` is `(a.b).c`.
pub fn property_of(object: JsNode, properties: Vec<JsNode>) -> CompilerResult<JsNode> {
    if properties.is_empty() {
        return Err(CompilerError::invalid_argument(
            "property access needs at least one property",
        ));
    }
    expect_expression("object", &object)?;
    let mut acc = object;
    for property in properties {
        expect_expression("property", &property)?;
        acc = node(JsNodeF::PropertyOf {
            object: acc,
            property,
        });
    }
    Ok(acc)
}

/// Named member access; falls back to bracket form for non-identifier names.
pub fn member(object: JsNode, name: &str) -> CompilerResult<JsNode> {
    let property = if is_identifier_name(name) {
        id(name)?
    } else {
        string(name)
    };
    property_of(object, vec![property])
}

/// Dotted path such as `root.App.Model`.
pub fn path(segments: &[&str]) -> CompilerResult<JsNode> {
    let (first, rest) = segments
        .split_first()
        .ok_or_else(|| CompilerError::invalid_argument("empty member path"))?;
    let mut acc = id(first)?;
    for segment in rest {
        acc = member(acc, segment)?;
    }
    Ok(acc)
}

pub fn call(callee: JsNode, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    expect_expression("callee", &callee)?;
    for arg in &args {
        expect_expression("argument", arg)?;
    }
    Ok(node(JsNodeF::Call { callee, args }))
}

pub fn method_call(object: JsNode, name: &str, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    call(member(object, name)?, args)
}

pub fn new_(class: JsNode, args: Vec<JsNode>) -> CompilerResult<JsNode> {
    expect_expression("constructor", &class)?;
    for arg in &args {
        expect_expression("argument", arg)?;
    }
    Ok(node(JsNodeF::New { class, args }))
}

pub fn function_(params: Vec<JsNode>, body: Vec<JsNode>) -> CompilerResult<JsNode> {
    if let Some(bad) = params.iter().find(|p| !p.is_identifier()) {
        return Err(CompilerError::invalid_argument(format!(
            "function parameters must be identifiers, got {}",
            bad.tag()
        )));
    }
    Ok(node(JsNodeF::Function {
        params,
        body: block(body)?,
    }))
}

pub fn object(fields: Vec<(String, JsNode)>) -> CompilerResult<JsNode> {
    let mut seen = HashSet::new();
    for (key, value) in &fields {
        if !seen.insert(key.as_str()) {
            return Err(CompilerError::invalid_argument(format!(
                "duplicate object key '{}'",
                key
            )));
        }
        expect_expression("object field", value)?;
    }
    Ok(node(JsNodeF::Object(fields)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

pub fn block(stmts: Vec<JsNode>) -> CompilerResult<JsNode> {
    if let Some(bad) = stmts.iter().find(|s| !s.is_statement()) {
        return Err(CompilerError::invalid_argument(format!(
            "block entries must be statements, got {}",
            bad.tag()
        )));
    }
    Ok(node(JsNodeF::Block(stmts)))
}

pub fn statement(expr: JsNode) -> CompilerResult<JsNode> {
    expect_expression("statement expression", &expr)?;
    Ok(node(JsNodeF::Statement(expr)))
}

pub fn return_(value: Option<JsNode>) -> CompilerResult<JsNode> {
    if let Some(value) = &value {
        expect_expression("return value", value)?;
    }
    Ok(node(JsNodeF::Return(value)))
}

/// `otherwise` may be a block or another `if` (else-if chain).
pub fn if_(cond: JsNode, then: Vec<JsNode>, otherwise: Option<JsNode>) -> CompilerResult<JsNode> {
    expect_expression("condition", &cond)?;
    if let Some(other) = &otherwise {
        if !matches!(other.kind(), JsNodeF::Block(_) | JsNodeF::If { .. }) {
            return Err(CompilerError::invalid_argument(format!(
                "else branch must be a block or if, got {}",
                other.tag()
            )));
        }
    }
    Ok(node(JsNodeF::If {
        cond,
        then: block(then)?,
        otherwise,
    }))
}

pub fn while_(cond: JsNode, body: Vec<JsNode>) -> CompilerResult<JsNode> {
    expect_expression("condition", &cond)?;
    Ok(node(JsNodeF::While {
        cond,
        body: block(body)?,
    }))
}

pub fn for_(
    init: Option<JsNode>,
    cond: Option<JsNode>,
    step: Option<JsNode>,
    body: Vec<JsNode>,
) -> CompilerResult<JsNode> {
    for part in init.iter().chain(cond.iter()).chain(step.iter()) {
        expect_expression("loop header", part)?;
    }
    Ok(node(JsNodeF::For {
        init,
        cond,
        step,
        body: block(body)?,
    }))
}

pub fn try_(
    body: Vec<JsNode>,
    catch: Option<(&str, Vec<JsNode>)>,
    finalizer: Option<Vec<JsNode>>,
) -> CompilerResult<JsNode> {
    if catch.is_none() && finalizer.is_none() {
        return Err(CompilerError::invalid_argument(
            "try needs a catch clause or a finalizer",
        ));
    }
    let catch = match catch {
        Some((binding, handler)) => {
            if !is_identifier_name(binding) {
                return Err(CompilerError::invalid_argument(format!(
                    "'{}' is not a valid catch binding",
                    binding
                )));
            }
            Some((binding.to_string(), block(handler)?))
        }
        None => None,
    };
    Ok(node(JsNodeF::Try {
        body: block(body)?,
        catch,
        finalizer: finalizer.map(block).transpose()?,
    }))
}

pub fn throw_(value: JsNode) -> CompilerResult<JsNode> {
    expect_expression("thrown value", &value)?;
    Ok(node(JsNodeF::Throw(value)))
}

pub fn break_() -> JsNode {
    node(JsNodeF::Break)
}

pub fn continue_() -> JsNode {
    node(JsNodeF::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::ErrorKind;

    #[test]
    fn function_rejects_non_identifier_params() {
        let err = function_(vec![string("x")], vec![]).unwrap_err();
        assert!(err.is(ErrorKind::InvalidArgument));
    }

    #[test]
    fn chains_fold_left() {
        let a = id("a").unwrap();
        let b = id("b").unwrap();
        let c = id("c").unwrap();
        let folded = or_(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        let expected = binary("||", binary("||", a, b).unwrap(), c).unwrap();
        assert_eq!(folded, expected);
    }

    #[test]
    fn single_operand_chain_is_identity() {
        let a = id("a").unwrap();
        assert_eq!(and_(vec![a.clone()]).unwrap(), a);
    }

    #[test]
    fn empty_chain_is_rejected() {
        assert!(or_(vec![]).unwrap_err().is(ErrorKind::InvalidArgument));
    }

    #[test]
    fn property_of_nests_left() {
        let nested = property_of(id("a").unwrap(), vec![id("b").unwrap(), id("c").unwrap()]).unwrap();
        match nested.kind() {
            JsNodeF::PropertyOf { object, property } => {
                assert!(matches!(object.kind(), JsNodeF::PropertyOf { .. }));
                assert_eq!(property, &id("c").unwrap());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(property_of(id("a").unwrap(), vec![]).is_err());
    }

    #[test]
    fn rejects_invalid_identifiers_and_targets() {
        assert!(id("not valid").is_err());
        assert!(assign(int(1), int(2)).is_err());
        assert!(statement(return_(None).unwrap()).is_err());
        assert!(block(vec![id("x").unwrap()]).is_err());
        assert!(try_(vec![], None, None).is_err());
    }
}
