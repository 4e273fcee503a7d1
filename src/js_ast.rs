//! Target (JavaScript) AST.
//!
//! The node shape is a functor `JsNodeF<T>` over its children. `JsNode` ties the
//! knot; [`fold`] and [`para`] are the recursion schemes every consumer uses, so
//! no code outside this module recurses over target nodes by hand.

use std::convert::Infallible;

#[derive(Debug, Clone, PartialEq)]
pub enum JsNodeF<T> {
    Identifier(String),
    IntLiteral(i64),
    FloatLiteral(f64),
    StringLiteral(String),
    Assign {
        target: T,
        value: T,
    },
    /// Declaring assignment (`var name = value;`).
    AssignVar {
        name: String,
        value: Option<T>,
    },
    BinaryOp {
        op: String,
        left: T,
        right: T,
    },
    UnaryOp {
        op: String,
        operand: T,
    },
    TernaryOp {
        cond: T,
        then: T,
        otherwise: T,
    },
    PropertyOf {
        object: T,
        property: T,
    },
    Call {
        callee: T,
        args: Vec<T>,
    },
    New {
        class: T,
        args: Vec<T>,
    },
    Function {
        params: Vec<T>,
        body: T,
    },
    Block(Vec<T>),
    Statement(T),
    Object(Vec<(String, T)>),
    Return(Option<T>),
    If {
        cond: T,
        then: T,
        otherwise: Option<T>,
    },
    While {
        cond: T,
        body: T,
    },
    For {
        init: Option<T>,
        cond: Option<T>,
        step: Option<T>,
        body: T,
    },
    Try {
        body: T,
        catch: Option<(String, T)>,
        finalizer: Option<T>,
    },
    Throw(T),
    Break,
    Continue,
    Nop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JsNode(pub Box<JsNodeF<JsNode>>);

impl JsNode {
    pub fn new(node: JsNodeF<JsNode>) -> Self {
        JsNode(Box::new(node))
    }

    pub fn kind(&self) -> &JsNodeF<JsNode> {
        &self.0
    }

    pub fn into_kind(self) -> JsNodeF<JsNode> {
        *self.0
    }

    pub fn tag(&self) -> &'static str {
        self.0.tag()
    }

    pub fn is_identifier(&self) -> bool {
        matches!(*self.0, JsNodeF::Identifier(_))
    }

    /// True for nodes that only make sense in statement position.
    pub fn is_statement(&self) -> bool {
        matches!(
            *self.0,
            JsNodeF::Block(_)
                | JsNodeF::Statement(_)
                | JsNodeF::AssignVar { .. }
                | JsNodeF::Return(_)
                | JsNodeF::If { .. }
                | JsNodeF::While { .. }
                | JsNodeF::For { .. }
                | JsNodeF::Try { .. }
                | JsNodeF::Throw(_)
                | JsNodeF::Break
                | JsNodeF::Continue
                | JsNodeF::Nop
        )
    }
}

impl<T> JsNodeF<T> {
    pub fn tag(&self) -> &'static str {
        match self {
            JsNodeF::Identifier(_) => "Identifier",
            JsNodeF::IntLiteral(_) => "IntLiteral",
            JsNodeF::FloatLiteral(_) => "FloatLiteral",
            JsNodeF::StringLiteral(_) => "StringLiteral",
            JsNodeF::Assign { .. } => "Assign",
            JsNodeF::AssignVar { .. } => "AssignVar",
            JsNodeF::BinaryOp { .. } => "BinaryOp",
            JsNodeF::UnaryOp { .. } => "UnaryOp",
            JsNodeF::TernaryOp { .. } => "TernaryOp",
            JsNodeF::PropertyOf { .. } => "PropertyOf",
            JsNodeF::Call { .. } => "Call",
            JsNodeF::New { .. } => "New",
            JsNodeF::Function { .. } => "Function",
            JsNodeF::Block(_) => "Block",
            JsNodeF::Statement(_) => "Statement",
            JsNodeF::Object(_) => "Object",
            JsNodeF::Return(_) => "Return",
            JsNodeF::If { .. } => "If",
            JsNodeF::While { .. } => "While",
            JsNodeF::For { .. } => "For",
            JsNodeF::Try { .. } => "Try",
            JsNodeF::Throw(_) => "Throw",
            JsNodeF::Break => "Break",
            JsNodeF::Continue => "Continue",
            JsNodeF::Nop => "Nop",
        }
    }

    /// Fallible functor map over direct children, in source order.
    pub fn try_map<U, E>(self, mut f: impl FnMut(T) -> Result<U, E>) -> Result<JsNodeF<U>, E> {
        let mapped = match self {
            JsNodeF::Identifier(name) => JsNodeF::Identifier(name),
            JsNodeF::IntLiteral(v) => JsNodeF::IntLiteral(v),
            JsNodeF::FloatLiteral(v) => JsNodeF::FloatLiteral(v),
            JsNodeF::StringLiteral(s) => JsNodeF::StringLiteral(s),
            JsNodeF::Assign { target, value } => JsNodeF::Assign {
                target: f(target)?,
                value: f(value)?,
            },
            JsNodeF::AssignVar { name, value } => JsNodeF::AssignVar {
                name,
                value: value.map(&mut f).transpose()?,
            },
            JsNodeF::BinaryOp { op, left, right } => JsNodeF::BinaryOp {
                op,
                left: f(left)?,
                right: f(right)?,
            },
            JsNodeF::UnaryOp { op, operand } => JsNodeF::UnaryOp {
                op,
                operand: f(operand)?,
            },
            JsNodeF::TernaryOp {
                cond,
                then,
                otherwise,
            } => JsNodeF::TernaryOp {
                cond: f(cond)?,
                then: f(then)?,
                otherwise: f(otherwise)?,
            },
            JsNodeF::PropertyOf { object, property } => JsNodeF::PropertyOf {
                object: f(object)?,
                property: f(property)?,
            },
            JsNodeF::Call { callee, args } => JsNodeF::Call {
                callee: f(callee)?,
                args: args.into_iter().map(&mut f).collect::<Result<_, _>>()?,
            },
            JsNodeF::New { class, args } => JsNodeF::New {
                class: f(class)?,
                args: args.into_iter().map(&mut f).collect::<Result<_, _>>()?,
            },
            JsNodeF::Function { params, body } => JsNodeF::Function {
                params: params.into_iter().map(&mut f).collect::<Result<_, _>>()?,
                body: f(body)?,
            },
            JsNodeF::Block(stmts) => {
                JsNodeF::Block(stmts.into_iter().map(&mut f).collect::<Result<_, _>>()?)
            }
            JsNodeF::Statement(expr) => JsNodeF::Statement(f(expr)?),
            JsNodeF::Object(fields) => JsNodeF::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| Ok((key, f(value)?)))
                    .collect::<Result<_, E>>()?,
            ),
            JsNodeF::Return(value) => JsNodeF::Return(value.map(&mut f).transpose()?),
            JsNodeF::If {
                cond,
                then,
                otherwise,
            } => JsNodeF::If {
                cond: f(cond)?,
                then: f(then)?,
                otherwise: otherwise.map(&mut f).transpose()?,
            },
            JsNodeF::While { cond, body } => JsNodeF::While {
                cond: f(cond)?,
                body: f(body)?,
            },
            JsNodeF::For {
                init,
                cond,
                step,
                body,
            } => JsNodeF::For {
                init: init.map(&mut f).transpose()?,
                cond: cond.map(&mut f).transpose()?,
                step: step.map(&mut f).transpose()?,
                body: f(body)?,
            },
            JsNodeF::Try {
                body,
                catch,
                finalizer,
            } => JsNodeF::Try {
                body: f(body)?,
                catch: match catch {
                    Some((binding, handler)) => Some((binding, f(handler)?)),
                    None => None,
                },
                finalizer: finalizer.map(&mut f).transpose()?,
            },
            JsNodeF::Throw(value) => JsNodeF::Throw(f(value)?),
            JsNodeF::Break => JsNodeF::Break,
            JsNodeF::Continue => JsNodeF::Continue,
            JsNodeF::Nop => JsNodeF::Nop,
        };
        Ok(mapped)
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> JsNodeF<U> {
        match self.try_map(|child| Ok::<U, Infallible>(f(child))) {
            Ok(mapped) => mapped,
            Err(never) => match never {},
        }
    }

    /// Borrowing view of the direct children.
    pub fn as_ref(&self) -> JsNodeF<&T> {
        match self {
            JsNodeF::Identifier(name) => JsNodeF::Identifier(name.clone()),
            JsNodeF::IntLiteral(v) => JsNodeF::IntLiteral(*v),
            JsNodeF::FloatLiteral(v) => JsNodeF::FloatLiteral(*v),
            JsNodeF::StringLiteral(s) => JsNodeF::StringLiteral(s.clone()),
            JsNodeF::Assign { target, value } => JsNodeF::Assign { target, value },
            JsNodeF::AssignVar { name, value } => JsNodeF::AssignVar {
                name: name.clone(),
                value: value.as_ref(),
            },
            JsNodeF::BinaryOp { op, left, right } => JsNodeF::BinaryOp {
                op: op.clone(),
                left,
                right,
            },
            JsNodeF::UnaryOp { op, operand } => JsNodeF::UnaryOp {
                op: op.clone(),
                operand,
            },
            JsNodeF::TernaryOp {
                cond,
                then,
                otherwise,
            } => JsNodeF::TernaryOp {
                cond,
                then,
                otherwise,
            },
            JsNodeF::PropertyOf { object, property } => JsNodeF::PropertyOf { object, property },
            JsNodeF::Call { callee, args } => JsNodeF::Call {
                callee,
                args: args.iter().collect(),
            },
            JsNodeF::New { class, args } => JsNodeF::New {
                class,
                args: args.iter().collect(),
            },
            JsNodeF::Function { params, body } => JsNodeF::Function {
                params: params.iter().collect(),
                body,
            },
            JsNodeF::Block(stmts) => JsNodeF::Block(stmts.iter().collect()),
            JsNodeF::Statement(expr) => JsNodeF::Statement(expr),
            JsNodeF::Object(fields) => {
                JsNodeF::Object(fields.iter().map(|(k, v)| (k.clone(), v)).collect())
            }
            JsNodeF::Return(value) => JsNodeF::Return(value.as_ref()),
            JsNodeF::If {
                cond,
                then,
                otherwise,
            } => JsNodeF::If {
                cond,
                then,
                otherwise: otherwise.as_ref(),
            },
            JsNodeF::While { cond, body } => JsNodeF::While { cond, body },
            JsNodeF::For {
                init,
                cond,
                step,
                body,
            } => JsNodeF::For {
                init: init.as_ref(),
                cond: cond.as_ref(),
                step: step.as_ref(),
                body,
            },
            JsNodeF::Try {
                body,
                catch,
                finalizer,
            } => JsNodeF::Try {
                body,
                catch: catch.as_ref().map(|(binding, handler)| (binding.clone(), handler)),
                finalizer: finalizer.as_ref(),
            },
            JsNodeF::Throw(value) => JsNodeF::Throw(value),
            JsNodeF::Break => JsNodeF::Break,
            JsNodeF::Continue => JsNodeF::Continue,
            JsNodeF::Nop => JsNodeF::Nop,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RECURSION SCHEMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Catamorphism: reduce bottom-up, the algebra sees only reduced children.
pub fn fold<T>(node: &JsNode, alg: &mut dyn FnMut(JsNodeF<T>) -> T) -> T {
    let layer = node.kind().as_ref().map(|child| fold(child, alg));
    alg(layer)
}

/// Paramorphism: like [`fold`], but the algebra also receives the original node,
/// so it can inspect children before they were reduced.
pub fn para<T>(node: &JsNode, alg: &mut dyn FnMut(&JsNode, JsNodeF<T>) -> T) -> T {
    let layer = node.kind().as_ref().map(|child| para(child, alg));
    alg(node, layer)
}

/// Fallible paramorphism; the first error short-circuits.
pub fn try_para<T, E>(
    node: &JsNode,
    alg: &mut dyn FnMut(&JsNode, JsNodeF<T>) -> Result<T, E>,
) -> Result<T, E> {
    let layer = node.kind().as_ref().try_map(|child| try_para(child, alg))?;
    alg(node, layer)
}

/// Total number of nodes in the tree.
pub fn count_nodes(node: &JsNode) -> usize {
    fold(node, &mut |layer: JsNodeF<usize>| {
        let mut total = 1;
        layer.map(|child| total += child);
        total
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(name: &str) -> JsNode {
        JsNode::new(JsNodeF::Identifier(name.to_string()))
    }

    #[test]
    fn fold_counts_nodes() {
        let call = JsNode::new(JsNodeF::Call {
            callee: ident("f"),
            args: vec![ident("a"), JsNode::new(JsNodeF::IntLiteral(1))],
        });
        assert_eq!(count_nodes(&call), 4);
    }

    #[test]
    fn para_sees_original_children() {
        let access = JsNode::new(JsNodeF::PropertyOf {
            object: ident("foo"),
            property: ident("bar"),
        });
        let tags = para(&access, &mut |original: &JsNode, layer: JsNodeF<Vec<&'static str>>| {
            let mut seen = vec![original.tag()];
            layer.map(|child| seen.extend(child));
            seen
        });
        assert_eq!(tags, vec!["PropertyOf", "Identifier", "Identifier"]);
    }

    #[test]
    fn map_preserves_shape() {
        let layer: JsNodeF<i32> = JsNodeF::BinaryOp {
            op: "+".into(),
            left: 1,
            right: 2,
        };
        assert_eq!(
            layer.map(|v| v * 10),
            JsNodeF::BinaryOp {
                op: "+".into(),
                left: 10,
                right: 20
            }
        );
    }
}
