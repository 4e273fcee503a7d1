use crate::ast::{
    Arg, ArrayItem, Callee, Catch, ClassDecl, ClassMember, ClassRef, Closure, ElseIf, Expr,
    ExprKind, InterfaceDecl, MemberName, MethodDecl, Param, Stmt, StmtKind,
};
use crate::validate::CompilerResult;

/// In-place traversal of the source AST, used by passes that only decorate nodes.
///
/// Rules:
/// 1. Traversal order is source order and fixed.
/// 2. Implementers override `visit_*` methods to add behavior.
/// 3. Implementers call the matching `walk_*` function to continue into children
///    unless pruning is intended.
/// 4. The first error aborts the traversal.
pub trait VisitMut {
    fn visit_stmts(&mut self, stmts: &mut Vec<Stmt>) -> CompilerResult<()> {
        walk_stmts(self, stmts)
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) -> CompilerResult<()> {
        walk_stmt(self, stmt)
    }

    fn visit_expr(&mut self, expr: &mut Expr) -> CompilerResult<()> {
        walk_expr(self, expr)
    }

    fn visit_class(&mut self, class: &mut ClassDecl) -> CompilerResult<()> {
        walk_class(self, class)
    }

    fn visit_interface(&mut self, iface: &mut InterfaceDecl) -> CompilerResult<()> {
        walk_interface(self, iface)
    }

    fn visit_method(&mut self, method: &mut MethodDecl) -> CompilerResult<()> {
        walk_method(self, method)
    }

    fn visit_closure(&mut self, closure: &mut Closure) -> CompilerResult<()> {
        walk_closure(self, closure)
    }

    fn visit_param(&mut self, param: &mut Param) -> CompilerResult<()> {
        if let Some(default) = param.default.as_mut() {
            self.visit_expr(default)?;
        }
        Ok(())
    }

    fn visit_catch(&mut self, catch: &mut Catch) -> CompilerResult<()> {
        self.visit_stmts(&mut catch.body)
    }
}

pub fn walk_stmts<V: VisitMut + ?Sized>(visitor: &mut V, stmts: &mut Vec<Stmt>) -> CompilerResult<()> {
    for stmt in stmts.iter_mut() {
        visitor.visit_stmt(stmt)?;
    }
    Ok(())
}

pub fn walk_stmt<V: VisitMut + ?Sized>(visitor: &mut V, stmt: &mut Stmt) -> CompilerResult<()> {
    match &mut stmt.kind {
        StmtKind::Expression(expr) | StmtKind::Throw(expr) => visitor.visit_expr(expr),
        StmtKind::Echo(exprs) => {
            for expr in exprs {
                visitor.visit_expr(expr)?;
            }
            Ok(())
        }
        StmtKind::Return(value) => match value {
            Some(expr) => visitor.visit_expr(expr),
            None => Ok(()),
        },
        StmtKind::If {
            cond,
            then,
            else_ifs,
            otherwise,
        } => {
            visitor.visit_expr(cond)?;
            visitor.visit_stmts(then)?;
            for branch in else_ifs {
                visitor.visit_expr(&mut branch.cond)?;
                visitor.visit_stmts(&mut branch.body)?;
            }
            if let Some(body) = otherwise {
                visitor.visit_stmts(body)?;
            }
            Ok(())
        }
        StmtKind::While { cond, body } => {
            visitor.visit_expr(cond)?;
            visitor.visit_stmts(body)
        }
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => {
            for expr in init.iter_mut().chain(cond.iter_mut()).chain(step.iter_mut()) {
                visitor.visit_expr(expr)?;
            }
            visitor.visit_stmts(body)
        }
        StmtKind::Foreach {
            subject,
            key,
            value,
            body,
            ..
        } => {
            visitor.visit_expr(subject)?;
            if let Some(key) = key {
                visitor.visit_expr(key)?;
            }
            visitor.visit_expr(value)?;
            visitor.visit_stmts(body)
        }
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            visitor.visit_stmts(body)?;
            for catch in catches {
                visitor.visit_catch(catch)?;
            }
            if let Some(finally) = finally {
                visitor.visit_stmts(finally)?;
            }
            Ok(())
        }
        StmtKind::Block(body) | StmtKind::Namespace { body, .. } => visitor.visit_stmts(body),
        StmtKind::Class(class) => visitor.visit_class(class),
        StmtKind::Interface(iface) => visitor.visit_interface(iface),
        StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Use(_)
        | StmtKind::Function { .. }
        | StmtKind::Nop => Ok(()),
    }
}

fn walk_args<V: VisitMut + ?Sized>(visitor: &mut V, args: &mut [Arg]) -> CompilerResult<()> {
    for arg in args {
        visitor.visit_expr(&mut arg.value)?;
    }
    Ok(())
}

fn walk_member_name<V: VisitMut + ?Sized>(visitor: &mut V, name: &mut MemberName) -> CompilerResult<()> {
    match name {
        MemberName::Dynamic(expr) => visitor.visit_expr(expr),
        MemberName::Ident(_) => Ok(()),
    }
}

fn walk_class_ref<V: VisitMut + ?Sized>(visitor: &mut V, class: &mut ClassRef) -> CompilerResult<()> {
    match class {
        ClassRef::Dynamic(expr) => visitor.visit_expr(expr),
        _ => Ok(()),
    }
}

pub fn walk_expr<V: VisitMut + ?Sized>(visitor: &mut V, expr: &mut Expr) -> CompilerResult<()> {
    match &mut expr.kind {
        ExprKind::Variable(_)
        | ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::String(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::ConstFetch(_)
        | ExprKind::AnonymousClass => Ok(()),
        ExprKind::DynamicVariable(inner) => visitor.visit_expr(inner),
        ExprKind::Array(items) => {
            for item in items {
                if let Some(key) = item.key.as_mut() {
                    visitor.visit_expr(key)?;
                }
                visitor.visit_expr(&mut item.value)?;
            }
            Ok(())
        }
        ExprKind::ArrayDimFetch { target, dim } => {
            visitor.visit_expr(target)?;
            match dim {
                Some(dim) => visitor.visit_expr(dim),
                None => Ok(()),
            }
        }
        ExprKind::PropertyFetch { object, name } => {
            visitor.visit_expr(object)?;
            walk_member_name(visitor, name)
        }
        ExprKind::MethodCall { object, name, args } => {
            visitor.visit_expr(object)?;
            walk_member_name(visitor, name)?;
            walk_args(visitor, args)
        }
        ExprKind::StaticCall { class, name, args } => {
            walk_class_ref(visitor, class)?;
            walk_member_name(visitor, name)?;
            walk_args(visitor, args)
        }
        ExprKind::StaticPropertyFetch { class, .. } | ExprKind::ClassConstFetch { class, .. } => {
            walk_class_ref(visitor, class)
        }
        ExprKind::FuncCall { callee, args } => {
            if let Callee::Dynamic(inner) = callee {
                visitor.visit_expr(inner)?;
            }
            walk_args(visitor, args)
        }
        ExprKind::New { class, args } => {
            walk_class_ref(visitor, class)?;
            walk_args(visitor, args)
        }
        ExprKind::Assign { target, value } | ExprKind::AssignOp { target, value, .. } => {
            visitor.visit_expr(target)?;
            visitor.visit_expr(value)
        }
        ExprKind::IncDec { target, .. } => visitor.visit_expr(target),
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr(left)?;
            visitor.visit_expr(right)
        }
        ExprKind::Unary { operand, .. } => visitor.visit_expr(operand),
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => {
            visitor.visit_expr(cond)?;
            if let Some(then) = then {
                visitor.visit_expr(then)?;
            }
            visitor.visit_expr(otherwise)
        }
        ExprKind::Instanceof { expr, class } => {
            visitor.visit_expr(expr)?;
            walk_class_ref(visitor, class)
        }
        ExprKind::Cast { expr, .. } => visitor.visit_expr(expr),
        ExprKind::Isset(exprs) => {
            for expr in exprs {
                visitor.visit_expr(expr)?;
            }
            Ok(())
        }
        ExprKind::Closure(closure) => visitor.visit_closure(closure),
    }
}

pub fn walk_class<V: VisitMut + ?Sized>(visitor: &mut V, class: &mut ClassDecl) -> CompilerResult<()> {
    for member in class.members.iter_mut() {
        match member {
            ClassMember::Property(prop) => {
                if let Some(default) = prop.default.as_mut() {
                    visitor.visit_expr(default)?;
                }
            }
            ClassMember::Const(constant) => visitor.visit_expr(&mut constant.value)?,
            ClassMember::Method(method) => visitor.visit_method(method)?,
            ClassMember::TraitUse(_) => {}
        }
    }
    Ok(())
}

pub fn walk_interface<V: VisitMut + ?Sized>(
    visitor: &mut V,
    iface: &mut InterfaceDecl,
) -> CompilerResult<()> {
    for member in iface.members.iter_mut() {
        match member {
            ClassMember::Const(constant) => visitor.visit_expr(&mut constant.value)?,
            ClassMember::Method(method) => visitor.visit_method(method)?,
            _ => {}
        }
    }
    Ok(())
}

pub fn walk_method<V: VisitMut + ?Sized>(visitor: &mut V, method: &mut MethodDecl) -> CompilerResult<()> {
    for param in method.params.iter_mut() {
        visitor.visit_param(param)?;
    }
    match method.body.as_mut() {
        Some(body) => visitor.visit_stmts(body),
        None => Ok(()),
    }
}

pub fn walk_closure<V: VisitMut + ?Sized>(visitor: &mut V, closure: &mut Closure) -> CompilerResult<()> {
    for param in closure.params.iter_mut() {
        visitor.visit_param(param)?;
    }
    visitor.visit_stmts(&mut closure.body)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FOLD (clone-and-replace rewrites)
// ═══════════════════════════════════════════════════════════════════════════════

/// By-value structural rewrite. Every `fold_*` consumes its node and returns the
/// replacement; a statement may fold into zero or more statements.
pub trait Fold {
    fn fold_stmts(&mut self, stmts: Vec<Stmt>) -> CompilerResult<Vec<Stmt>> {
        fold_stmts(self, stmts)
    }

    fn fold_stmt(&mut self, stmt: Stmt) -> CompilerResult<Vec<Stmt>> {
        Ok(vec![fold_stmt_children(self, stmt)?])
    }

    fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
        fold_expr_children(self, expr)
    }

    fn fold_class(&mut self, class: ClassDecl) -> CompilerResult<ClassDecl> {
        fold_class_children(self, class)
    }

    fn fold_interface(&mut self, iface: InterfaceDecl) -> CompilerResult<InterfaceDecl> {
        fold_interface_children(self, iface)
    }

    fn fold_method(&mut self, method: MethodDecl) -> CompilerResult<MethodDecl> {
        fold_method_children(self, method)
    }

    fn fold_closure(&mut self, closure: Closure) -> CompilerResult<Closure> {
        fold_closure_children(self, closure)
    }

    fn fold_param(&mut self, mut param: Param) -> CompilerResult<Param> {
        param.default = param.default.map(|d| self.fold_expr(d)).transpose()?;
        Ok(param)
    }
}

pub fn fold_stmts<F: Fold + ?Sized>(folder: &mut F, stmts: Vec<Stmt>) -> CompilerResult<Vec<Stmt>> {
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        out.extend(folder.fold_stmt(stmt)?);
    }
    Ok(out)
}

fn fold_box<F: Fold + ?Sized>(folder: &mut F, expr: Box<Expr>) -> CompilerResult<Box<Expr>> {
    Ok(Box::new(folder.fold_expr(*expr)?))
}

fn fold_exprs<F: Fold + ?Sized>(folder: &mut F, exprs: Vec<Expr>) -> CompilerResult<Vec<Expr>> {
    exprs.into_iter().map(|e| folder.fold_expr(e)).collect()
}

fn fold_args<F: Fold + ?Sized>(folder: &mut F, args: Vec<Arg>) -> CompilerResult<Vec<Arg>> {
    args.into_iter()
        .map(|arg| {
            Ok(Arg {
                value: folder.fold_expr(arg.value)?,
                unpack: arg.unpack,
            })
        })
        .collect()
}

fn fold_member_name<F: Fold + ?Sized>(folder: &mut F, name: MemberName) -> CompilerResult<MemberName> {
    Ok(match name {
        MemberName::Dynamic(expr) => MemberName::Dynamic(fold_box(folder, expr)?),
        ident => ident,
    })
}

fn fold_class_ref<F: Fold + ?Sized>(folder: &mut F, class: ClassRef) -> CompilerResult<ClassRef> {
    Ok(match class {
        ClassRef::Dynamic(expr) => ClassRef::Dynamic(fold_box(folder, expr)?),
        other => other,
    })
}

pub fn fold_stmt_children<F: Fold + ?Sized>(folder: &mut F, stmt: Stmt) -> CompilerResult<Stmt> {
    let Stmt { kind, loc, attrs } = stmt;
    let kind = match kind {
        StmtKind::Expression(expr) => StmtKind::Expression(folder.fold_expr(expr)?),
        StmtKind::Throw(expr) => StmtKind::Throw(folder.fold_expr(expr)?),
        StmtKind::Echo(exprs) => StmtKind::Echo(fold_exprs(folder, exprs)?),
        StmtKind::Return(value) => StmtKind::Return(value.map(|v| folder.fold_expr(v)).transpose()?),
        StmtKind::If {
            cond,
            then,
            else_ifs,
            otherwise,
        } => {
            let cond = folder.fold_expr(cond)?;
            let then = folder.fold_stmts(then)?;
            let mut branches = Vec::with_capacity(else_ifs.len());
            for branch in else_ifs {
                branches.push(ElseIf {
                    cond: folder.fold_expr(branch.cond)?,
                    body: folder.fold_stmts(branch.body)?,
                });
            }
            StmtKind::If {
                cond,
                then,
                else_ifs: branches,
                otherwise: otherwise.map(|b| folder.fold_stmts(b)).transpose()?,
            }
        }
        StmtKind::While { cond, body } => StmtKind::While {
            cond: folder.fold_expr(cond)?,
            body: folder.fold_stmts(body)?,
        },
        StmtKind::For {
            init,
            cond,
            step,
            body,
        } => StmtKind::For {
            init: fold_exprs(folder, init)?,
            cond: fold_exprs(folder, cond)?,
            step: fold_exprs(folder, step)?,
            body: folder.fold_stmts(body)?,
        },
        StmtKind::Foreach {
            subject,
            key,
            value,
            by_ref,
            body,
        } => StmtKind::Foreach {
            subject: folder.fold_expr(subject)?,
            key: key.map(|k| folder.fold_expr(k)).transpose()?,
            value: folder.fold_expr(value)?,
            by_ref,
            body: folder.fold_stmts(body)?,
        },
        StmtKind::Try {
            body,
            catches,
            finally,
        } => {
            let body = folder.fold_stmts(body)?;
            let mut folded = Vec::with_capacity(catches.len());
            for catch in catches {
                folded.push(Catch {
                    body: folder.fold_stmts(catch.body)?,
                    ..catch
                });
            }
            StmtKind::Try {
                body,
                catches: folded,
                finally: finally.map(|f| folder.fold_stmts(f)).transpose()?,
            }
        }
        StmtKind::Block(body) => StmtKind::Block(folder.fold_stmts(body)?),
        StmtKind::Namespace { name, body, braced } => StmtKind::Namespace {
            name,
            body: folder.fold_stmts(body)?,
            braced,
        },
        StmtKind::Class(class) => StmtKind::Class(folder.fold_class(class)?),
        StmtKind::Interface(iface) => StmtKind::Interface(folder.fold_interface(iface)?),
        other @ (StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Use(_)
        | StmtKind::Function { .. }
        | StmtKind::Nop) => other,
    };
    Ok(Stmt { kind, loc, attrs })
}

pub fn fold_expr_children<F: Fold + ?Sized>(folder: &mut F, expr: Expr) -> CompilerResult<Expr> {
    let Expr { kind, loc, attrs } = expr;
    let kind = match kind {
        ExprKind::DynamicVariable(inner) => ExprKind::DynamicVariable(fold_box(folder, inner)?),
        ExprKind::Array(items) => {
            let mut folded = Vec::with_capacity(items.len());
            for item in items {
                folded.push(ArrayItem {
                    key: item.key.map(|k| folder.fold_expr(k)).transpose()?,
                    value: folder.fold_expr(item.value)?,
                    by_ref: item.by_ref,
                    unpack: item.unpack,
                });
            }
            ExprKind::Array(folded)
        }
        ExprKind::ArrayDimFetch { target, dim } => ExprKind::ArrayDimFetch {
            target: fold_box(folder, target)?,
            dim: dim.map(|d| fold_box(folder, d)).transpose()?,
        },
        ExprKind::PropertyFetch { object, name } => ExprKind::PropertyFetch {
            object: fold_box(folder, object)?,
            name: fold_member_name(folder, name)?,
        },
        ExprKind::MethodCall { object, name, args } => ExprKind::MethodCall {
            object: fold_box(folder, object)?,
            name: fold_member_name(folder, name)?,
            args: fold_args(folder, args)?,
        },
        ExprKind::StaticCall { class, name, args } => ExprKind::StaticCall {
            class: fold_class_ref(folder, class)?,
            name: fold_member_name(folder, name)?,
            args: fold_args(folder, args)?,
        },
        ExprKind::StaticPropertyFetch { class, name } => ExprKind::StaticPropertyFetch {
            class: fold_class_ref(folder, class)?,
            name,
        },
        ExprKind::ClassConstFetch { class, name } => ExprKind::ClassConstFetch {
            class: fold_class_ref(folder, class)?,
            name,
        },
        ExprKind::FuncCall { callee, args } => ExprKind::FuncCall {
            callee: match callee {
                Callee::Dynamic(inner) => Callee::Dynamic(fold_box(folder, inner)?),
                named => named,
            },
            args: fold_args(folder, args)?,
        },
        ExprKind::New { class, args } => ExprKind::New {
            class: fold_class_ref(folder, class)?,
            args: fold_args(folder, args)?,
        },
        ExprKind::Assign { target, value } => ExprKind::Assign {
            target: fold_box(folder, target)?,
            value: fold_box(folder, value)?,
        },
        ExprKind::AssignOp { op, target, value } => ExprKind::AssignOp {
            op,
            target: fold_box(folder, target)?,
            value: fold_box(folder, value)?,
        },
        ExprKind::IncDec { kind, target } => ExprKind::IncDec {
            kind,
            target: fold_box(folder, target)?,
        },
        ExprKind::Binary { op, left, right } => ExprKind::Binary {
            op,
            left: fold_box(folder, left)?,
            right: fold_box(folder, right)?,
        },
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op,
            operand: fold_box(folder, operand)?,
        },
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => ExprKind::Ternary {
            cond: fold_box(folder, cond)?,
            then: then.map(|t| fold_box(folder, t)).transpose()?,
            otherwise: fold_box(folder, otherwise)?,
        },
        ExprKind::Instanceof { expr, class } => ExprKind::Instanceof {
            expr: fold_box(folder, expr)?,
            class: fold_class_ref(folder, class)?,
        },
        ExprKind::Cast { kind, expr } => ExprKind::Cast {
            kind,
            expr: fold_box(folder, expr)?,
        },
        ExprKind::Isset(exprs) => ExprKind::Isset(fold_exprs(folder, exprs)?),
        ExprKind::Closure(closure) => ExprKind::Closure(folder.fold_closure(closure)?),
        leaf => leaf,
    };
    Ok(Expr { kind, loc, attrs })
}

pub fn fold_class_children<F: Fold + ?Sized>(folder: &mut F, class: ClassDecl) -> CompilerResult<ClassDecl> {
    let ClassDecl { members, .. } = class;
    let mut folded = Vec::with_capacity(members.len());
    for member in members {
        folded.push(match member {
            ClassMember::Property(mut prop) => {
                prop.default = prop.default.map(|d| folder.fold_expr(d)).transpose()?;
                ClassMember::Property(prop)
            }
            ClassMember::Const(mut constant) => {
                constant.value = folder.fold_expr(constant.value)?;
                ClassMember::Const(constant)
            }
            ClassMember::Method(method) => ClassMember::Method(folder.fold_method(method)?),
            other => other,
        });
    }
    Ok(ClassDecl {
        members: folded,
        ..class
    })
}

pub fn fold_interface_children<F: Fold + ?Sized>(
    folder: &mut F,
    iface: InterfaceDecl,
) -> CompilerResult<InterfaceDecl> {
    let InterfaceDecl { members, .. } = iface;
    let mut folded = Vec::with_capacity(members.len());
    for member in members {
        folded.push(match member {
            ClassMember::Const(mut constant) => {
                constant.value = folder.fold_expr(constant.value)?;
                ClassMember::Const(constant)
            }
            ClassMember::Method(method) => ClassMember::Method(folder.fold_method(method)?),
            other => other,
        });
    }
    Ok(InterfaceDecl {
        members: folded,
        ..iface
    })
}

pub fn fold_method_children<F: Fold + ?Sized>(folder: &mut F, method: MethodDecl) -> CompilerResult<MethodDecl> {
    let MethodDecl { params, body, .. } = method;
    let params = params
        .into_iter()
        .map(|p| folder.fold_param(p))
        .collect::<CompilerResult<Vec<_>>>()?;
    let body = body.map(|b| folder.fold_stmts(b)).transpose()?;
    Ok(MethodDecl {
        params,
        body,
        ..method
    })
}

pub fn fold_closure_children<F: Fold + ?Sized>(folder: &mut F, closure: Closure) -> CompilerResult<Closure> {
    let Closure { params, body, .. } = closure;
    let params = params
        .into_iter()
        .map(|p| folder.fold_param(p))
        .collect::<CompilerResult<Vec<_>>>()?;
    let body = folder.fold_stmts(body)?;
    Ok(Closure {
        params,
        body,
        ..closure
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMORPHISM OVER EXPRESSIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Bottom-up reduction of an expression tree. The algebra receives the original
/// node together with the already-reduced results of its direct sub-expressions.
/// Closure bodies are statements and are not entered.
pub fn para_expr<T>(expr: &Expr, alg: &mut dyn FnMut(&Expr, Vec<T>) -> T) -> T {
    let children: Vec<T> = direct_subexprs(expr)
        .into_iter()
        .map(|child| para_expr(child, alg))
        .collect();
    alg(expr, children)
}

/// Direct sub-expressions of `expr`, in evaluation order.
pub fn direct_subexprs(expr: &Expr) -> Vec<&Expr> {
    fn args_of(args: &[Arg]) -> impl Iterator<Item = &Expr> {
        args.iter().map(|a| &a.value)
    }
    fn member(name: &MemberName) -> Option<&Expr> {
        match name {
            MemberName::Dynamic(e) => Some(e.as_ref()),
            MemberName::Ident(_) => None,
        }
    }
    fn class_ref(class: &ClassRef) -> Option<&Expr> {
        match class {
            ClassRef::Dynamic(e) => Some(e.as_ref()),
            _ => None,
        }
    }

    let mut out: Vec<&Expr> = Vec::new();
    match &expr.kind {
        ExprKind::DynamicVariable(inner) => out.push(inner),
        ExprKind::Array(items) => {
            for item in items {
                out.extend(item.key.as_ref());
                out.push(&item.value);
            }
        }
        ExprKind::ArrayDimFetch { target, dim } => {
            out.push(target);
            out.extend(dim.as_deref());
        }
        ExprKind::PropertyFetch { object, name } => {
            out.push(object);
            out.extend(member(name));
        }
        ExprKind::MethodCall { object, name, args } => {
            out.push(object);
            out.extend(member(name));
            out.extend(args_of(args));
        }
        ExprKind::StaticCall { class, name, args } => {
            out.extend(class_ref(class));
            out.extend(member(name));
            out.extend(args_of(args));
        }
        ExprKind::StaticPropertyFetch { class, .. } | ExprKind::ClassConstFetch { class, .. } => {
            out.extend(class_ref(class))
        }
        ExprKind::FuncCall { callee, args } => {
            if let Callee::Dynamic(inner) = callee {
                out.push(inner);
            }
            out.extend(args_of(args));
        }
        ExprKind::New { class, args } => {
            out.extend(class_ref(class));
            out.extend(args_of(args));
        }
        ExprKind::Assign { target, value } | ExprKind::AssignOp { target, value, .. } => {
            out.push(target);
            out.push(value);
        }
        ExprKind::IncDec { target, .. } => out.push(target),
        ExprKind::Binary { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        ExprKind::Unary { operand, .. } => out.push(operand),
        ExprKind::Ternary {
            cond,
            then,
            otherwise,
        } => {
            out.push(cond);
            out.extend(then.as_deref());
            out.push(otherwise);
        }
        ExprKind::Instanceof { expr, class } => {
            out.push(expr);
            out.extend(class_ref(class));
        }
        ExprKind::Cast { expr, .. } => out.push(expr),
        ExprKind::Isset(exprs) => out.extend(exprs.iter()),
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, SourceLocation};

    fn int(v: i64) -> Expr {
        Expr::new(ExprKind::Int(v), SourceLocation::default())
    }

    fn add(l: Expr, r: Expr) -> Expr {
        Expr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                left: l.boxed(),
                right: r.boxed(),
            },
            SourceLocation::default(),
        )
    }

    #[test]
    fn para_sums_literals_bottom_up() {
        let tree = add(int(1), add(int(2), int(3)));
        let total = para_expr(&tree, &mut |node, kids: Vec<i64>| match node.kind {
            ExprKind::Int(v) => v,
            _ => kids.iter().sum(),
        });
        assert_eq!(total, 6);
    }

    struct DoubleInts;

    impl Fold for DoubleInts {
        fn fold_expr(&mut self, expr: Expr) -> CompilerResult<Expr> {
            let expr = fold_expr_children(self, expr)?;
            Ok(match expr.kind {
                ExprKind::Int(v) => Expr::new(ExprKind::Int(v * 2), expr.loc),
                _ => expr,
            })
        }
    }

    #[test]
    fn fold_replaces_nested_nodes() {
        let folded = DoubleInts.fold_expr(add(int(1), int(4))).unwrap();
        match folded.kind {
            ExprKind::Binary { left, right, .. } => {
                assert_eq!(left.kind, ExprKind::Int(2));
                assert_eq!(right.kind, ExprKind::Int(8));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
