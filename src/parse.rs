//! Parse Module for the PHP-to-JavaScript compiler
//!
//! Recursive descent over the token stream from [`crate::lexer`], with
//! precedence climbing for binary operators (PHP 8 table). Dynamic forms that
//! the compiler rejects later are still parsed into explicit nodes so the check
//! stage can report them precisely; constructs the AST does not model at all are
//! rejected here.

use lazy_static::lazy_static;
use std::collections::HashSet;
use tracing::debug;

use crate::ast::{
    Arg, ArrayItem, BinaryOp, Callee, CastKind, Catch, ClassDecl, ClassMember, ClassRef, Closure,
    ClosureUse, ConstDecl, ElseIf, Expr, ExprKind, IncDec, InterfaceDecl, MemberName, MethodDecl,
    Modifiers, Name, Param, PropertyDecl, SourceFile, SourceLocation, Stmt, StmtKind, TypeHint,
    UnaryOp, UseItem, Visibility, Attributes,
};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::validate::{CompilerError, CompilerResult, ErrorKind};

lazy_static! {
    /// Words that start a construct the compiler does not model.
    static ref UNSUPPORTED_KEYWORDS: HashSet<&'static str> = [
        "switch", "do", "goto", "global", "match", "fn", "clone", "include", "include_once",
        "require", "require_once", "list", "print", "exit", "die", "yield", "unset", "eval",
        "trait", "enum", "declare",
    ]
    .into_iter()
    .collect();
}

// Binding powers, loosest first.
const BP_OR_KW: u8 = 1;
const BP_XOR_KW: u8 = 2;
const BP_AND_KW: u8 = 3;
const BP_ASSIGN: u8 = 4;
const BP_TERNARY: u8 = 5;
const BP_LOGICAL_OR: u8 = 7;
const BP_LOGICAL_AND: u8 = 8;
const BP_BIT_OR: u8 = 9;
const BP_BIT_XOR: u8 = 10;
const BP_BIT_AND: u8 = 11;
const BP_EQUALITY: u8 = 12;
const BP_COMPARISON: u8 = 13;
const BP_CONCAT: u8 = 14;
const BP_SHIFT: u8 = 15;
const BP_ADDITIVE: u8 = 16;
const BP_MULTIPLICATIVE: u8 = 17;
const BP_NOT: u8 = 18;
const BP_INSTANCEOF: u8 = 19;
const BP_UNARY: u8 = 20;

/// Parses one source file into the source AST.
pub fn parse_source(code: &str, path: &str) -> CompilerResult<SourceFile> {
    let tokens = tokenize(code).map_err(|e| e.in_file(path))?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.parse_file().map_err(|e| e.in_file(path))?;
    debug!(path, statements = stmts.len(), "parsed source file");
    Ok(SourceFile {
        path: path.to_string(),
        stmts,
    })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Variable(name) => format!("${}", name),
        TokenKind::Name(name) => name.clone(),
        TokenKind::Int(v) => v.to_string(),
        TokenKind::Float(v) => v.to_string(),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::Punct(p) => format!("'{}'", p),
        TokenKind::Heredoc => "'<<<'".to_string(),
        TokenKind::Eof => "end of file".to_string(),
    }
}

fn binary_op(token: &Token) -> Option<(BinaryOp, u8)> {
    let op = match &token.kind {
        TokenKind::Punct(p) => match p.as_str() {
            "||" => (BinaryOp::Or, BP_LOGICAL_OR),
            "&&" => (BinaryOp::And, BP_LOGICAL_AND),
            "|" => (BinaryOp::BitOr, BP_BIT_OR),
            "^" => (BinaryOp::BitXor, BP_BIT_XOR),
            "&" => (BinaryOp::BitAnd, BP_BIT_AND),
            "==" => (BinaryOp::Equal, BP_EQUALITY),
            "!=" | "<>" => (BinaryOp::NotEqual, BP_EQUALITY),
            "===" => (BinaryOp::Identical, BP_EQUALITY),
            "!==" => (BinaryOp::NotIdentical, BP_EQUALITY),
            "<" => (BinaryOp::Less, BP_COMPARISON),
            "<=" => (BinaryOp::LessEqual, BP_COMPARISON),
            ">" => (BinaryOp::Greater, BP_COMPARISON),
            ">=" => (BinaryOp::GreaterEqual, BP_COMPARISON),
            "." => (BinaryOp::Concat, BP_CONCAT),
            "<<" => (BinaryOp::ShiftLeft, BP_SHIFT),
            ">>" => (BinaryOp::ShiftRight, BP_SHIFT),
            "+" => (BinaryOp::Add, BP_ADDITIVE),
            "-" => (BinaryOp::Sub, BP_ADDITIVE),
            "*" => (BinaryOp::Mul, BP_MULTIPLICATIVE),
            "/" => (BinaryOp::Div, BP_MULTIPLICATIVE),
            "%" => (BinaryOp::Mod, BP_MULTIPLICATIVE),
            _ => return None,
        },
        TokenKind::Name(word) => match word.to_ascii_lowercase().as_str() {
            "or" => (BinaryOp::Or, BP_OR_KW),
            "xor" => (BinaryOp::Xor, BP_XOR_KW),
            "and" => (BinaryOp::And, BP_AND_KW),
            _ => return None,
        },
        _ => return None,
    };
    Some(op)
}

fn assign_op(symbol: &str) -> Option<Option<BinaryOp>> {
    let op = match symbol {
        "=" => None,
        "+=" => Some(BinaryOp::Add),
        "-=" => Some(BinaryOp::Sub),
        "*=" => Some(BinaryOp::Mul),
        "/=" => Some(BinaryOp::Div),
        "%=" => Some(BinaryOp::Mod),
        "**=" => Some(BinaryOp::Pow),
        ".=" => Some(BinaryOp::Concat),
        "&=" => Some(BinaryOp::BitAnd),
        "|=" => Some(BinaryOp::BitOr),
        "^=" => Some(BinaryOp::BitXor),
        "<<=" => Some(BinaryOp::ShiftLeft),
        ">>=" => Some(BinaryOp::ShiftRight),
        _ => return None,
    };
    Some(op)
}

fn is_assignable(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Variable(_)
            | ExprKind::DynamicVariable(_)
            | ExprKind::ArrayDimFetch { .. }
            | ExprKind::PropertyFetch { .. }
            | ExprKind::StaticPropertyFetch { .. }
    )
}

fn class_ref_from(raw: &str) -> ClassRef {
    match raw.to_ascii_lowercase().as_str() {
        "self" => ClassRef::SelfRef,
        "parent" => ClassRef::ParentRef,
        "static" => ClassRef::StaticRef,
        _ => ClassRef::Named(Name::parse(raw)),
    }
}

fn cast_kind(word: &str) -> Option<CastKind> {
    match word.to_ascii_lowercase().as_str() {
        "int" | "integer" => Some(CastKind::Int),
        "float" | "double" => Some(CastKind::Float),
        "string" => Some(CastKind::String),
        "bool" | "boolean" => Some(CastKind::Bool),
        _ => None,
    }
}

impl Parser {
    // ───────────────────────────────────────────────────────────────────────────
    // token helpers
    // ───────────────────────────────────────────────────────────────────────────

    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn loc(&self) -> SourceLocation {
        self.peek().loc
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_punct(&self, p: &str) -> bool {
        self.peek().is_punct(p)
    }

    fn at_keyword(&self, k: &str) -> bool {
        self.peek().is_keyword(k)
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if self.at_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, k: &str) -> bool {
        if self.at_keyword(k) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> CompilerError {
        CompilerError::new(
            ErrorKind::Parse,
            format!("expected {}, found {}", expected, describe(&self.peek().kind)),
        )
        .at(self.loc())
    }

    fn unsupported(&self, what: &str) -> CompilerError {
        CompilerError::unsupported(format!("{} is not supported", what), self.loc())
    }

    fn expect_punct(&mut self, p: &str) -> CompilerResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", p)))
        }
    }

    fn expect_keyword(&mut self, k: &str) -> CompilerResult<()> {
        if self.eat_keyword(k) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{}'", k)))
        }
    }

    fn expect_name(&mut self) -> CompilerResult<String> {
        match &self.peek().kind {
            TokenKind::Name(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a name")),
        }
    }

    fn expect_variable(&mut self) -> CompilerResult<String> {
        match &self.peek().kind {
            TokenKind::Variable(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("a variable")),
        }
    }

    fn at_variable(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Variable(_))
    }

    fn end_statement(&mut self) -> CompilerResult<()> {
        if self.at_eof() {
            // A closing tag may end the last statement
            return Ok(());
        }
        self.expect_punct(";")
    }

    // ───────────────────────────────────────────────────────────────────────────
    // file & declarations
    // ───────────────────────────────────────────────────────────────────────────

    fn parse_file(&mut self) -> CompilerResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while !self.at_eof() {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_namespace(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("namespace")?;
        let name = match &self.peek().kind {
            TokenKind::Name(raw) => {
                let name = Name::parse(raw);
                self.advance();
                Some(name)
            }
            _ => None,
        };
        if self.at_punct("{") {
            let body = self.parse_block()?;
            return Ok(Stmt::new(
                StmtKind::Namespace {
                    name,
                    body,
                    braced: true,
                },
                loc,
            ));
        }
        if name.is_none() {
            return Err(self.unexpected("a namespace name"));
        }
        self.expect_punct(";")?;
        let mut body = Vec::new();
        while !self.at_eof() && !self.at_keyword("namespace") {
            body.push(self.parse_statement()?);
        }
        Ok(Stmt::new(
            StmtKind::Namespace {
                name,
                body,
                braced: false,
            },
            loc,
        ))
    }

    fn parse_use(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("use")?;
        if self.at_keyword("function") || self.at_keyword("const") {
            return Err(self.unsupported("importing functions or constants"));
        }
        let mut items = Vec::new();
        loop {
            let name = Name::parse(&self.expect_name()?);
            if self.at_punct("{") {
                return Err(self.unsupported("group use declarations"));
            }
            let alias = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            items.push(UseItem { name, alias });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.end_statement()?;
        Ok(Stmt::new(StmtKind::Use(items), loc))
    }

    fn parse_name_list(&mut self) -> CompilerResult<Vec<Name>> {
        let mut names = vec![Name::parse(&self.expect_name()?)];
        while self.eat_punct(",") {
            names.push(Name::parse(&self.expect_name()?));
        }
        Ok(names)
    }

    fn parse_class(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        let mut is_abstract = false;
        let mut is_final = false;
        loop {
            if self.eat_keyword("abstract") {
                is_abstract = true;
            } else if self.eat_keyword("final") || self.eat_keyword("readonly") {
                is_final = true;
            } else {
                break;
            }
        }
        self.expect_keyword("class")?;
        let name = self.expect_name()?;
        let parent = if self.eat_keyword("extends") {
            Some(Name::parse(&self.expect_name()?))
        } else {
            None
        };
        let interfaces = if self.eat_keyword("implements") {
            self.parse_name_list()?
        } else {
            Vec::new()
        };
        let members = self.parse_members()?;
        Ok(Stmt::new(
            StmtKind::Class(ClassDecl {
                name,
                parent,
                interfaces,
                members,
                is_abstract,
                is_final,
                loc,
                attrs: Attributes::new(),
            }),
            loc,
        ))
    }

    fn parse_interface(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("interface")?;
        let name = self.expect_name()?;
        let extends = if self.eat_keyword("extends") {
            self.parse_name_list()?
        } else {
            Vec::new()
        };
        let members = self.parse_members()?;
        if let Some(ClassMember::Property(prop)) = members
            .iter()
            .find(|m| matches!(m, ClassMember::Property(_)))
        {
            return Err(CompilerError::unsupported(
                format!("interface {} cannot declare property ${}", name, prop.name),
                prop.loc,
            ));
        }
        Ok(Stmt::new(
            StmtKind::Interface(InterfaceDecl {
                name,
                extends,
                members,
                loc,
                attrs: Attributes::new(),
            }),
            loc,
        ))
    }

    fn parse_modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            let word = match &self.peek().kind {
                TokenKind::Name(word) => word.to_ascii_lowercase(),
                _ => break,
            };
            match word.as_str() {
                "public" | "protected" | "private" => {
                    modifiers.visibility = Visibility::from_str(&word)
                }
                "static" => modifiers.is_static = true,
                "abstract" => modifiers.is_abstract = true,
                "final" => modifiers.is_final = true,
                "var" | "readonly" => {}
                _ => break,
            }
            self.advance();
        }
        modifiers
    }

    fn parse_members(&mut self) -> CompilerResult<Vec<ClassMember>> {
        self.expect_punct("{")?;
        let mut members = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            let loc = self.loc();
            if self.eat_keyword("use") {
                let traits = self.parse_name_list()?;
                if self.at_punct("{") {
                    return Err(self.unsupported("trait adaptation"));
                }
                self.end_statement()?;
                members.push(ClassMember::TraitUse(traits));
                continue;
            }
            let modifiers = self.parse_modifiers();
            if self.eat_keyword("const") {
                // Typed constants: `const int X = 1;`
                if matches!(self.peek_at(1).kind, TokenKind::Name(_)) {
                    self.advance();
                }
                loop {
                    let cloc = self.loc();
                    let name = self.expect_name()?;
                    self.expect_punct("=")?;
                    let value = self.parse_expr(0)?;
                    members.push(ClassMember::Const(ConstDecl {
                        name,
                        value,
                        modifiers,
                        loc: cloc,
                        attrs: Attributes::new(),
                    }));
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.end_statement()?;
            } else if self.eat_keyword("function") {
                let by_ref_return = self.eat_punct("&");
                let name = self.expect_name()?;
                let params = self.parse_params()?;
                self.parse_return_type()?;
                let body = if self.eat_punct(";") {
                    None
                } else {
                    Some(self.parse_block()?)
                };
                members.push(ClassMember::Method(MethodDecl {
                    name,
                    params,
                    body,
                    by_ref_return,
                    modifiers,
                    loc,
                    attrs: Attributes::new(),
                }));
            } else {
                if !self.at_variable() {
                    self.parse_type()?;
                }
                loop {
                    let ploc = self.loc();
                    let name = self.expect_variable()?;
                    let default = if self.eat_punct("=") {
                        Some(self.parse_expr(0)?)
                    } else {
                        None
                    };
                    members.push(ClassMember::Property(PropertyDecl {
                        name,
                        default,
                        modifiers,
                        loc: ploc,
                        attrs: Attributes::new(),
                    }));
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.end_statement()?;
            }
        }
        Ok(members)
    }

    fn parse_type(&mut self) -> CompilerResult<TypeHint> {
        let nullable = self.eat_punct("?");
        let name = Name::parse(&self.expect_name()?);
        let intersection = self.at_punct("&") && matches!(self.peek_at(1).kind, TokenKind::Name(_));
        if self.at_punct("|") || intersection {
            return Err(self.unsupported("union and intersection types"));
        }
        Ok(TypeHint { name, nullable })
    }

    fn parse_return_type(&mut self) -> CompilerResult<()> {
        if self.eat_punct(":") {
            self.parse_type()?;
        }
        Ok(())
    }

    fn parse_params(&mut self) -> CompilerResult<Vec<Param>> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.at_punct(")") {
            let loc = self.loc();
            let start = self.pos;
            self.parse_modifiers();
            let promoted = self.pos != start;
            let ty = if self.at_variable() || self.at_punct("&") || self.at_punct("...") {
                None
            } else {
                Some(self.parse_type()?)
            };
            let by_ref = self.eat_punct("&");
            let variadic = self.eat_punct("...");
            let name = self.expect_variable()?;
            let default = if self.eat_punct("=") {
                Some(self.parse_expr(0)?)
            } else {
                None
            };
            params.push(Param {
                name,
                ty,
                default,
                by_ref,
                variadic,
                promoted,
                loc,
            });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // statements
    // ───────────────────────────────────────────────────────────────────────────

    fn parse_block(&mut self) -> CompilerResult<Vec<Stmt>> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.eat_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    /// A braced block or a single statement.
    fn parse_body(&mut self) -> CompilerResult<Vec<Stmt>> {
        if self.at_punct(":") {
            return Err(self.unsupported("alternative control-structure syntax"));
        }
        if self.at_punct("{") {
            self.parse_block()
        } else {
            Ok(vec![self.parse_statement()?])
        }
    }

    fn parse_paren_expr(&mut self) -> CompilerResult<Expr> {
        self.expect_punct("(")?;
        let expr = self.parse_expr(0)?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn parse_statement(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        if self.at_punct("{") {
            let body = self.parse_block()?;
            return Ok(Stmt::new(StmtKind::Block(body), loc));
        }
        if self.eat_punct(";") {
            return Ok(Stmt::new(StmtKind::Nop, loc));
        }
        if self.peek().kind == TokenKind::Heredoc {
            return Err(self.unsupported("heredoc syntax"));
        }

        let word = match &self.peek().kind {
            TokenKind::Name(word) => word.to_ascii_lowercase(),
            _ => String::new(),
        };
        // `Foo::bar()` and `foo()` start expressions even when the name is a keyword
        let starts_expression = self.peek_at(1).is_punct("::");
        if !starts_expression {
            match word.as_str() {
                "namespace" => return self.parse_namespace(),
                "use" => return self.parse_use(),
                "class" | "abstract" | "final" => return self.parse_class(),
                "readonly" if self.peek_at(1).is_keyword("class") => return self.parse_class(),
                "interface" => return self.parse_interface(),
                "function" if !self.peek_at(1).is_punct("(") => return self.parse_function_decl(),
                "if" => return self.parse_if(),
                "while" => {
                    self.advance();
                    let cond = self.parse_paren_expr()?;
                    let body = self.parse_body()?;
                    return Ok(Stmt::new(StmtKind::While { cond, body }, loc));
                }
                "for" => return self.parse_for(),
                "foreach" => return self.parse_foreach(),
                "try" => return self.parse_try(),
                "break" | "continue" => {
                    self.advance();
                    if let TokenKind::Int(levels) = self.peek().kind {
                        if levels != 1 {
                            return Err(self.unsupported("multi-level break/continue"));
                        }
                        self.advance();
                    }
                    self.end_statement()?;
                    let kind = if word == "break" {
                        StmtKind::Break
                    } else {
                        StmtKind::Continue
                    };
                    return Ok(Stmt::new(kind, loc));
                }
                "return" => {
                    self.advance();
                    let value = if self.at_punct(";") || self.at_eof() {
                        None
                    } else {
                        Some(self.parse_expr(0)?)
                    };
                    self.end_statement()?;
                    return Ok(Stmt::new(StmtKind::Return(value), loc));
                }
                "echo" => {
                    self.advance();
                    let mut exprs = vec![self.parse_expr(0)?];
                    while self.eat_punct(",") {
                        exprs.push(self.parse_expr(0)?);
                    }
                    self.end_statement()?;
                    return Ok(Stmt::new(StmtKind::Echo(exprs), loc));
                }
                "throw" => {
                    self.advance();
                    let value = self.parse_expr(0)?;
                    self.end_statement()?;
                    return Ok(Stmt::new(StmtKind::Throw(value), loc));
                }
                "declare" => {
                    // Only directives such as strict_types, which have no runtime effect
                    self.advance();
                    self.expect_punct("(")?;
                    while !self.eat_punct(")") {
                        if self.at_eof() {
                            return Err(self.unexpected("')'"));
                        }
                        self.advance();
                    }
                    self.end_statement()?;
                    return Ok(Stmt::new(StmtKind::Nop, loc));
                }
                "static" if !self.peek_at(1).is_punct("(") && !self.peek_at(1).is_keyword("function") => {
                    return Err(self.unsupported("static variables"));
                }
                w if UNSUPPORTED_KEYWORDS.contains(w) => {
                    return Err(self.unsupported(&format!("'{}'", w)));
                }
                _ => {}
            }
        }

        let expr = self.parse_expr(0)?;
        self.end_statement()?;
        Ok(Stmt::expression(expr))
    }

    fn parse_function_decl(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("function")?;
        self.eat_punct("&");
        let name = self.expect_name()?;
        self.parse_params()?;
        self.parse_return_type()?;
        self.parse_block()?;
        Ok(Stmt::new(StmtKind::Function { name }, loc))
    }

    fn parse_if(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("if")?;
        let cond = self.parse_paren_expr()?;
        let then = self.parse_body()?;
        let mut else_ifs = Vec::new();
        let mut otherwise = None;
        loop {
            if self.eat_keyword("elseif") {
                let cond = self.parse_paren_expr()?;
                let body = self.parse_body()?;
                else_ifs.push(ElseIf { cond, body });
            } else if self.at_keyword("else") && self.peek_at(1).is_keyword("if") {
                self.advance();
                self.advance();
                let cond = self.parse_paren_expr()?;
                let body = self.parse_body()?;
                else_ifs.push(ElseIf { cond, body });
            } else if self.eat_keyword("else") {
                otherwise = Some(self.parse_body()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::new(
            StmtKind::If {
                cond,
                then,
                else_ifs,
                otherwise,
            },
            loc,
        ))
    }

    fn parse_expr_list(&mut self, terminator: &str) -> CompilerResult<Vec<Expr>> {
        let mut exprs = Vec::new();
        while !self.at_punct(terminator) {
            exprs.push(self.parse_expr(0)?);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(terminator)?;
        Ok(exprs)
    }

    fn parse_for(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("for")?;
        self.expect_punct("(")?;
        let init = self.parse_expr_list(";")?;
        let cond = self.parse_expr_list(";")?;
        let step = self.parse_expr_list(")")?;
        let body = self.parse_body()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                cond,
                step,
                body,
            },
            loc,
        ))
    }

    fn parse_foreach(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("foreach")?;
        self.expect_punct("(")?;
        let subject = self.parse_expr(0)?;
        self.expect_keyword("as")?;
        let mut by_ref = self.eat_punct("&");
        let first = self.parse_expr(0)?;
        let (key, value) = if self.eat_punct("=>") {
            if by_ref {
                return Err(self.unsupported("by-reference foreach keys"));
            }
            by_ref = self.eat_punct("&");
            (Some(first), self.parse_expr(0)?)
        } else {
            (None, first)
        };
        self.expect_punct(")")?;
        let body = self.parse_body()?;
        Ok(Stmt::new(
            StmtKind::Foreach {
                subject,
                key,
                value,
                by_ref,
                body,
            },
            loc,
        ))
    }

    fn parse_try(&mut self) -> CompilerResult<Stmt> {
        let loc = self.loc();
        self.expect_keyword("try")?;
        let body = self.parse_block()?;
        let mut catches = Vec::new();
        while self.at_keyword("catch") {
            let cloc = self.loc();
            self.advance();
            self.expect_punct("(")?;
            let mut types = vec![Name::parse(&self.expect_name()?)];
            while self.eat_punct("|") {
                types.push(Name::parse(&self.expect_name()?));
            }
            if !self.at_variable() {
                return Err(self.unsupported("catch without a variable"));
            }
            let var = self.expect_variable()?;
            self.expect_punct(")")?;
            let body = self.parse_block()?;
            catches.push(Catch {
                types,
                var,
                body,
                loc: cloc,
            });
        }
        let finally = if self.eat_keyword("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            return Err(self.unexpected("'catch' or 'finally'"));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                catches,
                finally,
            },
            loc,
        ))
    }

    // ───────────────────────────────────────────────────────────────────────────
    // expressions
    // ───────────────────────────────────────────────────────────────────────────

    fn parse_expr(&mut self, min_bp: u8) -> CompilerResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let token = self.peek().clone();
            let loc = lhs.loc;

            if let TokenKind::Punct(symbol) = &token.kind {
                if let Some(op) = assign_op(symbol) {
                    if !is_assignable(&lhs) {
                        if matches!(lhs.kind, ExprKind::Array(_)) {
                            return Err(self.unsupported("array destructuring"));
                        }
                        return Err(CompilerError::unsupported(
                            "cannot assign to this expression",
                            token.loc,
                        ));
                    }
                    self.advance();
                    if op.is_none() && self.at_punct("&") {
                        return Err(self.unsupported("assignment by reference"));
                    }
                    let value = self.parse_expr(BP_ASSIGN)?;
                    let kind = match op {
                        None => ExprKind::Assign {
                            target: lhs.boxed(),
                            value: value.boxed(),
                        },
                        Some(op) => ExprKind::AssignOp {
                            op,
                            target: lhs.boxed(),
                            value: value.boxed(),
                        },
                    };
                    lhs = Expr::new(kind, loc);
                    continue;
                }
                if symbol == "??" || symbol == "??=" {
                    return Err(self.unsupported("the null coalescing operator"));
                }
                if symbol == "?" {
                    if BP_TERNARY < min_bp {
                        break;
                    }
                    self.advance();
                    let then = if self.eat_punct(":") {
                        None
                    } else {
                        let then = self.parse_expr(BP_ASSIGN)?;
                        self.expect_punct(":")?;
                        Some(then.boxed())
                    };
                    let otherwise = self.parse_expr(BP_TERNARY + 1)?;
                    lhs = Expr::new(
                        ExprKind::Ternary {
                            cond: lhs.boxed(),
                            then,
                            otherwise: otherwise.boxed(),
                        },
                        loc,
                    );
                    continue;
                }
            }

            if token.is_keyword("instanceof") {
                if BP_INSTANCEOF < min_bp {
                    break;
                }
                self.advance();
                let class = match &self.peek().kind {
                    TokenKind::Name(raw) => class_ref_from(raw),
                    TokenKind::Variable(name) => {
                        ClassRef::Dynamic(Expr::variable(name, self.loc()).boxed())
                    }
                    _ => return Err(self.unexpected("a class name")),
                };
                self.advance();
                lhs = Expr::new(
                    ExprKind::Instanceof {
                        expr: lhs.boxed(),
                        class,
                    },
                    loc,
                );
                continue;
            }

            let Some((op, bp)) = binary_op(&token) else {
                break;
            };
            if bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(bp + 1)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    left: lhs.boxed(),
                    right: rhs.boxed(),
                },
                loc,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> CompilerResult<Expr> {
        let loc = self.loc();
        let unary = match &self.peek().kind {
            TokenKind::Punct(p) => match p.as_str() {
                "!" => Some((UnaryOp::Not, BP_NOT)),
                "-" => Some((UnaryOp::Neg, BP_UNARY)),
                "+" => Some((UnaryOp::Plus, BP_UNARY)),
                "~" => Some((UnaryOp::BitNot, BP_UNARY)),
                _ => None,
            },
            _ => None,
        };
        if let Some((op, bp)) = unary {
            self.advance();
            let operand = self.parse_expr(bp)?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: operand.boxed(),
                },
                loc,
            ));
        }

        if self.at_punct("@") {
            return Err(self.unsupported("the error suppression operator"));
        }
        if self.at_punct("&") {
            return Err(self.unsupported("references"));
        }

        if self.at_punct("++") || self.at_punct("--") {
            let kind = if self.at_punct("++") {
                IncDec::PreInc
            } else {
                IncDec::PreDec
            };
            self.advance();
            let target = self.parse_postfix()?;
            return Ok(Expr::new(
                ExprKind::IncDec {
                    kind,
                    target: target.boxed(),
                },
                loc,
            ));
        }

        if self.at_punct("(") {
            if let TokenKind::Name(word) = &self.peek_at(1).kind {
                if let Some(kind) = cast_kind(word) {
                    if self.peek_at(2).is_punct(")") {
                        self.advance();
                        self.advance();
                        self.advance();
                        let operand = self.parse_expr(BP_UNARY)?;
                        return Ok(Expr::new(
                            ExprKind::Cast {
                                kind,
                                expr: operand.boxed(),
                            },
                            loc,
                        ));
                    }
                }
            }
        }

        let base = self.parse_postfix()?;
        if self.eat_punct("**") {
            // Right associative and binds tighter than unary minus on its left
            let exponent = self.parse_unary()?;
            return Ok(Expr::new(
                ExprKind::Binary {
                    op: BinaryOp::Pow,
                    left: base.boxed(),
                    right: exponent.boxed(),
                },
                loc,
            ));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> CompilerResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            let loc = expr.loc;
            if self.eat_punct("->") {
                let name = self.parse_member_name()?;
                if self.at_punct("(") {
                    let args = self.parse_args()?;
                    expr = Expr::new(
                        ExprKind::MethodCall {
                            object: expr.boxed(),
                            name,
                            args,
                        },
                        loc,
                    );
                } else {
                    expr = Expr::new(
                        ExprKind::PropertyFetch {
                            object: expr.boxed(),
                            name,
                        },
                        loc,
                    );
                }
            } else if self.eat_punct("[") {
                let dim = if self.at_punct("]") {
                    None
                } else {
                    Some(self.parse_expr(0)?.boxed())
                };
                self.expect_punct("]")?;
                expr = Expr::new(
                    ExprKind::ArrayDimFetch {
                        target: expr.boxed(),
                        dim,
                    },
                    loc,
                );
            } else if self.at_punct("(") {
                let args = self.parse_args()?;
                expr = Expr::new(
                    ExprKind::FuncCall {
                        callee: Callee::Dynamic(expr.boxed()),
                        args,
                    },
                    loc,
                );
            } else if self.eat_punct("::") {
                expr = self.parse_static_access(ClassRef::Dynamic(expr.boxed()), loc)?;
            } else if self.at_punct("++") || self.at_punct("--") {
                let kind = if self.at_punct("++") {
                    IncDec::PostInc
                } else {
                    IncDec::PostDec
                };
                self.advance();
                expr = Expr::new(
                    ExprKind::IncDec {
                        kind,
                        target: expr.boxed(),
                    },
                    loc,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_member_name(&mut self) -> CompilerResult<MemberName> {
        let loc = self.loc();
        match self.peek().kind.clone() {
            TokenKind::Name(name) => {
                self.advance();
                Ok(MemberName::Ident(name))
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(MemberName::Dynamic(Expr::variable(&name, loc).boxed()))
            }
            TokenKind::Punct(p) if p == "{" => {
                self.advance();
                let expr = self.parse_expr(0)?;
                self.expect_punct("}")?;
                Ok(MemberName::Dynamic(expr.boxed()))
            }
            _ => Err(self.unexpected("a member name")),
        }
    }

    fn parse_static_access(&mut self, class: ClassRef, loc: SourceLocation) -> CompilerResult<Expr> {
        match self.peek().kind.clone() {
            TokenKind::Variable(name) => {
                self.advance();
                if self.at_punct("(") {
                    return Err(self.unsupported("variable static method calls"));
                }
                Ok(Expr::new(ExprKind::StaticPropertyFetch { class, name }, loc))
            }
            TokenKind::Name(name) => {
                self.advance();
                if self.at_punct("(") {
                    let args = self.parse_args()?;
                    Ok(Expr::new(
                        ExprKind::StaticCall {
                            class,
                            name: MemberName::Ident(name),
                            args,
                        },
                        loc,
                    ))
                } else {
                    Ok(Expr::new(ExprKind::ClassConstFetch { class, name }, loc))
                }
            }
            _ => Err(self.unexpected("a member name after '::'")),
        }
    }

    fn parse_args(&mut self) -> CompilerResult<Vec<Arg>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        while !self.at_punct(")") {
            if matches!(self.peek().kind, TokenKind::Name(_)) && self.peek_at(1).is_punct(":") {
                return Err(self.unsupported("named arguments"));
            }
            let unpack = self.eat_punct("...");
            if unpack && self.at_punct(")") {
                return Err(self.unsupported("first-class callable syntax"));
            }
            let value = self.parse_expr(0)?;
            args.push(Arg { value, unpack });
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_array_items(&mut self, close: &str) -> CompilerResult<Vec<ArrayItem>> {
        let mut items = Vec::new();
        while !self.at_punct(close) {
            if self.at_punct(",") {
                return Err(self.unsupported("array destructuring"));
            }
            let unpack = self.eat_punct("...");
            let mut by_ref = self.eat_punct("&");
            let first = self.parse_expr(0)?;
            let item = if !unpack && !by_ref && self.eat_punct("=>") {
                by_ref = self.eat_punct("&");
                ArrayItem {
                    key: Some(first),
                    value: self.parse_expr(0)?,
                    by_ref,
                    unpack,
                }
            } else {
                ArrayItem {
                    key: None,
                    value: first,
                    by_ref,
                    unpack,
                }
            };
            items.push(item);
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(close)?;
        Ok(items)
    }

    fn parse_closure(&mut self, is_static: bool) -> CompilerResult<Expr> {
        let loc = self.loc();
        self.expect_keyword("function")?;
        let by_ref_return = self.eat_punct("&");
        let params = self.parse_params()?;
        let mut uses = Vec::new();
        if self.eat_keyword("use") {
            self.expect_punct("(")?;
            while !self.at_punct(")") {
                let by_ref = self.eat_punct("&");
                let name = self.expect_variable()?;
                uses.push(ClosureUse { name, by_ref });
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct(")")?;
        }
        self.parse_return_type()?;
        let body = self.parse_block()?;
        Ok(Expr::new(
            ExprKind::Closure(Closure {
                params,
                uses,
                body,
                by_ref_return,
                is_static,
                attrs: Attributes::new(),
            }),
            loc,
        ))
    }

    fn skip_balanced_braces(&mut self) -> CompilerResult<()> {
        self.expect_punct("{")?;
        let mut depth = 1usize;
        while depth > 0 {
            if self.at_eof() {
                return Err(self.unexpected("'}'"));
            }
            if self.at_punct("{") {
                depth += 1;
            } else if self.at_punct("}") {
                depth -= 1;
            }
            self.advance();
        }
        Ok(())
    }

    fn parse_new(&mut self) -> CompilerResult<Expr> {
        let loc = self.loc();
        self.expect_keyword("new")?;
        if self.eat_keyword("class") {
            if self.at_punct("(") {
                self.parse_args()?;
            }
            if self.eat_keyword("extends") {
                self.expect_name()?;
            }
            if self.eat_keyword("implements") {
                self.parse_name_list()?;
            }
            self.skip_balanced_braces()?;
            return Ok(Expr::new(ExprKind::AnonymousClass, loc));
        }
        let class = match self.peek().kind.clone() {
            TokenKind::Name(raw) => {
                self.advance();
                class_ref_from(&raw)
            }
            TokenKind::Variable(name) => {
                let vloc = self.loc();
                self.advance();
                ClassRef::Dynamic(Expr::variable(&name, vloc).boxed())
            }
            TokenKind::Punct(p) if p == "(" => ClassRef::Dynamic(self.parse_paren_expr()?.boxed()),
            _ => return Err(self.unexpected("a class name")),
        };
        let args = if self.at_punct("(") {
            self.parse_args()?
        } else {
            Vec::new()
        };
        Ok(Expr::new(ExprKind::New { class, args }, loc))
    }

    fn parse_primary(&mut self) -> CompilerResult<Expr> {
        let loc = self.loc();
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Variable(name) => {
                self.advance();
                Ok(Expr::variable(&name, loc))
            }
            TokenKind::Int(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(v), loc))
            }
            TokenKind::Float(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(v), loc))
            }
            TokenKind::Str(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::String(s), loc))
            }
            TokenKind::Heredoc => Err(self.unsupported("heredoc syntax")),
            TokenKind::Punct(p) => match p.as_str() {
                "(" => self.parse_paren_expr(),
                "[" => {
                    self.advance();
                    let items = self.parse_array_items("]")?;
                    Ok(Expr::new(ExprKind::Array(items), loc))
                }
                "$" => {
                    self.advance();
                    let inner = if self.eat_punct("{") {
                        let inner = self.parse_expr(0)?;
                        self.expect_punct("}")?;
                        inner
                    } else {
                        self.parse_primary()?
                    };
                    Ok(Expr::new(ExprKind::DynamicVariable(inner.boxed()), loc))
                }
                _ => Err(self.unexpected("an expression")),
            },
            TokenKind::Name(raw) => self.parse_name_expr(raw, loc),
            TokenKind::Eof => Err(self.unexpected("an expression")),
        }
    }

    fn parse_name_expr(&mut self, raw: String, loc: SourceLocation) -> CompilerResult<Expr> {
        let word = raw.to_ascii_lowercase();
        let next_is_static = self.peek_at(1).is_punct("::");
        let next_is_call = self.peek_at(1).is_punct("(");

        if !next_is_static {
            match word.as_str() {
                "true" => {
                    self.advance();
                    return Ok(Expr::new(ExprKind::Bool(true), loc));
                }
                "false" => {
                    self.advance();
                    return Ok(Expr::new(ExprKind::Bool(false), loc));
                }
                "null" => {
                    self.advance();
                    return Ok(Expr::new(ExprKind::Null, loc));
                }
                "array" if next_is_call => {
                    self.advance();
                    self.advance();
                    let items = self.parse_array_items(")")?;
                    return Ok(Expr::new(ExprKind::Array(items), loc));
                }
                "isset" if next_is_call => {
                    self.advance();
                    let args = self.parse_args()?;
                    let exprs = args.into_iter().map(|a| a.value).collect();
                    return Ok(Expr::new(ExprKind::Isset(exprs), loc));
                }
                "new" => return self.parse_new(),
                "function" => return self.parse_closure(false),
                "static" if self.peek_at(1).is_keyword("function") => {
                    self.advance();
                    return self.parse_closure(true);
                }
                "throw" => return Err(self.unsupported("throw as an expression")),
                w if UNSUPPORTED_KEYWORDS.contains(w) => {
                    return Err(self.unsupported(&format!("'{}'", w)));
                }
                _ => {}
            }
        }

        self.advance();
        if self.eat_punct("::") {
            return self.parse_static_access(class_ref_from(&raw), loc);
        }
        if self.at_punct("(") {
            let args = self.parse_args()?;
            return Ok(Expr::new(
                ExprKind::FuncCall {
                    callee: Callee::Named(Name::parse(&raw)),
                    args,
                },
                loc,
            ));
        }
        Ok(Expr::new(ExprKind::ConstFetch(Name::parse(&raw)), loc))
    }
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
