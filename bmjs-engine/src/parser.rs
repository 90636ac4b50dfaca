//! Recursive descent from tokens to [`Program`].
//!
//! One method per grammar level, lowest precedence first. Identifiers and string
//! literals are interned while parsing; `var` names are collected per
//! function so the interpreter can hoist them.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;

use crate::ast::*;
use crate::error::{ParseError, ParseResult};
use crate::lexer::tokenize;
use crate::token::{Span, Token, TokenKind};

/// Nesting limit for statements and expressions.
const MAX_DEPTH: usize = 128;

pub struct Parser<'a> {
    /// Always ends with `TokenKind::End`.
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    /// Interned names, in first-seen order.
    atoms: Vec<String>,
    /// Reverse index of `atoms`.
    atom_index: HashMap<String, Atom>,
    /// Function table under construction.
    functions: Vec<FunctionInfo>,
    /// `var` names of each enclosing function, innermost last.
    var_scopes: Vec<Vec<Atom>>,
    /// Guards the Rust stack against deeply nested input.
    depth: usize,
    function_depth: usize,
    /// Loops enclosing the current point, reset at function boundaries.
    loop_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;

        Ok(Parser {
            tokens,
            pos: 0,
            source,
            atoms: Vec::new(),
            atom_index: HashMap::new(),
            functions: Vec::new(),
            var_scopes: Vec::new(),
            depth: 0,
            function_depth: 0,
            loop_depth: 0,
        })
    }

    /// Consume the parser and produce the whole script.
    pub fn parse_script(mut self, name: &str) -> ParseResult<Program> {
        self.var_scopes.push(Vec::new());
        let mut body = Vec::new();

        while !self.done() {
            body.push(self.statement()?);
        }

        let var_names = self.var_scopes.pop().unwrap_or_default();
        Ok(Program {
            name: String::from(name),
            source: String::from(self.source),
            atoms: self.atoms,
            functions: self.functions,
            body,
            var_names,
        })
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        self.enter()?;
        let result = self.statement_inner();
        self.depth -= 1;
        result
    }

    fn statement_inner(&mut self) -> ParseResult<Stmt> {
        match &self.peek().kind {
            TokenKind::Semi => {
                self.bump();
                Ok(Stmt::Empty)
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::Var | TokenKind::Let | TokenKind::Const => {
                let decl = self.var_decl()?;
                self.semicolon()?;
                Ok(Stmt::Var(decl))
            }
            TokenKind::If => self.if_stmt(),
            TokenKind::For => self.for_stmt(),
            TokenKind::While => self.while_stmt(),
            TokenKind::Do => self.do_while_stmt(),
            TokenKind::Break | TokenKind::Continue => self.jump_stmt(),
            TokenKind::Return => self.return_stmt(),
            TokenKind::Throw => self.throw_stmt(),
            TokenKind::Try => self.try_stmt(),
            TokenKind::Function => {
                let id = self.function(true)?;
                Ok(Stmt::Function(id))
            }
            _ => {
                let expression = self.expr()?;
                self.semicolon()?;
                Ok(Stmt::Expr(expression))
            }
        }
    }

    fn block(&mut self) -> ParseResult<Block> {
        self.expect(&TokenKind::LBrace)?;

        let mut body = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.done() {
            body.push(self.statement()?);
        }

        self.expect(&TokenKind::RBrace)?;

        let lexical = body.iter().any(|s| match s {
            Stmt::Var(decl) => decl.kind != DeclKind::Var,
            Stmt::Function(_) => true,
            _ => false,
        });
        Ok(Block { body, lexical })
    }

    /// `var`/`let`/`const` list. The caller handles the terminator.
    fn var_decl(&mut self) -> ParseResult<VarDecl> {
        let kind = match &self.peek().kind {
            TokenKind::Var => DeclKind::Var,
            TokenKind::Let => DeclKind::Let,
            TokenKind::Const => DeclKind::Const,
            _ => return Err(self.unexpected()),
        };
        self.bump();

        let mut declarators = Vec::new();

        loop {
            let name = self.ident()?;
            if kind == DeclKind::Var {
                self.declare_var(name);
            }

            let init = if self.at(&TokenKind::Eq) {
                self.bump();
                Some(self.assign()?)
            } else if kind == DeclKind::Const {
                return Err(self.error("Missing initializer in const declaration"));
            } else {
                None
            };

            declarators.push(Declarator { name, init });

            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.bump();
        }

        Ok(VarDecl { kind, declarators })
    }

    fn if_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(&TokenKind::If)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen)?;

        let then = Box::new(self.statement()?);

        let otherwise = if self.at(&TokenKind::Else) {
            self.bump();
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Ok(Stmt::If(IfStmt {
            cond,
            then,
            otherwise,
        }))
    }

    fn for_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(&TokenKind::For)?;
        self.expect(&TokenKind::LParen)?;

        let init = if self.at(&TokenKind::Semi) {
            None
        } else if matches!(
            self.peek().kind,
            TokenKind::Var | TokenKind::Let | TokenKind::Const
        ) {
            Some(ForInit::Var(self.var_decl()?))
        } else {
            Some(ForInit::Expr(self.expr()?))
        };
        self.expect(&TokenKind::Semi)?;

        let cond = if self.at(&TokenKind::Semi) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&TokenKind::Semi)?;

        let update = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(self.expr()?)
        };
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.loop_body()?);

        Ok(Stmt::For(ForStmt {
            init,
            cond,
            update,
            body,
        }))
    }

    fn while_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen)?;

        let body = Box::new(self.loop_body()?);

        Ok(Stmt::While(WhileStmt { cond, body }))
    }

    fn do_while_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(&TokenKind::Do)?;
        let body = Box::new(self.loop_body()?);
        self.expect(&TokenKind::While)?;
        self.expect(&TokenKind::LParen)?;
        let cond = self.expr()?;
        self.expect(&TokenKind::RParen)?;
        if self.at(&TokenKind::Semi) {
            self.bump();
        }

        Ok(Stmt::DoWhile(DoWhileStmt { body, cond }))
    }

    fn loop_body(&mut self) -> ParseResult<Stmt> {
        self.loop_depth += 1;
        let body = self.statement();
        self.loop_depth -= 1;
        body
    }

    fn jump_stmt(&mut self) -> ParseResult<Stmt> {
        let is_break = self.at(&TokenKind::Break);
        if self.loop_depth == 0 {
            return Err(self.error(if is_break {
                "Illegal break statement"
            } else {
                "Illegal continue statement"
            }));
        }
        self.bump();
        self.semicolon()?;
        Ok(if is_break {
            Stmt::Break
        } else {
            Stmt::Continue
        })
    }

    /// `return` is only legal inside a function body.
    fn return_stmt(&mut self) -> ParseResult<Stmt> {
        if self.function_depth == 0 {
            return Err(self.error("Illegal return statement"));
        }
        self.bump();

        let argument = if self.at(&TokenKind::Semi)
            || self.at(&TokenKind::RBrace)
            || self.done()
            || self.peek().newline_before
        {
            None
        } else {
            Some(self.expr()?)
        };

        self.semicolon()?;
        Ok(Stmt::Return(argument))
    }

    fn throw_stmt(&mut self) -> ParseResult<Stmt> {
        self.bump();
        if self.peek().newline_before {
            return Err(self.error("Illegal newline after throw"));
        }
        let argument = self.expr()?;
        self.semicolon()?;
        Ok(Stmt::Throw(argument))
    }

    fn try_stmt(&mut self) -> ParseResult<Stmt> {
        self.expect(&TokenKind::Try)?;
        let block = self.block()?;

        let catch_clause = if self.at(&TokenKind::Catch) {
            self.bump();
            let param = if self.at(&TokenKind::LParen) {
                self.bump();
                let name = self.ident()?;
                self.expect(&TokenKind::RParen)?;
                Some(name)
            } else {
                None
            };
            let body = self.block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };

        let finally_block = if self.at(&TokenKind::Finally) {
            self.bump();
            Some(self.block()?)
        } else {
            None
        };

        if catch_clause.is_none() && finally_block.is_none() {
            return Err(self.error("Missing catch or finally after try"));
        }

        Ok(Stmt::Try(TryStmt {
            block,
            catch_clause,
            finally_block,
        }))
    }

    /// `function name(params) { body }`. Declarations require a name.
    fn function(&mut self, is_declaration: bool) -> ParseResult<FuncId> {
        let start = self.peek_span();
        self.expect(&TokenKind::Function)?;

        let name = if let TokenKind::Ident(_) = &self.peek().kind {
            Some(self.ident()?)
        } else if is_declaration {
            return Err(self.error("Function statements require a function name"));
        } else {
            None
        };

        self.expect(&TokenKind::LParen)?;
        let params = self.params()?;
        self.expect(&TokenKind::RParen)?;

        self.finish_function(start, name, params, false)
    }

    /// Shorthand method in an object literal. The name is already consumed.
    fn method(&mut self, start: Span, name: Atom) -> ParseResult<FuncId> {
        self.expect(&TokenKind::LParen)?;
        let params = self.params()?;
        self.expect(&TokenKind::RParen)?;
        self.finish_function(start, Some(name), params, false)
    }

    fn arrow_function(&mut self) -> ParseResult<FuncId> {
        let start = self.peek_span();
        let params = if self.at(&TokenKind::LParen) {
            self.bump();
            let params = self.params()?;
            self.expect(&TokenKind::RParen)?;
            params
        } else {
            let mut params = Vec::new();
            params.push(self.ident()?);
            params
        };
        if self.peek().newline_before {
            return Err(self.unexpected());
        }
        self.expect(&TokenKind::Arrow)?;
        self.finish_function(start, None, params, true)
    }

    fn finish_function(
        &mut self,
        start: Span,
        name: Option<Atom>,
        params: Vec<Atom>,
        is_arrow: bool,
    ) -> ParseResult<FuncId> {
        self.var_scopes.push(Vec::new());
        self.function_depth += 1;
        let saved_loops = core::mem::replace(&mut self.loop_depth, 0);

        let body = if is_arrow && !self.at(&TokenKind::LBrace) {
            self.assign().map(FunctionBody::Expr)
        } else {
            self.block().map(|b| FunctionBody::Block(b.body))
        };

        self.loop_depth = saved_loops;
        self.function_depth -= 1;
        let var_names = self.var_scopes.pop().unwrap_or_default();
        let body = body?;

        let id = self.functions.len() as FuncId;
        self.functions.push(FunctionInfo {
            name,
            params,
            body,
            var_names,
            is_arrow,
            span: start.join(self.last_span()),
        });
        Ok(id)
    }

    fn params(&mut self) -> ParseResult<Vec<Atom>> {
        let mut params = Vec::new();

        while !self.at(&TokenKind::RParen) && !self.done() {
            params.push(self.ident()?);

            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.bump();
        }

        Ok(params)
    }

    /// Full expression, comma operator included.
    fn expr(&mut self) -> ParseResult<Expr> {
        let first = self.assign()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }

        let mut expressions = Vec::new();
        expressions.push(first);
        while self.at(&TokenKind::Comma) {
            self.bump();
            expressions.push(self.assign()?);
        }
        Ok(Expr::Sequence(expressions))
    }

    fn assign(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.assign_inner();
        self.depth -= 1;
        result
    }

    fn assign_inner(&mut self) -> ParseResult<Expr> {
        if self.at_arrow() {
            return Ok(Expr::Function(self.arrow_function()?));
        }

        let left = self.conditional()?;

        if self.peek().kind.assigns() {
            if !matches!(left, Expr::Identifier(_) | Expr::Member(_)) {
                return Err(self.error("Invalid left-hand side in assignment"));
            }
            let operator = self.assign_op()?;
            let value = self.assign()?;

            return Ok(Expr::Assignment(AssignmentExpr {
                operator,
                target: Box::new(left),
                value: Box::new(value),
            }));
        }

        Ok(left)
    }

    /// `x =>` or `( ... ) =>` ahead.
    fn at_arrow(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Ident(_) => self.kind_at(self.pos + 1) == Some(&TokenKind::Arrow),
            TokenKind::LParen => {
                let mut depth = 0usize;
                let mut i = self.pos;
                while let Some(kind) = self.kind_at(i) {
                    match kind {
                        TokenKind::LParen => depth += 1,
                        TokenKind::RParen => {
                            depth -= 1;
                            if depth == 0 {
                                return self.kind_at(i + 1) == Some(&TokenKind::Arrow);
                            }
                        }
                        TokenKind::End => return false,
                        _ => {}
                    }
                    i += 1;
                }
                false
            }
            _ => false,
        }
    }

    fn assign_op(&mut self) -> ParseResult<AssignmentOp> {
        let op = match &self.peek().kind {
            TokenKind::Eq => AssignmentOp::Assign,
            TokenKind::PlusEq => AssignmentOp::AddAssign,
            TokenKind::MinusEq => AssignmentOp::SubAssign,
            TokenKind::StarEq => AssignmentOp::MulAssign,
            TokenKind::SlashEq => AssignmentOp::DivAssign,
            TokenKind::PercentEq => AssignmentOp::ModAssign,
            _ => return Err(self.unexpected()),
        };
        self.bump();
        Ok(op)
    }

    fn conditional(&mut self) -> ParseResult<Expr> {
        let cond = self.binary(0)?;

        if self.at(&TokenKind::Question) {
            self.bump();
            let then = self.assign()?;
            self.expect(&TokenKind::Colon)?;
            let otherwise = self.assign()?;

            return Ok(Expr::Conditional(ConditionalExpr {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }));
        }

        Ok(cond)
    }

    /// Precedence climbing over `binary_operator`. `**` is right associative.
    fn binary(&mut self, min_prec: u8) -> ParseResult<Expr> {
        let mut left = self.unary()?;

        loop {
            let (op, prec) = match binary_operator(&self.peek().kind) {
                Some(found) => found,
                None => break,
            };

            if prec < min_prec {
                break;
            }

            self.bump();
            // `**` is right-associative.
            let next = if matches!(op, Operator::Binary(BinaryOp::Exp)) {
                prec
            } else {
                prec + 1
            };
            let right = self.binary(next)?;

            left = match op {
                Operator::Logical(operator) => Expr::Logical(LogicalExpr {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
                Operator::Binary(operator) => Expr::Binary(BinaryExpr {
                    operator,
                    left: Box::new(left),
                    right: Box::new(right),
                }),
            };
        }

        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        let result = self.unary_inner();
        self.depth -= 1;
        result
    }

    fn unary_inner(&mut self) -> ParseResult<Expr> {
        let operator = match &self.peek().kind {
            TokenKind::Bang => UnaryOp::Not,
            TokenKind::Tilde => UnaryOp::BitNot,
            TokenKind::Plus => UnaryOp::Plus,
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Typeof => UnaryOp::Typeof,
            TokenKind::Void => UnaryOp::Void,
            TokenKind::Inc | TokenKind::Dec => {
                let operator = if self.at(&TokenKind::Inc) {
                    UpdateOp::Increment
                } else {
                    UpdateOp::Decrement
                };
                self.bump();
                let argument = self.unary()?;
                self.check_update_target(&argument)?;
                return Ok(Expr::Update(UpdateExpr {
                    operator,
                    argument: Box::new(argument),
                    prefix: true,
                }));
            }
            _ => return self.postfix(),
        };
        self.bump();
        let argument = self.unary()?;
        Ok(Expr::Unary(UnaryExpr {
            operator,
            argument: Box::new(argument),
        }))
    }

    fn postfix(&mut self) -> ParseResult<Expr> {
        let argument = self.lhs()?;

        let operator = match &self.peek().kind {
            TokenKind::Inc if !self.peek().newline_before => UpdateOp::Increment,
            TokenKind::Dec if !self.peek().newline_before => UpdateOp::Decrement,
            _ => return Ok(argument),
        };
        self.check_update_target(&argument)?;
        self.bump();
        Ok(Expr::Update(UpdateExpr {
            operator,
            argument: Box::new(argument),
            prefix: false,
        }))
    }

    fn check_update_target(&self, argument: &Expr) -> ParseResult<()> {
        match argument {
            Expr::Identifier(_) | Expr::Member(_) => Ok(()),
            _ => Err(self.error("Invalid left-hand side expression in update operation")),
        }
    }

    /// Member access, calls and `new`.
    fn lhs(&mut self) -> ParseResult<Expr> {
        let mut expr = if self.at(&TokenKind::New) {
            self.new_expr()?
        } else {
            self.primary()?
        };

        loop {
            match &self.peek().kind {
                TokenKind::Dot | TokenKind::LBracket => {
                    expr = self.member_suffix(expr)?;
                }
                TokenKind::LParen => {
                    let arguments = self.arguments()?;
                    expr = Expr::Call(CallExpr {
                        callee: Box::new(expr),
                        arguments,
                    });
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    /// `new Callee(args)`. The argument list binds to the nearest `new`.
    fn new_expr(&mut self) -> ParseResult<Expr> {
        self.enter()?;
        self.expect(&TokenKind::New)?;

        let mut callee = if self.at(&TokenKind::New) {
            self.new_expr()?
        } else {
            self.primary()?
        };
        while matches!(self.peek().kind, TokenKind::Dot | TokenKind::LBracket) {
            callee = self.member_suffix(callee)?;
        }

        let arguments = if self.at(&TokenKind::LParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        self.depth -= 1;

        Ok(Expr::New(CallExpr {
            callee: Box::new(callee),
            arguments,
        }))
    }

    fn member_suffix(&mut self, object: Expr) -> ParseResult<Expr> {
        let property = if self.at(&TokenKind::Dot) {
            self.bump();
            PropertyName::Named(self.property_ident()?)
        } else {
            self.expect(&TokenKind::LBracket)?;
            let property = self.expr()?;
            self.expect(&TokenKind::RBracket)?;
            PropertyName::Computed(Box::new(property))
        };
        Ok(Expr::Member(MemberExpr {
            object: Box::new(object),
            property,
        }))
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match &self.peek().kind {
            TokenKind::This => {
                self.bump();
                Ok(Expr::This)
            }
            TokenKind::Null => {
                self.bump();
                Ok(Expr::Null)
            }
            TokenKind::True => {
                self.bump();
                Ok(Expr::Boolean(true))
            }
            TokenKind::False => {
                self.bump();
                Ok(Expr::Boolean(false))
            }
            TokenKind::Num(n) => {
                let n = *n;
                self.bump();
                Ok(Expr::Number(n))
            }
            TokenKind::Str(s) => {
                let s = s.clone();
                self.bump();
                Ok(Expr::String(self.intern(s)))
            }
            TokenKind::Ident(_) => Ok(Expr::Identifier(self.ident()?)),
            TokenKind::LParen => {
                self.bump();
                let expr = self.expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBrace => self.object_literal(),
            TokenKind::Function => Ok(Expr::Function(self.function(false)?)),
            _ => Err(self.unexpected()),
        }
    }

    fn object_literal(&mut self) -> ParseResult<Expr> {
        self.expect(&TokenKind::LBrace)?;
        let mut properties = Vec::new();

        while !self.at(&TokenKind::RBrace) && !self.done() {
            let start = self.peek_span();
            let shorthand = matches!(self.peek().kind, TokenKind::Ident(_));
            let key = self.property_name()?;

            let value = if self.at(&TokenKind::Colon) {
                self.bump();
                self.assign()?
            } else if self.at(&TokenKind::LParen) {
                let name = match &key {
                    PropertyName::Named(atom) => *atom,
                    PropertyName::Computed(_) => self.intern(String::new()),
                };
                Expr::Function(self.method(start, name)?)
            } else if shorthand {
                match &key {
                    PropertyName::Named(atom) => Expr::Identifier(*atom),
                    PropertyName::Computed(_) => return Err(self.unexpected()),
                }
            } else {
                return Err(self.unexpected());
            };

            properties.push(ObjectProperty { key, value });

            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.bump();
        }

        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::Object(properties))
    }

    fn property_name(&mut self) -> ParseResult<PropertyName> {
        match &self.peek().kind {
            TokenKind::Str(s) => {
                let s = s.clone();
                self.bump();
                Ok(PropertyName::Named(self.intern(s)))
            }
            TokenKind::Num(n) => {
                let mut text = String::new();
                crate::value::write_number(&mut text, *n).map_err(|_| self.unexpected())?;
                self.bump();
                Ok(PropertyName::Named(self.intern(text)))
            }
            TokenKind::LBracket => {
                self.bump();
                let expr = self.assign()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(PropertyName::Computed(Box::new(expr)))
            }
            _ => Ok(PropertyName::Named(self.property_ident()?)),
        }
    }

    /// `( a, b, )` including the parentheses.
    fn arguments(&mut self) -> ParseResult<Vec<Expr>> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();

        while !self.at(&TokenKind::RParen) && !self.done() {
            args.push(self.assign()?);

            if !self.at(&TokenKind::Comma) {
                break;
            }
            self.bump();
        }

        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn ident(&mut self) -> ParseResult<Atom> {
        if let TokenKind::Ident(name) = &self.peek().kind {
            let name = name.clone();
            self.bump();
            Ok(self.intern(name))
        } else {
            Err(self.unexpected())
        }
    }

    /// Identifier after `.` or as an object key; keywords are allowed.
    fn property_ident(&mut self) -> ParseResult<Atom> {
        let token = self.peek();
        let text = match &token.kind {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Num(_) | TokenKind::Str(_) | TokenKind::End => {
                return Err(self.unexpected())
            }
            _ => {
                let span = token.span;
                match self.source.get(span.start..span.end) {
                    Some(word) if word.bytes().all(|b| b.is_ascii_alphabetic()) => String::from(word),
                    _ => return Err(self.unexpected()),
                }
            }
        };
        self.bump();
        Ok(self.intern(text))
    }

    fn intern(&mut self, text: String) -> Atom {
        if let Some(atom) = self.atom_index.get(&text) {
            return *atom;
        }
        let atom = self.atoms.len() as Atom;
        self.atoms.push(text.clone());
        self.atom_index.insert(text, atom);
        atom
    }

    fn declare_var(&mut self, name: Atom) {
        if let Some(scope) = self.var_scopes.last_mut() {
            if !scope.contains(&name) {
                scope.push(name);
            }
        }
    }

    fn enter(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(self.error("Nesting too deep"));
        }
        Ok(())
    }

    // Token cursor

    fn peek(&self) -> &Token {
        // `tokens` is never empty: it ends with `End`.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind_at(&self, index: usize) -> Option<&TokenKind> {
        self.tokens.get(index).map(|t| &t.kind)
    }

    fn peek_span(&self) -> Span {
        self.peek().span
    }

    fn last_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::default()
        }
    }

    fn done(&self) -> bool {
        self.peek().at_end()
    }

    fn bump(&mut self) {
        if !self.done() {
            self.pos += 1;
        }
    }

    fn at(&self, kind: &TokenKind) -> bool {
        core::mem::discriminant(&self.peek().kind) == core::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.at(kind) {
            self.bump();
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn semicolon(&mut self) -> ParseResult<()> {
        if self.at(&TokenKind::Semi) {
            self.bump();
            return Ok(());
        }
        // Automatic semicolon insertion.
        if self.at(&TokenKind::RBrace) || self.done() || self.peek().newline_before {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn error(&self, message: &str) -> ParseError {
        let span = self.peek_span();
        ParseError::new(message, span.line, span.column)
    }

    fn unexpected(&self) -> ParseError {
        let span = self.peek_span();
        let message = if self.done() {
            String::from("Unexpected end of input")
        } else {
            format!("Unexpected token {}", self.peek().kind)
        };
        ParseError::new(message, span.line, span.column)
    }
}

/// Binary or logical operator.
#[derive(Clone, Copy)]
enum Operator {
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// Operator and precedence of a binary token.
fn binary_operator(kind: &TokenKind) -> Option<(Operator, u8)> {
    use Operator::{Binary, Logical};
    Some(match kind {
        TokenKind::Nullish => (Logical(LogicalOp::Nullish), 3),
        TokenKind::OrOr => (Logical(LogicalOp::Or), 4),
        TokenKind::AndAnd => (Logical(LogicalOp::And), 5),
        TokenKind::Pipe => (Binary(BinaryOp::BitOr), 6),
        TokenKind::Caret => (Binary(BinaryOp::BitXor), 7),
        TokenKind::Amp => (Binary(BinaryOp::BitAnd), 8),
        TokenKind::EqEq => (Binary(BinaryOp::Equal), 9),
        TokenKind::NotEq => (Binary(BinaryOp::NotEqual), 9),
        TokenKind::EqEqEq => (Binary(BinaryOp::StrictEqual), 9),
        TokenKind::NotEqEq => (Binary(BinaryOp::StrictNotEqual), 9),
        TokenKind::Lt => (Binary(BinaryOp::LessThan), 10),
        TokenKind::Le => (Binary(BinaryOp::LessEqual), 10),
        TokenKind::Gt => (Binary(BinaryOp::GreaterThan), 10),
        TokenKind::Ge => (Binary(BinaryOp::GreaterEqual), 10),
        TokenKind::Shl => (Binary(BinaryOp::LeftShift), 11),
        TokenKind::Sar => (Binary(BinaryOp::RightShift), 11),
        TokenKind::Shr => (Binary(BinaryOp::UnsignedRightShift), 11),
        TokenKind::Plus => (Binary(BinaryOp::Add), 12),
        TokenKind::Minus => (Binary(BinaryOp::Sub), 12),
        TokenKind::Star => (Binary(BinaryOp::Mul), 13),
        TokenKind::Slash => (Binary(BinaryOp::Div), 13),
        TokenKind::Percent => (Binary(BinaryOp::Mod), 13),
        TokenKind::StarStar => (Binary(BinaryOp::Exp), 14),
        _ => return None,
    })
}

/// Tokenize and parse `source`, naming it `name` in diagnostics.
pub fn parse(source: &str, name: &str) -> ParseResult<Program> {
    Parser::new(source)?.parse_script(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_empty_program() {
        let program = parse("", "<input>").unwrap();
        assert!(program.body.is_empty());
        assert!(program.atoms.is_empty());
    }

    #[test]
    fn test_atoms_are_interned_once() {
        let program = parse("var a = 'x'; a = a + 'x';", "<input>").unwrap();
        assert_eq!(program.atoms, ["a", "x"]);
        assert_eq!(program.var_names, [0]);
    }

    #[test]
    fn test_precedence() {
        let program = parse("1 + 2 * 3", "<input>").unwrap();
        match &program.body[0] {
            Stmt::Expr(Expr::Binary(b)) => {
                assert_eq!(b.operator, BinaryOp::Add);
                assert!(matches!(*b.right, Expr::Binary(BinaryExpr { operator: BinaryOp::Mul, .. })));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exponent_is_right_associative() {
        let program = parse("2 ** 3 ** 2", "<input>").unwrap();
        match &program.body[0] {
            Stmt::Expr(Expr::Binary(b)) => {
                assert!(matches!(*b.left, Expr::Number(_)));
                assert!(matches!(*b.right, Expr::Binary(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_functions_and_hoisting() {
        let src = "function f(a, b) { var t = a; if (b) { var u = 1; } return t; }\nvar g = (x) => x * 2;";
        let program = parse(src, "<input>").unwrap();
        assert_eq!(program.functions.len(), 2);
        let f = &program.functions[0];
        assert_eq!(f.params.len(), 2);
        assert_eq!(f.var_names.len(), 2);
        assert_eq!(program.function_source(0), "function f(a, b) { var t = a; if (b) { var u = 1; } return t; }");
        assert!(program.functions[1].is_arrow);
        assert_eq!(program.function_source(1), "(x) => x * 2");
        assert_eq!(program.var_names.len(), 1);
    }

    #[test]
    fn test_new_binds_arguments() {
        let program = parse("new Error('x').message", "<input>").unwrap();
        match &program.body[0] {
            Stmt::Expr(Expr::Member(m)) => {
                assert!(matches!(*m.object, Expr::New(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_object_literal_forms() {
        let program = parse("({ a: 1, 'b': 2, 3: c, d, [e]: 5, m() { return 1; }, if: 0 })", "<input>").unwrap();
        match &program.body[0] {
            Stmt::Expr(Expr::Object(props)) => assert_eq!(props.len(), 7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_asi() {
        assert!(parse("var a = 1\nvar b = 2\na + b", "<input>").is_ok());
        assert!(parse("var a = 1 var b = 2", "<input>").is_err());
        let program = parse("function f() { return\n1 }", "<input>").unwrap();
        match &program.functions[0].body {
            FunctionBody::Block(body) => assert!(matches!(body[0], Stmt::Return(None))),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        let err = parse("var = 1", "<input>").unwrap_err();
        assert_eq!(err.message, "Unexpected token =");
        assert_eq!((err.line, err.column), (1, 5));
        assert!(parse("return 1", "<input>").is_err());
        assert!(parse("break", "<input>").is_err());
        assert!(parse("const x;", "<input>").is_err());
        assert!(parse("1 = 2", "<input>").is_err());
        assert!(parse("try {}", "<input>").is_err());
        assert_eq!(parse("f(", "<input>").unwrap_err().message, "Unexpected end of input");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut src = String::new();
        for _ in 0..500 {
            src.push('(');
        }
        src.push('1');
        for _ in 0..500 {
            src.push(')');
        }
        assert_eq!(parse(&src, "<input>").unwrap_err().message, "Nesting too deep");
    }

    proptest! {
        #[test]
        fn prop_parser_never_panics(src in "[a-z0-9(){};=+*/.,'\" \n<>!&|?:-]{0,64}") {
            let _ = parse(&src, "<fuzz>");
        }
    }
}
