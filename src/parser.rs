//! # Parser
//!
//! `spec.md` §4.D. Recursive-descent for declarations/statements, Pratt for
//! expressions. Operates over the whole pre-tokenized [`Token`] array rather
//! than a lexer-fed stream so that arrow-function lookahead (`(params) =>`
//! vs. a parenthesized expression) can save/restore a token index instead of
//! re-lexing.
//!
//! Grounded on the teacher's recursive-descent `Parser` (`examples/jlgrimes-gen`)
//! for the overall shape — a `tokens: Vec<Token>` + `pos: usize` cursor,
//! `expect`/`check`/`advance` helpers, diagnostics collected rather than
//! returned early — generalized to a full Pratt expression grammar and the
//! `score`/`clip` sub-languages, neither of which the teacher's notation
//! parser has an analogue for.

use crate::ast::*;
use crate::diagnostics::{Diagnostic, DiagnosticCode};
use crate::lexer::{BarBeat as LexBarBeat, Keyword, Lexer, Token, TokenKind};
use crate::source::{FileId, Span};

const MAX_ERRORS: usize = 100;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
}

pub struct ParseResult {
    pub program: Program,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse one file's source text into a [`Program`], collecting lexical and
/// syntactic diagnostics into one list (§4.C, §4.D).
pub fn parse(source: &str, file: FileId) -> ParseResult {
    let (tokens, lex_diags) = Lexer::new(source, file).tokenize();
    let mut parser = Parser {
        tokens,
        pos: 0,
        diagnostics: lex_diags,
    };
    let program = parser.parse_program();
    ParseResult {
        program,
        diagnostics: parser.diagnostics,
    }
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn current_span(&self) -> Span {
        self.tokens[self.pos.min(self.tokens.len() - 1)].span
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn check_kw(&self, kw: &Keyword) -> bool {
        matches!(self.peek(), TokenKind::Keyword(k) if k == kw)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &Keyword) -> bool {
        if self.check_kw(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, span: Span) {
        if self.diagnostics.len() < MAX_ERRORS {
            self.diagnostics.push(Diagnostic::error(code, message, span));
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let span = self.current_span();
            self.error(
                DiagnosticCode::UnexpectedToken,
                format!("expected {what}, found {:?}", self.peek()),
                span,
            );
            None
        }
    }

    /// Unlike [`Self::expect`], compares the `Keyword` payload itself rather
    /// than the `TokenKind::Keyword` discriminant, which every keyword
    /// shares — `expect(&TokenKind::Keyword(Keyword::Kind), ..)` would wrongly
    /// accept `role` too.
    fn expect_kw(&mut self, kw: &Keyword, what: &str) -> Option<Token> {
        if self.check_kw(kw) {
            Some(self.advance())
        } else {
            let span = self.current_span();
            self.error(DiagnosticCode::UnexpectedToken, format!("expected {what}, found {:?}", self.peek()), span);
            None
        }
    }

    fn expect_ident(&mut self) -> Option<(String, Span)> {
        if let TokenKind::Ident(name) = self.peek().clone() {
            let span = self.current_span();
            self.advance();
            Some((name, span))
        } else {
            let span = self.current_span();
            self.error(DiagnosticCode::ExpectedIdentifier, "expected an identifier", span);
            None
        }
    }

    /// Resync to the next `;`, `,`, or a matching `}`, so one bad token does
    /// not cascade into hundreds of follow-on errors (§4.D).
    fn resync(&mut self) {
        let mut depth = 0i32;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    if depth == 0 {
                        self.advance();
                        return;
                    }
                    depth -= 1;
                    self.advance();
                }
                TokenKind::Semicolon | TokenKind::Comma if depth == 0 => {
                    self.advance();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- program / declarations ----------------------------------------

    fn parse_program(&mut self) -> Program {
        let mut imports = Vec::new();
        while self.check_kw(&Keyword::Import) {
            if let Some(import) = self.parse_import() {
                imports.push(import);
            } else {
                self.resync();
            }
        }
        let mut body = Vec::new();
        while !self.at_eof() {
            if self.diagnostics.len() >= MAX_ERRORS {
                break;
            }
            match self.parse_top_decl() {
                Some(decl) => body.push(decl),
                None => self.resync(),
            }
        }
        Program { imports, body }
    }

    /// `import * as ns from "path";` or `import { a, b as c } from "path";`
    fn parse_import(&mut self) -> Option<ImportDecl> {
        let start = self.current_span();
        self.advance(); // `import`
        let kind = if self.check(&TokenKind::LBrace) {
            self.advance();
            let mut names = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                let (name, name_span) = self.expect_ident()?;
                let alias = if self.eat_kw(&Keyword::As) {
                    Some(self.expect_ident()?.0)
                } else {
                    None
                };
                names.push(ImportName { name, alias, span: name_span });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "'}'")?;
            ImportKind::Named(names)
        } else if self.eat(&TokenKind::Star) {
            self.eat_kw(&Keyword::As);
            let (ns, _) = self.expect_ident()?;
            ImportKind::Namespace(ns)
        } else {
            let span = self.current_span();
            self.error(DiagnosticCode::UnexpectedToken, "expected '{' or '*' after 'import'", span);
            return None;
        };
        self.eat_kw(&Keyword::From);
        let path = self.expect_string_literal()?;
        self.eat(&TokenKind::Semicolon);
        Some(ImportDecl { kind, path, span: start })
    }

    fn expect_string_literal(&mut self) -> Option<String> {
        if let TokenKind::Str(s) = self.peek().clone() {
            self.advance();
            Some(s)
        } else {
            let span = self.current_span();
            self.error(DiagnosticCode::ExpectedExpression, "expected a string literal", span);
            None
        }
    }

    fn parse_top_decl(&mut self) -> Option<TopDecl> {
        let start = self.current_span();
        let exported = self.eat_kw(&Keyword::Export);
        if self.check_kw(&Keyword::Fn) {
            self.parse_fn_decl(exported, start).map(TopDecl::Fn)
        } else if self.check_kw(&Keyword::Const) {
            self.parse_const_decl(exported, start).map(TopDecl::Const)
        } else if self.check_kw(&Keyword::Enum) {
            self.parse_enum_decl(exported, start).map(TopDecl::Enum)
        } else if self.check_kw(&Keyword::Let) {
            // §9 open question: `let` is syntactically accepted at module
            // scope, as a non-exported const-shaped declaration, but tagged
            // `was_let` so `crate::validate` can reject it.
            self.advance();
            let (name, _) = self.expect_ident()?;
            self.expect(&TokenKind::Assign, "'='")?;
            let value = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            let span = start.merge(value.span());
            Some(TopDecl::Const(ConstDecl { name, value, exported: false, was_let: true, span }))
        } else {
            let span = self.current_span();
            self.error(
                DiagnosticCode::UnexpectedToken,
                "expected a top-level declaration (fn, const, enum, import)",
                span,
            );
            None
        }
    }

    fn parse_params(&mut self) -> Option<Vec<Param>> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            let span = self.current_span();
            let rest = self.eat(&TokenKind::DotDotEq) || self.eat(&TokenKind::DotDot);
            let (name, _) = self.expect_ident()?;
            let default = if self.eat(&TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            // skip optional `: Type` annotation
            if self.eat(&TokenKind::Colon) {
                let _ = self.expect_ident();
            }
            params.push(Param { name, default, rest, span });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Some(params)
    }

    fn parse_fn_decl(&mut self, exported: bool, start: Span) -> Option<FnDecl> {
        self.advance(); // `fn`
        let (name, _) = self.expect_ident()?;
        let params = self.parse_params()?;
        let return_type = if self.eat(&TokenKind::Arrow) {
            Some(self.expect_ident()?.0)
        } else {
            None
        };
        let body = self.parse_block()?;
        let span = start.merge(self.current_span());
        Some(FnDecl { name, params, return_type, body, exported, span })
    }

    fn parse_const_decl(&mut self, exported: bool, start: Span) -> Option<ConstDecl> {
        self.advance(); // `const`
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::Assign, "'='")?;
        let value = self.parse_expression()?;
        self.eat(&TokenKind::Semicolon);
        let span = start.merge(value.span());
        Some(ConstDecl { name, value, exported, was_let: false, span })
    }

    fn parse_enum_decl(&mut self, exported: bool, start: Span) -> Option<EnumDecl> {
        self.advance(); // `enum`
        let (name, _) = self.expect_ident()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut variants = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            variants.push(self.expect_ident()?.0);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(EnumDecl { name, variants, exported, span: start.merge(end) })
    }

    // ---- statements -------------------------------------------------------

    fn parse_block(&mut self) -> Option<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            if self.diagnostics.len() >= MAX_ERRORS {
                break;
            }
            match self.parse_stmt() {
                Some(s) => stmts.push(s),
                None => self.resync(),
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(stmts)
    }

    fn parse_stmt(&mut self) -> Option<Stmt> {
        let start = self.current_span();
        if self.check_kw(&Keyword::Const) || self.check_kw(&Keyword::Let) {
            let is_const = self.check_kw(&Keyword::Const);
            self.advance();
            let (name, _) = self.expect_ident()?;
            self.expect(&TokenKind::Assign, "'='")?;
            let value = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            let span = start.merge(value.span());
            return Some(Stmt::Local { name, is_const, value, span });
        }
        if self.check_kw(&Keyword::Return) {
            self.advance();
            let value = if self.check(&TokenKind::Semicolon) || self.check(&TokenKind::RBrace) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            let span = start.merge(self.current_span());
            self.eat(&TokenKind::Semicolon);
            return Some(Stmt::Return(value, span));
        }
        if self.check_kw(&Keyword::If) {
            return self.parse_if_stmt(start);
        }
        if self.check_kw(&Keyword::For) {
            return self.parse_for_stmt(start);
        }
        let expr = self.parse_expression()?;
        if self.eat(&TokenKind::Assign) {
            let value = self.parse_expression()?;
            let span = start.merge(value.span());
            self.eat(&TokenKind::Semicolon);
            return Some(Stmt::Assignment { target: expr, value, span });
        }
        self.eat(&TokenKind::Semicolon);
        Some(Stmt::Expr(expr))
    }

    fn parse_if_stmt(&mut self, start: Span) -> Option<Stmt> {
        self.advance(); // `if`
        let cond = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat_kw(&Keyword::Else) {
            if self.check_kw(&Keyword::If) {
                let inner_start = self.current_span();
                Some(vec![self.parse_if_stmt(inner_start)?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        let span = start.merge(self.current_span());
        Some(Stmt::If { cond, then_branch, else_branch, span })
    }

    fn parse_for_stmt(&mut self, start: Span) -> Option<Stmt> {
        self.advance(); // `for`
        let (var, _) = self.expect_ident()?;
        self.eat_kw(&Keyword::In);
        // §8 boundary behavior: `for i in a..=b` with `let`-bound endpoints
        // must surface `ForBoundsNotConst`. Whether a bound identifier was
        // declared via `let` or `const` isn't decidable here — it depends on
        // which binding in an arbitrarily nested enclosing scope the name
        // resolves to — so `crate::eval` checks it against the scope chain
        // at the point the loop actually runs.
        let start_expr = self.parse_range_operand()?;
        let (inclusive, end_expr) = if self.eat(&TokenKind::DotDotEq) {
            (true, self.parse_range_operand()?)
        } else {
            self.expect(&TokenKind::DotDot, "'..' or '..='")?;
            (false, self.parse_range_operand()?)
        };
        let body = self.parse_block()?;
        let span = start.merge(self.current_span());
        Some(Stmt::For { var, start: start_expr, end: end_expr, inclusive, body, span })
    }

    /// Parses one side of a `for`-loop range without recursing back into
    /// `parse_range`, since ranges do not chain (§9 open question).
    fn parse_range_operand(&mut self) -> Option<Expr> {
        self.parse_or()
    }

    // ---- expressions: Pratt precedence climbing ---------------------------
    //
    // low -> high: ternary < nullish (??) < range (.., ..=) < || < && <
    // == != < < <= > >= < + - < * / % < unary < postfix (member/index/call)
    // < primary. Range and ternary/nullish placement is a judgment call
    // (§9 flags the precedence of `..`/`..=` as unspecified in the source).

    pub fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Option<Expr> {
        let cond = self.parse_nullish()?;
        if self.eat(&TokenKind::Question) {
            let then_branch = self.parse_nullish()?;
            self.expect(&TokenKind::Colon, "':'")?;
            let else_branch = self.parse_ternary()?;
            let span = cond.span().merge(else_branch.span());
            return Some(Expr::Ternary {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
                span,
            });
        }
        Some(cond)
    }

    fn parse_nullish(&mut self) -> Option<Expr> {
        let left = self.parse_range()?;
        if self.eat(&TokenKind::QuestionQuestion) {
            let right = self.parse_nullish()?;
            let span = left.span().merge(right.span());
            return Some(Expr::Binary {
                op: BinaryOp::NullishCoalesce,
                left: Box::new(left),
                right: Box::new(right),
                span,
            });
        }
        Some(left)
    }

    fn parse_range(&mut self) -> Option<Expr> {
        let left = self.parse_or()?;
        if self.eat(&TokenKind::DotDotEq) {
            let right = self.parse_or()?;
            let span = left.span().merge(right.span());
            return Some(Expr::Range { start: Box::new(left), end: Box::new(right), inclusive: true, span });
        }
        if self.eat(&TokenKind::DotDot) {
            let right = self.parse_or()?;
            let span = left.span().merge(right.span());
            return Some(Expr::Range { start: Box::new(left), end: Box::new(right), inclusive: false, span });
        }
        Some(left)
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::OrOr) {
            let right = self.parse_and()?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { op: BinaryOp::Or, left: Box::new(left), right: Box::new(right), span };
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_equality()?;
        while self.eat(&TokenKind::AndAnd) {
            let right = self.parse_equality()?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { op: BinaryOp::And, left: Box::new(left), right: Box::new(right), span };
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = if self.eat(&TokenKind::EqEq) {
                BinaryOp::Eq
            } else if self.eat(&TokenKind::NotEq) {
                BinaryOp::NotEq
            } else {
                break;
            };
            let right = self.parse_relational()?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Some(left)
    }

    fn parse_relational(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = if self.eat(&TokenKind::Lt) {
                BinaryOp::Lt
            } else if self.eat(&TokenKind::LtEq) {
                BinaryOp::LtEq
            } else if self.eat(&TokenKind::Gt) {
                BinaryOp::Gt
            } else if self.eat(&TokenKind::GtEq) {
                BinaryOp::GtEq
            } else {
                break;
            };
            let right = self.parse_additive()?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat(&TokenKind::Plus) {
                BinaryOp::Add
            } else if self.eat(&TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let right = self.parse_multiplicative()?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat(&TokenKind::Star) {
                BinaryOp::Mul
            } else if self.eat(&TokenKind::Slash) {
                BinaryOp::Div
            } else if self.eat(&TokenKind::Percent) {
                BinaryOp::Mod
            } else {
                break;
            };
            let right = self.parse_unary()?;
            let span = left.span().merge(right.span());
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        if self.eat(&TokenKind::Minus) {
            let expr = self.parse_unary()?;
            let span = start.merge(expr.span());
            return Some(Expr::Unary { op: UnaryOp::Neg, expr: Box::new(expr), span });
        }
        if self.eat(&TokenKind::Bang) {
            let expr = self.parse_unary()?;
            let span = start.merge(expr.span());
            return Some(Expr::Unary { op: UnaryOp::Not, expr: Box::new(expr), span });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let (prop, prop_span) = self.expect_ident()?;
                let span = expr.span().merge(prop_span);
                expr = Expr::Member { object: Box::new(expr), property: prop, optional: false, span };
            } else if self.eat(&TokenKind::QuestionDot) {
                let (prop, prop_span) = self.expect_ident()?;
                let span = expr.span().merge(prop_span);
                expr = Expr::Member { object: Box::new(expr), property: prop, optional: true, span };
            } else if self.eat(&TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let end = self.current_span();
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index), optional: false, span: expr.span().merge(end) };
            } else if self.eat(&TokenKind::QuestionLBracket) {
                let index = self.parse_expression()?;
                let end = self.current_span();
                self.expect(&TokenKind::RBracket, "']'")?;
                expr = Expr::Index { object: Box::new(expr), index: Box::new(index), optional: true, span: expr.span().merge(end) };
            } else if self.check(&TokenKind::LParen) {
                expr = self.parse_call(expr)?;
            } else {
                break;
            }
        }
        Some(expr)
    }

    fn parse_call(&mut self, callee: Expr) -> Option<Expr> {
        self.advance(); // '('
        let mut args = Vec::new();
        let mut seen_named = false;
        while !self.check(&TokenKind::RParen) && !self.at_eof() {
            let name = if matches!(self.peek(), TokenKind::Ident(_)) && matches!(self.peek_at(1), TokenKind::Colon) {
                let (n, _) = self.expect_ident()?;
                self.advance(); // ':'
                seen_named = true;
                Some(n)
            } else {
                if seen_named {
                    let span = self.current_span();
                    self.error(
                        DiagnosticCode::UnexpectedToken,
                        "positional argument cannot follow a named argument",
                        span,
                    );
                }
                None
            };
            let value = self.parse_expression()?;
            args.push(Arg { name, value });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RParen, "')'")?;
        let span = callee.span().merge(end);
        Some(Expr::Call { callee: Box::new(callee), args, span })
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let start = self.current_span();
        match self.peek().clone() {
            TokenKind::Integer(v) => {
                self.advance();
                Some(Expr::Int(v, start))
            }
            TokenKind::Float(v) => {
                self.advance();
                Some(Expr::Float(v, start))
            }
            TokenKind::Str(s) => {
                self.advance();
                Some(Expr::Str(s, start))
            }
            TokenKind::Pitch(p) => {
                self.advance();
                Some(Expr::Pitch(p.midi, start))
            }
            TokenKind::Duration(d) => {
                self.advance();
                Some(Expr::Duration(d, start))
            }
            TokenKind::BarBeat(LexBarBeat { bar, beat, sub }) => {
                self.advance();
                let span = start;
                Some(Expr::BarBeat { bar, beat, sub, span })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Some(Expr::Bool(true, start))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Some(Expr::Bool(false, start))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Some(Expr::Null(start))
            }
            TokenKind::TemplateFull(s) => {
                self.advance();
                Some(Expr::Template(TemplateLit { parts: vec![s], exprs: vec![], span: start }))
            }
            TokenKind::TemplateHead(_) => self.parse_template(start),
            TokenKind::Ident(name) => {
                // lookahead: `ident => ...` single-param arrow
                if matches!(self.peek_at(1), TokenKind::FatArrow) {
                    self.advance();
                    self.advance(); // '=>'
                    let param = Param { name, default: None, rest: false, span: start };
                    return self.parse_arrow_body(vec![param], start);
                }
                self.advance();
                Some(Expr::Ident(name, start))
            }
            TokenKind::LParen => self.parse_paren_or_arrow(start),
            TokenKind::LBracket => self.parse_array(start),
            TokenKind::LBrace => self.parse_object(start),
            TokenKind::Keyword(Keyword::Match) => self.parse_match(start),
            TokenKind::Keyword(Keyword::Score) => self.parse_score(start),
            TokenKind::Keyword(Keyword::Clip) => self.parse_clip(start),
            _ => {
                let span = self.current_span();
                self.error(DiagnosticCode::ExpectedExpression, format!("expected an expression, found {:?}", self.peek()), span);
                None
            }
        }
    }

    fn parse_template(&mut self, start: Span) -> Option<Expr> {
        let mut parts = Vec::new();
        let mut exprs = Vec::new();
        if let TokenKind::TemplateHead(s) = self.peek().clone() {
            self.advance();
            parts.push(s);
        }
        loop {
            exprs.push(self.parse_expression()?);
            match self.peek().clone() {
                TokenKind::TemplateMiddle(s) => {
                    self.advance();
                    parts.push(s);
                }
                TokenKind::TemplateTail(s) => {
                    self.advance();
                    parts.push(s);
                    break;
                }
                _ => {
                    let span = self.current_span();
                    self.error(DiagnosticCode::UnexpectedToken, "malformed template literal", span);
                    break;
                }
            }
        }
        let span = start.merge(self.current_span());
        Some(Expr::Template(TemplateLit { parts, exprs, span }))
    }

    /// Disambiguates `(expr)` from `(params) => body` by trying the arrow
    /// parse speculatively and rewinding on failure.
    fn parse_paren_or_arrow(&mut self, start: Span) -> Option<Expr> {
        let save = self.pos;
        let saved_diag_len = self.diagnostics.len();
        if let Some(params) = self.try_parse_arrow_params() {
            if self.eat(&TokenKind::FatArrow) {
                return self.parse_arrow_body(params, start);
            }
        }
        self.pos = save;
        self.diagnostics.truncate(saved_diag_len);

        self.advance(); // '('
        let inner = self.parse_expression()?;
        self.expect(&TokenKind::RParen, "')'")?;
        Some(inner)
    }

    fn try_parse_arrow_params(&mut self) -> Option<Vec<Param>> {
        self.parse_params()
    }

    fn parse_arrow_body(&mut self, params: Vec<Param>, start: Span) -> Option<Expr> {
        let body = if self.check(&TokenKind::LBrace) {
            ArrowBody::Block(self.parse_block()?)
        } else {
            ArrowBody::Expr(Box::new(self.parse_expression()?))
        };
        let span = start.merge(self.current_span());
        Some(Expr::Arrow { params, body, span })
    }

    fn parse_array(&mut self, start: Span) -> Option<Expr> {
        self.advance(); // '['
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBracket) && !self.at_eof() {
            items.push(self.parse_expression()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBracket, "']'")?;
        Some(Expr::Array(items, start.merge(end)))
    }

    fn parse_object(&mut self, start: Span) -> Option<Expr> {
        self.advance(); // '{'
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let key = match self.peek().clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    ObjectKey::Ident(name)
                }
                TokenKind::Str(s) => {
                    self.advance();
                    ObjectKey::Str(s)
                }
                _ => {
                    let span = self.current_span();
                    self.error(DiagnosticCode::ExpectedIdentifier, "expected an object key", span);
                    return None;
                }
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.parse_expression()?;
            fields.push((key, value));
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(Expr::Object(fields, start.merge(end)))
    }

    fn parse_match(&mut self, start: Span) -> Option<Expr> {
        self.advance(); // `match`
        let scrutinee = self.parse_expression()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let pattern = if self.eat_kw(&Keyword::Else) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            self.expect(&TokenKind::FatArrow, "'=>'")?;
            let body = self.parse_expression()?;
            arms.push(MatchArm { pattern, body });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(Expr::Match { scrutinee: Box::new(scrutinee), arms, span: start.merge(end) })
    }

    // ---- score { ... } (§3.3, §4.D) ---------------------------------------

    fn parse_score(&mut self, start: Span) -> Option<Expr> {
        self.advance(); // `score`
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut items = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_score_item() {
                Some(item) => items.push(item),
                None => {
                    let span = self.current_span();
                    self.error(
                        DiagnosticCode::UnexpectedToken,
                        "expected one of: meta, tempo, meter, sound, track, marker",
                        span,
                    );
                    self.resync();
                }
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(Expr::Score(ScoreExpr { items, span: start.merge(end) }))
    }

    fn parse_score_item(&mut self) -> Option<ScoreItem> {
        let start = self.current_span();
        if matches!(self.peek(), TokenKind::Ident(n) if n == "meta") {
            self.advance();
            self.expect(&TokenKind::LBrace, "'{'")?;
            let mut fields = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                let (name, _) = self.expect_ident()?;
                let value = self.parse_expression()?;
                self.eat(&TokenKind::Semicolon);
                fields.push((name, value));
            }
            let end = self.current_span();
            self.expect(&TokenKind::RBrace, "'}'")?;
            return Some(ScoreItem::Meta(MetaBlock { fields, span: start.merge(end) }));
        }
        if self.check_kw(&Keyword::Tempo) {
            self.advance();
            self.expect(&TokenKind::LBrace, "'{'")?;
            let mut entries = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                let e_start = self.current_span();
                let pos = self.parse_expression()?;
                self.expect(&TokenKind::Arrow, "'->'")?;
                let bpm = self.parse_expression()?;
                // trailing `bpm` unit marker, e.g. `120bpm`
                if matches!(self.peek(), TokenKind::Ident(n) if n == "bpm") {
                    self.advance();
                }
                self.eat(&TokenKind::Semicolon);
                entries.push(TempoEntry { pos, bpm, span: e_start.merge(self.current_span()) });
            }
            let end = self.current_span();
            self.expect(&TokenKind::RBrace, "'}'")?;
            return Some(ScoreItem::Tempo(TempoBlock { entries, span: start.merge(end) }));
        }
        if self.check_kw(&Keyword::Meter) {
            self.advance();
            self.expect(&TokenKind::LBrace, "'{'")?;
            let mut entries = Vec::new();
            while !self.check(&TokenKind::RBrace) && !self.at_eof() {
                let e_start = self.current_span();
                let pos = self.parse_expression()?;
                self.expect(&TokenKind::Arrow, "'->'")?;
                let (numerator, denominator) = self.parse_meter_fraction()?;
                self.eat(&TokenKind::Semicolon);
                entries.push(MeterEntry { pos, numerator, denominator, span: e_start.merge(self.current_span()) });
            }
            let end = self.current_span();
            self.expect(&TokenKind::RBrace, "'}'")?;
            return Some(ScoreItem::Meter(MeterBlock { entries, span: start.merge(end) }));
        }
        if self.check_kw(&Keyword::Sound) {
            return self.parse_sound_decl(start).map(ScoreItem::Sound);
        }
        if self.check_kw(&Keyword::Track) {
            return self.parse_track_decl(start).map(ScoreItem::Track);
        }
        if self.check_kw(&Keyword::Marker) {
            self.advance();
            let pos = self.parse_expression()?;
            self.expect_kw(&Keyword::Kind, "'kind'")?;
            let kind = self.parse_expression()?;
            self.expect_kw(&Keyword::Label, "'label'")?;
            let label = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            let span = start.merge(self.current_span());
            return Some(ScoreItem::Marker(ScoreMarker { pos, kind, label, span }));
        }
        None
    }

    /// `4/4`, `6/8` — lexed as a single reduced `Duration` token, so the
    /// original numerator/denominator is recovered from the raw lexeme
    /// rather than from the (already-reduced) `Rat` value.
    fn parse_meter_fraction(&mut self) -> Option<(i64, i64)> {
        if let TokenKind::Duration(_) = self.peek() {
            let lexeme = self.tokens[self.pos].lexeme.clone();
            let span = self.current_span();
            self.advance();
            let mut parts = lexeme.splitn(2, '/');
            let n = parts.next().and_then(|s| s.parse::<i64>().ok());
            let d = parts.next().and_then(|s| s.parse::<i64>().ok());
            match (n, d) {
                (Some(n), Some(d)) => Some((n, d)),
                _ => {
                    self.error(DiagnosticCode::BadMeterDenominator, "expected a meter fraction like 4/4", span);
                    None
                }
            }
        } else if let TokenKind::Integer(n) = self.peek().clone() {
            self.advance();
            self.expect(&TokenKind::Slash, "'/'")?;
            if let TokenKind::Integer(d) = self.peek().clone() {
                self.advance();
                Some((n, d))
            } else {
                let span = self.current_span();
                self.error(DiagnosticCode::BadMeterDenominator, "expected a meter denominator", span);
                None
            }
        } else {
            let span = self.current_span();
            self.error(DiagnosticCode::BadMeterDenominator, "expected a meter fraction like 4/4", span);
            None
        }
    }

    fn parse_sound_decl(&mut self, start: Span) -> Option<SoundDecl> {
        self.advance(); // `sound`
        let id = self.parse_expression()?;
        self.expect_kw(&Keyword::Kind, "'kind'")?;
        let kind_span = self.current_span();
        let (kind, _) = self.expect_ident()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let (name, _) = self.expect_ident()?;
            let value = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            fields.push((name, value));
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(SoundDecl { id, kind, kind_span, fields, span: start.merge(end) })
    }

    fn parse_track_decl(&mut self, start: Span) -> Option<TrackDecl> {
        self.advance(); // `track`
        let name = self.parse_expression()?;
        self.expect_kw(&Keyword::Role, "'role'")?;
        let role_span = self.current_span();
        let (role, _) = self.expect_ident()?;
        self.expect_kw(&Keyword::Sound, "'sound'")?;
        let sound = self.parse_expression()?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut placements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            let p_start = self.current_span();
            self.expect_kw(&Keyword::Place, "'place'")?;
            let pos = self.parse_expression()?;
            let clip = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            placements.push(PlaceStmt { pos, clip, span: p_start.merge(self.current_span()) });
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(TrackDecl { name, role, role_span, sound, placements, span: start.merge(end) })
    }

    // ---- clip { ... } (§3.3, §4.D, §4.G) ----------------------------------

    fn parse_clip(&mut self, start: Span) -> Option<Expr> {
        self.advance(); // `clip`
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut stmts = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_eof() {
            match self.parse_clip_stmt() {
                Some(stmt) => stmts.push(stmt),
                None => {
                    let span = self.current_span();
                    self.error(
                        DiagnosticCode::UnexpectedToken,
                        "expected one of: at, rest, note, chord, hit, cc, automation, marker",
                        span,
                    );
                    self.resync();
                }
            }
        }
        let end = self.current_span();
        self.expect(&TokenKind::RBrace, "'}'")?;
        Some(Expr::Clip(ClipExpr { stmts, span: start.merge(end) }))
    }

    fn parse_clip_stmt(&mut self) -> Option<ClipStmt> {
        let start = self.current_span();
        if matches!(self.peek(), TokenKind::Ident(n) if n == "at") {
            self.advance();
            let pos = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::At(pos));
        }
        if self.check_kw(&Keyword::Rest) {
            self.advance();
            self.expect(&TokenKind::LParen, "'('")?;
            let dur = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Rest { dur, span: start.merge(self.current_span()) });
        }
        if self.check_kw(&Keyword::Note) {
            self.advance();
            self.expect(&TokenKind::LParen, "'('")?;
            let pitch = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let dur = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Note { pitch, dur, span: start.merge(self.current_span()) });
        }
        if self.check_kw(&Keyword::Chord) {
            self.advance();
            self.expect(&TokenKind::LParen, "'('")?;
            let pitches = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let dur = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Chord { pitches, dur, span: start.merge(self.current_span()) });
        }
        if self.check_kw(&Keyword::Hit) {
            self.advance();
            self.expect(&TokenKind::LParen, "'('")?;
            let sound = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let dur = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Hit { sound, dur, span: start.merge(self.current_span()) });
        }
        if self.check_kw(&Keyword::Cc) {
            self.advance();
            self.expect(&TokenKind::LParen, "'('")?;
            let controller = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let value = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Cc { controller, value, span: start.merge(self.current_span()) });
        }
        if self.check_kw(&Keyword::Automation) {
            self.advance();
            self.expect(&TokenKind::LParen, "'('")?;
            let param = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let value = self.parse_expression()?;
            self.expect(&TokenKind::Comma, "','")?;
            let dur = self.parse_expression()?;
            self.expect(&TokenKind::RParen, "')'")?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Automation { param, value, dur, span: start.merge(self.current_span()) });
        }
        if self.check_kw(&Keyword::Marker) {
            self.advance();
            self.expect_kw(&Keyword::Kind, "'kind'")?;
            let kind = self.parse_expression()?;
            self.expect_kw(&Keyword::Label, "'label'")?;
            let label = self.parse_expression()?;
            self.eat(&TokenKind::Semicolon);
            return Some(ClipStmt::Marker { kind, label, span: start.merge(self.current_span()) });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileId;

    fn parse_ok(src: &str) -> Program {
        let result = parse(src, FileId(0));
        assert!(result.diagnostics.is_empty(), "unexpected diagnostics: {:?}", result.diagnostics);
        result.program
    }

    #[test]
    fn parses_const_decl() {
        let program = parse_ok("const x = 1 + 2;");
        assert_eq!(program.body.len(), 1);
        assert_eq!(program.body[0].name(), "x");
    }

    #[test]
    fn parses_exported_fn_with_params_and_return_type() {
        let program = parse_ok("export fn add(a, b = 1) -> Int { return a + b; }");
        match &program.body[0] {
            TopDecl::Fn(f) => {
                assert!(f.exported);
                assert_eq!(f.params.len(), 2);
                assert_eq!(f.return_type.as_deref(), Some("Int"));
            }
            _ => panic!("expected fn"),
        }
    }

    #[test]
    fn parses_arrow_function() {
        let program = parse_ok("const f = (x) => x + 1;");
        match &program.body[0] {
            TopDecl::Const(c) => assert!(matches!(c.value, Expr::Arrow { .. })),
            _ => panic!(),
        }
    }

    #[test]
    fn parses_single_ident_arrow() {
        let program = parse_ok("const f = x => x;");
        match &program.body[0] {
            TopDecl::Const(c) => assert!(matches!(c.value, Expr::Arrow { .. })),
            _ => panic!(),
        }
    }

    #[test]
    fn parses_named_import() {
        let program = parse_ok(r#"import { a, b as c } from "std:core";"#);
        assert_eq!(program.imports.len(), 1);
        assert_eq!(program.imports[0].path, "std:core");
    }

    #[test]
    fn parses_minimal_score_s1() {
        let src = r#"
            export fn main() -> Score {
              return score {
                tempo { 1:1 -> 120bpm; }
                meter { 1:1 -> 4/4; }
                sound "s" kind instrument { label "S"; }
                track "T" role Instrument sound "s" {
                  place 1:1 clip { note(C4, 1/4); };
                }
              };
            }
        "#;
        let program = parse_ok(src);
        assert_eq!(program.body.len(), 1);
    }

    #[test]
    fn meter_fraction_preserves_unreduced_denominator() {
        let src = "export fn main() -> Score { return score { meter { 1:1 -> 6/8; } }; }";
        let program = parse_ok(src);
        let TopDecl::Fn(f) = &program.body[0] else { panic!() };
        let Stmt::Return(Some(Expr::Score(score)), _) = &f.body[0] else { panic!() };
        let ScoreItem::Meter(block) = &score.items[0] else { panic!() };
        assert_eq!(block.entries[0].numerator, 6);
        assert_eq!(block.entries[0].denominator, 8);
    }

    #[test]
    fn ternary_and_range_precedence() {
        let program = parse_ok("const x = 1 < 2 ? 3 : 4;");
        match &program.body[0] {
            TopDecl::Const(c) => assert!(matches!(c.value, Expr::Ternary { .. })),
            _ => panic!(),
        }
    }

    #[test]
    fn named_args_after_positional() {
        let program = parse_ok("const x = f(1, b: 2);");
        match &program.body[0] {
            TopDecl::Const(c) => match &c.value {
                Expr::Call { args, .. } => {
                    assert_eq!(args.len(), 2);
                    assert_eq!(args[1].name.as_deref(), Some("b"));
                }
                _ => panic!(),
            },
            _ => panic!(),
        }
    }

    #[test]
    fn unexpected_token_reports_diagnostic_and_recovers() {
        let result = parse(";;; const x = 1;", FileId(0));
        assert!(!result.diagnostics.is_empty());
    }
}
