//! Recursive-descent / Pratt expression parser (C3, second half).
//!
//! Structured the way `seq-compiler::parser` is structured — a flat
//! token buffer plus a cursor (`pos`) rather than a lazy iterator — but
//! builds arena nodes instead of a boxed AST, and never returns
//! `Result`: every mismatch is pushed onto the shared [`DiagnosticBag`]
//! and parsing continues (spec.md §4.2, design note "diagnostics are
//! values"). Recovery follows spec.md §9's rule: a productive parse
//! either consumes at least one token or resynchronizes to a delimiter.

use crate::diag::{DiagCode, DiagnosticBag};
use crate::lexer::{lex, Token, TokenKind};
use parus_core::ast::*;
use parus_core::{Span, TypeId, TypePool};

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    arena: &'a mut Arena,
    types: &'a mut TypePool,
    diags: &'a mut DiagnosticBag,
    /// Set once the parser hits a condition it cannot usefully recover
    /// from (EOF mid-expression); subsequent top-level parses stop.
    pub aborted: bool,
}

/// Parses `src` into `arena`, appending top-level declarations, and
/// returns the range covering them.
pub fn parse(src: &str, arena: &mut Arena, types: &mut TypePool, diags: &mut DiagnosticBag) -> StmtRange {
    let tokens = lex(src, diags);
    let mut p = Parser {
        tokens,
        pos: 0,
        arena,
        types,
        diags,
        aborted: false,
    };
    let begin = p.arena.stmts.len() as u32;
    while !p.at_eof() && !p.aborted {
        p.parse_top_level();
    }
    p.arena.stmt_range(begin)
}

enum Prefix {
    Borrow(bool),
    Escape,
}

impl<'a> Parser<'a> {
    // -- token cursor --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, text: &str) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            self.diags.error(DiagCode::ExpectedToken, self.peek().span, vec![text.to_string()]);
            if self.at_eof() {
                self.aborted = true;
            }
            false
        }
    }

    fn expect_ident(&mut self) -> String {
        if self.check(TokenKind::Ident) {
            self.advance().text
        } else {
            self.diags.error(DiagCode::ExpectedToken, self.peek().span, vec!["identifier".to_string()]);
            String::new()
        }
    }

    fn prev_span(&self) -> Span {
        self.tokens[self.pos.saturating_sub(1)].span
    }

    /// Consumes tokens until one of `delims` (exclusive) or EOF — the
    /// resync half of spec.md §4.2's recovery contract.
    fn synchronize(&mut self, delims: &[TokenKind]) {
        while !self.at_eof() && !delims.contains(&self.peek().kind) {
            self.advance();
        }
    }

    fn token_begins_expr(&self, kind: TokenKind) -> bool {
        use TokenKind::*;
        matches!(
            kind,
            Ident | IntLiteral
                | FloatLiteral
                | StringLiteral
                | CharLiteral
                | KwTrue
                | KwFalse
                | KwNull
                | KwSelf
                | KwIf
                | KwLoop
                | KwSwitch
                | KwBreak
                | KwContinue
                | KwReturn
                | LParen
                | LBracket
                | LBrace
                | Minus
                | Bang
                | Amp
                | AmpAmp
                | PlusPlus
        )
    }

    fn with_expr<F: FnOnce(&mut Expr)>(&mut self, id: ExprId, f: F) -> ExprId {
        f(&mut self.arena.exprs[id.index()]);
        id
    }

    fn with_stmt<F: FnOnce(&mut Stmt)>(&mut self, id: StmtId, f: F) -> StmtId {
        f(&mut self.arena.stmts[id.index()]);
        id
    }

    fn expr_span(&self, id: ExprId) -> Span {
        self.arena.expr(id).span
    }

    // -- top level --

    fn parse_top_level(&mut self) {
        match self.peek().kind {
            TokenKind::KwFn | TokenKind::KwExtern | TokenKind::KwExport => {
                self.parse_fn_decl();
            }
            TokenKind::KwType => {
                self.parse_type_decl();
            }
            TokenKind::KwActs => {
                self.parse_acts_decl();
            }
            TokenKind::KwLet | TokenKind::KwSet | TokenKind::KwStatic => {
                self.parse_var_decl();
            }
            _ => {
                let tok = self.peek().clone();
                self.diags.error(DiagCode::UnexpectedToken, tok.span, vec![tok.text]);
                self.synchronize(&[TokenKind::Semicolon, TokenKind::KwFn, TokenKind::KwType, TokenKind::KwActs]);
                self.eat(TokenKind::Semicolon);
            }
        }
    }

    // -- types --

    pub fn parse_type(&mut self) -> TypeId {
        let start = self.peek().span;
        let mut amp_count = 0u32;
        let mut prefixes = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::AmpAmp => {
                    amp_count += 2;
                    self.advance();
                    prefixes.push(Prefix::Escape);
                }
                TokenKind::Amp => {
                    amp_count += 1;
                    self.advance();
                    let is_mut = self.eat(TokenKind::KwMut);
                    prefixes.push(Prefix::Borrow(is_mut));
                }
                _ => break,
            }
        }
        let ambiguous = amp_count >= 3;
        if ambiguous {
            self.diags
                .error(DiagCode::AmbiguousAmpPrefixChain, start.to(self.peek().span), vec![]);
        }
        let atom = self.parse_type_atom();
        let mut ty = self.parse_type_suffixes(atom);
        if ambiguous {
            return TypePool::ERROR;
        }
        for p in prefixes.into_iter().rev() {
            ty = match p {
                Prefix::Escape => self.types.make_escape(ty).unwrap_or(TypePool::ERROR),
                Prefix::Borrow(is_mut) => self.types.make_borrow(ty, is_mut),
            };
        }
        ty
    }

    fn parse_type_atom(&mut self) -> TypeId {
        if self.check(TokenKind::Ident) {
            let mut segments = vec![self.advance().text];
            while self.eat(TokenKind::Dot) {
                segments.push(self.expect_ident());
            }
            match self.types.intern_path(&segments) {
                Ok(id) => id,
                Err(_) => {
                    self.diags
                        .error(DiagCode::UnexpectedToken, self.prev_span(), vec![segments.join(".")]);
                    TypePool::ERROR
                }
            }
        } else if self.eat(TokenKind::LParen) {
            let inner = self.parse_type();
            self.expect(TokenKind::RParen, ")");
            inner
        } else {
            let tok = self.peek().clone();
            self.diags.error(DiagCode::UnexpectedToken, tok.span, vec![tok.text]);
            if !self.at_eof() {
                self.advance();
            }
            TypePool::ERROR
        }
    }

    fn parse_type_suffixes(&mut self, mut ty: TypeId) -> TypeId {
        loop {
            if self.eat(TokenKind::Question) {
                ty = self.types.make_optional(ty);
                continue;
            }
            if self.eat(TokenKind::LBracket) {
                if self.eat(TokenKind::RBracket) {
                    ty = self.types.make_array(ty, None);
                    continue;
                }
                if self.check(TokenKind::IntLiteral) {
                    let tok = self.advance();
                    let n: u64 = tok.text.parse().unwrap_or(0);
                    self.expect(TokenKind::RBracket, "]");
                    ty = self.types.make_array(ty, Some(n));
                    continue;
                }
                self.diags.error(DiagCode::ArraySizeExpectedIntLiteral, self.peek().span, vec![]);
                self.synchronize(&[TokenKind::RBracket]);
                self.eat(TokenKind::RBracket);
                ty = self.types.make_array(ty, None);
                continue;
            }
            break;
        }
        ty
    }

    // -- declarations --

    fn parse_fn_prefix(&mut self) -> (Linkage, Abi, FnQualifiers) {
        let mut linkage = Linkage::Internal;
        let mut abi = Abi::Default;
        loop {
            if self.eat(TokenKind::KwExtern) {
                linkage = Linkage::Extern;
                if self.check(TokenKind::StringLiteral) {
                    if self.peek().text.trim_matches('"') == "C" {
                        abi = Abi::C;
                    }
                    self.advance();
                }
                continue;
            }
            if self.eat(TokenKind::KwExport) {
                linkage = Linkage::Export;
                if self.check(TokenKind::StringLiteral) {
                    if self.peek().text.trim_matches('"') == "C" {
                        abi = Abi::C;
                    }
                    self.advance();
                }
                continue;
            }
            break;
        }
        let mut quals = FnQualifiers::default();
        loop {
            if self.check(TokenKind::Ident) && self.peek().text == "pure" {
                quals.is_pure = true;
                self.advance();
                continue;
            }
            if self.check(TokenKind::Ident) && self.peek().text == "comptime" {
                quals.is_comptime = true;
                self.advance();
                continue;
            }
            break;
        }
        (linkage, abi, quals)
    }

    fn parse_fn_decl(&mut self) -> StmtId {
        let start = self.peek().span;
        let (linkage, abi, fn_quals) = self.parse_fn_prefix();
        self.expect(TokenKind::KwFn, "fn");
        let name = if self.check(TokenKind::Ident) {
            self.advance().text
        } else if self.eat(TokenKind::KwOperator) {
            self.expect(TokenKind::LParen, "(");
            let mut op_text = String::new();
            while !self.check(TokenKind::RParen) && !self.at_eof() {
                op_text.push_str(&self.advance().text);
            }
            self.expect(TokenKind::RParen, ")");
            format!("operator({op_text})")
        } else {
            self.diags.error(DiagCode::FnNameExpected, self.peek().span, vec![]);
            String::new()
        };

        self.expect(TokenKind::LParen, "(");
        let params_begin = self.arena.params.len() as u32;
        let named_group_begin = self.arena.named_group_args.len() as u32;
        let mut saw_named_group = false;
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            if self.check(TokenKind::LBrace) {
                if saw_named_group {
                    self.diags.error(DiagCode::FnOnlyOneNamedGroupAllowed, self.peek().span, vec![]);
                }
                saw_named_group = true;
                self.advance();
                while !self.check(TokenKind::RBrace) && !self.at_eof() {
                    let pname = self.expect_ident();
                    self.expect(TokenKind::Colon, ":");
                    let pty = self.parse_type();
                    let default = if self.eat(TokenKind::Eq) { Some(self.parse_expr()) } else { None };
                    let pspan = self.prev_span();
                    self.arena.push_named_group_arg(NamedGroupArg {
                        name: pname,
                        ty: pty,
                        default,
                        span: pspan,
                    });
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "}");
            } else {
                let pname = self.expect_ident();
                self.expect(TokenKind::Colon, ":");
                let pty = self.parse_type();
                let pspan = self.prev_span();
                self.arena.push_param(Param { name: pname, ty: pty, span: pspan });
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, ")");
        let params = self.arena.param_range(params_begin);
        let named_group = self.arena.named_group_range(named_group_begin);

        let ret_type = if self.eat(TokenKind::Arrow) { Some(self.parse_type()) } else { None };

        let body = if self.check(TokenKind::LBrace) {
            self.parse_block_stmts()
        } else {
            self.expect(TokenKind::Semicolon, ";");
            StmtRange::EMPTY
        };

        if abi == Abi::C && named_group != NamedGroupArgRange::EMPTY {
            self.diags.error(DiagCode::AbiCNamedGroupNotAllowed, start, vec![]);
        }

        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::FnDecl, span);
        self.with_stmt(id, |s| {
            s.name = Some(name);
            s.linkage = linkage;
            s.abi = abi;
            s.fn_quals = fn_quals;
            s.params = params;
            s.named_group = named_group;
            s.ret_type = ret_type;
            s.body = body;
        })
    }

    fn parse_type_decl(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'type'
        let name = self.expect_ident();
        self.expect(TokenKind::LBrace, "{");
        let fields_begin = self.arena.field_members.len() as u32;
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            let fname = self.expect_ident();
            self.expect(TokenKind::Colon, ":");
            let fty = self.parse_type();
            let fspan = self.prev_span();
            self.arena.push_field_member(FieldMember { name: fname, ty: fty, span: fspan });
            if !self.expect(TokenKind::Semicolon, ";") {
                self.synchronize(&[TokenKind::Semicolon, TokenKind::RBrace]);
                self.eat(TokenKind::Semicolon);
            }
        }
        self.expect(TokenKind::RBrace, "}");
        let fields = self.arena.field_member_range(fields_begin);
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::TypeDecl, span);
        self.with_stmt(id, |s| {
            s.name = Some(name);
            s.fields = fields;
        })
    }

    fn parse_acts_decl(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'acts'
        self.expect(TokenKind::KwFor, "for");
        let target_ty = self.parse_type();
        self.expect(TokenKind::LBrace, "{");
        let body_begin = self.arena.stmts.len() as u32;
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            if self.check(TokenKind::KwFn) {
                self.parse_fn_decl();
            } else {
                let tok = self.peek().clone();
                self.diags.error(DiagCode::UnexpectedToken, tok.span, vec![tok.text]);
                self.synchronize(&[TokenKind::KwFn, TokenKind::RBrace]);
            }
        }
        self.expect(TokenKind::RBrace, "}");
        let body = self.arena.stmt_range(body_begin);
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::ActsDecl, span);
        self.with_stmt(id, |s| {
            s.declared_type = Some(target_ty);
            s.body = body;
        })
    }

    fn parse_var_decl(&mut self) -> StmtId {
        let start = self.peek().span;
        let is_set = self.check(TokenKind::KwSet);
        let is_static = self.eat(TokenKind::KwStatic);
        if !is_static {
            self.advance(); // 'let' / 'set'
        } else {
            self.expect_var_keyword();
        }
        let is_mut = self.eat(TokenKind::KwMut);
        let name = self.expect_ident();
        let declared_type = if self.eat(TokenKind::Colon) { Some(self.parse_type()) } else { None };
        let init = if self.eat(TokenKind::Eq) {
            self.parse_expr()
        } else {
            if is_set {
                self.diags.error(DiagCode::ExpectedToken, self.peek().span, vec!["=".to_string()]);
            }
            ExprId::INVALID
        };
        self.expect(TokenKind::Semicolon, ";");
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::VarDecl, span);
        self.with_stmt(id, |s| {
            s.name = Some(name);
            s.is_set = is_set;
            s.is_mut = is_mut;
            s.is_static = is_static;
            s.declared_type = declared_type;
            s.init = init;
        })
    }

    /// After a leading `static`, consumes the `let`/`set` keyword (always
    /// required — `static` alone never starts a declaration).
    fn expect_var_keyword(&mut self) {
        if !self.eat(TokenKind::KwLet) {
            self.expect(TokenKind::KwSet, "set");
        }
    }

    // -- statements --

    fn parse_stmt(&mut self) -> StmtId {
        match self.peek().kind {
            TokenKind::KwLet | TokenKind::KwSet | TokenKind::KwStatic => self.parse_var_decl(),
            TokenKind::LBrace => self.parse_stmt_block(),
            TokenKind::KwFn | TokenKind::KwExtern | TokenKind::KwExport => self.parse_fn_decl(),
            TokenKind::KwType => self.parse_type_decl(),
            TokenKind::KwActs => self.parse_acts_decl(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwDo => self.parse_do_while(),
            TokenKind::KwReturn => self.parse_return_stmt(),
            TokenKind::KwBreak => self.parse_break_stmt(),
            TokenKind::KwContinue => self.parse_continue_stmt(),
            TokenKind::Semicolon => {
                let span = self.peek().span;
                self.advance();
                self.arena.new_stmt(StmtKind::Empty, span)
            }
            _ => self.parse_expr_stmt(),
        }
    }

    /// A `{ ... }` used as a statement (loop/if/while bodies); a trailing
    /// expression with no semicolon is folded into an implicit `ExprStmt`
    /// rather than treated as a block-expression tail.
    fn parse_stmt_block(&mut self) -> StmtId {
        let start = self.peek().span;
        let body = self.parse_block_stmts();
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::Block, span);
        self.with_stmt(id, |s| s.body = body)
    }

    /// Parses `{ stmt* }` and returns the statement range; used for block
    /// statements, loop/while/do bodies, and function bodies alike.
    fn parse_block_stmts(&mut self) -> StmtRange {
        self.expect(TokenKind::LBrace, "{");
        let begin = self.arena.stmts.len() as u32;
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            self.parse_stmt();
        }
        self.expect(TokenKind::RBrace, "}");
        self.arena.stmt_range(begin)
    }

    fn parse_while(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'while'
        self.expect(TokenKind::LParen, "(");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, ")");
        let body = self.parse_block_stmts();
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::While, span);
        self.with_stmt(id, |s| {
            s.init = cond;
            s.body = body;
        })
    }

    fn parse_do_while(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'do'
        let body = self.parse_block_stmts();
        self.expect(TokenKind::KwWhile, "while");
        self.expect(TokenKind::LParen, "(");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, ")");
        self.expect(TokenKind::Semicolon, ";");
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::DoWhile, span);
        self.with_stmt(id, |s| {
            s.init = cond;
            s.body = body;
        })
    }

    fn parse_return_stmt(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'return'
        let value = if !self.check(TokenKind::Semicolon) { self.parse_expr() } else { ExprId::INVALID };
        self.expect(TokenKind::Semicolon, ";");
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::Return, span);
        self.with_stmt(id, |s| s.init = value)
    }

    fn parse_break_stmt(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'break'
        let value = if !self.check(TokenKind::Semicolon) { self.parse_expr() } else { ExprId::INVALID };
        self.expect(TokenKind::Semicolon, ";");
        let span = start.to(self.prev_span());
        let id = self.arena.new_stmt(StmtKind::Break, span);
        self.with_stmt(id, |s| s.init = value)
    }

    fn parse_continue_stmt(&mut self) -> StmtId {
        let start = self.peek().span;
        self.advance(); // 'continue'
        self.expect(TokenKind::Semicolon, ";");
        let span = start.to(self.prev_span());
        self.arena.new_stmt(StmtKind::Continue, span)
    }

    fn parse_expr_stmt(&mut self) -> StmtId {
        let e = self.parse_expr();
        self.expect(TokenKind::Semicolon, ";");
        let span = self.expr_span(e);
        let id = self.arena.new_stmt(StmtKind::ExprStmt, span);
        self.with_stmt(id, |s| s.init = e)
    }

    // -- expressions --

    pub fn parse_expr(&mut self) -> ExprId {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> ExprId {
        let lhs = self.parse_ternary();
        if self.eat(TokenKind::Eq) {
            let rhs = self.parse_assign();
            let span = self.expr_span(lhs).to(self.expr_span(rhs));
            let id = self.arena.new_expr(ExprKind::Assign, span);
            return self.with_expr(id, |e| {
                e.op_token = Some(OpToken::Assign);
                e.children[0] = lhs;
                e.children[1] = rhs;
            });
        }
        lhs
    }

    /// Non-nesting ternary (spec.md §4.2): both arms are parsed one level
    /// down (`parse_coalesce`), so a bare nested `?:` is caught explicitly
    /// here instead of silently mis-parsing.
    fn parse_ternary(&mut self) -> ExprId {
        let cond = self.parse_coalesce();
        if !self.check(TokenKind::Question) || !self.token_begins_expr(self.peek_at(1).kind) {
            return cond;
        }
        self.advance(); // '?'
        let then_e = self.parse_coalesce();
        if self.check(TokenKind::Question) && self.token_begins_expr(self.peek_at(1).kind) {
            self.diags.error(DiagCode::NestedTernaryNotAllowed, self.peek().span, vec![]);
            self.advance();
            let _ = self.parse_coalesce();
            self.expect(TokenKind::Colon, ":");
            let _ = self.parse_coalesce();
        }
        self.expect(TokenKind::Colon, ":");
        let else_e = self.parse_coalesce();
        let span = self.expr_span(cond).to(self.expr_span(else_e));
        let id = self.arena.new_expr(ExprKind::Ternary, span);
        self.with_expr(id, |e| {
            e.children[0] = cond;
            e.children[1] = then_e;
            e.children[2] = else_e;
        })
    }

    fn parse_binary_level(&mut self, next: fn(&mut Self) -> ExprId, ops: &[(TokenKind, OpToken)]) -> ExprId {
        let mut lhs = next(self);
        loop {
            let Some(&(_, op)) = ops.iter().find(|(tk, _)| self.check(*tk)) else {
                break;
            };
            self.advance();
            let rhs = next(self);
            let span = self.expr_span(lhs).to(self.expr_span(rhs));
            let id = self.arena.new_expr(ExprKind::Binary, span);
            lhs = self.with_expr(id, |e| {
                e.op_token = Some(op);
                e.children[0] = lhs;
                e.children[1] = rhs;
            });
        }
        lhs
    }

    fn parse_coalesce(&mut self) -> ExprId {
        self.parse_binary_level(Self::parse_or, &[(TokenKind::QuestionQuestion, OpToken::QuestionQuestion)])
    }

    fn parse_or(&mut self) -> ExprId {
        self.parse_binary_level(Self::parse_and, &[(TokenKind::PipePipe, OpToken::OrOr)])
    }

    fn parse_and(&mut self) -> ExprId {
        self.parse_binary_level(Self::parse_equality, &[(TokenKind::AmpAmp, OpToken::AndAnd)])
    }

    fn parse_equality(&mut self) -> ExprId {
        self.parse_binary_level(
            Self::parse_relational,
            &[(TokenKind::EqEq, OpToken::EqEq), (TokenKind::NotEq, OpToken::NotEq)],
        )
    }

    fn parse_relational(&mut self) -> ExprId {
        self.parse_binary_level(
            Self::parse_additive,
            &[
                (TokenKind::Lt, OpToken::Lt),
                (TokenKind::LtEq, OpToken::LtEq),
                (TokenKind::Gt, OpToken::Gt),
                (TokenKind::GtEq, OpToken::GtEq),
            ],
        )
    }

    fn parse_additive(&mut self) -> ExprId {
        self.parse_binary_level(
            Self::parse_multiplicative,
            &[(TokenKind::Plus, OpToken::Plus), (TokenKind::Minus, OpToken::Minus)],
        )
    }

    fn parse_multiplicative(&mut self) -> ExprId {
        self.parse_binary_level(
            Self::parse_cast,
            &[
                (TokenKind::Star, OpToken::Star),
                (TokenKind::Slash, OpToken::Slash),
                (TokenKind::Percent, OpToken::Percent),
            ],
        )
    }

    fn parse_cast(&mut self) -> ExprId {
        let mut e = self.parse_unary();
        while self.check(TokenKind::KwAs) {
            self.advance();
            let op = if self.eat(TokenKind::Question) {
                OpToken::AsOpt
            } else if self.eat(TokenKind::Bang) {
                OpToken::AsBang
            } else {
                OpToken::As
            };
            let to = self.parse_type();
            let span = self.expr_span(e).to(self.prev_span());
            let id = self.arena.new_expr(ExprKind::Cast, span);
            e = self.with_expr(id, |node| {
                node.op_token = Some(op);
                node.children[0] = e;
                node.cast_to = Some(to);
            });
        }
        e
    }

    fn parse_unary(&mut self) -> ExprId {
        let start = self.peek().span;
        let mut amp_count = 0u32;
        let mut prefixes: Vec<OpToken> = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::AmpAmp => {
                    amp_count += 2;
                    self.advance();
                    prefixes.push(OpToken::AmpAmp);
                }
                TokenKind::Amp => {
                    amp_count += 1;
                    self.advance();
                    let is_mut = self.eat(TokenKind::KwMut);
                    prefixes.push(if is_mut { OpToken::AmpMut } else { OpToken::Amp });
                }
                TokenKind::Minus => {
                    self.advance();
                    prefixes.push(OpToken::Minus);
                }
                TokenKind::Bang => {
                    self.advance();
                    prefixes.push(OpToken::Not);
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    prefixes.push(OpToken::PlusPlusPre);
                }
                _ => break,
            }
        }
        if amp_count >= 3 {
            self.diags
                .error(DiagCode::AmbiguousAmpPrefixChain, start.to(self.peek().span), vec![]);
        }
        let mut operand = self.parse_postfix();
        for op in prefixes.into_iter().rev() {
            let kind = match op {
                OpToken::AmpAmp => ExprKind::Escape,
                OpToken::Amp | OpToken::AmpMut => ExprKind::Borrow,
                _ => ExprKind::Unary,
            };
            let span = start.to(self.expr_span(operand));
            let id = self.arena.new_expr(kind, span);
            operand = self.with_expr(id, |e| {
                e.op_token = Some(op);
                e.children[0] = operand;
                e.unary_is_mut = op == OpToken::AmpMut;
            });
        }
        operand
    }

    fn parse_postfix(&mut self) -> ExprId {
        let mut e = self.parse_primary();
        loop {
            match self.peek().kind {
                TokenKind::LParen => e = self.parse_call(e),
                TokenKind::LBracket => e = self.parse_index(e),
                TokenKind::Dot => e = self.parse_field(e),
                TokenKind::PlusPlus => {
                    let span = self.expr_span(e).to(self.peek().span);
                    self.advance();
                    let id = self.arena.new_expr(ExprKind::PostfixInc, span);
                    e = self.with_expr(id, |node| {
                        node.op_token = Some(OpToken::PlusPlusPost);
                        node.children[0] = e;
                    });
                }
                TokenKind::Question => {
                    if self.token_begins_expr(self.peek_at(1).kind) {
                        break;
                    }
                    let span = self.expr_span(e).to(self.peek().span);
                    self.advance();
                    let id = self.arena.new_expr(ExprKind::Unary, span);
                    e = self.with_expr(id, |node| {
                        node.op_token = Some(OpToken::Question);
                        node.children[0] = e;
                    });
                }
                _ => break,
            }
        }
        e
    }

    fn parse_call(&mut self, callee: ExprId) -> ExprId {
        let start = self.expr_span(callee);
        self.advance(); // '('
        let args_begin = self.arena.args.len() as u32;
        let mut seen_label = false;
        while !self.check(TokenKind::RParen) && !self.at_eof() {
            let arg_start = self.peek().span;
            let label = if self.check(TokenKind::Ident) && self.peek_at(1).kind == TokenKind::Colon {
                let t = self.advance().text;
                self.advance(); // ':'
                seen_label = true;
                Some(t)
            } else {
                if seen_label {
                    self.diags.error(
                        DiagCode::UnexpectedToken,
                        self.peek().span,
                        vec!["expected a labeled argument".to_string()],
                    );
                }
                None
            };
            let value = self.parse_expr();
            let span = arg_start.to(self.expr_span(value));
            self.arena.push_arg(Arg { label, value, span });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, ")");
        let args = self.arena.arg_range(args_begin);
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::Call, span);
        self.with_expr(id, |e| {
            e.children[0] = callee;
            e.args = args;
        })
    }

    fn parse_index(&mut self, base: ExprId) -> ExprId {
        let start = self.expr_span(base);
        self.advance(); // '['
        let index = self.parse_range_or_expr();
        self.expect(TokenKind::RBracket, "]");
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::Index, span);
        self.with_expr(id, |e| {
            e.children[0] = base;
            e.children[1] = index;
        })
    }

    /// A bare index or a slice-borrow range `a..b`; the range is
    /// represented as a `Binary` node tagged by `literal_text` (`ast.rs`
    /// has no dedicated range operator, since the only place a range
    /// appears is inside `[...]`).
    fn parse_range_or_expr(&mut self) -> ExprId {
        let lo = self.parse_expr();
        if self.eat(TokenKind::DotDot) {
            let hi = self.parse_expr();
            let span = self.expr_span(lo).to(self.expr_span(hi));
            let id = self.arena.new_expr(ExprKind::Binary, span);
            return self.with_expr(id, |e| {
                e.children[0] = lo;
                e.children[1] = hi;
                e.literal_text = Some("..".to_string());
            });
        }
        lo
    }

    fn parse_field(&mut self, base: ExprId) -> ExprId {
        let start = self.expr_span(base);
        self.advance(); // '.'
        let name = self.expect_ident();
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::Field, span);
        self.with_expr(id, |e| {
            e.children[0] = base;
            e.literal_text = Some(name);
        })
    }

    fn parse_array_literal(&mut self) -> ExprId {
        let start = self.peek().span;
        self.advance(); // '['
        let args_begin = self.arena.args.len() as u32;
        while !self.check(TokenKind::RBracket) && !self.at_eof() {
            let value = self.parse_expr();
            let span = self.expr_span(value);
            self.arena.push_arg(Arg { label: None, value, span });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "]");
        let args = self.arena.arg_range(args_begin);
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::ArrayLiteral, span);
        self.with_expr(id, |e| e.args = args)
    }

    fn parse_if_expr(&mut self) -> ExprId {
        let start = self.peek().span;
        self.advance(); // 'if'
        self.expect(TokenKind::LParen, "(");
        let cond = self.parse_expr();
        self.expect(TokenKind::RParen, ")");
        let then_arm = self.parse_if_arm();
        let else_arm = if self.eat(TokenKind::KwElse) { self.parse_if_arm() } else { ExprOrStmt::None };
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::If, span);
        self.with_expr(id, |e| {
            e.children[0] = cond;
            e.then_arm = then_arm;
            e.else_arm = else_arm;
        })
    }

    /// An if/else arm dispatches to an expression when it is a brace
    /// block, or a bare statement otherwise (spec.md §4.3's
    /// `ExprOrStmt` ambiguity, resolved here at parse time).
    fn parse_if_arm(&mut self) -> ExprOrStmt {
        if self.check(TokenKind::LBrace) {
            ExprOrStmt::Expr(self.parse_block_expr())
        } else if self.check(TokenKind::KwIf) {
            ExprOrStmt::Expr(self.parse_if_expr())
        } else {
            ExprOrStmt::Stmt(self.parse_stmt())
        }
    }

    fn parse_block_expr(&mut self) -> ExprId {
        let start = self.peek().span;
        let (body, tail) = self.parse_block_body();
        let block_span = start.to(self.prev_span());
        let block_stmt = self.arena.new_stmt(StmtKind::Block, block_span);
        self.with_stmt(block_stmt, |s| s.body = body);
        let id = self.arena.new_expr(ExprKind::Block, block_span);
        self.with_expr(id, |e| {
            e.block_stmt = block_stmt;
            e.tail_expr = tail;
        })
    }

    /// Like `parse_block_stmts`, but a trailing expression with no
    /// semicolon before `}` becomes the block's tail value instead of an
    /// implicit statement (spec.md §4.2 "block expressions").
    fn parse_block_body(&mut self) -> (StmtRange, ExprId) {
        self.expect(TokenKind::LBrace, "{");
        let begin = self.arena.stmts.len() as u32;
        let mut tail = ExprId::INVALID;
        while !self.check(TokenKind::RBrace) && !self.at_eof() {
            if self.starts_stmt_only() {
                self.parse_stmt();
                continue;
            }
            let e = self.parse_expr();
            if self.eat(TokenKind::Semicolon) {
                let span = self.expr_span(e);
                let sid = self.arena.new_stmt(StmtKind::ExprStmt, span);
                self.with_stmt(sid, |s| s.init = e);
            } else {
                tail = e;
                break;
            }
        }
        self.expect(TokenKind::RBrace, "}");
        (self.arena.stmt_range(begin), tail)
    }

    fn starts_stmt_only(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::KwLet
                | TokenKind::KwSet
                | TokenKind::KwStatic
                | TokenKind::KwFn
                | TokenKind::KwExtern
                | TokenKind::KwExport
                | TokenKind::KwType
                | TokenKind::KwActs
                | TokenKind::KwWhile
                | TokenKind::KwDo
                | TokenKind::KwReturn
                | TokenKind::Semicolon
        )
    }

    fn parse_loop_expr(&mut self) -> ExprId {
        let start = self.peek().span;
        self.advance(); // 'loop'
        let had_paren = self.eat(TokenKind::LParen);
        if !had_paren {
            self.diags.error(DiagCode::ExpectedToken, self.peek().span, vec!["(".to_string()]);
        }
        let var = if self.check(TokenKind::Ident) { Some(self.advance().text) } else { None };
        self.expect(TokenKind::KwIn, "in");
        let iter = self.parse_expr();
        if had_paren {
            self.expect(TokenKind::RParen, ")");
        }
        let body = self.parse_stmt_block();
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::Loop, span);
        self.with_expr(id, |e| {
            e.loop_var = var;
            e.children[0] = iter;
            e.block_stmt = body;
        })
    }

    fn parse_switch_expr(&mut self) -> ExprId {
        let start = self.peek().span;
        self.advance(); // 'switch'
        self.expect(TokenKind::LParen, "(");
        let scrutinee = self.parse_expr();
        self.expect(TokenKind::RParen, ")");
        self.expect(TokenKind::LBrace, "{");
        let cases_begin = self.arena.switch_cases.len() as u32;
        while self.check(TokenKind::KwCase) {
            let case_start = self.peek().span;
            self.advance();
            let pattern = self.parse_pattern();
            self.expect(TokenKind::Colon, ":");
            let body_begin = self.arena.stmts.len() as u32;
            while !self.check(TokenKind::KwCase) && !self.check(TokenKind::RBrace) && !self.at_eof() {
                self.parse_stmt();
            }
            let body = self.arena.stmt_range(body_begin);
            let case_span = case_start.to(self.prev_span());
            self.arena.push_switch_case(SwitchCase { pattern, body, span: case_span });
        }
        self.expect(TokenKind::RBrace, "}");
        let cases = self.arena.switch_case_range(cases_begin);
        let span = start.to(self.prev_span());
        let id = self.arena.new_expr(ExprKind::Switch, span);
        self.with_expr(id, |e| {
            e.children[0] = scrutinee;
            e.switch_cases = cases;
        })
    }

    fn parse_pattern(&mut self) -> Pattern {
        if self.check(TokenKind::Ident) && self.peek().text == "_" {
            self.advance();
            return Pattern::Wildcard;
        }
        let name = self.expect_ident();
        if self.eat(TokenKind::LParen) {
            let mut bindings = Vec::new();
            if !self.check(TokenKind::RParen) {
                loop {
                    bindings.push(self.expect_ident());
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RParen, ")");
            Pattern::VariantWithBindings { name, bindings }
        } else {
            Pattern::Variant(name)
        }
    }

    fn parse_primary(&mut self) -> ExprId {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::IntLiteral, tok.span);
                self.with_expr(id, |e| e.literal_text = Some(tok.text))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::FloatLiteral, tok.span);
                self.with_expr(id, |e| e.literal_text = Some(tok.text))
            }
            TokenKind::StringLiteral => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::StringLiteral, tok.span);
                self.with_expr(id, |e| e.literal_text = Some(tok.text))
            }
            TokenKind::CharLiteral => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::CharLiteral, tok.span);
                self.with_expr(id, |e| e.literal_text = Some(tok.text))
            }
            TokenKind::KwTrue | TokenKind::KwFalse => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::BoolLiteral, tok.span);
                self.with_expr(id, |e| e.literal_text = Some(tok.text))
            }
            TokenKind::KwNull => {
                self.advance();
                self.arena.new_expr(ExprKind::NullLiteral, tok.span)
            }
            TokenKind::Ident => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::Ident, tok.span);
                self.with_expr(id, |e| e.literal_text = Some(tok.text))
            }
            TokenKind::KwSelf => {
                self.advance();
                let id = self.arena.new_expr(ExprKind::Ident, tok.span);
                self.with_expr(id, |e| e.literal_text = Some("self".to_string()))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr();
                self.expect(TokenKind::RParen, ")");
                let span = tok.span.to(self.prev_span());
                let id = self.arena.new_expr(ExprKind::Paren, span);
                self.with_expr(id, |e| e.children[0] = inner)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_block_expr(),
            TokenKind::KwIf => self.parse_if_expr(),
            TokenKind::KwLoop => self.parse_loop_expr(),
            TokenKind::KwSwitch => self.parse_switch_expr(),
            TokenKind::KwBreak => {
                self.advance();
                let value = if self.token_begins_expr(self.peek().kind) { self.parse_expr() } else { ExprId::INVALID };
                let span = tok.span.to(self.prev_span());
                let id = self.arena.new_expr(ExprKind::Break, span);
                self.with_expr(id, |e| e.children[0] = value)
            }
            TokenKind::KwContinue => {
                self.advance();
                self.arena.new_expr(ExprKind::Continue, tok.span)
            }
            TokenKind::KwReturn => {
                self.advance();
                let value = if self.token_begins_expr(self.peek().kind) { self.parse_expr() } else { ExprId::INVALID };
                let span = tok.span.to(self.prev_span());
                let id = self.arena.new_expr(ExprKind::Return, span);
                self.with_expr(id, |e| e.children[0] = value)
            }
            _ => {
                self.diags.error(DiagCode::UnexpectedToken, tok.span, vec![tok.text]);
                if !self.at_eof() {
                    self.advance();
                } else {
                    self.aborted = true;
                }
                self.arena.new_expr(ExprKind::Error, tok.span)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parus_core::ast::Arena;

    fn parse_src(src: &str) -> (Arena, TypePool, DiagnosticBag, StmtRange) {
        let mut arena = Arena::new();
        let mut types = TypePool::new();
        let mut diags = DiagnosticBag::new();
        let range = parse(src, &mut arena, &mut types, &mut diags);
        (arena, types, diags, range)
    }

    #[test]
    fn parses_a_simple_function() {
        let (arena, _types, diags, range) = parse_src("fn f() -> void { let x: i32 = 1; }");
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        assert_eq!(range.count, 1);
        let f = &arena.stmts_in(range)[0];
        assert_eq!(f.kind, StmtKind::FnDecl);
        assert_eq!(f.name.as_deref(), Some("f"));
    }

    #[test]
    fn ambiguous_amp_chain_is_reported() {
        let (_arena, _types, diags, _range) = parse_src("fn f(p: &&&i32) -> void {}");
        assert!(diags.iter().any(|d| d.code == DiagCode::AmbiguousAmpPrefixChain));
    }

    #[test]
    fn nested_ternary_without_parens_is_reported() {
        let (_arena, _types, diags, _range) =
            parse_src("fn f() -> void { let x: i32 = true ? true ? 1 : 2 : 3; }");
        assert!(diags.iter().any(|d| d.code == DiagCode::NestedTernaryNotAllowed));
    }

    #[test]
    fn parenthesized_nested_ternary_is_allowed() {
        let (_arena, _types, diags, _range) =
            parse_src("fn f() -> void { let x: i32 = true ? (true ? 1 : 2) : 3; }");
        assert!(!diags.iter().any(|d| d.code == DiagCode::NestedTernaryNotAllowed));
    }

    #[test]
    fn postfix_question_vs_ternary_lookahead() {
        // `a?` at end of statement: next token ';' does not begin an
        // expression, so this is postfix `?`, not a ternary missing arms.
        let (arena, _types, diags, range) = parse_src("fn f() -> void { a?; }");
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        let f = &arena.stmts_in(range)[0];
        let body = arena.stmts_in(f.body);
        let e = arena.expr(body[0].init);
        assert_eq!(e.kind, ExprKind::Unary);
        assert_eq!(e.op_token, Some(OpToken::Question));
    }

    #[test]
    fn named_group_params_allow_defaults() {
        let (arena, _types, diags, range) =
            parse_src("fn f(x: i32 { y: i32 = 0 }) -> void {}");
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        let f = &arena.stmts_in(range)[0];
        assert_eq!(f.params.count, 1);
        assert_eq!(f.named_group.count, 1);
        assert!(arena.named_group_in(f.named_group)[0].default.is_some());
    }

    #[test]
    fn borrow_and_escape_prefixes_parse_distinct_kinds() {
        let (arena, _types, diags, range) =
            parse_src("fn f() -> void { let a = &x; let b = &&x; }");
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        let stmts = arena.stmts_in(range);
        let fn_body = arena.stmts_in(stmts[0].body);
        let a_init = arena.expr(fn_body[0].init);
        let b_init = arena.expr(fn_body[1].init);
        assert_eq!(a_init.kind, ExprKind::Borrow);
        assert_eq!(b_init.kind, ExprKind::Escape);
    }
}
