//! Recursive-descent parser for lowered templates.
//!
//! The whole template is one token stream, so a block opened in one
//! directive can be closed in a later one; the text and output directives in
//! between become the block body.
//!
//! Operator precedence (lowest → highest):
//!   assign  →  ternary  →  coalesce  →  or  →  and  →  equality  →
//!   relational  →  concat  →  additive  →  multiplicative  →  unary  →
//!   postfix  →  primary

use serde_json::Value;

use super::ast::{BinOp, Expr, LogicalOp, Place, Program, Stmt, StmtKind, UnaryOp};
use super::lexer::{Tok, Token};
use super::Fault;

const KEYWORDS: &[&str] = &[
    "if", "elseif", "else", "endif", "for", "endfor", "foreach", "endforeach", "while",
    "endwhile", "end", "as", "break", "continue", "echo", "true", "false", "null", "and", "or",
    "not",
];

/// Words that close or continue an open block.
const CLOSERS: &[&str] = &["end", "endif", "endfor", "endforeach", "endwhile", "else", "elseif"];

const IF_BRANCH_END: &[&str] = &["endif", "end", "elseif", "else"];
const IF_END: &[&str] = &["endif", "end"];

/// Tag `expr` with the line it was found on.
fn at(line: usize, expr: Expr) -> Expr {
    Expr::At(line, Box::new(expr))
}

/// Parse a token stream into a program.
pub fn parse(tokens: Vec<Token>) -> Result<Program, Fault> {
    let mut parser = Parser { tokens, pos: 0 };
    let body = parser.statements(Until::Eof)?;
    Ok(Program { body })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockStyle {
    /// `if cond: ... endif`
    Colon,
    /// `if (cond) { ... }`
    Brace,
}

#[derive(Debug, Clone, Copy)]
enum Until<'k> {
    Eof,
    Brace,
    Keywords(&'k [&'k str]),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // ── Token helpers ────────────────────────────────────────────────────────

    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok) -> Result<(), Fault> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.expected(&tok.describe()))
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Ident(w) if w == word)
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.is_keyword(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Tok::Semicolon | Tok::CloseTag) {
            self.advance();
        }
    }

    /// Skip separators and blank text between a closing `}` and a possible
    /// `else` in a later directive.
    fn skip_to_else(&mut self) {
        while matches!(self.peek(), Tok::Semicolon | Tok::CloseTag)
            || matches!(self.peek(), Tok::Text(text) if text.trim().is_empty())
        {
            self.advance();
        }
    }

    fn expected(&self, what: &str) -> Fault {
        Fault::new(
            format!("Expected {}, found {}", what, self.peek().describe()),
            self.line(),
        )
    }

    fn unexpected(&self) -> Fault {
        Fault::new(format!("Unexpected {}", self.peek().describe()), self.line())
    }

    // ── Statements ───────────────────────────────────────────────────────────

    fn statements(&mut self, until: Until<'_>) -> Result<Vec<Stmt>, Fault> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                Tok::Eof => {
                    return match until {
                        Until::Eof => Ok(body),
                        Until::Brace => Err(self.expected("'}'")),
                        Until::Keywords(words) => {
                            Err(self.expected(&format!("'{}'", words.first().unwrap_or(&"end"))))
                        }
                    };
                }
                Tok::RBrace if matches!(until, Until::Brace) => {
                    self.advance();
                    return Ok(body);
                }
                Tok::Ident(word) => {
                    if let Until::Keywords(words) = until {
                        if words.contains(&word.as_str()) {
                            return Ok(body);
                        }
                    }
                    if CLOSERS.contains(&word.as_str()) {
                        return Err(self.unexpected());
                    }
                }
                Tok::RBrace => return Err(self.unexpected()),
                _ => {}
            }
            body.push(self.statement()?);
        }
    }

    fn statement(&mut self) -> Result<Stmt, Fault> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Text(text) => {
                self.advance();
                return Ok(Stmt {
                    kind: StmtKind::Text(text),
                    line,
                });
            }
            Tok::OpenEcho => {
                self.advance();
                let expr = self.expr()?;
                self.expect(&Tok::CloseTag)?;
                return Ok(Stmt {
                    kind: StmtKind::Echo(vec![expr]),
                    line,
                });
            }
            Tok::Ident(word) => match word.as_str() {
                "if" => {
                    self.advance();
                    return Ok(Stmt {
                        kind: self.if_stmt()?,
                        line,
                    });
                }
                "for" => {
                    self.advance();
                    return Ok(Stmt {
                        kind: self.for_stmt()?,
                        line,
                    });
                }
                "foreach" => {
                    self.advance();
                    return Ok(Stmt {
                        kind: self.foreach_stmt()?,
                        line,
                    });
                }
                "while" => {
                    self.advance();
                    let cond = self.expr()?;
                    let body = self.block_body("endwhile")?;
                    return Ok(Stmt {
                        kind: StmtKind::While { cond, body },
                        line,
                    });
                }
                "break" => {
                    self.advance();
                    StmtKind::Break
                }
                "continue" => {
                    self.advance();
                    StmtKind::Continue
                }
                "echo" => {
                    self.advance();
                    StmtKind::Echo(self.expr_list()?)
                }
                _ => StmtKind::Expr(self.expr()?),
            },
            _ => StmtKind::Expr(self.expr()?),
        };

        match self.peek() {
            Tok::Semicolon | Tok::CloseTag | Tok::RBrace | Tok::Eof => Ok(Stmt { kind, line }),
            _ => Err(self.expected("';'")),
        }
    }

    fn block_open(&mut self) -> Result<BlockStyle, Fault> {
        if self.eat(&Tok::Colon) {
            Ok(BlockStyle::Colon)
        } else if self.eat(&Tok::LBrace) {
            Ok(BlockStyle::Brace)
        } else {
            Err(self.expected("':' or '{'"))
        }
    }

    fn expect_end(&mut self, word: &str) -> Result<(), Fault> {
        if self.eat_keyword(word) || self.eat_keyword("end") {
            Ok(())
        } else {
            Err(self.expected(&format!("'{word}'")))
        }
    }

    /// Body of a loop in either block style.
    fn block_body(&mut self, end_word: &str) -> Result<Vec<Stmt>, Fault> {
        match self.block_open()? {
            BlockStyle::Brace => self.statements(Until::Brace),
            BlockStyle::Colon => {
                let ends = [end_word, "end"];
                let body = self.statements(Until::Keywords(&ends))?;
                self.expect_end(end_word)?;
                Ok(body)
            }
        }
    }

    /// Consume `elseif` or `else if`.
    fn eat_else_if(&mut self) -> bool {
        if self.eat_keyword("elseif") {
            return true;
        }
        if self.is_keyword("else") && matches!(self.peek_at(1), Tok::Ident(w) if w == "if") {
            self.advance();
            self.advance();
            return true;
        }
        false
    }

    fn if_stmt(&mut self) -> Result<StmtKind, Fault> {
        let cond = self.expr()?;
        let mut branches = Vec::new();
        let mut otherwise = None;

        match self.block_open()? {
            BlockStyle::Brace => {
                branches.push((cond, self.statements(Until::Brace)?));
                loop {
                    let resume = self.pos;
                    self.skip_to_else();
                    if self.eat_else_if() {
                        let cond = self.expr()?;
                        self.expect(&Tok::LBrace)?;
                        branches.push((cond, self.statements(Until::Brace)?));
                        continue;
                    }
                    if self.eat_keyword("else") {
                        self.expect(&Tok::LBrace)?;
                        otherwise = Some(self.statements(Until::Brace)?);
                    } else {
                        self.pos = resume;
                    }
                    break;
                }
            }
            BlockStyle::Colon => {
                branches.push((cond, self.statements(Until::Keywords(IF_BRANCH_END))?));
                loop {
                    if self.eat_else_if() {
                        let cond = self.expr()?;
                        self.expect(&Tok::Colon)?;
                        branches.push((cond, self.statements(Until::Keywords(IF_BRANCH_END))?));
                        continue;
                    }
                    if self.eat_keyword("else") {
                        self.expect(&Tok::Colon)?;
                        otherwise = Some(self.statements(Until::Keywords(IF_END))?);
                    }
                    self.expect_end("endif")?;
                    break;
                }
            }
        }

        Ok(StmtKind::If {
            branches,
            otherwise,
        })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, Fault> {
        self.expect(&Tok::LParen)?;
        let init = self.expr_list_until(&Tok::Semicolon)?;
        self.expect(&Tok::Semicolon)?;
        let cond = self.expr_list_until(&Tok::Semicolon)?;
        self.expect(&Tok::Semicolon)?;
        let step = self.expr_list_until(&Tok::RParen)?;
        self.expect(&Tok::RParen)?;
        let body = self.block_body("endfor")?;
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn foreach_stmt(&mut self) -> Result<StmtKind, Fault> {
        let parenthesized = self.eat(&Tok::LParen);
        let subject = self.expr()?;
        if !self.eat_keyword("as") {
            return Err(self.expected("'as'"));
        }
        let first = self.binding_name()?;
        let (key, value) = if self.eat(&Tok::FatArrow) {
            (Some(first), self.binding_name()?)
        } else {
            (None, first)
        };
        if parenthesized {
            self.expect(&Tok::RParen)?;
        }
        let body = self.block_body("endforeach")?;
        Ok(StmtKind::Foreach {
            subject,
            key,
            value,
            body,
        })
    }

    fn binding_name(&mut self) -> Result<String, Fault> {
        match self.peek().clone() {
            Tok::Var(name) => {
                self.advance();
                Ok(name)
            }
            Tok::Ident(name) if !KEYWORDS.contains(&name.as_str()) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.expected("variable name")),
        }
    }

    // ── Expressions ──────────────────────────────────────────────────────────

    fn expr_list(&mut self) -> Result<Vec<Expr>, Fault> {
        let mut exprs = vec![self.expr()?];
        while self.eat(&Tok::Comma) {
            exprs.push(self.expr()?);
        }
        Ok(exprs)
    }

    fn expr_list_until(&mut self, end: &Tok) -> Result<Vec<Expr>, Fault> {
        if self.check(end) {
            Ok(Vec::new())
        } else {
            self.expr_list()
        }
    }

    pub(super) fn expr(&mut self) -> Result<Expr, Fault> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, Fault> {
        let line = self.line();
        let lhs = self.ternary()?;
        let op = match self.peek() {
            Tok::Assign => None,
            Tok::PlusAssign => Some(BinOp::Add),
            Tok::MinusAssign => Some(BinOp::Sub),
            Tok::StarAssign => Some(BinOp::Mul),
            Tok::SlashAssign => Some(BinOp::Div),
            Tok::DotAssign => Some(BinOp::Concat),
            _ => return Ok(lhs),
        };
        self.advance();
        let target = Place::from_expr(lhs)
            .ok_or_else(|| Fault::new("Cannot assign to this expression", line))?;
        let value = self.assignment()?;
        Ok(at(
            line,
            Expr::Assign {
                target,
                op,
                value: Box::new(value),
            },
        ))
    }

    fn ternary(&mut self) -> Result<Expr, Fault> {
        let cond = self.coalesce()?;
        if !self.eat(&Tok::Question) {
            return Ok(cond);
        }
        let then = self.assignment()?;
        self.expect(&Tok::Colon)?;
        let otherwise = self.assignment()?;
        Ok(Expr::Ternary(
            Box::new(cond),
            Box::new(then),
            Box::new(otherwise),
        ))
    }

    fn coalesce(&mut self) -> Result<Expr, Fault> {
        let lhs = self.or()?;
        if self.eat(&Tok::Coalesce) {
            let rhs = self.coalesce()?;
            return Ok(Expr::Logical(
                LogicalOp::Coalesce,
                Box::new(lhs),
                Box::new(rhs),
            ));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.and()?;
        while self.eat(&Tok::Or) || self.eat_keyword("or") {
            let rhs = self.and()?;
            lhs = Expr::Logical(LogicalOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.equality()?;
        while self.eat(&Tok::And) || self.eat_keyword("and") {
            let rhs = self.equality()?;
            lhs = Expr::Logical(LogicalOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.relational()?;
        loop {
            let op = match self.peek() {
                Tok::Eq => BinOp::Eq,
                Tok::Ne => BinOp::Ne,
                Tok::Identical => BinOp::Identical,
                Tok::NotIdentical => BinOp::NotIdentical,
                _ => return Ok(lhs),
            };
            let line = self.line();
            self.advance();
            let rhs = self.relational()?;
            lhs = at(line, Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    fn relational(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.concat()?;
        loop {
            let op = match self.peek() {
                Tok::Lt => BinOp::Lt,
                Tok::Le => BinOp::Le,
                Tok::Gt => BinOp::Gt,
                Tok::Ge => BinOp::Ge,
                _ => return Ok(lhs),
            };
            let line = self.line();
            self.advance();
            let rhs = self.concat()?;
            lhs = at(line, Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    fn concat(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.additive()?;
        while self.check(&Tok::Dot) {
            let line = self.line();
            self.advance();
            let rhs = self.additive()?;
            lhs = at(line, Expr::Binary(BinOp::Concat, Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            let line = self.line();
            self.advance();
            let rhs = self.multiplicative()?;
            lhs = at(line, Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, Fault> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::Percent => BinOp::Rem,
                _ => return Ok(lhs),
            };
            let line = self.line();
            self.advance();
            let rhs = self.unary()?;
            lhs = at(line, Expr::Binary(op, Box::new(lhs), Box::new(rhs)));
        }
    }

    fn unary(&mut self) -> Result<Expr, Fault> {
        let line = self.line();
        match self.peek() {
            Tok::Bang => {
                self.advance();
                Ok(at(line, Expr::Unary(UnaryOp::Not, Box::new(self.unary()?))))
            }
            Tok::Ident(w) if w == "not" => {
                self.advance();
                Ok(at(line, Expr::Unary(UnaryOp::Not, Box::new(self.unary()?))))
            }
            Tok::Minus => {
                self.advance();
                Ok(at(line, Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?))))
            }
            Tok::Plus => {
                self.advance();
                self.unary()
            }
            Tok::Inc | Tok::Dec => {
                let delta = if self.check(&Tok::Inc) { 1 } else { -1 };
                self.advance();
                let operand = self.unary()?;
                let target = Place::from_expr(operand)
                    .ok_or_else(|| Fault::new("Cannot increment this expression", line))?;
                Ok(at(
                    line,
                    Expr::IncDec {
                        target,
                        delta,
                        prefix: true,
                    },
                ))
            }
            _ => self.postfix(),
        }
    }

    fn postfix(&mut self) -> Result<Expr, Fault> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Tok::LBracket => {
                    let line = self.line();
                    self.advance();
                    if self.eat(&Tok::RBracket) {
                        expr = Expr::Append(Box::new(expr));
                    } else {
                        let key = self.expr()?;
                        self.expect(&Tok::RBracket)?;
                        expr = at(line, Expr::Index(Box::new(expr), Box::new(key)));
                    }
                }
                Tok::Arrow => {
                    let line = self.line();
                    self.advance();
                    let field = match self.peek().clone() {
                        Tok::Ident(name) | Tok::Var(name) => name,
                        _ => return Err(self.expected("property name")),
                    };
                    self.advance();
                    expr = at(line, Expr::Member(Box::new(expr), field));
                }
                Tok::Inc | Tok::Dec => {
                    let line = self.line();
                    let delta = if self.check(&Tok::Inc) { 1 } else { -1 };
                    self.advance();
                    let target = Place::from_expr(expr)
                        .ok_or_else(|| Fault::new("Cannot increment this expression", line))?;
                    return Ok(at(
                        line,
                        Expr::IncDec {
                            target,
                            delta,
                            prefix: false,
                        },
                    ));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, Fault> {
        let token = self.advance();
        match token.tok {
            Tok::Int(n) => Ok(Expr::Literal(Value::from(n))),
            Tok::Float(x) => Ok(Expr::Literal(Value::from(x))),
            Tok::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Tok::Var(name) => Ok(at(token.line, Expr::Var(name))),
            Tok::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                w if KEYWORDS.contains(&w) => {
                    Err(Fault::new(format!("Unexpected '{w}'"), token.line))
                }
                _ => {
                    if self.eat(&Tok::LParen) {
                        let args = self.call_args()?;
                        Ok(at(token.line, Expr::Call(word.clone(), args)))
                    } else {
                        Ok(at(token.line, Expr::Var(word.clone())))
                    }
                }
            },
            Tok::LParen => {
                let expr = self.expr()?;
                self.expect(&Tok::RParen)?;
                Ok(expr)
            }
            Tok::LBracket => self.collection(),
            other => Err(Fault::new(
                format!("Unexpected {}", other.describe()),
                token.line,
            )),
        }
    }

    /// Arguments after an already consumed `(`.
    fn call_args(&mut self) -> Result<Vec<Expr>, Fault> {
        if self.eat(&Tok::RParen) {
            return Ok(Vec::new());
        }
        let args = self.expr_list()?;
        self.expect(&Tok::RParen)?;
        Ok(args)
    }

    /// Array or object literal after an already consumed `[`.
    fn collection(&mut self) -> Result<Expr, Fault> {
        if self.eat(&Tok::RBracket) {
            return Ok(Expr::Array(Vec::new()));
        }
        let first = self.expr()?;

        if self.eat(&Tok::FatArrow) {
            let mut pairs = vec![(first, self.expr()?)];
            while self.eat(&Tok::Comma) {
                if self.check(&Tok::RBracket) {
                    break;
                }
                let key = self.expr()?;
                self.expect(&Tok::FatArrow)?;
                pairs.push((key, self.expr()?));
            }
            self.expect(&Tok::RBracket)?;
            return Ok(Expr::Object(pairs));
        }

        let mut items = vec![first];
        while self.eat(&Tok::Comma) {
            if self.check(&Tok::RBracket) {
                break;
            }
            items.push(self.expr()?);
        }
        self.expect(&Tok::RBracket)?;
        Ok(Expr::Array(items))
    }
}
