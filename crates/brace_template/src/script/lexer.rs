//! Tokenizer for lowered template source units.
//!
//! Outside directives the lexer produces [`Tok::Text`] chunks. Inside a
//! `<?tpl ... ?>` directive it produces code tokens followed by
//! [`Tok::CloseTag`]; an output directive (`<?tpl= ... ?>`) is introduced by
//! [`Tok::OpenEcho`].

use super::Fault;
use crate::transform::{CLOSE_TAG, ECHO_MARK, OPEN_TAG};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    // Template structure
    Text(String),
    OpenEcho,
    CloseTag,

    // Literals and names
    Int(i64),
    Float(f64),
    Str(String),
    /// `$name`
    Var(String),
    /// Bare word: keyword, function name or sigil-less variable
    Ident(String),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Colon,
    Question,
    Coalesce, // ??
    Dot,
    Arrow,     // ->
    FatArrow,  // =>

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    DotAssign,
    Eq,
    Ne,
    Identical,    // ===
    NotIdentical, // !==
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Inc,
    Dec,

    Eof,
}

impl Tok {
    /// Short description used in parse fault messages.
    pub fn describe(&self) -> String {
        match self {
            Tok::Text(_) => "literal text".to_string(),
            Tok::OpenEcho => "output directive".to_string(),
            Tok::CloseTag => "end of directive".to_string(),
            Tok::Int(n) => n.to_string(),
            Tok::Float(x) => x.to_string(),
            Tok::Str(s) => format!("'{s}'"),
            Tok::Var(name) => format!("${name}"),
            Tok::Ident(name) => format!("'{name}'"),
            Tok::Eof => "end of template".to_string(),
            other => format!("'{}'", punct_str(other)),
        }
    }
}

fn punct_str(tok: &Tok) -> &'static str {
    match tok {
        Tok::LParen => "(",
        Tok::RParen => ")",
        Tok::LBracket => "[",
        Tok::RBracket => "]",
        Tok::LBrace => "{",
        Tok::RBrace => "}",
        Tok::Comma => ",",
        Tok::Semicolon => ";",
        Tok::Colon => ":",
        Tok::Question => "?",
        Tok::Coalesce => "??",
        Tok::Dot => ".",
        Tok::Arrow => "->",
        Tok::FatArrow => "=>",
        Tok::Plus => "+",
        Tok::Minus => "-",
        Tok::Star => "*",
        Tok::Slash => "/",
        Tok::Percent => "%",
        Tok::Bang => "!",
        Tok::Assign => "=",
        Tok::PlusAssign => "+=",
        Tok::MinusAssign => "-=",
        Tok::StarAssign => "*=",
        Tok::SlashAssign => "/=",
        Tok::DotAssign => ".=",
        Tok::Eq => "==",
        Tok::Ne => "!=",
        Tok::Identical => "===",
        Tok::NotIdentical => "!==",
        Tok::Lt => "<",
        Tok::Le => "<=",
        Tok::Gt => ">",
        Tok::Ge => ">=",
        Tok::And => "&&",
        Tok::Or => "||",
        Tok::Inc => "++",
        Tok::Dec => "--",
        _ => "?",
    }
}

/// A token and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

/// Tokenize a lowered source unit.
pub fn tokenize(src: &str) -> Result<Vec<Token>, Fault> {
    let mut lexer = Lexer {
        src,
        pos: 0,
        line: 1,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek2(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    /// Advance over `text`, keeping the line count current.
    fn skip_str(&mut self, text: &str) {
        self.line += text.matches('\n').count();
        self.pos += text.len();
    }

    fn push(&mut self, tok: Tok, line: usize) {
        self.tokens.push(Token { tok, line });
    }

    fn run(&mut self) -> Result<(), Fault> {
        while self.pos < self.src.len() {
            let line = self.line;
            match self.rest().find(OPEN_TAG) {
                Some(0) => {
                    self.skip_str(OPEN_TAG);
                    if self.peek() == Some(ECHO_MARK) {
                        self.bump();
                        self.push(Tok::OpenEcho, line);
                    }
                    self.directive(line)?;
                }
                Some(n) => {
                    let text = &self.rest()[..n];
                    self.skip_str(text);
                    self.push(Tok::Text(text.to_string()), line);
                }
                None => {
                    let text = self.rest();
                    self.skip_str(text);
                    self.push(Tok::Text(text.to_string()), line);
                }
            }
        }
        let line = self.line;
        self.push(Tok::Eof, line);
        Ok(())
    }

    /// Lex code tokens up to and including the closing tag.
    fn directive(&mut self, open_line: usize) -> Result<(), Fault> {
        loop {
            self.skip_trivia();
            let line = self.line;
            if self.rest().starts_with(CLOSE_TAG) {
                self.skip_str(CLOSE_TAG);
                self.push(Tok::CloseTag, line);
                return Ok(());
            }
            let Some(ch) = self.peek() else {
                return Err(Fault::new("Unterminated directive", open_line));
            };

            let tok = match ch {
                '0'..='9' => self.number(line)?,
                '\'' | '"' => self.string(ch, line)?,
                '$' => {
                    self.bump();
                    let name = self.word();
                    if name.is_empty() {
                        return Err(Fault::new("Expected variable name after '$'", line));
                    }
                    Tok::Var(name)
                }
                c if c.is_alphabetic() || c == '_' => Tok::Ident(self.word()),
                _ => self.punct(ch, line)?,
            };
            self.push(tok, line);
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    // Line comment; a closing tag still ends the directive.
                    while let Some(c) = self.peek() {
                        if c == '\n' || self.rest().starts_with(CLOSE_TAG) {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek2() == Some('*') => {
                    self.skip_str("/*");
                    while self.peek().is_some() && !self.rest().starts_with("*/") {
                        self.bump();
                    }
                    if self.peek().is_some() {
                        self.skip_str("*/");
                    }
                }
                _ => return,
            }
        }
    }

    fn word(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.bump();
            } else {
                break;
            }
        }
        self.src[start..self.pos].to_string()
    }

    fn number(&mut self, line: usize) -> Result<Tok, Fault> {
        let start = self.pos;
        while matches!(self.peek(), Some('0'..='9')) {
            self.bump();
        }
        let mut is_float = false;
        if self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
            is_float = true;
            self.bump();
            while matches!(self.peek(), Some('0'..='9')) {
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent = &self.rest()[1..];
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            if digits.starts_with(|c: char| c.is_ascii_digit()) {
                is_float = true;
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                while matches!(self.peek(), Some('0'..='9')) {
                    self.bump();
                }
            }
        }

        let text = &self.src[start..self.pos];
        if is_float {
            text.parse()
                .map(Tok::Float)
                .map_err(|_| Fault::new(format!("Invalid number '{text}'"), line))
        } else {
            match text.parse() {
                Ok(n) => Ok(Tok::Int(n)),
                // Too large for an integer literal; fall back to a float.
                Err(_) => text
                    .parse()
                    .map(Tok::Float)
                    .map_err(|_| Fault::new(format!("Invalid number '{text}'"), line)),
            }
        }
    }

    fn string(&mut self, quote: char, line: usize) -> Result<Tok, Fault> {
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(Fault::new("Unterminated string literal", line));
            };
            match c {
                c if c == quote => return Ok(Tok::Str(out)),
                '\\' => {
                    let Some(escaped) = self.bump() else {
                        return Err(Fault::new("Unterminated string literal", line));
                    };
                    match (quote, escaped) {
                        (_, '\\') => out.push('\\'),
                        (q, e) if e == q => out.push(e),
                        ('"', 'n') => out.push('\n'),
                        ('"', 't') => out.push('\t'),
                        ('"', 'r') => out.push('\r'),
                        ('"', '$') => out.push('$'),
                        (_, e) => {
                            out.push('\\');
                            out.push(e);
                        }
                    }
                }
                c => out.push(c),
            }
        }
    }

    fn punct(&mut self, ch: char, line: usize) -> Result<Tok, Fault> {
        let table: &[(&str, Tok)] = &[
            ("===", Tok::Identical),
            ("!==", Tok::NotIdentical),
            ("??", Tok::Coalesce),
            ("->", Tok::Arrow),
            ("=>", Tok::FatArrow),
            ("==", Tok::Eq),
            ("!=", Tok::Ne),
            ("<>", Tok::Ne),
            ("<=", Tok::Le),
            (">=", Tok::Ge),
            ("&&", Tok::And),
            ("||", Tok::Or),
            ("++", Tok::Inc),
            ("--", Tok::Dec),
            ("+=", Tok::PlusAssign),
            ("-=", Tok::MinusAssign),
            ("*=", Tok::StarAssign),
            ("/=", Tok::SlashAssign),
            (".=", Tok::DotAssign),
            ("(", Tok::LParen),
            (")", Tok::RParen),
            ("[", Tok::LBracket),
            ("]", Tok::RBracket),
            ("{", Tok::LBrace),
            ("}", Tok::RBrace),
            (",", Tok::Comma),
            (";", Tok::Semicolon),
            (":", Tok::Colon),
            ("?", Tok::Question),
            (".", Tok::Dot),
            ("+", Tok::Plus),
            ("-", Tok::Minus),
            ("*", Tok::Star),
            ("/", Tok::Slash),
            ("%", Tok::Percent),
            ("!", Tok::Bang),
            ("=", Tok::Assign),
            ("<", Tok::Lt),
            (">", Tok::Gt),
        ];

        for (text, tok) in table {
            if self.rest().starts_with(text) {
                self.skip_str(text);
                return Ok(tok.clone());
            }
        }
        Err(Fault::new(format!("Unexpected character '{ch}'"), line))
    }
}
