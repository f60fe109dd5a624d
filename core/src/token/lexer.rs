use std::fmt;

use once_cell::sync::Lazy;

use crate::token::{ParseError, Position, Span};
use crate::util::fast_map::{FastHashMap, fast_hash_map_with_capacity};

type LexResult<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Dot,       // .
    Concat,    // ..
    Ellipsis,  // ...
    Colon,     // :
    Comma,     // ,
    Semicolon, // ;
    Assign,    // =
    Eq,        // ==
    Ne,        // ~=
    Gt,        // >
    Lt,        // <
    Ge,        // >=
    Le,        // <=
    Add,       // +
    Sub,       // -
    Mul,       // *
    Div,       // /
    IDiv,      // //
    Mod,       // %
    Pow,       // ^
    Len,       // #
    // Keywords
    And,
    Break,
    Do,
    Else,
    Elseif,
    End,
    For,
    Function,
    If,
    In,
    Local,
    Nil,
    Not,
    Or,
    Repeat,
    Return,
    Then,
    Until,
    While,
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Id(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Dot => ".",
            Token::Concat => "..",
            Token::Ellipsis => "...",
            Token::Colon => ":",
            Token::Comma => ",",
            Token::Semicolon => ";",
            Token::Assign => "=",
            Token::Eq => "==",
            Token::Ne => "~=",
            Token::Gt => ">",
            Token::Lt => "<",
            Token::Ge => ">=",
            Token::Le => "<=",
            Token::Add => "+",
            Token::Sub => "-",
            Token::Mul => "*",
            Token::Div => "/",
            Token::IDiv => "//",
            Token::Mod => "%",
            Token::Pow => "^",
            Token::Len => "#",
            Token::And => "and",
            Token::Break => "break",
            Token::Do => "do",
            Token::Else => "else",
            Token::Elseif => "elseif",
            Token::End => "end",
            Token::For => "for",
            Token::Function => "function",
            Token::If => "if",
            Token::In => "in",
            Token::Local => "local",
            Token::Nil => "nil",
            Token::Not => "not",
            Token::Or => "or",
            Token::Repeat => "repeat",
            Token::Return => "return",
            Token::Then => "then",
            Token::Until => "until",
            Token::While => "while",
            Token::Str(s) => return write!(f, "{}", s),
            Token::Int(i) => return write!(f, "{}", i),
            Token::Float(n) => return write!(f, "{}", n),
            Token::Bool(b) => return write!(f, "{}", b),
            Token::Id(id) => return write!(f, "{}", id),
        };
        f.write_str(s)
    }
}

static KEYWORDS: Lazy<FastHashMap<&'static str, Token>> = Lazy::new(|| {
    let mut map = fast_hash_map_with_capacity(24);
    map.insert("and", Token::And);
    map.insert("break", Token::Break);
    map.insert("do", Token::Do);
    map.insert("else", Token::Else);
    map.insert("elseif", Token::Elseif);
    map.insert("end", Token::End);
    map.insert("false", Token::Bool(false));
    map.insert("for", Token::For);
    map.insert("function", Token::Function);
    map.insert("if", Token::If);
    map.insert("in", Token::In);
    map.insert("local", Token::Local);
    map.insert("nil", Token::Nil);
    map.insert("not", Token::Not);
    map.insert("or", Token::Or);
    map.insert("repeat", Token::Repeat);
    map.insert("return", Token::Return);
    map.insert("then", Token::Then);
    map.insert("true", Token::Bool(true));
    map.insert("until", Token::Until);
    map.insert("while", Token::While);
    map
});

const ASCII_WHITESPACE: u8 = 1 << 0;
const ASCII_DIGIT: u8 = 1 << 1;
const ASCII_IDENT_START: u8 = 1 << 2;
const ASCII_IDENT_CONT: u8 = 1 << 3;

const fn build_ascii_class() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let c = i as u8;
        if matches!(c, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C) {
            table[i] |= ASCII_WHITESPACE;
        }
        if c >= b'0' && c <= b'9' {
            table[i] |= ASCII_DIGIT | ASCII_IDENT_CONT;
        }
        if (c >= b'a' && c <= b'z') || (c >= b'A' && c <= b'Z') || c == b'_' {
            table[i] |= ASCII_IDENT_START | ASCII_IDENT_CONT;
        }
        i += 1;
    }
    table
}

const ASCII_CLASS: [u8; 256] = build_ascii_class();

#[inline]
fn ascii_flags(c: char) -> u8 {
    if c.is_ascii() { ASCII_CLASS[c as usize] } else { 0 }
}

#[inline]
fn is_space_char(c: char) -> bool {
    ascii_flags(c) & ASCII_WHITESPACE != 0
}

#[inline]
fn is_ident_start(c: char) -> bool {
    ascii_flags(c) & ASCII_IDENT_START != 0
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    ascii_flags(c) & ASCII_IDENT_CONT != 0
}

/// [chars] and [idx] are kept for syntax error reporting.
pub struct Tokenizer {
    chars: Vec<char>,
    idx: usize,
    len: usize,
    pub tokens: Vec<Token>,
    pub token_spans: Vec<Span>,
    line: u32,
    column: u32,
}

impl Tokenizer {
    pub fn tokenize(s: &str) -> anyhow::Result<Vec<Token>> {
        let (tokens, _) = Self::tokenize_with_spans(s)?;
        Ok(tokens)
    }

    /// Tokenize and return tokens with spans aligned by index
    pub fn tokenize_with_spans(s: &str) -> LexResult<(Vec<Token>, Vec<Span>)> {
        let chars: Vec<char> = s.chars().collect();
        let mut t = Tokenizer {
            len: chars.len(),
            chars,
            idx: 0,
            tokens: Vec::with_capacity(s.len() / 4),
            token_spans: Vec::with_capacity(s.len() / 4),
            line: 1,
            column: 1,
        };
        t.skip_shebang();
        t.parse()?;
        Ok((t.tokens, t.token_spans))
    }

    pub fn current_position(&self) -> Position {
        Position::new(self.line, self.column, self.idx)
    }

    fn eof(&self) -> bool {
        self.idx >= self.len
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.idx + ahead).copied()
    }

    fn expect(&mut self, s: &str) -> bool {
        let start_idx = self.idx;
        let start_line = self.line;
        let start_column = self.column;

        for c in s.chars() {
            if self.idx >= self.len || self.chars[self.idx] != c {
                self.idx = start_idx;
                self.line = start_line;
                self.column = start_column;
                return false;
            }
            self.advance_char();
        }
        true
    }

    fn err<T: AsRef<str>>(&self, msg: T, near: &str) -> ParseError {
        ParseError::near(msg.as_ref(), self.line, near)
    }

    fn advance_char(&mut self) {
        if !self.eof() && self.chars[self.idx] == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.idx += 1;
    }

    fn push_with_span(&mut self, token: Token, start: Position) {
        let end = self.current_position();
        self.tokens.push(token);
        self.token_spans.push(Span::new(start, end));
    }

    fn skip_shebang(&mut self) {
        if self.chars.first() == Some(&'#') {
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                self.advance_char();
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.idx < self.len && is_space_char(self.chars[self.idx]) {
            self.advance_char();
        }
    }

    fn skip_comment(&mut self) -> LexResult<()> {
        // Already past the leading "--"
        if self.peek() == Some('[')
            && let Some(level) = self.long_bracket_level()
        {
            self.read_long_bracket(level, "unfinished long comment")?;
            return Ok(());
        }
        while let Some(c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
        Ok(())
    }

    /// Returns the level of a long bracket opening at the cursor (`[[` is 0, `[==[` is 2)
    /// without consuming anything.
    fn long_bracket_level(&self) -> Option<usize> {
        if self.peek() != Some('[') {
            return None;
        }
        let mut level = 0;
        while self.peek_at(1 + level) == Some('=') {
            level += 1;
        }
        if self.peek_at(1 + level) == Some('[') {
            Some(level)
        } else {
            None
        }
    }

    fn read_long_bracket(&mut self, level: usize, unfinished: &str) -> LexResult<String> {
        for _ in 0..level + 2 {
            self.advance_char();
        }
        // A newline right after the opening bracket is skipped
        if self.peek() == Some('\r') {
            self.advance_char();
        }
        if self.peek() == Some('\n') {
            self.advance_char();
        }
        let mut content = String::new();
        while let Some(c) = self.peek() {
            if c == ']' {
                let mut eq = 0;
                while self.peek_at(1 + eq) == Some('=') {
                    eq += 1;
                }
                if eq == level && self.peek_at(1 + eq) == Some(']') {
                    for _ in 0..level + 2 {
                        self.advance_char();
                    }
                    return Ok(content);
                }
            }
            content.push(c);
            self.advance_char();
        }
        Err(self.err(unfinished, "<eof>"))
    }

    fn parse_str(&mut self) -> LexResult<()> {
        let start_pos = self.current_position();
        let quote = self.chars[self.idx];
        self.advance_char();
        let mut content = String::new();

        while let Some(c) = self.peek() {
            if c == quote {
                self.advance_char();
                self.push_with_span(Token::Str(content), start_pos);
                return Ok(());
            }
            match c {
                '\n' => return Err(self.err("unfinished string", &content)),
                '\\' => {
                    self.advance_char();
                    self.parse_escape(&mut content)?;
                }
                _ => {
                    content.push(c);
                    self.advance_char();
                }
            }
        }

        Err(self.err("unfinished string", "<eof>"))
    }

    fn parse_escape(&mut self, content: &mut String) -> LexResult<()> {
        let Some(c) = self.peek() else {
            return Err(self.err("unfinished string", "<eof>"));
        };
        match c {
            'n' => content.push('\n'),
            't' => content.push('\t'),
            'r' => content.push('\r'),
            'a' => content.push('\u{7}'),
            'b' => content.push('\u{8}'),
            'f' => content.push('\u{c}'),
            'v' => content.push('\u{b}'),
            '\\' => content.push('\\'),
            '"' => content.push('"'),
            '\'' => content.push('\''),
            '\n' => content.push('\n'),
            'x' => {
                self.advance_char();
                let mut value = 0u32;
                for _ in 0..2 {
                    let d = self
                        .peek()
                        .and_then(|d| d.to_digit(16))
                        .ok_or_else(|| self.err("hexadecimal digit expected", "\\x"))?;
                    value = value * 16 + d;
                    self.advance_char();
                }
                content.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                return Ok(());
            }
            'z' => {
                self.advance_char();
                self.skip_whitespace();
                return Ok(());
            }
            '0'..='9' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 {
                    match self.peek().and_then(|d| d.to_digit(10)) {
                        Some(d) => {
                            value = value * 10 + d;
                            self.advance_char();
                            digits += 1;
                        }
                        None => break,
                    }
                }
                if value > 255 {
                    return Err(self.err("decimal escape too large", &format!("\\{}", value)));
                }
                content.push(char::from_u32(value).unwrap_or('\u{fffd}'));
                return Ok(());
            }
            other => return Err(self.err("invalid escape sequence", &format!("\\{}", other))),
        }
        self.advance_char();
        Ok(())
    }

    fn parse_num(&mut self) -> LexResult<()> {
        let start_pos = self.current_position();

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.advance_char();
            self.advance_char();
            let mut value: i64 = 0;
            let mut any = false;
            while let Some(d) = self.peek().and_then(|c| c.to_digit(16)) {
                // Hex literals wrap around like the reference interpreter does
                value = value.wrapping_mul(16).wrapping_add(d as i64);
                any = true;
                self.advance_char();
            }
            if !any {
                return Err(self.err("malformed number", "0x"));
            }
            self.push_with_span(Token::Int(value), start_pos);
            return Ok(());
        }

        let mut num = String::new();
        let mut is_float = false;
        let mut has_exp = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                num.push(c);
                self.advance_char();
            } else if c == '.' {
                if self.peek_at(1) == Some('.') {
                    break;
                }
                if is_float || has_exp {
                    num.push(c);
                    return Err(self.err("malformed number", &num));
                }
                num.push(c);
                self.advance_char();
                is_float = true;
            } else if (c == 'e' || c == 'E') && !has_exp {
                num.push(c);
                self.advance_char();
                has_exp = true;
                is_float = true;
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    num.push(sign);
                    self.advance_char();
                }
            } else if is_ident_start(c) {
                num.push(c);
                return Err(self.err("malformed number", &num));
            } else {
                break;
            }
        }

        if num.ends_with(['e', 'E', '+', '-']) {
            return Err(self.err("malformed number", &num));
        }

        let token = if is_float {
            match num.parse::<f64>() {
                Ok(f) => Token::Float(f),
                Err(_) => return Err(self.err("malformed number", &num)),
            }
        } else {
            match num.parse::<i64>() {
                Ok(i) => Token::Int(i),
                // Decimal integers that overflow become floats
                Err(_) => match num.parse::<f64>() {
                    Ok(f) => Token::Float(f),
                    Err(_) => return Err(self.err("malformed number", &num)),
                },
            }
        };
        self.push_with_span(token, start_pos);
        Ok(())
    }

    fn parse_name(&mut self) -> LexResult<()> {
        let start_pos = self.current_position();
        let mut id = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                id.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        let token = match KEYWORDS.get(id.as_str()) {
            Some(kw) => kw.clone(),
            None => Token::Id(id),
        };
        self.push_with_span(token, start_pos);
        Ok(())
    }

    fn parse_punctuations(&mut self) -> LexResult<()> {
        let start = self.current_position();
        let c = self.chars[self.idx];
        let token = match c {
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ']' => Token::RBracket,
            ':' => Token::Colon,
            ',' => Token::Comma,
            ';' => Token::Semicolon,
            '+' => Token::Add,
            '*' => Token::Mul,
            '%' => Token::Mod,
            '^' => Token::Pow,
            '#' => Token::Len,
            '-' => Token::Sub,
            '[' => Token::LBracket,
            '.' => {
                if self.expect("...") {
                    self.push_with_span(Token::Ellipsis, start);
                    return Ok(());
                }
                if self.expect("..") {
                    self.push_with_span(Token::Concat, start);
                    return Ok(());
                }
                Token::Dot
            }
            '/' => {
                if self.expect("//") {
                    self.push_with_span(Token::IDiv, start);
                    return Ok(());
                }
                Token::Div
            }
            '=' => {
                if self.expect("==") {
                    self.push_with_span(Token::Eq, start);
                    return Ok(());
                }
                Token::Assign
            }
            '~' => {
                if self.expect("~=") {
                    self.push_with_span(Token::Ne, start);
                    return Ok(());
                }
                return Err(self.err("unexpected symbol", "~"));
            }
            '<' => {
                if self.expect("<=") {
                    self.push_with_span(Token::Le, start);
                    return Ok(());
                }
                Token::Lt
            }
            '>' => {
                if self.expect(">=") {
                    self.push_with_span(Token::Ge, start);
                    return Ok(());
                }
                Token::Gt
            }
            other => return Err(self.err("unexpected symbol", &other.to_string())),
        };
        self.advance_char();
        self.push_with_span(token, start);
        Ok(())
    }

    fn parse(&mut self) -> LexResult<()> {
        while !self.eof() {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                break;
            };
            match c {
                '"' | '\'' => self.parse_str()?,
                '0'..='9' => self.parse_num()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.parse_num()?,
                '-' if self.peek_at(1) == Some('-') => {
                    self.advance_char();
                    self.advance_char();
                    self.skip_comment()?;
                }
                '[' => match self.long_bracket_level() {
                    Some(level) => {
                        let start = self.current_position();
                        let content = self.read_long_bracket(level, "unfinished long string")?;
                        self.push_with_span(Token::Str(content), start);
                    }
                    None => self.parse_punctuations()?,
                },
                c if is_ident_start(c) => self.parse_name()?,
                _ => self.parse_punctuations()?,
            }
        }
        Ok(())
    }
}
