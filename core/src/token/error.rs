use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, offset: usize) -> Self {
        Self { line, column, offset }
    }

    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn single(pos: Position) -> Self {
        Self {
            start: pos.clone(),
            end: pos,
        }
    }

    pub fn line(&self) -> u32 {
        self.start.line
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start.line == self.end.line {
            write!(f, "{}:{}-{}", self.start.line, self.start.column, self.end.column)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Syntax error raised by the tokenizer or the parser.
///
/// `near` holds the offending token text (or `<eof>`), which is appended to the
/// message the same way the reference interpreter reports syntax errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub near: Option<String>,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
            near: None,
        }
    }

    pub fn near(message: impl Into<String>, line: u32, near: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line,
            near: Some(near.into()),
        }
    }

    /// Render as `chunk:line: message near 'token'`.
    pub fn with_chunk(&self, chunk: &str) -> String {
        format!("{}:{}: {}", chunk, self.line, self)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.near {
            Some(near) => write!(f, "{} near '{}'", self.message, near),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        let pos = Position::new(10, 25, 100);
        assert_eq!(pos.to_string(), "10:25");
    }

    #[test]
    fn test_span_display() {
        let span1 = Span::new(Position::new(1, 5, 4), Position::new(1, 10, 9));
        assert_eq!(span1.to_string(), "1:5-10");

        let span2 = Span::new(Position::new(1, 5, 4), Position::new(3, 2, 20));
        assert_eq!(span2.to_string(), "1:5-3:2");
    }

    #[test]
    fn test_parse_error_display() {
        let err1 = ParseError::new("unfinished string", 3);
        assert_eq!(err1.to_string(), "unfinished string");
        assert_eq!(err1.with_chunk("config.lua"), "config.lua:3: unfinished string");

        let err2 = ParseError::near("'=' expected", 2, "end");
        assert_eq!(err2.to_string(), "'=' expected near 'end'");
    }
}
