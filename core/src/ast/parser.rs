use std::rc::Rc;

use crate::ast::{Block, Expr, Field, FuncBody, Name, Stmt, StmtKind};
use crate::op::{BinOp, UNARY_PRIORITY, UnOp};
use crate::token::{ParseError, Span, Token, Tokenizer};

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Deepest nesting of blocks and expressions a chunk may use.
const MAX_NESTING: usize = 200;

/// Recursive-descent parser producing a [`Block`] for a whole chunk.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    len: usize,
    token_spans: &'a [Span],
    /// One entry per enclosing function: whether it accepts `...`
    vararg: Vec<bool>,
    loop_depth: usize,
    nesting: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], spans: &'a [Span]) -> Self {
        let len = tokens.len();
        Self {
            tokens,
            pos: 0,
            len,
            token_spans: spans,
            vararg: vec![true],
            loop_depth: 0,
            nesting: 0,
        }
    }

    /// Tokenize and parse `src` in one step.
    pub fn parse_source(src: &str) -> ParseResult<Block> {
        let (tokens, spans) = Tokenizer::tokenize_with_spans(src)?;
        Parser::new(&tokens, &spans).parse_chunk()
    }

    pub fn parse_chunk(&mut self) -> ParseResult<Block> {
        let block = self.parse_block()?;
        if !self.eof() {
            return Err(self.err("'<eof>' expected"));
        }
        Ok(block)
    }

    fn eof(&self) -> bool {
        self.pos >= self.len
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_is(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn line(&self) -> u32 {
        match self.token_spans.get(self.pos) {
            Some(span) => span.line(),
            None => self.token_spans.last().map(|s| s.end.line).unwrap_or(1),
        }
    }

    fn err(&self, msg: &str) -> ParseError {
        let near = match self.peek() {
            Some(Token::Str(s)) => s.clone(),
            Some(token) => token.to_string(),
            None => "<eof>".to_string(),
        };
        ParseError::near(msg, self.line(), near)
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.peek_is(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> ParseResult<()> {
        if self.accept(&token) {
            Ok(())
        } else {
            Err(self.err(&format!("'{}' expected", token)))
        }
    }

    /// Like [`expect`](Self::expect), but names the opening token when it is on another line.
    fn expect_match(&mut self, token: Token, opener: Token, line: u32) -> ParseResult<()> {
        if self.accept(&token) {
            return Ok(());
        }
        if line == self.line() {
            Err(self.err(&format!("'{}' expected", token)))
        } else {
            Err(self.err(&format!("'{}' expected (to close '{}' at line {})", token, opener, line)))
        }
    }

    fn expect_name(&mut self) -> ParseResult<Name> {
        match self.peek() {
            Some(Token::Id(id)) => {
                let name = Rc::from(id.as_str());
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.err("<name> expected")),
        }
    }

    fn block_follows(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(Token::End) | Some(Token::Else) | Some(Token::Elseif) | Some(Token::Until)
        )
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.nesting >= MAX_NESTING {
            return Err(self.err("chunk has too many syntax levels"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.nested(Self::parse_block_items)
    }

    fn parse_block_items(&mut self) -> ParseResult<Block> {
        let mut block = Vec::new();
        while !self.block_follows() {
            if self.peek_is(&Token::Return) {
                block.push(self.parse_return()?);
                break;
            }
            if let Some(stmt) = self.parse_statement()? {
                block.push(stmt);
            }
        }
        Ok(block)
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let line = self.line();
        self.pos += 1; // consume 'return'
        let values = if self.block_follows() || self.peek_is(&Token::Semicolon) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.accept(&Token::Semicolon);
        if !self.block_follows() {
            return Err(self.err("'<eof>' expected"));
        }
        Ok(Stmt {
            kind: StmtKind::Return(values),
            line,
        })
    }

    fn parse_statement(&mut self) -> ParseResult<Option<Stmt>> {
        let line = self.line();
        let kind = match self.peek() {
            Some(Token::Semicolon) => {
                self.pos += 1;
                return Ok(None);
            }
            Some(Token::Break) => {
                self.pos += 1;
                if self.loop_depth == 0 {
                    return Err(ParseError::new(
                        format!("<break> at line {} not inside a loop", line),
                        line,
                    ));
                }
                StmtKind::Break
            }
            Some(Token::Do) => {
                self.pos += 1;
                let body = self.parse_block()?;
                self.expect_match(Token::End, Token::Do, line)?;
                StmtKind::Do(body)
            }
            Some(Token::While) => {
                self.pos += 1;
                let cond = self.parse_expr()?;
                self.expect(Token::Do)?;
                let body = self.parse_loop_body()?;
                self.expect_match(Token::End, Token::While, line)?;
                StmtKind::While { cond, body }
            }
            Some(Token::Repeat) => {
                self.pos += 1;
                let body = self.parse_loop_body()?;
                self.expect_match(Token::Until, Token::Repeat, line)?;
                let cond = self.parse_expr()?;
                StmtKind::Repeat { body, cond }
            }
            Some(Token::If) => self.parse_if(line)?,
            Some(Token::For) => self.parse_for(line)?,
            Some(Token::Function) => self.parse_function_stmt(line)?,
            Some(Token::Local) => {
                self.pos += 1;
                if self.accept(&Token::Function) {
                    let name = self.expect_name()?;
                    let func = self.parse_func_body(Some(name.to_string()), false, line)?;
                    StmtKind::LocalFunction { name, func }
                } else {
                    let mut names = vec![self.expect_name()?];
                    while self.accept(&Token::Comma) {
                        names.push(self.expect_name()?);
                    }
                    let values = if self.accept(&Token::Assign) {
                        self.parse_expr_list()?
                    } else {
                        Vec::new()
                    };
                    StmtKind::Local { names, values }
                }
            }
            _ => self.parse_expr_statement()?,
        };
        Ok(Some(Stmt { kind, line }))
    }

    fn parse_loop_body(&mut self) -> ParseResult<Block> {
        self.loop_depth += 1;
        let body = self.parse_block();
        self.loop_depth -= 1;
        body
    }

    fn parse_if(&mut self, line: u32) -> ParseResult<StmtKind> {
        self.pos += 1; // consume 'if'
        let mut branches = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(Token::Then)?;
        branches.push((cond, self.parse_block()?));
        let mut else_block = None;
        loop {
            if self.accept(&Token::Elseif) {
                let cond = self.parse_expr()?;
                self.expect(Token::Then)?;
                branches.push((cond, self.parse_block()?));
            } else if self.accept(&Token::Else) {
                else_block = Some(self.parse_block()?);
                self.expect_match(Token::End, Token::If, line)?;
                break;
            } else {
                self.expect_match(Token::End, Token::If, line)?;
                break;
            }
        }
        Ok(StmtKind::If { branches, else_block })
    }

    fn parse_for(&mut self, line: u32) -> ParseResult<StmtKind> {
        self.pos += 1; // consume 'for'
        let first = self.expect_name()?;
        if self.accept(&Token::Assign) {
            let start = self.parse_expr()?;
            self.expect(Token::Comma)?;
            let limit = self.parse_expr()?;
            let step = if self.accept(&Token::Comma) {
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(Token::Do)?;
            let body = self.parse_loop_body()?;
            self.expect_match(Token::End, Token::For, line)?;
            return Ok(StmtKind::NumericFor {
                var: first,
                start,
                limit,
                step,
                body,
            });
        }

        let mut names = vec![first];
        while self.accept(&Token::Comma) {
            names.push(self.expect_name()?);
        }
        if !self.accept(&Token::In) {
            return Err(self.err("'=' or 'in' expected"));
        }
        let exprs = self.parse_expr_list()?;
        self.expect(Token::Do)?;
        let body = self.parse_loop_body()?;
        self.expect_match(Token::End, Token::For, line)?;
        Ok(StmtKind::GenericFor { names, exprs, body })
    }

    /// `function a.b.c:m(...) end` is sugar for assigning a function to `a.b.c.m`
    /// with an implicit `self` parameter.
    fn parse_function_stmt(&mut self, line: u32) -> ParseResult<StmtKind> {
        self.pos += 1; // consume 'function'
        let first = self.expect_name()?;
        let mut full_name = first.to_string();
        let mut target = Expr::Name(first);
        let mut is_method = false;
        while self.accept(&Token::Dot) {
            let key = self.expect_name()?;
            full_name.push('.');
            full_name.push_str(&key);
            target = Expr::Index(Box::new(target), Box::new(Expr::Str(key)));
        }
        if self.accept(&Token::Colon) {
            let key = self.expect_name()?;
            full_name.push(':');
            full_name.push_str(&key);
            target = Expr::Index(Box::new(target), Box::new(Expr::Str(key)));
            is_method = true;
        }
        let func = self.parse_func_body(Some(full_name), is_method, line)?;
        Ok(StmtKind::Assign {
            targets: vec![target],
            values: vec![Expr::Function(func)],
        })
    }

    fn parse_func_body(&mut self, name: Option<String>, is_method: bool, line: u32) -> ParseResult<Rc<FuncBody>> {
        self.expect(Token::LParen)?;
        let mut params: Vec<Name> = Vec::new();
        if is_method {
            params.push(Rc::from("self"));
        }
        let mut is_vararg = false;
        if !self.peek_is(&Token::RParen) {
            loop {
                if self.accept(&Token::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        self.vararg.push(is_vararg);
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        let body = self.parse_block();
        self.loop_depth = saved_loops;
        self.vararg.pop();
        let body = body?;

        self.expect_match(Token::End, Token::Function, line)?;
        Ok(Rc::new(FuncBody {
            params,
            is_vararg,
            body,
            name,
            line,
        }))
    }

    fn parse_expr_statement(&mut self) -> ParseResult<StmtKind> {
        let expr = self.parse_suffixed()?;
        if self.peek_is(&Token::Assign) || self.peek_is(&Token::Comma) {
            let mut targets = vec![expr];
            while self.accept(&Token::Comma) {
                targets.push(self.parse_suffixed()?);
            }
            self.expect(Token::Assign)?;
            for target in &targets {
                if !matches!(target, Expr::Name(_) | Expr::Index(..)) {
                    return Err(self.err("syntax error"));
                }
            }
            let values = self.parse_expr_list()?;
            return Ok(StmtKind::Assign { targets, values });
        }
        match expr {
            Expr::Call(..) | Expr::Method(..) => Ok(StmtKind::Call(expr)),
            _ => Err(self.err("syntax error")),
        }
    }

    fn parse_expr_list(&mut self) -> ParseResult<Vec<Expr>> {
        let mut list = vec![self.parse_expr()?];
        while self.accept(&Token::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }

    pub(crate) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_sub_expr(0)
    }

    /// Precedence climbing: consumes binary operators whose left priority exceeds `limit`.
    fn parse_sub_expr(&mut self, limit: u8) -> ParseResult<Expr> {
        self.nested(|parser| parser.parse_operators(limit))
    }

    fn parse_operators(&mut self, limit: u8) -> ParseResult<Expr> {
        let mut left = match self.peek().and_then(unary_op) {
            Some(op) => {
                self.pos += 1;
                let operand = self.parse_sub_expr(UNARY_PRIORITY)?;
                Expr::Unary(op, Box::new(operand))
            }
            None => self.parse_simple()?,
        };
        while let Some(op) = self.peek().and_then(binary_op) {
            let (lp, rp) = op.priority();
            if lp <= limit {
                break;
            }
            self.pos += 1;
            let right = self.parse_sub_expr(rp)?;
            left = Expr::Bin(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_simple(&mut self) -> ParseResult<Expr> {
        let expr = match self.peek() {
            Some(Token::Int(i)) => Expr::Int(*i),
            Some(Token::Float(f)) => Expr::Float(*f),
            Some(Token::Str(s)) => Expr::Str(Rc::from(s.as_str())),
            Some(Token::Nil) => Expr::Nil,
            Some(Token::Bool(b)) => Expr::Bool(*b),
            Some(Token::Ellipsis) => {
                if !self.vararg.last().copied().unwrap_or(false) {
                    return Err(self.err("cannot use '...' outside a vararg function"));
                }
                Expr::Vararg
            }
            Some(Token::LBrace) => return self.parse_table(),
            Some(Token::Function) => {
                let line = self.line();
                self.pos += 1;
                return Ok(Expr::Function(self.parse_func_body(None, false, line)?));
            }
            _ => return self.parse_suffixed(),
        };
        self.pos += 1;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        match self.peek() {
            Some(Token::Id(_)) => Ok(Expr::Name(self.expect_name()?)),
            Some(Token::LParen) => {
                let line = self.line();
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_match(Token::RParen, Token::LParen, line)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            _ => Err(self.err("unexpected symbol")),
        }
    }

    fn parse_suffixed(&mut self) -> ParseResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let key = self.expect_name()?;
                    expr = Expr::Index(Box::new(expr), Box::new(Expr::Str(key)));
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Some(Token::Colon) => {
                    self.pos += 1;
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::Method(Box::new(expr), method, args);
                }
                Some(Token::LParen) | Some(Token::LBrace) | Some(Token::Str(_)) => {
                    let args = self.parse_call_args()?;
                    expr = Expr::Call(Box::new(expr), args);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> ParseResult<Vec<Expr>> {
        match self.peek() {
            Some(Token::Str(s)) => {
                let arg = Expr::Str(Rc::from(s.as_str()));
                self.pos += 1;
                Ok(vec![arg])
            }
            Some(Token::LBrace) => Ok(vec![self.parse_table()?]),
            Some(Token::LParen) => {
                let line = self.line();
                self.pos += 1;
                if self.accept(&Token::RParen) {
                    return Ok(Vec::new());
                }
                let args = self.parse_expr_list()?;
                self.expect_match(Token::RParen, Token::LParen, line)?;
                Ok(args)
            }
            _ => Err(self.err("function arguments expected")),
        }
    }

    fn parse_table(&mut self) -> ParseResult<Expr> {
        let line = self.line();
        self.expect(Token::LBrace)?;
        let mut fields = Vec::new();
        while !self.peek_is(&Token::RBrace) {
            let field = match self.peek() {
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let key = self.parse_expr()?;
                    self.expect(Token::RBracket)?;
                    self.expect(Token::Assign)?;
                    Field::Keyed(key, self.parse_expr()?)
                }
                Some(Token::Id(id)) if self.tokens.get(self.pos + 1) == Some(&Token::Assign) => {
                    let name: Name = Rc::from(id.as_str());
                    self.pos += 2;
                    Field::Named(name, self.parse_expr()?)
                }
                _ => Field::Positional(self.parse_expr()?),
            };
            fields.push(field);
            if !self.accept(&Token::Comma) && !self.accept(&Token::Semicolon) {
                break;
            }
        }
        self.expect_match(Token::RBrace, Token::LBrace, line)?;
        Ok(Expr::Table(fields))
    }
}

fn unary_op(token: &Token) -> Option<UnOp> {
    match token {
        Token::Sub => Some(UnOp::Neg),
        Token::Not => Some(UnOp::Not),
        Token::Len => Some(UnOp::Len),
        _ => None,
    }
}

fn binary_op(token: &Token) -> Option<BinOp> {
    match token {
        Token::Add => Some(BinOp::Add),
        Token::Sub => Some(BinOp::Sub),
        Token::Mul => Some(BinOp::Mul),
        Token::Div => Some(BinOp::Div),
        Token::IDiv => Some(BinOp::IDiv),
        Token::Mod => Some(BinOp::Mod),
        Token::Pow => Some(BinOp::Pow),
        Token::Concat => Some(BinOp::Concat),
        Token::Eq => Some(BinOp::Eq),
        Token::Ne => Some(BinOp::Ne),
        Token::Lt => Some(BinOp::Lt),
        Token::Le => Some(BinOp::Le),
        Token::Gt => Some(BinOp::Gt),
        Token::Ge => Some(BinOp::Ge),
        Token::And => Some(BinOp::And),
        Token::Or => Some(BinOp::Or),
        _ => None,
    }
}
