//! FILENAME: parser/src/parser.rs
//! PURPOSE: Recursive descent parser that converts a stream of Tokens into an AST.
//! CONTEXT: This is the second stage of the parsing pipeline. It takes tokens
//! from the Lexer and builds an Expression tree that can be evaluated.
//!
//! GRAMMAR:
//!   expression     --> comparison
//!   comparison     --> additive ( ("=" | "<>" | "<" | ">" | "<=" | ">=") additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/") unary )*
//!   unary          --> "-" unary | primary
//!   primary        --> NUMBER | STRING | reference | "#REF!" | function_call
//!                    | "(" expression ")"
//!   reference      --> CELL_REF (":" CELL_REF)?
//!   function_call  --> FUNCTION "(" arguments? ")"
//!   arguments      --> expression ("," expression)*
//!
//! Every binary level is left-associative within its level.

use crate::ast::{BinaryOperator, Expression, UnaryOperator, Value};
use crate::lexer::Lexer;
use crate::token::Token;

/// Parser errors with descriptive messages.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a formula string into an expression tree.
/// Convenience wrapper over [`Parser`].
pub fn parse(input: &str) -> ParseResult<Expression> {
    Parser::new(input).parse()
}

/// The Parser struct holds the lexer and current token state.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current_token: Token,
}

impl<'a> Parser<'a> {
    /// Creates a new parser from an input string.
    /// Automatically advances to the first token.
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token();
        Parser {
            lexer,
            current_token,
        }
    }

    /// Parses the entire input and returns the AST.
    /// Tolerates an optional leading '=' (formula indicator); the engine
    /// usually strips it before calling in.
    pub fn parse(&mut self) -> ParseResult<Expression> {
        if self.current_token == Token::Equals {
            self.advance();
        }

        if self.current_token == Token::EOF {
            return Err(ParseError::new("Empty expression"));
        }

        let expr = self.parse_expression()?;

        // Ensure we consumed all tokens
        if self.current_token != Token::EOF {
            return Err(ParseError::new(format!(
                "Unexpected token after expression: {}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    /// Advances to the next token.
    fn advance(&mut self) {
        self.current_token = self.lexer.next_token();
    }

    /// Checks if the current token matches the expected token.
    /// If it matches, advances and returns Ok. Otherwise returns an error.
    fn expect(&mut self, expected: Token) -> ParseResult<()> {
        if self.current_token == expected {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::new(format!(
                "Expected {}, found {}",
                expected, self.current_token
            )))
        }
    }

    /// Surfaces in-band lexer error tokens as parse errors.
    fn check_lex_error(&self) -> ParseResult<()> {
        match &self.current_token {
            Token::Illegal(c) => Err(ParseError::new(format!("Unexpected character '{}'", c))),
            Token::IllegalIdent(s) => Err(ParseError::new(format!("Invalid identifier '{}'", s))),
            Token::UnterminatedString(_) => {
                Err(ParseError::new("Unterminated string literal"))
            }
            _ => Ok(()),
        }
    }

    /// Entry point for expression parsing.
    fn parse_expression(&mut self) -> ParseResult<Expression> {
        self.parse_comparison()
    }

    /// Parses comparison expressions (=, <>, <, >, <=, >=).
    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match &self.current_token {
                Token::Equals => BinaryOperator::Equal,
                Token::NotEqual => BinaryOperator::NotEqual,
                Token::LessThan => BinaryOperator::LessThan,
                Token::GreaterThan => BinaryOperator::GreaterThan,
                Token::LessEqual => BinaryOperator::LessEqual,
                Token::GreaterEqual => BinaryOperator::GreaterEqual,
                _ => break,
            };

            self.advance();
            let right = self.parse_additive()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses additive expressions (+ and -).
    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match &self.current_token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            self.advance();
            let right = self.parse_multiplicative()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses multiplicative expressions (* and /).
    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match &self.current_token {
                Token::Asterisk => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary()?;

            left = Expression::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses unary expressions (negation).
    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if self.current_token == Token::Minus {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::UnaryOp {
                op: UnaryOperator::Negate,
                operand: Box::new(operand),
            });
        }

        self.parse_primary()
    }

    /// Parses primary expressions (literals, cell refs, function calls, parentheses).
    fn parse_primary(&mut self) -> ParseResult<Expression> {
        self.check_lex_error()?;

        match self.current_token.clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expression::Literal(Value::Number(n)))
            }

            Token::String(s) => {
                self.advance();
                Ok(Expression::Literal(Value::String(s)))
            }

            Token::CellRef { col, row } => {
                self.advance();

                // A colon turns the reference into a range.
                if self.current_token == Token::Colon {
                    self.advance();
                    return self.parse_range_end(col, row);
                }

                Ok(Expression::CellRef { col, row })
            }

            Token::RefError => {
                self.advance();
                // A destroyed range endpoint may still trail ":B2"; the whole
                // range is gone either way.
                if self.current_token == Token::Colon {
                    self.advance();
                    self.check_lex_error()?;
                    match self.current_token {
                        Token::CellRef { .. } | Token::RefError => self.advance(),
                        _ => {
                            return Err(ParseError::new(format!(
                                "Expected cell reference after ':', found {}",
                                self.current_token
                            )))
                        }
                    }
                }
                Ok(Expression::RefError)
            }

            Token::Function(name) => {
                self.advance();
                self.parse_function_call(name)
            }

            Token::LParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }

            Token::EOF => Err(ParseError::new("Unexpected end of input")),

            other => Err(ParseError::new(format!("Unexpected token: {}", other))),
        }
    }

    /// Parses the end of a range after "CELL_REF :" has been consumed.
    fn parse_range_end(&mut self, start_col: String, start_row: u32) -> ParseResult<Expression> {
        self.check_lex_error()?;

        match self.current_token.clone() {
            Token::CellRef { col, row } => {
                self.advance();
                Ok(Expression::Range {
                    start: Box::new(Expression::CellRef {
                        col: start_col,
                        row: start_row,
                    }),
                    end: Box::new(Expression::CellRef { col, row }),
                })
            }
            // A deleted end corner destroys the whole range.
            Token::RefError => {
                self.advance();
                Ok(Expression::RefError)
            }
            other => Err(ParseError::new(format!(
                "Expected cell reference after ':', found {}",
                other
            ))),
        }
    }

    /// Parses a function call after the name has been consumed.
    /// The lexer only emits Function tokens when '(' follows immediately,
    /// so the expect below cannot fail on well-formed token streams.
    fn parse_function_call(&mut self, name: String) -> ParseResult<Expression> {
        self.expect(Token::LParen)?;

        let mut args = Vec::new();

        if self.current_token != Token::RParen {
            loop {
                args.push(self.parse_expression()?);

                if self.current_token == Token::Comma {
                    self.advance();
                    continue;
                }
                break;
            }
        }

        self.expect(Token::RParen)?;

        Ok(Expression::FunctionCall { name, args })
    }
}
