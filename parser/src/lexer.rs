//! FILENAME: parser/src/lexer.rs
//! PURPOSE: Scans a raw formula string and produces a stream of Tokens.
//! CONTEXT: This is the first stage of the parsing pipeline. It handles
//! whitespace skipping, number parsing, string literals, cell references,
//! and multi-character comparison operators like <= and <>.
//!
//! SUPPORTED OPERATORS:
//! - Single char: + - * / ( ) , : = < >
//! - Multi char: <= >= <>
//! - Normalized aliases: == becomes =, != becomes <>
//!
//! Identifiers are classified here rather than in the parser: a name
//! immediately followed by '(' is a function, anything else must be a
//! valid cell reference like A1 or AA100.

use crate::token::Token;
use std::iter::Peekable;
use std::str::Chars;

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    /// Advances the lexer and returns the next token.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        match self.input.next() {
            Some('+') => Token::Plus,
            Some('-') => Token::Minus,
            Some('*') => Token::Asterisk,
            Some('/') => Token::Slash,
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,
            Some(',') => Token::Comma,
            Some(':') => Token::Colon,

            // Handle = and its alias ==
            Some('=') => {
                if self.input.peek() == Some(&'=') {
                    self.input.next();
                }
                Token::Equals
            }

            // Handle != as an alias for <>
            Some('!') => {
                if self.input.peek() == Some(&'=') {
                    self.input.next();
                    Token::NotEqual
                } else {
                    Token::Illegal('!')
                }
            }

            // Handle < and potentially <= or <>
            Some('<') => self.read_less_than_operator(),

            // Handle > and potentially >=
            Some('>') => self.read_greater_than_operator(),

            // Handle double quotes for strings
            Some('"') => self.read_string(),

            // Handle the #REF! sentinel
            Some('#') => self.read_ref_error(),

            // Handle numbers (digits only; unary minus belongs to the parser)
            Some(ch) if ch.is_ascii_digit() => self.read_number(ch),

            // Handle identifiers (cell references and function names)
            Some(ch) if ch.is_ascii_alphabetic() => self.read_identifier(ch),

            // End of input
            None => Token::EOF,

            // Unknown character
            Some(ch) => Token::Illegal(ch),
        }
    }

    /// Collects every remaining token up to (but excluding) EOF.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token == Token::EOF {
                break;
            }
            tokens.push(token);
        }
        tokens
    }

    fn skip_whitespace(&mut self) {
        while let Some(&ch) = self.input.peek() {
            if !ch.is_whitespace() {
                break;
            }
            self.input.next();
        }
    }

    /// Handles operators starting with '<': <, <=, <>
    fn read_less_than_operator(&mut self) -> Token {
        match self.input.peek() {
            Some('=') => {
                self.input.next();
                Token::LessEqual
            }
            Some('>') => {
                self.input.next();
                Token::NotEqual
            }
            _ => Token::LessThan,
        }
    }

    /// Handles operators starting with '>': >, >=
    fn read_greater_than_operator(&mut self) -> Token {
        match self.input.peek() {
            Some('=') => {
                self.input.next();
                Token::GreaterEqual
            }
            _ => Token::GreaterThan,
        }
    }

    fn read_string(&mut self) -> Token {
        let mut result = String::new();
        // Consume chars until we hit another quote or EOF
        while let Some(&ch) = self.input.peek() {
            if ch == '"' {
                self.input.next(); // Consume the closing quote
                return Token::String(result);
            }
            result.push(ch);
            self.input.next();
        }
        // Hitting EOF without a closing quote is a lex error.
        Token::UnterminatedString(result)
    }

    /// Reads the #REF! sentinel. The leading '#' is already consumed.
    fn read_ref_error(&mut self) -> Token {
        for expected in ['R', 'E', 'F', '!'] {
            match self.input.peek() {
                Some(&ch) if ch.to_ascii_uppercase() == expected => {
                    self.input.next();
                }
                _ => return Token::Illegal('#'),
            }
        }
        Token::RefError
    }

    fn read_number(&mut self, first_char: char) -> Token {
        let mut number_str = String::from(first_char);

        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_digit() {
                number_str.push(ch);
                self.input.next();
            } else if ch == '.' && !number_str.contains('.') {
                // Only take the dot when a fractional digit follows,
                // so "1.x" lexes as 1 followed by an illegal dot.
                let mut ahead = self.input.clone();
                ahead.next();
                if ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                    number_str.push(ch);
                    self.input.next();
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        match number_str.parse::<f64>() {
            Ok(n) => Token::Number(n),
            Err(_) => Token::Illegal(first_char),
        }
    }

    fn read_identifier(&mut self, first_char: char) -> Token {
        let mut ident = String::new();
        ident.push(first_char.to_ascii_uppercase());

        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_alphanumeric() {
                ident.push(ch.to_ascii_uppercase());
                self.input.next();
            } else {
                break;
            }
        }

        // A name directly followed by '(' is a function call.
        if self.input.peek() == Some(&'(') {
            return Token::Function(ident);
        }

        // Everything else must look like a cell reference: letters then digits.
        match split_cell_ref(&ident) {
            Some((col, row)) => Token::CellRef { col, row },
            None => Token::IllegalIdent(ident),
        }
    }
}

/// Splits an identifier into its column letters and 1-based row number,
/// returning None unless it has the exact shape LETTERS then DIGITS.
fn split_cell_ref(ident: &str) -> Option<(String, u32)> {
    let letters_end = ident.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if letters_end == 0 || letters_end == ident.len() {
        return None;
    }

    let (letters, digits) = ident.split_at(letters_end);
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((letters.to_string(), row))
}
