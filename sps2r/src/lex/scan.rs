// sps2r - a compiler from SPSS statistical syntax to tidyverse R.
// Copyright (C) 2026 The sps2r authors.
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later
// version.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along with
// this program.  If not, see <http://www.gnu.org/licenses/>.

//! Scanning SPSS-style syntax into tokens.
//!
//! A period ends a command.  Because identifiers and numbers may embed
//! periods (`F8.0`, `1.5`), the scanner only takes a period as part of an
//! identifier or number when the following character keeps the token going;
//! a trailing period always terminates the command.

use std::ops::Range;

use thiserror::Error as ThisError;

use crate::identifier::{Identifier, IdentifierChar, ReservedWord};

use super::token::{Punct, Token};

#[derive(ThisError, Clone, Debug, PartialEq)]
pub enum ScanError {
    /// Unterminated string constant.
    #[error("Unterminated string constant.")]
    ExpectedQuote,

    /// Missing exponent.
    #[error("Missing exponent following `{0}`.")]
    ExpectedExponent(String),

    /// Unexpected character.
    #[error("Unexpected character {0:?} in input.")]
    UnexpectedChar(char),
}

/// A [Token] labeled with the byte range of the syntax it was scanned from.
#[derive(Clone, Debug, PartialEq)]
pub struct LexToken {
    pub token: Token,
    pub pos: Range<usize>,
}

/// An iterator that tokenizes a string held in memory.
pub struct StringScanner<'a> {
    input: &'a str,
    offset: usize,
    start_of_command: bool,
}

impl<'a> StringScanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            offset: 0,
            start_of_command: true,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.offset..]
    }

    fn skip_ignored(&mut self) {
        loop {
            let rest = self.rest();
            let Some(c) = rest.chars().next() else {
                return;
            };
            if c.is_whitespace() {
                self.offset += c.len_utf8();
            } else if c == '*' && self.start_of_command {
                // Comment, running through the next period (or end of input).
                match rest.find('.') {
                    Some(index) => self.offset += index + 1,
                    None => self.offset = self.input.len(),
                }
            } else {
                return;
            }
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, ScanError> {
        let mut s = String::new();
        let mut chars = self.rest().char_indices().skip(1).peekable();
        while let Some((index, c)) = chars.next() {
            if c == quote {
                if let Some((_, next)) = chars.peek()
                    && *next == quote
                {
                    // Doubled quote mark stands for itself.
                    s.push(quote);
                    chars.next();
                    continue;
                }
                self.offset += index + quote.len_utf8();
                return Ok(Token::String(s));
            } else if c == '\n' {
                break;
            }
            s.push(c);
        }
        self.offset = self.input.len();
        Err(ScanError::ExpectedQuote)
    }

    fn scan_number(&mut self) -> Result<Token, ScanError> {
        let rest = self.rest();
        let mut len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if rest[len..].starts_with('.')
            && rest[len + 1..].starts_with(|c: char| c.is_ascii_digit())
        {
            let fraction = &rest[len + 1..];
            len += 1 + fraction
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(fraction.len());
        }
        if rest[len..].starts_with(['e', 'E']) {
            let mut exponent_len = 1;
            if rest[len + exponent_len..].starts_with(['+', '-']) {
                exponent_len += 1;
            }
            let digits = &rest[len + exponent_len..];
            let digits_len = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            if digits_len == 0 {
                self.offset += len + exponent_len;
                return Err(ScanError::ExpectedExponent(String::from(
                    &rest[..len + exponent_len],
                )));
            }
            len += exponent_len + digits_len;
        }
        self.offset += len;
        Ok(Token::Number(rest[..len].parse().unwrap()))
    }

    fn scan_id(&mut self) -> Token {
        let rest = self.rest();
        let mut len = 0;
        for (index, c) in rest.char_indices() {
            let keep = if index == 0 {
                debug_assert!(c.may_start_id());
                true
            } else if c == '.' {
                // A period stays in the identifier only if the identifier
                // keeps going afterward; a trailing period ends the command.
                rest[index + 1..]
                    .chars()
                    .next()
                    .is_some_and(|next| next != '.' && next.may_continue_id())
            } else {
                c.may_continue_id()
            };
            if !keep {
                break;
            }
            len = index + c.len_utf8();
        }
        let s = &rest[..len];
        self.offset += len;
        if let Ok(reserved_word) = ReservedWord::try_from(s) {
            let punct = match reserved_word {
                ReservedWord::And => Punct::And,
                ReservedWord::Or => Punct::Or,
                ReservedWord::Not => Punct::Not,
                ReservedWord::Eq => Punct::Eq,
                ReservedWord::Ge => Punct::Ge,
                ReservedWord::Gt => Punct::Gt,
                ReservedWord::Le => Punct::Le,
                ReservedWord::Lt => Punct::Lt,
                ReservedWord::Ne => Punct::Ne,
                ReservedWord::All => Punct::All,
                ReservedWord::By => Punct::By,
                ReservedWord::To => Punct::To,
                ReservedWord::With => Punct::With,
            };
            Token::Punct(punct)
        } else {
            Token::Id(Identifier::new(s).unwrap())
        }
    }

    fn scan_punct(&mut self, c: char) -> Result<Token, ScanError> {
        let rest = self.rest();
        for (syntax, punct) in [
            ("**", Punct::Exp),
            ("<=", Punct::Le),
            (">=", Punct::Ge),
            ("<>", Punct::Ne),
            ("~=", Punct::Ne),
        ] {
            if rest.starts_with(syntax) {
                self.offset += syntax.len();
                return Ok(Token::Punct(punct));
            }
        }
        let punct = match c {
            '+' => Punct::Plus,
            '-' => Punct::Dash,
            '*' => Punct::Asterisk,
            '/' => Punct::Slash,
            '=' => Punct::Equals,
            '(' => Punct::LParen,
            ')' => Punct::RParen,
            ',' => Punct::Comma,
            '&' => Punct::And,
            '|' => Punct::Or,
            '~' => Punct::Not,
            '<' => Punct::Lt,
            '>' => Punct::Gt,
            _ => {
                self.offset += c.len_utf8();
                return Err(ScanError::UnexpectedChar(c));
            }
        };
        self.offset += c.len_utf8();
        Ok(Token::Punct(punct))
    }
}

impl Iterator for StringScanner<'_> {
    type Item = Result<LexToken, (ScanError, Range<usize>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_ignored();
        let start = self.offset;
        let c = self.rest().chars().next()?;

        let result = if c == '\'' || c == '"' {
            self.scan_string(c)
        } else if c.is_ascii_digit()
            || (c == '.' && self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()))
        {
            self.scan_number()
        } else if c == '.' {
            self.offset += 1;
            self.start_of_command = true;
            return Some(Ok(LexToken {
                token: Token::End,
                pos: start..self.offset,
            }));
        } else if c.may_start_id() {
            Ok(self.scan_id())
        } else {
            self.scan_punct(c)
        };
        self.start_of_command = false;
        Some(match result {
            Ok(token) => Ok(LexToken {
                token,
                pos: start..self.offset,
            }),
            Err(error) => Err((error, start..self.offset)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ScanError, StringScanner};
    use crate::{
        identifier::Identifier,
        lex::token::{Punct, Token},
    };

    fn scan(input: &str) -> Vec<Token> {
        StringScanner::new(input)
            .map(|result| result.unwrap().token)
            .collect()
    }

    fn id(s: &str) -> Token {
        Token::Id(Identifier::new(s).unwrap())
    }

    #[test]
    fn compute_command() {
        assert_eq!(
            scan("COMPUTE x = score + 1.\n"),
            vec![
                id("COMPUTE"),
                id("x"),
                Token::Punct(Punct::Equals),
                id("score"),
                Token::Punct(Punct::Plus),
                Token::Number(1.0),
                Token::End,
            ]
        );
    }

    #[test]
    fn format_specifier_keeps_embedded_period() {
        assert_eq!(
            scan("/VARIABLES=id F8.0 name A10."),
            vec![
                Token::Punct(Punct::Slash),
                id("VARIABLES"),
                Token::Punct(Punct::Equals),
                id("id"),
                id("F8.0"),
                id("name"),
                id("A10"),
                Token::End,
            ]
        );
    }

    #[test]
    fn trailing_period_ends_command_after_format() {
        assert_eq!(scan("id F3."), vec![id("id"), id("F3"), Token::End]);
        assert_eq!(scan("x = 1."), vec![
            id("x"),
            Token::Punct(Punct::Equals),
            Token::Number(1.0),
            Token::End
        ]);
    }

    #[test]
    fn reserved_words_become_puncts() {
        assert_eq!(
            scan("SORT CASES BY id."),
            vec![
                id("SORT"),
                id("CASES"),
                Token::Punct(Punct::By),
                id("id"),
                Token::End
            ]
        );
        assert_eq!(
            scan("a >= 1 AND b <> 2"),
            vec![
                id("a"),
                Token::Punct(Punct::Ge),
                Token::Number(1.0),
                Token::Punct(Punct::And),
                id("b"),
                Token::Punct(Punct::Ne),
                Token::Number(2.0),
            ]
        );
    }

    #[test]
    fn strings_and_doubled_quotes() {
        assert_eq!(
            scan("FILE='data.csv' 'it''s'"),
            vec![
                id("FILE"),
                Token::Punct(Punct::Equals),
                Token::String(String::from("data.csv")),
                Token::String(String::from("it's")),
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        let mut scanner = StringScanner::new("COMPUTE s = 'oops.\n");
        let tokens: Vec<_> = scanner.by_ref().collect();
        assert_eq!(
            tokens.last().unwrap().as_ref().unwrap_err().0,
            ScanError::ExpectedQuote
        );
    }

    #[test]
    fn comment_skipped_to_period() {
        assert_eq!(
            scan("* this is ignored .\nCOMPUTE x = 1."),
            vec![
                id("COMPUTE"),
                id("x"),
                Token::Punct(Punct::Equals),
                Token::Number(1.0),
                Token::End
            ]
        );
    }

    #[test]
    fn negative_number_is_dash_then_number() {
        assert_eq!(
            scan("(-9)"),
            vec![
                Token::Punct(Punct::LParen),
                Token::Punct(Punct::Dash),
                Token::Number(9.0),
                Token::Punct(Punct::RParen),
            ]
        );
    }
}
