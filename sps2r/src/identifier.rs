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

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use thiserror::Error as ThisError;
use unicase::UniCase;

#[derive(Clone, Debug, ThisError, PartialEq, Eq)]
pub enum Error {
    #[error("Identifier cannot be empty string.")]
    Empty,

    #[error("\"{0}\" may not be used as an identifier because it is a reserved word.")]
    Reserved(String),

    #[error(
        "{string:?} may not be used as an identifier because it begins with disallowed character {c:?}."
    )]
    BadFirstCharacter { string: String, c: char },

    #[error(
        "{string:?} may not be used as an identifier because it contains disallowed character {c:?}."
    )]
    BadLaterCharacter { string: String, c: char },
}

pub trait IdentifierChar {
    /// Returns true if `self` may be the first character in an identifier.
    fn may_start_id(self) -> bool;

    /// Returns true if `self` may be a second or subsequent character in an
    /// identifier.
    fn may_continue_id(self) -> bool;
}

impl IdentifierChar for char {
    fn may_start_id(self) -> bool {
        matches!(self, 'a'..='z' | 'A'..='Z' | '@' | '#' | '$') || (!self.is_ascii() && self.is_alphabetic())
    }

    fn may_continue_id(self) -> bool {
        matches!(self, 'a'..='z' | 'A'..='Z' | '0'..='9' | '@' | '#' | '$' | '.' | '_')
            || (!self.is_ascii() && self.is_alphanumeric())
    }
}

/// Words that act as operators or list separators and therefore can never name
/// a variable.
pub enum ReservedWord {
    And,
    Or,
    Not,
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
    All,
    By,
    To,
    With,
}

impl TryFrom<&str> for ReservedWord {
    type Error = ();

    fn try_from(source: &str) -> Result<Self, Self::Error> {
        if !(2..=4).contains(&source.len()) {
            return Err(());
        }
        let mut upper = [0u8; 4];
        for (index, byte) in source.bytes().enumerate() {
            upper[index] = byte.to_ascii_uppercase();
        }
        match &upper[..source.len()] {
            b"AND" => Ok(Self::And),
            b"OR" => Ok(Self::Or),
            b"NOT" => Ok(Self::Not),
            b"EQ" => Ok(Self::Eq),
            b"GE" => Ok(Self::Ge),
            b"GT" => Ok(Self::Gt),
            b"LE" => Ok(Self::Le),
            b"LT" => Ok(Self::Lt),
            b"NE" => Ok(Self::Ne),
            b"ALL" => Ok(Self::All),
            b"BY" => Ok(Self::By),
            b"TO" => Ok(Self::To),
            b"WITH" => Ok(Self::With),
            _ => Err(()),
        }
    }
}

pub fn is_reserved_word(s: &str) -> bool {
    ReservedWord::try_from(s).is_ok()
}

/// A case-insensitive identifier, as used for variable and dataset names.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identifier(pub UniCase<String>);

impl Identifier {
    pub fn new(s: impl Into<UniCase<String>>) -> Result<Self, Error> {
        let s: UniCase<String> = s.into();
        let mut chars = s.chars();
        let Some(first) = chars.next() else {
            return Err(Error::Empty);
        };
        if !first.may_start_id() {
            return Err(Error::BadFirstCharacter {
                string: s.into_inner(),
                c: first,
            });
        }
        if let Some(c) = chars.find(|c| !c.may_continue_id()) {
            return Err(Error::BadLaterCharacter {
                string: s.into_inner(),
                c,
            });
        }
        if is_reserved_word(s.as_str()) {
            return Err(Error::Reserved(s.into_inner()));
        }
        Ok(Identifier(s))
    }

    /// Returns true if this identifier is a case-insensitive match for
    /// `keyword`, allowing the usual abbreviation to no fewer than the first 3
    /// characters.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        id_match(keyword, self.0.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

/// Returns true if `token` is a case-insensitive match for `keyword`,
/// abbreviated to no fewer than the first 3 characters.
///
/// `keyword` must be ASCII.
pub fn id_match(keyword: &str, token: &str) -> bool {
    id_match_n(keyword, token, 3)
}

/// Returns true if `token` is a case-insensitive match for at least the first
/// `n` characters of `keyword`.
///
/// `keyword` must be ASCII.
pub fn id_match_n(keyword: &str, token: &str, n: usize) -> bool {
    debug_assert!(keyword.is_ascii());
    let keyword_prefix = if (n..keyword.len()).contains(&token.len()) {
        &keyword[..token.len()]
    } else {
        keyword
    };
    keyword_prefix.eq_ignore_ascii_case(token)
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl Debug for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?}", self.0)
    }
}
