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

//! Expression trees.
//!
//! The parser lowers operator syntax directly into this tree; no raw operator
//! text survives past it.  `a THRU b` ranges are not expressions: they only
//! occur in `RECODE` specifications, which carry them in their own rule
//! patterns.  Conditionals only arise from lowering `DO IF` blocks.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{
    command::{Cursor, ParseError},
    identifier::Identifier,
    lex::{Punct, Token},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// Numeric literal.
    Number(f64),

    /// String literal.
    String(String),

    /// The system-missing value.
    Sysmis,

    /// Reference to a column of the active dataset.
    Variable(Identifier),

    UnaryOp(UnaryOp, Box<Expression>),

    BinaryOp(BinaryOp, Box<Expression>, Box<Expression>),

    /// Function call, e.g. `LAG(score)` or `CONCAT("ID_", name)`.
    Call(Identifier, Vec<Expression>),

    /// `if condition then `then` else `otherwise``.  Chains of these render as
    /// `case_when`.
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// SPSS spelling, used for diagnostics and topology dumps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "**",
            Self::Eq => "=",
            Self::Ne => "~=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Self::Or => 1,
            Self::And => 2,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge => 4,
            Self::Add | Self::Sub => 5,
            Self::Mul | Self::Div => 6,
            Self::Pow => 7,
        }
    }
}

impl Expression {
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::BinaryOp(op, Box::new(left), Box::new(right))
    }

    /// Calls `visit` for every column reference in the expression.
    pub fn visit_columns<F>(&self, visit: &mut F)
    where
        F: FnMut(&Identifier),
    {
        match self {
            Self::Number(_) | Self::String(_) | Self::Sysmis => (),
            Self::Variable(id) => visit(id),
            Self::UnaryOp(_, operand) => operand.visit_columns(visit),
            Self::BinaryOp(_, left, right) => {
                left.visit_columns(visit);
                right.visit_columns(visit);
            }
            Self::Call(_, args) => {
                for arg in args {
                    arg.visit_columns(visit);
                }
            }
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.visit_columns(visit);
                then.visit_columns(visit);
                otherwise.visit_columns(visit);
            }
        }
    }

    /// Returns true if the expression reads the column `id`.
    pub fn reads_column(&self, id: &Identifier) -> bool {
        let mut found = false;
        self.visit_columns(&mut |column| {
            if column == id {
                found = true;
            }
        });
        found
    }
}

fn precedence_of(expression: &Expression) -> u8 {
    match expression {
        Expression::BinaryOp(op, ..) => op.precedence(),
        Expression::UnaryOp(UnaryOp::Not, _) => 3,
        Expression::UnaryOp(UnaryOp::Negate, _) => 8,
        _ => 9,
    }
}

impl Display for Expression {
    /// Renders the expression in source (SPSS) spelling, for dumps and
    /// diagnostics.
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        fn side(f: &mut Formatter<'_>, e: &Expression, min: u8) -> FmtResult {
            if precedence_of(e) < min {
                write!(f, "({e})")
            } else {
                write!(f, "{e}")
            }
        }
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Sysmis => write!(f, "SYSMIS"),
            Self::Variable(id) => write!(f, "{id}"),
            Self::UnaryOp(UnaryOp::Negate, operand) => {
                write!(f, "-")?;
                side(f, operand, 8)
            }
            Self::UnaryOp(UnaryOp::Not, operand) => {
                write!(f, "NOT ")?;
                side(f, operand, 3)
            }
            Self::BinaryOp(op, left, right) => {
                // `**` is right-associative; everything else associates left.
                let (left_min, right_min) = match op {
                    BinaryOp::Pow => (op.precedence() + 1, op.precedence()),
                    _ => (op.precedence(), op.precedence() + 1),
                };
                side(f, left, left_min)?;
                write!(f, " {} ", op.as_str())?;
                side(f, right, right_min)
            }
            Self::Call(function, args) => {
                write!(f, "{function}(")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::Conditional {
                condition,
                then,
                otherwise,
            } => write!(f, "IF({condition}, {then}, {otherwise})"),
        }
    }
}

/// Parses an expression with the usual operator precedence.
pub fn parse_expression(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    parse_or(cursor)
}

fn parse_or(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    let mut left = parse_and(cursor)?;
    while cursor.match_punct(Punct::Or) {
        let right = parse_and(cursor)?;
        left = Expression::binary(BinaryOp::Or, left, right);
    }
    Ok(left)
}

fn parse_and(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    let mut left = parse_not(cursor)?;
    while cursor.match_punct(Punct::And) {
        let right = parse_not(cursor)?;
        left = Expression::binary(BinaryOp::And, left, right);
    }
    Ok(left)
}

fn parse_not(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    if cursor.match_punct(Punct::Not) {
        let operand = parse_not(cursor)?;
        Ok(Expression::UnaryOp(UnaryOp::Not, Box::new(operand)))
    } else {
        parse_comparison(cursor)
    }
}

fn comparison_op(token: &Token) -> Option<BinaryOp> {
    match token {
        Token::Punct(Punct::Equals) | Token::Punct(Punct::Eq) => Some(BinaryOp::Eq),
        Token::Punct(Punct::Ne) => Some(BinaryOp::Ne),
        Token::Punct(Punct::Lt) => Some(BinaryOp::Lt),
        Token::Punct(Punct::Le) => Some(BinaryOp::Le),
        Token::Punct(Punct::Gt) => Some(BinaryOp::Gt),
        Token::Punct(Punct::Ge) => Some(BinaryOp::Ge),
        _ => None,
    }
}

fn parse_comparison(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    let mut left = parse_additive(cursor)?;
    while let Some(op) = cursor.token().and_then(comparison_op) {
        cursor.advance();
        let right = parse_additive(cursor)?;
        left = Expression::binary(op, left, right);
    }
    Ok(left)
}

fn parse_additive(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    let mut left = parse_term(cursor)?;
    loop {
        let op = if cursor.match_punct(Punct::Plus) {
            BinaryOp::Add
        } else if cursor.match_punct(Punct::Dash) {
            BinaryOp::Sub
        } else {
            return Ok(left);
        };
        let right = parse_term(cursor)?;
        left = Expression::binary(op, left, right);
    }
}

fn parse_term(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    let mut left = parse_factor(cursor)?;
    loop {
        let op = if cursor.match_punct(Punct::Asterisk) {
            BinaryOp::Mul
        } else if cursor.match_punct(Punct::Slash) {
            BinaryOp::Div
        } else {
            return Ok(left);
        };
        let right = parse_factor(cursor)?;
        left = Expression::binary(op, left, right);
    }
}

fn parse_factor(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    if cursor.match_punct(Punct::Dash) {
        let operand = parse_factor(cursor)?;
        return Ok(match operand {
            Expression::Number(number) => Expression::Number(-number),
            operand => Expression::UnaryOp(UnaryOp::Negate, Box::new(operand)),
        });
    }
    if cursor.match_punct(Punct::Plus) {
        return parse_factor(cursor);
    }
    let base = parse_primary(cursor)?;
    if cursor.match_punct(Punct::Exp) {
        // `**` is right-associative.
        let exponent = parse_factor(cursor)?;
        Ok(Expression::binary(BinaryOp::Pow, base, exponent))
    } else {
        Ok(base)
    }
}

fn parse_primary(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    match cursor.token() {
        Some(Token::Number(number)) => {
            let number = *number;
            cursor.advance();
            Ok(Expression::Number(number))
        }
        Some(Token::String(s)) => {
            let s = s.clone();
            cursor.advance();
            Ok(Expression::String(s))
        }
        Some(Token::Id(id)) => {
            let id = id.clone();
            cursor.advance();
            if id.as_str().eq_ignore_ascii_case("SYSMIS")
                && cursor.token() != Some(&Token::Punct(Punct::LParen))
            {
                return Ok(Expression::Sysmis);
            }
            if cursor.match_punct(Punct::LParen) {
                let mut args = Vec::new();
                if !cursor.match_punct(Punct::RParen) {
                    loop {
                        args.push(parse_expression(cursor)?);
                        if cursor.match_punct(Punct::RParen) {
                            break;
                        }
                        if !cursor.match_punct(Punct::Comma) {
                            return Err(cursor.error("Syntax error expecting `,` or `)`."));
                        }
                    }
                }
                Ok(Expression::Call(id, args))
            } else {
                Ok(Expression::Variable(id))
            }
        }
        Some(Token::Punct(Punct::LParen)) => {
            cursor.advance();
            let inner = parse_expression(cursor)?;
            cursor.expect_punct(Punct::RParen)?;
            Ok(inner)
        }
        _ => Err(cursor.error("Syntax error expecting expression.")),
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryOp, Expression, parse_expression};
    use crate::{
        command::Cursor,
        identifier::Identifier,
        message::SourceFile,
    };

    fn parse(source: &str) -> Expression {
        let file = SourceFile::for_string(String::from(source));
        let tokens: Vec<_> = crate::lex::StringScanner::new(file.contents())
            .map(|r| r.unwrap())
            .collect();
        let mut cursor = Cursor::new(&tokens, &file);
        let expression = parse_expression(&mut cursor).unwrap();
        assert!(cursor.is_empty(), "trailing tokens in {source:?}");
        expression
    }

    #[test]
    fn precedence() {
        assert_eq!(parse("1 + 2 * 3").to_string(), "1 + 2 * 3");
        assert_eq!(parse("(1 + 2) * 3").to_string(), "(1 + 2) * 3");
        assert_eq!(parse("a = 1 OR b = 2 AND c = 3").to_string(), "a = 1 OR b = 2 AND c = 3");
        assert_eq!(parse("NOT a = 1").to_string(), "NOT a = 1");
    }

    #[test]
    fn comparison_spellings() {
        let a = parse("score GE 50");
        let b = parse("score >= 50");
        assert_eq!(a, b);
        assert!(matches!(a, Expression::BinaryOp(BinaryOp::Ge, ..)));
    }

    #[test]
    fn negative_numbers_fold() {
        assert_eq!(parse("-9"), Expression::Number(-9.0));
        assert_eq!(
            parse("0 - 9"),
            Expression::binary(BinaryOp::Sub, Expression::Number(0.0), Expression::Number(9.0))
        );
    }

    #[test]
    fn calls() {
        let e = parse("CONCAT('ID_', name)");
        let Expression::Call(function, args) = &e else {
            panic!("expected call: {e:?}");
        };
        assert!(function.matches_keyword("CONCAT"));
        assert_eq!(args.len(), 2);
        assert_eq!(args[1], Expression::Variable(Identifier::new("name").unwrap()));
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(parse("2 ** 3 ** 2").to_string(), "2 ** 3 ** 2");
        assert_eq!(
            parse("2 ** 3 ** 2"),
            Expression::binary(
                BinaryOp::Pow,
                Expression::Number(2.0),
                Expression::binary(BinaryOp::Pow, Expression::Number(3.0), Expression::Number(2.0)),
            )
        );
    }
}
