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

//! Parsers for the row-transforming commands.

use crate::{
    expr::Expression,
    identifier::Identifier,
    ir::{
        MissingRule, RecodePattern, RecodeRule, RecodeValue, Sentinel, SortDirection, SortKey,
        StringWidth, VarType,
    },
    lex::{Punct, Token},
};

use super::{Cursor, ParseError, parse_full_expression};

/// `COMPUTE target = expression`.
#[derive(Clone, Debug, PartialEq)]
pub struct Compute {
    pub target: Identifier,
    pub expression: Expression,
}

/// `RECODE source (patterns = value)… [INTO target]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Recode {
    pub source: Identifier,
    /// `None` recodes in place.
    pub target: Option<Identifier>,
    pub rules: Vec<RecodeRule>,
}

/// `SELECT IF (predicate)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectIf {
    pub predicate: Expression,
}

/// `SORT CASES BY key (A) key (D)…`.
#[derive(Clone, Debug, PartialEq)]
pub struct SortCases {
    pub keys: Vec<SortKey>,
}

/// `MISSING VALUES var… (sentinel, …)…`.
#[derive(Clone, Debug, PartialEq)]
pub struct MissingValues {
    pub rules: Vec<MissingRule>,
}

/// `STRING var… (Aw)…`.
#[derive(Clone, Debug, PartialEq)]
pub struct StringDecl {
    pub decls: Vec<StringWidth>,
}

pub fn parse_compute(cursor: &mut Cursor) -> Result<Compute, ParseError> {
    let target = cursor.take_id()?;
    cursor.expect_punct(Punct::Equals)?;
    let expression = parse_full_expression(cursor)?;
    Ok(Compute { target, expression })
}

/// Parses the predicate of `DO IF`, `ELSE IF`, or `SELECT IF`, which runs to
/// the end of the command.  Parentheses around it are ordinary expression
/// syntax.
pub fn parse_condition(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    parse_full_expression(cursor)
}

pub fn parse_select_if(cursor: &mut Cursor) -> Result<SelectIf, ParseError> {
    Ok(SelectIf {
        predicate: parse_condition(cursor)?,
    })
}

fn is_lo(id: &Identifier) -> bool {
    id.as_str().eq_ignore_ascii_case("LO") || id.matches_keyword("LOWEST")
}

fn is_hi(id: &Identifier) -> bool {
    id.as_str().eq_ignore_ascii_case("HI") || id.matches_keyword("HIGHEST")
}

fn is_thru(token: Option<&Token>) -> bool {
    token.is_some_and(|token| token.matches_keyword("THRU"))
}

/// One pattern inside a recode specification: a literal value, `a THRU b`
/// with `LO`/`HI` allowed as bounds, or `ELSE`.
fn parse_recode_pattern(cursor: &mut Cursor) -> Result<RecodePattern, ParseError> {
    if let Some(Token::Id(id)) = cursor.token() {
        if id.matches_keyword("ELSE") {
            cursor.advance();
            return Ok(RecodePattern::Else);
        }
        if is_lo(id) {
            cursor.advance();
            if !is_thru(cursor.token()) {
                return Err(cursor.error("Syntax error expecting `THRU`."));
            }
            cursor.advance();
            let high = parse_recode_bound(cursor)?;
            return Ok(RecodePattern::Range {
                low: Expression::Number(f64::NEG_INFINITY),
                high,
            });
        }
    }

    let low = match cursor.token() {
        Some(Token::String(_)) => Expression::String(cursor.take_string()?),
        _ => Expression::Number(cursor.take_signed_number()?),
    };
    if is_thru(cursor.token()) {
        cursor.advance();
        let high = parse_recode_bound(cursor)?;
        Ok(RecodePattern::Range { low, high })
    } else {
        Ok(RecodePattern::Value(low))
    }
}

fn parse_recode_bound(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    if let Some(Token::Id(id)) = cursor.token()
        && is_hi(id)
    {
        cursor.advance();
        return Ok(Expression::Number(f64::INFINITY));
    }
    Ok(Expression::Number(cursor.take_signed_number()?))
}

fn parse_recode_value(cursor: &mut Cursor) -> Result<RecodeValue, ParseError> {
    match cursor.token() {
        Some(Token::String(_)) => Ok(RecodeValue::String(cursor.take_string()?)),
        Some(Token::Id(id)) if id.matches_keyword("SYSMIS") => {
            cursor.advance();
            Ok(RecodeValue::Sysmis)
        }
        Some(Token::Id(id)) if id.matches_keyword("COPY") => {
            Err(cursor.error("RECODE (… = COPY) is not supported."))
        }
        _ => Ok(RecodeValue::Number(cursor.take_signed_number()?)),
    }
}

pub fn parse_recode(cursor: &mut Cursor) -> Result<Recode, ParseError> {
    let source = cursor.take_id()?;
    let mut rules = Vec::new();
    while cursor.match_punct(Punct::LParen) {
        let mut patterns = vec![parse_recode_pattern(cursor)?];
        loop {
            if cursor.match_punct(Punct::Equals) {
                break;
            }
            cursor.match_punct(Punct::Comma);
            patterns.push(parse_recode_pattern(cursor)?);
        }
        let value = parse_recode_value(cursor)?;
        cursor.expect_punct(Punct::RParen)?;
        rules.push(RecodeRule { patterns, value });
    }
    if rules.is_empty() {
        return Err(cursor.error("RECODE requires at least one specification."));
    }

    let target = if cursor.match_keyword("INTO") {
        Some(cursor.take_id()?)
    } else {
        None
    };
    cursor.expect_end()?;
    Ok(Recode {
        source,
        target,
        rules,
    })
}

pub fn parse_sort_cases(cursor: &mut Cursor) -> Result<SortCases, ParseError> {
    cursor.expect_punct(Punct::By)?;
    let mut keys = Vec::new();
    while !cursor.is_empty() {
        let column = cursor.take_id()?;
        let direction = if cursor.match_punct(Punct::LParen) {
            let direction = cursor.take_id()?;
            let direction = if direction.as_str().eq_ignore_ascii_case("A")
                || direction.matches_keyword("UP")
                || direction.matches_keyword("ASCENDING")
            {
                SortDirection::Ascending
            } else if direction.as_str().eq_ignore_ascii_case("D")
                || direction.matches_keyword("DOWN")
                || direction.matches_keyword("DESCENDING")
            {
                SortDirection::Descending
            } else {
                return Err(cursor.error(format!("Unknown sort direction `{direction}`.")));
            };
            cursor.expect_punct(Punct::RParen)?;
            direction
        } else {
            SortDirection::Ascending
        };
        keys.push(SortKey { column, direction });
    }
    if keys.is_empty() {
        return Err(cursor.error("Syntax error expecting variable name after BY."));
    }
    Ok(SortCases { keys })
}

pub fn parse_missing_values(cursor: &mut Cursor) -> Result<MissingValues, ParseError> {
    let mut rules = Vec::new();
    while !cursor.is_empty() {
        let mut columns = vec![cursor.take_id()?];
        while let Some(Token::Id(_)) = cursor.token() {
            columns.push(cursor.take_id()?);
        }
        cursor.expect_punct(Punct::LParen)?;
        let mut sentinels = Vec::new();
        loop {
            let sentinel = match cursor.token() {
                Some(Token::String(_)) => Sentinel::String(cursor.take_string()?),
                _ => Sentinel::Number(cursor.take_signed_number()?),
            };
            sentinels.push(sentinel);
            if cursor.match_punct(Punct::RParen) {
                break;
            }
            cursor.match_punct(Punct::Comma);
        }
        for column in columns {
            rules.push(MissingRule {
                column,
                sentinels: sentinels.clone(),
            });
        }
    }
    if rules.is_empty() {
        return Err(cursor.error("Syntax error expecting variable name."));
    }
    Ok(MissingValues { rules })
}

pub fn parse_string_decl(cursor: &mut Cursor) -> Result<StringDecl, ParseError> {
    let mut decls = Vec::new();
    while !cursor.is_empty() {
        let mut columns = vec![cursor.take_id()?];
        while let Some(Token::Id(_)) = cursor.token() {
            columns.push(cursor.take_id()?);
        }
        cursor.expect_punct(Punct::LParen)?;
        let format = cursor.take_id()?;
        let width = match super::io::parse_format(&format) {
            Some(VarType::String { width: Some(width) }) => width,
            _ => {
                return Err(cursor.error(format!(
                    "STRING requires a string format such as A8, not `{format}`."
                )));
            }
        };
        cursor.expect_punct(Punct::RParen)?;
        for column in columns {
            decls.push(StringWidth {
                column: column.clone(),
                width,
            });
        }
    }
    if decls.is_empty() {
        return Err(cursor.error("Syntax error expecting variable name."));
    }
    Ok(StringDecl { decls })
}

#[cfg(test)]
mod tests {
    use crate::{
        command::{Command, parse},
        expr::{BinaryOp, Expression},
        ir::{RecodePattern, RecodeValue, Sentinel, SortDirection},
        message::SourceFile,
    };

    fn parse_one(source: &str) -> Command {
        let file = SourceFile::for_string(String::from(source));
        let mut commands = parse(&file).unwrap();
        assert_eq!(commands.len(), 1);
        commands.pop().unwrap().command
    }

    #[test]
    fn compute() {
        let Command::Compute(compute) = parse_one("COMPUTE pass = score >= 50.\n") else {
            panic!();
        };
        assert_eq!(compute.target.as_str(), "pass");
        assert!(matches!(
            compute.expression,
            Expression::BinaryOp(BinaryOp::Ge, ..)
        ));
    }

    #[test]
    fn recode_ranges() {
        let Command::Recode(recode) =
            parse_one("RECODE score (0 THRU 49 = 0) (50 THRU 100 = 1) (ELSE = SYSMIS) INTO grade.\n")
        else {
            panic!();
        };
        assert_eq!(recode.source.as_str(), "score");
        assert_eq!(recode.target.as_ref().unwrap().as_str(), "grade");
        assert_eq!(recode.rules.len(), 3);
        assert_eq!(
            recode.rules[0].patterns,
            vec![RecodePattern::Range {
                low: Expression::Number(0.0),
                high: Expression::Number(49.0),
            }]
        );
        assert_eq!(recode.rules[2].patterns, vec![RecodePattern::Else]);
        assert_eq!(recode.rules[2].value, RecodeValue::Sysmis);
    }

    #[test]
    fn recode_lo_hi_and_value_lists() {
        let Command::Recode(recode) =
            parse_one("RECODE x (LO THRU -1 = 0) (1, 2, 3 = 1) (4 THRU HI = 2).\n")
        else {
            panic!();
        };
        assert_eq!(recode.target, None);
        assert_eq!(
            recode.rules[0].patterns,
            vec![RecodePattern::Range {
                low: Expression::Number(f64::NEG_INFINITY),
                high: Expression::Number(-1.0),
            }]
        );
        assert_eq!(recode.rules[1].patterns.len(), 3);
        assert_eq!(
            recode.rules[2].patterns,
            vec![RecodePattern::Range {
                low: Expression::Number(4.0),
                high: Expression::Number(f64::INFINITY),
            }]
        );
    }

    #[test]
    fn sort_directions() {
        let Command::SortCases(sort) = parse_one("SORT CASES BY k1 (A) k2 (D).\n") else {
            panic!();
        };
        assert_eq!(sort.keys.len(), 2);
        assert_eq!(sort.keys[0].direction, SortDirection::Ascending);
        assert_eq!(sort.keys[1].direction, SortDirection::Descending);

        let Command::SortCases(sort) = parse_one("SORT CASES BY id.\n") else {
            panic!();
        };
        assert_eq!(sort.keys[0].direction, SortDirection::Ascending);
    }

    #[test]
    fn missing_values_groups() {
        let Command::MissingValues(missing) = parse_one("MISSING VALUES age (-9, -8) name ('').\n")
        else {
            panic!();
        };
        assert_eq!(missing.rules.len(), 2);
        assert_eq!(missing.rules[0].column.as_str(), "age");
        assert_eq!(
            missing.rules[0].sentinels,
            vec![Sentinel::Number(-9.0), Sentinel::Number(-8.0)]
        );
        assert_eq!(
            missing.rules[1].sentinels,
            vec![Sentinel::String(String::new())]
        );
    }

    #[test]
    fn string_decl() {
        let Command::StringDecl(decl) = parse_one("STRING label flag (A20).\n") else {
            panic!();
        };
        assert_eq!(decl.decls.len(), 2);
        assert_eq!(decl.decls[0].column.as_str(), "label");
        assert_eq!(decl.decls[0].width, 20);
    }
}
