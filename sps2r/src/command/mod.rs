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

//! Command parsing.
//!
//! The scanner's token stream is split into commands at [Token::End], and a
//! recursive-descent handler for each command keyword turns the tokens into a
//! [Command] AST node.  `DO IF`...`END IF` sequences are assembled into a
//! single compound [Command::DoIf] node here; lowering them into conditional
//! expressions is the graph builder's job.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::{
    expr::{self, Expression},
    identifier::Identifier,
    lex::{LexToken, Punct, StringScanner, Token},
    message::{Location, SourceFile},
};

pub mod io;
pub mod transform;

pub use io::{Aggregate, DataList, GetData, GetFile, MatchFiles, MatchSource, Save};
pub use transform::{Compute, MissingValues, Recode, SelectIf, SortCases, StringDecl};

/// A syntax error, from scanning, command parsing, or expression parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseError {
    pub text: String,
    pub location: Location,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        if self.location.is_empty() {
            write!(f, "{}", self.text)
        } else {
            write!(f, "{}: {}", self.location, self.text)
        }
    }
}

impl std::error::Error for ParseError {}

/// One parsed command, with the source region it was parsed from.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedCommand {
    pub command: Command,
    pub location: Location,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    GetData(GetData),
    GetFile(GetFile),
    DataList(DataList),
    Save(Save),
    MatchFiles(MatchFiles),
    Aggregate(Aggregate),
    Compute(Compute),
    Recode(Recode),
    SelectIf(SelectIf),
    SortCases(SortCases),
    MissingValues(MissingValues),
    StringDecl(StringDecl),
    DoIf(DoIfBlock),
    Execute,
}

/// A `DO IF`...`END IF` compound node.  Branches appear in source order; only
/// the final branch may have no condition (`ELSE`).
#[derive(Clone, Debug, PartialEq)]
pub struct DoIfBlock {
    pub branches: Vec<DoIfBranch>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DoIfBranch {
    pub condition: Option<Expression>,
    pub body: Vec<ParsedCommand>,
}

/// A window onto the tokens of a single command.
pub struct Cursor<'a> {
    tokens: &'a [LexToken],
    index: usize,
    file: &'a SourceFile,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a [LexToken], file: &'a SourceFile) -> Self {
        Self {
            tokens,
            index: 0,
            file,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.index >= self.tokens.len()
    }

    pub fn token(&self) -> Option<&'a Token> {
        self.tokens.get(self.index).map(|t| &t.token)
    }

    pub fn get(&self, offset: usize) -> Option<&'a Token> {
        self.tokens.get(self.index + offset).map(|t| &t.token)
    }

    pub fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.index).map(|t| &t.token);
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    /// The location of the current token, or of the end of the command if all
    /// tokens have been consumed.
    pub fn location(&self) -> Location {
        match self.tokens.get(self.index) {
            Some(token) => self.file.location(token.pos.clone()),
            None => match self.tokens.last() {
                Some(token) => self.file.location(token.pos.end..token.pos.end),
                None => Location::default(),
            },
        }
    }

    /// The location spanning the whole command.
    pub fn command_location(&self) -> Location {
        match (self.tokens.first(), self.tokens.last()) {
            (Some(first), Some(last)) => self.file.location(first.pos.start..last.pos.end),
            _ => Location::default(),
        }
    }

    pub fn error(&self, text: impl Into<String>) -> ParseError {
        ParseError {
            text: text.into(),
            location: self.location(),
        }
    }

    pub fn match_punct(&mut self, punct: Punct) -> bool {
        if self.token() == Some(&Token::Punct(punct)) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_punct(&mut self, punct: Punct) -> Result<(), ParseError> {
        if self.match_punct(punct) {
            Ok(())
        } else {
            Err(self.error(format!("Syntax error expecting `{punct}`.")))
        }
    }

    pub fn match_keyword(&mut self, keyword: &str) -> bool {
        if self.token().is_some_and(|t| t.matches_keyword(keyword)) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    pub fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.match_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(format!("Syntax error expecting `{keyword}`.")))
        }
    }

    pub fn take_id(&mut self) -> Result<Identifier, ParseError> {
        match self.token() {
            Some(Token::Id(id)) => {
                let id = id.clone();
                self.index += 1;
                Ok(id)
            }
            _ => Err(self.error("Syntax error expecting identifier.")),
        }
    }

    pub fn take_string(&mut self) -> Result<String, ParseError> {
        match self.token() {
            Some(Token::String(s)) => {
                let s = s.clone();
                self.index += 1;
                Ok(s)
            }
            _ => Err(self.error("Syntax error expecting string.")),
        }
    }

    pub fn take_integer(&mut self) -> Result<i64, ParseError> {
        match self.token().and_then(Token::as_integer) {
            Some(integer) => {
                self.index += 1;
                Ok(integer)
            }
            None => Err(self.error("Syntax error expecting integer.")),
        }
    }

    /// Takes a number, allowing a leading `-` or `+` sign.
    pub fn take_signed_number(&mut self) -> Result<f64, ParseError> {
        let negate = if self.match_punct(Punct::Dash) {
            true
        } else {
            self.match_punct(Punct::Plus);
            false
        };
        match self.token().and_then(Token::as_number) {
            Some(number) => {
                self.index += 1;
                Ok(if negate { -number } else { number })
            }
            None => Err(self.error("Syntax error expecting number.")),
        }
    }

    /// Fails unless the whole command has been consumed.
    pub fn expect_end(&self) -> Result<(), ParseError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.error("Syntax error expecting end of command."))
        }
    }
}

/// Parses a whole source file into a command sequence.  The first error
/// aborts.
pub fn parse(file: &SourceFile) -> Result<Vec<ParsedCommand>, ParseError> {
    let mut tokens = Vec::new();
    for result in StringScanner::new(file.contents()) {
        match result {
            Ok(token) => tokens.push(token),
            Err((error, pos)) => {
                return Err(ParseError {
                    text: error.to_string(),
                    location: file.location(pos),
                });
            }
        }
    }

    let mut raws = Vec::new();
    for group in tokens.split(|t| t.token == Token::End) {
        if group.is_empty() {
            continue;
        }
        let mut cursor = Cursor::new(group, file);
        let location = cursor.command_location();
        let raw = parse_command(&mut cursor)?;
        raws.push((raw, location));
    }
    assemble(raws)
}

enum Raw {
    Command(Command),
    DoIf(Expression),
    ElseIf(Expression),
    Else,
    EndIf,
}

fn parse_command(cursor: &mut Cursor) -> Result<Raw, ParseError> {
    let Some(Token::Id(_)) = cursor.token() else {
        return Err(cursor.error("Syntax error expecting command name."));
    };

    if cursor.match_keyword("GET") {
        if cursor.match_keyword("DATA") {
            Ok(Raw::Command(Command::GetData(io::parse_get_data(cursor)?)))
        } else {
            Ok(Raw::Command(Command::GetFile(io::parse_get_file(cursor)?)))
        }
    } else if cursor.match_keyword("DATA") {
        cursor.expect_keyword("LIST")?;
        Ok(Raw::Command(Command::DataList(io::parse_data_list(cursor)?)))
    } else if cursor.match_keyword("SAVE") {
        Ok(Raw::Command(Command::Save(io::parse_save(cursor)?)))
    } else if cursor.match_keyword("MATCH") {
        cursor.expect_keyword("FILES")?;
        Ok(Raw::Command(Command::MatchFiles(io::parse_match_files(
            cursor,
        )?)))
    } else if cursor.match_keyword("AGGREGATE") {
        Ok(Raw::Command(Command::Aggregate(io::parse_aggregate(
            cursor,
        )?)))
    } else if cursor.match_keyword("COMPUTE") {
        Ok(Raw::Command(Command::Compute(transform::parse_compute(
            cursor,
        )?)))
    } else if cursor.match_keyword("RECODE") {
        Ok(Raw::Command(Command::Recode(transform::parse_recode(
            cursor,
        )?)))
    } else if cursor.match_keyword("SELECT") {
        cursor.expect_keyword("IF")?;
        Ok(Raw::Command(Command::SelectIf(transform::parse_select_if(
            cursor,
        )?)))
    } else if cursor.match_keyword("SORT") {
        cursor.match_keyword("CASES");
        Ok(Raw::Command(Command::SortCases(
            transform::parse_sort_cases(cursor)?,
        )))
    } else if cursor.match_keyword("MISSING") {
        cursor.expect_keyword("VALUES")?;
        Ok(Raw::Command(Command::MissingValues(
            transform::parse_missing_values(cursor)?,
        )))
    } else if cursor.match_keyword("STRING") {
        Ok(Raw::Command(Command::StringDecl(
            transform::parse_string_decl(cursor)?,
        )))
    } else if cursor.match_keyword("DO") {
        cursor.expect_keyword("IF")?;
        let condition = transform::parse_condition(cursor)?;
        Ok(Raw::DoIf(condition))
    } else if cursor.match_keyword("ELSE") {
        if cursor.match_keyword("IF") {
            let condition = transform::parse_condition(cursor)?;
            Ok(Raw::ElseIf(condition))
        } else {
            cursor.expect_end()?;
            Ok(Raw::Else)
        }
    } else if cursor.match_keyword("END") {
        cursor.expect_keyword("IF")?;
        cursor.expect_end()?;
        Ok(Raw::EndIf)
    } else if cursor.match_keyword("EXECUTE") {
        cursor.expect_end()?;
        Ok(Raw::Command(Command::Execute))
    } else {
        Err(cursor.error(format!(
            "Unrecognized command `{}`.",
            cursor.token().unwrap()
        )))
    }
}

struct OpenBlock {
    location: Location,
    finished: Vec<DoIfBranch>,
    condition: Option<Expression>,
    body: Vec<ParsedCommand>,
}

impl OpenBlock {
    fn finish_branch(&mut self) {
        self.finished.push(DoIfBranch {
            condition: self.condition.take(),
            body: std::mem::take(&mut self.body),
        });
    }
}

/// Groups `DO IF`/`ELSE IF`/`ELSE`/`END IF` command sequences into compound
/// [Command::DoIf] nodes, handling nesting.
fn assemble(raws: Vec<(Raw, Location)>) -> Result<Vec<ParsedCommand>, ParseError> {
    let mut output = Vec::new();
    let mut stack: Vec<OpenBlock> = Vec::new();

    fn emit(output: &mut Vec<ParsedCommand>, stack: &mut [OpenBlock], command: ParsedCommand) {
        match stack.last_mut() {
            Some(block) => block.body.push(command),
            None => output.push(command),
        }
    }

    for (raw, location) in raws {
        match raw {
            Raw::Command(command) => {
                emit(&mut output, &mut stack, ParsedCommand { command, location })
            }
            Raw::DoIf(condition) => stack.push(OpenBlock {
                location,
                finished: Vec::new(),
                condition: Some(condition),
                body: Vec::new(),
            }),
            Raw::ElseIf(condition) => match stack.last_mut() {
                Some(block) if block.condition.is_some() => {
                    block.finish_branch();
                    block.condition = Some(condition);
                }
                Some(_) => {
                    return Err(ParseError {
                        text: String::from("`ELSE IF` may not follow `ELSE`."),
                        location,
                    });
                }
                None => {
                    return Err(ParseError {
                        text: String::from("`ELSE IF` without matching `DO IF`."),
                        location,
                    });
                }
            },
            Raw::Else => match stack.last_mut() {
                Some(block) if block.condition.is_some() => {
                    block.finish_branch();
                    block.condition = None;
                }
                Some(_) => {
                    return Err(ParseError {
                        text: String::from("Duplicate `ELSE`."),
                        location,
                    });
                }
                None => {
                    return Err(ParseError {
                        text: String::from("`ELSE` without matching `DO IF`."),
                        location,
                    });
                }
            },
            Raw::EndIf => match stack.pop() {
                Some(mut block) => {
                    block.finish_branch();
                    let command = ParsedCommand {
                        command: Command::DoIf(DoIfBlock {
                            branches: block.finished,
                        }),
                        location: block.location,
                    };
                    emit(&mut output, &mut stack, command);
                }
                None => {
                    return Err(ParseError {
                        text: String::from("`END IF` without matching `DO IF`."),
                        location,
                    });
                }
            },
        }
    }

    if let Some(block) = stack.pop() {
        return Err(ParseError {
            text: String::from("`DO IF` without matching `END IF`."),
            location: block.location,
        });
    }
    Ok(output)
}

/// Parses a parenthesized or bare expression running to the end of the
/// command.
pub fn parse_full_expression(cursor: &mut Cursor) -> Result<Expression, ParseError> {
    let expression = expr::parse_expression(cursor)?;
    cursor.expect_end()?;
    Ok(expression)
}
