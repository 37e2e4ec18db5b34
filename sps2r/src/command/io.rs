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

//! Parsers for the commands that read, write, join, and aggregate datasets.

use crate::{
    identifier::Identifier,
    ir::{Reduction, Schema, VarType},
    lex::{Punct, Token},
};

use super::{Cursor, ParseError};

/// `GET DATA /TYPE=TXT /FILE='…' /FIRSTCASE=n /VARIABLES=…`.
#[derive(Clone, Debug, PartialEq)]
pub struct GetData {
    pub filename: String,
    /// Number of leading rows to skip; `FIRSTCASE=n` means `n - 1`.
    pub skip_rows: u32,
    pub schema: Schema,
}

/// `GET FILE='…'`.
#[derive(Clone, Debug, PartialEq)]
pub struct GetFile {
    pub filename: String,
}

/// `DATA LIST FREE [FILE='…'] /var (FMT) …`.
#[derive(Clone, Debug, PartialEq)]
pub struct DataList {
    pub filename: Option<String>,
    pub schema: Schema,
}

/// `SAVE OUTFILE='…'`.  Whether this writes CSV or SAV is decided by the
/// filename extension at lowering time.
#[derive(Clone, Debug, PartialEq)]
pub struct Save {
    pub filename: String,
}

/// `MATCH FILES /FILE='a.sav' /FILE=* /BY key…`.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchFiles {
    pub sources: Vec<MatchSource>,
    pub by_keys: Vec<Identifier>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum MatchSource {
    /// `FILE=*`, the active dataset.
    Active,
    /// `FILE='name.sav'`.
    File(String),
}

/// `AGGREGATE [/OUTFILE=*] /BREAK=keys /target = FN(source) …`.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub break_keys: Vec<Identifier>,
    pub reductions: Vec<Reduction>,
}

/// Interprets a format specifier such as `F8.0`, `A10`, or `F3` as a column
/// type.  Only the gross type is honored; numeric precision is dropped.
pub fn parse_format(id: &Identifier) -> Option<VarType> {
    let s = id.as_str();
    let letters_len = s.chars().take_while(|c| c.is_ascii_alphabetic()).count();
    if letters_len == 0 {
        return None;
    }
    let (letters, rest) = s.split_at(letters_len);
    let width = match rest.split('.').next().unwrap() {
        "" => None,
        digits => Some(digits.parse::<u32>().ok()?),
    };
    if letters.eq_ignore_ascii_case("A") {
        Some(VarType::String { width })
    } else if [
        "F", "N", "E", "COMMA", "DOT", "DOLLAR", "PCT", "DATE", "ADATE", "EDATE", "SDATE", "TIME",
        "DATETIME",
    ]
    .iter()
    .any(|known| known.eq_ignore_ascii_case(letters))
    {
        Some(VarType::Numeric)
    } else {
        None
    }
}

fn take_format(cursor: &mut Cursor) -> Result<VarType, ParseError> {
    let error = cursor.error("Syntax error expecting variable format.");
    let id = cursor.take_id().map_err(|_| error.clone())?;
    parse_format(&id).ok_or(error)
}

fn parse_variables(cursor: &mut Cursor, schema: &mut Schema) -> Result<(), ParseError> {
    loop {
        let name = cursor.take_id()?;
        let var_type = take_format(cursor)?;
        schema.put(name, var_type);
        if cursor.is_empty() || cursor.token() == Some(&Token::Punct(Punct::Slash)) {
            return Ok(());
        }
    }
}

pub fn parse_get_data(cursor: &mut Cursor) -> Result<GetData, ParseError> {
    let mut filename = None;
    let mut skip_rows = 0;
    let mut schema = Schema::default();
    let mut saw_variables = false;

    while !cursor.is_empty() {
        cursor.expect_punct(Punct::Slash)?;
        let subcommand = cursor.take_id()?;
        if subcommand.matches_keyword("TYPE") {
            cursor.expect_punct(Punct::Equals)?;
            let value = cursor.take_id()?;
            if !value.matches_keyword("TXT") && !value.matches_keyword("CSV") {
                return Err(cursor.error(format!("Unsupported data type `{value}`.")));
            }
        } else if subcommand.matches_keyword("FILE") {
            cursor.expect_punct(Punct::Equals)?;
            filename = Some(cursor.take_string()?);
        } else if subcommand.matches_keyword("FIRSTCASE") {
            cursor.expect_punct(Punct::Equals)?;
            let first_case = cursor.take_integer()?;
            if first_case < 1 {
                return Err(cursor.error("FIRSTCASE must be at least 1."));
            }
            skip_rows = (first_case - 1) as u32;
        } else if subcommand.matches_keyword("DELIMITERS") {
            cursor.expect_punct(Punct::Equals)?;
            let delimiters = cursor.take_string()?;
            if delimiters != "," {
                return Err(cursor.error("Only comma-delimited text data is supported."));
            }
        } else if subcommand.matches_keyword("QUALIFIER") {
            cursor.expect_punct(Punct::Equals)?;
            cursor.take_string()?;
        } else if subcommand.matches_keyword("VARIABLES") {
            cursor.expect_punct(Punct::Equals)?;
            parse_variables(cursor, &mut schema)?;
            saw_variables = true;
        } else {
            return Err(cursor.error(format!("Unrecognized GET DATA subcommand `{subcommand}`.")));
        }
    }

    let Some(filename) = filename else {
        return Err(cursor.error("GET DATA requires a /FILE subcommand."));
    };
    if !saw_variables {
        return Err(cursor.error("GET DATA requires a /VARIABLES subcommand."));
    }
    Ok(GetData {
        filename,
        skip_rows,
        schema,
    })
}

pub fn parse_get_file(cursor: &mut Cursor) -> Result<GetFile, ParseError> {
    cursor.match_punct(Punct::Slash);
    cursor.expect_keyword("FILE")?;
    cursor.expect_punct(Punct::Equals)?;
    let filename = cursor.take_string()?;
    cursor.expect_end()?;
    Ok(GetFile { filename })
}

pub fn parse_data_list(cursor: &mut Cursor) -> Result<DataList, ParseError> {
    let mut filename = None;
    loop {
        if cursor.match_punct(Punct::Slash) {
            break;
        }
        let keyword = cursor.take_id()?;
        if keyword.matches_keyword("FREE") || keyword.matches_keyword("LIST") {
            // Free-field arrangement, the only one supported.
        } else if keyword.matches_keyword("FIXED") {
            return Err(cursor.error("DATA LIST FIXED is not supported."));
        } else if keyword.matches_keyword("FILE") {
            cursor.expect_punct(Punct::Equals)?;
            filename = Some(cursor.take_string()?);
        } else {
            return Err(cursor.error(format!("Unrecognized DATA LIST keyword `{keyword}`.")));
        }
    }

    let mut schema = Schema::default();
    while !cursor.is_empty() {
        let name = cursor.take_id()?;
        let var_type = if cursor.match_punct(Punct::LParen) {
            let var_type = take_format(cursor)?;
            cursor.expect_punct(Punct::RParen)?;
            var_type
        } else {
            VarType::Numeric
        };
        schema.put(name, var_type);
    }
    if schema.columns.is_empty() {
        return Err(cursor.error("DATA LIST requires at least one variable."));
    }
    Ok(DataList { filename, schema })
}

pub fn parse_save(cursor: &mut Cursor) -> Result<Save, ParseError> {
    cursor.match_punct(Punct::Slash);
    cursor.expect_keyword("OUTFILE")?;
    cursor.expect_punct(Punct::Equals)?;
    let filename = cursor.take_string()?;
    cursor.expect_end()?;
    Ok(Save { filename })
}

pub fn parse_match_files(cursor: &mut Cursor) -> Result<MatchFiles, ParseError> {
    let mut sources = Vec::new();
    let mut by_keys = Vec::new();

    while !cursor.is_empty() {
        cursor.expect_punct(Punct::Slash)?;
        if cursor.match_punct(Punct::By) {
            cursor.match_punct(Punct::Equals);
            while let Ok(key) = cursor.take_id() {
                by_keys.push(key);
            }
            if by_keys.is_empty() {
                return Err(cursor.error("Syntax error expecting variable name after BY."));
            }
        } else {
            let subcommand = cursor.take_id()?;
            if subcommand.matches_keyword("FILE") {
                cursor.expect_punct(Punct::Equals)?;
                if cursor.match_punct(Punct::Asterisk) {
                    sources.push(MatchSource::Active);
                } else {
                    sources.push(MatchSource::File(cursor.take_string()?));
                }
            } else if subcommand.matches_keyword("TABLE") {
                return Err(cursor.error("MATCH FILES /TABLE is not supported."));
            } else {
                return Err(cursor.error(format!(
                    "Unrecognized MATCH FILES subcommand `{subcommand}`."
                )));
            }
        }
    }

    if sources.len() < 2 {
        return Err(cursor.error("MATCH FILES requires at least two /FILE subcommands."));
    }
    if by_keys.is_empty() {
        return Err(cursor.error("MATCH FILES requires a /BY subcommand."));
    }
    Ok(MatchFiles { sources, by_keys })
}

pub fn parse_aggregate(cursor: &mut Cursor) -> Result<Aggregate, ParseError> {
    let mut break_keys = Vec::new();
    let mut reductions = Vec::new();

    while !cursor.is_empty() {
        cursor.expect_punct(Punct::Slash)?;
        let name = cursor.take_id()?;
        if name.matches_keyword("OUTFILE") {
            cursor.expect_punct(Punct::Equals)?;
            if !cursor.match_punct(Punct::Asterisk) {
                return Err(cursor.error("Only AGGREGATE /OUTFILE=* is supported."));
            }
        } else if name.matches_keyword("BREAK") {
            cursor.expect_punct(Punct::Equals)?;
            while let Ok(key) = cursor.take_id() {
                break_keys.push(key);
            }
            if break_keys.is_empty() {
                return Err(cursor.error("Syntax error expecting variable name after BREAK."));
            }
        } else {
            cursor.expect_punct(Punct::Equals)?;
            let function = cursor.take_id()?;
            let source = if cursor.match_punct(Punct::LParen) {
                let source = cursor.take_id()?;
                cursor.expect_punct(Punct::RParen)?;
                Some(source)
            } else {
                None
            };
            reductions.push(Reduction {
                target: name,
                function,
                source,
            });
        }
    }

    if reductions.is_empty() {
        return Err(cursor.error("AGGREGATE requires at least one aggregated variable."));
    }
    Ok(Aggregate {
        break_keys,
        reductions,
    })
}

#[cfg(test)]
mod tests {
    use crate::{
        command::{Command, parse},
        ir::VarType,
        message::SourceFile,
    };

    use super::MatchSource;

    fn parse_one(source: &str) -> Command {
        let file = SourceFile::for_string(String::from(source));
        let mut commands = parse(&file).unwrap();
        assert_eq!(commands.len(), 1);
        commands.pop().unwrap().command
    }

    #[test]
    fn get_data_parameters() {
        let Command::GetData(get_data) = parse_one(
            "GET DATA\n  /TYPE=TXT\n  /FILE='test.csv'\n  /FIRSTCASE=2\n  /VARIABLES=id F8.0 name A10.\n",
        ) else {
            panic!();
        };
        assert_eq!(get_data.filename, "test.csv");
        assert_eq!(get_data.skip_rows, 1);
        assert_eq!(get_data.schema.columns.len(), 2);
        assert_eq!(get_data.schema.columns[0].name.as_str(), "id");
        assert_eq!(get_data.schema.columns[0].var_type, VarType::Numeric);
        assert_eq!(
            get_data.schema.columns[1].var_type,
            VarType::String { width: Some(10) }
        );
    }

    #[test]
    fn get_data_requires_file() {
        let file = SourceFile::for_string(String::from("GET DATA /TYPE=TXT /VARIABLES=id F8.0.\n"));
        assert!(parse(&file).is_err());
    }

    #[test]
    fn data_list_free() {
        let Command::DataList(data_list) = parse_one("DATA LIST FREE / id (F8.0).\n") else {
            panic!();
        };
        assert_eq!(data_list.filename, None);
        assert_eq!(data_list.schema.columns[0].name.as_str(), "id");
    }

    #[test]
    fn match_files() {
        let Command::MatchFiles(match_files) =
            parse_one("MATCH FILES /FILE='a.sav' /FILE='b.sav' /BY id.\n")
        else {
            panic!();
        };
        assert_eq!(
            match_files.sources,
            vec![
                MatchSource::File(String::from("a.sav")),
                MatchSource::File(String::from("b.sav")),
            ]
        );
        assert_eq!(match_files.by_keys.len(), 1);
    }

    #[test]
    fn aggregate() {
        let Command::Aggregate(aggregate) =
            parse_one("AGGREGATE /OUTFILE=* /BREAK=grp /mean_score = MEAN(score).\n")
        else {
            panic!();
        };
        assert_eq!(aggregate.break_keys.len(), 1);
        assert_eq!(aggregate.reductions.len(), 1);
        let reduction = &aggregate.reductions[0];
        assert_eq!(reduction.target.as_str(), "mean_score");
        assert!(reduction.function.matches_keyword("MEAN"));
        assert_eq!(reduction.source.as_ref().unwrap().as_str(), "score");
    }

    #[test]
    fn save_outfile() {
        let Command::Save(save) = parse_one("SAVE OUTFILE='sorted.sav'.\n") else {
            panic!();
        };
        assert_eq!(save.filename, "sorted.sav");
    }
}
