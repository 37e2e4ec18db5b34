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

//! The intermediate representation.
//!
//! A [Pipeline] is a value: metadata, a registry of named datasets with their
//! schemas, and a topologically ordered operation list.  Passes never mutate a
//! pipeline in place; each consumes one and returns a new one.  Datasets are
//! linked by name only, so the structure is acyclic by construction.

use std::fmt::{Display, Formatter, Result as FmtResult, Write};

use indexmap::IndexMap;
use itertools::Itertools;

use crate::{expr::Expression, identifier::Identifier};

pub mod builder;

/// Free-form pipeline metadata (project name, generator tag, target).
/// Operations themselves carry no open mapping.
pub type Metadata = IndexMap<String, String>;

#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    pub metadata: Metadata,
    pub datasets: Vec<Dataset>,
    pub operations: Vec<Operation>,
}

impl Pipeline {
    pub fn dataset(&self, name: &str) -> Option<&Dataset> {
        self.datasets.iter().find(|dataset| dataset.name == name)
    }

    /// The smallest operation id not yet in use, for passes that fuse
    /// operations and must assign fresh ids.
    pub fn next_op_id(&self) -> u32 {
        self.operations
            .iter()
            .map(|op| op.id.0 + 1)
            .max()
            .unwrap_or(1)
    }

    /// Renders the human-readable topology dump.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for operation in &self.operations {
            write!(out, "{operation}").unwrap();
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub schema: Schema,
}

/// An ordered column list.  `open` marks schemas that may contain columns the
/// compiler cannot see, such as those read from binary `.sav` files; column
/// checks are skipped for open schemas.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    pub columns: Vec<Column>,
    pub open: bool,
}

impl Schema {
    pub fn open() -> Self {
        Self {
            columns: Vec::new(),
            open: true,
        }
    }

    pub fn contains(&self, name: &Identifier) -> bool {
        self.columns.iter().any(|column| &column.name == name)
    }

    pub fn get(&self, name: &Identifier) -> Option<&Column> {
        self.columns.iter().find(|column| &column.name == name)
    }

    /// Adds a column, or replaces the type of an existing one.
    pub fn put(&mut self, name: Identifier, var_type: VarType) {
        match self.columns.iter_mut().find(|column| column.name == name) {
            Some(column) => column.var_type = var_type,
            None => self.columns.push(Column { name, var_type }),
        }
    }

    /// Schema union, as produced by a join: columns of `self`, then columns
    /// only in `other`.
    pub fn union(&self, other: &Schema) -> Schema {
        let mut union = self.clone();
        for column in &other.columns {
            if !union.contains(&column.name) {
                union.columns.push(column.clone());
            }
        }
        union.open |= other.open;
        union
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "[{}]",
            self.columns
                .iter()
                .format_with(", ", |column, f| f(&format_args!(
                    "{}: {}",
                    column.name, column.var_type
                )))
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: Identifier,
    pub var_type: VarType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VarType {
    Numeric,

    /// Character data, with a declared width where one was given (`A10`).
    String { width: Option<u32> },
}

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Numeric => write!(f, "numeric"),
            Self::String { width: Some(width) } => write!(f, "string({width})"),
            Self::String { width: None } => write!(f, "string"),
        }
    }
}

/// A stable operation identifier, rendered as `op_0001`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl Display for OpId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "op_{:04}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Operation {
    pub id: OpId,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub kind: OperationKind,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OperationKind {
    LoadCsv {
        /// `None` for inline data declared without a file.
        filename: Option<String>,
        skip_rows: u32,
        schema: Schema,
    },
    LoadSav {
        filename: String,
    },
    SaveCsv {
        filename: String,
    },
    SaveSav {
        filename: String,
    },
    /// One or more ordered column assignments; later assignments may read
    /// earlier targets.
    Compute {
        assignments: Vec<Assignment>,
    },
    Recode {
        maps: Vec<ColumnRecode>,
    },
    SelectIf {
        predicate: Expression,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    MissingValues {
        rules: Vec<MissingRule>,
    },
    Lag {
        source: Identifier,
        target: Identifier,
        offset: u32,
    },
    Aggregate {
        break_keys: Vec<Identifier>,
        reductions: Vec<Reduction>,
    },
    MatchFiles {
        by_keys: Vec<Identifier>,
        join: JoinKind,
    },
    /// Width declarations for string columns.  Schema-only; no code is
    /// emitted for it.
    StringDecl {
        decls: Vec<StringWidth>,
    },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadCsv { .. } => "LOAD_CSV",
            Self::LoadSav { .. } => "LOAD_SAV",
            Self::SaveCsv { .. } => "SAVE_CSV",
            Self::SaveSav { .. } => "SAVE_SAV",
            Self::Compute { .. } => "COMPUTE",
            Self::Recode { .. } => "RECODE",
            Self::SelectIf { .. } => "SELECT_IF",
            Self::Sort { .. } => "SORT",
            Self::MissingValues { .. } => "MISSING_VALUES",
            Self::Lag { .. } => "LAG",
            Self::Aggregate { .. } => "AGGREGATE",
            Self::MatchFiles { .. } => "MATCH_FILES",
            Self::StringDecl { .. } => "STRING_DECL",
        }
    }

    /// Kind-specific parameters for the topology dump, in declaration order.
    fn params(&self) -> Vec<(&'static str, String)> {
        fn quoted(s: &str) -> String {
            format!("{s:?}")
        }
        match self {
            Self::LoadCsv {
                filename,
                skip_rows,
                schema,
            } => vec![
                (
                    "filename",
                    match filename {
                        Some(filename) => quoted(filename),
                        None => String::from("none"),
                    },
                ),
                ("skip_rows", skip_rows.to_string()),
                ("schema", schema.to_string()),
            ],
            Self::LoadSav { filename } => vec![("filename", quoted(filename))],
            Self::SaveCsv { filename } | Self::SaveSav { filename } => {
                vec![("filename", quoted(filename))]
            }
            Self::Compute { assignments } => vec![(
                "assignments",
                format!(
                    "[{}]",
                    assignments
                        .iter()
                        .format_with("; ", |a, f| f(&format_args!(
                            "{} = {}",
                            a.target, a.expression
                        )))
                ),
            )],
            Self::Recode { maps } => vec![(
                "maps",
                format!(
                    "[{}]",
                    maps.iter().format_with("; ", |map, f| f(&format_args!(
                        "{} -> {}: {}",
                        map.source,
                        map.target,
                        map.rules.iter().format(" ")
                    )))
                ),
            )],
            Self::SelectIf { predicate } => vec![("predicate", predicate.to_string())],
            Self::Sort { keys } => vec![("keys", format!("[{}]", keys.iter().format(", ")))],
            Self::MissingValues { rules } => vec![(
                "rules",
                format!(
                    "[{}]",
                    rules.iter().format_with("; ", |rule, f| f(&format_args!(
                        "{} ({})",
                        rule.column,
                        rule.sentinels.iter().format(", ")
                    )))
                ),
            )],
            Self::Lag {
                source,
                target,
                offset,
            } => vec![
                ("source", source.to_string()),
                ("target", target.to_string()),
                ("offset", offset.to_string()),
            ],
            Self::Aggregate {
                break_keys,
                reductions,
            } => vec![
                ("break_keys", format!("[{}]", break_keys.iter().format(", "))),
                (
                    "reductions",
                    format!(
                        "[{}]",
                        reductions.iter().format_with("; ", |r, f| match &r.source {
                            Some(source) =>
                                f(&format_args!("{} = {}({})", r.target, r.function, source)),
                            None => f(&format_args!("{} = {}", r.target, r.function)),
                        })
                    ),
                ),
            ],
            Self::MatchFiles { by_keys, join } => vec![
                ("by_keys", format!("[{}]", by_keys.iter().format(", "))),
                ("join_kind", join.to_string()),
            ],
            Self::StringDecl { decls } => vec![(
                "decls",
                format!(
                    "[{}]",
                    decls.iter().format_with(", ", |decl, f| f(&format_args!(
                        "{} (A{})",
                        decl.column, decl.width
                    )))
                ),
            )],
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "Operation: {}", self.id)?;
        writeln!(f, "  Type:    {}", self.kind.name())?;
        writeln!(f, "  Inputs:  [{}]", self.inputs.iter().format(", "))?;
        writeln!(f, "  Outputs: [{}]", self.outputs.iter().format(", "))?;
        writeln!(
            f,
            "  Params:  {{{}}}",
            self.kind
                .params()
                .into_iter()
                .format_with(", ", |(key, value), f| f(&format_args!("{key}: {value}")))
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub target: Identifier,
    pub expression: Expression,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnRecode {
    pub source: Identifier,
    pub target: Identifier,
    pub rules: Vec<RecodeRule>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecodeRule {
    pub patterns: Vec<RecodePattern>,
    pub value: RecodeValue,
}

impl Display for RecodeRule {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "({} = {})",
            self.patterns.iter().format(", "),
            self.value
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecodePattern {
    Value(Expression),
    Range { low: Expression, high: Expression },
    Else,
}

impl Display for RecodePattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Range { low, high } => write!(f, "{low} THRU {high}"),
            Self::Else => write!(f, "ELSE"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RecodeValue {
    Number(f64),
    String(String),
    Sysmis,
}

impl Display for RecodeValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Sysmis => write!(f, "SYSMIS"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub column: Identifier,
    pub direction: SortDirection,
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.direction {
            SortDirection::Ascending => write!(f, "{} (A)", self.column),
            SortDirection::Descending => write!(f, "{} (D)", self.column),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MissingRule {
    pub column: Identifier,
    pub sentinels: Vec<Sentinel>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Sentinel {
    Number(f64),
    String(String),
}

impl Display for Sentinel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reduction {
    pub target: Identifier,
    pub function: Identifier,
    pub source: Option<Identifier>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum JoinKind {
    #[default]
    Left,
    Inner,
    Full,
}

impl Display for JoinKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Left => write!(f, "left"),
            Self::Inner => write!(f, "inner"),
            Self::Full => write!(f, "full"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StringWidth {
    pub column: Identifier,
    pub width: u32,
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::{Dataset, OpId, Operation, OperationKind, Pipeline, Schema, SortDirection, SortKey};
    use crate::identifier::Identifier;

    #[test]
    fn topology_dump_format() {
        let pipeline = Pipeline {
            metadata: IndexMap::new(),
            datasets: vec![Dataset {
                name: String::from("data_1"),
                schema: Schema::open(),
            }],
            operations: vec![
                Operation {
                    id: OpId(1),
                    inputs: vec![],
                    outputs: vec![String::from("data_1")],
                    kind: OperationKind::LoadSav {
                        filename: String::from("in.sav"),
                    },
                },
                Operation {
                    id: OpId(2),
                    inputs: vec![String::from("data_1")],
                    outputs: vec![String::from("data_2")],
                    kind: OperationKind::Sort {
                        keys: vec![SortKey {
                            column: Identifier::new("id").unwrap(),
                            direction: SortDirection::Descending,
                        }],
                    },
                },
            ],
        };
        let dump = pipeline.dump();
        assert!(dump.contains("Operation: op_0001"));
        assert!(dump.contains("  Type:    LOAD_SAV"));
        assert!(dump.contains("  Inputs:  []"));
        assert!(dump.contains("  Outputs: [data_1]"));
        assert!(dump.contains("  Params:  {filename: \"in.sav\"}"));
        assert!(dump.contains("Operation: op_0002"));
        assert!(dump.contains("  Params:  {keys: [id (D)]}"));
    }
}
