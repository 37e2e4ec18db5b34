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

//! Lowering the command AST into the IR.
//!
//! The builder threads an "active dataset" through the command sequence, the
//! way the source language's own data pass does.  Every transform consumes
//! the active dataset and produces a freshly named one, so dataset names are
//! single-assignment and the operation list is topologically ordered by
//! construction.
//!
//! `DO IF` blocks do not survive lowering: the enclosed `COMPUTE`s are fused
//! into one operation whose assignments are conditional expressions.

use thiserror::Error as ThisError;

use crate::{
    command::{Command, DoIfBlock, MatchSource, ParsedCommand},
    expr::Expression,
    identifier::Identifier,
    message::Location,
};

use super::{
    Assignment, ColumnRecode, Dataset, JoinKind, Metadata, OpId, Operation, OperationKind,
    Pipeline, RecodeValue, Schema, VarType,
};

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum LoweringError {
    #[error("{location}: {command} requires an active dataset; load one with GET or DATA LIST first.")]
    NoActiveDataset {
        command: &'static str,
        location: Location,
    },

    #[error("{location}: Only COMPUTE and nested DO IF may appear inside DO IF.")]
    UnsupportedInBlock { location: Location },
}

pub struct GraphBuilder {
    metadata: Metadata,
    datasets: Vec<Dataset>,
    operations: Vec<Operation>,
    active: Option<String>,
    next_op: u32,
    next_dataset: u32,
}

impl GraphBuilder {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            datasets: Vec::new(),
            operations: Vec::new(),
            active: None,
            next_op: 1,
            next_dataset: 1,
        }
    }

    pub fn build(mut self, commands: Vec<ParsedCommand>) -> Result<Pipeline, LoweringError> {
        for command in commands {
            self.lower_command(command)?;
        }
        Ok(Pipeline {
            metadata: self.metadata,
            datasets: self.datasets,
            operations: self.operations,
        })
    }

    fn fresh_op_id(&mut self) -> OpId {
        let id = OpId(self.next_op);
        self.next_op += 1;
        id
    }

    fn fresh_dataset(&mut self, schema: Schema) -> String {
        let name = format!("data_{}", self.next_dataset);
        self.next_dataset += 1;
        self.datasets.push(Dataset {
            name: name.clone(),
            schema,
        });
        name
    }

    fn active_or_err(
        &self,
        command: &'static str,
        location: &Location,
    ) -> Result<String, LoweringError> {
        self.active.clone().ok_or_else(|| LoweringError::NoActiveDataset {
            command,
            location: location.clone(),
        })
    }

    fn active_schema(&self) -> Schema {
        self.active
            .as_deref()
            .and_then(|name| self.datasets.iter().find(|d| d.name == name))
            .map(|dataset| dataset.schema.clone())
            .unwrap_or_default()
    }

    /// Appends a load operation producing a new dataset with `schema`, and
    /// makes it active.
    fn push_load(&mut self, kind: OperationKind, schema: Schema) -> String {
        let id = self.fresh_op_id();
        let output = self.fresh_dataset(schema);
        self.operations.push(Operation {
            id,
            inputs: Vec::new(),
            outputs: vec![output.clone()],
            kind,
        });
        self.active = Some(output.clone());
        output
    }

    /// Appends a transform consuming the active dataset and producing a new
    /// one with `schema`, which becomes active.
    fn push_transform(&mut self, input: String, kind: OperationKind, schema: Schema) {
        let id = self.fresh_op_id();
        let output = self.fresh_dataset(schema);
        self.operations.push(Operation {
            id,
            inputs: vec![input],
            outputs: vec![output.clone()],
            kind,
        });
        self.active = Some(output);
    }

    fn lower_command(&mut self, command: ParsedCommand) -> Result<(), LoweringError> {
        let ParsedCommand { command, location } = command;
        match command {
            Command::GetData(get_data) => {
                let schema = get_data.schema.clone();
                self.push_load(
                    OperationKind::LoadCsv {
                        filename: Some(get_data.filename),
                        skip_rows: get_data.skip_rows,
                        schema: get_data.schema,
                    },
                    schema,
                );
            }
            Command::DataList(data_list) => {
                let schema = data_list.schema.clone();
                self.push_load(
                    OperationKind::LoadCsv {
                        filename: data_list.filename,
                        skip_rows: 0,
                        schema: data_list.schema,
                    },
                    schema,
                );
            }
            Command::GetFile(get_file) => {
                self.push_load(
                    OperationKind::LoadSav {
                        filename: get_file.filename,
                    },
                    Schema::open(),
                );
            }
            Command::Save(save) => {
                let input = self.active_or_err("SAVE", &location)?;
                let kind = if save.filename.to_ascii_lowercase().ends_with(".csv") {
                    OperationKind::SaveCsv {
                        filename: save.filename,
                    }
                } else {
                    OperationKind::SaveSav {
                        filename: save.filename,
                    }
                };
                let id = self.fresh_op_id();
                self.operations.push(Operation {
                    id,
                    inputs: vec![input],
                    outputs: Vec::new(),
                    kind,
                });
            }
            Command::Compute(compute) => {
                let input = self.active_or_err("COMPUTE", &location)?;
                let mut schema = self.active_schema();
                if let Some((source, offset)) = as_lag_call(&compute.expression) {
                    let var_type = schema
                        .get(&source)
                        .map(|column| column.var_type.clone())
                        .unwrap_or(VarType::Numeric);
                    schema.put(compute.target.clone(), var_type);
                    self.push_transform(
                        input,
                        OperationKind::Lag {
                            source,
                            target: compute.target,
                            offset,
                        },
                        schema,
                    );
                } else {
                    schema.put(
                        compute.target.clone(),
                        infer_type(&compute.expression, &schema),
                    );
                    self.push_transform(
                        input,
                        OperationKind::Compute {
                            assignments: vec![Assignment {
                                target: compute.target,
                                expression: compute.expression,
                            }],
                        },
                        schema,
                    );
                }
            }
            Command::Recode(recode) => {
                let input = self.active_or_err("RECODE", &location)?;
                let mut schema = self.active_schema();
                let target = recode.target.unwrap_or_else(|| recode.source.clone());
                let var_type = if recode
                    .rules
                    .iter()
                    .any(|rule| matches!(rule.value, RecodeValue::String(_)))
                {
                    VarType::String { width: None }
                } else {
                    VarType::Numeric
                };
                schema.put(target.clone(), var_type);
                self.push_transform(
                    input,
                    OperationKind::Recode {
                        maps: vec![ColumnRecode {
                            source: recode.source,
                            target,
                            rules: recode.rules,
                        }],
                    },
                    schema,
                );
            }
            Command::SelectIf(select_if) => {
                let input = self.active_or_err("SELECT IF", &location)?;
                let schema = self.active_schema();
                self.push_transform(
                    input,
                    OperationKind::SelectIf {
                        predicate: select_if.predicate,
                    },
                    schema,
                );
            }
            Command::SortCases(sort) => {
                let input = self.active_or_err("SORT CASES", &location)?;
                let schema = self.active_schema();
                self.push_transform(input, OperationKind::Sort { keys: sort.keys }, schema);
            }
            Command::MissingValues(missing) => {
                let input = self.active_or_err("MISSING VALUES", &location)?;
                let schema = self.active_schema();
                self.push_transform(
                    input,
                    OperationKind::MissingValues {
                        rules: missing.rules,
                    },
                    schema,
                );
            }
            Command::StringDecl(decl) => {
                let input = self.active_or_err("STRING", &location)?;
                // Schema-only: widen the active dataset in place rather than
                // producing a new dataset, since no code is emitted for it.
                if let Some(dataset) = self.datasets.iter_mut().find(|d| d.name == input) {
                    for string_width in &decl.decls {
                        dataset.schema.put(
                            string_width.column.clone(),
                            VarType::String {
                                width: Some(string_width.width),
                            },
                        );
                    }
                }
                let id = self.fresh_op_id();
                self.operations.push(Operation {
                    id,
                    inputs: vec![input],
                    outputs: Vec::new(),
                    kind: OperationKind::StringDecl { decls: decl.decls },
                });
            }
            Command::Aggregate(aggregate) => {
                let input = self.active_or_err("AGGREGATE", &location)?;
                let input_schema = self.active_schema();
                let mut schema = Schema::default();
                for key in &aggregate.break_keys {
                    let var_type = input_schema
                        .get(key)
                        .map(|column| column.var_type.clone())
                        .unwrap_or(VarType::Numeric);
                    schema.put(key.clone(), var_type);
                }
                for reduction in &aggregate.reductions {
                    let var_type = match &reduction.source {
                        Some(source)
                            if ["FIRST", "LAST", "MIN", "MAX"]
                                .iter()
                                .any(|f| reduction.function.matches_keyword(f)) =>
                        {
                            input_schema
                                .get(source)
                                .map(|column| column.var_type.clone())
                                .unwrap_or(VarType::Numeric)
                        }
                        _ => VarType::Numeric,
                    };
                    schema.put(reduction.target.clone(), var_type);
                }
                self.push_transform(
                    input,
                    OperationKind::Aggregate {
                        break_keys: aggregate.break_keys,
                        reductions: aggregate.reductions,
                    },
                    schema,
                );
            }
            Command::MatchFiles(match_files) => {
                let mut inputs = Vec::new();
                let mut schema = Schema::default();
                for source in match_files.sources {
                    let name = match source {
                        MatchSource::Active => self.active_or_err("MATCH FILES", &location)?,
                        MatchSource::File(filename) => {
                            let id = self.fresh_op_id();
                            let output = self.fresh_dataset(Schema::open());
                            self.operations.push(Operation {
                                id,
                                inputs: Vec::new(),
                                outputs: vec![output.clone()],
                                kind: OperationKind::LoadSav { filename },
                            });
                            output
                        }
                    };
                    let source_schema = self
                        .datasets
                        .iter()
                        .find(|d| d.name == name)
                        .map(|d| d.schema.clone())
                        .unwrap_or_default();
                    schema = schema.union(&source_schema);
                    inputs.push(name);
                }
                let id = self.fresh_op_id();
                let output = self.fresh_dataset(schema);
                self.operations.push(Operation {
                    id,
                    inputs,
                    outputs: vec![output.clone()],
                    kind: OperationKind::MatchFiles {
                        by_keys: match_files.by_keys,
                        join: JoinKind::default(),
                    },
                });
                self.active = Some(output);
            }
            Command::DoIf(block) => {
                let input = self.active_or_err("DO IF", &location)?;
                let mut schema = self.active_schema();
                let mut known = Vec::new();
                let assignments = lower_block(&block, &schema, &mut known)?;
                if assignments.is_empty() {
                    return Ok(());
                }
                for assignment in &assignments {
                    schema.put(
                        assignment.target.clone(),
                        infer_type(&assignment.expression, &schema),
                    );
                }
                self.push_transform(
                    input,
                    OperationKind::Compute { assignments },
                    schema,
                );
            }
            Command::Execute => (),
        }
        Ok(())
    }
}

/// Recognizes a `COMPUTE target = LAG(source [, offset])` expression, which
/// lowers to the dedicated window operation.
fn as_lag_call(expression: &Expression) -> Option<(Identifier, u32)> {
    let Expression::Call(function, args) = expression else {
        return None;
    };
    if !function.matches_keyword("LAG") {
        return None;
    }
    match args.as_slice() {
        [Expression::Variable(source)] => Some((source.clone(), 1)),
        [Expression::Variable(source), Expression::Number(offset)]
            if *offset >= 1.0 && offset.fract() == 0.0 =>
        {
            Some((source.clone(), *offset as u32))
        }
        _ => None,
    }
}

/// The gross type an expression evaluates to, given the input schema.
fn infer_type(expression: &Expression, schema: &Schema) -> VarType {
    match expression {
        Expression::String(_) => VarType::String { width: None },
        Expression::Variable(id) => schema
            .get(id)
            .map(|column| column.var_type.clone())
            .unwrap_or(VarType::Numeric),
        Expression::Call(function, args) => {
            if ["CONCAT", "UPCASE", "LOWCASE", "LTRIM", "RTRIM", "SUBSTR", "STRING"]
                .iter()
                .any(|f| function.matches_keyword(f))
            {
                VarType::String { width: None }
            } else if function.matches_keyword("LAG") {
                args.first()
                    .map(|arg| infer_type(arg, schema))
                    .unwrap_or(VarType::Numeric)
            } else {
                VarType::Numeric
            }
        }
        Expression::Conditional { then, .. } => infer_type(then, schema),
        _ => VarType::Numeric,
    }
}

/// One `DO IF` arm, flattened: its condition (`None` for `ELSE`) and the
/// assignments its body makes, in order.
struct Arm {
    condition: Option<Expression>,
    assignments: Vec<(Identifier, Expression)>,
}

/// Fuses a block into a flat assignment list.  Each target assigned anywhere
/// in the block becomes one conditional expression whose arms follow branch
/// order; rows matching no assigning branch keep the target's previous value,
/// or become missing if the column is new.
fn lower_block(
    block: &DoIfBlock,
    schema: &Schema,
    known: &mut Vec<Identifier>,
) -> Result<Vec<Assignment>, LoweringError> {
    let mut arms = Vec::new();
    for branch in &block.branches {
        let mut assignments: Vec<(Identifier, Expression)> = Vec::new();
        for command in &branch.body {
            match &command.command {
                Command::Compute(compute) => {
                    assignments.push((compute.target.clone(), compute.expression.clone()));
                }
                Command::DoIf(nested) => {
                    let mut nested_known = known.clone();
                    nested_known.extend(assignments.iter().map(|(target, _)| target.clone()));
                    for assignment in lower_block(nested, schema, &mut nested_known)? {
                        assignments.push((assignment.target, assignment.expression));
                    }
                }
                _ => {
                    return Err(LoweringError::UnsupportedInBlock {
                        location: command.location.clone(),
                    });
                }
            }
        }
        arms.push(Arm {
            condition: branch.condition.clone(),
            assignments,
        });
    }

    // Targets in order of first assignment anywhere in the block.
    let mut targets: Vec<Identifier> = Vec::new();
    for arm in &arms {
        for (target, _) in &arm.assignments {
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        }
    }

    let mut result = Vec::new();
    for target in targets {
        let keep = if schema.contains(&target) || schema.open || known.contains(&target) {
            Expression::Variable(target.clone())
        } else {
            Expression::Sysmis
        };

        // Only arms up to the last one that assigns the target matter; after
        // that every row keeps its value.
        let last_assigning = arms
            .iter()
            .rposition(|arm| arm.assignments.iter().any(|(t, _)| t == &target))
            .unwrap();

        let mut expression = match &arms[last_assigning].condition {
            None => value_of(&arms[last_assigning], &target).unwrap_or_else(|| keep.clone()),
            Some(condition) => Expression::Conditional {
                condition: Box::new(condition.clone()),
                then: Box::new(
                    value_of(&arms[last_assigning], &target).unwrap_or_else(|| keep.clone()),
                ),
                otherwise: Box::new(keep.clone()),
            },
        };
        for arm in arms[..last_assigning].iter().rev() {
            let then = value_of(arm, &target).unwrap_or_else(|| keep.clone());
            let condition = arm
                .condition
                .clone()
                .expect("only the final branch may be ELSE");
            expression = Expression::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(expression),
            };
        }

        known.push(target.clone());
        result.push(Assignment { target, expression });
    }
    Ok(result)
}

/// The value an arm assigns to `target`, if any; the last assignment wins.
fn value_of(arm: &Arm, target: &Identifier) -> Option<Expression> {
    arm.assignments
        .iter()
        .rev()
        .find(|(t, _)| t == target)
        .map(|(_, expression)| expression.clone())
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::GraphBuilder;
    use crate::{
        command::parse,
        expr::Expression,
        ir::{OperationKind, Pipeline, SortDirection},
        message::SourceFile,
    };

    fn build(source: &str) -> Pipeline {
        let file = SourceFile::for_string(String::from(source));
        let commands = parse(&file).unwrap();
        GraphBuilder::new(IndexMap::new()).build(commands).unwrap()
    }

    #[test]
    fn active_dataset_threads_through() {
        let pipeline = build(
            "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=id F8.0 score F8.2.\n\
             COMPUTE pass = score >= 50.\n\
             SELECT IF pass = 1.\n\
             SAVE OUTFILE='out.sav'.\n",
        );
        assert_eq!(pipeline.operations.len(), 4);
        for (index, op) in pipeline.operations.iter().enumerate().skip(1) {
            assert_eq!(op.inputs, pipeline.operations[index - 1].outputs);
        }
        assert!(pipeline.operations.last().unwrap().outputs.is_empty());
    }

    #[test]
    fn load_parameter_integrity() {
        let pipeline = build(
            "GET DATA\n  /TYPE=TXT\n  /FILE='test.csv'\n  /FIRSTCASE=2\n  /VARIABLES=id F8.0.\n",
        );
        let OperationKind::LoadCsv {
            filename,
            skip_rows,
            schema,
        } = &pipeline.operations[0].kind
        else {
            panic!("expected LOAD_CSV");
        };
        assert_eq!(filename.as_deref(), Some("test.csv"));
        assert_eq!(*skip_rows, 1);
        assert!(schema.columns.iter().any(|c| c.name.as_str() == "id"));
    }

    #[test]
    fn sort_order_persistence() {
        let pipeline = build("DATA LIST FREE / id.\nSORT CASES BY id (D).\n");
        let OperationKind::Sort { keys } = &pipeline.operations[1].kind else {
            panic!("expected SORT");
        };
        assert_eq!(keys[0].column.as_str(), "id");
        assert_eq!(keys[0].direction, SortDirection::Descending);
    }

    #[test]
    fn lag_call_becomes_lag_operation() {
        let pipeline = build("DATA LIST FREE / val.\nCOMPUTE prev = LAG(val).\n");
        let OperationKind::Lag {
            source,
            target,
            offset,
        } = &pipeline.operations[1].kind
        else {
            panic!("expected LAG, got {:?}", pipeline.operations[1].kind);
        };
        assert_eq!(source.as_str(), "val");
        assert_eq!(target.as_str(), "prev");
        assert_eq!(*offset, 1);
    }

    #[test]
    fn do_if_lowers_to_conditional_compute() {
        let pipeline = build(
            "DATA LIST FREE / age.\n\
             DO IF (age < 18).\nCOMPUTE g = 0.\nELSE.\nCOMPUTE g = 1.\nEND IF.\n",
        );
        assert_eq!(pipeline.operations.len(), 2);
        let OperationKind::Compute { assignments } = &pipeline.operations[1].kind else {
            panic!("DO IF did not lower to COMPUTE");
        };
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].target.as_str(), "g");
        let Expression::Conditional { otherwise, .. } = &assignments[0].expression else {
            panic!("expected conditional expression");
        };
        assert_eq!(**otherwise, Expression::Number(1.0));
    }

    #[test]
    fn do_if_new_column_defaults_to_missing() {
        let pipeline = build(
            "DATA LIST FREE / age.\n\
             DO IF (age < 18).\nCOMPUTE minor = 1.\nEND IF.\n",
        );
        let OperationKind::Compute { assignments } = &pipeline.operations[1].kind else {
            panic!();
        };
        let Expression::Conditional { otherwise, .. } = &assignments[0].expression else {
            panic!();
        };
        assert_eq!(**otherwise, Expression::Sysmis);
    }

    #[test]
    fn match_files_synthesizes_loads() {
        let pipeline = build("MATCH FILES /FILE='a.sav' /FILE='b.sav' /BY id.\n");
        assert_eq!(pipeline.operations.len(), 3);
        assert!(matches!(
            pipeline.operations[0].kind,
            OperationKind::LoadSav { .. }
        ));
        assert!(matches!(
            pipeline.operations[1].kind,
            OperationKind::LoadSav { .. }
        ));
        let match_op = &pipeline.operations[2];
        assert_eq!(match_op.inputs.len(), 2);
        assert_eq!(
            match_op.inputs,
            vec![
                pipeline.operations[0].outputs[0].clone(),
                pipeline.operations[1].outputs[0].clone()
            ]
        );
    }

    #[test]
    fn transform_without_load_fails() {
        let file = SourceFile::for_string(String::from("COMPUTE x = 1.\n"));
        let commands = parse(&file).unwrap();
        let error = GraphBuilder::new(IndexMap::new()).build(commands).unwrap_err();
        assert!(error.to_string().contains("active dataset"));
    }
}
