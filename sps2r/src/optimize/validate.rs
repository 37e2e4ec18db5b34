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

//! The validator pass, the final gate before code generation.
//!
//! Checks the structural invariants: operation ids are unique, every input
//! dataset is produced by an earlier operation, dataset names are written
//! exactly once, and every referenced column exists in the input schema.
//! Column checks are skipped for open schemas (data read from `.sav` files,
//! whose columns the compiler cannot see).  Block constructs cannot occur
//! here at all: the IR has no conditional-block kind, so lowering has
//! discharged that invariant by construction.
//!
//! The match below is exhaustive over operation kinds; adding a kind makes
//! extending validation a compile-time obligation.

use std::collections::HashSet;

use thiserror::Error as ThisError;

use crate::{
    expr::Expression,
    identifier::Identifier,
    ir::{OpId, Operation, OperationKind, Pipeline, Schema},
};

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum ValidationError {
    #[error("Operation {op} reuses id of an earlier operation.")]
    DuplicateOpId { op: OpId },

    #[error("Operation {op} consumes dataset `{dataset}`, which no earlier operation produces.")]
    UnresolvedDataset { op: OpId, dataset: String },

    #[error("Operation {op} rewrites dataset `{dataset}`, which was already written.")]
    DatasetRewritten { op: OpId, dataset: String },

    #[error("Operation {op} produces dataset `{dataset}` with no schema in the registry.")]
    UnregisteredDataset { op: OpId, dataset: String },

    #[error("Operation {op} references column `{column}`, which does not exist in dataset `{dataset}`.")]
    UnknownColumn {
        op: OpId,
        column: Identifier,
        dataset: String,
    },
}

pub fn run(pipeline: &Pipeline) -> Result<(), ValidationError> {
    let mut ids = HashSet::new();
    let mut produced = HashSet::new();

    for op in &pipeline.operations {
        if !ids.insert(op.id) {
            return Err(ValidationError::DuplicateOpId { op: op.id });
        }
        for input in &op.inputs {
            if !produced.contains(input.as_str()) {
                return Err(ValidationError::UnresolvedDataset {
                    op: op.id,
                    dataset: input.clone(),
                });
            }
        }
        for output in &op.outputs {
            if !produced.insert(output.clone()) {
                return Err(ValidationError::DatasetRewritten {
                    op: op.id,
                    dataset: output.clone(),
                });
            }
            if pipeline.dataset(output).is_none() {
                return Err(ValidationError::UnregisteredDataset {
                    op: op.id,
                    dataset: output.clone(),
                });
            }
        }
        check_columns(pipeline, op)?;
    }
    Ok(())
}

fn input_schema<'a>(
    pipeline: &'a Pipeline,
    op: &'a Operation,
    index: usize,
) -> Option<(&'a str, &'a Schema)> {
    let name = op.inputs.get(index)?;
    pipeline
        .dataset(name)
        .map(|dataset| (name.as_str(), &dataset.schema))
}

fn check(
    op: OpId,
    schema: Option<(&str, &Schema)>,
    column: &Identifier,
    extra: &[Identifier],
) -> Result<(), ValidationError> {
    let Some((dataset, schema)) = schema else {
        return Ok(());
    };
    if schema.open || schema.contains(column) || extra.contains(column) {
        Ok(())
    } else {
        Err(ValidationError::UnknownColumn {
            op,
            column: column.clone(),
            dataset: String::from(dataset),
        })
    }
}

fn check_expression(
    pipeline: &Pipeline,
    op: &Operation,
    expression: &Expression,
    extra: &[Identifier],
) -> Result<(), ValidationError> {
    let mut error = None;
    expression.visit_columns(&mut |column| {
        if error.is_none()
            && let Err(e) = check(op.id, input_schema(pipeline, op, 0), column, extra)
        {
            error = Some(e);
        }
    });
    match error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

fn check_columns(pipeline: &Pipeline, op: &Operation) -> Result<(), ValidationError> {
    match &op.kind {
        OperationKind::LoadCsv { .. } | OperationKind::LoadSav { .. } => Ok(()),
        OperationKind::SaveCsv { .. } | OperationKind::SaveSav { .. } => Ok(()),
        OperationKind::Compute { assignments } => {
            let mut assigned: Vec<Identifier> = Vec::new();
            for assignment in assignments {
                check_expression(pipeline, op, &assignment.expression, &assigned)?;
                assigned.push(assignment.target.clone());
            }
            Ok(())
        }
        OperationKind::Recode { maps } => {
            let mut assigned: Vec<Identifier> = Vec::new();
            for map in maps {
                check(op.id, input_schema(pipeline, op, 0), &map.source, &assigned)?;
                assigned.push(map.target.clone());
            }
            Ok(())
        }
        OperationKind::SelectIf { predicate } => check_expression(pipeline, op, predicate, &[]),
        OperationKind::Sort { keys } => {
            for key in keys {
                check(op.id, input_schema(pipeline, op, 0), &key.column, &[])?;
            }
            Ok(())
        }
        OperationKind::MissingValues { rules } => {
            for rule in rules {
                check(op.id, input_schema(pipeline, op, 0), &rule.column, &[])?;
            }
            Ok(())
        }
        OperationKind::Lag { source, .. } => {
            check(op.id, input_schema(pipeline, op, 0), source, &[])
        }
        OperationKind::Aggregate {
            break_keys,
            reductions,
        } => {
            for key in break_keys {
                check(op.id, input_schema(pipeline, op, 0), key, &[])?;
            }
            for reduction in reductions {
                if let Some(source) = &reduction.source {
                    check(op.id, input_schema(pipeline, op, 0), source, &[])?;
                }
            }
            Ok(())
        }
        OperationKind::MatchFiles { by_keys, .. } => {
            for index in 0..op.inputs.len() {
                for key in by_keys {
                    check(op.id, input_schema(pipeline, op, index), key, &[])?;
                }
            }
            Ok(())
        }
        OperationKind::StringDecl { .. } => Ok(()),
    }
}
