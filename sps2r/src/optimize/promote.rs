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

//! The promoter pass.
//!
//! Merges operations that are one logical step spread over several commands:
//! consecutive `MISSING_VALUES`, which legacy scripts often declare one
//! column at a time, and consecutive `STRING_DECL` width declarations.
//! Merged operations get fresh ids; the datasets that vanish between them
//! leave the registry.

use crate::ir::{MissingRule, OpId, Operation, OperationKind, Pipeline};

use super::chained;

pub fn run(pipeline: Pipeline) -> Pipeline {
    let mut next_id = pipeline.next_op_id();
    let Pipeline {
        metadata,
        mut datasets,
        operations,
    } = pipeline;

    let mut removed: Vec<String> = Vec::new();
    let mut merged: Vec<Operation> = Vec::new();

    for op in operations {
        let fused = match merged.last() {
            Some(last) => try_merge(last, &op),
            None => None,
        };
        match fused {
            Some(kind) => {
                let last = merged.pop().unwrap();
                if !last.outputs.is_empty() {
                    removed.push(last.outputs[0].clone());
                }
                merged.push(Operation {
                    id: OpId(next_id),
                    inputs: last.inputs,
                    outputs: op.outputs,
                    kind,
                });
                next_id += 1;
            }
            None => merged.push(op),
        }
    }

    datasets.retain(|dataset| !removed.contains(&dataset.name));
    Pipeline {
        metadata,
        datasets,
        operations: merged,
    }
}

fn try_merge(a: &Operation, b: &Operation) -> Option<OperationKind> {
    match (&a.kind, &b.kind) {
        (
            OperationKind::MissingValues { rules: a_rules },
            OperationKind::MissingValues { rules: b_rules },
        ) if chained(a, b) => {
            let mut rules: Vec<MissingRule> = a_rules.clone();
            for rule in b_rules {
                match rules.iter_mut().find(|r| r.column == rule.column) {
                    Some(existing) => {
                        for sentinel in &rule.sentinels {
                            if !existing.sentinels.contains(sentinel) {
                                existing.sentinels.push(sentinel.clone());
                            }
                        }
                    }
                    None => rules.push(rule.clone()),
                }
            }
            Some(OperationKind::MissingValues { rules })
        }
        (
            OperationKind::StringDecl { decls: a_decls },
            OperationKind::StringDecl { decls: b_decls },
        ) if a.inputs == b.inputs => {
            let mut decls = a_decls.clone();
            for decl in b_decls {
                match decls.iter_mut().find(|d| d.column == decl.column) {
                    Some(existing) => existing.width = decl.width,
                    None => decls.push(decl.clone()),
                }
            }
            Some(OperationKind::StringDecl { decls })
        }
        _ => None,
    }
}
