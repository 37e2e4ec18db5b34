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

//! The vertical collapser pass.
//!
//! Fuses adjacent operations of compatible kinds on the same dataset chain:
//!
//! - `COMPUTE` then `COMPUTE` becomes one operation carrying both assignment
//!   lists in order, provided the second operation's targets are not read by
//!   the first one's expressions.  (The second may read the first's targets;
//!   a single `mutate()` evaluates its arguments in order.)
//! - `RECODE` then `RECODE` fuses the same way.
//! - `SELECT_IF` then `SELECT_IF` conjoins the predicates with AND.
//! - `SORT` then a `SORT` that refines it keeps only the refinement.
//!
//! `SAVE` fuses with nothing.  Fusion preserves source order of assignments
//! and regenerates operation ids.

use crate::{
    expr::{BinaryOp, Expression},
    ir::{OpId, Operation, OperationKind, Pipeline},
};

use super::chained;

pub fn run(pipeline: Pipeline) -> Pipeline {
    let mut next_id = pipeline.next_op_id();
    let Pipeline {
        metadata,
        mut datasets,
        operations,
    } = pipeline;

    let mut removed: Vec<String> = Vec::new();
    let mut collapsed: Vec<Operation> = Vec::new();

    for op in operations {
        let fused = match collapsed.last() {
            Some(last) if chained(last, &op) => try_fuse(&last.kind, &op.kind),
            _ => None,
        };
        match fused {
            Some(kind) => {
                let last = collapsed.pop().unwrap();
                removed.push(last.outputs[0].clone());
                collapsed.push(Operation {
                    id: OpId(next_id),
                    inputs: last.inputs,
                    outputs: op.outputs,
                    kind,
                });
                next_id += 1;
            }
            None => collapsed.push(op),
        }
    }

    datasets.retain(|dataset| !removed.contains(&dataset.name));
    Pipeline {
        metadata,
        datasets,
        operations: collapsed,
    }
}

fn try_fuse(a: &OperationKind, b: &OperationKind) -> Option<OperationKind> {
    match (a, b) {
        (
            OperationKind::Compute {
                assignments: a_assignments,
            },
            OperationKind::Compute {
                assignments: b_assignments,
            },
        ) => {
            // Unsafe to fuse if the first operation reads a column the second
            // overwrites: the read would start seeing the new value.
            let overwrites_read = b_assignments.iter().any(|b_assignment| {
                a_assignments
                    .iter()
                    .any(|a_assignment| a_assignment.expression.reads_column(&b_assignment.target))
            });
            if overwrites_read {
                return None;
            }
            let mut assignments = a_assignments.clone();
            assignments.extend(b_assignments.iter().cloned());
            Some(OperationKind::Compute { assignments })
        }
        (OperationKind::Recode { maps: a_maps }, OperationKind::Recode { maps: b_maps }) => {
            let overwrites_read = b_maps.iter().any(|b_map| {
                a_maps.iter().any(|a_map| a_map.source == b_map.target)
            });
            if overwrites_read {
                return None;
            }
            let mut maps = a_maps.clone();
            maps.extend(b_maps.iter().cloned());
            Some(OperationKind::Recode { maps })
        }
        (
            OperationKind::SelectIf { predicate: first },
            OperationKind::SelectIf { predicate: second },
        ) => Some(OperationKind::SelectIf {
            predicate: Expression::binary(BinaryOp::And, first.clone(), second.clone()),
        }),
        (OperationKind::Sort { keys: a_keys }, OperationKind::Sort { keys: b_keys }) => {
            if b_keys.len() >= a_keys.len() && b_keys[..a_keys.len()] == a_keys[..] {
                Some(OperationKind::Sort {
                    keys: b_keys.clone(),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::run;
    use crate::{
        command::parse,
        expr::{BinaryOp, Expression},
        ir::{OperationKind, Pipeline, builder::GraphBuilder},
        message::SourceFile,
    };

    fn collapse(source: &str) -> Pipeline {
        let file = SourceFile::for_string(String::from(source));
        let commands = parse(&file).unwrap();
        run(GraphBuilder::new(IndexMap::new()).build(commands).unwrap())
    }

    #[test]
    fn consecutive_computes_fuse_in_order() {
        let pipeline = collapse(
            "DATA LIST FREE / a.\n\
             COMPUTE x = a + 1.\n\
             COMPUTE y = x * 2.\n",
        );
        assert_eq!(pipeline.operations.len(), 2);
        let OperationKind::Compute { assignments } = &pipeline.operations[1].kind else {
            panic!("expected fused COMPUTE");
        };
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].target.as_str(), "x");
        assert_eq!(assignments[1].target.as_str(), "y");
        // The fused operation spans the whole chain.
        assert_eq!(
            pipeline.operations[1].inputs,
            pipeline.operations[0].outputs
        );
    }

    #[test]
    fn fused_ids_are_regenerated() {
        let pipeline = collapse(
            "DATA LIST FREE / a.\n\
             COMPUTE x = 1.\n\
             COMPUTE y = 2.\n",
        );
        let ids: Vec<_> = pipeline.operations.iter().map(|op| op.id).collect();
        let mut unique = ids.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), ids.len());
        assert!(pipeline.operations[1].id.0 > 3);
    }

    #[test]
    fn compute_overwriting_read_column_does_not_fuse() {
        let pipeline = collapse(
            "DATA LIST FREE / y.\n\
             COMPUTE x = y + 1.\n\
             COMPUTE y = 2.\n",
        );
        assert_eq!(pipeline.operations.len(), 3);
    }

    #[test]
    fn select_if_predicates_conjoin() {
        let pipeline = collapse(
            "DATA LIST FREE / age income.\n\
             SELECT IF age >= 18.\n\
             SELECT IF income > 0.\n",
        );
        assert_eq!(pipeline.operations.len(), 2);
        let OperationKind::SelectIf { predicate } = &pipeline.operations[1].kind else {
            panic!("expected fused SELECT_IF");
        };
        assert!(matches!(predicate, Expression::BinaryOp(BinaryOp::And, ..)));
    }

    #[test]
    fn refining_sort_keeps_only_the_last() {
        let pipeline = collapse(
            "DATA LIST FREE / a b.\n\
             SORT CASES BY a.\n\
             SORT CASES BY a b.\n",
        );
        assert_eq!(pipeline.operations.len(), 2);
        let OperationKind::Sort { keys } = &pipeline.operations[1].kind else {
            panic!();
        };
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn unrelated_sorts_both_remain() {
        let pipeline = collapse(
            "DATA LIST FREE / a b.\n\
             SORT CASES BY a.\n\
             SORT CASES BY b.\n",
        );
        assert_eq!(pipeline.operations.len(), 3);
    }

    #[test]
    fn interleaved_filter_blocks_compute_fusion() {
        let pipeline = collapse(
            "DATA LIST FREE / a.\n\
             COMPUTE x = a + 1.\n\
             SELECT IF x > 0.\n\
             COMPUTE y = x * 2.\n",
        );
        assert_eq!(pipeline.operations.len(), 4);
    }

    #[test]
    fn vanished_datasets_leave_the_registry() {
        let pipeline = collapse(
            "DATA LIST FREE / a.\n\
             COMPUTE x = 1.\n\
             COMPUTE y = 2.\n",
        );
        assert_eq!(pipeline.datasets.len(), 2);
        for op in &pipeline.operations {
            for name in op.inputs.iter().chain(&op.outputs) {
                assert!(pipeline.dataset(name).is_some(), "dangling dataset {name}");
            }
        }
    }
}
