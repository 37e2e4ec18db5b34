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

//! End-to-end tests: whole scripts through parse, lowering, optimization,
//! and code generation.

use indexmap::IndexMap;

use sps2r::{
    Compilation, compile,
    ir::{Metadata, OperationKind, Pipeline},
    message::SourceFile,
};

fn compile_str(source: &str) -> Compilation {
    let mut metadata: Metadata = IndexMap::new();
    metadata.insert(String::from("project"), String::from("e2e"));
    let file = SourceFile::new(String::from(source), Some(String::from("test.sps")));
    compile(&file, metadata).unwrap_or_else(|error| panic!("compilation failed: {error}"))
}

/// Every operation's inputs must be produced by an earlier operation.
fn assert_topological(pipeline: &Pipeline) {
    let mut produced: Vec<&str> = Vec::new();
    for op in &pipeline.operations {
        for input in &op.inputs {
            assert!(
                produced.contains(&input.as_str()),
                "operation {} consumes `{input}` before it is produced",
                op.id
            );
        }
        produced.extend(op.outputs.iter().map(String::as_str));
    }
}

#[track_caller]
fn assert_generates(source: &str, required: &[&str]) {
    let compilation = compile_str(source);
    assert_topological(&compilation.raw);
    assert_topological(&compilation.optimized);
    assert!(
        compilation.optimized.operations.len() <= compilation.raw.operations.len(),
        "optimization grew the pipeline"
    );
    for substring in required {
        assert!(
            compilation.code.contains(substring),
            "generated code lacks {substring:?}:\n{}",
            compilation.code
        );
    }
}

#[test]
fn load_sort_save() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=id F3.\n\
         SORT CASES BY id.\n\
         SAVE OUTFILE='sorted.sav'.\n",
        &["read_csv", "arrange", "write_sav"],
    );
}

#[test]
fn missing_values_then_compute() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=age F3.\n\
         MISSING VALUES age (-9).\n\
         COMPUTE valid_age = age.\n",
        &["na_if", "-9", "mutate"],
    );
}

#[test]
fn compute_and_recode() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=score F3.\n\
         COMPUTE pass = score >= 50.\n\
         RECODE score (0 THRU 49 = 0)(50 THRU 100 = 1) INTO grade.\n",
        &["mutate", "score >= 50", "case_when", "between"],
    );
}

#[test]
fn select_if() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=age F3.\n\
         SELECT IF age >= 18.\n",
        &["filter", "age >= 18"],
    );
}

#[test]
fn sort_then_lag() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=id F3 val F8.2.\n\
         SORT CASES BY id.\n\
         COMPUTE prev = LAG(val).\n",
        &["arrange", "lag(val"],
    );
}

#[test]
fn aggregate() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=grp F3 score F3.\n\
         AGGREGATE /BREAK=grp /mean_score = MEAN(score).\n",
        &["group_by", "summarise", "mean(score"],
    );
}

#[test]
fn match_files() {
    let compilation = compile_str("MATCH FILES /FILE='a.sav' /FILE='b.sav' /BY id.\n");
    assert!(
        compilation.code.contains("left_join") || compilation.code.contains("inner_join"),
        "{}",
        compilation.code
    );
    assert!(compilation.code.contains("by"));
    assert!(compilation.code.contains("id"));
}

#[test]
fn do_if_lowers_to_conditional() {
    let compilation = compile_str(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=age F3.\n\
         DO IF (age < 18).\nCOMPUTE g = 0.\nELSE.\nCOMPUTE g = 1.\nEND IF.\n",
    );
    assert!(compilation.code.contains("mutate"));
    assert!(
        compilation.code.contains("if_else") || compilation.code.contains("case_when"),
        "{}",
        compilation.code
    );
    // No conditional-block construct survives lowering.
    for op in &compilation.optimized.operations {
        assert!(matches!(
            op.kind,
            OperationKind::LoadCsv { .. } | OperationKind::Compute { .. }
        ));
    }
}

#[test]
fn string_decl_and_concat() {
    assert_generates(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=name A10.\n\
         STRING label (A20).\n\
         COMPUTE label = CONCAT(\"ID_\", name).\n",
        &["mutate", "paste", "ID_"],
    );
}

#[test]
fn sav_round_trip() {
    assert_generates(
        "GET FILE='in.sav'.\nSAVE OUTFILE='out.sav'.\n",
        &["read_sav", "write_sav", "haven"],
    );
}

#[test]
fn consecutive_computes_fuse() {
    let compilation = compile_str(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=a F3.\n\
         COMPUTE x = a + 1.\n\
         COMPUTE y = x * 2.\n",
    );
    let computes: Vec<_> = compilation
        .optimized
        .operations
        .iter()
        .filter_map(|op| match &op.kind {
            OperationKind::Compute { assignments } => Some(assignments),
            _ => None,
        })
        .collect();
    assert_eq!(computes.len(), 1, "computes did not fuse");
    assert_eq!(computes[0].len(), 2);
    assert_eq!(computes[0][0].target.as_str(), "x");
    assert_eq!(computes[0][1].target.as_str(), "y");
}

#[test]
fn consecutive_filters_conjoin() {
    let compilation = compile_str(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=age F3 income F8.2.\n\
         SELECT IF age >= 18.\n\
         SELECT IF income > 0.\n",
    );
    let filters: Vec<_> = compilation
        .optimized
        .operations
        .iter()
        .filter(|op| matches!(op.kind, OperationKind::SelectIf { .. }))
        .collect();
    assert_eq!(filters.len(), 1, "filters did not fuse");
    assert!(
        compilation.code.contains("age >= 18 & income > 0"),
        "{}",
        compilation.code
    );
}

#[test]
fn optimize_preserves_metadata_and_is_idempotent() {
    let compilation = compile_str(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=a F3.\n\
         COMPUTE x = a.\n\
         COMPUTE y = x.\n\
         SAVE OUTFILE='out.csv'.\n",
    );
    assert_eq!(compilation.raw.metadata, compilation.optimized.metadata);
    let again = sps2r::optimize::OptimizationCoordinator::new()
        .optimize(compilation.optimized.clone())
        .unwrap();
    assert_eq!(again, compilation.optimized);
}

#[test]
fn generated_code_is_deterministic() {
    let source = "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=id F3 score F3.\n\
                  MISSING VALUES score (-9).\n\
                  COMPUTE pass = score >= 50.\n\
                  SORT CASES BY score (D) id (A).\n\
                  SAVE OUTFILE='out.sav'.\n";
    assert_eq!(compile_str(source).code, compile_str(source).code);
}

#[test]
fn final_dataset_is_saved() {
    let compilation = compile_str(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=a F3.\n\
         COMPUTE x = a.\n\
         SAVE OUTFILE='out.csv'.\n",
    );
    for pipeline in [&compilation.raw, &compilation.optimized] {
        let last_output = pipeline
            .operations
            .iter()
            .rev()
            .find_map(|op| op.outputs.first())
            .unwrap();
        let saved = pipeline.operations.iter().any(|op| {
            matches!(
                op.kind,
                OperationKind::SaveCsv { .. } | OperationKind::SaveSav { .. }
            ) && op.inputs.contains(last_output)
        });
        assert!(saved, "final dataset `{last_output}` is not saved");
    }
}

#[test]
fn parse_errors_carry_spans() {
    let file = SourceFile::new(
        String::from("GET DATA /TYPE=TXT.\nFROBNICATE.\n"),
        Some(String::from("bad.sps")),
    );
    let error = compile(&file, IndexMap::new()).unwrap_err();
    let message = error.to_string();
    assert!(message.contains("bad.sps:1"), "no span in: {message}");
}

#[test]
fn topology_dump_lists_operations() {
    let compilation = compile_str(
        "GET DATA /TYPE=TXT /FILE='data.csv' /VARIABLES=id F3.\n\
         SORT CASES BY id (D).\n",
    );
    let dump = compilation.optimized.dump();
    assert!(dump.contains("Operation: op_0001"));
    assert!(dump.contains("Type:    LOAD_CSV"));
    assert!(dump.contains("Type:    SORT"));
    assert!(dump.contains("skip_rows: 0"));
}
