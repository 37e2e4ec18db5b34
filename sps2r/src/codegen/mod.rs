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

//! Emitting tidyverse R from the optimized IR.
//!
//! One fragment per operation, in pipeline order; each fragment binds its
//! output dataset name.  Emission is a pure function of the IR, so the same
//! pipeline always produces byte-identical text.

use std::fmt::Write;

use itertools::Itertools;
use thiserror::Error as ThisError;

use crate::{
    expr::{BinaryOp, Expression, UnaryOp},
    identifier::Identifier,
    ir::{
        ColumnRecode, MissingRule, OpId, Operation, OperationKind, Pipeline, RecodePattern,
        RecodeValue, Reduction, Sentinel, SortDirection, VarType,
    },
};

#[derive(Clone, Debug, ThisError, PartialEq)]
pub enum CodegenError {
    #[error("Operation {op}: function `{function}` has no R equivalent.")]
    UnknownFunction { op: OpId, function: Identifier },

    #[error("Operation {op}: aggregate function `{function}` has no R equivalent.")]
    UnknownAggregateFunction { op: OpId, function: Identifier },
}

#[derive(Debug, Default)]
pub struct RGenerator;

impl RGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, pipeline: &Pipeline) -> Result<String, CodegenError> {
        let mut out = String::new();
        writeln!(out, "# Generated by sps2r. Do not edit.").unwrap();
        if let Some(project) = pipeline.metadata.get("project") {
            writeln!(out, "# Project: {project}").unwrap();
        }
        writeln!(out, "library(tidyverse)").unwrap();
        let needs_haven = pipeline.operations.iter().any(|op| {
            matches!(
                op.kind,
                OperationKind::LoadSav { .. } | OperationKind::SaveSav { .. }
            )
        });
        if needs_haven {
            writeln!(out, "library(haven)").unwrap();
        }
        writeln!(out).unwrap();

        for op in &pipeline.operations {
            if let Some(fragment) = emit_operation(op)? {
                writeln!(out, "{fragment}").unwrap();
            }
        }
        Ok(out)
    }
}

fn emit_operation(op: &Operation) -> Result<Option<String>, CodegenError> {
    let output = || op.outputs[0].clone();
    let input = || op.inputs[0].clone();

    let fragment = match &op.kind {
        OperationKind::LoadCsv {
            filename,
            skip_rows,
            schema,
        } => match filename {
            Some(filename) => {
                let mut call = format!("read_csv({}", r_string(filename));
                if *skip_rows > 0 {
                    write!(call, ", skip = {skip_rows}").unwrap();
                }
                if !schema.columns.is_empty() {
                    write!(
                        call,
                        ", col_types = cols({})",
                        schema
                            .columns
                            .iter()
                            .format_with(", ", |column, f| f(&format_args!(
                                "{} = {}",
                                r_name(&column.name),
                                col_type(&column.var_type)
                            )))
                    )
                    .unwrap();
                }
                call.push(')');
                format!("{} <- {call}", output())
            }
            None => format!(
                "{} <- tibble({})",
                output(),
                schema
                    .columns
                    .iter()
                    .format_with(", ", |column, f| f(&format_args!(
                        "{} = {}",
                        r_name(&column.name),
                        match column.var_type {
                            VarType::Numeric => "double()",
                            VarType::String { .. } => "character()",
                        }
                    )))
            ),
        },
        OperationKind::LoadSav { filename } => {
            format!("{} <- read_sav({})", output(), r_string(filename))
        }
        OperationKind::SaveCsv { filename } => {
            format!("write_csv({}, {})", input(), r_string(filename))
        }
        OperationKind::SaveSav { filename } => {
            format!("write_sav({}, {})", input(), r_string(filename))
        }
        OperationKind::Compute { assignments } => {
            let mut args = Vec::new();
            for assignment in assignments {
                args.push(format!(
                    "{} = {}",
                    r_name(&assignment.target),
                    render(&assignment.expression, op.id)?
                ));
            }
            format!(
                "{} <- {} %>% mutate({})",
                output(),
                input(),
                args.iter().format(", ")
            )
        }
        OperationKind::Recode { maps } => {
            let mut args = Vec::new();
            for map in maps {
                args.push(format!("{} = {}", r_name(&map.target), render_recode(map, op.id)?));
            }
            format!(
                "{} <- {} %>% mutate({})",
                output(),
                input(),
                args.iter().format(", ")
            )
        }
        OperationKind::SelectIf { predicate } => {
            format!(
                "{} <- {} %>% filter({})",
                output(),
                input(),
                render(predicate, op.id)?
            )
        }
        OperationKind::Sort { keys } => {
            format!(
                "{} <- {} %>% arrange({})",
                output(),
                input(),
                keys.iter().format_with(", ", |key, f| {
                    match key.direction {
                        SortDirection::Ascending => f(&r_name(&key.column)),
                        SortDirection::Descending => {
                            f(&format_args!("desc({})", r_name(&key.column)))
                        }
                    }
                })
            )
        }
        OperationKind::MissingValues { rules } => {
            format!(
                "{} <- {} %>% mutate({})",
                output(),
                input(),
                rules
                    .iter()
                    .format_with(", ", |rule, f| f(&format_args!(
                        "{} = {}",
                        r_name(&rule.column),
                        na_if_chain(rule)
                    )))
            )
        }
        OperationKind::Lag {
            source,
            target,
            offset,
        } => {
            format!(
                "{} <- {} %>% mutate({} = lag({}, n = {offset}))",
                output(),
                input(),
                r_name(target),
                r_name(source)
            )
        }
        OperationKind::Aggregate {
            break_keys,
            reductions,
        } => {
            let mut reduction_args = Vec::new();
            for reduction in reductions {
                reduction_args.push(format!(
                    "{} = {}",
                    r_name(&reduction.target),
                    render_reduction(reduction, op.id)?
                ));
            }
            if break_keys.is_empty() {
                format!(
                    "{} <- {} %>% summarise({})",
                    output(),
                    input(),
                    reduction_args.iter().format(", ")
                )
            } else {
                format!(
                    "{} <- {} %>% group_by({}) %>% summarise({}, .groups = \"drop\")",
                    output(),
                    input(),
                    break_keys.iter().map(r_name).format(", "),
                    reduction_args.iter().format(", ")
                )
            }
        }
        OperationKind::MatchFiles { by_keys, join } => {
            let join_fn = match join {
                crate::ir::JoinKind::Left => "left_join",
                crate::ir::JoinKind::Inner => "inner_join",
                crate::ir::JoinKind::Full => "full_join",
            };
            let by = if by_keys.len() == 1 {
                format!("\"{}\"", by_keys[0])
            } else {
                format!("c({})", by_keys.iter().format_with(", ", |key, f| f(&format_args!("\"{key}\""))))
            };
            let mut fragment = format!("{} <- {}", output(), op.inputs[0]);
            for other in &op.inputs[1..] {
                write!(fragment, " %>% {join_fn}({other}, by = {by})").unwrap();
            }
            fragment
        }
        OperationKind::StringDecl { .. } => return Ok(None),
    };
    Ok(Some(fragment))
}

fn col_type(var_type: &VarType) -> &'static str {
    match var_type {
        VarType::Numeric => "col_double()",
        VarType::String { .. } => "col_character()",
    }
}

fn na_if_chain(rule: &MissingRule) -> String {
    let mut chain = r_name(&rule.column);
    for sentinel in &rule.sentinels {
        let value = match sentinel {
            Sentinel::Number(number) => r_number(*number),
            Sentinel::String(s) => r_string(s),
        };
        chain = format!("na_if({chain}, {value})");
    }
    chain
}

fn render_reduction(reduction: &Reduction, op: OpId) -> Result<String, CodegenError> {
    let function = &reduction.function;
    if function.matches_keyword("N") && reduction.source.is_none() {
        return Ok(String::from("n()"));
    }
    let r_function = if function.matches_keyword("MEAN") {
        "mean"
    } else if function.matches_keyword("SUM") {
        "sum"
    } else if function.matches_keyword("SD") {
        "sd"
    } else if function.matches_keyword("MEDIAN") {
        "median"
    } else if function.matches_keyword("MIN") {
        "min"
    } else if function.matches_keyword("MAX") {
        "max"
    } else if function.matches_keyword("FIRST") {
        "first"
    } else if function.matches_keyword("LAST") {
        "last"
    } else {
        return Err(CodegenError::UnknownAggregateFunction {
            op,
            function: function.clone(),
        });
    };
    match &reduction.source {
        Some(source) => Ok(format!("{r_function}({})", r_name(source))),
        None => Ok(format!("{r_function}()")),
    }
}

fn render_recode(map: &ColumnRecode, op: OpId) -> Result<String, CodegenError> {
    let source = r_name(&map.source);
    let mut arms = Vec::new();
    let mut has_else = false;
    for rule in &map.rules {
        let value = match &rule.value {
            RecodeValue::Number(number) => r_number(*number),
            RecodeValue::String(s) => r_string(s),
            RecodeValue::Sysmis => String::from("NA"),
        };
        if rule.patterns.iter().any(|p| matches!(p, RecodePattern::Else)) {
            arms.push(format!("TRUE ~ {value}"));
            has_else = true;
            continue;
        }
        let all_values: Option<Vec<&Expression>> = rule
            .patterns
            .iter()
            .map(|pattern| match pattern {
                RecodePattern::Value(value) => Some(value),
                _ => None,
            })
            .collect();
        let condition = match all_values {
            Some(values) if values.len() > 1 => format!(
                "{source} %in% c({})",
                values
                    .iter()
                    .map(|value| render(value, op))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(", ")
            ),
            _ => rule
                .patterns
                .iter()
                .map(|pattern| pattern_condition(&source, pattern, op))
                .collect::<Result<Vec<_>, _>>()?
                .join(" | "),
        };
        arms.push(format!("{condition} ~ {value}"));
    }
    if !has_else {
        if map.target == map.source {
            arms.push(format!("TRUE ~ {source}"));
        } else {
            arms.push(String::from("TRUE ~ NA"));
        }
    }
    Ok(format!("case_when({})", arms.iter().format(", ")))
}

fn pattern_condition(
    source: &str,
    pattern: &RecodePattern,
    op: OpId,
) -> Result<String, CodegenError> {
    match pattern {
        RecodePattern::Value(value) => Ok(format!("{source} == {}", render(value, op)?)),
        RecodePattern::Range { low, high } => Ok(format!(
            "between({source}, {}, {})",
            render(low, op)?,
            render(high, op)?
        )),
        RecodePattern::Else => unreachable!("ELSE handled by the caller"),
    }
}

fn r_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn r_number(number: f64) -> String {
    if number == f64::INFINITY {
        String::from("Inf")
    } else if number == f64::NEG_INFINITY {
        String::from("-Inf")
    } else {
        format!("{number}")
    }
}

/// Renders a column name, backtick-quoted if it is not a syntactic R name.
fn r_name(id: &Identifier) -> String {
    let s = id.as_str();
    let mut chars = s.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    if plain {
        String::from(s)
    } else {
        format!("`{s}`")
    }
}

fn binary_op(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Pow => "^",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
        BinaryOp::And => "&",
        BinaryOp::Or => "|",
    }
}

fn precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Or => 1,
        BinaryOp::And => 2,
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            4
        }
        BinaryOp::Add | BinaryOp::Sub => 5,
        BinaryOp::Mul | BinaryOp::Div => 6,
        BinaryOp::Pow => 7,
    }
}

fn expression_precedence(expression: &Expression) -> u8 {
    match expression {
        Expression::BinaryOp(op, ..) => precedence(*op),
        Expression::UnaryOp(UnaryOp::Not, _) => 3,
        Expression::UnaryOp(UnaryOp::Negate, _) => 8,
        _ => 9,
    }
}

fn render_at(expression: &Expression, op: OpId, min: u8) -> Result<String, CodegenError> {
    let rendered = render(expression, op)?;
    if expression_precedence(expression) < min {
        Ok(format!("({rendered})"))
    } else {
        Ok(rendered)
    }
}

/// Renders an expression as R source.
fn render(expression: &Expression, op: OpId) -> Result<String, CodegenError> {
    match expression {
        Expression::Number(number) => Ok(r_number(*number)),
        Expression::String(s) => Ok(r_string(s)),
        Expression::Sysmis => Ok(String::from("NA")),
        Expression::Variable(id) => Ok(r_name(id)),
        Expression::UnaryOp(UnaryOp::Negate, operand) => {
            Ok(format!("-{}", render_at(operand, op, 8)?))
        }
        Expression::UnaryOp(UnaryOp::Not, operand) => {
            Ok(format!("!{}", render_at(operand, op, 9)?))
        }
        Expression::BinaryOp(binop, left, right) => {
            let p = precedence(*binop);
            Ok(format!(
                "{} {} {}",
                render_at(left, op, p)?,
                binary_op(*binop),
                render_at(right, op, p + 1)?
            ))
        }
        Expression::Call(function, args) => render_call(function, args, op),
        Expression::Conditional {
            condition,
            then,
            otherwise,
        } => {
            if matches!(**otherwise, Expression::Conditional { .. }) {
                // Multi-arm chain: flatten into one case_when.
                let mut arms = Vec::new();
                let mut current = expression;
                while let Expression::Conditional {
                    condition,
                    then,
                    otherwise,
                } = current
                {
                    arms.push(format!("{} ~ {}", render(condition, op)?, render(then, op)?));
                    current = &**otherwise;
                }
                arms.push(format!("TRUE ~ {}", render(current, op)?));
                Ok(format!("case_when({})", arms.iter().format(", ")))
            } else {
                Ok(format!(
                    "if_else({}, {}, {})",
                    render(condition, op)?,
                    render(then, op)?,
                    render(otherwise, op)?
                ))
            }
        }
    }
}

fn render_args(args: &[Expression], op: OpId) -> Result<Vec<String>, CodegenError> {
    args.iter().map(|arg| render(arg, op)).collect()
}

fn render_call(
    function: &Identifier,
    args: &[Expression],
    op: OpId,
) -> Result<String, CodegenError> {
    let rendered = render_args(args, op)?;
    let direct = [
        ("ABS", "abs"),
        ("SQRT", "sqrt"),
        ("EXP", "exp"),
        ("LN", "log"),
        ("LG10", "log10"),
        ("RND", "round"),
        ("TRUNC", "trunc"),
        ("MIN", "pmin"),
        ("MAX", "pmax"),
        ("CONCAT", "paste0"),
        ("UPCASE", "str_to_upper"),
        ("LOWCASE", "str_to_lower"),
        ("LENGTH", "str_length"),
        ("MISSING", "is.na"),
        ("SYSMIS", "is.na"),
    ];
    for (spss, r) in direct {
        if function.matches_keyword(spss) {
            return Ok(format!("{r}({})", rendered.iter().format(", ")));
        }
    }
    if function.matches_keyword("LAG") {
        return match rendered.as_slice() {
            [source] => Ok(format!("lag({source})")),
            [source, offset] => Ok(format!("lag({source}, n = {offset})")),
            _ => Err(CodegenError::UnknownFunction {
                op,
                function: function.clone(),
            }),
        };
    }
    if function.matches_keyword("SUM") && !rendered.is_empty() {
        return Ok(format!("({})", rendered.iter().format(" + ")));
    }
    if function.matches_keyword("MEAN") && !rendered.is_empty() {
        return Ok(format!(
            "(({}) / {})",
            rendered.iter().format(" + "),
            rendered.len()
        ));
    }
    if function.matches_keyword("MOD") && rendered.len() == 2 {
        return Ok(format!("({} %% {})", rendered[0], rendered[1]));
    }
    if function.matches_keyword("ANY") && rendered.len() >= 2 {
        return Ok(format!(
            "{} %in% c({})",
            rendered[0],
            rendered[1..].iter().format(", ")
        ));
    }
    if function.matches_keyword("RANGE") && rendered.len() == 3 {
        return Ok(format!(
            "between({}, {}, {})",
            rendered[0], rendered[1], rendered[2]
        ));
    }
    if function.matches_keyword("SUBSTR") {
        return match rendered.as_slice() {
            [s, start] => Ok(format!("str_sub({s}, {start})")),
            [s, start, len] => Ok(format!("str_sub({s}, {start}, {start} + {len} - 1)")),
            _ => Err(CodegenError::UnknownFunction {
                op,
                function: function.clone(),
            }),
        };
    }
    if function.matches_keyword("LTRIM") && rendered.len() == 1 {
        return Ok(format!("str_trim({}, side = \"left\")", rendered[0]));
    }
    if function.matches_keyword("RTRIM") && rendered.len() == 1 {
        return Ok(format!("str_trim({}, side = \"right\")", rendered[0]));
    }
    if function.matches_keyword("STRING") && !rendered.is_empty() {
        return Ok(format!("as.character({})", rendered[0]));
    }
    if function.matches_keyword("NUMBER") && !rendered.is_empty() {
        return Ok(format!("as.numeric({})", rendered[0]));
    }
    Err(CodegenError::UnknownFunction {
        op,
        function: function.clone(),
    })
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::RGenerator;
    use crate::{
        command::parse, ir::builder::GraphBuilder, message::SourceFile,
        optimize::OptimizationCoordinator,
    };

    fn generate(source: &str) -> String {
        let file = SourceFile::for_string(String::from(source));
        let commands = parse(&file).unwrap();
        let pipeline = GraphBuilder::new(IndexMap::new()).build(commands).unwrap();
        let optimized = OptimizationCoordinator::new().optimize(pipeline).unwrap();
        RGenerator::new().generate(&optimized).unwrap()
    }

    #[test]
    fn header_includes_haven_only_for_sav() {
        let code = generate("GET FILE='in.sav'.\nSAVE OUTFILE='out.sav'.\n");
        assert!(code.contains("library(tidyverse)"));
        assert!(code.contains("library(haven)"));
        assert!(code.contains("read_sav(\"in.sav\")"));
        assert!(code.contains("write_sav("));

        let code = generate("DATA LIST FREE / a.\nSAVE OUTFILE='out.csv'.\n");
        assert!(!code.contains("library(haven)"));
        assert!(code.contains("write_csv("));
    }

    #[test]
    fn read_csv_carries_skip_and_col_types() {
        let code = generate(
            "GET DATA /TYPE=TXT /FILE='data.csv' /FIRSTCASE=2 /VARIABLES=id F8.0 name A10.\n",
        );
        assert!(
            code.contains(
                "read_csv(\"data.csv\", skip = 1, col_types = cols(id = col_double(), name = col_character()))"
            ),
            "unexpected code:\n{code}"
        );
    }

    #[test]
    fn predicate_operators_map_to_r() {
        let code = generate("DATA LIST FREE / age.\nSELECT IF age >= 18 AND NOT (age = 99).\n");
        assert!(code.contains("filter(age >= 18 & !(age == 99))"), "{code}");
    }

    #[test]
    fn recode_ranges_use_between_and_case_when() {
        let code = generate(
            "DATA LIST FREE / score.\n\
             RECODE score (0 THRU 49 = 0) (50 THRU 100 = 1) INTO grade.\n",
        );
        assert!(code.contains("case_when("), "{code}");
        assert!(code.contains("between(score, 0, 49) ~ 0"), "{code}");
        assert!(code.contains("between(score, 50, 100) ~ 1"), "{code}");
        assert!(code.contains("TRUE ~ NA"), "{code}");
    }

    #[test]
    fn in_place_recode_keeps_unmatched_values() {
        let code = generate("DATA LIST FREE / x.\nRECODE x (1, 2 = 9).\n");
        assert!(code.contains("x %in% c(1, 2) ~ 9"), "{code}");
        assert!(code.contains("TRUE ~ x"), "{code}");
    }

    #[test]
    fn sort_wraps_descending_keys() {
        let code = generate("DATA LIST FREE / a b.\nSORT CASES BY a (A) b (D).\n");
        assert!(code.contains("arrange(a, desc(b))"), "{code}");
    }

    #[test]
    fn missing_values_chain_na_if() {
        let code = generate("DATA LIST FREE / age.\nMISSING VALUES age (-9, -8).\n");
        assert!(code.contains("mutate(age = na_if(na_if(age, -9), -8))"), "{code}");
    }

    #[test]
    fn aggregate_groups_and_summarises() {
        let code = generate(
            "DATA LIST FREE / grp score.\nAGGREGATE /OUTFILE=* /BREAK=grp /mean_score = MEAN(score).\n",
        );
        assert!(code.contains("group_by(grp)"), "{code}");
        assert!(code.contains("summarise(mean_score = mean(score)"), "{code}");
    }

    #[test]
    fn concat_becomes_paste0() {
        let code = generate(
            "DATA LIST FREE / name (A10).\nSTRING label (A20).\nCOMPUTE label = CONCAT('ID_', name).\n",
        );
        assert!(code.contains("mutate(label = paste0(\"ID_\", name))"), "{code}");
    }

    #[test]
    fn generation_is_deterministic() {
        let source = "GET DATA /TYPE=TXT /FILE='d.csv' /VARIABLES=id F8.0 score F8.2.\n\
                      COMPUTE pass = score >= 50.\n\
                      SORT CASES BY id (D).\n\
                      SAVE OUTFILE='out.sav'.\n";
        assert_eq!(generate(source), generate(source));
    }
}
