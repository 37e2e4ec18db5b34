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

//! Graph optimization.
//!
//! A fixed pass order: the promoter merges operations that are one logical
//! step split across commands, the vertical collapser fuses adjacent
//! compatible operations, and the validator is the final gate before code
//! generation.  Each pass runs exactly once; the rewrites strictly reduce the
//! operation count, so a single sweep reaches the normal form.

use crate::ir::Pipeline;

pub mod collapse;
pub mod promote;
pub mod validate;

pub use validate::ValidationError;

#[derive(Debug, Default)]
pub struct OptimizationCoordinator;

impl OptimizationCoordinator {
    pub fn new() -> Self {
        Self
    }

    pub fn optimize(&self, pipeline: Pipeline) -> Result<Pipeline, ValidationError> {
        let pipeline = promote::run(pipeline);
        let pipeline = collapse::run(pipeline);
        validate::run(&pipeline)?;
        Ok(pipeline)
    }
}

/// Returns true if `b` directly consumes the single output of `a`.
pub(crate) fn chained(a: &crate::ir::Operation, b: &crate::ir::Operation) -> bool {
    a.outputs.len() == 1 && b.inputs.len() == 1 && a.outputs[0] == b.inputs[0]
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::OptimizationCoordinator;
    use crate::{command::parse, ir::builder::GraphBuilder, message::SourceFile};

    fn optimize(source: &str) -> crate::ir::Pipeline {
        let file = SourceFile::for_string(String::from(source));
        let commands = parse(&file).unwrap();
        let mut metadata = IndexMap::new();
        metadata.insert(String::from("project"), String::from("test"));
        let pipeline = GraphBuilder::new(metadata).build(commands).unwrap();
        OptimizationCoordinator::new().optimize(pipeline).unwrap()
    }

    #[test]
    fn optimize_is_idempotent_and_preserves_metadata() {
        let optimized = optimize(
            "DATA LIST FREE / a b c.\n\
             COMPUTE x = a + 1.\n\
             COMPUTE y = x * 2.\n\
             SELECT IF y > 0.\n\
             SELECT IF b < 9.\n\
             SAVE OUTFILE='out.sav'.\n",
        );
        assert_eq!(optimized.metadata.get("project").map(String::as_str), Some("test"));
        let again = OptimizationCoordinator::new()
            .optimize(optimized.clone())
            .unwrap();
        assert_eq!(again, optimized);
    }

    #[test]
    fn optimize_never_grows() {
        let source = "DATA LIST FREE / a.\n\
                      COMPUTE x = a + 1.\n\
                      SORT CASES BY a.\n\
                      COMPUTE y = x.\n\
                      SAVE OUTFILE='out.sav'.\n";
        let file = SourceFile::for_string(String::from(source));
        let commands = parse(&file).unwrap();
        let pipeline = GraphBuilder::new(IndexMap::new()).build(commands).unwrap();
        let raw_len = pipeline.operations.len();
        let optimized = OptimizationCoordinator::new().optimize(pipeline).unwrap();
        assert!(optimized.operations.len() <= raw_len);
    }
}
