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

//! A source-to-source compiler from SPSS statistical syntax to tidyverse R.
//!
//! The pipeline is strictly one-directional: source text is parsed into a
//! command AST, lowered into a dataflow IR, rewritten by a fixed sequence of
//! optimization passes, and finally emitted as R.  No stage mutates the
//! output of an earlier one.

use thiserror::Error as ThisError;

pub mod codegen;
pub mod command;
pub mod expr;
pub mod identifier;
pub mod ir;
pub mod lex;
pub mod manifest;
pub mod message;
pub mod optimize;

use codegen::{CodegenError, RGenerator};
use command::ParseError;
use ir::builder::{GraphBuilder, LoweringError};
use ir::{Metadata, Pipeline};
use manifest::ManifestError;
use message::SourceFile;
use optimize::{OptimizationCoordinator, ValidationError};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Lowering(#[from] LoweringError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("Unsupported output target `{0}`.")]
    UnsupportedTarget(String),
}

/// Everything one compilation produces: the raw and optimized topologies for
/// the verification dumps, and the generated script.
#[derive(Debug)]
pub struct Compilation {
    pub raw: Pipeline,
    pub optimized: Pipeline,
    pub code: String,
}

/// Runs the whole pipeline over in-memory source.
pub fn compile(source: &SourceFile, metadata: Metadata) -> Result<Compilation, Error> {
    let commands = command::parse(source)?;
    let raw = GraphBuilder::new(metadata).build(commands)?;
    let optimized = OptimizationCoordinator::new().optimize(raw.clone())?;
    let code = RGenerator::new().generate(&optimized)?;
    Ok(Compilation {
        raw,
        optimized,
        code,
    })
}
