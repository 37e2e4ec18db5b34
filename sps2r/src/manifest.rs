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

//! The project manifest.
//!
//! A YAML file naming the input script and the desired output.  Unknown
//! top-level keys are ignored; `output` may be omitted entirely, in which
//! case the script goes to `dist/pipeline.R`.

use std::{
    io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ManifestError {
    #[error("Cannot read `{path}`: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("`{path}`: invalid manifest: {error}")]
    Invalid {
        path: PathBuf,
        #[source]
        error: serde_yaml::Error,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub project: Option<String>,

    pub inputs: Inputs,

    #[serde(default)]
    pub output: Output,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Inputs {
    pub primary_logic: PathBuf,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Output {
    #[serde(default = "default_target")]
    pub target: String,

    #[serde(default = "default_path")]
    pub path: PathBuf,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            target: default_target(),
            path: default_path(),
        }
    }
}

fn default_target() -> String {
    String::from("r_script")
}

fn default_path() -> PathBuf {
    PathBuf::from("dist/pipeline.R")
}

impl Manifest {
    /// Reads a manifest from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|error| ManifestError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        serde_yaml::from_str(&text).map_err(|error| ManifestError::Invalid {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Synthesizes a manifest for a bare script path, with default output
    /// settings.
    pub fn for_script(path: &Path) -> Self {
        Self {
            project: path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned()),
            inputs: Inputs {
                primary_logic: path.to_path_buf(),
            },
            output: Output::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, path::Path, path::PathBuf};

    use super::Manifest;

    #[test]
    fn full_manifest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "project: Survey Cleanup\n\
             inputs:\n  primary_logic: logic.sps\n\
             output:\n  target: r_script\n  path: dist/clean.R\n\
             unknown_key: ignored\n"
        )
        .unwrap();
        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.project.as_deref(), Some("Survey Cleanup"));
        assert_eq!(manifest.inputs.primary_logic, PathBuf::from("logic.sps"));
        assert_eq!(manifest.output.path, PathBuf::from("dist/clean.R"));
    }

    #[test]
    fn output_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "inputs:\n  primary_logic: logic.sps\n").unwrap();
        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.output.target, "r_script");
        assert_eq!(manifest.output.path, PathBuf::from("dist/pipeline.R"));
    }

    #[test]
    fn missing_inputs_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "project: nothing else\n").unwrap();
        assert!(Manifest::load(file.path()).is_err());
    }

    #[test]
    fn script_path_synthesizes_manifest() {
        let manifest = Manifest::for_script(Path::new("jobs/monthly.sps"));
        assert_eq!(manifest.project.as_deref(), Some("monthly"));
        assert_eq!(manifest.output.path, PathBuf::from("dist/pipeline.R"));
    }
}
