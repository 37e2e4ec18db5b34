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

//! The `build` subcommand: the driver around the compiler core.
//!
//! Reads the manifest, runs the core, and writes the generated script plus
//! the verification artifacts.  Shelling out to the external verifiers
//! (`pspp` for the source side, `Rscript` for the target side) happens here
//! and never fails the build; their output is captured for inspection.

use std::{
    fs,
    path::{Path, PathBuf},
    process,
};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, warn};

use sps2r::{
    Compilation, Error, compile,
    ir::Metadata,
    manifest::{Manifest, ManifestError},
    message::SourceFile,
};

/// Compile an SPSS syntax file into an R script.
#[derive(Args, Clone, Debug)]
pub struct Build {
    /// Path to the project manifest (`.yaml`), or directly to a syntax file.
    #[arg(long)]
    manifest: PathBuf,
}

const VERIFICATION_DIR: &str = "dist/verification";

impl Build {
    pub fn run(self) -> Result<()> {
        let manifest = if matches!(
            self.manifest.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            Manifest::load(&self.manifest).map_err(Error::Manifest)?
        } else {
            Manifest::for_script(&self.manifest)
        };

        if manifest.output.target != "r_script" {
            return Err(Error::UnsupportedTarget(manifest.output.target).into());
        }

        let script_path = &manifest.inputs.primary_logic;
        let text = fs::read_to_string(script_path)
            .map_err(|error| {
                Error::Manifest(ManifestError::Io {
                    path: script_path.clone(),
                    error,
                })
            })?;
        let source = SourceFile::new(text, Some(script_path.display().to_string()));

        let mut metadata = Metadata::new();
        if let Some(project) = &manifest.project {
            metadata.insert(String::from("project"), project.clone());
        }
        metadata.insert(
            String::from("generator"),
            format!("sps2r {}", env!("CARGO_PKG_VERSION")),
        );
        metadata.insert(String::from("target"), manifest.output.target.clone());

        info!("parsing and lowering {}", script_path.display());
        let compilation = compile(&source, metadata)?;
        info!(
            operations = compilation.optimized.operations.len(),
            "optimized topology"
        );

        write_artifact(&manifest.output.path, &compilation.code)?;
        info!("wrote {}", manifest.output.path.display());
        self.write_verification(&manifest, &compilation)?;
        Ok(())
    }

    fn write_verification(&self, manifest: &Manifest, compilation: &Compilation) -> Result<()> {
        let dir = Path::new(VERIFICATION_DIR);
        write_artifact(&dir.join("02_raw_topology.yaml"), &compilation.raw.dump())?;
        write_artifact(
            &dir.join("03_optimized_topology.yaml"),
            &compilation.optimized.dump(),
        )?;
        write_artifact(&dir.join("04_generated_code.R"), &compilation.code)?;

        let source_log = run_verifier("pspp", &manifest.inputs.primary_logic);
        write_artifact(&dir.join("01_source_verification.txt"), &source_log)?;
        let target_log = run_verifier("Rscript", &manifest.output.path);
        write_artifact(&dir.join("05_target_verification.txt"), &target_log)?;
        Ok(())
    }
}

fn write_artifact(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// Runs an external verifier and captures its output.  Verifier failures are
/// logged, never propagated: the build stands on the core alone.
fn run_verifier(program: &str, argument: &Path) -> String {
    match process::Command::new(program).arg(argument).output() {
        Ok(output) => {
            if !output.status.success() {
                warn!("{program} exited with {}", output.status);
            }
            format!(
                "$ {program} {}\nstatus: {}\n--- stdout ---\n{}--- stderr ---\n{}",
                argument.display(),
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr),
            )
        }
        Err(error) => {
            warn!("could not run {program}: {error}");
            format!("$ {program} {}\nnot run: {error}\n", argument.display())
        }
    }
}
