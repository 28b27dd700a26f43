//! External command backed generator
//!
//! Each step is an argv template. Placeholders are substituted before the
//! command runs:
//! `{domain}` `{key}` `{csr}` `{crt}` `{dh}` `{days}` `{key_size}` `{dh_size}`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ArtifactGenerator, GenerationRequest, GenerationStep, StepError};
use crate::fingerprint::file_stem;

/// Argv templates for the three steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplates {
    pub request: Vec<String>,
    pub sign: Vec<String>,
    pub params: Vec<String>,
}

impl CommandTemplates {
    fn for_step(&self, step: GenerationStep) -> &[String] {
        match step {
            GenerationStep::Request => &self.request,
            GenerationStep::Sign => &self.sign,
            GenerationStep::Params => &self.params,
        }
    }
}

/// Output file locations for one identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub csr: PathBuf,
    pub crt: PathBuf,
    pub dh: PathBuf,
}

impl ArtifactPaths {
    /// Layout: `<output_dir>/<id>/<id>.{key,csr,crt}` and `<output_dir>/<id>/dh.pem`
    pub fn for_identifier(output_dir: &Path, identifier: &str) -> Self {
        let stem = file_stem(identifier).unwrap_or_else(|_| "_".to_string());
        let dir = output_dir.join(&stem);
        Self {
            key: dir.join(format!("{}.key", stem)),
            csr: dir.join(format!("{}.csr", stem)),
            crt: dir.join(format!("{}.crt", stem)),
            dh: dir.join("dh.pem"),
            dir,
        }
    }

    /// Every file the three steps produce
    pub fn all(&self) -> [&Path; 4] {
        [
            self.key.as_path(),
            self.csr.as_path(),
            self.crt.as_path(),
            self.dh.as_path(),
        ]
    }

    /// Files a step must leave behind
    pub fn outputs(&self, step: GenerationStep) -> Vec<&Path> {
        match step {
            GenerationStep::Request => vec![self.key.as_path(), self.csr.as_path()],
            GenerationStep::Sign => vec![self.crt.as_path()],
            GenerationStep::Params => vec![self.dh.as_path()],
        }
    }
}

/// Runs the step templates as external processes
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    output_dir: PathBuf,
    key_size: u32,
    templates: CommandTemplates,
}

impl CommandGenerator {
    pub fn new(output_dir: impl Into<PathBuf>, key_size: u32, templates: CommandTemplates) -> Self {
        Self {
            output_dir: output_dir.into(),
            key_size,
            templates,
        }
    }

    pub fn paths(&self, identifier: &str) -> ArtifactPaths {
        ArtifactPaths::for_identifier(&self.output_dir, identifier)
    }

    /// Substitute placeholders in a step template
    pub fn render(&self, step: GenerationStep, request: &GenerationRequest) -> Vec<String> {
        let paths = self.paths(&request.identifier);
        let vars: [(&str, String); 8] = [
            ("{domain}", request.identifier.clone()),
            ("{key}", paths.key.display().to_string()),
            ("{csr}", paths.csr.display().to_string()),
            ("{crt}", paths.crt.display().to_string()),
            ("{dh}", paths.dh.display().to_string()),
            ("{days}", request.lifetime_days.map(|d| d.to_string()).unwrap_or_default()),
            ("{key_size}", self.key_size.to_string()),
            ("{dh_size}", request.strength.to_string()),
        ];

        self.templates
            .for_step(step)
            .iter()
            .map(|arg| {
                vars.iter()
                    .fold(arg.clone(), |acc, (name, value)| acc.replace(name, value))
            })
            .collect()
    }

    fn run(&self, step: GenerationStep, request: &GenerationRequest) -> Result<(), StepError> {
        let paths = self.paths(&request.identifier);
        let io_err = |source: io::Error| StepError::Io { step, source };

        fs::create_dir_all(&paths.dir).map_err(io_err)?;

        // Stale outputs would satisfy the existence check below
        for output in paths.outputs(step) {
            match fs::remove_file(output) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(e)),
            }
        }

        let argv = self.render(step, request);
        let (program, args) = argv
            .split_first()
            .ok_or(StepError::EmptyCommand { step })?;

        debug!(%step, ?argv, "running generation step");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| StepError::Spawn {
                step,
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            warn!(
                %step,
                status = %output.status,
                stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "generation step failed"
            );
            return Err(StepError::Failed {
                step,
                program: program.clone(),
                status: output.status.to_string(),
            });
        }

        for expected in paths.outputs(step) {
            if !expected.exists() {
                return Err(StepError::MissingOutput {
                    step,
                    path: expected.to_path_buf(),
                });
            }
        }

        Ok(())
    }
}

impl ArtifactGenerator for CommandGenerator {
    fn generate_request(&self, request: &GenerationRequest) -> Result<(), StepError> {
        self.run(GenerationStep::Request, request)
    }

    fn sign(&self, request: &GenerationRequest) -> Result<(), StepError> {
        self.run(GenerationStep::Sign, request)
    }

    fn generate_params(&self, request: &GenerationRequest) -> Result<(), StepError> {
        self.run(GenerationStep::Params, request)
    }

    fn primary_output(&self, request: &GenerationRequest) -> Option<PathBuf> {
        Some(self.paths(&request.identifier).crt)
    }
}
