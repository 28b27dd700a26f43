//! Certificate chain generation steps
//!
//! Regeneration runs three ordered steps: key + signing request, signing,
//! and Diffie-Hellman parameters. Each step is delegated to an external
//! tool; only its exit status and the existence of its output files are
//! checked.

mod command;

pub use command::{ArtifactPaths, CommandGenerator, CommandTemplates};

use std::fmt;
use std::io;
use std::path::PathBuf;

/// One of the ordered generation steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStep {
    /// Private key and certificate signing request
    Request,
    /// Signing the request into a certificate
    Sign,
    /// Diffie-Hellman parameter file
    Params,
}

impl GenerationStep {
    /// All steps in execution order
    pub const ALL: [GenerationStep; 3] = [
        GenerationStep::Request,
        GenerationStep::Sign,
        GenerationStep::Params,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStep::Request => "request",
            GenerationStep::Sign => "sign",
            GenerationStep::Params => "params",
        }
    }
}

impl fmt::Display for GenerationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters handed to every step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Artifact identifier, used as the certificate common name
    pub identifier: String,
    /// Requested DH modulus size
    pub strength: u32,
    /// Certificate validity in days, for time-bounded artifacts
    pub lifetime_days: Option<i64>,
}

/// A failed generation step
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{step}: command template is empty")]
    EmptyCommand { step: GenerationStep },

    #[error("{step}: failed to run '{program}': {source}")]
    Spawn {
        step: GenerationStep,
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{step}: '{program}' exited with {status}")]
    Failed {
        step: GenerationStep,
        program: String,
        status: String,
    },

    #[error("{step}: expected output {} was not created", .path.display())]
    MissingOutput { step: GenerationStep, path: PathBuf },

    #[error("{step}: I/O error: {source}")]
    Io {
        step: GenerationStep,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    /// The step that failed
    pub fn step(&self) -> GenerationStep {
        match self {
            StepError::EmptyCommand { step }
            | StepError::Spawn { step, .. }
            | StepError::Failed { step, .. }
            | StepError::MissingOutput { step, .. }
            | StepError::Io { step, .. } => *step,
        }
    }
}

/// Producer of a certificate chain.
///
/// The gate calls the three steps in order and stops at the first error.
pub trait ArtifactGenerator {
    /// Create the private key and signing request
    fn generate_request(&self, request: &GenerationRequest) -> Result<(), StepError>;

    /// Sign the request into a certificate
    fn sign(&self, request: &GenerationRequest) -> Result<(), StepError>;

    /// Create the Diffie-Hellman parameter file
    fn generate_params(&self, request: &GenerationRequest) -> Result<(), StepError>;

    /// File whose checksum is recorded in the fingerprint, if any
    fn primary_output(&self, request: &GenerationRequest) -> Option<PathBuf>;

    /// Run one step by name
    fn run_step(&self, step: GenerationStep, request: &GenerationRequest) -> Result<(), StepError> {
        match step {
            GenerationStep::Request => self.generate_request(request),
            GenerationStep::Sign => self.sign(request),
            GenerationStep::Params => self.generate_params(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_order() {
        let names: Vec<&str> = GenerationStep::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names, ["request", "sign", "params"]);
    }

    #[test]
    fn test_step_error_reports_step() {
        let err = StepError::MissingOutput {
            step: GenerationStep::Sign,
            path: PathBuf::from("/tmp/x.crt"),
        };
        assert_eq!(err.step(), GenerationStep::Sign);
        assert_eq!(err.to_string(), "sign: expected output /tmp/x.crt was not created");
    }
}
