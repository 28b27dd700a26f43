//! Artifact regeneration gate
//!
//! Decides whether a generated artifact must be rebuilt so that re-running
//! the automation is a no-op when nothing changed. An artifact is left alone
//! only when its fingerprint:
//! - exists,
//! - records the requested strength (and key size, when one is requested),
//! - has all of its output files on disk and still matches the tracked one,
//! - has at least `threshold_days` of validity left (time-bounded artifacts).
//!
//! Regeneration runs the request, sign and params steps in order and
//! persists the new fingerprint only after all three succeeded.

mod state;

pub use state::{Action, ArtifactState, Decision};

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::checksum::checksum_file;
use crate::fingerprint::{file_stem, Fingerprint, FingerprintStore, StoreError};
use crate::lock::{ArtifactLock, LockError};
use crate::pki::{ArtifactGenerator, GenerationRequest, GenerationStep, StepError};

/// Default minimum remaining validity, in days
pub const DEFAULT_THRESHOLD_DAYS: i64 = 10;

/// Requested strength must be strictly greater than this
pub const STRENGTH_FLOOR: u32 = 1024;

/// Default wait for the per-artifact lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters of one gated artifact
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// Stable identifier (certificate domain)
    pub identifier: String,

    /// Requested strength (DH modulus size)
    pub strength: u32,

    /// Requested key size; compared with the recorded one when set
    pub key_size: Option<u32>,

    /// Validity of a fresh artifact; `None` for artifacts that never expire
    pub lifetime_days: Option<i64>,

    /// Regenerate when fewer whole days than this remain
    pub threshold_days: i64,

    /// File whose checksum is compared with the recorded one
    pub artifact_path: Option<PathBuf>,

    /// Files that must all exist for the artifact to count as intact
    pub required_paths: Vec<PathBuf>,

    /// Maximum wait for the per-artifact lock
    pub lock_timeout: Duration,
}

impl GateConfig {
    pub fn new(identifier: impl Into<String>, strength: u32) -> Self {
        Self {
            identifier: identifier.into(),
            strength,
            key_size: None,
            lifetime_days: None,
            threshold_days: DEFAULT_THRESHOLD_DAYS,
            artifact_path: None,
            required_paths: Vec::new(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lifetime_days(mut self, days: i64) -> Self {
        self.lifetime_days = Some(days);
        self
    }

    pub fn with_threshold_days(mut self, days: i64) -> Self {
        self.threshold_days = days;
        self
    }

    pub fn with_artifact_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.artifact_path = Some(path.into());
        self
    }

    pub fn with_key_size(mut self, key_size: u32) -> Self {
        self.key_size = Some(key_size);
        self
    }

    pub fn with_required_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.required_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

/// Gate errors
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Configuration contract broken before any tool ran
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// An external step failed; the previous fingerprint is untouched
    #[error("generation failed for '{identifier}': {source}")]
    GenerationStepFailure {
        identifier: String,
        #[source]
        source: StepError,
    },

    #[error("cannot checksum {}: {source}", .path.display())]
    Checksum {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

/// Result of [`ArtifactGate::ensure`]
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Nothing to do
    Valid(Decision),
    /// Steps ran and the new fingerprint was persisted
    Regenerated {
        decision: Decision,
        fingerprint: Fingerprint,
    },
}

impl Outcome {
    pub fn decision(&self) -> &Decision {
        match self {
            Outcome::Valid(decision) => decision,
            Outcome::Regenerated { decision, .. } => decision,
        }
    }

    /// Terminal state of the run
    pub fn state(&self) -> ArtifactState {
        match self {
            Outcome::Valid(_) => ArtifactState::Valid,
            Outcome::Regenerated { .. } => ArtifactState::Regenerated,
        }
    }
}

/// Regeneration gate for one artifact
#[derive(Debug, Clone)]
pub struct ArtifactGate {
    config: GateConfig,
}

impl ArtifactGate {
    /// Validate the configuration.
    ///
    /// Fails fast on an empty identifier, a strength at or below
    /// [`STRENGTH_FLOOR`], a negative threshold, or a lifetime that would
    /// already be inside the threshold window when fresh.
    pub fn new(config: GateConfig) -> Result<Self, GateError> {
        if config.identifier.trim().is_empty() {
            return Err(GateError::PreconditionViolation(
                "artifact identifier must not be empty".to_string(),
            ));
        }
        file_stem(&config.identifier).map_err(|e| GateError::PreconditionViolation(e.to_string()))?;

        if config.strength <= STRENGTH_FLOOR {
            return Err(GateError::PreconditionViolation(format!(
                "strength {} must be greater than {}",
                config.strength, STRENGTH_FLOOR
            )));
        }

        if config.threshold_days < 0 {
            return Err(GateError::PreconditionViolation(format!(
                "threshold_days {} must not be negative",
                config.threshold_days
            )));
        }

        if let Some(lifetime) = config.lifetime_days {
            if lifetime <= config.threshold_days {
                return Err(GateError::PreconditionViolation(format!(
                    "lifetime_days {} must be greater than threshold_days {}",
                    lifetime, config.threshold_days
                )));
            }
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn identifier(&self) -> &str {
        &self.config.identifier
    }

    /// Decide against the stored fingerprint, using the current time
    pub fn decide(&self, store: &FingerprintStore, force: bool) -> Result<Decision, GateError> {
        self.decide_at(store, force, Utc::now())
    }

    /// Decide against the stored fingerprint at `now`.
    ///
    /// A corrupt fingerprint file counts as absent, so the next successful
    /// regeneration replaces it.
    pub fn decide_at(
        &self,
        store: &FingerprintStore,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Decision, GateError> {
        let recorded = match store.load(&self.config.identifier) {
            Ok(Some(fp)) if fp.identifier != self.config.identifier => {
                warn!(
                    identifier = %self.config.identifier,
                    recorded = %fp.identifier,
                    "fingerprint belongs to another identifier, ignoring"
                );
                None
            }
            Ok(fp) => fp,
            Err(StoreError::Corrupt { path, source }) => {
                warn!(path = %path.display(), error = %source, "corrupt fingerprint, treating as absent");
                None
            }
            Err(e) => return Err(e.into()),
        };

        self.evaluate(recorded.as_ref(), force, now)
    }

    /// Decide against an already loaded fingerprint
    pub fn evaluate(
        &self,
        recorded: Option<&Fingerprint>,
        force: bool,
        now: DateTime<Utc>,
    ) -> Result<Decision, GateError> {
        let remaining_days = recorded.and_then(|fp| fp.remaining_days(now));

        let state = match recorded {
            None => ArtifactState::Absent,
            Some(fp) if self.params_differ(fp) => ArtifactState::ParamMismatch,
            Some(fp) => {
                if self.has_drifted(fp)? {
                    ArtifactState::Drifted
                } else if self.is_expiring(fp, now) {
                    ArtifactState::Expiring
                } else {
                    ArtifactState::Valid
                }
            }
        };

        let action = if force || state != ArtifactState::Valid {
            Action::Regenerate
        } else {
            Action::Skip
        };

        debug!(
            identifier = %self.config.identifier,
            %state,
            forced = force,
            remaining_days = ?remaining_days,
            "regeneration decision"
        );

        Ok(Decision {
            identifier: self.config.identifier.clone(),
            state,
            action,
            forced: force,
            remaining_days,
            recorded_strength: recorded.and_then(|fp| fp.strength),
            requested_strength: self.config.strength,
        })
    }

    fn is_expiring(&self, fp: &Fingerprint, now: DateTime<Utc>) -> bool {
        match fp.remaining_days(now) {
            Some(remaining) => fp.is_expired(now) || remaining < self.config.threshold_days,
            // A time-bounded artifact without a recorded expiry cannot be trusted
            None => self.config.lifetime_days.is_some(),
        }
    }

    fn params_differ(&self, fp: &Fingerprint) -> bool {
        if fp.strength != Some(self.config.strength) {
            return true;
        }
        self.config.key_size.is_some() && fp.key_size != self.config.key_size
    }

    /// A missing required file or a changed tracked file
    fn has_drifted(&self, fp: &Fingerprint) -> Result<bool, GateError> {
        if let Some(missing) = self.config.required_paths.iter().find(|path| !path.exists()) {
            debug!(identifier = %self.config.identifier, path = %missing.display(), "artifact file missing");
            return Ok(true);
        }

        let path = match &self.config.artifact_path {
            Some(path) => path,
            None => return Ok(false),
        };

        let current = checksum_file(path).map_err(|source| GateError::Checksum {
            path: path.clone(),
            source,
        })?;

        Ok(match (current, &fp.checksum) {
            (None, _) => true,
            (Some(current), Some(recorded)) => &current != recorded,
            (Some(_), None) => false,
        })
    }

    fn generation_request(&self) -> GenerationRequest {
        GenerationRequest {
            identifier: self.config.identifier.clone(),
            strength: self.config.strength,
            lifetime_days: self.config.lifetime_days,
        }
    }

    /// Decide and, when needed, regenerate under the per-artifact lock.
    ///
    /// The lock covers reading the fingerprint, running the steps and
    /// writing the new fingerprint.
    pub fn ensure<G>(
        &self,
        store: &FingerprintStore,
        generator: &G,
        force: bool,
    ) -> Result<Outcome, GateError>
    where
        G: ArtifactGenerator + ?Sized,
    {
        let _lock = ArtifactLock::acquire(store.root(), &self.config.identifier, self.config.lock_timeout)?;

        let now = Utc::now();
        let decision = self.decide_at(store, force, now)?;

        if !decision.must_regenerate() {
            info!(identifier = %self.config.identifier, "artifact valid, nothing to do");
            return Ok(Outcome::Valid(decision));
        }

        let fingerprint = self.regenerate(store, generator, &decision, now)?;
        Ok(Outcome::Regenerated {
            decision,
            fingerprint,
        })
    }

    fn regenerate<G>(
        &self,
        store: &FingerprintStore,
        generator: &G,
        decision: &Decision,
        now: DateTime<Utc>,
    ) -> Result<Fingerprint, GateError>
    where
        G: ArtifactGenerator + ?Sized,
    {
        let identifier = &self.config.identifier;
        let mut state = decision.state;
        advance(&mut state, ArtifactState::Generating, identifier);

        info!(identifier = %identifier, from = %decision.state, forced = decision.forced, "regenerating artifact");

        let request = self.generation_request();
        let step_failure = |source: StepError| {
            warn!(identifier = %identifier, step = %source.step(), error = %source, "generation step failed");
            GateError::GenerationStepFailure {
                identifier: identifier.clone(),
                source,
            }
        };

        for step in GenerationStep::ALL {
            generator.run_step(step, &request).map_err(step_failure)?;
            debug!(identifier = %identifier, %step, "generation step complete");
        }

        let mut fingerprint = Fingerprint::new(identifier.clone(), now).with_strength(self.config.strength);
        if let Some(key_size) = self.config.key_size {
            fingerprint = fingerprint.with_key_size(key_size);
        }
        if let Some(days) = self.config.lifetime_days {
            fingerprint = fingerprint.with_lifetime_days(days);
        }
        if let Some(path) = generator.primary_output(&request) {
            let checksum = checksum_output(&path)?.ok_or_else(|| {
                step_failure(StepError::MissingOutput {
                    step: GenerationStep::Sign,
                    path: path.clone(),
                })
            })?;
            fingerprint = fingerprint.with_checksum(checksum);
        }

        store.save(&fingerprint)?;
        advance(&mut state, ArtifactState::Regenerated, identifier);

        info!(
            identifier = %identifier,
            strength = self.config.strength,
            expires_at = ?fingerprint.expires_at,
            "artifact regenerated"
        );
        Ok(fingerprint)
    }
}

fn checksum_output(path: &Path) -> Result<Option<String>, GateError> {
    checksum_file(path).map_err(|source| GateError::Checksum {
        path: path.to_path_buf(),
        source,
    })
}

fn advance(state: &mut ArtifactState, next: ArtifactState, identifier: &str) {
    debug_assert!(state.can_transition_to(next), "{} → {}", state, next);
    debug!(identifier, from = %state, to = %next, "state transition");
    *state = next;
}
