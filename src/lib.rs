//! confgen - configuration layering and idempotent artifact regeneration
//!
//! Default and override configuration trees are deep-merged with
//! override-wins semantics (see the `confgen-tree` crate). Generated
//! artifacts such as certificate chains and DH parameters are rebuilt only
//! when their persisted fingerprint is absent, expiring, drifted or was
//! produced with different parameters.

pub mod cache;
pub mod checksum;
pub mod config;
pub mod fingerprint;
pub mod gate;
pub mod lock;
pub mod pki;

pub use confgen_tree::{
    merge, merge_keyed_list, merge_layers, merge_named_list, merge_strict, remove_empty_values,
    ConfigTree, ConfigValue, MergeError, Scalar,
};

pub use checksum::{checksum_bytes, checksum_file, ChecksumFile, ChecksumStatus};
pub use config::{ConfigError, EffectiveConfig, Settings};
pub use fingerprint::{Fingerprint, FingerprintStore, StoreError};
pub use gate::{Action, ArtifactGate, ArtifactState, Decision, GateConfig, GateError, Outcome};
pub use lock::{ArtifactLock, LockError};
pub use pki::{ArtifactGenerator, CommandGenerator, GenerationRequest, GenerationStep, StepError};
