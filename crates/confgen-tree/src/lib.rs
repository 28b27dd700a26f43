//! Configuration trees with override-wins deep merge.
//!
//! Every role layers its variables the same way: built-in defaults first,
//! then user overrides. Mappings merge key by key, while sequences and
//! scalars are replaced wholesale by the override.

mod merge;
mod named_list;
mod value;

pub use merge::{merge, merge_layers, merge_owned, merge_strict, remove_empty_values};
pub use named_list::{merge_keyed_list, merge_named_list, NAME_KEY};
pub use value::{ConfigTree, ConfigValue, Scalar, ValueKind};

/// Error from the opt-in strict merge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error("type mismatch at '{path}': {default_kind} cannot be overridden by {override_kind}")]
    TypeMismatch {
        path: String,
        default_kind: ValueKind,
        override_kind: ValueKind,
    },
}

/// Errors building or encoding a tree
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("expected a mapping at the top level, found a {0}")]
    NotAMapping(ValueKind),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JCS canonicalization error: {0}")]
    Canonicalize(String),
}
