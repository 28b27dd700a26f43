//! Deep merge of configuration trees
//!
//! Merge semantics:
//! - Mappings: deep-merge by key (recursive)
//! - Sequences: REPLACE (override wins entirely, no concatenation)
//! - Scalars: override wins
//! - Kind changes (mapping vs scalar, ...): override wins, unless the strict
//!   variant is used

use crate::value::{ConfigTree, ConfigValue, ValueKind};
use crate::MergeError;

/// Merge `overrides` on top of `defaults`, returning a new tree.
///
/// Neither input is modified; the result owns deep copies of every value it
/// takes from either side.
pub fn merge(defaults: &ConfigTree, overrides: &ConfigTree) -> ConfigTree {
    merge_owned(defaults.clone(), overrides.clone())
}

/// Owned variant of [`merge`]; avoids the copies when the caller is done
/// with both inputs.
pub fn merge_owned(defaults: ConfigTree, overrides: ConfigTree) -> ConfigTree {
    let mut result = defaults;
    for (key, override_value) in overrides {
        let merged = match result.remove(&key) {
            Some(default_value) => merge_values(default_value, override_value),
            None => override_value,
        };
        result.insert(key, merged);
    }
    result
}

fn merge_values(default_value: ConfigValue, override_value: ConfigValue) -> ConfigValue {
    match (default_value, override_value) {
        (ConfigValue::Mapping(d), ConfigValue::Mapping(o)) => ConfigValue::Mapping(merge_owned(d, o)),
        (_, o) => o,
    }
}

/// Merge like [`merge`], but reject a key whose value changes kind
/// (mapping, sequence, scalar) between the two trees.
///
/// A null on either side is never a conflict: it is how a layer clears or
/// fills in a value.
pub fn merge_strict(defaults: &ConfigTree, overrides: &ConfigTree) -> Result<ConfigTree, MergeError> {
    strict_tree(defaults.clone(), overrides.clone(), "")
}

fn strict_tree(defaults: ConfigTree, overrides: ConfigTree, path: &str) -> Result<ConfigTree, MergeError> {
    let mut result = defaults;
    for (key, override_value) in overrides {
        let current_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };

        let merged = match result.remove(&key) {
            Some(default_value) => strict_values(default_value, override_value, &current_path)?,
            None => override_value,
        };
        result.insert(key, merged);
    }
    Ok(result)
}

fn strict_values(
    default_value: ConfigValue,
    override_value: ConfigValue,
    path: &str,
) -> Result<ConfigValue, MergeError> {
    match (default_value, override_value) {
        (ConfigValue::Mapping(d), ConfigValue::Mapping(o)) => {
            Ok(ConfigValue::Mapping(strict_tree(d, o, path)?))
        }
        (d, o) => match kinds_conflict(&d, &o) {
            Some((default_kind, override_kind)) => Err(MergeError::TypeMismatch {
                path: path.to_string(),
                default_kind,
                override_kind,
            }),
            None => Ok(o),
        },
    }
}

/// Merge multiple layers in order (first is base, last has highest precedence)
pub fn merge_layers<I>(layers: I) -> ConfigTree
where
    I: IntoIterator<Item = ConfigTree>,
{
    layers.into_iter().fold(ConfigTree::new(), merge_owned)
}

/// Recursively drop empty values: null, `""`, `{}` and `[]`.
///
/// `false` and `0` are kept. A mapping or sequence that only becomes empty
/// after its own children were pruned is kept as an empty container.
pub fn remove_empty_values(tree: &ConfigTree) -> ConfigTree {
    tree.iter()
        .filter(|(_, v)| !is_empty(v))
        .map(|(k, v)| (k.clone(), prune_value(v)))
        .collect()
}

fn prune_value(value: &ConfigValue) -> ConfigValue {
    match value {
        ConfigValue::Mapping(tree) => ConfigValue::Mapping(remove_empty_values(tree)),
        ConfigValue::Sequence(items) => ConfigValue::Sequence(
            items
                .iter()
                .filter(|v| !is_empty(v))
                .map(prune_value)
                .collect(),
        ),
        ConfigValue::Scalar(_) => value.clone(),
    }
}

fn is_empty(value: &ConfigValue) -> bool {
    match value {
        ConfigValue::Mapping(tree) => tree.is_empty(),
        ConfigValue::Sequence(items) => items.is_empty(),
        ConfigValue::Scalar(s) => s.is_null() || s.as_str() == Some(""),
    }
}

fn kinds_conflict(a: &ConfigValue, b: &ConfigValue) -> Option<(ValueKind, ValueKind)> {
    if a.is_null() || b.is_null() || a.kind() == b.kind() {
        None
    } else {
        Some((a.kind(), b.kind()))
    }
}
