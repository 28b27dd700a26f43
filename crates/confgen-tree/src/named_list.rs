//! Merge of record lists joined on a key field
//!
//! Role variables such as fail2ban jails, filters and actions are lists of
//! records identified by `name` rather than mappings. Records sharing a key
//! are deep-merged; everything else keeps its position.

use std::collections::HashMap;

use tracing::trace;

use crate::merge::merge_owned;
use crate::value::ConfigTree;

/// Default join key for record lists
pub const NAME_KEY: &str = "name";

/// Merge two record lists joined on `name`.
///
/// See [`merge_keyed_list`].
pub fn merge_named_list(defaults: &[ConfigTree], overrides: &[ConfigTree]) -> Vec<ConfigTree> {
    merge_keyed_list(defaults, overrides, NAME_KEY)
}

/// Merge two record lists joined on `key`.
///
/// - Defaults come first, in their original order.
/// - A record whose key also appears in `overrides` is deep-merged with it.
/// - Override-only records are appended in override order.
/// - A key value is never duplicated in the result: repeated keys inside
///   either list fold into their first occurrence.
/// - Records without a string `key` cannot be joined and are kept verbatim.
pub fn merge_keyed_list(defaults: &[ConfigTree], overrides: &[ConfigTree], key: &str) -> Vec<ConfigTree> {
    let mut result: Vec<ConfigTree> = Vec::with_capacity(defaults.len() + overrides.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in defaults.iter().chain(overrides) {
        match record_key(record, key) {
            Some(name) => {
                if let Some(&pos) = index.get(name) {
                    trace!(key = %name, "merging record");
                    let existing = std::mem::take(&mut result[pos]);
                    result[pos] = merge_owned(existing, record.clone());
                } else {
                    index.insert(name.to_string(), result.len());
                    result.push(record.clone());
                }
            }
            None => result.push(record.clone()),
        }
    }

    result
}

fn record_key<'a>(record: &'a ConfigTree, key: &str) -> Option<&'a str> {
    record.get(key).and_then(|v| v.as_str())
}
