//! Merge property tests
//!
//! Identity laws, one-sided keys, recursive consistency and the named-list
//! guarantees, checked through the public API re-exported by `confgen`.

use serde_json::json;

use confgen::{
    merge, merge_layers, merge_named_list, merge_strict, remove_empty_values, ConfigTree,
    ConfigValue, MergeError,
};

fn tree(value: serde_json::Value) -> ConfigTree {
    ConfigTree::from_json(value).unwrap()
}

fn records(value: serde_json::Value) -> Vec<ConfigTree> {
    serde_json::from_value(value).unwrap()
}

fn samples() -> Vec<ConfigTree> {
    vec![
        tree(json!({})),
        tree(json!({"bantime": 600, "maxretry": 5})),
        tree(json!({"server": {"port": 1194, "proto": "udp", "push": ["route 10.0.0.0"]}})),
        tree(json!({"a": {"b": {"c": null, "d": [1, 2]}}, "e": true, "f": 1.5})),
    ]
}

// =============================================================================
// Identity and one-sided keys
// =============================================================================

#[test]
fn test_empty_tree_is_identity() {
    let empty = ConfigTree::new();
    for t in samples() {
        assert_eq!(merge(&t, &empty), t);
        assert_eq!(merge(&empty, &t), t);
    }
}

#[test]
fn test_one_sided_keys_survive() {
    let defaults = tree(json!({"only_default": {"x": 1}, "shared": 1}));
    let overrides = tree(json!({"only_override": [1, 2], "shared": 2}));

    let merged = merge(&defaults, &overrides);

    assert_eq!(merged.get("only_default"), defaults.get("only_default"));
    assert_eq!(merged.get("only_override"), overrides.get("only_override"));
    assert_eq!(merged.get("shared").and_then(ConfigValue::as_i64), Some(2));
}

#[test]
fn test_recursive_consistency() {
    let defaults = tree(json!({"jail": {"sshd": {"enabled": false, "port": "ssh"}, "backend": "auto"}}));
    let overrides = tree(json!({"jail": {"sshd": {"enabled": true}}}));

    let merged = merge(&defaults, &overrides);

    let nested = merge(
        defaults.get("jail").and_then(ConfigValue::as_mapping).unwrap(),
        overrides.get("jail").and_then(ConfigValue::as_mapping).unwrap(),
    );
    assert_eq!(merged.get("jail").and_then(ConfigValue::as_mapping), Some(&nested));
}

#[test]
fn test_sequences_are_replaced_not_concatenated() {
    let defaults = tree(json!({"ignoreip": ["127.0.0.1/8", "::1"]}));
    let overrides = tree(json!({"ignoreip": ["192.168.0.0/24"]}));

    let merged = merge(&defaults, &overrides);

    assert_eq!(merged.to_json(), json!({"ignoreip": ["192.168.0.0/24"]}));
}

#[test]
fn test_kind_change_is_override_wins() {
    let defaults = tree(json!({"logging": {"level": "info"}, "ports": [22]}));
    let overrides = tree(json!({"logging": "syslog", "ports": {"ssh": 22}}));

    let merged = merge(&defaults, &overrides);

    assert_eq!(merged.to_json(), json!({"logging": "syslog", "ports": {"ssh": 22}}));
}

#[test]
fn test_inputs_are_not_mutated() {
    let defaults = tree(json!({"a": {"b": 1, "c": [1]}}));
    let overrides = tree(json!({"a": {"b": 2, "d": 3}}));
    let defaults_before = defaults.clone();
    let overrides_before = overrides.clone();

    let _ = merge(&defaults, &overrides);

    assert_eq!(defaults, defaults_before);
    assert_eq!(overrides, overrides_before);
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_scenario_fail2ban_defaults() {
    let defaults = tree(json!({"bantime": 600, "maxretry": 5}));
    let overrides = tree(json!({"maxretry": 3}));

    assert_eq!(merge(&defaults, &overrides).to_json(), json!({"bantime": 600, "maxretry": 3}));
}

#[test]
fn test_scenario_named_jails() {
    let defaults = records(json!([
        {"name": "ssh", "enabled": true},
        {"name": "ssh-ddos", "enabled": false}
    ]));
    let overrides = records(json!([
        {"name": "ssh-ddos", "enabled": true},
        {"name": "nginx", "enabled": true}
    ]));

    let merged = merge_named_list(&defaults, &overrides);

    assert_eq!(
        serde_json::to_value(&merged).unwrap(),
        json!([
            {"name": "ssh", "enabled": true},
            {"name": "ssh-ddos", "enabled": true},
            {"name": "nginx", "enabled": true}
        ])
    );
}

// =============================================================================
// Named lists
// =============================================================================

#[test]
fn test_named_list_length_and_uniqueness() {
    let defaults = records(json!([
        {"name": "a", "x": 1},
        {"name": "b", "x": 2},
        {"name": "c", "x": 3}
    ]));
    let overrides = records(json!([
        {"name": "c", "y": 30},
        {"name": "d", "y": 40},
        {"name": "a", "y": 10}
    ]));

    let merged = merge_named_list(&defaults, &overrides);

    // |D ∪ O| by name
    assert_eq!(merged.len(), 4);
    let names: Vec<&str> = merged
        .iter()
        .filter_map(|r| r.get("name").and_then(ConfigValue::as_str))
        .collect();
    assert_eq!(names, ["a", "b", "c", "d"]);

    // overriding fields win, default-only fields stay
    assert_eq!(merged[0].to_json(), json!({"name": "a", "x": 1, "y": 10}));
    assert_eq!(merged[2].to_json(), json!({"name": "c", "x": 3, "y": 30}));
}

#[test]
fn test_named_list_empty_sides() {
    let list = records(json!([{"name": "a", "x": 1}]));

    assert_eq!(merge_named_list(&list, &[]), list);
    assert_eq!(merge_named_list(&[], &list), list);
    assert!(merge_named_list(&[], &[]).is_empty());
}

// =============================================================================
// Strict mode, layering and pruning
// =============================================================================

#[test]
fn test_strict_reports_nested_path() {
    let defaults = tree(json!({"server": {"tls": {"cert": "/etc/snakeoil/x.crt"}}}));
    let overrides = tree(json!({"server": {"tls": false}}));

    let err = merge_strict(&defaults, &overrides).unwrap_err();

    match err {
        MergeError::TypeMismatch { path, .. } => assert_eq!(path, "server.tls"),
    }
    // the permissive merge accepts the same input
    assert_eq!(merge(&defaults, &overrides).to_json(), json!({"server": {"tls": false}}));
}

#[test]
fn test_strict_agrees_with_merge_when_kinds_match() {
    let defaults = tree(json!({"a": {"b": 1}, "c": [1]}));
    let overrides = tree(json!({"a": {"b": "two"}, "c": [2, 3]}));

    assert_eq!(merge_strict(&defaults, &overrides).unwrap(), merge(&defaults, &overrides));
}

#[test]
fn test_layers_fold_left() {
    let builtin = tree(json!({"certificate": {"dh_size": 2048, "lifetime_days": 365}}));
    let host = tree(json!({"certificate": {"dh_size": 3072}}));
    let cli = tree(json!({"certificate": {"dh_size": 4096}}));

    let merged = merge_layers([builtin, host, cli]);

    assert_eq!(
        merged.to_json(),
        json!({"certificate": {"dh_size": 4096, "lifetime_days": 365}})
    );
}

#[test]
fn test_prune_after_merge() {
    let defaults = tree(json!({"jail": {"action": "", "enabled": false, "ignoreip": []}}));
    let overrides = tree(json!({"jail": {"bantime": 0}}));

    let pruned = remove_empty_values(&merge(&defaults, &overrides));

    assert_eq!(pruned.to_json(), json!({"jail": {"enabled": false, "bantime": 0}}));
}

#[test]
fn test_digest_is_key_order_independent() {
    let a = ConfigTree::from_json_str(r#"{"b": 1, "a": {"y": true, "x": "s"}}"#).unwrap();
    let b = ConfigTree::from_json_str(r#"{"a": {"x": "s", "y": true}, "b": 1}"#).unwrap();

    assert_eq!(a.digest().unwrap(), b.digest().unwrap());
    assert_ne!(a.digest().unwrap(), merge(&a, &tree(json!({"b": 2}))).digest().unwrap());
}
