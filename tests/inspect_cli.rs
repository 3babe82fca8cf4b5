#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::{json, Value};
use tempfile::TempDir;

fn inspect(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_storebridge-inspect"))
        .args(args)
        .output()
        .expect("failed to run storebridge-inspect")
}

fn write_json(dir: &Path, name: &str, value: &Value) -> String {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

fn tree() -> Value {
    json!({
        "root": {
            "c1": {"stores": {"s1": {"count": 1}}, "componentName": "Counter"},
            "c2": {"stores": {"s2": {"open": false}}, "componentName": "Sidebar"}
        }
    })
}

#[test]
fn projects_requested_filters() {
    let dir = TempDir::new().unwrap();
    let tree_file = write_json(dir.path(), "tree.json", &tree());

    let out = inspect(&["-f", "*.stores.*", &tree_file]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let printed: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(
        printed,
        json!([{
            "path": "*.stores.*",
            "value": {"c1": {"stores": {"s1": {"count": 1}}}, "c2": {"stores": {"s2": {"open": false}}}}
        }])
    );
}

#[test]
fn expand_mode_lists_concrete_paths() {
    let dir = TempDir::new().unwrap();
    let tree_file = write_json(dir.path(), "tree.json", &tree());

    let out = inspect(&["--expand", "--compact", "-f", "c1.*", &tree_file]);
    assert!(out.status.success());

    let printed: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(printed, json!({"c1.*": ["c1.stores", "c1.componentName"]}));
}

#[test]
fn config_supplies_default_filters() {
    let dir = TempDir::new().unwrap();
    let tree_file = write_json(dir.path(), "tree.json", &tree());
    let config_file = write_json(dir.path(), "bridge.json", &json!({"defaultFilters": ["c2.componentName"]}));

    let out = inspect(&["--config", &config_file, &tree_file]);
    assert!(out.status.success());

    let printed: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(
        printed,
        json!([{"path": "c2.componentName", "value": {"c2": {"componentName": "Sidebar"}}}])
    );
}

#[test]
fn bare_root_node_is_accepted() {
    let dir = TempDir::new().unwrap();
    let tree_file = write_json(dir.path(), "root.json", &tree()["root"]);

    let out = inspect(&["-f", "c1.stores.s1.count", &tree_file]);
    assert!(out.status.success());

    let printed: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(printed[0]["value"], json!({"c1": {"stores": {"s1": {"count": 1}}}}));
}

#[test]
fn usage_errors_exit_non_zero() {
    let out = inspect(&[]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("USAGE"));

    let out = inspect(&["--help"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("--filter"));
}

#[test]
fn missing_tree_file_fails() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");
    let out = inspect(&[missing.to_str().unwrap()]);
    assert!(!out.status.success());
}
