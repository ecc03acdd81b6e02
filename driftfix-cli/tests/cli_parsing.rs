//! CLI argument parsing and exit code tests.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn driftfix() -> Command {
    Command::cargo_bin("driftfix").expect("driftfix binary")
}

/// `app/users` has entities u1 and u3 and index entries u1, u2, u3 (u2 is an orphan).
const ORPHAN_STORE: &str = r#"{
  "namespaces": {
    "app": {
      "entities": ["u1", "u3"],
      "collections": {
        "users": {
          "index": [
            {"id": "u1", "bucket": "0"},
            {"id": "u2", "bucket": "0"},
            {"id": "u3", "bucket": "0"}
          ]
        }
      },
      "shard_chains": {
        "edges": [
          {"shard_id": 3, "shard_end": "k3", "compacted": true},
          {"shard_id": 2, "shard_end": "k2", "compacted": true},
          {"shard_id": 1, "shard_end": "k1", "compacted": true}
        ]
      }
    }
  }
}"#;

fn write_store(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("store.json");
    fs::write(&path, contents).expect("write store");
    path
}

fn index_ids(store: &Path) -> Vec<String> {
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store).expect("read store")).expect("json");
    json["namespaces"]["app"]["collections"]["users"]["index"]
        .as_array()
        .expect("index array")
        .iter()
        .map(|e| e["id"].as_str().expect("id").to_string())
        .collect()
}

#[test]
fn help_succeeds() {
    driftfix()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("audit"));
}

#[test]
fn missing_store_flag_is_exit_1() {
    driftfix()
        .args(["audit", "--mode", "orphan-index", "--all"])
        .assert()
        .code(1);
}

#[test]
fn unknown_mode_is_exit_1() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphans", "--all"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("orphans"));
}

#[test]
fn no_selector_is_exit_1() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index"])
        .assert()
        .code(1);
}

#[test]
fn unknown_namespace_is_exit_1() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--namespace", "nope"])
        .assert()
        .code(1);
}

#[test]
fn shard_mode_without_task_is_exit_1() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "shard-repair", "--namespace", "app"])
        .assert()
        .code(1);
}

#[test]
fn unreadable_store_is_exit_1() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), "{ not json");
    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--all"])
        .assert()
        .code(1);
}

#[test]
fn orphan_audit_repairs_and_rewrites_store() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    let report = temp.path().join("out").join("report.json");

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--namespace", "app", "--structure", "users"])
        .arg("--out")
        .arg(&report)
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Divergences: 1 (repaired 1"));

    assert_eq!(index_ids(&store), vec!["u1", "u3"]);

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report).expect("report")).expect("json");
    assert_eq!(json["schema"], "driftfix.report.v1");
    assert_eq!(json["totals"]["divergences_found"], 1);
    assert_eq!(json["targets"][0]["status"], "completed");
}

#[test]
fn dry_run_leaves_store_untouched() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    let before = fs::read_to_string(&store).expect("read");

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--all", "--dry-run"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("Dry run"));

    assert_eq!(fs::read_to_string(&store).expect("read"), before);
}

#[test]
fn shard_task_runs_from_config_file_settings() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    fs::write(
        temp.path().join("driftfix.toml"),
        "[audit]\npage_size = 1\n\n[orphans]\nseconds_in_past = 60\n",
    )
    .expect("write config");

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args([
            "--mode",
            "shard-repair",
            "--namespace",
            "app",
            "--task",
            "remove-last-shard-end",
        ])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("| `app/edges/shard-repair` | completed | 3 | 1 | 1 | 0 | 0 |"));
}

#[test]
fn rejected_repairs_are_exit_3() {
    let temp = TempDir::new().expect("tempdir");
    let read_only = ORPHAN_STORE.replacen(
        r#""entities": ["u1", "u3"],"#,
        r#""entities": ["u1", "u3"], "read_only": true,"#,
        1,
    );
    let store = write_store(temp.path(), &read_only);

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--all"])
        .assert()
        .code(3)
        .stdout(predicate::str::contains("failed 1"));

    assert_eq!(index_ids(&store), vec!["u1", "u2", "u3"]);
}

#[test]
fn checkpoint_dir_is_cleared_after_completion() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    let checkpoints = temp.path().join("cp");

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--all", "--page-size", "1"])
        .arg("--checkpoint-dir")
        .arg(&checkpoints)
        .assert()
        .code(0);

    let leftover = fs::read_dir(&checkpoints)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[test]
fn list_targets_prints_keys() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);

    driftfix()
        .arg("list-targets")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "shard-repair"])
        .assert()
        .code(0)
        .stdout(predicate::str::contains("app/edges/shard-repair"));
}

#[test]
fn offline_namespace_is_exit_2() {
    let temp = TempDir::new().expect("tempdir");
    let offline = ORPHAN_STORE.replacen(
        r#""entities": ["u1", "u3"],"#,
        r#""entities": ["u1", "u3"], "offline": true,"#,
        1,
    );
    let store = write_store(temp.path(), &offline);
    fs::write(
        temp.path().join("driftfix.toml"),
        "[retry]\nmax_attempts = 1\n",
    )
    .expect("write config");

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args(["--mode", "orphan-index", "--all"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("## Catalog failures"));

    assert_eq!(index_ids(&store), vec!["u1", "u2", "u3"]);
}

#[test]
fn rerunning_a_repaired_target_succeeds() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    let audit = |expected: &str| {
        driftfix()
            .current_dir(temp.path())
            .arg("audit")
            .arg("--store")
            .arg(&store)
            .args(["--mode", "orphan-index", "--namespace", "app", "--structure", "users"])
            .assert()
            .code(0)
            .stdout(predicate::str::contains(expected.to_string()));
    };

    audit("Divergences: 1 (repaired 1");
    audit("Divergences: 0 (repaired 0");
    assert_eq!(index_ids(&store), vec!["u1", "u3"]);
}

#[test]
fn undecodable_start_cursor_is_exit_1() {
    let temp = TempDir::new().expect("tempdir");
    let store = write_store(temp.path(), ORPHAN_STORE);
    let before = fs::read_to_string(&store).expect("read");

    driftfix()
        .current_dir(temp.path())
        .arg("audit")
        .arg("--store")
        .arg(&store)
        .args([
            "--mode",
            "orphan-index",
            "--namespace",
            "app",
            "--structure",
            "users",
            "--start-cursor",
            "not-a-cursor",
        ])
        .assert()
        .code(1);

    assert_eq!(fs::read_to_string(&store).expect("read"), before);
}
