//! End-to-end tests for the tport binary.
//!
//! Every test runs with its own database and a scratch HOME so no user
//! configuration or data is touched.

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NATIVE_BLOB: &str = concat!(
    r#"{"type":"site","key":"blog","name":"Blog"}"#,
    "\n",
    r#"{"type":"page","key":"/hello","site_key":"blog","title":"Hello"}"#,
    "\n",
    r#"{"type":"comment","key":"comment-41","page_key":"/hello","content":"first"}"#,
    "\n",
    r#"{"type":"comment","key":"comment-42","page_key":"/hello","parent_key":"comment-41","content":"reply"}"#,
    "\n",
);

fn tport(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tport").expect("binary should build");
    cmd.env("HOME", home.path())
        .env_remove("TPORT_DB")
        .env_remove("TPORT_TEST_DB")
        .env_remove("THREADPORT_DB")
        .env_remove("THREADPORT_DEFAULT_FORMAT")
        .env_remove("THREADPORT_MAX_RETRY_PASSES")
        .env_remove("RUST_LOG");
    cmd
}

fn db_path(home: &TempDir) -> PathBuf {
    home.path().join("store.db")
}

fn payload(data: &str, extra: &[(&str, &str)]) -> String {
    let mut object = serde_json::json!({
        "format": "native",
        "site": "blog",
        "data": data,
    });
    for (key, value) in extra {
        object[*key] = Value::String((*value).to_string());
    }
    object.to_string()
}

fn import_json(home: &TempDir, payload: &str, yes: bool) -> assert_cmd::assert::Assert {
    let db = db_path(home);
    let mut cmd = tport(home);
    cmd.args(["import", "--json", "--db"])
        .arg(&db)
        .args(["--payload", payload]);
    if yes {
        cmd.arg("--yes");
    }
    cmd.assert()
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

fn export_data(home: &TempDir, db: &Path, format: &str) -> String {
    let assert = tport(home)
        .args(["export", "--json", "--format", format, "--db"])
        .arg(db)
        .assert()
        .success();
    stdout_json(assert.get_output())["data"]
        .as_str()
        .expect("data should be a string")
        .to_string()
}

#[test]
fn formats_lists_builtin_adapters() {
    let home = TempDir::new().unwrap();
    let assert = tport(&home).args(["formats", "--json"]).assert().success();

    let formats = stdout_json(assert.get_output());
    let names: Vec<&str> = formats
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["native", "artrans"]);
}

#[test]
fn import_then_export_round_trips() {
    let home = TempDir::new().unwrap();
    let assert = import_json(&home, &payload(NATIVE_BLOB, &[]), true).success();

    let output = stdout_json(assert.get_output());
    assert_eq!(output["report"]["job"]["status"], "succeeded");
    assert_eq!(output["report"]["stats"]["comments"]["created"], 2);

    let blob = export_data(&home, &db_path(&home), "native");
    let mut lines = blob.lines();
    assert!(lines.next().unwrap().contains(r#""type":"header""#));
    let records: Vec<Value> = lines.map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[3]["key"], "comment-42");
    assert_eq!(records[3]["parent_key"], "comment-41");

    // Re-importing the export changes nothing
    let again = import_json(&home, &payload(&blob, &[]), false).success();
    let output = stdout_json(again.get_output());
    assert_eq!(output["report"]["stats"]["comments"]["skipped"], 2);
}

#[test]
fn missing_site_is_invalid_options() {
    let home = TempDir::new().unwrap();
    let body = serde_json::json!({ "format": "native", "data": NATIVE_BLOB }).to_string();

    import_json(&home, &body, true).code(4);
}

#[test]
fn unknown_format_is_rejected() {
    let home = TempDir::new().unwrap();
    let body = payload(NATIVE_BLOB, &[("format", "disqus")]);

    let assert = import_json(&home, &body, true).code(4);
    let stderr = String::from_utf8_lossy(&assert.get_output().stderr).to_string();
    assert!(stderr.contains("UNKNOWN_FORMAT"));
}

#[test]
fn conflicting_import_without_consent_is_denied() {
    let home = TempDir::new().unwrap();
    import_json(&home, &payload(NATIVE_BLOB, &[]), true).success();

    let changed = NATIVE_BLOB.replace(r#""content":"reply""#, r#""content":"edited""#);
    import_json(&home, &payload(&changed, &[("mode", "overwrite")]), false).code(6);

    let blob = export_data(&home, &db_path(&home), "native");
    assert!(blob.contains(r#""content":"reply""#));
    assert!(!blob.contains("edited"));
}

#[test]
fn export_without_database_is_not_initialized() {
    let home = TempDir::new().unwrap();
    tport(&home)
        .args(["export", "--db"])
        .arg(home.path().join("missing.db"))
        .assert()
        .code(2);
}

#[test]
fn upload_then_import_artrans_file() {
    let home = TempDir::new().unwrap();
    let source = home.path().join("artrans.json");
    fs::write(
        &source,
        r#"[{"id":"7","rid":"0","content":"hi","nick":"Ann","email":"ann@example.com","page_key":"/p","page_title":"P","site_name":"Blog","date":"2024-05-01 10:00:00"}]"#,
    )
    .unwrap();

    let upload = tport(&home)
        .args(["upload", "--json"])
        .arg(&source)
        .assert()
        .success();
    let staged = stdout_json(upload.get_output())["filename"]
        .as_str()
        .unwrap()
        .to_string();

    let body = serde_json::json!({ "format": "artrans", "site": "blog", "file": staged }).to_string();
    let assert = import_json(&home, &body, true).success();
    let output = stdout_json(assert.get_output());
    assert_eq!(output["report"]["stats"]["users"]["created"], 1);
    assert_eq!(output["report"]["stats"]["comments"]["created"], 1);

    let exported = export_data(&home, &db_path(&home), "artrans");
    let flat: Value = serde_json::from_str(&exported).unwrap();
    assert_eq!(flat[0]["id"], "7");
    assert_eq!(flat[0]["date"], "2024-05-01 10:00:00");

    fs::remove_file(staged).ok();
}

fn export_site(home: &TempDir, site: &str) -> Vec<Value> {
    let assert = tport(home)
        .args(["export", "--json", "--format", "native", "--site", site, "--db"])
        .arg(db_path(home))
        .assert()
        .success();
    let blob = stdout_json(assert.get_output())["data"]
        .as_str()
        .expect("data should be a string")
        .to_string();
    blob.lines()
        .skip(1)
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn sites_sharing_a_page_path_keep_their_comments() {
    let home = TempDir::new().unwrap();
    let data = r#"[{"id":"1","rid":"0","content":"hi","nick":"Ann","page_key":"/about"},{"id":"2","rid":"1","content":"re","nick":"Bob","page_key":"/about"}]"#;

    for site in ["blog", "docs"] {
        let body = serde_json::json!({ "format": "artrans", "site": site, "data": data }).to_string();
        let assert = import_json(&home, &body, false).success();
        let output = stdout_json(assert.get_output());
        assert_eq!(output["report"]["stats"]["pages"]["created"], 1);
        assert_eq!(output["report"]["stats"]["comments"]["created"], 2);
    }

    for site in ["blog", "docs"] {
        let records = export_site(&home, site);
        let comments: Vec<&str> = records
            .iter()
            .filter(|r| r["type"] == "comment")
            .map(|r| r["key"].as_str().unwrap())
            .collect();
        assert_eq!(comments, ["1", "2"], "comments of {site}");
        assert!(records
            .iter()
            .any(|r| r["type"] == "page" && r["key"] == "/about" && r["site_key"] == site));
    }
}

#[test]
fn artrans_into_existing_site_needs_no_consent() {
    let home = TempDir::new().unwrap();
    import_json(&home, &payload(NATIVE_BLOB, &[]), true).success();

    let data = r#"[{"id":"100","content":"new","nick":"Ann","page_key":"/fresh"}]"#;
    let body = serde_json::json!({ "format": "artrans", "site": "blog", "data": data }).to_string();
    let assert = import_json(&home, &body, false).success();
    let output = stdout_json(assert.get_output());
    assert_eq!(output["report"]["job"]["status"], "succeeded");
    assert_eq!(output["report"]["stats"]["sites"]["skipped"], 1);

    let site = export_site(&home, "blog")
        .into_iter()
        .find(|r| r["type"] == "site")
        .unwrap();
    assert_eq!(site["name"], "Blog");
}

#[test]
fn plain_import_streams_progress_lines() {
    let home = TempDir::new().unwrap();
    let assert = tport(&home)
        .args(["import", "--yes", "--db"])
        .arg(db_path(&home))
        .args(["--payload", &payload(NATIVE_BLOB, &[])])
        .assert()
        .success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.starts_with("[INFO] Importing native data into site 'blog'"));
    assert!(stdout.contains("[ OK ] comment:comment-42: created"));
    assert!(stdout.trim_end().ends_with("4 created, 0 updated, 0 skipped, 0 failed"));
}
