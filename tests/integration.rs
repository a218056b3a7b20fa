use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn trail_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("trail");
    path
}

/// Test environment pointed at an unreachable remote (port 1 refuses
/// connections), so every capture exercises the local fallback path.
fn setup_test_env() -> (TempDir, PathBuf) {
    setup_with_remote("http://127.0.0.1:1/api/v1")
}

fn setup_with_remote(base_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/trail.sqlite"

[remote]
base_url = "{}"

[capture]
exclude_prefixes = ["chrome://", "about:", "file://"]
"#,
        root.display(),
        base_url
    );

    let config_path = config_dir.join("trail.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_trail(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = trail_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run trail binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_trail(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_trail(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_trail(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_capture_with_remote_down_caches_locally() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    let (stdout, stderr, success) = run_trail(
        &config_path,
        &["capture", "https://example.com/article", "--title", "Article"],
    );
    assert!(
        success,
        "capture failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("cached locally"));

    let (stdout, _, success) = run_trail(&config_path, &["history"]);
    assert!(success);
    assert!(stdout.contains("https://example.com/article"));
    assert!(stdout.contains("Article"));
    assert!(stdout.contains("local"));
    assert!(stdout.contains("1 record(s)"));
}

#[test]
fn test_recapture_keeps_one_record_with_the_newer_title() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    run_trail(
        &config_path,
        &["capture", "https://example.com", "--title", "First"],
    );
    run_trail(
        &config_path,
        &["capture", "https://example.com", "--title", "Second"],
    );

    let (stdout, _, success) = run_trail(&config_path, &["history"]);
    assert!(success);
    assert!(stdout.contains("1 record(s)"));
    assert!(stdout.contains("Second"));
    assert!(!stdout.contains("First"));
}

#[test]
fn test_internal_addresses_are_skipped() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    for url in ["chrome://settings", "about:blank", "file:///etc/hosts"] {
        let (stdout, _, success) = run_trail(&config_path, &["capture", url]);
        assert!(success, "skip should not be an error for {}", url);
        assert!(stdout.contains("skipped"));
    }

    let (stdout, _, _) = run_trail(&config_path, &["history"]);
    assert!(stdout.contains("No records."));
}

#[test]
fn test_collect_card_from_tree_file() {
    let (tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    let tree = r#"{
        "tag": "article",
        "attrs": {},
        "computed": {"color": "rgb(0, 0, 0)"},
        "children": [
            {
                "tag": "div",
                "attrs": {"data-part": "body"},
                "computed": {},
                "children": ["card words"]
            }
        ]
    }"#;
    let tree_path = tmp.path().join("card.json");
    fs::write(&tree_path, tree).unwrap();

    let (stdout, stderr, success) = run_trail(
        &config_path,
        &["collect", tree_path.to_str().unwrap()],
    );
    assert!(
        success,
        "collect failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("cached locally"));

    // Same markup again is a duplicate, not a second record
    let (stdout, _, success) = run_trail(
        &config_path,
        &["collect", tree_path.to_str().unwrap()],
    );
    assert!(success);
    assert!(stdout.contains("duplicate"));

    let (stdout, _, _) = run_trail(&config_path, &["history"]);
    assert!(stdout.contains("card"));
    assert!(stdout.contains("card words"));
    assert!(stdout.contains("1 record(s)"));
}

#[test]
fn test_watch_reads_events_from_stdin() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    let events = concat!(
        r#"{"type":"navigation","url":"https://a.example","title":"A"}"#,
        "\n",
        r#"{"type":"navigation","url":"https://b.example"}"#,
        "\n",
        "this line is not json\n",
        r#"{"type":"navigation","url":"about:blank"}"#,
        "\n",
    );

    let binary = trail_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("watch")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(events.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    assert!(output.status.success(), "watch failed: {}", stdout);
    assert!(stdout.contains("local-only: 2"));
    assert!(stdout.contains("skipped:    2"));

    let (stdout, _, _) = run_trail(&config_path, &["history"]);
    assert!(stdout.contains("2 record(s)"));
}

#[test]
fn test_clear_with_remote_down_exits_nonzero_but_empties_the_cache() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);
    run_trail(&config_path, &["capture", "https://example.com"]);

    let (stdout, _, success) = run_trail(&config_path, &["clear"]);
    assert!(!success, "partial clear must exit nonzero");
    assert!(stdout.contains("remote: FAILED"));
    assert!(stdout.contains("local:  cleared"));

    let (stdout, _, _) = run_trail(&config_path, &["history"]);
    assert!(stdout.contains("No records."));
}

#[test]
fn test_delete_with_remote_down_exits_nonzero() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    let (_, stderr, success) = run_trail(&config_path, &["delete", "5"]);
    assert!(!success, "delete with the remote down must exit nonzero");
    assert!(stderr.contains("delete failed"));
}

#[test]
fn test_resync_with_remote_down_reports_failures() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);
    run_trail(&config_path, &["capture", "https://example.com"]);

    let (stdout, _, success) = run_trail(&config_path, &["resync"]);
    assert!(!success, "resync with the remote down must exit nonzero");
    assert!(stdout.contains("failed:   1"));
}

#[test]
fn test_resync_with_nothing_pending_is_a_noop() {
    let (_tmp, config_path) = setup_test_env();
    run_trail(&config_path, &["init"]);

    let (stdout, _, success) = run_trail(&config_path, &["resync"]);
    assert!(success, "empty resync should succeed: {}", stdout);
    assert!(stdout.contains("pushed:   0"));
}

#[test]
fn test_missing_config_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_trail(&config_path, &["history"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}
