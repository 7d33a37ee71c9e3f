use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn dig_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("dig");
    path
}

const CATALOG: &str = r#"[
  {"id": "blp-1577", "title": "Blue Train", "artist": "John Coltrane", "label": "Blue Note",
   "catalog_no": "BLP 1577", "barcode": "0724349532522"},
  {"id": "sd-1311", "title": "Giant Steps", "artist": "John Coltrane", "label": "Atlantic",
   "catalog_no": "SD 1311"},
  {"id": "offline", "title": "Unreachable", "barcode": "999", "error": "offline"}
]"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();
    fs::write(root.join("catalog.json"), CATALOG).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/digbin.sqlite"

[pipeline]
commit_threshold = 85
batch_limit = 10

[ocr]
engine = "sidecar"

[lookup]
provider = "fixtures"
fixtures_path = "{root}/catalog.json"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("digbin.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_dig(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = dig_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run dig binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn run_ok(config_path: &Path, args: &[&str]) -> String {
    let (stdout, stderr, success) = run_dig(config_path, args);
    assert!(success, "{:?} failed: stdout={}, stderr={}", args, stdout, stderr);
    stdout
}

/// Id printed by `dig add` as `Created <id>`.
fn created_id(stdout: &str) -> String {
    stdout
        .lines()
        .find_map(|l| l.strip_prefix("Created "))
        .expect("no Created line")
        .trim()
        .to_string()
}

fn field<'a>(stdout: &'a str, name: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find_map(|l| l.trim_start().strip_prefix(name))
        .map(str::trim)
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let stdout = run_ok(&config_path, &["init"]);
    assert!(stdout.contains("initialized"));
    run_ok(&config_path, &["init"]);
}

#[test]
fn test_missing_config_fails() {
    let (tmp, _) = setup_test_env();
    let (_, stderr, success) = run_dig(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_add_defaults() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let stdout = run_ok(&config_path, &["add", "barcode", "0724349532522"]);
    assert_eq!(field(&stdout, "lookup:"), Some("PENDING"));

    let stdout = run_ok(&config_path, &["add", "quick", " ", ""]);
    assert_eq!(field(&stdout, "lookup:"), Some("NOT_ELIGIBLE"));

    let stdout = run_ok(&config_path, &["add", "cover", "/tmp/none.jpg"]);
    assert_eq!(field(&stdout, "ocr:"), Some("NOT_STARTED"));
    assert_eq!(field(&stdout, "lookup:"), Some("NOT_ELIGIBLE"));

    let (_, _, success) = run_dig(&config_path, &["add", "barcode", "  "]);
    assert!(!success, "blank barcode must be rejected");
}

#[test]
fn test_import_scan_commits() {
    let (tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let rows = tmp.path().join("rows.jsonl");
    fs::write(
        &rows,
        concat!(
            r#"{"barcode": "0724349532522", "catno": "BLP 1577", "artist": "Coltrane"}"#,
            "\n\n",
            "not json\n",
            r#"{"title": "Giant Steps", "artist": "John Coltrane"}"#,
            "\n",
        ),
    )
    .unwrap();
    let stdout = run_ok(&config_path, &["add", "import", rows.to_str().unwrap()]);
    assert!(stdout.contains("Imported 2 rows"), "{}", stdout);
    assert!(stdout.contains("(1 skipped)"), "{}", stdout);

    let stdout = run_ok(&config_path, &["scan"]);
    assert!(stdout.contains("1 committed, 1 needs review"), "{}", stdout);

    let stdout = run_ok(&config_path, &["list", "--review"]);
    assert!(stdout.contains("Giant Steps"));
    assert!(!stdout.contains("[committed]"));

    let stdout = run_ok(&config_path, &["list"]);
    assert!(stdout.contains("COMMITTED"));

    // Nothing left to do.
    let stdout = run_ok(&config_path, &["scan"]);
    assert!(stdout.contains("0 committed, 0 needs review, 0 failed"), "{}", stdout);
}

#[test]
fn test_review_list_skips_queued_items() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let barcode = created_id(&run_ok(&config_path, &["add", "barcode", "0724349532522"]));
    let cover = created_id(&run_ok(&config_path, &["add", "cover", "/tmp/none.jpg"]));
    let stdout = run_ok(&config_path, &["list", "--review"]);
    assert!(stdout.contains("Inbox is empty"), "{}", stdout);

    let blank = created_id(&run_ok(&config_path, &["add", "quick", "", ""]));
    let stdout = run_ok(&config_path, &["list", "--review"]);
    assert!(stdout.contains(&blank));
    assert!(!stdout.contains(&barcode));
    assert!(!stdout.contains(&cover));
}

#[test]
fn test_review_confirm_undo_flow() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let id = created_id(&run_ok(&config_path, &["add", "barcode", "0724349532522"]));
    run_ok(&config_path, &["scan"]);

    let show = run_ok(&config_path, &["show", &id]);
    assert_eq!(field(&show, "lookup:"), Some("NEEDS_REVIEW"));
    assert_eq!(field(&show, "confidence:"), Some("50"));
    assert!(show.contains("BARCODE_MATCH"));
    let snapshot = field(&show, "snapshot:").expect("candidate listed").to_string();

    let stdout = run_ok(&config_path, &["confirm", &id, "--candidate", &snapshot]);
    assert!(stdout.contains("lookup COMMITTED"));
    assert_eq!(field(&stdout, "committed:"), Some("blp-1577"));

    let stdout = run_ok(&config_path, &["undo", &id]);
    assert!(stdout.contains("lookup NEEDS_REVIEW"));

    // Undo only applies to committed items.
    let (_, stderr, success) = run_dig(&config_path, &["undo", &id]);
    assert!(!success);
    assert!(stderr.contains("did not apply"));

    let stdout = run_ok(&config_path, &["confirm", &id]);
    assert_eq!(field(&stdout, "committed:"), Some("blp-1577"));

    // A commit only leaves through undo.
    for command in ["retry", "unknown", "confirm"] {
        let (_, stderr, success) = run_dig(&config_path, &[command, &id]);
        assert!(!success, "{} on a committed item", command);
        assert!(stderr.contains("did not apply"));
    }
    let show = run_ok(&config_path, &["show", &id]);
    assert_eq!(field(&show, "lookup:"), Some("COMMITTED"));
}

#[test]
fn test_cover_ocr_then_lookup() {
    let (tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let photo = tmp.path().join("cover.jpg");
    fs::write(&photo, b"jpeg").unwrap();
    fs::write(
        tmp.path().join("cover.jpg.txt"),
        "Giant Steps\nJohn Coltrane\nAtlantic - SD 1311\n",
    )
    .unwrap();

    let id = created_id(&run_ok(&config_path, &["add", "cover", photo.to_str().unwrap()]));
    let stdout = run_ok(&config_path, &["scan"]);
    assert!(stdout.contains("1 done, 0 failed"), "{}", stdout);

    let show = run_ok(&config_path, &["show", &id]);
    assert_eq!(field(&show, "ocr:"), Some("DONE"));
    assert_eq!(field(&show, "catalog_no:"), Some("SD 1311"));
    // catalog 25 + title 15 + artist 10
    assert_eq!(field(&show, "confidence:"), Some("50"));
}

#[test]
fn test_lookup_failure_backs_off() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let id = created_id(&run_ok(&config_path, &["add", "barcode", "999"]));
    let stdout = run_ok(&config_path, &["scan"]);
    assert!(stdout.contains("1 failed"), "{}", stdout);

    let show = run_ok(&config_path, &["show", &id]);
    assert_eq!(field(&show, "lookup:"), Some("FAILED"));
    assert_eq!(field(&show, "error:"), Some("OFFLINE"));
    assert_eq!(field(&show, "retries:"), Some("1"));

    // Backing off: the next scan leaves it alone until retried by hand.
    let stdout = run_ok(&config_path, &["scan"]);
    assert!(stdout.contains("0 failed, 0 requeued"), "{}", stdout);

    let stdout = run_ok(&config_path, &["retry", &id]);
    assert!(stdout.contains("lookup PENDING"));
    let stdout = run_ok(&config_path, &["scan"]);
    assert!(stdout.contains("1 failed"), "{}", stdout);
}

#[test]
fn test_edit_unknown_and_delete() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);

    let id = created_id(&run_ok(&config_path, &["add", "quick", "", ""]));
    let stdout = run_ok(&config_path, &["unknown", &id]);
    assert!(stdout.contains("lookup NEEDS_REVIEW"));

    let stdout = run_ok(&config_path, &["edit", &id, "--title", "Blue Train"]);
    assert!(stdout.contains("lookup NEEDS_REVIEW"), "title alone is not enough to search");
    let stdout = run_ok(&config_path, &["edit", &id, "--artist", "John Coltrane"]);
    assert!(stdout.contains("lookup PENDING"));
    let (_, _, success) = run_dig(&config_path, &["edit", &id]);
    assert!(!success, "edit without fields must fail");

    run_ok(&config_path, &["delete", &id]);
    let stdout = run_ok(&config_path, &["list"]);
    assert!(stdout.contains("Inbox is empty"));
    let show = run_ok(&config_path, &["show", &id]);
    assert!(show.contains("deleted:"));

    let (_, _, success) = run_dig(&config_path, &["retry", &id]);
    assert!(!success, "deleted items take no transitions");

    let stdout = run_ok(&config_path, &["delete", &id, "--purge"]);
    assert!(stdout.contains("Purged"));
    let (_, _, success) = run_dig(&config_path, &["show", &id]);
    assert!(!success);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();
    run_ok(&config_path, &["init"]);
    run_ok(&config_path, &["add", "barcode", "0724349532522"]);
    run_ok(&config_path, &["add", "quick", "Giant Steps", "Coltrane"]);
    run_ok(&config_path, &["scan"]);

    let stdout = run_ok(&config_path, &["stats"]);
    assert_eq!(field(&stdout, "Active:"), Some("2"));
    assert!(stdout.contains("NEEDS_REVIEW"));
    assert!(stdout.contains("waiting for review"));
}
