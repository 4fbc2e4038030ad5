use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn support_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("support");
    path
}

fn write_config(root: &Path, docs_dir: &Path) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[docs]
dir = "{}"

[index]
path = "{}/data/index.json"

[chunking]
chunk_size = 400
overlap = 60

[retrieval]
k = 3

[logging]
level = "warn"
"#,
        docs_dir.display(),
        root.display()
    );

    let config_path = config_dir.join("support.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let docs_dir = root.join("docs");
    fs::create_dir_all(docs_dir.join("guides")).unwrap();
    fs::write(
        docs_dir.join("billing.md"),
        "# Billing FAQ\n\nInvoices are generated nightly and emailed to the account owner.\n\nRefunds take five business days.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("auth.md"),
        "# Login Help\n\nReset your password from the account settings page.\n\nTwo-factor codes expire after thirty seconds.",
    )
    .unwrap();
    fs::write(
        docs_dir.join("guides/deploy.markdown"),
        "# Deploy Guide\n\nProduction deploys run through the release pipeline every weekday.",
    )
    .unwrap();
    fs::write(docs_dir.join("notes.txt"), "Not documentation.").unwrap();

    let config_path = write_config(&root, &docs_dir);
    (tmp, config_path)
}

fn run_support(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = support_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run support binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_index_builds_then_loads() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_support(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("built (no index file)"), "stdout={}", stdout);
    assert!(stdout.contains("3 files"));

    let (stdout, _, success) = run_support(&config_path, &["index"]);
    assert!(success);
    assert!(stdout.contains("Index loaded"), "stdout={}", stdout);
    assert!(stdout.contains("3 files"));
}

#[test]
fn test_index_force_rebuilds() {
    let (_tmp, config_path) = setup_test_env();

    run_support(&config_path, &["index"]);
    let (stdout, _, success) = run_support(&config_path, &["index", "--force"]);
    assert!(success);
    assert!(stdout.contains("rebuilt (forced)"), "stdout={}", stdout);
}

#[test]
fn test_index_missing_docs_dir_is_empty() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), &tmp.path().join("no-such-dir"));

    let (stdout, stderr, success) = run_support(&config_path, &["index"]);
    assert!(success, "index failed: stderr={}", stderr);
    assert!(stdout.contains("0 files, 0 chunks"), "stdout={}", stdout);
}

#[test]
fn test_stats() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_support(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Index Stats"));
    assert!(stdout.contains("Files:       3"), "stdout={}", stdout);
    assert!(stdout.contains("Chunks:      3"), "stdout={}", stdout);
}

#[test]
fn test_search_billing_question() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_support(&config_path, &["search", "when are invoices generated"]);
    assert!(success, "search failed: stderr={}", stderr);
    let first = stdout.lines().next().unwrap_or_default();
    assert!(first.starts_with("1. ["), "stdout={}", stdout);
    assert!(first.contains("Billing FAQ"), "stdout={}", stdout);
    assert!(stdout.contains("billing.md"));
}

#[test]
fn test_search_deterministic() {
    let (_tmp, config_path) = setup_test_env();

    let (first, _, _) = run_support(&config_path, &["search", "account page"]);
    let (second, _, _) = run_support(&config_path, &["search", "account page"]);
    assert_eq!(first, second);
}

#[test]
fn test_search_respects_k() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_support(&config_path, &["search", "the account", "--k", "1"]);
    assert!(success);
    assert!(stdout.contains("1. ["));
    assert!(!stdout.contains("2. ["));
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_support(&config_path, &["search", "   "]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_search_unknown_terms_still_lists_passages() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_support(&config_path, &["search", "xylophone quasar"]);
    assert!(success);
    assert!(stdout.contains("1. [0.000]"), "stdout={}", stdout);
    assert!(!stdout.contains("No results."));
}

#[test]
fn test_search_empty_docs_dir_has_no_results() {
    let tmp = TempDir::new().unwrap();
    let docs_dir = tmp.path().join("docs");
    fs::create_dir_all(&docs_dir).unwrap();
    let config_path = write_config(tmp.path(), &docs_dir);

    let (stdout, _, success) = run_support(&config_path, &["search", "invoices"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_resolve_rejects_blank_query() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_support(&config_path, &["resolve", "  "]);
    assert!(!success);
    assert!(stderr.contains("query must not be empty"), "stderr={}", stderr);
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("bad.toml");
    fs::write(&config_path, "[chunking]\nchunk_size = 10\noverlap = 20\n").unwrap();

    let (_, stderr, success) = run_support(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr={}", stderr);
}
