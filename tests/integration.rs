use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn sage_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("sage");
    path
}

fn write_transcript(root: &Path, slug: &str, front_matter: &str, body: &str) {
    let dir = root.join(slug);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("transcript.md"),
        format!("---\n{front_matter}---\n\n## Transcript\n\n{body}\n"),
    )
    .unwrap();
}

/// Three-episode corpus with the default (disabled) embedding provider,
/// so every command here runs without network access.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let episodes = root.join("episodes");
    fs::create_dir_all(&episodes).unwrap();

    write_transcript(
        &episodes,
        "scaling-sales",
        "title: Scaling Sales\nguest: Jane Doe\nview_count: 5000\nduration_seconds: 4000\n",
        "Jane Doe (0:01): Hire two reps at a time so you can compare them.\n\nHost (0:40): When does that break down?\n\nJane Doe (1:15): Past twenty reps you need a dedicated enablement function.",
    );
    write_transcript(
        &episodes,
        "founder-mode",
        "title: Founder Mode\nguest: John Roe\nview_count: 9000\nduration_seconds: 2000\n",
        "John Roe (0:05): Founders should stay close to the product far longer than conventional wisdom says.\n\nHost (0:50): How close is close?\n\nJohn Roe (1:30): Weekly design reviews, at minimum.",
    );
    write_transcript(
        &episodes,
        "board-meetings",
        "title: Board Meetings\nguest: Jane Doe and John Roe\nview_count: 100\n",
        "Jane Doe (0:02): Send the deck three days early.\n\nJohn Roe (0:45): And keep the meeting itself for discussion, not reporting.",
    );

    let config_content = format!(
        r#"[database]
path = "{}/data/podsage.db"

[transcripts]
root = "{}/episodes"

[server]
bind = "127.0.0.1:8817"
"#,
        root.display(),
        root.display()
    );

    let config_path = root.join("podsage.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_sage(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = sage_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run sage binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_sage(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_sage(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_sage(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_counts() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    let (stdout, stderr, success) = run_sage(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("transcripts found: 3"));
    assert!(stdout.contains("episodes ingested: 3"));
    assert!(stdout.contains("chunks written: 3"));
    assert!(stdout.contains("guest links added: 4"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_ingest_idempotent_no_rewrites() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    let (stdout1, _, _) = run_sage(&config_path, &["ingest"]);
    assert!(stdout1.contains("chunks written: 3"));

    // Second pass over the unchanged corpus touches nothing.
    let (stdout2, _, _) = run_sage(&config_path, &["ingest"]);
    assert!(stdout2.contains("chunks written: 0"), "got: {}", stdout2);
    assert!(stdout2.contains("chunks unchanged: 3"));
    assert!(stdout2.contains("guest links added: 0"));
    assert!(stdout2.contains("guest links removed: 0"));
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    let (stdout, _, success) = run_sage(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("transcripts found: 3"));
    assert!(stdout.contains("estimated chunks: 3"));

    // The catalog must still be empty.
    let (stats_out, _, _) = run_sage(&config_path, &["stats"]);
    assert!(stats_out.contains("Episodes:    0"), "got: {}", stats_out);
    drop(tmp);
}

#[test]
fn test_ingest_limit() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    let (stdout, _, success) = run_sage(&config_path, &["ingest", "--limit", "1"]);
    assert!(success);
    assert!(stdout.contains("episodes ingested: 1"));
}

#[test]
fn test_reingest_converges_after_shrink() {
    let (tmp, config_path) = setup_test_env();
    let episodes = tmp.path().join("episodes");

    // Section breaks force early chunk closes (the short trailing section
    // merges back), so this segments into two chunks. Then shrink to one
    // turn and replay.
    write_transcript(
        &episodes,
        "scaling-sales",
        "title: Scaling Sales\nguest: Jane Doe\nview_count: 5000\n",
        "Jane Doe (0:01): Hire two reps at a time so you can compare them.\n\n---\n\nJane Doe (1:15): Past twenty reps you need a dedicated enablement function.\n\n---\n\nJane Doe (2:30): Promote your first manager from the team.",
    );
    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (eps_out, _, _) = run_sage(&config_path, &["episodes", "--search", "Scaling"]);
    assert!(eps_out.contains("chunks: 2"), "got: {}", eps_out);

    write_transcript(
        &episodes,
        "scaling-sales",
        "title: Scaling Sales\nguest: Jane Doe\nview_count: 5000\n",
        "Jane Doe (0:01): Hire two reps at a time so you can compare them.",
    );
    let (stdout, _, success) = run_sage(&config_path, &["ingest"]);
    assert!(success, "re-ingest failed: {}", stdout);

    let (eps_out, _, _) = run_sage(&config_path, &["episodes", "--search", "Scaling"]);
    assert!(eps_out.contains("Scaling Sales"));
    assert!(eps_out.contains("chunks: 1"), "got: {}", eps_out);

    let (stats_out, _, _) = run_sage(&config_path, &["stats"]);
    assert!(stats_out.contains("Episodes:    3"));
    assert!(stats_out.contains("Chunks:      3"), "got: {}", stats_out);
}

#[test]
fn test_search_without_provider_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (_, stderr, success) = run_sage(&config_path, &["search", "pricing strategy"]);
    assert!(!success, "search should fail without an embedding provider");
    assert!(
        stderr.contains("requires embeddings"),
        "expected a configuration hint, got: {}",
        stderr
    );
}

#[test]
fn test_search_empty_query() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    let (stdout, _, success) = run_sage(&config_path, &["search", ""]);
    assert!(success, "Empty query should not panic");
    assert!(stdout.contains("No results"));
}

#[test]
fn test_episodes_sorted_by_views_by_default() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (stdout, _, success) = run_sage(&config_path, &["episodes"]);
    assert!(success);
    let founder = stdout.find("Founder Mode").expect("Founder Mode listed");
    let scaling = stdout.find("Scaling Sales").expect("Scaling Sales listed");
    let board = stdout.find("Board Meetings").expect("Board Meetings listed");
    assert!(founder < scaling && scaling < board, "got: {}", stdout);
}

#[test]
fn test_episodes_sorted_by_duration() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (stdout, _, _) = run_sage(&config_path, &["episodes", "--sort", "duration"]);
    let scaling = stdout.find("Scaling Sales").unwrap();
    let founder = stdout.find("Founder Mode").unwrap();
    assert!(scaling < founder, "got: {}", stdout);
}

#[test]
fn test_episodes_guest_filter() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    // Substring match on the guest name, case-insensitive.
    let (stdout, _, success) = run_sage(&config_path, &["episodes", "--guest", "jane"]);
    assert!(success);
    assert!(stdout.contains("Scaling Sales"));
    assert!(stdout.contains("Board Meetings"));
    assert!(!stdout.contains("Founder Mode"), "got: {}", stdout);
}

#[test]
fn test_episodes_search_filter() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (stdout, _, _) = run_sage(&config_path, &["episodes", "--search", "Founder"]);
    assert!(stdout.contains("Founder Mode"));
    assert!(!stdout.contains("Scaling Sales"));
}

#[test]
fn test_episodes_unknown_sort_fails() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    let (_, stderr, success) = run_sage(&config_path, &["episodes", "--sort", "alphabetical"]);
    assert!(!success);
    assert!(stderr.contains("Unknown sort"), "got: {}", stderr);
}

#[test]
fn test_stats_reports_corpus_totals() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (stdout, _, success) = run_sage(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Guests:      2"));
    assert!(stdout.contains("Episodes:    3"));
    assert!(stdout.contains("Chunks:      3"));
    assert!(stdout.contains("Embedded:    0 / 3 (0%)"));
    assert!(stdout.contains("Jane Doe"));
    assert!(stdout.contains("Top episodes by views:"));
}

#[test]
fn test_embed_pending_requires_provider() {
    let (_tmp, config_path) = setup_test_env();

    run_sage(&config_path, &["init"]);
    run_sage(&config_path, &["ingest"]);

    let (_, stderr, success) = run_sage(&config_path, &["embed", "pending"]);
    assert!(!success);
    assert!(stderr.contains("disabled"), "got: {}", stderr);
}

#[test]
fn test_config_init_writes_starter_file() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("podsage.toml");

    let (stdout, _, success) = run_sage(&config_path, &["config-init"]);
    assert!(success, "config-init failed: {}", stdout);
    assert!(config_path.exists());
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[database]"));
    assert!(content.contains("[embedding]"));

    // A second run must not clobber the file.
    let (_, stderr, success2) = run_sage(&config_path, &["config-init"]);
    assert!(!success2);
    assert!(stderr.contains("Refusing to overwrite"), "got: {}", stderr);
}

#[test]
fn test_malformed_transcript_is_skipped() {
    let (tmp, config_path) = setup_test_env();

    // Empty transcript body next to the valid ones.
    let broken = tmp.path().join("episodes").join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(
        broken.join("transcript.md"),
        "---\ntitle: Broken\n---\n\n## Transcript\n\n",
    )
    .unwrap();

    run_sage(&config_path, &["init"]);
    let (stdout, stderr, success) = run_sage(&config_path, &["ingest"]);
    assert!(success, "ingest should survive one bad transcript");
    assert!(stdout.contains("episodes ingested: 3"));
    assert!(stdout.contains("episodes failed: 1"));
    assert!(stderr.contains("Warning: skipping"), "got: {}", stderr);
}
