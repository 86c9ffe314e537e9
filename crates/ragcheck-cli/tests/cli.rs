//! Integration tests for the ragcheck CLI binary.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ragcheck"))
        .args(args)
        .env_remove("RAGCHECK_CONCURRENCY")
        .env_remove("RAGCHECK_ITEM_TIMEOUT_MS")
        .env_remove("RAGCHECK_DEADLINE_MS")
        .output()
        .expect("Failed to execute ragcheck CLI")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

const DATASET: &str = r#"{
    "name": "faq",
    "description": "support questions",
    "items": [
        { "query": "refund window?", "relevant_ids": ["policy-7"], "expected_answer": "refunds within 30 days" },
        { "query": "who approves?", "relevant_ids": ["faq-2"], "expected_answer": "the support lead approves" }
    ]
}"#;

fn write(dir: &TempDir, name: &str, contents: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn help_lists_commands() {
    let output = run_cli(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("score"));
    assert!(stdout.contains("run"));
}

#[test]
fn score_prints_all_metrics() {
    let output = run_cli(&[
        "score",
        "--generated",
        "the cat sat on the mat",
        "--expected",
        "the cat sat on the mat",
        "--retrieved",
        "d3,d1,d4",
        "--relevant",
        "d1,d2",
    ]);
    assert!(output.status.success());

    let scores = stdout_json(&output);
    assert_eq!(scores["bleu"], 1.0);
    assert_eq!(scores["rouge1"], 1.0);
    assert_eq!(scores["rouge2"], 1.0);
    assert_eq!(scores["rougeL"], 1.0);
    assert_eq!(scores["recall"], 0.5);
    assert_eq!(scores["mrr"], 0.5);
}

#[test]
fn run_completes_and_writes_results() {
    let dir = TempDir::new().unwrap();
    let dataset = write(&dir, "dataset.json", DATASET);
    let outputs = write(
        &dir,
        "outputs.json",
        r#"{
            "refund window?": { "retrieved_ids": ["policy-7"], "generated_text": "refunds within 30 days" },
            "who approves?": { "retrieved_ids": ["faq-2", "faq-3"], "generated_text": "the support lead approves" }
        }"#,
    );
    let results_path = dir.path().join("results.json");

    let output = run_cli(&[
        "run",
        "--dataset",
        &dataset,
        "--outputs",
        &outputs,
        "--concurrency",
        "2",
        "--output",
        results_path.to_str().unwrap(),
    ]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let task = stdout_json(&output);
    assert_eq!(task["status"], "completed");
    assert_eq!(task["progress"], 100);
    assert_eq!(task["avg_metrics"]["recall"], 1.0);

    let artifact: Value =
        serde_json::from_str(&std::fs::read_to_string(Path::new(&results_path)).unwrap()).unwrap();
    let results = artifact["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(artifact["dataset"]["item_count"], 2);
    assert_eq!(artifact["counters"]["tasks_started"], 1);
    assert_eq!(artifact["counters"]["items_scored"], 2);
}

#[test]
fn run_with_failed_item_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let dataset = write(&dir, "dataset.json", DATASET);
    let outputs = write(
        &dir,
        "outputs.json",
        r#"{
            "refund window?": { "retrieved_ids": ["policy-7"], "generated_text": "refunds within 30 days" },
            "who approves?": { "error": "agent timed out" }
        }"#,
    );

    let output = run_cli(&["run", "--dataset", &dataset, "--outputs", &outputs]);
    assert!(!output.status.success());

    let task = stdout_json(&output);
    assert_eq!(task["status"], "failed");
    assert_eq!(task["error_summary"], "1 items failed");
    assert_eq!(task["succeeded_items"], 1);
}

#[test]
fn invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let dataset = write(&dir, "dataset.json", DATASET);
    let outputs = write(&dir, "outputs.json", "{}");
    let config = write(&dir, "engine.toml", "max_concurrency = 0\n");

    let output = run_cli(&[
        "run",
        "--dataset",
        &dataset,
        "--outputs",
        &outputs,
        "--config",
        &config,
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("engine config"), "{stderr}");
}

#[test]
fn blank_query_rejects_dataset() {
    let dir = TempDir::new().unwrap();
    let dataset = write(
        &dir,
        "dataset.json",
        r#"{ "name": "bad", "items": [ { "query": "  " } ] }"#,
    );
    let outputs = write(&dir, "outputs.json", "{}");

    let output = run_cli(&["run", "--dataset", &dataset, "--outputs", &outputs]);
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
