use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "oracle-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn oracle() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_oracle"));
    cmd.env_remove("ORACLE_LLM_MODEL")
        .env_remove("ORACLE_LLM_TEMPERATURE");
    cmd
}

#[test]
fn cli_list_writes_output_file() {
    let output_path = temp_path("list");
    let status = oracle()
        .args(["list", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available readings"));
    assert!(content.contains("celtic-cross"));
}

#[test]
fn cli_spread_is_reproducible_across_runs() {
    let run = || {
        oracle()
            .args([
                "--device",
                "device42",
                "--date",
                "2024-01-01",
                "--format",
                "json",
                "spread",
                "three-card",
            ])
            .output()
            .expect("run cli")
    };
    let first = run();
    let second = run();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
    let value: serde_json::Value = serde_json::from_slice(&first.stdout).expect("json output");
    assert_eq!(value["cards"].as_array().map(Vec::len), Some(3));
}

#[test]
fn cli_ganzhi_prints_the_day() {
    let output = oracle()
        .args(["--date", "2024-02-10", "--format", "markdown", "ganzhi"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("甲辰"));
    assert!(stdout.contains("阳木"));
}

#[test]
fn cli_store_keeps_progress_between_runs() {
    let store = temp_path("store.json");
    let checkin = |date: &str| {
        oracle()
            .args(["--device", "phone", "--date", date, "--format", "json", "--store"])
            .arg(&store)
            .arg("checkin")
            .output()
            .expect("run cli")
    };
    assert!(checkin("2024-02-10").status.success());
    assert!(checkin("2024-02-11").status.success());

    let output = oracle()
        .args(["--device", "phone", "--format", "json", "--store"])
        .arg(&store)
        .arg("user")
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let record: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(record["checkinStreak"], 2);
    assert_eq!(record["checkinDays"].as_array().map(Vec::len), Some(2));
}

#[test]
fn cli_compat_sessions_span_processes() {
    let store = temp_path("compat.json");
    let opened = oracle()
        .args(["--device", "alice", "--format", "json", "--store"])
        .arg(&store)
        .args(["compat", "open", "love", "--code-seed", "5"])
        .output()
        .expect("run cli");
    assert!(opened.status.success());
    let opened: serde_json::Value = serde_json::from_slice(&opened.stdout).expect("json output");
    let code = opened["code"].as_str().expect("code").to_lowercase();

    let joined = oracle()
        .args(["--device", "bob", "--format", "json", "--store"])
        .arg(&store)
        .args(["compat", "join", &code])
        .output()
        .expect("run cli");
    assert!(joined.status.success());
    let joined: serde_json::Value = serde_json::from_slice(&joined.stdout).expect("json output");
    assert_eq!(joined["status"], "ready");

    let again = oracle()
        .args(["--device", "carol", "--store"])
        .arg(&store)
        .args(["compat", "join", &code])
        .output()
        .expect("run cli");
    assert!(!again.status.success());
    assert!(String::from_utf8_lossy(&again.stderr).contains("already has a second party"));
}

#[test]
fn cli_check_passes_and_reports_json() {
    let output = oracle()
        .args(["--format", "json", "check", "--seeds", "1337,device42", "--iterations", "3"])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    let results: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert!(results.as_array().is_some_and(|r| !r.is_empty()));
}

#[test]
fn cli_rejects_bad_dates() {
    let output = oracle()
        .args(["--date", "2024-02-30", "daily"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("2024-02-30"));
}
