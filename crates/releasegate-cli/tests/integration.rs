#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use releasegate_core::audit::{AuditLog, RedbStore};
use releasegate_core::types::{DeployEvent, ResolvedCommit};
use tempfile::TempDir;

fn releasegate(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("releasegate").unwrap();
    cmd.current_dir(dir.path())
        .env("RELEASEGATE_CONFIG", dir.path().join("releasegate.yaml"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, extra: &str) {
    let yaml = format!(
        "access:\n  certs_url: https://team.example.com/cdn-cgi/access/certs\n  audience: aud-123\n{extra}"
    );
    std::fs::write(dir.path().join("releasegate.yaml"), yaml).unwrap();
}

fn seed_history(dir: &TempDir, entries: &[(&str, &str, &str)]) {
    let log = AuditLog::new(RedbStore::open(&dir.path().join("audit.redb")).unwrap());
    for (app, env, sha) in entries {
        let commit = ResolvedCommit {
            sha: sha.to_string(),
            message: "Fix bug".to_string(),
        };
        let event = DeployEvent::deploy(
            app,
            env,
            &commit,
            Some("ops@example.com"),
            200,
            &format!("release/{app}-dev"),
        );
        log.append(&event).unwrap();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

#[test]
fn validate_passes_with_access_settings() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "");
    releasegate(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[warning]"));
}

#[test]
fn validate_fails_without_audience() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("releasegate.yaml"), "cors:\n  allowed_origins: []\n").unwrap();
    releasegate(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("access.audience is not set"))
        .stderr(predicate::str::contains("config validation found errors"));
}

#[test]
fn hook_urls_come_from_environment() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "");
    let out = releasegate(&dir)
        .args(["--json", "config", "validate"])
        .env("HOOK_APP_A_DEV", "https://hooks.example.com/a-dev")
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(!stdout.contains("HOOK_APP_A_DEV"));
    assert!(stdout.contains("HOOK_APP_A_PROD"));
}

#[test]
fn show_never_prints_secrets() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "");
    releasegate(&dir)
        .args(["config", "show"])
        .env("GH_TOKEN", "ghp_secret_value")
        .env("HOOK_APP_A_DEV", "https://hooks.example.com/secret-path")
        .assert()
        .success()
        .stdout(predicate::str::contains("release/app-a-dev"))
        .stdout(predicate::str::contains("ghp_secret_value").not())
        .stdout(predicate::str::contains("secret-path").not());
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

#[test]
fn history_requires_audit_path() {
    let dir = TempDir::new().unwrap();
    write_config(&dir, "");
    releasegate(&dir)
        .args(["history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("audit.path is not set"));
}

#[test]
fn history_list_filters_and_clear_empties() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("audit.redb");
    write_config(&dir, &format!("audit:\n  path: {}\n", db.display()));
    seed_history(
        &dir,
        &[
            ("app-a", "dev", "aaaaaaa1111111111111111111111111111111aa"),
            ("app-b", "dev", "bbbbbbb2222222222222222222222222222222bb"),
        ],
    );

    releasegate(&dir)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("aaaaaaa"))
        .stdout(predicate::str::contains("bbbbbbb"));

    let out = releasegate(&dir)
        .args(["--json", "history", "list", "--app", "app-b"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let body: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["app"], "app-b");
    assert_eq!(events[0]["actor"], "ops@example.com");

    releasegate(&dir)
        .args(["history", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2 entries."));
    releasegate(&dir)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No deploys recorded."));
}
