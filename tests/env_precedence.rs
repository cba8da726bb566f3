use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

fn vzanalyze_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vzanalyze"));
    cmd.env("HOME", home);
    cmd.env_remove("VZANALYZE_CONFIG");
    cmd.env_remove("VZANALYZE_REPORT_FORMAT");
    cmd.env_remove("VZANALYZE_REPORT_INCLUDE_INFO");
    cmd.env_remove("VZANALYZE_REPORT_INCLUDE_SUPPORT");
    cmd.env_remove("VZANALYZE_REPORT_INCLUDE_ACTIONS");
    cmd.env_remove("VZANALYZE_REPORT_MIN_CONFIDENCE");
    cmd.env_remove("VZANALYZE_REPORT_MIN_IMPACT");
    cmd
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!("vzanalyze-env-test-{}-{seq}", std::process::id()));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, bytes).expect("write");
}

#[test]
fn env_overrides_config_file() {
    let home = make_temp_home();
    write_file(
        home.join(".config/vzanalyze/config.toml").as_path(),
        b"[report]\nformat = \"summary\"\ninclude_info = true\nmin_impact = 1\n",
    );

    let out = vzanalyze_cmd(&home)
        .env("VZANALYZE_REPORT_FORMAT", "detailed")
        .env("VZANALYZE_REPORT_INCLUDE_INFO", "off")
        .env("VZANALYZE_REPORT_MIN_IMPACT", "6")
        .args(["config", "--show", "--json"])
        .output()
        .expect("run vzanalyze");
    assert!(out.status.success());

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(v["report"]["format"], "detailed");
    assert_eq!(v["report"]["include_info"], false);
    assert_eq!(v["report"]["min_impact"], 6);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn env_config_path_is_used() {
    let home = make_temp_home();
    let cfg = home.join("elsewhere.toml");
    write_file(&cfg, b"[report]\ninclude_support = false\n");

    let out = vzanalyze_cmd(&home)
        .env("VZANALYZE_CONFIG", &cfg)
        .args(["config", "--show", "--json"])
        .output()
        .expect("run vzanalyze");
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(v["report"]["include_support"], false);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_env_boolean_exits_2() {
    let home = make_temp_home();
    let out = vzanalyze_cmd(&home)
        .env("VZANALYZE_REPORT_INCLUDE_ACTIONS", "sometimes")
        .args(["config", "--show"])
        .output()
        .expect("run vzanalyze");
    assert_eq!(out.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn flag_overrides_env_in_report() {
    let home = make_temp_home();
    let capture = home.join("capture");
    write_file(
        &capture.join("cluster-snapshot/ns1/pods.json"),
        br#"{"items":[{"metadata":{"name":"app-0","namespace":"ns1"},"status":{"phase":"Pending"}}]}"#,
    );

    // Env hides informational issues; the flag brings them back.
    let out = vzanalyze_cmd(&home)
        .env("VZANALYZE_REPORT_INCLUDE_INFO", "false")
        .args([
            "analyze",
            "--capture-dir",
            capture.to_str().expect("utf8"),
            "--include-info",
            "true",
        ])
        .output()
        .expect("run vzanalyze");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("ISSUE (PendingPods)"), "stdout: {stdout}");

    let out = vzanalyze_cmd(&home)
        .env("VZANALYZE_REPORT_INCLUDE_INFO", "false")
        .args(["analyze", "--capture-dir", capture.to_str().expect("utf8")])
        .output()
        .expect("run vzanalyze");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(!stdout.contains("PendingPods"), "stdout: {stdout}");
    assert!(stdout.contains("did not detect any issue"), "stdout: {stdout}");
    let _ = std::fs::remove_dir_all(&home);
}
