//! 命令行集成测试

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "PAGE_TRANSLATOR_API_ENDPOINT",
    "PAGE_TRANSLATOR_API_KEY",
    "PAGE_TRANSLATOR_MODEL",
    "PAGE_TRANSLATOR_MAX_CONCURRENT",
    "PAGE_TRANSLATOR_REQUEST_TIMEOUT",
    "PAGE_TRANSLATOR_CACHE_CAPACITY",
    "PAGE_TRANSLATOR_CACHE_TTL",
    "PAGE_TRANSLATOR_LOG_LEVEL",
    "RUST_LOG",
];

/// 在临时目录中运行，不读取外部配置
fn translator_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("page-translator").expect("binary should be built");
    cmd.current_dir(dir).env("HOME", dir);
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

fn write_page(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("page.html");
    fs::write(
        &path,
        format!("<!DOCTYPE html><html><head><title>T</title></head><body>{}</body></html>", body),
    )
    .expect("page should be written");
    path
}

#[test]
fn test_help_lists_options() {
    let tmp = TempDir::new().expect("temp dir");
    let output = translator_cmd(tmp.path())
        .arg("--help")
        .output()
        .expect("command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("--mode"));
    assert!(stdout.contains("--lang"));
    assert!(stdout.contains("--timeout"));
}

#[test]
fn test_env_help_lists_variables() {
    let tmp = TempDir::new().expect("temp dir");
    let output = translator_cmd(tmp.path())
        .arg("--env-help")
        .output()
        .expect("command should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("PAGE_TRANSLATOR_API_KEY"));
    assert!(stdout.contains("PAGE_TRANSLATOR_CACHE_TTL"));
}

#[test]
fn test_page_without_text_needs_no_service() {
    let tmp = TempDir::new().expect("temp dir");
    let input = write_page(tmp.path(), "<script>var x = 1;</script><p>1</p>");
    let out = tmp.path().join("out.html");

    let output = translator_cmd(tmp.path())
        .arg(&input)
        .arg("--output")
        .arg(&out)
        .output()
        .expect("command should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let written = fs::read_to_string(&out).expect("output should exist");
    assert!(written.contains("var x = 1;"));
    assert!(written.contains("<p>1</p>"));
}

#[test]
fn test_missing_service_config_fails() {
    let tmp = TempDir::new().expect("temp dir");
    let input = write_page(tmp.path(), "<p>Bonjour tout le monde</p>");

    let output = translator_cmd(tmp.path())
        .arg(&input)
        .args(["--mode", "replace", "--lang", "en"])
        .output()
        .expect("command should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ConfigError"), "stderr: {}", stderr);
}

#[test]
fn test_unreachable_service_keeps_original_text() {
    let tmp = TempDir::new().expect("temp dir");
    let input = write_page(tmp.path(), "<p>Bonjour tout le monde</p>");
    let config = tmp.path().join("custom.toml");
    fs::write(
        &config,
        "api_endpoint = \"http://127.0.0.1:1/v1/chat/completions\"\n\
         api_key = \"sk-test\"\n\
         model = \"test-model\"\n\
         request_timeout_secs = 5\n",
    )
    .expect("config should be written");

    let output = translator_cmd(tmp.path())
        .arg(&input)
        .arg("--config")
        .arg(&config)
        .args(["--mode", "compare", "--url", "https://example.com/page"])
        .output()
        .expect("command should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("<p>Bonjour tout le monde</p>"));
    assert!(!stdout.contains("ai-translation-container"));
}

#[test]
fn test_unknown_mode_is_rejected() {
    let tmp = TempDir::new().expect("temp dir");
    let input = write_page(tmp.path(), "<p>Bonjour</p>");

    let output = translator_cmd(tmp.path())
        .arg(&input)
        .args(["--mode", "sideways"])
        .output()
        .expect("command should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sideways"), "stderr: {}", stderr);
}

#[test]
fn test_unknown_encoding_is_rejected() {
    let tmp = TempDir::new().expect("temp dir");
    let input = write_page(tmp.path(), "<p>Bonjour</p>");

    let output = translator_cmd(tmp.path())
        .arg(&input)
        .args(["--encoding", "not-a-charset"])
        .output()
        .expect("command should run");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not-a-charset"), "stderr: {}", stderr);
}
