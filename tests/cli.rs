use assert_cmd::Command;
use predicates::prelude::*;

fn relay(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.arg("--config")
        .arg(config_dir.path().join("config.yaml"))
        .env_remove("YT_COOKIES")
        .env_remove("INSTA_COOKIES")
        .env_remove("RELAY_BOT_TOKEN");
    cmd
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("relay")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("dl"))
        .stdout(predicate::str::contains("adl"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_dl_without_url_is_an_error() {
    Command::cargo_bin("relay")
        .unwrap()
        .arg("dl")
        .assert()
        .failure()
        .stderr(predicate::str::contains("<URL>"));
}

#[test]
fn test_config_show_masks_secrets() {
    let dir = tempfile::tempdir().unwrap();

    relay(&dir)
        .args(["config", "--show"])
        .env("YT_COOKIES", "# Netscape HTTP Cookie File\nsupersecret")
        .assert()
        .success()
        .stdout(predicate::str::contains("Current Configuration"))
        .stdout(predicate::str::contains("YouTube Cookies: set (hidden)"))
        .stdout(predicate::str::contains("Instagram Cookies: not set"))
        .stdout(predicate::str::contains("supersecret").not());

    assert!(dir.path().join("config.yaml").exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.yaml"), "relay:\n  workers: 0\n").unwrap();

    relay(&dir)
        .args(["config", "--show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("relay.workers"));
}

#[test]
fn test_one_shot_rejects_malformed_url() {
    let dir = tempfile::tempdir().unwrap();

    relay(&dir)
        .args(["adl", "not-a-url"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid URL format"));
}

#[test]
fn test_serve_answers_usage_until_eof() {
    let dir = tempfile::tempdir().unwrap();

    relay(&dir)
        .arg("serve")
        .arg("--outbox")
        .arg(dir.path().join("outbox"))
        .write_stdin("5 /dl\nrandom chatter\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("[chat 5]"))
        .stdout(predicate::str::contains("Usage:"));
}
