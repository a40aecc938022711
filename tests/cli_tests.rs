use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

fn vaulted() -> Command {
    let mut cmd = Command::cargo_bin("vaulted").unwrap();
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn test_help() {
    vaulted()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Private file storage"));
}

#[test]
fn test_config_prints_defaults() {
    vaulted()
        .args(["--memory", "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[storage]"))
        .stdout(predicate::str::contains("cdn_url = \"https://cdn.testnet.cere.network\""));
}

#[test]
fn test_providers_lists_keystore() {
    vaulted()
        .args(["--memory", "providers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vaulted-keystore"))
        .stdout(predicate::str::contains("ephemeral"));
}

#[test]
fn test_upload_and_share() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("a.txt");
    file.write_str("0123456789").unwrap();

    vaulted()
        .args(["--memory", "upload", "--share"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(" 10 a.txt"))
        .stdout(predicate::str::contains("https://cdn.testnet.cere.network/1/"))
        .stdout(predicate::str::contains("?signature=0x"));
}

#[test]
fn test_upload_missing_file() {
    vaulted()
        .args(["--memory", "upload", "does-not-exist.txt"])
        .assert()
        .failure();
}

#[test]
fn test_keygen_writes_key() {
    let temp = assert_fs::TempDir::new().unwrap();

    vaulted()
        .args(["--memory", "keygen", "alice", "--dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::starts_with("0x"));

    temp.child("alice.key").assert(predicate::path::exists());

    vaulted()
        .args(["--memory", "keygen", "alice", "--dir"])
        .arg(temp.path())
        .assert()
        .failure();
}

#[test]
fn test_download_token_requires_signature() {
    vaulted()
        .args(["--memory", "download", "cid1", "--token", "temp-token-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--signature"));
}

#[test]
fn test_share_unknown_cid() {
    vaulted()
        .args(["--memory", "share", "bafyunknown"])
        .assert()
        .failure();
}

#[test]
fn test_status_without_bucket() {
    vaulted()
        .args(["--memory", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("account 0x"))
        .stdout(predicate::str::contains("bucket none"));
}

#[test]
fn test_bucket_command_creates_bucket() {
    vaulted()
        .args(["--memory", "bucket", "--deposit", "2"])
        .assert()
        .success()
        .stdout(predicate::str::diff("1\n"));
}
