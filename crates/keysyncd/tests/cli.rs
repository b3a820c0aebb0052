//! Runs the `keysyncd` binary against a throwaway home directory.

use std::path::Path;
use std::process::{Command, Output};

fn keysyncd(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_keysyncd"))
        .arg("--home")
        .arg(home)
        .args(args)
        .env("RUST_LOG", "error")
        .output()
        .expect("failed to run keysyncd")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn test_commands_require_init() {
    let home = tempfile::tempdir().unwrap();

    let out = keysyncd(home.path(), &["list-blacklisted"]);

    assert!(!out.status.success());
    assert!(stderr(&out).contains("not initialized"), "{}", stderr(&out));
}

#[test]
fn test_init_rejects_bad_peer() {
    let home = tempfile::tempdir().unwrap();

    let out = keysyncd(home.path(), &["init", "--external-peer", "keys.example.org,11371"]);

    assert!(!out.status.success());
    assert!(!home.path().join("config.toml").exists());
}

#[test]
fn test_init_twice_needs_force() {
    let home = tempfile::tempdir().unwrap();

    assert!(keysyncd(home.path(), &["init"]).status.success());

    let again = keysyncd(home.path(), &["init"]);
    assert!(!again.status.success());
    assert!(stderr(&again).contains("--force"), "{}", stderr(&again));

    assert!(keysyncd(home.path(), &["init", "--force"]).status.success());
}

#[test]
fn test_blacklist_lifecycle() {
    let home = tempfile::tempdir().unwrap();

    let init = keysyncd(
        home.path(),
        &["init", "--external-peer", "keys.example.org,11371,11370"],
    );
    assert!(init.status.success(), "{}", stderr(&init));

    let config = std::fs::read_to_string(home.path().join("config.toml")).unwrap();
    assert!(config.contains("keys.example.org,11371,11370"), "{config}");

    let delete = keysyncd(
        home.path(),
        &[
            "blacklist-and-delete-key",
            "--fingerprints",
            "0123456789ABCDEF0123456789ABCDEF01234567, 89abcdef0123456789abcdef0123456789abcdef",
            "--ticket-id",
            "SEC-1042",
        ],
    );
    assert!(delete.status.success(), "{}", stderr(&delete));
    assert!(stdout(&delete).contains("deleted 0 key(s)"), "{}", stdout(&delete));

    let block = keysyncd(
        home.path(),
        &[
            "block-keys",
            "--fingerprints",
            "0123456789abcdef0123456789abcdef01234567",
            "--comment",
            "duplicate",
        ],
    );
    assert!(block.status.success(), "{}", stderr(&block));

    let list = keysyncd(home.path(), &["list-blacklisted"]);
    assert!(list.status.success(), "{}", stderr(&list));

    let listed = stdout(&list);
    let lines = listed.lines().collect::<Vec<_>>();
    assert_eq!(lines.len(), 2, "{listed}");
    assert!(lines.contains(&"0123456789abcdef0123456789abcdef01234567\tSEC-1042"), "{listed}");
    assert!(lines.contains(&"89abcdef0123456789abcdef0123456789abcdef\tSEC-1042"), "{listed}");
}

#[test]
fn test_invalid_fingerprint_rejects_whole_list() {
    let home = tempfile::tempdir().unwrap();
    assert!(keysyncd(home.path(), &["init"]).status.success());

    let out = keysyncd(
        home.path(),
        &[
            "blacklist-and-delete-key",
            "--fingerprints",
            "0123456789abcdef0123456789abcdef01234567,not-a-fingerprint",
            "--ticket-id",
            "SEC-1",
        ],
    );
    assert!(!out.status.success());

    let list = keysyncd(home.path(), &["list-blacklisted"]);
    assert!(stdout(&list).is_empty(), "{}", stdout(&list));
}

#[test]
fn test_rebuild_after_changing_tree_parameters() {
    let home = tempfile::tempdir().unwrap();
    assert!(keysyncd(home.path(), &["init"]).status.success());

    let rebuild = keysyncd(home.path(), &["rebuild-prefix-tree"]);
    assert!(rebuild.status.success(), "{}", stderr(&rebuild));
    assert_eq!(stdout(&rebuild).trim(), "0");

    assert!(keysyncd(home.path(), &["init", "--force", "--split-threshold", "80"])
        .status
        .success());

    let stale = keysyncd(home.path(), &["list-blacklisted"]);
    assert!(!stale.status.success());
    assert!(stderr(&stale).contains("rebuild-prefix-tree"), "{}", stderr(&stale));

    let rebuild = keysyncd(home.path(), &["rebuild-prefix-tree"]);
    assert!(rebuild.status.success(), "{}", stderr(&rebuild));

    assert!(keysyncd(home.path(), &["list-blacklisted"]).status.success());
}
