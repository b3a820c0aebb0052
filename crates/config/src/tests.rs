use camino::Utf8Path;
use keysync_ptree::config::DEFAULT_SPLIT_THRESHOLD;

use super::*;

fn home() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = Utf8Path::from_path(dir.path()).unwrap().to_owned();
    (dir, path)
}

#[test]
fn test_save_then_load() {
    let (_guard, home) = home();

    let peers = PeerDescriptor::parse_list("keys.example.org,11371,11370\n10.0.0.7,8080,8081")
        .unwrap();

    let mut config = ConfigFile::new(
        ReconConfig::new("127.0.0.1:11370".parse().unwrap(), peers.clone()),
        TreeConfig::default(),
        DataStoreConfig::new("data".into()),
    );
    config.sync.interval = Duration::from_secs(42);

    assert!(!ConfigFile::exists(&home));
    config.save(&home).unwrap();
    assert!(ConfigFile::exists(&home));

    let loaded = ConfigFile::load(&home).unwrap();

    assert_eq!(loaded.recon.external_peers, peers);
    assert_eq!(loaded.recon.listen, config.recon.listen);
    assert_eq!(loaded.tree, TreeConfig::default());
    assert_eq!(loaded.sync, config.sync);
    assert_eq!(loaded.datastore.path, "data");
}

#[test]
fn test_minimal_file_uses_defaults() {
    let (_guard, home) = home();

    write(
        home.join(CONFIG_FILE),
        r#"
[recon]
listen = "0.0.0.0:11370"

[datastore]
path = "data"
"#,
    )
    .unwrap();

    let config = ConfigFile::load(&home).unwrap();

    assert!(config.recon.external_peers.is_empty());
    assert_eq!(config.tree.split_threshold, DEFAULT_SPLIT_THRESHOLD);
    assert_eq!(config.sync, SyncConfig::default());
    assert_eq!(
        config.metrics.listen.map(|addr| addr.port()),
        Some(DEFAULT_METRICS_PORT)
    );
}

#[test]
fn test_durations_are_milliseconds() {
    let (_guard, home) = home();

    write(
        home.join(CONFIG_FILE),
        r#"
[recon]
listen = "0.0.0.0:11370"

[sync]
interval_ms = 1500
max_attempts = 5

[datastore]
path = "data"
"#,
    )
    .unwrap();

    let config = ConfigFile::load(&home).unwrap();
    let coordinator = CoordinatorConfig::from(config.sync);

    assert_eq!(coordinator.interval, Duration::from_millis(1500));
    assert_eq!(coordinator.max_attempts, 5);
    assert_eq!(
        coordinator.session_timeout,
        CoordinatorConfig::default().session_timeout
    );
}

#[test]
fn test_invalid_peer_line_is_rejected() {
    let (_guard, home) = home();

    write(
        home.join(CONFIG_FILE),
        r#"
[recon]
listen = "0.0.0.0:11370"
external_peers = """
keys.example.org,11371,11370
broken-entry
"""

[datastore]
path = "data"
"#,
    )
    .unwrap();

    let err = ConfigFile::load(&home).unwrap_err();

    assert!(format!("{err:?}").contains("broken-entry"), "{err:?}");
}

#[test]
fn test_invalid_tree_parameters_are_rejected() {
    let (_guard, home) = home();

    write(
        home.join(CONFIG_FILE),
        r#"
[recon]
listen = "0.0.0.0:11370"

[tree]
bit_quantum = 9

[datastore]
path = "data"
"#,
    )
    .unwrap();

    assert!(ConfigFile::load(&home).is_err());
}

#[test]
fn test_missing_file() {
    let (_guard, home) = home();

    assert!(ConfigFile::load(&home).is_err());
}
