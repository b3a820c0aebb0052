#[cfg(test)]
mod tests;

use core::net::{IpAddr, Ipv4Addr, SocketAddr};
use core::time::Duration;
use std::fs::{read_to_string, write};

use camino::{Utf8Path, Utf8PathBuf};
use eyre::{Result as EyreResult, WrapErr};
use keysync_node::config as defaults;
use keysync_node::SyncConfig as CoordinatorConfig;
use keysync_primitives::peer::DEFAULT_RECONCILIATION_PORT;
use keysync_primitives::PeerDescriptor;
use keysync_ptree::config::TreeConfig;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "config.toml";

/// Port the `/metrics` endpoint listens on by default.
pub const DEFAULT_METRICS_PORT: u16 = 9626;

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ConfigFile {
    pub recon: ReconConfig,

    #[serde(default)]
    pub tree: TreeConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    pub datastore: DataStoreConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct ReconConfig {
    pub listen: SocketAddr,

    /// Newline-separated `address,http_port,reconciliation_port` entries.
    #[serde(default, with = "serde_peers")]
    pub external_peers: Vec<PeerDescriptor>,
}

impl ReconConfig {
    #[must_use]
    pub const fn new(listen: SocketAddr, external_peers: Vec<PeerDescriptor>) -> Self {
        Self {
            listen,
            external_peers,
        }
    }
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self::new(
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_RECONCILIATION_PORT),
            Vec::new(),
        )
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    #[serde(rename = "interval_ms", with = "serde_duration")]
    pub interval: Duration,
    #[serde(rename = "session_timeout_ms", with = "serde_duration")]
    pub session_timeout: Duration,
    #[serde(rename = "call_timeout_ms", with = "serde_duration")]
    pub call_timeout: Duration,
    pub max_concurrent: usize,
    pub max_attempts: u32,
    #[serde(rename = "backoff_base_ms", with = "serde_duration")]
    pub backoff_base: Duration,
    #[serde(rename = "backoff_max_ms", with = "serde_duration")]
    pub backoff_max: Duration,
    pub fetch_batch_size: usize,
    #[serde(rename = "rebuild_timeout_ms", with = "serde_duration")]
    pub rebuild_timeout: Duration,
    /// Timeout of a single request to a peer's key interface.
    #[serde(rename = "fetch_timeout_ms", with = "serde_duration")]
    pub fetch_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let coordinator = CoordinatorConfig::default();

        Self {
            interval: coordinator.interval,
            session_timeout: coordinator.session_timeout,
            call_timeout: coordinator.call_timeout,
            max_concurrent: coordinator.max_concurrent,
            max_attempts: coordinator.max_attempts,
            backoff_base: coordinator.backoff_base,
            backoff_max: coordinator.backoff_max,
            fetch_batch_size: coordinator.fetch_batch_size,
            rebuild_timeout: coordinator.rebuild_timeout,
            fetch_timeout: Duration::from_secs(defaults::DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl From<SyncConfig> for CoordinatorConfig {
    fn from(config: SyncConfig) -> Self {
        Self {
            interval: config.interval,
            session_timeout: config.session_timeout,
            call_timeout: config.call_timeout,
            max_concurrent: config.max_concurrent,
            max_attempts: config.max_attempts,
            backoff_base: config.backoff_base,
            backoff_max: config.backoff_max,
            fetch_batch_size: config.fetch_batch_size,
            rebuild_timeout: config.rebuild_timeout,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct DataStoreConfig {
    /// Relative paths resolve against the home directory.
    pub path: Utf8PathBuf,
}

impl DataStoreConfig {
    #[must_use]
    pub const fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[non_exhaustive]
pub struct MetricsConfig {
    /// Disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen: Option<SocketAddr>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: Some(SocketAddr::new(
                IpAddr::V4(Ipv4Addr::LOCALHOST),
                DEFAULT_METRICS_PORT,
            )),
        }
    }
}

impl ConfigFile {
    #[must_use]
    pub fn new(recon: ReconConfig, tree: TreeConfig, datastore: DataStoreConfig) -> Self {
        Self {
            recon,
            tree,
            sync: SyncConfig::default(),
            datastore,
            metrics: MetricsConfig::default(),
        }
    }

    #[must_use]
    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(CONFIG_FILE).is_file()
    }

    pub fn load(dir: &Utf8Path) -> EyreResult<Self> {
        let path = dir.join(CONFIG_FILE);
        let content = read_to_string(&path)
            .wrap_err_with(|| format!("failed to read configuration from {path:?}"))?;

        let config: Self = toml::from_str(&content)
            .wrap_err_with(|| format!("invalid configuration in {path:?}"))?;

        let _params = config
            .tree
            .params()
            .wrap_err("invalid `tree` configuration")?;

        Ok(config)
    }

    pub fn save(&self, dir: &Utf8Path) -> EyreResult<()> {
        let path = dir.join(CONFIG_FILE);
        let content = toml::to_string_pretty(self)?;

        write(&path, content)
            .wrap_err_with(|| format!("failed to write configuration to {path:?}"))?;

        Ok(())
    }
}

mod serde_duration {
    use core::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod serde_peers {
    use keysync_primitives::PeerDescriptor;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(peers: &[PeerDescriptor], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&PeerDescriptor::format_list(peers))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<PeerDescriptor>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list = String::deserialize(deserializer)?;

        PeerDescriptor::parse_list(&list).map_err(D::Error::custom)
    }
}
