use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Client options read from an optional TOML file.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Connect, read/write and libssh2 blocking timeout in seconds.
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub host_key: HostKeyPolicy,
}

/// How the server's host key is checked after the handshake.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept whatever key the server presents (StrictHostKeyChecking=no).
    #[default]
    AcceptAny,
    /// Require a matching entry in an OpenSSH known_hosts file.
    KnownHosts { known_hosts: PathBuf },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ClientConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_means_accept_any_without_timeout() {
        let cfg: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.host_key, HostKeyPolicy::AcceptAny);
        assert_eq!(cfg.timeout(), None);
    }

    #[test]
    fn known_hosts_policy() {
        let cfg: ClientConfig = toml::from_str(
            r#"
            timeout_secs = 15

            [host_key]
            policy = "known-hosts"
            known_hosts = "/home/alice/.ssh/known_hosts"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(15)));
        assert_eq!(
            cfg.host_key,
            HostKeyPolicy::KnownHosts {
                known_hosts: PathBuf::from("/home/alice/.ssh/known_hosts")
            }
        );
    }

    #[test]
    fn zero_timeout_is_ignored() {
        let cfg: ClientConfig = toml::from_str("timeout_secs = 0").unwrap();
        assert_eq!(cfg.timeout(), None);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let res: Result<ClientConfig, _> = toml::from_str("[host_key]\npolicy = \"ask\"");
        assert!(res.is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_secs = 5").unwrap();
        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.timeout_secs, Some(5));
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(load_config(&missing), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "timeout_secs = \"soon\"").unwrap();
        assert!(matches!(load_config(&bad), Err(ConfigError::Parse { .. })));
    }
}
