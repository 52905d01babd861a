use crate::config::{ClientConfig, HostKeyPolicy};
use crate::error::TransportError;
use log::{debug, info, warn};
use ssh2::{CheckResult, KnownHostFileKind, Session};
use std::fs;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 22;

/// Where to connect and as whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coordinates {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl Coordinates {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Coordinates {
            host: host.into(),
            port,
            username: username.into(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How the user proves who they are.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    /// Private key file, decrypted with `passphrase` when it is non-empty.
    Key { path: PathBuf, passphrase: String },
    Agent,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Password(_) => f.write_str("Password(..)"),
            Credential::Key { path, .. } => f.debug_struct("Key").field("path", path).finish_non_exhaustive(),
            Credential::Agent => f.write_str("Agent"),
        }
    }
}

/// Opens a TCP connection, runs the SSH handshake, checks the host key and
/// authenticates. On any failure after the handshake the session is
/// disconnected before the error is returned.
pub fn connect_ssh(
    coords: &Coordinates,
    credential: &Credential,
    cfg: &ClientConfig,
) -> Result<Session, TransportError> {
    let addr = coords.addr();
    let stream = connect_tcp(&addr, cfg.timeout())?;

    let mut sess = Session::new().map_err(|source| TransportError::Handshake {
        addr: addr.clone(),
        source,
    })?;
    if let Some(timeout) = cfg.timeout() {
        sess.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    }
    sess.set_tcp_stream(stream);
    sess.handshake().map_err(|source| TransportError::Handshake {
        addr: addr.clone(),
        source,
    })?;
    debug!("SSH handshake with {} complete", addr);

    let checked = verify_host_key(&sess, coords, &cfg.host_key)
        .and_then(|()| authenticate(&sess, &coords.username, credential));
    if let Err(e) = checked {
        disconnect(&sess, "authentication failed");
        return Err(e);
    }
    info!("authenticated to {} as {}", addr, coords.username);
    Ok(sess)
}

/// Resolves `addr` and connects to the first address that accepts.
fn connect_tcp(addr: &str, timeout: Option<Duration>) -> Result<TcpStream, TransportError> {
    let candidates: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    let mut last_err = None;
    for candidate in candidates {
        let attempt = match timeout {
            Some(t) => TcpStream::connect_timeout(&candidate, t),
            None => TcpStream::connect(candidate),
        };
        match attempt {
            Ok(stream) => {
                if let Some(t) = timeout {
                    let _ = stream.set_read_timeout(Some(t));
                    let _ = stream.set_write_timeout(Some(t));
                }
                debug!("TCP connected to {}", candidate);
                return Ok(stream);
            }
            Err(e) => {
                debug!("TCP connect to {} failed: {}", candidate, e);
                last_err = Some(e);
            }
        }
    }

    let source = last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    });
    Err(TransportError::Connect {
        addr: addr.to_string(),
        source,
    })
}

fn verify_host_key(sess: &Session, coords: &Coordinates, policy: &HostKeyPolicy) -> Result<(), TransportError> {
    let known_hosts = match policy {
        HostKeyPolicy::AcceptAny => {
            debug!("host key of {} accepted without verification", coords.addr());
            return Ok(());
        }
        HostKeyPolicy::KnownHosts { known_hosts } => known_hosts,
    };

    let kh_error = |source| TransportError::KnownHosts {
        known_hosts: known_hosts.clone(),
        source,
    };
    let mut kh = sess.known_hosts().map_err(kh_error)?;
    kh.read_file(known_hosts, KnownHostFileKind::OpenSSH)
        .map_err(kh_error)?;
    let (key, _) = sess.host_key().ok_or(TransportError::HostKeyUnavailable)?;

    match kh.check_port(&coords.host, coords.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(TransportError::UnknownHost {
            host: coords.host.clone(),
            port: coords.port,
            known_hosts: known_hosts.clone(),
        }),
        CheckResult::Mismatch => Err(TransportError::HostKeyMismatch {
            host: coords.host.clone(),
            port: coords.port,
            known_hosts: known_hosts.clone(),
        }),
        CheckResult::Failure => Err(TransportError::HostKeyCheck {
            host: coords.host.clone(),
            port: coords.port,
        }),
    }
}

fn authenticate(sess: &Session, username: &str, credential: &Credential) -> Result<(), TransportError> {
    let rejected = |source| TransportError::Authentication {
        username: username.to_string(),
        source: Some(source),
    };

    match credential {
        Credential::Password(password) => {
            sess.userauth_password(username, password).map_err(rejected)?;
        }
        Credential::Key { path, passphrase } => {
            check_identity(path)?;
            let passphrase = Some(passphrase.as_str()).filter(|p| !p.is_empty());
            sess.userauth_pubkey_file(username, None, path, passphrase)
                .map_err(rejected)?;
        }
        Credential::Agent => {
            sess.userauth_agent(username).map_err(rejected)?;
        }
    }

    if !sess.authenticated() {
        return Err(TransportError::Authentication {
            username: username.to_string(),
            source: None,
        });
    }
    Ok(())
}

fn check_identity(path: &Path) -> Result<(), TransportError> {
    fs::metadata(path)
        .map(|_| ())
        .map_err(|source| TransportError::Identity {
            path: path.to_path_buf(),
            source,
        })
}

/// Best-effort SSH disconnect; failures are only logged.
pub fn disconnect(sess: &Session, description: &str) {
    if let Err(e) = sess.disconnect(None, description, None) {
        warn!("SSH disconnect failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn credential_debug_hides_secrets() {
        let password = Credential::Password("hunter2".into());
        assert!(!format!("{:?}", password).contains("hunter2"));

        let key = Credential::Key {
            path: "/keys/id_rsa".into(),
            passphrase: "open sesame".into(),
        };
        let shown = format!("{:?}", key);
        assert!(shown.contains("/keys/id_rsa"));
        assert!(!shown.contains("open sesame"));
    }

    #[test]
    fn coordinates_addr() {
        let coords = Coordinates::new("example.test", DEFAULT_PORT, "alice");
        assert_eq!(coords.addr(), "example.test:22");
    }

    #[test]
    fn refused_connection_is_a_connect_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = connect_tcp(&format!("127.0.0.1:{}", port), Some(Duration::from_secs(2))).unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }), "{:?}", err);
    }

    #[test]
    fn unparseable_address_is_a_resolve_error() {
        let err = connect_tcp("no port here", None).unwrap_err();
        assert!(matches!(err, TransportError::Resolve { .. }), "{:?}", err);
    }

    #[test]
    fn missing_identity_is_reported_before_auth() {
        let dir = tempfile::tempdir().unwrap();
        let err = check_identity(&dir.path().join("id_missing")).unwrap_err();
        assert!(matches!(err, TransportError::Identity { .. }));
    }
}
