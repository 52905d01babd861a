use std::io;
use std::path::PathBuf;

use ssh2::ErrorCode;
use thiserror::Error;

/// Failure to establish or keep the SSH session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not resolve {addr}")]
    Resolve {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("could not connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("SSH handshake with {addr} failed")]
    Handshake {
        addr: String,
        #[source]
        source: ssh2::Error,
    },
    #[error("server did not present a host key")]
    HostKeyUnavailable,
    #[error("host {host}:{port} is not listed in {known_hosts}")]
    UnknownHost {
        host: String,
        port: u16,
        known_hosts: PathBuf,
    },
    #[error("host key for {host}:{port} does not match {known_hosts}")]
    HostKeyMismatch {
        host: String,
        port: u16,
        known_hosts: PathBuf,
    },
    #[error("host key check for {host}:{port} failed")]
    HostKeyCheck { host: String, port: u16 },
    #[error("could not load known hosts from {known_hosts}")]
    KnownHosts {
        known_hosts: PathBuf,
        #[source]
        source: ssh2::Error,
    },
    #[error("could not read identity {path}")]
    Identity {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("authentication failed for user {username}")]
    Authentication {
        username: String,
        #[source]
        source: Option<ssh2::Error>,
    },
    #[error("could not open SFTP channel")]
    Channel(#[source] ssh2::Error),
    #[error("session failure during {op}")]
    Session {
        op: &'static str,
        #[source]
        source: ssh2::Error,
    },
}

/// The server, or the local side of a transfer, rejected a file operation.
#[derive(Debug, Error)]
pub enum SftpOperationError {
    #[error("{op} {path} rejected by server")]
    Rejected {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: ssh2::Error,
    },
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    #[error("local file {path}")]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("transfer {from} -> {to} interrupted")]
    Transfer {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Sftp(#[from] SftpOperationError),
    #[error("{0}")]
    Precondition(&'static str),
    #[error("could not write to stdout")]
    Output(#[source] io::Error),
}

impl ClientError {
    /// Splits a libssh2 error raised by a file operation into a server-side
    /// rejection (SFTP status codes) or a session failure (everything else).
    pub fn from_sftp(op: &'static str, path: impl Into<PathBuf>, err: ssh2::Error) -> Self {
        match err.code() {
            ErrorCode::SFTP(_) => SftpOperationError::Rejected {
                op,
                path: path.into(),
                source: err,
            }
            .into(),
            ErrorCode::Session(_) => TransportError::Session { op, source: err }.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Transport(_) => 3,
            ClientError::Sftp(_) => 4,
            ClientError::Precondition(_) => 70,
            ClientError::Output(_) => 74,
        }
    }
}
