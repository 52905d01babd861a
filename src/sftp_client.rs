use crate::config::ClientConfig;
use crate::error::{ClientError, SftpOperationError, TransportError};
use crate::listing::DirectoryEntry;
use crate::ssh_client::{self, Coordinates, Credential, DEFAULT_PORT};
use log::{info, warn};
use ssh2::{ErrorCode, OpenFlags, OpenType, Session, Sftp};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const NOT_CONNECTED: &str = "connection is not available";
/// LIBSSH2_ERROR_FILE, returned by `readdir` once a directory handle is exhausted.
const END_OF_DIRECTORY: i32 = -16;

/// An authenticated session with its SFTP channel. Dropping it shuts the
/// channel down and then disconnects the session.
struct Live {
    session: Session,
    sftp: Sftp,
    /// Remote working directory, set by `list_files`.
    cwd: Option<PathBuf>,
}

impl Live {
    fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        match &self.cwd {
            Some(cwd) => cwd.join(path),
            None => path.as_ref().to_path_buf(),
        }
    }
}

impl Drop for Live {
    fn drop(&mut self) {
        if let Err(e) = self.sftp.shutdown() {
            warn!("SFTP channel shutdown failed: {}", e);
        }
        ssh_client::disconnect(&self.session, "client closed");
        info!("SFTP session closed");
    }
}

enum Connection {
    Disconnected,
    Connected(Live),
    Closed,
}

/// A single SSH session carrying one SFTP channel.
///
/// `authenticate` moves the client from disconnected to connected; `close`
/// (or dropping the client) releases the channel and session. File
/// operations on a client that is not connected fail with
/// [`ClientError::Precondition`] without touching the network.
pub struct SftpClient {
    coords: Coordinates,
    config: ClientConfig,
    conn: Connection,
    out: Box<dyn Write>,
}

impl SftpClient {
    /// Creates a disconnected client; status lines go to stdout.
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        SftpClient {
            coords: Coordinates::new(host, port, username),
            config: ClientConfig::default(),
            conn: Connection::Disconnected,
            out: Box::new(io::stdout()),
        }
    }

    /// Same as [`SftpClient::new`] on port 22.
    #[allow(dead_code)]
    pub fn with_default_port(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self::new(host, DEFAULT_PORT, username)
    }

    /// Replaces the default timeout and host key settings.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sends listing and status lines to `out` instead of stdout.
    #[allow(dead_code)]
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    /// Host, port and user this client connects with.
    pub fn coordinates(&self) -> &Coordinates {
        &self.coords
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.conn, Connection::Connected(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.conn, Connection::Closed)
    }

    /// Remote working directory, once a listing has changed into one.
    pub fn cwd(&self) -> Option<&Path> {
        match &self.conn {
            Connection::Connected(live) => live.cwd.as_deref(),
            _ => None,
        }
    }

    /// Logs in with a password.
    pub fn auth_password(&mut self, password: &str) -> Result<(), ClientError> {
        self.authenticate(&Credential::Password(password.to_string()))
    }

    /// Logs in with a private key file.
    pub fn auth_key(&mut self, key_path: impl AsRef<Path>, passphrase: &str) -> Result<(), ClientError> {
        self.authenticate(&Credential::Key {
            path: key_path.as_ref().to_path_buf(),
            passphrase: passphrase.to_string(),
        })
    }

    /// Logs in with an identity held by the running ssh-agent.
    pub fn auth_agent(&mut self) -> Result<(), ClientError> {
        self.authenticate(&Credential::Agent)
    }

    /// Connects, authenticates and opens the SFTP channel. Nothing is kept
    /// unless every step succeeds.
    pub fn authenticate(&mut self, credential: &Credential) -> Result<(), ClientError> {
        match self.conn {
            Connection::Disconnected => {}
            Connection::Connected(_) => return Err(ClientError::Precondition("already authenticated")),
            Connection::Closed => return Err(ClientError::Precondition("client is closed")),
        }

        let session = ssh_client::connect_ssh(&self.coords, credential, &self.config)?;
        let sftp = match session.sftp() {
            Ok(sftp) => sftp,
            Err(e) => {
                ssh_client::disconnect(&session, "SFTP subsystem unavailable");
                return Err(TransportError::Channel(e).into());
            }
        };
        info!("SFTP channel open on {}", self.coords.addr());

        self.conn = Connection::Connected(Live {
            session,
            sftp,
            cwd: None,
        });
        Ok(())
    }

    /// Changes into `remote_dir` and prints one line per entry, in server
    /// order. The new working directory is kept for later relative paths.
    pub fn list_files(&mut self, remote_dir: &str) -> Result<Vec<DirectoryEntry>, ClientError> {
        let (live, out) = self.live()?;
        emit(out, &listing_status(remote_dir))?;

        let target = live.resolve(remote_dir);
        let dir = live
            .sftp
            .realpath(&target)
            .map_err(|e| ClientError::from_sftp("cd", &target, e))?;
        let stat = live
            .sftp
            .stat(&dir)
            .map_err(|e| ClientError::from_sftp("cd", &dir, e))?;
        if !stat.is_dir() {
            return Err(SftpOperationError::NotADirectory(dir).into());
        }
        live.cwd = Some(dir.clone());

        // raw handle reads keep `.` and `..`, which `Sftp::readdir` filters out
        let mut handle = live
            .sftp
            .opendir(&dir)
            .map_err(|e| ClientError::from_sftp("list", &dir, e))?;
        let mut entries = Vec::new();
        loop {
            match handle.readdir() {
                Ok((name, stat)) => {
                    let entry = DirectoryEntry::from_stat(&name, &stat);
                    emit(out, &entry.to_string())?;
                    entries.push(entry);
                }
                Err(e) if matches!(e.code(), ErrorCode::Session(END_OF_DIRECTORY)) => break,
                Err(e) => return Err(ClientError::from_sftp("list", &dir, e)),
            }
        }
        Ok(entries)
    }

    /// Copies a local file to `remote_path`, replacing any existing file.
    pub fn upload_file(&mut self, local_path: impl AsRef<Path>, remote_path: impl AsRef<Path>) -> Result<(), ClientError> {
        let (local_path, remote_path) = (local_path.as_ref(), remote_path.as_ref());
        let (live, out) = self.live()?;
        emit(out, &upload_status(local_path, remote_path))?;

        let mut local_file = File::open(local_path).map_err(|source| SftpOperationError::Local {
            path: local_path.to_path_buf(),
            source,
        })?;

        let target = live.resolve(remote_path);
        let flags = OpenFlags::CREATE | OpenFlags::WRITE | OpenFlags::TRUNCATE;
        let mut remote_file = live
            .sftp
            .open_mode(&target, flags, 0o644, OpenType::File)
            .map_err(|e| ClientError::from_sftp("upload", &target, e))?;

        io::copy(&mut local_file, &mut remote_file).map_err(|source| SftpOperationError::Transfer {
            from: local_path.to_path_buf(),
            to: target.clone(),
            source,
        })?;
        Ok(())
    }

    /// Copies `remote_file` to `local_path`, replacing any existing file.
    pub fn download_file(&mut self, remote_file: impl AsRef<Path>, local_path: impl AsRef<Path>) -> Result<(), ClientError> {
        let (remote_file, local_path) = (remote_file.as_ref(), local_path.as_ref());
        let (live, out) = self.live()?;
        emit(out, &download_status(remote_file, local_path))?;

        let source_path = live.resolve(remote_file);
        let mut remote = live
            .sftp
            .open(&source_path)
            .map_err(|e| ClientError::from_sftp("download", &source_path, e))?;
        // created only once the remote side is known to be readable
        let mut local = File::create(local_path).map_err(|source| SftpOperationError::Local {
            path: local_path.to_path_buf(),
            source,
        })?;

        io::copy(&mut remote, &mut local).map_err(|source| SftpOperationError::Transfer {
            from: source_path.clone(),
            to: local_path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Removes a remote file. Directories are rejected by the server.
    pub fn delete(&mut self, remote_file: impl AsRef<Path>) -> Result<(), ClientError> {
        let remote_file = remote_file.as_ref();
        let (live, out) = self.live()?;
        emit(out, &delete_status(remote_file))?;

        let target = live.resolve(remote_file);
        live.sftp
            .unlink(&target)
            .map_err(|e| ClientError::from_sftp("delete", &target, e))
    }

    /// Releases the channel and session. Safe to call in any state, any
    /// number of times.
    pub fn close(&mut self) {
        if self.is_connected() {
            info!("closing connection to {}", self.coords.addr());
        }
        self.conn = Connection::Closed;
    }

    /// The live connection and the output sink, or the precondition error.
    fn live(&mut self) -> Result<(&mut Live, &mut dyn Write), ClientError> {
        match &mut self.conn {
            Connection::Connected(live) => Ok((live, self.out.as_mut())),
            _ => Err(ClientError::Precondition(NOT_CONNECTED)),
        }
    }
}

fn listing_status(remote_dir: &str) -> String {
    format!("Listing [{}]...", remote_dir)
}

fn upload_status(local_path: &Path, remote_path: &Path) -> String {
    format!("Uploading [{}] to [{}]...", local_path.display(), remote_path.display())
}

fn download_status(remote_file: &Path, local_path: &Path) -> String {
    format!("Downloading [{}] to [{}]...", remote_file.display(), local_path.display())
}

fn delete_status(remote_file: &Path) -> String {
    format!("Deleting [{}]...", remote_file.display())
}

fn emit(out: &mut dyn Write, line: &str) -> Result<(), ClientError> {
    writeln!(out, "{}", line)
        .and_then(|()| out.flush())
        .map_err(ClientError::Output)
}
