mod byte_format;
mod config;
mod error;
mod listing;
mod logger;
mod sftp_client;
mod ssh_client;

use clap::Parser;
use config::ClientConfig;
use error::ClientError;
use log::debug;
use sftp_client::SftpClient;
use ssh_client::Credential;
use std::error::Error;
use std::path::PathBuf;
use std::process;

const LOCAL_FILE: &str = "./local.txt";
const DOWNLOAD_FILE: &str = "./download.txt";
const CONFIG_ERROR_EXIT: i32 = 5;

#[derive(Parser, Debug)]
#[command(
    name = "sftp-demo",
    version,
    about = "List, upload, download and delete a file on an SFTP server"
)]
struct Cli {
    /// Remote host
    host: String,
    /// Remote SSH port
    port: u16,
    /// Remote user
    username: String,
    /// Password, or the key passphrase when KEY_PATH is given
    #[arg(allow_hyphen_values = true)]
    password: String,
    /// Remote directory to work in
    base_dir: String,
    /// Private key file; selects key authentication when longer than one character
    key_path: Option<String>,
    /// TOML file with timeout and host key settings
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Authenticate through the running ssh-agent instead of a password
    #[arg(long)]
    agent: bool,
    /// Log more (repeat for debug output)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn credential(&self) -> Credential {
        match self.key_path.as_deref() {
            Some(key) if key.chars().count() > 1 => Credential::Key {
                path: PathBuf::from(key),
                passphrase: self.password.clone(),
            },
            _ if self.agent => Credential::Agent,
            _ => Credential::Password(self.password.clone()),
        }
    }
}

fn remote_file(base_dir: &str) -> String {
    format!("{}/remote.txt", base_dir)
}

/// Authenticate, then list, upload, download and delete in that order,
/// stopping at the first failure.
fn run(client: &mut SftpClient, credential: &Credential, base_dir: &str) -> Result<(), ClientError> {
    debug!("connecting to {} with {:?}", client.coordinates().addr(), credential);
    match credential {
        Credential::Password(password) => client.auth_password(password)?,
        Credential::Key { path, passphrase } => client.auth_key(path, passphrase)?,
        Credential::Agent => client.auth_agent()?,
    }

    let remote = remote_file(base_dir);
    client.list_files(base_dir)?;
    debug!("remote working directory: {:?}", client.cwd());
    client.upload_file(LOCAL_FILE, &remote)?;
    client.download_file(&remote, DOWNLOAD_FILE)?;
    client.delete(&remote)?;
    Ok(())
}

fn report(err: &dyn Error) {
    eprintln!("error: {}", err);
    let mut cause = err.source();
    while let Some(e) = cause {
        eprintln!("  caused by: {}", e);
        cause = e.source();
    }
}

fn main() {
    let cli = Cli::parse();
    logger::init_logger(cli.verbose);

    let cfg = match cli.config.as_deref() {
        Some(path) => config::load_config(path).unwrap_or_else(|e| {
            report(&e);
            process::exit(CONFIG_ERROR_EXIT);
        }),
        None => ClientConfig::default(),
    };

    let mut client = SftpClient::new(cli.host.as_str(), cli.port, cli.username.as_str()).with_config(cfg);
    let result = run(&mut client, &cli.credential(), &cli.base_dir);
    client.close();
    debug!("client closed: {}", client.is_closed());

    if let Err(e) = result {
        report(&e);
        process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("sftp-demo").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn five_positionals_use_password_auth() {
        let cli = parse(&["example.test", "22", "alice", "pw", "/inbox"]);
        assert_eq!(cli.host, "example.test");
        assert_eq!(cli.port, 22);
        assert_eq!(cli.base_dir, "/inbox");
        assert_eq!(cli.credential(), Credential::Password("pw".into()));
    }

    #[test]
    fn key_path_selects_key_auth_with_password_as_passphrase() {
        let cli = parse(&["example.test", "22", "alice", "passphrase", "/inbox", "/keys/id_rsa"]);
        assert_eq!(
            cli.credential(),
            Credential::Key {
                path: PathBuf::from("/keys/id_rsa"),
                passphrase: "passphrase".into(),
            }
        );
    }

    #[test]
    fn one_character_key_path_falls_back_to_password() {
        let cli = parse(&["example.test", "22", "alice", "pw", "/inbox", "-"]);
        assert_eq!(cli.credential(), Credential::Password("pw".into()));

        let cli = parse(&["example.test", "22", "alice", "pw", "/inbox", "k"]);
        assert_eq!(cli.credential(), Credential::Password("pw".into()));
    }

    #[test]
    fn agent_flag_applies_without_key_path() {
        let cli = parse(&["--agent", "example.test", "22", "alice", "", "/inbox"]);
        assert_eq!(cli.credential(), Credential::Agent);

        let cli = parse(&["--agent", "example.test", "22", "alice", "pw", "/inbox", "/keys/id_rsa"]);
        assert!(matches!(cli.credential(), Credential::Key { .. }));
    }

    #[test]
    fn options_parse() {
        let cli = parse(&["-vv", "--config", "client.toml", "h", "2222", "u", "p", "/b"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.config, Some(PathBuf::from("client.toml")));
        assert_eq!(cli.port, 2222);
    }

    #[test]
    fn bad_port_and_missing_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["sftp-demo", "h", "twenty-two", "u", "p", "/b"]).is_err());
        assert!(Cli::try_parse_from(["sftp-demo", "h", "22", "u", "p"]).is_err());
    }

    #[test]
    fn remote_path_is_base_plus_file_name() {
        assert_eq!(remote_file("/inbox"), "/inbox/remote.txt");
        assert_eq!(remote_file("."), "./remote.txt");
    }

    #[test]
    fn run_stops_at_failed_authentication() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut client = SftpClient::new("127.0.0.1", port, "alice").with_config(ClientConfig {
            timeout_secs: Some(5),
            ..ClientConfig::default()
        });
        let err = run(&mut client, &Credential::Password("WRONG".into()), "/inbox").unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        client.close();
        assert!(client.is_closed());
    }
}
