use {
    crate::config::Prefer,
    clap::{Parser, Subcommand},
    std::path::PathBuf,
};

#[derive(Debug, Parser)]
#[command(name = "hoard", version, about = "Encrypted secrets manager with server sync")]
pub struct Cli {
    /// Config file (default: $HOME/.hoard.yaml)
    #[arg(long, env = "HOARD_CONFIG")]
    pub config: Option<PathBuf>,
    /// Local database file
    #[arg(long, env = "HOARD_DB")]
    pub db: Option<PathBuf>,
    /// Passphrase for encrypting secrets
    #[arg(long, env = "HOARD_PASSPHRASE")]
    pub passphrase: Option<String>,
    /// Sync server URL
    #[arg(long, env = "HOARD_SERVER")]
    pub server: Option<String>,
    /// Username on the sync server
    #[arg(long, env = "HOARD_USERNAME")]
    pub username: Option<String>,
    /// Password on the sync server
    #[arg(long, env = "HOARD_PASSWORD")]
    pub password: Option<String>,
    /// Accept invalid TLS certificates
    #[arg(long, env = "HOARD_INSECURE")]
    pub insecure: bool,
    /// Conflict resolution policy for sync
    #[arg(long, env = "HOARD_PREFER", value_enum)]
    pub prefer: Option<Prefer>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store a new secret
    #[command(subcommand)]
    Create(CreateCommand),
    /// Print a stored secret
    Show {
        name: String,
        /// Also write the secret body to this file
        #[arg(long)]
        target_file: Option<PathBuf>,
    },
    /// Delete a secret
    Delete { name: String },
    /// Register on the sync server
    Signup,
    /// Reconcile all secrets with the sync server
    Sync,
}

#[derive(Debug, Subcommand)]
pub enum CreateCommand {
    /// A text note
    Text {
        name: String,
        value: String,
        #[arg(short, long, value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,
    },
    /// The contents of a file
    Binary {
        name: String,
        file: PathBuf,
        #[arg(short, long, value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,
    },
    /// A username and password pair
    Password {
        name: String,
        username: String,
        password: String,
        #[arg(short, long, value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,
    },
    /// A payment card
    Card {
        name: String,
        number: String,
        expiry: String,
        cvv: String,
        username: Option<String>,
        #[arg(short, long, value_parser = parse_metadata)]
        metadata: Vec<(String, String)>,
    },
}

fn parse_metadata(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_text_with_metadata() {
        let cli = Cli::try_parse_from([
            "hoard", "create", "text", "note1", "secret", "-m", "site=example.com", "--metadata",
            "tag=work",
        ])
        .unwrap();
        match cli.command {
            Command::Create(CreateCommand::Text {
                name,
                value,
                metadata,
            }) => {
                assert_eq!(name, "note1");
                assert_eq!(value, "secret");
                assert_eq!(
                    metadata,
                    vec![
                        ("site".to_string(), "example.com".to_string()),
                        ("tag".to_string(), "work".to_string()),
                    ]
                );
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_metadata() {
        assert!(Cli::try_parse_from(["hoard", "create", "text", "n", "v", "-m", "nokey"]).is_err());
    }

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "hoard",
            "--server",
            "https://example.com",
            "--username",
            "alice",
            "--password",
            "pw",
            "--prefer",
            "local",
            "sync",
        ])
        .unwrap();
        assert_eq!(cli.prefer, Some(Prefer::Local));
        assert!(matches!(cli.command, Command::Sync));
    }
}
