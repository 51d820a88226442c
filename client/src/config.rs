use {
    crate::{cli::Cli, error::Result},
    anyhow::Context,
    serde::Deserialize,
    std::path::{Path, PathBuf},
};

/// Which side wins a three-way divergence during sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Prefer {
    Remote,
    Local,
}

/// Effective client configuration: CLI flags and `HOARD_*` environment
/// variables (handled by clap) override the optional YAML config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub db: PathBuf,
    pub passphrase: String,
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub insecure: bool,
    pub prefer: Option<Prefer>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    db: Option<PathBuf>,
    passphrase: Option<String>,
    server: Option<String>,
    username: Option<String>,
    password: Option<String>,
    insecure: Option<bool>,
    prefer: Option<Prefer>,
}

const DEFAULT_DB: &str = "hoard.sqlite";

impl Config {
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => match dirs::home_dir().map(|home| home.join(".hoard.yaml")) {
                Some(path) if path.exists() => read_file(&path)?,
                _ => FileConfig::default(),
            },
        };

        Ok(Self {
            db: cli
                .db
                .clone()
                .or(file.db)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB)),
            passphrase: cli
                .passphrase
                .clone()
                .or(file.passphrase)
                .unwrap_or_default(),
            server: cli.server.clone().or(file.server),
            username: cli.username.clone().or(file.username),
            password: cli.password.clone().or(file.password),
            insecure: cli.insecure || file.insecure.unwrap_or(false),
            prefer: cli.prefer.or(file.prefer),
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let text = fs_err::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    Ok(serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))?)
}

#[cfg(test)]
mod tests {
    use {super::*, clap::Parser};

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from([&["hoard"], args, &["sync"]].concat()).unwrap()
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let config = Config::load(&cli(&[])).unwrap();
        assert_eq!(config.db, PathBuf::from(DEFAULT_DB));
        assert_eq!(config.passphrase, "");
        assert_eq!(config.server, None);
        assert!(!config.insecure);
    }

    #[test]
    fn file_values_apply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(
            &path,
            "db: /tmp/custom.sqlite\npassphrase: file-pass\nserver: https://example.com\nprefer: remote\n",
        )
        .unwrap();
        let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.db, PathBuf::from("/tmp/custom.sqlite"));
        assert_eq!(config.passphrase, "file-pass");
        assert_eq!(config.server.as_deref(), Some("https://example.com"));
        assert_eq!(config.prefer, Some(Prefer::Remote));
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs_err::write(&path, "passphrase: file-pass\n").unwrap();
        let config = Config::load(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--passphrase",
            "flag-pass",
        ]))
        .unwrap();
        assert_eq!(config.passphrase, "flag-pass");
    }

    #[test]
    fn explicit_missing_config_file_is_an_error() {
        assert!(Config::load(&cli(&["--config", "/does/not/exist.yaml"])).is_err());
    }
}
