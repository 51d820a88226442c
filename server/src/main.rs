use {
    anyhow::{anyhow, Context, Result},
    clap::Parser,
    hoard_server::Config,
    serde::Deserialize,
    std::{
        net::SocketAddr,
        path::{Path, PathBuf},
    },
    tracing::{info, metadata::LevelFilter},
    tracing_subscriber::{prelude::*, EnvFilter},
};

#[derive(Debug, Parser)]
#[command(name = "hoard-server", version, about = "Synchronization server for hoard")]
struct Cli {
    /// Config file (default: ./hoard-server.yaml)
    #[arg(long, env = "HOARD_SERVER_CONFIG")]
    config: Option<PathBuf>,
    /// Database connection string
    #[arg(long, env = "HOARD_SERVER_DSN")]
    dsn: Option<String>,
    /// Token signing key
    #[arg(long, env = "HOARD_SERVER_KEY")]
    key: Option<String>,
    /// Listen address
    #[arg(long, env = "HOARD_SERVER_ADDRESS")]
    address: Option<SocketAddr>,
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    dsn: Option<String>,
    key: Option<String>,
    address: Option<SocketAddr>,
}

const DEFAULT_CONFIG: &str = "hoard-server.yaml";
const DEFAULT_ADDRESS: &str = "127.0.0.1:8080";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env()
                .context("invalid RUST_LOG filter")?,
        )
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => read_config(path)?,
        None if Path::new(DEFAULT_CONFIG).exists() => read_config(Path::new(DEFAULT_CONFIG))?,
        None => FileConfig::default(),
    };

    let config = Config {
        database_url: cli
            .dsn
            .or(file.dsn)
            .ok_or_else(|| anyhow!("database DSN is not configured (use --dsn)"))?,
        bind_addr: cli
            .address
            .or(file.address)
            .unwrap_or_else(|| DEFAULT_ADDRESS.parse().expect("default address is valid")),
        token_signing_key: cli.key.or(file.key),
    };

    tokio::select! {
        result = hoard_server::run(config) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}

fn read_config(path: &Path) -> Result<FileConfig> {
    let text = fs_err::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&text)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}
