pub mod cli;
pub mod config;
pub mod crypto;
pub mod db;
mod error;
pub mod remote;
pub mod secret;
pub mod sync;
pub mod vault;

pub use error::{Error, Result};

use {
    crate::{
        cli::{Cli, Command, CreateCommand},
        config::{Config, Prefer},
        db::LocalDb,
        remote::{HttpRemote, RemoteConfig},
        secret::Secret,
        sync::Resolver,
        vault::Vault,
    },
    anyhow::{anyhow, Context},
    std::sync::Arc,
    tokio_util::sync::CancellationToken,
    tracing::metadata::LevelFilter,
    tracing_subscriber::{prelude::*, EnvFilter},
};

/// Logs go to stderr so that `show` output on stdout stays clean.
pub fn setup_logger() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env()
                .context("invalid RUST_LOG filter")?,
        )
        .init();
    Ok(())
}

pub async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config = Config::load(&cli)?;

    match cli.command {
        Command::Create(create) => {
            let vault = open_vault(&config, None).await?;
            let (name, secret) = build_secret(create)?;
            vault.create(&cancel, &name, &secret).await?;
            println!("Created secret {name}");
            vault.close().await;
        }
        Command::Show { name, target_file } => {
            let vault = open_vault(&config, None).await?;
            let secret = vault.read(&cancel, &name).await?;
            print!("{secret}");
            if let Some(path) = target_file {
                fs_err::write(&path, secret.body_bytes())
                    .with_context(|| format!("failed to write {}", path.display()))?;
            }
            vault.close().await;
        }
        Command::Delete { name } => {
            let vault = open_vault(&config, None).await?;
            vault.delete(&cancel, &name).await?;
            vault.close().await;
        }
        Command::Signup => {
            let remote = build_remote(&config)?;
            remote.signup(&cancel).await?;
            println!(
                "Signed up as {}",
                config.username.as_deref().unwrap_or_default()
            );
        }
        Command::Sync => {
            let remote = build_remote(&config)?;
            let vault = open_vault(&config, Some(Box::new(remote))).await?;
            vault.sync_all(&cancel).await?;
            println!("Sync complete");
            vault.close().await;
        }
    }

    Ok(())
}

async fn open_vault(config: &Config, remote: Option<Box<dyn remote::Remote>>) -> Result<Vault> {
    let db = LocalDb::open(&config.db).await?;
    let mut builder = Vault::builder(db, config.passphrase.clone());
    if let Some(remote) = remote {
        builder = builder.remote(remote);
    }
    if let Some(prefer) = config.prefer {
        builder = builder.resolver(resolver_for(prefer));
    }
    Ok(builder.build())
}

fn resolver_for(prefer: Prefer) -> Arc<Resolver> {
    match prefer {
        Prefer::Remote => Arc::new(sync::prefer_remote),
        Prefer::Local => Arc::new(sync::prefer_local),
    }
}

fn build_remote(config: &Config) -> Result<HttpRemote> {
    let Some(server) = config.server.clone() else {
        return Err(anyhow!("server URL is not configured (use --server or the config file)").into());
    };
    let Some(username) = config.username.clone() else {
        return Err(anyhow!("username is not configured (use --username or the config file)").into());
    };
    let Some(password) = config.password.clone() else {
        return Err(anyhow!("password is not configured (use --password or the config file)").into());
    };
    HttpRemote::new(RemoteConfig {
        server,
        username,
        password,
        insecure: config.insecure,
    })
}

fn build_secret(create: CreateCommand) -> Result<(String, Secret)> {
    let (name, mut secret, metadata) = match create {
        CreateCommand::Text {
            name,
            value,
            metadata,
        } => (name, Secret::text(value), metadata),
        CreateCommand::Binary {
            name,
            file,
            metadata,
        } => {
            let contents = fs_err::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            (name, Secret::binary(contents), metadata)
        }
        CreateCommand::Password {
            name,
            username,
            password,
            metadata,
        } => (name, Secret::password(username, password), metadata),
        CreateCommand::Card {
            name,
            number,
            expiry,
            cvv,
            username,
            metadata,
        } => (
            name,
            Secret::card(number, expiry, cvv, username.unwrap_or_default()),
            metadata,
        ),
    };
    secret.set_metadata(metadata.into_iter().collect());
    Ok((name, secret))
}
