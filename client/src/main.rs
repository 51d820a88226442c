use {
    clap::Parser, hoard::cli::Cli, std::process::ExitCode, tokio_util::sync::CancellationToken,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = hoard::setup_logger() {
        eprintln!("error: {err:#}");
        return ExitCode::FAILURE;
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match hoard::run(cli, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {err:#}", err.kind());
            if matches!(err, hoard::Error::Conflict) {
                eprintln!("retry with --prefer local or --prefer remote to resolve");
            }
            ExitCode::FAILURE
        }
    }
}
