use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use pfnotify_core::config::PfnotifyConfig;
use pfnotify_daemon::Daemon;
use pfnotify_daemon::cli::DaemonCli;
use pfnotify_daemon::logging;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("pfnotify-daemon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> Result<()> {
    // file -> environment -> command line
    let mut config = PfnotifyConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);

    if cli.validate {
        Daemon::check_config(&config)?;
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        config = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "pfnotify-daemon starting"
    );

    let mut daemon = Daemon::build_from_config(config)?;
    daemon.run().await
}
