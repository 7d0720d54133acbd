use clap::Parser;
use greeting_server::server::{
    config::{CliArgs, ServerConfig},
    runner::run,
    shutdown::Shutdown,
    telemetry::init_logging,
};
use greeting_server::services::HealthServices;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> ExitCode {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();

    if let Err(e) = init_logging(args.log_level()) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    let config = match ServerConfig::try_from(args) {
        Ok(config) => config,
        Err(e) => {
            let error = format!("{e:#}");
            tracing::error!(%error, "Server terminated");
            return ExitCode::FAILURE;
        }
    };
    log_startup_info(&config);

    match run(&config.listen_addr, &HealthServices::new(), Shutdown::new()).await {
        Ok(()) => {
            tracing::warn!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server terminated");
            ExitCode::FAILURE
        }
    }
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::debug!("Starting server with full config: {:#?}", config);
    } else {
        tracing::debug!(
            "Starting server on {} at level {}",
            config.listen_addr,
            config.log_level
        );
    }
}
