use crate::app::App;
use crate::cli::{Args, ServiceName};
use crate::config::Config;
use crate::logging::setup_logging;
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

mod app;
mod cli;
mod config;
mod data;
mod fmt;
mod logging;
mod refresh;
mod services;
mod state;
mod utils;
mod web;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let enabled_services = ServiceName::all();

    // Config errors are reported on stderr: logging depends on the config.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        commit = env!("GIT_COMMIT_SHORT"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting sprout"
    );

    let mut app = match App::new(config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = ?e, "Failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    info!(
        enabled_services = ?enabled_services.iter().map(ServiceName::as_str).collect::<Vec<_>>(),
        "services configuration loaded"
    );

    if let Err(e) = app.setup_services(&enabled_services) {
        error!(error = ?e, "Failed to setup services");
        return ExitCode::FAILURE;
    }

    app.start_services();
    app.run().await
}
