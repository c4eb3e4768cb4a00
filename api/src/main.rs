//! Blacktree API - Entry Point
//!
//! Publishes deployment commands to the container workers over the broker and
//! applies the status results they report back.

use std::collections::HashMap;
use std::env;

use blacktree::app::run::run;
use blacktree::config::settings::Settings;
use blacktree::logs::init_logging;
use blacktree::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to print version: {e}"),
        }
        return;
    }

    // Settings file, then environment overrides
    let settings = match Settings::load(cli_args.get("config").map(String::as_str)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    // Keep the guard alive so buffered file logs are flushed on exit
    let log_guard = match init_logging(settings.log_options()) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = settings.app_options();
    info!("Running Blacktree API with options: {:?}", options);
    let result = run(version.version, options, await_shutdown_signal()).await;
    if let Err(e) = &result {
        error!("Blacktree API stopped with an error: {e}");
    }

    drop(log_guard);
    if result.is_err() {
        std::process::exit(1);
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to listen for SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to listen for SIGINT");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Ctrl+C received, shutting down...");
    }
}
