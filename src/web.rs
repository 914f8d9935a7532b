#![cfg(not(tarpaulin_include))]

use dataview::{AppConfig, app};

/// Main entry point for the web application
///
/// Initializes logging (`RUST_LOG`, `info` by default) and serves the application with
/// the built-in configuration.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::default();
    log::info!(
        "starting dataview (users: {}, uploads: {})",
        config.users_file.display(),
        config.upload_dir.display()
    );

    app::run(config).await
}
