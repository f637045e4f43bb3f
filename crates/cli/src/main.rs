mod app;
mod client;
mod config;
mod error;
mod local_state;
mod notify;

use std::process::ExitCode;

use crate::error::Result;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let (config, command) = config::load()?;

    // Logs go to stderr, stdout is for listings and reports.
    tracing_subscriber::fmt()
        .with_env_filter(format!("gastos={level},engine={level}", level = config.level))
        .with_writer(std::io::stderr)
        .init();

    let app = app::App::new(config)?;
    app.run(command).await
}
