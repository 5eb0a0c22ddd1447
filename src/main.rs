mod app;
mod cli;
mod model;
mod plugin;

use std::process::ExitCode;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use app::App;
use cli::Cli;
use model::config::AppConfig;
use plugin::InstallError;

fn main() -> ExitCode {
    let _guard = init_logging();
    let cli = Cli::parse();

    tracing::info!("kitwright starting");

    let result = AppConfig::load(cli.config.as_deref())
        .and_then(|config| App::new(config, cli.plugins_dirs).run(cli.command));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("kitwright error: {err:#}");
            let code = err
                .downcast_ref::<InstallError>()
                .map_or(1, InstallError::exit_code);
            ExitCode::from(code)
        }
    }
}

/// Logs go to a daily file in the platform data directory, never stdout.
/// Logging is skipped when that directory cannot be created.
fn init_logging() -> Option<WorkerGuard> {
    let log_dir = directories::ProjectDirs::from("", "", "kitwright")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&log_dir).ok()?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "kitwright.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kitwright=info"));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
