use tracing::error;
use tracing_subscriber::EnvFilter;

use hpcsim_host::config::Cli;
use hpcsim_host::runtime::Runtime;

fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse_checked();

    match Runtime::new(cli).run() {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "run failed");
            std::process::ExitCode::from(err.exit_code() as u8)
        }
    }
}
