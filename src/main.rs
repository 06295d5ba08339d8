use std::process::ExitCode;

use digits_server::Config;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = digits_server::run_until_signal(config) {
        tracing::error!(%err, "server exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
