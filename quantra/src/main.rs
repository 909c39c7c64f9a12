use quantra::{Config, Engine, EngineError, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

fn main() -> ExitCode {
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("quantra: {err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };
    logging::init_logging(&config.log_level);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(?err, "failed to start async runtime");
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "engine exited with error");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

async fn run(config: Config) -> Result<(), EngineError> {
    let cancel = CancellationToken::new();

    // SIGINT triggers an orderly shutdown; the engine run resolves afterwards.
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received - shutting down");
                cancel.cancel();
            }
        })
    };

    let engine = Engine::build(config, cancel.clone()).await?;
    let result = engine.run().await;

    if interrupt.is_finished() {
        result.and(Err(EngineError::Interrupted))
    } else {
        interrupt.abort();
        result
    }
}
