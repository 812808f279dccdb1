use clap::Parser;
use std::env;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

use snailmail::config::Config;
use snailmail::{server, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "snailmail=debug");
    }

    let config = Config::parse();
    telemetry::init(config.jaeger_endpoint.as_deref())?;

    let token = CancellationToken::new();

    let app = tokio::spawn(
        server::serve(token.clone(), config).instrument(info_span!("server")),
    );

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                (Err(err), _) | (_, Err(err)) => {
                    error!(message = "Could not install signal handlers", error = ?err);
                    return;
                }
            };
        tokio::select! {
            _ = sigterm.recv() => { info!("Received SIGTERM"); token.cancel() },
            _ = sigint.recv() => { info!("Received SIGINT"); token.cancel() },
        }
    });

    app.await??;
    info!("Shutting down.");
    telemetry::shutdown();

    Ok(())
}
