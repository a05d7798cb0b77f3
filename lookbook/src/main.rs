use clap::Parser;
use lookbook::{Application, Config, config::Args, telemetry};
use tokio::signal;

/// Resolves on the first Ctrl+C or SIGTERM
async fn shutdown_requested() {
    #[cfg(unix)]
    let sigterm = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable, relying on Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    let signal_name = tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => "ctrl-c",
            Err(e) => {
                tracing::warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<&str>().await
            }
        },
        _ = sigterm => "sigterm",
    };
    tracing::info!(signal = signal_name, "Draining in-flight requests before exit");
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.host,
        port = config.port,
        model = %config.replicate.model,
        "Starting lookbook"
    );
    let app = Application::new(config).await?;
    app.serve(shutdown_requested()).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TLS clients are built while the application starts, so the provider goes in first
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    let config = Config::load(&args)?;
    if args.validate {
        println!("{} is valid", args.config);
        return Ok(());
    }

    telemetry::init_telemetry(config.enable_otel_export)?;
    run(config).await
}
