use chatrelay::error::AppError;

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chatrelay=debug")),
        )
        .json()
        .init();

    if let Err(err) = run().await {
        eprintln!("chatrelay: {} ({})", err.message, err.code);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let state = chatrelay::app::load_state().await?;
    let addr: std::net::SocketAddr = state.runtime.listen.parse().map_err(
        |err: std::net::AddrParseError| {
            AppError::internal(
                "listen_invalid",
                format!("CHATRELAY_LISTEN={:?}: {err}", state.runtime.listen),
            )
        },
    )?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::internal("listen_failed", format!("bind {addr}: {err}")))?;
    let models = state.registry.configured_models();
    let app = chatrelay::app::build_app(state);
    tracing::info!(%addr, ?models, "chatrelay listening");
    axum::serve(listener, app)
        .await
        .map_err(|err| AppError::internal("serve_failed", err.to_string()))?;
    Ok(())
}
