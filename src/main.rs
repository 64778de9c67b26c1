use quiz_maker::{
    config::{get_config, init_config},
    database::pool::create_pool,
    router, AppState,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("quiz_maker=info,tower_http=info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    init_config()?;
    let config = get_config()?;

    let pool = create_pool(config).await?;
    let app_state = AppState::new(pool, config)?;
    app_state.history_service.ensure_schema().await?;

    {
        let sessions = app_state.sessions.clone();
        let max_idle = chrono::Duration::minutes(config.session_idle_minutes);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(60)).await;
                match sessions.prune_idle(max_idle) {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "dropped idle quiz sessions"),
                    Err(e) => tracing::error!(error = ?e, "session sweeper error"),
                }
            }
        });
    }

    let app = router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
