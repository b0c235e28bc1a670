use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod router;
use router::app_router;
use std::{net::SocketAddr, sync::Arc};
mod ai;
use ai::OpenAICompletion;
mod config;
use config::Config;
mod data;
use data::{ChatRepository, Database, UserRepository};
mod error;
mod middleware;
mod proxy;
use proxy::{inference_routes, proxy_router, ProxyGateway};
mod services;
use services::{AuthService, ChatService, SessionTokens};
#[cfg(test)]
mod testing;

#[derive(Clone)]
pub struct AppState {
    auth: AuthService,
    chat: ChatService,
    tokens: SessionTokens,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "aurora_api=debug,tower_http=info".into());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if config.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), ?config, "aurora-api starting");

    let db = Arc::new(Database::connect(&config.database_url).await?);
    tracing::info!(database_url = %config.database_url, "database ready");

    let tokens = SessionTokens::new(&config.jwt_secret);
    let provider = Arc::new(OpenAICompletion::new(
        config.openai_base_url.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.completion_timeout,
    ));

    let state = Arc::new(AppState {
        auth: AuthService::new(UserRepository::new(db.clone()), tokens.clone()),
        chat: ChatService::new(ChatRepository::new(db.clone()), provider),
        tokens,
    });

    let gateway = ProxyGateway::new(inference_routes(&config.fastapi_url, config.proxy_timeout))?;
    for route in gateway.routes() {
        tracing::info!(
            prefix = %route.prefix,
            upstream = %route.upstream,
            rewrite = ?route.rewrite,
            timeout = ?route.timeout,
            "proxy route"
        );
    }

    let app = Router::new()
        .merge(app_router(state))
        .merge(proxy_router(Arc::new(gateway)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    db.close().await;
    tracing::info!("aurora-api stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to install Ctrl-C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
