use skyfare_api::{
    app,
    state::{open_repositories, AppState, AuthConfig},
};
use skyfare_store::{Config, RedisClient};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyfare_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Skyfare API on port {}", config.server.port);

    let repos = open_repositories(&config).await?;
    let mut app_state = AppState::new(
        repos.catalog,
        repos.bookings,
        &repos.rules,
        AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    );

    if let Some(redis) = &config.redis {
        app_state = app_state.with_redis(RedisClient::new(&redis.url).await?);
        tracing::info!(
            "Rate limiting at {} requests per minute",
            app_state.rate_limit_per_minute
        );
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
