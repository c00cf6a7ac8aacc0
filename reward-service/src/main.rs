use std::time::Duration;

use anyhow::Context;
use reward_service::{config, db, rewards::RewardService, routes};
use reward_utils::eligibility::DailyLimits;
use tokio::signal;
use tower_http::{
    LatencyUnit,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        // Log to stdout
        .with(tracing_subscriber::fmt::layer().pretty())
        .with(sentry::integrations::tracing::layer())
        .init();

    info!("Starting reward service...");
    let env_vars = config::EnvVars::new();

    let _guard = if let Some(sentry_dsn) = env_vars.sentry_dsn.clone() {
        info!("initializing Sentry");
        // NOTE: Events are only emitted, once the guard goes out of scope.
        Some(sentry::init((
            sentry_dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(env_vars.environment.to_string().into()),
                traces_sample_rate: 1.0,
                ..Default::default()
            },
        )))
    } else {
        None
    };

    let client = db::client(&env_vars.mongodb_uri)
        .await
        .context("unable to connect to MongoDB")?;
    db::ensure_indexes(&client)
        .await
        .context("unable to create indexes")?;
    let store = db::store(&client)?;

    let limits = DailyLimits {
        max_ads_per_day: env_vars.max_ads_per_day,
    };
    let service = RewardService::new(store, limits, env_vars.reward_policy);
    info!(
        policy = ?env_vars.reward_policy,
        max_ads_per_day = ?env_vars.max_ads_per_day,
        admins = env_vars.admin_user_ids.len(),
        "reward service configured"
    );

    let port = env_vars.port;
    let request_timeout_in_ms = env_vars.request_timeout_in_ms;
    let request_body_size_limit = env_vars.request_body_size_limit;

    let app_state = config::AppState { service, env_vars };

    let app = routes::router(app_state)
        .layer(TimeoutLayer::new(Duration::from_millis(
            request_timeout_in_ms,
        )))
        .layer(RequestBodyLimitLayer::new(request_body_size_limit))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Micros),
                ),
        );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .with_context(|| format!("unable to bind port {port}"))?;
    info!("Listening on port {port}");
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!("Server error: {}", err);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutting down");
}

// Tests are needed for schema changes
#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;
    use mongodb::bson::doc;
    use reward_service::{db, store::Keyed};
    use schema::{AdUnit, CompletionRecord, Theme, UserEarnings, UserProfile};
    use serde::de::DeserializeOwned;

    async fn assert_collection_deserializes<T>()
    where
        T: Keyed + DeserializeOwned + Unpin + Send + Sync,
    {
        let mongo_uri = std::env::var("MONGODB_URI").unwrap();
        let client = db::client(&mongo_uri).await.unwrap();
        let collection = db::get_collection::<T>(&client, T::COLLECTION).unwrap();
        let _documents: Vec<T> = collection
            .find(doc! {})
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
    }

    /// Check if all stored documents are deserializable
    #[tokio::test]
    #[ignore = "needs MONGODB_URI"]
    async fn schema_is_unchanged() {
        dotenvy::dotenv().ok();
        assert_collection_deserializes::<AdUnit>().await;
        assert_collection_deserializes::<CompletionRecord>().await;
        assert_collection_deserializes::<UserEarnings>().await;
        assert_collection_deserializes::<UserProfile>().await;
        assert_collection_deserializes::<Theme>().await;
    }
}
