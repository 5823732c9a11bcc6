use std::time::Duration;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    api::handler::{
        admin_remove_identity, distribute, export_identities, get_identity, get_pool_balance,
        health_check, list_identities, remove_identity, session_message, start_session,
        view_account, AppState,
    },
    middleware::{create_cors_layer, require_admin},
};

/// Upper bound for a whole request, distribution runs included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    // Operator endpoints, all behind the admin token
    let admin = Router::new()
        .route("/identities", get(list_identities))
        .route("/identities/export", get(export_identities))
        .route("/identities/:user_id", delete(admin_remove_identity))
        .route("/pool", get(get_pool_balance))
        .route("/distribute", post(distribute))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    let app = Router::new()
        .route("/health", get(health_check))
        .nest(
            "/api/v1",
            Router::new()
                // Identity commands, scoped to the calling user
                .route("/identity", get(get_identity).delete(remove_identity))
                .route("/identity/session", post(start_session))
                .route("/identity/session/message", post(session_message))
                .route("/account", get(view_account))
                .nest("/admin", admin),
        )
        .layer(CompressionLayer::new())
        .layer(create_cors_layer())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

pub async fn run_server(app: Router, bind_address: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", bind_address);

    axum::serve(listener, app).await?;
    Ok(())
}
