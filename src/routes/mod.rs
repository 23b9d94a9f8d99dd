use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub mod winners;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/winners/leagues/:league_id", get(winners::get_league_winner))
        .route("/winners/users/:user_id", get(winners::get_user_wins))
        .route("/winners/tx/:tx_ref", get(winners::get_by_tx_ref))
        .route("/winners/outstanding", get(winners::list_outstanding))
        .route("/winners/failed", get(winners::list_failed))
        .route(
            "/winners/leagues/:league_id/announce",
            post(winners::announce_winner),
        )
        .route(
            "/winners/leagues/:league_id/retry",
            post(winners::retry_settlement),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}
