pub mod bus;
pub mod config;
pub mod consumer;
pub mod error;
pub mod poller;
pub mod routes;
pub mod scheduler;
pub mod scores;
pub mod solana;
pub mod state;
pub mod store;
pub mod types;
pub mod winner;

#[cfg(test)]
pub mod testing;

use axum::Router;
use state::AppState;

// Expose a router builder so main.rs can stay tiny.
pub fn app(state: AppState) -> Router {
    routes::router(state)
}
