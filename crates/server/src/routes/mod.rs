use axum::Router;

use crate::AppState;

pub mod health;
pub mod registry;
pub mod webhooks;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(webhooks::router())
                .merge(registry::router())
                .merge(health::router()),
        )
        .with_state(state)
}
