// HTTP surface
//
// Landing page, synthesis endpoint and generated audio, wrapped in the
// middleware every response goes through (tracing, no-cache headers,
// panic catch-all, body limit).

use std::any::Any;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer, services::ServeDir, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::error;

use crate::config::MAX_BODY_BYTES;
use crate::error::{ApiError, ErrorBody};
use crate::handler::{synthesize, AUDIO_URL_PREFIX};
use crate::state::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let audio = ServeDir::new(&state.settings.output_dir);

    Router::new()
        .route("/", get(index_handler))
        .route("/synthesize", post(synthesize))
        .nest_service(AUDIO_URL_PREFIX, audio)
        .fallback(not_found)
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Last line of defence: a panicking handler still yields a JSON 500.
pub(crate) fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    error!(target: "http", panic = %detail, "Unhandled exception");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new(format!("Internal Server Error: {}", detail))),
    )
        .into_response()
}
