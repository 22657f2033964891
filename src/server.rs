//! HTTP front end
//!
//! `GET /stocks?region=<name>` runs one pipeline and answers with the dataset
//! as a JSON object of symbol → serialized quote.

use crate::driver::PageDriver;
use crate::error::{Result, ScreenerError};
use crate::pipeline::Pipeline;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use std::sync::Arc;

/// Creates a fresh page session for each run
pub type DriverFactory = Arc<dyn Fn() -> Result<Box<dyn PageDriver>> + Send + Sync>;

const HOME_PAGE: &str = "<h1>Stock screener cache</h1>\
<p>Request <code>/stocks?region=&lt;name&gt;</code> to fetch the screener listing for a region \
(default: the configured baseline region).</p>";

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    drivers: DriverFactory,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, drivers: DriverFactory) -> Self {
        Self { pipeline, drivers }
    }
}

#[derive(Debug, Deserialize)]
pub struct StocksQuery {
    #[serde(default)]
    pub region: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .route("/stocks", get(stocks))
        .with_state(state)
}

async fn home() -> Html<&'static str> {
    Html(HOME_PAGE)
}

async fn health() -> &'static str {
    "ok"
}

async fn stocks(State(state): State<AppState>, Query(query): Query<StocksQuery>) -> Response {
    log::info!("GET /stocks region={:?}", query.region);

    // The blocking task keeps running if the client goes away, so a started
    // run always finalizes or releases the gate. The browser starts only once
    // the gate is claimed.
    let task = tokio::task::spawn_blocking(move || {
        state.pipeline.run_opening(|| (state.drivers)(), query.region.as_deref())
    });

    match task.await {
        Ok(Ok((dataset, _))) => Json(dataset).into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(e) => {
            log::error!("Scrape task aborted: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": "internal", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn error_response(e: &ScreenerError) -> Response {
    let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(serde_json::json!({ "error": e.kind(), "message": e.to_string() }))).into_response()
}
