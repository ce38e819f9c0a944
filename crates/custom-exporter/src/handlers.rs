//! HTTP request handlers: landing page and metrics exposition.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::{debug, error};

use crate::state::AppState;

// ============================================================
// Landing page
// ============================================================

pub(crate) async fn handle_landing(State(state): State<AppState>) -> Html<String> {
    Html(format!(
        "<html>\n\
         <head><title>Custom Exporter</title></head>\n\
         <body>\n\
         <h1>Custom Exporter</h1>\n\
         <p>Version {version}</p>\n\
         <p><a href=\"{path}\">Metrics</a></p>\n\
         </body>\n\
         </html>\n",
        version = custom_exporter_core::VERSION,
        path = state.telemetry_path,
    ))
}

// ============================================================
// Metrics
// ============================================================

/// Runs every probe and returns the text exposition.
///
/// Probes block on processes, databases and sockets, so the whole gather runs
/// on tokio's blocking pool.
pub(crate) async fn handle_metrics(State(state): State<AppState>) -> Response {
    let exporter_state = state.clone();
    let rendered =
        tokio::task::spawn_blocking(move || exporter_state.exporter.render()).await;

    match rendered {
        Ok(Ok(body)) => {
            debug!(bytes = body.len(), "metrics rendered");
            (
                [(header::CONTENT_TYPE, state.exporter.format_type())],
                body,
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "metrics task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics task failed").into_response()
        }
    }
}
