use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use cluster_proto::{ConsoleCommand, WorkerStatusRequest, WorkerStatusResponse};
use tracing::{info, warn};

use crate::auth::{worker_token_matches, BasicAuth};
use crate::AppState;

/// `POST /worker/status` — the only endpoint a worker ever calls. Auth
/// happens here (constant-time token compare); everything else is
/// delegated to `coordinator-core`.
pub async fn worker_status(
    State(state): State<AppState>,
    Json(req): Json<WorkerStatusRequest>,
) -> Result<Json<WorkerStatusResponse>, StatusCode> {
    if !worker_token_matches(&state.worker_token, &req.token) {
        warn!(worker_id = %req.worker_id, "rejected worker report: bad token");
        return Err(StatusCode::FORBIDDEN);
    }

    let worker_id = req.worker_id.clone();
    let mut cluster = state.cluster.lock().expect("cluster state mutex poisoned");
    let previous_mode = cluster.run_mode();
    let response = cluster.handle_worker_report(req, Utc::now());
    if response.status != previous_mode {
        info!(%worker_id, from = ?previous_mode, to = ?response.status, "run mode transition");
    }
    Ok(Json(response))
}

/// `POST /console_update` — operator command plus a full state snapshot.
pub async fn console_update(
    State(state): State<AppState>,
    _auth: BasicAuth,
    body: Option<Json<ConsoleCommand>>,
) -> Result<Json<cluster_proto::ConsoleSnapshot>, StatusCode> {
    let mut cluster = state.cluster.lock().expect("cluster state mutex poisoned");

    if let Some(Json(cmd)) = body {
        info!(command = ?cmd.command, "console command");
        if let Err(err) = cluster.apply_console_command(cmd) {
            warn!(%err, "console command rejected");
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    Ok(Json(cluster.snapshot(Utc::now())))
}

/// `GET /` — the console shell, with `{solvers}` substituted for the
/// catalog the coordinator loaded at startup. Hand-assembled as the
/// source's own single-quoted JS object literal rather than strict JSON
/// (see DESIGN.md): the page embeds it directly into a `<script>` body,
/// not through `JSON.parse`.
pub async fn index(State(state): State<AppState>, _auth: BasicAuth) -> Response {
    let path = state.assets_dir.join("index.html");
    let body = match std::fs::read_to_string(&path) {
        Ok(body) => body,
        Err(err) => {
            warn!(%err, path = %path.display(), "failed to read console index");
            return StatusCode::NOT_FOUND.into_response();
        }
    };

    let solvers_literal = state
        .catalog
        .iter()
        .map(|entry| {
            format!(
                "{{name: '{}', text: '{}'}}",
                escape_js_literal(&entry.name),
                escape_js_literal(&entry.text).replace('\n', "\\n")
            )
        })
        .collect::<Vec<_>>()
        .join(",");

    Html(body.replace("{solvers}", &solvers_literal)).into_response()
}

fn escape_js_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `GET /view.js` and `GET /style.css` — static console assets served
/// verbatim from the configured asset directory.
pub async fn asset(
    State(state): State<AppState>,
    _auth: BasicAuth,
    name: &'static str,
    content_type: &'static str,
) -> Response {
    let path = state.assets_dir.join(name);
    match std::fs::read_to_string(&path) {
        Ok(body) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(err) => {
            warn!(%err, path = %path.display(), "failed to read console asset");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

pub async fn view_js(state: State<AppState>, auth: BasicAuth) -> Response {
    asset(state, auth, "view.js", "application/javascript").await
}

pub async fn style_css(state: State<AppState>, auth: BasicAuth) -> Response {
    asset(state, auth, "style.css", "text/css").await
}
