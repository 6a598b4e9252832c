//! HTTP surface: the WebSocket upgrade for the control channel, and the two
//! ingestion-side HTTP endpoints spec §6 calls out — multipart call upload
//! and streamed audio download.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use callfeed_control::{CallSubmission, IngestOutcome};
use callfeed_protocol::{CallId, SystemId, TalkgroupId};
use callfeed_store::StoreOps;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::session::run_session;
use crate::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let ctx = state.session_ctx.clone();
    ws.on_upgrade(move |socket| run_session(socket, ctx))
}

/// Re-reads configuration from the store and publishes it to every holder of
/// a `ConfigHandle` (spec §3: "observed by the core via a reload signal").
/// Sessions already admitted keep their current snapshot until they next
/// re-derive (spec §9's copy-on-write note).
pub async fn admin_reload(State(state): State<AppState>) -> Response {
    match state.session_ctx.store.load_config().await {
        Ok(data) => {
            state.session_ctx.access.config().reload(data);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            warn!(error = %e, "config reload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "store error" }))).into_response()
        }
    }
}

#[derive(Serialize)]
struct UploadAck {
    id: i64,
}

pub async fn upload_call(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let mut api_key = None;
    let mut system = None;
    let mut talkgroup = None;
    let mut frequency = None;
    let mut source = None;
    let mut sources = Vec::new();
    let mut frequencies = Vec::new();
    let mut patches = Vec::new();
    let mut audio = None;
    let mut audio_url = None;
    let mut audio_name = None;
    let mut audio_type = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => break,
            Err(e) => return bad_request(&format!("multipart error: {e}")),
        };
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "api_key" => api_key = field.text().await.ok(),
            "system" => system = field.text().await.ok().and_then(|v| v.parse::<i64>().ok()),
            "talkgroup" => talkgroup = field.text().await.ok().and_then(|v| v.parse::<i64>().ok()),
            "frequency" => frequency = field.text().await.ok().and_then(|v| v.parse::<i64>().ok()),
            "source" => source = field.text().await.ok().and_then(|v| v.parse::<i64>().ok()),
            "sources" => {
                if let Ok(text) = field.text().await {
                    sources = serde_json::from_str(&text).unwrap_or_default();
                }
            }
            "frequencies" => {
                if let Ok(text) = field.text().await {
                    frequencies = serde_json::from_str(&text).unwrap_or_default();
                }
            }
            "patches" => {
                if let Ok(text) = field.text().await {
                    patches = serde_json::from_str::<Vec<i64>>(&text)
                        .unwrap_or_default()
                        .into_iter()
                        .map(TalkgroupId)
                        .collect();
                }
            }
            "audio_url" => audio_url = field.text().await.ok(),
            "audio_name" => audio_name = field.text().await.ok(),
            "audio_type" => audio_type = field.text().await.ok(),
            "audio" => {
                audio_name = audio_name.or_else(|| field.file_name().map(str::to_string));
                audio_type = audio_type.or_else(|| field.content_type().map(str::to_string));
                audio = field.bytes().await.ok().map(|b| b.to_vec());
            }
            _ => {}
        }
    }

    let (Some(api_key), Some(system), Some(talkgroup)) = (api_key, system, talkgroup) else {
        return bad_request("api_key, system, and talkgroup are required");
    };

    let submission = CallSubmission {
        api_key,
        system: SystemId(system),
        talkgroup: TalkgroupId(talkgroup),
        date_time: chrono::Utc::now(),
        frequency,
        source: source.map(callfeed_protocol::UnitId),
        sources,
        frequencies,
        patches,
        audio,
        audio_url,
        audio_name,
        audio_type,
    };

    match state.ingest.ingest(submission).await {
        Ok(call) => {
            let call = Arc::new(call);
            state.session_ctx.dispatcher.notify_call(call.clone());
            let config = state.session_ctx.access.config().load();
            state.forwarder.submit(config.downstreams().to_vec(), call.clone());
            (StatusCode::OK, Json(UploadAck { id: call.id.0 })).into_response()
        }
        Err(IngestOutcome::Rejected(e)) => {
            use callfeed_control::IngestError;
            let status = match e {
                IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
                IngestError::Forbidden => StatusCode::FORBIDDEN,
                IngestError::BadAudio => StatusCode::BAD_REQUEST,
            };
            (status, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(IngestOutcome::Store(e)) => {
            warn!(error = %e, "store error during ingest");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "store error" }))).into_response()
        }
    }
}

pub async fn download_audio(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.session_ctx.store.get_call(CallId(id)).await {
        Ok(Some(call)) => {
            if let Some(bytes) = call.audio {
                let content_type = call.audio_type.unwrap_or_else(|| "application/octet-stream".to_string());
                let disposition = match call.audio_name {
                    Some(name) => format!("attachment; filename=\"{name}\""),
                    None => "attachment".to_string(),
                };
                Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, content_type)
                    .header(header::CONTENT_DISPOSITION, disposition)
                    .body(Body::from(bytes))
                    .unwrap()
            } else if let Some(url) = call.audio_url {
                Redirect::temporary(&url).into_response()
            } else {
                StatusCode::NOT_FOUND.into_response()
            }
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(error = %e, "store error fetching call audio");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
