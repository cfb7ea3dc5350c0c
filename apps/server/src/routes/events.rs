use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::web::Bytes;
use actix_web::{HttpResponse, delete, get, post, web};
use heartwatch_service::EngineEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route event_stream,
    route enable_auto_refresh,
    route disable_auto_refresh,
}

/// Job name of a caller's auto refresh
const REFRESH_JOB: &str = "user";

/// One server-sent event frame, `None` if the event cannot be encoded
fn sse_frame(event: &EngineEvent) -> Option<Bytes> {
    match serde_json::to_string(event) {
        Ok(data) => Some(Bytes::from(format!("event: {}\ndata: {}\n\n", event.topic(), data))),
        Err(e) => {
            warn!(topic = event.topic(), "Dropping unencodable event: {}", e);
            None
        }
    }
}

/// Live engine events about the caller's monitors, as server-sent events
#[get("/events")]
pub async fn event_stream(state: web::Data<AppState>, caller: Caller) -> HttpResponse {
    let receiver = state.engine.events().subscribe();
    let user_id = caller.user_id;

    let frames = futures::stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.user_id() == user_id => {
                    if let Some(frame) = sse_frame(&event) {
                        return Some((Ok::<_, actix_web::Error>(frame), receiver));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(user_id, skipped, "Event stream fell behind"),
                Err(RecvError::Closed) => return None,
            }
        }
    });

    HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(frames)
}

/// Publish the caller's monitor overview on the event stream every ten minutes
#[post("/auto-refresh")]
pub async fn enable_auto_refresh(state: web::Data<AppState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    state.engine.enable_auto_refresh(caller.user_id, REFRESH_JOB)?;
    Ok(HttpResponse::NoContent().finish())
}

#[delete("/auto-refresh")]
pub async fn disable_auto_refresh(state: web::Data<AppState>, caller: Caller) -> HttpResponse {
    if state.engine.disable_auto_refresh(caller.user_id, REFRESH_JOB) {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().json(serde_json::json!({ "error": "auto refresh is not enabled" }))
    }
}
