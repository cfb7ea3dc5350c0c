use actix_web::{HttpResponse, get, web};
use serde::Deserialize;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route list_heartbeats,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatQuery {
    #[serde(rename = "type")]
    pub monitor_type: String,
    pub monitor_id: i64,
    /// Hours, 24 when absent
    pub duration: Option<i64>,
}

#[get("/heartbeats")]
pub async fn list_heartbeats(
    state: web::Data<AppState>,
    caller: Caller,
    query: web::Query<HeartbeatQuery>,
) -> Result<HttpResponse, ApiError> {
    state.engine.get_monitor(caller.user_id, query.monitor_id).await?;

    let heartbeats = state.engine.get_heartbeats(&query.monitor_type, query.monitor_id, query.duration).await?;
    Ok(HttpResponse::Ok().json(heartbeats))
}
