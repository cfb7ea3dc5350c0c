use actix_web::{HttpResponse, delete, get, post, put, web};
use heartwatch_service::database::models::MonitorInput;
use serde::Deserialize;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route list_monitors,
    route get_monitor,
    route create_monitor,
    route update_monitor,
    route toggle_monitor,
    route delete_monitor,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ToggleBody {
    pub active: bool,
}

/// The caller's monitors. `?active=true` returns the overview with uptime,
/// recent heartbeats and notification group.
#[get("/monitors")]
pub async fn list_monitors(
    state: web::Data<AppState>,
    caller: Caller,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    if query.active {
        let monitors = state.engine.get_user_active_monitors(caller.user_id).await?;
        return Ok(HttpResponse::Ok().json(monitors));
    }

    let monitors = state.engine.get_user_monitors(caller.user_id, false).await?;
    Ok(HttpResponse::Ok().json(monitors))
}

#[get("/monitors/{id}")]
pub async fn get_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let monitor = state.engine.get_monitor(caller.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(monitor))
}

#[post("/monitors")]
pub async fn create_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<MonitorInput>,
) -> Result<HttpResponse, ApiError> {
    let monitor = state.engine.create_monitor(caller.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(monitor))
}

#[put("/monitors/{id}")]
pub async fn update_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
    body: web::Json<MonitorInput>,
) -> Result<HttpResponse, ApiError> {
    let monitor = state.engine.update_monitor(caller.user_id, id.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(monitor))
}

#[post("/monitors/{id}/toggle")]
pub async fn toggle_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
    body: web::Json<ToggleBody>,
) -> Result<HttpResponse, ApiError> {
    let monitors = state.engine.toggle_monitor(caller.user_id, id.into_inner(), body.active).await?;
    Ok(HttpResponse::Ok().json(monitors))
}

#[delete("/monitors/{id}")]
pub async fn delete_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let monitors = state.engine.delete_monitor(caller.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(monitors))
}
