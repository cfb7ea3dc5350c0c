use actix_web::{HttpResponse, delete, get, post, put, web};
use heartwatch_service::database::models::SslMonitorInput;

use super::monitors::{ListQuery, ToggleBody};
use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route list_ssl_monitors,
    route get_ssl_monitor,
    route create_ssl_monitor,
    route update_ssl_monitor,
    route toggle_ssl_monitor,
    route delete_ssl_monitor,
}

#[get("/ssl-monitors")]
pub async fn list_ssl_monitors(
    state: web::Data<AppState>,
    caller: Caller,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    let monitors = state.engine.get_user_ssl_monitors(caller.user_id, query.active).await?;
    Ok(HttpResponse::Ok().json(monitors))
}

#[get("/ssl-monitors/{id}")]
pub async fn get_ssl_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let monitor = state.engine.get_ssl_monitor(caller.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(monitor))
}

#[post("/ssl-monitors")]
pub async fn create_ssl_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<SslMonitorInput>,
) -> Result<HttpResponse, ApiError> {
    let monitor = state.engine.create_ssl_monitor(caller.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(monitor))
}

#[put("/ssl-monitors/{id}")]
pub async fn update_ssl_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
    body: web::Json<SslMonitorInput>,
) -> Result<HttpResponse, ApiError> {
    let monitor = state.engine.update_ssl_monitor(caller.user_id, id.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(monitor))
}

#[post("/ssl-monitors/{id}/toggle")]
pub async fn toggle_ssl_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
    body: web::Json<ToggleBody>,
) -> Result<HttpResponse, ApiError> {
    let monitors = state.engine.toggle_ssl_monitor(caller.user_id, id.into_inner(), body.active).await?;
    Ok(HttpResponse::Ok().json(monitors))
}

#[delete("/ssl-monitors/{id}")]
pub async fn delete_ssl_monitor(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let monitors = state.engine.delete_ssl_monitor(caller.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(monitors))
}
