use actix_web::{HttpResponse, delete, get, post, put, web};
use heartwatch_service::database::models::NotificationGroupInput;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::state::AppState;

macros_utils::routes! {
    route list_groups,
    route get_group,
    route create_group,
    route update_group,
    route delete_group,
}

#[get("/notifications")]
pub async fn list_groups(state: web::Data<AppState>, caller: Caller) -> Result<HttpResponse, ApiError> {
    let groups = state.engine.get_user_notification_groups(caller.user_id).await?;
    Ok(HttpResponse::Ok().json(groups))
}

#[get("/notifications/{id}")]
pub async fn get_group(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let group = state.engine.get_notification_group(caller.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[post("/notifications")]
pub async fn create_group(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<NotificationGroupInput>,
) -> Result<HttpResponse, ApiError> {
    let group = state.engine.create_notification_group(caller.user_id, body.into_inner()).await?;
    Ok(HttpResponse::Created().json(group))
}

#[put("/notifications/{id}")]
pub async fn update_group(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
    body: web::Json<NotificationGroupInput>,
) -> Result<HttpResponse, ApiError> {
    let group = state.engine.update_notification_group(caller.user_id, id.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(group))
}

#[delete("/notifications/{id}")]
pub async fn delete_group(
    state: web::Data<AppState>,
    caller: Caller,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let groups = state.engine.delete_notification_group(caller.user_id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(groups))
}
