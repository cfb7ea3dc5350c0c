use actix_web::web::ServiceConfig;

mod events;
mod health;
mod heartbeats;
mod monitors;
mod notifications;
mod ssl;

pub fn routes(cfg: &mut ServiceConfig) {
    health::routes(cfg);
    monitors::routes(cfg);
    heartbeats::routes(cfg);
    ssl::routes(cfg);
    notifications::routes(cfg);
    events::routes(cfg);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::future::poll_fn;
    use std::time::Duration;

    use actix_web::body::MessageBody;
    use actix_web::http::StatusCode;
    use actix_web::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use actix_web::{App, test, web};
    use heartwatch_service::monitoring::JobKey;
    use heartwatch_service::{Config, Engine, EngineEvent};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    use super::routes;
    use crate::state::AppState;

    const ALICE: &str = "alice-token";
    const BOB: &str = "bob-token";

    async fn state() -> (web::Data<AppState>, TempDir) {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.database.path = dir.path().join("api.db");

        let engine = Engine::from_config(&config).await.unwrap();
        let tokens = HashMap::from([(ALICE.to_string(), 1), (BOB.to_string(), 2)]);
        (web::Data::new(AppState { engine, tokens }), dir)
    }

    fn bearer(token: &str) -> (actix_web::http::header::HeaderName, String) {
        (AUTHORIZATION, format!("Bearer {token}"))
    }

    fn paused_monitor(name: &str) -> Value {
        json!({
            "name": name,
            "type": "http",
            "url": "https://example.com",
            "frequencyMinutes": 5,
            "active": false,
        })
    }

    #[actix_web::test]
    async fn test_health_needs_no_token() {
        let (state, _dir) = state().await;
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_rejects_missing_and_unknown_tokens() {
        let (state, _dir) = state().await;
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/monitors").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/monitors").insert_header(bearer("nope")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].is_string());
    }

    #[actix_web::test]
    async fn test_create_list_and_get_monitor() {
        let (state, _dir) = state().await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/monitors")
            .insert_header(bearer(ALICE))
            .set_json(paused_monitor("Landing Page"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created: Value = test::read_body_json(resp).await;
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["userId"], 1);
        assert_eq!(created["type"], "http");

        let req = test::TestRequest::get().uri("/monitors").insert_header(bearer(ALICE)).to_request();
        let listed: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let req = test::TestRequest::get().uri(&format!("/monitors/{id}")).insert_header(bearer(ALICE)).to_request();
        let fetched: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(fetched["name"], "Landing Page");

        // Paused monitors never get a job
        assert_eq!(state.engine.scheduler().job_count(), 0);
    }

    #[actix_web::test]
    async fn test_other_users_monitor_is_not_found() {
        let (state, _dir) = state().await;
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/monitors")
            .insert_header(bearer(ALICE))
            .set_json(paused_monitor("Private"))
            .to_request();
        let created: Value = test::call_and_read_body_json(&app, req).await;
        let id = created["id"].as_i64().unwrap();

        let req = test::TestRequest::get().uri(&format!("/monitors/{id}")).insert_header(bearer(BOB)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete().uri(&format!("/monitors/{id}")).insert_header(bearer(BOB)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/heartbeats?type=http&monitorId={id}"))
            .insert_header(bearer(BOB))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        // Still there for its owner
        let req = test::TestRequest::get()
            .uri(&format!("/heartbeats?type=http&monitorId={id}&duration=1"))
            .insert_header(bearer(ALICE))
            .to_request();
        let heartbeats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(heartbeats, json!([]));

        let req = test::TestRequest::get()
            .uri(&format!("/heartbeats?type=http&monitorId={id}&duration={}", i64::MAX))
            .insert_header(bearer(ALICE))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_invalid_input_is_bad_request() {
        let (state, _dir) = state().await;
        let app = test::init_service(App::new().app_data(state).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/notifications")
            .insert_header(bearer(ALICE))
            .set_json(json!({ "groupName": "ops", "emails": ["not-an-address"] }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::post()
            .uri("/notifications")
            .insert_header(bearer(ALICE))
            .set_json(json!({ "groupName": "ops", "emails": ["ops@example.com"] }))
            .to_request();
        let group: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(group["emails"], json!(["ops@example.com"]));

        // Bob cannot attach Alice's group
        let mut input = paused_monitor("Borrowed");
        input["notificationId"] = group["id"].clone();
        let req = test::TestRequest::post().uri("/monitors").insert_header(bearer(BOB)).set_json(input).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_event_stream_carries_only_the_callers_refresh() {
        let (state, _dir) = state().await;
        let app = test::init_service(App::new().app_data(state.clone()).configure(routes)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/events").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/events").insert_header(bearer(ALICE)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(CONTENT_TYPE).unwrap(), "text/event-stream");
        let mut body = std::pin::pin!(resp.into_body());

        // Bob's update must not reach Alice
        state.engine.events().publish(EngineEvent::MonitorsUpdated { user_id: 2, monitors: Vec::new() });

        let req = test::TestRequest::post().uri("/auto-refresh").insert_header(bearer(ALICE)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        assert!(state.engine.scheduler().is_running(&JobKey::refresh("user", 1)));

        let chunk = tokio::time::timeout(Duration::from_secs(5), poll_fn(|cx| body.as_mut().poll_next(cx)))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let frame = std::str::from_utf8(&chunk).unwrap();
        assert!(frame.starts_with("event: monitors_updated\n"), "{frame}");
        assert!(frame.contains("\"user_id\":1"), "{frame}");
        assert!(frame.ends_with("\n\n"));

        let req = test::TestRequest::delete().uri("/auto-refresh").insert_header(bearer(ALICE)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
        let req = test::TestRequest::delete().uri("/auto-refresh").insert_header(bearer(ALICE)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.engine.scheduler().job_count(), 0);
    }
}
