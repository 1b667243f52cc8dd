//! API Router configuration

use super::handlers;
use super::state::AppState;
use crate::config::ServerConfig;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Create the main API router
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Users
        .route("/me", get(handlers::current_user))
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // Objectives
        .route(
            "/objectives",
            get(handlers::list_objectives).post(handlers::create_objective),
        )
        .route(
            "/objectives/:id",
            get(handlers::get_objective)
                .put(handlers::update_objective)
                .delete(handlers::delete_objective),
        )
        .route("/objectives/:id/summary", get(handlers::objective_summary))
        .route("/objectives/:id/report", get(handlers::objective_report))
        // Activities
        .route(
            "/activities",
            get(handlers::list_activities).post(handlers::create_activity),
        )
        .route(
            "/activities/:id",
            get(handlers::get_activity)
                .put(handlers::update_activity)
                .delete(handlers::delete_activity),
        )
        .route(
            "/activities/:id/lock",
            post(handlers::lock_activity).delete(handlers::unlock_activity),
        )
        // Spend
        .route(
            "/activities/:id/spend",
            get(handlers::list_spend).post(handlers::create_spend),
        )
        .route("/spend/:id", axum::routing::delete(handlers::delete_spend))
        // Attachments
        .route(
            "/activities/:id/attachments",
            get(handlers::list_activity_attachments).post(handlers::upload_activity_attachment),
        )
        .route(
            "/spend/:id/attachments",
            get(handlers::list_spend_attachments).post(handlers::upload_spend_attachment),
        )
        .route(
            "/attachments/:id",
            get(handlers::get_attachment).delete(handlers::delete_attachment),
        )
        .route(
            "/attachments/:id/content",
            get(handlers::get_attachment_content),
        )
        // Budget revisions
        .route("/revisions", get(handlers::list_revisions))
        .route("/activities/:id/revisions", post(handlers::submit_revision))
        .route("/revisions/:id", get(handlers::get_revision))
        .route(
            "/revisions/:id/finance-approve",
            post(handlers::finance_approve_revision),
        )
        .route(
            "/revisions/:id/committee-approve",
            post(handlers::committee_approve_revision),
        )
        .route("/revisions/:id/reject", post(handlers::reject_revision))
        // Reporting and administration
        .route("/dashboard", get(handlers::dashboard))
        .route("/audit", get(handlers::list_audit))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        );

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_body_size))
        .layer(TraceLayer::new_for_http());

    if server.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit_trail::AuditTrail;
    use crate::blob::{content_key, MemoryBlobStore};
    use crate::notify::{BroadcastNotifier, WorkflowEvent};
    use crate::settings_cache::SettingsCache;
    use crate::storage::{ActivityStorage, InMemoryStorage, Storage, UserStorage};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use oversight_types::{ActivityId, Role, Settings, User};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        state: AppState,
        events: tokio::sync::broadcast::Receiver<WorkflowEvent>,
        admin: User,
        manager: User,
        other_manager: User,
        finance: User,
        committee: User,
        viewer: User,
    }

    async fn harness_with(settings: Settings) -> Harness {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());

        let admin = User::new("admin@example.org", "Admin", Role::Admin);
        let manager = User::new("manager@example.org", "Manager", Role::Manager);
        let other_manager = User::new("second@example.org", "Second Manager", Role::Manager);
        let finance = User::new("finance@example.org", "Finance", Role::Finance);
        let committee = User::new("committee@example.org", "Committee", Role::Committee);
        let viewer = User::new("viewer@example.org", "Viewer", Role::Viewer);
        for user in [&admin, &manager, &other_manager, &finance, &committee, &viewer] {
            storage.insert_user(user.clone()).await.unwrap();
        }

        let audit = Arc::new(AuditTrail::bootstrap(storage.clone()).await.unwrap());
        let cache = Arc::new(SettingsCache::new(
            storage.clone(),
            settings,
            Duration::from_secs(60),
        ));
        let notifier = Arc::new(BroadcastNotifier::new(64));
        let events = notifier.subscribe();

        let state = AppState::new(
            storage,
            Arc::new(MemoryBlobStore::new()),
            audit,
            cache,
            notifier,
        );

        Harness {
            app: create_router(state.clone(), &ServerConfig::default()),
            state,
            events,
            admin,
            manager,
            other_manager,
            finance,
            committee,
            viewer,
        }
    }

    async fn harness() -> Harness {
        harness_with(Settings::default()).await
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&User>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.id.to_string());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn upload_request(uri: &str, user: &User, bytes: &'static [u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("x-user-id", user.id.to_string())
            .header("content-type", "text/plain")
            .body(Body::from(bytes))
            .unwrap()
    }

    async fn upload(app: &Router, uri: &str, user: &User, bytes: &'static [u8]) -> (StatusCode, Value) {
        let response = app.clone().oneshot(upload_request(uri, user, bytes)).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create_activity(h: &Harness, budget_minor: i64) -> String {
        let (status, objective) = send(
            &h.app,
            "POST",
            "/api/v1/objectives",
            Some(&h.manager),
            Some(json!({
                "code": "WASH-1",
                "title": "Clean water access",
                "budget_minor": 50_000_000,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, activity) = send(
            &h.app,
            "POST",
            "/api/v1/activities",
            Some(&h.manager),
            Some(json!({
                "objective_id": objective["id"],
                "title": "Borehole drilling",
                "budget_minor": budget_minor,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        activity["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_needs_no_user() {
        let h = harness().await;
        let (status, body) = send(&h.app, "GET", "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["audit_chain_valid"], json!(true));
    }

    #[tokio::test]
    async fn missing_or_unknown_user_is_unauthorized() {
        let h = harness().await;
        let (status, _) = send(&h.app, "GET", "/api/v1/objectives", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let stranger = User::new("nobody@example.org", "Nobody", Role::Admin);
        let (status, _) = send(&h.app, "GET", "/api/v1/objectives", Some(&stranger), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn viewer_cannot_create_objectives() {
        let h = harness().await;
        let (status, body) = send(
            &h.app,
            "POST",
            "/api/v1/objectives",
            Some(&h.viewer),
            Some(json!({ "code": "X", "title": "X", "budget_minor": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], json!("FORBIDDEN"));
    }

    #[tokio::test]
    async fn deactivated_user_is_forbidden() {
        let h = harness().await;
        let uri = format!("/api/v1/users/{}", h.viewer.id);
        let (status, _) = send(&h.app, "DELETE", &uri, Some(&h.admin), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.app, "GET", "/api/v1/objectives", Some(&h.viewer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn large_revision_goes_through_both_stages() {
        let mut h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;

        // 1,000.00 is under the absolute threshold but doubles the budget
        let (status, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 200_000, "justification": "second rig" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revision["status"], json!("submitted"));
        assert_eq!(revision["auto_approved"], json!(false));
        let revision_id = revision["id"].as_str().unwrap().to_string();

        // A second open revision on the same activity is refused
        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 300_000 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/revisions/{revision_id}/finance-approve"),
            Some(&h.finance),
            Some(json!({ "note": "funds available" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revision["status"], json!("finance_approved"));

        let (_, activity) = send(
            &h.app,
            "GET",
            &format!("/api/v1/activities/{activity_id}"),
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(activity["budget_minor"], json!(100_000));

        let (status, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/revisions/{revision_id}/committee-approve"),
            Some(&h.committee),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revision["status"], json!("committee_approved"));
        assert_eq!(revision["applied"], json!(true));

        let (_, activity) = send(
            &h.app,
            "GET",
            &format!("/api/v1/activities/{activity_id}"),
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(activity["budget_minor"], json!(200_000));

        let mut names = Vec::new();
        while let Ok(event) = h.events.try_recv() {
            names.push(event.name());
        }
        assert_eq!(
            names,
            vec![
                "revision_submitted",
                "revision_finance_approved",
                "revision_committee_approved"
            ]
        );
    }

    #[tokio::test]
    async fn small_revision_is_auto_approved_and_applied() {
        let h = harness().await;
        let activity_id = create_activity(&h, 1_000_000).await;

        // 500.00 and 5%: inside both thresholds
        let (status, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 1_050_000, "justification": "fuel" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revision["auto_approved"], json!(true));
        assert_eq!(revision["status"], json!("committee_approved"));
        assert_eq!(revision["applied"], json!(true));

        let (_, activity) = send(
            &h.app,
            "GET",
            &format!("/api/v1/activities/{activity_id}"),
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(activity["budget_minor"], json!(1_050_000));
    }

    #[tokio::test]
    async fn decisions_out_of_order_conflict() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let (_, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 900_000 })),
        )
        .await;
        let revision_id = revision["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/revisions/{revision_id}/committee-approve"),
            Some(&h.committee),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/revisions/{revision_id}/finance-approve"),
            Some(&h.committee),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn rejection_requires_a_note() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let (_, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 900_000 })),
        )
        .await;
        let uri = format!("/api/v1/revisions/{}/reject", revision["id"].as_str().unwrap());

        let (status, _) = send(&h.app, "POST", &uri, Some(&h.finance), Some(json!({ "note": " " }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, revision) = send(
            &h.app,
            "POST",
            &uri,
            Some(&h.finance),
            Some(json!({ "note": "no procurement plan" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revision["status"], json!("rejected"));

        let (_, listed) = send(
            &h.app,
            "GET",
            "/api/v1/revisions?status=rejected",
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn held_lock_blocks_other_writers() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;

        let (status, activity) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/lock"),
            Some(&h.manager),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(activity["lock"]["state"], json!("held"));

        let spend = json!({ "amount_minor": 2_500, "spent_on": "2026-03-01" });
        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/spend"),
            Some(&h.other_manager),
            Some(spend.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/spend"),
            Some(&h.manager),
            Some(spend.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, activity) = send(
            &h.app,
            "DELETE",
            &format!("/api/v1/activities/{activity_id}/lock"),
            Some(&h.manager),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(activity["lock"]["state"], json!("unlocked"));

        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/spend"),
            Some(&h.other_manager),
            Some(spend),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn stale_version_update_conflicts() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let uri = format!("/api/v1/activities/{activity_id}");

        let (status, _) = send(
            &h.app,
            "PUT",
            &uri,
            Some(&h.manager),
            Some(json!({ "expected_version": 1, "title": "Deep borehole" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &h.app,
            "PUT",
            &uri,
            Some(&h.manager),
            Some(json!({ "expected_version": 1, "title": "Shallow well" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &h.app,
            "PUT",
            &uri,
            Some(&h.manager),
            Some(json!({ "expected_version": 2, "budget_minor": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn report_exports_as_csv() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/spend"),
            Some(&h.finance),
            Some(json!({
                "amount_minor": 12_345,
                "spent_on": "2026-02-14",
                "description": "Survey, phase 1",
            })),
        )
        .await;

        let (_, activity) = send(
            &h.app,
            "GET",
            &format!("/api/v1/activities/{activity_id}"),
            Some(&h.viewer),
            None,
        )
        .await;
        let uri = format!(
            "/api/v1/objectives/{}/report?format=csv",
            activity["objective_id"].as_str().unwrap()
        );

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("x-user-id", h.manager.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/csv"));

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let csv = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(csv.starts_with("record_type,objective_code,activity,date,description,budget,spent,remaining\r\n"));
        assert!(csv.contains("\"Survey, phase 1\""));
        assert!(csv.contains("123.45"));
    }

    #[tokio::test]
    async fn oversized_attachment_is_rejected() {
        let h = harness_with(Settings {
            max_attachment_bytes: 8,
            ..Settings::default()
        })
        .await;
        let activity_id = create_activity(&h, 100_000).await;

        let uri = format!("/api/v1/activities/{activity_id}/attachments?filename=quote.txt");

        let (status, _) = upload(&h.app, &uri, &h.manager, b"0123456789abcdef").await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

        let (status, attachment) = upload(&h.app, &uri, &h.manager, b"quote").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(attachment["size_bytes"], json!(5));

        let content_uri = format!(
            "/api/v1/attachments/{}/content",
            attachment["id"].as_str().unwrap()
        );
        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(content_uri)
                    .header("x-user-id", h.viewer.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"quote");
    }

    #[tokio::test]
    async fn audit_log_lists_mutations() {
        let h = harness().await;
        create_activity(&h, 100_000).await;

        let (status, _) = send(&h.app, "GET", "/api/v1/audit", Some(&h.viewer), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, page) = send(
            &h.app,
            "GET",
            "/api/v1/audit?order=asc",
            Some(&h.admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["chain_valid"], json!(true));
        assert_eq!(page["total"], json!(2));
        assert_eq!(page["items"][0]["action"], json!("objective.created"));
        assert_eq!(page["items"][1]["action"], json!("activity.created"));

        let (status, page) = send(
            &h.app,
            "GET",
            "/api/v1/audit?entity=activity",
            Some(&h.finance),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(page["total"], json!(1));

        let (status, _) = send(
            &h.app,
            "GET",
            "/api/v1/audit?entity=budget",
            Some(&h.admin),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn settings_changes_take_effect() {
        let h = harness().await;
        let (status, _) = send(
            &h.app,
            "PUT",
            "/api/v1/settings",
            Some(&h.manager),
            Some(json!({ "auto_approve_max_minor": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, settings) = send(
            &h.app,
            "PUT",
            "/api/v1/settings",
            Some(&h.admin),
            Some(json!({ "auto_approve_max_minor": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(settings["auto_approve_max_minor"], json!(0));

        let activity_id = create_activity(&h, 1_000_000).await;
        let (_, revision) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 1_000_100 })),
        )
        .await;
        assert_eq!(revision["auto_approved"], json!(false));
        assert_eq!(revision["status"], json!("submitted"));
    }

    #[tokio::test]
    async fn dashboard_totals_budgets() {
        let h = harness().await;
        create_activity(&h, 250_000).await;

        let (status, dashboard) = send(&h.app, "GET", "/api/v1/dashboard", Some(&h.viewer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["objective_count"], json!(1));
        assert_eq!(dashboard["total_budget_minor"], json!(50_000_000));
        assert_eq!(dashboard["total_allocated_minor"], json!(250_000));
    }

    #[tokio::test]
    async fn stale_lock_is_cleared_by_another_writer() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let id: ActivityId = activity_id.parse().unwrap();

        let mut stored = h.state.storage.get_activity(&id).await.unwrap().unwrap();
        let expected = stored.version;
        stored.locked_by_id = Some(h.other_manager.id);
        stored.locked_at = Some(chrono::Utc::now() - chrono::Duration::minutes(31));
        stored.touch(chrono::Utc::now());
        h.state.storage.update_activity(stored, expected).await.unwrap();

        let uri = format!("/api/v1/activities/{activity_id}");
        let (_, before) = send(&h.app, "GET", &uri, Some(&h.viewer), None).await;
        assert_eq!(before["lock"]["state"], json!("stale"));

        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/activities/{activity_id}/spend"),
            Some(&h.manager),
            Some(json!({ "amount_minor": 2_500, "spent_on": "2026-03-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, after) = send(&h.app, "GET", &uri, Some(&h.viewer), None).await;
        assert_eq!(after["lock"]["state"], json!("unlocked"));
        assert_eq!(after["locked_by_id"], Value::Null);
        assert_eq!(after["version"].as_u64().unwrap(), before["version"].as_u64().unwrap() + 1);

        let persisted = h.state.storage.get_activity(&id).await.unwrap().unwrap();
        assert!(persisted.locked_by_id.is_none());
        assert!(persisted.locked_at.is_none());
    }

    #[tokio::test]
    async fn deletes_are_refused_while_dependents_exist() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let activity_uri = format!("/api/v1/activities/{activity_id}");
        let (_, activity) = send(&h.app, "GET", &activity_uri, Some(&h.viewer), None).await;
        let objective_uri = format!(
            "/api/v1/objectives/{}",
            activity["objective_id"].as_str().unwrap()
        );
        let delete_activity_uri = format!(
            "{activity_uri}?expected_version={}",
            activity["version"].as_u64().unwrap()
        );

        let (status, _) = send(&h.app, "DELETE", &objective_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        // Spend blocks the activity; an attachment blocks the spend line
        let (status, spend) = send(
            &h.app,
            "POST",
            &format!("{activity_uri}/spend"),
            Some(&h.manager),
            Some(json!({ "amount_minor": 2_500, "spent_on": "2026-03-01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let spend_uri = format!("/api/v1/spend/{}", spend["id"].as_str().unwrap());

        let (status, _) = send(&h.app, "DELETE", &delete_activity_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, receipt) = upload(
            &h.app,
            &format!("{spend_uri}/attachments?filename=receipt.txt"),
            &h.manager,
            b"receipt",
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&h.app, "DELETE", &spend_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let receipt_uri = format!("/api/v1/attachments/{}", receipt["id"].as_str().unwrap());
        let (status, _) = send(&h.app, "DELETE", &receipt_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, deleted) = send(&h.app, "DELETE", &spend_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["deleted"], json!(true));

        // An attachment on the activity itself blocks it too
        let (status, quote) = upload(
            &h.app,
            &format!("{activity_uri}/attachments?filename=quote.txt"),
            &h.manager,
            b"quote",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(&h.app, "DELETE", &delete_activity_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let quote_uri = format!("/api/v1/attachments/{}", quote["id"].as_str().unwrap());
        let (status, _) = send(&h.app, "DELETE", &quote_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);

        // So does an open revision, until it is decided
        let (status, revision) = send(
            &h.app,
            "POST",
            &format!("{activity_uri}/revisions"),
            Some(&h.manager),
            Some(json!({ "proposed_budget_minor": 500_000, "justification": "more rigs" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revision["status"], json!("submitted"));
        let (status, _) = send(&h.app, "DELETE", &delete_activity_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(
            &h.app,
            "POST",
            &format!("/api/v1/revisions/{}/reject", revision["id"].as_str().unwrap()),
            Some(&h.finance),
            Some(json!({ "note": "not this quarter" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, deleted) =
            send(&h.app, "DELETE", &delete_activity_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["deleted"], json!(true));

        let (status, deleted) = send(&h.app, "DELETE", &objective_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted["deleted"], json!(true));
    }

    #[tokio::test]
    async fn admin_cannot_demote_or_deactivate_self() {
        let h = harness().await;
        let uri = format!("/api/v1/users/{}", h.admin.id);

        let (status, _) = send(&h.app, "PUT", &uri, Some(&h.admin), Some(json!({ "role": "viewer" }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&h.app, "PUT", &uri, Some(&h.admin), Some(json!({ "active": false }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&h.app, "DELETE", &uri, Some(&h.admin), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, me) = send(&h.app, "GET", "/api/v1/me", Some(&h.admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["role"], json!("admin"));
        assert_eq!(me["active"], json!(true));

        let (status, renamed) = send(
            &h.app,
            "PUT",
            &uri,
            Some(&h.admin),
            Some(json!({ "display_name": "Root", "role": "admin" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["display_name"], json!("Root"));
    }

    #[tokio::test]
    async fn shared_blob_outlives_its_first_reference() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let uri = format!("/api/v1/activities/{activity_id}/attachments?filename=scan.txt");

        let (_, first) = upload(&h.app, &uri, &h.manager, b"signed contract").await;
        let (_, second) = upload(&h.app, &uri, &h.manager, b"signed contract").await;
        assert_eq!(first["storage_key"], second["storage_key"]);
        let key = first["storage_key"].as_str().unwrap().to_string();

        let first_uri = format!("/api/v1/attachments/{}", first["id"].as_str().unwrap());
        let (status, _) = send(&h.app, "DELETE", &first_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.state.blobs.get(&key).await.unwrap().is_some());

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!(
                        "/api/v1/attachments/{}/content",
                        second["id"].as_str().unwrap()
                    ))
                    .header("x-user-id", h.viewer.id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let second_uri = format!("/api/v1/attachments/{}", second["id"].as_str().unwrap());
        let (status, _) = send(&h.app, "DELETE", &second_uri, Some(&h.manager), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(h.state.blobs.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_waits_while_its_blob_key_is_held() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let uri = format!("/api/v1/activities/{activity_id}/attachments?filename=receipt.txt");

        let held = h.state.blob_locks.acquire(&content_key(b"receipt")).await;
        let app = h.app.clone();
        let request = upload_request(&uri, &h.manager, b"receipt");
        let pending = tokio::spawn(async move { app.oneshot(request).await.unwrap().status() });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert!(h.state.blobs.get(&content_key(b"receipt")).await.unwrap().is_none());

        drop(held);
        assert_eq!(pending.await.unwrap(), StatusCode::OK);
        assert!(h.state.blobs.get(&content_key(b"receipt")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_submissions_leave_one_open_revision() {
        let h = harness().await;
        let activity_id = create_activity(&h, 100_000).await;
        let uri = format!("/api/v1/activities/{activity_id}/revisions");
        let body = json!({ "proposed_budget_minor": 900_000, "justification": "second phase" });

        let (a, b) = tokio::join!(
            send(&h.app, "POST", &uri, Some(&h.manager), Some(body.clone())),
            send(&h.app, "POST", &uri, Some(&h.other_manager), Some(body.clone())),
        );
        let mut statuses = [a.0.as_u16(), b.0.as_u16()];
        statuses.sort_unstable();
        assert_eq!(statuses, [200, 409]);

        let (_, open) = send(
            &h.app,
            "GET",
            &format!("/api/v1/revisions?activity_id={activity_id}&status=submitted"),
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(open.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn huge_budgets_do_not_break_summaries() {
        let h = harness().await;
        let (status, objective) = send(
            &h.app,
            "POST",
            "/api/v1/objectives",
            Some(&h.manager),
            Some(json!({ "code": "BIG-1", "title": "Large", "budget_minor": i64::MAX })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        for title in ["First", "Second"] {
            let (status, _) = send(
                &h.app,
                "POST",
                "/api/v1/activities",
                Some(&h.manager),
                Some(json!({
                    "objective_id": objective["id"],
                    "title": title,
                    "budget_minor": i64::MAX,
                })),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let objective_id = objective["id"].as_str().unwrap();
        let (status, summary) = send(
            &h.app,
            "GET",
            &format!("/api/v1/objectives/{objective_id}/summary"),
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["allocated_minor"], json!(i64::MAX));
        assert_eq!(summary["over_allocated"], json!(true));

        let (status, _) = send(
            &h.app,
            "GET",
            &format!("/api/v1/objectives/{objective_id}/report"),
            Some(&h.viewer),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, dashboard) = send(&h.app, "GET", "/api/v1/dashboard", Some(&h.viewer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dashboard["total_allocated_minor"], json!(i64::MAX));
    }
}
