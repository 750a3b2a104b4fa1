use axum::{
    routing::{get, post},
    Router,
};
use lifeos_core::ReviewService;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes::{due_cards, post_review, stats, AppState};

pub fn router(service: ReviewService) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/due", get(due_cards))
        .route("/stats", get(stats))
        .route("/review", post(post_review))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(service: ReviewService, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(service);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "api listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use lifeos_core::{memory::MemoryStore, AccessControl, FixedClock, ServiceConfig};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn app() -> (Router, Uuid, Uuid, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        store.grant(user, project).await.unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let service = ReviewService::new(
            store.clone(),
            store,
            Arc::new(FixedClock(now)),
            ServiceConfig::default(),
        );
        let card = service
            .add_card(user, project, "hola", "hello", None, &[])
            .await
            .unwrap();
        (router(service), user, project, card.id)
    }

    fn review(user: Uuid, card: Uuid, rating: i64) -> Request<Body> {
        let body = serde_json::json!({ "user_id": user, "card_id": card, "rating": rating });
        Request::post("/review")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn review_returns_new_state() {
        let (app, user, _, card) = app().await;
        let res = app.oneshot(review(user, card, 3)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["version"], 1);
        assert_eq!(v["state"]["repetitions"], 1);
        assert_eq!(v["state"]["next_review_on"], "2026-03-11");
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let (app, user, _, card) = app().await;

        let res = app.clone().oneshot(review(user, card, 9)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = app.clone().oneshot(review(Uuid::new_v4(), card, 2)).await.unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);

        let res = app.oneshot(review(user, Uuid::new_v4(), 2)).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stats_counts_new_cards() {
        let (app, user, project, _) = app().await;
        let uri = format!("/stats?user_id={user}&project_id={project}");
        let res = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["total"], 1);
        assert_eq!(v["new"], 1);
        assert_eq!(v["due"], 0);
    }

    #[tokio::test]
    async fn stats_rejects_oversized_forecast() {
        let (app, user, project, _) = app().await;
        let uri = format!("/stats?user_id={user}&project_id={project}&days=4294967295");
        let res = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
