use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use lifeos_core::{CoreError, ReviewService};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::api::dto::{CardOut, ReviewIn, ReviewOut, StatsOut};

#[derive(Clone)]
pub struct AppState {
    pub service: ReviewService,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn reject(e: CoreError) -> (StatusCode, String) {
    let code = match e {
        CoreError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if code.is_server_error() {
        warn!("request failed: {e}");
    }
    (code, e.to_string())
}

#[derive(Deserialize)]
pub struct DueQuery {
    user_id: Uuid,
    project_id: Uuid,
    include_new: Option<bool>,
    max: Option<usize>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    user_id: Uuid,
    project_id: Uuid,
    days: Option<u32>,
}

pub async fn due_cards(State(st): State<Arc<AppState>>, Query(q): Query<DueQuery>) -> ApiResult<Vec<CardOut>> {
    let pool = st
        .service
        .due_cards(q.user_id, q.project_id, q.include_new.unwrap_or(false), q.max)
        .await
        .map_err(reject)?;
    Ok(Json(pool.into_iter().map(CardOut::from).collect()))
}

pub async fn stats(State(st): State<Arc<AppState>>, Query(q): Query<StatsQuery>) -> ApiResult<StatsOut> {
    let counts = st.service.stats(q.user_id, q.project_id).await.map_err(reject)?;
    let upcoming = st
        .service
        .forecast(q.user_id, q.project_id, q.days.unwrap_or(7))
        .await
        .map_err(reject)?;
    Ok(Json(StatsOut {
        mature: counts.mature(),
        accuracy: counts.accuracy(),
        counts,
        upcoming,
    }))
}

pub async fn post_review(State(st): State<Arc<AppState>>, Json(body): Json<ReviewIn>) -> ApiResult<ReviewOut> {
    let out = st
        .service
        .submit_review(body.user_id, body.card_id, body.rating)
        .await
        .map_err(reject)?;
    Ok(Json(out.into()))
}
