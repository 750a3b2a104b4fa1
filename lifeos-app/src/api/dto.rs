use chrono::NaiveDate;
use lifeos_core::{CardEntry, DeckStats, LearningStage, ReviewOutcome, ReviewedState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ReviewIn {
    pub user_id: Uuid,
    pub card_id: Uuid,
    pub rating: i64,
}

#[derive(Serialize)]
pub struct ReviewOut {
    pub card_id: Uuid,
    pub version: u64,
    pub state: ReviewedState,
    pub summary: String,
}

impl From<ReviewOutcome> for ReviewOut {
    fn from(o: ReviewOutcome) -> Self {
        Self {
            card_id: o.card_id,
            version: o.version,
            summary: o.summary.to_string(),
            state: o.state,
        }
    }
}

#[derive(Serialize)]
pub struct CardOut {
    pub id: Uuid,
    pub project_id: Uuid,
    pub front: String,
    pub back: String,
    pub hint: Option<String>,
    pub tags: Vec<String>,
    pub stage: LearningStage,
    pub next_review_on: Option<NaiveDate>,
}

impl From<CardEntry> for CardOut {
    fn from(e: CardEntry) -> Self {
        Self {
            stage: e.state.value.stage(),
            next_review_on: e.state.value.next_review_on(),
            id: e.card.id,
            project_id: e.card.project_id,
            front: e.card.front,
            back: e.card.back,
            hint: e.card.hint,
            tags: e.card.tags,
        }
    }
}

#[derive(Serialize)]
pub struct StatsOut {
    #[serde(flatten)]
    pub counts: DeckStats,
    pub mature: u32,
    pub accuracy: f64,
    pub upcoming: BTreeMap<NaiveDate, u32>,
}
