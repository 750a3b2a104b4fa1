use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    filters::review_queue, schedule, stats::upcoming, summarize, AccessControl, CardEntry, CardId,
    CardLearningState, CardStore, Clock, CoreError, DeckStats, Flashcard, Grade, ProjectId,
    ReviewSummary, ReviewedState, UserId, MAX_FORECAST_DAYS,
};

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Extra attempts after a compare-and-swap conflict before giving up.
    pub max_conflict_retries: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewOutcome {
    pub card_id: CardId,
    pub state: ReviewedState,
    pub version: u64,
    pub summary: ReviewSummary,
}

/// Review submission and read-side queries for one learner at a time.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn CardStore>,
    access: Arc<dyn AccessControl>,
    clock: Arc<dyn Clock>,
    config: ServiceConfig,
}

impl ReviewService {
    pub fn new(
        store: Arc<dyn CardStore>,
        access: Arc<dyn AccessControl>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            access,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn CardStore> {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    async fn ensure_access(&self, user_id: UserId, project_id: ProjectId) -> Result<(), CoreError> {
        if self.access.has_access(user_id, project_id).await? {
            Ok(())
        } else {
            Err(CoreError::Forbidden("not a member of this project"))
        }
    }

    pub async fn submit_review(
        &self,
        user_id: UserId,
        card_id: CardId,
        score: i64,
    ) -> Result<ReviewOutcome, CoreError> {
        let grade = Grade::from_score(score)?;
        let card = self.store.get_card(card_id).await?;
        self.ensure_access(user_id, card.project_id).await?;

        let mut retries = 0;
        loop {
            let current = self.store.get_state(user_id, card_id).await?;
            let next = schedule(&current.value, grade, self.clock.now())?;
            let written = CardLearningState::Reviewed(next.clone());
            match self
                .store
                .put_state(user_id, card_id, current.version, &written)
                .await
            {
                Ok(version) => {
                    let summary = ReviewSummary::new(grade, &next);
                    debug!(%user_id, %card_id, version, "{summary}");
                    return Ok(ReviewOutcome {
                        card_id,
                        state: next,
                        version,
                        summary,
                    });
                }
                Err(CoreError::Conflict(_)) if retries < self.config.max_conflict_retries => {
                    retries += 1;
                    warn!(%user_id, %card_id, retries, "review raced another write; retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn add_card(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
    ) -> Result<Flashcard, CoreError> {
        self.ensure_access(user_id, project_id).await?;
        if front.trim().is_empty() || back.trim().is_empty() {
            return Err(CoreError::InvalidArgument("card front and back must not be empty"));
        }
        self.store
            .add_card(project_id, front, back, hint, tags, self.clock.now())
            .await
    }

    pub async fn delete_card(&self, user_id: UserId, card_id: CardId) -> Result<(), CoreError> {
        let card = self.store.get_card(card_id).await?;
        self.ensure_access(user_id, card.project_id).await?;
        self.store.delete_card(card_id).await
    }

    pub async fn entries(
        &self,
        user_id: UserId,
        project_id: ProjectId,
    ) -> Result<Vec<CardEntry>, CoreError> {
        self.ensure_access(user_id, project_id).await?;
        self.store.list_entries(user_id, Some(project_id)).await
    }

    pub async fn due_cards(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        include_new: bool,
        max: Option<usize>,
    ) -> Result<Vec<CardEntry>, CoreError> {
        let entries = self.entries(user_id, project_id).await?;
        Ok(review_queue(&entries, self.today(), include_new, max))
    }

    pub async fn stats(&self, user_id: UserId, project_id: ProjectId) -> Result<DeckStats, CoreError> {
        let entries = self.entries(user_id, project_id).await?;
        Ok(summarize(entries.iter().map(|e| &e.state.value), self.today()))
    }

    pub async fn forecast(
        &self,
        user_id: UserId,
        project_id: ProjectId,
        days: u32,
    ) -> Result<BTreeMap<NaiveDate, u32>, CoreError> {
        if days > MAX_FORECAST_DAYS {
            return Err(CoreError::InvalidArgument("forecast window longer than a year"));
        }
        let entries = self.entries(user_id, project_id).await?;
        Ok(upcoming(
            entries.iter().map(|e| &e.state.value),
            self.today(),
            days,
        ))
    }
}
