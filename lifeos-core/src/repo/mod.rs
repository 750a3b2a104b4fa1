use crate::{
    CardEntry, CardId, CardLearningState, CoreError, Flashcard, ProjectId, UserId, Versioned,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub mod memory;

#[async_trait]
pub trait CardStore: Send + Sync {
    // Cards
    async fn add_card(
        &self,
        project_id: ProjectId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<Flashcard, CoreError>;

    async fn get_card(&self, id: CardId) -> Result<Flashcard, CoreError>;
    async fn list_cards(&self, project_id: Option<ProjectId>) -> Result<Vec<Flashcard>, CoreError>;
    /// Removes the card and every learner's state on it.
    async fn delete_card(&self, id: CardId) -> Result<(), CoreError>;

    // Learning states
    /// A missing row reads as `Unreviewed` at version 0.
    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Versioned<CardLearningState>, CoreError>;

    /// Writes `state` only if the stored version still equals
    /// `expected_version`; returns the new version, or `Conflict`.
    async fn put_state(
        &self,
        user_id: UserId,
        card_id: CardId,
        expected_version: u64,
        state: &CardLearningState,
    ) -> Result<u64, CoreError>;

    async fn list_entries(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<CardEntry>, CoreError>;
}
