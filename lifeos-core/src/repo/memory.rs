use crate::{
    AccessControl, CardEntry, CardId, CardLearningState, CoreError, Flashcard, ProjectId, UserId,
    Versioned,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Plain in-memory tables shared by the memory and file-backed stores. All
/// compare-and-swap and cascade rules live here.
#[derive(Clone, Debug, Default)]
pub struct StoreTables {
    pub cards: HashMap<CardId, Flashcard>,
    pub states: HashMap<(UserId, CardId), Versioned<CardLearningState>>,
    pub members: HashSet<(UserId, ProjectId)>,
}

impl StoreTables {
    pub fn insert_card(&mut self, card: Flashcard) {
        self.cards.insert(card.id, card);
    }

    pub fn get_card(&self, id: CardId) -> Result<Flashcard, CoreError> {
        self.cards.get(&id).cloned().ok_or(CoreError::NotFound("card"))
    }

    pub fn list_cards(&self, project_id: Option<ProjectId>) -> Vec<Flashcard> {
        let mut v: Vec<Flashcard> = self
            .cards
            .values()
            .filter(|c| project_id.map(|p| c.project_id == p).unwrap_or(true))
            .cloned()
            .collect();
        v.sort_by_key(|c| (c.created_at, c.id));
        v
    }

    pub fn delete_card(&mut self, id: CardId) -> Result<(), CoreError> {
        self.cards.remove(&id).ok_or(CoreError::NotFound("card"))?;
        self.states.retain(|(_, cid), _| *cid != id);
        Ok(())
    }

    pub fn get_state(&self, user_id: UserId, card_id: CardId) -> Versioned<CardLearningState> {
        self.states
            .get(&(user_id, card_id))
            .cloned()
            .unwrap_or_else(|| Versioned::new(CardLearningState::Unreviewed, 0))
    }

    pub fn put_state(
        &mut self,
        user_id: UserId,
        card_id: CardId,
        expected_version: u64,
        state: &CardLearningState,
    ) -> Result<u64, CoreError> {
        if !self.cards.contains_key(&card_id) {
            return Err(CoreError::NotFound("card"));
        }
        let current = self
            .states
            .get(&(user_id, card_id))
            .map(|v| v.version)
            .unwrap_or(0);
        if current != expected_version {
            return Err(CoreError::Conflict("learning state changed since it was read"));
        }
        let version = current + 1;
        self.states
            .insert((user_id, card_id), Versioned::new(state.clone(), version));
        Ok(version)
    }

    pub fn list_entries(&self, user_id: UserId, project_id: Option<ProjectId>) -> Vec<CardEntry> {
        self.list_cards(project_id)
            .into_iter()
            .map(|card| {
                let state = self.get_state(user_id, card.id);
                CardEntry { card, state }
            })
            .collect()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<StoreTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl crate::repo::CardStore for MemoryStore {
    async fn add_card(
        &self,
        project_id: ProjectId,
        front: &str,
        back: &str,
        hint: Option<&str>,
        tags: &[String],
        created_at: DateTime<Utc>,
    ) -> Result<Flashcard, CoreError> {
        let mut card = Flashcard::new(project_id, front, back, created_at);
        card.hint = hint.map(|s| s.to_string());
        card.tags = tags.to_vec();
        self.tables.write().insert_card(card.clone());
        Ok(card)
    }

    async fn get_card(&self, id: CardId) -> Result<Flashcard, CoreError> {
        self.tables.read().get_card(id)
    }

    async fn list_cards(&self, project_id: Option<ProjectId>) -> Result<Vec<Flashcard>, CoreError> {
        Ok(self.tables.read().list_cards(project_id))
    }

    async fn delete_card(&self, id: CardId) -> Result<(), CoreError> {
        self.tables.write().delete_card(id)
    }

    async fn get_state(
        &self,
        user_id: UserId,
        card_id: CardId,
    ) -> Result<Versioned<CardLearningState>, CoreError> {
        Ok(self.tables.read().get_state(user_id, card_id))
    }

    async fn put_state(
        &self,
        user_id: UserId,
        card_id: CardId,
        expected_version: u64,
        state: &CardLearningState,
    ) -> Result<u64, CoreError> {
        self.tables
            .write()
            .put_state(user_id, card_id, expected_version, state)
    }

    async fn list_entries(
        &self,
        user_id: UserId,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<CardEntry>, CoreError> {
        Ok(self.tables.read().list_entries(user_id, project_id))
    }
}

#[async_trait]
impl AccessControl for MemoryStore {
    async fn has_access(&self, user_id: UserId, project_id: ProjectId) -> Result<bool, CoreError> {
        Ok(self.tables.read().members.contains(&(user_id, project_id)))
    }

    async fn grant(&self, user_id: UserId, project_id: ProjectId) -> Result<(), CoreError> {
        self.tables.write().members.insert((user_id, project_id));
        Ok(())
    }
}
