use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreError;

pub type CardId = Uuid;
pub type ProjectId = Uuid;
pub type UserId = Uuid;

pub const EF_MIN: f64 = 1.3;
pub const EF_DEFAULT: f64 = 2.5;
pub const INTERVAL_DEFAULT: u32 = 1;

/// Lowest accepted rating on the canonical scale.
pub const MIN_RATING: i64 = 0;
/// Highest accepted rating on the canonical scale.
pub const MAX_RATING: i64 = 3;
/// Ratings below this count as a lapse.
pub const PASSING_RATING: i64 = 2;

/// Interval (days) at which a card is classified as mastered.
pub const MASTERED_INTERVAL: u32 = 21;
/// Interval (days) at which a card leaves the learning stage.
pub const REVIEW_INTERVAL: u32 = 6;
/// Longest interval the scheduler will assign, about a hundred years.
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// A learner's rating of one review, ordered worst to best.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Again,
    Hard,
    Good,
    Easy,
}

impl Grade {
    pub fn as_score(&self) -> i64 {
        match self {
            Grade::Again => 0,
            Grade::Hard => 1,
            Grade::Good => 2,
            Grade::Easy => 3,
        }
    }

    /// Maps an integer rating onto the canonical `0..=3` scale. Out-of-range
    /// ratings are rejected, never clamped.
    pub fn from_score(score: i64) -> Result<Self, CoreError> {
        match score {
            0 => Ok(Grade::Again),
            1 => Ok(Grade::Hard),
            2 => Ok(Grade::Good),
            3 => Ok(Grade::Easy),
            _ => Err(CoreError::InvalidArgument("rating must be within 0..=3")),
        }
    }

    pub fn is_lapse(&self) -> bool {
        self.as_score() < PASSING_RATING
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LearningStage {
    New,
    Learning,
    Review,
    Mastered,
}

impl LearningStage {
    /// Stage of a reviewed card. Depends only on the two arguments, so two
    /// histories ending in the same `(repetitions, interval_days)` agree.
    pub fn classify(repetitions: u32, interval_days: u32) -> Self {
        if repetitions == 0 {
            LearningStage::Learning
        } else if interval_days >= MASTERED_INTERVAL {
            LearningStage::Mastered
        } else if interval_days >= REVIEW_INTERVAL {
            LearningStage::Review
        } else {
            LearningStage::Learning
        }
    }

    pub fn is_mature(&self) -> bool {
        matches!(self, LearningStage::Review | LearningStage::Mastered)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewedState {
    pub repetitions: u32,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub learning_stage: LearningStage,
    pub next_review_on: NaiveDate,
    pub total_reviews: u32,
    pub total_correct: u32,
    pub last_reviewed_at: DateTime<Utc>,
}

impl ReviewedState {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval_days < 1 {
            return Err(CoreError::InvalidArgument("interval must be at least one day"));
        }
        if !self.ease_factor.is_finite() || self.ease_factor < EF_MIN {
            return Err(CoreError::InvalidArgument("ease factor below floor"));
        }
        if self.total_correct > self.total_reviews {
            return Err(CoreError::InvalidArgument("more correct reviews than reviews"));
        }
        if self.learning_stage != LearningStage::classify(self.repetitions, self.interval_days) {
            return Err(CoreError::InvalidArgument("learning stage disagrees with schedule"));
        }
        Ok(())
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.next_review_on <= today
    }
}

/// Learning progress of one learner on one flashcard.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CardLearningState {
    #[default]
    Unreviewed,
    Reviewed(ReviewedState),
}

impl CardLearningState {
    pub fn reviewed(&self) -> Option<&ReviewedState> {
        match self {
            CardLearningState::Unreviewed => None,
            CardLearningState::Reviewed(s) => Some(s),
        }
    }

    pub fn stage(&self) -> LearningStage {
        match self {
            CardLearningState::Unreviewed => LearningStage::New,
            CardLearningState::Reviewed(s) => s.learning_stage,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, CardLearningState::Unreviewed)
    }

    /// Unreviewed cards have no schedule and are never due.
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.reviewed().map(|s| s.is_due(today)).unwrap_or(false)
    }

    pub fn next_review_on(&self) -> Option<NaiveDate> {
        self.reviewed().map(|s| s.next_review_on)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            CardLearningState::Unreviewed => Ok(()),
            CardLearningState::Reviewed(s) => s.validate(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Flashcard {
    pub id: CardId,
    pub project_id: ProjectId,
    pub front: String,
    pub back: String,
    pub hint: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Flashcard {
    pub fn new(
        project_id: ProjectId,
        front: impl Into<String>,
        back: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            front: front.into(),
            back: back.into(),
            hint: None,
            tags: Vec::new(),
            created_at,
        }
    }
}

/// A stored value with the version it was read at. Version 0 means the value
/// has never been written.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

impl<T> Versioned<T> {
    pub fn new(value: T, version: u64) -> Self {
        Self { value, version }
    }
}

/// A card together with one learner's state on it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CardEntry {
    pub card: Flashcard,
    pub state: Versioned<CardLearningState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_repetitions_never_mastered() {
        assert_eq!(LearningStage::classify(0, 40), LearningStage::Learning);
        assert_eq!(LearningStage::classify(1, 40), LearningStage::Mastered);
        assert_eq!(LearningStage::classify(2, 6), LearningStage::Review);
        assert_eq!(LearningStage::classify(1, 1), LearningStage::Learning);
    }

    #[test]
    fn validate_rejects_stage_mismatch() {
        let state = ReviewedState {
            repetitions: 0,
            interval_days: 30,
            ease_factor: EF_DEFAULT,
            learning_stage: LearningStage::Mastered,
            next_review_on: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            total_reviews: 4,
            total_correct: 3,
            last_reviewed_at: DateTime::<Utc>::UNIX_EPOCH,
        };
        assert!(matches!(state.validate(), Err(CoreError::InvalidArgument(_))));

        let fixed = ReviewedState {
            learning_stage: LearningStage::Learning,
            ..state
        };
        assert!(fixed.validate().is_ok());
    }

    #[test]
    fn grade_scale() {
        assert_eq!(Grade::from_score(3), Ok(Grade::Easy));
        assert!(Grade::from_score(4).is_err());
        assert!(Grade::from_score(-1).is_err());
        assert!(Grade::Hard.is_lapse());
        assert!(!Grade::Good.is_lapse());
    }

    #[test]
    fn state_serializes_with_status_tag() {
        let json = serde_json::to_value(CardLearningState::Unreviewed).unwrap();
        assert_eq!(json["status"], "unreviewed");
        let back: CardLearningState = serde_json::from_value(json).unwrap();
        assert!(back.is_new());
    }
}
