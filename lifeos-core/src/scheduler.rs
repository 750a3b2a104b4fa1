//! SM-2 review scheduler.
//!
//! Ratings use the canonical `0..=3` scale (`Again`, `Hard`, `Good`, `Easy`);
//! anything below `Good` is a lapse. The 0-5 scale used by classic SM-2 is not
//! accepted.

use std::fmt;

use chrono::{DateTime, Days, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    CardLearningState, CoreError, Grade, LearningStage, ReviewedState, EF_DEFAULT, EF_MIN,
    INTERVAL_DEFAULT, MAX_INTERVAL_DAYS, MAX_RATING,
};

/// Ease subtracted from a card on every lapse.
pub const LAPSE_EASE_PENALTY: f64 = 0.2;

fn clamp_ef(x: f64) -> f64 {
    x.max(EF_MIN)
}

/// Classic SM-2 ease delta for a passing rating.
fn ease_delta(grade: Grade) -> f64 {
    let d = (MAX_RATING - grade.as_score()) as f64;
    0.1 - d * (0.08 + d * 0.02)
}

/// Computes the state that follows `previous` after a review rated `grade` at
/// `now`. The input is never modified.
pub fn schedule(
    previous: &CardLearningState,
    grade: Grade,
    now: DateTime<Utc>,
) -> Result<ReviewedState, CoreError> {
    previous.validate()?;

    let (reps, interval, ef, total_reviews, total_correct) = match previous {
        CardLearningState::Unreviewed => (0, INTERVAL_DEFAULT, EF_DEFAULT, 0, 0),
        CardLearningState::Reviewed(s) => (
            s.repetitions,
            s.interval_days,
            s.ease_factor,
            s.total_reviews,
            s.total_correct,
        ),
    };

    let (new_reps, new_interval, new_ef, stage) = if grade.is_lapse() {
        (
            0,
            1,
            clamp_ef(ef - LAPSE_EASE_PENALTY),
            LearningStage::Learning,
        )
    } else {
        let new_ef = clamp_ef(ef + ease_delta(grade));
        let new_reps = reps.saturating_add(1);
        let new_interval = match new_reps {
            1 => 1,
            2 => 6,
            _ => (interval.max(1) as f64 * new_ef)
                .round()
                .clamp(1.0, MAX_INTERVAL_DAYS as f64) as u32,
        };
        (
            new_reps,
            new_interval,
            new_ef,
            LearningStage::classify(new_reps, new_interval),
        )
    };

    // Intervals are capped, so this only fails for a clock near the end of time.
    let next_review_on = now
        .date_naive()
        .checked_add_days(Days::new(u64::from(new_interval)))
        .ok_or(CoreError::InvalidArgument("review time out of range"))?;

    Ok(ReviewedState {
        repetitions: new_reps,
        interval_days: new_interval,
        ease_factor: new_ef,
        learning_stage: stage,
        next_review_on,
        total_reviews: total_reviews.saturating_add(1),
        total_correct: total_correct.saturating_add(u32::from(!grade.is_lapse())),
        last_reviewed_at: now,
    })
}

/// Like [`schedule`], for an integer rating supplied by a caller.
pub fn schedule_score(
    previous: &CardLearningState,
    score: i64,
    now: DateTime<Utc>,
) -> Result<ReviewedState, CoreError> {
    let grade = Grade::from_score(score)?;
    schedule(previous, grade, now)
}

/// Presentational summary of one review.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ReviewSummary {
    pub rating: Grade,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetitions: u32,
}

impl ReviewSummary {
    pub fn new(rating: Grade, state: &ReviewedState) -> Self {
        Self {
            rating,
            interval_days: state.interval_days,
            ease_factor: state.ease_factor,
            repetitions: state.repetitions,
        }
    }
}

impl fmt::Display for ReviewSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rated {:?} ({}); next review in {} day(s), ease {:.2}, streak {}",
            self.rating,
            self.rating.as_score(),
            self.interval_days,
            self.ease_factor,
            self.repetitions
        )
    }
}
