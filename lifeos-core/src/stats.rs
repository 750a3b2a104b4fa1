use crate::{CardLearningState, LearningStage};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DeckStats {
    pub total: u32,
    pub due: u32,
    pub new: u32,
    pub learning: u32,
    pub review: u32,
    pub mastered: u32,
    pub total_reviews: u64,
    pub total_correct: u64,
}

impl DeckStats {
    pub fn record(&mut self, state: &CardLearningState, today: NaiveDate) {
        self.total += 1;
        if state.is_due(today) {
            self.due += 1;
        }
        match state.stage() {
            LearningStage::New => self.new += 1,
            LearningStage::Learning => self.learning += 1,
            LearningStage::Review => self.review += 1,
            LearningStage::Mastered => self.mastered += 1,
        }
        if let Some(s) = state.reviewed() {
            self.total_reviews += u64::from(s.total_reviews);
            self.total_correct += u64::from(s.total_correct);
        }
    }

    pub fn mature(&self) -> u32 {
        self.review + self.mastered
    }

    pub fn accuracy(&self) -> f64 {
        if self.total_reviews == 0 {
            0.0
        } else {
            self.total_correct as f64 / self.total_reviews as f64
        }
    }
}

pub fn summarize<'a, I>(states: I, today: NaiveDate) -> DeckStats
where
    I: IntoIterator<Item = &'a CardLearningState>,
{
    let mut stats = DeckStats::default();
    for s in states {
        stats.record(s, today);
    }
    stats
}

/// Longest forecast window, in days.
pub const MAX_FORECAST_DAYS: u32 = 366;

/// Number of cards falling due on each of the `days` dates starting at
/// `today`, capped at [`MAX_FORECAST_DAYS`]. Overdue cards are counted on `today`.
pub fn upcoming<'a, I>(states: I, today: NaiveDate, days: u32) -> BTreeMap<NaiveDate, u32>
where
    I: IntoIterator<Item = &'a CardLearningState>,
{
    let mut map = BTreeMap::new();
    let mut day = today;
    for _ in 0..days.min(MAX_FORECAST_DAYS) {
        map.insert(day, 0);
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    for on in states.into_iter().filter_map(|s| s.next_review_on()) {
        let key = on.max(today);
        if let Some(count) = map.get_mut(&key) {
            *count += 1;
        }
    }
    map
}
