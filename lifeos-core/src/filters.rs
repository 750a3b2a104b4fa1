use crate::{CardEntry, LearningStage};
use chrono::NaiveDate;

pub fn filter_by_text(entries: &[CardEntry], query: &str) -> Vec<CardEntry> {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return entries.to_vec();
    }
    entries
        .iter()
        .filter(|e| {
            let c = &e.card;
            c.front.to_lowercase().contains(&q)
                || c.back.to_lowercase().contains(&q)
                || c.hint
                    .as_ref()
                    .map(|h| h.to_lowercase().contains(&q))
                    .unwrap_or(false)
                || c.tags.iter().any(|t| t.to_lowercase().contains(&q))
        })
        .cloned()
        .collect()
}

pub fn filter_by_tag(entries: &[CardEntry], tag: &str) -> Vec<CardEntry> {
    let q = tag.trim().to_lowercase();
    entries
        .iter()
        .filter(|e| e.card.tags.iter().any(|t| t.to_lowercase() == q))
        .cloned()
        .collect()
}

pub fn filter_by_stage(entries: &[CardEntry], want: LearningStage) -> Vec<CardEntry> {
    entries
        .iter()
        .filter(|e| e.state.value.stage() == want)
        .cloned()
        .collect()
}

pub fn filter_due(entries: &[CardEntry], today: NaiveDate) -> Vec<CardEntry> {
    entries
        .iter()
        .filter(|e| e.state.value.is_due(today))
        .cloned()
        .collect()
}

/// Cards to review now: due cards by schedule date, then (optionally) new
/// cards by creation time, truncated to `max`.
pub fn review_queue(
    entries: &[CardEntry],
    today: NaiveDate,
    include_new: bool,
    max: Option<usize>,
) -> Vec<CardEntry> {
    let mut due = filter_due(entries, today);
    due.sort_by_key(|e| (e.state.value.next_review_on(), e.card.created_at));

    if include_new {
        let mut fresh = filter_by_stage(entries, LearningStage::New);
        fresh.sort_by_key(|e| e.card.created_at);
        due.extend(fresh);
    }
    if let Some(m) = max {
        due.truncate(m);
    }
    due
}
