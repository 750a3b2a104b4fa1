use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use lifeos_core::{
    filter_by_stage, filter_by_tag, filter_by_text, review_queue, summarize, upcoming, CardEntry,
    CardLearningState, Flashcard, LearningStage, ReviewedState, Versioned, MAX_FORECAST_DAYS,
};
use uuid::Uuid;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn due_on(on: NaiveDate, reps: u32, interval: u32) -> CardLearningState {
    CardLearningState::Reviewed(ReviewedState {
        repetitions: reps,
        interval_days: interval,
        ease_factor: 2.5,
        learning_stage: LearningStage::classify(reps, interval),
        next_review_on: on,
        total_reviews: reps,
        total_correct: reps,
        last_reviewed_at: now() - Duration::days(interval as i64),
    })
}

fn entry(front: &str, state: CardLearningState, age_days: i64) -> CardEntry {
    let card = Flashcard::new(Uuid::nil(), front, "back", now() - Duration::days(age_days));
    CardEntry {
        card,
        state: Versioned::new(state, 1),
    }
}

#[test]
fn due_count_is_inclusive_of_today() {
    let today = now().date_naive();
    let states = vec![
        due_on(today - Duration::days(1), 1, 1),
        due_on(today, 2, 6),
        due_on(today + Duration::days(1), 3, 15),
    ];
    let stats = summarize(&states, today);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.due, 2);
}

#[test]
fn due_count_matches_predicate_on_synthetic_set() {
    let today = now().date_naive();
    let states: Vec<CardLearningState> = (-10..10)
        .map(|offset| due_on(today + Duration::days(offset * 3), 2, 6))
        .chain(std::iter::once(CardLearningState::Unreviewed))
        .collect();
    let expected = states
        .iter()
        .filter(|s| s.next_review_on().map(|d| d <= today).unwrap_or(false))
        .count() as u32;
    assert_eq!(summarize(&states, today).due, expected);
}

#[test]
fn stage_counts_and_accuracy() {
    let today = now().date_naive();
    let states = vec![
        CardLearningState::Unreviewed,
        CardLearningState::Unreviewed,
        due_on(today, 1, 1),
        due_on(today, 2, 6),
        due_on(today, 4, 30),
        due_on(today, 0, 1),
    ];
    let stats = summarize(&states, today);
    assert_eq!(stats.new, 2);
    assert_eq!(stats.learning, 2);
    assert_eq!(stats.review, 1);
    assert_eq!(stats.mastered, 1);
    assert_eq!(stats.mature(), 2);
    assert_eq!(stats.due, 4);
    assert_eq!(stats.total_reviews, 7);
    assert!((stats.accuracy() - 1.0).abs() < 1e-9);
}

#[test]
fn forecast_buckets_overdue_on_today() {
    let today = now().date_naive();
    let states = vec![
        due_on(today - Duration::days(3), 1, 1),
        due_on(today, 1, 1),
        due_on(today + Duration::days(2), 2, 6),
        due_on(today + Duration::days(40), 4, 30),
    ];
    let f = upcoming(&states, today, 7);
    assert_eq!(f.len(), 7);
    assert_eq!(f[&today], 2);
    assert_eq!(f[&(today + Duration::days(2))], 1);
    assert_eq!(f.values().sum::<u32>(), 3);
}

#[test]
fn forecast_window_is_capped() {
    let today = now().date_naive();
    let states = vec![due_on(today, 1, 1)];
    let f = upcoming(&states, today, u32::MAX);
    assert_eq!(f.len(), MAX_FORECAST_DAYS as usize);
    assert_eq!(f.values().sum::<u32>(), 1);
}

#[test]
fn queue_orders_due_then_new() {
    let today = now().date_naive();
    let entries = vec![
        entry("later", due_on(today, 2, 6), 5),
        entry("fresh", CardLearningState::Unreviewed, 1),
        entry("overdue", due_on(today - Duration::days(2), 1, 1), 2),
        entry("future", due_on(today + Duration::days(4), 2, 6), 9),
    ];

    let q = review_queue(&entries, today, false, None);
    let fronts: Vec<&str> = q.iter().map(|e| e.card.front.as_str()).collect();
    assert_eq!(fronts, vec!["overdue", "later"]);

    let q = review_queue(&entries, today, true, Some(3));
    let fronts: Vec<&str> = q.iter().map(|e| e.card.front.as_str()).collect();
    assert_eq!(fronts, vec!["overdue", "later", "fresh"]);
}

#[test]
fn text_tag_and_stage_filters() {
    let today = now().date_naive();
    let mut tagged = entry("hola", CardLearningState::Unreviewed, 1);
    tagged.card.tags = vec!["spanish".into()];
    let entries = vec![tagged, entry("adios", due_on(today, 2, 6), 1)];

    assert_eq!(filter_by_text(&entries, "HOL").len(), 1);
    assert_eq!(filter_by_text(&entries, "  ").len(), 2);
    assert_eq!(filter_by_tag(&entries, "Spanish")[0].card.front, "hola");
    assert_eq!(filter_by_stage(&entries, LearningStage::Review)[0].card.front, "adios");
}
