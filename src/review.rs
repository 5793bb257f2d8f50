use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, TimeZone, Utc};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::scheduler::{self, Difficulty};
use crate::vocab::{HSK_LEVELS, Vocabulary};

/// Read access to the review fields of a stored item.
pub trait Reviewable {
    fn review_count(&self) -> u32;
    fn last_reviewed(&self) -> Option<&DateTime<Utc>>;
    fn next_review(&self) -> Option<&DateTime<Utc>>;
}

impl Reviewable for Vocabulary {
    fn review_count(&self) -> u32 {
        self.review_count
    }

    fn last_reviewed(&self) -> Option<&DateTime<Utc>> {
        self.last_reviewed.as_ref()
    }

    fn next_review(&self) -> Option<&DateTime<Utc>> {
        self.next_review.as_ref()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReviewSummary {
    /// Items due now, including everything overdue from earlier days.
    pub due_today: usize,
    pub reviewed_today: usize,
    pub total_reviews: u64,
}

/// Emitted once per recorded review; consumed by the streak tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewEvent {
    pub item_id: String,
    pub difficulty: Difficulty,
    pub interval: u32,
    pub at: DateTime<Utc>,
}

pub struct ReviewItem {
    pub item_index: usize,
    pub prompt: String,
    pub answer: String,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub total: usize,
    pub due: usize,
    pub mastered: usize,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct HskProgress {
    pub level: u8,
    pub total: usize,
    pub mastered: usize,
}

fn same_day<Tz: TimeZone>(t: &DateTime<Utc>, now: &DateTime<Tz>) -> bool {
    t.with_timezone(&now.timezone()).date_naive() == now.date_naive()
}

pub fn summarize_reviews<T: Reviewable, Tz: TimeZone>(
    items: &[T],
    now: &DateTime<Tz>,
) -> ReviewSummary {
    items
        .iter()
        .fold(ReviewSummary::default(), |mut summary, item| {
            if scheduler::is_due(item.next_review(), now) {
                summary.due_today += 1;
            }
            if item.last_reviewed().is_some_and(|t| same_day(t, now)) {
                summary.reviewed_today += 1;
            }
            summary.total_reviews += u64::from(item.review_count());
            summary
        })
}

pub fn filter_due<T: Reviewable, Tz: TimeZone>(items: &[T], now: &DateTime<Tz>) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| scheduler::is_due(item.next_review(), now))
        .map(|(i, _)| i)
        .collect()
}

/// Schedules `item` from its current fields and commits the result together
/// with the review count increment. `mastered` is left alone when `None`.
pub fn record_review<Tz: TimeZone>(
    item: &mut Vocabulary,
    difficulty: Difficulty,
    mastered: Option<bool>,
    now: &DateTime<Tz>,
) -> ReviewEvent {
    let schedule = scheduler::compute_next_review(difficulty, &item.review_state(), now);
    let at = now.with_timezone(&Utc);

    item.ease_factor = Some(schedule.ease_factor);
    item.next_review = Some(schedule.next_review.with_timezone(&Utc));
    item.last_reviewed = Some(at);
    item.difficulty = Some(difficulty);
    item.review_count = item.review_count.saturating_add(1);
    if let Some(mastered) = mastered {
        item.mastered = mastered;
    }

    tracing::info!(
        id = %item.id,
        hanzi = %item.hanzi,
        %difficulty,
        interval = schedule.interval,
        ease_factor = schedule.ease_factor,
        "review recorded"
    );

    ReviewEvent {
        item_id: item.id.clone(),
        difficulty,
        interval: schedule.interval,
        at,
    }
}

/// Marks an item as (not) mastered outside of a review. Scheduling fields are
/// untouched.
pub fn set_mastered(item: &mut Vocabulary, mastered: bool) {
    if item.mastered != mastered {
        tracing::info!(id = %item.id, hanzi = %item.hanzi, mastered, "mastery changed");
    }
    item.mastered = mastered;
}

pub fn build_review_items(items: &[Vocabulary], indices: &[usize]) -> Vec<ReviewItem> {
    indices
        .iter()
        .map(|&i| {
            let item = &items[i];
            ReviewItem {
                item_index: i,
                prompt: item.hanzi.clone(),
                answer: format!("{}\n{}", item.pinyin, item.meaning),
                category: item.category.clone(),
            }
        })
        .collect()
}

pub fn category_summaries<Tz: TimeZone>(
    items: &[Vocabulary],
    now: &DateTime<Tz>,
) -> Vec<CategorySummary> {
    let mut categories: BTreeMap<&str, CategorySummary> = BTreeMap::new();
    for item in items {
        let entry = categories
            .entry(item.category.as_str())
            .or_insert_with(|| CategorySummary {
                name: item.category.clone(),
                total: 0,
                due: 0,
                mastered: 0,
            });
        entry.total += 1;
        if scheduler::is_due(item.next_review.as_ref(), now) {
            entry.due += 1;
        }
        if item.mastered {
            entry.mastered += 1;
        }
    }
    categories.into_values().collect()
}

pub fn hsk_progress(items: &[Vocabulary]) -> Vec<HskProgress> {
    HSK_LEVELS
        .map(|level| {
            let in_level = items.iter().filter(|v| v.hsk_level == level);
            let (total, mastered) =
                in_level.fold((0, 0), |(t, m), v| (t + 1, m + usize::from(v.mastered)));
            HskProgress {
                level,
                total,
                mastered,
            }
        })
        .collect()
}

pub const QUIZ_LENGTH: usize = 10;
/// Options per question, the right meaning included.
pub const QUIZ_CHOICES: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizQuestion {
    pub item_index: usize,
    pub prompt: String,
    pub pinyin: String,
    pub options: Vec<String>,
    /// Index into `options` of the item's own meaning.
    pub answer: usize,
}

/// Draws up to [`QUIZ_LENGTH`] random items and pairs each one's meaning
/// with distinct wrong meanings taken from the rest of the library.
pub fn build_quiz<R: Rng + ?Sized>(items: &[Vocabulary], rng: &mut R) -> Result<Vec<QuizQuestion>> {
    if items.len() < QUIZ_CHOICES {
        return Err(Error::NotEnoughWords {
            needed: QUIZ_CHOICES,
            found: items.len(),
        });
    }

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.shuffle(&mut *rng);
    order.truncate(QUIZ_LENGTH);

    let quiz = order
        .into_iter()
        .map(|i| {
            let item = &items[i];
            let wrong: Vec<&str> = items
                .iter()
                .map(|v| v.meaning.as_str())
                .filter(|m| *m != item.meaning)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let mut options: Vec<String> = wrong
                .choose_multiple(&mut *rng, QUIZ_CHOICES - 1)
                .map(|m| m.to_string())
                .collect();
            let answer = rng.gen_range(0..=options.len());
            options.insert(answer, item.meaning.clone());

            QuizQuestion {
                item_index: i,
                prompt: item.hanzi.clone(),
                pinyin: item.pinyin.clone(),
                options,
                answer,
            }
        })
        .collect();
    Ok(quiz)
}

/// A right answer counts as an `easy` review, a wrong one as `again`.
pub fn quiz_difficulty(correct: bool) -> Difficulty {
    if correct {
        Difficulty::Easy
    } else {
        Difficulty::Again
    }
}

/// Grades `choice` and records the outcome on the question's item.
pub fn answer_quiz<Tz: TimeZone>(
    item: &mut Vocabulary,
    question: &QuizQuestion,
    choice: usize,
    now: &DateTime<Tz>,
) -> (bool, ReviewEvent) {
    let correct = choice == question.answer;
    let event = record_review(item, quiz_difficulty(correct), None, now);
    (correct, event)
}

/// Share of mastered items, rounded to a whole percent.
pub fn mastery_percent(items: &[Vocabulary]) -> u32 {
    if items.is_empty() {
        return 0;
    }
    let mastered = items.iter().filter(|v| v.mastered).count();
    ((mastered as f64 / items.len() as f64) * 100.0).round() as u32
}
