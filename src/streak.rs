use std::collections::BTreeSet;
use std::path::Path;

use chrono::{NaiveDate, TimeZone};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::review::ReviewEvent;
use crate::vocab::Vocabulary;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
    pub last_activity: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakUpdate {
    /// Already counted today.
    Unchanged,
    Extended,
    /// First activity, or the chain was broken.
    Restarted,
}

impl Streak {
    pub fn record_activity(&mut self, today: NaiveDate) -> StreakUpdate {
        let update = match self.last_activity {
            Some(last) if last == today => return StreakUpdate::Unchanged,
            Some(last) if last.succ_opt() == Some(today) => {
                self.current += 1;
                StreakUpdate::Extended
            }
            _ => {
                self.current = 1;
                StreakUpdate::Restarted
            }
        };
        self.longest = self.longest.max(self.current);
        self.last_activity = Some(today);
        update
    }

    /// The streak as it stands on `today`: a chain not continued since
    /// yesterday counts as zero.
    pub fn current_on(&self, today: NaiveDate) -> u32 {
        match self.last_activity {
            Some(last) if last == today || last.succ_opt() == Some(today) => self.current,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    WordsMastered,
    Streak,
    /// Number of items reviewed at least once.
    ReviewsCount,
    /// Quizzes finished without a wrong answer.
    PerfectQuiz,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub condition: Condition,
    pub threshold: u32,
}

impl Achievement {
    fn new(id: &str, name: &str, description: &str, condition: Condition, threshold: u32) -> Self {
        Achievement {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            condition,
            threshold,
        }
    }
}

pub fn default_achievements() -> Vec<Achievement> {
    vec![
        Achievement::new("first-word", "First Word", "Master your first word", Condition::WordsMastered, 1),
        Achievement::new("ten-words", "Word Collector", "Master 10 words", Condition::WordsMastered, 10),
        Achievement::new("fifty-words", "Vocabulary Builder", "Master 50 words", Condition::WordsMastered, 50),
        Achievement::new("hsk1-complete", "HSK 1 Scholar", "Master 150 words", Condition::WordsMastered, 150),
        Achievement::new("streak-3", "Warming Up", "Study 3 days in a row", Condition::Streak, 3),
        Achievement::new("streak-7", "One Week", "Study 7 days in a row", Condition::Streak, 7),
        Achievement::new("streak-30", "Habit Formed", "Study 30 days in a row", Condition::Streak, 30),
        Achievement::new("reviews-10", "Getting Started", "Review 10 different words", Condition::ReviewsCount, 10),
        Achievement::new("reviews-100", "Dedicated", "Review 100 different words", Condition::ReviewsCount, 100),
        Achievement::new("perfect-quiz", "Perfectionist", "Answer every quiz question correctly", Condition::PerfectQuiz, 1),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub words_mastered: u32,
    pub current_streak: u32,
    pub reviews_count: u32,
    pub perfect_quizzes: u32,
}

impl Snapshot {
    pub fn from_items(items: &[Vocabulary], streak: &Streak) -> Self {
        let count = |f: fn(&Vocabulary) -> bool| {
            u32::try_from(items.iter().filter(|v| f(v)).count()).unwrap_or(u32::MAX)
        };
        Snapshot {
            words_mastered: count(|v| v.mastered),
            current_streak: streak.current,
            reviews_count: count(|v| v.review_count > 0),
            perfect_quizzes: 0,
        }
    }

    fn value(&self, condition: Condition) -> u32 {
        match condition {
            Condition::WordsMastered => self.words_mastered,
            Condition::Streak => self.current_streak,
            Condition::ReviewsCount => self.reviews_count,
            Condition::PerfectQuiz => self.perfect_quizzes,
        }
    }
}

/// Achievements from `catalogue` whose threshold is met and that are not in
/// `earned` yet.
pub fn newly_earned<'a>(
    catalogue: &'a [Achievement],
    earned: &BTreeSet<String>,
    snapshot: &Snapshot,
) -> Vec<&'a Achievement> {
    catalogue
        .iter()
        .filter(|a| !earned.contains(&a.id))
        .filter(|a| snapshot.value(a.condition) >= a.threshold)
        .collect()
}

/// A learner's streak and earned achievements, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub streak: Streak,
    #[serde(default)]
    pub earned: BTreeSet<String>,
    #[serde(default)]
    pub perfect_quizzes: u32,
}

impl Progress {
    pub fn load(path: &Path) -> Result<Progress> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Progress::default()),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| Error::io(path, e))
    }

    /// Consumes a review event: advances the streak for the event's local
    /// day, then awards any achievements now reached.
    pub fn on_review<Tz: TimeZone>(
        &mut self,
        event: &ReviewEvent,
        tz: &Tz,
        items: &[Vocabulary],
        catalogue: &[Achievement],
    ) -> Vec<Achievement> {
        let today = event.at.with_timezone(tz).date_naive();
        let update = self.streak.record_activity(today);
        if update != StreakUpdate::Unchanged {
            tracing::info!(
                current = self.streak.current,
                longest = self.streak.longest,
                "streak updated"
            );
        }
        self.check_achievements(items, catalogue)
    }

    /// Called once per finished quiz, after its answers went through
    /// [`Progress::on_review`].
    pub fn on_quiz_finished(
        &mut self,
        correct: usize,
        total: usize,
        items: &[Vocabulary],
        catalogue: &[Achievement],
    ) -> Vec<Achievement> {
        if total > 0 && correct == total {
            self.perfect_quizzes = self.perfect_quizzes.saturating_add(1);
            tracing::info!(total, "perfect quiz");
        }
        self.check_achievements(items, catalogue)
    }

    pub fn check_achievements(
        &mut self,
        items: &[Vocabulary],
        catalogue: &[Achievement],
    ) -> Vec<Achievement> {
        let snapshot = Snapshot {
            perfect_quizzes: self.perfect_quizzes,
            ..Snapshot::from_items(items, &self.streak)
        };
        let unlocked: Vec<Achievement> = newly_earned(catalogue, &self.earned, &snapshot)
            .into_iter()
            .cloned()
            .collect();
        for a in &unlocked {
            tracing::info!(id = %a.id, name = %a.name, "achievement unlocked");
            self.earned.insert(a.id.clone());
        }
        unlocked
    }
}
