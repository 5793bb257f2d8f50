// Review scheduler: a SuperMemo-2 derived policy driven by four self-reported
// difficulty levels instead of SM-2's 0-5 quality scale.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;

const AGAIN_PENALTY: f64 = 0.2;
const HARD_PENALTY: f64 = 0.15;
const EASY_BONUS: f64 = 0.1;
const HARD_MULTIPLIER: f64 = 1.2;
const EASY_MULTIPLIER: f64 = 1.3;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Again,
    Hard,
    Medium,
    Easy,
}

impl Difficulty {
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Again,
        Difficulty::Hard,
        Difficulty::Medium,
        Difficulty::Easy,
    ];

    pub fn from_u8(n: u8) -> Option<Difficulty> {
        match n {
            1 => Some(Difficulty::Again),
            2 => Some(Difficulty::Hard),
            3 => Some(Difficulty::Medium),
            4 => Some(Difficulty::Easy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Again => "again",
            Difficulty::Hard => "hard",
            Difficulty::Medium => "medium",
            Difficulty::Easy => "easy",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "again" => Ok(Difficulty::Again),
            "hard" => Ok(Difficulty::Hard),
            "medium" => Ok(Difficulty::Medium),
            "easy" => Ok(Difficulty::Easy),
            _ => Err(Error::InvalidDifficulty(s.to_string())),
        }
    }
}

/// The review fields the scheduler reads, as they stood before the review
/// being scheduled.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ReviewState {
    pub ease_factor: f64,
    /// Reviews completed before this one.
    pub review_count: u32,
}

impl Default for ReviewState {
    fn default() -> Self {
        ReviewState {
            ease_factor: DEFAULT_EASE_FACTOR,
            review_count: 0,
        }
    }
}

impl ReviewState {
    /// Builds a state from possibly-missing stored fields, applying the
    /// defaults for an item with no history.
    pub fn from_stored(ease_factor: Option<f64>, review_count: Option<u32>) -> Self {
        ReviewState {
            ease_factor: ease_factor.unwrap_or(DEFAULT_EASE_FACTOR),
            review_count: review_count.unwrap_or(0),
        }
    }

    // A non-finite or sub-floor ease factor can only come from a corrupted
    // store; repair it so the floor invariant holds on every branch.
    fn sanitized(self) -> Self {
        let ease_factor = if !self.ease_factor.is_finite() {
            DEFAULT_EASE_FACTOR
        } else if self.ease_factor < MIN_EASE_FACTOR {
            MIN_EASE_FACTOR
        } else {
            self.ease_factor
        };
        if ease_factor != self.ease_factor {
            tracing::debug!(
                stored = self.ease_factor,
                repaired = ease_factor,
                "repaired out-of-range ease factor"
            );
        }
        ReviewState {
            ease_factor,
            review_count: self.review_count,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Schedule<Tz: TimeZone> {
    pub next_review: DateTime<Tz>,
    pub ease_factor: f64,
    /// Whole days between `now` and `next_review`.
    pub interval: u32,
}

fn ceil_days(x: f64) -> u32 {
    // `as` saturates, so absurd ease factors cannot wrap around.
    x.ceil() as u32
}

fn next_ease_and_interval(difficulty: Difficulty, state: ReviewState) -> (f64, u32) {
    let ef = state.ease_factor;
    let n = state.review_count;
    match difficulty {
        Difficulty::Again => ((ef - AGAIN_PENALTY).max(MIN_EASE_FACTOR), 1),
        Difficulty::Hard => {
            let new_ef = (ef - HARD_PENALTY).max(MIN_EASE_FACTOR);
            let interval = if n == 0 {
                1
            } else {
                ceil_days(f64::from(n) * HARD_MULTIPLIER)
            };
            (new_ef, interval)
        }
        Difficulty::Medium => {
            let interval = match n {
                0 => 1,
                1 => 3,
                _ => ceil_days(f64::from(n) * ef),
            };
            (ef, interval)
        }
        Difficulty::Easy => {
            let new_ef = ef + EASY_BONUS;
            let interval = if n == 0 {
                3
            } else {
                ceil_days(f64::from(n) * new_ef * EASY_MULTIPLIER)
            };
            (new_ef, interval)
        }
    }
}

fn add_days<Tz: TimeZone>(now: &DateTime<Tz>, days: u32) -> DateTime<Tz> {
    // Calendar arithmetic first; fall back to exact 24h days when the local
    // date lands in a DST gap.
    now.clone()
        .checked_add_days(Days::new(u64::from(days)))
        .or_else(|| {
            now.clone()
                .checked_add_signed(TimeDelta::days(i64::from(days)))
        })
        .unwrap_or_else(|| DateTime::<Utc>::MAX_UTC.with_timezone(&now.timezone()))
}

/// Computes the ease factor and next review date for an item that has just
/// been reviewed with `difficulty`. `state` holds the item's fields before
/// this review is counted.
pub fn compute_next_review<Tz: TimeZone>(
    difficulty: Difficulty,
    state: &ReviewState,
    now: &DateTime<Tz>,
) -> Schedule<Tz> {
    let (ease_factor, interval) = next_ease_and_interval(difficulty, state.sanitized());
    Schedule {
        next_review: add_days(now, interval),
        ease_factor,
        interval,
    }
}

/// Interval in days each difficulty would produce, in `Difficulty::ALL` order.
pub fn preview_intervals(state: &ReviewState) -> [u32; 4] {
    let state = state.sanitized();
    Difficulty::ALL.map(|d| next_ease_and_interval(d, state).1)
}

/// An item is due when it was never scheduled or its review time has been
/// reached (inclusive).
pub fn is_due<Tz: TimeZone>(next_review: Option<&DateTime<Utc>>, now: &DateTime<Tz>) -> bool {
    match next_review {
        None => true,
        Some(next) => now.with_timezone(&Utc) >= *next,
    }
}

pub fn format_interval(days: u32) -> String {
    match days {
        0 => "now".to_string(),
        1..=6 => format!("{days}d"),
        7..=29 => format!("{}w", days / 7),
        30..=364 => format!("{}mo", days / 30),
        _ => format!("{}y", days / 365),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 30, 0).unwrap()
    }

    fn state(ease_factor: f64, review_count: u32) -> ReviewState {
        ReviewState {
            ease_factor,
            review_count,
        }
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn again_resets_to_one_day() {
        let s = compute_next_review(Difficulty::Again, &state(2.5, 5), &now());
        assert_close(s.ease_factor, 2.3);
        assert_eq!(s.interval, 1);
    }

    #[test]
    fn hard_first_review() {
        let s = compute_next_review(Difficulty::Hard, &state(2.5, 0), &now());
        assert_close(s.ease_factor, 2.35);
        assert_eq!(s.interval, 1);
    }

    #[test]
    fn hard_later_review() {
        let s = compute_next_review(Difficulty::Hard, &state(2.5, 4), &now());
        assert_close(s.ease_factor, 2.35);
        assert_eq!(s.interval, 5);
    }

    #[test]
    fn medium_intervals() {
        let first = compute_next_review(Difficulty::Medium, &state(2.5, 0), &now());
        assert_eq!(first.interval, 1);

        let second = compute_next_review(Difficulty::Medium, &state(2.5, 1), &now());
        assert_close(second.ease_factor, 2.5);
        assert_eq!(second.interval, 3);

        let later = compute_next_review(Difficulty::Medium, &state(2.5, 4), &now());
        assert_close(later.ease_factor, 2.5);
        assert_eq!(later.interval, 10);
    }

    #[test]
    fn easy_intervals() {
        let first = compute_next_review(Difficulty::Easy, &state(2.5, 0), &now());
        assert_close(first.ease_factor, 2.6);
        assert_eq!(first.interval, 3);

        let later = compute_next_review(Difficulty::Easy, &state(2.5, 4), &now());
        assert_close(later.ease_factor, 2.6);
        assert_eq!(later.interval, 14);
    }

    #[test]
    fn ease_floor_on_decreasing_branches() {
        for ef in [1.3, 1.35, 1.4, 1.45, 1.5, 2.0, 2.5] {
            for n in [0, 1, 2, 7] {
                for d in [Difficulty::Again, Difficulty::Hard] {
                    let s = compute_next_review(d, &state(ef, n), &now());
                    assert!(s.ease_factor >= MIN_EASE_FACTOR, "{d} {ef} {n}");
                }
            }
        }
    }

    #[test]
    fn easy_adds_exactly_one_tenth() {
        for ef in [1.3, 2.5, 3.7, 10.0] {
            let s = compute_next_review(Difficulty::Easy, &state(ef, 3), &now());
            assert_eq!(s.ease_factor, ef + 0.1);
        }
    }

    #[test]
    fn ease_is_unbounded_above() {
        let mut st = ReviewState::default();
        for _ in 0..50 {
            let s = compute_next_review(Difficulty::Easy, &st, &now());
            st = state(s.ease_factor, st.review_count + 1);
        }
        assert!(st.ease_factor > 7.0);
    }

    #[test]
    fn defaults_match_fresh_item() {
        let fresh = ReviewState::from_stored(None, None);
        assert_eq!(fresh, ReviewState::default());
        for d in Difficulty::ALL {
            let a = compute_next_review(d, &fresh, &now());
            let b = compute_next_review(d, &state(2.5, 0), &now());
            assert_eq!(a.ease_factor, b.ease_factor);
            assert_eq!(a.interval, b.interval);
            assert_eq!(a.next_review, b.next_review);
        }
    }

    #[test]
    fn corrupted_ease_is_repaired() {
        let s = compute_next_review(Difficulty::Medium, &state(0.5, 3), &now());
        assert_close(s.ease_factor, MIN_EASE_FACTOR);

        let s = compute_next_review(Difficulty::Medium, &state(f64::NAN, 0), &now());
        assert_close(s.ease_factor, DEFAULT_EASE_FACTOR);
    }

    #[test]
    fn next_review_adds_whole_days() {
        let s = compute_next_review(Difficulty::Medium, &state(2.5, 4), &now());
        assert_eq!(
            s.next_review,
            Utc.with_ymd_and_hms(2025, 3, 20, 9, 30, 0).unwrap()
        );
    }

    #[test]
    fn next_review_keeps_timezone() {
        let tz = FixedOffset::east_opt(7 * 3600).unwrap();
        let local = tz.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        let s = compute_next_review(Difficulty::Again, &ReviewState::default(), &local);
        assert_eq!(
            s.next_review,
            tz.with_ymd_and_hms(2026, 1, 1, 23, 0, 0).unwrap()
        );
    }

    #[test]
    fn due_when_never_scheduled() {
        assert!(is_due(None, &now()));
    }

    #[test]
    fn due_boundary_is_inclusive() {
        let t = now();
        assert!(is_due(Some(&t), &t));
        assert!(!is_due(Some(&t), &(t - TimeDelta::milliseconds(1))));
        assert!(is_due(Some(&t), &(t + TimeDelta::milliseconds(1))));
    }

    #[test]
    fn due_compares_instants_across_timezones() {
        let t = now();
        let tz = FixedOffset::west_opt(5 * 3600).unwrap();
        assert!(is_due(Some(&t), &t.with_timezone(&tz)));
    }

    #[test]
    fn preview_matches_schedule() {
        let st = state(2.5, 4);
        let preview = preview_intervals(&st);
        assert_eq!(preview, [1, 5, 10, 14]);
    }

    #[test]
    fn difficulty_parsing() {
        assert_eq!("Easy".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!(" again ".parse::<Difficulty>().unwrap(), Difficulty::Again);
        assert!("good".parse::<Difficulty>().is_err());
        assert_eq!(Difficulty::from_u8(2), Some(Difficulty::Hard));
        assert_eq!(Difficulty::from_u8(5), None);
    }

    #[test]
    fn interval_formatting() {
        assert_eq!(format_interval(1), "1d");
        assert_eq!(format_interval(14), "2w");
        assert_eq!(format_interval(90), "3mo");
        assert_eq!(format_interval(800), "2y");
    }
}
