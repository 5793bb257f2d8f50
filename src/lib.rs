pub mod error;
pub mod review;
pub mod scheduler;
pub mod streak;
pub mod vocab;
pub mod web;

pub use error::{Error, Result};
pub use review::{ReviewEvent, ReviewSummary, Reviewable, summarize_reviews};
pub use scheduler::{Difficulty, ReviewState, Schedule, compute_next_review, is_due};
pub use vocab::{Library, Vocabulary};
