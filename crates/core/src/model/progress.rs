use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{LessonId, UserId};

//
// ─── LESSON PROGRESS ───────────────────────────────────────────────────────────
//

/// Completion state of one lesson for one user.
///
/// Completion is monotonic: there is no way to clear it once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    user_id: UserId,
    lesson_id: LessonId,
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl LessonProgress {
    /// A fresh, not-yet-completed record.
    #[must_use]
    pub fn not_started(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: false,
            completed_at: None,
        }
    }

    /// Rehydrate a record from storage.
    ///
    /// A stored completion timestamp implies completion even if the flag
    /// was not set.
    #[must_use]
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: completed || completed_at.is_some(),
            completed_at,
        }
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the completed form of this record, keeping the original
    /// timestamp if it was already completed.
    #[must_use]
    pub fn completed(&self, at: DateTime<Utc>) -> Self {
        if self.completed {
            return self.clone();
        }
        Self {
            completed: true,
            completed_at: Some(at),
            ..self.clone()
        }
    }
}

//
// ─── COURSE SUMMARY ────────────────────────────────────────────────────────────
//

/// Aggregate course progress, derived on demand and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseProgressSummary {
    completed: usize,
    total: usize,
}

impl CourseProgressSummary {
    /// Fold a set of progress records into a summary.
    #[must_use]
    pub fn from_progress<'a>(records: impl IntoIterator<Item = &'a LessonProgress>) -> Self {
        let (completed, total) = records
            .into_iter()
            .fold((0_usize, 0_usize), |(done, total), record| {
                (done + usize::from(record.is_completed()), total + 1)
            });
        Self { completed, total }
    }

    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed
    }

    #[must_use]
    pub fn total_lessons(&self) -> usize {
        self.total
    }

    /// Completion percentage rounded to the nearest integer; 0 for an empty course.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        let done = self.completed.min(self.total);
        // Integer round-half-up of done * 100 / total.
        let rounded = (done * 200 + self.total) / (self.total * 2);
        u8::try_from(rounded.min(100)).unwrap_or(100)
    }

    /// True once every lesson is complete. An empty course is never complete.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

impl fmt::Display for CourseProgressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% ({}/{})", self.percent(), self.completed, self.total)
    }
}
