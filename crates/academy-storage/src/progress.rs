use academy_core::requests::RecordProgressRequest;
use academy_core::responses::ProgressReceipt;
use academy_core::{Id, Lesson, LessonProgress};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::info;

use crate::achievements::{self, CompletionEvent, ReconcileReport};
use crate::curriculum::require_ordered;
use crate::users::require_user;
use crate::{column_timestamp, AcademyStore, StorageError};

/// Outcome of one progress submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedProgress {
    pub progress: LessonProgress,
    pub started_at: DateTime<Utc>,
    /// False when the user had already completed this lesson before.
    pub first_completion: bool,
    pub completed_chapter_id: Option<Id>,
    pub completed_course_id: Option<Id>,
    pub report: ReconcileReport,
}

impl RecordedProgress {
    pub fn to_receipt(&self) -> ProgressReceipt {
        ProgressReceipt {
            id: self.progress.id,
            lesson_id: self.progress.lesson_id,
            user_id: self.progress.user_id,
            started_at: self.started_at,
            completed_at: self.progress.completed_at.unwrap_or(self.started_at),
        }
    }
}

fn has_completed_lesson(conn: &Connection, user_id: Id, lesson_id: Id) -> Result<bool, StorageError> {
    Ok(conn.query_row(
        "
        SELECT EXISTS (
            SELECT 1 FROM lesson_progress
            WHERE user_id = ?1 AND lesson_id = ?2 AND completed = 1
        )
        ",
        params![user_id, lesson_id],
        |row| row.get(0),
    )?)
}

/// A chapter is complete when none of its lessons lacks a completed row.
fn chapter_completed(conn: &Connection, user_id: Id, chapter_id: Id) -> Result<bool, StorageError> {
    Ok(conn.query_row(
        "
        SELECT NOT EXISTS (
            SELECT 1 FROM lessons l
            WHERE l.chapter_id = ?2
              AND NOT EXISTS (
                  SELECT 1 FROM lesson_progress p
                  WHERE p.lesson_id = l.id AND p.user_id = ?1 AND p.completed = 1
              )
        )
        ",
        params![user_id, chapter_id],
        |row| row.get(0),
    )?)
}

/// A course is complete when every chapter passes the chapter test. Chapters
/// without lessons pass vacuously.
fn course_completed(conn: &Connection, user_id: Id, course_id: Id) -> Result<bool, StorageError> {
    Ok(conn.query_row(
        "
        SELECT NOT EXISTS (
            SELECT 1 FROM chapters c
            JOIN lessons l ON l.chapter_id = c.id
            WHERE c.course_id = ?2
              AND NOT EXISTS (
                  SELECT 1 FROM lesson_progress p
                  WHERE p.lesson_id = l.id AND p.user_id = ?1 AND p.completed = 1
              )
        )
        ",
        params![user_id, course_id],
        |row| row.get(0),
    )?)
}

fn course_of_chapter(conn: &Connection, chapter_id: Id) -> Result<Id, StorageError> {
    Ok(conn.query_row(
        "SELECT course_id FROM chapters WHERE id = ?1",
        [chapter_id],
        |row| row.get(0),
    )?)
}

impl AcademyStore {
    /// Appends a completed attempt and, on the user's first completion of the
    /// lesson, reconciles achievements for the lesson and any chapter or
    /// course it finished. All writes share one transaction.
    pub fn record_progress(
        &mut self,
        request: &RecordProgressRequest,
    ) -> Result<RecordedProgress, StorageError> {
        let tx = self.write_tx()?;
        require_user(&tx, request.user_id)?;
        let lesson: Lesson = require_ordered(&tx, request.lesson_id)?;

        let first_completion = !has_completed_lesson(&tx, request.user_id, lesson.id)?;
        tx.execute(
            "
            INSERT INTO lesson_progress (user_id, lesson_id, completed, completed_at)
            VALUES (?1, ?2, 1, ?3)
            ",
            params![
                request.user_id,
                lesson.id,
                request.completed_at.to_rfc3339()
            ],
        )?;
        let progress = LessonProgress {
            id: tx.last_insert_rowid(),
            user_id: request.user_id,
            lesson_id: lesson.id,
            completed: true,
            completed_at: Some(request.completed_at),
        };

        let mut completed_chapter_id = None;
        let mut completed_course_id = None;
        let mut report = ReconcileReport::default();
        if first_completion {
            if chapter_completed(&tx, request.user_id, lesson.chapter_id)? {
                completed_chapter_id = Some(lesson.chapter_id);
                let course_id = course_of_chapter(&tx, lesson.chapter_id)?;
                if course_completed(&tx, request.user_id, course_id)? {
                    completed_course_id = Some(course_id);
                }
            }
            report = achievements::reconcile(
                &tx,
                &CompletionEvent {
                    user_id: request.user_id,
                    lesson_id: Some(lesson.id),
                    chapter_id: completed_chapter_id,
                    course_id: completed_course_id,
                },
                Utc::now(),
            )?;
        }
        tx.commit()?;

        info!(
            event = "progress_recorded",
            progress_id = progress.id,
            user_id = progress.user_id,
            lesson_id = progress.lesson_id,
            first_completion,
            chapter_completed = completed_chapter_id.is_some(),
            course_completed = completed_course_id.is_some()
        );
        Ok(RecordedProgress {
            progress,
            started_at: request.started_at,
            first_completion,
            completed_chapter_id,
            completed_course_id,
            report,
        })
    }

    /// Distinct lessons the user has completed at least once.
    pub fn count_lessons_completed(&self, user_id: Id) -> Result<i64, StorageError> {
        Ok(self.conn.query_row(
            "
            SELECT COUNT(DISTINCT lesson_id)
            FROM lesson_progress
            WHERE user_id = ?1 AND completed = 1
            ",
            [user_id],
            |row| row.get(0),
        )?)
    }

    /// Every recorded attempt for (user, lesson), oldest first.
    pub fn progress_log(&self, user_id: Id, lesson_id: Id) -> Result<Vec<LessonProgress>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT id, user_id, lesson_id, completed, completed_at
            FROM lesson_progress
            WHERE user_id = ?1 AND lesson_id = ?2
            ORDER BY id ASC
            ",
        )?;
        let rows = statement.query_map(params![user_id, lesson_id], |row| {
            Ok(LessonProgress {
                id: row.get(0)?,
                user_id: row.get(1)?,
                lesson_id: row.get(2)?,
                completed: row.get(3)?,
                completed_at: column_timestamp(4, row.get(4)?)?,
            })
        })?;

        let mut log = Vec::new();
        for row in rows {
            log.push(row?);
        }
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use chrono::TimeZone;

    fn request(user_id: Id, lesson_id: Id) -> RecordProgressRequest {
        RecordProgressRequest {
            lesson_id,
            user_id,
            started_at: Utc
                .with_ymd_and_hms(2026, 2, 23, 14, 0, 0)
                .single()
                .expect("start time"),
            completed_at: Utc
                .with_ymd_and_hms(2026, 2, 23, 14, 5, 0)
                .single()
                .expect("finish time"),
        }
    }

    #[test]
    fn repeat_attempts_are_appended_but_only_first_counts() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let course = test_support::course(&mut db, "Swift");
        let chapter = test_support::chapter(&mut db, course.id, 1);
        let lesson = test_support::lesson(&mut db, chapter.id, 1);
        test_support::lesson(&mut db, chapter.id, 2);

        let first = db.record_progress(&request(user.id, lesson.id)).expect("first");
        let second = db.record_progress(&request(user.id, lesson.id)).expect("second");
        assert!(first.first_completion);
        assert!(!second.first_completion);
        assert_ne!(first.progress.id, second.progress.id);
        assert_eq!(db.progress_log(user.id, lesson.id).expect("log").len(), 2);
        assert_eq!(db.count_lessons_completed(user.id).expect("count"), 1);

        let receipt = second.to_receipt();
        assert_eq!(receipt.lesson_id, lesson.id);
        assert_eq!(receipt.completed_at, request(user.id, lesson.id).completed_at);
    }

    #[test]
    fn last_lesson_of_chapter_and_course_is_detected() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let course = test_support::course(&mut db, "Swift");
        let first_chapter = test_support::chapter(&mut db, course.id, 1);
        let second_chapter = test_support::chapter(&mut db, course.id, 2);
        let a = test_support::lesson(&mut db, first_chapter.id, 1);
        let b = test_support::lesson(&mut db, first_chapter.id, 2);
        let c = test_support::lesson(&mut db, second_chapter.id, 1);

        let recorded = db.record_progress(&request(user.id, a.id)).expect("a");
        assert_eq!(recorded.completed_chapter_id, None);

        let recorded = db.record_progress(&request(user.id, b.id)).expect("b");
        assert_eq!(recorded.completed_chapter_id, Some(first_chapter.id));
        assert_eq!(recorded.completed_course_id, None);

        let recorded = db.record_progress(&request(user.id, c.id)).expect("c");
        assert_eq!(recorded.completed_chapter_id, Some(second_chapter.id));
        assert_eq!(recorded.completed_course_id, Some(course.id));
    }

    #[test]
    fn empty_chapter_does_not_block_course_completion() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let course = test_support::course(&mut db, "Swift");
        let chapter = test_support::chapter(&mut db, course.id, 1);
        test_support::chapter(&mut db, course.id, 2);
        let lesson = test_support::lesson(&mut db, chapter.id, 1);

        let recorded = db.record_progress(&request(user.id, lesson.id)).expect("record");
        assert_eq!(recorded.completed_course_id, Some(course.id));
    }

    #[test]
    fn other_users_progress_does_not_complete_chapter() {
        let mut db = test_support::store();
        let ada = test_support::user(&mut db, "Ada");
        let bob = test_support::user(&mut db, "Bob");
        let course = test_support::course(&mut db, "Swift");
        let chapter = test_support::chapter(&mut db, course.id, 1);
        let first = test_support::lesson(&mut db, chapter.id, 1);
        let second = test_support::lesson(&mut db, chapter.id, 2);

        db.record_progress(&request(bob.id, first.id)).expect("bob");
        let recorded = db.record_progress(&request(ada.id, second.id)).expect("ada");
        assert_eq!(recorded.completed_chapter_id, None);
    }

    #[test]
    fn missing_user_or_lesson_leaves_no_row() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let course = test_support::course(&mut db, "Swift");
        let chapter = test_support::chapter(&mut db, course.id, 1);
        let lesson = test_support::lesson(&mut db, chapter.id, 1);

        match db.record_progress(&request(99, lesson.id)) {
            Err(StorageError::NotFound(message)) => assert_eq!(message, "User with ID 99 not found"),
            other => panic!("expected missing user, got {other:?}"),
        }
        match db.record_progress(&request(user.id, 77)) {
            Err(StorageError::NotFound(message)) => assert_eq!(message, "Lesson with ID 77 not found"),
            other => panic!("expected missing lesson, got {other:?}"),
        }
        assert_eq!(db.count_lessons_completed(user.id).expect("count"), 0);
    }
}
