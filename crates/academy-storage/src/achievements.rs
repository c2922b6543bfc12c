//! Achievement reconciliation.
//!
//! Progress is event-driven: each first completion of a lesson adds exactly
//! one to every eligible open achievement. The recorder gates repeats, so the
//! counters here never see the same lesson twice for a user.

use academy_core::{Id, ObjectiveType, UserAchievement, UserAchievementView};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::admin::achievement_from_row;
use crate::users::require_user;
use crate::{column_objective, column_timestamp, AcademyStore, StorageError};

/// What a single progress submission completed for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionEvent {
    pub user_id: Id,
    pub lesson_id: Option<Id>,
    pub chapter_id: Option<Id>,
    pub course_id: Option<Id>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Rows materialized for achievements the user had never touched.
    pub created: usize,
    pub advanced: Vec<Id>,
    pub completed: Vec<Id>,
}

/// One catalog achievement with the user's current state. Missing rows read
/// as zero progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CatalogEntry {
    pub achievement_id: Id,
    pub objective: ObjectiveType,
    pub target: i64,
    pub course_id: Option<Id>,
    pub progress: i64,
    pub completed: bool,
    pub materialized: bool,
}

impl CatalogEntry {
    fn reaches_target_after_increment(&self) -> bool {
        self.progress + 1 >= self.target
    }
}

pub(crate) fn eligible_objectives(event: &CompletionEvent) -> Vec<ObjectiveType> {
    let mut eligible = vec![ObjectiveType::LessonsCompleted];
    if event.chapter_id.is_some() {
        eligible.push(ObjectiveType::ChaptersCompleted);
    }
    if event.course_id.is_some() {
        eligible.push(ObjectiveType::CoursesCompleted);
    }
    eligible
}

/// Open achievements that advance on `event`.
pub(crate) fn select_for_update<'a>(
    catalog: &'a [CatalogEntry],
    event: &CompletionEvent,
) -> Vec<&'a CatalogEntry> {
    let eligible = eligible_objectives(event);
    catalog
        .iter()
        .filter(|entry| !entry.completed)
        .filter(|entry| match entry.objective {
            ObjectiveType::SpecificCourseCompleted => {
                event.course_id.is_some() && entry.course_id == event.course_id
            }
            objective => eligible.contains(&objective),
        })
        .collect()
}

fn load_catalog(conn: &Connection, user_id: Id) -> Result<Vec<CatalogEntry>, StorageError> {
    let mut statement = conn.prepare(
        "
        SELECT a.id, a.objective_type, a.target, a.course_id,
               ua.id, ua.progress, ua.completed
        FROM achievements a
        LEFT JOIN user_achievements ua
            ON ua.achievement_id = a.id AND ua.user_id = ?1
        ORDER BY a.id ASC
        ",
    )?;
    let rows = statement.query_map([user_id], |row| {
        let row_id: Option<Id> = row.get(4)?;
        Ok(CatalogEntry {
            achievement_id: row.get(0)?,
            objective: column_objective(1, row.get(1)?)?,
            target: row.get(2)?,
            course_id: row.get(3)?,
            progress: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
            completed: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
            materialized: row_id.is_some(),
        })
    })?;

    let mut catalog = Vec::new();
    for row in rows {
        catalog.push(row?);
    }
    Ok(catalog)
}

fn id_placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Applies `event` to the user's achievement rows inside `tx`.
pub(crate) fn reconcile(
    tx: &Transaction<'_>,
    event: &CompletionEvent,
    now: DateTime<Utc>,
) -> Result<ReconcileReport, StorageError> {
    let mut report = ReconcileReport::default();
    if event.lesson_id.is_none() {
        return Ok(report);
    }

    let catalog = load_catalog(tx, event.user_id)?;
    for entry in catalog.iter().filter(|entry| !entry.materialized) {
        report.created += tx.execute(
            "
            INSERT OR IGNORE INTO user_achievements (user_id, achievement_id, progress, completed)
            VALUES (?1, ?2, 0, 0)
            ",
            params![event.user_id, entry.achievement_id],
        )?;
    }

    let selected = select_for_update(&catalog, event);
    if selected.is_empty() {
        return Ok(report);
    }

    report.advanced = selected.iter().map(|entry| entry.achievement_id).collect();
    let sql = format!(
        "
        UPDATE user_achievements
        SET progress = progress + 1
        WHERE user_id = ?1 AND achievement_id IN ({})
        ",
        id_placeholders(2, report.advanced.len())
    );
    let values = std::iter::once(event.user_id).chain(report.advanced.iter().copied());
    tx.execute(&sql, params_from_iter(values))?;

    // Decided from the progress read before the increment.
    report.completed = selected
        .iter()
        .filter(|entry| entry.reaches_target_after_increment())
        .map(|entry| entry.achievement_id)
        .collect();
    if !report.completed.is_empty() {
        let sql = format!(
            "
            UPDATE user_achievements
            SET completed = 1, completed_at = ?1
            WHERE user_id = ?2 AND achievement_id IN ({})
            ",
            id_placeholders(3, report.completed.len())
        );
        let mut values = vec![
            rusqlite::types::Value::Text(now.to_rfc3339()),
            rusqlite::types::Value::Integer(event.user_id),
        ];
        values.extend(
            report
                .completed
                .iter()
                .map(|id| rusqlite::types::Value::Integer(*id)),
        );
        tx.execute(&sql, params_from_iter(values))?;
        for achievement_id in &report.completed {
            info!(
                event = "achievement_completed",
                user_id = event.user_id,
                achievement_id
            );
        }
    }

    debug!(
        event = "achievements_reconciled",
        user_id = event.user_id,
        lesson_id = event.lesson_id,
        chapter_id = event.chapter_id,
        course_id = event.course_id,
        created = report.created,
        advanced = report.advanced.len(),
        completed = report.completed.len()
    );
    Ok(report)
}

impl AcademyStore {
    /// The stored state for one (user, achievement) pair, if a write path has
    /// materialized it.
    pub fn user_achievement(
        &self,
        user_id: Id,
        achievement_id: Id,
    ) -> Result<Option<UserAchievement>, StorageError> {
        let state = self
            .conn
            .query_row(
                "
                SELECT id, user_id, achievement_id, progress, completed, completed_at
                FROM user_achievements
                WHERE user_id = ?1 AND achievement_id = ?2
                ",
                params![user_id, achievement_id],
                |row| {
                    Ok(UserAchievement {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        achievement_id: row.get(2)?,
                        progress: row.get(3)?,
                        completed: row.get(4)?,
                        completed_at: column_timestamp(5, row.get(5)?)?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    /// Achievements the user has a row for, with progress clamped to target.
    /// Untouched achievements are omitted rather than reported as zero.
    pub fn user_achievements(&self, user_id: Id) -> Result<Vec<UserAchievementView>, StorageError> {
        require_user(&self.conn, user_id)?;
        let mut statement = self.conn.prepare(
            "
            SELECT a.id, a.name, a.description, a.objective_type, a.target, a.course_id,
                   ua.id, ua.user_id, ua.achievement_id, ua.progress, ua.completed, ua.completed_at
            FROM user_achievements ua
            INNER JOIN achievements a ON a.id = ua.achievement_id
            WHERE ua.user_id = ?1
            ORDER BY a.id ASC
            ",
        )?;
        let rows = statement.query_map([user_id], |row| {
            let achievement = achievement_from_row(row)?;
            let state = UserAchievement {
                id: row.get(6)?,
                user_id: row.get(7)?,
                achievement_id: row.get(8)?,
                progress: row.get(9)?,
                completed: row.get(10)?,
                completed_at: column_timestamp(11, row.get(11)?)?,
            };
            Ok(UserAchievementView::from_parts(&achievement, &state))
        })?;

        let mut views = Vec::new();
        for row in rows {
            views.push(row?);
        }
        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use academy_core::requests::{CreateAchievementRequest, RecordProgressRequest};
    use academy_core::Achievement;
    use chrono::TimeZone;

    fn entry(id: Id, objective: ObjectiveType, target: i64, course_id: Option<Id>) -> CatalogEntry {
        CatalogEntry {
            achievement_id: id,
            objective,
            target,
            course_id,
            progress: 0,
            completed: false,
            materialized: true,
        }
    }

    fn lesson_event() -> CompletionEvent {
        CompletionEvent {
            user_id: 1,
            lesson_id: Some(10),
            chapter_id: None,
            course_id: None,
        }
    }

    fn achievement(
        db: &mut AcademyStore,
        name: &str,
        objective: ObjectiveType,
        target: i64,
        course_id: Option<Id>,
    ) -> Achievement {
        db.create_achievement(&CreateAchievementRequest {
            name: name.to_string(),
            description: format!("{name} description"),
            objective,
            target,
            course_id,
        })
        .expect("create achievement")
    }

    fn complete(db: &mut AcademyStore, user_id: Id, lesson_id: Id) {
        let started = Utc
            .with_ymd_and_hms(2026, 2, 23, 14, 0, 0)
            .single()
            .expect("start time");
        let finished = Utc
            .with_ymd_and_hms(2026, 2, 23, 14, 5, 0)
            .single()
            .expect("finish time");
        db.record_progress(&RecordProgressRequest {
            lesson_id,
            user_id,
            started_at: started,
            completed_at: finished,
        })
        .expect("record progress");
    }

    /// A course with `chapters` chapters of `lessons` lessons; returns lesson ids.
    fn course_with_lessons(
        db: &mut AcademyStore,
        name: &str,
        chapters: i64,
        lessons: i64,
    ) -> (Id, Vec<Id>) {
        let course = test_support::course(db, name);
        let mut lesson_ids = Vec::new();
        for chapter_order in 1..=chapters {
            let chapter = test_support::chapter(db, course.id, chapter_order);
            for lesson_order in 1..=lessons {
                lesson_ids.push(test_support::lesson(db, chapter.id, lesson_order).id);
            }
        }
        (course.id, lesson_ids)
    }

    fn view(db: &AcademyStore, user_id: Id, achievement_id: Id) -> UserAchievementView {
        db.user_achievements(user_id)
            .expect("user achievements")
            .into_iter()
            .find(|view| view.id == achievement_id)
            .expect("achievement row")
    }

    #[test]
    fn lesson_only_event_makes_only_lessons_eligible() {
        assert_eq!(
            eligible_objectives(&lesson_event()),
            vec![ObjectiveType::LessonsCompleted]
        );
        let full = CompletionEvent {
            chapter_id: Some(2),
            course_id: Some(3),
            ..lesson_event()
        };
        assert_eq!(
            eligible_objectives(&full),
            vec![
                ObjectiveType::LessonsCompleted,
                ObjectiveType::ChaptersCompleted,
                ObjectiveType::CoursesCompleted,
            ]
        );
    }

    #[test]
    fn selection_skips_completed_and_other_courses() {
        let mut done = entry(1, ObjectiveType::LessonsCompleted, 5, None);
        done.completed = true;
        let catalog = vec![
            done,
            entry(2, ObjectiveType::LessonsCompleted, 25, None),
            entry(3, ObjectiveType::ChaptersCompleted, 1, None),
            entry(4, ObjectiveType::SpecificCourseCompleted, 1, Some(7)),
            entry(5, ObjectiveType::SpecificCourseCompleted, 1, Some(8)),
            entry(6, ObjectiveType::CoursesCompleted, 1, None),
        ];

        let ids = |event: &CompletionEvent| -> Vec<Id> {
            select_for_update(&catalog, event)
                .into_iter()
                .map(|entry| entry.achievement_id)
                .collect()
        };
        assert_eq!(ids(&lesson_event()), vec![2]);
        let course_done = CompletionEvent {
            chapter_id: Some(11),
            course_id: Some(8),
            ..lesson_event()
        };
        assert_eq!(ids(&course_done), vec![2, 3, 5, 6]);
    }

    #[test]
    fn reconcile_without_lesson_is_noop() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        achievement(&mut db, "Reader", ObjectiveType::LessonsCompleted, 5, None);
        let tx = db.write_tx().expect("tx");
        let report = reconcile(
            &tx,
            &CompletionEvent {
                user_id: user.id,
                lesson_id: None,
                chapter_id: None,
                course_id: None,
            },
            Utc::now(),
        )
        .expect("reconcile");
        tx.commit().expect("commit");
        assert_eq!(report, ReconcileReport::default());
        assert!(db.user_achievements(user.id).expect("read").is_empty());
    }

    #[test]
    fn repeat_completion_counts_once() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let (_, lessons) = course_with_lessons(&mut db, "Swift", 1, 3);
        let reader = achievement(&mut db, "Reader", ObjectiveType::LessonsCompleted, 5, None);

        for _ in 0..4 {
            complete(&mut db, user.id, lessons[0]);
        }
        let state = db
            .user_achievement(user.id, reader.id)
            .expect("lookup")
            .expect("materialized");
        assert_eq!(state.progress, 1);
        assert!(!state.completed);
        assert_eq!(db.count_lessons_completed(user.id).expect("count"), 1);

        complete(&mut db, user.id, lessons[1]);
        assert_eq!(view(&db, user.id, reader.id).progress, 2);
    }

    #[test]
    fn specific_course_completes_only_when_every_chapter_is_done() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let (swift, lessons) = course_with_lessons(&mut db, "Swift", 2, 2);
        let expert = achievement(
            &mut db,
            "Swift Expert",
            ObjectiveType::SpecificCourseCompleted,
            1,
            Some(swift),
        );

        for lesson_id in &lessons[..3] {
            complete(&mut db, user.id, *lesson_id);
        }
        let before = view(&db, user.id, expert.id);
        assert_eq!(before.progress, 0);
        assert!(!before.completed);

        complete(&mut db, user.id, lessons[3]);
        let after = view(&db, user.id, expert.id);
        assert_eq!(after.progress, 1);
        assert!(after.completed);
        let state = db
            .user_achievement(user.id, expert.id)
            .expect("lookup")
            .expect("materialized");
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn specific_course_ignores_other_courses() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let (swift, _) = course_with_lessons(&mut db, "Swift", 1, 1);
        let (_, js_lessons) = course_with_lessons(&mut db, "Javascript", 1, 1);
        let expert = achievement(
            &mut db,
            "Swift Expert",
            ObjectiveType::SpecificCourseCompleted,
            1,
            Some(swift),
        );

        complete(&mut db, user.id, js_lessons[0]);
        let state = view(&db, user.id, expert.id);
        assert_eq!(state.progress, 0);
        assert!(!state.completed);
    }

    #[test]
    fn courses_completed_target_two_needs_two_courses() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let (_, first) = course_with_lessons(&mut db, "Swift", 1, 2);
        let (_, second) = course_with_lessons(&mut db, "C#", 1, 2);
        let master = achievement(&mut db, "Course Master", ObjectiveType::CoursesCompleted, 2, None);

        for lesson_id in &first {
            complete(&mut db, user.id, *lesson_id);
        }
        let halfway = view(&db, user.id, master.id);
        assert_eq!(halfway.progress, 1);
        assert!(!halfway.completed);

        for lesson_id in &second {
            complete(&mut db, user.id, *lesson_id);
        }
        let done = view(&db, user.id, master.id);
        assert_eq!(done.progress, 2);
        assert!(done.completed);
    }

    #[test]
    fn two_by_two_course_scenario() {
        let mut db = test_support::store();
        let finisher = test_support::user(&mut db, "Finisher");
        let partial = test_support::user(&mut db, "Partial");
        let (_, lessons) = course_with_lessons(&mut db, "Swift", 2, 2);
        let novice = achievement(&mut db, "Course Novice", ObjectiveType::CoursesCompleted, 1, None);
        let chapters = achievement(&mut db, "Chapter Master", ObjectiveType::ChaptersCompleted, 5, None);

        for lesson_id in &lessons {
            complete(&mut db, finisher.id, *lesson_id);
        }
        let done = view(&db, finisher.id, novice.id);
        assert!(done.completed);
        assert_eq!(done.progress, 1);
        assert_eq!(view(&db, finisher.id, chapters.id).progress, 2);

        // One lesson from each chapter: no chapter and no course is complete.
        complete(&mut db, partial.id, lessons[0]);
        complete(&mut db, partial.id, lessons[2]);
        let open = view(&db, partial.id, novice.id);
        assert_eq!(open.progress, 0);
        assert!(!open.completed);
        assert_eq!(view(&db, partial.id, chapters.id).progress, 0);
    }

    #[test]
    fn completed_achievement_stops_advancing() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let (_, lessons) = course_with_lessons(&mut db, "Swift", 1, 3);
        let first = achievement(&mut db, "First Lesson", ObjectiveType::LessonsCompleted, 1, None);

        for lesson_id in &lessons {
            complete(&mut db, user.id, *lesson_id);
        }
        let state = db
            .user_achievement(user.id, first.id)
            .expect("lookup")
            .expect("materialized");
        assert_eq!(state.progress, 1);
        assert!(state.completed);
        assert_eq!(view(&db, user.id, first.id).progress, 1);
    }

    #[test]
    fn reads_omit_untouched_achievements() {
        let mut db = test_support::store();
        let user = test_support::user(&mut db, "Ada");
        let (_, lessons) = course_with_lessons(&mut db, "Swift", 1, 1);
        let early = achievement(&mut db, "Reader", ObjectiveType::LessonsCompleted, 5, None);

        assert!(db.user_achievements(user.id).expect("fresh user").is_empty());

        complete(&mut db, user.id, lessons[0]);
        let late = achievement(&mut db, "Late", ObjectiveType::LessonsCompleted, 5, None);
        let ids: Vec<Id> = db
            .user_achievements(user.id)
            .expect("read")
            .into_iter()
            .map(|view| view.id)
            .collect();
        assert_eq!(ids, vec![early.id]);
        assert!(db.user_achievement(user.id, late.id).expect("lookup").is_none());
    }

    #[test]
    fn reading_missing_user_is_not_found() {
        let db = test_support::store();
        assert!(matches!(
            db.user_achievements(404),
            Err(StorageError::NotFound(message)) if message == "User with ID 404 not found"
        ));
    }

    #[test]
    fn racing_connections_count_a_lesson_once() {
        const WRITERS: usize = 8;
        let file = tempfile::NamedTempFile::new().expect("temp db");
        let (user_id, lesson_id, reader_id) = {
            let mut db = AcademyStore::open(file.path()).expect("open db");
            let user = test_support::user(&mut db, "Ada");
            let (_, lessons) = course_with_lessons(&mut db, "Swift", 1, 1);
            let reader = achievement(&mut db, "Reader", ObjectiveType::LessonsCompleted, 5, None);
            (user.id, lessons[0], reader.id)
        };

        let writers: Vec<AcademyStore> = (0..WRITERS)
            .map(|_| AcademyStore::open(file.path()).expect("open writer"))
            .collect();
        let handles: Vec<_> = writers
            .into_iter()
            .map(|mut db| std::thread::spawn(move || complete(&mut db, user_id, lesson_id)))
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }

        let db = AcademyStore::open(file.path()).expect("reopen db");
        let reader = db
            .user_achievement(user_id, reader_id)
            .expect("read")
            .expect("materialized");
        assert_eq!(reader.progress, 1);
        assert!(!reader.completed);
        assert_eq!(db.progress_log(user_id, lesson_id).expect("log").len(), WRITERS);
        assert_eq!(db.count_lessons_completed(user_id).expect("count"), 1);
    }
}
