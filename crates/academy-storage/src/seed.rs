use academy_core::{Id, ObjectiveType};
use rusqlite::params;
use tracing::info;

use crate::{AcademyStore, StorageError};

const DEMO_COURSES: [&str; 3] = ["Swift", "Javascript", "C#"];
const CHAPTERS_PER_COURSE: i64 = 5;
const LESSONS_PER_CHAPTER: i64 = 5;
const DEMO_USER: &str = "Default User";

const GENERIC_ACHIEVEMENTS: [(&str, &str, ObjectiveType, i64); 7] = [
    ("Beginner Learner", "Complete 5 lessons", ObjectiveType::LessonsCompleted, 5),
    ("Intermediate Learner", "Complete 25 lessons", ObjectiveType::LessonsCompleted, 25),
    ("Advanced Learner", "Complete 50 lessons", ObjectiveType::LessonsCompleted, 50),
    ("Chapter Novice", "Complete 1 chapter", ObjectiveType::ChaptersCompleted, 1),
    ("Chapter Master", "Complete 5 chapters", ObjectiveType::ChaptersCompleted, 5),
    ("Course Novice", "Complete 1 course", ObjectiveType::CoursesCompleted, 1),
    ("Course Master", "Complete 5 courses", ObjectiveType::CoursesCompleted, 5),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub skipped: bool,
    pub courses: usize,
    pub chapters: usize,
    pub lessons: usize,
    pub achievements: usize,
    pub user_id: Option<Id>,
}

impl AcademyStore {
    /// Fills an empty database with demo courses, a default user and the
    /// standard achievement catalog. Does nothing once any course exists.
    pub fn seed_demo_data(&mut self) -> Result<SeedReport, StorageError> {
        let tx = self.write_tx()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM courses", [], |row| row.get(0))?;
        if existing > 0 {
            info!(event = "seed_skipped", existing_courses = existing);
            return Ok(SeedReport {
                skipped: true,
                ..SeedReport::default()
            });
        }

        let mut report = SeedReport::default();
        let mut course_ids = Vec::new();
        for course_name in DEMO_COURSES {
            tx.execute("INSERT INTO courses (name) VALUES (?1)", [course_name])?;
            let course_id = tx.last_insert_rowid();
            course_ids.push((course_id, course_name));
            report.courses += 1;

            for chapter_order in 1..=CHAPTERS_PER_COURSE {
                tx.execute(
                    "INSERT INTO chapters (name, sort_order, course_id) VALUES (?1, ?2, ?3)",
                    params![
                        format!("{course_name} Chapter {chapter_order}"),
                        chapter_order,
                        course_id
                    ],
                )?;
                let chapter_id = tx.last_insert_rowid();
                report.chapters += 1;

                for lesson_order in 1..=LESSONS_PER_CHAPTER {
                    tx.execute(
                        "INSERT INTO lessons (name, sort_order, chapter_id) VALUES (?1, ?2, ?3)",
                        params![format!("Lesson {lesson_order}"), lesson_order, chapter_id],
                    )?;
                    report.lessons += 1;
                }
            }
        }

        tx.execute("INSERT INTO users (name) VALUES (?1)", [DEMO_USER])?;
        let user_id = tx.last_insert_rowid();
        report.user_id = Some(user_id);

        let generic = GENERIC_ACHIEVEMENTS
            .iter()
            .map(|(name, description, objective, target)| {
                (name.to_string(), description.to_string(), *objective, *target, None)
            });
        let per_course = course_ids.iter().map(|(course_id, course_name)| {
            (
                format!("{course_name} Expert"),
                format!("Complete the {course_name} course"),
                ObjectiveType::SpecificCourseCompleted,
                1,
                Some(*course_id),
            )
        });
        for (name, description, objective, target, course_id) in generic.chain(per_course) {
            tx.execute(
                "
                INSERT INTO achievements (name, description, objective_type, target, course_id)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![name, description, objective.as_str(), target, course_id],
            )?;
            let achievement_id = tx.last_insert_rowid();
            tx.execute(
                "
                INSERT INTO user_achievements (user_id, achievement_id, progress, completed)
                VALUES (?1, ?2, 0, 0)
                ",
                params![user_id, achievement_id],
            )?;
            report.achievements += 1;
        }
        tx.commit()?;

        info!(
            event = "seed_completed",
            courses = report.courses,
            chapters = report.chapters,
            lessons = report.lessons,
            achievements = report.achievements,
            user_id
        );
        Ok(report)
    }
}
