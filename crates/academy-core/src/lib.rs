use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod requests;
pub mod responses;
pub mod validation;

pub use validation::ValidationError;

pub type Id = i64;

pub const NAME_MAX_LEN: usize = 100;
pub const DESCRIPTION_MAX_LEN: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: Id,
    pub name: String,
    pub order: i64,
    pub course_id: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: Id,
    pub name: String,
    pub order: i64,
    pub chapter_id: Id,
}

/// One recorded completion attempt. Rows are appended, never upserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub id: Id,
    pub user_id: Id,
    pub lesson_id: Id,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveType {
    LessonsCompleted,
    ChaptersCompleted,
    CoursesCompleted,
    SpecificCourseCompleted,
}

impl ObjectiveType {
    pub const ALL: [ObjectiveType; 4] = [
        ObjectiveType::LessonsCompleted,
        ObjectiveType::ChaptersCompleted,
        ObjectiveType::CoursesCompleted,
        ObjectiveType::SpecificCourseCompleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveType::LessonsCompleted => "lessons_completed",
            ObjectiveType::ChaptersCompleted => "chapters_completed",
            ObjectiveType::CoursesCompleted => "courses_completed",
            ObjectiveType::SpecificCourseCompleted => "specific_course_completed",
        }
    }

    /// Course-scoped objectives carry a course id and always target 1.
    pub fn is_course_scoped(&self) -> bool {
        matches!(self, ObjectiveType::SpecificCourseCompleted)
    }
}

impl fmt::Display for ObjectiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectiveType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "lessons_completed" => Ok(ObjectiveType::LessonsCompleted),
            "chapters_completed" => Ok(ObjectiveType::ChaptersCompleted),
            "courses_completed" => Ok(ObjectiveType::CoursesCompleted),
            "specific_course_completed" => Ok(ObjectiveType::SpecificCourseCompleted),
            other => Err(format!("Unknown objective type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub id: Id,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub objective: ObjectiveType,
    pub target: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<Id>,
}

/// Per-user progress towards one achievement. Absence of a row means zero
/// progress; rows are materialized by the first reconciliation that needs them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAchievement {
    pub id: Id,
    pub user_id: Id,
    pub achievement_id: Id,
    pub progress: i64,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserAchievement {
    /// Completed rows report the target even if the stored counter lags.
    pub fn reported_progress(&self, target: i64) -> i64 {
        if self.completed {
            target
        } else {
            self.progress.min(target)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAchievementView {
    pub id: Id,
    pub name: String,
    pub description: String,
    pub progress: i64,
    pub completed: bool,
    pub target: i64,
}

impl UserAchievementView {
    pub fn from_parts(achievement: &Achievement, state: &UserAchievement) -> Self {
        Self {
            id: achievement.id,
            name: achievement.name.clone(),
            description: achievement.description.clone(),
            progress: state.reported_progress(achievement.target),
            completed: state.completed,
            target: achievement.target,
        }
    }
}
