use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Achievement, Chapter, Course, Id, Lesson, User, UserAchievementView};

pub const PROGRESS_RECORDED_MESSAGE: &str = "Lesson progress recorded successfully";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseList {
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterList {
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonList {
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementCatalog {
    pub achievements: Vec<Achievement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievementList {
    pub achievements: Vec<UserAchievementView>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReceipt {
    pub id: Id,
    pub lesson_id: Id,
    pub user_id: Id,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressRecorded {
    pub message: String,
    pub progress: ProgressReceipt,
}

impl ProgressRecorded {
    pub fn new(progress: ProgressReceipt) -> Self {
        Self {
            message: PROGRESS_RECORDED_MESSAGE.to_string(),
            progress,
        }
    }
}
