use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::validation::{FieldReader, ValidationError};
use crate::{Id, ObjectiveType, DESCRIPTION_MAX_LEN, NAME_MAX_LEN};

const OBJECTIVE_VALUES: [&str; 4] = [
    "lessons_completed",
    "chapters_completed",
    "courses_completed",
    "specific_course_completed",
];

/// Body shared by course and user create/update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRequest {
    pub name: String,
}

impl NameRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let mut reader = FieldReader::new(payload, &["name"])?;
        let name = reader.required_string("name", NAME_MAX_LEN);
        reader.finish()?;
        let Some(name) = name else {
            return Err(ValidationError::single("name should not be empty"));
        };
        Ok(Self { name })
    }
}

/// Insert a child at `order` under `parent_id` (a course for chapters, a
/// chapter for lessons).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderedRequest {
    pub name: String,
    pub order: i64,
    pub parent_id: Id,
}

impl CreateOrderedRequest {
    pub fn chapter_from_json(payload: &Value) -> Result<Self, ValidationError> {
        Self::from_json(payload, "courseId")
    }

    pub fn lesson_from_json(payload: &Value) -> Result<Self, ValidationError> {
        Self::from_json(payload, "chapterId")
    }

    fn from_json(payload: &Value, parent_field: &str) -> Result<Self, ValidationError> {
        let mut reader = FieldReader::new(payload, &["name", "order", parent_field])?;
        let name = reader.required_string("name", NAME_MAX_LEN);
        let order = reader.required_int("order", Some(1));
        let parent_id = reader.required_int(parent_field, Some(1));
        reader.finish()?;
        let (Some(name), Some(order), Some(parent_id)) = (name, order, parent_id) else {
            return Err(ValidationError::single("payload is incomplete"));
        };
        Ok(Self {
            name,
            order,
            parent_id,
        })
    }
}

/// Rename and/or move within the current parent. Re-parenting is not part of
/// the contract, so a parent field in the body is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOrderedRequest {
    pub name: Option<String>,
    pub order: Option<i64>,
}

impl UpdateOrderedRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let mut reader = FieldReader::new(payload, &["name", "order"])?;
        let name = reader.optional_string("name", NAME_MAX_LEN);
        let order = reader.optional_int("order", Some(1));
        reader.finish()?;
        Ok(Self { name, order })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordProgressRequest {
    pub lesson_id: Id,
    pub user_id: Id,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RecordProgressRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let mut reader =
            FieldReader::new(payload, &["lessonId", "userId", "startedAt", "completedAt"])?;
        let lesson_id = reader.required_int("lessonId", Some(1));
        let user_id = reader.required_int("userId", Some(1));
        let started_at = reader.required_timestamp("startedAt");
        let completed_at = reader.required_timestamp("completedAt");
        if let (Some(started), Some(completed)) = (started_at, completed_at) {
            if completed < started {
                reader.reject("completedAt must not be earlier than startedAt");
            }
        }
        reader.finish()?;
        let (Some(lesson_id), Some(user_id), Some(started_at), Some(completed_at)) =
            (lesson_id, user_id, started_at, completed_at)
        else {
            return Err(ValidationError::single("payload is incomplete"));
        };
        Ok(Self {
            lesson_id,
            user_id,
            started_at,
            completed_at,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateAchievementRequest {
    pub name: String,
    pub description: String,
    pub objective: ObjectiveType,
    pub target: i64,
    pub course_id: Option<Id>,
}

impl CreateAchievementRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let mut reader = FieldReader::new(
            payload,
            &["name", "description", "type", "target", "courseId"],
        )?;
        let name = reader.required_string("name", NAME_MAX_LEN);
        let description = reader.required_string("description", DESCRIPTION_MAX_LEN);
        let objective = reader.required_enum::<ObjectiveType>("type", &OBJECTIVE_VALUES);
        let target = reader.required_int("target", Some(1));
        let course_id = reader.optional_int("courseId", Some(1));
        reader.finish()?;
        let (Some(name), Some(description), Some(objective), Some(target)) =
            (name, description, objective, target)
        else {
            return Err(ValidationError::single("payload is incomplete"));
        };
        Ok(Self {
            name,
            description,
            objective,
            target,
            course_id,
        })
    }

    /// Business rules tying `type`, `target` and `courseId` together. The
    /// referenced course's existence is checked by the store.
    pub fn check_objective_rules(&self) -> Result<(), String> {
        if self.course_id.is_some() && !self.objective.is_course_scoped() {
            return Err(
                "Course ID can only be set for course completion achievements".to_string(),
            );
        }
        if self.objective.is_course_scoped() {
            if self.target != 1 {
                return Err("Target must be 1 for course completion achievements".to_string());
            }
            if self.course_id.is_none() {
                return Err(
                    "Course ID is required for course completion achievements".to_string(),
                );
            }
        }
        Ok(())
    }
}

/// `type` and `target` are fixed at creation and rejected here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateAchievementRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub course_id: Option<Id>,
}

impl UpdateAchievementRequest {
    pub fn from_json(payload: &Value) -> Result<Self, ValidationError> {
        let mut reader = FieldReader::new(payload, &["name", "description", "courseId"])?;
        let name = reader.optional_string("name", NAME_MAX_LEN);
        let description = reader.optional_string("description", DESCRIPTION_MAX_LEN);
        let course_id = reader.optional_int("courseId", Some(1));
        reader.finish()?;
        Ok(Self {
            name,
            description,
            course_id,
        })
    }
}
