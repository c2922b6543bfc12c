use academy_core::requests::{CreateAchievementRequest, UpdateAchievementRequest};
use academy_core::{Achievement, Id};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::courses::require_course;
use crate::{column_objective, AcademyStore, StorageError};

const ACHIEVEMENT_COLUMNS: &str = "id, name, description, objective_type, target, course_id";

/// Reads `id, name, description, objective_type, target, course_id` from the
/// first six columns.
pub(crate) fn achievement_from_row(row: &Row<'_>) -> rusqlite::Result<Achievement> {
    Ok(Achievement {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        objective: column_objective(3, row.get(3)?)?,
        target: row.get(4)?,
        course_id: row.get(5)?,
    })
}

fn require_achievement(conn: &Connection, achievement_id: Id) -> Result<Achievement, StorageError> {
    let sql = format!("SELECT {ACHIEVEMENT_COLUMNS} FROM achievements WHERE id = ?1");
    conn.query_row(&sql, [achievement_id], achievement_from_row)
        .optional()?
        .ok_or_else(|| {
            StorageError::NotFound(format!("Achievement with ID {achievement_id} not found"))
        })
}

impl AcademyStore {
    pub fn create_achievement(
        &mut self,
        request: &CreateAchievementRequest,
    ) -> Result<Achievement, StorageError> {
        request
            .check_objective_rules()
            .map_err(StorageError::BadRequest)?;

        let tx = self.write_tx()?;
        if let Some(course_id) = request.course_id {
            require_course(&tx, course_id)?;
        }
        tx.execute(
            "
            INSERT INTO achievements (name, description, objective_type, target, course_id)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ",
            params![
                request.name,
                request.description,
                request.objective.as_str(),
                request.target,
                request.course_id
            ],
        )?;
        let achievement = Achievement {
            id: tx.last_insert_rowid(),
            name: request.name.clone(),
            description: request.description.clone(),
            objective: request.objective,
            target: request.target,
            course_id: request.course_id,
        };
        tx.commit()?;

        info!(
            event = "achievement_created",
            achievement_id = achievement.id,
            objective = achievement.objective.as_str(),
            target = achievement.target
        );
        Ok(achievement)
    }

    /// Type and target are fixed at creation; only the descriptive fields and
    /// a course-scoped achievement's course may change.
    pub fn update_achievement(
        &mut self,
        achievement_id: Id,
        request: &UpdateAchievementRequest,
    ) -> Result<Achievement, StorageError> {
        let tx = self.write_tx()?;
        let mut achievement = require_achievement(&tx, achievement_id)?;

        if let Some(course_id) = request.course_id {
            if !achievement.objective.is_course_scoped() {
                return Err(StorageError::BadRequest(
                    "Course ID can only be set for course completion achievements".to_string(),
                ));
            }
            require_course(&tx, course_id)?;
            achievement.course_id = Some(course_id);
        }
        if let Some(name) = &request.name {
            achievement.name = name.clone();
        }
        if let Some(description) = &request.description {
            achievement.description = description.clone();
        }

        tx.execute(
            "
            UPDATE achievements
            SET name = ?1, description = ?2, course_id = ?3
            WHERE id = ?4
            ",
            params![
                achievement.name,
                achievement.description,
                achievement.course_id,
                achievement_id
            ],
        )?;
        tx.commit()?;
        Ok(achievement)
    }

    /// Cascades to every user's progress row for the achievement.
    pub fn delete_achievement(&mut self, achievement_id: Id) -> Result<(), StorageError> {
        let tx = self.write_tx()?;
        let changes = tx.execute("DELETE FROM achievements WHERE id = ?1", [achievement_id])?;
        if changes == 0 {
            return Err(StorageError::NotFound(format!(
                "Achievement with ID {achievement_id} not found"
            )));
        }
        tx.commit()?;
        info!(event = "achievement_deleted", achievement_id);
        Ok(())
    }

    pub fn achievement(&self, achievement_id: Id) -> Result<Achievement, StorageError> {
        require_achievement(&self.conn, achievement_id)
    }

    pub fn achievements(&self) -> Result<Vec<Achievement>, StorageError> {
        let sql = format!("SELECT {ACHIEVEMENT_COLUMNS} FROM achievements ORDER BY id ASC");
        let mut statement = self.conn.prepare(&sql)?;
        let rows = statement.query_map([], achievement_from_row)?;

        let mut achievements = Vec::new();
        for row in rows {
            achievements.push(row?);
        }
        Ok(achievements)
    }
}
