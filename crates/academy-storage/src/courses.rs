use academy_core::requests::NameRequest;
use academy_core::{Course, Id};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{AcademyStore, StorageError};

pub(crate) fn require_course(conn: &Connection, course_id: Id) -> Result<Course, StorageError> {
    conn.query_row(
        "SELECT id, name FROM courses WHERE id = ?1",
        [course_id],
        |row| {
            Ok(Course {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StorageError::NotFound(format!("Course with ID {course_id} not found")))
}

impl AcademyStore {
    pub fn create_course(&mut self, request: &NameRequest) -> Result<Course, StorageError> {
        let tx = self.write_tx()?;
        tx.execute("INSERT INTO courses (name) VALUES (?1)", [&request.name])?;
        let course = Course {
            id: tx.last_insert_rowid(),
            name: request.name.clone(),
        };
        tx.commit()?;
        Ok(course)
    }

    pub fn update_course(
        &mut self,
        course_id: Id,
        request: &NameRequest,
    ) -> Result<Course, StorageError> {
        let tx = self.write_tx()?;
        let changes = tx.execute(
            "UPDATE courses SET name = ?1 WHERE id = ?2",
            params![request.name, course_id],
        )?;
        if changes == 0 {
            return Err(StorageError::NotFound(format!(
                "Course with ID {course_id} not found"
            )));
        }
        tx.commit()?;
        Ok(Course {
            id: course_id,
            name: request.name.clone(),
        })
    }

    /// Cascades to chapters, their lessons and progress rows on those lessons.
    /// Achievements scoped to this course and their user rows are kept.
    pub fn delete_course(&mut self, course_id: Id) -> Result<(), StorageError> {
        let tx = self.write_tx()?;
        let changes = tx.execute("DELETE FROM courses WHERE id = ?1", [course_id])?;
        if changes == 0 {
            return Err(StorageError::NotFound(format!(
                "Course with ID {course_id} not found"
            )));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn course(&self, course_id: Id) -> Result<Course, StorageError> {
        require_course(&self.conn, course_id)
    }

    pub fn courses(&self) -> Result<Vec<Course>, StorageError> {
        let mut statement = self
            .conn
            .prepare("SELECT id, name FROM courses ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok(Course {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut courses = Vec::new();
        for row in rows {
            courses.push(row?);
        }
        Ok(courses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn deleting_course_cascades_to_chapters_and_lessons() {
        let mut db = test_support::store();
        let course = test_support::course(&mut db, "Swift");
        let chapter = test_support::chapter(&mut db, course.id, 1);
        let lesson = test_support::lesson(&mut db, chapter.id, 1);

        db.delete_course(course.id).expect("delete course");

        assert!(matches!(db.chapter(chapter.id), Err(StorageError::NotFound(_))));
        assert!(matches!(db.lesson(lesson.id), Err(StorageError::NotFound(_))));
        assert!(db.courses().expect("list courses").is_empty());
    }

    #[test]
    fn course_rename_and_lookup() {
        let mut db = test_support::store();
        let course = test_support::course(&mut db, "Javascript");
        let renamed = db
            .update_course(
                course.id,
                &NameRequest {
                    name: "TypeScript".to_string(),
                },
            )
            .expect("rename course");
        assert_eq!(db.course(course.id).expect("get course"), renamed);
        assert!(matches!(db.course(404), Err(StorageError::NotFound(_))));
    }
}
