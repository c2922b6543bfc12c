use academy_core::requests::{CreateOrderedRequest, UpdateOrderedRequest};
use academy_core::{Chapter, Id, Lesson};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::ordering::{SiblingSet, CHAPTERS, LESSONS};
use crate::{AcademyStore, StorageError};

/// An entity kept in dense order under a parent.
pub(crate) trait Ordered: Sized {
    const SIBLINGS: SiblingSet;
    /// Capitalized noun used in not-found messages.
    const KIND: &'static str;

    /// Builds the entity from `id, name, sort_order, <parent>`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl Ordered for Chapter {
    const SIBLINGS: SiblingSet = CHAPTERS;
    const KIND: &'static str = "Chapter";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Chapter {
            id: row.get(0)?,
            name: row.get(1)?,
            order: row.get(2)?,
            course_id: row.get(3)?,
        })
    }
}

impl Ordered for Lesson {
    const SIBLINGS: SiblingSet = LESSONS;
    const KIND: &'static str = "Lesson";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Lesson {
            id: row.get(0)?,
            name: row.get(1)?,
            order: row.get(2)?,
            chapter_id: row.get(3)?,
        })
    }
}

pub(crate) fn find_ordered<E: Ordered>(conn: &Connection, id: Id) -> Result<Option<E>, StorageError> {
    let siblings = E::SIBLINGS;
    let sql = format!(
        "SELECT id, name, sort_order, {} FROM {} WHERE id = ?1",
        siblings.parent_column, siblings.table
    );
    Ok(conn.query_row(&sql, [id], E::from_row).optional()?)
}

pub(crate) fn require_ordered<E: Ordered>(conn: &Connection, id: Id) -> Result<E, StorageError> {
    find_ordered(conn, id)?
        .ok_or_else(|| StorageError::NotFound(format!("{} with ID {id} not found", E::KIND)))
}

fn list_ordered<E: Ordered>(conn: &Connection, parent_id: Id) -> Result<Vec<E>, StorageError> {
    let siblings = E::SIBLINGS;
    let sql = format!(
        "
        SELECT id, name, sort_order, {parent}
        FROM {table}
        WHERE {parent} = ?1
        ORDER BY sort_order ASC
        ",
        parent = siblings.parent_column,
        table = siblings.table,
    );
    let mut statement = conn.prepare(&sql)?;
    let rows = statement.query_map([parent_id], E::from_row)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }

    // An empty list is ambiguous until the parent itself is known to exist.
    if items.is_empty() {
        siblings.require_parent(conn, parent_id)?;
    }
    Ok(items)
}

impl AcademyStore {
    fn create_ordered<E: Ordered>(&mut self, request: &CreateOrderedRequest) -> Result<E, StorageError> {
        let tx = self.write_tx()?;
        let id = E::SIBLINGS.insert_at(&tx, request.parent_id, request.order, &request.name)?;
        let created = require_ordered::<E>(&tx, id)?;
        tx.commit()?;
        Ok(created)
    }

    fn update_ordered<E: Ordered>(
        &mut self,
        id: Id,
        request: &UpdateOrderedRequest,
    ) -> Result<E, StorageError> {
        let siblings = E::SIBLINGS;
        let tx = self.write_tx()?;
        let Some(placement) = siblings.placement(&tx, id)? else {
            return Err(StorageError::NotFound(format!(
                "{} with ID {id} not found",
                E::KIND
            )));
        };

        if let Some(name) = &request.name {
            let sql = format!("UPDATE {} SET name = ?1 WHERE id = ?2", siblings.table);
            tx.execute(&sql, params![name, id])?;
        }
        if let Some(order) = request.order {
            siblings.move_to(&tx, placement, order)?;
        }

        let updated = require_ordered::<E>(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn delete_ordered<E: Ordered>(&mut self, id: Id) -> Result<E, StorageError> {
        let siblings = E::SIBLINGS;
        let tx = self.write_tx()?;
        let existing = require_ordered::<E>(&tx, id)?;
        let Some(placement) = siblings.placement(&tx, id)? else {
            return Err(StorageError::NotFound(format!(
                "{} with ID {id} not found",
                E::KIND
            )));
        };
        siblings.remove(&tx, placement)?;
        tx.commit()?;
        Ok(existing)
    }

    pub fn create_chapter(&mut self, request: &CreateOrderedRequest) -> Result<Chapter, StorageError> {
        let chapter = self.create_ordered::<Chapter>(request)?;
        info!(
            event = "chapter_created",
            chapter_id = chapter.id,
            course_id = chapter.course_id,
            order = chapter.order
        );
        Ok(chapter)
    }

    pub fn update_chapter(
        &mut self,
        chapter_id: Id,
        request: &UpdateOrderedRequest,
    ) -> Result<Chapter, StorageError> {
        self.update_ordered::<Chapter>(chapter_id, request)
    }

    /// Removes the chapter (and, by cascade, its lessons) and renumbers the
    /// remaining chapters of the course.
    pub fn delete_chapter(&mut self, chapter_id: Id) -> Result<Chapter, StorageError> {
        let chapter = self.delete_ordered::<Chapter>(chapter_id)?;
        info!(
            event = "chapter_deleted",
            chapter_id,
            course_id = chapter.course_id,
            order = chapter.order
        );
        Ok(chapter)
    }

    pub fn chapter(&self, chapter_id: Id) -> Result<Chapter, StorageError> {
        require_ordered(&self.conn, chapter_id)
    }

    pub fn chapters(&self, course_id: Id) -> Result<Vec<Chapter>, StorageError> {
        list_ordered(&self.conn, course_id)
    }

    pub fn create_lesson(&mut self, request: &CreateOrderedRequest) -> Result<Lesson, StorageError> {
        let lesson = self.create_ordered::<Lesson>(request)?;
        info!(
            event = "lesson_created",
            lesson_id = lesson.id,
            chapter_id = lesson.chapter_id,
            order = lesson.order
        );
        Ok(lesson)
    }

    pub fn update_lesson(
        &mut self,
        lesson_id: Id,
        request: &UpdateOrderedRequest,
    ) -> Result<Lesson, StorageError> {
        self.update_ordered::<Lesson>(lesson_id, request)
    }

    pub fn delete_lesson(&mut self, lesson_id: Id) -> Result<Lesson, StorageError> {
        let lesson = self.delete_ordered::<Lesson>(lesson_id)?;
        info!(
            event = "lesson_deleted",
            lesson_id,
            chapter_id = lesson.chapter_id,
            order = lesson.order
        );
        Ok(lesson)
    }

    pub fn lesson(&self, lesson_id: Id) -> Result<Lesson, StorageError> {
        require_ordered(&self.conn, lesson_id)
    }

    pub fn lessons(&self, chapter_id: Id) -> Result<Vec<Lesson>, StorageError> {
        list_ordered(&self.conn, chapter_id)
    }
}
