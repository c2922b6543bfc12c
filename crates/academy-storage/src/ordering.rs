//! Dense 1-based ordering of children under a parent.
//!
//! Chapters under a course and lessons under a chapter share the same rules,
//! so both are driven by one [`SiblingSet`] description. Callers pass an open
//! transaction; the renumbering and the entity write commit together.

use academy_core::Id;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::StorageError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct SiblingSet {
    pub table: &'static str,
    pub parent_column: &'static str,
    pub parent_table: &'static str,
    /// Capitalized parent noun used in not-found messages.
    pub parent_label: &'static str,
    /// Lowercase child noun used in ordering messages.
    pub label: &'static str,
}

pub(crate) const CHAPTERS: SiblingSet = SiblingSet {
    table: "chapters",
    parent_column: "course_id",
    parent_table: "courses",
    parent_label: "Course",
    label: "chapter",
};

pub(crate) const LESSONS: SiblingSet = SiblingSet {
    table: "lessons",
    parent_column: "chapter_id",
    parent_table: "chapters",
    parent_label: "Chapter",
    label: "lesson",
};

/// Position of an existing child: its id, parent and current order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub id: Id,
    pub parent_id: Id,
    pub order: i64,
}

impl SiblingSet {
    pub fn require_parent(&self, conn: &Connection, parent_id: Id) -> Result<(), StorageError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", self.parent_table);
        let exists = conn
            .query_row(&sql, [parent_id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StorageError::NotFound(format!(
                "{} with ID {parent_id} not found",
                self.parent_label
            )));
        }
        Ok(())
    }

    pub fn placement(&self, conn: &Connection, id: Id) -> Result<Option<Placement>, StorageError> {
        let sql = format!(
            "SELECT id, {}, sort_order FROM {} WHERE id = ?1",
            self.parent_column, self.table
        );
        let placement = conn
            .query_row(&sql, [id], |row| {
                Ok(Placement {
                    id: row.get(0)?,
                    parent_id: row.get(1)?,
                    order: row.get(2)?,
                })
            })
            .optional()?;
        Ok(placement)
    }

    pub fn sibling_count(&self, conn: &Connection, parent_id: Id) -> Result<i64, StorageError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
            self.table, self.parent_column
        );
        Ok(conn.query_row(&sql, [parent_id], |row| row.get(0))?)
    }

    fn require_order(
        &self,
        conn: &Connection,
        parent_id: Id,
        order: i64,
    ) -> Result<(), StorageError> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1 AND sort_order = ?2",
            self.table, self.parent_column
        );
        let exists = conn
            .query_row(&sql, params![parent_id, order], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StorageError::BadRequest(format!(
                "Cannot create or move {label} because {label} (order {order}) does not exist",
                label = self.label
            )));
        }
        Ok(())
    }

    /// Adds `delta` to the order of every sibling in `[from, to]`, skipping
    /// `exclude`. Rows pass through negative values first so the
    /// `(parent, sort_order)` unique index never sees a transient duplicate.
    fn shift(
        &self,
        tx: &Transaction<'_>,
        parent_id: Id,
        from: i64,
        to: i64,
        delta: i64,
        exclude: Option<Id>,
    ) -> Result<usize, StorageError> {
        let park = format!(
            "
            UPDATE {table}
            SET sort_order = -(sort_order + ?1)
            WHERE {parent} = ?2
              AND sort_order BETWEEN ?3 AND ?4
              AND (?5 IS NULL OR id <> ?5)
            ",
            table = self.table,
            parent = self.parent_column,
        );
        let moved = tx.execute(&park, params![delta, parent_id, from, to, exclude])?;
        if moved == 0 {
            return Ok(0);
        }

        let restore = format!(
            "UPDATE {} SET sort_order = -sort_order WHERE {} = ?1 AND sort_order < 0",
            self.table, self.parent_column
        );
        tx.execute(&restore, [parent_id])?;
        Ok(moved)
    }

    /// Inserts a new child at `order`, pushing siblings at or after it back by
    /// one. `order` may be at most one past the current last sibling.
    pub fn insert_at(
        &self,
        tx: &Transaction<'_>,
        parent_id: Id,
        order: i64,
        name: &str,
    ) -> Result<Id, StorageError> {
        self.require_parent(tx, parent_id)?;
        if order < 1 {
            return Err(StorageError::BadRequest(format!(
                "{} order must not be less than 1",
                self.label
            )));
        }
        if order > 1 {
            self.require_order(tx, parent_id, order - 1)?;
        }

        let shifted = self.shift(tx, parent_id, order, i64::MAX, 1, None)?;
        let sql = format!(
            "INSERT INTO {} (name, sort_order, {}) VALUES (?1, ?2, ?3)",
            self.table, self.parent_column
        );
        tx.execute(&sql, params![name, order, parent_id])?;
        let id = tx.last_insert_rowid();
        debug!(
            event = "sibling_inserted",
            table = self.table,
            parent_id,
            id,
            order,
            shifted
        );
        Ok(id)
    }

    /// Moves an existing child to `new_order` within its parent.
    pub fn move_to(
        &self,
        tx: &Transaction<'_>,
        placement: Placement,
        new_order: i64,
    ) -> Result<(), StorageError> {
        let Placement {
            id,
            parent_id,
            order: old_order,
        } = placement;
        if new_order == old_order {
            return Ok(());
        }
        if new_order < 1 {
            return Err(StorageError::BadRequest(format!(
                "{} order must not be less than 1",
                self.label
            )));
        }

        if new_order > old_order {
            self.require_order(tx, parent_id, new_order)?;
        }

        // Order 0 is never a real position, so the moved row can wait there
        // while its neighbours close ranks.
        let sql = format!("UPDATE {} SET sort_order = ?1 WHERE id = ?2", self.table);
        tx.execute(&sql, params![0, id])?;
        let shifted = if new_order < old_order {
            self.shift(tx, parent_id, new_order, old_order - 1, 1, Some(id))?
        } else {
            self.shift(tx, parent_id, old_order + 1, new_order, -1, Some(id))?
        };
        tx.execute(&sql, params![new_order, id])?;
        debug!(
            event = "sibling_moved",
            table = self.table,
            parent_id,
            id,
            old_order,
            new_order,
            shifted
        );
        Ok(())
    }

    /// Deletes a child and closes the gap it leaves.
    pub fn remove(&self, tx: &Transaction<'_>, placement: Placement) -> Result<(), StorageError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", self.table);
        tx.execute(&sql, [placement.id])?;
        let shifted = self.shift(
            tx,
            placement.parent_id,
            placement.order + 1,
            i64::MAX,
            -1,
            None,
        )?;
        debug!(
            event = "sibling_removed",
            table = self.table,
            parent_id = placement.parent_id,
            id = placement.id,
            order = placement.order,
            shifted
        );
        Ok(())
    }
}
