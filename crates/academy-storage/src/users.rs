use academy_core::requests::NameRequest;
use academy_core::{Id, User};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{AcademyStore, StorageError};

pub(crate) fn find_user(conn: &Connection, user_id: Id) -> Result<Option<User>, StorageError> {
    let user = conn
        .query_row(
            "SELECT id, name FROM users WHERE id = ?1",
            [user_id],
            |row| {
                Ok(User {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(user)
}

pub(crate) fn require_user(conn: &Connection, user_id: Id) -> Result<User, StorageError> {
    find_user(conn, user_id)?
        .ok_or_else(|| StorageError::NotFound(format!("User with ID {user_id} not found")))
}

impl AcademyStore {
    pub fn create_user(&mut self, request: &NameRequest) -> Result<User, StorageError> {
        let tx = self.write_tx()?;
        tx.execute("INSERT INTO users (name) VALUES (?1)", [&request.name])?;
        let user = User {
            id: tx.last_insert_rowid(),
            name: request.name.clone(),
        };
        tx.commit()?;
        Ok(user)
    }

    pub fn update_user(&mut self, user_id: Id, request: &NameRequest) -> Result<User, StorageError> {
        let tx = self.write_tx()?;
        let changes = tx.execute(
            "UPDATE users SET name = ?1 WHERE id = ?2",
            params![request.name, user_id],
        )?;
        if changes == 0 {
            return Err(StorageError::NotFound(format!(
                "User with ID {user_id} not found"
            )));
        }
        tx.commit()?;
        Ok(User {
            id: user_id,
            name: request.name.clone(),
        })
    }

    /// Cascades to the user's progress log and achievement rows.
    pub fn delete_user(&mut self, user_id: Id) -> Result<(), StorageError> {
        let tx = self.write_tx()?;
        let changes = tx.execute("DELETE FROM users WHERE id = ?1", [user_id])?;
        if changes == 0 {
            return Err(StorageError::NotFound(format!(
                "User with ID {user_id} not found"
            )));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn user(&self, user_id: Id) -> Result<User, StorageError> {
        require_user(&self.conn, user_id)
    }

    pub fn users(&self) -> Result<Vec<User>, StorageError> {
        let mut statement = self.conn.prepare("SELECT id, name FROM users ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok(User {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn user_crud_roundtrip() {
        let mut db = test_support::store();
        let created = test_support::user(&mut db, "Ada");
        assert_eq!(db.user(created.id).expect("get user"), created);

        let renamed = db
            .update_user(
                created.id,
                &NameRequest {
                    name: "Ada L.".to_string(),
                },
            )
            .expect("rename user");
        assert_eq!(renamed.name, "Ada L.");
        assert_eq!(db.users().expect("list users"), vec![renamed]);

        db.delete_user(created.id).expect("delete user");
        assert!(matches!(
            db.user(created.id),
            Err(StorageError::NotFound(message)) if message.contains("not found")
        ));
    }

    #[test]
    fn missing_user_updates_and_deletes_are_not_found() {
        let mut db = test_support::store();
        let request = NameRequest {
            name: "Ghost".to_string(),
        };
        assert!(matches!(
            db.update_user(999, &request),
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(db.delete_user(999), Err(StorageError::NotFound(_))));
    }
}
