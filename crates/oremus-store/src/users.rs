//! CRUD operations for [`User`] records.

use rusqlite::params;

use oremus_shared::{User, UserId};

use crate::database::{from_millis, ts_millis, Database};
use crate::error::{Result, StoreError};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user.  A duplicate username surfaces as
    /// [`StoreError::UniqueViolation`].
    pub fn create_user(&self, user: &User) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO users (id, username, name, bio, profile_image, banner_image, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.to_string(),
                    user.username,
                    user.name,
                    user.bio,
                    user.profile_image,
                    user.banner_image,
                    ts_millis(user.created_at),
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::UniqueViolation("username")
                }
                other => StoreError::Sqlite(other),
            })?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single user by id.
    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, name, bio, profile_image, banner_image, created_at
                 FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Fetch a single user by unique username.
    pub fn get_user_by_username(&self, username: &str) -> Result<User> {
        self.conn()
            .query_row(
                "SELECT id, username, name, bio, profile_image, banner_image, created_at
                 FROM users WHERE username = ?1",
                params![username],
                row_to_user,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite the owner-mutable profile fields.
    pub fn update_user(&self, user: &User) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE users SET name = ?2, bio = ?3, profile_image = ?4, banner_image = ?5
             WHERE id = ?1",
            params![
                user.id.to_string(),
                user.name,
                user.bio,
                user.profile_image,
                user.banner_image,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`User`].  Column order must match the SELECT
/// lists above (and the member-listing join in `memberships.rs`).
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    row_to_user_at(row, 0)
}

pub(crate) fn row_to_user_at(row: &rusqlite::Row<'_>, base: usize) -> rusqlite::Result<User> {
    let id_str: String = row.get(base)?;
    let id = UserId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(base, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(User {
        id,
        username: row.get(base + 1)?,
        name: row.get(base + 2)?,
        bio: row.get(base + 3)?,
        profile_image: row.get(base + 4)?,
        banner_image: row.get(base + 5)?,
        created_at: from_millis(row.get(base + 6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(username: &str) -> User {
        User {
            id: UserId::new(),
            username: username.to_string(),
            name: "Test User".to_string(),
            bio: None,
            profile_image: None,
            banner_image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn create_and_fetch() {
        let db = Database::open_in_memory().unwrap();
        let u = user("alice");
        db.create_user(&u).unwrap();

        let by_id = db.get_user(u.id).unwrap();
        assert_eq!(by_id.username, "alice");
        let by_name = db.get_user_by_username("alice").unwrap();
        assert_eq!(by_name.id, u.id);
    }

    #[test]
    fn duplicate_username_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&user("bob")).unwrap();
        let err = db.create_user(&user("bob")).unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation("username")));
    }

    #[test]
    fn update_profile_fields() {
        let db = Database::open_in_memory().unwrap();
        let mut u = user("carol");
        db.create_user(&u).unwrap();

        u.bio = Some("praying daily".to_string());
        u.profile_image = Some("images/carol.png".to_string());
        db.update_user(&u).unwrap();

        let fetched = db.get_user(u.id).unwrap();
        assert_eq!(fetched.bio.as_deref(), Some("praying daily"));
        assert_eq!(fetched.profile_image.as_deref(), Some("images/carol.png"));
    }

    #[test]
    fn missing_user_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_user(UserId::new()),
            Err(StoreError::NotFound)
        ));
    }
}
