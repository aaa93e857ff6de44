//! In-app notification rows.  Written synchronously when a moderation or
//! social event fires; external push delivery happens elsewhere and may
//! fail without affecting these rows.

use rusqlite::params;

use oremus_shared::{CursorKey, Notification, NotificationId, UserId};

use crate::database::{from_millis, ts_millis, Database};
use crate::error::Result;
use crate::query::{Dir, Predicate, SelectSpec};

impl Database {
    pub fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.conn().execute(
            "INSERT INTO notifications (id, user_id, title, body, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                notification.id.to_string(),
                notification.user_id.to_string(),
                notification.title,
                notification.body,
                notification.data.to_string(),
                ts_millis(notification.created_at),
            ],
        )?;
        Ok(())
    }

    /// One user's notifications, newest first, keyset-paginated.
    pub fn list_notifications(
        &self,
        user_id: UserId,
        cursor: Option<&CursorKey>,
        limit: i64,
    ) -> Result<Vec<(Notification, CursorKey)>> {
        let keyset = cursor
            .map(|key| Predicate::keyset(&[("n.created_at", Dir::Desc), ("n.id", Dir::Asc)], key));
        let spec = SelectSpec::new(
            "SELECT n.id, n.user_id, n.title, n.body, n.data, n.created_at FROM notifications n",
            vec![("n.created_at".into(), Dir::Desc), ("n.id".into(), Dir::Asc)],
            limit,
        )
        .and(Predicate::eq("n.user_id", user_id.to_string()))
        .and_opt(keyset);

        let mut stmt = self.conn().prepare(&spec.sql())?;
        let rows = stmt.query_map(rusqlite::params_from_iter(spec.params()), |row| {
            let notification = row_to_notification(row)?;
            let created: i64 = row.get(5)?;
            Ok((notification, created))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (notification, created) = row?;
            let key = CursorKey::new(vec![created], notification.id.to_string());
            out.push((notification, key));
        }
        Ok(out)
    }
}

fn row_to_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<Notification> {
    let id_str: String = row.get(0)?;
    let user_str: String = row.get(1)?;
    let data_str: String = row.get(4)?;

    let id = NotificationId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let user_id = UserId::parse(&user_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let data = serde_json::from_str(&data_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Notification {
        id,
        user_id,
        title: row.get(2)?,
        body: row.get(3)?,
        data,
        created_at: from_millis(row.get(5)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use oremus_shared::User;
    use serde_json::json;

    fn seed_user(db: &Database, username: &str) -> UserId {
        let u = User {
            id: UserId::new(),
            username: username.to_string(),
            name: username.to_string(),
            bio: None,
            profile_image: None,
            banner_image: None,
            created_at: Utc::now(),
        };
        db.create_user(&u).unwrap();
        u.id
    }

    #[test]
    fn list_is_scoped_and_paginated() {
        let db = Database::open_in_memory().unwrap();
        let me = seed_user(&db, "me");
        let other = seed_user(&db, "other");
        let base = Utc::now();

        for i in 0..5 {
            db.insert_notification(&Notification {
                id: NotificationId::new(),
                user_id: me,
                title: format!("n{i}"),
                body: "body".to_string(),
                data: json!({ "seq": i }),
                created_at: base + Duration::seconds(i),
            })
            .unwrap();
        }
        db.insert_notification(&Notification {
            id: NotificationId::new(),
            user_id: other,
            title: "not mine".to_string(),
            body: String::new(),
            data: json!({}),
            created_at: base,
        })
        .unwrap();

        let first = db.list_notifications(me, None, 3).unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].0.title, "n4");
        assert_eq!(first[0].0.data, json!({ "seq": 4 }));

        let rest = db.list_notifications(me, Some(&first[2].1), 10).unwrap();
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[1].0.title, "n0");
    }
}
