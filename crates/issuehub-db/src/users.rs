use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use issuehub_types::{Role, Subscription};

use crate::models::{NewUser, StaffUpdate, StaffUpdateOutcome, UserRow};
use crate::{Database, OptionalExt, parse_col, timestamp};

const USER_COLUMNS: &str = "id, name, email, password, role, subscription, blocked, avatar_url, \
     phone, issues_created, created_at";

impl Database {
    /// Returns false, inserting nothing, when the email is already registered.
    pub fn create_user(&self, user: &NewUser) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, role, avatar_url, phone, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![
                    user.id.to_string(),
                    user.name,
                    user.email.to_lowercase(),
                    user.password_hash,
                    user.role.as_str(),
                    user.avatar_url,
                    user.phone,
                    timestamp(Utc::now()),
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &email.to_lowercase()))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id.to_string()))
    }

    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users WHERE (?1 IS NULL OR role = ?1) ORDER BY created_at DESC",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([role.map(|r| r.as_str())], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no such user exists.
    pub fn set_blocked(&self, id: Uuid, blocked: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET blocked = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), blocked],
            )?;
            Ok(changed == 1)
        })
    }

    /// Self-service profile change. Returns false when no such user exists.
    pub fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE users SET name = COALESCE(?2, name), avatar_url = COALESCE(?3, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![id.to_string(), name, avatar_url],
            )?;
            if changed == 1 {
                if let Some(name) = name {
                    tx.execute(
                        "UPDATE issues SET citizen_name = ?2 WHERE owner_id = ?1",
                        rusqlite::params![id.to_string(), name],
                    )?;
                }
            }
            tx.commit()?;
            Ok(changed == 1)
        })
    }

    /// Only rows with role = staff are touched. The email check and the
    /// update share one transaction.
    pub fn update_staff(&self, id: Uuid, update: &StaffUpdate) -> Result<StaffUpdateOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if let Some(email) = &update.email {
                let holder: Option<String> = tx
                    .query_row(
                        "SELECT id FROM users WHERE email = ?1",
                        [email.to_lowercase()],
                        |row| row.get(0),
                    )
                    .optional()?;
                if holder.is_some_and(|holder| holder != id.to_string()) {
                    return Ok(StaffUpdateOutcome::EmailTaken);
                }
            }
            let changed = tx.execute(
                "UPDATE users SET
                    name = COALESCE(?2, name),
                    email = COALESCE(?3, email),
                    phone = COALESCE(?4, phone),
                    avatar_url = COALESCE(?5, avatar_url),
                    password = COALESCE(?6, password)
                 WHERE id = ?1 AND role = 'staff'",
                rusqlite::params![
                    id.to_string(),
                    update.name,
                    update.email.as_ref().map(|e| e.to_lowercase()),
                    update.phone,
                    update.avatar_url,
                    update.password_hash,
                ],
            )?;
            // Keep the denormalised assignee name in step
            if changed == 1 {
                if let Some(name) = &update.name {
                    tx.execute(
                        "UPDATE issues SET assigned_staff_name = ?2 WHERE assigned_staff_id = ?1",
                        rusqlite::params![id.to_string(), name],
                    )?;
                }
            }
            tx.commit()?;
            Ok(if changed == 1 {
                StaffUpdateOutcome::Updated
            } else {
                StaffUpdateOutcome::NotFound
            })
        })
    }

    /// Removes a staff account. Issues keep their assignee reference so an
    /// admin can see and reassign them.
    pub fn delete_staff(&self, id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM users WHERE id = ?1 AND role = 'staff'",
                [id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn set_subscription(&self, id: Uuid, subscription: Subscription) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET subscription = ?2 WHERE id = ?1",
                rusqlite::params![id.to_string(), subscription.as_str()],
            )?;
            Ok(changed == 1)
        })
    }
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], map_user).optional()
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: parse_col(row, 0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        role: parse_col(row, 4)?,
        subscription: parse_col(row, 5)?,
        blocked: row.get(6)?,
        avatar_url: row.get(7)?,
        phone: row.get(8)?,
        issues_created: row.get(9)?,
        created_at: parse_col(row, 10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::new_user;

    #[test]
    fn create_and_lookup_user() {
        let db = Database::open_in_memory().unwrap();
        let user = new_user("Rahim", Role::Citizen);
        db.create_user(&user).unwrap();

        let by_email = db.get_user_by_email("RAHIM@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.subscription, Subscription::Free);
        assert!(!by_email.blocked);
        assert_eq!(by_email.issues_created, 0);

        assert!(db.get_user_by_id(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let user = new_user("Karim", Role::Citizen);
        db.create_user(&user).unwrap();

        let mut again = new_user("Karim", Role::Citizen);
        again.id = Uuid::new_v4();
        again.email = "KARIM@example.com".into();
        assert!(!db.create_user(&again).unwrap());
        assert!(db.get_user_by_id(again.id).unwrap().is_none());
        assert_eq!(db.list_users(None).unwrap().len(), 1);
    }

    #[test]
    fn staff_updates_only_touch_staff() {
        let db = Database::open_in_memory().unwrap();
        let staff = new_user("Nadia", Role::Staff);
        let citizen = new_user("Sami", Role::Citizen);
        db.create_user(&staff).unwrap();
        db.create_user(&citizen).unwrap();

        let update = StaffUpdate {
            name: Some("Nadia H".into()),
            ..Default::default()
        };
        assert_eq!(db.update_staff(staff.id, &update).unwrap(), StaffUpdateOutcome::Updated);
        assert_eq!(
            db.update_staff(citizen.id, &update).unwrap(),
            StaffUpdateOutcome::NotFound
        );
        assert_eq!(db.get_user_by_id(staff.id).unwrap().unwrap().name, "Nadia H");

        assert!(!db.delete_staff(citizen.id).unwrap());
        assert!(db.delete_staff(staff.id).unwrap());
        assert!(db.get_user_by_id(staff.id).unwrap().is_none());
    }

    #[test]
    fn staff_email_change_cannot_take_another_account() {
        let db = Database::open_in_memory().unwrap();
        let staff = new_user("Nadia", Role::Staff);
        let citizen = new_user("Sami", Role::Citizen);
        db.create_user(&staff).unwrap();
        db.create_user(&citizen).unwrap();

        let taken = StaffUpdate {
            name: Some("Renamed".into()),
            email: Some("SAMI@example.com".into()),
            ..Default::default()
        };
        assert_eq!(
            db.update_staff(staff.id, &taken).unwrap(),
            StaffUpdateOutcome::EmailTaken
        );
        // Nothing from the rejected update lands
        assert_eq!(db.get_user_by_id(staff.id).unwrap().unwrap().name, "Nadia");

        // Re-saving one's own email is not a conflict
        let own = StaffUpdate {
            email: Some("nadia@example.com".into()),
            ..Default::default()
        };
        assert_eq!(db.update_staff(staff.id, &own).unwrap(), StaffUpdateOutcome::Updated);
    }

    #[test]
    fn list_users_filters_by_role() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("A", Role::Citizen)).unwrap();
        db.create_user(&new_user("B", Role::Staff)).unwrap();

        assert_eq!(db.list_users(None).unwrap().len(), 2);
        let staff = db.list_users(Some(Role::Staff)).unwrap();
        assert_eq!(staff.len(), 1);
        assert_eq!(staff[0].name, "B");
    }
}
