use chrono::{DateTime, Utc};
use serde::Serialize;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::SqliteStore;
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub is_staff: bool,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

type UserRow = (i64, String, String, bool, bool, DateTime<Utc>);

const USER_COLUMNS: &str = "id, email, username, is_staff, is_active, date_joined";

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        let (id, email, username, is_staff, is_active, date_joined) = row;
        Self {
            id,
            email,
            username,
            is_staff,
            is_active,
            date_joined,
        }
    }
}

/// Hex-encoded blake3 digest of an API token. Only the digest is stored.
#[must_use]
pub fn token_digest(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}

/// Tokens look like `<user id>.<secret>` so lookup is by primary key and the
/// digest comparison runs in constant time.
fn new_token(user_id: i64) -> String {
    format!(
        "{user_id}.{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

impl SqliteStore {
    /// Create a user and return it together with its API token.
    ///
    /// The token is not recoverable afterwards.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEmail` if the email is taken, or a database error.
    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        is_staff: bool,
    ) -> Result<(User, String), StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted: Result<UserRow, sqlx::Error> = sqlx::query_as(&format!(
            "INSERT INTO users (email, username, is_staff, is_active, date_joined) \
             VALUES (?, ?, ?, 1, ?) RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(username)
        .bind(is_staff)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(StoreError::DuplicateEmail(email.to_owned()));
            }
            Err(e) => return Err(e.into()),
        };

        let user = User::from(row);
        let token = new_token(user.id);
        sqlx::query("UPDATE users SET token_digest = ? WHERE id = ?")
            .bind(token_digest(&token))
            .bind(user.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = user.id, "user created");
        Ok((user, token))
    }

    /// Resolve a bearer token to its user.
    ///
    /// Returns `None` for malformed or unknown tokens. Inactive users are
    /// returned so callers can tell them apart from unknown tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn user_by_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let Some((id, _)) = token.split_once('.') else {
            return Ok(None);
        };
        let Ok(id) = id.parse::<i64>() else {
            return Ok(None);
        };

        let row: Option<(i64, String, String, bool, bool, DateTime<Utc>, String)> =
            sqlx::query_as(&format!(
                "SELECT {USER_COLUMNS}, token_digest FROM users WHERE id = ?"
            ))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some((id, email, username, is_staff, is_active, date_joined, stored)) = row else {
            return Ok(None);
        };

        let presented = token_digest(token);
        if !bool::from(stored.as_bytes().ct_eq(presented.as_bytes())) {
            return Ok(None);
        }

        Ok(Some(User::from((
            id,
            email,
            username,
            is_staff,
            is_active,
            date_joined,
        ))))
    }

    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(User::from))
    }

    /// All users ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no user has this id.
    pub async fn set_user_active(&self, id: i64, active: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "user",
                id: id.to_string(),
            });
        }
        Ok(())
    }
}
