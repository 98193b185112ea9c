use async_trait::async_trait;
use sqlx::PgPool;

use crate::store::{
    Event, EventCenter, NewUser, ProfilePatch, StoreError, User, UserStore,
};

/// Postgres-backed [`UserStore`]. Uniqueness of username and email is
/// enforced by the schema's UNIQUE constraints; a violation on insert is
/// reported as [`StoreError::UniqueViolation`].
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password, fullname, description, tagline, picture, admin";

fn map_insert_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let constraint = db.constraint().unwrap_or_default();
            let message = if constraint.contains("email") {
                "Email already taken!"
            } else {
                "Username already taken!"
            };
            return StoreError::UniqueViolation(message.to_string());
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_id(
        &self,
        id: i64,
        with_events: bool,
    ) -> Result<Option<(User, Vec<Event>)>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(user) = user else { return Ok(None) };

        let events = if with_events {
            sqlx::query_as::<_, Event>(
                r#"
                SELECT id, user_id, center_id, title, starts_at
                FROM events
                WHERE user_id = $1
                ORDER BY starts_at
                "#,
            )
            .bind(id)
            .fetch_all(&self.pool)
            .await?
        } else {
            Vec::new()
        };

        Ok(Some((user, events)))
    }

    async fn find_center_by_id(&self, id: i64) -> Result<Option<EventCenter>, StoreError> {
        let center = sqlx::query_as::<_, EventCenter>(
            r#"
            SELECT id, name, location, capacity
            FROM event_centers
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(center)
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password, fullname, admin)
            VALUES ($1, $2, $3, $4, FALSE)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .bind(&new_user.fullname)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;
        Ok(user)
    }

    async fn update_user(
        &self,
        id: i64,
        patch: ProfilePatch,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET fullname    = COALESCE($2, fullname),
                description = COALESCE($3, description),
                tagline     = COALESCE($4, tagline),
                picture     = COALESCE($5, picture)
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.fullname)
        .bind(patch.description)
        .bind(patch.tagline)
        .bind(patch.picture)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }
}
