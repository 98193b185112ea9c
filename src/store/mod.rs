use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use time::OffsetDateTime;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Placeholder written over the password field before a user record is
/// allowed to cross the response boundary.
pub const MASKED_PASSWORD: &str = "xxxxxxxxxxxxxxxxxxxx";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 PHC string at rest; replaced by [`MASKED_PASSWORD`] via
    /// [`User::masked`] before serialization to a client.
    pub password: String,
    pub fullname: String,
    pub description: Option<String>,
    pub tagline: Option<String>,
    pub picture: Option<String>,
    pub admin: bool,
}

impl User {
    /// Returns the record with its password field masked. The stored hash
    /// is never round-tripped back to a caller.
    pub fn masked(mut self) -> User {
        self.password = MASKED_PASSWORD.to_string();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: i64,
    pub user_id: i64,
    pub center_id: i64,
    pub title: String,
    pub starts_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EventCenter {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub capacity: Option<i32>,
}

/// Insert payload for registration; `admin` is always false for
/// self-registered accounts.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub fullname: String,
}

/// Partial profile update. Fields left as `None` keep their prior values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub fullname: Option<String>,
    pub description: Option<String>,
    pub tagline: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The database's own uniqueness constraint fired. This is the
    /// authoritative backstop for the check-then-insert race in
    /// registration.
    #[error("{0}")]
    UniqueViolation(String),
    #[error("{0}")]
    Database(#[from] sqlx::Error),
}

/// Persistence collaborator. The service and validation stages only ever
/// see this trait; the concrete store owns the records and their
/// uniqueness constraints.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    /// Fetches a user by id, with their events when `with_events` is set
    /// (the events vec is empty otherwise).
    async fn find_user_by_id(
        &self,
        id: i64,
        with_events: bool,
    ) -> Result<Option<(User, Vec<Event>)>, StoreError>;

    async fn find_center_by_id(&self, id: i64) -> Result<Option<EventCenter>, StoreError>;

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError>;

    /// Applies the patch to the user with the given id. `None` means no
    /// such user.
    async fn update_user(&self, id: i64, patch: ProfilePatch)
        -> Result<Option<User>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_user_hides_the_hash() {
        let user = User {
            id: 1,
            username: "bob".into(),
            email: "bob@example.com".into(),
            password: "$argon2id$v=19$m=19456,t=2,p=1$abc$def".into(),
            fullname: "Bob Builder".into(),
            description: None,
            tagline: None,
            picture: None,
            admin: false,
        };
        let masked = user.masked();
        assert_eq!(masked.password, MASKED_PASSWORD);

        let json = serde_json::to_string(&masked).unwrap();
        assert!(!json.contains("argon2id"));
        assert!(json.contains(MASKED_PASSWORD));
    }
}
