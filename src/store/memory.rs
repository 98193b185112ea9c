use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::store::{
    Event, EventCenter, NewUser, ProfilePatch, StoreError, User, UserStore,
};

/// In-memory [`UserStore`] backing `AppState::fake()` and unit tests.
/// Enforces the same username/email uniqueness the database schema does.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<Vec<User>>,
    events: Mutex<Vec<Event>>,
    centers: Mutex<Vec<EventCenter>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn seed_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn seed_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn seed_center(&self, center: EventCenter) {
        self.centers.lock().unwrap().push(center);
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let users = self.users.lock().unwrap();
        Ok(users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(
        &self,
        id: i64,
        with_events: bool,
    ) -> Result<Option<(User, Vec<Event>)>, StoreError> {
        let users = self.users.lock().unwrap();
        let Some(user) = users.iter().find(|u| u.id == id).cloned() else {
            return Ok(None);
        };
        let events = if with_events {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.user_id == id)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        Ok(Some((user, events)))
    }

    async fn find_center_by_id(&self, id: i64) -> Result<Option<EventCenter>, StoreError> {
        let centers = self.centers.lock().unwrap();
        Ok(centers.iter().find(|c| c.id == id).cloned())
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == new_user.username) {
            return Err(StoreError::UniqueViolation(
                "Username already taken!".to_string(),
            ));
        }
        if users.iter().any(|u| u.email == new_user.email) {
            return Err(StoreError::UniqueViolation(
                "Email already taken!".to_string(),
            ));
        }
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            username: new_user.username,
            email: new_user.email,
            password: new_user.password,
            fullname: new_user.fullname,
            description: None,
            tagline: None,
            picture: None,
            admin: false,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        id: i64,
        patch: ProfilePatch,
    ) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(user) = users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(fullname) = patch.fullname {
            user.fullname = fullname;
        }
        if let Some(description) = patch.description {
            user.description = Some(description);
        }
        if let Some(tagline) = patch.tagline {
            user.tagline = Some(tagline);
        }
        if let Some(picture) = patch.picture {
            user.picture = Some(picture);
        }
        Ok(Some(user.clone()))
    }
}
