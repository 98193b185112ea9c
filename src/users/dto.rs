use serde::{Deserialize, Serialize};

use crate::store::{Event, EventCenter, User};

/// Registration payload, deserialized from the chain-normalized body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    pub fullname: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Returned after registration: the masked user record plus a session
/// token for the new identity.
#[derive(Debug, Serialize)]
pub struct RegisteredResponse {
    pub message: String,
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
}

/// A masked user record with their events inlined.
#[derive(Debug, Serialize)]
pub struct ProfileUser {
    #[serde(flatten)]
    pub user: User,
    pub events: Vec<Event>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub message: String,
    pub user: ProfileUser,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct CenterResponse {
    pub message: String,
    pub center: EventCenter,
}
