use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use crate::auth::jwt::JwtKeys;
use crate::auth::password::{hash_password, verify_password};
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{Event, NewUser, ProfilePatch, User};
use crate::users::dto::{LoginRequest, MessageResponse, RegisterRequest};

const MIN_PASSWORD_CHARS: usize = 5;

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Creates a user with a hashed password and signs a session token for
/// the new identity. The returned record has its password masked; the
/// store's uniqueness constraints are the backstop for any race between
/// the pre-insert checks and the insert itself.
pub async fn register(
    state: &AppState,
    payload: RegisterRequest,
) -> Result<(User, String), ApiError> {
    if payload.password.chars().count() < MIN_PASSWORD_CHARS {
        warn!(username = %payload.username, "registration rejected, password too short");
        return Err(ApiError::Validation(
            "password is too short! - make sure it is at least 5 characters".to_string(),
        ));
    }
    if !is_valid_email(&payload.email) {
        warn!(username = %payload.username, "registration rejected, bad email");
        return Err(ApiError::Validation("email is not valid!".to_string()));
    }

    let password = hash_password(&payload.password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::Validation("could not process credentials".to_string())
    })?;

    let user = state
        .store
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            password,
            fullname: payload.fullname,
        })
        .await?;

    let token = sign_session(state, user.id, user.admin)?;
    info!(user_id = user.id, username = %user.username, "user registered");
    Ok((user.masked(), token))
}

/// Verifies credentials and signs a session token carrying the stored
/// admin flag. An unknown username and a wrong password produce the
/// identical error, revealing nothing about account existence.
pub async fn login(state: &AppState, payload: LoginRequest) -> Result<String, ApiError> {
    let user = state
        .store
        .find_user_by_username(&payload.username)
        .await?
        .ok_or(ApiError::Authentication)?;

    if !verify_password(&payload.password, &user.password) {
        warn!(user_id = user.id, "login with wrong password");
        return Err(ApiError::Authentication);
    }

    let token = sign_session(state, user.id, user.admin)?;
    info!(user_id = user.id, username = %user.username, "user logged in");
    Ok(token)
}

/// Fetches the caller's record with their events, masked.
pub async fn profile(state: &AppState, user_id: i64) -> Result<(User, Vec<Event>), ApiError> {
    let (user, events) = state
        .store
        .find_user_by_id(user_id, true)
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found!".to_string()))?;
    Ok((user.masked(), events))
}

/// Applies only the fields present in the patch; everything else keeps
/// its prior value. A missing record for the authenticated id is treated
/// as a forbidden modification.
pub async fn update_profile(
    state: &AppState,
    user_id: i64,
    patch: ProfilePatch,
) -> Result<User, ApiError> {
    let user = state
        .store
        .update_user(user_id, patch)
        .await?
        .ok_or(ApiError::Forbidden)?;
    info!(user_id, "user profile updated");
    Ok(user.masked())
}

/// Acknowledged no-op. Session tokens are stateless and expire on their
/// own; there is no server-side session to invalidate.
pub fn logout() -> MessageResponse {
    MessageResponse {
        message: "user logged out!".to_string(),
    }
}

fn sign_session(state: &AppState, user_id: i64, admin: bool) -> Result<String, ApiError> {
    JwtKeys::from_ref(state).sign(user_id, admin).map_err(|e| {
        error!(error = %e, "session token signing failed");
        ApiError::Validation("could not process credentials".to_string())
    })
}
