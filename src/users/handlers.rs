use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::instrument;

use crate::auth::jwt::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::store::ProfilePatch;
use crate::users::dto::{
    CenterResponse, LoginRequest, LoginResponse, MessageResponse, ProfileResponse, ProfileUser,
    RegisterRequest, RegisteredResponse, UserResponse,
};
use crate::users::service;
use crate::validation::{
    CenterExists, CenterParamValid, Chain, EmailNotExists, RequestContext, RequireFields,
    TrimKeys, TrimValues, UsernameNotExists,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users",
            post(register).get(get_profile).put(update_profile),
        )
        .route("/users/login", post(login))
        .route("/users/logout", post(logout))
}

pub fn center_routes() -> Router<AppState> {
    Router::new().route("/centers/:centerId", get(get_center))
}

fn as_object(value: Value) -> Result<Map<String, Value>, ApiError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::Validation(
            "request body must be a JSON object".to_string(),
        )),
    }
}

/// Deserializes the chain-normalized body into a typed payload.
fn parse_body<T: DeserializeOwned>(body: Map<String, Value>) -> Result<T, ApiError> {
    serde_json::from_value(Value::Object(body)).map_err(|e| ApiError::Validation(e.to_string()))
}

#[instrument(skip(state, body))]
async fn register(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<RegisteredResponse>), ApiError> {
    let mut ctx = RequestContext::new(state.store.clone()).with_body(as_object(body)?);
    Chain::new()
        .stage(TrimKeys)
        .stage(TrimValues(&["username", "email", "fullname"]))
        .stage(RequireFields(&["username", "password", "email", "fullname"]))
        .stage(UsernameNotExists)
        .stage(EmailNotExists)
        .run(&mut ctx)
        .await?;

    let payload: RegisterRequest = parse_body(ctx.body)?;
    let (user, token) = service::register(&state, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisteredResponse {
            message: "user created!".to_string(),
            user,
            token,
        }),
    ))
}

#[instrument(skip(state, body))]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<LoginResponse>, ApiError> {
    let mut ctx = RequestContext::new(state.store.clone()).with_body(as_object(body)?);
    Chain::new()
        .stage(TrimKeys)
        .stage(TrimValues(&["username"]))
        .stage(RequireFields(&["username", "password"]))
        .run(&mut ctx)
        .await?;

    let payload: LoginRequest = parse_body(ctx.body)?;
    let token = service::login(&state, payload).await?;
    Ok(Json(LoginResponse {
        message: "user logged in!".to_string(),
        token,
    }))
}

#[instrument(skip(state, caller))]
async fn get_profile(
    State(state): State<AppState>,
    caller: AuthUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let (user, events) = service::profile(&state, caller.id).await?;
    Ok(Json(ProfileResponse {
        message: "user details delivered!".to_string(),
        user: ProfileUser { user, events },
    }))
}

#[instrument(skip(state, caller, body))]
async fn update_profile(
    State(state): State<AppState>,
    caller: AuthUser,
    Json(body): Json<Value>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut ctx = RequestContext::new(state.store.clone()).with_body(as_object(body)?);
    Chain::new()
        .stage(TrimKeys)
        .stage(TrimValues(&["fullname", "description", "tagline", "picture"]))
        .run(&mut ctx)
        .await?;

    let patch: ProfilePatch = parse_body(ctx.body)?;
    let user = service::update_profile(&state, caller.id, patch).await?;
    Ok(Json(UserResponse {
        message: "user profile updated!".to_string(),
        user,
    }))
}

async fn logout() -> Json<MessageResponse> {
    Json(service::logout())
}

#[instrument(skip(state))]
async fn get_center(
    State(state): State<AppState>,
    Path(center_id): Path<String>,
) -> Result<Json<CenterResponse>, ApiError> {
    let mut ctx = RequestContext::new(state.store.clone()).with_param("centerId", center_id);
    Chain::new()
        .stage(CenterParamValid)
        .stage(CenterExists)
        .run(&mut ctx)
        .await?;

    // the chain just proved the param parses and the center exists
    let id: i64 = ctx.params["centerId"]
        .parse()
        .map_err(|_| ApiError::NotFound("center id must be an integer!".to_string()))?;
    let center = state
        .store
        .find_center_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Cannot find specified event center!".to_string()))?;

    Ok(Json(CenterResponse {
        message: "event center found!".to_string(),
        center,
    }))
}
