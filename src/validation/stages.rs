use async_trait::async_trait;
use serde_json::Value;

use crate::auth::password::verify_password;
use crate::error::ApiError;
use crate::validation::{RequestContext, Stage};

/// Re-inserts every body entry under its whitespace-trimmed key. The
/// untrimmed original is dropped rather than left behind. When a trimmed
/// and an untrimmed spelling of the same key both occur, the later entry
/// wins.
pub struct TrimKeys;

#[async_trait]
impl Stage for TrimKeys {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let old = std::mem::take(&mut ctx.body);
        for (key, value) in old {
            ctx.body.insert(key.trim().to_string(), value);
        }
        Ok(())
    }
}

/// Trims surrounding whitespace from the string values of the named
/// fields. Fields not listed, absent, or non-string are left untouched.
pub struct TrimValues(pub &'static [&'static str]);

#[async_trait]
impl Stage for TrimValues {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        for field in self.0 {
            if let Some(value) = ctx.body.get_mut(*field) {
                if let Value::String(s) = value {
                    *value = Value::String(s.trim().to_string());
                }
            }
        }
        Ok(())
    }
}

/// Rejects naming the first listed field that is absent from the body.
/// The rejection stops the chain; the handler never sees a body missing
/// a required field.
pub struct RequireFields(pub &'static [&'static str]);

#[async_trait]
impl Stage for RequireFields {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        for field in self.0 {
            if !ctx.body.contains_key(*field) {
                return Err(ApiError::MissingField(field.to_string()));
            }
        }
        Ok(())
    }
}

/// Requires that the body's `username` names an existing user.
pub struct UsernameExists;

#[async_trait]
impl Stage for UsernameExists {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let username = ctx.str_field("username").unwrap_or_default().to_string();
        let user = ctx.store.find_user_by_username(&username).await?;
        match user {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound("Username does not exist!".to_string())),
        }
    }
}

/// Requires that the body's `username` is still free.
pub struct UsernameNotExists;

#[async_trait]
impl Stage for UsernameNotExists {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let username = ctx.str_field("username").unwrap_or_default().to_string();
        let user = ctx.store.find_user_by_username(&username).await?;
        match user {
            Some(_) => Err(ApiError::Conflict("Username already taken!".to_string())),
            None => Ok(()),
        }
    }
}

/// Requires that the body's `email` is still free.
pub struct EmailNotExists;

#[async_trait]
impl Stage for EmailNotExists {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let email = ctx.str_field("email").unwrap_or_default().to_string();
        let user = ctx.store.find_user_by_email(&email).await?;
        match user {
            Some(_) => Err(ApiError::Conflict("Email already taken!".to_string())),
            None => Ok(()),
        }
    }
}

/// Requires that the body's `password` verifies against the stored hash
/// for the body's `username`. An unknown username and a wrong password
/// reject identically.
pub struct PasswordMatches;

#[async_trait]
impl Stage for PasswordMatches {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let username = ctx.str_field("username").unwrap_or_default().to_string();
        let password = ctx.str_field("password").unwrap_or_default().to_string();
        let user = ctx
            .store
            .find_user_by_username(&username)
            .await?
            .ok_or(ApiError::Authentication)?;
        if verify_password(&password, &user.password) {
            Ok(())
        } else {
            Err(ApiError::Authentication)
        }
    }
}

/// Requires that the `centerId` route parameter parses as an integer.
pub struct CenterParamValid;

#[async_trait]
impl Stage for CenterParamValid {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let raw = ctx.params.get("centerId").map(String::as_str).unwrap_or("");
        if raw.parse::<i64>().is_err() {
            return Err(ApiError::NotFound(
                "center id must be an integer!".to_string(),
            ));
        }
        Ok(())
    }
}

/// Requires that the `centerId` route parameter names an existing event
/// center.
pub struct CenterExists;

#[async_trait]
impl Stage for CenterExists {
    async fn apply(&self, ctx: &mut RequestContext) -> Result<(), ApiError> {
        let id = ctx
            .params
            .get("centerId")
            .and_then(|raw| raw.parse::<i64>().ok());
        let center = match id {
            Some(id) => ctx.store.find_center_by_id(id).await?,
            None => None,
        };
        match center {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(
                "Cannot find specified event center!".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use serde_json::{Map, Value};

    use super::*;
    use crate::auth::password::hash_password;
    use crate::store::{EventCenter, MemoryStore, NewUser, UserStore};

    fn body(fields: &[(&str, &str)]) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    async fn store_with_alice() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password: hash_password("open sesame").unwrap(),
                fullname: "Alice A.".into(),
            })
            .await
            .unwrap();
        store
    }

    fn ctx(store: Arc<MemoryStore>, fields: &[(&str, &str)]) -> RequestContext {
        RequestContext::new(store).with_body(body(fields))
    }

    #[tokio::test]
    async fn trim_keys_normalizes_without_leaving_duplicates() {
        let mut ctx = ctx(Arc::new(MemoryStore::new()), &[("  username  ", "bob")]);
        TrimKeys.apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.str_field("username"), Some("bob"));
        assert_eq!(ctx.body.len(), 1);
    }

    #[tokio::test]
    async fn trim_values_only_touches_listed_fields() {
        let mut ctx = ctx(
            Arc::new(MemoryStore::new()),
            &[("username", "  bob  "), ("tagline", "  keep me  ")],
        );
        TrimValues(&["username"]).apply(&mut ctx).await.unwrap();
        assert_eq!(ctx.str_field("username"), Some("bob"));
        assert_eq!(ctx.str_field("tagline"), Some("  keep me  "));
    }

    #[tokio::test]
    async fn require_fields_names_the_first_missing_field() {
        let mut ctx = ctx(Arc::new(MemoryStore::new()), &[("fullname", "Bob")]);
        let err = RequireFields(&["username", "password"])
            .apply(&mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "username required in body!");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn username_exists_allows_known_and_rejects_unknown() {
        let store = store_with_alice().await;

        let mut known = ctx(store.clone(), &[("username", "alice")]);
        UsernameExists.apply(&mut known).await.unwrap();

        let mut unknown = ctx(store, &[("username", "nobody")]);
        let err = UsernameExists.apply(&mut unknown).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Username does not exist!");
    }

    #[tokio::test]
    async fn username_not_exists_rejects_taken_name() {
        let store = store_with_alice().await;

        let mut taken = ctx(store.clone(), &[("username", "alice")]);
        let err = UsernameNotExists.apply(&mut taken).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Username already taken!");

        let mut free = ctx(store, &[("username", "nobody")]);
        UsernameNotExists.apply(&mut free).await.unwrap();
    }

    #[tokio::test]
    async fn email_not_exists_rejects_collision() {
        let store = store_with_alice().await;
        let mut taken = ctx(store, &[("email", "alice@example.com")]);
        let err = EmailNotExists.apply(&mut taken).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Email already taken!");
    }

    #[tokio::test]
    async fn password_matches_accepts_good_and_rejects_bad() {
        let store = store_with_alice().await;

        let mut good = ctx(
            store.clone(),
            &[("username", "alice"), ("password", "open sesame")],
        );
        PasswordMatches.apply(&mut good).await.unwrap();

        let mut wrong = ctx(
            store.clone(),
            &[("username", "alice"), ("password", "guess")],
        );
        let wrong_err = PasswordMatches.apply(&mut wrong).await.unwrap_err();

        let mut unknown = ctx(
            store,
            &[("username", "nobody"), ("password", "open sesame")],
        );
        let unknown_err = PasswordMatches.apply(&mut unknown).await.unwrap_err();

        // no signal distinguishing unknown user from wrong password
        assert_eq!(wrong_err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(unknown_err.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_err.to_string(), unknown_err.to_string());
    }

    #[tokio::test]
    async fn center_param_must_be_an_integer() {
        let store = Arc::new(MemoryStore::new());
        let mut good = RequestContext::new(store.clone()).with_param("centerId", "12");
        CenterParamValid.apply(&mut good).await.unwrap();

        let mut bad = RequestContext::new(store).with_param("centerId", "twelve");
        let err = CenterParamValid.apply(&mut bad).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn center_exists_checks_the_store() {
        let store = Arc::new(MemoryStore::new());
        store.seed_center(EventCenter {
            id: 12,
            name: "Main Hall".into(),
            location: Some("Lagos".into()),
            capacity: Some(400),
        });

        let mut found = RequestContext::new(store.clone()).with_param("centerId", "12");
        CenterExists.apply(&mut found).await.unwrap();

        let mut missing = RequestContext::new(store).with_param("centerId", "99");
        let err = CenterExists.apply(&mut missing).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Cannot find specified event center!");
    }
}
