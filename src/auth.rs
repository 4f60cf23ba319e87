//! In-memory accounts with Argon2 password hashes and bearer sessions.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use base64::Engine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngCore;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{BudgetRange, User, UserPreferences},
};

pub const STYLE_CHOICES: [&str; 6] = ["casual", "formal", "business", "sporty", "bohemian", "minimalist"];
const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$").expect("email pattern")
});

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")] InvalidCredentials,
    #[error("missing bearer token")] MissingToken,
    #[error("invalid or expired token")] InvalidToken,
    #[error("user already exists")] UserExists,
    #[error("user not found")] UserNotFound,
    #[error("{0}")] Invalid(String),
    #[error("password hashing failed: {0}")] Hashing(String),
}

#[derive(Debug, Deserialize)]
pub struct PreferencesUpdate {
    pub style: Option<String>,
    pub colors: Option<Vec<String>>,
    pub brands: Option<Vec<String>>,
    pub budget: Option<BudgetRange>,
}

struct Session {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Accounts {
    users: HashMap<Uuid, User>,
    by_email: HashMap<String, Uuid>,
}

pub struct UserStore {
    accounts: RwLock<Accounts>,
    sessions: RwLock<HashMap<String, Session>>,
    session_ttl: chrono::Duration,
    hasher: Argon2<'static>,
}

impl UserStore {
    pub fn new(session_ttl: chrono::Duration) -> Self {
        Self::with_hasher(session_ttl, Argon2::default())
    }

    pub fn with_hasher(session_ttl: chrono::Duration, hasher: Argon2<'static>) -> Self {
        Self {
            accounts: RwLock::default(),
            sessions: RwLock::default(),
            session_ttl,
            hasher,
        }
    }

    /// Minimal Argon2 cost so tests stay fast. Not for production.
    #[cfg(test)]
    pub fn insecure_for_tests() -> Self {
        let params = argon2::Params::new(1024, 1, 1, None).expect("argon2 params");
        Self::with_hasher(
            chrono::Duration::days(30),
            Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params),
        )
    }

    /// Creates the account and opens a session for it.
    pub fn register(&self, name: &str, email: &str, password: &str) -> Result<(User, String), AuthError> {
        let name = name.trim();
        let email = email.trim().to_lowercase();
        if name.is_empty() {
            return Err(AuthError::Invalid("Please provide your name".into()));
        }
        if !EMAIL.is_match(&email) {
            return Err(AuthError::Invalid("Please provide a valid email".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Invalid(format!("Password must be at least {MIN_PASSWORD_LEN} characters")));
        }

        let password_hash = self.hash_password(password)?;
        let user = {
            let mut accounts = self.accounts.write();
            if accounts.by_email.contains_key(&email) {
                return Err(AuthError::UserExists);
            }
            let user = User {
                id: Uuid::new_v4(),
                name: name.to_string(),
                email: email.clone(),
                password_hash,
                preferences: UserPreferences::default(),
                created_at: Utc::now(),
            };
            accounts.by_email.insert(email, user.id);
            accounts.users.insert(user.id, user.clone());
            user
        };
        let token = self.open_session(user.id);
        Ok((user, token))
    }

    pub fn login(&self, email: &str, password: &str) -> Result<(User, String), AuthError> {
        let email = email.trim().to_lowercase();
        let user = {
            let accounts = self.accounts.read();
            accounts
                .by_email
                .get(&email)
                .and_then(|id| accounts.users.get(id))
                .cloned()
                .ok_or(AuthError::InvalidCredentials)?
        };
        if !self.verify_password(password, &user.password_hash) {
            return Err(AuthError::InvalidCredentials);
        }
        let token = self.open_session(user.id);
        Ok((user, token))
    }

    /// Resolves a bearer token, dropping it if it has expired.
    pub fn authenticate(&self, token: &str) -> Result<User, AuthError> {
        let user_id = {
            let mut sessions = self.sessions.write();
            match sessions.get(token) {
                Some(s) if s.expires_at > Utc::now() => s.user_id,
                Some(_) => {
                    sessions.remove(token);
                    return Err(AuthError::InvalidToken);
                }
                None => return Err(AuthError::InvalidToken),
            }
        };
        self.get(user_id).map_err(|_| AuthError::InvalidToken)
    }

    pub fn get(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.accounts.read().users.get(&user_id).cloned().ok_or(AuthError::UserNotFound)
    }

    /// Absent fields keep their previous value.
    pub fn update_preferences(&self, user_id: Uuid, update: PreferencesUpdate) -> Result<UserPreferences, AuthError> {
        if let Some(style) = &update.style {
            if !STYLE_CHOICES.contains(&style.as_str()) {
                return Err(AuthError::Invalid(format!(
                    "style must be one of: {}",
                    STYLE_CHOICES.join(", ")
                )));
            }
        }
        let mut accounts = self.accounts.write();
        let user = accounts.users.get_mut(&user_id).ok_or(AuthError::UserNotFound)?;
        let prefs = &mut user.preferences;
        if let Some(style) = update.style { prefs.style = Some(style); }
        if let Some(colors) = update.colors { prefs.colors = colors; }
        if let Some(brands) = update.brands { prefs.brands = brands; }
        if let Some(budget) = update.budget { prefs.budget = Some(budget); }
        Ok(prefs.clone())
    }

    fn open_session(&self, user_id: Uuid) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        self.sessions.write().insert(
            token.clone(),
            Session {
                user_id,
                expires_at: Utc::now().checked_add_signed(self.session_ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            },
        );
        token
    }

    fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = SaltString::encode_b64(&salt).map_err(|e| AuthError::Hashing(e.to_string()))?;
        self.hasher
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        self.hasher.verify_password(password.as_bytes(), &parsed).is_ok()
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::InvalidToken)?;
    value
        .strip_prefix("Bearer ")
        .map(|t| Some(t.trim()))
        .ok_or(AuthError::InvalidToken)
}

/// Requires a valid bearer session.
pub struct AuthUser(pub User);

/// A valid session if one is presented; anonymous otherwise. A presented but
/// invalid token is still rejected.
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<UserStore>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or(AuthError::MissingToken)?;
        let users = Arc::<UserStore>::from_ref(state);
        Ok(AuthUser(users.authenticate(token)?))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    Arc<UserStore>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            Some(token) => {
                let users = Arc::<UserStore>::from_ref(state);
                Ok(MaybeUser(Some(users.authenticate(token)?)))
            }
            None => Ok(MaybeUser(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn register_then_login_round_trip() {
        let store = UserStore::insecure_for_tests();
        let (user, token) = store.register("Ada", " Ada@Example.com ", "hunter22").unwrap();
        assert_eq!(user.email, "ada@example.com");
        assert_ne!(user.password_hash, "hunter22");
        assert_eq!(store.authenticate(&token).unwrap().id, user.id);

        let (again, other_token) = store.login("ADA@example.com", "hunter22").unwrap();
        assert_eq!(again.id, user.id);
        assert_ne!(token, other_token);
    }

    #[test]
    fn wrong_password_and_unknown_email_are_invalid_credentials() {
        let store = UserStore::insecure_for_tests();
        store.register("Ada", "ada@example.com", "hunter22").unwrap();
        assert!(matches!(store.login("ada@example.com", "nope"), Err(AuthError::InvalidCredentials)));
        assert!(matches!(store.login("bob@example.com", "hunter22"), Err(AuthError::InvalidCredentials)));
    }

    #[test]
    fn registration_rules() {
        let store = UserStore::insecure_for_tests();
        assert!(matches!(store.register("", "a@b.com", "secret1"), Err(AuthError::Invalid(_))));
        assert!(matches!(store.register("A", "not-an-email", "secret1"), Err(AuthError::Invalid(_))));
        assert!(matches!(store.register("A", "a@b.com", "short"), Err(AuthError::Invalid(_))));
        store.register("A", "a@b.com", "secret1").unwrap();
        assert!(matches!(store.register("B", "A@B.com", "secret2"), Err(AuthError::UserExists)));
    }

    #[test]
    fn expired_sessions_are_rejected() {
        let params = argon2::Params::new(1024, 1, 1, None).unwrap();
        let hasher = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        let store = UserStore::with_hasher(chrono::Duration::seconds(-1), hasher);
        let (_, token) = store.register("Ada", "ada@example.com", "hunter22").unwrap();
        assert!(matches!(store.authenticate(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(store.authenticate("made-up"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_panicking() {
        let params = argon2::Params::new(1024, 1, 1, None).unwrap();
        let hasher = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
        let store = UserStore::with_hasher(chrono::Duration::try_days(100_000_000).unwrap(), hasher);
        let (user, token) = store.register("Ada", "ada@example.com", "hunter22").unwrap();
        assert_eq!(store.authenticate(&token).unwrap().id, user.id);
    }

    #[test]
    fn preferences_merge_and_validate_style() {
        let store = UserStore::insecure_for_tests();
        let (user, _) = store.register("Ada", "ada@example.com", "hunter22").unwrap();

        let prefs = store
            .update_preferences(user.id, PreferencesUpdate {
                style: Some("formal".into()),
                colors: Some(vec!["navy".into()]),
                brands: None,
                budget: None,
            })
            .unwrap();
        assert_eq!(prefs.style.as_deref(), Some("formal"));

        let prefs = store
            .update_preferences(user.id, PreferencesUpdate {
                style: None,
                colors: None,
                brands: Some(vec!["COS".into()]),
                budget: Some(BudgetRange { min: None, max: Some(150.0) }),
            })
            .unwrap();
        assert_eq!(prefs.style.as_deref(), Some("formal"));
        assert_eq!(prefs.colors, vec!["navy".to_string()]);
        assert_eq!(prefs.brands, vec!["COS".to_string()]);

        let bad = store.update_preferences(user.id, PreferencesUpdate {
            style: Some("goth".into()),
            colors: None,
            brands: None,
            budget: None,
        });
        assert!(matches!(bad, Err(AuthError::Invalid(_))));
    }
}
