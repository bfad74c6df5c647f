use std::sync::OnceLock;

use chrono::Duration;
use regex::Regex;
use serde::Deserialize;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};

use crate::config::*;
use crate::core::db::DocumentStore;
use crate::core::errors::ApiError;
use crate::core::helpers::{hash_password, new_id, now, parse_body, respond, verify_password};
use crate::models::models::{Session, TokenData, User};
use crate::models::views::{LoginView, PublicUser, StatusView};

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Regex should compile"))
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r#"^[^<>&"'/\\]+$"#).expect("Regex should compile"))
}

/// Creates an account. Email and username are claimed before anything else is
/// written, so two concurrent registrations cannot both own the same address.
pub fn register<S: DocumentStore>(
    store: &S,
    username: &str,
    email: &str,
    password: &str,
) -> Result<User, ApiError> {
    let username = username.trim();
    let email = email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || password.is_empty() {
        return Err(ApiError::validation("Username, email and password are required"));
    }
    let username_length = username.chars().count();
    if username_length < MIN_USERNAME_LENGTH || username_length > MAX_USERNAME_LENGTH {
        return Err(ApiError::validation("Username must be 3-50 characters"));
    }
    if !username_regex().is_match(username) {
        return Err(ApiError::validation("Username may not contain markup characters"));
    }
    if !email_regex().is_match(&email) {
        return Err(ApiError::validation("Email address is malformed"));
    }
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::validation("Password must be at least 3 characters"));
    }

    let user_id = new_id();
    let claimed_email = email_key(&email);
    let claimed_username = username_key(username);

    if !store.set_if_absent(&claimed_email, user_id.as_bytes())? {
        return Err(ApiError::DuplicateEmail);
    }
    if !store.set_if_absent(&claimed_username, user_id.as_bytes())? {
        release_claims(store, &[&claimed_email]);
        return Err(ApiError::DuplicateUsername);
    }

    let user = User {
        id: user_id,
        username: username.to_string(),
        email,
        password: String::new(),
        bio: None,
        profile_image: None,
        created_at: now(),
    };

    match write_user(store, user, password) {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "registered user");
            Ok(user)
        }
        Err(e) => {
            release_claims(store, &[&claimed_email, &claimed_username]);
            Err(e)
        }
    }
}

fn write_user<S: DocumentStore>(store: &S, mut user: User, password: &str) -> Result<User, ApiError> {
    user.password = hash_password(password)?;
    store.set_json(&user_key(&user.id), &user)?;
    store.set_add(USERS_LIST_KEY, &user.id)?;
    Ok(user)
}

fn release_claims<S: DocumentStore>(store: &S, keys: &[&str]) {
    for &key in keys {
        if let Err(e) = store.delete(key) {
            warn!(key, "could not release registration claim: {e:#}");
        }
    }
}

pub fn login<S: DocumentStore>(store: &S, email: &str, password: &str) -> Result<LoginView, ApiError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || password.is_empty() {
        return Err(ApiError::MissingFields);
    }

    let user_id = match store.get(&email_key(&email))? {
        Some(raw) => String::from_utf8(raw).map_err(anyhow::Error::from)?,
        None => {
            warn!("login for unknown email");
            return Err(ApiError::InvalidEmail);
        }
    };
    let user: User = store
        .get_json(&user_key(&user_id))?
        .ok_or(ApiError::InvalidEmail)?;

    if !verify_password(password, &user.password) {
        warn!(user_id = %user.id, "password mismatch");
        return Err(ApiError::InvalidPassword);
    }

    let token = new_id();
    let data = TokenData {
        user_id: user.id.clone(),
        created_at: now(),
    };
    store.set_json(&token_key(&token), &data)?;

    info!(user_id = %user.id, "login succeeded");
    Ok(LoginView {
        token,
        user: PublicUser::private(&user),
    })
}

pub fn logout<S: DocumentStore>(store: &S, session: &Session) -> Result<StatusView, ApiError> {
    store.delete(&token_key(&session.token))?;
    Ok(StatusView::ok("Logged out"))
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.header("Authorization")
        .and_then(|h| h.as_str())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolves a bearer credential to a live user, if it is valid.
///
/// Expired credentials are deleted on sight. A credential whose user record
/// has vanished resolves to nothing.
pub fn validate_token<S: DocumentStore>(store: &S, token: &str) -> anyhow::Result<Option<Session>> {
    let key = token_key(token);
    let Some(data) = store.get_json::<TokenData>(&key)? else {
        return Ok(None);
    };

    if now() - data.created_at > Duration::hours(token_expiration_hours()) {
        store.delete(&key)?;
        return Ok(None);
    }

    if !store.exists(&user_key(&data.user_id))? {
        return Ok(None);
    }

    Ok(Some(Session {
        user_id: data.user_id,
        token: token.to_string(),
    }))
}

/// Access gate for mutating operations.
pub fn authenticate<S: DocumentStore>(store: &S, req: &Request) -> Result<Session, ApiError> {
    let Some(token) = bearer_token(req) else {
        return Err(ApiError::Unauthorized);
    };
    match validate_token(store, token)? {
        Some(session) => Ok(session),
        None => {
            warn!("rejected bearer credential");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Access gate for reads: an absent or stale credential is an anonymous caller.
pub fn optional_session<S: DocumentStore>(store: &S, req: &Request) -> Result<Option<Session>, ApiError> {
    match bearer_token(req) {
        Some(token) => Ok(validate_token(store, token)?),
        None => Ok(None),
    }
}

// === HTTP Handlers ===

pub fn register_user<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = parse_body::<RegisterRequest>(req)
        .and_then(|body| register(store, &body.username, &body.email, &body.password))
        .map(|user| PublicUser::private(&user));
    respond(201, result)
}

pub fn login_user<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = parse_body::<LoginRequest>(req).and_then(|body| login(store, &body.email, &body.password));
    respond(200, result)
}

pub fn logout_user<S: DocumentStore>(store: &S, req: &Request) -> anyhow::Result<Response> {
    let result = authenticate(store, req).and_then(|session| logout(store, &session));
    respond(200, result)
}
