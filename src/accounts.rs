//! Registration, login and the signed-in user's profile.

use axum::{Json, extract::State};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::auth::Claims;
use crate::db::{models::User, queries};
use crate::error::{ApiError, ApiJson};
use crate::password::{hash_password, verify_password};
use crate::response::{ApiResponse, success};
use crate::server::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

const TOKEN_TTL_DAYS: i64 = 7;

static REMINDER_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("valid regex"));

/// `HH:MM` on a 24 hour clock, or empty to clear the reminder.
pub fn is_valid_reminder_time(value: &str) -> bool {
    value.is_empty() || REMINDER_TIME.is_match(value)
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    fn require(&self) -> Result<(), ApiError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ApiError::bad_request(
                "MISSING_FIELDS",
                "Email and password are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    pub quiz_reminder_time: String,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            quiz_reminder_time: user.quiz_reminder_time,
        }
    }
}

pub async fn register(State(state): State<AppState>, ApiJson(body): ApiJson<Credentials>) -> ApiResult<Profile> {
    body.require()?;
    let email = body.email.trim();

    let existing = queries::get_user_by_email(&state.pool, email)
        .await
        .map_err(|e| ApiError::internal_from("REGISTER_ERROR", "Registration failed", e))?;
    if existing.is_some() {
        return Err(ApiError::bad_request("REGISTER_ERROR", "Email already registered"));
    }

    let hash = hash_password(&body.password)
        .await
        .map_err(|e| ApiError::internal_from("REGISTER_ERROR", "Registration failed", e))?;
    let user = queries::create_user(&state.pool, email, &hash, "")
        .await
        .map_err(|e| ApiError::internal_from("REGISTER_ERROR", "Registration failed", e))?;

    tracing::info!("Registered user {}", user.id);
    Ok(success(user.into()))
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

pub async fn login(State(state): State<AppState>, ApiJson(body): ApiJson<Credentials>) -> ApiResult<LoginResponse> {
    body.require()?;
    let invalid = || ApiError::unauthorized("LOGIN_ERROR", "Invalid credentials");

    let user = queries::get_user_by_email(&state.pool, body.email.trim())
        .await
        .map_err(|e| ApiError::internal_from("LOGIN_ERROR", "Login failed", e))?
        .ok_or_else(invalid)?;

    let valid = verify_password(&body.password, &user.password_hash)
        .await
        .map_err(|e| ApiError::internal_from("LOGIN_ERROR", "Login failed", e))?;
    if !valid {
        return Err(invalid());
    }

    let token = state
        .jwt
        .issue(&user.id, Some(&user.email), chrono::Duration::days(TOKEN_TTL_DAYS))
        .map_err(|e| ApiError::internal_from("LOGIN_ERROR", "Login failed", e))?;

    tracing::debug!("User {} logged in", user.id);
    Ok(success(LoginResponse { token }))
}

pub async fn me(State(state): State<AppState>, claims: Claims) -> ApiResult<Profile> {
    let user = queries::get_user_by_id(&state.pool, &claims.sub)
        .await
        .map_err(|e| ApiError::internal_from("AUTH_ERROR", "Failed to load user", e))?
        .ok_or_else(|| ApiError::not_found("USER_NOT_FOUND", "User not found"))?;

    Ok(success(user.into()))
}

#[derive(Debug, Deserialize)]
pub struct ReminderBody {
    pub time: Option<String>,
}

pub async fn update_reminder_time(
    State(state): State<AppState>,
    claims: Claims,
    ApiJson(body): ApiJson<ReminderBody>,
) -> ApiResult<Profile> {
    let time = body
        .time
        .map(|t| t.trim().to_string())
        .filter(|t| is_valid_reminder_time(t))
        .ok_or_else(|| {
            ApiError::bad_request("INVALID_TIME", "time must be HH:MM (24 hour) or empty")
        })?;

    let updated = queries::update_reminder_time(&state.pool, &claims.sub, &time)
        .await
        .map_err(|e| ApiError::internal_from("REMINDER_ERROR", "Failed to update reminder", e))?;
    if !updated {
        return Err(ApiError::not_found("USER_NOT_FOUND", "User not found"));
    }

    me(State(state), claims).await
}
