// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use validator::Validate;

use crate::{
    error::AppError,
    extract::ApiJson,
    models::{
        envelope::Envelope,
        user::{
            ChangePasswordRequest, LoginRequest, RegisterRequest, Role, TokenResponse,
            UpdateProfileRequest, User,
        },
    },
    repository::{NewUser, ProfilePatch, taken_error},
    state::AppState,
    utils::{
        hash::{hash_password, verify_password},
        html::clean_html,
        jwt::{CurrentUser, sign_jwt},
    },
};

fn issue_token(state: &AppState, user: &User) -> Result<String, AppError> {
    sign_jwt(
        user.id,
        &user.username,
        user.role.as_str(),
        &state.config.jwt_secret,
        state.config.jwt_expiration,
    )
}

/// Registers a new user and logs them in.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with a token and the user object (excluding password).
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.normalized();
    payload.validate()?;

    if let Some(existing) = state
        .users
        .find_taken(Some(payload.username.as_str()), Some(payload.email.as_str()), None)
        .await?
    {
        return Err(taken_error(&existing, Some(payload.username.as_str())));
    }

    let password_hash = hash_password(&payload.password)?;

    let user = state
        .users
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
            role: Role::User,
        })
        .await?;

    tracing::info!("User registered: {} (id {})", user.username, user.id);

    let token = issue_token(&state, &user)?;
    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message(
            "Registration successful",
            TokenResponse {
                token,
                token_type: "Bearer",
                user,
            },
        )),
    ))
}

/// Authenticates by username or email and returns a JWT token.
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let mut user = state
        .users
        .find_by_login(payload.username.trim())
        .await?
        .ok_or(AppError::AuthError("Invalid username or password".to_string()))?;

    if !user.is_active {
        return Err(AppError::AuthError("Account has been disabled".to_string()));
    }

    if !verify_password(&payload.password, &user.password)? {
        return Err(AppError::AuthError("Invalid username or password".to_string()));
    }

    state.users.record_login(user.id).await?;
    user.last_login = Some(Utc::now());

    tracing::info!("User logged in: {}", user.username);

    let token = issue_token(&state, &user)?;
    Ok(Json(Envelope::with_message(
        "Login successful",
        TokenResponse {
            token,
            token_type: "Bearer",
            user,
        },
    )))
}

pub async fn get_profile(CurrentUser(user): CurrentUser) -> Json<Envelope<User>> {
    Json(Envelope::data(user))
}

/// Updates username, email, bio or avatar of the current user.
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.normalized();
    payload.validate()?;

    if (payload.username.is_some() || payload.email.is_some())
        && let Some(existing) = state
            .users
            .find_taken(
                payload.username.as_deref(),
                payload.email.as_deref(),
                Some(user.id),
            )
            .await?
    {
        return Err(taken_error(&existing, payload.username.as_deref()));
    }

    let patch = ProfilePatch {
        username: payload.username,
        email: payload.email,
        bio: payload.bio.as_deref().map(clean_html),
        avatar: payload.avatar,
    };

    let updated = state
        .users
        .update_profile(user.id, patch)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    tracing::info!("Profile updated for user {}", updated.id);

    Ok(Json(Envelope::with_message("Profile updated", updated)))
}

pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    if !verify_password(&payload.current_password, &user.password)? {
        return Err(AppError::BadRequest("Current password is incorrect".to_string()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    state.users.update_password(user.id, &password_hash).await?;

    tracing::info!("Password changed for user {}", user.id);

    Ok(Json(Envelope::message("Password changed")))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<Envelope<()>> {
    tracing::info!("User logged out: {}", user.username);
    Json(Envelope::message("Logged out"))
}
