// src/models/user.rs

use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::pagination::{Pagination, SortOrder};

pub const DEFAULT_AVATAR: &str = "https://via.placeholder.com/150x150/2563eb/ffffff?text=User";

static USERNAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\p{Han}]+$").expect("username pattern is valid"));

/// Account role. Admins bypass ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,

    /// Unique username.
    pub username: String,

    /// Unique, stored lowercased.
    pub email: String,

    /// Argon2 password hash.
    /// Skipped during serialization to prevent leaking sensitive data.
    #[serde(skip)]
    pub password: String,

    pub avatar: String,
    pub bio: String,
    pub role: Role,

    /// Disabled accounts cannot log in or use tokens.
    pub is_active: bool,

    pub posts_count: i64,
    pub comments_count: i64,
    pub likes_received: i64,

    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// What other users may see of an account (no email, no login data).
#[derive(Debug, Serialize)]
pub struct PublicProfile {
    pub id: i64,
    pub username: String,
    pub avatar: String,
    pub bio: String,
    pub role: Role,
    pub posts_count: i64,
    pub comments_count: i64,
    pub likes_received: i64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            avatar: user.avatar,
            bio: user.bio,
            role: user.role,
            posts_count: user.posts_count,
            comments_count: user.comments_count,
            likes_received: user.likes_received,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<PublicProfile>,
    pub pagination: Pagination,
}

/// Returned by register and login.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    #[serde(rename = "type")]
    pub token_type: &'static str,
    pub user: User,
}

/// DTO for creating a new user (Registration).
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(
        length(min = 2, max = 20, message = "Username must be between 2 and 20 characters"),
        custom(function = validate_username_chars)
    )]
    pub username: String,

    #[validate(email(message = "Invalid email address"))]
    pub email: String,

    #[validate(
        length(min = 6, max = 128, message = "Password must be between 6 and 128 characters"),
        custom(function = validate_password_strength)
    )]
    pub password: String,
}

impl RegisterRequest {
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_lowercase();
        self
    }
}

/// DTO for user login. `username` accepts a username or an email.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 100, message = "Username or email is required"))]
    pub username: String,
    #[validate(length(min = 1, max = 128, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(
        length(min = 2, max = 20, message = "Username must be between 2 and 20 characters"),
        custom(function = validate_username_chars)
    )]
    pub username: Option<String>,

    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,

    #[validate(length(max = 200, message = "Bio must be at most 200 characters"))]
    pub bio: Option<String>,

    #[validate(
        length(max = 500, message = "Avatar URL is too long"),
        custom(function = validate_url_string)
    )]
    pub avatar: Option<String>,
}

impl UpdateProfileRequest {
    pub fn normalized(mut self) -> Self {
        self.username = self.username.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        self.email = self.email.map(|e| e.trim().to_lowercase()).filter(|e| !e.is_empty());
        self.bio = self.bio.map(|b| b.trim().to_string());
        self.avatar = self.avatar.map(|a| a.trim().to_string()).filter(|a| !a.is_empty());
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    #[validate(
        length(min = 6, max = 128, message = "New password must be between 6 and 128 characters"),
        custom(function = validate_password_strength)
    )]
    pub new_password: String,
}

/// Sort keys for the user directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSort {
    #[default]
    CreatedAt,
    Username,
    PostsCount,
    CommentsCount,
    LikesReceived,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UserListParams {
    #[validate(range(min = 1, message = "page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "limit must be between 1 and 50"))]
    pub limit: Option<u32>,
    pub sort_by: Option<UserSort>,
    pub sort_order: Option<SortOrder>,
}

fn validate_username_chars(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_PATTERN.is_match(username) {
        return Err(ValidationError::new("invalid_username").with_message(
            "Username may only contain letters, digits, underscores and Chinese characters".into(),
        ));
    }
    Ok(())
}

/// Requires at least one ASCII letter and one digit.
fn validate_password_strength(password: &str) -> Result<(), ValidationError> {
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !(has_letter && has_digit) {
        return Err(ValidationError::new("weak_password")
            .with_message("Password must contain both letters and digits".into()));
    }
    Ok(())
}

/// Validates that a string is a correctly formatted URL.
fn validate_url_string(url: &str) -> Result<(), ValidationError> {
    if url::Url::parse(url).is_err() {
        return Err(
            ValidationError::new("invalid_url").with_message("Avatar must be a valid URL".into())
        );
    }
    Ok(())
}
