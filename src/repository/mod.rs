//! Storage contracts. Handlers and services only talk to these traits;
//! `postgres` is the production backend, `memory` backs tests and DB-less runs.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, UserComment},
        pagination::{Page, SortOrder},
        post::{Category, LikeToggle, Post},
        user::{Role, User, UserSort},
    },
    services::search::PostQuery,
};

pub mod memory;
pub mod postgres;

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Profile edits. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// Denormalized per-user aggregates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounters {
    pub posts_count: i64,
    pub comments_count: i64,
    pub likes_received: i64,
}

/// Maps a clashing account to the field that clashed.
pub fn taken_error(existing: &User, username: Option<&str>) -> AppError {
    if username.is_some_and(|name| existing.username == name) {
        AppError::Conflict("Username is already taken".to_string())
    } else {
        AppError::Conflict("Email is already registered".to_string())
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Fails with `Conflict` when the username or email is taken.
    async fn create_user(&self, input: NewUser) -> Result<User, AppError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;
    /// Looks up by exact username or by (lowercased) email.
    async fn find_by_login(&self, login: &str) -> Result<Option<User>, AppError>;
    /// Another account (not `exclude_id`) already holding the username or email.
    async fn find_taken(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude_id: Option<i64>,
    ) -> Result<Option<User>, AppError>;
    async fn update_profile(&self, id: i64, patch: ProfilePatch) -> Result<Option<User>, AppError>;
    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), AppError>;
    async fn record_login(&self, id: i64) -> Result<(), AppError>;
    /// Active users only. Returns the page and the total count.
    async fn list_users(
        &self,
        sort: UserSort,
        order: SortOrder,
        page: Page,
    ) -> Result<(Vec<User>, u64), AppError>;
    async fn set_counters(&self, id: i64, counters: UserCounters) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<Category>,
    pub tags: Option<Vec<String>>,
    pub is_pinned: Option<bool>,
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create_post(&self, input: NewPost) -> Result<Post, AppError>;
    /// `None` for unknown or soft-deleted posts.
    async fn find_active_post(&self, id: i64) -> Result<Option<Post>, AppError>;
    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Option<Post>, AppError>;
    /// Returns false when the post was already gone.
    async fn soft_delete_post(&self, id: i64) -> Result<bool, AppError>;
    /// Atomic increment; returns the new view count.
    async fn increment_views(&self, id: i64) -> Result<i64, AppError>;
    /// Active posts matching the query. Returns the page and the total count.
    async fn query_posts(
        &self,
        query: &PostQuery,
        page: Page,
    ) -> Result<(Vec<Post>, u64), AppError>;
    /// Flips the user's like in one atomic step and recounts.
    async fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<LikeToggle, AppError>;
    /// Subset of `post_ids` liked by `user_id`.
    async fn liked_post_ids(
        &self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError>;
    async fn count_active_by_author(&self, author_id: i64) -> Result<i64, AppError>;
    /// Sum of `likes_count` over the author's active posts.
    async fn sum_likes_by_author(&self, author_id: i64) -> Result<i64, AppError>;
    /// Stores a recomputed comment count, optionally bumping `last_activity`.
    async fn set_comments_count(
        &self,
        post_id: i64,
        comments_count: i64,
        touch_activity: bool,
    ) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub level: i32,
    pub content: String,
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create_comment(&self, input: NewComment) -> Result<Comment, AppError>;
    async fn find_active_comment(&self, id: i64) -> Result<Option<Comment>, AppError>;
    async fn update_content(&self, id: i64, content: &str) -> Result<Option<Comment>, AppError>;
    async fn soft_delete_comment(&self, id: i64) -> Result<bool, AppError>;
    /// Every active comment of the post plus the soft-deleted ancestors of
    /// active comments, oldest first.
    async fn list_for_tree(&self, post_id: i64) -> Result<Vec<Comment>, AppError>;
    /// The author's active comments on active posts, newest first.
    async fn list_by_author(
        &self,
        author_id: i64,
        page: Page,
    ) -> Result<(Vec<UserComment>, u64), AppError>;
    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> Result<LikeToggle, AppError>;
    async fn liked_comment_ids(
        &self,
        user_id: i64,
        comment_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError>;
    async fn count_active_by_post(&self, post_id: i64) -> Result<i64, AppError>;
    async fn count_active_by_author(&self, author_id: i64) -> Result<i64, AppError>;
    async fn count_active_replies(&self, parent_id: i64) -> Result<i64, AppError>;
    async fn set_replies_count(&self, id: i64, replies_count: i64) -> Result<(), AppError>;
}
