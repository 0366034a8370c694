//! Denormalized counters, recomputed from source after each primary write.
//!
//! These run after the write has succeeded. A failure here is logged and
//! swallowed: the counters are mirrors and the next write recomputes them.

use crate::{error::AppError, repository::UserCounters, state::AppState};

/// Recomputes a user's post, comment and received-like totals.
pub async fn refresh_user(state: &AppState, user_id: i64) {
    if let Err(e) = recompute_user(state, user_id).await {
        tracing::warn!("Failed to refresh counters for user {}: {}", user_id, e);
    }
}

/// After a comment is created or removed: the post's comment count (bumping
/// its activity time on create), the author's totals and the parent's reply count.
pub async fn refresh_after_comment_write(
    state: &AppState,
    post_id: i64,
    author_id: i64,
    parent_id: Option<i64>,
    touch_activity: bool,
) {
    if let Err(e) = recompute_post_comments(state, post_id, touch_activity).await {
        tracing::warn!("Failed to refresh comment count for post {}: {}", post_id, e);
    }

    refresh_user(state, author_id).await;

    if let Some(parent_id) = parent_id
        && let Err(e) = recompute_replies(state, parent_id).await
    {
        tracing::warn!("Failed to refresh reply count for comment {}: {}", parent_id, e);
    }
}

async fn recompute_user(state: &AppState, user_id: i64) -> Result<(), AppError> {
    let counters = UserCounters {
        posts_count: state.posts.count_active_by_author(user_id).await?,
        comments_count: state.comments.count_active_by_author(user_id).await?,
        likes_received: state.posts.sum_likes_by_author(user_id).await?,
    };
    state.users.set_counters(user_id, counters).await
}

async fn recompute_post_comments(
    state: &AppState,
    post_id: i64,
    touch_activity: bool,
) -> Result<(), AppError> {
    let count = state.comments.count_active_by_post(post_id).await?;
    state
        .posts
        .set_comments_count(post_id, count, touch_activity)
        .await
}

async fn recompute_replies(state: &AppState, parent_id: i64) -> Result<(), AppError> {
    let count = state.comments.count_active_replies(parent_id).await?;
    state.comments.set_replies_count(parent_id, count).await
}
