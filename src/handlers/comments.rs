use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    extract::{ApiJson, ApiQuery},
    models::{
        comment::{Comment, CommentListParams, CreateCommentRequest, UpdateCommentRequest},
        envelope::Envelope,
        pagination::Page,
        user::User,
    },
    repository::NewComment,
    services::{
        comment_tree::{CommentForest, reply_level},
        counters,
    },
    state::AppState,
    utils::jwt::{CurrentUser, MaybeUser},
};

const DEFAULT_PAGE_SIZE: u32 = 20;

fn ensure_can_modify(user: &User, comment: &Comment) -> Result<(), AppError> {
    if comment.author.id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only modify your own comments".to_string(),
        ));
    }
    Ok(())
}

async fn active_comment(state: &AppState, id: i64) -> Result<Comment, AppError> {
    state
        .comments
        .find_active_comment(id)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))
}

async fn ensure_post_exists(state: &AppState, post_id: i64) -> Result<(), AppError> {
    state
        .posts
        .find_active_post(post_id)
        .await?
        .map(|_| ())
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

/// Comment tree of a post. Pages count root comments only.
pub async fn list_comments(
    State(state): State<AppState>,
    requester: MaybeUser,
    Path(post_id): Path<i64>,
    ApiQuery(params): ApiQuery<CommentListParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    ensure_post_exists(&state, post_id).await?;

    let comments = state.comments.list_for_tree(post_id).await?;
    let mut forest = CommentForest::build(comments);

    if let Some(user_id) = requester.id() {
        let liked = state
            .comments
            .liked_comment_ids(user_id, &forest.ids())
            .await?;
        forest.mark_liked(&liked);
    }

    let page = Page::resolve(params.page, params.limit, DEFAULT_PAGE_SIZE);
    Ok(Json(Envelope::data(forest.into_page(page))))
}

/// Adds a root comment or, with `parent_comment`, a reply.
pub async fn create_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(post_id): Path<i64>,
    ApiJson(payload): ApiJson<CreateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validate payload and targets
    let payload = payload.normalized();
    payload.validate()?;
    ensure_post_exists(&state, post_id).await?;

    let level = match payload.parent_comment {
        Some(parent_id) => {
            let parent = state
                .comments
                .find_active_comment(parent_id)
                .await?
                .ok_or(AppError::NotFound("Parent comment not found".to_string()))?;
            if parent.post_id != post_id {
                return Err(AppError::BadRequest(
                    "Parent comment belongs to a different post".to_string(),
                ));
            }
            reply_level(Some(parent.level))?
        }
        None => reply_level(None)?,
    };

    // 2. Insert
    let comment = state
        .comments
        .create_comment(NewComment {
            post_id,
            author_id: user.id,
            parent_id: payload.parent_comment,
            level,
            content: payload.content,
        })
        .await?;

    tracing::info!(
        "Comment {} created on post {} by user {} (level {})",
        comment.id,
        post_id,
        user.id,
        level
    );

    // 3. Counters
    counters::refresh_after_comment_write(&state, post_id, user.id, comment.parent_id, true)
        .await;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message("Comment created", comment)),
    ))
}

pub async fn update_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdateCommentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.normalized();
    payload.validate()?;

    let comment = active_comment(&state, id).await?;
    ensure_can_modify(&user, &comment)?;

    let updated = state
        .comments
        .update_content(id, &payload.content)
        .await?
        .ok_or(AppError::NotFound("Comment not found".to_string()))?;

    tracing::info!("Comment {} updated by user {}", id, user.id);

    Ok(Json(Envelope::with_message("Comment updated", updated)))
}

/// Soft delete. Replies stay active and keep their place in the tree.
pub async fn delete_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let comment = active_comment(&state, id).await?;
    ensure_can_modify(&user, &comment)?;

    if !state.comments.soft_delete_comment(id).await? {
        return Err(AppError::NotFound("Comment not found".to_string()));
    }

    tracing::info!("Comment {} deleted by user {}", id, user.id);

    counters::refresh_after_comment_write(
        &state,
        comment.post_id,
        comment.author.id,
        comment.parent_id,
        false,
    )
    .await;

    Ok(Json(Envelope::message("Comment deleted")))
}

pub async fn like_comment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let toggled = state.comments.toggle_like(id, user.id).await?;

    let message = if toggled.is_liked { "Comment liked" } else { "Like removed" };
    Ok(Json(Envelope::with_message(message, toggled)))
}
