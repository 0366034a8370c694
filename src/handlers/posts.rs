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
        envelope::Envelope,
        pagination::{Page, Pagination},
        post::{
            CreatePostRequest, Post, PostListParams, PostPage, PostSearchParams, UpdatePostRequest,
        },
        user::User,
    },
    repository::{NewPost, PostPatch},
    services::{
        counters,
        search::{AuthorFilter, PostQuery},
    },
    state::AppState,
    utils::jwt::{CurrentUser, MaybeUser},
};

const DEFAULT_PAGE_SIZE: u32 = 10;

/// Sets `is_liked_by_user` on each post for a known requester.
pub async fn mark_liked_posts(
    state: &AppState,
    requester: Option<i64>,
    posts: &mut [Post],
) -> Result<(), AppError> {
    let Some(user_id) = requester else {
        return Ok(());
    };
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let liked = state.posts.liked_post_ids(user_id, &ids).await?;
    for post in posts.iter_mut() {
        post.is_liked_by_user = liked.contains(&post.id);
    }
    Ok(())
}

/// Runs a post query and wraps the page with its pagination metadata.
pub async fn paged_posts(
    state: &AppState,
    requester: Option<i64>,
    query: &PostQuery,
    page: Page,
) -> Result<PostPage, AppError> {
    let (mut posts, total) = state.posts.query_posts(query, page).await?;
    mark_liked_posts(state, requester, &mut posts).await?;
    Ok(PostPage {
        posts,
        pagination: Pagination::new(page, total),
    })
}

fn ensure_can_modify(user: &User, post: &Post) -> Result<(), AppError> {
    if post.author.id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden(
            "You can only modify your own posts".to_string(),
        ));
    }
    Ok(())
}

async fn active_post(state: &AppState, id: i64) -> Result<Post, AppError> {
    state
        .posts
        .find_active_post(id)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))
}

/// List posts with optional category, author, text filter and sort.
pub async fn list_posts(
    State(state): State<AppState>,
    requester: MaybeUser,
    ApiQuery(params): ApiQuery<PostListParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;

    let page = Page::resolve(params.page, params.limit, DEFAULT_PAGE_SIZE);
    let query = PostQuery {
        category: params.category,
        author: params
            .author
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .map(AuthorFilter::Username),
        sort_by: params.sort_by.unwrap_or_default(),
        order: params.sort_order.unwrap_or_default(),
        ..PostQuery::default()
    }
    .with_text(params.search.as_deref());

    let result = paged_posts(&state, requester.id(), &query, page).await?;
    Ok(Json(Envelope::data(result)))
}

/// Full-text-ish search. Needs at least one of `q`, `category`, `author`.
pub async fn search_posts(
    State(state): State<AppState>,
    requester: MaybeUser,
    ApiQuery(params): ApiQuery<PostSearchParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;

    let text = params.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
    let author = params.author.as_deref().and_then(AuthorFilter::parse_loose);

    if text.is_none() && params.category.is_none() && author.is_none() {
        return Err(AppError::BadRequest(
            "Provide at least one search criterion: q, category or author".to_string(),
        ));
    }

    let page = Page::resolve(params.page, params.limit, DEFAULT_PAGE_SIZE);
    let query = PostQuery {
        category: params.category,
        author,
        sort_by: params.sort_by.unwrap_or_default(),
        order: params.sort_order.unwrap_or_default(),
        ..PostQuery::default()
    }
    .with_text(text);

    let result = paged_posts(&state, requester.id(), &query, page).await?;
    Ok(Json(Envelope::data(result)))
}

/// Get a single post by ID. Each read counts as a view.
pub async fn get_post(
    State(state): State<AppState>,
    requester: MaybeUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut post = active_post(&state, id).await?;
    post.views_count = state.posts.increment_views(id).await?;

    mark_liked_posts(&state, requester.id(), std::slice::from_mut(&mut post)).await?;

    Ok(Json(Envelope::data(post)))
}

pub async fn create_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(payload): ApiJson<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    // 1. Validate payload
    let payload = payload.normalized();
    payload.validate()?;

    // 2. Insert
    let post = state
        .posts
        .create_post(NewPost {
            author_id: user.id,
            title: payload.title,
            content: payload.content,
            category: payload.category,
            tags: payload.tags,
        })
        .await?;

    tracing::info!("Post {} created by user {}", post.id, user.id);

    // 3. Author counters
    counters::refresh_user(&state, user.id).await;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::with_message("Post created", post)),
    ))
}

/// Edit a post. Requires: author or admin. Pinning is admin-only.
pub async fn update_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ApiJson(payload): ApiJson<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    let payload = payload.normalized();
    payload.validate()?;

    let post = active_post(&state, id).await?;
    ensure_can_modify(&user, &post)?;

    if payload.is_pinned.is_some() && !user.is_admin() {
        return Err(AppError::Forbidden(
            "Only administrators can pin posts".to_string(),
        ));
    }

    let patch = PostPatch {
        title: payload.title,
        content: payload.content,
        category: payload.category,
        tags: payload.tags,
        is_pinned: payload.is_pinned,
    };

    let mut updated = state
        .posts
        .update_post(id, patch)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))?;
    mark_liked_posts(&state, Some(user.id), std::slice::from_mut(&mut updated)).await?;

    tracing::info!("Post {} updated by user {}", id, user.id);

    Ok(Json(Envelope::with_message("Post updated", updated)))
}

/// Soft delete. Requires: author or admin.
pub async fn delete_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = active_post(&state, id).await?;
    ensure_can_modify(&user, &post)?;

    if !state.posts.soft_delete_post(id).await? {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    tracing::info!("Post {} deleted by user {}", id, user.id);

    counters::refresh_user(&state, post.author.id).await;

    Ok(Json(Envelope::message("Post deleted")))
}

/// Toggles the current user's like on a post.
pub async fn like_post(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = active_post(&state, id).await?;
    let toggled = state.posts.toggle_like(id, user.id).await?;

    counters::refresh_user(&state, post.author.id).await;

    let message = if toggled.is_liked { "Post liked" } else { "Like removed" };
    Ok(Json(Envelope::with_message(message, toggled)))
}
