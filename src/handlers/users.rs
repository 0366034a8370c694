use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    extract::ApiQuery,
    handlers::posts::paged_posts,
    models::{
        comment::UserCommentPage,
        envelope::Envelope,
        pagination::{Page, Pagination},
        post::UserPostsParams,
        user::{PublicProfile, User, UserListParams, UserPage},
    },
    services::search::{AuthorFilter, PostQuery},
    state::AppState,
    utils::jwt::MaybeUser,
};

async fn active_user(state: &AppState, username: &str) -> Result<User, AppError> {
    state
        .users
        .find_by_username(username)
        .await?
        .filter(|user| user.is_active)
        .ok_or(AppError::NotFound("User not found".to_string()))
}

/// Directory of active users.
pub async fn list_users(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<UserListParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;

    let page = Page::resolve(params.page, params.limit, 20);
    let (users, total) = state
        .users
        .list_users(
            params.sort_by.unwrap_or_default(),
            params.sort_order.unwrap_or_default(),
            page,
        )
        .await?;

    Ok(Json(Envelope::data(UserPage {
        users: users.into_iter().map(PublicProfile::from).collect(),
        pagination: Pagination::new(page, total),
    })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = active_user(&state, &username).await?;
    Ok(Json(Envelope::data(PublicProfile::from(user))))
}

/// A user's posts, newest first.
pub async fn user_posts(
    State(state): State<AppState>,
    requester: MaybeUser,
    Path(username): Path<String>,
    ApiQuery(params): ApiQuery<UserPostsParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    let user = active_user(&state, &username).await?;

    let page = Page::resolve(params.page, params.limit, 10);
    let query = PostQuery {
        author: Some(AuthorFilter::Id(user.id)),
        ..PostQuery::default()
    };

    let result = paged_posts(&state, requester.id(), &query, page).await?;
    Ok(Json(Envelope::data(result)))
}

/// A user's comments with the title of the post each belongs to.
pub async fn user_comments(
    State(state): State<AppState>,
    Path(username): Path<String>,
    ApiQuery(params): ApiQuery<UserPostsParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    let user = active_user(&state, &username).await?;

    let page = Page::resolve(params.page, params.limit, 10);
    let (comments, total) = state.comments.list_by_author(user.id, page).await?;

    Ok(Json(Envelope::data(UserCommentPage {
        comments,
        pagination: Pagination::new(page, total),
    })))
}
