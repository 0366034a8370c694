use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::{
    CommentRepository, NewComment, NewPost, NewUser, PostPatch, PostRepository, ProfilePatch,
    UserCounters, UserRepository,
};
use crate::{
    error::AppError,
    models::{
        comment::{Comment, UserComment},
        pagination::{Page, SortOrder},
        post::{AuthorSummary, LikeToggle, Post, PostSort},
        user::{Role, User, UserSort},
    },
    services::search::{
        AUTHOR_WEIGHT, AuthorFilter, CONTENT_WEIGHT, PostQuery, TITLE_WEIGHT, like_pattern,
    },
};

const USER_COLUMNS: &str = "id, username, email, password, avatar, bio, role, is_active, \
     posts_count, comments_count, likes_received, last_login, created_at, updated_at";

const POST_SELECT: &str = "SELECT p.id, p.title, p.content, p.category, p.tags, p.is_active, \
     p.is_pinned, p.likes_count, p.comments_count, p.views_count, p.last_activity, \
     p.created_at, p.updated_at, u.id AS author_id, u.username AS author_username, \
     u.avatar AS author_avatar, u.role AS author_role \
     FROM posts p JOIN users u ON u.id = p.author_id";

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.parent_id, c.level, c.content, c.is_active, \
     c.likes_count, c.replies_count, c.created_at, c.updated_at, u.id AS author_id, \
     u.username AS author_username, u.avatar AS author_avatar, u.role AS author_role";

/// Production backend over a shared connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let sql = format!("{POST_SELECT} WHERE p.id = $1 AND p.is_active = TRUE");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Post::try_from).transpose()
    }

    async fn load_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.author_id \
             WHERE c.id = $1 AND c.is_active = TRUE"
        );
        let row = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Comment::try_from).transpose()
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password: String,
    avatar: String,
    bio: String,
    role: String,
    is_active: bool,
    posts_count: i64,
    comments_count: i64,
    likes_received: i64,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password: row.password,
            avatar: row.avatar,
            bio: row.bio,
            role: parse_role(&row.role)?,
            is_active: row.is_active,
            posts_count: row.posts_count,
            comments_count: row.comments_count,
            likes_received: row.likes_received,
            last_login: row.last_login,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PostRow {
    id: i64,
    title: String,
    content: String,
    category: String,
    tags: Vec<String>,
    is_active: bool,
    is_pinned: bool,
    likes_count: i64,
    comments_count: i64,
    views_count: i64,
    last_activity: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_id: i64,
    author_username: String,
    author_avatar: String,
    author_role: String,
}

impl TryFrom<PostRow> for Post {
    type Error = AppError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Post {
            id: row.id,
            title: row.title,
            content: row.content,
            category: row.category.parse().map_err(AppError::InternalServerError)?,
            tags: row.tags,
            author: AuthorSummary {
                id: row.author_id,
                username: row.author_username,
                avatar: row.author_avatar,
                role: parse_role(&row.author_role)?,
            },
            is_active: row.is_active,
            is_pinned: row.is_pinned,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
            views_count: row.views_count,
            last_activity: row.last_activity,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_liked_by_user: false,
        })
    }
}

#[derive(FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    parent_id: Option<i64>,
    level: i32,
    content: String,
    is_active: bool,
    likes_count: i64,
    replies_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    author_id: i64,
    author_username: String,
    author_avatar: String,
    author_role: String,
}

impl TryFrom<CommentRow> for Comment {
    type Error = AppError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        Ok(Comment {
            id: row.id,
            post_id: row.post_id,
            author: AuthorSummary {
                id: row.author_id,
                username: row.author_username,
                avatar: row.author_avatar,
                role: parse_role(&row.author_role)?,
            },
            parent_id: row.parent_id,
            level: row.level,
            content: row.content,
            is_active: row.is_active,
            likes_count: row.likes_count,
            replies_count: row.replies_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct UserCommentRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    post_title: String,
}

fn parse_role(raw: &str) -> Result<Role, AppError> {
    raw.parse().map_err(AppError::InternalServerError)
}

fn map_db_error(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => {
                let message = match db_err.constraint() {
                    Some("users_username_key") => "Username is already taken",
                    Some("users_email_key") => "Email is already registered",
                    _ => "Resource already exists",
                };
                return AppError::Conflict(message.to_string());
            }
            Some("23503") => {
                return AppError::NotFound("Referenced resource not found".to_string());
            }
            _ => {}
        }
    }
    AppError::from(err)
}

#[async_trait]
impl UserRepository for PostgresStore {
    async fn create_user(&self, input: NewUser) -> Result<User, AppError> {
        let sql = format!(
            "INSERT INTO users (username, email, password, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&input.username)
            .bind(&input.email)
            .bind(&input.password_hash)
            .bind(input.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.try_into()
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 OR email = LOWER($1) LIMIT 1"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_taken(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude_id: Option<i64>,
    ) -> Result<Option<User>, AppError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($3::BIGINT IS NULL OR id <> $3) AND (username = $1 OR email = $2) \
             LIMIT 1"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(username)
            .bind(email)
            .bind(exclude_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn update_profile(&self, id: i64, patch: ProfilePatch) -> Result<Option<User>, AppError> {
        let sql = format!(
            "UPDATE users SET \
                username = COALESCE($2, username), \
                email = COALESCE($3, email), \
                bio = COALESCE($4, bio), \
                avatar = COALESCE($5, avatar), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .bind(patch.username)
            .bind(patch.email)
            .bind(patch.bio)
            .bind(patch.avatar)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?;
        row.map(User::try_from).transpose()
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET password = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        Ok(())
    }

    async fn record_login(&self, id: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_users(
        &self,
        sort: UserSort,
        order: SortOrder,
        page: Page,
    ) -> Result<(Vec<User>, u64), AppError> {
        let column = match sort {
            UserSort::CreatedAt => "created_at",
            UserSort::Username => "username",
            UserSort::PostsCount => "posts_count",
            UserSort::CommentsCount => "comments_count",
            UserSort::LikesReceived => "likes_received",
        };
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active = TRUE \
             ORDER BY {column} {}, id DESC LIMIT $1 OFFSET $2",
            direction(order)
        );
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .bind(page.limit as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = TRUE")
            .fetch_one(&self.pool)
            .await?;

        let users = rows
            .into_iter()
            .map(User::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((users, total as u64))
    }

    async fn set_counters(&self, id: i64, counters: UserCounters) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE users SET posts_count = $2, comments_count = $3, likes_received = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(counters.posts_count)
        .bind(counters.comments_count)
        .bind(counters.likes_received)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn direction(order: SortOrder) -> &'static str {
    match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    }
}

/// Appends the WHERE clause for `query` to a statement selecting from `posts p JOIN users u`.
fn push_post_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PostQuery) {
    builder.push(" WHERE p.is_active = TRUE");

    if let Some(category) = query.category {
        builder.push(" AND p.category = ").push_bind(category.as_str());
    }

    match &query.author {
        Some(AuthorFilter::Id(id)) => {
            builder.push(" AND p.author_id = ").push_bind(*id);
        }
        Some(AuthorFilter::Username(name)) => {
            builder.push(" AND u.username = ").push_bind(name.clone());
        }
        Some(AuthorFilter::UsernameContains(fragment)) => {
            builder
                .push(" AND u.username ILIKE ")
                .push_bind(like_pattern(fragment))
                .push(r" ESCAPE '\'");
        }
        Some(AuthorFilter::IdOrUsernameContains(id, fragment)) => {
            builder
                .push(" AND (p.author_id = ")
                .push_bind(*id)
                .push(" OR u.username ILIKE ")
                .push_bind(like_pattern(fragment))
                .push(r" ESCAPE '\')");
        }
        None => {}
    }

    for term in &query.terms {
        let pattern = like_pattern(term);
        builder
            .push(" AND (p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(r" ESCAPE '\' OR p.content ILIKE ")
            .push_bind(pattern)
            .push(r" ESCAPE '\')");
    }
}

/// Weighted sum of per-term title, content and author matches.
fn push_relevance(builder: &mut QueryBuilder<'_, Postgres>, terms: &[String]) {
    if terms.is_empty() {
        builder.push("0");
        return;
    }
    builder.push("(");
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            builder.push(" + ");
        }
        let pattern = like_pattern(term);
        builder
            .push("CASE WHEN p.title ILIKE ")
            .push_bind(pattern.clone())
            .push(format!(r" ESCAPE '\' THEN {TITLE_WEIGHT} ELSE 0 END"))
            .push(" + CASE WHEN p.content ILIKE ")
            .push_bind(pattern.clone())
            .push(format!(r" ESCAPE '\' THEN {CONTENT_WEIGHT} ELSE 0 END"))
            .push(" + CASE WHEN u.username ILIKE ")
            .push_bind(pattern)
            .push(format!(r" ESCAPE '\' THEN {AUTHOR_WEIGHT} ELSE 0 END"));
    }
    builder.push(")");
}

fn push_post_order(builder: &mut QueryBuilder<'_, Postgres>, query: &PostQuery) {
    builder.push(" ORDER BY ");
    if query.sort_by != PostSort::IsPinned {
        builder.push("p.is_pinned DESC, ");
    }
    match query.sort_by {
        PostSort::CreatedAt => {
            builder.push("p.created_at");
        }
        PostSort::LikesCount => {
            builder.push("p.likes_count");
        }
        PostSort::CommentsCount => {
            builder.push("p.comments_count");
        }
        PostSort::ViewsCount => {
            builder.push("p.views_count");
        }
        PostSort::LastActivity => {
            builder.push("p.last_activity");
        }
        PostSort::IsPinned => {
            builder.push("p.is_pinned");
        }
        PostSort::Relevance => push_relevance(builder, &query.terms),
    }
    builder.push(" ").push(direction(query.order)).push(", p.id DESC");
}

/// Flips `user_id`'s membership in a like table and stores the recount, all
/// under a row lock on the liked entity.
async fn toggle_like_in(
    pool: &PgPool,
    target: LikeTarget,
    id: i64,
    user_id: i64,
) -> Result<LikeToggle, AppError> {
    let (table, likes_table, column, missing) = match target {
        LikeTarget::Post => ("posts", "post_likes", "post_id", "Post not found"),
        LikeTarget::Comment => ("comments", "comment_likes", "comment_id", "Comment not found"),
    };

    let mut tx = pool.begin().await?;

    let locked: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT id FROM {table} WHERE id = $1 AND is_active = TRUE FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;
    if locked.is_none() {
        return Err(AppError::NotFound(missing.to_string()));
    }

    let removed = sqlx::query(&format!(
        "DELETE FROM {likes_table} WHERE {column} = $1 AND user_id = $2"
    ))
    .bind(id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    if !removed {
        sqlx::query(&format!(
            "INSERT INTO {likes_table} ({column}, user_id) VALUES ($1, $2)"
        ))
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(map_db_error)?;
    }

    let likes_count: i64 = sqlx::query_scalar(&format!(
        "UPDATE {table} SET likes_count = \
            (SELECT COUNT(*) FROM {likes_table} WHERE {column} = $1) \
         WHERE id = $1 RETURNING likes_count"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(LikeToggle {
        is_liked: !removed,
        likes_count,
    })
}

#[derive(Clone, Copy)]
enum LikeTarget {
    Post,
    Comment,
}

#[async_trait]
impl PostRepository for PostgresStore {
    async fn create_post(&self, input: NewPost) -> Result<Post, AppError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO posts (author_id, title, content, category, tags) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(input.author_id)
        .bind(&input.title)
        .bind(&input.content)
        .bind(input.category.as_str())
        .bind(&input.tags)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        self.load_post(id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(format!("post {id} vanished after insert"))
            })
    }

    async fn find_active_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        self.load_post(id).await
    }

    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Option<Post>, AppError> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE posts SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                category = COALESCE($4, category), \
                tags = COALESCE($5, tags), \
                is_pinned = COALESCE($6, is_pinned), \
                updated_at = NOW() \
             WHERE id = $1 AND is_active = TRUE \
             RETURNING id",
        )
        .bind(id)
        .bind(patch.title)
        .bind(patch.content)
        .bind(patch.category.map(|c| c.as_str()))
        .bind(patch.tags)
        .bind(patch.is_pinned)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.load_post(id).await,
            None => Ok(None),
        }
    }

    async fn soft_delete_post(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE posts SET is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn increment_views(&self, id: i64) -> Result<i64, AppError> {
        let views: Option<i64> = sqlx::query_scalar(
            "UPDATE posts SET views_count = views_count + 1 WHERE id = $1 RETURNING views_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        views.ok_or(AppError::NotFound("Post not found".to_string()))
    }

    async fn query_posts(
        &self,
        query: &PostQuery,
        page: Page,
    ) -> Result<(Vec<Post>, u64), AppError> {
        let mut select = QueryBuilder::<Postgres>::new(POST_SELECT);
        push_post_filters(&mut select, query);
        push_post_order(&mut select, query);
        select
            .push(" LIMIT ")
            .push_bind(page.limit as i64)
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);

        let rows = select
            .build_query_as::<PostRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM posts p JOIN users u ON u.id = p.author_id",
        );
        push_post_filters(&mut count, query);
        let total = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let posts = rows
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((posts, total as u64))
    }

    async fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<LikeToggle, AppError> {
        toggle_like_in(&self.pool, LikeTarget::Post, post_id, user_id).await
    }

    async fn liked_post_ids(
        &self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        if post_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT post_id FROM post_likes WHERE user_id = $1 AND post_id = ANY($2)",
        )
        .bind(user_id)
        .bind(post_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE author_id = $1 AND is_active = TRUE",
        )
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn sum_likes_by_author(&self, author_id: i64) -> Result<i64, AppError> {
        let sum: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(likes_count), 0)::BIGINT FROM posts \
             WHERE author_id = $1 AND is_active = TRUE",
        )
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(sum)
    }

    async fn set_comments_count(
        &self,
        post_id: i64,
        comments_count: i64,
        touch_activity: bool,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE posts SET comments_count = $2, \
                last_activity = CASE WHEN $3 THEN NOW() ELSE last_activity END \
             WHERE id = $1",
        )
        .bind(post_id)
        .bind(comments_count)
        .bind(touch_activity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for PostgresStore {
    async fn create_comment(&self, input: NewComment) -> Result<Comment, AppError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO comments (post_id, author_id, parent_id, level, content) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(input.post_id)
        .bind(input.author_id)
        .bind(input.parent_id)
        .bind(input.level)
        .bind(&input.content)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_error)?;

        self.load_comment(id)
            .await?
            .ok_or_else(|| {
                AppError::InternalServerError(format!("comment {id} vanished after insert"))
            })
    }

    async fn find_active_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        self.load_comment(id).await
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Option<Comment>, AppError> {
        let updated: Option<i64> = sqlx::query_scalar(
            "UPDATE comments SET content = $2, updated_at = NOW() \
             WHERE id = $1 AND is_active = TRUE RETURNING id",
        )
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(id) => self.load_comment(id).await,
            None => Ok(None),
        }
    }

    async fn soft_delete_comment(&self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE comments SET is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_tree(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        // UNION (not UNION ALL) deduplicates, so the walk terminates.
        let sql = format!(
            "WITH RECURSIVE visible AS ( \
                SELECT id, parent_id FROM comments WHERE post_id = $1 AND is_active = TRUE \
                UNION \
                SELECT c.id, c.parent_id FROM comments c \
                JOIN visible v ON c.id = v.parent_id \
                WHERE c.post_id = $1 \
             ) \
             SELECT {COMMENT_COLUMNS} FROM comments c JOIN users u ON u.id = c.author_id \
             WHERE c.id IN (SELECT id FROM visible) \
             ORDER BY c.created_at ASC, c.id ASC"
        );
        let rows = sqlx::query_as::<_, CommentRow>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Comment::try_from).collect()
    }

    async fn list_by_author(
        &self,
        author_id: i64,
        page: Page,
    ) -> Result<(Vec<UserComment>, u64), AppError> {
        let sql = format!(
            "SELECT {COMMENT_COLUMNS}, p.title AS post_title \
             FROM comments c \
             JOIN users u ON u.id = c.author_id \
             JOIN posts p ON p.id = c.post_id \
             WHERE c.author_id = $1 AND c.is_active = TRUE AND p.is_active = TRUE \
             ORDER BY c.created_at DESC, c.id DESC \
             LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, UserCommentRow>(&sql)
            .bind(author_id)
            .bind(page.limit as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments c JOIN posts p ON p.id = c.post_id \
             WHERE c.author_id = $1 AND c.is_active = TRUE AND p.is_active = TRUE",
        )
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;

        let comments = rows
            .into_iter()
            .map(|row| {
                Ok(UserComment {
                    comment: Comment::try_from(row.comment)?,
                    post_title: row.post_title,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;
        Ok((comments, total as u64))
    }

    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> Result<LikeToggle, AppError> {
        toggle_like_in(&self.pool, LikeTarget::Comment, comment_id, user_id).await
    }

    async fn liked_comment_ids(
        &self,
        user_id: i64,
        comment_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        if comment_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT comment_id FROM comment_likes WHERE user_id = $1 AND comment_id = ANY($2)",
        )
        .bind(user_id)
        .bind(comment_ids.to_vec())
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }

    async fn count_active_by_post(&self, post_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE post_id = $1 AND is_active = TRUE",
        )
        .bind(post_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE author_id = $1 AND is_active = TRUE",
        )
        .bind(author_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn count_active_replies(&self, parent_id: i64) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE parent_id = $1 AND is_active = TRUE",
        )
        .bind(parent_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn set_replies_count(&self, id: i64, replies_count: i64) -> Result<(), AppError> {
        sqlx::query("UPDATE comments SET replies_count = $2 WHERE id = $1")
            .bind(id)
            .bind(replies_count)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
