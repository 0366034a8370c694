//! In-process store used by the test-suite and when no `DATABASE_URL` is set.
//!
//! All three repositories share one `RwLock`, so every trait method is atomic
//! with respect to the others, the like toggle included.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    CommentRepository, NewComment, NewPost, NewUser, PostPatch, PostRepository, ProfilePatch,
    UserCounters, UserRepository, taken_error,
};
use crate::{
    error::AppError,
    models::{
        comment::{Comment, UserComment},
        pagination::{Page, SortOrder},
        post::{AuthorSummary, Category, LikeToggle, Post},
        user::{DEFAULT_AVATAR, Role, User, UserSort},
    },
    services::search::PostQuery,
};

#[derive(Debug, Clone)]
struct PostRecord {
    id: i64,
    author_id: i64,
    title: String,
    content: String,
    category: Category,
    tags: Vec<String>,
    is_active: bool,
    is_pinned: bool,
    likes: BTreeSet<i64>,
    likes_count: i64,
    comments_count: i64,
    views_count: i64,
    last_activity: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct CommentRecord {
    id: i64,
    post_id: i64,
    author_id: i64,
    parent_id: Option<i64>,
    level: i32,
    content: String,
    is_active: bool,
    likes: BTreeSet<i64>,
    likes_count: i64,
    replies_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: BTreeMap<i64, User>,
    posts: BTreeMap<i64, PostRecord>,
    comments: BTreeMap<i64, CommentRecord>,
    next_user_id: i64,
    next_post_id: i64,
    next_comment_id: i64,
}

impl State {
    fn author(&self, id: i64) -> AuthorSummary {
        match self.users.get(&id) {
            Some(user) => AuthorSummary {
                id,
                username: user.username.clone(),
                avatar: user.avatar.clone(),
                role: user.role,
            },
            None => AuthorSummary {
                id,
                username: String::new(),
                avatar: DEFAULT_AVATAR.to_string(),
                role: Role::User,
            },
        }
    }

    fn post_view(&self, record: &PostRecord) -> Post {
        Post {
            id: record.id,
            title: record.title.clone(),
            content: record.content.clone(),
            category: record.category,
            tags: record.tags.clone(),
            author: self.author(record.author_id),
            is_active: record.is_active,
            is_pinned: record.is_pinned,
            likes_count: record.likes_count,
            comments_count: record.comments_count,
            views_count: record.views_count,
            last_activity: record.last_activity,
            created_at: record.created_at,
            updated_at: record.updated_at,
            is_liked_by_user: false,
        }
    }

    fn comment_view(&self, record: &CommentRecord) -> Comment {
        Comment {
            id: record.id,
            post_id: record.post_id,
            author: self.author(record.author_id),
            parent_id: record.parent_id,
            level: record.level,
            content: record.content.clone(),
            is_active: record.is_active,
            likes_count: record.likes_count,
            replies_count: record.replies_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    fn taken_by(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude: Option<i64>,
    ) -> Option<&User> {
        self.users.values().find(|user| {
            Some(user.id) != exclude
                && (username.is_some_and(|u| user.username == u)
                    || email.is_some_and(|e| user.email == e))
        })
    }
}

/// Shared in-memory backend implementing every repository trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn create_user(&self, input: NewUser) -> Result<User, AppError> {
        let mut state = self.state.write().await;
        let username = Some(input.username.as_str());
        if let Some(existing) = state.taken_by(username, Some(input.email.as_str()), None) {
            return Err(taken_error(existing, username));
        }

        state.next_user_id += 1;
        let now = Utc::now();
        let user = User {
            id: state.next_user_id,
            username: input.username,
            email: input.email,
            password: input.password_hash,
            avatar: DEFAULT_AVATAR.to_string(),
            bio: String::new(),
            role: input.role,
            is_active: true,
            posts_count: 0,
            comments_count: 0,
            likes_received: 0,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_by_login(&self, login: &str) -> Result<Option<User>, AppError> {
        let email = login.to_lowercase();
        let state = self.state.read().await;
        Ok(state
            .users
            .values()
            .find(|u| u.username == login || u.email == email)
            .cloned())
    }

    async fn find_taken(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        exclude_id: Option<i64>,
    ) -> Result<Option<User>, AppError> {
        let state = self.state.read().await;
        Ok(state.taken_by(username, email, exclude_id).cloned())
    }

    async fn update_profile(&self, id: i64, patch: ProfilePatch) -> Result<Option<User>, AppError> {
        let mut state = self.state.write().await;
        let taken = state.taken_by(patch.username.as_deref(), patch.email.as_deref(), Some(id));
        if let Some(existing) = taken {
            return Err(taken_error(existing, patch.username.as_deref()));
        }
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(bio) = patch.bio {
            user.bio = bio;
        }
        if let Some(avatar) = patch.avatar {
            user.avatar = avatar;
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn update_password(&self, id: i64, password_hash: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or(AppError::NotFound("User not found".to_string()))?;
        user.password = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn record_login(&self, id: i64) -> Result<(), AppError> {
        if let Some(user) = self.state.write().await.users.get_mut(&id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_users(
        &self,
        sort: UserSort,
        order: SortOrder,
        page: Page,
    ) -> Result<(Vec<User>, u64), AppError> {
        let state = self.state.read().await;
        let mut users: Vec<&User> = state.users.values().filter(|u| u.is_active).collect();
        users.sort_by(|a, b| {
            let by_key = match sort {
                UserSort::CreatedAt => a.created_at.cmp(&b.created_at),
                UserSort::Username => a.username.cmp(&b.username),
                UserSort::PostsCount => a.posts_count.cmp(&b.posts_count),
                UserSort::CommentsCount => a.comments_count.cmp(&b.comments_count),
                UserSort::LikesReceived => a.likes_received.cmp(&b.likes_received),
            };
            let by_key = match order {
                SortOrder::Asc => by_key,
                SortOrder::Desc => by_key.reverse(),
            };
            by_key.then(b.id.cmp(&a.id))
        });

        let total = users.len() as u64;
        let page_items = users[page.bounds(users.len())]
            .iter()
            .map(|u| (*u).clone())
            .collect();
        Ok((page_items, total))
    }

    async fn set_counters(&self, id: i64, counters: UserCounters) -> Result<(), AppError> {
        if let Some(user) = self.state.write().await.users.get_mut(&id) {
            user.posts_count = counters.posts_count;
            user.comments_count = counters.comments_count;
            user.likes_received = counters.likes_received;
        }
        Ok(())
    }
}

#[async_trait]
impl PostRepository for MemoryStore {
    async fn create_post(&self, input: NewPost) -> Result<Post, AppError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&input.author_id) {
            return Err(AppError::NotFound("Author not found".to_string()));
        }
        state.next_post_id += 1;
        let now = Utc::now();
        let record = PostRecord {
            id: state.next_post_id,
            author_id: input.author_id,
            title: input.title,
            content: input.content,
            category: input.category,
            tags: input.tags,
            is_active: true,
            is_pinned: false,
            likes: BTreeSet::new(),
            likes_count: 0,
            comments_count: 0,
            views_count: 0,
            last_activity: now,
            created_at: now,
            updated_at: now,
        };
        let post = state.post_view(&record);
        state.posts.insert(record.id, record);
        Ok(post)
    }

    async fn find_active_post(&self, id: i64) -> Result<Option<Post>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .get(&id)
            .filter(|p| p.is_active)
            .map(|p| state.post_view(p)))
    }

    async fn update_post(&self, id: i64, patch: PostPatch) -> Result<Option<Post>, AppError> {
        let mut state = self.state.write().await;
        let Some(record) = state.posts.get_mut(&id).filter(|p| p.is_active) else {
            return Ok(None);
        };
        if let Some(title) = patch.title {
            record.title = title;
        }
        if let Some(content) = patch.content {
            record.content = content;
        }
        if let Some(category) = patch.category {
            record.category = category;
        }
        if let Some(tags) = patch.tags {
            record.tags = tags;
        }
        if let Some(is_pinned) = patch.is_pinned {
            record.is_pinned = is_pinned;
        }
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(Some(state.post_view(&record)))
    }

    async fn soft_delete_post(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.posts.get_mut(&id).filter(|p| p.is_active) {
            Some(record) => {
                record.is_active = false;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn increment_views(&self, id: i64) -> Result<i64, AppError> {
        let mut state = self.state.write().await;
        let record = state
            .posts
            .get_mut(&id)
            .ok_or(AppError::NotFound("Post not found".to_string()))?;
        record.views_count += 1;
        Ok(record.views_count)
    }

    async fn query_posts(
        &self,
        query: &PostQuery,
        page: Page,
    ) -> Result<(Vec<Post>, u64), AppError> {
        let state = self.state.read().await;
        let mut posts: Vec<Post> = state
            .posts
            .values()
            .filter(|p| p.is_active)
            .map(|p| state.post_view(p))
            .filter(|p| query.accepts(p))
            .collect();
        posts.sort_by(|a, b| query.compare(a, b));

        let total = posts.len() as u64;
        let range = page.bounds(posts.len());
        Ok((posts.drain(range).collect(), total))
    }

    async fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<LikeToggle, AppError> {
        let mut state = self.state.write().await;
        let record = state
            .posts
            .get_mut(&post_id)
            .filter(|p| p.is_active)
            .ok_or(AppError::NotFound("Post not found".to_string()))?;

        let is_liked = if record.likes.remove(&user_id) {
            false
        } else {
            record.likes.insert(user_id);
            true
        };
        record.likes_count = record.likes.len() as i64;

        Ok(LikeToggle {
            is_liked,
            likes_count: record.likes_count,
        })
    }

    async fn liked_post_ids(
        &self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        let state = self.state.read().await;
        Ok(post_ids
            .iter()
            .copied()
            .filter(|id| state.posts.get(id).is_some_and(|p| p.likes.contains(&user_id)))
            .collect())
    }

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .values()
            .filter(|p| p.is_active && p.author_id == author_id)
            .count() as i64)
    }

    async fn sum_likes_by_author(&self, author_id: i64) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .posts
            .values()
            .filter(|p| p.is_active && p.author_id == author_id)
            .map(|p| p.likes_count)
            .sum())
    }

    async fn set_comments_count(
        &self,
        post_id: i64,
        comments_count: i64,
        touch_activity: bool,
    ) -> Result<(), AppError> {
        if let Some(record) = self.state.write().await.posts.get_mut(&post_id) {
            record.comments_count = comments_count;
            if touch_activity {
                record.last_activity = Utc::now();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for MemoryStore {
    async fn create_comment(&self, input: NewComment) -> Result<Comment, AppError> {
        let mut state = self.state.write().await;
        state.next_comment_id += 1;
        let now = Utc::now();
        let record = CommentRecord {
            id: state.next_comment_id,
            post_id: input.post_id,
            author_id: input.author_id,
            parent_id: input.parent_id,
            level: input.level,
            content: input.content,
            is_active: true,
            likes: BTreeSet::new(),
            likes_count: 0,
            replies_count: 0,
            created_at: now,
            updated_at: now,
        };
        let comment = state.comment_view(&record);
        state.comments.insert(record.id, record);
        Ok(comment)
    }

    async fn find_active_comment(&self, id: i64) -> Result<Option<Comment>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .get(&id)
            .filter(|c| c.is_active)
            .map(|c| state.comment_view(c)))
    }

    async fn update_content(&self, id: i64, content: &str) -> Result<Option<Comment>, AppError> {
        let mut state = self.state.write().await;
        let Some(record) = state.comments.get_mut(&id).filter(|c| c.is_active) else {
            return Ok(None);
        };
        record.content = content.to_string();
        record.updated_at = Utc::now();
        let record = record.clone();
        Ok(Some(state.comment_view(&record)))
    }

    async fn soft_delete_comment(&self, id: i64) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        match state.comments.get_mut(&id).filter(|c| c.is_active) {
            Some(record) => {
                record.is_active = false;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_for_tree(&self, post_id: i64) -> Result<Vec<Comment>, AppError> {
        let state = self.state.read().await;
        let mut visible: BTreeSet<i64> = state
            .comments
            .values()
            .filter(|c| c.post_id == post_id && c.is_active)
            .map(|c| c.id)
            .collect();

        // Pull in soft-deleted ancestors so replies keep their place.
        let mut frontier: Vec<i64> = visible.iter().copied().collect();
        while let Some(id) = frontier.pop() {
            let parent = state.comments.get(&id).and_then(|c| c.parent_id);
            if let Some(parent_id) = parent
                && state.comments.get(&parent_id).is_some_and(|p| p.post_id == post_id)
                && visible.insert(parent_id)
            {
                frontier.push(parent_id);
            }
        }

        let mut comments: Vec<Comment> = visible
            .iter()
            .filter_map(|id| state.comments.get(id))
            .map(|c| state.comment_view(c))
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(comments)
    }

    async fn list_by_author(
        &self,
        author_id: i64,
        page: Page,
    ) -> Result<(Vec<UserComment>, u64), AppError> {
        let state = self.state.read().await;
        let mut rows: Vec<UserComment> = state
            .comments
            .values()
            .filter(|c| c.author_id == author_id && c.is_active)
            .filter_map(|c| {
                let post = state.posts.get(&c.post_id).filter(|p| p.is_active)?;
                Some(UserComment {
                    comment: state.comment_view(c),
                    post_title: post.title.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.comment
                .created_at
                .cmp(&a.comment.created_at)
                .then(b.comment.id.cmp(&a.comment.id))
        });

        let total = rows.len() as u64;
        let range = page.bounds(rows.len());
        Ok((rows.drain(range).collect(), total))
    }

    async fn toggle_like(&self, comment_id: i64, user_id: i64) -> Result<LikeToggle, AppError> {
        let mut state = self.state.write().await;
        let record = state
            .comments
            .get_mut(&comment_id)
            .filter(|c| c.is_active)
            .ok_or(AppError::NotFound("Comment not found".to_string()))?;

        let is_liked = if record.likes.remove(&user_id) {
            false
        } else {
            record.likes.insert(user_id);
            true
        };
        record.likes_count = record.likes.len() as i64;

        Ok(LikeToggle {
            is_liked,
            likes_count: record.likes_count,
        })
    }

    async fn liked_comment_ids(
        &self,
        user_id: i64,
        comment_ids: &[i64],
    ) -> Result<HashSet<i64>, AppError> {
        let state = self.state.read().await;
        Ok(comment_ids
            .iter()
            .copied()
            .filter(|id| state.comments.get(id).is_some_and(|c| c.likes.contains(&user_id)))
            .collect())
    }

    async fn count_active_by_post(&self, post_id: i64) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .values()
            .filter(|c| c.is_active && c.post_id == post_id)
            .count() as i64)
    }

    async fn count_active_by_author(&self, author_id: i64) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .values()
            .filter(|c| c.is_active && c.author_id == author_id)
            .count() as i64)
    }

    async fn count_active_replies(&self, parent_id: i64) -> Result<i64, AppError> {
        let state = self.state.read().await;
        Ok(state
            .comments
            .values()
            .filter(|c| c.is_active && c.parent_id == Some(parent_id))
            .count() as i64)
    }

    async fn set_replies_count(&self, id: i64, replies_count: i64) -> Result<(), AppError> {
        if let Some(record) = self.state.write().await.comments.get_mut(&id) {
            record.replies_count = replies_count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryStore, i64, i64) {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "hash".into(),
                role: Role::User,
            })
            .await
            .unwrap();
        let post = store
            .create_post(NewPost {
                author_id: user.id,
                title: "Hello world".into(),
                content: "A first post body".into(),
                category: Category::Tech,
                tags: vec![],
            })
            .await
            .unwrap();
        (store, user.id, post.id)
    }

    async fn post_likes_len(store: &MemoryStore, post_id: i64) -> usize {
        store.state.read().await.posts[&post_id].likes.len()
    }

    #[tokio::test]
    async fn double_toggle_restores_state() {
        let (store, user_id, post_id) = seeded().await;

        let first = PostRepository::toggle_like(&store, post_id, user_id).await.unwrap();
        assert_eq!(first, LikeToggle { is_liked: true, likes_count: 1 });
        assert_eq!(post_likes_len(&store, post_id).await, 1);

        let second = PostRepository::toggle_like(&store, post_id, user_id).await.unwrap();
        assert_eq!(second, LikeToggle { is_liked: false, likes_count: 0 });
        assert_eq!(post_likes_len(&store, post_id).await, 0);
    }

    #[tokio::test]
    async fn likes_count_tracks_set_size_across_users() {
        let (store, user_id, post_id) = seeded().await;
        for other in [user_id, 100, 101] {
            let toggled = PostRepository::toggle_like(&store, post_id, other).await.unwrap();
            assert_eq!(toggled.likes_count as usize, post_likes_len(&store, post_id).await);
        }
        let liked = store.liked_post_ids(100, &[post_id, 999]).await.unwrap();
        assert_eq!(liked, HashSet::from([post_id]));
    }

    #[tokio::test]
    async fn duplicate_username_or_email_conflicts() {
        let (store, _, _) = seeded().await;
        let err = store
            .create_user(NewUser {
                username: "alice".into(),
                email: "other@example.com".into(),
                password_hash: "hash".into(),
                role: Role::User,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("Username")));

        let err = store
            .create_user(NewUser {
                username: "bob".into(),
                email: "alice@example.com".into(),
                password_hash: "hash".into(),
                role: Role::User,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m.contains("Email")));
    }

    #[tokio::test]
    async fn tree_listing_includes_deleted_ancestors_only() {
        let (store, user_id, post_id) = seeded().await;
        let new = |parent_id, level| NewComment {
            post_id,
            author_id: user_id,
            parent_id,
            level,
            content: "text".into(),
        };
        let root = store.create_comment(new(None, 0)).await.unwrap();
        let reply = store.create_comment(new(Some(root.id), 1)).await.unwrap();
        let lonely = store.create_comment(new(None, 0)).await.unwrap();

        store.soft_delete_comment(root.id).await.unwrap();
        store.soft_delete_comment(lonely.id).await.unwrap();

        let listed: Vec<i64> = store
            .list_for_tree(post_id)
            .await
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(listed, vec![root.id, reply.id]);
        assert_eq!(store.count_active_by_post(post_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_skips_deleted_posts() {
        let (store, _, post_id) = seeded().await;
        let query = PostQuery::default().with_text(Some("hello"));
        let (posts, total) = store.query_posts(&query, Page { page: 1, limit: 10 }).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(posts[0].author.username, "alice");

        assert!(store.soft_delete_post(post_id).await.unwrap());
        assert!(!store.soft_delete_post(post_id).await.unwrap());
        let (posts, total) = store.query_posts(&query, Page { page: 1, limit: 10 }).await.unwrap();
        assert_eq!(total, 0);
        assert!(posts.is_empty());
    }
}
