use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{
    pagination::{Pagination, SortOrder},
    user::Role,
};

/// Board section a post belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Tech,
    Life,
    Qa,
    Chat,
    Announcement,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tech => "tech",
            Category::Life => "life",
            Category::Qa => "qa",
            Category::Chat => "chat",
            Category::Announcement => "announcement",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tech" => Ok(Category::Tech),
            "life" => Ok(Category::Life),
            "qa" => Ok(Category::Qa),
            "chat" => Ok(Category::Chat),
            "announcement" => Ok(Category::Announcement),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Author fields embedded in posts and comments.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthorSummary {
    pub id: i64,
    pub username: String,
    pub avatar: String,
    pub role: Role,
}

/// A discussion thread.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub category: Category,
    pub tags: Vec<String>,
    pub author: AuthorSummary,

    /// False once soft-deleted.
    pub is_active: bool,
    pub is_pinned: bool,

    pub likes_count: i64,
    pub comments_count: i64,
    pub views_count: i64,

    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// UI helper: whether the current user has liked this post.
    /// Default to false, populated only when a requester is known.
    pub is_liked_by_user: bool,
}

/// One page of a post listing.
#[derive(Debug, Serialize)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub pagination: Pagination,
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 5, max = 100, message = "Title must be between 5 and 100 characters"))]
    pub title: String,

    #[validate(length(
        min = 10,
        max = 5000,
        message = "Content must be between 10 and 5000 characters"
    ))]
    pub content: String,

    pub category: Category,

    #[validate(custom(function = validate_tags))]
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostRequest {
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.content = self.content.trim().to_string();
        self.tags = normalize_tags(self.tags);
        self
    }
}

/// DTO for editing a post. Absent fields are left unchanged.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(min = 5, max = 100, message = "Title must be between 5 and 100 characters"))]
    pub title: Option<String>,

    #[validate(length(
        min = 10,
        max = 5000,
        message = "Content must be between 10 and 5000 characters"
    ))]
    pub content: Option<String>,

    pub category: Option<Category>,

    #[validate(custom(function = validate_tags))]
    pub tags: Option<Vec<String>>,

    /// Admin only.
    pub is_pinned: Option<bool>,
}

impl UpdatePostRequest {
    pub fn normalized(mut self) -> Self {
        self.title = self.title.map(|t| t.trim().to_string());
        self.content = self.content.map(|c| c.trim().to_string());
        self.tags = self.tags.map(normalize_tags);
        self
    }
}

/// Sort keys accepted by list and search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostSort {
    #[default]
    CreatedAt,
    LikesCount,
    CommentsCount,
    ViewsCount,
    LastActivity,
    IsPinned,
    Relevance,
}

/// Query parameters for `GET /api/posts`.
#[derive(Debug, Deserialize, Validate)]
pub struct PostListParams {
    #[validate(range(min = 1, message = "page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "limit must be between 1 and 50"))]
    pub limit: Option<u32>,
    pub category: Option<Category>,
    /// Exact username.
    pub author: Option<String>,
    #[validate(length(max = 100, message = "search must be at most 100 characters"))]
    pub search: Option<String>,
    pub sort_by: Option<PostSort>,
    pub sort_order: Option<SortOrder>,
}

/// Query parameters for `GET /api/posts/search`.
#[derive(Debug, Deserialize, Validate)]
pub struct PostSearchParams {
    #[validate(length(min = 1, max = 100, message = "q must be between 1 and 100 characters"))]
    pub q: Option<String>,
    pub category: Option<Category>,
    /// Author id, or a case-insensitive username fragment.
    pub author: Option<String>,
    pub sort_by: Option<PostSort>,
    pub sort_order: Option<SortOrder>,
    #[validate(range(min = 1, message = "page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "limit must be between 1 and 50"))]
    pub limit: Option<u32>,
}

/// Query parameters for a user's post listing.
#[derive(Debug, Deserialize, Validate)]
pub struct UserPostsParams {
    #[validate(range(min = 1, message = "page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "limit must be between 1 and 50"))]
    pub limit: Option<u32>,
}

/// Result of a like toggle on a post or a comment.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct LikeToggle {
    pub is_liked: bool,
    pub likes_count: i64,
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter().map(|t| t.trim().to_string()).collect()
}

/// At most 5 tags, each 1..=20 characters.
fn validate_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.len() > 5 {
        return Err(ValidationError::new("too_many_tags").with_message("At most 5 tags".into()));
    }
    for tag in tags {
        let len = tag.chars().count();
        if !(1..=20).contains(&len) {
            return Err(ValidationError::new("invalid_tag")
                .with_message("Each tag must be between 1 and 20 characters".into()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(title: &str) -> CreatePostRequest {
        CreatePostRequest {
            title: title.into(),
            content: "long enough content".into(),
            category: Category::Tech,
            tags: vec![],
        }
    }

    #[test]
    fn title_of_four_chars_is_rejected() {
        assert!(create("abcd").validate().is_err());
    }

    #[test]
    fn title_of_five_chars_is_accepted() {
        assert!(create("abcde").validate().is_ok());
    }

    #[test]
    fn title_is_trimmed_before_validation() {
        let req = create("  abcd  ").normalized();
        assert_eq!(req.title, "abcd");
        assert!(req.validate().is_err());
    }

    #[test]
    fn title_length_counts_characters_not_bytes() {
        assert!(create("五个汉字啊").validate().is_ok());
    }

    #[test]
    fn content_bounds() {
        let mut req = create("valid title");
        req.content = "too short".into();
        assert!(req.validate().is_err());
        req.content = "x".repeat(5001);
        assert!(req.validate().is_err());
        req.content = "x".repeat(5000);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn tag_rules() {
        let mut req = create("valid title");
        req.tags = (0..6).map(|i| format!("t{i}")).collect();
        assert!(req.validate().is_err());
        req.tags = vec!["".into()];
        assert!(req.validate().is_err());
        req.tags = vec!["rust".into(), "web".into()];
        assert!(req.validate().is_ok());
    }

    #[test]
    fn category_parses_from_json() {
        let parsed: Category = serde_json::from_str("\"announcement\"").unwrap();
        assert_eq!(parsed, Category::Announcement);
        assert!(serde_json::from_str::<Category>("\"news\"").is_err());
        assert_eq!("qa".parse::<Category>().unwrap(), Category::Qa);
    }
}
