use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{pagination::Pagination, post::AuthorSummary};

/// Deepest allowed reply level. Roots are level 0.
pub const MAX_COMMENT_LEVEL: i32 = 3;

/// A single comment record. The tree is implicit through `parent_id`.
#[derive(Debug, Clone, Serialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: AuthorSummary,
    /// `None` for root comments.
    pub parent_id: Option<i64>,
    /// Depth: parent level + 1, capped at `MAX_COMMENT_LEVEL`.
    pub level: i32,
    pub content: String,
    pub is_active: bool,
    pub likes_count: i64,
    pub replies_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for creating a new comment.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,

    /// Optional: the ID of the comment being replied to.
    pub parent_comment: Option<i64>,
}

impl CreateCommentRequest {
    pub fn normalized(mut self) -> Self {
        self.content = self.content.trim().to_string();
        self
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(
        min = 1,
        max = 1000,
        message = "Comment must be between 1 and 1000 characters"
    ))]
    pub content: String,
}

impl UpdateCommentRequest {
    pub fn normalized(mut self) -> Self {
        self.content = self.content.trim().to_string();
        self
    }
}

/// Paging for comment listings. Only root comments count towards a page.
#[derive(Debug, Deserialize, Validate)]
pub struct CommentListParams {
    #[validate(range(min = 1, message = "page must be a positive integer"))]
    pub page: Option<u32>,
    #[validate(range(min = 1, max = 50, message = "limit must be between 1 and 50"))]
    pub limit: Option<u32>,
}

/// A comment listed on its author's profile, with the title of its post.
#[derive(Debug, Clone, Serialize)]
pub struct UserComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub post_title: String,
}

#[derive(Debug, Serialize)]
pub struct UserCommentPage {
    pub comments: Vec<UserComment>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_comment_is_rejected_after_trim() {
        let req = CreateCommentRequest {
            content: "   ".into(),
            parent_comment: None,
        }
        .normalized();
        assert!(req.validate().is_err());
    }

    #[test]
    fn comment_length_cap() {
        let ok = CreateCommentRequest {
            content: "x".repeat(1000),
            parent_comment: None,
        };
        assert!(ok.validate().is_ok());
        let too_long = CreateCommentRequest {
            content: "x".repeat(1001),
            parent_comment: None,
        };
        assert!(too_long.validate().is_err());
    }
}
