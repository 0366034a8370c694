//! Post filtering and ordering shared by the list, search and per-user endpoints.
//!
//! Matching is case-insensitive substring matching: every whitespace-separated
//! term must appear in the title or in the content. Stores translate a
//! `PostQuery` into their own query language; the in-memory store evaluates it
//! with the functions below.

use std::cmp::Ordering;

use crate::models::{
    pagination::SortOrder,
    post::{AuthorSummary, Category, Post, PostSort},
};

/// Relevance weights per matching term.
pub const TITLE_WEIGHT: i64 = 3;
pub const CONTENT_WEIGHT: i64 = 2;
pub const AUTHOR_WEIGHT: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorFilter {
    Id(i64),
    /// Exact username match.
    Username(String),
    /// Case-insensitive username fragment.
    UsernameContains(String),
    /// Numeric input: the author with this id, or any username containing the digits.
    IdOrUsernameContains(i64, String),
}

impl AuthorFilter {
    /// Numeric input may be an id or part of a username, anything else is a username fragment.
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i64>() {
            Ok(id) => Some(AuthorFilter::IdOrUsernameContains(id, raw.to_string())),
            Err(_) => Some(AuthorFilter::UsernameContains(raw.to_string())),
        }
    }

    pub fn matches(&self, author: &AuthorSummary) -> bool {
        match self {
            AuthorFilter::Id(id) => author.id == *id,
            AuthorFilter::Username(name) => author.username == *name,
            AuthorFilter::UsernameContains(fragment) => {
                username_contains(&author.username, fragment)
            }
            AuthorFilter::IdOrUsernameContains(id, fragment) => {
                author.id == *id || username_contains(&author.username, fragment)
            }
        }
    }
}

fn username_contains(username: &str, fragment: &str) -> bool {
    username.to_lowercase().contains(&fragment.to_lowercase())
}

/// Filters plus ordering over active posts.
#[derive(Debug, Clone, Default)]
pub struct PostQuery {
    /// Lowercased search terms. Empty means no text filter.
    pub terms: Vec<String>,
    pub category: Option<Category>,
    pub author: Option<AuthorFilter>,
    pub sort_by: PostSort,
    pub order: SortOrder,
}

impl PostQuery {
    pub fn with_text(mut self, text: Option<&str>) -> Self {
        self.terms = text.map(split_terms).unwrap_or_default();
        self
    }

    /// Whether a post satisfies the text, category and author filters.
    /// Activity is the store's concern.
    pub fn accepts(&self, post: &Post) -> bool {
        if let Some(category) = self.category
            && post.category != category
        {
            return false;
        }
        if let Some(author) = &self.author
            && !author.matches(&post.author)
        {
            return false;
        }
        matches_terms(&self.terms, &post.title, &post.content)
    }

    /// Total order used for listing: pinned first (unless sorting by pin),
    /// then the requested key, then newest id first.
    pub fn compare(&self, a: &Post, b: &Post) -> Ordering {
        let pinned_first = b.is_pinned.cmp(&a.is_pinned);

        let by_key = match self.sort_by {
            PostSort::CreatedAt => a.created_at.cmp(&b.created_at),
            PostSort::LikesCount => a.likes_count.cmp(&b.likes_count),
            PostSort::CommentsCount => a.comments_count.cmp(&b.comments_count),
            PostSort::ViewsCount => a.views_count.cmp(&b.views_count),
            PostSort::LastActivity => a.last_activity.cmp(&b.last_activity),
            PostSort::IsPinned => a.is_pinned.cmp(&b.is_pinned),
            PostSort::Relevance => relevance(&self.terms, a).cmp(&relevance(&self.terms, b)),
        };
        let by_key = match self.order {
            SortOrder::Asc => by_key,
            SortOrder::Desc => by_key.reverse(),
        };

        let head = if self.sort_by == PostSort::IsPinned {
            by_key
        } else {
            pinned_first.then(by_key)
        };
        head.then(b.id.cmp(&a.id))
    }
}

/// Splits free text into lowercased, whitespace-separated terms.
pub fn split_terms(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// AND across terms, OR across title and content.
pub fn matches_terms(terms: &[String], title: &str, content: &str) -> bool {
    if terms.is_empty() {
        return true;
    }
    let title = title.to_lowercase();
    let content = content.to_lowercase();
    terms
        .iter()
        .all(|term| title.contains(term.as_str()) || content.contains(term.as_str()))
}

/// Title matches weigh more than content matches, which weigh more than author matches.
pub fn relevance(terms: &[String], post: &Post) -> i64 {
    let title = post.title.to_lowercase();
    let content = post.content.to_lowercase();
    let author = post.author.username.to_lowercase();

    terms
        .iter()
        .map(|term| {
            let mut score = 0;
            if title.contains(term.as_str()) {
                score += TITLE_WEIGHT;
            }
            if content.contains(term.as_str()) {
                score += CONTENT_WEIGHT;
            }
            if author.contains(term.as_str()) {
                score += AUTHOR_WEIGHT;
            }
            score
        })
        .sum()
}

/// `%term%` for `ILIKE ... ESCAPE '\'`, with LIKE metacharacters escaped.
pub fn like_pattern(term: &str) -> String {
    let mut out = String::with_capacity(term.len() + 2);
    out.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}
