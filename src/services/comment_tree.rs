//! Comment forest assembly for a single post.
//!
//! Comments are stored flat with a `parent_id` back-reference. The forest is
//! rebuilt per request in an arena: one `Vec` of comments in creation order,
//! an id → position map, and index-based child lists. Only the root sequence
//! is paginated; every subtree under a returned root is returned whole.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{
    error::AppError,
    models::{
        comment::{Comment, MAX_COMMENT_LEVEL},
        pagination::{Page, Pagination},
    },
};

/// A comment with its nested replies, as returned to clients.
#[derive(Debug, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub is_liked_by_user: bool,
    pub replies: Vec<CommentNode>,
}

/// One page of root comments with their full reply trees.
#[derive(Debug, Serialize)]
pub struct CommentPage {
    pub comments: Vec<CommentNode>,
    pub pagination: Pagination,
}

#[derive(Debug)]
pub struct CommentForest {
    nodes: Vec<Comment>,
    liked: Vec<bool>,
    children: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

impl CommentForest {
    /// Builds the forest. Input order does not matter; nodes are ordered by
    /// `(created_at, id)` so every sibling list is oldest first.
    ///
    /// A comment is attached to its parent only when the parent is present and
    /// precedes it. Anything else (no parent, parent missing from the set,
    /// parent newer than the child) becomes a root, so no comment is dropped
    /// and the structure cannot contain cycles.
    pub fn build(mut comments: Vec<Comment>) -> Self {
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let index: HashMap<i64, usize> = comments
            .iter()
            .enumerate()
            .map(|(pos, comment)| (comment.id, pos))
            .collect();

        let mut children = vec![Vec::new(); comments.len()];
        let mut roots = Vec::new();

        for (pos, comment) in comments.iter().enumerate() {
            let parent = comment
                .parent_id
                .and_then(|parent_id| index.get(&parent_id).copied());
            match parent {
                Some(parent) if parent < pos => children[parent].push(pos),
                _ => roots.push(pos),
            }
        }

        Self {
            liked: vec![false; comments.len()],
            nodes: comments,
            children,
            roots,
        }
    }

    pub fn ids(&self) -> Vec<i64> {
        self.nodes.iter().map(|c| c.id).collect()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    /// Flags every node whose id is in the requester's liked set.
    pub fn mark_liked(&mut self, liked_ids: &HashSet<i64>) {
        for (pos, comment) in self.nodes.iter().enumerate() {
            self.liked[pos] = liked_ids.contains(&comment.id);
        }
    }

    /// Slices the root sequence and materializes the selected subtrees.
    pub fn into_page(self, page: Page) -> CommentPage {
        let total = self.roots.len();
        let pagination = Pagination::new(page, total as u64);

        let Self {
            nodes,
            liked,
            children,
            roots,
        } = self;
        let mut slots: Vec<Option<Comment>> = nodes.into_iter().map(Some).collect();

        let comments = roots[page.bounds(total)]
            .iter()
            .filter_map(|&pos| materialize(pos, &mut slots, &liked, &children))
            .collect();

        CommentPage {
            comments,
            pagination,
        }
    }
}

fn materialize(
    pos: usize,
    slots: &mut [Option<Comment>],
    liked: &[bool],
    children: &[Vec<usize>],
) -> Option<CommentNode> {
    let mut comment = slots[pos].take()?;
    // Soft-deleted ancestors only hold their replies in place.
    if !comment.is_active {
        comment.content.clear();
    }

    let replies = children[pos]
        .iter()
        .filter_map(|&child| materialize(child, slots, liked, children))
        .collect();

    Some(CommentNode {
        comment,
        is_liked_by_user: liked[pos],
        replies,
    })
}

/// Level of a new comment given its parent's level (`None` for a root comment).
pub fn reply_level(parent_level: Option<i32>) -> Result<i32, AppError> {
    let level = match parent_level {
        None => 0,
        Some(parent) => parent + 1,
    };
    if level > MAX_COMMENT_LEVEL {
        return Err(AppError::BadRequest(format!(
            "Comments cannot be nested more than {MAX_COMMENT_LEVEL} levels deep"
        )));
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::{post::AuthorSummary, user::Role};

    fn comment(id: i64, parent: Option<i64>, level: i32, secs: i64) -> Comment {
        let at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
        Comment {
            id,
            post_id: 1,
            author: AuthorSummary {
                id: 7,
                username: "alice".into(),
                avatar: String::new(),
                role: Role::User,
            },
            parent_id: parent,
            level,
            content: format!("comment {id}"),
            is_active: true,
            likes_count: 0,
            replies_count: 0,
            created_at: at,
            updated_at: at,
        }
    }

    fn ids(nodes: &[CommentNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.comment.id).collect()
    }

    fn all_ids(nodes: &[CommentNode], out: &mut Vec<i64>) {
        for node in nodes {
            out.push(node.comment.id);
            all_ids(&node.replies, out);
        }
    }

    fn first_page(limit: u32) -> Page {
        Page { page: 1, limit }
    }

    #[test]
    fn builds_nested_tree_in_creation_order() {
        let forest = CommentForest::build(vec![
            comment(4, Some(1), 1, 40),
            comment(1, None, 0, 10),
            comment(2, None, 0, 20),
            comment(3, Some(1), 1, 30),
            comment(5, Some(3), 2, 50),
        ]);
        let page = forest.into_page(first_page(20));

        assert_eq!(ids(&page.comments), vec![1, 2]);
        assert_eq!(ids(&page.comments[0].replies), vec![3, 4]);
        assert_eq!(ids(&page.comments[0].replies[0].replies), vec![5]);
        assert!(page.comments[1].replies.is_empty());
        assert_eq!(page.pagination.total, 2);
    }

    #[test]
    fn equal_timestamps_fall_back_to_id() {
        let forest = CommentForest::build(vec![
            comment(9, None, 0, 0),
            comment(3, None, 0, 0),
            comment(5, None, 0, 0),
        ]);
        let page = forest.into_page(first_page(20));
        assert_eq!(ids(&page.comments), vec![3, 5, 9]);
    }

    #[test]
    fn pagination_never_splits_a_subtree() {
        let forest = CommentForest::build(vec![
            comment(1, None, 0, 1),
            comment(2, Some(1), 1, 2),
            comment(3, None, 0, 3),
            comment(4, Some(3), 1, 4),
            comment(5, Some(4), 2, 5),
            comment(6, Some(5), 3, 6),
            comment(7, None, 0, 7),
            comment(8, Some(7), 1, 8),
            comment(9, Some(1), 1, 9),
        ]);
        assert_eq!(forest.root_count(), 3);

        let page = forest.into_page(Page { page: 2, limit: 1 });
        assert_eq!(ids(&page.comments), vec![3]);
        let mut seen = Vec::new();
        all_ids(&page.comments, &mut seen);
        assert_eq!(seen, vec![3, 4, 5, 6]);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.pages, 3);
        assert!(page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }

    #[test]
    fn late_reply_stays_with_its_root_on_the_first_page() {
        let forest = CommentForest::build(vec![
            comment(1, None, 0, 1),
            comment(2, None, 0, 2),
            comment(3, None, 0, 3),
            comment(4, Some(1), 1, 100),
        ]);
        let page = forest.into_page(first_page(2));
        assert_eq!(ids(&page.comments), vec![1, 2]);
        assert_eq!(ids(&page.comments[0].replies), vec![4]);
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let forest = CommentForest::build(vec![comment(1, None, 0, 1)]);
        let page = forest.into_page(Page { page: 5, limit: 20 });
        assert!(page.comments.is_empty());
        assert_eq!(page.pagination.total, 1);
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn orphan_with_missing_parent_is_promoted_to_root() {
        let forest = CommentForest::build(vec![
            comment(1, None, 0, 1),
            comment(2, Some(99), 1, 2),
        ]);
        let page = forest.into_page(first_page(20));
        assert_eq!(ids(&page.comments), vec![1, 2]);
    }

    #[test]
    fn parent_newer_than_child_cannot_form_a_cycle() {
        let forest = CommentForest::build(vec![
            comment(1, Some(2), 1, 1),
            comment(2, Some(1), 1, 2),
            comment(3, Some(3), 1, 3),
        ]);
        let page = forest.into_page(first_page(20));
        let mut seen = Vec::new();
        all_ids(&page.comments, &mut seen);
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(ids(&page.comments), vec![1, 3]);
        assert_eq!(ids(&page.comments[0].replies), vec![2]);
    }

    #[test]
    fn replies_stay_nested_under_a_soft_deleted_parent() {
        let mut deleted = comment(1, None, 0, 1);
        deleted.is_active = false;
        let forest = CommentForest::build(vec![
            deleted,
            comment(2, Some(1), 1, 2),
            comment(3, Some(2), 2, 3),
        ]);
        let page = forest.into_page(first_page(20));

        assert_eq!(ids(&page.comments), vec![1]);
        let tombstone = &page.comments[0];
        assert!(!tombstone.comment.is_active);
        assert!(tombstone.comment.content.is_empty());
        assert_eq!(ids(&tombstone.replies), vec![2]);
        assert_eq!(tombstone.replies[0].comment.content, "comment 2");
        assert_eq!(ids(&tombstone.replies[0].replies), vec![3]);
    }

    #[test]
    fn liked_flags_reach_nested_replies() {
        let mut forest = CommentForest::build(vec![
            comment(1, None, 0, 1),
            comment(2, Some(1), 1, 2),
            comment(3, Some(2), 2, 3),
        ]);
        forest.mark_liked(&HashSet::from([1, 3]));
        let page = forest.into_page(first_page(20));

        let root = &page.comments[0];
        assert!(root.is_liked_by_user);
        assert!(!root.replies[0].is_liked_by_user);
        assert!(root.replies[0].replies[0].is_liked_by_user);
    }

    #[test]
    fn without_requester_nothing_is_liked() {
        let forest = CommentForest::build(vec![comment(1, None, 0, 1)]);
        let page = forest.into_page(first_page(20));
        assert!(!page.comments[0].is_liked_by_user);
    }

    #[test]
    fn levels_follow_parent_and_cap_at_three() {
        assert_eq!(reply_level(None).unwrap(), 0);
        assert_eq!(reply_level(Some(0)).unwrap(), 1);
        assert_eq!(reply_level(Some(2)).unwrap(), 3);
        let err = reply_level(Some(3)).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
