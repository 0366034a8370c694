// src/services/mod.rs

pub mod comment_tree;
pub mod counters;
pub mod search;
