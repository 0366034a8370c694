// src/models/mod.rs

pub mod comment;
pub mod envelope;
pub mod pagination;
pub mod post;
pub mod user;
