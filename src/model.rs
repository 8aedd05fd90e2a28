use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fixed number of posts requested per page.
pub const PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A top-level anonymous message. `content` is untrusted markup.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub comment_count: u32,
}

/// A reply attached to one post. `likes` is only the server's seed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
    pub likes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub page: u32,
    pub total: u64,
    pub page_size: u32,
}

impl PostPage {
    pub fn total_pages(&self) -> u32 {
        total_pages(self.total, self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommentThread {
    pub comments: Vec<Comment>,
    pub total: u64,
}

impl CommentThread {
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

pub fn total_pages(total_items: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    let pages = total_items.div_ceil(page_size);
    pages.clamp(1, u64::from(u32::MAX)) as u32
}
