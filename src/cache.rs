use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::model::{CommentThread, PostId};

/// Freshness window for a cached comment thread.
pub const COMMENT_CACHE_TTL: Duration = Duration::from_secs(3 * 60);
pub const COMMENT_CACHE_MAX: usize = 64;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub thread: CommentThread,
    pub fetched_at: Instant,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }
}

/// Comment threads keyed by post. Writes replace whole entries.
#[derive(Debug, Default)]
pub struct CommentCache {
    entries: HashMap<PostId, CacheEntry>,
}

impl CommentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, post_id: &PostId) -> Option<&CacheEntry> {
        self.entries.get(post_id)
    }

    pub fn get_fresh(&self, post_id: &PostId) -> Option<&CacheEntry> {
        self.get(post_id)
            .filter(|entry| entry.is_fresh(COMMENT_CACHE_TTL))
    }

    pub fn put(&mut self, post_id: PostId, thread: CommentThread) {
        self.put_at(post_id, thread, Instant::now());
    }

    pub(crate) fn put_at(&mut self, post_id: PostId, thread: CommentThread, fetched_at: Instant) {
        if !self.entries.contains_key(&post_id) && self.entries.len() >= COMMENT_CACHE_MAX {
            if let Some(old_key) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(key, _)| key.clone())
            {
                self.entries.remove(&old_key);
            }
        }
        self.entries.insert(
            post_id,
            CacheEntry {
                thread,
                fetched_at,
            },
        );
    }

    pub fn invalidate(&mut self, post_id: &PostId) -> bool {
        self.entries.remove(post_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Comment, CommentId};

    fn thread(ids: &[&str]) -> CommentThread {
        CommentThread {
            comments: ids
                .iter()
                .map(|id| Comment {
                    id: CommentId::new(*id),
                    post_id: PostId::new("p1"),
                    content: format!("comment {id}"),
                    created_at: None,
                    likes: None,
                })
                .collect(),
            total: ids.len() as u64,
        }
    }

    fn ago(secs: u64) -> Instant {
        Instant::now()
            .checked_sub(Duration::from_secs(secs))
            .expect("monotonic clock far enough from boot")
    }

    #[test]
    fn fresh_within_window() {
        let mut cache = CommentCache::new();
        cache.put(PostId::new("p1"), thread(&["c1"]));
        assert!(cache.get_fresh(&PostId::new("p1")).is_some());
    }

    #[test]
    fn stale_after_three_minutes() {
        let mut cache = CommentCache::new();
        cache.put_at(PostId::new("p1"), thread(&["c1"]), ago(181));
        assert!(cache.get(&PostId::new("p1")).is_some());
        assert!(cache.get_fresh(&PostId::new("p1")).is_none());
    }

    #[test]
    fn put_replaces_without_merging() {
        let mut cache = CommentCache::new();
        let key = PostId::new("p1");
        cache.put_at(key.clone(), thread(&["c1", "c2"]), ago(120));
        cache.put(key.clone(), thread(&["c3"]));
        let entry = cache.get(&key).unwrap();
        assert_eq!(entry.thread.comments.len(), 1);
        assert_eq!(entry.thread.comments[0].id, CommentId::new("c3"));
        assert!(entry.age() < Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_removes_entry() {
        let mut cache = CommentCache::new();
        cache.put(PostId::new("p1"), thread(&[]));
        assert!(cache.invalidate(&PostId::new("p1")));
        assert!(!cache.invalidate(&PostId::new("p1")));
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut cache = CommentCache::new();
        cache.put_at(PostId::new("oldest"), thread(&[]), ago(100));
        for index in 1..COMMENT_CACHE_MAX {
            cache.put(PostId::new(format!("p{index}")), thread(&[]));
        }
        assert_eq!(cache.len(), COMMENT_CACHE_MAX);
        cache.put(PostId::new("newcomer"), thread(&[]));
        assert_eq!(cache.len(), COMMENT_CACHE_MAX);
        assert!(cache.get(&PostId::new("oldest")).is_none());
        assert!(cache.get(&PostId::new("newcomer")).is_some());
    }
}
