use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::api::{self, FetchError};
use crate::model::{Comment, CommentId, CommentThread, Post, PostId, PostPage};

pub trait FeedService: Send + Sync {
    fn load_page(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError>;
    fn create_post(&self, content: &str) -> Result<Post, FetchError>;
}

pub trait CommentService: Send + Sync {
    fn load_comments(&self, post_id: &PostId) -> Result<CommentThread, FetchError>;
    fn create_comment(&self, post_id: &PostId, content: &str) -> Result<Comment, FetchError>;
}

pub struct HttpFeedService {
    client: Arc<api::Client>,
}

impl HttpFeedService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl FeedService for HttpFeedService {
    fn load_page(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError> {
        self.client.posts(page, per_page)
    }

    fn create_post(&self, content: &str) -> Result<Post, FetchError> {
        self.client.create_post(content)
    }
}

pub struct HttpCommentService {
    client: Arc<api::Client>,
}

impl HttpCommentService {
    pub fn new(client: Arc<api::Client>) -> Self {
        Self { client }
    }
}

impl CommentService for HttpCommentService {
    fn load_comments(&self, post_id: &PostId) -> Result<CommentThread, FetchError> {
        self.client.comments(post_id)
    }

    fn create_comment(&self, post_id: &PostId, content: &str) -> Result<Comment, FetchError> {
        self.client.create_comment(post_id, content)
    }
}

/// In-process board backing `--offline` mode. Newest posts first, comments oldest first.
#[derive(Default)]
pub struct MemoryBoard {
    state: Mutex<BoardState>,
}

#[derive(Default)]
struct BoardState {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    next_id: u64,
}

impl BoardState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}{}", self.next_id)
    }
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_welcome_posts() -> Self {
        let board = Self::new();
        let welcome = [
            "欢迎来到树洞。这里的每一条消息都是匿名的。",
            "j/k 选择帖子，Enter 展开评论，i 发帖，a 回复，n/p 翻页，q 退出。",
            "离线模式：内容只保存在本次运行的内存中。",
        ];
        for text in welcome {
            // Seeding cannot fail on the in-memory board.
            let _ = board.create_post(text);
        }
        board
    }
}

impl FeedService for MemoryBoard {
    fn load_page(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError> {
        let state = self.state.lock();
        let per_page = per_page.max(1);
        let start = (page.max(1) as usize - 1) * per_page as usize;
        let posts = state
            .posts
            .iter()
            .rev()
            .skip(start)
            .take(per_page as usize)
            .map(|post| {
                let mut post = post.clone();
                post.comment_count = state
                    .comments
                    .iter()
                    .filter(|comment| comment.post_id == post.id)
                    .count() as u32;
                post
            })
            .collect();
        Ok(PostPage {
            posts,
            page: page.max(1),
            total: state.posts.len() as u64,
            page_size: per_page,
        })
    }

    fn create_post(&self, content: &str) -> Result<Post, FetchError> {
        let mut state = self.state.lock();
        let id = state.next_id("p");
        let post = Post {
            id: PostId::new(id),
            content: content.to_string(),
            created_at: Some(Utc::now()),
            comment_count: 0,
        };
        state.posts.push(post.clone());
        Ok(post)
    }
}

impl CommentService for MemoryBoard {
    fn load_comments(&self, post_id: &PostId) -> Result<CommentThread, FetchError> {
        let state = self.state.lock();
        if !state.posts.iter().any(|post| &post.id == post_id) {
            return Err(FetchError::Server {
                status: 404,
                message: Some("Post not found".into()),
            });
        }
        let comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|comment| &comment.post_id == post_id)
            .cloned()
            .collect();
        let total = comments.len() as u64;
        Ok(CommentThread { comments, total })
    }

    fn create_comment(&self, post_id: &PostId, content: &str) -> Result<Comment, FetchError> {
        let mut state = self.state.lock();
        if !state.posts.iter().any(|post| &post.id == post_id) {
            return Err(FetchError::Server {
                status: 404,
                message: Some("Post not found".into()),
            });
        }
        let id = state.next_id("c");
        let comment = Comment {
            id: CommentId::new(id),
            post_id: post_id.clone(),
            content: content.to_string(),
            created_at: Some(Utc::now()),
            likes: None,
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_board_pages_newest_first() {
        let board = MemoryBoard::new();
        for index in 0..12 {
            board.create_post(&format!("post {index}")).unwrap();
        }
        let first = board.load_page(1, 10).unwrap();
        assert_eq!(first.posts.len(), 10);
        assert_eq!(first.posts[0].content, "post 11");
        assert_eq!(first.total_pages(), 2);
        let second = board.load_page(2, 10).unwrap();
        assert_eq!(second.posts.len(), 2);
        assert_eq!(second.posts[1].content, "post 0");
    }

    #[test]
    fn memory_board_counts_comments() {
        let board = MemoryBoard::new();
        let post = board.create_post("hello").unwrap();
        board.create_comment(&post.id, "first").unwrap();
        board.create_comment(&post.id, "second").unwrap();
        let page = board.load_page(1, 10).unwrap();
        assert_eq!(page.posts[0].comment_count, 2);
        let thread = board.load_comments(&post.id).unwrap();
        assert_eq!(thread.total, 2);
        assert_eq!(thread.comments[0].content, "first");
    }

    #[test]
    fn memory_board_rejects_unknown_post() {
        let board = MemoryBoard::new();
        let err = board.load_comments(&PostId::new("missing")).unwrap_err();
        assert!(matches!(err, FetchError::Server { status: 404, .. }));
    }
}
