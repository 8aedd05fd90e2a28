//! Test doubles shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::api::FetchError;
use crate::data::{CommentService, FeedService};
use crate::model::{Comment, CommentId, CommentThread, Post, PostId, PostPage};

/// Blocks service calls until released. Dropping the sender opens the gate for good.
pub struct Gate {
    release: Mutex<Option<Sender<()>>>,
    hold: Receiver<()>,
}

impl Gate {
    fn new() -> Self {
        let (release, hold) = bounded(0);
        Self {
            release: Mutex::new(Some(release)),
            hold,
        }
    }

    fn wait(&self) {
        let _ = self.hold.recv();
    }

    fn open(&self) {
        self.release.lock().take();
    }
}

#[derive(Default)]
struct StubState {
    posts: Vec<Post>,
    comments: Vec<Comment>,
    comment_failures: VecDeque<FetchError>,
    create_failures: VecDeque<FetchError>,
    page_failures: VecDeque<FetchError>,
    next_id: u64,
}

/// A board with call counters, injectable failures, and optional gates.
pub struct StubBoard {
    state: Mutex<StubState>,
    comment_gate: Mutex<Option<Arc<Gate>>>,
    create_gate: Mutex<Option<Arc<Gate>>>,
    page_fetches: AtomicUsize,
    comment_fetches: AtomicUsize,
    post_creates: AtomicUsize,
    comment_creates: AtomicUsize,
}

impl StubBoard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StubState::default()),
            comment_gate: Mutex::new(None),
            create_gate: Mutex::new(None),
            page_fetches: AtomicUsize::new(0),
            comment_fetches: AtomicUsize::new(0),
            post_creates: AtomicUsize::new(0),
            comment_creates: AtomicUsize::new(0),
        }
    }

    pub fn with_post(self, id: &str, content: &str, comment_count: u32) -> Self {
        self.state.lock().posts.push(Post {
            id: PostId::new(id),
            content: content.to_string(),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            comment_count,
        });
        self
    }

    pub fn with_comment(self, post_id: &str, id: &str, content: &str) -> Self {
        self.state.lock().comments.push(Comment {
            id: CommentId::new(id),
            post_id: PostId::new(post_id),
            content: content.to_string(),
            created_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            likes: None,
        });
        self
    }

    pub fn hold_comment_fetches(&self) {
        *self.comment_gate.lock() = Some(Arc::new(Gate::new()));
    }

    pub fn release_comment_fetches(&self) {
        if let Some(gate) = self.comment_gate.lock().take() {
            gate.open();
        }
    }

    pub fn hold_creates(&self) {
        *self.create_gate.lock() = Some(Arc::new(Gate::new()));
    }

    pub fn release_creates(&self) {
        if let Some(gate) = self.create_gate.lock().take() {
            gate.open();
        }
    }

    pub fn fail_next_comment_fetch(&self, err: FetchError) {
        self.state.lock().comment_failures.push_back(err);
    }

    pub fn fail_next_create(&self, err: FetchError) {
        self.state.lock().create_failures.push_back(err);
    }

    pub fn fail_next_page(&self, err: FetchError) {
        self.state.lock().page_failures.push_back(err);
    }

    pub fn page_fetches(&self) -> usize {
        self.page_fetches.load(Ordering::SeqCst)
    }

    pub fn comment_fetches(&self) -> usize {
        self.comment_fetches.load(Ordering::SeqCst)
    }

    pub fn post_creates(&self) -> usize {
        self.post_creates.load(Ordering::SeqCst)
    }

    pub fn comment_creates(&self) -> usize {
        self.comment_creates.load(Ordering::SeqCst)
    }

    fn comment_gate(&self) -> Option<Arc<Gate>> {
        self.comment_gate.lock().clone()
    }

    fn create_gate(&self) -> Option<Arc<Gate>> {
        self.create_gate.lock().clone()
    }
}

impl FeedService for StubBoard {
    fn load_page(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError> {
        self.page_fetches.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if let Some(err) = state.page_failures.pop_front() {
            return Err(err);
        }
        let start = (page.max(1) as usize - 1) * per_page as usize;
        let posts = state
            .posts
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect();
        Ok(PostPage {
            posts,
            page,
            total: state.posts.len() as u64,
            page_size: per_page,
        })
    }

    fn create_post(&self, content: &str) -> Result<Post, FetchError> {
        self.post_creates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.create_gate() {
            gate.wait();
        }
        let mut state = self.state.lock();
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }
        state.next_id += 1;
        let post = Post {
            id: PostId::new(format!("new{}", state.next_id)),
            content: content.to_string(),
            created_at: Some(Utc::now()),
            comment_count: 0,
        };
        state.posts.insert(0, post.clone());
        Ok(post)
    }
}

impl CommentService for StubBoard {
    fn load_comments(&self, post_id: &PostId) -> Result<CommentThread, FetchError> {
        self.comment_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.comment_gate() {
            gate.wait();
        }
        let mut state = self.state.lock();
        if let Some(err) = state.comment_failures.pop_front() {
            return Err(err);
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
        self.comment_creates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.create_gate() {
            gate.wait();
        }
        let mut state = self.state.lock();
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }
        state.next_id += 1;
        let comment = Comment {
            id: CommentId::new(format!("c{}", state.next_id)),
            post_id: post_id.clone(),
            content: content.to_string(),
            created_at: Some(Utc::now()),
            likes: None,
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }
}

/// Polls `step` until it reports progress or two seconds pass.
pub fn wait_until<F: FnMut() -> bool>(mut step: F) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !step() {
        assert!(Instant::now() < deadline, "timed out waiting for workers");
        thread::sleep(Duration::from_millis(5));
    }
}
