//! One running board session: the post list, its comment sections, and the
//! composers. Owned by a single thread; network work happens on short-lived
//! workers that report back through a channel drained by [`Feed::poll`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::api::FetchError;
use crate::coordinator::{CommentsEvent, LoadOutcome, RequestCoordinator};
use crate::data::{CommentService, FeedService};
use crate::likes::LikeStore;
use crate::model::{Comment, CommentId, CommentThread, Post, PostId, PostPage, PAGE_SIZE};
use crate::pagination::Pagination;
use crate::render::{self, Action, CommentListView, PostListView};
use crate::submit::{Composer, SubmitError, SubmitKind, SubmitStatus};

/// Minimum gap between two likes of the same comment.
pub const LIKE_COOLDOWN: Duration = Duration::from_millis(500);

const LOCAL_LIKE_HINT: &str = "后端点赞API尚未实现，此操作仅在前端生效";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorPanel {
    pub message: String,
    pub timed_out: bool,
    pub retry: Action,
}

impl ErrorPanel {
    fn new(prefix: &str, error: &FetchError, retry: Action) -> Self {
        Self {
            message: format!("{prefix}: {error}"),
            timed_out: error.is_timeout(),
            retry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostListState {
    Loading,
    Loaded(PostListView),
    Failed(ErrorPanel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentState {
    Idle,
    Loading,
    Loaded(CommentListView),
    Failed(ErrorPanel),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentSection {
    pub visible: bool,
    pub state: CommentState,
    pub composer: Composer,
}

impl CommentSection {
    fn new() -> Self {
        Self {
            visible: false,
            state: CommentState::Idle,
            composer: Composer::new(SubmitKind::Comment),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    /// Must be acknowledged before the user carries on.
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn info<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    fn error<S: Into<String>>(message: S) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

struct PendingPosts {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
    page: u32,
}

enum FeedResponse {
    Posts {
        request_id: u64,
        page: u32,
        result: Result<PostPage, FetchError>,
    },
    PostCreated {
        request_id: u64,
        result: Result<Post, FetchError>,
    },
    CommentCreated {
        request_id: u64,
        post_id: PostId,
        result: Result<Comment, FetchError>,
    },
}

pub struct Feed {
    feed_service: Arc<dyn FeedService>,
    comment_service: Arc<dyn CommentService>,
    coordinator: RequestCoordinator,
    pagination: Pagination,
    likes: LikeStore,
    like_cooldown: HashMap<CommentId, Instant>,
    posts: PostListState,
    pending_posts: Option<PendingPosts>,
    post_composer: Composer,
    sections: HashMap<PostId, CommentSection>,
    notices: VecDeque<Notice>,
    next_request_id: u64,
    response_tx: Sender<FeedResponse>,
    response_rx: Receiver<FeedResponse>,
}

impl Feed {
    pub fn new(
        feed_service: Arc<dyn FeedService>,
        comment_service: Arc<dyn CommentService>,
        likes: LikeStore,
    ) -> Self {
        let coordinator = RequestCoordinator::new(comment_service.clone());
        Self::with_coordinator(feed_service, comment_service, coordinator, likes)
    }

    pub(crate) fn with_coordinator(
        feed_service: Arc<dyn FeedService>,
        comment_service: Arc<dyn CommentService>,
        coordinator: RequestCoordinator,
        likes: LikeStore,
    ) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            feed_service,
            comment_service,
            coordinator,
            pagination: Pagination::new(),
            likes,
            like_cooldown: HashMap::new(),
            posts: PostListState::Loading,
            pending_posts: None,
            post_composer: Composer::new(SubmitKind::Post),
            sections: HashMap::new(),
            notices: VecDeque::new(),
            next_request_id: 1,
            response_tx,
            response_rx,
        }
    }

    pub fn posts(&self) -> &PostListState {
        &self.posts
    }

    pub fn pagination(&self) -> &Pagination {
        &self.pagination
    }

    pub fn section(&self, post_id: &PostId) -> Option<&CommentSection> {
        self.sections.get(post_id)
    }

    pub fn post_composer(&self) -> &Composer {
        &self.post_composer
    }

    pub fn post_composer_mut(&mut self) -> &mut Composer {
        &mut self.post_composer
    }

    pub fn comment_composer_mut(&mut self, post_id: &PostId) -> &mut Composer {
        &mut self
            .sections
            .entry(post_id.clone())
            .or_insert_with(CommentSection::new)
            .composer
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn dismiss_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    /// "N 条评论 · 刚刚更新" for a post whose thread is cached.
    pub fn comment_status(&self, post_id: &PostId) -> Option<String> {
        self.coordinator
            .cache()
            .get(post_id)
            .map(|entry| render::comment_status_line(entry.thread.total, entry.age()))
    }

    pub fn is_busy(&self) -> bool {
        self.pending_posts.is_some()
            || self.coordinator.has_pending()
            || self.post_composer.control.is_submitting()
            || self
                .sections
                .values()
                .any(|section| section.composer.control.is_submitting())
    }

    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::ToggleComments(post_id) => self.toggle_comments(&post_id),
            Action::ToggleExpand(post_id) => self.toggle_expand(&post_id),
            Action::RefreshComments(post_id) | Action::RetryComments(post_id) => {
                self.load_comments(&post_id, true);
            }
            Action::SubmitComment(post_id) => {
                let _ = self.submit_comment(&post_id);
            }
            Action::LikeComment {
                post_id,
                comment_id,
            } => self.like_comment(&post_id, &comment_id),
            Action::GoToPage(page) => self.go_to_page(page),
            Action::SubmitPost => {
                let _ = self.submit_post();
            }
            Action::ReloadPosts => self.reload_posts(),
        }
    }

    pub fn go_to_page(&mut self, page: u32) {
        let page = self.pagination.go_to(page);
        self.load_posts(page);
    }

    pub fn reload_posts(&mut self) {
        self.load_posts(self.pagination.current());
    }

    fn load_posts(&mut self, page: u32) {
        if let Some(previous) = self.pending_posts.take() {
            previous.cancel_flag.store(true, Ordering::SeqCst);
        }
        let request_id = self.next_request_id();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.pending_posts = Some(PendingPosts {
            request_id,
            cancel_flag: cancel_flag.clone(),
            page,
        });
        self.posts = PostListState::Loading;
        tracing::debug!(page, request_id, "loading posts");

        let tx = self.response_tx.clone();
        let service = self.feed_service.clone();
        thread::spawn(move || {
            let result = service.load_page(page, PAGE_SIZE);
            if cancel_flag.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(FeedResponse::Posts {
                request_id,
                page,
                result,
            });
        });
    }

    pub fn toggle_comments(&mut self, post_id: &PostId) {
        let section = self
            .sections
            .entry(post_id.clone())
            .or_insert_with(CommentSection::new);
        section.visible = !section.visible;
        if section.visible {
            self.load_comments(post_id, false);
        }
    }

    pub fn toggle_expand(&mut self, post_id: &PostId) {
        if let PostListState::Loaded(view) = &mut self.posts {
            if let Some(card) = view.card_mut(post_id) {
                card.toggle_expanded();
            }
        }
    }

    pub fn load_comments(&mut self, post_id: &PostId, force_refresh: bool) {
        let outcome = self.coordinator.load_comments(post_id, force_refresh);
        match outcome {
            LoadOutcome::Cached(thread) => self.show_thread(post_id, &thread),
            LoadOutcome::Started { .. } | LoadOutcome::Joined { .. } | LoadOutcome::Queued { .. } => {
                self.sections
                    .entry(post_id.clone())
                    .or_insert_with(CommentSection::new)
                    .state = CommentState::Loading;
            }
        }
    }

    pub fn submit_post(&mut self) -> Result<SubmitStatus, SubmitError> {
        if self.post_composer.control.is_submitting() {
            return Ok(SubmitStatus::Ignored);
        }
        let content = match self.post_composer.content() {
            Ok(content) => content,
            Err(err) => {
                self.notices.push_back(Notice::info(err.to_string()));
                return Err(err);
            }
        };
        let request_id = self.next_request_id();
        self.post_composer.control.begin(request_id);
        tracing::info!(request_id, chars = content.chars().count(), "submitting post");

        let tx = self.response_tx.clone();
        let service = self.feed_service.clone();
        thread::spawn(move || {
            let result = service.create_post(&content);
            let _ = tx.send(FeedResponse::PostCreated { request_id, result });
        });
        Ok(SubmitStatus::Started { request_id })
    }

    pub fn submit_comment(&mut self, post_id: &PostId) -> Result<SubmitStatus, SubmitError> {
        let request_id = self.next_request_id();
        let section = self
            .sections
            .entry(post_id.clone())
            .or_insert_with(CommentSection::new);
        if section.composer.control.is_submitting() {
            return Ok(SubmitStatus::Ignored);
        }
        let content = match section.composer.content() {
            Ok(content) => content,
            Err(err) => {
                self.notices.push_back(Notice::info(err.to_string()));
                return Err(err);
            }
        };
        section.composer.control.begin(request_id);
        tracing::info!(post_id = %post_id, request_id, "submitting comment");

        let tx = self.response_tx.clone();
        let service = self.comment_service.clone();
        let post_id = post_id.clone();
        thread::spawn(move || {
            let result = service.create_comment(&post_id, &content);
            let _ = tx.send(FeedResponse::CommentCreated {
                request_id,
                post_id,
                result,
            });
        });
        Ok(SubmitStatus::Started { request_id })
    }

    pub fn like_comment(&mut self, post_id: &PostId, comment_id: &CommentId) {
        let now = Instant::now();
        if let Some(last) = self.like_cooldown.get(comment_id) {
            if now.duration_since(*last) < LIKE_COOLDOWN {
                return;
            }
        }
        self.like_cooldown.insert(comment_id.clone(), now);

        let seed = self
            .coordinator
            .cache()
            .get(post_id)
            .and_then(|entry| {
                entry
                    .thread
                    .comments
                    .iter()
                    .find(|comment| &comment.id == comment_id)
            })
            .and_then(|comment| comment.likes);

        match self.likes.like(comment_id, seed) {
            Ok(count) => {
                if let Some(CommentSection {
                    state: CommentState::Loaded(view),
                    ..
                }) = self.sections.get_mut(post_id)
                {
                    view.patch_like(comment_id, count);
                }
                if count == 1 {
                    self.notices.push_back(Notice::info(LOCAL_LIKE_HINT));
                }
            }
            Err(err) => {
                tracing::warn!(comment_id = %comment_id, error = %err, "failed to store like");
                self.notices.push_back(Notice::info(format!("点赞失败: {err}")));
            }
        }
    }

    /// Applies finished work. Returns true when anything visible changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        while let Ok(response) = self.response_rx.try_recv() {
            self.handle_response(response);
            changed = true;
        }
        for event in self.coordinator.poll() {
            self.apply_comments_event(event);
            changed = true;
        }
        changed
    }

    fn handle_response(&mut self, response: FeedResponse) {
        match response {
            FeedResponse::Posts {
                request_id,
                page,
                result,
            } => {
                let Some(pending) = &self.pending_posts else {
                    return;
                };
                if pending.request_id != request_id || pending.cancel_flag.load(Ordering::SeqCst) {
                    tracing::debug!(request_id, "dropping stale post list response");
                    return;
                }
                self.pending_posts = None;
                match result {
                    Ok(batch) => self.apply_post_page(batch),
                    Err(err) => {
                        tracing::warn!(page, error = %err, "failed to load posts");
                        self.posts = PostListState::Failed(ErrorPanel::new(
                            "加载帖子失败",
                            &err,
                            Action::ReloadPosts,
                        ));
                    }
                }
            }
            FeedResponse::PostCreated { request_id, result } => {
                if !self.post_composer.control.finish(request_id) {
                    return;
                }
                match result {
                    Ok(post) => {
                        tracing::info!(post_id = %post.id, "post created");
                        self.post_composer.clear();
                        self.notices.push_back(Notice::info("发布成功"));
                        self.pagination.reset();
                        self.load_posts(1);
                    }
                    Err(source) => {
                        tracing::warn!(error = %source, "post submission failed");
                        let err = SubmitError::Request {
                            kind: SubmitKind::Post,
                            source,
                        };
                        self.notices.push_back(Notice::error(err.to_string()));
                    }
                }
            }
            FeedResponse::CommentCreated {
                request_id,
                post_id,
                result,
            } => {
                if let Some(section) = self.sections.get_mut(&post_id) {
                    if !section.composer.control.finish(request_id) {
                        return;
                    }
                }
                match result {
                    Ok(comment) => {
                        tracing::info!(post_id = %post_id, comment_id = %comment.id, "comment created");
                        self.coordinator.invalidate(&post_id);
                        self.bump_comment_count(&post_id);
                        if self.is_off_page(&post_id) {
                            // The page changed while the comment was sent.
                            self.sections.remove(&post_id);
                        } else {
                            if let Some(section) = self.sections.get_mut(&post_id) {
                                section.composer.clear();
                            }
                            self.load_comments(&post_id, true);
                        }
                    }
                    Err(source) => {
                        tracing::warn!(post_id = %post_id, error = %source, "comment submission failed");
                        let err = SubmitError::Request {
                            kind: SubmitKind::Comment,
                            source,
                        };
                        self.notices.push_back(Notice::error(err.to_string()));
                    }
                }
            }
        }
    }

    fn apply_post_page(&mut self, batch: PostPage) {
        self.pagination
            .update(batch.page, batch.total, batch.page_size);
        let view = render::render_post_list(&batch, Utc::now());
        let on_page: HashSet<&PostId> = batch.posts.iter().map(|post| &post.id).collect();
        self.sections.retain(|post_id, section| {
            on_page.contains(post_id) || section.composer.control.is_submitting()
        });
        tracing::debug!(
            page = batch.page,
            posts = batch.posts.len(),
            total = batch.total,
            "posts loaded"
        );
        self.posts = PostListState::Loaded(view);
    }

    fn apply_comments_event(&mut self, event: CommentsEvent) {
        match event {
            CommentsEvent::Loaded { post_id, thread } => {
                if let PostListState::Loaded(view) = &mut self.posts {
                    let count = u32::try_from(thread.total).unwrap_or(u32::MAX);
                    view.patch_comment_count(&post_id, count);
                }
                self.show_thread(&post_id, &thread);
            }
            CommentsEvent::Failed { post_id, error } => {
                let Some(section) = self.sections.get_mut(&post_id) else {
                    return;
                };
                section.state = CommentState::Failed(ErrorPanel::new(
                    "加载评论失败",
                    &error,
                    Action::RetryComments(post_id),
                ));
            }
        }
    }

    fn show_thread(&mut self, post_id: &PostId, thread: &CommentThread) {
        let Some(section) = self.sections.get_mut(post_id) else {
            return;
        };
        let likes = match self
            .likes
            .counts(thread.comments.iter().map(|comment| &comment.id))
        {
            Ok(likes) => likes,
            Err(err) => {
                tracing::warn!(post_id = %post_id, error = %err, "failed to read like counts");
                HashMap::new()
            }
        };
        let view = render::render_comment_list(post_id, thread, &likes, Utc::now());
        section.state = CommentState::Loaded(view);
    }

    fn is_off_page(&self, post_id: &PostId) -> bool {
        match &self.posts {
            PostListState::Loaded(view) => view.card(post_id).is_none(),
            _ => false,
        }
    }

    fn bump_comment_count(&mut self, post_id: &PostId) {
        if let PostListState::Loaded(view) = &mut self.posts {
            if let Some(card) = view.card(post_id) {
                let count = card.comment_toggle.count.saturating_add(1);
                view.patch_comment_count(post_id, count);
            }
        }
    }

    fn next_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        id
    }
}
