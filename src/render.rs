//! Pure view model for the feed. Nothing here touches the network or the cache;
//! every interactive fragment carries the [`Action`] it triggers.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::markup;
use crate::model::{CommentId, CommentThread, PostId, PostPage};

/// Posts whose raw content exceeds this many characters start collapsed.
pub const COLLAPSE_THRESHOLD: usize = 200;
pub const EMPTY_POSTS_MESSAGE: &str = "还没有帖子，来发布第一个吧！";
pub const EMPTY_COMMENTS_MESSAGE: &str = "暂无评论";
pub const UNKNOWN_TIME: &str = "未知时间";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ToggleComments(PostId),
    ToggleExpand(PostId),
    RefreshComments(PostId),
    RetryComments(PostId),
    SubmitComment(PostId),
    LikeComment { post_id: PostId, comment_id: CommentId },
    GoToPage(u32),
    SubmitPost,
    ReloadPosts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeLabel {
    pub relative: String,
    pub exact: String,
}

impl TimeLabel {
    pub fn new(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self {
            relative: relative_time(at, now),
            exact: at.map(exact_time).unwrap_or_else(|| UNKNOWN_TIME.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collapsible {
    pub expanded: bool,
    pub preview: String,
    pub toggle: Action,
}

impl Collapsible {
    pub fn label(&self) -> &'static str {
        if self.expanded {
            "收起"
        } else {
            "展开"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentToggle {
    pub count: u32,
    pub action: Action,
}

impl CommentToggle {
    pub fn label(&self) -> String {
        if self.count == 0 {
            "评论".to_string()
        } else {
            format!("评论 {}", self.count)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostCard {
    pub post_id: PostId,
    pub content: String,
    pub collapsible: Option<Collapsible>,
    pub time: TimeLabel,
    pub comment_toggle: CommentToggle,
}

impl PostCard {
    /// Text to draw given the card's expand state.
    pub fn visible_text(&self) -> &str {
        match &self.collapsible {
            Some(collapsible) if !collapsible.expanded => &collapsible.preview,
            _ => &self.content,
        }
    }

    pub fn toggle_expanded(&mut self) {
        if let Some(collapsible) = self.collapsible.as_mut() {
            collapsible.expanded = !collapsible.expanded;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PostListView {
    pub cards: Vec<PostCard>,
    pub empty_message: Option<&'static str>,
}

impl PostListView {
    pub fn card(&self, post_id: &PostId) -> Option<&PostCard> {
        self.cards.iter().find(|card| &card.post_id == post_id)
    }

    pub fn card_mut(&mut self, post_id: &PostId) -> Option<&mut PostCard> {
        self.cards.iter_mut().find(|card| &card.post_id == post_id)
    }

    /// Updates one badge in place. Returns false when the card is gone.
    pub fn patch_comment_count(&mut self, post_id: &PostId, count: u32) -> bool {
        match self.card_mut(post_id) {
            Some(card) => {
                card.comment_toggle.count = count;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeControl {
    pub count: i64,
    pub liked: bool,
    pub action: Action,
}

impl LikeControl {
    pub fn label(&self) -> String {
        format!("👍 {}", self.count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRow {
    pub comment_id: CommentId,
    pub content: String,
    pub time: TimeLabel,
    pub like: LikeControl,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommentListView {
    pub rows: Vec<CommentRow>,
    pub empty_message: Option<&'static str>,
}

impl CommentListView {
    pub fn patch_like(&mut self, comment_id: &CommentId, count: i64) -> bool {
        match self.rows.iter_mut().find(|row| &row.comment_id == comment_id) {
            Some(row) => {
                row.like.count = count;
                row.like.liked = true;
                true
            }
            None => false,
        }
    }
}

pub fn render_post_list(page: &PostPage, now: DateTime<Utc>) -> PostListView {
    if page.posts.is_empty() {
        return PostListView {
            cards: Vec::new(),
            empty_message: Some(EMPTY_POSTS_MESSAGE),
        };
    }

    let cards = page
        .posts
        .iter()
        .map(|post| {
            let content = markup::to_plain_text(&post.content);
            let collapsible = (post.content.chars().count() > COLLAPSE_THRESHOLD).then(|| {
                Collapsible {
                    expanded: false,
                    preview: markup::preview(&content, COLLAPSE_THRESHOLD),
                    toggle: Action::ToggleExpand(post.id.clone()),
                }
            });
            PostCard {
                post_id: post.id.clone(),
                content,
                collapsible,
                time: TimeLabel::new(post.created_at, now),
                comment_toggle: CommentToggle {
                    count: post.comment_count,
                    action: Action::ToggleComments(post.id.clone()),
                },
            }
        })
        .collect();

    PostListView {
        cards,
        empty_message: None,
    }
}

/// `likes` holds locally stored counts; they win over the server seed.
pub fn render_comment_list(
    post_id: &PostId,
    thread: &CommentThread,
    likes: &HashMap<CommentId, i64>,
    now: DateTime<Utc>,
) -> CommentListView {
    if thread.is_empty() {
        return CommentListView {
            rows: Vec::new(),
            empty_message: Some(EMPTY_COMMENTS_MESSAGE),
        };
    }

    let rows = thread
        .comments
        .iter()
        .map(|comment| {
            let stored = likes.get(&comment.id).copied();
            CommentRow {
                comment_id: comment.id.clone(),
                content: markup::to_plain_text(&comment.content),
                time: TimeLabel::new(comment.created_at, now),
                like: LikeControl {
                    count: stored.or(comment.likes).unwrap_or(0),
                    liked: stored.is_some(),
                    action: Action::LikeComment {
                        post_id: post_id.clone(),
                        comment_id: comment.id.clone(),
                    },
                },
            }
        })
        .collect();

    CommentListView {
        rows,
        empty_message: None,
    }
}

pub fn relative_time(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return UNKNOWN_TIME.to_string();
    };
    let secs = (now - at).num_seconds();
    match secs {
        s if s < 60 => "刚刚".to_string(),
        s if s < 3_600 => format!("{} 分钟前", s / 60),
        s if s < 86_400 => format!("{} 小时前", s / 3_600),
        s if s < 2_592_000 => format!("{} 天前", s / 86_400),
        _ => exact_time(at),
    }
}

pub fn exact_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Header for an open comment section, e.g. "3 条评论 · 2分钟前更新".
pub fn comment_status_line(total: u64, age: Duration) -> String {
    let minutes = age.as_secs() / 60;
    let freshness = if minutes < 1 {
        "刚刚更新".to_string()
    } else if minutes < 60 {
        format!("{minutes}分钟前更新")
    } else if minutes < 60 * 24 {
        format!("{}小时前更新", minutes / 60)
    } else {
        format!("{}天前更新", minutes / (60 * 24))
    };
    format!("{total} 条评论 · {freshness}")
}
