use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::USER_AGENT;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::model::{Comment, CommentId, CommentThread, Post, PostId, PostPage, PAGE_SIZE};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000/api/";

/// Upper bound for any single request; the coordinator enforces the same limit.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("请求超时")]
    Timeout,
    #[error("网络错误: {0}")]
    Network(String),
    #[error("服务器错误 ({status}){}", server_suffix(.message))]
    Server {
        status: u16,
        message: Option<String>,
    },
    #[error("数据格式错误: {0}")]
    Malformed(String),
}

fn server_suffix(message: &Option<String>) -> String {
    match message.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => format!(": {text}"),
        _ => String::new(),
    }
}

impl FetchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

#[derive(Serialize)]
struct CreateBody<'a> {
    content: &'a str,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("treehole client user agent required");
        }

        let base = config
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = parse_base_url(&base)?;

        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .context("build treehole HTTP client")?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn posts(&self, page: u32, per_page: u32) -> Result<PostPage, FetchError> {
        let mut url = self.endpoint("posts")?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("per_page", &per_page.to_string());
        tracing::debug!(%url, "fetch posts");

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        let body = read_json(response)?;
        parse_post_page(body, page, per_page)
    }

    pub fn comments(&self, post_id: &PostId) -> Result<CommentThread, FetchError> {
        let url = self.comments_url(post_id)?;
        tracing::debug!(%url, "fetch comments");

        let response = self
            .http
            .get(url)
            .header(USER_AGENT, &self.user_agent)
            .send()?;
        let body = read_json(response)?;
        parse_comment_thread(body, post_id)
    }

    pub fn create_post(&self, content: &str) -> Result<Post, FetchError> {
        let url = self.endpoint("posts")?;
        let response = self
            .http
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .json(&CreateBody { content })
            .send()?;
        let body = read_json(response)?;
        parse_post(&body).ok_or_else(|| FetchError::Malformed("created post has no id".into()))
    }

    pub fn create_comment(&self, post_id: &PostId, content: &str) -> Result<Comment, FetchError> {
        let url = self.comments_url(post_id)?;
        let response = self
            .http
            .post(url)
            .header(USER_AGENT, &self.user_agent)
            .json(&CreateBody { content })
            .send()?;
        let body = read_json(response)?;
        parse_comment(&body, post_id)
            .ok_or_else(|| FetchError::Malformed("created comment has no id".into()))
    }

    /// Post ids are opaque, so they go in as a single escaped path segment.
    fn comments_url(&self, post_id: &PostId) -> Result<Url, FetchError> {
        let id = post_id.as_str();
        if id.is_empty() || id == "." || id == ".." {
            return Err(FetchError::Malformed(format!("invalid post id {id:?}")));
        }
        let mut url = self.endpoint("posts")?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed("base url cannot hold a path".into()))?
            .push(id)
            .push("comments");
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, FetchError> {
        self.base_url
            .join(path)
            .map_err(|err| FetchError::Malformed(format!("invalid endpoint {path}: {err}")))
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    // Url::join drops the last segment unless the base ends with a slash.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&normalized).with_context(|| format!("parse base url {raw:?}"))
}

fn read_json(response: Response) -> Result<Value, FetchError> {
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .ok()
            .and_then(|text| error_message(&text));
        tracing::warn!(status = status.as_u16(), ?message, "request failed");
        return Err(FetchError::Server {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json::<Value>()
        .map_err(|err| FetchError::Malformed(err.to_string()))
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub(crate) fn parse_post_page(
    body: Value,
    requested_page: u32,
    per_page: u32,
) -> Result<PostPage, FetchError> {
    let items = body
        .get("posts")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("response has no posts array".into()))?;

    let mut posts = Vec::with_capacity(items.len());
    for item in items {
        match parse_post(item) {
            Some(post) => posts.push(post),
            None => tracing::warn!("skipping post without id"),
        }
    }

    let page = body
        .get("page")
        .and_then(Value::as_u64)
        .map(|page| page.clamp(1, u64::from(u32::MAX)) as u32)
        .unwrap_or(requested_page.max(1));
    // Page count follows the size we asked for, whatever the server echoes.
    let page_size = if per_page == 0 { PAGE_SIZE } else { per_page };
    let total = body
        .get("total")
        .and_then(Value::as_u64)
        .unwrap_or(posts.len() as u64);

    Ok(PostPage {
        posts,
        page,
        total,
        page_size,
    })
}

pub(crate) fn parse_comment_thread(
    body: Value,
    post_id: &PostId,
) -> Result<CommentThread, FetchError> {
    let items = body
        .get("comments")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Malformed("response has no comments array".into()))?;

    let mut comments = Vec::with_capacity(items.len());
    for item in items {
        match parse_comment(item, post_id) {
            Some(comment) => comments.push(comment),
            None => tracing::warn!(post_id = %post_id, "skipping comment without id"),
        }
    }

    let total = body
        .get("total")
        .and_then(Value::as_u64)
        .unwrap_or(comments.len() as u64);

    Ok(CommentThread { comments, total })
}

fn parse_post(item: &Value) -> Option<Post> {
    let id = id_string(item.get("id")?)?;
    Some(Post {
        id: PostId::new(id),
        content: item
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: item.get("created_at").and_then(parse_timestamp),
        comment_count: item
            .get("comments_count")
            .and_then(Value::as_i64)
            .map(|count| count.clamp(0, i64::from(u32::MAX)) as u32)
            .unwrap_or(0),
    })
}

fn parse_comment(item: &Value, post_id: &PostId) -> Option<Comment> {
    let id = id_string(item.get("id")?)?;
    let parent = item
        .get("post_id")
        .and_then(id_string)
        .map(PostId::new)
        .unwrap_or_else(|| post_id.clone());
    Some(Comment {
        id: CommentId::new(id),
        post_id: parent,
        content: item
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        created_at: item.get("created_at").and_then(parse_timestamp),
        likes: item.get("likes").and_then(Value::as_i64),
    })
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_post_page() {
        let body = json!({
            "posts": [{"id": "p1", "content": "hello", "created_at": "2024-01-01T00:00:00Z", "comments_count": 0}],
            "page": 1,
            "total": 1,
            "page_size": 10
        });
        let page = parse_post_page(body, 1, PAGE_SIZE).unwrap();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].id, PostId::new("p1"));
        assert_eq!(page.posts[0].content, "hello");
        assert_eq!(page.posts[0].comment_count, 0);
        assert!(page.posts[0].created_at.is_some());
        assert_eq!(page.total_pages(), 1);
    }

    #[test]
    fn skips_items_without_id() {
        let body = json!({
            "posts": [
                {"content": "orphan"},
                {"id": 42, "content": "numbered", "comments_count": -3},
                {"id": "", "content": "blank id"}
            ],
            "page": 2,
            "total": 13,
            "page_size": 10
        });
        let page = parse_post_page(body, 2, PAGE_SIZE).unwrap();
        assert_eq!(page.posts.len(), 1);
        assert_eq!(page.posts[0].id.as_str(), "42");
        assert_eq!(page.posts[0].comment_count, 0);
        assert_eq!(page.total_pages(), 2);
    }

    #[test]
    fn page_count_uses_requested_page_size() {
        let body = json!({
            "posts": [],
            "page": 1,
            "total": 25,
            "page_size": 50
        });
        let page = parse_post_page(body, 1, PAGE_SIZE).unwrap();
        assert_eq!(page.page_size, PAGE_SIZE);
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn missing_posts_array_is_malformed() {
        let err = parse_post_page(json!({"items": []}), 1, PAGE_SIZE).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[test]
    fn comment_thread_defaults_parent_and_total() {
        let post_id = PostId::new("p1");
        let body = json!({
            "comments": [
                {"id": "c1", "content": "first", "created_at": "2024-01-01T00:00:00.123456Z", "likes": 4},
                {"content": "no id"}
            ]
        });
        let thread = parse_comment_thread(body, &post_id).unwrap();
        assert_eq!(thread.total, 1);
        assert_eq!(thread.comments[0].post_id, post_id);
        assert_eq!(thread.comments[0].likes, Some(4));
        assert!(thread.comments[0].created_at.is_some());
    }

    #[test]
    fn unparseable_timestamp_becomes_none() {
        let post = parse_post(&json!({"id": "p", "created_at": "yesterday"})).unwrap();
        assert!(post.created_at.is_none());
    }

    #[test]
    fn error_message_reads_error_or_message_field() {
        assert_eq!(error_message(r#"{"error":"Post not found"}"#).as_deref(), Some("Post not found"));
        assert_eq!(error_message(r#"{"message":"nope"}"#).as_deref(), Some("nope"));
        assert_eq!(error_message("Post not found"), None);
    }

    #[test]
    fn server_error_display_includes_optional_message() {
        let bare = FetchError::Server { status: 500, message: None };
        assert_eq!(bare.to_string(), "服务器错误 (500)");
        let detailed = FetchError::Server {
            status: 404,
            message: Some("Post not found".into()),
        };
        assert_eq!(detailed.to_string(), "服务器错误 (404): Post not found");
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let client = Client::new(ClientConfig {
            base_url: Some("http://localhost:3000/api".into()),
            user_agent: "treehole-test".into(),
            http_client: None,
        })
        .unwrap();
        assert_eq!(
            client.endpoint("posts/p1/comments").unwrap().as_str(),
            "http://localhost:3000/api/posts/p1/comments"
        );
    }

    #[test]
    fn post_ids_stay_inside_one_path_segment() {
        let client = Client::new(ClientConfig {
            base_url: Some("http://h/api".into()),
            user_agent: "treehole-test".into(),
            http_client: None,
        })
        .unwrap();

        let url = client.comments_url(&PostId::new("a?b")).unwrap();
        assert_eq!(url.path(), "/api/posts/a%3Fb/comments");
        assert_eq!(url.query(), None);

        let url = client.comments_url(&PostId::new("a#b")).unwrap();
        assert_eq!(url.path(), "/api/posts/a%23b/comments");
        assert_eq!(url.fragment(), None);

        let url = client.comments_url(&PostId::new("../../admin")).unwrap();
        assert_eq!(url.path(), "/api/posts/..%2F..%2Fadmin/comments");

        let url = client.comments_url(&PostId::new("树洞 1")).unwrap();
        assert!(url.path().starts_with("/api/posts/"));
        assert!(url.path().ends_with("/comments"));
        assert_eq!(url.path_segments().unwrap().count(), 4);

        assert!(matches!(
            client.comments_url(&PostId::new("..")),
            Err(FetchError::Malformed(_))
        ));
    }

    #[test]
    fn empty_user_agent_is_rejected() {
        assert!(Client::new(ClientConfig::default()).is_err());
    }
}
