use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api;
use crate::config;
use crate::data::{self, CommentService, FeedService};
use crate::feed::Feed;
use crate::likes;
use crate::logging;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Serve an in-memory board instead of talking to the backend.
    pub offline: bool,
    /// Overrides `api.base_url` from the config file and environment.
    pub base_url: Option<String>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let mut cfg = config::load(config::LoadOptions::default()).context("load config")?;
    if let Some(base_url) = options.base_url.clone() {
        cfg.api.base_url = base_url;
    }

    let log_path = logging::init(&cfg.log).context("init logging")?;
    tracing::info!(
        version = crate::VERSION,
        offline = options.offline,
        base_url = %cfg.api.base_url,
        log = ?log_path,
        "starting treehole"
    );

    let (feed_service, comment_service, likes, source) = if options.offline {
        let board = Arc::new(data::MemoryBoard::with_welcome_posts());
        let feed_api: Arc<dyn FeedService> = board.clone();
        let comment_api: Arc<dyn CommentService> = board;
        let likes = likes::LikeStore::in_memory().context("open like store")?;
        (feed_api, comment_api, likes, "离线模式".to_string())
    } else {
        let client = api::Client::new(api::ClientConfig {
            base_url: Some(cfg.api.base_url.clone()),
            user_agent: cfg.api.user_agent.clone(),
            http_client: None,
        })
        .context("create api client")?;
        let source = client.base_url().to_string();
        let client = Arc::new(client);
        let feed_api: Arc<dyn FeedService> = Arc::new(data::HttpFeedService::new(client.clone()));
        let comment_api: Arc<dyn CommentService> =
            Arc::new(data::HttpCommentService::new(client));
        let likes = likes::LikeStore::open(likes::Options {
            path: cfg.storage.path.clone(),
        })
        .context("open like store")?;
        (feed_api, comment_api, likes, source)
    };

    let mut feed = Feed::new(feed_service, comment_service, likes);
    feed.reload_posts();

    let mut model = ui::Model::new(ui::Options {
        feed,
        source,
        config_path: friendly_path(config::default_path().as_ref()),
    });
    model.run()?;

    tracing::info!("treehole exiting");
    Ok(())
}

fn friendly_path(path: Option<&std::path::PathBuf>) -> String {
    if let Some(path) = path {
        if let Some(home) = dirs::home_dir() {
            if let Ok(stripped) = path.strip_prefix(&home) {
                let mut display = String::from("~");
                if !stripped.as_os_str().is_empty() {
                    display.push_str(&format!("/{}", stripped.display()));
                }
                return display;
            }
        }
        path.display().to_string()
    } else {
        "~/.config/treehole/config.yaml".to_string()
    }
}
