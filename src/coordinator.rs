//! Decides, per post, between the comment cache and the network.
//!
//! At most one comment request per post is outstanding at a time. Callers that
//! arrive while a request is running join it; a forced refresh that arrives
//! while a request is running supersedes it, so the running result is not
//! cached and exactly one follow-up request is issued once it settles.
//!
//! A request that misses its deadline is reported as timed out, but its worker
//! still counts against the post until the blocking call returns. A retry in
//! that window waits for the worker to exit instead of starting a second call.

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::api::{FetchError, FETCH_TIMEOUT};
use crate::cache::CommentCache;
use crate::data::CommentService;
use crate::model::{CommentThread, PostId};

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Fresh cached thread; nothing was requested.
    Cached(CommentThread),
    Started { request_id: u64 },
    /// Attached to the request already running for this post.
    Joined { request_id: u64 },
    /// A refresh will follow the request already running for this post.
    Queued { request_id: u64 },
}

impl LoadOutcome {
    pub fn is_pending(&self) -> bool {
        !matches!(self, LoadOutcome::Cached(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommentsEvent {
    Loaded {
        post_id: PostId,
        thread: CommentThread,
    },
    Failed {
        post_id: PostId,
        error: FetchError,
    },
}

impl CommentsEvent {
    pub fn post_id(&self) -> &PostId {
        match self {
            CommentsEvent::Loaded { post_id, .. } | CommentsEvent::Failed { post_id, .. } => {
                post_id
            }
        }
    }
}

struct CommentsResponse {
    request_id: u64,
    post_id: PostId,
    result: Result<CommentThread, FetchError>,
}

struct InFlight {
    request_id: u64,
    cancel_flag: Arc<AtomicBool>,
    started_at: Instant,
    superseded: bool,
}

/// A timed-out request whose worker has not returned yet.
struct Abandoned {
    request_id: u64,
    retry_since: Option<Instant>,
}

pub struct RequestCoordinator {
    service: Arc<dyn CommentService>,
    cache: CommentCache,
    in_flight: HashMap<PostId, InFlight>,
    abandoned: HashMap<PostId, Abandoned>,
    next_request_id: u64,
    timeout: Duration,
    response_tx: Sender<CommentsResponse>,
    response_rx: Receiver<CommentsResponse>,
}

impl RequestCoordinator {
    pub fn new(service: Arc<dyn CommentService>) -> Self {
        let (response_tx, response_rx) = unbounded();
        Self {
            service,
            cache: CommentCache::new(),
            in_flight: HashMap::new(),
            abandoned: HashMap::new(),
            next_request_id: 1,
            timeout: FETCH_TIMEOUT,
            response_tx,
            response_rx,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[cfg(test)]
    pub(crate) fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn cache(&self) -> &CommentCache {
        &self.cache
    }

    #[cfg(test)]
    pub(crate) fn cache_mut(&mut self) -> &mut CommentCache {
        &mut self.cache
    }

    pub fn is_in_flight(&self, post_id: &PostId) -> bool {
        self.in_flight.contains_key(post_id) || self.abandoned.contains_key(post_id)
    }

    /// True while a caller is still waiting on a result.
    pub fn has_pending(&self) -> bool {
        !self.in_flight.is_empty()
            || self
                .abandoned
                .values()
                .any(|abandoned| abandoned.retry_since.is_some())
    }

    pub fn load_comments(&mut self, post_id: &PostId, force_refresh: bool) -> LoadOutcome {
        if let Some(flight) = self.in_flight.get_mut(post_id) {
            if force_refresh {
                flight.superseded = true;
                tracing::debug!(post_id = %post_id, request_id = flight.request_id, "refresh queued behind running request");
                return LoadOutcome::Queued {
                    request_id: flight.request_id,
                };
            }
            tracing::debug!(post_id = %post_id, request_id = flight.request_id, "joined running request");
            return LoadOutcome::Joined {
                request_id: flight.request_id,
            };
        }

        if !force_refresh {
            if let Some(entry) = self.cache.get_fresh(post_id) {
                tracing::debug!(post_id = %post_id, "comment cache hit");
                return LoadOutcome::Cached(entry.thread.clone());
            }
        }

        if let Some(abandoned) = self.abandoned.get_mut(post_id) {
            abandoned.retry_since.get_or_insert_with(Instant::now);
            tracing::debug!(post_id = %post_id, request_id = abandoned.request_id, "retry waiting for timed-out request");
            return LoadOutcome::Queued {
                request_id: abandoned.request_id,
            };
        }

        let request_id = self.spawn_fetch(post_id.clone());
        LoadOutcome::Started { request_id }
    }

    /// Drops the cached thread. A request already running is superseded so its
    /// result cannot repopulate the cache.
    pub fn invalidate(&mut self, post_id: &PostId) {
        self.cache.invalidate(post_id);
        if let Some(flight) = self.in_flight.get_mut(post_id) {
            flight.superseded = true;
        }
        tracing::debug!(post_id = %post_id, "comment cache invalidated");
    }

    /// Applies finished and overdue requests. Call from the owning thread.
    pub fn poll(&mut self) -> Vec<CommentsEvent> {
        let mut events = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            if let Some(event) = self.handle_response(response) {
                events.push(event);
            }
        }
        events.extend(self.expire_overdue());
        events
    }

    fn handle_response(&mut self, response: CommentsResponse) -> Option<CommentsEvent> {
        let CommentsResponse {
            request_id,
            post_id,
            result,
        } = response;

        if self
            .abandoned
            .get(&post_id)
            .is_some_and(|abandoned| abandoned.request_id == request_id)
        {
            let abandoned = self.abandoned.remove(&post_id)?;
            tracing::debug!(post_id = %post_id, request_id, "timed-out request returned");
            if abandoned.retry_since.is_some() {
                self.spawn_fetch(post_id);
            }
            return None;
        }

        let current = self.in_flight.get(&post_id)?;
        if current.request_id != request_id || current.cancel_flag.load(Ordering::SeqCst) {
            tracing::debug!(post_id = %post_id, request_id, "dropping stale comment response");
            return None;
        }
        let flight = self.in_flight.remove(&post_id)?;

        if flight.superseded {
            tracing::debug!(post_id = %post_id, request_id, "response superseded; refetching");
            self.spawn_fetch(post_id);
            return None;
        }

        match result {
            Ok(thread) => {
                tracing::info!(post_id = %post_id, total = thread.total, "comments loaded");
                self.cache.put(post_id.clone(), thread.clone());
                Some(CommentsEvent::Loaded { post_id, thread })
            }
            Err(error) => {
                tracing::warn!(post_id = %post_id, %error, "comments failed to load");
                Some(CommentsEvent::Failed { post_id, error })
            }
        }
    }

    fn expire_overdue(&mut self) -> Vec<CommentsEvent> {
        let timeout = self.timeout;
        let overdue: Vec<PostId> = self
            .in_flight
            .iter()
            .filter(|(_, flight)| flight.started_at.elapsed() >= timeout)
            .map(|(post_id, _)| post_id.clone())
            .collect();

        let mut events = Vec::new();
        for post_id in overdue {
            let Some(flight) = self.in_flight.remove(&post_id) else {
                continue;
            };
            flight.cancel_flag.store(true, Ordering::SeqCst);
            tracing::warn!(post_id = %post_id, request_id = flight.request_id, "comment request timed out");
            self.abandoned.insert(
                post_id.clone(),
                Abandoned {
                    request_id: flight.request_id,
                    retry_since: None,
                },
            );
            events.push(CommentsEvent::Failed {
                post_id,
                error: FetchError::Timeout,
            });
        }

        // Retries stuck behind a worker that never returns time out as well.
        for (post_id, abandoned) in self.abandoned.iter_mut() {
            if abandoned
                .retry_since
                .is_some_and(|since| since.elapsed() >= timeout)
            {
                abandoned.retry_since = None;
                tracing::warn!(post_id = %post_id, request_id = abandoned.request_id, "retry timed out waiting for previous request");
                events.push(CommentsEvent::Failed {
                    post_id: post_id.clone(),
                    error: FetchError::Timeout,
                });
            }
        }
        events
    }

    fn spawn_fetch(&mut self, post_id: PostId) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let cancel_flag = Arc::new(AtomicBool::new(false));
        self.in_flight.insert(
            post_id.clone(),
            InFlight {
                request_id,
                cancel_flag: cancel_flag.clone(),
                started_at: Instant::now(),
                superseded: false,
            },
        );
        tracing::debug!(post_id = %post_id, request_id, "requesting comments");

        let tx = self.response_tx.clone();
        let service = self.service.clone();
        thread::spawn(move || {
            let result = if cancel_flag.load(Ordering::SeqCst) {
                Err(FetchError::Timeout)
            } else {
                service.load_comments(&post_id)
            };
            // Cancelled workers still report back so the post is released.
            let _ = tx.send(CommentsResponse {
                request_id,
                post_id,
                result,
            });
        });
        request_id
    }
}
