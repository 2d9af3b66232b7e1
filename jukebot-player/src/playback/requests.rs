//! Download request channel
//!
//! A lock-guarded deque with wake-up notification. Unlike an mpsc channel it
//! supports front insertion for play-next and removal of specific requests.

use crate::track::{RequestPriority, TrackId, TrackRequest};
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<TrackRequest>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct RequestQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a block of requests. `PlayNext` puts the block ahead of
    /// everything pending, keeping its internal order. Returns false when
    /// closed.
    pub async fn push_all(&self, requests: Vec<TrackRequest>, priority: RequestPriority) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return false;
        }
        match priority {
            RequestPriority::Append => inner.pending.extend(requests),
            RequestPriority::PlayNext => {
                for request in requests.into_iter().rev() {
                    inner.pending.push_front(request);
                }
            }
        }
        drop(inner);
        self.notify.notify_waiters();
        true
    }

    /// Wait for the next request. `None` once closed or cancelled.
    pub async fn recv(&self, cancel: &CancellationToken) -> Option<TrackRequest> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if inner.closed {
                    return None;
                }
                if let Some(request) = inner.pending.pop_front() {
                    return Some(request);
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Remove pending requests for the given tracks; returns how many
    pub async fn remove(&self, ids: &[TrackId]) -> usize {
        let mut inner = self.inner.lock().await;
        let before = inner.pending.len();
        inner.pending.retain(|r| !ids.contains(&r.id));
        before - inner.pending.len()
    }

    /// Drop everything pending; returns how many
    pub async fn drain(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let count = inner.pending.len();
        inner.pending.clear();
        count
    }

    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.pending.clear();
        drop(inner);
        self.notify.notify_waiters();
    }

    pub async fn reopen(&self) {
        self.inner.lock().await.closed = false;
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
