//! Play queue shared by the download and playback workers
//!
//! Two sequences live behind one lock:
//! - `upcoming`: every not-yet-playing track in play order (display, skip-to)
//! - `ready`: downloaded tracks, always a subsequence of `upcoming`
//!
//! A track is popped only when it heads both sequences, so playback order
//! always equals upcoming order regardless of download completion order.

use crate::error::{Error, Result};
use crate::track::{RequestPriority, ResolvedTrack, TrackId, UpcomingEntry};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

/// Result of a non-blocking pop
#[derive(Debug)]
pub enum Pop {
    /// Head track, with the number of upcoming entries left behind it
    Ready {
        track: ResolvedTrack,
        remaining: usize,
    },
    /// Entries remain but the head is still downloading
    Pending,
    /// Nothing queued and nothing incoming
    Drained,
}

/// Entries dropped in one critical section, with their downloaded tracks
#[derive(Debug, Default)]
pub struct Removed {
    pub ids: Vec<TrackId>,
    pub tracks: Vec<ResolvedTrack>,
}

impl Removed {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: TrackId) -> bool {
        self.ids.contains(&id)
    }

    /// Delete every removed track's file
    pub fn discard(self) {
        for track in self.tracks {
            track.discard();
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    upcoming: VecDeque<UpcomingEntry>,
    ready: VecDeque<ResolvedTrack>,
    closed: bool,
}

impl Inner {
    fn position(&self, id: TrackId) -> Option<usize> {
        self.upcoming.iter().position(|e| e.id == id)
    }

    /// Remove the first `count` upcoming entries and their ready tracks
    fn drain_prefix(&mut self, count: usize) -> Removed {
        let count = count.min(self.upcoming.len());
        let ids: Vec<TrackId> = self.upcoming.drain(..count).map(|e| e.id).collect();
        let mut tracks = Vec::new();
        let mut kept = VecDeque::with_capacity(self.ready.len());
        for track in self.ready.drain(..) {
            if ids.contains(&track.id()) {
                tracks.push(track);
            } else {
                kept.push_back(track);
            }
        }
        self.ready = kept;
        Removed { ids, tracks }
    }

    /// Upcoming length >= ready length, every ready track has an upcoming
    /// entry, and ready order follows upcoming order.
    fn check_invariants(&self) {
        if cfg!(debug_assertions) {
            debug_assert!(self.upcoming.len() >= self.ready.len());
            let mut last = None;
            for track in &self.ready {
                let pos = self.position(track.id());
                debug_assert!(pos.is_some(), "ready track without upcoming entry");
                debug_assert!(pos > last, "ready order diverged");
                last = pos;
            }
        }
    }
}

/// Thread-safe ordered store of upcoming and ready tracks
#[derive(Debug, Default)]
pub struct PlayQueue {
    inner: Mutex<Inner>,
    changed: Notify,
    first_ready: Notify,
    first_ready_set: AtomicBool,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notified on every mutation; create the `Notified` before checking
    /// state to avoid missing a wake-up.
    pub fn changed(&self) -> &Notify {
        &self.changed
    }

    /// Resolves once any track has ever been made ready (since last reopen)
    pub async fn wait_first_ready(&self) {
        loop {
            let notified = self.first_ready.notified();
            if self.first_ready_set.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    pub fn is_first_ready(&self) -> bool {
        self.first_ready_set.load(Ordering::Acquire)
    }

    /// Add a block of entries; returns the 1-based position of the first one
    pub async fn push_upcoming(
        &self,
        entries: Vec<UpcomingEntry>,
        priority: RequestPriority,
    ) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(Error::Terminated);
        }
        let position = match priority {
            RequestPriority::Append => {
                let position = inner.upcoming.len() + 1;
                inner.upcoming.extend(entries);
                position
            }
            RequestPriority::PlayNext => {
                for entry in entries.into_iter().rev() {
                    inner.upcoming.push_front(entry);
                }
                1
            }
        };
        inner.check_invariants();
        drop(inner);
        self.changed.notify_waiters();
        Ok(position)
    }

    /// Hand a downloaded track to the queue.
    ///
    /// The track is handed back when the queue is closed or its entry was
    /// dropped meanwhile; the caller must discard it.
    pub async fn push_ready(
        &self,
        track: ResolvedTrack,
    ) -> std::result::Result<(), ResolvedTrack> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(track);
        }
        let Some(position) = inner.position(track.id()) else {
            return Err(track);
        };

        // Refresh the display title with the resolved one
        if let Some(entry) = inner.upcoming.get_mut(position) {
            entry.title = track.title().to_string();
        }

        let insert_at = inner
            .ready
            .iter()
            .position(|t| {
                inner
                    .upcoming
                    .iter()
                    .position(|e| e.id == t.id())
                    .is_some_and(|p| p > position)
            })
            .unwrap_or(inner.ready.len());
        debug!(id = %track.id(), insert_at, "Track ready");
        inner.ready.insert(insert_at, track);
        inner.check_invariants();
        drop(inner);

        if !self.first_ready_set.swap(true, Ordering::AcqRel) {
            self.first_ready.notify_waiters();
        }
        self.changed.notify_waiters();
        Ok(())
    }

    /// Pop the head track if it heads both sequences
    pub async fn pop_ready(&self) -> Pop {
        let mut inner = self.inner.lock().await;
        let Some(head) = inner.upcoming.front() else {
            return Pop::Drained;
        };
        let head_id = head.id;
        if inner.ready.front().map(|t| t.id()) != Some(head_id) {
            return Pop::Pending;
        }
        let Some(track) = inner.ready.pop_front() else {
            return Pop::Pending;
        };
        inner.upcoming.pop_front();
        let remaining = inner.upcoming.len();
        inner.check_invariants();
        drop(inner);
        self.changed.notify_waiters();
        Pop::Ready { track, remaining }
    }

    /// Copy of the upcoming entries in play order
    pub async fn peek_upcoming(&self) -> Vec<UpcomingEntry> {
        self.inner.lock().await.upcoming.iter().cloned().collect()
    }

    pub async fn upcoming_len(&self) -> usize {
        self.inner.lock().await.upcoming.len()
    }

    pub async fn ready_len(&self) -> usize {
        self.inner.lock().await.ready.len()
    }

    pub async fn contains(&self, id: TrackId) -> bool {
        self.inner.lock().await.position(id).is_some()
    }

    /// Drop the first `count` upcoming entries and their ready tracks
    pub async fn remove_upcoming_prefix(&self, count: usize) -> Removed {
        let mut inner = self.inner.lock().await;
        let removed = inner.drain_prefix(count);
        inner.check_invariants();
        drop(inner);
        self.changed.notify_waiters();
        removed
    }

    /// Validate a 1-based position and drop everything before it, atomically
    pub async fn skip_to(&self, position: usize) -> Result<Removed> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(Error::Terminated);
        }
        if position == 0 || position > inner.upcoming.len() {
            return Err(Error::InvalidPosition(position));
        }
        let removed = inner.drain_prefix(position - 1);
        inner.check_invariants();
        drop(inner);
        self.changed.notify_waiters();
        Ok(removed)
    }

    /// Drop the entry of a track whose download failed
    pub async fn discard_upcoming(&self, id: TrackId) -> Removed {
        let mut inner = self.inner.lock().await;
        let mut removed = Removed::default();
        if let Some(position) = inner.position(id) {
            inner.upcoming.remove(position);
            removed.ids.push(id);
            if let Some(ready_pos) = inner.ready.iter().position(|t| t.id() == id) {
                if let Some(track) = inner.ready.remove(ready_pos) {
                    removed.tracks.push(track);
                }
            }
        }
        inner.check_invariants();
        drop(inner);
        self.changed.notify_waiters();
        removed
    }

    /// Empty both sequences
    pub async fn clear(&self) -> Removed {
        let mut inner = self.inner.lock().await;
        let count = inner.upcoming.len();
        let removed = inner.drain_prefix(count);
        drop(inner);
        self.changed.notify_waiters();
        removed
    }

    /// Reject all further pushes and empty both sequences
    pub async fn close(&self) -> Removed {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        let count = inner.upcoming.len();
        let removed = inner.drain_prefix(count);
        drop(inner);
        self.changed.notify_waiters();
        removed
    }

    /// Accept pushes again and reset the first-ready signal
    pub async fn reopen(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = false;
        self.first_ready_set.store(false, Ordering::Release);
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}
