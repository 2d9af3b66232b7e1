//! Download worker
//!
//! Single long-lived task per session. Drains the request channel, fetches
//! each track into the session scratch directory and hands it to the play
//! queue. Resolution failures are reported and skipped; they never stop the
//! worker.

use crate::error::Error;
use crate::output::Notice;
use crate::playback::state::SessionShared;
use crate::track::TrackRequest;
use jukebot_common::events::SessionEvent;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct DownloadWorker {
    shared: Arc<SessionShared>,
    cancel: CancellationToken,
}

impl DownloadWorker {
    pub fn new(shared: Arc<SessionShared>, cancel: CancellationToken) -> Self {
        Self { shared, cancel }
    }

    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Download worker started");
            self.worker_loop().await;
            info!("Download worker stopped");
        })
    }

    async fn worker_loop(&self) {
        while let Some(request) = self.shared.requests.recv(&self.cancel).await {
            if self.cancel.is_cancelled() {
                break;
            }
            if !self.shared.queue.contains(request.id).await {
                debug!(id = %request.id, "Skipping request for dropped entry");
                continue;
            }
            self.process(request).await;
            if self.cancel.is_cancelled() {
                break;
            }
        }
    }

    async fn process(&self, request: TrackRequest) {
        let shared = &self.shared;
        let token = self.cancel.child_token();
        shared.in_flight.begin(request.id, token.clone()).await;

        let result = shared
            .resolver
            .fetch(request.id, &request.reference, &shared.scratch, token)
            .await;
        shared.in_flight.finish().await;

        match result {
            Ok(track) => {
                if self.cancel.is_cancelled() {
                    track.discard();
                    return;
                }
                let id = track.id();
                let title = track.title().to_string();
                match shared.queue.push_ready(track).await {
                    Ok(()) => {
                        shared.events.emit_lossy(SessionEvent::TrackReady {
                            track_id: id,
                            title,
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    Err(rejected) => {
                        debug!(%id, "Queue rejected downloaded track, discarding");
                        rejected.discard();
                    }
                }
            }
            Err(Error::Cancelled) => {
                debug!(id = %request.id, "Download cancelled");
                // An entry left behind would hold the head of the queue forever
                shared.queue.discard_upcoming(request.id).await.discard();
            }
            Err(e) => {
                warn!(id = %request.id, reference = %request.reference, "Download failed: {}", e);
                shared.queue.discard_upcoming(request.id).await.discard();
                if self.cancel.is_cancelled() {
                    return;
                }
                let message = match &e {
                    Error::Resolve { .. } => e.to_string(),
                    _ => format!("Error downloading {}: {}", request.reference, e),
                };
                shared.sink.send(Notice::error(message.clone())).await;
                shared.events.emit_lossy(SessionEvent::DownloadFailed {
                    track_id: request.id,
                    reference: request.reference,
                    message,
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }
}
