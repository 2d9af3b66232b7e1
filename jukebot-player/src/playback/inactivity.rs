//! Inactivity timer
//!
//! Armed when the queue runs dry; fires a callback after a fixed delay unless
//! cancelled first. The firing task clears its own slot before running the
//! callback, so a callback that cancels the timer never aborts itself.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

pub type FireFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

pub struct InactivityTimer {
    delay: Duration,
    on_fire: FireFn,
    slot: Mutex<Slot>,
}

impl InactivityTimer {
    pub fn new(delay: Duration, on_fire: FireFn) -> Arc<Self> {
        Arc::new(Self {
            delay,
            on_fire,
            slot: Mutex::new(Slot::default()),
        })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start the countdown; no-op when already armed
    pub async fn arm(self: &Arc<Self>) {
        let mut slot = self.slot.lock().await;
        if slot.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        slot.generation += 1;
        let generation = slot.generation;
        let timer = Arc::downgrade(self);
        let delay = self.delay;
        debug!(?delay, "Inactivity timer armed");

        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(timer) = timer.upgrade() else {
                return;
            };
            if !timer.claim(generation).await {
                return;
            }
            debug!("Inactivity timer fired");
            (timer.on_fire)().await;
        }));
    }

    /// Disarm; a countdown that already claimed its slot keeps running
    pub async fn cancel(&self) {
        let mut slot = self.slot.lock().await;
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
            debug!("Inactivity timer cancelled");
        }
    }

    pub async fn is_armed(&self) -> bool {
        self.slot
            .lock()
            .await
            .handle
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    async fn claim(&self, generation: u64) -> bool {
        let mut slot = self.slot.lock().await;
        if slot.generation != generation {
            return false;
        }
        slot.handle = None;
        true
    }
}
