//! Interaction acknowledgement
//!
//! Every command or button press gets exactly one initial acknowledgement:
//! a deferral or a reply. Anything after that is a follow-up.

use crate::controls::actions::FormSpec;
use crate::error::{Error, Result};
use crate::output::Notice;
use crate::voice::VoiceContext;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

/// A response to the invoking user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Message { notice: Notice, ephemeral: bool },
    Form { form: FormSpec },
}

impl Reply {
    pub fn text(message: impl Into<String>, ephemeral: bool) -> Self {
        Reply::Message {
            notice: Notice::text(message),
            ephemeral,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Message {
            notice: Notice::error(message),
            ephemeral: true,
        }
    }
}

/// Transport that delivers replies back to the invoking user
#[async_trait]
pub trait Responder: Send + Sync {
    async fn defer(&self, ephemeral: bool) -> Result<()>;

    /// Initial response
    async fn respond(&self, reply: Reply) -> Result<()>;

    /// Response after a deferral or an earlier reply
    async fn follow_up(&self, reply: Reply) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Pending,
    Deferred,
    Replied,
}

/// One user interaction, guarding against double acknowledgement
pub struct Interaction<R: Responder> {
    context: VoiceContext,
    responder: R,
    ack: Mutex<Ack>,
}

impl<R: Responder> Interaction<R> {
    pub fn new(context: VoiceContext, responder: R) -> Self {
        Self {
            context,
            responder,
            ack: Mutex::new(Ack::Pending),
        }
    }

    pub fn context(&self) -> &VoiceContext {
        &self.context
    }

    pub fn responder(&self) -> &R {
        &self.responder
    }

    pub fn into_responder(self) -> R {
        self.responder
    }

    pub async fn is_acknowledged(&self) -> bool {
        *self.ack.lock().await != Ack::Pending
    }

    /// Defer the response; no-op once acknowledged
    pub async fn defer(&self, ephemeral: bool) -> Result<()> {
        let mut ack = self.ack.lock().await;
        if *ack != Ack::Pending {
            return Ok(());
        }
        self.responder.defer(ephemeral).await?;
        *ack = Ack::Deferred;
        Ok(())
    }

    /// First reply responds; later replies follow up
    pub async fn reply(&self, reply: Reply) -> Result<()> {
        let mut ack = self.ack.lock().await;
        match *ack {
            Ack::Pending => {
                self.responder.respond(reply).await?;
                *ack = Ack::Replied;
            }
            Ack::Deferred | Ack::Replied => {
                if matches!(reply, Reply::Form { .. }) {
                    return Err(Error::InvalidInput(
                        "A form must be the first response".to_string(),
                    ));
                }
                self.responder.follow_up(reply).await?;
                *ack = Ack::Replied;
            }
        }
        Ok(())
    }
}

/// What a [`RecordingResponder`] saw, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recorded {
    Deferred { ephemeral: bool },
    Response { reply: Reply },
    FollowUp { reply: Reply },
}

/// Responder that buffers everything for a synchronous transport (HTTP)
#[derive(Debug, Default)]
pub struct RecordingResponder {
    log: Mutex<Vec<Recorded>>,
}

impl RecordingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn take(&self) -> Vec<Recorded> {
        std::mem::take(&mut *self.log.lock().await)
    }
}

#[async_trait]
impl Responder for RecordingResponder {
    async fn defer(&self, ephemeral: bool) -> Result<()> {
        self.log.lock().await.push(Recorded::Deferred { ephemeral });
        Ok(())
    }

    async fn respond(&self, reply: Reply) -> Result<()> {
        self.log.lock().await.push(Recorded::Response { reply });
        Ok(())
    }

    async fn follow_up(&self, reply: Reply) -> Result<()> {
        self.log.lock().await.push(Recorded::FollowUp { reply });
        Ok(())
    }
}
