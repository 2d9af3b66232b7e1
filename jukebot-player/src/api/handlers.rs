//! HTTP request handlers
//!
//! Each command or control request runs through an [`Interaction`] backed by a
//! [`RecordingResponder`]; the recorded acknowledgements become the JSON body.

use super::{server::AppContext, ApiError};
use crate::controls::{
    self,
    actions::{ActionSpec, FormSpec, SKIP_TO_FORM},
    interaction::Recorded,
    Command, ControlAction, Interaction, RecordingResponder, CONTROL_PANEL,
};
use crate::playback::SessionSnapshot;
use crate::voice::VoiceContext;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Body of `POST /commands/play` and `POST /commands/play_next`
#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub reference: String,
    #[serde(flatten)]
    pub context: VoiceContext,
}

/// Body of `POST /controls/skip_to`
#[derive(Debug, Deserialize)]
pub struct SkipToRequest {
    /// Raw text typed into the form
    pub position: String,
    #[serde(flatten)]
    pub context: VoiceContext,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub replies: Vec<Recorded>,
}

#[derive(Debug, Serialize)]
pub struct ControlPanelResponse {
    pub actions: Vec<ActionSpec>,
    pub skip_to_form: FormSpec,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

fn context_for(user: String) -> VoiceContext {
    VoiceContext {
        user,
        channel: None,
    }
}

async fn command(
    ctx: &AppContext,
    context: VoiceContext,
    cmd: Command,
) -> ApiResult<InteractionResponse> {
    debug!(command = cmd.name(), user = %context.user, "HTTP command");
    let interaction = Interaction::new(context, RecordingResponder::new());
    controls::run_command(&ctx.session, &interaction, cmd).await?;
    finish(interaction).await
}

async fn finish(interaction: Interaction<RecordingResponder>) -> ApiResult<InteractionResponse> {
    let replies = interaction.into_responder().take().await;
    Ok(Json(InteractionResponse { replies }))
}

/// POST /commands/play
pub async fn play(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayRequest>,
) -> ApiResult<InteractionResponse> {
    let cmd = Command::Play {
        reference: req.reference,
    };
    command(&ctx, req.context, cmd).await
}

/// POST /commands/play_next
pub async fn play_next(
    State(ctx): State<AppContext>,
    Json(req): Json<PlayRequest>,
) -> ApiResult<InteractionResponse> {
    let cmd = Command::PlayNext {
        reference: req.reference,
    };
    command(&ctx, req.context, cmd).await
}

/// POST /commands/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Query(q): Query<UserQuery>,
) -> ApiResult<InteractionResponse> {
    command(&ctx, context_for(q.user), Command::Stop).await
}

/// POST /commands/skip
pub async fn skip(
    State(ctx): State<AppContext>,
    Query(q): Query<UserQuery>,
) -> ApiResult<InteractionResponse> {
    command(&ctx, context_for(q.user), Command::Skip).await
}

/// POST /commands/leave
pub async fn leave(
    State(ctx): State<AppContext>,
    Query(q): Query<UserQuery>,
) -> ApiResult<InteractionResponse> {
    command(&ctx, context_for(q.user), Command::Leave).await
}

/// POST /commands/clear_queue
pub async fn clear_queue(
    State(ctx): State<AppContext>,
    Query(q): Query<UserQuery>,
) -> ApiResult<InteractionResponse> {
    command(&ctx, context_for(q.user), Command::ClearQueue).await
}

/// GET /commands/queue
pub async fn queue(
    State(ctx): State<AppContext>,
    Query(q): Query<UserQuery>,
) -> ApiResult<InteractionResponse> {
    command(&ctx, context_for(q.user), Command::Queue).await
}

/// GET /controls
pub async fn control_panel() -> Json<ControlPanelResponse> {
    Json(ControlPanelResponse {
        actions: CONTROL_PANEL.to_vec(),
        skip_to_form: SKIP_TO_FORM,
    })
}

/// POST /controls/:custom_id
pub async fn press_control(
    State(ctx): State<AppContext>,
    Path(custom_id): Path<String>,
    Query(q): Query<UserQuery>,
) -> ApiResult<InteractionResponse> {
    let action = ControlAction::from_custom_id(&custom_id)
        .ok_or_else(|| ApiError::NotFound(format!("control '{}'", custom_id)))?;
    debug!(action = action.custom_id(), user = %q.user, "HTTP control");

    let interaction = Interaction::new(context_for(q.user), RecordingResponder::new());
    controls::run_action(&ctx.session, &interaction, action).await?;
    finish(interaction).await
}

/// POST /controls/skip_to
///
/// With a body this is the form submission; without one it is the button
/// press, answered with the form.
pub async fn submit_skip_to(
    State(ctx): State<AppContext>,
    Query(q): Query<UserQuery>,
    body: Option<Json<SkipToRequest>>,
) -> ApiResult<InteractionResponse> {
    let Some(Json(req)) = body else {
        let interaction = Interaction::new(context_for(q.user), RecordingResponder::new());
        controls::run_action(&ctx.session, &interaction, ControlAction::SkipTo).await?;
        return finish(interaction).await;
    };
    let interaction = Interaction::new(req.context, RecordingResponder::new());
    controls::submit_skip_to(&ctx.session, &interaction, &req.position).await?;
    finish(interaction).await
}

/// GET /session
pub async fn snapshot(State(ctx): State<AppContext>) -> Json<SessionSnapshot> {
    Json(ctx.session.snapshot().await)
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "jukebot-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
