//! One task per accepted WebSocket (spec §4.D): owns the control-message
//! state machine, the session's subscription filter, and a bounded outbound
//! queue drained by a single writer — the same "one writer task owns the
//! send side" shape as the teacher's `gateway.rs::handle_conn`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use callfeed_control::{AccessController, Admit, AdmissionRegistry, PlaybackService, SessionToken};
use callfeed_protocol::{decode, encode, ClientMessage, LivefeedMap, ServerMessage};
use callfeed_store::StoreOps;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::{Dispatcher, FilterSnapshot, SessionHandle};
use callfeed_metrics::GatewayMetrics;

/// Session-wide tunables (spec §9's resolved queue-depth default).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Bounded outbound queue depth; overflow drops the session (spec §4.D,
    /// §5, §9: "64 pending calls").
    pub queue_depth: usize,
    /// How often a READY session re-resolves its credential to catch
    /// expiry or a config reload that narrows its permission.
    pub expiry_check_interval: Duration,
    pub branding: String,
    pub version: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            expiry_check_interval: Duration::from_secs(5),
            branding: "CallFeed".to_string(),
            version: "1.0".to_string(),
        }
    }
}

/// Shared, process-wide collaborators every session needs (spec §4.D's
/// references into 4.B/4.C/4.E/4.G/4.A).
pub struct GatewayContext<S> {
    pub store: S,
    pub access: AccessController,
    pub admission: Arc<AdmissionRegistry>,
    pub dispatcher: Arc<Dispatcher>,
    pub playback: PlaybackService<S>,
    pub metrics: Arc<GatewayMetrics>,
    pub config: SessionConfig,
}

/// Mutable per-connection state threaded through the reader loop.
struct SessionState {
    token: Option<SessionToken>,
    credential_code: Option<String>,
    permission: Option<callfeed_control::Permission>,
    handle: Option<SessionHandle>,
}

impl SessionState {
    fn new() -> Self {
        Self { token: None, credential_code: None, permission: None, handle: None }
    }

    fn is_ready(&self) -> bool {
        self.permission.is_some()
    }
}

/// Drives one WebSocket connection end to end: handshake, control loop,
/// teardown. Never returns early without releasing whatever admission slot
/// and dispatcher registration the session acquired.
pub async fn run_session<S>(ws: WebSocket, ctx: Arc<GatewayContext<S>>)
where
    S: StoreOps + Clone + Send + Sync + 'static,
{
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(ctx.config.queue_depth);

    let writer_metrics = ctx.metrics.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let tag = server_tag(&msg);
            let text = match encode(&msg) {
                Ok(t) => t,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound control message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
            writer_metrics.control_msg_tx(tag);
        }
        let _ = ws_tx.close().await;
    });

    ctx.metrics.session_opened();
    let _ = out_tx
        .send(ServerMessage::Ver {
            branding: ctx.config.branding.clone(),
            version: ctx.config.version.clone(),
        })
        .await;

    let mut state = SessionState::new();
    drive(&mut ws_rx, &out_tx, &ctx, &mut state).await;

    if let Some(token) = state.token {
        ctx.dispatcher.unregister(token);
    }
    if let (Some(token), Some(code)) = (state.token, state.credential_code.as_deref()) {
        ctx.admission.release(code, token);
    }
    drop(out_tx);
    let _ = writer.await;
    ctx.metrics.session_closed();
}

async fn drive<S>(
    ws_rx: &mut futures_util::stream::SplitStream<WebSocket>,
    out_tx: &mpsc::Sender<ServerMessage>,
    ctx: &GatewayContext<S>,
    state: &mut SessionState,
) where
    S: StoreOps + Clone + Send + Sync + 'static,
{
    let mut expiry_tick = tokio::time::interval(ctx.config.expiry_check_interval);
    expiry_tick.tick().await; // first tick fires immediately; consume it

    loop {
        let dropped = wait_for_drop(state);
        tokio::select! {
            biased;

            _ = ctx.dispatcher.shutdown_signal() => {
                debug!("server shutting down, closing session");
                return;
            }

            _ = dropped => {
                ctx.metrics.session_dropped_slow_consumer();
                return;
            }

            frame = ws_rx.next() => {
                let Some(frame) = frame else { return };
                let frame = match frame {
                    Ok(f) => f,
                    Err(e) => {
                        debug!(error = %e, "transport read error, closing session");
                        return;
                    }
                };
                match frame {
                    Message::Text(text) => {
                        let text = text.to_string();
                        match decode::<ClientMessage>(&text) {
                            Ok(msg) => {
                                if !handle_message(msg, out_tx, ctx, state).await {
                                    return;
                                }
                            }
                            Err(e) => debug!(error = %e, "dropping unparseable control frame"),
                        }
                    }
                    Message::Close(_) => return,
                    _ => {}
                }
            }

            _ = expiry_tick.tick() => {
                if !recheck_permission(out_tx, ctx, state).await {
                    return;
                }
            }
        }
    }
}

async fn wait_for_drop(state: &SessionState) {
    match &state.handle {
        Some(handle) => handle.dropped().await,
        None => std::future::pending().await,
    }
}

/// Returns `false` when the session should close.
async fn handle_message<S>(
    msg: ClientMessage,
    out_tx: &mpsc::Sender<ServerMessage>,
    ctx: &GatewayContext<S>,
    state: &mut SessionState,
) -> bool
where
    S: StoreOps + Clone + Send + Sync + 'static,
{
    ctx.metrics.control_msg_rx(client_tag(&msg));
    match msg {
        ClientMessage::Ver => {
            let _ = out_tx
                .send(ServerMessage::Ver {
                    branding: ctx.config.branding.clone(),
                    version: ctx.config.version.clone(),
                })
                .await;
            true
        }

        ClientMessage::Pin { credential_b64 } => handle_pin(credential_b64, out_tx, ctx, state).await,

        ClientMessage::Lfm(map) => {
            if let (Some(permission), Some(handle)) = (&state.permission, &state.handle) {
                handle.set_filter(FilterSnapshot {
                    permission: permission.clone(),
                    livefeed: narrow_livefeed(map.unwrap_or_default(), permission),
                });
            }
            true
        }

        ClientMessage::Cal { id, flag } => {
            if let Some(permission) = &state.permission {
                match ctx.store.get_call(id).await {
                    Ok(Some(call))
                        if permission.allows(call.system, call.talkgroup)
                            || call.patches.iter().any(|&tg| permission.allows(call.system, tg)) =>
                    {
                        let _ = out_tx.send(ServerMessage::Cal { call: Box::new(call), flag }).await;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "store error fetching call"),
                }
            }
            true
        }

        ClientMessage::Lcl(options) => {
            if let Some(permission) = &state.permission {
                let snapshot = ctx.access.config().load();
                match ctx.playback.search(options, permission, &snapshot).await {
                    Ok(result) => {
                        let _ = out_tx.send(ServerMessage::Lcl(Box::new(result))).await;
                    }
                    Err(e) => warn!(error = %e, "playback search failed"),
                }
            }
            true
        }

        ClientMessage::Unknown(_) => true,
    }
}

async fn handle_pin<S>(
    credential_b64: String,
    out_tx: &mpsc::Sender<ServerMessage>,
    ctx: &GatewayContext<S>,
    state: &mut SessionState,
) -> bool
where
    S: StoreOps + Clone + Send + Sync + 'static,
{
    if state.permission.is_some() {
        return true; // already authenticated; a second PIN is a no-op
    }

    let code = match BASE64.decode(credential_b64.as_bytes()).ok().and_then(|b| String::from_utf8(b).ok()) {
        Some(c) => c,
        None => {
            let _ = out_tx.send(ServerMessage::Xpr).await;
            ctx.metrics.auth_rejected("malformed");
            return false;
        }
    };

    let permission = match ctx.access.resolve(&code) {
        Ok(p) => p,
        Err(_) => {
            let _ = out_tx.send(ServerMessage::Xpr).await;
            ctx.metrics.auth_rejected("unknown_or_expired");
            return false;
        }
    };

    let token = SessionToken::next();
    match ctx.admission.admit(&permission.code, permission.limit, token) {
        Admit::TooMany => {
            let _ = out_tx.send(ServerMessage::Max).await;
            ctx.metrics.admission_too_many();
            false
        }
        Admit::Ok => {
            let _ = out_tx.send(ServerMessage::PinAck).await;
            let public = ctx.access.public_config(&permission);
            let _ = out_tx.send(ServerMessage::Cfg(Box::new(public))).await;

            let handle = ctx.dispatcher.register(token, out_tx.clone(), FilterSnapshot::new(permission.clone()));
            state.token = Some(token);
            state.credential_code = Some(permission.code.clone());
            state.permission = Some(permission);
            state.handle = Some(handle);
            ctx.metrics.auth_accepted();
            true
        }
    }
}

/// Re-derives the session's permission against the latest config snapshot
/// (spec §4.B copy-on-write reload: "may narrow on next message") and
/// terminates the session if the credential has since expired or vanished.
async fn recheck_permission<S>(
    out_tx: &mpsc::Sender<ServerMessage>,
    ctx: &GatewayContext<S>,
    state: &mut SessionState,
) -> bool {
    let Some(code) = state.credential_code.clone() else { return true };
    match ctx.access.resolve(&code) {
        Ok(permission) => {
            if let Some(handle) = &state.handle {
                let current_livefeed = handle.filter.load().livefeed.clone();
                let livefeed = narrow_livefeed(current_livefeed, &permission);
                handle.set_filter(FilterSnapshot { permission: permission.clone(), livefeed });
            }
            state.permission = Some(permission);
            true
        }
        Err(_) => {
            let _ = out_tx.send(ServerMessage::Xpr).await;
            false
        }
    }
}

/// Drops any `{sys, tg}` entry the credential no longer allows (spec §4.D:
/// "entries disallowed by the credential are silently dropped").
fn narrow_livefeed(map: LivefeedMap, permission: &callfeed_control::Permission) -> LivefeedMap {
    let mut out = HashMap::new();
    for (sys, tgs) in map.0 {
        let mut inner = HashMap::new();
        for (tg, active) in tgs {
            if permission.allows(sys, tg) {
                inner.insert(tg, active);
            }
        }
        if !inner.is_empty() {
            out.insert(sys, inner);
        }
    }
    LivefeedMap(out)
}

fn client_tag(msg: &ClientMessage) -> &'static str {
    match msg {
        ClientMessage::Ver => "VER",
        ClientMessage::Pin { .. } => "PIN",
        ClientMessage::Lfm(_) => "LFM",
        ClientMessage::Cal { .. } => "CAL",
        ClientMessage::Lcl(_) => "LCL",
        ClientMessage::Unknown(_) => "UNKNOWN",
    }
}

fn server_tag(msg: &ServerMessage) -> &'static str {
    match msg {
        ServerMessage::Ver { .. } => "VER",
        ServerMessage::PinAck => "PIN",
        ServerMessage::Xpr => "XPR",
        ServerMessage::Max => "MAX",
        ServerMessage::Cfg(_) => "CFG",
        ServerMessage::Cal { .. } => "CAL",
        ServerMessage::Lcl(_) => "LCL",
        ServerMessage::Lsc(_) => "LSC",
    }
}
