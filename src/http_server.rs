use crate::access::{AccessDecision, AccessGuard, DenialReason};
use crate::config::Config;
use crate::event::NormalizedEvent;
use crate::gate::CooldownGate;
use crate::notify::{ChatNotifier, DiscordNotifier, FanoutNotifier, TeamsNotifier};
use crate::orchestrator::{IgnoreReason, MotionOrchestrator, MotionOutcome, MotionPolicy};
use crate::trigger::HttpTrigger;
use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Instrument};

pub const MOTION_ROUTE: &str = "/webhooks/unifi-protect-motion";
pub const DISCORD_ROUTE: &str = "/webhooks/unifi-protect-discord";
pub const DUMP_ROUTE: &str = "/webhooks/unifi-protect-dump";

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub motion: Arc<MotionOrchestrator>,
    /// Destination for the alarm relay route.
    pub discord: Option<Arc<dyn ChatNotifier>>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let guard = AccessGuard::new(
            config.access.expected_host.clone(),
            config.access.api_key.clone(),
        );
        let policy = MotionPolicy {
            camera_name: config.motion.camera_name.clone(),
            require_camera_match: config.motion.require_camera_match,
            require_motion: config.motion.require_motion,
        };

        let mut motion = MotionOrchestrator::new(
            guard,
            policy,
            CooldownGate::new(config.motion.cooldown),
            Arc::new(HttpTrigger::new(&config.motion.trigger)),
        );

        let mut channels: Vec<Box<dyn ChatNotifier>> = Vec::new();
        if let Some(url) = &config.notify.discord_webhook {
            channels.push(Box::new(DiscordNotifier::new(url.clone())));
        }
        if let Some(url) = &config.notify.teams_webhook {
            channels.push(Box::new(TeamsNotifier::new(url.clone())));
        }
        let fanout = FanoutNotifier::new(channels);
        if !fanout.is_empty() {
            motion = motion.with_notifier(Arc::new(fanout));
        }

        let discord = config
            .notify
            .discord_unifi_webhook
            .as_ref()
            .map(|url| Arc::new(DiscordNotifier::new(url.clone())) as Arc<dyn ChatNotifier>);

        Self {
            motion: Arc::new(motion),
            discord,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(MOTION_ROUTE, post(handle_motion))
        .route(DISCORD_ROUTE, post(handle_discord_relay))
        .route(DUMP_ROUTE, post(handle_dump))
        .with_state(state)
}

/// Serve until the listener fails. Peer addresses are exposed to handlers
/// through `ConnectInfo`.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ─── Request plumbing ─────────────────────────────────────────────────────────

struct Inbound {
    headers: HeaderMap,
    peer: Option<IpAddr>,
    payload: Value,
}

/// Split a request into headers, peer IP and a JSON body. Bodies that are
/// missing or not valid JSON are treated as `{}`.
async fn read_inbound(request: Request) -> Inbound {
    let (parts, body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let payload = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| empty_object()),
        Err(e) => {
            warn!(error = %e, "failed to read webhook body");
            empty_object()
        }
    };

    Inbound {
        headers: parts.headers,
        peer,
        payload,
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

// ─── Response bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    message: String,
}

impl ErrorBody {
    fn new(reason: Option<&'static str>, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            reason,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct IgnoredBody {
    status: &'static str,
    reason: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remaining_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct TriggeredBody {
    status: &'static str,
    camera: Option<String>,
    trigger_url: String,
}

#[derive(Debug, Serialize)]
struct RelayBody {
    status: &'static str,
    camera: String,
    event: String,
}

#[derive(Debug, Serialize)]
struct DumpBody {
    status: &'static str,
    remote_addr: Option<String>,
    payload_keys: Vec<String>,
    received_at: DateTime<Utc>,
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(None, message))).into_response()
}

fn denial_reply(reason: DenialReason) -> Response {
    match reason {
        DenialReason::ForbiddenSource => error_reply(StatusCode::FORBIDDEN, "Forbidden source"),
        DenialReason::Unauthorized => error_reply(StatusCode::UNAUTHORIZED, "Unauthorized"),
    }
}

impl IntoResponse for MotionOutcome {
    fn into_response(self) -> Response {
        match self {
            MotionOutcome::Rejected(reason) => denial_reply(reason),
            MotionOutcome::Ignored(reason) => {
                let remaining_seconds = match reason {
                    IgnoreReason::Cooldown { remaining_seconds } => Some(remaining_seconds),
                    _ => None,
                };
                let body = IgnoredBody {
                    status: "ignored",
                    reason: reason.as_str(),
                    remaining_seconds,
                };
                (StatusCode::ACCEPTED, Json(body)).into_response()
            }
            MotionOutcome::Triggered {
                camera,
                trigger_url,
            } => {
                let body = TriggeredBody {
                    status: "ok",
                    camera,
                    trigger_url,
                };
                (StatusCode::OK, Json(body)).into_response()
            }
            MotionOutcome::TriggerFailed { message } => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorBody::new(Some("trigger_failed"), message)),
            )
                .into_response(),
            MotionOutcome::InternalError { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody::new(Some("internal_error"), message)),
            )
                .into_response(),
        }
    }
}

// ─── Handlers ─────────────────────────────────────────────────────────────────

async fn handle_motion(State(state): State<AppState>, request: Request<Body>) -> Response {
    let span = tracing::info_span!("motion_webhook", request_id = %uuid::Uuid::new_v4());
    async move {
        let inbound = read_inbound(request).await;
        state
            .motion
            .handle(&inbound.headers, inbound.peer, &inbound.payload)
            .await
            .into_response()
    }
    .instrument(span)
    .await
}

/// Relay a UniFi alarm to the Discord channel as a one-line summary.
async fn handle_discord_relay(State(state): State<AppState>, request: Request<Body>) -> Response {
    let inbound = read_inbound(request).await;

    if let AccessDecision::Denied(reason) =
        state.motion.guard().check(&inbound.headers, inbound.peer)
    {
        warn!(peer = ?inbound.peer, ?reason, "rejected UniFi relay request");
        return denial_reply(reason);
    }

    let Some(discord) = state.discord.as_ref() else {
        return error_reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Discord webhook not configured",
        );
    };

    let event = NormalizedEvent::from_payload(&inbound.payload);
    if let Err(e) = discord.send(&event.notification_text()).await {
        warn!(error = %e, "failed to post UniFi event to Discord");
        return error_reply(StatusCode::BAD_GATEWAY, e.to_string());
    }

    let camera = event.display_source().to_string();
    let body = RelayBody {
        status: "ok",
        camera,
        event: event.event_type.unwrap_or_else(|| "event".into()),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Log everything about a request; used to discover a new payload shape.
async fn handle_dump(request: Request<Body>) -> Response {
    let inbound = read_inbound(request).await;

    let headers: serde_json::Map<String, Value> = inbound
        .headers
        .iter()
        .filter_map(|(k, v)| {
            v.to_str()
                .ok()
                .map(|s| (k.to_string(), Value::String(s.to_string())))
        })
        .collect();

    let headers = Value::Object(headers);
    info!(
        remote_addr = ?inbound.peer,
        headers = %headers,
        payload = %inbound.payload,
        "UniFi Protect dump"
    );

    let mut payload_keys: Vec<String> = inbound
        .payload
        .as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default();
    payload_keys.sort();

    let body = DumpBody {
        status: "ok",
        remote_addr: inbound.peer.map(|ip| ip.to_string()),
        payload_keys,
        received_at: Utc::now(),
    };
    (StatusCode::OK, Json(body)).into_response()
}
