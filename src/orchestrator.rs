//! End-to-end handling of the motion webhook: access checks, payload policy,
//! gate admission and the single downstream trigger call.

use crate::access::{AccessDecision, AccessGuard, DenialReason};
use crate::event::NormalizedEvent;
use crate::gate::{CooldownGate, DenyReason};
use crate::notify::ChatNotifier;
use crate::trigger::DeviceTrigger;
use axum::http::HeaderMap;
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct MotionPolicy {
    pub camera_name: String,
    pub require_camera_match: bool,
    pub require_motion: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    CameraMismatch,
    NoMotion,
    InFlight,
    Cooldown { remaining_seconds: u64 },
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::CameraMismatch => "camera_mismatch",
            IgnoreReason::NoMotion => "no_motion",
            IgnoreReason::InFlight => "in_flight",
            IgnoreReason::Cooldown { .. } => "cooldown",
        }
    }
}

/// Terminal state of one motion webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MotionOutcome {
    Rejected(DenialReason),
    Ignored(IgnoreReason),
    Triggered {
        camera: Option<String>,
        trigger_url: String,
    },
    TriggerFailed {
        message: String,
    },
    InternalError {
        message: String,
    },
}

pub struct MotionOrchestrator {
    guard: AccessGuard,
    policy: MotionPolicy,
    gate: Arc<CooldownGate>,
    trigger: Arc<dyn DeviceTrigger>,
    notifier: Option<Arc<dyn ChatNotifier>>,
}

impl MotionOrchestrator {
    pub fn new(
        guard: AccessGuard,
        policy: MotionPolicy,
        gate: CooldownGate,
        trigger: Arc<dyn DeviceTrigger>,
    ) -> Self {
        Self {
            guard,
            policy,
            gate: Arc::new(gate),
            trigger,
            notifier: None,
        }
    }

    /// Announce successful triggers on a chat channel. Delivery is
    /// fire-and-forget and never affects the webhook response.
    pub fn with_notifier(mut self, notifier: Arc<dyn ChatNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    pub async fn handle(
        &self,
        headers: &HeaderMap,
        peer: Option<IpAddr>,
        payload: &Value,
    ) -> MotionOutcome {
        if let AccessDecision::Denied(reason) = self.guard.check(headers, peer) {
            match reason {
                DenialReason::ForbiddenSource => {
                    warn!(peer = ?peer, "rejected motion webhook from unexpected host")
                }
                DenialReason::Unauthorized => {
                    warn!("rejected motion webhook due to invalid API key")
                }
            }
            return MotionOutcome::Rejected(reason);
        }

        let event = NormalizedEvent::from_payload(payload);
        let camera = event.camera_name.clone();

        if self.policy.require_camera_match
            && camera.as_deref() != Some(self.policy.camera_name.as_str())
        {
            info!(
                camera = ?camera,
                target = %self.policy.camera_name,
                "ignoring motion event for another camera"
            );
            return MotionOutcome::Ignored(IgnoreReason::CameraMismatch);
        }

        if self.policy.require_motion && !event.motion_detected {
            info!(camera = ?camera, "ignoring non-motion event");
            return MotionOutcome::Ignored(IgnoreReason::NoMotion);
        }

        let permit = match self.gate.try_acquire() {
            Ok(permit) => permit,
            Err(denial) => {
                let reason = match denial.reason {
                    DenyReason::InFlight => {
                        info!(camera = ?camera, "motion ignored while prior trigger is running");
                        IgnoreReason::InFlight
                    }
                    DenyReason::Cooldown => {
                        info!(
                            camera = ?camera,
                            remaining_seconds = denial.remaining_seconds,
                            "motion ignored due to cooldown"
                        );
                        IgnoreReason::Cooldown {
                            remaining_seconds: denial.remaining_seconds,
                        }
                    }
                };
                return MotionOutcome::Ignored(reason);
            }
        };

        // The attempt runs detached so that dropping this request does not
        // release the gate while the device is still acting. A panic unwinds
        // through the permit, which releases it as a failure.
        let trigger = Arc::clone(&self.trigger);
        let attempt = tokio::spawn(async move {
            let result = trigger.fire().await;
            permit.complete(result.is_ok());
            result
        });

        match attempt.await {
            Ok(Ok(())) => {
                info!(camera = ?camera, "motion trigger fired");
                self.announce(&event);
                MotionOutcome::Triggered {
                    camera,
                    trigger_url: self.trigger.target().to_string(),
                }
            }
            Ok(Err(e)) if e.is_downstream() => {
                error!(error = %e, "failed to call farmbot trigger");
                MotionOutcome::TriggerFailed {
                    message: e.to_string(),
                }
            }
            Ok(Err(e)) => {
                error!(error = %e, "unexpected error while triggering farmbot");
                MotionOutcome::InternalError {
                    message: e.to_string(),
                }
            }
            Err(e) if e.is_panic() => {
                error!("farmbot trigger panicked");
                MotionOutcome::InternalError {
                    message: "trigger panicked".into(),
                }
            }
            Err(e) => {
                error!(error = %e, "farmbot trigger task did not complete");
                MotionOutcome::InternalError {
                    message: e.to_string(),
                }
            }
        }
    }

    fn announce(&self, event: &NormalizedEvent) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let text = format!(
            "UniFi Protect: motion on {} fired the farmbot trigger",
            event.display_source()
        );
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&text).await {
                warn!(error = %e, "motion notification failed");
            }
        });
    }
}
