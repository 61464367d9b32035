//! Field extraction for loosely-structured UniFi Protect webhook payloads.
//!
//! Payloads arrive either from the simple motion-webhook integration
//! (`{"camera_name": ..., "motion": true}`) or from the generic alarm manager
//! (`{"alarm": {"name": ..., "triggers": [...]}}`), with fields sometimes
//! nested under `event`. Each field is resolved by walking an ordered list of
//! candidate paths; the first usable value wins.

use serde_json::Value;

/// A path into the payload, e.g. `&["event", "cameraName"]`.
type FieldPath = &'static [&'static str];

const CAMERA_NAME_PATHS: &[FieldPath] = &[
    &["camera_name"],
    &["camera"],
    &["deviceName"],
    &["name"],
    &["event", "camera_name"],
    &["event", "cameraName"],
    &["event", "camera"],
    &["event", "deviceName"],
];

const MOTION_FLAG_PATHS: &[FieldPath] = &[
    &["motion"],
    &["isMotionDetected"],
    &["has_motion"],
    &["event", "motion"],
    &["event", "isMotionDetected"],
    &["event", "has_motion"],
];

const MOTION_TYPE_PATHS: &[FieldPath] = &[
    &["type"],
    &["eventType"],
    &["event", "type"],
    &["event", "eventType"],
];

const EVENT_TYPE_PATHS: &[FieldPath] = &[
    &["type"],
    &["event", "type"],
    &["event", "eventType"],
];

const EVENT_TIME_PATHS: &[FieldPath] = &[
    &["time"],
    &["timestamp"],
    &["event", "time"],
    &["event", "timestamp"],
];

/// Fields pulled out of a single webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    pub camera_name: Option<String>,
    pub motion_detected: bool,
    pub event_type: Option<String>,
    pub event_time: Option<String>,
    pub event_value: Option<String>,
    pub event_link: Option<String>,
    pub alarm_name: Option<String>,
}

impl NormalizedEvent {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            camera_name: camera_name(payload),
            motion_detected: motion_detected(payload),
            event_type: event_type(payload),
            event_time: first_string(payload, EVENT_TIME_PATHS),
            event_value: first_alarm_trigger(payload)
                .and_then(|t| t.get("value"))
                .and_then(truthy_text),
            event_link: lookup(payload, &["alarm", "eventLocalLink"]).and_then(truthy_text),
            alarm_name: lookup(payload, &["alarm", "name"]).and_then(non_empty_str),
        }
    }

    /// Camera label for chat messages: camera, then alarm name.
    pub fn display_source(&self) -> &str {
        self.camera_name
            .as_deref()
            .or(self.alarm_name.as_deref())
            .unwrap_or("Unknown source")
    }

    /// Chat text for the alarm relay route.
    pub fn notification_text(&self) -> String {
        let status = if self.motion_detected {
            "motion detected"
        } else {
            "event received"
        };
        let event_type = self.event_type.as_deref().unwrap_or("event");

        let mut content = format!(
            "UniFi Protect: {} \u{2014} {status} ({event_type})",
            self.display_source()
        );
        if let Some(value) = &self.event_value {
            content.push_str(&format!(": {value}"));
        }
        if let Some(time) = &self.event_time {
            content.push_str(&format!(" @ {time}"));
        }
        if let Some(link) = &self.event_link {
            content.push('\n');
            content.push_str(link);
        }
        content
    }
}

/// Coerce a loosely-typed JSON value into a boolean.
///
/// Strings are matched case-insensitively against the usual on/off spellings;
/// anything unrecognised yields `None` so the caller can keep probing.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().map(|f| f != 0.0).unwrap_or(true)),
        Value::String(s) => parse_bool_str(s),
        _ => None,
    }
}

pub fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn lookup<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(payload, |node, key| node.as_object()?.get(*key))
}

fn non_empty_str(value: &Value) -> Option<String> {
    let s = value.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Render any truthy scalar as text. Zero, `false` and blank strings are
/// treated as absent.
fn truthy_text(value: &Value) -> Option<String> {
    match value {
        Value::String(_) => non_empty_str(value),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".into()),
        _ => None,
    }
}

fn first_string(payload: &Value, paths: &[FieldPath]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(payload, path).and_then(non_empty_str))
}

fn camera_name(payload: &Value) -> Option<String> {
    CAMERA_NAME_PATHS.iter().find_map(|path| {
        let candidate = lookup(payload, path)?;
        match candidate {
            Value::Object(obj) => obj.get("name").and_then(non_empty_str),
            other => non_empty_str(other),
        }
    })
}

fn motion_detected(payload: &Value) -> bool {
    if let Some(flag) = MOTION_FLAG_PATHS
        .iter()
        .find_map(|path| lookup(payload, path).and_then(coerce_bool))
    {
        return flag;
    }

    let typed_as_motion = MOTION_TYPE_PATHS.iter().any(|path| {
        lookup(payload, path)
            .and_then(Value::as_str)
            .is_some_and(|t| t.to_lowercase().contains("motion"))
    });
    if typed_as_motion {
        return true;
    }

    // Arrival on the motion route implies motion unless the payload says otherwise.
    true
}

fn first_alarm_trigger(payload: &Value) -> Option<&Value> {
    lookup(payload, &["alarm", "triggers"])?.as_array()?.first()
}

fn event_type(payload: &Value) -> Option<String> {
    first_string(payload, EVENT_TYPE_PATHS).or_else(|| {
        first_alarm_trigger(payload)
            .and_then(|t| t.get("key"))
            .and_then(non_empty_str)
    })
}
