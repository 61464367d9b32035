use axum::http::{header, HeaderMap};
use std::net::IpAddr;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    ForbiddenSource,
    Unauthorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allowed,
    Denied(DenialReason),
}

/// Provenance checks for requests claiming to come from the NVR.
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    expected_host: Option<String>,
    api_key: Option<String>,
}

impl AccessGuard {
    pub fn new(expected_host: Option<String>, api_key: Option<String>) -> Self {
        let expected_host = expected_host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty());
        let api_key = api_key.filter(|k| !k.is_empty());
        Self {
            expected_host,
            api_key,
        }
    }

    pub fn api_key_required(&self) -> bool {
        self.api_key.is_some()
    }

    /// Host check first, then the API key.
    pub fn check(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> AccessDecision {
        if !self.origin_allowed(headers, peer) {
            return AccessDecision::Denied(DenialReason::ForbiddenSource);
        }
        if let Some(key) = &self.api_key {
            if !has_api_key(headers, key) {
                return AccessDecision::Denied(DenialReason::Unauthorized);
            }
        }
        AccessDecision::Allowed
    }

    fn origin_allowed(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> bool {
        let Some(expected) = self.expected_host.as_deref() else {
            return true;
        };

        let forwarded = header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next())
            .map(str::trim);
        if forwarded == Some(expected) {
            return true;
        }

        match peer {
            Some(ip) if ip.is_loopback() => true,
            Some(ip) => ip.to_string() == expected,
            None => false,
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Accept either `X-API-Key: <key>` or `Authorization: Bearer <key>`.
fn has_api_key(headers: &HeaderMap, expected: &str) -> bool {
    let header_key = header_str(headers, API_KEY_HEADER).map(str::trim);
    if matches!(header_key, Some(k) if !k.is_empty() && k == expected) {
        return true;
    }

    header_str(headers, header::AUTHORIZATION.as_str())
        .map(str::trim)
        .and_then(bearer_token)
        .is_some_and(|token| token == expected)
}

fn bearer_token(value: &str) -> Option<&str> {
    let scheme = value.get(..7)?;
    scheme
        .eq_ignore_ascii_case("bearer ")
        .then(|| value[7..].trim())
}
