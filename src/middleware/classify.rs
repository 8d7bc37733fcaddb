//! Response classification.
//!
//! Relay signals its own distress through a status code plus an error
//! header. A response that carries none of the Relay identity markers was
//! served directly by the target site and is passed through untouched.

use crate::config::ProxyConfig;
use crate::headers::HeaderBag;
use crate::message::ProxyResponse;

/// Error header in the proxy backend namespace.
pub const ERROR_HEADER_LEGACY: &str = "X-Relay-Error";
/// Error header in the API gateway namespace.
pub const ERROR_HEADER_API: &str = "Relay-Error";

const VERSION_HEADER: &str = "X-Relay-Version";
const REQUEST_ID_HEADER: &str = "Relay-Request-Id";
const ERROR_TYPE_HEADER: &str = "relay-error-type";

const AUTH_ERROR_CODE: u16 = 407;
const THROTTLE_CODE: u16 = 429;

/// What a completed Relay response means for the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Normal,
    /// The target site blocked the crawl's traffic as seen through Relay.
    Banned,
    /// Relay itself is out of upstream capacity for this crawl.
    CapacityExhausted(CapacityReason),
    /// Relay could not authenticate the request.
    AuthError,
    /// Not produced by Relay; none of our business.
    NotFromProxy,
}

/// Which capacity signal fired; doubles as the delay stat label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityReason {
    /// `noslaves`: no upstream proxies available.
    NoSlaves,
    /// `too_many_conns`: the crawl is over its concurrency limit.
    Throttled,
}

impl CapacityReason {
    pub fn as_stat(self) -> &'static str {
        match self {
            CapacityReason::NoSlaves => "noslaves",
            CapacityReason::Throttled => "throttled",
        }
    }
}

/// True when the response was produced by Relay rather than fetched direct.
pub fn from_relay(response: &ProxyResponse) -> bool {
    response.headers.contains(VERSION_HEADER)
        || response.headers.contains(REQUEST_ID_HEADER)
        || response.headers.contains(ERROR_TYPE_HEADER)
}

/// Mirror the error header across both namespaces so consumers can read
/// either, and return its value. The API namespace wins when both are set.
pub fn mirror_error_header(headers: &mut HeaderBag) -> Option<Vec<u8>> {
    if let Some(value) = headers.get(ERROR_HEADER_API) {
        let value = value.to_vec();
        headers.set(ERROR_HEADER_LEGACY, value.clone());
        return Some(value);
    }
    if let Some(value) = headers.get(ERROR_HEADER_LEGACY) {
        let value = value.to_vec();
        headers.set(ERROR_HEADER_API, value.clone());
        return Some(value);
    }
    None
}

/// Classify a Relay response. First match wins, in the order capacity
/// exhaustion, auth error, ban; everything else is normal.
pub fn classify(response: &ProxyResponse, config: &ProxyConfig) -> Classification {
    if !from_relay(response) {
        return Classification::NotFromProxy;
    }
    let error = response
        .headers
        .get_str(ERROR_HEADER_LEGACY)
        .or_else(|| response.headers.get_str(ERROR_HEADER_API));
    match (response.status, error) {
        (status, Some("noslaves")) if status == config.ban_code => {
            Classification::CapacityExhausted(CapacityReason::NoSlaves)
        }
        (THROTTLE_CODE, Some("too_many_conns")) => {
            Classification::CapacityExhausted(CapacityReason::Throttled)
        }
        (AUTH_ERROR_CODE, Some("bad_proxy_auth")) => Classification::AuthError,
        (status, Some("banned")) if status == config.ban_code => Classification::Banned,
        _ => Classification::Normal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_response(status: u16, error: Option<&str>) -> ProxyResponse {
        let mut response = ProxyResponse::new(status);
        response.headers.set(VERSION_HEADER, "1.38.0");
        if let Some(error) = error {
            response.headers.set(ERROR_HEADER_LEGACY, error);
        }
        response
    }

    #[test]
    fn plain_response_is_not_from_proxy() {
        let response = ProxyResponse::new(503);
        assert_eq!(
            classify(&response, &ProxyConfig::default()),
            Classification::NotFromProxy
        );
    }

    #[test]
    fn any_identity_marker_counts() {
        let mut response = ProxyResponse::new(200);
        response.headers.set(REQUEST_ID_HEADER, "abc123");
        assert!(from_relay(&response));
        let mut response = ProxyResponse::new(520);
        response.headers.set(ERROR_TYPE_HEADER, "/limits/over-global-limit");
        assert!(from_relay(&response));
    }

    #[test]
    fn ban_needs_code_and_header() {
        let config = ProxyConfig::default();
        assert_eq!(
            classify(&relay_response(503, Some("banned")), &config),
            Classification::Banned
        );
        // Right header, wrong code.
        assert_eq!(
            classify(&relay_response(500, Some("banned")), &config),
            Classification::Normal
        );
        // Right code, no header.
        assert_eq!(
            classify(&relay_response(503, None), &config),
            Classification::Normal
        );
    }

    #[test]
    fn capacity_signals() {
        let config = ProxyConfig::default();
        assert_eq!(
            classify(&relay_response(503, Some("noslaves")), &config),
            Classification::CapacityExhausted(CapacityReason::NoSlaves)
        );
        assert_eq!(
            classify(&relay_response(429, Some("too_many_conns")), &config),
            Classification::CapacityExhausted(CapacityReason::Throttled)
        );
        // too_many_conns only means throttling on 429.
        assert_eq!(
            classify(&relay_response(503, Some("too_many_conns")), &config),
            Classification::Normal
        );
    }

    #[test]
    fn auth_error_needs_407_and_header() {
        let config = ProxyConfig::default();
        assert_eq!(
            classify(&relay_response(407, Some("bad_proxy_auth")), &config),
            Classification::AuthError
        );
        assert_eq!(
            classify(&relay_response(407, None), &config),
            Classification::Normal
        );
    }

    #[test]
    fn honors_configured_ban_code() {
        let config = ProxyConfig {
            ban_code: 555,
            ..Default::default()
        };
        assert_eq!(
            classify(&relay_response(555, Some("banned")), &config),
            Classification::Banned
        );
        assert_eq!(
            classify(&relay_response(503, Some("banned")), &config),
            Classification::Normal
        );
    }

    #[test]
    fn mirror_copies_error_across_namespaces() {
        let mut headers = HeaderBag::new();
        headers.set(ERROR_HEADER_API, "banned");
        assert_eq!(mirror_error_header(&mut headers), Some(b"banned".to_vec()));
        assert_eq!(headers.get_str(ERROR_HEADER_LEGACY), Some("banned"));

        let mut headers = HeaderBag::new();
        headers.set(ERROR_HEADER_LEGACY, "noslaves");
        assert_eq!(mirror_error_header(&mut headers), Some(b"noslaves".to_vec()));
        assert_eq!(headers.get_str(ERROR_HEADER_API), Some("noslaves"));

        let mut headers = HeaderBag::new();
        assert_eq!(mirror_error_header(&mut headers), None);
    }
}
