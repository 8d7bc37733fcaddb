//! Request annotation helpers: backend targets, header namespaces,
//! translation between them, default headers, and conflict detection.

use tracing::{debug, warn};

use crate::message::ProxyRequest;

/// Prefix of the proxy backend header namespace.
pub const LEGACY_PREFIX: &str = "x-relay-";
/// Prefix of the API gateway header namespace.
pub const API_PREFIX: &str = "relay-";
/// Both reserved namespaces, for stripping from unproxied requests.
pub const ALL_PREFIXES: &[&str] = &[API_PREFIX, LEGACY_PREFIX];

/// Headers equivalent across the two namespaces, `(api, legacy)`. Anything
/// outside this table has no equivalent on the other backend and is dropped
/// with a warning.
const API_TO_LEGACY: &[(&str, &str)] = &[
    ("relay-device", "x-relay-profile"),
    ("relay-geolocation", "x-relay-region"),
    ("relay-jobid", "x-relay-jobid"),
    ("relay-override-headers", "x-relay-profile-pass"),
];

/// Which Relay backend a proxy URL points at. The two are equivalent
/// services behind different hostnames and header conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Classic proxy backend, `X-Relay-*` headers.
    Proxy,
    /// API gateway, `relay-*` headers.
    Api,
}

impl Target {
    pub(crate) fn stat_prefix(self) -> &'static str {
        match self {
            Target::Proxy => "relay_proxy",
            Target::Api => "relay_api",
        }
    }

    pub(crate) fn job_header(self) -> &'static str {
        match self {
            Target::Proxy => "X-Relay-JobId",
            Target::Api => "Relay-JobId",
        }
    }

    pub(crate) fn client_header(self) -> &'static str {
        match self {
            Target::Proxy => "X-Relay-Client",
            Target::Api => "Relay-Client",
        }
    }

    pub(crate) fn name(self) -> &'static str {
        match self {
            Target::Proxy => "Relay proxy",
            Target::Api => "Relay API",
        }
    }

    /// Translation pairs `(from, to)` to apply when routing to this target.
    fn translations(self) -> impl Iterator<Item = (&'static str, &'static str)> {
        API_TO_LEGACY.iter().map(move |&(api, legacy)| match self {
            Target::Proxy => (api, legacy),
            Target::Api => (legacy, api),
        })
    }

    /// Namespace prefix that does not belong on requests to this target and
    /// cannot be translated (after translation ran).
    pub(crate) fn foreign_prefixes(self) -> &'static [&'static str] {
        match self {
            Target::Proxy => &[API_PREFIX],
            Target::Api => &[LEGACY_PREFIX],
        }
    }
}

/// Case-insensitive reserved-namespace test. Empty names never match.
pub(crate) fn is_reserved_header(name: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|prefix| {
        name.len() >= prefix.len()
            && name.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
    })
}

/// Rename headers that have an equivalent on the target backend, warning on
/// each rename so callers can migrate.
pub(crate) fn translate_headers(request: &mut ProxyRequest, target: Target) {
    for (from, to) in target.translations() {
        if let Some(value) = request.headers.remove_all(from) {
            warn!(
                "translating header {from:?} to {to:?} on request for {}",
                request.url
            );
            request.headers.set(to, value);
        }
    }
}

/// Remove reserved headers that must not reach the destination. When the
/// target is known the drop means "no equivalent on this backend" and is
/// warned about; with no target the request is simply not proxied and the
/// cleanup is silent.
pub(crate) fn strip_reserved_headers(
    request: &mut ProxyRequest,
    prefixes: &[&str],
    target: Option<Target>,
) {
    let doomed: Vec<String> = request
        .headers
        .names()
        .filter(|name| is_reserved_header(name, prefixes))
        .map(str::to_string)
        .collect();
    for name in doomed {
        let Some(value) = request.headers.remove_all(&name) else {
            continue;
        };
        if let Some(target) = target {
            warn!(
                "dropping header {name:?} ({:?}) from request for {}: this request \
                 targets the {} and automatic translation is not supported for it",
                String::from_utf8_lossy(&value),
                request.url,
                target.name(),
            );
        }
    }
}

/// Apply configured default headers with set-if-absent semantics. A `None`
/// value disables the default entirely.
pub(crate) fn apply_default_headers(
    request: &mut ProxyRequest,
    defaults: &[(String, Option<String>)],
) {
    for (name, value) in defaults {
        if let Some(value) = value {
            request.headers.set_default(name, value.as_bytes());
        }
    }
}

/// True when both members of the conflicting pair are present.
pub(crate) fn has_conflicting_headers(request: &ProxyRequest, pair: &(String, String)) -> bool {
    request.headers.contains(&pair.0) && request.headers.contains(&pair.1)
}

/// Per-request diagnostic for a detected conflict; the process-wide warning
/// is rate-limited by the controller.
pub(crate) fn debug_conflicting_headers(request: &ProxyRequest, pair: &(String, String)) {
    debug!(
        "the headers {:?} and {:?} are conflicting on request for {}; {} will be ignored",
        pair.0, pair.1, request.url, pair.1
    );
}
