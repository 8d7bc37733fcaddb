//! Controller configuration.
//!
//! The host resolves its settings once at startup into an immutable
//! [`ProxyConfig`]; there are no per-request settings lookups. Legacy
//! `hubproxy_*` keys are still honored for one release cycle and produce a
//! single deprecation warning naming every legacy key in use.

use std::collections::BTreeMap;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use tracing::warn;

/// Default Relay proxy endpoint.
pub const DEFAULT_PROXY_URL: &str = "http://proxy.relay.dev:8011";
/// Hostname of the Relay API gateway backend.
pub const DEFAULT_API_GATEWAY_HOST: &str = "api.relay.dev";
/// Environment variable carrying the host's job/run identifier.
pub const JOB_ID_ENV: &str = "CRAWL_JOB_ID";

/// Credential used to authenticate against Relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    UserPass { user: String, password: String },
}

impl Credential {
    pub fn is_empty(&self) -> bool {
        match self {
            Credential::ApiKey(key) => key.is_empty(),
            Credential::UserPass { user, .. } => user.is_empty(),
        }
    }

    /// User and password halves for embedding into a proxy URL. An API key
    /// is sent as the user with an empty password.
    pub fn user_and_password(&self) -> (&str, &str) {
        match self {
            Credential::ApiKey(key) => (key, ""),
            Credential::UserPass { user, password } => (user, password),
        }
    }

    /// `Proxy-Authorization` value: HTTP basic access authentication.
    pub fn basic_auth(&self) -> String {
        let (user, password) = self.user_and_password();
        format!("Basic {}", BASE64.encode(format!("{user}:{password}")))
    }

    /// Short, log-safe prefix of the credential for startup diagnostics.
    pub fn hint(&self) -> &str {
        let (user, _) = self.user_and_password();
        let end = user
            .char_indices()
            .nth(7)
            .map(|(idx, _)| idx)
            .unwrap_or(user.len());
        &user[..end]
    }
}

impl Default for Credential {
    fn default() -> Self {
        Credential::ApiKey(String::new())
    }
}

/// Immutable middleware configuration, built once by [`ProxyConfig::resolve`].
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Relay endpoint without credentials.
    pub url: String,
    pub credential: Credential,
    /// Global enablement; per-domain force-enablement can extend it at
    /// runtime but never shrinks it.
    pub enabled: bool,
    /// Hostname that selects the API gateway header namespace.
    pub api_gateway_host: String,
    /// Bans per slot tolerated before the crawl is terminated.
    pub maxbans: u32,
    /// Status code Relay uses for ban and no-capacity signals.
    pub ban_code: u16,
    pub download_timeout: Duration,
    /// Fixed slot delay applied when the proxy endpoint drops connections.
    pub connection_refused_delay: Duration,
    /// Keep the host's configured download delay instead of zeroing it.
    pub preserve_delay: bool,
    /// First backoff upper bound, seconds.
    pub backoff_step: f64,
    /// Backoff upper bound ceiling, seconds.
    pub backoff_max: f64,
    pub max_auth_retry_times: u32,
    /// Set-if-absent request headers. A `None` value means "do not set".
    pub default_headers: Vec<(String, Option<String>)>,
    /// Header pair that must not appear together on one request.
    pub conflicting_headers: (String, String),
    /// Response status codes that retroactively enable proxying for the
    /// request's domain.
    pub force_enable_on_http_codes: Vec<u16>,
    /// Domains proxied even when `enabled` is false.
    pub enabled_for_domains: Vec<String>,
    /// Job/run identifier forwarded to Relay, read from [`JOB_ID_ENV`].
    pub job_id: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_PROXY_URL.to_string(),
            credential: Credential::default(),
            enabled: false,
            api_gateway_host: DEFAULT_API_GATEWAY_HOST.to_string(),
            maxbans: 400,
            ban_code: 503,
            download_timeout: Duration::from_secs(190),
            connection_refused_delay: Duration::from_secs(90),
            preserve_delay: false,
            backoff_step: 15.0,
            backoff_max: 180.0,
            max_auth_retry_times: 10,
            default_headers: Vec::new(),
            conflicting_headers: ("X-Relay-Profile".to_string(), "X-Relay-UA".to_string()),
            force_enable_on_http_codes: Vec::new(),
            enabled_for_domains: Vec::new(),
            job_id: None,
        }
    }
}

/// Raw host settings. Every field is optional; unset fields fall back to the
/// legacy alias and then to the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub relay_enabled: Option<bool>,
    pub relay_apikey: Option<String>,
    pub relay_user: Option<String>,
    pub relay_password: Option<String>,
    pub relay_url: Option<String>,
    pub relay_api_gateway_host: Option<String>,
    pub relay_maxbans: Option<u32>,
    pub relay_ban_code: Option<u16>,
    pub relay_download_timeout_secs: Option<u64>,
    pub relay_connection_refused_delay_secs: Option<u64>,
    pub relay_preserve_delay: Option<bool>,
    pub relay_backoff_step: Option<f64>,
    pub relay_backoff_max: Option<f64>,
    pub relay_max_auth_retry_times: Option<u32>,
    pub relay_default_headers: Option<BTreeMap<String, Option<String>>>,
    pub relay_force_enable_on_http_codes: Option<Vec<u16>>,
    pub relay_enabled_for_domains: Option<Vec<String>>,

    // Deprecated aliases, honored with a one-time warning.
    pub hubproxy_enabled: Option<bool>,
    pub hubproxy_apikey: Option<String>,
    pub hubproxy_url: Option<String>,
    pub hubproxy_maxbans: Option<u32>,
    pub hubproxy_download_timeout_secs: Option<u64>,
    pub hubproxy_preserve_delay: Option<bool>,
    pub hubproxy_backoff_step: Option<f64>,
    pub hubproxy_backoff_max: Option<f64>,
    pub hubproxy_force_enable_on_http_codes: Option<Vec<u16>>,
}

/// Per-spider overrides; any set field beats both settings keys.
#[derive(Debug, Clone, Default)]
pub struct SpiderOverrides {
    pub enabled: Option<bool>,
    pub apikey: Option<String>,
    pub url: Option<String>,
    pub maxbans: Option<u32>,
    pub download_timeout: Option<Duration>,
    pub preserve_delay: Option<bool>,
    pub backoff_step: Option<f64>,
    pub backoff_max: Option<f64>,
    pub force_enable_on_http_codes: Option<Vec<u16>>,
}

/// Build-time failures; transient proxy distress is never an error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid proxy url {url:?}: {source}")]
    InvalidProxyUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("Relay only supports HTTP basic access authentication, got {0:?}")]
    UnsupportedAuthScheme(String),
    #[error("auth header carries malformed base64 credentials")]
    MalformedAuthHeader,
}

/// Pick override, then current key, then legacy key, then default; record
/// the legacy key whenever it is present so the caller can warn once.
fn pick<T>(
    override_value: Option<T>,
    current: Option<T>,
    legacy: Option<T>,
    default: T,
    legacy_key: &'static str,
    deprecated: &mut Vec<&'static str>,
) -> T {
    if legacy.is_some() {
        deprecated.push(legacy_key);
    }
    override_value.or(current).or(legacy).unwrap_or(default)
}

impl ProxyConfig {
    /// Merge host settings and spider overrides into the final config.
    pub fn resolve(settings: &Settings, overrides: &SpiderOverrides) -> ProxyConfig {
        let defaults = ProxyConfig::default();
        let mut deprecated = Vec::new();
        let s = settings.clone();
        let o = overrides.clone();

        let enabled = pick(
            o.enabled,
            s.relay_enabled,
            s.hubproxy_enabled,
            defaults.enabled,
            "hubproxy_enabled",
            &mut deprecated,
        );
        let apikey = pick(
            o.apikey,
            s.relay_apikey,
            s.hubproxy_apikey,
            String::new(),
            "hubproxy_apikey",
            &mut deprecated,
        );
        let credential = match (apikey.is_empty(), s.relay_user) {
            (true, Some(user)) if !user.is_empty() => Credential::UserPass {
                user,
                password: s.relay_password.unwrap_or_default(),
            },
            _ => Credential::ApiKey(apikey),
        };
        let url = pick(
            o.url,
            s.relay_url,
            s.hubproxy_url,
            defaults.url.clone(),
            "hubproxy_url",
            &mut deprecated,
        );
        let maxbans = pick(
            o.maxbans,
            s.relay_maxbans,
            s.hubproxy_maxbans,
            defaults.maxbans,
            "hubproxy_maxbans",
            &mut deprecated,
        );
        let download_timeout = pick(
            o.download_timeout.map(|d| d.as_secs()),
            s.relay_download_timeout_secs,
            s.hubproxy_download_timeout_secs,
            defaults.download_timeout.as_secs(),
            "hubproxy_download_timeout_secs",
            &mut deprecated,
        );
        let preserve_delay = pick(
            o.preserve_delay,
            s.relay_preserve_delay,
            s.hubproxy_preserve_delay,
            defaults.preserve_delay,
            "hubproxy_preserve_delay",
            &mut deprecated,
        );
        let backoff_step = pick(
            o.backoff_step,
            s.relay_backoff_step,
            s.hubproxy_backoff_step,
            defaults.backoff_step,
            "hubproxy_backoff_step",
            &mut deprecated,
        );
        let backoff_max = pick(
            o.backoff_max,
            s.relay_backoff_max,
            s.hubproxy_backoff_max,
            defaults.backoff_max,
            "hubproxy_backoff_max",
            &mut deprecated,
        );
        let force_enable_on_http_codes = pick(
            o.force_enable_on_http_codes,
            s.relay_force_enable_on_http_codes,
            s.hubproxy_force_enable_on_http_codes,
            defaults.force_enable_on_http_codes.clone(),
            "hubproxy_force_enable_on_http_codes",
            &mut deprecated,
        );

        if !deprecated.is_empty() {
            warn!(
                "deprecated settings in use: {}; rename them to their relay_* equivalents",
                deprecated.join(", ")
            );
        }

        let default_headers = s
            .relay_default_headers
            .map(|m| m.into_iter().collect())
            .unwrap_or_default();

        ProxyConfig {
            url: fix_url_protocol(url),
            credential,
            enabled,
            api_gateway_host: s
                .relay_api_gateway_host
                .unwrap_or(defaults.api_gateway_host),
            maxbans,
            ban_code: s.relay_ban_code.unwrap_or(defaults.ban_code),
            download_timeout: Duration::from_secs(download_timeout),
            connection_refused_delay: s
                .relay_connection_refused_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connection_refused_delay),
            preserve_delay,
            backoff_step,
            backoff_max,
            max_auth_retry_times: s
                .relay_max_auth_retry_times
                .unwrap_or(defaults.max_auth_retry_times),
            default_headers,
            conflicting_headers: defaults.conflicting_headers,
            force_enable_on_http_codes,
            enabled_for_domains: s.relay_enabled_for_domains.unwrap_or_default(),
            job_id: std::env::var(JOB_ID_ENV).ok().filter(|v| !v.is_empty()),
        }
    }
}

/// Relay endpoints speak plain HTTP; the transport tunnels TLS through them.
fn fix_url_protocol(url: String) -> String {
    if url.starts_with("https://") {
        warn!("relay_url {url:?} set with \"https://\" protocol");
        url
    } else if !url.starts_with("http://") {
        warn!("adding \"http://\" to relay_url {url:?}");
        format!("http://{url}")
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service_contract() {
        let config = ProxyConfig::default();
        assert_eq!(config.maxbans, 400);
        assert_eq!(config.ban_code, 503);
        assert_eq!(config.download_timeout, Duration::from_secs(190));
        assert_eq!(config.connection_refused_delay, Duration::from_secs(90));
        assert_eq!(config.backoff_step, 15.0);
        assert_eq!(config.backoff_max, 180.0);
        assert_eq!(config.max_auth_retry_times, 10);
        assert!(!config.enabled);
        assert!(!config.preserve_delay);
    }

    #[test]
    fn overrides_beat_settings_beat_legacy() {
        let settings = Settings {
            relay_maxbans: Some(100),
            hubproxy_maxbans: Some(50),
            hubproxy_backoff_step: Some(5.0),
            ..Default::default()
        };
        let overrides = SpiderOverrides {
            maxbans: Some(10),
            ..Default::default()
        };
        let config = ProxyConfig::resolve(&settings, &overrides);
        assert_eq!(config.maxbans, 10);
        // Legacy key applies only where nothing newer is set.
        assert_eq!(config.backoff_step, 5.0);
    }

    #[test]
    fn missing_scheme_gets_http_prefix() {
        let settings = Settings {
            relay_url: Some("proxy.relay.dev:8011".into()),
            ..Default::default()
        };
        let config = ProxyConfig::resolve(&settings, &SpiderOverrides::default());
        assert_eq!(config.url, "http://proxy.relay.dev:8011");
    }

    #[test]
    fn user_password_credential_when_no_apikey() {
        let settings = Settings {
            relay_user: Some("scraper".into()),
            relay_password: Some("hunter2".into()),
            ..Default::default()
        };
        let config = ProxyConfig::resolve(&settings, &SpiderOverrides::default());
        assert_eq!(
            config.credential,
            Credential::UserPass {
                user: "scraper".into(),
                password: "hunter2".into()
            }
        );
        assert_eq!(config.credential.basic_auth(), "Basic c2NyYXBlcjpodW50ZXIy");
    }

    #[test]
    fn apikey_beats_user_password() {
        let settings = Settings {
            relay_apikey: Some("0123456789abcdef".into()),
            relay_user: Some("scraper".into()),
            ..Default::default()
        };
        let config = ProxyConfig::resolve(&settings, &SpiderOverrides::default());
        assert_eq!(
            config.credential,
            Credential::ApiKey("0123456789abcdef".into())
        );
        assert_eq!(config.credential.hint(), "0123456");
    }

    #[test]
    fn hint_respects_char_boundaries() {
        // Keys are not guaranteed to be ASCII; the prefix must cut on a
        // character, not a byte.
        let short = Credential::ApiKey("áéíóúü".into());
        assert_eq!(short.hint(), "áéíóúü");

        let long = Credential::ApiKey("áéíóúüабв".into());
        assert_eq!(long.hint(), "áéíóúüа");
        assert_eq!(long.hint().chars().count(), 7);
    }

    #[test]
    fn settings_deserialize_from_toml() {
        let settings: Settings = toml::from_str(
            r#"
            relay_enabled = true
            relay_apikey = "0123456789abcdef"
            relay_maxbans = 20
            relay_backoff_step = 2.5
            relay_force_enable_on_http_codes = [403, 456]

            [relay_default_headers]
            "X-Relay-Profile" = "desktop"
            "#,
        )
        .unwrap();
        let config = ProxyConfig::resolve(&settings, &SpiderOverrides::default());
        assert!(config.enabled);
        assert_eq!(config.maxbans, 20);
        assert_eq!(config.backoff_step, 2.5);
        assert_eq!(config.force_enable_on_http_codes, vec![403, 456]);
        assert_eq!(
            config.default_headers,
            vec![("X-Relay-Profile".to_string(), Some("desktop".to_string()))]
        );
    }

    #[test]
    fn empty_credential_detection() {
        assert!(Credential::ApiKey(String::new()).is_empty());
        assert!(!Credential::ApiKey("k".into()).is_empty());
        assert!(Credential::UserPass {
            user: String::new(),
            password: "p".into()
        }
        .is_empty());
    }
}
